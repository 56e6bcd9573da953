use crate::artifact::fetch_artifact;
use crate::churn::ChurnModel;
use crate::config::ServiceConfig;
use crate::features::{
    churn_frame, ensure_known, segment_frame, CHURN_FEATURES, SEGMENT_FEATURES,
};
use crate::recommend::RecommendationMap;
use crate::segment::SegmentPipeline;
use crm_ml_service::dto::{
    ChurnPrediction, CustomerData, HealthReport, RecommendationResponse,
};
use crm_ml_service::error::ServiceError;
use rayon::prelude::*;
use std::time::Instant;
use tracing::{info, warn};

///
/// The loaded models and recommendation table. Built once at startup and
/// only read afterwards.
///
#[derive(Debug)]
pub struct ModelRegistry {
    churn: ChurnModel,
    segments: SegmentPipeline,
    recommendations: RecommendationMap,
}

impl ModelRegistry {
    pub fn new(
        churn: ChurnModel,
        segments: SegmentPipeline,
        recommendations: RecommendationMap,
    ) -> Result<Self, ServiceError> {
        ensure_known(churn.features(), &CHURN_FEATURES)
            .map_err(|err| err.context("Churn model"))?;
        ensure_known(&segments.feature_names(), &SEGMENT_FEATURES)
            .map_err(|err| err.context("Segmentation pipeline"))?;
        let uncovered = recommendations.uncovered(segments.n_clusters());
        if !uncovered.is_empty() {
            warn!(?uncovered, "Recommendation map does not cover every cluster");
        }
        Ok(ModelRegistry {
            churn,
            segments,
            recommendations,
        })
    }

    pub async fn load(config: &ServiceConfig) -> Result<Self, ServiceError> {
        let start = Instant::now();
        let bytes = fetch_artifact(&config.churn_model).await?;
        let churn = ChurnModel::from_slice(&bytes)?;
        info!(
            source = %config.churn_model,
            features = churn.features().len(),
            "Churn model loaded in {:.4} secs",
            start.elapsed().as_secs_f64()
        );

        let start = Instant::now();
        let bytes = fetch_artifact(&config.segment_model).await?;
        let segments = SegmentPipeline::from_slice(&bytes)?;
        info!(
            source = %config.segment_model,
            clusters = segments.n_clusters(),
            "Segmentation pipeline loaded in {:.4} secs",
            start.elapsed().as_secs_f64()
        );

        let start = Instant::now();
        let bytes = fetch_artifact(&config.recommendation_map).await?;
        let extension = config.recommendation_map.extension();
        let recommendations = RecommendationMap::from_slice(extension.as_deref(), &bytes)?;
        info!(
            source = %config.recommendation_map,
            entries = recommendations.len(),
            "Recommendation map loaded in {:.4} secs",
            start.elapsed().as_secs_f64()
        );

        Self::new(churn, segments, recommendations)
    }

    pub fn predict_churn(&self, customer: &CustomerData) -> Result<ChurnPrediction, ServiceError> {
        let frame = churn_frame(customer)?;
        let (labels, probabilities) = self.churn.predict(&frame)?;
        let predicted_class = first(labels.to_vec())?;
        let churn_probability = first(probabilities.to_vec())?;
        Ok(ChurnPrediction {
            customer_id: customer.customer_id.clone(),
            predicted_class,
            churn_probability,
        })
    }

    pub fn get_recommendation(
        &self,
        customer: &CustomerData,
    ) -> Result<RecommendationResponse, ServiceError> {
        let frame = segment_frame(customer)?;
        let cluster = first(self.segments.predict(&frame)?)?;
        let recommendation = self.recommendations.lookup(cluster)?;
        let cluster_id = i64::try_from(cluster).map_err(ServiceError::internal_server_error)?;
        Ok(RecommendationResponse {
            customer_id: customer.customer_id.clone(),
            cluster_id,
            recommendations: vec![recommendation.to_string()],
        })
    }

    /// Scores every customer; output order matches input order.
    pub fn predict_churn_batch(
        &self,
        customers: &[CustomerData],
    ) -> Result<Vec<ChurnPrediction>, ServiceError> {
        customers
            .par_iter()
            .enumerate()
            .map(|(idx, customer)| {
                self.predict_churn(customer)
                    .map_err(|err| err.context(format!("Customer {}", idx)))
            })
            .collect()
    }

    /// Recommends for every customer; output order matches input order.
    pub fn recommend_batch(
        &self,
        customers: &[CustomerData],
    ) -> Result<Vec<RecommendationResponse>, ServiceError> {
        customers
            .par_iter()
            .enumerate()
            .map(|(idx, customer)| {
                self.get_recommendation(customer)
                    .map_err(|err| err.context(format!("Customer {}", idx)))
            })
            .collect()
    }

    pub fn health(&self) -> HealthReport {
        HealthReport {
            status: String::from("ok"),
            clusters: self.segments.n_clusters(),
            churn_features: self.churn.features().len(),
        }
    }
}

fn first<T>(values: Vec<T>) -> Result<T, ServiceError> {
    values
        .into_iter()
        .next()
        .ok_or_else(|| ServiceError::internal_server_error("Model returned no prediction"))
}
