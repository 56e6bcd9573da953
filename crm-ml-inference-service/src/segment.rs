use crate::features::{FeatureFrame, FeatureValue};
use crm_ml_service::error::ServiceError;
use ndarray::{Array2, ArrayView1};
use serde::Deserialize;

fn unit_scale() -> f64 {
    1.0
}

fn comma() -> String {
    String::from(",")
}

/// One step of the column transformer that feeds the clusterer.
#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ColumnTransform {
    /// Imputed then standardized number.
    Numeric {
        name: String,
        #[serde(default)]
        impute: f64,
        #[serde(default)]
        mean: f64,
        #[serde(default = "unit_scale")]
        scale: f64,
    },
    /// One slot per known category; unknown categories encode as zeros.
    OneHot {
        name: String,
        categories: Vec<String>,
        #[serde(default)]
        impute: Option<String>,
    },
    /// Separator-joined tags, one slot per vocabulary entry.
    MultiHot {
        name: String,
        vocabulary: Vec<String>,
        #[serde(default = "comma")]
        separator: String,
    },
}

impl ColumnTransform {
    pub fn name(&self) -> &str {
        match self {
            ColumnTransform::Numeric { name, .. }
            | ColumnTransform::OneHot { name, .. }
            | ColumnTransform::MultiHot { name, .. } => name,
        }
    }

    pub fn width(&self) -> usize {
        match self {
            ColumnTransform::Numeric { .. } => 1,
            ColumnTransform::OneHot { categories, .. } => categories.len(),
            ColumnTransform::MultiHot { vocabulary, .. } => vocabulary.len(),
        }
    }

    fn encode(&self, value: &FeatureValue, out: &mut [f64]) -> Result<(), ServiceError> {
        match self {
            ColumnTransform::Numeric {
                name,
                impute,
                mean,
                scale,
            } => {
                let raw = match value {
                    FeatureValue::Number(v) => *v,
                    FeatureValue::Missing => *impute,
                    FeatureValue::Text(_) => {
                        return Err(ise(format!("Segment feature '{}' must be numeric", name)))
                    }
                };
                let scale = if *scale == 0.0 { 1.0 } else { *scale };
                out[0] = (raw - mean) / scale;
            }
            ColumnTransform::OneHot {
                name,
                categories,
                impute,
            } => {
                let category = match value {
                    FeatureValue::Text(s) => Some(s.as_str()),
                    FeatureValue::Missing => impute.as_deref(),
                    FeatureValue::Number(_) => {
                        return Err(ise(format!("Segment feature '{}' must be text", name)))
                    }
                };
                out.fill(0.0);
                if let Some(pos) = category.and_then(|c| categories.iter().position(|k| k == c)) {
                    out[pos] = 1.0;
                }
            }
            ColumnTransform::MultiHot {
                name,
                vocabulary,
                separator,
            } => {
                out.fill(0.0);
                let joined = match value {
                    FeatureValue::Text(s) => s.as_str(),
                    FeatureValue::Missing => return Ok(()),
                    FeatureValue::Number(_) => {
                        return Err(ise(format!("Segment feature '{}' must be text", name)))
                    }
                };
                for token in joined.split(separator.as_str()).map(str::trim) {
                    if let Some(pos) = vocabulary.iter().position(|v| v == token) {
                        out[pos] = 1.0;
                    }
                }
            }
        }
        Ok(())
    }
}

/// Exported parameters of the trained segmentation pipeline.
#[derive(Debug, Deserialize)]
pub struct SegmentArtifact {
    pub columns: Vec<ColumnTransform>,
    pub centroids: Vec<Vec<f64>>,
}

///
/// Column transformer followed by a fitted k-means clusterer. Predicting
/// assigns each row to its nearest centroid.
///
#[derive(Debug)]
pub struct SegmentPipeline {
    columns: Vec<ColumnTransform>,
    centroids: Array2<f64>,
}

impl SegmentPipeline {
    pub fn from_slice(bytes: &[u8]) -> Result<Self, ServiceError> {
        let artifact: SegmentArtifact = serde_json::from_slice(bytes)
            .map_err(ServiceError::internal_server_error)
            .map_err(|err| err.context("Invalid segmentation artifact"))?;
        Self::from_artifact(artifact)
    }

    pub fn from_artifact(artifact: SegmentArtifact) -> Result<Self, ServiceError> {
        if artifact.columns.is_empty() {
            return Err(ise("Segmentation pipeline declares no columns"));
        }
        if artifact.centroids.is_empty() {
            return Err(ise("Segmentation pipeline has no centroids"));
        }
        for column in &artifact.columns {
            if let ColumnTransform::Numeric {
                name,
                impute,
                mean,
                scale,
            } = column
            {
                if [impute, mean, scale].iter().any(|v| !v.is_finite()) {
                    return Err(ise(format!("Parameters of '{}' must be finite", name)));
                }
            }
        }
        let width: usize = artifact.columns.iter().map(ColumnTransform::width).sum();
        let n_clusters = artifact.centroids.len();
        if let Some(bad) = artifact.centroids.iter().position(|c| c.len() != width) {
            return Err(ise(format!(
                "Centroid {} has {} dimensions but the encoded width is {}",
                bad,
                artifact.centroids[bad].len(),
                width
            )));
        }
        let flat: Vec<f64> = artifact.centroids.into_iter().flatten().collect();
        if flat.iter().any(|v| !v.is_finite()) {
            return Err(ise("Centroids must be finite"));
        }
        let centroids = Array2::from_shape_vec((n_clusters, width), flat)
            .map_err(ServiceError::internal_server_error)?;
        Ok(SegmentPipeline {
            columns: artifact.columns,
            centroids,
        })
    }

    pub fn n_clusters(&self) -> usize {
        self.centroids.nrows()
    }

    pub fn feature_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name().to_string()).collect()
    }

    /// Encoded feature matrix, one row per frame row.
    pub fn transform(&self, frame: &FeatureFrame) -> Result<Array2<f64>, ServiceError> {
        let indices = self
            .columns
            .iter()
            .map(|column| frame.column_index(column.name()))
            .collect::<Result<Vec<_>, _>>()?;
        let mut x = Array2::zeros((frame.n_rows(), self.centroids.ncols()));
        for (mut out, row) in x.rows_mut().into_iter().zip(frame.rows()) {
            let out = out
                .as_slice_mut()
                .ok_or_else(|| ise("Encoded row is not contiguous"))?;
            let mut offset = 0;
            for (column, &idx) in self.columns.iter().zip(&indices) {
                let end = offset + column.width();
                column.encode(&row[idx], &mut out[offset..end])?;
                offset = end;
            }
        }
        Ok(x)
    }

    /// Cluster id for every row of `frame`.
    pub fn predict(&self, frame: &FeatureFrame) -> Result<Vec<usize>, ServiceError> {
        let x = self.transform(frame)?;
        Ok(x.outer_iter().map(|row| self.nearest_centroid(row)).collect())
    }

    fn nearest_centroid(&self, point: ArrayView1<f64>) -> usize {
        let mut min_distance = f64::INFINITY;
        let mut closest_cluster = 0;
        for (cluster_idx, centroid) in self.centroids.outer_iter().enumerate() {
            let distance: f64 = point
                .iter()
                .zip(centroid.iter())
                .map(|(a, b)| (a - b).powi(2))
                .sum();
            if distance < min_distance {
                min_distance = distance;
                closest_cluster = cluster_idx;
            }
        }
        closest_cluster
    }
}

fn ise<T: std::fmt::Display>(msg: T) -> ServiceError {
    ServiceError::internal_server_error(msg)
}
