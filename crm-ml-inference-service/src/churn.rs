use crate::features::{FeatureFrame, FeatureValue};
use crm_ml_service::error::ServiceError;
use ndarray::{Array1, Array2};
use serde::Deserialize;

fn default_threshold() -> f64 {
    0.5
}

#[derive(Debug, Deserialize)]
pub struct ScalerArtifact {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

/// Exported parameters of the trained churn classifier.
#[derive(Debug, Deserialize)]
pub struct ChurnArtifact {
    pub features: Vec<String>,
    #[serde(default)]
    pub scaler: Option<ScalerArtifact>,
    pub coefficients: Vec<f64>,
    pub intercept: f64,
    #[serde(default = "default_threshold")]
    pub threshold: f64,
}

#[derive(Debug)]
struct StandardScaler {
    mean: Array1<f64>,
    scale: Array1<f64>,
}

impl StandardScaler {
    fn transform(&self, x: &mut Array2<f64>) {
        for mut row in x.rows_mut() {
            row -= &self.mean;
            row /= &self.scale;
        }
    }
}

///
/// Binary logistic-regression churn classifier.
///
/// The positive class (1) means the customer is expected to churn.
///
#[derive(Debug)]
pub struct ChurnModel {
    features: Vec<String>,
    scaler: Option<StandardScaler>,
    coefficients: Array1<f64>,
    intercept: f64,
    threshold: f64,
}

impl ChurnModel {
    pub fn from_slice(bytes: &[u8]) -> Result<Self, ServiceError> {
        let artifact: ChurnArtifact = serde_json::from_slice(bytes)
            .map_err(ServiceError::internal_server_error)
            .map_err(|err| err.context("Invalid churn model artifact"))?;
        Self::from_artifact(artifact)
    }

    pub fn from_artifact(artifact: ChurnArtifact) -> Result<Self, ServiceError> {
        let n_features = artifact.features.len();
        if n_features == 0 {
            return Err(ise("Churn model declares no features"));
        }
        if artifact.coefficients.len() != n_features {
            return Err(ise(format!(
                "Churn model has {} coefficients for {} features",
                artifact.coefficients.len(),
                n_features
            )));
        }
        if !artifact.intercept.is_finite() || artifact.coefficients.iter().any(|c| !c.is_finite()) {
            return Err(ise("Churn model parameters must be finite"));
        }
        if !(0.0..=1.0).contains(&artifact.threshold) {
            return Err(ise(format!(
                "Churn threshold {} is outside [0, 1]",
                artifact.threshold
            )));
        }
        let scaler = match artifact.scaler {
            Some(ScalerArtifact { mean, scale }) => {
                if mean.len() != n_features || scale.len() != n_features {
                    return Err(ise("Churn scaler dimensions do not match its features"));
                }
                // zero variance columns pass through unscaled
                let scale = scale
                    .into_iter()
                    .map(|s| if s == 0.0 { 1.0 } else { s })
                    .collect::<Vec<_>>();
                if mean.iter().chain(&scale).any(|v| !v.is_finite()) {
                    return Err(ise("Churn scaler parameters must be finite"));
                }
                Some(StandardScaler {
                    mean: Array1::from(mean),
                    scale: Array1::from(scale),
                })
            }
            None => None,
        };
        Ok(ChurnModel {
            features: artifact.features,
            scaler,
            coefficients: Array1::from(artifact.coefficients),
            intercept: artifact.intercept,
            threshold: artifact.threshold,
        })
    }

    pub fn features(&self) -> &[String] {
        &self.features
    }

    /// Probability of the positive class for every row of `frame`.
    pub fn predict_proba(&self, frame: &FeatureFrame) -> Result<Array1<f64>, ServiceError> {
        let x = self.design_matrix(frame)?;
        let probabilities = (x.dot(&self.coefficients) + self.intercept).mapv(sigmoid);
        if probabilities.iter().any(|p| !p.is_finite()) {
            return Err(ise("Churn model produced a non-finite probability"));
        }
        Ok(probabilities)
    }

    /// Class label (0 or 1) and probability for every row of `frame`,
    /// from a single pass over the model.
    pub fn predict(
        &self,
        frame: &FeatureFrame,
    ) -> Result<(Array1<u8>, Array1<f64>), ServiceError> {
        let probabilities = self.predict_proba(frame)?;
        Ok((probabilities.mapv(|p| self.label(p)), probabilities))
    }

    fn label(&self, probability: f64) -> u8 {
        if probability > self.threshold {
            1
        } else {
            0
        }
    }

    fn design_matrix(&self, frame: &FeatureFrame) -> Result<Array2<f64>, ServiceError> {
        let indices = self
            .features
            .iter()
            .map(|name| frame.column_index(name))
            .collect::<Result<Vec<_>, _>>()?;
        let mut x = Array2::zeros((frame.n_rows(), indices.len()));
        for (mut out, row) in x.rows_mut().into_iter().zip(frame.rows()) {
            for (slot, &idx) in indices.iter().enumerate() {
                out[slot] = match &row[idx] {
                    FeatureValue::Number(v) => *v,
                    FeatureValue::Missing => 0.0,
                    FeatureValue::Text(_) => {
                        return Err(ise(format!(
                            "Churn feature '{}' must be numeric",
                            self.features[slot]
                        )))
                    }
                };
            }
        }
        if let Some(scaler) = &self.scaler {
            scaler.transform(&mut x);
        }
        Ok(x)
    }
}

#[inline]
fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

fn ise<T: std::fmt::Display>(msg: T) -> ServiceError {
    ServiceError::internal_server_error(msg)
}
