use crm_ml_service::error::ServiceError;
use crm_ml_service::util::{get_env_var, ArtifactSource};
use std::net::{IpAddr, SocketAddr};

pub const DEFAULT_CHURN_MODEL: &str = "models/churn_model.json";
pub const DEFAULT_SEGMENT_MODEL: &str = "models/segment_pipeline.json";
pub const DEFAULT_RECOMMENDATION_MAP: &str = "models/recommendations.json";
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: &str = "8002";
pub const DEFAULT_CORS_ORIGIN: &str = "http://localhost:8000";
/// Request body limit in bytes. axum's own default is 2 MB.
pub const DEFAULT_MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

/// Service settings, read once at startup.
#[derive(Clone, Debug, PartialEq)]
pub struct ServiceConfig {
    pub churn_model: ArtifactSource,
    pub segment_model: ArtifactSource,
    pub recommendation_map: ArtifactSource,
    pub addr: SocketAddr,
    pub cors_origin: String,
    pub max_body_bytes: usize,
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ServiceError> {
        Self::resolve(|name| get_env_var(name).ok())
    }

    /// Builds the config from `lookup`; blank values count as unset.
    pub fn resolve<F>(lookup: F) -> Result<Self, ServiceError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|val| !val.trim().is_empty());
        let or_default =
            |name: &str, default: &str| var(name).unwrap_or_else(|| default.to_string());

        // MODEL_PATH is the older name of the churn artifact variable
        let churn_model = var("CHURN_MODEL_PATH")
            .or_else(|| var("MODEL_PATH"))
            .unwrap_or_else(|| DEFAULT_CHURN_MODEL.to_string());
        let host = or_default("HOST", DEFAULT_HOST);
        let port = or_default("PORT", DEFAULT_PORT);

        let ip: IpAddr = host.trim().parse().map_err(|_| {
            ServiceError::internal_server_error(format!("Unable to parse HOST {}", host))
        })?;
        let port: u16 = port.trim().parse().map_err(|_| {
            ServiceError::internal_server_error(format!("Unable to parse PORT {}", port))
        })?;
        let max_body_bytes = match var("MAX_BODY_BYTES") {
            Some(limit) => limit
                .trim()
                .parse::<usize>()
                .ok()
                .filter(|limit| *limit > 0)
                .ok_or_else(|| {
                    ServiceError::internal_server_error(format!(
                        "Unable to parse MAX_BODY_BYTES {}",
                        limit
                    ))
                })?,
            None => DEFAULT_MAX_BODY_BYTES,
        };

        Ok(ServiceConfig {
            churn_model: ArtifactSource::parse(&churn_model)?,
            segment_model: ArtifactSource::parse(&or_default(
                "SEGMENT_MODEL_PATH",
                DEFAULT_SEGMENT_MODEL,
            ))?,
            recommendation_map: ArtifactSource::parse(&or_default(
                "RECOMMENDATION_MAP_PATH",
                DEFAULT_RECOMMENDATION_MAP,
            ))?,
            addr: SocketAddr::new(ip, port),
            cors_origin: or_default("CORS_ORIGIN", DEFAULT_CORS_ORIGIN),
            max_body_bytes,
        })
    }
}
