use crm_ml_service::error::ServiceError;
use csv::Reader;
use rustc_hash::FxHashMap;
use serde::Deserialize;

#[derive(Deserialize)]
struct MapRow {
    cluster_id: String,
    recommendation: String,
}

/// Read-only lookup from cluster id to a recommendation.
#[derive(Debug)]
pub struct RecommendationMap {
    entries: FxHashMap<String, String>,
}

impl RecommendationMap {
    /// Decodes by file extension: `csv` or, by default, a JSON object.
    pub fn from_slice(extension: Option<&str>, bytes: &[u8]) -> Result<Self, ServiceError> {
        match extension {
            Some("csv") => Self::from_csv(bytes),
            _ => Self::from_json(bytes),
        }
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self, ServiceError> {
        let entries: FxHashMap<String, String> = serde_json::from_slice(bytes)
            .map_err(ServiceError::internal_server_error)
            .map_err(|err| err.context("Invalid recommendation map"))?;
        Self::from_entries(entries)
    }

    pub fn from_csv(bytes: &[u8]) -> Result<Self, ServiceError> {
        let mut reader = Reader::from_reader(bytes);
        let mut entries = FxHashMap::default();
        for row in reader.deserialize::<MapRow>() {
            let MapRow {
                cluster_id,
                recommendation,
            } = row.map_err(|_| {
                ServiceError::internal_server_error(
                    "Recommendation map must contain columns 'cluster_id' and 'recommendation'",
                )
            })?;
            let cluster_id = cluster_id.trim().to_string();
            if entries.contains_key(&cluster_id) {
                return Err(ServiceError::internal_server_error(format!(
                    "Cluster {} appears twice in the recommendation map",
                    cluster_id
                )));
            }
            entries.insert(cluster_id, recommendation);
        }
        Self::from_entries(entries)
    }

    fn from_entries(raw: FxHashMap<String, String>) -> Result<Self, ServiceError> {
        let mut entries = FxHashMap::default();
        for (cluster_id, recommendation) in raw {
            let cluster_id = cluster_id.trim().to_string();
            if recommendation.trim().is_empty() {
                return Err(ServiceError::internal_server_error(format!(
                    "Cluster {} has an empty recommendation",
                    cluster_id
                )));
            }
            if entries.insert(cluster_id.clone(), recommendation).is_some() {
                return Err(ServiceError::internal_server_error(format!(
                    "Cluster {} appears twice in the recommendation map",
                    cluster_id
                )));
            }
        }
        Ok(RecommendationMap { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn lookup(&self, cluster_id: usize) -> Result<&str, ServiceError> {
        self.entries
            .get(&cluster_id.to_string())
            .map(String::as_str)
            .ok_or_else(|| {
                ServiceError::internal_server_error(format!(
                    "No recommendation for cluster {}",
                    cluster_id
                ))
            })
    }

    /// Cluster ids below `n_clusters` that have no entry.
    pub fn uncovered(&self, n_clusters: usize) -> Vec<usize> {
        (0..n_clusters)
            .filter(|id| !self.entries.contains_key(&id.to_string()))
            .collect()
    }
}
