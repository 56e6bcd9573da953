use crate::error::ServiceError;
use crate::response::Status;
use futures::stream::TryStreamExt;
use rusoto_core::Region;
use rusoto_s3::{GetObjectRequest, S3Client, S3};
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub fn get_region() -> Result<Region, ServiceError> {
    match env::var("REGION") {
        Ok(val) => Region::from_str(val.as_str()).map_err(|_| ServiceError {
            msg: format!("Unable to parse region {}", val),
            status: Status::InternalServerError,
        }),
        _ => Err(ServiceError::internal_server_error(
            "Environment variable 'REGION' not found",
        )),
    }
}

pub fn get_env_var(name: &str) -> Result<String, ServiceError> {
    env::var(name).map_err(|_| {
        ServiceError::internal_server_error(&format!("Environment variable '{}' not found", name))
    })
}

/// Where a model artifact is read from.
#[derive(Clone, Debug, PartialEq)]
pub enum ArtifactSource {
    Local(PathBuf),
    S3 { bucket: String, key: String },
}

impl ArtifactSource {
    /// `s3://bucket/key` selects S3, anything else is a filesystem path.
    pub fn parse(raw: &str) -> Result<Self, ServiceError> {
        let raw = raw.trim();
        match raw.strip_prefix("s3://") {
            Some(rest) => match rest.split_once('/') {
                Some((bucket, key)) if !bucket.is_empty() && !key.is_empty() => {
                    Ok(ArtifactSource::S3 {
                        bucket: bucket.to_string(),
                        key: key.to_string(),
                    })
                }
                _ => Err(ServiceError::internal_server_error(format!(
                    "Unable to parse artifact url {}",
                    raw
                ))),
            },
            None => Ok(ArtifactSource::Local(PathBuf::from(raw))),
        }
    }

    /// File name extension, used to pick a decoder.
    pub fn extension(&self) -> Option<String> {
        let name = match self {
            ArtifactSource::Local(path) => path.to_string_lossy().into_owned(),
            ArtifactSource::S3 { key, .. } => key.clone(),
        };
        name.rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .filter(|ext| !ext.contains('/'))
    }
}

impl fmt::Display for ArtifactSource {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ArtifactSource::Local(path) => write!(f, "{}", path.display()),
            ArtifactSource::S3 { bucket, key } => write!(f, "s3://{}/{}", bucket, key),
        }
    }
}

pub fn read_local_file(path: &Path) -> Result<Vec<u8>, ServiceError> {
    std::fs::read(path).map_err(|err| {
        ServiceError::internal_server_error(format!("Unable to read {}: {}", path.display(), err))
    })
}

pub async fn download_object_from_s3(
    client: &S3Client,
    bucket: String,
    key: String,
) -> Result<Vec<u8>, ServiceError> {
    let request = GetObjectRequest {
        bucket,
        key,
        ..Default::default()
    };
    let mut object = client
        .get_object(request)
        .await
        .map_err(ServiceError::internal_server_error)?;
    let body = object
        .body
        .take()
        .ok_or(ServiceError::internal_server_error(
            "Unable to extract body",
        ))?;
    body.map_ok(|b| b.to_vec())
        .try_concat()
        .await
        .map_err(ServiceError::internal_server_error)
}
