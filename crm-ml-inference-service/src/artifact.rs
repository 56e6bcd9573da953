use crm_ml_service::error::ServiceError;
use crm_ml_service::util::{
    download_object_from_s3, get_region, read_local_file, ArtifactSource,
};
use lazy_static::lazy_static;
use rusoto_core::{Client, Region};
use rusoto_s3::S3Client;

lazy_static! {
    // AWS Region, only needed for s3:// artifacts
    static ref REGION: Result<Region, ServiceError> = get_region();
}

/// Raw bytes of an artifact, from disk or S3.
pub async fn fetch_artifact(source: &ArtifactSource) -> Result<Vec<u8>, ServiceError> {
    let bytes = match source {
        ArtifactSource::Local(path) => read_local_file(path)?,
        ArtifactSource::S3 { bucket, key } => {
            let region = REGION.clone()?;
            let client = S3Client::new_with_client(Client::shared(), region);
            download_object_from_s3(&client, bucket.clone(), key.clone()).await?
        }
    };
    Ok(bytes)
}
