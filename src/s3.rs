use anyhow::Result;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::{Builder as S3ConfigBuilder, Region};
use aws_sdk_s3::Client as S3Client;

use crate::config::AppConfig;

/// Build the S3 client from app config. Path-style addressing is forced so
/// custom endpoints (MinIO and friends) resolve without bucket subdomains.
pub async fn build_client(config: &AppConfig) -> Result<S3Client> {
    let mut loader = aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(config.aws_region.clone()));

    if let Some(endpoint) = &config.aws_endpoint_url {
        loader = loader.endpoint_url(endpoint);
    }

    if let (Some(access_key), Some(secret_key)) = (
        config.aws_access_key_id.as_deref(),
        config.aws_secret_access_key.as_deref(),
    ) {
        loader = loader.credentials_provider(Credentials::new(
            access_key,
            secret_key,
            None,
            None,
            "homeskillet-env",
        ));
    }

    let sdk_config = loader.load().await;
    let s3_config = S3ConfigBuilder::from(&sdk_config)
        .force_path_style(true)
        .build();

    Ok(S3Client::from_conf(s3_config))
}
