//! R2 client implementation.

use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::{Builder, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use tracing::{debug, info};

use crate::error::{StorageError, StorageResult};

/// Configuration for R2 client.
#[derive(Debug, Clone)]
pub struct R2Config {
    /// S3 API endpoint of the account.
    pub endpoint_url: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub bucket_name: String,
    /// Usually "auto" for R2.
    pub region: String,
    /// Public base URL the bucket is served from (custom domain or r2.dev).
    pub public_base_url: String,
}

impl R2Config {
    pub fn from_env() -> StorageResult<Self> {
        let required = |name: &str| {
            std::env::var(name)
                .ok()
                .filter(|v| !v.is_empty())
                .ok_or_else(|| StorageError::config_error(format!("{} not set", name)))
        };

        Ok(Self {
            endpoint_url: required("R2_ENDPOINT_URL")?,
            access_key_id: required("R2_ACCESS_KEY_ID")?,
            secret_access_key: required("R2_SECRET_ACCESS_KEY")?,
            bucket_name: required("R2_BUCKET_NAME")?,
            region: std::env::var("R2_REGION").unwrap_or_else(|_| "auto".to_string()),
            public_base_url: required("R2_PUBLIC_BASE_URL")?,
        })
    }
}

/// Cloudflare R2 storage client.
#[derive(Clone)]
pub struct R2Client {
    client: Client,
    bucket: String,
    public_base_url: String,
}

impl R2Client {
    pub fn new(config: R2Config) -> Self {
        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "r2",
        );

        let sdk_config = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .endpoint_url(&config.endpoint_url)
            .region(Region::new(config.region))
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();

        Self {
            client: Client::from_conf(sdk_config),
            bucket: config.bucket_name,
            public_base_url: config.public_base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn from_env() -> StorageResult<Self> {
        Ok(Self::new(R2Config::from_env()?))
    }

    /// Long-lived public URL of `key`.
    pub fn public_url(&self, key: &str) -> String {
        public_url(&self.public_base_url, key)
    }

    /// Inverse of [`public_url`](Self::public_url).
    pub fn key_for_url(&self, url: &str) -> StorageResult<String> {
        url.strip_prefix(&self.public_base_url)
            .and_then(|rest| rest.strip_prefix('/'))
            .filter(|key| !key.is_empty())
            .map(str::to_string)
            .ok_or_else(|| StorageError::ForeignUrl(url.to_string()))
    }

    /// Store bytes under `key` and return the public URL.
    pub async fn put(&self, key: &str, data: Vec<u8>, content_type: &str) -> StorageResult<String> {
        let size = data.len();
        debug!("Uploading {} bytes to {}", size, key);

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(data))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| StorageError::upload_failed(e.to_string()))?;

        info!(key, size, "Stored asset");
        Ok(self.public_url(key))
    }

    pub async fn download_bytes(&self, key: &str) -> StorageResult<Vec<u8>> {
        debug!("Downloading {}", key);

        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                if e.to_string().contains("NoSuchKey") {
                    StorageError::not_found(key)
                } else {
                    StorageError::DownloadFailed(e.to_string())
                }
            })?;

        Ok(response
            .body
            .collect()
            .await
            .map_err(|e| StorageError::DownloadFailed(e.to_string()))?
            .into_bytes()
            .to_vec())
    }

    /// Head the bucket to verify endpoint and credentials.
    pub async fn check_connectivity(&self) -> StorageResult<()> {
        self.client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(|e| StorageError::AwsSdk(format!("R2 connectivity check failed: {}", e)))?;
        Ok(())
    }
}

fn public_url(base: &str, key: &str) -> String {
    format!("{}/{}", base, key.trim_start_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn client() -> R2Client {
        R2Client::new(R2Config {
            endpoint_url: "https://account.r2.cloudflarestorage.com".into(),
            access_key_id: "key".into(),
            secret_access_key: "secret".into(),
            bucket_name: "reels".into(),
            region: "auto".into(),
            public_base_url: "https://media.example.com/".into(),
        })
    }

    #[test]
    fn test_public_url_round_trips_to_key() {
        let client = client();
        let url = client.public_url("videos/v1/scenes/0/image.png");
        assert_eq!(url, "https://media.example.com/videos/v1/scenes/0/image.png");
        assert_eq!(client.key_for_url(&url).unwrap(), "videos/v1/scenes/0/image.png");
    }

    #[test]
    fn test_foreign_url_rejected() {
        assert!(matches!(
            client().key_for_url("https://elsewhere.com/x.png"),
            Err(StorageError::ForeignUrl(_))
        ));
    }

    #[test]
    #[serial]
    fn test_config_requires_public_base_url() {
        for (name, value) in [
            ("R2_ENDPOINT_URL", "https://e"),
            ("R2_ACCESS_KEY_ID", "k"),
            ("R2_SECRET_ACCESS_KEY", "s"),
            ("R2_BUCKET_NAME", "b"),
        ] {
            std::env::set_var(name, value);
        }
        std::env::remove_var("R2_PUBLIC_BASE_URL");
        assert!(matches!(R2Config::from_env(), Err(StorageError::ConfigError(_))));
    }
}
