//! Publication of finished artifacts to S3-compatible object storage.
//!
//! Optional and off by default. With `publish` configured, the final artifact of a completed job
//! is uploaded after it has been persisted locally and the outcome carries a time-limited
//! presigned download URL. Uploading needs the `s3` cargo feature; without it a configured
//! `publish` section is refused when the config is validated.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::foundation::error::{RenderError, RenderResult};
use crate::output::ArtifactReference;

/// Longest lifetime S3 accepts for a presigned URL.
pub const MAX_URL_EXPIRY: Duration = Duration::from_secs(7 * 24 * 60 * 60);

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishConfig {
    pub bucket: String,
    /// Falls back to the SDK's region chain, then `us-east-1`.
    pub region: Option<String>,
    /// Custom endpoint for MinIO, R2 and other S3-compatible stores.
    pub endpoint: Option<String>,
    pub force_path_style: bool,
    /// Static credentials. When absent the SDK's default credential chain is used.
    pub access_key_id: Option<String>,
    #[serde(skip_serializing)]
    pub secret_access_key: Option<String>,
    /// Leading key segment for every upload.
    pub prefix: String,
    #[serde(with = "crate::config::secs")]
    pub url_expiry: Duration,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            bucket: String::new(),
            region: None,
            endpoint: None,
            force_path_style: false,
            access_key_id: None,
            secret_access_key: None,
            prefix: "renders".to_string(),
            url_expiry: MAX_URL_EXPIRY,
        }
    }
}

impl PublishConfig {
    pub fn validate(&self) -> RenderResult<()> {
        if self.bucket.trim().is_empty() {
            return Err(RenderError::config("publish bucket must not be empty"));
        }
        if self.url_expiry.is_zero() || self.url_expiry > MAX_URL_EXPIRY {
            return Err(RenderError::config(format!(
                "publish url_expiry must be between 1s and {}s",
                MAX_URL_EXPIRY.as_secs()
            )));
        }
        if self.access_key_id.is_some() != self.secret_access_key.is_some() {
            return Err(RenderError::config(
                "publish access_key_id and secret_access_key must be set together",
            ));
        }
        if !cfg!(feature = "s3") {
            return Err(RenderError::config(
                "publish is configured but this build lacks the `s3` feature",
            ));
        }
        Ok(())
    }
}

/// Where an artifact ended up in object storage.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PublishedArtifact {
    pub bucket: String,
    pub key: String,
    /// Presigned GET URL.
    pub url: String,
    pub expires_in_secs: u64,
}

/// `[users/<user_id>/]<prefix>/<job_id>/<file_name>`
pub fn object_key(prefix: &str, user_id: Option<&str>, job_id: Uuid, file_name: &str) -> String {
    let prefix = prefix.trim_matches('/');
    let mut key = String::new();
    if let Some(user) = user_id {
        key.push_str("users/");
        key.push_str(user);
        key.push('/');
    }
    if !prefix.is_empty() {
        key.push_str(prefix);
        key.push('/');
    }
    key.push_str(&format!("{job_id}/{file_name}"));
    key
}

pub fn content_type(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("mp4") => "video/mp4",
        Some("png") => "image/png",
        Some("exr") => "image/x-exr",
        _ => "application/octet-stream",
    }
}

/// Uploads artifacts and signs download URLs for them.
#[derive(Debug)]
pub struct Publisher {
    config: PublishConfig,
    #[cfg(feature = "s3")]
    client: aws_sdk_s3::Client,
}

impl Publisher {
    #[cfg(feature = "s3")]
    pub async fn connect(config: PublishConfig) -> RenderResult<Self> {
        use aws_config::BehaviorVersion;
        use aws_config::meta::region::RegionProviderChain;
        use aws_sdk_s3::config::{Credentials, Region};

        config.validate()?;
        let region = RegionProviderChain::first_try(config.region.clone().map(Region::new))
            .or_default_provider()
            .or_else(Region::new("us-east-1"));
        let mut loader = aws_config::defaults(BehaviorVersion::latest()).region(region);
        if let (Some(id), Some(secret)) = (&config.access_key_id, &config.secret_access_key) {
            loader = loader.credentials_provider(Credentials::new(
                id,
                secret,
                None,
                None,
                "logo-render",
            ));
        }
        if let Some(endpoint) = &config.endpoint {
            loader = loader.endpoint_url(endpoint);
        }
        let shared = loader.load().await;
        let s3 = aws_sdk_s3::config::Builder::from(&shared)
            .force_path_style(config.force_path_style)
            .build();

        tracing::debug!(bucket = %config.bucket, endpoint = ?config.endpoint, "s3 publisher ready");
        Ok(Self {
            client: aws_sdk_s3::Client::from_conf(s3),
            config,
        })
    }

    #[cfg(not(feature = "s3"))]
    pub async fn connect(config: PublishConfig) -> RenderResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PublishConfig {
        &self.config
    }

    /// Upload `artifact` and return a presigned URL for it.
    #[cfg(feature = "s3")]
    #[tracing::instrument(skip_all, fields(job_id = %job_id))]
    pub async fn publish(
        &self,
        artifact: &ArtifactReference,
        user_id: Option<&str>,
        job_id: Uuid,
    ) -> RenderResult<PublishedArtifact> {
        use aws_sdk_s3::error::DisplayErrorContext;
        use aws_sdk_s3::presigning::PresigningConfig;
        use aws_sdk_s3::primitives::ByteStream;

        let bucket = &self.config.bucket;
        let key = object_key(&self.config.prefix, user_id, job_id, &artifact.file_name);

        let body = ByteStream::from_path(&artifact.path).await.map_err(|e| {
            RenderError::publish(format!("read '{}': {e}", artifact.path.display()))
        })?;
        self.client
            .put_object()
            .bucket(bucket)
            .key(&key)
            .content_type(content_type(&artifact.path))
            .body(body)
            .send()
            .await
            .map_err(|e| {
                RenderError::publish(format!(
                    "upload s3://{bucket}/{key}: {}",
                    DisplayErrorContext(&e)
                ))
            })?;

        let presigning = PresigningConfig::expires_in(self.config.url_expiry)
            .map_err(|e| RenderError::publish(format!("presign s3://{bucket}/{key}: {e}")))?;
        let signed = self
            .client
            .get_object()
            .bucket(bucket)
            .key(&key)
            .presigned(presigning)
            .await
            .map_err(|e| {
                RenderError::publish(format!(
                    "presign s3://{bucket}/{key}: {}",
                    DisplayErrorContext(&e)
                ))
            })?;

        tracing::info!(%bucket, %key, "artifact published");
        Ok(PublishedArtifact {
            bucket: bucket.clone(),
            key,
            url: signed.uri().to_string(),
            expires_in_secs: self.config.url_expiry.as_secs(),
        })
    }

    #[cfg(not(feature = "s3"))]
    pub async fn publish(
        &self,
        _artifact: &ArtifactReference,
        _user_id: Option<&str>,
        _job_id: Uuid,
    ) -> RenderResult<PublishedArtifact> {
        Err(RenderError::publish("this build lacks the `s3` feature"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> PublishConfig {
        PublishConfig {
            bucket: "renders-bucket".into(),
            region: Some("eu-west-1".into()),
            endpoint: Some("http://127.0.0.1:9".into()),
            force_path_style: true,
            access_key_id: Some("AKIDEXAMPLE".into()),
            secret_access_key: Some("secret".into()),
            ..PublishConfig::default()
        }
    }

    #[test]
    fn keys_are_scoped_by_owner_and_job() {
        let job = Uuid::nil();
        assert_eq!(
            object_key("renders", Some("user_7"), job, "render.mp4"),
            format!("users/user_7/renders/{job}/render.mp4")
        );
        assert_eq!(
            object_key("/renders/", None, job, "frame_0001.png"),
            format!("renders/{job}/frame_0001.png")
        );
        assert_eq!(object_key("", None, job, "a.png"), format!("{job}/a.png"));
    }

    #[test]
    fn content_types_follow_the_extension() {
        assert_eq!(content_type(Path::new("out/render.mp4")), "video/mp4");
        assert_eq!(content_type(Path::new("frame_0001.PNG")), "image/png");
        assert_eq!(content_type(Path::new("blob")), "application/octet-stream");
    }

    #[test]
    fn validation_rejects_incomplete_settings() {
        let mut cfg = config();
        cfg.bucket.clear();
        assert!(cfg.validate().is_err());

        let mut cfg = config();
        cfg.url_expiry = MAX_URL_EXPIRY + Duration::from_secs(1);
        assert!(cfg.validate().is_err());

        let mut cfg = config();
        cfg.secret_access_key = None;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn secret_is_never_serialized() {
        let json = serde_json::to_string(&config()).unwrap();
        assert!(!json.contains("secret"));
        assert!(json.contains("AKIDEXAMPLE"));
    }

    #[cfg(not(feature = "s3"))]
    #[tokio::test]
    async fn builds_without_s3_refuse_to_publish() {
        let err = Publisher::connect(config()).await.unwrap_err();
        assert!(matches!(err, RenderError::Config(_)));
    }

    #[cfg(feature = "s3")]
    #[tokio::test]
    async fn connect_with_static_credentials_needs_no_network() {
        let publisher = Publisher::connect(config()).await.unwrap();
        assert_eq!(publisher.config().bucket, "renders-bucket");
    }

    #[cfg(feature = "s3")]
    #[tokio::test]
    async fn unreachable_endpoint_is_a_publish_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame_0001.png");
        std::fs::write(&path, b"png").unwrap();
        let artifact = ArtifactReference {
            file_name: "frame_0001.png".into(),
            path,
            url: "job/frame_0001.png".into(),
        };

        let publisher = Publisher::connect(config()).await.unwrap();
        let err = publisher
            .publish(&artifact, None, Uuid::nil())
            .await
            .unwrap_err();
        assert!(matches!(err, RenderError::Publish(_)));
    }
}
