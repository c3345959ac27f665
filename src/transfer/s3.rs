use crate::config::S3Config;
use crate::transfer::error::StoreError;
use crate::transfer::store::{ObjectStore, RemoteObject};
use async_trait::async_trait;
use aws_credential_types::Credentials;
use aws_sdk_s3::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::{config::Region, Client};
use std::path::Path;
use tracing::{debug, info};

/// S3-compatible object store (AWS, MinIO, ...)
#[derive(Clone)]
pub struct S3ObjectStore {
    client: Client,
    bucket: String,
}

impl S3ObjectStore {
    /// Create a new S3ObjectStore instance from configuration
    pub async fn new(config: &S3Config) -> Result<Self, StoreError> {
        info!(
            "Creating S3ObjectStore with config: endpoint={:?}, region={}, bucket={}, access_key={:?}",
            config.endpoint, config.region, config.bucket, config.access_key_id
        );

        if config.bucket.is_empty() {
            return Err(StoreError::Configuration("bucket must not be empty".to_string()));
        }

        // Path-style requests keep MinIO and other non-AWS endpoints working
        let mut s3_config_builder = aws_sdk_s3::config::Builder::new()
            .behavior_version(aws_sdk_s3::config::BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .force_path_style(true);

        if let (Some(access_key), Some(secret_key)) =
            (&config.access_key_id, &config.secret_access_key)
        {
            let credentials = Credentials::new(
                access_key,
                secret_key,
                None,
                None,
                "StaticCredentialsProvider",
            );

            s3_config_builder = s3_config_builder.credentials_provider(credentials);
        } else {
            let shared = aws_config::from_env()
                .region(Region::new(config.region.clone()))
                .load()
                .await;
            if let Some(provider) = shared.credentials_provider() {
                s3_config_builder = s3_config_builder.credentials_provider(provider);
            }
        }

        if let Some(endpoint) = &config.endpoint {
            info!("Setting custom endpoint: {}", endpoint);
            s3_config_builder = s3_config_builder.endpoint_url(endpoint);
        }

        let client = Client::from_conf(s3_config_builder.build());
        info!("Created S3 client for region {}", config.region);

        let store = Self {
            client,
            bucket: config.bucket.clone(),
        };

        #[cfg(test)]
        {
            store.ensure_bucket_exists().await?;
        }

        Ok(store)
    }

    #[cfg(test)]
    async fn ensure_bucket_exists(&self) -> Result<(), StoreError> {
        if self.client.head_bucket().bucket(&self.bucket).send().await.is_ok() {
            return Ok(());
        }

        match self.client.create_bucket().bucket(&self.bucket).send().await {
            Ok(_) => Ok(()),
            Err(e) => match e.code() {
                Some("BucketAlreadyExists") | Some("BucketAlreadyOwnedByYou") => Ok(()),
                _ => Err(StoreError::Other(anyhow::anyhow!(
                    "Failed to create bucket '{}': {}",
                    self.bucket,
                    e
                ))),
            },
        }
    }
}

/// Map an SDK failure to a store error, preferring the service error code
fn classify<E, R>(key: &str, err: SdkError<E, R>) -> StoreError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    if matches!(
        err,
        SdkError::DispatchFailure(_) | SdkError::TimeoutError(_) | SdkError::ResponseError(_)
    ) {
        return StoreError::Network(format!("{key}: {err}"));
    }

    let message = err.message().unwrap_or_default().to_string();
    match err.code() {
        Some("PreconditionFailed") | Some("ConditionalRequestConflict") => {
            return StoreError::Conflict(key.to_string());
        }
        Some("NoSuchKey") | Some("NotFound") => {
            return StoreError::ObjectNotFound(key.to_string());
        }
        Some("AccessDenied") | Some("Forbidden") => {
            return StoreError::AccessDenied(key.to_string(), message);
        }
        _ => {}
    }

    let error_str = format!("{err:?}");
    if error_str.contains("PreconditionFailed") || error_str.contains("status: 412") {
        StoreError::Conflict(key.to_string())
    } else {
        StoreError::Other(anyhow::anyhow!("{key}: {err} {message}"))
    }
}

fn trim_etag(etag: &str) -> String {
    etag.trim_matches('"').to_string()
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn head_object(&self, key: &str) -> Result<Option<RemoteObject>, StoreError> {
        debug!("HEAD s3://{}/{}", self.bucket, key);

        let result = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await;

        match result {
            Ok(output) => Ok(Some(RemoteObject {
                etag: output.e_tag().map(trim_etag).unwrap_or_default(),
                size: output.content_length().unwrap_or_default().max(0) as u64,
            })),
            Err(SdkError::ServiceError(service_err)) if service_err.err().is_not_found() => {
                Ok(None)
            }
            Err(e) => match classify(key, e) {
                StoreError::ObjectNotFound(_) => Ok(None),
                other => Err(other),
            },
        }
    }

    async fn put_object(
        &self,
        key: &str,
        path: &Path,
        content_md5: &str,
        overwrite: bool,
    ) -> Result<String, StoreError> {
        info!(
            "Uploading {} to s3://{}/{} (overwrite={})",
            path.display(),
            self.bucket,
            key,
            overwrite
        );

        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| StoreError::Io(std::io::Error::other(e)))?;

        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type("application/x-tar")
            .content_md5(content_md5)
            .body(body);
        if !overwrite {
            request = request.if_none_match("*");
        }

        let output = request.send().await.map_err(|e| classify(key, e))?;
        let etag = output.e_tag().map(trim_etag).unwrap_or_default();

        debug!("Stored s3://{}/{} with etag {}", self.bucket, key, etag);
        Ok(etag)
    }

    #[cfg(test)]
    async fn remove_object(&self, key: &str) -> Result<(), StoreError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| classify(key, e))?;
        Ok(())
    }
}
