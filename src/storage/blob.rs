use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use futures::StreamExt;
use object_store::aws::AmazonS3Builder;
use object_store::buffered::BufWriter;
use object_store::path::Path as ObjectPath;
use object_store::{ClientOptions, ObjectStore, RetryConfig};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::config::{S3Config, TransferConfig};

use super::uri::VideoUri;

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("http transfer failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("object storage error: {0}")]
    ObjectStore(#[from] object_store::Error),
    #[error("cannot upload to {0}: only s3 destinations are writable")]
    ReadOnly(String),
    #[error("s3 client cache poisoned")]
    Poisoned,
}

/// Streams videos between remote locations and local files without holding
/// whole videos in memory.
#[derive(Clone)]
pub struct BlobStore {
    http: reqwest::Client,
    s3: S3Config,
    chunk_size: usize,
    buckets: Arc<Mutex<HashMap<String, Arc<dyn ObjectStore>>>>,
}

impl BlobStore {
    pub fn new(s3: S3Config, transfer: &TransferConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            s3,
            chunk_size: transfer.chunk_size,
            buckets: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Copies `uri` into the local file `dest`, returning the byte count.
    pub async fn download(&self, uri: &VideoUri, dest: &Path) -> Result<u64, TransferError> {
        let mut file = tokio::fs::File::create(dest).await?;
        let mut written = 0u64;

        match uri {
            VideoUri::Http(url) => {
                let mut response = self.http.get(url).send().await?.error_for_status()?;
                while let Some(chunk) = response.chunk().await? {
                    file.write_all(&chunk).await?;
                    written += chunk.len() as u64;
                }
            }
            VideoUri::S3 { bucket, key } => {
                let store = self.bucket(bucket)?;
                let mut stream = store.get(&ObjectPath::from(key.as_str())).await?.into_stream();
                while let Some(chunk) = stream.next().await {
                    let chunk = chunk?;
                    file.write_all(&chunk).await?;
                    written += chunk.len() as u64;
                }
            }
        }

        file.flush().await?;
        tracing::debug!(video = %uri, bytes = written, "download complete");
        Ok(written)
    }

    /// Copies the local file `src` to `uri` in `chunk_size` parts.
    pub async fn upload(&self, src: &Path, uri: &VideoUri) -> Result<u64, TransferError> {
        let VideoUri::S3 { bucket, key } = uri else {
            return Err(TransferError::ReadOnly(uri.to_string()));
        };

        let store = self.bucket(bucket)?;
        let sent = write_object(store, ObjectPath::from(key.as_str()), src, self.chunk_size).await?;

        tracing::debug!(video = %uri, bytes = sent, "upload complete");
        Ok(sent)
    }

    fn bucket(&self, name: &str) -> Result<Arc<dyn ObjectStore>, TransferError> {
        let mut buckets = self.buckets.lock().map_err(|_| TransferError::Poisoned)?;
        if let Some(store) = buckets.get(name) {
            return Ok(Arc::clone(store));
        }

        let store: Arc<dyn ObjectStore> = Arc::new(build_s3(&self.s3, name)?);
        tracing::info!(bucket = %name, endpoint = %self.s3.endpoint, "created s3 client");
        buckets.insert(name.to_string(), Arc::clone(&store));
        Ok(store)
    }
}

/// Streams `src` into `store` in `chunk_size` parts. Any failure aborts the
/// multipart upload.
async fn write_object(
    store: Arc<dyn ObjectStore>,
    location: ObjectPath,
    src: &Path,
    chunk_size: usize,
) -> Result<u64, TransferError> {
    let mut writer = BufWriter::with_capacity(store, location, chunk_size);
    let mut file = tokio::fs::File::open(src).await?;
    let mut buf = vec![0u8; chunk_size];
    let mut sent = 0u64;

    loop {
        let n = match file.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                let _ = writer.abort().await;
                return Err(e.into());
            }
        };
        if let Err(e) = writer.write_all(&buf[..n]).await {
            let _ = writer.abort().await;
            return Err(e.into());
        }
        sent += n as u64;
    }

    if let Err(e) = writer.shutdown().await {
        let _ = writer.abort().await;
        return Err(e.into());
    }
    Ok(sent)
}

fn build_s3(
    config: &S3Config,
    bucket: &str,
) -> Result<object_store::aws::AmazonS3, object_store::Error> {
    let options = ClientOptions::new()
        .with_pool_max_idle_per_host(config.max_connections)
        .with_allow_http(config.endpoint.starts_with("http://"));
    let retry = RetryConfig {
        max_retries: config.max_attempts.saturating_sub(1),
        ..RetryConfig::default()
    };

    AmazonS3Builder::from_env()
        .with_bucket_name(bucket)
        .with_region(&config.region)
        .with_endpoint(&config.endpoint)
        .with_client_options(options)
        .with_retry(retry)
        .build()
}
