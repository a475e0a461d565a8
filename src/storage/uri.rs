use std::fmt;

use thiserror::Error;

const PROCESSED_SUFFIX: &str = "_processed.mp4";

#[derive(Debug, Error, PartialEq)]
pub enum UriError {
    #[error("unsupported video location {0:?}: expected http(s):// or s3://")]
    UnsupportedScheme(String),
    #[error("s3 uri {0:?} must name a bucket and a key")]
    IncompleteS3(String),
}

/// Where a video lives: a plain web URL or an object in an S3 bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VideoUri {
    Http(String),
    S3 { bucket: String, key: String },
}

impl VideoUri {
    pub fn parse(raw: &str) -> Result<Self, UriError> {
        let raw = raw.trim();

        if let Some(rest) = raw.strip_prefix("s3://") {
            let (bucket, key) = rest
                .split_once('/')
                .ok_or_else(|| UriError::IncompleteS3(raw.to_string()))?;
            if bucket.is_empty() || key.is_empty() {
                return Err(UriError::IncompleteS3(raw.to_string()));
            }
            return Ok(VideoUri::S3 {
                bucket: bucket.to_string(),
                key: key.to_string(),
            });
        }

        let lower = raw.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            return Ok(VideoUri::Http(raw.to_string()));
        }

        Err(UriError::UnsupportedScheme(raw.to_string()))
    }

    /// Location of the rendered video. Only S3 inputs get one: the key's
    /// extension is replaced by `_processed.mp4` in the same bucket.
    pub fn processed(&self) -> Option<VideoUri> {
        match self {
            VideoUri::Http(_) => None,
            VideoUri::S3 { bucket, key } => Some(VideoUri::S3 {
                bucket: bucket.clone(),
                key: format!("{}{}", strip_extension(key), PROCESSED_SUFFIX),
            }),
        }
    }
}

fn strip_extension(key: &str) -> &str {
    let name_start = key.rfind('/').map(|i| i + 1).unwrap_or(0);
    match key[name_start..].rfind('.') {
        Some(dot) if dot > 0 => &key[..name_start + dot],
        _ => key,
    }
}

impl fmt::Display for VideoUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VideoUri::Http(url) => f.write_str(url),
            VideoUri::S3 { bucket, key } => write!(f, "s3://{bucket}/{key}"),
        }
    }
}
