use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid value {value:?} for environment variable {name}")]
    InvalidEnv { name: &'static str, value: String },
    #[error("worker pool needs at least one thread")]
    NoWorkers,
    #[error("{0} must be between 0 and 1")]
    ConfidenceOutOfRange(&'static str),
    #[error("transfer chunk size must be positive")]
    ZeroChunkSize,
}

fn default_http_port() -> u16 {
    8080
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_http_port")]
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            port: default_http_port(),
        }
    }
}

fn default_threads() -> usize {
    4
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    #[serde(default = "default_threads")]
    pub threads: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            threads: default_threads(),
        }
    }
}

fn default_model_path() -> String {
    "models/pose_landmark_heavy.onnx".to_string()
}

fn default_input_size() -> u32 {
    256
}

fn default_intra_threads() -> usize {
    1
}

fn default_landmarks_output() -> String {
    "ld_3d".to_string()
}

fn default_pose_flag_output() -> String {
    "output_poseflag".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    /// Local path or http(s) URL of the ONNX landmark model.
    #[serde(default = "default_model_path")]
    pub path: String,
    #[serde(default = "default_input_size")]
    pub input_size: u32,
    #[serde(default = "default_intra_threads")]
    pub intra_threads: usize,
    #[serde(default = "default_landmarks_output")]
    pub landmarks_output: String,
    #[serde(default = "default_pose_flag_output")]
    pub pose_flag_output: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: default_model_path(),
            input_size: default_input_size(),
            intra_threads: default_intra_threads(),
            landmarks_output: default_landmarks_output(),
            pose_flag_output: default_pose_flag_output(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_confidence() -> f32 {
    0.5
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrackingConfig {
    #[serde(default)]
    pub static_image_mode: bool,
    #[serde(default = "default_true")]
    pub smooth_landmarks: bool,
    #[serde(default = "default_confidence")]
    pub min_detection_confidence: f32,
    #[serde(default = "default_confidence")]
    pub min_tracking_confidence: f32,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            static_image_mode: false,
            smooth_landmarks: true,
            min_detection_confidence: default_confidence(),
            min_tracking_confidence: default_confidence(),
        }
    }
}

fn default_s3_endpoint() -> String {
    "https://s3-eu-central-1.ionoscloud.com".to_string()
}

fn default_s3_region() -> String {
    "de".to_string()
}

fn default_s3_connections() -> usize {
    100
}

fn default_s3_attempts() -> usize {
    6
}

#[derive(Debug, Clone, Deserialize)]
pub struct S3Config {
    #[serde(default = "default_s3_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_s3_region")]
    pub region: String,
    #[serde(default = "default_s3_connections")]
    pub max_connections: usize,
    #[serde(default = "default_s3_attempts")]
    pub max_attempts: usize,
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            endpoint: default_s3_endpoint(),
            region: default_s3_region(),
            max_connections: default_s3_connections(),
            max_attempts: default_s3_attempts(),
        }
    }
}

fn default_chunk_size() -> usize {
    1 << 18
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransferConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default)]
    pub temp_dir: Option<PathBuf>,
}

impl TransferConfig {
    pub fn temp_dir(&self) -> PathBuf {
        self.temp_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            temp_dir: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub workers: WorkerConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub tracking: TrackingConfig,
    #[serde(default)]
    pub s3: S3Config,
    #[serde(default)]
    pub transfer: TransferConfig,
}

impl Config {
    /// Reads `config.toml` when present, then applies environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = if Path::new(DEFAULT_CONFIG_PATH).exists() {
            Self::load_from(DEFAULT_CONFIG_PATH)?
        } else {
            tracing::debug!("no {} found, using defaults", DEFAULT_CONFIG_PATH);
            Self::default()
        };

        config.apply_env(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&'static str) -> Option<String>,
    {
        if let Some(port) = parse_env(&lookup, "PORT")? {
            self.http.port = port;
        }
        if let Some(threads) = parse_env(&lookup, "THREADS")? {
            self.workers.threads = threads;
        }
        if let Some(path) = lookup("POSE_MODEL") {
            self.model.path = path;
        }
        if let Some(endpoint) = lookup("AWS_ENDPOINT_URL") {
            self.s3.endpoint = endpoint;
        }
        if let Some(region) = lookup("AWS_DEFAULT_REGION") {
            self.s3.region = region;
        }
        if let Some(connections) = parse_env(&lookup, "AWS_S3_CONNECTIONS")? {
            self.s3.max_connections = connections;
        }
        if let Some(attempts) = parse_env(&lookup, "AWS_MAX_ATTEMPTS")? {
            self.s3.max_attempts = attempts;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers.threads == 0 {
            return Err(ConfigError::NoWorkers);
        }
        if !(0.0..=1.0).contains(&self.tracking.min_detection_confidence) {
            return Err(ConfigError::ConfidenceOutOfRange("min_detection_confidence"));
        }
        if !(0.0..=1.0).contains(&self.tracking.min_tracking_confidence) {
            return Err(ConfigError::ConfidenceOutOfRange("min_tracking_confidence"));
        }
        if self.transfer.chunk_size == 0 {
            return Err(ConfigError::ZeroChunkSize);
        }
        Ok(())
    }
}

fn parse_env<F, T>(lookup: &F, name: &'static str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&'static str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(name) {
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv { name, value }),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&'static str, &str)]) -> impl Fn(&'static str) -> Option<String> {
        let map: HashMap<&'static str, String> =
            pairs.iter().map(|(k, v)| (*k, v.to_string())).collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.http.port, 8080);
        assert_eq!(config.workers.threads, 4);
        assert_eq!(config.model.input_size, 256);
        assert_eq!(config.s3.region, "de");
        assert_eq!(config.s3.max_connections, 100);
        assert_eq!(config.transfer.chunk_size, 262_144);
        assert!(config.tracking.smooth_landmarks);
        assert!(!config.tracking.static_image_mode);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_section() {
        let config: Config = toml::from_str(
            r#"
            [workers]
            threads = 2

            [tracking]
            static_image_mode = true
            min_detection_confidence = 0.7
            "#,
        )
        .unwrap();
        assert_eq!(config.workers.threads, 2);
        assert!(config.tracking.static_image_mode);
        assert_eq!(config.tracking.min_detection_confidence, 0.7);
        assert_eq!(config.tracking.min_tracking_confidence, 0.5);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config
            .apply_env(env(&[
                ("THREADS", "8"),
                ("AWS_ENDPOINT_URL", "http://localhost:9000"),
                ("AWS_DEFAULT_REGION", "eu-west-1"),
                ("AWS_MAX_ATTEMPTS", " 3 "),
            ]))
            .unwrap();
        assert_eq!(config.workers.threads, 8);
        assert_eq!(config.s3.endpoint, "http://localhost:9000");
        assert_eq!(config.s3.region, "eu-west-1");
        assert_eq!(config.s3.max_attempts, 3);
        assert_eq!(config.s3.max_connections, 100);
    }

    #[test]
    fn test_invalid_env_value() {
        let mut config = Config::default();
        let err = config.apply_env(env(&[("THREADS", "many")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { name: "THREADS", .. }));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.workers.threads = 0;
        assert!(matches!(config.validate(), Err(ConfigError::NoWorkers)));

        let mut config = Config::default();
        config.tracking.min_tracking_confidence = 1.5;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ConfidenceOutOfRange("min_tracking_confidence"))
        ));

        let mut config = Config::default();
        config.transfer.chunk_size = 0;
        assert!(matches!(config.validate(), Err(ConfigError::ZeroChunkSize)));
    }
}
