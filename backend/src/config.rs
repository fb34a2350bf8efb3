use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use shared::Emotion;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config file: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub deepface: DeepFaceConfig,
    pub classifier: ClassifierConfig,
    pub torch: TorchConfig,
    pub routes: RoutesConfig,
    pub limits: LimitsConfig,
    pub http_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Empty means any origin.
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeepFaceConfig {
    pub url: String,
    pub detector_backend: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub url: Option<String>,
    pub token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TorchConfig {
    pub model_path: Option<String>,
    pub input_size: u32,
    pub mean: [f32; 3],
    pub std: [f32; 3],
    /// Output index to label, in the order the network was trained with.
    pub labels: Vec<String>,
}

/// Size caps on incoming payloads, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// One websocket message, after reassembling fragments.
    pub max_message_bytes: usize,
    /// One screenshot field of a batch upload.
    pub max_upload_bytes: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Deepface,
    Classifier,
    Torch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteConfig {
    pub backend: BackendKind,
    #[serde(default)]
    pub enforce_detection: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutesConfig {
    pub stream: RouteConfig,
    pub majority: RouteConfig,
    pub weighted: RouteConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            deepface: DeepFaceConfig::default(),
            classifier: ClassifierConfig::default(),
            torch: TorchConfig::default(),
            routes: RoutesConfig::default(),
            limits: LimitsConfig::default(),
            http_timeout_secs: 60,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            allowed_origins: Vec::new(),
        }
    }
}

impl Default for DeepFaceConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:5005".to_string(),
            detector_backend: "opencv".to_string(),
        }
    }
}

impl Default for TorchConfig {
    fn default() -> Self {
        Self {
            model_path: None,
            input_size: 224,
            mean: [0.5; 3],
            std: [0.5; 3],
            labels: ["angry", "disgust", "fear", "happy", "neutral", "sad", "surprise"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_message_bytes: 16 * 1024 * 1024,
            max_upload_bytes: 10 * 1024 * 1024,
        }
    }
}

impl Default for RoutesConfig {
    fn default() -> Self {
        Self {
            stream: RouteConfig {
                backend: BackendKind::Deepface,
                enforce_detection: false,
            },
            majority: RouteConfig {
                backend: BackendKind::Classifier,
                enforce_detection: true,
            },
            weighted: RouteConfig {
                backend: BackendKind::Deepface,
                enforce_detection: true,
            },
        }
    }
}

impl AppConfig {
    /// `.env`, then the YAML file named by `EMOTION_CONFIG`, then environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        let mut config = match std::env::var("EMOTION_CONFIG") {
            Ok(path) => {
                log::info!("Loading configuration from {}", path);
                Self::from_file(Path::new(&path))?
            }
            Err(_) => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let config_str = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&config_str)?)
    }

    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("PORT") {
            self.server.port = port
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("PORT '{}' is not a port number", port)))?;
        }
        if let Some(origins) = lookup("ALLOWED_ORIGINS") {
            self.server.allowed_origins = origins
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(url) = lookup("DEEPFACE_URL") {
            self.deepface.url = url;
        }
        if let Some(url) = lookup("CLASSIFIER_URL") {
            self.classifier.url = Some(url);
        }
        if let Some(token) = lookup("CLASSIFIER_TOKEN") {
            self.classifier.token = Some(token);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Invalid("server.port must be non-zero".into()));
        }
        if self.limits.max_message_bytes == 0 || self.limits.max_upload_bytes == 0 {
            return Err(ConfigError::Invalid("limits must be non-zero".into()));
        }
        for (route, settings) in self.routes.iter() {
            match settings.backend {
                BackendKind::Deepface if self.deepface.url.is_empty() => {
                    return Err(ConfigError::Invalid(format!(
                        "route '{}' uses deepface but deepface.url is empty",
                        route
                    )));
                }
                BackendKind::Classifier if self.classifier.url.is_none() => {
                    return Err(ConfigError::Invalid(format!(
                        "route '{}' uses the classifier but classifier.url is not set",
                        route
                    )));
                }
                BackendKind::Torch if !cfg!(feature = "torch") => {
                    return Err(ConfigError::Invalid(format!(
                        "route '{}' uses torch but the server was built without the `torch` feature",
                        route
                    )));
                }
                BackendKind::Torch if self.torch.model_path.is_none() => {
                    return Err(ConfigError::Invalid(format!(
                        "route '{}' uses torch but torch.model_path is not set",
                        route
                    )));
                }
                _ => {}
            }
        }
        if let Some(bad) = self.torch.labels.iter().find(|l| Emotion::from_str(l).is_err()) {
            return Err(ConfigError::Invalid(format!("unknown torch label '{}'", bad)));
        }
        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl RoutesConfig {
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, RouteConfig)> {
        [
            ("stream", self.stream),
            ("majority", self.majority),
            ("weighted", self.weighted),
        ]
        .into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn with_classifier() -> AppConfig {
        let mut config = AppConfig::default();
        config.classifier.url = Some("http://localhost:9000/classify".into());
        config
    }

    #[test]
    fn defaults_keep_detection_policies_apart() {
        let routes = RoutesConfig::default();
        assert!(!routes.stream.enforce_detection);
        assert!(routes.weighted.enforce_detection);
        assert_eq!(routes.majority.backend, BackendKind::Classifier);
    }

    #[test]
    fn default_config_needs_a_classifier_url() {
        let err = AppConfig::default().validate().unwrap_err();
        assert!(err.to_string().contains("majority"));
        assert!(with_classifier().validate().is_ok());
    }

    #[test]
    fn yaml_file_overrides_selected_fields() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "server:\n  port: 9100\nroutes:\n  stream:\n    backend: deepface\n    enforce_detection: true\n  majority:\n    backend: deepface\n  weighted:\n    backend: deepface\n"
        )
        .unwrap();

        let config = AppConfig::from_file(file.path()).unwrap();
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.server.host, "0.0.0.0");
        assert!(config.routes.stream.enforce_detection);
        assert!(!config.routes.majority.enforce_detection);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn bundled_example_config_is_valid() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../config/emotion.yaml");
        let config = AppConfig::from_file(&path).unwrap();
        assert_eq!(config.server.allowed_origins.len(), 2);
        assert_eq!(config.routes, RoutesConfig::default());
        assert_eq!(config.limits.max_message_bytes, 16 * 1024 * 1024);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn environment_overrides_win() {
        let env: HashMap<&str, &str> = [
            ("PORT", "8123"),
            ("ALLOWED_ORIGINS", "http://localhost:5173, http://127.0.0.1:5173"),
            ("CLASSIFIER_URL", "http://models/vit"),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        config
            .apply_overrides(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.bind_address(), "0.0.0.0:8123");
        assert_eq!(config.server.allowed_origins.len(), 2);
        assert_eq!(config.classifier.url.as_deref(), Some("http://models/vit"));
    }

    #[test]
    fn bad_port_is_rejected() {
        let mut config = AppConfig::default();
        let err = config
            .apply_overrides(|k| (k == "PORT").then(|| "eighty".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn default_limits_fit_camera_frames() {
        let limits = LimitsConfig::default();
        assert!(limits.max_message_bytes > 64 * 1024);
        let mut config = with_classifier();
        config.limits.max_upload_bytes = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn torch_route_requires_model_path() {
        let mut config = with_classifier();
        config.routes.weighted.backend = BackendKind::Torch;
        assert!(config.validate().is_err());
    }

    #[test]
    fn unknown_torch_labels_are_rejected() {
        let mut config = with_classifier();
        config.torch.labels.push("contempt".into());
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("contempt"));
    }
}
