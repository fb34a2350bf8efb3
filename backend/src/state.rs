use std::sync::Arc;
use std::time::Duration;

use crate::config::{AppConfig, BackendKind, ConfigError, RouteConfig};
use crate::model::deepface::DeepFaceClient;
use crate::model::pipeline::ClassifierClient;
use crate::model::{AnalyzeOptions, EmotionModel, ModelAdapter};

#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[cfg(feature = "torch")]
    #[error("Model loading failed: {0}")]
    Model(#[from] crate::model::ClassificationError),
}

/// The adapters every route uses, built once at startup and shared read-only.
#[derive(Clone)]
pub struct Models {
    pub stream: ModelAdapter,
    pub majority: ModelAdapter,
    pub weighted: ModelAdapter,
}

impl Models {
    pub fn from_config(config: &AppConfig) -> Result<Self, InitError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .build()?;
        let mut loaded: Vec<(BackendKind, Arc<dyn EmotionModel>)> = Vec::new();

        let mut adapter_for = |route: RouteConfig| -> Result<ModelAdapter, InitError> {
            let model = match loaded.iter().find(|(kind, _)| *kind == route.backend) {
                Some((_, model)) => model.clone(),
                None => {
                    let model = build_backend(config, route.backend, &http)?;
                    log::info!("Initialized {} backend", model.name());
                    loaded.push((route.backend, model.clone()));
                    model
                }
            };
            Ok(ModelAdapter::new(
                model,
                AnalyzeOptions {
                    enforce_detection: route.enforce_detection,
                },
            ))
        };

        Ok(Self {
            stream: adapter_for(config.routes.stream)?,
            majority: adapter_for(config.routes.majority)?,
            weighted: adapter_for(config.routes.weighted)?,
        })
    }
}

fn build_backend(
    config: &AppConfig,
    kind: BackendKind,
    http: &reqwest::Client,
) -> Result<Arc<dyn EmotionModel>, InitError> {
    match kind {
        BackendKind::Deepface => Ok(Arc::new(DeepFaceClient::new(
            http.clone(),
            &config.deepface.url,
            &config.deepface.detector_backend,
        ))),
        BackendKind::Classifier => {
            let url = config.classifier.url.as_deref().ok_or_else(|| {
                ConfigError::Invalid("classifier.url is not set".into())
            })?;
            Ok(Arc::new(ClassifierClient::new(
                http.clone(),
                url,
                config.classifier.token.clone(),
            )))
        }
        #[cfg(feature = "torch")]
        BackendKind::Torch => {
            let path = config.torch.model_path.as_deref().ok_or_else(|| {
                ConfigError::Invalid("torch.model_path is not set".into())
            })?;
            Ok(Arc::new(crate::model::torch::TorchModel::load(&config.torch, path)?))
        }
        #[cfg(not(feature = "torch"))]
        BackendKind::Torch => Err(ConfigError::Invalid(
            "built without the `torch` feature".into(),
        )
        .into()),
    }
}
