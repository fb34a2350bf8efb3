use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use image::RgbImage;
use image::imageops::{self, FilterType};
use tch::{CModule, Device, Kind, Tensor};

use super::{AnalyzeOptions, ClassificationError, EmotionModel, FaceAnalysis, ModelOutput, RawScore};
use crate::config::TorchConfig;

impl From<tch::TchError> for ClassificationError {
    fn from(err: tch::TchError) -> Self {
        ClassificationError::Backend(err.to_string())
    }
}

/// A TorchScript expression classifier loaded in-process.
#[derive(Clone)]
pub struct TorchModel {
    model: Arc<Mutex<CModule>>,
    device: Device,
    input_size: u32,
    mean: [f32; 3],
    std: [f32; 3],
    labels: Vec<String>,
}

impl TorchModel {
    pub fn load(config: &TorchConfig, model_path: &str) -> Result<Self, ClassificationError> {
        let device = Device::cuda_if_available();
        log::info!("Loading TorchScript model {} on {:?}", model_path, device);
        let module = CModule::load_on_device(model_path, device)?;
        Ok(Self {
            model: Arc::new(Mutex::new(module)),
            device,
            input_size: config.input_size,
            mean: config.mean,
            std: config.std,
            labels: config.labels.clone(),
        })
    }

    fn preprocess(&self, image: &RgbImage) -> Tensor {
        let size = self.input_size;
        let resized = imageops::resize(image, size, size, FilterType::Triangle);
        let plane = (size * size) as usize;
        let mut chw = vec![0f32; 3 * plane];
        for (i, pixel) in resized.pixels().enumerate() {
            for c in 0..3 {
                let value = f32::from(pixel.0[c]) / 255.0;
                chw[c * plane + i] = (value - self.mean[c]) / self.std[c];
            }
        }
        Tensor::from_slice(&chw)
            .view([1, 3, i64::from(size), i64::from(size)])
            .to_device(self.device)
    }

    fn run(&self, input: Tensor) -> Result<Vec<f32>, ClassificationError> {
        let module = self
            .model
            .lock()
            .map_err(|_| ClassificationError::Backend("model lock poisoned".into()))?;
        let output = module.forward_ts(&[input])?;
        let output = output.softmax(-1, Kind::Float);
        let output_flat = output.to_kind(Kind::Float).view([-1]);
        let num_elements = output_flat.size()[0] as usize;
        let mut output_vec = vec![0.0f32; num_elements];
        output_flat.copy_data(&mut output_vec, num_elements);
        Ok(output_vec)
    }
}

#[async_trait]
impl EmotionModel for TorchModel {
    fn name(&self) -> &str {
        "torch"
    }

    async fn analyze(
        &self,
        image: &RgbImage,
        _options: &AnalyzeOptions,
    ) -> Result<ModelOutput, ClassificationError> {
        let model = self.clone();
        let image = image.clone();
        let probabilities = actix_web::web::block(move || {
            let input = model.preprocess(&image);
            model.run(input)
        })
        .await
        .map_err(|e| ClassificationError::Backend(e.to_string()))??;

        if probabilities.len() != self.labels.len() {
            return Err(ClassificationError::InvalidOutput(format!(
                "model produced {} scores for {} labels",
                probabilities.len(),
                self.labels.len()
            )));
        }

        let dominant_emotion = probabilities
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| self.labels[i].clone());

        Ok(ModelOutput::Single(FaceAnalysis {
            dominant_emotion,
            emotion: self
                .labels
                .iter()
                .cloned()
                .zip(probabilities.into_iter().map(RawScore::from))
                .collect(),
        }))
    }
}
