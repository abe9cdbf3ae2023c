use super::InferenceBackend;
use crate::config::{ExecutionProvider, PoseConfig};
use ndarray::{ArrayD, ArrayView4};
use ort::{
    session::{Session, builder::GraphOptimizationLevel},
    value::TensorRef,
};

/// ONNX Runtime session for an exported pose network.
pub struct OrtBackend {
    session: Session,
    input_name: String,
    output_names: Vec<String>,
}

impl OrtBackend {
    /// Load the model named by the configuration.
    ///
    /// Only the confidence output is fetched unless location refinement is
    /// enabled, in which case the offset output follows it.
    pub fn from_config(config: &PoseConfig) -> anyhow::Result<Self> {
        Self::load_model_with_provider(
            &config.model_path,
            config.execution_provider,
            config.intra_threads,
            &config.input_name,
            &config.output_names(),
        )
    }

    /// Load model with specified execution provider
    pub fn load_model_with_provider(
        path: &str,
        provider: ExecutionProvider,
        intra_threads: usize,
        input_name: &str,
        output_names: &[&str],
    ) -> anyhow::Result<Self> {
        // Initialize ORT environment (idempotent)
        let _ = ort::init().commit();

        let mut builder = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(intra_threads)?;

        match provider {
            ExecutionProvider::Cuda => {
                tracing::info!("Initializing ONNX Runtime with CUDA execution provider");
                builder = builder.with_execution_providers([
                    ort::execution_providers::CUDAExecutionProvider::default()
                        .with_device_id(0)
                        .build()
                        .error_on_failure(),
                ])?;
            }
            ExecutionProvider::Cpu => {
                tracing::info!("Initializing ONNX Runtime with CPU execution provider");
            }
        }

        let session = builder.commit_from_file(path)?;

        tracing::info!(outputs = ?output_names, "Model loaded from {}", path);
        Ok(Self {
            session,
            input_name: input_name.to_string(),
            output_names: output_names.iter().map(|s| s.to_string()).collect(),
        })
    }
}

impl InferenceBackend for OrtBackend {
    fn run(&mut self, images: ArrayView4<f32>) -> anyhow::Result<Vec<ArrayD<f32>>> {
        let outputs = self.session.run(ort::inputs![
            self.input_name.as_str() => TensorRef::from_array_view(images.into_dyn())?
        ])?;

        self.output_names
            .iter()
            .map(|name| {
                let tensor = outputs
                    .get(name.as_str())
                    .ok_or_else(|| anyhow::anyhow!("Model produced no output named {}", name))?
                    .try_extract_array::<f32>()?;
                Ok(tensor.into_owned())
            })
            .collect()
    }
}
