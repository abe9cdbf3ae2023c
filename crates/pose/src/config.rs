use std::env;
use std::str::FromStr;

pub use common::Environment;

/// Default scale applied to raw location-refinement outputs.
pub const DEFAULT_LOCREF_STDEV: f32 = 7.2801;
pub const DEFAULT_STRIDE: f32 = 8.0;

/// Where the backend session executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionProvider {
    #[default]
    Cpu,
    Cuda,
}

impl ExecutionProvider {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "cpu" => Some(Self::Cpu),
            "cuda" | "gpu" => Some(Self::Cuda),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PoseConfig {
    pub environment: Environment,
    pub model_path: String,
    pub execution_provider: ExecutionProvider,
    pub intra_threads: usize,
    /// Name of the image input of the exported graph
    pub input_name: String,
    /// Name of the confidence map output
    pub scmap_output: String,
    /// Name of the location-refinement output
    pub locref_output: String,
    pub batch_size: usize,
    pub num_joints: usize,
    pub stride: f32,
    pub location_refinement: bool,
    pub locref_stdev: f32,
}

impl Default for PoseConfig {
    fn default() -> Self {
        Self {
            environment: Environment::Development,
            model_path: "/models/pose.onnx".to_string(),
            execution_provider: ExecutionProvider::Cpu,
            intra_threads: 4,
            input_name: "Placeholder".to_string(),
            scmap_output: "part_prob".to_string(),
            locref_output: "locref".to_string(),
            batch_size: 1,
            num_joints: 1,
            stride: DEFAULT_STRIDE,
            location_refinement: true,
            locref_stdev: DEFAULT_LOCREF_STDEV,
        }
    }
}

impl PoseConfig {
    /// Load configuration from environment variables with sensible defaults
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();

        let config = Self {
            environment: Environment::from_env(),
            model_path: env::var("MODEL_PATH").unwrap_or(defaults.model_path),
            execution_provider: env::var("EXECUTION_PROVIDER")
                .ok()
                .and_then(|s| ExecutionProvider::parse(&s))
                .unwrap_or(defaults.execution_provider),
            intra_threads: parse_var("INTRA_THREADS").unwrap_or(defaults.intra_threads),
            input_name: env::var("INPUT_NAME").unwrap_or(defaults.input_name),
            scmap_output: env::var("SCMAP_OUTPUT").unwrap_or(defaults.scmap_output),
            locref_output: env::var("LOCREF_OUTPUT").unwrap_or(defaults.locref_output),
            batch_size: parse_var("BATCH_SIZE").unwrap_or(defaults.batch_size),
            num_joints: parse_var("NUM_JOINTS").unwrap_or(defaults.num_joints),
            stride: parse_var("STRIDE").unwrap_or(defaults.stride),
            location_refinement: env::var("LOCATION_REFINEMENT")
                .ok()
                .and_then(|s| parse_bool(&s))
                .unwrap_or(defaults.location_refinement),
            locref_stdev: parse_var("LOCREF_STDEV").unwrap_or(defaults.locref_stdev),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.batch_size == 0 {
            anyhow::bail!("batch_size must be at least 1");
        }
        if self.num_joints == 0 {
            anyhow::bail!("num_joints must be at least 1");
        }
        if !(self.stride.is_finite() && self.stride > 0.0) {
            anyhow::bail!("stride must be positive, got {}", self.stride);
        }
        if !self.locref_stdev.is_finite() {
            anyhow::bail!("locref_stdev must be finite, got {}", self.locref_stdev);
        }
        Ok(())
    }

    /// Install the global log subscriber for this configuration's environment.
    ///
    /// Pretty output in development, JSON lines in production. Fails if a
    /// subscriber is already installed.
    pub fn init_logging(&self) -> anyhow::Result<()> {
        common::try_setup_logging(self.environment)?;
        tracing::info!(environment = self.environment.as_str(), "Logging initialized");
        Ok(())
    }

    /// Outputs the backend has to produce, in the order the extractor reads them.
    ///
    /// The offset output is only requested when location refinement is on.
    pub fn output_names(&self) -> Vec<&str> {
        let mut names = vec![self.scmap_output.as_str()];
        if self.location_refinement {
            names.push(self.locref_output.as_str());
        }
        names
    }
}

fn parse_var<T: FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: [&str; 12] = [
        "MODEL_PATH",
        "EXECUTION_PROVIDER",
        "INTRA_THREADS",
        "INPUT_NAME",
        "SCMAP_OUTPUT",
        "LOCREF_OUTPUT",
        "BATCH_SIZE",
        "NUM_JOINTS",
        "STRIDE",
        "LOCATION_REFINEMENT",
        "LOCREF_STDEV",
        "ENVIRONMENT",
    ];

    fn clear_env() {
        for var in VARS {
            // SAFETY: env-mutating tests are serialized.
            unsafe { env::remove_var(var) };
        }
    }

    #[test]
    #[serial]
    fn test_from_env_uses_defaults() {
        clear_env();
        let config = PoseConfig::from_env().unwrap();
        assert_eq!(config, PoseConfig::default());
    }

    #[test]
    #[serial]
    fn test_from_env_reads_overrides() {
        clear_env();
        unsafe {
            env::set_var("BATCH_SIZE", "8");
            env::set_var("NUM_JOINTS", "17");
            env::set_var("STRIDE", "4");
            env::set_var("LOCATION_REFINEMENT", "off");
            env::set_var("EXECUTION_PROVIDER", "CUDA");
        }

        let config = PoseConfig::from_env().unwrap();
        clear_env();

        assert_eq!(config.batch_size, 8);
        assert_eq!(config.num_joints, 17);
        assert!((config.stride - 4.0).abs() < 1e-6);
        assert!(!config.location_refinement);
        assert_eq!(config.execution_provider, ExecutionProvider::Cuda);
    }

    #[test]
    #[serial]
    fn test_from_env_ignores_unparsable_values() {
        clear_env();
        unsafe {
            env::set_var("BATCH_SIZE", "many");
            env::set_var("LOCATION_REFINEMENT", "maybe");
        }

        let config = PoseConfig::from_env().unwrap();
        clear_env();

        assert_eq!(config.batch_size, 1);
        assert!(config.location_refinement);
    }

    #[test]
    #[serial]
    fn test_from_env_rejects_zero_joints() {
        clear_env();
        unsafe { env::set_var("NUM_JOINTS", "0") };
        let result = PoseConfig::from_env();
        clear_env();

        assert!(result.is_err(), "Zero joints should fail validation");
        assert!(result.unwrap_err().to_string().contains("num_joints"));
    }

    #[test]
    fn test_validate_rejects_bad_stride() {
        let config = PoseConfig {
            stride: 0.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = PoseConfig {
            stride: f32::NAN,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    #[serial]
    fn test_from_env_reads_environment_for_logging() {
        clear_env();
        unsafe { env::set_var("ENVIRONMENT", "production") };
        let config = PoseConfig::from_env().unwrap();
        clear_env();

        assert_eq!(config.environment, Environment::Production);
        config.init_logging().unwrap();
        assert!(
            config.init_logging().is_err(),
            "Second global subscriber should be refused"
        );
    }

    #[test]
    fn test_output_names_follow_location_refinement() {
        let config = PoseConfig::default();
        assert_eq!(config.output_names(), vec!["part_prob", "locref"]);

        let config = PoseConfig {
            location_refinement: false,
            ..Default::default()
        };
        assert_eq!(config.output_names(), vec!["part_prob"]);
    }
}
