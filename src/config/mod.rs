//! Engine configuration with TOML support.
//!
//! Unifies the flags the `run`/binary entry collaborator accepts
//! (§6.3) into one structure so a deployment can be driven by a TOML
//! file, environment variables, or CLI flags layered on top, in that
//! order.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{info, warn};

/// Complete engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EngineConfig {
    /// This process's role and model/tokenizer paths.
    pub node: NodeConfig,
    /// Peers and listen settings.
    pub network: NetworkConfig,
    /// Sampling defaults.
    pub sampling: SamplingConfig,
    /// Thread/batch tuning.
    pub performance: PerformanceConfig,
    /// Logging configuration.
    pub logging: LoggingConfig,
}

impl EngineConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &str) -> Result<Self, String> {
        let contents = std::fs::read_to_string(path).map_err(|e| format!("failed to read config file: {}", e))?;
        toml::from_str(&contents).map_err(|e| format!("failed to parse config: {}", e))
    }

    /// Load from file (if `ENGINE_CONFIG` is set) or defaults, then
    /// apply environment variable overrides.
    pub fn load() -> Self {
        let mut config = if let Ok(path) = std::env::var("ENGINE_CONFIG") {
            match Self::from_file(&path) {
                Ok(cfg) => {
                    info!("loaded config from {}", path);
                    cfg
                }
                Err(e) => {
                    warn!("failed to load config: {}, using defaults", e);
                    Self::default()
                }
            }
        } else {
            Self::default()
        };
        config.apply_env_overrides();
        config
    }

    /// Apply environment variable overrides (§6.3's flags have the
    /// final word; this layer sits between file defaults and flags).
    pub fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("MODEL_PATH") {
            self.node.model_path = PathBuf::from(path);
        }
        if let Ok(path) = std::env::var("TOKENIZER_PATH") {
            self.node.tokenizer_path = PathBuf::from(path);
        }
        if let Ok(nthreads) = std::env::var("N_THREADS") {
            if let Ok(n) = nthreads.parse() {
                self.performance.n_threads = n;
            }
        }
        if let Ok(port) = std::env::var("ENGINE_PORT") {
            if let Ok(p) = port.parse() {
                self.network.port = p;
            }
        }
        if let Ok(seed) = std::env::var("ENGINE_SEED") {
            if let Ok(s) = seed.parse() {
                self.sampling.seed = s;
            }
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.network.port == 0 {
            errors.push("network.port cannot be 0".to_string());
        }
        if self.performance.n_threads == 0 {
            errors.push("performance.n_threads must be at least 1".to_string());
        }
        if self.node.max_seq_len == 0 {
            errors.push("node.max_seq_len must be at least 1".to_string());
        }
        if !(0.0..=2.0).contains(&self.sampling.temperature) {
            errors.push("sampling.temperature must be within [0.0, 2.0]".to_string());
        }
        if !(0.0..=1.0).contains(&self.sampling.topp) {
            errors.push("sampling.topp must be within [0.0, 1.0]".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    pub fn to_toml(&self) -> Result<String, String> {
        toml::to_string_pretty(self).map_err(|e| format!("failed to serialize config: {}", e))
    }
}

/// This node's role, selected by `run`'s CLI mode (`inference`,
/// `chat`, `worker`) (§6.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum NodeRole {
    #[default]
    Root,
    Worker,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    pub role: NodeRole,
    pub model_path: PathBuf,
    pub tokenizer_path: PathBuf,
    pub buffer_float_type: String,
    pub weights_float_type: String,
    pub max_seq_len: usize,
    pub chat_template: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            role: NodeRole::Root,
            model_path: PathBuf::from("models/model.bin"),
            tokenizer_path: PathBuf::from("models/tokenizer.bin"),
            buffer_float_type: "q80".to_string(),
            weights_float_type: "q40".to_string(),
            max_seq_len: 4096,
            chat_template: "llama3".to_string(),
        }
    }
}

/// Worker peers and this process's listen port (§6.2, §6.3
/// `--workers host:port ...`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub port: u16,
    pub workers: Vec<String>,
    pub turbo: bool,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            port: 9990,
            workers: Vec::new(),
            turbo: true,
        }
    }
}

/// Sampling defaults the `run` collaborator seams are constructed
/// with (§9 "topp enables nucleus sampling; otherwise multinomial").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplingConfig {
    pub temperature: f32,
    pub topp: f32,
    pub seed: u64,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            temperature: 0.0,
            topp: 0.9,
            seed: 0,
        }
    }
}

/// Thread and batch tuning (§4.5, §5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceConfig {
    pub n_threads: usize,
    pub n_batches: usize,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            n_threads: num_cpus::get(),
            n_batches: 1,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file: None,
        }
    }
}

/// Generate an example TOML configuration (used by `run config` style
/// CLI helpers and by operators bootstrapping a new deployment).
pub fn generate_example_config() -> String {
    EngineConfig::default().to_toml().unwrap_or_else(|_| "# failed to generate".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_port_fails_validation() {
        let mut config = EngineConfig::default();
        config.network.port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn toml_roundtrip() {
        let config = EngineConfig::default();
        let toml = config.to_toml().unwrap();
        let parsed: EngineConfig = toml::from_str(&toml).unwrap();
        assert_eq!(parsed.node.max_seq_len, config.node.max_seq_len);
    }
}
