//! Engine session configuration
//!
//! Sources, highest priority first:
//! 1. Environment variables (`RUNMAT_ENGINE`, `RUNMAT_ENGINE_ARGS`, ...)
//! 2. The file named by `RUNMAT_ENGINE_CONFIG`, else the first of
//!    `.runmat-engine.{toml,yaml,yml,json}` in the current directory
//! 3. Built-in defaults

use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{EngineError, Result};

/// Executable started when no command is configured.
pub const DEFAULT_ENGINE_COMMAND: &str = "runmat-engine-worker";

/// How to start and talk to one engine process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Engine executable
    pub command: PathBuf,
    /// Extra command-line arguments
    pub args: Vec<String>,
    /// Capture display output of evaluations and return it to the caller
    pub capture_output: bool,
    /// Time allowed for the `ready` handshake
    pub startup_timeout_ms: u64,
    /// Per-request timeout; `None` waits forever
    pub request_timeout_ms: Option<u64>,
    /// Working directory of the engine process
    pub working_dir: Option<PathBuf>,
    /// Extra environment variables for the engine process
    pub env: BTreeMap<String, String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            command: PathBuf::from(DEFAULT_ENGINE_COMMAND),
            args: Vec::new(),
            capture_output: true,
            startup_timeout_ms: 10_000,
            request_timeout_ms: None,
            working_dir: None,
            env: BTreeMap::new(),
        }
    }
}

impl EngineConfig {
    pub fn new(command: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
            ..Self::default()
        }
    }

    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn with_capture_output(mut self, capture: bool) -> Self {
        self.capture_output = capture;
        self
    }

    pub fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout_ms = timeout.map(|t| t.as_millis() as u64);
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn startup_timeout(&self) -> Duration {
        Duration::from_millis(self.startup_timeout_ms)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }
}

/// Resolves an [`EngineConfig`] from files and the environment.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from all sources with proper precedence
    pub fn load() -> Result<EngineConfig> {
        let mut config = Self::load_from_files()?;
        Self::apply_environment_variables(&mut config)?;
        Ok(config)
    }

    fn load_from_files() -> Result<EngineConfig> {
        for path in Self::find_config_files() {
            if path.is_file() {
                info!("Loading engine configuration from: {}", path.display());
                return Self::load_from_file(&path);
            }
        }
        debug!("No engine configuration file found, using defaults");
        Ok(EngineConfig::default())
    }

    fn find_config_files() -> Vec<PathBuf> {
        let mut paths = Vec::new();
        if let Ok(config_path) = env::var("RUNMAT_ENGINE_CONFIG") {
            paths.push(PathBuf::from(config_path));
        }
        if let Ok(current_dir) = env::current_dir() {
            for name in [
                ".runmat-engine.toml",
                ".runmat-engine.yaml",
                ".runmat-engine.yml",
                ".runmat-engine.json",
            ] {
                paths.push(current_dir.join(name));
            }
        }
        paths
    }

    /// Load configuration from a specific file, by extension.
    pub fn load_from_file(path: &Path) -> Result<EngineConfig> {
        let content = fs::read_to_string(path).map_err(|e| {
            EngineError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        let parse_error = |format: &str, e: &dyn std::fmt::Display| {
            EngineError::Config(format!("failed to parse {format} config {}: {e}", path.display()))
        };
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml") | Some("yml") => {
                serde_yaml::from_str(&content).map_err(|e| parse_error("YAML", &e))
            }
            Some("json") => serde_json::from_str(&content).map_err(|e| parse_error("JSON", &e)),
            Some("toml") | None => toml::from_str(&content).map_err(|e| parse_error("TOML", &e)),
            Some(other) => Err(EngineError::Config(format!(
                "unsupported config extension '.{other}' ({})",
                path.display()
            ))),
        }
    }

    fn apply_environment_variables(config: &mut EngineConfig) -> Result<()> {
        if let Ok(command) = env::var("RUNMAT_ENGINE") {
            let trimmed = command.trim();
            if !trimmed.is_empty() {
                config.command = PathBuf::from(trimmed);
            }
        }
        if let Ok(args) = env::var("RUNMAT_ENGINE_ARGS") {
            config.args = args.split_whitespace().map(str::to_string).collect();
        }
        if let Ok(capture) = env::var("RUNMAT_ENGINE_CAPTURE") {
            config.capture_output = parse_bool(&capture).ok_or_else(|| {
                EngineError::Config(format!("RUNMAT_ENGINE_CAPTURE: '{capture}' is not a boolean"))
            })?;
        }
        if let Ok(ms) = env::var("RUNMAT_ENGINE_STARTUP_TIMEOUT_MS") {
            config.startup_timeout_ms = parse_millis("RUNMAT_ENGINE_STARTUP_TIMEOUT_MS", &ms)?;
        }
        if let Ok(ms) = env::var("RUNMAT_ENGINE_REQUEST_TIMEOUT_MS") {
            let trimmed = ms.trim();
            config.request_timeout_ms = if trimmed.is_empty() || trimmed == "0" {
                None
            } else {
                Some(parse_millis("RUNMAT_ENGINE_REQUEST_TIMEOUT_MS", trimmed)?)
            };
        }
        Ok(())
    }
}

fn parse_millis(var: &str, value: &str) -> Result<u64> {
    value
        .trim()
        .parse()
        .map_err(|_| EngineError::Config(format!("{var}: '{value}' is not a number of milliseconds")))
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use once_cell::sync::Lazy;
    use std::sync::Mutex;
    use tempfile::TempDir;

    static ENV_GUARD: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

    const VARS: [&str; 6] = [
        "RUNMAT_ENGINE_CONFIG",
        "RUNMAT_ENGINE",
        "RUNMAT_ENGINE_ARGS",
        "RUNMAT_ENGINE_CAPTURE",
        "RUNMAT_ENGINE_STARTUP_TIMEOUT_MS",
        "RUNMAT_ENGINE_REQUEST_TIMEOUT_MS",
    ];

    fn clear_env() {
        for var in VARS {
            env::remove_var(var);
        }
    }

    #[test]
    fn defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.command, PathBuf::from(DEFAULT_ENGINE_COMMAND));
        assert!(config.capture_output);
        assert_eq!(config.startup_timeout(), Duration::from_secs(10));
        assert_eq!(config.request_timeout(), None);
    }

    #[test]
    fn builder_sets_fields() {
        let config = EngineConfig::new("/opt/engine")
            .with_args(["--name", "x"])
            .with_capture_output(false)
            .with_request_timeout(Some(Duration::from_millis(250)))
            .with_env("A", "1");
        assert_eq!(config.args, vec!["--name", "x"]);
        assert!(!config.capture_output);
        assert_eq!(config.request_timeout_ms, Some(250));
        assert_eq!(config.env.get("A").map(String::as_str), Some("1"));
    }

    #[test]
    fn loads_each_file_format() {
        let dir = TempDir::new().unwrap();
        let toml_path = dir.path().join("engine.toml");
        fs::write(&toml_path, "command = \"/bin/toml-engine\"\nargs = [\"-q\"]\n").unwrap();
        let yaml_path = dir.path().join("engine.yaml");
        fs::write(&yaml_path, "command: /bin/yaml-engine\ncapture_output: false\n").unwrap();
        let json_path = dir.path().join("engine.json");
        fs::write(&json_path, r#"{"command": "/bin/json-engine", "request_timeout_ms": 50}"#)
            .unwrap();

        let t = ConfigLoader::load_from_file(&toml_path).unwrap();
        assert_eq!(t.command, PathBuf::from("/bin/toml-engine"));
        assert_eq!(t.args, vec!["-q"]);
        assert!(t.capture_output);

        let y = ConfigLoader::load_from_file(&yaml_path).unwrap();
        assert!(!y.capture_output);

        let j = ConfigLoader::load_from_file(&json_path).unwrap();
        assert_eq!(j.request_timeout(), Some(Duration::from_millis(50)));

        let bad = dir.path().join("engine.ini");
        fs::write(&bad, "x").unwrap();
        assert!(matches!(
            ConfigLoader::load_from_file(&bad),
            Err(EngineError::Config(_))
        ));
    }

    #[test]
    fn environment_overrides_file() {
        let _guard = ENV_GUARD.lock().unwrap_or_else(|e| e.into_inner());
        clear_env();
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("engine.toml");
        fs::write(&path, "command = \"/bin/from-file\"\nstartup_timeout_ms = 100\n").unwrap();
        env::set_var("RUNMAT_ENGINE_CONFIG", &path);
        env::set_var("RUNMAT_ENGINE_ARGS", "--log-level  debug");
        env::set_var("RUNMAT_ENGINE_CAPTURE", "off");
        env::set_var("RUNMAT_ENGINE_REQUEST_TIMEOUT_MS", "1500");

        let config = ConfigLoader::load().unwrap();
        assert_eq!(config.command, PathBuf::from("/bin/from-file"));
        assert_eq!(config.startup_timeout_ms, 100);
        assert_eq!(config.args, vec!["--log-level", "debug"]);
        assert!(!config.capture_output);
        assert_eq!(config.request_timeout_ms, Some(1500));

        env::set_var("RUNMAT_ENGINE", "/bin/from-env");
        env::set_var("RUNMAT_ENGINE_CAPTURE", "maybe");
        assert!(matches!(ConfigLoader::load(), Err(EngineError::Config(_))));
        env::set_var("RUNMAT_ENGINE_CAPTURE", "1");
        assert_eq!(ConfigLoader::load().unwrap().command, PathBuf::from("/bin/from-env"));
        clear_env();
    }
}
