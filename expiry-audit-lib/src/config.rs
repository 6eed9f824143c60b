//! Configuration file parsing and management.
//!
//! This module handles loading configuration from TOML files and `EA_*`
//! environment variables, and merging them with proper precedence rules.

use crate::error::AuditError;
use crate::types::{Concurrency, RunConfig};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Upper bound for per-process threads; the blocking pool holds at most 512.
pub const MAX_THREADS_PER_PROCESS: usize = 512;

/// Configuration loaded from TOML files.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct FileConfig {
    /// Default values for CLI options
    #[serde(skip_serializing_if = "Option::is_none")]
    pub defaults: Option<DefaultsConfig>,

    /// Date evaluation policy
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strict: Option<StrictConfig>,

    /// Suffix to WHOIS host overrides (`"host"` or `"host:port"`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub servers: Option<HashMap<String, String>>,
}

/// Default values that map to CLI options.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct DefaultsConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Number of shard worker processes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processes: Option<usize>,

    /// In-flight domains per process
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threads: Option<usize>,

    /// Remove the per-process cap entirely
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unlock_threads_limit: Option<bool>,

    /// Backend id
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend: Option<String>,

    /// Per-operation timeout (as string, e.g., "15s", "1m")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub quiet: Option<bool>,
}

/// Date evaluation policy.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct StrictConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    /// Suffixes never date-evaluated, even in strict mode
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exempt_suffixes: Option<Vec<String>>,

    /// Suffixes whose registries omit expiry dates; skipped unless strict
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_optional_suffixes: Option<Vec<String>>,
}

impl FileConfig {
    /// Overlay these file settings onto `config`.
    pub fn apply(&self, mut config: RunConfig) -> Result<RunConfig, AuditError> {
        if let Some(defaults) = &self.defaults {
            if let Some(input) = &defaults.input {
                config.input_path = PathBuf::from(input);
            }
            if let Some(output) = &defaults.output {
                config.output_path = Some(PathBuf::from(output));
            }
            if let Some(error) = &defaults.error {
                config.error_path = Some(PathBuf::from(error));
            }
            if let Some(processes) = defaults.processes {
                config.process_count = processes;
            }
            if let Some(threads) = defaults.threads {
                config.max_threads_per_process = Concurrency::bounded(threads);
            }
            if defaults.unlock_threads_limit == Some(true) {
                config.max_threads_per_process = Concurrency::Unbounded;
            }
            if let Some(backend) = &defaults.backend {
                config.backend_id = backend.clone();
            }
            if let Some(timeout) = &defaults.timeout {
                config.timeout = parse_timeout(timeout)?;
            }
            if let Some(quiet) = defaults.quiet {
                config.quiet = quiet;
            }
        }

        if let Some(strict) = &self.strict {
            if let Some(enabled) = strict.enabled {
                config.strict = enabled;
            }
            if let Some(exempt) = &strict.exempt_suffixes {
                config.strict_exempt_suffixes = normalize_suffixes(exempt);
            }
            if let Some(optional) = &strict.date_optional_suffixes {
                config.date_optional_suffixes = normalize_suffixes(optional);
            }
        }

        Ok(config)
    }

    /// Server overrides, empty when the section is absent.
    pub fn server_overrides(&self) -> HashMap<String, String> {
        self.servers.clone().unwrap_or_default()
    }
}

fn normalize_suffixes(suffixes: &[String]) -> Vec<String> {
    suffixes
        .iter()
        .map(|s| s.trim().trim_start_matches('.').to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Configuration discovery and loading functionality.
pub struct ConfigManager {
    /// Whether to log which files were picked up
    pub verbose: bool,
}

impl ConfigManager {
    /// Create a new configuration manager.
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    /// Load configuration from a specific file.
    pub fn load_file<P: AsRef<Path>>(&self, path: P) -> Result<FileConfig, AuditError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(AuditError::file_error(
                path.to_string_lossy(),
                "Configuration file not found",
            ));
        }

        let content = fs::read_to_string(path).map_err(|e| {
            AuditError::file_error(
                path.to_string_lossy(),
                format!("Failed to read configuration file: {}", e),
            )
        })?;

        let config: FileConfig = toml::from_str(&content)
            .map_err(|e| AuditError::config(format!("Failed to parse TOML configuration: {}", e)))?;

        self.validate_config(&config)?;

        Ok(config)
    }

    /// Discover and load configuration files in precedence order.
    ///
    /// XDG is lowest, then the home directory, then the current directory.
    pub fn discover_and_load(&self) -> Result<FileConfig, AuditError> {
        let mut merged_config = FileConfig::default();
        let mut loaded_files = Vec::new();

        let candidates = [
            self.get_xdg_config_path(),
            self.get_global_config_path(),
            self.get_local_config_path(),
        ];

        for path in candidates.into_iter().flatten() {
            let config = self.load_file(&path)?;
            merged_config = self.merge_configs(merged_config, config);
            loaded_files.push(path);
        }

        if self.verbose {
            for path in &loaded_files {
                info!(path = %path.display(), "loaded configuration file");
            }
        }

        Ok(merged_config)
    }

    fn get_local_config_path(&self) -> Option<PathBuf> {
        let candidates = ["./expiry-audit.toml", "./.expiry-audit.toml"];

        for candidate in &candidates {
            let path = Path::new(candidate);
            if path.exists() {
                return Some(path.to_path_buf());
            }
        }

        None
    }

    fn get_global_config_path(&self) -> Option<PathBuf> {
        let home = env::var_os("HOME")?;
        let candidates = [".expiry-audit.toml", "expiry-audit.toml"];

        candidates
            .iter()
            .map(|candidate| Path::new(&home).join(candidate))
            .find(|path| path.exists())
    }

    /// Follows the XDG Base Directory Specification.
    fn get_xdg_config_path(&self) -> Option<PathBuf> {
        let config_dir = env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| env::var_os("HOME").map(|home| Path::new(&home).join(".config")))?;

        let path = config_dir.join("expiry-audit").join("config.toml");
        if path.exists() {
            Some(path)
        } else {
            None
        }
    }

    /// Merge two configurations. Values from `higher` take precedence.
    pub fn merge_configs(&self, lower: FileConfig, higher: FileConfig) -> FileConfig {
        FileConfig {
            defaults: match (lower.defaults, higher.defaults) {
                (Some(lower_defaults), Some(higher_defaults)) => Some(DefaultsConfig {
                    input: higher_defaults.input.or(lower_defaults.input),
                    output: higher_defaults.output.or(lower_defaults.output),
                    error: higher_defaults.error.or(lower_defaults.error),
                    processes: higher_defaults.processes.or(lower_defaults.processes),
                    threads: higher_defaults.threads.or(lower_defaults.threads),
                    unlock_threads_limit: higher_defaults
                        .unlock_threads_limit
                        .or(lower_defaults.unlock_threads_limit),
                    backend: higher_defaults.backend.or(lower_defaults.backend),
                    timeout: higher_defaults.timeout.or(lower_defaults.timeout),
                    quiet: higher_defaults.quiet.or(lower_defaults.quiet),
                }),
                (lower_defaults, higher_defaults) => higher_defaults.or(lower_defaults),
            },
            strict: match (lower.strict, higher.strict) {
                (Some(lower_strict), Some(higher_strict)) => Some(StrictConfig {
                    enabled: higher_strict.enabled.or(lower_strict.enabled),
                    exempt_suffixes: higher_strict.exempt_suffixes.or(lower_strict.exempt_suffixes),
                    date_optional_suffixes: higher_strict
                        .date_optional_suffixes
                        .or(lower_strict.date_optional_suffixes),
                }),
                (lower_strict, higher_strict) => higher_strict.or(lower_strict),
            },
            servers: match (lower.servers, higher.servers) {
                (Some(mut lower_servers), Some(higher_servers)) => {
                    lower_servers.extend(higher_servers);
                    Some(lower_servers)
                }
                (lower_servers, higher_servers) => higher_servers.or(lower_servers),
            },
        }
    }

    /// Validate a configuration for common issues.
    fn validate_config(&self, config: &FileConfig) -> Result<(), AuditError> {
        if let Some(defaults) = &config.defaults {
            if defaults.processes == Some(0) {
                return Err(AuditError::config("Process count must be at least 1"));
            }

            if let Some(threads) = defaults.threads {
                if threads == 0 || threads > MAX_THREADS_PER_PROCESS {
                    return Err(AuditError::config(format!(
                        "Threads per process must be between 1 and {}",
                        MAX_THREADS_PER_PROCESS
                    )));
                }
            }

            if let Some(timeout_str) = &defaults.timeout {
                parse_timeout(timeout_str)?;
            }

            if let Some(backend) = &defaults.backend {
                if backend.trim().is_empty() {
                    return Err(AuditError::config("Backend id cannot be empty"));
                }
            }
        }

        if let Some(servers) = &config.servers {
            for (suffix, host) in servers {
                if suffix.trim().is_empty() || host.trim().is_empty() || host.contains(' ') {
                    return Err(AuditError::config(format!(
                        "Invalid server entry '{}' = '{}'",
                        suffix, host
                    )));
                }
            }
        }

        Ok(())
    }
}

/// Environment variable configuration that mirrors CLI options.
///
/// This represents configuration values that can be set via `EA_*`
/// environment variables.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnvConfig {
    pub processes: Option<usize>,
    pub threads: Option<usize>,
    pub backend: Option<String>,
    pub timeout: Option<String>,
    pub strict: Option<bool>,
    pub quiet: Option<bool>,
    pub input: Option<String>,
    pub output: Option<String>,
    pub error: Option<String>,
    pub config: Option<String>,
}

fn parse_bool(val: &str) -> Option<bool> {
    match val.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl EnvConfig {
    /// Build from an arbitrary variable lookup. Invalid values are logged
    /// and ignored.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut env_config = EnvConfig::default();

        let text = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        // EA_PROCESSES - shard worker count
        if let Some(val) = text("EA_PROCESSES") {
            match val.trim().parse::<usize>() {
                Ok(n) if n > 0 => env_config.processes = Some(n),
                _ => warn!("Invalid EA_PROCESSES='{}', must be at least 1", val),
            }
        }

        // EA_THREADS - per-process concurrency
        if let Some(val) = text("EA_THREADS") {
            match val.trim().parse::<usize>() {
                Ok(n) if n > 0 && n <= MAX_THREADS_PER_PROCESS => env_config.threads = Some(n),
                _ => warn!(
                    "Invalid EA_THREADS='{}', must be 1-{}",
                    val, MAX_THREADS_PER_PROCESS
                ),
            }
        }

        env_config.backend = text("EA_BACKEND").map(|v| v.trim().to_string());

        // EA_TIMEOUT - per-operation timeout
        if let Some(val) = text("EA_TIMEOUT") {
            if parse_timeout_string(&val).is_some() {
                env_config.timeout = Some(val);
            } else {
                warn!("Invalid EA_TIMEOUT='{}', use format like '5s', '30s', '2m'", val);
            }
        }

        for (key, slot) in [
            ("EA_STRICT", &mut env_config.strict),
            ("EA_QUIET", &mut env_config.quiet),
        ] {
            if let Some(val) = text(key) {
                match parse_bool(&val) {
                    Some(b) => *slot = Some(b),
                    None => warn!("Invalid {}='{}', use true/false", key, val),
                }
            }
        }

        env_config.input = text("EA_INPUT");
        env_config.output = text("EA_OUTPUT");
        env_config.error = text("EA_ERROR");
        env_config.config = text("EA_CONFIG");

        env_config
    }

    /// Overlay these environment settings onto `config`.
    pub fn apply(&self, mut config: RunConfig) -> Result<RunConfig, AuditError> {
        if let Some(input) = &self.input {
            config.input_path = PathBuf::from(input);
        }
        if let Some(output) = &self.output {
            config.output_path = Some(PathBuf::from(output));
        }
        if let Some(error) = &self.error {
            config.error_path = Some(PathBuf::from(error));
        }
        if let Some(processes) = self.processes {
            config.process_count = processes;
        }
        if let Some(threads) = self.threads {
            config.max_threads_per_process = Concurrency::bounded(threads);
        }
        if let Some(backend) = &self.backend {
            config.backend_id = backend.clone();
        }
        if let Some(timeout) = &self.timeout {
            config.timeout = parse_timeout(timeout)?;
        }
        if let Some(strict) = self.strict {
            config.strict = strict;
        }
        if let Some(quiet) = self.quiet {
            config.quiet = quiet;
        }
        Ok(config)
    }
}

/// Load configuration from the process environment.
pub fn load_env_config(verbose: bool) -> EnvConfig {
    let env_config = EnvConfig::from_lookup(|key| env::var(key).ok());
    if verbose && env_config != EnvConfig::default() {
        info!(?env_config, "using EA_* environment settings");
    }
    env_config
}

/// Parse a timeout string like "5s", "30s", "2m" into seconds.
///
/// A bare number is taken as seconds.
pub fn parse_timeout_string(timeout_str: &str) -> Option<u64> {
    let timeout_str = timeout_str.trim().to_lowercase();

    let seconds = if let Some(s) = timeout_str.strip_suffix('s') {
        s.parse::<u64>().ok()
    } else if let Some(m) = timeout_str.strip_suffix('m') {
        m.parse::<u64>().ok().map(|m| m * 60)
    } else {
        timeout_str.parse::<u64>().ok()
    };

    seconds.filter(|s| *s > 0)
}

/// Like [`parse_timeout_string`], as a `Duration` or a configuration error.
pub fn parse_timeout(timeout_str: &str) -> Result<Duration, AuditError> {
    parse_timeout_string(timeout_str)
        .map(Duration::from_secs)
        .ok_or_else(|| {
            AuditError::config(format!(
                "Invalid timeout format '{}'. Use format like '5s', '30s', '2m'",
                timeout_str
            ))
        })
}
