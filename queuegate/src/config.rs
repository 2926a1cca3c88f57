//! Configuration management

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use queuegate_stack::{OutputFormat, StackConfig};

/// Main configuration structure
#[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub output: OutputConfig,

    #[serde(default)]
    pub stack: StackConfig,
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_out_dir")]
    pub dir: PathBuf,

    #[serde(default)]
    pub format: OutputFormat,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_out_dir(),
            format: OutputFormat::default(),
        }
    }
}

fn default_out_dir() -> PathBuf {
    PathBuf::from("cdk.out")
}

impl Config {
    /// Load configuration from `path` (if present) and `QUEUEGATE_*` environment
    /// variables; nested keys use `__`, e.g. `QUEUEGATE_STACK__QUEUE__FIFO=true`
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::from(path).required(false))
            .add_source(
                config::Environment::with_prefix("QUEUEGATE")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize::<Config>()?)
    }

    /// The default configuration as a starter `queuegate.toml`
    pub fn starter_toml() -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(&Config::default())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use queuegate_stack::{QueueAccess, RootMethod};
    use std::fs;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().join("queuegate.toml")).unwrap();
        assert_eq!(config.output.dir, PathBuf::from("cdk.out"));
        assert_eq!(config.stack.queue.visibility_timeout_secs, 300);
    }

    #[test]
    fn test_file_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queuegate.toml");
        fs::write(
            &path,
            r#"
[output]
format = "yaml"

[stack]
name = "Orders"

[stack.role]
access = "full"

[stack.api]
root_method = "none"
"#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.output.format, OutputFormat::Yaml);
        assert_eq!(config.stack.name, "Orders");
        assert_eq!(config.stack.role.access, QueueAccess::Full);
        assert_eq!(config.stack.api.root_method, RootMethod::None);
        assert_eq!(config.stack.api.name, "SqsApi");
    }

    #[test]
    fn test_starter_toml_round_trips() {
        let starter = Config::starter_toml().unwrap();
        assert!(starter.contains("visibility_timeout_secs = 300"));

        let parsed: Config = toml::from_str(&starter).unwrap();
        assert_eq!(parsed, Config::default());
    }
}
