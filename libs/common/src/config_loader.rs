//! Configuration loading helper functions
//! Provides layered loading with priority: ENV > YAML file > Default

use crate::error::{Error, Result};
use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{de::DeserializeOwned, Serialize};
use std::path::Path;
use tracing::{debug, info};

/// Load a configuration struct from defaults, an optional YAML file and
/// prefixed environment variables (highest priority).
///
/// # Arguments
/// * `file` - Optional YAML file; it must exist when given
/// * `env_prefix` - Environment prefix, e.g. `"LIFECYCLE_"`
///
/// Field names map to environment variables by upper-casing, so
/// `participant_timeout_ms` is read from `LIFECYCLE_PARTICIPANT_TIMEOUT_MS`.
pub fn load_layered<T>(file: Option<&Path>, env_prefix: &str) -> Result<T>
where
    T: Default + Serialize + DeserializeOwned,
{
    let mut figment = Figment::from(Serialized::defaults(T::default()));

    if let Some(path) = file {
        if !path.exists() {
            return Err(Error::Config(format!(
                "config file not found: {}",
                path.display()
            )));
        }
        info!("Config: {}", path.display());
        figment = figment.merge(Yaml::file(path));
    }

    debug!("Config env prefix: {}", env_prefix);
    let config = figment.merge(Env::prefixed(env_prefix)).extract()?;
    Ok(config)
}

/// Load a configuration struct from defaults and environment variables only
pub fn load_layered_from_env<T>(env_prefix: &str) -> Result<T>
where
    T: Default + Serialize + DeserializeOwned,
{
    load_layered(None, env_prefix)
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::io::Write;

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    struct SampleConfig {
        name: String,
        retries: u32,
        timeout_ms: Option<u64>,
    }

    #[test]
    fn test_defaults_when_nothing_set() {
        let config: SampleConfig = load_layered_from_env("CFGTEST_DEFAULTS_").unwrap();
        assert_eq!(config, SampleConfig::default());
    }

    #[test]
    fn test_yaml_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "name: drain\nretries: 3").unwrap();

        let config: SampleConfig = load_layered(Some(file.path()), "CFGTEST_YAML_").unwrap();
        assert_eq!(config.name, "drain");
        assert_eq!(config.retries, 3);
        assert_eq!(config.timeout_ms, None);
    }

    #[test]
    fn test_env_overrides_yaml() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "retries: 3").unwrap();
        std::env::set_var("CFGTEST_ENV_RETRIES", "7");
        std::env::set_var("CFGTEST_ENV_TIMEOUT_MS", "250");

        let config: SampleConfig = load_layered(Some(file.path()), "CFGTEST_ENV_").unwrap();
        assert_eq!(config.retries, 7);
        assert_eq!(config.timeout_ms, Some(250));

        std::env::remove_var("CFGTEST_ENV_RETRIES");
        std::env::remove_var("CFGTEST_ENV_TIMEOUT_MS");
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let result: Result<SampleConfig> =
            load_layered(Some(Path::new("/nonexistent/drain.yaml")), "CFGTEST_MISSING_");
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
