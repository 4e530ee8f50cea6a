use serde::Deserialize;
use std::path::{Path, PathBuf};

use super::ConfigError;

/// Complete YAML configuration structure
///
/// All fields are optional to allow partial configuration. Values present
/// here override the environment.
///
/// # Example YAML structure
/// ```yaml
/// plugins:
///   dir: "/usr/lib/wrt-plugins"
///   files:
///     - "/opt/widgets/extra/libwidget_extra.so"
///   verbose_load: true
///   library_suffixes: [".so"]
///
/// workers:
///   domains:
///     - "filesystem"
///     - "storage"
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub plugins: Option<PluginsYaml>,
    pub workers: Option<WorkersYaml>,
}

/// Plugin discovery settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct PluginsYaml {
    pub dir: Option<PathBuf>,
    pub files: Option<Vec<PathBuf>>,
    pub verbose_load: Option<bool>,
    pub library_suffixes: Option<Vec<String>>,
}

/// Worker thread settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct WorkersYaml {
    pub domains: Option<Vec<String>>,
}

impl YamlConfig {
    /// Load configuration from a YAML file
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or the YAML is malformed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let config: YamlConfig = serde_yaml::from_str(&contents)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_yaml_config_full() {
        let yaml = r#"
plugins:
  dir: "/usr/lib/wrt-plugins"
  files:
    - "/opt/extra/libwidget_extra.so"
  verbose_load: true
  library_suffixes: [".so", ".plugin"]

workers:
  domains: ["filesystem", "storage"]
"#;
        let config: YamlConfig = serde_yaml::from_str(yaml).unwrap();

        let plugins = config.plugins.unwrap();
        assert_eq!(plugins.dir, Some(PathBuf::from("/usr/lib/wrt-plugins")));
        assert_eq!(plugins.files.unwrap().len(), 1);
        assert_eq!(plugins.verbose_load, Some(true));
        assert_eq!(plugins.library_suffixes.unwrap(), vec![".so", ".plugin"]);
        assert_eq!(config.workers.unwrap().domains.unwrap(), vec!["filesystem", "storage"]);
    }

    #[test]
    fn test_yaml_config_partial() {
        let yaml = r#"
plugins:
  verbose_load: false
"#;
        let config: YamlConfig = serde_yaml::from_str(yaml).unwrap();
        let plugins = config.plugins.unwrap();
        assert!(plugins.dir.is_none());
        assert!(plugins.files.is_none());
        assert!(config.workers.is_none());
    }

    #[test]
    fn test_yaml_config_empty() {
        let config: YamlConfig = serde_yaml::from_str("{}").unwrap();
        assert!(config.plugins.is_none());
        assert!(config.workers.is_none());
    }

    #[test]
    fn test_from_file_not_found() {
        let result = YamlConfig::from_file(Path::new("/nonexistent/config.yaml"));
        assert!(result.unwrap_err().to_string().contains("Failed to read config file"));
    }

    #[test]
    fn test_from_file_invalid_yaml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("invalid.yaml");
        fs::write(&config_path, "invalid: yaml: content:").unwrap();

        let result = YamlConfig::from_file(&config_path);
        assert!(result.unwrap_err().to_string().contains("Failed to parse YAML"));
    }
}
