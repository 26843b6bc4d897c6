//! Configuration parser for loading module trees from YAML.
//!
//! The engine only reads configuration; parsing is kept here so the CLI and
//! tests share one entry point with consistent error reporting.

use crate::error::{ConfigError, Result, TerraceError};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::spec::Config;

/// Configuration parser for loading module trees.
#[derive(Debug, Default)]
pub struct ConfigParser {
    /// Base path for resolving relative paths.
    base_path: Option<PathBuf>,
}

impl ConfigParser {
    /// Creates a new configuration parser.
    #[must_use]
    pub const fn new() -> Self {
        Self { base_path: None }
    }

    /// Sets the base path for resolving relative paths.
    #[must_use]
    pub fn with_base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    /// Loads configuration from a YAML file.
    ///
    /// The path is used as given; the base path only locates the `.env` file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<Config> {
        let path = path.as_ref();
        info!("Loading configuration from: {}", path.display());

        if !path.exists() {
            return Err(TerraceError::Config(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            }));
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            TerraceError::Config(ConfigError::ParseError {
                message: format!("Failed to read file: {e}"),
                location: Some(path.display().to_string()),
            })
        })?;

        Self::parse_yaml(&content, Some(path))
    }

    /// Parses configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid.
    pub fn parse_yaml(content: &str, source: Option<&Path>) -> Result<Config> {
        debug!("Parsing YAML configuration");

        let config: Config = serde_yaml::from_str(content).map_err(|e| {
            let location = source.map(|p| p.display().to_string());
            TerraceError::Config(ConfigError::ParseError {
                message: format!("YAML parse error: {e}"),
                location,
            })
        })?;

        debug!(
            "Parsed configuration with {} module(s)",
            config.modules().len()
        );
        Ok(config)
    }

    /// Loads the .env file if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the .env file exists but cannot be loaded.
    pub fn load_dotenv(&self) -> Result<()> {
        let env_path = self.resolve(Path::new(".env"));

        if env_path.exists() {
            info!("Loading environment from: {}", env_path.display());
            dotenvy::from_path(&env_path).map_err(|e| {
                TerraceError::Config(ConfigError::ParseError {
                    message: format!("Failed to load .env file: {e}"),
                    location: Some(env_path.display().to_string()),
                })
            })?;
        } else {
            debug!(".env file not found at: {}", env_path.display());
        }

        Ok(())
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        match &self.base_path {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }
}

/// Default configuration file names to search for.
pub const DEFAULT_CONFIG_FILES: &[&str] = &["terrace.yaml", "terrace.yml", "main.yaml"];

/// Finds the configuration file in the given directory or its parents.
///
/// # Errors
///
/// Returns an error if no configuration file is found.
pub fn find_config_file(start_dir: impl AsRef<Path>) -> Result<PathBuf> {
    let start = start_dir.as_ref();
    let mut current = start.to_path_buf();

    loop {
        for filename in DEFAULT_CONFIG_FILES {
            let config_path = current.join(filename);
            if config_path.exists() {
                info!("Found configuration file: {}", config_path.display());
                return Ok(config_path);
            }
        }

        if !current.pop() {
            break;
        }
    }

    Err(TerraceError::Config(ConfigError::FileNotFound {
        path: start.join(DEFAULT_CONFIG_FILES[0]),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addrs::ResourceMode;
    use crate::config::Expression;
    use tempfile::TempDir;

    const NETWORK_YAML: &str = r#"
variables:
  - name: region
    default: eu-west-1
  - name: cidr

providers:
  - name: aws
    config:
      region: { ref: var.region }

resources:
  - type: aws_vpc
    name: main
    config:
      cidr_block: { ref: var.cidr }
  - type: aws_subnet
    name: private
    depends_on: [aws_vpc.main]
    checks:
      - condition: { ref: aws_subnet.private.available }
        error_message: subnet must be available
  - mode: data
    type: aws_ami
    name: ubuntu

outputs:
  - name: vpc_id
    value: { ref: aws_vpc.main.id }

modules:
  - name: dns
    inputs:
      zone: example.com
    module:
      variables:
        - name: zone
      resources:
        - type: aws_route53_zone
          name: this
"#;

    #[test]
    fn test_parse_module_tree() {
        let config = ConfigParser::parse_yaml(NETWORK_YAML, None).expect("valid config");

        assert_eq!(config.root.variables.len(), 2);
        assert_eq!(
            config.root.variable("region").and_then(|v| v.default.clone()),
            Some(serde_json::json!("eu-west-1"))
        );
        assert_eq!(config.root.resources[2].mode, ResourceMode::Data);
        assert_eq!(
            config.root.outputs[0].value,
            Expression::reference("aws_vpc.main.id")
        );

        let dns = config.root.module_call("dns").expect("dns module");
        assert_eq!(
            dns.inputs.get("zone"),
            Some(&Expression::Literal(serde_json::json!("example.com")))
        );

        let paths: Vec<String> = config.modules().iter().map(|(p, _)| p.to_string()).collect();
        assert_eq!(paths, ["root", "module.dns"]);
    }

    #[test]
    fn test_parse_invalid_yaml() {
        let result = ConfigParser::parse_yaml("resources: [", None);
        assert!(matches!(
            result,
            Err(TerraceError::Config(ConfigError::ParseError { .. }))
        ));
    }

    #[test]
    fn test_load_file_in_subdirectory() {
        let temp = TempDir::new().expect("temp dir");
        std::fs::create_dir(temp.path().join("infra")).expect("create dir");
        std::fs::write(temp.path().join("infra").join("terrace.yaml"), NETWORK_YAML).expect("write config");

        let config = ConfigParser::new()
            .with_base_path(temp.path().join("infra"))
            .load_file(temp.path().join("infra").join("terrace.yaml"))
            .expect("config loads");
        assert_eq!(config.root.resources.len(), 3);

        let found = find_config_file(temp.path().join("infra")).expect("config found");
        assert!(found.ends_with("infra/terrace.yaml"));
    }

    #[test]
    fn test_relative_path_is_not_joined_to_base() {
        let cwd = std::env::current_dir().expect("current dir");
        let temp = tempfile::Builder::new()
            .prefix("config-")
            .tempdir_in(&cwd)
            .expect("temp dir");
        std::fs::write(temp.path().join("main.yaml"), NETWORK_YAML).expect("write config");

        let relative = temp
            .path()
            .strip_prefix(&cwd)
            .expect("inside cwd")
            .join("main.yaml");
        assert!(relative.is_relative());

        let parser = ConfigParser::new().with_base_path(relative.parent().expect("has parent"));
        let config = parser.load_file(&relative).expect("config loads");
        assert_eq!(config.root.outputs.len(), 1);
    }

    #[test]
    fn test_load_missing_file() {
        let temp = TempDir::new().expect("temp dir");
        let result = ConfigParser::new().load_file(temp.path().join("absent.yaml"));
        assert!(matches!(
            result,
            Err(TerraceError::Config(ConfigError::FileNotFound { .. }))
        ));
    }
}
