//! Project configuration
//!
//! `distguard.toml` in the project root. Every key is optional:
//!
//! ```toml
//! build_dir = "dist"
//! staging_dir = "protected-dist"
//! domains = ["localhost", "example.com"]
//! strict = false
//! timeout_secs = 120
//!
//! [obfuscation]
//! stringArrayThreshold = 0.5
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::pipeline::{PipelineConfig, DEFAULT_BUILD_DIR, DEFAULT_STAGING_DIR};
use crate::policy::{ObfuscationPolicy, PolicyError};
use crate::whitelist::{DomainWhitelist, WhitelistError};

/// Config file name, looked up in the project root
pub const CONFIG_FILE: &str = "distguard.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },

    #[error("failed to parse config file {}: {source}", path.display())]
    Parse { path: PathBuf, source: toml::de::Error },

    #[error("invalid domains: {0}")]
    Whitelist(#[from] WhitelistError),

    #[error("invalid [obfuscation] table: {0}")]
    Policy(#[from] PolicyError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case", deny_unknown_fields)]
pub struct ProtectConfig {
    /// Relative to the project root
    pub build_dir: PathBuf,
    pub staging_dir: PathBuf,
    /// Overridden by `DISTGUARD_DOMAINS`
    pub domains: Option<Vec<String>>,
    pub strict: bool,
    pub parallel: bool,
    pub follow_symlinks: bool,
    pub timeout_secs: Option<u64>,
    pub obfuscation: ObfuscationPolicy,
}

impl Default for ProtectConfig {
    fn default() -> Self {
        Self {
            build_dir: PathBuf::from(DEFAULT_BUILD_DIR),
            staging_dir: PathBuf::from(DEFAULT_STAGING_DIR),
            domains: None,
            strict: false,
            parallel: true,
            follow_symlinks: false,
            timeout_secs: None,
            obfuscation: ObfuscationPolicy::default(),
        }
    }
}

impl ProtectConfig {
    /// Load `distguard.toml` from `root`, or defaults when there is none
    pub fn load(root: &Path) -> Result<Self, ConfigError> {
        Self::load_from(&root.join(CONFIG_FILE))
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        let config: ProtectConfig = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    /// The whitelist from `env` (the raw `DISTGUARD_DOMAINS` value) or the file
    pub fn resolve_domains(&self, env: Option<&str>) -> Result<DomainWhitelist, WhitelistError> {
        DomainWhitelist::override_or(env, || self.file_domains())
    }

    /// The whitelist with `DISTGUARD_DOMAINS` applied
    pub fn whitelist(&self) -> Result<DomainWhitelist, WhitelistError> {
        DomainWhitelist::from_env_or(|| self.file_domains())
    }

    fn file_domains(&self) -> Result<DomainWhitelist, WhitelistError> {
        match &self.domains {
            Some(domains) => DomainWhitelist::new(domains),
            None => Ok(DomainWhitelist::default()),
        }
    }

    /// Validated pipeline settings with directories resolved against `root`
    pub fn into_pipeline_config(self, root: &Path) -> Result<PipelineConfig, ConfigError> {
        self.obfuscation.validate()?;
        let whitelist = self.whitelist()?;
        Ok(PipelineConfig {
            build_dir: root.join(&self.build_dir),
            staging_dir: root.join(&self.staging_dir),
            strict: self.strict,
            parallel: self.parallel,
            follow_symlinks: self.follow_symlinks,
            timeout: self.timeout_secs.map(Duration::from_secs),
            policy: self.obfuscation,
            whitelist,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::NameStyle;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = ProtectConfig::load(dir.path()).unwrap();
        assert_eq!(config, ProtectConfig::default());
        assert!(config.parallel);
    }

    #[test]
    fn test_full_file() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join(CONFIG_FILE),
            r#"
build_dir = "out"
staging_dir = "out-protected"
domains = ["example.com", "cdn.example.com"]
strict = true
parallel = false
timeout_secs = 30

[obfuscation]
identifierNamesGenerator = "mangled"
stringArrayThreshold = 0.5
debug_protection = false
"#,
        )
        .unwrap();

        let config = ProtectConfig::load(dir.path()).unwrap();
        assert_eq!(config.build_dir, PathBuf::from("out"));
        assert!(config.strict);
        assert!(!config.parallel);
        assert_eq!(config.obfuscation.identifier_names_generator, NameStyle::Mangled);
        assert_eq!(config.obfuscation.string_array_threshold, 0.5);
        assert!(!config.obfuscation.debug_protection);
        assert!(config.obfuscation.self_defending);

        let pipeline = config.into_pipeline_config(dir.path()).unwrap();
        assert_eq!(pipeline.build_dir, dir.path().join("out"));
        assert_eq!(pipeline.staging_dir, dir.path().join("out-protected"));
        assert_eq!(pipeline.timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_parse_error_names_file() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(CONFIG_FILE), "strict = \"yes\"").unwrap();
        let err = ProtectConfig::load(dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains(CONFIG_FILE));

        fs::write(dir.path().join(CONFIG_FILE), "unknown_key = 1").unwrap();
        assert!(ProtectConfig::load(dir.path()).is_err());
    }

    #[test]
    fn test_env_overrides_domains() {
        let config = ProtectConfig {
            domains: Some(vec!["file.example".to_string()]),
            ..ProtectConfig::default()
        };
        assert_eq!(config.resolve_domains(None).unwrap().entries(), ["file.example"]);
        assert_eq!(config.resolve_domains(Some("  ")).unwrap().entries(), ["file.example"]);
        assert_eq!(
            config.resolve_domains(Some("a.example, b.example")).unwrap().entries(),
            ["a.example", "b.example"]
        );
        assert!(ProtectConfig::default().resolve_domains(None).unwrap().is_default());
    }

    #[test]
    fn test_invalid_values_rejected() {
        let bad_domain = ProtectConfig {
            domains: Some(vec!["exa mple.com".to_string()]),
            ..ProtectConfig::default()
        };
        assert!(bad_domain.resolve_domains(None).is_err());

        let mut bad_policy = ProtectConfig::default();
        bad_policy.obfuscation.control_flow_flattening_threshold = 1.5;
        let err = bad_policy.into_pipeline_config(Path::new(".")).unwrap_err();
        assert!(matches!(err, ConfigError::Policy(_)));
    }
}
