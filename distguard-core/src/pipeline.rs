//! Pipeline Driver
//!
//! Walks the build output into a staging sibling, then swaps the staging tree
//! into place. The build directory is only ever touched by the final swap: any
//! failure before it leaves the original output exactly as it was.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use thiserror::Error;

use crate::path_utils::{is_within, lexical_absolute};
use crate::policy::{ObfuscationPolicy, PolicyError};
use crate::swap::{replace_dir, SwapError, SwapStrategy};
use crate::transform::FileTransformer;
use crate::walker::{TreeWalker, WalkError, WalkOptions, WalkReport};
use crate::whitelist::DomainWhitelist;

/// Build output directory, relative to the project root
pub const DEFAULT_BUILD_DIR: &str = "dist";
/// Staging directory, a sibling of the build output
pub const DEFAULT_STAGING_DIR: &str = "protected-dist";

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub build_dir: PathBuf,
    pub staging_dir: PathBuf,
    /// Abort before the swap when any file fails
    pub strict: bool,
    pub parallel: bool,
    pub follow_symlinks: bool,
    /// Limit for the whole walk
    pub timeout: Option<Duration>,
    pub policy: ObfuscationPolicy,
    pub whitelist: DomainWhitelist,
}

impl PipelineConfig {
    /// Defaults for a project rooted at `root`: `dist` protected through `protected-dist`
    pub fn for_root(root: &Path) -> Self {
        Self {
            build_dir: root.join(DEFAULT_BUILD_DIR),
            staging_dir: root.join(DEFAULT_STAGING_DIR),
            strict: false,
            parallel: true,
            follow_symlinks: false,
            timeout: None,
            policy: ObfuscationPolicy::default(),
            whitelist: DomainWhitelist::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("cannot resolve {}: {source}", path.display())]
    Resolve { path: PathBuf, source: io::Error },

    #[error("staging directory must differ from the build directory {}", path.display())]
    SameDirectory { path: PathBuf },

    #[error("{} and {} are nested inside one another", build.display(), staging.display())]
    Nested { build: PathBuf, staging: PathBuf },

    #[error("build directory {} not found, run the site build first", path.display())]
    BuildDirMissing { path: PathBuf },

    #[error("invalid obfuscation policy: {0}")]
    Policy(#[from] PolicyError),

    #[error("failed to clear staging directory {}: {source}", path.display())]
    StagingCleanup { path: PathBuf, source: io::Error },

    #[error("walk failed: {0}")]
    Walk(#[from] WalkError),

    #[error("{count} files failed in strict mode: {}", paths.join(", "))]
    FilesFailed { count: usize, paths: Vec<String> },

    #[error("swap failed: {0}")]
    Swap(#[from] SwapError),
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub build_dir: PathBuf,
    pub walk: WalkReport,
    pub strategy: SwapStrategy,
    pub elapsed_ms: u64,
}

pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn run(&self) -> Result<PipelineReport, PipelineError> {
        let started = Instant::now();
        let build = resolve(&self.config.build_dir)?;
        let staging = resolve(&self.config.staging_dir)?;

        if build == staging {
            return Err(PipelineError::SameDirectory { path: build });
        }
        if is_within(&staging, &build) || is_within(&build, &staging) {
            return Err(PipelineError::Nested { build, staging });
        }
        if !build.is_dir() {
            return Err(PipelineError::BuildDirMissing { path: build });
        }

        let transformer = FileTransformer::new(
            Arc::new(self.config.policy.clone()),
            Arc::new(self.config.whitelist.clone()),
        )?;
        if self.config.whitelist.is_default() {
            tracing::warn!(
                domains = %self.config.whitelist.to_json(),
                "using the built-in domain whitelist, set `domains` in distguard.toml for production"
            );
        }

        if staging.exists() {
            tracing::warn!(
                path = %staging.display(),
                "removing staging directory left by an earlier run"
            );
            remove_tree(&staging).map_err(|source| PipelineError::StagingCleanup {
                path: staging.clone(),
                source,
            })?;
        }

        tracing::info!(
            build = %build.display(),
            staging = %staging.display(),
            domains = %self.config.whitelist.to_json(),
            "protecting build output"
        );
        let options = WalkOptions {
            parallel: self.config.parallel,
            follow_symlinks: self.config.follow_symlinks,
            deadline: self.config.timeout.map(|timeout| started + timeout),
        };
        let walk = match TreeWalker::new(transformer, options).walk(&build, &staging) {
            Ok(report) => report,
            Err(err) => {
                discard_staging(&staging);
                return Err(err.into());
            }
        };

        if !walk.is_clean() {
            if self.config.strict {
                discard_staging(&staging);
                return Err(PipelineError::FilesFailed {
                    count: walk.failed.len(),
                    paths: walk.failed_paths(),
                });
            }
            tracing::warn!(
                failed = walk.failed.len(),
                "some files could not be protected and are left out of the build"
            );
        }

        let strategy = match replace_dir(&build, &staging) {
            Ok(strategy) => strategy,
            Err(err) => {
                discard_staging(&staging);
                return Err(err.into());
            }
        };

        let elapsed = started.elapsed();
        tracing::info!(
            scripts = walk.scripts,
            assets = walk.assets,
            failed = walk.failed.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "build protected"
        );
        Ok(PipelineReport {
            build_dir: build,
            walk,
            strategy,
            elapsed_ms: elapsed.as_millis() as u64,
        })
    }
}

fn resolve(path: &Path) -> Result<PathBuf, PipelineError> {
    lexical_absolute(path).map_err(|source| PipelineError::Resolve {
        path: path.to_path_buf(),
        source,
    })
}

/// `rm -rf` that tolerates entries vanishing underneath it
fn remove_tree(path: &Path) -> io::Result<()> {
    match fs::remove_dir_all(path) {
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

fn discard_staging(staging: &Path) {
    if let Err(err) = remove_tree(staging) {
        tracing::warn!(
            path = %staging.display(),
            error = %err,
            "failed to remove staging directory"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config(root: &Path) -> PipelineConfig {
        PipelineConfig {
            policy: ObfuscationPolicy::disabled(),
            ..PipelineConfig::for_root(root)
        }
    }

    #[test]
    fn test_rejects_overlapping_dirs() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("dist")).unwrap();

        let mut same = config(dir.path());
        same.staging_dir = dir.path().join("dist/.");
        assert!(matches!(Pipeline::new(same).run(), Err(PipelineError::SameDirectory { .. })));

        let mut inside = config(dir.path());
        inside.staging_dir = dir.path().join("dist/protected");
        assert!(matches!(Pipeline::new(inside).run(), Err(PipelineError::Nested { .. })));

        let mut outside = config(dir.path());
        outside.staging_dir = dir.path().to_path_buf();
        assert!(matches!(Pipeline::new(outside).run(), Err(PipelineError::Nested { .. })));
    }

    #[test]
    fn test_missing_build_touches_nothing() {
        let dir = TempDir::new().unwrap();
        let err = Pipeline::new(config(dir.path())).run().unwrap_err();
        assert!(matches!(err, PipelineError::BuildDirMissing { .. }));
        assert!(!dir.path().join(DEFAULT_BUILD_DIR).exists());
        assert!(!dir.path().join(DEFAULT_STAGING_DIR).exists());
    }

    #[test]
    fn test_stale_staging_replaced() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("dist")).unwrap();
        fs::write(dir.path().join("dist/index.html"), "<p>").unwrap();
        fs::create_dir_all(dir.path().join("protected-dist/leftover")).unwrap();

        let report = Pipeline::new(config(dir.path())).run().unwrap();
        assert_eq!(report.walk.assets, 1);
        assert!(!dir.path().join("dist/leftover").exists());
        assert!(!dir.path().join("protected-dist").exists());
    }

    #[test]
    fn test_strict_failure_keeps_build() {
        let dir = TempDir::new().unwrap();
        let build = dir.path().join("dist");
        fs::create_dir_all(&build).unwrap();
        fs::write(build.join("ok.js"), "console.log(1)").unwrap();
        fs::write(build.join("bad.js"), [0xffu8, 0xfe]).unwrap();

        let mut strict = config(dir.path());
        strict.strict = true;
        let err = Pipeline::new(strict).run().unwrap_err();
        match err {
            PipelineError::FilesFailed { count, paths } => {
                assert_eq!(count, 1);
                assert!(paths[0].ends_with("bad.js"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(fs::read_to_string(build.join("ok.js")).unwrap(), "console.log(1)");
        assert!(!dir.path().join(DEFAULT_STAGING_DIR).exists());
    }

    #[test]
    fn test_lenient_failure_swaps_without_the_file() {
        let dir = TempDir::new().unwrap();
        let build = dir.path().join("dist");
        fs::create_dir_all(&build).unwrap();
        fs::write(build.join("ok.js"), "console.log(1)").unwrap();
        fs::write(build.join("bad.js"), [0xffu8, 0xfe]).unwrap();

        let report = Pipeline::new(config(dir.path())).run().unwrap();
        assert_eq!(report.walk.failed.len(), 1);
        assert!(!build.join("bad.js").exists());
        assert_ne!(fs::read_to_string(build.join("ok.js")).unwrap(), "console.log(1)");
    }

    #[test]
    fn test_invalid_policy_fails_before_walking() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("dist")).unwrap();
        let mut bad = config(dir.path());
        bad.policy.dead_code_injection_threshold = -0.5;
        assert!(matches!(Pipeline::new(bad).run(), Err(PipelineError::Policy(_))));
        assert!(!dir.path().join(DEFAULT_STAGING_DIR).exists());
    }
}
