//! File Transformer
//!
//! Protects one file: scripts get the domain guard and are obfuscated, every
//! other file is copied byte for byte.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use crate::guard;
use crate::obfuscator::{ObfuscateError, Obfuscator, SourceType};
use crate::policy::{ObfuscationPolicy, PolicyError};
use crate::whitelist::DomainWhitelist;

/// What a file is, decided from its extension alone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    /// `.js`, or `.mjs` when `module` is set
    Script { module: bool },
    Asset,
}

/// Classify by extension; `.JS` is an asset, matching the build scripts this replaces
pub fn classify(path: &Path) -> FileKind {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("js") => FileKind::Script { module: false },
        Some("mjs") => FileKind::Script { module: true },
        _ => FileKind::Asset,
    }
}

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("failed to read {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },

    #[error("{} is not valid UTF-8", path.display())]
    NotUtf8 { path: PathBuf },

    #[error("failed to obfuscate {}: {source}", path.display())]
    Obfuscate { path: PathBuf, source: ObfuscateError },

    #[error("failed to write {}: {source}", path.display())]
    Write { path: PathBuf, source: io::Error },

    #[error("failed to copy {}: {source}", path.display())]
    Copy { path: PathBuf, source: io::Error },
}

impl TransformError {
    pub fn path(&self) -> &Path {
        match self {
            TransformError::Read { path, .. }
            | TransformError::NotUtf8 { path }
            | TransformError::Obfuscate { path, .. }
            | TransformError::Write { path, .. }
            | TransformError::Copy { path, .. } => path,
        }
    }
}

/// Result of transforming one file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileOutcome {
    pub kind: FileKind,
    pub bytes_in: u64,
    pub bytes_out: u64,
    /// Obfuscation transforms applied, 0 for assets
    pub transforms: usize,
}

/// Shared by every worker; holds only immutable state
#[derive(Debug, Clone)]
pub struct FileTransformer {
    obfuscator: Arc<Obfuscator>,
    whitelist: Arc<DomainWhitelist>,
}

impl FileTransformer {
    pub fn new(
        policy: Arc<ObfuscationPolicy>,
        whitelist: Arc<DomainWhitelist>,
    ) -> Result<Self, PolicyError> {
        let obfuscator = Obfuscator::new(policy.as_ref().clone())?;
        Ok(Self {
            obfuscator: Arc::new(obfuscator),
            whitelist,
        })
    }

    pub fn whitelist(&self) -> &DomainWhitelist {
        &self.whitelist
    }

    pub fn policy(&self) -> &ObfuscationPolicy {
        self.obfuscator.policy()
    }

    /// Write the protected form of `src` to `dst`; `src` is never modified
    pub fn transform_file(&self, src: &Path, dst: &Path) -> Result<FileOutcome, TransformError> {
        match classify(src) {
            FileKind::Script { module } => self.transform_script(src, dst, module),
            FileKind::Asset => {
                let bytes = fs::copy(src, dst).map_err(|source| TransformError::Copy {
                    path: src.to_path_buf(),
                    source,
                })?;
                tracing::trace!(path = %src.display(), bytes, "copied");
                Ok(FileOutcome {
                    kind: FileKind::Asset,
                    bytes_in: bytes,
                    bytes_out: bytes,
                    transforms: 0,
                })
            }
        }
    }

    fn transform_script(
        &self,
        src: &Path,
        dst: &Path,
        module: bool,
    ) -> Result<FileOutcome, TransformError> {
        let raw = fs::read(src).map_err(|source| TransformError::Read {
            path: src.to_path_buf(),
            source,
        })?;
        let bytes_in = raw.len() as u64;
        let text = String::from_utf8(raw).map_err(|_| TransformError::NotUtf8 {
            path: src.to_path_buf(),
        })?;

        let (code, transforms) = self
            .protect(&text, module)
            .map_err(|source| TransformError::Obfuscate {
                path: src.to_path_buf(),
                source,
            })?;
        if guard::strip_guard(&text, &self.whitelist).is_some() {
            tracing::warn!(
                path = %src.display(),
                "file already carries the guard, protecting it again"
            );
        }

        fs::write(dst, &code).map_err(|source| TransformError::Write {
            path: dst.to_path_buf(),
            source,
        })?;
        tracing::debug!(path = %src.display(), transforms, "protected");

        Ok(FileOutcome {
            kind: FileKind::Script { module },
            bytes_in,
            bytes_out: code.len() as u64,
            transforms,
        })
    }

    /// Inject the guard into `text` and obfuscate the result
    pub fn protect(&self, text: &str, module: bool) -> Result<(String, usize), ObfuscateError> {
        let (hashbang, body) = split_hashbang(text);
        let injected = guard::inject(body, &self.whitelist);
        let source_type = if module {
            SourceType::Module
        } else {
            SourceType::Script
        };
        let result = self.obfuscator.obfuscate_as(&injected, source_type)?;
        let transforms = result.total_transforms();
        let separator = if hashbang.is_empty() || hashbang.ends_with('\n') {
            ""
        } else {
            "\n"
        };
        Ok((format!("{hashbang}{separator}{}", result.code), transforms))
    }
}

/// Split off a leading `#!` line, which must stay first in the file
fn split_hashbang(text: &str) -> (&str, &str) {
    if !text.starts_with("#!") {
        return ("", text);
    }
    match text.find('\n') {
        Some(end) => text.split_at(end + 1),
        None => (text, ""),
    }
}
