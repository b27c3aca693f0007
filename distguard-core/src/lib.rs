//! DistGuard Core Library
//!
//! This crate provides the core functionality for DistGuard:
//! - Obfuscation policy and domain whitelist
//! - Domain guard injection
//! - JavaScript obfuscation
//! - Per-file transformation and tree walking
//! - The protect pipeline with its atomic directory swap
//! - Project configuration (distguard.toml)

pub mod config;
pub mod guard;
pub mod obfuscator;
pub mod path_utils;
pub mod pipeline;
pub mod policy;
pub mod swap;
pub mod transform;
pub mod walker;
pub mod whitelist;

// Re-export commonly used types
pub use config::{ConfigError, ProtectConfig, CONFIG_FILE};
pub use guard::{guard_snippet, inject, strip_guard};
pub use obfuscator::{ObfuscateError, ObfuscationResult, Obfuscator, SourceType};
pub use pipeline::{Pipeline, PipelineConfig, PipelineError, PipelineReport};
pub use policy::{NameStyle, ObfuscationPolicy, PolicyError, StringEncoding};
pub use swap::SwapStrategy;
pub use transform::{classify, FileKind, FileOutcome, FileTransformer, TransformError};
pub use walker::{FailedFile, TreeWalker, WalkError, WalkOptions, WalkReport};
pub use whitelist::{DomainWhitelist, WhitelistError, DOMAINS_ENV};
