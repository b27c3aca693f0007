//! Obfuscation policy
//!
//! The set of transform toggles and thresholds applied to every script in a
//! build. Loaded from the `[obfuscation]` table of `distguard.toml`; the option
//! names of the JavaScript build tooling (`controlFlowFlattening`, ...) are
//! accepted as aliases so existing option blocks can be pasted in unchanged.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PolicyError {
    #[error("{field} must be a number between 0 and 1, got {value}")]
    ThresholdOutOfRange { field: &'static str, value: f64 },

    #[error("selfDefending requires compact output")]
    SelfDefendingNeedsCompact,
}

/// How renamed identifiers are spelled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NameStyle {
    /// `_0x3fa1c2`
    #[default]
    Hexadecimal,
    /// `a`, `b`, ..., `aa`
    Mangled,
}

/// Encoding applied to a string array entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StringEncoding {
    None,
    Base64,
}

/// Obfuscation settings for one build
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct ObfuscationPolicy {
    /// Emit minimal whitespace
    pub compact: bool,
    #[serde(alias = "controlFlowFlattening")]
    pub control_flow_flattening: bool,
    /// Probability that an eligible function body is flattened
    #[serde(alias = "controlFlowFlatteningThreshold")]
    pub control_flow_flattening_threshold: f64,
    #[serde(alias = "deadCodeInjection")]
    pub dead_code_injection: bool,
    /// Probability that a function body receives a dead block
    #[serde(alias = "deadCodeInjectionThreshold")]
    pub dead_code_injection_threshold: f64,
    /// Break into the debugger loop when devtools are open
    #[serde(alias = "debugProtection")]
    pub debug_protection: bool,
    /// Repeat the debugger trap every few seconds
    #[serde(alias = "debugProtectionInterval")]
    pub debug_protection_interval: bool,
    #[serde(alias = "disableConsoleOutput")]
    pub disable_console_output: bool,
    #[serde(alias = "identifierNamesGenerator")]
    pub identifier_names_generator: NameStyle,
    /// Rename bindings declared at the top level of classic scripts
    #[serde(alias = "renameGlobals")]
    pub rename_globals: bool,
    #[serde(alias = "rotateStringArray")]
    pub rotate_string_array: bool,
    /// Stop working if the emitted code is reformatted
    #[serde(alias = "selfDefending")]
    pub self_defending: bool,
    /// Move string literals into a shared lookup array
    #[serde(alias = "stringArray")]
    pub string_array: bool,
    #[serde(alias = "stringArrayEncoding")]
    pub string_array_encoding: Vec<StringEncoding>,
    /// Probability that a string literal is moved into the array
    #[serde(alias = "stringArrayThreshold")]
    pub string_array_threshold: f64,
    #[serde(alias = "transformObjectKeys")]
    pub transform_object_keys: bool,
    /// Write every string character as a `\xNN`/`\uNNNN` escape
    #[serde(alias = "unicodeEscapeSequence")]
    pub unicode_escape_sequence: bool,
    /// RNG seed. 0 derives a seed from each file's content.
    pub seed: u64,
}

impl Default for ObfuscationPolicy {
    fn default() -> Self {
        Self {
            compact: true,
            control_flow_flattening: true,
            control_flow_flattening_threshold: 0.75,
            dead_code_injection: true,
            dead_code_injection_threshold: 0.4,
            debug_protection: true,
            debug_protection_interval: true,
            disable_console_output: true,
            identifier_names_generator: NameStyle::Hexadecimal,
            rename_globals: true,
            rotate_string_array: true,
            self_defending: true,
            string_array: true,
            string_array_encoding: vec![StringEncoding::Base64],
            string_array_threshold: 0.75,
            transform_object_keys: true,
            unicode_escape_sequence: false,
            seed: 0,
        }
    }
}

impl ObfuscationPolicy {
    /// A policy with every transform switched off. Scripts still receive the guard.
    pub fn disabled() -> Self {
        Self {
            compact: false,
            control_flow_flattening: false,
            control_flow_flattening_threshold: 0.0,
            dead_code_injection: false,
            dead_code_injection_threshold: 0.0,
            debug_protection: false,
            debug_protection_interval: false,
            disable_console_output: false,
            identifier_names_generator: NameStyle::Hexadecimal,
            rename_globals: false,
            rotate_string_array: false,
            self_defending: false,
            string_array: false,
            string_array_encoding: Vec::new(),
            string_array_threshold: 0.0,
            transform_object_keys: false,
            unicode_escape_sequence: false,
            seed: 0,
        }
    }

    pub fn validate(&self) -> Result<(), PolicyError> {
        let thresholds = [
            (
                "controlFlowFlatteningThreshold",
                self.control_flow_flattening_threshold,
            ),
            (
                "deadCodeInjectionThreshold",
                self.dead_code_injection_threshold,
            ),
            ("stringArrayThreshold", self.string_array_threshold),
        ];
        for (field, value) in thresholds {
            if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                return Err(PolicyError::ThresholdOutOfRange { field, value });
            }
        }
        if self.self_defending && !self.compact {
            return Err(PolicyError::SelfDefendingNeedsCompact);
        }
        Ok(())
    }

    /// True when running the obfuscator would only re-print the tokens
    pub fn is_passthrough(&self) -> bool {
        !(self.compact
            || self.control_flow_flattening
            || self.dead_code_injection
            || self.debug_protection
            || self.disable_console_output
            || self.rename_globals
            || self.self_defending
            || self.string_array
            || self.transform_object_keys
            || self.unicode_escape_sequence)
    }

    /// Encodings the string array may pick from, defaulting to none
    pub fn encodings(&self) -> Vec<StringEncoding> {
        if self.string_array_encoding.is_empty() {
            vec![StringEncoding::None]
        } else {
            let mut encodings = self.string_array_encoding.clone();
            encodings.dedup();
            encodings
        }
    }
}
