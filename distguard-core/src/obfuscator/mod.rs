//! JavaScript obfuscator
//!
//! Token-level transforms driven by an [`ObfuscationPolicy`]:
//! - Control-flow flattening of function bodies into a `switch` dispatcher
//! - Dead-code blocks behind opaque predicates
//! - Renaming of declared identifiers
//! - Computed object keys and bracketed member access
//! - String array extraction with base64 encoding and rotation
//! - A prelude with self-defending, debugger and console traps
//!
//! The same source and policy always produce the same output. With a policy
//! seed of 0 the random stream is seeded from a SHA-256 digest of the input.

pub mod control_flow;
pub mod emit;
pub mod lexer;
pub mod literals;
pub mod names;
pub mod prelude;
pub mod rename;
pub mod strings;
pub mod structure;

use rand::rngs::StdRng;
use rand::SeedableRng;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::policy::{ObfuscationPolicy, PolicyError};
use lexer::{tokenize, LexError, Token, TokenKind};
use names::NameGenerator;
use structure::{analyze, Role, StructureError};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ObfuscateError {
    #[error("tokenize failed: {0}")]
    Lex(#[from] LexError),

    #[error("unsupported structure: {0}")]
    Structure(#[from] StructureError),
}

/// How the file will be loaded, which decides whether top-level names are global
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceType {
    #[default]
    Script,
    Module,
}

/// Result of obfuscation with statistics
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ObfuscationResult {
    /// The obfuscated source code
    pub code: String,
    pub strings_extracted: usize,
    pub identifiers_renamed: usize,
    pub bodies_flattened: usize,
    pub dead_blocks_injected: usize,
    pub keys_transformed: usize,
}

impl ObfuscationResult {
    pub fn total_transforms(&self) -> usize {
        self.strings_extracted
            + self.identifiers_renamed
            + self.bodies_flattened
            + self.dead_blocks_injected
            + self.keys_transformed
    }
}

/// Obfuscator instance with a validated policy
#[derive(Debug, Clone)]
pub struct Obfuscator {
    policy: ObfuscationPolicy,
}

impl Obfuscator {
    pub fn new(policy: ObfuscationPolicy) -> Result<Self, PolicyError> {
        policy.validate()?;
        Ok(Self { policy })
    }

    pub fn policy(&self) -> &ObfuscationPolicy {
        &self.policy
    }

    /// Obfuscate a classic script
    pub fn obfuscate(&self, source: &str) -> Result<ObfuscationResult, ObfuscateError> {
        self.obfuscate_as(source, SourceType::Script)
    }

    pub fn obfuscate_as(
        &self,
        source: &str,
        source_type: SourceType,
    ) -> Result<ObfuscationResult, ObfuscateError> {
        let policy = &self.policy;
        if policy.is_passthrough() {
            return Ok(ObfuscationResult {
                code: source.to_string(),
                ..Default::default()
            });
        }

        let mut rng = StdRng::seed_from_u64(self.seed_for(source));
        let tokens = tokenize(source)?;
        let mut names = NameGenerator::with_tokens(policy.identifier_names_generator, &tokens);

        // 1. Flattening and dead code
        let analysis = analyze(&tokens)?;
        let (tokens, flow) = control_flow::apply(&tokens, &analysis, policy, &mut rng, &mut names)?;

        // 2. Renaming
        let analysis = analyze(&tokens)?;
        let (tokens, identifiers_renamed) =
            rename::apply(&tokens, &analysis, source_type, policy, &mut rng, &mut names);

        // 3. Keys, members and strings
        let analysis = analyze(&tokens)?;
        let directives = directive_prologue(&tokens, &analysis.roles);
        let (mut tokens, strings, literals) =
            literals::apply(&tokens, &analysis, policy, &mut rng, &mut names);

        // 4. Prelude after any directive prologue
        let prelude = prelude::build(&strings, policy, &mut rng, &mut names)?;
        tokens.splice(directives..directives, prelude);

        let code = emit::emit(&tokens, policy.compact);
        tracing::trace!(
            bytes_in = source.len(),
            bytes_out = code.len(),
            strings = literals.strings_extracted,
            renamed = identifiers_renamed,
            "obfuscated"
        );

        Ok(ObfuscationResult {
            code,
            strings_extracted: literals.strings_extracted,
            identifiers_renamed,
            bodies_flattened: flow.bodies_flattened,
            dead_blocks_injected: flow.dead_blocks_injected,
            keys_transformed: literals.keys_transformed,
        })
    }

    fn seed_for(&self, source: &str) -> u64 {
        if self.policy.seed != 0 {
            return self.policy.seed;
        }
        let digest = Sha256::digest(source.as_bytes());
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&digest[..8]);
        u64::from_le_bytes(bytes)
    }
}

/// Number of leading tokens that form `"use strict";`-style directives
fn directive_prologue(tokens: &[Token], roles: &[Role]) -> usize {
    let mut end = 0;
    while end < tokens.len()
        && tokens[end].kind == TokenKind::Str
        && roles[end] == Role::LockedStr
    {
        end += 1;
        if tokens.get(end).is_some_and(|t| t.is_punct(";")) {
            end += 1;
        }
    }
    end
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guard::{inject, GUARD_LOCALS};
    use crate::whitelist::DomainWhitelist;

    const APP: &str = r#"
function greet(person) {
  var greeting = "Hello, " + person.name;
  var punctuation = "!";
  var message = greeting + punctuation;
  console.log(message);
  return message;
}
var settings = { title: "demo", retries: 3 };
greet({ name: settings.title });
"#;

    #[test]
    fn test_default_policy_output_relexes() {
        let obfuscator = Obfuscator::new(ObfuscationPolicy::default()).unwrap();
        let result = obfuscator.obfuscate(APP).unwrap();
        assert!(!result.code.is_empty());
        assert_ne!(result.code, APP);
        tokenize(&result.code).unwrap();
        analyze(&tokenize(&result.code).unwrap()).unwrap();
        assert!(result.total_transforms() > 0);
        assert!(result.identifiers_renamed >= 5);
    }

    #[test]
    fn test_output_is_reproducible() {
        let obfuscator = Obfuscator::new(ObfuscationPolicy::default()).unwrap();
        let first = obfuscator.obfuscate(APP).unwrap();
        let second = obfuscator.obfuscate(APP).unwrap();
        assert_eq!(first, second);

        let seeded = Obfuscator::new(ObfuscationPolicy {
            seed: 42,
            ..ObfuscationPolicy::default()
        })
        .unwrap();
        assert_ne!(seeded.obfuscate(APP).unwrap().code, first.code);
    }

    #[test]
    fn test_guard_locals_do_not_survive() {
        let obfuscator = Obfuscator::new(ObfuscationPolicy::default()).unwrap();
        let protected = inject("console.log(1)", &DomainWhitelist::default());
        let result = obfuscator.obfuscate(&protected).unwrap();
        for local in GUARD_LOCALS {
            assert!(!result.code.contains(local), "{local} survived");
        }
    }

    #[test]
    fn test_regex_after_statements_is_untouched() {
        let source =
            "var s = 'x';\nfunction validateInput(){}\n/word/.test(s);\nif (s) /other/i.test(s);";
        let obfuscator = Obfuscator::new(ObfuscationPolicy::default()).unwrap();
        let result = obfuscator.obfuscate(source).unwrap();
        assert!(result.code.contains("/word/"), "{}", result.code);
        assert!(result.code.contains("/other/i"), "{}", result.code);
        assert!(!result.code.contains("validateInput"));
    }

    #[test]
    fn test_passthrough_returns_source() {
        let mut policy = ObfuscationPolicy::disabled();
        policy.compact = false;
        let obfuscator = Obfuscator::new(policy).unwrap();
        let result = obfuscator.obfuscate("var  keep = 1; // comment").unwrap();
        assert_eq!(result.code, "var  keep = 1; // comment");
        assert_eq!(result.total_transforms(), 0);
    }

    #[test]
    fn test_compact_only() {
        let policy = ObfuscationPolicy {
            compact: true,
            ..ObfuscationPolicy::disabled()
        };
        let obfuscator = Obfuscator::new(policy).unwrap();
        let result = obfuscator.obfuscate("var keep = 1; // comment\nfoo(keep)").unwrap();
        assert_eq!(result.code, "var keep=1;foo(keep)");
    }

    #[test]
    fn test_directive_stays_first() {
        let obfuscator = Obfuscator::new(ObfuscationPolicy {
            string_array_threshold: 1.0,
            ..ObfuscationPolicy::default()
        })
        .unwrap();
        let result = obfuscator
            .obfuscate("'use strict';\nvar a = 'x' + 'y'; window.out = a;")
            .unwrap();
        assert!(result.code.starts_with("'use strict';"), "{}", result.code);
        assert!(result.strings_extracted >= 2);
    }

    #[test]
    fn test_module_imports_untouched() {
        let obfuscator = Obfuscator::new(ObfuscationPolicy::default()).unwrap();
        let result = obfuscator
            .obfuscate_as(
                "import { render } from \"./view.js\";\nexport function mount(root) { render(root); }",
                SourceType::Module,
            )
            .unwrap();
        assert!(result.code.contains("import{render}from\"./view.js\""), "{}", result.code);
        assert!(result.code.contains("export function mount("), "{}", result.code);
    }

    #[test]
    fn test_invalid_policy_rejected() {
        let policy = ObfuscationPolicy {
            string_array_threshold: 2.0,
            ..ObfuscationPolicy::default()
        };
        assert!(Obfuscator::new(policy).is_err());
    }

    #[test]
    fn test_lex_error_reported() {
        let obfuscator = Obfuscator::new(ObfuscationPolicy::default()).unwrap();
        let err = obfuscator.obfuscate("var s = 'open").unwrap_err();
        assert!(matches!(err, ObfuscateError::Lex(_)));
    }
}
