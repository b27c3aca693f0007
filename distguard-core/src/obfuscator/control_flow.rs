//! Control-flow flattening and dead-code injection
//!
//! Both passes work on function bodies. A flattened body has its top-level
//! statements moved into the cases of a `switch` inside an endless loop, with a
//! shuffled dispatch string deciding the order. Dead code is an `if` block whose
//! condition compares two different string literals, so it never runs.

use std::collections::HashMap;

use rand::seq::SliceRandom;
use rand::Rng;

use super::lexer::{LexError, TemplatePart, Token, TokenKind};
use super::names::NameGenerator;
use super::prelude::{from_template, random_word, Slot};
use super::structure::Analysis;
use crate::policy::ObfuscationPolicy;

/// Smallest body worth flattening
const MIN_STATEMENTS: usize = 3;

/// Keywords that make a statement unsafe to move into a `switch` case
const FLATTEN_BLOCKERS: &[&str] = &[
    "let", "const", "if", "else", "for", "while", "do", "switch", "try", "catch", "finally",
    "with", "break", "continue", "import", "export", "case", "default",
];

/// Declarations that are hoisted, and therefore blockers, only at statement start
const DECLARATION_KEYWORDS: &[&str] = &["function", "class"];

const DEAD_CODE_TEMPLATES: &[&str] = &[
    r#"if ($S1 === $S2) { var $A = []; for (var $B = 0; $B < $N; $B++) { $A.push($B * $N); } }"#,
    r#"if ($S1 !== $S1) { var $A = function ($B) { return $B + $S2; }; $A($S1); }"#,
    r#"if ($S1 === $S2) { var $A = $S1.split("").reverse().join(""); $A = $A + $S2; }"#,
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ControlFlowStats {
    pub bodies_flattened: usize,
    pub dead_blocks_injected: usize,
}

/// Flatten and pad function bodies according to `policy`
pub fn apply<R: Rng>(
    tokens: &[Token],
    analysis: &Analysis,
    policy: &ObfuscationPolicy,
    rng: &mut R,
    names: &mut NameGenerator,
) -> Result<(Vec<Token>, ControlFlowStats), LexError> {
    if !policy.control_flow_flattening && !policy.dead_code_injection {
        return Ok((tokens.to_vec(), ControlFlowStats::default()));
    }
    let mut rewriter = Rewriter {
        tokens,
        bodies: analysis.function_bodies().into_iter().collect(),
        policy,
        rng,
        names,
        stats: ControlFlowStats::default(),
    };
    let out = rewriter.rewrite(0, tokens.len())?;
    Ok((out, rewriter.stats))
}

struct Rewriter<'a, R> {
    tokens: &'a [Token],
    bodies: HashMap<usize, usize>,
    policy: &'a ObfuscationPolicy,
    rng: &'a mut R,
    names: &'a mut NameGenerator,
    stats: ControlFlowStats,
}

impl<R: Rng> Rewriter<'_, R> {
    fn rewrite(&mut self, lo: usize, hi: usize) -> Result<Vec<Token>, LexError> {
        let mut out = Vec::with_capacity(hi - lo);
        let mut i = lo;
        while i < hi {
            match self.bodies.get(&i).copied() {
                Some(close) => {
                    out.push(self.tokens[i].clone());
                    let inner = self.rewrite(i + 1, close)?;
                    out.extend(self.transform_body(inner)?);
                    out.push(self.tokens[close].clone());
                    i = close + 1;
                }
                None => {
                    out.push(self.tokens[i].clone());
                    i += 1;
                }
            }
        }
        Ok(out)
    }

    fn transform_body(&mut self, mut body: Vec<Token>) -> Result<Vec<Token>, LexError> {
        if body.first().is_some_and(|t| t.kind == TokenKind::Str) {
            return Ok(body);
        }
        if self.policy.control_flow_flattening
            && self
                .rng
                .gen_bool(self.policy.control_flow_flattening_threshold)
        {
            if let Some(statements) = split_statements(&body) {
                body = self.flatten(statements);
                self.stats.bodies_flattened += 1;
            }
        }
        if self.policy.dead_code_injection
            && !body.is_empty()
            && self.rng.gen_bool(self.policy.dead_code_injection_threshold)
        {
            let mut padded = self.dead_block()?;
            padded.extend(body);
            body = padded;
            self.stats.dead_blocks_injected += 1;
        }
        Ok(body)
    }

    fn flatten(&mut self, statements: Vec<Vec<Token>>) -> Vec<Token> {
        let mut keys: Vec<usize> = (0..statements.len()).collect();
        keys.shuffle(&mut *self.rng);

        let order = self.names.next_name(&mut *self.rng);
        let index = self.names.next_name(&mut *self.rng);
        let dispatch = keys
            .iter()
            .map(|k| k.to_string())
            .collect::<Vec<_>>()
            .join("|");

        let mut cases: Vec<(usize, Vec<Token>)> = keys.into_iter().zip(statements).collect();
        cases.sort_by_key(|(key, _)| *key);

        let mut out = vec![
            Token::new(TokenKind::Keyword, "var"),
            Token::ident(order.clone()),
            Token::punct("="),
            Token::new(TokenKind::Str, format!("\"{dispatch}\"")),
            Token::punct("."),
            Token::ident("split"),
            Token::punct("("),
            Token::new(TokenKind::Str, "\"|\""),
            Token::punct(")"),
            Token::punct(","),
            Token::ident(index.clone()),
            Token::punct("="),
            Token::new(TokenKind::Number, "0"),
            Token::punct(";"),
            Token::new(TokenKind::Keyword, "while"),
            Token::punct("("),
            Token::punct("!"),
            Token::punct("!"),
            Token::punct("["),
            Token::punct("]"),
            Token::punct(")"),
            Token::punct("{"),
            Token::new(TokenKind::Keyword, "switch"),
            Token::punct("("),
            Token::ident(order),
            Token::punct("["),
            Token::ident(index),
            Token::punct("++"),
            Token::punct("]"),
            Token::punct(")"),
            Token::punct("{"),
        ];
        for (key, statement) in cases {
            out.push(Token::new(TokenKind::Keyword, "case"));
            out.push(Token::new(TokenKind::Str, format!("\"{key}\"")));
            out.push(Token::punct(":"));
            out.extend(statement);
            out.push(Token::new(TokenKind::Keyword, "continue"));
            out.push(Token::punct(";"));
        }
        out.extend([
            Token::punct("}"),
            Token::new(TokenKind::Keyword, "break"),
            Token::punct(";"),
            Token::punct("}"),
        ]);
        out
    }

    fn dead_block(&mut self) -> Result<Vec<Token>, LexError> {
        let template = DEAD_CODE_TEMPLATES
            .choose(&mut *self.rng)
            .copied()
            .unwrap_or(DEAD_CODE_TEMPLATES[0]);
        let first = random_word(&mut *self.rng, 5);
        let mut second = random_word(&mut *self.rng, 5);
        while second == first {
            second = random_word(&mut *self.rng, 5);
        }
        let count = self.rng.gen_range(2..10u32);
        from_template(
            template,
            &[
                ("$S1", Slot::Str(first)),
                ("$S2", Slot::Str(second)),
                ("$N", Slot::Number(count.to_string())),
                ("$A", Slot::Ident(self.names.next_name(&mut *self.rng))),
                ("$B", Slot::Ident(self.names.next_name(&mut *self.rng))),
            ],
        )
    }
}

/// Split a body into top-level statements, or `None` if it cannot be flattened
fn split_statements(body: &[Token]) -> Option<Vec<Vec<Token>>> {
    let mut statements = Vec::new();
    let mut current = Vec::new();
    let mut depth = 0usize;
    let mut ternary = 0usize;
    for token in body {
        match token.kind {
            TokenKind::Punct => match token.text.as_str() {
                "(" | "[" | "{" => depth += 1,
                ")" | "]" | "}" => depth = depth.checked_sub(1)?,
                "?" if depth == 0 => ternary += 1,
                ":" if depth == 0 => ternary = ternary.checked_sub(1)?,
                _ => {}
            },
            TokenKind::Template(TemplatePart::Head) => depth += 1,
            TokenKind::Template(TemplatePart::Tail) => depth = depth.checked_sub(1)?,
            TokenKind::Keyword if depth == 0 && FLATTEN_BLOCKERS.contains(&token.text.as_str()) => {
                return None
            }
            TokenKind::Keyword
                if depth == 0
                    && DECLARATION_KEYWORDS.contains(&token.text.as_str())
                    && current.iter().all(|t: &Token| t.is_ident("async")) =>
            {
                return None
            }
            _ => {}
        }
        current.push(token.clone());
        if depth == 0 && token.is_punct(";") {
            statements.push(std::mem::take(&mut current));
            ternary = 0;
        }
    }
    if !current.is_empty() || depth != 0 || statements.len() < MIN_STATEMENTS {
        return None;
    }
    Some(statements)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::obfuscator::emit::emit;
    use crate::obfuscator::lexer::tokenize;
    use crate::obfuscator::structure::analyze;
    use crate::policy::NameStyle;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn run(source: &str, policy: &ObfuscationPolicy) -> (String, ControlFlowStats) {
        let tokens = tokenize(source).unwrap();
        let analysis = analyze(&tokens).unwrap();
        let mut rng = StdRng::seed_from_u64(42);
        let mut names = NameGenerator::with_tokens(NameStyle::Mangled, &tokens);
        let (out, stats) = apply(&tokens, &analysis, policy, &mut rng, &mut names).unwrap();
        (emit(&out, true), stats)
    }

    fn flatten_only() -> ObfuscationPolicy {
        ObfuscationPolicy {
            control_flow_flattening: true,
            control_flow_flattening_threshold: 1.0,
            ..ObfuscationPolicy::disabled()
        }
    }

    #[test]
    fn test_flattens_simple_body() {
        let (out, stats) = run("function f() { a(); b(); return c(); }", &flatten_only());
        assert_eq!(stats.bodies_flattened, 1);
        assert!(out.contains("while(!![]){switch("));
        for statement in ["a();", "b();", "return c();"] {
            assert!(out.contains(statement), "{statement} missing from {out}");
        }
        assert!(out.contains(".split(\"|\")"));
        tokenize(&out).unwrap();
    }

    #[test]
    fn test_dispatch_order_matches_statements() {
        let (out, _) = run("function f() { one(); two(); three(); }", &flatten_only());
        let start = out.find("var ").unwrap();
        let dispatch_start = out[start..].find('"').unwrap() + start + 1;
        let dispatch_end = out[dispatch_start..].find('"').unwrap() + dispatch_start;
        let keys: Vec<&str> = out[dispatch_start..dispatch_end].split('|').collect();
        assert_eq!(keys.len(), 3);
        // the statement under each key, in dispatch order, replays the original order
        let replay: Vec<&str> = keys
            .iter()
            .map(|key| {
                let case = format!("case\"{key}\":");
                let at = out.find(&case).unwrap() + case.len();
                let rest = &out[at..];
                &rest[..rest.find('(').unwrap()]
            })
            .collect();
        assert_eq!(replay, vec!["one", "two", "three"]);
    }

    #[test]
    fn test_skips_unsafe_bodies() {
        let policy = flatten_only();
        for source in [
            "function f() { let a = 1; b(); c(); }",
            "function f() { if (x) y(); b(); c(); }",
            "function f() { a(); b(); }",
            "function f() { 'use strict'; a(); b(); c(); }",
            "function f() { a(); b(); c() }",
            "function f() { l: a(); b(); c(); }",
            "function f() { function g() {} b(); c(); }",
        ] {
            let (_, stats) = run(source, &policy);
            assert_eq!(stats.bodies_flattened, 0, "{source}");
        }
    }

    #[test]
    fn test_ternaries_do_not_block_flattening() {
        let (_, stats) = run("function f() { x = a ? b : c; y(); z(); }", &flatten_only());
        assert_eq!(stats.bodies_flattened, 1);
    }

    #[test]
    fn test_nested_bodies() {
        let source = "function outer() { a(); b(); var g = function () { c(); d(); e(); }; }";
        let (out, stats) = run(source, &flatten_only());
        assert_eq!(stats.bodies_flattened, 2);
        tokenize(&out).unwrap();
    }

    #[test]
    fn test_dead_code_injection() {
        let policy = ObfuscationPolicy {
            dead_code_injection: true,
            dead_code_injection_threshold: 1.0,
            ..ObfuscationPolicy::disabled()
        };
        let (out, stats) = run("function f() { return 1; }", &policy);
        assert_eq!(stats.dead_blocks_injected, 1);
        assert!(out.starts_with("function f(){if(\""));
        assert!(out.ends_with("return 1;}"));
        tokenize(&out).unwrap();
    }

    #[test]
    fn test_top_level_is_untouched() {
        let (out, stats) = run("a(); b(); c();", &flatten_only());
        assert_eq!(stats, ControlFlowStats::default());
        assert_eq!(out, "a();b();c();");
    }
}
