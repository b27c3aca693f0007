//! Identifier renaming
//!
//! Scopes come from the structure analysis: the file itself, every function
//! and catch clause, and every block. Declarations are placed in the innermost
//! scope (`let`, `const`, `class`, parameters) or the nearest function scope
//! (`var`, function declarations). A reference is renamed only when it resolves
//! to a renamed declaration, so free names such as `window` or `console` are
//! never touched.

use std::collections::{HashMap, HashSet};

use rand::Rng;

use super::lexer::Token;
use super::names::NameGenerator;
use super::structure::{Analysis, BindingScope, BraceKind, Role};
use super::SourceType;
use crate::policy::ObfuscationPolicy;

/// Names with meaning beyond their declaration
const KEEP: &[&str] = &[
    "arguments", "eval", "undefined", "NaN", "Infinity", "globalThis", "window", "document",
    "self", "async", "of", "get", "set", "static", "from", "as", "constructor", "prototype",
    "__proto__", "let", "yield", "await",
];

struct Scope {
    end: usize,
    function: bool,
    parent: Option<usize>,
    declared: HashSet<String>,
}

/// Rename declared bindings; returns the new tokens and how many names changed
pub fn apply<R: Rng>(
    tokens: &[Token],
    analysis: &Analysis,
    source_type: SourceType,
    policy: &ObfuscationPolicy,
    rng: &mut R,
    names: &mut NameGenerator,
) -> (Vec<Token>, usize) {
    if analysis.dynamic_scope {
        tracing::debug!("eval or with present, identifiers left as written");
        return (tokens.to_vec(), 0);
    }

    let (mut scopes, innermost) = build_scopes(tokens, analysis);

    let mut module_names = HashSet::new();
    for (i, token) in tokens.iter().enumerate() {
        match analysis.roles[i] {
            Role::Binding(binding) | Role::ShorthandBinding(binding) => {
                let mut target = innermost[i];
                if binding == BindingScope::Function {
                    while !scopes[target].function {
                        match scopes[target].parent {
                            Some(parent) => target = parent,
                            None => break,
                        }
                    }
                }
                scopes[target].declared.insert(token.text.clone());
            }
            Role::Module => {
                module_names.insert(token.text.as_str());
            }
            _ => {}
        }
    }

    let keep_root = source_type == SourceType::Script && !policy.rename_globals;
    let mut renamed: HashMap<(usize, &str), String> = HashMap::new();
    let mut out = Vec::with_capacity(tokens.len());

    for (i, token) in tokens.iter().enumerate() {
        let role = analysis.roles[i];
        let candidate = matches!(
            role,
            Role::Reference | Role::Binding(_) | Role::Shorthand | Role::ShorthandBinding(_)
        );
        let resolved = if candidate {
            resolve(&scopes, innermost[i], &token.text)
        } else {
            None
        };
        let Some(scope) = resolved else {
            out.push(token.clone());
            continue;
        };
        let root = scopes[scope].parent.is_none();
        if KEEP.contains(&token.text.as_str())
            || token.text.contains('\\')
            || (root && (keep_root || module_names.contains(token.text.as_str())))
        {
            out.push(token.clone());
            continue;
        }

        let name = renamed
            .entry((scope, token.text.as_str()))
            .or_insert_with(|| names.next_name(rng))
            .clone();

        let mut replacement = Token::ident(name);
        if matches!(role, Role::Shorthand | Role::ShorthandBinding(_)) {
            // `{ a }` keeps its key: `{ a: b }`
            out.push(token.clone());
            out.push(Token::punct(":"));
        } else {
            replacement.newline_before = token.newline_before;
        }
        out.push(replacement);
    }

    (out, renamed.len())
}

/// Scope table plus the innermost scope of every token
fn build_scopes(tokens: &[Token], analysis: &Analysis) -> (Vec<Scope>, Vec<usize>) {
    let bodies: HashSet<usize> = analysis.sites.iter().filter_map(|site| site.body).collect();

    // (start, end, is function scope)
    let mut ranges: Vec<(usize, usize, bool)> = analysis
        .sites
        .iter()
        .map(|site| (site.start, site.end, site.is_function_scope()))
        .collect();
    for (open, kind) in analysis.braces.iter().enumerate() {
        if *kind == Some(BraceKind::Block) && !bodies.contains(&open) {
            if let Some(close) = analysis.pairs[open] {
                ranges.push((open, close, false));
            }
        }
    }
    ranges.sort_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)));

    let mut scopes = vec![Scope {
        end: tokens.len(),
        function: true,
        parent: None,
        declared: HashSet::new(),
    }];
    let mut innermost = Vec::with_capacity(tokens.len());
    let mut stack = vec![0usize];
    let mut next = 0;

    for i in 0..tokens.len() {
        while stack.len() > 1 && scopes[stack[stack.len() - 1]].end < i {
            stack.pop();
        }
        while next < ranges.len() && ranges[next].0 == i {
            let (_, end, function) = ranges[next];
            let parent = stack[stack.len() - 1];
            scopes.push(Scope {
                end,
                function,
                parent: Some(parent),
                declared: HashSet::new(),
            });
            stack.push(scopes.len() - 1);
            next += 1;
        }
        innermost.push(stack[stack.len() - 1]);
    }
    (scopes, innermost)
}

fn resolve(scopes: &[Scope], from: usize, name: &str) -> Option<usize> {
    let mut current = Some(from);
    while let Some(id) = current {
        if scopes[id].declared.contains(name) {
            return Some(id);
        }
        current = scopes[id].parent;
    }
    None
}
