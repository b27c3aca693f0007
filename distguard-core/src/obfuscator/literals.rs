//! String literal extraction and property access rewriting
//!
//! `a.b` becomes `a["b"]`, identifier object keys become computed keys, and
//! string literals are moved into a shared array read back through an accessor
//! function. The array itself is emitted by the prelude.

use std::collections::HashMap;

use rand::seq::SliceRandom;
use rand::Rng;

use super::lexer::{Token, TokenKind};
use super::names::NameGenerator;
use super::strings::{base64_encode, decode_literal, encode_literal, requote, to_utf8};
use super::structure::{Analysis, Role};
use crate::policy::{ObfuscationPolicy, StringEncoding};

/// Strings collected from one file
#[derive(Debug, Clone)]
pub struct StringArray {
    name: String,
    offset: usize,
    /// Stored literal text, in index order
    entries: Vec<String>,
    index: HashMap<(String, StringEncoding), usize>,
    accessors: Vec<(StringEncoding, String)>,
}

impl StringArray {
    pub fn new(name: String, offset: usize) -> Self {
        Self {
            name,
            offset,
            entries: Vec::new(),
            index: HashMap::new(),
            accessors: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Added to every index at the call site and subtracted in the accessor
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    /// Accessor function name per encoding, in first-use order
    pub fn accessors(&self) -> &[(StringEncoding, String)] {
        &self.accessors
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn intern(&mut self, value: &str, encoding: StringEncoding, escape_all: bool) -> usize {
        if let Some(&i) = self.index.get(&(value.to_string(), encoding)) {
            return i;
        }
        let stored = match encoding {
            StringEncoding::None => value.to_string(),
            StringEncoding::Base64 => base64_encode(value.as_bytes()),
        };
        let literal = encode_literal(&stored.encode_utf16().collect::<Vec<_>>(), escape_all);
        let i = self.entries.len();
        self.entries.push(literal);
        self.index.insert((value.to_string(), encoding), i);
        i
    }

    fn accessor<R: Rng>(
        &mut self,
        encoding: StringEncoding,
        rng: &mut R,
        names: &mut NameGenerator,
    ) -> String {
        if let Some((_, name)) = self.accessors.iter().find(|(e, _)| *e == encoding) {
            return name.clone();
        }
        let name = names.next_name(rng);
        self.accessors.push((encoding, name.clone()));
        name
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LiteralStats {
    pub strings_extracted: usize,
    pub keys_transformed: usize,
}

/// Rewrite property accesses, object keys and string literals
pub fn apply<R: Rng>(
    tokens: &[Token],
    analysis: &Analysis,
    policy: &ObfuscationPolicy,
    rng: &mut R,
    names: &mut NameGenerator,
) -> (Vec<Token>, StringArray, LiteralStats) {
    let (name, offset) = if policy.string_array {
        (names.next_name(rng), rng.gen_range(0x100..0x400usize))
    } else {
        (String::new(), 0)
    };
    let mut pass = LiteralPass {
        policy,
        encodings: policy.encodings(),
        rng,
        names,
        strings: StringArray::new(name, offset),
        stats: LiteralStats::default(),
        out: Vec::with_capacity(tokens.len()),
    };

    for (i, token) in tokens.iter().enumerate() {
        match analysis.roles[i] {
            Role::Property
                if policy.string_array
                    && is_plain_name(token)
                    && !is_meta_property(tokens, i) =>
            {
                // `a.b` loses its dot, `a?.b` keeps `?.` before the bracket
                let newline_before = match pass.out.last() {
                    Some(dot) if dot.is_punct(".") => {
                        let newline = dot.newline_before;
                        pass.out.pop();
                        newline
                    }
                    _ => false,
                };
                pass.computed(&token.text, newline_before);
            }
            Role::Key
                if policy.transform_object_keys
                    && is_plain_name(token)
                    && token.text != "__proto__" =>
            {
                pass.computed(&token.text, token.newline_before);
                pass.stats.keys_transformed += 1;
            }
            Role::LockedStr => pass.out.push(token.clone()),
            role if token.kind == TokenKind::Str => {
                pass.string(token, role == Role::KeyStr);
            }
            _ => pass.out.push(token.clone()),
        }
    }

    (pass.out, pass.strings, pass.stats)
}

/// Identifier without escapes, so its text is its value
fn is_plain_name(token: &Token) -> bool {
    matches!(token.kind, TokenKind::Ident | TokenKind::Keyword) && !token.text.contains('\\')
}

/// `import.meta` and `new.target`
fn is_meta_property(tokens: &[Token], i: usize) -> bool {
    i >= 2
        && tokens[i - 1].is_punct(".")
        && (tokens[i - 2].is_keyword("import") || tokens[i - 2].is_keyword("new"))
}

struct LiteralPass<'a, R: Rng> {
    policy: &'a ObfuscationPolicy,
    encodings: Vec<StringEncoding>,
    rng: &'a mut R,
    names: &'a mut NameGenerator,
    strings: StringArray,
    stats: LiteralStats,
    out: Vec<Token>,
}

impl<R: Rng> LiteralPass<'_, R> {
    /// `[ "name" ]`, with the string itself going through extraction
    fn computed(&mut self, name: &str, newline_before: bool) {
        let mut open = Token::punct("[");
        open.newline_before = newline_before;
        self.out.push(open);
        let literal = Token::new(
            TokenKind::Str,
            encode_literal(&name.encode_utf16().collect::<Vec<_>>(), false),
        );
        self.string(&literal, false);
        self.out.push(Token::punct("]"));
    }

    fn string(&mut self, token: &Token, key: bool) {
        if self.policy.string_array && self.rng.gen_bool(self.policy.string_array_threshold) {
            if let Some(value) = decode_literal(&token.text).and_then(|units| to_utf8(&units)) {
                let encoding = self
                    .encodings
                    .choose(&mut *self.rng)
                    .copied()
                    .unwrap_or(StringEncoding::None);
                let escape = self.policy.unicode_escape_sequence;
                let index = self.strings.intern(&value, encoding, escape);
                let accessor = self.strings.accessor(encoding, &mut *self.rng, &mut *self.names);

                let mut first = Token::punct("[");
                first.newline_before = token.newline_before;
                if key {
                    self.out.push(first);
                    self.out.push(Token::ident(accessor));
                } else {
                    let mut call = Token::ident(accessor);
                    call.newline_before = token.newline_before;
                    self.out.push(call);
                }
                self.out.push(Token::punct("("));
                self.out.push(Token::new(
                    TokenKind::Number,
                    format!("0x{:x}", index + self.strings.offset),
                ));
                self.out.push(Token::punct(")"));
                if key {
                    self.out.push(Token::punct("]"));
                }
                self.stats.strings_extracted += 1;
                return;
            }
        }

        if self.policy.unicode_escape_sequence {
            let mut escaped = Token::new(TokenKind::Str, requote(&token.text, true));
            escaped.newline_before = token.newline_before;
            self.out.push(escaped);
        } else {
            self.out.push(token.clone());
        }
    }
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

    fn run(source: &str, policy: &ObfuscationPolicy) -> (String, StringArray, LiteralStats) {
        let tokens = tokenize(source).unwrap();
        let analysis = analyze(&tokens).unwrap();
        let mut rng = StdRng::seed_from_u64(11);
        let mut names = NameGenerator::with_tokens(NameStyle::Mangled, &tokens);
        let (out, strings, stats) = apply(&tokens, &analysis, policy, &mut rng, &mut names);
        (emit(&out, true), strings, stats)
    }

    fn members_only() -> ObfuscationPolicy {
        ObfuscationPolicy {
            string_array: true,
            string_array_threshold: 0.0,
            ..ObfuscationPolicy::disabled()
        }
    }

    #[test]
    fn test_member_access_becomes_bracketed() {
        let (code, _, _) = run("a.b.c(); x?.y; import.meta.url; new.target;", &members_only());
        assert_eq!(
            code,
            r#"a["b"]["c"]();x?.["y"];import.meta["url"];new.target;"#
        );
    }

    #[test]
    fn test_object_keys_become_computed() {
        let policy = ObfuscationPolicy {
            transform_object_keys: true,
            ..ObfuscationPolicy::disabled()
        };
        let (code, _, stats) = run("var o = { a: 1, __proto__: p, [c]: 2 };", &policy);
        assert_eq!(code, r#"var o={["a"]:1,__proto__:p,[c]:2};"#);
        assert_eq!(stats.keys_transformed, 1);
    }

    #[test]
    fn test_strings_move_into_array() {
        let policy = ObfuscationPolicy {
            string_array: true,
            string_array_threshold: 1.0,
            string_array_encoding: vec![StringEncoding::None],
            ..ObfuscationPolicy::disabled()
        };
        let (code, strings, stats) = run(r#"f("hello", 'hello', "world");"#, &policy);
        assert_eq!(stats.strings_extracted, 3);
        assert_eq!(strings.entries(), &["\"hello\"".to_string(), "\"world\"".to_string()]);
        assert_eq!(strings.accessors().len(), 1);
        assert!(!code.contains("hello"));
        let accessor = &strings.accessors()[0].1;
        let first = format!("{accessor}(0x{:x})", strings.offset());
        assert!(code.contains(&first), "{code}");
    }

    #[test]
    fn test_locked_strings_stay() {
        let policy = ObfuscationPolicy {
            string_array: true,
            string_array_threshold: 1.0,
            ..ObfuscationPolicy::disabled()
        };
        let (code, strings, _) = run(r#""use strict"; import x from "./x.js";"#, &policy);
        assert!(strings.is_empty());
        assert_eq!(code, r#""use strict";import x from"./x.js";"#);
    }

    #[test]
    fn test_string_keys_are_wrapped() {
        let policy = ObfuscationPolicy {
            string_array: true,
            string_array_threshold: 1.0,
            string_array_encoding: vec![StringEncoding::Base64],
            ..ObfuscationPolicy::disabled()
        };
        let (code, strings, _) = run(r#"var o = { "k": 1 };"#, &policy);
        assert_eq!(strings.entries(), &["\"aw==\"".to_string()]);
        assert!(code.starts_with("var o={["), "{code}");
        assert!(code.ends_with(")]:1};"), "{code}");
    }

    #[test]
    fn test_unicode_escape_without_array() {
        let policy = ObfuscationPolicy {
            unicode_escape_sequence: true,
            ..ObfuscationPolicy::disabled()
        };
        let (code, _, stats) = run("s = 'AB';", &policy);
        assert_eq!(code, r#"s="\x41\x42";"#);
        assert_eq!(stats.strings_extracted, 0);
    }
}
