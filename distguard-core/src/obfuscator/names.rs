//! Fresh identifier generation

use std::collections::HashSet;

use rand::Rng;

use super::lexer::{is_keyword, Token, TokenKind};
use crate::policy::NameStyle;

/// Names that must never be produced even though they are not keywords
const RESERVED: &[&str] = &[
    "arguments", "eval", "undefined", "NaN", "Infinity", "let", "static", "yield", "await",
    "implements", "interface", "package", "private", "protected", "public", "as", "of", "get",
    "set", "from", "async",
];

const MANGLE_ALPHABET: &[u8; 52] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Produces identifiers that do not collide with anything in the file
pub struct NameGenerator {
    style: NameStyle,
    taken: HashSet<String>,
    counter: usize,
}

impl NameGenerator {
    pub fn new(style: NameStyle) -> Self {
        Self {
            style,
            taken: HashSet::new(),
            counter: 0,
        }
    }

    /// Reserve every identifier-like token so generated names never shadow them
    pub fn with_tokens(style: NameStyle, tokens: &[Token]) -> Self {
        let mut generator = Self::new(style);
        for token in tokens {
            match token.kind {
                TokenKind::Ident | TokenKind::Keyword => generator.reserve(&token.text),
                TokenKind::PrivateName => generator.reserve(&token.text[1..]),
                _ => {}
            }
        }
        generator
    }

    pub fn reserve(&mut self, name: &str) {
        self.taken.insert(name.to_string());
    }

    pub fn is_taken(&self, name: &str) -> bool {
        self.taken.contains(name)
    }

    pub fn next_name<R: Rng>(&mut self, rng: &mut R) -> String {
        loop {
            let candidate = match self.style {
                NameStyle::Hexadecimal => format!("_0x{:06x}", rng.gen_range(0..0x100_0000u32)),
                NameStyle::Mangled => {
                    self.counter += 1;
                    mangled(self.counter)
                }
            };
            if !self.is_taken(&candidate)
                && !is_keyword(&candidate)
                && !RESERVED.contains(&candidate.as_str())
            {
                self.taken.insert(candidate.clone());
                return candidate;
            }
        }
    }
}

/// 1 → `a`, 52 → `Z`, 53 → `aa`
fn mangled(mut n: usize) -> String {
    let mut out = Vec::new();
    while n > 0 {
        n -= 1;
        out.push(MANGLE_ALPHABET[n % 52]);
        n /= 52;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::obfuscator::lexer::tokenize;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_mangled_sequence() {
        assert_eq!(mangled(1), "a");
        assert_eq!(mangled(26), "z");
        assert_eq!(mangled(27), "A");
        assert_eq!(mangled(52), "Z");
        assert_eq!(mangled(53), "aa");
        assert_eq!(mangled(54), "ab");
    }

    #[test]
    fn test_hexadecimal_shape() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut generator = NameGenerator::new(NameStyle::Hexadecimal);
        let name = generator.next_name(&mut rng);
        assert_eq!(name.len(), 9);
        assert!(name.starts_with("_0x"));
        assert!(name[3..].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_mangled_skips_existing_and_keywords() {
        let tokens = tokenize("var a = b; c.d").unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        let mut generator = NameGenerator::with_tokens(NameStyle::Mangled, &tokens);
        let names: Vec<String> = (0..3).map(|_| generator.next_name(&mut rng)).collect();
        assert_eq!(names, vec!["e", "f", "g"]);
    }

    #[test]
    fn test_names_are_unique() {
        let mut rng = StdRng::seed_from_u64(9);
        let mut generator = NameGenerator::new(NameStyle::Mangled);
        let mut seen = HashSet::new();
        for _ in 0..3000 {
            assert!(seen.insert(generator.next_name(&mut rng)));
        }
        // two-letter keywords never come out
        assert!(!seen.contains("do") && !seen.contains("if") && !seen.contains("in"));
    }
}
