//! Token printing

use super::lexer::{is_ident_part, newline_required, Token, TokenKind};

/// Print tokens as source text
///
/// Compact output drops every optional space and keeps a line break only where
/// dropping it could change how semicolons are inserted. Readable output puts one
/// space between tokens and keeps the original line breaks.
pub fn emit(tokens: &[Token], compact: bool) -> String {
    let mut out = String::with_capacity(tokens.iter().map(|t| t.text.len() + 1).sum());
    let mut prev: Option<&Token> = None;
    for token in tokens {
        if let Some(prev) = prev {
            if compact {
                if token.newline_before && newline_required(prev, token) {
                    out.push('\n');
                } else if needs_space(prev, token) {
                    out.push(' ');
                }
            } else if token.newline_before {
                out.push('\n');
            } else {
                out.push(' ');
            }
        }
        out.push_str(&token.text);
        prev = Some(token);
    }
    out
}

/// Whether two adjacent tokens would lex differently without a space between them
fn needs_space(prev: &Token, next: &Token) -> bool {
    let (Some(last), Some(first)) = (prev.text.chars().last(), next.text.chars().next()) else {
        return false;
    };
    let word_end = is_ident_part(last);
    let word_start = is_ident_part(first) || first == '\\' || first == '#';

    if word_end && word_start {
        return true;
    }
    if prev.kind == TokenKind::Number && first == '.' {
        return true;
    }
    if prev.kind == TokenKind::Regex && word_start {
        return true;
    }
    match (last, first) {
        ('+', '+') | ('-', '-') => true,
        ('/', '/') | ('/', '*') => true,
        ('<', '!') => true,
        ('-', '>') => prev.text.ends_with("--"),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::obfuscator::lexer::tokenize;

    fn compact(source: &str) -> String {
        emit(&tokenize(source).unwrap(), true)
    }

    #[test]
    fn test_compact_drops_whitespace() {
        assert_eq!(compact("var  a = 1 ;\n\nfoo( a )"), "var a=1;foo(a)");
        assert_eq!(compact("return typeof x === \"y\""), "return typeof x===\"y\"");
    }

    #[test]
    fn test_compact_keeps_asi_line_breaks() {
        assert_eq!(compact("a = b\nc = d"), "a=b\nc=d");
        assert_eq!(compact("return\nvalue"), "return\nvalue");
        assert_eq!(compact("a\n++b"), "a\n++b");
        assert_eq!(compact("x = y\n.z"), "x=y.z");
    }

    #[test]
    fn test_compact_separates_ambiguous_operators() {
        assert_eq!(compact("a + +b"), "a+ +b");
        assert_eq!(compact("a - -b"), "a- -b");
        assert_eq!(compact("a / /re/.source"), "a/ /re/.source");
        assert_eq!(compact("1 .toString()"), "1 .toString()");
        assert_eq!(compact("x = /a/ in y"), "x=/a/ in y");
    }

    #[test]
    fn test_readable_keeps_lines() {
        let tokens = tokenize("a=1\nb=2").unwrap();
        assert_eq!(emit(&tokens, false), "a = 1\nb = 2");
    }

    #[test]
    fn test_output_relexes() {
        let source = "const s = `a${b + `c${d}`}e`; if (s) { f(/x+/g, 'q'); }";
        let printed = compact(source);
        let again = tokenize(&printed).unwrap();
        assert_eq!(again, {
            let mut original = tokenize(source).unwrap();
            for token in &mut original {
                token.newline_before = false;
            }
            original
        });
    }
}
