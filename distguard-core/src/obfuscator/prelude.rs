//! Runtime code placed in front of the obfuscated program
//!
//! The string array and its accessors, the self-defending check, the debugger
//! trap and the console silencer. All of it is written as small JavaScript
//! templates with `$NAME` placeholders that are filled with fresh identifiers.

use rand::Rng;

use super::lexer::{tokenize, LexError, Token, TokenKind};
use super::literals::StringArray;
use super::names::NameGenerator;
use super::strings::encode_literal;
use crate::policy::{ObfuscationPolicy, StringEncoding};

/// Replacement for a `$NAME` placeholder
#[derive(Debug, Clone)]
pub enum Slot {
    Ident(String),
    /// Raw string value, quoted on insertion
    Str(String),
    Number(String),
}

/// Tokenize `template` and substitute its placeholders
///
/// Line breaks inside templates are layout only and are dropped.
pub fn from_template(template: &str, slots: &[(&str, Slot)]) -> Result<Vec<Token>, LexError> {
    let mut out = Vec::new();
    for mut token in tokenize(template)? {
        token.newline_before = false;
        if token.kind == TokenKind::Ident && token.text.starts_with('$') {
            if let Some((_, slot)) = slots.iter().find(|(name, _)| *name == token.text) {
                token = match slot {
                    Slot::Ident(name) => Token::ident(name.clone()),
                    Slot::Str(value) => Token::new(
                        TokenKind::Str,
                        encode_literal(&value.encode_utf16().collect::<Vec<_>>(), false),
                    ),
                    Slot::Number(text) => Token::new(TokenKind::Number, text.clone()),
                };
            }
        }
        out.push(token);
    }
    Ok(out)
}

/// Lowercase ASCII word of `len` letters
pub fn random_word<R: Rng>(rng: &mut R, len: usize) -> String {
    (0..len)
        .map(|_| char::from(b'a' + rng.gen_range(0..26u8)))
        .collect()
}

/// Fill `placeholders` with fresh names, plus any fixed `extra` slots
fn fresh_slots<R: Rng>(
    placeholders: &[&'static str],
    extra: Vec<(&'static str, Slot)>,
    rng: &mut R,
    names: &mut NameGenerator,
) -> Vec<(&'static str, Slot)> {
    let mut slots: Vec<(&'static str, Slot)> = placeholders
        .iter()
        .map(|placeholder| (*placeholder, Slot::Ident(names.next_name(rng))))
        .collect();
    slots.extend(extra);
    slots
}

const ROTATE_TEMPLATE: &str = r#"(function ($A, $N) {
  var $R = function ($K) { while (--$K) { $A["push"]($A["shift"]()); } };
  $R(++$N);
})($ARRAY, $COUNT);"#;

const PLAIN_ACCESSOR_TEMPLATE: &str = r#"var $GET = function ($I) {
  $I = $I - $OFFSET;
  return $ARRAY[$I];
};"#;

const BASE64_ACCESSOR_TEMPLATE: &str = r#"var $CACHE = {};
var $GET = function ($I) {
  $I = $I - $OFFSET;
  var $V = $ARRAY[$I];
  if ($CACHE[$I] === undefined) {
    var $ALPHA = "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/", $OUT = "", $BITS = 0, $HELD = 0, $POS, $CODE;
    for ($POS = 0; $POS < $V.length; $POS++) {
      $CODE = $ALPHA.indexOf($V.charAt($POS));
      if ($CODE < 0) { continue; }
      $BITS = ($BITS << 6) | $CODE;
      $HELD += 6;
      if ($HELD >= 8) {
        $HELD -= 8;
        $OUT += "%" + ("00" + (($BITS >> $HELD) & 255).toString(16)).slice(-2);
      }
    }
    $CACHE[$I] = decodeURIComponent($OUT);
  }
  return $CACHE[$I];
};"#;

const SELF_DEFENDING_TEMPLATE: &str = r##"var $PROBE = function () { return $WORD; };
if (!/^function\(\)\{return"[a-z]+";\}$/.test($PROBE.toString())) { for (;;) {} }"##;

const DEBUG_TRAP_TEMPLATE: &str = r#"(function () {
  var $TRAP = function () {
    try { (function () {}).constructor("debugger")(); } catch ($E) {}
  };
  $TRAP();
})();"#;

const DEBUG_INTERVAL_TEMPLATE: &str = r#"(function () {
  var $TRAP = function () {
    try { (function () {}).constructor("debugger")(); } catch ($E) {}
  };
  $TRAP();
  setInterval($TRAP, 4000);
})();"#;

const CONSOLE_TEMPLATE: &str = r#"(function () {
  var $GLOBAL = typeof window !== "undefined" ? window : typeof globalThis !== "undefined" ? globalThis : this;
  var $CONSOLE = $GLOBAL.console = $GLOBAL.console || {};
  var $METHODS = ["log", "warn", "info", "error", "exception", "table", "trace"];
  for (var $I = 0; $I < $METHODS.length; $I++) { $CONSOLE[$METHODS[$I]] = function () {}; }
})();"#;

/// Build the prelude for one file
pub fn build<R: Rng>(
    strings: &StringArray,
    policy: &ObfuscationPolicy,
    rng: &mut R,
    names: &mut NameGenerator,
) -> Result<Vec<Token>, LexError> {
    let mut out = Vec::new();

    if !strings.is_empty() {
        out.extend(array_declaration(strings, policy, rng, names)?);
        for (encoding, accessor) in strings.accessors() {
            let offset = Slot::Number(strings.offset().to_string());
            let base = vec![
                ("$GET", Slot::Ident(accessor.clone())),
                ("$ARRAY", Slot::Ident(strings.name().to_string())),
                ("$OFFSET", offset),
            ];
            let code = match encoding {
                StringEncoding::None => {
                    let slots = fresh_slots(&["$I"], base, rng, names);
                    from_template(PLAIN_ACCESSOR_TEMPLATE, &slots)?
                }
                StringEncoding::Base64 => {
                    let slots = fresh_slots(
                        &[
                            "$CACHE", "$I", "$V", "$ALPHA", "$OUT", "$BITS", "$HELD", "$POS",
                            "$CODE",
                        ],
                        base,
                        rng,
                        names,
                    );
                    from_template(BASE64_ACCESSOR_TEMPLATE, &slots)?
                }
            };
            out.extend(code);
        }
    }

    if policy.self_defending {
        let word = Slot::Str(random_word(rng, 6));
        let slots = fresh_slots(&["$PROBE"], vec![("$WORD", word)], rng, names);
        out.extend(from_template(SELF_DEFENDING_TEMPLATE, &slots)?);
    }

    if policy.debug_protection {
        let template = if policy.debug_protection_interval {
            DEBUG_INTERVAL_TEMPLATE
        } else {
            DEBUG_TRAP_TEMPLATE
        };
        let slots = fresh_slots(&["$TRAP", "$E"], Vec::new(), rng, names);
        out.extend(from_template(template, &slots)?);
    }

    if policy.disable_console_output {
        let slots = fresh_slots(&["$GLOBAL", "$CONSOLE", "$METHODS", "$I"], Vec::new(), rng, names);
        out.extend(from_template(CONSOLE_TEMPLATE, &slots)?);
    }

    Ok(out)
}

/// `var ARRAY = [...]` with the entries stored rotated, plus the code that undoes it
fn array_declaration<R: Rng>(
    strings: &StringArray,
    policy: &ObfuscationPolicy,
    rng: &mut R,
    names: &mut NameGenerator,
) -> Result<Vec<Token>, LexError> {
    let entries = strings.entries();
    let rotation = if policy.rotate_string_array && entries.len() > 1 {
        rng.gen_range(50..400usize)
    } else {
        0
    };

    let mut stored = entries.to_vec();
    stored.rotate_right(rotation % entries.len().max(1));

    let mut out = vec![
        Token::new(TokenKind::Keyword, "var"),
        Token::ident(strings.name().to_string()),
        Token::punct("="),
        Token::punct("["),
    ];
    for (i, literal) in stored.into_iter().enumerate() {
        if i > 0 {
            out.push(Token::punct(","));
        }
        out.push(Token::new(TokenKind::Str, literal));
    }
    out.push(Token::punct("]"));
    out.push(Token::punct(";"));

    if rotation > 0 {
        let slots = fresh_slots(
            &["$A", "$N", "$R", "$K"],
            vec![
                ("$ARRAY", Slot::Ident(strings.name().to_string())),
                ("$COUNT", Slot::Number(rotation.to_string())),
            ],
            rng,
            names,
        );
        out.extend(from_template(ROTATE_TEMPLATE, &slots)?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::obfuscator::emit::emit;
    use crate::policy::NameStyle;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_template_substitution() {
        let tokens = from_template(
            "var $A = $S + $N;",
            &[
                ("$A", Slot::Ident("x".to_string())),
                ("$S", Slot::Str("say \"hi\"".to_string())),
                ("$N", Slot::Number("0x10".to_string())),
            ],
        )
        .unwrap();
        assert_eq!(emit(&tokens, true), r#"var x="say \"hi\""+0x10;"#);
    }

    #[test]
    fn test_random_word() {
        let mut rng = StdRng::seed_from_u64(3);
        let word = random_word(&mut rng, 8);
        assert_eq!(word.len(), 8);
        assert!(word.chars().all(|c| c.is_ascii_lowercase()));
    }

    #[test]
    fn test_self_defending_probe_matches_compact_output() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut names = NameGenerator::new(NameStyle::Mangled);
        let policy = ObfuscationPolicy {
            self_defending: true,
            compact: true,
            ..ObfuscationPolicy::disabled()
        };
        let strings = StringArray::new("arr".to_string(), 0);
        let tokens = build(&strings, &policy, &mut rng, &mut names).unwrap();
        let code = emit(&tokens, true);
        let start = code.find("function(){").unwrap();
        let end = code[start..].find('}').unwrap() + start + 1;
        let probe = &code[start..end];
        let pattern = regex::Regex::new(r#"^function\(\)\{return"[a-z]+";\}$"#).unwrap();
        assert!(pattern.is_match(probe), "{probe}");
    }

    #[test]
    fn test_prelude_sections_follow_policy() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut names = NameGenerator::new(NameStyle::Hexadecimal);
        let empty = StringArray::new("arr".to_string(), 0);

        let none = build(&empty, &ObfuscationPolicy::disabled(), &mut rng, &mut names).unwrap();
        assert!(none.is_empty());

        let policy = ObfuscationPolicy {
            debug_protection: true,
            debug_protection_interval: true,
            disable_console_output: true,
            ..ObfuscationPolicy::disabled()
        };
        let code = emit(&build(&empty, &policy, &mut rng, &mut names).unwrap(), true);
        assert!(code.contains("constructor(\"debugger\")"));
        assert!(code.contains(",4000)"));
        assert!(code.contains("\"exception\""));
        tokenize(&code).unwrap();
    }
}
