//! String literal helpers
//!
//! Literal values are handled as UTF-16 code units, the way JavaScript sees
//! them, so lone surrogates written as `\uD800` survive a decode/encode trip.

use base64::{engine::general_purpose, Engine as _};

/// Decode the value of a quoted string literal token
///
/// Returns `None` for legacy octal escapes, which are left untouched.
pub fn decode_literal(token: &str) -> Option<Vec<u16>> {
    let mut chars = token.chars();
    let quote = chars.next()?;
    if !matches!(quote, '"' | '\'') || !token.ends_with(quote) || token.len() < 2 {
        return None;
    }
    let body: Vec<char> = token[1..token.len() - 1].chars().collect();
    let mut out = Vec::with_capacity(body.len());
    let mut i = 0;
    while i < body.len() {
        let c = body[i];
        i += 1;
        if c != '\\' {
            push_char(&mut out, c);
            continue;
        }
        let escaped = *body.get(i)?;
        i += 1;
        match escaped {
            'n' => out.push(0x0a),
            't' => out.push(0x09),
            'r' => out.push(0x0d),
            'b' => out.push(0x08),
            'f' => out.push(0x0c),
            'v' => out.push(0x0b),
            '0' if !body.get(i).is_some_and(|d| d.is_ascii_digit()) => out.push(0),
            '0'..='9' => return None,
            'x' => {
                let hex: String = body.get(i..i + 2)?.iter().collect();
                out.push(u16::from_str_radix(&hex, 16).ok()?);
                i += 2;
            }
            'u' if body.get(i) == Some(&'{') => {
                let close = body[i..].iter().position(|&c| c == '}')? + i;
                let hex: String = body[i + 1..close].iter().collect();
                let code = u32::from_str_radix(&hex, 16).ok()?;
                push_char(&mut out, char::from_u32(code)?);
                i = close + 1;
            }
            'u' => {
                let hex: String = body.get(i..i + 4)?.iter().collect();
                out.push(u16::from_str_radix(&hex, 16).ok()?);
                i += 4;
            }
            '\r' => {
                if body.get(i) == Some(&'\n') {
                    i += 1;
                }
            }
            '\n' | '\u{2028}' | '\u{2029}' => {}
            other => push_char(&mut out, other),
        }
    }
    Some(out)
}

fn push_char(out: &mut Vec<u16>, c: char) {
    let mut buf = [0u16; 2];
    out.extend_from_slice(c.encode_utf16(&mut buf));
}

/// Quote `value` as a double-quoted literal
///
/// With `escape_all` every unit is written as `\xNN` or `\uNNNN`.
pub fn encode_literal(value: &[u16], escape_all: bool) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    if escape_all {
        for &unit in value {
            if unit <= 0xff {
                out.push_str(&format!("\\x{:02x}", unit));
            } else {
                out.push_str(&format!("\\u{:04x}", unit));
            }
        }
    } else {
        for decoded in char::decode_utf16(value.iter().copied()) {
            match decoded {
                Ok('"') => out.push_str("\\\""),
                Ok('\\') => out.push_str("\\\\"),
                Ok('\n') => out.push_str("\\n"),
                Ok('\r') => out.push_str("\\r"),
                Ok('\t') => out.push_str("\\t"),
                Ok('\u{2028}') => out.push_str("\\u2028"),
                Ok('\u{2029}') => out.push_str("\\u2029"),
                Ok(c) if (c as u32) < 0x20 || c as u32 == 0x7f => {
                    out.push_str(&format!("\\x{:02x}", c as u32))
                }
                Ok(c) => out.push(c),
                Err(lone) => out.push_str(&format!("\\u{:04x}", lone.unpaired_surrogate())),
            }
        }
    }
    out.push('"');
    out
}

/// Re-quote a literal token, or return it unchanged if it cannot be decoded
pub fn requote(token: &str, escape_all: bool) -> String {
    match decode_literal(token) {
        Some(value) => encode_literal(&value, escape_all),
        None => token.to_string(),
    }
}

/// Value as a Rust string when it is valid UTF-16
pub fn to_utf8(value: &[u16]) -> Option<String> {
    String::from_utf16(value).ok()
}

/// Standard padded base64
pub fn base64_encode(input: &[u8]) -> String {
    general_purpose::STANDARD.encode(input)
}
