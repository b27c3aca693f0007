//! JavaScript tokenizer
//!
//! Produces a flat token stream with comments and whitespace dropped. Each
//! token remembers whether a line terminator preceded it so the emitter can
//! keep automatic semicolon insertion behaving the same way.
//!
//! Regex-versus-division is decided from the previous significant token. For a
//! closing `)` or `}` that depends on what the bracket opened: a statement head
//! or block may be followed by a regex, an expression may not.
//!
//! Template literals are split into head/middle/tail pieces around their
//! `${}` substitutions so the code inside a substitution is tokenized normally.

use thiserror::Error;

/// Kind of a lexical token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Ident,
    Keyword,
    PrivateName,
    Number,
    Str,
    Template(TemplatePart),
    Regex,
    Punct,
}

/// Which piece of a template literal a token holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplatePart {
    /// `` `text` `` with no substitutions
    Full,
    /// `` `text${ ``
    Head,
    /// `}text${`
    Middle,
    /// `` }text` ``
    Tail,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    /// Source text exactly as written (string tokens keep their quotes)
    pub text: String,
    /// A line terminator appeared between this token and the previous one
    pub newline_before: bool,
}

impl Token {
    pub fn new(kind: TokenKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
            newline_before: false,
        }
    }

    pub fn ident(text: impl Into<String>) -> Self {
        Self::new(TokenKind::Ident, text)
    }

    pub fn punct(text: impl Into<String>) -> Self {
        Self::new(TokenKind::Punct, text)
    }

    pub fn is_punct(&self, text: &str) -> bool {
        self.kind == TokenKind::Punct && self.text == text
    }

    pub fn is_keyword(&self, text: &str) -> bool {
        self.kind == TokenKind::Keyword && self.text == text
    }

    pub fn is_ident(&self, text: &str) -> bool {
        self.kind == TokenKind::Ident && self.text == text
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LexError {
    #[error("unterminated string literal at offset {0}")]
    UnterminatedString(usize),

    #[error("unterminated template literal at offset {0}")]
    UnterminatedTemplate(usize),

    #[error("unterminated block comment at offset {0}")]
    UnterminatedComment(usize),

    #[error("unterminated regular expression at offset {0}")]
    UnterminatedRegex(usize),

    #[error("invalid escape in identifier at offset {0}")]
    InvalidEscape(usize),

    #[error("unexpected character {ch:?} at offset {offset}")]
    UnexpectedChar { ch: char, offset: usize },
}

const KEYWORDS: &[&str] = &[
    "await", "break", "case", "catch", "class", "const", "continue", "debugger", "default",
    "delete", "do", "else", "enum", "export", "extends", "false", "finally", "for", "function",
    "if", "import", "in", "instanceof", "let", "new", "null", "return", "super", "switch",
    "this", "throw", "true", "try", "typeof", "var", "void", "while", "with", "yield",
];

/// Punctuators, longest first so the first prefix match wins
const PUNCTUATORS: &[&str] = &[
    ">>>=", "...", "===", "!==", "**=", "<<=", ">>=", ">>>", "&&=", "||=", "??=", "=>", "==",
    "!=", "<=", ">=", "&&", "||", "??", "?.", "++", "--", "+=", "-=", "*=", "/=", "%=", "&=",
    "|=", "^=", "**", "<<", ">>", "{", "}", "(", ")", "[", "]", ";", ",", "<", ">", "+", "-",
    "*", "/", "%", "&", "|", "^", "!", "~", "?", ":", "=", ".", "@",
];

/// Whether `word` is a reserved word that the lexer reports as [`TokenKind::Keyword`]
pub fn is_keyword(word: &str) -> bool {
    KEYWORDS.contains(&word)
}

pub fn is_ident_start(c: char) -> bool {
    c == '$' || c == '_' || c.is_alphabetic()
}

pub fn is_ident_part(c: char) -> bool {
    is_ident_start(c) || c.is_alphanumeric() || c == '\u{200c}' || c == '\u{200d}'
}

fn is_line_terminator(c: char) -> bool {
    matches!(c, '\n' | '\r' | '\u{2028}' | '\u{2029}')
}

/// Whether a line break between `prev` and `next` must be kept
///
/// Dropping the break is safe when the grammar would continue across it anyway.
/// It is kept after `return`-like keywords, before `++`/`--`, and wherever the
/// break may have triggered automatic semicolon insertion.
pub fn newline_required(prev: &Token, next: &Token) -> bool {
    if prev.kind == TokenKind::Keyword
        && matches!(
            prev.text.as_str(),
            "return" | "break" | "continue" | "throw" | "yield"
        )
    {
        return true;
    }
    if next.is_punct("++") || next.is_punct("--") {
        return true;
    }
    match prev.kind {
        TokenKind::Punct if !matches!(prev.text.as_str(), ")" | "]" | "}" | "++" | "--") => {
            return false
        }
        TokenKind::Template(TemplatePart::Head | TemplatePart::Middle) => return false,
        _ => {}
    }
    match next.kind {
        TokenKind::Punct => matches!(next.text.as_str(), "{" | "!" | "~" | "@" | "..."),
        TokenKind::Template(TemplatePart::Middle | TemplatePart::Tail) => false,
        _ => true,
    }
}

/// Tokenize JavaScript source. A leading hashbang line is discarded.
pub fn tokenize(source: &str) -> Result<Vec<Token>, LexError> {
    Lexer::new(source).run()
}

/// What an open `{` belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Brace {
    /// `${` inside a template literal
    Substitution,
    /// Statement block, or a declaration body
    Block,
    /// Function, arrow or method body in expression position
    Body,
    /// Object literal or class expression body
    Object,
}

/// What an open `(` belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Paren {
    /// `if (...)`, `while (...)`, `for (...)`, `with`, `catch`, `switch`
    Head,
    /// Parameter list after `function`
    Params { declaration: bool },
    Group,
}

/// Context recorded for each emitted token
#[derive(Debug, Clone, Copy)]
struct Mark {
    /// A `/` after this token starts a regex
    regex_after: bool,
    /// A statement may start after this token
    statement_after: bool,
}

impl Mark {
    fn for_token(kind: TokenKind, text: &str) -> Self {
        let regex_after = match kind {
            TokenKind::Ident
            | TokenKind::Number
            | TokenKind::Str
            | TokenKind::Regex
            | TokenKind::PrivateName
            | TokenKind::Template(TemplatePart::Full | TemplatePart::Tail) => false,
            TokenKind::Template(_) => true,
            TokenKind::Keyword => !matches!(text, "this" | "super" | "null" | "true" | "false"),
            TokenKind::Punct => !matches!(text, ")" | "]" | "}" | "++" | "--"),
        };
        let statement_after = match kind {
            TokenKind::Punct => text == ";",
            TokenKind::Keyword => matches!(text, "else" | "do" | "try" | "finally"),
            _ => false,
        };
        Self {
            regex_after,
            statement_after,
        }
    }
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    tokens: Vec<Token>,
    marks: Vec<Mark>,
    newline: bool,
    braces: Vec<Brace>,
    parens: Vec<Paren>,
    /// Kind of the paren closed by the last `)`
    closed_paren: Option<Paren>,
    /// A `function` keyword waits for its parameter list
    pending_function: Option<bool>,
    /// A `class` keyword waits for its body
    pending_class: Option<bool>,
}

impl Lexer {
    fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
            tokens: Vec::new(),
            marks: Vec::new(),
            newline: false,
            braces: Vec::new(),
            parens: Vec::new(),
            closed_paren: None,
            pending_function: None,
            pending_class: None,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, ahead: usize) -> Option<char> {
        self.chars.get(self.pos + ahead).copied()
    }

    fn slice(&self, start: usize) -> String {
        self.chars[start..self.pos].iter().collect()
    }

    fn push(&mut self, kind: TokenKind, text: String) {
        let mark = Mark::for_token(kind, &text);
        self.push_marked(kind, text, mark);
    }

    fn push_marked(&mut self, kind: TokenKind, text: String, mark: Mark) {
        self.marks.push(mark);
        self.tokens.push(Token {
            kind,
            text,
            newline_before: self.newline,
        });
        self.newline = false;
    }

    fn run(mut self) -> Result<Vec<Token>, LexError> {
        if self.starts_with("#!") {
            self.skip_line_comment();
        }
        while let Some(c) = self.peek() {
            match c {
                c if is_line_terminator(c) => {
                    self.newline = true;
                    self.pos += 1;
                }
                c if c.is_whitespace() || c == '\u{feff}' => self.pos += 1,
                '/' if self.peek_at(1) == Some('/') => self.skip_line_comment(),
                '/' if self.peek_at(1) == Some('*') => self.skip_block_comment()?,
                '/' if self.regex_allowed() => self.lex_regex()?,
                '"' | '\'' => self.lex_string(c)?,
                '`' => self.lex_template(true)?,
                '}' if self.braces.last() == Some(&Brace::Substitution) => {
                    self.braces.pop();
                    self.lex_template(false)?;
                }
                c if c.is_ascii_digit() => self.lex_number(),
                '.' if self.peek_at(1).is_some_and(|d| d.is_ascii_digit()) => self.lex_number(),
                '#' if self.peek_at(1).is_some_and(is_ident_start) => self.lex_private_name(),
                c if is_ident_start(c) || c == '\\' => self.lex_word()?,
                _ => self.lex_punct()?,
            }
        }
        Ok(self.tokens)
    }

    /// A `/` starts a regular expression unless the previous token ends an operand
    fn regex_allowed(&self) -> bool {
        self.marks.last().map_or(true, |mark| mark.regex_after)
    }

    /// Whether a `function` or `class` keyword about to be pushed starts a declaration
    fn declaration_position(&self) -> bool {
        let mut index = self.tokens.len();
        let mut newline = self.newline;
        if index > 0 && self.tokens[index - 1].is_ident("async") {
            newline = self.tokens[index - 1].newline_before;
            index -= 1;
        }
        let Some(prev) = index.checked_sub(1) else {
            return true;
        };
        let token = &self.tokens[prev];
        let mark = self.marks[prev];
        let exported = token.is_keyword("export")
            || (token.is_keyword("default")
                && prev > 0
                && self.tokens[prev - 1].is_keyword("export"));
        // a line break after an operand ends the previous statement
        mark.statement_after || exported || (newline && !mark.regex_after)
    }

    fn open_paren(&mut self) -> Paren {
        if let Some(declaration) = self.pending_function.take() {
            return Paren::Params { declaration };
        }
        let mut prior = self.tokens.iter().rev();
        match prior.next() {
            Some(t)
                if t.kind == TokenKind::Keyword
                    && matches!(
                        t.text.as_str(),
                        "if" | "while" | "for" | "with" | "catch" | "switch"
                    ) =>
            {
                Paren::Head
            }
            // `for await (...)`
            Some(t)
                if t.is_keyword("await") && prior.next().is_some_and(|t| t.is_keyword("for")) =>
            {
                Paren::Head
            }
            _ => Paren::Group,
        }
    }

    fn open_brace(&mut self) -> Brace {
        if let Some(declaration) = self.pending_class.take() {
            return if declaration { Brace::Block } else { Brace::Object };
        }
        let Some(last) = self.tokens.last() else {
            return Brace::Block;
        };
        if last.is_punct(")") {
            return match self.closed_paren {
                Some(Paren::Head | Paren::Params { declaration: true }) => Brace::Block,
                _ => Brace::Body,
            };
        }
        if last.is_punct("=>") {
            return Brace::Body;
        }
        if self.marks.last().is_some_and(|mark| mark.statement_after) {
            return Brace::Block;
        }
        Brace::Object
    }

    fn after_member_access(&self) -> bool {
        self.tokens
            .last()
            .is_some_and(|t| t.is_punct(".") || t.is_punct("?."))
    }

    fn skip_line_comment(&mut self) {
        while let Some(c) = self.peek() {
            if is_line_terminator(c) {
                break;
            }
            self.pos += 1;
        }
    }

    fn skip_block_comment(&mut self) -> Result<(), LexError> {
        let start = self.pos;
        self.pos += 2;
        loop {
            match self.peek() {
                None => return Err(LexError::UnterminatedComment(start)),
                Some('*') if self.peek_at(1) == Some('/') => {
                    self.pos += 2;
                    return Ok(());
                }
                Some(c) => {
                    if is_line_terminator(c) {
                        self.newline = true;
                    }
                    self.pos += 1;
                }
            }
        }
    }

    fn lex_string(&mut self, quote: char) -> Result<(), LexError> {
        let start = self.pos;
        self.pos += 1;
        loop {
            match self.peek() {
                None => return Err(LexError::UnterminatedString(start)),
                Some('\\') => {
                    if self.peek_at(1) == Some('\r') && self.peek_at(2) == Some('\n') {
                        self.pos += 3;
                    } else {
                        self.pos += 2;
                    }
                }
                Some(c) if c == quote => {
                    self.pos += 1;
                    break;
                }
                Some('\n') | Some('\r') => return Err(LexError::UnterminatedString(start)),
                Some(_) => self.pos += 1,
            }
        }
        if self.pos > self.chars.len() {
            return Err(LexError::UnterminatedString(start));
        }
        let text = self.slice(start);
        self.push(TokenKind::Str, text);
        Ok(())
    }

    /// Lex a template piece starting at `` ` `` (`opening`) or at the `}` closing a substitution
    fn lex_template(&mut self, opening: bool) -> Result<(), LexError> {
        let start = self.pos;
        self.pos += 1;
        let part = loop {
            match self.peek() {
                None => return Err(LexError::UnterminatedTemplate(start)),
                Some('\\') => self.pos += 2,
                Some('`') => {
                    self.pos += 1;
                    break if opening {
                        TemplatePart::Full
                    } else {
                        TemplatePart::Tail
                    };
                }
                Some('$') if self.peek_at(1) == Some('{') => {
                    self.pos += 2;
                    self.braces.push(Brace::Substitution);
                    break if opening {
                        TemplatePart::Head
                    } else {
                        TemplatePart::Middle
                    };
                }
                Some(_) => self.pos += 1,
            }
        };
        if self.pos > self.chars.len() {
            return Err(LexError::UnterminatedTemplate(start));
        }
        let text = self.slice(start);
        self.push(TokenKind::Template(part), text);
        Ok(())
    }

    fn lex_regex(&mut self) -> Result<(), LexError> {
        let start = self.pos;
        self.pos += 1;
        let mut in_class = false;
        loop {
            match self.peek() {
                None => return Err(LexError::UnterminatedRegex(start)),
                Some(c) if is_line_terminator(c) => return Err(LexError::UnterminatedRegex(start)),
                Some('\\') => {
                    if self.peek_at(1).map_or(true, is_line_terminator) {
                        return Err(LexError::UnterminatedRegex(start));
                    }
                    self.pos += 2;
                }
                Some('[') => {
                    in_class = true;
                    self.pos += 1;
                }
                Some(']') => {
                    in_class = false;
                    self.pos += 1;
                }
                Some('/') if !in_class => {
                    self.pos += 1;
                    break;
                }
                Some(_) => self.pos += 1,
            }
        }
        while self.peek().is_some_and(is_ident_part) {
            self.pos += 1;
        }
        let text = self.slice(start);
        self.push(TokenKind::Regex, text);
        Ok(())
    }

    fn lex_number(&mut self) {
        let start = self.pos;
        let radix_prefix = self.peek() == Some('0')
            && matches!(self.peek_at(1), Some('x' | 'X' | 'o' | 'O' | 'b' | 'B'));

        if radix_prefix {
            self.pos += 2;
            while self
                .peek()
                .is_some_and(|c| c.is_ascii_hexdigit() || c == '_')
            {
                self.pos += 1;
            }
        } else {
            self.consume_digits();
            if self.peek() == Some('.') {
                self.pos += 1;
                self.consume_digits();
            }
            if matches!(self.peek(), Some('e' | 'E')) {
                let signed = matches!(self.peek_at(1), Some('+' | '-'));
                let digit_at = if signed { 2 } else { 1 };
                if self.peek_at(digit_at).is_some_and(|c| c.is_ascii_digit()) {
                    self.pos += digit_at;
                    self.consume_digits();
                }
            }
        }
        if self.peek() == Some('n') {
            self.pos += 1;
        }
        let text = self.slice(start);
        self.push(TokenKind::Number, text);
    }

    fn consume_digits(&mut self) {
        while self.peek().is_some_and(|c| c.is_ascii_digit() || c == '_') {
            self.pos += 1;
        }
    }

    fn lex_private_name(&mut self) {
        let start = self.pos;
        self.pos += 1;
        while self.peek().is_some_and(is_ident_part) {
            self.pos += 1;
        }
        let text = self.slice(start);
        self.push(TokenKind::PrivateName, text);
    }

    fn lex_word(&mut self) -> Result<(), LexError> {
        let start = self.pos;
        loop {
            match self.peek() {
                Some('\\') => self.consume_unicode_escape()?,
                Some(c) if is_ident_part(c) => self.pos += 1,
                _ => break,
            }
        }
        let text = self.slice(start);
        // `a.default`, `x?.class`: reserved words are plain names after member access
        let kind = if is_keyword(&text) && !self.after_member_access() {
            TokenKind::Keyword
        } else {
            TokenKind::Ident
        };
        if kind == TokenKind::Keyword {
            match text.as_str() {
                "function" => self.pending_function = Some(self.declaration_position()),
                "class" => self.pending_class = Some(self.declaration_position()),
                _ => {}
            }
        }
        self.push(kind, text);
        Ok(())
    }

    fn consume_unicode_escape(&mut self) -> Result<(), LexError> {
        let start = self.pos;
        if self.peek_at(1) != Some('u') {
            return Err(LexError::InvalidEscape(start));
        }
        self.pos += 2;
        if self.peek() == Some('{') {
            while let Some(c) = self.peek() {
                self.pos += 1;
                if c == '}' {
                    return Ok(());
                }
            }
            return Err(LexError::InvalidEscape(start));
        }
        for _ in 0..4 {
            match self.peek() {
                Some(c) if c.is_ascii_hexdigit() => self.pos += 1,
                _ => return Err(LexError::InvalidEscape(start)),
            }
        }
        Ok(())
    }

    fn lex_punct(&mut self) -> Result<(), LexError> {
        // `<!--` and `-->` at line start are legacy HTML comments
        if self.starts_with("<!--") || (self.newline_or_start() && self.starts_with("-->")) {
            self.skip_line_comment();
            return Ok(());
        }

        for punct in PUNCTUATORS {
            if !self.starts_with(punct) {
                continue;
            }
            // `a?.5:b` is a conditional, not optional chaining
            if *punct == "?." && self.peek_at(2).is_some_and(|c| c.is_ascii_digit()) {
                continue;
            }
            self.pos += punct.chars().count();
            let mark = match *punct {
                "(" => {
                    let paren = self.open_paren();
                    self.parens.push(paren);
                    Mark::for_token(TokenKind::Punct, punct)
                }
                ")" => {
                    let paren = self.parens.pop().unwrap_or(Paren::Group);
                    self.closed_paren = Some(paren);
                    let head = paren == Paren::Head;
                    Mark {
                        regex_after: head,
                        statement_after: head,
                    }
                }
                "{" => {
                    let brace = self.open_brace();
                    self.braces.push(brace);
                    Mark {
                        regex_after: true,
                        statement_after: matches!(brace, Brace::Block | Brace::Body),
                    }
                }
                "}" => {
                    let block = self.braces.pop() == Some(Brace::Block);
                    Mark {
                        regex_after: block,
                        statement_after: block,
                    }
                }
                _ => Mark::for_token(TokenKind::Punct, punct),
            };
            self.push_marked(TokenKind::Punct, punct.to_string(), mark);
            return Ok(());
        }

        let ch = self.peek().unwrap_or('\0');
        let offset = self.chars[..self.pos].iter().map(|c| c.len_utf8()).sum();
        Err(LexError::UnexpectedChar { ch, offset })
    }

    fn starts_with(&self, pattern: &str) -> bool {
        let mut i = self.pos;
        for expected in pattern.chars() {
            if self.chars.get(i) != Some(&expected) {
                return false;
            }
            i += 1;
        }
        true
    }

    fn newline_or_start(&self) -> bool {
        self.tokens.is_empty() || self.newline
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<(TokenKind, String)> {
        tokenize(source)
            .unwrap()
            .into_iter()
            .map(|t| (t.kind, t.text))
            .collect()
    }

    #[test]
    fn test_basic_statement() {
        let tokens = kinds("const answer = 42;");
        assert_eq!(
            tokens,
            vec![
                (TokenKind::Keyword, "const".to_string()),
                (TokenKind::Ident, "answer".to_string()),
                (TokenKind::Punct, "=".to_string()),
                (TokenKind::Number, "42".to_string()),
                (TokenKind::Punct, ";".to_string()),
            ]
        );
    }

    #[test]
    fn test_comments_are_dropped_and_newlines_recorded() {
        let tokens = tokenize("a // trailing\n/* block\n */ b").unwrap();
        assert_eq!(tokens.len(), 2);
        assert!(!tokens[0].newline_before);
        assert!(tokens[1].newline_before);
    }

    #[test]
    fn test_regex_versus_division() {
        let tokens = kinds("x = a / b; y = /ab+c/gi.test(s);");
        assert!(tokens.contains(&(TokenKind::Punct, "/".to_string())));
        assert!(tokens.contains(&(TokenKind::Regex, "/ab+c/gi".to_string())));
    }

    #[test]
    fn test_slash_after_closing_brackets() {
        use TokenKind::*;
        const HEAD: TokenKind = Template(TemplatePart::Head);
        const TAIL: TokenKind = Template(TemplatePart::Tail);
        let cases: &[(&str, &[TokenKind])] = &[
            ("function f(){}\n/x/g", &[Keyword, Ident, Punct, Punct, Punct, Punct, Regex]),
            ("if (ok) /x/", &[Keyword, Punct, Ident, Punct, Regex]),
            ("while (i--) /x/", &[Keyword, Punct, Ident, Punct, Punct, Regex]),
            (
                "for await (x of y) /x/",
                &[Keyword, Keyword, Punct, Ident, Ident, Ident, Punct, Regex],
            ),
            ("{}\n/x/", &[Punct, Punct, Regex]),
            ("try {} finally {} /x/", &[Keyword, Punct, Punct, Keyword, Punct, Punct, Regex]),
            ("class A {}\n/x/", &[Keyword, Ident, Punct, Punct, Regex]),
            (
                "export function f(){} /x/",
                &[Keyword, Keyword, Ident, Punct, Punct, Punct, Punct, Regex],
            ),
            ("a / b / c", &[Ident, Punct, Ident, Punct, Ident]),
            ("x = {} / 2", &[Ident, Punct, Punct, Punct, Punct, Number]),
            ("f(a) / 2", &[Ident, Punct, Ident, Punct, Punct, Number]),
            (
                "g = function(){} / 2",
                &[Ident, Punct, Keyword, Punct, Punct, Punct, Punct, Punct, Number],
            ),
            ("x = class {} / 2", &[Ident, Punct, Keyword, Punct, Punct, Punct, Number]),
            ("return /re/", &[Keyword, Regex]),
            ("`${a}/b/`", &[HEAD, Ident, TAIL]),
        ];
        for (source, expected) in cases {
            let actual: Vec<TokenKind> =
                tokenize(source).unwrap().iter().map(|t| t.kind).collect();
            assert_eq!(&actual, expected, "{source}");
        }
    }

    #[test]
    fn test_regex_inside_blocks_keeps_its_text() {
        let tokens = kinds("var o = { m() { if (a) {} /b c/.test(s); } };");
        assert!(tokens.contains(&(TokenKind::Regex, "/b c/".to_string())));
        let tokens = kinds("`${ {a: 1}.a / 2 }`");
        assert!(tokens.contains(&(TokenKind::Punct, "/".to_string())));
    }

    #[test]
    fn test_regex_with_slash_in_class() {
        let tokens = kinds("s.replace(/[/]+/g, '')");
        assert!(tokens.contains(&(TokenKind::Regex, "/[/]+/g".to_string())));
    }

    #[test]
    fn test_template_with_nested_substitution() {
        let tokens = kinds("`a${ {b: 1}.b }c${d}e`");
        assert_eq!(tokens[0], (TokenKind::Template(TemplatePart::Head), "`a${".to_string()));
        assert!(tokens.contains(&(TokenKind::Template(TemplatePart::Middle), "}c${".to_string())));
        assert_eq!(
            tokens.last().unwrap(),
            &(TokenKind::Template(TemplatePart::Tail), "}e`".to_string())
        );
        assert!(tokens.contains(&(TokenKind::Punct, "{".to_string())));
    }

    #[test]
    fn test_keywords_after_dot_are_identifiers() {
        let tokens = kinds("promise.catch(fn).finally(done)");
        assert!(tokens.contains(&(TokenKind::Ident, "catch".to_string())));
        assert!(tokens.contains(&(TokenKind::Ident, "finally".to_string())));
    }

    #[test]
    fn test_numbers() {
        let tokens = kinds("0xFF 1_000 .5 1e-3 10n 1.5");
        let numbers: Vec<_> = tokens.iter().map(|(_, t)| t.as_str()).collect();
        assert_eq!(numbers, vec!["0xFF", "1_000", ".5", "1e-3", "10n", "1.5"]);
    }

    #[test]
    fn test_optional_chaining_versus_conditional() {
        let tokens = kinds("a?.b; c?.5:1");
        assert!(tokens.contains(&(TokenKind::Punct, "?.".to_string())));
        assert!(tokens.contains(&(TokenKind::Number, ".5".to_string())));
    }

    #[test]
    fn test_string_escapes() {
        let tokens = kinds(r#"'it\'s' "say \"hi\"""#);
        assert_eq!(tokens[0].1, r#"'it\'s'"#);
        assert_eq!(tokens[1].1, r#""say \"hi\"""#);
    }

    #[test]
    fn test_private_names() {
        let tokens = kinds("this.#count++");
        assert!(tokens.contains(&(TokenKind::PrivateName, "#count".to_string())));
    }

    #[test]
    fn test_unterminated_string_is_error() {
        assert!(matches!(
            tokenize("let s = 'oops"),
            Err(LexError::UnterminatedString(8))
        ));
    }

    #[test]
    fn test_unterminated_comment_is_error() {
        assert!(matches!(
            tokenize("a /* never closed"),
            Err(LexError::UnterminatedComment(2))
        ));
    }

    #[test]
    fn test_newline_required() {
        let tokens = tokenize("return\nx").unwrap();
        assert!(newline_required(&tokens[0], &tokens[1]));
        let tokens = tokenize("a = b\nc = d").unwrap();
        assert!(newline_required(&tokens[2], &tokens[3]));
        let tokens = tokenize("a +\nb\n.c").unwrap();
        assert!(!newline_required(&tokens[1], &tokens[2]));
        assert!(!newline_required(&tokens[2], &tokens[3]));
        let tokens = tokenize("a\n++b").unwrap();
        assert!(newline_required(&tokens[0], &tokens[1]));
    }

    #[test]
    fn test_hashbang_is_skipped() {
        let tokens = kinds("#!/usr/bin/env node\nrun()");
        assert_eq!(tokens[0], (TokenKind::Ident, "run".to_string()));
    }

    #[test]
    fn test_unexpected_character() {
        assert!(matches!(
            tokenize("a = 1 # 2"),
            Err(LexError::UnexpectedChar { ch: '#', offset: 6 })
        ));
    }
}
