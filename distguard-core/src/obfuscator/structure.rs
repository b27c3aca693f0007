//! Token stream structure
//!
//! A single forward sweep over the tokens that recovers just enough syntax for
//! the passes: which brackets pair up, what each `{` opens, where functions and
//! their parameter lists are, and what role every identifier and string plays
//! (binding, reference, property name, object key, module specifier, ...).
//!
//! This is not a parser. It tracks a stack of bracket frames and a little state
//! per frame (pending declarations, destructuring patterns, ternaries), which is
//! enough for the code that bundlers and site generators emit.

use std::collections::HashSet;

use thiserror::Error;

use super::lexer::{newline_required, TemplatePart, Token, TokenKind};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StructureError {
    #[error("unbalanced {text:?} at token {index}")]
    Unbalanced { text: String, index: usize },
}

/// Where a declared name lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingScope {
    /// `var` and function declarations: the enclosing function
    Function,
    /// `let`, `const`, `class`, parameters: the innermost scope
    Block,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Other,
    Reference,
    Binding(BindingScope),
    /// `{ a }` in an object literal
    Shorthand,
    /// `{ a }` in a destructuring pattern
    ShorthandBinding(BindingScope),
    /// Name after `.` or `?.`
    Property,
    /// Object literal key followed by `:`
    Key,
    /// Method or class member name
    Member,
    Label,
    /// Name in an import or export clause, or an exported declaration
    Module,
    /// String that must stay in place: module specifiers, directives
    LockedStr,
    /// String used as an object key or member name
    KeyStr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BraceKind {
    Block,
    Object,
    Class,
    /// `import { .. }`, `export { .. }`, import attributes
    ModuleList,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SiteKind {
    Function,
    Arrow,
    Method,
    Catch,
}

/// A function (or catch clause) and the token range its parameters are visible in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionSite {
    pub kind: SiteKind,
    /// `(` of the parameter list, or the lone parameter of `x => ..`
    pub params: usize,
    /// `{` of the body, `None` for expression-bodied arrows
    pub body: Option<usize>,
    /// Inclusive token range of the scope
    pub start: usize,
    pub end: usize,
}

impl FunctionSite {
    pub fn is_function_scope(&self) -> bool {
        self.kind != SiteKind::Catch
    }
}

#[derive(Debug, Clone)]
pub struct Analysis {
    /// Matching bracket for every bracket token
    pub pairs: Vec<Option<usize>>,
    pub roles: Vec<Role>,
    /// Kind of each `{` token
    pub braces: Vec<Option<BraceKind>>,
    pub sites: Vec<FunctionSite>,
    /// `eval(..)` or `with` was seen; names cannot be resolved statically
    pub dynamic_scope: bool,
}

impl Analysis {
    /// `(open, close)` of every function body, outermost first
    pub fn function_bodies(&self) -> Vec<(usize, usize)> {
        let mut bodies: Vec<(usize, usize)> = self
            .sites
            .iter()
            .filter(|site| site.is_function_scope())
            .filter_map(|site| {
                let open = site.body?;
                Some((open, self.pairs[open]?))
            })
            .collect();
        bodies.sort_unstable();
        bodies
    }
}

pub fn analyze(tokens: &[Token]) -> Result<Analysis, StructureError> {
    let pairs = match_pairs(tokens)?;
    let sites = find_sites(tokens, &pairs);
    let param_lists: HashSet<usize> = sites
        .iter()
        .filter(|site| tokens[site.params].is_punct("("))
        .map(|site| site.params)
        .collect();
    let bodies: HashSet<usize> = sites.iter().filter_map(|site| site.body).collect();

    let mut sweep = Sweep::new(tokens, &param_lists, &bodies);
    sweep.run();

    Ok(Analysis {
        pairs,
        roles: sweep.roles,
        braces: sweep.braces,
        sites,
        dynamic_scope: sweep.dynamic_scope,
    })
}

fn is_opener(token: &Token) -> bool {
    match token.kind {
        TokenKind::Punct => matches!(token.text.as_str(), "(" | "[" | "{"),
        TokenKind::Template(TemplatePart::Head) => true,
        _ => false,
    }
}

fn closes(open: &Token, close: &Token) -> bool {
    match (open.kind, close.kind) {
        (TokenKind::Punct, TokenKind::Punct) => matches!(
            (open.text.as_str(), close.text.as_str()),
            ("(", ")") | ("[", "]") | ("{", "}")
        ),
        (
            TokenKind::Template(TemplatePart::Head | TemplatePart::Middle),
            TokenKind::Template(TemplatePart::Middle | TemplatePart::Tail),
        ) => true,
        _ => false,
    }
}

/// Pair brackets. A template middle piece closes one substitution and opens the next.
pub fn match_pairs(tokens: &[Token]) -> Result<Vec<Option<usize>>, StructureError> {
    let unbalanced = |index: usize| StructureError::Unbalanced {
        text: tokens[index].text.clone(),
        index,
    };
    let mut pairs = vec![None; tokens.len()];
    let mut stack: Vec<usize> = Vec::new();
    for (i, token) in tokens.iter().enumerate() {
        let is_closer = match token.kind {
            TokenKind::Punct => matches!(token.text.as_str(), ")" | "]" | "}"),
            TokenKind::Template(TemplatePart::Middle | TemplatePart::Tail) => true,
            _ => false,
        };
        if is_closer {
            let open = stack.pop().ok_or_else(|| unbalanced(i))?;
            if !closes(&tokens[open], token) {
                return Err(unbalanced(i));
            }
            pairs[open] = Some(i);
            pairs[i] = Some(open);
        }
        if is_opener(token) || token.kind == TokenKind::Template(TemplatePart::Middle) {
            stack.push(i);
        }
    }
    match stack.last() {
        Some(&open) => Err(unbalanced(open)),
        None => Ok(pairs),
    }
}

/// Index just past the bracket group starting at `open`, following template chains
fn skip_group(tokens: &[Token], pairs: &[Option<usize>], open: usize) -> usize {
    let mut j = open;
    while let Some(close) = pairs[j] {
        if close <= j {
            break;
        }
        j = close;
        if tokens[j].kind != TokenKind::Template(TemplatePart::Middle) {
            break;
        }
    }
    j
}

/// Last token of an arrow function's expression body starting at `start`
fn expression_end(tokens: &[Token], pairs: &[Option<usize>], start: usize) -> usize {
    let mut last = start.saturating_sub(1);
    let mut ternary = 0u32;
    let mut j = start;
    while j < tokens.len() {
        let token = &tokens[j];
        if j > start && token.newline_before && newline_required(&tokens[j - 1], token) {
            break;
        }
        match token.kind {
            TokenKind::Punct => match token.text.as_str() {
                "," | ";" | ")" | "]" | "}" => break,
                ":" if ternary == 0 => break,
                ":" => ternary -= 1,
                "?" => ternary += 1,
                "(" | "[" | "{" => j = skip_group(tokens, pairs, j),
                _ => {}
            },
            TokenKind::Template(TemplatePart::Middle | TemplatePart::Tail) => break,
            TokenKind::Template(TemplatePart::Head) => j = skip_group(tokens, pairs, j),
            _ => {}
        }
        last = j;
        j += 1;
    }
    last
}

const NON_METHOD_KEYWORDS: &[&str] = &[
    "if", "while", "for", "switch", "catch", "with", "function", "return", "typeof", "void",
    "delete", "await", "yield", "throw", "new", "in", "instanceof", "case",
];

fn could_name_method(token: &Token) -> bool {
    match token.kind {
        TokenKind::Ident | TokenKind::Str | TokenKind::Number | TokenKind::PrivateName => true,
        TokenKind::Keyword => !NON_METHOD_KEYWORDS.contains(&token.text.as_str()),
        TokenKind::Punct => token.text == "]",
        _ => false,
    }
}

/// `( params ) { body }` starting at `open`
fn block_site(
    tokens: &[Token],
    pairs: &[Option<usize>],
    kind: SiteKind,
    open: usize,
) -> Option<FunctionSite> {
    if !tokens.get(open)?.is_punct("(") {
        return None;
    }
    let close = pairs[open]?;
    let body = close + 1;
    let brace = tokens.get(body)?;
    if !brace.is_punct("{") || (kind == SiteKind::Method && brace.newline_before) {
        return None;
    }
    Some(FunctionSite {
        kind,
        params: open,
        body: Some(body),
        start: open,
        end: pairs[body]?,
    })
}

fn find_sites(tokens: &[Token], pairs: &[Option<usize>]) -> Vec<FunctionSite> {
    let mut sites = Vec::new();
    for (i, token) in tokens.iter().enumerate() {
        let site = if token.is_keyword("function") {
            let mut j = i + 1;
            if tokens.get(j).is_some_and(|t| t.is_punct("*")) {
                j += 1;
            }
            if tokens.get(j).is_some_and(|t| t.kind == TokenKind::Ident) {
                j += 1;
            }
            block_site(tokens, pairs, SiteKind::Function, j)
        } else if token.is_keyword("catch") {
            block_site(tokens, pairs, SiteKind::Catch, i + 1)
        } else if token.is_punct("=>") && i > 0 {
            arrow_site(tokens, pairs, i)
        } else if token.is_punct("(") && i > 0 && could_name_method(&tokens[i - 1]) {
            let after_function = (i >= 2 && tokens[i - 2].is_keyword("function"))
                || (i >= 3 && tokens[i - 2].is_punct("*") && tokens[i - 3].is_keyword("function"));
            if after_function {
                None
            } else {
                block_site(tokens, pairs, SiteKind::Method, i)
            }
        } else {
            None
        };
        sites.extend(site);
    }
    sites
}

fn arrow_site(tokens: &[Token], pairs: &[Option<usize>], arrow: usize) -> Option<FunctionSite> {
    let before = &tokens[arrow - 1];
    let params = if before.is_punct(")") {
        pairs[arrow - 1]?
    } else if before.kind == TokenKind::Ident {
        arrow - 1
    } else {
        return None;
    };
    let (body, end) = match tokens.get(arrow + 1) {
        Some(next) if next.is_punct("{") => (Some(arrow + 1), pairs[arrow + 1]?),
        _ => (None, expression_end(tokens, pairs, arrow + 1)),
    };
    Some(FunctionSite {
        kind: SiteKind::Arrow,
        params,
        body,
        start: params,
        end,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameKind {
    Root,
    Brace(BraceKind),
    Paren,
    Bracket,
    Template,
}

#[derive(Debug, Clone, Copy)]
struct Binder {
    scope: BindingScope,
    exported: bool,
}

impl Binder {
    fn role(self) -> Role {
        if self.exported {
            Role::Module
        } else {
            Role::Binding(self.scope)
        }
    }

    fn shorthand_role(self) -> Role {
        if self.exported {
            Role::Module
        } else {
            Role::ShorthandBinding(self.scope)
        }
    }
}

#[derive(Debug, Clone)]
struct Frame {
    kind: FrameKind,
    open: Option<usize>,
    ternary: u32,
    /// Active `var`/`let`/`const` list
    decl: Option<Binder>,
    awaiting_binding: bool,
    /// Set when this frame is a destructuring pattern or parameter list
    pattern: Option<Binder>,
    in_default: bool,
    import_clause: bool,
    /// A member modifier (`get`, `static`, `*`, ...) was just seen
    member_start_next: bool,
}

impl Frame {
    fn new(kind: FrameKind, open: Option<usize>, pattern: Option<Binder>) -> Self {
        Self {
            kind,
            open,
            ternary: 0,
            decl: None,
            awaiting_binding: false,
            pattern,
            in_default: false,
            import_clause: false,
            member_start_next: false,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum NamePending {
    Declaration(Binder),
    Expression,
}

const OBJECT_KEYWORDS: &[&str] = &[
    "return", "typeof", "instanceof", "in", "new", "delete", "void", "throw", "case", "yield",
    "await", "var", "let", "const", "import", "export", "default", "extends",
];

struct Sweep<'a> {
    tokens: &'a [Token],
    param_lists: &'a HashSet<usize>,
    bodies: &'a HashSet<usize>,
    stack: Vec<Frame>,
    roles: Vec<Role>,
    braces: Vec<Option<BraceKind>>,
    dynamic_scope: bool,
    name_pending: Option<NamePending>,
    /// Stack depths at which a `class` keyword awaits its body
    class_pending: Vec<usize>,
    prev_colon_statement: bool,
}

impl<'a> Sweep<'a> {
    fn new(
        tokens: &'a [Token],
        param_lists: &'a HashSet<usize>,
        bodies: &'a HashSet<usize>,
    ) -> Self {
        Self {
            tokens,
            param_lists,
            bodies,
            stack: vec![Frame::new(FrameKind::Root, None, None)],
            roles: vec![Role::Other; tokens.len()],
            braces: vec![None; tokens.len()],
            dynamic_scope: false,
            name_pending: None,
            class_pending: Vec::new(),
            prev_colon_statement: false,
        }
    }

    fn top(&self) -> &Frame {
        &self.stack[self.stack.len() - 1]
    }

    fn top_mut(&mut self) -> &mut Frame {
        let last = self.stack.len() - 1;
        &mut self.stack[last]
    }

    fn run(&mut self) {
        let tokens = self.tokens;
        for i in 0..tokens.len() {
            let token = &tokens[i];
            let prev = i.checked_sub(1).map(|p| &tokens[p]);
            let next = tokens.get(i + 1);

            if let Some(prev) = prev {
                if token.newline_before && newline_required(prev, token) {
                    let frame = self.top_mut();
                    if !frame.awaiting_binding {
                        frame.decl = None;
                    }
                    frame.import_clause = false;
                }
            }

            let member_start = self.at_member_start(i, token);
            self.top_mut().member_start_next = false;

            if self.name_pending.is_some()
                && token.kind != TokenKind::Ident
                && !token.is_punct("*")
            {
                self.name_pending = None;
            }

            let role = match token.kind {
                TokenKind::Punct => {
                    self.punct(i, token, prev, member_start);
                    Role::Other
                }
                TokenKind::Keyword => self.keyword(i, token, prev, next, member_start),
                TokenKind::Ident => self.ident(token, prev, next, member_start),
                TokenKind::Str => self.string(i, prev, next, member_start),
                TokenKind::Template(part) => {
                    self.template(i, part);
                    Role::Other
                }
                TokenKind::Number | TokenKind::Regex | TokenKind::PrivateName => Role::Other,
            };
            self.roles[i] = role;
        }
    }

    fn at_member_start(&self, i: usize, token: &Token) -> bool {
        let frame = self.top();
        let prev = i.checked_sub(1).map(|p| &self.tokens[p]);
        let after_open = frame.open.is_some() && frame.open == i.checked_sub(1);
        match frame.kind {
            FrameKind::Brace(BraceKind::Object) => {
                frame.member_start_next || after_open || prev.is_some_and(|p| p.is_punct(","))
            }
            FrameKind::Brace(BraceKind::Class) => {
                frame.member_start_next
                    || after_open
                    || prev.is_some_and(|p| p.is_punct(";") || p.is_punct("}"))
                    || (token.newline_before && prev.is_some_and(|p| newline_required(p, token)))
            }
            _ => false,
        }
    }

    /// Binding context at the current position, if a name here declares something
    fn binding_target(&self, prev: Option<&Token>) -> Option<Binder> {
        let frame = self.top();
        if frame.awaiting_binding {
            return frame.decl;
        }
        let binder = frame.pattern?;
        if frame.in_default {
            return None;
        }
        let prev = prev?;
        let at_element = match frame.kind {
            FrameKind::Brace(BraceKind::Object) => prev.is_punct(":") || prev.is_punct("..."),
            FrameKind::Bracket | FrameKind::Paren => {
                prev.is_punct("(")
                    || prev.is_punct("[")
                    || prev.is_punct(",")
                    || prev.is_punct("...")
            }
            _ => false,
        };
        at_element.then_some(binder)
    }

    fn push(&mut self, kind: FrameKind, open: usize, pattern: Option<Binder>) {
        self.stack.push(Frame::new(kind, Some(open), pattern));
    }

    fn pop(&mut self) {
        if self.stack.len() > 1 {
            self.stack.pop();
        }
    }

    fn classify_brace(&mut self, i: usize, prev: Option<&Token>) -> BraceKind {
        let after_specifier = i >= 2
            && (self.tokens[i - 1].is_keyword("with") || self.tokens[i - 1].is_ident("assert"))
            && self.roles[i - 2] == Role::LockedStr;
        if self.top().import_clause
            || prev.is_some_and(|p| p.is_keyword("export"))
            || after_specifier
        {
            return BraceKind::ModuleList;
        }
        if self.class_pending.last() == Some(&self.stack.len()) {
            self.class_pending.pop();
            return BraceKind::Class;
        }
        let Some(prev) = prev else {
            return BraceKind::Block;
        };
        match prev.kind {
            TokenKind::Punct => match prev.text.as_str() {
                ")" | "]" | "}" | ";" | "{" | "=>" => BraceKind::Block,
                ":" if self.prev_colon_statement => BraceKind::Block,
                _ => BraceKind::Object,
            },
            TokenKind::Keyword if OBJECT_KEYWORDS.contains(&prev.text.as_str()) => {
                BraceKind::Object
            }
            TokenKind::Ident if prev.text == "of" => BraceKind::Object,
            TokenKind::Template(TemplatePart::Head | TemplatePart::Middle) => BraceKind::Object,
            _ => BraceKind::Block,
        }
    }

    fn punct(&mut self, i: usize, token: &Token, prev: Option<&Token>, member_start: bool) {
        match token.text.as_str() {
            "{" => {
                let kind = self.classify_brace(i, prev);
                let pattern = if kind == BraceKind::Object {
                    self.binding_target(prev)
                } else {
                    None
                };
                if pattern.is_some() {
                    self.top_mut().awaiting_binding = false;
                }
                self.braces[i] = Some(kind);
                self.push(FrameKind::Brace(kind), i, pattern);
            }
            "[" => {
                let pattern = if member_start {
                    None
                } else {
                    self.binding_target(prev)
                };
                if pattern.is_some() {
                    self.top_mut().awaiting_binding = false;
                }
                self.push(FrameKind::Bracket, i, pattern);
            }
            "(" => {
                let pattern = self.param_lists.contains(&i).then_some(Binder {
                    scope: BindingScope::Block,
                    exported: false,
                });
                self.push(FrameKind::Paren, i, pattern);
            }
            ")" | "]" | "}" => self.pop(),
            "," => {
                let frame = self.top_mut();
                if frame.decl.is_some() {
                    frame.awaiting_binding = true;
                }
                frame.in_default = false;
            }
            ";" => {
                let frame = self.top_mut();
                frame.decl = None;
                frame.awaiting_binding = false;
                frame.import_clause = false;
                frame.ternary = 0;
            }
            "=" => {
                let frame = self.top_mut();
                if frame.pattern.is_some() {
                    frame.in_default = true;
                }
            }
            "?" => self.top_mut().ternary += 1,
            ":" => {
                let statement = {
                    let frame = self.top();
                    frame.ternary == 0
                        && matches!(
                            frame.kind,
                            FrameKind::Root | FrameKind::Brace(BraceKind::Block)
                        )
                };
                self.prev_colon_statement = statement;
                let frame = self.top_mut();
                if frame.ternary > 0 {
                    frame.ternary -= 1;
                }
            }
            "*" if member_start => self.top_mut().member_start_next = true,
            _ => {}
        }
    }

    fn template(&mut self, i: usize, part: TemplatePart) {
        match part {
            TemplatePart::Full => {}
            TemplatePart::Head => self.push(FrameKind::Template, i, None),
            TemplatePart::Middle => {
                self.pop();
                self.push(FrameKind::Template, i, None);
            }
            TemplatePart::Tail => self.pop(),
        }
    }

    /// Whether a `function` or `class` keyword at `i` starts a declaration
    fn statement_start(&self, i: usize) -> bool {
        let mut at = i;
        if at > 0 && self.tokens[at - 1].is_ident("async") && !self.tokens[at].newline_before {
            at -= 1;
        }
        let Some(prev) = at.checked_sub(1).map(|p| &self.tokens[p]) else {
            return true;
        };
        match prev.kind {
            TokenKind::Punct => match prev.text.as_str() {
                ";" | "}" | ")" => true,
                "{" => matches!(
                    self.top().kind,
                    FrameKind::Root | FrameKind::Brace(BraceKind::Block)
                ),
                ":" => self.prev_colon_statement,
                _ => false,
            },
            TokenKind::Keyword => {
                matches!(prev.text.as_str(), "else" | "do" | "export" | "default")
            }
            _ => self.tokens[at].newline_before && newline_required(prev, &self.tokens[at]),
        }
    }

    fn exported(&self, i: usize) -> bool {
        let mut at = i;
        if at > 0 && self.tokens[at - 1].is_ident("async") {
            at -= 1;
        }
        at > 0 && self.tokens[at - 1].is_keyword("export")
    }

    fn keyword(
        &mut self,
        i: usize,
        token: &Token,
        prev: Option<&Token>,
        next: Option<&Token>,
        member_start: bool,
    ) -> Role {
        if member_start {
            match next.map(|n| n.text.as_str()) {
                Some(":") if self.top().kind == FrameKind::Brace(BraceKind::Object) => {
                    return Role::Key
                }
                Some("(") | Some(",") | Some("}") | Some("=") | Some(":") => return Role::Member,
                _ => {}
            }
        }
        if prev.is_some_and(|p| p.is_punct(".") || p.is_punct("?.")) {
            return Role::Property;
        }
        match token.text.as_str() {
            "var" | "let" | "const" => {
                let scope = if token.text == "var" {
                    BindingScope::Function
                } else {
                    BindingScope::Block
                };
                let exported = self.exported(i);
                let frame = self.top_mut();
                frame.decl = Some(Binder { scope, exported });
                frame.awaiting_binding = true;
            }
            "function" | "class" => {
                let scope = if token.text == "function" {
                    BindingScope::Function
                } else {
                    self.class_pending.push(self.stack.len());
                    BindingScope::Block
                };
                self.name_pending = Some(if self.statement_start(i) {
                    NamePending::Declaration(Binder {
                        scope,
                        exported: self.exported(i),
                    })
                } else {
                    NamePending::Expression
                });
            }
            "import" => {
                if !next.is_some_and(|n| n.is_punct("(") || n.is_punct(".")) {
                    self.top_mut().import_clause = true;
                }
            }
            "export" => {
                if next.is_some_and(|n| n.is_punct("*") || n.is_punct("{")) {
                    self.top_mut().import_clause = true;
                }
            }
            "with" => {
                if next.is_some_and(|n| n.is_punct("(")) {
                    self.dynamic_scope = true;
                }
            }
            _ => {}
        }
        Role::Other
    }

    fn ident(
        &mut self,
        token: &Token,
        prev: Option<&Token>,
        next: Option<&Token>,
        member_start: bool,
    ) -> Role {
        if let Some(pending) = self.name_pending.take() {
            return match pending {
                NamePending::Declaration(binder) => binder.role(),
                NamePending::Expression => Role::Other,
            };
        }

        let next_text = next.map(|n| n.text.as_str());
        let (kind, pattern, import_clause) = {
            let frame = self.top();
            (frame.kind, frame.pattern, frame.import_clause)
        };

        if kind == FrameKind::Brace(BraceKind::ModuleList) {
            return Role::Module;
        }
        if import_clause {
            if token.text == "from" && next.is_some_and(|n| n.kind == TokenKind::Str) {
                self.top_mut().import_clause = false;
                return Role::Other;
            }
            return Role::Module;
        }
        if prev.is_some_and(|p| p.is_punct(".") || p.is_punct("?.")) {
            return Role::Property;
        }
        if prev.is_some_and(|p| p.is_keyword("break") || p.is_keyword("continue"))
            && !token.newline_before
        {
            return Role::Label;
        }

        if member_start {
            let names_member = next.is_some_and(|n| {
                matches!(
                    n.kind,
                    TokenKind::Ident
                        | TokenKind::Keyword
                        | TokenKind::Str
                        | TokenKind::Number
                        | TokenKind::PrivateName
                ) || n.is_punct("[")
                    || n.is_punct("*")
            });
            match kind {
                FrameKind::Brace(BraceKind::Object) => {
                    if matches!(token.text.as_str(), "get" | "set" | "async") && names_member {
                        self.top_mut().member_start_next = true;
                        return Role::Other;
                    }
                    return match next_text {
                        Some(":") => Role::Key,
                        Some("(") => Role::Member,
                        Some(",") | Some("}") | Some("=") => match pattern {
                            Some(binder) => binder.shorthand_role(),
                            None => Role::Shorthand,
                        },
                        _ => Role::Reference,
                    };
                }
                FrameKind::Brace(BraceKind::Class) => {
                    if matches!(
                        token.text.as_str(),
                        "static" | "get" | "set" | "async" | "accessor"
                    ) && names_member
                    {
                        self.top_mut().member_start_next = true;
                        return Role::Other;
                    }
                    return Role::Member;
                }
                _ => {}
            }
        }

        if let Some(binder) = self.binding_target(prev) {
            self.top_mut().awaiting_binding = false;
            return binder.role();
        }
        if next_text == Some("=>") {
            return Role::Binding(BindingScope::Block);
        }

        let frame = self.top();
        let label_frame = matches!(
            frame.kind,
            FrameKind::Root | FrameKind::Brace(BraceKind::Block)
        );
        if next_text == Some(":") && label_frame && frame.ternary == 0 {
            let label_position = match prev {
                None => true,
                Some(p) if p.kind == TokenKind::Punct => {
                    matches!(p.text.as_str(), ";" | "{" | "}" | ")")
                        || (p.text == ":" && self.prev_colon_statement)
                        || (token.newline_before && newline_required(p, token))
                }
                Some(p) if p.kind == TokenKind::Keyword => {
                    matches!(p.text.as_str(), "else" | "do")
                }
                Some(p) => token.newline_before && newline_required(p, token),
            };
            if label_position {
                return Role::Label;
            }
        }

        if token.text == "eval" && next_text == Some("(") {
            self.dynamic_scope = true;
        }
        Role::Reference
    }

    fn string(
        &mut self,
        i: usize,
        prev: Option<&Token>,
        next: Option<&Token>,
        member_start: bool,
    ) -> Role {
        let (kind, import_clause) = {
            let frame = self.top();
            (frame.kind, frame.import_clause)
        };
        if kind == FrameKind::Brace(BraceKind::ModuleList) {
            return Role::LockedStr;
        }
        if import_clause {
            self.top_mut().import_clause = false;
            return Role::LockedStr;
        }
        let after_import = prev.is_some_and(|p| p.is_ident("from") || p.is_keyword("import"))
            || (i >= 2
                && prev.is_some_and(|p| p.is_punct("("))
                && self.tokens[i - 2].is_keyword("import"));
        if after_import {
            return Role::LockedStr;
        }
        if member_start {
            return Role::KeyStr;
        }
        if self.is_directive(i, prev, next) {
            return Role::LockedStr;
        }
        Role::Other
    }

    fn is_directive(&self, i: usize, prev: Option<&Token>, next: Option<&Token>) -> bool {
        let prologue_position = match prev {
            None => true,
            Some(p) if p.is_punct("{") => self.bodies.contains(&(i - 1)),
            Some(p) if p.is_punct(";") => i >= 2 && self.roles[i - 2] == Role::LockedStr,
            Some(_) => false,
        };
        if !prologue_position {
            return false;
        }
        let token = &self.tokens[i];
        match next {
            None => true,
            Some(n) => {
                n.is_punct(";")
                    || n.is_punct("}")
                    || (n.newline_before && newline_required(token, n))
            }
        }
    }
}
