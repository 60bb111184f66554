// ============================================================================
// spark-weave - Expression Prefixing
// Rewrites free identifiers in template expressions to `_ctx.` accesses
// ============================================================================
//
// Expressions are tokenized, not fully parsed. The token stream is enough to
// tell references from member names, object keys and bindings introduced by
// arrow functions, `function` params and `let`/`const`/`var`. Regex literals
// are not recognized.
// ============================================================================

use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::compiler::ast::{
    CompoundExpression, CompoundPart, ConstantType, ExpressionNode, PropNode, SimpleExpression, TemplateNode,
};
use crate::compiler::errors::{CompilerError, ErrorCode};
use crate::compiler::transform::{ExitFns, NodeCursor, NodeTransform, TransformContext};
use crate::compiler::utils::{inner_range, is_simple_identifier};

const ALLOWED_GLOBALS: &[&str] = &[
    "Infinity",
    "undefined",
    "NaN",
    "isFinite",
    "isNaN",
    "parseFloat",
    "parseInt",
    "decodeURI",
    "decodeURIComponent",
    "encodeURI",
    "encodeURIComponent",
    "Math",
    "Number",
    "Date",
    "Array",
    "Object",
    "Boolean",
    "String",
    "RegExp",
    "Map",
    "Set",
    "JSON",
    "Intl",
    "BigInt",
    "require",
];

const LITERALS: &[&str] = &["true", "false", "null", "this"];

const KEYWORDS: &[&str] = &[
    "typeof", "instanceof", "in", "of", "new", "delete", "void", "await", "async", "function", "return", "var",
    "let", "const", "if", "else", "for", "while", "do", "switch", "case", "break", "continue", "throw", "try",
    "catch", "finally", "class", "extends", "super", "yield", "import", "export", "default", "debugger", "with",
];

/// Longest first, so the first prefix match wins.
const PUNCTUATORS: &[&str] = &[
    ">>>=", "...", "===", "!==", "**=", "<<=", ">>=", ">>>", "&&=", "||=", "??=", "?.", "=>", "==", "!=", "<=",
    ">=", "&&", "||", "??", "++", "--", "+=", "-=", "*=", "/=", "%=", "&=", "|=", "^=", "**", "<<", ">>", "{", "}",
    "(", ")", "[", "]", ";", ",", "<", ">", "+", "-", "*", "/", "%", "&", "|", "^", "!", "~", "?", ":", "=", ".",
    "@", "#",
];

pub fn is_globally_allowed(name: &str) -> bool {
    ALLOWED_GLOBALS.contains(&name)
}

fn is_keyword(name: &str) -> bool {
    KEYWORDS.contains(&name)
}

// =============================================================================
// TOKENIZER
// =============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TokenKind {
    Ident,
    Number,
    Str,
    /// A piece of a template literal, up to and including `${` or the closing backtick
    Template,
    Punct,
}

#[derive(Clone, Copy, Debug)]
struct Token {
    kind: TokenKind,
    start: usize,
    end: usize,
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$' || (c as u32) >= 0xA0
}

fn is_ident_part(c: char) -> bool {
    is_ident_start(c) || c.is_ascii_digit()
}

struct Lexer<'s> {
    src: &'s str,
    pos: usize,
    tokens: Vec<Token>,
    /// Open brackets; a backtick marks a `${` inside a template literal
    brackets: Vec<char>,
}

impl<'s> Lexer<'s> {
    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn peek_second(&self) -> Option<char> {
        self.src[self.pos..].chars().nth(1)
    }

    fn bump(&mut self) {
        if let Some(c) = self.peek() {
            self.pos += c.len_utf8();
        }
    }

    fn push(&mut self, kind: TokenKind, start: usize) {
        self.tokens.push(Token {
            kind,
            start,
            end: self.pos,
        });
    }

    fn run(mut self) -> Result<Vec<Token>, String> {
        while let Some(c) = self.peek() {
            let start = self.pos;
            if c.is_whitespace() {
                self.bump();
            } else if is_ident_start(c) {
                while self.peek().is_some_and(is_ident_part) {
                    self.bump();
                }
                self.push(TokenKind::Ident, start);
            } else if c.is_ascii_digit() || (c == '.' && self.peek_second().is_some_and(|n| n.is_ascii_digit())) {
                self.number();
                self.push(TokenKind::Number, start);
            } else if c == '\'' || c == '"' {
                self.string(c)?;
                self.push(TokenKind::Str, start);
            } else if c == '`' {
                self.bump();
                self.template(start)?;
            } else if c == '}' && self.brackets.last() == Some(&'`') {
                self.brackets.pop();
                self.bump();
                self.template(start)?;
            } else {
                self.punct(c)?;
            }
        }
        match self.brackets.last() {
            Some('`') => Err("Unterminated template.".to_string()),
            Some(_) => Err("Unexpected token, expected a closing bracket.".to_string()),
            None => Ok(self.tokens),
        }
    }

    fn number(&mut self) {
        let mut prev = '\0';
        while let Some(c) = self.peek() {
            let exponent_sign = (c == '+' || c == '-') && (prev == 'e' || prev == 'E');
            if !(c.is_ascii_alphanumeric() || c == '.' || c == '_' || exponent_sign) {
                break;
            }
            prev = c;
            self.bump();
        }
    }

    fn string(&mut self, quote: char) -> Result<(), String> {
        self.bump();
        loop {
            match self.peek() {
                None | Some('\n') => return Err("Unterminated string constant.".to_string()),
                Some('\\') => {
                    self.bump();
                    self.bump();
                }
                Some(c) if c == quote => {
                    self.bump();
                    return Ok(());
                }
                Some(_) => self.bump(),
            }
        }
    }

    fn template(&mut self, start: usize) -> Result<(), String> {
        loop {
            match self.peek() {
                None => return Err("Unterminated template.".to_string()),
                Some('\\') => {
                    self.bump();
                    self.bump();
                }
                Some('`') => {
                    self.bump();
                    self.push(TokenKind::Template, start);
                    return Ok(());
                }
                Some('$') if self.peek_second() == Some('{') => {
                    self.bump();
                    self.bump();
                    self.push(TokenKind::Template, start);
                    self.brackets.push('`');
                    return Ok(());
                }
                Some(_) => self.bump(),
            }
        }
    }

    fn punct(&mut self, c: char) -> Result<(), String> {
        let rest = &self.src[self.pos..];
        let Some(mut punct) = PUNCTUATORS.iter().copied().find(|p| rest.starts_with(p)) else {
            return Err(format!("Unexpected character '{c}'."));
        };
        // `a?.5:b` is a conditional
        if punct == "?." && rest[2..].starts_with(|d: char| d.is_ascii_digit()) {
            punct = "?";
        }
        match punct {
            "(" | "[" | "{" => self.brackets.push(c),
            ")" | "]" | "}" => {
                let open = match punct {
                    ")" => '(',
                    "]" => '[',
                    _ => '{',
                };
                if self.brackets.pop() != Some(open) {
                    return Err(format!("Unexpected token '{punct}'."));
                }
            }
            _ => {}
        }
        let start = self.pos;
        self.pos += punct.len();
        self.push(TokenKind::Punct, start);
        Ok(())
    }
}

fn tokenize(src: &str) -> Result<Vec<Token>, String> {
    Lexer {
        src,
        pos: 0,
        tokens: Vec::new(),
        brackets: Vec::new(),
    }
    .run()
}

fn text<'s>(src: &'s str, token: &Token) -> &'s str {
    &src[token.start..token.end]
}

fn is_value(src: &str, token: &Token) -> bool {
    match token.kind {
        TokenKind::Number | TokenKind::Str => true,
        TokenKind::Ident => !is_keyword(text(src, token)),
        TokenKind::Template | TokenKind::Punct => false,
    }
}

/// Catches what the tokenizer alone lets through: two operands in a row and
/// a dangling operator at the end.
fn check_syntax(src: &str, tokens: &[Token], statements: bool) -> Result<(), String> {
    for pair in tokens.windows(2) {
        // statements may follow each other on separate lines
        let separated = statements && src[pair[0].end..pair[1].start].contains('\n');
        if !separated && is_value(src, &pair[0]) && is_value(src, &pair[1]) {
            return Err(format!("Unexpected token '{}'.", text(src, &pair[1])));
        }
    }
    if let Some(last) = tokens.last() {
        let dangling = match last.kind {
            TokenKind::Punct => !matches!(text(src, last), ")" | "]" | "}" | ";" | "++" | "--"),
            TokenKind::Ident => is_keyword(text(src, last)),
            _ => false,
        };
        if dangling {
            return Err("Unexpected end of expression.".to_string());
        }
    }
    Ok(())
}

// =============================================================================
// ANALYSIS
// =============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Role {
    /// Free identifier read from the render context
    Context { shorthand: bool },
    /// Declared in the expression or by an enclosing v-for / v-slot
    Local,
    Global,
}

struct Scope {
    names: Vec<String>,
    depth: usize,
    ends_at_separator: bool,
}

struct Analysis {
    ids: Vec<(Token, Role)>,
    /// Identifiers the expression itself declares at its root
    declared: Vec<String>,
}

fn matching_brackets(src: &str, tokens: &[Token]) -> Vec<Option<usize>> {
    let mut matches = vec![None; tokens.len()];
    let mut stack = Vec::new();
    for (i, token) in tokens.iter().enumerate() {
        if token.kind != TokenKind::Punct {
            continue;
        }
        match text(src, token) {
            "(" | "[" | "{" => stack.push(i),
            ")" | "]" | "}" => {
                if let Some(open) = stack.pop() {
                    matches[open] = Some(i);
                }
            }
            _ => {}
        }
    }
    matches
}

/// Mark bindings and destructuring keys in a parameter or declaration
/// pattern; default values stay ordinary expressions.
fn mark_pattern(
    src: &str,
    tokens: &[Token],
    range: std::ops::Range<usize>,
    bindings: &mut [bool],
    keys: &mut [bool],
) -> Vec<String> {
    let mut names = Vec::new();
    let mut open: Vec<&str> = Vec::new();
    let mut default_depth: Option<usize> = None;
    for k in range {
        let token = tokens[k];
        let value = text(src, &token);
        match token.kind {
            TokenKind::Punct => match value {
                "(" | "[" | "{" => open.push(value),
                ")" | "]" | "}" => {
                    open.pop();
                    if default_depth.is_some_and(|d| open.len() < d) {
                        default_depth = None;
                    }
                }
                "," if default_depth == Some(open.len()) => default_depth = None,
                "=" if default_depth.is_none() => default_depth = Some(open.len()),
                _ => {}
            },
            TokenKind::Ident if default_depth.is_none() && !is_keyword(value) => {
                let next = tokens.get(k + 1).map(|n| text(src, n));
                if next == Some(":") && open.last() == Some(&"{") {
                    keys[k] = true;
                } else {
                    bindings[k] = true;
                    names.push(value.to_string());
                }
            }
            _ => {}
        }
    }
    names
}

/// Parameter range of a function starting at token `i`, if one does.
fn params_at(src: &str, tokens: &[Token], matches: &[Option<usize>], i: usize) -> Option<std::ops::Range<usize>> {
    let token = tokens[i];
    let value = text(src, &token);
    let next_is_arrow = |j: usize| tokens.get(j).is_some_and(|t| text(src, t) == "=>");
    let after_dot = i > 0 && matches!(text(src, &tokens[i - 1]), "." | "?.");
    match token.kind {
        TokenKind::Ident if value == "function" => {
            let mut p = i + 1;
            if tokens.get(p).is_some_and(|t| t.kind == TokenKind::Ident) {
                p += 1;
            }
            let close = matches.get(p).copied().flatten()?;
            (text(src, &tokens[p]) == "(").then_some(p + 1..close)
        }
        TokenKind::Ident if !after_dot && !is_keyword(value) && next_is_arrow(i + 1) => Some(i..i + 1),
        TokenKind::Punct if value == "(" => {
            let close = matches[i]?;
            next_is_arrow(close + 1).then_some(i + 1..close)
        }
        _ => None,
    }
}

fn analyze(src: &str, tokens: &[Token], as_params: bool, known: &FxHashMap<String, usize>) -> Analysis {
    let n = tokens.len();
    let matches = matching_brackets(src, tokens);
    let mut bindings = vec![false; n];
    let mut keys = vec![false; n];
    let mut scopes: Vec<Scope> = Vec::new();
    let mut declared = Vec::new();

    if as_params {
        declared = mark_pattern(src, tokens, 0..n, &mut bindings, &mut keys);
        scopes.push(Scope {
            names: declared.clone(),
            depth: 0,
            ends_at_separator: false,
        });
    }

    let mut open: Vec<&str> = Vec::new();
    let mut ids = Vec::new();

    for i in 0..n {
        let token = tokens[i];
        let value = text(src, &token);

        if !as_params {
            if let Some(range) = params_at(src, tokens, &matches, i) {
                let names = mark_pattern(src, tokens, range, &mut bindings, &mut keys);
                let at_root = i == 0 || (i == 1 && text(src, &tokens[0]) == "async");
                if at_root && declared.is_empty() {
                    declared = names.clone();
                }
                scopes.push(Scope {
                    names,
                    depth: open.len(),
                    ends_at_separator: true,
                });
            } else if matches!(value, "let" | "const" | "var") && token.kind == TokenKind::Ident {
                let end = match tokens.get(i + 1) {
                    Some(t) if t.kind == TokenKind::Ident => Some(i + 2),
                    Some(_) => matches.get(i + 1).copied().flatten().map(|close| close + 1),
                    None => None,
                };
                if let Some(end) = end {
                    let names = mark_pattern(src, tokens, i + 1..end, &mut bindings, &mut keys);
                    scopes.push(Scope {
                        names,
                        depth: open.len(),
                        ends_at_separator: false,
                    });
                }
            }
        }

        match token.kind {
            TokenKind::Punct => match value {
                "(" | "[" | "{" => open.push(value),
                ")" | "]" | "}" => {
                    open.pop();
                    let depth = open.len();
                    scopes.retain(|s| s.depth <= depth);
                }
                "," | ";" => {
                    let depth = open.len();
                    scopes.retain(|s| !(s.ends_at_separator && s.depth == depth));
                }
                _ => {}
            },
            TokenKind::Ident => {
                if is_keyword(value) || LITERALS.contains(&value) || keys[i] {
                    continue;
                }
                if bindings[i] {
                    ids.push((token, Role::Local));
                    continue;
                }
                let prev = (i > 0).then(|| text(src, &tokens[i - 1]));
                let next = tokens.get(i + 1).map(|t| text(src, t));
                if matches!(prev, Some("." | "?.")) {
                    continue;
                }
                let in_object = open.last() == Some(&"{") && matches!(prev, Some("{" | ","));
                if in_object && next == Some(":") {
                    continue;
                }
                let local = known.contains_key(value) || scopes.iter().any(|s| s.names.iter().any(|name| name == value));
                let role = if local {
                    Role::Local
                } else if is_globally_allowed(value) {
                    Role::Global
                } else {
                    Role::Context {
                        shorthand: in_object && matches!(next, Some("}" | ",")),
                    }
                };
                ids.push((token, role));
            }
            _ => {}
        }
    }

    Analysis { ids, declared }
}

// =============================================================================
// PROCESSING
// =============================================================================

/// Prefix the free identifiers of `node` when `prefix_identifiers` is on.
///
/// `as_params` treats the content as a parameter pattern (v-for aliases,
/// slot props): its bindings are recorded as the result's identifiers and
/// never prefixed. `as_raw_statements` allows statement lists.
pub fn process_expression(
    mut node: SimpleExpression,
    ctx: &mut TransformContext,
    as_params: bool,
    as_raw_statements: bool,
) -> ExpressionNode {
    if !ctx.options.prefix_identifiers || node.content.trim().is_empty() {
        return node.into();
    }
    let raw = node.content.clone();
    let bail_constant = raw.contains('(') || raw.find('.').is_some_and(|at| at > 0);

    if is_simple_identifier(&raw) {
        let is_scope_var = ctx.is_identifier_in_scope(&raw);
        let is_global = is_globally_allowed(&raw);
        let is_literal = LITERALS.contains(&raw.as_str());
        if !as_params && !is_scope_var && !is_global && !is_literal {
            node.content = format!("_ctx.{raw}");
        } else if !is_scope_var {
            node.const_type = if is_literal {
                ConstantType::CanStringify
            } else {
                ConstantType::CanHoist
            };
        }
        return node.into();
    }

    let tokens = match tokenize(&raw).and_then(|tokens| check_syntax(&raw, &tokens, as_raw_statements).map(|_| tokens)) {
        Ok(tokens) => tokens,
        Err(detail) => {
            ctx.on_error(CompilerError::with_detail(
                ErrorCode::InvalidExpression,
                Some(node.loc.clone()),
                &detail,
            ));
            return node.into();
        }
    };

    let Analysis { mut ids, declared } = analyze(&raw, &tokens, as_params, &ctx.identifiers);
    ids.sort_by_key(|(token, _)| token.start);

    if ids.is_empty() {
        node.const_type = if bail_constant {
            ConstantType::NotConstant
        } else {
            ConstantType::CanStringify
        };
        node.identifiers = declared;
        return node.into();
    }

    let mut children = Vec::with_capacity(ids.len() * 2 + 1);
    let mut last_end = 0;
    for (token, role) in &ids {
        let name = &raw[token.start..token.end];
        let mut leading = raw[last_end..token.start].to_string();
        let (content, const_type) = match role {
            Role::Context { shorthand } => {
                if *shorthand {
                    leading.push_str(name);
                    leading.push_str(": ");
                }
                (format!("_ctx.{name}"), ConstantType::NotConstant)
            }
            Role::Local => (name.to_string(), ConstantType::NotConstant),
            Role::Global if bail_constant => (name.to_string(), ConstantType::NotConstant),
            Role::Global => (name.to_string(), ConstantType::CanStringify),
        };
        if !leading.is_empty() {
            children.push(CompoundPart::Str(leading));
        }
        let loc = inner_range(&node.loc, token.start, token.end - token.start);
        children.push(CompoundPart::Simple(SimpleExpression::new(content, false, loc, const_type)));
        last_end = token.end;
    }
    if last_end < raw.len() {
        children.push(CompoundPart::Str(raw[last_end..].to_string()));
    }

    let mut compound = CompoundExpression::new(children, node.loc);
    compound.identifiers = declared;
    ExpressionNode::Compound(compound)
}

/// Processes interpolations, directive expressions and dynamic arguments.
/// `v-for` is handled by its own transform, as is `v-on` with an argument.
pub fn transform_expression() -> NodeTransform {
    Rc::new(|cursor: &mut NodeCursor<'_>, ctx: &mut TransformContext| {
        match cursor.node() {
            Some(TemplateNode::Interpolation(interpolation)) => {
                if let ExpressionNode::Simple(exp) = &interpolation.content {
                    let exp = exp.clone();
                    interpolation.content = process_expression(exp, ctx, false, false);
                }
            }
            Some(TemplateNode::Element(element)) => {
                for prop in element.props.iter_mut() {
                    let PropNode::Directive(dir) = prop else {
                        continue;
                    };
                    if dir.name == "for" {
                        continue;
                    }
                    if !(dir.name == "on" && dir.arg.is_some()) {
                        if let Some(ExpressionNode::Simple(exp)) = &dir.exp {
                            let exp = exp.clone();
                            dir.exp = Some(process_expression(exp, ctx, dir.name == "slot", false));
                        }
                    }
                    if let Some(ExpressionNode::Simple(arg)) = &dir.arg {
                        if !arg.is_static {
                            let arg = arg.clone();
                            dir.arg = Some(process_expression(arg, ctx, false, false));
                        }
                    }
                }
            }
            _ => {}
        }
        ExitFns::new()
    })
}
