// ============================================================================
// spark-weave - Parser
// Recursive-descent template parser with error recovery
// ============================================================================
//
// The parser never aborts: malformed input is reported through the error
// sink and recovered from (bogus comments, implicitly closed elements), so a
// best-effort tree is always produced. Every node's location covers its exact
// source text.
// ============================================================================

use std::sync::LazyLock;

use regex_lite::Regex;
use rustc_hash::FxHashSet;

use super::ast::{
    AttributeNode, CommentNode, ConstantType, DirectiveNode, ElementNode, ElementType, ExpressionNode,
    InterpolationNode, Namespace, Position, PropNode, RootNode, SimpleExpression, SourceLocation, TemplateNode,
    TextNode,
};
use super::errors::{CompilerError, ErrorCode};
use super::options::{ParserOptions, TextMode, WhitespaceStrategy};
use super::utils::is_core_component;

static TAG_OPEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^</?([a-z][^\t\r\n\x0C />]*)").expect("tag pattern"));
static ATTRIBUTE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\t\r\n\x0C />][^\t\r\n\x0C />=]*").expect("attribute name pattern"));
static DIRECTIVE_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(v-[A-Za-z0-9-]|:|\.|@|#)").expect("directive prefix pattern"));
static DIRECTIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:^v-([a-z0-9-]+))?(?:(?::|^\.|^@|^#)(\[[^\]]+\]|[^\.]+))?(.+)?$").expect("directive pattern")
});
static UNQUOTED_VALUE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\t\r\n\x0C >]+").expect("unquoted value pattern"));
static COMMENT_END: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"--(!)?>").expect("comment end pattern"));

/// HTML whitespace as the tokenizer sees it.
fn is_html_space(c: char) -> bool {
    matches!(c, '\t' | '\r' | '\n' | '\x0C' | ' ')
}

fn is_all_whitespace(s: &str) -> bool {
    s.chars().all(is_html_space)
}

/// Collapse every run of HTML whitespace to a single space.
fn condense_whitespace(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_space = false;
    for c in s.chars() {
        if is_html_space(c) {
            if !in_space {
                out.push(' ');
            }
            in_space = true;
        } else {
            out.push(c);
            in_space = false;
        }
    }
    out
}

/// Advance `pos` over `text`.
pub fn advance_position(pos: &mut Position, text: &str) {
    pos.offset += text.len();
    match text.rfind('\n') {
        Some(newline) => {
            pos.line += text.matches('\n').count();
            pos.column = text[newline + 1..].chars().count() + 1;
        }
        None => pos.column += text.chars().count(),
    }
}

#[derive(Clone, Copy, PartialEq)]
enum TagKind {
    Start,
    End,
}

struct ParserContext<'a> {
    options: &'a ParserOptions,
    original: &'a str,
    source: &'a str,
    cursor: Position,
    in_pre: bool,
    in_v_pre: bool,
}

impl<'a> ParserContext<'a> {
    fn new(content: &'a str, options: &'a ParserOptions) -> Self {
        Self {
            options,
            original: content,
            source: content,
            cursor: Position::default(),
            in_pre: false,
            in_v_pre: false,
        }
    }

    fn advance_by(&mut self, bytes: usize) {
        let bytes = bytes.min(self.source.len());
        advance_position(&mut self.cursor, &self.source[..bytes]);
        self.source = &self.source[bytes..];
    }

    fn advance_spaces(&mut self) {
        let spaces = self.source.len() - self.source.trim_start_matches(is_html_space).len();
        if spaces > 0 {
            self.advance_by(spaces);
        }
    }

    fn selection(&self, start: Position) -> SourceLocation {
        self.selection_between(start, self.cursor)
    }

    fn selection_between(&self, start: Position, end: Position) -> SourceLocation {
        let source = self.original.get(start.offset..end.offset).unwrap_or_default();
        SourceLocation::new(start, end, source)
    }

    /// Position `bytes` past `start`, which must lie in the original text.
    fn position_after(&self, start: Position, bytes: usize) -> Position {
        let mut pos = start;
        let end = (start.offset + bytes).min(self.original.len());
        if let Some(text) = self.original.get(start.offset..end) {
            advance_position(&mut pos, text);
        }
        pos
    }

    fn emit_error(&self, code: ErrorCode, offset: usize) {
        self.emit_error_at(code, offset, self.cursor);
    }

    fn emit_error_at(&self, code: ErrorCode, offset: usize, at: Position) {
        let mut pos = at;
        pos.offset += offset;
        pos.column += offset;
        let loc = SourceLocation::new(pos, pos, "");
        (self.options.on_error)(CompilerError::new(code, Some(loc)));
    }

    fn starts_with(&self, prefix: &str) -> bool {
        self.source.starts_with(prefix)
    }

    fn byte_at(&self, i: usize) -> Option<u8> {
        self.source.as_bytes().get(i).copied()
    }
}

/// Parse a template into a root node.
///
/// # Example
///
/// ```
/// use spark_weave::compiler::{base_parse, ParserOptions, TemplateNode};
///
/// let root = base_parse("<div>{{ a }} and {{ b }}</div>", &ParserOptions::default());
/// assert!(matches!(&root.children[0], TemplateNode::Element(e) if e.children.len() == 3));
/// ```
pub fn base_parse(content: &str, options: &ParserOptions) -> RootNode {
    let mut ctx = ParserContext::new(content, options);
    let start = ctx.cursor;
    let mut ancestors = Vec::new();
    let children = parse_children(&mut ctx, TextMode::Data, &mut ancestors);
    let loc = ctx.selection(start);
    tracing::trace!(target: "spark_weave::compiler", nodes = children.len(), "parsed template");
    RootNode::new(content, children, loc)
}

fn starts_with_end_tag_open(source: &str, tag: &str) -> bool {
    if !source.starts_with("</") {
        return false;
    }
    let Some(name) = source.get(2..2 + tag.len()) else {
        return false;
    };
    if !name.eq_ignore_ascii_case(tag) {
        return false;
    }
    match source.as_bytes().get(2 + tag.len()) {
        None => true,
        Some(b) => matches!(b, b'\t' | b'\r' | b'\n' | b'\x0C' | b' ' | b'/' | b'>'),
    }
}

fn is_end(ctx: &ParserContext<'_>, mode: TextMode, ancestors: &[ElementNode]) -> bool {
    let s = ctx.source;
    match mode {
        TextMode::Data => {
            if s.starts_with("</") && ancestors.iter().rev().any(|a| starts_with_end_tag_open(s, &a.tag)) {
                return true;
            }
        }
        TextMode::RcData | TextMode::RawText => {
            if ancestors.last().is_some_and(|parent| starts_with_end_tag_open(s, &parent.tag)) {
                return true;
            }
        }
        TextMode::CData => {
            if s.starts_with("]]>") {
                return true;
            }
        }
        TextMode::AttributeValue => {}
    }
    s.is_empty()
}

fn push_node(nodes: &mut Vec<TemplateNode>, node: TemplateNode) {
    if let TemplateNode::Text(text) = &node {
        if let Some(TemplateNode::Text(prev)) = nodes.last_mut() {
            if prev.loc.end.offset == text.loc.start.offset {
                prev.content.push_str(&text.content);
                prev.loc.end = text.loc.end;
                prev.loc.source.push_str(&text.loc.source);
                return;
            }
        }
    }
    nodes.push(node);
}

fn parse_children(ctx: &mut ParserContext<'_>, mode: TextMode, ancestors: &mut Vec<ElementNode>) -> Vec<TemplateNode> {
    let ns = ancestors.last().map(|p| p.ns).unwrap_or_default();
    let mut nodes: Vec<TemplateNode> = Vec::new();

    while !is_end(ctx, mode, ancestors) {
        let mut parsed: Vec<TemplateNode> = Vec::new();
        if matches!(mode, TextMode::Data | TextMode::RcData) {
            if !ctx.in_v_pre && ctx.starts_with(&ctx.options.delimiters.0) {
                if let Some(node) = parse_interpolation(ctx, mode) {
                    parsed.push(node);
                }
            } else if mode == TextMode::Data && ctx.starts_with("<") {
                let s = ctx.source;
                let second = ctx.byte_at(1);
                if s.len() == 1 {
                    ctx.emit_error(ErrorCode::EofBeforeTagName, 1);
                } else if second == Some(b'!') {
                    if s.starts_with("<!--") {
                        parsed.push(parse_comment(ctx));
                    } else if s.starts_with("<!DOCTYPE") {
                        parsed.push(parse_bogus_comment(ctx));
                    } else if s.starts_with("<![CDATA[") {
                        if ns != Namespace::Html {
                            parsed.extend(parse_cdata(ctx, ancestors));
                        } else {
                            ctx.emit_error(ErrorCode::CdataInHtmlContent, 0);
                            parsed.push(parse_bogus_comment(ctx));
                        }
                    } else {
                        ctx.emit_error(ErrorCode::IncorrectlyOpenedComment, 0);
                        parsed.push(parse_bogus_comment(ctx));
                    }
                } else if second == Some(b'/') {
                    match ctx.byte_at(2) {
                        None => ctx.emit_error(ErrorCode::EofBeforeTagName, 2),
                        Some(b'>') => {
                            ctx.emit_error(ErrorCode::MissingEndTagName, 2);
                            ctx.advance_by(3);
                            continue;
                        }
                        Some(c) if c.is_ascii_alphabetic() => {
                            ctx.emit_error(ErrorCode::InvalidEndTag, 0);
                            let parent = ancestors.last();
                            parse_tag(ctx, TagKind::End, parent);
                            continue;
                        }
                        Some(_) => {
                            ctx.emit_error(ErrorCode::InvalidFirstCharacterOfTagName, 2);
                            parsed.push(parse_bogus_comment(ctx));
                        }
                    }
                } else if second.is_some_and(|c| c.is_ascii_alphabetic()) {
                    parsed.push(parse_element(ctx, ancestors));
                } else if second == Some(b'?') {
                    ctx.emit_error(ErrorCode::UnexpectedQuestionMarkInsteadOfTagName, 1);
                    parsed.push(parse_bogus_comment(ctx));
                } else {
                    ctx.emit_error(ErrorCode::InvalidFirstCharacterOfTagName, 1);
                }
            }
        }
        if parsed.is_empty() {
            parsed.push(parse_text(ctx, mode));
        }
        for node in parsed {
            push_node(&mut nodes, node);
        }
    }

    if matches!(mode, TextMode::RawText | TextMode::RcData) {
        return nodes;
    }

    let condense = ctx.options.whitespace == WhitespaceStrategy::Condense;
    let mut slots: Vec<Option<TemplateNode>> = nodes.into_iter().map(Some).collect();
    for i in 0..slots.len() {
        let remove = match &slots[i] {
            Some(TemplateNode::Text(text)) if !ctx.in_pre => {
                if is_all_whitespace(&text.content) {
                    let prev = if i > 0 { slots[i - 1].as_ref() } else { None };
                    let next = slots.get(i + 1).and_then(Option::as_ref);
                    match (prev, next) {
                        (Some(prev), Some(next)) => {
                            condense
                                && (matches!(prev, TemplateNode::Comment(_))
                                    || matches!(next, TemplateNode::Comment(_))
                                    || (matches!(prev, TemplateNode::Element(_))
                                        && matches!(next, TemplateNode::Element(_))
                                        && text.content.contains(['\r', '\n'])))
                        }
                        _ => true,
                    }
                } else {
                    false
                }
            }
            Some(TemplateNode::Comment(_)) => !ctx.options.comments,
            _ => false,
        };
        if remove {
            slots[i] = None;
        } else if let Some(TemplateNode::Text(text)) = &mut slots[i] {
            if !ctx.in_pre {
                if is_all_whitespace(&text.content) {
                    text.content = " ".to_string();
                } else if condense {
                    text.content = condense_whitespace(&text.content);
                }
            }
        }
    }
    let mut nodes: Vec<TemplateNode> = slots.into_iter().flatten().collect();

    if ctx.in_pre {
        if let Some(parent) = ancestors.last() {
            if (ctx.options.is_pre_tag)(&parent.tag) {
                if let Some(TemplateNode::Text(first)) = nodes.first_mut() {
                    if let Some(rest) = first.content.strip_prefix("\r\n").or_else(|| first.content.strip_prefix('\n')) {
                        first.content = rest.to_string();
                    }
                }
            }
        }
    }
    nodes
}

fn parse_cdata(ctx: &mut ParserContext<'_>, ancestors: &mut Vec<ElementNode>) -> Vec<TemplateNode> {
    ctx.advance_by(9);
    let nodes = parse_children(ctx, TextMode::CData, ancestors);
    if ctx.source.is_empty() {
        ctx.emit_error(ErrorCode::EofInCdata, 0);
    } else {
        ctx.advance_by(3);
    }
    nodes
}

fn parse_comment(ctx: &mut ParserContext<'_>) -> TemplateNode {
    let start = ctx.cursor;
    let content;
    match COMMENT_END.captures(ctx.source) {
        None => {
            content = ctx.source.get(4..).unwrap_or_default().to_string();
            ctx.advance_by(ctx.source.len());
            ctx.emit_error(ErrorCode::EofInComment, 0);
        }
        Some(caps) => {
            let Some(whole) = caps.get(0) else {
                unreachable!("group 0 always participates in a match")
            };
            let (index, matched_len) = (whole.start(), whole.len());
            if index <= 3 {
                ctx.emit_error(ErrorCode::AbruptClosingOfEmptyComment, 0);
            }
            if caps.get(1).is_some() {
                ctx.emit_error(ErrorCode::IncorrectlyClosedComment, 0);
            }
            content = ctx.source.get(4..index).unwrap_or_default().to_string();

            let source = ctx.source;
            let body = &source[..index];
            let mut prev_index = 1;
            let mut nested: Vec<usize> = Vec::new();
            while let Some(found) = body.get(prev_index..).and_then(|rest| rest.find("<!--")) {
                let nested_index = prev_index + found;
                nested.push(nested_index);
                prev_index = nested_index + 1;
            }
            let mut consumed = 1;
            for nested_index in nested {
                ctx.advance_by(nested_index - consumed + 1);
                if nested_index + 4 < body.len() {
                    ctx.emit_error(ErrorCode::NestedComment, 0);
                }
                consumed = nested_index + 1;
            }
            ctx.advance_by(index + matched_len - consumed + 1);
        }
    }
    TemplateNode::Comment(CommentNode {
        content,
        loc: ctx.selection(start),
    })
}

fn parse_bogus_comment(ctx: &mut ParserContext<'_>) -> TemplateNode {
    let start = ctx.cursor;
    let content_start = if ctx.byte_at(1) == Some(b'?') { 1 } else { 2 };
    let content = match ctx.source.find('>') {
        None => {
            let content = ctx.source.get(content_start..).unwrap_or_default().to_string();
            ctx.advance_by(ctx.source.len());
            content
        }
        Some(close) => {
            let content = ctx.source.get(content_start..close).unwrap_or_default().to_string();
            ctx.advance_by(close + 1);
            content
        }
    };
    TemplateNode::Comment(CommentNode {
        content,
        loc: ctx.selection(start),
    })
}

fn parse_element(ctx: &mut ParserContext<'_>, ancestors: &mut Vec<ElementNode>) -> TemplateNode {
    let was_in_pre = ctx.in_pre;
    let was_in_v_pre = ctx.in_v_pre;
    let Some(mut element) = parse_tag(ctx, TagKind::Start, ancestors.last()) else {
        unreachable!("start tags always produce an element")
    };
    let is_pre_boundary = ctx.in_pre && !was_in_pre;
    let is_v_pre_boundary = ctx.in_v_pre && !was_in_v_pre;

    if element.is_self_closing || (ctx.options.is_void_tag)(&element.tag) {
        if is_pre_boundary {
            ctx.in_pre = false;
        }
        if is_v_pre_boundary {
            ctx.in_v_pre = false;
        }
        return TemplateNode::Element(Box::new(element));
    }

    let mode = (ctx.options.get_text_mode)(&element, ancestors.last());
    ancestors.push(element);
    let children = parse_children(ctx, mode, ancestors);
    let Some(popped) = ancestors.pop() else {
        unreachable!("the element pushed above is still on the stack")
    };
    element = popped;
    element.children = children;

    if starts_with_end_tag_open(ctx.source, &element.tag) {
        parse_tag(ctx, TagKind::End, ancestors.last());
    } else {
        ctx.emit_error_at(ErrorCode::MissingEndTag, 0, element.loc.start);
        if ctx.source.is_empty() && element.tag.eq_ignore_ascii_case("script") {
            if let Some(first) = element.children.first() {
                if first.loc().source.starts_with("<!--") {
                    ctx.emit_error(ErrorCode::EofInScriptHtmlCommentLikeText, 0);
                }
            }
        }
    }

    element.loc = ctx.selection(element.loc.start);
    if is_pre_boundary {
        ctx.in_pre = false;
    }
    if is_v_pre_boundary {
        ctx.in_v_pre = false;
    }
    TemplateNode::Element(Box::new(element))
}

fn is_special_template_directive(name: &str) -> bool {
    matches!(name, "if" | "else" | "else-if" | "for" | "slot")
}

fn is_component(ctx: &ParserContext<'_>, tag: &str, props: &[PropNode]) -> bool {
    let options = ctx.options;
    if (options.is_custom_element)(tag) {
        return false;
    }
    if tag == "component"
        || tag.starts_with(|c: char| c.is_ascii_uppercase())
        || is_core_component(tag).is_some()
        || (options.is_built_in_component)(tag).is_some()
        || options.is_native_tag.as_ref().is_some_and(|native| !native(tag))
    {
        return true;
    }
    props.iter().any(|p| match p {
        PropNode::Attribute(a) => a.name == "is" && a.value.as_ref().is_some_and(|v| v.content.starts_with("vue:")),
        PropNode::Directive(d) => d.name == "is",
    })
}

/// Parse a start or end tag. End tags are consumed and return `None`.
fn parse_tag(ctx: &mut ParserContext<'_>, kind: TagKind, parent: Option<&ElementNode>) -> Option<ElementNode> {
    let start = ctx.cursor;
    let (tag, matched_len) = {
        let caps = TAG_OPEN.captures(ctx.source)?;
        let whole = caps.get(0)?;
        (caps.get(1)?.as_str().to_string(), whole.len())
    };
    let ns = (ctx.options.get_namespace)(&tag, parent);

    ctx.advance_by(matched_len);
    ctx.advance_spaces();

    let attributes_cursor = ctx.cursor;
    let attributes_source = ctx.source;

    if (ctx.options.is_pre_tag)(&tag) {
        ctx.in_pre = true;
    }

    let mut props = parse_attributes(ctx, kind);

    if kind == TagKind::Start
        && !ctx.in_v_pre
        && props.iter().any(|p| matches!(p, PropNode::Directive(d) if d.name == "pre"))
    {
        ctx.in_v_pre = true;
        ctx.cursor = attributes_cursor;
        ctx.source = attributes_source;
        props = parse_attributes(ctx, kind)
            .into_iter()
            .filter(|p| !matches!(p, PropNode::Attribute(a) if a.name == "v-pre"))
            .collect();
    }

    let mut is_self_closing = false;
    if ctx.source.is_empty() {
        ctx.emit_error(ErrorCode::EofInTag, 0);
    } else {
        is_self_closing = ctx.starts_with("/>");
        if kind == TagKind::End && is_self_closing {
            ctx.emit_error(ErrorCode::EndTagWithTrailingSolidus, 0);
        }
        ctx.advance_by(if is_self_closing { 2 } else { 1 });
    }

    if kind == TagKind::End {
        return None;
    }

    let mut tag_type = ElementType::Element;
    if !ctx.in_v_pre {
        if tag == "slot" {
            tag_type = ElementType::Slot;
        } else if tag == "template" {
            if props
                .iter()
                .any(|p| matches!(p, PropNode::Directive(d) if is_special_template_directive(&d.name)))
            {
                tag_type = ElementType::Template;
            }
        } else if is_component(ctx, &tag, &props) {
            tag_type = ElementType::Component;
        }
    }

    Some(ElementNode {
        ns,
        tag,
        tag_type,
        props,
        is_self_closing,
        children: Vec::new(),
        loc: ctx.selection(start),
        codegen: None,
    })
}

fn parse_attributes(ctx: &mut ParserContext<'_>, kind: TagKind) -> Vec<PropNode> {
    let mut props = Vec::new();
    let mut names: FxHashSet<String> = FxHashSet::default();
    while !ctx.source.is_empty() && !ctx.starts_with(">") && !ctx.starts_with("/>") {
        if ctx.starts_with("/") {
            ctx.emit_error(ErrorCode::UnexpectedSolidusInTag, 0);
            ctx.advance_by(1);
            ctx.advance_spaces();
            continue;
        }
        if kind == TagKind::End {
            ctx.emit_error(ErrorCode::EndTagWithAttributes, 0);
        }

        let mut attr = parse_attribute(ctx, &mut names);

        if let PropNode::Attribute(a) = &mut attr {
            if a.name == "class" {
                if let Some(value) = &mut a.value {
                    value.content = value.content.split_whitespace().collect::<Vec<_>>().join(" ");
                }
            }
        }

        if kind == TagKind::Start {
            props.push(attr);
        }

        if ctx.source.starts_with(|c: char| !is_html_space(c) && c != '/' && c != '>') {
            ctx.emit_error(ErrorCode::MissingWhitespaceBetweenAttributes, 0);
        }
        ctx.advance_spaces();
    }
    props
}

struct AttributeValue {
    content: String,
    is_quoted: bool,
    loc: SourceLocation,
}

fn parse_attribute(ctx: &mut ParserContext<'_>, names: &mut FxHashSet<String>) -> PropNode {
    let start = ctx.cursor;
    let name = ATTRIBUTE_NAME
        .find(ctx.source)
        .map(|m| m.as_str().to_string())
        .unwrap_or_default();

    if !names.insert(name.clone()) {
        ctx.emit_error(ErrorCode::DuplicateAttribute, 0);
    }
    if name.starts_with('=') {
        ctx.emit_error(ErrorCode::UnexpectedEqualsSignBeforeAttributeName, 0);
    }
    for (i, _) in name.match_indices(['"', '\'', '<']) {
        ctx.emit_error(ErrorCode::UnexpectedCharacterInAttributeName, i);
    }
    // a lone character the name pattern cannot take, e.g. `=`
    ctx.advance_by(name.len().max(1));

    let mut value: Option<AttributeValue> = None;
    if ctx.source.trim_start_matches(is_html_space).starts_with('=') {
        ctx.advance_spaces();
        ctx.advance_by(1);
        ctx.advance_spaces();
        value = parse_attribute_value(ctx);
        if value.is_none() {
            ctx.emit_error(ErrorCode::MissingAttributeValue, 0);
        }
    }
    let loc = ctx.selection(start);

    if !ctx.in_v_pre && DIRECTIVE_PREFIX.is_match(&name) {
        return PropNode::Directive(directive_from_attribute(ctx, &name, start, value, loc));
    }

    if !ctx.in_v_pre && name.starts_with("v-") {
        ctx.emit_error(ErrorCode::MissingDirectiveName, 0);
    }

    PropNode::Attribute(AttributeNode {
        name,
        value: value.map(|v| TextNode {
            content: v.content,
            loc: v.loc,
        }),
        loc,
    })
}

fn directive_from_attribute(
    ctx: &ParserContext<'_>,
    name: &str,
    start: Position,
    value: Option<AttributeValue>,
    loc: SourceLocation,
) -> DirectiveNode {
    let caps = DIRECTIVE.captures(name);
    let group = |i: usize| caps.as_ref().and_then(|c| c.get(i)).map(|m| m.as_str());
    let (explicit, raw_arg, rest) = (group(1), group(2), group(3));

    let is_prop_shorthand = name.starts_with('.');
    let dir_name = match explicit {
        Some(n) => n.to_string(),
        None if is_prop_shorthand || name.starts_with(':') => "bind".to_string(),
        None if name.starts_with('@') => "on".to_string(),
        None => "slot".to_string(),
    };

    let arg = raw_arg.map(|raw| {
        let is_slot = dir_name == "slot";
        let start_offset = name.rfind(raw).unwrap_or(0);
        let extra = if is_slot { rest.unwrap_or_default().len() } else { 0 };
        let arg_start = ctx.position_after(start, start_offset);
        let arg_end = ctx.position_after(start, start_offset + raw.len() + extra);
        let arg_loc = ctx.selection_between(arg_start, arg_end);

        let mut content = raw.to_string();
        let mut is_static = true;
        if let Some(inner) = content.strip_prefix('[') {
            is_static = false;
            content = match inner.strip_suffix(']') {
                Some(dynamic) => dynamic.to_string(),
                None => {
                    ctx.emit_error(ErrorCode::MissingDynamicDirectiveArgumentEnd, 0);
                    inner.to_string()
                }
            };
        } else if is_slot {
            // slot names may contain dots
            content.push_str(rest.unwrap_or_default());
        }
        ExpressionNode::Simple(SimpleExpression::new(content, is_static, arg_loc, ConstantType::NotConstant))
    });

    let exp = value.map(|v| {
        let mut value_loc = v.loc;
        if v.is_quoted {
            value_loc.start.offset += 1;
            value_loc.start.column += 1;
            let mut end = value_loc.start;
            advance_position(&mut end, &v.content);
            value_loc.end = end;
            let source = &value_loc.source;
            value_loc.source = source
                .get(1..source.len().saturating_sub(1))
                .unwrap_or_default()
                .to_string();
        }
        ExpressionNode::Simple(SimpleExpression::new(v.content, false, value_loc, ConstantType::NotConstant))
    });

    let mut modifiers: Vec<String> = match rest {
        Some(r) => r
            .get(1..)
            .unwrap_or_default()
            .split('.')
            .map(str::to_string)
            .collect(),
        None => Vec::new(),
    };
    if is_prop_shorthand {
        modifiers.push("prop".to_string());
    }

    DirectiveNode {
        name: dir_name,
        exp,
        arg,
        modifiers,
        loc,
        parse_result: None,
    }
}

fn parse_attribute_value(ctx: &mut ParserContext<'_>) -> Option<AttributeValue> {
    let start = ctx.cursor;
    let quote = ctx.source.chars().next();
    let is_quoted = matches!(quote, Some('"') | Some('\''));

    let content = if let Some(q) = quote.filter(|_| is_quoted) {
        ctx.advance_by(1);
        match ctx.source.find(q) {
            None => {
                let len = ctx.source.len();
                parse_text_data(ctx, len, TextMode::AttributeValue)
            }
            Some(end) => {
                let content = parse_text_data(ctx, end, TextMode::AttributeValue);
                ctx.advance_by(1);
                content
            }
        }
    } else {
        let raw = UNQUOTED_VALUE.find(ctx.source)?.as_str();
        for (i, _) in raw.match_indices(['"', '\'', '<', '=', '`']) {
            ctx.emit_error(ErrorCode::UnexpectedCharacterInUnquotedAttributeValue, i);
        }
        let len = raw.len();
        parse_text_data(ctx, len, TextMode::AttributeValue)
    };

    Some(AttributeValue {
        content,
        is_quoted,
        loc: ctx.selection(start),
    })
}

fn parse_interpolation(ctx: &mut ParserContext<'_>, mode: TextMode) -> Option<TemplateNode> {
    let (open, close) = (ctx.options.delimiters.0.clone(), ctx.options.delimiters.1.clone());
    let Some(close_index) = ctx.source.get(open.len()..).and_then(|s| s.find(&close)).map(|i| i + open.len()) else {
        ctx.emit_error(ErrorCode::MissingInterpolationEnd, 0);
        return None;
    };

    let start = ctx.cursor;
    ctx.advance_by(open.len());
    let mut inner_start = ctx.cursor;
    let mut inner_end = ctx.cursor;
    let raw_len = close_index - open.len();
    let raw_content = ctx.source.get(..raw_len).unwrap_or_default().to_string();
    let pre_trim = parse_text_data(ctx, raw_len, mode);
    let content = pre_trim.trim().to_string();

    let start_offset = pre_trim.find(&content).unwrap_or(0);
    if start_offset > 0 {
        advance_position(&mut inner_start, raw_content.get(..start_offset).unwrap_or_default());
    }
    let end_offset = raw_len.saturating_sub(pre_trim.len() - content.len() - start_offset);
    advance_position(&mut inner_end, raw_content.get(..end_offset).unwrap_or_default());
    ctx.advance_by(close.len());

    let inner_loc = ctx.selection_between(inner_start, inner_end);
    Some(TemplateNode::Interpolation(InterpolationNode {
        content: ExpressionNode::Simple(SimpleExpression::new(content, false, inner_loc, ConstantType::NotConstant)),
        loc: ctx.selection(start),
    }))
}

fn parse_text(ctx: &mut ParserContext<'_>, mode: TextMode) -> TemplateNode {
    let delimiter = ctx.options.delimiters.0.clone();
    let end_tokens: [&str; 2] = if mode == TextMode::CData {
        ["]]>", "]]>"]
    } else {
        ["<", delimiter.as_str()]
    };
    let mut end_index = ctx.source.len();
    for token in end_tokens {
        // search from the second character so a leading token is text
        let from = ctx.source.char_indices().nth(1).map(|(i, _)| i).unwrap_or(ctx.source.len());
        if let Some(found) = ctx.source.get(from..).and_then(|s| s.find(token)) {
            end_index = end_index.min(from + found);
        }
    }

    let start = ctx.cursor;
    let content = parse_text_data(ctx, end_index, mode);
    TemplateNode::Text(TextNode {
        content,
        loc: ctx.selection(start),
    })
}

fn parse_text_data(ctx: &mut ParserContext<'_>, length: usize, mode: TextMode) -> String {
    let raw = ctx.source.get(..length).unwrap_or(ctx.source).to_string();
    ctx.advance_by(raw.len());
    if matches!(mode, TextMode::RawText | TextMode::CData) || !raw.contains('&') {
        raw
    } else {
        (ctx.options.decode_entities)(&raw, mode == TextMode::AttributeValue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn parse_collecting(src: &str, options: ParserOptions) -> (RootNode, Vec<ErrorCode>) {
        let errors = Rc::new(RefCell::new(Vec::new()));
        let options = ParserOptions {
            on_error: Rc::new({
                let errors = errors.clone();
                move |e: CompilerError| errors.borrow_mut().push(e.code)
            }),
            ..options
        };
        let root = base_parse(src, &options);
        let errors = errors.borrow().clone();
        (root, errors)
    }

    fn parse(src: &str) -> RootNode {
        parse_collecting(src, ParserOptions::default()).0
    }

    fn element(node: &TemplateNode) -> &ElementNode {
        match node {
            TemplateNode::Element(e) => e,
            other => panic!("expected element, got {other:?}"),
        }
    }

    fn directive(prop: &PropNode) -> &DirectiveNode {
        match prop {
            PropNode::Directive(d) => d,
            other => panic!("expected directive, got {other:?}"),
        }
    }

    fn simple(exp: &Option<ExpressionNode>) -> &SimpleExpression {
        match exp {
            Some(ExpressionNode::Simple(e)) => e,
            other => panic!("expected simple expression, got {other:?}"),
        }
    }

    // =========================================================================
    // Text and interpolation
    // =========================================================================

    #[test]
    fn interpolations_and_text_split() {
        let root = parse("<div>{{ a }} and {{ b }}</div>");
        let div = element(&root.children[0]);
        assert_eq!(div.children.len(), 3);
        let TemplateNode::Interpolation(first) = &div.children[0] else {
            panic!("expected interpolation");
        };
        let exp = first.content.as_simple().map(|e| e.content.clone());
        assert_eq!(exp.as_deref(), Some("a"));
        assert_eq!(first.loc.source, "{{ a }}");
        assert_eq!(first.content.loc().source, "a");
        assert_eq!(first.content.loc().start.column, 9);
        assert!(matches!(&div.children[1], TemplateNode::Text(t) if t.content == " and "));
    }

    #[test]
    fn entities_are_decoded_in_text_and_attributes() {
        let root = parse(r#"<p title="a &amp; b">x &lt; y</p>"#);
        let p = element(&root.children[0]);
        assert!(matches!(&p.children[0], TemplateNode::Text(t) if t.content == "x < y" && t.loc.source == "x &lt; y"));
        let PropNode::Attribute(title) = &p.props[0] else {
            panic!("expected attribute");
        };
        assert_eq!(title.value.as_ref().map(|v| v.content.as_str()), Some("a & b"));
    }

    #[test]
    fn missing_interpolation_end_is_text() {
        let (root, errors) = parse_collecting("{{ a", ParserOptions::default());
        assert_eq!(errors, vec![ErrorCode::MissingInterpolationEnd]);
        assert!(matches!(&root.children[0], TemplateNode::Text(t) if t.content == "{{ a"));
    }

    #[test]
    fn custom_delimiters() {
        let options = ParserOptions {
            delimiters: ("${".into(), "}".into()),
            ..ParserOptions::default()
        };
        let (root, _) = parse_collecting("<p>${ x }</p>", options);
        let p = element(&root.children[0]);
        assert!(matches!(&p.children[0], TemplateNode::Interpolation(_)));
    }

    // =========================================================================
    // Whitespace
    // =========================================================================

    #[test]
    fn whitespace_is_condensed_and_trimmed() {
        let root = parse("  <div>\n  <span/>\n  <span/>  </div>  ");
        assert_eq!(root.children.len(), 1);
        let div = element(&root.children[0]);
        // newline whitespace between elements is removed; trailing whitespace too
        assert_eq!(div.children.len(), 2);

        let root = parse("<p>a   \n b</p>");
        let p = element(&root.children[0]);
        assert!(matches!(&p.children[0], TemplateNode::Text(t) if t.content == "a b"));
    }

    #[test]
    fn whitespace_between_inline_elements_becomes_single_space() {
        let root = parse("<b>x</b>   <i>y</i>");
        assert_eq!(root.children.len(), 3);
        assert!(matches!(&root.children[1], TemplateNode::Text(t) if t.content == " "));
    }

    #[test]
    fn preserve_mode_keeps_whitespace_between_elements() {
        let options = ParserOptions {
            whitespace: WhitespaceStrategy::Preserve,
            ..ParserOptions::default()
        };
        let (root, _) = parse_collecting("<a/>\n<b/>", options);
        assert_eq!(root.children.len(), 3);
    }

    #[test]
    fn pre_keeps_whitespace_and_drops_leading_newline() {
        let (root, _) = parse_collecting("<pre>\n  a  b\n</pre>", ParserOptions::html());
        let pre = element(&root.children[0]);
        assert!(matches!(&pre.children[0], TemplateNode::Text(t) if t.content == "  a  b\n"));
    }

    // =========================================================================
    // Comments
    // =========================================================================

    #[test]
    fn comments_are_kept_or_dropped() {
        let root = parse("<!-- hi --><div/>");
        assert!(matches!(&root.children[0], TemplateNode::Comment(c) if c.content == " hi "));

        let options = ParserOptions {
            comments: false,
            ..ParserOptions::default()
        };
        let (root, _) = parse_collecting("<!-- hi --><div/>", options);
        assert_eq!(root.children.len(), 1);
    }

    #[test]
    fn comment_errors() {
        let (_, errors) = parse_collecting("<!-->", ParserOptions::default());
        assert_eq!(errors, vec![ErrorCode::AbruptClosingOfEmptyComment]);

        let (_, errors) = parse_collecting("<!-- a --!>", ParserOptions::default());
        assert_eq!(errors, vec![ErrorCode::IncorrectlyClosedComment]);

        let (_, errors) = parse_collecting("<!-- a <!-- b -->", ParserOptions::default());
        assert_eq!(errors, vec![ErrorCode::NestedComment]);

        let (root, errors) = parse_collecting("<!-- open", ParserOptions::default());
        assert_eq!(errors, vec![ErrorCode::EofInComment]);
        assert_eq!(root.children[0].loc().source, "<!-- open");
    }

    #[test]
    fn bogus_comments_recover() {
        let (root, errors) = parse_collecting("<!DOCTYPE html><?xml?>", ParserOptions::default());
        assert_eq!(errors, vec![ErrorCode::UnexpectedQuestionMarkInsteadOfTagName]);
        assert!(matches!(&root.children[0], TemplateNode::Comment(c) if c.content == "DOCTYPE html"));
        assert!(matches!(&root.children[1], TemplateNode::Comment(c) if c.content == "?xml?"));
    }

    #[test]
    fn cdata_only_in_foreign_content() {
        let (_, errors) = parse_collecting("<div><![CDATA[x]]></div>", ParserOptions::html());
        assert_eq!(errors, vec![ErrorCode::CdataInHtmlContent]);

        let (root, errors) = parse_collecting("<svg><![CDATA[a<b]]></svg>", ParserOptions::html());
        assert!(errors.is_empty());
        let svg = element(&root.children[0]);
        assert!(matches!(&svg.children[0], TemplateNode::Text(t) if t.content == "a<b"));
    }

    // =========================================================================
    // Elements
    // =========================================================================

    #[test]
    fn element_tag_types() {
        let root = parse("<div/><Comp/><slot/><template v-if=\"x\"/><template/><component is=\"x\"/><keep-alive/>");
        let types: Vec<ElementType> = root.children.iter().map(|n| element(n).tag_type).collect();
        assert_eq!(
            types,
            vec![
                ElementType::Element,
                ElementType::Component,
                ElementType::Slot,
                ElementType::Template,
                ElementType::Element,
                ElementType::Component,
                ElementType::Component,
            ]
        );
    }

    #[test]
    fn native_tag_option_marks_unknown_tags_as_components() {
        let options = ParserOptions {
            is_native_tag: Some(Rc::new(|tag: &str| tag == "div")),
            ..ParserOptions::default()
        };
        let (root, _) = parse_collecting("<div/><my-comp/>", options);
        assert_eq!(element(&root.children[1]).tag_type, ElementType::Component);
    }

    #[test]
    fn void_tags_need_no_end_tag() {
        let (root, errors) = parse_collecting("<div><img src=\"a\"><br></div>", ParserOptions::html());
        assert!(errors.is_empty());
        assert_eq!(element(&root.children[0]).children.len(), 2);
    }

    #[test]
    fn missing_end_tag_closes_implicitly() {
        let (root, errors) = parse_collecting("<div><span>text</div>", ParserOptions::default());
        assert_eq!(errors, vec![ErrorCode::MissingEndTag]);
        let div = element(&root.children[0]);
        let span = element(&div.children[0]);
        assert_eq!(span.loc.source, "<span>text");
        assert_eq!(div.loc.source, "<div><span>text</div>");
    }

    #[test]
    fn stray_end_tag_is_reported() {
        let (root, errors) = parse_collecting("<div></span></div>", ParserOptions::default());
        assert_eq!(errors, vec![ErrorCode::InvalidEndTag]);
        assert_eq!(root.children.len(), 1);
    }

    #[test]
    fn raw_text_and_rcdata_modes() {
        let (root, _) = parse_collecting("<script>a<b && {{ c }}</script>", ParserOptions::html());
        let script = element(&root.children[0]);
        assert_eq!(script.children.len(), 1);
        assert!(matches!(&script.children[0], TemplateNode::Text(t) if t.content == "a<b && {{ c }}"));

        let (root, _) = parse_collecting("<textarea>&lt;{{ c }}</textarea>", ParserOptions::html());
        let textarea = element(&root.children[0]);
        assert!(matches!(&textarea.children[0], TemplateNode::Text(t) if t.content == "<"));
        assert!(matches!(&textarea.children[1], TemplateNode::Interpolation(_)));
    }

    #[test]
    fn end_tag_matching_is_case_insensitive() {
        let (root, errors) = parse_collecting("<DIV>x</div>", ParserOptions::default());
        assert!(errors.is_empty());
        assert_eq!(element(&root.children[0]).tag, "DIV");
    }

    #[test]
    fn tag_errors() {
        let (_, errors) = parse_collecting("<", ParserOptions::default());
        assert_eq!(errors, vec![ErrorCode::EofBeforeTagName]);

        let (_, errors) = parse_collecting("</>", ParserOptions::default());
        assert_eq!(errors, vec![ErrorCode::MissingEndTagName]);

        let (_, errors) = parse_collecting("<div", ParserOptions::default());
        assert!(errors.contains(&ErrorCode::EofInTag));

        let (_, errors) = parse_collecting("<div></div foo>", ParserOptions::default());
        assert_eq!(errors, vec![ErrorCode::EndTagWithAttributes]);

        let (_, errors) = parse_collecting("<div></div/>", ParserOptions::default());
        assert_eq!(errors, vec![ErrorCode::EndTagWithTrailingSolidus]);

        let (_, errors) = parse_collecting("<1>", ParserOptions::default());
        assert_eq!(errors, vec![ErrorCode::InvalidFirstCharacterOfTagName]);
    }

    // =========================================================================
    // Attributes and directives
    // =========================================================================

    #[test]
    fn attribute_errors() {
        let (_, errors) = parse_collecting("<div a a></div>", ParserOptions::default());
        assert_eq!(errors, vec![ErrorCode::DuplicateAttribute]);

        let (_, errors) = parse_collecting("<div a=></div>", ParserOptions::default());
        assert_eq!(errors, vec![ErrorCode::MissingAttributeValue]);

        let (_, errors) = parse_collecting("<div a=\"1\"b=\"2\"></div>", ParserOptions::default());
        assert_eq!(errors, vec![ErrorCode::MissingWhitespaceBetweenAttributes]);

        let (_, errors) = parse_collecting("<div a=b'c></div>", ParserOptions::default());
        assert_eq!(errors, vec![ErrorCode::UnexpectedCharacterInUnquotedAttributeValue]);

        let (_, errors) = parse_collecting("<div a\"b></div>", ParserOptions::default());
        assert_eq!(errors, vec![ErrorCode::UnexpectedCharacterInAttributeName]);

        let (_, errors) = parse_collecting("<div v-=\"x\"></div>", ParserOptions::default());
        assert_eq!(errors, vec![ErrorCode::MissingDirectiveName]);
    }

    #[test]
    fn class_whitespace_is_normalized() {
        let root = parse("<div class=\"  a \n b  \"/>");
        let PropNode::Attribute(class) = &element(&root.children[0]).props[0] else {
            panic!("expected attribute");
        };
        assert_eq!(class.value.as_ref().map(|v| v.content.as_str()), Some("a b"));
    }

    #[test]
    fn directive_shorthands() {
        let root = parse(r#"<div v-on:click.stop.prevent="go" :id="x" @input="y" .value="z" #header v-bind:[key]="v" v-if="ok"/>"#);
        let props = &element(&root.children[0]).props;

        let on = directive(&props[0]);
        assert_eq!(on.name, "on");
        assert_eq!(simple(&on.arg).content, "click");
        assert_eq!(on.modifiers, vec!["stop", "prevent"]);
        assert_eq!(simple(&on.exp).content, "go");
        assert_eq!(simple(&on.exp).loc.source, "go");

        let bind = directive(&props[1]);
        assert_eq!((bind.name.as_str(), simple(&bind.arg).content.as_str()), ("bind", "id"));

        assert_eq!(directive(&props[2]).name, "on");

        let prop = directive(&props[3]);
        assert_eq!(prop.name, "bind");
        assert_eq!(prop.modifiers, vec!["prop"]);

        let slot = directive(&props[4]);
        assert_eq!(slot.name, "slot");
        assert_eq!(simple(&slot.arg).content, "header");
        assert!(slot.exp.is_none());

        let dynamic = directive(&props[5]);
        assert!(!simple(&dynamic.arg).is_static);
        assert_eq!(simple(&dynamic.arg).content, "key");
        assert_eq!(simple(&dynamic.arg).loc.source, "[key]");

        let v_if = directive(&props[6]);
        assert_eq!(v_if.name, "if");
        assert!(v_if.arg.is_none());
    }

    #[test]
    fn slot_names_keep_dots() {
        let root = parse("<Comp><template #item.name=\"{ x }\"/></Comp>");
        let template = element(&element(&root.children[0]).children[0]);
        let slot = directive(&template.props[0]);
        assert_eq!(simple(&slot.arg).content, "item.name");
    }

    #[test]
    fn missing_dynamic_argument_end() {
        let (_, errors) = parse_collecting("<div v-bind:[foo=\"bar\"/>", ParserOptions::default());
        assert!(errors.contains(&ErrorCode::MissingDynamicDirectiveArgumentEnd));
    }

    #[test]
    fn v_pre_keeps_directives_as_attributes() {
        let root = parse("<div v-pre :id=\"x\">{{ raw }}<span v-if=\"y\"/></div><p :a=\"b\"/>");
        let div = element(&root.children[0]);
        assert!(div.props.iter().all(|p| matches!(p, PropNode::Attribute(_))));
        assert!(!div.props.iter().any(|p| matches!(p, PropNode::Attribute(a) if a.name == "v-pre")));
        assert!(matches!(&div.children[0], TemplateNode::Text(t) if t.content == "{{ raw }}"));
        let span = element(&div.children[1]);
        assert!(matches!(&span.props[0], PropNode::Attribute(a) if a.name == "v-if"));

        let p = element(&root.children[1]);
        assert!(matches!(&p.props[0], PropNode::Directive(_)));
    }

    // =========================================================================
    // Locations
    // =========================================================================

    #[test]
    fn locations_track_lines_and_columns() {
        let root = parse("<div>\n  <span>x</span>\n</div>");
        let div = element(&root.children[0]);
        let span = element(&div.children[0]);
        assert_eq!(span.loc.start.line, 2);
        assert_eq!(span.loc.start.column, 3);
        assert_eq!(span.loc.source, "<span>x</span>");
        assert_eq!(div.loc.end.line, 3);
        assert_eq!(root.loc.source, "<div>\n  <span>x</span>\n</div>");
    }

    #[test]
    fn top_level_sources_concatenate_to_input() {
        let src = "a<b c=\"d\">{{ e }}</b><!--f-->g";
        let root = parse(src);
        let joined: String = root.children.iter().map(|n| n.loc().source.as_str()).collect();
        assert_eq!(joined, src);
    }
}
