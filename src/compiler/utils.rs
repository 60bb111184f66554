// ============================================================================
// spark-weave - Compiler Utilities
// Node queries, name mangling and prop injection shared by transforms
// ============================================================================

use std::sync::LazyLock;

use regex_lite::Regex;
use rustc_hash::FxHashMap;

use super::ast::{
    Callee, CompoundPart, DirectiveNode, ElementNode, ElementType, ExpressionNode, JsNode, ObjectExpression,
    PropNode, Property, RuntimeHelper, SimpleExpression, SourceLocation, TemplateNode, VNodeCall,
};
use super::parse::advance_position;
use super::transform::TransformContext;

// =============================================================================
// NAMES
// =============================================================================

/// Built-in components recognized by tag alone.
pub fn is_core_component(tag: &str) -> Option<RuntimeHelper> {
    match tag {
        "Teleport" | "teleport" => Some(RuntimeHelper::Teleport),
        "Suspense" | "suspense" => Some(RuntimeHelper::Suspense),
        "KeepAlive" | "keep-alive" => Some(RuntimeHelper::KeepAlive),
        "BaseTransition" | "base-transition" => Some(RuntimeHelper::BaseTransition),
        _ => None,
    }
}

/// `foo`, `$bar`, `_baz1`: a bare JavaScript identifier.
pub fn is_simple_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_digit() => false,
        Some(c) if c == '$' || c == '_' || c.is_ascii_alphanumeric() => {
            chars.all(|c| c == '$' || c == '_' || c.is_ascii_alphanumeric())
        }
        _ => false,
    }
}

static MEMBER_WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+[.\[]\s*|\s*[.\[]\s+").expect("member whitespace pattern"));

#[derive(Clone, Copy, PartialEq)]
enum MemberState {
    Access,
    Brackets,
    Parens,
    Str,
}

/// True for an assignable member expression: `a`, `a.b`, `a[b].c`,
/// `a.b(c)[d]`. Calls at the end are rejected.
pub fn is_member_expression(path: &str) -> bool {
    let path = MEMBER_WHITESPACE.replace_all(path.trim(), |caps: &regex_lite::Captures<'_>| {
        caps[0].trim().to_string()
    });
    let chars: Vec<char> = path.chars().collect();
    let mut state = MemberState::Access;
    let mut stack: Vec<MemberState> = Vec::new();
    let mut brackets = 0usize;
    let mut parens = 0usize;
    let mut quote: Option<char> = None;

    for (i, &c) in chars.iter().enumerate() {
        match state {
            MemberState::Access => {
                if c == '[' {
                    stack.push(state);
                    state = MemberState::Brackets;
                    brackets += 1;
                } else if c == '(' {
                    stack.push(state);
                    state = MemberState::Parens;
                    parens += 1;
                } else {
                    let valid = if i == 0 {
                        c.is_alphabetic() || c == '_' || c == '$' || (c as u32) >= 0xA0
                    } else {
                        c.is_alphanumeric() || c == '_' || c == '$' || c == '.' || c == '?' || (c as u32) >= 0xA0
                    };
                    if !valid {
                        return false;
                    }
                }
            }
            MemberState::Brackets => {
                if c == '\'' || c == '"' || c == '`' {
                    stack.push(state);
                    state = MemberState::Str;
                    quote = Some(c);
                } else if c == '[' {
                    brackets += 1;
                } else if c == ']' {
                    brackets -= 1;
                    if brackets == 0 {
                        state = stack.pop().unwrap_or(MemberState::Access);
                    }
                }
            }
            MemberState::Parens => {
                if c == '\'' || c == '"' || c == '`' {
                    stack.push(state);
                    state = MemberState::Str;
                    quote = Some(c);
                } else if c == '(' {
                    parens += 1;
                } else if c == ')' {
                    if i == chars.len() - 1 {
                        return false;
                    }
                    parens -= 1;
                    if parens == 0 {
                        state = stack.pop().unwrap_or(MemberState::Access);
                    }
                }
            }
            MemberState::Str => {
                if Some(c) == quote {
                    state = stack.pop().unwrap_or(MemberState::Access);
                    quote = None;
                }
            }
        }
    }
    !chars.is_empty() && brackets == 0 && parens == 0
}

/// `foo-bar` to `fooBar`.
pub fn camelize(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        match (c, chars.peek()) {
            ('-', Some(next)) if next.is_alphanumeric() || *next == '_' => {
                out.extend(next.to_uppercase());
                chars.next();
            }
            _ => out.push(c),
        }
    }
    out
}

pub fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// `click` to `onClick`.
pub fn to_handler_key(s: &str) -> String {
    if s.is_empty() {
        String::new()
    } else {
        format!("on{}", capitalize(s))
    }
}

/// Variable name a resolved asset is bound to: `_component_my_comp`.
pub fn to_valid_asset_id(name: &str, kind: &str) -> String {
    let mut id = format!("_{kind}_");
    for c in name.chars() {
        if c == '-' {
            id.push('_');
        } else if c.is_ascii_alphanumeric() || c == '_' {
            id.push(c);
        } else {
            id.push_str(&(c as u32).to_string());
        }
    }
    id
}

// =============================================================================
// NODE QUERIES
// =============================================================================

/// Index of the first directive named any of `names`. Directives without
/// an expression only match when `allow_empty` is set.
pub fn find_dir(element: &ElementNode, names: &[&str], allow_empty: bool) -> Option<usize> {
    element.props.iter().position(|p| match p {
        PropNode::Directive(d) => (allow_empty || d.exp.is_some()) && names.contains(&d.name.as_str()),
        PropNode::Attribute(_) => false,
    })
}

pub fn find_dir_node<'e>(element: &'e ElementNode, names: &[&str], allow_empty: bool) -> Option<&'e DirectiveNode> {
    find_dir(element, names, allow_empty).and_then(|i| element.props[i].as_directive())
}

/// True when `arg` is the static name `name`.
pub fn is_static_arg_of(arg: Option<&ExpressionNode>, name: &str) -> bool {
    matches!(arg, Some(ExpressionNode::Simple(e)) if e.is_static && e.content == name)
}

/// Index of attribute `name` or of `:name`.
pub fn find_prop(element: &ElementNode, name: &str, dynamic_only: bool, allow_empty: bool) -> Option<usize> {
    element.props.iter().position(|p| match p {
        PropNode::Attribute(a) => !dynamic_only && a.name == name && (a.value.is_some() || allow_empty),
        PropNode::Directive(d) => {
            d.name == "bind" && (d.exp.is_some() || allow_empty) && is_static_arg_of(d.arg.as_ref(), name)
        }
    })
}

pub fn is_template_node(node: &TemplateNode) -> bool {
    matches!(node, TemplateNode::Element(e) if e.tag_type == ElementType::Template)
}

pub fn is_slot_outlet(element: &ElementNode) -> bool {
    element.tag_type == ElementType::Slot
}

pub fn is_v_slot(prop: &PropNode) -> bool {
    matches!(prop, PropNode::Directive(d) if d.name == "slot")
}

/// Whether `exp` or anything under `node` reads an identifier in `ids`.
pub fn has_scope_ref(node: &TemplateNode, ids: &FxHashMap<String, usize>) -> bool {
    if ids.is_empty() {
        return false;
    }
    match node {
        TemplateNode::Element(e) => element_has_scope_ref(e, ids),
        TemplateNode::For(f) => {
            expression_has_scope_ref(&f.source, ids) || f.children.iter().any(|c| has_scope_ref(c, ids))
        }
        TemplateNode::If(n) => n.branches.iter().any(|b| {
            b.condition.as_ref().is_some_and(|c| expression_has_scope_ref(c, ids))
                || b.children.iter().any(|c| has_scope_ref(c, ids))
        }),
        TemplateNode::Interpolation(i) => expression_has_scope_ref(&i.content, ids),
        TemplateNode::Compound(c) => compound_has_scope_ref(&c.children, ids),
        TemplateNode::TextCall(t) => has_scope_ref(&t.content, ids),
        TemplateNode::Text(_) | TemplateNode::Comment(_) => false,
    }
}

pub fn element_has_scope_ref(e: &ElementNode, ids: &FxHashMap<String, usize>) -> bool {
    !ids.is_empty()
        && (e.props.iter().any(|p| match p {
            PropNode::Directive(d) => {
                d.arg.as_ref().is_some_and(|a| expression_has_scope_ref(a, ids))
                    || d.exp.as_ref().is_some_and(|x| expression_has_scope_ref(x, ids))
            }
            PropNode::Attribute(_) => false,
        }) || e.children.iter().any(|c| has_scope_ref(c, ids)))
}

pub fn expression_has_scope_ref(exp: &ExpressionNode, ids: &FxHashMap<String, usize>) -> bool {
    match exp {
        ExpressionNode::Simple(e) => simple_has_scope_ref(e, ids),
        ExpressionNode::Compound(c) => compound_has_scope_ref(&c.children, ids),
    }
}

fn simple_has_scope_ref(e: &SimpleExpression, ids: &FxHashMap<String, usize>) -> bool {
    !e.is_static && is_simple_identifier(&e.content) && ids.contains_key(&e.content)
}

fn compound_has_scope_ref(parts: &[CompoundPart], ids: &FxHashMap<String, usize>) -> bool {
    parts.iter().any(|p| match p {
        CompoundPart::Simple(e) => simple_has_scope_ref(e, ids),
        CompoundPart::Compound(c) => compound_has_scope_ref(&c.children, ids),
        CompoundPart::Interpolation(i) => expression_has_scope_ref(&i.content, ids),
        _ => false,
    })
}

/// Location of `length` bytes at `offset` inside `loc`'s source.
pub fn inner_range(loc: &SourceLocation, offset: usize, length: usize) -> SourceLocation {
    let source = &loc.source;
    let offset = offset.min(source.len());
    let end = (offset + length).min(source.len());
    let mut start = loc.start;
    advance_position(&mut start, source.get(..offset).unwrap_or_default());
    let mut stop = start;
    advance_position(&mut stop, source.get(offset..end).unwrap_or_default());
    SourceLocation::new(start, stop, source.get(offset..end).unwrap_or_default())
}

// =============================================================================
// CODEGEN HELPERS
// =============================================================================

/// Turn a vnode call into a block, swapping the creation helper.
pub fn make_block(node: &mut VNodeCall, ctx: &mut TransformContext) {
    if !node.is_block {
        let ssr = ctx.is_ssr();
        node.is_block = true;
        ctx.remove_helper(RuntimeHelper::vnode(false, ssr, node.is_component));
        ctx.helper(RuntimeHelper::OpenBlock);
        ctx.helper(RuntimeHelper::vnode(true, ssr, node.is_component));
    }
}

fn has_prop(prop: &Property, object: &ObjectExpression) -> bool {
    match &prop.key {
        ExpressionNode::Simple(key) => object.properties.iter().any(|p| {
            matches!(&p.key, ExpressionNode::Simple(existing) if existing.content == key.content)
        }),
        ExpressionNode::Compound(_) => false,
    }
}

/// Add `prop` (typically a `key`) in front of whatever props expression a
/// vnode or slot call already has.
pub fn inject_prop(props: &mut Option<JsNode>, prop: Property, ctx: &mut TransformContext) {
    *props = Some(match props.take() {
        None => JsNode::object(vec![prop]),
        Some(existing) => inject_into(existing, prop, ctx),
    });
}

fn merge_with(prop: Property, props: JsNode, ctx: &mut TransformContext) -> JsNode {
    let merge = ctx.helper(RuntimeHelper::MergeProps);
    JsNode::call(merge, vec![JsNode::object(vec![prop]), props])
}

fn inject_into(props: JsNode, prop: Property, ctx: &mut TransformContext) -> JsNode {
    match props {
        JsNode::Object(mut object) => {
            if !has_prop(&prop, &object) {
                object.properties.insert(0, prop);
            }
            JsNode::Object(object)
        }
        JsNode::Call(mut call) if call.callee == Callee::Helper(RuntimeHelper::NormalizeProps) && !call.arguments.is_empty() => {
            let inner = call.arguments.remove(0);
            let inner = match inner {
                JsNode::Call(guard)
                    if guard.callee == Callee::Helper(RuntimeHelper::GuardReactiveProps) && guard.arguments.len() == 1 =>
                {
                    // the merge result is already a fresh object
                    ctx.remove_helper(RuntimeHelper::GuardReactiveProps);
                    match guard.arguments.into_iter().next() {
                        Some(value) => inject_into(value, prop, ctx),
                        None => JsNode::object(Vec::new()),
                    }
                }
                other => inject_into(other, prop, ctx),
            };
            call.arguments.insert(0, inner);
            JsNode::Call(call)
        }
        JsNode::Call(mut call) => {
            if let Some(JsNode::Object(first)) = call.arguments.first_mut() {
                first.properties.insert(0, prop);
                JsNode::Call(call)
            } else if call.callee == Callee::Helper(RuntimeHelper::ToHandlers) {
                merge_with(prop, JsNode::Call(call), ctx)
            } else {
                call.arguments.insert(0, JsNode::object(vec![prop]));
                JsNode::Call(call)
            }
        }
        other => merge_with(prop, other, ctx),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::options::TransformOptions;
    use rstest::rstest;

    #[rstest]
    #[case("foo", true)]
    #[case("$foo_1", true)]
    #[case("1foo", false)]
    #[case("foo.bar", false)]
    #[case("", false)]
    fn simple_identifiers(#[case] input: &str, #[case] expected: bool) {
        assert_eq!(is_simple_identifier(input), expected);
    }

    #[rstest]
    #[case("obj.foo", true)]
    #[case("obj[key].bar", true)]
    #[case("obj [ 'a b' ] . c", true)]
    #[case("foo.bar(baz).qux", true)]
    #[case("foo()", false)]
    #[case("a + b", false)]
    #[case("1abc", false)]
    #[case("obj[key", false)]
    fn member_expressions(#[case] input: &str, #[case] expected: bool) {
        assert_eq!(is_member_expression(input), expected);
    }

    #[test]
    fn name_mangling() {
        assert_eq!(camelize("foo-bar-baz"), "fooBarBaz");
        assert_eq!(to_handler_key("click"), "onClick");
        assert_eq!(to_handler_key(&camelize("update-value")), "onUpdateValue");
        assert_eq!(to_valid_asset_id("my-comp", "component"), "_component_my_comp");
        assert_eq!(to_valid_asset_id("Foo.Bar", "component"), "_component_Foo46Bar");
    }

    #[test]
    fn inner_range_follows_lines() {
        let start = crate::compiler::ast::Position {
            offset: 10,
            line: 2,
            column: 5,
        };
        let loc = SourceLocation::new(start, start, "item in\n  items");
        let inner = inner_range(&loc, 10, 5);
        assert_eq!(inner.source, "items");
        assert_eq!((inner.start.line, inner.start.column, inner.start.offset), (3, 3, 20));
    }

    #[test]
    fn inject_prop_variants() {
        let mut ctx = TransformContext::new(TransformOptions::default());
        let key = || Property::new(SimpleExpression::literal("key"), JsNode::Code("0".into()));

        let mut props = None;
        inject_prop(&mut props, key(), &mut ctx);
        assert!(matches!(&props, Some(JsNode::Object(o)) if o.properties.len() == 1));
        // an existing key is not duplicated
        inject_prop(&mut props, key(), &mut ctx);
        assert!(matches!(&props, Some(JsNode::Object(o)) if o.properties.len() == 1));

        let mut bound = Some(JsNode::Simple(SimpleExpression::dynamic("attrs")));
        inject_prop(&mut bound, key(), &mut ctx);
        let Some(JsNode::Call(call)) = &bound else {
            panic!("expected mergeProps call");
        };
        assert_eq!(call.callee, Callee::Helper(RuntimeHelper::MergeProps));
        assert_eq!(ctx.helper_count(RuntimeHelper::MergeProps), 1);
    }
}
