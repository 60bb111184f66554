// ============================================================================
// spark-weave - v-for
// Replaces an element with a for node rendering its children through
// `renderList`
// ============================================================================

use std::sync::LazyLock;

use regex_lite::Regex;

use crate::compiler::ast::{
    ChildRef, ConstantType, DirectiveNode, ElementType, ExpressionNode, ForNode, ForParseResult, JsNode, PatchFlags,
    PropNode, Property, RuntimeHelper, SimpleExpression, SourceLocation, TemplateNode, TextNode, VNodeChildren,
    VNodeTag,
};
use crate::compiler::errors::ErrorCode;
use crate::compiler::transform::{create_vnode_call, ExitFn, NodeCursor, NodeTransform, TransformContext};
use crate::compiler::utils::{find_prop, inner_range, is_slot_outlet};

use super::{create_structural_directive_transform, inject_key, process_expression};

static FOR_ALIAS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([\s\S]*?)\s+(?:in|of)\s+([\s\S]*)").expect("for alias pattern"));
static FOR_ITERATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r",([^,\}\]]*)(?:,([^,\}\]]*))?$").expect("for iterator pattern"));

pub fn transform_for() -> NodeTransform {
    create_structural_directive_transform(&["for"], process_for)
}

/// Byte range of `s[start..end]` with surrounding whitespace removed.
fn trim_range(s: &str, start: usize, end: usize) -> (usize, usize) {
    let slice = &s[start..end];
    let leading = slice.len() - slice.trim_start().len();
    let trailing = slice.len() - slice.trim_end().len();
    if leading == slice.len() {
        return (start, start);
    }
    (start + leading, end - trailing)
}

fn alias(
    input: &SimpleExpression,
    start: usize,
    end: usize,
    ctx: &mut TransformContext,
    as_params: bool,
) -> ExpressionNode {
    let content = &input.content[start..end];
    let loc = inner_range(&input.loc, start, end - start);
    let exp = SimpleExpression::new(content, false, loc, ConstantType::NotConstant);
    if ctx.options.prefix_identifiers {
        process_expression(exp, ctx, as_params, false)
    } else {
        exp.into()
    }
}

/// Split `(value, key, index) in source` into its parts. Aliases are
/// processed as parameter patterns when prefixing identifiers.
pub fn parse_for_expression(input: &SimpleExpression, ctx: &mut TransformContext) -> Option<ForParseResult> {
    let exp = input.content.as_str();
    let caps = FOR_ALIAS.captures(exp)?;
    let lhs = caps.get(1)?;
    let rhs = caps.get(2)?;

    let (source_start, source_end) = trim_range(exp, rhs.start(), rhs.end());
    let source = alias(input, source_start, source_end, ctx, false);

    let (mut start, mut end) = trim_range(exp, lhs.start(), lhs.end());
    if exp[start..end].starts_with('(') {
        start += 1;
    }
    if end > start && exp[start..end].ends_with(')') {
        end -= 1;
    }
    let (value_start, mut value_end) = trim_range(exp, start, end);

    let mut key = None;
    let mut index = None;
    if let Some(iterator) = FOR_ITERATOR.captures(&exp[value_start..value_end]) {
        let whole = iterator.get(0)?;
        if let Some(key_match) = iterator.get(1) {
            let (k_start, k_end) = trim_range(exp, value_start + key_match.start(), value_start + key_match.end());
            if k_end > k_start {
                key = Some(alias(input, k_start, k_end, ctx, true));
            }
        }
        if let Some(index_match) = iterator.get(2) {
            let (i_start, i_end) =
                trim_range(exp, value_start + index_match.start(), value_start + index_match.end());
            if i_end > i_start {
                index = Some(alias(input, i_start, i_end, ctx, true));
            }
        }
        value_end = trim_range(exp, value_start, value_start + whole.start()).1;
    }

    let value = (value_end > value_start).then(|| alias(input, value_start, value_end, ctx, true));
    Some(ForParseResult {
        source,
        value,
        key,
        index,
    })
}

/// `(value, key, index)` with trailing missing aliases dropped and inner
/// ones filled with `_`, `__`.
pub fn create_for_loop_params(result: &ForParseResult) -> Vec<JsNode> {
    let args = [&result.value, &result.key, &result.index];
    let len = args.iter().rposition(|a| a.is_some()).map_or(0, |i| i + 1);
    args[..len]
        .iter()
        .enumerate()
        .map(|(i, arg)| match arg {
            Some(exp) => JsNode::from((*exp).clone()),
            None => JsNode::Simple(SimpleExpression::dynamic("_".repeat(i + 1))),
        })
        .collect()
}

fn aliases(result: &ForParseResult) -> impl Iterator<Item = &ExpressionNode> {
    [&result.value, &result.key, &result.index].into_iter().flatten()
}

fn process_for(cursor: &mut NodeCursor<'_>, dir: DirectiveNode, ctx: &mut TransformContext) -> Option<ExitFn> {
    let exp = match &dir.exp {
        Some(ExpressionNode::Simple(exp)) => exp.clone(),
        _ => {
            ctx.report(ErrorCode::VForNoExpression, &dir.loc);
            return None;
        }
    };
    let Some(parse_result) = parse_for_expression(&exp, ctx) else {
        ctx.report(ErrorCode::VForMalformedExpression, &dir.loc);
        return None;
    };

    let node = cursor.node()?;
    let placeholder = TemplateNode::Text(TextNode {
        content: String::new(),
        loc: node.loc().clone(),
    });
    let element = match std::mem::replace(node, placeholder) {
        TemplateNode::Element(element) => element,
        other => {
            *node = other;
            return None;
        }
    };
    let is_template = element.tag_type == ElementType::Template;
    let key_prop = find_prop(&element, "key", false, false).map(|i| element.props[i].clone());
    let element_loc = element.loc.clone();

    ctx.scopes.v_for += 1;
    for alias in aliases(&parse_result) {
        ctx.add_identifiers(alias);
    }

    let key_property = match key_prop {
        Some(PropNode::Attribute(attr)) => {
            let content = attr.value.map(|v| v.content).unwrap_or_default();
            let value = SimpleExpression::new(content, true, SourceLocation::stub(), ConstantType::CanStringify);
            Some(Property::new(SimpleExpression::literal("key"), value.into()))
        }
        Some(PropNode::Directive(key_dir)) => key_dir.exp.map(|exp| {
            // a template's key is not seen by the expression transform
            let value = match exp {
                ExpressionNode::Simple(simple) if is_template && ctx.options.prefix_identifiers => {
                    process_expression(simple, ctx, false, false)
                }
                other => other,
            };
            Property::new(SimpleExpression::literal("key"), value.into())
        }),
        None => None,
    };

    let stable = matches!(&parse_result.source, ExpressionNode::Simple(s) if s.const_type > ConstantType::NotConstant);
    let flag = if stable {
        PatchFlags::STABLE_FRAGMENT
    } else if key_property.is_some() {
        PatchFlags::KEYED_FRAGMENT
    } else {
        PatchFlags::UNKEYED_FRAGMENT
    };
    let render_list = ctx.helper(RuntimeHelper::RenderList);
    let render_exp = JsNode::call(render_list, vec![parse_result.source.clone().into()]);
    let fragment = ctx.helper(RuntimeHelper::Fragment);
    let codegen = create_vnode_call(
        ctx,
        VNodeTag::Helper(fragment),
        None,
        Some(VNodeChildren::Expr(Box::new(render_exp))),
        Some(flag),
        None,
        None,
        true,
        !stable,
        false,
        element_loc,
    );

    let children = if is_template {
        element.children
    } else {
        vec![TemplateNode::Element(element)]
    };
    *node = TemplateNode::For(Box::new(ForNode {
        source: parse_result.source.clone(),
        value_alias: parse_result.value.clone(),
        key_alias: parse_result.key.clone(),
        object_index_alias: parse_result.index.clone(),
        parse_result: parse_result.clone(),
        children,
        loc: dir.loc,
        codegen: Some(JsNode::VNode(Box::new(codegen))),
    }));

    Some(Box::new(move |cursor: &mut NodeCursor<'_>, ctx: &mut TransformContext| {
        ctx.scopes.v_for -= 1;
        for alias in aliases(&parse_result) {
            ctx.remove_identifiers(alias);
        }
        let Some(TemplateNode::For(for_node)) = cursor.node() else {
            return;
        };

        if is_template {
            let misplaced = for_node.children.iter().find_map(|c| {
                let element = c.as_element()?;
                find_prop(element, "key", false, false).map(|i| element.props[i].loc().clone())
            });
            if let Some(loc) = misplaced {
                ctx.report(ErrorCode::VForTemplateKeyPlacement, &loc);
            }
        }

        let child_block = match for_node.children.as_mut_slice() {
            [TemplateNode::Element(outlet)] if is_slot_outlet(outlet) => {
                if let (true, Some(key), Some(codegen)) = (is_template, key_property, outlet.codegen.as_mut()) {
                    inject_key(codegen, key, ctx);
                }
                JsNode::ChildRef(ChildRef::child(0))
            }
            [TemplateNode::Element(child)] => {
                if let Some(JsNode::VNode(vnode)) = child.codegen.as_mut() {
                    if let (true, Some(key)) = (is_template, key_property) {
                        crate::compiler::utils::inject_prop(&mut vnode.props, key, ctx);
                    }
                    let ssr = ctx.is_ssr();
                    if vnode.is_block != !stable {
                        if vnode.is_block {
                            ctx.remove_helper(RuntimeHelper::OpenBlock);
                            ctx.remove_helper(RuntimeHelper::vnode(true, ssr, vnode.is_component));
                        } else {
                            ctx.remove_helper(RuntimeHelper::vnode(false, ssr, vnode.is_component));
                        }
                    }
                    vnode.is_block = !stable;
                    if vnode.is_block {
                        ctx.helper(RuntimeHelper::OpenBlock);
                    }
                    ctx.helper(RuntimeHelper::vnode(vnode.is_block, ssr, vnode.is_component));
                }
                JsNode::ChildRef(ChildRef::child(0))
            }
            _ => {
                let fragment = ctx.helper(RuntimeHelper::Fragment);
                let call = create_vnode_call(
                    ctx,
                    VNodeTag::Helper(fragment),
                    key_property.map(|key| JsNode::object(vec![key])),
                    Some(VNodeChildren::Owned),
                    Some(PatchFlags::STABLE_FRAGMENT),
                    None,
                    None,
                    true,
                    false,
                    false,
                    SourceLocation::stub(),
                );
                JsNode::VNode(Box::new(call))
            }
        };

        let params = create_for_loop_params(&parse_result);
        let render_call = for_node
            .codegen
            .as_mut()
            .and_then(JsNode::as_vnode_mut)
            .and_then(|vnode| match vnode.children.as_mut() {
                Some(VNodeChildren::Expr(exp)) => Some(&mut **exp),
                _ => None,
            });
        if let Some(JsNode::Call(call)) = render_call {
            call.arguments.push(JsNode::function(params, Some(child_block), true, false));
        }
    }))
}
