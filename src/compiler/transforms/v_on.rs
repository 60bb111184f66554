// ============================================================================
// spark-weave - v-on
// Lowers `@event="handler"` into an `onEvent` prop
// ============================================================================

use std::rc::Rc;
use std::sync::LazyLock;

use regex_lite::Regex;

use crate::compiler::ast::{
    CompoundExpression, CompoundPart, ConstantType, DirectiveNode, ElementNode, ElementType, ExpressionNode, JsNode,
    Property, RuntimeHelper, SimpleExpression, SourceLocation,
};
use crate::compiler::errors::ErrorCode;
use crate::compiler::transform::{DirectiveTransform, DirectiveTransformResult, TransformContext};
use crate::compiler::utils::{camelize, expression_has_scope_ref, is_member_expression, to_handler_key};

use super::process_expression;

static FN_EXP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*([\w$_]+|(async\s*)?\([^)]*?\))\s*=>|^\s*(async\s+)?function(?:\s+[\w$]+)?\s*\(")
        .expect("function expression pattern")
});

pub fn transform_on() -> DirectiveTransform {
    Rc::new(transform_on_directive)
}

fn into_part(exp: ExpressionNode) -> CompoundPart {
    match exp {
        ExpressionNode::Simple(e) => CompoundPart::Simple(e),
        ExpressionNode::Compound(c) => CompoundPart::Compound(c),
    }
}

fn event_name(arg: &ExpressionNode, ctx: &mut TransformContext) -> ExpressionNode {
    match arg {
        ExpressionNode::Simple(arg) if arg.is_static => {
            let raw = match arg.content.strip_prefix("vue:") {
                Some(rest) => format!("vnode-{rest}"),
                None => arg.content.clone(),
            };
            let key = to_handler_key(&camelize(&raw));
            SimpleExpression::new(key, true, arg.loc.clone(), ConstantType::CanStringify).into()
        }
        ExpressionNode::Simple(arg) => {
            let open = format!("{}(", ctx.helper_string(RuntimeHelper::ToHandlerKey));
            let parts = vec![CompoundPart::Str(open), CompoundPart::Simple(arg.clone()), CompoundPart::Str(")".into())];
            ExpressionNode::Compound(CompoundExpression::new(parts, arg.loc.clone()))
        }
        ExpressionNode::Compound(arg) => {
            let mut name = arg.clone();
            let open = format!("{}(", ctx.helper_string(RuntimeHelper::ToHandlerKey));
            name.children.insert(0, CompoundPart::Str(open));
            name.children.push(CompoundPart::Str(")".into()));
            ExpressionNode::Compound(name)
        }
    }
}

fn transform_on_directive(dir: &DirectiveNode, element: &ElementNode, ctx: &mut TransformContext) -> DirectiveTransformResult {
    if dir.exp.is_none() && dir.modifiers.is_empty() {
        ctx.report(ErrorCode::VOnNoExpression, &dir.loc);
    }
    let Some(arg) = &dir.arg else {
        return DirectiveTransformResult::default();
    };
    let mut key = event_name(arg, ctx);

    let exp = dir.exp.clone().filter(|e| !e.to_source().trim().is_empty());
    let mut should_cache = ctx.options.cache_handlers && exp.is_none() && !ctx.in_v_once;

    let handler = exp.map(|mut handler| {
        let content = handler.to_source();
        let is_member = is_member_expression(&content);
        let is_inline = !(is_member || FN_EXP.is_match(&content));
        let multiple_statements = content.contains(';');

        if ctx.options.prefix_identifiers {
            if let ExpressionNode::Simple(simple) = handler {
                if is_inline {
                    ctx.add_identifier("$event");
                }
                handler = process_expression(simple, ctx, false, multiple_statements);
                if is_inline {
                    ctx.remove_identifier("$event");
                }
            }
            let runtime_constant = matches!(&handler, ExpressionNode::Simple(e) if e.const_type > ConstantType::NotConstant);
            should_cache = ctx.options.cache_handlers
                && !ctx.in_v_once
                && !runtime_constant
                // a component needs the original function to keep its arity
                && !(is_member && element.tag_type == ElementType::Component)
                && !expression_has_scope_ref(&handler, &ctx.identifiers);

            // call through the member so the cached wrapper sees updates
            if should_cache && is_member {
                match &mut handler {
                    ExpressionNode::Simple(e) => e.content = format!("{0} && {0}(...args)", e.content),
                    ExpressionNode::Compound(c) => {
                        let parts = c.children.clone();
                        c.children.push(CompoundPart::Str(" && ".into()));
                        c.children.extend(parts);
                        c.children.push(CompoundPart::Str("(...args)".into()));
                    }
                }
            }
        }

        if is_inline || (should_cache && is_member) {
            let params = if is_inline { "$event" } else { "(...args)" };
            let (open, close) = if multiple_statements { ("{", "}") } else { ("(", ")") };
            let parts = vec![
                CompoundPart::Str(format!("{params} => {open}")),
                into_part(handler),
                CompoundPart::Str(close.into()),
            ];
            handler = ExpressionNode::Compound(CompoundExpression::new(parts, SourceLocation::stub()));
        }
        handler
    });

    let mut value = match handler {
        Some(handler) => JsNode::from(handler),
        None => JsNode::Simple(SimpleExpression::new("() => {}", false, dir.loc.clone(), ConstantType::NotConstant)),
    };
    if should_cache {
        value = ctx.cache(value, false);
    }
    match &mut key {
        ExpressionNode::Simple(e) => e.is_handler_key = true,
        ExpressionNode::Compound(c) => c.is_handler_key = true,
    }
    DirectiveTransformResult::props(vec![Property::new(key, value)])
}
