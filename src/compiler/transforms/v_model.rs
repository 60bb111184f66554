// ============================================================================
// spark-weave - v-model
// Two-way binding as a value prop plus an `onUpdate:` handler
// ============================================================================

use std::rc::Rc;

use crate::compiler::ast::{
    CompoundExpression, CompoundPart, ConstantType, DirectiveNode, ElementNode, ElementType, ExpressionNode, JsNode,
    Property, SimpleExpression, SourceLocation,
};
use crate::compiler::errors::ErrorCode;
use crate::compiler::transform::{DirectiveTransform, DirectiveTransformResult, TransformContext};
use crate::compiler::utils::{expression_has_scope_ref, is_member_expression, is_simple_identifier};

pub fn transform_model() -> DirectiveTransform {
    Rc::new(transform_model_directive)
}

fn as_part(exp: &ExpressionNode) -> CompoundPart {
    match exp {
        ExpressionNode::Simple(e) => CompoundPart::Simple(e.clone()),
        ExpressionNode::Compound(c) => CompoundPart::Compound(c.clone()),
    }
}

fn compound(parts: Vec<CompoundPart>) -> ExpressionNode {
    ExpressionNode::Compound(CompoundExpression::new(parts, SourceLocation::stub()))
}

/// `{ trim: true, "bar-baz": true }`
fn modifiers_object(modifiers: &[String]) -> String {
    let entries: Vec<String> = modifiers
        .iter()
        .map(|m| {
            if is_simple_identifier(m) {
                format!("{m}: true")
            } else {
                format!("{m:?}: true")
            }
        })
        .collect();
    format!("{{ {} }}", entries.join(", "))
}

fn transform_model_directive(dir: &DirectiveNode, element: &ElementNode, ctx: &mut TransformContext) -> DirectiveTransformResult {
    let Some(exp) = &dir.exp else {
        ctx.report(ErrorCode::VModelNoExpression, &dir.loc);
        return DirectiveTransformResult::default();
    };
    let raw = match exp {
        ExpressionNode::Simple(e) => e.content.clone(),
        ExpressionNode::Compound(c) => c.loc.source.clone(),
    };
    if raw.trim().is_empty() || !is_member_expression(&raw) {
        ctx.report(ErrorCode::VModelMalformedExpression, exp.loc());
        return DirectiveTransformResult::default();
    }
    if ctx.options.prefix_identifiers && is_simple_identifier(&raw) && ctx.is_identifier_in_scope(&raw) {
        ctx.report(ErrorCode::VModelOnScopeVariable, exp.loc());
        return DirectiveTransformResult::default();
    }

    let (prop_name, event_name): (ExpressionNode, ExpressionNode) = match &dir.arg {
        Some(ExpressionNode::Simple(arg)) if arg.is_static => (
            arg.clone().into(),
            SimpleExpression::literal(format!("onUpdate:{}", arg.content)).into(),
        ),
        Some(arg) => (
            arg.clone(),
            compound(vec![CompoundPart::Str("\"onUpdate:\" + ".into()), as_part(arg)]),
        ),
        None => (
            SimpleExpression::literal("modelValue").into(),
            SimpleExpression::literal("onUpdate:modelValue").into(),
        ),
    };
    let assignment = compound(vec![
        CompoundPart::Str("$event => ((".into()),
        as_part(exp),
        CompoundPart::Str(") = $event)".into()),
    ]);

    let mut handler = JsNode::from(assignment);
    if ctx.options.prefix_identifiers
        && !ctx.in_v_once
        && ctx.options.cache_handlers
        && !expression_has_scope_ref(exp, &ctx.identifiers)
    {
        handler = ctx.cache(handler, false);
    }
    let mut props = vec![
        Property::new(prop_name, exp.clone().into()),
        Property::new(event_name, handler),
    ];

    if !dir.modifiers.is_empty() && element.tag_type == ElementType::Component {
        let key: ExpressionNode = match &dir.arg {
            Some(ExpressionNode::Simple(arg)) if arg.is_static => {
                SimpleExpression::literal(format!("{}Modifiers", arg.content)).into()
            }
            Some(arg) => compound(vec![as_part(arg), CompoundPart::Str(" + \"Modifiers\"".into())]),
            None => SimpleExpression::literal("modelModifiers").into(),
        };
        let value = SimpleExpression::new(
            modifiers_object(&dir.modifiers),
            false,
            dir.loc.clone(),
            ConstantType::CanHoist,
        );
        props.push(Property::new(key, value.into()));
    }
    DirectiveTransformResult::props(props)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::ast::{PropNode, TemplateNode};
    use crate::compiler::compile::base_compile;
    use crate::compiler::errors::CompilerError;
    use crate::compiler::options::{CompilerOptions, ParserOptions, TransformOptions};
    use crate::compiler::parse::base_parse;
    use std::cell::RefCell;

    fn model(src: &str, options: TransformOptions) -> (Vec<Property>, Vec<ErrorCode>) {
        let root = base_parse(src, &ParserOptions::default());
        let element = root.children[0].as_element().cloned().unwrap_or_else(|| panic!("expected element"));
        let dir = element
            .props
            .iter()
            .find_map(PropNode::as_directive)
            .cloned()
            .unwrap_or_else(|| panic!("expected directive"));
        let errors = Rc::new(RefCell::new(Vec::<CompilerError>::new()));
        let sink = errors.clone();
        let mut ctx = TransformContext::new(TransformOptions {
            on_error: Rc::new(move |e: CompilerError| sink.borrow_mut().push(e)),
            ..options
        });
        let result = transform_model()(&dir, &element, &mut ctx);
        let codes = errors.borrow().iter().map(|e| e.code).collect();
        (result.props, codes)
    }

    fn key(prop: &Property) -> String {
        prop.key.to_source()
    }

    fn value(prop: &Property) -> String {
        match &prop.value {
            JsNode::Simple(e) => e.content.clone(),
            JsNode::Compound(c) => c.to_source(),
            JsNode::Cache(c) => format!("cache[{}]", c.index),
            other => panic!("unexpected value {other:?}"),
        }
    }

    #[test]
    fn default_model_value() {
        let (props, errors) = model("<input v-model=\"foo\"/>", TransformOptions::default());
        assert!(errors.is_empty());
        assert_eq!(key(&props[0]), "modelValue");
        assert_eq!(value(&props[0]), "foo");
        assert_eq!(key(&props[1]), "onUpdate:modelValue");
        assert_eq!(value(&props[1]), "$event => ((foo) = $event)");
        assert_eq!(props.len(), 2);
    }

    #[test]
    fn named_and_dynamic_arguments() {
        let (props, _) = model("<Comp v-model:title=\"t\"/>", TransformOptions::default());
        assert_eq!(props[0].static_key(), Some("title"));
        assert_eq!(props[1].static_key(), Some("onUpdate:title"));

        let (props, _) = model("<Comp v-model:[name]=\"t\"/>", TransformOptions::default());
        assert_eq!(key(&props[1]), "\"onUpdate:\" + name");
    }

    #[test]
    fn component_modifiers_become_an_object() {
        let (props, _) = model("<Comp v-model:title.trim.bar-baz=\"t\"/>", TransformOptions::default());
        assert_eq!(props[2].static_key(), Some("titleModifiers"));
        assert_eq!(value(&props[2]), "{ trim: true, \"bar-baz\": true }");
        assert!(matches!(&props[2].value, JsNode::Simple(e) if e.const_type == ConstantType::CanHoist));

        // plain elements leave modifiers to the runtime directive
        let (props, _) = model("<input v-model.trim=\"t\"/>", TransformOptions::default());
        assert_eq!(props.len(), 2);
    }

    #[test]
    fn invalid_targets_are_reported() {
        assert_eq!(model("<input v-model/>", TransformOptions::default()).1, vec![ErrorCode::VModelNoExpression]);
        assert_eq!(
            model("<input v-model=\"a + b\"/>", TransformOptions::default()).1,
            vec![ErrorCode::VModelMalformedExpression]
        );
        assert_eq!(
            model("<input v-model=\"  \"/>", TransformOptions::default()).1,
            vec![ErrorCode::VModelMalformedExpression]
        );
    }

    #[test]
    fn handler_is_cached_when_prefixing() {
        let options = TransformOptions {
            prefix_identifiers: true,
            cache_handlers: true,
            ..TransformOptions::default()
        };
        let (props, _) = model("<input v-model=\"foo\"/>", options);
        assert_eq!(value(&props[1]), "cache[0]");
    }

    #[test]
    fn loop_variables_cannot_be_models() {
        let errors = Rc::new(RefCell::new(Vec::<ErrorCode>::new()));
        let sink = errors.clone();
        let options = CompilerOptions {
            transform: TransformOptions {
                prefix_identifiers: true,
                on_error: Rc::new(move |e: CompilerError| sink.borrow_mut().push(e.code)),
                ..TransformOptions::default()
            },
            ..CompilerOptions::default()
        };
        let result = base_compile("<input v-for=\"i in list\" v-model=\"i\"/>", options);
        assert!(matches!(result.ast.children[0], TemplateNode::For(_)));
        assert_eq!(*errors.borrow(), vec![ErrorCode::VModelOnScopeVariable]);
    }
}
