// ============================================================================
// spark-weave - v-bind
// ============================================================================

use std::rc::Rc;

use crate::compiler::ast::{
    CompoundPart, ConstantType, DirectiveNode, ElementNode, ExpressionNode, Property, RuntimeHelper, SimpleExpression,
};
use crate::compiler::errors::ErrorCode;
use crate::compiler::transform::{DirectiveTransform, DirectiveTransformResult, TransformContext};
use crate::compiler::utils::camelize;

/// `:name="exp"` with an argument. The argument-less object form is
/// merged by the element transform.
pub fn transform_bind() -> DirectiveTransform {
    Rc::new(transform_bind_directive)
}

fn wrap(arg: &mut ExpressionNode, open: String, close: &str, simple: impl FnOnce(&str) -> String) {
    match arg {
        ExpressionNode::Simple(e) => e.content = simple(&e.content),
        ExpressionNode::Compound(c) => {
            c.children.insert(0, CompoundPart::Str(open));
            c.children.push(CompoundPart::Str(close.to_string()));
        }
    }
}

/// `.prop` and `.attr` force the binding through a property or attribute.
fn inject_prefix(arg: &mut ExpressionNode, prefix: char) {
    match arg {
        ExpressionNode::Simple(e) if e.is_static => e.content = format!("{prefix}{}", e.content),
        ExpressionNode::Simple(e) => e.content = format!("`{prefix}${{{}}}`", e.content),
        ExpressionNode::Compound(c) => {
            c.children.insert(0, CompoundPart::Str(format!("'{prefix}' + (")));
            c.children.push(CompoundPart::Str(")".into()));
        }
    }
}

fn transform_bind_directive(dir: &DirectiveNode, _element: &ElementNode, ctx: &mut TransformContext) -> DirectiveTransformResult {
    let Some(mut arg) = dir.arg.clone() else {
        return DirectiveTransformResult::default();
    };
    if !arg.is_static() {
        wrap(&mut arg, "(".into(), ") || \"\"", |content| format!("{content} || \"\""));
    }
    if dir.modifiers.iter().any(|m| m == "camel") {
        match &mut arg {
            ExpressionNode::Simple(e) if e.is_static => e.content = camelize(&e.content),
            _ => {
                let helper = ctx.helper_string(RuntimeHelper::Camelize);
                let open = format!("{helper}(");
                wrap(&mut arg, open.clone(), ")", |content| format!("{open}{content})"));
            }
        }
    }
    if !ctx.options.in_ssr {
        if dir.modifiers.iter().any(|m| m == "prop") {
            inject_prefix(&mut arg, '.');
        }
        if dir.modifiers.iter().any(|m| m == "attr") {
            inject_prefix(&mut arg, '^');
        }
    }

    match &dir.exp {
        Some(exp) if !exp.to_source().trim().is_empty() => {
            DirectiveTransformResult::props(vec![Property::new(arg, exp.clone().into())])
        }
        _ => {
            ctx.report(ErrorCode::VBindNoExpression, &dir.loc);
            let empty = SimpleExpression::new("", true, dir.loc.clone(), ConstantType::CanStringify);
            DirectiveTransformResult::props(vec![Property::new(arg, empty.into())])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::ast::PropNode;
    use crate::compiler::errors::CompilerError;
    use crate::compiler::options::{ParserOptions, TransformOptions};
    use crate::compiler::parse::base_parse;
    use std::cell::RefCell;

    fn bind(src: &str) -> (Property, Vec<ErrorCode>, TransformContext) {
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
            ..TransformOptions::default()
        });
        let mut result = transform_bind()(&dir, &element, &mut ctx);
        let codes = errors.borrow().iter().map(|e| e.code).collect();
        (result.props.remove(0), codes, ctx)
    }

    fn value_of(prop: &Property) -> String {
        match &prop.value {
            crate::compiler::ast::JsNode::Simple(e) => e.content.clone(),
            other => panic!("unexpected value {other:?}"),
        }
    }

    #[test]
    fn static_argument_and_expression() {
        let (prop, errors, _) = bind("<div :id=\"foo\"/>");
        assert_eq!(prop.static_key(), Some("id"));
        assert_eq!(value_of(&prop), "foo");
        assert!(errors.is_empty());
    }

    #[test]
    fn dynamic_argument_defaults_to_empty_string() {
        let (prop, _, _) = bind("<div :[name]=\"foo\"/>");
        assert_eq!(prop.key.to_source(), "name || \"\"");
        assert!(!prop.key.is_static());
    }

    #[test]
    fn camel_modifier() {
        let (prop, _, _) = bind("<div :foo-bar.camel=\"x\"/>");
        assert_eq!(prop.static_key(), Some("fooBar"));
        let (dynamic, _, ctx) = bind("<div :[name].camel=\"x\"/>");
        assert_eq!(dynamic.key.to_source(), "_camelize(name || \"\")");
        assert_eq!(ctx.helper_count(RuntimeHelper::Camelize), 1);
    }

    #[test]
    fn prop_and_attr_modifiers_prefix_the_name() {
        assert_eq!(bind("<div :value.prop=\"x\"/>").0.static_key(), Some(".value"));
        assert_eq!(bind("<div :title.attr=\"x\"/>").0.static_key(), Some("^title"));
        assert_eq!(bind("<div :[k].prop=\"x\"/>").0.key.to_source(), "`.${k || \"\"}`");
    }

    #[test]
    fn missing_expression_reports_and_binds_empty() {
        let (prop, errors, _) = bind("<div :id/>");
        assert_eq!(errors, vec![ErrorCode::VBindNoExpression]);
        assert_eq!(value_of(&prop), "");
        assert!(matches!(&prop.value, crate::compiler::ast::JsNode::Simple(e) if e.is_static));
    }
}
