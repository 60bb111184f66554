// ============================================================================
// spark-weave - Slot Outlets
// `<slot>` elements become `renderSlot` calls
// ============================================================================

use std::rc::Rc;

use crate::compiler::ast::{AttributeNode, ChildList, ElementNode, ExpressionNode, JsNode, PropNode, RuntimeHelper};
use crate::compiler::errors::ErrorCode;
use crate::compiler::transform::{ExitFns, NodeCursor, NodeTransform, TransformContext};
use crate::compiler::utils::{camelize, is_slot_outlet, is_static_arg_of};

use super::transform_element::build_props;

pub fn transform_slot_outlet() -> NodeTransform {
    Rc::new(|cursor: &mut NodeCursor<'_>, ctx: &mut TransformContext| {
        if let Some(element) = cursor.element().filter(|e| is_slot_outlet(e)) {
            let call = render_slot_call(element, ctx);
            element.codegen = Some(call);
        }
        ExitFns::new()
    })
}

struct SlotOutlet {
    name: JsNode,
    props: Option<JsNode>,
}

fn process_slot_outlet(element: &ElementNode, ctx: &mut TransformContext) -> SlotOutlet {
    let mut name = JsNode::Code("\"default\"".into());
    let mut non_name_props = Vec::new();

    for prop in &element.props {
        match prop {
            PropNode::Attribute(attr) => {
                let Some(value) = &attr.value else {
                    continue;
                };
                if attr.name == "name" {
                    name = JsNode::Code(format!("{:?}", value.content));
                } else {
                    non_name_props.push(PropNode::Attribute(AttributeNode {
                        name: camelize(&attr.name),
                        ..attr.clone()
                    }));
                }
            }
            PropNode::Directive(dir) if dir.name == "bind" && is_static_arg_of(dir.arg.as_ref(), "name") => {
                if let Some(exp) = &dir.exp {
                    name = exp.clone().into();
                }
            }
            PropNode::Directive(dir) => {
                let mut dir = dir.clone();
                if dir.name == "bind" {
                    if let Some(ExpressionNode::Simple(arg)) = dir.arg.as_mut().filter(|a| a.is_static()) {
                        arg.content = camelize(&arg.content);
                    }
                }
                non_name_props.push(PropNode::Directive(dir));
            }
        }
    }

    let mut props = None;
    if !non_name_props.is_empty() {
        let built = build_props(element, &non_name_props, ctx, false);
        props = built.props;
        if let Some(directive) = built.directives.first() {
            ctx.report(ErrorCode::VSlotUnexpectedDirectiveOnSlotOutlet, &directive.dir.loc);
        }
    }
    SlotOutlet { name, props }
}

/// `renderSlot($slots, name, props, fallback, noSlotted)`, trimmed to the
/// arguments actually needed.
fn render_slot_call(element: &ElementNode, ctx: &mut TransformContext) -> JsNode {
    let outlet = process_slot_outlet(element, ctx);
    let slots = if ctx.options.prefix_identifiers {
        "_ctx.$slots"
    } else {
        "$slots"
    };

    let mut args = vec![
        JsNode::Code(slots.into()),
        outlet.name,
        JsNode::Code("{}".into()),
        JsNode::Code("undefined".into()),
        JsNode::Code("true".into()),
    ];
    let mut expected_len = 2;
    if let Some(props) = outlet.props {
        args[2] = props;
        expected_len = 3;
    }
    if !element.children.is_empty() {
        args[3] = JsNode::function(Vec::new(), Some(JsNode::Children(ChildList::All)), false, false);
        expected_len = 4;
    }
    if ctx.options.scope_id.is_some() && !ctx.options.slotted {
        expected_len = 5;
    }
    args.truncate(expected_len);

    let render_slot = ctx.helper(RuntimeHelper::RenderSlot);
    JsNode::call(render_slot, args)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::ast::{Callee, TemplateNode};
    use crate::compiler::compile::{base_compile, CompileResult};
    use crate::compiler::options::{CompilerOptions, TransformOptions};

    fn compile_with(src: &str, transform: TransformOptions) -> CompileResult {
        base_compile(
            src,
            CompilerOptions {
                transform,
                ..CompilerOptions::default()
            },
        )
    }

    fn compile(src: &str) -> CompileResult {
        compile_with(src, TransformOptions::default())
    }

    fn outlet_args(node: &TemplateNode) -> &[JsNode] {
        match node.codegen() {
            Some(JsNode::Call(call)) => {
                assert_eq!(call.callee, Callee::Helper(RuntimeHelper::RenderSlot));
                &call.arguments
            }
            other => panic!("expected renderSlot, got {other:?}"),
        }
    }

    fn code(node: &JsNode) -> String {
        match node {
            JsNode::Code(code) => code.clone(),
            JsNode::Simple(e) => e.content.clone(),
            JsNode::Compound(c) => c.to_source(),
            other => panic!("unexpected argument {other:?}"),
        }
    }

    // =========================================================================
    // Names
    // =========================================================================

    #[test]
    fn default_outlet() {
        let result = compile("<slot/>");
        let args = outlet_args(&result.ast.children[0]);
        assert_eq!(args.iter().map(code).collect::<Vec<_>>(), vec!["$slots", "\"default\""]);
        assert!(result.ast.helpers.contains(&RuntimeHelper::RenderSlot));
    }

    #[test]
    fn static_and_bound_names() {
        let result = compile("<div><slot name=\"header\"/><slot :name=\"n\"/></div>");
        let div = result.ast.children[0].as_element().unwrap_or_else(|| panic!("expected div"));
        assert_eq!(code(&outlet_args(&div.children[0])[1]), "\"header\"");
        assert_eq!(code(&outlet_args(&div.children[1])[1]), "n");
    }

    #[test]
    fn prefixed_outlet_reads_ctx_slots() {
        let options = TransformOptions {
            prefix_identifiers: true,
            ..TransformOptions::default()
        };
        let result = compile_with("<slot :name=\"n\"/>", options);
        let args = outlet_args(&result.ast.children[0]);
        assert_eq!(code(&args[0]), "_ctx.$slots");
        assert_eq!(code(&args[1]), "_ctx.n");
    }

    // =========================================================================
    // Props and fallback
    // =========================================================================

    #[test]
    fn other_props_are_camelized() {
        let result = compile("<slot foo-bar=\"x\" :baz-qux=\"y\"/>");
        let args = outlet_args(&result.ast.children[0]);
        assert_eq!(args.len(), 3);
        let JsNode::Object(props) = &args[2] else {
            panic!("expected props object, got {:?}", args[2]);
        };
        let keys: Vec<_> = props.properties.iter().filter_map(|p| p.static_key()).collect();
        assert_eq!(keys, vec!["fooBar", "bazQux"]);
    }

    #[test]
    fn fallback_content_without_props() {
        let result = compile("<slot>fallback</slot>");
        let args = outlet_args(&result.ast.children[0]);
        assert_eq!(args.len(), 4);
        assert_eq!(code(&args[2]), "{}");
        let JsNode::Function(fallback) = &args[3] else {
            panic!("expected fallback function");
        };
        assert!(!fallback.is_slot);
        assert_eq!(fallback.returns, Some(JsNode::Children(ChildList::All)));
    }

    #[test]
    fn scoped_outlets_outside_slotted_components_opt_out() {
        let options = TransformOptions {
            scope_id: Some("data-v-1".into()),
            slotted: false,
            ..TransformOptions::default()
        };
        let result = compile_with("<slot/>", options);
        let args = outlet_args(&result.ast.children[0]);
        assert_eq!(args.iter().map(code).collect::<Vec<_>>(), vec!["$slots", "\"default\"", "{}", "undefined", "true"]);
    }

    #[test]
    fn runtime_directives_are_rejected() {
        let result = compile("<slot v-foo/>");
        assert_eq!(result.errors[0].code, ErrorCode::VSlotUnexpectedDirectiveOnSlotOutlet);
    }
}
