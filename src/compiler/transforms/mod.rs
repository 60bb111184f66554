// ============================================================================
// spark-weave - Built-in Transforms
// Node transforms for structural directives, elements, slots and text, and
// directive transforms for v-on, v-bind and v-model
// ============================================================================

use std::rc::Rc;

use super::ast::{
    Callee, ConstantType, DirectiveNode, ElementType, JsNode, PropNode, Property, RuntimeHelper,
    SimpleExpression, SourceLocation,
};
use super::transform::{ExitFn, ExitFns, NodeCursor, NodeTransform, TransformContext};
use super::utils::{inject_prop, is_v_slot};

pub mod slot_outlet;
pub mod transform_element;
pub mod transform_expression;
pub mod transform_text;
pub mod v_bind;
pub mod v_for;
pub mod v_if;
pub mod v_model;
pub mod v_on;
pub mod v_once;
pub mod v_slot;

pub use slot_outlet::transform_slot_outlet;
pub use transform_element::{build_props, transform_element};
pub use transform_expression::{process_expression, transform_expression};
pub use transform_text::transform_text;
pub use v_bind::transform_bind;
pub use v_for::{parse_for_expression, transform_for};
pub use v_if::transform_if;
pub use v_model::transform_model;
pub use v_on::transform_on;
pub use v_once::transform_once;
pub use v_slot::{track_slot_scopes, track_v_for_slot_scopes};

/// Handles one structural directive, already removed from the element's
/// props. May replace or remove the node under the cursor.
pub type StructuralHandler = fn(&mut NodeCursor<'_>, DirectiveNode, &mut TransformContext) -> Option<ExitFn>;

/// Node transform applying `handler` to every directive in `names` on an
/// element. `<template v-slot>` is left to the slot transforms.
pub fn create_structural_directive_transform(names: &'static [&'static str], handler: StructuralHandler) -> NodeTransform {
    Rc::new(move |cursor: &mut NodeCursor<'_>, ctx: &mut TransformContext| {
        let mut exits = ExitFns::new();
        match cursor.element() {
            Some(element) if element.tag_type == ElementType::Template && element.props.iter().any(is_v_slot) => {
                return exits;
            }
            None => return exits,
            Some(_) => {}
        }
        while let Some(element) = cursor.element() {
            let found = element
                .props
                .iter()
                .position(|p| matches!(p, PropNode::Directive(d) if names.contains(&d.name.as_str())));
            let Some(at) = found else {
                break;
            };
            let PropNode::Directive(dir) = element.props.remove(at) else {
                break;
            };
            if let Some(exit) = handler(cursor, dir, ctx) {
                exits.push(exit);
            }
        }
        exits
    })
}

/// `key: <index>` for if-branches.
pub(crate) fn branch_key(index: usize) -> Property {
    let value = SimpleExpression::new(index.to_string(), false, SourceLocation::stub(), ConstantType::CanHoist);
    Property::new(SimpleExpression::literal("key"), value.into())
}

/// Inject `key` into an element's vnode call or a slot outlet's
/// `renderSlot` props argument.
pub(crate) fn inject_key(codegen: &mut JsNode, key: Property, ctx: &mut TransformContext) {
    match codegen {
        JsNode::VNode(vnode) => inject_prop(&mut vnode.props, key, ctx),
        JsNode::Call(call) if call.callee == Callee::Helper(RuntimeHelper::RenderSlot) => {
            if call.arguments.len() < 3 {
                call.arguments.push(JsNode::object(vec![key]));
                return;
            }
            let mut props = match std::mem::replace(&mut call.arguments[2], JsNode::Code(String::new())) {
                JsNode::Code(placeholder) if placeholder == "{}" => None,
                existing => Some(existing),
            };
            inject_prop(&mut props, key, ctx);
            if let Some(props) = props {
                call.arguments[2] = props;
            }
        }
        _ => {}
    }
}
