// ============================================================================
// spark-weave - Slots
// Scope tracking for slot props and the slots object passed to components
// ============================================================================

use std::rc::Rc;

use rustc_hash::FxHashSet;

use crate::compiler::ast::{
    ChildList, DirectiveNode, ElementNode, ElementType, ExpressionNode, JsNode, Property, RuntimeHelper,
    SimpleExpression, SlotFlags, TemplateNode,
};
use crate::compiler::errors::ErrorCode;
use crate::compiler::transform::{ExitFn, ExitFns, NodeCursor, NodeTransform, TransformContext};
use crate::compiler::utils::{element_has_scope_ref, find_dir, find_dir_node, is_template_node, is_v_slot};

use super::v_for::create_for_loop_params;
use super::parse_for_expression;

// =============================================================================
// SCOPE TRACKING
// =============================================================================

/// Declares slot props (`v-slot="{ item }"`) while the slot content is
/// walked.
pub fn track_slot_scopes() -> NodeTransform {
    Rc::new(|cursor: &mut NodeCursor<'_>, ctx: &mut TransformContext| {
        let mut exits = ExitFns::new();
        let Some(element) = cursor.element() else {
            return exits;
        };
        if !matches!(element.tag_type, ElementType::Component | ElementType::Template) {
            return exits;
        }
        let Some(dir) = find_dir_node(element, &["slot"], false) else {
            return exits;
        };
        let slot_props = dir.exp.clone();
        if let Some(props) = &slot_props {
            ctx.add_identifiers(props);
        }
        ctx.scopes.v_slot += 1;
        let exit: ExitFn = Box::new(move |_cursor: &mut NodeCursor<'_>, ctx: &mut TransformContext| {
            if let Some(props) = &slot_props {
                ctx.remove_identifiers(props);
            }
            ctx.scopes.v_slot -= 1;
        });
        exits.push(exit);
        exits
    })
}

/// Declares the aliases of `<template v-slot v-for>`, which the loop
/// transform leaves to the slot builder.
pub fn track_v_for_slot_scopes() -> NodeTransform {
    Rc::new(|cursor: &mut NodeCursor<'_>, ctx: &mut TransformContext| {
        let mut exits = ExitFns::new();
        let Some(element) = cursor.element() else {
            return exits;
        };
        if element.tag_type != ElementType::Template || !element.props.iter().any(is_v_slot) {
            return exits;
        }
        let Some(at) = find_dir(element, &["for"], false) else {
            return exits;
        };
        let Some(ExpressionNode::Simple(exp)) = element.props[at].as_directive().and_then(|d| d.exp.clone()) else {
            return exits;
        };
        let Some(result) = parse_for_expression(&exp, ctx) else {
            return exits;
        };
        if let crate::compiler::ast::PropNode::Directive(dir) = &mut element.props[at] {
            dir.parse_result = Some(result.clone());
        }

        let aliases: Vec<ExpressionNode> = [result.value, result.key, result.index].into_iter().flatten().collect();
        for alias in &aliases {
            ctx.add_identifiers(alias);
        }
        let exit: ExitFn = Box::new(move |_cursor: &mut NodeCursor<'_>, ctx: &mut TransformContext| {
            for alias in &aliases {
                ctx.remove_identifiers(alias);
            }
        });
        exits.push(exit);
        exits
    })
}

// =============================================================================
// SLOTS OBJECT
// =============================================================================

fn slot_function(props: Option<&ExpressionNode>, children: ChildList) -> JsNode {
    let params = props.map(|p| vec![JsNode::from(p.clone())]).unwrap_or_default();
    JsNode::function(params, Some(JsNode::Children(children)), false, true)
}

/// `{ name, fn }` entry for `createSlots`.
fn dynamic_slot(name: ExpressionNode, function: JsNode) -> JsNode {
    JsNode::object(vec![
        Property::new(SimpleExpression::literal("name"), name.into()),
        Property::new(SimpleExpression::literal("fn"), function),
    ])
}

fn default_fallback() -> JsNode {
    JsNode::Simple(SimpleExpression::dynamic("undefined"))
}

fn innermost_alternate(node: &mut JsNode) -> Option<&mut JsNode> {
    match node {
        JsNode::Conditional(c) => {
            if matches!(c.alternate, JsNode::Conditional(_)) {
                innermost_alternate(&mut c.alternate)
            } else {
                Some(&mut c.alternate)
            }
        }
        _ => None,
    }
}

fn template_slot(node: &TemplateNode) -> Option<(&ElementNode, &DirectiveNode)> {
    let element = node.as_element().filter(|_| is_template_node(node))?;
    find_dir_node(element, &["slot"], true).map(|dir| (element, dir))
}

/// Whether a slot outlet under `children` passes its parent's slots on.
fn has_forwarded_slots(children: &[TemplateNode]) -> bool {
    children.iter().any(|child| match child {
        TemplateNode::Element(e) => e.tag_type == ElementType::Slot || has_forwarded_slots(&e.children),
        TemplateNode::If(n) => n.branches.iter().any(|b| has_forwarded_slots(&b.children)),
        TemplateNode::For(f) => has_forwarded_slots(&f.children),
        _ => false,
    })
}

fn is_non_whitespace_content(node: &TemplateNode) -> bool {
    match node {
        TemplateNode::Text(t) => !t.content.trim().is_empty(),
        TemplateNode::TextCall(t) => is_non_whitespace_content(&t.content),
        _ => true,
    }
}

fn slot_flag_code(flag: SlotFlags) -> String {
    let name = match flag {
        SlotFlags::Stable => "STABLE",
        SlotFlags::Dynamic => "DYNAMIC",
        SlotFlags::Forwarded => "FORWARDED",
    };
    format!("{} /* {name} */", flag as i32)
}

/// Build a component's slots: an object of slot functions, wrapped in
/// `createSlots` when some slots are conditional or looped. Returns the
/// expression and whether the slots can change between renders.
pub fn build_slots(element: &ElementNode, ctx: &mut TransformContext) -> (JsNode, bool) {
    ctx.helper(RuntimeHelper::WithCtx);
    let mut properties: Vec<Property> = Vec::new();
    let mut dynamic_slots: Vec<JsNode> = Vec::new();

    // inside a loop or another slot, content likely reads scope variables
    let mut has_dynamic_slots = ctx.scopes.v_slot > 0 || ctx.scopes.v_for > 0;
    if !ctx.options.ssr && ctx.options.prefix_identifiers {
        has_dynamic_slots = element_has_scope_ref(element, &ctx.identifiers);
    }

    let on_component_slot = find_dir_node(element, &["slot"], true);
    if let Some(dir) = on_component_slot {
        if dir.arg.as_ref().is_some_and(|a| !a.is_static()) {
            has_dynamic_slots = true;
        }
        let name = dir.arg.clone().unwrap_or_else(|| SimpleExpression::literal("default").into());
        properties.push(Property::new(name, slot_function(dir.exp.as_ref(), ChildList::All)));
    }

    let mut has_template_slots = false;
    let mut has_named_default_slot = false;
    let mut implicit_default_children: Vec<usize> = Vec::new();
    let mut seen_slot_names: FxHashSet<String> = FxHashSet::default();

    for (i, child) in element.children.iter().enumerate() {
        let Some((slot_element, slot_dir)) = template_slot(child) else {
            if !matches!(child, TemplateNode::Comment(_)) {
                implicit_default_children.push(i);
            }
            continue;
        };
        if on_component_slot.is_some() {
            ctx.report(ErrorCode::VSlotMixedSlotUsage, &slot_dir.loc);
            break;
        }
        has_template_slots = true;

        let slot_name: ExpressionNode = slot_dir
            .arg
            .clone()
            .unwrap_or_else(|| SimpleExpression::literal("default").into());
        let static_slot_name = match &slot_name {
            ExpressionNode::Simple(e) if e.is_static => Some(e.content.clone()),
            _ => {
                has_dynamic_slots = true;
                None
            }
        };
        let function = slot_function(slot_dir.exp.as_ref(), ChildList::Nested(i));

        if let Some(v_if) = find_dir_node(slot_element, &["if"], false) {
            has_dynamic_slots = true;
            let test = v_if.exp.clone().map(JsNode::from).unwrap_or_else(default_fallback);
            dynamic_slots.push(JsNode::conditional(test, dynamic_slot(slot_name, function), default_fallback()));
        } else if let Some(v_else) = find_dir_node(slot_element, &["else", "else-if"], true) {
            let adjacent_if = element.children[..i]
                .iter()
                .rev()
                .find(|c| !matches!(c, TemplateNode::Comment(_)))
                .and_then(TemplateNode::as_element)
                .is_some_and(|prev| {
                    prev.tag_type == ElementType::Template && find_dir(prev, &["if", "else-if"], false).is_some()
                });
            let alternate = if adjacent_if {
                dynamic_slots.last_mut().and_then(innermost_alternate)
            } else {
                None
            };
            match alternate {
                Some(alternate) => {
                    let slot = dynamic_slot(slot_name, function);
                    *alternate = match &v_else.exp {
                        Some(exp) if v_else.name == "else-if" => {
                            JsNode::conditional(exp.clone().into(), slot, default_fallback())
                        }
                        _ => slot,
                    };
                }
                None => ctx.report(ErrorCode::VElseNoAdjacentIf, &v_else.loc),
            }
        } else if let Some(v_for) = find_dir_node(slot_element, &["for"], false) {
            has_dynamic_slots = true;
            let parse_result = match (&v_for.parse_result, &v_for.exp) {
                (Some(result), _) => Some(result.clone()),
                (None, Some(ExpressionNode::Simple(exp))) => parse_for_expression(exp, ctx),
                _ => None,
            };
            match parse_result {
                Some(result) => {
                    let render_list = ctx.helper(RuntimeHelper::RenderList);
                    let params = create_for_loop_params(&result);
                    let body = JsNode::function(params, Some(dynamic_slot(slot_name, function)), true, false);
                    dynamic_slots.push(JsNode::call(render_list, vec![result.source.into(), body]));
                }
                None => ctx.report(ErrorCode::VForMalformedExpression, &v_for.loc),
            }
        } else {
            if let Some(name) = static_slot_name {
                if !seen_slot_names.insert(name.clone()) {
                    ctx.report(ErrorCode::VSlotDuplicateSlotNames, &slot_dir.loc);
                    continue;
                }
                if name == "default" {
                    has_named_default_slot = true;
                }
            }
            properties.push(Property::new(slot_name, function));
        }
    }

    if on_component_slot.is_none() {
        if !has_template_slots {
            properties.push(Property::new(SimpleExpression::literal("default"), slot_function(None, ChildList::All)));
        } else if implicit_default_children
            .iter()
            .any(|&i| is_non_whitespace_content(&element.children[i]))
        {
            if has_named_default_slot {
                let loc = element.children[implicit_default_children[0]].loc();
                ctx.report(ErrorCode::VSlotExtraneousDefaultSlotChildren, loc);
            } else {
                let children = ChildList::Indices(implicit_default_children);
                properties.push(Property::new(SimpleExpression::literal("default"), slot_function(None, children)));
            }
        }
    }

    let flag = if has_dynamic_slots {
        SlotFlags::Dynamic
    } else if has_forwarded_slots(&element.children) {
        SlotFlags::Forwarded
    } else {
        SlotFlags::Stable
    };
    properties.push(Property::new(
        SimpleExpression::literal("_"),
        SimpleExpression::dynamic(slot_flag_code(flag)).into(),
    ));

    let mut slots = JsNode::object(properties);
    if !dynamic_slots.is_empty() {
        let create_slots = ctx.helper(RuntimeHelper::CreateSlots);
        slots = JsNode::call(create_slots, vec![slots, JsNode::array(dynamic_slots)]);
    }
    (slots, has_dynamic_slots)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::ast::{Callee, PatchFlags, VNodeCall, VNodeChildren};
    use crate::compiler::compile::{base_compile, CompileResult};
    use crate::compiler::options::{CompilerOptions, TransformOptions};

    fn compile(src: &str) -> CompileResult {
        base_compile(src, CompilerOptions::default())
    }

    fn compile_prefixed(src: &str) -> CompileResult {
        let options = CompilerOptions {
            transform: TransformOptions {
                prefix_identifiers: true,
                ..TransformOptions::default()
            },
            ..CompilerOptions::default()
        };
        base_compile(src, options)
    }

    fn vnode(node: &TemplateNode) -> &VNodeCall {
        node.codegen()
            .and_then(JsNode::as_vnode)
            .unwrap_or_else(|| panic!("expected vnode on {node:?}"))
    }

    fn slots(vnode: &VNodeCall) -> &JsNode {
        match &vnode.children {
            Some(VNodeChildren::Slots(slots)) => slots,
            other => panic!("expected slots, got {other:?}"),
        }
    }

    fn slot_object(slots: &JsNode) -> &[Property] {
        match slots {
            JsNode::Object(o) => &o.properties,
            JsNode::Call(call) => slot_object(&call.arguments[0]),
            other => panic!("expected slots object, got {other:?}"),
        }
    }

    fn keys(slots: &JsNode) -> Vec<String> {
        slot_object(slots).iter().map(|p| p.key.to_source()).collect()
    }

    fn flag(slots: &JsNode) -> String {
        let last = slot_object(slots).last().unwrap_or_else(|| panic!("empty slots"));
        match &last.value {
            JsNode::Simple(e) => e.content.clone(),
            other => panic!("unexpected flag {other:?}"),
        }
    }

    fn returns(property: &Property) -> (&[JsNode], &JsNode) {
        match &property.value {
            JsNode::Function(f) => {
                assert!(f.is_slot);
                (&f.params, f.returns.as_ref().unwrap_or_else(|| panic!("slot without body")))
            }
            other => panic!("expected slot function, got {other:?}"),
        }
    }

    // =========================================================================
    // Static slots
    // =========================================================================

    #[test]
    fn children_form_the_implicit_default_slot() {
        let result = compile("<Comp><div/></Comp>");
        let comp_slots = slots(vnode(&result.ast.children[0]));
        assert_eq!(keys(comp_slots), vec!["default", "_"]);
        assert_eq!(flag(comp_slots), "1 /* STABLE */");
        let (params, body) = returns(&slot_object(comp_slots)[0]);
        assert!(params.is_empty());
        assert_eq!(body, &JsNode::Children(ChildList::All));
        assert!(result.ast.helpers.contains(&RuntimeHelper::WithCtx));
    }

    #[test]
    fn slot_props_on_the_component() {
        let result = compile("<Comp v-slot=\"{ item }\">{{ item }}</Comp>");
        let comp_slots = slots(vnode(&result.ast.children[0]));
        let (params, _) = returns(&slot_object(comp_slots)[0]);
        assert!(matches!(&params[0], JsNode::Simple(e) if e.content == "{ item }"));
    }

    #[test]
    fn named_template_slots() {
        let result = compile("<Comp><template #header>h</template><template #footer>f</template></Comp>");
        let comp_slots = slots(vnode(&result.ast.children[0]));
        assert_eq!(keys(comp_slots), vec!["header", "footer", "_"]);
        let (_, body) = returns(&slot_object(comp_slots)[1]);
        assert_eq!(body, &JsNode::Children(ChildList::Nested(1)));
    }

    #[test]
    fn loose_children_join_the_default_slot() {
        let result = compile("<Comp><template #header>h</template><p/></Comp>");
        let comp_slots = slots(vnode(&result.ast.children[0]));
        assert_eq!(keys(comp_slots), vec!["header", "default", "_"]);
        let (_, body) = returns(&slot_object(comp_slots)[1]);
        assert_eq!(body, &JsNode::Children(ChildList::Indices(vec![1])));
    }

    #[test]
    fn whitespace_between_templates_is_ignored() {
        let result = compile("<Comp><template #a>x</template> <template #b>y</template></Comp>");
        assert_eq!(keys(slots(vnode(&result.ast.children[0]))), vec!["a", "b", "_"]);
    }

    #[test]
    fn forwarded_slots() {
        let result = compile("<Comp><slot/></Comp>");
        assert_eq!(flag(slots(vnode(&result.ast.children[0]))), "3 /* FORWARDED */");
    }

    // =========================================================================
    // Misuse
    // =========================================================================

    #[test]
    fn extraneous_default_children_warn() {
        let result = compile("<Comp><template #default>d</template><p/></Comp>");
        assert!(result.errors.is_empty());
        let codes: Vec<ErrorCode> = result.warnings.iter().map(|w| w.code).collect();
        assert_eq!(codes, vec![ErrorCode::VSlotExtraneousDefaultSlotChildren]);
        assert_eq!(keys(slots(vnode(&result.ast.children[0]))), vec!["default", "_"]);
    }

    #[test]
    fn duplicate_and_mixed_slots_are_errors() {
        let duplicate = compile("<Comp><template #a>1</template><template #a>2</template></Comp>");
        assert_eq!(duplicate.errors[0].code, ErrorCode::VSlotDuplicateSlotNames);
        let mixed = compile("<Comp v-slot=\"p\"><template #a>1</template></Comp>");
        assert_eq!(mixed.errors[0].code, ErrorCode::VSlotMixedSlotUsage);
    }

    // =========================================================================
    // Dynamic slots
    // =========================================================================

    #[test]
    fn conditional_slots_use_create_slots() {
        let result = compile("<Comp><template v-if=\"ok\" #a>x</template><template v-else #b>y</template></Comp>");
        let comp = vnode(&result.ast.children[0]);
        assert_eq!(comp.patch_flag, Some(PatchFlags::DYNAMIC_SLOTS));
        let JsNode::Call(call) = slots(comp) else {
            panic!("expected createSlots");
        };
        assert_eq!(call.callee, Callee::Helper(RuntimeHelper::CreateSlots));
        let JsNode::Array(dynamic) = &call.arguments[1] else {
            panic!("expected dynamic slot array");
        };
        assert_eq!(dynamic.elements.len(), 1);
        let JsNode::Conditional(conditional) = &dynamic.elements[0] else {
            panic!("expected conditional slot");
        };
        assert!(matches!(&conditional.alternate, JsNode::Object(o) if o.properties.len() == 2));
        assert_eq!(keys(slots(comp)), vec!["_"]);
    }

    #[test]
    fn else_if_chains_nest_into_the_last_alternate() {
        let result = compile(
            "<Comp><template v-if=\"a\" #a>1</template><template v-else-if=\"b\" #b>2</template>\
             <template v-else #c>3</template></Comp>",
        );
        assert!(result.errors.is_empty(), "{:?}", result.errors);
        let JsNode::Call(call) = slots(vnode(&result.ast.children[0])) else {
            panic!("expected createSlots");
        };
        let JsNode::Array(dynamic) = &call.arguments[1] else {
            panic!("expected dynamic slot array");
        };
        assert_eq!(dynamic.elements.len(), 1);
        let JsNode::Conditional(outer) = &dynamic.elements[0] else {
            panic!("expected conditional slot");
        };
        let JsNode::Conditional(inner) = &outer.alternate else {
            panic!("expected nested conditional, got {:?}", outer.alternate);
        };
        assert!(matches!(&inner.test, JsNode::Simple(e) if e.content == "b"));
        let JsNode::Object(last) = &inner.alternate else {
            panic!("expected else slot, got {:?}", inner.alternate);
        };
        assert!(matches!(&last.properties[0].value, JsNode::Simple(e) if e.content == "c"));
    }

    #[test]
    fn looped_slots_use_render_list() {
        let result = compile("<Comp><template v-for=\"n in names\" #[n]>x</template></Comp>");
        let JsNode::Call(call) = slots(vnode(&result.ast.children[0])) else {
            panic!("expected createSlots");
        };
        let JsNode::Array(dynamic) = &call.arguments[1] else {
            panic!("expected dynamic slot array");
        };
        let JsNode::Call(render_list) = &dynamic.elements[0] else {
            panic!("expected renderList");
        };
        assert_eq!(render_list.callee, Callee::Helper(RuntimeHelper::RenderList));
        assert_eq!(render_list.arguments.len(), 2);
    }

    #[test]
    fn slots_inside_loops_depend_on_scope_use() {
        let plain = compile("<div v-for=\"i in l\"><Comp>hi</Comp></div>");
        let TemplateNode::For(for_node) = &plain.ast.children[0] else {
            panic!("expected for node");
        };
        let div = for_node.children[0].as_element().unwrap_or_else(|| panic!("expected div"));
        assert_eq!(flag(slots(vnode(&div.children[0]))), "2 /* DYNAMIC */");

        let prefixed = compile_prefixed("<div v-for=\"i in l\"><Comp>hi</Comp></div>");
        let TemplateNode::For(for_node) = &prefixed.ast.children[0] else {
            panic!("expected for node");
        };
        let div = for_node.children[0].as_element().unwrap_or_else(|| panic!("expected div"));
        assert_eq!(flag(slots(vnode(&div.children[0]))), "1 /* STABLE */");
    }

    #[test]
    fn slot_props_are_not_prefixed() {
        let result = compile_prefixed("<Comp v-slot=\"{ item }\">{{ item }} {{ other }}</Comp>");
        let comp = result.ast.children[0].as_element().unwrap_or_else(|| panic!("expected component"));
        let TemplateNode::TextCall(call) = &comp.children[0] else {
            panic!("expected text call, got {:?}", comp.children[0]);
        };
        let TemplateNode::Compound(text) = &call.content else {
            panic!("expected merged text, got {:?}", call.content);
        };
        let source = text.to_source();
        assert!(source.contains("_ctx.other"));
        assert!(!source.contains("_ctx.item"));
    }
}
