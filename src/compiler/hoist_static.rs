// ============================================================================
// spark-weave - Static Hoisting
// Constant-type analysis and extraction of static subtrees
// ============================================================================
//
// Constant types form the lattice NotConstant < CanSkipPatch < CanHoist <
// CanStringify. A node is never more constant than its least constant part.
// Element results are memoized by node identity for the duration of one
// hoisting pass.
// ============================================================================

use std::ops::Range;

use super::ast::{
    Callee, CompoundPart, ConstantType, ElementNode, ElementType, ExpressionNode, JsNode, PatchFlags, PropNode,
    RootNode, RuntimeHelper, TemplateNode, VNodeCall, VNodeChildren,
};
use super::transform::TransformContext;
use super::utils::is_slot_outlet;

// =============================================================================
// CONSTANT TYPES
// =============================================================================

/// Constant type of an expression: a simple expression carries its own,
/// a compound one is the minimum of its parts.
pub fn expression_constant_type(exp: &ExpressionNode) -> ConstantType {
    match exp {
        ExpressionNode::Simple(e) => e.const_type,
        ExpressionNode::Compound(c) => parts_constant_type(&c.children),
    }
}

fn parts_constant_type(parts: &[CompoundPart]) -> ConstantType {
    let mut result = ConstantType::CanStringify;
    for part in parts {
        let part_type = match part {
            CompoundPart::Simple(e) => e.const_type,
            CompoundPart::Compound(c) => parts_constant_type(&c.children),
            CompoundPart::Interpolation(i) => expression_constant_type(&i.content),
            CompoundPart::Text(_) => ConstantType::CanStringify,
            CompoundPart::Str(_) | CompoundPart::Helper(_) => continue,
        };
        if part_type == ConstantType::NotConstant {
            return ConstantType::NotConstant;
        }
        result = result.min(part_type);
    }
    result
}

/// Constant type of a codegen value; only expressions can be constant.
pub fn js_constant_type(node: &JsNode) -> ConstantType {
    match node {
        JsNode::Simple(e) => e.const_type,
        JsNode::Compound(c) => parts_constant_type(&c.children),
        _ => ConstantType::NotConstant,
    }
}

/// Normalization helpers whose result is as constant as their argument.
fn helper_call_constant_type(node: &JsNode) -> ConstantType {
    if let JsNode::Call(call) = node {
        let allowed = matches!(
            call.callee,
            Callee::Helper(
                RuntimeHelper::NormalizeClass
                    | RuntimeHelper::NormalizeStyle
                    | RuntimeHelper::NormalizeProps
                    | RuntimeHelper::GuardReactiveProps
            )
        );
        if allowed {
            match call.arguments.first() {
                Some(JsNode::Simple(e)) => return e.const_type,
                Some(inner @ JsNode::Call(_)) => return helper_call_constant_type(inner),
                _ => {}
            }
        }
    }
    ConstantType::NotConstant
}

/// Constant type of the props object an element's vnode call was built with.
pub fn generated_props_constant_type(element: &ElementNode) -> ConstantType {
    let mut result = ConstantType::CanStringify;
    let Some(JsNode::VNode(vnode)) = &element.codegen else {
        return result;
    };
    if let Some(JsNode::Object(object)) = &vnode.props {
        for property in &object.properties {
            let key_type = expression_constant_type(&property.key);
            if key_type == ConstantType::NotConstant {
                return key_type;
            }
            result = result.min(key_type);
            let value_type = match &property.value {
                JsNode::Simple(e) => e.const_type,
                call @ JsNode::Call(_) => helper_call_constant_type(call),
                _ => ConstantType::NotConstant,
            };
            if value_type == ConstantType::NotConstant {
                return value_type;
            }
            result = result.min(value_type);
        }
    }
    result
}

fn cache_key(element: &ElementNode) -> usize {
    element as *const ElementNode as usize
}

/// How constant a template node's compiled output is.
///
/// Plain elements whose only reason to be a block is being `<svg>` or
/// `<foreignObject>` are turned back into plain vnodes when constant.
pub fn get_constant_type(node: &mut TemplateNode, ctx: &mut TransformContext) -> ConstantType {
    match node {
        TemplateNode::Element(element) => element_constant_type(element, ctx),
        TemplateNode::Text(_) | TemplateNode::Comment(_) => ConstantType::CanStringify,
        TemplateNode::If(_) | TemplateNode::For(_) => ConstantType::NotConstant,
        TemplateNode::Interpolation(i) => expression_constant_type(&i.content),
        TemplateNode::TextCall(t) => get_constant_type(&mut t.content, ctx),
        TemplateNode::Compound(c) => parts_constant_type(&c.children),
    }
}

fn element_constant_type(element: &mut ElementNode, ctx: &mut TransformContext) -> ConstantType {
    if element.tag_type != ElementType::Element {
        return ConstantType::NotConstant;
    }
    let key = cache_key(element);
    if let Some(cached) = ctx.constant_cache.get(&key) {
        return *cached;
    }
    let Some(JsNode::VNode(vnode)) = &element.codegen else {
        return ConstantType::NotConstant;
    };
    if vnode.is_block && element.tag != "svg" && element.tag != "foreignObject" {
        return ConstantType::NotConstant;
    }
    if vnode.patch_flag.is_some() {
        ctx.constant_cache.insert(key, ConstantType::NotConstant);
        return ConstantType::NotConstant;
    }

    let mut result = generated_props_constant_type(element);
    if result == ConstantType::NotConstant {
        ctx.constant_cache.insert(key, result);
        return result;
    }
    for child in element.children.iter_mut() {
        let child_type = get_constant_type(child, ctx);
        if child_type == ConstantType::NotConstant {
            ctx.constant_cache.insert(key, child_type);
            return child_type;
        }
        result = result.min(child_type);
    }

    // bound values can only lower a result that could skip patching
    if result > ConstantType::CanSkipPatch {
        for prop in &element.props {
            if let PropNode::Directive(d) = prop {
                if let (true, Some(exp)) = (d.name == "bind", &d.exp) {
                    let exp_type = expression_constant_type(exp);
                    if exp_type == ConstantType::NotConstant {
                        ctx.constant_cache.insert(key, exp_type);
                        return exp_type;
                    }
                    result = result.min(exp_type);
                }
            }
        }
    }

    if let Some(JsNode::VNode(vnode)) = element.codegen.as_mut() {
        if vnode.is_block {
            let ssr = ctx.is_ssr();
            ctx.remove_helper(RuntimeHelper::OpenBlock);
            ctx.remove_helper(RuntimeHelper::vnode(true, ssr, vnode.is_component));
            vnode.is_block = false;
            ctx.helper(RuntimeHelper::vnode(false, ssr, vnode.is_component));
        }
    }
    ctx.constant_cache.insert(key, result);
    result
}

// =============================================================================
// HOISTING
// =============================================================================

/// Hoist every static subtree under `root` into `ctx.hoists`.
pub fn hoist_static(root: &mut RootNode, ctx: &mut TransformContext) {
    ctx.constant_cache.clear();
    let single_element_root =
        root.children.len() == 1 && matches!(&root.children[0], TemplateNode::Element(e) if !is_slot_outlet(e));
    walk(&mut root.children, ctx, single_element_root);
    ctx.constant_cache.clear();
}

/// Walk a sibling list; returns whether every child was hoisted.
fn walk(children: &mut Vec<TemplateNode>, ctx: &mut TransformContext, do_not_hoist: bool) -> bool {
    let original_count = children.len();
    let mut hoisted_count = 0;

    for child in children.iter_mut() {
        if let TemplateNode::Element(element) = child {
            if element.tag_type == ElementType::Element {
                let constant_type = if do_not_hoist {
                    ConstantType::NotConstant
                } else {
                    element_constant_type(element, ctx)
                };
                if constant_type >= ConstantType::CanHoist {
                    hoist_element(element, ctx);
                    hoisted_count += 1;
                    continue;
                }
                if constant_type == ConstantType::NotConstant {
                    hoist_static_props(element, ctx);
                }
            }
        } else if let TemplateNode::TextCall(text_call) = child {
            let constant_type = if do_not_hoist {
                ConstantType::NotConstant
            } else {
                get_constant_type(&mut text_call.content, ctx)
            };
            if constant_type >= ConstantType::CanHoist {
                if let Some(codegen) = text_call.codegen.take() {
                    text_call.codegen = Some(ctx.hoist(codegen));
                    hoisted_count += 1;
                }
                continue;
            }
        }

        match child {
            TemplateNode::Element(element) => {
                let is_component = element.tag_type == ElementType::Component;
                if is_component {
                    ctx.scopes.v_slot += 1;
                }
                walk_element(element, ctx);
                if is_component {
                    ctx.scopes.v_slot -= 1;
                }
            }
            // Branch and loop children stay distinct blocks; only their props hoist
            TemplateNode::For(for_node) => {
                walk(&mut for_node.children, ctx, true);
            }
            TemplateNode::If(if_node) => {
                for branch in if_node.branches.iter_mut() {
                    walk(&mut branch.children, ctx, true);
                }
            }
            _ => {}
        }
    }

    if hoisted_count > 0 {
        if let Some(transform_hoist) = ctx.options.transform_hoist.clone() {
            transform_hoist(children, ctx);
        }
    }
    hoisted_count > 0 && hoisted_count == original_count
}

fn walk_element(element: &mut ElementNode, ctx: &mut TransformContext) {
    let all_hoisted = walk(&mut element.children, ctx, false);
    if !all_hoisted || element.tag_type != ElementType::Element {
        return;
    }
    let refs: Vec<JsNode> = element.children.iter().filter_map(|c| c.codegen().cloned()).collect();
    if let Some(JsNode::VNode(vnode)) = element.codegen.as_mut() {
        if vnode.children == Some(VNodeChildren::Owned) {
            let hoisted = ctx.hoist(JsNode::array(refs));
            vnode.children = Some(VNodeChildren::Expr(Box::new(hoisted)));
        }
    }
}

fn hoist_element(element: &mut ElementNode, ctx: &mut TransformContext) {
    let Some(JsNode::VNode(mut vnode)) = element.codegen.take() else {
        return;
    };
    vnode.patch_flag = Some(PatchFlags::HOISTED);
    resolve_owned_children(&mut vnode, &element.children);
    element.codegen = Some(ctx.hoist(JsNode::VNode(vnode)));
}

fn hoist_static_props(element: &mut ElementNode, ctx: &mut TransformContext) {
    let props_type = generated_props_constant_type(element);
    let Some(JsNode::VNode(vnode)) = element.codegen.as_mut() else {
        return;
    };
    let flag_allows = match vnode.patch_flag {
        None => true,
        Some(flag) => flag == PatchFlags::NEED_PATCH || flag == PatchFlags::TEXT,
    };
    if flag_allows && props_type >= ConstantType::CanHoist {
        if let Some(props) = vnode.props.take() {
            vnode.props = Some(ctx.hoist(props));
        }
    }
    if let Some(dynamic_props) = vnode.dynamic_props.take() {
        vnode.dynamic_props = Some(ctx.hoist(dynamic_props));
    }
}

/// A hoisted vnode leaves its element behind, so child references are
/// replaced with the children's own codegen.
fn resolve_owned_children(vnode: &mut VNodeCall, children: &[TemplateNode]) {
    if vnode.children == Some(VNodeChildren::Owned) {
        let detached = children.iter().map(detached_child).collect();
        vnode.children = Some(VNodeChildren::Expr(Box::new(JsNode::array(detached))));
    }
}

fn detached_child(node: &TemplateNode) -> JsNode {
    match node {
        TemplateNode::Element(element) => match &element.codegen {
            Some(JsNode::VNode(vnode)) => {
                let mut vnode = vnode.clone();
                resolve_owned_children(&mut vnode, &element.children);
                JsNode::VNode(vnode)
            }
            Some(other) => other.clone(),
            None => JsNode::Template(Box::new(node.clone())),
        },
        TemplateNode::TextCall(text_call) => text_call
            .codegen
            .clone()
            .unwrap_or_else(|| JsNode::Template(Box::new(text_call.content.clone()))),
        other => JsNode::Template(Box::new(other.clone())),
    }
}

/// Runs of adjacent siblings whose output can be stringified, for use by a
/// `transform_hoist` hook. Elements are only included once hoisted.
pub fn stringifiable_runs(children: &mut [TemplateNode], ctx: &mut TransformContext) -> Vec<Range<usize>> {
    let mut runs = Vec::new();
    let mut start: Option<usize> = None;
    for (i, child) in children.iter_mut().enumerate() {
        let hoisted_element = matches!(
            child,
            TemplateNode::Element(e) if matches!(&e.codegen, Some(JsNode::Simple(s)) if s.hoisted.is_some())
        );
        let eligible = match child {
            TemplateNode::Element(_) => hoisted_element && get_constant_type(child, ctx) == ConstantType::CanStringify,
            TemplateNode::Text(_) | TemplateNode::Comment(_) => true,
            TemplateNode::TextCall(_) => get_constant_type(child, ctx) == ConstantType::CanStringify,
            _ => false,
        };
        match (eligible, start) {
            (true, None) => start = Some(i),
            (false, Some(s)) => {
                runs.push(s..i);
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        runs.push(s..children.len());
    }
    runs
}
