// ============================================================================
// spark-weave - v-if
// Groups v-if / v-else-if / v-else siblings into one if node with a chain of
// conditional codegen nodes
// ============================================================================

use crate::compiler::ast::{
    ChildRef, ConditionalExpression, ConstantType, DirectiveNode, ElementNode, ElementType, ExpressionNode,
    IfBranchNode, IfNode, JsNode, PatchFlags, PropNode, RuntimeHelper, SimpleExpression, TemplateNode, TextNode,
    VNodeChildren, VNodeTag,
};
use crate::compiler::errors::ErrorCode;
use crate::compiler::transform::{
    create_vnode_call, traverse_branch, ExitFn, NodeCursor, NodeTransform, ParentKind, TransformContext,
};
use crate::compiler::utils::{find_dir, find_prop, make_block};

use super::{branch_key, create_structural_directive_transform, inject_key, process_expression};

pub fn transform_if() -> NodeTransform {
    create_structural_directive_transform(&["if", "else", "else-if"], process_if)
}

fn process_if(cursor: &mut NodeCursor<'_>, mut dir: DirectiveNode, ctx: &mut TransformContext) -> Option<ExitFn> {
    let missing = dir.exp.as_ref().is_none_or(|e| e.to_source().trim().is_empty());
    if dir.name != "else" && missing {
        let loc = dir.exp.as_ref().map_or(&dir.loc, ExpressionNode::loc).clone();
        ctx.report(ErrorCode::VIfNoExpression, &loc);
        dir.exp = Some(SimpleExpression::new("true", false, loc, ConstantType::NotConstant).into());
    }
    if ctx.options.prefix_identifiers {
        if let Some(ExpressionNode::Simple(exp)) = &dir.exp {
            let exp = exp.clone();
            dir.exp = Some(process_expression(exp, ctx, false, false));
        }
    }

    if dir.name == "if" {
        process_if_root(cursor, dir, ctx)
    } else {
        process_else(cursor, dir, ctx);
        None
    }
}

fn create_if_branch(element: Box<ElementNode>, dir: DirectiveNode) -> IfBranchNode {
    let is_template_if = element.tag_type == ElementType::Template;
    let user_key = find_prop(&element, "key", false, false).map(|i| element.props[i].clone());
    let loc = element.loc.clone();
    let children = if is_template_if && find_dir(&element, &["for"], false).is_none() {
        element.children
    } else {
        vec![TemplateNode::Element(element)]
    };
    IfBranchNode {
        condition: if dir.name == "else" { None } else { dir.exp },
        children,
        user_key,
        is_template_if,
        loc,
    }
}

/// Number of branches in if nodes before `index`; keys stay unique across
/// sibling if chains.
fn key_base(siblings: &[TemplateNode], index: usize) -> usize {
    siblings[..index]
        .iter()
        .map(|s| match s {
            TemplateNode::If(n) => n.branches.len(),
            _ => 0,
        })
        .sum()
}

fn process_if_root(cursor: &mut NodeCursor<'_>, dir: DirectiveNode, _ctx: &mut TransformContext) -> Option<ExitFn> {
    let base = {
        let (siblings, index) = cursor.siblings_mut()?;
        key_base(siblings, index)
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
    let loc = element.loc.clone();
    *node = TemplateNode::If(Box::new(IfNode {
        branches: vec![create_if_branch(element, dir)],
        loc,
        codegen: None,
    }));

    Some(Box::new(move |cursor: &mut NodeCursor<'_>, ctx: &mut TransformContext| {
        if let Some(TemplateNode::If(if_node)) = cursor.node() {
            let codegen = create_codegen_for_branch(if_node, 0, base, ctx);
            if_node.codegen = Some(codegen);
        }
    }))
}

enum Preceding {
    Comment,
    Blank,
    If,
    Other,
}

fn process_else(cursor: &mut NodeCursor<'_>, dir: DirectiveNode, ctx: &mut TransformContext) {
    let Some(element_loc) = cursor.node_ref().map(|n| n.loc().clone()) else {
        return;
    };
    let mut comments = Vec::new();
    loop {
        let Some((siblings, index)) = cursor.siblings_mut() else {
            return;
        };
        let preceding = match index.checked_sub(1).map(|prev| &siblings[prev]) {
            Some(TemplateNode::Comment(_)) => Preceding::Comment,
            Some(TemplateNode::Text(t)) if t.content.trim().is_empty() => Preceding::Blank,
            Some(TemplateNode::If(_)) => Preceding::If,
            _ => Preceding::Other,
        };
        match preceding {
            Preceding::Comment => {
                if let Some(comment) = cursor.remove_sibling(index - 1) {
                    comments.insert(0, comment);
                }
            }
            Preceding::Blank => {
                cursor.remove_sibling(index - 1);
            }
            Preceding::If => break,
            Preceding::Other => {
                ctx.report(ErrorCode::VElseNoAdjacentIf, &element_loc);
                return;
            }
        }
    }

    let in_transition = matches!(cursor.parent(), ParentKind::Element { tag, .. } if tag == "transition" || tag == "Transition");
    let Some(TemplateNode::Element(element)) = cursor.take() else {
        return;
    };
    let is_else_if = dir.name == "else-if";
    let mut branch = create_if_branch(element, dir);
    if !comments.is_empty() && !in_transition {
        branch.children.splice(0..0, comments);
    }

    let Some((siblings, index)) = cursor.siblings_mut() else {
        return;
    };
    // the current node is gone, so the if node now sits at `index - 1`
    let Some(at) = index.checked_sub(1) else {
        return;
    };
    let base = key_base(siblings, at);
    let TemplateNode::If(if_node) = &mut siblings[at] else {
        return;
    };

    if is_else_if && if_node.branches.last().is_some_and(|b| b.condition.is_none()) {
        ctx.report(ErrorCode::VElseNoAdjacentIf, &element_loc);
    }
    if let Some(key) = &branch.user_key {
        for existing in &if_node.branches {
            if is_same_key(existing.user_key.as_ref(), key) {
                ctx.report(ErrorCode::VIfSameKey, key.loc());
            }
        }
    }

    if_node.branches.push(branch);
    let b = if_node.branches.len() - 1;
    // removed from the sibling list, so it has to be walked here
    traverse_branch(&mut if_node.branches[b], ctx);
    let codegen = create_codegen_for_branch(if_node, b, base + b, ctx);
    if let Some(parent_condition) = last_condition(if_node.codegen.as_mut()) {
        parent_condition.alternate = codegen;
    }
}

fn is_same_key(a: Option<&PropNode>, b: &PropNode) -> bool {
    match (a, b) {
        (Some(PropNode::Attribute(a)), PropNode::Attribute(b)) => {
            a.value.as_ref().map(|v| &v.content) == b.value.as_ref().map(|v| &v.content)
        }
        (Some(PropNode::Directive(a)), PropNode::Directive(b)) => match (&a.exp, &b.exp) {
            (Some(ExpressionNode::Simple(a)), Some(ExpressionNode::Simple(b))) => {
                a.is_static == b.is_static && a.content == b.content
            }
            _ => false,
        },
        _ => false,
    }
}

/// The innermost conditional of a chain, looking through a v-once cache.
fn last_condition(codegen: Option<&mut JsNode>) -> Option<&mut ConditionalExpression> {
    let mut node = codegen?;
    loop {
        match node {
            JsNode::Conditional(conditional) => {
                if matches!(conditional.alternate, JsNode::Conditional(_)) {
                    node = &mut conditional.alternate;
                } else {
                    return Some(&mut **conditional);
                }
            }
            JsNode::Cache(cache) => node = &mut cache.value,
            _ => return None,
        }
    }
}

fn create_codegen_for_branch(if_node: &mut IfNode, b: usize, key_index: usize, ctx: &mut TransformContext) -> JsNode {
    let children = create_children_codegen(if_node, b, key_index, ctx);
    match if_node.branches[b].condition.clone() {
        Some(condition) => {
            let comment = ctx.helper(RuntimeHelper::CreateComment);
            let placeholder = JsNode::call(comment, vec![JsNode::Code("\"v-if\"".to_string()), JsNode::Code("true".to_string())]);
            JsNode::conditional(condition.into(), children, placeholder)
        }
        None => children,
    }
}

fn create_children_codegen(if_node: &mut IfNode, b: usize, key_index: usize, ctx: &mut TransformContext) -> JsNode {
    let branch = &mut if_node.branches[b];
    let key = branch_key(key_index);

    if let [TemplateNode::Element(element)] = branch.children.as_mut_slice() {
        if let Some(codegen) = element.codegen.as_mut() {
            if let JsNode::VNode(vnode) = &mut *codegen {
                make_block(vnode, ctx);
            }
            inject_key(codegen, key, ctx);
        }
        return JsNode::ChildRef(ChildRef::branch_child(b, 0));
    }

    if let [TemplateNode::For(for_node)] = branch.children.as_mut_slice() {
        // the loop fragment already is a block; no nested fragment
        if let Some(codegen) = for_node.codegen.as_mut() {
            inject_key(codegen, key, ctx);
        }
        return JsNode::ChildRef(ChildRef::branch_child(b, 0));
    }

    let mut flag = PatchFlags::STABLE_FRAGMENT;
    let non_comments = branch
        .children
        .iter()
        .filter(|c| !matches!(c, TemplateNode::Comment(_)))
        .count();
    if !branch.is_template_if && non_comments == 1 {
        flag |= PatchFlags::DEV_ROOT_FRAGMENT;
    }
    let loc = branch.loc.clone();
    let fragment = ctx.helper(RuntimeHelper::Fragment);
    let call = create_vnode_call(
        ctx,
        VNodeTag::Helper(fragment),
        Some(JsNode::object(vec![key])),
        Some(VNodeChildren::BranchChildren(b)),
        Some(flag),
        None,
        None,
        true,
        false,
        false,
        loc,
    );
    JsNode::VNode(Box::new(call))
}
