// ============================================================================
// spark-weave - v-once
// Caches an element's (or its if / for node's) vnode after the first render
// ============================================================================

use std::rc::Rc;

use crate::compiler::ast::RuntimeHelper;
use crate::compiler::transform::{ExitFn, ExitFns, NodeCursor, NodeTransform, TransformContext};
use crate::compiler::utils::find_dir;

/// The directive is removed on first sight; the walk into a replacement
/// node (if branch, loop body) never sees it again.
pub fn transform_once() -> NodeTransform {
    Rc::new(|cursor: &mut NodeCursor<'_>, ctx: &mut TransformContext| {
        let mut exits = ExitFns::new();
        let Some(element) = cursor.element() else {
            return exits;
        };
        let Some(at) = find_dir(element, &["once"], true) else {
            return exits;
        };
        element.props.remove(at);
        if ctx.in_v_once {
            return exits;
        }

        ctx.in_v_once = true;
        ctx.scopes.v_once += 1;
        ctx.helper(RuntimeHelper::SetBlockTracking);
        let exit: ExitFn = Box::new(|cursor: &mut NodeCursor<'_>, ctx: &mut TransformContext| {
            ctx.in_v_once = false;
            ctx.scopes.v_once -= 1;
            if let Some(slot) = cursor.node().and_then(|n| n.codegen_mut()) {
                if let Some(codegen) = slot.take() {
                    *slot = Some(ctx.cache(codegen, true));
                }
            }
        });
        exits.push(exit);
        exits
    })
}
