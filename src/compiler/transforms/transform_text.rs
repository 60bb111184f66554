// ============================================================================
// spark-weave - Text
// Merges adjacent text and interpolations, and wraps text that has to be its
// own vnode in `createTextVNode` calls
// ============================================================================

use std::rc::Rc;

use crate::compiler::ast::{
    CompoundExpression, CompoundPart, ConstantType, ElementType, JsNode, PatchFlags, PropNode, RuntimeHelper,
    SourceLocation, TemplateNode, TextCallNode, TextNode,
};
use crate::compiler::hoist_static::get_constant_type;
use crate::compiler::transform::{ExitFn, ExitFns, NodeCursor, NodeTransform, TransformContext};

pub fn transform_text() -> NodeTransform {
    Rc::new(|cursor: &mut NodeCursor<'_>, _ctx: &mut TransformContext| {
        let mut exits = ExitFns::new();
        let has_children = cursor.root_node().is_some()
            || cursor.branch_node().is_some()
            || matches!(cursor.node_ref(), Some(TemplateNode::Element(_) | TemplateNode::For(_)));
        if has_children {
            let exit: ExitFn = Box::new(process_text_children);
            exits.push(exit);
        }
        exits
    })
}

fn is_text(node: &TemplateNode) -> bool {
    matches!(node, TemplateNode::Text(_) | TemplateNode::Interpolation(_))
}

fn into_part(node: TemplateNode) -> Option<CompoundPart> {
    match node {
        TemplateNode::Text(t) => Some(CompoundPart::Text(t)),
        TemplateNode::Interpolation(i) => Some(CompoundPart::Interpolation(i)),
        TemplateNode::Compound(c) => Some(CompoundPart::Compound(c)),
        _ => None,
    }
}

/// Fold every run of adjacent text into one compound node. Returns whether
/// any text was seen.
fn merge_adjacent_text(children: &mut Vec<TemplateNode>) -> bool {
    let mut has_text = false;
    let mut i = 0;
    while i < children.len() {
        if is_text(&children[i]) {
            has_text = true;
            while i + 1 < children.len() && is_text(&children[i + 1]) {
                let next = children.remove(i + 1);
                if !matches!(children[i], TemplateNode::Compound(_)) {
                    let placeholder = TemplateNode::Text(TextNode {
                        content: String::new(),
                        loc: SourceLocation::stub(),
                    });
                    let first = std::mem::replace(&mut children[i], placeholder);
                    let loc = first.loc().clone();
                    let parts = into_part(first).into_iter().collect();
                    children[i] = TemplateNode::Compound(CompoundExpression::new(parts, loc));
                }
                if let TemplateNode::Compound(compound) = &mut children[i] {
                    compound.loc.end = next.loc().end;
                    compound.loc.source.push_str(&next.loc().source);
                    compound.children.push(CompoundPart::Str(" + ".into()));
                    compound.children.extend(into_part(next));
                }
            }
        }
        i += 1;
    }
    has_text
}

fn process_text_children(cursor: &mut NodeCursor<'_>, ctx: &mut TransformContext) {
    // a lone text child of the root or a plain element is set as the
    // element's text content directly
    let inlines_single_text = cursor.root_node().is_some()
        || match cursor.node_ref() {
            Some(TemplateNode::Element(e)) => {
                e.tag_type == ElementType::Element
                    && !e.props.iter().any(|p| {
                        matches!(p, PropNode::Directive(d) if !ctx.options.directive_transforms.contains_key(&d.name))
                    })
            }
            _ => false,
        };
    let Some(children) = cursor.children_mut() else {
        return;
    };

    let has_text = merge_adjacent_text(children);
    if !has_text || (children.len() == 1 && inlines_single_text) {
        return;
    }

    let ssr = ctx.is_ssr();
    for child in children.iter_mut() {
        if !is_text(child) && !matches!(child, TemplateNode::Compound(_)) {
            continue;
        }
        let mut args = Vec::new();
        // `createTextVNode()` defaults to a single space
        if !matches!(child, TemplateNode::Text(t) if t.content == " ") {
            args.push(JsNode::Template(Box::new(child.clone())));
        }
        if !ssr && get_constant_type(child, ctx) == ConstantType::NotConstant {
            args.push(JsNode::Code(PatchFlags::TEXT.to_code()));
        }
        let create_text = ctx.helper(RuntimeHelper::CreateText);
        let loc = child.loc().clone();
        let content = std::mem::replace(
            child,
            TemplateNode::Text(TextNode {
                content: String::new(),
                loc: SourceLocation::stub(),
            }),
        );
        *child = TemplateNode::TextCall(Box::new(TextCallNode {
            content,
            loc,
            codegen: Some(JsNode::call(create_text, args)),
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::ast::{Callee, ElementNode, VNodeChildren};
    use crate::compiler::compile::{base_compile, CompileResult};
    use crate::compiler::options::CompilerOptions;

    fn compile(src: &str) -> CompileResult {
        base_compile(src, CompilerOptions::default())
    }

    fn first_element(result: &CompileResult) -> &ElementNode {
        result.ast.children[0]
            .as_element()
            .unwrap_or_else(|| panic!("expected element, got {:?}", result.ast.children[0]))
    }

    fn text_call_args(node: &TemplateNode) -> &[JsNode] {
        let TemplateNode::TextCall(call) = node else {
            panic!("expected text call, got {node:?}");
        };
        match &call.codegen {
            Some(JsNode::Call(c)) => {
                assert_eq!(c.callee, Callee::Helper(RuntimeHelper::CreateText));
                &c.arguments
            }
            other => panic!("unexpected codegen {other:?}"),
        }
    }

    // =========================================================================
    // Merging
    // =========================================================================

    #[test]
    fn adjacent_text_and_interpolations_merge() {
        let result = compile("<div>{{ a }} and {{ b }}</div>");
        let div = first_element(&result);
        assert_eq!(div.children.len(), 1);
        let TemplateNode::Compound(compound) = &div.children[0] else {
            panic!("expected compound, got {:?}", div.children[0]);
        };
        assert_eq!(compound.children.len(), 5);
        assert!(matches!(&compound.children[0], CompoundPart::Interpolation(_)));
        assert_eq!(compound.children[1], CompoundPart::Str(" + ".into()));
        assert!(matches!(&compound.children[2], CompoundPart::Text(t) if t.content == " and "));
        assert_eq!(compound.loc.source, "{{ a }} and {{ b }}");

        let vnode = div.codegen.as_ref().and_then(JsNode::as_vnode).unwrap_or_else(|| panic!("no vnode"));
        assert!(matches!(vnode.children, Some(VNodeChildren::Single(_))));
        assert_eq!(vnode.patch_flag, Some(PatchFlags::TEXT));
    }

    #[test]
    fn lone_root_interpolation_is_left_alone() {
        let result = compile("{{ a }}");
        assert!(matches!(result.ast.children[0], TemplateNode::Interpolation(_)));
    }

    // =========================================================================
    // Text vnodes
    // =========================================================================

    #[test]
    fn text_beside_elements_becomes_text_vnodes() {
        let result = compile("<div>hi<span/></div>");
        let args = text_call_args(&first_element(&result).children[0]);
        assert_eq!(args.len(), 1);
        assert!(matches!(&args[0], JsNode::Template(t) if matches!(**t, TemplateNode::Text(_))));
    }

    #[test]
    fn dynamic_text_vnodes_carry_the_text_flag() {
        let result = compile("<div>{{ a }}<span/></div>");
        let args = text_call_args(&first_element(&result).children[0]);
        assert_eq!(args.len(), 2);
        assert_eq!(args[1], JsNode::Code("1 /* TEXT */".into()));
    }

    #[test]
    fn a_single_space_needs_no_argument() {
        let result = compile("<div><span/> <span/></div>");
        let args = text_call_args(&first_element(&result).children[1]);
        assert!(args.is_empty());
    }

    #[test]
    fn components_and_custom_directives_need_text_vnodes() {
        let component = compile("<Comp>hi</Comp>");
        text_call_args(&first_element(&component).children[0]);

        let directive = compile("<div v-foo>hi</div>");
        text_call_args(&first_element(&directive).children[0]);

        let bound = compile("<div :id=\"x\">hi</div>");
        assert!(matches!(first_element(&bound).children[0], TemplateNode::Text(_)));
    }
}
