// ============================================================================
// spark-weave - Element Lowering
// Turns elements and components into vnode calls: tag resolution, props,
// patch flags, runtime directives and children
// ============================================================================

use std::rc::Rc;
use std::sync::LazyLock;

use indexmap::IndexMap;
use regex_lite::Regex;
use rustc_hash::FxBuildHasher;

use crate::compiler::ast::{
    ConstantType, DirectiveNode, ElementNode, ElementType, ExpressionNode, JsNode, PatchFlags, PropNode, Property,
    RuntimeHelper, SimpleExpression, SourceLocation, TemplateNode, VNodeChildren, VNodeTag,
};
use crate::compiler::errors::ErrorCode;
use crate::compiler::hoist_static::{get_constant_type, js_constant_type};
use crate::compiler::transform::{
    create_vnode_call, ExitFn, ExitFns, NeedRuntime, NodeCursor, NodeTransform, TransformContext,
};
use crate::compiler::utils::{
    camelize, capitalize, find_dir_node, find_prop, inner_range, is_core_component, to_valid_asset_id,
};

use super::v_slot::build_slots;

static SELF_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([^/\\]+)\.\w+$").expect("file name pattern"));

/// Props that never make an element need patching by themselves.
const RESERVED_PROPS: &[&str] = &[
    "",
    "key",
    "ref",
    "ref_for",
    "ref_key",
    "onVnodeBeforeMount",
    "onVnodeMounted",
    "onVnodeBeforeUpdate",
    "onVnodeUpdated",
    "onVnodeBeforeUnmount",
    "onVnodeUnmounted",
];

fn is_reserved_prop(name: &str) -> bool {
    RESERVED_PROPS.contains(&name)
}

/// `onClick`, `onUpdate:x`; not `once`.
fn is_on(name: &str) -> bool {
    name.starts_with("on") && name[2..].chars().next().is_some_and(|c| !c.is_ascii_lowercase())
}

/// `component` or `Component`.
fn is_component_tag(tag: &str) -> bool {
    let mut chars = tag.chars();
    chars
        .next()
        .is_some_and(|first| first.to_ascii_lowercase() == 'c' && chars.as_str() == "omponent")
}

/// The component name implied by the template's file name.
fn self_name(filename: &str) -> Option<String> {
    let path = filename.split('?').next().unwrap_or_default();
    let caps = SELF_NAME.captures(path)?;
    Some(capitalize(&camelize(caps.get(1)?.as_str())))
}

// =============================================================================
// ELEMENT TRANSFORM
// =============================================================================

/// Generates the vnode call of plain elements and components once their
/// children are done.
pub fn transform_element() -> NodeTransform {
    Rc::new(|_cursor: &mut NodeCursor<'_>, _ctx: &mut TransformContext| {
        let mut exits = ExitFns::new();
        let exit: ExitFn = Box::new(post_transform_element);
        exits.push(exit);
        exits
    })
}

fn post_transform_element(cursor: &mut NodeCursor<'_>, ctx: &mut TransformContext) {
    let Some(element) = cursor.element() else {
        return;
    };
    if !matches!(element.tag_type, ElementType::Element | ElementType::Component) {
        return;
    }
    let is_component = element.tag_type == ElementType::Component;
    let tag = if is_component {
        resolve_component_type(element, ctx, false)
    } else {
        VNodeTag::Name(format!("\"{}\"", element.tag))
    };
    let built_in = match &tag {
        VNodeTag::Helper(helper) => Some(*helper),
        _ => None,
    };

    let mut should_use_block = matches!(tag, VNodeTag::Dynamic(_))
        || matches!(built_in, Some(RuntimeHelper::Teleport | RuntimeHelper::Suspense))
        || (!is_component
            // svg needs its own block to carry the namespace into block updates
            && (element.tag == "svg"
                || element.tag == "foreignObject"
                || find_prop(element, "key", true, false).is_some()));

    let mut patch_flag = PatchFlags::empty();
    let mut props = None;
    let mut dynamic_prop_names = Vec::new();
    let mut directives = None;
    if !element.props.is_empty() {
        let built = build_props(element, &element.props, ctx, false);
        props = built.props;
        patch_flag = built.patch_flag;
        dynamic_prop_names = built.dynamic_prop_names;
        if !built.directives.is_empty() {
            let args = built.directives.iter().map(|d| build_directive_args(d, ctx)).collect();
            directives = Some(JsNode::array(args));
        }
    }

    let mut children = None;
    if !element.children.is_empty() {
        if built_in == Some(RuntimeHelper::KeepAlive) {
            // raw children: always a block, always updated
            should_use_block = true;
            patch_flag |= PatchFlags::DYNAMIC_SLOTS;
            if element.children.len() > 1 {
                let start = element.children[0].loc().start;
                let end = element.children[element.children.len() - 1].loc().end;
                ctx.report(ErrorCode::KeepAliveInvalidChildren, &SourceLocation::new(start, end, ""));
            }
        }
        let build_as_slots = is_component
            && built_in != Some(RuntimeHelper::Teleport)
            && built_in != Some(RuntimeHelper::KeepAlive);
        if build_as_slots {
            let (slots, has_dynamic_slots) = build_slots(element, ctx);
            children = Some(VNodeChildren::Slots(Box::new(slots)));
            if has_dynamic_slots {
                patch_flag |= PatchFlags::DYNAMIC_SLOTS;
            }
        } else if element.children.len() == 1 && built_in != Some(RuntimeHelper::Teleport) {
            let child = &mut element.children[0];
            let dynamic_text = matches!(child, TemplateNode::Interpolation(_) | TemplateNode::Compound(_));
            if dynamic_text && get_constant_type(child, ctx) == ConstantType::NotConstant {
                patch_flag |= PatchFlags::TEXT;
            }
            children = Some(if dynamic_text || matches!(child, TemplateNode::Text(_)) {
                VNodeChildren::Single(Box::new(child.clone()))
            } else {
                VNodeChildren::Owned
            });
        } else {
            children = Some(VNodeChildren::Owned);
        }
    }

    let (patch_flag, dynamic_props) = if patch_flag.is_empty() {
        (None, None)
    } else {
        let names = (!dynamic_prop_names.is_empty()).then(|| JsNode::Code(stringify_dynamic_prop_names(&dynamic_prop_names)));
        (Some(patch_flag), names)
    };
    let loc = element.loc.clone();
    let vnode = create_vnode_call(
        ctx,
        tag,
        props,
        children,
        patch_flag,
        dynamic_props,
        directives,
        should_use_block,
        false,
        is_component,
        loc,
    );
    element.codegen = Some(JsNode::VNode(Box::new(vnode)));
}

/// What a component tag compiles to: a dynamic resolution, a built-in
/// helper, or a resolved asset.
pub fn resolve_component_type(element: &ElementNode, ctx: &mut TransformContext, ssr: bool) -> VNodeTag {
    let mut tag = element.tag.clone();
    let is_explicit_dynamic = is_component_tag(&tag);

    if let Some(at) = find_prop(element, "is", false, false) {
        let dynamic = match &element.props[at] {
            PropNode::Attribute(attr) if is_explicit_dynamic => attr
                .value
                .as_ref()
                .map(|v| ExpressionNode::from(SimpleExpression::literal(v.content.clone()))),
            PropNode::Directive(dir) if is_explicit_dynamic => dir.exp.clone(),
            PropNode::Attribute(attr) => {
                // <button is="vue:comp">
                if let Some(name) = attr.value.as_ref().and_then(|v| v.content.strip_prefix("vue:")) {
                    tag = name.to_string();
                }
                None
            }
            PropNode::Directive(_) => None,
        };
        if let Some(exp) = dynamic {
            let resolve = ctx.helper(RuntimeHelper::ResolveDynamicComponent);
            return VNodeTag::Dynamic(Box::new(JsNode::call(resolve, vec![exp.into()])));
        }
    }

    if !is_explicit_dynamic {
        if let Some(exp) = find_dir_node(element, &["is"], false).and_then(|d| d.exp.clone()) {
            let resolve = ctx.helper(RuntimeHelper::ResolveDynamicComponent);
            return VNodeTag::Dynamic(Box::new(JsNode::call(resolve, vec![exp.into()])));
        }
    }

    let built_in = is_core_component(&tag).or_else(|| (ctx.options.is_built_in_component)(&tag));
    if let Some(helper) = built_in {
        if !ssr {
            ctx.helper(helper);
        }
        return VNodeTag::Helper(helper);
    }

    ctx.helper(RuntimeHelper::ResolveComponent);
    if self_name(&ctx.options.filename).is_some_and(|name| capitalize(&camelize(&tag)) == name) {
        ctx.components.insert(format!("{tag}__self"));
    } else {
        ctx.components.insert(tag.clone());
    }
    VNodeTag::Name(to_valid_asset_id(&tag, "component"))
}

// =============================================================================
// PROPS
// =============================================================================

/// A directive left for the runtime, with the helper implementing it when
/// it is built in.
#[derive(Clone, Debug, PartialEq)]
pub struct RuntimeDirective {
    pub dir: DirectiveNode,
    pub runtime: NeedRuntime,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct PropsBuildResult {
    pub props: Option<JsNode>,
    pub directives: Vec<RuntimeDirective>,
    pub patch_flag: PatchFlags,
    pub dynamic_prop_names: Vec<String>,
}

#[derive(Default)]
struct PatchAnalysis {
    has_ref: bool,
    has_class_binding: bool,
    has_style_binding: bool,
    has_hydration_event_binding: bool,
    has_dynamic_keys: bool,
    has_vnode_hook: bool,
    dynamic_prop_names: Vec<String>,
}

impl PatchAnalysis {
    fn analyze(&mut self, prop: &Property, is_component: bool) {
        let Some(name) = prop.static_key() else {
            self.has_dynamic_keys = true;
            return;
        };
        let is_event_handler = is_on(name);
        if !is_component
            && is_event_handler
            // click has a dedicated hydration path
            && !name.eq_ignore_ascii_case("onclick")
            && name != "onUpdate:modelValue"
            && !is_reserved_prop(name)
        {
            self.has_hydration_event_binding = true;
        }
        if is_event_handler && is_reserved_prop(name) {
            self.has_vnode_hook = true;
        }

        let constant_value = match &prop.value {
            JsNode::Cache(_) => true,
            value @ (JsNode::Simple(_) | JsNode::Compound(_)) => js_constant_type(value) > ConstantType::NotConstant,
            _ => false,
        };
        if constant_value {
            return;
        }

        match name {
            "ref" => self.has_ref = true,
            "class" => self.has_class_binding = true,
            "style" => self.has_style_binding = true,
            "key" => {}
            _ => self.push_name(name),
        }
        // a component receives class and style as ordinary props
        if is_component && (name == "class" || name == "style") {
            self.push_name(name);
        }
    }

    fn push_name(&mut self, name: &str) {
        if !self.dynamic_prop_names.iter().any(|n| n == name) {
            self.dynamic_prop_names.push(name.to_string());
        }
    }
}

/// Lower `props` of `element` into a props expression, collecting the
/// patch flag, dynamic prop names and directives needing the runtime.
pub fn build_props(element: &ElementNode, props: &[PropNode], ctx: &mut TransformContext, ssr: bool) -> PropsBuildResult {
    let is_component = element.tag_type == ElementType::Component;
    let mut properties: Vec<Property> = Vec::new();
    let mut merge_args: Vec<JsNode> = Vec::new();
    let mut runtime_directives = Vec::new();
    let mut analysis = PatchAnalysis::default();

    for prop in props {
        match prop {
            PropNode::Attribute(attr) => {
                if attr.name == "ref" {
                    analysis.has_ref = true;
                }
                let vue_is = attr.value.as_ref().is_some_and(|v| v.content.starts_with("vue:"));
                if attr.name == "is" && (is_component_tag(&element.tag) || vue_is) {
                    continue;
                }
                let key = SimpleExpression::new(
                    attr.name.clone(),
                    true,
                    inner_range(&attr.loc, 0, attr.name.len()),
                    ConstantType::CanStringify,
                );
                let value = match &attr.value {
                    Some(v) => SimpleExpression::new(v.content.clone(), true, v.loc.clone(), ConstantType::CanStringify),
                    None => SimpleExpression::new("", true, attr.loc.clone(), ConstantType::CanStringify),
                };
                properties.push(Property::new(key, value.into()));
            }
            PropNode::Directive(dir) => {
                let is_bind = dir.name == "bind";
                let is_on = dir.name == "on";
                if dir.name == "slot" {
                    if !is_component {
                        ctx.report(ErrorCode::VSlotMisplaced, &dir.loc);
                    }
                    continue;
                }
                if dir.name == "once" || dir.name == "memo" || dir.name == "is" {
                    continue;
                }
                let binds_is = matches!(&dir.arg, Some(ExpressionNode::Simple(a)) if a.is_static && a.content == "is");
                if is_bind && binds_is && is_component_tag(&element.tag) {
                    continue;
                }
                if is_on && ssr {
                    continue;
                }

                // v-bind="obj" / v-on="obj"
                if dir.arg.is_none() && (is_bind || is_on) {
                    analysis.has_dynamic_keys = true;
                    match &dir.exp {
                        Some(exp) => {
                            if !properties.is_empty() {
                                merge_args.push(JsNode::object(dedupe_properties(std::mem::take(&mut properties))));
                            }
                            if is_bind {
                                merge_args.push(exp.clone().into());
                            } else {
                                let to_handlers = ctx.helper(RuntimeHelper::ToHandlers);
                                merge_args.push(JsNode::call(to_handlers, vec![exp.clone().into()]));
                            }
                        }
                        None => {
                            let code = if is_bind {
                                ErrorCode::VBindNoExpression
                            } else {
                                ErrorCode::VOnNoExpression
                            };
                            ctx.report(code, &dir.loc);
                        }
                    }
                    continue;
                }

                match ctx.options.directive_transforms.get(&dir.name).cloned() {
                    Some(transform) => {
                        let result = transform(dir, element, ctx);
                        if !ssr {
                            for p in &result.props {
                                analysis.analyze(p, is_component);
                            }
                        }
                        properties.extend(result.props);
                        if result.need_runtime != NeedRuntime::No {
                            runtime_directives.push(RuntimeDirective {
                                dir: dir.clone(),
                                runtime: result.need_runtime,
                            });
                        }
                    }
                    None => runtime_directives.push(RuntimeDirective {
                        dir: dir.clone(),
                        runtime: NeedRuntime::Yes,
                    }),
                }
            }
        }
    }

    let mut props_expression = if !merge_args.is_empty() {
        if !properties.is_empty() {
            merge_args.push(JsNode::object(dedupe_properties(properties)));
        }
        if merge_args.len() > 1 {
            let merge = ctx.helper(RuntimeHelper::MergeProps);
            Some(JsNode::call(merge, merge_args))
        } else {
            merge_args.pop()
        }
    } else if !properties.is_empty() {
        Some(JsNode::object(dedupe_properties(properties)))
    } else {
        None
    };

    let mut patch_flag = PatchFlags::empty();
    if analysis.has_dynamic_keys {
        patch_flag |= PatchFlags::FULL_PROPS;
    } else {
        if analysis.has_class_binding && !is_component {
            patch_flag |= PatchFlags::CLASS;
        }
        if analysis.has_style_binding && !is_component {
            patch_flag |= PatchFlags::STYLE;
        }
        if !analysis.dynamic_prop_names.is_empty() {
            patch_flag |= PatchFlags::PROPS;
        }
        if analysis.has_hydration_event_binding {
            patch_flag |= PatchFlags::HYDRATE_EVENTS;
        }
    }
    if (patch_flag.is_empty() || patch_flag == PatchFlags::HYDRATE_EVENTS)
        && (analysis.has_ref || analysis.has_vnode_hook || !runtime_directives.is_empty())
    {
        patch_flag |= PatchFlags::NEED_PATCH;
    }

    if !ctx.options.in_ssr {
        props_expression = props_expression.map(|props| normalize_props(props, analysis.has_style_binding, ctx));
    }

    PropsBuildResult {
        props: props_expression,
        directives: runtime_directives,
        patch_flag,
        dynamic_prop_names: analysis.dynamic_prop_names,
    }
}

/// Pre-normalize class and style, or the whole props object when its keys
/// are only known at runtime.
fn normalize_props(props: JsNode, has_style_binding: bool, ctx: &mut TransformContext) -> JsNode {
    match props {
        JsNode::Object(mut object) => {
            let has_dynamic_key = object.properties.iter().any(|p| match &p.key {
                ExpressionNode::Simple(k) => !k.is_static && !k.is_handler_key,
                ExpressionNode::Compound(k) => !k.is_handler_key,
            });
            if has_dynamic_key {
                let normalize = ctx.helper(RuntimeHelper::NormalizeProps);
                return JsNode::call(normalize, vec![JsNode::Object(object)]);
            }
            let is_static_value = |value: &JsNode| matches!(value, JsNode::Simple(e) if e.is_static);
            if let Some(class) = object.properties.iter_mut().find(|p| p.static_key() == Some("class")) {
                if !is_static_value(&class.value) {
                    let value = std::mem::replace(&mut class.value, JsNode::Code(String::new()));
                    let normalize = ctx.helper(RuntimeHelper::NormalizeClass);
                    class.value = JsNode::call(normalize, vec![value]);
                }
            }
            if let Some(style) = object.properties.iter_mut().find(|p| p.static_key() == Some("style")) {
                // a static style is an object literal; only bound or merged ones need normalizing
                let needs = !is_static_value(&style.value)
                    && (has_style_binding || matches!(style.value, JsNode::Array(_)));
                if needs {
                    let value = std::mem::replace(&mut style.value, JsNode::Code(String::new()));
                    let normalize = ctx.helper(RuntimeHelper::NormalizeStyle);
                    style.value = JsNode::call(normalize, vec![value]);
                }
            }
            JsNode::Object(object)
        }
        call @ JsNode::Call(_) => call,
        single => {
            let guard = ctx.helper(RuntimeHelper::GuardReactiveProps);
            let normalize = ctx.helper(RuntimeHelper::NormalizeProps);
            JsNode::call(normalize, vec![JsNode::call(guard, vec![single])])
        }
    }
}

/// Merge duplicate static keys: handlers, class and style become arrays,
/// any other duplicate keeps its first value.
fn dedupe_properties(properties: Vec<Property>) -> Vec<Property> {
    let mut known: IndexMap<String, usize, FxBuildHasher> = IndexMap::default();
    let mut deduped: Vec<Property> = Vec::with_capacity(properties.len());
    for prop in properties {
        let Some(name) = prop.static_key().map(str::to_string) else {
            deduped.push(prop);
            continue;
        };
        match known.get(&name) {
            Some(&at) => {
                if name == "style" || name == "class" || is_on(&name) {
                    merge_as_array(&mut deduped[at], prop);
                }
            }
            None => {
                known.insert(name, deduped.len());
                deduped.push(prop);
            }
        }
    }
    deduped
}

fn merge_as_array(existing: &mut Property, incoming: Property) {
    match &mut existing.value {
        JsNode::Array(array) => array.elements.push(incoming.value),
        value => {
            let first = std::mem::replace(value, JsNode::Code(String::new()));
            *value = JsNode::array(vec![first, incoming.value]);
        }
    }
}

/// `[dir, exp, arg, { modifier: true }]` for `withDirectives`.
fn build_directive_args(directive: &RuntimeDirective, ctx: &mut TransformContext) -> JsNode {
    let dir = &directive.dir;
    let mut args = Vec::with_capacity(4);
    match directive.runtime {
        NeedRuntime::Helper(helper) => args.push(JsNode::Helper(ctx.helper(helper))),
        NeedRuntime::Yes | NeedRuntime::No => {
            ctx.helper(RuntimeHelper::ResolveDirective);
            ctx.directives.insert(dir.name.clone());
            args.push(JsNode::Simple(SimpleExpression::dynamic(to_valid_asset_id(&dir.name, "directive"))));
        }
    }
    let void = || JsNode::Code("void 0".into());
    if let Some(exp) = &dir.exp {
        args.push(exp.clone().into());
    }
    if let Some(arg) = &dir.arg {
        if dir.exp.is_none() {
            args.push(void());
        }
        args.push(arg.clone().into());
    }
    if !dir.modifiers.is_empty() {
        if dir.arg.is_none() {
            if dir.exp.is_none() {
                args.push(void());
            }
            args.push(void());
        }
        let truthy = SimpleExpression::new("true", false, dir.loc.clone(), ConstantType::NotConstant);
        let modifiers = dir
            .modifiers
            .iter()
            .map(|m| Property::new(SimpleExpression::literal(m.clone()), truthy.clone().into()))
            .collect();
        args.push(JsNode::object(modifiers));
    }
    JsNode::array(args)
}

/// `["foo", "bar"]`
fn stringify_dynamic_prop_names(names: &[String]) -> String {
    let quoted: Vec<String> = names.iter().map(|n| format!("{n:?}")).collect();
    format!("[{}]", quoted.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::ast::{Callee, VNodeCall};
    use crate::compiler::compile::{base_compile, CompileResult};
    use crate::compiler::errors::CompilerError;
    use crate::compiler::options::{CompilerOptions, TransformOptions};
    use std::cell::RefCell;

    fn compile(src: &str) -> CompileResult {
        base_compile(src, CompilerOptions::default())
    }

    fn compile_with(src: &str, transform: TransformOptions) -> CompileResult {
        base_compile(
            src,
            CompilerOptions {
                transform,
                ..CompilerOptions::default()
            },
        )
    }

    fn vnode(node: &TemplateNode) -> &VNodeCall {
        node.codegen()
            .and_then(JsNode::as_vnode)
            .unwrap_or_else(|| panic!("expected vnode codegen on {node:?}"))
    }

    /// The vnode of the first child of the root element.
    fn inner(result: &CompileResult) -> &VNodeCall {
        let root = result.ast.children[0].as_element().unwrap_or_else(|| panic!("expected root element"));
        vnode(&root.children[0])
    }

    fn props_object(vnode: &VNodeCall) -> &[Property] {
        match &vnode.props {
            Some(JsNode::Object(o)) => &o.properties,
            other => panic!("expected props object, got {other:?}"),
        }
    }

    fn callee(node: &JsNode) -> &Callee {
        match node {
            JsNode::Call(call) => &call.callee,
            other => panic!("expected call, got {other:?}"),
        }
    }

    fn dynamic_names(vnode: &VNodeCall) -> Option<&str> {
        match &vnode.dynamic_props {
            Some(JsNode::Code(code)) => Some(code),
            _ => None,
        }
    }

    // =========================================================================
    // Tags
    // =========================================================================

    #[test]
    fn plain_element_with_static_props() {
        let result = compile("<div><span id=\"foo\" class=\"bar\"/></div>");
        let span = inner(&result);
        assert_eq!(span.tag, VNodeTag::Name("\"span\"".into()));
        let props = props_object(span);
        assert_eq!(props.len(), 2);
        assert_eq!(props[0].static_key(), Some("id"));
        assert!(span.patch_flag.is_none());
        assert!(!span.is_block);
        assert!(result.ast.helpers.contains(&RuntimeHelper::CreateElementVNode));
    }

    #[test]
    fn components_resolve_as_assets() {
        let result = compile("<Foo/>");
        let foo = vnode(&result.ast.children[0]);
        assert_eq!(foo.tag, VNodeTag::Name("_component_Foo".into()));
        assert!(foo.is_component);
        assert_eq!(result.ast.components, vec!["Foo".to_string()]);
        assert!(result.ast.helpers.contains(&RuntimeHelper::ResolveComponent));
    }

    #[test]
    fn self_referencing_component() {
        let result = compile_with(
            "<my-comp/>",
            TransformOptions {
                filename: "src/MyComp.vue".into(),
                ..TransformOptions::default()
            },
        );
        assert_eq!(result.ast.components, vec!["my-comp__self".to_string()]);
    }

    #[test]
    fn dynamic_component_is_a_block_without_is_prop() {
        let result = compile("<div><component :is=\"foo\"/></div>");
        let comp = inner(&result);
        let VNodeTag::Dynamic(call) = &comp.tag else {
            panic!("expected dynamic tag, got {:?}", comp.tag);
        };
        assert_eq!(callee(call), &Callee::Helper(RuntimeHelper::ResolveDynamicComponent));
        assert!(comp.is_block);
        assert!(comp.props.is_none());
    }

    #[test]
    fn keep_alive_keeps_raw_children() {
        let result = compile("<div><KeepAlive><A/></KeepAlive></div>");
        let keep_alive = inner(&result);
        assert_eq!(keep_alive.tag, VNodeTag::Helper(RuntimeHelper::KeepAlive));
        assert_eq!(keep_alive.patch_flag, Some(PatchFlags::DYNAMIC_SLOTS));
        assert_eq!(keep_alive.children, Some(VNodeChildren::Owned));
        assert!(keep_alive.is_block);
    }

    #[test]
    fn keep_alive_with_several_children_is_reported() {
        let errors = Rc::new(RefCell::new(Vec::new()));
        let sink = errors.clone();
        compile_with(
            "<KeepAlive><A/><B/></KeepAlive>",
            TransformOptions {
                on_error: Rc::new(move |e: CompilerError| sink.borrow_mut().push(e.code)),
                ..TransformOptions::default()
            },
        );
        assert_eq!(*errors.borrow(), vec![ErrorCode::KeepAliveInvalidChildren]);
    }

    // =========================================================================
    // Patch flags
    // =========================================================================

    #[test]
    fn bound_props_set_matching_flags() {
        let result = compile("<div><p :class=\"c\" :style=\"s\" :id=\"i\" @keyup=\"k\"/></div>");
        let p = inner(&result);
        assert_eq!(
            p.patch_flag,
            Some(PatchFlags::CLASS | PatchFlags::STYLE | PatchFlags::PROPS | PatchFlags::HYDRATE_EVENTS)
        );
        assert_eq!(dynamic_names(p), Some("[\"id\", \"onKeyup\"]"));
        let props = props_object(p);
        assert_eq!(callee(&props[0].value), &Callee::Helper(RuntimeHelper::NormalizeClass));
        assert_eq!(callee(&props[1].value), &Callee::Helper(RuntimeHelper::NormalizeStyle));
    }

    #[test]
    fn click_handlers_are_plain_props() {
        let result = compile("<div><button @click=\"go\"/></div>");
        let button = inner(&result);
        assert_eq!(button.patch_flag, Some(PatchFlags::PROPS));
        assert_eq!(dynamic_names(button), Some("[\"onClick\"]"));
    }

    #[test]
    fn refs_need_patch() {
        let result = compile("<div><p ref=\"r\"/></div>");
        assert_eq!(inner(&result).patch_flag, Some(PatchFlags::NEED_PATCH));
    }

    #[test]
    fn dynamic_keys_force_a_block() {
        let result = compile("<div><p :key=\"k\"/></div>");
        let p = inner(&result);
        assert!(p.is_block);
        // key is never a dynamic prop name
        assert!(p.patch_flag.is_none());
    }

    // =========================================================================
    // Props expressions
    // =========================================================================

    #[test]
    fn object_spread_is_merged() {
        let result = compile("<div><p v-bind=\"obj\" id=\"x\"/></div>");
        let p = inner(&result);
        assert_eq!(p.patch_flag, Some(PatchFlags::FULL_PROPS));
        let Some(JsNode::Call(call)) = &p.props else {
            panic!("expected mergeProps");
        };
        assert_eq!(call.callee, Callee::Helper(RuntimeHelper::MergeProps));
        assert_eq!(call.arguments.len(), 2);
        assert!(matches!(&call.arguments[0], JsNode::Simple(e) if e.content == "obj"));
    }

    #[test]
    fn single_spread_is_guarded() {
        let result = compile("<div><p v-bind=\"obj\"/></div>");
        let Some(JsNode::Call(call)) = &inner(&result).props else {
            panic!("expected normalizeProps");
        };
        assert_eq!(call.callee, Callee::Helper(RuntimeHelper::NormalizeProps));
        assert_eq!(callee(&call.arguments[0]), &Callee::Helper(RuntimeHelper::GuardReactiveProps));
    }

    #[test]
    fn event_object_uses_to_handlers() {
        let result = compile("<div><p v-on=\"handlers\"/></div>");
        let p = inner(&result);
        assert_eq!(p.props.as_ref().map(callee), Some(&Callee::Helper(RuntimeHelper::ToHandlers)));
        assert_eq!(p.patch_flag, Some(PatchFlags::FULL_PROPS));
    }

    #[test]
    fn dynamic_keys_normalize_the_object() {
        let result = compile("<div><p :[k]=\"v\"/></div>");
        let p = inner(&result);
        assert_eq!(p.props.as_ref().map(callee), Some(&Callee::Helper(RuntimeHelper::NormalizeProps)));
        assert_eq!(p.patch_flag, Some(PatchFlags::FULL_PROPS));
    }

    #[test]
    fn duplicate_class_is_merged_into_an_array() {
        let result = compile("<div><p class=\"a\" :class=\"b\"/></div>");
        let p = inner(&result);
        let props = props_object(p);
        assert_eq!(props.len(), 1);
        let JsNode::Call(call) = &props[0].value else {
            panic!("expected normalizeClass");
        };
        assert!(matches!(&call.arguments[0], JsNode::Array(a) if a.elements.len() == 2));
        assert_eq!(p.patch_flag, Some(PatchFlags::CLASS));
    }

    #[test]
    fn custom_directives_run_at_runtime() {
        let result = compile("<div><p v-foo:arg.mod=\"x\"/></div>");
        let p = inner(&result);
        assert_eq!(p.patch_flag, Some(PatchFlags::NEED_PATCH));
        let Some(JsNode::Array(list)) = &p.directives else {
            panic!("expected directives array");
        };
        let JsNode::Array(args) = &list.elements[0] else {
            panic!("expected directive arguments");
        };
        assert_eq!(args.elements.len(), 4);
        assert!(matches!(&args.elements[0], JsNode::Simple(e) if e.content == "_directive_foo"));
        assert_eq!(result.ast.directives, vec!["foo".to_string()]);
        assert!(result.ast.helpers.contains(&RuntimeHelper::WithDirectives));
        assert!(result.ast.helpers.contains(&RuntimeHelper::ResolveDirective));
    }

    #[test]
    fn directive_args_fill_missing_positions() {
        let result = compile("<div><p v-foo.mod/></div>");
        let Some(JsNode::Array(list)) = &inner(&result).directives else {
            panic!("expected directives array");
        };
        let JsNode::Array(args) = &list.elements[0] else {
            panic!("expected directive arguments");
        };
        assert!(matches!(&args.elements[1], JsNode::Code(c) if c == "void 0"));
        assert!(matches!(&args.elements[2], JsNode::Code(c) if c == "void 0"));
        assert!(matches!(&args.elements[3], JsNode::Object(_)));
    }

    #[test]
    fn slot_directive_on_plain_element_is_misplaced() {
        let errors = Rc::new(RefCell::new(Vec::new()));
        let sink = errors.clone();
        compile_with(
            "<div v-slot=\"x\"/>",
            TransformOptions {
                on_error: Rc::new(move |e: CompilerError| sink.borrow_mut().push(e.code)),
                ..TransformOptions::default()
            },
        );
        assert_eq!(*errors.borrow(), vec![ErrorCode::VSlotMisplaced]);
    }

    // =========================================================================
    // Children
    // =========================================================================

    #[test]
    fn single_text_child_is_inlined() {
        let result = compile("<div><p>{{ a }}</p><p>hi</p></div>");
        let root = result.ast.children[0].as_element().unwrap_or_else(|| panic!("expected root"));
        let dynamic = vnode(&root.children[0]);
        assert!(matches!(&dynamic.children, Some(VNodeChildren::Single(c)) if matches!(**c, TemplateNode::Interpolation(_))));
        assert_eq!(dynamic.patch_flag, Some(PatchFlags::TEXT));
        let fixed = vnode(&root.children[1]);
        assert!(matches!(&fixed.children, Some(VNodeChildren::Single(_))));
        assert!(fixed.patch_flag.is_none());
    }

    #[test]
    fn helpers_and_names() {
        assert!(is_on("onClick"));
        assert!(is_on("onUpdate:modelValue"));
        assert!(!is_on("once"));
        assert!(!is_on("on"));
        assert!(is_component_tag("Component"));
        assert!(!is_component_tag("components"));
        assert_eq!(self_name("src/my-comp.vue?vue&type=template").as_deref(), Some("MyComp"));
        assert_eq!(stringify_dynamic_prop_names(&["a".into(), "b".into()]), "[\"a\", \"b\"]");
    }
}
