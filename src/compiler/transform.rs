// ============================================================================
// spark-weave - Transform
// Two-phase AST walk applying node and directive transforms
// ============================================================================
//
// Every node is visited with the registered node transforms in order. A
// transform sees the node through a `NodeCursor` and may mutate it, replace
// it (the following transforms and the child walk see the replacement) or
// remove it (its subtree is skipped). It may return exit callbacks, which
// run after the node's descendants are fully processed, last registered
// first.
// ============================================================================

use std::rc::Rc;

use indexmap::IndexSet;
use rustc_hash::{FxBuildHasher, FxHashMap};
use smallvec::SmallVec;

use super::ast::{
    CacheExpression, ChildRef, ConstantType, DirectiveNode, ElementNode, ElementType, ExpressionNode, IfBranchNode,
    ImportItem, JsNode, PatchFlags, Property, RootNode, RuntimeHelper, SimpleExpression, SourceLocation,
    TemplateNode, VNodeCall, VNodeChildren, VNodeTag,
};
use super::errors::{CompilerError, ErrorCode};
use super::hoist_static::hoist_static;
use super::options::TransformOptions;
use super::utils::{is_slot_outlet, make_block};
use crate::core::types::FxIndexMap;

// =============================================================================
// TRANSFORM TYPES
// =============================================================================

/// Deferred work for a node, run once its descendants are processed.
pub type ExitFn = Box<dyn FnOnce(&mut NodeCursor<'_>, &mut TransformContext)>;
pub type ExitFns = SmallVec<[ExitFn; 2]>;

pub type NodeTransform = Rc<dyn Fn(&mut NodeCursor<'_>, &mut TransformContext) -> ExitFns>;

/// Lowers one directive of an element into props.
pub type DirectiveTransform = Rc<dyn Fn(&DirectiveNode, &ElementNode, &mut TransformContext) -> DirectiveTransformResult>;

/// Called with each sibling list in which children were hoisted.
pub type HoistTransform = Rc<dyn Fn(&mut Vec<TemplateNode>, &mut TransformContext)>;

/// Whether a directive needs its runtime implementation at render time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum NeedRuntime {
    #[default]
    No,
    /// Resolve the user directive by name
    Yes,
    /// Use a built-in runtime directive
    Helper(RuntimeHelper),
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct DirectiveTransformResult {
    pub props: Vec<Property>,
    pub need_runtime: NeedRuntime,
}

impl DirectiveTransformResult {
    pub fn props(props: Vec<Property>) -> Self {
        Self {
            props,
            need_runtime: NeedRuntime::No,
        }
    }
}

// =============================================================================
// CURSOR
// =============================================================================

/// What contains the node under the cursor.
#[derive(Clone, Debug, PartialEq)]
pub enum ParentKind {
    Root,
    Element { tag: String, tag_type: ElementType },
    IfBranch,
    For,
}

enum Slot<'a> {
    Root(&'a mut RootNode),
    Branch(&'a mut IfBranchNode),
    Child {
        siblings: &'a mut Vec<TemplateNode>,
        index: usize,
        removed: bool,
    },
}

/// The node a transform is applied to, with access to its siblings.
pub struct NodeCursor<'a> {
    slot: Slot<'a>,
    parent: &'a ParentKind,
}

impl<'a> NodeCursor<'a> {
    pub(crate) fn root(root: &'a mut RootNode, parent: &'a ParentKind) -> Self {
        Self {
            slot: Slot::Root(root),
            parent,
        }
    }

    pub(crate) fn branch(branch: &'a mut IfBranchNode, parent: &'a ParentKind) -> Self {
        Self {
            slot: Slot::Branch(branch),
            parent,
        }
    }

    pub(crate) fn child(siblings: &'a mut Vec<TemplateNode>, index: usize, parent: &'a ParentKind) -> Self {
        Self {
            slot: Slot::Child {
                siblings,
                index,
                removed: false,
            },
            parent,
        }
    }

    pub fn parent(&self) -> &ParentKind {
        self.parent
    }

    /// The current template node; `None` for the root, an if-branch or a
    /// removed node.
    pub fn node(&mut self) -> Option<&mut TemplateNode> {
        match &mut self.slot {
            Slot::Child {
                siblings,
                index,
                removed: false,
            } => siblings.get_mut(*index),
            _ => None,
        }
    }

    pub fn node_ref(&self) -> Option<&TemplateNode> {
        match &self.slot {
            Slot::Child {
                siblings,
                index,
                removed: false,
            } => siblings.get(*index),
            _ => None,
        }
    }

    pub fn element(&mut self) -> Option<&mut ElementNode> {
        self.node().and_then(TemplateNode::as_element_mut)
    }

    pub fn root_node(&mut self) -> Option<&mut RootNode> {
        match &mut self.slot {
            Slot::Root(root) => Some(root),
            _ => None,
        }
    }

    pub fn branch_node(&mut self) -> Option<&mut IfBranchNode> {
        match &mut self.slot {
            Slot::Branch(branch) => Some(branch),
            _ => None,
        }
    }

    /// Children of the root, a branch, an element or a loop.
    pub fn children_mut(&mut self) -> Option<&mut Vec<TemplateNode>> {
        match &mut self.slot {
            Slot::Root(root) => Some(&mut root.children),
            Slot::Branch(branch) => Some(&mut branch.children),
            Slot::Child {
                siblings,
                index,
                removed: false,
            } => siblings.get_mut(*index).and_then(TemplateNode::children_mut),
            Slot::Child { .. } => None,
        }
    }

    pub fn index(&self) -> Option<usize> {
        match &self.slot {
            Slot::Child { index, .. } => Some(*index),
            _ => None,
        }
    }

    pub fn is_removed(&self) -> bool {
        matches!(self.slot, Slot::Child { removed: true, .. })
    }

    /// Sibling list and the current index.
    pub fn siblings_mut(&mut self) -> Option<(&mut Vec<TemplateNode>, usize)> {
        match &mut self.slot {
            Slot::Child { siblings, index, .. } => Some((&mut **siblings, *index)),
            _ => None,
        }
    }

    /// Replace the current node; later transforms see the replacement.
    pub fn replace(&mut self, node: TemplateNode) {
        if let Slot::Child {
            siblings,
            index,
            removed: false,
        } = &mut self.slot
        {
            if let Some(slot) = siblings.get_mut(*index) {
                *slot = node;
            }
        }
    }

    /// Remove the current node and hand it back.
    pub fn take(&mut self) -> Option<TemplateNode> {
        match &mut self.slot {
            Slot::Child { siblings, index, removed } if !*removed && *index < siblings.len() => {
                *removed = true;
                Some(siblings.remove(*index))
            }
            _ => None,
        }
    }

    /// Remove the current node; its subtree is not visited.
    pub fn remove(&mut self) {
        let _ = self.take();
    }

    /// Remove a sibling at `at`, keeping the cursor on the current node.
    pub fn remove_sibling(&mut self, at: usize) -> Option<TemplateNode> {
        match &mut self.slot {
            Slot::Child { siblings, index, .. } if at < siblings.len() && at != *index => {
                if at < *index {
                    *index -= 1;
                }
                Some(siblings.remove(at))
            }
            _ => None,
        }
    }
}

// =============================================================================
// CONTEXT
// =============================================================================

/// Nesting depths of scope-introducing constructs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TransformScopes {
    pub v_for: u32,
    pub v_slot: u32,
    pub v_pre: u32,
    pub v_once: u32,
}

pub type NameSet = IndexSet<String, FxBuildHasher>;

/// Mutable state shared by all transforms during one `transform` call.
pub struct TransformContext {
    pub options: TransformOptions,
    node_transforms: Rc<[NodeTransform]>,
    /// Helper -> number of live references
    pub helpers: FxIndexMap<RuntimeHelper, usize>,
    pub components: NameSet,
    pub directives: NameSet,
    pub hoists: Vec<Option<JsNode>>,
    pub imports: Vec<ImportItem>,
    pub temps: usize,
    pub cached: usize,
    /// In-scope identifier -> declaration count
    pub identifiers: FxHashMap<String, usize>,
    pub scopes: TransformScopes,
    pub in_v_once: bool,
    pub child_index: usize,
    pub(crate) constant_cache: FxHashMap<usize, ConstantType>,
}

impl TransformContext {
    pub fn new(options: TransformOptions) -> Self {
        let node_transforms: Rc<[NodeTransform]> = options.node_transforms.clone().into();
        Self {
            options,
            node_transforms,
            helpers: FxIndexMap::default(),
            components: NameSet::default(),
            directives: NameSet::default(),
            hoists: Vec::new(),
            imports: Vec::new(),
            temps: 0,
            cached: 0,
            identifiers: FxHashMap::default(),
            scopes: TransformScopes::default(),
            in_v_once: false,
            child_index: 0,
            constant_cache: FxHashMap::default(),
        }
    }

    pub fn is_ssr(&self) -> bool {
        self.options.ssr || self.options.in_ssr
    }

    /// Reference a runtime helper.
    pub fn helper(&mut self, helper: RuntimeHelper) -> RuntimeHelper {
        *self.helpers.entry(helper).or_insert(0) += 1;
        helper
    }

    /// Drop one reference; the helper is forgotten at zero.
    pub fn remove_helper(&mut self, helper: RuntimeHelper) {
        if let Some(count) = self.helpers.get_mut(&helper) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                self.helpers.shift_remove(&helper);
            }
        }
    }

    pub fn helper_count(&self, helper: RuntimeHelper) -> usize {
        self.helpers.get(&helper).copied().unwrap_or(0)
    }

    /// `_name` of a helper, referencing it.
    pub fn helper_string(&mut self, helper: RuntimeHelper) -> String {
        format!("_{}", self.helper(helper).name())
    }

    /// Move `exp` into the hoist table; returns the `_hoisted_N` reference.
    pub fn hoist(&mut self, exp: JsNode) -> JsNode {
        let loc = match &exp {
            JsNode::VNode(v) => v.loc.clone(),
            JsNode::Simple(e) => e.loc.clone(),
            _ => SourceLocation::stub(),
        };
        self.hoists.push(Some(exp));
        let mut reference = SimpleExpression::new(
            format!("_hoisted_{}", self.hoists.len()),
            false,
            loc,
            ConstantType::CanHoist,
        );
        reference.hoisted = Some(self.hoists.len() - 1);
        JsNode::Simple(reference)
    }

    /// Wrap `exp` in the next render cache slot.
    pub fn cache(&mut self, exp: JsNode, is_vnode: bool) -> JsNode {
        let index = self.cached;
        self.cached += 1;
        JsNode::Cache(Box::new(CacheExpression {
            index,
            value: exp,
            is_vnode,
            loc: SourceLocation::stub(),
        }))
    }

    pub fn add_identifier(&mut self, name: &str) {
        *self.identifiers.entry(name.to_string()).or_insert(0) += 1;
    }

    pub fn remove_identifier(&mut self, name: &str) {
        if let Some(count) = self.identifiers.get_mut(name) {
            *count -= 1;
            if *count == 0 {
                self.identifiers.remove(name);
            }
        }
    }

    pub fn is_identifier_in_scope(&self, name: &str) -> bool {
        self.identifiers.contains_key(name)
    }

    /// Declare the identifiers an expression introduces (aliases, params).
    pub fn add_identifiers(&mut self, exp: &ExpressionNode) {
        if !self.options.prefix_identifiers {
            return;
        }
        match exp {
            ExpressionNode::Simple(e) if e.identifiers.is_empty() => self.add_identifier(&e.content),
            other => {
                for id in other.identifiers().to_vec() {
                    self.add_identifier(&id);
                }
            }
        }
    }

    pub fn remove_identifiers(&mut self, exp: &ExpressionNode) {
        if !self.options.prefix_identifiers {
            return;
        }
        match exp {
            ExpressionNode::Simple(e) if e.identifiers.is_empty() => self.remove_identifier(&e.content),
            other => {
                for id in other.identifiers().to_vec() {
                    self.remove_identifier(&id);
                }
            }
        }
    }

    /// Deliver an error (or warning) to the configured sink.
    pub fn on_error(&self, error: CompilerError) {
        if error.code.is_warning() {
            (self.options.on_warn)(error);
        } else {
            (self.options.on_error)(error);
        }
    }

    pub fn report(&self, code: ErrorCode, loc: &SourceLocation) {
        self.on_error(CompilerError::new(code, Some(loc.clone())));
    }
}

/// Build a vnode call, referencing the helpers it needs.
#[allow(clippy::too_many_arguments)]
pub fn create_vnode_call(
    ctx: &mut TransformContext,
    tag: VNodeTag,
    props: Option<JsNode>,
    children: Option<VNodeChildren>,
    patch_flag: Option<PatchFlags>,
    dynamic_props: Option<JsNode>,
    directives: Option<JsNode>,
    is_block: bool,
    disable_tracking: bool,
    is_component: bool,
    loc: SourceLocation,
) -> VNodeCall {
    let ssr = ctx.is_ssr();
    if is_block {
        ctx.helper(RuntimeHelper::OpenBlock);
    }
    ctx.helper(RuntimeHelper::vnode(is_block, ssr, is_component));
    if directives.is_some() {
        ctx.helper(RuntimeHelper::WithDirectives);
    }
    VNodeCall {
        tag,
        props,
        children,
        patch_flag,
        dynamic_props,
        directives,
        is_block,
        disable_tracking,
        is_component,
        loc,
    }
}

// =============================================================================
// TRAVERSAL
// =============================================================================

enum ChildOutcome {
    Kept { index: usize },
    Removed { index: usize },
}

fn traverse_child(
    siblings: &mut Vec<TemplateNode>,
    index: usize,
    parent: &ParentKind,
    ctx: &mut TransformContext,
) -> ChildOutcome {
    let transforms = ctx.node_transforms.clone();
    let mut exits = ExitFns::new();

    let mut cursor = NodeCursor::child(siblings, index, parent);
    for transform in transforms.iter() {
        exits.extend(transform(&mut cursor, ctx));
        if cursor.is_removed() {
            return ChildOutcome::Removed {
                index: cursor.index().unwrap_or(index),
            };
        }
    }
    let index = cursor.index().unwrap_or(index);

    let ssr = ctx.is_ssr();
    match &mut siblings[index] {
        TemplateNode::Comment(_) if !ssr => {
            ctx.helper(RuntimeHelper::CreateComment);
        }
        TemplateNode::Interpolation(_) if !ssr => {
            ctx.helper(RuntimeHelper::ToDisplayString);
        }
        TemplateNode::If(if_node) => {
            for branch in if_node.branches.iter_mut() {
                traverse_branch(branch, ctx);
            }
        }
        TemplateNode::Element(element) => {
            let parent = ParentKind::Element {
                tag: element.tag.clone(),
                tag_type: element.tag_type,
            };
            traverse_children(&mut element.children, &parent, ctx);
        }
        TemplateNode::For(for_node) => traverse_children(&mut for_node.children, &ParentKind::For, ctx),
        _ => {}
    }

    let mut cursor = NodeCursor::child(siblings, index, parent);
    while let Some(exit) = exits.pop() {
        exit(&mut cursor, ctx);
    }
    ChildOutcome::Kept {
        index: cursor.index().unwrap_or(index),
    }
}

pub(crate) fn traverse_children(children: &mut Vec<TemplateNode>, parent: &ParentKind, ctx: &mut TransformContext) {
    let mut i = 0;
    while i < children.len() {
        ctx.child_index = i;
        i = match traverse_child(children, i, parent, ctx) {
            ChildOutcome::Kept { index } => index + 1,
            ChildOutcome::Removed { index } => index,
        };
    }
}

/// Walk an if-branch: transforms on the branch, then its children.
pub(crate) fn traverse_branch(branch: &mut IfBranchNode, ctx: &mut TransformContext) {
    let transforms = ctx.node_transforms.clone();
    let parent = ParentKind::IfBranch;
    let mut exits = ExitFns::new();
    {
        let mut cursor = NodeCursor::branch(branch, &parent);
        for transform in transforms.iter() {
            exits.extend(transform(&mut cursor, ctx));
        }
    }
    traverse_children(&mut branch.children, &parent, ctx);
    let mut cursor = NodeCursor::branch(branch, &parent);
    while let Some(exit) = exits.pop() {
        exit(&mut cursor, ctx);
    }
}

fn traverse_root(root: &mut RootNode, ctx: &mut TransformContext) {
    let transforms = ctx.node_transforms.clone();
    let parent = ParentKind::Root;
    let mut exits = ExitFns::new();
    {
        let mut cursor = NodeCursor::root(root, &parent);
        for transform in transforms.iter() {
            exits.extend(transform(&mut cursor, ctx));
        }
    }
    traverse_children(&mut root.children, &parent, ctx);
    let mut cursor = NodeCursor::root(root, &parent);
    while let Some(exit) = exits.pop() {
        exit(&mut cursor, ctx);
    }
}

// =============================================================================
// ENTRY POINT
// =============================================================================

/// Run the transform pipeline over `root`, then hoisting, then attach the
/// root codegen node and everything the generated code needs.
pub fn transform(root: &mut RootNode, options: TransformOptions) {
    let mut ctx = TransformContext::new(options);
    tracing::debug!(target: "spark_weave::compiler", children = root.children.len(), "transform start");

    traverse_root(root, &mut ctx);
    if ctx.options.hoist_static {
        hoist_static(root, &mut ctx);
    }
    if !ctx.options.ssr {
        create_root_codegen(root, &mut ctx);
    }

    root.helpers = ctx
        .helpers
        .iter()
        .filter(|(_, count)| **count > 0)
        .map(|(helper, _)| *helper)
        .collect();
    root.components = ctx.components.iter().cloned().collect();
    root.directives = ctx.directives.iter().cloned().collect();
    root.imports = std::mem::take(&mut ctx.imports);
    root.hoists = std::mem::take(&mut ctx.hoists);
    root.temps = ctx.temps;
    root.cached = ctx.cached;
    root.transformed = true;

    tracing::debug!(
        target: "spark_weave::compiler",
        helpers = root.helpers.len(),
        hoists = root.hoists.len(),
        cached = root.cached,
        "transform done"
    );
}

fn create_root_codegen(root: &mut RootNode, ctx: &mut TransformContext) {
    match root.children.len() {
        0 => {}
        1 => {
            let child = &mut root.children[0];
            if let TemplateNode::Element(element) = child {
                if !is_slot_outlet(element) {
                    if let Some(JsNode::VNode(vnode)) = element.codegen.as_mut() {
                        make_block(vnode, ctx);
                    }
                }
            }
            root.codegen = Some(JsNode::ChildRef(ChildRef::child(0)));
        }
        _ => {
            let mut flag = PatchFlags::STABLE_FRAGMENT;
            let non_comments = root
                .children
                .iter()
                .filter(|c| !matches!(c, TemplateNode::Comment(_)))
                .count();
            if non_comments == 1 {
                flag |= PatchFlags::DEV_ROOT_FRAGMENT;
            }
            let fragment = ctx.helper(RuntimeHelper::Fragment);
            let call = create_vnode_call(
                ctx,
                VNodeTag::Helper(fragment),
                None,
                Some(VNodeChildren::Owned),
                Some(flag),
                None,
                None,
                true,
                false,
                false,
                root.loc.clone(),
            );
            root.codegen = Some(JsNode::VNode(Box::new(call)));
        }
    }
}
