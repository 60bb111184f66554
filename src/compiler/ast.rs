// ============================================================================
// spark-weave - Template AST
// Template nodes produced by the parser and codegen nodes built by transforms
// ============================================================================
//
// The tree owns every template node exactly once. Codegen nodes that have to
// refer to a template child whose own codegen is still rewritten later (for
// instance by static hoisting) refer to it by position (`ChildRef`,
// `VNodeChildren::Owned`) instead of holding a copy. Text-like content that
// no later pass touches is embedded by value.
// ============================================================================

use bitflags::bitflags;

// =============================================================================
// LOCATIONS
// =============================================================================

/// A position in the template source.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Position {
    /// Byte offset from the start of the template
    pub offset: usize,
    /// 1-based line
    pub line: usize,
    /// 1-based column
    pub column: usize,
}

impl Default for Position {
    fn default() -> Self {
        Self {
            offset: 0,
            line: 1,
            column: 1,
        }
    }
}

/// Source span `[start, end)` together with the exact source text it covers.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SourceLocation {
    pub start: Position,
    pub end: Position,
    pub source: String,
}

impl SourceLocation {
    pub fn new(start: Position, end: Position, source: impl Into<String>) -> Self {
        Self {
            start,
            end,
            source: source.into(),
        }
    }

    /// Location of generated nodes that have no source.
    pub fn stub() -> Self {
        Self::default()
    }
}

// =============================================================================
// CLASSIFICATION
// =============================================================================

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Namespace {
    #[default]
    Html,
    Svg,
    MathMl,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ElementType {
    #[default]
    Element,
    Component,
    Slot,
    Template,
}

/// How much of a node's compiled output may be reused between renders.
/// Ordered: a node is never more constant than its least constant part.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ConstantType {
    #[default]
    NotConstant,
    CanSkipPatch,
    CanHoist,
    CanStringify,
}

bitflags! {
    /// Optimization hints attached to a vnode call.
    ///
    /// `HOISTED` and `BAIL` are sentinels, never combined with other flags.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct PatchFlags: i32 {
        const TEXT = 1;
        const CLASS = 1 << 1;
        const STYLE = 1 << 2;
        const PROPS = 1 << 3;
        const FULL_PROPS = 1 << 4;
        const HYDRATE_EVENTS = 1 << 5;
        const STABLE_FRAGMENT = 1 << 6;
        const KEYED_FRAGMENT = 1 << 7;
        const UNKEYED_FRAGMENT = 1 << 8;
        const NEED_PATCH = 1 << 9;
        const DYNAMIC_SLOTS = 1 << 10;
        const DEV_ROOT_FRAGMENT = 1 << 11;
        const HOISTED = -1;
        const BAIL = -2;
    }
}

impl PatchFlags {
    /// Flag names as emitted in the generated comment (`TEXT, PROPS`).
    pub fn describe(self) -> String {
        if self == PatchFlags::HOISTED {
            return "HOISTED".to_string();
        }
        if self == PatchFlags::BAIL {
            return "BAIL".to_string();
        }
        self.iter_names()
            .map(|(name, _)| name)
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// The flag literal with its annotation, e.g. `9 /* TEXT, PROPS */`.
    pub fn to_code(self) -> String {
        format!("{} /* {} */", self.bits(), self.describe())
    }
}

/// How a component's slots may change between renders.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotFlags {
    Stable = 1,
    Dynamic = 2,
    Forwarded = 3,
}

// =============================================================================
// RUNTIME HELPERS
// =============================================================================

/// Runtime functions generated code imports.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RuntimeHelper {
    Fragment,
    Teleport,
    Suspense,
    KeepAlive,
    BaseTransition,
    OpenBlock,
    CreateBlock,
    CreateElementBlock,
    CreateVNode,
    CreateElementVNode,
    CreateComment,
    CreateText,
    CreateStatic,
    ResolveComponent,
    ResolveDynamicComponent,
    ResolveDirective,
    WithDirectives,
    RenderList,
    RenderSlot,
    CreateSlots,
    ToDisplayString,
    MergeProps,
    NormalizeClass,
    NormalizeStyle,
    NormalizeProps,
    GuardReactiveProps,
    ToHandlers,
    Camelize,
    Capitalize,
    ToHandlerKey,
    SetBlockTracking,
    PushScopeId,
    PopScopeId,
    WithCtx,
    Unref,
    IsRef,
}

impl RuntimeHelper {
    pub fn name(self) -> &'static str {
        match self {
            Self::Fragment => "Fragment",
            Self::Teleport => "Teleport",
            Self::Suspense => "Suspense",
            Self::KeepAlive => "KeepAlive",
            Self::BaseTransition => "BaseTransition",
            Self::OpenBlock => "openBlock",
            Self::CreateBlock => "createBlock",
            Self::CreateElementBlock => "createElementBlock",
            Self::CreateVNode => "createVNode",
            Self::CreateElementVNode => "createElementVNode",
            Self::CreateComment => "createCommentVNode",
            Self::CreateText => "createTextVNode",
            Self::CreateStatic => "createStaticVNode",
            Self::ResolveComponent => "resolveComponent",
            Self::ResolveDynamicComponent => "resolveDynamicComponent",
            Self::ResolveDirective => "resolveDirective",
            Self::WithDirectives => "withDirectives",
            Self::RenderList => "renderList",
            Self::RenderSlot => "renderSlot",
            Self::CreateSlots => "createSlots",
            Self::ToDisplayString => "toDisplayString",
            Self::MergeProps => "mergeProps",
            Self::NormalizeClass => "normalizeClass",
            Self::NormalizeStyle => "normalizeStyle",
            Self::NormalizeProps => "normalizeProps",
            Self::GuardReactiveProps => "guardReactiveProps",
            Self::ToHandlers => "toHandlers",
            Self::Camelize => "camelize",
            Self::Capitalize => "capitalize",
            Self::ToHandlerKey => "toHandlerKey",
            Self::SetBlockTracking => "setBlockTracking",
            Self::PushScopeId => "pushScopeId",
            Self::PopScopeId => "popScopeId",
            Self::WithCtx => "withCtx",
            Self::Unref => "unref",
            Self::IsRef => "isRef",
        }
    }

    /// The vnode (or block) creation helper for an element or component.
    pub fn vnode(is_block: bool, ssr: bool, is_component: bool) -> Self {
        match (is_block, ssr || is_component) {
            (true, true) => Self::CreateBlock,
            (true, false) => Self::CreateElementBlock,
            (false, true) => Self::CreateVNode,
            (false, false) => Self::CreateElementVNode,
        }
    }
}

// =============================================================================
// EXPRESSIONS
// =============================================================================

#[derive(Clone, Debug, PartialEq)]
pub struct SimpleExpression {
    pub content: String,
    pub is_static: bool,
    pub const_type: ConstantType,
    pub loc: SourceLocation,
    /// Identifiers this expression declares (v-for aliases, slot params)
    pub identifiers: Vec<String>,
    pub is_handler_key: bool,
    /// Index into `RootNode::hoists` when this expression names a hoist
    pub hoisted: Option<usize>,
}

impl SimpleExpression {
    /// Static expressions are always `CanStringify`.
    pub fn new(content: impl Into<String>, is_static: bool, loc: SourceLocation, const_type: ConstantType) -> Self {
        Self {
            content: content.into(),
            is_static,
            const_type: if is_static {
                ConstantType::CanStringify
            } else {
                const_type
            },
            loc,
            identifiers: Vec::new(),
            is_handler_key: false,
            hoisted: None,
        }
    }

    /// A static string literal such as a prop key.
    pub fn literal(content: impl Into<String>) -> Self {
        Self::new(content, true, SourceLocation::stub(), ConstantType::CanStringify)
    }

    /// A generated, non-constant expression.
    pub fn dynamic(content: impl Into<String>) -> Self {
        Self::new(content, false, SourceLocation::stub(), ConstantType::NotConstant)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum CompoundPart {
    Simple(SimpleExpression),
    Compound(CompoundExpression),
    Interpolation(InterpolationNode),
    Text(TextNode),
    Str(String),
    Helper(RuntimeHelper),
}

/// Expression assembled from parts, e.g. merged adjacent text and
/// interpolations, or a rewritten expression with prefixed identifiers.
#[derive(Clone, Debug, PartialEq)]
pub struct CompoundExpression {
    pub children: Vec<CompoundPart>,
    pub loc: SourceLocation,
    pub identifiers: Vec<String>,
    pub is_handler_key: bool,
}

impl CompoundExpression {
    pub fn new(children: Vec<CompoundPart>, loc: SourceLocation) -> Self {
        Self {
            children,
            loc,
            identifiers: Vec::new(),
            is_handler_key: false,
        }
    }

    /// Source-like rendering of the parts (used for expression checks).
    pub fn to_source(&self) -> String {
        let mut out = String::new();
        for part in &self.children {
            match part {
                CompoundPart::Simple(e) => out.push_str(&e.content),
                CompoundPart::Compound(c) => out.push_str(&c.to_source()),
                CompoundPart::Interpolation(i) => out.push_str(&i.content.to_source()),
                CompoundPart::Text(t) => out.push_str(&t.content),
                CompoundPart::Str(s) => out.push_str(s),
                CompoundPart::Helper(h) => {
                    out.push('_');
                    out.push_str(h.name());
                }
            }
        }
        out
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ExpressionNode {
    Simple(SimpleExpression),
    Compound(CompoundExpression),
}

impl ExpressionNode {
    pub fn loc(&self) -> &SourceLocation {
        match self {
            Self::Simple(e) => &e.loc,
            Self::Compound(e) => &e.loc,
        }
    }

    pub fn as_simple(&self) -> Option<&SimpleExpression> {
        match self {
            Self::Simple(e) => Some(e),
            Self::Compound(_) => None,
        }
    }

    /// True for a static simple expression.
    pub fn is_static(&self) -> bool {
        matches!(self, Self::Simple(e) if e.is_static)
    }

    pub fn to_source(&self) -> String {
        match self {
            Self::Simple(e) => e.content.clone(),
            Self::Compound(e) => e.to_source(),
        }
    }

    pub fn identifiers(&self) -> &[String] {
        match self {
            Self::Simple(e) => &e.identifiers,
            Self::Compound(e) => &e.identifiers,
        }
    }
}

impl From<SimpleExpression> for ExpressionNode {
    fn from(e: SimpleExpression) -> Self {
        Self::Simple(e)
    }
}

// =============================================================================
// TEMPLATE NODES
// =============================================================================

#[derive(Clone, Debug, PartialEq)]
pub struct TextNode {
    pub content: String,
    pub loc: SourceLocation,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CommentNode {
    pub content: String,
    pub loc: SourceLocation,
}

/// `{{ expression }}`
#[derive(Clone, Debug, PartialEq)]
pub struct InterpolationNode {
    pub content: ExpressionNode,
    pub loc: SourceLocation,
}

#[derive(Clone, Debug, PartialEq)]
pub struct AttributeNode {
    pub name: String,
    pub value: Option<TextNode>,
    pub loc: SourceLocation,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DirectiveNode {
    /// Normalized name without prefix (`if`, `for`, `bind`, `on`, `slot`)
    pub name: String,
    pub exp: Option<ExpressionNode>,
    pub arg: Option<ExpressionNode>,
    pub modifiers: Vec<String>,
    pub loc: SourceLocation,
    /// Parsed `v-for` expression, filled in by the v-for transform
    pub parse_result: Option<ForParseResult>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum PropNode {
    Attribute(AttributeNode),
    Directive(DirectiveNode),
}

impl PropNode {
    pub fn loc(&self) -> &SourceLocation {
        match self {
            Self::Attribute(a) => &a.loc,
            Self::Directive(d) => &d.loc,
        }
    }

    pub fn as_directive(&self) -> Option<&DirectiveNode> {
        match self {
            Self::Directive(d) => Some(d),
            Self::Attribute(_) => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ElementNode {
    pub ns: Namespace,
    pub tag: String,
    pub tag_type: ElementType,
    pub props: Vec<PropNode>,
    pub is_self_closing: bool,
    pub children: Vec<TemplateNode>,
    pub loc: SourceLocation,
    pub codegen: Option<JsNode>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct IfBranchNode {
    /// `None` for `v-else`
    pub condition: Option<ExpressionNode>,
    pub children: Vec<TemplateNode>,
    pub user_key: Option<PropNode>,
    pub is_template_if: bool,
    pub loc: SourceLocation,
}

#[derive(Clone, Debug, PartialEq)]
pub struct IfNode {
    pub branches: Vec<IfBranchNode>,
    pub loc: SourceLocation,
    pub codegen: Option<JsNode>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ForParseResult {
    pub source: ExpressionNode,
    pub value: Option<ExpressionNode>,
    pub key: Option<ExpressionNode>,
    pub index: Option<ExpressionNode>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ForNode {
    pub source: ExpressionNode,
    pub value_alias: Option<ExpressionNode>,
    pub key_alias: Option<ExpressionNode>,
    pub object_index_alias: Option<ExpressionNode>,
    pub parse_result: ForParseResult,
    pub children: Vec<TemplateNode>,
    pub loc: SourceLocation,
    pub codegen: Option<JsNode>,
}

/// A text-like child turned into an explicit `createTextVNode` call.
#[derive(Clone, Debug, PartialEq)]
pub struct TextCallNode {
    pub content: TemplateNode,
    pub loc: SourceLocation,
    pub codegen: Option<JsNode>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum TemplateNode {
    Element(Box<ElementNode>),
    Text(TextNode),
    Comment(CommentNode),
    Interpolation(InterpolationNode),
    Compound(CompoundExpression),
    If(Box<IfNode>),
    For(Box<ForNode>),
    TextCall(Box<TextCallNode>),
}

impl TemplateNode {
    pub fn loc(&self) -> &SourceLocation {
        match self {
            Self::Element(n) => &n.loc,
            Self::Text(n) => &n.loc,
            Self::Comment(n) => &n.loc,
            Self::Interpolation(n) => &n.loc,
            Self::Compound(n) => &n.loc,
            Self::If(n) => &n.loc,
            Self::For(n) => &n.loc,
            Self::TextCall(n) => &n.loc,
        }
    }

    pub fn as_element(&self) -> Option<&ElementNode> {
        match self {
            Self::Element(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_element_mut(&mut self) -> Option<&mut ElementNode> {
        match self {
            Self::Element(e) => Some(e),
            _ => None,
        }
    }

    /// Text, interpolation or compound text.
    pub fn is_text_like(&self) -> bool {
        matches!(self, Self::Text(_) | Self::Interpolation(_) | Self::Compound(_))
    }

    /// Direct children of elements and loops.
    pub fn children(&self) -> Option<&Vec<TemplateNode>> {
        match self {
            Self::Element(e) => Some(&e.children),
            Self::For(f) => Some(&f.children),
            _ => None,
        }
    }

    pub fn children_mut(&mut self) -> Option<&mut Vec<TemplateNode>> {
        match self {
            Self::Element(e) => Some(&mut e.children),
            Self::For(f) => Some(&mut f.children),
            _ => None,
        }
    }

    /// The attached codegen node, if this kind carries one.
    pub fn codegen(&self) -> Option<&JsNode> {
        match self {
            Self::Element(e) => e.codegen.as_ref(),
            Self::If(n) => n.codegen.as_ref(),
            Self::For(n) => n.codegen.as_ref(),
            Self::TextCall(n) => n.codegen.as_ref(),
            _ => None,
        }
    }

    pub fn codegen_mut(&mut self) -> Option<&mut Option<JsNode>> {
        match self {
            Self::Element(e) => Some(&mut e.codegen),
            Self::If(n) => Some(&mut n.codegen),
            Self::For(n) => Some(&mut n.codegen),
            Self::TextCall(n) => Some(&mut n.codegen),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ImportItem {
    pub exp: SimpleExpression,
    pub path: String,
}

/// The parsed template. Transforms fill in everything below `children`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RootNode {
    pub source: String,
    pub children: Vec<TemplateNode>,
    pub loc: SourceLocation,
    pub helpers: Vec<RuntimeHelper>,
    pub components: Vec<String>,
    pub directives: Vec<String>,
    /// `None` entries are hoists that were taken back (stringified runs)
    pub hoists: Vec<Option<JsNode>>,
    pub imports: Vec<ImportItem>,
    pub cached: usize,
    pub temps: usize,
    pub codegen: Option<JsNode>,
    pub transformed: bool,
}

impl RootNode {
    pub fn new(source: impl Into<String>, children: Vec<TemplateNode>, loc: SourceLocation) -> Self {
        Self {
            source: source.into(),
            children,
            loc,
            ..Default::default()
        }
    }
}

// =============================================================================
// CODEGEN NODES
// =============================================================================

/// Position of a template node whose codegen is referenced, relative to the
/// node owning the codegen tree: a child of its own children, or a child of
/// one of its if-branches.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChildRef {
    pub branch: Option<usize>,
    pub index: usize,
}

impl ChildRef {
    pub fn child(index: usize) -> Self {
        Self { branch: None, index }
    }

    pub fn branch_child(branch: usize, index: usize) -> Self {
        Self {
            branch: Some(branch),
            index,
        }
    }
}

/// Template children rendered by a slot function, relative to the element
/// owning the codegen tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChildList {
    /// Every child of the owning element
    All,
    /// The owning element's children at these positions
    Indices(Vec<usize>),
    /// Every child of the owning element's child at this position
    Nested(usize),
}

#[derive(Clone, Debug, PartialEq)]
pub enum VNodeTag {
    /// Tag code: a quoted element name (`"div"`) or a resolved asset id
    /// (`_component_foo`)
    Name(String),
    Helper(RuntimeHelper),
    Dynamic(Box<JsNode>),
}

#[derive(Clone, Debug, PartialEq)]
pub enum VNodeChildren {
    /// The owning node's children
    Owned,
    /// The children of the owning if node's branch
    BranchChildren(usize),
    /// A single text-like child, embedded
    Single(Box<TemplateNode>),
    /// A component's slots object or `createSlots` call
    Slots(Box<JsNode>),
    /// Any other expression (render list call, hoisted children array)
    Expr(Box<JsNode>),
}

#[derive(Clone, Debug, PartialEq)]
pub struct VNodeCall {
    pub tag: VNodeTag,
    pub props: Option<JsNode>,
    pub children: Option<VNodeChildren>,
    pub patch_flag: Option<PatchFlags>,
    /// Names of dynamic props (`["foo", "bar"]`) or a hoisted reference
    pub dynamic_props: Option<JsNode>,
    pub directives: Option<JsNode>,
    pub is_block: bool,
    pub disable_tracking: bool,
    pub is_component: bool,
    pub loc: SourceLocation,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Callee {
    Helper(RuntimeHelper),
    Name(String),
}

#[derive(Clone, Debug, PartialEq)]
pub struct CallExpression {
    pub callee: Callee,
    pub arguments: Vec<JsNode>,
    pub loc: SourceLocation,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Property {
    pub key: ExpressionNode,
    pub value: JsNode,
    pub loc: SourceLocation,
}

impl Property {
    pub fn new(key: impl Into<ExpressionNode>, value: JsNode) -> Self {
        Self {
            key: key.into(),
            value,
            loc: SourceLocation::stub(),
        }
    }

    /// The key text when the key is a static simple expression.
    pub fn static_key(&self) -> Option<&str> {
        match &self.key {
            ExpressionNode::Simple(e) if e.is_static => Some(&e.content),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ObjectExpression {
    pub properties: Vec<Property>,
    pub loc: SourceLocation,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ArrayExpression {
    pub elements: Vec<JsNode>,
    pub loc: SourceLocation,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FunctionExpression {
    pub params: Vec<JsNode>,
    pub returns: Option<JsNode>,
    pub newline: bool,
    pub is_slot: bool,
    pub is_non_scoped_slot: bool,
    pub loc: SourceLocation,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ConditionalExpression {
    pub test: JsNode,
    pub consequent: JsNode,
    pub alternate: JsNode,
    pub newline: bool,
    pub loc: SourceLocation,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CacheExpression {
    pub index: usize,
    pub value: JsNode,
    pub is_vnode: bool,
    pub loc: SourceLocation,
}

/// Lowered expression tree handed to code generation.
#[derive(Clone, Debug, PartialEq)]
pub enum JsNode {
    VNode(Box<VNodeCall>),
    Call(Box<CallExpression>),
    Object(ObjectExpression),
    Array(ArrayExpression),
    Function(Box<FunctionExpression>),
    Conditional(Box<ConditionalExpression>),
    Cache(Box<CacheExpression>),
    Simple(SimpleExpression),
    Compound(CompoundExpression),
    /// Raw code emitted verbatim
    Code(String),
    Helper(RuntimeHelper),
    /// Text-like template content embedded by value
    Template(Box<TemplateNode>),
    /// The codegen of a template node, by position
    ChildRef(ChildRef),
    /// A list of template children, by position
    Children(ChildList),
}

impl JsNode {
    pub fn call(callee: RuntimeHelper, arguments: Vec<JsNode>) -> Self {
        JsNode::Call(Box::new(CallExpression {
            callee: Callee::Helper(callee),
            arguments,
            loc: SourceLocation::stub(),
        }))
    }

    pub fn object(properties: Vec<Property>) -> Self {
        JsNode::Object(ObjectExpression {
            properties,
            loc: SourceLocation::stub(),
        })
    }

    pub fn array(elements: Vec<JsNode>) -> Self {
        JsNode::Array(ArrayExpression {
            elements,
            loc: SourceLocation::stub(),
        })
    }

    pub fn function(params: Vec<JsNode>, returns: Option<JsNode>, newline: bool, is_slot: bool) -> Self {
        JsNode::Function(Box::new(FunctionExpression {
            params,
            returns,
            newline,
            is_slot,
            is_non_scoped_slot: false,
            loc: SourceLocation::stub(),
        }))
    }

    pub fn conditional(test: JsNode, consequent: JsNode, alternate: JsNode) -> Self {
        JsNode::Conditional(Box::new(ConditionalExpression {
            test,
            consequent,
            alternate,
            newline: true,
            loc: SourceLocation::stub(),
        }))
    }

    pub fn as_vnode(&self) -> Option<&VNodeCall> {
        match self {
            JsNode::VNode(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_vnode_mut(&mut self) -> Option<&mut VNodeCall> {
        match self {
            JsNode::VNode(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_simple(&self) -> Option<&SimpleExpression> {
        match self {
            JsNode::Simple(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ExpressionNode> for JsNode {
    fn from(e: ExpressionNode) -> Self {
        match e {
            ExpressionNode::Simple(s) => JsNode::Simple(s),
            ExpressionNode::Compound(c) => JsNode::Compound(c),
        }
    }
}

impl From<SimpleExpression> for JsNode {
    fn from(e: SimpleExpression) -> Self {
        JsNode::Simple(e)
    }
}
