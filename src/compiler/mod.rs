// ============================================================================
// spark-weave - Template Compiler
// Parser, AST transforms and static hoisting for HTML-like templates
// ============================================================================
//
// `base_parse` turns template source into a `RootNode`. `transform` walks it
// with node and directive transforms, attaching a codegen tree to each node
// and collecting the runtime helpers, assets, hoists and caches a render
// function needs. `base_compile` runs both with the built-in preset.
// ============================================================================

pub mod ast;
pub mod compile;
pub mod errors;
pub mod hoist_static;
pub mod options;
pub mod parse;
pub mod transform;
pub mod transforms;
pub mod utils;

pub use ast::{
    ConstantType, DirectiveNode, ElementNode, ElementType, ExpressionNode, JsNode, Namespace, PatchFlags, PropNode,
    RootNode, RuntimeHelper, SimpleExpression, SlotFlags, SourceLocation, TemplateNode, VNodeCall,
};
pub use compile::{base_compile, get_base_transform_preset, CompileResult};
pub use errors::{CompilerError, ErrorCode, ErrorSink};
pub use hoist_static::{get_constant_type, hoist_static, stringifiable_runs};
pub use options::{CompilerOptions, ParserOptions, TextMode, TransformOptions, WhitespaceStrategy};
pub use parse::base_parse;
pub use transform::{
    create_vnode_call, transform, DirectiveTransform, DirectiveTransformResult, ExitFn, ExitFns, NodeCursor,
    NodeTransform, TransformContext,
};
