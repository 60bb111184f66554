// ============================================================================
// spark-weave - Compile
// Parse and transform in one call, with the built-in transform preset
// ============================================================================

use std::cell::RefCell;
use std::rc::Rc;

use rustc_hash::FxHashMap;

use super::ast::RootNode;
use super::errors::{CompilerError, ErrorCode, ErrorSink};
use super::options::CompilerOptions;
use super::parse::base_parse;
use super::transform::{transform, DirectiveTransform, NodeTransform};
use super::transforms::{
    track_slot_scopes, track_v_for_slot_scopes, transform_bind, transform_element, transform_expression,
    transform_for, transform_if, transform_model, transform_on, transform_once, transform_slot_outlet,
    transform_text,
};

/// The transformed AST with everything reported on the way.
#[derive(Debug)]
pub struct CompileResult {
    pub ast: RootNode,
    pub errors: Vec<CompilerError>,
    pub warnings: Vec<CompilerError>,
}

/// Built-in node transforms in application order, and directive transforms
/// keyed by directive name.
pub fn get_base_transform_preset(prefix_identifiers: bool) -> (Vec<NodeTransform>, FxHashMap<String, DirectiveTransform>) {
    let mut node_transforms = vec![transform_once(), transform_if(), transform_for()];
    if prefix_identifiers {
        node_transforms.push(track_v_for_slot_scopes());
        node_transforms.push(transform_expression());
    }
    node_transforms.extend([transform_slot_outlet(), transform_element(), track_slot_scopes(), transform_text()]);

    let mut directive_transforms = FxHashMap::default();
    directive_transforms.insert("on".to_string(), transform_on());
    directive_transforms.insert("bind".to_string(), transform_bind());
    directive_transforms.insert("model".to_string(), transform_model());
    (node_transforms, directive_transforms)
}

/// A sink that records into `into` and then forwards to `next`.
fn collecting(into: &Rc<RefCell<Vec<CompilerError>>>, next: ErrorSink) -> ErrorSink {
    let into = into.clone();
    Rc::new(move |e: CompilerError| {
        into.borrow_mut().push(e.clone());
        next(e);
    })
}

/// Parse `template` and run the built-in transforms, followed by any user
/// node transforms. User directive transforms replace built-ins of the same
/// name.
///
/// # Example
///
/// ```
/// use spark_weave::compiler::{base_compile, CompilerOptions, TemplateNode};
///
/// let result = base_compile("<div>{{ a }} and {{ b }}</div>", CompilerOptions::default());
/// assert!(result.errors.is_empty());
/// assert!(matches!(&result.ast.children[0], TemplateNode::Element(e) if e.children.len() == 1));
/// ```
pub fn base_compile(template: &str, options: CompilerOptions) -> CompileResult {
    let errors = Rc::new(RefCell::new(Vec::new()));
    let warnings = Rc::new(RefCell::new(Vec::new()));
    let CompilerOptions {
        mut parser,
        transform: mut transform_options,
    } = options;

    parser.on_error = collecting(&errors, parser.on_error);
    parser.on_warn = collecting(&warnings, parser.on_warn);
    transform_options.on_error = collecting(&errors, transform_options.on_error);
    transform_options.on_warn = collecting(&warnings, transform_options.on_warn);

    if transform_options.cache_handlers && !transform_options.prefix_identifiers {
        (transform_options.on_error)(CompilerError::new(ErrorCode::CacheHandlerNotSupported, None));
    }

    let mut ast = base_parse(template, &parser);

    let (mut node_transforms, mut directive_transforms) =
        get_base_transform_preset(transform_options.prefix_identifiers);
    node_transforms.append(&mut transform_options.node_transforms);
    directive_transforms.extend(transform_options.directive_transforms.drain());
    transform_options.node_transforms = node_transforms;
    transform_options.directive_transforms = directive_transforms;

    transform(&mut ast, transform_options);

    let errors = errors.take();
    let warnings = warnings.take();
    tracing::debug!(
        target: "spark_weave::compiler",
        errors = errors.len(),
        warnings = warnings.len(),
        "compiled template"
    );
    CompileResult { ast, errors, warnings }
}
