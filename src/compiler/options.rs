// ============================================================================
// spark-weave - Compiler Options
// Parser, transform and compile-time configuration
// ============================================================================

use std::rc::Rc;

use rustc_hash::FxHashMap;

use super::ast::{ElementNode, Namespace, RuntimeHelper};
use super::errors::{default_on_error, default_on_warn, ErrorSink};
use super::transform::{DirectiveTransform, HoistTransform, NodeTransform};

/// How the parser treats the content of an element.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TextMode {
    /// Tags, comments, interpolation and entities
    #[default]
    Data,
    /// Interpolation and entities only (`<textarea>`)
    RcData,
    /// Raw characters up to the closing tag (`<style>`)
    RawText,
    /// Inside `<![CDATA[ ]]>`
    CData,
    AttributeValue,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum WhitespaceStrategy {
    #[default]
    Condense,
    Preserve,
}

pub type TagPredicate = Rc<dyn Fn(&str) -> bool>;
pub type BuiltInComponentFn = Rc<dyn Fn(&str) -> Option<RuntimeHelper>>;
/// `(tag, parent)` to the namespace of the element being opened.
pub type NamespaceFn = Rc<dyn Fn(&str, Option<&ElementNode>) -> Namespace>;
/// `(element, parent)` to the mode its children are parsed in.
pub type TextModeFn = Rc<dyn Fn(&ElementNode, Option<&ElementNode>) -> TextMode>;
/// `(raw text, in attribute value)` to decoded text.
pub type DecodeEntitiesFn = Rc<dyn Fn(&str, bool) -> String>;

fn never() -> TagPredicate {
    Rc::new(|_: &str| false)
}

// =============================================================================
// PARSER OPTIONS
// =============================================================================

#[derive(Clone)]
pub struct ParserOptions {
    pub delimiters: (String, String),
    pub get_text_mode: TextModeFn,
    pub is_void_tag: TagPredicate,
    pub is_pre_tag: TagPredicate,
    /// When set, unknown tags are components
    pub is_native_tag: Option<TagPredicate>,
    pub is_custom_element: TagPredicate,
    pub is_built_in_component: BuiltInComponentFn,
    pub get_namespace: NamespaceFn,
    pub decode_entities: DecodeEntitiesFn,
    pub whitespace: WhitespaceStrategy,
    /// Keep comment nodes
    pub comments: bool,
    pub on_error: ErrorSink,
    pub on_warn: ErrorSink,
}

impl Default for ParserOptions {
    fn default() -> Self {
        Self {
            delimiters: ("{{".to_string(), "}}".to_string()),
            get_text_mode: Rc::new(|_: &ElementNode, _: Option<&ElementNode>| TextMode::Data),
            is_void_tag: never(),
            is_pre_tag: never(),
            is_native_tag: None,
            is_custom_element: never(),
            is_built_in_component: Rc::new(|_: &str| None),
            get_namespace: Rc::new(|_: &str, parent: Option<&ElementNode>| {
                parent.map(|p| p.ns).unwrap_or_default()
            }),
            decode_entities: Rc::new(|raw: &str, _: bool| decode_xml_entities(raw)),
            whitespace: WhitespaceStrategy::Condense,
            comments: true,
            on_error: default_on_error(),
            on_warn: default_on_warn(),
        }
    }
}

impl ParserOptions {
    /// Options for HTML templates: void elements, `<pre>`, raw text
    /// containers and SVG/MathML namespaces.
    pub fn html() -> Self {
        Self {
            get_text_mode: Rc::new(html_text_mode),
            is_void_tag: Rc::new(is_html_void_tag),
            is_pre_tag: Rc::new(|tag: &str| tag == "pre"),
            get_namespace: Rc::new(html_namespace),
            ..Self::default()
        }
    }
}

/// Decode the five XML entities (`&amp;` `&lt;` `&gt;` `&quot;` `&apos;`).
pub fn decode_xml_entities(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(at) = rest.find('&') {
        out.push_str(&rest[..at]);
        rest = &rest[at..];
        let decoded = [("&gt;", '>'), ("&lt;", '<'), ("&amp;", '&'), ("&apos;", '\''), ("&quot;", '"')]
            .into_iter()
            .find(|(entity, _)| rest.starts_with(entity));
        match decoded {
            Some((entity, ch)) => {
                out.push(ch);
                rest = &rest[entity.len()..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Text mode policy for HTML: `textarea`/`title` are RCDATA, raw text
/// containers are RAWTEXT, everything else is DATA.
pub fn html_text_mode(element: &ElementNode, _parent: Option<&ElementNode>) -> TextMode {
    if element.ns != Namespace::Html {
        return TextMode::Data;
    }
    match element.tag.as_str() {
        "textarea" | "title" => TextMode::RcData,
        "style" | "script" | "iframe" | "xmp" | "noembed" | "noframes" | "noscript" => TextMode::RawText,
        _ => TextMode::Data,
    }
}

pub fn is_html_void_tag(tag: &str) -> bool {
    matches!(
        tag,
        "area" | "base" | "br" | "col" | "embed" | "hr" | "img" | "input" | "link" | "meta" | "param" | "source"
            | "track" | "wbr"
    )
}

/// `svg` and `math` open foreign namespaces; `foreignObject` returns to HTML.
pub fn html_namespace(tag: &str, parent: Option<&ElementNode>) -> Namespace {
    let ns = parent.map(|p| p.ns).unwrap_or_default();
    match (ns, parent) {
        (Namespace::Svg, Some(p)) if p.tag == "foreignObject" || p.tag == "desc" || p.tag == "title" => {
            Namespace::Html
        }
        (Namespace::MathMl, Some(p)) if p.tag == "annotation-xml" && tag == "svg" => Namespace::Svg,
        (Namespace::Html, _) => match tag {
            "svg" => Namespace::Svg,
            "math" => Namespace::MathMl,
            _ => Namespace::Html,
        },
        (other, _) => other,
    }
}

// =============================================================================
// TRANSFORM OPTIONS
// =============================================================================

#[derive(Clone)]
pub struct TransformOptions {
    /// Run for every node, in order
    pub node_transforms: Vec<NodeTransform>,
    /// Keyed by directive name without the `v-` prefix
    pub directive_transforms: FxHashMap<String, DirectiveTransform>,
    /// Receives each sibling list that had hoisted children
    pub transform_hoist: Option<HoistTransform>,
    pub is_built_in_component: BuiltInComponentFn,
    pub is_custom_element: TagPredicate,
    /// Rewrite free identifiers in expressions to `_ctx.` accesses
    pub prefix_identifiers: bool,
    pub hoist_static: bool,
    /// Cache inline event handlers (needs `prefix_identifiers`)
    pub cache_handlers: bool,
    pub scope_id: Option<String>,
    pub slotted: bool,
    pub ssr: bool,
    pub in_ssr: bool,
    pub filename: String,
    pub on_error: ErrorSink,
    pub on_warn: ErrorSink,
}

impl Default for TransformOptions {
    fn default() -> Self {
        Self {
            node_transforms: Vec::new(),
            directive_transforms: FxHashMap::default(),
            transform_hoist: None,
            is_built_in_component: Rc::new(|_: &str| None),
            is_custom_element: never(),
            prefix_identifiers: false,
            hoist_static: false,
            cache_handlers: false,
            scope_id: None,
            slotted: true,
            ssr: false,
            in_ssr: false,
            filename: "template.vue.html".to_string(),
            on_error: default_on_error(),
            on_warn: default_on_warn(),
        }
    }
}

/// Parser and transform options for `base_compile`.
#[derive(Clone, Default)]
pub struct CompilerOptions {
    pub parser: ParserOptions,
    pub transform: TransformOptions,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::ast::{ElementType, SourceLocation};

    fn element(tag: &str, ns: Namespace) -> ElementNode {
        ElementNode {
            ns,
            tag: tag.to_string(),
            tag_type: ElementType::Element,
            props: Vec::new(),
            is_self_closing: false,
            children: Vec::new(),
            loc: SourceLocation::stub(),
            codegen: None,
        }
    }

    #[test]
    fn decodes_only_xml_entities() {
        assert_eq!(decode_xml_entities("a &lt;b&gt; &amp;&amp; &quot;c&apos;"), "a <b> && \"c'");
        assert_eq!(decode_xml_entities("&nbsp; & &amp"), "&nbsp; & &amp");
    }

    #[test]
    fn html_text_modes() {
        assert_eq!(html_text_mode(&element("textarea", Namespace::Html), None), TextMode::RcData);
        assert_eq!(html_text_mode(&element("script", Namespace::Html), None), TextMode::RawText);
        assert_eq!(html_text_mode(&element("div", Namespace::Html), None), TextMode::Data);
        assert_eq!(html_text_mode(&element("title", Namespace::Svg), None), TextMode::Data);
    }

    #[test]
    fn namespaces_follow_foreign_content() {
        let svg = element("svg", Namespace::Svg);
        assert_eq!(html_namespace("svg", None), Namespace::Svg);
        assert_eq!(html_namespace("circle", Some(&svg)), Namespace::Svg);
        let foreign = element("foreignObject", Namespace::Svg);
        assert_eq!(html_namespace("div", Some(&foreign)), Namespace::Html);
    }
}
