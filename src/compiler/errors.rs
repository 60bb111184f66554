// ============================================================================
// spark-weave - Compiler Errors
// Structured parse and transform errors delivered through sinks
// ============================================================================

use std::fmt;
use std::rc::Rc;

use thiserror::Error;

use super::ast::SourceLocation;

/// Every error the parser and transforms can report.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // parse errors
    AbruptClosingOfEmptyComment,
    CdataInHtmlContent,
    DuplicateAttribute,
    EndTagWithAttributes,
    EndTagWithTrailingSolidus,
    EofBeforeTagName,
    EofInCdata,
    EofInComment,
    EofInScriptHtmlCommentLikeText,
    EofInTag,
    IncorrectlyClosedComment,
    IncorrectlyOpenedComment,
    InvalidFirstCharacterOfTagName,
    MissingAttributeValue,
    MissingEndTagName,
    MissingWhitespaceBetweenAttributes,
    NestedComment,
    UnexpectedCharacterInAttributeName,
    UnexpectedCharacterInUnquotedAttributeValue,
    UnexpectedEqualsSignBeforeAttributeName,
    UnexpectedNullCharacter,
    UnexpectedQuestionMarkInsteadOfTagName,
    UnexpectedSolidusInTag,

    // template syntax errors
    InvalidEndTag,
    MissingEndTag,
    MissingInterpolationEnd,
    MissingDirectiveName,
    MissingDynamicDirectiveArgumentEnd,

    // transform errors
    VIfNoExpression,
    VIfSameKey,
    VElseNoAdjacentIf,
    VForNoExpression,
    VForMalformedExpression,
    VForTemplateKeyPlacement,
    VBindNoExpression,
    VOnNoExpression,
    VSlotUnexpectedDirectiveOnSlotOutlet,
    VSlotMixedSlotUsage,
    VSlotDuplicateSlotNames,
    VSlotExtraneousDefaultSlotChildren,
    VSlotMisplaced,
    VModelNoExpression,
    VModelMalformedExpression,
    VModelOnScopeVariable,
    InvalidExpression,
    KeepAliveInvalidChildren,

    // option errors
    CacheHandlerNotSupported,
}

impl ErrorCode {
    pub fn message(self) -> &'static str {
        use ErrorCode::*;
        match self {
            AbruptClosingOfEmptyComment => "Illegal comment.",
            CdataInHtmlContent => "CDATA section is allowed only in XML context.",
            DuplicateAttribute => "Duplicate attribute.",
            EndTagWithAttributes => "End tag cannot have attributes.",
            EndTagWithTrailingSolidus => "Illegal '/' in tags.",
            EofBeforeTagName => "Unexpected EOF in tag.",
            EofInCdata => "Unexpected EOF in CDATA section.",
            EofInComment => "Unexpected EOF in comment.",
            EofInScriptHtmlCommentLikeText => "Unexpected EOF in script.",
            EofInTag => "Unexpected EOF in tag.",
            IncorrectlyClosedComment => "Incorrectly closed comment.",
            IncorrectlyOpenedComment => "Incorrectly opened comment.",
            InvalidFirstCharacterOfTagName => "Illegal tag name. Use '&lt;' to print '<'.",
            MissingAttributeValue => "Attribute value was expected.",
            MissingEndTagName => "End tag name was expected.",
            MissingWhitespaceBetweenAttributes => "Whitespace was expected.",
            NestedComment => "Unexpected '<!--' in comment.",
            UnexpectedCharacterInAttributeName => {
                "Attribute name cannot contain U+0022 (\"), U+0027 ('), and U+003C (<)."
            }
            UnexpectedCharacterInUnquotedAttributeValue => {
                "Unquoted attribute value cannot contain U+0022 (\"), U+0027 ('), U+003C (<), U+003D (=), and U+0060 (`)."
            }
            UnexpectedEqualsSignBeforeAttributeName => "Attribute name cannot start with '='.",
            UnexpectedNullCharacter => "Unexpected null character.",
            UnexpectedQuestionMarkInsteadOfTagName => "'<?' is allowed only in XML context.",
            UnexpectedSolidusInTag => "Illegal '/' in tags.",
            InvalidEndTag => "Invalid end tag.",
            MissingEndTag => "Element is missing end tag.",
            MissingInterpolationEnd => "Interpolation end sign was not found.",
            MissingDirectiveName => "Legal directive name was expected.",
            MissingDynamicDirectiveArgumentEnd => {
                "End bracket for dynamic directive argument was not found. Note that dynamic directive argument cannot contain spaces."
            }
            VIfNoExpression => "v-if/v-else-if is missing expression.",
            VIfSameKey => "v-if/else branches must use unique keys.",
            VElseNoAdjacentIf => "v-else/v-else-if has no adjacent v-if or v-else-if.",
            VForNoExpression => "v-for is missing expression.",
            VForMalformedExpression => "v-for has invalid expression.",
            VForTemplateKeyPlacement => "<template v-for> key should be placed on the <template> tag.",
            VBindNoExpression => "v-bind is missing expression.",
            VOnNoExpression => "v-on is missing expression.",
            VSlotUnexpectedDirectiveOnSlotOutlet => "Unexpected custom directive on <slot> outlet.",
            VSlotMixedSlotUsage => {
                "Mixed v-slot usage on both the component and nested <template>. When there are multiple named slots, all slots should use <template> syntax to avoid scope ambiguity."
            }
            VSlotDuplicateSlotNames => "Duplicate slot names found.",
            VSlotExtraneousDefaultSlotChildren => {
                "Extraneous children found when component already has explicitly named default slot. These children will be ignored."
            }
            VSlotMisplaced => "v-slot can only be used on components or <template> tags.",
            VModelNoExpression => "v-model is missing expression.",
            VModelMalformedExpression => "v-model value must be a valid JavaScript member expression.",
            VModelOnScopeVariable => {
                "v-model cannot be used on v-for or v-slot scope variables because they are not writable."
            }
            InvalidExpression => "Error parsing JavaScript expression:",
            KeepAliveInvalidChildren => "<KeepAlive> expects exactly one child component.",
            CacheHandlerNotSupported => {
                "\"cache_handlers\" option is only supported when the \"prefix_identifiers\" option is enabled."
            }
        }
    }

    /// Codes whose construct still compiles to valid output.
    pub fn is_warning(self) -> bool {
        matches!(self, ErrorCode::VSlotExtraneousDefaultSlotChildren)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// An error found while compiling a template.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message}")]
pub struct CompilerError {
    pub code: ErrorCode,
    pub loc: Option<SourceLocation>,
    pub message: String,
}

impl CompilerError {
    pub fn new(code: ErrorCode, loc: Option<SourceLocation>) -> Self {
        Self {
            code,
            loc,
            message: code.message().to_string(),
        }
    }

    /// Same as `new`, with extra detail appended to the message.
    pub fn with_detail(code: ErrorCode, loc: Option<SourceLocation>, detail: &str) -> Self {
        Self {
            code,
            loc,
            message: format!("{} {detail}", code.message()),
        }
    }

    /// `line:column` of the error start, when known.
    pub fn position(&self) -> Option<(usize, usize)> {
        self.loc.as_ref().map(|l| (l.start.line, l.start.column))
    }
}

/// Receiver of compiler errors or warnings.
pub type ErrorSink = Rc<dyn Fn(CompilerError)>;

pub fn default_on_error() -> ErrorSink {
    Rc::new(|e: CompilerError| {
        let (line, column) = e.position().unwrap_or((0, 0));
        tracing::error!(target: "spark_weave::compiler", code = ?e.code, line, column, "{e}");
    })
}

pub fn default_on_warn() -> ErrorSink {
    Rc::new(|e: CompilerError| {
        tracing::warn!(target: "spark_weave::compiler", code = ?e.code, "{e}");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::ast::Position;

    #[test]
    fn message_comes_from_code() {
        let e = CompilerError::new(ErrorCode::MissingEndTag, None);
        assert_eq!(e.to_string(), "Element is missing end tag.");
        assert_eq!(e.position(), None);
    }

    #[test]
    fn detail_is_appended() {
        let start = Position {
            offset: 3,
            line: 1,
            column: 4,
        };
        let loc = SourceLocation::new(start, start, "");
        let e = CompilerError::with_detail(ErrorCode::InvalidExpression, Some(loc), "a +");
        assert_eq!(e.message, "Error parsing JavaScript expression: a +");
        assert_eq!(e.position(), Some((1, 4)));
    }
}
