//! Diagnostic Sink
//!
//! Accumulates structured errors with source spans, classifies them as
//! fatal or recoverable, and renders them for display. Mirrors the
//! `err_*`/`format_*` catalogue of a SPIR-V-oriented shading-DSL front end:
//! every [`DiagnosticKind`] variant name traces back to one of those.

use miette::{Diagnostic as MietteDiagnostic, SourceSpan};
use thiserror::Error;

use crate::source::Span;

/// Which stage of the pipeline a diagnostic originated in.
///
/// Determines the propagation policy (see module docs and §7 of the spec):
/// lexical/syntactic are recoverable, semantic/lowering are fatal to the
/// enclosing declaration, I/O is fatal to the whole compilation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Recoverable: the parser resyncs and continues.
    Recoverable,
    /// Fatal to the enclosing function/module, siblings continue.
    FatalToDeclaration,
    /// Fatal to the whole compilation.
    FatalToCompilation,
}

/// Structured error kind. Names mirror the original `err_*` diagnostic
/// catalogue this spec was distilled from.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DiagnosticKind {
    // Lexical
    #[error("invalid character in source")]
    InvalidCharacter,
    #[error("invalid literal suffix")]
    InvalidLiteralSuffix,
    #[error("integer literal overflow")]
    IntegerLiteralOverflow,
    #[error("unterminated block comment")]
    UnterminatedComment,

    // Syntactic
    #[error("unexpected token")]
    UnexpectedToken,
    #[error("missing terminator")]
    MissingTerminator,
    #[error("empty struct")]
    EmptyStruct,
    #[error("duplicate switch label")]
    DuplicateLabel,
    #[error("duplicate default arm")]
    DuplicateDefault,
    #[error("break used outside loop or switch")]
    BreakOutsideLoop,
    #[error("continue used outside loop")]
    ContinueOutsideLoop,

    // Semantic (surfaced here only as inputs the lowerer refuses to trust)
    #[error("undefined symbol")]
    UndefinedSymbol,
    #[error("overload mismatch")]
    OverloadMismatch,
    #[error("condition is not convertible to bool")]
    NonBoolCondition,
    #[error("expression is not indexable")]
    UnindexableExpression,
    #[error("array index is not an integer")]
    NonIntegerArrayIndex,
    #[error("types are not convertible")]
    NonConvertibleTypes,
    #[error("illegal attribute")]
    IllegalAttribute,
    #[error("duplicate attribute")]
    DuplicateAttribute,
    #[error("recursive struct definition")]
    RecursiveStruct,
    #[error("opaque type used as a struct field")]
    OpaqueTypeInStruct,

    // Lowering
    #[error("conversion between these types is impossible")]
    ConversionImpossible,
    #[error("expression does not have an address")]
    UnaddressableLValue,
    #[error("no builtin variant exists for this call")]
    MissingBuiltinVariant,
    #[error("construct is not implemented by the lowering engine")]
    UnimplementedConstruct,

    // I/O
    #[error("import failed")]
    ImportFailed,
    #[error("source exceeds the maximum allowed size")]
    SourceTooLarge,
    #[error("import path is ambiguous")]
    AmbiguousImport,
}

impl DiagnosticKind {
    /// The propagation policy for this kind, per §7.
    #[must_use]
    pub fn severity(&self) -> Severity {
        use DiagnosticKind::*;
        match self {
            InvalidCharacter | InvalidLiteralSuffix | IntegerLiteralOverflow
            | UnterminatedComment | UnexpectedToken | MissingTerminator | EmptyStruct
            | DuplicateLabel | DuplicateDefault => Severity::Recoverable,
            UndefinedSymbol
            | OverloadMismatch
            | NonBoolCondition
            | UnindexableExpression
            | NonIntegerArrayIndex
            | NonConvertibleTypes
            | IllegalAttribute
            | DuplicateAttribute
            | RecursiveStruct
            | OpaqueTypeInStruct
            | ConversionImpossible
            | UnaddressableLValue
            | MissingBuiltinVariant
            | UnimplementedConstruct
            | BreakOutsideLoop
            | ContinueOutsideLoop => Severity::FatalToDeclaration,
            ImportFailed | SourceTooLarge | AmbiguousImport => Severity::FatalToCompilation,
        }
    }
}

/// A caption attached to a secondary span, e.g. "previous declaration here".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecondarySpan {
    pub span: Span,
    pub caption: String,
}

/// A single structured diagnostic with a primary span and an optional
/// rendered message, plus zero or more secondary spans (e.g. the span of
/// a conflicting prior declaration).
#[derive(Debug, Error, MietteDiagnostic, Clone, PartialEq, Eq)]
#[error("{kind}")]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    #[label("here")]
    pub primary: SourceSpan,
    pub primary_span: Span,
    pub secondary: Vec<SecondarySpan>,
    pub message: Option<String>,
}

impl Diagnostic {
    #[must_use]
    pub fn new(kind: DiagnosticKind, span: Span) -> Self {
        Diagnostic {
            primary: (span.start_offset as usize, span.len()).into(),
            primary_span: span,
            kind,
            secondary: Vec::new(),
            message: None,
        }
    }

    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    #[must_use]
    pub fn with_secondary(mut self, span: Span, caption: impl Into<String>) -> Self {
        self.secondary.push(SecondarySpan {
            span,
            caption: caption.into(),
        });
        self
    }

    #[must_use]
    pub fn severity(&self) -> Severity {
        self.kind.severity()
    }

    #[must_use]
    pub fn rendered(&self) -> String {
        match &self.message {
            Some(m) => format!("{} at {}: {}", self.kind, self.primary_span, m),
            None => format!("{} at {}", self.kind, self.primary_span),
        }
    }
}

/// Accumulates diagnostics for a single compilation and tracks whether a
/// fatal-to-compilation error was ever recorded.
#[derive(Debug, Default)]
pub struct DiagnosticSink {
    diagnostics: Vec<Diagnostic>,
    fatal_to_compilation: bool,
}

impl DiagnosticSink {
    #[must_use]
    pub fn new() -> Self {
        DiagnosticSink::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        if diagnostic.severity() == Severity::FatalToCompilation {
            self.fatal_to_compilation = true;
        }
        self.diagnostics.push(diagnostic);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    #[must_use]
    pub fn has_fatal_to_compilation(&self) -> bool {
        self.fatal_to_compilation
    }

    /// Whether any accumulated diagnostic is fatal (to a declaration or to
    /// the whole compilation). Used to decide process exit status (§6).
    #[must_use]
    pub fn has_fatal(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity() != Severity::Recoverable)
    }

    #[must_use]
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    #[must_use]
    pub fn into_diagnostics(self) -> Vec<Diagnostic> {
        self.diagnostics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SourceId;

    fn span() -> Span {
        Span::new(SourceId::new(0), 0, 3, 1, 1)
    }

    #[test]
    fn severity_classification() {
        assert_eq!(
            DiagnosticKind::InvalidCharacter.severity(),
            Severity::Recoverable
        );
        assert_eq!(
            DiagnosticKind::UndefinedSymbol.severity(),
            Severity::FatalToDeclaration
        );
        assert_eq!(
            DiagnosticKind::ImportFailed.severity(),
            Severity::FatalToCompilation
        );
        assert_eq!(
            DiagnosticKind::BreakOutsideLoop.severity(),
            Severity::FatalToDeclaration
        );
        assert_eq!(
            DiagnosticKind::ContinueOutsideLoop.severity(),
            Severity::FatalToDeclaration
        );
    }

    #[test]
    fn sink_tracks_fatal_to_compilation() {
        let mut sink = DiagnosticSink::new();
        assert!(!sink.has_fatal());
        sink.push(Diagnostic::new(DiagnosticKind::UnexpectedToken, span()));
        assert!(!sink.has_fatal_to_compilation());
        assert!(sink.has_fatal());
        sink.push(Diagnostic::new(DiagnosticKind::ImportFailed, span()));
        assert!(sink.has_fatal_to_compilation());
        assert_eq!(sink.diagnostics().len(), 2);
    }
}
