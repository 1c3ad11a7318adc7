//! Shading-language front end and SSA IR lowering pipeline.
//!
//! Takes a named source string, parses it, and lowers every stage entry
//! point to one [`ir::IrModule`] each. There is no configuration loader
//! and no CLI binary: the only product surface is [`compile`].

pub mod ast;
pub mod builtins;
pub mod diagnostics;
pub mod ir;
pub mod lexer;
pub mod lower;
pub mod parser;
pub mod source;
pub mod types;

pub use ast::Program;
pub use diagnostics::{Diagnostic, DiagnosticKind, Severity};
pub use ir::IrModule;
pub use source::{SourceId, SourceManager, Span};

use tracing::instrument;

/// A single named source to compile. Several inputs, in the order the
/// caller supplies them, let the same [`SourceManager`] carry an entry
/// point plus whatever it `import`s.
pub struct Config {
    /// Logical path used for diagnostics and import resolution.
    pub name: String,
    pub source: String,
}

impl Config {
    #[must_use]
    pub fn new(name: impl Into<String>, source: impl Into<String>) -> Self {
        Config {
            name: name.into(),
            source: source.into(),
        }
    }
}

/// Compile one source unit into its per-stage IR modules.
///
/// Lexical and syntactic errors are recoverable (the parser resyncs and
/// keeps going); semantic and lowering errors are fatal only to the
/// declaration that produced them, so sibling stage entry points still
/// lower independently. Only an I/O diagnostic (source too large) is
/// fatal to the whole compilation, in which case `Err` carries just that
/// diagnostic and no modules are returned.
#[instrument(skip(config), fields(source = %config.name))]
pub fn compile(config: Config) -> Result<Vec<IrModule>, Vec<Diagnostic>> {
    let mut sources = SourceManager::new();
    let source_id = sources
        .insert(config.name.clone(), config.source.into_bytes())
        .map_err(|e| vec![Diagnostic::new(DiagnosticKind::SourceTooLarge, Span::default()).with_message(e.to_string())])?;

    let lexer = lexer::Lexer::new(&sources, source_id);
    let (tokens, lex_diagnostics) = lexer.tokenize();

    let (program, parse_diagnostics) = parser::parse(&tokens);

    let mut diagnostics = lex_diagnostics;
    diagnostics.extend(parse_diagnostics);

    if diagnostics.iter().any(|d| d.severity() == Severity::FatalToCompilation) {
        return Err(diagnostics);
    }

    let (modules, lower_diagnostics) = lower_program(&program);
    diagnostics.extend(lower_diagnostics);

    if diagnostics.iter().any(|d| d.severity() == Severity::FatalToCompilation) {
        Err(diagnostics)
    } else {
        tracing::info!(modules = modules.len(), diagnostics = diagnostics.len(), "compilation finished");
        Ok(modules)
    }
}

#[instrument(skip(program))]
fn lower_program(program: &Program) -> (Vec<IrModule>, Vec<Diagnostic>) {
    lower::lower_program(program)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_source_compiles_to_no_modules() {
        let result = compile(Config::new("empty.shd", ""));
        assert_eq!(result.unwrap(), Vec::new());
    }

    #[test]
    fn oversized_source_is_fatal_to_compilation() {
        let huge = "a".repeat(source::DEFAULT_MAX_SOURCE_BYTES + 1);
        let diagnostics = compile(Config::new("huge.shd", huge)).unwrap_err();
        assert!(diagnostics.iter().any(|d| matches!(d.kind, DiagnosticKind::SourceTooLarge)));
    }
}
