//! Diagnostic module - Error and warning reporting infrastructure.
//!
//! Every phase of the compiler reports problems through a shared
//! [`Handler`]. Diagnostics carry a severity [`Level`], a message, and a
//! [`Span`]; they render in the classic `file:line:col: severity: message`
//! shape, and the handler produces the closing `N error(s), M warning(s)`
//! summary for the job.
//!
//! # Examples
//!
//! ```
//! use qcc_util::diagnostic::{Diagnostic, Handler};
//! use qcc_util::span::Span;
//!
//! let handler = Handler::new();
//! handler.error("unexpected token", Span::DUMMY);
//!
//! assert!(handler.has_errors());
//! assert_eq!(handler.error_count(), 1);
//! ```

use crate::span::{SourceMap, Span};
use std::cell::{Cell, RefCell};
use std::fmt;

/// Diagnostic severity level.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    /// Additional information attached to another diagnostic.
    Note,
    /// A problem that does not prevent compilation.
    Warning,
    /// A problem that prevents compilation.
    Error,
    /// A problem that stops the pipeline immediately.
    Fatal,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Level::Note => write!(f, "note"),
            Level::Warning => write!(f, "warning"),
            Level::Error => write!(f, "error"),
            Level::Fatal => write!(f, "fatal error"),
        }
    }
}

/// A diagnostic message with severity and location.
#[derive(Clone, Debug)]
pub struct Diagnostic {
    /// Diagnostic severity level.
    pub level: Level,
    /// Main diagnostic message.
    pub message: String,
    /// Source location.
    pub span: Span,
    /// Additional notes for context.
    pub notes: Vec<String>,
}

impl Diagnostic {
    /// Create a new diagnostic.
    pub fn new(level: Level, message: impl Into<String>, span: Span) -> Self {
        Self {
            level,
            message: message.into(),
            span,
            notes: Vec::new(),
        }
    }

    /// Create an error diagnostic.
    pub fn error(message: impl Into<String>, span: Span) -> Self {
        Self::new(Level::Error, message, span)
    }

    /// Create a warning diagnostic.
    pub fn warning(message: impl Into<String>, span: Span) -> Self {
        Self::new(Level::Warning, message, span)
    }

    /// Add a note to the diagnostic.
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    /// Render as `file:line:col: severity: message`.
    pub fn render(&self, sources: &SourceMap) -> String {
        let mut out = format!(
            "{}:{}:{}: {}: {}",
            sources.name_of(self.span.file_id),
            self.span.line,
            self.span.column,
            self.level,
            self.message
        );
        for note in &self.notes {
            out.push_str(&format!(
                "\n{}:{}:{}: note: {}",
                sources.name_of(self.span.file_id),
                self.span.line,
                self.span.column,
                note
            ));
        }
        out
    }
}

/// Handler for collecting and reporting diagnostics.
///
/// Uses interior mutability so that every phase can hold a shared
/// reference to the same handler. With `treat_warnings_as_errors` set,
/// warnings are promoted to errors at emission time (`-Werror`).
pub struct Handler {
    diagnostics: RefCell<Vec<Diagnostic>>,
    errors: Cell<usize>,
    warnings: Cell<usize>,
    fatal: Cell<bool>,
    werror: Cell<bool>,
}

impl Handler {
    /// Create a new handler.
    pub fn new() -> Self {
        Self {
            diagnostics: RefCell::new(Vec::new()),
            errors: Cell::new(0),
            warnings: Cell::new(0),
            fatal: Cell::new(false),
            werror: Cell::new(false),
        }
    }

    /// Promote warnings to errors (`-Werror`).
    pub fn set_warnings_as_errors(&self, enabled: bool) {
        self.werror.set(enabled);
    }

    /// Emit a pre-built diagnostic.
    pub fn emit(&self, mut diagnostic: Diagnostic) {
        if diagnostic.level == Level::Warning && self.werror.get() {
            diagnostic.level = Level::Error;
        }
        match diagnostic.level {
            Level::Error => self.errors.set(self.errors.get() + 1),
            Level::Fatal => {
                self.errors.set(self.errors.get() + 1);
                self.fatal.set(true);
            }
            Level::Warning => self.warnings.set(self.warnings.get() + 1),
            Level::Note => {}
        }
        self.diagnostics.borrow_mut().push(diagnostic);
    }

    /// Report an error at a location.
    pub fn error(&self, message: impl Into<String>, span: Span) {
        self.emit(Diagnostic::error(message, span));
    }

    /// Report a warning at a location.
    pub fn warning(&self, message: impl Into<String>, span: Span) {
        self.emit(Diagnostic::warning(message, span));
    }

    /// Report a note at a location.
    pub fn note(&self, message: impl Into<String>, span: Span) {
        self.emit(Diagnostic::new(Level::Note, message, span));
    }

    /// Report a fatal error; callers should stop at the next phase boundary.
    pub fn fatal(&self, message: impl Into<String>, span: Span) {
        self.emit(Diagnostic::new(Level::Fatal, message, span));
    }

    /// Check if any errors (or fatals) have been reported.
    pub fn has_errors(&self) -> bool {
        self.errors.get() > 0
    }

    /// Check if a fatal error has been reported.
    pub fn has_fatal(&self) -> bool {
        self.fatal.get()
    }

    /// Number of errors reported so far.
    pub fn error_count(&self) -> usize {
        self.errors.get()
    }

    /// Number of warnings reported so far.
    pub fn warning_count(&self) -> usize {
        self.warnings.get()
    }

    /// Snapshot of all diagnostics in emission (source) order.
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.diagnostics.borrow().clone()
    }

    /// Render every diagnostic in emission order, one per line.
    pub fn render_all(&self, sources: &SourceMap) -> String {
        let diags = self.diagnostics.borrow();
        let mut out = String::new();
        for diag in diags.iter() {
            out.push_str(&diag.render(sources));
            out.push('\n');
        }
        out
    }

    /// The closing `N error(s), M warning(s)` summary line.
    pub fn summary(&self) -> String {
        format!(
            "{} error(s), {} warning(s)",
            self.errors.get(),
            self.warnings.get()
        )
    }
}

impl Default for Handler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::span::{FileId, SourceMap};

    #[test]
    fn test_level_display() {
        assert_eq!(format!("{}", Level::Note), "note");
        assert_eq!(format!("{}", Level::Warning), "warning");
        assert_eq!(format!("{}", Level::Error), "error");
        assert_eq!(format!("{}", Level::Fatal), "fatal error");
    }

    #[test]
    fn test_handler_counts() {
        let handler = Handler::new();
        assert!(!handler.has_errors());
        handler.error("bad", Span::DUMMY);
        handler.warning("iffy", Span::DUMMY);
        handler.warning("iffy again", Span::DUMMY);
        assert!(handler.has_errors());
        assert_eq!(handler.error_count(), 1);
        assert_eq!(handler.warning_count(), 2);
    }

    #[test]
    fn test_werror_promotes_warnings() {
        let handler = Handler::new();
        handler.set_warnings_as_errors(true);
        handler.warning("iffy", Span::DUMMY);
        assert!(handler.has_errors());
        assert_eq!(handler.error_count(), 1);
        assert_eq!(handler.warning_count(), 0);
    }

    #[test]
    fn test_fatal_sets_flag() {
        let handler = Handler::new();
        handler.fatal("out of road", Span::DUMMY);
        assert!(handler.has_fatal());
        assert!(handler.has_errors());
    }

    #[test]
    fn test_render_format() {
        let mut sources = SourceMap::new();
        sources.add_file("main.c", "int x\n");
        let handler = Handler::new();
        handler.error(
            "expected ';'",
            Span::new(5, 6, FileId(0), 1, 6),
        );
        let rendered = handler.render_all(&sources);
        assert_eq!(rendered, "main.c:1:6: error: expected ';'\n");
    }

    #[test]
    fn test_summary_line() {
        let handler = Handler::new();
        handler.error("a", Span::DUMMY);
        handler.error("b", Span::DUMMY);
        handler.warning("c", Span::DUMMY);
        assert_eq!(handler.summary(), "2 error(s), 1 warning(s)");
    }

    #[test]
    fn test_note_attaches() {
        let mut sources = SourceMap::new();
        sources.add_file("main.c", "");
        let handler = Handler::new();
        handler.emit(
            Diagnostic::error("redefinition of 'x'", Span::new(0, 1, FileId(0), 2, 1))
                .with_note("previous definition was here"),
        );
        let rendered = handler.render_all(&sources);
        assert!(rendered.contains("main.c:2:1: error: redefinition of 'x'"));
        assert!(rendered.contains("note: previous definition was here"));
    }
}
