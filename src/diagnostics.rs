//! Structured diagnostics: codes, the builder, and the handler chain.
//!
//! Every stage of the pipeline reports through one `DiagnosticManager`.
//! A report starts a `DiagnosticBuilder`, which accumulates arguments
//! and highlight ranges and commits exactly once when dropped. The
//! manager forwards committed diagnostics to a chain of handlers,
//! newest first; a handler returning `false` stops the chain, and a
//! diagnostic that makes it through every installed handler reaches the
//! built-in terminal renderer.
//!
//! Scanner, parser and semantic analyzer all hold a shared reference to
//! the bus, so its state lives behind `Cell`/`RefCell`.

use crate::scanner::Category;
use crate::source::{SourceFile, SourceLocation, SourceRange};
use std::cell::{Cell, RefCell};

/// Diagnostic code enumeration. Every current code is an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Diag {
  LexerBadNumber,
  LexerBadChar,
  LexerUnclosedComment,

  ParserExpectedToken, // %0 => Category
  ParserExpectedType,
  ParserExpectedExpression,
  ParserExpectedStatement,
  ParserNumberTooBig,

  SemaRedefinition,         // %0 => name
  SemaUndeclaredIdentifier, // %0 => name
  SemaFunIsNotAFun,
  SemaVarIsNotAVar,
  SemaVarCannotBeVoid,
  SemaSubscriptedScalar,
  SemaIndexNotInt,
  SemaInvalidOperands,    // %0 => operator category
  SemaWrongArgumentCount, // %0 => callee name
  SemaIncompatibleArgument, // %0 => callee name
  SemaReturnTypeMismatch, // %0 => function name
}

impl Diag {
  /// Message template with `%0`, `%1`, … argument slots.
  fn template(self) -> &'static str {
    match self {
      Diag::LexerBadNumber => "invalid numeric constant",
      Diag::LexerBadChar => "invalid character in input",
      Diag::LexerUnclosedComment => "unterminated /* comment",
      Diag::ParserExpectedToken => "expected %0",
      Diag::ParserExpectedType => "expected type specifier",
      Diag::ParserExpectedExpression => "expected expression",
      Diag::ParserExpectedStatement => "expected statement",
      Diag::ParserNumberTooBig => "integer constant is too large",
      Diag::SemaRedefinition => "redefinition of '%0'",
      Diag::SemaUndeclaredIdentifier => "use of undeclared identifier '%0'",
      Diag::SemaFunIsNotAFun => "called object is not a function",
      Diag::SemaVarIsNotAVar => "referenced identifier is not a variable",
      Diag::SemaVarCannotBeVoid => "variable cannot have void type",
      Diag::SemaSubscriptedScalar => "subscripted value is not an array",
      Diag::SemaIndexNotInt => "array subscript is not an integer",
      Diag::SemaInvalidOperands => "invalid operands to binary %0",
      Diag::SemaWrongArgumentCount => "wrong number of arguments in call to '%0'",
      Diag::SemaIncompatibleArgument => "incompatible argument in call to '%0'",
      Diag::SemaReturnTypeMismatch => {
        "return statement incompatible with the return type of '%0'"
      }
    }
  }
}

/// Argument attached to a diagnostic for message formatting.
#[derive(Debug, Clone, Copy)]
pub enum DiagArg {
  Category(Category),
  Range(SourceRange),
}

impl From<Category> for DiagArg {
  fn from(category: Category) -> Self {
    DiagArg::Category(category)
  }
}

impl From<SourceRange> for DiagArg {
  fn from(range: SourceRange) -> Self {
    DiagArg::Range(range)
  }
}

/// A committed diagnostic.
#[derive(Debug)]
pub struct Diagnostic {
  pub loc: SourceLocation,
  pub code: Diag,
  pub args: Vec<DiagArg>,
  pub ranges: Vec<SourceRange>,
}

impl Diagnostic {
  /// The formatted message, with argument slots substituted.
  pub fn message(&self, source: &SourceFile) -> String {
    let template = self.code.template();
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
      if c == '%'
        && let Some(digit) = chars.peek().and_then(|p| p.to_digit(10))
      {
        chars.next();
        match self.args.get(digit as usize) {
          Some(DiagArg::Category(category)) => out.push_str(category.describe()),
          Some(DiagArg::Range(range)) => out.push_str(source.range_text(*range)),
          None => out.push_str("<missing>"),
        }
      } else {
        out.push(c);
      }
    }
    out
  }
}

/// Renders a diagnostic the way the terminal handler prints it:
/// `file:line:col: error: message`, followed by one underlined source
/// line per attached range.
pub fn render(source: &SourceFile, diag: &Diagnostic) -> String {
  let (line, column) = source.line_and_column(diag.loc);
  let mut out = format!(
    "{}:{}:{}: error: {}",
    source.name(),
    line,
    column,
    diag.message(source)
  );

  for range in &diag.ranges {
    let (range_line, range_column) = source.line_and_column(range.start);
    let text = source.line_text(range_line);
    out.push('\n');
    out.push_str(text);
    out.push('\n');
    for _ in 1..range_column {
      out.push(' ');
    }
    out.push('^');
    let avail = text.len().saturating_sub(range_column);
    for _ in 1..range.len.min(avail + 1) {
      out.push('~');
    }
  }
  out
}

type Handler = Box<dyn FnMut(&Diagnostic) -> bool>;

/// The diagnostic bus. Collects structured diagnostics and forwards
/// them to the installed handler chain.
pub struct DiagnosticManager<'a> {
  source: &'a SourceFile,
  handlers: RefCell<Vec<Handler>>,
  errors: Cell<usize>,
}

impl<'a> DiagnosticManager<'a> {
  pub fn new(source: &'a SourceFile) -> Self {
    Self {
      source,
      handlers: RefCell::new(Vec::new()),
      errors: Cell::new(0),
    }
  }

  /// Starts a diagnostic report. The returned builder commits to the
  /// bus when it goes out of scope.
  pub fn report(&self, loc: SourceLocation, code: Diag) -> DiagnosticBuilder<'_, 'a> {
    DiagnosticBuilder {
      manager: self,
      diag: Some(Diagnostic {
        loc,
        code,
        args: Vec::new(),
        ranges: Vec::new(),
      }),
    }
  }

  /// Pushes a handler onto the chain. Handlers run newest first; each
  /// returns whether the diagnostic should continue down the chain.
  pub fn handler(&self, handler: impl FnMut(&Diagnostic) -> bool + 'static) {
    self.handlers.borrow_mut().push(Box::new(handler));
  }

  /// Number of error diagnostics committed so far.
  pub fn error_count(&self) -> usize {
    self.errors.get()
  }

  fn emit(&self, diag: Diagnostic) {
    self.errors.set(self.errors.get() + 1);
    for handler in self.handlers.borrow_mut().iter_mut().rev() {
      if !handler(&diag) {
        return;
      }
    }
    eprintln!("{}", render(self.source, &diag));
  }
}

/// Chain-builds a diagnostic and commits it to the bus on drop.
pub struct DiagnosticBuilder<'m, 'a> {
  manager: &'m DiagnosticManager<'a>,
  diag: Option<Diagnostic>,
}

impl DiagnosticBuilder<'_, '_> {
  /// Appends an argument for replacement during message formatting.
  pub fn arg(mut self, arg: impl Into<DiagArg>) -> Self {
    if let Some(diag) = self.diag.as_mut() {
      diag.args.push(arg.into());
    }
    self
  }

  /// Appends a range to be underlined when the diagnostic is printed.
  pub fn range(mut self, range: SourceRange) -> Self {
    if let Some(diag) = self.diag.as_mut() {
      diag.ranges.push(range);
    }
    self
  }
}

impl Drop for DiagnosticBuilder<'_, '_> {
  fn drop(&mut self) {
    if let Some(diag) = self.diag.take() {
      self.manager.emit(diag);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::cell::RefCell;
  use std::rc::Rc;

  fn silenced(diagman: &DiagnosticManager<'_>) -> Rc<RefCell<Vec<Diag>>> {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    diagman.handler(move |diag| {
      sink.borrow_mut().push(diag.code);
      false
    });
    seen
  }

  #[test]
  fn builder_commits_on_drop() {
    let source = SourceFile::new("t.cm", "int x;");
    let diagman = DiagnosticManager::new(&source);
    let seen = silenced(&diagman);

    assert_eq!(diagman.error_count(), 0);
    diagman
      .report(4, Diag::SemaRedefinition)
      .arg(SourceRange::new(4, 1))
      .range(SourceRange::new(4, 1));
    assert_eq!(diagman.error_count(), 1);
    assert_eq!(*seen.borrow(), vec![Diag::SemaRedefinition]);
  }

  #[test]
  fn handlers_run_newest_first_and_short_circuit() {
    let source = SourceFile::new("t.cm", "");
    let diagman = DiagnosticManager::new(&source);
    let order = Rc::new(RefCell::new(Vec::new()));

    let first = Rc::clone(&order);
    diagman.handler(move |_| {
      first.borrow_mut().push("old");
      false
    });
    let second = Rc::clone(&order);
    diagman.handler(move |_| {
      second.borrow_mut().push("new");
      true
    });

    diagman.report(0, Diag::ParserExpectedType);
    assert_eq!(*order.borrow(), vec!["new", "old"]);
  }

  #[test]
  fn render_formats_location_and_underline() {
    let source = SourceFile::new("prog.cm", "int 1x;\n");
    let diag = Diagnostic {
      loc: 4,
      code: Diag::LexerBadNumber,
      args: Vec::new(),
      ranges: vec![SourceRange::new(4, 2)],
    };
    let rendered = render(&source, &diag);
    assert_eq!(
      rendered,
      "prog.cm:1:5: error: invalid numeric constant\nint 1x;\n    ^~"
    );
  }

  #[test]
  fn category_argument_is_spelled_out() {
    let source = SourceFile::new("t.cm", "");
    let diag = Diagnostic {
      loc: 0,
      code: Diag::ParserExpectedToken,
      args: vec![DiagArg::Category(Category::Semicolon)],
      ranges: Vec::new(),
    };
    assert_eq!(diag.message(&source), "expected ';'");
  }
}
