//! Hard-failure sentinels for the compilation pipeline.
//!
//! User-facing detail travels through the diagnostic bus in
//! `diagnostics`; by the time one of these errors is returned the
//! offending construct has already been reported. The variants here
//! carry just enough to abort the pipeline and pick an exit status.

use snafu::Snafu;

pub type CompileResult<T> = Result<T, CompileError>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum CompileError {
  /// The parser hit its first syntax error and gave up. No recovery is
  /// attempted; the diagnostic was emitted at the point of failure.
  #[snafu(display("compilation aborted: syntax error"))]
  Syntax,

  /// Parsing finished but diagnostics were emitted along the way, so
  /// code generation was skipped.
  #[snafu(display("compilation failed with {count} error(s)"))]
  InvalidProgram { count: usize },
}
