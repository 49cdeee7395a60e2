//! Crate root: the compilation pipeline, wired end to end.
//!
//! The stages are intentionally small and composable:
//! - `source` owns the program text and resolves locations to lines.
//! - `diagnostics` is the bus every stage reports through.
//! - `scanner` performs lexical analysis and produces classified words.
//! - `parser` owns all syntactic knowledge and drives `semantics`,
//!   which builds and type-checks the tree while it is being parsed.
//! - `frame` lays out one activation record per function.
//! - `codegen` lowers the annotated tree into O32 MIPS assembly.
//! - `error` centralises the hard-failure sentinels shared by the
//!   other modules.
//!
//! The driver is expected to open files, install any extra diagnostic
//! handlers, and write the listing out; the core only maps a source
//! buffer to an assembly string plus a stream of diagnostics.

pub mod ast;
pub mod diagnostics;
pub mod error;
pub mod frame;
pub mod parser;
pub mod scanner;
pub mod semantics;
pub mod source;

mod codegen;

pub use error::{CompileError, CompileResult};

use diagnostics::DiagnosticManager;
use error::InvalidProgramSnafu;
use parser::Parser;
use scanner::{Category, Scanner};
use semantics::Semantics;
use snafu::ensure;
use source::SourceFile;

/// Compile a source file into an O32 MIPS assembly listing.
///
/// Any committed diagnostic fails the compilation before code
/// generation runs; the first syntax error aborts it outright.
pub fn generate_assembly<'a>(
  source: &'a SourceFile,
  diagman: &'a DiagnosticManager<'a>,
) -> CompileResult<String> {
  let mut program = parse(source, diagman)?;
  frame::layout_frames(&mut program);
  Ok(codegen::generate(&program))
}

/// Parse and analyze a source file, returning the AST in labeled
/// bracket notation instead of assembly.
pub fn dump_ast<'a>(
  source: &'a SourceFile,
  diagman: &'a DiagnosticManager<'a>,
) -> CompileResult<String> {
  Ok(parse(source, diagman)?.dump())
}

/// Scan a source file, listing every word as `(line,CATEGORY,"lexeme")`.
pub fn dump_tokens<'a>(
  source: &'a SourceFile,
  diagman: &'a DiagnosticManager<'a>,
) -> CompileResult<String> {
  let mut scanner = Scanner::new(source, diagman);
  let mut out = String::new();
  loop {
    let word = scanner.next_word();
    if word.category == Category::Eof {
      break;
    }
    let (line, _) = source.line_and_column(word.location());
    let kind = match word.category {
      Category::Identifier => "ID",
      Category::Number => "NUM",
      Category::Else
      | Category::If
      | Category::Int
      | Category::Return
      | Category::Void
      | Category::While => "KEY",
      _ => "SYM",
    };
    out.push_str(&format!(
      "({},{},\"{}\")\n",
      line,
      kind,
      source.range_text(word.lexeme)
    ));
  }

  let errors = diagman.error_count();
  ensure!(errors == 0, InvalidProgramSnafu { count: errors });
  Ok(out)
}

fn parse<'a>(
  source: &'a SourceFile,
  diagman: &'a DiagnosticManager<'a>,
) -> CompileResult<ast::Program> {
  let scanner = Scanner::new(source, diagman);
  let sema = Semantics::new(source, diagman);
  let parser = Parser::new(scanner, sema, diagman);
  let program = parser.parse_program()?;

  let errors = diagman.error_count();
  ensure!(errors == 0, InvalidProgramSnafu { count: errors });
  Ok(program)
}
