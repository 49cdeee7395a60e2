//! Activation-record layout: a pre-pass over each function body that
//! sizes the five frame regions and assigns stack offsets.
//!
//! The frame grows downward and is addressed from `$sp` upward:
//!
//! ```text
//! $sp -> | output | temp | saved | local | input |
//! ```
//!
//! `output` holds outgoing call arguments (16 bytes minimum per O32),
//! `temp` is the expression working stack, `saved` keeps `$ra`,
//! `local` holds every local variable of the function (no reuse across
//! nested compounds), and `input` receives the incoming `$a0..$a3`.
//! The total is rounded up to the 8-byte O32 alignment.
//!
//! Temp sizing mirrors the code generator's spill discipline exactly:
//! the generator's bump pointer may touch but never exceed the peak
//! computed here.

use crate::ast::{CompoundStmt, Decl, DeclId, Expr, ExprKind, Program, Stmt};

pub const WORD_SIZE: i32 = 4;
const STACK_ALIGNMENT: i32 = 8;

/// Sizes of the five activation-record regions, in bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameInfo {
  pub input_size: i32,
  pub local_size: i32,
  pub saved_size: i32,
  pub temp_size: i32,
  pub output_size: i32,
  pub total_size: i32,
}

impl FrameInfo {
  pub fn temp_offset(&self) -> i32 {
    self.output_size
  }

  pub fn saved_offset(&self) -> i32 {
    self.output_size + self.temp_size
  }

  pub fn local_offset(&self) -> i32 {
    self.saved_offset() + self.saved_size
  }

  pub fn input_offset(&self) -> i32 {
    self.local_offset() + self.local_size
  }
}

/// Computes frame layouts for every function in the program and assigns
/// `$sp`-relative offsets to locals and parameters.
pub fn layout_frames(program: &mut Program) {
  for id in 0..program.decls.len() {
    if matches!(program.decls[id], Decl::Fun(_)) {
      layout_function(&mut program.decls, id);
    }
  }
}

fn layout_function(decls: &mut [Decl], fun_id: DeclId) {
  let (params, body) = {
    let Decl::Fun(fun) = &mut decls[fun_id] else {
      return;
    };
    let Some(body) = fun.body.take() else {
      return; // builtins have no body to lay out
    };
    (fun.params.clone(), body)
  };

  let mut scan = FrameScan::default();
  scan.compound(decls, &body);

  let mut frame = FrameInfo {
    input_size: WORD_SIZE * params.len() as i32,
    local_size: scan.local_size,
    saved_size: WORD_SIZE, // the $ra slot
    temp_size: WORD_SIZE * scan.temp_peak,
    output_size: scan.output_size,
    total_size: 0,
  };
  let regions = frame.output_size
    + frame.temp_size
    + frame.saved_size
    + frame.local_size
    + frame.input_size;
  frame.total_size = align_to(regions, STACK_ALIGNMENT);

  // Every local keeps its own slot for the whole activation; offsets
  // follow declaration order across nested compounds.
  let mut offset = frame.local_offset();
  for &local in &scan.locals {
    if let Decl::Var(var) = &mut decls[local] {
      var.frame_offset = offset;
      offset += var.size_in_bytes();
    }
  }

  // The first four parameters get slots in the input region, filled
  // from $a0..$a3 by the prologue. Any further parameter is already in
  // the caller's output region, at a positive offset past our frame.
  for (position, &param) in params.iter().enumerate() {
    let slot = if position < 4 {
      frame.input_offset() + WORD_SIZE * position as i32
    } else {
      frame.total_size + WORD_SIZE * position as i32
    };
    if let Decl::Parm(parm) = &mut decls[param] {
      parm.frame_offset = slot;
    }
  }

  let Decl::Fun(fun) = &mut decls[fun_id] else {
    unreachable!("declaration is not a function");
  };
  fun.body = Some(body);
  fun.frame = frame;
}

#[derive(Default)]
struct FrameScan {
  locals: Vec<DeclId>,
  local_size: i32,
  temp_peak: i32,
  output_size: i32,
}

impl FrameScan {
  fn compound(&mut self, decls: &[Decl], comp: &CompoundStmt) {
    for &local in &comp.locals {
      if let Decl::Var(var) = &decls[local] {
        self.local_size += var.size_in_bytes();
      }
      self.locals.push(local);
    }
    for stmt in &comp.body {
      self.stmt(decls, stmt);
    }
  }

  fn stmt(&mut self, decls: &[Decl], stmt: &Stmt) {
    match stmt {
      Stmt::Null => {}
      Stmt::Compound(comp) => self.compound(decls, comp),
      Stmt::Selection {
        cond,
        then_stmt,
        else_stmt,
      } => {
        self.root(cond);
        self.stmt(decls, then_stmt);
        if let Some(else_stmt) = else_stmt {
          self.stmt(decls, else_stmt);
        }
      }
      Stmt::Iteration { cond, body } => {
        self.root(cond);
        self.stmt(decls, body);
      }
      Stmt::Return { expr, .. } => {
        if let Some(expr) = expr {
          self.root(expr);
        }
      }
      Stmt::Expr(expr) => self.root(expr),
    }
  }

  fn root(&mut self, expr: &Expr) {
    let depth = self.depth(expr);
    self.temp_peak = self.temp_peak.max(depth);
  }

  /// Temp slots needed to evaluate an expression under the generator's
  /// spill-everything discipline.
  fn depth(&mut self, expr: &Expr) -> i32 {
    match &expr.kind {
      ExprKind::Number { .. } => 0,
      // A subscript costs only whatever the index expression costs;
      // the base address is folded in with no extra slot.
      ExprKind::Var { index, .. } => index.as_deref().map_or(0, |ix| self.depth(ix)),
      // The left result (an address, for assignments) is spilled while
      // the right side evaluates.
      ExprKind::Binary { lhs, rhs, .. } => self.depth(lhs).max(1 + self.depth(rhs)),
      ExprKind::Call { args, .. } => {
        let argc = args.len() as i32;
        self.output_size = self.output_size.max(WORD_SIZE * argc.max(4));
        // Arguments are staged in the temp region before the copy into
        // the outgoing slots, so evaluating argument i happens while i
        // earlier results are already held.
        let mut need = argc;
        for (i, arg) in args.iter().enumerate() {
          need = need.max(i as i32 + self.depth(arg));
        }
        need
      }
    }
  }
}

fn align_to(n: i32, align: i32) -> i32 {
  ((n + align - 1) / align) * align
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::ast::Program;
  use crate::diagnostics::DiagnosticManager;
  use crate::parser::Parser;
  use crate::scanner::Scanner;
  use crate::semantics::Semantics;
  use crate::source::SourceFile;

  fn analyzed(text: &str) -> Program {
    let source = SourceFile::new("t.cm", text);
    let diagman = DiagnosticManager::new(&source);
    diagman.handler(|_| false);
    let scanner = Scanner::new(&source, &diagman);
    let sema = Semantics::new(&source, &diagman);
    let parser = Parser::new(scanner, sema, &diagman);
    let mut program = parser.parse_program().expect("program should parse");
    assert_eq!(diagman.error_count(), 0, "unexpected diagnostics");
    layout_frames(&mut program);
    program
  }

  fn frame_of(program: &Program, name: &str) -> FrameInfo {
    program
      .decls
      .iter()
      .find_map(|decl| match decl {
        Decl::Fun(fun) if fun.name == name => Some(fun.frame),
        _ => None,
      })
      .expect("function not found")
  }

  #[test]
  fn leaf_function_frame_is_minimal() {
    let program = analyzed("int main(void) { return 0; }");
    let frame = frame_of(&program, "main");
    assert_eq!(frame.input_size, 0);
    assert_eq!(frame.local_size, 0);
    assert_eq!(frame.saved_size, 4);
    assert_eq!(frame.temp_size, 0);
    assert_eq!(frame.output_size, 0);
    assert_eq!(frame.total_size, 8);
  }

  #[test]
  fn local_arrays_take_four_bytes_per_element() {
    let program = analyzed("int main(void) { int a[10]; a[0] = 42; return a[0]; }");
    let frame = frame_of(&program, "main");
    assert_eq!(frame.local_size, 40);
    assert_eq!(frame.temp_size, 4);
    assert_eq!(frame.total_size, 48);
  }

  #[test]
  fn binary_expressions_spill_the_left_operand() {
    let program = analyzed("int x; void f(void) { x = x + 1; }");
    let frame = frame_of(&program, "f");
    // The assignment holds the address while `x + 1` holds one spill.
    assert_eq!(frame.temp_size, 8);
    assert_eq!(frame.total_size, 16);
  }

  #[test]
  fn calls_reserve_the_o32_minimum_output_area() {
    let program = analyzed(
      "int f(int a, int b) { return a + b; }\n\
       int main(void) { return f(1, 2); }",
    );
    let f = frame_of(&program, "f");
    assert_eq!(f.input_size, 8);
    assert_eq!(f.output_size, 0);
    assert_eq!(f.total_size, 16);

    let main = frame_of(&program, "main");
    assert_eq!(main.output_size, 16);
    assert_eq!(main.temp_size, 8);
    assert_eq!(main.total_size, 32);
  }

  #[test]
  fn calls_with_many_arguments_grow_the_output_area() {
    let program = analyzed(
      "int f(int a, int b, int c, int d, int e, int g) { return a + g; }\n\
       int main(void) { return f(1, 2, 3, 4, 5, 6); }",
    );
    let main = frame_of(&program, "main");
    assert_eq!(main.output_size, 24);
    assert_eq!(main.temp_size, 24);
  }

  #[test]
  fn nested_calls_stage_arguments_in_the_temp_region() {
    let program = analyzed(
      "int f(int a, int b) { return a + b; }\n\
       int main(void) { return f(1, f(2, 3)); }",
    );
    let main = frame_of(&program, "main");
    // Outer argument 0 stays spilled while the inner call evaluates.
    assert_eq!(main.temp_size, 12);
  }

  #[test]
  fn parameter_slots_follow_the_input_region() {
    let program = analyzed("int f(int a, int b) { return a + b; }");
    let f = frame_of(&program, "f");
    let offsets: Vec<i32> = program
      .decls
      .iter()
      .filter_map(|decl| match decl {
        Decl::Parm(parm) if parm.name_range.len > 0 => Some(parm.frame_offset),
        _ => None,
      })
      .collect();
    assert_eq!(offsets, vec![f.input_offset(), f.input_offset() + 4]);
  }

  #[test]
  fn locals_get_distinct_slots_across_nested_compounds() {
    let program = analyzed(
      "int main(void) { int a; { int b; b = 1; a = b; } { int c; c = 2; a = c; } return a; }",
    );
    let main = frame_of(&program, "main");
    assert_eq!(main.local_size, 12);
    let mut offsets: Vec<i32> = program
      .decls
      .iter()
      .filter_map(|decl| match decl {
        Decl::Var(var) if var.name != "<error>" => Some(var.frame_offset),
        _ => None,
      })
      .collect();
    offsets.sort();
    offsets.dedup();
    assert_eq!(offsets.len(), 3, "every local keeps its own slot");
  }
}
