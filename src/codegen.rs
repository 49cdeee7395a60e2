//! Code generation: lower the annotated tree into O32 MIPS assembly.
//!
//! The emitter does not allocate registers. Every expression leaves its
//! value in `$v0`; a binary operation spills the left result into the
//! frame's temp region, evaluates the right side, and reloads the left
//! into `$t0`. The frame allocator has already sized the temp region
//! for the deepest expression in the function, so the bump pointer here
//! can never run past it.
//!
//! Calls follow O32: arguments are staged in the temp region (so a
//! nested call cannot clobber an already-evaluated one), then copied
//! into `$a0..$a3` and the outgoing slots at `16($sp)` and up, and the
//! result comes back in `$v0`.

use crate::ast::{
  BinaryOp, CompoundStmt, Decl, DeclId, Expr, ExprKind, ExprType, FunDecl, Program, Stmt, Storage,
};
use crate::frame::{FrameInfo, WORD_SIZE};

/// Emit assembly for a whole program.
pub fn generate(program: &Program) -> String {
  let mut codegen = Codegen {
    program,
    out: String::new(),
    next_label: 0,
    frame: FrameInfo::default(),
    temp_top: 0,
    epilogue: 0,
  };
  codegen.emit_program();
  codegen.out
}

/// Internal label; printed as `L<n>`.
type Label = u32;

struct Codegen<'p> {
  program: &'p Program,
  out: String,
  next_label: Label,
  // Per-function state, reset at every function head.
  frame: FrameInfo,
  temp_top: i32,
  epilogue: Label,
}

impl<'p> Codegen<'p> {
  fn emit_program(&mut self) {
    let program = self.program;

    self.out.push_str("    .data\n");
    for &id in &program.order {
      if let Decl::Var(var) = &program.decls[id] {
        match var.array_size {
          Some(len) => {
            self.out.push_str("    .align 2\n");
            self
              .out
              .push_str(&format!("{}: .space {}\n", var.name, WORD_SIZE * len));
          }
          None => self.out.push_str(&format!("{}: .word 0\n", var.name)),
        }
      }
    }

    self.out.push_str("    .text\n");
    for &id in &program.order {
      if let Decl::Fun(fun) = &program.decls[id]
        && let Some(body) = &fun.body
      {
        self.emit_function(fun, body);
      }
    }
  }

  fn emit_function(&mut self, fun: &'p FunDecl, body: &'p CompoundStmt) {
    self.frame = fun.frame;
    self.temp_top = 0;
    self.epilogue = self.fresh_label();

    self.out.push_str(&format!("    .globl {}\n", fun.name));
    self.out.push_str(&format!("{}:\n", fun.name));
    self
      .out
      .push_str(&format!("    subu $sp, $sp, {}\n", self.frame.total_size));
    self
      .out
      .push_str(&format!("    sw $ra, {}($sp)\n", self.frame.saved_offset()));
    for position in 0..fun.params.len().min(4) {
      let slot = self.frame.input_offset() + WORD_SIZE * position as i32;
      self
        .out
        .push_str(&format!("    sw $a{position}, {slot}($sp)\n"));
    }

    self.emit_compound(body);

    self.define_label(self.epilogue);
    self
      .out
      .push_str(&format!("    lw $ra, {}($sp)\n", self.frame.saved_offset()));
    self
      .out
      .push_str(&format!("    addu $sp, $sp, {}\n", self.frame.total_size));
    self.out.push_str("    jr $ra\n");
  }

  // ----- Statements -----

  fn emit_compound(&mut self, comp: &'p CompoundStmt) {
    for stmt in &comp.body {
      self.emit_stmt(stmt);
    }
  }

  fn emit_stmt(&mut self, stmt: &'p Stmt) {
    match stmt {
      Stmt::Null => {}
      Stmt::Compound(comp) => self.emit_compound(comp),
      Stmt::Selection {
        cond,
        then_stmt,
        else_stmt,
      } => {
        let else_label = self.fresh_label();
        let end_label = self.fresh_label();
        self.emit_expr(cond);
        self.out.push_str(&format!("    beqz $v0, L{else_label}\n"));
        self.emit_stmt(then_stmt);
        self.out.push_str(&format!("    j L{end_label}\n"));
        self.define_label(else_label);
        if let Some(else_stmt) = else_stmt {
          self.emit_stmt(else_stmt);
        }
        self.define_label(end_label);
      }
      Stmt::Iteration { cond, body } => {
        let top_label = self.fresh_label();
        let end_label = self.fresh_label();
        self.define_label(top_label);
        self.emit_expr(cond);
        self.out.push_str(&format!("    beqz $v0, L{end_label}\n"));
        self.emit_stmt(body);
        self.out.push_str(&format!("    j L{top_label}\n"));
        self.define_label(end_label);
      }
      Stmt::Return { expr, .. } => {
        if let Some(expr) = expr {
          self.emit_expr(expr);
        }
        self.out.push_str(&format!("    j L{}\n", self.epilogue));
      }
      Stmt::Expr(expr) => self.emit_expr(expr),
    }
  }

  // ----- Expressions -----

  /// Emits an expression, leaving its value in `$v0`. A whole-array
  /// reference leaves the array's base address instead.
  fn emit_expr(&mut self, expr: &'p Expr) {
    match &expr.kind {
      ExprKind::Number { value } => {
        self.out.push_str(&format!("    li $v0, {value}\n"));
      }

      ExprKind::Var { decl, index } => {
        self.emit_var_address(*decl, index.as_deref());
        if expr.ty == ExprType::Int {
          self.out.push_str("    lw $v0, 0($v0)\n");
        }
      }

      ExprKind::Binary {
        op: BinaryOp::Assign,
        lhs,
        rhs,
      } => {
        let ExprKind::Var { decl, index } = &lhs.kind else {
          unreachable!("assignment target is always a variable reference");
        };
        self.emit_var_address(*decl, index.as_deref());
        let slot = self.alloc_temp();
        self.out.push_str(&format!("    sw $v0, {slot}($sp)\n"));
        self.emit_expr(rhs);
        self.out.push_str(&format!("    lw $t0, {slot}($sp)\n"));
        self.free_temps(1);
        self.out.push_str("    sw $v0, 0($t0)\n");
      }

      ExprKind::Binary { op, lhs, rhs } => {
        self.emit_expr(lhs);
        let slot = self.alloc_temp();
        self.out.push_str(&format!("    sw $v0, {slot}($sp)\n"));
        self.emit_expr(rhs);
        self.out.push_str(&format!("    lw $t0, {slot}($sp)\n"));
        self.free_temps(1);
        self.emit_binary_op(*op);
      }

      ExprKind::Call { decl, args } => {
        let mut slots = Vec::with_capacity(args.len());
        for arg in args {
          self.emit_expr(arg);
          let slot = self.alloc_temp();
          self.out.push_str(&format!("    sw $v0, {slot}($sp)\n"));
          slots.push(slot);
        }
        for (position, slot) in slots.iter().enumerate() {
          if position < 4 {
            self
              .out
              .push_str(&format!("    lw $a{position}, {slot}($sp)\n"));
          } else {
            let outgoing = WORD_SIZE * position as i32;
            self.out.push_str(&format!("    lw $v0, {slot}($sp)\n"));
            self.out.push_str(&format!("    sw $v0, {outgoing}($sp)\n"));
          }
        }
        self.free_temps(slots.len() as i32);
        self
          .out
          .push_str(&format!("    jal {}\n", self.program.decls[*decl].name()));
      }
    }
  }

  /// Emits the operation for a non-assignment binary expression with
  /// the left operand in `$t0` and the right in `$v0`. Relational
  /// operators materialize 0 or 1 into `$v0`.
  fn emit_binary_op(&mut self, op: BinaryOp) {
    let lines: &[&str] = match op {
      BinaryOp::Plus => &["    addu $v0, $t0, $v0\n"],
      BinaryOp::Minus => &["    subu $v0, $t0, $v0\n"],
      BinaryOp::Multiply => &["    mult $t0, $v0\n", "    mflo $v0\n"],
      BinaryOp::Divide => &["    div $t0, $v0\n", "    mflo $v0\n"],
      BinaryOp::Less => &["    slt $v0, $t0, $v0\n"],
      BinaryOp::Greater => &["    slt $v0, $v0, $t0\n"],
      BinaryOp::LessEqual => &["    slt $v0, $v0, $t0\n", "    xori $v0, $v0, 1\n"],
      BinaryOp::GreaterEqual => &["    slt $v0, $t0, $v0\n", "    xori $v0, $v0, 1\n"],
      BinaryOp::Equal => &["    xor $v0, $t0, $v0\n", "    sltiu $v0, $v0, 1\n"],
      BinaryOp::NotEqual => &["    xor $v0, $t0, $v0\n", "    sltu $v0, $zero, $v0\n"],
      BinaryOp::Assign => unreachable!("assignment is emitted separately"),
    };
    for line in lines {
      self.out.push_str(line);
    }
  }

  /// Computes `$v0 = base + index * 4` for a variable reference.
  fn emit_var_address(&mut self, decl: DeclId, index: Option<&'p Expr>) {
    match index {
      None => self.emit_base_address(decl, "$v0"),
      Some(subscript) => {
        self.emit_expr(subscript);
        self.out.push_str("    sll $v0, $v0, 2\n");
        self.emit_base_address(decl, "$t0");
        self.out.push_str("    addu $v0, $t0, $v0\n");
      }
    }
  }

  fn emit_base_address(&mut self, decl: DeclId, reg: &str) {
    match &self.program.decls[decl] {
      Decl::Var(var) => match var.storage {
        Storage::Global => self.out.push_str(&format!("    la {reg}, {}\n", var.name)),
        Storage::Local => self
          .out
          .push_str(&format!("    addiu {reg}, $sp, {}\n", var.frame_offset)),
      },
      Decl::Parm(parm) => {
        if parm.is_array {
          // The parameter slot holds a pointer to the caller's array.
          self
            .out
            .push_str(&format!("    lw {reg}, {}($sp)\n", parm.frame_offset));
        } else {
          self
            .out
            .push_str(&format!("    addiu {reg}, $sp, {}\n", parm.frame_offset));
        }
      }
      Decl::Fun(_) => unreachable!("variable reference resolves to a function"),
    }
  }

  // ----- Temp region bump allocator -----

  fn alloc_temp(&mut self) -> i32 {
    let slot = self.frame.temp_offset() + WORD_SIZE * self.temp_top;
    self.temp_top += 1;
    debug_assert!(
      WORD_SIZE * self.temp_top <= self.frame.temp_size,
      "temp region overflow"
    );
    slot
  }

  fn free_temps(&mut self, count: i32) {
    debug_assert!(self.temp_top >= count);
    self.temp_top -= count;
  }

  // ----- Labels -----

  fn fresh_label(&mut self) -> Label {
    let label = self.next_label;
    self.next_label += 1;
    label
  }

  fn define_label(&mut self, label: Label) {
    self.out.push_str(&format!("L{label}:\n"));
  }
}
