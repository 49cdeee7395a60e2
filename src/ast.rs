//! The abstract syntax tree produced by the semantic analyzer.
//!
//! Declarations live in one arena owned by `Program`; uses point back
//! at their declaration through a plain `DeclId` index, so the tree
//! itself stays acyclic and uniquely owned. Statements and expressions
//! are ordinary sum types with boxed children, built bottom-up and
//! handed to their parent at each grammar reduction.
//!
//! Passes walk the tree by pattern matching. The read-only walk is
//! `Program::dump`, which prints the labeled bracket notation used by
//! the `--dump-ast` driver mode; the code-emitting walk lives in
//! `codegen`.

use crate::frame::FrameInfo;
use crate::scanner::Category;
use crate::source::SourceRange;

/// Index of a declaration inside the program arena.
pub type DeclId = usize;

/// Type of an expression after semantic analysis. `Error` propagates
/// through enclosing expressions but never reaches code generation:
/// the pipeline gates on the diagnostic count first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExprType {
  Void,
  Int,
  IntArray,
  Error,
}

/// Where a variable lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Storage {
  Global,
  Local,
}

#[derive(Debug)]
pub struct VarDecl {
  pub name: String,
  pub name_range: SourceRange,
  pub array_size: Option<i32>,
  pub storage: Storage,
  /// `$sp`-relative offset assigned by the frame allocator. Meaningful
  /// for locals only.
  pub frame_offset: i32,
}

impl VarDecl {
  pub fn is_array(&self) -> bool {
    self.array_size.is_some()
  }

  pub fn size_in_bytes(&self) -> i32 {
    4 * self.array_size.unwrap_or(1)
  }
}

#[derive(Debug)]
pub struct ParmDecl {
  pub name: String,
  pub name_range: SourceRange,
  pub is_array: bool,
  /// Zero-based position in the parameter list.
  pub position: usize,
  /// `$sp`-relative offset assigned by the frame allocator.
  pub frame_offset: i32,
}

#[derive(Debug)]
pub struct FunDecl {
  /// `ExprType::Int` or `ExprType::Void`.
  pub return_type: ExprType,
  pub name: String,
  pub name_range: SourceRange,
  pub params: Vec<DeclId>,
  /// `None` for the `input`/`output` builtins, which are external
  /// symbols provided by the runtime.
  pub body: Option<CompoundStmt>,
  pub frame: FrameInfo,
}

#[derive(Debug)]
pub enum Decl {
  Var(VarDecl),
  Parm(ParmDecl),
  Fun(FunDecl),
}

impl Decl {
  pub fn name(&self) -> &str {
    match self {
      Decl::Var(var) => &var.name,
      Decl::Parm(parm) => &parm.name,
      Decl::Fun(fun) => &fun.name,
    }
  }
}

#[derive(Debug)]
pub struct CompoundStmt {
  pub locals: Vec<DeclId>,
  pub body: Vec<Stmt>,
}

#[derive(Debug)]
pub enum Stmt {
  Null,
  Compound(CompoundStmt),
  Selection {
    cond: Expr,
    then_stmt: Box<Stmt>,
    else_stmt: Option<Box<Stmt>>,
  },
  Iteration {
    cond: Expr,
    body: Box<Stmt>,
  },
  Return {
    expr: Option<Expr>,
    keyword: SourceRange,
  },
  Expr(Expr),
}

/// Binary operators, assignment included.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
  Assign,
  Plus,
  Minus,
  Multiply,
  Divide,
  Less,
  LessEqual,
  Greater,
  GreaterEqual,
  Equal,
  NotEqual,
}

impl BinaryOp {
  /// Converts an operator word category into an operation.
  pub fn from_category(category: Category) -> Self {
    match category {
      Category::Assign => BinaryOp::Assign,
      Category::Plus => BinaryOp::Plus,
      Category::Minus => BinaryOp::Minus,
      Category::Multiply => BinaryOp::Multiply,
      Category::Divide => BinaryOp::Divide,
      Category::Less => BinaryOp::Less,
      Category::LessEqual => BinaryOp::LessEqual,
      Category::Greater => BinaryOp::Greater,
      Category::GreaterEqual => BinaryOp::GreaterEqual,
      Category::Equal => BinaryOp::Equal,
      Category::NotEqual => BinaryOp::NotEqual,
      _ => unreachable!("word category is not an operator"),
    }
  }

  pub fn spelling(self) -> &'static str {
    match self {
      BinaryOp::Assign => "=",
      BinaryOp::Plus => "+",
      BinaryOp::Minus => "-",
      BinaryOp::Multiply => "*",
      BinaryOp::Divide => "/",
      BinaryOp::Less => "<",
      BinaryOp::LessEqual => "<=",
      BinaryOp::Greater => ">",
      BinaryOp::GreaterEqual => ">=",
      BinaryOp::Equal => "==",
      BinaryOp::NotEqual => "!=",
    }
  }
}

#[derive(Debug)]
pub struct Expr {
  pub kind: ExprKind,
  pub ty: ExprType,
  pub range: SourceRange,
}

#[derive(Debug)]
pub enum ExprKind {
  Number {
    value: i32,
  },
  Var {
    decl: DeclId,
    index: Option<Box<Expr>>,
  },
  Call {
    decl: DeclId,
    args: Vec<Expr>,
  },
  Binary {
    op: BinaryOp,
    lhs: Box<Expr>,
    rhs: Box<Expr>,
  },
}

impl Expr {
  /// Whether this expression is a variable reference, the only shape
  /// that may appear on the left of an assignment.
  pub fn is_var_ref(&self) -> bool {
    matches!(self.kind, ExprKind::Var { .. })
  }
}

/// The whole translation unit: the declaration arena plus the order of
/// top-level declarations.
#[derive(Debug)]
pub struct Program {
  pub decls: Vec<Decl>,
  pub order: Vec<DeclId>,
}

impl Program {
  /// Dumps the program in labeled bracket notation.
  pub fn dump(&self) -> String {
    let mut dest = String::new();
    newline(&mut dest, 0);
    dest.push_str("[program ");
    for &id in &self.order {
      self.dump_decl(id, &mut dest, 1);
    }
    newline(&mut dest, 0);
    dest.push(']');
    dest
  }

  fn dump_decl(&self, id: DeclId, dest: &mut String, depth: usize) {
    match &self.decls[id] {
      Decl::Var(var) => {
        newline(dest, depth);
        dest.push_str("[var-declaration [int] [");
        dest.push_str(&var.name);
        dest.push(']');
        if let Some(size) = var.array_size {
          dest.push_str(&format!(" [{size}]"));
        }
        dest.push(']');
      }
      Decl::Parm(parm) => {
        newline(dest, depth);
        dest.push_str("[param [int] [");
        dest.push_str(&parm.name);
        dest.push(']');
        if parm.is_array {
          dest.push_str(" [\\[\\]]");
        }
        dest.push(']');
      }
      Decl::Fun(fun) => {
        newline(dest, depth);
        dest.push_str("[fun-declaration ");
        newline(dest, depth + 1);
        dest.push_str(match fun.return_type {
          ExprType::Void => "[void]",
          _ => "[int]",
        });
        newline(dest, depth + 1);
        dest.push_str(&format!("[{}]", fun.name));
        newline(dest, depth + 1);
        dest.push_str("[params");
        for &param in &fun.params {
          dest.push(' ');
          self.dump_decl(param, dest, depth + 2);
        }
        dest.push(']');
        if let Some(body) = &fun.body {
          self.dump_compound(body, dest, depth + 1);
        }
        newline(dest, depth);
        dest.push(']');
      }
    }
  }

  fn dump_compound(&self, comp: &CompoundStmt, dest: &mut String, depth: usize) {
    newline(dest, depth);
    dest.push_str("[compound-stmt ");
    for &local in &comp.locals {
      self.dump_decl(local, dest, depth + 1);
    }
    for stmt in &comp.body {
      self.dump_stmt(stmt, dest, depth + 1);
    }
    newline(dest, depth);
    dest.push(']');
  }

  fn dump_stmt(&self, stmt: &Stmt, dest: &mut String, depth: usize) {
    match stmt {
      Stmt::Null => {
        newline(dest, depth);
        dest.push_str("[;]");
      }
      Stmt::Compound(comp) => self.dump_compound(comp, dest, depth),
      Stmt::Selection {
        cond,
        then_stmt,
        else_stmt,
      } => {
        newline(dest, depth);
        dest.push_str("[selection-stmt ");
        self.dump_expr(cond, dest, depth + 1);
        self.dump_stmt(then_stmt, dest, depth + 1);
        if let Some(else_stmt) = else_stmt {
          self.dump_stmt(else_stmt, dest, depth + 1);
        }
        newline(dest, depth);
        dest.push(']');
      }
      Stmt::Iteration { cond, body } => {
        newline(dest, depth);
        dest.push_str("[iteration-stmt ");
        self.dump_expr(cond, dest, depth + 1);
        self.dump_stmt(body, dest, depth + 1);
        newline(dest, depth);
        dest.push(']');
      }
      Stmt::Return { expr, .. } => {
        newline(dest, depth);
        dest.push_str("[return-stmt");
        if let Some(expr) = expr {
          dest.push(' ');
          self.dump_expr(expr, dest, depth + 1);
        }
        dest.push(']');
      }
      Stmt::Expr(expr) => self.dump_expr(expr, dest, depth),
    }
  }

  fn dump_expr(&self, expr: &Expr, dest: &mut String, depth: usize) {
    match &expr.kind {
      ExprKind::Number { value } => {
        dest.push_str(&format!("[{value}]"));
      }
      ExprKind::Var { decl, index } => {
        dest.push_str("[var [");
        dest.push_str(self.decls[*decl].name());
        dest.push(']');
        if let Some(index) = index {
          dest.push(' ');
          self.dump_expr(index, dest, depth + 1);
        }
        dest.push(']');
      }
      ExprKind::Call { decl, args } => {
        newline(dest, depth);
        dest.push_str("[call");
        newline(dest, depth + 1);
        dest.push_str(&format!("[{}]", self.decls[*decl].name()));
        newline(dest, depth + 1);
        dest.push_str("[args");
        for arg in args {
          dest.push(' ');
          self.dump_expr(arg, dest, depth + 2);
        }
        dest.push(']');
        newline(dest, depth);
        dest.push(']');
      }
      ExprKind::Binary { op, lhs, rhs } => {
        newline(dest, depth);
        dest.push('[');
        dest.push_str(op.spelling());
        dest.push(' ');
        self.dump_expr(lhs, dest, depth + 1);
        dest.push(' ');
        self.dump_expr(rhs, dest, depth + 1);
        dest.push(']');
      }
    }
  }
}

fn newline(dest: &mut String, depth: usize) {
  if !dest.is_empty() {
    dest.push('\n');
  }
  for _ in 0..2 * depth {
    dest.push(' ');
  }
}
