//! Context-sensitive analysis: name resolution, type checking, and AST
//! building.
//!
//! The parser drives this module through `act_on_*` callbacks, one per
//! grammar reduction. Each action builds the corresponding node, checks
//! it against the typing rules, and hands it back so the parser can
//! thread it into the parent reduction. Semantic mistakes are reported
//! to the diagnostic bus but never abort the parse; an `Error`-typed
//! expression propagates silently so one mistake produces one
//! diagnostic.
//!
//! Name lookup walks a stack of scopes. Function parameters and the
//! function body form a single lexical region, so the `FunBody` kind is
//! transparent: it neither pushes nor pops, and locals of the outermost
//! body block land in the same scope as the parameters.

use crate::ast::{
  BinaryOp, CompoundStmt, Decl, DeclId, Expr, ExprKind, ExprType, FunDecl, ParmDecl, Program,
  Stmt, Storage, VarDecl,
};
use crate::diagnostics::{Diag, DiagnosticManager};
use crate::frame::FrameInfo;
use crate::scanner::{Category, Word};
use crate::source::{SourceFile, SourceRange};
use std::collections::HashMap;

/// Lexical region kinds tracked by the scope stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
  Global,
  FunParams,
  FunBody,
  Compound,
}

struct Scope<'a> {
  kind: ScopeKind,
  symbols: HashMap<&'a str, DeclId>,
}

impl<'a> Scope<'a> {
  fn new(kind: ScopeKind) -> Self {
    Self {
      kind,
      symbols: HashMap::new(),
    }
  }
}

/// The semantic analyzer. Owns the declaration arena while the tree is
/// being built; `act_on_program_end` releases the finished `Program`.
pub struct Semantics<'a> {
  source: &'a SourceFile,
  diagman: &'a DiagnosticManager<'a>,
  decls: Vec<Decl>,
  order: Vec<DeclId>,
  scopes: Vec<Scope<'a>>,
  current_fun: Option<DeclId>,
  /// Poison slot that error-typed references point at, so a failed
  /// lookup still yields a structurally ordinary node.
  error_decl: DeclId,
}

impl<'a> Semantics<'a> {
  pub fn new(source: &'a SourceFile, diagman: &'a DiagnosticManager<'a>) -> Self {
    let decls = vec![Decl::Var(VarDecl {
      name: "<error>".into(),
      name_range: SourceRange::empty(),
      array_size: None,
      storage: Storage::Local,
      frame_offset: 0,
    })];
    Self {
      source,
      diagman,
      decls,
      order: Vec::new(),
      scopes: vec![Scope::new(ScopeKind::Global)],
      current_fun: None,
      error_decl: 0,
    }
  }

  // ----- Scope management -----

  pub fn enter_scope(&mut self, kind: ScopeKind) {
    if kind == ScopeKind::FunBody {
      return;
    }
    self.scopes.push(Scope::new(kind));
  }

  pub fn leave_scope(&mut self, kind: ScopeKind) {
    if kind == ScopeKind::FunBody {
      return;
    }
    debug_assert_eq!(self.scopes.last().map(|scope| scope.kind), Some(kind));
    self.scopes.pop();
  }

  fn lookup(&self, name: &str) -> Option<DeclId> {
    self
      .scopes
      .iter()
      .rev()
      .find_map(|scope| scope.symbols.get(name).copied())
  }

  /// Inserts a declaration into the current scope. A name that already
  /// exists in the same scope is a redefinition; the first declaration
  /// stays visible.
  fn declare(&mut self, name: Word, id: DeclId) {
    let key = self.source.range_text(name.lexeme);
    let scope = self
      .scopes
      .last_mut()
      .expect("the scope stack always holds the global scope");
    if scope.symbols.contains_key(key) {
      self
        .diagman
        .report(name.location(), Diag::SemaRedefinition)
        .arg(name.lexeme)
        .range(name.lexeme);
      return;
    }
    scope.symbols.insert(key, id);
  }

  fn fun_mut(&mut self, id: DeclId) -> &mut FunDecl {
    match &mut self.decls[id] {
      Decl::Fun(fun) => fun,
      _ => unreachable!("declaration is not a function"),
    }
  }

  // ----- Program actions -----

  /// Acts once the parser begins. Installs the runtime builtins
  /// `int input(void)` and `void output(int)` in the global scope.
  pub fn act_on_program_start(&mut self) {
    let input_id = self.decls.len();
    self.decls.push(Decl::Fun(FunDecl {
      return_type: ExprType::Int,
      name: "input".into(),
      name_range: SourceRange::empty(),
      params: Vec::new(),
      body: None,
      frame: FrameInfo::default(),
    }));
    self.insert_builtin("input", input_id);

    let parm_id = self.decls.len();
    self.decls.push(Decl::Parm(ParmDecl {
      name: "value".into(),
      name_range: SourceRange::empty(),
      is_array: false,
      position: 0,
      frame_offset: 0,
    }));
    let output_id = self.decls.len();
    self.decls.push(Decl::Fun(FunDecl {
      return_type: ExprType::Void,
      name: "output".into(),
      name_range: SourceRange::empty(),
      params: vec![parm_id],
      body: None,
      frame: FrameInfo::default(),
    }));
    self.insert_builtin("output", output_id);
  }

  fn insert_builtin(&mut self, name: &'a str, id: DeclId) {
    let scope = self
      .scopes
      .last_mut()
      .expect("the scope stack always holds the global scope");
    scope.symbols.insert(name, id);
  }

  /// Acts once the parser finishes, releasing the finished tree.
  pub fn act_on_program_end(self) -> Program {
    Program {
      decls: self.decls,
      order: self.order,
    }
  }

  /// Acts on a program-level declaration.
  pub fn act_on_top_level_decl(&mut self, decl: DeclId) {
    self.order.push(decl);
  }

  // ----- Declaration actions -----

  /// Acts on the declaration of a new variable, global or local.
  pub fn act_on_var_decl(
    &mut self,
    type_word: Word,
    name: Word,
    array_size: Option<Expr>,
  ) -> DeclId {
    if type_word.category == Category::Void {
      self
        .diagman
        .report(type_word.location(), Diag::SemaVarCannotBeVoid)
        .range(type_word.lexeme);
    }

    let array_size = array_size.map(|size| match size.kind {
      ExprKind::Number { value } => value,
      _ => unreachable!("array size is always a number literal"),
    });

    let storage = if self.current_fun.is_some() {
      Storage::Local
    } else {
      Storage::Global
    };

    let id = self.decls.len();
    self.decls.push(Decl::Var(VarDecl {
      name: self.source.range_text(name.lexeme).into(),
      name_range: name.lexeme,
      array_size,
      storage,
      frame_offset: 0,
    }));
    self.declare(name, id);
    id
  }

  /// Acts on the declaration of a function parameter.
  pub fn act_on_param_decl(&mut self, type_word: Word, name: Word, is_array: bool) -> DeclId {
    if type_word.category == Category::Void {
      self
        .diagman
        .report(type_word.location(), Diag::SemaVarCannotBeVoid)
        .range(type_word.lexeme);
    }

    let fun_id = self
      .current_fun
      .expect("parameters are only declared inside a function header");
    let position = self.fun_mut(fun_id).params.len();

    let id = self.decls.len();
    self.decls.push(Decl::Parm(ParmDecl {
      name: self.source.range_text(name.lexeme).into(),
      name_range: name.lexeme,
      is_array,
      position,
      frame_offset: 0,
    }));
    self.fun_mut(fun_id).params.push(id);
    self.declare(name, id);
    id
  }

  /// Acts on a function header, before its parameters are parsed. The
  /// declaration is visible from here on, so the body may recurse.
  pub fn act_on_fun_decl_start(&mut self, ret_type: Word, name: Word) -> DeclId {
    let return_type = match ret_type.category {
      Category::Void => ExprType::Void,
      _ => ExprType::Int,
    };

    let id = self.decls.len();
    self.decls.push(Decl::Fun(FunDecl {
      return_type,
      name: self.source.range_text(name.lexeme).into(),
      name_range: name.lexeme,
      params: Vec::new(),
      body: None,
      frame: FrameInfo::default(),
    }));
    self.declare(name, id);
    self.current_fun = Some(id);
    id
  }

  /// Acts once the function body has been parsed.
  pub fn act_on_fun_decl_end(&mut self, fun: DeclId, body: CompoundStmt) -> DeclId {
    self.fun_mut(fun).body = Some(body);
    self.current_fun = None;
    fun
  }

  // ----- Statement actions -----

  pub fn act_on_compound_stmt(&mut self, locals: Vec<DeclId>, body: Vec<Stmt>) -> CompoundStmt {
    CompoundStmt { locals, body }
  }

  pub fn act_on_null_stmt(&mut self) -> Stmt {
    Stmt::Null
  }

  pub fn act_on_expr_stmt(&mut self, expr: Expr) -> Stmt {
    Stmt::Expr(expr)
  }

  pub fn act_on_selection_stmt(
    &mut self,
    cond: Expr,
    then_stmt: Stmt,
    else_stmt: Option<Stmt>,
  ) -> Stmt {
    Stmt::Selection {
      cond,
      then_stmt: Box::new(then_stmt),
      else_stmt: else_stmt.map(Box::new),
    }
  }

  pub fn act_on_iteration_stmt(&mut self, cond: Expr, body: Stmt) -> Stmt {
    Stmt::Iteration {
      cond,
      body: Box::new(body),
    }
  }

  /// Acts on a return statement, checking it against the enclosing
  /// function's return type.
  pub fn act_on_return_stmt(&mut self, expr: Option<Expr>, keyword: Word) -> Stmt {
    let fun_id = self
      .current_fun
      .expect("return statements only occur inside function bodies");
    let (return_type, name_range) = match &self.decls[fun_id] {
      Decl::Fun(fun) => (fun.return_type, fun.name_range),
      _ => unreachable!("declaration is not a function"),
    };

    let mismatch = match (&expr, return_type) {
      (None, ExprType::Int) => true,
      (Some(_), ExprType::Void) => true,
      (Some(value), ExprType::Int) => value.ty != ExprType::Int && value.ty != ExprType::Error,
      _ => false,
    };
    if mismatch {
      self
        .diagman
        .report(keyword.location(), Diag::SemaReturnTypeMismatch)
        .arg(name_range)
        .range(keyword.lexeme);
    }

    Stmt::Return {
      expr,
      keyword: keyword.lexeme,
    }
  }

  // ----- Expression actions -----

  /// Acts on an assignment. Both sides must be plain `int`; the parser
  /// has already ensured the left side is a variable reference.
  pub fn act_on_assign(&mut self, lhs: Expr, rhs: Expr, op_word: Word) -> Expr {
    debug_assert!(lhs.is_var_ref());
    self.build_binary(BinaryOp::Assign, lhs, rhs, op_word)
  }

  /// Acts on an arithmetic or relational expression.
  pub fn act_on_binary_expr(&mut self, lhs: Expr, rhs: Expr, op_word: Word) -> Expr {
    let op = BinaryOp::from_category(op_word.category);
    self.build_binary(op, lhs, rhs, op_word)
  }

  fn build_binary(&mut self, op: BinaryOp, lhs: Expr, rhs: Expr, op_word: Word) -> Expr {
    let ty = if lhs.ty == ExprType::Error || rhs.ty == ExprType::Error {
      ExprType::Error
    } else if lhs.ty == ExprType::Int && rhs.ty == ExprType::Int {
      ExprType::Int
    } else {
      self
        .diagman
        .report(op_word.location(), Diag::SemaInvalidOperands)
        .arg(op_word.category)
        .range(lhs.range)
        .range(rhs.range);
      ExprType::Error
    };

    let range = SourceRange::through(lhs.range, rhs.range);
    Expr {
      kind: ExprKind::Binary {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
      },
      ty,
      range,
    }
  }

  /// Acts on a number literal. Out-of-range literals are reported and
  /// clamped to the 32-bit signed maximum.
  pub fn act_on_number(&mut self, word: Word) -> Expr {
    let text = self.source.range_text(word.lexeme);
    let value = match text.parse::<i32>() {
      Ok(value) => value,
      Err(_) => {
        self
          .diagman
          .report(word.location(), Diag::ParserNumberTooBig)
          .range(word.lexeme);
        i32::MAX
      }
    };
    Expr {
      kind: ExprKind::Number { value },
      ty: ExprType::Int,
      range: word.lexeme,
    }
  }

  /// Acts on a variable reference, subscripted or not.
  pub fn act_on_var(&mut self, name: Word, index: Option<Expr>) -> Expr {
    let range = name.lexeme;
    let text = self.source.range_text(range);

    let Some(decl_id) = self.lookup(text) else {
      self
        .diagman
        .report(name.location(), Diag::SemaUndeclaredIdentifier)
        .arg(range)
        .range(range);
      return self.error_var(index, range);
    };

    let is_array = match &self.decls[decl_id] {
      Decl::Var(var) => var.is_array(),
      Decl::Parm(parm) => parm.is_array,
      Decl::Fun(_) => {
        self
          .diagman
          .report(name.location(), Diag::SemaVarIsNotAVar)
          .range(range);
        return self.error_var(index, range);
      }
    };

    let ty = match &index {
      Some(subscript) => {
        if !is_array {
          self
            .diagman
            .report(name.location(), Diag::SemaSubscriptedScalar)
            .range(range);
          ExprType::Error
        } else if subscript.ty == ExprType::Error {
          ExprType::Error
        } else if subscript.ty != ExprType::Int {
          self
            .diagman
            .report(subscript.range.start, Diag::SemaIndexNotInt)
            .range(subscript.range);
          ExprType::Error
        } else {
          ExprType::Int
        }
      }
      None if is_array => ExprType::IntArray,
      None => ExprType::Int,
    };

    Expr {
      kind: ExprKind::Var {
        decl: decl_id,
        index: index.map(Box::new),
      },
      ty,
      range,
    }
  }

  /// Acts on a function call, checking arity and argument types.
  pub fn act_on_call(&mut self, name: Word, args: Vec<Expr>, rparen: Word) -> Expr {
    let range = SourceRange::through(name.lexeme, rparen.lexeme);
    let text = self.source.range_text(name.lexeme);

    let Some(decl_id) = self.lookup(text) else {
      self
        .diagman
        .report(name.location(), Diag::SemaUndeclaredIdentifier)
        .arg(name.lexeme)
        .range(name.lexeme);
      return self.error_call(args, range);
    };

    let Decl::Fun(fun) = &self.decls[decl_id] else {
      self
        .diagman
        .report(name.location(), Diag::SemaFunIsNotAFun)
        .range(name.lexeme);
      return self.error_call(args, range);
    };
    let return_type = fun.return_type;
    let param_shapes: Vec<bool> = fun
      .params
      .iter()
      .map(|&param| match &self.decls[param] {
        Decl::Parm(parm) => parm.is_array,
        _ => unreachable!("function parameter is not a parameter declaration"),
      })
      .collect();

    if args.len() != param_shapes.len() {
      self
        .diagman
        .report(name.location(), Diag::SemaWrongArgumentCount)
        .arg(name.lexeme)
        .range(range);
    } else {
      for (arg, &parm_is_array) in args.iter().zip(&param_shapes) {
        if arg.ty == ExprType::Error {
          continue;
        }
        let expected = if parm_is_array {
          ExprType::IntArray
        } else {
          ExprType::Int
        };
        if arg.ty != expected {
          self
            .diagman
            .report(arg.range.start, Diag::SemaIncompatibleArgument)
            .arg(name.lexeme)
            .range(arg.range);
        }
      }
    }

    Expr {
      kind: ExprKind::Call {
        decl: decl_id,
        args,
      },
      ty: return_type,
      range,
    }
  }

  fn error_var(&self, index: Option<Expr>, range: SourceRange) -> Expr {
    Expr {
      kind: ExprKind::Var {
        decl: self.error_decl,
        index: index.map(Box::new),
      },
      ty: ExprType::Error,
      range,
    }
  }

  fn error_call(&self, args: Vec<Expr>, range: SourceRange) -> Expr {
    Expr {
      kind: ExprKind::Call {
        decl: self.error_decl,
        args,
      },
      ty: ExprType::Error,
      range,
    }
  }
}
