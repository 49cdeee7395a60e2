//! Recursive-descent parser over the word stream.
//!
//! Three words of lookahead are enough for linear-time predictive
//! parsing of C-: declarations are told apart from definitions by the
//! third word, the `( void )` parameter form by the second, and calls
//! from variable references by the one after the identifier. The
//! lookahead lives in a small circular buffer refilled from the scanner
//! on demand.
//!
//! The parser owns no syntax tree of its own: every reduction is handed
//! to the semantic analyzer, which builds and checks the node. On the
//! first unexpected word the parser reports the appropriate
//! `expected_*` diagnostic and unwinds with the syntax-error sentinel;
//! no recovery is attempted.
//!
//! The complete grammar is listed at the bottom of this file.

use crate::ast::{CompoundStmt, DeclId, Expr, Program, Stmt};
use crate::diagnostics::{Diag, DiagnosticManager};
use crate::error::{CompileResult, SyntaxSnafu};
use crate::scanner::{Category, Scanner, Word};
use crate::semantics::{ScopeKind, Semantics};

const LOOKAHEAD: usize = 3;

const RELOPS: [Category; 6] = [
  Category::LessEqual,
  Category::Less,
  Category::Greater,
  Category::GreaterEqual,
  Category::Equal,
  Category::NotEqual,
];

/// The parser consumes a stream of words and drives the semantic
/// analyzer, which spits out the abstract syntax tree of the program.
pub struct Parser<'a> {
  scanner: Scanner<'a>,
  sema: Semantics<'a>,
  diagman: &'a DiagnosticManager<'a>,
  /// Circular lookahead buffer; `words[head]` is the next word.
  words: [Word; LOOKAHEAD],
  head: usize,
}

impl<'a> Parser<'a> {
  pub fn new(
    mut scanner: Scanner<'a>,
    sema: Semantics<'a>,
    diagman: &'a DiagnosticManager<'a>,
  ) -> Self {
    let words = [
      scanner.next_word(),
      scanner.next_word(),
      scanner.next_word(),
    ];
    Self {
      scanner,
      sema,
      diagman,
      words,
      head: 0,
    }
  }

  // ----- Word stream helpers -----

  /// Looks ahead in the stream by `n` words; `lookahead(0)` is the
  /// next word to be consumed.
  fn lookahead(&self, n: usize) -> Word {
    debug_assert!(n < LOOKAHEAD);
    self.words[(self.head + n) % LOOKAHEAD]
  }

  fn peek(&self) -> Word {
    self.lookahead(0)
  }

  /// Takes the next word from the stream regardless of its category.
  fn consume(&mut self) -> Word {
    let ate = self.words[self.head];
    self.words[self.head] = self.scanner.next_word();
    self.head = (self.head + 1) % LOOKAHEAD;
    ate
  }

  /// Consumes the next word if its category is any of the given ones.
  fn try_consume(&mut self, categories: &[Category]) -> Option<Word> {
    if categories.contains(&self.peek().category) {
      Some(self.consume())
    } else {
      None
    }
  }

  fn expect_and_consume(&mut self, category: Category) -> CompileResult<Word> {
    if let Some(word) = self.try_consume(&[category]) {
      return Ok(word);
    }
    let at = self.peek();
    self
      .diagman
      .report(at.location(), Diag::ParserExpectedToken)
      .arg(category)
      .range(at.lexeme);
    SyntaxSnafu.fail()
  }

  // <type-specifier> ::= int | void
  fn expect_and_consume_type(&mut self) -> CompileResult<Word> {
    if let Some(word) = self.try_consume(&[Category::Void, Category::Int]) {
      return Ok(word);
    }
    let at = self.peek();
    self
      .diagman
      .report(at.location(), Diag::ParserExpectedType)
      .range(at.lexeme);
    SyntaxSnafu.fail()
  }

  // ----- Declaration parsing -----

  // <program> ::= <declaration-list>
  // <declaration-list> ::= <declaration-list> <declaration> | <declaration>
  pub fn parse_program(mut self) -> CompileResult<Program> {
    self.sema.act_on_program_start();
    loop {
      let decl = self.parse_declaration()?;
      self.sema.act_on_top_level_decl(decl);
      if self.peek().category == Category::Eof {
        break;
      }
    }
    Ok(self.sema.act_on_program_end())
  }

  // <declaration> ::= <var-declaration> | <fun-declaration>
  fn parse_declaration(&mut self) -> CompileResult<DeclId> {
    // Both alternatives open with the atomic `type ID` prefix, so the
    // third word of lookahead decides: an open paren means a function.
    if self.lookahead(2).category == Category::OpenParen {
      self.parse_fun_declaration()
    } else {
      self.parse_var_declaration()
    }
  }

  // <var-declaration> ::= <type-specifier> ID ; | <type-specifier> ID [ NUM ] ;
  fn parse_var_declaration(&mut self) -> CompileResult<DeclId> {
    let type_word = self.expect_and_consume_type()?;
    let name = self.expect_and_consume(Category::Identifier)?;

    let mut array_size = None;
    if self.try_consume(&[Category::OpenBracket]).is_some() {
      array_size = Some(self.parse_number()?);
      self.expect_and_consume(Category::CloseBracket)?;
    }

    self.expect_and_consume(Category::Semicolon)?;
    Ok(self.sema.act_on_var_decl(type_word, name, array_size))
  }

  // <fun-declaration> ::= <type-specifier> ID ( <params> ) <compound-stmt>
  fn parse_fun_declaration(&mut self) -> CompileResult<DeclId> {
    let ret_type = self.expect_and_consume_type()?;
    let name = self.expect_and_consume(Category::Identifier)?;
    self.expect_and_consume(Category::OpenParen)?;

    let fun = self.sema.act_on_fun_decl_start(ret_type, name);

    // The parameter scope stays active while the body is parsed, and
    // must be released on the error path as well.
    self.sema.enter_scope(ScopeKind::FunParams);
    let body = self.parse_params_and_body();
    self.sema.leave_scope(ScopeKind::FunParams);
    let body = body?;

    Ok(self.sema.act_on_fun_decl_end(fun, body))
  }

  // <params> ::= <param-list> | void
  // <param-list> ::= <param-list> , <param> | <param>
  fn parse_params_and_body(&mut self) -> CompileResult<CompoundStmt> {
    if self.lookahead(0).category == Category::Void
      && self.lookahead(1).category == Category::CloseParen
    {
      // The params of the function is a single `void`, i.e. no params.
      self.consume();
    } else {
      self.parse_param()?;
      while self.peek().category != Category::CloseParen {
        self.expect_and_consume(Category::Comma)?;
        self.parse_param()?;
      }
    }
    self.expect_and_consume(Category::CloseParen)?;
    self.parse_compound_stmt(ScopeKind::FunBody)
  }

  // <param> ::= <type-specifier> ID | <type-specifier> ID [ ]
  fn parse_param(&mut self) -> CompileResult<DeclId> {
    let type_word = self.expect_and_consume_type()?;
    let name = self.expect_and_consume(Category::Identifier)?;

    let mut is_array = false;
    if self.try_consume(&[Category::OpenBracket]).is_some() {
      is_array = true;
      self.expect_and_consume(Category::CloseBracket)?;
    }

    Ok(self.sema.act_on_param_decl(type_word, name, is_array))
  }

  // ----- Statement parsing -----

  // <statement> ::= <expression-stmt> | <compound-stmt> | <selection-stmt>
  //               | <iteration-stmt> | <return-stmt>
  fn parse_statement(&mut self) -> CompileResult<Stmt> {
    // Dispatch on the FIRST set of each alternative.
    match self.peek().category {
      Category::Identifier
      | Category::Number
      | Category::OpenParen
      | Category::Semicolon => self.parse_expr_stmt(),
      Category::OpenCurly => Ok(Stmt::Compound(
        self.parse_compound_stmt(ScopeKind::Compound)?,
      )),
      Category::If => self.parse_selection_stmt(),
      Category::While => self.parse_iteration_stmt(),
      Category::Return => self.parse_return_stmt(),
      _ => {
        let at = self.peek();
        self
          .diagman
          .report(at.location(), Diag::ParserExpectedStatement)
          .range(at.lexeme);
        SyntaxSnafu.fail()
      }
    }
  }

  // <expression-stmt> ::= <expression> ; | ;
  fn parse_expr_stmt(&mut self) -> CompileResult<Stmt> {
    if self.try_consume(&[Category::Semicolon]).is_some() {
      return Ok(self.sema.act_on_null_stmt());
    }
    let expr = self.parse_expression()?;
    self.expect_and_consume(Category::Semicolon)?;
    Ok(self.sema.act_on_expr_stmt(expr))
  }

  // <compound-stmt> ::= { <local-declarations> <statement-list> }
  // <local-declarations> ::= <local-declarations> <var-declaration> | empty
  // <statement-list> ::= <statement-list> <statement> | empty
  fn parse_compound_stmt(&mut self, kind: ScopeKind) -> CompileResult<CompoundStmt> {
    self.expect_and_consume(Category::OpenCurly)?;

    // Enter a new scope context for this compound statement, released
    // on every exit path.
    self.sema.enter_scope(kind);
    let result = self.parse_compound_body();
    self.sema.leave_scope(kind);
    result
  }

  fn parse_compound_body(&mut self) -> CompileResult<CompoundStmt> {
    // The FIRST and FOLLOW sets of local-declarations are disjoint, so
    // we keep parsing declarations as long as a type specifier shows up.
    let mut locals = Vec::new();
    while matches!(self.peek().category, Category::Void | Category::Int) {
      locals.push(self.parse_var_declaration()?);
    }

    // The only member of statement-list's FOLLOW set is '}', so parse
    // statements until the closing curly shows up.
    let mut body = Vec::new();
    while self.peek().category != Category::CloseCurly {
      body.push(self.parse_statement()?);
    }
    self.consume();

    Ok(self.sema.act_on_compound_stmt(locals, body))
  }

  // <selection-stmt> ::= if ( <expression> ) <statement>
  //                    | if ( <expression> ) <statement> else <statement>
  fn parse_selection_stmt(&mut self) -> CompileResult<Stmt> {
    self.expect_and_consume(Category::If)?;
    self.expect_and_consume(Category::OpenParen)?;
    let cond = self.parse_expression()?;
    self.expect_and_consume(Category::CloseParen)?;

    let then_stmt = self.parse_statement()?;
    let else_stmt = if self.try_consume(&[Category::Else]).is_some() {
      Some(self.parse_statement()?)
    } else {
      None
    };

    Ok(self.sema.act_on_selection_stmt(cond, then_stmt, else_stmt))
  }

  // <iteration-stmt> ::= while ( <expression> ) <statement>
  fn parse_iteration_stmt(&mut self) -> CompileResult<Stmt> {
    self.expect_and_consume(Category::While)?;
    self.expect_and_consume(Category::OpenParen)?;
    let cond = self.parse_expression()?;
    self.expect_and_consume(Category::CloseParen)?;
    let body = self.parse_statement()?;

    Ok(self.sema.act_on_iteration_stmt(cond, body))
  }

  // <return-stmt> ::= return ; | return <expression> ;
  fn parse_return_stmt(&mut self) -> CompileResult<Stmt> {
    let keyword = self.expect_and_consume(Category::Return)?;

    if self.try_consume(&[Category::Semicolon]).is_some() {
      return Ok(self.sema.act_on_return_stmt(None, keyword));
    }

    let expr = self.parse_expression()?;
    self.expect_and_consume(Category::Semicolon)?;
    Ok(self.sema.act_on_return_stmt(Some(expr), keyword))
  }

  // ----- Expression parsing -----

  // <expression> ::= <var> = <expression> | <simple-expression>
  fn parse_expression(&mut self) -> CompileResult<Expr> {
    let expr = self.parse_simple_expression()?;

    // An assignment cannot be derived from <simple-expression>, but we
    // can predict it after the fact: when the simple expression turned
    // out to be a bare variable reference and the next word is '=',
    // eat the '=' and derive the (right-associative) assignment.
    if expr.is_var_ref()
      && let Some(op_word) = self.try_consume(&[Category::Assign])
    {
      let rhs = self.parse_expression()?;
      return Ok(self.sema.act_on_assign(expr, rhs, op_word));
    }

    Ok(expr)
  }

  // <simple-expression> ::= <additive-expression> <relop> <additive-expression>
  //                       | <additive-expression>
  fn parse_simple_expression(&mut self) -> CompileResult<Expr> {
    let expr = self.parse_additive_expression()?;

    // Relational operators are non-associative: at most one applies.
    if let Some(op_word) = self.try_consume(&RELOPS) {
      let rhs = self.parse_additive_expression()?;
      return Ok(self.sema.act_on_binary_expr(expr, rhs, op_word));
    }

    Ok(expr)
  }

  // <additive-expression> ::= <additive-expression> <addop> <term> | <term>
  fn parse_additive_expression(&mut self) -> CompileResult<Expr> {
    let mut expr = self.parse_term()?;
    while let Some(op_word) = self.try_consume(&[Category::Plus, Category::Minus]) {
      let rhs = self.parse_term()?;
      expr = self.sema.act_on_binary_expr(expr, rhs, op_word);
    }
    Ok(expr)
  }

  // <term> ::= <term> <mulop> <factor> | <factor>
  fn parse_term(&mut self) -> CompileResult<Expr> {
    let mut expr = self.parse_factor()?;
    while let Some(op_word) = self.try_consume(&[Category::Multiply, Category::Divide]) {
      let rhs = self.parse_factor()?;
      expr = self.sema.act_on_binary_expr(expr, rhs, op_word);
    }
    Ok(expr)
  }

  // <factor> ::= ( <expression> ) | <var> | <call> | NUM
  fn parse_factor(&mut self) -> CompileResult<Expr> {
    match self.peek().category {
      Category::Number => self.parse_number(),

      Category::OpenParen => {
        self.consume();
        let expr = self.parse_expression()?;
        self.expect_and_consume(Category::CloseParen)?;
        Ok(expr)
      }

      Category::Identifier => {
        // A call and a variable reference both start with an atomic
        // identifier, so one extra word of lookahead tells them apart.
        if self.lookahead(1).category == Category::OpenParen {
          self.parse_call()
        } else {
          self.parse_var()
        }
      }

      _ => {
        let at = self.peek();
        self
          .diagman
          .report(at.location(), Diag::ParserExpectedExpression)
          .range(at.lexeme);
        SyntaxSnafu.fail()
      }
    }
  }

  // NUM
  fn parse_number(&mut self) -> CompileResult<Expr> {
    let word = self.expect_and_consume(Category::Number)?;
    Ok(self.sema.act_on_number(word))
  }

  // <var> ::= ID | ID [ <expression> ]
  fn parse_var(&mut self) -> CompileResult<Expr> {
    let name = self.expect_and_consume(Category::Identifier)?;

    let mut index = None;
    if self.try_consume(&[Category::OpenBracket]).is_some() {
      index = Some(self.parse_expression()?);
      self.expect_and_consume(Category::CloseBracket)?;
    }

    Ok(self.sema.act_on_var(name, index))
  }

  // <call> ::= ID ( <args> )
  // <args> ::= <arg-list> | empty
  // <arg-list> ::= <arg-list> , <expression> | <expression>
  fn parse_call(&mut self) -> CompileResult<Expr> {
    let name = self.expect_and_consume(Category::Identifier)?;
    self.expect_and_consume(Category::OpenParen)?;

    let mut args = Vec::new();
    if self.peek().category != Category::CloseParen {
      args.push(self.parse_expression()?);
      while self.peek().category != Category::CloseParen {
        self.expect_and_consume(Category::Comma)?;
        args.push(self.parse_expression()?);
      }
    }

    let rparen = self.expect_and_consume(Category::CloseParen)?;
    Ok(self.sema.act_on_call(name, args, rparen))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::source::SourceFile;
  use std::cell::RefCell;
  use std::rc::Rc;

  fn parse(text: &str) -> (CompileResult<Program>, Vec<Diag>) {
    let source = SourceFile::new("t.cm", text);
    let diagman = DiagnosticManager::new(&source);
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    diagman.handler(move |diag| {
      sink.borrow_mut().push(diag.code);
      false
    });

    let scanner = Scanner::new(&source, &diagman);
    let sema = Semantics::new(&source, &diagman);
    let parser = Parser::new(scanner, sema, &diagman);
    let result = parser.parse_program();
    let codes = seen.borrow().clone();
    (result, codes)
  }

  fn parse_clean(text: &str) -> Program {
    let (result, codes) = parse(text);
    assert_eq!(codes, vec![], "unexpected diagnostics");
    result.expect("program should parse")
  }

  #[test]
  fn minimal_program_parses_without_diagnostics() {
    let program = parse_clean("int main(void) { return 0; }");
    assert_eq!(program.order.len(), 1);
    let dump = program.dump();
    assert!(dump.contains("[fun-declaration "), "dump was:\n{dump}");
    assert!(dump.contains("[main]"), "dump was:\n{dump}");
    assert!(dump.contains("[return-stmt [0]]"), "dump was:\n{dump}");
  }

  #[test]
  fn third_word_separates_vars_from_functions() {
    let program = parse_clean("int x; int f(void) { return 0; }");
    assert_eq!(program.order.len(), 2);
  }

  #[test]
  fn void_void_params_form_is_accepted() {
    parse_clean("void f(void) { } int main(void) { f(); return 0; }");
  }

  #[test]
  fn missing_semicolon_is_a_syntax_error() {
    let (result, codes) = parse("int x");
    assert!(result.is_err());
    assert_eq!(codes, vec![Diag::ParserExpectedToken]);
  }

  #[test]
  fn statement_starting_with_else_is_rejected() {
    let (result, codes) = parse("int main(void) { else; return 0; }");
    assert!(result.is_err());
    assert_eq!(codes, vec![Diag::ParserExpectedStatement]);
  }

  #[test]
  fn assignment_is_right_associative() {
    let program =
      parse_clean("int main(void) { int a; int b; a = b = 1; return a; }");
    let dump = program.dump();
    assert!(dump.contains("[= [var [b]] [1]]"), "dump was:\n{dump}");
  }

  #[test]
  fn redefinition_in_one_region_is_reported() {
    let (result, codes) = parse("int main(void) { int x; int x; return 0; }");
    assert!(result.is_ok(), "semantic errors do not stop parsing");
    assert_eq!(codes, vec![Diag::SemaRedefinition]);
  }

  #[test]
  fn params_and_body_share_one_region() {
    let (_, codes) = parse("int f(int x) { int x; return 0; }");
    assert_eq!(codes, vec![Diag::SemaRedefinition]);
  }

  #[test]
  fn shadowing_across_scopes_is_allowed() {
    parse_clean("int x; int main(void) { int x; { int x; x = 1; } return x; }");
  }

  #[test]
  fn undeclared_identifier_is_reported() {
    let (_, codes) = parse("int main(void) { return y; }");
    assert_eq!(codes, vec![Diag::SemaUndeclaredIdentifier]);
  }

  #[test]
  fn undeclared_assignment_target_stays_one_error() {
    let (result, codes) = parse("int main(void) { x = 1; return 0; }");
    assert!(result.is_ok());
    assert_eq!(codes, vec![Diag::SemaUndeclaredIdentifier]);
  }

  #[test]
  fn void_variables_are_rejected() {
    let (_, codes) = parse("void x; int main(void) { return 0; }");
    assert_eq!(codes, vec![Diag::SemaVarCannotBeVoid]);
  }

  #[test]
  fn functions_are_not_variables_and_vice_versa() {
    let (_, codes) = parse("int x; int main(void) { x(); return main; }");
    assert_eq!(codes, vec![Diag::SemaFunIsNotAFun, Diag::SemaVarIsNotAVar]);
  }

  #[test]
  fn subscripting_a_scalar_is_reported() {
    let (_, codes) = parse("int x; int main(void) { return x[0]; }");
    assert_eq!(codes, vec![Diag::SemaSubscriptedScalar]);
  }

  #[test]
  fn whole_array_operands_are_rejected() {
    let (_, codes) = parse("int a[4]; int main(void) { return a + 1; }");
    assert_eq!(codes, vec![Diag::SemaInvalidOperands]);
  }

  #[test]
  fn returning_a_value_from_void_is_reported() {
    let (_, codes) =
      parse("void g(void) { return 3; } int main(void) { return 0; }");
    assert_eq!(codes, vec![Diag::SemaReturnTypeMismatch]);
  }

  #[test]
  fn bare_return_in_int_function_is_reported() {
    let (_, codes) = parse("int main(void) { return; }");
    assert_eq!(codes, vec![Diag::SemaReturnTypeMismatch]);
  }

  #[test]
  fn call_arity_is_checked() {
    let (_, codes) =
      parse("int f(int a, int b) { return a + b; } int main(void) { return f(1); }");
    assert_eq!(codes, vec![Diag::SemaWrongArgumentCount]);
  }

  #[test]
  fn argument_shapes_are_checked() {
    let (_, codes) = parse(
      "int sum(int v[], int n) { return v[n - 1]; }\n\
       int main(void) { int a[8]; int x; return sum(x, a); }",
    );
    assert_eq!(
      codes,
      vec![Diag::SemaIncompatibleArgument, Diag::SemaIncompatibleArgument]
    );
  }

  #[test]
  fn whole_arrays_do_pass_to_array_parameters() {
    parse_clean(
      "int sum(int v[], int n) { return v[n - 1]; }\n\
       int main(void) { int a[8]; return sum(a, 8); }",
    );
  }

  #[test]
  fn builtins_are_visible_everywhere() {
    parse_clean("int main(void) { output(input()); return 0; }");
  }

  #[test]
  fn oversized_literal_is_clamped_and_reported() {
    let (result, codes) = parse("int main(void) { return 2147483648; }");
    assert!(result.is_ok());
    assert_eq!(codes, vec![Diag::ParserNumberTooBig]);
  }
}

/*
<program> ::= <declaration-list>
<declaration-list> ::= <declaration-list> <declaration> | <declaration>
<declaration> ::= <var-declaration> | <fun-declaration>

<var-declaration> ::= <type-specifier> ID ; | <type-specifier> ID [ NUM ] ;
<type-specifier> ::= int | void

<fun-declaration> ::= <type-specifier> ID ( <params> ) <compound-stmt>
<params> ::= <param-list> | void
<param-list> ::= <param-list> , <param> | <param>
<param> ::= <type-specifier> ID | <type-specifier> ID [ ]

<compound-stmt> ::= { <local-declarations> <statement-list> }
<local-declarations> ::= <local-declarations> <var-declaration> | empty
<statement-list> ::= <statement-list> <statement> | empty

<statement> ::= <expression-stmt> | <compound-stmt> | <selection-stmt>
              | <iteration-stmt> | <return-stmt>
<expression-stmt> ::= <expression> ; | ;

<selection-stmt> ::= if ( <expression> ) <statement>
                   | if ( <expression> ) <statement> else <statement>

<iteration-stmt> ::= while ( <expression> ) <statement>

<return-stmt> ::= return ; | return <expression> ;

<expression> ::= <var> = <expression> | <simple-expression>
<var> ::= ID | ID [ <expression> ]

<simple-expression> ::= <additive-expression> <relop> <additive-expression>
                      | <additive-expression>
<relop> ::= <= | < | > | >= | == | !=

<additive-expression> ::= <additive-expression> <addop> <term> | <term>
<addop> ::= + | -
<term> ::= <term> <mulop> <factor> | <factor>
<mulop> ::= * | /

<factor> ::= ( <expression> ) | <var> | <call> | NUM

<call> ::= ID ( <args> )
<args> ::= <arg-list> | empty
<arg-list> ::= <arg-list> , <expression> | <expression>
*/
