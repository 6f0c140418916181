// AST -> runtime values. Lexically-scoped environments, first-class
// functions with captured scopes, operator overloading, and reactive
// `when` blocks, grounded in original_source/src/interpreter/interpreter.cpp
// and interpreter.hpp, translated from exception-based control flow to the
// `Signal`-carrying `EvalResult` (spec.md section 9's non-local-control note).

use std::rc::Rc;

use indexmap::IndexMap;

use crate::ast::{Expr, LockKind, Stmt, Type};
use crate::environment::Environment;
use crate::error::{EvalResult, RuntimeError, Signal};
use crate::token::{Token, TokenKind};
use crate::value::{FunctionValue, Object, Value};

/// A registered `when` condition/body pair, checked at each checkpoint
/// (spec.md 4.3's When rule and the glossary's Checkpoint entry).
struct WhenContext {
    cond: Rc<Expr>,
    body: Rc<Stmt>,
    is_volatile: bool,
    env: Environment,
}

pub struct Interpreter {
    pub globals: Environment,
    environment: Environment,
    when_blocks: Vec<WhenContext>,
    in_when_block: bool,
}

impl Interpreter {
    pub fn new() -> Self {
        let globals = Environment::root();
        install_builtins(&globals);
        Interpreter {
            environment: globals.clone(),
            globals,
            when_blocks: Vec::new(),
            in_when_block: false,
        }
    }

    /// Runs a program to completion. A top-level `return` (legal at the
    /// module level in the reference implementation) short-circuits and
    /// its value is handed back; otherwise `Value::Null`.
    pub fn interpret(&mut self, stmts: &[Stmt]) -> Result<Value, RuntimeError> {
        for stmt in stmts {
            match self.execute(stmt) {
                Ok(()) => {}
                Err(Signal::Return(v)) => return Ok(v),
                Err(Signal::Error(e)) => return Err(e),
                Err(Signal::Break) | Err(Signal::Continue) => {
                    return Err(RuntimeError::new("break/continue outside a loop", 0));
                }
            }
            self.check_when_conditions()?;
        }
        Ok(Value::Null)
    }

    // --- statement execution --------------------------------------------

    fn execute(&mut self, stmt: &Stmt) -> EvalResult<()> {
        match stmt {
            Stmt::Expression(expr) => {
                self.evaluate(expr)?;
                Ok(())
            }
            Stmt::Block { stmts, .. } => self.execute_block(stmts, self.environment.chain()),
            Stmt::VarDecl { name, init, .. } => {
                let value = match init {
                    Some(expr) => self.evaluate(expr)?,
                    None => Value::Null,
                };
                self.environment.define(name.lexeme.clone(), value);
                Ok(())
            }
            Stmt::If { cond, then_branch, else_branch } => {
                if self.evaluate(cond)?.is_truthy() {
                    self.execute(then_branch)?;
                } else if let Some(else_branch) = else_branch {
                    self.execute(else_branch)?;
                }
                Ok(())
            }
            Stmt::While { cond, body } => {
                while self.evaluate(cond)?.is_truthy() {
                    match self.execute(body) {
                        Ok(()) => {}
                        Err(Signal::Break) => break,
                        Err(Signal::Continue) => continue,
                        err => return err,
                    }
                }
                Ok(())
            }
            Stmt::For { init, cond, incr, body } => {
                let loop_env = self.environment.chain();
                let previous = std::mem::replace(&mut self.environment, loop_env);
                let result = (|| {
                    if let Some(init) = init {
                        self.execute(init)?;
                    }
                    loop {
                        if let Some(cond) = cond {
                            if !self.evaluate(cond)?.is_truthy() {
                                break;
                            }
                        }
                        match self.execute(body) {
                            Ok(()) => {}
                            Err(Signal::Break) => break,
                            Err(Signal::Continue) => {}
                            err => return err,
                        }
                        if let Some(incr) = incr {
                            self.evaluate(incr)?;
                        }
                    }
                    Ok(())
                })();
                self.environment = previous;
                result
            }
            Stmt::Return { value } => {
                let value = match value {
                    Some(expr) => self.evaluate(expr)?,
                    None => Value::Null,
                };
                Err(Signal::Return(value))
            }
            Stmt::Break => Err(Signal::Break),
            Stmt::Continue => Err(Signal::Continue),
            Stmt::FunctionDecl { name, params, body, .. } => {
                let function = Value::Function(Rc::new(FunctionValue::UserDefined {
                    params: params.iter().map(|(_, tok)| tok.lexeme.clone()).collect(),
                    closure: self.environment.clone(),
                    body: Rc::new(clone_stmts(body)),
                }));
                self.environment.define(name.lexeme.clone(), function);
                Ok(())
            }
            Stmt::ClassDecl { name, members } => self.execute_aggregate_decl(name, members),
            Stmt::ObjectDecl { name, members } => self.execute_aggregate_decl(name, members),
            Stmt::NamespaceDecl { name, decls } => {
                let ns_env = self.environment.chain();
                let previous = std::mem::replace(&mut self.environment, ns_env.clone());
                let result = (|| {
                    for decl in decls {
                        self.execute(decl)?;
                    }
                    Ok(())
                })();
                self.environment = previous;
                result?;

                let mut fields = IndexMap::new();
                for (key, value) in ns_env.own_bindings() {
                    fields.insert(key, value);
                }
                let object = Object::CustomObject { type_name: "namespace".to_string(), fields };
                self.environment.define(name.lexeme.clone(), Value::Object(Rc::new(std::cell::RefCell::new(object))));
                Ok(())
            }
            Stmt::When { cond, body, is_volatile, is_async: _ } => {
                // `async` when blocks carry no runtime distinction here (no
                // concurrency is implemented, spec.md's Non-goals) — they
                // register and re-check exactly like synchronous ones.
                self.when_blocks.push(WhenContext {
                    cond: Rc::new(clone_expr(cond)),
                    body: Rc::new(clone_stmt(body)),
                    is_volatile: *is_volatile,
                    env: self.environment.clone(),
                });
                Ok(())
            }
            Stmt::StructDecl { .. } => Ok(()),
            Stmt::OperatorDecl { op, body, .. } => {
                let key = format!("operator{}", op.lexeme);
                let function = Value::Function(Rc::new(FunctionValue::UserDefined {
                    params: vec!["left".to_string(), "right".to_string()],
                    closure: self.environment.clone(),
                    body: Rc::new(clone_stmts(body)),
                }));
                self.environment.define(key, function);
                Ok(())
            }
            Stmt::Lock { body, .. } => {
                // Lock/pre-lock/post-lock annotations are recorded as parse
                // metadata only (spec.md's lock section): no concurrency
                // runtime exists, so the body just executes in place.
                match body {
                    Some(stmts) => self.execute_block(stmts, self.environment.chain()),
                    None => Ok(()),
                }
            }
            Stmt::Asm { .. } => Ok(()),
            Stmt::Print { args } => {
                let parts: Result<Vec<String>, Signal> =
                    args.iter().map(|a| self.evaluate(a).map(|v| v.to_string())).collect();
                println!("{}", parts?.join(" "));
                Ok(())
            }
            Stmt::InputStmt { prompt, variable } => {
                if let Some(prompt) = prompt {
                    let value = self.evaluate(prompt)?;
                    print!("{}", value);
                }
                let line = read_line_from_stdin();
                if let Some(variable) = variable {
                    self.environment.define(variable.lexeme.clone(), Value::string(line));
                }
                Ok(())
            }
            Stmt::OpenStmt { filename, variable, .. } => {
                // External collaborator (spec.md section 1): the core records
                // the binding but does not perform file I/O itself.
                let _ = self.evaluate(filename)?;
                self.environment.define(variable.lexeme.clone(), Value::Null);
                Ok(())
            }
        }
    }

    /// Members are executed in their own child environment so methods close
    /// over sibling fields (invariant I3), then both fields and methods are
    /// snapshotted into the resulting CustomObject's field map — "method
    /// dispatch is field-load-then-Call", per value.rs's Object doc comment.
    /// Fields execute first so a method body can see them at closure time.
    fn execute_aggregate_decl(&mut self, name: &Token, members: &[Stmt]) -> EvalResult<()> {
        let agg_env = self.environment.chain();
        let previous = std::mem::replace(&mut self.environment, agg_env);
        let result = (|| {
            for member in members {
                if matches!(member, Stmt::VarDecl { .. }) {
                    self.execute(member)?;
                }
            }
            for member in members {
                if matches!(member, Stmt::FunctionDecl { .. }) {
                    self.execute(member)?;
                }
            }
            Ok(())
        })();
        if let Err(e) = result {
            self.environment = previous;
            return Err(e);
        }

        let mut fields = IndexMap::new();
        for member in members {
            let member_name = match member {
                Stmt::FunctionDecl { name, .. } | Stmt::VarDecl { name, .. } => name,
                _ => continue,
            };
            if let Ok(v) = self.environment.get(&member_name.lexeme, member_name.line) {
                fields.insert(member_name.lexeme.clone(), v);
            }
        }
        self.environment = previous;

        let object =
            Object::CustomObject { type_name: name.lexeme.clone(), fields };
        self.environment.define(name.lexeme.clone(), Value::Object(Rc::new(std::cell::RefCell::new(object))));
        Ok(())
    }

    fn execute_block(&mut self, stmts: &[Stmt], env: Environment) -> EvalResult<()> {
        let previous = std::mem::replace(&mut self.environment, env);
        let result = (|| {
            for stmt in stmts {
                self.execute(stmt)?;
            }
            Ok(())
        })();
        self.environment = previous;
        result
    }

    /// Checkpoints fire after each top-level statement and after each
    /// user-function return (spec.md 4.3 / glossary "Checkpoint"). Order
    /// among satisfied contexts is registration order; a volatile context
    /// self-deregisters after exactly one firing (P4).
    fn check_when_conditions(&mut self) -> Result<(), RuntimeError> {
        if self.in_when_block {
            return Ok(());
        }
        self.in_when_block = true;
        let snapshot: Vec<usize> = (0..self.when_blocks.len()).collect();
        let mut fired_volatile = Vec::new();
        for idx in snapshot {
            if idx >= self.when_blocks.len() {
                break;
            }
            let ctx_cond = self.when_blocks[idx].cond.clone();
            let ctx_env = self.when_blocks[idx].env.clone();
            let previous = std::mem::replace(&mut self.environment, ctx_env);
            let truthy = self.evaluate(&ctx_cond);
            self.environment = previous;
            let truthy = match truthy {
                Ok(v) => v.is_truthy(),
                Err(Signal::Error(e)) => {
                    self.in_when_block = false;
                    return Err(e);
                }
                Err(_) => false,
            };
            if truthy {
                let ctx_body = self.when_blocks[idx].body.clone();
                let ctx_env = self.when_blocks[idx].env.clone();
                let previous = std::mem::replace(&mut self.environment, ctx_env);
                let outcome = self.execute(&ctx_body);
                self.environment = previous;
                if let Err(Signal::Error(e)) = outcome {
                    self.in_when_block = false;
                    return Err(e);
                }
                if self.when_blocks[idx].is_volatile {
                    fired_volatile.push(idx);
                }
            }
        }
        for idx in fired_volatile.into_iter().rev() {
            if idx < self.when_blocks.len() {
                self.when_blocks.remove(idx);
            }
        }
        self.in_when_block = false;
        Ok(())
    }

    // --- expression evaluation -------------------------------------------

    fn evaluate(&mut self, expr: &Expr) -> EvalResult<Value> {
        match expr {
            Expr::IntegerLiteral { value, .. } => Ok(Value::Integer(*value)),
            Expr::FloatLiteral { value, .. } => Ok(Value::Float(*value)),
            Expr::BooleanLiteral(b) => Ok(Value::Boolean(*b)),
            Expr::CharLiteral(c) => Ok(Value::Integer(*c as i64)),
            Expr::StringLiteral(s) => Ok(Value::string(s.clone())),
            Expr::NullLiteral => Ok(Value::Null),
            Expr::ArrayLiteral { elements } => {
                let values: Result<Vec<Value>, Signal> =
                    elements.iter().map(|e| self.evaluate(e)).collect();
                Ok(Value::Object(Rc::new(std::cell::RefCell::new(Object::ArrayObject {
                    values: values?,
                }))))
            }
            Expr::CharArrayLiteral { chars } => {
                let values = chars.iter().map(|c| Value::Integer(*c as i64)).collect();
                Ok(Value::Object(Rc::new(std::cell::RefCell::new(Object::ArrayObject { values }))))
            }
            Expr::Grouping { inner } => self.evaluate(inner),
            Expr::Variable { name } => {
                self.environment.get(&name.lexeme, name.line).map_err(Signal::from)
            }
            Expr::Assign { name, value } => {
                let v = self.evaluate(value)?;
                self.environment.assign(&name.lexeme, v.clone(), name.line)?;
                Ok(v)
            }
            Expr::Logical { left, op, right } => {
                let l = self.evaluate(left)?;
                match op.kind {
                    TokenKind::Or => {
                        if l.is_truthy() {
                            Ok(l)
                        } else {
                            self.evaluate(right)
                        }
                    }
                    TokenKind::And => {
                        if !l.is_truthy() {
                            Ok(l)
                        } else {
                            self.evaluate(right)
                        }
                    }
                    _ => unreachable!("logical op must be and/or"),
                }
            }
            Expr::Binary { left, op, right } => self.evaluate_binary(left, op, right),
            Expr::Unary { op, right } => self.evaluate_unary(op, right),
            Expr::Call { callee, paren, args } => self.evaluate_call(callee, paren, args),
            Expr::ArrayAccess { array, index } => {
                let arr = self.evaluate(array)?;
                let idx = self.evaluate(index)?;
                let idx = as_integer(&idx, paren_line(index)).map_err(Signal::from)?;
                match arr {
                    Value::Object(o) => o.borrow().index_get(idx).map_err(Signal::from),
                    _ => Err(Signal::from(RuntimeError::new("cannot index a non-object value", 0))),
                }
            }
            Expr::MemberAccess { object, member, .. } => {
                let obj = self.evaluate(object)?;
                match obj {
                    Value::Object(o) => o
                        .borrow()
                        .get_field(&member.lexeme)
                        .ok_or_else(|| {
                            RuntimeError::new(format!("undefined member '{}'", member.lexeme), member.line)
                        })
                        .map_err(Signal::from),
                    _ => Err(Signal::from(RuntimeError::new(
                        format!("cannot access member '{}' of a non-object value", member.lexeme),
                        member.line,
                    ))),
                }
            }
            Expr::InterpolatedString { format, exprs } => {
                let values: Result<Vec<Value>, Signal> =
                    exprs.iter().map(|e| self.evaluate(e)).collect();
                Ok(Value::string(render_interpolated(format, &values?)))
            }
            Expr::TypeCast { target, inner } => {
                let value = self.evaluate(inner)?;
                cast_value(target, value).map_err(Signal::from)
            }
            Expr::AddressOf { inner } => self.evaluate(inner),
            Expr::Dereference { inner } => self.evaluate(inner),
            Expr::Input { prompt } => {
                if let Some(prompt) = prompt {
                    let value = self.evaluate(prompt)?;
                    print!("{}", value);
                }
                Ok(Value::string(read_line_from_stdin()))
            }
            Expr::Open { filename, .. } => {
                let _ = self.evaluate(filename)?;
                Ok(Value::Null)
            }
        }
    }

    fn evaluate_unary(&mut self, op: &Token, right: &Expr) -> EvalResult<Value> {
        let value = self.evaluate(right)?;
        match op.kind {
            TokenKind::Bang | TokenKind::Not => Ok(Value::Boolean(!value.is_truthy())),
            TokenKind::Minus => match value {
                Value::Integer(i) => Ok(Value::Integer(-i)),
                Value::Float(f) => Ok(Value::Float(-f)),
                _ => Err(Signal::from(RuntimeError::new("unary '-' requires a number", op.line))),
            },
            TokenKind::Tilde => match value {
                Value::Integer(i) => Ok(Value::Integer(!i)),
                _ => Err(Signal::from(RuntimeError::new("unary '~' requires an integer", op.line))),
            },
            _ => Err(Signal::from(RuntimeError::new("unsupported unary operator", op.line))),
        }
    }

    /// Binary arithmetic/comparison, with operator-overload resolution
    /// consulted first when the left operand is an Object (spec.md 4.3,
    /// P6): look up `"operator" + op.lexeme` in scope before falling back
    /// to the builtin table.
    fn evaluate_binary(&mut self, left: &Expr, op: &Token, right: &Expr) -> EvalResult<Value> {
        let l = self.evaluate(left)?;
        let r = self.evaluate(right)?;

        if matches!(l, Value::Object(_)) {
            let key = format!("operator{}", op.lexeme);
            if let Ok(Value::Function(f)) = self.environment.get(&key, op.line) {
                return self.call_function(&f, vec![l, r], op.line);
            }
        }

        match op.kind {
            TokenKind::Plus => self.add(l, r, op),
            TokenKind::Minus => self.arith(l, r, op, |a, b| a - b, |a, b| a - b),
            TokenKind::Star => self.arith(l, r, op, |a, b| a * b, |a, b| a * b),
            TokenKind::Slash => self.divide(l, r, op),
            TokenKind::Percent => self.modulo(l, r, op),
            TokenKind::EqualEqual | TokenKind::Is => Ok(Value::Boolean(Value::values_equal(&l, &r))),
            TokenKind::BangEqual => Ok(Value::Boolean(!Value::values_equal(&l, &r))),
            TokenKind::Less => self.compare(l, r, op, |a, b| a < b, |a, b| a < b),
            TokenKind::LessEqual => self.compare(l, r, op, |a, b| a <= b, |a, b| a <= b),
            TokenKind::Greater => self.compare(l, r, op, |a, b| a > b, |a, b| a > b),
            TokenKind::GreaterEqual => self.compare(l, r, op, |a, b| a >= b, |a, b| a >= b),
            TokenKind::BitAnd => self.int_only(l, r, op, |a, b| a & b),
            TokenKind::BitOr => self.int_only(l, r, op, |a, b| a | b),
            TokenKind::Xor => self.int_only(l, r, op, |a, b| a ^ b),
            TokenKind::ShiftLeft => self.int_only(l, r, op, |a, b| a << b),
            TokenKind::ShiftRight => self.int_only(l, r, op, |a, b| a >> b),
            _ => Err(Signal::from(RuntimeError::new("unsupported binary operator", op.line))),
        }
    }

    fn add(&mut self, l: Value, r: Value, op: &Token) -> EvalResult<Value> {
        match (&l, &r) {
            (Value::String(a), Value::String(b)) => Ok(Value::string(format!("{}{}", a, b))),
            (Value::String(_), _) | (_, Value::String(_)) => Err(Signal::from(RuntimeError::new(
                "'+' between a string and a non-string is not supported",
                op.line,
            ))),
            _ => self.arith(l, r, op, |a, b| a + b, |a, b| a + b),
        }
    }

    /// int(+int(-*) -> int; float (+-*) -> float; mixed int/float -> float
    /// (spec.md 4.3 and P5's "mixed-mode promotes int->float").
    fn arith(
        &mut self,
        l: Value,
        r: Value,
        op: &Token,
        fi: fn(i64, i64) -> i64,
        ff: fn(f64, f64) -> f64,
    ) -> EvalResult<Value> {
        match (l, r) {
            (Value::Integer(a), Value::Integer(b)) => Ok(Value::Integer(fi(a, b))),
            (Value::Float(a), Value::Float(b)) => Ok(Value::Float(ff(a, b))),
            (Value::Integer(a), Value::Float(b)) => Ok(Value::Float(ff(a as f64, b))),
            (Value::Float(a), Value::Integer(b)) => Ok(Value::Float(ff(a, b as f64))),
            _ => Err(Signal::from(RuntimeError::new(
                format!("operator '{}' requires numeric operands", op.lexeme),
                op.line,
            ))),
        }
    }

    fn divide(&mut self, l: Value, r: Value, op: &Token) -> EvalResult<Value> {
        match (l, r) {
            (Value::Integer(_), Value::Integer(0)) => {
                Err(Signal::from(RuntimeError::new("division by zero", op.line)))
            }
            // Integer division truncates toward zero (spec.md P5).
            (Value::Integer(a), Value::Integer(b)) => Ok(Value::Integer(a / b)),
            (Value::Float(_), Value::Float(b)) if b == 0.0 => {
                Err(Signal::from(RuntimeError::new("division by zero", op.line)))
            }
            (Value::Integer(_), Value::Float(b)) if b == 0.0 => {
                Err(Signal::from(RuntimeError::new("division by zero", op.line)))
            }
            (Value::Float(a), Value::Float(b)) => Ok(Value::Float(a / b)),
            (Value::Integer(a), Value::Float(b)) => Ok(Value::Float(a as f64 / b)),
            (Value::Float(a), Value::Integer(b)) if b == 0 => {
                let _ = a;
                Err(Signal::from(RuntimeError::new("division by zero", op.line)))
            }
            (Value::Float(a), Value::Integer(b)) => Ok(Value::Float(a / b as f64)),
            _ => Err(Signal::from(RuntimeError::new("'/' requires numeric operands", op.line))),
        }
    }

    /// Modulo follows truncated-division sign (spec.md P5): Rust's `%`
    /// already truncates toward zero for integers, matching this rule.
    fn modulo(&mut self, l: Value, r: Value, op: &Token) -> EvalResult<Value> {
        match (l, r) {
            (Value::Integer(_), Value::Integer(0)) => {
                Err(Signal::from(RuntimeError::new("modulo by zero", op.line)))
            }
            (Value::Integer(a), Value::Integer(b)) => Ok(Value::Integer(a % b)),
            (Value::Float(a), Value::Float(b)) => Ok(Value::Float(a % b)),
            (Value::Integer(a), Value::Float(b)) => Ok(Value::Float(a as f64 % b)),
            (Value::Float(a), Value::Integer(b)) => Ok(Value::Float(a % b as f64)),
            _ => Err(Signal::from(RuntimeError::new("'%' requires numeric operands", op.line))),
        }
    }

    fn compare(
        &mut self,
        l: Value,
        r: Value,
        op: &Token,
        fi: fn(i64, i64) -> bool,
        ff: fn(f64, f64) -> bool,
    ) -> EvalResult<Value> {
        match (l, r) {
            (Value::Integer(a), Value::Integer(b)) => Ok(Value::Boolean(fi(a, b))),
            (Value::Float(a), Value::Float(b)) => Ok(Value::Boolean(ff(a, b))),
            (Value::Integer(a), Value::Float(b)) => Ok(Value::Boolean(ff(a as f64, b))),
            (Value::Float(a), Value::Integer(b)) => Ok(Value::Boolean(ff(a, b as f64))),
            _ => Err(Signal::from(RuntimeError::new(
                format!("operator '{}' requires numeric operands", op.lexeme),
                op.line,
            ))),
        }
    }

    fn int_only(&mut self, l: Value, r: Value, op: &Token, f: fn(i64, i64) -> i64) -> EvalResult<Value> {
        match (l, r) {
            (Value::Integer(a), Value::Integer(b)) => Ok(Value::Integer(f(a, b))),
            _ => Err(Signal::from(RuntimeError::new(
                format!("operator '{}' requires integer operands", op.lexeme),
                op.line,
            ))),
        }
    }

    /// `__set_member`/`__set_index` are synthetic callees the parser
    /// produces when desugaring member/array assignment and compound
    /// assignment (`obj.f = v`, `a[i] += v`) — `Expr::Assign` only carries a
    /// plain variable name, so there is no direct AST shape for "assign
    /// through a place expression". Intercepted here before normal call
    /// dispatch since neither name is bound in any environment.
    fn evaluate_call(&mut self, callee: &Expr, paren: &Token, args: &[Expr]) -> EvalResult<Value> {
        if let Expr::Variable { name } = callee {
            if name.lexeme == "__set_member" {
                let object = self.evaluate(&args[0])?;
                let member = match &args[1] {
                    Expr::StringLiteral(s) => s.clone(),
                    _ => unreachable!("__set_member's second arg is always a StringLiteral"),
                };
                let value = self.evaluate(&args[2])?;
                return match object {
                    Value::Object(o) => {
                        o.borrow_mut().set_field(&member, value.clone()).map_err(Signal::from)?;
                        Ok(value)
                    }
                    _ => Err(Signal::from(RuntimeError::new(
                        format!("cannot set member '{}' on a non-object value", member),
                        name.line,
                    ))),
                };
            }
            if name.lexeme == "__set_index" {
                let array = self.evaluate(&args[0])?;
                let index = self.evaluate(&args[1])?;
                let index = as_integer(&index, name.line).map_err(Signal::from)?;
                let value = self.evaluate(&args[2])?;
                return match array {
                    Value::Object(o) => {
                        o.borrow_mut().set_field(&index.to_string(), value.clone()).map_err(Signal::from)?;
                        Ok(value)
                    }
                    _ => Err(Signal::from(RuntimeError::new("cannot index a non-object value", name.line))),
                };
            }
        }

        let callee_value = self.evaluate(callee)?;
        let mut arg_values = Vec::with_capacity(args.len());
        for arg in args {
            arg_values.push(self.evaluate(arg)?);
        }
        match callee_value {
            Value::Function(f) => self.call_function(&f, arg_values, paren.line),
            _ => Err(Signal::from(RuntimeError::new("can only call a function value", paren.line))),
        }
    }

    /// For a user function: a child environment of the *captured* (closure)
    /// environment, not of the caller's — static scoping, invariant P3.
    /// A `when`-checkpoint scan runs after every user-function return
    /// (spec.md glossary "Checkpoint").
    fn call_function(&mut self, f: &Rc<FunctionValue>, args: Vec<Value>, line: u32) -> EvalResult<Value> {
        match f.as_ref() {
            FunctionValue::Native(native) => native(self, &args).map_err(Signal::from),
            FunctionValue::UserDefined { params, closure, body } => {
                let call_env = closure.chain();
                let mut args = args.into_iter();
                for name in params.iter() {
                    call_env.define(name.clone(), args.next().unwrap_or(Value::Null));
                }
                let previous = std::mem::replace(&mut self.environment, call_env);
                let mut result = Ok(());
                for stmt in body.iter() {
                    match self.execute(stmt) {
                        Ok(()) => {}
                        Err(Signal::Return(v)) => {
                            result = Err(Signal::Return(v));
                            break;
                        }
                        Err(e) => {
                            result = Err(e);
                            break;
                        }
                    }
                }
                self.environment = previous;
                let value = match result {
                    Ok(()) => Value::Null,
                    Err(Signal::Return(v)) => v,
                    Err(e) => return Err(e),
                };
                self.check_when_conditions().map_err(Signal::from)?;
                let _ = line;
                Ok(value)
            }
        }
    }
}

fn paren_line(expr: &Expr) -> u32 {
    match expr {
        Expr::Variable { name } => name.line,
        _ => 0,
    }
}

fn as_integer(value: &Value, line: u32) -> Result<i64, RuntimeError> {
    match value {
        Value::Integer(i) => Ok(*i),
        _ => Err(RuntimeError::new("array index must be an integer", line)),
    }
}

/// `int<->float`, `number<->string`, `bool<->int(0/1)` (spec.md 4.3's
/// TypeCast rule); any other source/target pairing is a RuntimeError.
fn cast_value(target: &Type, value: Value) -> Result<Value, RuntimeError> {
    use crate::ast::PrimitiveKind::*;
    let prim = match target {
        Type::Primitive { kind, .. } => *kind,
        _ => return Err(RuntimeError::new("unsupported cast target type", 0)),
    };
    match (prim, value) {
        (Int, Value::Integer(i)) => Ok(Value::Integer(i)),
        (Int, Value::Float(f)) => Ok(Value::Integer(f as i64)),
        (Int, Value::Boolean(b)) => Ok(Value::Integer(if b { 1 } else { 0 })),
        (Int, Value::String(s)) => s
            .trim()
            .parse::<i64>()
            .map(Value::Integer)
            .map_err(|_| RuntimeError::new(format!("cannot cast '{}' to int", s), 0)),
        (Float, Value::Float(f)) => Ok(Value::Float(f)),
        (Float, Value::Integer(i)) => Ok(Value::Float(i as f64)),
        (Float, Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|_| RuntimeError::new(format!("cannot cast '{}' to float", s), 0)),
        (Bool, Value::Integer(i)) => Ok(Value::Boolean(i != 0)),
        (Bool, Value::Boolean(b)) => Ok(Value::Boolean(b)),
        (StringT, v @ Value::Integer(_)) | (StringT, v @ Value::Float(_)) | (StringT, v @ Value::Boolean(_)) => {
            Ok(Value::string(v.to_string()))
        }
        (StringT, v @ Value::String(_)) => Ok(v),
        (Char, Value::Integer(i)) => Ok(Value::Integer(i)),
        _ => Err(RuntimeError::new("unsupported type cast", 0)),
    }
}

/// Substitutes `{}` slots in `format` with `exprs` in slot order (spec.md
/// 6's `i"text with {slots}":{ expr; expr; }` grammar). Literal `{`/`}` that
/// aren't slot markers are not modeled — the reference grammar treats every
/// brace pair in the format text as a slot.
fn render_interpolated(format: &str, values: &[Value]) -> String {
    let mut out = String::new();
    let mut chars = format.chars().peekable();
    let mut slot = 0;
    while let Some(c) = chars.next() {
        if c == '{' {
            while let Some(&next) = chars.peek() {
                if next == '}' {
                    chars.next();
                    break;
                }
                chars.next();
            }
            if let Some(v) = values.get(slot) {
                out.push_str(&v.to_string());
            }
            slot += 1;
        } else {
            out.push(c);
        }
    }
    out
}

fn read_line_from_stdin() -> String {
    use std::io::BufRead;
    let mut line = String::new();
    let _ = std::io::stdin().lock().read_line(&mut line);
    line.trim_end_matches(['\n', '\r']).to_string()
}

/// AST nodes have no `Clone` derive (they're move-only once parsed); a
/// `FunctionDecl`'s body is re-parsed into its own `Rc<Vec<Stmt>>` at
/// declaration time by structurally rebuilding it, since closures need an
/// owned, independently-lived copy of their body distinct from the
/// enclosing declaration's AST arena.
fn clone_stmts(stmts: &[Stmt]) -> Vec<Stmt> {
    stmts.iter().map(clone_stmt).collect()
}

fn clone_stmt(stmt: &Stmt) -> Stmt {
    match stmt {
        Stmt::Expression(e) => Stmt::Expression(clone_expr(e)),
        Stmt::Block { stmts, is_volatile } => {
            Stmt::Block { stmts: clone_stmts(stmts), is_volatile: *is_volatile }
        }
        Stmt::VarDecl { var_type, name, init, is_volatile } => Stmt::VarDecl {
            var_type: var_type.clone(),
            name: name.clone(),
            init: init.as_ref().map(clone_expr),
            is_volatile: *is_volatile,
        },
        Stmt::If { cond, then_branch, else_branch } => Stmt::If {
            cond: clone_expr(cond),
            then_branch: Box::new(clone_stmt(then_branch)),
            else_branch: else_branch.as_ref().map(|s| Box::new(clone_stmt(s))),
        },
        Stmt::While { cond, body } => {
            Stmt::While { cond: clone_expr(cond), body: Box::new(clone_stmt(body)) }
        }
        Stmt::For { init, cond, incr, body } => Stmt::For {
            init: init.as_ref().map(|s| Box::new(clone_stmt(s))),
            cond: cond.as_ref().map(clone_expr),
            incr: incr.as_ref().map(clone_expr),
            body: Box::new(clone_stmt(body)),
        },
        Stmt::When { cond, body, is_volatile, is_async } => Stmt::When {
            cond: clone_expr(cond),
            body: Box::new(clone_stmt(body)),
            is_volatile: *is_volatile,
            is_async: *is_async,
        },
        Stmt::Asm { code } => Stmt::Asm { code: code.clone() },
        Stmt::FunctionDecl { return_type, name, params, body, is_volatile, is_async } => {
            Stmt::FunctionDecl {
                return_type: return_type.clone(),
                name: name.clone(),
                params: params.clone(),
                body: clone_stmts(body),
                is_volatile: *is_volatile,
                is_async: *is_async,
            }
        }
        Stmt::Return { value } => Stmt::Return { value: value.as_ref().map(clone_expr) },
        Stmt::Break => Stmt::Break,
        Stmt::Continue => Stmt::Continue,
        Stmt::ClassDecl { name, members } => {
            Stmt::ClassDecl { name: name.clone(), members: clone_stmts(members) }
        }
        Stmt::ObjectDecl { name, members } => {
            Stmt::ObjectDecl { name: name.clone(), members: clone_stmts(members) }
        }
        Stmt::NamespaceDecl { name, decls } => {
            Stmt::NamespaceDecl { name: name.clone(), decls: clone_stmts(decls) }
        }
        Stmt::StructDecl { name, fields } => {
            Stmt::StructDecl { name: name.clone(), fields: fields.clone() }
        }
        Stmt::OperatorDecl { left_type, right_type, op, body } => Stmt::OperatorDecl {
            left_type: left_type.clone(),
            right_type: right_type.clone(),
            op: op.clone(),
            body: clone_stmts(body),
        },
        Stmt::Lock { kind, scopes, body } => Stmt::Lock {
            kind: *kind,
            scopes: scopes.clone(),
            body: body.as_ref().map(|b| clone_stmts(b)),
        },
        Stmt::Print { args } => Stmt::Print { args: args.iter().map(clone_expr).collect() },
        Stmt::InputStmt { prompt, variable } => Stmt::InputStmt {
            prompt: prompt.as_ref().map(clone_expr),
            variable: variable.clone(),
        },
        Stmt::OpenStmt { filename, mode, variable } => Stmt::OpenStmt {
            filename: clone_expr(filename),
            mode: *mode,
            variable: variable.clone(),
        },
    }
}

fn clone_expr(expr: &Expr) -> Expr {
    match expr {
        Expr::IntegerLiteral { value, bit_width } => {
            Expr::IntegerLiteral { value: *value, bit_width: *bit_width }
        }
        Expr::FloatLiteral { value, bit_width } => {
            Expr::FloatLiteral { value: *value, bit_width: *bit_width }
        }
        Expr::BooleanLiteral(b) => Expr::BooleanLiteral(*b),
        Expr::CharLiteral(c) => Expr::CharLiteral(*c),
        Expr::StringLiteral(s) => Expr::StringLiteral(s.clone()),
        Expr::NullLiteral => Expr::NullLiteral,
        Expr::ArrayLiteral { elements } => {
            Expr::ArrayLiteral { elements: elements.iter().map(clone_expr).collect() }
        }
        Expr::CharArrayLiteral { chars } => Expr::CharArrayLiteral { chars: chars.clone() },
        Expr::Binary { left, op, right } => Expr::Binary {
            left: Box::new(clone_expr(left)),
            op: op.clone(),
            right: Box::new(clone_expr(right)),
        },
        Expr::Unary { op, right } => {
            Expr::Unary { op: op.clone(), right: Box::new(clone_expr(right)) }
        }
        Expr::Logical { left, op, right } => Expr::Logical {
            left: Box::new(clone_expr(left)),
            op: op.clone(),
            right: Box::new(clone_expr(right)),
        },
        Expr::Grouping { inner } => Expr::Grouping { inner: Box::new(clone_expr(inner)) },
        Expr::Variable { name } => Expr::Variable { name: name.clone() },
        Expr::Assign { name, value } => {
            Expr::Assign { name: name.clone(), value: Box::new(clone_expr(value)) }
        }
        Expr::Call { callee, paren, args } => Expr::Call {
            callee: Box::new(clone_expr(callee)),
            paren: paren.clone(),
            args: args.iter().map(clone_expr).collect(),
        },
        Expr::ArrayAccess { array, index } => Expr::ArrayAccess {
            array: Box::new(clone_expr(array)),
            index: Box::new(clone_expr(index)),
        },
        Expr::MemberAccess { object, op, member } => Expr::MemberAccess {
            object: Box::new(clone_expr(object)),
            op: op.clone(),
            member: member.clone(),
        },
        Expr::InterpolatedString { format, exprs } => Expr::InterpolatedString {
            format: format.clone(),
            exprs: exprs.iter().map(clone_expr).collect(),
        },
        Expr::TypeCast { target, inner } => {
            Expr::TypeCast { target: target.clone(), inner: Box::new(clone_expr(inner)) }
        }
        Expr::AddressOf { inner } => Expr::AddressOf { inner: Box::new(clone_expr(inner)) },
        Expr::Dereference { inner } => Expr::Dereference { inner: Box::new(clone_expr(inner)) },
        Expr::Input { prompt } => Expr::Input { prompt: prompt.as_ref().map(|p| Box::new(clone_expr(p))) },
        Expr::Open { filename, mode } => {
            Expr::Open { filename: Box::new(clone_expr(filename)), mode: Box::new(clone_expr(mode)) }
        }
    }
}

/// The fixed native builtin set named in spec.md 4.3: `print`, `to_string`,
/// `to_number`, `array`, `length`, plus the constants `true`/`false`/`null`.
/// Grounded in original_source/src/interpreter/environment.hpp's
/// `createGlobalEnvironment`.
fn install_builtins(env: &Environment) {
    env.define(
        "print",
        native("print", |_interp, args| {
            let parts: Vec<String> = args.iter().map(|v| v.to_string()).collect();
            println!("{}", parts.join(" "));
            Ok(Value::Null)
        }),
    );
    env.define(
        "to_string",
        native("to_string", |_interp, args| {
            Ok(Value::string(args.get(0).map(|v| v.to_string()).unwrap_or_default()))
        }),
    );
    env.define(
        "to_number",
        native("to_number", |_interp, args| {
            let v = match args.get(0) {
                Some(v) => v,
                None => return Ok(Value::Integer(0)),
            };
            Ok(match v {
                Value::Integer(_) | Value::Float(_) => v.clone(),
                Value::String(s) => {
                    if s.contains('.') {
                        s.parse::<f64>().map(Value::Float).unwrap_or(Value::Integer(0))
                    } else {
                        s.parse::<i64>().map(Value::Integer).unwrap_or(Value::Integer(0))
                    }
                }
                _ => Value::Integer(0),
            })
        }),
    );
    env.define(
        "array",
        native("array", |_interp, args| {
            Ok(Value::Object(Rc::new(std::cell::RefCell::new(Object::ArrayObject {
                values: args.to_vec(),
            }))))
        }),
    );
    env.define(
        "length",
        native("length", |_interp, args| {
            Ok(match args.get(0) {
                Some(Value::String(s)) => Value::Integer(s.chars().count() as i64),
                Some(Value::Object(o)) => match &*o.borrow() {
                    Object::ArrayObject { values } => Value::Integer(values.len() as i64),
                    _ => Value::Integer(0),
                },
                _ => Value::Integer(0),
            })
        }),
    );
    env.define("true", Value::Boolean(true));
    env.define("false", Value::Boolean(false));
    env.define("null", Value::Null);
}

fn native(
    _name: &'static str,
    f: impl Fn(&mut Interpreter, &[Value]) -> Result<Value, RuntimeError> + 'static,
) -> Value {
    Value::Function(Rc::new(FunctionValue::Native(Rc::new(f))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;
    use crate::parser::Parser;

    fn run(src: &str) -> Result<Value, RuntimeError> {
        let tokens = Lexer::new(src).scan_tokens().unwrap();
        let stmts = Parser::new(tokens).parse_program().unwrap();
        Interpreter::new().interpret(&stmts)
    }

    #[test]
    fn arithmetic_precedence() {
        assert!(matches!(run("return 2 + 3 * 4;").unwrap(), Value::Integer(14)));
    }

    #[test]
    fn integer_modulo() {
        assert!(matches!(run("return 10 % 3;").unwrap(), Value::Integer(1)));
    }

    #[test]
    fn division_by_zero_is_runtime_error() {
        assert!(run("return 1 / 0;").is_err());
    }

    #[test]
    fn mixed_arithmetic_promotes_to_float() {
        match run("return 1 + 2.5;").unwrap() {
            Value::Float(f) => assert!((f - 3.5).abs() < 1e-9),
            other => panic!("expected float, got {:?}", other),
        }
    }

    #[test]
    fn closure_captures_declaring_scope() {
        let v = run(
            "int make() { int x = 10; int get() { return x; }; return get; }; int f = make(); return f();",
        )
        .unwrap();
        assert!(matches!(v, Value::Integer(10)));
    }

    #[test]
    fn when_block_fires_at_checkpoint() {
        let v = run("int x = 0; when (x < 10) { x = x + 1; }; return x;").unwrap();
        assert!(matches!(v, Value::Integer(1)));
    }

    #[test]
    fn volatile_when_fires_at_most_once() {
        let v = run(
            "int x = 0; when (x < 10) volatile { x = x + 1; }; x = x; x = x; return x;",
        )
        .unwrap();
        assert!(matches!(v, Value::Integer(1)));
    }

    #[test]
    fn non_volatile_when_fires_each_checkpoint() {
        let v = run("int x = 0; when (x < 3) { x = x + 1; }; x; x; return x;").unwrap();
        assert!(matches!(v, Value::Integer(3)));
    }

    #[test]
    fn class_method_dispatch_through_field_map() {
        let v = run("class Foo { int x = 1; function get() { return x; }; }; return Foo.get();").unwrap();
        assert!(matches!(v, Value::Integer(1)));
    }

    #[test]
    fn string_concatenation() {
        match run(r#"return "a" + "b";"#).unwrap() {
            Value::String(s) => assert_eq!(s.as_str(), "ab"),
            other => panic!("expected string, got {:?}", other),
        }
    }

    #[test]
    fn array_index_and_length() {
        let v = run("int a = array(1, 2, 3); return length(a);").unwrap();
        assert!(matches!(v, Value::Integer(3)));
    }

    #[test]
    fn type_cast_int_to_float() {
        match run("return float:5;").unwrap() {
            Value::Float(f) => assert!((f - 5.0).abs() < 1e-9),
            other => panic!("expected float, got {:?}", other),
        }
    }

    #[test]
    fn undefined_variable_is_runtime_error() {
        assert!(run("return missing;").is_err());
    }

    #[test]
    fn struct_decl_has_no_runtime_side_effect() {
        assert!(run("struct Pair { int a; int b; }; return 1;").is_ok());
    }

    #[test]
    fn namespace_flattens_into_tagged_object() {
        let v = run("namespace N { int a = 5; }; return N.a;").unwrap();
        assert!(matches!(v, Value::Integer(5)));
    }
}
