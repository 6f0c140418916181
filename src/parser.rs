// Token stream -> AST. Recursive descent with precedence climbing for
// expressions and speculative lookahead-with-rewind for declaration
// disambiguation, grounded in original_source/src/parser/parser.cpp.
//
// The cursor is a plain index into an immutable token vector (spec.md
// section 9: "save/restore is trivial, do not buffer or re-lex").

use crate::ast::{Expr, LockKind, OpenMode, PrimitiveKind, Stmt, Type};
use crate::error::ParseError;
use crate::token::{Token, TokenKind};

type ParseResult<T> = Result<T, ParseError>;

pub struct Parser {
    tokens: Vec<Token>,
    current: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Parser { tokens, current: 0 }
    }

    pub fn parse_program(mut self) -> ParseResult<Vec<Stmt>> {
        let mut stmts = Vec::new();
        while !self.is_at_end() {
            stmts.push(self.declaration()?);
        }
        Ok(stmts)
    }

    // --- cursor mechanics ---------------------------------------------

    fn save(&self) -> usize {
        self.current
    }

    fn restore(&mut self, pos: usize) {
        self.current = pos;
    }

    fn is_at_end(&self) -> bool {
        self.peek().kind == TokenKind::Eof
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.current]
    }

    fn peek_next(&self) -> Option<&Token> {
        self.tokens.get(self.current + 1)
    }

    fn previous(&self) -> &Token {
        &self.tokens[self.current - 1]
    }

    fn advance(&mut self) -> &Token {
        if !self.is_at_end() {
            self.current += 1;
        }
        self.previous()
    }

    fn check(&self, kind: TokenKind) -> bool {
        !self.is_at_end() && self.peek().kind == kind
    }

    fn match_kind(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn consume(&mut self, kind: TokenKind, message: &str) -> ParseResult<&Token> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(ParseError::new(message.to_string(), self.peek().line))
        }
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError::new(message.into(), self.peek().line)
    }

    /// Skip tokens until the next `;` or a top-level keyword, per spec.md
    /// section 7's declaration-boundary recovery policy.
    fn synchronize(&mut self) {
        self.advance();
        while !self.is_at_end() {
            if self.previous().kind == TokenKind::Semicolon {
                return;
            }
            match self.peek().kind {
                TokenKind::Class
                | TokenKind::Function
                | TokenKind::For
                | TokenKind::If
                | TokenKind::While
                | TokenKind::Return => return,
                _ => {
                    self.advance();
                }
            }
        }
    }

    // --- declarations ---------------------------------------------------

    fn declaration(&mut self) -> ParseResult<Stmt> {
        let result = self.declaration_inner();
        if result.is_err() {
            self.synchronize();
        }
        result
    }

    fn declaration_inner(&mut self) -> ParseResult<Stmt> {
        if self.check(TokenKind::Class) {
            return self.class_declaration();
        }
        if self.check(TokenKind::Object) {
            return self.object_declaration();
        }
        if self.check(TokenKind::Namespace) {
            return self.namespace_declaration();
        }
        if self.check(TokenKind::Struct) {
            return self.struct_declaration();
        }
        if self.check(TokenKind::Operator) {
            return self.operator_declaration();
        }
        if self.check(TokenKind::When) {
            return self.when_statement(false);
        }
        if self.check(TokenKind::Async) && matches!(self.peek_next().map(|t| t.kind), Some(TokenKind::When)) {
            self.advance();
            return self.when_statement(true);
        }
        if matches!(self.peek().kind, TokenKind::Lock | TokenKind::DunderLock | TokenKind::LockDunder) {
            if let Some(stmt) = self.try_lock_statement()? {
                return Ok(stmt);
            }
        }
        // `volatile`/`async` may prefix a function or variable declaration
        // in either order (original_source's functionDeclaration() matches
        // ASYNC first; this parser additionally accepts VOLATILE first).
        if matches!(self.peek().kind, TokenKind::Volatile | TokenKind::Async) {
            let mut is_volatile = false;
            let mut is_async = false;
            while matches!(self.peek().kind, TokenKind::Volatile | TokenKind::Async) {
                if self.match_kind(TokenKind::Volatile) {
                    is_volatile = true;
                } else {
                    self.advance();
                    is_async = true;
                }
            }
            return self.var_or_function_declaration(is_volatile, is_async);
        }

        // Speculative type-first parse disambiguates function/var decl
        // from a plain expression statement (spec.md section 4.2.1).
        let start = self.save();
        if self.try_parse_type().is_some() {
            if self.check(TokenKind::Identifier) {
                let after_name = self.save();
                self.advance();
                if self.check(TokenKind::LeftParen) {
                    self.restore(start);
                    return self.var_or_function_declaration(false, false);
                }
                if self.check(TokenKind::Equal) || self.check(TokenKind::Semicolon) {
                    self.restore(start);
                    return self.var_or_function_declaration(false, false);
                }
                self.restore(after_name);
            }
        }
        self.restore(start);
        self.statement()
    }

    /// Attempts to parse a Type at the current position; returns `None`
    /// (with the cursor rewound) on failure, for use by speculative
    /// disambiguation call sites.
    fn try_parse_type(&mut self) -> Option<Type> {
        let start = self.save();
        match self.parse_type() {
            Ok(t) => Some(t),
            Err(_) => {
                self.restore(start);
                None
            }
        }
    }

    fn parse_type(&mut self) -> ParseResult<Type> {
        let base = if self.match_kind(TokenKind::Int) {
            PrimitiveKind::Int
        } else if self.match_kind(TokenKind::FloatType) {
            PrimitiveKind::Float
        } else if self.match_kind(TokenKind::CharType) {
            PrimitiveKind::Char
        } else if self.match_kind(TokenKind::Bool) {
            PrimitiveKind::Bool
        } else if self.match_kind(TokenKind::Void) {
            PrimitiveKind::Void
        } else if self.check(TokenKind::Identifier) && self.peek().lexeme == "string" {
            self.advance();
            PrimitiveKind::StringT
        } else if self.check(TokenKind::Identifier) {
            let name = self.advance().lexeme.clone();
            return self.parse_type_suffixes(Type::Class { name });
        } else {
            return Err(self.error("expected type"));
        };

        let mut ty = Type::Primitive { kind: base, bit_width: None };
        if self.match_kind(TokenKind::LeftBrace) {
            let width_tok = self.consume(TokenKind::Integer, "expected bit-width integer")?.clone();
            let width: u32 = width_tok
                .lexeme
                .parse()
                .map_err(|_| ParseError::new("invalid bit-width literal", width_tok.line))?;
            self.consume(TokenKind::RightBrace, "expected '}' after bit-width")?;
            if let Type::Primitive { bit_width, .. } = &mut ty {
                *bit_width = Some(width);
            }
        }
        self.parse_type_suffixes(ty)
    }

    fn parse_type_suffixes(&mut self, mut ty: Type) -> ParseResult<Type> {
        loop {
            if self.match_kind(TokenKind::Star) {
                ty = Type::Pointer { pointee: Box::new(ty) };
            } else if self.match_kind(TokenKind::LeftBracket) {
                let size = if self.check(TokenKind::Integer) {
                    let tok = self.advance().clone();
                    Some(tok.lexeme.parse().unwrap_or(0))
                } else {
                    None
                };
                self.consume(TokenKind::RightBracket, "expected ']' after array size")?;
                ty = Type::Array { element: Box::new(ty), size };
            } else {
                return Ok(ty);
            }
        }
    }

    fn var_or_function_declaration(&mut self, is_volatile: bool, is_async: bool) -> ParseResult<Stmt> {
        let var_type = self.parse_type()?;
        let name = self.consume(TokenKind::Identifier, "expected name")?.clone();

        if self.match_kind(TokenKind::LeftParen) {
            let mut params = Vec::new();
            if !self.check(TokenKind::RightParen) {
                loop {
                    let ptype = self.parse_type()?;
                    let pname = self.consume(TokenKind::Identifier, "expected parameter name")?.clone();
                    params.push((ptype, pname));
                    if !self.match_kind(TokenKind::Comma) {
                        break;
                    }
                }
            }
            self.consume(TokenKind::RightParen, "expected ')' after parameters")?;
            self.consume(TokenKind::LeftBrace, "expected '{' before function body")?;
            let body = self.block_contents()?;
            self.consume(TokenKind::Semicolon, "expected ';' after function declaration")?;
            return Ok(Stmt::FunctionDecl {
                return_type: var_type,
                name,
                params,
                body,
                is_volatile,
                is_async,
            });
        }

        let init = if self.match_kind(TokenKind::Equal) {
            Some(self.expression()?)
        } else {
            None
        };
        self.consume(TokenKind::Semicolon, "expected ';' after variable declaration")?;
        Ok(Stmt::VarDecl { var_type, name, init, is_volatile })
    }

    fn class_declaration(&mut self) -> ParseResult<Stmt> {
        self.advance();
        let name = self.consume(TokenKind::Identifier, "expected class name")?.clone();
        self.consume(TokenKind::LeftBrace, "expected '{' after class name")?;
        let members = self.aggregate_members()?;
        self.consume(TokenKind::Semicolon, "expected ';' after class body")?;
        Ok(Stmt::ClassDecl { name, members })
    }

    fn object_declaration(&mut self) -> ParseResult<Stmt> {
        self.advance();
        let name = self.consume(TokenKind::Identifier, "expected object name")?.clone();
        self.consume(TokenKind::LeftBrace, "expected '{' after object name")?;
        let members = self.aggregate_members()?;
        self.consume(TokenKind::Semicolon, "expected ';' after object body")?;
        Ok(Stmt::ObjectDecl { name, members })
    }

    fn namespace_declaration(&mut self) -> ParseResult<Stmt> {
        self.advance();
        let name = self.consume(TokenKind::Identifier, "expected namespace name")?.clone();
        self.consume(TokenKind::LeftBrace, "expected '{' after namespace name")?;
        let mut decls = Vec::new();
        while !self.check(TokenKind::RightBrace) && !self.is_at_end() {
            decls.push(self.declaration()?);
        }
        self.consume(TokenKind::RightBrace, "expected '}' to close namespace")?;
        self.consume(TokenKind::Semicolon, "expected ';' after namespace body")?;
        Ok(Stmt::NamespaceDecl { name, decls })
    }

    /// Members are function or variable declarations only (spec.md 4.2.3);
    /// any other leading token is a ParseError.
    fn aggregate_members(&mut self) -> ParseResult<Vec<Stmt>> {
        let mut members = Vec::new();
        while !self.check(TokenKind::RightBrace) && !self.is_at_end() {
            if self.check(TokenKind::Function) {
                self.advance();
                members.push(self.function_member()?);
                continue;
            }
            let start = self.save();
            if self.try_parse_type().is_some() && self.check(TokenKind::Identifier) {
                self.restore(start);
                members.push(self.var_or_function_declaration(false, false)?);
                continue;
            }
            self.restore(start);
            return Err(self.error("expected member declaration inside aggregate body"));
        }
        self.consume(TokenKind::RightBrace, "expected '}' to close aggregate body")?;
        Ok(members)
    }

    fn function_member(&mut self) -> ParseResult<Stmt> {
        let return_type = Type::Primitive { kind: PrimitiveKind::Void, bit_width: None };
        let name = self.consume(TokenKind::Identifier, "expected function name")?.clone();
        self.consume(TokenKind::LeftParen, "expected '(' after function name")?;
        let mut params = Vec::new();
        if !self.check(TokenKind::RightParen) {
            loop {
                let ptype = self.parse_type()?;
                let pname = self.consume(TokenKind::Identifier, "expected parameter name")?.clone();
                params.push((ptype, pname));
                if !self.match_kind(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RightParen, "expected ')' after parameters")?;
        self.consume(TokenKind::LeftBrace, "expected '{' before function body")?;
        let body = self.block_contents()?;
        self.consume(TokenKind::Semicolon, "expected ';' after function declaration")?;
        Ok(Stmt::FunctionDecl {
            return_type,
            name,
            params,
            body,
            is_volatile: false,
            is_async: false,
        })
    }

    fn struct_declaration(&mut self) -> ParseResult<Stmt> {
        self.advance();
        let name = self.consume(TokenKind::Identifier, "expected struct name")?.clone();
        self.consume(TokenKind::LeftBrace, "expected '{' after struct name")?;
        let mut fields = Vec::new();
        while !self.check(TokenKind::RightBrace) && !self.is_at_end() {
            let ftype = self.parse_type()?;
            let fname = self.consume(TokenKind::Identifier, "expected field name")?.clone();
            self.consume(TokenKind::Semicolon, "expected ';' after struct field")?;
            fields.push((ftype, fname));
        }
        self.consume(TokenKind::RightBrace, "expected '}' to close struct body")?;
        self.consume(TokenKind::Semicolon, "expected ';' after struct body")?;
        Ok(Stmt::StructDecl { name, fields })
    }

    /// `operator(T1, T2)[sym] { ... };` — spec.md 4.2.4.
    fn operator_declaration(&mut self) -> ParseResult<Stmt> {
        self.advance();
        self.consume(TokenKind::LeftParen, "expected '(' after 'operator'")?;
        let left_type = self.parse_type()?;
        self.consume(TokenKind::Comma, "expected ',' between operand types")?;
        let right_type = self.parse_type()?;
        self.consume(TokenKind::RightParen, "expected ')' after operand types")?;
        self.consume(TokenKind::LeftBracket, "expected '[' before operator symbol")?;
        let op = self.advance().clone();
        self.consume(TokenKind::RightBracket, "expected ']' after operator symbol")?;
        self.consume(TokenKind::LeftBrace, "expected '{' before operator body")?;
        let body = self.block_contents()?;
        self.consume(TokenKind::Semicolon, "expected ';' after operator body")?;
        Ok(Stmt::OperatorDecl { left_type, right_type, op, body })
    }

    /// `when (cond) [volatile] body;` / `async when (cond) body;` (4.2.5).
    fn when_statement(&mut self, is_async: bool) -> ParseResult<Stmt> {
        self.advance();
        self.consume(TokenKind::LeftParen, "expected '(' after 'when'")?;
        let cond = self.expression()?;
        self.consume(TokenKind::RightParen, "expected ')' after when condition")?;
        let is_volatile = self.match_kind(TokenKind::Volatile);
        let body = Box::new(self.statement_as_block()?);
        self.consume(TokenKind::Semicolon, "expected ';' after when body")?;
        Ok(Stmt::When { cond, body, is_volatile, is_async })
    }

    /// One token of lookahead distinguishes a `lock(...)` statement from a
    /// `lock`-prefixed call used inside an expression (original's
    /// `statement()` backs up and branches to expressionStatement when the
    /// next-next token isn't the lock-form shape). Returns `Ok(None)` when
    /// this isn't a lock statement so the caller falls through.
    fn try_lock_statement(&mut self) -> ParseResult<Option<Stmt>> {
        let start = self.save();
        let kind = match self.peek().kind {
            TokenKind::Lock => LockKind::Lock,
            TokenKind::DunderLock => LockKind::PreLock,
            TokenKind::LockDunder => LockKind::PostLock,
            _ => return Ok(None),
        };
        self.advance();
        if !self.check(TokenKind::Identifier) {
            self.restore(start);
            return Ok(None);
        }
        let mut scopes = vec![self.advance().clone()];
        while self.match_kind(TokenKind::ScopeResolution) {
            scopes.push(self.consume(TokenKind::Identifier, "expected scope name after '::'")?.clone());
        }
        let body = if self.match_kind(TokenKind::LeftBrace) {
            Some(self.block_contents()?)
        } else {
            None
        };
        self.consume(TokenKind::Semicolon, "expected ';' after lock statement")?;
        Ok(Some(Stmt::Lock { kind, scopes, body }))
    }

    // --- statements ------------------------------------------------------

    fn statement(&mut self) -> ParseResult<Stmt> {
        if self.match_kind(TokenKind::LeftBrace) {
            return self.block_statement(false);
        }
        if self.match_kind(TokenKind::If) {
            return self.if_statement();
        }
        if self.match_kind(TokenKind::While) {
            return self.while_statement();
        }
        if self.match_kind(TokenKind::For) {
            return self.for_statement();
        }
        if self.match_kind(TokenKind::Return) {
            return self.return_statement();
        }
        if self.match_kind(TokenKind::Break) {
            self.consume(TokenKind::Semicolon, "expected ';' after 'break'")?;
            return Ok(Stmt::Break);
        }
        if self.match_kind(TokenKind::Continue) {
            self.consume(TokenKind::Semicolon, "expected ';' after 'continue'")?;
            return Ok(Stmt::Continue);
        }
        if self.match_kind(TokenKind::Asm) {
            return self.asm_statement();
        }
        if self.match_kind(TokenKind::Print) {
            return self.print_statement();
        }
        if self.check(TokenKind::Input) {
            return self.input_statement();
        }
        self.expression_statement()
    }

    /// Used by `when`/loops where the grammar allows either a block or a
    /// single statement, wrapped in a synthetic block (spec.md 4.2.5).
    fn statement_as_block(&mut self) -> ParseResult<Stmt> {
        if self.match_kind(TokenKind::LeftBrace) {
            self.block_statement(false)
        } else {
            let stmt = self.statement()?;
            Ok(Stmt::Block { stmts: vec![stmt], is_volatile: false })
        }
    }

    fn block_contents(&mut self) -> ParseResult<Vec<Stmt>> {
        let mut stmts = Vec::new();
        while !self.check(TokenKind::RightBrace) && !self.is_at_end() {
            stmts.push(self.declaration()?);
        }
        self.consume(TokenKind::RightBrace, "expected '}' to close block")?;
        Ok(stmts)
    }

    fn block_statement(&mut self, is_volatile: bool) -> ParseResult<Stmt> {
        let stmts = self.block_contents()?;
        Ok(Stmt::Block { stmts, is_volatile })
    }

    fn if_statement(&mut self) -> ParseResult<Stmt> {
        self.consume(TokenKind::LeftParen, "expected '(' after 'if'")?;
        let cond = self.expression()?;
        self.consume(TokenKind::RightParen, "expected ')' after if condition")?;
        let then_branch = Box::new(self.statement()?);
        let else_branch = if self.match_kind(TokenKind::Else) {
            Some(Box::new(self.statement()?))
        } else {
            None
        };
        Ok(Stmt::If { cond, then_branch, else_branch })
    }

    fn while_statement(&mut self) -> ParseResult<Stmt> {
        self.consume(TokenKind::LeftParen, "expected '(' after 'while'")?;
        let cond = self.expression()?;
        self.consume(TokenKind::RightParen, "expected ')' after while condition")?;
        let body = Box::new(self.statement()?);
        Ok(Stmt::While { cond, body })
    }

    fn for_statement(&mut self) -> ParseResult<Stmt> {
        self.consume(TokenKind::LeftParen, "expected '(' after 'for'")?;
        let init = if self.match_kind(TokenKind::Semicolon) {
            None
        } else {
            Some(Box::new(self.declaration_inner()?))
        };
        let cond = if !self.check(TokenKind::Semicolon) {
            Some(self.expression()?)
        } else {
            None
        };
        self.consume(TokenKind::Semicolon, "expected ';' after for condition")?;
        let incr = if !self.check(TokenKind::RightParen) {
            Some(self.expression()?)
        } else {
            None
        };
        self.consume(TokenKind::RightParen, "expected ')' after for clauses")?;
        let body = Box::new(self.statement()?);
        Ok(Stmt::For { init, cond, incr, body })
    }

    fn return_statement(&mut self) -> ParseResult<Stmt> {
        let value = if !self.check(TokenKind::Semicolon) {
            Some(self.expression()?)
        } else {
            None
        };
        self.consume(TokenKind::Semicolon, "expected ';' after return value")?;
        Ok(Stmt::Return { value })
    }

    fn asm_statement(&mut self) -> ParseResult<Stmt> {
        self.consume(TokenKind::LeftBrace, "expected '{' after 'asm'")?;
        let mut depth = 1usize;
        let mut code = String::new();
        while depth > 0 {
            if self.is_at_end() {
                return Err(self.error("unterminated asm block"));
            }
            let tok = self.advance();
            match tok.kind {
                TokenKind::LeftBrace => depth += 1,
                TokenKind::RightBrace => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                }
                _ => {}
            }
            if depth > 0 {
                if !code.is_empty() {
                    code.push(' ');
                }
                code.push_str(&tok.lexeme);
            }
        }
        self.consume(TokenKind::Semicolon, "expected ';' after asm block")?;
        Ok(Stmt::Asm { code })
    }

    fn print_statement(&mut self) -> ParseResult<Stmt> {
        self.consume(TokenKind::LeftParen, "expected '(' after 'print'")?;
        let mut args = Vec::new();
        if !self.check(TokenKind::RightParen) {
            loop {
                args.push(self.expression()?);
                if !self.match_kind(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RightParen, "expected ')' after print arguments")?;
        self.consume(TokenKind::Semicolon, "expected ';' after print statement")?;
        Ok(Stmt::Print { args })
    }

    fn input_statement(&mut self) -> ParseResult<Stmt> {
        self.advance();
        self.consume(TokenKind::LeftParen, "expected '(' after 'input'")?;
        let prompt = if !self.check(TokenKind::RightParen) {
            Some(self.expression()?)
        } else {
            None
        };
        self.consume(TokenKind::RightParen, "expected ')' after input arguments")?;
        let variable = if self.match_kind(TokenKind::Arrow) {
            Some(self.consume(TokenKind::Identifier, "expected variable after '->'")?.clone())
        } else {
            None
        };
        self.consume(TokenKind::Semicolon, "expected ';' after input statement")?;
        Ok(Stmt::InputStmt { prompt, variable })
    }

    fn expression_statement(&mut self) -> ParseResult<Stmt> {
        let expr = self.expression()?;
        self.consume(TokenKind::Semicolon, "expected ';' after expression")?;
        Ok(Stmt::Expression(expr))
    }

    // --- expressions (precedence climbing, low to high; 4.2.2) ---------

    fn expression(&mut self) -> ParseResult<Expr> {
        self.assignment()
    }

    fn assignment(&mut self) -> ParseResult<Expr> {
        let expr = self.logical_or()?;

        if matches!(
            self.peek().kind,
            TokenKind::Equal
                | TokenKind::PlusEqual
                | TokenKind::MinusEqual
                | TokenKind::StarEqual
                | TokenKind::SlashEqual
                | TokenKind::PercentEqual
        ) {
            let op = self.advance().clone();
            let value = self.assignment()?;
            return self.build_assignment(expr, op, value);
        }
        Ok(expr)
    }

    fn build_assignment(&self, target: Expr, op: Token, value: Expr) -> ParseResult<Expr> {
        let value = if op.kind == TokenKind::Equal {
            value
        } else {
            let arith_op = Token::new(
                match op.kind {
                    TokenKind::PlusEqual => TokenKind::Plus,
                    TokenKind::MinusEqual => TokenKind::Minus,
                    TokenKind::StarEqual => TokenKind::Star,
                    TokenKind::SlashEqual => TokenKind::Slash,
                    TokenKind::PercentEqual => TokenKind::Percent,
                    _ => unreachable!(),
                },
                op.lexeme.trim_end_matches('=').to_string(),
                op.line,
            );
            Expr::Binary { left: Box::new(clone_expr_shallow(&target)), op: arith_op, right: Box::new(value) }
        };

        match target {
            Expr::Variable { name } => Ok(Expr::Assign { name, value: Box::new(value) }),
            Expr::MemberAccess { object, op: mop, member } => Ok(Expr::Call {
                callee: Box::new(Expr::Variable {
                    name: Token::new(TokenKind::Identifier, "__set_member".to_string(), mop.line),
                }),
                paren: mop,
                args: vec![*object, Expr::StringLiteral(member.lexeme), value],
            }),
            Expr::ArrayAccess { array, index } => Ok(Expr::Call {
                callee: Box::new(Expr::Variable {
                    name: Token::new(TokenKind::Identifier, "__set_index".to_string(), 0),
                }),
                paren: Token::new(TokenKind::Equal, "=".to_string(), 0),
                args: vec![*array, *index, value],
            }),
            _ => Err(ParseError::new("invalid assignment target", op.line)),
        }
    }

    fn logical_or(&mut self) -> ParseResult<Expr> {
        let mut expr = self.logical_and()?;
        while self.check(TokenKind::Or) {
            let op = self.advance().clone();
            let right = self.logical_and()?;
            expr = Expr::Logical { left: Box::new(expr), op, right: Box::new(right) };
        }
        Ok(expr)
    }

    fn logical_and(&mut self) -> ParseResult<Expr> {
        let mut expr = self.equality()?;
        while self.check(TokenKind::And) {
            let op = self.advance().clone();
            let right = self.equality()?;
            expr = Expr::Logical { left: Box::new(expr), op, right: Box::new(right) };
        }
        Ok(expr)
    }

    fn equality(&mut self) -> ParseResult<Expr> {
        let mut expr = self.comparison()?;
        while matches!(self.peek().kind, TokenKind::BangEqual | TokenKind::EqualEqual | TokenKind::Is) {
            let op = self.advance().clone();
            let right = self.comparison()?;
            expr = Expr::Binary { left: Box::new(expr), op, right: Box::new(right) };
        }
        Ok(expr)
    }

    fn comparison(&mut self) -> ParseResult<Expr> {
        let mut expr = self.term()?;
        while matches!(
            self.peek().kind,
            TokenKind::Less | TokenKind::LessEqual | TokenKind::Greater | TokenKind::GreaterEqual
        ) {
            let op = self.advance().clone();
            let right = self.term()?;
            expr = Expr::Binary { left: Box::new(expr), op, right: Box::new(right) };
        }
        Ok(expr)
    }

    fn term(&mut self) -> ParseResult<Expr> {
        let mut expr = self.factor()?;
        while matches!(self.peek().kind, TokenKind::Plus | TokenKind::Minus) {
            let op = self.advance().clone();
            let right = self.factor()?;
            expr = Expr::Binary { left: Box::new(expr), op, right: Box::new(right) };
        }
        Ok(expr)
    }

    fn factor(&mut self) -> ParseResult<Expr> {
        let mut expr = self.unary()?;
        while matches!(self.peek().kind, TokenKind::Star | TokenKind::Slash | TokenKind::Percent) {
            let op = self.advance().clone();
            let right = self.unary()?;
            expr = Expr::Binary { left: Box::new(expr), op, right: Box::new(right) };
        }
        Ok(expr)
    }

    fn unary(&mut self) -> ParseResult<Expr> {
        if matches!(self.peek().kind, TokenKind::Bang | TokenKind::Minus | TokenKind::Tilde) {
            let op = self.advance().clone();
            let right = self.unary()?;
            return Ok(Expr::Unary { op, right: Box::new(right) });
        }
        if self.check(TokenKind::At) {
            self.advance();
            let inner = self.unary()?;
            return Ok(Expr::AddressOf { inner: Box::new(inner) });
        }
        if self.check(TokenKind::Star) {
            self.advance();
            let inner = self.unary()?;
            return Ok(Expr::Dereference { inner: Box::new(inner) });
        }
        self.call()
    }

    fn call(&mut self) -> ParseResult<Expr> {
        let mut expr = self.primary()?;
        loop {
            if self.match_kind(TokenKind::LeftParen) {
                let paren_line = self.previous().line;
                let mut args = Vec::new();
                if !self.check(TokenKind::RightParen) {
                    loop {
                        args.push(self.expression()?);
                        if !self.match_kind(TokenKind::Comma) {
                            break;
                        }
                    }
                }
                let paren = self.consume(TokenKind::RightParen, "expected ')' after arguments")?.clone();
                let _ = paren_line;
                expr = Expr::Call { callee: Box::new(expr), paren, args };
            } else if self.match_kind(TokenKind::LeftBracket) {
                let index = self.expression()?;
                self.consume(TokenKind::RightBracket, "expected ']' after index")?;
                expr = Expr::ArrayAccess { array: Box::new(expr), index: Box::new(index) };
            } else if matches!(self.peek().kind, TokenKind::Dot | TokenKind::Arrow) {
                let op = self.advance().clone();
                let member = self.consume(TokenKind::Identifier, "expected member name")?.clone();
                expr = Expr::MemberAccess { object: Box::new(expr), op, member };
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn primary(&mut self) -> ParseResult<Expr> {
        if self.match_kind(TokenKind::True) {
            return Ok(Expr::BooleanLiteral(true));
        }
        if self.match_kind(TokenKind::False) {
            return Ok(Expr::BooleanLiteral(false));
        }
        if self.match_kind(TokenKind::NullLiteral) {
            return Ok(Expr::NullLiteral);
        }
        if self.check(TokenKind::Integer) {
            return self.integer_literal();
        }
        if self.check(TokenKind::Float) {
            return self.float_literal();
        }
        if self.check(TokenKind::Char) {
            return self.char_literal();
        }
        if self.check(TokenKind::String) {
            return self.string_literal();
        }
        if self.check(TokenKind::InterpolatedStringStart) {
            return self.interpolated_string();
        }
        if self.match_kind(TokenKind::LeftBracket) {
            let mut elements = Vec::new();
            if !self.check(TokenKind::RightBracket) {
                loop {
                    elements.push(self.expression()?);
                    if !self.match_kind(TokenKind::Comma) {
                        break;
                    }
                }
            }
            self.consume(TokenKind::RightBracket, "expected ']' after array literal")?;
            if !elements.is_empty() && elements.iter().all(|e| matches!(e, Expr::CharLiteral(_))) {
                let chars = elements
                    .into_iter()
                    .map(|e| match e {
                        Expr::CharLiteral(c) => c,
                        _ => unreachable!(),
                    })
                    .collect();
                return Ok(Expr::CharArrayLiteral { chars });
            }
            return Ok(Expr::ArrayLiteral { elements });
        }
        if self.match_kind(TokenKind::Input) {
            let prompt = if self.match_kind(TokenKind::LeftParen) {
                let p = if !self.check(TokenKind::RightParen) {
                    Some(Box::new(self.expression()?))
                } else {
                    None
                };
                self.consume(TokenKind::RightParen, "expected ')' after input()")?;
                p
            } else {
                None
            };
            return Ok(Expr::Input { prompt });
        }
        if self.match_kind(TokenKind::LeftParen) {
            let inner = self.expression()?;
            self.consume(TokenKind::RightParen, "expected ')' after expression")?;
            return Ok(Expr::Grouping { inner: Box::new(inner) });
        }

        // Type-cast `Type:expr` vs. plain identifier reference (4.2.1).
        let start = self.save();
        if let Some(ty) = self.try_parse_type() {
            if self.check(TokenKind::Colon) {
                self.advance();
                let inner = self.unary()?;
                return Ok(Expr::TypeCast { target: ty, inner: Box::new(inner) });
            }
        }
        self.restore(start);

        if self.check(TokenKind::Identifier) {
            let name = self.advance().clone();
            return Ok(Expr::Variable { name });
        }

        Err(self.error("expected expression"))
    }

    fn integer_literal(&mut self) -> ParseResult<Expr> {
        let tok = self.advance().clone();
        let (digits, bit_width) = split_numeric_suffix(&tok.lexeme);
        let value = parse_integer_lexeme(&digits)
            .map_err(|_| ParseError::new(format!("invalid integer literal '{}'", tok.lexeme), tok.line))?;
        Ok(Expr::IntegerLiteral { value, bit_width })
    }

    fn float_literal(&mut self) -> ParseResult<Expr> {
        let tok = self.advance().clone();
        let (digits, bit_width) = split_numeric_suffix(&tok.lexeme);
        let value: f64 = digits
            .trim_end_matches(|c| c == 'f' || c == 'F' || c == 'l' || c == 'L')
            .parse()
            .map_err(|_| ParseError::new(format!("invalid float literal '{}'", tok.lexeme), tok.line))?;
        Ok(Expr::FloatLiteral { value, bit_width })
    }

    fn char_literal(&mut self) -> ParseResult<Expr> {
        let tok = self.advance().clone();
        let inner = tok.lexeme.trim_start_matches('\'').trim_end_matches('\'');
        let c = inner.chars().next().unwrap_or('\0');
        Ok(Expr::CharLiteral(c))
    }

    fn string_literal(&mut self) -> ParseResult<Expr> {
        let tok = self.advance().clone();
        let inner = tok.lexeme.trim_start_matches('"').trim_end_matches('"').to_string();
        Ok(Expr::StringLiteral(inner))
    }

    /// `i"text with {slots}":{ expr; expr; };` — the trailer is parsed here
    /// since the lexer only captures the `i"..."` prefix as one lexeme
    /// (spec.md 4.1's INTERPOLATED_STRING_START rule).
    fn interpolated_string(&mut self) -> ParseResult<Expr> {
        let tok = self.advance().clone();
        let format = tok
            .lexeme
            .trim_start_matches("i\"")
            .trim_end_matches('"')
            .to_string();
        let mut exprs = Vec::new();
        if self.match_kind(TokenKind::Colon) {
            self.consume(TokenKind::LeftBrace, "expected '{' after interpolated-string ':'")?;
            while !self.check(TokenKind::RightBrace) && !self.is_at_end() {
                exprs.push(self.expression()?);
                self.match_kind(TokenKind::Semicolon);
            }
            self.consume(TokenKind::RightBrace, "expected '}' to close interpolation trailer")?;
        }
        Ok(Expr::InterpolatedString { format, exprs })
    }
}

/// Shallow copy used only to build the desugared `target op= value`
/// expansion for compound assignment (`Expr` has no `Clone` derive since
/// AST nodes are otherwise move-only once built).
fn clone_expr_shallow(expr: &Expr) -> Expr {
    match expr {
        Expr::Variable { name } => Expr::Variable { name: name.clone() },
        Expr::MemberAccess { object, op, member } => Expr::MemberAccess {
            object: Box::new(clone_expr_shallow(object)),
            op: op.clone(),
            member: member.clone(),
        },
        Expr::ArrayAccess { array, index } => Expr::ArrayAccess {
            array: Box::new(clone_expr_shallow(array)),
            index: Box::new(clone_expr_shallow(index)),
        },
        _ => unreachable!("compound assignment target must be Variable/MemberAccess/ArrayAccess"),
    }
}

/// Splits a trailing `u`/`U`/`l`/`L` run from a numeric lexeme, returning
/// the digits portion (with sign/prefix retained) and a bit-width guess
/// derived from `l`/`ll` suffix presence (64 vs default-width None).
fn split_numeric_suffix(lexeme: &str) -> (String, Option<u32>) {
    let trimmed = lexeme.trim_end_matches(|c: char| matches!(c, 'u' | 'U' | 'l' | 'L'));
    let suffix = &lexeme[trimmed.len()..];
    let bit_width = if suffix.to_lowercase().contains("ll") {
        Some(64)
    } else if suffix.to_lowercase().contains('l') {
        Some(32)
    } else {
        None
    };
    (trimmed.to_string(), bit_width)
}

fn parse_integer_lexeme(digits: &str) -> Result<i64, std::num::ParseIntError> {
    if let Some(hex) = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        i64::from_str_radix(hex, 16)
    } else if let Some(bin) = digits.strip_prefix("0b").or_else(|| digits.strip_prefix("0B")) {
        i64::from_str_radix(bin, 2)
    } else if digits.len() > 1 && digits.starts_with('0') && digits.chars().all(|c| c.is_ascii_digit()) {
        i64::from_str_radix(&digits[1..], 8)
    } else {
        digits.parse()
    }
}

fn open_mode_from_str(s: &str) -> Option<OpenMode> {
    match s {
        "r" => Some(OpenMode::Read),
        "w" => Some(OpenMode::Write),
        "a" => Some(OpenMode::Append),
        "r+" => Some(OpenMode::ReadWrite),
        "w+" => Some(OpenMode::WritePlus),
        "a+" => Some(OpenMode::AppendPlus),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;

    fn parse(src: &str) -> Vec<Stmt> {
        let tokens = Lexer::new(src).scan_tokens().unwrap();
        Parser::new(tokens).parse_program().unwrap()
    }

    #[test]
    fn precedence_multiplication_before_addition() {
        let stmts = parse("1 + 2 * 3;");
        match &stmts[0] {
            Stmt::Expression(Expr::Binary { left, op, right }) => {
                assert_eq!(op.kind, TokenKind::Plus);
                assert!(matches!(**left, Expr::IntegerLiteral { value: 1, .. }));
                assert!(matches!(**right, Expr::Binary { .. }));
            }
            other => panic!("unexpected stmt: {:?}", other),
        }
    }

    #[test]
    fn var_decl_vs_expression_disambiguation() {
        let stmts = parse("int x = 5;");
        assert!(matches!(stmts[0], Stmt::VarDecl { .. }));
        let stmts = parse("x = 5;");
        assert!(matches!(stmts[0], Stmt::Expression(Expr::Assign { .. })));
    }

    #[test]
    fn function_declaration_parses_params_and_body() {
        let stmts = parse("int add(int a, int b) { return a + b; };");
        match &stmts[0] {
            Stmt::FunctionDecl { params, body, .. } => {
                assert_eq!(params.len(), 2);
                assert_eq!(body.len(), 1);
            }
            other => panic!("unexpected stmt: {:?}", other),
        }
    }

    #[test]
    fn type_cast_expression() {
        let stmts = parse("float:x;");
        match &stmts[0] {
            Stmt::Expression(Expr::TypeCast { .. }) => {}
            other => panic!("expected type cast, got {:?}", other),
        }
    }

    #[test]
    fn struct_declaration_form() {
        let stmts = parse("struct Pair { int a; int b; };");
        match &stmts[0] {
            Stmt::StructDecl { fields, .. } => assert_eq!(fields.len(), 2),
            other => panic!("unexpected stmt: {:?}", other),
        }
    }

    #[test]
    fn lock_statement_vs_call() {
        let stmts = parse("__lock foo::scopeA { };");
        assert!(matches!(stmts[0], Stmt::Lock { .. }));
    }

    #[test]
    fn class_declaration_with_members() {
        let stmts = parse("class Foo { int x = 1; function get() { return x; }; };");
        match &stmts[0] {
            Stmt::ClassDecl { members, .. } => assert_eq!(members.len(), 2),
            other => panic!("unexpected stmt: {:?}", other),
        }
    }

    #[test]
    fn async_function_declaration_sets_flag() {
        let stmts = parse("async int tick() { return 1; };");
        match &stmts[0] {
            Stmt::FunctionDecl { is_async, is_volatile, .. } => {
                assert!(*is_async);
                assert!(!*is_volatile);
            }
            other => panic!("unexpected stmt: {:?}", other),
        }
    }

    #[test]
    fn volatile_async_function_declaration_accepts_either_order() {
        let stmts = parse("volatile async int tick() { return 1; };");
        match &stmts[0] {
            Stmt::FunctionDecl { is_async, is_volatile, .. } => {
                assert!(*is_async);
                assert!(*is_volatile);
            }
            other => panic!("unexpected stmt: {:?}", other),
        }
    }

    #[test]
    fn when_block_parses() {
        let stmts = parse("when (x < 10) { x = x + 1; };");
        assert!(matches!(stmts[0], Stmt::When { .. }));
    }

    #[test]
    fn open_mode_lookup_covers_all_modes() {
        for (s, m) in [
            ("r", OpenMode::Read),
            ("w", OpenMode::Write),
            ("a", OpenMode::Append),
            ("r+", OpenMode::ReadWrite),
            ("w+", OpenMode::WritePlus),
            ("a+", OpenMode::AppendPlus),
        ] {
            assert_eq!(open_mode_from_str(s), Some(m));
        }
        assert_eq!(open_mode_from_str("bogus"), None);
    }
}
