//! Recursive-descent parser.
//!
//! Statements are parsed with one-token resynchronization: a syntax error
//! produces a `PARSE_ERROR` diagnostic, the parser advances a single token
//! and tries again. Expressions use Pratt-style precedence climbing.
use crate::{
    diag::{codes, DiagnosticSink},
    syntax::{
        ast::*,
        lexer::split_number,
        token::{Token, TokenKind},
        Span,
    },
};
use smol_str::SmolStr;
use tracing::debug;

pub struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    diag: &'a mut DiagnosticSink,
    /// Comment text seen since the last completed declaration; consulted for
    /// shader-stage markers.
    pending_comments: Vec<SmolStr>,
}

/// Parses a token stream into a program, reporting syntax errors into the
/// sink.
pub fn parse(tokens: &[Token], diag: &mut DiagnosticSink) -> Program {
    let mut parser = Parser {
        tokens,
        pos: 0,
        diag,
        pending_comments: Vec::new(),
    };
    let program = parser.parse_program();
    debug!(
        functions = program.functions.len(),
        structs = program.structs.len(),
        globals = program.globals.len(),
        "parsed program"
    );
    program
}

impl<'a> Parser<'a> {
    fn skip_comments(&mut self) {
        while self.tokens[self.pos].kind.is_comment() {
            let text = self.tokens[self.pos].text.clone();
            self.pending_comments.push(text);
            self.pos += 1;
        }
    }

    fn peek(&mut self) -> &Token {
        self.skip_comments();
        &self.tokens[self.pos]
    }

    fn peek_kind(&mut self) -> TokenKind {
        self.peek().kind
    }

    fn at(&mut self, kind: TokenKind) -> bool {
        self.peek_kind() == kind
    }

    fn bump(&mut self) -> Token {
        self.skip_comments();
        let token = self.tokens[self.pos].clone();
        if token.kind != TokenKind::Eof {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.at(kind) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Option<Token> {
        if self.at(kind) {
            Some(self.bump())
        } else {
            let token = self.peek().clone();
            self.diag
                .error(codes::PARSE_ERROR, format!("expected {}, found `{}`", what, token.text))
                .span(token.span)
                .emit();
            None
        }
    }

    fn error_here(&mut self, message: impl Into<String>) {
        let span = self.peek().span;
        self.diag.error(codes::PARSE_ERROR, message).span(span).emit();
    }

    /// Reports an error at the current token and advances one token.
    fn recover(&mut self, message: impl Into<String>) {
        self.error_here(message);
        if !self.at(TokenKind::Eof) {
            self.pos += 1;
        }
    }

    fn at_ident(&mut self, text: &str) -> bool {
        let token = self.peek();
        token.kind == TokenKind::Ident && token.text == text
    }

    // ------------------------------------------------------------------
    // Declarations
    // ------------------------------------------------------------------

    fn parse_program(&mut self) -> Program {
        let mut program = Program {
            imports: vec![],
            structs: vec![],
            classes: vec![],
            functions: vec![],
            globals: vec![],
        };

        loop {
            let mut attrs = Vec::new();
            while self.at(TokenKind::Decorator) {
                let token = self.bump();
                attrs.push(parse_attribute(&token));
            }
            let exported = self.eat(TokenKind::Export);

            match self.peek_kind() {
                TokenKind::Eof => break,
                TokenKind::Import => {
                    if let Some(import) = self.parse_import() {
                        program.imports.push(import);
                    }
                }
                TokenKind::Struct => {
                    self.bump();
                    if let Some(decl) = self.parse_struct_body() {
                        program.structs.push(decl);
                    }
                }
                TokenKind::Ident if self.at_ident("interface") => {
                    self.bump();
                    if let Some(decl) = self.parse_struct_body() {
                        program.structs.push(decl);
                    }
                }
                TokenKind::Ident if self.at_ident("type") => {
                    if let Some(decl) = self.parse_type_alias() {
                        program.structs.push(decl);
                    }
                }
                TokenKind::Ident if self.at_ident("class") => {
                    if let Some(decl) = self.parse_class() {
                        program.classes.push(decl);
                    }
                }
                TokenKind::Function | TokenKind::Fn => {
                    if let Some(decl) = self.parse_function(attrs, exported) {
                        program.functions.push(decl);
                    }
                }
                TokenKind::Const | TokenKind::Let | TokenKind::Var => {
                    if let Some(decl) = self.parse_global(attrs) {
                        program.globals.push(decl);
                    }
                }
                _ => {
                    self.recover("expected a declaration");
                }
            }
            self.pending_comments.clear();
        }

        program
    }

    fn parse_import(&mut self) -> Option<ImportDecl> {
        let start = self.bump().span;
        let clause = match self.peek_kind() {
            TokenKind::Ident => ImportClause::Default(self.bump().text),
            TokenKind::LBrace => {
                self.bump();
                let mut names = Vec::new();
                while !self.at(TokenKind::RBrace) && !self.at(TokenKind::Eof) {
                    let name = self.expect(TokenKind::Ident, "an import name")?;
                    names.push(name.text);
                    if !self.eat(TokenKind::Comma) {
                        break;
                    }
                }
                self.expect(TokenKind::RBrace, "`}`")?;
                ImportClause::Named(names)
            }
            TokenKind::Star => {
                self.bump();
                if !self.at_ident("as") {
                    self.error_here("expected `as` in namespace import");
                    return None;
                }
                self.bump();
                let name = self.expect(TokenKind::Ident, "a namespace name")?;
                ImportClause::Namespace(name.text)
            }
            _ => {
                self.recover("expected an import clause");
                return None;
            }
        };
        self.expect(TokenKind::From, "`from`")?;
        let path = self.expect(TokenKind::Str, "a module path")?;
        let end = path.span;
        self.eat(TokenKind::Semicolon);
        Some(ImportDecl {
            clause,
            path: strip_quotes(&path.text),
            span: start.to(end),
        })
    }

    /// Parses `Name { fields }` after `struct`/`interface`.
    fn parse_struct_body(&mut self) -> Option<StructDecl> {
        let name = self.expect(TokenKind::Ident, "a type name")?;
        self.expect(TokenKind::LBrace, "`{`")?;
        let fields = self.parse_field_list();
        let close = self.expect(TokenKind::RBrace, "`}`")?;
        Some(StructDecl {
            name: name.text,
            fields,
            span: name.span.to(close.span),
        })
    }

    /// Parses `type Name = { fields };`.
    fn parse_type_alias(&mut self) -> Option<StructDecl> {
        let start = self.bump().span;
        let name = self.expect(TokenKind::Ident, "a type name")?;
        self.expect(TokenKind::Eq, "`=`")?;
        self.expect(TokenKind::LBrace, "`{`")?;
        let fields = self.parse_field_list();
        let close = self.expect(TokenKind::RBrace, "`}`")?;
        self.eat(TokenKind::Semicolon);
        Some(StructDecl {
            name: name.text,
            fields,
            span: start.to(close.span),
        })
    }

    fn parse_field_list(&mut self) -> Vec<FieldDecl> {
        let mut fields = Vec::new();
        while !self.at(TokenKind::RBrace) && !self.at(TokenKind::Eof) {
            let mut attrs = Vec::new();
            while self.at(TokenKind::Decorator) {
                let token = self.bump();
                attrs.push(parse_attribute(&token));
            }
            let name = match self.expect(TokenKind::Ident, "a field name") {
                Some(name) => name,
                None => {
                    if !self.at(TokenKind::Eof) {
                        self.pos += 1;
                    }
                    continue;
                }
            };
            if self.expect(TokenKind::Colon, "`:`").is_none() {
                continue;
            }
            let ty = match self.parse_type_ref() {
                Some(ty) => ty,
                None => continue,
            };
            let span = name.span.to(ty.span);
            fields.push(FieldDecl {
                name: name.text,
                ty,
                attrs,
                span,
            });
            if !self.eat(TokenKind::Semicolon) && !self.eat(TokenKind::Comma) {
                break;
            }
        }
        fields
    }

    fn parse_class(&mut self) -> Option<ClassDecl> {
        let start = self.bump().span;
        let name = self.expect(TokenKind::Ident, "a class name")?;
        self.expect(TokenKind::LBrace, "`{`")?;
        let mut fields = Vec::new();
        let mut methods = Vec::new();
        while !self.at(TokenKind::RBrace) && !self.at(TokenKind::Eof) {
            let mut attrs = Vec::new();
            while self.at(TokenKind::Decorator) {
                let token = self.bump();
                attrs.push(parse_attribute(&token));
            }
            let member = match self.expect(TokenKind::Ident, "a class member") {
                Some(member) => member,
                None => {
                    if !self.at(TokenKind::Eof) {
                        self.pos += 1;
                    }
                    continue;
                }
            };
            if self.at(TokenKind::LParen) {
                if let Some(method) = self.parse_function_tail(member.text, member.span, attrs, false) {
                    methods.push(method);
                }
            } else {
                let ty = if self.eat(TokenKind::Colon) {
                    self.parse_type_ref()
                } else {
                    None
                };
                if self.eat(TokenKind::Eq) {
                    // Field initializers run on the CPU; parse and drop.
                    let _ = self.parse_expr();
                }
                self.eat(TokenKind::Semicolon);
                fields.push(ClassField {
                    name: member.text.clone(),
                    ty,
                    span: member.span,
                });
            }
        }
        let close = self.expect(TokenKind::RBrace, "`}`")?;
        Some(ClassDecl {
            name: name.text,
            fields,
            methods,
            span: start.to(close.span),
        })
    }

    fn parse_function(&mut self, attrs: Vec<Attribute>, exported: bool) -> Option<FunctionDecl> {
        let kw = self.bump();
        let name = self.expect(TokenKind::Ident, "a function name")?;
        self.parse_function_tail(name.text, kw.span, attrs, exported)
    }

    /// Parses `(params) [:|->] type { body }` for functions and methods.
    fn parse_function_tail(
        &mut self,
        name: SmolStr,
        start: Span,
        attrs: Vec<Attribute>,
        exported: bool,
    ) -> Option<FunctionDecl> {
        // Stage markers live in the decorators or the comments *before* the
        // declaration; snapshot before body comments pile up.
        let stage = detect_stage(&attrs, &self.pending_comments);

        self.expect(TokenKind::LParen, "`(`")?;
        let mut params = Vec::new();
        while !self.at(TokenKind::RParen) && !self.at(TokenKind::Eof) {
            let mut param_attrs = Vec::new();
            while self.at(TokenKind::Decorator) {
                let token = self.bump();
                param_attrs.push(parse_attribute(&token));
            }
            let pname = self.expect(TokenKind::Ident, "a parameter name")?;
            self.eat(TokenKind::Question);
            let ty = if self.eat(TokenKind::Colon) {
                self.parse_type_ref()
            } else {
                None
            };
            let span = ty.as_ref().map(|t| pname.span.to(t.span)).unwrap_or(pname.span);
            params.push(ParamDecl {
                name: pname.text,
                ty,
                attrs: param_attrs,
                span,
            });
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RParen, "`)`")?;

        let mut ret = None;
        let mut ret_attrs = Vec::new();
        if self.eat(TokenKind::Colon) || self.eat(TokenKind::Arrow) {
            while self.at(TokenKind::Decorator) {
                let token = self.bump();
                ret_attrs.push(parse_attribute(&token));
            }
            ret = self.parse_type_ref();
        }

        let body = self.parse_block()?;
        let span = start.to(body.span);

        let workgroup_size = attrs
            .iter()
            .find(|a| a.name == "workgroup_size")
            .and_then(parse_workgroup_size);

        Some(FunctionDecl {
            name,
            stage,
            attrs,
            params,
            ret,
            ret_attrs,
            workgroup_size,
            body,
            exported,
            span,
        })
    }

    fn parse_global(&mut self, attrs: Vec<Attribute>) -> Option<GlobalDecl> {
        let kw = self.bump();
        let kind = match kw.kind {
            TokenKind::Const => VarKind::Const,
            TokenKind::Let => VarKind::Let,
            _ => VarKind::Var,
        };
        let name = self.expect(TokenKind::Ident, "a variable name")?;
        let ty = if self.eat(TokenKind::Colon) {
            self.parse_type_ref()
        } else {
            None
        };
        let init = if self.eat(TokenKind::Eq) {
            Some(self.parse_expr()?)
        } else {
            None
        };
        let end = init
            .as_ref()
            .map(|e| e.span())
            .or_else(|| ty.as_ref().map(|t| t.span))
            .unwrap_or(name.span);
        self.eat(TokenKind::Semicolon);

        let group = attrs.iter().find(|a| a.name == "group").and_then(Attribute::int_value);
        let binding = attrs.iter().find(|a| a.name == "binding").and_then(Attribute::int_value);

        Some(GlobalDecl {
            kind,
            name: name.text,
            ty,
            init,
            attrs,
            group,
            binding,
            span: kw.span.to(end),
        })
    }

    // ------------------------------------------------------------------
    // Types
    // ------------------------------------------------------------------

    /// Collects a type spelling, including nested generic arguments, into a
    /// raw `TypeRef` resolved later against the registry.
    fn parse_type_ref(&mut self) -> Option<TypeRef> {
        let first = self.expect(TokenKind::Ident, "a type")?;
        let mut text = first.text.to_string();
        let mut span = first.span;

        if self.at(TokenKind::Less) {
            let mut depth = 0i32;
            loop {
                let token = self.peek().clone();
                match token.kind {
                    TokenKind::Less => {
                        depth += 1;
                        text.push('<');
                    }
                    TokenKind::Greater => {
                        depth -= 1;
                        text.push('>');
                    }
                    // `array<vec4<f32>>` lexes its closing pair as one token.
                    TokenKind::ShiftRight => {
                        depth -= 2;
                        text.push_str(">>");
                    }
                    TokenKind::Comma => {
                        text.push_str(", ");
                    }
                    TokenKind::Ident | TokenKind::Number => {
                        text.push_str(&token.text);
                    }
                    _ => {
                        self.error_here("malformed type");
                        return None;
                    }
                }
                span = span.to(token.span);
                self.bump();
                if depth <= 0 {
                    break;
                }
            }
        }

        Some(TypeRef {
            text: text.into(),
            span,
        })
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn parse_block(&mut self) -> Option<Block> {
        let open = self.expect(TokenKind::LBrace, "`{`")?;
        let mut stmts = Vec::new();
        while !self.at(TokenKind::RBrace) && !self.at(TokenKind::Eof) {
            match self.parse_stmt() {
                Some(stmt) => stmts.push(stmt),
                None => {
                    if !self.at(TokenKind::Eof) && !self.at(TokenKind::RBrace) {
                        self.pos += 1;
                    }
                }
            }
        }
        let close = self.expect(TokenKind::RBrace, "`}`")?;
        Some(Block {
            stmts,
            span: open.span.to(close.span),
        })
    }

    fn parse_stmt(&mut self) -> Option<Stmt> {
        let mut attrs = Vec::new();
        while self.at(TokenKind::Decorator) {
            let token = self.bump();
            attrs.push(parse_attribute(&token));
        }

        match self.peek_kind() {
            TokenKind::Const | TokenKind::Let | TokenKind::Var => self.parse_var_stmt(attrs),
            TokenKind::If => self.parse_if(),
            TokenKind::For => self.parse_for(),
            TokenKind::While => self.parse_while(),
            TokenKind::Return => {
                let kw = self.bump();
                let value = if self.at(TokenKind::Semicolon) || self.at(TokenKind::RBrace) {
                    None
                } else {
                    Some(self.parse_expr()?)
                };
                let end = value.as_ref().map(|e| e.span()).unwrap_or(kw.span);
                self.eat(TokenKind::Semicolon);
                Some(Stmt::Return {
                    value,
                    span: kw.span.to(end),
                })
            }
            TokenKind::LBrace => self.parse_block().map(Stmt::Block),
            _ => {
                let expr = self.parse_expr()?;
                let span = expr.span();
                self.eat(TokenKind::Semicolon);
                Some(Stmt::Expr { expr, span })
            }
        }
    }

    fn parse_var_stmt(&mut self, attrs: Vec<Attribute>) -> Option<Stmt> {
        let kw = self.bump();
        let kind = match kw.kind {
            TokenKind::Const => VarKind::Const,
            TokenKind::Let => VarKind::Let,
            _ => VarKind::Var,
        };
        let name = self.expect(TokenKind::Ident, "a variable name")?;
        let ty = if self.eat(TokenKind::Colon) {
            self.parse_type_ref()
        } else {
            None
        };
        let init = if self.eat(TokenKind::Eq) {
            Some(self.parse_expr()?)
        } else {
            None
        };
        let end = init
            .as_ref()
            .map(|e| e.span())
            .or_else(|| ty.as_ref().map(|t| t.span))
            .unwrap_or(name.span);
        self.eat(TokenKind::Semicolon);
        Some(Stmt::Var {
            kind,
            name: name.text,
            ty,
            init,
            attrs,
            span: kw.span.to(end),
        })
    }

    fn parse_if(&mut self) -> Option<Stmt> {
        let kw = self.bump();
        self.expect(TokenKind::LParen, "`(`")?;
        let cond = self.parse_expr()?;
        self.expect(TokenKind::RParen, "`)`")?;
        let then_branch = self.parse_branch()?;
        let else_branch = if self.eat(TokenKind::Else) {
            if self.at(TokenKind::If) {
                let nested = self.parse_if()?;
                let span = nested.span();
                Some(Block {
                    stmts: vec![nested],
                    span,
                })
            } else {
                Some(self.parse_branch()?)
            }
        } else {
            None
        };
        let end = else_branch.as_ref().map(|b| b.span).unwrap_or(then_branch.span);
        Some(Stmt::If {
            cond,
            then_branch,
            else_branch,
            span: kw.span.to(end),
        })
    }

    /// A branch is either a braced block or a single statement.
    fn parse_branch(&mut self) -> Option<Block> {
        if self.at(TokenKind::LBrace) {
            self.parse_block()
        } else {
            let stmt = self.parse_stmt()?;
            let span = stmt.span();
            Some(Block {
                stmts: vec![stmt],
                span,
            })
        }
    }

    fn parse_for(&mut self) -> Option<Stmt> {
        let kw = self.bump();
        self.expect(TokenKind::LParen, "`(`")?;
        let init = if self.at(TokenKind::Semicolon) {
            self.bump();
            None
        } else {
            let stmt = self.parse_stmt()?;
            Some(Box::new(stmt))
        };
        let cond = if self.at(TokenKind::Semicolon) {
            None
        } else {
            Some(self.parse_expr()?)
        };
        self.eat(TokenKind::Semicolon);
        let step = if self.at(TokenKind::RParen) {
            None
        } else {
            let expr = self.parse_expr()?;
            let span = expr.span();
            Some(Box::new(Stmt::Expr { expr, span }))
        };
        self.expect(TokenKind::RParen, "`)`")?;
        let body = self.parse_branch()?;
        let span = kw.span.to(body.span);
        Some(Stmt::For {
            init,
            cond,
            step,
            body,
            span,
        })
    }

    fn parse_while(&mut self) -> Option<Stmt> {
        let kw = self.bump();
        self.expect(TokenKind::LParen, "`(`")?;
        let cond = self.parse_expr()?;
        self.expect(TokenKind::RParen, "`)`")?;
        let body = self.parse_branch()?;
        let span = kw.span.to(body.span);
        Some(Stmt::While { cond, body, span })
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    pub(crate) fn parse_expr(&mut self) -> Option<Expr> {
        self.parse_assign()
    }

    fn parse_assign(&mut self) -> Option<Expr> {
        let left = self.parse_binary(0)?;
        let op = match self.peek_kind() {
            TokenKind::Eq => None,
            TokenKind::PlusEq => Some(BinOp::Add),
            TokenKind::MinusEq => Some(BinOp::Sub),
            TokenKind::StarEq => Some(BinOp::Mul),
            TokenKind::SlashEq => Some(BinOp::Div),
            _ => return Some(left),
        };
        self.bump();
        if !matches!(left, Expr::Ident { .. } | Expr::Member { .. } | Expr::Index { .. }) {
            self.diag
                .error(codes::PARSE_ERROR, "invalid assignment target")
                .span(left.span())
                .emit();
        }
        let value = self.parse_assign()?;
        let span = left.span().to(value.span());
        Some(Expr::Assign {
            op,
            target: Box::new(left),
            value: Box::new(value),
            span,
        })
    }

    fn parse_binary(&mut self, min_bp: u8) -> Option<Expr> {
        let mut left = self.parse_unary()?;
        loop {
            let (op, bp) = match self.peek_kind() {
                TokenKind::PipePipe => (BinOp::Or, 1),
                TokenKind::AmpAmp => (BinOp::And, 2),
                TokenKind::Pipe => (BinOp::BitOr, 3),
                TokenKind::Caret => (BinOp::BitXor, 4),
                TokenKind::Amp => (BinOp::BitAnd, 5),
                TokenKind::EqEq | TokenKind::EqEqEq => (BinOp::Eq, 6),
                TokenKind::NotEq | TokenKind::NotEqEq => (BinOp::Ne, 6),
                TokenKind::Less => (BinOp::Lt, 7),
                TokenKind::LessEq => (BinOp::Le, 7),
                TokenKind::Greater => (BinOp::Gt, 7),
                TokenKind::GreaterEq => (BinOp::Ge, 7),
                TokenKind::ShiftLeft => (BinOp::Shl, 8),
                TokenKind::ShiftRight => (BinOp::Shr, 8),
                TokenKind::Plus => (BinOp::Add, 9),
                TokenKind::Minus => (BinOp::Sub, 9),
                TokenKind::Star => (BinOp::Mul, 10),
                TokenKind::Slash => (BinOp::Div, 10),
                TokenKind::Percent => (BinOp::Mod, 10),
                _ => break,
            };
            if bp < min_bp {
                break;
            }
            self.bump();
            let right = self.parse_binary(bp + 1)?;
            let span = left.span().to(right.span());
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
                span,
            };
        }
        Some(left)
    }

    fn parse_unary(&mut self) -> Option<Expr> {
        let op = match self.peek_kind() {
            TokenKind::Minus => Some(UnaryOp::Neg),
            TokenKind::Bang => Some(UnaryOp::Not),
            TokenKind::Tilde => Some(UnaryOp::BitNot),
            TokenKind::Amp => Some(UnaryOp::AddressOf),
            TokenKind::PlusPlus => Some(UnaryOp::PreIncrement),
            TokenKind::MinusMinus => Some(UnaryOp::PreDecrement),
            _ => None,
        };
        if let Some(op) = op {
            let token = self.bump();
            let expr = self.parse_unary()?;
            let span = token.span.to(expr.span());
            return Some(Expr::Unary {
                op,
                expr: Box::new(expr),
                span,
            });
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Option<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.peek_kind() {
                TokenKind::LParen => {
                    self.bump();
                    let mut args = Vec::new();
                    while !self.at(TokenKind::RParen) && !self.at(TokenKind::Eof) {
                        args.push(self.parse_expr()?);
                        if !self.eat(TokenKind::Comma) {
                            break;
                        }
                    }
                    let close = self.expect(TokenKind::RParen, "`)`")?;
                    let span = expr.span().to(close.span);
                    expr = Expr::Call {
                        callee: Box::new(expr),
                        args,
                        span,
                    };
                }
                TokenKind::Dot => {
                    self.bump();
                    let member = self.expect(TokenKind::Ident, "a member name")?;
                    let span = expr.span().to(member.span);
                    expr = Expr::Member {
                        base: Box::new(expr),
                        member: member.text,
                        span,
                    };
                }
                TokenKind::LBracket => {
                    self.bump();
                    let index = self.parse_expr()?;
                    let close = self.expect(TokenKind::RBracket, "`]`")?;
                    let span = expr.span().to(close.span);
                    expr = Expr::Index {
                        base: Box::new(expr),
                        index: Box::new(index),
                        span,
                    };
                }
                TokenKind::PlusPlus => {
                    let token = self.bump();
                    let span = expr.span().to(token.span);
                    expr = Expr::Unary {
                        op: UnaryOp::PostIncrement,
                        expr: Box::new(expr),
                        span,
                    };
                }
                TokenKind::MinusMinus => {
                    let token = self.bump();
                    let span = expr.span().to(token.span);
                    expr = Expr::Unary {
                        op: UnaryOp::PostDecrement,
                        expr: Box::new(expr),
                        span,
                    };
                }
                _ => break,
            }
        }
        Some(expr)
    }

    fn parse_primary(&mut self) -> Option<Expr> {
        match self.peek_kind() {
            TokenKind::Number => {
                let token = self.bump();
                Some(parse_number(&token))
            }
            TokenKind::True | TokenKind::False => {
                let token = self.bump();
                Some(Expr::BoolLit {
                    value: token.kind == TokenKind::True,
                    span: token.span,
                })
            }
            TokenKind::Str => {
                let token = self.bump();
                Some(Expr::StrLit {
                    value: strip_quotes(&token.text),
                    span: token.span,
                })
            }
            TokenKind::Ident => {
                let token = self.bump();
                Some(Expr::Ident {
                    name: token.text,
                    span: token.span,
                })
            }
            TokenKind::LParen => {
                self.bump();
                let expr = self.parse_expr()?;
                self.expect(TokenKind::RParen, "`)`")?;
                Some(expr)
            }
            TokenKind::LBracket => {
                let open = self.bump();
                let mut elements = Vec::new();
                while !self.at(TokenKind::RBracket) && !self.at(TokenKind::Eof) {
                    elements.push(self.parse_expr()?);
                    if !self.eat(TokenKind::Comma) {
                        break;
                    }
                }
                let close = self.expect(TokenKind::RBracket, "`]`")?;
                Some(Expr::ArrayLit {
                    elements,
                    span: open.span.to(close.span),
                })
            }
            _ => {
                self.error_here("expected an expression");
                None
            }
        }
    }
}

/// Splits a decorator token (`@name(args)`) into its name and raw argument
/// text.
fn parse_attribute(token: &Token) -> Attribute {
    let text = token.text.as_str();
    let body = text.strip_prefix('@').unwrap_or(text);
    match body.find('(') {
        Some(pos) => Attribute {
            name: SmolStr::new(&body[..pos]),
            value: body[pos + 1..]
                .strip_suffix(')')
                .map(|v| SmolStr::new(v.trim())),
            span: token.span,
        },
        None => Attribute {
            name: SmolStr::new(body),
            value: None,
            span: token.span,
        },
    }
}

/// Parses the `@workgroup_size(x[, y[, z]])` argument list.
fn parse_workgroup_size(attr: &Attribute) -> Option<(u32, Option<u32>, Option<u32>)> {
    let value = attr.value.as_ref()?;
    let mut parts = value.split(',').map(|p| p.trim().parse::<u32>().ok());
    let x = parts.next()??;
    let y = parts.next().flatten();
    let z = parts.next().flatten();
    Some((x, y, z))
}

/// Resolves the shader stage from decorators and, failing that, from the
/// leading comment text (`@vertex`, `@fragment`, `@compute`, or the
/// `/* @3d-shader <stage> */` marker).
fn detect_stage(attrs: &[Attribute], comments: &[SmolStr]) -> Option<ShaderStage> {
    for attr in attrs {
        match attr.name.as_str() {
            "vertex" => return Some(ShaderStage::Vertex),
            "fragment" => return Some(ShaderStage::Fragment),
            "compute" => return Some(ShaderStage::Compute),
            _ => {}
        }
    }
    for comment in comments {
        if let Some(pos) = comment.find("@3d-shader") {
            let rest = comment[pos + "@3d-shader".len()..].trim_start();
            let stage = rest.split(|c: char| !c.is_alphanumeric()).next().unwrap_or("");
            match stage {
                "vertex" => return Some(ShaderStage::Vertex),
                "fragment" => return Some(ShaderStage::Fragment),
                "compute" => return Some(ShaderStage::Compute),
                _ => {}
            }
        }
        if comment.contains("@vertex") {
            return Some(ShaderStage::Vertex);
        }
        if comment.contains("@fragment") {
            return Some(ShaderStage::Fragment);
        }
        if comment.contains("@compute") {
            return Some(ShaderStage::Compute);
        }
    }
    None
}

fn parse_number(token: &Token) -> Expr {
    let (digits, suffix, is_float) = split_number(&token.text);
    let suffix = suffix.and_then(|c| match c {
        'f' => Some(NumSuffix::F),
        'h' => Some(NumSuffix::H),
        'i' => Some(NumSuffix::I),
        'u' => Some(NumSuffix::U),
        _ => None,
    });
    if is_float {
        Expr::FloatLit {
            value: digits.parse().unwrap_or(0.0),
            suffix,
            span: token.span,
        }
    } else {
        Expr::IntLit {
            value: digits.parse().unwrap_or(0),
            suffix,
            span: token.span,
        }
    }
}

fn strip_quotes(text: &str) -> SmolStr {
    SmolStr::new(text.trim_matches('"'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::tokenize;

    fn parse_source(src: &str) -> (Program, DiagnosticSink) {
        let tokens = tokenize(src);
        let mut diag = DiagnosticSink::new();
        let program = parse(&tokens, &mut diag);
        (program, diag)
    }

    #[test]
    fn function_with_stage_decorator() {
        let (program, diag) = parse_source(
            r#"
            @fragment
            function main(): vec4f {
              return vec4f(1.0, 0.0, 0.0, 1.0);
            }
            "#,
        );
        assert!(!diag.has_errors());
        assert_eq!(program.functions.len(), 1);
        let f = &program.functions[0];
        assert_eq!(f.name, "main");
        assert_eq!(f.stage, Some(ShaderStage::Fragment));
        assert_eq!(f.ret.as_ref().unwrap().text, "vec4f");
    }

    #[test]
    fn stage_from_comment_and_magic_marker() {
        let (program, _) = parse_source(
            r#"
            // @vertex
            fn a() -> vec4f { return vec4f(0.0); }
            /* @3d-shader compute */
            @workgroup_size(8, 8)
            fn b() { }
            "#,
        );
        assert_eq!(program.functions[0].stage, Some(ShaderStage::Vertex));
        assert_eq!(program.functions[1].stage, Some(ShaderStage::Compute));
        assert_eq!(program.functions[1].workgroup_size, Some((8, Some(8), None)));
    }

    #[test]
    fn interface_becomes_struct() {
        let (program, diag) = parse_source(
            r#"
            interface Varyings {
              @builtin(position) position: vec4f;
              @location(0) color: vec3f;
            }
            "#,
        );
        assert!(!diag.has_errors());
        let s = &program.structs[0];
        assert_eq!(s.name, "Varyings");
        assert_eq!(s.fields.len(), 2);
        assert_eq!(s.fields[0].attrs[0].name, "builtin");
        assert_eq!(s.fields[0].attrs[0].value.as_deref(), Some("position"));
        assert_eq!(s.fields[1].attrs[0].int_value(), Some(0));
    }

    #[test]
    fn global_with_binding_is_promoted() {
        let (program, _) = parse_source("@group(0) @binding(2) var params: vec4f;");
        let g = &program.globals[0];
        assert_eq!(g.group, Some(0));
        assert_eq!(g.binding, Some(2));
        assert_eq!(g.kind, VarKind::Var);
    }

    #[test]
    fn imports() {
        let (program, diag) = parse_source(
            r#"
            import defaultThing from "./runtime";
            import { vertex, fragment } from "./stages";
            import * as gpu from "./gpu";
            "#,
        );
        assert!(!diag.has_errors());
        assert_eq!(program.imports.len(), 3);
        assert!(matches!(program.imports[0].clause, ImportClause::Default(_)));
        assert!(matches!(program.imports[1].clause, ImportClause::Named(ref n) if n.len() == 2));
        assert!(matches!(program.imports[2].clause, ImportClause::Namespace(_)));
        assert_eq!(program.imports[1].path, "./stages");
    }

    #[test]
    fn precedence() {
        let (program, _) = parse_source("fn f(): f32 { return 1 + 2 * 3; }");
        let body = &program.functions[0].body;
        match &body.stmts[0] {
            Stmt::Return { value: Some(Expr::Binary { op, right, .. }), .. } => {
                assert_eq!(*op, BinOp::Add);
                assert!(matches!(**right, Expr::Binary { op: BinOp::Mul, .. }));
            }
            other => panic!("unexpected stmt: {other:?}"),
        }
    }

    #[test]
    fn nested_generic_type_with_shift_right() {
        let (program, diag) = parse_source("fn f() { let xs: array<vec4<f32>> = a; }");
        assert!(!diag.has_errors());
        match &program.functions[0].body.stmts[0] {
            Stmt::Var { ty: Some(ty), .. } => assert_eq!(ty.text, "array<vec4<f32>>"),
            other => panic!("unexpected stmt: {other:?}"),
        }
    }

    #[test]
    fn error_recovers_at_next_token() {
        let (program, diag) = parse_source("??? fn ok() { } ???");
        assert!(diag.has_errors());
        assert_eq!(program.functions.len(), 1);
    }

    #[test]
    fn class_is_carried_through() {
        let (program, diag) = parse_source(
            r#"
            class Renderer {
              width: f32;
              draw(x: f32): f32 { return x; }
            }
            "#,
        );
        assert!(!diag.has_errors());
        let class = &program.classes[0];
        assert_eq!(class.fields.len(), 1);
        assert_eq!(class.methods.len(), 1);
    }

    #[test]
    fn for_loop_shape() {
        let (program, diag) = parse_source("fn f() { for (let i = 0; i < 4; i++) { } }");
        assert!(!diag.has_errors());
        match &program.functions[0].body.stmts[0] {
            Stmt::For { init, cond, step, .. } => {
                assert!(init.is_some());
                assert!(cond.is_some());
                assert!(step.is_some());
            }
            other => panic!("unexpected stmt: {other:?}"),
        }
    }
}
