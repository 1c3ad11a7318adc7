//! Recursive-descent parser with precedence climbing
//!
//! One token slice in, one [`Program`] + diagnostics out. Built the way the
//! teacher's own parser is built (a `Parser` cursor over a token slice,
//! `expect`/`check`/`advance` primitives, one `parse_*` method per grammar
//! rule) rather than the original source's backtracking `try_*`/
//! `restore_state` style: this grammar has no rule that requires
//! backtracking past more than one token of lookahead once a leading
//! keyword or type-start token is known, so a cursor that never rewinds is
//! both simpler and cheaper.
//!
//! The lexer hands back single-character punctuation only (no `==`, `&&`,
//! `<<=`, ...). Multi-character operators are reassembled here by checking
//! that consecutive tokens are byte-adjacent (`lhs.span.end_offset ==
//! rhs.span.start_offset`), the same adjacency test `lexer`'s
//! token-concatenation invariant already established. Each precedence tier
//! is responsible for declining to match a prefix that actually belongs to
//! a longer operator owned by another tier (`<` must not eat the `<` that
//! starts `<<`, `+` must not eat the `+` that starts `+=`).

use crate::ast::{
    Attribute, AttributeArg, Block, BufferDecl, BufferKind, CompoundOp, Decl, Expr, ExprKind,
    FunctionDecl, InitialiserArg, Literal, Param, Program, StageFunctionDecl, StageKind, Stmt,
    StructDecl, StructField, SwitchArm, TypeExpr, VarDecl,
};
use crate::diagnostics::{Diagnostic, DiagnosticKind};
use crate::lexer::{Token, TokenKind};
use crate::source::Span;
use crate::types::{BuiltinType, ImageDescriptor, ImageDim, ScalarKind};

/// Parse a complete token stream (as produced by [`crate::lexer::Lexer`])
/// into a [`Program`]. Always returns a program, even an empty one;
/// diagnostics report what went wrong along the way.
#[must_use]
pub fn parse(tokens: &[Token]) -> (Program, Vec<Diagnostic>) {
    let mut parser = Parser::new(tokens);
    let program = parser.parse_program();
    (program, parser.diagnostics)
}

struct Parser<'t> {
    tokens: &'t [Token],
    pos: usize,
    diagnostics: Vec<Diagnostic>,
    /// Nesting depth of enclosing loops, for `break`/`continue` validation.
    loop_depth: u32,
    /// Nesting depth of enclosing loops or switches, for `break` validation.
    breakable_depth: u32,
}

impl<'t> Parser<'t> {
    fn new(tokens: &'t [Token]) -> Self {
        Parser {
            tokens,
            pos: 0,
            diagnostics: Vec::new(),
            loop_depth: 0,
            breakable_depth: 0,
        }
    }

    // -- cursor primitives ------------------------------------------------

    fn tok(&self, offset: usize) -> &Token {
        let i = (self.pos + offset).min(self.tokens.len() - 1);
        &self.tokens[i]
    }

    fn kind(&self, offset: usize) -> TokenKind {
        self.tok(offset).kind
    }

    fn span(&self) -> Span {
        self.tok(0).span
    }

    fn at_eof(&self) -> bool {
        self.kind(0) == TokenKind::Eof
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.kind(0) == kind
    }

    /// Are tokens at `offset` and `offset + 1` glued together with no gap?
    fn adjacent(&self, offset: usize) -> bool {
        self.tok(offset).span.end_offset == self.tok(offset + 1).span.start_offset
    }

    fn advance(&mut self) -> Token {
        let t = self.tok(0).clone();
        if !self.at_eof() {
            self.pos += 1;
        }
        t
    }

    fn bump_if(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Option<Token> {
        if self.check(kind) {
            Some(self.advance())
        } else {
            let span = self.span();
            self.diagnostics.push(
                Diagnostic::new(DiagnosticKind::UnexpectedToken, span)
                    .with_message(format!("expected {what}")),
            );
            None
        }
    }

    fn error_here(&mut self, message: impl Into<String>) {
        let span = self.span();
        self.diagnostics
            .push(Diagnostic::new(DiagnosticKind::UnexpectedToken, span).with_message(message));
    }

    /// Skip tokens until a semicolon or close-brace, consuming it too, or
    /// until EOF. One diagnostic has already been pushed by the caller;
    /// this just gets the cursor back onto solid ground.
    fn synchronize(&mut self) {
        loop {
            match self.kind(0) {
                TokenKind::Semicolon => {
                    self.advance();
                    return;
                }
                TokenKind::BraceClose | TokenKind::Eof => return,
                _ => {
                    self.advance();
                }
            }
        }
    }

    // -- program ------------------------------------------------------

    fn parse_program(&mut self) -> Program {
        let start = self.span();
        let mut decls = Vec::new();
        while !self.at_eof() {
            match self.parse_decl() {
                Some(decl) => decls.push(decl),
                None => {
                    if !self.at_eof() {
                        self.synchronize();
                    }
                }
            }
        }
        let end = if decls.is_empty() {
            start
        } else {
            start.merge(&self.tok(0).span)
        };
        Program { decls, span: end }
    }

    fn parse_decl(&mut self) -> Option<Decl> {
        let attributes = self.parse_attributes();

        if self.check(TokenKind::KwStruct) {
            if !attributes.is_empty() {
                self.error_here("attributes are not allowed on struct declarations");
            }
            return self.parse_struct_decl().map(Decl::Struct);
        }

        if let Some(kind) = buffer_kind_from_attributes(&attributes) {
            if self.check(TokenKind::Identifier) && self.tok(0).text == "buffer" {
                return self
                    .parse_buffer_decl(kind, attributes)
                    .map(Decl::Buffer);
            }
        }

        let return_type = self.parse_type_expr()?;
        let first_name = self.expect(TokenKind::Identifier, "a name")?.text;

        if self.check(TokenKind::Colon) && self.kind(1) == TokenKind::Colon && self.adjacent(0) {
            return self
                .parse_stage_function_decl(first_name, return_type)
                .map(Decl::StageFunction);
        }

        if !attributes.is_empty() {
            self.error_here("attributes are not allowed on function declarations");
        }
        self.parse_function_decl(first_name, return_type)
            .map(Decl::Function)
    }

    fn parse_attributes(&mut self) -> Vec<Attribute> {
        let mut attrs = Vec::new();
        while self.check(TokenKind::At) {
            let start = self.span();
            self.advance();
            let name = match self.expect(TokenKind::Identifier, "an attribute name") {
                Some(t) => t.text,
                None => break,
            };
            let mut args = Vec::new();
            let mut end = self.tok(0).span;
            if self.bump_if(TokenKind::ParenOpen) {
                if !self.check(TokenKind::ParenClose) {
                    loop {
                        args.push(self.parse_attribute_arg());
                        if !self.bump_if(TokenKind::Comma) {
                            break;
                        }
                    }
                }
                if let Some(t) = self.expect(TokenKind::ParenClose, "')' after attribute arguments")
                {
                    end = t.span;
                }
            }
            attrs.push(Attribute {
                name,
                args,
                span: start.merge(&end),
            });
        }
        attrs
    }

    fn parse_attribute_arg(&mut self) -> AttributeArg {
        if self.check(TokenKind::Identifier) && self.kind(1) == TokenKind::Equals {
            let name = self.advance().text;
            self.advance(); // '='
            let lit = self.parse_literal_token();
            return AttributeArg::Named(name, lit);
        }
        if self.check(TokenKind::Identifier) {
            return AttributeArg::Identifier(self.advance().text);
        }
        AttributeArg::Positional(self.parse_literal_token())
    }

    fn parse_literal_token(&mut self) -> Literal {
        match self.kind(0) {
            TokenKind::BoolLiteral(b) => {
                self.advance();
                Literal::Bool(b)
            }
            TokenKind::IntegerLiteral { unsigned, .. } => {
                let text = self.advance().text;
                Literal::Int {
                    value: parse_integer_text(&text),
                    unsigned,
                }
            }
            TokenKind::FloatLiteral { is_f64 } => {
                let text = self.advance().text;
                Literal::Float {
                    value: text.parse().unwrap_or(0.0),
                    is_f64,
                }
            }
            _ => {
                self.error_here("expected a literal");
                Literal::Int {
                    value: 0,
                    unsigned: false,
                }
            }
        }
    }

    // -- declarations ---------------------------------------------------

    fn parse_struct_decl(&mut self) -> Option<StructDecl> {
        let start = self.span();
        self.advance(); // 'struct'
        let name = self.expect(TokenKind::Identifier, "a struct name")?.text;
        self.expect(TokenKind::BraceOpen, "'{'")?;
        let mut fields = Vec::new();
        while !self.check(TokenKind::BraceClose) && !self.at_eof() {
            fields.push(self.parse_struct_field()?);
        }
        let end = self.expect(TokenKind::BraceClose, "'}'")?.span;
        if fields.is_empty() {
            self.diagnostics.push(
                Diagnostic::new(DiagnosticKind::EmptyStruct, start.merge(&end))
                    .with_message(format!("struct '{name}' has no fields")),
            );
        }
        Some(StructDecl {
            name,
            fields,
            span: start.merge(&end),
        })
    }

    fn parse_struct_field(&mut self) -> Option<StructField> {
        let start = self.span();
        let name = self.expect(TokenKind::Identifier, "a field name")?.text;
        self.expect(TokenKind::Colon, "':' after field name")?;
        let ty = self.parse_type_expr()?;
        let end = self.expect(TokenKind::Semicolon, "';' after field")?.span;
        Some(StructField {
            name,
            ty,
            span: start.merge(&end),
        })
    }

    fn parse_buffer_decl(&mut self, kind: BufferKind, attributes: Vec<Attribute>) -> Option<BufferDecl> {
        let start = attributes
            .first()
            .map(|a| a.span)
            .unwrap_or_else(|| self.span());
        self.advance(); // 'buffer'
        let name = self.expect(TokenKind::Identifier, "a buffer name")?.text;
        self.expect(TokenKind::BraceOpen, "'{'")?;
        let mut fields = Vec::new();
        while !self.check(TokenKind::BraceClose) && !self.at_eof() {
            fields.push(self.parse_struct_field()?);
        }
        let end = self.expect(TokenKind::BraceClose, "'}'")?.span;
        Some(BufferDecl {
            kind,
            name,
            fields,
            attributes,
            span: start.merge(&end),
        })
    }

    fn parse_stage_function_decl(
        &mut self,
        pass: String,
        return_type: TypeExpr,
    ) -> Option<StageFunctionDecl> {
        let start = self.span();
        self.advance(); // first ':'
        self.expect(TokenKind::Colon, "'::' after pass name")?;
        let stage_tok = self
            .expect(TokenKind::Identifier, "a stage name ('vertex', 'fragment', ...)")?;
        let stage = match stage_tok.text.as_str() {
            "vertex" => StageKind::Vertex,
            "fragment" => StageKind::Fragment,
            "compute" => StageKind::Compute,
            "tessellation_control" => StageKind::TessellationControl,
            "tessellation_evaluation" => StageKind::TessellationEvaluation,
            "geometry" => StageKind::Geometry,
            other => {
                self.diagnostics.push(
                    Diagnostic::new(DiagnosticKind::UnexpectedToken, stage_tok.span)
                        .with_message(format!("unknown stage '{other}'")),
                );
                StageKind::Fragment
            }
        };
        let params = self.parse_param_list(true)?;
        let body = self.parse_block()?;
        let span = start.merge(&body.span);
        Some(StageFunctionDecl {
            pass,
            stage,
            params,
            return_type,
            body,
            span,
        })
    }

    fn parse_function_decl(&mut self, name: String, return_type: TypeExpr) -> Option<FunctionDecl> {
        let start = self.span();
        let params = self.parse_param_list(false)?;
        let body = self.parse_block()?;
        let span = start.merge(&body.span);
        Some(FunctionDecl {
            name,
            params,
            return_type,
            body,
            span,
        })
    }

    fn parse_param_list(&mut self, allow_sourced: bool) -> Option<Vec<Param>> {
        self.expect(TokenKind::ParenOpen, "'(' to start a parameter list")?;
        let mut params = Vec::new();
        if !self.check(TokenKind::ParenClose) {
            loop {
                params.push(self.parse_param(allow_sourced)?);
                if !self.bump_if(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::ParenClose, "')' after parameter list")?;
        Some(params)
    }

    fn parse_param(&mut self, allow_sourced: bool) -> Option<Param> {
        let mut attributes = self.parse_attributes();
        let start = self.span();
        let name = self.expect(TokenKind::Identifier, "a parameter name")?.text;
        self.expect(TokenKind::Colon, "':' after parameter name")?;
        let ty = self.parse_type_expr()?;
        let mut end = self.tok(0).span;
        if self.check(TokenKind::KwFrom) {
            let from_span = self.span();
            self.advance();
            if !allow_sourced {
                self.diagnostics.push(
                    Diagnostic::new(DiagnosticKind::IllegalAttribute, from_span)
                        .with_message("sourced parameters are only allowed on stage functions"),
                );
            }
            let source_tok = self.expect(TokenKind::Identifier, "a parameter source")?;
            end = source_tok.span;
            attributes.push(Attribute {
                name: "from".to_string(),
                args: vec![AttributeArg::Identifier(source_tok.text)],
                span: from_span.merge(&end),
            });
        }
        Some(Param {
            name,
            ty,
            attributes,
            span: start.merge(&end),
        })
    }

    // -- types ------------------------------------------------------------

    fn parse_type_expr(&mut self) -> Option<TypeExpr> {
        let name_tok = self.expect(TokenKind::Identifier, "a type")?;
        let mut ty = match parse_builtin_type_name(&name_tok.text) {
            Some(builtin) => TypeExpr::Builtin(builtin),
            None => TypeExpr::Struct(name_tok.text),
        };
        while self.check(TokenKind::BracketOpen) {
            self.advance();
            let size = if self.check(TokenKind::BracketClose) {
                None
            } else {
                match self.kind(0) {
                    TokenKind::IntegerLiteral { .. } => {
                        Some(parse_integer_text(&self.advance().text) as u32)
                    }
                    _ => {
                        self.error_here("expected an array size or ']'");
                        None
                    }
                }
            };
            self.expect(TokenKind::BracketClose, "']'")?;
            ty = TypeExpr::Array {
                base: Box::new(ty),
                size,
            };
        }
        Some(ty)
    }

    // -- statements ---------------------------------------------------

    fn parse_block(&mut self) -> Option<Block> {
        let start = self.expect(TokenKind::BraceOpen, "'{'")?.span;
        let mut statements = Vec::new();
        while !self.check(TokenKind::BraceClose) && !self.at_eof() {
            match self.parse_stmt() {
                Some(stmt) => statements.push(stmt),
                None => self.synchronize(),
            }
        }
        let end = self.expect(TokenKind::BraceClose, "'}'")?.span;
        Some(Block {
            statements,
            span: start.merge(&end),
        })
    }

    fn parse_stmt(&mut self) -> Option<Stmt> {
        match self.kind(0) {
            TokenKind::BraceOpen => self.parse_block().map(Stmt::Block),
            TokenKind::KwIf => self.parse_if_stmt(),
            TokenKind::KwSwitch => self.parse_switch_stmt(),
            TokenKind::KwFor => self.parse_for_stmt(),
            TokenKind::KwWhile => self.parse_while_stmt(),
            TokenKind::KwDo => self.parse_do_while_stmt(),
            TokenKind::KwReturn => self.parse_return_stmt(),
            TokenKind::KwBreak => self.parse_break_stmt(),
            TokenKind::KwContinue => self.parse_continue_stmt(),
            TokenKind::KwDiscard => {
                let span = self.advance().span;
                let end = self.expect(TokenKind::Semicolon, "';' after 'discard'")?.span;
                Some(Stmt::Discard {
                    span: span.merge(&end),
                })
            }
            TokenKind::KwVar => self.parse_var_decl_stmt(),
            _ => {
                let start = self.span();
                let expr = self.parse_expression()?;
                let end = self
                    .expect(TokenKind::Semicolon, "';' after expression")?
                    .span;
                Some(Stmt::Expression {
                    expr,
                    span: start.merge(&end),
                })
            }
        }
    }

    fn parse_if_stmt(&mut self) -> Option<Stmt> {
        let start = self.advance().span; // 'if'
        self.expect(TokenKind::ParenOpen, "'(' after 'if'")?;
        let condition = self.parse_expression()?;
        self.expect(TokenKind::ParenClose, "')' after condition")?;
        let then_branch = self.parse_block()?;
        let mut end = then_branch.span;
        let else_branch = if self.bump_if(TokenKind::KwElse) {
            let branch: Stmt = if self.check(TokenKind::KwIf) {
                self.parse_if_stmt()?
            } else {
                Stmt::Block(self.parse_block()?)
            };
            end = branch.span();
            Some(Box::new(branch))
        } else {
            None
        };
        Some(Stmt::If {
            condition,
            then_branch,
            else_branch,
            span: start.merge(&end),
        })
    }

    fn parse_switch_stmt(&mut self) -> Option<Stmt> {
        let start = self.advance().span; // 'switch'
        self.expect(TokenKind::ParenOpen, "'(' after 'switch'")?;
        let selector = self.parse_expression()?;
        self.expect(TokenKind::ParenClose, "')' after switch selector")?;
        self.expect(TokenKind::BraceOpen, "'{' to start switch body")?;
        let mut arms = Vec::new();
        let mut seen_default = false;
        let mut seen_labels: Vec<i64> = Vec::new();
        while !self.check(TokenKind::BraceClose) && !self.at_eof() {
            let arm = self.parse_switch_arm()?;
            if arm.is_default {
                if seen_default {
                    self.diagnostics.push(Diagnostic::new(
                        DiagnosticKind::DuplicateDefault,
                        arm.span,
                    ));
                }
                seen_default = true;
            }
            for label in &arm.labels {
                if seen_labels.contains(label) {
                    self.diagnostics
                        .push(Diagnostic::new(DiagnosticKind::DuplicateLabel, arm.span));
                } else {
                    seen_labels.push(*label);
                }
            }
            arms.push(arm);
        }
        let end = self.expect(TokenKind::BraceClose, "'}'")?.span;
        Some(Stmt::Switch {
            selector,
            arms,
            span: start.merge(&end),
        })
    }

    fn parse_switch_arm(&mut self) -> Option<SwitchArm> {
        let start = self.span();
        let mut labels = Vec::new();
        let mut is_default = false;
        loop {
            if self.bump_if(TokenKind::KwDefault) {
                is_default = true;
            } else {
                let tok = self.expect_any_integer_literal()?;
                labels.push(parse_integer_text(&tok.text) as i64);
            }
            if !self.bump_if(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::Colon, "':' after case label(s)")?;
        self.breakable_depth += 1;
        let mut body = Vec::new();
        while !matches!(
            self.kind(0),
            TokenKind::KwDefault | TokenKind::IntegerLiteral { .. } | TokenKind::BraceClose
        ) && !self.at_eof()
        {
            match self.parse_stmt() {
                Some(s) => body.push(s),
                None => self.synchronize(),
            }
        }
        self.breakable_depth -= 1;
        let end = body.last().map(|s| s.span()).unwrap_or(start);
        Some(SwitchArm {
            labels,
            is_default,
            body,
            span: start.merge(&end),
        })
    }

    fn parse_for_stmt(&mut self) -> Option<Stmt> {
        let start = self.advance().span; // 'for'
        self.expect(TokenKind::ParenOpen, "'(' after 'for'")?;
        let init = if self.check(TokenKind::Semicolon) {
            self.advance();
            None
        } else if self.check(TokenKind::KwVar) {
            Some(Box::new(self.parse_var_decl_stmt()?))
        } else {
            let start = self.span();
            let expr = self.parse_expression()?;
            let end = self.expect(TokenKind::Semicolon, "';' after for-loop initializer")?.span;
            Some(Box::new(Stmt::Expression {
                expr,
                span: start.merge(&end),
            }))
        };
        let condition = if self.check(TokenKind::Semicolon) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect(TokenKind::Semicolon, "';' after for-loop condition")?;
        let mut step = Vec::new();
        if !self.check(TokenKind::ParenClose) {
            loop {
                step.push(self.parse_expression()?);
                if !self.bump_if(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::ParenClose, "')' after for-loop step")?;
        self.loop_depth += 1;
        self.breakable_depth += 1;
        let body = self.parse_block()?;
        self.loop_depth -= 1;
        self.breakable_depth -= 1;
        let span = start.merge(&body.span);
        Some(Stmt::For {
            init,
            condition,
            step,
            body,
            span,
        })
    }

    fn parse_while_stmt(&mut self) -> Option<Stmt> {
        let start = self.advance().span; // 'while'
        self.expect(TokenKind::ParenOpen, "'(' after 'while'")?;
        let condition = self.parse_expression()?;
        self.expect(TokenKind::ParenClose, "')' after condition")?;
        self.loop_depth += 1;
        self.breakable_depth += 1;
        let body = self.parse_block()?;
        self.loop_depth -= 1;
        self.breakable_depth -= 1;
        let span = start.merge(&body.span);
        Some(Stmt::While {
            condition,
            body,
            span,
        })
    }

    fn parse_do_while_stmt(&mut self) -> Option<Stmt> {
        let start = self.advance().span; // 'do'
        self.loop_depth += 1;
        self.breakable_depth += 1;
        let body = self.parse_block()?;
        self.loop_depth -= 1;
        self.breakable_depth -= 1;
        self.expect(TokenKind::KwWhile, "'while' after do-block")?;
        self.expect(TokenKind::ParenOpen, "'(' after 'while'")?;
        let condition = self.parse_expression()?;
        self.expect(TokenKind::ParenClose, "')' after condition")?;
        let end = self.expect(TokenKind::Semicolon, "';' after do-while")?.span;
        Some(Stmt::DoWhile {
            body,
            condition,
            span: start.merge(&end),
        })
    }

    fn parse_return_stmt(&mut self) -> Option<Stmt> {
        let start = self.advance().span; // 'return'
        let value = if self.check(TokenKind::Semicolon) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        let end = self.expect(TokenKind::Semicolon, "';' after return")?.span;
        Some(Stmt::Return {
            value,
            span: start.merge(&end),
        })
    }

    fn parse_break_stmt(&mut self) -> Option<Stmt> {
        let start = self.advance().span; // 'break'
        if self.breakable_depth == 0 {
            self.diagnostics
                .push(Diagnostic::new(DiagnosticKind::BreakOutsideLoop, start));
        }
        let end = self.expect(TokenKind::Semicolon, "';' after 'break'")?.span;
        Some(Stmt::Break {
            span: start.merge(&end),
        })
    }

    fn parse_continue_stmt(&mut self) -> Option<Stmt> {
        let start = self.advance().span; // 'continue'
        if self.loop_depth == 0 {
            self.diagnostics
                .push(Diagnostic::new(DiagnosticKind::ContinueOutsideLoop, start));
        }
        let end = self.expect(TokenKind::Semicolon, "';' after 'continue'")?.span;
        Some(Stmt::Continue {
            span: start.merge(&end),
        })
    }

    fn parse_var_decl_stmt(&mut self) -> Option<Stmt> {
        let start = self.advance().span; // 'var'
        let mutable = self.bump_if(TokenKind::KwMut);
        let name = self.expect(TokenKind::Identifier, "a variable name")?.text;
        let ty = if self.bump_if(TokenKind::Colon) {
            Some(self.parse_type_expr()?)
        } else {
            None
        };
        let init = if self.bump_if(TokenKind::Equals) {
            Some(self.parse_expression()?)
        } else {
            None
        };
        let end = self
            .expect(TokenKind::Semicolon, "';' after variable declaration")?
            .span;
        Some(Stmt::Variable(VarDecl {
            name,
            ty,
            mutable,
            init,
            span: start.merge(&end),
        }))
    }

    // -- expressions: precedence climbing -------------------------------

    fn parse_expression(&mut self) -> Option<Expr> {
        self.parse_assignment()
    }

    fn parse_assignment(&mut self) -> Option<Expr> {
        if self.check(TokenKind::KwIf) {
            return self.parse_if_expr();
        }
        let lhs = self.parse_logical_or()?;
        if let Some(op) = self.match_assign_op() {
            let value = self.parse_assignment()?; // right-associative
            let span = lhs.span.merge(&value.span);
            return Some(Expr {
                kind: ExprKind::Assignment {
                    op,
                    target: Box::new(lhs),
                    value: Box::new(value),
                },
                span,
                evaluated_type: None,
            });
        }
        Some(lhs)
    }

    fn parse_if_expr(&mut self) -> Option<Expr> {
        let start = self.advance().span; // 'if'
        self.expect(TokenKind::ParenOpen, "'(' after 'if'")?;
        let condition = self.parse_expression()?;
        self.expect(TokenKind::ParenClose, "')' after condition")?;
        let then_expr = self.parse_assignment()?;
        self.expect(TokenKind::KwElse, "'else' to complete an if-expression")?;
        let else_expr = self.parse_assignment()?; // right-associative: chains `else if`
        let span = start.merge(&else_expr.span);
        Some(Expr {
            kind: ExprKind::If {
                condition: Box::new(condition),
                then_expr: Box::new(then_expr),
                else_expr: Box::new(else_expr),
            },
            span,
            evaluated_type: None,
        })
    }

    /// `=`, or a compound-assignment combo (`+=`, `<<=`, ...). Must run
    /// before any lower tier gets a chance to treat the leading character
    /// as its own operator.
    fn match_assign_op(&mut self) -> Option<CompoundOp> {
        let (op, len) = match (self.kind(0), self.kind(1), self.kind(2)) {
            (TokenKind::AngleOpen, TokenKind::AngleOpen, TokenKind::Equals)
                if self.adjacent(0) && self.adjacent(1) =>
            {
                (CompoundOp::Shl, 3)
            }
            (TokenKind::AngleClose, TokenKind::AngleClose, TokenKind::Equals)
                if self.adjacent(0) && self.adjacent(1) =>
            {
                (CompoundOp::Shr, 3)
            }
            (TokenKind::Plus, TokenKind::Equals, _) if self.adjacent(0) => (CompoundOp::Add, 2),
            (TokenKind::Minus, TokenKind::Equals, _) if self.adjacent(0) => (CompoundOp::Sub, 2),
            (TokenKind::Star, TokenKind::Equals, _) if self.adjacent(0) => (CompoundOp::Mul, 2),
            (TokenKind::Slash, TokenKind::Equals, _) if self.adjacent(0) => (CompoundOp::Div, 2),
            (TokenKind::Percent, TokenKind::Equals, _) if self.adjacent(0) => (CompoundOp::Rem, 2),
            (TokenKind::Amp, TokenKind::Equals, _) if self.adjacent(0) => (CompoundOp::And, 2),
            (TokenKind::Pipe, TokenKind::Equals, _) if self.adjacent(0) => (CompoundOp::Or, 2),
            (TokenKind::Caret, TokenKind::Equals, _) if self.adjacent(0) => (CompoundOp::Xor, 2),
            (TokenKind::Equals, TokenKind::Equals, _) if self.adjacent(0) => return None,
            (TokenKind::Equals, _, _) => (CompoundOp::Assign, 1),
            _ => return None,
        };
        for _ in 0..len {
            self.advance();
        }
        Some(op)
    }

    fn parse_logical_or(&mut self) -> Option<Expr> {
        let mut lhs = self.parse_logical_and()?;
        while self.check(TokenKind::Pipe) && self.kind(1) == TokenKind::Pipe && self.adjacent(0) {
            let op_span = self.tok(0).span.merge(&self.tok(1).span);
            self.advance();
            self.advance();
            let rhs = self.parse_logical_and()?;
            lhs = binary_call("||", op_span, lhs, rhs);
        }
        Some(lhs)
    }

    fn parse_logical_and(&mut self) -> Option<Expr> {
        let mut lhs = self.parse_bitor()?;
        while self.check(TokenKind::Amp) && self.kind(1) == TokenKind::Amp && self.adjacent(0) {
            let op_span = self.tok(0).span.merge(&self.tok(1).span);
            self.advance();
            self.advance();
            let rhs = self.parse_bitor()?;
            lhs = binary_call("&&", op_span, lhs, rhs);
        }
        Some(lhs)
    }

    fn parse_bitor(&mut self) -> Option<Expr> {
        let mut lhs = self.parse_bitxor()?;
        loop {
            let is_double = self.kind(1) == TokenKind::Pipe && self.adjacent(0);
            let is_assign = self.kind(1) == TokenKind::Equals && self.adjacent(0);
            if self.check(TokenKind::Pipe) && !is_double && !is_assign {
                let op_span = self.advance().span;
                let rhs = self.parse_bitxor()?;
                lhs = binary_call("|", op_span, lhs, rhs);
            } else {
                break;
            }
        }
        Some(lhs)
    }

    fn parse_bitxor(&mut self) -> Option<Expr> {
        let mut lhs = self.parse_bitand()?;
        while self.check(TokenKind::Caret)
            && !(self.kind(1) == TokenKind::Equals && self.adjacent(0))
        {
            let op_span = self.advance().span;
            let rhs = self.parse_bitand()?;
            lhs = binary_call("^", op_span, lhs, rhs);
        }
        Some(lhs)
    }

    fn parse_bitand(&mut self) -> Option<Expr> {
        let mut lhs = self.parse_equality()?;
        loop {
            let is_double = self.kind(1) == TokenKind::Amp && self.adjacent(0);
            let is_assign = self.kind(1) == TokenKind::Equals && self.adjacent(0);
            if self.check(TokenKind::Amp) && !is_double && !is_assign {
                let op_span = self.advance().span;
                let rhs = self.parse_equality()?;
                lhs = binary_call("&", op_span, lhs, rhs);
            } else {
                break;
            }
        }
        Some(lhs)
    }

    fn parse_equality(&mut self) -> Option<Expr> {
        let mut lhs = self.parse_relational()?;
        loop {
            let op = if self.check(TokenKind::Equals)
                && self.kind(1) == TokenKind::Equals
                && self.adjacent(0)
            {
                Some("==")
            } else if self.check(TokenKind::Bang)
                && self.kind(1) == TokenKind::Equals
                && self.adjacent(0)
            {
                Some("!=")
            } else {
                None
            };
            let Some(op) = op else { break };
            let op_span = self.tok(0).span.merge(&self.tok(1).span);
            self.advance();
            self.advance();
            let rhs = self.parse_relational()?;
            lhs = binary_call(op, op_span, lhs, rhs);
        }
        Some(lhs)
    }

    fn parse_relational(&mut self) -> Option<Expr> {
        let mut lhs = self.parse_shift()?;
        loop {
            let doubled_lt = self.kind(1) == TokenKind::AngleOpen && self.adjacent(0);
            let doubled_gt = self.kind(1) == TokenKind::AngleClose && self.adjacent(0);
            if self.check(TokenKind::AngleOpen) && self.kind(1) == TokenKind::Equals && self.adjacent(0) {
                let op_span = self.tok(0).span.merge(&self.tok(1).span);
                self.advance();
                self.advance();
                let rhs = self.parse_shift()?;
                lhs = binary_call("<=", op_span, lhs, rhs);
            } else if self.check(TokenKind::AngleClose)
                && self.kind(1) == TokenKind::Equals
                && self.adjacent(0)
            {
                let op_span = self.tok(0).span.merge(&self.tok(1).span);
                self.advance();
                self.advance();
                let rhs = self.parse_shift()?;
                lhs = binary_call(">=", op_span, lhs, rhs);
            } else if self.check(TokenKind::AngleOpen) && !doubled_lt {
                let op_span = self.advance().span;
                let rhs = self.parse_shift()?;
                lhs = binary_call("<", op_span, lhs, rhs);
            } else if self.check(TokenKind::AngleClose) && !doubled_gt {
                let op_span = self.advance().span;
                let rhs = self.parse_shift()?;
                lhs = binary_call(">", op_span, lhs, rhs);
            } else {
                break;
            }
        }
        Some(lhs)
    }

    fn parse_shift(&mut self) -> Option<Expr> {
        let mut lhs = self.parse_additive()?;
        loop {
            let is_shl = self.check(TokenKind::AngleOpen)
                && self.kind(1) == TokenKind::AngleOpen
                && self.adjacent(0)
                && !(self.kind(2) == TokenKind::Equals && self.adjacent(1));
            let is_shr = self.check(TokenKind::AngleClose)
                && self.kind(1) == TokenKind::AngleClose
                && self.adjacent(0)
                && !(self.kind(2) == TokenKind::Equals && self.adjacent(1));
            if is_shl {
                let op_span = self.tok(0).span.merge(&self.tok(1).span);
                self.advance();
                self.advance();
                let rhs = self.parse_additive()?;
                lhs = binary_call("<<", op_span, lhs, rhs);
            } else if is_shr {
                let op_span = self.tok(0).span.merge(&self.tok(1).span);
                self.advance();
                self.advance();
                let rhs = self.parse_additive()?;
                lhs = binary_call(">>", op_span, lhs, rhs);
            } else {
                break;
            }
        }
        Some(lhs)
    }

    fn parse_additive(&mut self) -> Option<Expr> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let plus_eq = self.kind(1) == TokenKind::Equals && self.adjacent(0);
            if self.check(TokenKind::Plus) && !plus_eq {
                let op_span = self.advance().span;
                let rhs = self.parse_multiplicative()?;
                lhs = binary_call("+", op_span, lhs, rhs);
            } else if self.check(TokenKind::Minus) && !plus_eq {
                let op_span = self.advance().span;
                let rhs = self.parse_multiplicative()?;
                lhs = binary_call("-", op_span, lhs, rhs);
            } else {
                break;
            }
        }
        Some(lhs)
    }

    fn parse_multiplicative(&mut self) -> Option<Expr> {
        let mut lhs = self.parse_unary()?;
        loop {
            let eq_next = self.kind(1) == TokenKind::Equals && self.adjacent(0);
            if self.check(TokenKind::Star) && !eq_next {
                let op_span = self.advance().span;
                let rhs = self.parse_unary()?;
                lhs = binary_call("*", op_span, lhs, rhs);
            } else if self.check(TokenKind::Slash) && !eq_next {
                let op_span = self.advance().span;
                let rhs = self.parse_unary()?;
                lhs = binary_call("/", op_span, lhs, rhs);
            } else if self.check(TokenKind::Percent) && !eq_next {
                let op_span = self.advance().span;
                let rhs = self.parse_unary()?;
                lhs = binary_call("%", op_span, lhs, rhs);
            } else {
                break;
            }
        }
        Some(lhs)
    }

    /// Right-associative prefix operators: `-x`, `!x`, `~x`.
    fn parse_unary(&mut self) -> Option<Expr> {
        let op = match self.kind(0) {
            TokenKind::Minus => "-",
            TokenKind::Bang => "!",
            TokenKind::Tilde => "~",
            _ => return self.parse_postfix(),
        };
        let op_span = self.advance().span;
        let operand = self.parse_unary()?;
        let span = op_span.merge(&operand.span);
        Some(Expr {
            kind: ExprKind::Call {
                callee: op.to_string(),
                args: vec![operand],
            },
            span,
            evaluated_type: None,
        })
    }

    fn parse_postfix(&mut self) -> Option<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.check(TokenKind::Dot) {
                self.advance();
                let field = self.expect(TokenKind::Identifier, "a field name")?;
                let span = expr.span.merge(&field.span);
                expr = Expr {
                    kind: ExprKind::FieldAccess {
                        base: Box::new(expr),
                        field: field.text,
                    },
                    span,
                    evaluated_type: None,
                };
            } else if self.check(TokenKind::BracketOpen) {
                self.advance();
                let index = self.parse_expression()?;
                let end = self.expect(TokenKind::BracketClose, "']'")?.span;
                let span = expr.span.merge(&end);
                expr = Expr {
                    kind: ExprKind::Index {
                        base: Box::new(expr),
                        index: Box::new(index),
                    },
                    span,
                    evaluated_type: None,
                };
            } else {
                break;
            }
        }
        Some(expr)
    }

    fn parse_primary(&mut self) -> Option<Expr> {
        let start = self.span();
        match self.kind(0) {
            TokenKind::ParenOpen => {
                self.advance();
                let inner = self.parse_expression()?;
                self.expect(TokenKind::ParenClose, "')'")?;
                Some(inner)
            }
            TokenKind::KwReinterpret => {
                self.advance();
                self.expect(TokenKind::AngleOpen, "'<' after 'reinterpret'")?;
                let ty = self.parse_type_expr()?;
                self.expect(TokenKind::AngleClose, "'>' after reinterpret target type")?;
                self.expect(TokenKind::ParenOpen, "'(' after reinterpret type")?;
                let value = self.parse_expression()?;
                let end = self.expect(TokenKind::ParenClose, "')'")?.span;
                Some(Expr {
                    kind: ExprKind::Reinterpret {
                        ty,
                        value: Box::new(value),
                    },
                    span: start.merge(&end),
                    evaluated_type: None,
                })
            }
            TokenKind::KwDefault => {
                self.advance();
                self.expect(TokenKind::ParenOpen, "'(' after 'default'")?;
                let ty = self.parse_type_expr()?;
                let end = self.expect(TokenKind::ParenClose, "')'")?.span;
                Some(Expr {
                    kind: ExprKind::Default { ty },
                    span: start.merge(&end),
                    evaluated_type: None,
                })
            }
            TokenKind::BoolLiteral(b) => {
                self.advance();
                Some(Expr {
                    kind: ExprKind::Literal(Literal::Bool(b)),
                    span: start,
                    evaluated_type: None,
                })
            }
            TokenKind::IntegerLiteral { unsigned, .. } => {
                let text = self.advance().text;
                Some(Expr {
                    kind: ExprKind::Literal(Literal::Int {
                        value: parse_integer_text(&text),
                        unsigned,
                    }),
                    span: start,
                    evaluated_type: None,
                })
            }
            TokenKind::FloatLiteral { is_f64 } => {
                let text = self.advance().text;
                Some(Expr {
                    kind: ExprKind::Literal(Literal::Float {
                        value: text.parse().unwrap_or(0.0),
                        is_f64,
                    }),
                    span: start,
                    evaluated_type: None,
                })
            }
            TokenKind::Identifier => self.parse_identifier_or_call(),
            _ => {
                self.error_here("expected an expression");
                None
            }
        }
    }

    fn parse_identifier_or_call(&mut self) -> Option<Expr> {
        let name_tok = self.advance();
        if !self.check(TokenKind::ParenOpen) {
            return Some(Expr {
                kind: ExprKind::Identifier(name_tok.text),
                span: name_tok.span,
                evaluated_type: None,
            });
        }
        // `Name(` — a builtin-type spelling is a constructor call, anything
        // else (including a struct name) is an ordinary function call; the
        // two are indistinguishable without a symbol table, which this
        // stage doesn't have (see DESIGN.md).
        if let Some(builtin) = parse_builtin_type_name(&name_tok.text) {
            let args = self.parse_initialiser_args()?;
            return self.finish_initialiser_call(name_tok.span, TypeExpr::Builtin(builtin), args);
        }
        self.advance(); // '('
        let mut args = Vec::new();
        if !self.check(TokenKind::ParenClose) {
            loop {
                args.push(self.parse_expression()?);
                if !self.bump_if(TokenKind::Comma) {
                    break;
                }
            }
        }
        let end = self.expect(TokenKind::ParenClose, "')' after call arguments")?.span;
        Some(Expr {
            kind: ExprKind::Call {
                callee: name_tok.text,
                args,
            },
            span: name_tok.span.merge(&end),
            evaluated_type: None,
        })
    }

    fn parse_initialiser_args(&mut self) -> Option<Vec<InitialiserArg>> {
        self.advance(); // '('
        let mut args = Vec::new();
        if !self.check(TokenKind::ParenClose) {
            loop {
                if self.check(TokenKind::Identifier) && self.kind(1) == TokenKind::Colon {
                    let name = self.advance().text;
                    self.advance(); // ':'
                    let value = self.parse_expression()?;
                    args.push(InitialiserArg::Named(name, value));
                } else {
                    args.push(InitialiserArg::Positional(self.parse_expression()?));
                }
                if !self.bump_if(TokenKind::Comma) {
                    break;
                }
            }
        }
        Some(args)
    }

    fn finish_initialiser_call(
        &mut self,
        start: Span,
        ty: TypeExpr,
        args: Vec<InitialiserArg>,
    ) -> Option<Expr> {
        let end = self.expect(TokenKind::ParenClose, "')' after constructor arguments")?.span;
        Some(Expr {
            kind: ExprKind::InitialiserCall { ty, args },
            span: start.merge(&end),
            evaluated_type: None,
        })
    }
}

impl<'t> Parser<'t> {
    fn expect_any_integer_literal(&mut self) -> Option<Token> {
        if matches!(self.kind(0), TokenKind::IntegerLiteral { .. }) {
            Some(self.advance())
        } else {
            self.error_here("expected an integer case label");
            None
        }
    }
}

fn binary_call(op: &str, op_span: Span, lhs: Expr, rhs: Expr) -> Expr {
    let span = lhs.span.merge(&op_span).merge(&rhs.span);
    Expr {
        kind: ExprKind::Call {
            callee: op.to_string(),
            args: vec![lhs, rhs],
        },
        span,
        evaluated_type: None,
    }
}

fn buffer_kind_from_attributes(attributes: &[Attribute]) -> Option<BufferKind> {
    attributes.iter().find_map(|a| match a.name.as_str() {
        "uniform" => Some(BufferKind::Uniform),
        "push_constant" => Some(BufferKind::PushConstant),
        "storage" => Some(BufferKind::Storage),
        _ => None,
    })
}

fn parse_integer_text(text: &str) -> u64 {
    let trimmed = text
        .trim_end_matches(['u', 'U'])
        .trim_start_matches("0x")
        .trim_start_matches("0X")
        .trim_start_matches("0b")
        .trim_start_matches("0B");
    let radix = if text.starts_with("0x") || text.starts_with("0X") {
        16
    } else if text.starts_with("0b") || text.starts_with("0B") {
        2
    } else {
        10
    };
    u64::from_str_radix(trimmed, radix).unwrap_or(0)
}

/// Recognize a builtin type spelling (`vec3`, `mat4x4`, `isampler2DArray`,
/// ...), per §4.8's vector/matrix naming table and the sampler/image naming
/// convention in §3.
fn parse_builtin_type_name(name: &str) -> Option<BuiltinType> {
    match name {
        "void" => return Some(BuiltinType::Void),
        "bool" => return Some(BuiltinType::Bool),
        "int" => return Some(BuiltinType::Int),
        "uint" => return Some(BuiltinType::Uint),
        "float" => return Some(BuiltinType::Float),
        "double" => return Some(BuiltinType::Double),
        "sampler" => return Some(BuiltinType::Sampler),
        _ => {}
    }
    if let Some(n) = name.strip_prefix("dvec").and_then(|s| s.parse::<u8>().ok()) {
        return Some(BuiltinType::Dvec(n));
    }
    if let Some(n) = name.strip_prefix("bvec").and_then(|s| s.parse::<u8>().ok()) {
        return Some(BuiltinType::Bvec(n));
    }
    if let Some(n) = name.strip_prefix("ivec").and_then(|s| s.parse::<u8>().ok()) {
        return Some(BuiltinType::Ivec(n));
    }
    if let Some(n) = name.strip_prefix("uvec").and_then(|s| s.parse::<u8>().ok()) {
        return Some(BuiltinType::Uvec(n));
    }
    if let Some(n) = name.strip_prefix("vec").and_then(|s| s.parse::<u8>().ok()) {
        return Some(BuiltinType::Vec(n));
    }
    if let Some(dims) = name.strip_prefix("dmat").and_then(parse_matrix_dims) {
        return Some(BuiltinType::Dmat(dims.0, dims.1));
    }
    if let Some(dims) = name.strip_prefix("mat").and_then(parse_matrix_dims) {
        return Some(BuiltinType::Mat(dims.0, dims.1));
    }
    parse_image_sampler_name(name)
}

fn parse_matrix_dims(rest: &str) -> Option<(u8, u8)> {
    if let Ok(n) = rest.parse::<u8>() {
        return Some((n, n));
    }
    let (c, r) = rest.split_once('x')?;
    Some((c.parse().ok()?, r.parse().ok()?))
}

/// `[i|u]sampler<Dim><MS?><Array?><Shadow?>` for combined sampler+texture
/// types, `[i|u](texture|image)<Dim><MS?><Array?>` for the two flavours of
/// sampler-less image object.
fn parse_image_sampler_name(name: &str) -> Option<BuiltinType> {
    let (sampled_type, rest, is_sampler) = if let Some(r) = name.strip_prefix("isampler") {
        (ScalarKind::Int, r, true)
    } else if let Some(r) = name.strip_prefix("usampler") {
        (ScalarKind::Uint, r, true)
    } else if let Some(r) = name.strip_prefix("sampler") {
        (ScalarKind::Float, r, true)
    } else if let Some(r) = name.strip_prefix("itexture") {
        (ScalarKind::Int, r, false)
    } else if let Some(r) = name.strip_prefix("utexture") {
        (ScalarKind::Uint, r, false)
    } else if let Some(r) = name.strip_prefix("texture") {
        (ScalarKind::Float, r, false)
    } else if let Some(r) = name.strip_prefix("iimage") {
        (ScalarKind::Int, r, false)
    } else if let Some(r) = name.strip_prefix("uimage") {
        (ScalarKind::Uint, r, false)
    } else if let Some(r) = name.strip_prefix("image") {
        (ScalarKind::Float, r, false)
    } else {
        return None;
    };

    let mut rest = rest;
    let depth = rest.strip_suffix("Shadow").map(|r| rest = r).is_some();
    let arrayed = rest.strip_suffix("Array").map(|r| rest = r).is_some();
    let multisampled = rest.strip_suffix("MS").map(|r| rest = r).is_some();

    let dim = match rest {
        "1D" => ImageDim::D1,
        "2D" => ImageDim::D2,
        "3D" => ImageDim::D3,
        "Cube" => ImageDim::Cube,
        "Buffer" => ImageDim::Buffer,
        "2DRect" => ImageDim::Rect,
        "Subpass" => ImageDim::Subpass,
        _ => return None,
    };
    let descriptor = ImageDescriptor {
        sampled_type,
        dim,
        arrayed,
        multisampled,
        depth,
        pure_texture: !is_sampler,
    };
    Some(if is_sampler {
        BuiltinType::SampledImage(descriptor)
    } else {
        BuiltinType::Image(descriptor)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;
    use crate::source::SourceManager;

    fn parse_src(src: &str) -> (Program, Vec<Diagnostic>) {
        let mut sources = SourceManager::new();
        let id = sources.insert("t.dsl", src.as_bytes().to_vec()).unwrap();
        let lexer = Lexer::new(&sources, id);
        let (tokens, lex_diags) = lexer.tokenize();
        let (program, mut diags) = parse(&tokens);
        diags.extend(lex_diags);
        (program, diags)
    }

    fn only_function(program: &Program) -> &FunctionDecl {
        match &program.decls[0] {
            Decl::Function(f) => f,
            other => panic!("expected a function decl, got {other:?}"),
        }
    }

    fn callee_chain(expr: &Expr) -> Vec<&str> {
        match &expr.kind {
            ExprKind::Call { callee, args } => {
                let mut v = vec![callee.as_str()];
                for a in args {
                    v.extend(callee_chain(a));
                }
                v
            }
            ExprKind::Identifier(_) | ExprKind::Literal(_) => Vec::new(),
            _ => Vec::new(),
        }
    }

    #[test]
    fn multiplication_binds_tighter_than_addition() {
        let (program, diags) = parse_src("int f() { return a + b * c; }");
        assert!(diags.is_empty(), "{diags:?}");
        let f = only_function(&program);
        let Stmt::Return { value: Some(ret), .. } = &f.body.statements[0] else {
            panic!("expected return");
        };
        match &ret.kind {
            ExprKind::Call { callee, args } => {
                assert_eq!(callee, "+");
                assert_eq!(callee_chain(&args[1])[0], "*");
            }
            other => panic!("expected a call node, got {other:?}"),
        }
    }

    #[test]
    fn assignment_is_right_associative() {
        let (program, diags) = parse_src("int f() { a = b = c; return 0; }");
        assert!(diags.is_empty(), "{diags:?}");
        let f = only_function(&program);
        let Stmt::Expression { expr, .. } = &f.body.statements[0] else {
            panic!("expected expression statement");
        };
        match &expr.kind {
            ExprKind::Assignment { target, value, .. } => {
                assert!(matches!(target.kind, ExprKind::Identifier(_)));
                assert!(matches!(value.kind, ExprKind::Assignment { .. }));
            }
            other => panic!("expected assignment, got {other:?}"),
        }
    }

    #[test]
    fn compound_assign_is_not_split_by_additive_tier() {
        let (program, diags) = parse_src("int f() { a += 1; return 0; }");
        assert!(diags.is_empty(), "{diags:?}");
        let f = only_function(&program);
        let Stmt::Expression { expr, .. } = &f.body.statements[0] else {
            panic!("expected expression statement");
        };
        match &expr.kind {
            ExprKind::Assignment { op, .. } => assert_eq!(*op, CompoundOp::Add),
            other => panic!("expected compound assignment, got {other:?}"),
        }
    }

    #[test]
    fn shift_is_not_confused_with_relational_or_compound_assign() {
        let (program, diags) = parse_src("int f() { return a << b; }");
        assert!(diags.is_empty(), "{diags:?}");
        let f = only_function(&program);
        let Stmt::Return { value: Some(ret), .. } = &f.body.statements[0] else {
            panic!("expected return");
        };
        match &ret.kind {
            ExprKind::Call { callee, .. } => assert_eq!(callee, "<<"),
            other => panic!("expected a call node, got {other:?}"),
        }
    }

    #[test]
    fn if_expression_is_right_associative() {
        let (program, diags) =
            parse_src("int f() { return if (a) 1 else if (b) 2 else 3; }");
        assert!(diags.is_empty(), "{diags:?}");
        let f = only_function(&program);
        let Stmt::Return { value: Some(ret), .. } = &f.body.statements[0] else {
            panic!("expected return");
        };
        match &ret.kind {
            ExprKind::If { else_expr, .. } => {
                assert!(matches!(else_expr.kind, ExprKind::If { .. }));
            }
            other => panic!("expected if-expression, got {other:?}"),
        }
    }

    #[test]
    fn vector_constructor_is_an_initialiser_call() {
        let (program, diags) = parse_src("int f() { return vec3(1.0, 2.0, 3.0); }");
        assert!(diags.is_empty(), "{diags:?}");
        let f = only_function(&program);
        let Stmt::Return { value: Some(ret), .. } = &f.body.statements[0] else {
            panic!("expected return");
        };
        assert!(matches!(
            ret.kind,
            ExprKind::InitialiserCall {
                ty: TypeExpr::Builtin(BuiltinType::Vec(3)),
                ..
            }
        ));
    }

    #[test]
    fn struct_call_syntax_is_an_ordinary_call() {
        let (program, diags) = parse_src("int f() { return Light(1); }");
        assert!(diags.is_empty(), "{diags:?}");
        let f = only_function(&program);
        let Stmt::Return { value: Some(ret), .. } = &f.body.statements[0] else {
            panic!("expected return");
        };
        assert!(matches!(ret.kind, ExprKind::Call { .. }));
    }

    #[test]
    fn empty_struct_reports_diagnostic() {
        let (_, diags) = parse_src("struct Empty {}");
        assert!(diags.iter().any(|d| d.kind == DiagnosticKind::EmptyStruct));
    }

    #[test]
    fn duplicate_switch_labels_are_flagged() {
        let src = "int f() { switch (a) { 1: { break; } 1: { break; } } return 0; }";
        let (_, diags) = parse_src(src);
        assert!(diags
            .iter()
            .any(|d| d.kind == DiagnosticKind::DuplicateLabel));
    }

    #[test]
    fn break_outside_loop_is_flagged() {
        let (_, diags) = parse_src("int f() { break; return 0; }");
        assert!(diags
            .iter()
            .any(|d| d.kind == DiagnosticKind::BreakOutsideLoop));
    }

    #[test]
    fn recovers_after_malformed_statement_and_keeps_parsing() {
        let src = "int f() { @@@ return 0; }";
        let (program, diags) = parse_src(src);
        assert!(!diags.is_empty());
        let f = only_function(&program);
        assert!(matches!(f.body.statements.last(), Some(Stmt::Return { .. })));
    }

    #[test]
    fn stage_function_parses_pass_and_stage() {
        let (program, diags) = parse_src("vec4 main::fragment() { return vec4(0.0); }");
        assert!(diags.is_empty(), "{diags:?}");
        match &program.decls[0] {
            Decl::StageFunction(f) => {
                assert_eq!(f.pass, "main");
                assert_eq!(f.stage, StageKind::Fragment);
            }
            other => panic!("expected a stage function, got {other:?}"),
        }
    }

    #[test]
    fn sourced_param_records_its_source_in_an_attribute() {
        let (program, diags) =
            parse_src("vec4 main::vertex(position: vec3 from mesh) { return vec4(0.0); }");
        assert!(diags.is_empty(), "{diags:?}");
        match &program.decls[0] {
            Decl::StageFunction(f) => {
                let attr = &f.params[0].attributes[0];
                assert_eq!(attr.name, "from");
                assert!(matches!(
                    attr.args[0],
                    AttributeArg::Identifier(ref s) if s == "mesh"
                ));
            }
            other => panic!("expected a stage function, got {other:?}"),
        }
    }
}
