//! Recursive-descent parser.

use crate::uwscript::ast::{
    AssignOp, BinOp, Expr, ExprKind, IfArm, LValue, Span, Stmt, StmtKind, UnOp,
};
use crate::uwscript::token::{Keyword, Op, Token, TokenKind};
use crate::uwscript::CompileError;

pub fn parse(tokens: Vec<Token>) -> Result<Vec<Stmt>, CompileError> {
    Parser { tokens, pos: 0 }.parse_program()
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn span(&self) -> Span {
        let token = self.peek();
        Span {
            line: token.line,
            column: token.column,
        }
    }

    fn error(&self, message: impl Into<String>) -> CompileError {
        let token = self.peek();
        CompileError::Parse {
            line: token.line,
            column: token.column,
            message: message.into(),
        }
    }

    fn check(&self, kind: &TokenKind) -> bool {
        &self.peek().kind == kind
    }

    fn check_keyword(&self, keyword: Keyword) -> bool {
        self.peek().kind == TokenKind::Keyword(keyword)
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind, what: &str) -> Result<Token, CompileError> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(self.error(format!("expected {what}")))
        }
    }

    fn expect_ident(&mut self, what: &str) -> Result<String, CompileError> {
        match &self.peek().kind {
            TokenKind::Ident(name) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            _ => Err(self.error(format!("expected {what}"))),
        }
    }

    fn skip_eols(&mut self) {
        while self.check(&TokenKind::Eol) {
            self.advance();
        }
    }

    /// Statements end at a newline; it is consumed when present so the
    /// last line of a file needs none.
    fn end_statement(&mut self) {
        self.eat(&TokenKind::Eol);
    }

    fn parse_program(&mut self) -> Result<Vec<Stmt>, CompileError> {
        let mut statements = Vec::new();
        loop {
            self.skip_eols();
            if self.check(&TokenKind::Eof) {
                return Ok(statements);
            }
            statements.push(self.parse_statement(true)?);
        }
    }

    /// Parse statements until one of `stops`; the stop keyword is left
    /// for the caller.
    fn parse_block(
        &mut self,
        stops: &[Keyword],
        construct: &str,
    ) -> Result<Vec<Stmt>, CompileError> {
        let mut statements = Vec::new();
        loop {
            self.skip_eols();
            if self.check(&TokenKind::Eof) {
                return Err(self.error(format!("missing end of {construct}")));
            }
            if let TokenKind::Keyword(keyword) = self.peek().kind {
                if stops.contains(&keyword) {
                    return Ok(statements);
                }
            }
            statements.push(self.parse_statement(false)?);
        }
    }

    fn parse_statement(&mut self, top_level: bool) -> Result<Stmt, CompileError> {
        let span = self.span();
        match &self.peek().kind {
            TokenKind::Keyword(keyword) => match keyword {
                Keyword::Let => self.parse_let(span),
                Keyword::If => self.parse_if(span),
                Keyword::While => self.parse_while(span),
                Keyword::Function => {
                    if !top_level {
                        return Err(
                            self.error("function definitions must appear at top level")
                        );
                    }
                    self.parse_function(span)
                }
                Keyword::Return => self.parse_return(span),
                Keyword::Say => self.parse_say(span),
                Keyword::Ask => self.parse_ask(span),
                Keyword::Menu => self.parse_menu(span),
                Keyword::FilterMenu => self.parse_filtermenu(span),
                Keyword::Goto => self.parse_goto(span),
                Keyword::Label => self.parse_label(span),
                Keyword::Exit => {
                    self.advance();
                    self.end_statement();
                    Ok(Stmt {
                        kind: StmtKind::Exit,
                        span,
                    })
                }
                Keyword::True | Keyword::False | Keyword::Not => {
                    self.parse_expr_statement(span)
                }
                other => Err(self.error(format!("unexpected keyword '{other:?}'"))),
            },
            TokenKind::Ident(_) => {
                let next = self.tokens.get(self.pos + 1).map(|t| &t.kind);
                let is_assignment = matches!(
                    next,
                    Some(TokenKind::Op(
                        Op::Assign
                            | Op::PlusAssign
                            | Op::MinusAssign
                            | Op::StarAssign
                            | Op::SlashAssign
                    )) | Some(TokenKind::LBracket)
                );
                if is_assignment {
                    self.parse_assignment(span)
                } else {
                    self.parse_expr_statement(span)
                }
            }
            _ => self.parse_expr_statement(span),
        }
    }

    fn parse_expr_statement(&mut self, span: Span) -> Result<Stmt, CompileError> {
        let expr = self.parse_expression()?;
        self.end_statement();
        Ok(Stmt {
            kind: StmtKind::Expr(expr),
            span,
        })
    }

    fn parse_let(&mut self, span: Span) -> Result<Stmt, CompileError> {
        self.advance(); // let
        let name = self.expect_ident("a variable name after 'let'")?;
        self.expect(&TokenKind::Op(Op::Assign), "'=' in variable declaration")?;
        let value = self.parse_expression()?;
        self.end_statement();
        Ok(Stmt {
            kind: StmtKind::Let { name, value },
            span,
        })
    }

    fn parse_assignment(&mut self, span: Span) -> Result<Stmt, CompileError> {
        let target = self.parse_postfix()?;
        let target = match target.kind {
            ExprKind::Ident(name) => LValue::Name(name),
            ExprKind::Index { base, index } => match base.kind {
                ExprKind::Ident(name) => LValue::Element {
                    name,
                    index: *index,
                },
                _ => return Err(self.error("invalid assignment target")),
            },
            _ => return Err(self.error("invalid assignment target")),
        };
        let op = match self.peek().kind {
            TokenKind::Op(Op::Assign) => AssignOp::Assign,
            TokenKind::Op(Op::PlusAssign) => AssignOp::Add,
            TokenKind::Op(Op::MinusAssign) => AssignOp::Sub,
            TokenKind::Op(Op::StarAssign) => AssignOp::Mul,
            TokenKind::Op(Op::SlashAssign) => AssignOp::Div,
            _ => return Err(self.error("expected an assignment operator")),
        };
        self.advance();
        let value = self.parse_expression()?;
        self.end_statement();
        Ok(Stmt {
            kind: StmtKind::Assign { target, op, value },
            span,
        })
    }

    fn parse_if(&mut self, span: Span) -> Result<Stmt, CompileError> {
        self.advance(); // if
        let cond = self.parse_expression()?;
        self.end_statement();
        let body =
            self.parse_block(&[Keyword::ElseIf, Keyword::Else, Keyword::EndIf], "if")?;
        let mut arms = vec![IfArm { cond, body }];

        while self.check_keyword(Keyword::ElseIf) {
            self.advance();
            let cond = self.parse_expression()?;
            self.end_statement();
            let body = self
                .parse_block(&[Keyword::ElseIf, Keyword::Else, Keyword::EndIf], "if")?;
            arms.push(IfArm { cond, body });
        }

        let else_body = if self.check_keyword(Keyword::Else) {
            self.advance();
            self.end_statement();
            self.parse_block(&[Keyword::EndIf], "if")?
        } else {
            Vec::new()
        };

        self.advance(); // endif (parse_block guarantees it)
        self.end_statement();
        Ok(Stmt {
            kind: StmtKind::If { arms, else_body },
            span,
        })
    }

    fn parse_while(&mut self, span: Span) -> Result<Stmt, CompileError> {
        self.advance(); // while
        let cond = self.parse_expression()?;
        self.end_statement();
        let body = self.parse_block(&[Keyword::EndWhile], "while")?;
        self.advance(); // endwhile
        self.end_statement();
        Ok(Stmt {
            kind: StmtKind::While { cond, body },
            span,
        })
    }

    fn parse_function(&mut self, span: Span) -> Result<Stmt, CompileError> {
        self.advance(); // function
        let name = self.expect_ident("a function name")?;
        self.expect(&TokenKind::LParen, "'(' after the function name")?;
        let mut params = Vec::new();
        if !self.check(&TokenKind::RParen) {
            loop {
                params.push(self.expect_ident("a parameter name")?);
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(&TokenKind::RParen, "')' after the parameter list")?;
        self.end_statement();
        let body = self.parse_block(&[Keyword::EndFunction], "function")?;
        self.advance(); // endfunction
        self.end_statement();
        Ok(Stmt {
            kind: StmtKind::Function { name, params, body },
            span,
        })
    }

    fn parse_return(&mut self, span: Span) -> Result<Stmt, CompileError> {
        self.advance(); // return
        let value = if self.check(&TokenKind::Eol) || self.check(&TokenKind::Eof) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.end_statement();
        Ok(Stmt {
            kind: StmtKind::Return(value),
            span,
        })
    }

    fn parse_say(&mut self, span: Span) -> Result<Stmt, CompileError> {
        self.advance(); // say
        let expr = self.parse_expression()?;
        self.end_statement();
        Ok(Stmt {
            kind: StmtKind::Say(expr),
            span,
        })
    }

    fn parse_ask(&mut self, span: Span) -> Result<Stmt, CompileError> {
        self.advance(); // ask
        let var = match &self.peek().kind {
            TokenKind::Ident(name) => {
                let name = name.clone();
                self.advance();
                Some(name)
            }
            _ => None,
        };
        self.end_statement();
        Ok(Stmt {
            kind: StmtKind::Ask { var },
            span,
        })
    }

    fn parse_menu(&mut self, span: Span) -> Result<Stmt, CompileError> {
        self.advance(); // menu
        let var = match &self.peek().kind {
            TokenKind::Ident(name) => {
                let name = name.clone();
                self.advance();
                Some(name)
            }
            _ => None,
        };

        let mut items = Vec::new();
        if self.eat(&TokenKind::LBracket) {
            // Bracketed list, newlines allowed between items.
            loop {
                self.skip_eols();
                if self.check(&TokenKind::RBracket) {
                    break;
                }
                items.push(self.parse_expression()?);
                if self.eat(&TokenKind::Comma) {
                    continue;
                }
                self.skip_eols();
                break;
            }
            self.expect(&TokenKind::RBracket, "']' after the menu items")?;
        } else {
            items.push(self.parse_expression()?);
            while self.eat(&TokenKind::Comma) {
                items.push(self.parse_expression()?);
            }
        }
        self.end_statement();
        Ok(Stmt {
            kind: StmtKind::Menu { var, items },
            span,
        })
    }

    fn parse_filtermenu(&mut self, span: Span) -> Result<Stmt, CompileError> {
        self.advance(); // filtermenu
        let var = match &self.peek().kind {
            TokenKind::Ident(name) => {
                let name = name.clone();
                self.advance();
                Some(name)
            }
            _ => None,
        };
        self.expect(&TokenKind::LBracket, "'[' after 'filtermenu'")?;

        let mut entries = Vec::new();
        loop {
            self.skip_eols();
            if self.check(&TokenKind::RBracket) {
                break;
            }
            let item = self.parse_expression()?;
            self.expect(&TokenKind::Comma, "',' between a menu item and its flag")?;
            self.skip_eols();
            let flag = self.parse_expression()?;
            entries.push((item, flag));
            if self.eat(&TokenKind::Comma) {
                continue;
            }
            self.skip_eols();
            break;
        }
        self.expect(&TokenKind::RBracket, "']' after the filtermenu entries")?;
        self.end_statement();
        Ok(Stmt {
            kind: StmtKind::FilterMenu { var, entries },
            span,
        })
    }

    fn parse_goto(&mut self, span: Span) -> Result<Stmt, CompileError> {
        self.advance(); // goto
        let label = self.expect_ident("a label name after 'goto'")?;
        self.end_statement();
        Ok(Stmt {
            kind: StmtKind::Goto(label),
            span,
        })
    }

    fn parse_label(&mut self, span: Span) -> Result<Stmt, CompileError> {
        self.advance(); // label
        let name = self.expect_ident("a name after 'label'")?;
        self.end_statement();
        Ok(Stmt {
            kind: StmtKind::Label(name),
            span,
        })
    }

    // Expressions, by descending precedence.

    fn parse_expression(&mut self) -> Result<Expr, CompileError> {
        self.parse_or()
    }

    fn binary_chain(
        &mut self,
        next: impl Fn(&mut Self) -> Result<Expr, CompileError>,
        op_for: impl Fn(&TokenKind) -> Option<BinOp>,
    ) -> Result<Expr, CompileError> {
        let mut lhs = next(self)?;
        while let Some(op) = op_for(&self.peek().kind) {
            let span = self.span();
            self.advance();
            let rhs = next(self)?;
            lhs = Expr {
                kind: ExprKind::Binary {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                span,
            };
        }
        Ok(lhs)
    }

    fn parse_or(&mut self) -> Result<Expr, CompileError> {
        self.binary_chain(Self::parse_and, |kind| match kind {
            TokenKind::Keyword(Keyword::Or) => Some(BinOp::Or),
            _ => None,
        })
    }

    fn parse_and(&mut self) -> Result<Expr, CompileError> {
        self.binary_chain(Self::parse_equality, |kind| match kind {
            TokenKind::Keyword(Keyword::And) => Some(BinOp::And),
            _ => None,
        })
    }

    fn parse_equality(&mut self) -> Result<Expr, CompileError> {
        self.binary_chain(Self::parse_comparison, |kind| match kind {
            TokenKind::Op(Op::Eq) => Some(BinOp::Eq),
            TokenKind::Op(Op::Ne) => Some(BinOp::Ne),
            _ => None,
        })
    }

    fn parse_comparison(&mut self) -> Result<Expr, CompileError> {
        self.binary_chain(Self::parse_additive, |kind| match kind {
            TokenKind::Op(Op::Lt) => Some(BinOp::Lt),
            TokenKind::Op(Op::Gt) => Some(BinOp::Gt),
            TokenKind::Op(Op::Le) => Some(BinOp::Le),
            TokenKind::Op(Op::Ge) => Some(BinOp::Ge),
            _ => None,
        })
    }

    fn parse_additive(&mut self) -> Result<Expr, CompileError> {
        self.binary_chain(Self::parse_multiplicative, |kind| match kind {
            TokenKind::Op(Op::Plus) => Some(BinOp::Add),
            TokenKind::Op(Op::Minus) => Some(BinOp::Sub),
            _ => None,
        })
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, CompileError> {
        self.binary_chain(Self::parse_unary, |kind| match kind {
            TokenKind::Op(Op::Star) => Some(BinOp::Mul),
            TokenKind::Op(Op::Slash) => Some(BinOp::Div),
            TokenKind::Op(Op::Percent) => Some(BinOp::Mod),
            _ => None,
        })
    }

    fn parse_unary(&mut self) -> Result<Expr, CompileError> {
        let span = self.span();
        let op = match self.peek().kind {
            TokenKind::Op(Op::Minus) => Some(UnOp::Neg),
            TokenKind::Op(Op::Bang) | TokenKind::Keyword(Keyword::Not) => Some(UnOp::Not),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let operand = self.parse_unary()?;
            return Ok(Expr {
                kind: ExprKind::Unary {
                    op,
                    operand: Box::new(operand),
                },
                span,
            });
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expr, CompileError> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.check(&TokenKind::LBracket) {
                let span = self.span();
                self.advance();
                let index = self.parse_expression()?;
                self.expect(&TokenKind::RBracket, "']' after the index")?;
                expr = Expr {
                    kind: ExprKind::Index {
                        base: Box::new(expr),
                        index: Box::new(index),
                    },
                    span,
                };
            } else if self.check(&TokenKind::LParen) {
                let ExprKind::Ident(name) = expr.kind else {
                    return Err(self.error("only simple names can be called"));
                };
                let span = expr.span;
                self.advance();
                let mut args = Vec::new();
                if !self.check(&TokenKind::RParen) {
                    loop {
                        args.push(self.parse_expression()?);
                        if !self.eat(&TokenKind::Comma) {
                            break;
                        }
                    }
                }
                self.expect(&TokenKind::RParen, "')' after the arguments")?;
                expr = Expr {
                    kind: ExprKind::Call { name, args },
                    span,
                };
            } else {
                return Ok(expr);
            }
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, CompileError> {
        let span = self.span();
        let kind = match &self.peek().kind {
            TokenKind::Number(value) => {
                let value = *value;
                self.advance();
                ExprKind::Number(value)
            }
            TokenKind::Str(text) => {
                let text = text.clone();
                self.advance();
                ExprKind::Str(text)
            }
            TokenKind::Keyword(Keyword::True) => {
                self.advance();
                ExprKind::Bool(true)
            }
            TokenKind::Keyword(Keyword::False) => {
                self.advance();
                ExprKind::Bool(false)
            }
            TokenKind::Ident(name) => {
                let name = name.clone();
                self.advance();
                ExprKind::Ident(name)
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_expression()?;
                self.expect(&TokenKind::RParen, "')'")?;
                return Ok(inner);
            }
            TokenKind::LBracket => {
                self.advance();
                let mut elements = Vec::new();
                loop {
                    self.skip_eols();
                    if self.check(&TokenKind::RBracket) {
                        break;
                    }
                    elements.push(self.parse_expression()?);
                    if self.eat(&TokenKind::Comma) {
                        continue;
                    }
                    self.skip_eols();
                    break;
                }
                self.expect(&TokenKind::RBracket, "']' after the array elements")?;
                ExprKind::Array(elements)
            }
            other => {
                return Err(self.error(format!("unexpected token {other:?}")));
            }
        };
        Ok(Expr { kind, span })
    }
}
