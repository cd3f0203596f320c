// File: src/parser.rs
//
// Recursive-descent statement parser with a Pratt/precedence-climbing
// expression core, grounded on the reference implementation's
// `parse_expression(min_precedence)` loop.

use crate::ast::{
    AssignOp, BinaryOp, Expression, ImportItem, Literal, MemberKind, Property, Span, Statement,
    UnaryOp,
};
use crate::errors::{LucyError, SourceLocation};
use crate::lexer::{tokenize, Token, TokenKind};

#[derive(Clone, Copy, PartialEq, Eq)]
enum Assoc {
    Left,
    Right,
}

fn binary_precedence(kind: &TokenKind) -> Option<(u8, Assoc)> {
    use TokenKind::*;
    Some(match kind {
        Or => (1, Assoc::Left),
        And => (2, Assoc::Left),
        Is => (3, Assoc::Left),
        Equal | NotEqual => (4, Assoc::Left),
        Less | LessEqual | Greater | GreaterEqual => (5, Assoc::Left),
        Add | Sub => (6, Assoc::Left),
        Mul | Div | Mod => (7, Assoc::Left),
        _ => return None,
    })
}

fn binary_op(kind: &TokenKind) -> BinaryOp {
    match kind {
        TokenKind::Or => BinaryOp::Or,
        TokenKind::And => BinaryOp::And,
        TokenKind::Is => BinaryOp::Is,
        TokenKind::Equal => BinaryOp::Eq,
        TokenKind::NotEqual => BinaryOp::Ne,
        TokenKind::Less => BinaryOp::Lt,
        TokenKind::LessEqual => BinaryOp::Le,
        TokenKind::Greater => BinaryOp::Gt,
        TokenKind::GreaterEqual => BinaryOp::Ge,
        TokenKind::Add => BinaryOp::Add,
        TokenKind::Sub => BinaryOp::Sub,
        TokenKind::Mul => BinaryOp::Mul,
        TokenKind::Div => BinaryOp::Div,
        TokenKind::Mod => BinaryOp::Mod,
        other => unreachable!("not a binary operator: {other:?}"),
    }
}

fn assign_op(kind: &TokenKind) -> Option<AssignOp> {
    Some(match kind {
        TokenKind::Assign => AssignOp::Assign,
        TokenKind::AddAssign => AssignOp::AddAssign,
        TokenKind::SubAssign => AssignOp::SubAssign,
        TokenKind::MulAssign => AssignOp::MulAssign,
        TokenKind::DivAssign => AssignOp::DivAssign,
        TokenKind::ModAssign => AssignOp::ModAssign,
        _ => return None,
    })
}

fn describe(kind: &TokenKind) -> String {
    format!("{kind:?}")
}

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Parser { tokens, pos: 0 }
    }

    pub fn parse_source(source: &str) -> Result<Vec<Statement>, LucyError> {
        let tokens = tokenize(source)?;
        let mut parser = Parser::new(tokens);
        parser.parse_program()
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_kind(&self) -> &TokenKind {
        &self.peek().kind
    }

    fn at_eof(&self) -> bool {
        matches!(self.peek_kind(), TokenKind::Eof)
    }

    fn advance(&mut self) -> Token {
        let tok = self.peek().clone();
        if !self.at_eof() {
            self.pos += 1;
        }
        tok
    }

    fn check(&self, kind: &TokenKind) -> bool {
        std::mem::discriminant(self.peek_kind()) == std::mem::discriminant(kind)
    }

    fn error_here(&self, expected: &str) -> LucyError {
        let tok = self.peek();
        LucyError::unexpected_token(
            expected,
            &describe(&tok.kind),
            SourceLocation::from_location(tok.start),
        )
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token, LucyError> {
        if self.check(&kind) {
            Ok(self.advance())
        } else {
            Err(self.error_here(&describe(&kind)))
        }
    }

    fn expect_identifier(&mut self) -> Result<String, LucyError> {
        match self.peek_kind().clone() {
            TokenKind::Identifier(name) => {
                self.advance();
                Ok(name)
            }
            _ => Err(self.error_here("identifier")),
        }
    }

    fn span_from(&self, start: crate::ast::Location) -> Span {
        Span::new(start, self.tokens[self.pos.saturating_sub(1).min(self.tokens.len() - 1)].end)
    }

    // ---- program / statements ----

    pub fn parse_program(&mut self) -> Result<Vec<Statement>, LucyError> {
        let mut body = Vec::new();
        while !self.at_eof() {
            body.push(self.parse_statement()?);
        }
        Ok(body)
    }

    fn parse_block(&mut self) -> Result<Vec<Statement>, LucyError> {
        self.expect(TokenKind::LBrace)?;
        let mut body = Vec::new();
        while !self.check(&TokenKind::RBrace) {
            if self.at_eof() {
                return Err(self.error_here("'}'"));
            }
            body.push(self.parse_statement()?);
        }
        self.expect(TokenKind::RBrace)?;
        Ok(body)
    }

    fn parse_statement(&mut self) -> Result<Statement, LucyError> {
        let start = self.peek().start;
        match self.peek_kind() {
            TokenKind::LBrace => {
                let body = self.parse_block()?;
                Ok(Statement::Block { body, span: self.span_from(start) })
            }
            TokenKind::If => self.parse_if(start),
            TokenKind::Loop => {
                self.advance();
                let body = self.parse_block()?;
                Ok(Statement::Loop { body, span: self.span_from(start) })
            }
            TokenKind::While => {
                self.advance();
                let test = self.parse_expression(1)?;
                let body = self.parse_block()?;
                Ok(Statement::While { test, body, span: self.span_from(start) })
            }
            TokenKind::For => self.parse_for(start),
            TokenKind::Break => {
                self.advance();
                self.expect(TokenKind::Semi)?;
                Ok(Statement::Break { span: self.span_from(start) })
            }
            TokenKind::Continue => {
                self.advance();
                self.expect(TokenKind::Semi)?;
                Ok(Statement::Continue { span: self.span_from(start) })
            }
            TokenKind::Goto => {
                self.advance();
                let call = self.parse_expression(1)?;
                if !matches!(call, Expression::Call { .. }) {
                    return Err(LucyError::new(
                        crate::errors::ErrorKind::GotoUnexpectedExpression,
                        "goto requires a call expression".to_string(),
                        SourceLocation::from_location(start),
                    ));
                }
                self.expect(TokenKind::Semi)?;
                Ok(Statement::Goto { call, span: self.span_from(start) })
            }
            TokenKind::Return => {
                self.advance();
                let value = if self.check(&TokenKind::Semi) {
                    None
                } else {
                    Some(self.parse_expression(1)?)
                };
                self.expect(TokenKind::Semi)?;
                Ok(Statement::Return { value, span: self.span_from(start) })
            }
            TokenKind::Global => {
                self.advance();
                let mut names = vec![self.expect_identifier()?];
                while self.check(&TokenKind::Comma) {
                    self.advance();
                    names.push(self.expect_identifier()?);
                }
                self.expect(TokenKind::Semi)?;
                Ok(Statement::Global { names, span: self.span_from(start) })
            }
            TokenKind::Import => self.parse_import(start),
            TokenKind::From => self.parse_from_import(start),
            _ => self.parse_assignment_or_expr(start),
        }
    }

    fn parse_if(&mut self, start: crate::ast::Location) -> Result<Statement, LucyError> {
        self.advance();
        let test = self.parse_expression(1)?;
        let then = self.parse_block()?;
        let or_else = if self.check(&TokenKind::Else) {
            self.advance();
            if self.check(&TokenKind::If) {
                Some(vec![self.parse_if(self.peek().start)?])
            } else {
                Some(self.parse_block()?)
            }
        } else {
            None
        };
        Ok(Statement::If { test, then, or_else, span: self.span_from(start) })
    }

    fn parse_for(&mut self, start: crate::ast::Location) -> Result<Statement, LucyError> {
        self.advance();
        let var = self.expect_identifier()?;
        self.expect(TokenKind::In)?;
        let iter = self.parse_expression(1)?;
        let body = self.parse_block()?;
        Ok(Statement::For { var, iter, body, span: self.span_from(start) })
    }

    fn parse_dotted_path(&mut self) -> Result<Vec<String>, LucyError> {
        let mut path = vec![self.expect_identifier()?];
        while self.check(&TokenKind::Point) {
            self.advance();
            path.push(self.expect_identifier()?);
        }
        Ok(path)
    }

    fn parse_import(&mut self, start: crate::ast::Location) -> Result<Statement, LucyError> {
        self.advance();
        let path = self.parse_dotted_path()?;
        let alias = if self.check(&TokenKind::As) {
            self.advance();
            Some(self.expect_identifier()?)
        } else {
            None
        };
        self.expect(TokenKind::Semi)?;
        Ok(Statement::Import { path, alias, span: self.span_from(start) })
    }

    fn parse_from_import(&mut self, start: crate::ast::Location) -> Result<Statement, LucyError> {
        self.advance();
        let path = self.parse_dotted_path()?;
        self.expect(TokenKind::Import)?;
        if self.check(&TokenKind::Mul) {
            self.advance();
            self.expect(TokenKind::Semi)?;
            return Ok(Statement::FromImport {
                path,
                items: None,
                star: true,
                span: self.span_from(start),
            });
        }
        let mut items = vec![self.parse_import_item()?];
        while self.check(&TokenKind::Comma) {
            self.advance();
            items.push(self.parse_import_item()?);
        }
        self.expect(TokenKind::Semi)?;
        Ok(Statement::FromImport {
            path,
            items: Some(items),
            star: false,
            span: self.span_from(start),
        })
    }

    fn parse_import_item(&mut self) -> Result<ImportItem, LucyError> {
        let name = self.expect_identifier()?;
        let alias = if self.check(&TokenKind::As) {
            self.advance();
            Some(self.expect_identifier()?)
        } else {
            None
        };
        Ok(ImportItem { name, alias })
    }

    fn parse_assignment_or_expr(&mut self, start: crate::ast::Location) -> Result<Statement, LucyError> {
        let expr = self.parse_expression(1)?;
        if let Some(op) = assign_op(self.peek_kind()) {
            if !expr.is_assignable() {
                return Err(LucyError::new(
                    crate::errors::ErrorKind::AssigningToRvalue,
                    "left-hand side of assignment must be an identifier or member expression"
                        .to_string(),
                    SourceLocation::from_location(expr.span().start),
                ));
            }
            self.advance();
            let value = self.parse_expression(1)?;
            self.expect(TokenKind::Semi)?;
            return Ok(Statement::Assignment {
                target: expr,
                op,
                value,
                span: self.span_from(start),
            });
        }
        self.expect(TokenKind::Semi)?;
        Ok(Statement::Expr { expr, span: self.span_from(start) })
    }

    // ---- expressions: Pratt / precedence-climbing ----

    fn parse_expression(&mut self, min_prec: u8) -> Result<Expression, LucyError> {
        let mut left = self.parse_unary()?;
        loop {
            let Some((prec, assoc)) = binary_precedence(self.peek_kind()) else { break };
            if prec < min_prec {
                break;
            }
            let op_tok = self.advance();
            let next_min = if assoc == Assoc::Left { prec + 1 } else { prec };
            let right = self.parse_expression(next_min)?;
            let span = Span::new(left.span().start, right.span().end);
            left = Expression::Binary {
                op: binary_op(&op_tok.kind),
                left: Box::new(left),
                right: Box::new(right),
                span,
            };
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expression, LucyError> {
        let start = self.peek().start;
        let op = match self.peek_kind() {
            TokenKind::Sub => Some(UnaryOp::Neg),
            TokenKind::Add => Some(UnaryOp::Pos),
            TokenKind::Not => Some(UnaryOp::Not),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let arg = self.parse_unary()?;
            let span = self.span_from(start);
            return Ok(Expression::Unary { op, arg: Box::new(arg), span });
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expression, LucyError> {
        let start = self.peek().start;
        let mut expr = self.parse_atom()?;
        loop {
            match self.peek_kind() {
                TokenKind::Point => {
                    self.advance();
                    let name = self.expect_identifier()?;
                    let name_span = self.span_from(start);
                    let property = Expression::Literal {
                        value: Literal::String(name),
                        span: name_span,
                    };
                    expr = Expression::Member {
                        object: Box::new(expr),
                        property: Box::new(property),
                        kind: MemberKind::Dot,
                        span: self.span_from(start),
                    };
                }
                TokenKind::LBracket => {
                    self.advance();
                    let property = self.parse_expression(1)?;
                    self.expect(TokenKind::RBracket)?;
                    expr = Expression::Member {
                        object: Box::new(expr),
                        property: Box::new(property),
                        kind: MemberKind::Index,
                        span: self.span_from(start),
                    };
                }
                TokenKind::LParen => {
                    self.advance();
                    let mut args = Vec::new();
                    if !self.check(&TokenKind::RParen) {
                        args.push(self.parse_expression(1)?);
                        while self.check(&TokenKind::Comma) {
                            self.advance();
                            args.push(self.parse_expression(1)?);
                        }
                    }
                    self.expect(TokenKind::RParen)?;
                    expr = Expression::Call {
                        callee: Box::new(expr),
                        args,
                        span: self.span_from(start),
                    };
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_atom(&mut self) -> Result<Expression, LucyError> {
        let start = self.peek().start;
        match self.peek_kind().clone() {
            TokenKind::Integer(v) => {
                self.advance();
                Ok(Expression::Literal { value: Literal::Int(v), span: self.span_from(start) })
            }
            TokenKind::Float(v) => {
                self.advance();
                Ok(Expression::Literal { value: Literal::Float(v), span: self.span_from(start) })
            }
            TokenKind::String(s) => {
                self.advance();
                Ok(Expression::Literal { value: Literal::String(s), span: self.span_from(start) })
            }
            TokenKind::True => {
                self.advance();
                Ok(Expression::Literal { value: Literal::Bool(true), span: self.span_from(start) })
            }
            TokenKind::False => {
                self.advance();
                Ok(Expression::Literal { value: Literal::Bool(false), span: self.span_from(start) })
            }
            TokenKind::Null => {
                self.advance();
                Ok(Expression::Literal { value: Literal::Null, span: self.span_from(start) })
            }
            TokenKind::Identifier(name) => {
                self.advance();
                Ok(Expression::Identifier { name, span: self.span_from(start) })
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_expression(1)?;
                self.expect(TokenKind::RParen)?;
                Ok(inner)
            }
            TokenKind::LBrace => self.parse_table(start),
            TokenKind::Func => self.parse_function(start, false),
            TokenKind::VBar => self.parse_function(start, true),
            _ => Err(self.error_here("expression")),
        }
    }

    fn parse_table(&mut self, start: crate::ast::Location) -> Result<Expression, LucyError> {
        self.advance();
        let mut properties = Vec::new();
        let mut position: i64 = 0;
        while !self.check(&TokenKind::RBrace) {
            let prop_start = self.peek().start;
            // Try `key: value`; fall back to a bare positional expression.
            let key_or_value = self.parse_expression(1)?;
            let (key, value) = if self.check(&TokenKind::Colon) {
                self.advance();
                let value = self.parse_expression(1)?;
                (key_or_value, value)
            } else {
                let key = Expression::Literal {
                    value: Literal::Int(position),
                    span: key_or_value.span(),
                };
                position += 1;
                (key, key_or_value)
            };
            properties.push(Property { key, value, span: self.span_from(prop_start) });
            if self.check(&TokenKind::Comma) {
                self.advance();
            } else {
                break;
            }
        }
        self.expect(TokenKind::RBrace)?;
        Ok(Expression::Table { properties, span: self.span_from(start) })
    }

    fn parse_function(
        &mut self,
        start: crate::ast::Location,
        is_closure: bool,
    ) -> Result<Expression, LucyError> {
        if is_closure {
            self.expect(TokenKind::VBar)?;
        } else {
            self.advance();
            self.expect(TokenKind::LParen)?;
        }
        let close_tok = if is_closure { TokenKind::VBar } else { TokenKind::RParen };
        let mut params = Vec::new();
        if !self.check(&close_tok) {
            params.push(self.expect_identifier()?);
            while self.check(&TokenKind::Comma) {
                self.advance();
                params.push(self.expect_identifier()?);
            }
        }
        self.expect(close_tok)?;
        let body = self.parse_block()?;
        Ok(Expression::Function { params, body, is_closure, span: self.span_from(start) })
    }
}

/// Parses a complete program from source text.
pub fn parse(source: &str) -> Result<Vec<Statement>, LucyError> {
    Parser::parse_source(source)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_arithmetic_precedence() {
        let body = parse("x = 1 + 2 * 3;").unwrap();
        match &body[0] {
            Statement::Assignment { value, .. } => match value {
                Expression::Binary { op: BinaryOp::Add, right, .. } => {
                    assert!(matches!(**right, Expression::Binary { op: BinaryOp::Mul, .. }));
                }
                other => panic!("unexpected: {other:?}"),
            },
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn parses_closure_and_call() {
        let body = parse("f = |v| { return v; }; f(1);").unwrap();
        assert!(matches!(body[0], Statement::Assignment { .. }));
        assert!(matches!(body[1], Statement::Expr { .. }));
    }

    #[test]
    fn parses_table_with_positional_and_keyed_entries() {
        let body = parse("t = {1, \"a\": 2};").unwrap();
        match &body[0] {
            Statement::Assignment { value: Expression::Table { properties, .. }, .. } => {
                assert_eq!(properties.len(), 2);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn rejects_assignment_to_rvalue() {
        assert!(parse("1 = 2;").is_err());
    }

    #[test]
    fn rejects_goto_non_call() {
        assert!(parse("goto 1;").is_err());
    }

    #[test]
    fn parses_for_and_import() {
        let body = parse("for x in y { }\nimport a.b as c;\nfrom a.b import x, y as z;").unwrap();
        assert!(matches!(body[0], Statement::For { .. }));
        assert!(matches!(body[1], Statement::Import { .. }));
        assert!(matches!(body[2], Statement::FromImport { .. }));
    }
}
