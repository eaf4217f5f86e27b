use crate::ast::*;
use crate::error::{ParseError, Span};
use crate::lexer::{SpannedToken, Token, tokenize};
use anyhow::Result;

/// Recursive-descent parser for stage expressions.
///
/// Consumes a sequence of [`SpannedToken`]s and produces an [`Expression`]
/// tree. Use [`parse_closure()`] or [`parse_expression()`] as entry points.
pub struct Parser {
    tokens: Vec<SpannedToken>,
    pos: usize,
}

impl Parser {
    pub fn new(tokens: Vec<SpannedToken>) -> Self {
        Self { tokens, pos: 0 }
    }

    #[inline]
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|st| &st.token)
    }

    #[inline]
    fn peek_nth(&self, n: usize) -> Option<&Token> {
        self.tokens.get(self.pos + n).map(|st| &st.token)
    }

    #[inline]
    fn advance(&mut self) -> Option<SpannedToken> {
        if self.pos < self.tokens.len() {
            let token = self.tokens[self.pos].clone();
            self.pos += 1;
            Some(token)
        } else {
            None
        }
    }

    fn expect(&mut self, expected: Token) -> Result<Span, ParseError> {
        match self.advance() {
            Some(st) if st.token == expected => Ok(st.span),
            Some(st) => Err(ParseError::UnexpectedToken {
                expected: expected.display_name(),
                found: st.token.display_name(),
                span: st.span,
            }),
            None => Err(ParseError::UnexpectedEof {
                expected: expected.display_name(),
            }),
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    pub fn parse_expression(&mut self) -> Result<Expression, ParseError> {
        self.parse_logical_or()
    }

    fn parse_logical_or(&mut self) -> Result<Expression, ParseError> {
        let mut left = self.parse_logical_and()?;

        while matches!(self.peek(), Some(Token::Or)) {
            self.advance();
            let right = self.parse_logical_and()?;
            let span = left.span().merge(right.span());

            left = Expression::Binary {
                left: Box::new(left),
                op: BinaryOp::Or,
                right: Box::new(right),
                span,
            };
        }

        Ok(left)
    }

    fn parse_logical_and(&mut self) -> Result<Expression, ParseError> {
        let mut left = self.parse_comparison()?;

        while matches!(self.peek(), Some(Token::And)) {
            self.advance();
            let right = self.parse_comparison()?;
            let span = left.span().merge(right.span());

            left = Expression::Binary {
                left: Box::new(left),
                op: BinaryOp::And,
                right: Box::new(right),
                span,
            };
        }

        Ok(left)
    }

    fn parse_comparison(&mut self) -> Result<Expression, ParseError> {
        let left = self.parse_additive()?;

        let op = match self.peek() {
            Some(Token::Eq) => BinaryOp::Eq,
            Some(Token::Ne) => BinaryOp::Ne,
            Some(Token::Lt) => BinaryOp::Lt,
            Some(Token::Le) => BinaryOp::Le,
            Some(Token::Gt) => BinaryOp::Gt,
            Some(Token::Ge) => BinaryOp::Ge,
            Some(Token::In) => BinaryOp::In,
            _ => return Ok(left),
        };
        self.advance();

        let right = self.parse_additive()?;
        let span = left.span().merge(right.span());

        Ok(Expression::Binary {
            left: Box::new(left),
            op,
            right: Box::new(right),
            span,
        })
    }

    fn parse_additive(&mut self) -> Result<Expression, ParseError> {
        let mut left = self.parse_multiplicative()?;

        while matches!(self.peek(), Some(Token::Plus) | Some(Token::Minus)) {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => unreachable!(),
            };
            self.advance();

            let right = self.parse_multiplicative()?;
            let span = left.span().merge(right.span());

            left = Expression::Binary {
                left: Box::new(left),
                op,
                right: Box::new(right),
                span,
            };
        }

        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<Expression, ParseError> {
        let mut left = self.parse_unary()?;

        while matches!(
            self.peek(),
            Some(Token::Star) | Some(Token::Slash) | Some(Token::Percent)
        ) {
            let op = match self.peek() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                Some(Token::Percent) => BinaryOp::Mod,
                _ => unreachable!(),
            };
            self.advance();

            let right = self.parse_unary()?;
            let span = left.span().merge(right.span());

            left = Expression::Binary {
                left: Box::new(left),
                op,
                right: Box::new(right),
                span,
            };
        }

        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expression, ParseError> {
        if matches!(self.peek(), Some(Token::Not)) {
            let start_span = self.advance().expect("peek confirmed Not token").span;
            let expr = self.parse_unary()?;
            let span = start_span.merge(expr.span());

            return Ok(Expression::Unary {
                op: UnaryOp::Not,
                expr: Box::new(expr),
                span,
            });
        }

        if matches!(self.peek(), Some(Token::Minus)) {
            let start_span = self.advance().expect("peek confirmed Minus token").span;
            let expr = self.parse_unary()?;
            let span = start_span.merge(expr.span());

            return Ok(Expression::Unary {
                op: UnaryOp::Minus,
                expr: Box::new(expr),
                span,
            });
        }

        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expression, ParseError> {
        let mut expr = self.parse_primary()?;

        while let Some(token) = self.peek() {
            match token {
                Token::Dot => {
                    self.advance();

                    let (name, name_span) = match self.advance() {
                        Some(SpannedToken {
                            token: Token::Identifier(id),
                            span,
                        }) => (id, span),
                        Some(st) => {
                            return Err(ParseError::UnexpectedToken {
                                expected: "identifier after '.'".to_string(),
                                found: st.token.display_name(),
                                span: st.span,
                            });
                        }
                        None => {
                            return Err(ParseError::UnexpectedEof {
                                expected: "identifier after '.'".to_string(),
                            });
                        }
                    };

                    if matches!(self.peek(), Some(Token::LeftParen)) {
                        self.advance();
                        let args = self.parse_call_args()?;
                        let end_span = self.expect(Token::RightParen)?;
                        let span = expr.span().merge(&end_span);

                        expr = Expression::MethodCall {
                            receiver: Box::new(expr),
                            method: name,
                            args,
                            span,
                        };
                    } else {
                        let span = expr.span().merge(&name_span);

                        expr = Expression::PropertyAccess {
                            receiver: Box::new(expr),
                            property: name,
                            span,
                        };
                    }
                }
                Token::LeftParen => {
                    // Free function call: only valid directly after an
                    // identifier, e.g. `len(_)`.
                    if let Expression::Identifier(name, id_span) = expr {
                        self.advance();
                        let args = self.parse_call_args()?;
                        let end_span = self.expect(Token::RightParen)?;
                        let span = id_span.merge(&end_span);

                        expr = Expression::Call {
                            function: name,
                            args,
                            span,
                        };
                    } else {
                        break;
                    }
                }
                Token::LeftBracket => {
                    self.advance();
                    let index = self.parse_expression()?;
                    let end_span = self.expect(Token::RightBracket)?;
                    let span = expr.span().merge(&end_span);

                    expr = Expression::IndexAccess {
                        receiver: Box::new(expr),
                        index: Box::new(index),
                        span,
                    };
                }
                _ => break,
            }
        }

        Ok(expr)
    }

    fn parse_call_args(&mut self) -> Result<Vec<Expression>, ParseError> {
        let mut args = Vec::new();

        while !matches!(self.peek(), Some(Token::RightParen)) {
            args.push(self.parse_expression()?);

            if matches!(self.peek(), Some(Token::Comma)) {
                self.advance();
            } else {
                break;
            }
        }

        Ok(args)
    }

    fn parse_primary(&mut self) -> Result<Expression, ParseError> {
        match self.peek() {
            Some(Token::True) => {
                let span = self.advance().expect("peek confirmed True token").span;
                Ok(Expression::Bool(true, span))
            }

            Some(Token::False) => {
                let span = self.advance().expect("peek confirmed False token").span;
                Ok(Expression::Bool(false, span))
            }

            Some(Token::Null) => {
                let span = self.advance().expect("peek confirmed Null token").span;
                Ok(Expression::Null(span))
            }

            Some(Token::Int(_)) => {
                let st = self.advance().expect("peek confirmed Int token");
                if let Token::Int(n) = st.token {
                    Ok(Expression::Int(n, st.span))
                } else {
                    unreachable!()
                }
            }

            Some(Token::Float(_)) => {
                let st = self.advance().expect("peek confirmed Float token");
                if let Token::Float(n) = st.token {
                    Ok(Expression::Float(n, st.span))
                } else {
                    unreachable!()
                }
            }

            Some(Token::String(_)) => {
                let st = self.advance().expect("peek confirmed String token");
                if let Token::String(s) = st.token {
                    Ok(Expression::String(s, st.span))
                } else {
                    unreachable!()
                }
            }

            Some(Token::Identifier(_)) => {
                let st = self.advance().expect("peek confirmed Identifier token");
                if let Token::Identifier(id) = st.token {
                    Ok(Expression::Identifier(id, st.span))
                } else {
                    unreachable!()
                }
            }

            Some(Token::Pipe) => {
                // Inline closure argument: `|x| -> body`.
                let start_span = self.advance().expect("peek confirmed Pipe token").span;
                let param = match self.advance() {
                    Some(SpannedToken {
                        token: Token::Identifier(id),
                        ..
                    }) => id,
                    Some(st) => {
                        return Err(ParseError::UnexpectedToken {
                            expected: "closure parameter".to_string(),
                            found: st.token.display_name(),
                            span: st.span,
                        });
                    }
                    None => {
                        return Err(ParseError::UnexpectedEof {
                            expected: "closure parameter".to_string(),
                        });
                    }
                };
                self.expect(Token::Pipe)?;
                self.expect(Token::Arrow)?;
                let body = Box::new(self.parse_expression()?);
                let span = start_span.merge(body.span());
                Ok(Expression::Closure { param, body, span })
            }

            Some(Token::LeftBracket) => {
                let start_span = self
                    .advance()
                    .expect("peek confirmed LeftBracket token")
                    .span;
                let mut items = Vec::with_capacity(8);

                while !matches!(self.peek(), Some(Token::RightBracket)) {
                    items.push(self.parse_expression()?);

                    if matches!(self.peek(), Some(Token::Comma)) {
                        self.advance();
                    } else {
                        break;
                    }
                }

                let end_span = self.expect(Token::RightBracket)?;
                let span = start_span.merge(&end_span);

                Ok(Expression::Array(items, span))
            }

            Some(Token::LeftParen) => {
                self.advance();
                let expr = self.parse_expression()?;
                self.expect(Token::RightParen)?;
                Ok(expr)
            }

            Some(Token::If) => {
                let start_span = self.advance().expect("peek confirmed If token").span;
                let condition = Box::new(self.parse_expression()?);
                self.expect(Token::Then)?;
                let then_expr = Box::new(self.parse_expression()?);
                self.expect(Token::Else)?;
                let else_expr = Box::new(self.parse_expression()?);
                let span = start_span.merge(else_expr.span());
                Ok(Expression::IfExpr {
                    condition,
                    then_expr,
                    else_expr,
                    span,
                })
            }

            Some(other) => Err(ParseError::UnexpectedToken {
                expected: "expression".to_string(),
                found: other.display_name(),
                span: self.tokens[self.pos].span,
            }),

            None => Err(ParseError::UnexpectedEof {
                expected: "expression".to_string(),
            }),
        }
    }

    /// Parses `name (":" type ("[" type "]")?)?`.
    fn parse_param(&mut self) -> Result<Param, ParseError> {
        let (name, span) = match self.advance() {
            Some(SpannedToken {
                token: Token::Identifier(id),
                span,
            }) => (id, span),
            Some(st) => {
                return Err(ParseError::UnexpectedToken {
                    expected: "parameter name".to_string(),
                    found: st.token.display_name(),
                    span: st.span,
                });
            }
            None => {
                return Err(ParseError::UnexpectedEof {
                    expected: "parameter name".to_string(),
                });
            }
        };

        let ty = if matches!(self.peek(), Some(Token::Colon)) {
            self.advance();
            let type_name = match self.advance() {
                Some(SpannedToken {
                    token: Token::Identifier(id),
                    ..
                }) => id,
                Some(st) => {
                    return Err(ParseError::UnexpectedToken {
                        expected: "type name".to_string(),
                        found: st.token.display_name(),
                        span: st.span,
                    });
                }
                None => {
                    return Err(ParseError::UnexpectedEof {
                        expected: "type name".to_string(),
                    });
                }
            };

            let element = if matches!(self.peek(), Some(Token::LeftBracket)) {
                self.advance();
                let elem = match self.advance() {
                    Some(SpannedToken {
                        token: Token::Identifier(id),
                        ..
                    }) => id,
                    Some(st) => {
                        return Err(ParseError::UnexpectedToken {
                            expected: "element type name".to_string(),
                            found: st.token.display_name(),
                            span: st.span,
                        });
                    }
                    None => {
                        return Err(ParseError::UnexpectedEof {
                            expected: "element type name".to_string(),
                        });
                    }
                };
                self.expect(Token::RightBracket)?;
                Some(elem)
            } else {
                None
            };

            Some(TypeName {
                name: type_name,
                element,
            })
        } else {
            None
        };

        Ok(Param { name, ty, span })
    }

    fn parse_param_list(&mut self, terminator: Token) -> Result<Vec<Param>, ParseError> {
        let mut params = Vec::new();

        while self.peek() != Some(&terminator) {
            params.push(self.parse_param()?);

            if matches!(self.peek(), Some(Token::Comma)) {
                self.advance();
            } else {
                break;
            }
        }

        self.expect(terminator)?;
        Ok(params)
    }

    /// True when the token stream is `( params ) -> ...`, the legacy
    /// closure head form.
    fn looks_like_legacy_closure(&self) -> bool {
        if self.peek() != Some(&Token::LeftParen) {
            return false;
        }
        let mut depth = 0usize;
        let mut i = 0usize;
        while let Some(token) = self.peek_nth(i) {
            match token {
                Token::LeftParen => depth += 1,
                Token::RightParen => {
                    depth -= 1;
                    if depth == 0 {
                        return self.peek_nth(i + 1) == Some(&Token::Arrow);
                    }
                }
                _ => {}
            }
            i += 1;
        }
        false
    }
}

/// Parses a bare expression string (no closure head allowed).
pub fn parse_expression(source: &str) -> Result<Expression> {
    let tokens = tokenize(source).map_err(ParseError::from)?;
    let mut parser = Parser::new(tokens);
    let expr = parser.parse_expression()?;
    if !parser.at_end() {
        let st = &parser.tokens[parser.pos];
        return Err(ParseError::InvalidSyntax {
            message: format!("trailing input after expression: {}", st.token.display_name()),
            span: st.span,
        }
        .into());
    }
    Ok(expr)
}

/// Compiles a stage expression string into a [`ClosureDef`].
///
/// Three head forms are accepted:
///
/// - `|x: int, y| -> body`: pipe-delimited parameters with optional type
///   annotations
/// - `(x, y) -> body`: legacy parenthesized form
/// - `body`: bare expression; the representation variable is bound by the
///   caller at evaluation time
pub fn parse_closure(source: &str) -> Result<ClosureDef> {
    let tokens = tokenize(source).map_err(ParseError::from)?;
    let mut parser = Parser::new(tokens);

    let params = if parser.peek() == Some(&Token::Pipe) {
        parser.advance();
        let params = parser.parse_param_list(Token::Pipe)?;
        parser.expect(Token::Arrow)?;
        params
    } else if parser.looks_like_legacy_closure() {
        parser.advance();
        let params = parser.parse_param_list(Token::RightParen)?;
        parser.expect(Token::Arrow)?;
        params
    } else {
        Vec::new()
    };

    let body = parser.parse_expression()?;
    if !parser.at_end() {
        let st = &parser.tokens[parser.pos];
        return Err(ParseError::InvalidSyntax {
            message: format!("trailing input after expression: {}", st.token.display_name()),
            span: st.span,
        }
        .into());
    }

    Ok(ClosureDef {
        params,
        body,
        source: source.to_string(),
    })
}
