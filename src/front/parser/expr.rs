//! Expression parsing, one function per precedence level.

use super::{
    super::ast::*,
    super::lexer::TokenValue,
    types::is_builtin_type,
    {Parser, PResult},
};

impl Parser<'_> {
    /// Comma level.
    pub(crate) fn expression(&mut self) -> PResult<Expr> {
        let first = self.assignment()?;
        if self.reader.peek() != Some(&TokenValue::Comma) {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.reader.try_consume(&TokenValue::Comma) {
            items.push(self.assignment()?);
        }
        Ok(Expr::Sequence(items))
    }

    pub(crate) fn assignment(&mut self) -> PResult<Expr> {
        use TokenValue as Tv;
        let left = self.conditional()?;
        let op = match self.reader.peek() {
            Some(Tv::Assign) => AssignmentOp::Assign,
            Some(Tv::MulAssign) => AssignmentOp::Multiply,
            Some(Tv::DivAssign) => AssignmentOp::Divide,
            Some(Tv::ModAssign) => AssignmentOp::Modulo,
            Some(Tv::AddAssign) => AssignmentOp::Add,
            Some(Tv::SubAssign) => AssignmentOp::Subtract,
            Some(Tv::LeftShiftAssign) => AssignmentOp::LeftShift,
            Some(Tv::RightShiftAssign) => AssignmentOp::RightShift,
            Some(Tv::AndAssign) => AssignmentOp::And,
            Some(Tv::XorAssign) => AssignmentOp::Xor,
            Some(Tv::OrAssign) => AssignmentOp::Or,
            _ => return Ok(left),
        };
        self.reader.advance();
        // right associative
        let value = self.assignment()?;
        Ok(Expr::Assignment {
            op,
            target: Box::new(left),
            value: Box::new(value),
        })
    }

    pub(crate) fn conditional(&mut self) -> PResult<Expr> {
        use TokenValue as Tv;
        let condition = self.logical_or()?;
        if !self.reader.try_consume(&Tv::Question) {
            return Ok(condition);
        }
        let if_true = self.expression()?;
        self.reader.expect(&Tv::Colon)?;
        let if_false = self.assignment()?;
        Ok(Expr::Ternary {
            condition: Box::new(condition),
            if_true: Box::new(if_true),
            if_false: Box::new(if_false),
        })
    }

    /// Left-associative binary level: `operand (op operand)*`.
    fn binary_op(
        &mut self,
        classify: fn(&TokenValue) -> Option<BinaryOp>,
        operand: fn(&mut Self) -> PResult<Expr>,
    ) -> PResult<Expr> {
        let mut left = operand(self)?;
        while let Some(op) = self.reader.peek().and_then(classify) {
            self.reader.advance();
            let right = operand(self)?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn logical_or(&mut self) -> PResult<Expr> {
        self.binary_op(
            |t| match t {
                TokenValue::LogicalOr => Some(BinaryOp::LogicalOr),
                _ => None,
            },
            Self::logical_xor,
        )
    }

    fn logical_xor(&mut self) -> PResult<Expr> {
        self.binary_op(
            |t| match t {
                TokenValue::LogicalXor => Some(BinaryOp::LogicalXor),
                _ => None,
            },
            Self::logical_and,
        )
    }

    fn logical_and(&mut self) -> PResult<Expr> {
        self.binary_op(
            |t| match t {
                TokenValue::LogicalAnd => Some(BinaryOp::LogicalAnd),
                _ => None,
            },
            Self::bit_or,
        )
    }

    fn bit_or(&mut self) -> PResult<Expr> {
        self.binary_op(
            |t| match t {
                TokenValue::VerticalBar => Some(BinaryOp::BitOr),
                _ => None,
            },
            Self::bit_xor,
        )
    }

    fn bit_xor(&mut self) -> PResult<Expr> {
        self.binary_op(
            |t| match t {
                TokenValue::Caret => Some(BinaryOp::BitXor),
                _ => None,
            },
            Self::bit_and,
        )
    }

    fn bit_and(&mut self) -> PResult<Expr> {
        self.binary_op(
            |t| match t {
                TokenValue::Ampersand => Some(BinaryOp::BitAnd),
                _ => None,
            },
            Self::equality,
        )
    }

    fn equality(&mut self) -> PResult<Expr> {
        self.binary_op(
            |t| match t {
                TokenValue::Equal => Some(BinaryOp::Equal),
                TokenValue::NotEqual => Some(BinaryOp::NotEqual),
                _ => None,
            },
            Self::relational,
        )
    }

    fn relational(&mut self) -> PResult<Expr> {
        self.binary_op(
            |t| match t {
                TokenValue::LeftAngle => Some(BinaryOp::Less),
                TokenValue::RightAngle => Some(BinaryOp::Greater),
                TokenValue::LessEqual => Some(BinaryOp::LessEqual),
                TokenValue::GreaterEqual => Some(BinaryOp::GreaterEqual),
                _ => None,
            },
            Self::shift,
        )
    }

    fn shift(&mut self) -> PResult<Expr> {
        self.binary_op(
            |t| match t {
                TokenValue::LeftShift => Some(BinaryOp::LeftShift),
                TokenValue::RightShift => Some(BinaryOp::RightShift),
                _ => None,
            },
            Self::additive,
        )
    }

    fn additive(&mut self) -> PResult<Expr> {
        self.binary_op(
            |t| match t {
                TokenValue::Plus => Some(BinaryOp::Add),
                TokenValue::Dash => Some(BinaryOp::Subtract),
                _ => None,
            },
            Self::multiplicative,
        )
    }

    fn multiplicative(&mut self) -> PResult<Expr> {
        self.binary_op(
            |t| match t {
                TokenValue::Star => Some(BinaryOp::Multiply),
                TokenValue::Slash => Some(BinaryOp::Divide),
                TokenValue::Percent => Some(BinaryOp::Modulo),
                _ => None,
            },
            Self::unary,
        )
    }

    fn unary(&mut self) -> PResult<Expr> {
        use TokenValue as Tv;
        let op = match self.reader.peek() {
            Some(Tv::Increment) => UnaryOp::Increment,
            Some(Tv::Decrement) => UnaryOp::Decrement,
            Some(Tv::Plus) => UnaryOp::Plus,
            Some(Tv::Dash) => UnaryOp::Minus,
            Some(Tv::Bang) => UnaryOp::Not,
            Some(Tv::Tilde) => UnaryOp::BitNot,
            _ => return self.postfix(),
        };
        self.reader.advance();
        let operand = self.unary()?;
        Ok(Expr::UnaryPrefix {
            op,
            operand: Box::new(operand),
        })
    }

    fn postfix(&mut self) -> PResult<Expr> {
        use TokenValue as Tv;
        let mut expr = self.primary()?;
        loop {
            match self.reader.peek() {
                Some(Tv::LeftBracket) => {
                    self.reader.advance();
                    let index = self.expression()?;
                    self.reader.expect(&Tv::RightBracket)?;
                    expr = Expr::Index {
                        base: Box::new(expr),
                        index: Box::new(index),
                    };
                }
                Some(Tv::Dot) => {
                    self.reader.advance();
                    let field = self.reader.consume_ident()?;
                    if self.reader.peek() == Some(&Tv::LeftParen) {
                        let args = self.call_args()?;
                        expr = Expr::Call {
                            function: Box::new(Expr::Field {
                                base: Box::new(expr),
                                field,
                            }),
                            args,
                        };
                    } else {
                        expr = Expr::Field {
                            base: Box::new(expr),
                            field,
                        };
                    }
                }
                Some(Tv::Increment) => {
                    self.reader.advance();
                    expr = Expr::UnaryPostfix {
                        op: PostfixOp::Increment,
                        operand: Box::new(expr),
                    };
                }
                Some(Tv::Decrement) => {
                    self.reader.advance();
                    expr = Expr::UnaryPostfix {
                        op: PostfixOp::Decrement,
                        operand: Box::new(expr),
                    };
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn primary(&mut self) -> PResult<Expr> {
        use TokenValue as Tv;
        match self.reader.peek() {
            Some(&Tv::IntConstant { value, unsigned }) => {
                self.reader.advance();
                Ok(Expr::IntConstant { value, unsigned })
            }
            Some(&Tv::FloatConstant(value)) => {
                self.reader.advance();
                Ok(Expr::FloatConstant(value))
            }
            Some(&Tv::BoolConstant(value)) => {
                self.reader.advance();
                Ok(Expr::BoolConstant(value))
            }
            Some(Tv::LeftParen) => {
                self.reader.advance();
                let inner = self.expression()?;
                self.reader.expect(&Tv::RightParen)?;
                Ok(inner)
            }
            Some(Tv::Identifier(name)) => {
                // constructor first, then call, then a plain reference
                if is_builtin_type(name)
                    && matches!(
                        self.reader.peek_at(1),
                        Some(Tv::LeftParen | Tv::LeftBracket)
                    )
                {
                    let ty = self.type_specifier()?;
                    let args = self.call_args()?;
                    return Ok(Expr::Constructor { ty, args });
                }
                let name = name.clone();
                self.reader.advance();
                if self.reader.peek() == Some(&Tv::LeftParen) {
                    let args = self.call_args()?;
                    return Ok(Expr::Call {
                        function: Box::new(Expr::Variable(name)),
                        args,
                    });
                }
                Ok(Expr::Variable(name))
            }
            _ => self.reader.fail("expected expression"),
        }
    }

    fn call_args(&mut self) -> PResult<Vec<Expr>> {
        use TokenValue as Tv;
        self.reader.expect(&Tv::LeftParen)?;
        if self.reader.try_consume(&Tv::RightParen) {
            return Ok(Vec::new());
        }
        let mut args = Vec::new();
        loop {
            args.push(self.assignment()?);
            if self.reader.try_consume(&Tv::Comma) {
                continue;
            }
            self.reader.expect(&Tv::RightParen)?;
            break;
        }
        Ok(args)
    }
}
