//! Recursive-descent parser for calc programs.
//!
//! ```text
//! program   := statement (SEP statement)*
//! statement := IDENT ASSIGN expr | expr | <empty>
//! expr      := term (('+' | '-') term)*
//! term      := unary (('*' | '/') unary)*
//! unary     := '-' unary | primary
//! primary   := INT | FLOAT | STRING | IDENT | IDENT '(' args ')' | '(' expr ')'
//! ```

use crate::error::{CalcError, Result};
use crate::lexer::{tokenize, Spanned, Token};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl BinOp {
    pub fn symbol(self) -> char {
        match self {
            BinOp::Add => '+',
            BinOp::Sub => '-',
            BinOp::Mul => '*',
            BinOp::Div => '/',
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Int(i32),
    Float(f32),
    Str(String),
    Var(String),
    Neg(Box<Expr>),
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Call {
        name: String,
        args: Vec<Expr>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Assign { name: String, value: Expr },
    Expr(Expr),
}

/// Parse a whole program. Blank statements are dropped.
pub fn parse(src: &str) -> Result<Vec<Stmt>> {
    let mut parser = Parser {
        tokens: tokenize(src)?,
        pos: 0,
    };
    parser.program()
}

static EOF: Token = Token::Eof;

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        self.peek_at(0)
    }

    fn peek_at(&self, offset: usize) -> &Token {
        self.tokens
            .get(self.pos + offset)
            .map_or(&EOF, |spanned| &spanned.token)
    }

    fn line(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map_or(1, |spanned| spanned.line)
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == token {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn unexpected(&self, wanted: &str) -> CalcError {
        CalcError::Syntax {
            line: self.line(),
            message: format!("expected {wanted}, found {}", self.peek()),
        }
    }

    fn program(&mut self) -> Result<Vec<Stmt>> {
        let mut stmts = Vec::new();
        loop {
            while self.eat(&Token::Separator) {}
            if *self.peek() == Token::Eof {
                return Ok(stmts);
            }
            stmts.push(self.statement()?);
            match self.peek() {
                Token::Separator | Token::Eof => {}
                _ => return Err(self.unexpected("end of statement")),
            }
        }
    }

    fn statement(&mut self) -> Result<Stmt> {
        if let (Token::Ident(name), Token::Assign) = (self.peek(), self.peek_at(1)) {
            let name = name.clone();
            self.pos += 2;
            let value = self.expr()?;
            return Ok(Stmt::Assign { name, value });
        }
        Ok(Stmt::Expr(self.expr()?))
    }

    fn expr(&mut self) -> Result<Expr> {
        let mut lhs = self.term()?;
        loop {
            let op = match self.peek() {
                Token::Plus => BinOp::Add,
                Token::Minus => BinOp::Sub,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.term()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
    }

    fn term(&mut self) -> Result<Expr> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek() {
                Token::Star => BinOp::Mul,
                Token::Slash => BinOp::Div,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.unary()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
    }

    fn unary(&mut self) -> Result<Expr> {
        if self.eat(&Token::Minus) {
            return Ok(Expr::Neg(Box::new(self.unary()?)));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Expr> {
        match self.peek().clone() {
            Token::Int(v) => {
                self.advance();
                Ok(Expr::Int(v))
            }
            Token::Float(v) => {
                self.advance();
                Ok(Expr::Float(v))
            }
            Token::Str(s) => {
                self.advance();
                Ok(Expr::Str(s))
            }
            Token::Ident(name) => {
                self.advance();
                if self.eat(&Token::LParen) {
                    let args = self.args()?;
                    return Ok(Expr::Call { name, args });
                }
                Ok(Expr::Var(name))
            }
            Token::LParen => {
                self.advance();
                let inner = self.expr()?;
                if !self.eat(&Token::RParen) {
                    return Err(self.unexpected("')'"));
                }
                Ok(inner)
            }
            _ => Err(self.unexpected("an expression")),
        }
    }

    fn args(&mut self) -> Result<Vec<Expr>> {
        let mut args = Vec::new();
        if self.eat(&Token::RParen) {
            return Ok(args);
        }
        loop {
            args.push(self.expr()?);
            if self.eat(&Token::RParen) {
                return Ok(args);
            }
            if !self.eat(&Token::Comma) {
                return Err(self.unexpected("',' or ')'"));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(v: i32) -> Box<Expr> {
        Box::new(Expr::Int(v))
    }

    #[test]
    fn precedence_and_associativity() {
        let stmts = parse("1 - 2 - 3 * -4").unwrap();
        assert_eq!(
            stmts,
            vec![Stmt::Expr(Expr::Binary {
                op: BinOp::Sub,
                lhs: Box::new(Expr::Binary {
                    op: BinOp::Sub,
                    lhs: int(1),
                    rhs: int(2),
                }),
                rhs: Box::new(Expr::Binary {
                    op: BinOp::Mul,
                    lhs: int(3),
                    rhs: Box::new(Expr::Neg(int(4))),
                }),
            })]
        );
    }

    #[test]
    fn assignments_calls_and_blank_statements() {
        let stmts = parse("\n\nx <- c(1, 2)\n;;\ny = length(x)\nprint()").unwrap();
        assert_eq!(
            stmts,
            vec![
                Stmt::Assign {
                    name: "x".into(),
                    value: Expr::Call {
                        name: "c".into(),
                        args: vec![Expr::Int(1), Expr::Int(2)],
                    },
                },
                Stmt::Assign {
                    name: "y".into(),
                    value: Expr::Call {
                        name: "length".into(),
                        args: vec![Expr::Var("x".into())],
                    },
                },
                Stmt::Expr(Expr::Call {
                    name: "print".into(),
                    args: Vec::new(),
                }),
            ]
        );
        assert!(parse("").unwrap().is_empty());
    }

    #[test]
    fn syntax_errors() {
        assert_eq!(
            parse("x <- (1 + 2\n").unwrap_err(),
            CalcError::Syntax {
                line: 2,
                message: "expected ')', found end of input".into(),
            }
        );
        assert!(matches!(
            parse("1 2").unwrap_err(),
            CalcError::Syntax { line: 1, .. }
        ));
        assert!(matches!(
            parse("f(1,)").unwrap_err(),
            CalcError::Syntax { .. }
        ));
        assert!(matches!(
            parse("x <- ").unwrap_err(),
            CalcError::Syntax { .. }
        ));
    }
}
