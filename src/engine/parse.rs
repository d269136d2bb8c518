//! Recursive-descent parser producing the expression AST.
//!
//! The grammar is a CEL-compatible subset: ternary, logical and/or,
//! relations (including `in`), additive/multiplicative arithmetic, unary
//! not/negate, member access, indexing, calls, list and map literals.

use super::errors::{EngineError, EngineResult};
use super::lex::{tokenize, Token};
use super::value::Value;

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// Logical negation.
    Not,
    /// Arithmetic negation.
    Neg,
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    /// `+` (numbers, strings, lists)
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `%`
    Mod,
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `in`
    In,
    /// `&&`
    And,
    /// `||`
    Or,
}

/// Parsed expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Literal scalar.
    Literal(Value),
    /// Variable reference.
    Ident(String),
    /// `target.field`
    Member(Box<Expr>, String),
    /// `target[index]`
    Index(Box<Expr>, Box<Expr>),
    /// Function or method call. `target` is `None` for global calls.
    Call {
        /// Receiver for method-style calls.
        target: Option<Box<Expr>>,
        /// Function name.
        name: String,
        /// Argument expressions; macros interpret these unevaluated.
        args: Vec<Expr>,
    },
    /// Unary operation.
    Unary(UnaryOp, Box<Expr>),
    /// Binary operation.
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    /// `cond ? then : else`
    Ternary(Box<Expr>, Box<Expr>, Box<Expr>),
    /// List literal.
    List(Vec<Expr>),
    /// Map literal; keys are expressions that must evaluate to strings.
    Map(Vec<(Expr, Expr)>),
}

/// Parse an expression body into an AST.
pub fn parse(source: &str) -> EngineResult<Expr> {
    let tokens = tokenize(source)?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.ternary()?;
    if parser.pos != parser.tokens.len() {
        return Err(EngineError::Syntax(format!(
            "unexpected trailing input in {source:?}"
        )));
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, expected: &Token) -> EngineResult<()> {
        match self.advance() {
            Some(ref token) if token == expected => Ok(()),
            Some(other) => Err(EngineError::Syntax(format!(
                "expected {expected:?}, got {other:?}"
            ))),
            None => Err(EngineError::Syntax(format!(
                "expected {expected:?}, got end of expression"
            ))),
        }
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn ternary(&mut self) -> EngineResult<Expr> {
        let cond = self.or()?;
        if self.eat(&Token::Question) {
            let then = self.ternary()?;
            self.expect(&Token::Colon)?;
            let otherwise = self.ternary()?;
            return Ok(Expr::Ternary(
                Box::new(cond),
                Box::new(then),
                Box::new(otherwise),
            ));
        }
        Ok(cond)
    }

    fn or(&mut self) -> EngineResult<Expr> {
        let mut left = self.and()?;
        while self.eat(&Token::Or) {
            let right = self.and()?;
            left = Expr::Binary(BinaryOp::Or, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and(&mut self) -> EngineResult<Expr> {
        let mut left = self.relation()?;
        while self.eat(&Token::And) {
            let right = self.relation()?;
            left = Expr::Binary(BinaryOp::And, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn relation(&mut self) -> EngineResult<Expr> {
        let left = self.addition()?;
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
        self.pos += 1;
        let right = self.addition()?;
        Ok(Expr::Binary(op, Box::new(left), Box::new(right)))
    }

    fn addition(&mut self) -> EngineResult<Expr> {
        let mut left = self.multiplication()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => break,
            };
            self.pos += 1;
            let right = self.multiplication()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn multiplication(&mut self) -> EngineResult<Expr> {
        let mut left = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                Some(Token::Percent) => BinaryOp::Mod,
                _ => break,
            };
            self.pos += 1;
            let right = self.unary()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn unary(&mut self) -> EngineResult<Expr> {
        if self.eat(&Token::Not) {
            let inner = self.unary()?;
            return Ok(Expr::Unary(UnaryOp::Not, Box::new(inner)));
        }
        if self.eat(&Token::Minus) {
            let inner = self.unary()?;
            return Ok(Expr::Unary(UnaryOp::Neg, Box::new(inner)));
        }
        self.postfix()
    }

    fn postfix(&mut self) -> EngineResult<Expr> {
        let mut expr = self.primary()?;
        loop {
            if self.eat(&Token::Dot) {
                let name = match self.advance() {
                    Some(Token::Ident(name)) => name,
                    other => {
                        return Err(EngineError::Syntax(format!(
                            "expected member name after '.', got {other:?}"
                        )));
                    }
                };
                if self.eat(&Token::LParen) {
                    let args = self.call_args()?;
                    expr = Expr::Call {
                        target: Some(Box::new(expr)),
                        name,
                        args,
                    };
                } else {
                    expr = Expr::Member(Box::new(expr), name);
                }
            } else if self.eat(&Token::LBracket) {
                let index = self.ternary()?;
                self.expect(&Token::RBracket)?;
                expr = Expr::Index(Box::new(expr), Box::new(index));
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn primary(&mut self) -> EngineResult<Expr> {
        match self.advance() {
            Some(Token::Int(n)) => Ok(Expr::Literal(Value::Int(n))),
            Some(Token::Double(d)) => Ok(Expr::Literal(Value::Double(d))),
            Some(Token::String(s)) => Ok(Expr::Literal(Value::String(s))),
            Some(Token::Bool(b)) => Ok(Expr::Literal(Value::Bool(b))),
            Some(Token::Null) => Ok(Expr::Literal(Value::Null)),
            Some(Token::Ident(name)) => {
                if self.eat(&Token::LParen) {
                    let args = self.call_args()?;
                    Ok(Expr::Call {
                        target: None,
                        name,
                        args,
                    })
                } else {
                    Ok(Expr::Ident(name))
                }
            }
            Some(Token::LParen) => {
                let inner = self.ternary()?;
                self.expect(&Token::RParen)?;
                Ok(inner)
            }
            Some(Token::LBracket) => {
                let mut items = Vec::new();
                if !self.eat(&Token::RBracket) {
                    loop {
                        items.push(self.ternary()?);
                        if self.eat(&Token::RBracket) {
                            break;
                        }
                        self.expect(&Token::Comma)?;
                    }
                }
                Ok(Expr::List(items))
            }
            Some(Token::LBrace) => {
                let mut entries = Vec::new();
                if !self.eat(&Token::RBrace) {
                    loop {
                        let key = self.ternary()?;
                        self.expect(&Token::Colon)?;
                        let value = self.ternary()?;
                        entries.push((key, value));
                        if self.eat(&Token::RBrace) {
                            break;
                        }
                        self.expect(&Token::Comma)?;
                    }
                }
                Ok(Expr::Map(entries))
            }
            other => Err(EngineError::Syntax(format!(
                "unexpected token {other:?}"
            ))),
        }
    }

    fn call_args(&mut self) -> EngineResult<Vec<Expr>> {
        let mut args = Vec::new();
        if self.eat(&Token::RParen) {
            return Ok(args);
        }
        loop {
            args.push(self.ternary()?);
            if self.eat(&Token::RParen) {
                return Ok(args);
            }
            self.expect(&Token::Comma)?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ternary_with_call() {
        let expr = parse("p.sizeLimit != \"\" ? p.sizeLimit : omit()").unwrap();
        match expr {
            Expr::Ternary(cond, then, otherwise) => {
                assert!(matches!(*cond, Expr::Binary(BinaryOp::Ne, _, _)));
                assert!(matches!(*then, Expr::Member(_, _)));
                assert!(matches!(
                    *otherwise,
                    Expr::Call {
                        target: None,
                        ref name,
                        ..
                    } if name == "omit"
                ));
            }
            other => panic!("expected ternary, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_method_call_chain() {
        let expr = parse("items.filter(i, i > 2).map(i, i * 2)").unwrap();
        let Expr::Call { target, name, args } = expr else {
            panic!("expected call");
        };
        assert_eq!(name, "map");
        assert_eq!(args.len(), 2);
        assert!(matches!(
            target.as_deref(),
            Some(Expr::Call { ref name, .. }) if name == "filter"
        ));
    }

    #[test]
    fn test_parse_precedence() {
        // 1 + 2 * 3 parses as 1 + (2 * 3)
        let expr = parse("1 + 2 * 3").unwrap();
        assert!(matches!(
            expr,
            Expr::Binary(BinaryOp::Add, _, ref right)
                if matches!(**right, Expr::Binary(BinaryOp::Mul, _, _))
        ));
    }

    #[test]
    fn test_parse_map_and_list_literals() {
        let expr = parse("{'a': [1, 2], 'b': {}}").unwrap();
        let Expr::Map(entries) = expr else {
            panic!("expected map literal");
        };
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn test_parse_in_operator() {
        let expr = parse("'gzip' in encodings").unwrap();
        assert!(matches!(expr, Expr::Binary(BinaryOp::In, _, _)));
    }

    #[test]
    fn test_parse_index() {
        let expr = parse("containers['main'].image").unwrap();
        assert!(matches!(expr, Expr::Member(_, ref f) if f == "image"));
    }

    #[test]
    fn test_trailing_garbage_rejected() {
        assert!(parse("a b").is_err());
        assert!(parse("1 +").is_err());
    }
}
