//! Recursive-descent parser for the worker's MATLAB subset.

use crate::lexer::{tokenize, SpannedToken, Token};

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Str(String),
    Ident(String),
    /// `end` inside a subscript
    End,
    /// A bare `:` subscript
    Colon,
    Unary(UnOp, Box<Expr>),
    Binary(Box<Expr>, BinOp, Box<Expr>),
    Tensor(Vec<Vec<Expr>>),
    Cell(Vec<Vec<Expr>>),
    Range(Box<Expr>, Option<Box<Expr>>, Box<Expr>),
    /// `name(args)`: indexing when `name` is a variable, a call otherwise
    FuncCall(String, Vec<Expr>),
    Index(Box<Expr>, Vec<Expr>),
    IndexCell(Box<Expr>, Vec<Expr>),
    Member(Box<Expr>, String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    ElemMul,
    ElemDiv,
    ElemPow,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    And,
    Or,
    AndAnd,
    OrOr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Plus,
    Minus,
    Not,
    Transpose,
    NonConjugateTranspose,
}

/// One step of an assignment target: `(..)`, `{..}` or `.field`.
#[derive(Debug, Clone, PartialEq)]
pub enum Subscript {
    Paren(Vec<Expr>),
    Brace(Vec<Expr>),
    Field(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct LValue {
    pub name: String,
    pub path: Vec<Subscript>,
}

/// Statements; the flag is set when a `;` suppresses display.
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    ExprStmt(Expr, bool),
    Assign(String, Expr, bool),
    /// `[a, ~, c] = f(...)`; `None` marks an ignored output
    MultiAssign(Vec<Option<String>>, Expr, bool),
    AssignLValue(LValue, Expr, bool),
}

impl Stmt {
    pub fn is_suppressed(&self) -> bool {
        match self {
            Stmt::ExprStmt(_, s)
            | Stmt::Assign(_, _, s)
            | Stmt::MultiAssign(_, _, s)
            | Stmt::AssignLValue(_, _, s) => *s,
        }
    }

    fn with_suppressed(self, suppressed: bool) -> Self {
        match self {
            Stmt::ExprStmt(e, _) => Stmt::ExprStmt(e, suppressed),
            Stmt::Assign(n, e, _) => Stmt::Assign(n, e, suppressed),
            Stmt::MultiAssign(n, e, _) => Stmt::MultiAssign(n, e, suppressed),
            Stmt::AssignLValue(lv, e, _) => Stmt::AssignLValue(lv, e, suppressed),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
    pub position: usize,
    pub found_token: Option<String>,
    pub expected: Option<String>,
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Parse error at position {}: {}",
            self.position, self.message
        )?;
        if let Some(found) = &self.found_token {
            write!(f, " (found: '{found}')")?;
        }
        if let Some(expected) = &self.expected {
            write!(f, " (expected: {expected})")?;
        }
        Ok(())
    }
}

impl std::error::Error for ParseError {}

pub fn parse(input: &str) -> Result<Program, ParseError> {
    let tokens = tokenize(input).map_err(|e| ParseError {
        message: e.message,
        position: e.position,
        found_token: None,
        expected: None,
    })?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        input_len: input.len(),
        brackets: Vec::new(),
        subscript_depth: 0,
    };
    parser.parse_program()
}

/// Strip the quotes of a char literal and undouble embedded quotes.
fn unquote(lexeme: &str) -> String {
    let quote = if lexeme.starts_with('"') { "\"" } else { "'" };
    let inner = &lexeme[1..lexeme.len().saturating_sub(1).max(1)];
    inner.replace(&quote.repeat(2), quote)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bracket {
    /// Inside `[...]` or `{...}`, where whitespace separates elements
    Matrix,
    Paren,
}

struct Parser {
    tokens: Vec<SpannedToken>,
    pos: usize,
    input_len: usize,
    brackets: Vec<Bracket>,
    subscript_depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&SpannedToken> {
        self.tokens.get(self.pos)
    }

    fn peek_token(&self) -> Option<Token> {
        self.peek().map(|t| t.token)
    }

    fn peek_at(&self, offset: usize) -> Option<&SpannedToken> {
        self.tokens.get(self.pos + offset)
    }

    fn next(&mut self) -> Option<SpannedToken> {
        let t = self.tokens.get(self.pos).cloned();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn consume(&mut self, token: Token) -> bool {
        if self.peek_token() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn in_matrix(&self) -> bool {
        self.brackets.last() == Some(&Bracket::Matrix)
    }

    fn error(&self, message: &str) -> ParseError {
        let (position, found_token) = match self.peek() {
            Some(t) => (t.start, Some(t.lexeme.clone())),
            None => (self.input_len, None),
        };
        ParseError {
            message: message.to_string(),
            position,
            found_token,
            expected: None,
        }
    }

    fn error_with_expected(&self, message: &str, expected: &str) -> ParseError {
        ParseError {
            expected: Some(expected.to_string()),
            ..self.error(message)
        }
    }

    fn expect(&mut self, token: Token, expected: &str) -> Result<(), ParseError> {
        if self.consume(token) {
            Ok(())
        } else {
            Err(self.error_with_expected("unexpected token", expected))
        }
    }

    fn parse_program(&mut self) -> Result<Program, ParseError> {
        let mut body = Vec::new();
        while self.pos < self.tokens.len() {
            if self.consume(Token::Semicolon)
                || self.consume(Token::Comma)
                || self.consume(Token::Newline)
            {
                continue;
            }
            let stmt = self.parse_stmt()?;
            let suppressed = match self.peek_token() {
                None => false,
                Some(Token::Semicolon) => {
                    self.pos += 1;
                    true
                }
                Some(Token::Comma) | Some(Token::Newline) => {
                    self.pos += 1;
                    false
                }
                Some(_) => {
                    return Err(self.error_with_expected(
                        "unexpected token after statement",
                        "';', ',' or newline",
                    ))
                }
            };
            body.push(stmt.with_suppressed(suppressed));
        }
        Ok(Program { body })
    }

    fn parse_stmt(&mut self) -> Result<Stmt, ParseError> {
        match self.peek_token() {
            Some(Token::LBracket) if self.is_multi_assign_ahead() => self.parse_multi_assign(),
            Some(Token::Ident) => {
                if self.can_start_command_form() {
                    return Ok(self.parse_command());
                }
                let saved = self.pos;
                if let Ok(Some(lv)) = self.try_parse_lvalue() {
                    let expr = self.parse_expr()?;
                    return Ok(if lv.path.is_empty() {
                        Stmt::Assign(lv.name, expr, false)
                    } else {
                        Stmt::AssignLValue(lv, expr, false)
                    });
                }
                self.pos = saved;
                Ok(Stmt::ExprStmt(self.parse_expr()?, false))
            }
            _ => Ok(Stmt::ExprStmt(self.parse_expr()?, false)),
        }
    }

    /// `[` ... matching `]` followed by `=`.
    fn is_multi_assign_ahead(&self) -> bool {
        let mut depth = 0usize;
        for (i, t) in self.tokens[self.pos..].iter().enumerate() {
            match t.token {
                Token::LBracket | Token::LParen | Token::LBrace => depth += 1,
                Token::RBracket | Token::RParen | Token::RBrace => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        return self.peek_at(i + 1).map(|t| t.token) == Some(Token::Assign);
                    }
                }
                Token::Newline | Token::Semicolon if depth <= 1 => return false,
                _ => {}
            }
        }
        false
    }

    fn parse_multi_assign(&mut self) -> Result<Stmt, ParseError> {
        self.expect(Token::LBracket, "'['")?;
        let mut names = Vec::new();
        loop {
            match self.next() {
                Some(t) if t.token == Token::Ident => names.push(Some(t.lexeme)),
                Some(t) if t.token == Token::Tilde => names.push(None),
                Some(t) if t.token == Token::Comma => continue,
                Some(t) if t.token == Token::RBracket => break,
                _ => {
                    self.pos = self.pos.saturating_sub(1);
                    return Err(self.error_with_expected(
                        "invalid assignment target",
                        "identifier or '~'",
                    ));
                }
            }
        }
        if names.is_empty() {
            return Err(self.error("empty assignment target list"));
        }
        self.expect(Token::Assign, "'='")?;
        let expr = self.parse_expr()?;
        Ok(Stmt::MultiAssign(names, expr, false))
    }

    /// `name word word ...`: every argument is passed as a char row.
    fn can_start_command_form(&self) -> bool {
        let Some(first_arg) = self.peek_at(1) else {
            return false;
        };
        if !first_arg.space_before
            || !matches!(first_arg.token, Token::Ident | Token::Number | Token::Str)
        {
            return false;
        }
        let mut i = 1;
        while let Some(t) = self.peek_at(i) {
            match t.token {
                Token::Semicolon | Token::Comma | Token::Newline => break,
                Token::Ident | Token::Number | Token::Str if t.space_before => i += 1,
                _ => return false,
            }
        }
        true
    }

    fn parse_command(&mut self) -> Stmt {
        let mut args = Vec::new();
        let name = self.next().map(|t| t.lexeme).unwrap_or_default();
        while let Some(t) = self.peek() {
            let arg = match t.token {
                Token::Str => unquote(&t.lexeme),
                Token::Ident | Token::Number => t.lexeme.clone(),
                _ => break,
            };
            args.push(Expr::Str(arg));
            self.pos += 1;
        }
        Stmt::ExprStmt(Expr::FuncCall(name, args), false)
    }

    /// Parse `name{...}(...).field ... =`; `None` if no `=` follows.
    fn try_parse_lvalue(&mut self) -> Result<Option<LValue>, ParseError> {
        let name = match self.next() {
            Some(t) if t.token == Token::Ident => t.lexeme,
            _ => return Ok(None),
        };
        let mut path = Vec::new();
        loop {
            match self.peek_token() {
                Some(Token::LParen) => {
                    self.pos += 1;
                    path.push(Subscript::Paren(self.parse_args(Token::RParen, "')'")?));
                }
                Some(Token::LBrace) => {
                    self.pos += 1;
                    path.push(Subscript::Brace(self.parse_args(Token::RBrace, "'}'")?));
                }
                Some(Token::Dot) => {
                    self.pos += 1;
                    match self.next() {
                        Some(t) if t.token == Token::Ident => path.push(Subscript::Field(t.lexeme)),
                        _ => return Ok(None),
                    }
                }
                Some(Token::Assign) => {
                    self.pos += 1;
                    return Ok(Some(LValue { name, path }));
                }
                _ => return Ok(None),
            }
        }
    }

    fn parse_args(&mut self, close: Token, expected: &str) -> Result<Vec<Expr>, ParseError> {
        self.brackets.push(Bracket::Paren);
        self.subscript_depth += 1;
        let result = self.parse_args_inner(close, expected);
        self.subscript_depth -= 1;
        self.brackets.pop();
        result
    }

    fn parse_args_inner(&mut self, close: Token, expected: &str) -> Result<Vec<Expr>, ParseError> {
        let mut args = Vec::new();
        if self.consume(close) {
            return Ok(args);
        }
        loop {
            let bare_colon = self.peek_token() == Some(Token::Colon)
                && matches!(
                    self.peek_at(1).map(|t| t.token),
                    Some(t) if t == Token::Comma || t == close
                );
            if bare_colon {
                self.pos += 1;
                args.push(Expr::Colon);
            } else {
                args.push(self.parse_expr()?);
            }
            if self.consume(Token::Comma) {
                continue;
            }
            if self.consume(close) {
                return Ok(args);
            }
            return Err(self.error_with_expected("unexpected token in argument list", expected));
        }
    }

    pub fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        self.parse_oror()
    }

    fn parse_binary_level(
        &mut self,
        ops: &[(Token, BinOp)],
        next: fn(&mut Self) -> Result<Expr, ParseError>,
    ) -> Result<Expr, ParseError> {
        let mut lhs = next(self)?;
        while let Some(op) = self
            .peek_token()
            .and_then(|t| ops.iter().find(|(tok, _)| *tok == t).map(|(_, op)| *op))
        {
            self.pos += 1;
            let rhs = next(self)?;
            lhs = Expr::Binary(Box::new(lhs), op, Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_oror(&mut self) -> Result<Expr, ParseError> {
        self.parse_binary_level(&[(Token::OrOr, BinOp::OrOr)], Self::parse_andand)
    }

    fn parse_andand(&mut self) -> Result<Expr, ParseError> {
        self.parse_binary_level(&[(Token::AndAnd, BinOp::AndAnd)], Self::parse_or)
    }

    fn parse_or(&mut self) -> Result<Expr, ParseError> {
        self.parse_binary_level(&[(Token::Or, BinOp::Or)], Self::parse_and)
    }

    fn parse_and(&mut self) -> Result<Expr, ParseError> {
        self.parse_binary_level(&[(Token::And, BinOp::And)], Self::parse_comparison)
    }

    fn parse_comparison(&mut self) -> Result<Expr, ParseError> {
        self.parse_binary_level(
            &[
                (Token::Equal, BinOp::Equal),
                (Token::NotEqual, BinOp::NotEqual),
                (Token::Less, BinOp::Less),
                (Token::LessEqual, BinOp::LessEqual),
                (Token::Greater, BinOp::Greater),
                (Token::GreaterEqual, BinOp::GreaterEqual),
            ],
            Self::parse_range,
        )
    }

    fn parse_range(&mut self) -> Result<Expr, ParseError> {
        let start = self.parse_additive()?;
        if !self.consume(Token::Colon) {
            return Ok(start);
        }
        let second = self.parse_additive()?;
        if self.consume(Token::Colon) {
            let end = self.parse_additive()?;
            Ok(Expr::Range(
                Box::new(start),
                Some(Box::new(second)),
                Box::new(end),
            ))
        } else {
            Ok(Expr::Range(Box::new(start), None, Box::new(second)))
        }
    }

    /// In `[a -b]` the minus starts a new element; in `[a - b]` it subtracts.
    fn starts_new_element(&self) -> bool {
        if !self.in_matrix() {
            return false;
        }
        match (self.peek(), self.peek_at(1)) {
            (Some(op), Some(operand)) => op.space_before && !operand.space_before,
            _ => false,
        }
    }

    fn parse_additive(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match self.peek_token() {
                Some(Token::Plus) => BinOp::Add,
                Some(Token::Minus) => BinOp::Sub,
                _ => break,
            };
            if self.starts_new_element() {
                break;
            }
            self.pos += 1;
            let rhs = self.parse_multiplicative()?;
            lhs = Expr::Binary(Box::new(lhs), op, Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, ParseError> {
        self.parse_binary_level(
            &[
                (Token::Star, BinOp::Mul),
                (Token::Slash, BinOp::Div),
                (Token::DotStar, BinOp::ElemMul),
                (Token::DotSlash, BinOp::ElemDiv),
            ],
            Self::parse_unary,
        )
    }

    fn prefix_op(&self) -> Option<UnOp> {
        match self.peek_token() {
            Some(Token::Minus) => Some(UnOp::Minus),
            Some(Token::Plus) => Some(UnOp::Plus),
            Some(Token::Tilde) => Some(UnOp::Not),
            _ => None,
        }
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        if let Some(op) = self.prefix_op() {
            self.pos += 1;
            let operand = self.parse_unary()?;
            return Ok(Expr::Unary(op, Box::new(operand)));
        }
        self.parse_power()
    }

    fn parse_power(&mut self) -> Result<Expr, ParseError> {
        let mut base = self.parse_postfix()?;
        loop {
            let op = match self.peek_token() {
                Some(Token::Caret) => BinOp::Pow,
                Some(Token::DotCaret) => BinOp::ElemPow,
                _ => break,
            };
            self.pos += 1;
            let exponent = self.parse_power_operand()?;
            base = Expr::Binary(Box::new(base), op, Box::new(exponent));
        }
        Ok(base)
    }

    /// `2^-1` is legal: the exponent may carry its own sign.
    fn parse_power_operand(&mut self) -> Result<Expr, ParseError> {
        if let Some(op) = self.prefix_op() {
            self.pos += 1;
            let operand = self.parse_power_operand()?;
            return Ok(Expr::Unary(op, Box::new(operand)));
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_primary()?;
        loop {
            let Some(t) = self.peek() else { break };
            let detached = self.in_matrix() && t.space_before;
            match t.token {
                Token::LParen if !detached => {
                    self.pos += 1;
                    let args = self.parse_args(Token::RParen, "')'")?;
                    expr = match expr {
                        Expr::Ident(name) => Expr::FuncCall(name, args),
                        other => Expr::Index(Box::new(other), args),
                    };
                }
                Token::LBrace if !detached => {
                    self.pos += 1;
                    let args = self.parse_args(Token::RBrace, "'}'")?;
                    expr = Expr::IndexCell(Box::new(expr), args);
                }
                Token::Dot if !detached => {
                    self.pos += 1;
                    match self.next() {
                        Some(f) if f.token == Token::Ident => {
                            expr = Expr::Member(Box::new(expr), f.lexeme)
                        }
                        _ => {
                            self.pos = self.pos.saturating_sub(1);
                            return Err(self.error_with_expected(
                                "expected field name after '.'",
                                "identifier",
                            ));
                        }
                    }
                }
                Token::Transpose => {
                    self.pos += 1;
                    expr = Expr::Unary(UnOp::Transpose, Box::new(expr));
                }
                Token::DotTranspose => {
                    self.pos += 1;
                    expr = Expr::Unary(UnOp::NonConjugateTranspose, Box::new(expr));
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        let Some(t) = self.peek().cloned() else {
            return Err(self.error("unexpected end of input"));
        };
        match t.token {
            Token::Number => {
                self.pos += 1;
                t.lexeme
                    .parse::<f64>()
                    .map(Expr::Number)
                    .map_err(|_| ParseError {
                        message: format!("invalid number '{}'", t.lexeme),
                        position: t.start,
                        found_token: Some(t.lexeme.clone()),
                        expected: None,
                    })
            }
            Token::Str => {
                self.pos += 1;
                Ok(Expr::Str(unquote(&t.lexeme)))
            }
            Token::Ident => {
                self.pos += 1;
                Ok(Expr::Ident(t.lexeme))
            }
            Token::End if self.subscript_depth > 0 => {
                self.pos += 1;
                Ok(Expr::End)
            }
            Token::LParen => {
                self.pos += 1;
                self.brackets.push(Bracket::Paren);
                let inner = self.parse_expr();
                self.brackets.pop();
                let inner = inner?;
                self.expect(Token::RParen, "')'")?;
                Ok(inner)
            }
            Token::LBracket => {
                self.pos += 1;
                Ok(Expr::Tensor(self.parse_rows(Token::RBracket, "']'")?))
            }
            Token::LBrace => {
                self.pos += 1;
                Ok(Expr::Cell(self.parse_rows(Token::RBrace, "'}'")?))
            }
            _ => Err(self.error("unexpected token in expression")),
        }
    }

    fn parse_rows(&mut self, close: Token, expected: &str) -> Result<Vec<Vec<Expr>>, ParseError> {
        self.brackets.push(Bracket::Matrix);
        let result = self.parse_rows_inner(close, expected);
        self.brackets.pop();
        result
    }

    fn parse_rows_inner(
        &mut self,
        close: Token,
        expected: &str,
    ) -> Result<Vec<Vec<Expr>>, ParseError> {
        let mut rows = Vec::new();
        let mut row = Vec::new();
        let mut after_element = false;
        loop {
            match self.peek_token() {
                None => return Err(self.error_with_expected("unterminated literal", expected)),
                Some(t) if t == close => {
                    self.pos += 1;
                    if !row.is_empty() {
                        rows.push(row);
                    }
                    return Ok(rows);
                }
                Some(Token::Semicolon) | Some(Token::Newline) => {
                    self.pos += 1;
                    if !row.is_empty() {
                        rows.push(std::mem::take(&mut row));
                    }
                    after_element = false;
                }
                Some(Token::Comma) => {
                    self.pos += 1;
                    after_element = false;
                }
                Some(_) => {
                    let spaced = self.peek().is_some_and(|t| t.space_before);
                    if after_element && !spaced {
                        return Err(self.error_with_expected(
                            "unexpected token in literal",
                            &format!("',', ';' or {expected}"),
                        ));
                    }
                    row.push(self.parse_expr()?);
                    after_element = true;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn num(x: f64) -> Expr {
        Expr::Number(x)
    }

    fn single(input: &str) -> Stmt {
        let mut program = parse(input).unwrap();
        assert_eq!(program.body.len(), 1, "{input}");
        program.body.remove(0)
    }

    #[test]
    fn assignment_and_suppression() {
        let program = parse("x = 1; y = x + 2\nz").unwrap();
        assert_eq!(program.body.len(), 3);
        assert!(program.body[0].is_suppressed());
        assert!(!program.body[1].is_suppressed());
        assert_eq!(
            program.body[1],
            Stmt::Assign(
                "y".into(),
                Expr::Binary(Box::new(Expr::Ident("x".into())), BinOp::Add, Box::new(num(2.0))),
                false
            )
        );
    }

    #[test]
    fn matrix_whitespace_rules() {
        assert_eq!(
            single("[1 -2]"),
            Stmt::ExprStmt(
                Expr::Tensor(vec![vec![
                    num(1.0),
                    Expr::Unary(UnOp::Minus, Box::new(num(2.0)))
                ]]),
                false
            )
        );
        assert_eq!(
            single("[1 - 2; 3, 4]"),
            Stmt::ExprStmt(
                Expr::Tensor(vec![
                    vec![Expr::Binary(Box::new(num(1.0)), BinOp::Sub, Box::new(num(2.0)))],
                    vec![num(3.0), num(4.0)],
                ]),
                false
            )
        );
    }

    #[test]
    fn precedence_of_power_and_unary_minus() {
        // -2^2 is -(2^2)
        assert_eq!(
            single("-2^2"),
            Stmt::ExprStmt(
                Expr::Unary(
                    UnOp::Minus,
                    Box::new(Expr::Binary(Box::new(num(2.0)), BinOp::Pow, Box::new(num(2.0))))
                ),
                false
            )
        );
    }

    #[test]
    fn ranges_and_subscripts() {
        match single("x(2:end, :)") {
            Stmt::ExprStmt(Expr::FuncCall(name, args), false) => {
                assert_eq!(name, "x");
                assert_eq!(
                    args,
                    vec![
                        Expr::Range(Box::new(num(2.0)), None, Box::new(Expr::End)),
                        Expr::Colon
                    ]
                );
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(parse("y = end").is_err());
    }

    #[test]
    fn lvalue_paths() {
        assert_eq!(
            single("s.a{2}(1) = 5"),
            Stmt::AssignLValue(
                LValue {
                    name: "s".into(),
                    path: vec![
                        Subscript::Field("a".into()),
                        Subscript::Brace(vec![num(2.0)]),
                        Subscript::Paren(vec![num(1.0)]),
                    ],
                },
                num(5.0),
                false
            )
        );
        // comparison, not assignment
        assert!(matches!(
            single("x(1) == 2"),
            Stmt::ExprStmt(Expr::Binary(_, BinOp::Equal, _), false)
        ));
    }

    #[test]
    fn multi_assign_with_placeholder() {
        assert_eq!(
            single("[a, ~] = size(m);"),
            Stmt::MultiAssign(
                vec![Some("a".into()), None],
                Expr::FuncCall("size".into(), vec![Expr::Ident("m".into())]),
                true
            )
        );
        // a plain matrix expression is not a target list
        assert!(matches!(single("[a, b]"), Stmt::ExprStmt(Expr::Tensor(_), false)));
    }

    #[test]
    fn command_form_and_strings() {
        assert_eq!(
            single("disp hello"),
            Stmt::ExprStmt(
                Expr::FuncCall("disp".into(), vec![Expr::Str("hello".into())]),
                false
            )
        );
        assert_eq!(
            single("c = {'it''s', \"q\"}"),
            Stmt::Assign(
                "c".into(),
                Expr::Cell(vec![vec![Expr::Str("it's".into()), Expr::Str("q".into())]]),
                false
            )
        );
    }

    #[test]
    fn errors_carry_position() {
        let err = parse("x = (1 + 2").unwrap_err();
        assert_eq!(err.expected.as_deref(), Some("')'"));
        let err = parse("x = 1 2").unwrap_err();
        assert_eq!(err.position, 6);
    }
}
