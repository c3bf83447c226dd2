//! Tokens of the worker's MATLAB subset.
//!
//! A lone `'` is either the transpose operator or the start of a char
//! literal. It is a transpose when it directly follows (without whitespace)
//! something that ends a value; otherwise the driver scans a string.

use logos::{Lexer, Logos};
use std::fmt;

#[derive(Logos, Debug, PartialEq, Eq, Clone, Copy)]
#[logos(skip r"[ \t\r]+")]
#[logos(skip r"%[^\n]*")]
// Line continuation: `...` and the rest of the line
#[logos(skip r"\.\.\.[^\n]*\n?")]
pub enum Token {
    #[token("end")]
    End,

    #[regex(r"[a-zA-Z][a-zA-Z0-9_]*")]
    Ident,
    #[regex(r"[0-9]+(\.[0-9]+)?([eE][+-]?[0-9]+)?")]
    #[regex(r"\.[0-9]+([eE][+-]?[0-9]+)?")]
    Number,
    #[regex(r#""([^"\n]|"")*""#)]
    Str,
    // Decided by the driver: Transpose or Str
    #[token("'")]
    Apostrophe,
    Transpose,

    #[token(".'")]
    DotTranspose,
    #[token(".*")]
    DotStar,
    #[token("./")]
    DotSlash,
    #[token(".^")]
    DotCaret,
    #[token("&&")]
    AndAnd,
    #[token("||")]
    OrOr,
    #[token("==")]
    Equal,
    #[token("~=")]
    NotEqual,
    #[token("<=")]
    LessEqual,
    #[token(">=")]
    GreaterEqual,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("^")]
    Caret,
    #[token("&")]
    And,
    #[token("|")]
    Or,
    #[token("~")]
    Tilde,
    #[token("<")]
    Less,
    #[token(">")]
    Greater,
    #[token("=")]
    Assign,
    #[token(".")]
    Dot,
    #[token(";")]
    Semicolon,
    #[token(",")]
    Comma,
    #[token(":")]
    Colon,
    #[token("\n")]
    Newline,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
}

impl Token {
    /// Whether a `'` right after this token is a transpose.
    fn ends_value(self) -> bool {
        matches!(
            self,
            Token::Ident
                | Token::Number
                | Token::End
                | Token::Str
                | Token::Transpose
                | Token::DotTranspose
                | Token::RParen
                | Token::RBracket
                | Token::RBrace
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpannedToken {
    pub token: Token,
    pub lexeme: String,
    pub start: usize,
    pub end: usize,
    /// Whitespace (or a comment) separates this token from the previous one.
    pub space_before: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexError {
    pub message: String,
    pub position: usize,
}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at position {}", self.message, self.position)
    }
}

impl std::error::Error for LexError {}

/// Length in bytes of the single-quoted literal starting at the quote, or
/// `None` when the line ends first.
fn scan_char_literal(rest: &str) -> Option<usize> {
    let mut chars = rest.char_indices().skip(1).peekable();
    while let Some((i, c)) = chars.next() {
        match c {
            '\n' => return None,
            '\'' => {
                if matches!(chars.peek(), Some((_, '\''))) {
                    chars.next();
                } else {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }
    None
}

pub fn tokenize(input: &str) -> Result<Vec<SpannedToken>, LexError> {
    let mut lex: Lexer<Token> = Token::lexer(input);
    let mut out: Vec<SpannedToken> = Vec::new();
    let mut prev_end = 0usize;
    while let Some(res) = lex.next() {
        let span = lex.span();
        let space_before = span.start > prev_end;
        let token = match res {
            Ok(Token::Apostrophe) => {
                let transpose = !space_before
                    && out.last().is_some_and(|t| t.token.ends_value() && t.end == span.start);
                if transpose {
                    Token::Transpose
                } else {
                    let len = scan_char_literal(&input[span.start..]).ok_or_else(|| LexError {
                        message: "unterminated character literal".into(),
                        position: span.start,
                    })?;
                    lex.bump(len - 1);
                    Token::Str
                }
            }
            Ok(tok) => tok,
            Err(()) => {
                return Err(LexError {
                    message: format!("invalid character '{}'", lex.slice()),
                    position: span.start,
                })
            }
        };
        let span = lex.span();
        out.push(SpannedToken {
            token,
            lexeme: lex.slice().to_string(),
            start: span.start,
            end: span.end,
            space_before,
        });
        prev_end = span.end;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<Token> {
        tokenize(input).unwrap().into_iter().map(|t| t.token).collect()
    }

    #[test]
    fn transpose_after_value_string_elsewhere() {
        assert_eq!(
            kinds("b = a' + c';"),
            vec![
                Token::Ident,
                Token::Assign,
                Token::Ident,
                Token::Transpose,
                Token::Plus,
                Token::Ident,
                Token::Transpose,
                Token::Semicolon,
            ]
        );
        let tokens = tokenize("disp('it''s')").unwrap();
        assert_eq!(tokens[2].token, Token::Str);
        assert_eq!(tokens[2].lexeme, "'it''s'");
        assert_eq!(tokens[3].token, Token::RParen);
    }

    #[test]
    fn spaced_quote_in_brackets_starts_a_string() {
        let tokens = tokenize("[a 'x']").unwrap();
        assert_eq!(tokens[2].token, Token::Str);
        assert!(tokens[2].space_before);
    }

    #[test]
    fn comments_and_continuations_are_skipped() {
        assert_eq!(
            kinds("x = 1 + ... more\n 2 % note\ny"),
            vec![
                Token::Ident,
                Token::Assign,
                Token::Number,
                Token::Plus,
                Token::Number,
                Token::Newline,
                Token::Ident,
            ]
        );
    }

    #[test]
    fn numbers_and_dotted_operators() {
        let tokens = tokenize("1.5e3.*.25").unwrap();
        let lexemes: Vec<&str> = tokens.iter().map(|t| t.lexeme.as_str()).collect();
        assert_eq!(lexemes, vec!["1.5e3", ".*", ".25"]);
    }

    #[test]
    fn errors_report_position() {
        let err = tokenize("x = 'open").unwrap_err();
        assert_eq!(err.position, 4);
        assert!(tokenize("x = 1 # 2").is_err());
    }
}
