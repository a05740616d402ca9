use std::fmt;

use crate::error::{CalcError, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Int(i32),
    Float(f32),
    Str(String),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
    Comma,
    /// `=` or `<-`.
    Assign,
    /// End of statement: a newline or `;`.
    Separator,
    Eof,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Int(v) => write!(f, "{v}"),
            Token::Float(v) => write!(f, "{v}"),
            Token::Str(s) => write!(f, "\"{s}\""),
            Token::Ident(name) => f.write_str(name),
            Token::Plus => f.write_str("'+'"),
            Token::Minus => f.write_str("'-'"),
            Token::Star => f.write_str("'*'"),
            Token::Slash => f.write_str("'/'"),
            Token::LParen => f.write_str("'('"),
            Token::RParen => f.write_str("')'"),
            Token::Comma => f.write_str("','"),
            Token::Assign => f.write_str("assignment"),
            Token::Separator => f.write_str("end of statement"),
            Token::Eof => f.write_str("end of input"),
        }
    }
}

/// A token and the line it started on.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub line: usize,
}

/// Split source text into tokens.
///
/// Newlines inside parentheses are not separators, so calls may span lines.
/// `#` starts a comment that runs to the end of the line.
pub fn tokenize(src: &str) -> Result<Vec<Spanned>> {
    let mut tokens = Vec::new();
    let mut chars = src.chars().peekable();
    let mut line = 1usize;
    let mut depth = 0usize;

    while let Some(&c) = chars.peek() {
        let start = line;
        let token = match c {
            '\n' => {
                chars.next();
                line += 1;
                if depth > 0 {
                    continue;
                }
                Token::Separator
            }
            ';' => {
                chars.next();
                Token::Separator
            }
            c if c.is_whitespace() => {
                chars.next();
                continue;
            }
            '#' => {
                while chars.peek().is_some_and(|&c| c != '\n') {
                    chars.next();
                }
                continue;
            }
            '+' | '-' | '*' | '/' | ',' | '=' => {
                chars.next();
                match c {
                    '+' => Token::Plus,
                    '-' => Token::Minus,
                    '*' => Token::Star,
                    '/' => Token::Slash,
                    ',' => Token::Comma,
                    _ => Token::Assign,
                }
            }
            '<' => {
                chars.next();
                if chars.next_if_eq(&'-').is_none() {
                    return Err(syntax(line, "expected '<-'"));
                }
                Token::Assign
            }
            '(' => {
                chars.next();
                depth += 1;
                Token::LParen
            }
            ')' => {
                chars.next();
                depth = depth.saturating_sub(1);
                Token::RParen
            }
            '"' | '\'' => {
                chars.next();
                let mut text = String::new();
                loop {
                    match chars.next() {
                        Some(q) if q == c => break,
                        Some('\\') => match chars.next() {
                            Some('n') => text.push('\n'),
                            Some('t') => text.push('\t'),
                            Some(other) => text.push(other),
                            None => return Err(syntax(start, "unterminated string")),
                        },
                        Some('\n') => {
                            line += 1;
                            text.push('\n');
                        }
                        Some(other) => text.push(other),
                        None => return Err(syntax(start, "unterminated string")),
                    }
                }
                Token::Str(text)
            }
            c if c.is_ascii_digit() || c == '.' => {
                let mut text = String::new();
                while let Some(d) = chars.next_if(|d| d.is_ascii_digit() || *d == '.') {
                    text.push(d);
                }
                number(&text, line)?
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut name = String::new();
                while let Some(d) = chars.next_if(|d| d.is_alphanumeric() || *d == '_' || *d == '.')
                {
                    name.push(d);
                }
                Token::Ident(name)
            }
            other => return Err(syntax(line, &format!("unexpected character '{other}'"))),
        };
        tokens.push(Spanned { token, line: start });
    }

    tokens.push(Spanned {
        token: Token::Eof,
        line,
    });
    Ok(tokens)
}

fn number(text: &str, line: usize) -> Result<Token> {
    if text.contains('.') {
        text.parse::<f32>()
            .map(Token::Float)
            .map_err(|_| syntax(line, &format!("malformed number '{text}'")))
    } else {
        text.parse::<i32>()
            .map(Token::Int)
            .map_err(|_| syntax(line, &format!("integer literal '{text}' out of range")))
    }
}

fn syntax(line: usize, message: &str) -> CalcError {
    CalcError::Syntax {
        line,
        message: message.to_string(),
    }
}
