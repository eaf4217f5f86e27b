use crate::error::{LexError, Span};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::fmt;

static KEYWORDS: Lazy<HashMap<&'static str, Token>> = Lazy::new(|| {
    let mut m = HashMap::with_capacity(16);
    m.insert("in", Token::In);
    m.insert("not", Token::Not);
    m.insert("and", Token::And);
    m.insert("or", Token::Or);
    m.insert("true", Token::True);
    m.insert("false", Token::False);
    m.insert("null", Token::Null);
    m.insert("if", Token::If);
    m.insert("then", Token::Then);
    m.insert("else", Token::Else);
    m
});

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    In,
    Not,
    And,
    Or,
    True,
    False,
    Null,
    If,
    Then,
    Else,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Pipe,
    Arrow,
    LeftBracket,
    RightBracket,
    LeftParen,
    RightParen,
    Dot,
    Comma,
    Colon,
    Identifier(String),
    String(String),
    Int(i64),
    Float(f64),
}

impl Token {
    pub fn display_name(&self) -> String {
        match self {
            Token::In => "keyword 'in'".to_string(),
            Token::Not => "keyword 'not'".to_string(),
            Token::And => "keyword 'and'".to_string(),
            Token::Or => "keyword 'or'".to_string(),
            Token::True => "keyword 'true'".to_string(),
            Token::False => "keyword 'false'".to_string(),
            Token::Null => "keyword 'null'".to_string(),
            Token::If => "keyword 'if'".to_string(),
            Token::Then => "keyword 'then'".to_string(),
            Token::Else => "keyword 'else'".to_string(),
            Token::Eq => "'=='".to_string(),
            Token::Ne => "'!='".to_string(),
            Token::Lt => "'<'".to_string(),
            Token::Le => "'<='".to_string(),
            Token::Gt => "'>'".to_string(),
            Token::Ge => "'>='".to_string(),
            Token::Plus => "'+'".to_string(),
            Token::Minus => "'-'".to_string(),
            Token::Star => "'*'".to_string(),
            Token::Slash => "'/'".to_string(),
            Token::Percent => "'%'".to_string(),
            Token::Pipe => "'|'".to_string(),
            Token::Arrow => "'->'".to_string(),
            Token::LeftBracket => "'['".to_string(),
            Token::RightBracket => "']'".to_string(),
            Token::LeftParen => "'('".to_string(),
            Token::RightParen => "')'".to_string(),
            Token::Dot => "'.'".to_string(),
            Token::Comma => "','".to_string(),
            Token::Colon => "':'".to_string(),
            Token::Identifier(s) => format!("'{}'", s),
            Token::String(s) => format!("string \"{}\"", s),
            Token::Int(n) => format!("integer {}", n),
            Token::Float(n) => format!("number {}", n),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SpannedToken {
    pub token: Token,
    pub span: Span,
}

/// Tokenizes one stage expression string.
///
/// Stage expressions come from single command-line arguments, so the input
/// is one logical line; newlines are treated as plain whitespace.
pub fn tokenize(input: &str) -> Result<Vec<SpannedToken>, LexError> {
    let mut tokens = Vec::with_capacity(input.len() / 2);
    let mut chars = input.chars().peekable();

    let mut col = 1;
    let mut offset = 0;

    let bump = |ch: char, col: &mut usize, offset: &mut usize| {
        *col += 1;
        *offset += ch.len_utf8();
    };

    while let Some(&ch) = chars.peek() {
        let start_col = col;
        let start_offset = offset;

        match ch {
            ' ' | '\t' | '\r' | '\n' => {
                chars.next();
                bump(ch, &mut col, &mut offset);
            }

            '"' | '\'' => {
                let quote = ch;
                chars.next();
                bump(ch, &mut col, &mut offset);

                let mut string = String::new();
                let mut escaped = false;
                let mut terminated = false;

                while let Some(&ch) = chars.peek() {
                    if escaped {
                        string.push(match ch {
                            'n' => '\n',
                            't' => '\t',
                            'r' => '\r',
                            '\\' => '\\',
                            _ if ch == quote => quote,
                            _ => ch,
                        });
                        escaped = false;
                    } else if ch == '\\' {
                        escaped = true;
                    } else if ch == quote {
                        chars.next();
                        bump(ch, &mut col, &mut offset);
                        terminated = true;
                        break;
                    } else {
                        string.push(ch);
                    }
                    chars.next();
                    bump(ch, &mut col, &mut offset);
                }

                if !terminated {
                    return Err(LexError::UnterminatedString {
                        span: Span::new(1, start_col, start_offset, offset),
                    });
                }

                tokens.push(SpannedToken {
                    token: Token::String(string),
                    span: Span::new(1, start_col, start_offset, offset),
                });
            }

            '0'..='9' => {
                let mut num_str = String::new();
                let mut is_float = false;
                while let Some(&ch) = chars.peek() {
                    if ch.is_ascii_digit() {
                        num_str.push(ch);
                        chars.next();
                        bump(ch, &mut col, &mut offset);
                    } else if ch == '.' {
                        // A second dot belongs to the caller (method access
                        // on a float literal is not supported anyway).
                        if is_float {
                            break;
                        }
                        is_float = true;
                        num_str.push(ch);
                        chars.next();
                        bump(ch, &mut col, &mut offset);
                    } else {
                        break;
                    }
                }

                let span = Span::new(1, start_col, start_offset, offset);
                let token = if is_float {
                    let n = num_str.parse::<f64>().map_err(|_| LexError::InvalidNumber {
                        text: num_str.clone(),
                        span,
                    })?;
                    Token::Float(n)
                } else {
                    let n = num_str.parse::<i64>().map_err(|_| LexError::InvalidNumber {
                        text: num_str.clone(),
                        span,
                    })?;
                    Token::Int(n)
                };

                tokens.push(SpannedToken { token, span });
            }

            '=' => {
                chars.next();
                bump(ch, &mut col, &mut offset);

                if chars.peek() == Some(&'=') {
                    chars.next();
                    bump('=', &mut col, &mut offset);
                    tokens.push(SpannedToken {
                        token: Token::Eq,
                        span: Span::new(1, start_col, start_offset, offset),
                    });
                } else {
                    return Err(LexError::UnexpectedChar {
                        ch: '=',
                        span: Span::new(1, start_col, start_offset, offset),
                        suggestion: Some("did you mean '=='?".to_string()),
                    });
                }
            }

            '!' => {
                chars.next();
                bump(ch, &mut col, &mut offset);

                if chars.peek() == Some(&'=') {
                    chars.next();
                    bump('=', &mut col, &mut offset);
                    tokens.push(SpannedToken {
                        token: Token::Ne,
                        span: Span::new(1, start_col, start_offset, offset),
                    });
                } else {
                    return Err(LexError::UnexpectedChar {
                        ch: '!',
                        span: Span::new(1, start_col, start_offset, offset),
                        suggestion: Some("did you mean '!=' or 'not'?".to_string()),
                    });
                }
            }

            '<' => {
                chars.next();
                bump(ch, &mut col, &mut offset);

                if chars.peek() == Some(&'=') {
                    chars.next();
                    bump('=', &mut col, &mut offset);
                    tokens.push(SpannedToken {
                        token: Token::Le,
                        span: Span::new(1, start_col, start_offset, offset),
                    });
                } else {
                    tokens.push(SpannedToken {
                        token: Token::Lt,
                        span: Span::new(1, start_col, start_offset, offset),
                    });
                }
            }

            '>' => {
                chars.next();
                bump(ch, &mut col, &mut offset);

                if chars.peek() == Some(&'=') {
                    chars.next();
                    bump('=', &mut col, &mut offset);
                    tokens.push(SpannedToken {
                        token: Token::Ge,
                        span: Span::new(1, start_col, start_offset, offset),
                    });
                } else {
                    tokens.push(SpannedToken {
                        token: Token::Gt,
                        span: Span::new(1, start_col, start_offset, offset),
                    });
                }
            }

            '-' => {
                chars.next();
                bump(ch, &mut col, &mut offset);

                if chars.peek() == Some(&'>') {
                    chars.next();
                    bump('>', &mut col, &mut offset);
                    tokens.push(SpannedToken {
                        token: Token::Arrow,
                        span: Span::new(1, start_col, start_offset, offset),
                    });
                } else {
                    tokens.push(SpannedToken {
                        token: Token::Minus,
                        span: Span::new(1, start_col, start_offset, offset),
                    });
                }
            }

            '+' | '*' | '/' | '%' | '|' | '[' | ']' | '(' | ')' | '.' | ',' | ':' => {
                chars.next();
                bump(ch, &mut col, &mut offset);
                let token = match ch {
                    '+' => Token::Plus,
                    '*' => Token::Star,
                    '/' => Token::Slash,
                    '%' => Token::Percent,
                    '|' => Token::Pipe,
                    '[' => Token::LeftBracket,
                    ']' => Token::RightBracket,
                    '(' => Token::LeftParen,
                    ')' => Token::RightParen,
                    '.' => Token::Dot,
                    ',' => Token::Comma,
                    ':' => Token::Colon,
                    _ => unreachable!(),
                };
                tokens.push(SpannedToken {
                    token,
                    span: Span::new(1, start_col, start_offset, offset),
                });
            }

            _ if ch.is_alphabetic() || ch == '_' => {
                let mut ident = String::with_capacity(16);
                while let Some(&ch) = chars.peek() {
                    if ch.is_alphanumeric() || ch == '_' {
                        ident.push(ch);
                        chars.next();
                        bump(ch, &mut col, &mut offset);
                    } else {
                        break;
                    }
                }

                let token = KEYWORDS
                    .get(ident.as_str())
                    .cloned()
                    .unwrap_or(Token::Identifier(ident));

                tokens.push(SpannedToken {
                    token,
                    span: Span::new(1, start_col, start_offset, offset),
                });
            }

            _ => {
                return Err(LexError::UnexpectedChar {
                    ch,
                    span: Span::new(1, start_col, start_offset, offset + ch.len_utf8()),
                    suggestion: None,
                });
            }
        }
    }

    Ok(tokens)
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Token::In => write!(f, "in"),
            Token::Not => write!(f, "not"),
            Token::And => write!(f, "and"),
            Token::Or => write!(f, "or"),
            Token::True => write!(f, "true"),
            Token::False => write!(f, "false"),
            Token::Null => write!(f, "null"),
            Token::If => write!(f, "if"),
            Token::Then => write!(f, "then"),
            Token::Else => write!(f, "else"),
            Token::Eq => write!(f, "=="),
            Token::Ne => write!(f, "!="),
            Token::Lt => write!(f, "<"),
            Token::Le => write!(f, "<="),
            Token::Gt => write!(f, ">"),
            Token::Ge => write!(f, ">="),
            Token::Plus => write!(f, "+"),
            Token::Minus => write!(f, "-"),
            Token::Star => write!(f, "*"),
            Token::Slash => write!(f, "/"),
            Token::Percent => write!(f, "%"),
            Token::Pipe => write!(f, "|"),
            Token::Arrow => write!(f, "->"),
            Token::LeftBracket => write!(f, "["),
            Token::RightBracket => write!(f, "]"),
            Token::LeftParen => write!(f, "("),
            Token::RightParen => write!(f, ")"),
            Token::Dot => write!(f, "."),
            Token::Comma => write!(f, ","),
            Token::Colon => write!(f, ":"),
            Token::Identifier(s) => write!(f, "{}", s),
            Token::String(s) => write!(f, "\"{}\"", s),
            Token::Int(n) => write!(f, "{}", n),
            Token::Float(n) => write!(f, "{}", n),
        }
    }
}
