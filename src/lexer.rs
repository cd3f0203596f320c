// File: src/lexer.rs
//
// Single-pass tokenizer for Lucy. One character of lookahead plus one
// character of peek, matching the reference lexer's `current_char`/`next_char`
// cursor pair.

use crate::ast::Location;
use crate::errors::{LucyError, SourceLocation};

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // keywords
    If,
    Else,
    Loop,
    While,
    For,
    In,
    Break,
    Continue,
    Goto,
    Return,
    Global,
    Import,
    From,
    As,
    Is,
    And,
    Or,
    Func,
    Null,
    True,
    False,

    // punctuation
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    LParen,
    RParen,
    Comma,
    Semi,
    Colon,
    Point,
    VBar,

    // operators
    Assign,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Not,
    Less,
    Greater,
    Equal,
    NotEqual,
    LessEqual,
    GreaterEqual,
    AddAssign,
    SubAssign,
    MulAssign,
    DivAssign,
    ModAssign,

    // literals
    Integer(i64),
    Float(f64),
    String(String),
    Identifier(String),

    Eof,
}

impl TokenKind {
    fn reserved_word(ident: &str) -> Option<TokenKind> {
        Some(match ident {
            "if" => TokenKind::If,
            "else" => TokenKind::Else,
            "loop" => TokenKind::Loop,
            "while" => TokenKind::While,
            "for" => TokenKind::For,
            "in" => TokenKind::In,
            "break" => TokenKind::Break,
            "continue" => TokenKind::Continue,
            "goto" => TokenKind::Goto,
            "return" => TokenKind::Return,
            "global" => TokenKind::Global,
            "import" => TokenKind::Import,
            "from" => TokenKind::From,
            "as" => TokenKind::As,
            "is" => TokenKind::Is,
            "and" => TokenKind::And,
            "or" => TokenKind::Or,
            "func" => TokenKind::Func,
            "null" => TokenKind::Null,
            "true" => TokenKind::True,
            "false" => TokenKind::False,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub start: Location,
    pub end: Location,
}

fn escape_sequence(c: char) -> Option<char> {
    Some(match c {
        '\\' => '\\',
        '\'' => '\'',
        '"' => '"',
        'a' => '\u{07}',
        'b' => '\u{08}',
        'f' => '\u{0C}',
        'n' => '\n',
        'r' => '\r',
        't' => '\t',
        'v' => '\u{0B}',
        _ => return None,
    })
}

/// Scans Lucy source text into a token stream, one token at a time.
pub struct Lexer {
    chars: Vec<char>,
    position: usize,
    line: usize,
    column: usize,
}

impl Lexer {
    pub fn new(source: &str) -> Self {
        Lexer {
            chars: source.chars().collect(),
            position: 0,
            line: 1,
            column: 1,
        }
    }

    fn current(&self) -> Option<char> {
        self.chars.get(self.position).copied()
    }

    fn peek_next(&self) -> Option<char> {
        self.chars.get(self.position + 1).copied()
    }

    fn location(&self) -> Location {
        Location { line: self.line, column: self.column, offset: self.position }
    }

    fn advance(&mut self) {
        if self.current() == Some('\n') {
            self.line += 1;
            self.column = 0;
        }
        self.position += 1;
        self.column += 1;
    }

    /// Returns the next token, or a `LEXER_ERROR` on an unrecognized character.
    /// Calling this again after `Eof` simply returns `Eof` again.
    pub fn get_next_token(&mut self) -> Result<Token, LucyError> {
        loop {
            let start = self.location();
            let Some(c) = self.current() else {
                return Ok(Token { kind: TokenKind::Eof, start, end: self.location() });
            };

            if c.is_whitespace() {
                while matches!(self.current(), Some(ch) if ch.is_whitespace()) {
                    self.advance();
                }
                continue;
            }

            if c == '/' && self.peek_next() == Some('/') {
                while matches!(self.current(), Some(ch) if ch != '\n') {
                    self.advance();
                }
                continue;
            }

            if c.is_ascii_digit() {
                return Ok(self.read_number(start));
            }

            if c.is_alphabetic() || c == '_' {
                return Ok(self.read_identifier(start));
            }

            if c == '"' || c == '\'' {
                return self.read_string(start, c);
            }

            return self.read_symbol(start, c);
        }
    }

    fn read_number(&mut self, start: Location) -> Token {
        let mut text = String::new();
        while matches!(self.current(), Some(ch) if ch.is_ascii_digit()) {
            text.push(self.current().unwrap());
            self.advance();
        }
        if self.current() == Some('.') {
            text.push('.');
            self.advance();
            while matches!(self.current(), Some(ch) if ch.is_ascii_digit()) {
                text.push(self.current().unwrap());
                self.advance();
            }
            let value: f64 = text.parse().unwrap_or(0.0);
            return Token { kind: TokenKind::Float(value), start, end: self.location() };
        }
        let value: i64 = text.parse().unwrap_or(0);
        Token { kind: TokenKind::Integer(value), start, end: self.location() }
    }

    fn read_identifier(&mut self, start: Location) -> Token {
        let mut text = String::new();
        while matches!(self.current(), Some(ch) if ch.is_alphanumeric() || ch == '_') {
            text.push(self.current().unwrap());
            self.advance();
        }
        let kind = TokenKind::reserved_word(&text).unwrap_or(TokenKind::Identifier(text));
        Token { kind, start, end: self.location() }
    }

    fn read_string(&mut self, start: Location, quote: char) -> Result<Token, LucyError> {
        self.advance();
        let mut text = String::new();
        loop {
            match self.current() {
                None => {
                    return Err(LucyError::lexer_error(
                        "unterminated string literal".to_string(),
                        SourceLocation::from_location(start),
                    ));
                }
                Some(ch) if ch == quote => {
                    self.advance();
                    break;
                }
                Some('\\') => {
                    self.advance();
                    match self.current() {
                        Some(esc) => {
                            match escape_sequence(esc) {
                                Some(mapped) => text.push(mapped),
                                None => {
                                    text.push('\\');
                                    text.push(esc);
                                }
                            }
                            self.advance();
                        }
                        None => {
                            return Err(LucyError::lexer_error(
                                "unterminated string literal".to_string(),
                                SourceLocation::from_location(start),
                            ));
                        }
                    }
                }
                Some(ch) => {
                    text.push(ch);
                    self.advance();
                }
            }
        }
        Ok(Token { kind: TokenKind::String(text), start, end: self.location() })
    }

    fn read_symbol(&mut self, start: Location, c: char) -> Result<Token, LucyError> {
        if let Some(next) = self.peek_next() {
            let two: String = [c, next].iter().collect();
            let kind = match two.as_str() {
                "==" => Some(TokenKind::Equal),
                "!=" => Some(TokenKind::NotEqual),
                "<=" => Some(TokenKind::LessEqual),
                ">=" => Some(TokenKind::GreaterEqual),
                "+=" => Some(TokenKind::AddAssign),
                "-=" => Some(TokenKind::SubAssign),
                "*=" => Some(TokenKind::MulAssign),
                "/=" => Some(TokenKind::DivAssign),
                "%=" => Some(TokenKind::ModAssign),
                _ => None,
            };
            if let Some(kind) = kind {
                self.advance();
                self.advance();
                return Ok(Token { kind, start, end: self.location() });
            }
        }

        let kind = match c {
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            ',' => TokenKind::Comma,
            ';' => TokenKind::Semi,
            ':' => TokenKind::Colon,
            '.' => TokenKind::Point,
            '|' => TokenKind::VBar,
            '=' => TokenKind::Assign,
            '+' => TokenKind::Add,
            '-' => TokenKind::Sub,
            '*' => TokenKind::Mul,
            '/' => TokenKind::Div,
            '%' => TokenKind::Mod,
            '!' => TokenKind::Not,
            '<' => TokenKind::Less,
            '>' => TokenKind::Greater,
            other => {
                return Err(LucyError::lexer_error(
                    format!("unexpected character '{other}'"),
                    SourceLocation::from_location(start),
                ));
            }
        };
        self.advance();
        Ok(Token { kind, start, end: self.location() })
    }
}

/// Tokenizes an entire source string, stopping after the first `Eof` token.
pub fn tokenize(source: &str) -> Result<Vec<Token>, LucyError> {
    let mut lexer = Lexer::new(source);
    let mut tokens = Vec::new();
    loop {
        let token = lexer.get_next_token()?;
        let is_eof = token.kind == TokenKind::Eof;
        tokens.push(token);
        if is_eof {
            break;
        }
    }
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizes_scenario_one() {
        let tokens = tokenize("a = 0; i = 0;\nwhile i < 10 { a = a + i; }").unwrap();
        assert_eq!(tokens.first().unwrap().kind, TokenKind::Identifier("a".to_string()));
        assert!(tokens.iter().any(|t| t.kind == TokenKind::While));
        assert!(tokens.iter().any(|t| t.kind == TokenKind::Less));
        assert_eq!(tokens.last().unwrap().kind, TokenKind::Eof);
    }

    #[test]
    fn distinguishes_int_and_float() {
        let tokens = tokenize("1 1.5").unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Integer(1));
        assert_eq!(tokens[1].kind, TokenKind::Float(1.5));
    }

    #[test]
    fn reads_escaped_string() {
        let tokens = tokenize("\"a\\nb\"").unwrap();
        assert_eq!(tokens[0].kind, TokenKind::String("a\nb".to_string()));
    }

    #[test]
    fn reads_closure_pipes_and_compound_assign() {
        let tokens = tokenize("|v| { c += v; }").unwrap();
        assert_eq!(tokens[0].kind, TokenKind::VBar);
        assert!(tokens.iter().any(|t| t.kind == TokenKind::AddAssign));
    }

    #[test]
    fn skips_comments() {
        let tokens = tokenize("// comment\n1").unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Integer(1));
    }

    #[test]
    fn rejects_unknown_character() {
        assert!(tokenize("a ~ b").is_err());
    }
}
