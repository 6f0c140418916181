// Character stream -> token stream. Single pass, two-character lookahead,
// no backtracking over already-emitted tokens (spec section 4.1).

use crate::error::LexerError;
use crate::token::{Token, TokenKind, KEYWORDS};

pub struct Lexer {
    source: Vec<char>,
    start: usize,
    current: usize,
    line: u32,
    tokens: Vec<Token>,
}

type LexResult<T> = Result<T, LexerError>;

impl Lexer {
    pub fn new(source: &str) -> Self {
        Lexer {
            source: source.chars().collect(),
            start: 0,
            current: 0,
            line: 1,
            tokens: Vec::new(),
        }
    }

    pub fn scan_tokens(mut self) -> LexResult<Vec<Token>> {
        while !self.is_at_end() {
            self.start = self.current;
            self.scan_token()?;
        }
        self.tokens.push(Token::new(TokenKind::Eof, "", self.line));
        Ok(self.tokens)
    }

    fn scan_token(&mut self) -> LexResult<()> {
        use TokenKind::*;
        let c = self.advance();
        match c {
            '(' => self.add_token(LeftParen),
            ')' => self.add_token(RightParen),
            '{' => self.add_token(LeftBrace),
            '}' => self.add_token(RightBrace),
            '[' => self.add_token(LeftBracket),
            ']' => self.add_token(RightBracket),
            ',' => self.add_token(Comma),
            '.' => self.add_token(Dot),
            '@' => self.add_token(At),
            '~' => self.add_token(Tilde),
            ';' => self.add_token(Semicolon),
            '+' => {
                let k = if self.match_char('=') { PlusEqual } else { Plus };
                self.add_token(k);
            }
            '-' => {
                let k = if self.match_char('=') {
                    MinusEqual
                } else if self.match_char('>') {
                    Arrow
                } else {
                    Minus
                };
                self.add_token(k);
            }
            '*' => {
                let k = if self.match_char('=') { StarEqual } else { Star };
                self.add_token(k);
            }
            '%' => {
                let k = if self.match_char('=') { PercentEqual } else { Percent };
                self.add_token(k);
            }
            ':' => {
                let k = if self.match_char(':') { ScopeResolution } else { Colon };
                self.add_token(k);
            }
            '!' => {
                let k = if self.match_char('=') { BangEqual } else { Bang };
                self.add_token(k);
            }
            '=' => {
                let k = if self.match_char('=') { EqualEqual } else { Equal };
                self.add_token(k);
            }
            '<' => {
                let k = if self.match_char('=') {
                    LessEqual
                } else if self.match_char('<') {
                    ShiftLeft
                } else {
                    Less
                };
                self.add_token(k);
            }
            '>' => {
                let k = if self.match_char('=') {
                    GreaterEqual
                } else if self.match_char('>') {
                    ShiftRight
                } else {
                    Greater
                };
                self.add_token(k);
            }
            '&' => {
                let k = if self.match_char('=') { BitAndEqual } else { BitAnd };
                self.add_token(k);
            }
            '|' => {
                let k = if self.match_char('=') { BitOrEqual } else { BitOr };
                self.add_token(k);
            }
            '^' => {
                let k = if self.match_char('=') { XorEqual } else { Xor };
                self.add_token(k);
            }
            '/' => {
                if self.match_char('/') {
                    while self.peek() != '\n' && !self.is_at_end() {
                        self.advance();
                    }
                } else if self.match_char('*') {
                    self.block_comment()?;
                } else if self.match_char('=') {
                    self.add_token(SlashEqual);
                } else {
                    self.add_token(Slash);
                }
            }
            ' ' | '\r' | '\t' => {}
            '\n' => self.line += 1,
            '"' => self.string()?,
            '\'' => self.character()?,
            'i' if self.peek() == '"' => {
                self.advance();
                self.interpolated_string()?;
            }
            c if c.is_ascii_digit() => self.number(),
            c if is_alpha(c) => self.identifier(),
            other => {
                return Err(LexerError::new(format!("unexpected character: {}", other), self.line));
            }
        }
        Ok(())
    }

    fn block_comment(&mut self) -> LexResult<()> {
        while !self.is_at_end() && !(self.peek() == '*' && self.peek_next() == '/') {
            if self.peek() == '\n' {
                self.line += 1;
            }
            self.advance();
        }
        if self.is_at_end() {
            return Err(LexerError::new("unterminated block comment", self.line));
        }
        self.advance();
        self.advance();
        Ok(())
    }

    fn string(&mut self) -> LexResult<()> {
        let mut value = std::string::String::new();
        while self.peek() != '"' && !self.is_at_end() {
            if self.peek() == '\n' {
                self.line += 1;
            } else if self.peek() == '\\' {
                self.advance();
                value.push(self.process_escape_sequence()?);
                continue;
            }
            value.push(self.advance());
        }
        if self.is_at_end() {
            return Err(LexerError::new("unterminated string", self.line));
        }
        self.advance();
        self.tokens.push(Token::new(TokenKind::String, format!("\"{}\"", value), self.line));
        Ok(())
    }

    fn interpolated_string(&mut self) -> LexResult<()> {
        let mut value = std::string::String::new();
        while self.peek() != '"' && !self.is_at_end() {
            if self.peek() == '\n' {
                self.line += 1;
            } else if self.peek() == '\\' {
                self.advance();
                value.push(self.process_escape_sequence()?);
                continue;
            }
            value.push(self.advance());
        }
        if self.is_at_end() {
            return Err(LexerError::new("unterminated interpolated string", self.line));
        }
        self.advance();
        self.tokens.push(Token::new(
            TokenKind::InterpolatedStringStart,
            format!("i\"{}\"", value),
            self.line,
        ));
        Ok(())
    }

    fn character(&mut self) -> LexResult<()> {
        if self.peek() == '\'' || self.peek() == '\n' {
            return Err(LexerError::new("empty character literal", self.line));
        }
        let value = if self.peek() == '\\' {
            self.advance();
            self.process_escape_sequence()?
        } else {
            self.advance()
        };

        if self.peek() != '\'' {
            // Multi-character literal: report, then resynchronize to the
            // next quote or newline without emitting a token.
            while self.peek() != '\'' && !self.is_at_end() && self.peek() != '\n' {
                self.advance();
            }
            if self.is_at_end() || self.peek() == '\n' {
                return Err(LexerError::new("unterminated character literal", self.line));
            }
            self.advance();
            return Err(LexerError::new(
                "character literal must contain exactly one character",
                self.line,
            ));
        }

        if self.is_at_end() {
            return Err(LexerError::new("unterminated character literal", self.line));
        }
        self.advance();
        self.tokens.push(Token::new(TokenKind::Char, format!("'{}'", value), self.line));
        Ok(())
    }

    fn number(&mut self) {
        // The leading digit was already consumed by scan_token's advance(),
        // so the prefix check is against the start-of-lexeme char, not peek().
        if self.source[self.start] == '0'
            && (matches!(self.peek(), 'x' | 'X' | 'b' | 'B') || self.peek().is_ascii_digit())
        {
            let prefix = self.advance();
            self.special_number(prefix);
            return;
        }

        while self.peek().is_ascii_digit() {
            self.advance();
        }

        if self.peek() == '.' && self.peek_next().is_ascii_digit() {
            self.advance();
            while self.peek().is_ascii_digit() {
                self.advance();
            }
            if self.peek() == 'e' || self.peek() == 'E' {
                self.advance();
                if self.peek() == '+' || self.peek() == '-' {
                    self.advance();
                }
                while self.peek().is_ascii_digit() {
                    self.advance();
                }
            }
            if matches!(self.peek(), 'f' | 'F' | 'l' | 'L') {
                self.advance();
            }
            self.add_token(TokenKind::Float);
        } else {
            self.consume_integer_suffix();
            self.add_token(TokenKind::Integer);
        }
    }

    fn special_number(&mut self, prefix: char) {
        match prefix {
            'x' | 'X' => {
                while self.peek().is_ascii_hexdigit() {
                    self.advance();
                }
            }
            'b' | 'B' => {
                while self.peek() == '0' || self.peek() == '1' {
                    self.advance();
                }
            }
            _ => {
                while self.peek().is_ascii_digit() && self.peek() < '8' {
                    self.advance();
                }
            }
        }
        self.consume_integer_suffix();
        self.add_token(TokenKind::Integer);
    }

    fn consume_integer_suffix(&mut self) {
        if matches!(self.peek(), 'u' | 'U') {
            self.advance();
            if matches!(self.peek(), 'l' | 'L') {
                self.advance();
                if matches!(self.peek(), 'l' | 'L') {
                    self.advance();
                }
            }
        } else if matches!(self.peek(), 'l' | 'L') {
            self.advance();
            if matches!(self.peek(), 'l' | 'L') {
                self.advance();
            }
            if matches!(self.peek(), 'u' | 'U') {
                self.advance();
            }
        }
    }

    fn identifier(&mut self) {
        while is_alpha_numeric(self.peek()) {
            self.advance();
        }
        let text: std::string::String = self.source[self.start..self.current].iter().collect();
        let kind = KEYWORDS.get(text.as_str()).copied().unwrap_or(TokenKind::Identifier);
        self.add_token(kind);
    }

    fn process_escape_sequence(&mut self) -> LexResult<char> {
        match self.peek() {
            'n' => { self.advance(); Ok('\n') }
            'r' => { self.advance(); Ok('\r') }
            't' => { self.advance(); Ok('\t') }
            '\\' => { self.advance(); Ok('\\') }
            '\'' => { self.advance(); Ok('\'') }
            '"' => { self.advance(); Ok('"') }
            '0' => { self.advance(); Ok('\0') }
            'x' => {
                self.advance();
                if !self.peek().is_ascii_hexdigit() || !self.peek_next().is_ascii_hexdigit() {
                    return Err(LexerError::new("invalid hexadecimal escape sequence", self.line));
                }
                let mut hex = std::string::String::new();
                hex.push(self.advance());
                hex.push(self.advance());
                let byte = u8::from_str_radix(&hex, 16).unwrap();
                Ok(byte as char)
            }
            _ => Err(LexerError::new("invalid escape sequence", self.line)),
        }
    }

    fn is_at_end(&self) -> bool {
        self.current >= self.source.len()
    }

    fn advance(&mut self) -> char {
        let c = self.source[self.current];
        self.current += 1;
        c
    }

    fn peek(&self) -> char {
        if self.is_at_end() {
            '\0'
        } else {
            self.source[self.current]
        }
    }

    fn peek_next(&self) -> char {
        if self.current + 1 >= self.source.len() {
            '\0'
        } else {
            self.source[self.current + 1]
        }
    }

    fn match_char(&mut self, expected: char) -> bool {
        if self.is_at_end() || self.source[self.current] != expected {
            return false;
        }
        self.current += 1;
        true
    }

    fn add_token(&mut self, kind: TokenKind) {
        let text: std::string::String = self.source[self.start..self.current].iter().collect();
        self.tokens.push(Token::new(kind, text, self.line));
    }
}

fn is_alpha(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_alpha_numeric(c: char) -> bool {
    is_alpha(c) || c.is_ascii_digit()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::TokenKind::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        Lexer::new(src).scan_tokens().unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn lex_simple_tokens() {
        let tokens = Lexer::new("( ) { }").scan_tokens().unwrap();
        assert_eq!(
            tokens.iter().map(|t| t.kind).collect::<Vec<_>>(),
            vec![LeftParen, RightParen, LeftBrace, RightBrace, Eof]
        );
        assert!(tokens.iter().all(|t| t.line == 1));
    }

    #[test]
    fn lex_numeric_variants() {
        let tokens = Lexer::new("42 0xFF 0b1010 3.14 1e-5").scan_tokens().unwrap();
        let lexemes: Vec<&str> = tokens.iter().map(|t| t.lexeme.as_str()).collect();
        assert_eq!(
            tokens.iter().map(|t| t.kind).collect::<Vec<_>>(),
            vec![Integer, Integer, Integer, Float, Float, Eof]
        );
        assert_eq!(&lexemes[..5], &["42", "0xFF", "0b1010", "3.14", "1e-5"]);
    }

    #[test]
    fn lex_two_char_operators() {
        assert_eq!(kinds("== != <= >= << >> -> ::"), vec![
            EqualEqual, BangEqual, LessEqual, GreaterEqual, ShiftLeft, ShiftRight, Arrow,
            ScopeResolution, Eof
        ]);
    }

    #[test]
    fn lex_keywords_vs_identifiers() {
        assert_eq!(kinds("class foo"), vec![Class, Identifier, Eof]);
    }

    #[test]
    fn lex_string_with_escapes() {
        let tokens = Lexer::new(r#""a\nb""#).scan_tokens().unwrap();
        assert_eq!(tokens[0].kind, String);
        assert_eq!(tokens[0].lexeme, "\"a\nb\"");
    }

    #[test]
    fn lex_interpolated_string_start() {
        let tokens = Lexer::new(r#"i"x={a}""#).scan_tokens().unwrap();
        assert_eq!(tokens[0].kind, InterpolatedStringStart);
    }

    #[test]
    fn lex_unterminated_string_errors() {
        let err = Lexer::new("\"abc").scan_tokens().unwrap_err();
        assert_eq!(err.line, 1);
    }

    #[test]
    fn lex_block_comment_tracks_lines() {
        let tokens = Lexer::new("/* a\nb */ 1").scan_tokens().unwrap();
        assert_eq!(tokens[0].kind, Integer);
        assert_eq!(tokens[0].line, 2);
    }

    #[test]
    fn lex_lock_keywords() {
        assert_eq!(kinds("lock __lock lock__"), vec![Lock, DunderLock, LockDunder, Eof]);
    }
}
