//! Lexer/Scanner for Vesper source code.

use crate::error::LexerError;
use crate::lexer::token::{Token, TokenKind};
use crate::span::Span;

/// The lexer transforms source code into a stream of tokens.
///
/// Tokens are produced one at a time via [`Scanner::scan_token`]; the
/// compiler consumes them in order with a single token of lookahead.
pub struct Scanner<'a> {
    source: &'a str,
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
    current_pos: usize,
    line: usize,
    column: usize,
    start_pos: usize,
    start_line: usize,
    start_column: usize,
}

impl<'a> Scanner<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.char_indices().peekable(),
            current_pos: 0,
            line: 1,
            column: 1,
            start_pos: 0,
            start_line: 1,
            start_column: 1,
        }
    }

    /// Scan all tokens from the source (mostly for tests; the compiler
    /// pulls tokens on demand).
    pub fn scan_tokens(&mut self) -> Result<Vec<Token>, LexerError> {
        let mut tokens = Vec::new();

        loop {
            let token = self.scan_token()?;
            let is_eof = token.kind == TokenKind::Eof;
            tokens.push(token);
            if is_eof {
                break;
            }
        }

        Ok(tokens)
    }

    /// Scan the next token.
    pub fn scan_token(&mut self) -> Result<Token, LexerError> {
        self.skip_whitespace_and_comments();
        self.mark_start();

        let Some((_, c)) = self.advance() else {
            return Ok(Token::eof(self.current_pos, self.line, self.column));
        };

        match c {
            '(' => Ok(self.make_token(TokenKind::LeftParen)),
            ')' => Ok(self.make_token(TokenKind::RightParen)),
            '{' => Ok(self.make_token(TokenKind::LeftBrace)),
            '}' => Ok(self.make_token(TokenKind::RightBrace)),
            ',' => Ok(self.make_token(TokenKind::Comma)),
            '.' => Ok(self.make_token(TokenKind::Dot)),
            ';' => Ok(self.make_token(TokenKind::Semicolon)),
            '+' => Ok(self.make_token(TokenKind::Plus)),
            '-' => Ok(self.make_token(TokenKind::Minus)),
            '*' => Ok(self.make_token(TokenKind::Star)),
            '/' => Ok(self.make_token(TokenKind::Slash)),
            '%' => Ok(self.make_token(TokenKind::Percent)),
            '=' => {
                if self.match_char('=') {
                    Ok(self.make_token(TokenKind::EqualEqual))
                } else {
                    Ok(self.make_token(TokenKind::Equal))
                }
            }
            '!' => {
                if self.match_char('=') {
                    Ok(self.make_token(TokenKind::BangEqual))
                } else {
                    Ok(self.make_token(TokenKind::Bang))
                }
            }
            '<' => {
                if self.match_char('=') {
                    Ok(self.make_token(TokenKind::LessEqual))
                } else {
                    Ok(self.make_token(TokenKind::Less))
                }
            }
            '>' => {
                if self.match_char('=') {
                    Ok(self.make_token(TokenKind::GreaterEqual))
                } else {
                    Ok(self.make_token(TokenKind::Greater))
                }
            }
            '"' => self.scan_string(),
            c if c.is_ascii_digit() => Ok(self.scan_number(c)),
            c if c.is_ascii_alphabetic() || c == '_' => Ok(self.scan_identifier(c)),
            c => Err(LexerError::unexpected_char(c, self.current_span())),
        }
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            match self.peek() {
                Some(' ') | Some('\r') | Some('\t') => {
                    self.advance();
                }
                Some('\n') => {
                    self.advance();
                }
                Some('/') if self.peek_at(1) == Some('/') => {
                    // Line comment
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                _ => break,
            }
        }
    }

    fn scan_string(&mut self) -> Result<Token, LexerError> {
        let content_start = self.current_pos;

        loop {
            match self.peek() {
                Some('"') => {
                    let content = self.source[content_start..self.current_pos].to_string();
                    self.advance();
                    return Ok(self.make_token(TokenKind::StringLiteral(content)));
                }
                Some(_) => {
                    self.advance();
                }
                None => {
                    return Err(LexerError::unterminated_string(self.current_span()));
                }
            }
        }
    }

    fn scan_number(&mut self, _first: char) -> Token {
        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            self.advance();
        }

        // A fractional part only counts if a digit follows the dot.
        if self.peek() == Some('.') && matches!(self.peek_at(1), Some(c) if c.is_ascii_digit()) {
            self.advance();
            while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                self.advance();
            }
        }

        let text = &self.source[self.start_pos..self.current_pos];
        let value: f64 = text.parse().unwrap_or(0.0);
        self.make_token(TokenKind::NumberLiteral(value))
    }

    fn scan_identifier(&mut self, _first: char) -> Token {
        while matches!(self.peek(), Some(c) if c.is_ascii_alphanumeric() || c == '_') {
            self.advance();
        }

        let text = &self.source[self.start_pos..self.current_pos];
        match TokenKind::keyword(text) {
            Some(kind) => self.make_token(kind),
            None => self.make_token(TokenKind::Identifier(text.to_string())),
        }
    }

    // --- Character helpers ---

    fn mark_start(&mut self) {
        self.start_pos = self.current_pos;
        self.start_line = self.line;
        self.start_column = self.column;
    }

    fn advance(&mut self) -> Option<(usize, char)> {
        let next = self.chars.next();
        if let Some((pos, c)) = next {
            self.current_pos = pos + c.len_utf8();
            if c == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
        next
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().map(|&(_, c)| c)
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.source[self.current_pos..].chars().nth(offset)
    }

    fn match_char(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn make_token(&self, kind: TokenKind) -> Token {
        Token::new(kind, self.current_span())
    }

    fn current_span(&self) -> Span {
        Span::new(
            self.start_pos,
            self.current_pos,
            self.start_line,
            self.start_column,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn kinds(source: &str) -> Vec<TokenKind> {
        Scanner::new(source)
            .scan_tokens()
            .expect("lexer error")
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn scans_punctuation_and_operators() {
        assert_eq!(
            kinds("(){},.;+-*/% ! != = == < <= > >="),
            vec![
                TokenKind::LeftParen,
                TokenKind::RightParen,
                TokenKind::LeftBrace,
                TokenKind::RightBrace,
                TokenKind::Comma,
                TokenKind::Dot,
                TokenKind::Semicolon,
                TokenKind::Plus,
                TokenKind::Minus,
                TokenKind::Star,
                TokenKind::Slash,
                TokenKind::Percent,
                TokenKind::Bang,
                TokenKind::BangEqual,
                TokenKind::Equal,
                TokenKind::EqualEqual,
                TokenKind::Less,
                TokenKind::LessEqual,
                TokenKind::Greater,
                TokenKind::GreaterEqual,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn scans_numbers() {
        assert_eq!(
            kinds("12 3.5 0.25"),
            vec![
                TokenKind::NumberLiteral(12.0),
                TokenKind::NumberLiteral(3.5),
                TokenKind::NumberLiteral(0.25),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn dot_without_digit_is_property_access() {
        assert_eq!(
            kinds("12.abs"),
            vec![
                TokenKind::NumberLiteral(12.0),
                TokenKind::Dot,
                TokenKind::Identifier("abs".to_string()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn scans_strings_and_tracks_lines() {
        let tokens = Scanner::new("\"hi\"\n\"there\"")
            .scan_tokens()
            .expect("lexer error");
        assert_eq!(tokens[0].kind, TokenKind::StringLiteral("hi".to_string()));
        assert_eq!(tokens[0].line(), 1);
        assert_eq!(
            tokens[1].kind,
            TokenKind::StringLiteral("there".to_string())
        );
        assert_eq!(tokens[1].line(), 2);
    }

    #[test]
    fn scans_keywords_and_identifiers() {
        assert_eq!(
            kinds("var x = nil; fun f class C super this"),
            vec![
                TokenKind::Var,
                TokenKind::Identifier("x".to_string()),
                TokenKind::Equal,
                TokenKind::Nil,
                TokenKind::Semicolon,
                TokenKind::Fun,
                TokenKind::Identifier("f".to_string()),
                TokenKind::Class,
                TokenKind::Identifier("C".to_string()),
                TokenKind::Super,
                TokenKind::This,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn comments_are_skipped() {
        assert_eq!(
            kinds("1 // the rest is ignored\n2"),
            vec![
                TokenKind::NumberLiteral(1.0),
                TokenKind::NumberLiteral(2.0),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn unterminated_string_errors() {
        let err = Scanner::new("\"oops").scan_tokens().unwrap_err();
        assert!(matches!(err, LexerError::UnterminatedString(_)));
    }
}
