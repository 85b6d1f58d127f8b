//! Source text to tokens.

use super::error::{ParseError, ParseErrorKind, ParseResult};
use super::token::{Span, Token, TokenKind};

/// Tokenizer for the supported Python subset.
///
/// Produces `Indent`/`Dedent`/`Newline` tokens from an indentation stack the
/// way the Python tokenizer does: blank and comment-only lines are skipped
/// and newlines inside brackets are ignored.
pub struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    column: usize,
    indent_stack: Vec<usize>,
    paren_depth: usize,
    at_line_start: bool,
    tokens: Vec<Token>,
}

impl Lexer {
    /// Creates a lexer over `input`.
    pub fn new(input: &str) -> Self {
        Self {
            chars: input.chars().collect(),
            pos: 0,
            line: 1,
            column: 0,
            indent_stack: vec![0],
            paren_depth: 0,
            at_line_start: true,
            tokens: Vec::new(),
        }
    }

    /// Consumes the lexer and returns every token, ending with `Eof`.
    pub fn tokenize(mut self) -> ParseResult<Vec<Token>> {
        loop {
            if self.at_line_start && self.paren_depth == 0 {
                self.at_line_start = false;
                if !self.handle_indentation()? {
                    continue;
                }
            }

            let Some(ch) = self.peek() else {
                break;
            };
            let span = self.span();

            match ch {
                ' ' | '\r' | '\x0c' => {
                    self.advance();
                }
                '\t' => {
                    self.advance();
                }
                '\\' if self.peek_at(1) == Some('\n') => {
                    self.advance();
                    self.advance_newline();
                }
                '#' => self.skip_comment(),
                '\n' => {
                    self.advance_newline();
                    if self.paren_depth == 0 {
                        self.push_newline(span);
                        self.at_line_start = true;
                    }
                }
                '"' | '\'' => {
                    let value = self.read_string(ch, false)?;
                    self.tokens.push(Token::new(TokenKind::Str(value), span));
                }
                c if c.is_ascii_digit() => self.read_number(span)?,
                '.' if self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) => self.read_number(span)?,
                c if c.is_alphabetic() || c == '_' => self.read_identifier(span)?,
                _ => self.read_operator(ch, span)?,
            }
        }

        let span = self.span();
        self.push_newline(span);
        while self.indent_stack.len() > 1 {
            self.indent_stack.pop();
            self.tokens.push(Token::new(TokenKind::Dedent, span));
        }
        self.tokens.push(Token::new(TokenKind::Eof, span));
        Ok(self.tokens)
    }

    /// Measures the indentation of the current line and emits indentation
    /// tokens. Returns false if the line was blank and has been skipped.
    fn handle_indentation(&mut self) -> ParseResult<bool> {
        let mut width = 0;
        while let Some(c) = self.peek() {
            match c {
                ' ' => {
                    width += 1;
                    self.advance();
                }
                '\t' => {
                    return Err(ParseError::new(ParseErrorKind::TabIndentation, self.span()));
                }
                _ => break,
            }
        }

        match self.peek() {
            None => return Ok(true),
            Some('\n') => {
                self.advance_newline();
                self.at_line_start = true;
                return Ok(false);
            }
            Some('\r') if self.peek_at(1) == Some('\n') => {
                self.advance();
                self.advance_newline();
                self.at_line_start = true;
                return Ok(false);
            }
            Some('#') => {
                self.skip_comment();
                if self.peek() == Some('\n') {
                    self.advance_newline();
                }
                self.at_line_start = true;
                return Ok(false);
            }
            _ => {}
        }

        let span = self.span();
        let current = *self.indent_stack.last().unwrap_or(&0);
        if width > current {
            self.indent_stack.push(width);
            self.tokens.push(Token::new(TokenKind::Indent, span));
        } else if width < current {
            while let Some(&top) = self.indent_stack.last() {
                if top > width {
                    self.indent_stack.pop();
                    self.tokens.push(Token::new(TokenKind::Dedent, span));
                } else {
                    break;
                }
            }
            if self.indent_stack.last() != Some(&width) {
                return Err(ParseError::new(ParseErrorKind::InvalidDedent(width), span));
            }
        }
        Ok(true)
    }

    fn push_newline(&mut self, span: Span) {
        let needs_newline = matches!(
            self.tokens.last().map(|t| &t.kind),
            Some(kind) if !matches!(kind, TokenKind::Newline | TokenKind::Indent | TokenKind::Dedent)
        );
        if needs_newline {
            self.tokens.push(Token::new(TokenKind::Newline, span));
        }
    }

    fn read_identifier(&mut self, span: Span) -> ParseResult<()> {
        let mut ident = String::new();
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' {
                ident.push(c);
                self.advance();
            } else {
                break;
            }
        }

        // String prefixes: u'', b'', r''
        if let Some(quote @ ('"' | '\'')) = self.peek() {
            let lower = ident.to_ascii_lowercase();
            if matches!(lower.as_str(), "u" | "b" | "r" | "ur" | "br" | "rb") {
                let raw = lower.contains('r');
                let value = self.read_string(quote, raw)?;
                self.tokens.push(Token::new(TokenKind::Str(value), span));
                return Ok(());
            }
        }

        let kind = TokenKind::keyword(&ident).unwrap_or(TokenKind::Name(ident));
        self.tokens.push(Token::new(kind, span));
        Ok(())
    }

    fn read_number(&mut self, span: Span) -> ParseResult<()> {
        let mut literal = String::new();
        let mut is_float = false;

        while let Some(c) = self.peek() {
            if c.is_ascii_digit() || c == '_' {
                literal.push(c);
                self.advance();
            } else if c == '.' && !is_float {
                is_float = true;
                literal.push(c);
                self.advance();
            } else if (c == 'e' || c == 'E')
                && self
                    .peek_at(1)
                    .is_some_and(|n| n.is_ascii_digit() || n == '-' || n == '+')
            {
                is_float = true;
                literal.push(c);
                self.advance();
                if let Some(sign @ ('-' | '+')) = self.peek() {
                    literal.push(sign);
                    self.advance();
                }
            } else {
                break;
            }
        }

        // Python 2 long suffix
        if matches!(self.peek(), Some('L' | 'l')) && !is_float {
            self.advance();
        }

        let cleaned: String = literal.chars().filter(|&c| c != '_').collect();
        let kind = if is_float {
            cleaned
                .parse::<f64>()
                .map(TokenKind::Float)
                .map_err(|_| ParseError::new(ParseErrorKind::InvalidNumber(literal.clone()), span))?
        } else {
            cleaned
                .parse::<i64>()
                .map(TokenKind::Int)
                .map_err(|_| ParseError::new(ParseErrorKind::InvalidNumber(literal.clone()), span))?
        };
        self.tokens.push(Token::new(kind, span));
        Ok(())
    }

    fn read_string(&mut self, quote: char, raw: bool) -> ParseResult<String> {
        let start = self.span();
        let triple = self.peek_at(1) == Some(quote) && self.peek_at(2) == Some(quote);
        let delimiter_len = if triple { 3 } else { 1 };
        for _ in 0..delimiter_len {
            self.advance();
        }

        let mut value = String::new();
        loop {
            let Some(c) = self.peek() else {
                return Err(ParseError::new(ParseErrorKind::UnterminatedString, start));
            };

            if c == quote {
                if !triple {
                    self.advance();
                    return Ok(value);
                }
                if self.peek_at(1) == Some(quote) && self.peek_at(2) == Some(quote) {
                    self.advance();
                    self.advance();
                    self.advance();
                    return Ok(value);
                }
                value.push(c);
                self.advance();
                continue;
            }

            match c {
                '\n' if !triple => {
                    return Err(ParseError::new(ParseErrorKind::UnterminatedString, start));
                }
                '\n' => {
                    value.push('\n');
                    self.advance_newline();
                }
                '\\' if !raw => {
                    self.advance();
                    let Some(escaped) = self.peek() else {
                        return Err(ParseError::new(ParseErrorKind::UnterminatedString, start));
                    };
                    match escaped {
                        'n' => value.push('\n'),
                        't' => value.push('\t'),
                        'r' => value.push('\r'),
                        '0' => value.push('\0'),
                        'a' => value.push('\x07'),
                        'b' => value.push('\x08'),
                        'f' => value.push('\x0c'),
                        'v' => value.push('\x0b'),
                        '\\' => value.push('\\'),
                        '\'' => value.push('\''),
                        '"' => value.push('"'),
                        '\n' => {
                            self.advance_newline();
                            continue;
                        }
                        'x' => {
                            let hex: String = [self.peek_at(1), self.peek_at(2)]
                                .iter()
                                .flatten()
                                .collect();
                            match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                                Some(decoded) if hex.len() == 2 => {
                                    value.push(decoded);
                                    self.advance();
                                    self.advance();
                                }
                                _ => {
                                    value.push('\\');
                                    value.push('x');
                                }
                            }
                        }
                        other => {
                            value.push('\\');
                            value.push(other);
                        }
                    }
                    self.advance();
                }
                _ => {
                    value.push(c);
                    self.advance();
                }
            }
        }
    }

    fn read_operator(&mut self, ch: char, span: Span) -> ParseResult<()> {
        let next = self.peek_at(1);
        let (kind, len) = match (ch, next) {
            ('*', Some('*')) => (TokenKind::DoubleStar, 2),
            ('*', Some('=')) => (TokenKind::StarAssign, 2),
            ('*', _) => (TokenKind::Star, 1),
            ('/', Some('/')) => (TokenKind::DoubleSlash, 2),
            ('/', Some('=')) => (TokenKind::SlashAssign, 2),
            ('/', _) => (TokenKind::Slash, 1),
            ('+', Some('=')) => (TokenKind::PlusAssign, 2),
            ('+', _) => (TokenKind::Plus, 1),
            ('-', Some('=')) => (TokenKind::MinusAssign, 2),
            ('-', _) => (TokenKind::Minus, 1),
            ('%', Some('=')) => (TokenKind::PercentAssign, 2),
            ('%', _) => (TokenKind::Percent, 1),
            ('=', Some('=')) => (TokenKind::EqEq, 2),
            ('=', _) => (TokenKind::Assign, 1),
            ('!', Some('=')) => (TokenKind::NotEq, 2),
            ('<', Some('=')) => (TokenKind::LessEq, 2),
            ('<', Some('>')) => (TokenKind::NotEq, 2),
            ('<', _) => (TokenKind::Less, 1),
            ('>', Some('=')) => (TokenKind::GreaterEq, 2),
            ('>', _) => (TokenKind::Greater, 1),
            ('~', _) => (TokenKind::Tilde, 1),
            ('(', _) => (TokenKind::LParen, 1),
            (')', _) => (TokenKind::RParen, 1),
            ('[', _) => (TokenKind::LBracket, 1),
            (']', _) => (TokenKind::RBracket, 1),
            ('{', _) => (TokenKind::LBrace, 1),
            ('}', _) => (TokenKind::RBrace, 1),
            (',', _) => (TokenKind::Comma, 1),
            (':', _) => (TokenKind::Colon, 1),
            ('.', _) => (TokenKind::Dot, 1),
            ('@', _) => (TokenKind::At, 1),
            _ => {
                return Err(ParseError::new(ParseErrorKind::UnexpectedCharacter(ch), span));
            }
        };

        match kind {
            TokenKind::LParen | TokenKind::LBracket | TokenKind::LBrace => self.paren_depth += 1,
            TokenKind::RParen | TokenKind::RBracket | TokenKind::RBrace => {
                self.paren_depth = self.paren_depth.saturating_sub(1)
            }
            _ => {}
        }

        for _ in 0..len {
            self.advance();
        }
        self.tokens.push(Token::new(kind, span));
        Ok(())
    }

    fn skip_comment(&mut self) {
        while let Some(c) = self.peek() {
            if c == '\n' {
                break;
            }
            self.advance();
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn advance(&mut self) {
        self.pos += 1;
        self.column += 1;
    }

    fn advance_newline(&mut self) {
        self.pos += 1;
        self.line += 1;
        self.column = 0;
    }

    fn span(&self) -> Span {
        Span {
            line: self.line,
            column: self.column,
        }
    }
}

/// Tokenizes `input` into a flat token list ending with `Eof`.
pub fn tokenize(input: &str) -> ParseResult<Vec<Token>> {
    Lexer::new(input).tokenize()
}
