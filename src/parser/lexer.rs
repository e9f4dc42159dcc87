//! Hand-rolled lexer for the AeroJS pipeline core (spec §4.1).
//!
//! `logos`'s regex-DFA model is a poor fit here: axis (1) of spec §4.1
//! ("whether `/` begins a regex or is division") and axis (3) ("inside a
//! template literal") both require a caller-maintained mode that a pure
//! token-regex can't express, and template interpolation needs the lexer to
//! recursively invoke itself on an embedded expression. So this lexer scans
//! the byte stream directly, the way `original_source`'s hand-written
//! scanner does, while keeping the teacher's `Token`/`Span`/`Interner`
//! plumbing and its eager-tokenize-then-parse pipeline shape. `logos` has no
//! remaining use in this crate and is dropped (see DESIGN.md).
//!
//! Tokens are produced into a growable buffer; `next()`/`peek(n)` index into
//! it and `save()`/`restore()` are plain cursor snapshots, giving the parser
//! the speculative-parse/backtrack support spec §4.1 and §4.2 require
//! (arrow-vs-parenthesized reinterpretation) without re-lexing.

use crate::diagnostics::{Diagnostic, ErrorCategory};
use crate::parser::interner::Interner;
use crate::parser::token::{NumberSubtype, Span, TemplatePart, Token, TokenFlags};

#[derive(Debug, Clone, PartialEq)]
pub enum LexError {
    UnexpectedCharacter { ch: char, span: Span },
    UnterminatedString { span: Span },
    UnterminatedTemplate { span: Span },
    UnterminatedRegex { span: Span },
    InvalidNumber { text: String, span: Span },
    InvalidEscape { escape: String, span: Span },
}

impl LexError {
    pub fn span(&self) -> Span {
        match self {
            LexError::UnexpectedCharacter { span, .. }
            | LexError::UnterminatedString { span }
            | LexError::UnterminatedTemplate { span }
            | LexError::UnterminatedRegex { span }
            | LexError::InvalidNumber { span, .. }
            | LexError::InvalidEscape { span, .. } => *span,
        }
    }

    pub fn message(&self) -> String {
        match self {
            LexError::UnexpectedCharacter { ch, .. } => format!("unexpected character '{ch}'"),
            LexError::UnterminatedString { .. } => "unterminated string literal".to_string(),
            LexError::UnterminatedTemplate { .. } => "unterminated template literal".to_string(),
            LexError::UnterminatedRegex { .. } => "unterminated regular expression literal".to_string(),
            LexError::InvalidNumber { text, .. } => format!("invalid numeric literal '{text}'"),
            LexError::InvalidEscape { escape, .. } => format!("invalid escape sequence '{escape}'"),
        }
    }

    pub fn to_diagnostic(&self) -> Diagnostic {
        Diagnostic::error("E0001", ErrorCategory::Syntax, self.message(), self.span())
    }
}

impl std::fmt::Display for LexError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for LexError {}

/// Opaque cursor snapshot for speculative (save/restore) lexing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LexerState {
    cursor: usize,
}

pub struct Lexer<'a> {
    source: &'a str,
    bytes: &'a [u8],
    pos: usize,
    interner: Interner,
    buffer: Vec<(Token, Span, TokenFlags)>,
    cursor: usize,
    errors: Vec<LexError>,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self::with_interner(source, Interner::new())
    }

    pub fn with_interner(source: &'a str, interner: Interner) -> Self {
        Lexer { source, bytes: source.as_bytes(), pos: 0, interner, buffer: Vec::new(), cursor: 0, errors: Vec::new() }
    }

    pub fn into_interner(self) -> Interner {
        self.interner
    }

    pub fn errors(&self) -> &[LexError] {
        &self.errors
    }

    pub fn save(&self) -> LexerState {
        LexerState { cursor: self.cursor }
    }

    pub fn restore(&mut self, state: LexerState) {
        self.cursor = state.cursor;
    }

    fn fill_to(&mut self, index: usize) {
        while self.buffer.len() <= index {
            let tok = self.scan_token();
            self.buffer.push(tok);
        }
    }

    /// Advances and returns the next token.
    pub fn next(&mut self) -> (Token, Span, TokenFlags) {
        self.fill_to(self.cursor);
        let tok = self.buffer[self.cursor].clone();
        self.cursor += 1;
        tok
    }

    /// Returns the `n`-th lookahead token (0 = the next token) without
    /// consuming it (spec §4.1's `peek(n)`).
    pub fn peek(&mut self, n: usize) -> &(Token, Span, TokenFlags) {
        self.fill_to(self.cursor + n);
        &self.buffer[self.cursor + n]
    }

    fn last_significant(&self) -> Option<&Token> {
        self.buffer.last().map(|(t, _, _)| t)
    }

    fn peek_byte(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn peek_byte_at(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let b = self.peek_byte()?;
        self.pos += 1;
        Some(b)
    }

    fn skip_trivia(&mut self) -> bool {
        let mut saw_newline = false;
        loop {
            match self.peek_byte() {
                Some(b' ') | Some(b'\t') | Some(b'\r') => {
                    self.pos += 1;
                }
                Some(b'\n') => {
                    saw_newline = true;
                    self.pos += 1;
                }
                Some(b'/') if self.peek_byte_at(1) == Some(b'/') => {
                    self.pos += 2;
                    while let Some(b) = self.peek_byte() {
                        if b == b'\n' {
                            break;
                        }
                        self.pos += 1;
                    }
                }
                Some(b'/') if self.peek_byte_at(1) == Some(b'*') => {
                    self.pos += 2;
                    while self.pos < self.bytes.len() {
                        if self.bytes[self.pos] == b'\n' {
                            saw_newline = true;
                        }
                        if self.bytes[self.pos] == b'*' && self.peek_byte_at(1) == Some(b'/') {
                            self.pos += 2;
                            break;
                        }
                        self.pos += 1;
                    }
                }
                _ => break,
            }
        }
        saw_newline
    }

    fn scan_token(&mut self) -> (Token, Span, TokenFlags) {
        let preceded_by_newline = self.skip_trivia();
        let start = self.pos;
        let Some(b) = self.peek_byte() else {
            return (Token::Eof, Span::new(start, start), TokenFlags { preceded_by_newline, ..Default::default() });
        };

        let (token, flags) = match b {
            b'"' | b'\'' => match self.scan_string(b) {
                Ok(sym) => (Token::StringLiteral(sym), TokenFlags::default()),
                Err(e) => {
                    self.errors.push(e);
                    (Token::Error("unterminated string".into()), TokenFlags::default())
                }
            },
            b'`' => match self.scan_template() {
                Ok(parts) => (Token::TemplateLiteral(parts), TokenFlags::default()),
                Err(e) => {
                    self.errors.push(e);
                    (Token::Error("unterminated template".into()), TokenFlags::default())
                }
            },
            b'/' if self.regex_allowed() => match self.scan_regex() {
                Ok((pattern, flags_sym)) => (Token::RegexLiteral { pattern, flags: flags_sym }, TokenFlags::default()),
                Err(e) => {
                    self.errors.push(e);
                    (Token::Error("unterminated regex".into()), TokenFlags::default())
                }
            },
            b'0'..=b'9' => (self.scan_number(), TokenFlags::default()),
            b'.' if self.peek_byte_at(1).is_some_and(|c| c.is_ascii_digit()) => (self.scan_number(), TokenFlags::default()),
            _ if is_id_start_byte(b) => (self.scan_identifier_or_keyword(), TokenFlags { identifier_has_escape: false, ..Default::default() }),
            b'\\' if self.peek_byte_at(1) == Some(b'u') => (self.scan_identifier_or_keyword(), TokenFlags { identifier_has_escape: true, ..Default::default() }),
            _ => (self.scan_punctuator(), TokenFlags::default()),
        };
        let flags = TokenFlags { preceded_by_newline, ..flags };
        (token, Span::new(start, self.pos), flags)
    }

    /// Axis (1): decides whether `/` starts a regex literal or is division,
    /// from the category of the last produced token (spec §4.1).
    fn regex_allowed(&self) -> bool {
        match self.last_significant() {
            None => true,
            Some(tok) => !tok.ends_expression(),
        }
    }

    fn scan_punctuator(&mut self) -> Token {
        macro_rules! two {
            ($second:expr, $two_tok:expr, $one_tok:expr) => {{
                self.pos += 1;
                if self.peek_byte() == Some($second) {
                    self.pos += 1;
                    $two_tok
                } else {
                    $one_tok
                }
            }};
        }
        let b = self.bytes[self.pos];
        match b {
            b'(' => {
                self.pos += 1;
                Token::LeftParen
            }
            b')' => {
                self.pos += 1;
                Token::RightParen
            }
            b'{' => {
                self.pos += 1;
                Token::LeftBrace
            }
            b'}' => {
                self.pos += 1;
                Token::RightBrace
            }
            b'[' => {
                self.pos += 1;
                Token::LeftBracket
            }
            b']' => {
                self.pos += 1;
                Token::RightBracket
            }
            b';' => {
                self.pos += 1;
                Token::Semicolon
            }
            b',' => {
                self.pos += 1;
                Token::Comma
            }
            b'~' => {
                self.pos += 1;
                Token::Tilde
            }
            b':' => {
                self.pos += 1;
                Token::Colon
            }
            b'+' => {
                self.pos += 1;
                if self.peek_byte() == Some(b'+') {
                    self.pos += 1;
                    Token::PlusPlus
                } else if self.peek_byte() == Some(b'=') {
                    self.pos += 1;
                    Token::PlusEqual
                } else {
                    Token::Plus
                }
            }
            b'-' => {
                self.pos += 1;
                if self.peek_byte() == Some(b'-') {
                    self.pos += 1;
                    Token::MinusMinus
                } else if self.peek_byte() == Some(b'=') {
                    self.pos += 1;
                    Token::MinusEqual
                } else {
                    Token::Minus
                }
            }
            b'*' => {
                self.pos += 1;
                if self.peek_byte() == Some(b'*') {
                    self.pos += 1;
                    if self.peek_byte() == Some(b'=') {
                        self.pos += 1;
                        Token::StarStarEqual
                    } else {
                        Token::StarStar
                    }
                } else if self.peek_byte() == Some(b'=') {
                    self.pos += 1;
                    Token::StarEqual
                } else {
                    Token::Star
                }
            }
            b'/' => two!(b'=', Token::SlashEqual, Token::Slash),
            b'%' => two!(b'=', Token::PercentEqual, Token::Percent),
            b'^' => two!(b'=', Token::CaretEqual, Token::Caret),
            b'!' => {
                self.pos += 1;
                if self.peek_byte() == Some(b'=') {
                    self.pos += 1;
                    if self.peek_byte() == Some(b'=') {
                        self.pos += 1;
                        Token::BangEqualEqual
                    } else {
                        Token::BangEqual
                    }
                } else {
                    Token::Bang
                }
            }
            b'=' => {
                self.pos += 1;
                if self.peek_byte() == Some(b'=') {
                    self.pos += 1;
                    if self.peek_byte() == Some(b'=') {
                        self.pos += 1;
                        Token::EqualEqualEqual
                    } else {
                        Token::EqualEqual
                    }
                } else if self.peek_byte() == Some(b'>') {
                    self.pos += 1;
                    Token::Arrow
                } else {
                    Token::Equal
                }
            }
            b'<' => {
                self.pos += 1;
                if self.peek_byte() == Some(b'<') {
                    self.pos += 1;
                    if self.peek_byte() == Some(b'=') {
                        self.pos += 1;
                        Token::LessLessEqual
                    } else {
                        Token::LessLess
                    }
                } else if self.peek_byte() == Some(b'=') {
                    self.pos += 1;
                    Token::LessEqual
                } else {
                    Token::Less
                }
            }
            b'>' => {
                self.pos += 1;
                if self.peek_byte() == Some(b'>') {
                    self.pos += 1;
                    if self.peek_byte() == Some(b'>') {
                        self.pos += 1;
                        if self.peek_byte() == Some(b'=') {
                            self.pos += 1;
                            Token::GreaterGreaterGreaterEqual
                        } else {
                            Token::GreaterGreaterGreater
                        }
                    } else if self.peek_byte() == Some(b'=') {
                        self.pos += 1;
                        Token::GreaterGreaterEqual
                    } else {
                        Token::GreaterGreater
                    }
                } else if self.peek_byte() == Some(b'=') {
                    self.pos += 1;
                    Token::GreaterEqual
                } else {
                    Token::Greater
                }
            }
            b'&' => {
                self.pos += 1;
                if self.peek_byte() == Some(b'&') {
                    self.pos += 1;
                    if self.peek_byte() == Some(b'=') {
                        self.pos += 1;
                        Token::AmpAmpEqual
                    } else {
                        Token::AmpAmp
                    }
                } else if self.peek_byte() == Some(b'=') {
                    self.pos += 1;
                    Token::AmpEqual
                } else {
                    Token::Amp
                }
            }
            b'|' => {
                self.pos += 1;
                if self.peek_byte() == Some(b'|') {
                    self.pos += 1;
                    if self.peek_byte() == Some(b'=') {
                        self.pos += 1;
                        Token::PipePipeEqual
                    } else {
                        Token::PipePipe
                    }
                } else if self.peek_byte() == Some(b'=') {
                    self.pos += 1;
                    Token::PipeEqual
                } else {
                    Token::Pipe
                }
            }
            b'?' => {
                self.pos += 1;
                if self.peek_byte() == Some(b'?') {
                    self.pos += 1;
                    if self.peek_byte() == Some(b'=') {
                        self.pos += 1;
                        Token::QuestionQuestionEqual
                    } else {
                        Token::QuestionQuestion
                    }
                } else if self.peek_byte() == Some(b'.') && !self.peek_byte_at(1).is_some_and(|c| c.is_ascii_digit()) {
                    self.pos += 1;
                    Token::QuestionDot
                } else {
                    Token::Question
                }
            }
            b'.' => {
                self.pos += 1;
                if self.peek_byte() == Some(b'.') && self.peek_byte_at(1) == Some(b'.') {
                    self.pos += 2;
                    Token::DotDotDot
                } else {
                    Token::Dot
                }
            }
            other => {
                self.pos += 1;
                self.errors.push(LexError::UnexpectedCharacter { ch: other as char, span: Span::new(self.pos - 1, self.pos) });
                Token::Error(format!("unexpected character '{}'", other as char))
            }
        }
    }

    fn scan_identifier_or_keyword(&mut self) -> Token {
        let start = self.pos;
        let mut text = String::new();
        loop {
            match self.peek_byte() {
                Some(b'\\') if self.peek_byte_at(1) == Some(b'u') => {
                    self.pos += 2;
                    if let Some(ch) = self.decode_unicode_escape() {
                        text.push(ch);
                    }
                }
                Some(b) if is_id_continue_byte(b) => {
                    // Consume one UTF-8 scalar, not just one byte.
                    let rest = &self.source[self.pos..];
                    let ch = rest.chars().next().unwrap();
                    text.push(ch);
                    self.pos += ch.len_utf8();
                }
                _ => break,
            }
        }
        let _ = start;
        keyword_or_identifier(&text, &mut self.interner)
    }

    fn decode_unicode_escape(&mut self) -> Option<char> {
        if self.peek_byte() == Some(b'{') {
            self.pos += 1;
            let mut hex = String::new();
            while self.peek_byte().is_some_and(|b| b != b'}') {
                hex.push(self.bump().unwrap() as char);
            }
            self.bump();
            u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32)
        } else {
            let mut hex = String::new();
            for _ in 0..4 {
                if self.peek_byte().is_some_and(|b| (b as char).is_ascii_hexdigit()) {
                    hex.push(self.bump().unwrap() as char);
                }
            }
            u16::from_str_radix(&hex, 16).ok().and_then(|v| char::from_u32(v as u32))
        }
    }

    fn scan_number(&mut self) -> Token {
        let start = self.pos;
        if self.peek_byte() == Some(b'0') && matches!(self.peek_byte_at(1), Some(b'x') | Some(b'X')) {
            self.pos += 2;
            return self.finish_radix_number(start, 16, NumberSubtype::Hex);
        }
        if self.peek_byte() == Some(b'0') && matches!(self.peek_byte_at(1), Some(b'o') | Some(b'O')) {
            self.pos += 2;
            return self.finish_radix_number(start, 8, NumberSubtype::Octal);
        }
        if self.peek_byte() == Some(b'0') && matches!(self.peek_byte_at(1), Some(b'b') | Some(b'B')) {
            self.pos += 2;
            return self.finish_radix_number(start, 2, NumberSubtype::Binary);
        }
        if self.peek_byte() == Some(b'0') && self.peek_byte_at(1).is_some_and(|b| b.is_ascii_digit()) {
            // Legacy octal: 0 followed directly by digits, no separators, no radix prefix.
            let digit_start = self.pos;
            self.pos += 1;
            let mut all_octal = true;
            while self.peek_byte().is_some_and(|b| b.is_ascii_digit()) {
                if !(b'0'..=b'7').contains(&self.peek_byte().unwrap()) {
                    all_octal = false;
                }
                self.pos += 1;
            }
            let text = &self.source[digit_start..self.pos];
            if all_octal {
                if let Ok(v) = i64::from_str_radix(&text[1..], 8) {
                    return Token::IntLiteral(v, NumberSubtype::LegacyOctal);
                }
            }
            // Not a legacy octal after all (contains 8/9) — fall through as decimal.
            self.pos = digit_start;
        }

        let mut is_float = false;
        self.consume_decimal_digits();
        if self.peek_byte() == Some(b'.') {
            is_float = true;
            self.pos += 1;
            self.consume_decimal_digits();
        }
        if matches!(self.peek_byte(), Some(b'e') | Some(b'E')) {
            is_float = true;
            self.pos += 1;
            if matches!(self.peek_byte(), Some(b'+') | Some(b'-')) {
                self.pos += 1;
            }
            self.consume_decimal_digits();
        }
        let text_with_seps = &self.source[start..self.pos];
        if self.peek_byte() == Some(b'n') {
            self.pos += 1;
            if is_float || !valid_separator_placement(text_with_seps) {
                self.errors.push(LexError::InvalidNumber { text: self.source[start..self.pos].to_string(), span: Span::new(start, self.pos) });
                return Token::Error("invalid bigint literal".into());
            }
            let clean: String = text_with_seps.chars().filter(|c| *c != '_').collect();
            let sym = self.interner.intern(&clean);
            return Token::BigIntLiteral(sym);
        }
        if !valid_separator_placement(text_with_seps) {
            self.errors.push(LexError::InvalidNumber { text: text_with_seps.to_string(), span: Span::new(start, self.pos) });
            return Token::Error("invalid numeric separator placement".into());
        }
        let clean: String = text_with_seps.chars().filter(|c| *c != '_').collect();
        if is_float {
            Token::FloatLiteral(clean.parse().unwrap_or(f64::NAN))
        } else {
            match clean.parse::<i64>() {
                Ok(v) => Token::IntLiteral(v, NumberSubtype::Decimal),
                Err(_) => Token::FloatLiteral(clean.parse().unwrap_or(f64::NAN)),
            }
        }
    }

    fn consume_decimal_digits(&mut self) {
        while self.peek_byte().is_some_and(|b| b.is_ascii_digit() || b == b'_') {
            self.pos += 1;
        }
    }

    fn finish_radix_number(&mut self, start: usize, radix: u32, subtype: NumberSubtype) -> Token {
        let digits_start = self.pos;
        while self.peek_byte().is_some_and(|b| (b as char).is_digit(radix) || b == b'_') {
            self.pos += 1;
        }
        let text_with_seps = &self.source[digits_start..self.pos];
        let is_bigint = self.peek_byte() == Some(b'n');
        if !valid_separator_placement(text_with_seps) {
            if is_bigint {
                self.pos += 1;
            }
            self.errors.push(LexError::InvalidNumber { text: self.source[start..self.pos].to_string(), span: Span::new(start, self.pos) });
            return Token::Error("invalid numeric separator placement".into());
        }
        let clean: String = text_with_seps.chars().filter(|c| *c != '_').collect();
        if is_bigint {
            self.pos += 1;
            let sym = self.interner.intern(&self.source[start..self.pos - 1].replace('_', ""));
            return Token::BigIntLiteral(sym);
        }
        match i64::from_str_radix(&clean, radix) {
            Ok(v) => Token::IntLiteral(v, subtype),
            Err(_) => {
                self.errors.push(LexError::InvalidNumber { text: clean, span: Span::new(start, self.pos) });
                Token::Error("numeric literal out of range".into())
            }
        }
    }

    fn scan_string(&mut self, quote: u8) -> Result<crate::parser::interner::Symbol, LexError> {
        let start = self.pos;
        self.pos += 1;
        let mut s = String::new();
        loop {
            match self.peek_byte() {
                None => return Err(LexError::UnterminatedString { span: Span::new(start, self.pos) }),
                Some(b) if b == quote => {
                    self.pos += 1;
                    break;
                }
                Some(b'\n') => return Err(LexError::UnterminatedString { span: Span::new(start, self.pos) }),
                Some(b'\\') => {
                    self.pos += 1;
                    self.scan_escape(&mut s);
                }
                Some(_) => {
                    let rest = &self.source[self.pos..];
                    let ch = rest.chars().next().unwrap();
                    s.push(ch);
                    self.pos += ch.len_utf8();
                }
            }
        }
        Ok(self.interner.intern(&s))
    }

    fn scan_escape(&mut self, out: &mut String) {
        let Some(b) = self.peek_byte() else { return };
        match b {
            b'n' => {
                out.push('\n');
                self.pos += 1;
            }
            b'r' => {
                out.push('\r');
                self.pos += 1;
            }
            b't' => {
                out.push('\t');
                self.pos += 1;
            }
            b'b' => {
                out.push('\u{8}');
                self.pos += 1;
            }
            b'f' => {
                out.push('\u{c}');
                self.pos += 1;
            }
            b'v' => {
                out.push('\u{b}');
                self.pos += 1;
            }
            b'0' if !self.peek_byte_at(1).is_some_and(|b| b.is_ascii_digit()) => {
                out.push('\0');
                self.pos += 1;
            }
            b'\n' => {
                self.pos += 1; // line continuation: consumed, nothing emitted
            }
            b'x' => {
                self.pos += 1;
                let mut hex = String::new();
                for _ in 0..2 {
                    if self.peek_byte().is_some_and(|b| (b as char).is_ascii_hexdigit()) {
                        hex.push(self.bump().unwrap() as char);
                    }
                }
                if let Some(ch) = u8::from_str_radix(&hex, 16).ok().map(|v| v as char) {
                    out.push(ch);
                }
            }
            b'u' => {
                self.pos += 1;
                if let Some(ch) = self.decode_unicode_escape() {
                    out.push(ch);
                }
            }
            _ => {
                let rest = &self.source[self.pos..];
                let ch = rest.chars().next().unwrap();
                out.push(ch);
                self.pos += ch.len_utf8();
            }
        }
    }

    fn scan_template(&mut self) -> Result<Vec<TemplatePart>, LexError> {
        let outer_start = self.pos;
        self.pos += 1; // opening `
        let mut parts = Vec::new();
        let mut cooked = String::new();
        let mut raw_start = self.pos;
        loop {
            match self.peek_byte() {
                None => return Err(LexError::UnterminatedTemplate { span: Span::new(outer_start, self.pos) }),
                Some(b'`') => {
                    let raw = self.source[raw_start..self.pos].to_string();
                    self.pos += 1;
                    parts.push(TemplatePart::String { cooked: self.interner.intern(&cooked), raw: self.interner.intern(&raw) });
                    return Ok(parts);
                }
                Some(b'$') if self.peek_byte_at(1) == Some(b'{') => {
                    let raw = self.source[raw_start..self.pos].to_string();
                    parts.push(TemplatePart::String { cooked: self.interner.intern(&cooked), raw: self.interner.intern(&raw) });
                    cooked.clear();
                    self.pos += 2;
                    let expr_start = self.pos;
                    let mut depth = 1i32;
                    while depth > 0 {
                        match self.peek_byte() {
                            None => return Err(LexError::UnterminatedTemplate { span: Span::new(outer_start, self.pos) }),
                            Some(b'{') => {
                                depth += 1;
                                self.pos += 1;
                            }
                            Some(b'}') => {
                                depth -= 1;
                                self.pos += 1;
                            }
                            Some(b'`') => {
                                // nested template literal inside the expression: skip it wholesale
                                self.scan_template()?;
                            }
                            Some(b'"') | Some(b'\'') => {
                                let q = self.peek_byte().unwrap();
                                let _ = self.scan_string(q);
                            }
                            _ => self.pos += 1,
                        }
                    }
                    let expr_src = &self.source[expr_start..self.pos - 1];
                    let taken_interner = std::mem::take(&mut self.interner);
                    let mut sub = Lexer::with_interner(expr_src, taken_interner);
                    let mut tokens = Vec::new();
                    loop {
                        let (tok, span, _) = sub.next();
                        if matches!(tok, Token::Eof) {
                            break;
                        }
                        tokens.push((tok, span));
                    }
                    self.interner = sub.into_interner();
                    parts.push(TemplatePart::Expression(tokens));
                    raw_start = self.pos;
                }
                Some(b'\\') => {
                    self.pos += 1;
                    self.scan_escape(&mut cooked);
                }
                Some(_) => {
                    let rest = &self.source[self.pos..];
                    let ch = rest.chars().next().unwrap();
                    cooked.push(ch);
                    self.pos += ch.len_utf8();
                }
            }
        }
    }

    fn scan_regex(&mut self) -> Result<(crate::parser::interner::Symbol, crate::parser::interner::Symbol), LexError> {
        let start = self.pos;
        self.pos += 1; // opening /
        let mut in_class = false;
        loop {
            match self.peek_byte() {
                None => return Err(LexError::UnterminatedRegex { span: Span::new(start, self.pos) }),
                Some(b'\n') => return Err(LexError::UnterminatedRegex { span: Span::new(start, self.pos) }),
                Some(b'\\') => {
                    self.pos += 1;
                    if self.peek_byte().is_some() {
                        self.pos += 1;
                    }
                }
                Some(b'[') => {
                    in_class = true;
                    self.pos += 1;
                }
                Some(b']') => {
                    in_class = false;
                    self.pos += 1;
                }
                Some(b'/') if !in_class => {
                    self.pos += 1;
                    break;
                }
                Some(_) => {
                    self.pos += 1;
                }
            }
        }
        let pattern = &self.source[start + 1..self.pos - 1];
        let flags_start = self.pos;
        while self.peek_byte().is_some_and(is_id_continue_byte) {
            self.pos += 1;
        }
        let flags = &self.source[flags_start..self.pos];
        Ok((self.interner.intern(pattern), self.interner.intern(flags)))
    }
}

fn is_id_start_byte(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_' || b == b'$' || b >= 0x80
}

fn is_id_continue_byte(b: u8) -> bool {
    is_id_start_byte(b) || b.is_ascii_digit()
}

/// Rejects `_1`, `1_`, `1__2`-style misplaced separators (spec §8's boundary
/// behaviors). `text` is the raw digit run including separators, no prefix.
fn valid_separator_placement(text: &str) -> bool {
    if text.starts_with('_') || text.ends_with('_') {
        return false;
    }
    !text.contains("__")
}

/// Only ECMAScript's unconditionally reserved words become keyword tokens;
/// everything else — including every contextual keyword — is an
/// `Identifier`, matching spec §4.2's "the parser, not the lexer, decides".
fn keyword_or_identifier(text: &str, interner: &mut Interner) -> Token {
    match text {
        "function" => Token::Function,
        "class" => Token::Class,
        "let" => Token::Let,
        "const" => Token::Const,
        "var" => Token::Var,
        "if" => Token::If,
        "else" => Token::Else,
        "switch" => Token::Switch,
        "case" => Token::Case,
        "default" => Token::Default,
        "for" => Token::For,
        "while" => Token::While,
        "do" => Token::Do,
        "break" => Token::Break,
        "continue" => Token::Continue,
        "return" => Token::Return,
        "try" => Token::Try,
        "catch" => Token::Catch,
        "finally" => Token::Finally,
        "throw" => Token::Throw,
        "import" => Token::Import,
        "export" => Token::Export,
        "new" => Token::New,
        "this" => Token::This,
        "super" => Token::Super,
        "typeof" => Token::Typeof,
        "instanceof" => Token::Instanceof,
        "delete" => Token::Delete,
        "void" => Token::Void,
        "debugger" => Token::Debugger,
        "with" => Token::With,
        "yield" => Token::Yield,
        "in" => Token::In,
        "extends" => Token::Extends,
        "true" => Token::True,
        "false" => Token::False,
        "null" => Token::Null,
        _ => Token::Identifier(interner.intern(text)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(src: &str) -> Vec<Token> {
        let mut lexer = Lexer::new(src);
        let mut out = Vec::new();
        loop {
            let (tok, _, _) = lexer.next();
            if matches!(tok, Token::Eof) {
                break;
            }
            out.push(tok);
        }
        out
    }

    #[test]
    fn division_after_identifier_vs_regex_after_paren() {
        assert!(matches!(tokens("a / b")[..], [Token::Identifier(_), Token::Slash, Token::Identifier(_)]));
        assert!(matches!(tokens("(/ab/)")[..], [Token::LeftParen, Token::RegexLiteral { .. }, Token::RightParen]));
    }

    #[test]
    fn contextual_keywords_lex_as_identifiers() {
        for word in ["async", "of", "from", "as", "get", "set", "static", "await"] {
            assert!(matches!(tokens(word)[..], [Token::Identifier(_)]), "{word} should lex as an identifier");
        }
    }

    #[test]
    fn numeric_separators_boundary_cases() {
        assert!(matches!(tokens("_1")[..], [Token::Identifier(_)])); // leading underscore: an identifier, not a number
        assert!(matches!(tokens("1_")[0], Token::Error(_)));
        assert!(matches!(tokens("1__2")[0], Token::Error(_)));
        assert!(matches!(tokens("0x_1")[0], Token::Error(_)));
        assert!(matches!(tokens("1e_2")[0], Token::Error(_)));
    }

    #[test]
    fn bigint_suffix_forbidden_after_decimal_point() {
        assert!(matches!(tokens("1.0n")[0], Token::Error(_)));
    }

    #[test]
    fn legacy_octal_with_nine_falls_back_to_decimal() {
        assert!(matches!(tokens("09")[0], Token::IntLiteral(9, NumberSubtype::Decimal)));
    }

    #[test]
    fn template_literal_splits_string_and_expression_parts() {
        let toks = tokens("`a${1+1}b`");
        match &toks[0] {
            Token::TemplateLiteral(parts) => {
                assert_eq!(parts.len(), 3);
                assert!(matches!(parts[1], TemplatePart::Expression(_)));
            }
            other => panic!("expected template literal, got {other:?}"),
        }
    }

    #[test]
    fn peek_and_save_restore_do_not_advance_consumption() {
        let mut lexer = Lexer::new("a b c");
        let state = lexer.save();
        assert!(matches!(lexer.peek(1).0, Token::Identifier(_)));
        let (first, _, _) = lexer.next();
        assert!(matches!(first, Token::Identifier(_)));
        lexer.restore(state);
        let (first_again, _, _) = lexer.next();
        assert!(matches!(first_again, Token::Identifier(_)));
    }

    #[test]
    fn unterminated_string_reports_opening_delimiter_location() {
        let mut lexer = Lexer::new("\"abc");
        lexer.next();
        assert_eq!(lexer.errors()[0].span().start, 0);
    }
}
