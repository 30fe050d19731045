//! Parsing of the model's list-of-strings answer.
//!
//! Models wrap their answer in commentary, so the candidate literal is the
//! slice from the first `[` to the last `]` of the completion. That slice must
//! parse as a Python-style literal list:
//!
//! ```text
//! value   := string+ | number | "None" | "True" | "False"
//!          | "[" items "]" | "(" items ")" | "{" items "}" | "{" pairs "}"
//! items   := (value ("," value)* ","?)?
//! pairs   := (value ":" value ("," value ":" value)* ","?)?
//! string  := prefix? ( '...' | "..." | '''...''' | """...""" )
//! prefix  := r | u | b | br | rb   (any case)
//! number  := sign? (imag | real (sign imag)?)
//! real    := digits ("." digits)? (("e"|"E") sign? digits)?
//! imag    := real ("j"|"J")
//! sign    := "+" | "-"
//! ```
//!
//! Whitespace and `#` comments may appear between tokens. Adjacent string
//! literals concatenate. Containers nest at most [`MAX_NESTING`] deep.
//! Anything that does not match yields no samples.

use thiserror::Error;
use tracing::debug;

/// Deepest container nesting accepted in a completion.
pub const MAX_NESTING: usize = 200;

/// Why a completion did not yield a list literal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("no bracketed list in response")]
    NoList,

    #[error("unexpected {found} at offset {offset}")]
    Unexpected { found: String, offset: usize },

    #[error("unterminated string starting at offset {0}")]
    UnterminatedString(usize),

    #[error("invalid escape at offset {0}")]
    InvalidEscape(usize),

    #[error("cannot concatenate bytes and str at offset {0}")]
    MixedLiteral(usize),

    #[error("literal is not a list")]
    NotAList,

    #[error("containers nested deeper than {MAX_NESTING} at offset {0}")]
    TooDeep(usize),
}

/// Extract the samples from a raw completion.
///
/// Never fails: any parse problem yields an empty list, and non-string
/// elements of an otherwise valid list are dropped.
pub fn parse_sample_list(raw: &str) -> Vec<String> {
    match try_parse_sample_list(raw) {
        Ok(samples) => samples,
        Err(e) => {
            debug!(error = %e, "could not parse sample list");
            Vec::new()
        }
    }
}

/// Like [`parse_sample_list`], but reports why nothing was found.
pub fn try_parse_sample_list(raw: &str) -> Result<Vec<String>, ParseError> {
    let start = raw.find('[').ok_or(ParseError::NoList)?;
    let end = raw.rfind(']').ok_or(ParseError::NoList)?;
    if end < start {
        return Err(ParseError::NoList);
    }

    let mut parser = LiteralParser::new(&raw[start..=end]);
    let value = parser.parse_document()?;

    match value {
        Literal::List(items) => Ok(items
            .into_iter()
            .filter_map(|item| match item {
                Literal::Str(s) => Some(s),
                _ => None,
            })
            .collect()),
        _ => Err(ParseError::NotAList),
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Literal {
    Str(String),
    Bytes,
    Number,
    Constant,
    List(Vec<Literal>),
    Tuple,
    Set,
    Dict,
}

struct LiteralParser {
    chars: Vec<char>,
    pos: usize,
    depth: usize,
}

impl LiteralParser {
    fn new(input: &str) -> Self {
        Self {
            chars: input.chars().collect(),
            pos: 0,
            depth: 0,
        }
    }

    fn parse_document(&mut self) -> Result<Literal, ParseError> {
        let value = self.parse_value()?;
        self.skip_trivia();
        if self.pos < self.chars.len() {
            return Err(self.unexpected());
        }
        Ok(value)
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, ahead: usize) -> Option<char> {
        self.chars.get(self.pos + ahead).copied()
    }

    fn unexpected(&self) -> ParseError {
        let found = match self.peek() {
            Some(c) => format!("{:?}", c),
            None => "end of input".to_string(),
        };
        ParseError::Unexpected {
            found,
            offset: self.pos,
        }
    }

    fn skip_trivia(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.pos += 1;
            } else if c == '#' {
                while let Some(c) = self.peek() {
                    if c == '\n' {
                        break;
                    }
                    self.pos += 1;
                }
            } else if c == '\\' && self.peek_at(1) == Some('\n') {
                // explicit line continuation
                self.pos += 2;
            } else {
                break;
            }
        }
    }

    fn expect(&mut self, wanted: char) -> Result<(), ParseError> {
        self.skip_trivia();
        if self.peek() == Some(wanted) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    fn parse_value(&mut self) -> Result<Literal, ParseError> {
        self.skip_trivia();
        match self.peek() {
            Some(open @ ('[' | '(' | '{')) => self.parse_container(open),
            Some(c) if c.is_ascii_digit() || c == '.' || c == '+' || c == '-' => self.parse_number(),
            Some(c) if c == '"' || c == '\'' || self.at_string_prefix() => self.parse_strings(),
            Some(c) if c.is_alphabetic() || c == '_' => self.parse_constant(),
            _ => Err(self.unexpected()),
        }
    }

    fn parse_container(&mut self, open: char) -> Result<Literal, ParseError> {
        if self.depth >= MAX_NESTING {
            return Err(ParseError::TooDeep(self.pos));
        }
        self.depth += 1;
        self.pos += 1;
        let value = match open {
            '[' => self.parse_items(']').map(Literal::List),
            '(' => self.parse_items(')').map(|_| Literal::Tuple),
            _ => self.parse_braced(),
        };
        self.depth -= 1;
        value
    }

    /// Comma-separated values up to `close`; trailing comma allowed.
    fn parse_items(&mut self, close: char) -> Result<Vec<Literal>, ParseError> {
        let mut items = Vec::new();
        loop {
            self.skip_trivia();
            if self.peek() == Some(close) {
                self.pos += 1;
                return Ok(items);
            }
            items.push(self.parse_value()?);
            self.skip_trivia();
            match self.peek() {
                Some(',') => self.pos += 1,
                Some(c) if c == close => {
                    self.pos += 1;
                    return Ok(items);
                }
                _ => return Err(self.unexpected()),
            }
        }
    }

    /// A set `{a, b}` or a dict `{k: v}`.
    fn parse_braced(&mut self) -> Result<Literal, ParseError> {
        self.skip_trivia();
        if self.peek() == Some('}') {
            self.pos += 1;
            return Ok(Literal::Dict);
        }

        let _first = self.parse_value()?;
        self.skip_trivia();
        if self.peek() != Some(':') {
            loop {
                match self.peek() {
                    Some(',') => {
                        self.pos += 1;
                        self.skip_trivia();
                        if self.peek() == Some('}') {
                            self.pos += 1;
                            return Ok(Literal::Set);
                        }
                        self.parse_value()?;
                        self.skip_trivia();
                    }
                    Some('}') => {
                        self.pos += 1;
                        return Ok(Literal::Set);
                    }
                    _ => return Err(self.unexpected()),
                }
            }
        }

        self.pos += 1;
        self.parse_value()?;
        loop {
            self.skip_trivia();
            match self.peek() {
                Some(',') => {
                    self.pos += 1;
                    self.skip_trivia();
                    if self.peek() == Some('}') {
                        self.pos += 1;
                        return Ok(Literal::Dict);
                    }
                    self.parse_value()?;
                    self.expect(':')?;
                    self.parse_value()?;
                }
                Some('}') => {
                    self.pos += 1;
                    return Ok(Literal::Dict);
                }
                _ => return Err(self.unexpected()),
            }
        }
    }

    fn parse_constant(&mut self) -> Result<Literal, ParseError> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' {
                self.pos += 1;
            } else {
                break;
            }
        }
        let word: String = self.chars[start..self.pos].iter().collect();
        match word.as_str() {
            "None" | "True" | "False" => Ok(Literal::Constant),
            _ => Err(ParseError::Unexpected {
                found: format!("name {:?}", word),
                offset: start,
            }),
        }
    }

    /// A number with at most one leading sign, or a `real +/- imag` complex.
    fn parse_number(&mut self) -> Result<Literal, ParseError> {
        if matches!(self.peek(), Some('+') | Some('-')) {
            self.pos += 1;
            self.skip_trivia();
        }
        if self.parse_unsigned_number()? {
            return Ok(Literal::Number);
        }

        let after_real = self.pos;
        self.skip_trivia();
        if !matches!(self.peek(), Some('+') | Some('-')) {
            self.pos = after_real;
            return Ok(Literal::Number);
        }
        self.pos += 1;
        self.skip_trivia();
        let imag_at = self.pos;
        if !self.parse_unsigned_number()? {
            return Err(ParseError::Unexpected {
                found: "real number where an imaginary part belongs".to_string(),
                offset: imag_at,
            });
        }
        Ok(Literal::Number)
    }

    /// Returns whether the number carried an imaginary `j` suffix.
    fn parse_unsigned_number(&mut self) -> Result<bool, ParseError> {
        let mut digits = self.eat_digits();
        if self.peek() == Some('.') {
            self.pos += 1;
            digits += self.eat_digits();
        }
        if digits == 0 {
            return Err(self.unexpected());
        }
        if matches!(self.peek(), Some('e') | Some('E')) {
            self.pos += 1;
            if matches!(self.peek(), Some('+') | Some('-')) {
                self.pos += 1;
            }
            if self.eat_digits() == 0 {
                return Err(self.unexpected());
            }
        }
        let imaginary = matches!(self.peek(), Some('j') | Some('J'));
        if imaginary {
            self.pos += 1;
        }
        match self.peek() {
            Some(c) if c.is_alphanumeric() || c == '_' || c == '.' => Err(self.unexpected()),
            _ => Ok(imaginary),
        }
    }

    /// Consume ASCII digits with single underscores between them.
    fn eat_digits(&mut self) -> usize {
        let mut count = 0;
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                count += 1;
                self.pos += 1;
            } else if c == '_' && count > 0 && self.peek_at(1).is_some_and(|n| n.is_ascii_digit()) {
                self.pos += 1;
            } else {
                break;
            }
        }
        count
    }

    fn at_string_prefix(&self) -> bool {
        let is_quote = |c: Option<char>| matches!(c, Some('"') | Some('\''));
        let is_prefix = |c: Option<char>| matches!(c.map(|c| c.to_ascii_lowercase()), Some('r') | Some('u') | Some('b'));
        if !is_prefix(self.peek()) {
            return false;
        }
        is_quote(self.peek_at(1)) || (is_prefix(self.peek_at(1)) && is_quote(self.peek_at(2)))
    }

    /// One or more adjacent string literals, concatenated.
    fn parse_strings(&mut self) -> Result<Literal, ParseError> {
        let start = self.pos;
        let (mut text, mut is_bytes) = self.parse_string()?;

        loop {
            self.skip_trivia();
            if !(matches!(self.peek(), Some('"') | Some('\'')) || self.at_string_prefix()) {
                break;
            }
            let (next, next_bytes) = self.parse_string()?;
            if next_bytes != is_bytes {
                return Err(ParseError::MixedLiteral(start));
            }
            text.push_str(&next);
            is_bytes = next_bytes;
        }

        if is_bytes {
            Ok(Literal::Bytes)
        } else {
            Ok(Literal::Str(text))
        }
    }

    fn parse_string(&mut self) -> Result<(String, bool), ParseError> {
        let start = self.pos;
        let mut raw = false;
        let mut bytes = false;
        while let Some(c) = self.peek() {
            match c.to_ascii_lowercase() {
                'r' => raw = true,
                'b' => bytes = true,
                'u' => {}
                _ => break,
            }
            self.pos += 1;
        }

        let quote = match self.peek() {
            Some(q @ ('"' | '\'')) => q,
            _ => return Err(self.unexpected()),
        };
        let triple = self.peek_at(1) == Some(quote) && self.peek_at(2) == Some(quote);
        self.pos += if triple { 3 } else { 1 };

        let mut out = String::new();
        loop {
            let c = self.peek().ok_or(ParseError::UnterminatedString(start))?;
            if c == quote {
                if !triple {
                    self.pos += 1;
                    return Ok((out, bytes));
                }
                if self.peek_at(1) == Some(quote) && self.peek_at(2) == Some(quote) {
                    self.pos += 3;
                    return Ok((out, bytes));
                }
                out.push(c);
                self.pos += 1;
            } else if c == '\n' && !triple {
                return Err(ParseError::UnterminatedString(start));
            } else if c == '\\' {
                if raw {
                    // raw strings keep the backslash but it still protects the next char
                    out.push(c);
                    self.pos += 1;
                    let next = self.peek().ok_or(ParseError::UnterminatedString(start))?;
                    out.push(next);
                    self.pos += 1;
                } else {
                    self.parse_escape(&mut out, start)?;
                }
            } else {
                out.push(c);
                self.pos += 1;
            }
        }
    }

    fn parse_escape(&mut self, out: &mut String, string_start: usize) -> Result<(), ParseError> {
        let escape_at = self.pos;
        self.pos += 1;
        let c = self.peek().ok_or(ParseError::UnterminatedString(string_start))?;
        self.pos += 1;
        match c {
            '\n' => {}
            '\\' => out.push('\\'),
            '\'' => out.push('\''),
            '"' => out.push('"'),
            'a' => out.push('\x07'),
            'b' => out.push('\x08'),
            'f' => out.push('\x0c'),
            'n' => out.push('\n'),
            'r' => out.push('\r'),
            't' => out.push('\t'),
            'v' => out.push('\x0b'),
            '0'..='7' => {
                let mut code = c.to_digit(8).unwrap_or(0);
                for _ in 0..2 {
                    match self.peek().and_then(|d| d.to_digit(8)) {
                        Some(d) => {
                            code = code * 8 + d;
                            self.pos += 1;
                        }
                        None => break,
                    }
                }
                out.push(char::from_u32(code).ok_or(ParseError::InvalidEscape(escape_at))?);
            }
            'x' => out.push(self.parse_hex_escape(2, escape_at)?),
            'u' => out.push(self.parse_hex_escape(4, escape_at)?),
            'U' => out.push(self.parse_hex_escape(8, escape_at)?),
            'N' => return Err(ParseError::InvalidEscape(escape_at)),
            other => {
                // unknown escapes are kept verbatim
                out.push('\\');
                out.push(other);
            }
        }
        Ok(())
    }

    fn parse_hex_escape(&mut self, width: usize, escape_at: usize) -> Result<char, ParseError> {
        let mut code = 0u32;
        for _ in 0..width {
            let digit = self
                .peek()
                .and_then(|d| d.to_digit(16))
                .ok_or(ParseError::InvalidEscape(escape_at))?;
            code = code * 16 + digit;
            self.pos += 1;
        }
        char::from_u32(code).ok_or(ParseError::InvalidEscape(escape_at))
    }
}
