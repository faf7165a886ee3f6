//! Tolerant JSON parser for structured generation output.
//!
//! Generated JSON is often almost right: wrapped in a code fence, followed by
//! prose, cut off mid-string, or missing a comma. Instead of patching the text
//! with regexes, this recursive-descent parser accepts the input as far as it
//! can and records every deviation it had to paper over as a [`Repair`].
//!
//! Recovery rules:
//! - text before the first `{` or `[` and after the top-level value is ignored
//! - when the value at one opening delimiter fails, the next one is tried
//! - `//` and `/* */` comments are skipped
//! - a string still open at end of input is closed
//! - containers still open at end of input are closed
//! - a closing delimiter of the wrong kind closes the current container
//! - a missing `,` between members or a trailing `,` before a close is tolerated
//! - a missing `:` after an object key is tolerated
//! - single-quoted strings and bare identifier keys are accepted
//! - a value cut off at end of input becomes `null`

use serde_json::{Map, Value};
use std::fmt;

/// Nesting deeper than this is treated as garbage.
const MAX_DEPTH: usize = 128;
const TOO_DEEP: &str = "nesting too deep";

/// A deviation from strict JSON that the parser recovered from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Repair {
    CodeFenceStripped,
    CommentRemoved,
    UnterminatedString,
    UnclosedContainer,
    MismatchedDelimiter,
    MissingComma,
    TrailingComma,
    MissingColon,
    SingleQuotedString,
    UnquotedKey,
    TruncatedValue,
}

impl fmt::Display for Repair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Repair::CodeFenceStripped => "code fence stripped",
            Repair::CommentRemoved => "comment removed",
            Repair::UnterminatedString => "unterminated string closed",
            Repair::UnclosedContainer => "unclosed container closed",
            Repair::MismatchedDelimiter => "mismatched delimiter",
            Repair::MissingComma => "missing comma inserted",
            Repair::TrailingComma => "trailing comma dropped",
            Repair::MissingColon => "missing colon inserted",
            Repair::SingleQuotedString => "single-quoted string",
            Repair::UnquotedKey => "unquoted key",
            Repair::TruncatedValue => "truncated value replaced with null",
        };
        write!(f, "{}", text)
    }
}

/// Why parsing gave up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseFailure {
    /// Character offset into the candidate text
    pub offset: usize,
    pub reason: String,
}

impl fmt::Display for ParseFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at offset {}", self.reason, self.offset)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParseResult {
    /// Strict JSON
    Ok(Value),
    /// Parsed after applying the listed repairs
    Recovered { value: Value, repairs: Vec<Repair> },
    Failed(ParseFailure),
}

impl ParseResult {
    pub fn value(&self) -> Option<&Value> {
        match self {
            ParseResult::Ok(value) | ParseResult::Recovered { value, .. } => Some(value),
            ParseResult::Failed(_) => None,
        }
    }

    pub fn into_value(self) -> Option<Value> {
        match self {
            ParseResult::Ok(value) | ParseResult::Recovered { value, .. } => Some(value),
            ParseResult::Failed(_) => None,
        }
    }

    pub fn repairs(&self) -> &[Repair] {
        match self {
            ParseResult::Recovered { repairs, .. } => repairs,
            _ => &[],
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, ParseResult::Failed(_))
    }
}

/// Parse the first JSON value found in `input`.
pub fn parse_tolerant(input: &str) -> ParseResult {
    parse_candidates(input, &['{', '['])
}

/// Try each opening delimiter in `input` in turn until one yields a value.
///
/// The reported failure is the one from the first candidate. Excessive
/// nesting stops the search.
fn parse_candidates(input: &str, openers: &[char]) -> ParseResult {
    let mut repairs = Vec::new();
    let body = match strip_code_fence(input).filter(|inner| inner.contains(openers)) {
        Some(inner) => {
            repairs.push(Repair::CodeFenceStripped);
            inner
        }
        None => input,
    };

    let mut first_failure: Option<ParseFailure> = None;
    let mut from = 0;
    while let Some(offset) = body[from..].find(openers) {
        let start = from + offset;
        match parse_candidate(&body[start..]) {
            Ok((value, mut candidate_repairs)) => {
                repairs.append(&mut candidate_repairs);
                return if repairs.is_empty() {
                    ParseResult::Ok(value)
                } else {
                    ParseResult::Recovered { value, repairs }
                };
            }
            Err(failure) => {
                let too_deep = failure.reason == TOO_DEEP;
                let failure = first_failure.take().unwrap_or(failure);
                if too_deep {
                    return ParseResult::Failed(failure);
                }
                first_failure = Some(failure);
            }
        }
        // Openers are single-byte, so this stays on a char boundary.
        from = start + 1;
    }

    ParseResult::Failed(first_failure.unwrap_or_else(|| ParseFailure {
        offset: 0,
        reason: "no JSON object or array found".to_string(),
    }))
}

fn parse_candidate(candidate: &str) -> Result<(Value, Vec<Repair>), ParseFailure> {
    // Fast path: strict JSON followed by optional prose.
    let mut stream = serde_json::Deserializer::from_str(candidate).into_iter::<Value>();
    if let Some(Ok(value)) = stream.next() {
        return Ok((value, Vec::new()));
    }

    let mut parser = Parser::new(candidate);
    let value = parser.parse_value()?;
    Ok((value, parser.repairs))
}

/// Parse and require a top-level object.
pub fn parse_object(input: &str) -> Result<(Map<String, Value>, Vec<Repair>), ParseFailure> {
    match parse_candidates(input, &['{']) {
        ParseResult::Ok(Value::Object(map)) => Ok((map, Vec::new())),
        ParseResult::Recovered {
            value: Value::Object(map),
            repairs,
        } => Ok((map, repairs)),
        ParseResult::Failed(failure) => Err(failure),
        _ => Err(ParseFailure {
            offset: 0,
            reason: "top-level value is not an object".to_string(),
        }),
    }
}

fn strip_code_fence(input: &str) -> Option<&str> {
    let open = input.find("```")?;
    let after = &input[open + 3..];
    // Skip the language tag line, if any.
    let body_start = after.find('\n').map(|i| i + 1).unwrap_or(0);
    let body = &after[body_start..];
    let end = body.find("```").unwrap_or(body.len());
    Some(&body[..end])
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
    depth: usize,
    repairs: Vec<Repair>,
}

impl Parser {
    fn new(text: &str) -> Self {
        Self {
            chars: text.chars().collect(),
            pos: 0,
            depth: 0,
            repairs: Vec::new(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn fail<T>(&self, reason: &str) -> Result<T, ParseFailure> {
        Err(ParseFailure {
            offset: self.pos,
            reason: reason.to_string(),
        })
    }

    fn repair(&mut self, repair: Repair) {
        self.repairs.push(repair);
    }

    fn skip_ws(&mut self) {
        loop {
            match (self.peek(), self.peek_at(1)) {
                (Some(c), _) if c.is_whitespace() => self.pos += 1,
                (Some('/'), Some('/')) => {
                    self.repair(Repair::CommentRemoved);
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.pos += 1;
                    }
                }
                (Some('/'), Some('*')) => {
                    self.repair(Repair::CommentRemoved);
                    self.pos += 2;
                    while self.pos < self.chars.len() {
                        if self.peek() == Some('*') && self.peek_at(1) == Some('/') {
                            self.pos += 2;
                            break;
                        }
                        self.pos += 1;
                    }
                }
                _ => break,
            }
        }
    }

    fn parse_value(&mut self) -> Result<Value, ParseFailure> {
        self.skip_ws();
        match self.peek() {
            None => {
                self.repair(Repair::TruncatedValue);
                Ok(Value::Null)
            }
            Some('{') => self.parse_object(),
            Some('[') => self.parse_array(),
            Some('"') => self.parse_string('"').map(Value::String),
            Some('\'') => {
                self.repair(Repair::SingleQuotedString);
                self.parse_string('\'').map(Value::String)
            }
            Some(c) if c == '-' || c.is_ascii_digit() => self.parse_number(),
            Some(c) if c.is_alphabetic() => self.parse_literal(),
            Some(_) => self.fail("unexpected character"),
        }
    }

    fn enter(&mut self) -> Result<(), ParseFailure> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return self.fail(TOO_DEEP);
        }
        Ok(())
    }

    fn parse_object(&mut self) -> Result<Value, ParseFailure> {
        self.enter()?;
        self.pos += 1;
        let mut map = Map::new();

        loop {
            self.skip_ws();
            match self.peek() {
                None => {
                    self.repair(Repair::UnclosedContainer);
                    break;
                }
                Some('}') => {
                    self.pos += 1;
                    break;
                }
                Some(']') => {
                    self.repair(Repair::MismatchedDelimiter);
                    self.pos += 1;
                    break;
                }
                Some(',') => {
                    // Stray separator, e.g. `{,"a":1}` or `"a":1,,"b":2`.
                    self.repair(Repair::TrailingComma);
                    self.pos += 1;
                    continue;
                }
                _ => {}
            }

            let key = self.parse_key()?;
            self.skip_ws();
            match self.peek() {
                Some(':') => self.pos += 1,
                None => {
                    self.repair(Repair::TruncatedValue);
                    map.insert(key, Value::Null);
                    continue;
                }
                Some(_) => self.repair(Repair::MissingColon),
            }

            let value = self.parse_value()?;
            map.insert(key, value);

            self.skip_ws();
            match self.peek() {
                Some(',') => {
                    self.pos += 1;
                    self.skip_ws();
                    if matches!(self.peek(), Some('}') | Some(']')) {
                        self.repair(Repair::TrailingComma);
                    }
                }
                Some('}') | Some(']') | None => {}
                Some(_) => self.repair(Repair::MissingComma),
            }
        }

        self.depth -= 1;
        Ok(Value::Object(map))
    }

    fn parse_key(&mut self) -> Result<String, ParseFailure> {
        match self.peek() {
            Some('"') => self.parse_string('"'),
            Some('\'') => {
                self.repair(Repair::SingleQuotedString);
                self.parse_string('\'')
            }
            Some(c) if c.is_alphanumeric() || c == '_' => {
                self.repair(Repair::UnquotedKey);
                let start = self.pos;
                while let Some(c) = self.peek() {
                    if c.is_alphanumeric() || c == '_' || c == '-' {
                        self.pos += 1;
                    } else {
                        break;
                    }
                }
                Ok(self.chars[start..self.pos].iter().collect())
            }
            _ => self.fail("expected object key"),
        }
    }

    fn parse_array(&mut self) -> Result<Value, ParseFailure> {
        self.enter()?;
        self.pos += 1;
        let mut items = Vec::new();

        loop {
            self.skip_ws();
            match self.peek() {
                None => {
                    self.repair(Repair::UnclosedContainer);
                    break;
                }
                Some(']') => {
                    self.pos += 1;
                    break;
                }
                Some('}') => {
                    self.repair(Repair::MismatchedDelimiter);
                    self.pos += 1;
                    break;
                }
                Some(',') => {
                    self.repair(Repair::TrailingComma);
                    self.pos += 1;
                    continue;
                }
                _ => {}
            }

            items.push(self.parse_value()?);

            self.skip_ws();
            match self.peek() {
                Some(',') => {
                    self.pos += 1;
                    self.skip_ws();
                    if matches!(self.peek(), Some('}') | Some(']')) {
                        self.repair(Repair::TrailingComma);
                    }
                }
                Some('}') | Some(']') | None => {}
                Some(_) => self.repair(Repair::MissingComma),
            }
        }

        self.depth -= 1;
        Ok(Value::Array(items))
    }

    fn parse_string(&mut self, quote: char) -> Result<String, ParseFailure> {
        self.pos += 1;
        let mut out = String::new();

        loop {
            let Some(c) = self.peek() else {
                self.repair(Repair::UnterminatedString);
                return Ok(out);
            };
            self.pos += 1;
            match c {
                c if c == quote => return Ok(out),
                '\\' => {
                    let Some(escaped) = self.peek() else {
                        self.repair(Repair::UnterminatedString);
                        return Ok(out);
                    };
                    self.pos += 1;
                    match escaped {
                        'n' => out.push('\n'),
                        't' => out.push('\t'),
                        'r' => out.push('\r'),
                        'b' => out.push('\u{0008}'),
                        'f' => out.push('\u{000C}'),
                        'u' => out.push(self.parse_unicode_escape()),
                        other => out.push(other),
                    }
                }
                other => out.push(other),
            }
        }
    }

    fn parse_unicode_escape(&mut self) -> char {
        let end = (self.pos + 4).min(self.chars.len());
        let hex: String = self.chars[self.pos..end].iter().collect();
        match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
            Some(c) if hex.len() == 4 => {
                self.pos = end;
                c
            }
            _ => char::REPLACEMENT_CHARACTER,
        }
    }

    fn parse_number(&mut self) -> Result<Value, ParseFailure> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() || matches!(c, '-' | '+' | '.' | 'e' | 'E') {
                self.pos += 1;
            } else {
                break;
            }
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        if let Ok(int) = text.parse::<i64>() {
            return Ok(Value::from(int));
        }
        match text.parse::<f64>() {
            Ok(float) => Ok(serde_json::Number::from_f64(float)
                .map(Value::Number)
                .unwrap_or(Value::Null)),
            Err(_) if self.peek().is_none() => {
                self.repair(Repair::TruncatedValue);
                Ok(Value::Null)
            }
            Err(_) => {
                self.pos = start;
                self.fail("invalid number")
            }
        }
    }

    fn parse_literal(&mut self) -> Result<Value, ParseFailure> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_alphabetic() {
                self.pos += 1;
            } else {
                break;
            }
        }
        let word: String = self.chars[start..self.pos].iter().collect();
        match word.as_str() {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            "null" => Ok(Value::Null),
            partial
                if self.peek().is_none()
                    && ["true", "false", "null"].iter().any(|l| l.starts_with(partial)) =>
            {
                self.repair(Repair::TruncatedValue);
                Ok(Value::Null)
            }
            _ => {
                self.pos = start;
                self.fail("unknown literal")
            }
        }
    }
}
