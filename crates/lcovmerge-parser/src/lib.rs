//! LCOV tracefile parser for lcovmerge.
//!
//! This crate splits raw tracefile bytes into physical lines and turns each
//! line into a typed [`Record`]: a [`RecordType`] plus the comma-separated
//! fields that follow the `:` separator. It knows nothing about tests or
//! source files; the merge engine gives records their meaning.

use std::ops::RangeInclusive;

pub use lcovmerge_types::RecordType;
use lcovmerge_types::END_OF_RECORD;
use thiserror::Error;

/// Maximum number of fields any record may carry.
pub const MAX_ARGUMENTS: usize = 4;

/// Maximum number of decimal digits accepted in an unsigned field.
pub const MAX_DIGITS: usize = 10;

// ============================================================================
// Errors
// ============================================================================

/// Errors produced while parsing a single line.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GrammarError {
    /// No known keyword introduces the line.
    #[error("unknown record type")]
    UnknownRecordType,

    /// The line is not valid UTF-8.
    #[error("line is not valid UTF-8")]
    InvalidUtf8,

    /// An empty field (leading, doubled or trailing comma).
    #[error("trailing commas")]
    TrailingCommas,

    /// More fields than any record accepts.
    #[error("too many arguments (max: {MAX_ARGUMENTS})")]
    TooManyArguments,

    /// The field count does not fit the record type.
    #[error("{record} expected {expected}, got {actual}")]
    ArgumentCount {
        record: RecordType,
        expected: &'static str,
        actual: usize,
    },
}

// ============================================================================
// Line Tokenizer
// ============================================================================

/// One physical line of a tracefile with its terminator removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawLine<'a> {
    /// 1-based line number in the tracefile.
    pub number: usize,
    /// Line content without `\n` or `\r\n`.
    pub bytes: &'a [u8],
}

impl RawLine<'_> {
    /// Comment and blank lines carry no record.
    pub fn is_skippable(&self) -> bool {
        self.bytes.is_empty() || self.bytes[0] == b'#'
    }
}

/// Single-pass iterator over the physical lines of a tracefile.
#[derive(Debug, Clone)]
pub struct Lines<'a> {
    rest: &'a [u8],
    number: usize,
}

/// Split `input` into lines, recognizing `\n` and `\r\n` terminators.
///
/// A final line without a terminator is still yielded.
///
/// # Examples
///
/// ```
/// use lcovmerge_parser::lines;
///
/// let all: Vec<_> = lines(b"TN:a\r\n\nend_of_record").map(|l| l.bytes).collect();
/// assert_eq!(all, vec![&b"TN:a"[..], &b""[..], &b"end_of_record"[..]]);
/// ```
pub fn lines(input: &[u8]) -> Lines<'_> {
    Lines {
        rest: input,
        number: 0,
    }
}

impl<'a> Iterator for Lines<'a> {
    type Item = RawLine<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.rest.is_empty() {
            return None;
        }
        let (mut line, rest) = match self.rest.iter().position(|&b| b == b'\n') {
            Some(pos) => (&self.rest[..pos], &self.rest[pos + 1..]),
            None => (self.rest, &self.rest[self.rest.len()..]),
        };
        if let Some(stripped) = line.strip_suffix(b"\r") {
            line = stripped;
        }
        self.rest = rest;
        self.number += 1;
        Some(RawLine {
            number: self.number,
            bytes: line,
        })
    }
}

// ============================================================================
// Record Parsing
// ============================================================================

/// A classified line with its raw fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record<'a> {
    pub kind: RecordType,
    pub args: Vec<&'a str>,
}

impl<'a> Record<'a> {
    /// Check the field count against what the record type accepts.
    pub fn expect_arity(
        &self,
        allowed: RangeInclusive<usize>,
        expected: &'static str,
    ) -> Result<(), GrammarError> {
        if allowed.contains(&self.args.len()) {
            Ok(())
        } else {
            Err(GrammarError::ArgumentCount {
                record: self.kind,
                expected,
                actual: self.args.len(),
            })
        }
    }

    /// Field at `index`; callers check arity first.
    pub fn arg(&self, index: usize) -> Option<&'a str> {
        self.args.get(index).copied()
    }
}

/// Classify a line by its keyword.
///
/// Returns the record type and the text following the `:` separator, or
/// `None` when the line does not start with a known keyword.
///
/// # Examples
///
/// ```
/// use lcovmerge_parser::{classify, RecordType};
///
/// assert_eq!(classify("FNDA:3,main"), Some((RecordType::FunctionData, "3,main")));
/// assert_eq!(classify("end_of_record"), Some((RecordType::EndOfRecord, "")));
/// assert_eq!(classify("XX:1"), None);
/// ```
pub fn classify(line: &str) -> Option<(RecordType, &str)> {
    if line == END_OF_RECORD {
        return Some((RecordType::EndOfRecord, ""));
    }
    let (prefix, rest) = line.split_once(':')?;
    RecordType::from_prefix(prefix).map(|kind| (kind, rest))
}

/// Split the text after the separator into at most [`MAX_ARGUMENTS`] fields.
///
/// Fields borrow from `rest`; nothing is unescaped. An empty `rest` has no
/// fields.
pub fn parse_arguments(rest: &str) -> Result<Vec<&str>, GrammarError> {
    let mut args = Vec::with_capacity(MAX_ARGUMENTS);
    if rest.is_empty() {
        return Ok(args);
    }
    for field in rest.split(',') {
        if field.is_empty() {
            return Err(GrammarError::TrailingCommas);
        }
        if args.len() == MAX_ARGUMENTS {
            return Err(GrammarError::TooManyArguments);
        }
        args.push(field);
    }
    Ok(args)
}

/// Parse one non-skippable line into a [`Record`].
pub fn parse_line(bytes: &[u8]) -> Result<Record<'_>, GrammarError> {
    let line = std::str::from_utf8(bytes).map_err(|_| GrammarError::InvalidUtf8)?;
    let (kind, rest) = classify(line).ok_or(GrammarError::UnknownRecordType)?;
    let args = parse_arguments(rest)?;
    Ok(Record { kind, args })
}

// ============================================================================
// Field Helpers
// ============================================================================

/// Parse an unsigned decimal field of at most [`MAX_DIGITS`] digits.
///
/// Signs, whitespace and values above `u32::MAX` are rejected.
///
/// # Examples
///
/// ```
/// use lcovmerge_parser::parse_unsigned;
///
/// assert_eq!(parse_unsigned("42"), Some(42));
/// assert_eq!(parse_unsigned("+42"), None);
/// assert_eq!(parse_unsigned("4294967296"), None);
/// ```
pub fn parse_unsigned(field: &str) -> Option<u32> {
    if field.is_empty() || field.len() > MAX_DIGITS || !field.bytes().all(|b| b.is_ascii_digit())
    {
        return None;
    }
    field.parse().ok()
}

/// Split an optional `<file>:` qualifier off a function name.
///
/// Returns the qualifier (if any) and the bare function name.
pub fn split_function_name(field: &str) -> (Option<&str>, &str) {
    match field.split_once(':') {
        Some((origin, name)) => (Some(origin), name),
        None => (None, field),
    }
}

// ============================================================================
// Tests
// ============================================================================


// ============================================================================
// Property Tests
// ============================================================================
