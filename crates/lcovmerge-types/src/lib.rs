//! Core types shared across lcovmerge.
//!
//! This crate defines the LCOV record vocabulary, the line checksum
//! primitive (a 16-byte MD5 digest carried as standard base64), and the
//! error-kind registry used to classify merge failures.

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use md5::{Digest, Md5};
use thiserror::Error;

// ============================================================================
// Record Types
// ============================================================================

/// The closed set of LCOV record types understood by the merger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordType {
    /// `TN:<test name>`
    TestName,
    /// `SF:<source file path>`
    SourceFile,
    /// `VER:<version>`
    Version,
    /// `FN:<line>,<function>`
    FunctionDef,
    /// `FNDA:<count>,<function>`
    FunctionData,
    /// `FNF:<count>`
    FunctionsFound,
    /// `FNH:<count>`
    FunctionsHit,
    /// `DA:<line>,<count>[,<checksum>]`
    LineData,
    /// `BRDA:<line>,<block>,<branch>,<count|->`
    BranchData,
    /// `BRF:<count>`
    BranchesFound,
    /// `BRH:<count>`
    BranchesHit,
    /// `LF:<count>`
    LinesFound,
    /// `LH:<count>`
    LinesHit,
    /// `end_of_record`
    EndOfRecord,
}

/// Literal line that terminates a source-file section.
pub const END_OF_RECORD: &str = "end_of_record";

impl RecordType {
    /// The keyword that introduces this record in a tracefile.
    ///
    /// # Examples
    ///
    /// ```
    /// use lcovmerge_types::RecordType;
    ///
    /// assert_eq!(RecordType::BranchData.keyword(), "BRDA");
    /// assert_eq!(RecordType::EndOfRecord.keyword(), "end_of_record");
    /// ```
    pub fn keyword(&self) -> &'static str {
        match self {
            RecordType::TestName => "TN",
            RecordType::SourceFile => "SF",
            RecordType::Version => "VER",
            RecordType::FunctionDef => "FN",
            RecordType::FunctionData => "FNDA",
            RecordType::FunctionsFound => "FNF",
            RecordType::FunctionsHit => "FNH",
            RecordType::LineData => "DA",
            RecordType::BranchData => "BRDA",
            RecordType::BranchesFound => "BRF",
            RecordType::BranchesHit => "BRH",
            RecordType::LinesFound => "LF",
            RecordType::LinesHit => "LH",
            RecordType::EndOfRecord => END_OF_RECORD,
        }
    }

    /// Look up a record type by the prefix before the first `:`.
    ///
    /// `end_of_record` is not a prefix keyword and is never returned here.
    pub fn from_prefix(prefix: &str) -> Option<RecordType> {
        let record = match prefix {
            "TN" => RecordType::TestName,
            "SF" => RecordType::SourceFile,
            "FN" => RecordType::FunctionDef,
            "DA" => RecordType::LineData,
            "LF" => RecordType::LinesFound,
            "LH" => RecordType::LinesHit,
            "FNF" => RecordType::FunctionsFound,
            "FNH" => RecordType::FunctionsHit,
            "BRF" => RecordType::BranchesFound,
            "BRH" => RecordType::BranchesHit,
            "VER" => RecordType::Version,
            "FNDA" => RecordType::FunctionData,
            "BRDA" => RecordType::BranchData,
            _ => return None,
        };
        Some(record)
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}>", self.keyword())
    }
}

// ============================================================================
// Line Checksums
// ============================================================================

/// Size in bytes of a line checksum digest.
pub const CHECKSUM_LEN: usize = 16;

/// Length of a standard, padded base64 encoding of `len` bytes.
pub const fn encoded_len(len: usize) -> usize {
    len.div_ceil(3) * 4
}

/// Length of an encoded line checksum: 16 bytes encode to 24 characters,
/// the last two of which are `=` padding.
pub const ENCODED_CHECKSUM_LEN: usize = encoded_len(CHECKSUM_LEN);

/// Errors produced when decoding a checksum field.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChecksumError {
    /// The encoded text has the wrong number of characters.
    #[error("invalid checksum length: expected {expected} characters, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    /// The text is not canonical standard base64.
    #[error("invalid checksum encoding: {0}")]
    InvalidEncoding(String),
}

/// MD5 digest of a single source line, excluding its terminator.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Checksum([u8; CHECKSUM_LEN]);

impl Checksum {
    /// Compute the digest of `data`.
    ///
    /// # Examples
    ///
    /// ```
    /// use lcovmerge_types::Checksum;
    ///
    /// let sum = Checksum::of(b"");
    /// assert_eq!(sum.encode(), "1B2M2Y8AsgTpgAmY7PhCfg==");
    /// ```
    pub fn of(data: &[u8]) -> Self {
        let digest = Md5::digest(data);
        let mut bytes = [0u8; CHECKSUM_LEN];
        bytes.copy_from_slice(&digest);
        Self(bytes)
    }

    /// Standard padded base64 form, as written in `DA` records.
    pub fn encode(&self) -> String {
        STANDARD.encode(self.0)
    }

    /// Decode a `DA` checksum field.
    ///
    /// Rejects text that is not exactly [`ENCODED_CHECKSUM_LEN`] characters,
    /// contains characters outside the standard alphabet, or is padded
    /// incorrectly.
    pub fn decode(text: &str) -> Result<Self, ChecksumError> {
        if text.len() != ENCODED_CHECKSUM_LEN {
            return Err(ChecksumError::InvalidLength {
                expected: ENCODED_CHECKSUM_LEN,
                actual: text.len(),
            });
        }
        let decoded = STANDARD
            .decode(text)
            .map_err(|e| ChecksumError::InvalidEncoding(e.to_string()))?;
        let bytes: [u8; CHECKSUM_LEN] =
            decoded
                .try_into()
                .map_err(|v: Vec<u8>| ChecksumError::InvalidLength {
                    expected: CHECKSUM_LEN,
                    actual: v.len(),
                })?;
        Ok(Self(bytes))
    }
}

impl fmt::Debug for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Checksum({})", self.encode())
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

// ============================================================================
// Error Kinds
// ============================================================================

/// Classification of every failure the merger can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Unclassifiable record or malformed argument list.
    Grammar,
    /// Record appears without the TN/SF context it needs.
    Context,
    /// Non-numeric or out-of-range field, malformed checksum.
    Value,
    /// A re-declaration disagrees with the recorded value.
    Conflict,
    /// Data for an undeclared function, or a function from another file.
    Reference,
    /// Input or source file unreadable, output unwritable.
    Io,
}

impl ErrorKind {
    /// Stable machine-readable name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Grammar => "grammar",
            ErrorKind::Context => "context",
            ErrorKind::Value => "value",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Reference => "reference",
            ErrorKind::Io => "io",
        }
    }

    /// Look up the registry entry for this kind.
    pub fn info(&self) -> &'static KindInfo {
        // The registry is declared in enum order.
        &KIND_REGISTRY[*self as usize]
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Human-facing description of an [`ErrorKind`].
#[derive(Debug, Clone, Copy)]
pub struct KindInfo {
    pub kind: ErrorKind,
    pub name: &'static str,
    /// One-line hint printed after a fatal error of this kind.
    pub remediation: &'static str,
}

/// Registry of all error kinds.
pub const KIND_REGISTRY: &[KindInfo] = &[
    KindInfo {
        kind: ErrorKind::Grammar,
        name: "GrammarError",
        remediation: "Regenerate the tracefile and ensure it is not truncated or hand-edited.",
    },
    KindInfo {
        kind: ErrorKind::Context,
        name: "ContextError",
        remediation: "Check that every SF section is closed with end_of_record.",
    },
    KindInfo {
        kind: ErrorKind::Value,
        name: "ValueError",
        remediation: "Check line numbers against the current source and counts for overflow.",
    },
    KindInfo {
        kind: ErrorKind::Conflict,
        name: "ConflictError",
        remediation: "Merge only reports produced from the same source revision, or pass --discard-checksum.",
    },
    KindInfo {
        kind: ErrorKind::Reference,
        name: "ReferenceError",
        remediation: "Ensure FN records precede their FNDA records.",
    },
    KindInfo {
        kind: ErrorKind::Io,
        name: "IOError",
        remediation: "Check paths and permissions; use --root to locate relative sources.",
    },
];

// ============================================================================
// Tests
// ============================================================================
