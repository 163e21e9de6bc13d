//! Application orchestration for lcovmerge.
//!
//! This crate drives the merge of one or more LCOV tracefiles:
//!
//! 1. Read each input through a [`SourceReader`]
//! 2. Tokenize and parse every non-blank, non-comment line
//! 3. Dispatch the record to its handler, threading a [`Cursor`] through
//! 4. Render the merged model once every input succeeded
//!
//! The first failure stops the whole run; nothing is rendered.
//!
//! # Example
//!
//! ```rust
//! use lcovmerge_adapters_fs::MemorySourceReader;
//! use lcovmerge_app::{MergeEngine, MergeOptions};
//!
//! let sources = MemorySourceReader::new().with_file("/a.c", "int main;\n");
//! let inputs = MemorySourceReader::new()
//!     .with_file("one.info", "SF:/a.c\nDA:1,2\nend_of_record\n")
//!     .with_file("two.info", "SF:/a.c\nDA:1,3\nend_of_record\n");
//!
//! let mut engine = MergeEngine::new(MergeOptions::default(), sources);
//! engine.merge_file("one.info", &inputs).unwrap();
//! engine.merge_file("two.info", &inputs).unwrap();
//! assert!(engine.render().contains("DA:1,5\n"));
//! ```

use lcovmerge_domain::{BranchCount, FileId, MergedCoverage, ModelError, SourceFileInfo, TestId};
use lcovmerge_parser::{GrammarError, Record, lines, parse_line, parse_unsigned, split_function_name};
use lcovmerge_ports::{SourceReadError, SourceReader};
use lcovmerge_render::render_lcov;
use lcovmerge_types::{Checksum, ChecksumError, ErrorKind, RecordType};
use thiserror::Error;

// ============================================================================
// Options
// ============================================================================

/// Checksum handling for a merge run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOptions {
    /// Ignore checksums supplied in `DA` records.
    pub discard_checksum: bool,
    /// Compute a checksum for every line that has none.
    pub generate_checksum: bool,
}

impl MergeOptions {
    /// Whether source text must be loaded when a file section opens.
    pub fn needs_line_map(&self) -> bool {
        !self.discard_checksum || self.generate_checksum
    }
}

// ============================================================================
// Errors
// ============================================================================

const EXPECTED_END_OF_RECORD: &str = "expected end_of_record";
const NO_MATCHING_SF: &str = "no matching SF record";
const MISSING_TN_OR_SF: &str = "a TN and/or SF record is missing";

/// Failure of a single record handler.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error(transparent)]
    Grammar(#[from] GrammarError),

    #[error(transparent)]
    Model(#[from] ModelError),

    /// The record is not allowed in the current cursor state.
    #[error("{0}")]
    Context(&'static str),

    /// A numeric field is not an unsigned integer of at most ten digits.
    #[error("invalid {field} '{value}'")]
    InvalidNumber { field: &'static str, value: String },

    /// A function name is empty after removing its file qualifier.
    #[error("empty function name")]
    EmptyFunctionName,

    /// A `DA` checksum field could not be decoded.
    #[error("invalid checksum: {0}")]
    InvalidChecksum(#[from] ChecksumError),

    /// The checksum supplied for a line disagrees with the source on disk.
    #[error("checksum mismatch for line {line}: source has {on_disk}, record has {found}")]
    ChecksumMismatch {
        line: u32,
        on_disk: Checksum,
        found: Checksum,
    },

    /// A function is qualified with a file other than the current one.
    #[error("the origin of the function '{origin}' doesn't match the current source file '{basename}'")]
    ForeignFunction { origin: String, basename: String },
}

impl HandlerError {
    /// Classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            HandlerError::Grammar(_) => ErrorKind::Grammar,
            HandlerError::Model(e) => e.kind(),
            HandlerError::Context(_) => ErrorKind::Context,
            HandlerError::InvalidNumber { .. }
            | HandlerError::EmptyFunctionName
            | HandlerError::InvalidChecksum(_) => ErrorKind::Value,
            HandlerError::ChecksumMismatch { .. } => ErrorKind::Conflict,
            HandlerError::ForeignFunction { .. } => ErrorKind::Reference,
        }
    }
}

/// A fatal error located at one line of one input.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{path}:{line}: {}: {reason}", kind.info().name)]
pub struct MergeError {
    /// Input file the failing line belongs to.
    pub path: String,
    /// 1-based line number within `path`.
    pub line: usize,
    /// Record type, when the line could be classified.
    pub record: Option<RecordType>,
    pub kind: ErrorKind,
    pub reason: String,
}

/// Errors that can occur while merging.
#[derive(Debug, Error)]
pub enum AppError {
    /// An input tracefile could not be read.
    #[error("{0}")]
    Read(#[from] SourceReadError),

    /// An input tracefile was rejected.
    #[error("{0}")]
    Merge(#[from] MergeError),
}

impl AppError {
    /// Classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Read(_) => ErrorKind::Io,
            AppError::Merge(e) => e.kind,
        }
    }
}

// ============================================================================
// Cursor
// ============================================================================

/// Position of the parse loop within a tracefile.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Cursor {
    /// No `TN` or `SF` seen yet in this input.
    #[default]
    NoTest,
    /// A test is selected; no file section is open.
    Test(TestId),
    /// A file section is open within a test.
    File(TestId, FileId),
}

// ============================================================================
// Merge Engine
// ============================================================================

/// Accumulates tracefiles into one [`MergedCoverage`].
///
/// `sources` is consulted for the text of instrumented files when
/// checksums are verified or generated.
#[derive(Debug)]
pub struct MergeEngine<S> {
    options: MergeOptions,
    sources: S,
    merged: MergedCoverage,
}

impl<S: SourceReader> MergeEngine<S> {
    pub fn new(options: MergeOptions, sources: S) -> Self {
        Self {
            options,
            sources,
            merged: MergedCoverage::new(),
        }
    }

    /// The model merged so far.
    pub fn merged(&self) -> &MergedCoverage {
        &self.merged
    }

    /// Render the merged model as LCOV text.
    pub fn render(&self) -> String {
        render_lcov(&self.merged)
    }

    /// Read `path` through `inputs` and merge its records.
    pub fn merge_file(&mut self, path: &str, inputs: &dyn SourceReader) -> Result<(), AppError> {
        let content = inputs.read_file(path)?;
        self.merge_text(path, &content)?;
        Ok(())
    }

    /// Merge the records of one tracefile already in memory.
    ///
    /// `path` is only used for diagnostics.
    pub fn merge_text(&mut self, path: &str, content: &[u8]) -> Result<(), MergeError> {
        tracing::info!(path, bytes = content.len(), "merging tracefile");
        let mut cursor = Cursor::NoTest;
        let mut records = 0usize;

        for raw in lines(content) {
            if raw.is_skippable() {
                continue;
            }
            let located = |record: Option<RecordType>, err: HandlerError| MergeError {
                path: path.to_string(),
                line: raw.number,
                record,
                kind: err.kind(),
                reason: err.to_string(),
            };
            let record = parse_line(raw.bytes).map_err(|e| located(None, e.into()))?;
            cursor = self
                .apply(cursor, &record)
                .map_err(|e| located(Some(record.kind), e))
                .inspect_err(|e| {
                    tracing::debug!(path, line = e.line, kind = %e.kind, reason = %e.reason, "record rejected");
                })?;
            records += 1;
        }

        if let Cursor::File(test, file) = cursor {
            tracing::warn!(
                path,
                source = self.merged.test(test).file(file).path(),
                "input ended inside an SF section; closing it"
            );
        }
        tracing::debug!(path, records, "merged tracefile");
        Ok(())
    }

    /// Apply one record to the model and return the next cursor.
    ///
    /// The model is left untouched when an error is returned.
    pub fn apply(&mut self, cursor: Cursor, record: &Record<'_>) -> Result<Cursor, HandlerError> {
        match record.kind {
            RecordType::TestName => {
                record.expect_arity(0..=1, "0 or 1 argument")?;
                let name = record.arg(0).unwrap_or("");
                if let Cursor::File(test, file) = cursor {
                    tracing::warn!(
                        source = self.merged.test(test).file(file).path(),
                        test = name,
                        "TN inside an SF section; closing it"
                    );
                }
                tracing::debug!(test = name, "selecting test");
                Ok(Cursor::Test(self.merged.select_test(name)))
            }
            RecordType::SourceFile => {
                record.expect_arity(1..=1, "1 argument")?;
                let test = match cursor {
                    Cursor::File(..) => return Err(HandlerError::Context(EXPECTED_END_OF_RECORD)),
                    Cursor::Test(test) => Some(test),
                    Cursor::NoTest => self.merged.find_test_id(""),
                };
                let path = record.arg(0).unwrap_or_default();
                tracing::debug!(source = path, "opening source file");
                if !self.options.needs_line_map() {
                    let test = test.unwrap_or_else(|| self.merged.select_test(""));
                    let file = self.merged.test_mut(test).get_or_create_source_file(path);
                    return Ok(Cursor::File(test, file));
                }

                // Entries are only committed once their line map loaded.
                let existing = test.and_then(|t| self.merged.test(t).find_file_id(path).map(|f| (t, f)));
                if let Some((test, file)) = existing {
                    return Ok(Cursor::File(test, file));
                }
                let mut info = SourceFileInfo::new(path);
                info.load_line_map(&self.sources)?;
                let test = test.unwrap_or_else(|| self.merged.select_test(""));
                let file = self.merged.test_mut(test).insert_source_file(info);
                Ok(Cursor::File(test, file))
            }
            RecordType::EndOfRecord => match cursor {
                Cursor::File(test, _) => Ok(Cursor::Test(test)),
                Cursor::NoTest | Cursor::Test(_) => Err(HandlerError::Context(NO_MATCHING_SF)),
            },
            _ => {
                let Cursor::File(test, file) = cursor else {
                    return Err(HandlerError::Context(MISSING_TN_OR_SF));
                };
                let info = self.merged.test_mut(test).file_mut(file);
                apply_file_record(info, record, self.options)?;
                Ok(cursor)
            }
        }
    }
}

// ============================================================================
// Record Handlers
// ============================================================================

/// Handle a record that belongs inside an `SF` section.
fn apply_file_record(
    info: &mut SourceFileInfo,
    record: &Record<'_>,
    options: MergeOptions,
) -> Result<(), HandlerError> {
    match record.kind {
        RecordType::Version => {
            record.expect_arity(1..=1, "1 argument")?;
            let version = number(record, 0, "version")?;
            info.set_version(version)?;
        }
        RecordType::FunctionDef => {
            record.expect_arity(2..=2, "2 arguments")?;
            let line = number(record, 0, "line number")?;
            let (name, private) = function_name(info, record.arg(1).unwrap_or_default())?;
            info.accumulate_function_definition(name, line, private)?;
        }
        RecordType::FunctionData => {
            record.expect_arity(2..=2, "2 arguments")?;
            let count = number(record, 0, "execution count")?;
            let (name, _) = function_name(info, record.arg(1).unwrap_or_default())?;
            info.accumulate_function_execution(name, u64::from(count))?;
        }
        RecordType::LineData => {
            record.expect_arity(2..=3, "2 or 3 arguments")?;
            let line = number(record, 0, "line number")?;
            let count = number(record, 1, "execution count")?;
            let supplied = match record.arg(2) {
                Some(text) if !options.discard_checksum => Some(Checksum::decode(text)?),
                _ => None,
            };
            if !info.is_line_number_in_range(line) {
                return Err(ModelError::LineOutOfRange { line }.into());
            }
            let checksum = match info.line_checksum(line) {
                // accumulate_line compares against the recorded checksum.
                Some(_) => supplied,
                None if options.generate_checksum || supplied.is_some() => {
                    let on_disk = info
                        .line_digest(line)
                        .ok_or(ModelError::LineOutOfRange { line })?;
                    if let Some(found) = supplied
                        && found != on_disk
                    {
                        return Err(HandlerError::ChecksumMismatch {
                            line,
                            on_disk,
                            found,
                        });
                    }
                    Some(on_disk)
                }
                None => None,
            };
            info.accumulate_line(line, u64::from(count), checksum)?;
        }
        RecordType::BranchData => {
            record.expect_arity(4..=4, "4 arguments")?;
            let line = number(record, 0, "line number")?;
            let block = number(record, 1, "block id")?;
            let branch = number(record, 2, "branch id")?;
            let count = match record.arg(3) {
                Some("-") => BranchCount::NeverExecuted,
                _ => BranchCount::Taken(u64::from(number(record, 3, "branch count")?)),
            };
            info.accumulate_branch(line, block, branch, count)?;
        }
        RecordType::FunctionsFound
        | RecordType::FunctionsHit
        | RecordType::LinesFound
        | RecordType::LinesHit
        | RecordType::BranchesFound
        | RecordType::BranchesHit => {
            // Recomputed on export; only the syntax is checked.
            record.expect_arity(1..=1, "1 argument")?;
            number(record, 0, "counter")?;
        }
        // Section records are consumed by MergeEngine::apply.
        RecordType::TestName | RecordType::SourceFile | RecordType::EndOfRecord => {}
    }
    Ok(())
}

fn number(record: &Record<'_>, index: usize, field: &'static str) -> Result<u32, HandlerError> {
    let value = record.arg(index).unwrap_or_default();
    parse_unsigned(value).ok_or_else(|| HandlerError::InvalidNumber {
        field,
        value: value.to_string(),
    })
}

/// Strip and check a `<basename>:` qualifier.
///
/// Returns the bare name and whether it was qualified.
fn function_name<'a>(info: &SourceFileInfo, field: &'a str) -> Result<(&'a str, bool), HandlerError> {
    let (origin, name) = split_function_name(field);
    if let Some(origin) = origin
        && origin != info.basename()
    {
        return Err(HandlerError::ForeignFunction {
            origin: origin.to_string(),
            basename: info.basename().to_string(),
        });
    }
    if name.is_empty() {
        return Err(HandlerError::EmptyFunctionName);
    }
    Ok((name, origin.is_some()))
}

// ============================================================================
// Batch Entry Point
// ============================================================================

/// Outcome of [`merge_inputs`].
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    /// Rendered LCOV text.
    pub output: String,
    pub tests: usize,
    pub source_files: usize,
}

/// Merge every input in order and render the result.
///
/// Inputs are read through `inputs`; instrumented sources through `sources`.
pub fn merge_inputs<P: AsRef<str>, S: SourceReader>(
    paths: &[P],
    options: MergeOptions,
    inputs: &dyn SourceReader,
    sources: S,
) -> Result<MergeOutcome, AppError> {
    let mut engine = MergeEngine::new(options, sources);
    for path in paths {
        engine.merge_file(path.as_ref(), inputs)?;
    }
    let merged = engine.merged();
    let outcome = MergeOutcome {
        output: engine.render(),
        tests: merged.len(),
        source_files: merged.tests().map(|t| t.file_count()).sum(),
    };
    tracing::info!(
        inputs = paths.len(),
        tests = outcome.tests,
        source_files = outcome.source_files,
        "merge complete"
    );
    Ok(outcome)
}

// ============================================================================
// Tests
// ============================================================================


// ============================================================================
// Property Tests
// ============================================================================
