//! Coverage data model for lcovmerge.
//!
//! This crate holds the merged view of every tracefile seen so far:
//! [`MergedCoverage`] owns [`TestRecord`]s, each of which owns
//! [`SourceFileInfo`] entries with function, line and branch coverage.
//! Every `accumulate_*` operation validates its input against what is
//! already recorded and only then mutates, so a rejected record leaves the
//! model untouched.
//!
//! Records and files live in flat tables addressed by [`TestId`] and
//! [`FileId`]; ordered name indexes give the exporter a deterministic walk.

use std::collections::BTreeMap;

use lcovmerge_ports::{SourceReadError, SourceReader};
use lcovmerge_types::{Checksum, ErrorKind};
use thiserror::Error;

/// Block and branch ids must be strictly below this value.
pub const INVALID_BRANCH_ID: u32 = u16::MAX as u32;

// ============================================================================
// Errors
// ============================================================================

/// Reasons a coverage fact is rejected by the model.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ModelError {
    /// Line number is zero or beyond the end of the loaded source.
    #[error("invalid line number {line}")]
    LineOutOfRange { line: u32 },

    /// Block or branch id is not below [`INVALID_BRANCH_ID`].
    #[error("invalid {what} id {id}")]
    InvalidBranchId { what: &'static str, id: u32 },

    /// A function was re-declared with a different line or visibility.
    #[error("conflicting function definitions for '{name}': {detail}")]
    FunctionConflict { name: String, detail: String },

    /// Execution data refers to a function never declared in this file.
    #[error("function coverage info references an undefined function '{name}'")]
    UndefinedFunction { name: String },

    /// A line already carries a different checksum.
    #[error("conflicting checksum for line {line}: recorded {recorded}, found {found}")]
    ChecksumConflict {
        line: u32,
        recorded: Checksum,
        found: Checksum,
    },

    /// A file already declares a different format version.
    #[error("version {found} conflicts with the existing version {recorded}")]
    VersionConflict { recorded: u32, found: u32 },

    /// The source text could not be loaded.
    #[error("failed to load source: {0}")]
    SourceUnavailable(SourceReadError),
}

impl ModelError {
    /// Classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ModelError::LineOutOfRange { .. } | ModelError::InvalidBranchId { .. } => {
                ErrorKind::Value
            }
            ModelError::FunctionConflict { .. }
            | ModelError::ChecksumConflict { .. }
            | ModelError::VersionConflict { .. } => ErrorKind::Conflict,
            ModelError::UndefinedFunction { .. } => ErrorKind::Reference,
            ModelError::SourceUnavailable(_) => ErrorKind::Io,
        }
    }
}

// ============================================================================
// Coverage Facts
// ============================================================================

/// Accumulated coverage for one function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FunctionCoverage {
    /// Line the function is declared on.
    pub line: u32,
    /// Summed execution count.
    pub count: u64,
    /// Name was qualified with the originating file's basename.
    pub private: bool,
}

/// Accumulated coverage for one source line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LineCoverage {
    pub count: u64,
    pub checksum: Option<Checksum>,
}

/// Execution state of a single branch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BranchCount {
    /// Reported as `-`: the enclosing block never ran.
    #[default]
    NeverExecuted,
    /// Reported with a count, possibly zero.
    Taken(u64),
}

impl BranchCount {
    /// Combine two reports of the same branch.
    ///
    /// The never-executed sentinel never takes part in arithmetic: it yields
    /// to any real count and survives only when both sides are sentinels.
    ///
    /// # Examples
    ///
    /// ```
    /// use lcovmerge_domain::BranchCount::{NeverExecuted, Taken};
    ///
    /// assert_eq!(NeverExecuted.merge(Taken(3)), Taken(3));
    /// assert_eq!(Taken(2).merge(NeverExecuted), Taken(2));
    /// assert_eq!(NeverExecuted.merge(NeverExecuted), NeverExecuted);
    /// assert_eq!(Taken(2).merge(Taken(3)), Taken(5));
    /// ```
    pub fn merge(self, other: BranchCount) -> BranchCount {
        match (self, other) {
            (BranchCount::Taken(a), BranchCount::Taken(b)) => BranchCount::Taken(a.saturating_add(b)),
            (BranchCount::Taken(a), BranchCount::NeverExecuted) => BranchCount::Taken(a),
            (BranchCount::NeverExecuted, other) => other,
        }
    }

    /// A branch is hit when it ran at least once.
    pub fn is_hit(&self) -> bool {
        matches!(self, BranchCount::Taken(n) if *n > 0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct BranchSlot {
    count: BranchCount,
    defined: bool,
}

/// Blocks reported on one line, indexed by block then branch id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct LineBranches {
    blocks: Vec<Vec<BranchSlot>>,
}

/// One defined branch, as walked by the exporter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BranchRecord {
    pub line: u32,
    pub block: u32,
    pub branch: u32,
    pub count: BranchCount,
}

/// Found/hit counters derived from a file's merged coverage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileSummary {
    pub functions_found: usize,
    pub functions_hit: usize,
    pub lines_found: usize,
    pub lines_hit: usize,
    pub branches_found: usize,
    pub branches_hit: usize,
}

// ============================================================================
// Line Map
// ============================================================================

/// Lazily loaded source text with a per-line offset index.
#[derive(Debug, Clone, Default)]
enum LineMap {
    #[default]
    NotLoaded,
    Loaded {
        content: Vec<u8>,
        /// `offsets[i]` is where line `i + 1` starts; the last entry is the
        /// content length.
        offsets: Vec<usize>,
    },
    Failed(SourceReadError),
}

fn line_offsets(content: &[u8]) -> Vec<usize> {
    let mut offsets = vec![0];
    offsets.extend(
        content
            .iter()
            .enumerate()
            .filter(|(_, b)| **b == b'\n')
            .map(|(i, _)| i + 1),
    );
    if offsets.last().copied() != Some(content.len()) {
        offsets.push(content.len());
    }
    offsets
}

// ============================================================================
// Source Files
// ============================================================================

/// Coverage facts for one instrumented source file within one test.
#[derive(Debug, Clone)]
pub struct SourceFileInfo {
    path: String,
    basename: String,
    version: Option<u32>,
    line_map: LineMap,
    functions: BTreeMap<String, FunctionCoverage>,
    /// Keyed by line number; only reported lines have an entry.
    lines: BTreeMap<u32, LineCoverage>,
    /// Keyed by line number; only lines with a `BRDA` have an entry.
    branches: BTreeMap<u32, LineBranches>,
}

impl SourceFileInfo {
    /// Create an empty entry. The line map is not loaded.
    pub fn new(path: impl Into<String>) -> Self {
        let path = path.into();
        let basename = path
            .rfind(['/', '\\'])
            .map_or(path.as_str(), |pos| &path[pos + 1..])
            .to_string();
        Self {
            path,
            basename,
            version: None,
            line_map: LineMap::NotLoaded,
            functions: BTreeMap::new(),
            lines: BTreeMap::new(),
            branches: BTreeMap::new(),
        }
    }

    /// Full path as given in the `SF` record.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Substring after the last path separator.
    pub fn basename(&self) -> &str {
        &self.basename
    }

    /// Declared format version, if any.
    pub fn version(&self) -> Option<u32> {
        self.version
    }

    /// Record a format version; later declarations must match.
    pub fn set_version(&mut self, version: u32) -> Result<(), ModelError> {
        match self.version {
            Some(recorded) if recorded != version => Err(ModelError::VersionConflict {
                recorded,
                found: version,
            }),
            _ => {
                self.version = Some(version);
                Ok(())
            }
        }
    }

    // ------------------------------------------------------------------------
    // Line map
    // ------------------------------------------------------------------------

    /// Load the source text on first call; later calls return the cached
    /// outcome without touching `reader`.
    pub fn load_line_map(&mut self, reader: &dyn SourceReader) -> Result<(), ModelError> {
        match &self.line_map {
            LineMap::Loaded { .. } => return Ok(()),
            LineMap::Failed(err) => return Err(ModelError::SourceUnavailable(err.clone())),
            LineMap::NotLoaded => {}
        }
        match reader.read_file(&self.path) {
            Ok(content) => {
                let offsets = line_offsets(&content);
                tracing::debug!(path = %self.path, lines = offsets.len() - 1, "loaded line map");
                self.line_map = LineMap::Loaded { content, offsets };
                Ok(())
            }
            Err(err) => {
                tracing::debug!(path = %self.path, error = %err, "line map unavailable");
                self.line_map = LineMap::Failed(err.clone());
                Err(ModelError::SourceUnavailable(err))
            }
        }
    }

    /// Whether the source text has been loaded successfully.
    pub fn is_line_map_loaded(&self) -> bool {
        matches!(self.line_map, LineMap::Loaded { .. })
    }

    /// Number of physical lines in the loaded source.
    pub fn line_count(&self) -> Option<usize> {
        match &self.line_map {
            LineMap::Loaded { offsets, .. } => Some(offsets.len() - 1),
            LineMap::NotLoaded | LineMap::Failed(_) => None,
        }
    }

    /// Any positive line is in range until the source is loaded.
    pub fn is_line_number_in_range(&self, line: u32) -> bool {
        match self.line_count() {
            Some(total) => line > 0 && (line as usize) <= total,
            None => line > 0,
        }
    }

    /// Exact bytes of `line`, optionally without its `\n`/`\r\n` terminator.
    ///
    /// Returns `None` if the source is not loaded or `line` is out of range.
    pub fn read_line_text(&self, line: u32, exclude_terminator: bool) -> Option<&[u8]> {
        let LineMap::Loaded { content, offsets } = &self.line_map else {
            return None;
        };
        if line == 0 || line as usize >= offsets.len() {
            return None;
        }
        let start = offsets[line as usize - 1];
        let end = offsets[line as usize];
        let mut text = &content[start..end];
        if exclude_terminator {
            if let Some(stripped) = text.strip_suffix(b"\n") {
                text = stripped;
            }
            if let Some(stripped) = text.strip_suffix(b"\r") {
                text = stripped;
            }
        }
        Some(text)
    }

    /// Checksum of the on-disk text of `line`.
    pub fn line_digest(&self, line: u32) -> Option<Checksum> {
        self.read_line_text(line, true).map(Checksum::of)
    }

    fn check_line(&self, line: u32) -> Result<(), ModelError> {
        if self.is_line_number_in_range(line) {
            Ok(())
        } else {
            Err(ModelError::LineOutOfRange { line })
        }
    }

    // ------------------------------------------------------------------------
    // Functions
    // ------------------------------------------------------------------------

    /// Declare a function, or confirm an earlier identical declaration.
    pub fn accumulate_function_definition(
        &mut self,
        name: &str,
        line: u32,
        private: bool,
    ) -> Result<(), ModelError> {
        self.check_line(line)?;
        if let Some(existing) = self.functions.get(name) {
            if existing.line != line {
                return Err(ModelError::FunctionConflict {
                    name: name.to_string(),
                    detail: format!("declared on line {}, now line {}", existing.line, line),
                });
            }
            if existing.private != private {
                return Err(ModelError::FunctionConflict {
                    name: name.to_string(),
                    detail: "file qualification differs".to_string(),
                });
            }
            return Ok(());
        }
        self.functions.insert(
            name.to_string(),
            FunctionCoverage {
                line,
                count: 0,
                private,
            },
        );
        Ok(())
    }

    /// Add an execution count to a declared function.
    pub fn accumulate_function_execution(&mut self, name: &str, count: u64) -> Result<(), ModelError> {
        let func = self
            .functions
            .get_mut(name)
            .ok_or_else(|| ModelError::UndefinedFunction {
                name: name.to_string(),
            })?;
        func.count = func.count.saturating_add(count);
        Ok(())
    }

    /// Look up a function by bare name.
    pub fn function(&self, name: &str) -> Option<&FunctionCoverage> {
        self.functions.get(name)
    }

    /// Functions ordered by declaration line, then name.
    pub fn functions_by_line(&self) -> Vec<(&str, &FunctionCoverage)> {
        let mut funcs: Vec<_> = self
            .functions
            .iter()
            .map(|(name, func)| (name.as_str(), func))
            .collect();
        funcs.sort_by(|a, b| a.1.line.cmp(&b.1.line).then_with(|| a.0.cmp(b.0)));
        funcs
    }

    // ------------------------------------------------------------------------
    // Lines
    // ------------------------------------------------------------------------

    /// Recorded checksum of `line`, if any.
    pub fn line_checksum(&self, line: u32) -> Option<Checksum> {
        self.lines.get(&line).and_then(|slot| slot.checksum)
    }

    /// Coverage of `line` if it was ever reported.
    pub fn line(&self, line: u32) -> Option<&LineCoverage> {
        self.lines.get(&line)
    }

    /// Add a line report.
    ///
    /// A `checksum` is stored if the line has none yet; otherwise it must
    /// equal the recorded one.
    pub fn accumulate_line(
        &mut self,
        line: u32,
        count: u64,
        checksum: Option<Checksum>,
    ) -> Result<(), ModelError> {
        self.check_line(line)?;
        if let (Some(recorded), Some(found)) = (self.line_checksum(line), checksum)
            && recorded != found
        {
            return Err(ModelError::ChecksumConflict {
                line,
                recorded,
                found,
            });
        }

        let slot = self.lines.entry(line).or_default();
        if slot.checksum.is_none() {
            slot.checksum = checksum;
        }
        slot.count = slot.count.saturating_add(count);
        Ok(())
    }

    /// Reported lines in ascending order.
    pub fn defined_lines(&self) -> impl Iterator<Item = (u32, &LineCoverage)> {
        self.lines.iter().map(|(line, slot)| (*line, slot))
    }

    // ------------------------------------------------------------------------
    // Branches
    // ------------------------------------------------------------------------

    /// Add a branch report.
    pub fn accumulate_branch(
        &mut self,
        line: u32,
        block: u32,
        branch: u32,
        count: BranchCount,
    ) -> Result<(), ModelError> {
        self.check_line(line)?;
        if block >= INVALID_BRANCH_ID {
            return Err(ModelError::InvalidBranchId {
                what: "block",
                id: block,
            });
        }
        if branch >= INVALID_BRANCH_ID {
            return Err(ModelError::InvalidBranchId {
                what: "branch",
                id: branch,
            });
        }

        let per_line = self.branches.entry(line).or_default();
        let block = block as usize;
        if per_line.blocks.len() <= block {
            per_line.blocks.resize_with(block + 1, Vec::new);
        }
        let branches = &mut per_line.blocks[block];
        let branch = branch as usize;
        if branches.len() <= branch {
            branches.resize_with(branch + 1, BranchSlot::default);
        }
        let slot = &mut branches[branch];
        slot.count = slot.count.merge(count);
        slot.defined = true;
        Ok(())
    }

    /// Reported branches in ascending (line, block, branch) order.
    pub fn defined_branches(&self) -> impl Iterator<Item = BranchRecord> + '_ {
        self.branches.iter().flat_map(|(&line, per_line)| {
            per_line
                .blocks
                .iter()
                .enumerate()
                .flat_map(move |(block, branches)| {
                    branches
                        .iter()
                        .enumerate()
                        .filter(|(_, slot)| slot.defined)
                        .map(move |(branch, slot)| BranchRecord {
                            line,
                            block: block as u32,
                            branch: branch as u32,
                            count: slot.count,
                        })
                })
        })
    }

    /// Recompute found/hit counters from the merged facts.
    pub fn summary(&self) -> FileSummary {
        let mut summary = FileSummary {
            functions_found: self.functions.len(),
            functions_hit: self.functions.values().filter(|f| f.count > 0).count(),
            ..FileSummary::default()
        };
        for (_, line) in self.defined_lines() {
            summary.lines_found += 1;
            if line.count > 0 {
                summary.lines_hit += 1;
            }
        }
        for branch in self.defined_branches() {
            summary.branches_found += 1;
            if branch.count.is_hit() {
                summary.branches_hit += 1;
            }
        }
        summary
    }
}

// ============================================================================
// Test Records
// ============================================================================

/// Handle to a [`SourceFileInfo`] within its [`TestRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileId(usize);

/// Handle to a [`TestRecord`] within [`MergedCoverage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TestId(usize);

/// All coverage facts attributed to one named (or anonymous) test.
#[derive(Debug, Clone)]
pub struct TestRecord {
    name: String,
    files: Vec<SourceFileInfo>,
    index: BTreeMap<String, FileId>,
}

impl TestRecord {
    /// Create an empty record. An empty name is the anonymous test.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            files: Vec::new(),
            index: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Find or create the entry for `path`. Creation does not load sources.
    pub fn get_or_create_source_file(&mut self, path: &str) -> FileId {
        match self.find_file_id(path) {
            Some(id) => id,
            None => self.insert_source_file(SourceFileInfo::new(path)),
        }
    }

    /// Adopt an entry prepared outside the record. An existing entry for
    /// the same path is kept and `info` is dropped.
    pub fn insert_source_file(&mut self, info: SourceFileInfo) -> FileId {
        if let Some(id) = self.find_file_id(info.path()) {
            return id;
        }
        let id = FileId(self.files.len());
        self.index.insert(info.path().to_string(), id);
        self.files.push(info);
        id
    }

    pub fn find_file_id(&self, path: &str) -> Option<FileId> {
        self.index.get(path).copied()
    }

    pub fn file(&self, id: FileId) -> &SourceFileInfo {
        &self.files[id.0]
    }

    pub fn file_mut(&mut self, id: FileId) -> &mut SourceFileInfo {
        &mut self.files[id.0]
    }

    pub fn find_file(&self, path: &str) -> Option<&SourceFileInfo> {
        self.index.get(path).map(|id| &self.files[id.0])
    }

    /// Source files in ascending path order.
    pub fn files(&self) -> impl Iterator<Item = &SourceFileInfo> {
        self.index.values().map(|id| &self.files[id.0])
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }
}

// ============================================================================
// Merged Coverage
// ============================================================================

/// Every test record seen across all merged tracefiles.
#[derive(Debug, Clone, Default)]
pub struct MergedCoverage {
    tests: Vec<TestRecord>,
    index: BTreeMap<String, TestId>,
}

impl MergedCoverage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Find or create the test record called `name`.
    pub fn select_test(&mut self, name: &str) -> TestId {
        if let Some(id) = self.index.get(name) {
            return *id;
        }
        let id = TestId(self.tests.len());
        self.tests.push(TestRecord::new(name));
        self.index.insert(name.to_string(), id);
        id
    }

    pub fn test(&self, id: TestId) -> &TestRecord {
        &self.tests[id.0]
    }

    pub fn test_mut(&mut self, id: TestId) -> &mut TestRecord {
        &mut self.tests[id.0]
    }

    pub fn find_test(&self, name: &str) -> Option<&TestRecord> {
        self.index.get(name).map(|id| &self.tests[id.0])
    }

    pub fn find_test_id(&self, name: &str) -> Option<TestId> {
        self.index.get(name).copied()
    }

    /// Test records in ascending name order.
    pub fn tests(&self) -> impl Iterator<Item = &TestRecord> {
        self.index.values().map(|id| &self.tests[id.0])
    }

    pub fn len(&self) -> usize {
        self.tests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================


// ============================================================================
// Property Tests
// ============================================================================
