//! Rendering of merged coverage back into LCOV tracefile text.
//!
//! The output is deterministic: tests are ordered by name, source files by
//! path, functions by declaration line, lines and branches ascending. Summary
//! counters (`FNF`, `FNH`, `LF`, `LH`, `BRF`, `BRH`) are recomputed from the
//! merged data and never copied from inputs.
//!
//! # Example
//!
//! ```rust
//! use lcovmerge_domain::MergedCoverage;
//! use lcovmerge_render::render_lcov;
//!
//! let mut merged = MergedCoverage::new();
//! let test = merged.select_test("unit");
//! let file = merged.test_mut(test).get_or_create_source_file("/src/a.c");
//! merged.test_mut(test).file_mut(file).accumulate_line(1, 4, None).unwrap();
//!
//! let text = render_lcov(&merged);
//! assert!(text.starts_with("TN:unit\nSF:/src/a.c\n"));
//! assert!(text.ends_with("end_of_record\n"));
//! ```

use std::fmt::Write;

use lcovmerge_domain::{BranchCount, MergedCoverage, SourceFileInfo};
use lcovmerge_types::{END_OF_RECORD, RecordType};

/// Renders every test record in `merged` as LCOV text.
pub fn render_lcov(merged: &MergedCoverage) -> String {
    let mut output = String::new();
    for test in merged.tests() {
        if !test.name().is_empty() {
            record(&mut output, RecordType::TestName, format_args!("{}", test.name()));
        }
        for file in test.files() {
            render_source_file(&mut output, file);
        }
    }
    output
}

/// Renders one `SF` .. `end_of_record` section.
pub fn render_source_file(output: &mut String, file: &SourceFileInfo) {
    let summary = file.summary();

    record(output, RecordType::SourceFile, format_args!("{}", file.path()));
    if let Some(version) = file.version() {
        record(output, RecordType::Version, format_args!("{version}"));
    }

    // Functions
    let functions = file.functions_by_line();
    for (name, func) in &functions {
        let name = qualified_name(file, name, func.private);
        record(output, RecordType::FunctionDef, format_args!("{},{}", func.line, name));
    }
    for (name, func) in &functions {
        let name = qualified_name(file, name, func.private);
        record(output, RecordType::FunctionData, format_args!("{},{}", func.count, name));
    }
    record(output, RecordType::FunctionsFound, format_args!("{}", summary.functions_found));
    record(output, RecordType::FunctionsHit, format_args!("{}", summary.functions_hit));

    // Lines
    for (line, coverage) in file.defined_lines() {
        match coverage.checksum {
            Some(checksum) => record(
                output,
                RecordType::LineData,
                format_args!("{},{},{}", line, coverage.count, checksum),
            ),
            None => record(
                output,
                RecordType::LineData,
                format_args!("{},{}", line, coverage.count),
            ),
        }
    }
    record(output, RecordType::LinesFound, format_args!("{}", summary.lines_found));
    record(output, RecordType::LinesHit, format_args!("{}", summary.lines_hit));

    // Branches
    for branch in file.defined_branches() {
        let taken = match branch.count {
            BranchCount::NeverExecuted => "-".to_string(),
            BranchCount::Taken(count) => count.to_string(),
        };
        record(
            output,
            RecordType::BranchData,
            format_args!("{},{},{},{}", branch.line, branch.block, branch.branch, taken),
        );
    }
    record(output, RecordType::BranchesFound, format_args!("{}", summary.branches_found));
    record(output, RecordType::BranchesHit, format_args!("{}", summary.branches_hit));

    output.push_str(END_OF_RECORD);
    output.push('\n');
}

fn record(output: &mut String, kind: RecordType, args: std::fmt::Arguments<'_>) {
    // Writing into a String cannot fail.
    let _ = writeln!(output, "{}:{}", kind.keyword(), args);
}

fn qualified_name<'a>(file: &SourceFileInfo, name: &'a str, private: bool) -> std::borrow::Cow<'a, str> {
    if private {
        format!("{}:{}", file.basename(), name).into()
    } else {
        name.into()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use lcovmerge_adapters_fs::MemorySourceReader;
    use lcovmerge_types::Checksum;

    fn single_file(name: &str, path: &str) -> (MergedCoverage, lcovmerge_domain::TestId, lcovmerge_domain::FileId) {
        let mut merged = MergedCoverage::new();
        let test = merged.select_test(name);
        let file = merged.test_mut(test).get_or_create_source_file(path);
        (merged, test, file)
    }

    #[test]
    fn test_empty_model_renders_nothing() {
        assert_eq!(render_lcov(&MergedCoverage::new()), "");
    }

    #[test]
    fn test_anonymous_test_has_no_tn_line() {
        let (merged, _, _) = single_file("", "/a.c");
        assert_eq!(
            render_lcov(&merged),
            "SF:/a.c\nFNF:0\nFNH:0\nLF:0\nLH:0\nBRF:0\nBRH:0\nend_of_record\n"
        );
    }

    #[test]
    fn test_full_section_layout() {
        let (mut merged, test, file) = single_file("t", "/src/a.c");
        let sf = merged.test_mut(test).file_mut(file);
        sf.set_version(1).unwrap();
        sf.accumulate_function_definition("foo", 1, false).unwrap();
        sf.accumulate_function_execution("foo", 7).unwrap();
        sf.accumulate_line(1, 6, None).unwrap();
        sf.accumulate_line(2, 0, None).unwrap();
        sf.accumulate_branch(1, 0, 0, BranchCount::Taken(2)).unwrap();
        sf.accumulate_branch(1, 0, 1, BranchCount::NeverExecuted).unwrap();
        sf.accumulate_branch(2, 0, 0, BranchCount::Taken(0)).unwrap();

        let expected = "\
TN:t
SF:/src/a.c
VER:1
FN:1,foo
FNDA:7,foo
FNF:1
FNH:1
DA:1,6
DA:2,0
LF:2
LH:1
BRDA:1,0,0,2
BRDA:1,0,1,-
BRDA:2,0,0,0
BRF:3
BRH:1
end_of_record
";
        assert_eq!(render_lcov(&merged), expected);
    }

    #[test]
    fn test_private_functions_are_requalified() {
        let (mut merged, test, file) = single_file("t", "/src/util.c");
        let sf = merged.test_mut(test).file_mut(file);
        sf.accumulate_function_definition("helper", 4, true).unwrap();
        sf.accumulate_function_definition("api", 2, false).unwrap();
        sf.accumulate_function_execution("helper", 1).unwrap();

        let text = render_lcov(&merged);
        assert!(text.contains("FN:2,api\nFN:4,util.c:helper\n"));
        assert!(text.contains("FNDA:0,api\nFNDA:1,util.c:helper\n"));
        assert!(text.contains("FNF:2\nFNH:1\n"));
    }

    #[test]
    fn test_checksums_are_rendered() {
        let reader = MemorySourceReader::new().with_file("/a.c", "int x;\n");
        let (mut merged, test, file) = single_file("t", "/a.c");
        let sf = merged.test_mut(test).file_mut(file);
        sf.load_line_map(&reader).unwrap();
        let digest = sf.line_digest(1).unwrap();
        sf.accumulate_line(1, 1, Some(digest)).unwrap();

        let text = render_lcov(&merged);
        let expected = format!("DA:1,1,{}\n", Checksum::of(b"int x;").encode());
        assert!(text.contains(&expected), "{text}");
    }

    #[test]
    fn test_tests_and_files_are_sorted() {
        let mut merged = MergedCoverage::new();
        for name in ["zeta", "alpha"] {
            let test = merged.select_test(name);
            for path in ["/b.c", "/a.c"] {
                merged.test_mut(test).get_or_create_source_file(path);
            }
        }
        let headers: Vec<_> = render_lcov(&merged)
            .lines()
            .filter(|l| l.starts_with("TN:") || l.starts_with("SF:"))
            .map(str::to_string)
            .collect();
        assert_eq!(
            headers,
            vec!["TN:alpha", "SF:/a.c", "SF:/b.c", "TN:zeta", "SF:/a.c", "SF:/b.c"]
        );
    }
}
