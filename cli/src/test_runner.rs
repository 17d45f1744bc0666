use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use jcsv::{Document, ParseError, Parsed};

const TEST_SUFFIX: &str = ".test.jcsv";

#[derive(Debug, Deserialize)]
pub struct ExpectedDiagnostic {
    /// Substring that must appear in the diagnostic message.
    pub contains: String,

    /// If set, the diagnostic's span must start on this 1-based source line.
    #[serde(default)]
    pub line: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TestConfig {
    /// Human-readable test description.
    #[serde(default)]
    pub description: Option<String>,

    /// Table names in table-map order.
    #[serde(default)]
    pub expect_tables: Option<Vec<String>>,

    /// Row count per table.
    #[serde(default)]
    pub expect_rows: Option<BTreeMap<String, usize>>,

    /// `["col:type", ...]` per table, in column order.
    #[serde(default)]
    pub expect_columns: Option<BTreeMap<String, Vec<String>>>,

    /// Resolved reference edges as `block.column->target`, in any order.
    #[serde(default)]
    pub expect_refs: Option<Vec<String>>,

    /// Manifest start line per table. The manifest must have parsed.
    #[serde(default)]
    pub expect_manifest: Option<BTreeMap<String, usize>>,

    /// Expected errors. If present (even empty), count and content are checked.
    #[serde(default)]
    pub expect_errors: Option<Vec<ExpectedDiagnostic>>,

    /// Expected warnings, checked like `expect_errors`.
    #[serde(default)]
    pub expect_warnings: Option<Vec<ExpectedDiagnostic>>,

    /// Writing the document and parsing it again must give the same tables.
    #[serde(default)]
    pub expect_roundtrip: bool,
}

/// Split a `.test.jcsv` file into its TOML config and JCSV source.
fn parse_test_file(content: &str) -> Result<(TestConfig, &str), String> {
    let content = content.trim_start_matches('\u{feff}');

    if !content.starts_with("---") {
        return Err("missing opening --- frontmatter delimiter".into());
    }

    let after_open = &content[3..];
    let after_open = after_open
        .strip_prefix('\n')
        .or_else(|| after_open.strip_prefix("\r\n"))
        .unwrap_or(after_open);

    let close_pos = after_open
        .find("\n---")
        .ok_or("missing closing --- frontmatter delimiter")?;

    let toml_str = after_open[..close_pos].trim_end_matches('\r');
    let rest_start = close_pos + 4; // skip \n---
    let source = after_open[rest_start..]
        .strip_prefix("\r\n")
        .or_else(|| after_open[rest_start..].strip_prefix('\n'))
        .unwrap_or(&after_open[rest_start..]);

    let config: TestConfig = toml::from_str(toml_str).map_err(|e| format!("TOML parse error: {}", e))?;

    Ok((config, source))
}

pub enum TestOutcome {
    Pass,
    Fail(String),
}

pub struct TestResult {
    pub path: PathBuf,
    pub description: Option<String>,
    pub outcome: TestOutcome,
}

fn run_single_test(path: &Path) -> TestResult {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            return TestResult {
                path: path.to_path_buf(),
                description: None,
                outcome: TestOutcome::Fail(format!("cannot read file: {}", e)),
            };
        }
    };

    let (config, source) = match parse_test_file(&content) {
        Ok(pair) => pair,
        Err(e) => {
            return TestResult {
                path: path.to_path_buf(),
                description: None,
                outcome: TestOutcome::Fail(format!("frontmatter error: {}", e)),
            };
        }
    };

    let parsed = jcsv::parse(source);
    let outcome = match check_expectations(&config, source, &parsed) {
        Some(reason) => TestOutcome::Fail(reason),
        None => TestOutcome::Pass,
    };

    TestResult {
        path: path.to_path_buf(),
        description: config.description,
        outcome,
    }
}

/// Check every expectation the config sets. Returns `Some(reason)` on the first mismatch.
fn check_expectations(config: &TestConfig, source: &str, parsed: &Parsed) -> Option<String> {
    let document = &parsed.document;

    // Without explicit error expectations, any error fails the test.
    let expected_errors = config.expect_errors.as_deref().unwrap_or(&[]);
    let errors: Vec<&ParseError> = parsed.errors().collect();
    if let Some(reason) = check_diagnostics("error", source, &errors, expected_errors) {
        return Some(reason);
    }

    if let Some(expected) = &config.expect_warnings {
        let warnings: Vec<&ParseError> = parsed.warnings().collect();
        if let Some(reason) = check_diagnostics("warning", source, &warnings, expected) {
            return Some(reason);
        }
    }

    if let Some(expected) = &config.expect_tables {
        let actual: Vec<&str> = document.table_names().collect();
        if actual != *expected {
            return Some(format!(
                "table mismatch\n  expected: {:?}\n  actual:   {:?}",
                expected, actual
            ));
        }
    }

    if let Some(expected) = &config.expect_rows {
        for (name, rows) in expected {
            let Some(table) = document.table(name) else {
                return Some(format!("expected rows for missing table `{}`", name));
            };
            if table.row_count() != *rows {
                return Some(format!(
                    "table `{}`: expected {} row(s), got {}",
                    name,
                    rows,
                    table.row_count()
                ));
            }
        }
    }

    if let Some(expected) = &config.expect_columns {
        for (name, columns) in expected {
            let Some(table) = document.table(name) else {
                return Some(format!("expected columns for missing table `{}`", name));
            };
            let actual: Vec<String> = table
                .columns()
                .iter()
                .map(|c| format!("{}:{}", c.name, c.data.column_type()))
                .collect();
            if actual != *columns {
                return Some(format!(
                    "table `{}` columns\n  expected: {:?}\n  actual:   {:?}",
                    name, columns, actual
                ));
            }
        }
    }

    if let Some(expected) = &config.expect_refs {
        let mut actual: Vec<String> = document
            .references()
            .into_iter()
            .map(|e| format!("{}.{}->{}", e.from, e.column, e.to))
            .collect();
        let mut expected = expected.clone();
        actual.sort();
        expected.sort();
        if actual != expected {
            return Some(format!(
                "reference mismatch\n  expected: {:?}\n  actual:   {:?}",
                expected, actual
            ));
        }
    }

    if let Some(expected) = &config.expect_manifest {
        let Some(manifest) = document.manifest() else {
            return Some("expected a manifest, but none was read".into());
        };
        let actual: BTreeMap<String, usize> = manifest
            .iter()
            .map(|(name, entry)| (name.to_string(), entry.start_line))
            .collect();
        if actual != *expected {
            return Some(format!(
                "manifest mismatch\n  expected: {:?}\n  actual:   {:?}",
                expected, actual
            ));
        }
    }

    if config.expect_roundtrip {
        if let Some(reason) = check_roundtrip(document) {
            return Some(reason);
        }
    }

    None
}

/// Tables compared by name, column names and types, and rendered cells.
/// Reference handles are arena ids, so they are compared by target name.
fn table_snapshot(document: &Document) -> Vec<(String, Vec<String>, Vec<Vec<String>>)> {
    document
        .tables()
        .map(|(name, table)| {
            let columns = table
                .columns()
                .iter()
                .map(|c| format!("{}:{}", c.name, c.data.column_type()))
                .collect();
            let rows = (0..table.row_count())
                .map(|r| {
                    table
                        .row(r)
                        .unwrap_or_default()
                        .iter()
                        .map(|c| c.to_string())
                        .collect()
                })
                .collect();
            (name.to_string(), columns, rows)
        })
        .collect()
}

fn check_roundtrip(document: &Document) -> Option<String> {
    let written = match jcsv::write_document(document) {
        Ok(text) => text,
        Err(e) => return Some(format!("roundtrip: write failed: {}", e)),
    };
    let reparsed = jcsv::parse(&written);
    if reparsed.has_errors() {
        let msgs: Vec<&str> = reparsed.errors().map(|e| e.message.as_str()).collect();
        return Some(format!("roundtrip: rewritten file has errors: {}", msgs.join("; ")));
    }
    if let Some(warning) = reparsed.warnings().next() {
        return Some(format!("roundtrip: rewritten file has warnings: {}", warning.message));
    }

    let before = table_snapshot(document);
    let after = table_snapshot(&reparsed.document);
    if before != after {
        return Some(format!(
            "roundtrip mismatch\n  before: {:?}\n  after:  {:?}\n  written:\n{}",
            before, after, written
        ));
    }
    None
}

/// Convert a byte offset in `source` to a 1-based line number.
fn byte_offset_to_line(source: &str, offset: usize) -> usize {
    source[..offset.min(source.len())]
        .bytes()
        .filter(|&b| b == b'\n')
        .count()
        + 1
}

/// Check that actual diagnostics match expectations. Returns `Some(reason)` on mismatch.
fn check_diagnostics(
    what: &str,
    source: &str,
    actual: &[&ParseError],
    expected: &[ExpectedDiagnostic],
) -> Option<String> {
    if actual.len() != expected.len() {
        let actual_msgs: Vec<String> = actual.iter().map(|d| format!("  - {}", d.message)).collect();
        return Some(format!(
            "expected {} {}(s), got {}\n  actual {}s:\n{}",
            expected.len(),
            what,
            actual.len(),
            what,
            if actual_msgs.is_empty() {
                "    (none)".to_string()
            } else {
                actual_msgs.join("\n")
            }
        ));
    }

    for (i, (actual, expected)) in actual.iter().zip(expected.iter()).enumerate() {
        if !actual.message.contains(&expected.contains) {
            return Some(format!(
                "{}[{}]: expected message containing \"{}\", got: {}",
                what, i, expected.contains, actual.message
            ));
        }

        if let Some(expected_line) = expected.line {
            let actual_line = byte_offset_to_line(source, actual.span.start);
            if actual_line != expected_line {
                return Some(format!(
                    "{}[{}]: expected on line {}, but span is on line {}",
                    what, i, expected_line, actual_line
                ));
            }
        }
    }

    None
}

/// Discover `.test.jcsv` files grouped by category (subfolder relative to root).
/// Files directly in `root` get category "" (uncategorized).
fn discover_categorized(root: &Path) -> BTreeMap<String, Vec<PathBuf>> {
    let mut categories: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();
    collect_tests(root, root, &mut categories);
    for files in categories.values_mut() {
        files.sort();
    }
    categories
}

fn collect_tests(dir: &Path, root: &Path, out: &mut BTreeMap<String, Vec<PathBuf>>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_tests(&path, root, out);
        } else if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            if name.ends_with(TEST_SUFFIX) {
                let category = path
                    .parent()
                    .and_then(|p| p.strip_prefix(root).ok())
                    .map(|p| p.to_string_lossy().replace('\\', "/"))
                    .unwrap_or_default();
                out.entry(category).or_default().push(path);
            }
        }
    }
}

/// List available categories for the given test path.
pub fn list_categories(path: &Path) {
    if path.is_file() {
        eprintln!("(single file, no categories)");
        return;
    }

    let categories = discover_categorized(path);
    if categories.is_empty() {
        eprintln!("no {} files found in {}", TEST_SUFFIX, path.display());
        return;
    }

    eprintln!("available categories:");
    for (cat, files) in &categories {
        let label = if cat.is_empty() { "(root)" } else { cat.as_str() };
        eprintln!("  {} ({} tests)", label, files.len());
    }
}

fn pass_label(no_color: bool) -> &'static str {
    if no_color { "PASS" } else { "\x1b[32mPASS\x1b[0m" }
}

fn fail_label(no_color: bool) -> &'static str {
    if no_color { "FAIL" } else { "\x1b[31mFAIL\x1b[0m" }
}

fn bold(s: &str, no_color: bool) -> String {
    if no_color {
        s.to_string()
    } else {
        format!("\x1b[1m{}\x1b[0m", s)
    }
}

fn label_for<'a>(result: &'a TestResult) -> &'a str {
    result
        .description
        .as_deref()
        .unwrap_or_else(|| result.path.file_name().and_then(|s| s.to_str()).unwrap_or("?"))
}

fn print_failures(failures: &[TestResult]) {
    eprintln!();
    eprintln!("failures:");
    for f in failures {
        eprintln!();
        eprintln!("  --- {} ---", f.path.display());
        if let TestOutcome::Fail(reason) = &f.outcome {
            for line in reason.lines() {
                eprintln!("  {}", line);
            }
        }
    }
}

fn print_summary(passed: usize, failed: usize, no_color: bool) -> i32 {
    eprintln!();
    if failed == 0 {
        let ok = if no_color { "ok" } else { "\x1b[32mok\x1b[0m" };
        eprintln!("test result: {}. {} passed, 0 failed", ok, passed);
        0
    } else {
        let label = if no_color { "FAILED" } else { "\x1b[31mFAILED\x1b[0m" };
        eprintln!(
            "test result: {}. {} passed, {} failed (of {})",
            label,
            passed,
            failed,
            passed + failed
        );
        1
    }
}

/// Run all `.test.jcsv` files under `path` (or a single file).
/// If `categories` is non-empty, only run tests in those categories.
/// Returns exit code: 0 = all pass, 1 = any failure.
pub fn run_tests(path: &Path, no_color: bool, categories: &[String]) -> i32 {
    if path.is_file() {
        let result = run_single_test(path);
        return match &result.outcome {
            TestOutcome::Pass => {
                eprintln!("  {}  {}", pass_label(no_color), label_for(&result));
                print_summary(1, 0, no_color)
            }
            TestOutcome::Fail(_) => {
                eprintln!("  {}  {}", fail_label(no_color), label_for(&result));
                print_failures(std::slice::from_ref(&result));
                print_summary(0, 1, no_color)
            }
        };
    }

    let all_categories = discover_categorized(path);

    if all_categories.is_empty() {
        eprintln!("no {} files found in {}", TEST_SUFFIX, path.display());
        return 1;
    }

    let run_categories: BTreeMap<&str, &Vec<PathBuf>> = if categories.is_empty() {
        all_categories.iter().map(|(k, v)| (k.as_str(), v)).collect()
    } else {
        let mut filtered = BTreeMap::new();
        for requested in categories {
            let req = requested.trim_matches('/');
            let mut found = false;
            for (cat, files) in &all_categories {
                if cat == req || cat.starts_with(&format!("{}/", req)) {
                    filtered.insert(cat.as_str(), files);
                    found = true;
                }
            }
            if !found {
                eprintln!(
                    "warning: category '{}' not found (available: {})",
                    req,
                    all_categories
                        .keys()
                        .map(|k| if k.is_empty() { "(root)" } else { k.as_str() })
                        .collect::<Vec<_>>()
                        .join(", ")
                );
            }
        }
        filtered
    };

    if run_categories.is_empty() {
        eprintln!("no matching categories found");
        return 1;
    }

    let mut passed = 0usize;
    let mut failed = 0usize;
    let mut failures: Vec<TestResult> = Vec::new();

    for (cat, files) in &run_categories {
        let header = if cat.is_empty() { "(root)" } else { cat };
        eprintln!();
        eprintln!("{}", bold(header, no_color));

        for file in *files {
            let result = run_single_test(file);
            match &result.outcome {
                TestOutcome::Pass => {
                    passed += 1;
                    eprintln!("  {}  {}", pass_label(no_color), label_for(&result));
                }
                TestOutcome::Fail(_) => {
                    failed += 1;
                    eprintln!("  {}  {}", fail_label(no_color), label_for(&result));
                    failures.push(result);
                }
            }
        }
    }

    if !failures.is_empty() {
        print_failures(&failures);
    }
    print_summary(passed, failed, no_color)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frontmatter_is_split_from_source() {
        let content = "---\ndescription = \"two tables\"\nexpect_tables = [\"a\", \"b\"]\n---\n#a\nx\n1\n";
        let (config, source) = parse_test_file(content).unwrap();
        assert_eq!(config.description.as_deref(), Some("two tables"));
        assert_eq!(config.expect_tables, Some(vec!["a".to_string(), "b".to_string()]));
        assert!(!config.expect_roundtrip);
        assert_eq!(source, "#a\nx\n1\n");
    }

    #[test]
    fn frontmatter_with_crlf_and_tables() {
        let content = "---\r\nexpect_roundtrip = true\r\n[expect_rows]\r\nt = 2\r\n---\r\n#t\r\n";
        let (config, source) = parse_test_file(content).unwrap();
        assert!(config.expect_roundtrip);
        assert_eq!(config.expect_rows.unwrap().get("t"), Some(&2));
        assert_eq!(source, "#t\r\n");
    }

    #[test]
    fn missing_delimiters() {
        assert!(parse_test_file("#t\nx\n").is_err());
        assert!(parse_test_file("---\ndescription = \"x\"\n").is_err());
    }

    #[test]
    fn unexpected_error_fails_without_expectations() {
        let source = "#bad\na\n1,2\n";
        let parsed = jcsv::parse(source);
        let reason = check_expectations(&TestConfig::default(), source, &parsed).unwrap();
        assert!(reason.contains("expected 0 error(s), got 1"), "{}", reason);
    }

    #[test]
    fn diagnostic_lines_are_checked() {
        let source = "#t\nx\n1\n\n#t\nx\n2\n";
        let parsed = jcsv::parse(source);
        let mut config = TestConfig {
            expect_warnings: Some(vec![ExpectedDiagnostic {
                contains: "replaces".into(),
                line: Some(5),
            }]),
            ..TestConfig::default()
        };
        assert_eq!(check_expectations(&config, source, &parsed), None);

        config.expect_warnings = Some(vec![ExpectedDiagnostic {
            contains: "replaces".into(),
            line: Some(1),
        }]);
        assert!(check_expectations(&config, source, &parsed).is_some());
    }

    #[test]
    fn roundtrip_of_a_typed_document() {
        let parsed = jcsv::parse("#a{dtypes=[n:int]}\nn,s\n1,x\n\n#b{refs=[r]}\nr\na\n");
        assert_eq!(check_roundtrip(&parsed.document), None);
    }
}
