use pretty_assertions::assert_eq;

use jcsv::{Cell, ColumnData, ColumnType, DiagnosticKind, ManifestEntry, Parsed};

fn parse(source: &str) -> Parsed {
    jcsv::parse(source)
}

fn names(parsed: &Parsed) -> Vec<&str> {
    parsed.document.table_names().collect()
}

fn kinds(parsed: &Parsed) -> Vec<DiagnosticKind> {
    parsed.diagnostics.iter().map(|d| d.kind).collect()
}

const SAMPLE: &str = "\
#manifest
table,start_line,description
users,5,Core user profiles
orders,10,Purchase history

#users{dtypes=[id:int,name:str],comment=\"Core user profiles\"}
id,name
1,Alice
2,Bob

#orders{dtypes=[order_id:int,total:float]}
order_id,user,total
100,1,9.99
200,2,14.50
";

#[test]
fn parses_manifest_and_blocks() {
    let parsed = parse(SAMPLE);
    assert!(!parsed.has_errors(), "{:?}", parsed.diagnostics);
    assert_eq!(names(&parsed), vec!["users", "orders"]);

    let manifest = parsed.document.manifest().expect("manifest");
    assert_eq!(
        manifest.get("users"),
        Some(&ManifestEntry {
            start_line: 5,
            description: "Core user profiles".into()
        })
    );
    assert_eq!(manifest.get("orders").map(|e| e.start_line), Some(10));

    let users = parsed.document.table("users").unwrap();
    assert_eq!(users.row_count(), 2);
    assert_eq!(users.column("id").unwrap().data, ColumnData::Int(vec![Some(1), Some(2)]));
    assert_eq!(
        users.column("name").unwrap().data,
        ColumnData::Text(vec![Some("Alice".into()), Some("Bob".into())])
    );

    let orders = parsed.document.table("orders").unwrap();
    assert_eq!(orders.column("total").unwrap().data, ColumnData::Float(vec![Some(9.99), Some(14.5)]));
    // No dtype entry: stays text.
    assert_eq!(orders.column("user").unwrap().data.column_type(), ColumnType::Text);

    let block = parsed.document.block("users").unwrap();
    assert_eq!(block.line, 6);
    assert_eq!(block.metadata.comment(), Some("Core user profiles"));
}

#[test]
fn manifest_offsets_are_checked_against_headers() {
    let parsed = parse(SAMPLE);
    // users is on line 6 and orders on line 11, one off from the manifest.
    let offsets: Vec<&str> = parsed
        .diagnostics
        .iter()
        .filter(|d| d.kind == DiagnosticKind::ManifestOffset)
        .map(|d| d.block.as_deref().unwrap_or(""))
        .collect();
    assert_eq!(offsets, vec!["users", "orders"]);
    assert!(parsed.diagnostics.iter().all(|d| !d.is_error()));
}

#[test]
fn int_cast_tolerates_missing_values() {
    let parsed = parse("#t{dtypes=[n:int]}\nid,n\na,1\nb,\nc,3\n");
    let t = parsed.document.table("t").unwrap();
    assert_eq!(t.column("n").unwrap().data, ColumnData::Int(vec![Some(1), None, Some(3)]));
    assert_eq!(t.cell(1, 1), Some(Cell::Null));
}

#[test]
fn int_cast_accepts_integral_floats() {
    let parsed = parse("#t{dtypes=[n:int]}\nn\n3.0\n-2\n");
    let t = parsed.document.table("t").unwrap();
    assert_eq!(t.column("n").unwrap().data, ColumnData::Int(vec![Some(3), Some(-2)]));
}

#[test]
fn unknown_dtype_tag_leaves_text() {
    let parsed = parse("#t{dtypes=[n:decimal,missing:int]}\nn\n1.5\n");
    assert!(parsed.diagnostics.is_empty());
    let t = parsed.document.table("t").unwrap();
    assert_eq!(t.column("n").unwrap().data, ColumnData::Text(vec![Some("1.5".into())]));
}

#[test]
fn blank_lines_inside_body_are_dropped() {
    let parsed = parse("#t\n\n\na,b\n1,2\n\n3,4\n   \n5,6\n");
    let t = parsed.document.table("t").unwrap();
    assert_eq!(t.row_count(), 3);
    assert_eq!(t.cell(2, 0), Some(Cell::Text("5")));
}

#[test]
fn short_rows_are_padded() {
    let parsed = parse("#t\na,b,c\n1\n");
    let t = parsed.document.table("t").unwrap();
    assert_eq!(t.row(0), Some(vec![Cell::Text("1"), Cell::Null, Cell::Null]));
}

#[test]
fn quoted_fields() {
    let parsed = parse("#t\nname,note\n\"Smith, J\",\"said \"\"hi\"\"\"\n");
    let t = parsed.document.table("t").unwrap();
    assert_eq!(t.row(0), Some(vec![Cell::Text("Smith, J"), Cell::Text("said \"hi\"")]));
}

#[test]
fn malformed_block_is_skipped() {
    let parsed = parse("#bad\na,b\n1,2,3\n\n#good\nx\n1\n");
    assert_eq!(names(&parsed), vec!["good"]);
    assert!(parsed.has_errors());
    let error = parsed.errors().next().unwrap();
    assert_eq!(error.kind, DiagnosticKind::Block);
    assert_eq!(error.block.as_deref(), Some("bad"));
    assert!(error.message.contains("row 1 has 3 fields"), "{}", error.message);
}

#[test]
fn cast_failure_skips_the_block() {
    let parsed = parse("#t{dtypes=[x:float]}\nx\nabc\n\n#u\ny\n1\n");
    assert_eq!(names(&parsed), vec!["u"]);
    let error = parsed.errors().next().unwrap();
    assert_eq!(error.block.as_deref(), Some("t"));
    assert!(error.message.contains("cannot cast `abc` to float"), "{}", error.message);
}

#[test]
fn duplicate_columns_skip_the_block() {
    let parsed = parse("#t\na,a\n1,2\n");
    assert!(parsed.document.is_empty());
    assert_eq!(kinds(&parsed), vec![DiagnosticKind::Block]);
}

#[test]
fn block_without_column_header() {
    let parsed = parse("#empty\n\n#b\nx\n1\n\n#tail{a=1}\n\n");
    assert_eq!(names(&parsed), vec!["b"]);
    let skipped: Vec<&str> = parsed.errors().filter_map(|e| e.block.as_deref()).collect();
    assert_eq!(skipped, vec!["empty", "tail"]);
}

#[test]
fn header_with_no_rows() {
    let parsed = parse("#t\na,b\n#u\nc\n1\n");
    let t = parsed.document.table("t").unwrap();
    assert_eq!(t.row_count(), 0);
    assert_eq!(t.column_names().collect::<Vec<_>>(), vec!["a", "b"]);
    assert_eq!(parsed.document.table("u").unwrap().row_count(), 1);
}

#[test]
fn later_block_wins_and_keeps_first_position() {
    let parsed = parse("#a\nx\n1\n\n#b\ny\n2\n\n#a\nx\n3\n");
    assert_eq!(names(&parsed), vec!["a", "b"]);
    assert_eq!(parsed.document.blocks().len(), 3);
    assert_eq!(parsed.document.table("a").unwrap().cell(0, 0), Some(Cell::Text("3")));
    assert_eq!(parsed.document.block("a").unwrap().line, 9);

    assert_eq!(kinds(&parsed), vec![DiagnosticKind::DuplicateBlock]);
    assert!(parsed.diagnostics[0].message.contains("line 1"));
    assert!(!parsed.has_errors());
}

#[test]
fn manifest_missing_column_does_not_stop_blocks() {
    let parsed = parse("#manifest\nname,start_line\nt,5\n\n#t\nx\n1\n");
    assert!(parsed.document.manifest().is_none());
    assert_eq!(names(&parsed), vec!["t"]);
    assert_eq!(kinds(&parsed), vec![DiagnosticKind::Manifest]);
    assert!(parsed.diagnostics[0].message.contains("no `table` column"));
}

#[test]
fn manifest_bad_start_line() {
    let parsed = parse("#manifest\ntable,start_line\nt,five\nu,9\n#t\nx\n1\n");
    assert!(parsed.document.manifest().is_none());
    assert!(parsed.diagnostics[0].message.contains("`five` is not an integer"));
    assert_eq!(names(&parsed), vec!["t"]);
}

#[test]
fn manifest_without_header_line() {
    let parsed = parse("\n\n#manifest\n");
    assert!(parsed.document.manifest().is_none());
    assert_eq!(kinds(&parsed), vec![DiagnosticKind::Manifest]);
}

#[test]
fn manifest_naming_missing_block_warns() {
    let parsed = parse("#manifest\ntable,start_line\nghost,5\n\n#t\nx\n1\n");
    assert_eq!(parsed.document.manifest().unwrap().len(), 1);
    assert_eq!(kinds(&parsed), vec![DiagnosticKind::ManifestOffset]);
    assert_eq!(parsed.diagnostics[0].block.as_deref(), Some("ghost"));
}

#[test]
fn manifest_rows_are_plain_comma_split() {
    // No quoting support: the quoted description is cut at its comma.
    let parsed = parse("#manifest\ntable,start_line,description\nt,5,\"a, b\"\n\n#t\nx\n1\n");
    let entry = parsed.document.manifest().unwrap().get("t").unwrap().clone();
    assert_eq!(entry.description, "\"a");
    assert_eq!(entry.start_line, 5);
}

#[test]
fn manifest_only_counts_when_first() {
    let parsed = parse("#t\nx\n1\n\n#manifest\ntable,start_line\nt,1\n");
    assert!(parsed.document.manifest().is_none());
    assert_eq!(names(&parsed), vec!["t", "manifest"]);
}

#[test]
fn stray_lines_are_reported() {
    let parsed = parse("hello\n# a comment\n#t\nx\n1\n");
    assert_eq!(names(&parsed), vec!["t"]);
    assert_eq!(kinds(&parsed), vec![DiagnosticKind::StrayLine, DiagnosticKind::StrayLine]);
    assert_eq!(parsed.diagnostics[0].span, 0..5);
}

#[test]
fn malformed_metadata_token_is_a_warning_with_span() {
    let source = "#t{a=1,oops}\nx\n1\n";
    let parsed = parse(source);
    assert_eq!(kinds(&parsed), vec![DiagnosticKind::Metadata]);
    let span = parsed.diagnostics[0].span.clone();
    assert_eq!(&source[span], "oops");
    assert_eq!(parsed.document.metadata("t").unwrap().len(), 1);
}

#[test]
fn header_line_tolerates_whitespace() {
    let parsed = parse("  #t{dtypes=[x:int]}   \nx\n7\n");
    assert_eq!(parsed.document.table("t").unwrap().cell(0, 0), Some(Cell::Int(7)));
}

#[test]
fn crlf_and_bom() {
    let parsed = parse("\u{feff}#manifest\r\ntable,start_line\r\nt,5\r\n\r\n#t\r\nx\r\n1\r\n");
    assert!(parsed.diagnostics.is_empty(), "{:?}", parsed.diagnostics);
    assert_eq!(parsed.document.manifest().unwrap().get("t").unwrap().start_line, 5);
    assert_eq!(parsed.document.table("t").unwrap().cell(0, 0), Some(Cell::Text("1")));
}

#[test]
fn hash_line_ends_body() {
    let parsed = parse("#t\nx\n1\n  # note\n2\n");
    assert_eq!(parsed.document.table("t").unwrap().row_count(), 1);
    assert_eq!(kinds(&parsed), vec![DiagnosticKind::StrayLine, DiagnosticKind::StrayLine]);
}

#[test]
fn unterminated_quote_does_not_swallow_lines() {
    let parsed = parse("#t\na,b\n\"x,1\ny,2\nz,3\n\n#u\nv\n1\n");
    assert_eq!(names(&parsed), vec!["u"]);
    assert_eq!(kinds(&parsed), vec![DiagnosticKind::Block]);
    let error = parsed.errors().next().unwrap();
    assert_eq!(error.block.as_deref(), Some("t"));
    assert!(error.message.contains("row 1 has an unterminated quote"), "{}", error.message);
}

#[test]
fn unterminated_quote_on_last_row_or_header() {
    let parsed = parse("#t\na,b\n1,2\n\"x,3\n");
    assert!(parsed.document.is_empty());
    assert!(parsed.errors().next().unwrap().message.contains("row 2 has an unterminated quote"));

    let parsed = parse("#t\n\"a,b\n1,2\n");
    assert!(parsed.document.is_empty());
    assert!(parsed.errors().next().unwrap().message.contains("column header has an unterminated quote"));
}
