use indexmap::IndexMap;
use pretty_assertions::assert_eq;

use jcsv::metadata::Metadata;
use jcsv::parser::metadata::{DropReason, parse_metadata, parse_metadata_reporting, split_top_level, strip_quotes};
use jcsv::MetaValue;

fn dtypes(pairs: &[(&str, &str)]) -> MetaValue {
    MetaValue::DTypes(pairs.iter().map(|(c, t)| (c.to_string(), t.to_string())).collect::<IndexMap<_, _>>())
}

fn list(items: &[&str]) -> MetaValue {
    MetaValue::List(items.iter().map(|s| s.to_string()).collect())
}

#[test]
fn dtypes_and_refs() {
    let md = parse_metadata("dtypes=[id:int,name:str],refs=[orders]");
    assert_eq!(md.len(), 2);
    assert_eq!(md.get("dtypes"), Some(&dtypes(&[("id", "int"), ("name", "str")])));
    assert_eq!(md.get("refs"), Some(&list(&["orders"])));
    assert_eq!(md.refs(), vec!["orders"]);
}

#[test]
fn split_ignores_commas_inside_brackets() {
    assert_eq!(split_top_level("a,[b,c],d"), vec!["a", "[b,c]", "d"]);
    assert_eq!(split_top_level(" a , b "), vec!["a", "b"]);
    assert_eq!(split_top_level("x=[[a,b],c],y=1"), vec!["x=[[a,b],c]", "y=1"]);
    assert_eq!(split_top_level(""), vec![""]);
}

#[test]
fn nested_list_items_are_kept_whole() {
    let md = parse_metadata("x=[[a,b],c]");
    assert_eq!(md.get("x"), Some(&list(&["[a,b]", "c"])));
}

#[test]
fn scalars_and_items_are_quote_stripped() {
    let md = parse_metadata(r#"created=2025-07-21,comment="Core users",tags=['a', "b" ,c]"#);
    assert_eq!(md.get("created"), Some(&MetaValue::Scalar("2025-07-21".into())));
    assert_eq!(md.comment(), Some("Core users"));
    assert_eq!(md.get("tags"), Some(&list(&["a", "b", "c"])));

    assert_eq!(strip_quotes("\"x\""), "x");
    assert_eq!(strip_quotes("'x'"), "x");
    assert_eq!(strip_quotes("\"x'"), "\"x'");
    assert_eq!(strip_quotes("\""), "\"");
}

#[test]
fn tokens_without_equals_are_dropped_and_reported() {
    let (md, dropped) = parse_metadata_reporting("a=1,oops,b=2,");
    assert_eq!(md.len(), 2);
    assert_eq!(md.get("a"), Some(&MetaValue::Scalar("1".into())));
    assert_eq!(md.get("b"), Some(&MetaValue::Scalar("2".into())));

    assert_eq!(dropped.len(), 1);
    assert_eq!(dropped[0].token, "oops");
    assert_eq!(dropped[0].span, 4..8);
    assert_eq!(dropped[0].reason, DropReason::MissingEquals);
}

#[test]
fn malformed_dtype_items_are_dropped() {
    let (md, dropped) = parse_metadata_reporting("dtypes=[id:int, oops, score : float]");
    assert_eq!(md.get("dtypes"), Some(&dtypes(&[("id", "int"), ("score", "float")])));
    assert_eq!(dropped.len(), 1);
    assert_eq!(dropped[0].token, "oops");
    assert_eq!(dropped[0].reason, DropReason::MalformedDtype);
}

#[test]
fn scalar_dtypes_is_a_single_item() {
    let md = parse_metadata("dtypes=id:int");
    assert_eq!(md.get("dtypes"), Some(&dtypes(&[("id", "int")])));
}

#[test]
fn empty_list() {
    let md = parse_metadata("refs=[],dtypes=[]");
    assert_eq!(md.get("refs"), Some(&MetaValue::List(vec![])));
    assert_eq!(md.get("dtypes"), Some(&dtypes(&[])));
    assert!(md.refs().is_empty());
}

#[test]
fn later_duplicate_key_wins() {
    let md = parse_metadata("k=1,other=x,k=2");
    let keys: Vec<&str> = md.iter().map(|(k, _)| k).collect();
    assert_eq!(keys, vec!["k", "other"]);
    assert_eq!(md.get("k"), Some(&MetaValue::Scalar("2".into())));
}

#[test]
fn comma_in_quoted_value_splits_the_token() {
    // Quotes do not protect commas from the splitter.
    let (md, dropped) = parse_metadata_reporting(r#"comment="hello, world""#);
    assert_eq!(md.comment(), Some("\"hello"));
    assert_eq!(dropped.len(), 1);
    assert_eq!(dropped[0].token, "world\"");
}

#[test]
fn display_round_trips() {
    let mut md = Metadata::new();
    md.insert("dtypes", dtypes(&[("id", "int"), ("name", "str")]));
    md.insert("refs", list(&["user", "order"]));
    md.insert("comment", MetaValue::Scalar("two words".into()));
    md.insert("empty", MetaValue::Scalar(String::new()));
    md.insert("odd", MetaValue::Scalar("a=b".into()));

    let text = md.to_string();
    assert_eq!(text, r#"dtypes=[id:int,name:str],refs=[user,order],comment=two words,empty="",odd="a=b""#);
    assert_eq!(parse_metadata(&text), md);
}

#[test]
fn parse_accepts_braces() {
    let md = Metadata::parse("{owner=ops, refs=[a]}");
    assert_eq!(md.get("owner"), Some(&MetaValue::Scalar("ops".into())));
    assert_eq!(md.refs(), vec!["a"]);
    assert_eq!(Metadata::parse("owner=ops").get("owner"), md.get("owner"));
}

#[test]
fn editing_keeps_key_order() {
    let mut md = Metadata::parse("a=1,b=2,c=3");
    md.insert("b", MetaValue::Scalar("20".into()));
    md.remove("a");
    assert_eq!(md.to_string(), "b=20,c=3");

    let md = Metadata::parse("dtypes=[x:int],refs=[y],comment=hi,owner=ops");
    let free: Vec<&str> = md.free_form().map(|(k, _)| k).collect();
    assert_eq!(free, vec!["owner"]);
}

#[test]
fn values_with_top_level_commas_cannot_be_represented() {
    let value = MetaValue::Scalar("a, b".into());
    assert!(!value.is_representable());

    let mut md = Metadata::new();
    md.insert("owner", value);
    let (reparsed, dropped) = parse_metadata_reporting(&md.to_string());
    assert_eq!(reparsed.get("owner"), Some(&MetaValue::Scalar("\"a".into())));
    assert_eq!(dropped.len(), 1);
}

#[test]
fn representable_values_round_trip() {
    let mut md = Metadata::new();
    md.insert("dtypes", dtypes(&[("id", "int")]));
    md.insert("nested", MetaValue::Scalar("[a,b]".into()));
    md.insert("padded", MetaValue::Scalar("  padded ".into()));
    md.insert("items", list(&["[x,y]", "'q"]));
    for (key, value) in md.iter() {
        assert!(value.is_representable(), "{}", key);
    }
    assert_eq!(parse_metadata(&md.to_string()), md);
}

#[test]
fn unbalanced_brackets_and_line_breaks_cannot_be_represented() {
    assert!(!MetaValue::Scalar("close] open[".into()).is_representable());
    assert!(!MetaValue::Scalar("open[".into()).is_representable());
    assert!(!list(&["two\nlines"]).is_representable());
    assert!(!list(&["ok", "a,b"]).is_representable());
    assert!(!dtypes(&[("a:b", "int")]).is_representable());
    assert!(!dtypes(&[(" id", "int")]).is_representable());
}
