use parley::markup::{
    MAX_NESTING_DEPTH, ParseErrorKind, Position, parse_markup, parse_markup_bytes,
};
use parley::models::{GenericValue, Number};

#[test]
fn parses_nested_conversation_into_generic_tree() {
    let value = parse_markup(
        r#"
id: c1
messages:
  - role: user
    content:
      - type: text
        text: hello
"#,
        "a.yaml",
    )
    .expect("document should parse");

    assert_eq!(value.get("id"), Some(&GenericValue::String("c1".to_string())));
    let messages = value
        .get("messages")
        .and_then(GenericValue::as_sequence)
        .expect("messages should be a sequence");
    assert_eq!(messages.len(), 1);
    assert_eq!(
        messages[0].get("role").and_then(GenericValue::as_str),
        Some("user")
    );
}

#[test]
fn scalars_keep_their_types() {
    let value = parse_markup(
        "count: 3\nratio: 0.5\nflag: true\nnothing: ~\nbig: 18446744073709551615\n",
        "scalars.yaml",
    )
    .expect("scalars should parse");

    assert_eq!(value.get("count"), Some(&GenericValue::Number(Number::Int(3))));
    assert_eq!(
        value.get("ratio"),
        Some(&GenericValue::Number(Number::Float(0.5)))
    );
    assert_eq!(value.get("flag"), Some(&GenericValue::Bool(true)));
    assert_eq!(value.get("nothing"), Some(&GenericValue::Null));
    assert_eq!(
        value.get("big"),
        Some(&GenericValue::Number(Number::UInt(u64::MAX)))
    );
}

#[test]
fn timestamp_scalars_become_timestamps() {
    let value = parse_markup(
        "created: 2026-02-05T07:00:03Z\nday: 2026-02-05\nlabel: not-a-date\n",
        "times.yaml",
    )
    .expect("timestamps should parse");

    assert_eq!(
        value.get("created").map(GenericValue::kind_name),
        Some("timestamp")
    );
    assert_eq!(value.get("day").map(GenericValue::kind_name), Some("timestamp"));
    assert_eq!(value.get("label").map(GenericValue::kind_name), Some("string"));
}

#[test]
fn quoted_scalars_are_never_retyped() {
    let value = parse_markup(
        r#"
id: "2026-02-05 07:00:03"
single: '2026-02-05'
count: "3"
flag: 'true'
nothing: "~"
block: |
  2026-02-05
"#,
        "quoted.yaml",
    )
    .expect("quoted scalars should parse");

    assert_eq!(
        value.get("id"),
        Some(&GenericValue::String("2026-02-05 07:00:03".to_string()))
    );
    assert_eq!(
        value.get("single"),
        Some(&GenericValue::String("2026-02-05".to_string()))
    );
    assert_eq!(value.get("count"), Some(&GenericValue::String("3".to_string())));
    assert_eq!(value.get("flag"), Some(&GenericValue::String("true".to_string())));
    assert_eq!(value.get("nothing"), Some(&GenericValue::String("~".to_string())));
    assert_eq!(
        value.get("block"),
        Some(&GenericValue::String("2026-02-05\n".to_string()))
    );
}

fn nested_sequences(depth: usize) -> String {
    format!("{}{}", "[".repeat(depth), "]".repeat(depth))
}

#[test]
fn nesting_up_to_the_limit_is_accepted() {
    let value = parse_markup(&nested_sequences(MAX_NESTING_DEPTH), "deep.yaml")
        .expect("nesting at the limit should parse");

    let mut depth = 0;
    let mut node = &value;
    while let Some(items) = node.as_sequence() {
        depth += 1;
        match items.first() {
            Some(child) => node = child,
            None => break,
        }
    }
    assert_eq!(depth, MAX_NESTING_DEPTH);
}

#[test]
fn nesting_past_the_limit_is_a_syntax_error() {
    let error = parse_markup(&nested_sequences(MAX_NESTING_DEPTH + 1), "deeper.yaml")
        .expect_err("nesting past the limit must fail");

    assert_eq!(error.kind, ParseErrorKind::Syntax);
    assert!(error.position.is_some());
    assert!(error.message.contains("nesting deeper than"), "{}", error.message);
}

#[test]
fn aliases_cannot_nest_past_the_limit() {
    let half = MAX_NESTING_DEPTH / 2 + 1;
    let text = format!(
        "base: &deep {}
wrapped: {}*deep{}
",
        nested_sequences(half),
        "[".repeat(half),
        "]".repeat(half)
    );
    let error = parse_markup(&text, "alias-depth.yaml").expect_err("aliased depth counts");

    assert_eq!(error.kind, ParseErrorKind::Syntax);
    assert!(error.message.contains("nests deeper"), "{}", error.message);
}

#[test]
fn alias_expansion_is_bounded() {
    let mut text = "l0: &l0 [x, x, x, x, x, x, x, x, x, x]\n".to_string();
    for level in 1..=6 {
        let refs = vec![format!("*l{}", level - 1); 10].join(", ");
        text.push_str(&format!("l{level}: &l{level} [{refs}]\n"));
    }

    let error = parse_markup(&text, "laughs.yaml").expect_err("expansion must be capped");
    assert_eq!(error.kind, ParseErrorKind::Syntax);
    assert!(error.message.contains("aliases expand"), "{}", error.message);
}

#[test]
fn rejects_object_construction_tags() {
    let error = parse_markup(
        "id: c1\npayload: !python/object/apply:os.system [\"echo pwned\"]\n",
        "evil.yaml",
    )
    .expect_err("tagged values must be refused");

    assert_eq!(error.kind, ParseErrorKind::Syntax);
    assert_eq!(error.origin, "evil.yaml");
    assert!(
        error.message.contains("explicit tag"),
        "unexpected message: {}",
        error.message
    );
}

#[test]
fn rejects_custom_tags_on_scalars() {
    let error = parse_markup("value: !custom 42\n", "custom.yaml")
        .expect_err("custom tags must be refused");

    assert_eq!(error.kind, ParseErrorKind::Syntax);
    assert!(error.message.contains("$.value"), "unexpected message: {}", error.message);
}

#[test]
fn syntax_errors_carry_a_position() {
    let error = parse_markup("id: b\nmessages: [unclosed\n", "b.yaml")
        .expect_err("unterminated flow sequence must fail");

    assert_eq!(error.kind, ParseErrorKind::Syntax);
    let position = error.position.expect("the scanner reports a mark");
    assert!(position.line >= 1 && position.column >= 1, "unexpected position: {position:?}");
    assert!(error.to_string().starts_with("b.yaml: syntax error at line"));
}

#[test]
fn invalid_utf8_is_an_encoding_error_with_position() {
    let error = parse_markup_bytes(b"id: c1\nname: \xff\n", "bytes.yaml")
        .expect_err("invalid utf-8 must fail");

    assert_eq!(error.kind, ParseErrorKind::Encoding);
    assert_eq!(error.position, Some(Position { line: 2, column: 7 }));
}

#[test]
fn byte_order_mark_and_blank_documents_are_accepted() {
    let value = parse_markup_bytes("\u{feff}id: c1\n".as_bytes(), "bom.yaml")
        .expect("leading BOM should be ignored");
    assert_eq!(value.get("id").and_then(GenericValue::as_str), Some("c1"));

    let empty = parse_markup("  \n\n", "empty.yaml").expect("blank input should parse");
    assert_eq!(empty, GenericValue::Null);
}

#[test]
fn scalar_mapping_keys_are_stringified() {
    let value = parse_markup("1: one\ntrue: yes\n~: nothing\n", "keys.yaml")
        .expect("scalar keys should parse");

    let mapping = value.as_mapping().expect("root should be a mapping");
    let keys = mapping.keys().map(String::as_str).collect::<Vec<_>>();
    assert_eq!(keys, vec!["1", "null", "true"]);
}

#[test]
fn collection_mapping_keys_are_rejected() {
    let error = parse_markup("? [a, b]\n: value\n", "complex.yaml")
        .expect_err("sequence keys must fail");

    assert_eq!(error.kind, ParseErrorKind::Syntax);
    assert!(error.message.contains("must be a scalar"));
}

#[test]
fn merge_keys_are_applied() {
    let value = parse_markup(
        r#"
base: &base
  role: user
message:
  <<: *base
  text: hi
"#,
        "merge.yaml",
    )
    .expect("merge keys should parse");

    let message = value.get("message").expect("message should exist");
    assert_eq!(message.get("role").and_then(GenericValue::as_str), Some("user"));
    assert_eq!(message.get("text").and_then(GenericValue::as_str), Some("hi"));
    assert!(message.get("<<").is_none());
}

#[test]
fn explicit_keys_override_merged_keys() {
    let value = parse_markup(
        "base: &base {role: user, text: base}\nmessage:\n  text: own\n  <<: *base\n",
        "override.yaml",
    )
    .expect("merge keys should parse");

    let message = value.get("message").expect("message should exist");
    assert_eq!(message.get("text").and_then(GenericValue::as_str), Some("own"));
    assert_eq!(message.get("role").and_then(GenericValue::as_str), Some("user"));
}

#[test]
fn quoted_merge_key_is_an_ordinary_key() {
    let value = parse_markup("\"<<\": literal\n", "quoted-merge.yaml")
        .expect("quoted merge key should parse");

    assert_eq!(value.get("<<").and_then(GenericValue::as_str), Some("literal"));
}

#[test]
fn duplicate_keys_and_multiple_documents_fail() {
    let duplicate = parse_markup("a: 1\na: 2\n", "dup.yaml").expect_err("duplicate keys must fail");
    assert_eq!(duplicate.kind, ParseErrorKind::Syntax);

    let multi = parse_markup("a: 1\n---\nb: 2\n", "multi.yaml")
        .expect_err("multi-document streams must fail");
    assert_eq!(multi.kind, ParseErrorKind::Syntax);
}
