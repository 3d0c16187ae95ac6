use sigmaspl_parser::{SigmaParserError, parse_condition, parse_field_spec, parse_sigma_rule};

#[test]
fn field_spec_empty_field_name_with_modifier() {
    // "|contains" -- empty field name, valid modifier. Parses to None field name.
    let spec = parse_field_spec("|contains").unwrap();
    assert!(spec.name.is_none());
    assert_eq!(spec.modifiers.len(), 1);
}

#[test]
fn field_spec_double_pipe_produces_unknown_modifier() {
    // "field||contains" -- splits to ["field", "", "contains"]; the empty
    // string is an unknown modifier.
    let err = parse_field_spec("field||contains").unwrap_err();
    assert!(
        matches!(err, SigmaParserError::UnknownModifier(ref s) if s.is_empty()),
        "expected UnknownModifier for empty modifier string, got: {err}"
    );
}

#[test]
fn field_spec_trailing_pipe_produces_unknown_modifier() {
    let err = parse_field_spec("field|").unwrap_err();
    assert!(
        matches!(err, SigmaParserError::UnknownModifier(ref s) if s.is_empty()),
        "expected UnknownModifier for trailing pipe, got: {err}"
    );
}

#[test]
fn condition_trailing_operator_fails_with_location() {
    let err = parse_condition("selection and").unwrap_err();
    assert!(
        matches!(err, SigmaParserError::Condition(_, _)),
        "expected Condition error, got: {err}"
    );
}

#[test]
fn condition_unmatched_parens_fails() {
    let err = parse_condition("(selection and filter").unwrap_err();
    assert!(
        matches!(err, SigmaParserError::Condition(_, _)),
        "expected Condition error for unmatched paren, got: {err}"
    );
}

#[test]
fn condition_double_operator_fails() {
    let err = parse_condition("selection and or filter").unwrap_err();
    assert!(
        matches!(err, SigmaParserError::Condition(_, _)),
        "expected Condition error for 'and or', got: {err}"
    );
}

#[test]
fn invalid_yaml_reports_yaml_kind() {
    let err = parse_sigma_rule("title: [unclosed").unwrap_err();
    assert_eq!(err.kind(), "invalid_yaml");
}

#[test]
fn structural_errors_carry_dotted_path() {
    let yaml = r#"
title: T
logsource:
    product: windows
detection:
    selection_bad: {}
    condition: selection_bad
"#;
    let err = parse_sigma_rule(yaml).unwrap_err();
    match err {
        SigmaParserError::InvalidSigma { path, .. } => {
            assert_eq!(path, "detection.selection_bad");
        }
        other => panic!("expected InvalidSigma with path, got: {other}"),
    }
}

#[test]
fn error_kinds_are_stable() {
    let unknown_modifier = parse_field_spec("f|frobnicate").unwrap_err();
    assert_eq!(unknown_modifier.kind(), "unknown_modifier");

    let yaml = r#"
title: T
logsource:
    product: windows
detection:
    selection:
        a: b
    condition: missing_selection
"#;
    let unresolved = parse_sigma_rule(yaml).unwrap_err();
    assert_eq!(unresolved.kind(), "unresolved_selection");
}
