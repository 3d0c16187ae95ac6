//! Round-trip properties: SPL emitted from a compiled rule, re-parsed by the
//! reverse recognizer, reproduces an equivalent query AST; string literals
//! survive quoting bit-exact.

use sigmaspl_convert::{
    ConversionProfile, EmitOptions, Literal, Match, MatchOp, QueryExpr, compile_rule, emit,
    recognize, reverse_spl, ReverseOptions,
};
use sigmaspl_parser::parse_sigma_rule;

/// Compile a rule, emit SPL (no health comments), recognize it back, and
/// return both query trees.
fn there_and_back(yaml: &str) -> (QueryExpr, QueryExpr) {
    let parsed = parse_sigma_rule(yaml).unwrap();
    let profile = ConversionProfile::default();
    let compiled = compile_rule(&parsed.rule, &profile).unwrap();
    let spl = emit(
        &compiled,
        &parsed.rule,
        &profile,
        &EmitOptions::default(),
        &[],
    );
    let recognized = recognize(&spl).unwrap();
    (
        compiled.query,
        recognized.query.expect("query survived the trip"),
    )
}

#[test]
fn contains_list_round_trips() {
    let (q, q2) = there_and_back(
        r#"
title: Mimikatz
logsource: {category: process_creation, product: windows}
detection:
  selection:
    CommandLine|contains: ['sekurlsa::logonpasswords', 'lsadump::sam']
  condition: selection
"#,
    );
    assert_eq!(q.normalized(), q2.normalized());
}

#[test]
fn and_not_structure_round_trips() {
    let (q, q2) = there_and_back(
        r#"
title: T
logsource: {category: process_creation, product: windows}
detection:
  selection:
    Image|endswith: '\rundll32.exe'
    CommandLine|contains: 'javascript'
  filter:
    ParentImage|endswith: '\explorer.exe'
  condition: selection and not filter
"#,
    );
    assert_eq!(q.normalized(), q2.normalized());
}

#[test]
fn selector_expansion_round_trips() {
    let (q, q2) = there_and_back(
        r#"
title: T
logsource: {category: process_creation, product: windows}
detection:
  selection_a:
    Image|endswith: '\cmd.exe'
  selection_b:
    Image|endswith: '\powershell.exe'
  condition: 1 of selection_*
"#,
    );
    assert_eq!(q.normalized(), q2.normalized());
}

#[test]
fn pipe_predicates_round_trip() {
    let (q, q2) = there_and_back(
        r#"
title: T
logsource: {category: network_connection, product: windows}
detection:
  selection:
    DestinationIp|cidr: '10.0.0.0/8'
    DestinationPort|gte: 1024
    CommandLine|re: 'enc\s+[A-Za-z0-9+/=]{20}'
  condition: selection
"#,
    );
    assert_eq!(q.normalized(), q2.normalized());
}

#[test]
fn null_and_exists_round_trip() {
    let (q, q2) = there_and_back(
        r#"
title: T
logsource: {category: process_creation, product: windows}
detection:
  selection:
    ParentImage: null
    Image|endswith: '\svchost.exe'
  condition: selection
"#,
    );
    assert_eq!(q.normalized(), q2.normalized());
}

#[test]
fn escape_safety_for_quotes_and_backslashes() {
    // Property: any string literal survives emit -> recognize bit-exact.
    let nasty = [
        r"C:\Windows\System32\cmd.exe",
        r#"say "hello" world"#,
        r"trailing\",
        r#"mix\"of "both\" things"#,
    ];
    for value in nasty {
        let m = QueryExpr::Match(Match::new(
            "CommandLine",
            MatchOp::Equals,
            Literal::Str(value.to_string()),
        ));
        let parsed = parse_sigma_rule(
            r#"
title: Shell
logsource: {category: process_creation, product: windows}
detection:
  selection:
    Image|endswith: '\cmd.exe'
  condition: selection
"#,
        )
        .unwrap();
        let profile = ConversionProfile::default();
        let mut compiled = compile_rule(&parsed.rule, &profile).unwrap();
        compiled.query = QueryExpr::And(vec![compiled.query.clone(), m.clone()]);

        let spl = emit(
            &compiled,
            &parsed.rule,
            &profile,
            &EmitOptions::default(),
            &[],
        );
        let recognized = recognize(&spl).unwrap();
        let q2 = recognized.query.expect("query");

        let mut literals = Vec::new();
        q2.for_each_match(&mut |m| {
            if let Literal::Str(s) = &m.value {
                literals.push(s.clone());
            }
        });
        assert!(
            literals.iter().any(|l| l == value),
            "literal {value:?} not recovered from {spl}; got {literals:?}"
        );
    }
}

#[test]
fn full_reverse_of_emitted_spl_yields_parseable_sigma() {
    let yaml = r#"
title: T
logsource: {category: process_creation, product: windows}
detection:
  selection:
    CommandLine|contains: ['sekurlsa::logonpasswords', 'lsadump::sam']
  condition: selection
"#;
    let parsed = parse_sigma_rule(yaml).unwrap();
    let profile = ConversionProfile::default();
    let compiled = compile_rule(&parsed.rule, &profile).unwrap();
    let spl = emit(
        &compiled,
        &parsed.rule,
        &profile,
        &EmitOptions::default(),
        &[],
    );

    let result = reverse_spl(&spl, &profile, &ReverseOptions::default()).unwrap();
    let reparsed = parse_sigma_rule(&result.sigma_yaml).expect("generated Sigma parses");
    let recompiled = compile_rule(&reparsed.rule, &profile).unwrap();
    assert_eq!(
        compiled.query.normalized(),
        recompiled.query.normalized(),
        "sigma: {}",
        result.sigma_yaml
    );
}
