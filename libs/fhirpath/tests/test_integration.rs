//! End-to-end evaluation against JSON fixtures.

use corten_fhirpath::{resolve_internal_types, Engine, EvalOptions, Error};
use serde_json::{json, Value as JsonValue};

fn eval(resource: &JsonValue, expression: &str) -> Vec<JsonValue> {
    let engine = Engine::new();
    let out = engine
        .evaluate(resource, expression, &EvalOptions::default())
        .unwrap_or_else(|e| panic!("evaluating '{}': {}", expression, e));
    resolve_internal_types(&out)
}

fn eval_err(resource: &JsonValue, expression: &str) -> Error {
    let engine = Engine::new();
    engine
        .evaluate(resource, expression, &EvalOptions::default())
        .err()
        .unwrap_or_else(|| panic!("expected '{}' to fail", expression))
}

fn patient() -> JsonValue {
    json!({
        "resourceType": "Patient",
        "active": true,
        "name": [
            {"use": "official", "given": ["Peter", "James"], "family": "Chalmers"},
            {"use": "usual", "given": ["Jim"]}
        ],
        "birthDate": "1974-12-25"
    })
}

#[test]
fn path_navigation_flattens() {
    let resource = json!({
        "resourceType": "Patient",
        "name": [{"given": ["Alice", "A."]}, {"given": ["Bob"]}]
    });
    assert_eq!(
        eval(&resource, "Patient.name.given"),
        vec![json!("Alice"), json!("A."), json!("Bob")]
    );
}

#[test]
fn where_and_first() {
    assert_eq!(
        eval(&patient(), "Patient.name.where(use = 'official').given.first()"),
        vec![json!("Peter")]
    );
}

#[test]
fn missing_paths_are_empty() {
    assert!(eval(&patient(), "Patient.nothing.here").is_empty());
    assert!(eval(&patient(), "{}.anything").is_empty());
}

#[test]
fn distinct_count() {
    assert_eq!(eval(&patient(), "(1 | 2 | 2 | 3).distinct().count()"), vec![json!(3)]);
}

#[test]
fn distinct_is_idempotent() {
    assert_eq!(
        eval(&patient(), "(3 | 1 | 3 | 2).distinct() = (3 | 1 | 3 | 2).distinct().distinct()"),
        vec![json!(true)]
    );
}

#[test]
fn union_is_commutative_as_a_set() {
    assert_eq!(
        eval(&patient(), "((1 | 2) | (2 | 3)).count() = ((2 | 3) | (1 | 2)).count()"),
        vec![json!(true)]
    );
}

#[test]
fn iif_is_lazy() {
    assert_eq!(eval(&patient(), "iif({}.exists(), 'a', 'b')"), vec![json!("b")]);
    // The unselected branch would divide by a string; laziness means it
    // never runs.
    assert_eq!(eval(&patient(), "iif(true, 'yes', 1 / 'oops')"), vec![json!("yes")]);
    assert_eq!(eval(&patient(), "iif(false, 1 / 'oops', 'no')"), vec![json!("no")]);
}

#[test]
fn three_valued_logic_laws() {
    assert_eq!(eval(&patient(), "{} or true"), vec![json!(true)]);
    assert!(eval(&patient(), "{} or false").is_empty());
    assert_eq!(eval(&patient(), "{} and false"), vec![json!(false)]);
    assert!(eval(&patient(), "{} and true").is_empty());
    assert!(eval(&patient(), "{} xor true").is_empty());
    assert!(eval(&patient(), "{} xor false").is_empty());
    assert_eq!(eval(&patient(), "false implies {}"), vec![json!(true)]);
    assert_eq!(eval(&patient(), "{} implies true"), vec![json!(true)]);
    assert!(eval(&patient(), "{} implies false").is_empty());
}

#[test]
fn equality_and_equivalence_of_empties() {
    assert!(eval(&patient(), "{} = {}").is_empty());
    assert_eq!(eval(&patient(), "{} ~ {}"), vec![json!(true)]);
    assert_eq!(eval(&patient(), "name ~ name"), vec![json!(true)]);
}

#[test]
fn temporal_precision_rules() {
    assert!(eval(&patient(), "@2012 = @2012-01").is_empty());
    assert_eq!(eval(&patient(), "@2012 ~ @2012-01"), vec![json!(true)]);
    assert_eq!(eval(&patient(), "@2012 = @2013-01"), vec![json!(false)]);
    assert_eq!(eval(&patient(), "@2012-05-02 < @2012-06-01"), vec![json!(true)]);
}

#[test]
fn quantity_canonicalization() {
    assert_eq!(eval(&patient(), "3 'min' = 180 's'"), vec![json!(true)]);
    assert!(eval(&patient(), "1 year = 12 month").is_empty());
    assert_eq!(eval(&patient(), "1 year ~ 12 month"), vec![json!(true)]);
    assert_eq!(eval(&patient(), "3 'min' + 120 's' = 5 'min'"), vec![json!(true)]);
}

#[test]
fn date_arithmetic() {
    assert_eq!(
        eval(&patient(), "@2012-05-02 + 3 days = @2012-05-05"),
        vec![json!(true)]
    );
    assert_eq!(
        eval(&patient(), "@2012-01-31 + 1 month = @2012-02-29"),
        vec![json!(true)]
    );
    assert_eq!(
        eval(&patient(), "Patient.birthDate < today()"),
        vec![json!(true)]
    );
}

#[test]
fn string_functions_end_to_end() {
    assert_eq!(
        eval(&patient(), "'hello'.encode('base64').decode('base64') = 'hello'"),
        vec![json!(true)]
    );
    assert_eq!(
        eval(&patient(), "Patient.name.given.join(' ')"),
        vec![json!("Peter James Jim")]
    );
    assert_eq!(eval(&patient(), "'abcde'.substring(1, 2)"), vec![json!("bc")]);
    assert_eq!(eval(&patient(), "'a,b,c'.split(',').count()"), vec![json!(3)]);
    assert_eq!(
        eval(&patient(), "'hello world'.matches('h.*d')"),
        vec![json!(true)]
    );
}

#[test]
fn arithmetic_and_math() {
    assert_eq!(eval(&patient(), "7 div 2"), vec![json!(3)]);
    assert_eq!(eval(&patient(), "7 mod 2"), vec![json!(1)]);
    assert_eq!(eval(&patient(), "7 / 2"), vec![json!(3.5)]);
    assert!(eval(&patient(), "1 / 0").is_empty());
    assert_eq!(eval(&patient(), "(-5).abs()"), vec![json!(5)]);
    assert_eq!(eval(&patient(), "2.5.round() = 3.0"), vec![json!(true)]);
    assert_eq!(eval(&patient(), "81.sqrt() = 9.0"), vec![json!(true)]);
    assert_eq!(eval(&patient(), "5 > 4.9"), vec![json!(true)]);
}

#[test]
fn aggregate_fold_sees_total() {
    assert_eq!(
        eval(&patient(), "(1 | 2 | 3 | 4).aggregate($this + $total, 0)"),
        vec![json!(10)]
    );
    // $index increases strictly from 0.
    assert_eq!(
        eval(&patient(), "(10 | 20 | 30).aggregate($total.combine($index), {})"),
        vec![json!(0), json!(1), json!(2)]
    );
    // Empty input returns the init expression.
    assert_eq!(eval(&patient(), "{}.aggregate($this + $total, 7)"), vec![json!(7)]);
}

#[test]
fn aggregate_without_init() {
    // min() via aggregate, the classic FHIRPath example.
    assert_eq!(
        eval(
            &patient(),
            "(5 | 2 | 8).aggregate(iif($total.empty(), $this, iif($this < $total, $this, $total)))"
        ),
        vec![json!(2)]
    );
}

#[test]
fn sum_min_max_avg() {
    assert_eq!(eval(&patient(), "(1 | 2 | 3).sum()"), vec![json!(6)]);
    assert_eq!(eval(&patient(), "(1 | 2 | 3).min()"), vec![json!(1)]);
    assert_eq!(eval(&patient(), "(1 | 2 | 3).max()"), vec![json!(3)]);
    assert_eq!(eval(&patient(), "(1 | 2 | 3 | 4).avg() = 2.5"), vec![json!(true)]);
}

#[test]
fn define_variable_propagates() {
    assert_eq!(
        eval(&patient(), "defineVariable('two', 1 + 1).select(%two * 3)"),
        vec![json!(6)]
    );
    // Redefinition and shadowing are rejected.
    assert!(matches!(
        eval_err(&patient(), "defineVariable('v', 1).defineVariable('v', 2)"),
        Error::Domain(_)
    ));
    assert!(matches!(
        eval_err(&patient(), "defineVariable('resource', 1)"),
        Error::Domain(_)
    ));
}

#[test]
fn repeat_walks_nested_structures() {
    let questionnaire = json!({
        "resourceType": "Questionnaire",
        "item": [
            {"linkId": "1", "item": [
                {"linkId": "1.1", "item": [{"linkId": "1.1.1"}]},
                {"linkId": "1.2"}
            ]},
            {"linkId": "2"}
        ]
    });
    assert_eq!(
        eval(&questionnaire, "Questionnaire.repeat(item).linkId.count()"),
        vec![json!(5)]
    );
    // Termination on re-visited items: repeating over the same projection
    // twice adds nothing.
    assert_eq!(
        eval(&questionnaire, "Questionnaire.repeat(item).count() = Questionnaire.repeat(item).distinct().count()"),
        vec![json!(true)]
    );
}

#[test]
fn collection_membership() {
    assert_eq!(eval(&patient(), "'Jim' in Patient.name.given"), vec![json!(true)]);
    assert_eq!(
        eval(&patient(), "Patient.name.given contains 'Peter'"),
        vec![json!(true)]
    );
    assert_eq!(eval(&patient(), "5 in (1 | 2 | 3)"), vec![json!(false)]);
    assert!(eval(&patient(), "{} in (1 | 2)").is_empty());
}

#[test]
fn subset_and_superset() {
    assert_eq!(eval(&patient(), "(1 | 2).subsetOf((1 | 2 | 3))"), vec![json!(true)]);
    assert_eq!(eval(&patient(), "(1 | 2 | 3).supersetOf((1 | 2))"), vec![json!(true)]);
    assert_eq!(eval(&patient(), "(1 | 4).subsetOf((1 | 2 | 3))"), vec![json!(false)]);
}

#[test]
fn indexer_and_subsetting() {
    assert_eq!(eval(&patient(), "Patient.name[0].given.count()"), vec![json!(2)]);
    assert!(eval(&patient(), "Patient.name[9]").is_empty());
    assert_eq!(eval(&patient(), "Patient.name.tail().count()"), vec![json!(1)]);
    assert!(matches!(
        eval_err(&patient(), "Patient.name.given.single()"),
        Error::Singleton(_)
    ));
}

#[test]
fn type_tests_on_system_values() {
    assert_eq!(eval(&patient(), "(1 | 1) is Integer"), vec![json!(true)]);
    assert_eq!(eval(&patient(), "1 is System.Integer"), vec![json!(true)]);
    assert_eq!(eval(&patient(), "1.5 is Decimal"), vec![json!(true)]);
    assert_eq!(eval(&patient(), "'x' is String"), vec![json!(true)]);
    assert_eq!(eval(&patient(), "@2012 is Date"), vec![json!(true)]);
    assert_eq!(eval(&patient(), "(5 'mg') is Quantity"), vec![json!(true)]);
    assert_eq!(eval(&patient(), "1.as(Integer) + 1"), vec![json!(2)]);
}

#[test]
fn conversions_end_to_end() {
    assert_eq!(eval(&patient(), "'42'.toInteger()"), vec![json!(42)]);
    assert_eq!(eval(&patient(), "'y'.toBoolean()"), vec![json!(true)]);
    assert_eq!(eval(&patient(), "true.toInteger()"), vec![json!(1)]);
    assert_eq!(eval(&patient(), "'2.5'.convertsToDecimal()"), vec![json!(true)]);
    assert_eq!(
        eval(&patient(), "'5.4 \\'mg\\''.toQuantity() = 5.4 'mg'"),
        vec![json!(true)]
    );
    assert_eq!(eval(&patient(), "1.convertsToQuantity()"), vec![json!(true)]);
    assert_eq!(eval(&patient(), "7L + 1"), vec![json!(8)]);
}

#[test]
fn long_and_integer_interop() {
    assert_eq!(eval(&patient(), "2L + 3"), vec![json!(5)]);
    assert_eq!(eval(&patient(), "5.toLong() = 5"), vec![json!(true)]);
    assert!(matches!(
        eval_err(&patient(), "1L + 1.5"),
        Error::Type(_)
    ));
}

#[test]
fn string_concat_operators() {
    assert_eq!(eval(&patient(), "'a' & {} & 'b'"), vec![json!("ab")]);
    assert!(eval(&patient(), "'a' + {}").is_empty());
    assert_eq!(eval(&patient(), "'a' + 'b'"), vec![json!("ab")]);
}

#[test]
fn children_and_descendants() {
    assert_eq!(eval(&patient(), "Patient.children().count()"), vec![json!(4)]);
    assert_eq!(
        eval(&patient(), "Patient.descendants().count() > Patient.children().count()"),
        vec![json!(true)]
    );
}

#[test]
fn boolean_collection_quantifiers() {
    assert_eq!(eval(&patient(), "(true | false).anyTrue()"), vec![json!(true)]);
    assert_eq!(eval(&patient(), "(true.combine(true)).allTrue()"), vec![json!(true)]);
    assert_eq!(eval(&patient(), "name.all(given.exists())"), vec![json!(true)]);
    assert_eq!(eval(&patient(), "name.exists(use = 'usual')"), vec![json!(true)]);
}

#[test]
fn now_is_snapshotted_per_evaluation() {
    assert_eq!(eval(&patient(), "now() = now()"), vec![json!(true)]);
    assert_eq!(eval(&patient(), "today() = today()"), vec![json!(true)]);
}

#[test]
fn trace_returns_input_unchanged() {
    use corten_fhirpath::Collection;
    use std::sync::{Arc, Mutex};

    let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let mut options = EvalOptions::default();
    options.trace = Some(Arc::new(move |label: &str, _c: &Collection| {
        sink.lock().unwrap().push(label.to_string());
    }));

    let engine = Engine::new();
    let out = engine
        .evaluate(&patient(), "name.trace('names').count()", &options)
        .unwrap();
    assert_eq!(resolve_internal_types(&out), vec![json!(2)]);
    assert_eq!(seen.lock().unwrap().as_slice(), &["names".to_string()]);
}

#[test]
fn syntax_errors_surface_all_diagnostics() {
    let err = eval_err(&patient(), "name # given ^");
    match err {
        Error::Syntax(report) => assert!(report.issues.len() >= 2),
        other => panic!("expected syntax error, got {:?}", other),
    }
}

#[test]
fn environment_variables() {
    let engine = Engine::new();
    let mut options = EvalOptions::default();
    options.vars.insert("threshold".into(), json!(10));
    let out = engine
        .evaluate(&json!({"resourceType": "Observation"}), "%threshold > 5", &options)
        .unwrap();
    assert_eq!(resolve_internal_types(&out), vec![json!(true)]);

    let out = engine
        .evaluate(&patient(), "%resource.name.count()", &EvalOptions::default())
        .unwrap();
    assert_eq!(resolve_internal_types(&out), vec![json!(2)]);
}
