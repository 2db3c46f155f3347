use mlens::context::{ContextInfo, StaticResolver};
use mlens::db::Database;
use mlens::error::MetricError;
use mlens::model::{Anchor, AnnotationKind, CodeElement, ElementKind};
use mlens::pipeline::{CancelToken, MetricPipeline};
use mlens::settings::MarkerSettings;
use tempfile::TempDir;

const SETTINGS: &str = r##"
markers:
  - name: Call count
    template: "SELECT calls FROM method_calls WHERE method = '#method_fqn#'"
    rules:
      - { from: "50", to: "", color: "#FF0000" }
      - { from: "", to: "50", color: "#00FF00" }
  - name: Feature checks
    template: "SELECT checks FROM feature_checks WHERE feature = '#feature_name#'"
    rules:
      - { from: "", to: "", color: "#0000FF" }
feature_evaluators:
  - method_signature: "com.shop.Flags.isEnabled(java.lang.String)"
    param_index: 0
"##;

fn seeded_db(dir: &TempDir) -> Database {
    let db = Database::new(&dir.path().join("m.sqlite"));
    db.execute_write(
        "CREATE TABLE method_calls (method TEXT, calls INTEGER);
         INSERT INTO method_calls VALUES ('com.shop.Cart.add', 75), ('com.shop.Cart.clear', 12);
         CREATE TABLE feature_checks (feature TEXT, checks INTEGER);
         INSERT INTO feature_checks VALUES ('new-checkout', 3);",
    )
    .unwrap();
    db
}

fn anchor(line: u32, text: &str) -> Anchor {
    Anchor {
        file: "src/Cart.java".to_string(),
        line,
        text: text.to_string(),
    }
}

fn method_element(line: u32, text: &str) -> CodeElement {
    CodeElement {
        anchor: anchor(line, text),
        kind: ElementKind::MethodDeclaration,
        call_target: None,
    }
}

fn method_context(fqn: &str) -> ContextInfo {
    ContextInfo {
        method_fqn: Some(fqn.to_string()),
        ..ContextInfo::default()
    }
}

#[test]
fn method_markers_carry_color_and_tooltip() {
    let dir = TempDir::new().unwrap();
    let db = seeded_db(&dir);
    let settings = MarkerSettings::from_yaml(SETTINGS).unwrap();

    let mut resolver = StaticResolver::new();
    resolver.insert(anchor(10, "add"), method_context("com.shop.Cart.add"));
    resolver.insert(anchor(20, "clear"), method_context("com.shop.Cart.clear"));
    let elements = vec![method_element(10, "add"), method_element(20, "clear")];

    let pipeline = MetricPipeline::new(&db, &resolver);
    let mut annotations = pipeline
        .collect(&elements, &settings, &CancelToken::new())
        .unwrap();
    annotations.sort_by_key(|a| a.anchor.line);

    assert_eq!(annotations.len(), 2);
    assert_eq!(annotations[0].kind, AnnotationKind::Metric);
    assert_eq!(annotations[0].color.as_deref(), Some("#FF0000"));
    assert_eq!(annotations[0].tooltip, "Call count: 75");
    assert_eq!(annotations[0].group, "method-metrics");
    assert_eq!(annotations[1].color.as_deref(), Some("#00FF00"));
    assert_eq!(annotations[1].tooltip, "Call count: 12");
}

#[test]
fn unresolved_required_context_becomes_error_marker() {
    let dir = TempDir::new().unwrap();
    let db = seeded_db(&dir);
    let settings = MarkerSettings::from_yaml(SETTINGS).unwrap();

    let mut resolver = StaticResolver::new();
    resolver.insert(anchor(10, "add"), ContextInfo::default());
    let elements = vec![method_element(10, "add")];

    let pipeline = MetricPipeline::new(&db, &resolver);
    let annotations = pipeline
        .collect(&elements, &settings, &CancelToken::new())
        .unwrap();

    assert_eq!(annotations.len(), 1);
    assert_eq!(annotations[0].kind, AnnotationKind::Error);
    assert_eq!(
        annotations[0].tooltip,
        "Missing required method FQN for SQL template"
    );
    assert!(annotations[0].color.is_none());
}

#[test]
fn call_expressions_are_prefiltered_by_feature_evaluator() {
    let dir = TempDir::new().unwrap();
    let db = seeded_db(&dir);
    let settings = MarkerSettings::from_yaml(SETTINGS).unwrap();

    let matching = CodeElement {
        anchor: anchor(30, "isEnabled"),
        kind: ElementKind::CallExpression,
        call_target: Some("com.shop.Flags.isEnabled(java.lang.String)".to_string()),
    };
    let unrelated = CodeElement {
        anchor: anchor(31, "log"),
        kind: ElementKind::CallExpression,
        call_target: Some("com.shop.Log.info(java.lang.String)".to_string()),
    };

    let mut resolver = StaticResolver::new();
    let feature_context = ContextInfo {
        feature_name: Some("new-checkout".to_string()),
        ..ContextInfo::default()
    };
    resolver.insert(anchor(30, "isEnabled"), feature_context.clone());
    resolver.insert(anchor(31, "log"), feature_context);

    let pipeline = MetricPipeline::new(&db, &resolver);
    let annotations = pipeline
        .collect(&[matching, unrelated], &settings, &CancelToken::new())
        .unwrap();

    assert_eq!(annotations.len(), 1);
    assert_eq!(annotations[0].anchor.line, 30);
    assert_eq!(annotations[0].group, "feature-metrics");
    assert_eq!(annotations[0].color.as_deref(), Some("#0000FF"));
    assert_eq!(annotations[0].tooltip, "Feature checks: 3");
}

#[test]
fn no_rows_means_no_marker() {
    let dir = TempDir::new().unwrap();
    let db = seeded_db(&dir);
    let settings = MarkerSettings::from_yaml(SETTINGS).unwrap();

    let mut resolver = StaticResolver::new();
    resolver.insert(anchor(10, "gone"), method_context("com.shop.Cart.gone"));

    let pipeline = MetricPipeline::new(&db, &resolver);
    let annotations = pipeline
        .collect(&[method_element(10, "gone")], &settings, &CancelToken::new())
        .unwrap();
    assert!(annotations.is_empty());
}

#[test]
fn disabled_configs_are_skipped() {
    let dir = TempDir::new().unwrap();
    let db = seeded_db(&dir);
    let settings = MarkerSettings::from_yaml(
        r##"
markers:
  - name: Call count
    template: "SELECT calls FROM method_calls WHERE method = '#method_fqn#'"
    enabled: false
    rules:
      - { from: "", to: "", color: "#FF0000" }
"##,
    )
    .unwrap();

    let mut resolver = StaticResolver::new();
    resolver.insert(anchor(10, "add"), method_context("com.shop.Cart.add"));

    let pipeline = MetricPipeline::new(&db, &resolver);
    let annotations = pipeline
        .collect(&[method_element(10, "add")], &settings, &CancelToken::new())
        .unwrap();
    assert!(annotations.is_empty());
}

#[test]
fn execution_failure_becomes_error_marker() {
    let dir = TempDir::new().unwrap();
    let db = seeded_db(&dir);
    let settings = MarkerSettings::from_yaml(
        r##"
markers:
  - name: Broken source
    template: "SELECT n FROM not_imported_yet WHERE m = '#method_fqn#'"
    rules:
      - { from: "", to: "", color: "#FF0000" }
"##,
    )
    .unwrap();

    let mut resolver = StaticResolver::new();
    resolver.insert(anchor(10, "add"), method_context("com.shop.Cart.add"));

    let pipeline = MetricPipeline::new(&db, &resolver);
    let annotations = pipeline
        .collect(&[method_element(10, "add")], &settings, &CancelToken::new())
        .unwrap();

    assert_eq!(annotations.len(), 1);
    assert_eq!(annotations[0].kind, AnnotationKind::Error);
    assert!(annotations[0].tooltip.contains("database error"));
}

#[test]
fn malformed_rule_boundary_becomes_error_marker() {
    let dir = TempDir::new().unwrap();
    let db = seeded_db(&dir);
    let settings = MarkerSettings::from_yaml(
        r##"
markers:
  - name: Bad thresholds
    template: "SELECT calls FROM method_calls WHERE method = '#method_fqn#'"
    rules:
      - { from: "abc", to: "", color: "#FF0000" }
"##,
    )
    .unwrap();

    let mut resolver = StaticResolver::new();
    resolver.insert(anchor(10, "add"), method_context("com.shop.Cart.add"));

    let pipeline = MetricPipeline::new(&db, &resolver);
    let annotations = pipeline
        .collect(&[method_element(10, "add")], &settings, &CancelToken::new())
        .unwrap();

    assert_eq!(annotations.len(), 1);
    assert_eq!(annotations[0].kind, AnnotationKind::Error);
    assert!(annotations[0].tooltip.contains("invalid rule boundary"));
}

#[test]
fn cancellation_fails_the_whole_collect_call() {
    let dir = TempDir::new().unwrap();
    let db = seeded_db(&dir);
    let settings = MarkerSettings::from_yaml(SETTINGS).unwrap();

    let mut resolver = StaticResolver::new();
    resolver.insert(anchor(10, "add"), method_context("com.shop.Cart.add"));

    let cancel = CancelToken::new();
    cancel.cancel();
    let pipeline = MetricPipeline::new(&db, &resolver);
    let outcome = pipeline.collect(&[method_element(10, "add")], &settings, &cancel);
    assert!(matches!(outcome, Err(MetricError::Cancelled)));
}
