use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Fully materialized result of one read query. Column names and declared
/// type names come from statement metadata, captured once; rows hold values
/// in projection order, parallel to `column_names`.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    pub column_names: Vec<String>,
    pub column_types: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl QueryResult {
    /// Value at `row` for the named column, by projection order.
    pub fn value(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.column_names.iter().position(|name| name == column)?;
        self.rows.get(row)?.get(idx)
    }

    /// First row, first column. The scalar the metric pipeline consumes.
    pub fn first_value(&self) -> Option<&Value> {
        self.rows.first()?.first()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// The token/range in source code an annotation attaches to. Opaque to this
/// crate beyond identity and display.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Anchor {
    pub file: String,
    pub line: u32,
    /// Identifier text at the anchor, used for display only.
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementKind {
    MethodDeclaration,
    CallExpression,
    RouteMapping,
}

/// One visible code element handed in by the host for evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeElement {
    pub anchor: Anchor,
    pub kind: ElementKind,
    /// Resolved callee signature for call expressions, e.g.
    /// `com.acme.Flags.isEnabled(java.lang.String)`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_target: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnnotationKind {
    Metric,
    Error,
}

/// Output tuple handed to the host UI: a colored marker or an error marker.
#[derive(Debug, Clone, Serialize)]
pub struct Annotation {
    pub anchor: Anchor,
    pub kind: AnnotationKind,
    /// `#RRGGBB`, present for metric markers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    pub tooltip: String,
    /// Provider group the marker belongs to, e.g. "method-metrics".
    pub group: String,
    pub config: String,
}
