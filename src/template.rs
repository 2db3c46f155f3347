use crate::context::ContextInfo;
use crate::error::{MetricError, Result};

/// Wildcard substituted for unresolved scalar values in lenient mode, so a
/// `LIKE` clause widens to "all".
pub const DEFAULT_WILDCARD: &str = "%";

/// Never-matching regex substituted for an unresolved mapping path in
/// lenient mode ($ before ^ cannot match any input).
pub const REGEX_MATCH_NOTHING: &str = "$^";

/// Rendered in place of an empty in-file list so `IN (NULL)` stays
/// syntactically valid and matches nothing.
const EMPTY_LIST_LITERAL: &str = "NULL";

/// Literal tokens recognized inside user-authored SQL templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Placeholder {
    MethodFqn,
    FeatureName,
    MappingPath,
    MappingMethod,
    MethodFqnsInFile,
    FeatureNamesInFile,
    MappingPathsInFile,
    MappingMethodsInFile,
}

impl Placeholder {
    pub const ALL: [Placeholder; 8] = [
        Placeholder::MethodFqn,
        Placeholder::FeatureName,
        Placeholder::MappingPath,
        Placeholder::MappingMethod,
        Placeholder::MethodFqnsInFile,
        Placeholder::FeatureNamesInFile,
        Placeholder::MappingPathsInFile,
        Placeholder::MappingMethodsInFile,
    ];

    pub fn token(self) -> &'static str {
        match self {
            Placeholder::MethodFqn => "#method_fqn#",
            Placeholder::FeatureName => "#feature_name#",
            Placeholder::MappingPath => "#mapping_path#",
            Placeholder::MappingMethod => "#mapping_method#",
            Placeholder::MethodFqnsInFile => "#method_fqns_in_file#",
            Placeholder::FeatureNamesInFile => "#feature_names_in_file#",
            Placeholder::MappingPathsInFile => "#mapping_paths_in_file#",
            Placeholder::MappingMethodsInFile => "#mapping_methods_in_file#",
        }
    }

    /// Human description used in strict-resolution failure messages.
    pub fn description(self) -> &'static str {
        match self {
            Placeholder::MethodFqn => "method FQN",
            Placeholder::FeatureName => "feature name",
            Placeholder::MappingPath => "mapping path",
            Placeholder::MappingMethod => "mapping method",
            Placeholder::MethodFqnsInFile => "method FQNs in file",
            Placeholder::FeatureNamesInFile => "feature names in file",
            Placeholder::MappingPathsInFile => "mapping paths in file",
            Placeholder::MappingMethodsInFile => "mapping methods in file",
        }
    }
}

/// Placeholders that occur in `template`, in catalog order.
pub fn placeholders_in(template: &str) -> Vec<Placeholder> {
    Placeholder::ALL
        .into_iter()
        .filter(|placeholder| template.contains(placeholder.token()))
        .collect()
}

/// Substitute context values into a SQL template. Pure text replacement:
/// every occurrence of each recognized token is replaced, nothing else is
/// touched, and no SQL is validated or executed.
///
/// Strict mode (`use_defaults_for_unresolved = false`) fails on the first
/// scalar placeholder whose context value is absent; lenient mode fills the
/// documented default instead.
pub fn build_query(
    template: &str,
    context: &ContextInfo,
    use_defaults_for_unresolved: bool,
) -> Result<String> {
    let mut sql = template.to_string();
    for placeholder in placeholders_in(template) {
        let replacement = match placeholder {
            Placeholder::MethodFqn => scalar(
                placeholder,
                context.method_fqn.as_deref(),
                DEFAULT_WILDCARD,
                use_defaults_for_unresolved,
            )?,
            Placeholder::FeatureName => scalar(
                placeholder,
                context.feature_name.as_deref(),
                DEFAULT_WILDCARD,
                use_defaults_for_unresolved,
            )?,
            Placeholder::MappingPath => scalar(
                placeholder,
                context.mapping_path.as_deref(),
                REGEX_MATCH_NOTHING,
                use_defaults_for_unresolved,
            )?,
            Placeholder::MappingMethod => scalar(
                placeholder,
                context.mapping_method.as_deref(),
                DEFAULT_WILDCARD,
                use_defaults_for_unresolved,
            )?,
            Placeholder::MethodFqnsInFile => quoted_list(&context.all_methods_in_file),
            Placeholder::FeatureNamesInFile => quoted_list(&context.all_features_in_file),
            Placeholder::MappingPathsInFile => pipe_list(&context.all_mapping_paths_in_file),
            Placeholder::MappingMethodsInFile => {
                pipe_list(&context.all_mapping_methods_in_file)
            }
        };
        sql = sql.replace(placeholder.token(), &replacement);
    }
    Ok(sql)
}

fn scalar(
    placeholder: Placeholder,
    value: Option<&str>,
    default: &str,
    use_defaults_for_unresolved: bool,
) -> Result<String> {
    match value {
        Some(value) => Ok(value.to_string()),
        None if use_defaults_for_unresolved => Ok(default.to_string()),
        None => Err(MetricError::MissingContextValue {
            what: placeholder.description(),
        }),
    }
}

/// Render a SQL list literal: elements single-quoted with embedded quotes
/// doubled, joined by `, `. An empty list renders `NULL`.
fn quoted_list(values: &[String]) -> String {
    if values.is_empty() {
        return EMPTY_LIST_LITERAL.to_string();
    }
    values
        .iter()
        .map(|value| format!("'{}'", value.replace('\'', "''")))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Render a regex alternation for use inside an already-quoted string:
/// elements joined by `|` as bare text. An empty list renders `NULL`.
fn pipe_list(values: &[String]) -> String {
    if values.is_empty() {
        return EMPTY_LIST_LITERAL.to_string();
    }
    values.join("|")
}
