use crate::config::Config;
use crate::context::ContextResolver;
use crate::db::Database;
use crate::error::{MetricError, Result};
use crate::model::{Annotation, AnnotationKind, Anchor, CodeElement, ElementKind};
use crate::rules;
use crate::settings::{MarkerConfig, MarkerSettings};
use crate::template::{self, Placeholder};
use crate::util::truncate_str_bytes;
use log::warn;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

/// Tooltip token for a metric value that could not be computed.
pub const NOT_AVAILABLE: &str = "N/A";

/// Cooperative cancellation signal shared by the caller and all workers.
#[derive(Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Capability descriptor for one marker provider: which element kind it
/// handles, which placeholder combinations select a config for it, an
/// optional element pre-filter, and how to derive the marker anchor. One
/// shared pipeline consumes these records.
pub struct ProviderSpec {
    pub group: &'static str,
    pub element_kind: ElementKind,
    pub selects_config: fn(&[Placeholder]) -> bool,
    pub prefilter: Option<fn(&CodeElement, &MarkerSettings) -> bool>,
    pub anchor_of: fn(&CodeElement) -> Anchor,
}

fn uses_feature(placeholders: &[Placeholder]) -> bool {
    placeholders.iter().any(|p| {
        matches!(
            p,
            Placeholder::FeatureName | Placeholder::FeatureNamesInFile
        )
    })
}

fn uses_mapping(placeholders: &[Placeholder]) -> bool {
    placeholders.iter().any(|p| {
        matches!(
            p,
            Placeholder::MappingPath
                | Placeholder::MappingMethod
                | Placeholder::MappingPathsInFile
                | Placeholder::MappingMethodsInFile
        )
    })
}

fn selects_method_config(placeholders: &[Placeholder]) -> bool {
    !uses_feature(placeholders) && !uses_mapping(placeholders)
}

fn selects_feature_config(placeholders: &[Placeholder]) -> bool {
    uses_feature(placeholders)
}

fn selects_mapping_config(placeholders: &[Placeholder]) -> bool {
    uses_mapping(placeholders) && !uses_feature(placeholders)
}

fn call_target_has_evaluator(element: &CodeElement, settings: &MarkerSettings) -> bool {
    element
        .call_target
        .as_deref()
        .map(|target| settings.has_feature_evaluator(target))
        .unwrap_or(false)
}

fn own_anchor(element: &CodeElement) -> Anchor {
    element.anchor.clone()
}

/// The three provider kinds. Selection is disjoint: feature templates go to
/// call expressions, mapping templates to route mappings, everything else
/// (including templates without placeholders) to method declarations.
pub const PROVIDERS: [ProviderSpec; 3] = [
    ProviderSpec {
        group: "method-metrics",
        element_kind: ElementKind::MethodDeclaration,
        selects_config: selects_method_config,
        prefilter: None,
        anchor_of: own_anchor,
    },
    ProviderSpec {
        group: "feature-metrics",
        element_kind: ElementKind::CallExpression,
        selects_config: selects_feature_config,
        prefilter: Some(call_target_has_evaluator),
        anchor_of: own_anchor,
    },
    ProviderSpec {
        group: "mapping-metrics",
        element_kind: ElementKind::RouteMapping,
        selects_config: selects_mapping_config,
        prefilter: None,
        anchor_of: own_anchor,
    },
];

struct WorkItem {
    element: CodeElement,
    config: MarkerConfig,
    group: &'static str,
    anchor: Anchor,
}

/// Evaluates a batch of code elements against the enabled marker configs
/// with bounded parallelism and cooperative cancellation.
pub struct MetricPipeline<'a> {
    db: &'a Database,
    resolver: &'a dyn ContextResolver,
}

impl<'a> MetricPipeline<'a> {
    pub fn new(db: &'a Database, resolver: &'a dyn ContextResolver) -> Self {
        Self { db, resolver }
    }

    /// Run every applicable (element, config) pair and collect markers.
    ///
    /// Fails with [`MetricError::Cancelled`] if the token fires, discarding
    /// partial output. Per-unit failures never abort the batch: build,
    /// execution and rule-configuration failures become error markers;
    /// anything else is logged and skipped. Marker order is unspecified.
    pub fn collect(
        &self,
        elements: &[CodeElement],
        settings: &MarkerSettings,
        cancel: &CancelToken,
    ) -> Result<Vec<Annotation>> {
        let mut items = VecDeque::new();
        for element in elements {
            for provider in &PROVIDERS {
                if provider.element_kind != element.kind {
                    continue;
                }
                if let Some(prefilter) = provider.prefilter {
                    if !prefilter(element, settings) {
                        continue;
                    }
                }
                for config in settings.enabled_markers() {
                    let placeholders = template::placeholders_in(&config.template);
                    if !(provider.selects_config)(&placeholders) {
                        continue;
                    }
                    items.push_back(WorkItem {
                        element: element.clone(),
                        config: config.clone(),
                        group: provider.group,
                        anchor: (provider.anchor_of)(element),
                    });
                }
            }
        }

        let workers = Config::get().effective_workers().min(items.len().max(1));
        let queue = Mutex::new(items);
        let annotations = Mutex::new(Vec::new());

        thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| {
                    loop {
                        if cancel.is_cancelled() {
                            return;
                        }
                        let item = match queue.lock().unwrap().pop_front() {
                            Some(item) => item,
                            None => return,
                        };
                        match self.evaluate_one(&item, cancel) {
                            Ok(Some(annotation)) => {
                                annotations.lock().unwrap().push(annotation)
                            }
                            Ok(None) => {}
                            Err(MetricError::Cancelled) => return,
                            Err(err) => warn!(
                                "skipping {} at {}:{}: {err}",
                                item.config.name, item.anchor.file, item.anchor.line
                            ),
                        }
                    }
                });
            }
        });

        if cancel.is_cancelled() {
            return Err(MetricError::Cancelled);
        }
        Ok(annotations.into_inner().unwrap())
    }

    fn evaluate_one(&self, item: &WorkItem, cancel: &CancelToken) -> Result<Option<Annotation>> {
        if cancel.is_cancelled() {
            return Err(MetricError::Cancelled);
        }
        let context = self.resolver.resolve(&item.element.anchor)?;
        // Strict build: an unresolved required value must surface at the
        // marker, not silently widen the query.
        let sql = match template::build_query(&item.config.template, &context, false) {
            Ok(sql) => sql,
            Err(err) => return Ok(Some(error_marker(item, &err.to_string()))),
        };
        if cancel.is_cancelled() {
            return Err(MetricError::Cancelled);
        }
        let result = match self.db.execute_read(&sql) {
            Ok(result) => result,
            Err(err) => return Ok(Some(error_marker(item, &err.to_string()))),
        };
        let value = extract_metric(&item.config.name, result.first_value(), &result.column_names);
        let color = match rules::evaluate(value, &item.config.rules) {
            Ok(color) => color,
            Err(err) => return Ok(Some(error_marker(item, &err.to_string()))),
        };
        let Some(color) = color else {
            return Ok(None);
        };
        Ok(Some(Annotation {
            anchor: item.anchor.clone(),
            kind: AnnotationKind::Metric,
            color: Some(color.hex()),
            tooltip: format!("{}: {}", item.config.name, format_metric(value)),
            group: item.group.to_string(),
            config: item.config.name.clone(),
        }))
    }
}

fn error_marker(item: &WorkItem, message: &str) -> Annotation {
    let max = Config::get().error_tooltip_max;
    Annotation {
        anchor: item.anchor.clone(),
        kind: AnnotationKind::Error,
        color: None,
        tooltip: truncate_str_bytes(message, max),
        group: item.group.to_string(),
        config: item.config.name.clone(),
    }
}

/// First-row/first-column scalar of a query result. No rows and NULL are
/// silent absences; zero columns and non-numeric values warn.
fn extract_metric(config: &str, value: Option<&Value>, columns: &[String]) -> Option<f64> {
    if columns.is_empty() {
        warn!("{config}: query returned zero columns");
        return None;
    }
    let value = value?;
    match value {
        Value::Null => None,
        Value::Number(number) => number.as_f64(),
        Value::String(text) => match text.trim().parse::<f64>() {
            Ok(parsed) => Some(parsed),
            Err(_) => {
                warn!("{config}: non-numeric metric value {text:?}");
                None
            }
        },
        other => {
            warn!("{config}: non-numeric metric value {other}");
            None
        }
    }
}

/// Integral values render without decimals, fractional with two, absent as
/// the fixed not-available token.
pub fn format_metric(value: Option<f64>) -> String {
    match value {
        None => NOT_AVAILABLE.to_string(),
        Some(v) if v.fract() == 0.0 => format!("{v:.0}"),
        Some(v) => format!("{v:.2}"),
    }
}
