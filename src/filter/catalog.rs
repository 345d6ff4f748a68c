use std::fmt;
use std::sync::{Arc, Mutex};

use anyhow::Context;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ir::{InventoryEdgeKind, InventoryNodeKind, Node};

use super::state::{ConnectionFilter, FilterPatch, Filters};

pub type AttributePredicate = Arc<dyn Fn(&Node, &Value) -> bool + Send + Sync>;
pub type QuickFilterFn = Arc<dyn Fn(&Filters) -> FilterPatch + Send + Sync>;

/// Display metadata for one node or edge kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KindMeta {
    pub kind: String,
    pub label: String,
    pub color: String,
    #[serde(default = "default_visible")]
    pub visible: bool,
}

fn default_visible() -> bool {
    true
}

impl KindMeta {
    pub fn new(kind: &str, label: &str, color: &str) -> Self {
        Self {
            kind: kind.to_string(),
            label: label.to_string(),
            color: color.to_string(),
            visible: true,
        }
    }
}

/// A named custom predicate over nodes. The configured value comes from
/// [`Filters::attribute_values`]; `default` applies when none is set.
#[derive(Clone)]
pub struct AttributeFilter {
    pub name: String,
    pub predicate: AttributePredicate,
    pub default: Option<Value>,
}

impl AttributeFilter {
    pub fn new(
        name: &str,
        default: Option<Value>,
        predicate: impl Fn(&Node, &Value) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.to_string(),
            predicate: Arc::new(predicate),
            default,
        }
    }
}

impl fmt::Debug for AttributeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttributeFilter")
            .field("name", &self.name)
            .field("default", &self.default)
            .finish_non_exhaustive()
    }
}

#[derive(Clone)]
pub struct QuickFilter {
    pub name: String,
    pub label: String,
    pub apply: QuickFilterFn,
}

impl QuickFilter {
    pub fn new(
        name: &str,
        label: &str,
        apply: impl Fn(&Filters) -> FilterPatch + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.to_string(),
            label: label.to_string(),
            apply: Arc::new(apply),
        }
    }
}

impl fmt::Debug for QuickFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuickFilter")
            .field("name", &self.name)
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Default)]
pub struct GraphConfig {
    pub node_kinds: Vec<KindMeta>,
    pub edge_kinds: Vec<KindMeta>,
    pub attribute_filters: Vec<AttributeFilter>,
    pub quick_filters: Vec<QuickFilter>,
}

impl GraphConfig {
    /// Container inventory: containers, networks, images and volumes.
    pub fn inventory() -> Self {
        let node_kinds = InventoryNodeKind::ALL
            .iter()
            .map(|kind| match kind {
                InventoryNodeKind::Container => {
                    KindMeta::new(kind.as_str(), "Containers", "#2563eb")
                }
                InventoryNodeKind::Network => KindMeta::new(kind.as_str(), "Networks", "#16a34a"),
                InventoryNodeKind::Image => KindMeta::new(kind.as_str(), "Images", "#d97706"),
                InventoryNodeKind::Volume => KindMeta::new(kind.as_str(), "Volumes", "#9333ea"),
            })
            .collect();
        let edge_kinds = InventoryEdgeKind::ALL
            .iter()
            .map(|kind| match kind {
                InventoryEdgeKind::DerivedFrom => {
                    KindMeta::new(kind.as_str(), "Derived from", "#94a3b8")
                }
                InventoryEdgeKind::ConnectedTo => {
                    KindMeta::new(kind.as_str(), "Connected to", "#22c55e")
                }
                InventoryEdgeKind::MountedInto => {
                    KindMeta::new(kind.as_str(), "Mounted into", "#a855f7")
                }
            })
            .collect();

        let attribute_filters = vec![
            AttributeFilter::new("image", None, |node, value| {
                let Some(wanted) = value.as_str().filter(|s| !s.is_empty()) else {
                    return true;
                };
                if node.kind != InventoryNodeKind::Container.as_str() {
                    return true;
                }
                node.attributes
                    .get("image")
                    .and_then(Value::as_str)
                    .map(|image| image.to_lowercase().contains(&wanted.to_lowercase()))
                    .unwrap_or(false)
            }),
            AttributeFilter::new("hide_system", Some(Value::Bool(true)), |node, value| {
                if value.as_bool() != Some(true) {
                    return true;
                }
                node.attributes.get("system").and_then(Value::as_bool) != Some(true)
            }),
        ];

        let quick_filters = vec![
            QuickFilter::new("running", "Running containers", |_| FilterPatch {
                running_only: Some(true),
                status: Some("all".to_string()),
                ..FilterPatch::default()
            }),
            QuickFilter::new("orphans", "Unused resources", |_| FilterPatch {
                connection: Some(ConnectionFilter::Orphaned),
                running_only: Some(false),
                ..FilterPatch::default()
            }),
            QuickFilter::new("containers", "Containers only", |filters| {
                let mut kinds = filters.node_kinds.clone();
                for kind in InventoryNodeKind::ALL {
                    kinds.insert(
                        kind.as_str().to_string(),
                        kind == InventoryNodeKind::Container,
                    );
                }
                FilterPatch {
                    node_kinds: Some(kinds),
                    ..FilterPatch::default()
                }
            }),
            QuickFilter::new("everything", "Show everything", |_| FilterPatch::clear_all()),
        ];

        Self {
            node_kinds,
            edge_kinds,
            attribute_filters,
            quick_filters,
        }
    }

    pub fn with_attribute_filters(mut self, filters: Vec<AttributeFilter>) -> Self {
        self.attribute_filters.extend(filters);
        self
    }

    pub fn node_kind(&self, kind: &str) -> Option<&KindMeta> {
        self.node_kinds.iter().find(|meta| meta.kind == kind)
    }

    pub fn quick_filter(&self, name: &str) -> Option<&QuickFilter> {
        self.quick_filters.iter().find(|preset| preset.name == name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleOp {
    Equals,
    Contains,
    Matches,
    OneOf,
    Exists,
}

/// Declarative attribute filter, loadable from a config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeRule {
    pub name: String,
    pub attribute: String,
    pub op: RuleOp,
    #[serde(default)]
    pub default: Option<Value>,
}

impl AttributeRule {
    pub fn compile(&self) -> anyhow::Result<AttributeFilter> {
        if self.op == RuleOp::Matches {
            if let Some(pattern) = self.default.as_ref().and_then(Value::as_str) {
                Regex::new(pattern)
                    .with_context(|| format!("attribute filter '{}': bad pattern", self.name))?;
            }
        }
        let attribute = self.attribute.clone();
        let op = self.op;
        let cache: Mutex<Option<(String, Regex)>> = Mutex::new(None);
        Ok(AttributeFilter::new(
            &self.name,
            self.default.clone(),
            move |node, wanted| {
                if wanted.is_null() {
                    return true;
                }
                let actual = node.attributes.get(&attribute);
                match op {
                    RuleOp::Exists => match wanted.as_bool() {
                        Some(expected) => actual.is_some_and(|v| !v.is_null()) == expected,
                        None => true,
                    },
                    RuleOp::Equals => actual.is_some_and(|v| values_equal(v, wanted)),
                    RuleOp::Contains => {
                        let needle = scalar_text(wanted).to_lowercase();
                        actual
                            .map(|v| scalar_text(v).to_lowercase().contains(&needle))
                            .unwrap_or(false)
                    }
                    RuleOp::OneOf => match wanted.as_array() {
                        Some(options) => actual
                            .is_some_and(|v| options.iter().any(|opt| values_equal(v, opt))),
                        None => actual.is_some_and(|v| values_equal(v, wanted)),
                    },
                    RuleOp::Matches => {
                        let Some(pattern) = wanted.as_str() else {
                            return true;
                        };
                        let Some(text) = actual.map(scalar_text) else {
                            return false;
                        };
                        match_cached(&cache, pattern, &text)
                    }
                }
            },
        ))
    }
}

fn match_cached(cache: &Mutex<Option<(String, Regex)>>, pattern: &str, text: &str) -> bool {
    let Ok(mut slot) = cache.lock() else {
        return true;
    };
    let fresh = match slot.as_ref() {
        Some((cached, _)) => cached != pattern,
        None => true,
    };
    if fresh {
        match Regex::new(pattern) {
            Ok(re) => *slot = Some((pattern.to_string(), re)),
            // An unparsable pattern typed at runtime filters nothing.
            Err(_) => return true,
        }
    }
    slot.as_ref().map(|(_, re)| re.is_match(text)).unwrap_or(true)
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn values_equal(actual: &Value, wanted: &Value) -> bool {
    match (actual, wanted) {
        (Value::String(a), Value::String(b)) => a.eq_ignore_ascii_case(b),
        (a, b) => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rule(op: RuleOp, default: Option<Value>) -> AttributeFilter {
        AttributeRule {
            name: "r".to_string(),
            attribute: "image".to_string(),
            op,
            default,
        }
        .compile()
        .unwrap()
    }

    #[test]
    fn rule_ops_evaluate_against_attribute() {
        let node = Node::new("c", "container").with_attribute("image", "nginx:1.25");
        assert!((rule(RuleOp::Contains, None).predicate)(&node, &json!("NGINX")));
        assert!(!(rule(RuleOp::Equals, None).predicate)(&node, &json!("nginx")));
        assert!((rule(RuleOp::Matches, None).predicate)(&node, &json!(r"^nginx:\d+")));
        assert!((rule(RuleOp::OneOf, None).predicate)(&node, &json!(["redis", "nginx:1.25"])));
        assert!((rule(RuleOp::Exists, None).predicate)(&node, &json!(true)));
        assert!(!(rule(RuleOp::Exists, None).predicate)(&Node::new("v", "volume"), &json!(true)));
    }

    #[test]
    fn runtime_bad_pattern_is_permissive() {
        let node = Node::new("c", "container").with_attribute("image", "nginx");
        assert!((rule(RuleOp::Matches, None).predicate)(&node, &json!("(")));
    }

    #[test]
    fn inventory_has_presets() {
        let config = GraphConfig::inventory();
        assert_eq!(config.node_kinds.len(), 4);
        assert!(config.quick_filter("running").is_some());
        assert_eq!(config.node_kind("volume").map(|m| m.label.as_str()), Some("Volumes"));
    }
}
