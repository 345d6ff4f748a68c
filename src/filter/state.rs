use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

use super::catalog::GraphConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionFilter {
    #[default]
    All,
    Connected,
    Orphaned,
}

impl ConnectionFilter {
    pub fn from_token(token: &str) -> Option<Self> {
        match token.to_ascii_lowercase().as_str() {
            "all" => Some(Self::All),
            "connected" => Some(Self::Connected),
            "orphaned" => Some(Self::Orphaned),
            _ => None,
        }
    }
}

/// Filter configuration, immutable for the duration of one pipeline pass.
///
/// Kind maps list explicit visibility; kinds missing from a map are visible.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Filters {
    pub node_kinds: BTreeMap<String, bool>,
    pub edge_kinds: BTreeMap<String, bool>,
    pub status: String,
    pub connection: ConnectionFilter,
    pub search: String,
    pub orphaned_only: bool,
    pub running_only: bool,
    pub in_use_only: bool,
    pub excluded_node_ids: BTreeSet<String>,
    pub attribute_values: BTreeMap<String, Value>,
}

impl Default for Filters {
    fn default() -> Self {
        Self {
            node_kinds: BTreeMap::new(),
            edge_kinds: BTreeMap::new(),
            status: "all".to_string(),
            connection: ConnectionFilter::All,
            search: String::new(),
            orphaned_only: false,
            running_only: false,
            in_use_only: false,
            excluded_node_ids: BTreeSet::new(),
            attribute_values: BTreeMap::new(),
        }
    }
}

impl Filters {
    /// Defaults seeded with the visibility declared for each configured kind.
    pub fn for_config(config: &GraphConfig) -> Self {
        Self {
            node_kinds: config
                .node_kinds
                .iter()
                .map(|meta| (meta.kind.clone(), meta.visible))
                .collect(),
            edge_kinds: config
                .edge_kinds
                .iter()
                .map(|meta| (meta.kind.clone(), meta.visible))
                .collect(),
            ..Self::default()
        }
    }

    pub fn node_kind_visible(&self, kind: &str) -> bool {
        self.node_kinds.get(kind).copied().unwrap_or(true)
    }

    pub fn edge_kind_visible(&self, kind: &str) -> bool {
        self.edge_kinds.get(kind).copied().unwrap_or(true)
    }

    pub fn needs_connection_pass(&self) -> bool {
        self.connection != ConnectionFilter::All || self.orphaned_only
    }
}

/// Partial replacement produced by quick-filter presets. Each present field
/// replaces the whole corresponding field of [`Filters`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FilterPatch {
    pub node_kinds: Option<BTreeMap<String, bool>>,
    pub edge_kinds: Option<BTreeMap<String, bool>>,
    pub status: Option<String>,
    pub connection: Option<ConnectionFilter>,
    pub search: Option<String>,
    pub orphaned_only: Option<bool>,
    pub running_only: Option<bool>,
    pub in_use_only: Option<bool>,
    pub excluded_node_ids: Option<BTreeSet<String>>,
    pub attribute_values: Option<BTreeMap<String, Value>>,
}

impl FilterPatch {
    /// Patch that lifts every restriction except configured attribute defaults.
    pub fn clear_all() -> Self {
        Self {
            node_kinds: Some(BTreeMap::new()),
            edge_kinds: Some(BTreeMap::new()),
            status: Some("all".to_string()),
            connection: Some(ConnectionFilter::All),
            search: Some(String::new()),
            orphaned_only: Some(false),
            running_only: Some(false),
            in_use_only: Some(false),
            excluded_node_ids: Some(BTreeSet::new()),
            attribute_values: None,
        }
    }

    fn apply_to(self, mut filters: Filters) -> Filters {
        if let Some(v) = self.node_kinds {
            filters.node_kinds = v;
        }
        if let Some(v) = self.edge_kinds {
            filters.edge_kinds = v;
        }
        if let Some(v) = self.status {
            filters.status = v;
        }
        if let Some(v) = self.connection {
            filters.connection = v;
        }
        if let Some(v) = self.search {
            filters.search = v;
        }
        if let Some(v) = self.orphaned_only {
            filters.orphaned_only = v;
        }
        if let Some(v) = self.running_only {
            filters.running_only = v;
        }
        if let Some(v) = self.in_use_only {
            filters.in_use_only = v;
        }
        if let Some(v) = self.excluded_node_ids {
            filters.excluded_node_ids = v;
        }
        if let Some(v) = self.attribute_values {
            filters.attribute_values = v;
        }
        filters
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilterCommand {
    SetNodeKindVisible { kind: String, visible: bool },
    SetEdgeKindVisible { kind: String, visible: bool },
    SetStatus(String),
    SetConnection(ConnectionFilter),
    SetSearch(String),
    SetOrphanedOnly(bool),
    SetRunningOnly(bool),
    SetInUseOnly(bool),
    ExcludeNode(String),
    IncludeNode(String),
    ClearExcluded,
    /// `None` removes the value so the filter's default applies again.
    SetAttributeValue { name: String, value: Option<Value> },
    Apply(FilterPatch),
    Reset(Filters),
}

/// `(state, command) -> state`. The input is never modified; every field
/// touched by a command is replaced as a whole.
pub fn reduce(state: &Filters, command: FilterCommand) -> Filters {
    let mut next = state.clone();
    match command {
        FilterCommand::SetNodeKindVisible { kind, visible } => {
            let mut kinds = next.node_kinds.clone();
            kinds.insert(kind, visible);
            next.node_kinds = kinds;
        }
        FilterCommand::SetEdgeKindVisible { kind, visible } => {
            let mut kinds = next.edge_kinds.clone();
            kinds.insert(kind, visible);
            next.edge_kinds = kinds;
        }
        FilterCommand::SetStatus(status) => next.status = status,
        FilterCommand::SetConnection(connection) => next.connection = connection,
        FilterCommand::SetSearch(search) => next.search = search,
        FilterCommand::SetOrphanedOnly(value) => next.orphaned_only = value,
        FilterCommand::SetRunningOnly(value) => next.running_only = value,
        FilterCommand::SetInUseOnly(value) => next.in_use_only = value,
        FilterCommand::ExcludeNode(id) => {
            let mut excluded = next.excluded_node_ids.clone();
            excluded.insert(id);
            next.excluded_node_ids = excluded;
        }
        FilterCommand::IncludeNode(id) => {
            let mut excluded = next.excluded_node_ids.clone();
            excluded.remove(&id);
            next.excluded_node_ids = excluded;
        }
        FilterCommand::ClearExcluded => next.excluded_node_ids = BTreeSet::new(),
        FilterCommand::SetAttributeValue { name, value } => {
            let mut values = next.attribute_values.clone();
            match value {
                Some(value) => {
                    values.insert(name, value);
                }
                None => {
                    values.remove(&name);
                }
            }
            next.attribute_values = values;
        }
        FilterCommand::Apply(patch) => next = patch.apply_to(next),
        FilterCommand::Reset(filters) => next = filters,
    }
    next
}

/// Resolve a quick-filter preset by name and fold its patch into `state`.
pub fn apply_quick_filter(state: &Filters, config: &GraphConfig, name: &str) -> Option<Filters> {
    let preset = config.quick_filter(name)?;
    let patch = (preset.apply)(state);
    Some(reduce(state, FilterCommand::Apply(patch)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reduce_leaves_input_untouched() {
        let state = Filters::default();
        let next = reduce(
            &state,
            FilterCommand::SetNodeKindVisible {
                kind: "volume".to_string(),
                visible: false,
            },
        );
        assert!(state.node_kinds.is_empty());
        assert!(!next.node_kind_visible("volume"));
        assert!(next.node_kind_visible("image"));
    }

    #[test]
    fn attribute_value_can_be_cleared() {
        let state = reduce(
            &Filters::default(),
            FilterCommand::SetAttributeValue {
                name: "image".to_string(),
                value: Some(json!("redis")),
            },
        );
        assert_eq!(state.attribute_values.get("image"), Some(&json!("redis")));
        let cleared = reduce(
            &state,
            FilterCommand::SetAttributeValue {
                name: "image".to_string(),
                value: None,
            },
        );
        assert!(cleared.attribute_values.is_empty());
    }

    #[test]
    fn exclusion_round_trip() {
        let state = reduce(&Filters::default(), FilterCommand::ExcludeNode("a".into()));
        let state = reduce(&state, FilterCommand::ExcludeNode("b".into()));
        let state = reduce(&state, FilterCommand::IncludeNode("a".into()));
        assert_eq!(state.excluded_node_ids.len(), 1);
        assert!(state.excluded_node_ids.contains("b"));
        let state = reduce(&state, FilterCommand::ClearExcluded);
        assert!(state.excluded_node_ids.is_empty());
    }

    #[test]
    fn quick_filter_patches_whole_fields() {
        let config = GraphConfig::inventory();
        let start = reduce(&Filters::for_config(&config), FilterCommand::SetSearch("web".into()));
        let next = apply_quick_filter(&start, &config, "containers").unwrap();
        assert!(next.node_kind_visible("container"));
        assert!(!next.node_kind_visible("image"));
        assert_eq!(next.search, "web");

        let cleared = apply_quick_filter(&next, &config, "everything").unwrap();
        assert!(cleared.node_kind_visible("image"));
        assert!(cleared.search.is_empty());
        assert!(apply_quick_filter(&next, &config, "missing").is_none());
    }

    #[test]
    fn filters_deserialize_with_defaults() {
        let filters: Filters =
            serde_json::from_str(r#"{"connection":"orphaned","search":"db"}"#).unwrap();
        assert_eq!(filters.connection, ConnectionFilter::Orphaned);
        assert_eq!(filters.status, "all");
        assert!(filters.needs_connection_pass());
    }
}
