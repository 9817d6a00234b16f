//! Deep merge of partially extracted module records.
//!
//! Every turn may extract a fragment of a module's record. Fragments are
//! folded into the accumulated record by [`merge_records`] using a strategy
//! table keyed by dot path (or by leaf key). Merging never removes a
//! previously captured value: `null`, empty strings and empty lists in the
//! update leave the existing value alone, and a scalar or list never
//! replaces a captured object.

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    /// Update wins when it carries a value.
    Replace,
    /// Ordered set union: existing items first, then new items, no duplicates.
    SetUnion,
    /// Text joined with the policy separator.
    Concatenate,
}

/// How concatenated provenance text treats a segment that is already there.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvenanceMode {
    /// Skip segments already present, so re-merging is idempotent.
    #[default]
    AppendDistinct,
    /// Always append, duplicating text on re-merge.
    Append,
}

impl FromStr for ProvenanceMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "append_distinct" | "distinct" => Ok(Self::AppendDistinct),
            "append" => Ok(Self::Append),
            other => Err(format!("unknown provenance mode: {other}")),
        }
    }
}

/// Strategy table for [`merge_records`].
///
/// Path patterns are exact dot paths or a prefix ending in `.*`, which matches
/// the direct children of that prefix. Path entries win over leaf-key entries;
/// anything unlisted recurses into objects and replaces everything else.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergePolicy {
    pub paths: BTreeMap<String, MergeStrategy>,
    pub keys: BTreeMap<String, MergeStrategy>,
    pub separator: String,
    pub provenance: ProvenanceMode,
}

impl MergePolicy {
    /// A policy that only replaces and recurses.
    pub fn replace_only() -> Self {
        Self {
            paths: BTreeMap::new(),
            keys: BTreeMap::new(),
            separator: "\n\n".to_string(),
            provenance: ProvenanceMode::default(),
        }
    }

    /// Accumulators and provenance fields of the business-plan records.
    pub fn business_plan() -> Self {
        let mut policy = Self::replace_only();
        for path in [
            "strengths.raw",
            "swot.*",
            "competition.competitors",
            "targetMarket.segments",
            "kpis.items",
            "team.founders",
            "milestones.items",
            "experience.qualifications",
        ] {
            policy = policy.with_path(path, MergeStrategy::SetUnion);
        }
        policy
            .with_key("sourceText", MergeStrategy::Concatenate)
            .with_key("provenance", MergeStrategy::Concatenate)
    }

    pub fn with_path(mut self, pattern: &str, strategy: MergeStrategy) -> Self {
        self.paths.insert(pattern.to_string(), strategy);
        self
    }

    pub fn with_key(mut self, key: &str, strategy: MergeStrategy) -> Self {
        self.keys.insert(key.to_string(), strategy);
        self
    }

    pub fn with_provenance(mut self, mode: ProvenanceMode) -> Self {
        self.provenance = mode;
        self
    }

    /// The explicit strategy for a field, if any.
    pub fn strategy_for(&self, path: &str, key: &str) -> Option<MergeStrategy> {
        if let Some(strategy) = self.paths.get(path) {
            return Some(*strategy);
        }
        let parent = path.rsplit_once('.').map(|(parent, _)| parent).unwrap_or("");
        self.paths
            .get(&format!("{parent}.*"))
            .or_else(|| self.keys.get(key))
            .copied()
    }
}

impl Default for MergePolicy {
    fn default() -> Self {
        Self::business_plan()
    }
}

/// Values that carry no information and never overwrite anything.
fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

/// Merge `update` into `existing`. Neither side has to be an object; a
/// non-object update is ignored at the top level.
pub fn merge_records(existing: &Value, update: &Value, policy: &MergePolicy) -> Value {
    let Value::Object(update) = update else {
        return existing.clone();
    };
    let base = match existing {
        Value::Object(map) => map.clone(),
        _ => Map::new(),
    };
    Value::Object(merge_maps(base, update, "", policy))
}

fn merge_maps(
    mut base: Map<String, Value>,
    update: &Map<String, Value>,
    prefix: &str,
    policy: &MergePolicy,
) -> Map<String, Value> {
    for (key, incoming) in update {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        let merged = merge_field(base.get(key), incoming, &path, key, policy);
        if let Some(value) = merged {
            base.insert(key.clone(), value);
        }
    }
    base
}

/// The merged field value, or `None` to leave the field untouched.
fn merge_field(
    existing: Option<&Value>,
    incoming: &Value,
    path: &str,
    key: &str,
    policy: &MergePolicy,
) -> Option<Value> {
    if is_blank(incoming) {
        return None;
    }
    match (policy.strategy_for(path, key), existing, incoming) {
        (Some(MergeStrategy::SetUnion), _, _) => Some(set_union(existing, incoming)),
        (Some(MergeStrategy::Concatenate), _, _) => concatenate_field(existing, incoming, path, policy),
        (_, Some(Value::Object(old)), Value::Object(new)) => {
            Some(Value::Object(merge_maps(old.clone(), new, path, policy)))
        }
        (_, None, Value::Object(new)) => {
            let merged = merge_maps(Map::new(), new, path, policy);
            (!merged.is_empty()).then_some(Value::Object(merged))
        }
        (_, Some(Value::Object(old)), _) if !old.is_empty() => {
            debug!(path, "Keeping object over non-object update");
            None
        }
        _ => Some(incoming.clone()),
    }
}

/// Append the update's text to the existing text. Values without a text form
/// leave the field untouched.
fn concatenate_field(
    existing: Option<&Value>,
    incoming: &Value,
    path: &str,
    policy: &MergePolicy,
) -> Option<Value> {
    let Some(new) = text_of(incoming, policy) else {
        debug!(path, "Dropping non-text update of a concatenated field");
        return None;
    };
    let old = match existing {
        None => String::new(),
        Some(value) if is_blank(value) => String::new(),
        Some(value) => match text_of(value, policy) {
            Some(text) => text,
            None => {
                debug!(path, "Keeping structured value over text update");
                return None;
            }
        },
    };
    Some(Value::String(concatenate(&old, &new, policy)))
}

/// Text form of scalars and of lists of scalars.
fn text_of(value: &Value, policy: &MergePolicy) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().filter_map(|item| text_of(item, policy)).collect();
            (!parts.is_empty()).then(|| parts.join(policy.separator.as_str()))
        }
        _ => None,
    }
}

fn items_of(value: Option<&Value>) -> Vec<Value> {
    match value {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items.clone(),
        Some(other) => vec![other.clone()],
    }
}

fn set_union(existing: Option<&Value>, incoming: &Value) -> Value {
    let mut items = items_of(existing);
    for item in items_of(Some(incoming)) {
        if !is_blank(&item) && !items.contains(&item) {
            items.push(item);
        }
    }
    Value::Array(items)
}

fn concatenate(old: &str, new: &str, policy: &MergePolicy) -> String {
    if old.trim().is_empty() {
        return new.to_string();
    }
    if policy.provenance == ProvenanceMode::AppendDistinct
        && old.split(policy.separator.as_str()).any(|segment| segment == new)
    {
        return old.to_string();
    }
    format!("{old}{}{new}", policy.separator)
}
