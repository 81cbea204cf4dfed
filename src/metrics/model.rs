// src/metrics/model.rs
//
// Typed records decoded from the node maps the store returns, and the
// accumulated result of one resolution.

use crate::datatypes::values::Value;
use serde_json::json;
use std::collections::{BTreeMap, HashMap};

type Properties = BTreeMap<String, Value>;

fn node_map<'a>(value: &'a Value, kind: &str) -> Result<&'a Properties, String> {
    value
        .as_map()
        .ok_or_else(|| format!("expected a {} node, got {}", kind, value.type_name()))
}

fn required_str(props: &Properties, kind: &str, key: &str) -> Result<String, String> {
    match props.get(key) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) => Err(format!(
            "{} property `{}` must be a string, got {}",
            kind,
            key,
            other.type_name()
        )),
        None => Err(format!("{} node has no `{}` property", kind, key)),
    }
}

fn optional_str(props: &Properties, key: &str) -> Option<String> {
    props.get(key).and_then(|v| v.as_str()).map(str::to_string)
}

// ============================================================================
// Records
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Metric {
    pub id: String,
    pub alias: String,
    /// Ids of the metrics this one is derived from, in declared order.
    pub dependent_metrics: Vec<String>,
    /// Full node map as stored, including `_label`.
    pub properties: Properties,
}

impl Metric {
    pub fn from_value(value: &Value) -> Result<Self, String> {
        let props = node_map(value, "Metric")?;
        let id = required_str(props, "Metric", "id")?;
        let dependent_metrics = match props.get("dependent_metrics") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::List(items)) => items
                .iter()
                .map(|item| {
                    item.as_str().map(str::to_string).ok_or_else(|| {
                        format!(
                            "metric {} lists a non-string dependency ({})",
                            id,
                            item.type_name()
                        )
                    })
                })
                .collect::<Result<_, _>>()?,
            Some(other) => {
                return Err(format!(
                    "metric {}: dependent_metrics must be a list of metric ids, got {}",
                    id,
                    other.type_name()
                ))
            }
        };
        Ok(Metric {
            alias: optional_str(props, "alias").unwrap_or_default(),
            id,
            dependent_metrics,
            properties: props.clone(),
        })
    }

    pub fn is_derived(&self) -> bool {
        !self.dependent_metrics.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Dimension {
    pub id: String,
    pub name: String,
    /// Downstream queries must filter on a required dimension.
    pub required: bool,
    pub properties: Properties,
}

impl Dimension {
    pub fn from_value(value: &Value) -> Result<Self, String> {
        let props = node_map(value, "Dimension")?;
        Ok(Dimension {
            id: required_str(props, "Dimension", "id")?,
            name: optional_str(props, "name").unwrap_or_default(),
            required: props
                .get("required")
                .and_then(|v| v.as_bool())
                .unwrap_or(false),
            properties: props.clone(),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DataSource {
    pub table_name: String,
    pub properties: Properties,
}

impl DataSource {
    pub fn from_value(value: &Value) -> Result<Self, String> {
        let props = node_map(value, "DataSource")?;
        Ok(DataSource {
            table_name: required_str(props, "DataSource", "table_name")?,
            properties: props.clone(),
        })
    }
}

// ============================================================================
// KeyedMap
// ============================================================================

/// Map that iterates in first-insertion order. Re-inserting a key replaces
/// the value in place.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyedMap<V> {
    entries: Vec<(String, V)>,
    index: HashMap<String, usize>,
}

impl<V> Default for KeyedMap<V> {
    fn default() -> Self {
        KeyedMap {
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }
}

impl<V> KeyedMap<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: String, value: V) {
        match self.index.get(&key) {
            Some(&pos) => self.entries[pos].1 = value,
            None => {
                self.index.insert(key.clone(), self.entries.len());
                self.entries.push((key, value));
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&V> {
        self.index.get(key).map(|&pos| &self.entries[pos].1)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.entries.iter().map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ============================================================================
// ResolutionResult
// ============================================================================

/// Everything one `resolve` call collected. Metrics appear once each, in
/// the order their expansion finished; dimensions are keyed by id and data
/// sources by table name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolutionResult {
    pub metrics: Vec<Metric>,
    pub dimensions: KeyedMap<Dimension>,
    pub data_sources: KeyedMap<DataSource>,
}

impl ResolutionResult {
    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty() && self.dimensions.is_empty() && self.data_sources.is_empty()
    }

    pub fn metric_ids(&self) -> Vec<&str> {
        self.metrics.iter().map(|m| m.id.as_str()).collect()
    }

    pub fn required_dimensions(&self) -> impl Iterator<Item = &Dimension> {
        self.dimensions.values().filter(|d| d.required)
    }

    /// `{"m": [...], "d": [...], "ds": [...]}` with each entry the node's
    /// full property map.
    pub fn to_payload(&self) -> serde_json::Value {
        let m: Vec<_> = self
            .metrics
            .iter()
            .map(|x| Value::Map(x.properties.clone()).to_json())
            .collect();
        let d: Vec<_> = self
            .dimensions
            .values()
            .map(|x| Value::Map(x.properties.clone()).to_json())
            .collect();
        let ds: Vec<_> = self
            .data_sources
            .values()
            .map(|x| Value::Map(x.properties.clone()).to_json())
            .collect();
        json!({ "m": m, "d": d, "ds": ds })
    }
}
