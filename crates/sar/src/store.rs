//! Interaction Store
//!
//! Validates raw interaction rows and maps external user/item identifiers
//! to dense zero-based indices. Every row is checked before any aggregation
//! starts, so a malformed log never yields a partially-built model.

use crate::config::{ColumnMap, SarConfig};
use crate::error::{Result, SarError};
use crate::types::{EntityId, Interaction};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::io::Read;

/// Bijective map between external identifiers and `0..len`
///
/// Indices are assigned in order of first appearance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "Vec<K>", into = "Vec<K>")]
pub struct IndexMap<K: EntityId> {
    ids: Vec<K>,
    positions: HashMap<K, usize>,
}

impl<K: EntityId> IndexMap<K> {
    pub fn new() -> Self {
        Self {
            ids: Vec::new(),
            positions: HashMap::new(),
        }
    }

    /// Index of `id`, assigning the next free index if it is new
    pub fn insert(&mut self, id: &K) -> usize {
        if let Some(&index) = self.positions.get(id) {
            return index;
        }
        let index = self.ids.len();
        self.ids.push(id.clone());
        self.positions.insert(id.clone(), index);
        index
    }

    pub fn index_of(&self, id: &K) -> Option<usize> {
        self.positions.get(id).copied()
    }

    pub fn id(&self, index: usize) -> Option<&K> {
        self.ids.get(index)
    }

    pub fn ids(&self) -> &[K] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl<K: EntityId> Default for IndexMap<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: EntityId> From<Vec<K>> for IndexMap<K> {
    fn from(ids: Vec<K>) -> Self {
        let mut map = IndexMap::new();
        for id in &ids {
            map.insert(id);
        }
        map
    }
}

impl<K: EntityId> From<IndexMap<K>> for Vec<K> {
    fn from(map: IndexMap<K>) -> Self {
        map.ids
    }
}

/// Interaction resolved to dense indices, with its effective weight
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndexedInteraction {
    /// Position of the source row in the caller's input
    pub row: usize,
    pub user: usize,
    pub item: usize,
    pub weight: f64,
    pub timestamp: Option<DateTime<Utc>>,
}

/// Validated, indexed training interactions
#[derive(Debug, Clone)]
pub struct InteractionStore<U: EntityId, I: EntityId> {
    pub users: IndexMap<U>,
    pub items: IndexMap<I>,
    pub entries: Vec<IndexedInteraction>,
}

impl<U: EntityId, I: EntityId> InteractionStore<U, I> {
    /// Validate every row, then index users and items.
    pub fn build(interactions: &[Interaction<U, I>], config: &SarConfig) -> Result<Self> {
        let weights = validate_rows(interactions, config)?;

        let mut users = IndexMap::new();
        let mut items = IndexMap::new();
        let entries = interactions
            .iter()
            .zip(weights)
            .enumerate()
            .map(|(row, (interaction, weight))| IndexedInteraction {
                row,
                user: users.insert(&interaction.user_id),
                item: items.insert(&interaction.item_id),
                weight,
                timestamp: interaction.timestamp,
            })
            .collect();

        Ok(Self {
            users,
            items,
            entries,
        })
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.users.len(), self.items.len())
    }
}

/// Check every row and return its effective weight.
///
/// # Errors
///
/// - `Configuration` when decay is enabled and a row has no timestamp
/// - `Validation` for non-finite or negative weights and unknown event
///   types (when event weights are configured)
pub fn validate_rows<U, I>(interactions: &[Interaction<U, I>], config: &SarConfig) -> Result<Vec<f64>> {
    interactions
        .iter()
        .enumerate()
        .map(|(row, interaction)| validate_row(row, interaction, config))
        .collect()
}

fn validate_row<U, I>(row: usize, interaction: &Interaction<U, I>, config: &SarConfig) -> Result<f64> {
    if !interaction.weight.is_finite() {
        return Err(SarError::validation(
            row,
            format!("weight must be finite, got {}", interaction.weight),
        ));
    }
    if interaction.weight < 0.0 {
        return Err(SarError::validation(
            row,
            format!("weight must be non-negative, got {}", interaction.weight),
        ));
    }

    if config.time_decay_enabled && interaction.timestamp.is_none() {
        return Err(SarError::configuration(
            format!(
                "time decay is enabled but row {} has no '{}' value",
                row, config.columns.timestamp
            ),
            Some("timestamp"),
        ));
    }

    let multiplier = match (&interaction.event_type, config.event_weights.is_empty()) {
        (_, true) | (None, false) => 1.0,
        (Some(event_type), false) => config.event_weight(event_type).ok_or_else(|| {
            SarError::validation(row, format!("unknown event type '{}'", event_type))
        })?,
    };

    Ok(interaction.weight * multiplier)
}

/// Read a JSON array of interaction records.
///
/// Ids may be strings or integers and are normalized to `String`. A missing
/// or null rating defaults to 1.0. Timestamps may be epoch seconds or
/// RFC 3339 strings.
///
/// # Errors
///
/// - `Configuration` when a record lacks the user or item column
/// - `Validation` when a value has the wrong type
pub fn read_json_records<R: Read>(reader: R, columns: &ColumnMap) -> Result<Vec<Interaction>> {
    let records: Vec<Value> = serde_json::from_reader(reader)?;

    records
        .iter()
        .enumerate()
        .map(|(row, record)| {
            let record = record
                .as_object()
                .ok_or_else(|| SarError::validation(row, "record is not a JSON object"))?;
            parse_record(row, record, columns)
        })
        .collect()
}

fn parse_record(row: usize, record: &Map<String, Value>, columns: &ColumnMap) -> Result<Interaction> {
    let user_id = required_id(row, record, &columns.user)?;
    let item_id = required_id(row, record, &columns.item)?;

    let weight = match record.get(&columns.rating) {
        None | Some(Value::Null) => 1.0,
        Some(value) => value.as_f64().ok_or_else(|| {
            SarError::validation(row, format!("'{}' is not a number: {}", columns.rating, value))
        })?,
    };

    let timestamp = match record.get(&columns.timestamp) {
        None | Some(Value::Null) => None,
        Some(value) => Some(parse_timestamp(row, &columns.timestamp, value)?),
    };

    let event_type = match record.get(&columns.event_type) {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(value) => {
            return Err(SarError::validation(
                row,
                format!("'{}' is not a string: {}", columns.event_type, value),
            ))
        }
    };

    Ok(Interaction {
        user_id,
        item_id,
        weight,
        timestamp,
        event_type,
    })
}

fn required_id(row: usize, record: &Map<String, Value>, column: &str) -> Result<String> {
    match record.get(column) {
        None | Some(Value::Null) => Err(SarError::configuration(
            format!("record {} is missing required column '{}'", row, column),
            Some(column),
        )),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        Some(value) => Err(SarError::validation(
            row,
            format!("'{}' must be a string or number, got {}", column, value),
        )),
    }
}

fn parse_timestamp(row: usize, column: &str, value: &Value) -> Result<DateTime<Utc>> {
    let invalid = || SarError::validation(row, format!("'{}' is not a valid timestamp: {}", column, value));

    match value {
        Value::Number(n) => {
            let seconds = n.as_f64().ok_or_else(invalid)?;
            let millis = (seconds * 1000.0).round() as i64;
            Utc.timestamp_millis_opt(millis).single().ok_or_else(invalid)
        }
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|_| invalid()),
        _ => Err(invalid()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn interaction(user: &str, item: &str) -> Interaction {
        Interaction::new(user.to_string(), item.to_string())
    }

    #[test]
    fn test_index_map_first_appearance_order() {
        let mut map = IndexMap::new();
        assert_eq!(map.insert(&"b".to_string()), 0);
        assert_eq!(map.insert(&"a".to_string()), 1);
        assert_eq!(map.insert(&"b".to_string()), 0);

        assert_eq!(map.len(), 2);
        assert_eq!(map.index_of(&"a".to_string()), Some(1));
        assert_eq!(map.id(0), Some(&"b".to_string()));
        assert_eq!(map.index_of(&"z".to_string()), None);
    }

    #[test]
    fn test_store_keeps_duplicate_rows() {
        let rows = vec![
            interaction("u1", "i1"),
            interaction("u1", "i1").with_weight(2.0),
            interaction("u2", "i2"),
        ];
        let store = InteractionStore::build(&rows, &SarConfig::default()).unwrap();

        assert_eq!(store.shape(), (2, 2));
        assert_eq!(store.entries.len(), 3);
        assert_eq!(store.entries[1].user, 0);
        assert_eq!(store.entries[1].item, 0);
        assert_eq!(store.entries[1].weight, 2.0);
    }

    #[test]
    fn test_negative_weight_is_validation_error() {
        let rows = vec![interaction("u1", "i1"), interaction("u1", "i2").with_weight(-1.0)];
        let err = InteractionStore::build(&rows, &SarConfig::default()).unwrap_err();

        match err {
            SarError::Validation { row, .. } => assert_eq!(row, 1),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_nan_weight_is_validation_error() {
        let rows = vec![interaction("u1", "i1").with_weight(f64::NAN)];
        assert!(matches!(
            validate_rows(&rows, &SarConfig::default()),
            Err(SarError::Validation { row: 0, .. })
        ));
    }

    #[test]
    fn test_decay_without_timestamp_is_configuration_error() {
        let rows = vec![interaction("u1", "i1")];
        let config = SarConfig::default().with_time_decay(30.0);

        let err = InteractionStore::build(&rows, &config).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_event_weights_applied() {
        let config = SarConfig::default()
            .with_event_weight("click", 1.0)
            .with_event_weight("purchase", 8.0);
        let rows = vec![
            interaction("u1", "i1").with_event_type("purchase"),
            interaction("u1", "i2").with_weight(0.5).with_event_type("click"),
            interaction("u1", "i3"),
        ];

        assert_eq!(validate_rows(&rows, &config).unwrap(), vec![8.0, 0.5, 1.0]);

        let mixed_case = vec![interaction("u1", "i1").with_event_type("Purchase")];
        assert_eq!(validate_rows(&mixed_case, &config).unwrap(), vec![8.0]);

        let unknown = vec![interaction("u1", "i1").with_event_type("refund")];
        assert!(matches!(
            validate_rows(&unknown, &config),
            Err(SarError::Validation { row: 0, .. })
        ));
    }

    #[test]
    fn test_event_types_ignored_without_weights() {
        let rows = vec![interaction("u1", "i1").with_event_type("anything")];
        assert_eq!(validate_rows(&rows, &SarConfig::default()).unwrap(), vec![1.0]);
    }

    #[test]
    fn test_read_json_records() {
        let json = r#"[
            {"userID": "u1", "itemID": 10, "rating": 4.0, "timestamp": 86400},
            {"userID": 2, "itemID": "i2", "timestamp": "2024-01-01T12:00:00Z"},
            {"userID": "u3", "itemID": "i3", "rating": null, "event_type": "click"}
        ]"#;

        let rows = read_json_records(json.as_bytes(), &ColumnMap::default()).unwrap();
        assert_eq!(rows.len(), 3);

        assert_eq!(rows[0].user_id, "u1");
        assert_eq!(rows[0].item_id, "10");
        assert_eq!(rows[0].weight, 4.0);
        assert_eq!(rows[0].timestamp, Utc.timestamp_opt(86400, 0).single());

        assert_eq!(rows[1].user_id, "2");
        assert_eq!(rows[1].weight, 1.0);
        assert_eq!(
            rows[1].timestamp,
            Some(Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap())
        );

        assert_eq!(rows[2].timestamp, None);
        assert_eq!(rows[2].event_type.as_deref(), Some("click"));
    }

    #[test]
    fn test_read_json_records_custom_columns() {
        let columns = ColumnMap {
            user: "customer".to_string(),
            item: "sku".to_string(),
            rating: "qty".to_string(),
            ..ColumnMap::default()
        };
        let json = r#"[{"customer": "c1", "sku": "s1", "qty": 3}]"#;

        let rows = read_json_records(json.as_bytes(), &columns).unwrap();
        assert_eq!(rows[0].user_id, "c1");
        assert_eq!(rows[0].item_id, "s1");
        assert_eq!(rows[0].weight, 3.0);
    }

    #[test]
    fn test_missing_required_column() {
        let json = r#"[{"userID": "u1"}]"#;
        let err = read_json_records(json.as_bytes(), &ColumnMap::default()).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_mistyped_rating() {
        let json = r#"[{"userID": "u1", "itemID": "i1"}, {"userID": "u1", "itemID": "i2", "rating": "high"}]"#;
        let err = read_json_records(json.as_bytes(), &ColumnMap::default()).unwrap_err();
        assert!(matches!(err, SarError::Validation { row: 1, .. }));
    }
}
