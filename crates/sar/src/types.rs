//! Core record types shared by fitting and scoring

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::hash::Hash;

/// External user/item identifier
///
/// Any hashable, cloneable value works: strings, integers, UUIDs.
pub trait EntityId: Clone + Eq + Hash + Debug + Send + Sync + 'static {}

impl<T> EntityId for T where T: Clone + Eq + Hash + Debug + Send + Sync + 'static {}

/// A single user-item event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interaction<U = String, I = String> {
    pub user_id: U,
    pub item_id: I,
    /// Event weight (rating, count, dwell...). Defaults to 1.0.
    #[serde(default = "default_weight")]
    pub weight: f64,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub event_type: Option<String>,
}

fn default_weight() -> f64 {
    1.0
}

impl<U, I> Interaction<U, I> {
    pub fn new(user_id: U, item_id: I) -> Self {
        Self {
            user_id,
            item_id,
            weight: default_weight(),
            timestamp: None,
            event_type: None,
        }
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn with_event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }
}

/// One row of the recommendation output table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation<U, I> {
    pub user_id: U,
    pub item_id: I,
    pub prediction: f64,
}

/// Item with a score, used by item-to-item and popularity queries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredItem<I> {
    pub item_id: I,
    pub score: f64,
}

/// What to do with identifiers the fitted model has never seen
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownPolicy {
    /// Treat as cold: zero affinity, empty result
    #[default]
    Ignore,
    /// Fail with `SarError::UnknownEntity`
    Reject,
}

/// Parameters for `recommend` calls
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RecommendParams {
    pub top_k: usize,
    pub remove_seen: bool,
    #[serde(default)]
    pub unknown: UnknownPolicy,
}

impl Default for RecommendParams {
    fn default() -> Self {
        Self {
            top_k: 10,
            remove_seen: true,
            unknown: UnknownPolicy::Ignore,
        }
    }
}

impl RecommendParams {
    pub fn top_k(top_k: usize) -> Self {
        Self {
            top_k,
            ..Self::default()
        }
    }

    pub fn keep_seen(mut self) -> Self {
        self.remove_seen = false;
        self
    }

    pub fn reject_unknown(mut self) -> Self {
        self.unknown = UnknownPolicy::Reject;
        self
    }
}

/// Size summary of a fitted model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelStats {
    pub users: usize,
    pub items: usize,
    pub affinity_nnz: usize,
    pub similarity_nnz: usize,
}
