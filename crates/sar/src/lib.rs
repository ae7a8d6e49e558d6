//! SAR (Simple Algorithm for Recommendation)
//!
//! Neighborhood-based recommender built from a user-item interaction log:
//!
//! - **Affinity** `A`: per user-item weights, optionally time-decayed and
//!   row-normalized
//! - **Co-occurrence** `C = BᵗB` over the binarized affinity `B`
//! - **Similarity** `S`: `C` under a [`SimilarityMetric`]
//! - **Scores** `R = A·S`, ranked top-k with seen items removed
//!
//! # Example
//!
//! ```
//! use sar_recommender::{Interaction, RecommendParams, SarConfig, SarModel};
//!
//! let log = vec![
//!     Interaction::new("u1".to_string(), "i1".to_string()),
//!     Interaction::new("u1".to_string(), "i2".to_string()),
//!     Interaction::new("u2".to_string(), "i1".to_string()),
//! ];
//! let model = SarModel::fit(SarConfig::default(), &log).unwrap();
//!
//! let recs = model
//!     .recommend(&["u2".to_string()], &RecommendParams::top_k(5))
//!     .unwrap();
//! assert_eq!(recs[0].item_id, "i2");
//! ```

pub mod affinity;
pub mod config;
pub mod error;
pub mod matrix;
pub mod model;
pub mod observer;
pub mod persistence;
pub mod ranking;
pub mod scoring;
pub mod similarity;
pub mod store;
pub mod types;

// Re-export key types
pub use config::{AffinityScaling, ColumnMap, SarConfig, SimilarityMetric};
pub use error::{Result, SarError};
pub use model::{Sar, SarModel};
pub use observer::{FitObserver, FitStage, NoopObserver, TracingObserver};
pub use store::{read_json_records, IndexMap};
pub use types::*;
