//! Affinity Builder
//!
//! Aggregates interactions into the sparse user-item affinity matrix `A`.
//!
//! Order of operations, per `(user, item)` pair:
//! 1. each row's weight is decayed individually against the reference time
//! 2. decayed contributions are summed
//! 3. when normalization is on, the user's aggregated row is rescaled
//!
//! Normalization therefore always sees decayed values. Rows newer than the
//! reference time get a factor above 1; a contribution or sum that stops
//! being finite is a `Validation` error for the row that caused it.

use crate::config::{AffinityScaling, SarConfig};
use crate::error::{Result, SarError};
use crate::matrix::{self, SparseMatrix};
use crate::store::IndexedInteraction;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

const MILLIS_PER_DAY: f64 = 86_400_000.0;

/// Exponential half-life decay
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decay {
    pub half_life_days: f64,
    pub reference_time: DateTime<Utc>,
}

impl Decay {
    pub fn new(half_life_days: f64, reference_time: DateTime<Utc>) -> Result<Self> {
        if !(half_life_days > 0.0 && half_life_days.is_finite()) {
            return Err(SarError::invalid_parameter(
                "half_life_days",
                format!("must be greater than 0, got {}", half_life_days),
            ));
        }
        Ok(Self {
            half_life_days,
            reference_time,
        })
    }

    /// `2^(-(reference_time - timestamp) / half_life_days)`
    pub fn factor(&self, timestamp: DateTime<Utc>) -> f64 {
        let age_days =
            (self.reference_time - timestamp).num_milliseconds() as f64 / MILLIS_PER_DAY;
        (-age_days / self.half_life_days).exp2()
    }
}

/// Turns indexed interactions into affinity rows
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AffinityBuilder {
    decay: Option<Decay>,
    scaling: Option<AffinityScaling>,
}

impl AffinityBuilder {
    pub fn new(decay: Option<Decay>, scaling: Option<AffinityScaling>) -> Self {
        Self { decay, scaling }
    }

    /// Resolve decay settings against a batch of interactions.
    ///
    /// The reference time is, in priority order: the configured
    /// `reference_time`, `fallback_reference`, the latest timestamp in
    /// `entries`.
    pub fn from_config(
        config: &SarConfig,
        entries: &[IndexedInteraction],
        fallback_reference: Option<DateTime<Utc>>,
    ) -> Result<Self> {
        let decay = if config.time_decay_enabled {
            let latest = entries.iter().filter_map(|e| e.timestamp).max();
            match config.reference_time.or(fallback_reference).or(latest) {
                Some(reference_time) => Some(Decay::new(config.half_life_days, reference_time)?),
                None => None,
            }
        } else {
            None
        };

        let scaling = config.normalize_affinity.then_some(config.affinity_scaling);

        Ok(Self::new(decay, scaling))
    }

    pub fn decay(&self) -> Option<&Decay> {
        self.decay.as_ref()
    }

    fn contribution(&self, entry: &IndexedInteraction) -> f64 {
        match (&self.decay, entry.timestamp) {
            (Some(decay), Some(timestamp)) => entry.weight * decay.factor(timestamp),
            _ => entry.weight,
        }
    }

    /// Sorted, aggregated, optionally rescaled affinity entries per user.
    pub fn rows(&self, entries: &[IndexedInteraction], n_users: usize) -> Result<Vec<Vec<(usize, f64)>>> {
        let mut aggregated: Vec<BTreeMap<usize, f64>> = vec![BTreeMap::new(); n_users];
        for entry in entries {
            let contribution = self.contribution(entry);
            let total = aggregated[entry.user].entry(entry.item).or_insert(0.0);
            *total += contribution;
            if !total.is_finite() {
                return Err(SarError::validation(
                    entry.row,
                    format!(
                        "affinity is not finite (weight {}, decayed contribution {})",
                        entry.weight, contribution
                    ),
                ));
            }
        }

        Ok(aggregated
            .into_iter()
            .map(|row| {
                let row: Vec<(usize, f64)> = row.into_iter().filter(|&(_, v)| v > 0.0).collect();
                match self.scaling {
                    Some(scaling) => scale_row(row, scaling),
                    None => row,
                }
            })
            .collect())
    }

    /// Build `A` with the given `(users, items)` shape.
    pub fn build(&self, entries: &[IndexedInteraction], shape: (usize, usize)) -> Result<SparseMatrix> {
        let rows = self.rows(entries, shape.0)?;
        matrix::from_rows(shape, rows)
    }
}

fn scale_row(row: Vec<(usize, f64)>, scaling: AffinityScaling) -> Vec<(usize, f64)> {
    let divisor = match scaling {
        AffinityScaling::Max => row.iter().map(|&(_, v)| v).fold(0.0, f64::max),
        AffinityScaling::Sum => row.iter().map(|&(_, v)| v).sum(),
    };

    if divisor > 0.0 {
        row.into_iter().map(|(item, v)| (item, v / divisor)).collect()
    } else {
        row
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::value_at;
    use chrono::{Duration, TimeZone};

    fn entry(user: usize, item: usize, weight: f64) -> IndexedInteraction {
        IndexedInteraction {
            row: 0,
            user,
            item,
            weight,
            timestamp: None,
        }
    }

    fn reference() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_duplicates_are_summed() {
        let entries = vec![entry(0, 0, 1.0), entry(0, 0, 2.5), entry(1, 1, 1.0)];
        let a = AffinityBuilder::new(None, None).build(&entries, (2, 2)).unwrap();

        assert_eq!(value_at(&a, 0, 0), 3.5);
        assert_eq!(value_at(&a, 1, 1), 1.0);
        assert_eq!(value_at(&a, 0, 1), 0.0);
        assert_eq!(a.nnz(), 2);
    }

    #[test]
    fn test_zero_weight_not_materialized() {
        let entries = vec![entry(0, 0, 0.0), entry(0, 1, 1.0)];
        let a = AffinityBuilder::new(None, None).build(&entries, (1, 2)).unwrap();
        assert_eq!(a.nnz(), 1);
    }

    #[test]
    fn test_decay_factor_half_life() {
        let decay = Decay::new(30.0, reference()).unwrap();

        assert!((decay.factor(reference()) - 1.0).abs() < 1e-12);
        assert!((decay.factor(reference() - Duration::days(30)) - 0.5).abs() < 1e-12);
        assert!((decay.factor(reference() - Duration::days(60)) - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_decay_rejects_non_positive_half_life() {
        assert!(Decay::new(0.0, reference()).unwrap_err().is_invalid_parameter());
        assert!(Decay::new(-5.0, reference()).unwrap_err().is_invalid_parameter());
    }

    #[test]
    fn test_reference_defaults_to_latest_timestamp() {
        let mut early = entry(0, 0, 1.0);
        early.timestamp = Some(reference() - Duration::days(10));
        let mut late = entry(0, 1, 1.0);
        late.timestamp = Some(reference());

        let config = SarConfig::default().with_time_decay(10.0);
        let builder = AffinityBuilder::from_config(&config, &[early, late], None).unwrap();
        assert_eq!(builder.decay().unwrap().reference_time, reference());

        let a = builder.build(&[early, late], (1, 2)).unwrap();
        assert!((value_at(&a, 0, 0) - 0.5).abs() < 1e-12);
        assert!((value_at(&a, 0, 1) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_configured_reference_time_wins() {
        let mut e = entry(0, 0, 1.0);
        e.timestamp = Some(reference());
        let config = SarConfig::default()
            .with_time_decay(1.0)
            .with_reference_time(reference() + Duration::days(1));

        let builder = AffinityBuilder::from_config(&config, &[e], Some(reference())).unwrap();
        let a = builder.build(&[e], (1, 1)).unwrap();
        assert!((value_at(&a, 0, 0) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_max_scaling() {
        let entries = vec![entry(0, 0, 2.0), entry(0, 1, 4.0), entry(1, 0, 3.0)];
        let a = AffinityBuilder::new(None, Some(AffinityScaling::Max))
            .build(&entries, (2, 2))
            .unwrap();

        assert_eq!(value_at(&a, 0, 0), 0.5);
        assert_eq!(value_at(&a, 0, 1), 1.0);
        assert_eq!(value_at(&a, 1, 0), 1.0);
    }

    #[test]
    fn test_sum_scaling() {
        let entries = vec![entry(0, 0, 1.0), entry(0, 1, 3.0)];
        let a = AffinityBuilder::new(None, Some(AffinityScaling::Sum))
            .build(&entries, (1, 2))
            .unwrap();

        assert_eq!(value_at(&a, 0, 0), 0.25);
        assert_eq!(value_at(&a, 0, 1), 0.75);
    }

    #[test]
    fn test_normalization_applies_after_decay() {
        // decay-then-scale: (1.0, 2.0) -> (0.5, 1.0)
        // scale-then-decay would give (0.25, 0.5)
        let mut recent = entry(0, 0, 1.0);
        recent.timestamp = Some(reference());
        let mut old = entry(0, 1, 4.0);
        old.timestamp = Some(reference() - Duration::days(7));

        let config = SarConfig::default()
            .with_time_decay(7.0)
            .with_normalization(AffinityScaling::Max);
        let builder = AffinityBuilder::from_config(&config, &[recent, old], None).unwrap();
        let a = builder.build(&[recent, old], (1, 2)).unwrap();

        assert!((value_at(&a, 0, 0) - 0.5).abs() < 1e-12);
        assert!((value_at(&a, 0, 1) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_overflowing_decay_is_validation_error() {
        let mut future = entry(0, 0, 1.0);
        future.row = 3;
        future.timestamp = Some(reference() + Duration::days(20));
        let mut current = entry(0, 1, 1.0);
        current.timestamp = Some(reference());

        let config = SarConfig::default()
            .with_time_decay(0.01)
            .with_reference_time(reference())
            .with_normalization(AffinityScaling::Max);
        let builder = AffinityBuilder::from_config(&config, &[future, current], None).unwrap();

        let err = builder.build(&[future, current], (1, 2)).unwrap_err();
        assert!(matches!(err, SarError::Validation { row: 3, .. }));
    }

    #[test]
    fn test_newer_than_reference_grows_but_stays_finite() {
        let mut e = entry(0, 0, 1.0);
        e.timestamp = Some(reference() + Duration::days(30));
        let builder = AffinityBuilder::new(Some(Decay::new(30.0, reference()).unwrap()), None);

        let a = builder.build(&[e], (1, 1)).unwrap();
        assert!((value_at(&a, 0, 0) - 2.0).abs() < 1e-12);
    }
}
