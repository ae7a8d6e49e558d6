//! SAR fitting and the fitted model
//!
//! [`Sar`] runs the one-shot fit pipeline (index, affinity, co-occurrence,
//! similarity) and returns a fresh [`SarModel`]. The model is immutable;
//! re-fitting builds a new value, so readers can share a model across
//! threads without locking.

use crate::affinity::AffinityBuilder;
use crate::config::SarConfig;
use crate::error::{Result, SarError};
use crate::matrix::{self, SparseMatrix};
use crate::observer::{FitObserver, FitStage, NoopObserver};
use crate::ranking;
use crate::scoring;
use crate::similarity;
use crate::store::{validate_rows, IndexMap, IndexedInteraction, InteractionStore};
use crate::types::{
    EntityId, Interaction, ModelStats, RecommendParams, Recommendation, ScoredItem, UnknownPolicy,
};
use chrono::{DateTime, Utc};
use ndarray::Array2;
use rayon::prelude::*;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// SAR fitter
#[derive(Clone)]
pub struct Sar {
    config: SarConfig,
    observer: Arc<dyn FitObserver>,
}

impl fmt::Debug for Sar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sar").field("config", &self.config).finish_non_exhaustive()
    }
}

impl Sar {
    pub fn new(config: SarConfig) -> Self {
        Self {
            config,
            observer: Arc::new(NoopObserver),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn FitObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn config(&self) -> &SarConfig {
        &self.config
    }

    /// Fit a model on `interactions`.
    ///
    /// Configuration and every row are validated before anything is built.
    pub fn fit<U: EntityId, I: EntityId>(
        &self,
        interactions: &[Interaction<U, I>],
    ) -> Result<SarModel<U, I>> {
        let span = tracing::info_span!(
            "sar_fit",
            rows = interactions.len(),
            metric = %self.config.similarity_metric
        );
        let _guard = span.enter();

        self.config.validate()?;
        let parallel = self.config.parallel;

        let store = self.stage(
            FitStage::Indexing,
            || InteractionStore::build(interactions, &self.config),
            |store: &InteractionStore<U, I>| store.entries.len(),
        )?;
        let shape = store.shape();

        let builder = AffinityBuilder::from_config(&self.config, &store.entries, None)?;
        let reference_time = builder.decay().map(|decay| decay.reference_time);

        let affinity = self.stage(
            FitStage::Affinity,
            || builder.build(&store.entries, shape),
            |a: &SparseMatrix| a.nnz(),
        )?;

        let (cooccurrence, popularity) = self.stage(
            FitStage::Cooccurrence,
            || {
                let binary = matrix::binarize(&affinity)?;
                let counts = similarity::cooccurrence(&binary, parallel)?;
                let popularity = similarity::item_popularity(&counts);
                Ok((similarity::apply_threshold(&counts, self.config.threshold)?, popularity))
            },
            |(c, _): &(SparseMatrix, Vec<f64>)| c.nnz(),
        )?;

        let similarity = self.stage(
            FitStage::Similarity,
            || similarity::similarity(&cooccurrence, self.config.similarity_metric, parallel),
            |s: &SparseMatrix| s.nnz(),
        )?;

        let model = SarModel {
            config: self.config.clone(),
            users: store.users,
            items: store.items,
            affinity,
            similarity,
            popularity,
            reference_time,
        };

        let stats = model.stats();
        tracing::info!(
            users = stats.users,
            items = stats.items,
            affinity_nnz = stats.affinity_nnz,
            similarity_nnz = stats.similarity_nnz,
            "SAR model fitted"
        );

        Ok(model)
    }

    fn stage<T>(
        &self,
        stage: FitStage,
        run: impl FnOnce() -> Result<T>,
        nnz: impl Fn(&T) -> usize,
    ) -> Result<T> {
        self.observer.stage_started(stage);
        let started = Instant::now();
        let output = run()?;
        self.observer.stage_finished(stage, started.elapsed(), nnz(&output));
        Ok(output)
    }
}

/// Fitted SAR model
#[derive(Debug, Clone)]
pub struct SarModel<U: EntityId = String, I: EntityId = String> {
    pub(crate) config: SarConfig,
    pub(crate) users: IndexMap<U>,
    pub(crate) items: IndexMap<I>,
    pub(crate) affinity: SparseMatrix,
    pub(crate) similarity: SparseMatrix,
    pub(crate) popularity: Vec<f64>,
    pub(crate) reference_time: Option<DateTime<Utc>>,
}

impl<U: EntityId, I: EntityId> SarModel<U, I> {
    /// Shorthand for `Sar::new(config).fit(interactions)`
    pub fn fit(config: SarConfig, interactions: &[Interaction<U, I>]) -> Result<Self> {
        Sar::new(config).fit(interactions)
    }

    /// Top-k recommendations for known users.
    ///
    /// Rows come back sorted by user index, then score descending. Users
    /// outside the fit index produce no rows unless `params.unknown` is
    /// `Reject`.
    pub fn recommend(&self, users: &[U], params: &RecommendParams) -> Result<Vec<Recommendation<U, I>>> {
        ranking::validate_top_k(params.top_k)?;
        let _span = tracing::debug_span!("sar_recommend", users = users.len(), top_k = params.top_k)
            .entered();

        let mut indices = Vec::with_capacity(users.len());
        for user in users {
            match self.users.index_of(user) {
                Some(index) => indices.push(index),
                None => self.unknown("user", user, params.unknown)?,
            }
        }
        indices.sort_unstable();
        indices.dedup();

        // one dense score row per user at a time
        let rank = |&user: &usize| {
            let scores = scoring::score_user(&self.affinity, user, &self.similarity);
            let seen = if params.remove_seen {
                matrix::positive_columns(&self.affinity, user)
            } else {
                Vec::new()
            };
            ranking::top_k(scores.view(), params.top_k, &seen)
        };
        let ranked: Vec<Vec<(usize, f64)>> = if self.config.parallel {
            indices.par_iter().map(rank).collect()
        } else {
            indices.iter().map(rank).collect()
        };

        let mut output = Vec::new();
        for (&user, ranked) in indices.iter().zip(ranked) {
            self.push_rows(&mut output, &self.users.ids()[user], ranked);
        }

        Ok(output)
    }

    /// Score users that were not part of the fit from ad-hoc interactions.
    ///
    /// Nothing is written back into the model. Items outside the fit index
    /// are dropped (or rejected under `UnknownPolicy::Reject`). Seen items
    /// are the ones with positive ad-hoc affinity. Users are emitted in
    /// order of first appearance.
    pub fn recommend_adhoc(
        &self,
        interactions: &[Interaction<U, I>],
        params: &RecommendParams,
    ) -> Result<Vec<Recommendation<U, I>>> {
        ranking::validate_top_k(params.top_k)?;
        let _span = tracing::debug_span!(
            "sar_recommend_adhoc",
            rows = interactions.len(),
            top_k = params.top_k
        )
        .entered();

        let weights = validate_rows(interactions, &self.config)?;

        let mut users = IndexMap::new();
        let mut entries = Vec::with_capacity(interactions.len());
        let mut dropped = 0usize;
        for (row, (interaction, weight)) in interactions.iter().zip(weights).enumerate() {
            let user = users.insert(&interaction.user_id);
            match self.items.index_of(&interaction.item_id) {
                Some(item) => entries.push(IndexedInteraction {
                    row,
                    user,
                    item,
                    weight,
                    timestamp: interaction.timestamp,
                }),
                None => {
                    self.unknown("item", &interaction.item_id, params.unknown)?;
                    dropped += 1;
                }
            }
        }
        if dropped > 0 {
            tracing::warn!(dropped, "Ignoring ad-hoc interactions with items unknown to the model");
        }

        let builder = AffinityBuilder::from_config(&self.config, &entries, self.reference_time)?;
        let rows = builder.rows(&entries, users.len())?;

        let mut output = Vec::new();
        for (user, row) in rows.iter().enumerate() {
            if row.is_empty() {
                continue;
            }
            let scores = scoring::score_entries(row, &self.similarity);
            let seen: Vec<usize> = if params.remove_seen {
                row.iter().map(|&(item, _)| item).collect()
            } else {
                Vec::new()
            };
            let ranked = ranking::top_k(scores.view(), params.top_k, &seen);
            self.push_rows(&mut output, &users.ids()[user], ranked);
        }

        Ok(output)
    }

    /// Dense score rows `R[u, ·]` in request order; unknown users get zeros.
    pub fn score(&self, users: &[U]) -> Array2<f64> {
        let rows: Vec<Option<usize>> = users.iter().map(|user| self.users.index_of(user)).collect();
        scoring::score_users(&self.affinity, &rows, &self.similarity, self.config.parallel)
    }

    /// `R[u, i]` for each pair; cold users or items score 0.
    pub fn predict(&self, pairs: &[(U, I)]) -> Vec<f64> {
        pairs
            .iter()
            .map(|(user, item)| {
                match (self.users.index_of(user), self.items.index_of(item)) {
                    (Some(user), Some(item)) => self.predict_index(user, item),
                    _ => 0.0,
                }
            })
            .collect()
    }

    fn predict_index(&self, user: usize, item: usize) -> f64 {
        match self.affinity.outer_view(user) {
            Some(row) => row
                .iter()
                .map(|(other, &weight)| weight * matrix::value_at(&self.similarity, other, item))
                .sum(),
            None => 0.0,
        }
    }

    /// The `k` items most similar to `item`, excluding itself.
    pub fn similar_items(&self, item: &I, k: usize) -> Result<Vec<ScoredItem<I>>> {
        ranking::validate_top_k(k)?;
        let Some(index) = self.items.index_of(item) else {
            return Ok(Vec::new());
        };

        let mut candidates: Vec<(usize, f64)> = match self.similarity.outer_view(index) {
            Some(row) => row
                .iter()
                .filter(|&(other, &score)| other != index && score > 0.0)
                .map(|(other, &score)| (other, score))
                .collect(),
            None => Vec::new(),
        };
        ranking::select(&mut candidates, k);

        Ok(self.scored_items(candidates))
    }

    /// The `k` items with the most distinct users.
    pub fn popular_items(&self, k: usize) -> Result<Vec<ScoredItem<I>>> {
        ranking::validate_top_k(k)?;

        let mut candidates: Vec<(usize, f64)> = self
            .popularity
            .iter()
            .copied()
            .enumerate()
            .filter(|&(_, count)| count > 0.0)
            .collect();
        ranking::select(&mut candidates, k);

        Ok(self.scored_items(candidates))
    }

    pub fn stats(&self) -> ModelStats {
        ModelStats {
            users: self.users.len(),
            items: self.items.len(),
            affinity_nnz: self.affinity.nnz(),
            similarity_nnz: self.similarity.nnz(),
        }
    }

    pub fn config(&self) -> &SarConfig {
        &self.config
    }

    pub fn users(&self) -> &IndexMap<U> {
        &self.users
    }

    pub fn items(&self) -> &IndexMap<I> {
        &self.items
    }

    /// User-item affinity `A`
    pub fn affinity(&self) -> &SparseMatrix {
        &self.affinity
    }

    /// Item-item similarity `S`
    pub fn similarity(&self) -> &SparseMatrix {
        &self.similarity
    }

    /// `C[i,i]` per item, before thresholding
    pub fn popularity(&self) -> &[f64] {
        &self.popularity
    }

    /// Decay reference time used at fit, if decay was enabled
    pub fn reference_time(&self) -> Option<DateTime<Utc>> {
        self.reference_time
    }

    fn unknown<K: EntityId>(&self, kind: &'static str, id: &K, policy: UnknownPolicy) -> Result<()> {
        match policy {
            UnknownPolicy::Ignore => Ok(()),
            UnknownPolicy::Reject => Err(SarError::UnknownEntity {
                kind,
                id: format!("{:?}", id),
            }),
        }
    }

    fn push_rows(&self, output: &mut Vec<Recommendation<U, I>>, user: &U, ranked: Vec<(usize, f64)>) {
        output.extend(ranked.into_iter().map(|(item, prediction)| Recommendation {
            user_id: user.clone(),
            item_id: self.items.ids()[item].clone(),
            prediction,
        }));
    }

    fn scored_items(&self, ranked: Vec<(usize, f64)>) -> Vec<ScoredItem<I>> {
        ranked
            .into_iter()
            .map(|(item, score)| ScoredItem {
                item_id: self.items.ids()[item].clone(),
                score,
            })
            .collect()
    }
}
