//! Model persistence
//!
//! A fitted model is stored with bincode as a flat record: both index maps,
//! `A` and `S` as `(row, col, value)` triplets with their shapes, item
//! popularity, the decay reference time and the fit configuration. That is
//! enough to resume scoring without re-fitting.

use crate::config::SarConfig;
use crate::error::{Result, SarError};
use crate::matrix::{self, SparseMatrix};
use crate::model::SarModel;
use crate::store::IndexMap;
use crate::types::EntityId;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

const FORMAT_VERSION: u32 = 1;

type Triplets = Vec<(usize, usize, f64)>;

/// Serializable representation of a fitted model
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(
    serialize = "U: Serialize, I: Serialize",
    deserialize = "U: DeserializeOwned, I: DeserializeOwned"
))]
struct SerializableModel<U: EntityId, I: EntityId> {
    format_version: u32,
    config: SarConfig,
    users: IndexMap<U>,
    items: IndexMap<I>,
    affinity_shape: (usize, usize),
    affinity: Triplets,
    similarity_shape: (usize, usize),
    similarity: Triplets,
    popularity: Vec<f64>,
    reference_time: Option<DateTime<Utc>>,
}

impl<U: EntityId, I: EntityId> SerializableModel<U, I> {
    fn from_model(model: &SarModel<U, I>) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            config: model.config.clone(),
            users: model.users.clone(),
            items: model.items.clone(),
            affinity_shape: model.affinity.shape(),
            affinity: matrix::to_triplets(&model.affinity),
            similarity_shape: model.similarity.shape(),
            similarity: matrix::to_triplets(&model.similarity),
            popularity: model.popularity.clone(),
            reference_time: model.reference_time,
        }
    }

    fn into_model(self) -> Result<SarModel<U, I>> {
        if self.format_version != FORMAT_VERSION {
            return Err(SarError::Persistence {
                message: format!(
                    "unsupported model format version {} (expected {})",
                    self.format_version, FORMAT_VERSION
                ),
            });
        }

        let (n_users, n_items) = (self.users.len(), self.items.len());
        check_shape("affinity", self.affinity_shape, (n_users, n_items))?;
        check_shape("similarity", self.similarity_shape, (n_items, n_items))?;
        if self.popularity.len() != n_items {
            return Err(SarError::Persistence {
                message: format!(
                    "popularity has {} entries for {} items",
                    self.popularity.len(),
                    n_items
                ),
            });
        }
        check_values("affinity", &self.affinity)?;
        check_values("similarity", &self.similarity)?;
        if let Some(count) = self.popularity.iter().find(|c| !(c.is_finite() && **c >= 0.0)) {
            return Err(SarError::Persistence {
                message: format!("popularity holds invalid count {}", count),
            });
        }
        self.config.validate()?;

        let affinity: SparseMatrix = matrix::from_triplets(self.affinity_shape, &self.affinity)?;
        let similarity: SparseMatrix = matrix::from_triplets(self.similarity_shape, &self.similarity)?;

        Ok(SarModel {
            config: self.config,
            users: self.users,
            items: self.items,
            affinity,
            similarity,
            popularity: self.popularity,
            reference_time: self.reference_time,
        })
    }
}

fn check_shape(name: &str, actual: (usize, usize), expected: (usize, usize)) -> Result<()> {
    if actual != expected {
        return Err(SarError::Persistence {
            message: format!(
                "{} matrix shape {:?} does not match index maps {:?}",
                name, actual, expected
            ),
        });
    }
    Ok(())
}

/// Stored matrix entries must be finite and non-negative.
fn check_values(name: &str, triplets: &[(usize, usize, f64)]) -> Result<()> {
    match triplets
        .iter()
        .find(|(_, _, value)| !(value.is_finite() && *value >= 0.0))
    {
        Some((row, col, value)) => Err(SarError::Persistence {
            message: format!("{} entry ({}, {}) holds invalid value {}", name, row, col, value),
        }),
        None => Ok(()),
    }
}

impl<U, I> SarModel<U, I>
where
    U: EntityId + Serialize + DeserializeOwned,
    I: EntityId + Serialize + DeserializeOwned,
{
    /// Write the model to `writer` with bincode.
    pub fn save<W: Write>(&self, writer: W) -> Result<()> {
        bincode::serialize_into(writer, &SerializableModel::from_model(self))?;
        Ok(())
    }

    /// Read a model written by [`SarModel::save`].
    ///
    /// # Errors
    ///
    /// `Persistence` when the format version or matrix shapes disagree with
    /// the stored index maps, or when a stored value is negative or not finite.
    pub fn load<R: Read>(reader: R) -> Result<Self> {
        let stored: SerializableModel<U, I> = bincode::deserialize_from(reader)?;
        stored.into_model()
    }

    pub fn save_to_path(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let mut writer = BufWriter::new(File::create(path)?);
        self.save(&mut writer)?;
        writer.flush()?;

        tracing::info!(path = %path.display(), "Saved SAR model");
        Ok(())
    }

    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let model = Self::load(BufReader::new(File::open(path)?))?;

        tracing::info!(
            path = %path.display(),
            users = model.users.len(),
            items = model.items.len(),
            "Loaded SAR model"
        );
        Ok(model)
    }
}
