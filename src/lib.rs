use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Shared vector math used by every stage (normalization, dot products, distances).
pub mod vector;

/// Bounded per-image random subsampling of descriptors for vocabulary training.
pub mod sampler;

/// Clustering capability and the k-means variants that implement it.
pub mod kmeans;
pub use kmeans::{Clusterer, KMeans, MiniBatchKMeans};

/// Implementation of a flat visual vocabulary, which quantizes descriptors
/// into visual words and turns descriptor sets into term-frequency histograms.
pub mod vocab;
pub use vocab::{histogram, train_vocabulary, Quantizer, Vocabulary};

/// Collection-wide IDF weighting and the searchable document vector table.
pub mod index;
pub use index::{build_index, DocumentTable, IdfVector, RawHistograms};

/// Read-only ranking of the collection against a query descriptor set.
pub mod query;
pub use query::{query, Match, QueryEngine, Ranking, Snapshot};

/// Descriptor collections and the external feature extractor capability.
pub mod collection;
pub use collection::{Collection, Extraction, Extractor};

/// Engine configuration.
pub mod config;
pub use config::{Config, IdfSmoothing};

/// Versioned on-disk envelope shared by every persisted artifact.
#[cfg(feature = "bincode")]
pub mod artifact;

/// Descriptor dimension of SIFT, the reference local feature.
pub const SIFT_DIM: usize = 128;

/// Bag-of-Words representation of an image or descriptor set.
///
/// Index: visual word id in the vocabulary.
///
/// Value: weight of that word in the provided features. Depending on the
/// stage this is an L1-normalized term frequency or an L2-normalized TF-IDF weight.
pub type BoW = Vec<f32>;

/// Ordered set of fixed-dimension float descriptors extracted from one image.
///
/// Stored row-major in a single buffer. An empty set is valid and means the
/// image has no usable features.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DescriptorSet {
    dim: usize,
    data: Vec<f32>,
}

impl DescriptorSet {
    /// Empty set of `dim`-dimensional descriptors.
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            data: Vec::new(),
        }
    }

    /// Wrap a row-major buffer holding `data.len() / dim` descriptors.
    pub fn from_flat(dim: usize, data: Vec<f32>) -> BowResult<Self> {
        if dim == 0 {
            return Err(BowErr::InvalidConfig(
                "descriptor dimension must be greater than 0".to_string(),
            ));
        }
        if data.len() % dim != 0 {
            return Err(BowErr::InvalidConfig(format!(
                "descriptor buffer of {} values is not a whole number of {}-dimensional rows",
                data.len(),
                dim
            )));
        }
        Ok(Self { dim, data })
    }

    /// Build a set from individual descriptors, all of which must have length `dim`.
    pub fn from_rows<I, R>(dim: usize, rows: I) -> BowResult<Self>
    where
        I: IntoIterator<Item = R>,
        R: AsRef<[f32]>,
    {
        let mut set = Self::from_flat(dim, Vec::new())?;
        for row in rows {
            set.push(row.as_ref())?;
        }
        Ok(set)
    }

    /// Append one descriptor.
    pub fn push(&mut self, desc: &[f32]) -> BowResult<()> {
        if desc.len() != self.dim {
            return Err(BowErr::DimensionMismatch {
                what: "descriptor",
                expected: self.dim,
                actual: desc.len(),
            });
        }
        self.data.extend_from_slice(desc);
        Ok(())
    }

    /// Append every descriptor of `other`.
    pub fn extend_from(&mut self, other: &DescriptorSet) -> BowResult<()> {
        self.check_dim(other.dim)?;
        self.data.extend_from_slice(&other.data);
        Ok(())
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Number of descriptors.
    pub fn len(&self) -> usize {
        if self.dim == 0 {
            0
        } else {
            self.data.len() / self.dim
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn get(&self, i: usize) -> Option<&[f32]> {
        let start = i.checked_mul(self.dim)?;
        self.data.get(start..start + self.dim)
    }

    /// Iterate over descriptors in insertion order.
    pub fn iter(&self) -> std::slice::ChunksExact<'_, f32> {
        // chunks_exact panics on 0, and a 0-dim set never holds data
        self.data.chunks_exact(self.dim.max(1))
    }

    pub fn as_flat(&self) -> &[f32] {
        &self.data
    }

    pub(crate) fn check_dim(&self, expected: usize) -> BowResult<()> {
        if self.dim != expected {
            return Err(BowErr::DimensionMismatch {
                what: "descriptor set",
                expected,
                actual: self.dim,
            });
        }
        Ok(())
    }

    /// Sets restored from disk bypass the constructors.
    #[cfg(feature = "bincode")]
    pub(crate) fn is_well_formed(&self) -> bool {
        self.dim > 0 && self.data.len() % self.dim == 0
    }
}

/// Provides method(s) for computing the similarity score between bow vectors.
pub trait BoWTrait {
    /// Cosine similarity, assuming both vectors are L2-normalized (or zero).
    fn cosine(&self, other: &Self) -> f32;
}

impl BoWTrait for [f32] {
    fn cosine(&self, other: &Self) -> f32 {
        vector::dot(self, other)
    }
}

pub type BowResult<T> = std::result::Result<T, BowErr>;

#[derive(Error, Debug)]
pub enum BowErr {
    /// The extractor found no usable descriptors. A defined outcome on the
    /// query path, never retried internally.
    #[error("No usable features in descriptor set")]
    NoFeatures,
    #[error("Dimension mismatch in {what}: expected {expected}, got {actual}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("Insufficient training data: {samples} sampled descriptors for {k} visual words")]
    InsufficientTrainingData { samples: usize, k: usize },
    #[error("Corrupt artifact: {0}")]
    CorruptArtifact(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Unknown image '{0}'")]
    UnknownImage(String),
    #[error("Io Error")]
    Io(#[from] std::io::Error),
    #[cfg(feature = "bincode")]
    #[error("Artifact Serialization Error")]
    Bincode(#[from] bincode::Error),
    #[error("Json Serialization Error")]
    Json(#[from] serde_json::Error),
}
