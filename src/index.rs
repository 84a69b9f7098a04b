//! Collection-wide TF-IDF weighting.
//!
//! Raw term-frequency histograms are kept per image in [`RawHistograms`]. A
//! rebuild recomputes document frequencies over the whole snapshot and
//! produces a fresh [`IdfVector`] and [`DocumentTable`]; nothing is updated
//! incrementally.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::*;

/// Smoothed inverse document frequency of every visual word.
///
/// Every entry is finite and non-negative.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct IdfVector {
    weights: Vec<f32>,
    num_docs: usize,
    dim: usize,
    smoothing: IdfSmoothing,
}

impl IdfVector {
    /// IDF over the raw histograms of `num_docs` images, each of length `k`.
    ///
    /// A word's document frequency is the number of histograms with a
    /// strictly positive entry for it.
    pub fn compute<'a, I>(raw: I, k: usize, dim: usize, smoothing: IdfSmoothing) -> BowResult<Self>
    where
        I: IntoIterator<Item = &'a BoW>,
    {
        let mut df = vec![0usize; k];
        let mut num_docs = 0usize;
        for hist in raw {
            if hist.len() != k {
                return Err(BowErr::DimensionMismatch {
                    what: "raw histogram",
                    expected: k,
                    actual: hist.len(),
                });
            }
            num_docs += 1;
            for (count, &tf) in df.iter_mut().zip(hist) {
                if tf > 0. {
                    *count += 1;
                }
            }
        }
        let weights = df.iter().map(|&d| smoothing.idf(num_docs, d)).collect();
        Ok(Self {
            weights,
            num_docs,
            dim,
            smoothing,
        })
    }

    /// TF-IDF weight `tf` and scale it to unit L2 norm. A zero result stays zero.
    pub fn weigh(&self, tf: &[f32]) -> BowResult<BoW> {
        if tf.len() != self.weights.len() {
            return Err(BowErr::DimensionMismatch {
                what: "term-frequency histogram",
                expected: self.weights.len(),
                actual: tf.len(),
            });
        }
        let mut bow: BoW = tf.iter().zip(&self.weights).map(|(t, w)| t * w).collect();
        vector::l2_normalize(&mut bow);
        Ok(bow)
    }

    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    /// Number of visual words (K).
    pub fn k(&self) -> usize {
        self.weights.len()
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Collection size N the weights were computed over.
    pub fn num_docs(&self) -> usize {
        self.num_docs
    }

    pub fn smoothing(&self) -> IdfSmoothing {
        self.smoothing
    }

    #[cfg(feature = "bincode")]
    pub fn load<P: AsRef<std::path::Path>>(file: P) -> BowResult<Self> {
        artifact::load(file)
    }

    #[cfg(feature = "bincode")]
    pub fn save<P: AsRef<std::path::Path>>(&self, file: P) -> BowResult<()> {
        artifact::save(self, file)
    }
}

/// Searchable index: image identifier to its L2-normalized TF-IDF vector.
///
/// Iteration follows insertion order, which is also the tie-break order of rankings.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DocumentTable {
    k: usize,
    dim: usize,
    entries: IndexMap<String, BoW>,
}

impl DocumentTable {
    pub fn get(&self, id: &str) -> Option<&BoW> {
        self.entries.get(id)
    }

    pub fn iter(&self) -> indexmap::map::Iter<'_, String, BoW> {
        self.entries.iter()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    #[cfg(feature = "bincode")]
    pub fn load<P: AsRef<std::path::Path>>(file: P) -> BowResult<Self> {
        artifact::load(file)
    }

    #[cfg(feature = "bincode")]
    pub fn save<P: AsRef<std::path::Path>>(&self, file: P) -> BowResult<()> {
        artifact::save(self, file)
    }
}

/// Stored raw (L1-normalized) term-frequency histograms, from which the
/// weighted index is rebuilt whenever the collection changes.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RawHistograms {
    k: usize,
    dim: usize,
    entries: IndexMap<String, BoW>,
}

impl RawHistograms {
    pub fn new(k: usize, dim: usize) -> Self {
        Self {
            k,
            dim,
            entries: IndexMap::new(),
        }
    }

    /// Quantize every image of `collection` against `voc`.
    pub fn from_collection(collection: &Collection, voc: &Vocabulary) -> BowResult<Self> {
        let mut raw = Self::new(voc.k(), voc.dim());
        let images: Vec<(&String, &DescriptorSet)> = collection.iter().collect();

        #[cfg(feature = "parallel")]
        let histograms: Vec<BoW> = {
            use rayon::prelude::*;
            images
                .par_iter()
                .map(|(_, set)| voc.transform(set))
                .collect::<BowResult<_>>()?
        };
        #[cfg(not(feature = "parallel"))]
        let histograms: Vec<BoW> = images
            .iter()
            .map(|(_, set)| voc.transform(set))
            .collect::<BowResult<_>>()?;

        for ((id, set), hist) in images.into_iter().zip(histograms) {
            if set.is_empty() {
                warn!(image = %id, "indexing image without features as a zero vector");
            }
            raw.entries.insert(id.clone(), hist);
        }
        Ok(raw)
    }

    /// Add or replace the histogram of `id` by quantizing `features`.
    ///
    /// A replaced image keeps its position in enumeration order.
    pub fn insert(
        &mut self,
        id: impl Into<String>,
        features: &DescriptorSet,
        voc: &Vocabulary,
    ) -> BowResult<()> {
        self.check_vocabulary(voc)?;
        let hist = voc.transform(features)?;
        self.entries.insert(id.into(), hist);
        Ok(())
    }

    /// Remove `id`, preserving the order of the remaining images.
    pub fn remove(&mut self, id: &str) -> Option<BoW> {
        self.entries.shift_remove(id)
    }

    pub fn get(&self, id: &str) -> Option<&BoW> {
        self.entries.get(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Recompute document frequencies over every stored histogram, then
    /// weight and normalize all of them.
    pub fn rebuild(&self, smoothing: IdfSmoothing) -> BowResult<(IdfVector, DocumentTable)> {
        let idf = IdfVector::compute(self.entries.values(), self.k, self.dim, smoothing)?;
        let mut entries = IndexMap::with_capacity(self.entries.len());
        for (id, tf) in &self.entries {
            entries.insert(id.clone(), idf.weigh(tf)?);
        }
        info!(
            documents = entries.len(),
            words = self.k,
            "rebuilt weighted index"
        );
        let table = DocumentTable {
            k: self.k,
            dim: self.dim,
            entries,
        };
        Ok((idf, table))
    }

    fn check_vocabulary(&self, voc: &Vocabulary) -> BowResult<()> {
        if voc.k() != self.k {
            return Err(BowErr::DimensionMismatch {
                what: "vocabulary size",
                expected: self.k,
                actual: voc.k(),
            });
        }
        if voc.dim() != self.dim {
            return Err(BowErr::DimensionMismatch {
                what: "vocabulary descriptor dimension",
                expected: self.dim,
                actual: voc.dim(),
            });
        }
        Ok(())
    }

    #[cfg(feature = "bincode")]
    pub fn load<P: AsRef<std::path::Path>>(file: P) -> BowResult<Self> {
        artifact::load(file)
    }

    #[cfg(feature = "bincode")]
    pub fn save<P: AsRef<std::path::Path>>(&self, file: P) -> BowResult<()> {
        artifact::save(self, file)
    }
}

/// Quantize, weight and normalize a whole collection against `voc`.
pub fn build_index(
    collection: &Collection,
    voc: &Vocabulary,
    smoothing: IdfSmoothing,
) -> BowResult<(IdfVector, DocumentTable)> {
    collection.check_dim(voc.dim())?;
    RawHistograms::from_collection(collection, voc)?.rebuild(smoothing)
}

#[cfg(feature = "bincode")]
mod persist {
    use super::*;
    use crate::artifact::{Artifact, ArtifactKind, Shape};

    fn check_table(entries: &IndexMap<String, BoW>, k: usize, what: &str) -> BowResult<()> {
        for (id, v) in entries {
            if v.len() != k || !v.iter().all(|x| x.is_finite()) {
                return Err(BowErr::CorruptArtifact(format!(
                    "{what} entry '{id}' is not a finite vector of length {k}"
                )));
            }
        }
        Ok(())
    }

    impl Artifact for IdfVector {
        const KIND: ArtifactKind = ArtifactKind::IdfVector;

        fn shape(&self) -> Shape {
            Shape {
                k: self.weights.len(),
                dim: self.dim,
            }
        }

        fn validate(&self) -> BowResult<()> {
            if !self.weights.iter().all(|w| w.is_finite() && *w >= 0.) {
                return Err(BowErr::CorruptArtifact(
                    "IDF weights must be finite and non-negative".to_string(),
                ));
            }
            Ok(())
        }
    }

    impl Artifact for DocumentTable {
        const KIND: ArtifactKind = ArtifactKind::DocumentTable;

        fn shape(&self) -> Shape {
            Shape {
                k: self.k,
                dim: self.dim,
            }
        }

        fn validate(&self) -> BowResult<()> {
            check_table(&self.entries, self.k, "document table")
        }
    }

    impl Artifact for RawHistograms {
        const KIND: ArtifactKind = ArtifactKind::RawHistograms;

        fn shape(&self) -> Shape {
            Shape {
                k: self.k,
                dim: self.dim,
            }
        }

        fn validate(&self) -> BowResult<()> {
            check_table(&self.entries, self.k, "raw histogram")
        }
    }
}
