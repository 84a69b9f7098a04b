use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::info;

use crate::sampler::Sampler;
use crate::*;

#[derive(Serialize, Deserialize, PartialEq, Clone)]
/// Feature vocabulary built from a collection of image keypoint descriptors. Can be:
/// 1. Created from sampled training descriptors.
/// 2. Saved to a file & loaded from a file (requires bincode feature, enabled by default).
/// 3. Used to transform a new set of descriptors into a term-frequency BoW.
///
/// Immutable after training. K and the descriptor dimension never change
/// without retraining the whole index.
pub struct Vocabulary {
    k: usize,
    dim: usize,
    /// Cluster centers, `k` rows of `dim` floats.
    centers: Vec<f32>,
    /// Training descriptors assigned to each word.
    cluster_size: Vec<usize>,
}

/// Capability to map a descriptor to its nearest visual word.
pub trait Quantizer {
    /// Vocabulary size K.
    fn num_words(&self) -> usize;
    /// Descriptor dimension accepted by `quantize`.
    fn dim(&self) -> usize;
    /// Nearest visual word, or `None` when the descriptor cannot be quantized.
    fn quantize(&self, desc: &[f32]) -> Option<usize>;
}

/// Vocabulary API
impl Vocabulary {
    /// Vocabulary from `k` row-major cluster centers of dimension `dim`.
    pub fn from_centers(dim: usize, centers: Vec<f32>) -> BowResult<Self> {
        if dim == 0 || centers.is_empty() || centers.len() % dim != 0 {
            return Err(BowErr::InvalidConfig(format!(
                "{} center values do not form rows of dimension {}",
                centers.len(),
                dim
            )));
        }
        let k = centers.len() / dim;
        Ok(Self {
            k,
            dim,
            centers,
            cluster_size: vec![0; k],
        })
    }

    pub(crate) fn with_cluster_sizes(mut self, cluster_size: Vec<usize>) -> Self {
        debug_assert_eq!(cluster_size.len(), self.k);
        self.cluster_size = cluster_size;
        self
    }

    /// Train a vocabulary of `config.vocabulary_size` words with mini-batch k-means.
    ///
    /// Without a configured seed the sampling and clustering differ from run
    /// to run, and so may the resulting words.
    pub fn create<'a, I>(descriptor_sets: I, config: &Config) -> BowResult<Self>
    where
        I: IntoIterator<Item = &'a DescriptorSet>,
    {
        let mut clusterer = MiniBatchKMeans::from_config(config);
        Self::create_with(descriptor_sets, config, &mut clusterer)
    }

    /// Train a vocabulary with any clustering algorithm.
    pub fn create_with<'a, I, C>(
        descriptor_sets: I,
        config: &Config,
        clusterer: &mut C,
    ) -> BowResult<Self>
    where
        I: IntoIterator<Item = &'a DescriptorSet>,
        C: Clusterer + ?Sized,
    {
        config.validate()?;
        let mut sampler = Sampler::new(config.sample_cap, config.seed);
        let samples = sampler.sample_all(descriptor_sets, config.descriptor_dim)?;
        info!(
            samples = samples.len(),
            k = config.vocabulary_size,
            "training vocabulary"
        );
        let voc = clusterer.train(&samples, config.vocabulary_size)?;
        info!(words = voc.k, dim = voc.dim, "vocabulary trained");
        Ok(voc)
    }

    /// Transform a set of descriptors into its bag of words
    /// representation with respect to the Vocabulary. Result is l1 normalized.
    pub fn transform(&self, features: &DescriptorSet) -> BowResult<BoW> {
        histogram(self, features)
    }

    /// Number of visual words (K).
    pub fn k(&self) -> usize {
        self.k
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn center(&self, word: usize) -> Option<&[f32]> {
        let start = word.checked_mul(self.dim)?;
        self.centers.get(start..start + self.dim)
    }

    pub fn cluster_sizes(&self) -> &[usize] {
        &self.cluster_size
    }

    /// Load a vocabulary from a file
    #[cfg(feature = "bincode")]
    pub fn load<P: AsRef<std::path::Path>>(file: P) -> BowResult<Self> {
        artifact::load(file)
    }

    /// Save vocabulary to a file
    #[cfg(feature = "bincode")]
    pub fn save<P: AsRef<std::path::Path>>(&self, file: P) -> BowResult<()> {
        artifact::save(self, file)
    }
}

impl Quantizer for Vocabulary {
    fn num_words(&self) -> usize {
        self.k
    }

    fn dim(&self) -> usize {
        self.dim
    }

    #[inline]
    fn quantize(&self, desc: &[f32]) -> Option<usize> {
        if desc.len() != self.dim || !desc.iter().all(|x| x.is_finite()) {
            return None;
        }
        vector::nearest(&self.centers, self.dim, desc).map(|(word, _)| word)
    }
}

/// Term-frequency histogram of `features` over the words of `quantizer`.
///
/// Bins are divided by their sum. An empty or fully unquantizable set yields
/// the all-zero histogram.
pub fn histogram<Q: Quantizer + ?Sized>(quantizer: &Q, features: &DescriptorSet) -> BowResult<BoW> {
    features.check_dim(quantizer.dim())?;
    let mut bow: BoW = vec![0.; quantizer.num_words()];
    for feature in features.iter() {
        if let Some(word) = quantizer.quantize(feature) {
            bow[word] += 1.;
        }
    }
    vector::l1_normalize(&mut bow);
    Ok(bow)
}

/// Train a vocabulary of `config.vocabulary_size` words from per-image descriptor sets.
pub fn train_vocabulary<'a, I>(descriptor_sets: I, config: &Config) -> BowResult<Vocabulary>
where
    I: IntoIterator<Item = &'a DescriptorSet>,
{
    Vocabulary::create(descriptor_sets, config)
}

#[cfg(feature = "bincode")]
impl artifact::Artifact for Vocabulary {
    const KIND: artifact::ArtifactKind = artifact::ArtifactKind::Vocabulary;

    fn shape(&self) -> artifact::Shape {
        artifact::Shape {
            k: self.k,
            dim: self.dim,
        }
    }

    fn validate(&self) -> BowResult<()> {
        if self.k == 0 || self.dim == 0 {
            return Err(BowErr::CorruptArtifact("empty vocabulary".to_string()));
        }
        let values = self.k.checked_mul(self.dim);
        if values != Some(self.centers.len()) || self.cluster_size.len() != self.k {
            return Err(BowErr::CorruptArtifact(format!(
                "vocabulary of {} words holds {} center values and {} cluster sizes",
                self.k,
                self.centers.len(),
                self.cluster_size.len()
            )));
        }
        if !self.centers.iter().all(|x| x.is_finite()) {
            return Err(BowErr::CorruptArtifact("non-finite cluster center".to_string()));
        }
        Ok(())
    }
}

impl fmt::Debug for Vocabulary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sum = self.cluster_size.iter().sum::<usize>();
        f.debug_struct("Vocabulary")
            .field("Words", &self.k)
            .field("Descriptor Dimension", &self.dim)
            .field("Total Training Features", &sum)
            .field("Min Word Cluster Size", &self.cluster_size.iter().min())
            .field("Max Word Cluster Size", &self.cluster_size.iter().max())
            .field("Mean Word Cluster Size", &(sum / self.k.max(1)))
            .finish()
    }
}
