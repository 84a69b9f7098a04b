use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

use crate::*;

/// Outcome of running a feature extractor over one image.
#[derive(Debug, Clone, PartialEq)]
pub enum Extraction {
    Features(DescriptorSet),
    /// The extractor found nothing usable. Not an error.
    NoFeatures,
}

impl Extraction {
    /// Normalizes an empty descriptor set to `NoFeatures`.
    pub fn from_set(set: DescriptorSet) -> Self {
        if set.is_empty() {
            Self::NoFeatures
        } else {
            Self::Features(set)
        }
    }

    pub fn features(&self) -> Option<&DescriptorSet> {
        match self {
            Self::Features(set) => Some(set),
            Self::NoFeatures => None,
        }
    }
}

impl From<Option<DescriptorSet>> for Extraction {
    fn from(set: Option<DescriptorSet>) -> Self {
        set.map_or(Self::NoFeatures, Self::from_set)
    }
}

/// Local feature extractor (SIFT or similar). Image decoding and detection
/// happen outside this crate.
pub trait Extractor {
    fn extract(&self, image: &Path) -> BowResult<Extraction>;
}

/// Descriptor sets of an image collection, keyed by image identifier in insertion order.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Collection {
    dim: usize,
    images: IndexMap<String, DescriptorSet>,
}

impl Collection {
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            images: IndexMap::new(),
        }
    }

    /// Extract descriptors from every file in `dir` with `extractor`.
    ///
    /// Files are visited in name order and keyed by file name. Images without
    /// features are skipped.
    pub fn from_dir<P, E>(dir: P, extractor: &E, dim: usize) -> BowResult<Self>
    where
        P: AsRef<Path>,
        E: Extractor + ?Sized,
    {
        let mut paths = Vec::new();
        for entry in dir.as_ref().read_dir()? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                paths.push(entry.path());
            }
        }
        paths.sort();

        let mut collection = Self::new(dim);
        for path in paths {
            let id = match path.file_name() {
                Some(name) => name.to_string_lossy().into_owned(),
                None => continue,
            };
            let extraction = extractor.extract(&path)?;
            collection.insert_extraction(id, extraction)?;
        }
        info!(
            images = collection.len(),
            dir = %dir.as_ref().display(),
            "extracted descriptors"
        );
        Ok(collection)
    }

    /// Add or replace the descriptors of `id`. An empty set is kept and
    /// indexes as the zero vector.
    pub fn insert(&mut self, id: impl Into<String>, set: DescriptorSet) -> BowResult<()> {
        set.check_dim(self.dim)?;
        self.images.insert(id.into(), set);
        Ok(())
    }

    /// Insert an extractor result. Returns `false` if the image had no
    /// features and was skipped.
    pub fn insert_extraction(
        &mut self,
        id: impl Into<String>,
        extraction: Extraction,
    ) -> BowResult<bool> {
        let id = id.into();
        match extraction {
            Extraction::Features(set) => {
                self.insert(id, set)?;
                Ok(true)
            }
            Extraction::NoFeatures => {
                warn!(image = %id, "no features found, skipping image");
                Ok(false)
            }
        }
    }

    pub fn remove(&mut self, id: &str) -> Option<DescriptorSet> {
        self.images.shift_remove(id)
    }

    pub fn get(&self, id: &str) -> Option<&DescriptorSet> {
        self.images.get(id)
    }

    pub fn iter(&self) -> indexmap::map::Iter<'_, String, DescriptorSet> {
        self.images.iter()
    }

    /// Descriptor sets in insertion order, as consumed by vocabulary training.
    pub fn sets(&self) -> impl Iterator<Item = &DescriptorSet> {
        self.images.values()
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub(crate) fn check_dim(&self, expected: usize) -> BowResult<()> {
        if self.dim != expected {
            return Err(BowErr::DimensionMismatch {
                what: "collection descriptor dimension",
                expected,
                actual: self.dim,
            });
        }
        Ok(())
    }

    #[cfg(feature = "bincode")]
    pub fn load<P: AsRef<Path>>(file: P) -> BowResult<Self> {
        artifact::load(file)
    }

    #[cfg(feature = "bincode")]
    pub fn save<P: AsRef<Path>>(&self, file: P) -> BowResult<()> {
        artifact::save(self, file)
    }
}

#[cfg(feature = "bincode")]
impl artifact::Artifact for Collection {
    const KIND: artifact::ArtifactKind = artifact::ArtifactKind::Collection;

    fn shape(&self) -> artifact::Shape {
        artifact::Shape { k: 0, dim: self.dim }
    }

    fn validate(&self) -> BowResult<()> {
        for (id, set) in &self.images {
            if set.dim() != self.dim || !set.is_well_formed() {
                return Err(BowErr::CorruptArtifact(format!(
                    "descriptor set of '{id}' is malformed"
                )));
            }
        }
        Ok(())
    }
}
