//! Query-time ranking.
//!
//! A query is quantized with the persisted vocabulary, weighted with the
//! persisted IDF vector (never recomputed here) and scored against every
//! stored document vector by cosine similarity. Scores tie-break by the
//! enumeration order of the document table.

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use std::{cmp::Ordering, sync::Arc};
use tracing::debug;

use crate::*;

/// One ranked image.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Match {
    pub id: String,
    /// Cosine similarity, in [0, 1] for TF-IDF vectors.
    pub score: f32,
}

/// Matches ordered by non-increasing score.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(transparent)]
pub struct Ranking(Vec<Match>);

impl Ranking {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Match> {
        self.0.iter()
    }

    pub fn first(&self) -> Option<&Match> {
        self.0.first()
    }

    pub fn ids(&self) -> Vec<&str> {
        self.0.iter().map(|m| m.id.as_str()).collect()
    }

    pub fn into_vec(self) -> Vec<Match> {
        self.0
    }

    /// JSON array of `{"id": .., "score": ..}` objects, best match first.
    pub fn to_json(&self) -> BowResult<String> {
        Ok(serde_json::to_string(&self.0)?)
    }
}

impl IntoIterator for Ranking {
    type Item = Match;
    type IntoIter = std::vec::IntoIter<Match>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// A consistent set of query artifacts: vocabulary, IDF vector and document
/// table built against the same K and descriptor dimension.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    voc: Vocabulary,
    idf: IdfVector,
    table: DocumentTable,
}

impl Snapshot {
    pub fn new(voc: Vocabulary, idf: IdfVector, table: DocumentTable) -> BowResult<Self> {
        check_compatible(&voc, &idf, &table)?;
        Ok(Self { voc, idf, table })
    }

    /// Index `collection` against `voc`.
    pub fn build(
        collection: &Collection,
        voc: Vocabulary,
        smoothing: IdfSmoothing,
    ) -> BowResult<Self> {
        let (idf, table) = build_index(collection, &voc, smoothing)?;
        Self::new(voc, idf, table)
    }

    /// Reweight stored raw histograms against the vocabulary they were quantized with.
    pub fn rebuild(
        raw: &RawHistograms,
        voc: Vocabulary,
        smoothing: IdfSmoothing,
    ) -> BowResult<Self> {
        let (idf, table) = raw.rebuild(smoothing)?;
        Self::new(voc, idf, table)
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.voc
    }

    pub fn idf(&self) -> &IdfVector {
        &self.idf
    }

    pub fn table(&self) -> &DocumentTable {
        &self.table
    }

    /// Load the three artifacts independently, then check they agree on K and dimension.
    #[cfg(feature = "bincode")]
    pub fn load<P: AsRef<std::path::Path>>(voc: P, idf: P, table: P) -> BowResult<Self> {
        Self::new(
            Vocabulary::load(voc)?,
            IdfVector::load(idf)?,
            DocumentTable::load(table)?,
        )
    }

    #[cfg(feature = "bincode")]
    pub fn save<P: AsRef<std::path::Path>>(&self, voc: P, idf: P, table: P) -> BowResult<()> {
        self.voc.save(voc)?;
        self.idf.save(idf)?;
        self.table.save(table)
    }

    /// Normalized TF-IDF vector of a query descriptor set.
    pub fn query_vector(&self, features: &DescriptorSet) -> BowResult<BoW> {
        query_vector(features, &self.voc, &self.idf)
    }

    /// Top `top_k` images for a query. `None` or an empty set is [`BowErr::NoFeatures`].
    pub fn query(&self, features: Option<&DescriptorSet>, top_k: usize) -> BowResult<Ranking> {
        let features = features.ok_or(BowErr::NoFeatures)?;
        let q = self.query_vector(features)?;
        Ok(rank(&self.table, &q, top_k))
    }

    /// Rank the collection against the stored vector of an indexed image.
    pub fn query_id(&self, id: &str, top_k: usize) -> BowResult<Ranking> {
        let q = self
            .table
            .get(id)
            .ok_or_else(|| BowErr::UnknownImage(id.to_string()))?;
        Ok(rank(&self.table, q, top_k))
    }
}

/// Rank `table` against a query descriptor set.
///
/// Fails with [`BowErr::NoFeatures`] if the query has no descriptors, and with
/// [`BowErr::DimensionMismatch`] if the artifacts disagree on K or dimension.
pub fn query(
    features: Option<&DescriptorSet>,
    voc: &Vocabulary,
    idf: &IdfVector,
    table: &DocumentTable,
    top_k: usize,
) -> BowResult<Ranking> {
    check_compatible(voc, idf, table)?;
    let features = features.ok_or(BowErr::NoFeatures)?;
    let q = query_vector(features, voc, idf)?;
    Ok(rank(table, &q, top_k))
}

/// Serves queries from the current [`Snapshot`]. Rebuilt artifacts are
/// swapped in whole, so a query sees either the old or the new snapshot.
pub struct QueryEngine {
    current: ArcSwap<Snapshot>,
    top_k: usize,
}

impl QueryEngine {
    pub fn new(snapshot: Snapshot, config: &Config) -> Self {
        Self {
            current: ArcSwap::from_pointee(snapshot),
            top_k: config.top_k,
        }
    }

    /// Snapshot currently being served.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.current.load_full()
    }

    /// Atomically replace the served snapshot, returning the previous one.
    pub fn publish(&self, snapshot: Snapshot) -> Arc<Snapshot> {
        let documents = snapshot.table.len();
        let previous = self.current.swap(Arc::new(snapshot));
        debug!(documents, "published index snapshot");
        previous
    }

    /// Reweight `raw` with the served vocabulary and publish the result.
    pub fn rebuild(&self, raw: &RawHistograms, smoothing: IdfSmoothing) -> BowResult<()> {
        let voc = self.snapshot().voc.clone();
        self.publish(Snapshot::rebuild(raw, voc, smoothing)?);
        Ok(())
    }

    /// Top `config.top_k` matches for a query descriptor set.
    pub fn query(&self, features: Option<&DescriptorSet>) -> BowResult<Ranking> {
        self.query_top(features, self.top_k)
    }

    pub fn query_top(&self, features: Option<&DescriptorSet>, top_k: usize) -> BowResult<Ranking> {
        self.current.load().query(features, top_k)
    }

    pub fn query_id(&self, id: &str) -> BowResult<Ranking> {
        self.current.load().query_id(id, self.top_k)
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }
}

/////////////////////                Helpers                 ////////////////////////
/////////////////////////////////////////////////////////////////////////////////////

fn query_vector(features: &DescriptorSet, voc: &Vocabulary, idf: &IdfVector) -> BowResult<BoW> {
    if features.is_empty() {
        return Err(BowErr::NoFeatures);
    }
    let tf = voc.transform(features)?;
    idf.weigh(&tf)
}

/// Score every document, stable-sort by descending score and keep `top_k`.
fn rank(table: &DocumentTable, q: &[f32], top_k: usize) -> Ranking {
    let mut scores: Vec<Match> = table
        .iter()
        .map(|(id, doc)| Match {
            id: id.clone(),
            score: q.cosine(doc),
        })
        .collect();
    // stable: equal scores keep table order
    scores.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
    scores.truncate(top_k);
    debug!(
        candidates = table.len(),
        returned = scores.len(),
        best = scores.first().map(|m| m.score),
        "ranked query"
    );
    Ranking(scores)
}

fn check_compatible(voc: &Vocabulary, idf: &IdfVector, table: &DocumentTable) -> BowResult<()> {
    let checks = [
        ("IDF vector size", voc.k(), idf.k()),
        ("document table size", voc.k(), table.k()),
        ("IDF vector descriptor dimension", voc.dim(), idf.dim()),
        ("document table descriptor dimension", voc.dim(), table.dim()),
    ];
    for (what, expected, actual) in checks {
        if expected != actual {
            return Err(BowErr::DimensionMismatch {
                what,
                expected,
                actual,
            });
        }
    }
    Ok(())
}
