//! Self-describing, versioned persistence for vocabularies, IDF vectors,
//! document tables and descriptor collections.
//!
//! Every file is a bincode-encoded [`Header`] followed by the payload. The
//! header records the artifact kind, K and the descriptor dimension, so
//! compatibility can be checked with [`read_header`] before loading anything.

use bincode::Options;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, BufWriter, Write},
    path::Path,
};

use crate::*;

pub const MAGIC: [u8; 4] = *b"BOVW";
pub const FORMAT_VERSION: u32 = 1;

/// Upper bound on a decoded artifact, so a corrupt length prefix fails fast.
const MAX_ARTIFACT_BYTES: u64 = 1 << 36;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Vocabulary,
    IdfVector,
    DocumentTable,
    RawHistograms,
    Collection,
}

/// Shape recorded in the header. `k` is 0 for artifacts without a vocabulary.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shape {
    pub k: usize,
    pub dim: usize,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub magic: [u8; 4],
    pub version: u32,
    pub kind: ArtifactKind,
    pub shape: Shape,
}

/// A payload that can be written with [`save`] and read back with [`load`].
pub trait Artifact: Serialize + DeserializeOwned {
    const KIND: ArtifactKind;

    fn shape(&self) -> Shape;

    /// Internal consistency check run after decoding.
    fn validate(&self) -> BowResult<()>;
}

fn codec() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_limit(MAX_ARTIFACT_BYTES)
}

pub fn save<A: Artifact, P: AsRef<Path>>(artifact: &A, file: P) -> BowResult<()> {
    let header = Header {
        magic: MAGIC,
        version: FORMAT_VERSION,
        kind: A::KIND,
        shape: artifact.shape(),
    };
    let mut w = BufWriter::new(File::create(file)?);
    codec().serialize_into(&mut w, &header)?;
    codec().serialize_into(&mut w, artifact)?;
    w.flush()?;
    Ok(())
}

pub fn load<A: Artifact, P: AsRef<Path>>(file: P) -> BowResult<A> {
    let mut r = BufReader::new(File::open(file)?);
    let header = decode_header(&mut r)?;
    if header.kind != A::KIND {
        return Err(BowErr::CorruptArtifact(format!(
            "expected a {:?} artifact, found {:?}",
            A::KIND,
            header.kind
        )));
    }
    let artifact: A = codec()
        .deserialize_from(&mut r)
        .map_err(|e| BowErr::CorruptArtifact(format!("{:?} payload: {}", A::KIND, e)))?;
    artifact.validate()?;
    if artifact.shape() != header.shape {
        return Err(BowErr::CorruptArtifact(format!(
            "header records {:?} but payload has {:?}",
            header.shape,
            artifact.shape()
        )));
    }
    Ok(artifact)
}

/// Read only the header of an artifact file.
pub fn read_header<P: AsRef<Path>>(file: P) -> BowResult<Header> {
    let mut r = BufReader::new(File::open(file)?);
    decode_header(&mut r)
}

fn decode_header<R: std::io::Read>(r: &mut R) -> BowResult<Header> {
    let header: Header = codec()
        .deserialize_from(r)
        .map_err(|e| BowErr::CorruptArtifact(format!("unreadable header: {e}")))?;
    if header.magic != MAGIC {
        return Err(BowErr::CorruptArtifact("not a bovw artifact".to_string()));
    }
    if header.version != FORMAT_VERSION {
        return Err(BowErr::CorruptArtifact(format!(
            "unsupported format version {} (expected {})",
            header.version, FORMAT_VERSION
        )));
    }
    Ok(header)
}
