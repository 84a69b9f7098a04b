//! Train, index and query a small synthetic collection end to end.

use bovw::*;
use std::sync::Arc;

const DIM: usize = 8;

/// `n` jittered copies of a one-hot-ish cluster center at axis `axis`.
fn cluster(axis: usize, n: usize) -> DescriptorSet {
    let mut set = DescriptorSet::new(DIM);
    for j in 0..n {
        let mut d = [0f32; DIM];
        d[axis] = 100.;
        d[(axis + 1) % DIM] = (j % 3) as f32 * 0.1;
        set.push(&d).unwrap();
    }
    set
}

fn concat(sets: &[DescriptorSet]) -> DescriptorSet {
    let mut out = DescriptorSet::new(DIM);
    for s in sets {
        out.extend_from(s).unwrap();
    }
    out
}

fn config(k: usize) -> Config {
    Config {
        vocabulary_size: k,
        descriptor_dim: DIM,
        seed: Some(2024),
        ..Config::default()
    }
}

fn disjoint_collection() -> Collection {
    let mut collection = Collection::new(DIM);
    collection.insert("a.jpg", cluster(0, 30)).unwrap();
    collection.insert("b.jpg", cluster(3, 30)).unwrap();
    collection.insert("c.jpg", cluster(6, 30)).unwrap();
    collection
}

#[test]
fn disjoint_images_rank_themselves_first() {
    let collection = disjoint_collection();
    let config = config(3);
    let voc = train_vocabulary(collection.sets(), &config).unwrap();
    let (idf, table) = build_index(&collection, &voc, config.idf_smoothing).unwrap();

    for (id, set) in collection.iter() {
        let ranking = query(Some(set), &voc, &idf, &table, config.top_k).unwrap();
        assert_eq!(&ranking.first().unwrap().id, id);
        assert!((ranking.first().unwrap().score - 1.).abs() < 1e-5);
        assert!(ranking.iter().skip(1).all(|m| m.score.abs() < 1e-6));
    }
}

#[test]
fn empty_query_returns_no_features() {
    let collection = disjoint_collection();
    let config = config(3);
    let voc = train_vocabulary(collection.sets(), &config).unwrap();
    let snapshot = Snapshot::build(&collection, voc, config.idf_smoothing).unwrap();
    let engine = QueryEngine::new(snapshot, &config);

    assert!(matches!(engine.query(None), Err(BowErr::NoFeatures)));
    assert!(matches!(
        engine.query(Some(&DescriptorSet::new(DIM))),
        Err(BowErr::NoFeatures)
    ));
    assert!(matches!(
        engine.query(Extraction::NoFeatures.features()),
        Err(BowErr::NoFeatures)
    ));
}

#[test]
fn partial_match_ranks_by_shared_words() {
    let mut collection = Collection::new(DIM);
    collection.insert("ab", concat(&[cluster(0, 10), cluster(2, 10)])).unwrap();
    collection.insert("bc", concat(&[cluster(2, 10), cluster(4, 10)])).unwrap();
    collection.insert("cd", concat(&[cluster(4, 10), cluster(6, 10)])).unwrap();
    collection.insert("d", cluster(6, 20)).unwrap();

    let config = config(4);
    let voc = train_vocabulary(collection.sets(), &config).unwrap();
    let snapshot = Snapshot::build(&collection, voc, config.idf_smoothing).unwrap();

    let ranking = snapshot.query(Some(&cluster(0, 5)), 10).unwrap();
    assert_eq!(ranking.first().unwrap().id, "ab");
    assert!(ranking.iter().zip(ranking.iter().skip(1)).all(|(a, b)| a.score >= b.score));
}

#[test]
fn rebuild_after_adding_image_changes_unrelated_vectors() {
    let mut collection = Collection::new(DIM);
    collection.insert("a", concat(&[cluster(0, 10), cluster(2, 10)])).unwrap();
    collection.insert("b", concat(&[cluster(2, 10), cluster(4, 10)])).unwrap();
    collection.insert("seed", cluster(6, 10)).unwrap();

    let config = config(4);
    let voc = train_vocabulary(collection.sets(), &config).unwrap();
    let mut raw = RawHistograms::from_collection(&collection, &voc).unwrap();
    let (idf_before, table_before) = raw.rebuild(config.idf_smoothing).unwrap();

    // "c" shares a word with "b" but not with "a"
    raw.insert("c", &cluster(4, 10), &voc).unwrap();
    let (idf_after, table_after) = raw.rebuild(config.idf_smoothing).unwrap();

    assert_ne!(idf_before.weights(), idf_after.weights());
    assert_eq!(idf_after.num_docs(), 4);
    assert_ne!(table_before.get("a"), table_after.get("a"));
    assert_ne!(table_before.get("b"), table_after.get("b"));
}

#[test]
fn engine_swaps_snapshots_atomically() {
    let collection = disjoint_collection();
    let config = config(3);
    let voc = train_vocabulary(collection.sets(), &config).unwrap();
    let engine = Arc::new(QueryEngine::new(
        Snapshot::build(&collection, voc.clone(), config.idf_smoothing).unwrap(),
        &config,
    ));

    let mut grown = collection.clone();
    grown.insert("a2.jpg", cluster(0, 30)).unwrap();
    let next = Snapshot::build(&grown, voc, config.idf_smoothing).unwrap();

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let engine = Arc::clone(&engine);
            std::thread::spawn(move || {
                for _ in 0..50 {
                    let ranking = engine.query(Some(&cluster(0, 5))).unwrap();
                    // either the old (3 images) or the new (4 images) snapshot, never a mix
                    assert!(ranking.len() == 3 || ranking.len() == 4);
                    assert_eq!(ranking.first().unwrap().id, "a.jpg");
                }
            })
        })
        .collect();
    engine.publish(next);
    for r in readers {
        r.join().unwrap();
    }
    assert_eq!(engine.snapshot().table().len(), 4);
}

#[test]
fn repeated_queries_are_bit_identical() {
    let collection = disjoint_collection();
    let config = config(3);
    let voc = train_vocabulary(collection.sets(), &config).unwrap();
    let snapshot = Snapshot::build(&collection, voc, config.idf_smoothing).unwrap();
    let q = concat(&[cluster(0, 4), cluster(3, 2)]);

    let first = snapshot.query(Some(&q), 10).unwrap();
    for _ in 0..10 {
        let again = snapshot.query(Some(&q), 10).unwrap();
        assert_eq!(first.ids(), again.ids());
        for (a, b) in first.iter().zip(again.iter()) {
            assert_eq!(a.score.to_bits(), b.score.to_bits());
        }
    }
}

#[test]
fn too_little_training_data_is_reported() {
    let mut collection = Collection::new(DIM);
    collection.insert("tiny", cluster(0, 2)).unwrap();
    assert!(matches!(
        train_vocabulary(collection.sets(), &config(3)),
        Err(BowErr::InsufficientTrainingData { samples: 2, k: 3 })
    ));
}

#[cfg(feature = "bincode")]
#[test]
fn persisted_artifacts_serve_identical_results() {
    let collection = disjoint_collection();
    let config = config(3);
    let voc = train_vocabulary(collection.sets(), &config).unwrap();
    let snapshot = Snapshot::build(&collection, voc, config.idf_smoothing).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let paths = [
        dir.path().join("vocab.bin"),
        dir.path().join("idf.bin"),
        dir.path().join("table.bin"),
    ];
    snapshot.save(&paths[0], &paths[1], &paths[2]).unwrap();
    let loaded = Snapshot::load(&paths[0], &paths[1], &paths[2]).unwrap();
    assert_eq!(loaded, snapshot);

    let q = cluster(3, 7);
    assert_eq!(
        loaded.query(Some(&q), 10).unwrap(),
        snapshot.query(Some(&q), 10).unwrap()
    );
}

#[cfg(feature = "bincode")]
#[test]
fn mismatched_artifacts_fail_at_load() {
    let collection = disjoint_collection();
    let voc3 = train_vocabulary(collection.sets(), &config(3)).unwrap();
    let voc2 = train_vocabulary(collection.sets(), &config(2)).unwrap();
    let snapshot = Snapshot::build(&collection, voc3, IdfSmoothing::Additive).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let (v, i, t) = (
        dir.path().join("vocab.bin"),
        dir.path().join("idf.bin"),
        dir.path().join("table.bin"),
    );
    snapshot.save(&v, &i, &t).unwrap();
    voc2.save(&v).unwrap();

    assert_eq!(artifact::read_header(&v).unwrap().shape.k, 2);
    assert!(matches!(
        Snapshot::load(&v, &i, &t),
        Err(BowErr::DimensionMismatch { .. })
    ));
}
