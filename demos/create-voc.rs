use bovw::{Collection, Config, DescriptorSet, Vocabulary};
use rand::{rngs::StdRng, Rng, SeedableRng};
use tracing_subscriber::EnvFilter;

/// Synthetic stand-in for SIFT output: each image draws its descriptors
/// around a few of 32 shared "part" prototypes.
fn synthetic_collection(images: usize, rng: &mut StdRng) -> Collection {
    let dim = bovw::SIFT_DIM;
    let prototypes: Vec<Vec<f32>> = (0..32)
        .map(|_| (0..dim).map(|_| rng.gen_range(0.0f32..255.0)).collect())
        .collect();

    let mut collection = Collection::new(dim);
    for i in 0..images {
        let mut set = DescriptorSet::new(dim);
        for _ in 0..rng.gen_range(50..600) {
            let p = &prototypes[rng.gen_range(0..prototypes.len())];
            let desc: Vec<f32> = p.iter().map(|v| *v + rng.gen_range(-8.0f32..8.0)).collect();
            set.push(&desc).unwrap();
        }
        collection.insert(format!("image_{i:05}.jpg"), set).unwrap();
    }
    collection
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config {
        vocabulary_size: 64,
        seed: Some(7),
        ..Config::load(None).unwrap()
    };

    // Generate descriptors for a synthetic collection
    let mut rng = StdRng::seed_from_u64(7);
    let collection = synthetic_collection(40, &mut rng);
    let total: usize = collection.sets().map(|s| s.len()).sum();
    println!("Generated {} descriptors over {} images.", total, collection.len());

    // Create vocabulary from features
    let voc = Vocabulary::create(collection.sets(), &config).unwrap();
    println!("\nVocabulary = {:#?}", voc);

    // Save vocab and load it again just for fun
    let dir = std::env::temp_dir().join("bovw-demo");
    std::fs::create_dir_all(&dir).unwrap();
    voc.save(dir.join("demo.voc")).unwrap();
    collection.save(dir.join("descriptors.bin")).unwrap();
    let loaded_voc = Vocabulary::load(dir.join("demo.voc")).unwrap();

    // Make sure save & load worked
    assert_eq!(voc, loaded_voc);
    println!("Saved vocabulary and descriptors to {:?}", dir);
}
