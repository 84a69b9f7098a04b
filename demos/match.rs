use bovw::{Collection, Config, QueryEngine, Snapshot, Vocabulary};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load the vocabulary and descriptors written by the create-voc demo
    let dir = std::env::temp_dir().join("bovw-demo");
    let voc = Vocabulary::load(dir.join("demo.voc")).expect("run the create-voc demo first");
    let collection = Collection::load(dir.join("descriptors.bin")).unwrap();
    println!("Vocabulary: {:#?}", voc);

    // Build the weighted index and serve queries from it
    let config = Config {
        top_k: 5,
        ..Config::default()
    };
    let snapshot = Snapshot::build(&collection, voc, config.idf_smoothing).unwrap();
    let engine = QueryEngine::new(snapshot, &config);

    // Match the first few images against the whole collection
    for (id, set) in collection.iter().take(6) {
        let ranking = engine.query(Some(set)).unwrap();

        // Print out the top 5 matches for each image
        println!("\nTop 5 Matches for {:?}:", id);
        println!("Match      |      Score");
        for m in ranking.iter() {
            println!("{:?} | {:.4}", m.id, m.score);
        }
    }

    let (first, _) = collection.iter().next().unwrap();
    println!("\n{}", engine.query_id(first).unwrap().to_json().unwrap());
}
