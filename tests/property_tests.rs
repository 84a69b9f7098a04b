//! Property-based tests for histogram, weighting and ranking invariants.

use bovw::*;
use proptest::prelude::*;

const DIM: usize = 4;

prop_compose! {
    fn arb_vocabulary()(k in 1usize..8)
        (centers in prop::collection::vec(-10.0f32..10.0, k * DIM)) -> Vocabulary {
        Vocabulary::from_centers(DIM, centers).unwrap()
    }
}

prop_compose! {
    fn arb_set(max: usize)
        (rows in prop::collection::vec(-10.0f32..10.0, 0..max * DIM)) -> DescriptorSet {
        let len = rows.len() - rows.len() % DIM;
        DescriptorSet::from_flat(DIM, rows[..len].to_vec()).unwrap()
    }
}

fn collection_of(sets: &[DescriptorSet]) -> Collection {
    let mut collection = Collection::new(DIM);
    for (i, set) in sets.iter().enumerate() {
        collection.insert(format!("img{i}"), set.clone()).unwrap();
    }
    collection
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn histogram_sums_to_one_or_is_zero(voc in arb_vocabulary(), set in arb_set(40)) {
        let bow = voc.transform(&set).unwrap();
        prop_assert_eq!(bow.len(), voc.k());
        let sum: f32 = bow.iter().sum();
        if set.is_empty() {
            prop_assert!(bow.iter().all(|&x| x == 0.));
        } else {
            prop_assert!((sum - 1.).abs() < 1e-5, "histogram sums to {}", sum);
        }
    }

    #[test]
    fn idf_is_finite_and_non_negative(
        voc in arb_vocabulary(),
        sets in prop::collection::vec(arb_set(20), 0..8),
        plus_one in any::<bool>(),
    ) {
        let smoothing = if plus_one {
            IdfSmoothing::AdditivePlusOne
        } else {
            IdfSmoothing::Additive
        };
        let (idf, table) = build_index(&collection_of(&sets), &voc, smoothing).unwrap();
        prop_assert!(idf.weights().iter().all(|w| w.is_finite() && *w >= 0.));
        prop_assert_eq!(idf.num_docs(), sets.len());

        // unseen words carry the largest weight
        let max = smoothing.idf(sets.len(), 0);
        prop_assert!(idf.weights().iter().all(|&w| w <= max + 1e-6));

        for (_, v) in table.iter() {
            let norm = vector::l2_norm(v);
            prop_assert!(norm == 0. || (norm - 1.).abs() < 1e-4, "norm {}", norm);
        }
    }

    #[test]
    fn ranking_is_bounded_and_sorted(
        voc in arb_vocabulary(),
        sets in prop::collection::vec(arb_set(20), 1..12),
        q in arb_set(20),
        top_k in 0usize..15,
    ) {
        prop_assume!(!q.is_empty());
        let collection = collection_of(&sets);
        let (idf, table) = build_index(&collection, &voc, IdfSmoothing::Additive).unwrap();
        let ranking = query(Some(&q), &voc, &idf, &table, top_k).unwrap();
        prop_assert!(ranking.len() <= top_k);
        prop_assert_eq!(ranking.len(), top_k.min(sets.len()));
        let scores: Vec<f32> = ranking.iter().map(|m| m.score).collect();
        prop_assert!(scores.windows(2).all(|w| w[0] >= w[1]));
        prop_assert!(scores.iter().all(|&s| s >= -1e-5 && s <= 1. + 1e-5));

        let again = query(Some(&q), &voc, &idf, &table, top_k).unwrap();
        prop_assert_eq!(ranking, again);
    }

    #[test]
    fn self_query_scores_highest(
        voc in arb_vocabulary(),
        sets in prop::collection::vec(arb_set(20), 1..8),
        pick in any::<prop::sample::Index>(),
    ) {
        let i = pick.index(sets.len());
        prop_assume!(!sets[i].is_empty());
        let collection = collection_of(&sets);
        let (idf, table) = build_index(&collection, &voc, IdfSmoothing::Additive).unwrap();
        let own = table.get(&format!("img{i}")).unwrap();
        prop_assume!(vector::l2_norm(own) > 0.);

        let ranking = query(Some(&sets[i]), &voc, &idf, &table, sets.len()).unwrap();
        let best = ranking.first().unwrap().score;
        let own_score = ranking.iter().find(|m| m.id == format!("img{i}")).unwrap().score;
        prop_assert!((own_score - 1.).abs() < 1e-4);
        prop_assert!((best - own_score).abs() < 1e-4);
    }
}
