use rand::{rngs::StdRng, seq::index, SeedableRng};
use tracing::debug;

use crate::*;

/// Draws at most `cap` descriptors per image, uniformly and without
/// replacement, so images with unusually many features do not dominate the
/// vocabulary.
pub struct Sampler {
    cap: usize,
    rng: StdRng,
}

impl Sampler {
    /// Sampler with a fixed seed is reproducible; `None` seeds from entropy.
    pub fn new(cap: usize, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { cap, rng }
    }

    /// Append a sample of `set` to `out`. Sets no larger than the cap are copied whole.
    pub fn sample_into(&mut self, set: &DescriptorSet, out: &mut DescriptorSet) -> BowResult<()> {
        set.check_dim(out.dim())?;
        if set.len() <= self.cap {
            return out.extend_from(set);
        }
        for i in index::sample(&mut self.rng, set.len(), self.cap).into_iter() {
            if let Some(desc) = set.get(i) {
                out.push(desc)?;
            }
        }
        Ok(())
    }

    /// Concatenated sample over a whole collection of `dim`-dimensional sets.
    ///
    /// Images without descriptors contribute nothing.
    pub fn sample_all<'a, I>(&mut self, sets: I, dim: usize) -> BowResult<DescriptorSet>
    where
        I: IntoIterator<Item = &'a DescriptorSet>,
    {
        let mut out = DescriptorSet::from_flat(dim, Vec::new())?;
        let mut images = 0usize;
        for set in sets {
            images += 1;
            self.sample_into(set, &mut out)?;
        }
        debug!(images, samples = out.len(), cap = self.cap, "sampled descriptors");
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set_of(n: usize, dim: usize) -> DescriptorSet {
        let data = (0..n * dim).map(|i| i as f32).collect();
        DescriptorSet::from_flat(dim, data).unwrap()
    }

    #[test]
    fn caps_large_sets() {
        let mut sampler = Sampler::new(5, Some(7));
        let big = set_of(40, 3);
        let small = set_of(2, 3);
        let empty = DescriptorSet::new(3);
        let out = sampler.sample_all([&big, &small, &empty], 3).unwrap();
        assert_eq!(out.len(), 7);
    }

    #[test]
    fn samples_without_replacement() {
        let mut sampler = Sampler::new(10, Some(1));
        let big = set_of(50, 2);
        let out = sampler.sample_all([&big], 2).unwrap();
        let mut firsts: Vec<i64> = out.iter().map(|d| d[0] as i64).collect();
        firsts.sort_unstable();
        firsts.dedup();
        assert_eq!(firsts.len(), 10);
        // every sampled row is an original row
        assert!(out.iter().all(|d| d[1] == d[0] + 1.0 && d[0] as i64 % 2 == 0));
    }

    #[test]
    fn seeded_sampling_is_reproducible() {
        let big = set_of(100, 4);
        let a = Sampler::new(8, Some(42)).sample_all([&big], 4).unwrap();
        let b = Sampler::new(8, Some(42)).sample_all([&big], 4).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn rejects_mixed_dimensions() {
        let mut sampler = Sampler::new(10, Some(1));
        let a = set_of(3, 2);
        let b = set_of(3, 4);
        assert!(matches!(
            sampler.sample_all([&a, &b], 2),
            Err(BowErr::DimensionMismatch { .. })
        ));
    }
}
