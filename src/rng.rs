use rand::{rngs::StdRng, Rng, SeedableRng};

/// Create a [`StdRng`] from an explicit experiment seed.
pub fn rng_from_seed(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

/// Derive `count` per-layer seeds from one top-level seed.
///
/// Every derived seed lies in `[1, i32::MAX)`, and the same top-level seed
/// always yields the same sequence.
pub fn derive_layer_seeds(seed: u64, count: usize) -> Vec<u64> {
    let mut rng = rng_from_seed(seed);
    (0..count)
        .map(|_| rng.gen_range(1..i32::MAX as u64))
        .collect()
}
