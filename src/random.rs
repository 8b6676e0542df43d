//! Seeded random number generation for Monte Carlo routines.

use rand::rngs::StdRng;
use rand::SeedableRng;

/// Build the generator for one call: reproducible with a seed, entropy otherwise.
pub fn seeded_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_entropy(),
    }
}
