//! Monte Carlo propagation of source neutrons through a chopper cascade.
//!
//! Neutrons are drawn in fixed-size chunks, each with its own generator
//! seeded from the run seed and the chunk index. Chunks run in parallel and
//! are concatenated in chunk order, so results are reproducible for a seed
//! and a larger run contains every survivor of a smaller one.

use crate::chopper::ChopperCascade;
use crate::error::{Error, Result};
use crate::source::SourceModel;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

const CHUNK_SIZE: usize = 65_536;

/// Number of neutrons and RNG seed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationSettings {
    pub neutrons: usize,
    pub seed: u64,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            neutrons: 1_000_000,
            seed: 0,
        }
    }
}

impl SimulationSettings {
    #[must_use]
    pub fn new(neutrons: usize, seed: u64) -> Self {
        Self { neutrons, seed }
    }
}

/// Neutrons that passed every chopper.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SimulatedNeutrons {
    /// Emission time after the pulse reference, ns.
    pub emission_time_ns: Vec<f64>,
    /// Inverse speed, ns/m.
    pub slowness_ns_per_m: Vec<f64>,
    /// Number of neutrons drawn, including those absorbed by choppers.
    pub simulated: usize,
}

impl SimulatedNeutrons {
    /// Number of transmitted neutrons.
    #[must_use]
    pub fn len(&self) -> usize {
        self.emission_time_ns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.emission_time_ns.is_empty()
    }

    /// Fraction of simulated neutrons transmitted.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn transmission(&self) -> f64 {
        if self.simulated == 0 {
            0.0
        } else {
            self.len() as f64 / self.simulated as f64
        }
    }

    fn append(&mut self, other: &SimulatedNeutrons) {
        self.emission_time_ns
            .extend_from_slice(&other.emission_time_ns);
        self.slowness_ns_per_m
            .extend_from_slice(&other.slowness_ns_per_m);
        self.simulated += other.simulated;
    }
}

/// Simulates `settings.neutrons` neutrons from `source` through `choppers`.
///
/// # Errors
/// Returns an error if the source is invalid or no neutrons are requested.
pub fn simulate(
    source: &SourceModel,
    choppers: &ChopperCascade,
    settings: &SimulationSettings,
) -> Result<SimulatedNeutrons> {
    source.validate()?;
    if settings.neutrons == 0 {
        return Err(Error::InvalidSettings(
            "number of simulated neutrons must be positive".to_string(),
        ));
    }

    let n_chunks = settings.neutrons.div_ceil(CHUNK_SIZE);
    let chunks: Vec<SimulatedNeutrons> = (0..n_chunks)
        .into_par_iter()
        .map(|chunk| {
            let size = CHUNK_SIZE.min(settings.neutrons - chunk * CHUNK_SIZE);
            simulate_chunk(source, choppers, chunk_seed(settings.seed, chunk), size)
        })
        .collect();

    let mut out = SimulatedNeutrons::default();
    for chunk in &chunks {
        out.append(chunk);
    }

    log::info!(
        "simulated {} neutrons through {} choppers, {} transmitted ({:.2}%)",
        out.simulated,
        choppers.len(),
        out.len(),
        100.0 * out.transmission()
    );
    Ok(out)
}

fn simulate_chunk(
    source: &SourceModel,
    choppers: &ChopperCascade,
    seed: u64,
    size: usize,
) -> SimulatedNeutrons {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut out = SimulatedNeutrons {
        simulated: size,
        ..SimulatedNeutrons::default()
    };
    for _ in 0..size {
        let (emission, slowness) = source.sample(&mut rng);
        if choppers.transmits(emission, slowness) {
            out.emission_time_ns.push(emission);
            out.slowness_ns_per_m.push(slowness);
        }
    }
    out
}

/// SplitMix64 finalizer over the run seed and chunk index.
fn chunk_seed(seed: u64, chunk: usize) -> u64 {
    let mut z = seed ^ (chunk as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}
