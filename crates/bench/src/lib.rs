use std::time::Duration;

use criterion::BenchmarkGroup;
use criterion::measurement::Measurement;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const SMALL_RUNTIME_SAMPLE_SIZE: usize = 15;
const SMALL_RUNTIME_WARM_UP_MS: u64 = 100;
const SMALL_RUNTIME_MEASURE_MS: u64 = 200;
const MEDIUM_RUNTIME_SAMPLE_SIZE: usize = 15;
const MEDIUM_RUNTIME_WARM_UP_MS: u64 = 500;
const MEDIUM_RUNTIME_MEASURE_MS: u64 = 1000;
const LARGE_RUNTIME_SAMPLE_SIZE: usize = 10;
const LARGE_RUNTIME_WARM_UP_MS: u64 = 800;
const LARGE_RUNTIME_MEASURE_MS: u64 = 1500;
const RNG_SEED: u64 = 0x5EED_2026;

/// Largest absolute amount a generated ledger entry carries.
pub const MAX_AMOUNT: i64 = 1_000_000;

pub fn apply_small_runtime_config<M: Measurement>(group: &mut BenchmarkGroup<'_, M>) {
    group.sample_size(SMALL_RUNTIME_SAMPLE_SIZE);
    group.warm_up_time(Duration::from_millis(SMALL_RUNTIME_WARM_UP_MS));
    group.measurement_time(Duration::from_millis(SMALL_RUNTIME_MEASURE_MS));
}

pub fn apply_medium_runtime_config<M: Measurement>(group: &mut BenchmarkGroup<'_, M>) {
    group.sample_size(MEDIUM_RUNTIME_SAMPLE_SIZE);
    group.warm_up_time(Duration::from_millis(MEDIUM_RUNTIME_WARM_UP_MS));
    group.measurement_time(Duration::from_millis(MEDIUM_RUNTIME_MEASURE_MS));
}

pub fn apply_large_runtime_config<M: Measurement>(group: &mut BenchmarkGroup<'_, M>) {
    group.sample_size(LARGE_RUNTIME_SAMPLE_SIZE);
    group.warm_up_time(Duration::from_millis(LARGE_RUNTIME_WARM_UP_MS));
    group.measurement_time(Duration::from_millis(LARGE_RUNTIME_MEASURE_MS));
}

pub fn apply_runtime_config_for_size<M: Measurement>(group: &mut BenchmarkGroup<'_, M>, size: usize) {
    if size <= 4_096 {
        apply_small_runtime_config(group);
    } else if size <= 16_384 {
        apply_medium_runtime_config(group);
    } else {
        apply_large_runtime_config(group);
    }
}

pub fn default_rng() -> StdRng {
    StdRng::seed_from_u64(RNG_SEED)
}

/// Uniform value with exactly `bits` significant bits.
pub fn random_with_bits<R: Rng + ?Sized>(rng: &mut R, bits: u32) -> u64 {
    if bits == 0 {
        return 0;
    }

    let high_bit = (bits - 1).min(63);
    let min = 1_u64 << high_bit;
    let max = if bits >= 64 {
        u64::MAX
    } else {
        (1_u64 << bits) - 1
    };
    rng.random_range(min..=max)
}

/// One posting of a synthetic ledger: a day number, a transaction id
/// unique within the ledger and a signed amount.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Posting {
    pub day: u32,
    pub id: u64,
    pub amount: i64,
}

/// `n` postings with days drawn below `1 << day_bits`, in generation
/// order. Small `day_bits` makes many postings share a day.
pub fn generate_postings<R: Rng + ?Sized>(rng: &mut R, n: usize, day_bits: u32) -> Vec<Posting> {
    let mut postings = Vec::with_capacity(n);
    for id in 0..n as u64 {
        let bits = rng.random_range(0..=day_bits);
        let day = random_with_bits(rng, bits) as u32;
        let amount = rng.random_range(-MAX_AMOUNT..=MAX_AMOUNT);
        postings.push(Posting { day, id, amount });
    }
    postings
}

/// `q` query days spread over the same range as [`generate_postings`].
pub fn generate_query_days<R: Rng + ?Sized>(rng: &mut R, q: usize, day_bits: u32) -> Vec<u32> {
    let mut days = Vec::with_capacity(q);
    for _ in 0..q {
        let bits = rng.random_range(0..=day_bits);
        days.push(random_with_bits(rng, bits) as u32);
    }
    days
}
