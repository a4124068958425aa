//! Random draws shared by the Gibbs samplers.
//!
//! Gamma variates use the Marsaglia-Tsang squeeze method; Beta variates are
//! built from two Gamma draws. Everything takes a generic `Rng` so a chain is
//! reproducible from a single seeded `StdRng`.

use rand::{rngs::StdRng, Rng, RngExt, SeedableRng};
use statrs::function::beta::ln_beta;

use super::bayesian::SamplerConfig;
use super::CancellationToken;
use crate::error::LabelFuseError;

/// Probabilities are kept this far from 0 and 1 before taking logarithms.
pub(crate) const PROBABILITY_FLOOR: f64 = 1e-12;

/// Resolves an optional seed, falling back to the thread-local entropy source.
pub(crate) fn resolve_seed(seed: Option<u64>) -> u64 {
    seed.unwrap_or_else(|| rand::rng().random::<u64>())
}

/// Derives an independent stream seed (splitmix64 finalizer).
pub(crate) fn derive_seed(seed: u64, stream: u64) -> u64 {
    let mut z = seed.wrapping_add(stream.wrapping_add(1).wrapping_mul(0x9E37_79B9_7F4A_7C15));
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

pub(crate) fn seeded_rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

#[inline]
pub(crate) fn clamp_probability(p: f64) -> f64 {
    p.clamp(PROBABILITY_FLOOR, 1.0 - PROBABILITY_FLOOR)
}

/// Uniform draw on `(0, 1]`, safe to take the logarithm of.
#[inline]
fn open_unit<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    1.0 - rng.random::<f64>()
}

/// Standard normal draw (Box-Muller).
pub(crate) fn standard_normal<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    let radius = (-2.0 * open_unit(rng).ln()).sqrt();
    let angle = std::f64::consts::TAU * rng.random::<f64>();
    radius * angle.cos()
}

/// Gamma(shape, 1) draw.
pub(crate) fn gamma<R: Rng + ?Sized>(rng: &mut R, shape: f64) -> f64 {
    if shape < 1.0 {
        // Boost: Gamma(a) = Gamma(a + 1) * U^(1/a).
        let u = open_unit(rng);
        return gamma(rng, shape + 1.0) * u.powf(1.0 / shape);
    }

    let d = shape - 1.0 / 3.0;
    let c = 1.0 / (9.0 * d).sqrt();
    loop {
        let x = standard_normal(rng);
        let v = 1.0 + c * x;
        if v <= 0.0 {
            continue;
        }
        let v = v * v * v;
        let u = open_unit(rng);
        let x2 = x * x;
        if u < 1.0 - 0.0331 * x2 * x2 {
            return d * v;
        }
        if u.ln() < 0.5 * x2 + d * (1.0 - v + v.ln()) {
            return d * v;
        }
    }
}

/// Beta(alpha, beta) draw.
pub(crate) fn beta<R: Rng + ?Sized>(rng: &mut R, alpha: f64, beta: f64) -> f64 {
    let x = gamma(rng, alpha);
    let y = gamma(rng, beta);
    let total = x + y;
    if total > 0.0 {
        x / total
    } else {
        alpha / (alpha + beta)
    }
}

#[inline]
pub(crate) fn sigmoid(log_odds: f64) -> f64 {
    1.0 / (1.0 + (-log_odds).exp())
}

/// Draws an index proportionally to `exp(log_weights[i])`.
pub(crate) fn categorical_from_logs<R: Rng + ?Sized>(rng: &mut R, log_weights: &[f64]) -> usize {
    let max = log_weights
        .iter()
        .copied()
        .fold(f64::NEG_INFINITY, f64::max);
    let weights: Vec<f64> = log_weights.iter().map(|w| (w - max).exp()).collect();
    let total: f64 = weights.iter().sum();
    let mut draw = rng.random::<f64>() * total;
    for (index, weight) in weights.iter().enumerate() {
        if draw < *weight {
            return index;
        }
        draw -= weight;
    }
    weights.len().saturating_sub(1)
}

/// Log-likelihood of `disagreements` wrong votes out of `votes` at error rate `e`.
#[inline]
pub(crate) fn vote_log_likelihood(e: f64, disagreements: u32, votes: u32) -> f64 {
    let e = clamp_probability(e);
    f64::from(disagreements) * e.ln() + f64::from(votes - disagreements) * (1.0 - e).ln()
}

/// Same likelihood with the error rate integrated out under Beta(alpha, beta).
#[inline]
pub(crate) fn vote_log_marginal(alpha: f64, beta: f64, disagreements: u32, votes: u32) -> f64 {
    ln_beta(
        alpha + f64::from(disagreements),
        beta + f64::from(votes - disagreements),
    ) - ln_beta(alpha, beta)
}

/// One Gibbs chain: a sweep updates every latent variable once.
pub(crate) trait Chain {
    fn sweep<R: Rng + ?Sized>(&mut self, rng: &mut R);

    /// Adds the current state to the running posterior sums.
    fn record(&mut self);
}

/// Runs burn-in, then keeps every `thinning`-th of `samples * thinning` sweeps.
///
/// Returns the number of recorded samples. The cancellation token is polled
/// between sweeps only.
pub(crate) fn run_chain<C: Chain, R: Rng + ?Sized>(
    chain: &mut C,
    config: &SamplerConfig,
    rng: &mut R,
    cancel: &CancellationToken,
) -> Result<usize, LabelFuseError> {
    for _ in 0..config.burn_in_samples {
        cancel.check()?;
        chain.sweep(rng);
    }

    let thinning = config.thinning_samples.max(1);
    let mut recorded = 0;
    for sweep in 0..config.samples * thinning {
        cancel.check()?;
        chain.sweep(rng);
        if (sweep + 1) % thinning == 0 {
            chain.record();
            recorded += 1;
        }
    }
    Ok(recorded)
}
