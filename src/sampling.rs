//! Beta/Gamma sampling: the statistical primitive under Thompson sampling.
//!
//! Pure functions of a caller-supplied RNG — no global state, no interior
//! mutability. [`crate::selector::ThompsonSelector`] is the only intended
//! caller; it owns the RNG under its own lock so samples stay reproducible
//! under a fixed seed.

use rand::Rng;

/// Draw a Gamma(shape, 1) sample via Marsaglia-Tsang. Only called with
/// `shape >= 1`; callers needing `shape < 1` go through
/// [`sample_beta_johnk`] instead, which samples the ratio directly.
///
/// Marsaglia & Tsang, "A Simple Method for Generating Gamma Variables" (2000).
fn sample_gamma<R: Rng + ?Sized>(shape: f64, rng: &mut R) -> f64 {
    debug_assert!(shape >= 1.0);
    let d = shape - 1.0 / 3.0;
    let c = 1.0 / (9.0 * d).sqrt();

    loop {
        let mut x;
        let mut v;
        loop {
            x = sample_standard_normal(rng);
            v = 1.0 + c * x;
            if v > 0.0 {
                break;
            }
        }
        let v3 = v * v * v;
        let u: f64 = rng.gen_range(0.0..1.0_f64);
        if u < 1.0 - 0.0331 * x * x * x * x {
            return d * v3;
        }
        if u.ln() < 0.5 * x * x + d * (1.0 - v3 + v3.ln()) {
            return d * v3;
        }
    }
}

/// Johnk's transform: an alternative Beta(a, b) sampler for small shapes,
/// used as a cross-check and for the degenerate-parameter fallback path.
fn sample_beta_johnk<R: Rng + ?Sized>(alpha: f64, beta: f64, rng: &mut R) -> f64 {
    loop {
        let u: f64 = rng.gen_range(0.0..1.0_f64);
        let v: f64 = rng.gen_range(0.0..1.0_f64);
        let x = u.powf(1.0 / alpha);
        let y = v.powf(1.0 / beta);
        let sum = x + y;
        if sum <= 1.0 && sum > 0.0 {
            return x / sum;
        }
    }
}

fn sample_standard_normal<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    // Box-Muller, single variate.
    let u1: f64 = rng.gen_range(f64::MIN_POSITIVE..1.0_f64);
    let u2: f64 = rng.gen_range(0.0..1.0_f64);
    (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
}

/// Draw `theta ~ Beta(alpha, beta)`.
///
/// For `alpha >= 1 && beta >= 1` this is `X / (X + Y)` with `X ~
/// Gamma(alpha, 1)`, `Y ~ Gamma(beta, 1)` (Marsaglia-Tsang). For `alpha <
/// 1` or `beta < 1` (but both positive) Johnk's transform is used, which
/// is well-behaved in that regime without the boosting trick's extra
/// variance. Degenerate inputs (`alpha <= 0` or `beta <= 0`) fall back
/// to a uniform `[0, 1]` draw so callers never observe NaN.
pub fn sample_beta<R: Rng + ?Sized>(alpha: f64, beta: f64, rng: &mut R) -> f64 {
    if alpha <= 0.0 || beta <= 0.0 {
        return rng.gen_range(0.0..1.0_f64);
    }
    if alpha < 1.0 || beta < 1.0 {
        return sample_beta_johnk(alpha, beta, rng);
    }
    let x = sample_gamma(alpha, rng);
    let y = sample_gamma(beta, rng);
    if x + y <= 0.0 {
        return rng.gen_range(0.0..1.0_f64);
    }
    x / (x + y)
}

/// Analytic mean of Beta(alpha, beta).
pub fn beta_mean(alpha: f64, beta: f64) -> f64 {
    alpha / (alpha + beta)
}

/// Analytic variance of Beta(alpha, beta).
pub fn beta_variance(alpha: f64, beta: f64) -> f64 {
    let sum = alpha + beta;
    (alpha * beta) / (sum * sum * (sum + 1.0))
}

/// Analytic mode of Beta(alpha, beta), or `-1.0` when undefined
/// (requires `alpha > 1 && beta > 1`).
pub fn beta_mode(alpha: f64, beta: f64) -> f64 {
    if alpha > 1.0 && beta > 1.0 {
        (alpha - 1.0) / (alpha + beta - 2.0)
    } else {
        -1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn empirical_mean_variance(alpha: f64, beta: f64, n: usize, seed: u64) -> (f64, f64) {
        let mut rng = StdRng::seed_from_u64(seed);
        let samples: Vec<f64> = (0..n).map(|_| sample_beta(alpha, beta, &mut rng)).collect();
        let mean = samples.iter().sum::<f64>() / n as f64;
        let var = samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n as f64;
        (mean, var)
    }

    #[test]
    fn matches_analytic_moments_for_symmetric_prior() {
        let (mean, var) = empirical_mean_variance(5.0, 5.0, 10_000, 42);
        assert!((mean - beta_mean(5.0, 5.0)).abs() < 0.02);
        assert!((var - beta_variance(5.0, 5.0)).abs() < 0.01);
    }

    #[test]
    fn matches_analytic_moments_for_skewed_prior() {
        let (mean, var) = empirical_mean_variance(20.0, 3.0, 10_000, 7);
        assert!((mean - beta_mean(20.0, 3.0)).abs() < 0.02);
        assert!((var - beta_variance(20.0, 3.0)).abs() < 0.01);
    }

    #[test]
    fn matches_analytic_moments_for_sub_one_shapes() {
        let (mean, var) = empirical_mean_variance(0.5, 0.5, 10_000, 99);
        assert!((mean - beta_mean(0.5, 0.5)).abs() < 0.02);
        assert!((var - beta_variance(0.5, 0.5)).abs() < 0.01);
    }

    #[test]
    fn degenerate_inputs_never_produce_nan() {
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..1000 {
            let v = sample_beta(0.0, 0.0, &mut rng);
            assert!(v.is_finite());
            assert!((0.0..=1.0).contains(&v));
        }
    }

    #[test]
    fn mode_sentinel_below_threshold() {
        assert_eq!(beta_mode(1.0, 1.0), -1.0);
        assert_eq!(beta_mode(0.5, 5.0), -1.0);
        assert!(beta_mode(5.0, 5.0) > 0.0);
    }
}
