//! Benchmark objectives shipped with the slave, negated so that higher is better.

use hs_types::{EntryPointRegistry, Settings, SlaveError};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Apply the flags this objective declared. Trials carry the master's whole
/// registry, so flags for other settings are skipped.
fn parse_known(settings: &mut Settings, args: &[String]) -> anyhow::Result<()> {
    let known: Vec<&String> = args
        .iter()
        .filter(|arg| {
            arg.strip_prefix("--")
                .map(|body| body.split_once('=').map_or(body, |(name, _)| name))
                .is_some_and(|name| settings.contains(name))
        })
        .collect();
    settings.parse(&known)?;
    Ok(())
}

/// `-((x - 1)^2 + (y + 2)^2)`, maximised at `x = 1, y = -2`.
pub fn quadratic(args: &[String]) -> anyhow::Result<f64> {
    let mut settings = Settings::new();
    let x = settings.register("x", 0.0_f64)?;
    let y = settings.register("y", 0.0_f64)?;
    parse_known(&mut settings, args)?;
    let (x, y) = (settings.get(&x)?, settings.get(&y)?);
    Ok(-((x - 1.0).powi(2) + (y + 2.0).powi(2)))
}

/// Negated Rosenbrock function with `a = 1, b = 100`, maximised at `x = y = 1`.
pub fn rosenbrock(args: &[String]) -> anyhow::Result<f64> {
    let mut settings = Settings::new();
    let x = settings.register("x", 0.0_f64)?;
    let y = settings.register("y", 0.0_f64)?;
    parse_known(&mut settings, args)?;
    let (x, y) = (settings.get(&x)?, settings.get(&y)?);
    Ok(-((1.0 - x).powi(2) + 100.0 * (y - x * x).powi(2)))
}

/// [`quadratic`] plus uniform noise in `[-noise, noise]`.
///
/// A negative `noiseSeed` draws from the OS.
pub fn noisy_quadratic(args: &[String]) -> anyhow::Result<f64> {
    let mut settings = Settings::new();
    let noise = settings.register("noise", 0.1_f64)?;
    let seed = settings.register("noiseSeed", -1_i64)?;
    parse_known(&mut settings, args)?;
    let (noise, seed) = (settings.get(&noise)?, settings.get(&seed)?);
    if !(noise.is_finite() && noise >= 0.0) {
        anyhow::bail!("noise must be a non-negative number, got {noise}");
    }

    let mut rng = if seed < 0 {
        StdRng::from_os_rng()
    } else {
        StdRng::seed_from_u64(seed as u64)
    };
    let jitter = if noise > 0.0 {
        rng.random_range(-noise..=noise)
    } else {
        0.0
    };
    Ok(quadratic(args)? + jitter)
}

/// Registry holding every built-in objective.
pub fn builtin_registry() -> Result<EntryPointRegistry, SlaveError> {
    EntryPointRegistry::new()
        .with("quadratic", quadratic)?
        .with("rosenbrock", rosenbrock)?
        .with("noisy-quadratic", noisy_quadratic)
}
