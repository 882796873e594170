//! Random sampling helpers used by the simulation

use rand::Rng;

/// Sample a normally distributed value (Box-Muller transform)
pub fn gaussian<R: Rng + ?Sized>(rng: &mut R, mean: f32, std_dev: f32) -> f32 {
    // u1 in (0, 1] so ln() stays finite
    let u1: f32 = 1.0 - rng.gen::<f32>();
    let u2: f32 = rng.gen();
    let z = (-2.0 * u1.ln()).sqrt() * (std::f32::consts::TAU * u2).cos();
    mean + z * std_dev
}

/// Unit vector pointing in a uniformly random direction
pub fn random_direction<R: Rng + ?Sized>(rng: &mut R) -> (f32, f32) {
    let angle = rng.gen_range(0.0..std::f32::consts::TAU);
    (angle.cos(), angle.sin())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_gaussian_moments() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let n = 20_000;
        let samples: Vec<f32> = (0..n).map(|_| gaussian(&mut rng, 3.0, 2.0)).collect();
        let mean = samples.iter().sum::<f32>() / n as f32;
        let var = samples.iter().map(|s| (s - mean).powi(2)).sum::<f32>() / n as f32;

        assert!((mean - 3.0).abs() < 0.1, "mean was {}", mean);
        assert!((var.sqrt() - 2.0).abs() < 0.1, "std dev was {}", var.sqrt());
        assert!(samples.iter().all(|s| s.is_finite()));
    }

    #[test]
    fn test_random_direction_is_unit() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        for _ in 0..100 {
            let (x, y) = random_direction(&mut rng);
            assert!(((x * x + y * y).sqrt() - 1.0).abs() < 1e-5);
        }
    }
}
