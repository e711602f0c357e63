// AqpDB
// Copyright (C) 2025 Synerthink

// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.

// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

use rand::Rng;

/// Rounds `value` up with probability equal to its fractional part and down otherwise,
/// so the expected result equals `value`. Negative inputs round to zero.
pub fn probability_round<R: Rng>(value: f64, rng: &mut R) -> u64 {
    if value <= 0.0 || !value.is_finite() {
        return 0;
    }
    let floor = value.floor();
    let fraction = value - floor;
    if fraction > 0.0 && rng.gen_range(0.0..1.0) < fraction { floor as u64 + 1 } else { floor as u64 }
}

/// Join-sampling rate for a requested sample size.
///
/// When more rows are expected than requested, the rate is scaled up by `post_sampling_factor`
/// to make up for rows lost downstream; otherwise everything is taken.
pub fn effective_rate(sample_size: usize, estimated_rows: f64, post_sampling_factor: f64) -> f64 {
    if estimated_rows > sample_size as f64 {
        (sample_size as f64 / estimated_rows * post_sampling_factor).min(1.0)
    } else {
        1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_integers_are_exact() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            assert_eq!(probability_round(4.0, &mut rng), 4);
            assert_eq!(probability_round(0.0, &mut rng), 0);
            assert_eq!(probability_round(-2.5, &mut rng), 0);
        }
    }

    #[test]
    fn test_round_up_frequency_converges() {
        let mut rng = StdRng::seed_from_u64(42);
        let trials = 20_000;
        let p = 0.3;

        let ups = (0..trials).filter(|_| probability_round(12.0 + p, &mut rng) == 13).count();
        let observed = ups as f64 / trials as f64;
        let sigma = (p * (1.0 - p) / trials as f64).sqrt();

        assert!((observed - p).abs() < 5.0 * sigma, "observed {observed}, expected {p}");
    }

    #[test]
    fn test_result_is_floor_or_ceil() {
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..1000 {
            let rounded = probability_round(7.75, &mut rng);
            assert!(rounded == 7 || rounded == 8);
        }
    }

    #[test]
    fn test_effective_rate() {
        assert!((effective_rate(100, 1000.0, 2.0) - 0.2).abs() < 1e-12);
        assert_eq!(effective_rate(100, 1000.0, 30.0), 1.0);
        assert_eq!(effective_rate(100, 80.0, 2.0), 1.0);
    }
}
