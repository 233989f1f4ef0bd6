//! # Adaptive statistics (C1)
//!
//! Every scalar threshold used elsewhere in the engine is computed here from
//! an observed distribution, never hardcoded. Each function is total and
//! side-effect-free; it returns a neutral value — `0.0`, or the
//! minimal-context sentinel `1` for cardinalities — when the observation set
//! is empty. Callers pass borrowed slices; nothing here allocates beyond a
//! transient sort for percentile computation.

/// Arithmetic mean of `values`, or `0.0` when empty.
fn mean(values: &[f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f32>() / values.len() as f32
}

/// Population variance of `values`, or `0.0` when there are fewer than two
/// observations.
pub(crate) fn variance(values: &[f32]) -> f32 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let sum_sq: f32 = values.iter().map(|v| (v - m) * (v - m)).sum();
    sum_sq / values.len() as f32
}

/// Linear-interpolated percentile (`p` in `0.0..=1.0`) of `values`, or
/// `0.0` when empty. Does not mutate the caller's slice.
pub(crate) fn percentile(values: &[f32], p: f32) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted: Vec<f32> = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    if sorted.len() == 1 {
        return sorted[0];
    }
    let rank = p.clamp(0.0, 1.0) * (sorted.len() - 1) as f32;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        return sorted[lo];
    }
    let frac = rank - lo as f32;
    sorted[lo] * (1.0 - frac) + sorted[hi] * frac
}

/// Stability additive: the value range of `observations`, `0.0` when the
/// range is zero or the set is empty.
#[must_use]
pub fn adaptive_epsilon(observations: &[f32]) -> f32 {
    if observations.is_empty() {
        return 0.0;
    }
    let mut lo = observations[0];
    let mut hi = observations[0];
    for &v in observations {
        if v < lo {
            lo = v;
        }
        if v > hi {
            hi = v;
        }
    }
    hi - lo
}

/// Clipping bound for change rates: the 90th percentile of the absolute
/// values in `changes`. `0.0` when empty.
#[must_use]
pub fn adaptive_clip(changes: &[f32]) -> f32 {
    let abs: Vec<f32> = changes.iter().map(|v| v.abs()).collect();
    percentile(&abs, 0.90)
}

/// EMA factor: the variance of `changes` relative to the magnitude of their
/// mean, expressed in `[0, 1)`. `0.0` when fewer than two observations or
/// when variance is zero (a perfectly stable series smooths maximally
/// slowly, i.e. contributes nothing extra beyond the base rate).
#[must_use]
pub fn adaptive_smoothing(changes: &[f32]) -> f32 {
    let var = variance(changes);
    if var == 0.0 {
        return 0.0;
    }
    let m = mean(changes).abs();
    var / (var + m)
}

/// Sample threshold before trusting a statistic, inverse-proportional to
/// `recent_sample_density` (observations per unit of recent history, as
/// measured by the caller). Returns the sentinel `1` when density is
/// non-positive or the distribution is otherwise degenerate.
#[must_use]
pub fn adaptive_min_samples(recent_sample_density: f32) -> usize {
    if recent_sample_density <= 0.0 {
        return 1;
    }
    (1.0 / recent_sample_density).ceil().max(1.0) as usize
}

/// Depth bound for graph exploration: log-like growth in `node_count`.
/// `0` for zero or one node (nothing to explore, or a single node has no
/// interesting depth).
#[must_use]
pub fn adaptive_exploration_steps(node_count: usize) -> usize {
    if node_count <= 1 {
        return 0;
    }
    (node_count as f32).ln().ceil().max(0.0) as usize
}

/// When to grow hash buckets: the mean bucket chain length plus one
/// standard deviation of `bucket_lengths`. A bucket whose length exceeds
/// this value should trigger a grow. Returns the sentinel `1.0` when there
/// are no buckets yet (a single empty bucket never triggers a grow).
#[must_use]
pub fn adaptive_bucket_growth_trigger(bucket_lengths: &[usize]) -> f32 {
    if bucket_lengths.is_empty() {
        return 1.0;
    }
    let lengths: Vec<f32> = bucket_lengths.iter().map(|&n| n as f32).collect();
    let m = mean(&lengths);
    let std_dev = variance(&lengths).sqrt();
    (m + std_dev).max(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epsilon_is_zero_on_empty() {
        assert_eq!(adaptive_epsilon(&[]), 0.0);
    }

    #[test]
    fn epsilon_is_zero_on_constant_series() {
        assert_eq!(adaptive_epsilon(&[3.0, 3.0, 3.0]), 0.0);
    }

    #[test]
    fn epsilon_is_the_range() {
        assert_eq!(adaptive_epsilon(&[1.0, 5.0, 2.0]), 4.0);
    }

    #[test]
    fn clip_is_zero_on_empty() {
        assert_eq!(adaptive_clip(&[]), 0.0);
    }

    #[test]
    fn clip_is_near_the_extreme_of_absolute_changes() {
        let clip = adaptive_clip(&[1.0, -2.0, 3.0, -100.0]);
        assert!(clip > 3.0);
    }

    #[test]
    fn smoothing_is_zero_on_single_observation() {
        assert_eq!(adaptive_smoothing(&[1.0]), 0.0);
    }

    #[test]
    fn smoothing_is_zero_on_constant_series() {
        assert_eq!(adaptive_smoothing(&[2.0, 2.0, 2.0]), 0.0);
    }

    #[test]
    fn smoothing_is_bounded() {
        let s = adaptive_smoothing(&[1.0, 100.0, -50.0, 20.0]);
        assert!(s >= 0.0 && s < 1.0);
    }

    #[test]
    fn min_samples_is_sentinel_on_degenerate_density() {
        assert_eq!(adaptive_min_samples(0.0), 1);
        assert_eq!(adaptive_min_samples(-1.0), 1);
    }

    #[test]
    fn min_samples_shrinks_as_density_grows() {
        assert!(adaptive_min_samples(0.1) > adaptive_min_samples(1.0));
    }

    #[test]
    fn exploration_steps_zero_for_trivial_graphs() {
        assert_eq!(adaptive_exploration_steps(0), 0);
        assert_eq!(adaptive_exploration_steps(1), 0);
    }

    #[test]
    fn exploration_steps_grow_sublinearly() {
        let small = adaptive_exploration_steps(10);
        let large = adaptive_exploration_steps(10_000);
        assert!(large > small);
        assert!(large < 10_000);
    }

    #[test]
    fn bucket_growth_trigger_sentinel_on_empty() {
        assert_eq!(adaptive_bucket_growth_trigger(&[]), 1.0);
    }

    #[test]
    fn bucket_growth_trigger_tracks_chain_length() {
        let low = adaptive_bucket_growth_trigger(&[1, 1, 1]);
        let high = adaptive_bucket_growth_trigger(&[10, 12, 9, 11]);
        assert!(high > low);
    }
}
