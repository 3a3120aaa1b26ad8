//! Popularity score used to pick and order threads, modelled on Reddit's
//! `hot` ranking.

use crate::reddit::Post;

/// Reddit's launch time, which anchors the decay term.
pub const EPOCH_OFFSET: i64 = 1_134_028_003;
/// Seconds for the decay term to move the score by one order of magnitude.
pub const DECAY_SECONDS: f64 = 4500.0;
const PRECISION: f64 = 10_000_000.0;

pub fn confidence(score: i64, created_utc: f64, now: i64) -> f64 {
    let order = (score.unsigned_abs().max(1) as f64).ln();
    let sign = score.signum() as f64;
    let age = (now as f64 - created_utc).floor() - EPOCH_OFFSET as f64;
    round_half_up((order + sign * age / DECAY_SECONDS) * PRECISION) / PRECISION
}

pub fn post_confidence(post: &Post, now: i64) -> f64 {
    confidence(post.score, post.created_utc, now)
}

// Halves round toward positive infinity so ties land on the same value
// regardless of sign.
fn round_half_up(value: f64) -> f64 {
    (value + 0.5).floor()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const NOW: i64 = 1_700_000_000;

    #[test]
    fn matches_reference_values() {
        // age = 0 - EPOCH_OFFSET
        let expected = ((10f64.ln() - 1_134_028_003.0 / 4500.0) * PRECISION + 0.5).floor() / PRECISION;
        assert_eq!(confidence(10, NOW as f64, NOW), expected);

        // Zero score removes both the order and the decay term.
        assert_eq!(confidence(0, 1_600_000_000.0, NOW), 0.0);
    }

    #[test]
    fn rounds_to_seven_digits() {
        let value = confidence(7, 1_650_000_000.5, NOW);
        let scaled = value * PRECISION;
        assert!((scaled - scaled.round()).abs() < 1e-2);
    }

    #[test]
    fn negative_scores_flip_the_decay_term() {
        let positive = confidence(5, 1_650_000_000.0, NOW);
        let negative = confidence(-5, 1_650_000_000.0, NOW);
        assert!((positive + negative - 2.0 * 5f64.ln()).abs() < 1e-6);
    }

    #[test]
    fn decay_term_is_linear_in_elapsed_time() {
        let base = confidence(100, 1_650_000_000.0, NOW);
        let shifted = confidence(100, 1_650_000_000.0 - DECAY_SECONDS, NOW);
        assert!((shifted - base - 1.0).abs() < 1e-6);
    }

    #[test]
    fn higher_score_ranks_higher_at_same_time() {
        let created = 1_690_000_000.0;
        assert!(confidence(10, created, NOW) > confidence(5, created, NOW));
        assert!(confidence(5, created, NOW) > confidence(1, created, NOW));
    }

    proptest! {
        #[test]
        fn non_decreasing_in_score_magnitude(
            low in 1i64..1_000_000,
            bump in 0i64..1_000_000,
            created in 1_200_000_000i64..1_700_000_000,
            negative in any::<bool>(),
        ) {
            let high = low + bump;
            let (a, b) = if negative { (-low, -high) } else { (low, high) };
            let created = created as f64;
            // `order` only sees the magnitude; the sign moves the decay term.
            prop_assert!(confidence(b, created, NOW) >= confidence(a, created, NOW));
        }
    }
}
