//! Lower bound on suite size.
//!
//! Every one of the `a * b` value combinations of two parameters needs its own
//! row, so no strength-2 suite can be shorter than the largest such product.

/// `max_{i<j} counts[i] * counts[j]`, or 0 with fewer than two parameters.
#[must_use]
pub fn pairwise_lower_bound(counts: &[usize]) -> usize {
    let mut best = 0usize;
    for (i, &a) in counts.iter().enumerate() {
        for &b in &counts[i + 1..] {
            best = best.max(a.saturating_mul(b));
        }
    }
    best
}

/// Lower bound when one is defined for `strength`; `None` for `strength != 2`.
#[must_use]
pub fn lower_bound_for_strength(counts: &[usize], strength: usize) -> Option<usize> {
    (strength == 2).then(|| pairwise_lower_bound(counts))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fewer_than_two_parameters_is_zero() {
        assert_eq!(pairwise_lower_bound(&[]), 0);
        assert_eq!(pairwise_lower_bound(&[5]), 0);
    }

    #[test]
    fn max_pair_product() {
        assert_eq!(pairwise_lower_bound(&[3, 4]), 12);
        assert_eq!(pairwise_lower_bound(&[4, 4, 3, 3, 3]), 16);
        assert_eq!(pairwise_lower_bound(&[2, 5, 2, 8]), 40);
    }

    #[test]
    fn only_strength_two_has_a_bound() {
        assert_eq!(lower_bound_for_strength(&[3, 4], 2), Some(12));
        assert_eq!(lower_bound_for_strength(&[3, 4, 5], 3), None);
        assert_eq!(lower_bound_for_strength(&[], 2), Some(0));
    }
}
