use super::quota::AccountUsage;

/// Score an account's eligibility in [0, 1]. Remaining quota dominates;
/// recent usage applies a penalty that saturates at 100 submissions.
pub fn score(usage: &AccountUsage) -> f64 {
    let limit = usage.limit();
    let quota_fraction = if limit > 0 {
        usage.remaining() as f64 / limit as f64
    } else {
        0.0
    };
    let recent_penalty = (usage.recent_count as f64 / 100.0).min(1.0);
    0.7 * quota_fraction + 0.3 * (1.0 - recent_penalty)
}

/// Index of the best-scoring account with remaining quota. Ties keep the
/// earliest input (strict greater-than), so selection is stable. None means
/// every account is out of quota — exhausted, not an error.
pub fn select_best_idx(usages: &[AccountUsage]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (idx, usage) in usages.iter().enumerate() {
        if usage.remaining() <= 0 {
            continue;
        }
        let s = score(usage);
        match best {
            Some((_, best_score)) if s <= best_score => {}
            _ => best = Some((idx, s)),
        }
    }
    best.map(|(idx, _)| idx)
}

pub fn select_best(usages: &[AccountUsage]) -> Option<&AccountUsage> {
    select_best_idx(usages).map(|idx| &usages[idx])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::quota::usage_fixture;

    #[test]
    fn score_is_bounded() {
        let fresh = usage_fixture(200, 0, 0);
        assert!((score(&fresh) - 1.0).abs() < 1e-9);

        let spent = usage_fixture(200, 200, 500);
        assert!(score(&spent).abs() < 1e-9);
    }

    #[test]
    fn score_formula_weights() {
        // remaining 100/200 = 0.5, recent 50/100 penalty = 0.5
        let usage = usage_fixture(200, 100, 50);
        let expected = 0.7 * 0.5 + 0.3 * 0.5;
        assert!((score(&usage) - expected).abs() < 1e-9);
    }

    #[test]
    fn recent_penalty_saturates() {
        let a = usage_fixture(200, 0, 100);
        let b = usage_fixture(200, 0, 100_000);
        assert!((score(&a) - score(&b)).abs() < 1e-9);
    }

    #[test]
    fn select_best_prefers_most_headroom() {
        let usages = vec![
            usage_fixture(200, 150, 0),
            usage_fixture(200, 10, 0),
            usage_fixture(200, 180, 0),
        ];
        assert_eq!(select_best_idx(&usages), Some(1));
    }

    #[test]
    fn select_best_skips_exhausted() {
        let usages = vec![usage_fixture(200, 200, 0), usage_fixture(100, 50, 0)];
        assert_eq!(select_best_idx(&usages), Some(1));
    }

    #[test]
    fn select_best_none_iff_all_exhausted() {
        let usages = vec![usage_fixture(200, 200, 0), usage_fixture(100, 100, 0)];
        assert_eq!(select_best_idx(&usages), None);
        assert!(select_best(&[]).is_none());
    }

    #[test]
    fn select_best_ties_are_stable() {
        let usages = vec![
            usage_fixture(200, 0, 0),
            usage_fixture(200, 0, 0),
            usage_fixture(200, 0, 0),
        ];
        assert_eq!(select_best_idx(&usages), Some(0));
    }
}
