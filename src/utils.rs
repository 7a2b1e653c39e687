use std::collections::HashSet;
use std::hash::Hash;

use crate::config::MISSING_TOKENS;

/// Items of `left` that also occur in `right`, in the order of `left`
pub fn ordered_intersection<T: Clone + Eq + Hash>(left: &[T], right: &[T]) -> Vec<T> {
    let right = right.iter().collect::<HashSet<_>>();
    let mut seen = HashSet::new();
    left.iter()
        .filter(|item| right.contains(item) && seen.insert(*item))
        .cloned()
        .collect()
}

/// Number of positions where both series are present
pub fn count_common_values(x: &[f64], y: &[f64]) -> usize {
    x.iter()
        .zip(y.iter())
        .filter(|(a, b)| !a.is_nan() && !b.is_nan())
        .count()
}

pub fn is_missing_token(token: &str) -> bool {
    let token = token.trim();
    token.is_empty() || MISSING_TOKENS.contains(&token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordered_intersection() {
        let left = vec!["c", "a", "b", "a"];
        let right = vec!["a", "c", "d"];
        assert_eq!(ordered_intersection(&left, &right), vec!["c", "a"]);
    }

    #[test]
    fn test_count_common_values() {
        let x = [1.0, f64::NAN, 3.0, 4.0];
        let y = [1.0, 2.0, f64::NAN, 4.0];
        assert_eq!(count_common_values(&x, &y), 2);
    }

    #[test]
    fn test_missing_tokens() {
        for token in ["na", "NA", "NAN", "nan", "NaN", "Na", ""] {
            assert!(is_missing_token(token));
        }
        assert!(!is_missing_token("nA"));
        assert!(!is_missing_token("1.5"));
    }
}
