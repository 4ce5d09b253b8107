//! Normalized string similarity for the Auditor's fuzzy dedup pass:
//! lowercase, strip non-alphanumerics, then trigram Sorensen-Dice.
//! Deterministic and dependency-free.

use std::collections::HashSet;

pub const DUPLICATE_THRESHOLD: f64 = 0.8;

fn normalize(s: &str) -> String {
    s.chars().filter(|c| c.is_alphanumeric()).flat_map(char::to_lowercase).collect()
}

fn trigrams(s: &str) -> HashSet<String> {
    let chars: Vec<char> = s.chars().collect();
    if chars.len() < 3 {
        let mut set = HashSet::new();
        if !chars.is_empty() {
            set.insert(chars.iter().collect());
        }
        return set;
    }
    chars.windows(3).map(|w| w.iter().collect()).collect()
}

/// Sorensen-Dice coefficient of the two strings' trigram sets, after
/// normalization: `2 * |intersection| / (|A| + |B|)`. `1.0` for identical
/// normalized strings, `0.0` when they share no trigrams. Dice weighs a
/// shared trigram count against the *sum* of set sizes rather than their
/// union, so a short name fully contained in a longer one (e.g. "Avengers"
/// inside "The Avengers") scores higher than plain Jaccard would.
pub fn similarity(a: &str, b: &str) -> f64 {
    let norm_a = normalize(a);
    let norm_b = normalize(b);
    if norm_a == norm_b {
        return 1.0;
    }
    let set_a = trigrams(&norm_a);
    let set_b = trigrams(&norm_b);
    if set_a.is_empty() || set_b.is_empty() {
        return 0.0;
    }
    let intersection = set_a.intersection(&set_b).count();
    (2 * intersection) as f64 / (set_a.len() + set_b.len()) as f64
}

pub fn is_duplicate(a: &str, b: &str) -> bool {
    similarity(a, b) >= DUPLICATE_THRESHOLD
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_avengers_and_avengers_are_duplicates() {
        assert!(is_duplicate("The Avengers", "Avengers"));
    }

    #[test]
    fn unrelated_names_are_not_duplicates() {
        assert!(!is_duplicate("Sun", "Spacecraft Propulsion Systems"));
    }

    #[test]
    fn identical_strings_after_normalization_are_fully_similar() {
        assert_eq!(similarity("Earth!", "earth"), 1.0);
    }
}
