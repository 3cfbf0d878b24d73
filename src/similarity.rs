//! String-similarity primitives shared by the entity normalizer and the
//! fund-flow matcher.

/// Business suffixes stripped before names are compared, so that
/// "SHARMA TRADERS" and "SHARMA TRDG" resolve to the same counterparty.
pub const LEGAL_SUFFIXES: &[&str] = &[
    "TRADERS",
    "TRDG",
    "TRD",
    "AGENCIES",
    "AGY",
    "ENTERPRISES",
    "ENTP",
    "SERVICES",
    "SRV",
    "SOLUTIONS",
    "SOLN",
    "PVT",
    "LTD",
    "LIMITED",
    "CORP",
    "CORPORATION",
    "INC",
    "COMPANY",
    "CO",
    "HOLDINGS",
    "INDUSTRIES",
];

pub fn levenshtein_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0usize; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = if ca == cb { 0 } else { 1 };
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

/// Levenshtein distance normalized to a [0,1] similarity ratio.
pub fn levenshtein_ratio(a: &str, b: &str) -> f64 {
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    1.0 - levenshtein_distance(a, b) as f64 / max_len as f64
}

/// Jaccard overlap of the word sets of two names.
pub fn word_jaccard(a: &str, b: &str) -> f64 {
    let words_a: std::collections::HashSet<&str> = a.split_whitespace().collect();
    let words_b: std::collections::HashSet<&str> = b.split_whitespace().collect();

    if words_a.is_empty() || words_b.is_empty() {
        return 0.0;
    }

    let intersection = words_a.intersection(&words_b).count();
    let union = words_a.union(&words_b).count();
    intersection as f64 / union as f64
}

/// Length-ratio boost when one name contains the other
/// ("RAVI" inside "RAVI KUMAR").
pub fn containment_ratio(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a.contains(b) || b.contains(a) {
        let (short, long) = if a.len() <= b.len() { (a, b) } else { (b, a) };
        short.len() as f64 / long.len() as f64
    } else {
        0.0
    }
}

/// Reduces a display name to the form used for similarity comparison:
/// uppercase, punctuation and digits collapsed to spaces, legal suffixes
/// removed. Digits are dropped from the comparison key only; display names
/// keep them.
pub fn comparison_key(name: &str) -> String {
    let upper = name.to_uppercase();
    let cleaned: String = upper
        .chars()
        .map(|c| if c.is_ascii_alphabetic() { c } else { ' ' })
        .collect();

    let without_suffixes: Vec<&str> = cleaned
        .split_whitespace()
        .filter(|w| !LEGAL_SUFFIXES.contains(w))
        .collect();

    without_suffixes.join(" ")
}

/// Composite similarity in [0,1]: the best of edit-distance ratio, word
/// overlap, and containment, computed over comparison keys. Taking the max of
/// the three mirrors how short aliases, reordered words, and typos each need
/// a different measure to catch them.
pub fn name_similarity(a: &str, b: &str) -> f64 {
    let key_a = comparison_key(a);
    let key_b = comparison_key(b);

    if key_a.is_empty() || key_b.is_empty() {
        return 0.0;
    }
    if key_a == key_b {
        return 1.0;
    }

    levenshtein_ratio(&key_a, &key_b)
        .max(word_jaccard(&key_a, &key_b))
        .max(containment_ratio(&key_a, &key_b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levenshtein_distance() {
        assert_eq!(levenshtein_distance("kitten", "sitting"), 3);
        assert_eq!(levenshtein_distance("", "abc"), 3);
        assert_eq!(levenshtein_distance("abc", "abc"), 0);
    }

    #[test]
    fn test_levenshtein_ratio_bounds() {
        assert_eq!(levenshtein_ratio("", ""), 1.0);
        assert_eq!(levenshtein_ratio("abc", "abc"), 1.0);
        assert_eq!(levenshtein_ratio("abc", "xyz"), 0.0);
    }

    #[test]
    fn test_comparison_key_strips_suffixes_and_digits() {
        assert_eq!(comparison_key("Sharma Traders Pvt Ltd"), "SHARMA");
        assert_eq!(comparison_key("STORE 42 BRANCH"), "STORE BRANCH");
        assert_eq!(comparison_key("john.doe@okaxis"), "JOHN DOE OKAXIS");
    }

    #[test]
    fn test_case_and_spacing_insensitive() {
        assert_eq!(name_similarity("JohnDoe", "JOHNDOE"), 1.0);
        assert!(name_similarity("John Doe", "JOHN DOE") > 0.99);
    }

    #[test]
    fn test_similar_names_cross_default_threshold() {
        assert!(name_similarity("RAVI KUMAR", "RAVI KUMARR") >= 0.75);
        assert!(name_similarity("SHARMA TRADERS", "SHARMA TRDG") >= 0.75);
        assert!(name_similarity("AMAZON", "AMAZON SERVICES") >= 0.75);
    }

    #[test]
    fn test_unrelated_names_stay_below_threshold() {
        assert!(name_similarity("RAVI KUMAR", "GROCERY MART") < 0.5);
        assert!(name_similarity("AMAZON", "ZOMATO") < 0.75);
    }

    #[test]
    fn test_branch_numbers_compare_equal() {
        // Numbers stay in the display string but are ignored for comparison.
        assert_eq!(name_similarity("STORE 42", "STORE 17"), 1.0);
    }

    #[test]
    fn test_word_jaccard_reordering() {
        assert_eq!(word_jaccard("KUMAR RAVI", "RAVI KUMAR"), 1.0);
    }

    #[test]
    fn test_similarity_bounds() {
        let pairs = [
            ("", ""),
            ("A", "ZZZZZZZZ"),
            ("RAVI", "RAVI"),
            ("123", "456"),
        ];
        for (a, b) in pairs {
            let s = name_similarity(a, b);
            assert!((0.0..=1.0).contains(&s), "similarity({a:?},{b:?}) = {s}");
        }
    }
}
