//! Fuzzy matching for misspelled configuration keys
//!
//! Uses Levenshtein distance to point users at the key they most likely meant
//! when a `cluster.yaml` contains an unknown field.

use strsim::levenshtein;

/// Maximum Levenshtein distance to consider for suggestions
const MAX_SUGGESTION_DISTANCE: usize = 3;

/// Suggestion result with its edit distance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Suggestion {
    /// The suggested correction
    pub text: String,
    /// Levenshtein distance (lower = better match)
    pub distance: usize,
}

/// Find the closest candidates to `input`, best match first
pub fn find_closest_matches(input: &str, candidates: &[&str], max_results: usize) -> Vec<Suggestion> {
    let mut suggestions: Vec<Suggestion> = candidates
        .iter()
        .filter_map(|&candidate| {
            // Case-only differences (vpcCidr vs vpcCIDR) are the most common typo
            let distance = if input.eq_ignore_ascii_case(candidate) && input != candidate {
                1
            } else {
                levenshtein(input, candidate)
            };
            (distance > 0 && distance <= MAX_SUGGESTION_DISTANCE).then(|| Suggestion {
                text: candidate.to_string(),
                distance,
            })
        })
        .collect();

    // Stable sort keeps candidate order among equal distances
    suggestions.sort_by_key(|s| s.distance);
    suggestions.truncate(max_results);
    suggestions
}

/// Suggest a known key for an unknown one
pub fn suggest_key(unknown: &str, known: &[&str]) -> Option<String> {
    find_closest_matches(unknown, known, 1)
        .into_iter()
        .next()
        .map(|s| format!("Did you mean `{}`?", s.text))
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEYS: &[&str] = &["availabilityZone", "instanceCIDR", "natGateway", "routeTable"];

    #[test]
    fn test_suggest_typo() {
        let suggestion = suggest_key("natGatway", KEYS).unwrap();
        assert_eq!(suggestion, "Did you mean `natGateway`?");
    }

    #[test]
    fn test_suggest_case_mismatch() {
        let matches = find_closest_matches("instanceCidr", KEYS, 3);
        assert_eq!(matches[0].text, "instanceCIDR");
        assert_eq!(matches[0].distance, 1);
    }

    #[test]
    fn test_no_suggestion_for_unrelated_key() {
        assert!(suggest_key("foo", KEYS).is_none());
        assert!(suggest_key("routeTable", KEYS).is_none());
    }
}
