
use std::collections::HashSet;
use tracing::debug;

/// Minimum score below which no candidate is considered a match.
const MATCH_THRESHOLD: f64 = 0.3;

/// Anything with a display name can be fuzzily resolved.
pub trait Named {
    fn match_name(&self) -> &str;
}

impl Named for String {
    #[inline]
    fn match_name(&self) -> &str {
        self
    }
}

/// Resolve a free-text name (course, assignment, group) to the best-matching
/// candidate. Exact case-insensitive matches beat substring containment,
/// which beats token overlap; ties resolve to the earliest candidate.
#[inline]
pub fn resolve_best_match<'a, T: Named>(query: &str, candidates: &'a [T]) -> Option<&'a T> {
    let mut best: Option<(&T, f64)> = None;

    for candidate in candidates {
        let score = match_score(query, candidate.match_name());
        if score >= MATCH_THRESHOLD && best.is_none_or(|(_, s)| score > s) {
            best = Some((candidate, score));
        }
    }

    if let Some((candidate, score)) = best {
        debug!(
            "Resolved '{}' to '{}' (score {:.2})",
            query,
            candidate.match_name(),
            score
        );
        Some(candidate)
    } else {
        debug!("No candidate matched '{}'", query);
        None
    }
}

/// Score the similarity of a query against one candidate name, in `[0, 1]`.
#[inline]
pub fn match_score(query: &str, name: &str) -> f64 {
    let query_lower = query.trim().to_lowercase();
    let name_lower = name.trim().to_lowercase();

    if query_lower.is_empty() || name_lower.is_empty() {
        return 0.0;
    }
    if query_lower == name_lower {
        return 1.0;
    }
    if name_lower.contains(&query_lower) || query_lower.contains(&name_lower) {
        return 0.8;
    }

    // Token overlap over the query's tokens, so short queries against long
    // titles still score well.
    let query_tokens: HashSet<&str> = query_lower.split_whitespace().collect();
    let name_tokens: HashSet<&str> = name_lower.split_whitespace().collect();
    if query_tokens.is_empty() {
        return 0.0;
    }

    let overlap = query_tokens.intersection(&name_tokens).count();
    0.6 * (overlap as f64 / query_tokens.len() as f64)
}
