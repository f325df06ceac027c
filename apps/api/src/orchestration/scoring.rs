//! Match-score extraction from free-text job-match analysis.

use std::sync::LazyLock;

use regex::Regex;

/// Tried in order; the first capture wins.
static SCORE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [r"(?i)score[:\s]+(\d+)", r"(\d+)%", r"(\d+)\s*/\s*100"]
        .iter()
        .map(|p| Regex::new(p).expect("Invalid score regex"))
        .collect()
});

/// Returns the first score mentioned in `analysis`, clamped to 100, or 0 when none is found.
pub fn extract_match_score(analysis: &str) -> u32 {
    SCORE_PATTERNS
        .iter()
        .find_map(|re| {
            re.captures(analysis)
                .and_then(|caps| caps.get(1))
                .and_then(|m| m.as_str().parse::<u32>().ok())
        })
        .map(|score| score.min(100))
        .unwrap_or(0)
}
