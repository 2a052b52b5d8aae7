//! Regular expression matching over raw line bytes.
//!
//! A malformed pattern is a user error, not a failure of the buffer: it is
//! logged and the match simply does not happen.

use regex::bytes::Regex;
use std::ops::Range;

/// Maximum number of sub-matches returned by [`captures`], including the whole match
pub const MAX_SUBSTRINGS: usize = 8;

/// Compile a pattern, logging and discarding it if it is invalid
pub fn compile(pattern: &str) -> Option<Regex> {
    match Regex::new(pattern) {
        Ok(re) => Some(re),
        Err(e) => {
            tracing::warn!("Invalid regexp: {}: {}", pattern, e);
            None
        }
    }
}

/// Whether `pattern` matches anywhere in `haystack`
pub fn matches(pattern: &str, haystack: &[u8]) -> bool {
    compile(pattern).is_some_and(|re| re.is_match(haystack))
}

/// Byte range of the first match of `re` in `haystack`
pub fn find(re: &Regex, haystack: &[u8]) -> Option<Range<usize>> {
    re.find(haystack).map(|m| m.range())
}

/// The whole match followed by its capture groups, stopping at the first unmatched group
pub fn captures(pattern: &str, haystack: &[u8]) -> Option<Vec<Vec<u8>>> {
    let re = compile(pattern)?;
    let caps = re.captures(haystack)?;
    Some(
        caps.iter()
            .take(MAX_SUBSTRINGS)
            .map_while(|m| m.map(|m| m.as_bytes().to_vec()))
            .collect(),
    )
}
