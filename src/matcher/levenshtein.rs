//! Levenshtein edit distance.
//!
//! Feeds the fuzzy matcher's edit-distance score. Works on chars, so
//! multi-byte text is measured the way a reader would count it.

/// Inputs longer than this get a pessimistic estimate instead of the O(m*n) table.
const MAX_INPUT_CHARS: usize = 10_000;

/// Minimum number of single-char insertions, deletions and substitutions
/// turning `a` into `b`.
///
/// Oversized inputs return `max(m, n)` without building the table.
pub fn distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    distance_chars(&a, &b)
}

fn distance_chars(a: &[char], b: &[char]) -> usize {
    let (m, n) = (a.len(), b.len());
    if m == 0 || n == 0 {
        return m.max(n);
    }
    if m > MAX_INPUT_CHARS || n > MAX_INPUT_CHARS {
        return m.max(n);
    }

    // Two rolling rows over the shorter axis.
    let (long, short) = if m >= n { (a, b) } else { (b, a) };
    let mut prev: Vec<usize> = (0..=short.len()).collect();
    let mut curr = vec![0usize; short.len() + 1];

    for (i, lc) in long.iter().enumerate() {
        curr[0] = i + 1;
        for (j, sc) in short.iter().enumerate() {
            let cost = usize::from(lc != sc);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[short.len()]
}

/// `1 - distance / max_len`, in `0.0..=1.0`. Two empty strings are identical.
pub fn similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let max_len = a.len().max(b.len());
    if max_len == 0 {
        return 1.0;
    }
    1.0 - distance_chars(&a, &b) as f64 / max_len as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical() {
        assert_eq!(distance("hello", "hello"), 0);
        assert!((similarity("hello", "hello") - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_empty() {
        assert_eq!(distance("", "abc"), 3);
        assert_eq!(distance("abc", ""), 3);
        assert_eq!(distance("", ""), 0);
        assert!((similarity("", "") - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_classic() {
        assert_eq!(distance("kitten", "sitting"), 3);
        assert_eq!(distance("sitting", "kitten"), 3);
    }

    #[test]
    fn test_transposition_costs_two() {
        assert_eq!(distance("recieve", "receive"), 2);
        let s = similarity("recieve", "receive");
        assert!(s > 0.7 && s < 0.72, "got {s}");
    }

    #[test]
    fn test_counts_chars_not_bytes() {
        assert_eq!(distance("héllo", "hello"), 1);
        assert!((similarity("héllo", "hello") - 0.8).abs() < 1e-9);
    }
}
