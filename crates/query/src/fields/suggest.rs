//! Typo-tolerant suggestions for unknown names.

/// Default number of suggestions.
pub const DEFAULT_SUGGESTIONS: usize = 3;

/// Default minimum similarity for a suggestion.
pub const DEFAULT_CUTOFF: f64 = 0.4;

/// Levenshtein distance over characters.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut cur = vec![0usize; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        cur[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            cur[j + 1] = (prev[j + 1] + 1).min(cur[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut cur);
    }
    prev[b.len()]
}

/// Similarity in `[0, 1]`, case-insensitive.
pub fn similarity(a: &str, b: &str) -> f64 {
    let a = a.to_lowercase();
    let b = b.to_lowercase();
    let longest = a.chars().count().max(b.chars().count());
    if longest == 0 {
        return 1.0;
    }
    1.0 - levenshtein(&a, &b) as f64 / longest as f64
}

/// Returns up to `n` options closest to `unknown`, best first.
///
/// Options scoring below `cutoff` are dropped. Ties keep option order.
pub fn suggestions<'a, I>(unknown: &str, options: I, n: usize, cutoff: f64) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut scored: Vec<(f64, &str)> = Vec::new();
    for option in options {
        if option.is_empty() || scored.iter().any(|(_, seen)| *seen == option) {
            continue;
        }
        let score = similarity(unknown, option);
        if score >= cutoff {
            scored.push((score, option));
        }
    }
    scored.sort_by(|a, b| b.0.total_cmp(&a.0));
    scored
        .into_iter()
        .take(n)
        .map(|(_, option)| option.to_string())
        .collect()
}

/// Appends suggestions to a message, if there are any.
pub fn with_suggestions(prefix: &str, suggestions: &[String]) -> String {
    if suggestions.is_empty() {
        prefix.to_string()
    } else {
        format!("{} Perhaps you meant: {}", prefix, suggestions.join(", "))
    }
}
