/// Levenshtein edit distance over Unicode scalar values, unit cost for
/// insertion, deletion and substitution.
///
/// Uses the two-row formulation of the full dynamic-programming table, so
/// memory is O(min(m, n)) while the result is identical.
pub fn levenshtein(s1: &str, s2: &str) -> usize {
    let a: Vec<char> = s1.chars().collect();
    let b: Vec<char> = s2.chars().collect();

    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    // Shorter string drives the row width.
    let (a, b) = if a.len() >= b.len() { (a, b) } else { (b, a) };
    let n = b.len();

    let mut prev: Vec<usize> = (0..=n).collect();
    let mut curr = vec![0usize; n + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[n]
}
