#![forbid(unsafe_code)]

//! Longest increasing subsequence over sparse old-position tables.

/// Indices (ascending) of one longest strictly increasing subsequence of the
/// `Some` entries of `seq`. `None` entries never participate.
///
/// Patience sorting with predecessor links: O(n log n) time, O(n) space.
#[must_use]
pub fn longest_increasing_subsequence(seq: &[Option<usize>]) -> Vec<usize> {
    // tails[k]: index in `seq` of the smallest tail of an increasing run of length k + 1.
    let mut tails: Vec<usize> = Vec::new();
    let mut tail_values: Vec<usize> = Vec::new();
    let mut predecessor: Vec<Option<usize>> = vec![None; seq.len()];

    for (i, entry) in seq.iter().enumerate() {
        let Some(value) = *entry else {
            continue;
        };
        let k = tail_values.partition_point(|&t| t < value);
        if k > 0 {
            predecessor[i] = Some(tails[k - 1]);
        }
        if k == tails.len() {
            tails.push(i);
            tail_values.push(value);
        } else {
            tails[k] = i;
            tail_values[k] = value;
        }
    }

    let mut out = Vec::with_capacity(tails.len());
    let mut cursor = tails.last().copied();
    while let Some(i) = cursor {
        out.push(i);
        cursor = predecessor[i];
    }
    out.reverse();
    out
}
