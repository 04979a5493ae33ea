use super::Candidate;

/// Number of candidate pairs whose discs overlap (see [`Candidate::overlaps`]).
pub fn count_overlapping_pairs(candidates: &[Candidate]) -> usize {
    let mut pairs = 0;
    for i in 0..candidates.len() {
        for j in (i + 1)..candidates.len() {
            if candidates[i].overlaps(&candidates[j]) {
                pairs += 1;
            }
        }
    }
    pairs
}

/// Drop later candidates that overlap an earlier kept one.
///
/// Primary detections precede fallback ones in the list, so circle-transform
/// results win over contour results.
pub fn merge_overlapping(candidates: Vec<Candidate>) -> Vec<Candidate> {
    let mut keep = vec![true; candidates.len()];

    for i in 0..candidates.len() {
        if !keep[i] {
            continue;
        }
        for j in (i + 1)..candidates.len() {
            if keep[j] && candidates[i].overlaps(&candidates[j]) {
                keep[j] = false;
            }
        }
    }

    candidates
        .into_iter()
        .enumerate()
        .filter_map(|(index, c)| keep[index].then_some(c))
        .collect()
}
