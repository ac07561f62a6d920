//! Greedy non-maximum suppression.

use std::cmp::Ordering;

use super::preset::SuppressionPolicy;
use super::result::Candidate;

/// Indices into `candidates` of the boxes that survive suppression, in
/// acceptance order (highest confidence first, first-seen wins on ties).
pub fn suppress_indices(
    candidates: &[Candidate],
    iou_threshold: f32,
    policy: SuppressionPolicy,
) -> Vec<usize> {
    if candidates.is_empty() {
        return Vec::new();
    }

    let mut order: Vec<usize> = (0..candidates.len()).collect();
    // `sort_by` is stable, so equal confidences keep input order.
    order.sort_by(|&a, &b| by_confidence_desc(&candidates[a], &candidates[b]));

    let mut suppressed = vec![false; candidates.len()];
    let mut keep = Vec::new();
    for (pos, &idx) in order.iter().enumerate() {
        if suppressed[idx] {
            continue;
        }
        keep.push(idx);
        let accepted = &candidates[idx];
        for &other in &order[pos + 1..] {
            if suppressed[other] {
                continue;
            }
            let rival = &candidates[other];
            if policy == SuppressionPolicy::PerClass && rival.class_id != accepted.class_id {
                continue;
            }
            if accepted.bbox.iou(&rival.bbox) > iou_threshold {
                suppressed[other] = true;
            }
        }
    }
    keep
}

/// Surviving candidates, in acceptance order.
pub fn suppress(
    candidates: &[Candidate],
    iou_threshold: f32,
    policy: SuppressionPolicy,
) -> Vec<Candidate> {
    suppress_indices(candidates, iou_threshold, policy)
        .into_iter()
        .map(|idx| candidates[idx])
        .collect()
}

fn by_confidence_desc(a: &Candidate, b: &Candidate) -> Ordering {
    // NaN confidences sort last.
    match (a.confidence.is_nan(), b.confidence.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => b
            .confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(Ordering::Equal),
    }
}
