use std::cmp::Ordering;
use std::collections::HashSet;

use crate::queue::Candidate;
use crate::NodeId;

/// Top-`cap` by distance to the target, ties broken by smaller id (spec
/// §4.5 "Simple").
pub fn select_simple(mut candidates: Vec<Candidate>, cap: usize) -> Vec<NodeId> {
    candidates.sort_unstable_by(|a, b| {
        a.distance
            .partial_cmp(&b.distance)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
    candidates.truncate(cap);
    candidates.into_iter().map(|c| c.id).collect()
}

/// Paper Algorithm 4's relative-neighborhood pruning (spec §4.5
/// "Heuristic"). The spec's prose gloss ("push `e` to `R` if `d(e,q) <
/// max d(r,q) for r∈R`") is a lossy compression of the named source
/// algorithm; this follows Algorithm 4 proper — a candidate is
/// disadvantaged (sent to `Wd`) when it sits closer to an already-chosen
/// result than to the target, which is what produces the diversity the
/// heuristic exists for (plain distance-to-target thresholding would just
/// reduce to `select_simple`). Grounded in `instant-distance`'s
/// `select_heuristic`.
///
/// `dist_to_target(id)` and `dist_between(a, b)` are kept separate
/// because candidates pulled in by `extend_candidates` only have a
/// distance-to-target computed on demand, while the pruning test needs
/// pairwise distances among already-picked results.
pub fn select_heuristic<FT, FB, FN>(
    candidates: Vec<Candidate>,
    cap: usize,
    extend_candidates: bool,
    keep_pruned_connections: bool,
    dist_to_target: FT,
    dist_between: FB,
    neighbors_of: FN,
) -> Vec<NodeId>
where
    FT: Fn(NodeId) -> f64,
    FB: Fn(NodeId, NodeId) -> f64,
    FN: Fn(NodeId) -> Vec<NodeId>,
{
    let mut working = candidates.clone();

    if extend_candidates {
        let mut seen: HashSet<NodeId> = candidates.iter().map(|c| c.id).collect();
        for c in &candidates {
            for n in neighbors_of(c.id) {
                if seen.insert(n) {
                    working.push(Candidate {
                        id: n,
                        distance: dist_to_target(n),
                    });
                }
            }
        }
    }

    working.sort_unstable_by(|a, b| {
        a.distance
            .partial_cmp(&b.distance)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });

    let mut result: Vec<NodeId> = Vec::with_capacity(cap);
    let mut discarded: Vec<Candidate> = Vec::new();

    for cand in working {
        if result.len() >= cap {
            break;
        }
        let disadvantaged = result
            .iter()
            .any(|&r| dist_between(cand.id, r) < cand.distance);
        if disadvantaged {
            discarded.push(cand);
        } else {
            result.push(cand.id);
        }
    }

    if keep_pruned_connections {
        for cand in discarded {
            if result.len() >= cap {
                break;
            }
            result.push(cand.id);
        }
    }

    result
}
