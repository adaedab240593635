//! Merging directional alignments into one symmetric set.
//!
//! All heuristics share the same pair-set plumbing: build the intersection
//! and union of the two directions, then optionally grow the intersection
//! along the 8-neighbourhood of accepted pairs (explicit worklist) and
//! finish with a final-and pass that only admits pairs whose endpoints are
//! both still unaligned.

use std::collections::VecDeque;
use std::str::FromStr;

use hashbrown::HashSet;

use crate::errors::{AlignError, Result};
use crate::types::{Link, NULL_LINK};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Heuristic {
    /// Pairs agreed on by both directions.
    Intersection,
    /// All pairs from either direction.
    Union,
    /// Intersection grown along neighbours of accepted pairs.
    GrowDiag,
    /// Grow-diag followed by the final-and pass.
    #[default]
    GrowDiagFinalAnd,
}

impl FromStr for Heuristic {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, String> {
        match s {
            "intersection" => Ok(Heuristic::Intersection),
            "union" => Ok(Heuristic::Union),
            "grow-diag" => Ok(Heuristic::GrowDiag),
            "grow-diag-final-and" => Ok(Heuristic::GrowDiagFinalAnd),
            other => Err(format!(
                "unknown heuristic {other:?} (expected intersection, union, \
                 grow-diag or grow-diag-final-and)"
            )),
        }
    }
}

/// Symmetrize two directional link mappings for one sentence pair.
///
/// `forward` maps each target position to a source position (or `NULL_LINK`);
/// `reverse` maps each source position to a target position. The mapping
/// lengths must match the sentence lengths or the directions were run on
/// inconsistent inputs.
pub fn symmetrize_links(
    forward: &[Link],
    reverse: &[Link],
    src_len: usize,
    tgt_len: usize,
    heuristic: Heuristic,
) -> Result<Vec<(Link, Link)>> {
    if forward.len() != tgt_len {
        return Err(AlignError::DirectionMismatch {
            detail: format!(
                "forward alignment length {} != target length {}",
                forward.len(),
                tgt_len
            ),
        });
    }
    if reverse.len() != src_len {
        return Err(AlignError::DirectionMismatch {
            detail: format!(
                "reverse alignment length {} != source length {}",
                reverse.len(),
                src_len
            ),
        });
    }

    let mut fwd_pairs = Vec::new();
    for (j, &i) in forward.iter().enumerate() {
        if i != NULL_LINK {
            fwd_pairs.push((i, j as Link));
        }
    }
    let mut rev_pairs = Vec::new();
    for (i, &j) in reverse.iter().enumerate() {
        if j != NULL_LINK {
            rev_pairs.push((i as Link, j));
        }
    }
    symmetrize_pairs(&fwd_pairs, &rev_pairs, src_len, tgt_len, heuristic)
}

/// Symmetrize two explicit (source, target) pair sets. Output is sorted by
/// source then target position.
pub fn symmetrize_pairs(
    fwd: &[(Link, Link)],
    rev: &[(Link, Link)],
    src_len: usize,
    tgt_len: usize,
    heuristic: Heuristic,
) -> Result<Vec<(Link, Link)>> {
    for &(i, j) in fwd.iter().chain(rev.iter()) {
        if i as usize >= src_len || j as usize >= tgt_len {
            return Err(AlignError::DirectionMismatch {
                detail: format!(
                    "link {i}-{j} out of bounds for a {src_len}x{tgt_len} sentence pair"
                ),
            });
        }
    }

    let s_fw: HashSet<(usize, usize)> = fwd.iter().map(|&(i, j)| (i as usize, j as usize)).collect();
    let s_rev: HashSet<(usize, usize)> =
        rev.iter().map(|&(i, j)| (i as usize, j as usize)).collect();
    let union: HashSet<(usize, usize)> = s_fw.union(&s_rev).copied().collect();
    let mut accepted: HashSet<(usize, usize)> = s_fw.intersection(&s_rev).copied().collect();

    match heuristic {
        Heuristic::Intersection => {}
        Heuristic::Union => accepted = union.clone(),
        Heuristic::GrowDiag => {
            grow_diag(&mut accepted, &union, src_len, tgt_len);
        }
        Heuristic::GrowDiagFinalAnd => {
            let mut src_aligned = vec![false; src_len];
            let mut tgt_aligned = vec![false; tgt_len];
            grow_diag_tracked(&mut accepted, &union, &mut src_aligned, &mut tgt_aligned);
            final_and(&mut accepted, &s_fw, &mut src_aligned, &mut tgt_aligned);
            final_and(&mut accepted, &s_rev, &mut src_aligned, &mut tgt_aligned);
        }
    }

    let mut pairs: Vec<(Link, Link)> = accepted
        .into_iter()
        .map(|(i, j)| (i as Link, j as Link))
        .collect();
    pairs.sort_unstable();
    Ok(pairs)
}

fn grow_diag(
    accepted: &mut HashSet<(usize, usize)>,
    union: &HashSet<(usize, usize)>,
    src_len: usize,
    tgt_len: usize,
) {
    let mut src_aligned = vec![false; src_len];
    let mut tgt_aligned = vec![false; tgt_len];
    grow_diag_tracked(accepted, union, &mut src_aligned, &mut tgt_aligned);
}

/// Worklist expansion of the accepted set: pop a pair, examine its 8
/// neighbours, and adopt any union pair with an unaligned endpoint. Newly
/// adopted pairs re-enter the queue until no frontier remains.
fn grow_diag_tracked(
    accepted: &mut HashSet<(usize, usize)>,
    union: &HashSet<(usize, usize)>,
    src_aligned: &mut [bool],
    tgt_aligned: &mut [bool],
) {
    for &(i, j) in accepted.iter() {
        src_aligned[i] = true;
        tgt_aligned[j] = true;
    }

    let mut queue: VecDeque<(usize, usize)> = accepted.iter().copied().collect();
    while let Some((i, j)) = queue.pop_front() {
        for di in -1isize..=1 {
            for dj in -1isize..=1 {
                if di == 0 && dj == 0 {
                    continue;
                }
                let ni = i as isize + di;
                let nj = j as isize + dj;
                if ni < 0 || nj < 0 {
                    continue;
                }
                let pair = (ni as usize, nj as usize);
                if pair.0 >= src_aligned.len() || pair.1 >= tgt_aligned.len() {
                    continue;
                }
                if !accepted.contains(&pair)
                    && union.contains(&pair)
                    && (!src_aligned[pair.0] || !tgt_aligned[pair.1])
                {
                    accepted.insert(pair);
                    src_aligned[pair.0] = true;
                    tgt_aligned[pair.1] = true;
                    queue.push_back(pair);
                }
            }
        }
    }
}

/// Adopt remaining directional pairs only when both endpoints are still
/// unaligned (the "and" variant).
fn final_and(
    accepted: &mut HashSet<(usize, usize)>,
    candidates: &HashSet<(usize, usize)>,
    src_aligned: &mut [bool],
    tgt_aligned: &mut [bool],
) {
    for &(i, j) in candidates {
        if !accepted.contains(&(i, j)) && !src_aligned[i] && !tgt_aligned[j] {
            accepted.insert((i, j));
            src_aligned[i] = true;
            tgt_aligned[j] = true;
        }
    }
}
