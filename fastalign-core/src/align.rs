//! End-to-end alignment runs: train, decode both directions, symmetrize.

use rayon::prelude::*;
use tracing::{info, warn};

use crate::errors::{AlignError, Result};
use crate::model::{Model, TrainOptions};
use crate::symmetrize::{symmetrize_links, symmetrize_pairs, Heuristic};
use crate::text::Corpus;
use crate::types::{Count, Link};
use crate::viterbi::decode_scored;

/// What to do when a single sentence pair fails during decoding or
/// symmetrization. Training errors always abort the whole run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ErrorPolicy {
    /// Fail the whole batch on the first per-pair error.
    #[default]
    FailFast,
    /// Discard the failing pair (it produces an empty alignment) and log a
    /// warning, keeping the output line count intact.
    PerPair,
}

#[derive(Clone, Debug, Default)]
pub struct AlignOptions {
    pub train: TrainOptions,
    pub heuristic: Heuristic,
    pub error_policy: ErrorPolicy,
}

/// One direction's decoded alignments. Rows of `links` are indexed by target
/// position in forward runs and by source position in reverse runs.
#[derive(Clone, Debug)]
pub struct DirectionalAlignments {
    pub links: Vec<Vec<Link>>,
    pub scores: Vec<Count>,
}

#[derive(Clone, Debug)]
pub struct BidirectionalAlignments {
    pub forward: DirectionalAlignments,
    pub reverse: DirectionalAlignments,
    pub symmetrized: Vec<Vec<(Link, Link)>>,
}

/// Train one direction and decode every sentence pair with it.
pub fn align_direction(
    corpus: &Corpus,
    reverse: bool,
    opts: &TrainOptions,
) -> Result<DirectionalAlignments> {
    let model = Model::train(corpus, reverse, opts)?;
    info!(
        reverse,
        tension = model.tension,
        pairs = corpus.len(),
        "decoding corpus"
    );
    let decoded: Vec<(Vec<Link>, Count)> = corpus
        .pairs
        .par_iter()
        .map(|pair| {
            if reverse {
                decode_scored(&model, &pair.target, &pair.source)
            } else {
                decode_scored(&model, &pair.source, &pair.target)
            }
        })
        .collect();

    check_output_count(decoded.len(), corpus.len())?;
    let (links, scores) = decoded.into_iter().unzip();
    Ok(DirectionalAlignments { links, scores })
}

/// Run both directions over the corpus and symmetrize each pair.
pub fn align_bidirectional(
    corpus: &Corpus,
    opts: &AlignOptions,
) -> Result<BidirectionalAlignments> {
    let forward = align_direction(corpus, false, &opts.train)?;
    let reverse = align_direction(corpus, true, &opts.train)?;

    let symmetrized: Vec<Vec<(Link, Link)>> = corpus
        .pairs
        .par_iter()
        .enumerate()
        .map(|(idx, pair)| {
            let merged = symmetrize_links(
                &forward.links[idx],
                &reverse.links[idx],
                pair.source.len(),
                pair.target.len(),
                opts.heuristic,
            );
            resolve_pair(idx, merged, opts.error_policy)
        })
        .collect::<Result<_>>()?;

    check_output_count(symmetrized.len(), corpus.len())?;
    Ok(BidirectionalAlignments {
        forward,
        reverse,
        symmetrized,
    })
}

/// Symmetrize two already-decoded alignment files (pair sets per line).
/// Sentence lengths are taken as the smallest bounds covering both sets.
pub fn merge_alignments(
    fwd: &[Vec<(Link, Link)>],
    rev: &[Vec<(Link, Link)>],
    heuristic: Heuristic,
    policy: ErrorPolicy,
) -> Result<Vec<Vec<(Link, Link)>>> {
    if fwd.len() != rev.len() {
        return Err(AlignError::DirectionMismatch {
            detail: format!(
                "forward file has {} sentence pairs, reverse file has {}",
                fwd.len(),
                rev.len()
            ),
        });
    }

    let merged: Vec<Vec<(Link, Link)>> = fwd
        .iter()
        .zip(rev.iter())
        .enumerate()
        .map(|(idx, (f, r))| {
            let (src_len, tgt_len) = covering_lengths(f, r);
            let out = symmetrize_pairs(f, r, src_len, tgt_len, heuristic);
            resolve_pair(idx, out, policy)
        })
        .collect::<Result<_>>()?;

    check_output_count(merged.len(), fwd.len())?;
    Ok(merged)
}

fn covering_lengths(f: &[(Link, Link)], r: &[(Link, Link)]) -> (usize, usize) {
    let mut src_len = 0;
    let mut tgt_len = 0;
    for &(i, j) in f.iter().chain(r.iter()) {
        src_len = src_len.max(i as usize + 1);
        tgt_len = tgt_len.max(j as usize + 1);
    }
    (src_len, tgt_len)
}

fn resolve_pair(
    idx: usize,
    outcome: Result<Vec<(Link, Link)>>,
    policy: ErrorPolicy,
) -> Result<Vec<(Link, Link)>> {
    match outcome {
        Ok(pairs) => Ok(pairs),
        Err(err) => match policy {
            ErrorPolicy::FailFast => Err(err),
            ErrorPolicy::PerPair => {
                warn!(pair = idx, error = %err, "discarding sentence pair");
                Ok(Vec::new())
            }
        },
    }
}

fn check_output_count(produced: usize, expected: usize) -> Result<()> {
    if produced != expected {
        return Err(AlignError::OutputCountMismatch { produced, expected });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text::{parse_bitext, write_moses_pairs, MalformedPolicy};

    fn load(bitext: &str) -> Corpus {
        parse_bitext(bitext, MalformedPolicy::Fail).unwrap()
    }

    #[test]
    fn the_house_gets_fully_aligned() {
        let corpus = load(
            "the house ||| la maison\nthe ||| la\nhouse ||| maison\nthe house ||| la maison\n",
        );
        let result = align_bidirectional(&corpus, &AlignOptions::default()).unwrap();
        let first = &result.symmetrized[0];
        assert!(first.contains(&(0, 0)), "got {first:?}");
        assert!(first.contains(&(1, 1)), "got {first:?}");
    }

    #[test]
    fn output_count_matches_input_count() {
        let corpus = load(&"a b ||| a b\n".repeat(100));
        let result = align_bidirectional(&corpus, &AlignOptions::default()).unwrap();
        assert_eq!(result.symmetrized.len(), 100);
        assert_eq!(result.forward.links.len(), 100);
        assert_eq!(result.reverse.scores.len(), 100);
        let rendered = write_moses_pairs(&result.symmetrized);
        assert_eq!(rendered.lines().count(), 100);

        let single = load("a ||| a\n");
        let result = align_bidirectional(&single, &AlignOptions::default()).unwrap();
        assert_eq!(result.symmetrized.len(), 1);
    }

    #[test]
    fn empty_corpus_fails_with_empty_corpus_error() {
        let corpus = load("");
        let err = align_bidirectional(&corpus, &AlignOptions::default()).unwrap_err();
        assert!(matches!(err, AlignError::EmptyCorpus));
    }

    #[test]
    fn empty_sided_pairs_produce_empty_alignments() {
        let corpus = load("a b ||| a b\n||| a b\na b |||\n");
        let result = align_bidirectional(&corpus, &AlignOptions::default()).unwrap();
        assert_eq!(result.symmetrized.len(), 3);
        assert!(result.symmetrized[1].is_empty());
        assert!(result.symmetrized[2].is_empty());
    }

    #[test]
    fn intersection_is_subset_of_symmetrized_output() {
        let corpus = load("the house ||| la maison\nthe ||| la\nhouse ||| maison\n");
        let gdfa = align_bidirectional(&corpus, &AlignOptions::default()).unwrap();
        let inter = align_bidirectional(
            &corpus,
            &AlignOptions {
                heuristic: Heuristic::Intersection,
                ..AlignOptions::default()
            },
        )
        .unwrap();
        for (strict, grown) in inter.symmetrized.iter().zip(&gdfa.symmetrized) {
            for pair in strict {
                assert!(grown.contains(pair), "{pair:?} missing from {grown:?}");
            }
        }
    }

    #[test]
    fn reverse_run_is_the_structural_transpose() {
        let corpus = load("the house ||| la maison\nthe ||| la\nhouse ||| maison\n");
        let swapped = load("la maison ||| the house\nla ||| the\nmaison ||| house\n");
        let reverse = align_direction(&corpus, true, &TrainOptions::default()).unwrap();
        let forward_on_swapped =
            align_direction(&swapped, false, &TrainOptions::default()).unwrap();
        // training is deterministic, so the reverse run over the corpus and the
        // forward run over the swapped corpus decode identical link vectors
        assert_eq!(reverse.links, forward_on_swapped.links);
    }

    #[test]
    fn merge_rejects_mismatched_line_counts() {
        let fwd = vec![vec![(0, 0)]];
        let rev: Vec<Vec<(Link, Link)>> = vec![vec![(0, 0)], vec![]];
        let err = merge_alignments(&fwd, &rev, Heuristic::GrowDiagFinalAnd, ErrorPolicy::FailFast)
            .unwrap_err();
        assert!(matches!(err, AlignError::DirectionMismatch { .. }));
    }

    #[test]
    fn merge_symmetrizes_pair_files() {
        let fwd = vec![vec![(0, 0), (2, 2)], vec![]];
        let rev = vec![vec![(0, 0), (1, 1)], vec![]];
        let merged =
            merge_alignments(&fwd, &rev, Heuristic::GrowDiagFinalAnd, ErrorPolicy::FailFast)
                .unwrap();
        assert_eq!(merged[0], vec![(0, 0), (1, 1), (2, 2)]);
        assert!(merged[1].is_empty());
    }
}
