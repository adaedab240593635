//! Per-position Viterbi decoding.
//!
//! Under this model the alignment decisions for different target positions
//! are independent, so the highest-posterior alignment is a per-position
//! argmax rather than a lattice search.

use crate::model::Model;
use crate::types::*;

/// Decode the best alignment for one sentence pair. Pure function of the
/// model and the pair. Row index is the target position; `NULL_LINK` marks
/// positions where the null outcome wins. Ties between source positions go
/// to the lowest index; null is kept unless strictly beaten.
pub fn decode(model: &Model, source: &[Token], target: &[Token]) -> Vec<Link> {
    decode_scored(model, source, target).0
}

/// Like [`decode`], also returning the mean log-probability of the chosen
/// outcomes per target token (0.0 for pairs with an empty side).
pub fn decode_scored(model: &Model, source: &[Token], target: &[Token]) -> (Vec<Link>, Count) {
    let n = source.len();
    let m = target.len();
    let mut links = vec![NULL_LINK; m];
    if n == 0 || m == 0 {
        return (links, 0.0);
    }

    let mut score = 0.0;
    for (j, &f) in target.iter().enumerate() {
        let mut best = model.null_prior * model.prob(NULL_TOKEN, f);
        let mut best_link = NULL_LINK;
        for (i, &e) in source.iter().enumerate() {
            let s = model.distortion(i, j, n, m) * model.prob(e, f);
            if s > best {
                best = s;
                best_link = i as Link;
            }
        }
        links[j] = best_link;
        score += best.max(Count::MIN_POSITIVE).ln();
    }
    (links, score / m as Count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Model, TrainOptions};
    use crate::text::{parse_bitext, MalformedPolicy};

    fn train(bitext: &str) -> (crate::text::Corpus, Model) {
        let corpus = parse_bitext(bitext, MalformedPolicy::Fail).unwrap();
        let model = Model::train(&corpus, false, &TrainOptions::default()).unwrap();
        (corpus, model)
    }

    #[test]
    fn identity_corpus_decodes_to_identity() {
        let (corpus, model) = train("a b ||| a b\na b ||| a b\na b ||| a b\n");
        let pair = &corpus.pairs[0];
        assert_eq!(decode(&model, &pair.source, &pair.target), vec![0, 1]);
    }

    #[test]
    fn empty_sides_decode_to_no_links() {
        let (corpus, model) = train("a ||| x\n ||| x x\na |||\n");
        let empty_src = &corpus.pairs[1];
        assert_eq!(
            decode(&model, &empty_src.source, &empty_src.target),
            vec![NULL_LINK, NULL_LINK]
        );
        let empty_tgt = &corpus.pairs[2];
        assert!(decode(&model, &empty_tgt.source, &empty_tgt.target).is_empty());
    }

    #[test]
    fn unrelated_word_falls_back_to_null() {
        // "z" only ever co-occurs with NULL and "q"; aligned against a
        // sentence it never co-occurred with, every lexical weight is zero
        // and the null outcome must win without a crash.
        let (corpus, model) = train("a ||| x\nq ||| z\n");
        let a = corpus.pairs[0].source.clone();
        let z = corpus.pairs[1].target.clone();
        assert_eq!(decode(&model, &a, &z), vec![NULL_LINK]);
    }

    #[test]
    fn score_is_nonpositive_log_probability() {
        let (corpus, model) = train("a b ||| a b\na b ||| a b\n");
        let pair = &corpus.pairs[0];
        let (_, score) = decode_scored(&model, &pair.source, &pair.target);
        assert!(score < 0.0);
        assert!(score.is_finite());
    }
}
