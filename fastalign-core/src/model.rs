//! Lexical translation + diagonal distortion model trained with EM.
//!
//! The generative story for a sentence pair with source length n and target
//! length m: each target position j picks a source position i (or NULL) with
//! probability delta(i | j, n, m) and then emits the target word with the
//! lexical probability t(f | e_i). The distortion component is
//!
//!   delta(NULL) = p0
//!   delta(i)    = (1 - p0) * exp(lambda * h(i, j, n, m)) / Z(j, n, m)
//!
//! where h is the diagonal closeness feature from [`crate::types`] and lambda
//! is a single concentration parameter per direction. Lambda has no
//! closed-form update, so the M-step re-estimates it by a golden-section
//! search over the expected distortion log-likelihood, bucketed by sentence
//! length pair.

use hashbrown::HashMap;
use rayon::prelude::*;
use tracing::debug;

use crate::errors::{AlignError, Result};
use crate::text::{Corpus, SentencePair};
use crate::types::*;

#[derive(Clone, Debug)]
pub struct TrainOptions {
    /// Number of EM iterations.
    pub iterations: usize,
    /// Null-alignment prior p0.
    pub null_prior: Count,
    /// Initial diagonal tension lambda.
    pub tension: Count,
    /// Re-estimate the tension each iteration.
    pub optimize_tension: bool,
    /// Stop early when the relative log-likelihood improvement drops below
    /// this threshold.
    pub early_stop: Option<Count>,
}

impl Default for TrainOptions {
    fn default() -> Self {
        TrainOptions {
            iterations: 5,
            null_prior: DEFAULT_NULL_PRIOR,
            tension: DEFAULT_TENSION,
            optimize_tension: true,
            early_stop: None,
        }
    }
}

/// Trained alignment model. Read-only during decoding.
#[derive(Clone, Debug)]
pub struct Model {
    /// Sparse translation table keyed by `pair_key(e, f)`. Token pairs that
    /// never co-occur are absent and have probability exactly zero.
    ttable: HashMap<u64, Count>,
    pub tension: Count,
    pub null_prior: Count,
}

impl Model {
    /// Translation probability t(f | e); zero for pairs never observed together.
    #[inline]
    pub fn prob(&self, e: Token, f: Token) -> Count {
        self.ttable.get(&pair_key(e, f)).copied().unwrap_or(0.0)
    }

    /// Distortion weight delta(i | j, n, m) for a non-null link.
    #[inline]
    pub fn distortion(&self, i: usize, j: usize, src_len: usize, tgt_len: usize) -> Count {
        let mut z = 0.0;
        for k in 0..src_len {
            z += (self.tension * diagonal_feature(k, j, src_len, tgt_len)).exp();
        }
        (1.0 - self.null_prior) * (self.tension * diagonal_feature(i, j, src_len, tgt_len)).exp()
            / z
    }

    /// Train a model over the corpus. `reverse` swaps the roles of the two
    /// sides, so the same corpus yields both directional models.
    pub fn train(corpus: &Corpus, reverse: bool, opts: &TrainOptions) -> Result<Model> {
        if corpus.is_empty() {
            return Err(AlignError::EmptyCorpus);
        }
        let pairs: Vec<SentencePair> = if reverse {
            corpus.pairs.iter().map(|p| p.swapped()).collect()
        } else {
            corpus.pairs.clone()
        };
        let src_vocab_len = if reverse {
            corpus.target_vocab.len()
        } else {
            corpus.source_vocab.len()
        };

        let mut model = Model {
            ttable: init_uniform(&pairs, src_vocab_len),
            tension: opts.tension,
            null_prior: opts.null_prior,
        };

        let mut prev_ll = Count::NEG_INFINITY;
        for iteration in 0..opts.iterations {
            let (next, log_likelihood) =
                em_iteration(&model, &pairs, src_vocab_len, opts.optimize_tension);
            model = next;
            debug!(
                iteration,
                log_likelihood,
                tension = model.tension,
                "EM iteration finished"
            );

            if let Some(epsilon) = opts.early_stop {
                let gain = (log_likelihood - prev_ll) / prev_ll.abs().max(1e-12);
                if prev_ll.is_finite() && gain < epsilon {
                    debug!(iteration, "log-likelihood converged, stopping early");
                    break;
                }
            }
            prev_ll = log_likelihood;
        }

        Ok(model)
    }
}

/// One EM iteration: consumes the previous iteration's parameters and
/// produces the next, plus the corpus log-likelihood under the input
/// parameters. No shared mutation between iterations.
fn em_iteration(
    model: &Model,
    pairs: &[SentencePair],
    src_vocab_len: usize,
    optimize_tension: bool,
) -> (Model, Count) {
    let acc = pairs
        .par_iter()
        .fold(Accumulator::new, |mut acc, pair| {
            expectation_step(model, pair, &mut acc);
            acc
        })
        .reduce(Accumulator::new, Accumulator::merge);

    let tension = if optimize_tension {
        golden_section_max(MIN_TENSION, MAX_TENSION, 40, |t| {
            expected_distortion_ll(&acc.buckets, t)
        })
    } else {
        model.tension
    };
    let next = Model {
        ttable: normalize_counts(acc.counts, src_vocab_len),
        tension,
        null_prior: model.null_prior,
    };
    (next, acc.log_likelihood)
}

/// Uniform initialization of t over the target types observed co-occurring
/// with each source type (plus NULL, which co-occurs with everything).
fn init_uniform(pairs: &[SentencePair], src_vocab_len: usize) -> HashMap<u64, Count> {
    let mut ttable: HashMap<u64, Count> = HashMap::new();
    for pair in pairs {
        for &f in &pair.target {
            ttable.insert(pair_key(NULL_TOKEN, f), 0.0);
            for &e in &pair.source {
                ttable.insert(pair_key(e, f), 0.0);
            }
        }
    }
    let mut degree = vec![0usize; src_vocab_len];
    for &key in ttable.keys() {
        degree[(key >> 32) as usize] += 1;
    }
    for (&key, prob) in ttable.iter_mut() {
        *prob = 1.0 / degree[(key >> 32) as usize] as Count;
    }
    ttable
}

/// Expected-count statistics accumulated during one E-step. Mergeable so the
/// E-step can be a parallel fold over sentence pairs followed by a reduction.
struct Accumulator {
    counts: HashMap<u64, Count>,
    buckets: HashMap<(u16, u16), DiagonalBucket>,
    log_likelihood: Count,
}

/// Distortion sufficient statistics for one (source length, target length)
/// bucket: per target position, the non-null posterior mass and the expected
/// diagonal feature.
struct DiagonalBucket {
    mass: Vec<Count>,
    feat: Vec<Count>,
}

impl Accumulator {
    fn new() -> Self {
        Accumulator {
            counts: HashMap::new(),
            buckets: HashMap::new(),
            log_likelihood: 0.0,
        }
    }

    fn merge(mut self, other: Accumulator) -> Accumulator {
        for (key, count) in other.counts {
            *self.counts.entry(key).or_insert(0.0) += count;
        }
        for (lens, bucket) in other.buckets {
            match self.buckets.entry(lens) {
                hashbrown::hash_map::Entry::Occupied(mut e) => {
                    let mine = e.get_mut();
                    for (a, b) in mine.mass.iter_mut().zip(&bucket.mass) {
                        *a += b;
                    }
                    for (a, b) in mine.feat.iter_mut().zip(&bucket.feat) {
                        *a += b;
                    }
                }
                hashbrown::hash_map::Entry::Vacant(e) => {
                    e.insert(bucket);
                }
            }
        }
        self.log_likelihood += other.log_likelihood;
        self
    }
}

/// Posterior pass over one sentence pair. Pairs with an empty side contribute
/// no statistics.
fn expectation_step(model: &Model, pair: &SentencePair, acc: &mut Accumulator) {
    let n = pair.source.len();
    let m = pair.target.len();
    if n == 0 || m == 0 {
        return;
    }

    let bucket = acc
        .buckets
        .entry((n as u16, m as u16))
        .or_insert_with(|| DiagonalBucket {
            mass: vec![0.0; m],
            feat: vec![0.0; m],
        });

    let mut weights = vec![0.0 as Count; n];
    for (j, &f) in pair.target.iter().enumerate() {
        let mut z = 0.0;
        for i in 0..n {
            z += (model.tension * diagonal_feature(i, j, n, m)).exp();
        }

        let null_weight = model.null_prior * model.prob(NULL_TOKEN, f);
        let mut total = null_weight;
        for (i, &e) in pair.source.iter().enumerate() {
            let delta = (1.0 - model.null_prior)
                * (model.tension * diagonal_feature(i, j, n, m)).exp()
                / z;
            let w = delta * model.prob(e, f);
            weights[i] = w;
            total += w;
        }
        if total <= 0.0 {
            continue;
        }
        acc.log_likelihood += total.ln();

        *acc.counts.entry(pair_key(NULL_TOKEN, f)).or_insert(0.0) += null_weight / total;
        for (i, &e) in pair.source.iter().enumerate() {
            let gamma = weights[i] / total;
            *acc.counts.entry(pair_key(e, f)).or_insert(0.0) += gamma;
            bucket.mass[j] += gamma;
            bucket.feat[j] += gamma * diagonal_feature(i, j, n, m);
        }
    }
}

/// M-step for the translation table: normalize expected counts per source
/// token so they sum to one over its observed target tokens.
fn normalize_counts(counts: HashMap<u64, Count>, src_vocab_len: usize) -> HashMap<u64, Count> {
    let mut sums = vec![0.0 as Count; src_vocab_len];
    for (&key, &count) in &counts {
        sums[(key >> 32) as usize] += count;
    }
    counts
        .into_iter()
        .map(|(key, count)| {
            let sum = sums[(key >> 32) as usize];
            (key, if sum > 0.0 { count / sum } else { 0.0 })
        })
        .collect()
}

/// Expected distortion log-likelihood as a function of the tension, summed
/// over the length buckets: lambda * H - M * log Z per target position.
fn expected_distortion_ll(
    buckets: &HashMap<(u16, u16), DiagonalBucket>,
    tension: Count,
) -> Count {
    let mut total = 0.0;
    for (&(n, m), bucket) in buckets {
        let n = n as usize;
        let m = m as usize;
        for j in 0..m {
            let mass = bucket.mass[j];
            let feat = bucket.feat[j];
            if mass == 0.0 {
                continue;
            }
            let mut z = 0.0;
            for i in 0..n {
                z += (tension * diagonal_feature(i, j, n, m)).exp();
            }
            total += tension * feat - mass * z.ln();
        }
    }
    total
}

/// Golden-section search for the maximum of a unimodal function on [lo, hi].
fn golden_section_max<F: Fn(Count) -> Count>(
    mut lo: Count,
    mut hi: Count,
    iterations: usize,
    f: F,
) -> Count {
    const INV_PHI: Count = 0.618_033_988_749_894_8;
    let mut x1 = hi - INV_PHI * (hi - lo);
    let mut x2 = lo + INV_PHI * (hi - lo);
    let mut f1 = f(x1);
    let mut f2 = f(x2);
    for _ in 0..iterations {
        if f1 >= f2 {
            hi = x2;
            x2 = x1;
            f2 = f1;
            x1 = hi - INV_PHI * (hi - lo);
            f1 = f(x1);
        } else {
            lo = x1;
            x1 = x2;
            f1 = f2;
            x2 = lo + INV_PHI * (hi - lo);
            f2 = f(x2);
        }
    }
    0.5 * (lo + hi)
}
