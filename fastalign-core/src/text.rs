//! Corpus loading and Moses-format serialization.

use hashbrown::HashMap;
use tracing::warn;

use crate::errors::{AlignError, Result};
use crate::types::*;

/// Bidirectional token/id mapping. Id 0 is reserved for the NULL word.
/// Grows while the corpus is loaded and is frozen afterwards.
#[derive(Clone, Debug)]
pub struct Vocabulary {
    ids: HashMap<String, Token>,
    words: Vec<String>,
}

impl Vocabulary {
    pub fn new() -> Self {
        Vocabulary {
            ids: HashMap::new(),
            words: vec!["<NULL>".to_string()],
        }
    }

    pub fn intern(&mut self, word: &str) -> Token {
        match self.ids.get(word) {
            Some(&id) => id,
            None => {
                let id = self.words.len() as Token;
                self.ids.insert(word.to_string(), id);
                self.words.push(word.to_string());
                id
            }
        }
    }

    pub fn id(&self, word: &str) -> Option<Token> {
        self.ids.get(word).copied()
    }

    pub fn word(&self, id: Token) -> Option<&str> {
        self.words.get(id as usize).map(|w| w.as_str())
    }

    /// Number of entries, counting the reserved NULL word.
    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.len() <= 1
    }
}

impl Default for Vocabulary {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Debug)]
pub struct SentencePair {
    pub source: Vec<Token>,
    pub target: Vec<Token>,
}

impl SentencePair {
    pub fn swapped(&self) -> SentencePair {
        SentencePair {
            source: self.target.clone(),
            target: self.source.clone(),
        }
    }
}

/// A loaded parallel corpus. Immutable once built.
#[derive(Clone, Debug)]
pub struct Corpus {
    pub pairs: Vec<SentencePair>,
    pub source_vocab: Vocabulary,
    pub target_vocab: Vocabulary,
}

impl Corpus {
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

/// What to do with a bitext line that is not `source ||| target`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MalformedPolicy {
    /// Fail the whole batch on the first malformed line.
    #[default]
    Fail,
    /// Drop the line and log a warning.
    Skip,
}

pub const SEPARATOR: &str = "|||";

/// Parse `source ||| target` bitext. Each half is whitespace-tokenized;
/// either half may be empty. Line numbers in errors are 1-based.
pub fn parse_bitext(input: &str, policy: MalformedPolicy) -> Result<Corpus> {
    let mut source_vocab = Vocabulary::new();
    let mut target_vocab = Vocabulary::new();
    let mut pairs = Vec::new();

    for (idx, line) in input.lines().enumerate() {
        let line_no = idx + 1;
        let fields: Vec<&str> = line.split(SEPARATOR).collect();
        if fields.len() != 2 {
            match policy {
                MalformedPolicy::Fail => {
                    return Err(AlignError::MalformedSentencePair {
                        line_no,
                        line: line.to_string(),
                    });
                }
                MalformedPolicy::Skip => {
                    warn!(line_no, "skipping malformed bitext line");
                    continue;
                }
            }
        }
        let source = tokenize(fields[0], &mut source_vocab, line_no)?;
        let target = tokenize(fields[1], &mut target_vocab, line_no)?;
        pairs.push(SentencePair { source, target });
    }

    Ok(Corpus {
        pairs,
        source_vocab,
        target_vocab,
    })
}

fn tokenize(half: &str, vocab: &mut Vocabulary, line_no: usize) -> Result<Vec<Token>> {
    let words: Vec<&str> = half.split_whitespace().collect();
    if words.len() > MAX_SENT_LEN {
        return Err(AlignError::SentenceTooLong {
            line_no,
            len: words.len(),
            max: MAX_SENT_LEN,
        });
    }
    Ok(words.iter().map(|w| vocab.intern(w)).collect())
}

/// Render directional alignments as Moses `i-j` lines, one per sentence pair,
/// in ascending (source, target) order. `reverse` marks alignments whose rows
/// are indexed by source position instead of target position.
pub fn write_moses(alignments: &[Vec<Link>], reverse: bool) -> String {
    let mut out = String::new();
    for links in alignments {
        let mut pairs: Vec<(Link, Link)> = Vec::with_capacity(links.len());
        for (pos, &link) in links.iter().enumerate() {
            if link != NULL_LINK {
                if reverse {
                    pairs.push((pos as Link, link));
                } else {
                    pairs.push((link, pos as Link));
                }
            }
        }
        pairs.sort_unstable();
        push_pair_line(&mut out, &pairs);
    }
    out
}

/// Render symmetrized alignments, one line per sentence pair.
pub fn write_moses_pairs(alignments: &[Vec<(Link, Link)>]) -> String {
    let mut out = String::new();
    for pairs in alignments {
        let mut pairs = pairs.clone();
        pairs.sort_unstable();
        push_pair_line(&mut out, &pairs);
    }
    out
}

fn push_pair_line(out: &mut String, pairs: &[(Link, Link)]) {
    use std::fmt::Write;
    for (k, (i, j)) in pairs.iter().enumerate() {
        if k > 0 {
            out.push(' ');
        }
        let _ = write!(out, "{i}-{j}");
    }
    out.push('\n');
}

/// Parse Moses `i-j` alignment lines back into pair sets. An empty line is a
/// sentence pair with no links.
pub fn parse_moses(input: &str) -> Result<Vec<Vec<(Link, Link)>>> {
    let mut alignments = Vec::new();
    for (idx, line) in input.lines().enumerate() {
        let line_no = idx + 1;
        let mut pairs = Vec::new();
        for token in line.split_whitespace() {
            let pair = token.split_once('-').and_then(|(i, j)| {
                Some((i.parse::<Link>().ok()?, j.parse::<Link>().ok()?))
            });
            match pair {
                Some(p) => pairs.push(p),
                None => {
                    return Err(AlignError::MalformedAlignment {
                        line_no,
                        token: token.to_string(),
                    });
                }
            }
        }
        alignments.push(pairs);
    }
    Ok(alignments)
}

/// Per-pair alignment scores, one per line, negated like the usual tooling.
pub fn write_scores(scores: &[Count]) -> String {
    let mut out = String::new();
    for &score in scores {
        out.push_str(&format!("{}\n", -score));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_bitext() {
        let corpus = parse_bitext("the house ||| la maison\nthe ||| la\n", MalformedPolicy::Fail)
            .unwrap();
        assert_eq!(corpus.len(), 2);
        assert_eq!(corpus.pairs[0].source.len(), 2);
        assert_eq!(corpus.pairs[0].target.len(), 2);
        // "the" interned once, shared across lines
        assert_eq!(corpus.pairs[0].source[0], corpus.pairs[1].source[0]);
        assert_eq!(corpus.source_vocab.id("the"), Some(1));
        assert_eq!(corpus.source_vocab.word(1), Some("the"));
    }

    #[test]
    fn empty_halves_are_legal() {
        let corpus = parse_bitext("||| la maison\nthe house |||\n|||\n", MalformedPolicy::Fail)
            .unwrap();
        assert_eq!(corpus.len(), 3);
        assert!(corpus.pairs[0].source.is_empty());
        assert_eq!(corpus.pairs[0].target.len(), 2);
        assert!(corpus.pairs[1].target.is_empty());
        assert!(corpus.pairs[2].source.is_empty());
        assert!(corpus.pairs[2].target.is_empty());
    }

    #[test]
    fn malformed_line_fails_batch() {
        let err = parse_bitext("a ||| b\nno separator here\n", MalformedPolicy::Fail)
            .unwrap_err();
        match err {
            AlignError::MalformedSentencePair { line_no, .. } => assert_eq!(line_no, 2),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn malformed_line_skipped_when_configured() {
        let corpus = parse_bitext(
            "a ||| b\nno separator here\nc ||| d ||| e\nf ||| g\n",
            MalformedPolicy::Skip,
        )
        .unwrap();
        assert_eq!(corpus.len(), 2);
    }

    #[test]
    fn overlong_sentence_is_rejected() {
        let line = format!("{}||| x", "w ".repeat(MAX_SENT_LEN + 1));
        let err = parse_bitext(&line, MalformedPolicy::Fail).unwrap_err();
        assert!(matches!(err, AlignError::SentenceTooLong { .. }));
    }

    #[test]
    fn moses_output_is_sorted_by_source_then_target() {
        // row index = target position, value = source position
        let alignments = vec![vec![2, 0, NULL_LINK, 0]];
        assert_eq!(write_moses(&alignments, false), "0-1 0-3 2-0\n");
    }

    #[test]
    fn reverse_rows_are_indexed_by_source_position() {
        // row index = source position, value = target position
        let alignments = vec![vec![1, NULL_LINK, 0]];
        assert_eq!(write_moses(&alignments, true), "0-1 2-0\n");
    }

    #[test]
    fn unaligned_pair_produces_empty_line() {
        let alignments = vec![vec![NULL_LINK, NULL_LINK], vec![0]];
        assert_eq!(write_moses(&alignments, false), "\n0-0\n");
    }

    #[test]
    fn moses_pairs_round_trip() {
        let alignments = vec![vec![(0, 0), (1, 1)], vec![], vec![(2, 0)]];
        let text = write_moses_pairs(&alignments);
        assert_eq!(text, "0-0 1-1\n\n2-0\n");
        assert_eq!(parse_moses(&text).unwrap(), alignments);
    }

    #[test]
    fn bad_alignment_token_is_reported() {
        let err = parse_moses("0-0 1:2\n").unwrap_err();
        match err {
            AlignError::MalformedAlignment { line_no, token } => {
                assert_eq!(line_no, 1);
                assert_eq!(token, "1:2");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn scores_are_negated() {
        assert_eq!(write_scores(&[-1.5, -0.25]), "1.5\n0.25\n");
    }
}
