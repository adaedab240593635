//! Error types shared by the alignment pipeline.

pub type Result<T, E = AlignError> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum AlignError {
    /// No sentence pairs were supplied for training.
    #[error("no sentence pairs supplied for training")]
    EmptyCorpus,

    /// A bitext line could not be split into source and target halves.
    #[error("line {line_no}: expected exactly one '|||' separator: {line:?}")]
    MalformedSentencePair { line_no: usize, line: String },

    /// An alignment line contained a token that is not of the form `i-j`.
    #[error("line {line_no}: malformed alignment token {token:?}")]
    MalformedAlignment { line_no: usize, token: String },

    /// A sentence exceeds the maximum supported length.
    #[error("line {line_no}: sentence too long ({len} > {max})")]
    SentenceTooLong { line_no: usize, len: usize, max: usize },

    /// Forward and reverse alignments disagree about sentence counts or lengths.
    #[error("direction mismatch during symmetrization: {detail}")]
    DirectionMismatch { detail: String },

    /// The number of produced alignments differs from the number of input pairs.
    #[error("produced {produced} alignments for {expected} sentence pairs")]
    OutputCountMismatch { produced: usize, expected: usize },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
