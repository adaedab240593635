use clap::Parser;
use std::fs;

use fastalign_core::{
    align_bidirectional, merge_alignments, parse_bitext, parse_moses, write_moses,
    write_moses_pairs, write_scores, AlignOptions, ErrorPolicy, Heuristic, MalformedPolicy,
    TrainOptions,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Bitext input (`source ||| target` per line), or `-` for stdin.
    #[arg(short = 'i', long = "input", default_value = "-")]
    input: String,
    /// Write the symmetrized alignment here (`-` for stdout).
    #[arg(short = 'o', long = "output", default_value = "-")]
    output: String,
    /// Also write the forward (target-to-source) alignment.
    #[arg(short = 'f', long = "forward")]
    forward: Option<String>,
    /// Also write the reverse (source-to-target) alignment.
    #[arg(short = 'r', long = "reverse")]
    reverse: Option<String>,
    /// Write per-pair forward alignment scores.
    #[arg(long = "scores")]
    scores: Option<String>,
    #[arg(short = 'I', long = "iterations", default_value_t = 5)]
    iterations: usize,
    #[arg(short = 'N', long = "null-prior", default_value_t = 0.08)]
    null_prior: f64,
    #[arg(short = 'T', long = "tension", default_value_t = 4.0)]
    tension: f64,
    /// Keep the diagonal tension fixed instead of re-estimating it.
    #[arg(long, default_value_t = false)]
    fix_tension: bool,
    /// Symmetrization heuristic: intersection, union, grow-diag or
    /// grow-diag-final-and.
    #[arg(short = 'c', long = "heuristic", default_value = "grow-diag-final-and")]
    heuristic: String,
    /// Drop malformed bitext lines instead of failing the batch.
    #[arg(long, default_value_t = false)]
    skip_malformed: bool,
    /// Discard individual failing pairs instead of failing the batch.
    #[arg(long, default_value_t = false)]
    per_pair_errors: bool,
    /// Symmetrize two existing Moses alignment files instead of training.
    #[arg(long = "merge-forward", requires = "merge_reverse")]
    merge_forward: Option<String>,
    #[arg(long = "merge-reverse", requires = "merge_forward")]
    merge_reverse: Option<String>,
    /// Only log errors.
    #[arg(short = 'q', long, default_value_t = false)]
    quiet: bool,
}

fn read_all(path: &str) -> std::io::Result<String> {
    if path == "-" {
        use std::io::Read;
        let mut s = String::new();
        std::io::stdin().read_to_string(&mut s)?;
        Ok(s)
    } else {
        fs::read_to_string(path)
    }
}

fn write_all(path: &str, data: &str) -> std::io::Result<()> {
    if path == "-" {
        print!("{data}");
        Ok(())
    } else {
        fs::write(path, data)
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let default_level = if args.quiet { "error" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let heuristic: Heuristic = args.heuristic.parse()?;
    let error_policy = if args.per_pair_errors {
        ErrorPolicy::PerPair
    } else {
        ErrorPolicy::FailFast
    };

    if let (Some(fwd_path), Some(rev_path)) = (&args.merge_forward, &args.merge_reverse) {
        let fwd = parse_moses(&read_all(fwd_path)?)?;
        let rev = parse_moses(&read_all(rev_path)?)?;
        let merged = merge_alignments(&fwd, &rev, heuristic, error_policy)?;
        write_all(&args.output, &write_moses_pairs(&merged))?;
        return Ok(());
    }

    let policy = if args.skip_malformed {
        MalformedPolicy::Skip
    } else {
        MalformedPolicy::Fail
    };
    let corpus = parse_bitext(&read_all(&args.input)?, policy)?;

    let opts = AlignOptions {
        train: TrainOptions {
            iterations: args.iterations,
            null_prior: args.null_prior,
            tension: args.tension,
            optimize_tension: !args.fix_tension,
            early_stop: None,
        },
        heuristic,
        error_policy,
    };
    let result = align_bidirectional(&corpus, &opts)?;

    if let Some(path) = &args.forward {
        write_all(path, &write_moses(&result.forward.links, false))?;
    }
    if let Some(path) = &args.reverse {
        write_all(path, &write_moses(&result.reverse.links, true))?;
    }
    if let Some(path) = &args.scores {
        write_all(path, &write_scores(&result.forward.scores))?;
    }
    write_all(&args.output, &write_moses_pairs(&result.symmetrized))?;

    Ok(())
}
