//! Command-line interface for circaphase

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "circaphase")]
#[command(version)]
#[command(about = "Circadian phase estimation from gene-expression matrices")]
#[command(disable_help_flag = true)]
#[command(disable_version_flag = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Fit a phase model to an expression cohort
    #[command(
        about = "Fit a phase model to an expression cohort",
        long_about = "Fit a phase model to an expression cohort\n\n\
            Runs the complete pipeline: covariate-aware CSV parsing, outlier\n\
            clipping and standardization, SVD gene selection, ensemble training\n\
            of the phase autoencoder, and per-sample phase prediction. When\n\
            collection times are present they supervise training and the run\n\
            is scored against them.",
        after_long_help = "\
Examples:
  # Basic fit with defaults
  circaphase fit -e expression.csv -o results/

  # Fit restricted to a curated gene list, with a config file
  circaphase fit -e expression.csv -g clock_genes.csv -c config.json -o results/

  # Longer supervised run with 10-model ensemble and alignment
  circaphase fit -e expression.csv --epochs 2000 --ensemble 10 --align -o results/

  # Fit plus 5-fold cross-validation
  circaphase fit -e expression.csv --cross-validate -o results/"
    )]
    Fit {
        /// Path to expression CSV file
        #[arg(short, long,
            long_help = "Path to expression CSV file.\n\
                Format: first column = gene symbols (Gene_Symbol), remaining\n\
                columns = samples. Rows named like covariates (e.g. time_C,\n\
                celltype_D) are parsed as per-sample metadata, not expression.\n\
                Supports both CSV (comma) and TSV (tab) delimiters (auto-detected).")]
        expression: String,

        /// Path to JSON configuration file
        #[arg(short, long,
            long_help = "Path to JSON configuration file.\n\
                Missing keys fall back to defaults; command-line flags override\n\
                the file. The full effective configuration is written next to\n\
                the results.")]
        config: Option<String>,

        /// Path to seed gene list (one symbol per line)
        #[arg(short = 'g', long, value_name = "FILE",
            long_help = "Path to a seed gene list, one symbol per line (or the\n\
                first column of a delimited file). The fit is restricted to\n\
                these genes before any statistics are computed.")]
        seed_genes: Option<String>,

        /// Output directory [default: ./results]
        #[arg(short, long, default_value = "./results")]
        output: String,

        /// Number of training epochs (overrides config)
        #[arg(long)]
        epochs: Option<usize>,

        /// Ensemble size (overrides config)
        #[arg(long)]
        ensemble: Option<usize>,

        /// Number of genes kept by SVD selection (overrides config)
        #[arg(long)]
        components: Option<usize>,

        /// Random seed (overrides config)
        #[arg(long)]
        seed: Option<u64>,

        /// Align fitted phases to reference clock-gene acrophases
        #[arg(long,
            long_help = "After fitting, rotate the phases onto the biological\n\
                reference frame using published core clock gene acrophases\n\
                (or the alignment samples listed in the config) and write the\n\
                aligned predictions alongside the raw ones.")]
        align: bool,

        /// Run k-fold cross-validation after fitting
        #[arg(long,
            long_help = "Re-run the pipeline k times on train/test splits and\n\
                score held-out samples against their collection times.\n\
                Requires timed samples; fold count comes from the config.")]
        cross_validate: bool,

        /// Number of threads (0 = auto) [default: 0]
        #[arg(short = 't', long, default_value = "0")]
        threads: usize,
    },

    /// Apply a fitted model to a new cohort
    #[command(
        long_about = "Apply a fitted model to a new cohort.\n\n\
            Loads a model bundle written by `fit`, reapplies the training\n\
            scaler and gene selection, and predicts a phase for every sample.\n\
            Model genes missing from the cohort are zero-filled (with a\n\
            warning); prediction fails only when none are present.",
        after_long_help = "\
Examples:
  circaphase predict -e new_cohort.csv -m results/model.json -o predictions/"
    )]
    Predict {
        /// Path to expression CSV file
        #[arg(short, long)]
        expression: String,

        /// Path to the fitted model bundle (JSON)
        #[arg(short, long)]
        model: String,

        /// Output directory [default: ./predictions]
        #[arg(short, long, default_value = "./predictions")]
        output: String,

        /// Number of threads (0 = auto) [default: 0]
        #[arg(short = 't', long, default_value = "0")]
        threads: usize,
    },

    /// Align fitted phases to the reference frame
    #[command(
        long_about = "Align fitted phases to the biological reference frame.\n\n\
            Reads a sample_id/phase CSV (as written by `fit` or `predict`),\n\
            fits cosinors for the core clock genes against those phases, and\n\
            grid-searches the rotation (and optionally reflection) that best\n\
            matches their published acrophases.",
        after_long_help = "\
Examples:
  circaphase align -e expression.csv -p results/predictions.csv -o results/"
    )]
    Align {
        /// Path to expression CSV file
        #[arg(short, long)]
        expression: String,

        /// Path to the sample_id / phase CSV
        #[arg(short, long)]
        phases: String,

        /// Path to JSON configuration file
        #[arg(short, long)]
        config: Option<String>,

        /// Output directory [default: ./results]
        #[arg(short, long, default_value = "./results")]
        output: String,
    },
}
