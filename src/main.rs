//! circaphase command-line interface

use std::path::Path;

use clap::Parser;
use log::{info, LevelFilter};

use circaphase::align::{align_phases, write_gene_stats_csv};
use circaphase::cli::{Cli, Commands};
use circaphase::io::{read_phases_csv, write_loss_trace_csv, write_matrix_csv};
use circaphase::prelude::*;

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn main() {
    let args: Vec<String> = std::env::args().collect();

    // Find the first non-flag argument (potential subcommand)
    let first_positional = args.iter().skip(1).find(|a| !a.starts_with('-'));
    let subcommands = ["fit", "predict", "align", "help"];
    let has_subcommand = first_positional
        .map_or(false, |a| subcommands.contains(&a.as_str()));

    if !has_subcommand {
        // No subcommand — handle top-level help/version manually
        if args.len() == 1 {
            print_no_args();
            return;
        }
        if args.iter().any(|a| a == "--help") {
            print_long_help();
            return;
        }
        if args.iter().any(|a| a == "-h") {
            print_short_help();
            return;
        }
        if args.iter().any(|a| a == "-V" || a == "--version") {
            println!("circaphase {}", VERSION);
            return;
        }
        // Unknown flags without subcommand — show hint
        print_no_args();
        return;
    }

    let cli = Cli::parse();

    // Set up logging
    let log_level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    env_logger::Builder::new()
        .filter_level(log_level)
        .format_timestamp(None)
        .init();

    let result = match cli.command {
        Some(Commands::Fit {
            expression,
            config,
            seed_genes,
            output,
            epochs,
            ensemble,
            components,
            seed,
            align,
            cross_validate,
            threads,
        }) => run_fit_command(
            &expression,
            config.as_deref(),
            seed_genes.as_deref(),
            &output,
            epochs,
            ensemble,
            components,
            seed,
            align,
            cross_validate,
            threads,
        ),
        Some(Commands::Predict {
            expression,
            model,
            output,
            threads,
        }) => run_predict_command(&expression, &model, &output, threads),
        Some(Commands::Align {
            expression,
            phases,
            config,
            output,
        }) => run_align_command(&expression, &phases, config.as_deref(), &output),
        None => {
            // Should not reach here (handled above), but just in case
            print_no_args();
            return;
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

// ---------------------------------------------------------------------------
// Custom help output
// ---------------------------------------------------------------------------

fn print_no_args() {
    println!("circaphase v{}", VERSION);
    println!("Run `circaphase -h` for usage or `circaphase --help` for detailed information.");
}

fn print_short_help() {
    println!("circaphase v{}", VERSION);
    println!();
    println!("Usage: circaphase <COMMAND> [OPTIONS]");
    println!();
    println!("Commands:");
    println!("  fit      Fit a phase model to an expression cohort");
    println!("  predict  Apply a fitted model to a new cohort");
    println!("  align    Align fitted phases to the reference frame");
    println!();
    println!("Run `circaphase <COMMAND> -h` for command-specific options.");
}

fn print_long_help() {
    println!("circaphase v{}", VERSION);
    println!("Circadian phase estimation from gene-expression matrices");
    println!();
    println!("Usage: circaphase <COMMAND> [OPTIONS]");
    println!();
    println!("Commands:");
    println!("  fit      Fit a phase model to an expression cohort");
    println!("             - covariate-aware CSV parsing (time_C, celltype_D rows)");
    println!("             - outlier clipping, CV filter, standardization");
    println!("             - SVD gene selection and ensemble autoencoder training");
    println!("             - optional reference-frame alignment and cross-validation");
    println!("  predict  Apply a fitted model bundle to a new cohort");
    println!("  align    Rotate existing phase predictions onto the clock-gene");
    println!("             reference frame");
    println!();
    println!("Global Options:");
    println!("  -v, --verbose    Enable verbose output");
    println!("  -h               Print short help");
    println!("      --help       Print detailed help");
    println!("  -V, --version    Print version");
    println!();
    println!("Examples:");
    println!("  circaphase fit -e expression.csv -o results/");
    println!();
    println!("  circaphase fit -e expression.csv -g clock_genes.csv -c config.json \\");
    println!("    --epochs 2000 --ensemble 10 --align -o results/");
    println!();
    println!("  circaphase predict -e new_cohort.csv -m results/model.json -o predictions/");
    println!();
    println!("  circaphase align -e expression.csv -p results/predictions.csv -o results/");
}

// ---------------------------------------------------------------------------
// Subcommand implementations
// ---------------------------------------------------------------------------

fn load_config(config_path: Option<&str>) -> Result<FitConfig> {
    match config_path {
        Some(path) => {
            info!("Loading configuration from: {}", path);
            FitConfig::from_json_file(path)
        }
        None => Ok(FitConfig::default()),
    }
}

fn configure_threads(threads: usize) {
    if threads > 0 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .ok();
    }
}

#[allow(clippy::too_many_arguments)]
fn run_fit_command(
    expression_path: &str,
    config_path: Option<&str>,
    seed_genes_path: Option<&str>,
    output_dir: &str,
    epochs: Option<usize>,
    ensemble: Option<usize>,
    components: Option<usize>,
    seed: Option<u64>,
    do_align: bool,
    cross_validate: bool,
    threads: usize,
) -> Result<()> {
    let mut config = load_config(config_path)?;

    // Command-line flags override the config file
    if let Some(n) = epochs {
        config.num_epochs = n;
    }
    if let Some(n) = ensemble {
        config.ensemble_size = n;
    }
    if let Some(n) = components {
        config.n_components = n;
    }
    if let Some(s) = seed {
        config.random_seed = s;
    }
    if cross_validate {
        config.cv_enabled = true;
    }
    if threads > 0 {
        config.threads = threads;
    }
    config.output_dir = output_dir.to_string();
    if config.model_path.is_empty() {
        config.model_path = Path::new(output_dir)
            .join("model.json")
            .to_string_lossy()
            .into_owned();
    }

    // Validate before touching any file
    config.validate()?;
    configure_threads(config.threads);
    std::fs::create_dir_all(output_dir)?;

    info!("Loading expression matrix from: {}", expression_path);
    let (expression, metadata) = read_expression_csv(expression_path, &config)?;
    info!(
        "  {} genes, {} samples ({} with collection times)",
        expression.n_genes(),
        expression.n_samples(),
        metadata.n_timed()
    );

    let seed_genes = match seed_genes_path {
        Some(path) => {
            info!("Loading seed gene list from: {}", path);
            let genes = read_seed_genes(path, &config)?;
            info!("  {} seed genes", genes.len());
            Some(genes)
        }
        None => None,
    };

    let dataset = PhaseDataSet::new(expression, metadata)?;
    let cv_input = if config.cv_enabled {
        Some(dataset.clone())
    } else {
        None
    };

    info!(
        "Fitting phase model (ensemble of {}, {} epochs)...",
        config.ensemble_size, config.num_epochs
    );
    let output = run_fit(dataset, seed_genes.as_deref(), &config)?;

    let out = Path::new(output_dir);
    config.to_json_file(out.join("config_used.json"))?;
    output.bundle.save(&config.model_path)?;
    info!("Model bundle written to: {}", config.model_path);

    output
        .results
        .write_detailed_csv(out.join("predictions_detailed.csv"))?;
    output.results.write_simple_csv(out.join("predictions.csv"))?;
    output.results.write_summary_json(out.join("summary.json"))?;
    write_loss_trace_csv(out.join("loss_trace.csv"), &output.loss_trace)?;

    // preprocessed values of the selected genes, as handed to the model
    let model_input = output.dataset.model_input()?;
    write_matrix_csv(
        out.join("selected_expression.csv"),
        &model_input.t().to_owned(),
        output.dataset.selected_genes()?,
        output.dataset.expression().sample_ids(),
        &config.gene_symbol_column,
        config.out_precision,
    )?;

    if do_align {
        info!("Aligning phases to the reference frame...");
        let phases = output.results.phases();
        let alignment = align_phases(output.dataset.expression(), &phases, &config)?;
        let aligned = alignment.apply_all(&phases);
        let aligned_results = PhaseResults::from_phases(
            &aligned,
            output.dataset.sample_metadata(),
            config.period_hours,
        )?;
        aligned_results.write_detailed_csv(out.join("predictions_aligned_detailed.csv"))?;
        aligned_results.write_simple_csv(out.join("predictions_aligned.csv"))?;
        aligned_results.write_summary_json(out.join("summary_aligned.json"))?;
        if !alignment.genes.is_empty() {
            write_gene_stats_csv(out.join("alignment_genes.csv"), &alignment.genes)?;
        }
    }

    if let Some(cv_dataset) = cv_input {
        info!("Running {}-fold cross-validation...", config.cv_folds);
        let report = run_cross_validation(&cv_dataset, &config)?;
        circaphase::crossval::write_report_json(out.join("crossval.json"), &report)?;
    }

    print_summary(&output.results.summary());
    Ok(())
}

fn run_predict_command(
    expression_path: &str,
    model_path: &str,
    output_dir: &str,
    threads: usize,
) -> Result<()> {
    configure_threads(threads);

    info!("Loading model bundle from: {}", model_path);
    let bundle = ModelBundle::load(model_path)?;
    info!(
        "  {} selected genes, {:.1} h period",
        bundle.selected_genes.len(),
        bundle.period_hours
    );

    info!("Loading expression matrix from: {}", expression_path);
    let (expression, metadata) = read_expression_csv(expression_path, &bundle.config)?;
    info!(
        "  {} genes, {} samples",
        expression.n_genes(),
        expression.n_samples()
    );

    let results = reapply_fit(&bundle, &expression, &metadata)?;

    std::fs::create_dir_all(output_dir)?;
    let out = Path::new(output_dir);
    results.write_detailed_csv(out.join("predictions_detailed.csv"))?;
    results.write_simple_csv(out.join("predictions.csv"))?;
    results.write_summary_json(out.join("summary.json"))?;

    print_summary(&results.summary());
    Ok(())
}

fn run_align_command(
    expression_path: &str,
    phases_path: &str,
    config_path: Option<&str>,
    output_dir: &str,
) -> Result<()> {
    let config = load_config(config_path)?;
    config.validate()?;

    info!("Loading expression matrix from: {}", expression_path);
    let (expression, metadata) = read_expression_csv(expression_path, &config)?;

    info!("Loading phase predictions from: {}", phases_path);
    let named_phases = read_phases_csv(phases_path)?;

    // Reorder the phases into matrix column order
    let mut phases = vec![f64::NAN; expression.n_samples()];
    let mut n_matched = 0;
    for (id, phi) in &named_phases {
        if let Some(s) = expression.sample_index(id) {
            phases[s] = *phi;
            n_matched += 1;
        } else {
            log::warn!("Phase for sample '{}' has no matching column", id);
        }
    }
    if n_matched < expression.n_samples() {
        return Err(CircaError::InvalidInput {
            reason: format!(
                "Phase file covers {} of {} samples in the expression matrix",
                n_matched,
                expression.n_samples()
            ),
        });
    }

    let alignment = align_phases(&expression, &phases, &config)?;
    let aligned = alignment.apply_all(&phases);
    let results = PhaseResults::from_phases(&aligned, &metadata, config.period_hours)?;

    std::fs::create_dir_all(output_dir)?;
    let out = Path::new(output_dir);
    results.write_detailed_csv(out.join("predictions_aligned_detailed.csv"))?;
    results.write_simple_csv(out.join("predictions_aligned.csv"))?;
    results.write_summary_json(out.join("summary_aligned.json"))?;
    if !alignment.genes.is_empty() {
        write_gene_stats_csv(out.join("alignment_genes.csv"), &alignment.genes)?;
    }

    let transform = serde_json::json!({
        "offset_radians": alignment.offset,
        "reflect": alignment.reflect,
        "mean_error_radians": alignment.mean_error,
        "n_reference_genes": alignment.genes.len(),
    });
    let file = std::fs::File::create(out.join("alignment.json"))?;
    serde_json::to_writer_pretty(std::io::BufWriter::new(file), &transform)?;

    info!(
        "Alignment: offset {:.4} rad, reflect {}, mean error {:.4} rad",
        alignment.offset, alignment.reflect, alignment.mean_error
    );
    Ok(())
}

fn print_summary(summary: &PhaseSummary) {
    println!();
    println!("Samples:              {}", summary.n_samples);
    println!("With known times:     {}", summary.n_evaluated);
    if summary.n_evaluated > 0 {
        println!("Mean error (h):       {:.2}", summary.mean_error_hours);
        println!("Median error (h):     {:.2}", summary.median_error_hours);
        println!("Circular correlation: {:.3}", summary.circular_rho);
        println!("Within 2 h:           {:.0}%", summary.frac_within_2h * 100.0);
        println!("Within 6 h:           {:.0}%", summary.frac_within_6h * 100.0);
    }
}
