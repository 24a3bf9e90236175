use anyhow::{Context, Result};
use clap::Parser;
use safejs::cli::Cli;
use safejs::config::{discover_config, load_config, load_config_from};
use safejs::guard::analyze_files;
use safejs::io::{create_writer, FileWalker, GuardSummary, OutputWriter};
use safejs::observability::{
    init_tracing, install_panic_hook, set_phase, set_progress, AnalysisPhase,
};
use std::process::ExitCode;

/// Exit status when at least one diagnostic was reported.
const EXIT_DIAGNOSTICS: u8 = 3;

fn main() -> ExitCode {
    install_panic_hook();
    let cli = Cli::parse();
    init_tracing(cli.verbosity);

    match run(&cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(EXIT_DIAGNOSTICS),
        Err(err) => {
            eprintln!("jsguard: {err:#}");
            ExitCode::FAILURE
        }
    }
}

/// Returns whether the run was clean.
fn run(cli: &Cli) -> Result<bool> {
    let _phase = set_phase(AnalysisPhase::Configuration);
    let config = match &cli.config {
        Some(path) => load_config_from(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => match cli.paths.first().filter(|p| p.is_dir()) {
            Some(dir) => discover_config(dir),
            None => load_config(),
        },
    };
    let analyzer = cli.apply_overrides(config.analyzer);
    tracing::debug!(?analyzer, "effective configuration");

    let _phase = set_phase(AnalysisPhase::FileDiscovery);
    let files = FileWalker::new(cli.paths.clone())
        .with_ignore_patterns(&analyzer.ignore)?
        .walk()
        .context("Failed to collect files")?;
    tracing::info!(files = files.len(), "discovered files");

    let _phase = set_phase(AnalysisPhase::Analysis);
    set_progress(0, files.len());
    let reports = analyze_files(&files, &analyzer.guard_options(), !cli.no_parallel)?;

    let _phase = set_phase(AnalysisPhase::OutputGeneration);
    let summary = GuardSummary::new(&reports);
    let mut writer: Box<dyn OutputWriter> = create_writer(cli.format);
    writer.write_summary(&summary)?;
    Ok(summary.is_clean())
}
