use crate::cli::RunArgs;
use crate::exit_codes;
use crate::output;
use bidci::{
    find_bridge, BidciError, BridgeBackend, Config, DatasetManager, DryRunBackend, PipelineReport,
    SignalBackend,
};
use std::time::Instant;

pub fn execute(args: RunArgs) -> i32 {
    let mut config = match Config::from_yaml_file(&args.config) {
        Ok(c) => c,
        Err(e) => {
            output::print_config_error(&e);
            return exit_codes::INPUT_ERROR;
        }
    };
    if args.continue_on_error {
        config.continue_on_error = true;
    }

    if !args.quiet {
        eprintln!(
            "Running {} on {} (subjects: {}, runs: {})...",
            config.task,
            config.bids_root.display(),
            config.subjects.join(", "),
            config.runs.join(", ")
        );
    }

    if args.dry_run {
        if !args.quiet {
            eprintln!("  Dry run: no signal processing, no figure files");
        }
        return run_pipeline(DatasetManager::new(config, DryRunBackend::new()), &args);
    }

    let bridge_path = match find_bridge(args.bridge.as_deref()) {
        Some(p) => p,
        None => {
            eprintln!(
                "Error: {} not found. Set $BIDCI_BRIDGE_PATH or use --bridge",
                bidci::bridge::BRIDGE_NAME
            );
            return exit_codes::BRIDGE_NOT_FOUND;
        }
    };
    let backend = match BridgeBackend::spawn(&bridge_path) {
        Ok(b) => b,
        Err(e) => {
            eprintln!("Error: {}", e);
            return exit_codes::BRIDGE_NOT_FOUND;
        }
    };

    run_pipeline(DatasetManager::new(config, backend), &args)
}

fn run_pipeline<B: SignalBackend>(mut manager: DatasetManager<B>, args: &RunArgs) -> i32 {
    let start_time = Instant::now();

    let report = match manager.run(args.with_plots()) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Error: {}", e);
            return exit_code_for(&e);
        }
    };

    if let Err(e) = output::emit_json(&report, args.compact, args.output.as_deref()) {
        eprintln!("Error: {}", e);
        return exit_codes::EXECUTION_ERROR;
    }

    if !args.quiet {
        print_summary(&report, start_time.elapsed().as_secs_f64());
        if let Some(ref path) = args.output {
            eprintln!("Report written to {}", path);
        }
    }

    if report.failures.is_empty() {
        exit_codes::SUCCESS
    } else {
        exit_codes::PARTIAL_FAILURE
    }
}

fn print_summary(report: &PipelineReport, elapsed_secs: f64) {
    let saved_label = if report.dry_run {
        "planned (dry run, not written)"
    } else {
        "saved"
    };
    for rec in &report.recordings {
        eprintln!(
            "  sub-{} run-{}: {} epochs × {} channels, {} figure(s) {}, {} shown",
            rec.subject,
            rec.run,
            rec.epochs.n_epochs,
            rec.epochs.n_channels,
            rec.figures.saved.len(),
            saved_label,
            rec.figures.shown
        );
        for warning in &rec.warnings {
            eprintln!("    Warning: {}", warning);
        }
    }
    for failure in &report.failures {
        eprintln!(
            "  sub-{} run-{}: {} failed: {}",
            failure.subject, failure.run, failure.stage, failure.error
        );
    }
    let total = report.recordings.len() + report.failures.len();
    eprintln!(
        "Pipeline complete: {}/{} succeeded, {}/{} failed, {:.1}s",
        report.recordings.len(),
        total,
        report.failures.len(),
        total,
        elapsed_secs
    );
}

fn exit_code_for(err: &BidciError) -> i32 {
    match err {
        BidciError::Config(_) | BidciError::NotFound(_) => exit_codes::INPUT_ERROR,
        BidciError::BridgeNotFound(_) => exit_codes::BRIDGE_NOT_FOUND,
        _ => exit_codes::EXECUTION_ERROR,
    }
}
