use crate::cli::ValidateArgs;
use crate::exit_codes;
use crate::output;
use bidci::error::FieldError;
use bidci::{BidsDataLoader, Config};
use serde::Serialize;

#[derive(Serialize)]
struct ValidateOutput {
    config: String,
    valid: bool,
    errors: Vec<FieldError>,
    task: Option<String>,
    pairs: usize,
    missing_recordings: Vec<String>,
    error: Option<String>,
}

pub fn execute(args: ValidateArgs) -> i32 {
    let mut result = ValidateOutput {
        config: args.config.clone(),
        valid: false,
        errors: Vec::new(),
        task: None,
        pairs: 0,
        missing_recordings: Vec::new(),
        error: None,
    };

    match Config::from_yaml_file(&args.config) {
        Ok(config) => {
            result.task = Some(config.task.clone());
            if config.subjects.is_empty() || config.runs.is_empty() {
                result.error = Some("subjects and runs must both list at least one entry".into());
            } else {
                for subject in &config.subjects {
                    for run in &config.runs {
                        result.pairs += 1;
                        let loader = BidsDataLoader::new(&config, subject, run);
                        if loader.bids_path().ensure_exists().is_err() {
                            result
                                .missing_recordings
                                .push(loader.bids_path().fpath().display().to_string());
                        }
                    }
                }
                if !result.missing_recordings.is_empty() {
                    result.error = Some(format!(
                        "{} of {} recording(s) not found",
                        result.missing_recordings.len(),
                        result.pairs
                    ));
                }
            }
        }
        Err(e) => {
            result.errors = e.field_errors().to_vec();
            result.error = Some(e.to_string());
        }
    }
    result.valid = result.error.is_none();

    if args.json {
        if let Err(e) = output::emit_json(&result, false, None) {
            eprintln!("Error: {}", e);
            return exit_codes::EXECUTION_ERROR;
        }
    } else if result.valid {
        println!(
            "Valid: {} ({} recording(s) for task {})",
            result.config,
            result.pairs,
            result.task.as_deref().unwrap_or("")
        );
    } else {
        eprintln!("Invalid: {}", result.config);
        for field in &result.errors {
            eprintln!("  {}", field);
        }
        for path in &result.missing_recordings {
            eprintln!("  Recording not found: {}", path);
        }
        if result.errors.is_empty() && result.missing_recordings.is_empty() {
            if let Some(ref err) = result.error {
                eprintln!("  {}", err);
            }
        }
    }

    if result.valid {
        exit_codes::SUCCESS
    } else {
        exit_codes::INPUT_ERROR
    }
}
