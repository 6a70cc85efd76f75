use crate::cli::DiscoverArgs;
use crate::exit_codes;
use crate::output;
use bidci::bids::discover;
use std::collections::BTreeSet;
use std::path::Path;

pub fn execute(args: DiscoverArgs) -> i32 {
    let root = Path::new(&args.root);
    if !root.is_dir() {
        eprintln!("Error: Dataset root not found: {}", args.root);
        return exit_codes::INPUT_ERROR;
    }

    let recordings = match discover(root, &args.task) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Error: {}", e);
            return exit_codes::EXECUTION_ERROR;
        }
    };

    if args.json {
        if let Err(e) = output::emit_json(&recordings, false, None) {
            eprintln!("Error: {}", e);
            return exit_codes::EXECUTION_ERROR;
        }
        return exit_codes::SUCCESS;
    }

    if recordings.is_empty() {
        println!("No recordings for task '{}' under {}", args.task, args.root);
        return exit_codes::SUCCESS;
    }

    println!("{:<10} {:<10} {:<8} PATH", "SUBJECT", "SESSION", "RUN");
    println!("{}", "-".repeat(60));
    for rec in &recordings {
        println!(
            "{:<10} {:<10} {:<8} {}",
            rec.subject,
            rec.session.as_deref().unwrap_or("-"),
            rec.run.as_deref().unwrap_or("-"),
            rec.path.display()
        );
    }

    let subjects: BTreeSet<&str> = recordings.iter().map(|r| r.subject.as_str()).collect();
    let runs: BTreeSet<&str> = recordings.iter().filter_map(|r| r.run.as_deref()).collect();
    println!();
    println!("subjects: {:?}", subjects.into_iter().collect::<Vec<_>>());
    println!("runs: {:?}", runs.into_iter().collect::<Vec<_>>());

    exit_codes::SUCCESS
}
