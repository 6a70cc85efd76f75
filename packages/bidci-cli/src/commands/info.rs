use crate::cli::InfoArgs;
use crate::exit_codes;
use crate::output;
use bidci::bridge::{find_bridge, BRIDGE_NAME, DEFAULT_BRIDGE_PATHS};
use bidci::config::FigureFormat;
use serde::Serialize;

#[derive(Serialize)]
struct InfoOutput {
    cli_version: String,
    bridge_name: &'static str,
    bridge_path: Option<String>,
    bridge_found: bool,
    platform: String,
    arch: String,
    search_paths: Vec<&'static str>,
    figure_formats: Vec<&'static str>,
}

pub fn execute(args: InfoArgs) -> i32 {
    let bridge_path = find_bridge(args.bridge.as_deref());

    let info = InfoOutput {
        cli_version: env!("CARGO_PKG_VERSION").to_string(),
        bridge_name: BRIDGE_NAME,
        bridge_path: bridge_path.as_ref().map(|p| p.display().to_string()),
        bridge_found: bridge_path.is_some(),
        platform: std::env::consts::OS.to_string(),
        arch: std::env::consts::ARCH.to_string(),
        search_paths: DEFAULT_BRIDGE_PATHS.to_vec(),
        figure_formats: FigureFormat::SUPPORTED.to_vec(),
    };

    if args.json {
        if let Err(e) = output::emit_json(&info, false, None) {
            eprintln!("Error: {}", e);
            return exit_codes::EXECUTION_ERROR;
        }
    } else {
        println!("bidci CLI v{}", info.cli_version);
        println!("Platform: {} ({})", info.platform, info.arch);
        println!();
        match info.bridge_path {
            Some(ref path) => println!("Bridge: {}", path),
            None => println!("Bridge: not found"),
        }
        println!("Bridge name: {}", info.bridge_name);
        println!(
            "Search paths: $BIDCI_BRIDGE_PATH, $BIDCI_HOME/bin, {}",
            info.search_paths.join(", ")
        );
        println!("Figure formats: {}", info.figure_formats.join(", "));
    }

    exit_codes::SUCCESS
}
