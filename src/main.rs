use clap::Parser;
use fluxrun::FluxRunError;
use fluxrun::cli::{self, Args};
use fluxrun::constants::FATAL_EXIT_CODE;
use std::process;

fn main() {
    // Parse command line arguments
    let args = Args::parse();

    // If no subcommand was provided, show help and available commands
    let Some(command) = args.command else {
        show_help_and_commands();
        process::exit(0);
    };

    let runtime = tokio::runtime::Runtime::new().unwrap_or_else(|e| {
        eprintln!("Failed to create async runtime: {}", e);
        process::exit(FATAL_EXIT_CODE);
    });

    let result = runtime.block_on(async {
        // Dropping the run kills a running EddyPro child process
        tokio::select! {
            result = cli::run(command) => result,
            _ = tokio::signal::ctrl_c() => {
                eprintln!("\nReceived CTRL+C, stopping run...");
                Err(anyhow::anyhow!("Run interrupted by user"))
            }
        }
    });

    match result {
        Ok(()) => process::exit(0),
        Err(error) => {
            eprintln!("Error: {:#}", error);
            let code = error
                .downcast_ref::<FluxRunError>()
                .map(FluxRunError::exit_code)
                .unwrap_or(FATAL_EXIT_CODE);
            process::exit(code);
        }
    }
}

/// Show help information and available commands when no subcommand is provided
fn show_help_and_commands() {
    println!("fluxrun - EddyPro flux processing runner");
    println!("========================================");
    println!();
    println!("Stage eddy covariance raw data files into a run folder, check their");
    println!("numeric content and run the EddyPro flux calculations on them.");
    println!();
    println!("USAGE:");
    println!("    fluxrun <COMMAND> [OPTIONS]");
    println!();
    println!("COMMANDS:");
    println!("    run     Run the flux processing pipeline");
    println!("    init    Write a settings file with default values");
    println!("    help    Show this help message or help for specific commands");
    println!();
    println!("EXAMPLES:");
    println!("    # Run with the settings in the user config folder:");
    println!("    fluxrun run");
    println!();
    println!("    # Run with the settings stored in a site folder, last 2 days only:");
    println!("    fluxrun run --folder /data/CH-DAV/settings --days 2");
    println!();
    println!("    # Create a settings file to edit:");
    println!("    fluxrun init --output fluxrunsettings.yaml");
    println!();
    println!("For detailed help on any command, use:");
    println!("    fluxrun <COMMAND> --help");
}
