use clap::Parser;
use nhanes_idwa::cli::{args::Args, commands};
use std::process;

fn main() {
    // Parse command line arguments
    let args = Args::parse();

    // If no subcommand was provided, show help and available commands
    if args.command.is_none() {
        show_help_and_commands();
        process::exit(0);
    }

    match commands::run(args) {
        Ok(()) => process::exit(0),
        Err(error) => {
            eprintln!("Error: {:#}", error);
            process::exit(1);
        }
    }
}

/// Show help information and available commands when no subcommand is provided
fn show_help_and_commands() {
    println!("NHANES IDWA - Iron Deficiency Without Anemia Cohort Pipeline");
    println!("============================================================");
    println!();
    println!("Derive an analytic cohort of non-pregnant women aged 18-45 from pooled");
    println!("NHANES cycles and classify iron deficiency without anemia.");
    println!();
    println!("USAGE:");
    println!("    nhanes-idwa <COMMAND> [OPTIONS]");
    println!();
    println!("COMMANDS:");
    println!("    run         Run the cohort derivation pipeline (main command)");
    println!("    inventory   Show which cycles are present for each dataset");
    println!("    help        Show this help message or help for specific commands");
    println!();
    println!("OPTIONS:");
    println!("    -h, --help       Show help information");
    println!("    -V, --version    Show version information");
    println!();
    println!("EXAMPLES:");
    println!("    # Pool every cycle found under ./data:");
    println!("    nhanes-idwa run");
    println!();
    println!("    # Selected cycles with custom paths:");
    println!("    nhanes-idwa run --data-dir /path/to/nhanes --output-dir /path/to/output \\");
    println!("                    --cycles D,E,F,G");
    println!();
    println!("    # Check data completeness first:");
    println!("    nhanes-idwa inventory --data-dir /path/to/nhanes");
    println!();
    println!("For detailed help on any command, use:");
    println!("    nhanes-idwa <COMMAND> --help");
}
