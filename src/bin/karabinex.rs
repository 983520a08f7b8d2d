// Karabinex CLI
// Build, apply and watch Karabiner-Elements configs from TOML layer files

#[path = "../cli/mod.rs"]
mod cli;

use clap::Parser;

use cli::Cli;

fn main() {
    let args = Cli::parse();
    cli::init_logging(args.verbose);

    match cli::run(args) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}
