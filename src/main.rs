//! mdlog CLI entry point
//!
//! The command's JSON report (or error object) goes to stdout; the exit
//! status identifies the error class.

use mdlog::cli;

fn main() {
    if let Err(e) = cli::run() {
        eprintln!("{}", e);
        std::process::exit(e.exit_code());
    }
}
