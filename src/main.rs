//! tagtree - Convert between typed objects and tagged YAML trees

use std::process::ExitCode;

fn main() -> ExitCode {
    if let Err(e) = tagtree::cli::run() {
        eprintln!("Error: {:#}", e);
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
