//! jcli - push pipeline scripts to Jenkins and watch them run
//!
//! ## Commands
//!
//! - `jcli auth` - Verify and store an API token
//! - `jcli connect` - Check the stored token still works
//! - `jcli run` - Install a script into a job, build it and stream the log
//! - `jcli follow` - Stream the console of a running build
//! - `jcli completions` - Generate shell completions
//!
//! ## Quick Start
//!
//! ```bash
//! # Store a token once per server and user
//! jcli auth -a https://ci.example.com -u alice --token 11abcdef
//!
//! # Run demo.groovy as job "demo" and watch it
//! jcli run -a https://ci.example.com -u alice --file demo.groovy
//!
//! # Same, without the full-screen view
//! jcli run -a https://ci.example.com -u alice --file demo.groovy --plain
//!
//! # Generate shell completions
//! jcli completions bash > ~/.local/share/bash-completion/completions/jcli
//! ```

use std::process::ExitCode;

mod cli;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    match cli::run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            if std::env::var("JCLI_VERBOSE").is_ok() {
                eprintln!("{:?}", e);
            }
            ExitCode::FAILURE
        }
    }
}
