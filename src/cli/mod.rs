//! Command-line front end for jcli
//!
//! Subcommands:
//! - `run`: push a local pipeline script to a job, build it and stream the log
//! - `follow`: stream the console of a build that is already running
//! - `auth`: verify and store an API key for a server
//! - `connect`: verify the stored API key still grants access
//! - `completions`: generate shell completions

pub mod auth;
pub mod completions;
pub mod run;

use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};

use jcli::infrastructure::{
    Config, CredentialStore, EnvOverride, FileCredentialStore, default_log_path,
    init_file_logging, init_logging,
};
use jcli::jenkins::{JenkinsClient, ServerSession};

/// CLI arguments for jcli
#[derive(Parser, Debug)]
#[command(name = "jcli")]
#[command(author, version, about = "Push pipeline scripts to Jenkins and watch them run", long_about = None)]
struct Args {
    /// Address of the Jenkins server
    #[arg(short, long, global = true)]
    address: Option<String>,

    /// Jenkins user
    #[arg(short, long, global = true)]
    user: Option<String>,

    /// Configuration file (defaults to <config dir>/jcli/config.yaml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Install a pipeline script into a job, build it and stream its console
    Run {
        /// Pipeline script (.groovy, .gvy or Jenkinsfile)
        #[arg(short, long)]
        file: PathBuf,
        /// Job name (defaults to the file name without extension)
        #[arg(short, long)]
        job: Option<String>,
        /// Print console output line by line instead of the full-screen view
        #[arg(long)]
        plain: bool,
        /// Keep `[Pipeline]` step-tracing lines
        #[arg(long)]
        no_filter: bool,
    },

    /// Stream the console of a running build
    Follow {
        /// Build URL, e.g. https://ci.example.com/job/demo/7/
        url: String,
        /// Print console output line by line instead of the full-screen view
        #[arg(long)]
        plain: bool,
        /// Keep `[Pipeline]` step-tracing lines
        #[arg(long)]
        no_filter: bool,
    },

    /// Verify an API token and store it for later commands
    Auth {
        /// API token to store
        #[arg(short, long)]
        token: String,
        /// Overwrite an existing token without asking
        #[arg(short, long)]
        yes: bool,
    },

    /// Check that the stored API token still grants access
    Connect,

    /// Generate shell completions
    Completions {
        /// Shell type
        #[arg(value_enum)]
        shell: ShellArg,
        /// Output file (stdout if not specified)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum ShellArg {
    Bash,
    Zsh,
    Fish,
    PowerShell,
}

impl Command {
    /// Whether this command takes over the terminal
    fn uses_tui(&self) -> bool {
        match self {
            Self::Run { plain, .. } | Self::Follow { plain, .. } => {
                !plain && std::io::stdout().is_terminal()
            }
            _ => false,
        }
    }
}

/// Server, user and settings a command works against
#[derive(Debug)]
pub struct Target {
    /// Loaded configuration
    pub config: Config,
    /// Jenkins server address
    pub address: String,
    /// Jenkins user
    pub user: String,
}

impl Target {
    fn resolve(args_address: Option<String>, args_user: Option<String>, config: Config) -> Result<Self> {
        let Some(address) = args_address.or_else(|| config.address.clone()) else {
            bail!("No Jenkins address given; pass --address or set `address` in the configuration file");
        };
        let Some(user) = args_user.or_else(|| config.user.clone()) else {
            bail!("No Jenkins user given; pass --user or set `user` in the configuration file");
        };
        Ok(Self {
            config,
            address,
            user,
        })
    }

    /// Builds a client with the given API key
    ///
    /// # Errors
    ///
    /// Returns an error if the address is not a valid http(s) URL.
    pub fn client_with_key(&self, api_key: &str) -> Result<JenkinsClient> {
        let session = ServerSession::new(&self.address, self.user.clone(), api_key)
            .with_context(|| format!("Invalid Jenkins address '{}'", self.address))?;
        Ok(JenkinsClient::with_timeout(
            session,
            self.config.request_timeout(),
        )?)
    }

    /// Builds a client with the stored (or `JCLI_API_KEY`) API key
    ///
    /// # Errors
    ///
    /// Returns an error if no key is stored for this server and user.
    pub fn client(&self) -> Result<JenkinsClient> {
        let store = EnvOverride::from_env(FileCredentialStore::default_location()?);
        let Some(api_key) = store.load(&self.address, &self.user)? else {
            bail!(
                "No API token stored for {} on {}; run `jcli auth --token <token>` first",
                self.user,
                self.address
            );
        };
        self.client_with_key(&api_key)
    }
}

/// Build the CLI command for completion generation
pub fn build_cli() -> clap::Command {
    Args::command()
}

fn load_config(path: Option<PathBuf>) -> Result<Config> {
    match path.or_else(Config::default_path) {
        Some(path) => Ok(Config::load(&path)?),
        None => Ok(Config::default()),
    }
}

fn start_logging(config: &Config, tui: bool) {
    if tui {
        if let Some(path) = default_log_path() {
            if init_file_logging(&config.log_level, &path).is_ok() {
                return;
            }
        }
        // Without a log file, stay quiet rather than draw over the screen.
        init_logging("off");
    } else {
        init_logging(&config.log_level);
    }
}

/// Parse and execute CLI arguments
pub async fn run() -> Result<()> {
    let args = Args::parse();

    if let Command::Completions { shell, output } = &args.command {
        use clap_complete::Shell;

        let shell_enum = match *shell {
            ShellArg::Bash => Shell::Bash,
            ShellArg::Zsh => Shell::Zsh,
            ShellArg::Fish => Shell::Fish,
            ShellArg::PowerShell => Shell::PowerShell,
        };

        let completions = completions::generate_completions(shell_enum)?;

        if let Some(output_path) = output {
            completions::save_completions(&completions, output_path)?;
        } else {
            println!("{}", completions);
        }
        return Ok(());
    }

    let config = load_config(args.config)?;
    let tui = args.command.uses_tui();
    start_logging(&config, tui);
    let target = Target::resolve(args.address, args.user, config)?;

    match args.command {
        Command::Run {
            file,
            job,
            plain: _,
            no_filter,
        } => {
            let options = run::RunOptions {
                file,
                job,
                tui,
                filter_markers: !no_filter && target.config.filter_pipeline_markers,
            };
            run::run_pipeline(&target, options).await?;
        }
        Command::Follow {
            url,
            plain: _,
            no_filter,
        } => {
            let filter_markers = !no_filter && target.config.filter_pipeline_markers;
            run::follow_build(&target, &url, tui, filter_markers).await?;
        }
        Command::Auth { token, yes } => {
            auth::authenticate(&target, &token, yes).await?;
        }
        Command::Connect => {
            auth::connect(&target).await?;
        }
        Command::Completions { .. } => {}
    }

    Ok(())
}
