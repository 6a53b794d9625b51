use clap::Parser;
use proclaunch::LaunchError;
use std::path::PathBuf;

/// proclaunch - run one program with redirected streams
///
/// Launches the command with the requested working directory, environment
/// and standard stream setup, forwards termination signals to it, and exits
/// with its exit code.
#[derive(Parser, Debug)]
#[command(
    name = "proclaunch",
    version,
    about = "Run a program with a configured environment and standard streams",
    long_about = "Run a program with a configured environment and standard streams.\n\
                  The command is looked up in PATH unless it contains a directory separator.\n\
                  Exit status is the child's, 127 when it cannot be found, 126 when it cannot\n\
                  be executed, and 128+N when it was killed by signal N."
)]
pub struct Cli {
    /// Working directory of the command
    #[arg(short = 'C', long = "chdir", value_name = "dir")]
    pub work_dir: Option<PathBuf>,

    /// Set an environment variable
    #[arg(short = 'e', long = "env", value_name = "KEY=VALUE")]
    pub env: Vec<String>,

    /// Remove a variable from the environment
    #[arg(short = 'u', long = "unset", value_name = "KEY")]
    pub unset: Vec<String>,

    /// Start from an empty environment
    #[arg(short = 'i', long = "clear-env")]
    pub clear_env: bool,

    /// Connect the command's stdin to the null device
    #[arg(short = 'n', long = "null-stdin")]
    pub null_stdin: bool,

    /// Discard the command's stdout and stderr
    #[arg(short = 'q', long = "quiet", conflicts_with_all = ["capture", "merge_stderr"])]
    pub quiet: bool,

    /// Send the command's stderr to its stdout
    #[arg(short = 'm', long = "merge-stderr")]
    pub merge_stderr: bool,

    /// Read the command's stdout through a pipe and print it line by line
    #[arg(short = 'c', long = "capture")]
    pub capture: bool,

    /// Run the command in its own process group (job object on Windows)
    #[arg(short = 'g', long = "group")]
    pub group: bool,

    /// Be verbose about what you're doing (-vv for trace output)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Command and its arguments to execute
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }

    /// Validate the parsed arguments
    pub fn validate(&self) -> Result<(), LaunchError> {
        if self.command.is_empty() {
            return Err(LaunchError::InvalidArgument(
                "No command specified".to_string(),
            ));
        }

        if let Some(ref dir) = self.work_dir {
            if !dir.is_dir() {
                return Err(LaunchError::InvalidArgument(format!(
                    "Not a directory: {}",
                    dir.display()
                )));
            }
        }

        self.env_pairs()?;
        Ok(())
    }

    /// `--env` entries split into key and value.
    pub fn env_pairs(&self) -> Result<Vec<(&str, &str)>, LaunchError> {
        self.env
            .iter()
            .map(|entry| match entry.split_once('=') {
                Some((key, value)) if !key.is_empty() => Ok((key, value)),
                _ => Err(LaunchError::InvalidArgument(format!(
                    "Expected KEY=VALUE, got '{}'",
                    entry
                ))),
            })
            .collect()
    }

    /// Log level selected by `-v`, or `None` to defer to `RUST_LOG`.
    pub fn log_level(&self) -> Option<log::LevelFilter> {
        match self.verbose {
            0 => None,
            1 => Some(log::LevelFilter::Debug),
            _ => Some(log::LevelFilter::Trace),
        }
    }
}
