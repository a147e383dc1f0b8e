use std::path::PathBuf;

/// The Relic debug backend.
#[derive(clap::Parser)]
pub struct CliOpts {
    /// The command to run.
    #[clap(subcommand)]
    pub action: CliAction,
}

/// The command to run.
#[derive(clap::Subcommand)]
pub enum CliAction {
    /// Command to launch a target in its host and debug it interactively.
    ///
    /// Debugger commands are read line by line from the standard input
    /// (`help` lists them).
    Run {
        /// Engine configuration (KDL format).
        ///
        /// If it ends with `.kdl`, it is treated as a path to a configuration
        /// file. Otherwise it is directly parsed as inline KDL-formatted
        /// configuration.
        #[clap(short, long, value_name = "CONTENT/PATH")]
        config: String,

        /// Path of the target to run in the host.
        target: PathBuf,
    },

    /// Command to report the debugger binary that would be used.
    Probe {
        /// Engine configuration (KDL format), see `run`.
        #[clap(short, long, value_name = "CONTENT/PATH", default_value = "")]
        config: String,
    },

    /// Command to list the PIDs of the processes with the given name.
    Pids {
        /// Executable name of the processes.
        name: String,
    },
}

impl CliOpts {
    /// Parses the CLI from the command-line.
    ///
    /// # Warning
    ///
    /// Exits on error.
    pub fn parse_from_cmdline() -> Self {
        <Self as clap::Parser>::parse()
    }
}
