#![allow(missing_docs)]
#![allow(clippy::print_stderr)]

use relic_cli::{CliAction, CliOpts};

use tracing_subscriber::EnvFilter;

fn main() {
    let cli = CliOpts::parse_from_cmdline();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_env_var("RELIC_LOG")
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .init();

    let res = match cli.action {
        CliAction::Run { config, target } => relic_cli::evaluate_run(&config, target),
        CliAction::Probe { config } => relic_cli::evaluate_probe(&config).map(|()| 0),
        CliAction::Pids { name } => relic_cli::evaluate_pids(&name),
    };

    match res {
        Ok(exit_code) => std::process::exit(exit_code),
        Err(e) => {
            eprintln!("{e:?}");
            std::process::exit(1);
        }
    }
}
