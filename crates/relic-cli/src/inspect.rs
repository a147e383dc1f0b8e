use std::io::Write;

use miette::IntoDiagnostic;

use relic_engine::{ProcessRegistry, SystemRegistry, locate_debugger};

use crate::config::parse_config;

/// Runs the subcommand reporting the debugger binary that would be used.
pub fn evaluate_probe(config: &str) -> miette::Result<()> {
    let config = parse_config(config)?.into_engine_config();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .into_diagnostic()?;

    let debugger = runtime.block_on(locate_debugger(
        &config.debugger_candidates,
        config.timings.probe_timeout,
    ));

    let Some(debugger) = debugger else {
        let candidates = config
            .debugger_candidates
            .iter()
            .map(|candidate| candidate.display().to_string())
            .collect::<Vec<_>>()
            .join(", ");

        miette::bail!("no usable debugger among: {candidates}");
    };

    writeln!(
        std::io::stdout(),
        "{} ({})",
        debugger.path.display(),
        debugger.version
    )
    .into_diagnostic()
}

/// Runs the subcommand listing the PIDs of the processes with a given name.
///
/// Returns the exit code: 1 when no process matched.
pub fn evaluate_pids(name: &str) -> miette::Result<i32> {
    let mut pids: Vec<_> = SystemRegistry.pids_by_name(name).into_iter().collect();
    pids.sort_unstable();

    let mut output = std::io::stdout().lock();

    for pid in &pids {
        writeln!(output, "{pid}").into_diagnostic()?;
    }

    Ok(i32::from(pids.is_empty()))
}
