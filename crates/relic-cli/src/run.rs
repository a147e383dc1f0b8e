use std::fmt;
use std::io::Write;
use std::path::PathBuf;

use miette::IntoDiagnostic;

use relic_engine::{Engine, EngineEvent, LaunchOutcome, SessionState};

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

use crate::config::parse_config;
use crate::render;
use crate::repl::{HELP, ReplCommand};

/// Runs the subcommand launching a target and debugging it interactively.
pub fn evaluate_run(config: &str, target: PathBuf) -> miette::Result<i32> {
    let config = parse_config(config)?.into_engine_config();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .into_diagnostic()?;

    runtime.block_on(async move {
        let engine = Engine::new(config);

        let printer = tokio::spawn(print_events(engine.subscribe()));
        let mut session_events = engine.subscribe();

        let outcome = engine.launch(&target).await;

        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(e) => {
                printer.abort();
                return Err(e).into_diagnostic();
            }
        };

        let written = match outcome {
            LaunchOutcome::Debugging { pid, debugger } => writeln!(
                std::io::stdout(),
                "[relic] debugging pid {pid} with {} ({})",
                debugger.path.display(),
                debugger.version
            ),
            LaunchOutcome::DebuggingUnavailable { pid, reason } => {
                let pid = pid.map_or_else(|| "unknown".to_owned(), |pid| pid.to_string());
                writeln!(
                    std::io::stdout(),
                    "[relic] target running without debugger (pid {pid}): {reason}"
                )
            }
        };

        written.into_diagnostic()?;

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut stdin_open = true;

        loop {
            tokio::select! {
                line = lines.next_line(), if stdin_open => {
                    let Some(line) = line.into_diagnostic()? else {
                        stdin_open = false;
                        continue;
                    };

                    match ReplCommand::parse(&line) {
                        Ok(Some(ReplCommand::Quit)) => break,
                        Ok(Some(command)) => {
                            if let Err(e) = execute(&engine, command).await {
                                report(format_args!("{e:?}"));
                            }
                        }
                        Ok(None) => (),
                        Err(e) => report(e),
                    }
                }
                () = target_ended(&mut session_events) => break,
                _ = tokio::signal::ctrl_c() => break,
            }
        }

        engine.stop().await;
        printer.abort();

        Ok(0)
    })
}

fn report(error: impl fmt::Display) {
    let _ = writeln!(std::io::stderr(), "{error}");
}

async fn execute(engine: &Engine, command: ReplCommand) -> miette::Result<()> {
    let mut output = std::io::stdout();

    // pauses and breakpoint changes are printed from their events
    match command {
        ReplCommand::Pause => {
            engine.pause().await.into_diagnostic()?;
        }
        ReplCommand::Continue => engine.resume().await.into_diagnostic()?,
        ReplCommand::Step => {
            engine.step().await.into_diagnostic()?;
        }
        ReplCommand::Next => {
            engine.step_over().await.into_diagnostic()?;
        }
        ReplCommand::Break(location) => {
            engine.set_breakpoint(&location).await.into_diagnostic()?;
        }
        ReplCommand::Delete(id) => engine.remove_breakpoint(&id).await.into_diagnostic()?,
        ReplCommand::Breakpoints => {
            engine.list_breakpoints().await.into_diagnostic()?;
        }
        ReplCommand::Registers => {
            let registers = engine.registers().await.into_diagnostic()?;
            writeln!(
                output,
                "{}",
                render::document_to_text(render::registers_to_kdl(&registers))
            )
            .into_diagnostic()?;
        }
        ReplCommand::Backtrace => {
            let frames = engine.backtrace().await.into_diagnostic()?;
            writeln!(output, "{}", render::document_to_text(render::frames_to_kdl(&frames)))
                .into_diagnostic()?;
        }
        ReplCommand::Examine { address, size } => {
            let block = engine.read_memory(&address, size).await.into_diagnostic()?;
            writeln!(output, "{}", render::document_to_text(render::memory_to_kdl(&block)))
                .into_diagnostic()?;
        }
        ReplCommand::Write { address, data } => {
            engine.write_memory(&address, &data).await.into_diagnostic()?;
            writeln!(output, "[relic] wrote {} bytes at {address}", data.len() / 2)
                .into_diagnostic()?;
        }
        ReplCommand::State => match engine.target_pid() {
            Some(pid) => writeln!(output, "[relic] {} (pid {pid})", engine.state()),
            None => writeln!(output, "[relic] {}", engine.state()),
        }
        .into_diagnostic()?,
        ReplCommand::Help => writeln!(output, "{HELP}").into_diagnostic()?,
        ReplCommand::Quit => (),
    }

    Ok(())
}

async fn print_events(mut events: broadcast::Receiver<EngineEvent>) {
    loop {
        match events.recv().await {
            Ok(event) => {
                if let Some(text) = render::event_to_text(&event) {
                    if writeln!(std::io::stdout(), "{text}").is_err() {
                        break;
                    }
                }
            }
            Err(RecvError::Lagged(missed)) => {
                report(format_args!("[relic] {missed} events dropped"));
            }
            Err(RecvError::Closed) => break,
        }
    }
}

/// Waits until the session goes back to [SessionState::Stopped].
async fn target_ended(events: &mut broadcast::Receiver<EngineEvent>) {
    loop {
        match events.recv().await {
            Ok(EngineEvent::StateChanged {
                to: SessionState::Stopped,
                ..
            })
            | Err(RecvError::Closed) => break,
            Ok(_) | Err(RecvError::Lagged(_)) => (),
        }
    }
}
