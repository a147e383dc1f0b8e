use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use miette::IntoDiagnostic;

use relic_engine::{EngineConfig, HelperCommand, Timings};

/// Configuration of the debug engine, as written by users.
#[derive(Debug, Default, PartialEq, knus::Decode)]
pub struct RelicConfig {
    /// Path to the host program.
    #[knus(child, unwrap(argument))]
    pub host: Option<String>,

    /// Arguments passed to the host before the target path.
    #[knus(children(name = "host-arg"))]
    pub host_args: Vec<Values>,

    /// Name of the process the target runs as.
    #[knus(child, unwrap(argument))]
    pub process_name: Option<String>,

    /// Command line prefix spawning the host.
    ///
    /// A node without arguments spawns the host directly.
    #[knus(child)]
    pub indirection: Option<Values>,

    /// Debugger binaries to try, in order.
    #[knus(children(name = "debugger"))]
    pub debuggers: Vec<Values>,

    /// Signals passed to the target without stopping it.
    #[knus(children(name = "pass-signal"))]
    pub pass_signals: Vec<Values>,

    /// Command forcing a debug break into the target.
    ///
    /// A node without arguments disables the platform default.
    #[knus(child)]
    pub interrupt_helper: Option<Values>,

    /// Delay between spawning the host and resolving the target PID.
    #[knus(child, unwrap(argument))]
    pub settle_delay_ms: Option<u64>,

    /// Default reply window of a debugger command.
    #[knus(child, unwrap(argument))]
    pub request_timeout_ms: Option<u64>,

    /// Reply window of the attach command.
    #[knus(child, unwrap(argument))]
    pub attach_timeout_ms: Option<u64>,

    /// Maximum wait for a stop after an interrupt or a step.
    #[knus(child, unwrap(argument))]
    pub stop_timeout_ms: Option<u64>,

    /// Maximum duration of a debugger version probe.
    #[knus(child, unwrap(argument))]
    pub probe_timeout_ms: Option<u64>,

    /// Maximum duration of the interrupt helper.
    #[knus(child, unwrap(argument))]
    pub helper_timeout_ms: Option<u64>,
}

/// Arguments of a configuration node.
#[derive(Debug, Default, PartialEq, knus::Decode)]
pub struct Values {
    /// The arguments, in order.
    #[knus(arguments)]
    pub values: Vec<String>,
}

fn flatten(nodes: Vec<Values>) -> Vec<String> {
    nodes.into_iter().flat_map(|node| node.values).collect()
}

fn override_ms(value: &mut Duration, ms: Option<u64>) {
    if let Some(ms) = ms {
        *value = Duration::from_millis(ms);
    }
}

impl RelicConfig {
    /// Converts the configuration into the engine one, keeping the engine
    /// defaults for missing entries.
    pub fn into_engine_config(self) -> EngineConfig {
        let mut config = EngineConfig {
            host: self.host.map(PathBuf::from),
            host_args: flatten(self.host_args),
            process_name: self.process_name,
            ..EngineConfig::default()
        };

        if let Some(indirection) = self.indirection {
            config.indirection = indirection.values;
        }

        let debuggers = flatten(self.debuggers);
        if !debuggers.is_empty() {
            config.debugger_candidates = debuggers.into_iter().map(PathBuf::from).collect();
        }

        let pass_signals = flatten(self.pass_signals);
        if !pass_signals.is_empty() {
            config.pass_signals = pass_signals;
        }

        if let Some(helper) = self.interrupt_helper {
            let mut values = helper.values.into_iter();
            config.interrupt_helper = values
                .next()
                .map(|program| HelperCommand::new(program, values));
        }

        let Timings {
            settle_delay,
            request_timeout,
            attach_timeout,
            stop_timeout,
            probe_timeout,
            helper_timeout,
        } = &mut config.timings;

        override_ms(settle_delay, self.settle_delay_ms);
        override_ms(request_timeout, self.request_timeout_ms);
        override_ms(attach_timeout, self.attach_timeout_ms);
        override_ms(stop_timeout, self.stop_timeout_ms);
        override_ms(probe_timeout, self.probe_timeout_ms);
        override_ms(helper_timeout, self.helper_timeout_ms);

        config
    }
}

/// Parses the configuration, either inline or from a `.kdl` file.
pub fn parse_config(config: &str) -> miette::Result<RelicConfig> {
    let path = Path::new(config);

    let config = if let Some((filename, "kdl")) = path
        .file_name()
        .and_then(OsStr::to_str)
        .zip(path.extension().and_then(OsStr::to_str))
    {
        let content = std::fs::read_to_string(path).into_diagnostic()?;
        knus::parse(filename, &content)?
    } else {
        knus::parse("<content>", config)?
    };

    Ok(config)
}
