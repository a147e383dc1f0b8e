use std::path::PathBuf;
use std::time::Duration;

use tokio::process::Command;

/// Placeholder replaced by the host path in [EngineConfig::indirection].
pub const HOST_PLACEHOLDER: &str = "{host}";

/// Placeholder replaced by the host arguments and the target path in
/// [EngineConfig::indirection].
pub const ARGS_PLACEHOLDER: &str = "{args}";

/// Placeholder replaced, anywhere in a part of [EngineConfig::indirection], by
/// the host path as a PowerShell string literal.
pub const PS_HOST_PLACEHOLDER: &str = "{ps-host}";

/// Placeholder replaced, anywhere in a part of [EngineConfig::indirection], by
/// the host arguments and the target path as one PowerShell string literal
/// holding a Windows command line.
pub const PS_ARGS_PLACEHOLDER: &str = "{ps-args}";

/// Placeholder replaced by the target PID in a [HelperCommand].
pub const PID_PLACEHOLDER: &str = "{pid}";

/// Configuration of the debug engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Path to the program hosting the target (e.g., an emulator).
    pub host: Option<PathBuf>,

    /// Arguments passed to the host before the target path.
    pub host_args: Vec<String>,

    /// Name of the process to watch for when resolving the target PID.
    ///
    /// Defaults to the file name of [host](Self::host).
    pub process_name: Option<String>,

    /// Command line prefix used to spawn the host (elevation, detaching).
    ///
    /// `{host}` and `{args}` are substituted when present, as are `{ps-host}`
    /// and `{ps-args}` inside a PowerShell script part. Otherwise the host
    /// path, the host arguments and the target path are appended.
    pub indirection: Vec<String>,

    /// Debugger binaries to try, in order.
    pub debugger_candidates: Vec<PathBuf>,

    /// Arguments starting the debugger in MI mode.
    pub debugger_args: Vec<String>,

    /// Signals the debugger passes to the target without stopping.
    pub pass_signals: Vec<String>,

    /// Helper forcing a debug break into the target.
    pub interrupt_helper: Option<HelperCommand>,

    /// Delays and timeouts.
    pub timings: Timings,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            host: None,
            host_args: Vec::new(),
            process_name: None,
            indirection: default_indirection(),
            debugger_candidates: default_debugger_candidates(),
            debugger_args: ["--interpreter=mi2", "-q", "-nx"]
                .map(str::to_owned)
                .to_vec(),
            pass_signals: ["SIGSEGV", "SIGPIPE"].map(str::to_owned).to_vec(),
            interrupt_helper: HelperCommand::platform_default(),
            timings: Timings::default(),
        }
    }
}

impl EngineConfig {
    /// Returns the name of the process the target runs as.
    pub fn watched_process_name(&self) -> Option<String> {
        self.process_name.clone().or_else(|| {
            self.host
                .as_ref()
                .and_then(|host| host.file_name())
                .map(|name| name.to_string_lossy().into_owned())
        })
    }

    /// Builds the command spawning the host for the given target.
    pub(crate) fn host_command(&self, host: &std::path::Path, target: &std::path::Path) -> Command {
        let host = host.to_string_lossy().into_owned();
        let mut args: Vec<String> = self.host_args.clone();
        args.push(target.to_string_lossy().into_owned());

        let mut argv = Vec::with_capacity(self.indirection.len() + args.len() + 1);
        let mut host_placed = false;
        let mut args_placed = false;

        for part in &self.indirection {
            match part.as_str() {
                HOST_PLACEHOLDER => {
                    argv.push(host.clone());
                    host_placed = true;
                }
                ARGS_PLACEHOLDER => {
                    argv.extend(args.iter().cloned());
                    args_placed = true;
                }
                _ => {
                    let mut part = part.clone();

                    if part.contains(PS_HOST_PLACEHOLDER) {
                        part = part.replace(PS_HOST_PLACEHOLDER, &powershell_literal(&host));
                        host_placed = true;
                    }

                    if part.contains(PS_ARGS_PLACEHOLDER) {
                        let line = args
                            .iter()
                            .map(|arg| windows_arg(arg))
                            .collect::<Vec<_>>()
                            .join(" ");

                        part = part.replace(PS_ARGS_PLACEHOLDER, &powershell_literal(&line));
                        args_placed = true;
                    }

                    argv.push(part);
                }
            }
        }

        if !host_placed {
            argv.push(host);
        }

        if !args_placed {
            argv.extend(args);
        }

        let mut argv = argv.into_iter();
        let mut command = Command::new(argv.next().unwrap_or_default());
        command.args(argv);
        command
    }
}

/// Delays and timeouts of the engine.
///
/// These are empirical values depending on the host machine; tests shrink
/// them to keep runs short.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timings {
    /// Delay between spawning the host and resolving the target PID.
    pub settle_delay: Duration,

    /// Default reply window of a command.
    pub request_timeout: Duration,

    /// Reply window of the attach command.
    pub attach_timeout: Duration,

    /// Maximum wait for a stop after an interrupt or a step.
    pub stop_timeout: Duration,

    /// Maximum duration of a debugger version probe.
    pub probe_timeout: Duration,

    /// Maximum duration of the interrupt helper.
    pub helper_timeout: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_millis(2500),
            request_timeout: Duration::from_secs(5),
            attach_timeout: Duration::from_secs(10),
            stop_timeout: Duration::from_secs(5),
            probe_timeout: Duration::from_secs(3),
            helper_timeout: Duration::from_secs(5),
        }
    }
}

/// External command run to interrupt the target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelperCommand {
    /// Program to run.
    pub program: String,

    /// Arguments, where `{pid}` is replaced by the target PID.
    pub args: Vec<String>,
}

impl HelperCommand {
    /// Creates a helper from a program and its arguments.
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns the helper used when none is configured.
    ///
    /// On Windows, a PowerShell snippet calls `DebugBreakProcess` on the
    /// target. Other platforms have no helper and rely on signals.
    pub fn platform_default() -> Option<Self> {
        if cfg!(windows) {
            Some(Self::new(
                "powershell",
                ["-NoProfile", "-NonInteractive", "-Command", WINDOWS_DEBUG_BREAK],
            ))
        } else {
            None
        }
    }

    pub(crate) fn command(&self, pid: u32) -> Command {
        let pid = pid.to_string();
        let mut command = Command::new(&self.program);
        command.args(self.args.iter().map(|arg| arg.replace(PID_PLACEHOLDER, &pid)));
        command
    }
}

const WINDOWS_DEBUG_BREAK: &str = concat!(
    "$ErrorActionPreference = 'Stop'; ",
    "Add-Type -Namespace Relic -Name Native -MemberDefinition '",
    "[DllImport(\"kernel32.dll\", SetLastError = true)] public static extern IntPtr OpenProcess(uint access, bool inherit, uint pid); ",
    "[DllImport(\"kernel32.dll\", SetLastError = true)] public static extern bool DebugBreakProcess(IntPtr process); ",
    "[DllImport(\"kernel32.dll\")] public static extern bool CloseHandle(IntPtr handle);'; ",
    "$h = [Relic.Native]::OpenProcess(0x1F0FFF, $false, {pid}); ",
    "if ($h -eq [IntPtr]::Zero) { throw (New-Object ComponentModel.Win32Exception([Runtime.InteropServices.Marshal]::GetLastWin32Error())) }; ",
    "try { if (-not [Relic.Native]::DebugBreakProcess($h)) { throw (New-Object ComponentModel.Win32Exception([Runtime.InteropServices.Marshal]::GetLastWin32Error())) } } ",
    "finally { [void][Relic.Native]::CloseHandle($h) }",
);

/// Single-quoted PowerShell string, with embedded quotes doubled.
fn powershell_literal(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

/// Quotes an argument for a Windows command line, as parsed by the C runtime.
fn windows_arg(arg: &str) -> String {
    if !arg.is_empty() && !arg.contains([' ', '\t', '"']) {
        return arg.to_owned();
    }

    let mut quoted = String::with_capacity(arg.len() + 2);
    let mut backslashes = 0;

    quoted.push('"');

    for c in arg.chars() {
        match c {
            '\\' => backslashes += 1,
            '"' => {
                quoted.extend(std::iter::repeat_n('\\', backslashes * 2 + 1));
                backslashes = 0;
            }
            _ => backslashes = 0,
        }

        quoted.push(c);
    }

    quoted.extend(std::iter::repeat_n('\\', backslashes));
    quoted.push('"');
    quoted
}

fn windows_indirection() -> Vec<String> {
    [
        "powershell",
        "-NoProfile",
        "-NonInteractive",
        "-Command",
        "Start-Process -Verb RunAs -Wait -FilePath {ps-host} -ArgumentList {ps-args}",
    ]
    .map(str::to_owned)
    .to_vec()
}

fn default_indirection() -> Vec<String> {
    if cfg!(windows) {
        windows_indirection()
    } else {
        ["sh", "-c", "exec \"$0\" \"$@\""].map(str::to_owned).to_vec()
    }
}

fn default_debugger_candidates() -> Vec<PathBuf> {
    let candidates: &[&str] = if cfg!(windows) {
        &[
            "gdb.exe",
            r"C:\msys64\mingw64\bin\gdb-multiarch.exe",
            r"C:\msys64\mingw64\bin\gdb.exe",
            r"C:\msys64\usr\bin\gdb.exe",
        ]
    } else {
        &[
            "gdb-multiarch",
            "/usr/bin/gdb-multiarch",
            "gdb",
            "/usr/bin/gdb",
            "/usr/local/bin/gdb",
        ]
    };

    candidates.iter().map(PathBuf::from).collect()
}
