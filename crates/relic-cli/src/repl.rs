/// Summary of the interactive commands.
pub const HELP: &str = "\
pause             interrupt the target
continue, c       resume the target
step, s           step one instruction
next, n           step one instruction, over calls
break, b <loc>    set a breakpoint (address, symbol or file:line)
delete, d <id>    remove a breakpoint
breaks            list breakpoints
regs              show registers
bt                show the call stack
x <addr> <size>   read memory
write <addr> <hex>  write memory
state             show the session state
help              show this help
quit, q           stop the target and exit";

/// Command typed at the interactive prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    /// Interrupt the target.
    Pause,

    /// Resume the target.
    Continue,

    /// Step one instruction.
    Step,

    /// Step one instruction, stepping over calls.
    Next,

    /// Set a breakpoint.
    Break(String),

    /// Remove a breakpoint.
    Delete(String),

    /// List breakpoints.
    Breakpoints,

    /// Show registers.
    Registers,

    /// Show the call stack.
    Backtrace,

    /// Read memory.
    Examine {
        /// Start address.
        address: String,

        /// Number of bytes.
        size: usize,
    },

    /// Write memory.
    Write {
        /// Start address.
        address: String,

        /// Bytes as hexadecimal pairs.
        data: String,
    },

    /// Show the session state.
    State,

    /// Show the command summary.
    Help,

    /// Stop the target and exit.
    Quit,
}

/// Error parsing an interactive command.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ReplError {
    /// Unknown command name.
    #[error("unknown command `{0}`, try `help`")]
    Unknown(String),

    /// Wrong arguments for a known command.
    #[error("usage: {0}")]
    Usage(&'static str),
}

impl ReplCommand {
    /// Parses a line of input.
    ///
    /// Blank lines yield `None`.
    pub fn parse(line: &str) -> Result<Option<Self>, ReplError> {
        let line = line.trim();

        let Some(name) = line.split_whitespace().next() else {
            return Ok(None);
        };

        let rest = line[name.len()..].trim();
        let args: Vec<&str> = rest.split_whitespace().collect();

        let no_args = |command: Self| {
            if args.is_empty() {
                Ok(command)
            } else {
                Err(ReplError::Usage("the command takes no argument"))
            }
        };

        let command = match name {
            "pause" => no_args(Self::Pause)?,
            "continue" | "c" => no_args(Self::Continue)?,
            "step" | "s" => no_args(Self::Step)?,
            "next" | "n" => no_args(Self::Next)?,
            "break" | "b" if !rest.is_empty() => Self::Break(rest.to_owned()),
            "break" | "b" => return Err(ReplError::Usage("break <location>")),
            "delete" | "d" => match args.as_slice() {
                [id] => Self::Delete((*id).to_owned()),
                _ => return Err(ReplError::Usage("delete <id>")),
            },
            "breaks" => no_args(Self::Breakpoints)?,
            "regs" => no_args(Self::Registers)?,
            "bt" => no_args(Self::Backtrace)?,
            "x" => match args.as_slice() {
                [address, size] => Self::Examine {
                    address: (*address).to_owned(),
                    size: parse_size(size).ok_or(ReplError::Usage("x <address> <size>"))?,
                },
                _ => return Err(ReplError::Usage("x <address> <size>")),
            },
            "write" => match args.as_slice() {
                [address, data] => Self::Write {
                    address: (*address).to_owned(),
                    data: (*data).to_owned(),
                },
                _ => return Err(ReplError::Usage("write <address> <hex bytes>")),
            },
            "state" => no_args(Self::State)?,
            "help" | "?" => Self::Help,
            "quit" | "q" | "exit" => Self::Quit,
            name => return Err(ReplError::Unknown(name.to_owned())),
        };

        Ok(Some(command))
    }
}

fn parse_size(size: &str) -> Option<usize> {
    let size = match size.strip_prefix("0x").or_else(|| size.strip_prefix("0X")) {
        Some(hex) => usize::from_str_radix(hex, 16).ok()?,
        None => size.parse().ok()?,
    };

    (size > 0).then_some(size)
}
