use relic_mi::Value;

use crate::error::{CommandError, Result};
use crate::session::MiSession;

/// One frame of the target call stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Depth of the frame, 0 being the innermost.
    pub level: u32,

    /// Code address of the frame.
    pub address: String,

    /// Function name, if known.
    pub function: Option<String>,

    /// Source file, if known.
    pub file: Option<String>,

    /// Source line, if known.
    pub line: Option<u32>,
}

impl MiSession {
    /// Lists the frames of the current thread.
    pub async fn backtrace(&self) -> Result<Vec<Frame>> {
        let results = self.command("-stack-list-frames").await?;

        let stack = results
            .get("stack")
            .ok_or(CommandError::Malformed("stack"))?;

        stack
            .items()
            .filter_map(Value::as_tuple)
            .map(|frame| {
                Ok(Frame {
                    level: super::parse_u32(frame.get_str("level"))
                        .ok_or(CommandError::Malformed("frame.level"))?,
                    address: frame.get_str("addr").unwrap_or_default().to_owned(),
                    function: frame.get_str("func").map(str::to_owned),
                    file: frame
                        .get_str("fullname")
                        .or_else(|| frame.get_str("file"))
                        .map(str::to_owned),
                    line: super::parse_u32(frame.get_str("line")),
                })
            })
            .collect()
    }
}
