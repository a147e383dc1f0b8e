use relic_mi::{Tuple, Value};

use crate::error::{CommandError, Result};
use crate::event::EngineEvent;
use crate::session::MiSession;
use crate::sync::lock;

/// Breakpoint known to the debugger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Breakpoint {
    /// Debugger-assigned number.
    pub id: String,

    /// Address the breakpoint is set at.
    pub address: String,

    /// Source file of the location, if known.
    pub source_file: Option<String>,

    /// Source line of the location, if known.
    pub source_line: Option<u32>,

    /// Function of the location, if known.
    pub function: Option<String>,

    /// Whether the breakpoint is enabled.
    pub enabled: bool,

    /// Number of times the breakpoint was hit.
    pub hit_count: u32,
}

impl Breakpoint {
    /// Builds a breakpoint from a `bkpt={...}` tuple.
    pub(crate) fn from_tuple(bkpt: &Tuple) -> Result<Self> {
        let id = bkpt.get_str("number").ok_or(CommandError::Malformed("bkpt.number"))?;

        Ok(Self {
            id: id.to_owned(),
            address: bkpt.get_str("addr").unwrap_or_default().to_owned(),
            source_file: bkpt
                .get_str("fullname")
                .or_else(|| bkpt.get_str("file"))
                .map(str::to_owned),
            source_line: super::parse_u32(bkpt.get_str("line")),
            function: bkpt.get_str("func").map(str::to_owned),
            enabled: bkpt.get_str("enabled") != Some("n"),
            hit_count: super::parse_u32(bkpt.get_str("times")).unwrap_or(0),
        })
    }
}

/// Turns a user location into a `-break-insert` argument.
///
/// Hexadecimal numbers are addresses; anything else (symbol, `file:line`)
/// is passed to the debugger as is, quoted when needed.
fn location_argument(location: &str) -> String {
    let location = location.trim();

    let is_address = location
        .strip_prefix("0x")
        .or_else(|| location.strip_prefix("0X"))
        .is_some_and(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_hexdigit()));

    if is_address {
        format!("*{location}")
    } else if location.contains([' ', '"', '\\']) {
        relic_mi::quote(location)
    } else {
        location.to_owned()
    }
}

impl MiSession {
    /// Returns the known breakpoints, in insertion order.
    pub fn breakpoints(&self) -> Vec<Breakpoint> {
        lock(&self.breakpoints).values().cloned().collect()
    }

    fn emit_breakpoints(&self) {
        self.hub().emit(EngineEvent::Breakpoints(self.breakpoints()));
    }

    /// Inserts a breakpoint at an address, a symbol or a `file:line`.
    #[tracing::instrument(skip(self))]
    pub async fn insert_breakpoint(&self, location: &str) -> Result<Breakpoint> {
        let results = self
            .command(&format!("-break-insert {}", location_argument(location)))
            .await?;

        let bkpt = results
            .get("bkpt")
            .and_then(Value::as_tuple)
            .ok_or(CommandError::Malformed("bkpt"))?;

        let breakpoint = Breakpoint::from_tuple(bkpt)?;

        lock(&self.breakpoints).insert(breakpoint.id.clone(), breakpoint.clone());
        self.emit_breakpoints();

        Ok(breakpoint)
    }

    /// Deletes a breakpoint by number.
    #[tracing::instrument(skip(self))]
    pub async fn delete_breakpoint(&self, id: &str) -> Result<()> {
        self.command(&format!("-break-delete {id}")).await?;

        lock(&self.breakpoints).shift_remove(id);
        self.emit_breakpoints();

        Ok(())
    }

    /// Replaces the known breakpoints with the debugger's list.
    pub async fn refresh_breakpoints(&self) -> Result<Vec<Breakpoint>> {
        let results = self.command("-break-list").await?;

        let body = results
            .get("BreakpointTable")
            .and_then(Value::as_tuple)
            .and_then(|table| table.get("body"))
            .ok_or(CommandError::Malformed("BreakpointTable.body"))?;

        let breakpoints = body
            .items()
            .filter_map(Value::as_tuple)
            .map(Breakpoint::from_tuple)
            .collect::<Result<Vec<_>>>()?;

        {
            let mut known = lock(&self.breakpoints);
            known.clear();
            known.extend(breakpoints.iter().map(|b| (b.id.clone(), b.clone())));
        }

        self.emit_breakpoints();

        Ok(breakpoints)
    }

    pub(crate) fn on_breakpoint_modified(&self, results: &Tuple) {
        let Some(Ok(breakpoint)) = results
            .get("bkpt")
            .and_then(Value::as_tuple)
            .map(Breakpoint::from_tuple)
        else {
            tracing::debug!("ignoring malformed breakpoint notification");
            return;
        };

        let updated = match lock(&self.breakpoints).get_mut(&breakpoint.id) {
            Some(known) => {
                *known = breakpoint;
                true
            }
            None => false,
        };

        if updated {
            self.emit_breakpoints();
        }
    }

    pub(crate) fn on_breakpoint_deleted(&self, results: &Tuple) {
        let Some(id) = results.get_str("id") else {
            return;
        };

        if lock(&self.breakpoints).shift_remove(id).is_some() {
            self.emit_breakpoints();
        }
    }
}
