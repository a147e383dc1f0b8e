//! This crate parses the output of a debugger speaking the GDB **machine
//! interface** (MI).
//!
//! Every line written by the debugger is one of:
//! - a prompt (`(gdb)`), marking the end of a batch of output,
//! - a result record (`12^done,bkpt={...}`), answering the command that was
//!   sent with the same token,
//! - an async record (`*stopped,reason="breakpoint-hit",...`), notifying a
//!   state change of the debuggee,
//! - a stream record (`~"text"`), carrying console or log text.
//!
//! ```
//! use relic_mi::{Record, ResultClass};
//!
//! let record = relic_mi::parse_record(r#"7^done,bkpt={number="1",addr="0x1000"}"#).unwrap();
//!
//! let Record::Result(result) = record else {
//!     unreachable!();
//! };
//!
//! assert_eq!(result.token, Some(7));
//! assert_eq!(result.class, ResultClass::Done);
//! assert_eq!(result.results.get_path(&["bkpt", "addr"]), Some("0x1000"));
//! ```
//!
//! Commands sent to the debugger are plain text; [quote] turns an arbitrary
//! argument (e.g., a file path containing spaces) into an MI C-string.

mod cstring;
mod error;
mod parser;
mod record;
mod value;

pub use self::cstring::quote;
pub use self::error::{ParseError, Result};
pub use self::parser::{MAX_DEPTH, parse_record};
pub use self::record::{AsyncKind, AsyncRecord, Record, ResultClass, ResultRecord};
pub use self::record::{StreamKind, StreamRecord};
pub use self::value::{Items, Tuple, Value};
