//! This crate implements the debug backend of the Relic toolchain.
//!
//! The [Engine] launches a target through its host (usually an emulator
//! started through an elevation-capable indirection), discovers the PID of
//! the real target process, attaches a GDB/MI debugger to it and exposes a
//! small pause/resume/step/breakpoint/memory API.
//!
//! ```no_run
//! use relic_engine::{Engine, EngineConfig, EngineEvent, LaunchOutcome};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = EngineConfig {
//!     host: Some("/opt/emu/emu".into()),
//!     ..EngineConfig::default()
//! };
//!
//! let engine = Engine::new(config);
//! let mut events = engine.subscribe();
//!
//! match engine.launch("game.xex").await? {
//!     LaunchOutcome::Debugging { pid, .. } => println!("attached to {pid}"),
//!     LaunchOutcome::DebuggingUnavailable { reason, .. } => println!("no debugging: {reason}"),
//! }
//!
//! engine.set_breakpoint("main").await?;
//!
//! while let Ok(event) = events.recv().await {
//!     if let EngineEvent::Paused(report) = event {
//!         println!("paused at {:?}", report.registers.program_counter);
//!         break;
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Protocol session
//!
//! [MiSession] can also be used on its own over any pair of async streams,
//! which is how the engine is tested against an in-memory debugger.

mod config;
mod engine;
mod error;
mod event;
mod facade;
mod hub;
mod interrupt;
mod launcher;
mod locator;
mod registry;
mod session;
mod sync;

pub use self::config::{EngineConfig, HelperCommand, Timings};
pub use self::engine::{Engine, LaunchOutcome, UnavailableReason};
pub use self::error::{AttachError, CommandError, Error, LaunchError, PauseError};
pub use self::event::{EngineEvent, OutputStream, PauseReport};
pub use self::facade::{Breakpoint, Frame, MemoryBlock, RegisterSnapshot};
pub use self::hub::{SessionHub, SessionState};
pub use self::interrupt::InterruptStrategy;
pub use self::locator::{DebuggerBinary, locate_debugger};
pub use self::registry::{ProcessRegistry, SystemRegistry};
pub use self::session::{MiSession, Reply, SessionOptions, StopInfo, StopReason};
