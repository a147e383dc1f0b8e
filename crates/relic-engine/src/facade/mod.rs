//! Typed debugger requests built on top of [MiSession](crate::MiSession).

mod breakpoint;
mod exec;
mod memory;
mod register;
mod stack;

pub use self::breakpoint::Breakpoint;
pub use self::memory::MemoryBlock;
pub use self::register::RegisterSnapshot;
pub use self::stack::Frame;

/// Parses an unsigned integer field of a debugger answer.
fn parse_u32(text: Option<&str>) -> Option<u32> {
    text.and_then(|text| text.parse().ok())
}
