use relic_mi::Value;

use crate::error::{CommandError, Result};
use crate::session::MiSession;

/// Bytes read from the target memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryBlock {
    /// Address of the first byte.
    pub begin: String,

    /// Bytes as a lowercase hexadecimal string.
    pub contents: String,
}

impl MemoryBlock {
    /// Returns the number of bytes in the block.
    pub fn len(&self) -> usize {
        self.contents.len() / 2
    }

    /// Returns whether the block holds no byte.
    pub fn is_empty(&self) -> bool {
        self.contents.is_empty()
    }
}

/// Checks that a string is a sequence of hexadecimal byte pairs.
fn is_hex_bytes(data: &str) -> bool {
    !data.is_empty() && data.len() % 2 == 0 && data.bytes().all(|b| b.is_ascii_hexdigit())
}

impl MiSession {
    /// Reads `size` bytes of target memory at `address`.
    #[tracing::instrument(skip(self))]
    pub async fn read_memory(&self, address: &str, size: usize) -> Result<MemoryBlock> {
        let results = self
            .command(&format!("-data-read-memory-bytes {address} {size}"))
            .await?;

        let block = results
            .get("memory")
            .and_then(|memory| memory.items().find_map(Value::as_tuple))
            .ok_or(CommandError::Malformed("memory"))?;

        let block = MemoryBlock {
            begin: block
                .get_str("begin")
                .ok_or(CommandError::Malformed("memory.begin"))?
                .to_owned(),
            contents: block
                .get_str("contents")
                .ok_or(CommandError::Malformed("memory.contents"))?
                .to_ascii_lowercase(),
        };

        if block.len() < size {
            return Err(CommandError::PartialRead(block.len(), size));
        }

        Ok(block)
    }

    /// Writes hexadecimal bytes to target memory at `address`.
    #[tracing::instrument(skip(self))]
    pub async fn write_memory(&self, address: &str, data: &str) -> Result<()> {
        if !is_hex_bytes(data) {
            return Err(CommandError::InvalidHex);
        }

        self.command(&format!("-data-write-memory-bytes {address} {data}"))
            .await?;

        Ok(())
    }
}
