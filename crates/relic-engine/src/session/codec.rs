use tokio_util::bytes::{Buf, BytesMut};
use tokio_util::codec::Decoder;

/// Splits debugger output into lines.
///
/// Invalid UTF-8 is replaced rather than rejected, and a trailing `\r` is
/// stripped. A partial line left at the end of the stream is still yielded.
#[derive(Debug, Default)]
pub struct LineDecoder {
    scanned: usize,
}

impl LineDecoder {
    fn take_line(&mut self, src: &mut BytesMut, len: usize, consumed: usize) -> String {
        let line = &src[..len];
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        let line = String::from_utf8_lossy(line).into_owned();

        src.advance(consumed);
        self.scanned = 0;

        line
    }
}

impl Decoder for LineDecoder {
    type Item = String;
    type Error = std::io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let Some(newline) = src[self.scanned..].iter().position(|&b| b == b'\n') else {
            self.scanned = src.len();
            return Ok(None);
        };

        let len = self.scanned + newline;

        Ok(Some(self.take_line(src, len, len + 1)))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(line) = self.decode(src)? {
            return Ok(Some(line));
        }

        if src.is_empty() {
            return Ok(None);
        }

        let len = src.len();

        Ok(Some(self.take_line(src, len, len)))
    }
}
