use super::{Chunks, ChunksError};

#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    ChunksError(ChunksError),
    InvalidPayload,
}

/// A type for reading server-sent events from a chunk stream.
///
/// Only the `data` field is interesting to us; comment lines and other
/// fields are skipped. Multiple `data` lines in one event are joined
/// with a line feed, per the SSE processing model.
pub struct Sse {
    buf: String,
    chunks: Chunks,
}

impl Sse {
    #[inline]
    pub fn new(chunks: Chunks) -> Self {
        Self {
            buf: String::new(),
            chunks,
        }
    }

    pub async fn next_event(&mut self) -> Result<Option<String>, Error> {
        loop {
            // Read more data from the stream first.
            let mut has_more_data = false;
            if let Some(bytes) =
                self.chunks.next_chunk().await.map_err(Error::ChunksError)?
            {
                let Ok(s) = str::from_utf8(&bytes) else {
                    return Err(Error::InvalidPayload);
                };
                self.buf.push_str(s);
                has_more_data = true;
            }

            // Parse as many complete blocks as the buffer holds; blocks
            // without a data field (comments, keep-alives) are skipped.
            while let Some(block) = self.take_block() {
                if let Some(data) = parse_data(&block) {
                    return Ok(Some(data));
                }
            }

            // Abort if no more data available.
            if !has_more_data {
                return Ok(None);
            }
        }
    }

    /// Removes and returns the next `\n\n`-terminated block, if the
    /// buffer holds a complete one.
    fn take_block(&mut self) -> Option<String> {
        let end = self.buf.find("\n\n")?;
        let block = self.buf[..end].to_owned();
        self.buf.drain(..end + 2);
        Some(block)
    }
}

/// Extracts the joined `data` payload from an event block, if any.
fn parse_data(block: &str) -> Option<String> {
    let mut data: Option<String> = None;
    for line in block.lines() {
        if line.starts_with(':') {
            continue;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        if field != "data" {
            continue;
        }
        match &mut data {
            Some(data) => {
                data.push('\n');
                data.push_str(value);
            }
            None => data = Some(value.to_owned()),
        }
    }
    data
}
