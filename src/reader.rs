use std::io;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

/// A line reader over ffmpeg output that can take lines back.
///
/// Lines end at `\n`, `\r` or `\r\n`; ffmpeg terminates its status lines with a
/// bare carriage return. Invalid UTF-8 is replaced rather than rejected.
pub struct PushbackLineReader<R> {
    inner: BufReader<R>,
    pushed: Vec<String>,
    skip_lf: bool,
}

impl<R: AsyncRead + Unpin> PushbackLineReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner: BufReader::new(inner),
            pushed: Vec::new(),
            skip_lf: false,
        }
    }

    /// Returns the next line, or `None` at end of stream.
    ///
    /// The most recently pushed back line, if any, is returned first.
    pub async fn read_line(&mut self) -> io::Result<Option<String>> {
        if let Some(line) = self.pushed.pop() {
            return Ok(Some(line));
        }

        let mut buf = Vec::new();
        loop {
            let available = self.inner.fill_buf().await?;
            if available.is_empty() {
                if buf.is_empty() {
                    return Ok(None);
                }
                break;
            }

            if self.skip_lf {
                self.skip_lf = false;
                if available[0] == b'\n' {
                    self.inner.consume(1);
                    continue;
                }
            }

            match available.iter().position(|b| *b == b'\n' || *b == b'\r') {
                Some(end) => {
                    buf.extend_from_slice(&available[..end]);
                    let carriage_return = available[end] == b'\r';
                    self.inner.consume(end + 1);
                    self.skip_lf = carriage_return;
                    break;
                }
                None => {
                    let len = available.len();
                    buf.extend_from_slice(available);
                    self.inner.consume(len);
                }
            }
        }

        Ok(Some(String::from_utf8_lossy(&buf).into_owned()))
    }

    /// Makes `line` the next value returned by [`read_line`](Self::read_line).
    pub fn push_back(&mut self, line: String) {
        self.pushed.push(line);
    }
}
