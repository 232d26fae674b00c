// ABOUTME: Line-oriented serial connection to an SBD modem
// ABOUTME: Buffers inbound bytes into newline-delimited lines and writes carriage-return terminated commands

use crate::client::error::{SbdError, SbdResult};
use crate::command::AtCommand;
use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter};

/// Longest line accepted from the modem before the buffer is discarded
pub const MAX_LINE_LENGTH: usize = 4096;

/// Modem link over a byte stream
///
/// The stream is usually a serial port, but anything implementing
/// `AsyncRead + AsyncWrite` works (tests use an in-memory duplex pipe).
///
/// Inbound bytes are split on `\n`. Carriage returns around a line are
/// trimmed and blank lines are skipped, so callers only ever see lines with
/// content. The modem is half-duplex: callers must not write a new command
/// until the previous one has completed. That discipline is enforced by the
/// command queue, not here.
#[derive(Debug)]
pub struct Connection<S> {
    // Writes are buffered and flushed once per command.
    stream: BufWriter<S>,

    // Bytes read from the stream that do not yet form a whole line.
    buffer: BytesMut,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S) -> Connection<S> {
        Connection {
            stream: BufWriter::new(stream),
            buffer: BytesMut::with_capacity(1024),
        }
    }

    /// Read the next non-empty line.
    ///
    /// Returns `Ok(None)` when the stream closes on a line boundary. Partial
    /// data left behind at close is reported as `ConnectionClosed`.
    ///
    /// Cancel safe: bytes already read stay in the buffer for the next call.
    pub async fn read_line(&mut self) -> SbdResult<Option<String>> {
        loop {
            while let Some(line) = self.parse_line()? {
                if !line.is_empty() {
                    return Ok(Some(line));
                }
            }

            if 0 == self.stream.read_buf(&mut self.buffer).await? {
                let leftover = self.buffer.iter().all(|b| b.is_ascii_whitespace());
                return if leftover {
                    Ok(None)
                } else {
                    Err(SbdError::ConnectionClosed)
                };
            }
        }
    }

    /// Take one line out of the buffer, if a whole one is there.
    fn parse_line(&mut self) -> SbdResult<Option<String>> {
        let Some(end) = self.buffer.iter().position(|b| *b == b'\n') else {
            if self.buffer.len() > MAX_LINE_LENGTH {
                let dropped = self.buffer.len();
                self.buffer.clear();
                return Err(SbdError::InvalidData(format!(
                    "line exceeds {MAX_LINE_LENGTH} bytes ({dropped} buffered), discarded"
                )));
            }
            return Ok(None);
        };

        let line = String::from_utf8_lossy(&self.buffer[..end])
            .trim_matches('\r')
            .to_string();
        self.buffer.advance(end + 1);

        Ok(Some(line))
    }

    /// Write a command followed by a carriage return and flush it.
    pub async fn write_command(&mut self, command: &AtCommand) -> SbdResult<()> {
        self.stream.write_all(&command.encode()).await?;
        self.stream.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, duplex};

    #[tokio::test]
    async fn splits_lines_and_skips_blanks() {
        let (ours, mut theirs) = duplex(256);
        let mut connection = Connection::new(ours);

        theirs.write_all(b"\r\n+SBDIX: 0, 1, 0, 0, 0, 0\r\n\r\nOK\r\n").await.unwrap();

        assert_eq!(
            connection.read_line().await.unwrap().as_deref(),
            Some("+SBDIX: 0, 1, 0, 0, 0, 0")
        );
        assert_eq!(connection.read_line().await.unwrap().as_deref(), Some("OK"));
    }

    #[tokio::test]
    async fn reassembles_lines_split_across_reads() {
        let (ours, mut theirs) = duplex(256);
        let mut connection = Connection::new(ours);

        let reader = tokio::spawn(async move { connection.read_line().await });
        theirs.write_all(b"+CS").await.unwrap();
        tokio::task::yield_now().await;
        theirs.write_all(b"Q:5\r\n").await.unwrap();

        assert_eq!(reader.await.unwrap().unwrap().as_deref(), Some("+CSQ:5"));
    }

    #[tokio::test]
    async fn clean_close_returns_none() {
        let (ours, theirs) = duplex(64);
        let mut connection = Connection::new(ours);
        drop(theirs);

        assert!(connection.read_line().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn close_mid_line_is_an_error() {
        let (ours, mut theirs) = duplex(64);
        let mut connection = Connection::new(ours);
        theirs.write_all(b"+SBDI").await.unwrap();
        drop(theirs);

        assert!(matches!(
            connection.read_line().await,
            Err(SbdError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn oversized_line_is_discarded() {
        let (ours, mut theirs) = duplex(MAX_LINE_LENGTH * 2);
        let mut connection = Connection::new(ours);

        theirs.write_all(&vec![b'x'; MAX_LINE_LENGTH + 1]).await.unwrap();
        assert!(matches!(
            connection.read_line().await,
            Err(SbdError::InvalidData(_))
        ));

        theirs.write_all(b"OK\r\n").await.unwrap();
        assert_eq!(connection.read_line().await.unwrap().as_deref(), Some("OK"));
    }

    #[tokio::test]
    async fn writes_command_with_carriage_return() {
        let (ours, mut theirs) = duplex(64);
        let mut connection = Connection::new(ours);

        connection.write_command(&AtCommand::signal_quality()).await.unwrap();

        let mut buf = [0u8; 7];
        theirs.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"AT+CSQ\r");
    }
}
