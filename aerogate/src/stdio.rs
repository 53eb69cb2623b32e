//! Unary-stream transport over newline-delimited JSON.
//!
//! One implicit session for the process lifetime. Strictly sequential: a line
//! is read, dispatched, and its response (if any) written and flushed before
//! the next line is read.

use std::sync::Arc;

use aerogate_core::health::HealthReport;
use aerogate_core::session::{OverflowPolicy, Session};
use aerogate_core::{Dispatcher, RequestContext, SessionId, SessionRegistry, TransportKind};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::StdioError;

/// Maximum accepted line length (10 MiB).
pub const MAX_LINE_BYTES: usize = 10 * 1024 * 1024;

pub struct StdioTransport {
    dispatcher: Arc<Dispatcher>,
    sessions: SessionRegistry,
    session: Arc<Session>,
    max_line_bytes: usize,
}

impl StdioTransport {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        let sessions = SessionRegistry::new(TransportKind::Stdio, 1, OverflowPolicy::DropNewest);
        let session = sessions.create();
        Self {
            dispatcher,
            sessions,
            session,
            max_line_bytes: MAX_LINE_BYTES,
        }
    }

    pub fn with_max_line_bytes(mut self, max_line_bytes: usize) -> Self {
        self.max_line_bytes = max_line_bytes;
        self
    }

    pub fn session_id(&self) -> SessionId {
        self.session.id()
    }

    pub fn health(&self) -> HealthReport {
        HealthReport::healthy(TransportKind::Stdio, self.sessions.len())
    }

    /// Serve until end of input or `shutdown`.
    ///
    /// # Errors
    ///
    /// [`StdioError::Io`] when reading or writing fails. Oversized lines are
    /// skipped, not returned.
    pub async fn run<R, W>(
        &self,
        mut reader: R,
        mut writer: W,
        shutdown: CancellationToken,
    ) -> Result<(), StdioError>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        info!(session_id = %self.session.id(), "stdio transport started");
        let mut frames = 0u64;
        let mut line = Vec::new();

        let outcome = loop {
            line.clear();
            let read = tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Shutdown requested, closing stdio transport");
                    break Ok(());
                }
                read = bounded_read_line(&mut reader, &mut line, self.max_line_bytes) => read,
            };

            match read {
                Ok(0) => {
                    debug!("End of input");
                    break Ok(());
                }
                Ok(_) => {}
                Err(StdioError::MessageTooLarge { max_bytes }) => {
                    warn!(max_bytes, "Discarding oversized line");
                    continue;
                }
                Err(e) => break Err(e),
            }

            if line.last() != Some(&b'\n') {
                debug!(bytes = line.len(), "Discarding unterminated final line");
                break Ok(());
            }

            let frame = line.trim_ascii();
            if frame.is_empty() {
                continue;
            }
            frames += 1;

            // The session may have learned its client name from a handshake.
            let ctx = RequestContext::for_session(&self.session);
            if let Some(response) = self.dispatcher.handle_bytes(&ctx, frame).await {
                if let Err(e) = write_frame(&mut writer, &response).await {
                    break Err(e);
                }
            }
        };

        self.sessions.close_all();
        info!(frames, "stdio transport stopped");
        outcome
    }
}

async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, bytes: &[u8]) -> Result<(), StdioError> {
    writer.write_all(bytes).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}

/// Read one line (including its `\n`) into `buf`, refusing to buffer more
/// than `max_bytes`.
///
/// Returns `Ok(0)` at end of input. An oversized line is drained up to and
/// including its newline before [`StdioError::MessageTooLarge`] is returned,
/// so the reader is positioned at the start of the next line.
pub(crate) async fn bounded_read_line<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    buf: &mut Vec<u8>,
    max_bytes: usize,
) -> Result<usize, StdioError> {
    let mut total = 0usize;
    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            return Ok(total);
        }

        match available.iter().position(|&b| b == b'\n') {
            Some(pos) => {
                let take = pos + 1;
                if total + take > max_bytes {
                    reader.consume(take);
                    return Err(StdioError::MessageTooLarge { max_bytes });
                }
                buf.extend_from_slice(&available[..take]);
                total += take;
                reader.consume(take);
                return Ok(total);
            }
            None => {
                let len = available.len();
                if total + len > max_bytes {
                    reader.consume(len);
                    drain_until_newline(reader).await?;
                    return Err(StdioError::MessageTooLarge { max_bytes });
                }
                buf.extend_from_slice(available);
                total += len;
                reader.consume(len);
            }
        }
    }
}

async fn drain_until_newline<R: AsyncBufRead + Unpin>(reader: &mut R) -> Result<(), StdioError> {
    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            return Ok(());
        }
        if let Some(pos) = available.iter().position(|&b| b == b'\n') {
            reader.consume(pos + 1);
            return Ok(());
        }
        let len = available.len();
        reader.consume(len);
    }
}
