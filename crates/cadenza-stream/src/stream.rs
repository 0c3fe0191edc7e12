//! Bidirectional framed stream over a FIFO pair.

use std::fs::File;
use std::io::{ErrorKind, Read, Write};
use std::os::fd::AsFd;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use cadenza_config::StreamSettings;
use nix::errno::Errno;
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};

use crate::error::{Result, StreamError};
use crate::fifo::{FifoPaths, Role};
use crate::frame_data::FrameData;
use crate::framing::{CLOSE_SENTINEL, FRAME_TRAILER, Header, Inbox, MAX_HEADER_LEN};
use crate::framing::{encode_frame, parse_header};

/// Size of a single read from the FIFO.
const READ_CHUNK: usize = 64 * 1024;

/// Requests a close from another thread.
///
/// A read blocked in [`FramedStream::receive_frame`] observes the request
/// within one poll interval and returns [`StreamError::Closed`].
#[derive(Debug, Clone)]
pub struct CloseHandle {
    flag: Arc<AtomicBool>,
}

impl CloseHandle {
    /// Request the stream to close.
    pub fn close(&self) {
        self.flag.store(true, Ordering::Release);
    }

    /// Whether a close was requested.
    pub fn is_closed(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

/// One end of a framed stream.
///
/// Frames are `#FR=<len>\n<payload>#END\n`; `#CLOSE\n` ends the stream.
/// Reads poll the FIFO with the configured interval so a close requested
/// through a [`CloseHandle`] is noticed even when no data arrives. Writes
/// block until the whole frame is written.
pub struct FramedStream {
    role: Role,
    reader: File,
    writer: File,
    inbox: Inbox,
    chunk: Vec<u8>,
    closing: Arc<AtomicBool>,
    sent_close: bool,
    poll_timeout: PollTimeout,
    max_frame_len: usize,
    owned: Option<FifoPaths>,
}

impl FramedStream {
    /// Create the FIFO pair in `dir` and wait for a client to open it.
    ///
    /// Blocks until the client has opened both FIFOs. The FIFOs are removed
    /// when the stream is dropped.
    pub fn server(dir: &Path, settings: &StreamSettings) -> Result<Self> {
        let paths = FifoPaths::in_dir(dir);
        paths.create()?;
        tracing::info!(dir = %dir.display(), "stream server waiting for client");
        match paths.open(Role::Server) {
            Ok((reader, writer)) => {
                tracing::info!(dir = %dir.display(), "stream client connected");
                Ok(Self::new(Role::Server, reader, writer, settings, Some(paths)))
            }
            Err(e) => {
                paths.remove();
                Err(e)
            }
        }
    }

    /// Open the FIFO pair a server created in `dir`.
    pub fn client(dir: &Path, settings: &StreamSettings) -> Result<Self> {
        let paths = FifoPaths::in_dir(dir);
        let (reader, writer) = paths.open(Role::Client)?;
        tracing::info!(dir = %dir.display(), "stream connected to server");
        Ok(Self::new(Role::Client, reader, writer, settings, None))
    }

    fn new(
        role: Role,
        reader: File,
        writer: File,
        settings: &StreamSettings,
        owned: Option<FifoPaths>,
    ) -> Self {
        let millis = u16::try_from(settings.poll_interval_ms).unwrap_or(u16::MAX);
        Self {
            role,
            reader,
            writer,
            inbox: Inbox::default(),
            chunk: vec![0; READ_CHUNK],
            closing: Arc::new(AtomicBool::new(false)),
            sent_close: false,
            poll_timeout: PollTimeout::from(millis),
            max_frame_len: settings.max_frame_len,
            owned,
        }
    }

    /// Which end of the pair this is.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Handle for requesting a close from another thread.
    pub fn close_handle(&self) -> CloseHandle {
        CloseHandle {
            flag: Arc::clone(&self.closing),
        }
    }

    /// Send one frame.
    pub fn send_frame(&mut self, payload: &[u8]) -> Result<()> {
        if self.sent_close || self.closing.load(Ordering::Acquire) {
            return Err(StreamError::Closed);
        }
        if payload.len() > self.max_frame_len {
            return Err(StreamError::FrameTooLarge {
                len: payload.len(),
                max: self.max_frame_len,
            });
        }
        self.write_all(&encode_frame(payload))
    }

    /// Receive one frame, blocking until it has fully arrived.
    ///
    /// Returns [`StreamError::Closed`] when the peer sent the close sentinel
    /// or a close was requested locally.
    pub fn receive_frame(&mut self) -> Result<Vec<u8>> {
        let line = self.read_line()?;
        match parse_header(&line) {
            Ok(Header::Close) => {
                tracing::info!(role = ?self.role, "peer closed stream");
                self.closing.store(true, Ordering::Release);
                Err(StreamError::Closed)
            }
            Ok(Header::Frame(len)) => {
                if len > self.max_frame_len {
                    tracing::warn!(len, max = self.max_frame_len, "oversized frame");
                    return Err(StreamError::FrameTooLarge {
                        len,
                        max: self.max_frame_len,
                    });
                }
                let payload = self.read_exact(len)?;
                let trailer = self.read_exact(FRAME_TRAILER.len())?;
                if trailer != FRAME_TRAILER {
                    tracing::warn!(len, "frame trailer missing");
                    return Err(StreamError::MissingTrailer { len });
                }
                tracing::trace!(len, "frame received");
                Ok(payload)
            }
            Err(e) => {
                tracing::warn!(error = %e, "protocol error");
                Err(e)
            }
        }
    }

    /// Encode and send a [`FrameData`].
    pub fn send_data(&mut self, data: &FrameData) -> Result<()> {
        let payload = data.encode()?;
        self.send_frame(&payload)
    }

    /// Receive and decode a [`FrameData`].
    pub fn receive_data(&mut self) -> Result<FrameData> {
        let payload = self.receive_frame()?;
        FrameData::decode(&payload)
    }

    /// Send the close sentinel. Later sends fail with [`StreamError::Closed`].
    pub fn close(&mut self) -> Result<()> {
        if self.sent_close {
            return Ok(());
        }
        self.sent_close = true;
        tracing::info!(role = ?self.role, "closing stream");
        self.write_all(CLOSE_SENTINEL)
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        match self.writer.write_all(bytes).and_then(|()| self.writer.flush()) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::BrokenPipe => Err(StreamError::HungUp),
            Err(e) => Err(e.into()),
        }
    }

    fn read_line(&mut self) -> Result<Vec<u8>> {
        loop {
            if let Some(line) = self.inbox.take_line() {
                return Ok(line);
            }
            if self.inbox.pending() > MAX_HEADER_LEN {
                let head = self.inbox.take_exact(MAX_HEADER_LEN).unwrap_or_default();
                return Err(StreamError::MalformedHeader(
                    String::from_utf8_lossy(&head).into_owned(),
                ));
            }
            self.fill()?;
        }
    }

    fn read_exact(&mut self, n: usize) -> Result<Vec<u8>> {
        loop {
            if let Some(bytes) = self.inbox.take_exact(n) {
                return Ok(bytes);
            }
            self.fill()?;
        }
    }

    /// Wait for data, checking the close flag between polls.
    fn fill(&mut self) -> Result<()> {
        loop {
            if self.closing.load(Ordering::Acquire) {
                return Err(StreamError::Closed);
            }

            let ready = {
                let mut fds = [PollFd::new(self.reader.as_fd(), PollFlags::POLLIN)];
                match poll(&mut fds, self.poll_timeout) {
                    Ok(0) | Err(Errno::EINTR) => false,
                    Ok(_) => true,
                    Err(e) => return Err(StreamError::Poll(e)),
                }
            };
            if !ready {
                continue;
            }

            let n = match self.reader.read(&mut self.chunk) {
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };
            if n == 0 {
                tracing::warn!(role = ?self.role, "peer hung up without closing");
                return Err(StreamError::HungUp);
            }
            self.inbox.push(&self.chunk[..n]);
            return Ok(());
        }
    }
}

impl std::fmt::Debug for FramedStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FramedStream")
            .field("role", &self.role)
            .field("pending", &self.inbox.pending())
            .field("closing", &self.closing.load(Ordering::Relaxed))
            .field("sent_close", &self.sent_close)
            .finish_non_exhaustive()
    }
}

impl Drop for FramedStream {
    fn drop(&mut self) {
        if let Some(paths) = self.owned.take() {
            paths.remove();
        }
    }
}
