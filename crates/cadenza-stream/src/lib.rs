//! Framed byte stream between two processes.
//!
//! A server creates a pair of FIFOs in a directory; a client opens them.
//! Each direction carries frames of the form
//!
//! ```text
//! #FR=<len>\n<payload>#END\n
//! ```
//!
//! and `#CLOSE\n` ends the conversation. Payloads are opaque bytes;
//! [`FrameData`] is the schema used for audio, control, and event buffers.
//!
//! # Example
//!
//! ```rust,no_run
//! use cadenza_config::StreamSettings;
//! use cadenza_stream::FramedStream;
//!
//! let settings = StreamSettings::default();
//! let mut stream = FramedStream::client("/tmp/cadenza".as_ref(), &settings)?;
//! stream.send_frame(b"hello")?;
//! let echo = stream.receive_frame()?;
//! assert_eq!(echo, b"hello");
//! stream.close()?;
//! # Ok::<(), cadenza_stream::StreamError>(())
//! ```

mod error;
mod fifo;
mod frame_data;
mod framing;
mod stream;

pub use error::{Result, StreamError};
pub use fifo::{CLIENT_TO_SERVER, FifoPaths, Role, SERVER_TO_CLIENT};
pub use frame_data::{Entity, EntityKind, FrameData};
pub use framing::{CLOSE_SENTINEL, FRAME_TRAILER, Header, encode_frame, parse_header};
pub use stream::{CloseHandle, FramedStream};
