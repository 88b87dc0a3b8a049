//! Tasks that move payload bytes between a socket and a session's
//! transfer buffer.
//!
//! A sender's connection runs the [reader_pump], which fills the
//! buffer; the receiver's connection runs the [writer_pump], which
//! drains it. There is exactly one of each per session, so chunks
//! come out in the order they went in.

mod reader;
mod writer;

pub use reader::reader_pump;
pub use writer::writer_pump;

use std::io;

/// Why a pump stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PumpExit {
    /// The sender closed its side of the connection.
    EndOfStream,

    /// The transfer buffer is gone: the session was torn down.
    SessionGone,

    /// The client reset the connection.
    PeerReset,

    /// Nothing arrived for too long; the transfer is assumed done.
    Idle,

    /// Too many consecutive write errors.
    TooManyErrors,
}

/// What a pump did before stopping.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PumpOutcome {
    pub exit: PumpExit,

    /// Payload bytes moved, not counting chunks that were dropped.
    pub bytes: u64,
}

/// Check whether the error means the client is gone.
pub(crate) fn is_peer_reset(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionAborted | io::ErrorKind::BrokenPipe
    )
}
