//! Line protocol spoken before the payload.
//!
//! Every line is UTF-8 and ends with `\n`. A client opens with
//!
//! ```text
//! <role>|<token>|<file_name>|<file_size>
//! ```
//!
//! where role is `s` (sender) or `r` (receiver). While its peer is
//! missing, the server sends `Waiting for receiver...` or `Waiting for
//! sender...` from time to time. Once paired, a receiver gets the
//! sender's hello with the token hidden, then both get `start!` and
//! the raw payload follows. A refused client gets one line of
//! explanation and the connection is closed.

use crate::session::{FileMetadata, Role, Token};
use std::io;
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt as _, AsyncReadExt as _, AsyncWrite, AsyncWriteExt as _,
};

/// Maximum length of a hello line, newline included.
pub const MAX_HELLO_LEN: u64 = 4096;

/// Sent to both peers once they are paired.
pub const START: &str = "start!";

/// Replaces the token in the hello forwarded to the receiver.
pub const HIDDEN_TOKEN: &str = "hidden_token";

/// Refusal message used when there's nothing more specific to say.
pub const DEFAULT_REFUSAL: &str = "Connection refused!";

const SEPARATOR: &str = "|";

#[derive(Debug, thiserror::Error)]
pub enum HandshakeError {
    #[error("connection closed before the hello line was complete")]
    Closed,

    #[error("hello line longer than {MAX_HELLO_LEN} bytes")]
    TooLong,

    #[error("hello line is not valid UTF-8")]
    NotUtf8,

    #[error("expected role|token|file_name|file_size, got {0} field(s)")]
    FieldCount(usize),

    #[error("unknown role {0:?}, expected 's' or 'r'")]
    UnknownRole(String),

    #[error("missing token")]
    EmptyToken,

    #[error("I/O error {0}")]
    Io(#[from] io::Error),
}

/// The first line a client sends.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Hello {
    pub role: Role,
    pub token: Token,

    /// Only meaningful for senders; receivers send placeholders.
    pub metadata: FileMetadata,
}

impl Hello {
    /// Parse a hello line, without its line terminator.
    pub fn parse(line: &str) -> Result<Self, HandshakeError> {
        let fields = line.split(SEPARATOR).collect::<Vec<_>>();
        let [role, token, file_name, file_size] = fields[..] else {
            return Err(HandshakeError::FieldCount(fields.len()));
        };
        let role =
            Role::from_code(role).ok_or_else(|| HandshakeError::UnknownRole(role.to_string()))?;
        if token.is_empty() {
            return Err(HandshakeError::EmptyToken);
        }

        Ok(Hello {
            role,
            token: Token::from(token),
            metadata: FileMetadata {
                file_name: file_name.to_string(),
                file_size: file_size.to_string(),
            },
        })
    }

    /// Format the hello as a line, without its line terminator.
    pub fn to_line(&self) -> String {
        [
            self.role.code(),
            self.token.as_str(),
            self.metadata.file_name.as_str(),
            self.metadata.file_size.as_str(),
        ]
        .join(SEPARATOR)
    }
}

/// The line that tells a receiver what the sender is sending.
pub fn sender_announcement(metadata: &FileMetadata) -> String {
    Hello {
        role: Role::Sender,
        token: Token::from(HIDDEN_TOKEN),
        metadata: metadata.clone(),
    }
    .to_line()
}

/// The status line sent to a client waiting for `peer`.
pub fn waiting_line(peer: Role) -> String {
    format!("Waiting for {peer}...")
}

/// Read and parse the hello line.
///
/// Reads at most [MAX_HELLO_LEN] bytes, so nothing after the line is
/// consumed beyond what `reader` itself buffers.
pub async fn read_hello<R>(reader: &mut R) -> Result<Hello, HandshakeError>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    reader
        .take(MAX_HELLO_LEN)
        .read_until(b'\n', &mut buf)
        .await?;
    if buf.last() != Some(&b'\n') {
        return Err(if buf.len() as u64 >= MAX_HELLO_LEN {
            HandshakeError::TooLong
        } else {
            HandshakeError::Closed
        });
    }
    buf.pop();
    if buf.last() == Some(&b'\r') {
        buf.pop();
    }
    let line = String::from_utf8(buf).map_err(|_| HandshakeError::NotUtf8)?;

    Hello::parse(&line)
}

/// Write one line and flush it.
pub async fn write_line<W>(writer: &mut W, line: &str) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut data = Vec::with_capacity(line.len() + 1);
    data.extend_from_slice(line.as_bytes());
    data.push(b'\n');
    writer.write_all(&data).await?;
    writer.flush().await
}

/// Send `message` to the client, then close the connection.
///
/// Errors are ignored: the client is being turned away anyway.
pub async fn refuse_connection<W>(writer: &mut W, message: Option<&str>)
where
    W: AsyncWrite + Unpin,
{
    let message = message.unwrap_or(DEFAULT_REFUSAL);
    if let Err(err) = write_line(writer, message.trim_end_matches('\n')).await {
        log::debug!("Failed to send refusal {message:?}: {err}");
    }
    let _ = writer.shutdown().await;
}
