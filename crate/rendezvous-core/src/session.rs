mod memory;

pub use memory::InMemorySessionStore;

use std::fmt;

/// Opaque identifier shared by a sender and its receiver.
///
/// Tokens are chosen by clients; the relay never generates them.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct Token(String);

impl From<String> for Token {
    fn from(value: String) -> Self {
        Token(value)
    }
}

impl From<&str> for Token {
    fn from(value: &str) -> Self {
        Token(value.to_string())
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Token {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Identifies one successful role claim.
///
/// A sender's claim owns the transfer buffer it created: only pushes
/// made with that claim reach the buffer, so a sender from a torn
/// down session can't feed a new session with the same token.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct ClaimId(pub(crate) u64);

/// The part a connection plays in a session.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Role {
    Sender,
    Receiver,
}

impl Role {
    /// Parse the single-character role of a hello line.
    pub fn from_code(code: &str) -> Option<Role> {
        match code {
            "s" => Some(Role::Sender),
            "r" => Some(Role::Receiver),
            _ => None,
        }
    }

    /// Single-character role, as sent on the wire.
    pub fn code(self) -> &'static str {
        match self {
            Role::Sender => "s",
            Role::Receiver => "r",
        }
    }

    /// The role this role waits for.
    pub fn peer(self) -> Role {
        match self {
            Role::Sender => Role::Receiver,
            Role::Receiver => Role::Sender,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Role::Sender => "sender",
            Role::Receiver => "receiver",
        })
    }
}

/// What the sender declared about the file it is about to send.
///
/// The size is passed through as-is; it is never parsed.
#[derive(Clone, Default, PartialEq, Eq, Debug)]
pub struct FileMetadata {
    pub file_name: String,
    pub file_size: String,
}

/// Presence and metadata of a session.
#[derive(Clone, Default, PartialEq, Eq, Debug)]
pub struct Session {
    pub sender_present: bool,
    pub receiver_present: bool,
    pub metadata: FileMetadata,
}

impl Session {
    pub fn is_present(&self, role: Role) -> bool {
        match role {
            Role::Sender => self.sender_present,
            Role::Receiver => self.receiver_present,
        }
    }

    fn set_present(&mut self, role: Role, present: bool) {
        match role {
            Role::Sender => self.sender_present = present,
            Role::Receiver => self.receiver_present = present,
        }
    }

    pub fn is_paired(&self) -> bool {
        self.sender_present && self.receiver_present
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("a {0} client is already connected")]
    RoleAlreadyTaken(Role),
}

/// Result of [SessionStore::pop_chunk].
#[derive(Debug, PartialEq, Eq)]
pub enum Pop {
    /// The oldest chunk in the buffer. An empty chunk marks the end
    /// of the stream.
    Chunk(Vec<u8>),

    /// The buffer exists but nothing is queued.
    Empty,

    /// The buffer doesn't exist (anymore).
    Gone,
}

/// Sessions and their transfer buffers, addressed by token.
///
/// Every operation is a single atomic step: implementations must not
/// let two calls for the same token interleave. None of them block
/// on I/O.
pub trait SessionStore: Send + Sync {
    /// Create an entry with both roles absent, unless one exists.
    fn ensure_session(&self, token: &Token);

    /// Mark `role` present for `token`.
    ///
    /// Fails, without changing anything, if the role is already
    /// present. Claiming the sender role records `metadata` and
    /// creates the session's transfer buffer, so the buffer exists
    /// before the sender starts pumping.
    fn claim_role(
        &self,
        token: &Token,
        role: Role,
        metadata: FileMetadata,
    ) -> Result<ClaimId, SessionError>;

    /// Mark `role` absent for `token`.
    ///
    /// Releasing the sender drops its buffer. A session left with no
    /// role present is removed.
    fn release_role(&self, token: &Token, role: Role);

    /// Release `role`, unless the session is paired.
    ///
    /// The check and the release are one step, so a peer that claims
    /// the token concurrently either sees the role gone or makes this
    /// return false. Returns true if the role was released.
    fn abandon_role(&self, token: &Token, role: Role) -> bool;

    /// A snapshot of the session, if it exists.
    fn session(&self, token: &Token) -> Option<Session>;

    /// Check whether both roles are present.
    fn is_paired(&self, token: &Token) -> bool {
        self.session(token).is_some_and(|s| s.is_paired())
    }

    /// Check whether the session's transfer buffer exists.
    fn has_buffer(&self, token: &Token) -> bool;

    /// Check whether the session's transfer buffer exists and was
    /// created by `claim`.
    fn owns_buffer(&self, token: &Token, claim: ClaimId) -> bool;

    /// Append a chunk to the buffer created by `claim`.
    ///
    /// Returns false if that buffer doesn't exist (anymore); the chunk
    /// is then dropped.
    fn push_chunk(&self, token: &Token, claim: ClaimId, chunk: Vec<u8>) -> bool;

    /// Take the oldest chunk out of the session's buffer.
    fn pop_chunk(&self, token: &Token) -> Pop;

    /// Number of chunks queued, summed over all buffers.
    fn queued_chunks(&self) -> usize;

    /// Maximum value of [SessionStore::queued_chunks] before
    /// producers must wait.
    fn capacity(&self) -> usize;

    /// Check whether the global chunk budget is used up.
    fn buffer_is_saturated(&self) -> bool {
        self.queued_chunks() >= self.capacity()
    }

    /// Remove the session and its buffer.
    ///
    /// Returns false if there was nothing to remove.
    fn teardown(&self, token: &Token) -> bool;

    /// Remove all sessions and buffers.
    fn clear(&self);
}
