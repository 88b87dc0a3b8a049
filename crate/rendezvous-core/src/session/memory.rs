use super::{ClaimId, FileMetadata, Pop, Role, Session, SessionError, SessionStore, Token};
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

/// A [SessionStore] kept in process memory.
///
/// A single lock covers sessions and buffers, so claims, pushes,
/// pops and teardowns are atomic with respect to each other.
pub struct InMemorySessionStore {
    entries: Mutex<Entries>,
    capacity: usize,
}

#[derive(Default)]
struct Entries {
    sessions: HashMap<Token, Session>,
    buffers: HashMap<Token, Buffer>,
    last_claim: u64,
}

struct Buffer {
    owner: ClaimId,
    chunks: VecDeque<Vec<u8>>,
}

impl Entries {
    fn release(&mut self, token: &Token, role: Role) {
        let Some(session) = self.sessions.get_mut(token) else {
            return;
        };
        session.set_present(role, false);
        if role == Role::Sender {
            self.buffers.remove(token);
        }
        if !session.sender_present && !session.receiver_present {
            self.sessions.remove(token);
            self.buffers.remove(token);
        }
    }
}

impl InMemorySessionStore {
    /// Create an empty store that allows at most `capacity` chunks to
    /// be queued across all sessions.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(Entries::default()),
            capacity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Entries> {
        // Nothing panics while the lock is held.
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl SessionStore for InMemorySessionStore {
    fn ensure_session(&self, token: &Token) {
        self.lock().sessions.entry(token.clone()).or_default();
    }

    fn claim_role(
        &self,
        token: &Token,
        role: Role,
        metadata: FileMetadata,
    ) -> Result<ClaimId, SessionError> {
        let mut guard = self.lock();
        let entries = &mut *guard;
        let session = entries.sessions.entry(token.clone()).or_default();
        if session.is_present(role) {
            return Err(SessionError::RoleAlreadyTaken(role));
        }
        session.set_present(role, true);
        entries.last_claim += 1;
        let claim = ClaimId(entries.last_claim);
        if role == Role::Sender {
            session.metadata = metadata;
            entries.buffers.insert(
                token.clone(),
                Buffer {
                    owner: claim,
                    chunks: VecDeque::new(),
                },
            );
        }

        Ok(claim)
    }

    fn release_role(&self, token: &Token, role: Role) {
        self.lock().release(token, role);
    }

    fn abandon_role(&self, token: &Token, role: Role) -> bool {
        let mut entries = self.lock();
        if entries.sessions.get(token).is_some_and(Session::is_paired) {
            return false;
        }
        entries.release(token, role);

        true
    }

    fn session(&self, token: &Token) -> Option<Session> {
        self.lock().sessions.get(token).cloned()
    }

    fn has_buffer(&self, token: &Token) -> bool {
        self.lock().buffers.contains_key(token)
    }

    fn owns_buffer(&self, token: &Token, claim: ClaimId) -> bool {
        self.lock()
            .buffers
            .get(token)
            .is_some_and(|b| b.owner == claim)
    }

    fn push_chunk(&self, token: &Token, claim: ClaimId, chunk: Vec<u8>) -> bool {
        match self.lock().buffers.get_mut(token) {
            Some(buffer) if buffer.owner == claim => {
                buffer.chunks.push_back(chunk);
                true
            }
            _ => false,
        }
    }

    fn pop_chunk(&self, token: &Token) -> Pop {
        match self.lock().buffers.get_mut(token) {
            Some(buffer) => match buffer.chunks.pop_front() {
                Some(chunk) => Pop::Chunk(chunk),
                None => Pop::Empty,
            },
            None => Pop::Gone,
        }
    }

    fn queued_chunks(&self) -> usize {
        self.lock().buffers.values().map(|b| b.chunks.len()).sum()
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn teardown(&self, token: &Token) -> bool {
        let mut entries = self.lock();
        let session = entries.sessions.remove(token);
        let buffer = entries.buffers.remove(token);

        session.is_some() || buffer.is_some()
    }

    fn clear(&self) {
        let mut entries = self.lock();
        entries.sessions.clear();
        entries.buffers.clear();
    }
}
