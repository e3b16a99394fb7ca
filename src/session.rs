//! Session store: last reply per session, used for follow-up rewrites.
//!
//! [`SessionStore`] is the seam the chat service depends on; the in-process
//! [`MemorySessionStore`] is the only backend today. It is safe to share
//! across request tasks and can be capped, evicting the oldest session
//! first once the cap is reached.

use std::collections::{HashMap, VecDeque};
use std::sync::{PoisonError, RwLock};

use tracing::debug;

pub trait SessionStore: Send + Sync {
    fn get(&self, session_id: &str) -> Option<String>;

    fn set(&self, session_id: &str, reply: &str);

    /// Returns `true` if the session existed.
    fn delete(&self, session_id: &str) -> bool;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Default)]
struct Inner {
    replies: HashMap<String, String>,
    /// Insertion order of session ids, oldest first.
    order: VecDeque<String>,
}

#[derive(Default)]
pub struct MemorySessionStore {
    inner: RwLock<Inner>,
    capacity: Option<usize>,
}

impl MemorySessionStore {
    pub fn new(capacity: Option<usize>) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            capacity,
        }
    }
}

impl SessionStore for MemorySessionStore {
    fn get(&self, session_id: &str) -> Option<String> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.replies.get(session_id).cloned()
    }

    fn set(&self, session_id: &str, reply: &str) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if inner
            .replies
            .insert(session_id.to_string(), reply.to_string())
            .is_none()
        {
            inner.order.push_back(session_id.to_string());
        }

        if let Some(cap) = self.capacity {
            while inner.replies.len() > cap {
                let Some(oldest) = inner.order.pop_front() else { break };
                inner.replies.remove(&oldest);
                debug!(session_id = %oldest, "session evicted (capacity reached)");
            }
        }
    }

    fn delete(&self, session_id: &str) -> bool {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let existed = inner.replies.remove(session_id).is_some();
        if existed {
            inner.order.retain(|id| id != session_id);
        }
        existed
    }

    fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).replies.len()
    }
}
