//! Best-effort notification fan-out to live user sessions.
//!
//! The relay holds one channel per connected session, grouped by user.
//! Publishing is fire-and-forget: a notification is handed to every live
//! session of the target exactly once, and a session that is gone or slow
//! simply misses it. The access ledger remains the source of truth; a
//! client that missed a push can always poll its request list.
//!
//! The relay is constructed once at startup and passed by `Arc` into the
//! ledger; there is no process-global handle. Joining a channel requires the
//! caller to already hold a verified identity; the relay never
//! authenticates on its own.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use medipass_ids::RefId;
use serde::Serialize;
use tokio::sync::mpsc;

/// Ledger state transitions pushed to interested parties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LedgerEvent {
    #[serde(rename = "access_request_created")]
    RequestCreated,
    #[serde(rename = "access_request_resent")]
    RequestResent,
    #[serde(rename = "access_request_resolved")]
    RequestResolved,
    #[serde(rename = "access_request_revoked")]
    RequestRevoked,
}

impl LedgerEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerEvent::RequestCreated => "access_request_created",
            LedgerEvent::RequestResent => "access_request_resent",
            LedgerEvent::RequestResolved => "access_request_resolved",
            LedgerEvent::RequestRevoked => "access_request_revoked",
        }
    }
}

/// One pushed notification.
#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub event: LedgerEvent,
    pub payload: serde_json::Value,
    pub emitted_at: DateTime<Utc>,
}

/// Identifies one live session within the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(u64);

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

struct SessionSlot {
    id: SessionId,
    tx: mpsc::Sender<Notification>,
}

/// In-process fan-out of ledger events to connected sessions.
pub struct NotificationRelay {
    session_buffer: usize,
    next_session: AtomicU64,
    sessions: RwLock<HashMap<RefId, Vec<SessionSlot>>>,
}

impl NotificationRelay {
    /// Creates a relay whose per-session channels buffer up to
    /// `session_buffer` undelivered notifications.
    pub fn new(session_buffer: usize) -> Self {
        Self {
            session_buffer: session_buffer.max(1),
            next_session: AtomicU64::new(1),
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Registers a live session for `user_ref` and returns its receiving
    /// end.
    ///
    /// The caller must only pass a reference obtained from a verified
    /// identity; the relay does not re-check it.
    pub fn join(&self, user_ref: &RefId) -> (SessionId, mpsc::Receiver<Notification>) {
        let id = SessionId(self.next_session.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::channel(self.session_buffer);

        match self.sessions.write() {
            Ok(mut sessions) => {
                sessions
                    .entry(user_ref.clone())
                    .or_default()
                    .push(SessionSlot { id, tx });
            }
            Err(_) => {
                tracing::error!("relay session map poisoned; dropping join for {user_ref}");
            }
        }

        (id, rx)
    }

    /// Removes one session of `user_ref`.
    pub fn leave(&self, user_ref: &RefId, session_id: SessionId) {
        let Ok(mut sessions) = self.sessions.write() else {
            return;
        };
        if let Some(slots) = sessions.get_mut(user_ref) {
            slots.retain(|slot| slot.id != session_id);
            if slots.is_empty() {
                sessions.remove(user_ref);
            }
        }
    }

    /// Delivers a notification to every live session of `target`.
    ///
    /// At-most-once per session per call: a full or closed channel drops the
    /// notification for that session, with a log line and nothing else.
    /// Never blocks, never returns an error.
    pub fn publish(&self, target: &RefId, event: LedgerEvent, payload: serde_json::Value) {
        let notification = Notification {
            event,
            payload,
            emitted_at: Utc::now(),
        };

        let mut closed = Vec::new();
        {
            let Ok(sessions) = self.sessions.read() else {
                tracing::error!("relay session map poisoned; dropping {}", event.as_str());
                return;
            };
            let Some(slots) = sessions.get(target) else {
                // Target offline; the ledger remains pollable.
                return;
            };

            for slot in slots {
                match slot.tx.try_send(notification.clone()) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        tracing::warn!(
                            "dropping {} for {target}: {} buffer full",
                            event.as_str(),
                            slot.id
                        );
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => {
                        closed.push(slot.id);
                    }
                }
            }
        }

        if !closed.is_empty() {
            if let Ok(mut sessions) = self.sessions.write() {
                if let Some(slots) = sessions.get_mut(target) {
                    slots.retain(|slot| !closed.contains(&slot.id));
                    if slots.is_empty() {
                        sessions.remove(target);
                    }
                }
            }
        }
    }

    /// Number of live sessions currently registered for `user_ref`.
    pub fn session_count(&self, user_ref: &RefId) -> usize {
        self.sessions
            .read()
            .map(|sessions| sessions.get(user_ref).map_or(0, Vec::len))
            .unwrap_or(0)
    }
}
