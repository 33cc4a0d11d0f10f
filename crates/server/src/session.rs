//! Session lifecycle for the streamable HTTP transport.
//!
//! Sessions are identified by random UUIDs and live for a fixed TTL measured
//! from creation. Each session numbers the SSE frames it emits and keeps the
//! most recent ones for replay. Every mutation goes through the store-wide
//! lock, so concurrent POSTs on one session never share an event id.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

/// Source of "now" for TTL decisions.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Error returned when a session is absent or expired.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("Session not found: {0}")]
    NotFound(String),
}

/// A frame already sent to the client, kept for replay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferedEvent {
    pub id: u64,
    pub payload: String,
}

/// Server-side session state.
#[derive(Debug)]
struct Session {
    created_at: DateTime<Utc>,
    last_event_id: u64,
    /// Ascending, contiguous ids
    events: VecDeque<BufferedEvent>,
    /// Cancelled when the session is removed, ending attached streams
    closed: CancellationToken,
}

impl Session {
    fn new(created_at: DateTime<Utc>) -> Self {
        Self {
            created_at,
            last_event_id: 0,
            events: VecDeque::new(),
            closed: CancellationToken::new(),
        }
    }
}

/// Read-only view of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub last_event_id: u64,
    pub buffered_events: usize,
}

/// Frames to replay on stream open, plus the signal that ends the stream.
#[derive(Debug)]
pub struct Replay {
    pub events: Vec<BufferedEvent>,
    /// Frames after the cursor were already evicted from the buffer
    pub truncated: bool,
    pub closed: CancellationToken,
}

/// Owns every live session.
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Session>>,
    ttl: chrono::Duration,
    max_buffered_events: usize,
    clock: Arc<dyn Clock>,
}

impl SessionStore {
    pub fn new(ttl: chrono::Duration, max_buffered_events: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            ttl,
            max_buffered_events: max_buffered_events.max(1),
            clock,
        }
    }

    fn is_expired(&self, session: &Session, now: DateTime<Utc>) -> bool {
        now - session.created_at > self.ttl
    }

    /// Create a new session and return its ID.
    pub async fn create(&self) -> String {
        let id = Uuid::new_v4().to_string();
        let session = Session::new(self.clock.now());
        self.sessions.write().await.insert(id.clone(), session);
        info!("Created MCP session: {}", id);
        id
    }

    /// Look up a session, evicting it if it has expired.
    pub async fn get(&self, id: &str) -> Result<SessionInfo, SessionError> {
        let mut sessions = self.sessions.write().await;
        let session = self.live_session(&mut sessions, id)?;
        Ok(SessionInfo {
            id: id.to_string(),
            created_at: session.created_at,
            last_event_id: session.last_event_id,
            buffered_events: session.events.len(),
        })
    }

    /// Remove a session. Returns whether it existed.
    pub async fn delete(&self, id: &str) -> bool {
        match self.sessions.write().await.remove(id) {
            Some(session) => {
                session.closed.cancel();
                info!("Terminated MCP session: {}", id);
                true
            }
            None => false,
        }
    }

    /// Allocate the next event id for a session and buffer the payload under it.
    pub async fn record_event(
        &self,
        id: &str,
        payload: String,
    ) -> Result<BufferedEvent, SessionError> {
        let mut sessions = self.sessions.write().await;
        let max = self.max_buffered_events;
        let session = self.live_session(&mut sessions, id)?;

        session.last_event_id += 1;
        let event = BufferedEvent {
            id: session.last_event_id,
            payload,
        };
        session.events.push_back(event.clone());
        while session.events.len() > max {
            session.events.pop_front();
        }

        debug!("Session {} emitted event {}", id, event.id);
        Ok(event)
    }

    /// Buffered frames newer than `cursor`, oldest first.
    ///
    /// Without a cursor nothing is replayed.
    pub async fn replay_after(
        &self,
        id: &str,
        cursor: Option<u64>,
    ) -> Result<Replay, SessionError> {
        let mut sessions = self.sessions.write().await;
        let session = self.live_session(&mut sessions, id)?;

        let (events, truncated) = match cursor {
            Some(cursor) => {
                let events: Vec<_> = session
                    .events
                    .iter()
                    .filter(|event| event.id > cursor)
                    .cloned()
                    .collect();
                let truncated = session
                    .events
                    .front()
                    .is_some_and(|oldest| oldest.id > cursor.saturating_add(1));
                (events, truncated)
            }
            None => (Vec::new(), false),
        };

        Ok(Replay {
            events,
            truncated,
            closed: session.closed.clone(),
        })
    }

    /// Remove every expired session. Returns how many were removed.
    pub async fn sweep_expired(&self) -> usize {
        let now = self.clock.now();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|id, session| {
            let keep = !self.is_expired(session, now);
            if !keep {
                info!(
                    "Cleaning up expired MCP session: {} (age: {}s)",
                    id,
                    (now - session.created_at).num_seconds()
                );
                session.closed.cancel();
            }
            keep
        });
        before - sessions.len()
    }

    /// Remove every session and end its attached streams. Returns how many were removed.
    pub async fn close_all(&self) -> usize {
        let mut sessions = self.sessions.write().await;
        let count = sessions.len();
        for (_, session) in sessions.drain() {
            session.closed.cancel();
        }
        count
    }

    /// Get the number of stored sessions, expired or not.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    fn live_session<'a>(
        &self,
        sessions: &'a mut HashMap<String, Session>,
        id: &str,
    ) -> Result<&'a mut Session, SessionError> {
        let expired = match sessions.get(id) {
            Some(session) => self.is_expired(session, self.clock.now()),
            None => return Err(SessionError::NotFound(id.to_string())),
        };

        if expired {
            if let Some(session) = sessions.remove(id) {
                session.closed.cancel();
            }
            info!("Evicted expired MCP session: {}", id);
            return Err(SessionError::NotFound(id.to_string()));
        }

        sessions
            .get_mut(id)
            .ok_or_else(|| SessionError::NotFound(id.to_string()))
    }
}

/// Periodic TTL sweep running beside the transport.
pub struct SweepTask {
    handle: JoinHandle<()>,
    shutdown: CancellationToken,
}

impl SweepTask {
    /// Start sweeping `store` every `every`.
    pub fn spawn(store: Arc<SessionStore>, every: Duration) -> Self {
        let shutdown = CancellationToken::new();
        let token = shutdown.clone();

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            // The first tick completes immediately
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {
                        let removed = store.sweep_expired().await;
                        if removed > 0 {
                            info!("Session sweep removed {} expired session(s)", removed);
                        }
                    }
                }
            }
            debug!("Session sweep stopped");
        });

        Self { handle, shutdown }
    }

    /// Stop the sweep and wait for it to finish.
    pub async fn stop(self) {
        self.shutdown.cancel();
        let _ = self.handle.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_clock(max_buffered: usize) -> (SessionStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        let store = SessionStore::new(chrono::Duration::minutes(30), max_buffered, clock.clone());
        (store, clock)
    }

    #[tokio::test]
    async fn test_create_starts_empty() {
        let (store, _) = store_with_clock(10);
        let id = store.create().await;

        let info = store.get(&id).await.unwrap();
        assert_eq!(info.id, id);
        assert_eq!(info.last_event_id, 0);
        assert_eq!(info.buffered_events, 0);
    }

    #[tokio::test]
    async fn test_ids_are_unique() {
        let (store, _) = store_with_clock(10);
        let a = store.create().await;
        let b = store.create().await;
        assert_ne!(a, b);
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn test_event_ids_strictly_increase() {
        let (store, _) = store_with_clock(10);
        let id = store.create().await;

        let mut last = 0;
        for n in 0..5 {
            let event = store.record_event(&id, format!("payload-{}", n)).await.unwrap();
            assert_eq!(event.id, last + 1);
            last = event.id;
        }
        assert_eq!(store.get(&id).await.unwrap().last_event_id, 5);
    }

    #[tokio::test]
    async fn test_concurrent_records_never_share_an_id() {
        let (store, _) = store_with_clock(1000);
        let store = Arc::new(store);
        let id = store.create().await;

        let mut handles = Vec::new();
        for n in 0..50 {
            let store = store.clone();
            let id = id.clone();
            handles.push(tokio::spawn(async move {
                store.record_event(&id, n.to_string()).await.unwrap().id
            }));
        }

        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap());
        }
        ids.sort_unstable();
        assert_eq!(ids, (1..=50).collect::<Vec<u64>>());
    }

    #[tokio::test]
    async fn test_replay_after_cursor() {
        let (store, _) = store_with_clock(10);
        let id = store.create().await;
        for n in 1..=5 {
            store.record_event(&id, format!("e{}", n)).await.unwrap();
        }

        let replay = store.replay_after(&id, Some(2)).await.unwrap();
        let ids: Vec<u64> = replay.events.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![3, 4, 5]);
        assert_eq!(replay.events[0].payload, "e3");
        assert!(!replay.truncated);

        let none = store.replay_after(&id, None).await.unwrap();
        assert!(none.events.is_empty());

        let caught_up = store.replay_after(&id, Some(5)).await.unwrap();
        assert!(caught_up.events.is_empty());
    }

    #[tokio::test]
    async fn test_buffer_is_bounded() {
        let (store, _) = store_with_clock(3);
        let id = store.create().await;
        for n in 1..=5 {
            store.record_event(&id, format!("e{}", n)).await.unwrap();
        }

        let info = store.get(&id).await.unwrap();
        assert_eq!(info.buffered_events, 3);
        assert_eq!(info.last_event_id, 5);

        let replay = store.replay_after(&id, Some(0)).await.unwrap();
        let ids: Vec<u64> = replay.events.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![3, 4, 5]);
        assert!(replay.truncated);

        let replay = store.replay_after(&id, Some(2)).await.unwrap();
        assert!(!replay.truncated);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let (store, _) = store_with_clock(10);
        let id = store.create().await;
        let replay = store.replay_after(&id, None).await.unwrap();

        assert!(store.delete(&id).await);
        assert!(!store.delete(&id).await);
        assert!(!store.delete("never-existed").await);
        assert!(replay.closed.is_cancelled());
        assert_eq!(
            store.get(&id).await,
            Err(SessionError::NotFound(id.clone()))
        );
        assert!(store.record_event(&id, "x".to_string()).await.is_err());
    }

    #[tokio::test]
    async fn test_ttl_measured_from_creation() {
        let (store, clock) = store_with_clock(10);
        let id = store.create().await;

        clock.advance(chrono::Duration::minutes(20));
        store.record_event(&id, "keep".to_string()).await.unwrap();

        // Activity does not extend the lifetime
        clock.advance(chrono::Duration::minutes(11));
        assert!(store.get(&id).await.is_err());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_sweep_removes_only_expired() {
        let (store, clock) = store_with_clock(10);
        let old = store.create().await;
        clock.advance(chrono::Duration::minutes(20));
        let young = store.create().await;
        let replay = store.replay_after(&old, None).await.unwrap();

        clock.advance(chrono::Duration::minutes(15));
        assert_eq!(store.sweep_expired().await, 1);
        assert!(store.get(&old).await.is_err());
        assert!(store.get(&young).await.is_ok());
        assert!(replay.closed.is_cancelled());
    }

    #[tokio::test]
    async fn test_close_all_ends_every_session() {
        let (store, _) = store_with_clock(10);
        let a = store.create().await;
        let b = store.create().await;
        let replay_a = store.replay_after(&a, None).await.unwrap();
        let replay_b = store.replay_after(&b, None).await.unwrap();

        assert_eq!(store.close_all().await, 2);
        assert!(replay_a.closed.is_cancelled());
        assert!(replay_b.closed.is_cancelled());
        assert!(store.is_empty().await);
        assert!(store.get(&a).await.is_err());
        assert_eq!(store.close_all().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_task_runs_until_stopped() {
        let (store, clock) = store_with_clock(10);
        let store = Arc::new(store);
        store.create().await;

        let task = SweepTask::spawn(store.clone(), Duration::from_secs(60));
        clock.advance(chrono::Duration::minutes(31));
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(store.len().await, 0);

        task.stop().await;

        // Nothing sweeps after stop
        store.create().await;
        clock.advance(chrono::Duration::minutes(31));
        tokio::time::sleep(Duration::from_secs(180)).await;
        assert_eq!(store.len().await, 1);
    }
}
