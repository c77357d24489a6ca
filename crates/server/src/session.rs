//! Live session registry
//!
//! Tracks the voice sessions that currently have a transport attached.
//! Sessions are removed when their socket closes; idle ones are stopped by
//! a background cleanup task.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;

use voice_agent_agent::VoiceSession;

use crate::ServerError;

/// How often idle sessions are swept
const CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

/// A registered session with activity tracking
pub struct LiveSession {
    pub session: Arc<VoiceSession>,
    pub created_at: Instant,
    last_activity: RwLock<Instant>,
}

impl std::fmt::Debug for LiveSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveSession")
            .field("id", &self.id())
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

impl LiveSession {
    fn new(session: Arc<VoiceSession>) -> Self {
        let now = Instant::now();
        Self {
            session,
            created_at: now,
            last_activity: RwLock::new(now),
        }
    }

    pub fn id(&self) -> &str {
        self.session.session_id()
    }

    /// Update last activity
    pub fn touch(&self) {
        *self.last_activity.write() = Instant::now();
    }

    pub fn is_expired(&self, timeout: Duration) -> bool {
        self.last_activity.read().elapsed() > timeout
    }
}

/// Session registry
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<LiveSession>>>,
    max_sessions: usize,
    session_timeout: Duration,
}

impl SessionRegistry {
    pub fn new(max_sessions: usize, session_timeout: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            max_sessions: max_sessions.max(1),
            session_timeout,
        }
    }

    /// Register a session; refused once `max_sessions` are live
    pub fn register(&self, session: Arc<VoiceSession>) -> Result<Arc<LiveSession>, ServerError> {
        let mut sessions = self.sessions.write();
        if sessions.len() >= self.max_sessions {
            return Err(ServerError::Session(format!(
                "Maximum sessions reached ({})",
                self.max_sessions
            )));
        }

        let live = Arc::new(LiveSession::new(session));
        sessions.insert(live.id().to_string(), Arc::clone(&live));
        metrics::gauge!("voice_agent_active_sessions").set(sessions.len() as f64);
        tracing::info!(session_id = %live.id(), room = %live.session.room(), "Registered session");
        Ok(live)
    }

    pub fn get(&self, id: &str) -> Option<Arc<LiveSession>> {
        self.sessions.read().get(id).cloned()
    }

    /// Remove a session without stopping it
    pub fn remove(&self, id: &str) -> Option<Arc<LiveSession>> {
        let mut sessions = self.sessions.write();
        let removed = sessions.remove(id);
        if removed.is_some() {
            metrics::gauge!("voice_agent_active_sessions").set(sessions.len() as f64);
            tracing::info!(session_id = %id, "Removed session");
        }
        removed
    }

    pub fn count(&self) -> usize {
        self.sessions.read().len()
    }

    /// Remove and stop sessions idle for longer than the timeout
    pub async fn cleanup_expired(&self) -> usize {
        let expired: Vec<Arc<LiveSession>> = {
            let mut sessions = self.sessions.write();
            let ids: Vec<String> = sessions
                .iter()
                .filter(|(_, s)| s.is_expired(self.session_timeout))
                .map(|(id, _)| id.clone())
                .collect();
            let expired = ids.iter().filter_map(|id| sessions.remove(id)).collect();
            metrics::gauge!("voice_agent_active_sessions").set(sessions.len() as f64);
            expired
        };

        for live in &expired {
            tracing::info!(session_id = %live.id(), "Expired session");
            live.session.stop().await;
        }
        expired.len()
    }

    /// Stop every live session (server shutdown)
    pub async fn stop_all(&self) {
        let all: Vec<Arc<LiveSession>> = self.sessions.write().drain().map(|(_, s)| s).collect();
        for live in all {
            live.session.stop().await;
        }
        metrics::gauge!("voice_agent_active_sessions").set(0.0);
    }

    /// Periodically stop expired sessions
    ///
    /// Returns a shutdown sender; send `true` to stop the task.
    pub fn start_cleanup_task(self: &Arc<Self>) -> watch::Sender<bool> {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let registry = Arc::clone(self);

        tokio::spawn(async move {
            let mut interval_timer = tokio::time::interval(CLEANUP_INTERVAL);
            interval_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = interval_timer.tick() => {
                        let removed = registry.cleanup_expired().await;
                        if removed > 0 {
                            tracing::info!(
                                removed,
                                remaining = registry.count(),
                                "Session cleanup"
                            );
                        }
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            tracing::info!("Session cleanup task shutting down");
                            break;
                        }
                    }
                }
            }
        });

        shutdown_tx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::tests::test_services;
    use voice_agent_agent::VoiceSessionConfig;

    fn session(id: &str) -> Arc<VoiceSession> {
        VoiceSession::new(id, "room-1", VoiceSessionConfig::default(), test_services())
    }

    #[test]
    fn test_register_and_remove() {
        let registry = SessionRegistry::new(10, Duration::from_secs(60));
        registry.register(session("s-1")).unwrap();

        assert_eq!(registry.count(), 1);
        assert!(registry.get("s-1").is_some());

        assert!(registry.remove("s-1").is_some());
        assert!(registry.get("s-1").is_none());
        assert!(registry.remove("s-1").is_none());
    }

    #[test]
    fn test_register_refuses_beyond_capacity() {
        let registry = SessionRegistry::new(1, Duration::from_secs(60));
        registry.register(session("s-1")).unwrap();

        let err = registry.register(session("s-2")).unwrap_err();
        assert!(matches!(err, ServerError::Session(_)));
        assert_eq!(registry.count(), 1);
    }

    #[tokio::test]
    async fn test_cleanup_stops_expired_sessions() {
        let registry = SessionRegistry::new(10, Duration::ZERO);
        let live = registry.register(session("s-1")).unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;

        assert_eq!(registry.cleanup_expired().await, 1);
        assert_eq!(registry.count(), 0);
        assert!(live.session.is_stopped());
    }

    #[tokio::test]
    async fn test_touch_keeps_session_alive() {
        let registry = SessionRegistry::new(10, Duration::from_secs(60));
        let live = registry.register(session("s-1")).unwrap();
        live.touch();

        assert_eq!(registry.cleanup_expired().await, 0);
        assert!(!live.session.is_stopped());
    }
}
