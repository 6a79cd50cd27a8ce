use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::character::age::random_age;
use crate::character::CharacterRecord;
use crate::error::{ForgeError, ForgeResult};
use crate::pipeline::{clamp_portrait_count, GenerationDeps};

pub const SESSION_COOKIE: &str = "forge_session";
pub const DEFAULT_SESSION_IDLE_TTL: Duration = Duration::from_secs(2 * 60 * 60);
pub const DEFAULT_MAX_SESSIONS: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageLevel {
    Info,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusMessage {
    pub level: MessageLevel,
    pub text: String,
}

impl StatusMessage {
    pub fn info(text: impl Into<String>) -> Self {
        StatusMessage {
            level: MessageLevel::Info,
            text: text.into(),
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        StatusMessage {
            level: MessageLevel::Error,
            text: text.into(),
        }
    }
}

/// Files produced by the last successful generation.
#[derive(Debug, Clone)]
pub struct GeneratedDocument {
    pub html: String,
    pub pdf_path: PathBuf,
    pub html_path: PathBuf,
}

#[derive(Debug)]
pub struct Session {
    pub record: CharacterRecord,
    pub portrait_count: usize,
    pub last_document: Option<GeneratedDocument>,
    pub message: Option<StatusMessage>,
    generating: bool,
    last_triggered_at: Option<Instant>,
}

impl Session {
    pub fn new(default_portrait_count: usize) -> Self {
        let record = CharacterRecord {
            age: random_age().to_string(),
            ..Default::default()
        };
        Session {
            record,
            portrait_count: clamp_portrait_count(default_portrait_count),
            last_document: None,
            message: None,
            generating: false,
            last_triggered_at: None,
        }
    }

    pub fn is_generating(&self) -> bool {
        self.generating
    }

    /// Claims the session for one generation run.
    pub fn begin_generation(&mut self, now: Instant, cooldown: Duration) -> ForgeResult<()> {
        if self.generating {
            return Err(ForgeError::Busy);
        }
        if let Some(last) = self.last_triggered_at {
            let elapsed = now.saturating_duration_since(last);
            if elapsed < cooldown {
                let remaining = (cooldown - elapsed).as_secs_f64().ceil() as u64;
                return Err(ForgeError::RateLimited(remaining.max(1)));
            }
        }
        self.generating = true;
        self.last_triggered_at = Some(now);
        Ok(())
    }

    pub fn finish_generation(&mut self) {
        self.generating = false;
    }
}

/// Releases the generation claim even if the request future is dropped.
pub struct GenerationGuard {
    session: Arc<Mutex<Session>>,
}

impl GenerationGuard {
    pub fn new(session: Arc<Mutex<Session>>) -> Self {
        GenerationGuard { session }
    }
}

impl Drop for GenerationGuard {
    fn drop(&mut self) {
        self.session.lock().finish_generation();
    }
}

struct SessionEntry {
    session: Arc<Mutex<Session>>,
    last_seen: Instant,
}

impl SessionEntry {
    /// A locked session is serving a request right now.
    fn in_use(&self) -> bool {
        self.session
            .try_lock()
            .map_or(true, |session| session.is_generating())
    }

    fn is_expired(&self, now: Instant, ttl: Duration) -> bool {
        !self.in_use() && now.saturating_duration_since(self.last_seen) >= ttl
    }
}

/// Drops expired sessions, then evicts the least recently seen idle ones
/// until one more fits under `max`. Sessions in use are never evicted.
fn prune_sessions(
    sessions: &mut HashMap<String, SessionEntry>,
    now: Instant,
    ttl: Duration,
    max: usize,
) {
    let before = sessions.len();
    sessions.retain(|_, entry| !entry.is_expired(now, ttl));

    if sessions.len() >= max {
        let mut idle: Vec<(Instant, String)> = sessions
            .iter()
            .filter(|(_, entry)| !entry.in_use())
            .map(|(id, entry)| (entry.last_seen, id.clone()))
            .collect();
        idle.sort();
        let excess = sessions.len() + 1 - max;
        for (_, id) in idle.into_iter().take(excess) {
            sessions.remove(&id);
        }
    }

    let removed = before - sessions.len();
    if removed > 0 {
        debug!("Pruned {} idle sessions, {} remain", removed, sessions.len());
    }
}

#[derive(Clone)]
pub struct AppState {
    pub deps: GenerationDeps,
    sessions: Arc<Mutex<HashMap<String, SessionEntry>>>,
    pub rate_limit: Duration,
    pub default_portrait_count: usize,
    session_idle_ttl: Duration,
    max_sessions: usize,
}

impl AppState {
    pub fn new(deps: GenerationDeps, rate_limit: Duration, default_portrait_count: usize) -> Self {
        AppState {
            deps,
            sessions: Arc::new(Mutex::new(HashMap::new())),
            rate_limit,
            default_portrait_count,
            session_idle_ttl: DEFAULT_SESSION_IDLE_TTL,
            max_sessions: DEFAULT_MAX_SESSIONS,
        }
    }

    pub fn with_session_limits(mut self, idle_ttl: Duration, max_sessions: usize) -> Self {
        self.session_idle_ttl = idle_ttl;
        self.max_sessions = max_sessions.max(1);
        self
    }

    /// Looks up the session for a cookie value, creating a fresh one for unknown
    /// or expired ids.
    pub fn session(&self, id: Option<&str>) -> (String, Arc<Mutex<Session>>) {
        let now = Instant::now();
        let mut sessions = self.sessions.lock();
        if let Some(id) = id {
            if let Some(entry) = sessions.get_mut(id) {
                if !entry.is_expired(now, self.session_idle_ttl) {
                    entry.last_seen = now;
                    return (id.to_string(), entry.session.clone());
                }
            }
        }

        prune_sessions(&mut sessions, now, self.session_idle_ttl, self.max_sessions);
        let id = Uuid::new_v4().to_string();
        let session = Arc::new(Mutex::new(Session::new(self.default_portrait_count)));
        sessions.insert(
            id.clone(),
            SessionEntry {
                session: session.clone(),
                last_seen: now,
            },
        );
        (id, session)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_sessions_get_a_seeded_age() {
        let session = Session::new(9);
        let age: u32 = session.record.age.parse().unwrap();
        assert!((1..=500).contains(&age));
        assert_eq!(session.portrait_count, 5);
        assert!(session.record.name.is_empty());
    }

    #[test]
    fn second_trigger_while_running_is_busy() {
        let mut session = Session::new(1);
        let now = Instant::now();
        session.begin_generation(now, Duration::ZERO).unwrap();
        assert!(matches!(
            session.begin_generation(now, Duration::ZERO),
            Err(ForgeError::Busy)
        ));
        session.finish_generation();
        session.begin_generation(now, Duration::ZERO).unwrap();
    }

    #[test]
    fn rapid_retrigger_is_rate_limited() {
        let mut session = Session::new(1);
        let start = Instant::now();
        let cooldown = Duration::from_secs(5);
        session.begin_generation(start, cooldown).unwrap();
        session.finish_generation();

        let err = session
            .begin_generation(start + Duration::from_millis(1500), cooldown)
            .unwrap_err();
        assert!(matches!(err, ForgeError::RateLimited(4)));
        session
            .begin_generation(start + Duration::from_secs(6), cooldown)
            .unwrap();
    }

    #[test]
    fn guard_releases_the_claim_on_drop() {
        let session = Arc::new(Mutex::new(Session::new(1)));
        session
            .lock()
            .begin_generation(Instant::now(), Duration::ZERO)
            .unwrap();
        drop(GenerationGuard::new(session.clone()));
        assert!(!session.lock().is_generating());
    }

    fn entry(last_seen: Instant) -> SessionEntry {
        SessionEntry {
            session: Arc::new(Mutex::new(Session::new(1))),
            last_seen,
        }
    }

    #[test]
    fn expired_sessions_are_dropped_unless_generating() {
        let start = Instant::now();
        let ttl = Duration::from_secs(60);
        let mut sessions = HashMap::new();
        sessions.insert("stale".to_string(), entry(start));
        sessions.insert("fresh".to_string(), entry(start + Duration::from_secs(100)));
        let running = entry(start);
        running
            .session
            .lock()
            .begin_generation(start, Duration::ZERO)
            .unwrap();
        sessions.insert("running".to_string(), running);

        prune_sessions(&mut sessions, start + Duration::from_secs(120), ttl, 100);

        assert!(!sessions.contains_key("stale"));
        assert!(sessions.contains_key("fresh"));
        assert!(sessions.contains_key("running"));
    }

    #[test]
    fn full_table_evicts_the_least_recently_seen() {
        let start = Instant::now();
        let ttl = Duration::from_secs(3600);
        let mut sessions = HashMap::new();
        for (offset, id) in ["a", "b", "c"].iter().enumerate() {
            sessions.insert(id.to_string(), entry(start + Duration::from_secs(offset as u64)));
        }

        prune_sessions(&mut sessions, start + Duration::from_secs(10), ttl, 3);

        assert_eq!(sessions.len(), 2);
        assert!(!sessions.contains_key("a"));
        assert!(sessions.contains_key("b"));
        assert!(sessions.contains_key("c"));
    }

    #[test]
    fn locked_sessions_survive_eviction() {
        let start = Instant::now();
        let mut sessions = HashMap::new();
        let held = entry(start);
        let _lock = held.session.lock();
        let session = held.session.clone();
        sessions.insert("held".to_string(), SessionEntry { session, last_seen: start });

        prune_sessions(&mut sessions, start + Duration::from_secs(7200), Duration::from_secs(60), 1);

        assert!(sessions.contains_key("held"));
    }
}
