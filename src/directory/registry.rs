//! The lobby directory: the source of truth for live sessions.
//!
//! Three lookup indices (descriptor, host key, join code) plus the name
//! pool are mutated under one write guard, so every create/remove is a
//! single logical unit and no index entry can outlive its session.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Weak};

use rand::Rng;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

use super::names::NamePool;
use super::session::{PendingJoin, Session, SessionInfo, SessionKind, SessionTicket};
use crate::core::{
    HOST_KEY_ALPHABET, HOST_KEY_LENGTH, JOIN_CODE_ALPHABET, JOIN_CODE_LENGTH, SWEEP_INTERVAL,
};

fn random_token(alphabet: &[u8], len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| alphabet[rng.gen_range(0..alphabet.len())] as char)
        .collect()
}

/// Primary store plus secondary indices, all behind one lock.
#[derive(Default)]
struct Index {
    /// Descriptor -> session (primary).
    sessions: HashMap<String, Session>,
    /// Host key -> descriptor.
    by_key: HashMap<String, String>,
    /// Join code (uppercase) -> descriptor.
    by_code: HashMap<String, String>,
}

impl Index {
    /// Remove a session and every entry pointing at it.
    ///
    /// Removal order: descriptor first, then key, then code, then the
    /// name, so no index outlives the session's primary entry.
    fn remove(&mut self, descriptor: &str, names: &NamePool) -> Option<Session> {
        let session = self.sessions.remove(descriptor)?;
        self.by_key.remove(&session.host_key);
        if let Some(code) = &session.join_code {
            self.by_code.remove(code);
        }
        names.release(&session.name);
        Some(session)
    }

    /// Remove the session at `descriptor` if it is dead. Returns `true`
    /// when a live session remains.
    fn reap_if_dead(&mut self, descriptor: &str, names: &NamePool, now: Instant) -> bool {
        match self.sessions.get(descriptor) {
            Some(session) if session.is_live(now) => true,
            Some(_) => {
                debug!(descriptor, "reaping dead session on lookup");
                self.remove(descriptor, names);
                false
            }
            None => false,
        }
    }
}

/// The directory of live sessions.
///
/// All operations take `&self`; internal state is a single
/// reader/writer lock over the index plus the name pool's own guard.
pub struct LobbyDirectory {
    inner: RwLock<Index>,
    names: NamePool,
}

impl LobbyDirectory {
    /// Create an empty directory.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Index::default()),
            names: NamePool::new(),
        }
    }

    /// Register a session hosted at `descriptor`.
    ///
    /// Generates the host credential and, unless the session is
    /// platform-native, a unique join code. The requested display name
    /// is kept if free, otherwise a fresh one is generated.
    ///
    /// A session already registered at the same descriptor is removed
    /// first, releasing its name, credential, and code.
    pub async fn create(
        &self,
        descriptor: &str,
        name: &str,
        kind: SessionKind,
        lan_hint: Option<SocketAddr>,
        public: bool,
    ) -> SessionTicket {
        let mut index = self.inner.write().await;

        if index.remove(descriptor, &self.names).is_some() {
            debug!(descriptor, "create replaced an existing session");
        }

        let name = if self.names.claim(name) {
            name.to_string()
        } else {
            self.names.generate()
        };

        let host_key = loop {
            let key = random_token(HOST_KEY_ALPHABET, HOST_KEY_LENGTH);
            if !index.by_key.contains_key(&key) {
                break key;
            }
        };

        let join_code = (kind != SessionKind::Platform).then(|| loop {
            let code = random_token(JOIN_CODE_ALPHABET, JOIN_CODE_LENGTH);
            if !index.by_code.contains_key(&code) {
                break code;
            }
        });

        let session = Session {
            descriptor: descriptor.to_string(),
            name: name.clone(),
            kind,
            host_key: host_key.clone(),
            join_code: join_code.clone(),
            public,
            lan_hint,
            last_heartbeat: Instant::now(),
            pending_joins: Default::default(),
        };

        index.by_key.insert(host_key.clone(), descriptor.to_string());
        if let Some(code) = &join_code {
            index.by_code.insert(code.clone(), descriptor.to_string());
        }
        index.sessions.insert(descriptor.to_string(), session);

        debug!(descriptor, name = %name, kind = %kind, "session registered");
        SessionTicket {
            name,
            host_key,
            join_code,
        }
    }

    /// Look up a session by descriptor.
    ///
    /// A dead session is removed on the spot and reported as absent.
    pub async fn get(&self, descriptor: &str) -> Option<SessionInfo> {
        let mut index = self.inner.write().await;
        self.get_locked(&mut index, descriptor)
    }

    fn get_locked(&self, index: &mut Index, descriptor: &str) -> Option<SessionInfo> {
        if !index.reap_if_dead(descriptor, &self.names, Instant::now()) {
            return None;
        }
        index.sessions.get(descriptor).map(Session::snapshot)
    }

    /// Look up a session by host credential.
    pub async fn get_by_key(&self, host_key: &str) -> Option<SessionInfo> {
        let mut index = self.inner.write().await;
        let descriptor = index.by_key.get(host_key)?.clone();
        self.get_locked(&mut index, &descriptor)
    }

    /// Look up a session by join code, case-insensitively.
    pub async fn get_by_code(&self, code: &str) -> Option<SessionInfo> {
        let code = code.to_ascii_uppercase();
        let mut index = self.inner.write().await;
        let descriptor = index.by_code.get(&code)?.clone();
        self.get_locked(&mut index, &descriptor)
    }

    /// Refresh a session's heartbeat.
    ///
    /// Returns `false` if no live session holds the credential.
    pub async fn heartbeat(&self, host_key: &str) -> bool {
        let now = Instant::now();
        let mut index = self.inner.write().await;
        let Some(descriptor) = index.by_key.get(host_key).cloned() else {
            return false;
        };
        if !index.reap_if_dead(&descriptor, &self.names, now) {
            return false;
        }
        if let Some(session) = index.sessions.get_mut(&descriptor) {
            session.touch(now);
            true
        } else {
            false
        }
    }

    /// Remove a session by host credential, releasing all of its index
    /// entries and its name.
    pub async fn remove_by_key(&self, host_key: &str) -> bool {
        let mut index = self.inner.write().await;
        let Some(descriptor) = index.by_key.get(host_key).cloned() else {
            return false;
        };
        let removed = index.remove(&descriptor, &self.names).is_some();
        if removed {
            debug!(%descriptor, "session removed by host");
        }
        removed
    }

    /// All live public sessions, optionally filtered by kind.
    pub async fn list(&self, kind: Option<SessionKind>) -> Vec<SessionInfo> {
        let now = Instant::now();
        let index = self.inner.read().await;
        index
            .sessions
            .values()
            .filter(|s| s.public && s.is_live(now))
            .filter(|s| kind.is_none_or(|k| s.kind == k))
            .map(Session::snapshot)
            .collect()
    }

    /// All live sessions regardless of visibility. Administrative use.
    pub async fn list_all(&self) -> Vec<SessionInfo> {
        let now = Instant::now();
        let index = self.inner.read().await;
        index
            .sessions
            .values()
            .filter(|s| s.is_live(now))
            .map(Session::snapshot)
            .collect()
    }

    /// Remove every currently-dead session. Returns the number removed.
    pub async fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let mut index = self.inner.write().await;
        let dead: Vec<String> = index
            .sessions
            .values()
            .filter(|s| !s.is_live(now))
            .map(|s| s.descriptor.clone())
            .collect();
        for descriptor in &dead {
            index.remove(descriptor, &self.names);
        }
        dead.len()
    }

    /// Record a join request against a live session so the host can
    /// punch back toward the observed endpoint.
    pub async fn register_join(&self, descriptor: &str, observed: SocketAddr) -> bool {
        let now = Instant::now();
        let mut index = self.inner.write().await;
        if !index.reap_if_dead(descriptor, &self.names, now) {
            return false;
        }
        if let Some(session) = index.sessions.get_mut(descriptor) {
            session.pending_joins.push_back(PendingJoin {
                addr: observed,
                requested_at: now,
            });
            true
        } else {
            false
        }
    }

    /// Drain the pending-join queue. Host-authenticated.
    pub async fn take_pending(&self, host_key: &str) -> Vec<PendingJoin> {
        let mut index = self.inner.write().await;
        let Some(descriptor) = index.by_key.get(host_key).cloned() else {
            return Vec::new();
        };
        match index.sessions.get_mut(&descriptor) {
            Some(session) => session.pending_joins.drain(..).collect(),
            None => Vec::new(),
        }
    }

    /// Spawn the periodic expiry sweep.
    ///
    /// The task holds only a weak reference and exits once the
    /// directory is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        let weak: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
            ticker.tick().await; // first tick is immediate
            loop {
                ticker.tick().await;
                let Some(directory) = weak.upgrade() else {
                    break;
                };
                let removed = directory.sweep_expired().await;
                if removed > 0 {
                    info!(removed, "expired sessions swept");
                }
            }
        })
    }
}

impl Default for LobbyDirectory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const DESCRIPTOR: &str = "1.2.3.4:9000";

    async fn create_default(directory: &LobbyDirectory, name: &str) -> SessionTicket {
        directory
            .create(DESCRIPTOR, name, SessionKind::Direct, None, true)
            .await
    }

    #[tokio::test]
    async fn test_create_issues_wellformed_credentials() {
        let directory = LobbyDirectory::new();
        let ticket = create_default(&directory, "Foo").await;

        assert_eq!(ticket.name, "Foo");
        assert_eq!(ticket.host_key.len(), HOST_KEY_LENGTH);
        assert!(ticket
            .host_key
            .bytes()
            .all(|b| HOST_KEY_ALPHABET.contains(&b)));

        let code = ticket.join_code.expect("direct sessions get a code");
        assert_eq!(code.len(), JOIN_CODE_LENGTH);
        assert!(code.bytes().all(|b| JOIN_CODE_ALPHABET.contains(&b)));
    }

    #[tokio::test]
    async fn test_platform_sessions_have_no_code() {
        let directory = LobbyDirectory::new();
        let ticket = directory
            .create("lobby-873441", "Foo", SessionKind::Platform, None, true)
            .await;
        assert!(ticket.join_code.is_none());
    }

    #[tokio::test]
    async fn test_lookup_by_all_indices() {
        let directory = LobbyDirectory::new();
        let ticket = create_default(&directory, "Foo").await;
        let code = ticket.join_code.clone().unwrap();

        let by_descriptor = directory.get(DESCRIPTOR).await.unwrap();
        let by_key = directory.get_by_key(&ticket.host_key).await.unwrap();
        let by_code = directory.get_by_code(&code).await.unwrap();
        assert_eq!(by_descriptor, by_key);
        assert_eq!(by_descriptor, by_code);

        // Code lookup is case-insensitive.
        let lowered = directory.get_by_code(&code.to_lowercase()).await.unwrap();
        assert_eq!(by_descriptor, lowered);
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_expires_without_heartbeat() {
        let directory = LobbyDirectory::new();
        let ticket = create_default(&directory, "Foo").await;
        let code = ticket.join_code.clone().unwrap();

        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(directory.get(DESCRIPTOR).await.is_some());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(directory.get(DESCRIPTOR).await.is_none());
        assert!(directory.get_by_code(&code).await.is_none());
        assert!(directory.get_by_key(&ticket.host_key).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_keeps_session_alive() {
        let directory = LobbyDirectory::new();
        let ticket = create_default(&directory, "Foo").await;

        for _ in 0..4 {
            tokio::time::advance(Duration::from_secs(45)).await;
            assert!(directory.heartbeat(&ticket.host_key).await);
        }
        assert!(directory.get(DESCRIPTOR).await.is_some());

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(!directory.heartbeat(&ticket.host_key).await);
    }

    #[tokio::test]
    async fn test_heartbeat_unknown_key() {
        let directory = LobbyDirectory::new();
        assert!(!directory.heartbeat("nosuchkey").await);
    }

    #[tokio::test]
    async fn test_remove_releases_everything() {
        let directory = LobbyDirectory::new();
        let ticket = create_default(&directory, "Foo").await;
        let code = ticket.join_code.clone().unwrap();

        assert!(directory.remove_by_key(&ticket.host_key).await);
        assert!(!directory.remove_by_key(&ticket.host_key).await);

        assert!(directory.get(DESCRIPTOR).await.is_none());
        assert!(directory.get_by_code(&code).await.is_none());
        // Name is free for the next host.
        let again = create_default(&directory, "Foo").await;
        assert_eq!(again.name, "Foo");
    }

    #[tokio::test]
    async fn test_create_on_occupied_descriptor_releases_old_mappings() {
        let directory = LobbyDirectory::new();
        let first = create_default(&directory, "First").await;
        let first_code = first.join_code.clone().unwrap();

        let second = create_default(&directory, "Second").await;

        // The old session's mappings must not linger.
        assert!(directory.get_by_key(&first.host_key).await.is_none());
        assert!(directory.get_by_code(&first_code).await.is_none());
        assert!(!directory.heartbeat(&first.host_key).await);

        // Its name is released too.
        let reclaimed = create_default(&directory, "First").await;
        assert_eq!(reclaimed.name, "First");
        let _ = second;
    }

    #[tokio::test]
    async fn test_contested_name_single_winner() {
        let directory = LobbyDirectory::new();
        let a = directory
            .create("1.1.1.1:9000", "Shared", SessionKind::Direct, None, true)
            .await;
        let b = directory
            .create("2.2.2.2:9000", "Shared", SessionKind::Direct, None, true)
            .await;

        assert_eq!(a.name, "Shared");
        assert_ne!(b.name, "Shared");
        assert_ne!(a.host_key, b.host_key);
        assert_ne!(a.join_code, b.join_code);
    }

    #[tokio::test]
    async fn test_list_filters_visibility_and_kind() {
        let directory = LobbyDirectory::new();
        directory
            .create("1.1.1.1:9000", "Pub", SessionKind::Direct, None, true)
            .await;
        directory
            .create("2.2.2.2:9000", "Priv", SessionKind::Direct, None, false)
            .await;
        directory
            .create("lobby-42", "Native", SessionKind::Platform, None, true)
            .await;

        let public = directory.list(None).await;
        assert_eq!(public.len(), 2);
        assert!(public.iter().all(|s| s.public));

        let direct = directory.list(Some(SessionKind::Direct)).await;
        assert_eq!(direct.len(), 1);
        assert_eq!(direct[0].name, "Pub");

        let everything = directory.list_all().await;
        assert_eq!(everything.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_removes_exactly_the_expired() {
        let directory = LobbyDirectory::new();
        let old = create_default(&directory, "Old").await;

        tokio::time::advance(Duration::from_secs(45)).await;
        let young = directory
            .create("5.6.7.8:9000", "Young", SessionKind::Direct, None, true)
            .await;

        tokio::time::advance(Duration::from_secs(20)).await;
        // Old is 65s stale, Young only 20s.
        assert_eq!(directory.sweep_expired().await, 1);
        assert!(directory.get_by_key(&old.host_key).await.is_none());
        assert!(directory.get_by_key(&young.host_key).await.is_some());
        assert_eq!(directory.sweep_expired().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawned_sweeper_runs_on_cadence() {
        let directory = Arc::new(LobbyDirectory::new());
        let ticket = create_default(&directory, "Foo").await;
        let sweeper = directory.spawn_sweeper();
        tokio::task::yield_now().await;

        tokio::time::advance(Duration::from_secs(61)).await;
        // Give the sweeper a tick to run.
        tokio::task::yield_now().await;

        let index = directory.inner.read().await;
        assert!(index.sessions.is_empty());
        assert!(index.by_key.is_empty());
        assert!(index.by_code.is_empty());
        drop(index);
        let _ = ticket;
        sweeper.abort();
    }

    #[tokio::test]
    async fn test_pending_joins_roundtrip() {
        let directory = LobbyDirectory::new();
        let ticket = create_default(&directory, "Foo").await;
        let joiner: SocketAddr = "9.9.9.9:4242".parse().unwrap();

        assert!(directory.register_join(DESCRIPTOR, joiner).await);
        assert!(!directory.register_join("unknown", joiner).await);

        let pending = directory.take_pending(&ticket.host_key).await;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].addr, joiner);

        assert!(directory.take_pending(&ticket.host_key).await.is_empty());
    }
}
