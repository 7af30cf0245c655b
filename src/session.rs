// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Per-actor workspace selection with idle and capacity eviction

use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::config::SessionConfig;

/// State kept for one actor (browser session or chat user)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    /// Currently selected workspace
    pub workspace: Option<String>,
    /// Last directory listing shown to this actor
    pub available: Vec<String>,
}

#[derive(Debug)]
struct Entry {
    session: Session,
    last_seen: Instant,
}

/// Session map owned by an adapter.
///
/// Entries idle for longer than `idle_ttl` are dropped; once `max_entries` is reached the
/// least recently touched entry makes room for a new one.
#[derive(Debug)]
pub struct SessionStore<K> {
    entries: HashMap<K, Entry>,
    max_entries: usize,
    idle_ttl: Duration,
}

impl<K: Eq + Hash + Clone + std::fmt::Debug> SessionStore<K> {
    pub fn new(max_entries: usize, idle_ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            max_entries: max_entries.max(1),
            idle_ttl,
        }
    }

    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(config.max_entries, config.idle_ttl())
    }

    /// Snapshot of the actor's session, refreshing its idle timer
    pub fn get(&mut self, key: &K) -> Option<Session> {
        self.get_at(key, Instant::now())
    }

    pub fn workspace(&mut self, key: &K) -> Option<String> {
        self.get(key).and_then(|s| s.workspace)
    }

    /// Record the actor's workspace choice
    pub fn select(&mut self, key: K, workspace: impl Into<String>) {
        let workspace = workspace.into();
        self.update_at(key, Instant::now(), |s| s.workspace = Some(workspace));
    }

    /// Record the directory listing last shown to the actor
    pub fn set_available(&mut self, key: K, available: Vec<String>) {
        self.update_at(key, Instant::now(), |s| s.available = available);
    }

    /// Drop every idle entry
    pub fn sweep(&mut self) -> usize {
        self.sweep_at(Instant::now())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn is_expired(&self, entry: &Entry, now: Instant) -> bool {
        now.saturating_duration_since(entry.last_seen) > self.idle_ttl
    }

    fn get_at(&mut self, key: &K, now: Instant) -> Option<Session> {
        let expired = match self.entries.get(key) {
            Some(entry) => self.is_expired(entry, now),
            None => return None,
        };
        if expired {
            debug!("Session {:?} expired", key);
            self.entries.remove(key);
            return None;
        }
        self.entries.get_mut(key).map(|entry| {
            entry.last_seen = now;
            entry.session.clone()
        })
    }

    fn update_at(&mut self, key: K, now: Instant, apply: impl FnOnce(&mut Session)) {
        if let Some(entry) = self.entries.get(&key) {
            if self.is_expired(entry, now) {
                self.entries.remove(&key);
            }
        }

        if !self.entries.contains_key(&key) && self.entries.len() >= self.max_entries {
            self.sweep_at(now);
            if self.entries.len() >= self.max_entries {
                self.evict_oldest();
            }
        }

        let entry = self.entries.entry(key).or_insert_with(|| Entry {
            session: Session::default(),
            last_seen: now,
        });
        entry.last_seen = now;
        apply(&mut entry.session);
    }

    fn sweep_at(&mut self, now: Instant) -> usize {
        let ttl = self.idle_ttl;
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| now.saturating_duration_since(entry.last_seen) <= ttl);
        before - self.entries.len()
    }

    fn evict_oldest(&mut self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.last_seen)
            .map(|(key, _)| key.clone());
        if let Some(key) = oldest {
            debug!("Evicting least recently used session {:?}", key);
            self.entries.remove(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_is_last_write_wins() {
        let mut store = SessionStore::new(10, Duration::from_secs(60));
        store.select(7u64, "taipei");
        store.select(7u64, "taipei");
        assert_eq!(store.workspace(&7), Some("taipei".to_string()));
        store.select(7u64, "tainan");
        assert_eq!(store.workspace(&7), Some("tainan".to_string()));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_actors_are_isolated() {
        let mut store = SessionStore::new(10, Duration::from_secs(60));
        store.select(1u64, "a");
        assert_eq!(store.workspace(&2), None);
    }

    #[test]
    fn test_available_list_keeps_selection() {
        let mut store = SessionStore::new(10, Duration::from_secs(60));
        store.select("browser", "a");
        store.set_available("browser", vec!["a".into(), "b".into()]);
        let session = store.get(&"browser").unwrap();
        assert_eq!(session.workspace.as_deref(), Some("a"));
        assert_eq!(session.available, vec!["a", "b"]);
    }

    #[test]
    fn test_idle_entries_expire() {
        let mut store = SessionStore::new(10, Duration::from_secs(60));
        let start = Instant::now();
        store.update_at(1u64, start, |s| s.workspace = Some("a".into()));
        store.update_at(2u64, start + Duration::from_secs(50), |s| s.workspace = Some("b".into()));

        let later = start + Duration::from_secs(90);
        assert_eq!(store.get_at(&1, later), None);
        assert!(store.get_at(&2, later).is_some());
        assert_eq!(store.sweep_at(later + Duration::from_secs(120)), 1);
        assert!(store.is_empty());
    }

    #[test]
    fn test_capacity_evicts_least_recently_used() {
        let mut store = SessionStore::new(2, Duration::from_secs(600));
        let start = Instant::now();
        store.update_at(1u64, start, |s| s.workspace = Some("a".into()));
        store.update_at(2u64, start + Duration::from_secs(1), |s| s.workspace = Some("b".into()));
        // touching 1 makes 2 the oldest
        store.get_at(&1, start + Duration::from_secs(2));
        store.update_at(3u64, start + Duration::from_secs(3), |s| s.workspace = Some("c".into()));

        assert_eq!(store.len(), 2);
        assert!(store.get_at(&2, start + Duration::from_secs(4)).is_none());
        assert!(store.get_at(&1, start + Duration::from_secs(4)).is_some());
        assert!(store.get_at(&3, start + Duration::from_secs(4)).is_some());
    }
}
