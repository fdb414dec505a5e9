//! Available proxy sets, partitioned by transport protocol

use crate::proxy::Protocol;
use std::collections::HashSet;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Default)]
struct Members {
    http: HashSet<String>,
    https: HashSet<String>,
}

/// The currently trusted proxies.
///
/// Both sets live behind one lock so that moving a proxy between them is a
/// single step: a proxy is never a member of both.
#[derive(Debug, Default)]
pub struct AvailableSets {
    members: RwLock<Members>,
}

impl AvailableSets {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Members> {
        self.members.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Members> {
        self.members.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Place a proxy in the set for `protocol`, leaving the other set.
    ///
    /// Returns false for `Protocol::Unknown`, which has no set.
    pub fn admit(&self, proxy: &str, protocol: Protocol) -> bool {
        let mut members = self.write();
        match protocol {
            Protocol::Http => {
                members.https.remove(proxy);
                members.http.insert(proxy.to_string());
            }
            Protocol::Https => {
                members.http.remove(proxy);
                members.https.insert(proxy.to_string());
            }
            Protocol::Unknown => return false,
        }
        true
    }

    /// Remove a proxy from whichever set holds it; no-op for non-members
    pub fn evict(&self, proxy: &str) -> Option<Protocol> {
        let mut members = self.write();
        if members.http.remove(proxy) {
            Some(Protocol::Http)
        } else if members.https.remove(proxy) {
            Some(Protocol::Https)
        } else {
            None
        }
    }

    pub fn http(&self) -> Vec<String> {
        self.read().http.iter().cloned().collect()
    }

    pub fn https(&self) -> Vec<String> {
        self.read().https.iter().cloned().collect()
    }

    /// Union of both sets, HTTP members first
    pub fn all(&self) -> Vec<String> {
        let members = self.read();
        members
            .http
            .iter()
            .chain(members.https.iter())
            .cloned()
            .collect()
    }

    /// (http, https) member counts taken under one lock
    pub fn counts(&self) -> (usize, usize) {
        let members = self.read();
        (members.http.len(), members.https.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admit_places_in_protocol_set() {
        let sets = AvailableSets::new();
        assert!(sets.admit("http://1.2.3.4:8080", Protocol::Https));

        assert_eq!(sets.https(), vec!["http://1.2.3.4:8080"]);
        assert!(sets.http().is_empty());
        assert_eq!(sets.counts(), (0, 1));
    }

    #[test]
    fn test_admit_moves_between_sets() {
        let sets = AvailableSets::new();
        sets.admit("http://1.2.3.4:8080", Protocol::Http);
        sets.admit("http://1.2.3.4:8080", Protocol::Https);

        assert!(sets.http().is_empty());
        assert_eq!(sets.https().len(), 1);
        assert_eq!(sets.counts(), (0, 1));
    }

    #[test]
    fn test_admit_unknown_is_refused() {
        let sets = AvailableSets::new();
        assert!(!sets.admit("http://1.2.3.4:8080", Protocol::Unknown));
        assert!(sets.all().is_empty());
    }

    #[test]
    fn test_evict_from_either_set() {
        let sets = AvailableSets::new();
        sets.admit("http://5.6.7.8:80", Protocol::Http);
        sets.admit("http://9.9.9.9:3128", Protocol::Https);

        assert_eq!(sets.evict("http://5.6.7.8:80"), Some(Protocol::Http));
        assert_eq!(sets.evict("http://9.9.9.9:3128"), Some(Protocol::Https));
        assert!(sets.all().is_empty());
    }

    #[test]
    fn test_evict_non_member_is_noop() {
        let sets = AvailableSets::new();
        sets.admit("http://5.6.7.8:80", Protocol::Http);

        assert_eq!(sets.evict("http://0.0.0.0:1"), None);
        assert_eq!(sets.evict("http://0.0.0.0:1"), None);
        assert_eq!(sets.counts(), (1, 0));
    }

    #[test]
    fn test_duplicate_admit_is_single_member() {
        let sets = AvailableSets::new();
        sets.admit("http://5.6.7.8:80", Protocol::Http);
        sets.admit("http://5.6.7.8:80", Protocol::Http);
        assert_eq!(sets.all(), vec!["http://5.6.7.8:80"]);
    }
}
