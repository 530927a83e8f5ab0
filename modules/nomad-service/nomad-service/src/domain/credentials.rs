use std::collections::HashMap;
use std::fmt;

use serde::Deserialize;
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::snapshot::{SnapshotFile, SnapshotSource};

/// Shared key of one service. Never printed, wiped on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct ServiceKey(String);

impl ServiceKey {
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Compare against a caller-supplied key in constant time.
    #[must_use]
    pub fn matches(&self, candidate: &str) -> bool {
        constant_time_eq(self.0.as_bytes(), candidate.as_bytes())
    }
}

impl fmt::Debug for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ServiceKey([REDACTED])")
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }

    diff == 0
}

/// Service name to shared key, as read from the keys file.
#[derive(Debug, Default)]
pub struct CredentialSnapshot {
    keys: HashMap<String, ServiceKey>,
}

#[derive(Deserialize)]
struct KeyEntry {
    key: String,
}

impl CredentialSnapshot {
    pub fn from_pairs<I, S, K>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, K)>,
        S: Into<String>,
        K: Into<String>,
    {
        Self {
            keys: pairs
                .into_iter()
                .map(|(service, key)| (service.into(), ServiceKey::new(key)))
                .collect(),
        }
    }

    #[must_use]
    pub fn get(&self, service: &str) -> Option<&ServiceKey> {
        self.keys.get(service)
    }

    /// `true` only if `service` is known and `key` is its shared key.
    #[must_use]
    pub fn verify(&self, service: &str, key: &str) -> bool {
        self.get(service).is_some_and(|expected| expected.matches(key))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl SnapshotSource for CredentialSnapshot {
    const KIND: &'static str = "service keys";

    fn parse(raw: &[u8]) -> Result<Self, serde_json::Error> {
        let entries: HashMap<String, KeyEntry> = serde_json::from_slice(raw)?;
        let keys = entries
            .into_iter()
            .filter_map(|(service, entry)| {
                if entry.key.is_empty() {
                    tracing::warn!(%service, "Ignoring service with an empty key");
                    return None;
                }
                Some((service, ServiceKey::new(entry.key)))
            })
            .collect();
        Ok(Self { keys })
    }

    fn entries(&self) -> usize {
        self.len()
    }
}

pub type CredentialStore = SnapshotFile<CredentialSnapshot>;

impl SnapshotFile<CredentialSnapshot> {
    /// Check `key` against the current key of `service`.
    #[must_use]
    pub fn verify(&self, service: &str, key: &str) -> bool {
        self.snapshot().verify(service, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parses_keys_file() {
        let snap = CredentialSnapshot::parse(
            br#"{"wiki": {"key": "s3cret"}, "bananas": {"key": "yellow", "note": "x"}}"#,
        )
        .unwrap();
        assert_eq!(snap.len(), 2);
        assert!(snap.verify("wiki", "s3cret"));
        assert!(!snap.verify("wiki", "s3cre"));
        assert!(!snap.verify("wiki", "yellow"));
        assert!(!snap.verify("unknown", "s3cret"));
    }

    #[test]
    fn empty_keys_never_authenticate() {
        let snap = CredentialSnapshot::parse(br#"{"wiki": {"key": ""}}"#).unwrap();
        assert!(snap.is_empty());
        assert!(!snap.verify("wiki", ""));
    }

    #[test]
    fn missing_key_field_is_a_parse_error() {
        assert!(CredentialSnapshot::parse(br#"{"wiki": {}}"#).is_err());
    }

    #[test]
    fn debug_output_is_redacted() {
        let snap = CredentialSnapshot::from_pairs([("wiki", "hunter2")]);
        let rendered = format!("{snap:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("REDACTED"));
    }

    #[test]
    fn reload_replaces_whole_mapping() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"wiki": {{"key": "old"}}, "gone": {{"key": "x"}}}}"#).unwrap();
        let store = CredentialStore::load(file.path()).unwrap();
        assert!(store.verify("gone", "x"));

        std::fs::write(file.path(), br#"{"wiki": {"key": "new"}}"#).unwrap();
        store.reload().unwrap();
        assert!(store.verify("wiki", "new"));
        assert!(!store.verify("wiki", "old"));
        assert!(!store.verify("gone", "x"));
    }

    #[test]
    fn failed_reload_keeps_previous_mapping() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), br#"{"wiki": {"key": "old"}}"#).unwrap();
        let store = CredentialStore::load(file.path()).unwrap();

        std::fs::write(file.path(), b"{ not json").unwrap();
        assert!(store.reload().is_err());
        assert!(store.verify("wiki", "old"));
    }

    #[test]
    fn startup_load_fails_for_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = CredentialStore::load(dir.path().join("service-keys.json"))
            .err()
            .unwrap();
        assert!(err.is_not_found());
    }
}
