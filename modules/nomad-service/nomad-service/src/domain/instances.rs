use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use nomad_service_sdk::ServiceInstance;
use serde::Deserialize;
use serde_json::Value;

use super::error::LoadError;
use super::snapshot::{SnapshotFile, SnapshotSource};

/// Live instances per service, as published by service discovery.
#[derive(Debug, Default)]
pub struct InstanceDirectory {
    services: HashMap<String, Vec<ServiceInstance>>,
}

// Loosely typed: a bad entry is skipped, not the whole file.
#[derive(Deserialize)]
struct RawInstance {
    #[serde(default)]
    address: Value,
    #[serde(default)]
    port: Value,
}

impl InstanceDirectory {
    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, Vec<ServiceInstance>)>,
        S: Into<String>,
    {
        Self {
            services: entries
                .into_iter()
                .map(|(service, list)| (service.into(), list))
                .collect(),
        }
    }

    /// Instances of `service`; empty if the service is unknown.
    #[must_use]
    pub fn instances(&self, service: &str) -> &[ServiceInstance] {
        self.services.get(service).map_or(&[], Vec::as_slice)
    }
}

impl SnapshotSource for InstanceDirectory {
    const KIND: &'static str = "service instances";

    fn parse(raw: &[u8]) -> Result<Self, serde_json::Error> {
        let parsed: HashMap<String, Vec<Value>> = serde_json::from_slice(raw)?;
        let services = parsed
            .into_iter()
            .map(|(service, raw)| (service, normalize(raw)))
            .collect();
        Ok(Self { services })
    }

    fn entries(&self) -> usize {
        self.services.len()
    }
}

// Drops blank, malformed and duplicate entries, keeps first-seen order.
fn normalize(raw: Vec<Value>) -> Vec<ServiceInstance> {
    let mut seen = HashSet::new();
    raw.into_iter()
        .filter_map(|value| RawInstance::deserialize(value).ok())
        .filter_map(|entry| {
            let address = entry
                .address
                .as_str()?
                .trim()
                .trim_start_matches('[')
                .trim_end_matches(']')
                .to_owned();
            let port = entry
                .port
                .as_u64()
                .and_then(|p| u16::try_from(p).ok())
                .filter(|p| *p != 0)?;
            if address.is_empty() {
                return None;
            }
            Some(ServiceInstance::new(address, port))
        })
        .filter(|instance| seen.insert(instance.clone()))
        .collect()
}

pub type InstanceStore = SnapshotFile<InstanceDirectory>;

impl SnapshotFile<InstanceDirectory> {
    /// Like [`SnapshotFile::load`], but a missing file yields an empty directory.
    ///
    /// # Errors
    /// Returns `LoadError` if the file exists but cannot be read or parsed.
    pub fn load_or_empty(path: impl Into<PathBuf>) -> Result<Self, LoadError> {
        let path = path.into();
        match Self::load(path.clone()) {
            Ok(store) => Ok(store),
            Err(err) if err.is_not_found() => {
                tracing::warn!(path = %path.display(), "Instance file not found, starting with no instances");
                Ok(Self::with_snapshot(path, InstanceDirectory::default()))
            }
            Err(err) => Err(err),
        }
    }

    #[must_use]
    pub fn instances(&self, service: &str) -> Vec<ServiceInstance> {
        self.snapshot().instances(service).to_vec()
    }
}
