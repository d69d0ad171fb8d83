use super::{JurisdictionMap, Owners, PartitionDirectory};
use crate::types::{OctalCode, ServerId};
use dashmap::DashMap;
use tracing::{debug, info};

/// Concurrent directory of known servers and their jurisdictions.
///
/// A server may be registered before its jurisdiction arrives; until it does,
/// [`PartitionDirectory::owners_exist`] stays false.
#[derive(Debug, Default)]
pub struct JurisdictionTable {
    servers: DashMap<ServerId, Option<JurisdictionMap>>,
}

impl JurisdictionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a server whose jurisdiction is not known yet. An already known
    /// jurisdiction is kept.
    pub fn register_server(&self, server: ServerId) {
        self.servers.entry(server).or_insert(None);
        debug!(%server, "Registered server");
    }

    pub fn set_jurisdiction(&self, server: ServerId, map: JurisdictionMap) {
        info!(%server, root = %map.root, end_nodes = map.end_nodes.len(), "🗺️ Jurisdiction received");
        self.servers.insert(server, Some(map));
    }

    pub fn remove_server(&self, server: ServerId) -> bool {
        self.servers.remove(&server).is_some()
    }

    pub fn jurisdiction(&self, server: ServerId) -> Option<JurisdictionMap> {
        self.servers.get(&server).and_then(|entry| entry.value().clone())
    }

    pub fn server_count(&self) -> usize {
        self.servers.len()
    }
}

impl PartitionDirectory for JurisdictionTable {
    fn owners_of(&self, address: &OctalCode) -> Owners {
        self.servers
            .iter()
            .filter(|entry| entry.value().as_ref().is_some_and(|map| map.contains(address)))
            .map(|entry| *entry.key())
            .collect()
    }

    fn owners_exist(&self) -> bool {
        !self.servers.is_empty() && self.servers.iter().all(|entry| entry.value().is_some())
    }
}
