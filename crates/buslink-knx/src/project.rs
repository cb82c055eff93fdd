/*!
 * Group object directory.
 *
 * Project data maps group addresses to human-readable names and codecs. The
 * telegram history and the event surface use it to enrich raw telegrams;
 * addresses without an entry stay un-enriched rather than failing.
 */
use std::collections::HashMap;
use std::sync::Arc;

use crate::address::GroupAddress;
use crate::dpt::DptTranscoder;

/// What the project knows about one group address
#[derive(Clone)]
pub struct GroupObjectInfo {
    /// The configured name of the group object
    pub name: String,
    /// Codec for the object's payload, when the project declares a DPT
    pub transcoder: Option<Arc<dyn DptTranscoder>>,
}

impl std::fmt::Debug for GroupObjectInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroupObjectInfo")
            .field("name", &self.name)
            .field(
                "dpt",
                &self.transcoder.as_ref().map(|t| t.dpt_id().to_string()),
            )
            .finish()
    }
}

/// Directory of group objects and sender names from project data
#[derive(Debug, Default)]
pub struct GroupObjectDirectory {
    objects: HashMap<GroupAddress, GroupObjectInfo>,
    senders: HashMap<u16, String>,
}

impl GroupObjectDirectory {
    /// Create an empty directory
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a group object entry
    pub fn insert(&mut self, address: GroupAddress, info: GroupObjectInfo) {
        self.objects.insert(address, info);
    }

    /// Add a sender name keyed by raw individual address
    pub fn insert_sender(&mut self, raw: u16, name: impl Into<String>) {
        self.senders.insert(raw, name.into());
    }

    /// Look up a group object
    pub fn object(&self, address: &GroupAddress) -> Option<&GroupObjectInfo> {
        self.objects.get(address)
    }

    /// Look up the name of a sending device
    pub fn sender_name(&self, raw: u16) -> Option<&str> {
        self.senders.get(&raw).map(String::as_str)
    }
}
