//! Curated high-traffic catalog and peer groups.

use serde::{Deserialize, Serialize};

use super::PackageName;
use crate::Result;

/// A named group of interchangeable packages (e.g. "http-clients").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerGroup {
    pub name: String,
    pub members: Vec<PackageName>,
}

impl PeerGroup {
    pub fn contains(&self, pkg: &PackageName) -> bool {
        self.members.contains(pkg)
    }
}

/// Curated catalog. `popular` is ordered most-popular first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Catalog {
    pub popular: Vec<PackageName>,
    pub peer_groups: Vec<PeerGroup>,
}

impl Catalog {
    pub fn new(popular: Vec<PackageName>) -> Self {
        Self { popular, peer_groups: Vec::new() }
    }

    pub fn with_peer_group(mut self, name: impl Into<String>, members: Vec<PackageName>) -> Self {
        self.peer_groups.push(PeerGroup { name: name.into(), members });
        self
    }

    /// Parse a catalog document: `{"popular": [...], "peerGroups": [...]}`.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// The `n` most popular entries.
    pub fn top(&self, n: usize) -> &[PackageName] {
        &self.popular[..n.min(self.popular.len())]
    }

    pub fn is_popular(&self, pkg: &PackageName) -> bool {
        self.popular.contains(pkg)
    }

    /// First peer group containing `pkg`.
    pub fn peer_group_of(&self, pkg: &PackageName) -> Option<&PeerGroup> {
        self.peer_groups.iter().find(|g| g.contains(pkg))
    }
}
