mod parse;

use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

pub use parse::{RawLink, RawNode, RawSnapshot, SnapshotError, SnapshotReport};

/// Container id -> host server id.
pub type Placement = BTreeMap<String, String>;

/// Container id -> chain name.
pub type ChainMap = BTreeMap<String, String>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Tier {
    Core,
    Aggregation,
    Server,
}

impl Tier {
    pub const ALL: [Tier; 3] = [Tier::Core, Tier::Aggregation, Tier::Server];

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "core" => Some(Self::Core),
            "aggregation" | "agg" => Some(Self::Aggregation),
            "server" => Some(Self::Server),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Core => "core",
            Self::Aggregation => "aggregation",
            Self::Server => "server",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TopologyNode {
    pub id: String,
    pub tier: Tier,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TopologyLink {
    pub source: String,
    pub target: String,
    pub load: f64,
}

/// One validated description of topology and container placement.
///
/// Every link endpoint and every container host resolves to a node of the
/// same snapshot, and every host is a server.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Snapshot {
    pub nodes: Vec<TopologyNode>,
    pub links: Vec<TopologyLink>,
    pub containers: Placement,
    pub chains: ChainMap,
    /// Optimization step reported by the producer, if any.
    pub step: Option<u64>,
    /// Network cost reported by the producer, if any.
    pub cost: Option<f64>,
}

impl Snapshot {
    pub fn node(&self, id: &str) -> Option<&TopologyNode> {
        self.nodes.iter().find(|node| node.id == id)
    }

    pub fn total_load(&self) -> f64 {
        self.links.iter().map(|link| link.load.max(0.0)).sum()
    }

    pub fn containers_on(&self, host: &str) -> usize {
        self.containers.values().filter(|value| *value == host).count()
    }
}

/// Recoverable problem found while ingesting or drawing a snapshot.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum Diagnostic {
    #[error("node `{id}` has unknown tier `{tier}`; node dropped")]
    UnknownTier { id: String, tier: String },
    #[error("duplicate node id `{0}`; later definition dropped")]
    DuplicateNode(String),
    #[error("link {from} -> {to} references unknown node `{missing}`; link dropped")]
    DanglingLink {
        from: String,
        to: String,
        missing: String,
    },
    #[error("container `{container}` is hosted on unknown node `{host}`; container dropped")]
    DanglingContainer { container: String, host: String },
    #[error("container `{container}` is hosted on {tier} node `{host}`; container dropped")]
    HostNotServer {
        container: String,
        host: String,
        tier: Tier,
    },
    #[error("migration of `{container}` to `{host}` not animated: host has no position")]
    UnplacedMigration { container: String, host: String },
    #[error("snapshot skipped: {0}")]
    SnapshotRejected(String),
}
