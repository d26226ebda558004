use std::collections::{BTreeMap, HashMap};

use serde::Deserialize;
use thiserror::Error;

use super::{ChainMap, Diagnostic, Placement, Snapshot, Tier, TopologyLink, TopologyNode};

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot is not valid JSON")]
    Json(#[from] serde_json::Error),
    #[error("snapshot has no `nodes` array")]
    MissingNodes,
    #[error("snapshot has no `links` array")]
    MissingLinks,
}

/// Snapshot exactly as a producer delivers it, before any validation.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct RawSnapshot {
    #[serde(default)]
    pub nodes: Option<Vec<RawNode>>,
    #[serde(default)]
    pub links: Option<Vec<RawLink>>,
    #[serde(default)]
    pub containers: Option<BTreeMap<String, String>>,
    #[serde(default, alias = "container_chains")]
    pub chains: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub step: Option<u64>,
    #[serde(default, alias = "network_cost")]
    pub cost: Option<f64>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct RawNode {
    pub id: String,
    #[serde(default, alias = "type")]
    pub tier: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct RawLink {
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub load: f64,
}

/// A validated snapshot plus everything that had to be dropped to get it.
#[derive(Clone, Debug)]
pub struct SnapshotReport {
    pub snapshot: Snapshot,
    pub diagnostics: Vec<Diagnostic>,
}

impl RawSnapshot {
    pub fn from_json(raw: &str) -> Result<Self, SnapshotError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Drops every node, link and container that breaks a reference
    /// invariant. Only a missing `nodes` or `links` array rejects the whole
    /// snapshot.
    pub fn validate(self) -> Result<SnapshotReport, SnapshotError> {
        let raw_nodes = self.nodes.ok_or(SnapshotError::MissingNodes)?;
        let raw_links = self.links.ok_or(SnapshotError::MissingLinks)?;
        let mut diagnostics = Vec::new();

        let mut tiers: HashMap<String, Tier> = HashMap::with_capacity(raw_nodes.len());
        let mut nodes = Vec::with_capacity(raw_nodes.len());
        for raw in raw_nodes {
            let Some(tier) = raw.tier.as_deref().and_then(Tier::parse) else {
                diagnostics.push(Diagnostic::UnknownTier {
                    tier: raw.tier.unwrap_or_default(),
                    id: raw.id,
                });
                continue;
            };
            if tiers.contains_key(&raw.id) {
                diagnostics.push(Diagnostic::DuplicateNode(raw.id));
                continue;
            }
            tiers.insert(raw.id.clone(), tier);
            nodes.push(TopologyNode { id: raw.id, tier });
        }

        let mut links = Vec::with_capacity(raw_links.len());
        for raw in raw_links {
            let missing = [&raw.source, &raw.target]
                .into_iter()
                .find(|id| !tiers.contains_key(id.as_str()))
                .cloned();
            if let Some(missing) = missing {
                diagnostics.push(Diagnostic::DanglingLink {
                    from: raw.source,
                    to: raw.target,
                    missing,
                });
                continue;
            }
            links.push(TopologyLink {
                source: raw.source,
                target: raw.target,
                load: raw.load,
            });
        }

        let mut containers = Placement::new();
        for (container, host) in self.containers.unwrap_or_default() {
            match tiers.get(&host) {
                None => diagnostics.push(Diagnostic::DanglingContainer { container, host }),
                Some(Tier::Server) => {
                    containers.insert(container, host);
                }
                Some(&tier) => diagnostics.push(Diagnostic::HostNotServer {
                    container,
                    host,
                    tier,
                }),
            }
        }

        let chains: ChainMap = self
            .chains
            .unwrap_or_default()
            .into_iter()
            .filter(|(container, _)| containers.contains_key(container))
            .collect();

        Ok(SnapshotReport {
            snapshot: Snapshot {
                nodes,
                links,
                containers,
                chains,
                step: self.step,
                cost: self.cost,
            },
            diagnostics,
        })
    }
}
