use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

use super::{SnapshotSource, SourceError};
use crate::topology::{RawLink, RawNode, RawSnapshot};

const CORE_ID: &str = "Core_Switch";
const CORE_LINK_WEIGHT: f64 = 10.0;
const SERVER_LINK_WEIGHT: f64 = 1.0;
const CLUSTER_LINK_PROBABILITY: f64 = 0.7;
const BURST_VOLUME: f64 = 5000.0;
const CHAIN_NAMES: [&str; 2] = ["Login Flow", "Data Pipeline"];

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DemoConfig {
    pub pods: usize,
    pub servers_per_pod: usize,
    pub containers: usize,
    pub clusters: usize,
    /// Containers a server holds at most.
    pub server_capacity: usize,
    pub seed: u64,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            pods: 4,
            servers_per_pod: 4,
            containers: 20,
            clusters: 3,
            server_capacity: 10,
            seed: 7,
        }
    }
}

struct Server {
    id: String,
    pod: usize,
}

struct Flow {
    from: usize,
    to: usize,
    volume: f64,
}

/// Synthetic fat-tree data center with clustered container traffic and a
/// greedy placement optimizer that moves one container per step.
pub struct DemoSource {
    config: DemoConfig,
    rng: StdRng,
    servers: Vec<Server>,
    /// Container index -> server index.
    hosts: Vec<usize>,
    flows: Vec<Flow>,
    chains: BTreeMap<String, String>,
    step: u64,
}

fn container_id(index: usize) -> String {
    format!("Container_{index}")
}

fn aggregation_id(pod: usize) -> String {
    format!("Agg_Switch_{pod}")
}

impl DemoSource {
    pub fn new(config: DemoConfig) -> Self {
        let servers = (0..config.pods)
            .flat_map(|pod| {
                (0..config.servers_per_pod).map(move |slot| Server {
                    id: format!("Server_{pod}_{slot}"),
                    pod,
                })
            })
            .collect();
        let mut source = Self {
            config,
            rng: StdRng::seed_from_u64(config.seed),
            servers,
            hosts: Vec::new(),
            flows: Vec::new(),
            chains: BTreeMap::new(),
            step: 0,
        };
        source.initialize();
        source
    }

    fn initialize(&mut self) {
        self.rng = StdRng::seed_from_u64(self.config.seed);
        self.step = 0;
        self.place_containers();
        self.generate_clustered_traffic();
        info!(
            servers = self.servers.len(),
            containers = self.hosts.len(),
            flows = self.flows.len(),
            cost = self.network_cost(),
            "demo data center initialized"
        );
    }

    fn place_containers(&mut self) {
        self.hosts.clear();
        if self.servers.is_empty() {
            return;
        }
        let respect_capacity =
            self.servers.len() * self.config.server_capacity >= self.config.containers;
        let mut occupancy = vec![0usize; self.servers.len()];
        for _ in 0..self.config.containers {
            let candidates = (0..self.servers.len())
                .filter(|&server| {
                    !respect_capacity || occupancy[server] < self.config.server_capacity
                })
                .collect::<Vec<_>>();
            let Some(&server) = candidates.choose(&mut self.rng) else {
                break;
            };
            occupancy[server] += 1;
            self.hosts.push(server);
        }
    }

    fn generate_clustered_traffic(&mut self) {
        self.flows.clear();
        self.chains.clear();
        let clusters = self.config.clusters.max(1);
        let cluster_size = self.hosts.len() / clusters;
        let mut members = (0..self.hosts.len()).collect::<Vec<_>>();
        members.shuffle(&mut self.rng);

        for (cluster, group) in members.chunks(cluster_size.max(1)).take(clusters).enumerate() {
            for &from in group {
                for &to in group {
                    if from != to && self.rng.gen_bool(CLUSTER_LINK_PROBABILITY) {
                        let volume = self.rng.gen_range(50.0..100.0);
                        self.flows.push(Flow { from, to, volume });
                    }
                }
            }
            if let Some(chain) = CHAIN_NAMES.get(cluster) {
                for &container in group {
                    self.chains.insert(container_id(container), (*chain).to_owned());
                }
            }
        }
    }

    /// Weighted hop distance between two servers of the tree.
    fn distance(&self, a: usize, b: usize) -> f64 {
        if a == b {
            0.0
        } else if self.servers[a].pod == self.servers[b].pod {
            2.0 * SERVER_LINK_WEIGHT
        } else {
            2.0 * (SERVER_LINK_WEIGHT + CORE_LINK_WEIGHT)
        }
    }

    fn flow_cost(&self, flow: &Flow) -> f64 {
        flow.volume * self.distance(self.hosts[flow.from], self.hosts[flow.to])
    }

    /// Traffic volume times hop weight, summed over every flow.
    pub fn network_cost(&self) -> f64 {
        self.flows.iter().map(|flow| self.flow_cost(flow)).sum()
    }

    pub fn total_traffic(&self) -> f64 {
        self.flows.iter().map(|flow| flow.volume).sum()
    }

    pub fn step(&self) -> u64 {
        self.step
    }

    fn contribution(&self, container: usize, host: usize) -> f64 {
        self.flows
            .iter()
            .filter(|flow| flow.from == container || flow.to == container)
            .map(|flow| {
                let from = if flow.from == container { host } else { self.hosts[flow.from] };
                let to = if flow.to == container { host } else { self.hosts[flow.to] };
                flow.volume * self.distance(from, to)
            })
            .sum()
    }

    fn heaviest_peer(&self, container: usize) -> Option<usize> {
        let mut volumes: BTreeMap<usize, f64> = BTreeMap::new();
        for flow in &self.flows {
            if flow.from == container {
                *volumes.entry(flow.to).or_default() += flow.volume;
            } else if flow.to == container {
                *volumes.entry(flow.from).or_default() += flow.volume;
            }
        }
        volumes
            .into_iter()
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(peer, _)| peer)
    }

    fn occupancy(&self, server: usize) -> usize {
        self.hosts.iter().filter(|&&host| host == server).count()
    }

    /// Free server closest to `near`: `near` itself, then its pod.
    fn free_server_near(&self, near: usize) -> Option<usize> {
        if self.occupancy(near) < self.config.server_capacity {
            return Some(near);
        }
        (0..self.servers.len())
            .filter(|&server| self.servers[server].pod == self.servers[near].pod)
            .find(|&server| self.occupancy(server) < self.config.server_capacity)
    }

    /// Moves the costliest container that can be improved next to its
    /// heaviest peer. Returns the moved container, if any.
    fn optimize_step(&mut self) -> Option<usize> {
        self.step += 1;
        let mut candidates = (0..self.hosts.len())
            .map(|container| (container, self.contribution(container, self.hosts[container])))
            .filter(|&(_, cost)| cost > 0.0)
            .collect::<Vec<_>>();
        candidates.sort_by(|a, b| b.1.total_cmp(&a.1));

        for (container, current) in candidates {
            let Some(peer) = self.heaviest_peer(container) else {
                continue;
            };
            let Some(target) = self.free_server_near(self.hosts[peer]) else {
                continue;
            };
            if target != self.hosts[container] && self.contribution(container, target) < current {
                debug!(
                    container = %container_id(container),
                    from = %self.servers[self.hosts[container]].id,
                    to = %self.servers[target].id,
                    "demo optimizer moved container"
                );
                self.hosts[container] = target;
                return Some(container);
            }
        }
        None
    }

    fn link_loads(&self) -> BTreeMap<(usize, Option<usize>), f64> {
        // (pod, None) is core -> aggregation; (pod, Some(server)) is
        // aggregation -> server.
        let mut loads = BTreeMap::new();
        for flow in &self.flows {
            let (a, b) = (self.hosts[flow.from], self.hosts[flow.to]);
            if a == b {
                continue;
            }
            for server in [a, b] {
                *loads.entry((self.servers[server].pod, Some(server))).or_insert(0.0) +=
                    flow.volume;
            }
            let (pod_a, pod_b) = (self.servers[a].pod, self.servers[b].pod);
            if pod_a != pod_b {
                for pod in [pod_a, pod_b] {
                    *loads.entry((pod, None)).or_insert(0.0) += flow.volume;
                }
            }
        }
        loads
    }

    pub fn snapshot(&self) -> RawSnapshot {
        let loads = self.link_loads();
        let load = |key: (usize, Option<usize>)| loads.get(&key).copied().unwrap_or(0.0);

        let mut nodes = vec![RawNode {
            id: CORE_ID.to_owned(),
            tier: Some("core".to_owned()),
        }];
        let mut links = Vec::new();
        for pod in 0..self.config.pods {
            nodes.push(RawNode {
                id: aggregation_id(pod),
                tier: Some("aggregation".to_owned()),
            });
            links.push(RawLink {
                source: CORE_ID.to_owned(),
                target: aggregation_id(pod),
                load: load((pod, None)),
            });
        }
        for (index, server) in self.servers.iter().enumerate() {
            nodes.push(RawNode {
                id: server.id.clone(),
                tier: Some("server".to_owned()),
            });
            links.push(RawLink {
                source: aggregation_id(server.pod),
                target: server.id.clone(),
                load: load((server.pod, Some(index))),
            });
        }

        let containers = self
            .hosts
            .iter()
            .enumerate()
            .map(|(container, &host)| (container_id(container), self.servers[host].id.clone()))
            .collect();

        RawSnapshot {
            nodes: Some(nodes),
            links: Some(links),
            containers: Some(containers),
            chains: Some(self.chains.clone()),
            step: Some(self.step),
            cost: Some(self.network_cost()),
        }
    }
}

impl SnapshotSource for DemoSource {
    fn name(&self) -> &str {
        "demo fat tree"
    }

    fn next_snapshot(&mut self) -> Result<RawSnapshot, SourceError> {
        if self.optimize_step().is_none() {
            debug!(step = self.step, "demo placement is locally optimal");
        }
        Ok(self.snapshot())
    }

    fn reset(&mut self) -> Result<RawSnapshot, SourceError> {
        self.initialize();
        Ok(self.snapshot())
    }

    /// Adds a heavy flow between the first two containers.
    fn burst(&mut self) -> Result<RawSnapshot, SourceError> {
        if self.hosts.len() >= 2 {
            self.flows.push(Flow {
                from: 0,
                to: 1,
                volume: BURST_VOLUME,
            });
            info!(cost = self.network_cost(), "traffic burst injected");
        }
        Ok(self.snapshot())
    }
}
