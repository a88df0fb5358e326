//! Broker topology, constructed once at startup and immutable thereafter.
//!
//! Changing any of this (addresses, divert, clustering) requires a restart;
//! there is deliberately no runtime mutation path.

use std::collections::HashMap;
use std::time::Duration;

use crate::address::{
    AddressSettings, RedeliveryPolicy, BRIDGED_EVENT_ADDRESS, DEFAULT_EVENT_ADDRESS, JOB_ADDRESS,
};
use crate::config::BrokerConfig;

/// How connections reach the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcceptorConfig {
    /// Intra-process calls (publishers/consumers in the same process).
    InProcess,
    /// Inter-node calls over the network.
    Network { host: String, port: u16 },
}

/// Outbound connector, referenced by the cluster connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectorConfig {
    pub name: String,
    pub host: String,
    pub port: u16,
}

/// A non-exclusive copy rule from one address to another.
///
/// Non-exclusive means the message is still delivered on the source address
/// in addition to being copied to the destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Divert {
    pub name: String,
    pub source: String,
    pub destination: String,
    pub exclusive: bool,
}

/// UDP broadcast group over a multicast address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastGroup {
    pub name: String,
    pub connector: String,
    pub group_address: String,
    pub group_port: u16,
}

/// Discovery group listening on the same multicast endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryGroup {
    pub name: String,
    pub group_address: String,
    pub group_port: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadBalancing {
    Strict,
    OnDemand,
}

/// Cluster connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterConnection {
    pub name: String,
    pub connector: String,
    pub discovery_group: String,
    pub max_hops: u32,
    pub retry_interval: Duration,
    pub load_balancing: LoadBalancing,
}

/// The full runtime topology of the embedded broker.
#[derive(Debug, Clone)]
pub struct BrokerTopology {
    pub acceptors: Vec<AcceptorConfig>,
    pub connectors: Vec<ConnectorConfig>,
    pub address_settings: HashMap<String, AddressSettings>,
    pub diverts: Vec<Divert>,
    pub broadcast_group: BroadcastGroup,
    pub discovery_group: DiscoveryGroup,
    pub cluster: ClusterConnection,
    pub journal_buffer_size: usize,
}

impl BrokerTopology {
    /// Build the topology from configuration.
    ///
    /// Addresses feeding the bridged integration get a zero-delay,
    /// single-attempt redelivery policy; everything else gets the
    /// configured exponential backoff. The divert only exists when
    /// bridging is enabled.
    pub fn build(cfg: &BrokerConfig) -> Self {
        let mut address_settings = HashMap::new();

        address_settings.insert(
            DEFAULT_EVENT_ADDRESS.to_string(),
            AddressSettings {
                redelivery: cfg.standard_redelivery(),
                full_queue: cfg.full_queue(),
                bridged: false,
            },
        );
        address_settings.insert(
            JOB_ADDRESS.to_string(),
            AddressSettings {
                redelivery: cfg.standard_redelivery(),
                full_queue: cfg.full_queue(),
                bridged: false,
            },
        );

        let mut diverts = Vec::new();
        if cfg.bridging_enabled {
            address_settings.insert(
                BRIDGED_EVENT_ADDRESS.to_string(),
                AddressSettings {
                    redelivery: RedeliveryPolicy::immediate(),
                    full_queue: cfg.full_queue(),
                    bridged: true,
                },
            );

            // One message sent to the default address fans out to the
            // bridged address; publishers only ever see one API.
            diverts.push(Divert {
                name: "bridge-divert".to_string(),
                source: DEFAULT_EVENT_ADDRESS.to_string(),
                destination: BRIDGED_EVENT_ADDRESS.to_string(),
                exclusive: false,
            });
        }

        let connector = ConnectorConfig {
            name: "network-connector".to_string(),
            host: cfg.acceptor_host.clone(),
            port: cfg.acceptor_port,
        };

        Self {
            acceptors: vec![
                AcceptorConfig::InProcess,
                AcceptorConfig::Network {
                    host: cfg.acceptor_host.clone(),
                    port: cfg.acceptor_port,
                },
            ],
            connectors: vec![connector],
            address_settings,
            diverts,
            broadcast_group: BroadcastGroup {
                name: "async-broadcast".to_string(),
                connector: "network-connector".to_string(),
                group_address: cfg.cluster_group_address.clone(),
                group_port: cfg.cluster_group_port,
            },
            discovery_group: DiscoveryGroup {
                name: "async-discovery".to_string(),
                group_address: cfg.cluster_group_address.clone(),
                group_port: cfg.cluster_group_port,
            },
            cluster: ClusterConnection {
                name: "tessera-cluster".to_string(),
                connector: "network-connector".to_string(),
                discovery_group: "async-discovery".to_string(),
                max_hops: 1,
                retry_interval: Duration::from_millis(500),
                load_balancing: LoadBalancing::Strict,
            },
            journal_buffer_size: cfg.journal_buffer_size(),
        }
    }

    /// Settings for an address; addresses without explicit settings fall
    /// back to the default event address policy.
    pub fn settings_for(&self, address: &str) -> &AddressSettings {
        self.address_settings
            .get(address)
            .unwrap_or_else(|| &self.address_settings[DEFAULT_EVENT_ADDRESS])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bridged_addresses_fail_fast_others_back_off() {
        let cfg = BrokerConfig {
            bridging_enabled: true,
            redelivery_delay: Duration::from_secs(7),
            max_redelivery_delay: Duration::from_secs(70),
            redelivery_multiplier: 3,
            max_delivery_attempts: 4,
            ..Default::default()
        };
        let topo = BrokerTopology::build(&cfg);

        for (address, settings) in &topo.address_settings {
            if settings.bridged {
                assert_eq!(settings.redelivery.initial_delay, Duration::ZERO);
                assert_eq!(settings.redelivery.max_attempts, 1);
            } else {
                assert_eq!(
                    settings.redelivery.initial_delay,
                    Duration::from_secs(7),
                    "address {address}"
                );
                assert_eq!(settings.redelivery.max_delay, Duration::from_secs(70));
                assert_eq!(settings.redelivery.multiplier, 3);
                assert_eq!(settings.redelivery.max_attempts, 4);
            }
        }
    }

    #[test]
    fn exactly_one_non_exclusive_divert_when_bridging() {
        let topo = BrokerTopology::build(&BrokerConfig::default().with_bridging(true));

        assert_eq!(topo.diverts.len(), 1);
        let divert = &topo.diverts[0];
        assert_eq!(divert.source, DEFAULT_EVENT_ADDRESS);
        assert_eq!(divert.destination, BRIDGED_EVENT_ADDRESS);
        assert!(!divert.exclusive);
    }

    #[test]
    fn no_divert_or_bridged_address_without_bridging() {
        let topo = BrokerTopology::build(&BrokerConfig::default().with_bridging(false));

        assert!(topo.diverts.is_empty());
        assert!(!topo.address_settings.contains_key(BRIDGED_EVENT_ADDRESS));
    }

    #[test]
    fn cluster_connection_is_single_hop_strict() {
        let topo = BrokerTopology::build(&BrokerConfig::default());

        assert_eq!(topo.cluster.max_hops, 1);
        assert_eq!(topo.cluster.retry_interval, Duration::from_millis(500));
        assert_eq!(topo.cluster.load_balancing, LoadBalancing::Strict);
        assert_eq!(topo.acceptors.len(), 2);
    }
}
