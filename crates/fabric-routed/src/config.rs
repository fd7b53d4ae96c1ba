//! Configuration file support for fabric-routed
//!
//! Loads and validates the controller configuration from a TOML file.
//! Default location: /etc/fabric/fabric-routed.toml
//!
//! ```toml
//! [topology]
//! k = 4
//!
//! [gateway]
//! external_hosts = [1, 2]
//!
//! [[steering]]
//! name = "udp-scrub"
//! layers = ["edge"]
//! ip_proto = 17
//!
//! # Traffic leaving edge switch (0, 0), diverted at one aggregation switch
//! [[steering]]
//! name = "pod0-edge0"
//! dpids = [0x010000]
//! src = "02:01:00:01:00:00"
//!
//! [[pruned_uplinks]]
//! dpid = 0x010000
//! port = 2
//! ```

use crate::error::{FabricError, Result};
use crate::program::{build_program, RoutingPolicy, SteeringPolicy};
use fabric_flow::FlowMatch;
use fabric_types::{
    decode_switch, DatapathId, Ipv4Address, MacAddress, MacPrefix, PortNo, SwitchLayer,
    TopologyParameters,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use tracing::info;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/fabric/fabric-routed.toml";

/// Fat-tree dimensions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopologyConfig {
    /// Fan-out; even, 2..=30
    #[serde(default = "default_k")]
    pub k: u8,
}

/// Gateway-side hosts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// External host numbers, in gateway port order
    #[serde(default = "default_external_hosts")]
    pub external_hosts: Vec<u8>,
}

/// Event dispatch settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Capacity of the inbound event channel and of each switch's queue
    #[serde(default = "default_event_queue_depth")]
    pub event_queue_depth: usize,
}

/// Traffic diverted through the middlebox of each switch in `layers`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SteeringConfig {
    pub name: String,

    /// Empty means every layer that has a middlebox
    #[serde(default)]
    pub layers: Vec<SwitchLayer>,

    /// Switches to install on; empty means every switch in `layers`
    #[serde(default)]
    pub dpids: Vec<DatapathId>,

    /// Source link address, e.g. an edge switch's uplink rewrite
    #[serde(default)]
    pub src: Option<MacAddress>,

    /// Mask applied to `src`; exact match when absent
    #[serde(default)]
    pub src_mask: Option<MacAddress>,

    /// Destination host network address
    #[serde(default)]
    pub dst: Option<Ipv4Address>,

    /// IP protocol number
    #[serde(default)]
    pub ip_proto: Option<u8>,
}

/// Uplink removed from one switch's multipath group
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrunedUplink {
    pub dpid: DatapathId,
    pub port: PortNo,
}

/// Complete fabric-routed configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FabricConfig {
    #[serde(default)]
    pub topology: TopologyConfig,

    #[serde(default)]
    pub gateway: GatewayConfig,

    #[serde(default)]
    pub daemon: DaemonConfig,

    #[serde(default)]
    pub steering: Vec<SteeringConfig>,

    #[serde(default)]
    pub pruned_uplinks: Vec<PrunedUplink>,
}

fn default_k() -> u8 {
    4
}

fn default_external_hosts() -> Vec<u8> {
    vec![1, 2]
}

fn default_event_queue_depth() -> usize {
    1024
}

impl Default for TopologyConfig {
    fn default() -> Self {
        Self { k: default_k() }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            external_hosts: default_external_hosts(),
        }
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            event_queue_depth: default_event_queue_depth(),
        }
    }
}

impl SteeringConfig {
    fn effective_layers(&self) -> Vec<SwitchLayer> {
        if !self.layers.is_empty() {
            self.layers.clone()
        } else if !self.dpids.is_empty() {
            let mut layers: Vec<SwitchLayer> = self
                .dpids
                .iter()
                .filter_map(|dpid| decode_switch(*dpid).ok())
                .map(|identity| identity.layer())
                .collect();
            layers.sort();
            layers.dedup();
            layers
        } else {
            SwitchLayer::ALL
                .into_iter()
                .filter(|layer| layer.has_middlebox())
                .collect()
        }
    }

    fn flow_match(&self) -> FlowMatch {
        let mut flow_match = FlowMatch::any();
        if let Some(src) = self.src {
            flow_match = flow_match.eth_src(match self.src_mask {
                Some(mask) => MacPrefix::new(src, mask),
                None => MacPrefix::exact(src),
            });
        }
        if let Some(dst) = self.dst {
            flow_match = flow_match.ipv4_dst(dst);
        }
        if let Some(proto) = self.ip_proto {
            flow_match = flow_match.ip_proto(proto);
        }
        flow_match
    }
}

impl FabricConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| FabricError::config(format!("failed to parse config: {}", e)))
    }

    /// Load configuration from file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| {
            FabricError::config(format!(
                "failed to parse config file {}: {}",
                path.display(),
                e
            ))
        })
    }

    /// Load configuration from file, falling back to defaults if file not found
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        match Self::load(path) {
            Err(FabricError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "config file not found, using defaults");
                Ok(Self::default())
            }
            other => other,
        }
    }

    pub fn topology_parameters(&self) -> Result<TopologyParameters> {
        Ok(TopologyParameters::new(self.topology.k)?)
    }

    pub fn routing_policy(&self) -> RoutingPolicy {
        let steering = self
            .steering
            .iter()
            .map(|s| SteeringPolicy {
                name: s.name.clone(),
                layers: s.effective_layers(),
                dpids: s.dpids.clone(),
                flow_match: s.flow_match(),
            })
            .collect();

        let mut pruned_uplinks: BTreeMap<DatapathId, Vec<PortNo>> = BTreeMap::new();
        for pruned in &self.pruned_uplinks {
            pruned_uplinks.entry(pruned.dpid).or_default().push(pruned.port);
        }

        RoutingPolicy {
            external_hosts: self.gateway.external_hosts.clone(),
            steering,
            pruned_uplinks,
        }
    }

    /// Validate configuration
    ///
    /// Every switch named by a pruned uplink is built once here, so a bad
    /// prune fails at startup rather than when the switch connects.
    pub fn validate(&self) -> Result<()> {
        let params = self.topology_parameters()?;

        if self.daemon.event_queue_depth == 0 {
            return Err(FabricError::config("event_queue_depth must be > 0"));
        }

        let mut seen = BTreeSet::new();
        for host in &self.gateway.external_hosts {
            if *host == 0 {
                return Err(FabricError::config("external host 0 has no address"));
            }
            if !seen.insert(*host) {
                return Err(FabricError::config(format!(
                    "external host {} listed twice",
                    host
                )));
            }
        }

        for steering in &self.steering {
            if steering.name.trim().is_empty() {
                return Err(FabricError::config("steering policy needs a name"));
            }
            if steering.layers.contains(&SwitchLayer::Gateway) {
                return Err(FabricError::config(format!(
                    "steering policy {}: the gateway has no middlebox",
                    steering.name
                )));
            }
            if steering.src.is_none() && steering.dst.is_none() && steering.ip_proto.is_none() {
                return Err(FabricError::config(format!(
                    "steering policy {}: needs src, dst or ip_proto",
                    steering.name
                )));
            }
            if steering.src_mask.is_some() && steering.src.is_none() {
                return Err(FabricError::config(format!(
                    "steering policy {}: src_mask without src",
                    steering.name
                )));
            }
            if steering.src_mask == Some(MacAddress::ZERO) {
                return Err(FabricError::config(format!(
                    "steering policy {}: src_mask matches every source",
                    steering.name
                )));
            }
            let layers = steering.effective_layers();
            for dpid in &steering.dpids {
                let identity = decode_switch(*dpid).map_err(|e| {
                    FabricError::config(format!("steering policy {}: {}", steering.name, e))
                })?;
                if !identity.layer().has_middlebox() || !layers.contains(&identity.layer()) {
                    return Err(FabricError::config(format!(
                        "steering policy {}: {} has no middlebox in the named layers",
                        steering.name, identity
                    )));
                }
                build_program(identity, &params, &RoutingPolicy::default(), None).map_err(|e| {
                    FabricError::config(format!("steering policy {}: {}", steering.name, e))
                })?;
            }
        }

        let policy = self.routing_policy();
        for dpid in policy.pruned_uplinks.keys() {
            let identity = decode_switch(*dpid)
                .map_err(|e| FabricError::config(format!("pruned uplink: {}", e)))?;
            build_program(identity, &params, &policy, None)
                .map_err(|e| FabricError::config(format!("pruned uplink: {}", e)))?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults_from_empty_file() {
        let config = FabricConfig::from_toml_str("").unwrap();
        assert_eq!(config.topology.k, 4);
        assert_eq!(config.gateway.external_hosts, vec![1, 2]);
        assert_eq!(config.daemon.event_queue_depth, 1024);
        assert!(config.steering.is_empty());
        assert!(config.validate().is_ok());
        assert_eq!(config.routing_policy(), RoutingPolicy::default());
    }

    #[test]
    fn test_load_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[topology]
k = 8

[[steering]]
name = "udp"
ip_proto = 17

[[steering]]
name = "victim"
layers = ["edge"]
dst = "10.1.0.2"

[[pruned_uplinks]]
dpid = 65792
port = 3
"#
        )
        .unwrap();

        let config = FabricConfig::load(file.path()).unwrap();
        config.validate().unwrap();
        assert_eq!(config.topology_parameters().unwrap().k(), 8);

        let policy = config.routing_policy();
        assert_eq!(
            policy.steering[0].layers,
            vec![SwitchLayer::Core, SwitchLayer::Aggregation, SwitchLayer::Edge]
        );
        assert_eq!(policy.steering[0].flow_match, FlowMatch::any().ip_proto(17));
        assert_eq!(
            policy.steering[1].flow_match,
            FlowMatch::any().ipv4_dst(Ipv4Address::new(10, 1, 0, 2))
        );
        assert_eq!(
            policy.pruned_uplinks.get(&DatapathId::new(0x010100)),
            Some(&vec![PortNo::new(3)])
        );
    }

    #[test]
    fn test_load_missing_file_defaults() {
        let config = FabricConfig::load_or_default("/nonexistent/fabric-routed.toml").unwrap();
        assert_eq!(config.topology.k, 4);
        assert!(matches!(
            FabricConfig::load("/nonexistent/fabric-routed.toml"),
            Err(FabricError::Io(_))
        ));
    }

    #[test]
    fn test_invalid_k_rejected() {
        for k in [0, 3, 32] {
            let mut config = FabricConfig::default();
            config.topology.k = k;
            assert!(config.validate().is_err(), "k={}", k);
        }
    }

    #[test]
    fn test_gateway_steering_rejected() {
        let config = FabricConfig::from_toml_str(
            r#"
[[steering]]
name = "bad"
layers = ["gateway"]
ip_proto = 6
"#,
        )
        .unwrap();
        assert!(matches!(config.validate(), Err(FabricError::Config(_))));
    }

    #[test]
    fn test_empty_steering_match_rejected() {
        let config = FabricConfig::from_toml_str("[[steering]]\nname = \"all\"\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_external_hosts_checked() {
        let mut config = FabricConfig::default();
        config.gateway.external_hosts = vec![1, 1];
        assert!(config.validate().is_err());
        config.gateway.external_hosts = vec![0];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bad_prunes_rejected() {
        let mut config = FabricConfig::default();

        // Core switches have no group
        config.pruned_uplinks = vec![PrunedUplink {
            dpid: DatapathId::new(1),
            port: PortNo::new(1),
        }];
        assert!(config.validate().is_err());

        // Port 3 faces an edge switch
        config.pruned_uplinks = vec![PrunedUplink {
            dpid: DatapathId::new(0x010000),
            port: PortNo::new(3),
        }];
        assert!(config.validate().is_err());

        config.pruned_uplinks = vec![PrunedUplink {
            dpid: DatapathId::new(0x090000),
            port: PortNo::new(1),
        }];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_source_steering_scoped_to_switch() {
        let config = FabricConfig::from_toml_str(
            r#"
[[steering]]
name = "from-edge"
dpids = [65536]
src = "02:01:00:01:00:00"

[[steering]]
name = "from-any-edge"
layers = ["core"]
src = "02:01:00:01:00:00"
src_mask = "ff:ff:ff:ff:00:00"
"#,
        )
        .unwrap();
        config.validate().unwrap();

        let policy = config.routing_policy();
        assert_eq!(policy.steering[0].layers, vec![SwitchLayer::Aggregation]);
        assert_eq!(policy.steering[0].dpids, vec![DatapathId::new(0x010000)]);
        assert_eq!(
            policy.steering[0].flow_match,
            FlowMatch::any().eth_src(fabric_types::edge_source_rewrite(0, 0))
        );
        assert_eq!(
            policy.steering[1].flow_match.eth_src.unwrap().to_string(),
            "02:01:00:01:00:00/ff:ff:ff:ff:00:00"
        );
        assert!(policy.steering[1].dpids.is_empty());
    }

    #[test]
    fn test_steering_unknown_key_rejected() {
        let parsed = FabricConfig::from_toml_str(
            "[[steering]]\nname = \"typo\"\nip_protocol = 17\n",
        );
        assert!(matches!(parsed, Err(FabricError::Config(_))));
    }

    #[test]
    fn test_steering_switch_scope_checked() {
        let bad = [
            // Gateway has no middlebox
            "dpids = [196608]\nip_proto = 6",
            // Unknown layer tag
            "dpids = [0x090000]\nip_proto = 6",
            // Aggregation switch outside a K=4 pod
            "dpids = [0x010002]\nip_proto = 6",
            // Edge switch, but only core layers named
            "layers = [\"core\"]\ndpids = [0x020000]\nip_proto = 6",
            "src_mask = \"ff:ff:ff:ff:00:00\"\nip_proto = 6",
            "src = \"02:01:00:01:00:00\"\nsrc_mask = \"00:00:00:00:00:00\"",
        ];
        for body in bad {
            let text = format!("[[steering]]\nname = \"s\"\n{}\n", body);
            let config = FabricConfig::from_toml_str(&text).unwrap();
            assert!(
                matches!(config.validate(), Err(FabricError::Config(_))),
                "{}",
                body
            );
        }
    }

    #[test]
    fn test_malformed_toml() {
        assert!(matches!(
            FabricConfig::from_toml_str("[topology\nk = 4"),
            Err(FabricError::Config(_))
        ));
    }
}
