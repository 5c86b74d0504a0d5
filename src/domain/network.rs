use indexmap::IndexMap;
use ipnet::IpNet;
use std::net::IpAddr;

/// A named network resource, rendered as its own unit on the Linux adapter
/// and folded into the per-container `--network` residue on macOS (which has
/// no native equivalent of a standalone network resource).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Network {
    pub name: String,
    pub driver: Option<String>,
    /// Unordered; sorted by key at render time.
    pub options: IndexMap<String, String>,
    /// Unordered; sorted by key at render time.
    pub labels: IndexMap<String, String>,
    pub ipam: Option<Ipam>,
    /// `true` if this network is expected to already exist and must not be
    /// created by the generated unit.
    pub external: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Ipam {
    pub driver: Option<String>,
    /// Ordered; each entry becomes one `Subnet=`/`Gateway=` pair.
    pub configs: Vec<IpamConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IpamConfig {
    pub subnet: Option<IpNet>,
    pub gateway: Option<IpAddr>,
    pub ip_range: Option<IpNet>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_network_is_not_external() {
        assert!(!Network::default().external);
    }
}
