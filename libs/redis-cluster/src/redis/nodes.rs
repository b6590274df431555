use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::common::{ClusterError, ClusterResult};

/// A single cluster seed node
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct NodeAddress {
    pub host: String,
    pub port: u16,
}

impl NodeAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Connection URL understood by the redis client, e.g. `redis://10.0.0.1:7000`
    pub fn redis_url(&self) -> String {
        format!("redis://{}", self)
    }
}

impl fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl FromStr for NodeAddress {
    type Err = ClusterError;

    /// Parse `host:port`, or `[ipv6]:port`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| ClusterError::InvalidNode(format!("'{}': {}", s, reason));

        let (host, port) = if let Some(rest) = s.strip_prefix('[') {
            let (host, rest) = rest
                .split_once(']')
                .ok_or_else(|| invalid("unterminated '['"))?;
            let port = rest
                .strip_prefix(':')
                .ok_or_else(|| invalid("expected host:port"))?;
            (host, port)
        } else {
            s.split_once(':').ok_or_else(|| invalid("expected host:port"))?
        };

        if host.is_empty() {
            return Err(invalid("empty host"));
        }

        let port = port
            .parse::<u16>()
            .map_err(|e| invalid(&format!("bad port '{}': {}", port, e)))?;

        Ok(Self::new(host, port))
    }
}

/// Parse a comma-separated `host:port` list into a node set.
///
/// Whitespace anywhere in the input is ignored and empty entries are skipped.
/// Duplicates collapse into one node.
///
/// ```ignore
/// let nodes = parse_nodes("10.0.0.1:7000, 10.0.0.2:7001")?;
/// assert_eq!(nodes.len(), 2);
/// ```
pub fn parse_nodes(hosts: &str) -> ClusterResult<BTreeSet<NodeAddress>> {
    let compact: String = hosts.chars().filter(|c| !c.is_whitespace()).collect();

    let nodes = compact
        .split(',')
        .filter(|entry| !entry.is_empty())
        .map(NodeAddress::from_str)
        .collect::<ClusterResult<BTreeSet<NodeAddress>>>()?;

    if nodes.is_empty() {
        return Err(ClusterError::InvalidNode(
            "host list contains no nodes".to_string(),
        ));
    }

    Ok(nodes)
}
