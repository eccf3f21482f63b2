// Copyright (c) 2025 - Stichting Beep
//! Network Value Objects with Validation Invariants

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;
use thiserror::Error;

/// Network validation error
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NetworkError {
    #[error("Invalid IP address format: {0}")]
    InvalidIpAddress(String),

    #[error("Invalid CIDR notation: {0}")]
    InvalidCidr(String),

    #[error("Invalid prefix length: {0} (must be 0-32 for IPv4)")]
    InvalidPrefixLength(u8),

    #[error("Host bits set in network block: {0}")]
    HostBitsSet(String),

    #[error("Subnet /{prefix} index {index} does not fit in {network}")]
    SubnetOutOfRange {
        network: String,
        prefix: u8,
        index: u32,
    },

    #[error("Invalid port range: {from}-{to}")]
    InvalidPortRange { from: u16, to: u16 },
}

/// IPv4 network block in CIDR notation
///
/// Invariants:
/// - Prefix length 0-32
/// - Host bits are zero (the address is the network address)
///
/// # Examples
///
/// ```rust
/// use beep_infrastructure::domain::Ipv4Cidr;
///
/// let vpc: Ipv4Cidr = "10.0.0.0/16".parse().unwrap();
/// let subnet: Ipv4Cidr = "10.0.3.0/24".parse().unwrap();
/// assert!(vpc.contains(&subnet));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Ipv4Cidr {
    network: Ipv4Addr,
    prefix_length: u8,
}

impl Ipv4Cidr {
    /// The whole IPv4 address space, `0.0.0.0/0`
    pub const ANYWHERE: Ipv4Cidr = Ipv4Cidr {
        network: Ipv4Addr::UNSPECIFIED,
        prefix_length: 0,
    };

    /// Default block of a virtual network, `10.0.0.0/16`
    pub const DEFAULT_VPC: Ipv4Cidr = Ipv4Cidr {
        network: Ipv4Addr::new(10, 0, 0, 0),
        prefix_length: 16,
    };

    /// Parse a network block such as `10.0.0.0/16`
    pub fn new(cidr: impl AsRef<str>) -> Result<Self, NetworkError> {
        let cidr = cidr.as_ref();

        let (addr_str, prefix_str) = cidr
            .split_once('/')
            .ok_or_else(|| NetworkError::InvalidCidr(cidr.to_string()))?;

        let network = Ipv4Addr::from_str(addr_str)
            .map_err(|_| NetworkError::InvalidIpAddress(addr_str.to_string()))?;

        let prefix_length = prefix_str
            .parse::<u8>()
            .map_err(|_| NetworkError::InvalidCidr(cidr.to_string()))?;

        Self::from_parts(network, prefix_length)
    }

    /// Create from a network address and prefix length
    pub fn from_parts(network: Ipv4Addr, prefix_length: u8) -> Result<Self, NetworkError> {
        if prefix_length > 32 {
            return Err(NetworkError::InvalidPrefixLength(prefix_length));
        }

        if u32::from(network) & !Self::mask(prefix_length) != 0 {
            return Err(NetworkError::HostBitsSet(format!(
                "{}/{}",
                network, prefix_length
            )));
        }

        Ok(Self {
            network,
            prefix_length,
        })
    }

    fn mask(prefix_length: u8) -> u32 {
        if prefix_length == 0 {
            0
        } else {
            u32::MAX << (32 - u32::from(prefix_length))
        }
    }

    /// Network address
    pub fn network(&self) -> Ipv4Addr {
        self.network
    }

    /// Prefix length
    pub fn prefix_length(&self) -> u8 {
        self.prefix_length
    }

    /// Number of addresses in the block
    pub fn size(&self) -> u64 {
        1u64 << (32 - u32::from(self.prefix_length))
    }

    fn first(&self) -> u64 {
        u64::from(u32::from(self.network))
    }

    fn last(&self) -> u64 {
        self.first() + self.size() - 1
    }

    /// Check whether an address falls inside the block
    pub fn contains_addr(&self, addr: Ipv4Addr) -> bool {
        let addr = u64::from(u32::from(addr));
        addr >= self.first() && addr <= self.last()
    }

    /// Check whether `other` lies completely inside this block
    pub fn contains(&self, other: &Ipv4Cidr) -> bool {
        other.first() >= self.first() && other.last() <= self.last()
    }

    /// Check whether the two blocks share any address
    pub fn overlaps(&self, other: &Ipv4Cidr) -> bool {
        self.first() <= other.last() && other.first() <= self.last()
    }

    /// The `index`-th block of length `prefix_length` inside this block
    pub fn subnet(&self, prefix_length: u8, index: u32) -> Result<Ipv4Cidr, NetworkError> {
        if prefix_length > 32 || prefix_length < self.prefix_length {
            return Err(NetworkError::InvalidPrefixLength(prefix_length));
        }

        let block = 1u64 << (32 - u32::from(prefix_length));
        let start = self.first() + block * u64::from(index);
        if start + block - 1 > self.last() {
            return Err(NetworkError::SubnetOutOfRange {
                network: self.to_string(),
                prefix: prefix_length,
                index,
            });
        }

        // start fits in u32: it is bounded by self.last()
        Self::from_parts(Ipv4Addr::from(start as u32), prefix_length)
    }
}

impl fmt::Display for Ipv4Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix_length)
    }
}

impl FromStr for Ipv4Cidr {
    type Err = NetworkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for Ipv4Cidr {
    type Error = NetworkError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Ipv4Cidr> for String {
    fn from(cidr: Ipv4Cidr) -> Self {
        cidr.to_string()
    }
}

/// Inclusive transport port range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortRange {
    from: u16,
    to: u16,
}

impl PortRange {
    pub const SSH: PortRange = PortRange::single(22);
    pub const HTTP: PortRange = PortRange::single(80);
    pub const HTTPS: PortRange = PortRange::single(443);
    /// Listener used by the load balancer for test traffic
    pub const HTTPS_TEST: PortRange = PortRange::single(4433);
    pub const MYSQL: PortRange = PortRange::single(3306);
    /// Return ports used by the NAT gateway
    pub const EPHEMERAL_NAT: PortRange = PortRange {
        from: 32768,
        to: 65535,
    };
    /// Return ports used by the load balancer and Fargate tasks
    pub const EPHEMERAL_ELB: PortRange = PortRange {
        from: 1024,
        to: 65535,
    };
    /// Linux kernel default ephemeral range
    pub const EPHEMERAL_LINUX: PortRange = PortRange {
        from: 32768,
        to: 61000,
    };

    pub fn new(from: u16, to: u16) -> Result<Self, NetworkError> {
        if from > to {
            return Err(NetworkError::InvalidPortRange { from, to });
        }
        Ok(Self { from, to })
    }

    pub const fn single(port: u16) -> Self {
        Self {
            from: port,
            to: port,
        }
    }

    pub fn start(&self) -> u16 {
        self.from
    }

    pub fn end(&self) -> u16 {
        self.to
    }

    pub fn contains(&self, port: u16) -> bool {
        port >= self.from && port <= self.to
    }
}

impl fmt::Display for PortRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.from == self.to {
            write!(f, "{}", self.from)
        } else {
            write!(f, "{}-{}", self.from, self.to)
        }
    }
}

/// IP protocol of a network rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
    Icmp,
}

impl Protocol {
    /// IANA protocol number as used by network ACL entries
    pub fn number(&self) -> u8 {
        match self {
            Protocol::Tcp => 6,
            Protocol::Udp => 17,
            Protocol::Icmp => 1,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Tcp => write!(f, "tcp"),
            Protocol::Udp => write!(f, "udp"),
            Protocol::Icmp => write!(f, "icmp"),
        }
    }
}

/// Traffic direction relative to a subnet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Inbound,
    Outbound,
}

impl Direction {
    /// Whether the control plane treats the rule as an egress rule
    pub fn is_egress(&self) -> bool {
        matches!(self, Direction::Outbound)
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Inbound => write!(f, "inbound"),
            Direction::Outbound => write!(f, "outbound"),
        }
    }
}
