//! Domain-specific identifier types.

use cosmwasm_std::Addr;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Channel identifier, e.g. `channel-0`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(String);

impl ChannelId {
    /// Create a channel id.
    pub fn new(id: impl Into<String>) -> Self {
        ChannelId(id.into())
    }

    /// The conventional id for the n-th channel of a chain.
    pub fn from_index(n: u64) -> Self {
        ChannelId(format!("channel-{n}"))
    }

    /// Borrow the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Port identifier, e.g. `wasm.<contract>` or `transfer`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PortId(String);

impl PortId {
    /// Create a port id.
    pub fn new(id: impl Into<String>) -> Self {
        PortId(id.into())
    }

    /// The ICS20 transfer port.
    pub fn transfer() -> Self {
        PortId("transfer".to_string())
    }

    /// Port bound to a contract.
    pub fn for_contract(contract: &Addr) -> Self {
        PortId(format!("wasm.{contract}"))
    }

    /// Borrow the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Connection identifier, e.g. `connection-0`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(String);

impl ConnectionId {
    /// Create a connection id.
    pub fn new(id: impl Into<String>) -> Self {
        ConnectionId(id.into())
    }

    /// Borrow the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Packet sequence number on one channel end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Sequence(pub u64);

impl Sequence {
    /// First sequence of a freshly opened channel.
    pub const FIRST: Self = Sequence(1);

    /// The following sequence.
    pub fn next(self) -> Self {
        Sequence(self.0 + 1)
    }
}

impl fmt::Display for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "seq-{}", self.0)
    }
}

/// Block time in nanoseconds since the Unix epoch.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Create from nanoseconds.
    pub const fn from_nanos(nanos: u64) -> Self {
        Timestamp(nanos)
    }

    /// Create from seconds.
    pub const fn from_seconds(seconds: u64) -> Self {
        Timestamp(seconds * 1_000_000_000)
    }

    /// Nanoseconds since the epoch.
    pub const fn nanos(self) -> u64 {
        self.0
    }

    /// Whole seconds since the epoch.
    pub const fn seconds(self) -> u64 {
        self.0 / 1_000_000_000
    }

    /// Add seconds, saturating at the far future.
    pub const fn plus_seconds(self, seconds: u64) -> Self {
        Timestamp(self.0.saturating_add(seconds.saturating_mul(1_000_000_000)))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:09}", self.0 / 1_000_000_000, self.0 % 1_000_000_000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_arithmetic() {
        let t = Timestamp::from_seconds(1_000);
        assert_eq!(t.plus_seconds(604_800).seconds(), 605_800);
        assert_eq!(Timestamp::from_nanos(u64::MAX).plus_seconds(1).nanos(), u64::MAX);
        assert_eq!(Timestamp::from_nanos(1_500_000_000).to_string(), "1.500000000");
    }

    #[test]
    fn test_sequence_next() {
        assert_eq!(Sequence::FIRST.next(), Sequence(2));
        assert_eq!(Sequence(7).to_string(), "seq-7");
    }

    #[test]
    fn test_contract_port() {
        let contract = Addr::unchecked("osmo1provider");
        assert_eq!(PortId::for_contract(&contract).as_str(), "wasm.osmo1provider");
        assert_eq!(ChannelId::from_index(3).as_str(), "channel-3");
    }
}
