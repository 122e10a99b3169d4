//! Deterministic two-chain host for mesh security contracts.
//!
//! Each [`Chain`] runs contracts as synchronous state machines against an
//! in-memory bank, staking module and IBC host. A [`Link`] relays packets,
//! acknowledgements and timeouts between two chains through a seeded
//! [`SimulatedNetwork`] that can drop, duplicate and reorder deliveries.
//! Given the same seed, a run produces identical results.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐                     ┌──────────────────────┐
//! │ Chain (provider)     │                     │ Chain (consumer)     │
//! │                      │                     │                      │
//! │  lockup ─▶ provider  │   ┌─────────────┐   │  consumer ─▶ meta    │
//! │             │        │   │    Link     │   │     │       staking  │
//! │             ▼        │   │             │   │     ▼                │
//! │  IbcHost outbox ─────┼──▶│ Simulated   │──▶┼─ receive / ack       │
//! │  commitments    ◀────┼───│ Network     │◀──┼─ IbcHost outbox      │
//! │  ICS20 escrow        │   └─────────────┘   │  ICS20 vouchers      │
//! └──────────────────────┘                     └──────────────────────┘
//! ```

mod bank;
mod chain;
mod error;
mod ibc;
mod ics20;
mod network;
mod relayer;
mod staking;

pub use chain::{Chain, ChainConfig};
pub use error::HostError;
pub use ibc::{ChannelEnd, ChannelState};
pub use ics20::{escrow_address, voucher_denom, Ics20Packet, ICS20_VERSION};
pub use network::{Fate, NetworkConfig, NetworkStats, SimulatedNetwork};
pub use relayer::{ChannelPair, Link, RelayInfo, Side};
pub use staking::BONDED_POOL;
