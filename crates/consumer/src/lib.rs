//! Consumer side of mesh security.
//!
//! Receives staking packets from the provider over the bound channel,
//! converts amounts with the configured exchange rate and delegates
//! through meta-staking. The ack for a staking packet is only written once
//! meta-staking has replied, so a capacity or staking failure reaches the
//! provider as an error ack and the packet leaves no trace here.
//!
//! Rewards flow the other way: meta-staking pays this contract, which
//! transfers the funds over ICS20 and reports the split per validator in a
//! `ClaimRewards` packet. Failed reward packets are parked and re-sent.

mod contract;
mod ibc;
pub mod state;

#[cfg(test)]
mod tests;

pub use contract::{instantiate, Config, ConsumerContract};
