//! Provider side of mesh security.
//!
//! # Stake lifecycle
//!
//! ```text
//!   lockup GrantClaim ──▶ ReceiveClaim ──▶ stake raised, Stake packet out
//!                                             │
//!                      ack ok ◀───────────────┤───────────▶ ack error / timeout
//!                   (confirmed)                            (stake restored,
//!                                                           claim released)
//!
//!   Unstake ──▶ stake lowered, unbonding entry, Unstake packet out
//!   Unbond  ──▶ matured + confirmed entries released to the lockup,
//!               slashed share burned via SlashClaim
//! ```
//!
//! Rewards arrive as `ClaimRewards` packets (accounting) and ICS20
//! transfers (funds) on separate channels. Each validator keeps a
//! cumulative reward index; delegators accrue `staked * Δindex`.

mod contract;
mod ibc;
pub mod slasher;
pub mod state;


pub use contract::{instantiate, Config, ProviderContract, SLASHER_REPLY_ID};
