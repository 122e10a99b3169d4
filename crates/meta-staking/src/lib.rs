//! Meta-staking ledger.
//!
//! Lives on the consumer chain and holds the native funds that consumer
//! contracts may stake on behalf of remote collateral. Each registered
//! consumer has a capacity (`funds_available_for_staking`); delegations are
//! performed by this contract through the host staking module, so the chain
//! sees a single delegator while the ledger tracks who owns what.
//!
//! ```text
//!   consumer ──Delegate/Undelegate──▶ meta-staking ──Action::Delegate──▶ staking module
//!                                          │
//!   consumer ◀──ReceiveRewards + funds─────┘◀──WithdrawDelegatorReward──
//! ```
//!
//! Rewards withdrawn for a validator are split between consumers in
//! proportion to their delegation on it, rounding down. The rounding
//! remainder stays with the contract as unattributed dust.

mod contract;

pub use contract::{instantiate, ConsumerState, MetaStakingContract};
