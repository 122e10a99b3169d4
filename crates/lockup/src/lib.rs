//! Lockup ledger.
//!
//! Owners bond collateral here and grant claims on it to staking contracts.
//! A claim names a leinholder (the provider contract) and a validator; the
//! leinholder is notified in the same transaction so that the claim and the
//! stake it backs appear together. Only the leinholder can later release a
//! claim, or slash it, which burns the slashed part of the bond.

mod contract;
pub mod state;

pub use contract::{instantiate, LockupContract};
