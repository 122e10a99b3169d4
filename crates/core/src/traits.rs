//! Core traits for contracts and the host they run on.

use crate::{ContractError, Env, Event, MessageInfo, Response};
use mesh_messages::{from_binary, to_binary, Binary};
use mesh_types::{Addr, ChannelId, Uint128};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// A contract is a state machine that processes events.
///
/// - **Synchronous**: no async, no `.await`
/// - **Deterministic**: same state + same event = same response
/// - **No I/O**: every side effect is an [`Action`](crate::Action) in the
///   returned [`Response`]
///
/// On error the host discards the contract and restores the clone it took
/// before the transaction, so implementations are free to mutate state
/// before validating everything.
pub trait Contract: Send {
    /// Short name for logging.
    fn name(&self) -> &'static str;

    /// Process an event.
    fn handle(
        &mut self,
        env: &Env,
        querier: &dyn Querier,
        event: Event,
    ) -> Result<Response, ContractError>;

    /// Read-only query. Returns JSON.
    fn query(&self, env: &Env, querier: &dyn Querier, msg: &Binary)
        -> Result<Binary, ContractError>;

    /// Snapshot of the contract. Contract state lives in persistent maps,
    /// so this is O(1).
    fn box_clone(&self) -> Box<dyn Contract>;
}

impl Clone for Box<dyn Contract> {
    fn clone(&self) -> Self {
        self.box_clone()
    }
}

/// Creates a contract from its instantiate message.
pub type InstantiateFn = fn(
    env: &Env,
    querier: &dyn Querier,
    info: MessageInfo,
    msg: &Binary,
) -> Result<(Box<dyn Contract>, Response), ContractError>;

/// Read access to chain state for contracts.
pub trait Querier {
    /// Bank balance of `address` in `denom`.
    fn balance(&self, address: &Addr, denom: &str) -> Uint128;

    /// Denomination of the staking module.
    fn bonded_denom(&self) -> String;

    /// Active validator set of the staking module.
    fn validators(&self) -> Vec<String>;

    /// Staking rewards accrued but not yet withdrawn.
    fn delegation_rewards(&self, delegator: &Addr, validator: &str) -> Uint128;

    /// Smart query against another contract.
    fn query_contract(&self, contract: &Addr, msg: &Binary) -> Result<Binary, ContractError>;

    /// Channel id at the other end of a local ICS20 channel.
    fn ics20_counterparty(&self, channel: &ChannelId) -> Option<ChannelId>;
}

/// Typed wrapper around [`Querier::query_contract`].
pub fn query_contract<Q: Serialize, R: DeserializeOwned>(
    querier: &dyn Querier,
    contract: &Addr,
    msg: &Q,
) -> Result<R, ContractError> {
    let response = querier.query_contract(contract, &to_binary(msg)?)?;
    Ok(from_binary(&response)?)
}
