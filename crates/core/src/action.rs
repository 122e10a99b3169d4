//! Outputs of a contract.
//!
//! Contracts never perform I/O. Every side effect (moving funds, staking,
//! sending packets, calling other contracts) is returned as an [`Action`]
//! and carried out by the host after the entry point returns. Actions run in
//! order; if one fails the whole transaction is reverted unless it was
//! wrapped in a [`SubMsg`] that asked for a reply on error.

use mesh_messages::{to_binary, Acknowledgement, Binary, StdResult};
use mesh_types::{Addr, ChannelId, Coin, Sequence, Timestamp};
use serde::Serialize;

/// Side effects requested by a contract.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Call another contract.
    Execute {
        contract: Addr,
        msg: Binary,
        funds: Vec<Coin>,
    },

    /// Create a contract from stored code; the contract calling this
    /// becomes the sender of the instantiate message.
    Instantiate {
        code_id: u64,
        msg: Binary,
        label: String,
    },

    /// Move funds from the contract to `to`.
    BankSend { to: Addr, amount: Vec<Coin> },

    /// Destroy funds held by the contract.
    Burn { amount: Vec<Coin> },

    /// Delegate contract funds on the host staking module.
    Delegate { validator: String, amount: Coin },

    /// Undelegate from the host staking module.
    Undelegate { validator: String, amount: Coin },

    /// Move accrued staking rewards into the contract balance.
    WithdrawDelegatorReward { validator: String },

    /// Send a packet on a channel this contract is bound to.
    ///
    /// `sequence` must be the channel's next send sequence; contracts track
    /// it themselves so they can key pending state before the send happens.
    SendPacket {
        channel_id: ChannelId,
        sequence: Sequence,
        data: Binary,
        timeout: Timestamp,
    },

    /// ICS20 token transfer from the contract's balance.
    Transfer {
        channel_id: ChannelId,
        to_address: String,
        amount: Coin,
        timeout: Timestamp,
    },

    /// Run an action and report its result back to the caller.
    Submessage(SubMsg),
}

impl Action {
    /// Build an `Execute` action from a typed message.
    pub fn execute<T: Serialize>(
        contract: &Addr,
        msg: &T,
        funds: Vec<Coin>,
    ) -> StdResult<Self> {
        Ok(Action::Execute {
            contract: contract.clone(),
            msg: to_binary(msg)?,
            funds,
        })
    }

    /// Get the action type name for logging.
    pub fn type_name(&self) -> &'static str {
        match self {
            Action::Execute { .. } => "Execute",
            Action::Instantiate { .. } => "Instantiate",
            Action::BankSend { .. } => "BankSend",
            Action::Burn { .. } => "Burn",
            Action::Delegate { .. } => "Delegate",
            Action::Undelegate { .. } => "Undelegate",
            Action::WithdrawDelegatorReward { .. } => "WithdrawDelegatorReward",
            Action::SendPacket { .. } => "SendPacket",
            Action::Transfer { .. } => "Transfer",
            Action::Submessage(_) => "Submessage",
        }
    }
}

/// When a submessage result is reported back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyOn {
    Always,
    Success,
    Error,
}

/// An action whose result is delivered to the caller as `Event::Reply`.
///
/// A failed submessage only reverts its own effects when the caller asked to
/// be told about errors; otherwise the failure aborts the transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct SubMsg {
    pub id: u64,
    pub action: Box<Action>,
    pub reply_on: ReplyOn,
}

impl SubMsg {
    pub fn reply_always(id: u64, action: Action) -> Self {
        SubMsg {
            id,
            action: Box::new(action),
            reply_on: ReplyOn::Always,
        }
    }

    pub fn reply_on_success(id: u64, action: Action) -> Self {
        SubMsg {
            id,
            action: Box::new(action),
            reply_on: ReplyOn::Success,
        }
    }
}

/// What an entry point returns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Response {
    pub actions: Vec<Action>,
    pub attributes: Vec<(String, String)>,
    /// Acknowledgement for the packet being received. A receive handler
    /// that delegates work to a submessage leaves this empty and sets it
    /// from the reply instead.
    pub ack: Option<Acknowledgement>,
    /// Data returned to a calling contract.
    pub data: Option<Binary>,
}

impl Response {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_action(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }

    pub fn add_actions(mut self, actions: impl IntoIterator<Item = Action>) -> Self {
        self.actions.extend(actions);
        self
    }

    pub fn add_submessage(mut self, msg: SubMsg) -> Self {
        self.actions.push(Action::Submessage(msg));
        self
    }

    pub fn add_attribute(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.attributes.push((key.into(), value.to_string()));
        self
    }

    pub fn set_ack(mut self, ack: Acknowledgement) -> Self {
        self.ack = Some(ack);
        self
    }

    pub fn set_data(mut self, data: Binary) -> Self {
        self.data = Some(data);
        self
    }

    /// Look up an attribute by key.
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mesh_messages::ProviderPacket;

    #[test]
    fn test_response_builder() {
        let response = Response::new()
            .add_attribute("action", "bond")
            .add_attribute("amount", 500_000u64)
            .add_action(Action::Burn { amount: vec![] });
        assert_eq!(response.attribute("amount"), Some("500000"));
        assert_eq!(response.attribute("missing"), None);
        assert_eq!(response.actions.len(), 1);
        assert!(response.ack.is_none());
    }

    #[test]
    fn test_execute_encodes_message() {
        let contract = Addr::unchecked("consumer");
        let action =
            Action::execute(&contract, &ProviderPacket::ListValidators {}, vec![]).unwrap();
        match action {
            Action::Execute { msg, .. } => {
                assert_eq!(msg.as_slice(), br#"{"list_validators":{}}"#)
            }
            other => panic!("unexpected action {other:?}"),
        }
    }
}
