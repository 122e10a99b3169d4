//! Cross-stake channel payloads.
//!
//! Two directions share one unordered channel:
//!
//! ```text
//!   provider ──ProviderPacket──▶ consumer     (list validators, stake, unstake)
//!   provider ◀──ConsumerPacket── consumer     (reward distribution)
//! ```
//!
//! Every received packet is answered with exactly one [`Acknowledgement`].

use crate::codec::{from_binary, to_binary, Binary, StdResult};
use mesh_types::math::checked_sum;
use mesh_types::{ChannelId, OverflowError, Uint128};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Version string negotiated during the channel handshake.
pub const IBC_APP_VERSION: &str = "mesh-security-v0.1";

/// Packets sent by the provider side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderPacket {
    /// Ask the consumer for its active validator set.
    ListValidators {},

    /// Delegate `amount` of provider tokens, on behalf of `key`, to `validator`.
    Stake {
        key: String,
        validator: String,
        amount: Uint128,
    },

    /// Undo a prior stake of `amount` on behalf of `key`.
    Unstake {
        key: String,
        validator: String,
        amount: Uint128,
    },
}

impl ProviderPacket {
    /// Human-readable name for logging.
    pub fn type_name(&self) -> &'static str {
        match self {
            ProviderPacket::ListValidators {} => "ListValidators",
            ProviderPacket::Stake { .. } => "CrossStake",
            ProviderPacket::Unstake { .. } => "Undelegate",
        }
    }
}

/// Per-validator reward amount, in consumer native units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorReward {
    pub validator: String,
    pub amount: Uint128,
}

/// Packets sent by the consumer side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsumerPacket {
    /// Rewards already transferred over ICS20 on `transfer_channel` (the
    /// consumer's end), to be credited to the delegators of each validator.
    ClaimRewards {
        rewards_by_validator: Vec<ValidatorReward>,
        denom: String,
        transfer_channel: ChannelId,
    },
}

impl ConsumerPacket {
    /// Human-readable name for logging.
    pub fn type_name(&self) -> &'static str {
        match self {
            ConsumerPacket::ClaimRewards { .. } => "ClaimRewards",
        }
    }

    /// Sum of all rewards in the packet.
    pub fn total(&self) -> Result<Uint128, OverflowError> {
        match self {
            ConsumerPacket::ClaimRewards {
                rewards_by_validator,
                ..
            } => checked_sum(rewards_by_validator.iter().map(|r| r.amount)),
        }
    }
}

/// Success value of a `ListValidators` packet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListValidatorsResponse {
    pub validators: Vec<String>,
}

/// Success value of a `Stake` or `Unstake` packet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakeAck {
    /// Amount after conversion into consumer native units.
    pub local_amount: Uint128,
}

/// Success value of a `ClaimRewards` packet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardsAck {
    /// Amount credited to stakers; the rest is held as undistributed.
    pub credited: Uint128,
}

/// The response to a received packet.
///
/// `Result` carries an encoded success value specific to the packet type;
/// `Error` carries a message. Senders roll back optimistic state on `Error`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Acknowledgement {
    Result(Binary),
    Error(String),
}

impl Acknowledgement {
    /// Successful ack carrying `value`.
    pub fn success<T: Serialize>(value: &T) -> StdResult<Self> {
        Ok(Acknowledgement::Result(to_binary(value)?))
    }

    /// Error ack.
    pub fn error(message: impl Into<String>) -> Self {
        Acknowledgement::Error(message.into())
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Acknowledgement::Result(_))
    }

    /// Decode the success value, or `None` on an error ack.
    pub fn decode<T: DeserializeOwned>(&self) -> Option<StdResult<T>> {
        match self {
            Acknowledgement::Result(bytes) => Some(from_binary(bytes)),
            Acknowledgement::Error(_) => None,
        }
    }

    /// Encode for the wire.
    pub fn to_binary(&self) -> StdResult<Binary> {
        to_binary(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::from_slice;

    #[test]
    fn test_ack_wire_shape() {
        let ok = Acknowledgement::success(&ListValidatorsResponse {
            validators: vec!["v1".into()],
        })
        .unwrap();
        let bytes = ok.to_binary().unwrap();
        let back: Acknowledgement = from_slice(bytes.as_slice()).unwrap();
        assert!(back.is_success());
        let decoded: ListValidatorsResponse = back.decode().unwrap().unwrap();
        assert_eq!(decoded.validators, vec!["v1".to_string()]);

        let err = Acknowledgement::error("insufficient staking capacity");
        assert_eq!(
            std::str::from_utf8(err.to_binary().unwrap().as_slice()).unwrap(),
            r#"{"error":"insufficient staking capacity"}"#
        );
        assert!(err.decode::<StakeAck>().is_none());
    }

    #[test]
    fn test_list_validators_wire_shape() {
        let bytes = to_binary(&ProviderPacket::ListValidators {}).unwrap();
        assert_eq!(bytes.as_slice(), br#"{"list_validators":{}}"#);
    }

    #[test]
    fn test_rewards_total() {
        let packet = ConsumerPacket::ClaimRewards {
            rewards_by_validator: vec![
                ValidatorReward {
                    validator: "a".into(),
                    amount: Uint128::new(700),
                },
                ValidatorReward {
                    validator: "b".into(),
                    amount: Uint128::new(300),
                },
            ],
            denom: "ucosm".into(),
            transfer_channel: ChannelId::from_index(1),
        };
        assert_eq!(packet.total().unwrap(), Uint128::new(1000));
        assert_eq!(packet.type_name(), "ClaimRewards");
    }
}
