use crate::instantiate;
use mesh_core::testing::{execute, mock_env, mock_info, query, MockQuerier};
use mesh_core::{
    Action, ChannelConnectMsg, ChannelOpenMsg, ChannelOrder, Contract, ContractError, Env, Event,
    IbcChannel, IbcEndpoint, IbcPacket, ReplyOn, Response, SubMsgResponse,
};
use mesh_messages::consumer::{
    ExecuteMsg, InstantiateMsg, ParkedRewardsResponse, ProviderInfo, QueryMsg, StakesResponse,
};
use mesh_messages::meta_staking::ExecuteMsg as MetaStakingExecuteMsg;
use mesh_messages::{
    from_binary, to_binary, Acknowledgement, ConsumerPacket, ListValidatorsResponse,
    ProviderPacket, StakeAck, ValidatorReward, IBC_APP_VERSION,
};
use mesh_types::{coin, ChannelId, ConnectionId, Decimal, PortId, Sequence, Timestamp, Uint128};
use tracing_test::traced_test;

const CONSUMER: &str = "juno1consumer";
const META_STAKING: &str = "juno1meta";
const PROVIDER_PORT: &str = "wasm.osmo1provider";

fn consumer_end() -> IbcEndpoint {
    IbcEndpoint {
        port_id: PortId::new(format!("wasm.{CONSUMER}")),
        channel_id: ChannelId::new("channel-0"),
    }
}

fn provider_end() -> IbcEndpoint {
    IbcEndpoint {
        port_id: PortId::new(PROVIDER_PORT),
        channel_id: ChannelId::new("channel-3"),
    }
}

fn channel_with_port(port: &str) -> IbcChannel {
    IbcChannel {
        endpoint: consumer_end(),
        counterparty_endpoint: IbcEndpoint {
            port_id: PortId::new(port),
            channel_id: ChannelId::new("channel-3"),
        },
        order: ChannelOrder::Unordered,
        version: IBC_APP_VERSION.to_string(),
        connection_id: ConnectionId::new("connection-0"),
    }
}

fn inbound(sequence: u64, packet: &ProviderPacket) -> IbcPacket {
    IbcPacket {
        data: to_binary(packet).unwrap(),
        src: provider_end(),
        dest: consumer_end(),
        sequence: Sequence(sequence),
        timeout: Timestamp::from_seconds(3600),
    }
}

fn stake(amount: u128) -> ProviderPacket {
    ProviderPacket::Stake {
        key: "osmo1alice".into(),
        validator: "v1".into(),
        amount: Uint128::new(amount),
    }
}

struct Suite {
    consumer: Box<dyn Contract>,
    querier: MockQuerier,
    env: Env,
}

impl Suite {
    /// Unbound consumer with exchange rate 0.1.
    fn unbound() -> Self {
        let mut querier = MockQuerier::new("ucosm").with_validators(&["v1", "v2"]);
        querier.set_ics20_counterparty("channel-1", "channel-7");
        let env = mock_env(CONSUMER, 100);
        let msg = to_binary(&InstantiateMsg {
            provider: ProviderInfo {
                port_id: PortId::new(PROVIDER_PORT),
                connection_id: ConnectionId::new("connection-0"),
            },
            remote_to_local_exchange_rate: Decimal::percent(10),
            meta_staking_contract_address: META_STAKING.into(),
            ics20_channel: ChannelId::new("channel-1"),
            packet_lifetime: None,
        })
        .unwrap();
        let (consumer, _) = instantiate(&env, &querier, mock_info("creator", &[]), &msg).unwrap();
        Suite {
            consumer,
            querier,
            env,
        }
    }

    fn new() -> Self {
        let mut suite = Self::unbound();
        suite
            .handle(Event::ChannelOpen(ChannelOpenMsg::OpenInit {
                channel: channel_with_port(PROVIDER_PORT),
            }))
            .unwrap();
        suite
            .handle(Event::ChannelConnect(ChannelConnectMsg::OpenAck {
                channel: channel_with_port(PROVIDER_PORT),
                counterparty_version: IBC_APP_VERSION.to_string(),
            }))
            .unwrap();
        suite
    }

    fn handle(&mut self, event: Event) -> Result<Response, ContractError> {
        self.consumer.handle(&self.env, &self.querier, event)
    }

    fn receive(&mut self, sequence: u64, packet: &ProviderPacket) -> Response {
        self.handle(Event::PacketReceive {
            packet: inbound(sequence, packet),
        })
        .unwrap()
    }

    fn reply(&mut self, id: u64, result: Result<(), &str>) -> Response {
        let result = result
            .map(|_| SubMsgResponse::default())
            .map_err(|e| e.to_string());
        self.handle(Event::Reply { id, result }).unwrap()
    }

    fn stakes(&self) -> StakesResponse {
        query(
            self.consumer.as_ref(),
            &self.env,
            &self.querier,
            &QueryMsg::Stakes {
                key: "osmo1alice".into(),
            },
        )
        .unwrap()
    }
}

#[traced_test]
#[test]
fn test_handshake_checks() {
    let mut suite = Suite::unbound();
    let err = suite
        .handle(Event::ChannelOpen(ChannelOpenMsg::OpenInit {
            channel: channel_with_port("wasm.osmo1impostor"),
        }))
        .unwrap_err();
    assert_eq!(err, ContractError::Unauthorized);

    let mut suite = Suite::new();
    let err = suite
        .handle(Event::ChannelOpen(ChannelOpenMsg::OpenInit {
            channel: channel_with_port(PROVIDER_PORT),
        }))
        .unwrap_err();
    assert_eq!(err.to_string(), "Contract already has a bound channel");
}

#[test]
fn test_list_validators_acked_immediately() {
    let mut suite = Suite::new();
    let response = suite.receive(1, &ProviderPacket::ListValidators {});
    let ack = response.ack.unwrap();
    let list: ListValidatorsResponse = ack.decode().unwrap().unwrap();
    assert_eq!(list.validators, vec!["v1".to_string(), "v2".to_string()]);
}

#[traced_test]
#[test]
fn test_stake_acked_from_reply() {
    let mut suite = Suite::new();
    let response = suite.receive(2, &stake(500_000));
    assert!(response.ack.is_none(), "ack waits for meta-staking");

    match &response.actions[..] {
        [Action::Submessage(sub)] => {
            assert_eq!(sub.id, 2);
            assert_eq!(sub.reply_on, ReplyOn::Always);
            match sub.action.as_ref() {
                Action::Execute { contract, msg, .. } => {
                    assert_eq!(contract.as_str(), META_STAKING);
                    let msg: MetaStakingExecuteMsg = from_binary(msg).unwrap();
                    assert_eq!(
                        msg,
                        MetaStakingExecuteMsg::Delegate {
                            validator: "v1".into(),
                            amount: Uint128::new(50_000),
                        }
                    );
                }
                other => panic!("unexpected action {other:?}"),
            }
        }
        other => panic!("unexpected actions {other:?}"),
    }

    let reply = suite.reply(2, Ok(()));
    let ack = reply.ack.clone().unwrap();
    let value: StakeAck = ack.decode().unwrap().unwrap();
    assert_eq!(value.local_amount, Uint128::new(50_000));
    assert_eq!(suite.stakes().stakes[0].amount, Uint128::new(50_000));

    // Redelivery: same ack, no new delegation
    let replay = suite.receive(2, &stake(500_000));
    assert_eq!(replay.ack, Some(ack));
    assert!(replay.actions.is_empty());
    assert_eq!(suite.stakes().stakes[0].amount, Uint128::new(50_000));
}

#[test]
fn test_failed_delegation_acks_error() {
    let mut suite = Suite::new();
    suite.receive(3, &stake(10_000_000));
    let reply = suite.reply(3, Err("Insufficient staking capacity: 0 available"));
    assert!(matches!(
        reply.ack,
        Some(Acknowledgement::Error(ref reason)) if reason.contains("capacity")
    ));
    assert!(suite.stakes().stakes.is_empty());

    // The error is remembered, so a retry cannot succeed after rollback
    let replay = suite.receive(3, &stake(10_000_000));
    assert!(matches!(replay.ack, Some(Acknowledgement::Error(_))));
}

#[test]
fn test_unstake_more_than_held_is_error_ack() {
    let mut suite = Suite::new();
    let response = suite.receive(
        4,
        &ProviderPacket::Unstake {
            key: "osmo1alice".into(),
            validator: "v1".into(),
            amount: Uint128::new(100),
        },
    );
    assert!(response.actions.is_empty());
    assert!(matches!(response.ack, Some(Acknowledgement::Error(_))));
}

#[test]
fn test_dust_stake_rejected() {
    let mut suite = Suite::new();
    let response = suite.receive(5, &stake(9));
    assert!(matches!(response.ack, Some(Acknowledgement::Error(_))));
}

fn unstake(amount: u128) -> ProviderPacket {
    ProviderPacket::Unstake {
        key: "osmo1alice".into(),
        validator: "v1".into(),
        amount: Uint128::new(amount),
    }
}

fn meta_call(response: &Response) -> MetaStakingExecuteMsg {
    match &response.actions[..] {
        [Action::Submessage(sub)] => match sub.action.as_ref() {
            Action::Execute { msg, .. } => from_binary(msg).unwrap(),
            other => panic!("unexpected action {other:?}"),
        },
        other => panic!("unexpected actions {other:?}"),
    }
}

#[traced_test]
#[test]
fn test_rounding_follows_running_total() {
    let mut suite = Suite::new();

    // 15 and 15 at 0.1: 1 then 2 more, never 1 + 1
    let first = suite.receive(10, &stake(15));
    assert_eq!(
        meta_call(&first),
        MetaStakingExecuteMsg::Delegate {
            validator: "v1".into(),
            amount: Uint128::new(1),
        }
    );
    suite.reply(10, Ok(()));
    let second = suite.receive(11, &stake(15));
    assert_eq!(
        meta_call(&second),
        MetaStakingExecuteMsg::Delegate {
            validator: "v1".into(),
            amount: Uint128::new(2),
        }
    );
    suite.reply(11, Ok(()));
    let held = suite.stakes().stakes[0].clone();
    assert_eq!(held.amount, Uint128::new(3));
    assert_eq!(held.remote, Uint128::new(30));

    // Dropping 5 leaves floor(25 * 0.1) = 2, so one unit moves
    let partial = suite.receive(12, &unstake(5));
    assert_eq!(
        meta_call(&partial),
        MetaStakingExecuteMsg::Undelegate {
            validator: "v1".into(),
            amount: Uint128::new(1),
        }
    );
    suite.reply(12, Ok(()));

    // 25 down to 21 stays at 2 local: acked at once with nothing to move
    let dust = suite.receive(13, &unstake(4));
    assert!(dust.actions.is_empty());
    let value: StakeAck = dust.ack.unwrap().decode().unwrap().unwrap();
    assert_eq!(value.local_amount, Uint128::zero());
    assert_eq!(suite.stakes().stakes[0].remote, Uint128::new(21));

    // The rest drains the position completely
    let rest = suite.receive(14, &unstake(21));
    assert_eq!(
        meta_call(&rest),
        MetaStakingExecuteMsg::Undelegate {
            validator: "v1".into(),
            amount: Uint128::new(2),
        }
    );
    suite.reply(14, Ok(()));
    assert!(suite.stakes().stakes.is_empty());
}

#[test]
fn test_rejected_unstake_keeps_position() {
    let mut suite = Suite::new();
    suite.receive(20, &stake(100));
    suite.reply(20, Ok(()));
    suite.receive(21, &unstake(100));
    suite.reply(21, Err("Insufficient delegation"));
    let held = suite.stakes().stakes[0].clone();
    assert_eq!(held.amount, Uint128::new(10));
    assert_eq!(held.remote, Uint128::new(100));
}

#[test]
fn test_foreign_packet_unauthorized() {
    let mut suite = Suite::new();
    let mut packet = inbound(1, &stake(100));
    packet.dest.channel_id = ChannelId::new("channel-9");
    let err = suite.handle(Event::PacketReceive { packet }).unwrap_err();
    assert_eq!(err, ContractError::Unauthorized);
}

#[traced_test]
#[test]
fn test_rewards_forwarded_and_parked_on_failure() {
    let mut suite = Suite::new();
    let rewards = vec![
        ValidatorReward {
            validator: "v1".into(),
            amount: Uint128::new(700),
        },
        ValidatorReward {
            validator: "v2".into(),
            amount: Uint128::new(300),
        },
    ];
    let msg = ExecuteMsg::ReceiveRewards {
        rewards_by_validator: rewards.clone(),
    };
    let env = suite.env.clone();

    let err = execute(
        suite.consumer.as_mut(),
        &env,
        &suite.querier,
        mock_info("juno1mallory", &[coin(1000, "ucosm")]),
        &msg,
    )
    .unwrap_err();
    assert_eq!(err, ContractError::Unauthorized);

    let err = execute(
        suite.consumer.as_mut(),
        &env,
        &suite.querier,
        mock_info(META_STAKING, &[coin(999, "ucosm")]),
        &msg,
    )
    .unwrap_err();
    assert!(matches!(err, ContractError::RewardMismatch { .. }));

    let response = execute(
        suite.consumer.as_mut(),
        &env,
        &suite.querier,
        mock_info(META_STAKING, &[coin(1000, "ucosm")]),
        &msg,
    )
    .unwrap();
    let sequence = match &response.actions[..] {
        [Action::Transfer {
            channel_id,
            to_address,
            amount,
            ..
        }, Action::SendPacket { sequence, data, .. }] => {
            assert_eq!(channel_id.as_str(), "channel-1");
            assert_eq!(to_address, "osmo1provider");
            assert_eq!(amount, &coin(1000, "ucosm"));
            let packet: ConsumerPacket = from_binary(data).unwrap();
            assert_eq!(
                packet,
                ConsumerPacket::ClaimRewards {
                    rewards_by_validator: rewards.clone(),
                    denom: "ucosm".into(),
                    transfer_channel: ChannelId::new("channel-7"),
                }
            );
            *sequence
        }
        other => panic!("unexpected actions {other:?}"),
    };

    let sent = IbcPacket {
        data: Default::default(),
        src: consumer_end(),
        dest: provider_end(),
        sequence,
        timeout: Timestamp::from_seconds(3700),
    };
    suite
        .handle(Event::PacketTimeout {
            packet: sent.clone(),
        })
        .unwrap();
    let parked: ParkedRewardsResponse = query(
        suite.consumer.as_ref(),
        &env,
        &suite.querier,
        &QueryMsg::ParkedRewards {},
    )
    .unwrap();
    assert_eq!(parked.rewards, rewards);

    // A late duplicate timeout parks nothing twice
    suite.handle(Event::PacketTimeout { packet: sent }).unwrap();

    let response = execute(
        suite.consumer.as_mut(),
        &env,
        &suite.querier,
        mock_info("anyone", &[]),
        &ExecuteMsg::RetryRewards {},
    )
    .unwrap();
    assert!(matches!(response.actions[..], [Action::SendPacket { .. }]));
    let parked: ParkedRewardsResponse = query(
        suite.consumer.as_ref(),
        &env,
        &suite.querier,
        &QueryMsg::ParkedRewards {},
    )
    .unwrap();
    assert!(parked.rewards.is_empty());
}
