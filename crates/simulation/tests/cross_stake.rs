//! Cross-stake lifecycle across two simulated chains.

use mesh_core::{ChannelBinding, ChannelOrder, ContractError, IbcEndpoint};
use mesh_messages::consumer::QueryMsg as ConsumerQueryMsg;
use mesh_messages::slasher::ExecuteMsg as SlasherExecuteMsg;
use mesh_messages::IBC_APP_VERSION;
use mesh_simulation::{ChannelState, HostError, RelayInfo};
use mesh_test_helpers::{MeshConfig, MeshSetup, CONSUMER_DENOM, UNBONDING_PERIOD, VALIDATORS};
use mesh_types::{ChannelId, Decimal, PortId, Uint128};
use tracing_test::traced_test;

const VALIDATOR: &str = VALIDATORS[0];

fn one_packet_each_way() -> RelayInfo {
    RelayInfo {
        packets_from_b: 1,
        acks_from_a: 1,
        ..Default::default()
    }
}

#[traced_test]
#[test]
fn test_setup_learns_validator_set() {
    let setup = MeshSetup::new(MeshConfig::default()).unwrap();
    for validator in VALIDATORS {
        let state = setup.provider_validator(validator).unwrap();
        assert!(state.stake.is_zero());
        assert_eq!(state.multiplier, Decimal::one());
    }
    assert_eq!(setup.provider_chain.pending_commitments(), 0);
}

#[traced_test]
#[test]
fn test_lock_grant_unstake_scenario() {
    let mut setup = MeshSetup::new(MeshConfig::default()).unwrap();
    let owner = setup.owner().clone();

    setup.bond(&owner, 500_000).unwrap();
    setup.grant(&owner, 500_000, VALIDATOR).unwrap();

    // In flight on the provider, nothing on the consumer yet
    assert!(setup.provider_stake(&owner, VALIDATOR).unwrap().is_zero());
    assert_eq!(
        setup.provider_in_flight(&owner, VALIDATOR).unwrap(),
        Uint128::new(500_000)
    );
    assert!(setup.meta_delegation(VALIDATOR).unwrap().is_zero());
    let balance = setup.lockup_balance(&owner).unwrap();
    assert_eq!(balance.bonded, Uint128::new(500_000));
    assert!(balance.free.is_zero());

    assert_eq!(setup.relay().unwrap(), one_packet_each_way());
    assert_eq!(
        setup.provider_stake(&owner, VALIDATOR).unwrap(),
        Uint128::new(500_000)
    );
    assert!(setup.provider_in_flight(&owner, VALIDATOR).unwrap().is_zero());
    assert_eq!(
        setup.meta_delegation(VALIDATOR).unwrap(),
        Uint128::new(500_000)
    );
    assert_eq!(
        setup
            .consumer_chain
            .delegation(&setup.meta_staking, VALIDATOR),
        Uint128::new(500_000)
    );

    setup.unstake(&owner, 100, VALIDATOR).unwrap();
    assert_eq!(setup.relay().unwrap(), one_packet_each_way());
    assert_eq!(
        setup.provider_stake(&owner, VALIDATOR).unwrap(),
        Uint128::new(499_900)
    );
    assert_eq!(
        setup.meta_delegation(VALIDATOR).unwrap(),
        Uint128::new(499_900)
    );

    let stakes = setup.consumer_stakes(&owner).unwrap().stakes;
    assert_eq!(stakes.len(), 1);
    assert_eq!(stakes[0].amount, Uint128::new(499_900));

    // Nothing left to relay
    assert!(setup.relay().unwrap().is_empty());
    assert_eq!(setup.provider_chain.pending_commitments(), 0);
    assert_eq!(setup.consumer_chain.pending_commitments(), 0);
}

#[traced_test]
#[test]
fn test_unbond_waits_for_unbonding_period() {
    let mut setup = MeshSetup::new(MeshConfig::default()).unwrap();
    let owner = setup.owner().clone();
    setup.bond(&owner, 1_000).unwrap();
    setup.grant(&owner, 1_000, VALIDATOR).unwrap();
    setup.relay().unwrap();
    setup.unstake(&owner, 400, VALIDATOR).unwrap();
    setup.relay().unwrap();

    let release_at = setup.provider_chain.time().seconds() + UNBONDING_PERIOD;
    setup.advance_time(UNBONDING_PERIOD - 1);
    let err = setup.unbond(&owner).unwrap_err();
    assert_eq!(
        err.contract_error(),
        Some(&ContractError::UnbondingPeriodNotElapsed { release_at })
    );

    setup.advance_time(1);
    setup.unbond(&owner).unwrap();
    let balance = setup.lockup_balance(&owner).unwrap();
    assert_eq!(balance.bonded, Uint128::new(1_000));
    assert_eq!(balance.free, Uint128::new(400));

    // The released part can leave the lockup, the claimed part cannot
    setup.unbond_lockup(&owner, 400).unwrap();
    let err = setup.unbond_lockup(&owner, 1).unwrap_err();
    assert!(matches!(
        err.contract_error(),
        Some(ContractError::InsufficientFreeBalance { .. })
    ));
}

#[traced_test]
#[test]
fn test_unconfirmed_unstake_cannot_unbond() {
    let mut setup = MeshSetup::new(MeshConfig::default()).unwrap();
    let owner = setup.owner().clone();
    setup.bond(&owner, 1_000).unwrap();
    setup.grant(&owner, 1_000, VALIDATOR).unwrap();
    setup.relay().unwrap();

    // Unstake never relayed: the entry matures but is not confirmed
    setup.unstake(&owner, 500, VALIDATOR).unwrap();
    setup.advance_time(UNBONDING_PERIOD);
    let err = setup.unbond(&owner).unwrap_err();
    assert!(matches!(
        err.contract_error(),
        Some(ContractError::UnbondingPeriodNotElapsed { .. })
    ));
}

#[traced_test]
#[test]
fn test_in_flight_stake_cannot_be_unstaked() {
    let mut setup = MeshSetup::new(MeshConfig::default()).unwrap();
    let owner = setup.owner().clone();
    setup.bond(&owner, 1_000).unwrap();
    setup.grant(&owner, 1_000, VALIDATOR).unwrap();

    let err = setup.unstake(&owner, 1, VALIDATOR).unwrap_err();
    assert_eq!(
        err.contract_error(),
        Some(&ContractError::InsufficientClaim {
            available: Uint128::zero(),
            requested: Uint128::new(1),
        })
    );

    setup.relay().unwrap();
    setup.unstake(&owner, 1, VALIDATOR).unwrap();
}

#[traced_test]
#[test]
fn test_capacity_error_rolls_back_both_sides() {
    let mut setup = MeshSetup::new(MeshConfig::default().with_staking_capacity(1_000)).unwrap();
    let owner = setup.owner().clone();
    setup.bond(&owner, 5_000).unwrap();

    setup.grant(&owner, 600, VALIDATOR).unwrap();
    setup.relay().unwrap();
    setup.grant(&owner, 600, VALIDATORS[1]).unwrap();
    assert_eq!(setup.relay().unwrap(), one_packet_each_way());

    // Second stake rejected: provider stake and lockup claim restored
    assert!(setup.provider_stake(&owner, VALIDATORS[1]).unwrap().is_zero());
    assert!(setup.provider_validator(VALIDATORS[1]).unwrap().stake.is_zero());
    let balance = setup.lockup_balance(&owner).unwrap();
    assert_eq!(balance.free, Uint128::new(4_400));
    assert_eq!(balance.claims.len(), 1);

    // Meta-staking and the staking module saw only the first stake
    let info = setup.meta_consumer().unwrap();
    assert_eq!(info.total_staked, Uint128::new(600));
    assert!(setup.meta_delegation(VALIDATORS[1]).unwrap().is_zero());
    assert!(setup
        .consumer_chain
        .delegation(&setup.meta_staking, VALIDATORS[1])
        .is_zero());
    assert_eq!(setup.consumer_stakes(&owner).unwrap().stakes.len(), 1);
}

#[traced_test]
#[test]
fn test_exchange_rate_applied_on_consumer() {
    let config = MeshConfig::default().with_exchange_rate(Decimal::percent(10));
    let mut setup = MeshSetup::new(config).unwrap();
    let owner = setup.owner().clone();
    setup.bond(&owner, 5_000).unwrap();
    setup.grant(&owner, 5_000, VALIDATOR).unwrap();
    setup.relay().unwrap();

    assert_eq!(
        setup.provider_stake(&owner, VALIDATOR).unwrap(),
        Uint128::new(5_000)
    );
    assert_eq!(setup.meta_delegation(VALIDATOR).unwrap(), Uint128::new(500));
    assert_eq!(
        setup
            .consumer_chain
            .balance(&setup.meta_staking, CONSUMER_DENOM),
        Uint128::new(1_000_000 - 500)
    );

    // 5 more provider units leave floor(5_005 * 0.1) at 500 and are refused
    setup.bond(&owner, 5).unwrap();
    setup.grant(&owner, 5, VALIDATOR).unwrap();
    assert_eq!(setup.relay().unwrap(), one_packet_each_way());
    assert_eq!(
        setup.provider_stake(&owner, VALIDATOR).unwrap(),
        Uint128::new(5_000)
    );
    assert_eq!(setup.lockup_balance(&owner).unwrap().free, Uint128::new(5));
    assert_eq!(setup.meta_delegation(VALIDATOR).unwrap(), Uint128::new(500));
}

#[traced_test]
#[test]
fn test_setup_requires_an_owner() {
    let err = MeshSetup::new(MeshConfig::default().with_owners(&[])).unwrap_err();
    assert!(matches!(err, HostError::InvalidSetup(_)));
}

#[traced_test]
#[test]
fn test_second_handshake_rejected() {
    let mut setup = MeshSetup::new(MeshConfig::default()).unwrap();
    let consumer_port = PortId::for_contract(&setup.consumer);
    let provider_port = PortId::for_contract(&setup.provider);

    let err = setup
        .link
        .create_channel(
            &mut setup.consumer_chain,
            &mut setup.provider_chain,
            &consumer_port,
            &provider_port,
            IBC_APP_VERSION,
            ChannelOrder::Unordered,
        )
        .unwrap_err();
    assert_eq!(
        err.contract_error(),
        Some(&ContractError::ChannelAlreadyBound)
    );

    let binding: Option<ChannelBinding> = setup
        .consumer_chain
        .query(&setup.consumer, &ConsumerQueryMsg::Channel {})
        .unwrap();
    let binding = binding.unwrap();
    assert_eq!(binding.channel_id, setup.mesh_channel.a.channel_id);
    assert_eq!(binding.counterparty_channel, setup.mesh_channel.b.channel_id);
    assert!(!binding.closed);

    assert_eq!(
        setup
            .consumer_chain
            .channel(&consumer_port, &setup.mesh_channel.a.channel_id)
            .map(|end| end.state),
        Some(ChannelState::Open)
    );

    // The provider refuses to respond to a new channel as well
    let intruder = IbcEndpoint {
        port_id: PortId::new("wasm.juno1intruder"),
        channel_id: ChannelId::new("channel-9"),
    };
    let connection = setup.link.connection_b().clone();
    let err = setup
        .provider_chain
        .chan_open_try(
            &provider_port,
            &connection,
            &intruder,
            IBC_APP_VERSION,
            ChannelOrder::Unordered,
        )
        .unwrap_err();
    assert_eq!(
        err.contract_error(),
        Some(&ContractError::ChannelAlreadyBound)
    );
    assert!(setup.relay().unwrap().is_empty());
}

#[traced_test]
#[test]
fn test_slash_applied_at_unbond() {
    let mut setup = MeshSetup::new(MeshConfig::default()).unwrap();
    let owner = setup.owner().clone();
    setup.bond(&owner, 1_000).unwrap();
    setup.grant(&owner, 1_000, VALIDATOR).unwrap();
    setup.relay().unwrap();

    let admin = setup.admin.clone();
    let slasher = setup.slasher.clone();
    setup
        .provider_chain
        .execute(
            &admin,
            &slasher,
            &SlasherExecuteMsg::Slash {
                validator: VALIDATOR.to_string(),
                percentage: Decimal::percent(10),
            },
            &[],
        )
        .unwrap();
    assert_eq!(
        setup.provider_validator(VALIDATOR).unwrap().multiplier,
        Decimal::percent(90)
    );

    // Only the slasher's owner may slash
    let err = setup
        .provider_chain
        .execute(
            &owner,
            &slasher,
            &SlasherExecuteMsg::Slash {
                validator: VALIDATOR.to_string(),
                percentage: Decimal::percent(10),
            },
            &[],
        )
        .unwrap_err();
    assert_eq!(err.contract_error(), Some(&ContractError::Unauthorized));

    setup.unstake(&owner, 1_000, VALIDATOR).unwrap();
    setup.relay().unwrap();
    setup.advance_time(UNBONDING_PERIOD);
    setup.unbond(&owner).unwrap();

    let balance = setup.lockup_balance(&owner).unwrap();
    assert_eq!(balance.bonded, Uint128::new(900));
    assert_eq!(balance.free, Uint128::new(900));
    assert!(balance.claims.is_empty());
}
