//! Reward forwarding from meta-staking to provider delegators.

use mesh_core::ContractError;
use mesh_messages::consumer::ExecuteMsg as ConsumerExecuteMsg;
use mesh_messages::ValidatorReward;
use mesh_simulation::{escrow_address, NetworkConfig, RelayInfo};
use mesh_test_helpers::{MeshConfig, MeshSetup, CONSUMER_DENOM, VALIDATORS};
use mesh_types::Uint128;
use tracing_test::traced_test;

const VALIDATOR: &str = VALIDATORS[0];

fn staked_setup(owners: &[&str], amounts: &[u128]) -> MeshSetup {
    let mut setup = MeshSetup::new(MeshConfig::default().with_owners(owners)).unwrap();
    for (owner, amount) in setup.owners.clone().iter().zip(amounts) {
        setup.bond(owner, *amount).unwrap();
        setup.grant(owner, *amount, VALIDATOR).unwrap();
    }
    setup.relay().unwrap();
    setup
}

/// The transfer and the accounting packet, each acknowledged.
fn reward_relay() -> RelayInfo {
    RelayInfo {
        packets_from_a: 2,
        acks_from_b: 2,
        ..Default::default()
    }
}

#[traced_test]
#[test]
fn test_rewards_reach_provider_delegators() {
    let mut setup = staked_setup(&["alice", "bob"], &[300_000, 100_000]);
    let (alice, bob) = (setup.owners[0].clone(), setup.owners[1].clone());

    setup.distribute_rewards(VALIDATOR, 4_000).unwrap();
    // Funds left the consumer into ICS20 escrow
    assert!(setup
        .consumer_chain
        .balance(&setup.consumer, CONSUMER_DENOM)
        .is_zero());
    assert_eq!(
        setup.consumer_chain.balance(
            &escrow_address(&setup.transfer_channel.a.channel_id),
            CONSUMER_DENOM
        ),
        Uint128::new(4_000)
    );

    assert_eq!(setup.relay().unwrap(), reward_relay());
    let voucher = setup.reward_voucher();
    assert_eq!(
        setup.provider_chain.balance(&setup.provider, &voucher),
        Uint128::new(4_000)
    );

    setup.claim_rewards(&alice).unwrap();
    setup.claim_rewards(&bob).unwrap();
    assert_eq!(
        setup.provider_chain.balance(&alice, &voucher),
        Uint128::new(3_000)
    );
    assert_eq!(
        setup.provider_chain.balance(&bob, &voucher),
        Uint128::new(1_000)
    );
    assert!(setup
        .provider_chain
        .balance(&setup.provider, &voucher)
        .is_zero());

    // Claiming again pays nothing
    setup.claim_rewards(&alice).unwrap();
    assert_eq!(
        setup.provider_chain.balance(&alice, &voucher),
        Uint128::new(3_000)
    );
}

#[traced_test]
#[test]
fn test_rewards_without_stakers_are_undistributed() {
    let mut setup = staked_setup(&["alice"], &[10_000]);
    let alice = setup.owners[0].clone();
    setup.unstake(&alice, 10_000, VALIDATOR).unwrap();
    // Meta-staking still holds the delegation until the unstake lands
    setup.distribute_rewards(VALIDATOR, 500).unwrap();
    setup.relay().unwrap();

    let state = setup.provider_validator(VALIDATOR).unwrap();
    assert_eq!(state.undistributed, Uint128::new(500));
    assert!(state.reward_index.is_zero());
    assert!(setup.meta_delegation(VALIDATOR).unwrap().is_zero());
}

#[traced_test]
#[test]
fn test_dropped_reward_packets_are_retried() {
    let mut setup = staked_setup(&["alice"], &[200_000]);
    let alice = setup.owners[0].clone();

    setup.distribute_rewards(VALIDATOR, 1_000).unwrap();
    setup
        .link
        .set_network(NetworkConfig::reliable().with_drop_probability(1.0));
    assert!(setup.relay().unwrap().is_empty());
    assert_eq!(setup.link.backlog_len(), 2);

    // Both the transfer and the accounting packet time out
    setup.advance_time(3_600);
    setup.link.set_network(NetworkConfig::reliable());
    assert_eq!(
        setup.relay().unwrap(),
        RelayInfo {
            timeouts: 2,
            ..Default::default()
        }
    );
    assert_eq!(
        setup
            .consumer_chain
            .balance(&setup.consumer, CONSUMER_DENOM),
        Uint128::new(1_000)
    );
    assert_eq!(
        setup.parked_rewards().unwrap().rewards,
        vec![ValidatorReward {
            validator: VALIDATOR.to_string(),
            amount: Uint128::new(1_000),
        }]
    );
    // Nothing arrived, so nothing can be claimed
    setup.claim_rewards(&alice).unwrap();
    assert!(setup
        .provider_chain
        .balance(&alice, &setup.reward_voucher())
        .is_zero());

    let keeper = setup.consumer_chain.addr("keeper");
    let consumer = setup.consumer.clone();
    setup
        .consumer_chain
        .execute(&keeper, &consumer, &ConsumerExecuteMsg::RetryRewards {}, &[])
        .unwrap();
    assert_eq!(setup.relay().unwrap(), reward_relay());
    assert!(setup.parked_rewards().unwrap().rewards.is_empty());

    setup.claim_rewards(&alice).unwrap();
    assert_eq!(
        setup
            .provider_chain
            .balance(&alice, &setup.reward_voucher()),
        Uint128::new(1_000)
    );
}

#[traced_test]
#[test]
fn test_parked_rewards_join_next_distribution() {
    let mut setup = staked_setup(&["alice"], &[200_000]);
    let alice = setup.owners[0].clone();

    setup.distribute_rewards(VALIDATOR, 600).unwrap();
    setup
        .link
        .set_network(NetworkConfig::reliable().with_drop_probability(1.0));
    setup.relay().unwrap();
    setup.advance_time(3_600);
    setup.link.set_network(NetworkConfig::reliable());
    setup.relay().unwrap();

    // Refunded funds stay put; the parked accounting rides along with the
    // next distribution, which only transfers its own funds
    setup.distribute_rewards(VALIDATOR, 400).unwrap();
    setup.relay().unwrap();
    assert!(setup.parked_rewards().unwrap().rewards.is_empty());
    assert_eq!(
        setup
            .consumer_chain
            .balance(&setup.consumer, CONSUMER_DENOM),
        Uint128::new(600)
    );

    // Accounting credited 1000 but only 400 arrived: the claim waits for funds
    let err = setup.claim_rewards(&alice).unwrap_err();
    assert!(matches!(
        err.contract_error(),
        Some(ContractError::InsufficientRewardFunds { .. })
    ));

    let keeper = setup.consumer_chain.addr("keeper");
    let consumer = setup.consumer.clone();
    setup
        .consumer_chain
        .execute(&keeper, &consumer, &ConsumerExecuteMsg::RetryRewards {}, &[])
        .unwrap();
    setup.relay().unwrap();
    setup.claim_rewards(&alice).unwrap();
    assert_eq!(
        setup
            .provider_chain
            .balance(&alice, &setup.reward_voucher()),
        Uint128::new(1_000)
    );
}
