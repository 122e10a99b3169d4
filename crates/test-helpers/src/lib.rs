//! Two-chain mesh security fixture.
//!
//! Builds a provider chain (`osmo`) running the lockup, provider and slasher
//! contracts and a consumer chain (`juno`) running meta-staking and the
//! consumer, connects them, opens the ICS20 and cross-stake channels and
//! relays the initial validator list.
//!
//! ```text
//!   juno (link side A)                          osmo (link side B)
//!   consumer ═══ cross-stake channel ══════════ provider ── lockup
//!   meta-staking                                slasher
//!   transfer  ═══ ICS20 channel ═══════════════ transfer
//! ```
//!
//! The consumer initiates the cross-stake handshake, so the consumer chain
//! is side A of the [`Link`]: `packets_from_b` counts provider packets.

use mesh_core::ChannelOrder;
use mesh_messages::consumer::{
    InstantiateMsg as ConsumerInstantiateMsg, ParkedRewardsResponse, ProviderInfo,
    QueryMsg as ConsumerQueryMsg, StakesResponse,
};
use mesh_messages::lockup::{
    BalanceResponse, ExecuteMsg as LockupExecuteMsg, InstantiateMsg as LockupInstantiateMsg,
    QueryMsg as LockupQueryMsg,
};
use mesh_messages::meta_staking::{
    ConsumerInfo as MetaConsumerInfo, Delegation, ExecuteMsg as MetaExecuteMsg,
    InstantiateMsg as MetaInstantiateMsg, QueryMsg as MetaQueryMsg, SudoMsg as MetaSudoMsg,
};
use mesh_messages::provider::{
    AccountResponse, ConsumerInfo, ExecuteMsg as ProviderExecuteMsg,
    InstantiateMsg as ProviderInstantiateMsg, QueryMsg as ProviderQueryMsg, SlasherInfo,
    ValidatorResponse,
};
use mesh_messages::slasher::InstantiateMsg as SlasherInstantiateMsg;
use mesh_messages::{to_binary, IBC_APP_VERSION};
use mesh_simulation::{
    Chain, ChainConfig, ChannelPair, HostError, Link, NetworkConfig, RelayInfo, ICS20_VERSION,
};
use mesh_types::{coin, Addr, Decimal, PortId, Uint128};
use tracing::info;

pub const PROVIDER_CHAIN_ID: &str = "osmo-test";
pub const PROVIDER_DENOM: &str = "uosmo";
pub const CONSUMER_CHAIN_ID: &str = "juno-test";
pub const CONSUMER_DENOM: &str = "ujuno";
pub const VALIDATORS: [&str; 2] = ["junovaloper1alpha", "junovaloper1beta"];
pub const UNBONDING_PERIOD: u64 = 604_800;
/// Provider collateral every owner account starts with.
pub const OWNER_BALANCE: u128 = 10_000_000;

/// Knobs of the fixture.
#[derive(Clone, Debug)]
pub struct MeshConfig {
    /// Consumer native units per provider unit.
    pub exchange_rate: Decimal,
    /// Funds meta-staking may stake on behalf of the consumer.
    pub staking_capacity: u128,
    pub unbonding_period: u64,
    /// Seconds before a mesh packet times out; `None` keeps the default.
    pub packet_lifetime: Option<u64>,
    /// Fault model applied once the channels are open.
    pub network: NetworkConfig,
    /// Names of the funded owner accounts on the provider chain.
    pub owners: Vec<String>,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            exchange_rate: Decimal::one(),
            staking_capacity: 1_000_000,
            unbonding_period: UNBONDING_PERIOD,
            packet_lifetime: None,
            network: NetworkConfig::reliable(),
            owners: vec!["owner".to_string()],
        }
    }
}

impl MeshConfig {
    pub fn with_exchange_rate(mut self, rate: Decimal) -> Self {
        self.exchange_rate = rate;
        self
    }

    pub fn with_staking_capacity(mut self, capacity: u128) -> Self {
        self.staking_capacity = capacity;
        self
    }

    pub fn with_packet_lifetime(mut self, seconds: u64) -> Self {
        self.packet_lifetime = Some(seconds);
        self
    }

    pub fn with_network(mut self, network: NetworkConfig) -> Self {
        self.network = network;
        self
    }

    pub fn with_owners(mut self, owners: &[&str]) -> Self {
        self.owners = owners.iter().map(|o| o.to_string()).collect();
        self
    }
}

/// Both chains, the link between them and every contract address.
pub struct MeshSetup {
    pub consumer_chain: Chain,
    pub provider_chain: Chain,
    pub link: Link,
    pub lockup: Addr,
    pub provider: Addr,
    pub slasher: Addr,
    pub meta_staking: Addr,
    pub consumer: Addr,
    /// Governance account on the provider chain; owns the slasher.
    pub admin: Addr,
    pub owners: Vec<Addr>,
    /// Side A is the consumer end.
    pub mesh_channel: ChannelPair,
    /// Side A is the consumer chain's transfer end.
    pub transfer_channel: ChannelPair,
}

impl std::fmt::Debug for MeshSetup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MeshSetup")
            .field("lockup", &self.lockup)
            .field("provider", &self.provider)
            .field("slasher", &self.slasher)
            .field("meta_staking", &self.meta_staking)
            .field("consumer", &self.consumer)
            .field("admin", &self.admin)
            .field("owners", &self.owners)
            .field("mesh_channel", &self.mesh_channel)
            .field("transfer_channel", &self.transfer_channel)
            .finish_non_exhaustive()
    }
}

impl MeshSetup {
    /// Build both chains, deploy the contracts and open the channels.
    /// At least one owner is required.
    pub fn new(config: MeshConfig) -> Result<Self, HostError> {
        if config.owners.is_empty() {
            return Err(HostError::InvalidSetup("no owner accounts".into()));
        }
        let mut provider_chain =
            Chain::new(ChainConfig::new(PROVIDER_CHAIN_ID, "osmo", PROVIDER_DENOM));
        let mut consumer_chain = Chain::new(
            ChainConfig::new(CONSUMER_CHAIN_ID, "juno", CONSUMER_DENOM).with_validators(&VALIDATORS),
        );

        let lockup_code = provider_chain.store_code("lockup", mesh_lockup::instantiate);
        let provider_code = provider_chain.store_code("provider", mesh_provider::instantiate);
        let slasher_code =
            provider_chain.store_code("slasher", mesh_provider::slasher::instantiate);
        let meta_code = consumer_chain.store_code("meta-staking", mesh_meta_staking::instantiate);
        let consumer_code = consumer_chain.store_code("consumer", mesh_consumer::instantiate);

        let mut link = Link::connect(
            &mut consumer_chain,
            &mut provider_chain,
            NetworkConfig::reliable(),
        );
        let transfer = PortId::transfer();
        let transfer_channel = link.create_channel(
            &mut consumer_chain,
            &mut provider_chain,
            &transfer,
            &transfer,
            ICS20_VERSION,
            ChannelOrder::Unordered,
        )?;

        let admin = provider_chain.addr("admin");
        let lockup = provider_chain.instantiate(
            lockup_code,
            &admin,
            &LockupInstantiateMsg {
                denom: PROVIDER_DENOM.to_string(),
            },
            &[],
            "lockup",
        )?;
        let slasher_msg = to_binary(&SlasherInstantiateMsg {
            owner: admin.to_string(),
        })?;
        let provider = provider_chain.instantiate(
            provider_code,
            &admin,
            &ProviderInstantiateMsg {
                consumer: ConsumerInfo {
                    connection_id: link.connection_b().clone(),
                },
                slasher: Some(SlasherInfo {
                    code_id: slasher_code,
                    msg: slasher_msg,
                }),
                lockup: lockup.to_string(),
                unbonding_period: config.unbonding_period,
                packet_lifetime: config.packet_lifetime,
            },
            &[],
            "provider",
        )?;
        let slasher = provider_chain
            .query::<_, mesh_messages::provider::ConfigResponse>(
                &provider,
                &ProviderQueryMsg::Config {},
            )?
            .slasher
            .map(Addr::unchecked)
            .ok_or_else(|| HostError::UnknownContract(Addr::unchecked("slasher")))?;

        let gov = consumer_chain.addr("gov");
        let meta_staking = consumer_chain.instantiate(
            meta_code,
            &gov,
            &MetaInstantiateMsg {},
            &[],
            "meta-staking",
        )?;
        let consumer = consumer_chain.instantiate(
            consumer_code,
            &gov,
            &ConsumerInstantiateMsg {
                provider: ProviderInfo {
                    port_id: PortId::for_contract(&provider),
                    connection_id: link.connection_a().clone(),
                },
                remote_to_local_exchange_rate: config.exchange_rate,
                meta_staking_contract_address: meta_staking.to_string(),
                ics20_channel: transfer_channel.a.channel_id.clone(),
                packet_lifetime: config.packet_lifetime,
            },
            &[],
            "consumer",
        )?;
        consumer_chain.mint(&meta_staking, coin(config.staking_capacity, CONSUMER_DENOM))?;
        consumer_chain.sudo(
            &meta_staking,
            &MetaSudoMsg::AddConsumer {
                consumer_address: consumer.to_string(),
                funds_available_for_staking: coin(config.staking_capacity, CONSUMER_DENOM),
            },
        )?;

        let mesh_channel = link.create_channel(
            &mut consumer_chain,
            &mut provider_chain,
            &PortId::for_contract(&consumer),
            &PortId::for_contract(&provider),
            IBC_APP_VERSION,
            ChannelOrder::Unordered,
        )?;
        // Deliver the provider's validator list request
        link.relay_all(&mut consumer_chain, &mut provider_chain)?;
        link.set_network(config.network);

        let mut owners = Vec::with_capacity(config.owners.len());
        for name in &config.owners {
            let owner = provider_chain.addr(name);
            provider_chain.mint(&owner, coin(OWNER_BALANCE, PROVIDER_DENOM))?;
            owners.push(owner);
        }

        info!(
            %lockup,
            %provider,
            %consumer,
            %meta_staking,
            mesh_channel = %mesh_channel.b.channel_id,
            "Mesh setup complete"
        );
        Ok(Self {
            consumer_chain,
            provider_chain,
            link,
            lockup,
            provider,
            slasher,
            meta_staking,
            consumer,
            admin,
            owners,
            mesh_channel,
            transfer_channel,
        })
    }

    /// First owner account; [`MeshSetup::new`] refuses an empty list.
    pub fn owner(&self) -> &Addr {
        &self.owners[0]
    }

    pub fn relay(&mut self) -> Result<RelayInfo, HostError> {
        self.link
            .relay_all(&mut self.consumer_chain, &mut self.provider_chain)
    }

    /// Advance both chains by the same amount of time.
    pub fn advance_time(&mut self, seconds: u64) {
        self.provider_chain.advance_time(seconds);
        self.consumer_chain.advance_time(seconds);
    }

    pub fn close_mesh_channel(&mut self) -> Result<(), HostError> {
        let channel = self.mesh_channel.clone();
        self.link
            .close_channel(&mut self.consumer_chain, &mut self.provider_chain, &channel)
    }

    // ── Provider chain ─────────────────────────────────────────────────────

    pub fn bond(&mut self, owner: &Addr, amount: u128) -> Result<(), HostError> {
        self.provider_chain
            .execute(
                owner,
                &self.lockup,
                &LockupExecuteMsg::Bond {},
                &[coin(amount, PROVIDER_DENOM)],
            )
            .map(|_| ())
    }

    pub fn unbond_lockup(&mut self, owner: &Addr, amount: u128) -> Result<(), HostError> {
        self.provider_chain
            .execute(
                owner,
                &self.lockup,
                &LockupExecuteMsg::Unbond {
                    amount: Uint128::new(amount),
                },
                &[],
            )
            .map(|_| ())
    }

    /// Grant the provider a claim, which cross-stakes it.
    pub fn grant(&mut self, owner: &Addr, amount: u128, validator: &str) -> Result<(), HostError> {
        self.provider_chain
            .execute(
                owner,
                &self.lockup,
                &LockupExecuteMsg::GrantClaim {
                    leinholder: self.provider.to_string(),
                    amount: Uint128::new(amount),
                    validator: validator.to_string(),
                },
                &[],
            )
            .map(|_| ())
    }

    pub fn unstake(&mut self, owner: &Addr, amount: u128, validator: &str) -> Result<(), HostError> {
        self.provider_chain
            .execute(
                owner,
                &self.provider,
                &ProviderExecuteMsg::Unstake {
                    amount: Uint128::new(amount),
                    validator: validator.to_string(),
                },
                &[],
            )
            .map(|_| ())
    }

    /// Release matured unbonding entries back to the lockup.
    pub fn unbond(&mut self, owner: &Addr) -> Result<(), HostError> {
        self.provider_chain
            .execute(owner, &self.provider, &ProviderExecuteMsg::Unbond {}, &[])
            .map(|_| ())
    }

    pub fn claim_rewards(&mut self, owner: &Addr) -> Result<(), HostError> {
        self.provider_chain
            .execute(
                owner,
                &self.provider,
                &ProviderExecuteMsg::ClaimRewards { validator: None },
                &[],
            )
            .map(|_| ())
    }

    pub fn lockup_balance(&self, owner: &Addr) -> Result<BalanceResponse, HostError> {
        self.provider_chain.query(
            &self.lockup,
            &LockupQueryMsg::Balance {
                account: owner.to_string(),
            },
        )
    }

    pub fn provider_account(&self, owner: &Addr) -> Result<AccountResponse, HostError> {
        self.provider_chain.query(
            &self.provider,
            &ProviderQueryMsg::Account {
                address: owner.to_string(),
            },
        )
    }

    /// Confirmed provider-side stake of `owner` on `validator`.
    pub fn provider_stake(&self, owner: &Addr, validator: &str) -> Result<Uint128, HostError> {
        Ok(self
            .provider_account(owner)?
            .delegations
            .into_iter()
            .find(|d| d.validator == validator)
            .map(|d| d.staked)
            .unwrap_or_default())
    }

    /// Provider-side stake of `owner` on `validator` still awaiting its ack.
    pub fn provider_in_flight(&self, owner: &Addr, validator: &str) -> Result<Uint128, HostError> {
        Ok(self
            .provider_account(owner)?
            .delegations
            .into_iter()
            .find(|d| d.validator == validator)
            .map(|d| d.in_flight)
            .unwrap_or_default())
    }

    pub fn provider_validator(&self, validator: &str) -> Result<ValidatorResponse, HostError> {
        self.provider_chain.query(
            &self.provider,
            &ProviderQueryMsg::Validator {
                address: validator.to_string(),
            },
        )
    }

    // ── Consumer chain ─────────────────────────────────────────────────────

    /// Meta-staking delegation held for the consumer on `validator`.
    pub fn meta_delegation(&self, validator: &str) -> Result<Uint128, HostError> {
        let delegation: Delegation = self.consumer_chain.query(
            &self.meta_staking,
            &MetaQueryMsg::Delegation {
                consumer: self.consumer.to_string(),
                validator: validator.to_string(),
            },
        )?;
        Ok(delegation.delegation)
    }

    pub fn meta_consumer(&self) -> Result<MetaConsumerInfo, HostError> {
        let info: Option<MetaConsumerInfo> = self.consumer_chain.query(
            &self.meta_staking,
            &MetaQueryMsg::Consumer {
                address: self.consumer.to_string(),
            },
        )?;
        info.ok_or_else(|| HostError::UnknownContract(self.consumer.clone()))
    }

    /// Consumer-side stakes recorded for a provider key.
    pub fn consumer_stakes(&self, owner: &Addr) -> Result<StakesResponse, HostError> {
        self.consumer_chain.query(
            &self.consumer,
            &ConsumerQueryMsg::Stakes {
                key: owner.to_string(),
            },
        )
    }

    pub fn parked_rewards(&self) -> Result<ParkedRewardsResponse, HostError> {
        self.consumer_chain
            .query(&self.consumer, &ConsumerQueryMsg::ParkedRewards {})
    }

    /// Accrue staking rewards to meta-staking, withdraw them and forward the
    /// consumer's share to the provider. Packets are left for the relayer.
    pub fn distribute_rewards(&mut self, validator: &str, amount: u128) -> Result<(), HostError> {
        let keeper = self.consumer_chain.addr("keeper");
        self.consumer_chain
            .accrue_rewards(&self.meta_staking, validator, amount)?;
        self.consumer_chain.execute(
            &keeper,
            &self.meta_staking,
            &MetaExecuteMsg::WithdrawDelegatorReward {
                validator: validator.to_string(),
            },
            &[],
        )?;
        self.consumer_chain.execute(
            &keeper,
            &self.meta_staking,
            &MetaExecuteMsg::WithdrawAllToConsumer {
                consumer: self.consumer.to_string(),
            },
            &[],
        )?;
        Ok(())
    }

    /// Reward voucher denom on the provider chain.
    pub fn reward_voucher(&self) -> String {
        mesh_simulation::voucher_denom(&self.transfer_channel.b.channel_id, CONSUMER_DENOM)
    }
}
