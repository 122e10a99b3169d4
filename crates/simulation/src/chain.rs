//! A simulated chain: bank, staking, contracts and an IBC host.
//!
//! Every public entry point is one transaction. The whole state lives in
//! persistent maps, so a transaction snapshots it up front and restores the
//! snapshot on failure; nothing a failed transaction did survives. The same
//! mechanism reverts a failed submessage when its caller asked for a reply
//! on error, and reverts a failed packet receive before the error ack is
//! written.
//!
//! ```text
//!   execute ──▶ Contract::handle ──▶ Response.actions ──▶ dispatch
//!                    ▲                                       │
//!                    └──────── Reply / nested Execute ◀──────┘
//! ```

use crate::bank::Bank;
use crate::ibc::{ChannelEnd, ChannelState, IbcHost};
use crate::ics20::{Ics20, ICS20_VERSION};
use crate::staking::Staking;
use crate::HostError;
use im::OrdMap;
use mesh_core::{
    Action, BlockInfo, ChannelConnectMsg, ChannelOpenMsg, ChannelOrder, Contract, ContractError,
    Env, Event, IbcChannel, IbcEndpoint, IbcPacket, InstantiateFn, MessageInfo, Querier, ReplyOn,
    Response, SubMsgResponse,
};
use mesh_messages::{from_binary, to_binary, Acknowledgement, Binary};
use mesh_types::{Addr, ChannelId, Coin, ConnectionId, PortId, Sequence, Timestamp, Uint128};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, trace, warn};

/// Nested dispatch deeper than this aborts the transaction.
const MAX_CALL_DEPTH: usize = 16;

/// Static parameters of a chain.
#[derive(Clone, Debug)]
pub struct ChainConfig {
    pub chain_id: String,
    /// Bech32-style prefix used for generated addresses.
    pub prefix: String,
    pub bonded_denom: String,
    pub validators: Vec<String>,
    pub genesis_time: Timestamp,
    /// Seconds between blocks.
    pub block_time: u64,
}

impl ChainConfig {
    pub fn new(
        chain_id: impl Into<String>,
        prefix: impl Into<String>,
        bonded_denom: impl Into<String>,
    ) -> Self {
        Self {
            chain_id: chain_id.into(),
            prefix: prefix.into(),
            bonded_denom: bonded_denom.into(),
            validators: Vec::new(),
            genesis_time: Timestamp::from_seconds(1_700_000_000),
            block_time: 5,
        }
    }

    pub fn with_validators(mut self, validators: &[&str]) -> Self {
        self.validators = validators.iter().map(|v| v.to_string()).collect();
        self
    }

    pub fn with_genesis_time(mut self, time: Timestamp) -> Self {
        self.genesis_time = time;
        self
    }

    pub fn with_block_time(mut self, seconds: u64) -> Self {
        self.block_time = seconds;
        self
    }
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self::new("testing", "cosmos", "stake").with_validators(&["validator1"])
    }
}

struct Code {
    name: &'static str,
    instantiate: InstantiateFn,
}

#[derive(Clone)]
struct ChainState {
    bank: Bank,
    staking: Staking,
    contracts: OrdMap<Addr, Box<dyn Contract>>,
    ibc: IbcHost,
    ics20: Ics20,
    next_contract: u64,
}

/// What an entry point and everything it triggered produced for the host.
#[derive(Debug, Default)]
struct Execution {
    ack: Option<Acknowledgement>,
    data: Option<Binary>,
}

struct ChainQuerier<'a> {
    state: &'a ChainState,
    block: &'a BlockInfo,
}

impl Querier for ChainQuerier<'_> {
    fn balance(&self, address: &Addr, denom: &str) -> Uint128 {
        self.state.bank.balance(address, denom)
    }

    fn bonded_denom(&self) -> String {
        self.state.staking.denom().to_string()
    }

    fn validators(&self) -> Vec<String> {
        self.state.staking.validators()
    }

    fn delegation_rewards(&self, delegator: &Addr, validator: &str) -> Uint128 {
        self.state.staking.rewards(delegator, validator)
    }

    fn query_contract(&self, contract: &Addr, msg: &Binary) -> Result<Binary, ContractError> {
        // The executing contract is out of the map, so it cannot query itself
        let instance = self
            .state
            .contracts
            .get(contract)
            .ok_or_else(|| ContractError::Query(format!("no contract at {contract}")))?;
        let env = Env {
            block: self.block.clone(),
            contract: contract.clone(),
        };
        instance.query(&env, self, msg)
    }

    fn ics20_counterparty(&self, channel: &ChannelId) -> Option<ChannelId> {
        self.state
            .ibc
            .channel(&PortId::transfer(), channel)
            .filter(|end| end.state == ChannelState::Open)
            .map(|end| end.counterparty.channel_id.clone())
    }
}

pub struct Chain {
    config: ChainConfig,
    block: BlockInfo,
    codes: Vec<Code>,
    state: ChainState,
}

impl Chain {
    pub fn new(config: ChainConfig) -> Self {
        info!(
            chain_id = %config.chain_id,
            denom = %config.bonded_denom,
            validators = config.validators.len(),
            "Chain created"
        );
        let block = BlockInfo {
            height: 1,
            time: config.genesis_time,
            chain_id: config.chain_id.clone(),
        };
        let state = ChainState {
            bank: Bank::default(),
            staking: Staking::new(config.bonded_denom.clone(), &config.validators),
            contracts: OrdMap::new(),
            ibc: IbcHost::default(),
            ics20: Ics20::default(),
            next_contract: 0,
        };
        Self {
            config,
            block,
            codes: Vec::new(),
            state,
        }
    }

    pub fn chain_id(&self) -> &str {
        &self.config.chain_id
    }

    pub fn bonded_denom(&self) -> &str {
        &self.config.bonded_denom
    }

    /// Address of a named user account on this chain.
    pub fn addr(&self, name: &str) -> Addr {
        Addr::unchecked(format!("{}1{}", self.config.prefix, name))
    }

    pub fn block(&self) -> &BlockInfo {
        &self.block
    }

    pub fn time(&self) -> Timestamp {
        self.block.time
    }

    /// Produce one block.
    pub fn next_block(&mut self) {
        self.advance_time(self.config.block_time);
    }

    /// Produce one block `seconds` after the current one.
    pub fn advance_time(&mut self, seconds: u64) {
        self.block.height += 1;
        self.block.time = self.block.time.plus_seconds(seconds);
        trace!(chain = %self.config.chain_id, height = self.block.height, time = %self.block.time, "Block");
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Genesis and inspection
    // ═══════════════════════════════════════════════════════════════════════

    /// Credit funds out of thin air.
    pub fn mint(&mut self, address: &Addr, coin: Coin) -> Result<(), HostError> {
        self.state.bank.mint(address, &coin)
    }

    pub fn balance(&self, address: &Addr, denom: &str) -> Uint128 {
        self.state.bank.balance(address, denom)
    }

    pub fn all_balances(&self, address: &Addr) -> Vec<Coin> {
        self.state.bank.all_balances(address)
    }

    pub fn delegation(&self, delegator: &Addr, validator: &str) -> Uint128 {
        self.state.staking.delegation(delegator, validator)
    }

    pub fn validators(&self) -> Vec<String> {
        self.state.staking.validators()
    }

    pub fn add_validator(&mut self, validator: &str) {
        self.state.staking.add_validator(validator);
    }

    /// Credit staking rewards to a delegation.
    pub fn accrue_rewards(
        &mut self,
        delegator: &Addr,
        validator: &str,
        amount: u128,
    ) -> Result<(), HostError> {
        self.state
            .staking
            .accrue(delegator, validator, Uint128::new(amount))
    }

    pub fn channel(&self, port_id: &PortId, channel_id: &ChannelId) -> Option<ChannelEnd> {
        self.state.ibc.channel(port_id, channel_id).cloned()
    }

    /// Packets sent but neither acknowledged nor timed out.
    pub fn pending_commitments(&self) -> usize {
        self.state.ibc.pending_commitments()
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Contracts
    // ═══════════════════════════════════════════════════════════════════════

    /// Register contract code and return its code id.
    pub fn store_code(&mut self, name: &'static str, instantiate: InstantiateFn) -> u64 {
        self.codes.push(Code { name, instantiate });
        let code_id = self.codes.len() as u64;
        debug!(chain = %self.config.chain_id, code_id, name, "Code stored");
        code_id
    }

    pub fn instantiate<M: Serialize>(
        &mut self,
        code_id: u64,
        sender: &Addr,
        msg: &M,
        funds: &[Coin],
        label: &str,
    ) -> Result<Addr, HostError> {
        let msg = to_binary(msg)?;
        self.transact(|chain| {
            chain
                .instantiate_contract(code_id, sender, &msg, funds.to_vec(), label, 0)
                .map(|(address, _)| address)
        })
    }

    pub fn execute<M: Serialize>(
        &mut self,
        sender: &Addr,
        contract: &Addr,
        msg: &M,
        funds: &[Coin],
    ) -> Result<Option<Binary>, HostError> {
        let msg = to_binary(msg)?;
        let action = Action::Execute {
            contract: contract.clone(),
            msg,
            funds: funds.to_vec(),
        };
        self.transact(|chain| chain.dispatch(sender, action, 0).map(|r| r.data))
    }

    /// Governance call into a contract.
    pub fn sudo<M: Serialize>(&mut self, contract: &Addr, msg: &M) -> Result<(), HostError> {
        let msg = to_binary(msg)?;
        self.transact(|chain| chain.run(contract, Event::Sudo { msg }, 0).map(|_| ()))
    }

    pub fn query<M: Serialize, R: DeserializeOwned>(
        &self,
        contract: &Addr,
        msg: &M,
    ) -> Result<R, HostError> {
        let querier = self.querier();
        let bytes = querier
            .query_contract(contract, &to_binary(msg)?)
            .map_err(|error| HostError::Contract {
                contract: contract.clone(),
                error,
            })?;
        Ok(from_binary(&bytes)?)
    }

    /// ICS20 transfer from a user account.
    pub fn transfer(
        &mut self,
        sender: &Addr,
        channel_id: &ChannelId,
        receiver: &str,
        amount: Coin,
        timeout: Timestamp,
    ) -> Result<(), HostError> {
        self.transact(|chain| {
            chain.send_transfer(sender, channel_id, receiver.to_string(), &amount, timeout)
        })
    }

    fn querier(&self) -> ChainQuerier<'_> {
        ChainQuerier {
            state: &self.state,
            block: &self.block,
        }
    }

    fn env(&self, contract: &Addr) -> Env {
        Env {
            block: self.block.clone(),
            contract: contract.clone(),
        }
    }

    fn transact<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, HostError>,
    ) -> Result<T, HostError> {
        let snapshot = self.state.clone();
        let result = f(self);
        if let Err(e) = &result {
            debug!(chain = %self.config.chain_id, error = %e, "Transaction reverted");
            self.state = snapshot;
        }
        result
    }

    fn next_address(&mut self, label: &str) -> Addr {
        let name: String = label
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_lowercase();
        let preferred = self.addr(&name);
        if !name.is_empty() && !self.state.contracts.contains_key(&preferred) {
            return preferred;
        }
        loop {
            let candidate = self.addr(&format!("contract{}", self.state.next_contract));
            self.state.next_contract += 1;
            if !self.state.contracts.contains_key(&candidate) {
                return candidate;
            }
        }
    }

    fn instantiate_contract(
        &mut self,
        code_id: u64,
        creator: &Addr,
        msg: &Binary,
        funds: Vec<Coin>,
        label: &str,
        depth: usize,
    ) -> Result<(Addr, Execution), HostError> {
        let code = code_id
            .checked_sub(1)
            .and_then(|index| self.codes.get(index as usize))
            .ok_or(HostError::UnknownCode(code_id))?;
        let (name, instantiate) = (code.name, code.instantiate);

        let address = self.next_address(label);
        self.state.bank.send(creator, &address, &funds)?;
        let env = self.env(&address);
        let info = MessageInfo {
            sender: creator.clone(),
            funds,
        };
        let (instance, response) =
            instantiate(&env, &self.querier(), info, msg).map_err(|error| HostError::Contract {
                contract: address.clone(),
                error,
            })?;
        info!(chain = %self.config.chain_id, %address, code = name, "Contract instantiated");
        self.state.contracts.insert(address.clone(), instance);

        let execution = self.process(&address, response, depth)?;
        Ok((address, execution))
    }

    /// Call one entry point of a contract.
    fn call(&mut self, contract: &Addr, event: Event) -> Result<Response, HostError> {
        let mut instance = self
            .state
            .contracts
            .remove(contract)
            .ok_or_else(|| HostError::UnknownContract(contract.clone()))?;
        let env = self.env(contract);
        let event_name = event.type_name();
        let result = instance.handle(&env, &self.querier(), event);
        self.state.contracts.insert(contract.clone(), instance);

        match result {
            Ok(response) => {
                trace!(
                    %contract,
                    event = event_name,
                    actions = response.actions.len(),
                    attributes = ?response.attributes,
                    "Contract call"
                );
                Ok(response)
            }
            Err(error) => {
                debug!(%contract, event = event_name, %error, "Contract call failed");
                Err(HostError::Contract {
                    contract: contract.clone(),
                    error,
                })
            }
        }
    }

    /// Call a contract and carry out everything its response asks for.
    fn run(&mut self, contract: &Addr, event: Event, depth: usize) -> Result<Execution, HostError> {
        if depth > MAX_CALL_DEPTH {
            return Err(HostError::CallDepthExceeded);
        }
        let response = self.call(contract, event)?;
        self.process(contract, response, depth)
    }

    fn process(
        &mut self,
        contract: &Addr,
        response: Response,
        depth: usize,
    ) -> Result<Execution, HostError> {
        let mut execution = Execution {
            ack: response.ack,
            data: response.data,
        };
        for action in response.actions {
            let Action::Submessage(sub) = action else {
                self.dispatch(contract, action, depth + 1)?;
                continue;
            };

            let snapshot = self.state.clone();
            let result = match self.dispatch(contract, *sub.action, depth + 1) {
                Ok(response) => Ok(response),
                Err(e) if matches!(sub.reply_on, ReplyOn::Always | ReplyOn::Error) => {
                    debug!(%contract, id = sub.id, error = %e, "Submessage failed, reverting it");
                    self.state = snapshot;
                    Err(e.reason())
                }
                Err(e) => return Err(e),
            };
            let reply = match sub.reply_on {
                ReplyOn::Always => true,
                ReplyOn::Success => result.is_ok(),
                ReplyOn::Error => result.is_err(),
            };
            if reply {
                let replied = self.run(contract, Event::Reply { id: sub.id, result }, depth + 1)?;
                if replied.ack.is_some() {
                    execution.ack = replied.ack;
                }
                if replied.data.is_some() {
                    execution.data = replied.data;
                }
            }
        }
        Ok(execution)
    }

    fn dispatch(
        &mut self,
        sender: &Addr,
        action: Action,
        depth: usize,
    ) -> Result<SubMsgResponse, HostError> {
        if depth > MAX_CALL_DEPTH {
            return Err(HostError::CallDepthExceeded);
        }
        trace!(%sender, action = action.type_name(), "Dispatch");
        let ChainState { bank, staking, ibc, .. } = &mut self.state;
        match action {
            Action::Execute {
                contract,
                msg,
                funds,
            } => {
                bank.send(sender, &contract, &funds)?;
                let info = MessageInfo {
                    sender: sender.clone(),
                    funds,
                };
                let execution = self.run(&contract, Event::Execute { info, msg }, depth)?;
                Ok(SubMsgResponse {
                    instantiated: None,
                    data: execution.data,
                })
            }
            Action::Instantiate {
                code_id,
                msg,
                label,
            } => {
                let (address, execution) =
                    self.instantiate_contract(code_id, sender, &msg, Vec::new(), &label, depth)?;
                Ok(SubMsgResponse {
                    instantiated: Some(address),
                    data: execution.data,
                })
            }
            Action::BankSend { to, amount } => {
                bank.send(sender, &to, &amount)?;
                Ok(SubMsgResponse::default())
            }
            Action::Burn { amount } => {
                for coin in &amount {
                    bank.burn(sender, coin)?;
                }
                Ok(SubMsgResponse::default())
            }
            Action::Delegate { validator, amount } => {
                staking.delegate(bank, sender, &validator, &amount)?;
                Ok(SubMsgResponse::default())
            }
            Action::Undelegate { validator, amount } => {
                staking.undelegate(bank, sender, &validator, &amount)?;
                Ok(SubMsgResponse::default())
            }
            Action::WithdrawDelegatorReward { validator } => {
                staking.withdraw_rewards(bank, sender, &validator)?;
                Ok(SubMsgResponse::default())
            }
            Action::SendPacket {
                channel_id,
                sequence,
                data,
                timeout,
            } => {
                ibc.send_packet(
                    &PortId::for_contract(sender),
                    &channel_id,
                    sequence,
                    data,
                    timeout,
                )?;
                Ok(SubMsgResponse::default())
            }
            Action::Transfer {
                channel_id,
                to_address,
                amount,
                timeout,
            } => {
                self.send_transfer(sender, &channel_id, to_address, &amount, timeout)?;
                Ok(SubMsgResponse::default())
            }
            Action::Submessage(sub) => self.dispatch(sender, *sub.action, depth),
        }
    }

    fn send_transfer(
        &mut self,
        sender: &Addr,
        channel_id: &ChannelId,
        receiver: String,
        amount: &Coin,
        timeout: Timestamp,
    ) -> Result<(), HostError> {
        let port = PortId::transfer();
        let sequence = self
            .state
            .ibc
            .channel_in_state(&port, channel_id, ChannelState::Open)?
            .next_sequence_send;
        let ChainState { bank, ics20, .. } = &mut self.state;
        let data = ics20.send(bank, sender, channel_id, amount, receiver)?;
        self.state
            .ibc
            .send_packet(&port, channel_id, sequence, data, timeout)?;
        info!(%sender, channel = %channel_id, amount = %amount.amount, denom = %amount.denom, "ICS20 transfer sent");
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // IBC handshake (driven by the relayer)
    // ═══════════════════════════════════════════════════════════════════════

    pub fn open_connection(&mut self, counterparty_chain: &str) -> ConnectionId {
        self.state.ibc.open_connection(counterparty_chain)
    }

    /// Route a handshake or close callback to the application on `port_id`.
    fn channel_callback(&mut self, port_id: &PortId, event: Event) -> Result<(), HostError> {
        if port_id == &PortId::transfer() {
            return match &event {
                Event::ChannelOpen(msg)
                    if msg.channel().version != ICS20_VERSION
                        || msg
                            .counterparty_version()
                            .is_some_and(|v| v != ICS20_VERSION) =>
                {
                    Err(HostError::Transfer(format!(
                        "invalid version {}",
                        msg.channel().version
                    )))
                }
                _ => Ok(()),
            };
        }
        let contract = contract_for_port(port_id)?;
        self.run(&contract, event, 0).map(|_| ())
    }

    pub fn chan_open_init(
        &mut self,
        port_id: &PortId,
        connection_id: &ConnectionId,
        counterparty_port: &PortId,
        version: &str,
        order: ChannelOrder,
    ) -> Result<ChannelId, HostError> {
        self.transact(|chain| {
            chain.state.ibc.connection(connection_id)?;
            let end = ChannelEnd {
                state: ChannelState::Init,
                order,
                version: version.to_string(),
                connection_id: connection_id.clone(),
                counterparty: IbcEndpoint {
                    port_id: counterparty_port.clone(),
                    channel_id: ChannelId::new(""),
                },
                next_sequence_send: Sequence::FIRST,
            };
            let channel = end.clone();
            let channel_id = chain.state.ibc.create_channel(port_id, end);
            let msg = ChannelOpenMsg::OpenInit {
                channel: channel.describe(port_id, &channel_id),
            };
            chain.channel_callback(port_id, Event::ChannelOpen(msg))?;
            debug!(chain = %chain.config.chain_id, port = %port_id, channel = %channel_id, "ChanOpenInit");
            Ok(channel_id)
        })
    }

    pub fn chan_open_try(
        &mut self,
        port_id: &PortId,
        connection_id: &ConnectionId,
        counterparty: &IbcEndpoint,
        counterparty_version: &str,
        order: ChannelOrder,
    ) -> Result<ChannelId, HostError> {
        self.transact(|chain| {
            chain.state.ibc.connection(connection_id)?;
            let end = ChannelEnd {
                state: ChannelState::TryOpen,
                order,
                version: counterparty_version.to_string(),
                connection_id: connection_id.clone(),
                counterparty: counterparty.clone(),
                next_sequence_send: Sequence::FIRST,
            };
            let channel = end.clone();
            let channel_id = chain.state.ibc.create_channel(port_id, end);
            let msg = ChannelOpenMsg::OpenTry {
                channel: channel.describe(port_id, &channel_id),
                counterparty_version: counterparty_version.to_string(),
            };
            chain.channel_callback(port_id, Event::ChannelOpen(msg))?;
            debug!(chain = %chain.config.chain_id, port = %port_id, channel = %channel_id, "ChanOpenTry");
            Ok(channel_id)
        })
    }

    pub fn chan_open_ack(
        &mut self,
        port_id: &PortId,
        channel_id: &ChannelId,
        counterparty_channel: &ChannelId,
        counterparty_version: &str,
    ) -> Result<(), HostError> {
        self.transact(|chain| {
            let mut end = chain
                .state
                .ibc
                .channel_in_state(port_id, channel_id, ChannelState::Init)?
                .clone();
            end.state = ChannelState::Open;
            end.counterparty.channel_id = counterparty_channel.clone();
            let channel = end.describe(port_id, channel_id);
            chain.state.ibc.update_channel(port_id, channel_id, end);
            let msg = ChannelConnectMsg::OpenAck {
                channel,
                counterparty_version: counterparty_version.to_string(),
            };
            chain.channel_callback(port_id, Event::ChannelConnect(msg))?;
            debug!(chain = %chain.config.chain_id, port = %port_id, channel = %channel_id, "ChanOpenAck");
            Ok(())
        })
    }

    pub fn chan_open_confirm(
        &mut self,
        port_id: &PortId,
        channel_id: &ChannelId,
    ) -> Result<(), HostError> {
        self.transact(|chain| {
            let mut end = chain
                .state
                .ibc
                .channel_in_state(port_id, channel_id, ChannelState::TryOpen)?
                .clone();
            end.state = ChannelState::Open;
            let channel = end.describe(port_id, channel_id);
            chain.state.ibc.update_channel(port_id, channel_id, end);
            chain.channel_callback(
                port_id,
                Event::ChannelConnect(ChannelConnectMsg::OpenConfirm { channel }),
            )?;
            debug!(chain = %chain.config.chain_id, port = %port_id, channel = %channel_id, "ChanOpenConfirm");
            Ok(())
        })
    }

    /// Close a channel end. Used for both the initiating and the confirming
    /// side.
    pub fn chan_close(&mut self, port_id: &PortId, channel_id: &ChannelId) -> Result<(), HostError> {
        self.transact(|chain| {
            let mut end = chain
                .state
                .ibc
                .channel_in_state(port_id, channel_id, ChannelState::Open)?
                .clone();
            end.state = ChannelState::Closed;
            let channel: IbcChannel = end.describe(port_id, channel_id);
            chain.state.ibc.update_channel(port_id, channel_id, end);
            chain.channel_callback(port_id, Event::ChannelClose { channel })?;
            info!(chain = %chain.config.chain_id, port = %port_id, channel = %channel_id, "Channel closed");
            Ok(())
        })
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Packets (driven by the relayer)
    // ═══════════════════════════════════════════════════════════════════════

    pub fn drain_packets(&mut self, connection_id: &ConnectionId) -> Vec<IbcPacket> {
        self.state.ibc.drain_outbox(connection_id)
    }

    pub fn has_receipt(&self, packet: &IbcPacket) -> bool {
        self.state.ibc.has_receipt(packet)
    }

    pub fn has_commitment(&self, packet: &IbcPacket) -> bool {
        self.state.ibc.has_commitment(packet)
    }

    /// Whether `packet`, addressed to this chain, can only time out: it was
    /// never received and either its deadline passed or its channel closed.
    pub fn packet_expired(&self, packet: &IbcPacket) -> bool {
        if self.has_receipt(packet) {
            return false;
        }
        let closed = self
            .state
            .ibc
            .channel(&packet.dest.port_id, &packet.dest.channel_id)
            .is_some_and(|end| end.state == ChannelState::Closed);
        closed || self.block.time >= packet.timeout
    }

    /// Deliver a packet and return the acknowledgement written for it.
    ///
    /// An application failure is not an error here: its effects are
    /// reverted and the failure becomes an error acknowledgement.
    pub fn receive_packet(&mut self, packet: &IbcPacket) -> Result<Acknowledgement, HostError> {
        let end = self.state.ibc.channel_in_state(
            &packet.dest.port_id,
            &packet.dest.channel_id,
            ChannelState::Open,
        )?;
        if end.counterparty != packet.src {
            return Err(HostError::UnknownChannel {
                port: packet.src.port_id.clone(),
                channel: packet.src.channel_id.clone(),
            });
        }
        if self.block.time >= packet.timeout {
            return Err(HostError::PacketTimedOut {
                channel: packet.dest.channel_id.clone(),
                sequence: packet.sequence,
            });
        }
        self.state.ibc.record_receipt(packet);

        if packet.dest.port_id == PortId::transfer() {
            let ChainState { bank, ics20, .. } = &mut self.state;
            return Ok(ics20.receive(bank, packet));
        }

        let contract = contract_for_port(&packet.dest.port_id)?;
        let snapshot = self.state.clone();
        let event = Event::PacketReceive {
            packet: packet.clone(),
        };
        let ack = match self.run(&contract, event, 0) {
            Ok(Execution { ack: Some(ack), .. }) => ack,
            Ok(Execution { ack: None, .. }) => {
                warn!(%contract, sequence = %packet.sequence, "Receive wrote no acknowledgement");
                Acknowledgement::error("no acknowledgement written")
            }
            Err(e) => {
                warn!(%contract, sequence = %packet.sequence, error = %e, "Packet receive failed");
                self.state = snapshot;
                Acknowledgement::error(e.reason())
            }
        };
        debug!(
            chain = %self.config.chain_id,
            channel = %packet.dest.channel_id,
            sequence = %packet.sequence,
            success = ack.is_success(),
            "Packet received"
        );
        Ok(ack)
    }

    pub fn acknowledge_packet(
        &mut self,
        packet: &IbcPacket,
        ack: &Acknowledgement,
    ) -> Result<(), HostError> {
        self.transact(|chain| {
            chain.state.ibc.take_commitment(packet)?;
            if packet.src.port_id == PortId::transfer() {
                let ChainState { bank, ics20, .. } = &mut chain.state;
                return ics20.on_ack(bank, packet, ack);
            }
            let contract = contract_for_port(&packet.src.port_id)?;
            let event = Event::PacketAck {
                packet: packet.clone(),
                ack: ack.clone(),
            };
            chain.run(&contract, event, 0).map(|_| ())
        })
    }

    pub fn timeout_packet(&mut self, packet: &IbcPacket) -> Result<(), HostError> {
        self.transact(|chain| {
            chain.state.ibc.take_commitment(packet)?;
            if packet.src.port_id == PortId::transfer() {
                let ChainState { bank, ics20, .. } = &mut chain.state;
                return ics20.refund(bank, packet);
            }
            let contract = contract_for_port(&packet.src.port_id)?;
            let event = Event::PacketTimeout {
                packet: packet.clone(),
            };
            chain.run(&contract, event, 0).map(|_| ())
        })
    }
}

fn contract_for_port(port_id: &PortId) -> Result<Addr, HostError> {
    port_id
        .as_str()
        .strip_prefix("wasm.")
        .map(Addr::unchecked)
        .ok_or_else(|| HostError::UnknownPort(port_id.clone()))
}
