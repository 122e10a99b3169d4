//! Lockup contract state machine.

use crate::state::Balance;
use im::OrdMap;
use mesh_core::{Action, Contract, ContractError, Env, Event, MessageInfo, Querier, Response};
use mesh_messages::lockup::{
    BalanceResponse, ConfigResponse, ExecuteMsg, InstantiateMsg, LeinResponse, QueryMsg,
};
use mesh_messages::provider::ExecuteMsg as ProviderExecuteMsg;
use mesh_messages::{from_binary, to_binary, Binary};
use cw_utils::must_pay;
use mesh_types::{coins, Addr, Uint128};
use tracing::{debug, info};

/// Create a lockup contract.
pub fn instantiate(
    _env: &Env,
    _querier: &dyn Querier,
    _info: MessageInfo,
    msg: &Binary,
) -> Result<(Box<dyn Contract>, Response), ContractError> {
    let msg: InstantiateMsg = from_binary(msg)?;
    info!(denom = %msg.denom, "Lockup instantiated");
    let contract = LockupContract {
        denom: msg.denom.clone(),
        balances: OrdMap::new(),
    };
    let response = Response::new()
        .add_attribute("action", "instantiate")
        .add_attribute("denom", msg.denom);
    Ok((Box::new(contract), response))
}

/// Bonded collateral and the claims staking contracts hold against it.
#[derive(Debug, Clone)]
pub struct LockupContract {
    denom: String,
    balances: OrdMap<Addr, Balance>,
}

impl LockupContract {
    fn balance(&self, owner: &Addr) -> Balance {
        self.balances.get(owner).cloned().unwrap_or_default()
    }

    fn execute(&mut self, info: MessageInfo, msg: ExecuteMsg) -> Result<Response, ContractError> {
        match msg {
            ExecuteMsg::Bond {} => self.bond(info),
            ExecuteMsg::Unbond { amount } => self.unbond(info, amount),
            ExecuteMsg::GrantClaim {
                leinholder,
                amount,
                validator,
            } => self.grant_claim(info, Addr::unchecked(leinholder), amount, validator),
            ExecuteMsg::ReleaseClaim {
                owner,
                amount,
                validator,
            } => self.release_claim(info, Addr::unchecked(owner), amount, validator, false),
            ExecuteMsg::SlashClaim {
                owner,
                amount,
                validator,
            } => self.release_claim(info, Addr::unchecked(owner), amount, validator, true),
        }
    }

    fn bond(&mut self, info: MessageInfo) -> Result<Response, ContractError> {
        let amount = must_pay(&info, &self.denom)?;
        let mut balance = self.balance(&info.sender);
        balance.bonded = balance.bonded.checked_add(amount)?;
        info!(owner = %info.sender, %amount, bonded = %balance.bonded, "Bonded");
        self.balances.insert(info.sender, balance);

        Ok(Response::new()
            .add_attribute("action", "bond")
            .add_attribute("amount", amount))
    }

    fn unbond(&mut self, info: MessageInfo, amount: Uint128) -> Result<Response, ContractError> {
        let mut balance = self.balance(&info.sender);
        let free = balance.free()?;
        if amount > free {
            return Err(ContractError::InsufficientFreeBalance {
                free,
                requested: amount,
            });
        }
        balance.bonded = balance.bonded.checked_sub(amount)?;
        info!(owner = %info.sender, %amount, bonded = %balance.bonded, "Unbonded");
        self.balances.insert(info.sender.clone(), balance);

        Ok(Response::new()
            .add_action(Action::BankSend {
                to: info.sender,
                amount: coins(amount.u128(), self.denom.clone()),
            })
            .add_attribute("action", "unbond")
            .add_attribute("amount", amount))
    }

    fn grant_claim(
        &mut self,
        info: MessageInfo,
        leinholder: Addr,
        amount: Uint128,
        validator: String,
    ) -> Result<Response, ContractError> {
        let mut balance = self.balance(&info.sender);
        let free = balance.free()?;
        if amount.is_zero() || amount > free {
            return Err(ContractError::InsufficientFreeBalance {
                free,
                requested: amount,
            });
        }
        balance.add_claim(&leinholder, &validator, amount)?;
        info!(
            owner = %info.sender,
            leinholder = %leinholder,
            validator = %validator,
            %amount,
            "Granted claim"
        );
        self.balances.insert(info.sender.clone(), balance);

        let notify = Action::execute(
            &leinholder,
            &ProviderExecuteMsg::ReceiveClaim {
                owner: info.sender.into_string(),
                amount,
                validator: validator.clone(),
            },
            vec![],
        )?;

        Ok(Response::new()
            .add_action(notify)
            .add_attribute("action", "grant_claim")
            .add_attribute("leinholder", leinholder)
            .add_attribute("validator", validator)
            .add_attribute("amount", amount))
    }

    /// Release (or slash) part of the claim the sender holds on `owner`.
    fn release_claim(
        &mut self,
        info: MessageInfo,
        owner: Addr,
        amount: Uint128,
        validator: String,
        slash: bool,
    ) -> Result<Response, ContractError> {
        let mut balance = self.balance(&owner);
        let held = balance
            .claim(&info.sender, &validator)
            .map(|lein| lein.amount)
            .ok_or_else(|| ContractError::UnknownClaim {
                validator: validator.clone(),
            })?;
        if amount > held {
            return Err(ContractError::InsufficientClaim {
                available: held,
                requested: amount,
            });
        }
        balance.reduce_claim(&info.sender, &validator, amount)?;

        let mut response = Response::new()
            .add_attribute("owner", &owner)
            .add_attribute("validator", &validator)
            .add_attribute("amount", amount);
        if slash {
            balance.bonded = balance.bonded.checked_sub(amount)?;
            info!(owner = %owner, validator = %validator, %amount, "Slashed claim");
            response = response.add_attribute("action", "slash_claim");
            if !amount.is_zero() {
                response = response.add_action(Action::Burn {
                    amount: coins(amount.u128(), self.denom.clone()),
                });
            }
        } else {
            debug!(owner = %owner, validator = %validator, %amount, "Released claim");
            response = response.add_attribute("action", "release_claim");
        }
        self.balances.insert(owner, balance);
        Ok(response)
    }

    fn query_balance(&self, account: &str) -> Result<BalanceResponse, ContractError> {
        let balance = self.balance(&Addr::unchecked(account));
        Ok(BalanceResponse {
            bonded: balance.bonded,
            free: balance.free()?,
            claims: balance
                .claims
                .iter()
                .map(|lein| LeinResponse {
                    leinholder: lein.leinholder.to_string(),
                    validator: lein.validator.clone(),
                    amount: lein.amount,
                })
                .collect(),
        })
    }
}

impl Contract for LockupContract {
    fn name(&self) -> &'static str {
        "lockup"
    }

    fn handle(
        &mut self,
        _env: &Env,
        _querier: &dyn Querier,
        event: Event,
    ) -> Result<Response, ContractError> {
        match event {
            Event::Execute { info, msg } => self.execute(info, from_binary(&msg)?),
            other => Err(ContractError::Unsupported(other.type_name())),
        }
    }

    fn query(
        &self,
        _env: &Env,
        _querier: &dyn Querier,
        msg: &Binary,
    ) -> Result<Binary, ContractError> {
        let bytes = match from_binary(msg)? {
            QueryMsg::Config {} => to_binary(&ConfigResponse {
                denom: self.denom.clone(),
            })?,
            QueryMsg::Balance { account } => to_binary(&self.query_balance(&account)?)?,
        };
        Ok(bytes)
    }

    fn box_clone(&self) -> Box<dyn Contract> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mesh_core::testing::{execute, mock_env, mock_info, query, MockQuerier};
    use mesh_messages::from_binary;
    use mesh_types::coin;
    use tracing_test::traced_test;

    const OWNER: &str = "osmo1owner";
    const PROVIDER: &str = "osmo1provider";

    fn setup() -> (Box<dyn Contract>, MockQuerier) {
        let querier = MockQuerier::new("uosmo");
        let msg = to_binary(&InstantiateMsg {
            denom: "uosmo".into(),
        })
        .unwrap();
        let (contract, _) = instantiate(
            &mock_env("lockup", 0),
            &querier,
            mock_info("creator", &[]),
            &msg,
        )
        .unwrap();
        (contract, querier)
    }

    fn balance(contract: &dyn Contract, querier: &MockQuerier) -> BalanceResponse {
        query(
            contract,
            &mock_env("lockup", 0),
            querier,
            &QueryMsg::Balance {
                account: OWNER.into(),
            },
        )
        .unwrap()
    }

    fn grant(amount: u128) -> ExecuteMsg {
        ExecuteMsg::GrantClaim {
            leinholder: PROVIDER.into(),
            amount: Uint128::new(amount),
            validator: "v1".into(),
        }
    }

    #[traced_test]
    #[test]
    fn test_bond_and_grant() {
        let (mut contract, querier) = setup();
        let env = mock_env("lockup", 0);
        execute(
            contract.as_mut(),
            &env,
            &querier,
            mock_info(OWNER, &[coin(500_000, "uosmo")]),
            &ExecuteMsg::Bond {},
        )
        .unwrap();

        let response = execute(
            contract.as_mut(),
            &env,
            &querier,
            mock_info(OWNER, &[]),
            &grant(500_000),
        )
        .unwrap();

        // Provider is told in the same transaction
        match &response.actions[..] {
            [Action::Execute { contract, msg, .. }] => {
                assert_eq!(contract.as_str(), PROVIDER);
                let msg: ProviderExecuteMsg = from_binary(msg).unwrap();
                assert_eq!(
                    msg,
                    ProviderExecuteMsg::ReceiveClaim {
                        owner: OWNER.into(),
                        amount: Uint128::new(500_000),
                        validator: "v1".into(),
                    }
                );
            }
            other => panic!("unexpected actions {other:?}"),
        }

        let balance = balance(contract.as_ref(), &querier);
        assert_eq!(balance.bonded, Uint128::new(500_000));
        assert_eq!(balance.free, Uint128::zero());
        assert_eq!(balance.claims.len(), 1);
    }

    #[test]
    fn test_grant_above_free_fails() {
        let (mut contract, querier) = setup();
        let env = mock_env("lockup", 0);
        execute(
            contract.as_mut(),
            &env,
            &querier,
            mock_info(OWNER, &[coin(100, "uosmo")]),
            &ExecuteMsg::Bond {},
        )
        .unwrap();
        execute(contract.as_mut(), &env, &querier, mock_info(OWNER, &[]), &grant(60)).unwrap();

        let err = execute(contract.as_mut(), &env, &querier, mock_info(OWNER, &[]), &grant(41))
            .unwrap_err();
        assert_eq!(
            err,
            ContractError::InsufficientFreeBalance {
                free: Uint128::new(40),
                requested: Uint128::new(41),
            }
        );
    }

    #[test]
    fn test_bond_wrong_denom() {
        let (mut contract, querier) = setup();
        let err = execute(
            contract.as_mut(),
            &mock_env("lockup", 0),
            &querier,
            mock_info(OWNER, &[coin(100, "ucosm")]),
            &ExecuteMsg::Bond {},
        )
        .unwrap_err();
        assert!(matches!(err, ContractError::InvalidFunds(_)));
    }

    #[test]
    fn test_release_and_slash_only_by_leinholder() {
        let (mut contract, querier) = setup();
        let env = mock_env("lockup", 0);
        execute(
            contract.as_mut(),
            &env,
            &querier,
            mock_info(OWNER, &[coin(1000, "uosmo")]),
            &ExecuteMsg::Bond {},
        )
        .unwrap();
        execute(contract.as_mut(), &env, &querier, mock_info(OWNER, &[]), &grant(1000)).unwrap();

        let release = ExecuteMsg::ReleaseClaim {
            owner: OWNER.into(),
            amount: Uint128::new(900),
            validator: "v1".into(),
        };
        let err = execute(contract.as_mut(), &env, &querier, mock_info("mallory", &[]), &release)
            .unwrap_err();
        assert!(matches!(err, ContractError::UnknownClaim { .. }));

        execute(contract.as_mut(), &env, &querier, mock_info(PROVIDER, &[]), &release).unwrap();
        let response = execute(
            contract.as_mut(),
            &env,
            &querier,
            mock_info(PROVIDER, &[]),
            &ExecuteMsg::SlashClaim {
                owner: OWNER.into(),
                amount: Uint128::new(100),
                validator: "v1".into(),
            },
        )
        .unwrap();
        assert!(matches!(response.actions[..], [Action::Burn { .. }]));

        let balance = balance(contract.as_ref(), &querier);
        assert_eq!(balance.bonded, Uint128::new(900));
        assert_eq!(balance.free, Uint128::new(900));
        assert!(balance.claims.is_empty());
    }

    #[test]
    fn test_unbond_respects_claims() {
        let (mut contract, querier) = setup();
        let env = mock_env("lockup", 0);
        execute(
            contract.as_mut(),
            &env,
            &querier,
            mock_info(OWNER, &[coin(1000, "uosmo")]),
            &ExecuteMsg::Bond {},
        )
        .unwrap();
        execute(contract.as_mut(), &env, &querier, mock_info(OWNER, &[]), &grant(700)).unwrap();

        let unbond = |amount| ExecuteMsg::Unbond {
            amount: Uint128::new(amount),
        };
        assert!(matches!(
            execute(contract.as_mut(), &env, &querier, mock_info(OWNER, &[]), &unbond(301)),
            Err(ContractError::InsufficientFreeBalance { .. })
        ));
        let response =
            execute(contract.as_mut(), &env, &querier, mock_info(OWNER, &[]), &unbond(300))
                .unwrap();
        assert_eq!(
            response.actions,
            vec![Action::BankSend {
                to: Addr::unchecked(OWNER),
                amount: vec![coin(300, "uosmo")],
            }]
        );
    }
}
