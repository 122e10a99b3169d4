//! Slasher contract.
//!
//! Created by the provider during its own instantiation; the provider is
//! therefore the sender of the instantiate message and the only target of
//! forwarded slashes.

use mesh_core::{Action, Contract, ContractError, Env, Event, MessageInfo, Querier, Response};
use mesh_messages::provider::ExecuteMsg as ProviderExecuteMsg;
use mesh_messages::slasher::{ConfigResponse, ExecuteMsg, InstantiateMsg, QueryMsg};
use mesh_messages::{from_binary, to_binary, Binary};
use mesh_types::{Addr, Decimal};
use tracing::{info, warn};

pub fn instantiate(
    _env: &Env,
    _querier: &dyn Querier,
    info: MessageInfo,
    msg: &Binary,
) -> Result<(Box<dyn Contract>, Response), ContractError> {
    let msg: InstantiateMsg = from_binary(msg)?;
    let contract = SlasherContract {
        owner: Addr::unchecked(msg.owner),
        provider: info.sender,
    };
    info!(owner = %contract.owner, provider = %contract.provider, "Slasher instantiated");
    Ok((
        Box::new(contract),
        Response::new().add_attribute("action", "instantiate"),
    ))
}

#[derive(Debug, Clone)]
pub struct SlasherContract {
    owner: Addr,
    provider: Addr,
}

impl SlasherContract {
    fn slash(
        &self,
        info: MessageInfo,
        validator: String,
        percentage: Decimal,
    ) -> Result<Response, ContractError> {
        if info.sender != self.owner {
            return Err(ContractError::Unauthorized);
        }
        warn!(validator = %validator, %percentage, "Forwarding slash");
        let forward = Action::execute(
            &self.provider,
            &ProviderExecuteMsg::Slash {
                validator: validator.clone(),
                percentage,
            },
            vec![],
        )?;
        Ok(Response::new()
            .add_action(forward)
            .add_attribute("action", "slash")
            .add_attribute("validator", validator))
    }
}

impl Contract for SlasherContract {
    fn name(&self) -> &'static str {
        "slasher"
    }

    fn handle(
        &mut self,
        _env: &Env,
        _querier: &dyn Querier,
        event: Event,
    ) -> Result<Response, ContractError> {
        match event {
            Event::Execute { info, msg } => match from_binary(&msg)? {
                ExecuteMsg::Slash {
                    validator,
                    percentage,
                } => self.slash(info, validator, percentage),
            },
            other => Err(ContractError::Unsupported(other.type_name())),
        }
    }

    fn query(
        &self,
        _env: &Env,
        _querier: &dyn Querier,
        msg: &Binary,
    ) -> Result<Binary, ContractError> {
        match from_binary(msg)? {
            QueryMsg::Config {} => Ok(to_binary(&ConfigResponse {
                owner: self.owner.to_string(),
                provider: self.provider.to_string(),
            })?),
        }
    }

    fn box_clone(&self) -> Box<dyn Contract> {
        Box::new(self.clone())
    }
}
