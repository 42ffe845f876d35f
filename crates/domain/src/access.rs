//! Role-based authorization registry
//!
//! Holds the single contract owner and the fleet-manager and device role
//! sets, and answers membership questions for every other component. Absence
//! from a set is simply `false`. Only the current owner may change roles.

use fleetledger_core::Txn;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::context::{CallContext, Principal};
use crate::error::{EntityKind, LedgerError, Result};
use crate::vehicles::{ServiceProvider, PROVIDER_NAMESPACE};

const OWNER_NAMESPACE: &str = "owner";
const OWNER_KEY: &str = "owner";
const FLEET_MANAGER_NAMESPACE: &str = "fleet_managers";
const DEVICE_NAMESPACE: &str = "devices";

/// Role a principal can hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    /// Manages vehicles, boundaries and telemetry on behalf of the owner
    FleetManager,
    /// Field device allowed to submit location fixes
    Device,
}

impl Role {
    fn namespace(self) -> &'static str {
        match self {
            Role::FleetManager => FLEET_MANAGER_NAMESPACE,
            Role::Device => DEVICE_NAMESPACE,
        }
    }
}

/// Membership record for a granted role
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleGrant {
    /// Owner that granted the role
    pub granted_by: Principal,
    /// Oracle time of the grant
    pub granted_at: u64,
}

/// Current contract owner, if one has been recorded
pub fn owner(txn: &Txn<'_>) -> Result<Option<Principal>> {
    Ok(txn.get(OWNER_NAMESPACE, OWNER_KEY)?)
}

pub fn is_owner(txn: &Txn<'_>, caller: &Principal) -> Result<bool> {
    Ok(owner(txn)?.as_ref() == Some(caller))
}

pub fn is_fleet_manager(txn: &Txn<'_>, caller: &Principal) -> Result<bool> {
    has_role(txn, Role::FleetManager, caller)
}

pub fn is_authorized_device(txn: &Txn<'_>, caller: &Principal) -> Result<bool> {
    has_role(txn, Role::Device, caller)
}

/// Whether `caller` is the bound principal of an authorized provider
pub fn is_authorized_provider(txn: &Txn<'_>, provider_id: &str, caller: &Principal) -> Result<bool> {
    let provider: Option<ServiceProvider> = txn.get(PROVIDER_NAMESPACE, provider_id)?;
    Ok(provider.is_some_and(|p| p.authorized && &p.principal == caller))
}

pub fn has_role(txn: &Txn<'_>, role: Role, caller: &Principal) -> Result<bool> {
    Ok(txn.contains(role.namespace(), caller)?)
}

pub(crate) fn deny(ctx: &CallContext<'_>, action: &'static str) -> LedgerError {
    warn!(caller = %ctx.caller, action = action, "Authorization denied");
    LedgerError::NotAuthorized {
        caller: ctx.caller.to_string(),
        action,
    }
}

pub(crate) fn ensure_owner(txn: &Txn<'_>, ctx: &CallContext<'_>, action: &'static str) -> Result<()> {
    if is_owner(txn, ctx.caller)? {
        Ok(())
    } else {
        Err(deny(ctx, action))
    }
}

pub(crate) fn ensure_owner_or_manager(
    txn: &Txn<'_>,
    ctx: &CallContext<'_>,
    action: &'static str,
) -> Result<()> {
    if is_owner(txn, ctx.caller)? || is_fleet_manager(txn, ctx.caller)? {
        Ok(())
    } else {
        Err(deny(ctx, action))
    }
}

/// Owner, fleet managers and authorized devices may submit telemetry
pub(crate) fn ensure_telemetry_writer(
    txn: &Txn<'_>,
    ctx: &CallContext<'_>,
    action: &'static str,
) -> Result<()> {
    if is_owner(txn, ctx.caller)?
        || is_fleet_manager(txn, ctx.caller)?
        || is_authorized_device(txn, ctx.caller)?
    {
        Ok(())
    } else {
        Err(deny(ctx, action))
    }
}

/// Record the first owner of an empty ledger
pub(crate) fn initialize_owner(txn: &mut Txn<'_>, deployer: &Principal) -> Result<bool> {
    if owner(txn)?.is_some() {
        return Ok(false);
    }
    if deployer.is_empty() {
        return Err(LedgerError::InvalidInput("owner identity cannot be empty".to_string()));
    }
    txn.put(OWNER_NAMESPACE, OWNER_KEY, deployer)?;
    info!(owner = %deployer, "Ledger owner initialized");
    Ok(true)
}

pub(crate) fn grant_role(
    txn: &mut Txn<'_>,
    ctx: &CallContext<'_>,
    role: Role,
    member: &Principal,
) -> Result<()> {
    let action = match role {
        Role::FleetManager => "add_fleet_manager",
        Role::Device => "add_device",
    };
    ensure_owner(txn, ctx, action)?;
    if member.is_empty() {
        return Err(LedgerError::InvalidInput("member identity cannot be empty".to_string()));
    }

    txn.put(
        role.namespace(),
        member,
        &RoleGrant {
            granted_by: ctx.caller.clone(),
            granted_at: ctx.time,
        },
    )?;

    info!(member = %member, role = ?role, "Role granted");
    Ok(())
}

/// Remove a role; returns whether the member held it
pub(crate) fn revoke_role(
    txn: &mut Txn<'_>,
    ctx: &CallContext<'_>,
    role: Role,
    member: &Principal,
) -> Result<bool> {
    let action = match role {
        Role::FleetManager => "remove_fleet_manager",
        Role::Device => "remove_device",
    };
    ensure_owner(txn, ctx, action)?;

    let held = has_role(txn, role, member)?;
    if held {
        txn.delete(role.namespace(), member);
        info!(member = %member, role = ?role, "Role revoked");
    }
    Ok(held)
}

pub(crate) fn set_provider_authorization(
    txn: &mut Txn<'_>,
    ctx: &CallContext<'_>,
    provider_id: &str,
    authorized: bool,
) -> Result<ServiceProvider> {
    ensure_owner(txn, ctx, "set_provider_authorization")?;

    let provider = txn
        .merge::<ServiceProvider, _>(PROVIDER_NAMESPACE, provider_id, |p| {
            p.authorized = authorized;
        })?
        .ok_or_else(|| LedgerError::not_found(EntityKind::Provider, provider_id))?;

    info!(provider_id = provider_id, authorized = authorized, "Provider authorization set");
    Ok(provider)
}

pub(crate) fn transfer_ownership(
    txn: &mut Txn<'_>,
    ctx: &CallContext<'_>,
    new_owner: &Principal,
) -> Result<()> {
    ensure_owner(txn, ctx, "transfer_ownership")?;
    if new_owner.is_empty() {
        return Err(LedgerError::InvalidInput("owner identity cannot be empty".to_string()));
    }

    txn.put(OWNER_NAMESPACE, OWNER_KEY, new_owner)?;
    info!(previous = %ctx.caller, owner = %new_owner, "Ownership transferred");
    Ok(())
}
