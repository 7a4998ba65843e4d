use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::contracts::{verify_transition, ContractError, Transition};
use crate::identity::Party;
use crate::schemas::{project_all, AccountSchema, PersistentAccountInfo, ProjectionError, SchemaRef};
use crate::states::{identifier_of, AccountInfo, AccountStatus, StateHash};

#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    #[error(transparent)]
    Contract(#[from] ContractError),
    #[error(transparent)]
    Projection(#[from] ProjectionError),
    #[error("host {host} already has an active account named {name:?}")]
    DuplicateName { host: Party, name: String },
    #[error("unknown account {0}")]
    UnknownAccount(Uuid),
    #[error("account {0} has been consumed without successor")]
    AlreadyConsumed(Uuid),
}

/// Which versions a query looks at.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateStatus {
    #[default]
    Unconsumed,
    Consumed,
    All,
}

impl StateStatus {
    fn admits(&self, consumed: bool) -> bool {
        match self {
            StateStatus::Unconsumed => !consumed,
            StateStatus::Consumed => consumed,
            StateStatus::All => true,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct VaultEntry {
    pub state: AccountInfo,
    pub version: StateHash,
    pub recorded_at: u64,
    pub consumed: bool,
    pub rows: Vec<(SchemaRef, PersistentAccountInfo)>,
}

impl VaultEntry {
    fn row(&self, schema: &SchemaRef) -> Option<&PersistentAccountInfo> {
        self.rows
            .iter()
            .find(|(candidate, _)| candidate == schema)
            .map(|(_, row)| row)
    }
}

/// Row filter. Every unset field matches anything.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccountCriteria {
    pub schema: SchemaRef,
    pub host: Option<Party>,
    pub name: Option<String>,
    pub status: Option<AccountStatus>,
    pub state_status: StateStatus,
}

impl Default for AccountCriteria {
    fn default() -> Self {
        Self {
            schema: AccountSchema::V1.schema_ref(),
            host: None,
            name: None,
            status: None,
            state_status: StateStatus::default(),
        }
    }
}

impl AccountCriteria {
    pub fn host(mut self, host: Party) -> Self {
        self.host = Some(host);
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn status(mut self, status: AccountStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn state_status(mut self, state_status: StateStatus) -> Self {
        self.state_status = state_status;
        self
    }

    fn matches(&self, row: &PersistentAccountInfo) -> bool {
        self.host.as_ref().map_or(true, |host| row.host == *host)
            && self.name.as_ref().map_or(true, |name| row.name == *name)
            && self.status.map_or(true, |status| row.status == status)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct VaultSnapshot {
    pub height: u64,
    pub unconsumed: usize,
    pub merkle_root: [u8; 32],
}

/// Version chains keyed by linear id. Recording a successor consumes the old
/// head; nothing is removed, so superseded versions stay queryable.
#[derive(Default)]
pub struct AccountVault {
    chains: BTreeMap<Uuid, Vec<VaultEntry>>,
    height: u64,
}

impl AccountVault {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn height(&self) -> u64 {
        self.height
    }

    /// Accepts a new account or a successor of a known one.
    ///
    /// Re-recording the current head is a no-op and leaves the height unchanged.
    pub fn record(&mut self, state: &AccountInfo) -> Result<Transition, VaultError> {
        let token = identifier_of(state);
        let head = self.chains.get(&token).and_then(|chain| chain.last());
        if head.map_or(false, |entry| entry.consumed) {
            warn!(%token, "rejecting successor of retired account");
            return Err(VaultError::AlreadyConsumed(token));
        }
        let transition = verify_transition(head.map(|entry| &entry.state), Some(state))
            .map_err(|err| {
                warn!(%token, %err, "account transition rejected");
                err
            })?;
        let version = state.state_hash();
        if head.map_or(false, |entry| entry.version == version) {
            debug!(%token, %version, "account version already recorded");
            return Ok(transition);
        }

        if state.status() == AccountStatus::Active {
            let taken = self.unconsumed().any(|existing| {
                existing.status() == AccountStatus::Active
                    && existing.host() == state.host()
                    && existing.name() == state.name()
                    && identifier_of(existing) != token
            });
            if taken {
                warn!(%token, name = state.name(), "duplicate account name at host");
                return Err(VaultError::DuplicateName {
                    host: state.host().clone(),
                    name: state.name().to_string(),
                });
            }
        }

        let rows = project_all(state)?;
        self.height += 1;
        let chain = self.chains.entry(token).or_default();
        if let Some(previous) = chain.last_mut() {
            previous.consumed = true;
        }
        chain.push(VaultEntry {
            state: state.clone(),
            version,
            recorded_at: self.height,
            consumed: false,
            rows,
        });
        debug!(
            %token,
            %version,
            ?transition,
            status = %state.status(),
            versions = chain.len(),
            "account version recorded"
        );
        Ok(transition)
    }

    /// Consumes the head of a chain without producing a successor.
    pub fn retire(&mut self, token: Uuid) -> Result<(), VaultError> {
        let head = self
            .chains
            .get_mut(&token)
            .and_then(|chain| chain.last_mut())
            .ok_or(VaultError::UnknownAccount(token))?;
        if head.consumed {
            return Err(VaultError::AlreadyConsumed(token));
        }
        verify_transition(Some(&head.state), None)?;
        head.consumed = true;
        self.height += 1;
        debug!(%token, "account retired");
        Ok(())
    }

    /// Head of the chain, consumed or not.
    pub fn latest(&self, token: Uuid) -> Option<&VaultEntry> {
        self.chains.get(&token).and_then(|chain| chain.last())
    }

    /// All versions, oldest first.
    pub fn history(&self, token: Uuid) -> &[VaultEntry] {
        self.chains.get(&token).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Unconsumed account with this name at `host`, preferring an active one.
    pub fn account_by_name(&self, host: &Party, name: &str) -> Option<&AccountInfo> {
        self.unconsumed()
            .filter(|state| state.host() == host && state.name() == name)
            .max_by_key(|state| state.status() == AccountStatus::Active)
    }

    pub fn accounts_for_host(&self, host: &Party) -> Vec<&AccountInfo> {
        self.unconsumed()
            .filter(|state| state.host() == host)
            .collect()
    }

    /// Rows matching `criteria`. Unsupported schemas fail instead of matching nothing.
    pub fn query(
        &self,
        criteria: &AccountCriteria,
    ) -> Result<Vec<&PersistentAccountInfo>, VaultError> {
        if AccountSchema::from_ref(&criteria.schema).is_none() {
            warn!(schema = %criteria.schema, "query against unsupported schema");
            return Err(ProjectionError::UnsupportedSchema {
                schema: criteria.schema.clone(),
                record_type: std::any::type_name::<AccountInfo>(),
            }
            .into());
        }
        Ok(self
            .chains
            .values()
            .flatten()
            .filter(|entry| criteria.state_status.admits(entry.consumed))
            .filter_map(|entry| entry.row(&criteria.schema))
            .filter(|row| criteria.matches(row))
            .collect())
    }

    pub fn snapshot(&self) -> VaultSnapshot {
        let heads: Vec<&VaultEntry> = self
            .chains
            .values()
            .filter_map(|chain| chain.last())
            .filter(|entry| !entry.consumed)
            .collect();
        let leaves = heads
            .iter()
            .map(|entry| -> [u8; 32] {
                let mut hasher = Sha256::new();
                hasher.update(b"acct");
                hasher.update(identifier_of(&entry.state).as_bytes());
                hasher.update(entry.version.as_bytes());
                hasher.finalize().into()
            })
            .collect();
        VaultSnapshot {
            height: self.height,
            unconsumed: heads.len(),
            merkle_root: build_merkle(leaves),
        }
    }

    fn unconsumed(&self) -> impl Iterator<Item = &AccountInfo> {
        self.chains
            .values()
            .filter_map(|chain| chain.last())
            .filter(|entry| !entry.consumed)
            .map(|entry| &entry.state)
    }
}

fn build_merkle(mut leaves: Vec<[u8; 32]>) -> [u8; 32] {
    if leaves.is_empty() {
        return Sha256::digest(b"account-vault-empty").into();
    }
    while leaves.len() > 1 {
        let mut next = Vec::with_capacity((leaves.len() + 1) / 2);
        for chunk in leaves.chunks(2) {
            let mut hasher = Sha256::new();
            hasher.update(b"node");
            hasher.update(chunk[0]);
            hasher.update(chunk.get(1).unwrap_or(&chunk[0]));
            next.push(hasher.finalize().into());
        }
        leaves = next;
    }
    leaves[0]
}
