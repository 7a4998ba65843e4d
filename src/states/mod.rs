use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::identity::Party;

/// Status applied when a record is built without one.
pub const DEFAULT_STATUS: AccountStatus = AccountStatus::Active;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StateError {
    #[error("invalid account record shape: {reason}")]
    InvalidRecordShape { reason: String },
    #[error("malformed identifier {0:?}")]
    MalformedIdentifier(String),
    #[error("unknown account status {0:?}")]
    UnknownStatus(String),
}

impl StateError {
    fn shape(reason: impl Into<String>) -> Self {
        StateError::InvalidRecordShape {
            reason: reason.into(),
        }
    }
}

/// Network-wide identifier: an optional external label plus a UUID token.
///
/// The token never changes across versions of the same logical account.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UniqueIdentifier {
    external_id: Option<String>,
    id: Uuid,
}

impl UniqueIdentifier {
    /// Mint a fresh random token.
    pub fn new(external_id: Option<String>) -> Self {
        Self {
            external_id,
            id: Uuid::new_v4(),
        }
    }

    pub fn from_parts(external_id: Option<String>, id: Uuid) -> Self {
        Self { external_id, id }
    }

    pub fn external_id(&self) -> Option<&str> {
        self.external_id.as_deref()
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    fn validate(&self) -> Result<(), StateError> {
        if self.id.is_nil() {
            return Err(StateError::shape("unique token is empty"));
        }
        if let Some(label) = &self.external_id {
            if label.trim().is_empty() {
                return Err(StateError::shape("external id is blank"));
            }
        }
        Ok(())
    }
}

impl fmt::Display for UniqueIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.external_id {
            Some(label) => write!(f, "{label}_{}", self.id),
            None => write!(f, "{}", self.id),
        }
    }
}

impl FromStr for UniqueIdentifier {
    type Err = StateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(id) = Uuid::parse_str(s) {
            return Ok(Self::from_parts(None, id));
        }
        let malformed = || StateError::MalformedIdentifier(s.to_string());
        let (label, token) = s.rsplit_once('_').ok_or_else(malformed)?;
        if label.trim().is_empty() {
            return Err(malformed());
        }
        let id = Uuid::parse_str(token).map_err(|_| malformed())?;
        Ok(Self::from_parts(Some(label.to_string()), id))
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountStatus {
    #[default]
    Active,
    Closed,
}

impl AccountStatus {
    /// Terminal statuses retire the account.
    pub fn is_terminal(&self) -> bool {
        matches!(self, AccountStatus::Closed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Active => "ACTIVE",
            AccountStatus::Closed => "CLOSED",
        }
    }
}

impl fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccountStatus {
    type Err = StateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ACTIVE" => Ok(AccountStatus::Active),
            "CLOSED" => Ok(AccountStatus::Closed),
            _ => Err(StateError::UnknownStatus(s.to_string())),
        }
    }
}

/// SHA-256 of one account version. Points at a specific version of a linear id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct StateHash([u8; 32]);

impl StateHash {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for StateHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl From<StateHash> for String {
    fn from(hash: StateHash) -> Self {
        hash.to_string()
    }
}

impl TryFrom<String> for StateHash {
    type Error = hex::FromHexError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(value.trim(), &mut bytes)?;
        Ok(Self(bytes))
    }
}

/// Facts the consensus layer needs from any linear state.
pub trait LinearState {
    fn linear_id(&self) -> &UniqueIdentifier;

    fn participants(&self) -> BTreeSet<Party>;
}

/// Account name, hosting node, network id and lifecycle status.
///
/// The name is only unique per host. Fields are private so every instance
/// has passed shape validation.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "AccountInfoFields")]
pub struct AccountInfo {
    name: String,
    host: Party,
    id: UniqueIdentifier,
    status: AccountStatus,
}

#[derive(Deserialize)]
struct AccountInfoFields {
    name: String,
    host: Party,
    id: UniqueIdentifier,
    #[serde(default)]
    status: AccountStatus,
}

impl TryFrom<AccountInfoFields> for AccountInfo {
    type Error = StateError;

    fn try_from(fields: AccountInfoFields) -> Result<Self, Self::Error> {
        AccountInfo::builder()
            .name(fields.name)
            .host(fields.host)
            .id(fields.id)
            .status(fields.status)
            .build()
    }
}

impl AccountInfo {
    /// Build an account with the default status.
    pub fn new(
        name: impl Into<String>,
        host: Party,
        id: UniqueIdentifier,
    ) -> Result<Self, StateError> {
        Self::builder().name(name).host(host).id(id).build()
    }

    pub fn builder() -> AccountInfoBuilder {
        AccountInfoBuilder::default()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn host(&self) -> &Party {
        &self.host
    }

    pub fn id(&self) -> &UniqueIdentifier {
        &self.id
    }

    pub fn status(&self) -> AccountStatus {
        self.status
    }

    /// Successor carrying a new name.
    pub fn with_name(&self, name: impl Into<String>) -> Result<Self, StateError> {
        self.successor().name(name).build()
    }

    /// Successor hosted by another party.
    pub fn with_host(&self, host: Party) -> Result<Self, StateError> {
        self.successor().replace_host(host).build()
    }

    pub fn with_status(&self, status: AccountStatus) -> Self {
        Self {
            status,
            ..self.clone()
        }
    }

    pub fn close(&self) -> Self {
        self.with_status(AccountStatus::Closed)
    }

    pub fn state_hash(&self) -> StateHash {
        let mut hasher = Sha256::new();
        hasher.update(b"account-info");
        hash_field(&mut hasher, self.name.as_bytes());
        hash_field(&mut hasher, self.host.name().as_bytes());
        hasher.update(self.host.owning_key().as_bytes());
        match self.id.external_id() {
            Some(label) => {
                hasher.update([1u8]);
                hash_field(&mut hasher, label.as_bytes());
            }
            None => hasher.update([0u8]),
        }
        hasher.update(self.id.id().as_bytes());
        hasher.update(self.status.as_str().as_bytes());
        StateHash(hasher.finalize().into())
    }

    fn successor(&self) -> AccountInfoBuilder {
        AccountInfoBuilder {
            name: Some(self.name.clone()),
            hosts: vec![self.host.clone()],
            id: Some(self.id.clone()),
            status: Some(self.status),
        }
    }
}

fn hash_field(hasher: &mut Sha256, bytes: &[u8]) {
    hasher.update((bytes.len() as u64).to_le_bytes());
    hasher.update(bytes);
}

impl LinearState for AccountInfo {
    fn linear_id(&self) -> &UniqueIdentifier {
        &self.id
    }

    fn participants(&self) -> BTreeSet<Party> {
        BTreeSet::from([self.host.clone()])
    }
}

/// Collects account fields and validates them once in [`build`](Self::build).
#[derive(Clone, Debug, Default)]
pub struct AccountInfoBuilder {
    name: Option<String>,
    hosts: Vec<Party>,
    id: Option<UniqueIdentifier>,
    status: Option<AccountStatus>,
}

impl AccountInfoBuilder {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Adds a host. Exactly one must be supplied before building.
    pub fn host(mut self, host: Party) -> Self {
        self.hosts.push(host);
        self
    }

    pub fn id(mut self, id: UniqueIdentifier) -> Self {
        self.id = Some(id);
        self
    }

    pub fn status(mut self, status: AccountStatus) -> Self {
        self.status = Some(status);
        self
    }

    fn replace_host(mut self, host: Party) -> Self {
        self.hosts = vec![host];
        self
    }

    pub fn build(self) -> Result<AccountInfo, StateError> {
        let name = self
            .name
            .filter(|name| !name.trim().is_empty())
            .ok_or_else(|| StateError::shape("account name is missing"))?;
        let id = self
            .id
            .ok_or_else(|| StateError::shape("unique identifier is missing"))?;
        id.validate()?;
        let mut hosts = self.hosts;
        if hosts.len() != 1 {
            return Err(StateError::shape(format!(
                "expected exactly one host, got {}",
                hosts.len()
            )));
        }
        let host = hosts.remove(0);
        Ok(AccountInfo {
            name,
            host,
            id,
            status: self.status.unwrap_or(DEFAULT_STATUS),
        })
    }
}

/// The immutable token of the record's identifier.
pub fn identifier_of(record: &AccountInfo) -> Uuid {
    record.linear_id().id()
}

/// Always the single host.
pub fn participants_of(record: &AccountInfo) -> BTreeSet<Party> {
    record.participants()
}

/// Whether `new` may supersede `old` in a linear chain.
///
/// Only the token is compared: any change of name, host or status is a valid
/// successor, and an identical record is accepted as a no-op update.
pub fn is_successor(old: &AccountInfo, new: &AccountInfo) -> bool {
    identifier_of(old) == identifier_of(new)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::test_support::random_party;
    use crate::identity::PartyKey;
    use ed25519_dalek::SigningKey;
    use proptest::prelude::*;

    fn wallet(host: &Party) -> AccountInfo {
        AccountInfo::new("wallet-1", host.clone(), UniqueIdentifier::new(None)).unwrap()
    }

    #[test]
    fn new_account_defaults_to_active_with_single_participant() {
        let party_a = random_party("PartyA");
        let record = wallet(&party_a);
        assert_eq!(record.status(), AccountStatus::Active);
        assert_eq!(participants_of(&record), BTreeSet::from([party_a]));
    }

    #[test]
    fn closing_keeps_token_and_is_a_successor() {
        let party_a = random_party("PartyA");
        let r0 = wallet(&party_a);
        let r1 = r0.close();
        assert_eq!(r1.status(), AccountStatus::Closed);
        assert_eq!(identifier_of(&r0), identifier_of(&r1));
        assert!(is_successor(&r0, &r1));
        assert!(is_successor(&r0, &r0));
        assert_ne!(r0.state_hash(), r1.state_hash());
    }

    #[test]
    fn fresh_token_is_not_a_successor() {
        let party_a = random_party("PartyA");
        let r0 = wallet(&party_a);
        let r2 = wallet(&party_a);
        assert!(!is_successor(&r0, &r2));
    }

    #[test]
    fn builder_rejects_bad_shapes() {
        let party_a = random_party("PartyA");
        let party_b = random_party("PartyB");
        let no_host = AccountInfo::builder()
            .name("wallet-1")
            .id(UniqueIdentifier::new(None))
            .build();
        assert!(matches!(no_host, Err(StateError::InvalidRecordShape { .. })));

        let two_hosts = AccountInfo::builder()
            .name("wallet-1")
            .host(party_a.clone())
            .host(party_b)
            .id(UniqueIdentifier::new(None))
            .build();
        assert!(matches!(two_hosts, Err(StateError::InvalidRecordShape { .. })));

        let nil_token = AccountInfo::new(
            "wallet-1",
            party_a.clone(),
            UniqueIdentifier::from_parts(None, Uuid::nil()),
        );
        assert!(matches!(nil_token, Err(StateError::InvalidRecordShape { .. })));

        let blank_label = AccountInfo::new(
            "wallet-1",
            party_a.clone(),
            UniqueIdentifier::new(Some("  ".into())),
        );
        assert!(matches!(blank_label, Err(StateError::InvalidRecordShape { .. })));

        let blank_name = AccountInfo::new(" ", party_a, UniqueIdentifier::new(None));
        assert!(matches!(blank_name, Err(StateError::InvalidRecordShape { .. })));
    }

    #[test]
    fn identifier_display_round_trips_with_label() {
        let id = UniqueIdentifier::new(Some("acct_ref".into()));
        let parsed: UniqueIdentifier = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
        let bare = UniqueIdentifier::new(None);
        assert_eq!(bare.to_string().parse::<UniqueIdentifier>().unwrap(), bare);
        assert_eq!(
            "not-an-id".parse::<UniqueIdentifier>().unwrap_err(),
            StateError::MalformedIdentifier("not-an-id".into())
        );
    }

    #[test]
    fn identifier_with_empty_label_does_not_parse() {
        let token = Uuid::new_v4();
        for text in [format!("_{token}"), format!("  _{token}")] {
            assert!(matches!(
                text.parse::<UniqueIdentifier>(),
                Err(StateError::MalformedIdentifier(_))
            ));
        }
    }

    #[test]
    fn deserialization_revalidates_shape_and_defaults_status() {
        let party_a = random_party("PartyA");
        let json = serde_json::json!({
            "name": "wallet-1",
            "host": party_a.to_string(),
            "id": { "external_id": null, "id": Uuid::new_v4() },
        });
        let record: AccountInfo = serde_json::from_value(json).unwrap();
        assert_eq!(record.status(), AccountStatus::Active);

        let nil = serde_json::json!({
            "name": "wallet-1",
            "host": party_a.to_string(),
            "id": { "external_id": null, "id": Uuid::nil() },
            "status": "CLOSED",
        });
        assert!(serde_json::from_value::<AccountInfo>(nil).is_err());
    }

    #[test]
    fn status_serializes_upper_case() {
        assert_eq!(
            serde_json::to_string(&AccountStatus::Closed).unwrap(),
            "\"CLOSED\""
        );
        assert_eq!("active".parse::<AccountStatus>().unwrap(), AccountStatus::Active);
        assert_eq!(
            "PENDING".parse::<AccountStatus>().unwrap_err(),
            StateError::UnknownStatus("PENDING".into())
        );
    }

    #[derive(Clone, Debug)]
    enum Update {
        Rename(String),
        Rehost(u8),
        Status(bool),
    }

    fn fixed_party(seed: u8) -> Party {
        let key: PartyKey = SigningKey::from_bytes(&[seed; 32]).verifying_key().into();
        Party::new(format!("Party{seed}"), key).unwrap()
    }

    fn update_strategy() -> impl Strategy<Value = Update> {
        prop_oneof![
            "[a-z][a-z0-9-]{0,12}".prop_map(Update::Rename),
            (1u8..5).prop_map(Update::Rehost),
            any::<bool>().prop_map(Update::Status),
        ]
    }

    proptest! {
        #[test]
        fn token_is_stable_across_successor_chains(updates in prop::collection::vec(update_strategy(), 0..24)) {
            let r0 = AccountInfo::new("wallet-1", fixed_party(0), UniqueIdentifier::new(None)).unwrap();
            let mut current = r0.clone();
            for update in updates {
                let next = match update {
                    Update::Rename(name) => current.with_name(name).unwrap(),
                    Update::Rehost(seed) => current.with_host(fixed_party(seed)).unwrap(),
                    Update::Status(closed) => current.with_status(if closed {
                        AccountStatus::Closed
                    } else {
                        AccountStatus::Active
                    }),
                };
                prop_assert!(is_successor(&current, &next));
                prop_assert_eq!(participants_of(&next).len(), 1);
                prop_assert!(participants_of(&next).contains(next.host()));
                current = next;
            }
            prop_assert_eq!(identifier_of(&r0), identifier_of(&current));
        }
    }
}
