use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use ed25519_dalek::VerifyingKey;
use serde::{Deserialize, Serialize};

const KEY_SEPARATOR: char = '#';

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentityError {
    #[error("invalid party name {0:?}")]
    InvalidName(String),
    #[error("malformed party key: {0}")]
    MalformedKey(String),
    #[error("party key is not a valid ed25519 point")]
    InvalidKey,
    #[error("unknown party {0}")]
    UnknownParty(String),
}

/// Ed25519 verifying key owned by a network party.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PartyKey([u8; 32]);

impl PartyKey {
    pub fn from_bytes(bytes: [u8; 32]) -> Result<Self, IdentityError> {
        VerifyingKey::from_bytes(&bytes).map_err(|_| IdentityError::InvalidKey)?;
        Ok(Self(bytes))
    }

    pub fn from_hex(encoded: &str) -> Result<Self, IdentityError> {
        let raw = hex::decode(encoded.trim())
            .map_err(|e| IdentityError::MalformedKey(e.to_string()))?;
        let bytes: [u8; 32] = raw
            .try_into()
            .map_err(|v: Vec<u8>| IdentityError::MalformedKey(format!("{} bytes", v.len())))?;
        Self::from_bytes(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl From<VerifyingKey> for PartyKey {
    fn from(key: VerifyingKey) -> Self {
        Self(key.to_bytes())
    }
}

impl fmt::Display for PartyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Opaque, comparable reference to a well-known network party.
///
/// Parties are plain values: a name plus the key that owns it. The stable
/// serialized form is `"{name}#{hex key}"`, which is also what serde emits.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Party {
    name: String,
    owning_key: PartyKey,
}

impl Party {
    pub fn new(name: impl Into<String>, owning_key: PartyKey) -> Result<Self, IdentityError> {
        let name = name.into();
        if name.trim().is_empty() || name.contains(KEY_SEPARATOR) {
            return Err(IdentityError::InvalidName(name));
        }
        Ok(Self { name, owning_key })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn owning_key(&self) -> &PartyKey {
        &self.owning_key
    }
}

impl fmt::Display for Party {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.name, KEY_SEPARATOR, self.owning_key)
    }
}

impl FromStr for Party {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, key) = s
            .rsplit_once(KEY_SEPARATOR)
            .ok_or_else(|| IdentityError::MalformedKey(format!("missing key in {s:?}")))?;
        Party::new(name, PartyKey::from_hex(key)?)
    }
}

impl From<Party> for String {
    fn from(party: Party) -> Self {
        party.to_string()
    }
}

impl TryFrom<String> for Party {
    type Error = IdentityError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Name to key mapping for the parties this node knows about.
#[derive(Clone, Debug, Default)]
pub struct PartyDirectory {
    parties: BTreeMap<String, PartyKey>,
}

impl PartyDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, key: PartyKey) -> Result<Party, IdentityError> {
        let party = Party::new(name, key)?;
        self.parties.insert(party.name.clone(), key);
        Ok(party)
    }

    pub fn resolve(&self, name: &str) -> Result<Party, IdentityError> {
        let key = self
            .parties
            .get(name)
            .ok_or_else(|| IdentityError::UnknownParty(name.to_string()))?;
        Party::new(name, *key)
    }

    pub fn party_from_key(&self, key: &PartyKey) -> Option<Party> {
        self.parties
            .iter()
            .find(|(_, known)| *known == key)
            .map(|(name, known)| Party {
                name: name.clone(),
                owning_key: *known,
            })
    }

    pub fn parties(&self) -> Vec<Party> {
        self.parties
            .iter()
            .map(|(name, key)| Party {
                name: name.clone(),
                owning_key: *key,
            })
            .collect()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use ed25519_dalek::SigningKey;
    use rand::rngs::OsRng;

    use super::*;

    pub fn random_key() -> PartyKey {
        let mut rng = OsRng;
        SigningKey::generate(&mut rng).verifying_key().into()
    }

    pub fn random_party(name: &str) -> Party {
        Party::new(name, random_key()).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn party_string_form_parses_back() {
        let party = random_party("PartyA");
        let encoded = party.to_string();
        assert!(encoded.starts_with("PartyA#"));
        let decoded: Party = encoded.parse().unwrap();
        assert_eq!(decoded, party);
    }

    #[test]
    fn party_serializes_as_flat_string() {
        let party = random_party("PartyA");
        let json = serde_json::to_value(&party).unwrap();
        assert_eq!(json, serde_json::Value::String(party.to_string()));
    }

    #[test]
    fn blank_or_separator_names_are_rejected() {
        let key = random_key();
        assert_eq!(
            Party::new("  ", key).unwrap_err(),
            IdentityError::InvalidName("  ".into())
        );
        assert!(matches!(
            Party::new("a#b", key),
            Err(IdentityError::InvalidName(_))
        ));
    }

    #[test]
    fn key_hex_must_be_32_bytes() {
        let err = PartyKey::from_hex("abcd").unwrap_err();
        assert!(matches!(err, IdentityError::MalformedKey(_)));
        let key = random_key();
        assert_eq!(PartyKey::from_hex(&key.to_hex()).unwrap(), key);
    }

    #[test]
    fn directory_resolves_registered_parties() {
        let mut directory = PartyDirectory::new();
        let key = random_key();
        let registered = directory.register("PartyB", key).unwrap();
        assert_eq!(directory.resolve("PartyB").unwrap(), registered);
        assert_eq!(directory.party_from_key(&key), Some(registered));
        assert_eq!(
            directory.resolve("PartyC").unwrap_err(),
            IdentityError::UnknownParty("PartyC".into())
        );
        assert_eq!(directory.parties().len(), 1);
    }
}
