use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::identity::Party;
use crate::states::{AccountInfo, AccountStatus, LinearState};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProjectionError {
    #[error("cannot construct instance of {record_type} from schema {schema}")]
    UnsupportedSchema {
        schema: SchemaRef,
        record_type: &'static str,
    },
}

/// Opaque reference naming a persistence schema.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SchemaRef(String);

impl SchemaRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SchemaRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Schemas account states know how to map into.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AccountSchema {
    V1,
}

impl AccountSchema {
    pub const ALL: &'static [AccountSchema] = &[AccountSchema::V1];

    pub fn family(&self) -> &'static str {
        "accounts"
    }

    pub fn version(&self) -> u32 {
        match self {
            AccountSchema::V1 => 1,
        }
    }

    pub fn table_name(&self) -> &'static str {
        match self {
            AccountSchema::V1 => "account_info",
        }
    }

    pub fn schema_ref(&self) -> SchemaRef {
        SchemaRef(format!("{}.v{}", self.family(), self.version()))
    }

    /// Exact match against the supported set; no version fallback.
    pub fn from_ref(schema: &SchemaRef) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|candidate| candidate.schema_ref() == *schema)
    }
}

/// Flat row indexed by the query store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistentAccountInfo {
    pub name: String,
    pub host: Party,
    pub unique_token: Uuid,
    pub status: AccountStatus,
}

/// States that can be mapped into query rows.
pub trait QueryableState {
    type Row;

    fn supported_schemas() -> Vec<SchemaRef>;

    fn generate_mapped_object(&self, schema: &SchemaRef) -> Result<Self::Row, ProjectionError>;
}

impl QueryableState for AccountInfo {
    type Row = PersistentAccountInfo;

    fn supported_schemas() -> Vec<SchemaRef> {
        AccountSchema::ALL.iter().map(AccountSchema::schema_ref).collect()
    }

    fn generate_mapped_object(&self, schema: &SchemaRef) -> Result<Self::Row, ProjectionError> {
        let mapped = AccountSchema::from_ref(schema).ok_or_else(|| {
            ProjectionError::UnsupportedSchema {
                schema: schema.clone(),
                record_type: std::any::type_name::<AccountInfo>(),
            }
        })?;
        match mapped {
            AccountSchema::V1 => Ok(PersistentAccountInfo {
                name: self.name().to_string(),
                host: self.host().clone(),
                unique_token: self.linear_id().id(),
                status: self.status(),
            }),
        }
    }
}

pub fn supported_schemas() -> Vec<SchemaRef> {
    AccountInfo::supported_schemas()
}

pub fn project(
    record: &AccountInfo,
    schema: &SchemaRef,
) -> Result<PersistentAccountInfo, ProjectionError> {
    record.generate_mapped_object(schema)
}

/// One row per supported schema, in schema order.
pub fn project_all(
    record: &AccountInfo,
) -> Result<Vec<(SchemaRef, PersistentAccountInfo)>, ProjectionError> {
    supported_schemas()
        .into_iter()
        .map(|schema| {
            let row = project(record, &schema)?;
            Ok((schema, row))
        })
        .collect()
}
