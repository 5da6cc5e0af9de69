/// Address book entries
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum AddressStatus {
    #[default]
    Active,
    Inactive,
}

impl AddressStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "active" => Some(Self::Active),
            "inactive" => Some(Self::Inactive),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Address {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub status: AddressStatus,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Address {
    pub fn is_active(&self) -> bool {
        self.status == AddressStatus::Active
    }
}

/// Payload for create and full update.
#[derive(Debug, Clone, Deserialize)]
pub struct NewAddress {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub status: Option<AddressStatus>,
}

#[derive(Debug, Serialize)]
pub struct AddressResponse {
    pub id: String,
    pub name: String,
    pub email: String,
    pub status: AddressStatus,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Address> for AddressResponse {
    fn from(a: Address) -> Self {
        Self {
            id: a.id.to_string(),
            name: a.name,
            email: a.email,
            status: a.status,
            created_at: super::iso_timestamp(a.created_at),
            updated_at: super::iso_timestamp(a.updated_at),
        }
    }
}
