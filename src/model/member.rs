use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum MembershipType {
    Basic,
    Premium,
    Vip,
}

impl MembershipType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MembershipType::Basic => "basic",
            MembershipType::Premium => "premium",
            MembershipType::Vip => "vip",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum MembershipStatus {
    Active,
    Inactive,
    Expired,
    Suspended,
}

impl MembershipStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MembershipStatus::Active => "active",
            MembershipStatus::Inactive => "inactive",
            MembershipStatus::Expired => "expired",
            MembershipStatus::Suspended => "suspended",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "active" => Some(MembershipStatus::Active),
            "inactive" => Some(MembershipStatus::Inactive),
            "expired" => Some(MembershipStatus::Expired),
            "suspended" => Some(MembershipStatus::Suspended),
            _ => None,
        }
    }

    /// Only active memberships may check in.
    pub fn is_eligible(&self) -> bool {
        matches!(self, MembershipStatus::Active)
    }
}

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
#[schema(
    example = json!({
        "id": 42,
        "user_id": 7,
        "name": "Jane Doe",
        "email": "jane@example.com",
        "phone": "+15551234567",
        "membership_type": "premium",
        "membership_status": "active",
        "membership_start_date": "2026-01-01",
        "membership_end_date": null,
        "emergency_contact_name": "John Doe",
        "emergency_contact_phone": "+15557654321",
        "emergency_contact_relationship": "spouse",
        "notes": null,
        "created_at": "2026-01-01T00:00:00Z"
    })
)]
pub struct Member {
    #[schema(example = 42)]
    pub id: u64,

    #[schema(example = 7, nullable = true)]
    pub user_id: Option<u64>,

    #[schema(example = "Jane Doe")]
    pub name: String,

    #[schema(example = "jane@example.com")]
    pub email: String,

    #[schema(example = "+15551234567", nullable = true)]
    pub phone: Option<String>,

    #[schema(example = "premium")]
    pub membership_type: String,

    #[schema(example = "active")]
    pub membership_status: String,

    #[schema(example = "2026-01-01", format = "date", value_type = String)]
    pub membership_start_date: NaiveDate,

    #[schema(example = "2026-12-31", format = "date", value_type = String, nullable = true)]
    pub membership_end_date: Option<NaiveDate>,

    pub emergency_contact_name: Option<String>,
    pub emergency_contact_phone: Option<String>,
    pub emergency_contact_relationship: Option<String>,
    pub notes: Option<String>,

    #[schema(example = "2026-01-01T00:00:00Z", format = "date-time", value_type = String)]
    pub created_at: DateTime<Utc>,
}

/// Active membership whose end date falls inside the reporting horizon.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow, ToSchema)]
pub struct ExpiringMembership {
    #[schema(example = 42)]
    pub id: u64,
    #[schema(example = "Jane Doe")]
    pub name: String,
    #[schema(example = "jane@example.com")]
    pub email: String,
    #[schema(example = "premium")]
    pub membership_type: String,
    #[schema(example = "2026-11-01", format = "date", value_type = String)]
    pub membership_end_date: NaiveDate,
}
