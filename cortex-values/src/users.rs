//! `User`/`Organization` rows (spec.md §6): CORTEX exposes thin CRUD for
//! these over the admin API, but owns none of the billing/entitlement
//! logic that lives in the org/billing CRUD system named out of scope in
//! spec.md §1 — these are the interface-only shapes that contract
//! describes, not a billing domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Organization {
    pub id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub is_admin: bool,
    pub organization_id: Option<i64>,
    pub disabled: bool,
    pub created_at: DateTime<Utc>,
}

/// Fields accepted on creation; closed, like every other ingress struct.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewUser {
    pub email: String,
    pub is_admin: bool,
    pub organization_id: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewOrganization {
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct UserPatch {
    pub email: Option<String>,
    pub is_admin: Option<bool>,
    pub organization_id: Option<Option<i64>>,
    pub disabled: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct OrganizationPatch {
    pub name: Option<String>,
}
