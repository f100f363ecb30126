//! `/admin/users/*` and `/admin/orgs/*` (spec.md §6): thin CRUD plus
//! lookup-by-email/name, fronting `cortex-registry`'s directory stores.
//! CORTEX owns none of the billing/entitlement logic that normally lives
//! behind these rows (spec.md §1 Non-goals) — this is the interface
//! contract only.

use axum::extract::{Extension, Path, Query, State};
use axum::Json;
use cortex_common::request_id::RequestId;
use cortex_values::{NewOrganization, NewUser, Organization, OrganizationPatch, User, UserPatch};
use serde::Deserialize;

use crate::auth_middleware::AdminPrincipal;
use crate::error::GatewayError;
use crate::state::SharedState;

fn rid(request_id: &RequestId) -> String {
    request_id.as_str().to_string()
}

pub async fn list_users(
    AdminPrincipal(_principal): AdminPrincipal,
    State(state): State<SharedState>,
    Extension(request_id): Extension<RequestId>,
) -> Result<Json<Vec<User>>, GatewayError> {
    let users = state.users.list().map_err(|err| GatewayError::new(err, rid(&request_id)))?;
    Ok(Json(users))
}

pub async fn create_user(
    AdminPrincipal(_principal): AdminPrincipal,
    State(state): State<SharedState>,
    Extension(request_id): Extension<RequestId>,
    Json(new_user): Json<NewUser>,
) -> Result<Json<User>, GatewayError> {
    let user = state.users.create(new_user).map_err(|err| GatewayError::new(err, rid(&request_id)))?;
    Ok(Json(user))
}

pub async fn get_user(
    AdminPrincipal(_principal): AdminPrincipal,
    State(state): State<SharedState>,
    Extension(request_id): Extension<RequestId>,
    Path(id): Path<i64>,
) -> Result<Json<User>, GatewayError> {
    let user = state.users.get(id).map_err(|err| GatewayError::new(err, rid(&request_id)))?;
    Ok(Json(user))
}

pub async fn update_user(
    AdminPrincipal(_principal): AdminPrincipal,
    State(state): State<SharedState>,
    Extension(request_id): Extension<RequestId>,
    Path(id): Path<i64>,
    Json(patch): Json<UserPatch>,
) -> Result<Json<User>, GatewayError> {
    let user = state.users.update(id, patch).map_err(|err| GatewayError::new(err, rid(&request_id)))?;
    Ok(Json(user))
}

pub async fn delete_user(
    AdminPrincipal(_principal): AdminPrincipal,
    State(state): State<SharedState>,
    Extension(request_id): Extension<RequestId>,
    Path(id): Path<i64>,
) -> Result<axum::http::StatusCode, GatewayError> {
    state.users.delete(id).map_err(|err| GatewayError::new(err, rid(&request_id)))?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct UserLookupQuery {
    pub email: String,
}

pub async fn lookup_user(
    AdminPrincipal(_principal): AdminPrincipal,
    State(state): State<SharedState>,
    Extension(request_id): Extension<RequestId>,
    Query(query): Query<UserLookupQuery>,
) -> Result<Json<User>, GatewayError> {
    let user = state
        .users
        .find_by_email(&query.email)
        .map_err(|err| GatewayError::new(err, rid(&request_id)))?;
    Ok(Json(user))
}

pub async fn list_organizations(
    AdminPrincipal(_principal): AdminPrincipal,
    State(state): State<SharedState>,
    Extension(request_id): Extension<RequestId>,
) -> Result<Json<Vec<Organization>>, GatewayError> {
    let orgs = state.organizations.list().map_err(|err| GatewayError::new(err, rid(&request_id)))?;
    Ok(Json(orgs))
}

pub async fn create_organization(
    AdminPrincipal(_principal): AdminPrincipal,
    State(state): State<SharedState>,
    Extension(request_id): Extension<RequestId>,
    Json(new_org): Json<NewOrganization>,
) -> Result<Json<Organization>, GatewayError> {
    let org = state.organizations.create(new_org).map_err(|err| GatewayError::new(err, rid(&request_id)))?;
    Ok(Json(org))
}

pub async fn get_organization(
    AdminPrincipal(_principal): AdminPrincipal,
    State(state): State<SharedState>,
    Extension(request_id): Extension<RequestId>,
    Path(id): Path<i64>,
) -> Result<Json<Organization>, GatewayError> {
    let org = state.organizations.get(id).map_err(|err| GatewayError::new(err, rid(&request_id)))?;
    Ok(Json(org))
}

pub async fn update_organization(
    AdminPrincipal(_principal): AdminPrincipal,
    State(state): State<SharedState>,
    Extension(request_id): Extension<RequestId>,
    Path(id): Path<i64>,
    Json(patch): Json<OrganizationPatch>,
) -> Result<Json<Organization>, GatewayError> {
    let org = state
        .organizations
        .update(id, patch)
        .map_err(|err| GatewayError::new(err, rid(&request_id)))?;
    Ok(Json(org))
}

pub async fn delete_organization(
    AdminPrincipal(_principal): AdminPrincipal,
    State(state): State<SharedState>,
    Extension(request_id): Extension<RequestId>,
    Path(id): Path<i64>,
) -> Result<axum::http::StatusCode, GatewayError> {
    state.organizations.delete(id).map_err(|err| GatewayError::new(err, rid(&request_id)))?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct OrgLookupQuery {
    pub name: String,
}

pub async fn lookup_organization(
    AdminPrincipal(_principal): AdminPrincipal,
    State(state): State<SharedState>,
    Extension(request_id): Extension<RequestId>,
    Query(query): Query<OrgLookupQuery>,
) -> Result<Json<Organization>, GatewayError> {
    let org = state
        .organizations
        .find_by_name(&query.name)
        .map_err(|err| GatewayError::new(err, rid(&request_id)))?;
    Ok(Json(org))
}
