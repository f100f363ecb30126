//! Thin `User`/`Organization` CRUD (spec.md §6): CORTEX only needs to
//! expose the admin surface's contract, not the billing/entitlement logic
//! that lives in the org/billing CRUD system the spec treats as an
//! external collaborator (spec.md §1 Non-goals).

use crate::store::{self, Store};
use cortex_common::error::{CortexError, ErrorKind};
use cortex_values::{NewOrganization, NewUser, Organization, OrganizationPatch, User, UserPatch};
use chrono::Utc;
use std::sync::Arc;

pub struct UserDirectory {
    store: Arc<Store>,
}

impl UserDirectory {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    pub fn create(&self, new_user: NewUser) -> Result<User, CortexError> {
        let id = self.store.next_id().map_err(CortexError::from)?;
        let user = User {
            id,
            email: new_user.email,
            is_admin: new_user.is_admin,
            organization_id: new_user.organization_id,
            disabled: false,
            created_at: Utc::now(),
        };
        let tree = self.store.open_tree("users").map_err(CortexError::from)?;
        store::put_row(&tree, &id.to_be_bytes(), &user).map_err(CortexError::from)?;
        Ok(user)
    }

    pub fn get(&self, id: i64) -> Result<User, CortexError> {
        let tree = self.store.open_tree("users").map_err(CortexError::from)?;
        store::get_row::<User>(&tree, &id.to_be_bytes())
            .map_err(CortexError::from)?
            .ok_or_else(|| CortexError::new(ErrorKind::ModelNotFound, format!("user {id} not found")))
    }

    pub fn find_by_email(&self, email: &str) -> Result<User, CortexError> {
        let tree = self.store.open_tree("users").map_err(CortexError::from)?;
        store::scan_rows::<User>(&tree)
            .map_err(CortexError::from)?
            .into_iter()
            .find(|u| u.email == email)
            .ok_or_else(|| CortexError::new(ErrorKind::ModelNotFound, format!("no user with email '{email}'")))
    }

    pub fn list(&self) -> Result<Vec<User>, CortexError> {
        let tree = self.store.open_tree("users").map_err(CortexError::from)?;
        store::scan_rows(&tree).map_err(CortexError::from)
    }

    pub fn update(&self, id: i64, patch: UserPatch) -> Result<User, CortexError> {
        let mut user = self.get(id)?;
        if let Some(email) = patch.email {
            user.email = email;
        }
        if let Some(is_admin) = patch.is_admin {
            user.is_admin = is_admin;
        }
        if let Some(org) = patch.organization_id {
            user.organization_id = org;
        }
        if let Some(disabled) = patch.disabled {
            user.disabled = disabled;
        }
        let tree = self.store.open_tree("users").map_err(CortexError::from)?;
        store::put_row(&tree, &id.to_be_bytes(), &user).map_err(CortexError::from)?;
        Ok(user)
    }

    pub fn delete(&self, id: i64) -> Result<(), CortexError> {
        self.get(id)?;
        let tree = self.store.open_tree("users").map_err(CortexError::from)?;
        tree.remove(id.to_be_bytes())
            .map_err(anyhow::Error::from)
            .map_err(CortexError::from)?;
        Ok(())
    }
}

pub struct OrganizationDirectory {
    store: Arc<Store>,
}

impl OrganizationDirectory {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    pub fn create(&self, new_org: NewOrganization) -> Result<Organization, CortexError> {
        let id = self.store.next_id().map_err(CortexError::from)?;
        let org = Organization {
            id,
            name: new_org.name,
            created_at: Utc::now(),
        };
        let tree = self.store.open_tree("organizations").map_err(CortexError::from)?;
        store::put_row(&tree, &id.to_be_bytes(), &org).map_err(CortexError::from)?;
        Ok(org)
    }

    pub fn get(&self, id: i64) -> Result<Organization, CortexError> {
        let tree = self.store.open_tree("organizations").map_err(CortexError::from)?;
        store::get_row::<Organization>(&tree, &id.to_be_bytes())
            .map_err(CortexError::from)?
            .ok_or_else(|| CortexError::new(ErrorKind::ModelNotFound, format!("organization {id} not found")))
    }

    pub fn find_by_name(&self, name: &str) -> Result<Organization, CortexError> {
        let tree = self.store.open_tree("organizations").map_err(CortexError::from)?;
        store::scan_rows::<Organization>(&tree)
            .map_err(CortexError::from)?
            .into_iter()
            .find(|o| o.name == name)
            .ok_or_else(|| CortexError::new(ErrorKind::ModelNotFound, format!("no organization named '{name}'")))
    }

    pub fn list(&self) -> Result<Vec<Organization>, CortexError> {
        let tree = self.store.open_tree("organizations").map_err(CortexError::from)?;
        store::scan_rows(&tree).map_err(CortexError::from)
    }

    pub fn update(&self, id: i64, patch: OrganizationPatch) -> Result<Organization, CortexError> {
        let mut org = self.get(id)?;
        if let Some(name) = patch.name {
            org.name = name;
        }
        let tree = self.store.open_tree("organizations").map_err(CortexError::from)?;
        store::put_row(&tree, &id.to_be_bytes(), &org).map_err(CortexError::from)?;
        Ok(org)
    }

    pub fn delete(&self, id: i64) -> Result<(), CortexError> {
        self.get(id)?;
        let tree = self.store.open_tree("organizations").map_err(CortexError::from)?;
        tree.remove(id.to_be_bytes())
            .map_err(anyhow::Error::from)
            .map_err(CortexError::from)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_crud_round_trips() {
        let dir = UserDirectory::new(Arc::new(Store::open_temporary().unwrap()));
        let user = dir
            .create(NewUser { email: "a@example.com".into(), is_admin: false, organization_id: None })
            .unwrap();
        assert_eq!(dir.find_by_email("a@example.com").unwrap().id, user.id);

        let updated = dir.update(user.id, UserPatch { disabled: Some(true), ..Default::default() }).unwrap();
        assert!(updated.disabled);

        dir.delete(user.id).unwrap();
        assert_eq!(dir.get(user.id).unwrap_err().kind(), ErrorKind::ModelNotFound);
    }

    #[test]
    fn organization_crud_round_trips() {
        let dir = OrganizationDirectory::new(Arc::new(Store::open_temporary().unwrap()));
        let org = dir.create(NewOrganization { name: "Acme".into() }).unwrap();
        assert_eq!(dir.find_by_name("Acme").unwrap().id, org.id);
        let updated = dir.update(org.id, OrganizationPatch { name: Some("Acme Inc".into()) }).unwrap();
        assert_eq!(updated.name, "Acme Inc");
        dir.delete(org.id).unwrap();
        assert!(dir.get(org.id).is_err());
    }
}
