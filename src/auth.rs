//! Authentication collaborator. The real identity backend lives outside this
//! crate; the router only consumes the trait below plus identity-change
//! notifications delivered through `PersistenceRouter::handle_auth_change`.

use std::cell::RefCell;
use std::collections::BTreeMap;

use thiserror::Error;
use uuid::Uuid;

/// A remote identity asserted by the authentication backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub email: String,
    pub display_name: Option<String>,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("account `{0}` already exists")]
    AlreadyExists(String),
    #[error("auth backend error: {0}")]
    Backend(String),
}

pub trait AuthProvider {
    fn sign_in(&self, email: &str, password: &str) -> Result<Identity, AuthError>;
    fn sign_up(
        &self,
        email: &str,
        password: &str,
        display_name: Option<&str>,
    ) -> Result<Identity, AuthError>;
    fn sign_out(&self) -> Result<(), AuthError>;
}

/// In-memory [`AuthProvider`] backing the test suites.
#[derive(Debug, Default)]
pub struct MemoryAuth {
    accounts: RefCell<BTreeMap<String, (String, Identity)>>,
}

impl MemoryAuth {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-registers an account and returns its identity.
    pub fn register(&self, email: &str, password: &str) -> Identity {
        let identity = Identity {
            user_id: Uuid::new_v4().simple().to_string(),
            email: email.to_string(),
            display_name: None,
        };
        self.accounts.borrow_mut().insert(
            email.to_string(),
            (password.to_string(), identity.clone()),
        );
        identity
    }
}

impl AuthProvider for MemoryAuth {
    fn sign_in(&self, email: &str, password: &str) -> Result<Identity, AuthError> {
        match self.accounts.borrow().get(email) {
            Some((stored, identity)) if stored == password => Ok(identity.clone()),
            _ => Err(AuthError::InvalidCredentials),
        }
    }

    fn sign_up(
        &self,
        email: &str,
        password: &str,
        display_name: Option<&str>,
    ) -> Result<Identity, AuthError> {
        if self.accounts.borrow().contains_key(email) {
            return Err(AuthError::AlreadyExists(email.to_string()));
        }
        let mut identity = self.register(email, password);
        if let Some(name) = display_name {
            identity.display_name = Some(name.to_string());
            self.accounts
                .borrow_mut()
                .insert(email.to_string(), (password.to_string(), identity.clone()));
        }
        Ok(identity)
    }

    fn sign_out(&self) -> Result<(), AuthError> {
        Ok(())
    }
}
