use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use pgwire::api::auth::{AuthSource, LoginInfo, Password};
use pgwire::error::{ErrorInfo, PgWireError, PgWireResult};

use crate::model::{Actor, Role};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaffMember {
    pub name: String,
    pub password: String,
    pub role: Role,
}

impl StaffMember {
    pub fn actor(&self) -> Actor {
        Actor::new(self.name.clone(), self.role)
    }
}

/// Staff who may log in, keyed by login name.
#[derive(Debug, Clone, Default)]
pub struct StaffDirectory {
    members: HashMap<String, StaffMember>,
}

impl StaffDirectory {
    /// Returns false if the name is already taken.
    pub fn insert(&mut self, member: StaffMember) -> bool {
        if self.members.contains_key(&member.name) {
            return false;
        }
        self.members.insert(member.name.clone(), member);
        true
    }

    pub fn get(&self, name: &str) -> Option<&StaffMember> {
        self.members.get(name)
    }

    pub fn actor(&self, name: &str) -> Option<Actor> {
        self.get(name).map(StaffMember::actor)
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }
}

/// Cleartext password lookup against the staff directory. The login user
/// name is the staff name.
#[derive(Debug)]
pub struct StaffAuthSource {
    directory: Arc<StaffDirectory>,
}

impl StaffAuthSource {
    pub fn new(directory: Arc<StaffDirectory>) -> Self {
        Self { directory }
    }
}

#[async_trait]
impl AuthSource for StaffAuthSource {
    async fn get_password(&self, login: &LoginInfo) -> PgWireResult<Password> {
        let user = login.user().unwrap_or_default();
        match self.directory.get(user) {
            Some(member) => Ok(Password::new(None, member.password.as_bytes().to_vec())),
            None => {
                metrics::counter!(crate::observability::AUTH_FAILURES_TOTAL).increment(1);
                tracing::warn!(user, "login for unknown staff member");
                Err(PgWireError::UserError(Box::new(ErrorInfo::new(
                    "FATAL".into(),
                    "28P01".into(),
                    format!("password authentication failed for user \"{user}\""),
                ))))
            }
        }
    }
}
