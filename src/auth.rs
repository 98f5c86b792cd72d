use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use pgwire::api::auth::{AuthSource, LoginInfo, Password};
use pgwire::error::{PgWireError, PgWireResult};
use serde::Deserialize;
use tracing::{info, warn};

use crate::model::{Id, Principal, Role};

/// Resolves a connection's login to the principal its queries run as.
/// `None` means anonymous: public reads only.
pub trait Authenticator: Send + Sync {
    fn principal_for(&self, login: &str) -> Option<Principal>;
}

/// One entry of the accounts file.
#[derive(Debug, Clone, Deserialize)]
pub struct Account {
    pub login: String,
    pub password: String,
    pub id: Id,
    pub role: Role,
}

/// Login table: named accounts plus one shared anonymous login.
#[derive(Debug, Default)]
pub struct AccountDirectory {
    accounts: HashMap<String, Account>,
    public_login: String,
    public_password: String,
}

impl AccountDirectory {
    pub fn new(accounts: Vec<Account>, public_login: String, public_password: String) -> Self {
        Self {
            accounts: accounts.into_iter().map(|a| (a.login.clone(), a)).collect(),
            public_login,
            public_password,
        }
    }

    /// Parse a JSON array of `{login, password, id, role}` objects.
    pub fn from_json(json: &str, public_login: String, public_password: String) -> io::Result<Self> {
        let accounts: Vec<Account> =
            serde_json::from_str(json).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        if accounts.iter().any(|a| a.login == public_login) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("account {public_login:?} shadows the public login"),
            ));
        }
        Ok(Self::new(accounts, public_login, public_password))
    }

    /// Load the accounts file, or start with only the public login.
    pub fn load(path: Option<&Path>, public_login: String, public_password: String) -> io::Result<Self> {
        let Some(path) = path else {
            warn!("no accounts file configured, only the public login is available");
            return Ok(Self::new(Vec::new(), public_login, public_password));
        };
        let dir = Self::from_json(&fs::read_to_string(path)?, public_login, public_password)?;
        info!("loaded {} accounts from {}", dir.accounts.len(), path.display());
        Ok(dir)
    }

    fn password_for(&self, login: &str) -> Option<&str> {
        if login == self.public_login {
            return Some(&self.public_password);
        }
        self.accounts.get(login).map(|a| a.password.as_str())
    }
}

impl Authenticator for AccountDirectory {
    fn principal_for(&self, login: &str) -> Option<Principal> {
        self.accounts.get(login).map(|a| Principal::new(a.id, a.role))
    }
}

/// Cleartext password source for the pgwire startup handler.
#[derive(Debug)]
pub struct CoachbookAuthSource {
    directory: Arc<AccountDirectory>,
}

impl CoachbookAuthSource {
    pub fn new(directory: Arc<AccountDirectory>) -> Self {
        Self { directory }
    }
}

#[async_trait]
impl AuthSource for CoachbookAuthSource {
    async fn get_password(&self, login: &LoginInfo) -> PgWireResult<Password> {
        let user = login.user().unwrap_or_default();
        match self.directory.password_for(user) {
            Some(password) => Ok(Password::new(None, password.as_bytes().to_vec())),
            None => {
                metrics::counter!(crate::observability::AUTH_FAILURES_TOTAL).increment(1);
                warn!("login attempt for unknown account {user:?}");
                Err(PgWireError::InvalidPassword(user.to_string()))
            }
        }
    }
}
