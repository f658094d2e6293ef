//! Identity gate: resolves a bearer credential to a customer or operator.

use crate::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::collections::HashMap;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Customer,
    Operator,
}

impl FromStr for Role {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "customer" => Ok(Role::Customer),
            "operator" => Ok(Role::Operator),
            other => Err(Error::Storage(format!("unknown role {other:?}"))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    pub id: Uuid,
    pub role: Role,
    pub name: String,
}

impl Identity {
    pub fn require_operator(&self) -> Result<Uuid> {
        match self.role {
            Role::Operator => Ok(self.id),
            Role::Customer => Err(Error::Forbidden),
        }
    }
}

#[async_trait]
pub trait IdentityGate: Send + Sync {
    async fn authenticate(&self, credential: &str) -> Result<Identity>;
}

/// Extracts the credential from an `Authorization: Bearer <token>` header value.
pub fn bearer_credential(header: Option<&str>) -> Result<&str> {
    let value = header.ok_or(Error::Unauthenticated)?;
    let (scheme, token) = value.split_once(' ').ok_or(Error::Unauthenticated)?;
    let token = token.trim();
    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() { return Err(Error::Unauthenticated); }
    Ok(token)
}

/// Looks credentials up in the `access_tokens` table issued by the auth service.
#[derive(Clone)]
pub struct PgIdentityGate { db: PgPool }

impl PgIdentityGate {
    pub fn new(db: PgPool) -> Self { Self { db } }
}

#[derive(sqlx::FromRow)]
struct TokenRow { user_id: Uuid, role: String, display_name: String }

#[async_trait]
impl IdentityGate for PgIdentityGate {
    async fn authenticate(&self, credential: &str) -> Result<Identity> {
        let row = sqlx::query_as::<_, TokenRow>("SELECT user_id, role, display_name FROM access_tokens WHERE token = $1 AND expires_at > NOW()")
            .bind(credential).fetch_optional(&self.db).await?.ok_or(Error::Unauthenticated)?;
        Ok(Identity { id: row.user_id, role: row.role.parse()?, name: row.display_name })
    }
}

/// Fixed credential table, for tests and local runs.
#[derive(Clone, Default)]
pub struct StaticIdentityGate { tokens: HashMap<String, Identity> }

impl StaticIdentityGate {
    pub fn new() -> Self { Self::default() }

    pub fn with(mut self, token: impl Into<String>, identity: Identity) -> Self {
        self.tokens.insert(token.into(), identity);
        self
    }
}

#[async_trait]
impl IdentityGate for StaticIdentityGate {
    async fn authenticate(&self, credential: &str) -> Result<Identity> {
        self.tokens.get(credential).cloned().ok_or(Error::Unauthenticated)
    }
}
