//! AgentToken entity: bearer credential presented at REGISTER.

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "agent_tokens")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    /// One token per agent.
    pub agent_name: String,
    /// SHA-256 hex of the raw token; the raw value is never stored.
    pub token_hash: String,
    /// First 8 chars of the raw token, display only.
    pub token_prefix: String,
    pub description: String,
    pub expires_at: Option<DateTimeUtc>,
    pub revoked: bool,
    pub last_used_at: Option<DateTimeUtc>,
    pub created_by: String,
    pub created_at: DateTimeUtc,
}

impl Model {
    /// A token admits a REGISTER iff it is neither revoked nor expired.
    pub fn is_valid(&self, now: DateTimeUtc) -> bool {
        if self.revoked {
            return false;
        }
        match self.expires_at {
            Some(expiry) => now < expiry,
            None => true,
        }
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn token() -> Model {
        Model {
            id: 1,
            agent_name: "tenant-1".into(),
            token_hash: "ab".repeat(32),
            token_prefix: "dlk_1234".into(),
            description: String::new(),
            expires_at: None,
            revoked: false,
            last_used_at: None,
            created_by: String::new(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn revoked_token_never_admits() {
        let mut t = token();
        t.revoked = true;
        assert!(!t.is_valid(Utc::now()));
    }

    #[test]
    fn expired_token_never_admits() {
        let mut t = token();
        t.expires_at = Some(Utc::now() - Duration::hours(1));
        assert!(!t.is_valid(Utc::now()));
    }

    #[test]
    fn live_token_admits() {
        let mut t = token();
        assert!(t.is_valid(Utc::now()));
        t.expires_at = Some(Utc::now() + Duration::days(30));
        assert!(t.is_valid(Utc::now()));
    }
}
