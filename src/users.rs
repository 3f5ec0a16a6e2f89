use anyhow::Result;
use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use uuid::Uuid;

use crate::config::Config;
use crate::password::hash;
use crate::storage::CreateUserValues;
use crate::storage::Storage;

/// User roles
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    /// Manage users and everybody's appointments
    Admin,
    /// Manage own appointments
    User,
}

#[derive(Clone, Debug)]
pub struct User {
    pub id: Uuid,
    pub session_id: Uuid,
    pub email: String,
    pub name: String,
    pub hashed_password: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Create the first admin when the storage has no users yet
pub async fn ensure_initial_user<S: Storage>(storage: &S, config: &Config) -> Result<()> {
    let user = storage.find_any_single_user().await?;

    if user.is_none() {
        tracing::info!("No users found, creating initial admin {}", config.initial_email);

        let hashed_password = hash(&config.initial_password)?;

        let values = CreateUserValues {
            session_id: &Uuid::new_v4(),
            role: Role::Admin,
            email: &config.initial_email,
            name: "Administrator",
            hashed_password: &hashed_password,
        };

        storage.create_user(&values).await?;
    }

    Ok(())
}
