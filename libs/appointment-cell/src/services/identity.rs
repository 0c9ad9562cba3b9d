// libs/appointment-cell/src/services/identity.rs
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use shared_models::auth::UserRole;

use crate::models::AppointmentError;

/// Resolves a user id to its role. Unknown ids yield `None`.
#[async_trait]
pub trait IdentityLookup: Send + Sync {
    async fn role_of(&self, user_id: Uuid) -> Result<Option<UserRole>, AppointmentError>;
}

#[derive(Default)]
pub struct InMemoryDirectory {
    roles: RwLock<HashMap<Uuid, UserRole>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, user_id: Uuid, role: UserRole) {
        self.roles.write().await.insert(user_id, role);
    }
}

#[async_trait]
impl IdentityLookup for InMemoryDirectory {
    async fn role_of(&self, user_id: Uuid) -> Result<Option<UserRole>, AppointmentError> {
        Ok(self.roles.read().await.get(&user_id).copied())
    }
}

#[derive(Debug, Deserialize)]
struct ProfileRow {
    role: UserRole,
}

/// Looks roles up in the `profiles` table.
pub struct SupabaseIdentityLookup {
    supabase: Arc<SupabaseClient>,
}

impl SupabaseIdentityLookup {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: Arc::new(SupabaseClient::new(config)),
        }
    }

    pub fn with_client(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }
}

#[async_trait]
impl IdentityLookup for SupabaseIdentityLookup {
    async fn role_of(&self, user_id: Uuid) -> Result<Option<UserRole>, AppointmentError> {
        let path = format!("/rest/v1/profiles?id=eq.{}&select=id,role", user_id);
        debug!("Looking up role of {}", user_id);

        let rows: Vec<ProfileRow> = self.supabase.request(Method::GET, &path, None).await?;
        Ok(rows.into_iter().next().map(|row| row.role))
    }
}
