// libs/doctor-cell/src/services/store.rs
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Method;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{ScheduleError, ScheduleRule};

/// Durable home of schedule rules. Rules are read and written as whole
/// records and never physically deleted.
#[async_trait]
pub trait ScheduleRuleStore: Send + Sync {
    async fn insert(&self, rule: ScheduleRule) -> Result<ScheduleRule, ScheduleError>;

    async fn get(&self, rule_id: Uuid) -> Result<Option<ScheduleRule>, ScheduleError>;

    async fn update(&self, rule: ScheduleRule) -> Result<ScheduleRule, ScheduleError>;

    async fn rules_for_doctor(
        &self,
        doctor_id: Uuid,
        include_inactive: bool,
    ) -> Result<Vec<ScheduleRule>, ScheduleError>;

    async fn active_rules_for(&self, doctor_id: Uuid) -> Result<Vec<ScheduleRule>, ScheduleError> {
        self.rules_for_doctor(doctor_id, false).await
    }
}

#[derive(Default)]
pub struct InMemoryScheduleRuleStore {
    rules: RwLock<HashMap<Uuid, ScheduleRule>>,
}

impl InMemoryScheduleRuleStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ScheduleRuleStore for InMemoryScheduleRuleStore {
    async fn insert(&self, rule: ScheduleRule) -> Result<ScheduleRule, ScheduleError> {
        let mut rules = self.rules.write().await;
        rules.insert(rule.id, rule.clone());
        Ok(rule)
    }

    async fn get(&self, rule_id: Uuid) -> Result<Option<ScheduleRule>, ScheduleError> {
        Ok(self.rules.read().await.get(&rule_id).cloned())
    }

    async fn update(&self, rule: ScheduleRule) -> Result<ScheduleRule, ScheduleError> {
        let mut rules = self.rules.write().await;
        match rules.get_mut(&rule.id) {
            Some(existing) => {
                *existing = rule.clone();
                Ok(rule)
            }
            None => Err(ScheduleError::NotFound(rule.id)),
        }
    }

    async fn rules_for_doctor(
        &self,
        doctor_id: Uuid,
        include_inactive: bool,
    ) -> Result<Vec<ScheduleRule>, ScheduleError> {
        let rules = self.rules.read().await;
        let mut matching: Vec<ScheduleRule> = rules
            .values()
            .filter(|rule| rule.doctor_id == doctor_id && (include_inactive || rule.is_active))
            .cloned()
            .collect();
        matching.sort_by_key(|rule| (rule.priority, rule.id));
        Ok(matching)
    }
}

/// Rules persisted in the `schedule_rules` table behind PostgREST.
pub struct SupabaseScheduleRuleStore {
    supabase: Arc<SupabaseClient>,
}

impl SupabaseScheduleRuleStore {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: Arc::new(SupabaseClient::new(config)),
        }
    }

    pub fn with_client(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    fn first(rows: Vec<ScheduleRule>, rule_id: Uuid) -> Result<ScheduleRule, ScheduleError> {
        rows.into_iter().next().ok_or(ScheduleError::NotFound(rule_id))
    }
}

#[async_trait]
impl ScheduleRuleStore for SupabaseScheduleRuleStore {
    async fn insert(&self, rule: ScheduleRule) -> Result<ScheduleRule, ScheduleError> {
        let body = serde_json::to_value(&rule)
            .map_err(|e| ScheduleError::Database(format!("Failed to encode rule: {}", e)))?;

        let rows: Vec<ScheduleRule> = self.supabase.request_returning(
            Method::POST,
            "/rest/v1/schedule_rules",
            Some(body),
        ).await?;

        Self::first(rows, rule.id)
    }

    async fn get(&self, rule_id: Uuid) -> Result<Option<ScheduleRule>, ScheduleError> {
        let path = format!("/rest/v1/schedule_rules?id=eq.{}", rule_id);
        let rows: Vec<ScheduleRule> = self.supabase.request(Method::GET, &path, None).await?;
        Ok(rows.into_iter().next())
    }

    async fn update(&self, rule: ScheduleRule) -> Result<ScheduleRule, ScheduleError> {
        let path = format!("/rest/v1/schedule_rules?id=eq.{}", rule.id);
        let body = serde_json::to_value(&rule)
            .map_err(|e| ScheduleError::Database(format!("Failed to encode rule: {}", e)))?;

        let rows: Vec<ScheduleRule> = self.supabase.request_returning(
            Method::PATCH,
            &path,
            Some(body),
        ).await?;

        Self::first(rows, rule.id)
    }

    async fn rules_for_doctor(
        &self,
        doctor_id: Uuid,
        include_inactive: bool,
    ) -> Result<Vec<ScheduleRule>, ScheduleError> {
        debug!("Fetching schedule rules for doctor {}", doctor_id);

        let mut path = format!("/rest/v1/schedule_rules?doctor_id=eq.{}", doctor_id);
        if !include_inactive {
            path.push_str("&is_active=eq.true");
        }
        path.push_str("&order=priority.asc,id.asc");

        let rows: Vec<ScheduleRule> = self.supabase.request(Method::GET, &path, None).await?;
        Ok(rows)
    }
}
