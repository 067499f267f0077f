use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{AuditEvent, AuditSink, NewAuditEvent};
use crate::database::StoreError;

/// In-memory audit sink for tests and embedded/dev use.
///
/// Keeps every event in insertion order. Can be switched into a failing
/// mode to exercise fail-open/fail-closed policies.
#[derive(Default)]
pub struct MemoryAuditSink {
    events: Arc<RwLock<Vec<AuditEvent>>>,
    fail: Arc<RwLock<bool>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All recorded events, oldest first.
    pub async fn events(&self) -> Vec<AuditEvent> {
        self.events.read().await.clone()
    }

    /// Events matching an action name.
    pub async fn events_with_action(&self, action: &str) -> Vec<AuditEvent> {
        self.events
            .read()
            .await
            .iter()
            .filter(|e| e.action == action)
            .cloned()
            .collect()
    }

    /// Make every subsequent call fail, simulating an unavailable store.
    pub async fn set_failing(&self, failing: bool) {
        *self.fail.write().await = failing;
    }

    async fn check_failing(&self) -> Result<(), StoreError> {
        if *self.fail.read().await {
            return Err(StoreError::Unavailable("audit sink offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn record(&self, event: NewAuditEvent) -> Result<AuditEvent, StoreError> {
        self.check_failing().await?;
        let stored = AuditEvent {
            id: Uuid::new_v4(),
            user_id: event.user_id,
            tenant_id: event.tenant_id,
            action: event.action,
            resource: event.resource,
            details: event.details,
            severity: event.severity,
            ip: event.ip,
            user_agent: event.user_agent,
            created_at: Utc::now(),
        };
        self.events.write().await.push(stored.clone());
        Ok(stored)
    }

    async fn count_recent(
        &self,
        user_id: Uuid,
        action: &str,
        window: Duration,
    ) -> Result<u64, StoreError> {
        self.check_failing().await?;
        let cutoff = Utc::now()
            - chrono::Duration::from_std(window).unwrap_or_else(|_| chrono::Duration::seconds(0));
        let count = self
            .events
            .read()
            .await
            .iter()
            .filter(|e| e.user_id == Some(user_id) && e.action == action && e.created_at >= cutoff)
            .count();
        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{actions, AuditSeverity};

    #[tokio::test]
    async fn records_and_counts_by_user_and_action() {
        let sink = MemoryAuditSink::new();
        let user = Uuid::new_v4();
        let other = Uuid::new_v4();

        for _ in 0..3 {
            sink.record(
                NewAuditEvent::new(actions::ID_ENUMERATION_ATTEMPT, AuditSeverity::Info)
                    .user(user),
            )
            .await
            .unwrap();
        }
        sink.record(
            NewAuditEvent::new(actions::ID_ENUMERATION_ATTEMPT, AuditSeverity::Info).user(other),
        )
        .await
        .unwrap();

        let count = sink
            .count_recent(user, actions::ID_ENUMERATION_ATTEMPT, Duration::from_secs(300))
            .await
            .unwrap();
        assert_eq!(count, 3);
    }

    #[tokio::test]
    async fn failing_mode_surfaces_store_error() {
        let sink = MemoryAuditSink::new();
        sink.set_failing(true).await;
        let err = sink
            .record(NewAuditEvent::new("X", AuditSeverity::Info))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
    }
}
