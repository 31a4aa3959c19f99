//! Hierarchy change notifications.
//!
//! Mutations publish a `HierarchyChangeEvent` onto a broadcast bus consumed
//! by sibling systems. Delivery is best-effort and at-most-once: a publish
//! failure is logged and swallowed, never rolled back into the originating
//! store mutation. An in-process listener projects every event into the
//! `activity_log` table, chained with SHA-256 for tamper evidence.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use tokio::sync::broadcast;
use uuid::Uuid;

pub const HIERARCHY_CHANGE: &str = "HIERARCHY_CHANGE";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HierarchyOperation {
    Create,
    Update,
    Delete,
    PolicyChange,
    PresetApplied,
    TenantLinked,
}

impl HierarchyOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            HierarchyOperation::Create => "CREATE",
            HierarchyOperation::Update => "UPDATE",
            HierarchyOperation::Delete => "DELETE",
            HierarchyOperation::PolicyChange => "POLICY_CHANGE",
            HierarchyOperation::PresetApplied => "PRESET_APPLIED",
            HierarchyOperation::TenantLinked => "TENANT_LINKED",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HierarchyChangeEvent {
    pub id: Uuid,
    pub event_type: String,
    pub operation: HierarchyOperation,
    pub organization_id: Uuid,
    pub actor_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before_state: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after_state: Option<Value>,
    pub affected_children: Vec<Uuid>,
    pub affected_tenants: Vec<Uuid>,
    pub timestamp: DateTime<Utc>,
}

impl HierarchyChangeEvent {
    pub fn new(
        operation: HierarchyOperation,
        organization_id: Uuid,
        actor_id: Option<Uuid>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type: HIERARCHY_CHANGE.to_string(),
            operation,
            organization_id,
            actor_id,
            before_state: None,
            after_state: None,
            affected_children: Vec::new(),
            affected_tenants: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_before(mut self, state: Value) -> Self {
        self.before_state = Some(state);
        self
    }

    pub fn with_after(mut self, state: Value) -> Self {
        self.after_state = Some(state);
        self
    }

    pub fn with_children(mut self, children: Vec<Uuid>) -> Self {
        self.affected_children = children;
        self
    }

    pub fn with_tenants(mut self, tenants: Vec<Uuid>) -> Self {
        self.affected_tenants = tenants;
        self
    }
}

pub type EventBus = broadcast::Sender<HierarchyChangeEvent>;

pub fn init_event_bus() -> (EventBus, broadcast::Receiver<HierarchyChangeEvent>) {
    broadcast::channel(1024)
}

/// Fire-and-forget publish. The store is the source of truth; a missed
/// notification is repaired by the out-of-band reconciliation sweep, not by
/// failing the mutation.
pub fn publish(bus: &EventBus, event: HierarchyChangeEvent) {
    let operation = event.operation;
    let organization_id = event.organization_id;
    if let Err(err) = bus.send(event) {
        tracing::warn!(
            operation = operation.as_str(),
            organization_id = %organization_id,
            "hierarchy change event dropped: {err}"
        );
    }
}

/// Project hierarchy-change events into the activity log. Each row carries
/// `hash = SHA256(prev_hash || payload)` over the previous row's hash.
pub async fn start_activity_listener(
    mut rx: broadcast::Receiver<HierarchyChangeEvent>,
    pool: SqlitePool,
) {
    tracing::info!("hierarchy activity listener started");
    loop {
        let event = match rx.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "activity listener lagged; events skipped");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };

        if let Err(err) = append_activity(&pool, &event).await {
            tracing::error!(
                event_id = %event.id,
                "failed to append activity log entry: {err}"
            );
        }
    }
}

async fn append_activity(pool: &SqlitePool, event: &HierarchyChangeEvent) -> anyhow::Result<()> {
    let payload = serde_json::to_string(event)?;

    let prev_hash: Option<String> =
        sqlx::query_scalar("SELECT hash FROM activity_log ORDER BY occurred_at DESC, id DESC LIMIT 1")
            .fetch_optional(pool)
            .await?;

    let mut hasher = Sha256::new();
    if let Some(ref prev) = prev_hash {
        hasher.update(prev.as_bytes());
    }
    hasher.update(payload.as_bytes());
    let hash = hex::encode(hasher.finalize());

    sqlx::query(
        "INSERT INTO activity_log (id, event_name, operation, organization_id, actor_id, occurred_at, properties, prev_hash, hash) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(&event.event_type)
    .bind(event.operation.as_str())
    .bind(event.organization_id.to_string())
    .bind(event.actor_id.map(|a| a.to_string()))
    .bind(event.timestamp)
    .bind(&payload)
    .bind(&prev_hash)
    .bind(&hash)
    .execute(pool)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_without_receivers_is_swallowed() {
        let (bus, rx) = init_event_bus();
        drop(rx);
        // Must not panic or error out to the caller.
        publish(
            &bus,
            HierarchyChangeEvent::new(HierarchyOperation::Create, Uuid::new_v4(), None),
        );
    }

    #[test]
    fn event_serializes_with_stable_operation_names() {
        let event = HierarchyChangeEvent::new(
            HierarchyOperation::PolicyChange,
            Uuid::new_v4(),
            Some(Uuid::new_v4()),
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event_type"], "HIERARCHY_CHANGE");
        assert_eq!(json["operation"], "POLICY_CHANGE");
        assert!(json.get("before_state").is_none());
    }
}
