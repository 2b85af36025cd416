//! In-memory execution history backed by moka

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache;

use crate::domain::workflow::{ExecutionContext, ExecutionHistory};

/// Bounded, time-limited store of finished runs
#[derive(Debug, Clone)]
pub struct MokaExecutionHistory {
    cache: Cache<String, Arc<ExecutionContext>>,
}

impl MokaExecutionHistory {
    pub fn new(capacity: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .time_to_live(ttl)
            .max_capacity(capacity)
            .build();

        Self { cache }
    }

    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }
}

impl Default for MokaExecutionHistory {
    fn default() -> Self {
        Self::new(1000, Duration::from_secs(3600))
    }
}

#[async_trait]
impl ExecutionHistory for MokaExecutionHistory {
    async fn record(&self, context: ExecutionContext) {
        tracing::debug!(
            execution_id = %context.execution_id,
            status = %context.status,
            "Recording execution in history"
        );

        self.cache
            .insert(context.execution_id.clone(), Arc::new(context))
            .await;
    }

    async fn get(&self, execution_id: &str) -> Option<ExecutionContext> {
        self.cache
            .get(execution_id)
            .await
            .map(|context| (*context).clone())
    }

    async fn list(&self, limit: usize) -> Vec<ExecutionContext> {
        let mut contexts: Vec<Arc<ExecutionContext>> =
            self.cache.iter().map(|(_, context)| context).collect();

        contexts.sort_by(|a, b| b.started_at.cmp(&a.started_at));

        contexts
            .into_iter()
            .take(limit)
            .map(|context| (*context).clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::workflow::ExecutionStatus;
    use chrono::{Duration as ChronoDuration, Utc};
    use serde_json::Map;

    fn finished(workflow_id: &str, age_secs: i64) -> ExecutionContext {
        let mut context = ExecutionContext::new(workflow_id, Map::new());
        context.started_at = Utc::now() - ChronoDuration::seconds(age_secs);
        context.finish(ExecutionStatus::Completed);
        context
    }

    #[tokio::test]
    async fn test_record_and_get() {
        let history = MokaExecutionHistory::default();
        let context = finished("wf", 0);
        let id = context.execution_id.clone();

        history.record(context.clone()).await;

        assert_eq!(history.get(&id).await, Some(context));
        assert!(history.get("missing").await.is_none());
    }

    #[tokio::test]
    async fn test_list_most_recent_first() {
        let history = MokaExecutionHistory::default();
        history.record(finished("old", 30)).await;
        history.record(finished("new", 1)).await;
        history.record(finished("middle", 10)).await;

        let listed: Vec<String> = history
            .list(2)
            .await
            .into_iter()
            .map(|c| c.workflow_id)
            .collect();

        assert_eq!(listed, vec!["new", "middle"]);
    }

    #[tokio::test]
    async fn test_ttl_expiry() {
        let history = MokaExecutionHistory::new(10, Duration::from_millis(50));
        let context = finished("wf", 0);
        let id = context.execution_id.clone();

        history.record(context).await;
        tokio::time::sleep(Duration::from_millis(120)).await;

        assert!(history.get(&id).await.is_none());
    }
}
