use std::time::Instant;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use tracing::info;

pub const TIMING_TARGET: &str = "forge.timing";

#[derive(Debug)]
pub struct ActionTimer {
    action: String,
    session_id: String,
    character: Option<String>,
    started_at: DateTime<Utc>,
    started_perf: Instant,
    status: String,
    detail: Option<String>,
    completed: bool,
}

impl ActionTimer {
    pub fn new(action: &str, session_id: &str, character: Option<&str>) -> Self {
        let character = character
            .map(|value| value.replace('\n', " "))
            .filter(|value| !value.trim().is_empty())
            .map(|value| value.chars().take(120).collect());
        ActionTimer {
            action: action.to_string(),
            session_id: session_id.to_string(),
            character,
            started_at: Utc::now(),
            started_perf: Instant::now(),
            status: "success".to_string(),
            detail: None,
            completed: false,
        }
    }

    pub fn log_received(&self) {
        info!(
            target: "forge.timing",
            "event=action_received action={} session_id={} received_at={} character={:?}",
            self.action,
            self.session_id,
            self.started_at.to_rfc3339(),
            self.character
        );
    }

    pub fn mark_status(&mut self, status: &str, detail: Option<String>) {
        self.status = status.to_string();
        self.detail = detail;
    }

    pub fn log_completed(&mut self) {
        if self.completed {
            return;
        }
        self.completed = true;
        let completed_at = Utc::now();
        let duration = self.started_perf.elapsed().as_secs_f64();
        info!(
            target: "forge.timing",
            "event=action_completed action={} session_id={} started_at={} completed_at={} duration_s={:.3} status={} detail={}",
            self.action,
            self.session_id,
            self.started_at.to_rfc3339(),
            completed_at.to_rfc3339(),
            duration,
            self.status,
            self.detail.clone().unwrap_or_default()
        );
    }
}

impl Drop for ActionTimer {
    fn drop(&mut self) {
        self.log_completed();
    }
}

pub fn start_action_timer(action: &str, session_id: &str, character: Option<&str>) -> ActionTimer {
    let timer = ActionTimer::new(action, session_id, character);
    timer.log_received();
    timer
}

pub async fn log_llm_timing<T, E, F, Fut>(
    provider: &str,
    model: &str,
    operation: &str,
    metadata: Option<JsonValue>,
    call: F,
) -> Result<T, E>
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
{
    let started_at = Utc::now();
    let started_perf = Instant::now();
    let metadata_text = metadata
        .as_ref()
        .map(|value| value.to_string())
        .unwrap_or_else(|| "{}".to_string());
    info!(
        target: "forge.timing",
        "event=llm_request provider={} model={} operation={} started_at={} metadata={}",
        provider,
        model,
        operation,
        started_at.to_rfc3339(),
        metadata_text
    );

    let result = call().await;
    let status = if result.is_err() { "error" } else { "success" };

    let completed_at = Utc::now();
    let duration = started_perf.elapsed().as_secs_f64();
    info!(
        target: "forge.timing",
        "event=llm_response provider={} model={} operation={} completed_at={} duration_s={:.3} status={} metadata={}",
        provider,
        model,
        operation,
        completed_at.to_rfc3339(),
        duration,
        status,
        metadata_text
    );

    result
}
