use crate::crm::summarize_leads;
use crate::llm::LLMProvider;
use crate::shared::models::schema::{conversations, leads, messages};
use crate::shared::state::AppState;
use crate::shared::utils::DbPool;
use crate::shared::{tenant_from_headers, TenantCtx};
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use diesel::prelude::*;
use log::{error, info, warn};
use serde_json::{json, Value};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Background work dispatched fire-and-forget from request handlers. The
/// queue retries a failed job once before dropping it with an error log and
/// a notification row, which is the extent of the at-least-once contract.
#[derive(Debug, Clone)]
pub enum Job {
    GenerateDailyInsights { business_id: Uuid },
    GenerateReport { business_id: Uuid },
}

impl Job {
    fn label(&self) -> &'static str {
        match self {
            Job::GenerateDailyInsights { .. } => "daily_insights",
            Job::GenerateReport { .. } => "report",
        }
    }

    fn business_id(&self) -> Uuid {
        match self {
            Job::GenerateDailyInsights { business_id } | Job::GenerateReport { business_id } => {
                *business_id
            }
        }
    }
}

#[derive(Clone)]
pub struct JobQueue {
    tx: mpsc::UnboundedSender<Job>,
}

impl JobQueue {
    /// Spawns the worker loop and returns the enqueue handle.
    pub fn start(pool: DbPool, llm: Arc<dyn LLMProvider>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();

        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                let label = job.label();
                let business_id = job.business_id();
                let succeeded =
                    run_with_retry(label, || run_job(pool.clone(), llm.clone(), job.clone()))
                        .await;

                if !succeeded {
                    let tenant = TenantCtx::new(business_id);
                    if let Ok(mut conn) = pool.get() {
                        let body = format!("Background job '{}' failed twice and was dropped", label);
                        if let Err(e) =
                            crate::notify::notify(&mut conn, &tenant, "job_failed", label, &body)
                        {
                            error!("Failed to record job failure notification: {}", e);
                        }
                    }
                }
            }
            info!("Job queue worker stopped");
        });

        Self { tx }
    }

    /// Fire-and-forget: callers do not wait for completion and get no
    /// ordering guarantee relative to other jobs.
    pub fn enqueue(&self, job: Job) {
        if let Err(e) = self.tx.send(job) {
            error!("Job queue is down, dropping job: {}", e);
        }
    }
}

/// Runs a job, retrying once on failure.
async fn run_with_retry<F, Fut>(label: &str, mut attempt: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<()>>,
{
    match attempt().await {
        Ok(()) => return true,
        Err(e) => warn!("Job '{}' failed, retrying once: {}", label, e),
    }
    match attempt().await {
        Ok(()) => true,
        Err(e) => {
            error!("Job '{}' failed after retry: {}", label, e);
            false
        }
    }
}

async fn run_job(pool: DbPool, llm: Arc<dyn LLMProvider>, job: Job) -> anyhow::Result<()> {
    match job {
        Job::GenerateDailyInsights { business_id } => {
            generate_daily_insights(&pool, &llm, business_id).await
        }
        Job::GenerateReport { business_id } => generate_report(&pool, business_id),
    }
}

async fn generate_daily_insights(
    pool: &DbPool,
    llm: &Arc<dyn LLMProvider>,
    business_id: Uuid,
) -> anyhow::Result<()> {
    let tenant = TenantCtx::new(business_id);

    let stats = {
        let mut conn = pool.get()?;
        let rows: Vec<(String, Option<f64>)> = leads::table
            .filter(leads::business_id.eq(business_id))
            .select((leads::status, leads::estimated_value))
            .load(&mut conn)?;
        summarize_leads(&rows)
    };

    let prompt = format!(
        "Summarize this sales pipeline snapshot in two short sentences for a \
         business owner. Focus on what changed and what needs attention.\n{}",
        stats
    );
    let insight = llm
        .generate(&prompt, &json!({}))
        .await
        .map_err(|e| anyhow::anyhow!("LLM insight generation failed: {}", e))?;

    let mut conn = pool.get()?;
    crate::notify::notify(&mut conn, &tenant, "daily_insight", "Daily insight", &insight)?;
    info!("Daily insight stored for business {}", business_id);
    Ok(())
}

fn generate_report(pool: &DbPool, business_id: Uuid) -> anyhow::Result<()> {
    let tenant = TenantCtx::new(business_id);
    let mut conn = pool.get()?;

    let conversation_count: i64 = conversations::table
        .filter(conversations::business_id.eq(business_id))
        .count()
        .get_result(&mut conn)?;
    let message_count: i64 = messages::table
        .filter(messages::business_id.eq(business_id))
        .count()
        .get_result(&mut conn)?;
    let lead_count: i64 = leads::table
        .filter(leads::business_id.eq(business_id))
        .count()
        .get_result(&mut conn)?;

    crate::notify::record_activity(
        &mut conn,
        &tenant,
        "report.generated",
        json!({
            "conversations": conversation_count,
            "messages": message_count,
            "leads": lead_count,
        }),
    )?;
    info!("Report generated for business {}", business_id);
    Ok(())
}

pub fn configure() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/reports/generate", post(enqueue_report))
        .route("/api/insights/generate", post(enqueue_insights))
}

async fn enqueue_report(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let tenant = tenant_from_headers(&headers)?;
    state.jobs.enqueue(Job::GenerateReport {
        business_id: tenant.business_id,
    });
    Ok(Json(json!({ "success": true, "queued": true })))
}

async fn enqueue_insights(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let tenant = tenant_from_headers(&headers)?;
    state.jobs.enqueue(Job::GenerateDailyInsights {
        business_id: tenant.business_id,
    });
    Ok(Json(json!({ "success": true, "queued": true })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_retry_succeeds_first_attempt() {
        crate::tests::test_util::setup();
        let calls = AtomicUsize::new(0);
        let ok = run_with_retry("t", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(()) }
        })
        .await;
        assert!(ok);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_recovers_on_second_attempt() {
        crate::tests::test_util::setup();
        let calls = AtomicUsize::new(0);
        let ok = run_with_retry("t", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(anyhow::anyhow!("transient"))
                } else {
                    Ok(())
                }
            }
        })
        .await;
        assert!(ok);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_retry_gives_up_after_two_failures() {
        crate::tests::test_util::setup();
        let calls = AtomicUsize::new(0);
        let ok = run_with_retry("t", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(anyhow::anyhow!("permanent")) }
        })
        .await;
        assert!(!ok);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_job_labels() {
        let id = Uuid::new_v4();
        assert_eq!(
            Job::GenerateDailyInsights { business_id: id }.label(),
            "daily_insights"
        );
        assert_eq!(Job::GenerateReport { business_id: id }.label(), "report");
        assert_eq!(Job::GenerateReport { business_id: id }.business_id(), id);
    }
}
