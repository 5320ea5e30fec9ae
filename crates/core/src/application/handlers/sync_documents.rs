// SYNC_DOCUMENTS: consult a list of periods (explicit or from the sync policy) in one job

use super::consult_period::consult;
use super::{HandlerDeps, JobContext, JobHandler};
use crate::application::sync_policy::periods_to_consult;
use crate::domain::{JobKind, JobParams, Period};
use crate::error::{AppError, Result};
use async_trait::async_trait;
use serde_json::{json, Value as JsonValue};
use tracing::info;

pub struct SyncDocumentsHandler {
    deps: HandlerDeps,
}

impl SyncDocumentsHandler {
    pub fn new(deps: HandlerDeps) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl JobHandler for SyncDocumentsHandler {
    fn kind(&self) -> JobKind {
        JobKind::SyncDocuments
    }

    async fn execute(&self, ctx: &JobContext) -> Result<JsonValue> {
        let params = match &ctx.job.params {
            JobParams::SyncDocuments(p) => p,
            other => {
                return Err(AppError::Internal(format!(
                    "SYNC_DOCUMENTS handler got {} params",
                    other.kind()
                )))
            }
        };

        let tenant = self.deps.tenant(&ctx.job.tenant_id).await?;

        let periods: Vec<Period> = if !params.periods.is_empty() {
            params.periods.clone()
        } else {
            // A forced sync re-runs the first-sync backfill window
            let mut policy_view = tenant.clone();
            if params.force_refresh {
                policy_view.last_sync_at = None;
            }
            periods_to_consult(&policy_view, self.deps.time_provider.now())
        };

        info!(
            job_id = %ctx.job.id,
            tenant_id = %tenant.id,
            periods = ?periods.iter().map(|p| p.to_string()).collect::<Vec<_>>(),
            "Syncing tenant documents"
        );

        let mut summaries = Vec::with_capacity(periods.len());
        for period in periods {
            ctx.check_cancelled()?;
            summaries.push(consult(&self.deps, ctx, &tenant, period, params.force_refresh).await?);
        }

        if summaries.iter().any(|s| s.skipped.is_none()) {
            self.deps
                .tenants
                .update_last_sync(&tenant.id, self.deps.time_provider.now_millis())
                .await?;
        }

        Ok(json!({ "periods": summaries }))
    }
}
