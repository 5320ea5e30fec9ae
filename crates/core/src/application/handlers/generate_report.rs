// GENERATE_REPORT: summarize the documents of a tenant period into a JSON report

use super::{HandlerDeps, JobContext, JobHandler};
use crate::domain::{JobKind, JobParams};
use crate::error::{AppError, Result};
use async_trait::async_trait;
use serde_json::{json, Value as JsonValue};
use tracing::info;

pub struct GenerateReportHandler {
    deps: HandlerDeps,
}

impl GenerateReportHandler {
    pub fn new(deps: HandlerDeps) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl JobHandler for GenerateReportHandler {
    fn kind(&self) -> JobKind {
        JobKind::GenerateReport
    }

    async fn execute(&self, ctx: &JobContext) -> Result<JsonValue> {
        let params = match &ctx.job.params {
            JobParams::GenerateReport(p) => p,
            other => {
                return Err(AppError::Internal(format!(
                    "GENERATE_REPORT handler got {} params",
                    other.kind()
                )))
            }
        };
        let batch_id = params.batch_id.clone().unwrap_or_else(|| ctx.job.id.clone());

        let tenant = self.deps.tenant(&ctx.job.tenant_id).await?;
        let documents = self
            .deps
            .organizer
            .list_documents(&tenant.external_id, params.period)
            .await?;

        let total_bytes: u64 = documents.iter().map(|d| d.size).sum();
        let now = self.deps.time_provider.now();
        let report = json!({
            "tenant_id": tenant.id,
            "external_id": tenant.external_id,
            "period": params.period,
            "batch_id": batch_id,
            "generated_at": now.timestamp_millis(),
            "document_count": documents.len(),
            "total_bytes": total_bytes,
            "documents": documents,
        });

        ctx.check_cancelled()?;
        let key = self
            .deps
            .organizer
            .store_report(
                &tenant.external_id,
                params.period,
                &batch_id,
                now.date_naive(),
                &serde_json::to_vec_pretty(&report)?,
            )
            .await?;

        info!(
            job_id = %ctx.job.id,
            key = %key,
            document_count = documents.len(),
            "Report generated"
        );

        Ok(json!({
            "key": key,
            "document_count": documents.len(),
            "total_bytes": total_bytes,
        }))
    }
}
