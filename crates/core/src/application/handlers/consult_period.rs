// CONSULT_PERIOD: fetch one tenant period from the fiscal API and store every document

use super::{HandlerDeps, JobContext, JobHandler};
use crate::application::storage::StoreOutcome;
use crate::domain::{DocumentDescriptor, JobKind, JobParams, Period, Tenant};
use crate::error::{AppError, Result};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value as JsonValue;
use tracing::{info, warn};

/// Per-period ingestion counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PeriodSummary {
    pub period: String,
    pub fetched: usize,
    pub created: usize,
    pub duplicates: usize,
    pub versioned: usize,
    /// Keys replaced by a newer version during this consultation
    pub superseded: Vec<String>,
    /// Set when the period was not consulted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped: Option<String>,
}

impl PeriodSummary {
    fn skipped(period: Period, reason: &str) -> Self {
        Self {
            period: period.to_string(),
            skipped: Some(reason.to_string()),
            ..Self::default()
        }
    }
}

/// Fetch and store one period for `tenant`
///
/// Inactive tenants are skipped unless `force_refresh` is set. Does not touch
/// `last_sync_at`; callers record the sync once all their periods succeed.
pub(crate) async fn consult(
    deps: &HandlerDeps,
    ctx: &JobContext,
    tenant: &Tenant,
    period: Period,
    force_refresh: bool,
) -> Result<PeriodSummary> {
    if !tenant.active && !force_refresh {
        info!(tenant_id = %tenant.id, period = %period, "Tenant inactive, skipping consultation");
        return Ok(PeriodSummary::skipped(period, "tenant inactive"));
    }

    let now = deps.time_provider.now_millis();
    let credential = deps
        .tenants
        .credential_for(&tenant.id, now)
        .await?
        .ok_or_else(|| AppError::MissingCredential(tenant.id.clone()))?;

    let documents = ctx
        .run_cancellable(async {
            deps.source
                .fetch_documents(&credential, tenant, period)
                .await
                .map_err(AppError::from)
        })
        .await?;

    let mut summary = PeriodSummary {
        period: period.to_string(),
        fetched: documents.len(),
        ..PeriodSummary::default()
    };

    for document in &documents {
        ctx.check_cancelled()?;

        if !period.contains(document.emission_date) {
            warn!(
                tenant_id = %tenant.id,
                period = %period,
                number = %document.number,
                emission_date = %document.emission_date,
                "Document emitted outside the consulted period"
            );
        }

        let descriptor = DocumentDescriptor::from(document);
        let outcome = ctx
            .run_cancellable(deps.organizer.store(
                &tenant.external_id,
                period,
                &descriptor,
                &document.bytes,
            ))
            .await?;

        match outcome {
            StoreOutcome::Created { .. } => summary.created += 1,
            StoreOutcome::Duplicate { .. } => summary.duplicates += 1,
            StoreOutcome::Versioned { superseded_key, .. } => {
                summary.versioned += 1;
                summary.superseded.push(superseded_key);
            }
        }
    }

    info!(
        tenant_id = %tenant.id,
        period = %period,
        fetched = summary.fetched,
        created = summary.created,
        duplicates = summary.duplicates,
        versioned = summary.versioned,
        "Period consulted"
    );

    Ok(summary)
}

pub struct ConsultPeriodHandler {
    deps: HandlerDeps,
}

impl ConsultPeriodHandler {
    pub fn new(deps: HandlerDeps) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl JobHandler for ConsultPeriodHandler {
    fn kind(&self) -> JobKind {
        JobKind::ConsultPeriod
    }

    async fn execute(&self, ctx: &JobContext) -> Result<JsonValue> {
        let params = match &ctx.job.params {
            JobParams::ConsultPeriod(p) => p,
            other => {
                return Err(AppError::Internal(format!(
                    "CONSULT_PERIOD handler got {} params",
                    other.kind()
                )))
            }
        };

        let tenant = self.deps.tenant(&ctx.job.tenant_id).await?;
        let summary = consult(&self.deps, ctx, &tenant, params.period, params.force_refresh).await?;

        if summary.skipped.is_none() {
            self.deps
                .tenants
                .update_last_sync(&tenant.id, self.deps.time_provider.now_millis())
                .await?;
        }

        Ok(serde_json::to_value(summary)?)
    }
}
