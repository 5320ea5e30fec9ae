// PROCESS_DOCUMENT: verify a stored XML document and record its fingerprint

use super::{HandlerDeps, JobContext, JobHandler};
use crate::application::storage::sha256_hex;
use crate::domain::{DocumentKind, JobKind, JobParams};
use crate::error::{AppError, Result};
use async_trait::async_trait;
use serde_json::{json, Value as JsonValue};
use tracing::info;

pub struct ProcessDocumentHandler {
    deps: HandlerDeps,
}

impl ProcessDocumentHandler {
    pub fn new(deps: HandlerDeps) -> Self {
        Self { deps }
    }
}

/// Cheap structural check: an XML element that mentions the document number
fn looks_like_document(bytes: &[u8], number: &str) -> bool {
    let Ok(text) = std::str::from_utf8(bytes) else {
        return false;
    };
    let text = text.trim_start_matches('\u{feff}').trim();
    text.starts_with('<') && text.ends_with('>') && text.contains(number)
}

#[async_trait]
impl JobHandler for ProcessDocumentHandler {
    fn kind(&self) -> JobKind {
        JobKind::ProcessDocument
    }

    async fn execute(&self, ctx: &JobContext) -> Result<JsonValue> {
        let params = match &ctx.job.params {
            JobParams::ProcessDocument(p) => p,
            other => {
                return Err(AppError::Internal(format!(
                    "PROCESS_DOCUMENT handler got {} params",
                    other.kind()
                )))
            }
        };

        let tenant = self.deps.tenant(&ctx.job.tenant_id).await?;
        let (key, bytes) = self
            .deps
            .organizer
            .fetch_current(
                &tenant.external_id,
                params.period,
                &params.document_number,
                DocumentKind::Xml,
            )
            .await?;

        if !looks_like_document(&bytes, &params.document_number) {
            return Err(AppError::Validation(format!(
                "{} is not a well-formed document {}",
                key, params.document_number
            )));
        }

        let sha256 = sha256_hex(&bytes);
        info!(job_id = %ctx.job.id, key = %key, size = bytes.len(), "Document verified");

        Ok(json!({
            "key": key,
            "size": bytes.len(),
            "sha256": sha256,
        }))
    }
}
