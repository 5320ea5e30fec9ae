// HTTP DocumentSource (external fiscal API)

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::NaiveDate;
use nfse_core::domain::{DocumentKind, FetchedDocument, Period, Tenant, TenantCredential};
use nfse_core::error::{AppError, Result};
use nfse_core::port::{DocumentSource, FetchError};
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Longest slice of an error body carried into a FetchError
const MAX_ERROR_BODY: usize = 512;

/// Wire format of one document in the API response
#[derive(Debug, Deserialize)]
struct ApiDocument {
    numero: String,
    data_emissao: String,
    #[serde(default)]
    content_type: Option<String>,
    conteudo_base64: String,
}

impl ApiDocument {
    fn into_document(self) -> std::result::Result<FetchedDocument, FetchError> {
        let number = self.numero.trim().to_string();
        if number.is_empty() {
            return Err(FetchError::Malformed("document without numero".to_string()));
        }

        // Accept both "2025-08-01" and full timestamps
        let date_part = self.data_emissao.get(..10).unwrap_or(self.data_emissao.as_str());
        let emission_date = NaiveDate::parse_from_str(date_part, "%Y-%m-%d").map_err(|e| {
            FetchError::Malformed(format!(
                "document {}: bad data_emissao '{}': {}",
                number, self.data_emissao, e
            ))
        })?;

        let bytes = BASE64.decode(self.conteudo_base64.trim()).map_err(|e| {
            FetchError::Malformed(format!("document {}: bad conteudo_base64: {}", number, e))
        })?;

        Ok(FetchedDocument {
            number,
            emission_date,
            content_type: self
                .content_type
                .unwrap_or_else(|| DocumentKind::Xml.content_type().to_string()),
            bytes,
        })
    }
}

/// Fiscal API client: `GET {base}/v1/nfse?cnpj=..&competencia=yyyy-mm` with a bearer token
pub struct HttpDocumentSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpDocumentSource {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

fn truncate(body: &str) -> String {
    body.chars().take(MAX_ERROR_BODY).collect()
}

#[async_trait]
impl DocumentSource for HttpDocumentSource {
    async fn fetch_documents(
        &self,
        credential: &TenantCredential,
        tenant: &Tenant,
        period: Period,
    ) -> std::result::Result<Vec<FetchedDocument>, FetchError> {
        let url = format!("{}/v1/nfse", self.base_url);
        let competencia = period.to_string();

        let response = self
            .client
            .get(&url)
            .bearer_auth(&credential.access_token)
            .query(&[
                ("cnpj", tenant.external_id.as_str()),
                ("competencia", competencia.as_str()),
            ])
            .send()
            .await
            .map_err(|e| FetchError::Unavailable(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            debug!(tenant_id = %tenant.id, period = %period, "No documents for period");
            return Ok(Vec::new());
        }
        if status.is_server_error() {
            return Err(FetchError::Unavailable(format!("HTTP {}", status)));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(tenant_id = %tenant.id, status = status.as_u16(), "Fiscal API rejected request");
            return Err(FetchError::Rejected {
                status: status.as_u16(),
                message: truncate(&body),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| FetchError::Unavailable(e.to_string()))?;
        let documents: Vec<ApiDocument> =
            serde_json::from_str(&body).map_err(|e| FetchError::Malformed(e.to_string()))?;

        let documents = documents
            .into_iter()
            .map(ApiDocument::into_document)
            .collect::<std::result::Result<Vec<_>, _>>()?;

        debug!(
            tenant_id = %tenant.id,
            period = %period,
            count = documents.len(),
            "Fetched documents"
        );
        Ok(documents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn tenant() -> Tenant {
        Tenant::new("t-1", "12345678000199")
    }

    fn credential() -> TenantCredential {
        TenantCredential {
            tenant_id: "t-1".to_string(),
            access_token: "token-abc".to_string(),
            expires_at: i64::MAX,
        }
    }

    fn period() -> Period {
        "2025-08".parse().unwrap()
    }

    async fn source_for(server: &MockServer) -> HttpDocumentSource {
        HttpDocumentSource::new(server.uri(), Duration::from_secs(2)).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_decodes_documents() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/nfse"))
            .and(query_param("cnpj", "12345678000199"))
            .and(query_param("competencia", "2025-08"))
            .and(header("authorization", "Bearer token-abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {
                    "numero": "101",
                    "data_emissao": "2025-08-03",
                    "content_type": "application/xml",
                    "conteudo_base64": BASE64.encode("<nfse><numero>101</numero></nfse>"),
                },
                {
                    "numero": "102",
                    "data_emissao": "2025-08-04T10:15:00-03:00",
                    "content_type": "application/zip",
                    "conteudo_base64": BASE64.encode([0x50u8, 0x4b, 0x03, 0x04]),
                }
            ])))
            .mount(&server)
            .await;

        let docs = source_for(&server)
            .await
            .fetch_documents(&credential(), &tenant(), period())
            .await
            .unwrap();

        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].number, "101");
        assert_eq!(docs[0].kind(), DocumentKind::Xml);
        assert_eq!(docs[0].bytes, b"<nfse><numero>101</numero></nfse>");
        assert_eq!(docs[1].emission_date, NaiveDate::from_ymd_opt(2025, 8, 4).unwrap());
        assert_eq!(docs[1].kind(), DocumentKind::Zip);
    }

    #[tokio::test]
    async fn test_not_found_is_empty_period() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let docs = source_for(&server)
            .await
            .fetch_documents(&credential(), &tenant(), period())
            .await
            .unwrap();
        assert!(docs.is_empty());
    }

    #[tokio::test]
    async fn test_error_statuses_are_classified() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401).set_body_string("token revoked"))
            .mount(&server)
            .await;

        let source = source_for(&server).await;
        let err = source
            .fetch_documents(&credential(), &tenant(), period())
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Unavailable(_)));

        let err = source
            .fetch_documents(&credential(), &tenant(), period())
            .await
            .unwrap_err();
        match err {
            FetchError::Rejected { status, message } => {
                assert_eq!(status, 401);
                assert_eq!(message, "token revoked");
            }
            other => panic!("expected Rejected, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_malformed_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"numero": "1", "data_emissao": "ontem", "conteudo_base64": ""}
            ])))
            .mount(&server)
            .await;

        let err = source_for(&server)
            .await
            .fetch_documents(&credential(), &tenant(), period())
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Malformed(_)));
    }

    #[tokio::test]
    async fn test_timeout_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .mount(&server)
            .await;

        let source = HttpDocumentSource::new(server.uri(), Duration::from_millis(200)).unwrap();
        let err = source
            .fetch_documents(&credential(), &tenant(), period())
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Unavailable(_)));
    }
}
