use std::time::Duration;

use futures::future::BoxFuture;
use reqwest::header::HeaderMap;

use verdict_core::error::{Result, VerdictError};

/// Status and body of one search request.
#[derive(Debug, Clone)]
pub struct SearchReply {
    pub status: u16,
    pub body: String,
}

/// Wire layer under the search client. A transport failure (DNS, TLS,
/// timeout) is an `Err`; any HTTP status is an `Ok` reply.
pub trait Transport: Send + Sync + 'static {
    fn post_form<'a>(
        &'a self,
        url: &'a str,
        form: &'a [(&'a str, &'a str)],
        headers: HeaderMap,
    ) -> BoxFuture<'a, Result<SearchReply>>;
}

/// reqwest-backed transport; one pooled connection handle reused across
/// calls.
pub struct HttpTransport {
    http: reqwest::Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                VerdictError::RetrievalTransport(format!("Failed to create HTTP client: {}", e))
            })?;
        Ok(Self { http })
    }
}

impl Transport for HttpTransport {
    fn post_form<'a>(
        &'a self,
        url: &'a str,
        form: &'a [(&'a str, &'a str)],
        headers: HeaderMap,
    ) -> BoxFuture<'a, Result<SearchReply>> {
        Box::pin(async move {
            let resp = self
                .http
                .post(url)
                .headers(headers)
                .form(form)
                .send()
                .await
                .map_err(|e| VerdictError::RetrievalTransport(e.to_string()))?;

            let status = resp.status().as_u16();
            let body = resp
                .text()
                .await
                .map_err(|e| VerdictError::RetrievalTransport(e.to_string()))?;

            Ok(SearchReply { status, body })
        })
    }
}
