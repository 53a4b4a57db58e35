//! Remote ledger peer reached over HTTP
//!
//! Calls are `POST {url}/invoke` or `POST {url}/query` with a JSON body
//! `{identity, function, args}`. A non-2xx reply carrying `{code, message}`
//! is a contract rejection; anything else is a transport failure. No retries.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

use super::{LedgerError, LedgerFunction, LedgerReplica, RejectCode};

#[derive(Debug, Serialize)]
struct CallBody<'a> {
    identity: &'a str,
    function: &'static str,
    args: &'a [String],
}

#[derive(Debug, Deserialize)]
struct RejectionBody {
    code: RejectCode,
    message: String,
}

pub struct HttpReplica {
    name: String,
    base_url: String,
    client: reqwest::Client,
}

impl HttpReplica {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>, timeout: Duration) -> Result<Self, LedgerError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LedgerError::Transport(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    async fn call(
        &self,
        action: &str,
        identity: &str,
        function: LedgerFunction,
        args: &[String],
    ) -> Result<Vec<u8>, LedgerError> {
        let url = format!("{}/{}", self.base_url, action);
        let body = CallBody {
            identity,
            function: function.as_str(),
            args,
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| LedgerError::Transport(format!("{}: {}", self.name, e)))?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| LedgerError::Transport(format!("{}: {}", self.name, e)))?;

        if status.is_success() {
            return Ok(bytes.to_vec());
        }

        match serde_json::from_slice::<RejectionBody>(&bytes) {
            Ok(rejection) => Err(LedgerError::rejected(rejection.code, rejection.message)),
            Err(_) => {
                warn!(peer = %self.name, status = %status, function = %function, "ledger peer failed");
                Err(LedgerError::Transport(format!(
                    "{} returned {}: {}",
                    self.name,
                    status,
                    String::from_utf8_lossy(&bytes)
                )))
            }
        }
    }
}

#[async_trait]
impl LedgerReplica for HttpReplica {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(
        &self,
        identity: &str,
        function: LedgerFunction,
        args: &[String],
    ) -> Result<Vec<u8>, LedgerError> {
        self.call("invoke", identity, function, args).await
    }

    async fn query(
        &self,
        identity: &str,
        function: LedgerFunction,
        args: &[String],
    ) -> Result<Vec<u8>, LedgerError> {
        self.call("query", identity, function, args).await
    }
}
