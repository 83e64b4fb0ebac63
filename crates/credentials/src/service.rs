//! Client side of the remote credential issuer.

use std::future::Future;
use std::pin::Pin;

use serde::Serialize;
use tracing::debug;

use crate::credential::{CredentialError, TokenGrant};

/// Type alias for a boxed future that can be sent between threads.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Issues short-lived bearer credentials.
///
/// Implementations perform exactly one network exchange per call; deduplication and
/// caching are the job of [`crate::CredentialCache`].
pub trait CredentialService: Send + Sync {
    fn fetch(&self) -> BoxFuture<'_, Result<TokenGrant, CredentialError>>;
}

#[derive(Serialize)]
struct AuthorizeRequest<'a> {
    grant_type: &'a str,
    client_id: &'a str,
    client_secret: &'a str,
}

/// `POST {base_url}/tokens/authorize` with client credentials.
pub struct HttpCredentialService {
    client: reqwest::Client,
    base_url: String,
    client_id: String,
    client_secret: String,
}

impl HttpCredentialService {
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    pub fn authorize_url(&self) -> String {
        format!("{}/tokens/authorize", self.base_url.trim_end_matches('/'))
    }
}

impl CredentialService for HttpCredentialService {
    fn fetch(&self) -> BoxFuture<'_, Result<TokenGrant, CredentialError>> {
        Box::pin(async move {
            let url = self.authorize_url();
            debug!(%url, "requesting credential");

            let resp = self
                .client
                .post(&url)
                .json(&AuthorizeRequest {
                    grant_type: "client_credentials",
                    client_id: &self.client_id,
                    client_secret: &self.client_secret,
                })
                .send()
                .await
                .map_err(map_reqwest_error)?;

            let status = resp.status();
            if !status.is_success() {
                return Err(CredentialError::FetchFailed(format!(
                    "credential service HTTP {}",
                    status.as_u16()
                )));
            }

            resp.json::<TokenGrant>()
                .await
                .map_err(map_reqwest_error)
        })
    }
}

fn map_reqwest_error(err: reqwest::Error) -> CredentialError {
    if err.is_timeout() {
        CredentialError::FetchTimeout
    } else {
        CredentialError::FetchFailed(err.to_string())
    }
}
