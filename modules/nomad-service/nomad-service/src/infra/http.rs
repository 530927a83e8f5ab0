use std::time::Duration;

use async_trait::async_trait;
use nomad_service_sdk::{CalloutClient, CalloutError, ServiceInstance};
use serde::Serialize;

/// [`CalloutClient`] on a shared `reqwest` client.
#[derive(Clone)]
pub struct HttpCallout {
    client: reqwest::Client,
}

#[derive(Serialize)]
struct ReloadBody<'a> {
    secret: &'a str,
}

impl HttpCallout {
    /// # Errors
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(timeout: Option<Duration>) -> Result<Self, reqwest::Error> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
        })
    }
}

fn check(url: &str, result: reqwest::Result<reqwest::Response>) -> Result<(), CalloutError> {
    let response = result.map_err(|e| CalloutError::Transport {
        url: url.to_owned(),
        detail: e.to_string(),
    })?;
    let status = response.status();
    if status.is_success() {
        Ok(())
    } else {
        Err(CalloutError::Status {
            url: url.to_owned(),
            status: status.as_u16(),
        })
    }
}

#[async_trait]
impl CalloutClient for HttpCallout {
    async fn confirm_subscription(&self, url: &str) -> Result<(), CalloutError> {
        tracing::debug!(%url, "Confirming SNS subscription");
        check(url, self.client.get(url).send().await)
    }

    async fn reload_instance(
        &self,
        instance: &ServiceInstance,
        secret: &str,
    ) -> Result<(), CalloutError> {
        let url = instance.reload_url();
        let result = self
            .client
            .post(&url)
            .json(&ReloadBody { secret })
            .send()
            .await;
        check(&url, result)
    }
}
