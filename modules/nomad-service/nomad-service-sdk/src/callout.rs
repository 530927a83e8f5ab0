//! Direct outbound HTTP contract

use crate::error::CalloutError;
use crate::models::ServiceInstance;

/// Outbound HTTP calls made on behalf of a request.
#[async_trait::async_trait]
pub trait CalloutClient: Send + Sync {
    /// Visit a notification subscription confirmation URL.
    ///
    /// # Errors
    /// Returns `CalloutError` if the URL cannot be fetched successfully.
    async fn confirm_subscription(&self, url: &str) -> Result<(), CalloutError>;

    /// Ask a running instance to reload, authenticating with `secret`.
    ///
    /// # Errors
    /// Returns `CalloutError` if the instance is unreachable or refuses.
    async fn reload_instance(
        &self,
        instance: &ServiceInstance,
        secret: &str,
    ) -> Result<(), CalloutError>;
}
