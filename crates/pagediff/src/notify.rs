//! Failure notifications.
//!
//! Delivery is fire-and-forget: [`notify_quietly`] and
//! [`notify_bulk_quietly`] log and swallow notifier errors so they never
//! reach the comparison pipeline.

use crate::model::Recipient;
use crate::result::PageDiffResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Context for a single failed comparison
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonFailure {
    /// Comparison that failed, if one was created
    pub comparison_id: Option<String>,
    /// Page name
    pub page_name: String,
    /// Page path
    pub page_path: String,
    /// Fully resolved page URL
    pub page_url: String,
    /// Website name
    pub website_name: String,
    /// Website base URL
    pub website_url: String,
    /// Message of the error that failed the comparison
    pub error_message: String,
    /// When the failure happened
    pub timestamp: DateTime<Utc>,
}

/// One failed page within a bulk run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageFailure {
    /// Page identifier
    pub page_id: String,
    /// Page name
    pub page_name: String,
    /// Page path
    pub page_path: String,
    /// Error message
    pub error_message: String,
}

/// Context for a bulk run that had failures
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkFailure {
    /// Website name
    pub website_name: String,
    /// Website base URL
    pub website_url: String,
    /// Pages attempted
    pub total_pages: usize,
    /// Pages that failed
    pub failed_pages: Vec<PageFailure>,
    /// Pages that succeeded
    pub successful_pages: usize,
    /// When the run finished
    pub timestamp: DateTime<Utc>,
}

/// Sends failure notifications
#[async_trait]
pub trait FailureNotifier: Send + Sync + std::fmt::Debug {
    /// A single comparison failed
    async fn notify_failure(
        &self,
        recipients: &[Recipient],
        failure: &ComparisonFailure,
    ) -> PageDiffResult<()>;

    /// A bulk run finished with failures
    async fn notify_bulk_failure(
        &self,
        recipients: &[Recipient],
        failure: &BulkFailure,
    ) -> PageDiffResult<()>;
}

/// Writes notifications to the log
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl FailureNotifier for LogNotifier {
    async fn notify_failure(
        &self,
        recipients: &[Recipient],
        failure: &ComparisonFailure,
    ) -> PageDiffResult<()> {
        tracing::error!(
            recipients = recipients.len(),
            website = %failure.website_name,
            page = %failure.page_name,
            url = %failure.page_url,
            error = %failure.error_message,
            "comparison failed"
        );
        Ok(())
    }

    async fn notify_bulk_failure(
        &self,
        recipients: &[Recipient],
        failure: &BulkFailure,
    ) -> PageDiffResult<()> {
        tracing::error!(
            recipients = recipients.len(),
            website = %failure.website_name,
            total = failure.total_pages,
            failed = failure.failed_pages.len(),
            succeeded = failure.successful_pages,
            "bulk comparison finished with failures"
        );
        Ok(())
    }
}

/// Send a single-failure notification, logging instead of returning errors.
/// Nothing is sent when there are no recipients.
pub async fn notify_quietly(
    notifier: &dyn FailureNotifier,
    recipients: &[Recipient],
    failure: &ComparisonFailure,
) {
    if recipients.is_empty() {
        tracing::debug!(page = %failure.page_name, "no recipients for failure notification");
        return;
    }
    if let Err(e) = notifier.notify_failure(recipients, failure).await {
        tracing::warn!(error = %e, page = %failure.page_name, "failure notification not sent");
    }
}

/// Send a bulk-failure notification, logging instead of returning errors
pub async fn notify_bulk_quietly(
    notifier: &dyn FailureNotifier,
    recipients: &[Recipient],
    failure: &BulkFailure,
) {
    if recipients.is_empty() {
        return;
    }
    if let Err(e) = notifier.notify_bulk_failure(recipients, failure).await {
        tracing::warn!(error = %e, website = %failure.website_name, "bulk failure notification not sent");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::result::PageDiffError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Default)]
    struct Broken {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl FailureNotifier for Broken {
        async fn notify_failure(&self, _: &[Recipient], _: &ComparisonFailure) -> PageDiffResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(PageDiffError::Notification {
                message: "smtp down".into(),
            })
        }

        async fn notify_bulk_failure(&self, _: &[Recipient], _: &BulkFailure) -> PageDiffResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(PageDiffError::Notification {
                message: "smtp down".into(),
            })
        }
    }

    fn failure() -> ComparisonFailure {
        ComparisonFailure {
            comparison_id: Some("c1".into()),
            page_name: "Home".into(),
            page_path: "/".into(),
            page_url: "https://example.com/".into(),
            website_name: "Example".into(),
            website_url: "https://example.com".into(),
            error_message: "timeout".into(),
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_notifier_errors_are_swallowed() {
        let notifier = Broken::default();
        notify_quietly(&notifier, &[Recipient::new("a@example.com")], &failure()).await;
        assert_eq!(notifier.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_no_recipients_skips_send() {
        let notifier = Broken::default();
        notify_quietly(&notifier, &[], &failure()).await;
        let bulk = BulkFailure {
            website_name: "Example".into(),
            website_url: "https://example.com".into(),
            total_pages: 1,
            failed_pages: vec![],
            successful_pages: 0,
            timestamp: Utc::now(),
        };
        notify_bulk_quietly(&notifier, &[], &bulk).await;
        assert_eq!(notifier.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_log_notifier_succeeds() {
        LogNotifier
            .notify_failure(&[Recipient::new("a@example.com")], &failure())
            .await
            .unwrap();
    }
}
