use async_trait::async_trait;
use uuid::Uuid;

use crate::config::SessionStore;
use crate::errors::{error_chain, AppResult};
use crate::model::ApiDefinition;
use crate::notify::{html_link, Notifier};

use super::progress_tracker::{
    advance_progress, is_cancelled, mark_completed, record_item_failure, record_item_success,
    set_current_item, FailedItem, ProgressState,
};
use super::yapi_client::AuthCookies;

pub const UPLOAD_FAILED_TITLE: &str = "Yapi Upload failed";
pub const UPLOAD_SUCCESS_TITLE: &str = "Yapi Upload successful";

/// Identifiers of one uploaded interface, used for link construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadedInterface {
    pub project_id: i64,
    pub category_id: i64,
    pub interface_id: i64,
}

/// The remote documentation target as seen by the batch loop.
#[async_trait]
pub trait UploadTarget: Send + Sync {
    /// Create or update one interface, returning its identifiers.
    async fn upload(&self, project_id: i64, api: &ApiDefinition)
        -> AppResult<UploadedInterface>;

    /// Deep link to one interface page.
    fn interface_url(&self, project_id: i64, interface_id: i64) -> String;

    /// Link to a category page.
    fn category_url(&self, project_id: i64, category_id: i64) -> String;

    /// Cached session cookies, exported after a batch for persistence.
    fn auth_cookies(&self) -> Option<AuthCookies>;
}

#[derive(Debug, Clone)]
pub struct BatchReport {
    pub batch_id: Uuid,
    pub total: usize,
    pub succeeded: usize,
    pub failed: Vec<FailedItem>,
    pub cancelled: bool,
    pub summary_url: Option<String>,
    pub cookies_persisted: bool,
}

/// Upload an ordered batch of API definitions to the target, continuing
/// past individual failures.
///
/// Cancellation is observed once per iteration boundary: already-uploaded
/// definitions are kept, the rest are skipped. Refreshed session cookies
/// are written to the store no matter how the loop ended, and the single
/// summary notification links to the one uploaded interface for a
/// single-item batch, to its category otherwise. With no link computed
/// (every item failed before producing identifiers) no summary is emitted.
pub async fn process_upload_batch(
    target: &dyn UploadTarget,
    project_id: i64,
    apis: &[ApiDefinition],
    progress: &ProgressState,
    notifier: &dyn Notifier,
    store: &dyn SessionStore,
) -> BatchReport {
    let batch_id = Uuid::new_v4();
    log::info!(
        "Starting upload batch {} ({} definitions, project {})",
        batch_id,
        apis.len(),
        project_id
    );

    let mut category_url = None;
    let mut interface_url = None;
    let mut succeeded = 0;
    let mut failed = Vec::new();
    let mut cancelled = false;

    for (index, api) in apis.iter().enumerate() {
        if is_cancelled(progress) {
            log::info!(
                "Batch {} cancelled after {} of {} items",
                batch_id,
                index,
                apis.len()
            );
            cancelled = true;
            break;
        }

        set_current_item(
            progress,
            format!("[{}/{}] {}", index + 1, apis.len(), api.display_name()),
        );

        match target.upload(project_id, api).await {
            Ok(uploaded) => {
                category_url =
                    Some(target.category_url(uploaded.project_id, uploaded.category_id));
                interface_url =
                    Some(target.interface_url(uploaded.project_id, uploaded.interface_id));
                succeeded += 1;
                record_item_success(progress);
            }
            Err(e) => {
                let detail = error_chain(&e);
                notifier.notify_error(UPLOAD_FAILED_TITLE, &detail);
                failed.push(FailedItem {
                    item: api.display_name(),
                    error: detail.clone(),
                });
                record_item_failure(progress, api.display_name(), detail);
            }
        }

        advance_progress(progress);
    }

    // Refreshed cookies go back to the store regardless of how the loop
    // ended; a persistence failure must not swallow the summary.
    let cookies_persisted = match target.auth_cookies() {
        Some(cookies) => match store.persist_cookies(&cookies) {
            Ok(()) => true,
            Err(e) => {
                log::error!("Failed to persist session cookies: {}", e);
                false
            }
        },
        None => {
            log::warn!("No session cookies available to persist");
            false
        }
    };

    let summary_url = if apis.len() == 1 {
        interface_url
    } else {
        category_url
    };
    if let Some(url) = &summary_url {
        notifier.notify_info(UPLOAD_SUCCESS_TITLE, &html_link(url));
    }

    if !cancelled {
        mark_completed(progress);
    }

    BatchReport {
        batch_id,
        total: apis.len(),
        succeeded,
        failed,
        cancelled,
        summary_url,
        cookies_persisted,
    }
}
