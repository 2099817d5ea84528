use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use tracing::warn;

use crate::constants::attachments::{EXCEPTION_ATTACHMENT_NAME, TEXT_MIME_TYPE};
use crate::error::{Result, StepperError};
use crate::models::{Attachment, AttachmentMeta, ReportNode};
use crate::services::AttachmentStore;

/// Stores attachments for one run, enforcing the run's attachment quota
pub struct AttachmentManager {
    store: Arc<dyn AttachmentStore>,
    run_id: String,
    quota: i64,
    count: AtomicI64,
    quota_reported: AtomicBool,
}

impl AttachmentManager {
    pub fn new(store: Arc<dyn AttachmentStore>, run_id: impl Into<String>, quota: i64) -> Self {
        Self {
            store,
            run_id: run_id.into(),
            quota,
            count: AtomicI64::new(0),
            quota_reported: AtomicBool::new(false),
        }
    }

    pub fn quota(&self) -> i64 {
        self.quota
    }

    pub fn attached_count(&self) -> i64 {
        self.count.load(Ordering::SeqCst).min(self.quota)
    }

    /// Store `attachment` and reference it from `report`
    pub async fn attach(
        &self,
        report: &mut ReportNode,
        attachment: Attachment,
    ) -> Result<AttachmentMeta> {
        let position = self.count.fetch_add(1, Ordering::SeqCst) + 1;
        if position > self.quota {
            if !self.quota_reported.swap(true, Ordering::SeqCst) {
                warn!(
                    run_id = %self.run_id,
                    quota = self.quota,
                    "Attachment quota reached, further attachments of this run are skipped"
                );
            }
            return Err(StepperError::AttachmentQuotaExceeded {
                name: attachment.name,
                quota: self.quota,
            });
        }

        let id = self
            .store
            .save(&self.run_id, &attachment)
            .await
            .map_err(|e| StepperError::AttachmentStore(e.to_string()))?;

        let meta = AttachmentMeta {
            id,
            name: attachment.name,
            mime_type: attachment.mime_type,
        };
        report.attachments.push(meta.clone());
        Ok(meta)
    }

    /// Attach a textual description of `error` as `exception.log`
    pub async fn attach_error(
        &self,
        report: &mut ReportNode,
        error: &StepperError,
    ) -> Result<AttachmentMeta> {
        let content = format!("{error}\n\n{error:#?}\n");
        self.attach(
            report,
            Attachment {
                name: EXCEPTION_ATTACHMENT_NAME.to_string(),
                mime_type: TEXT_MIME_TYPE.to_string(),
                content: content.into_bytes(),
            },
        )
        .await
    }
}
