//! Temporary preview handles for attached receipts
//!
//! Every accepted file gets a short-lived object URL. Handles must be
//! revoked when the file is removed or replaced.

use crate::models::ReceiptFile;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewHandle {
    pub id: Uuid,
    pub url: String,
}

/// What the upload control shows for an attached file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiptPreview {
    pub file: ReceiptFile,
    pub handle: PreviewHandle,
}

impl ReceiptPreview {
    pub fn new(file: ReceiptFile, handle: PreviewHandle) -> Self {
        Self { file, handle }
    }

    /// Image URL to render inline; PDFs get a placeholder instead
    pub fn image_url(&self) -> Option<&str> {
        (!self.file.is_pdf()).then_some(self.handle.url.as_str())
    }

    pub fn caption(&self) -> String {
        if self.file.is_pdf() {
            format!("{} ({}) - PDF document", self.file.name, self.file.size_label())
        } else {
            format!("{} ({})", self.file.name, self.file.size_label())
        }
    }
}

/// Live object handles, keyed by handle id
pub struct PreviewRegistry {
    live: Mutex<HashMap<Uuid, String>>,
}

impl PreviewRegistry {
    pub fn new() -> Self {
        Self {
            live: Mutex::new(HashMap::new()),
        }
    }

    pub fn create(&self, file: &ReceiptFile) -> PreviewHandle {
        let id = Uuid::new_v4();
        let url = format!("blob:receipt/{}", id);

        let mut live = self.live.lock().unwrap_or_else(|e| e.into_inner());
        live.insert(id, file.name.clone());

        debug!(handle = %id, file = %file.name, "Preview handle created");
        PreviewHandle { id, url }
    }

    /// Returns false if the handle was already revoked
    pub fn revoke(&self, handle: &PreviewHandle) -> bool {
        let mut live = self.live.lock().unwrap_or_else(|e| e.into_inner());
        let removed = live.remove(&handle.id).is_some();

        if removed {
            debug!(handle = %handle.id, "Preview handle revoked");
        }
        removed
    }

    pub fn is_live(&self, handle: &PreviewHandle) -> bool {
        let live = self.live.lock().unwrap_or_else(|e| e.into_inner());
        live.contains_key(&handle.id)
    }

    pub fn live_count(&self) -> usize {
        let live = self.live.lock().unwrap_or_else(|e| e.into_inner());
        live.len()
    }
}

impl Default for PreviewRegistry {
    fn default() -> Self {
        Self::new()
    }
}
