//! Receipt intake
//!
//! Accepts a picked file, enforces size and type limits and hands the file
//! to a pluggable extractor that reads date and amount from it.

use crate::error::IntakeError;
use crate::models::{ExtractedFields, ReceiptFile};
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

pub mod mock;
pub mod preview;

pub use mock::MockReceiptExtractor;
pub use preview::{PreviewHandle, PreviewRegistry, ReceiptPreview};

/// 5 MiB
pub const MAX_RECEIPT_BYTES: u64 = 5 * 1024 * 1024;

const ACCEPTED_MIME_TYPES: &[&str] = &["image/jpeg", "image/jpg", "image/png", "application/pdf"];
const ACCEPTED_EXTENSIONS: &[&str] = &["jpeg", "jpg", "png", "pdf"];

/// Trait for receipt data extraction (mock today, OCR service later)
#[async_trait]
pub trait ReceiptExtractor: Send + Sync {
    fn name(&self) -> &'static str;

    /// Read whatever fields the receipt yields. Missing fields stay `None`.
    async fn extract(&self, file: &ReceiptFile) -> Result<ExtractedFields>;
}

/// File acceptance plus extraction and preview bookkeeping
pub struct ReceiptIntake {
    extractor: Arc<dyn ReceiptExtractor>,
    previews: Arc<PreviewRegistry>,
    max_bytes: u64,
}

impl ReceiptIntake {
    pub fn new(extractor: Arc<dyn ReceiptExtractor>, max_bytes: u64) -> Self {
        Self {
            extractor,
            previews: Arc::new(PreviewRegistry::new()),
            max_bytes,
        }
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    pub fn previews(&self) -> &Arc<PreviewRegistry> {
        &self.previews
    }

    /// Size is checked before type
    pub fn check(&self, candidate: &ReceiptFile) -> std::result::Result<(), IntakeError> {
        if candidate.size > self.max_bytes {
            warn!(
                file = %candidate.name,
                size = candidate.size,
                max = self.max_bytes,
                "Receipt rejected: too large"
            );
            return Err(IntakeError::FileTooLarge {
                size: candidate.size,
                max: self.max_bytes,
            });
        }

        if !is_accepted_type(candidate) {
            warn!(
                file = %candidate.name,
                mime_type = %candidate.mime_type,
                "Receipt rejected: unsupported type"
            );
            return Err(IntakeError::UnsupportedType(candidate.mime_type.clone()));
        }

        Ok(())
    }

    /// Open a preview for an accepted file
    pub fn open_preview(&self, file: &ReceiptFile) -> ReceiptPreview {
        ReceiptPreview::new(file.clone(), self.previews.create(file))
    }

    /// Release the preview's handle
    pub fn close_preview(&self, preview: &ReceiptPreview) {
        self.previews.revoke(&preview.handle);
    }

    pub async fn extract(&self, file: &ReceiptFile) -> Result<ExtractedFields> {
        debug!(
            extractor = self.extractor.name(),
            file = %file.name,
            "Extracting receipt data"
        );
        self.extractor.extract(file).await
    }
}

/// The MIME type decides; the extension is only consulted when it is blank
fn is_accepted_type(file: &ReceiptFile) -> bool {
    let mime = file.mime_type.trim().to_ascii_lowercase();
    if !mime.is_empty() {
        return ACCEPTED_MIME_TYPES.contains(&mime.as_str());
    }

    file.extension()
        .map(|ext| ACCEPTED_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}
