use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::error::IngestError;
use crate::options::IngestOptions;

/// State shared by the decoders of one batch.
#[derive(Debug, Clone)]
pub(crate) struct DecodeContext {
    options: Arc<IngestOptions>,
    cancel: CancellationToken,
}

impl DecodeContext {
    pub(crate) fn new(options: Arc<IngestOptions>, cancel: CancellationToken) -> Self {
        Self { options, cancel }
    }

    pub(crate) fn options(&self) -> &IngestOptions {
        &self.options
    }

    /// Returns an error if the batch was cancelled. Decoders call it between units of work.
    pub(crate) fn checkpoint(&self) -> Result<(), IngestError> {
        if self.cancel.is_cancelled() {
            Err(IngestError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
impl Default for DecodeContext {
    fn default() -> Self {
        Self::new(Arc::default(), CancellationToken::new())
    }
}
