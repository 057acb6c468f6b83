//! Deferred file deletion for banned and deleted accounts

pub mod blob;
pub mod queue;

pub use blob::{BlobStore, FsBlobStore};
pub use queue::{PurgeConfig, PurgeError, PurgeHandle, PurgeReply, PurgeRequest};

use hoard_core::FileStore;
use tracing::{info, warn};

/// Queue every subject that still owns files after being banned or deleted.
/// Returns the number of subjects queued.
pub async fn recover_pending(files: &dyn FileStore, handle: &PurgeHandle) -> Result<usize, PurgeError> {
    let subjects = files.subjects_pending_purge().await?;
    for subject in &subjects {
        handle.enqueue(subject.clone()).await?;
    }
    if subjects.is_empty() {
        info!("No purges to resume");
    } else {
        warn!(count = subjects.len(), "Resuming interrupted purges");
    }
    Ok(subjects.len())
}
