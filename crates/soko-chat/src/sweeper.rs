use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use soko_db::Store;

use crate::attachments::{BlobRef, BlobStore, MESSAGES_PREFIX};
use crate::backend::blocking;
use crate::error::ChatResult;

/// Background task that removes attachments whose chat no longer exists.
pub async fn run_sweep_loop(store: Arc<dyn Store>, blobs: Arc<dyn BlobStore>, interval_secs: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));

    loop {
        interval.tick().await;

        match sweep_orphaned_attachments(&store, blobs.as_ref()).await {
            Ok(count) => {
                if count > 0 {
                    info!("Sweep: removed {} orphaned attachments", count);
                }
            }
            Err(e) => {
                warn!("Sweep error: {}", e);
            }
        }
    }
}

/// Deletes every blob under `messages/{chat_id}/` whose chat is gone.
/// Returns how many blobs were removed.
pub async fn sweep_orphaned_attachments(
    store: &Arc<dyn Store>,
    blobs: &dyn BlobStore,
) -> ChatResult<usize> {
    let mut by_chat: BTreeMap<_, Vec<BlobRef>> = BTreeMap::new();
    for blob in blobs.list(MESSAGES_PREFIX).await? {
        match blob.chat_id() {
            Some(chat_id) => by_chat.entry(chat_id).or_default().push(blob),
            None => warn!("Skipping unrecognized attachment path {}", blob.path()),
        }
    }

    let mut removed = 0;
    for (chat_id, chat_blobs) in by_chat {
        let exists = blocking(store, move |s| s.get_chat(chat_id))
            .await?
            .is_some();
        if exists {
            continue;
        }
        for blob in &chat_blobs {
            blobs.delete(blob).await?;
            removed += 1;
        }
    }

    Ok(removed)
}
