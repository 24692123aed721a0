use std::sync::Arc;

use soko_db::Store;

use crate::attachments::{AttachmentUploader, BlobStore};
use crate::config::ChatConfig;
use crate::dispatcher::Dispatcher;
use crate::lifecycle::ChatStateMachine;
use crate::notifier::Notifier;
use crate::registry::ChatRegistry;
use crate::stream::MessageStream;

/// Wires the chat components around one store, one blob store and one dispatcher.
#[derive(Clone)]
pub struct ChatService {
    registry: ChatRegistry,
    messages: MessageStream,
    lifecycle: ChatStateMachine,
    attachments: AttachmentUploader,
    dispatcher: Dispatcher,
    store: Arc<dyn Store>,
    blobs: Arc<dyn BlobStore>,
}

impl ChatService {
    pub fn new(store: Arc<dyn Store>, blobs: Arc<dyn BlobStore>, config: ChatConfig) -> Self {
        let dispatcher = Dispatcher::new();
        let notifier = Notifier::new(dispatcher.clone());

        Self {
            registry: ChatRegistry::new(
                store.clone(),
                dispatcher.clone(),
                config.read_retry,
                config.subscription_buffer,
            ),
            messages: MessageStream::new(
                store.clone(),
                dispatcher.clone(),
                notifier,
                config.read_retry,
                config.subscription_buffer,
            ),
            lifecycle: ChatStateMachine::new(store.clone(), dispatcher.clone()),
            attachments: AttachmentUploader::new(
                store.clone(),
                blobs.clone(),
                config.max_attachment_bytes,
            ),
            dispatcher,
            store,
            blobs,
        }
    }

    pub fn registry(&self) -> &ChatRegistry {
        &self.registry
    }

    pub fn messages(&self) -> &MessageStream {
        &self.messages
    }

    pub fn lifecycle(&self) -> &ChatStateMachine {
        &self.lifecycle
    }

    pub fn attachments(&self) -> &AttachmentUploader {
        &self.attachments
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn blobs(&self) -> &Arc<dyn BlobStore> {
        &self.blobs
    }
}
