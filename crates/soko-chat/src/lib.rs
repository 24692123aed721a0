//! Chat core of the Soko marketplace: chat registry, ordered message log with
//! live delivery, per-participant lifecycle flags and image attachments.

pub mod attachments;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod lifecycle;
pub mod notifier;
pub mod registry;
pub mod retry;
pub mod service;
pub mod stream;
pub mod subscription;
pub mod suggestions;
pub mod sweeper;

mod backend;

pub use attachments::{AttachmentUploader, BlobRef, BlobStore, DiskBlobStore, UploadedAttachment};
pub use config::ChatConfig;
pub use dispatcher::Dispatcher;
pub use error::{ChatError, ChatResult};
pub use lifecycle::ChatStateMachine;
pub use registry::ChatRegistry;
pub use retry::ReadRetry;
pub use service::ChatService;
pub use stream::MessageStream;
pub use subscription::Subscription;
