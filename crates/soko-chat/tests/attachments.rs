mod common;

use bytes::Bytes;

use soko_chat::ChatError;
use soko_chat::config::DEFAULT_MAX_ATTACHMENT_BYTES;
use soko_chat::sweeper::sweep_orphaned_attachments;
use soko_types::UserId;
use soko_types::models::NewMessage;

use common::{PNG, harness};

#[tokio::test]
async fn upload_stores_image_under_chat_prefix() {
    let h = harness().await;
    let (buyer, seller, chat) = h.chat().await;

    let uploaded = h
        .service
        .attachments()
        .upload_attachment(chat.id, buyer, Bytes::from_static(PNG), "my bike.png")
        .await
        .unwrap();

    let prefix = format!("messages/{}/", chat.id);
    assert!(uploaded.path.starts_with(&prefix));
    assert!(uploaded.path.ends_with("_my_bike.png"));
    assert_eq!(uploaded.url, format!("http://soko.test/files/{}", uploaded.path));
    assert_eq!(uploaded.size, PNG.len());
    assert_eq!(uploaded.sha256.len(), 64);
    assert_eq!(uploaded.content_type, "image/png");

    let on_disk = std::fs::read(h.dir.path().join("blobs").join(&uploaded.path)).unwrap();
    assert_eq!(on_disk, PNG);

    // The URL is what goes into the message.
    let sent = h
        .service
        .messages()
        .append_message(chat.id, buyer, None, NewMessage::image(uploaded.url.clone()))
        .await
        .unwrap();
    assert_eq!(sent.image_url.as_deref(), Some(uploaded.url.as_str()));

    let seen = h.service.messages().fetch_all(chat.id).await.unwrap();
    assert_eq!(seen.len(), 1);
    assert!(h.service.registry().get_chat(chat.id, seller).await.unwrap().last_message.unwrap().has_image);
}

#[tokio::test]
async fn upload_rejects_bad_files() {
    let h = harness().await;
    let (buyer, _, chat) = h.chat().await;
    let uploader = h.service.attachments();

    let empty = uploader
        .upload_attachment(chat.id, buyer, Bytes::new(), "a.png")
        .await;
    assert!(matches!(empty, Err(ChatError::InvalidFile(_))));

    let text = uploader
        .upload_attachment(chat.id, buyer, Bytes::from_static(b"plain text"), "a.png")
        .await;
    assert!(matches!(text, Err(ChatError::InvalidFile(_))));

    let mut big = PNG.to_vec();
    big.resize(DEFAULT_MAX_ATTACHMENT_BYTES + 1, 0);
    let too_big = uploader
        .upload_attachment(chat.id, buyer, Bytes::from(big), "big.png")
        .await;
    assert!(matches!(too_big, Err(ChatError::InvalidFile(_))));

    let mut exact = PNG.to_vec();
    exact.resize(DEFAULT_MAX_ATTACHMENT_BYTES, 0);
    uploader
        .upload_attachment(chat.id, buyer, Bytes::from(exact), "edge.png")
        .await
        .unwrap();
}

#[tokio::test]
async fn upload_requires_participant() {
    let h = harness().await;
    let (_, _, chat) = h.chat().await;

    let result = h
        .service
        .attachments()
        .upload_attachment(chat.id, UserId::new_v4(), Bytes::from_static(PNG), "a.png")
        .await;
    assert!(matches!(result, Err(ChatError::NotAParticipant { .. })));
}

#[tokio::test]
async fn sweep_removes_attachments_of_deleted_chats() {
    let h = harness().await;
    let (buyer, _, doomed) = h.chat().await;
    let (other_buyer, _, kept) = h.chat().await;
    let uploader = h.service.attachments();

    let gone = uploader
        .upload_attachment(doomed.id, buyer, Bytes::from_static(PNG), "a.png")
        .await
        .unwrap();
    let stays = uploader
        .upload_attachment(kept.id, other_buyer, Bytes::from_static(PNG), "b.png")
        .await
        .unwrap();

    assert_eq!(
        sweep_orphaned_attachments(h.service.store(), h.service.blobs().as_ref())
            .await
            .unwrap(),
        0
    );

    h.service.lifecycle().delete(doomed.id, buyer).await.unwrap();
    let removed = sweep_orphaned_attachments(h.service.store(), h.service.blobs().as_ref())
        .await
        .unwrap();
    assert_eq!(removed, 1);

    let blobs = h.dir.path().join("blobs");
    assert!(!blobs.join(&gone.path).exists());
    assert!(blobs.join(&stays.path).exists());
}
