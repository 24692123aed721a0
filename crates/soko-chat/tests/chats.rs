mod common;

use std::collections::HashSet;

use soko_chat::ChatError;
use soko_db::{ChatStore, MessageStore};
use soko_types::models::{NewMessage, UNTITLED_LISTING};
use soko_types::{ChatId, ListingId, UserId};

use common::harness;

#[tokio::test]
async fn open_or_create_returns_existing_chat() {
    let h = harness().await;
    let (buyer, seller, chat) = h.chat().await;

    let again = h
        .service
        .registry()
        .open_or_create_chat(buyer, chat.listing_id, seller)
        .await
        .unwrap();
    assert_eq!(again.id, chat.id);
    assert_eq!(again.seller_id, seller);
    assert!(again.has_participant(buyer));
    assert_eq!(h.service.registry().list_chats_for_user(buyer).await.unwrap().len(), 1);
}

#[tokio::test]
async fn concurrent_opens_converge_on_one_chat() {
    let h = harness().await;
    let buyer = UserId::new_v4();
    let seller = UserId::new_v4();
    let listing = h.listing(seller, Some("Sofa"), Some(120_000));

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let registry = h.service.registry().clone();
        let listing_id = listing.id;
        tasks.push(tokio::spawn(async move {
            registry.open_or_create_chat(buyer, listing_id, seller).await
        }));
    }

    let mut ids = HashSet::new();
    for task in tasks {
        ids.insert(task.await.unwrap().unwrap().id);
    }
    assert_eq!(ids.len(), 1);
    assert_eq!(h.db.chats_for_user(seller).unwrap().len(), 1);
}

#[tokio::test]
async fn owner_cannot_chat_with_themself() {
    let h = harness().await;
    let seller = UserId::new_v4();
    let listing = h.listing(seller, Some("Phone"), Some(80_000));

    let err = h
        .service
        .registry()
        .open_or_create_chat(seller, listing.id, seller)
        .await
        .unwrap_err();
    assert!(matches!(err, ChatError::InvalidParticipants));
}

#[tokio::test]
async fn owner_must_match_listing() {
    let h = harness().await;
    let seller = UserId::new_v4();
    let listing = h.listing(seller, Some("Phone"), Some(80_000));

    let err = h
        .service
        .registry()
        .open_or_create_chat(UserId::new_v4(), listing.id, UserId::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(err, ChatError::InvalidParticipants));
}

#[tokio::test]
async fn unknown_listing_is_not_found() {
    let h = harness().await;
    let err = h
        .service
        .registry()
        .open_or_create_chat(UserId::new_v4(), ListingId::new_v4(), UserId::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(err, ChatError::NotFound(_)));
}

#[tokio::test]
async fn snapshot_uses_fallbacks_and_stays_frozen() {
    let h = harness().await;
    let buyer = UserId::new_v4();
    let seller = UserId::new_v4();
    let mut listing = h.listing(seller, None, None);

    let chat = h
        .service
        .registry()
        .open_or_create_chat(buyer, listing.id, seller)
        .await
        .unwrap();
    assert_eq!(chat.listing.name, UNTITLED_LISTING);
    assert_eq!(chat.listing.price, 0);
    assert_eq!(
        chat.listing.thumbnail.as_deref(),
        Some("http://soko.test/files/listings/1.jpg")
    );

    listing.title = Some("Renamed".into());
    listing.price = Some(999);
    h.db.upsert_listing(&listing).unwrap();

    let live = h.service.registry().live_listing(chat.id, buyer).await.unwrap();
    assert_eq!(live.title.as_deref(), Some("Renamed"));

    let cached = h.service.registry().get_chat(chat.id, buyer).await.unwrap();
    assert_eq!(cached.listing.name, UNTITLED_LISTING);
    assert_eq!(cached.listing.price, 0);
}

#[tokio::test]
async fn get_chat_checks_membership() {
    let h = harness().await;
    let (_, _, chat) = h.chat().await;

    let err = h
        .service
        .registry()
        .get_chat(chat.id, UserId::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(err, ChatError::NotAParticipant { .. }));

    let err = h
        .service
        .registry()
        .get_chat(ChatId::new_v4(), UserId::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(err, ChatError::NotFound(_)));
}

#[tokio::test]
async fn chat_list_is_ordered_by_latest_activity() {
    let h = harness().await;
    let buyer = UserId::new_v4();
    let seller = UserId::new_v4();
    let registry = h.service.registry();

    let first = h.listing(seller, Some("Desk"), Some(10));
    let second = h.listing(seller, Some("Chair"), Some(20));
    let c1 = registry.open_or_create_chat(buyer, first.id, seller).await.unwrap();
    let c2 = registry.open_or_create_chat(buyer, second.id, seller).await.unwrap();

    let ids: Vec<_> = registry
        .list_chats_for_user(buyer)
        .await
        .unwrap()
        .iter()
        .map(|c| c.id)
        .collect();
    assert_eq!(ids, vec![c2.id, c1.id]);

    h.service
        .messages()
        .append_message(c1.id, seller, None, NewMessage::text("still interested?"))
        .await
        .unwrap();

    let chats = registry.list_chats_for_user(buyer).await.unwrap();
    assert_eq!(chats[0].id, c1.id);
    let last = chats[0].last_message.as_ref().unwrap();
    assert_eq!(last.text, "still interested?");
    assert_eq!(last.sender_id, seller);
}

#[tokio::test]
async fn archive_is_per_participant() {
    let h = harness().await;
    let buyer = UserId::new_v4();
    let seller = UserId::new_v4();
    let listing = h.listing(seller, Some("Laptop"), Some(350_000));
    let registry = h.service.registry();
    let lifecycle = h.service.lifecycle();

    let chat = registry.open_or_create_chat(buyer, listing.id, seller).await.unwrap();

    let archived = lifecycle.archive(chat.id, buyer).await.unwrap();
    assert!(archived.is_archived_for(buyer));
    assert!(archived.member(buyer).archived_at.is_some());

    assert!(registry.list_chats_for_user(buyer).await.unwrap().is_empty());
    let in_archive = registry.list_archived_chats(buyer).await.unwrap();
    assert_eq!(in_archive.len(), 1);
    assert_eq!(in_archive[0].id, chat.id);

    let seller_view = registry.list_chats_for_user(seller).await.unwrap();
    assert_eq!(seller_view.len(), 1);
    assert!(registry.list_archived_chats(seller).await.unwrap().is_empty());

    let restored = lifecycle.unarchive(chat.id, buyer).await.unwrap();
    assert!(!restored.is_archived_for(buyer));
    assert_eq!(restored.member(buyer).archived_at, None);
    assert_eq!(registry.list_chats_for_user(buyer).await.unwrap().len(), 1);
}

#[tokio::test]
async fn toggle_mute_flips_and_reports() {
    let h = harness().await;
    let (buyer, seller, chat) = h.chat().await;
    let lifecycle = h.service.lifecycle();

    assert!(lifecycle.toggle_mute(chat.id, buyer).await.unwrap());
    let stored = h.service.registry().get_chat(chat.id, seller).await.unwrap();
    assert!(stored.is_muted_for(buyer));
    assert!(!stored.is_muted_for(seller));

    assert!(!lifecycle.toggle_mute(chat.id, buyer).await.unwrap());
}

#[tokio::test]
async fn outsiders_cannot_change_flags() {
    let h = harness().await;
    let (_, _, chat) = h.chat().await;
    let outsider = UserId::new_v4();
    let lifecycle = h.service.lifecycle();

    assert!(matches!(
        lifecycle.archive(chat.id, outsider).await,
        Err(ChatError::NotAParticipant { .. })
    ));
    assert!(matches!(
        lifecycle.toggle_mute(chat.id, outsider).await,
        Err(ChatError::NotAParticipant { .. })
    ));
    assert!(matches!(
        lifecycle.delete(chat.id, outsider).await,
        Err(ChatError::NotAParticipant { .. })
    ));
}

#[tokio::test]
async fn delete_removes_chat_and_messages() {
    let h = harness().await;
    let (buyer, seller, chat) = h.chat().await;
    let messages = h.service.messages();

    messages
        .append_message(chat.id, buyer, Some("Amina".into()), NewMessage::text("hello"))
        .await
        .unwrap();
    messages
        .price_quote(chat.id, seller, None, 40_000)
        .await
        .unwrap();

    h.service.lifecycle().delete(chat.id, seller).await.unwrap();

    assert!(h.db.get_chat(chat.id).unwrap().is_none());
    assert!(h.db.message_ids(chat.id).unwrap().is_empty());
    assert!(h.service.registry().list_chats_for_user(buyer).await.unwrap().is_empty());
    assert!(matches!(
        messages.fetch_all(chat.id).await,
        Err(ChatError::NotFound(_))
    ));

    // Deleting again is a no-op.
    h.service.lifecycle().delete(chat.id, buyer).await.unwrap();
}

#[tokio::test]
async fn delete_finishes_a_partially_deleted_chat() {
    let h = harness().await;
    let (buyer, seller, chat) = h.chat().await;
    let messages = h.service.messages();

    for (i, sender) in [buyer, seller, buyer, seller].into_iter().enumerate() {
        messages
            .append_message(chat.id, sender, None, NewMessage::text(format!("m{}", i)))
            .await
            .unwrap();
    }

    // An earlier delete stopped after removing half of the messages.
    let ids = h.db.message_ids(chat.id).unwrap();
    for id in &ids[..2] {
        assert!(h.db.delete_message(chat.id, *id).unwrap());
    }
    assert_eq!(messages.fetch_all(chat.id).await.unwrap().len(), 2);

    h.service.lifecycle().delete(chat.id, buyer).await.unwrap();

    assert!(h.db.get_chat(chat.id).unwrap().is_none());
    assert!(h.db.message_ids(chat.id).unwrap().is_empty());
    assert!(h.service.registry().list_chats_for_user(seller).await.unwrap().is_empty());
}

#[tokio::test]
async fn unbuilt_actions_report_not_implemented() {
    let h = harness().await;
    let (buyer, seller, chat) = h.chat().await;
    let lifecycle = h.service.lifecycle();

    assert!(matches!(
        lifecycle.report(chat.id, buyer, "spam").await,
        Err(ChatError::NotImplemented(_))
    ));
    assert!(matches!(
        lifecycle.block(buyer, seller).await,
        Err(ChatError::NotImplemented(_))
    ));
    assert!(matches!(
        lifecycle.share(chat.id, buyer).await,
        Err(ChatError::NotImplemented(_))
    ));
}

#[tokio::test]
async fn buyer_archives_while_seller_keeps_chat() {
    let h = harness().await;
    let a1 = UserId::new_v4();
    let s1 = UserId::new_v4();
    let l1 = h.listing(s1, Some("Mini fridge"), Some(5000));
    let registry = h.service.registry();
    let messages = h.service.messages();

    let c1 = registry.open_or_create_chat(a1, l1.id, s1).await.unwrap();
    assert!(c1.has_participant(a1) && c1.has_participant(s1));

    messages
        .append_message(c1.id, a1, None, NewMessage::text("Is this available?"))
        .await
        .unwrap();
    let chat = registry.get_chat(c1.id, a1).await.unwrap();
    assert_eq!(chat.last_message.unwrap().text, "Is this available?");

    let quote = NewMessage {
        text: Some("Price: MWK 5000".into()),
        image_url: None,
        payload: Some(soko_types::models::StructuredPayload::PriceQuote { price: 5000 }),
    };
    messages.append_message(c1.id, s1, None, quote).await.unwrap();
    let chat = registry.get_chat(c1.id, s1).await.unwrap();
    assert_eq!(chat.last_message.unwrap().text, "Price: MWK 5000");

    h.service.lifecycle().archive(c1.id, a1).await.unwrap();
    assert!(registry
        .list_chats_for_user(a1)
        .await
        .unwrap()
        .iter()
        .all(|c| c.id != c1.id));
    assert!(registry
        .list_chats_for_user(s1)
        .await
        .unwrap()
        .iter()
        .any(|c| c.id == c1.id));

    // History is untouched by archiving.
    assert_eq!(messages.fetch_all(c1.id).await.unwrap().len(), 2);
}
