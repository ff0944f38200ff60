mod common;

use common::{TestServer, single};
use reqwest::StatusCode;
use wishlist_sdk::client::ClientError;
use wishlist_sdk::objects::{EventType, WishlistStatus};

#[tokio::test]
async fn test_publish_close_and_republish_keep_the_slug() {
    let server = TestServer::spawn().await;
    let list = server.list(vec![single("Blender")], false).await;
    let owner = server.owner_client(list.owner_id);

    let published = owner.publish(list.wishlist_id).await.unwrap();
    assert_eq!(published.status, WishlistStatus::Published);
    let slug = published.share_slug.clone().unwrap();
    assert!(slug.starts_with("housewarming-"));

    let guest = server.public_client();
    guest.create_guest_session(&slug, "Alice").await.unwrap();

    let closed = owner.close(list.wishlist_id).await.unwrap();
    assert_eq!(closed.status, WishlistStatus::Closed);

    // Closed lists stay readable but refuse guest mutations.
    let view = guest.get_wishlist(&slug).await.unwrap();
    assert_eq!(view.status, WishlistStatus::Closed);
    assert!(matches!(
        guest.reserve(&slug, list.items[0].id).await,
        Err(ClientError::Conflict(_))
    ));

    let republished = owner.publish(list.wishlist_id).await.unwrap();
    assert_eq!(republished.share_slug.as_deref(), Some(slug.as_str()));

    let types: Vec<EventType> = guest
        .events(&slug, None, None)
        .await
        .unwrap()
        .events
        .iter()
        .map(|e| e.event_type)
        .collect();
    assert_eq!(
        types,
        [
            EventType::ItemUpdated,
            EventType::WishlistPublished,
            EventType::WishlistClosed,
            EventType::WishlistPublished
        ]
    );
}

#[tokio::test]
async fn test_closing_a_draft_conflicts() {
    let server = TestServer::spawn().await;
    let list = server.list(vec![], false).await;
    let owner = server.owner_client(list.owner_id);
    assert!(matches!(
        owner.close(list.wishlist_id).await,
        Err(ClientError::Conflict(_))
    ));
}

#[tokio::test]
async fn test_archived_items_disappear_from_public_view() {
    let server = TestServer::spawn().await;
    let list = server
        .list(vec![single("Blender"), single("Kettle")], true)
        .await;
    let owner = server.owner_client(list.owner_id);

    owner
        .archive_item(list.wishlist_id, list.items[0].id)
        .await
        .unwrap();

    let view = server.public_client().get_wishlist(list.slug()).await.unwrap();
    assert_eq!(view.items.len(), 1);
    let snapshots = view.items.snapshots();
    assert_eq!(snapshots[0].title, "Kettle");

    let last = server
        .public_client()
        .events(list.slug(), None, None)
        .await
        .unwrap()
        .events
        .pop()
        .unwrap();
    assert_eq!(last.event_type, EventType::ItemArchived);
    assert_eq!(last.item_id, Some(list.items[0].id));
}

#[tokio::test]
async fn test_foreign_lists_look_missing() {
    let server = TestServer::spawn().await;
    let list = server.list(vec![single("Blender")], false).await;
    let stranger = server.owner_client(uuid::Uuid::new_v4());

    assert!(matches!(
        stranger.publish(list.wishlist_id).await,
        Err(ClientError::NotFound(_))
    ));
    assert!(matches!(
        stranger.archive_item(list.wishlist_id, list.items[0].id).await,
        Err(ClientError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_owner_routes_reject_guest_and_garbage_tokens() {
    let server = TestServer::spawn().await;
    let list = server.list(vec![], true).await;
    let guest = server
        .public_client()
        .create_guest_session(list.slug(), "Alice")
        .await
        .unwrap();
    let url = server.url(&format!("/api/v1/wishlists/{}/close", list.wishlist_id));
    let http = reqwest::Client::new();

    for token in [guest.token.as_str(), "garbage"] {
        let resp = http
            .post(url.clone())
            .bearer_auth(token)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    let resp = http
        .post(server.url("/api/v1/wishlists/not-a-uuid/close"))
        .bearer_auth(server.core.signer().issue_owner(list.owner_id))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}
