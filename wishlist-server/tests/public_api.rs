mod common;

use common::{TestServer, group, single};
use reqwest::StatusCode;
use rust_decimal::Decimal;
use std::collections::HashSet;
use wishlist_sdk::client::ClientError;
use wishlist_sdk::objects::{
    ErrorBody, EventType, GUEST_TOKEN_HEADER, PublicItems, ViewerKind,
};

#[tokio::test]
async fn test_concurrent_reserves_over_http_have_one_winner() {
    let server = TestServer::spawn().await;
    let list = server.list(vec![single("Blender")], true).await;
    let slug = list.slug();
    let item_id = list.items[0].id;

    let alice = server.public_client();
    let bob = server.public_client();
    alice.create_guest_session(slug, "Alice").await.unwrap();
    bob.create_guest_session(slug, "Bob").await.unwrap();

    let (a, b) = tokio::join!(alice.reserve(slug, item_id), bob.reserve(slug, item_id));
    let outcomes = [a, b];
    let winners = outcomes.iter().filter(|r| r.is_ok()).count();
    let conflicts = outcomes
        .iter()
        .filter(|r| matches!(r, Err(ClientError::Conflict(_))))
        .count();
    assert_eq!((winners, conflicts), (1, 1));

    let winner_is_alice = outcomes[0].is_ok();
    for (client, is_winner) in [(&alice, winner_is_alice), (&bob, !winner_is_alice)] {
        let view = client.get_wishlist(slug).await.unwrap();
        assert_eq!(view.viewer_kind, ViewerKind::Guest);
        let PublicItems::Guest(items) = view.items else {
            panic!("guest view expected");
        };
        assert!(items[0].is_reserved);
        assert_eq!(items[0].reserved_by_you, is_winner);
    }

    let page = alice.events(slug, None, None).await.unwrap();
    let reserved = page
        .events
        .iter()
        .filter(|e| e.event_type == EventType::ItemReserved)
        .count();
    assert_eq!(reserved, 1);
}

#[tokio::test]
async fn test_contributions_accumulate_and_progress_clamps() {
    let server = TestServer::spawn().await;
    let list = server.list(vec![group("Sofa", 10000)], true).await;
    let slug = list.slug();
    let sofa = list.items[0].id;

    let guest = server.public_client();
    guest.create_guest_session(slug, "Aunt May").await.unwrap();

    let first = guest
        .contribute(slug, sofa, Decimal::new(3000, 0))
        .await
        .unwrap();
    assert_eq!(first.collected_amount, Decimal::new(3000, 0));
    assert_eq!(first.progress_percent, 30.0);

    let second = guest
        .contribute(slug, sofa, Decimal::new(8000, 0))
        .await
        .unwrap();
    assert_eq!(second.accepted_amount, Decimal::new(8000, 0));
    assert_eq!(second.collected_amount, Decimal::new(11000, 0));
    assert_eq!(second.progress_percent, 100.0);

    let view = guest.get_wishlist(slug).await.unwrap();
    let PublicItems::Guest(items) = view.items else {
        panic!("guest view expected");
    };
    assert_eq!(items[0].my_contribution, Decimal::new(11000, 0));
}

#[tokio::test]
async fn test_invalid_contribution_amounts_are_rejected() {
    let server = TestServer::spawn().await;
    let list = server.list(vec![group("Sofa", 10000)], true).await;
    let slug = list.slug();
    let guest = server.public_client();
    let session = guest.create_guest_session(slug, "Aunt May").await.unwrap();
    let url = server.url(&format!(
        "/api/v1/public/w/{slug}/items/{}/contributions",
        list.items[0].id
    ));
    let http = reqwest::Client::new();

    for body in [
        serde_json::json!({"amount": "0"}),
        serde_json::json!({"amount": "-5"}),
        serde_json::json!({"amount": "1.005"}),
        serde_json::json!({"amount": "lots"}),
        serde_json::json!({"amount": "10000000000.00"}),
        serde_json::json!({"amount": "50000000000000000000000000000"}),
    ] {
        let resp = http
            .post(url.clone())
            .header(GUEST_TOKEN_HEADER, &session.token)
            .json(&body)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY, "{body}");
        let error: ErrorBody = resp.json().await.unwrap();
        assert!(!error.detail.is_empty());
    }

    // Still a healthy item afterwards.
    let accepted = guest
        .contribute(slug, list.items[0].id, Decimal::new(3000, 0))
        .await
        .unwrap();
    assert_eq!(accepted.collected_amount, Decimal::new(3000, 0));
}

#[tokio::test]
async fn test_mutations_require_guest_token() {
    let server = TestServer::spawn().await;
    let list = server.list(vec![single("Blender")], true).await;
    let url = server.url(&format!(
        "/api/v1/public/w/{}/items/{}/reserve",
        list.slug(),
        list.items[0].id
    ));
    let http = reqwest::Client::new();

    let resp = http.post(url.clone()).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = http
        .post(url)
        .header(GUEST_TOKEN_HEADER, "not-a-token")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_guest_sessions_are_never_reused() {
    let server = TestServer::spawn().await;
    let list = server.list(vec![], true).await;
    let client = server.public_client();

    let first = client.create_guest_session(list.slug(), "  Alice  ").await.unwrap();
    let second = client.create_guest_session(list.slug(), "Alice").await.unwrap();
    assert_eq!(first.guest_name, "Alice");
    assert_ne!(first.guest_session_id, second.guest_session_id);
    assert_ne!(first.token, second.token);

    let cached = client.ensure_guest_session(list.slug(), "Bob").await.unwrap();
    assert_eq!(cached.guest_session_id, second.guest_session_id);
}

#[tokio::test]
async fn test_concurrent_ensure_registers_one_guest_session() {
    let server = TestServer::spawn().await;
    let list = server.list(vec![], true).await;
    let client = server.public_client();

    let (a, b) = tokio::join!(
        client.ensure_guest_session(list.slug(), "Alice"),
        client.ensure_guest_session(list.slug(), "Alice"),
    );
    let (a, b) = (a.unwrap(), b.unwrap());
    assert_eq!(a.guest_session_id, b.guest_session_id);
    assert_eq!(a.token, b.token);

    let cached = client.ensure_guest_session(list.slug(), "Bob").await.unwrap();
    assert_eq!(cached.guest_session_id, a.guest_session_id);
}

#[tokio::test]
async fn test_unknown_slug_is_not_found() {
    let server = TestServer::spawn().await;
    let draft = server.list(vec![single("Blender")], false).await;
    assert!(draft.slug.is_none());
    let client = server.public_client();

    assert!(matches!(
        client.get_wishlist("nope-000000").await,
        Err(ClientError::NotFound(_))
    ));
    assert!(matches!(
        client.events("nope-000000", None, None).await,
        Err(ClientError::NotFound(_))
    ));
    assert!(matches!(
        client.create_guest_session("nope-000000", "Alice").await,
        Err(ClientError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_fetch_since_is_a_monotone_superset() {
    let server = TestServer::spawn().await;
    let list = server
        .list(vec![single("Blender"), group("Sofa", 10000)], true)
        .await;
    let slug = list.slug();
    let guest = server.public_client();
    guest.create_guest_session(slug, "Alice").await.unwrap();

    let before = guest.events(slug, Some(0), None).await.unwrap();
    guest.reserve(slug, list.items[0].id).await.unwrap();
    guest
        .contribute(slug, list.items[1].id, Decimal::new(500, 0))
        .await
        .unwrap();
    let after = guest.events(slug, Some(0), None).await.unwrap();

    let before_ids: HashSet<i64> = before.events.iter().map(|e| e.id).collect();
    let after_ids: HashSet<i64> = after.events.iter().map(|e| e.id).collect();
    assert!(after_ids.is_superset(&before_ids));
    assert_eq!(after_ids.len(), before_ids.len() + 2);

    let ids: Vec<i64> = after.events.iter().map(|e| e.id).collect();
    assert!(ids.windows(2).all(|w| w[0] < w[1]));

    let cursor = *ids.first().unwrap();
    let tail = guest.events(slug, Some(cursor), None).await.unwrap();
    assert!(tail.events.iter().all(|e| e.id > cursor));
    assert_eq!(tail.events.len(), ids.len() - 1);
}

#[tokio::test]
async fn test_events_paging_and_limit_bounds() {
    let server = TestServer::spawn().await;
    let list = server
        .list(
            vec![single("A"), single("B"), single("C"), single("D")],
            true,
        )
        .await;
    let slug = list.slug();
    let client = server.public_client();

    let mut cursor = None;
    let mut seen = Vec::new();
    loop {
        let page = client.events(slug, cursor, Some(2)).await.unwrap();
        assert!(page.events.len() <= 2);
        seen.extend(page.events.iter().map(|e| e.id));
        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }
    // Four item creations and the publication.
    assert_eq!(seen.len(), 5);
    assert!(seen.windows(2).all(|w| w[0] < w[1]));

    for limit in ["0", "201"] {
        let resp = reqwest::get(server.url(&format!(
            "/api/v1/public/w/{slug}/events?limit={limit}"
        )))
        .await
        .unwrap();
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}

#[tokio::test]
async fn test_owner_token_yields_aggregate_view() {
    let server = TestServer::spawn().await;
    let list = server.list(vec![single("Blender")], true).await;
    let slug = list.slug();

    let guest = server.public_client();
    guest.create_guest_session(slug, "Alice").await.unwrap();
    guest.reserve(slug, list.items[0].id).await.unwrap();

    let owner = server
        .public_client()
        .with_owner_token(server.core.signer().issue_owner(list.owner_id));
    let view = owner.get_wishlist(slug).await.unwrap();
    assert_eq!(view.viewer_kind, ViewerKind::Owner);
    let PublicItems::Owner(items) = view.items else {
        panic!("owner view expected");
    };
    assert!(items[0].is_reserved);

    // Someone else's owner token is just an anonymous visitor here.
    let stranger = server
        .public_client()
        .with_owner_token(server.core.signer().issue_owner(uuid::Uuid::new_v4()));
    let view = stranger.get_wishlist(slug).await.unwrap();
    assert_eq!(view.viewer_kind, ViewerKind::Anonymous);
}
