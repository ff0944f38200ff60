#![allow(dead_code)]

use std::sync::Arc;

use rust_decimal::Decimal;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use url::Url;
use uuid::Uuid;
use wishlist_core::config::{RealtimeConfig, TokenConfig};
use wishlist_core::entities::{Item, ItemMode, NewItem, NewWishlist};
use wishlist_core::{ConsistencyCore, MemoryStore};
use wishlist_sdk::client::{OwnerClient, PublicClient};
use wishlist_server::server::serve;
use wishlist_server::state::AppState;

pub const SECRET: &[u8] = b"integration-test-secret";

/// A server on an ephemeral port backed by an in-memory store.
pub struct TestServer {
    pub base_url: Url,
    pub core: Arc<ConsistencyCore>,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<Result<(), std::io::Error>>>,
}

/// A list created directly through the core, seen from the outside.
pub struct TestList {
    pub owner_id: Uuid,
    pub wishlist_id: Uuid,
    pub slug: Option<String>,
    pub items: Vec<Item>,
}

impl TestServer {
    pub async fn spawn() -> Self {
        Self::spawn_with(RealtimeConfig::default()).await
    }

    pub async fn spawn_with(realtime: RealtimeConfig) -> Self {
        let core = Arc::new(ConsistencyCore::new(
            Arc::new(MemoryStore::new()),
            &TokenConfig::new(SECRET.to_vec()),
            realtime,
        ));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(serve(listener, AppState::new(core.clone()), async {
            let _ = shutdown_rx.await;
        }));
        TestServer {
            base_url: Url::parse(&format!("http://{addr}")).unwrap(),
            core,
            shutdown: Some(shutdown_tx),
            task: Some(task),
        }
    }

    pub fn public_client(&self) -> PublicClient {
        PublicClient::new(self.base_url.clone())
    }

    pub fn owner_client(&self, owner_id: Uuid) -> OwnerClient {
        OwnerClient::new(
            self.base_url.clone(),
            self.core.signer().issue_owner(owner_id),
        )
    }

    pub fn ws_url(&self, slug: &str, cursor: Option<i64>) -> String {
        let mut url = format!(
            "ws://{}:{}/api/v1/ws/public/w/{slug}",
            self.base_url.host_str().unwrap(),
            self.base_url.port().unwrap()
        );
        if let Some(cursor) = cursor {
            url.push_str(&format!("?cursor={cursor}"));
        }
        url
    }

    pub fn url(&self, path: &str) -> Url {
        self.base_url.join(path).unwrap()
    }

    /// Create a draft list with `items`, published when `publish` is set.
    pub async fn list(&self, items: Vec<NewItem>, publish: bool) -> TestList {
        let owner_id = Uuid::new_v4();
        let wishlist = self
            .core
            .create_wishlist(NewWishlist {
                owner_id,
                title: "Housewarming".to_string(),
                description: None,
                currency: "RUB".to_string(),
            })
            .await
            .unwrap();
        let mut created = Vec::new();
        for item in items {
            created.push(
                self.core
                    .create_item(owner_id, wishlist.id, item)
                    .await
                    .unwrap(),
            );
        }
        let slug = if publish {
            self.core
                .publish(owner_id, wishlist.id)
                .await
                .unwrap()
                .share_slug
        } else {
            None
        };
        TestList {
            owner_id,
            wishlist_id: wishlist.id,
            slug,
            items: created,
        }
    }

    /// Trigger graceful shutdown and wait for the server task.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            task.await.unwrap().unwrap();
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl TestList {
    pub fn slug(&self) -> &str {
        self.slug.as_deref().unwrap()
    }
}

pub fn single(title: &str) -> NewItem {
    NewItem {
        title: title.to_string(),
        product_url: None,
        image_url: None,
        notes: None,
        price: Some(Decimal::new(4990, 0)),
        mode: ItemMode::Single,
        target_amount: None,
        position: None,
    }
}

pub fn group(title: &str, target: i64) -> NewItem {
    NewItem {
        title: title.to_string(),
        product_url: None,
        image_url: None,
        notes: None,
        price: None,
        mode: ItemMode::Group,
        target_amount: Some(Decimal::from(target)),
        position: None,
    }
}
