//! Connection pool behavior against a live backend.

use std::sync::Arc;

use dcc_bridge::client::ConnectionPool;
use dcc_bridge::protocol::CommandParams;

use crate::common;

#[tokio::test]
async fn test_pool_reuses_released_client() {
    let handle = common::start_host("modeler");
    let pool = ConnectionPool::new(common::client_config(handle.local_addr()), 2);

    let client = pool.acquire().await;
    assert!(client
        .send_command("ping", CommandParams::new())
        .await
        .is_success());
    pool.release(client).await;
    assert_eq!(pool.idle_count().await, 1);

    // The idle client is handed back still connected.
    let reused = pool.acquire().await;
    assert_eq!(pool.idle_count().await, 0);
    assert!(reused.is_connected().await);

    pool.release(reused).await;
    pool.close().await;
    handle.shutdown();
}

#[tokio::test]
async fn test_pool_never_grows_past_capacity() {
    let handle = common::start_host("modeler");
    let pool = ConnectionPool::new(common::client_config(handle.local_addr()), 1);

    let first = pool.acquire().await;
    let second = pool.acquire().await;
    assert!(first.is_connected().await);
    assert!(second.is_connected().await);

    pool.release(first).await;
    let surplus = Arc::clone(&second);
    pool.release(second).await;

    // Capacity is 1: the surplus client was disconnected, not cached.
    assert_eq!(pool.idle_count().await, 1);
    assert!(!surplus.is_connected().await);

    pool.close().await;
    assert_eq!(pool.idle_count().await, 0);
    handle.shutdown();
}

#[tokio::test]
async fn test_pool_drops_stale_idle_clients() {
    let handle = common::start_host("modeler");
    let pool = ConnectionPool::new(common::client_config(handle.local_addr()), 2);

    let client = pool.acquire().await;
    let stale = Arc::clone(&client);
    pool.release(client).await;
    assert_eq!(pool.idle_count().await, 1);

    // Kill the cached connection behind the pool's back.
    stale.disconnect().await;

    // acquire skips the stale entry and builds a fresh connection.
    let fresh = pool.acquire().await;
    assert!(fresh.is_connected().await);

    pool.release(fresh).await;
    pool.close().await;
    handle.shutdown();
}
