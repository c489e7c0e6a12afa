//! End-to-end ring tests.
//!
//! Each test boots real peers on ephemeral loopback ports inside the test
//! runtime and drives them through the wire protocol, exactly as separate
//! processes would. Keys whose placement matters are picked dynamically,
//! since ephemeral ports decide the node ids.

use std::time::Duration;

use ringstore_sdk::client;
use ringstore_sdk::message::{
    FindSuccessorReply, GetAllReply, GetReply, OverlayReply, PutValue, Request, StatusReply,
};
use ringstore_server::config::Consistency;
use ringstore_server::node::Node;
use ringstore_server::ring::{hash, in_interval};
use ringstore_server::server::Server;
use tokio::net::TcpListener;

const HOST: &str = "127.0.0.1";

struct TestPeer {
    node: Node,
    port: u16,
}

impl TestPeer {
    fn id(&self) -> u64 {
        self.node.id()
    }

    async fn call<T: serde::de::DeserializeOwned>(&self, req: &Request) -> T {
        client::call(HOST, self.port, req).await.expect("peer call")
    }
}

/// Boot a peer whose id collides with none of `taken` (possible under an
/// 8-bit ring), serving before any join so neighbors can call back in.
async fn start_peer(
    replication: u32,
    consistency: Consistency,
    bootstrap: Option<&TestPeer>,
    taken: &[u64],
) -> TestPeer {
    loop {
        let listener = TcpListener::bind((HOST, 0)).await.expect("bind");
        let port = listener.local_addr().expect("local addr").port();
        if taken.contains(&hash(&format!("{HOST}:{port}"))) {
            continue;
        }
        let node = Node::new(HOST, port, replication, consistency);
        let server = Server::new(node.clone(), listener);
        tokio::spawn(async move {
            let _ = server.run().await;
        });
        if let Some(peer) = bootstrap {
            node.join(HOST, peer.port).await;
            // Let eventual-mode membership traffic settle so every test
            // starts from a linked ring.
            node.drain().await;
        }
        return TestPeer { node, port };
    }
}

/// A key (from a deterministic family) whose id satisfies `pred`.
fn key_where(pred: impl Fn(u64) -> bool) -> String {
    (0..10_000)
        .map(|i| format!("key-{i}"))
        .find(|k| pred(hash(k)))
        .expect("key family exhausts the ring")
}

/// The peer whose arc `(predecessor, self]` contains `key_id`.
fn custodian_of<'a>(peers: &[&'a TestPeer], key_id: u64) -> &'a TestPeer {
    let owners: Vec<&TestPeer> = peers
        .iter()
        .copied()
        .filter(|p| in_interval(key_id, p.node.predecessor().id, p.id(), true))
        .collect();
    assert_eq!(owners.len(), 1, "arc partition must be exclusive");
    owners[0]
}

// ── Scenario: bootstrap + single insert ──────────────────────────

#[tokio::test]
async fn bootstrap_and_single_insert() {
    let a = start_peer(1, Consistency::Strong, None, &[]).await;

    let reply: StatusReply = a
        .call(&Request::Put {
            key: "alpha".into(),
            value: PutValue::One("v1".into()),
            start_node_id: None,
            ttl: None,
        })
        .await;
    assert_eq!(reply.status, "OK");
    assert!(a.node.store_snapshot().contains(hash("alpha"), "alpha"));

    let reply: GetReply = a
        .call(&Request::Get { key: "alpha".into(), start_node_id: None, ttl: None })
        .await;
    assert_eq!(reply.value, vec!["v1".to_string()]);
    assert_eq!(reply.id, a.id() as i64);
}

// ── Scenario: two-peer ring, custody routing ─────────────────────

#[tokio::test]
async fn two_peer_custody_routing() {
    let a = start_peer(1, Consistency::Strong, None, &[]).await;
    let b = start_peer(1, Consistency::Strong, Some(&a), &[a.id()]).await;

    // Ring is linked both ways.
    assert_eq!(a.node.successor().id, b.id());
    assert_eq!(a.node.predecessor().id, b.id());
    assert_eq!(b.node.successor().id, a.id());
    assert_eq!(b.node.predecessor().id, a.id());

    // A key in B's arc, inserted via A, must land on B only.
    let key = key_where(|id| in_interval(id, a.id(), b.id(), true));
    let _: StatusReply = a
        .call(&Request::Put {
            key: key.clone(),
            value: PutValue::One("v".into()),
            start_node_id: None,
            ttl: None,
        })
        .await;

    assert!(b.node.store_snapshot().contains(hash(&key), &key));
    assert!(!a.node.store_snapshot().contains(hash(&key), &key));

    // Querying through A answers from B.
    let reply: GetReply =
        a.call(&Request::Get { key: key.clone(), start_node_id: None, ttl: None }).await;
    assert_eq!(reply.value, vec!["v".to_string()]);
    assert_eq!(reply.id, b.id() as i64);
}

#[tokio::test]
async fn find_successor_routes_across_the_ring() {
    let a = start_peer(1, Consistency::Strong, None, &[]).await;
    let b = start_peer(1, Consistency::Strong, Some(&a), &[a.id()]).await;
    let c = start_peer(1, Consistency::Strong, Some(&a), &[a.id(), b.id()]).await;

    let peers = [&a, &b, &c];
    for key in ["alpha", "zeta", "song", "key-7"] {
        let expected = custodian_of(&peers, hash(key));
        let reply: FindSuccessorReply =
            a.call(&Request::FindSuccessor { key_id: hash(key) }).await;
        assert_eq!(reply.successor.id, expected.id(), "custodian of {key}");
    }
}

#[tokio::test]
async fn ring_closure_after_joins() {
    let a = start_peer(1, Consistency::Strong, None, &[]).await;
    let b = start_peer(1, Consistency::Strong, Some(&a), &[a.id()]).await;
    let c = start_peer(1, Consistency::Strong, Some(&b), &[a.id(), b.id()]).await;

    // Following successors from any peer visits all three and returns.
    let peers = [&a, &b, &c];
    for start in &peers {
        let mut seen = vec![start.id()];
        let mut current = start.node.successor();
        for _ in 0..2 {
            seen.push(current.id);
            let next = peers.iter().find(|p| p.id() == current.id).expect("live peer");
            current = next.node.successor();
        }
        assert_eq!(current.id, start.id(), "ring must close in exactly three hops");
        seen.sort_unstable();
        seen.dedup();
        assert_eq!(seen.len(), 3, "walk must visit every peer once");
    }
}

// ── Scenario: replication R=3, strong mode ───────────────────────

#[tokio::test]
async fn strong_replication_reaches_all_replicas() {
    let a = start_peer(3, Consistency::Strong, None, &[]).await;
    let b = start_peer(3, Consistency::Strong, Some(&a), &[a.id()]).await;
    let c = start_peer(3, Consistency::Strong, Some(&a), &[a.id(), b.id()]).await;

    let key = key_where(|id| in_interval(id, a.node.predecessor().id, a.id(), true));
    let _: StatusReply = a
        .call(&Request::Put {
            key: key.clone(),
            value: PutValue::One("v".into()),
            start_node_id: None,
            ttl: None,
        })
        .await;

    // Strong mode: on ack every copy exists.
    for peer in [&a, &b, &c] {
        assert!(
            peer.node.store_snapshot().contains(hash(&key), &key),
            "peer {} must hold the replicated key",
            peer.id()
        );
    }

    // Any peer answers the query.
    for peer in [&a, &b, &c] {
        let reply: GetReply =
            peer.call(&Request::Get { key: key.clone(), start_node_id: None, ttl: None }).await;
        assert_eq!(reply.value, vec!["v".to_string()]);
    }
}

#[tokio::test]
async fn replication_factor_larger_than_ring_terminates() {
    let a = start_peer(10, Consistency::Strong, None, &[]).await;
    let b = start_peer(10, Consistency::Strong, Some(&a), &[a.id()]).await;
    let c = start_peer(10, Consistency::Strong, Some(&a), &[a.id(), b.id()]).await;

    // Insert through the custodian: the chain then covers the full ring
    // and must stop on the wrap, not on the (much larger) hop budget.
    let peers = [&a, &b, &c];
    let owner = custodian_of(&peers, hash("alpha"));
    let _: StatusReply = owner
        .call(&Request::Put {
            key: "alpha".into(),
            value: PutValue::One("v".into()),
            start_node_id: None,
            ttl: None,
        })
        .await;

    for peer in peers {
        assert!(peer.node.store_snapshot().contains(hash("alpha"), "alpha"));
    }
    let reply: GetReply =
        c.call(&Request::Get { key: "alpha".into(), start_node_id: None, ttl: None }).await;
    assert_eq!(reply.value, vec!["v".to_string()]);
}

#[tokio::test]
async fn strong_delete_walks_the_chain() {
    let a = start_peer(3, Consistency::Strong, None, &[]).await;
    let b = start_peer(3, Consistency::Strong, Some(&a), &[a.id()]).await;
    let c = start_peer(3, Consistency::Strong, Some(&a), &[a.id(), b.id()]).await;

    let _: StatusReply = a
        .call(&Request::Put {
            key: "alpha".into(),
            value: PutValue::One("v".into()),
            start_node_id: None,
            ttl: None,
        })
        .await;
    let reply: StatusReply = a
        .call(&Request::Delete {
            key: Some("alpha".into()),
            value: Some("v".into()),
            start_node_id: None,
            ttl: None,
        })
        .await;
    assert_eq!(reply.status, "OK");

    for peer in [&a, &b, &c] {
        assert!(!peer.node.store_snapshot().contains(hash("alpha"), "alpha"));
    }

    let reply: StatusReply = a
        .call(&Request::Delete {
            key: Some("alpha".into()),
            value: Some("v".into()),
            start_node_id: None,
            ttl: None,
        })
        .await;
    assert_eq!(reply.status, "NOT_FOUND");
}

// ── Scenario: eventual-mode stale read, then quiescence ──────────

#[tokio::test]
async fn eventual_mode_converges_after_drain() {
    let a = start_peer(3, Consistency::Eventual, None, &[]).await;
    let b = start_peer(3, Consistency::Eventual, Some(&a), &[a.id()]).await;
    let c = start_peer(3, Consistency::Eventual, Some(&a), &[a.id(), b.id()]).await;

    let key = key_where(|id| in_interval(id, a.node.predecessor().id, a.id(), true));
    let _: StatusReply = a
        .call(&Request::Put {
            key: key.clone(),
            value: PutValue::One("v".into()),
            start_node_id: None,
            ttl: None,
        })
        .await;

    // Immediately after the ack the chain may or may not have run; either
    // answer is legal in eventual mode.
    let reply: GetReply =
        b.call(&Request::Get { key: key.clone(), start_node_id: None, ttl: None }).await;
    assert!(reply.value.is_empty() || reply.value == vec!["v".to_string()]);

    // After every fire-and-forget task drains, all replicas hold the key.
    for peer in [&a, &b, &c] {
        peer.node.drain().await;
    }
    for peer in [&a, &b, &c] {
        assert!(
            peer.node.store_snapshot().contains(hash(&key), &key),
            "peer {} must converge",
            peer.id()
        );
        let reply: GetReply =
            peer.call(&Request::Get { key: key.clone(), start_node_id: None, ttl: None }).await;
        assert_eq!(reply.value, vec!["v".to_string()]);
    }
}

// ── Scenario: join pulls responsibility ──────────────────────────

#[tokio::test]
async fn join_transfers_owned_keys() {
    let a = start_peer(1, Consistency::Strong, None, &[]).await;
    // Seed keys while A is alone; it owns the whole ring.
    for i in 0..20 {
        let key = format!("seed-{i}");
        let _: StatusReply = a
            .call(&Request::Put {
                key,
                value: PutValue::One("v".into()),
                start_node_id: None,
                ttl: None,
            })
            .await;
    }

    let b = start_peer(1, Consistency::Strong, Some(&a), &[a.id()]).await;

    // Keys strictly inside (A, B) moved to the joiner and left A.
    let moved: Vec<String> = (0..20)
        .map(|i| format!("seed-{i}"))
        .filter(|k| in_interval(hash(k), a.id(), b.id(), false))
        .collect();
    for key in &moved {
        assert!(
            b.node.store_snapshot().contains(hash(key), key),
            "{key} must follow its arc to the joiner"
        );
        assert!(
            !a.node.store_snapshot().contains(hash(key), key),
            "{key} must leave the old custodian"
        );
    }

    // Every key still answers through either peer. Keys colliding with a
    // peer's own id sit exactly on the handoff boundary and stay behind,
    // so they are exempt.
    for i in 0..20 {
        let key = format!("seed-{i}");
        if hash(&key) == a.id() || hash(&key) == b.id() {
            continue;
        }
        let reply: GetReply =
            b.call(&Request::Get { key: key.clone(), start_node_id: None, ttl: None }).await;
        assert_eq!(reply.value, vec!["v".to_string()], "{key} lost after join");
    }
}

// ── Scenario: graceful depart moves data ─────────────────────────

#[tokio::test]
async fn depart_moves_data_and_relinks_ring() {
    let a = start_peer(3, Consistency::Strong, None, &[]).await;
    let b = start_peer(3, Consistency::Strong, Some(&a), &[a.id()]).await;
    let c = start_peer(3, Consistency::Strong, Some(&a), &[a.id(), b.id()]).await;

    // A key in A's own arc: the chain covers A and both replicas.
    let key = key_where(|id| in_interval(id, a.node.predecessor().id, a.id(), true));
    let _: StatusReply = a
        .call(&Request::Put {
            key: key.clone(),
            value: PutValue::One("v".into()),
            start_node_id: None,
            ttl: None,
        })
        .await;

    let reply: StatusReply = b.call(&Request::Depart).await;
    assert_eq!(reply.status, "departing");
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Ring is A ↔ C now.
    assert_eq!(a.node.successor().id, c.id());
    assert_eq!(c.node.successor().id, a.id());

    // Survivors still hold the key; B's endpoint is closed.
    assert!(a.node.store_snapshot().contains(hash(&key), &key));
    assert!(c.node.store_snapshot().contains(hash(&key), &key));
    assert!(
        client::call::<StatusReply>(HOST, b.port, &Request::GetNodeInfo).await.is_err(),
        "departed peer must stop serving"
    );

    // Overlay from A lists exactly the two survivors.
    let reply: OverlayReply = a.call(&Request::GetOverlay { start_node_id: None }).await;
    let mut ids: Vec<u64> = reply.overlay.iter().map(|s| s.node_id).collect();
    ids.sort_unstable();
    let mut expected = vec![a.id(), c.id()];
    expected.sort_unstable();
    assert_eq!(ids, expected);
}

// ── Scenario: uploader cleanup on depart ─────────────────────────

#[tokio::test]
async fn depart_scrubs_uploader_tags() {
    let y = start_peer(3, Consistency::Strong, None, &[]).await;
    let x = start_peer(3, Consistency::Strong, Some(&y), &[y.id()]).await;
    let tag = format!("{HOST}:{}", x.port);

    for key in ["k1", "k2"] {
        let _: StatusReply = x
            .call(&Request::Put {
                key: key.into(),
                value: PutValue::One(tag.clone()),
                start_node_id: None,
                ttl: None,
            })
            .await;
    }
    assert_eq!(x.node.uploaded_keys(), vec!["k1".to_string(), "k2".to_string()]);

    let _: StatusReply = x.call(&Request::Depart).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    for key in ["k1", "k2"] {
        let reply: GetReply =
            y.call(&Request::Get { key: key.into(), start_node_id: None, ttl: None }).await;
        assert!(
            !reply.value.contains(&tag),
            "{key} must not keep the departed uploader's tag"
        );
        assert!(!y.node.store_snapshot().values(hash(key), key).is_some_and(|v| v.contains(&tag)));
    }
}

// ── Wildcard dump and overlay ────────────────────────────────────

#[tokio::test]
async fn wildcard_get_lists_every_peer_once() {
    let a = start_peer(1, Consistency::Strong, None, &[]).await;
    let b = start_peer(1, Consistency::Strong, Some(&a), &[a.id()]).await;

    let _: StatusReply = a
        .call(&Request::Put {
            key: "alpha".into(),
            value: PutValue::One("v".into()),
            start_node_id: None,
            ttl: None,
        })
        .await;

    let reply: GetAllReply =
        a.call(&Request::Get { key: "*".into(), start_node_id: None, ttl: None }).await;
    let mut ids: Vec<u64> = reply.value.keys().copied().collect();
    ids.sort_unstable();
    let mut expected = vec![a.id(), b.id()];
    expected.sort_unstable();
    assert_eq!(ids, expected, "wildcard dump must cover each peer exactly once");
}

#[tokio::test]
async fn overlay_walks_the_whole_ring() {
    let a = start_peer(1, Consistency::Strong, None, &[]).await;
    let b = start_peer(1, Consistency::Strong, Some(&a), &[a.id()]).await;
    let c = start_peer(1, Consistency::Strong, Some(&b), &[a.id(), b.id()]).await;

    for peer in [&a, &b, &c] {
        let reply: OverlayReply = peer.call(&Request::GetOverlay { start_node_id: None }).await;
        assert_eq!(reply.overlay.len(), 3);
        assert_eq!(reply.overlay[0].node_id, peer.id(), "walk starts at the asked peer");
        let mut ids: Vec<u64> = reply.overlay.iter().map(|s| s.node_id).collect();
        ids.sort_unstable();
        let mut expected = vec![a.id(), b.id(), c.id()];
        expected.sort_unstable();
        assert_eq!(ids, expected);
    }
}

// ── Round-trip property ──────────────────────────────────────────

#[tokio::test]
async fn values_accumulate_and_deletes_subtract() {
    let a = start_peer(2, Consistency::Strong, None, &[]).await;
    let b = start_peer(2, Consistency::Strong, Some(&a), &[a.id()]).await;

    for value in ["u1", "u2", "u3"] {
        let _: StatusReply = a
            .call(&Request::Put {
                key: "shared".into(),
                value: PutValue::One(value.into()),
                start_node_id: None,
                ttl: None,
            })
            .await;
    }
    let _: StatusReply = b
        .call(&Request::Delete {
            key: Some("shared".into()),
            value: Some("u2".into()),
            start_node_id: None,
            ttl: None,
        })
        .await;

    let reply: GetReply =
        b.call(&Request::Get { key: "shared".into(), start_node_id: None, ttl: None }).await;
    assert_eq!(reply.value, vec!["u1".to_string(), "u3".to_string()]);
}
