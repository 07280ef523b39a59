//! UDP announce/respond protocol tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use lanpeer_core::PeerId;
use lanpeer_store::DiscoveredPeerStore;
use tokio::net::UdpSocket;

use crate::*;

async fn harness_socket() -> UdpSocket {
    UdpSocket::bind("127.0.0.1:0")
        .await
        .expect("failed to bind harness socket")
}

#[tokio::test]
async fn reply_iff_new_or_broadcast() {
    let port = free_udp_port();
    let store = DiscoveredPeerStore::new(loopback_identity(0), port);
    store.start().await.unwrap();

    let harness = harness_socket().await;
    let peer_b = PeerId::generate();

    // new + broadcast → reply
    send_announce(&harness, port, &peer_b, "node-b", 7001, true).await;
    let reply = recv_announce(&harness).await.expect("new+broadcast must be answered");
    assert_eq!(reply.method, "SELF");
    assert!(!reply.is_broadcast, "replies are unicast");

    // known + unicast → silence
    send_announce(&harness, port, &peer_b, "node-b", 7001, false).await;
    assert!(
        recv_announce(&harness).await.is_none(),
        "known+unicast must be suppressed"
    );

    // known + broadcast → reply
    send_announce(&harness, port, &peer_b, "node-b", 7001, true).await;
    assert!(
        recv_announce(&harness).await.is_some(),
        "known+broadcast must be answered"
    );

    // new + unicast → reply
    let peer_c = PeerId::generate();
    send_announce(&harness, port, &peer_c, "node-c", 7002, false).await;
    assert!(
        recv_announce(&harness).await.is_some(),
        "new+unicast must be answered"
    );

    store.stop();
}

#[tokio::test]
async fn source_address_is_authoritative() -> anyhow::Result<()> {
    let port = free_udp_port();
    let store = DiscoveredPeerStore::new(loopback_identity(0), port);
    store.start().await?;

    let harness = harness_socket().await;
    send_announce(&harness, port, &PeerId::generate(), "node-b", 7001, true).await;
    wait_for("peer discovery", || !store.get_discovered_peers().is_empty()).await?;

    let peers = store.get_discovered_peers();
    // the payload carried the decoy 10.99.99.99; the socket saw loopback
    assert_eq!(peers[0].ip, "127.0.0.1");
    assert_eq!(peers[0].name, "node-b");
    assert_eq!(peers[0].http_port, 7001);

    store.stop();
    Ok(())
}

#[tokio::test]
async fn duplicate_id_never_mutates_the_entry() -> anyhow::Result<()> {
    let port = free_udp_port();
    let store = DiscoveredPeerStore::new(loopback_identity(0), port);
    store.start().await?;

    let harness = harness_socket().await;
    let id = PeerId::generate();
    send_announce(&harness, port, &id, "original", 7001, true).await;
    wait_for("first announce", || !store.get_discovered_peers().is_empty()).await?;

    // same id, different fields — must be ignored for registry purposes
    send_announce(&harness, port, &id, "imposter", 9999, true).await;
    recv_announce(&harness).await; // drain first reply
    recv_announce(&harness).await; // drain broadcast-triggered reply

    let peers = store.get_discovered_peers();
    assert_eq!(peers.len(), 1);
    assert_eq!(peers[0].name, "original");
    assert_eq!(peers[0].http_port, 7001);

    store.stop();
    Ok(())
}

#[tokio::test]
async fn own_announce_is_discarded() {
    let port = free_udp_port();
    let identity = loopback_identity(0);
    let self_id = identity.id.clone();
    let store = DiscoveredPeerStore::new(identity, port);
    store.start().await.unwrap();

    let harness = harness_socket().await;
    send_announce(&harness, port, &self_id, "echo", 7001, true).await;
    assert!(
        recv_announce(&harness).await.is_none(),
        "self-echo must not be answered"
    );
    assert!(store.get_discovered_peers().is_empty());

    store.stop();
}

#[tokio::test]
async fn malformed_datagrams_do_not_stop_the_loop() -> anyhow::Result<()> {
    let port = free_udp_port();
    let store = DiscoveredPeerStore::new(loopback_identity(0), port);
    store.start().await?;

    let harness = harness_socket().await;
    harness
        .send_to(b"definitely not json", ("127.0.0.1", port))
        .await?;
    harness
        .send_to(
            br#"{"method":"HELLO","id":"x","name":"n","ip":"1.2.3.4","httpPort":1,"isBroadcast":true}"#,
            ("127.0.0.1", port),
        )
        .await?;

    // the loop must still be alive and processing
    send_announce(&harness, port, &PeerId::generate(), "node-b", 7001, true).await;
    wait_for("discovery after garbage", || {
        store.get_discovered_peers().len() == 1
    })
    .await?;

    store.stop();
    Ok(())
}

#[tokio::test]
async fn iteration_order_is_insertion_order() -> anyhow::Result<()> {
    let port = free_udp_port();
    let store = DiscoveredPeerStore::new(loopback_identity(0), port);
    store.start().await?;

    let harness = harness_socket().await;
    for name in ["one", "two", "three"] {
        send_announce(&harness, port, &PeerId::generate(), name, 7001, false).await;
        // serialize arrivals so insertion order is deterministic
        recv_announce(&harness).await;
    }
    wait_for("three peers", || store.get_discovered_peers().len() == 3).await?;

    let names: Vec<String> = store
        .get_discovered_peers()
        .into_iter()
        .map(|p| p.name)
        .collect();
    assert_eq!(names, vec!["one", "two", "three"]);

    store.stop();
    Ok(())
}

#[tokio::test]
async fn clear_empties_and_notifies_once_per_call() -> anyhow::Result<()> {
    let port = free_udp_port();
    let store = DiscoveredPeerStore::new(loopback_identity(0), port);
    store.start().await?;

    let snapshots = Arc::new(Mutex::new(Vec::new()));
    let s2 = snapshots.clone();
    let _sub = store.subscribe(move |snap| s2.lock().unwrap().push(snap.len()));

    let harness = harness_socket().await;
    send_announce(&harness, port, &PeerId::generate(), "node-b", 7001, true).await;
    wait_for("peer discovery", || !store.get_discovered_peers().is_empty()).await?;

    store.clear();
    store.clear();

    assert!(store.get_discovered_peers().is_empty());
    assert_eq!(*snapshots.lock().unwrap(), vec![1, 0, 0]);

    store.stop();
    Ok(())
}

#[tokio::test]
async fn unsubscribed_listener_goes_quiet() -> anyhow::Result<()> {
    let port = free_udp_port();
    let store = DiscoveredPeerStore::new(loopback_identity(0), port);
    store.start().await?;

    let kept = Arc::new(AtomicUsize::new(0));
    let dropped = Arc::new(AtomicUsize::new(0));

    let k2 = kept.clone();
    let _kept_sub = store.subscribe(move |_| {
        k2.fetch_add(1, Ordering::SeqCst);
    });
    let d2 = dropped.clone();
    let dropped_sub = store.subscribe(move |_| {
        d2.fetch_add(1, Ordering::SeqCst);
    });
    dropped_sub.unsubscribe();

    let harness = harness_socket().await;
    send_announce(&harness, port, &PeerId::generate(), "node-b", 7001, true).await;
    wait_for("notification", || kept.load(Ordering::SeqCst) == 1).await?;

    assert_eq!(dropped.load(Ordering::SeqCst), 0);

    store.stop();
    Ok(())
}

/// First-contact scenario: a "remote node" broadcasts, the store answers
/// with a unicast announce of its own identity, and each side ends up with
/// exactly the other in its discovered set.
#[tokio::test]
async fn bidirectional_first_contact() {
    let port = free_udp_port();
    let identity = loopback_identity(4100);
    let self_id = identity.id.clone();
    let store = DiscoveredPeerStore::new(identity, port);
    store.start().await.unwrap();

    // remote side, played by the harness
    let harness = harness_socket().await;
    let remote_id = PeerId::generate();
    send_announce(&harness, port, &remote_id, "remote", 7001, true).await;

    // the store answered with its own identity, unicast
    let reply = recv_announce(&harness).await.expect("broadcaster must get a reply");
    assert_eq!(reply.id, self_id);
    assert_eq!(reply.http_port, 4100);
    assert!(!reply.is_broadcast);

    // the remote's unicast reply would be new+unicast on its side; here we
    // just verify the store saw exactly one peer: the remote
    let peers = store.get_discovered_peers();
    assert_eq!(peers.len(), 1);
    assert_eq!(peers[0].id, remote_id);

    // and no second unsolicited reply follows
    assert!(recv_announce(&harness).await.is_none());

    store.stop();
}
