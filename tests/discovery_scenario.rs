//! Scenario 6 (§8): two independent nodes, wired by real mDNS discovery
//! rather than the same-node shortcut the other integration tests use.
//! Ignored by default — it needs a multicast-capable network interface,
//! which most sandboxes and CI containers don't provide.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc as std_mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use colugo::Node;

#[test]
#[ignore = "requires a real multicast-capable network interface"]
fn two_nodes_discover_each_other_and_exchange_a_request() {
    let server_node = Arc::new(Node::new("server-node").expect("node"));
    server_node
        .add_reply_server("coordination", |payload, reply| {
            reply.reply(payload).expect("reply send");
        })
        .expect("add_reply_server");

    let server_loop = server_node.clone();
    let server_thread = thread::spawn(move || server_loop.start().expect("start"));

    // Give the server node's mDNS announcement a moment to land before the
    // client node starts browsing, exercising the "server before client"
    // ordering half of scenario 6.
    thread::sleep(Duration::from_millis(500));

    let client_node = Arc::new(Node::new("client-node").expect("node"));
    let client = client_node
        .add_request_client("coordination", None)
        .expect("add_request_client");

    let client_loop = client_node.clone();
    let client_thread = thread::spawn(move || client_loop.start().expect("start"));

    // Wait for discovery to wire the REQ client to the REP server across
    // the network before sending.
    thread::sleep(Duration::from_secs(2));

    let replied = Arc::new(AtomicBool::new(false));
    let replied_flag = replied.clone();
    let (tx, rx) = std_mpsc::channel();
    client
        .send(
            "ping",
            move |payload| {
                replied_flag.store(true, Ordering::SeqCst);
                let _ = tx.send(payload);
            },
            5_000,
            None::<fn()>,
        )
        .expect("send");

    let reply = rx.recv_timeout(Duration::from_secs(5)).expect("no reply received");
    assert_eq!(reply, b"ping");
    assert!(replied.load(Ordering::SeqCst));

    client_node.stop();
    server_node.stop();
    client_thread.join().expect("client loop panicked");
    server_thread.join().expect("server loop panicked");
}
