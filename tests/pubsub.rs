//! Scenario 1 (§8): a publisher and a subscriber on the same topic, wired
//! without going through a real mDNS multicast round trip. `Node` still
//! performs its real wiring pass — since both endpoints live on the same
//! node, the subscriber connects to the publisher's bound address as soon
//! as it registers, exercising the same code path discovery would drive
//! for two separate nodes.

use std::sync::mpsc as std_mpsc;
use std::thread;
use std::time::Duration;

use colugo::Node;

#[test]
fn publisher_reaches_subscriber_on_same_topic() {
    let node = std::sync::Arc::new(Node::new("pubsub-test").expect("node"));

    let publisher = node.add_publisher("chat").expect("add_publisher");

    let (tx, rx) = std_mpsc::channel();
    let _subscriber = node
        .add_subscriber(
            "chat",
            move |payload| {
                let _ = tx.send(payload);
            },
            None,
        )
        .expect("add_subscriber");

    let loop_node = node.clone();
    let loop_thread = thread::spawn(move || loop_node.start().expect("start"));

    // Give the PUB/SUB handshake time to complete before publishing;
    // messages sent before the subscriber's connection lands are dropped.
    thread::sleep(Duration::from_millis(200));
    publisher.send("hello").expect("send");

    let received = rx
        .recv_timeout(Duration::from_secs(2))
        .expect("subscriber never received the message");
    assert_eq!(received, b"hello");

    node.stop();
    loop_thread.join().expect("loop thread panicked");
}

#[test]
fn duplicate_local_publisher_on_same_topic_is_rejected() {
    let node = Node::new("duplicate-test").expect("node");
    node.add_publisher("chat").expect("first publisher");
    let err = node.add_publisher("chat").expect_err("second publisher should be rejected");
    assert!(matches!(err, colugo::NodeError::DuplicateLocalEndpoint { .. }));
}
