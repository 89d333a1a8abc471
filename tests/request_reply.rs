//! Scenarios 2 and 3 (§8): request/reply echo, and a request that times out
//! because no reply ever arrives.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc as std_mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use colugo::Node;

#[test]
fn request_is_echoed_back_through_reply_server() {
    let node = Arc::new(Node::new("echo-test").expect("node"));

    node.add_reply_server("echo", |payload, reply| {
        reply.reply(payload).expect("reply send");
    })
    .expect("add_reply_server");

    let client = node.add_request_client("echo", None).expect("add_request_client");

    let loop_node = node.clone();
    let loop_thread = thread::spawn(move || loop_node.start().expect("start"));

    // The REQ socket wires to the REP's bound address synchronously at
    // registration time; give the loop a moment to start polling before
    // sending.
    thread::sleep(Duration::from_millis(200));

    let (tx, rx) = std_mpsc::channel();
    client
        .send(
            "ping",
            move |payload| {
                let _ = tx.send(payload);
            },
            2_000,
            None::<fn()>,
        )
        .expect("send");

    let reply = rx.recv_timeout(Duration::from_secs(2)).expect("no reply received");
    assert_eq!(reply, b"ping");

    node.stop();
    loop_thread.join().expect("loop thread panicked");
}

#[test]
fn request_without_a_server_times_out_and_recycles() {
    let node = Arc::new(Node::new("timeout-test").expect("node"));

    // No reply server is ever registered on this topic, so the REQ socket
    // has no peer; the reply never arrives and the timeout branch fires.
    let client = node.add_request_client("void", None).expect("add_request_client");

    let loop_node = node.clone();
    let loop_thread = thread::spawn(move || loop_node.start().expect("start"));
    thread::sleep(Duration::from_millis(100));

    let timed_out = Arc::new(AtomicBool::new(false));
    let timed_out_flag = timed_out.clone();
    client
        .send(
            "ping",
            |_payload| panic!("no server was ever wired; a reply should be impossible"),
            200,
            Some(move || timed_out_flag.store(true, Ordering::SeqCst)),
        )
        .expect("send");

    thread::sleep(Duration::from_millis(600));
    assert!(timed_out.load(Ordering::SeqCst), "request did not time out");

    node.stop();
    loop_thread.join().expect("loop thread panicked");
}
