//! Scenario 5 (§8): binding draws from the configured port range and does
//! not hand out the same port twice to live sockets. Exhausting the full
//! 10001..=20000 range to hit the 100-attempt retry ceiling isn't practical
//! in a fast test; `socket::tests::bind_yields_port_in_range` covers the
//! single-bind path, this covers that concurrent binds stay distinct.

use std::collections::HashSet;

use colugo::socket::TransportSocket;
use colugo::SocketKind;

#[test]
fn concurrent_binds_land_on_distinct_ports_in_range() {
    let mut ports = HashSet::new();
    let mut sockets = Vec::new();
    for _ in 0..25 {
        let socket = TransportSocket::new(SocketKind::Pub).expect("construct");
        let (_ip, port) = socket.bind().expect("bind");
        assert!((10001..=20000).contains(&port));
        assert!(ports.insert(port), "port {port} handed out twice");
        sockets.push(socket);
    }
}
