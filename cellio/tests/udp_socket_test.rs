//! UdpSocket datagrams inside and outside of actors.

mod common;

use std::time::Duration;

use cellio::{Error, UdpSocket};
use common::{PAYLOAD, within_io_actor};

#[test]
fn exchanges_datagrams_outside_an_actor() {
    let mut receiver = UdpSocket::bind("127.0.0.1:0").unwrap();
    let mut sender = UdpSocket::bind("127.0.0.1:0").unwrap();
    let target = receiver.local_addr().unwrap();

    let sent = cellio::block_on(sender.send_to(PAYLOAD, target)).unwrap();
    assert_eq!(sent, PAYLOAD.len());

    let (data, from) = cellio::block_on(receiver.recv_from(64)).unwrap();
    assert_eq!(&data[..], PAYLOAD);
    assert_eq!(from, sender.local_addr().unwrap());
}

#[test]
fn waits_for_a_datagram_inside_an_actor() {
    let receiver = UdpSocket::bind("127.0.0.1:0").unwrap();
    let target = receiver.local_addr().unwrap();

    let data = within_io_actor(move || async move {
        let mut receiver = receiver;
        cellio::spawn(async move {
            cellio::sleep(Duration::from_millis(20)).await;
            if let Ok(sender) = std::net::UdpSocket::bind("127.0.0.1:0") {
                let _ = sender.send_to(PAYLOAD, target);
            }
        })?;
        receiver.recv_from(64).await.map(|(data, _)| data)
    })
    .unwrap()
    .unwrap();

    assert_eq!(&data[..], PAYLOAD);
}

#[test]
fn truncates_to_the_requested_size() {
    let mut receiver = UdpSocket::bind("127.0.0.1:0").unwrap();
    let sender = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
    sender.send_to(PAYLOAD, receiver.local_addr().unwrap()).unwrap();

    let (data, _) = cellio::block_on(receiver.recv_from(2)).unwrap();
    assert_eq!(&data[..], &PAYLOAD[..2]);
}

#[test]
fn connected_sockets_use_send_and_recv() {
    let mut a = UdpSocket::bind("127.0.0.1:0").unwrap();
    let mut b = UdpSocket::bind("127.0.0.1:0").unwrap();
    a.connect(b.local_addr().unwrap()).unwrap();
    b.connect(a.local_addr().unwrap()).unwrap();

    cellio::block_on(a.send(PAYLOAD)).unwrap();
    let data = cellio::block_on(b.recv(64)).unwrap();
    assert_eq!(&data[..], PAYLOAD);
}

#[test]
fn blocking_recv_honours_timeout() {
    let mut socket = UdpSocket::bind("127.0.0.1:0").unwrap();
    let result = cellio::block_on(cellio::timeout(Duration::from_millis(50), socket.recv_from(64)));
    assert!(matches!(result, Err(Error::TaskTimeout(_))));
}

#[test]
fn closed_socket_rejects_io() {
    let mut socket = UdpSocket::bind("127.0.0.1:0").unwrap();
    socket.close();
    assert!(socket.is_closed());
    assert!(matches!(socket.local_addr(), Err(Error::Closed)));
    assert!(matches!(cellio::block_on(socket.recv(8)), Err(Error::Closed)));
}
