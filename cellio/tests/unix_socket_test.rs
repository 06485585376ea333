//! UNIX domain sockets inside and outside of actors.

mod common;

use std::io::{Read, Write};
use std::os::unix::net::{UnixListener, UnixStream};

use cellio::{Error, UnixServer, UnixSocket};
use common::{PAYLOAD, within_io_actor};

#[test]
fn connects_and_reads_inside_an_actor() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cellio.sock");
    let listener = UnixListener::bind(&path).unwrap();

    let writer = std::thread::spawn(move || {
        let (mut peer, _) = listener.accept().unwrap();
        peer.write_all(PAYLOAD).unwrap();
        peer
    });

    let data = within_io_actor(move || async move {
        let mut socket = UnixSocket::connect(&path).await?;
        assert!(cellio::evented());
        socket.read(Some(PAYLOAD.len())).await
    })
    .unwrap()
    .unwrap()
    .unwrap();
    assert_eq!(&data[..], PAYLOAD);

    drop(writer.join().unwrap());
}

#[test]
fn server_accepts_outside_an_actor() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("server.sock");
    let mut server = UnixServer::bind(&path).unwrap();
    assert_eq!(server.path(), path);
    assert_eq!(server.local_addr().unwrap(), path);

    let mut client = UnixStream::connect(&path).unwrap();
    let mut accepted = cellio::block_on(server.accept()).unwrap();

    cellio::block_on(accepted.write_all(PAYLOAD)).unwrap();
    let mut buf = vec![0; PAYLOAD.len()];
    client.read_exact(&mut buf).unwrap();
    assert_eq!(buf, PAYLOAD);

    client.write_all(b"bye\n").unwrap();
    let line = cellio::block_on(accepted.read_line()).unwrap().unwrap();
    assert_eq!(&line[..], b"bye\n");
}

#[test]
fn server_and_client_in_one_actor() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("echo.sock");

    let echoed = within_io_actor(move || async move {
        let mut server = UnixServer::bind(&path)?;
        cellio::spawn(async move {
            if let Ok(mut socket) = server.accept().await {
                if let Ok(data) = socket.read_partial(64).await {
                    let _ = socket.write_all(&data).await;
                }
            }
        })?;

        UnixSocket::open(&path, |mut client| async move {
            client.write_all(PAYLOAD).await?;
            client.read(Some(PAYLOAD.len())).await
        })
        .await?
    })
    .unwrap()
    .unwrap()
    .unwrap();

    assert_eq!(&echoed[..], PAYLOAD);
}

#[test]
fn connecting_to_a_dead_socket_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dead.sock");
    // The socket file outlives its listener
    drop(UnixListener::bind(&path).unwrap());

    let result = cellio::block_on(UnixSocket::connect(&path));
    match result {
        Err(Error::ConnectionRefused { addr }) => assert_eq!(addr, path.display().to_string()),
        other => panic!("expected connection refused, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn binding_an_existing_path_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("taken.sock");
    let _server = UnixServer::bind(&path).unwrap();
    assert!(matches!(UnixServer::bind(&path), Err(Error::Io(_))));
}

#[test]
fn socket_pair_talks_both_ways() {
    let (mut left, mut right) = UnixSocket::pair().unwrap();

    let received = within_io_actor(move || async move {
        left.write_all(b"ping\n").await?;
        let ping = right.read_line().await?;
        right.write_all(b"pong\n").await?;
        let pong = left.read_line().await?;
        Ok::<_, Error>((ping, pong))
    })
    .unwrap()
    .unwrap();

    assert_eq!(received.0.as_deref(), Some(&b"ping\n"[..]));
    assert_eq!(received.1.as_deref(), Some(&b"pong\n"[..]));
}

#[test]
fn unnamed_peer_has_no_path() {
    let (left, _right) = UnixSocket::pair().unwrap();
    assert_eq!(left.peer_path().unwrap(), None);
}

#[test]
fn closed_server_rejects_accept() {
    let dir = tempfile::tempdir().unwrap();
    let mut server = UnixServer::bind(dir.path().join("closed.sock")).unwrap();
    server.close();
    server.close();
    assert!(server.is_closed());
    assert!(matches!(server.local_addr(), Err(Error::Closed)));
    assert!(matches!(cellio::block_on(server.accept()), Err(Error::Closed)));
}
