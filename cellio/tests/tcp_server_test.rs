//! TcpServer accept loops in both modes.

mod common;

use std::io::{Read, Write};
use std::net::TcpStream;

use cellio::{Error, TcpServer, TcpSocket};
use common::{PAYLOAD, runtime, within_io_actor};

#[test]
fn accepts_outside_an_actor() {
    let mut server = TcpServer::bind("127.0.0.1:0").unwrap();
    let addr = server.local_addr().unwrap();

    let mut client = TcpStream::connect(addr).unwrap();
    let (mut accepted, peer) = cellio::block_on(server.accept()).unwrap();
    assert_eq!(peer, client.local_addr().unwrap());

    client.write_all(PAYLOAD).unwrap();
    let data = cellio::block_on(accepted.read(Some(PAYLOAD.len()))).unwrap().unwrap();
    assert_eq!(&data[..], PAYLOAD);
}

#[test]
fn echo_server_inside_an_actor() {
    let runtime = runtime();
    let server_actor = runtime.spawn_actor("echo").unwrap();

    let mut server = TcpServer::bind("127.0.0.1:0").unwrap();
    let addr = server.local_addr().unwrap();

    server_actor
        .cast(move || async move {
            while let Ok((mut socket, _)) = server.accept().await {
                cellio::spawn(async move {
                    while let Ok(data) = socket.read_partial(1024).await {
                        if socket.write_all(&data).await.is_err() {
                            break;
                        }
                    }
                })
                .ok();
            }
        })
        .unwrap();

    // Two clients served concurrently by the same actor thread
    let mut first = TcpStream::connect(addr).unwrap();
    let mut second = TcpStream::connect(addr).unwrap();
    second.write_all(b"second").unwrap();
    first.write_all(b"first").unwrap();

    let mut buf = [0u8; 6];
    second.read_exact(&mut buf).unwrap();
    assert_eq!(&buf, b"second");
    let mut buf = [0u8; 5];
    first.read_exact(&mut buf).unwrap();
    assert_eq!(&buf, b"first");

    server_actor.terminate().unwrap();
    assert!(!server_actor.is_alive());
}

#[test]
fn client_and_server_in_one_actor() {
    let echoed = within_io_actor(|| async {
        let mut server = TcpServer::bind("127.0.0.1:0")?;
        let addr = server.local_addr()?;

        cellio::spawn(async move {
            if let Ok((mut socket, _)) = server.accept().await {
                if let Ok(line) = socket.read_line().await {
                    let _ = socket.write_all(&line.unwrap_or_default()).await;
                }
            }
        })?;

        let mut client = TcpSocket::connect(addr).await?;
        client.write_all(b"ping\n").await?;
        client.read_line().await
    })
    .unwrap()
    .unwrap()
    .unwrap();

    assert_eq!(&echoed[..], b"ping\n");
}

#[test]
fn closed_server_rejects_accept() {
    let mut server = TcpServer::bind("127.0.0.1:0").unwrap();
    server.close();
    assert!(server.is_closed());
    assert!(matches!(server.local_addr(), Err(Error::Closed)));
    assert!(matches!(cellio::block_on(server.accept()), Err(Error::Closed)));
}

#[test]
fn from_std_listener() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let mut server = TcpServer::from_std(listener).unwrap();
    assert_eq!(server.local_addr().unwrap(), addr);

    let _client = TcpStream::connect(addr).unwrap();
    let (accepted, _) = cellio::block_on(server.accept()).unwrap();
    assert_eq!(accepted.local_addr().unwrap(), addr);
}
