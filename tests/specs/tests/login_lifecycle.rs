// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `LOGIN`/disconnect and the `numlogins` counter they maintain.

use std::time::Duration;

use upsd_specs::{spawn_daemon, UpsSpec};

async fn authenticated(daemon: &upsd_specs::Daemon) -> upsd_specs::LineStream<tokio::net::TcpStream> {
    let mut client = daemon.connect().await.unwrap();
    client.send("USERNAME u").await.unwrap();
    assert_eq!(client.recv().await.unwrap(), Some("OK".to_owned()));
    client.send("PASSWORD p").await.unwrap();
    assert_eq!(client.recv().await.unwrap(), Some("OK".to_owned()));
    client
}

#[tokio::test]
async fn numlogins_tracks_connected_sessions_bound_via_login() {
    let daemon = spawn_daemon(&[UpsSpec { name: "dev0", desc: "test" }], &[]).await.unwrap();

    let mut client1 = authenticated(&daemon).await;
    client1.send("LOGIN dev0").await.unwrap();
    assert_eq!(client1.recv().await.unwrap(), Some("OK".to_owned()));

    let mut client2 = authenticated(&daemon).await;
    client2.send("LOGIN dev0").await.unwrap();
    assert_eq!(client2.recv().await.unwrap(), Some("OK".to_owned()));

    let mut observer = authenticated(&daemon).await;
    observer.send("GET NUMLOGINS dev0").await.unwrap();
    assert_eq!(observer.recv().await.unwrap(), Some("NUMLOGINS dev0 2".to_owned()));

    drop(client1);

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        observer.send("GET NUMLOGINS dev0").await.unwrap();
        let line = observer.recv().await.unwrap().unwrap();
        if line == "NUMLOGINS dev0 1" {
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "numlogins never dropped to 1, last saw {line}");
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    let _ = &client2;
}

#[tokio::test]
async fn a_second_login_on_the_same_session_is_rejected() {
    let daemon = spawn_daemon(&[UpsSpec { name: "dev0", desc: "test" }], &[]).await.unwrap();
    let mut client = authenticated(&daemon).await;

    client.send("LOGIN dev0").await.unwrap();
    assert_eq!(client.recv().await.unwrap(), Some("OK".to_owned()));

    client.send("LOGIN dev0").await.unwrap();
    assert_eq!(client.recv().await.unwrap(), Some("ERR ALREADY-LOGGED-IN".to_owned()));
}
