// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Unauthenticated handshake commands and the authentication gate itself.

use std::time::Duration;

use upsd_specs::{spawn_daemon, UpsSpec};

#[tokio::test]
async fn help_and_version_never_require_authentication() {
    let daemon = spawn_daemon(&[UpsSpec { name: "dev0", desc: "test" }], &[]).await.unwrap();
    let mut client = daemon.connect().await.unwrap();

    client.send("HELP").await.unwrap();
    let help = client.recv_until(Duration::from_secs(2), |_| true).await.unwrap();
    assert!(help.starts_with("Commands:"));

    client.send("VER").await.unwrap();
    let ver = client.recv_until(Duration::from_secs(2), |_| true).await.unwrap();
    assert!(ver.starts_with("Network UPS Tools upsd "));
}

#[tokio::test]
async fn list_ups_reports_the_one_configured_unit_once_authenticated() {
    let daemon = spawn_daemon(&[UpsSpec { name: "dev0", desc: "test" }], &[]).await.unwrap();
    let mut client = daemon.connect().await.unwrap();

    client.send("USERNAME u").await.unwrap();
    assert_eq!(client.recv().await.unwrap(), Some("OK".to_owned()));
    client.send("PASSWORD p").await.unwrap();
    assert_eq!(client.recv().await.unwrap(), Some("OK".to_owned()));

    client.send("LIST UPS").await.unwrap();
    assert_eq!(client.recv().await.unwrap(), Some("BEGIN LIST UPS".to_owned()));
    assert_eq!(client.recv().await.unwrap(), Some("UPS dev0 \"test\"".to_owned()));
    assert_eq!(client.recv().await.unwrap(), Some("END LIST UPS".to_owned()));
}

#[tokio::test]
async fn unauthenticated_session_never_sees_ok_or_data_for_an_authenticated_verb() {
    let daemon = spawn_daemon(&[UpsSpec { name: "dev0", desc: "test" }], &[]).await.unwrap();
    let mut client = daemon.connect().await.unwrap();

    client.send("LIST UPS").await.unwrap();
    assert_eq!(client.recv().await.unwrap(), Some("ERR USERNAME-REQUIRED".to_owned()));

    client.send("USERNAME u").await.unwrap();
    assert_eq!(client.recv().await.unwrap(), Some("OK".to_owned()));

    client.send("LIST UPS").await.unwrap();
    assert_eq!(client.recv().await.unwrap(), Some("ERR PASSWORD-REQUIRED".to_owned()));
}

#[tokio::test]
async fn unknown_command_is_rejected_without_a_connection_drop() {
    let daemon = spawn_daemon(&[UpsSpec { name: "dev0", desc: "test" }], &[]).await.unwrap();
    let mut client = daemon.connect().await.unwrap();

    client.send("BOGUS").await.unwrap();
    assert_eq!(client.recv().await.unwrap(), Some("ERR UNKNOWN-COMMAND".to_owned()));

    // The session must still be alive after an unknown command.
    client.send("VER").await.unwrap();
    let ver = client.recv().await.unwrap().unwrap();
    assert!(ver.starts_with("Network UPS Tools upsd "));
}
