// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A driver reconnect that completes a fresh `DUMPALL` must kick every
//! client bound to that UPS.

use std::time::Duration;

use upsd_specs::{drive_dumpall, spawn_daemon, FakeDriver, UpsSpec};

#[tokio::test]
async fn driver_restart_disconnects_bound_clients_and_zeroes_numlogins() {
    let daemon = spawn_daemon(&[UpsSpec { name: "dev0", desc: "test" }], &[]).await.unwrap();
    let driver_socket = daemon.driver_socket_path("dev0");
    let fake = FakeDriver::bind(&driver_socket).unwrap();

    let mut driver = fake.accept().await.unwrap();
    drive_dumpall(&mut driver, "dev0", &[]).await.unwrap();

    let mut client = daemon.connect().await.unwrap();
    client.send("USERNAME u").await.unwrap();
    assert_eq!(client.recv().await.unwrap(), Some("OK".to_owned()));
    client.send("PASSWORD p").await.unwrap();
    assert_eq!(client.recv().await.unwrap(), Some("OK".to_owned()));
    client.send("LOGIN dev0").await.unwrap();
    assert_eq!(client.recv().await.unwrap(), Some("OK".to_owned()));

    // Drop the first driver connection; the connector reconnects with
    // backoff starting at 100ms once a new listener socket accepts it.
    drop(driver);

    let mut driver2 = fake.accept().await.unwrap();
    drive_dumpall(&mut driver2, "dev0", &[]).await.unwrap();

    let closed = tokio::time::timeout(Duration::from_secs(5), client.recv()).await.unwrap().unwrap();
    assert_eq!(closed, None, "kicked client's socket should have been closed by the daemon");

    let mut client2 = daemon.connect().await.unwrap();
    client2.send("USERNAME u").await.unwrap();
    assert_eq!(client2.recv().await.unwrap(), Some("OK".to_owned()));
    client2.send("PASSWORD p").await.unwrap();
    assert_eq!(client2.recv().await.unwrap(), Some("OK".to_owned()));
    client2.send("GET NUMLOGINS dev0").await.unwrap();
    assert_eq!(client2.recv().await.unwrap(), Some("NUMLOGINS dev0 0".to_owned()));
}
