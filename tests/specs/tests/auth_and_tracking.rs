// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Authenticated reads, staleness, and the `SET VAR` tracking round trip.

use std::time::Duration;

use upsd_specs::{drive_dumpall, spawn_daemon, spawn_daemon_with_maxage, FakeDriver, UpsSpec};

async fn authenticate(client: &mut upsd_specs::LineStream<tokio::net::TcpStream>) {
    client.send("USERNAME u").await.unwrap();
    assert_eq!(client.recv().await.unwrap(), Some("OK".to_owned()));
    client.send("PASSWORD p").await.unwrap();
    assert_eq!(client.recv().await.unwrap(), Some("OK".to_owned()));
}

#[tokio::test]
async fn auth_then_read_returns_the_driver_supplied_value() {
    let daemon = spawn_daemon(&[UpsSpec { name: "dev0", desc: "test" }], &[]).await.unwrap();
    let driver_socket = daemon.driver_socket_path("dev0");
    let fake = FakeDriver::bind(&driver_socket).unwrap();
    let mut driver = fake.accept().await.unwrap();
    drive_dumpall(&mut driver, "dev0", &[]).await.unwrap();

    let mut client = daemon.connect().await.unwrap();
    authenticate(&mut client).await;

    client.send("GET VAR dev0 battery.charge").await.unwrap();
    assert_eq!(client.recv().await.unwrap(), Some("VAR dev0 battery.charge \"87\"".to_owned()));
}

#[tokio::test]
async fn set_var_for_unknown_variable_is_rejected() {
    let daemon = spawn_daemon(&[UpsSpec { name: "dev0", desc: "test" }], &[("operator", "secret", "actions = SET")])
        .await
        .unwrap();
    let driver_socket = daemon.driver_socket_path("dev0");
    let fake = FakeDriver::bind(&driver_socket).unwrap();
    let mut driver = fake.accept().await.unwrap();
    drive_dumpall(&mut driver, "dev0", &[]).await.unwrap();

    let mut client = daemon.connect().await.unwrap();
    client.send("USERNAME operator").await.unwrap();
    assert_eq!(client.recv().await.unwrap(), Some("OK".to_owned()));
    client.send("PASSWORD secret").await.unwrap();
    assert_eq!(client.recv().await.unwrap(), Some("OK".to_owned()));

    client.send("SET VAR dev0 no.such.var 1").await.unwrap();
    assert_eq!(client.recv().await.unwrap(), Some("ERR UNKNOWN-VAR".to_owned()));
}

#[tokio::test]
async fn set_var_outside_its_declared_range_is_rejected() {
    let daemon = spawn_daemon(&[UpsSpec { name: "dev0", desc: "test" }], &[("operator", "secret", "actions = SET")])
        .await
        .unwrap();
    let driver_socket = daemon.driver_socket_path("dev0");
    let fake = FakeDriver::bind(&driver_socket).unwrap();
    let mut driver = fake.accept().await.unwrap();
    drive_dumpall(
        &mut driver,
        "dev0",
        &["SETINFO ups.delay.shutdown 30", "SETFLAGS ups.delay.shutdown RW", "ADDRANGE ups.delay.shutdown 0 300"],
    )
    .await
    .unwrap();

    let mut client = daemon.connect().await.unwrap();
    client.send("USERNAME operator").await.unwrap();
    assert_eq!(client.recv().await.unwrap(), Some("OK".to_owned()));
    client.send("PASSWORD secret").await.unwrap();
    assert_eq!(client.recv().await.unwrap(), Some("OK".to_owned()));

    client.send("SET VAR dev0 ups.delay.shutdown 9001").await.unwrap();
    assert_eq!(client.recv().await.unwrap(), Some("ERR INVALID-VALUE".to_owned()));
}

#[tokio::test]
async fn driver_silence_past_maxage_marks_data_stale_but_keeps_the_ups_listed() {
    let daemon = spawn_daemon_with_maxage(&[UpsSpec { name: "dev0", desc: "test" }], &[], 1).await.unwrap();
    let driver_socket = daemon.driver_socket_path("dev0");
    let fake = FakeDriver::bind(&driver_socket).unwrap();
    let mut driver = fake.accept().await.unwrap();
    drive_dumpall(&mut driver, "dev0", &[]).await.unwrap();

    let mut client = daemon.connect().await.unwrap();
    authenticate(&mut client).await;

    client.send("GET VAR dev0 battery.charge").await.unwrap();
    assert_eq!(client.recv().await.unwrap(), Some("VAR dev0 battery.charge \"87\"".to_owned()));

    // The maintenance tick runs every 2s; give it two passes past maxage.
    tokio::time::sleep(Duration::from_secs(4)).await;

    client.send("GET VAR dev0 battery.charge").await.unwrap();
    assert_eq!(client.recv().await.unwrap(), Some("ERR DATA-STALE".to_owned()));

    client.send("LIST UPS").await.unwrap();
    assert_eq!(client.recv().await.unwrap(), Some("BEGIN LIST UPS".to_owned()));
    assert_eq!(client.recv().await.unwrap(), Some("UPS dev0 \"test\"".to_owned()));
    assert_eq!(client.recv().await.unwrap(), Some("END LIST UPS".to_owned()));
    let _ = &driver;
}

#[tokio::test]
async fn set_var_issues_a_tracking_id_the_driver_can_resolve() {
    let daemon = spawn_daemon(&[UpsSpec { name: "dev0", desc: "test" }], &[("operator", "secret", "actions = SET")])
        .await
        .unwrap();
    let driver_socket = daemon.driver_socket_path("dev0");
    let fake = FakeDriver::bind(&driver_socket).unwrap();
    let mut driver = fake.accept().await.unwrap();
    drive_dumpall(
        &mut driver,
        "dev0",
        &["SETINFO ups.delay.shutdown 20", "SETFLAGS ups.delay.shutdown RW", "ADDRANGE ups.delay.shutdown 0 300"],
    )
    .await
    .unwrap();

    let mut client = daemon.connect().await.unwrap();
    client.send("USERNAME operator").await.unwrap();
    assert_eq!(client.recv().await.unwrap(), Some("OK".to_owned()));
    client.send("PASSWORD secret").await.unwrap();
    assert_eq!(client.recv().await.unwrap(), Some("OK".to_owned()));

    client.send("SET VAR dev0 ups.delay.shutdown 30").await.unwrap();
    let ok_line = client.recv().await.unwrap().unwrap();
    assert_eq!(ok_line, "OK TRACKING 1");
    let id = ok_line.rsplit(' ').next().unwrap();

    // The daemon must relay the reserved id alongside the SET so the driver
    // can echo it back.
    let relayed = driver.recv_until(Duration::from_secs(5), |l| l.starts_with("SET ")).await.unwrap();
    assert_eq!(relayed, format!("SET ups.delay.shutdown 30 {id}"));

    driver.send(&format!("TRACKING {id} SUCCESS")).await.unwrap();
    driver.send("SETINFO ups.delay.shutdown 30").await.unwrap();

    client.send(&format!("GET TRACKING {id}")).await.unwrap();
    let tracking = client.recv_until(Duration::from_secs(3), |l| l == "SUCCESS" || l == "PENDING").await.unwrap();
    assert_eq!(tracking, "SUCCESS");

    client.send("GET VAR dev0 ups.delay.shutdown").await.unwrap();
    let var_line = client.recv_until(Duration::from_secs(3), |l| l.starts_with("VAR ")).await.unwrap();
    assert_eq!(var_line, "VAR dev0 ups.delay.shutdown \"30\"");
}
