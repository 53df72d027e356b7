// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Black-box harness: spawns a real `upsd::run` instance in-process against
//! a temp-directory config tree, plus a fake driver endpoint that stands in
//! for a connected hardware driver on the Unix socket side.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpStream, UnixListener, UnixStream};
use tokio::task::JoinHandle;

/// Find a free TCP port by binding to :0 then releasing it.
pub fn free_port() -> anyhow::Result<u16> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?.port())
}

/// One `[name]` UPS section plus the statepath socket the fake driver for
/// it should bind before the daemon starts trying to connect.
pub struct UpsSpec {
    pub name: &'static str,
    pub desc: &'static str,
}

/// A running `upsd::run` task plus the temp directory backing its config,
/// kept alive for the harness's lifetime and aborted on drop.
pub struct Daemon {
    pub port: u16,
    pub statepath: PathBuf,
    task: JoinHandle<()>,
    _dir: tempfile::TempDir,
}

impl Drop for Daemon {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Write `upsd.conf`/`ups.conf`/`upsd.users` into a fresh temp directory and
/// spawn `upsd::run` against them. `users` is a list of `(name, password,
/// actions_line)` triples written verbatim under `upsd.users`.
pub async fn spawn_daemon(upses: &[UpsSpec], users: &[(&str, &str, &str)]) -> anyhow::Result<Daemon> {
    spawn_daemon_with_maxage(upses, users, 15).await
}

pub async fn spawn_daemon_with_maxage(
    upses: &[UpsSpec],
    users: &[(&str, &str, &str)],
    maxage_secs: u64,
) -> anyhow::Result<Daemon> {
    let dir = tempfile::tempdir()?;
    let statepath = dir.path().join("state");
    std::fs::create_dir_all(&statepath)?;
    let port = free_port()?;

    let upsd_conf = format!("LISTEN 127.0.0.1 {port}\nSTATEPATH {}\nMAXAGE {maxage_secs}\n", statepath.display());
    std::fs::write(dir.path().join("upsd.conf"), upsd_conf)?;

    let mut ups_conf = String::new();
    for ups in upses {
        ups_conf.push_str(&format!("[{}]\n    driver = dummy\n    port = auto\n    desc = \"{}\"\n", ups.name, ups.desc));
    }
    std::fs::write(dir.path().join("ups.conf"), ups_conf)?;

    let mut users_conf = String::new();
    for (name, password, actions) in users {
        users_conf.push_str(&format!("[{name}]\n    password = {password}\n    {actions}\n"));
    }
    std::fs::write(dir.path().join("upsd.users"), users_conf)?;

    let config = upsd::DaemonConfig {
        upsd_conf_path: dir.path().join("upsd.conf"),
        ups_conf_path: dir.path().join("ups.conf"),
        users_conf_path: dir.path().join("upsd.users"),
        tracking_ttl: Duration::from_secs(600),
        pidfile_dir: dir.path().join("run"),
        address_family: upsd::AddressFamily::Any,
    };

    let task = tokio::spawn(async move {
        let _ = upsd::run(config).await;
    });

    // The daemon binds its listener early in `run`; give the task a moment
    // to get there before the first client connect attempt.
    tokio::time::sleep(Duration::from_millis(50)).await;

    Ok(Daemon { port, statepath, task, _dir: dir })
}

impl Daemon {
    pub fn driver_socket_path(&self, name: &str) -> PathBuf {
        self.statepath.join(name)
    }

    /// Connect a plain TCP client to the daemon's listener.
    pub async fn connect(&self) -> anyhow::Result<LineStream<TcpStream>> {
        let stream = TcpStream::connect(("127.0.0.1", self.port)).await?;
        Ok(LineStream::new(stream))
    }
}

/// A fake driver endpoint: binds the Unix socket `upsd`'s connector will
/// dial, and accepts exactly one connection from it.
pub struct FakeDriver {
    listener: UnixListener,
}

impl FakeDriver {
    /// Bind the socket `upsd` will connect out to for UPS `name`. Must be
    /// called before [`spawn_daemon`]'s connector task reaches this UPS, or
    /// the connector will simply retry with backoff until this exists —
    /// either ordering works.
    pub fn bind(socket_path: &Path) -> anyhow::Result<Self> {
        if socket_path.exists() {
            std::fs::remove_file(socket_path)?;
        }
        Ok(Self { listener: UnixListener::bind(socket_path)? })
    }

    pub async fn accept(&self) -> anyhow::Result<LineStream<UnixStream>> {
        let (stream, _) = self.listener.accept().await?;
        Ok(LineStream::new(stream))
    }
}

/// A line-oriented read/write wrapper over any duplex stream. Lines are
/// exchanged raw (no quoting/escaping support); the scenarios this harness
/// drives never need embedded whitespace in a token it has to parse back
/// out, only to assert against verbatim.
pub struct LineStream<S> {
    reader: BufReader<tokio::io::ReadHalf<S>>,
    writer: tokio::io::WriteHalf<S>,
}

impl<S: tokio::io::AsyncRead + tokio::io::AsyncWrite> LineStream<S> {
    fn new(stream: S) -> Self {
        let (r, w) = tokio::io::split(stream);
        Self { reader: BufReader::new(r), writer: w }
    }

    pub async fn send(&mut self, line: &str) -> anyhow::Result<()> {
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Read one line, stripping the trailing `\n`/`\r\n`. Returns `None` on EOF.
    pub async fn recv(&mut self) -> anyhow::Result<Option<String>> {
        let mut line = String::new();
        let n = self.reader.read_line(&mut line).await?;
        if n == 0 {
            return Ok(None);
        }
        while line.ends_with('\n') || line.ends_with('\r') {
            line.pop();
        }
        Ok(Some(line))
    }

    /// Read lines until one satisfying `pred` arrives, or `timeout` elapses.
    pub async fn recv_until(&mut self, timeout: Duration, mut pred: impl FnMut(&str) -> bool) -> anyhow::Result<String> {
        tokio::time::timeout(timeout, async {
            loop {
                match self.recv().await? {
                    Some(line) if pred(&line) => return Ok(line),
                    Some(_) => continue,
                    None => anyhow::bail!("stream closed before matching line arrived"),
                }
            }
        })
        .await?
    }
}

/// Drive a fake driver through `LOGIN` + a `DUMPALL` reply (one read-only
/// variable, one command, plus any `extra` `SETINFO`/`SETFLAGS`/`ADDRANGE`
/// lines the caller needs) so the daemon marks the UPS connected and
/// non-stale, matching what `upsdrv-liebertgxt2` would send for real.
pub async fn drive_dumpall(driver: &mut LineStream<UnixStream>, name: &str, extra: &[&str]) -> anyhow::Result<()> {
    let login = driver.recv_until(Duration::from_secs(5), |l| l.starts_with("LOGIN")).await?;
    anyhow::ensure!(login == format!("LOGIN {name}"), "unexpected login line: {login}");
    driver.recv_until(Duration::from_secs(5), |l| l == "DUMPALL").await?;

    driver.send("SETINFO battery.charge 87").await?;
    driver.send("SETFLAGS battery.charge RW").await?;
    driver.send("ADDCMD test.battery.start").await?;
    for line in extra {
        driver.send(line).await?;
    }
    driver.send("DUMPDONE").await?;
    Ok(())
}

pub async fn drive_minimal_dumpall(driver: &mut LineStream<UnixStream>, name: &str) -> anyhow::Result<()> {
    drive_dumpall(driver, name, &[]).await
}
