use std::net::IpAddr;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{RwLock, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::acl::HostAcl;
use crate::ups::{DesiredUps, UpsRegistry, VarType, VariableDescriptor};
use crate::users::{User, UserTable};

use super::*;

fn shared_state() -> Arc<SharedState> {
    Arc::new(SharedState {
        registry: UpsRegistry::new(CancellationToken::new()),
        users: RwLock::new(UserTable::new()),
        acl: RwLock::new(HostAcl::new()),
        maxage: Duration::from_secs(15),
        tracking_ttl: Duration::from_secs(600),
        idle_timeout: Duration::from_secs(60),
        tls: RwLock::new(None),
        shutdown: CancellationToken::new(),
        reload: CancellationToken::new(),
        next_session_id: AtomicU64::new(1),
        connections: Semaphore::new(16),
    })
}

fn session() -> ClientSession {
    ClientSession::new("127.0.0.1:9999".to_owned(), IpAddr::from([127, 0, 0, 1]))
}

async fn add_ups(state: &Arc<SharedState>, name: &str) -> Arc<crate::ups::UpsHandle> {
    let (handle, _cmd_rx) = add_ups_with_relay(state, name).await;
    handle
}

/// Like [`add_ups`] but also hands back the driver-command receiver, for
/// tests that need to observe what the dispatcher relays to the driver.
async fn add_ups_with_relay(
    state: &Arc<SharedState>,
    name: &str,
) -> (Arc<crate::ups::UpsHandle>, tokio::sync::mpsc::UnboundedReceiver<Vec<String>>) {
    let new_ups = state
        .registry
        .insert(DesiredUps { name: name.to_owned(), desc: "test unit".to_owned(), driver_socket_path: "/tmp/x".into() })
        .await;
    new_ups.handle.entry.write().await.connected = true;
    new_ups.handle.entry.write().await.stale = false;
    (new_ups.handle, new_ups.cmd_rx)
}

fn tok(line: &str) -> Vec<String> {
    line.split_whitespace().map(str::to_owned).collect()
}

#[tokio::test]
async fn unauthenticated_list_requires_username_then_password_then_login() {
    let state = shared_state();
    add_ups(&state, "dev0").await;
    let mut s = session();

    let out = dispatch(&mut s, &state, &tok("LIST UPS")).await;
    assert_eq!(out.lines, vec!["ERR USERNAME-REQUIRED"]);

    assert!(s.set_username("operator".to_owned()));
    let out = dispatch(&mut s, &state, &tok("LIST UPS")).await;
    assert_eq!(out.lines, vec!["ERR PASSWORD-REQUIRED"]);

    assert!(s.set_password("wrong".to_owned()));
    // Wrong or absent credentials still satisfy "both fields set"; dispatch
    // only checks AuthState, not that the credentials are valid against the
    // user table — per-command handlers that need a real user look it up
    // themselves via `current_user`.
    let out = dispatch(&mut s, &state, &tok("LIST UPS")).await;
    assert_eq!(out.lines, vec!["BEGIN LIST UPS".to_owned(), "UPS dev0 \"test unit\"".to_owned(), "END LIST UPS".to_owned()]);
}

#[tokio::test]
async fn acl_denial_overrides_completed_authentication() {
    let state = shared_state();
    add_ups(&state, "dev0").await;
    state.acl.write().await.add_rule("all", false);

    let mut s = session();
    s.set_username("operator".to_owned());
    s.set_password("secret".to_owned());

    let out = dispatch(&mut s, &state, &tok("LIST UPS")).await;
    assert_eq!(out.lines, vec!["ERR ACCESS-DENIED"]);
}

#[tokio::test]
async fn unknown_command_is_rejected_before_any_auth_check() {
    let state = shared_state();
    let mut s = session();
    let out = dispatch(&mut s, &state, &tok("BOGUS foo bar")).await;
    assert_eq!(out.lines, vec!["ERR UNKNOWN-COMMAND"]);
}

#[tokio::test]
async fn list_var_formats_each_variable_as_a_row() {
    let state = shared_state();
    let handle = add_ups(&state, "dev0").await;
    handle.entry.write().await.variables.insert("battery.charge".to_owned(), {
        let mut v = VariableDescriptor::shell("battery.charge");
        v.value = "87".to_owned();
        v
    });

    let mut s = session();
    s.set_username("u".to_owned());
    s.set_password("p".to_owned());

    let out = dispatch(&mut s, &state, &tok("LIST VAR dev0")).await;
    assert_eq!(out.lines, vec![
        "BEGIN LIST VAR dev0".to_owned(),
        "VAR dev0 battery.charge \"87\"".to_owned(),
        "END LIST VAR dev0".to_owned(),
    ]);
}

#[tokio::test]
async fn login_logout_lifecycle_tracks_numlogins() {
    let state = shared_state();
    let handle = add_ups(&state, "dev0").await;

    let mut s = session();
    s.set_username("u".to_owned());
    s.set_password("p".to_owned());

    let out = dispatch(&mut s, &state, &tok("LOGIN dev0")).await;
    assert_eq!(out.lines, vec!["OK".to_owned()]);
    assert_eq!(handle.entry.read().await.numlogins, 1);

    let out = dispatch(&mut s, &state, &tok("LOGIN dev0")).await;
    assert_eq!(out.lines, vec!["ERR ALREADY-LOGGED-IN".to_owned()]);

    let out = dispatch(&mut s, &state, &tok("LOGOUT")).await;
    assert_eq!(out.lines, vec!["OK Goodbye".to_owned()]);
    assert!(out.close);
    assert_eq!(handle.entry.read().await.numlogins, 0);
}

#[tokio::test]
async fn set_var_rejects_unwritable_variable_without_touching_the_driver() {
    let state = shared_state();
    let handle = add_ups(&state, "dev0").await;
    handle.entry.write().await.variables.insert("battery.charge".to_owned(), VariableDescriptor::shell("battery.charge"));

    let mut user = User::new("operator", "secret");
    user.can_set_variable = true;
    state.users.write().await.insert(user);

    let mut s = session();
    s.set_username("operator".to_owned());
    s.set_password("secret".to_owned());

    let out = dispatch(&mut s, &state, &tok("SET VAR dev0 battery.charge 50")).await;
    assert_eq!(out.lines, vec!["ERR INVALID-VALUE".to_owned()]);
    assert!(s.pending_tracking.is_empty());
}

#[tokio::test]
async fn set_var_issues_a_tracking_id_for_a_writable_range_variable() {
    let state = shared_state();
    let (handle, mut cmd_rx) = add_ups_with_relay(&state, "dev0").await;
    {
        let mut entry = handle.entry.write().await;
        let mut v = VariableDescriptor::shell("ups.delay.shutdown");
        v.apply_flags(["RW"].into_iter());
        v.var_type = VarType::Range;
        v.ranges.push(crate::ups::NumericRange { min: 0.0, max: 300.0 });
        entry.variables.insert("ups.delay.shutdown".to_owned(), v);
    }

    let mut user = User::new("operator", "secret");
    user.can_set_variable = true;
    state.users.write().await.insert(user);

    let mut s = session();
    s.set_username("operator".to_owned());
    s.set_password("secret".to_owned());

    let out = dispatch(&mut s, &state, &tok("SET VAR dev0 ups.delay.shutdown 30")).await;
    assert_eq!(out.lines, vec!["OK TRACKING 1".to_owned()]);
    assert_eq!(s.pending_tracking, vec![("dev0".to_owned(), 1)]);

    // The relayed command must carry the reserved id so the driver can echo
    // it back in its own `TRACKING <id> <status>` ingress line.
    let relayed = cmd_rx.try_recv().expect("a command should have been relayed");
    assert_eq!(relayed, vec!["SET", "ups.delay.shutdown", "30", "1"]);
    let _ = &handle;
}

#[tokio::test]
async fn get_tracking_reports_pending_then_resolved_status() {
    let state = shared_state();
    let handle = add_ups(&state, "dev0").await;
    let id = handle.entry.write().await.tracking.reserve();

    let mut s = session();
    s.set_username("u".to_owned());
    s.set_password("p".to_owned());

    let out = dispatch(&mut s, &state, &tok(&format!("GET TRACKING {id}"))).await;
    assert_eq!(out.lines, vec!["PENDING".to_owned()]);

    handle.entry.write().await.tracking.update(id, crate::ups::TrackingStatus::Success);
    let out = dispatch(&mut s, &state, &tok(&format!("GET TRACKING {id}"))).await;
    assert_eq!(out.lines, vec!["SUCCESS".to_owned()]);

    let out = dispatch(&mut s, &state, &tok("GET TRACKING not-a-number")).await;
    assert_eq!(out.lines, vec!["INVALID-ARGUMENT".to_owned()]);
}

#[tokio::test]
async fn poll_pending_tracking_emits_resolved_lines_and_drops_evicted_ids() {
    let state = shared_state();
    let handle = add_ups(&state, "dev0").await;
    let resolved_id = handle.entry.write().await.tracking.reserve();
    handle.entry.write().await.tracking.update(resolved_id, crate::ups::TrackingStatus::Failed);

    let mut s = session();
    s.pending_tracking.push(("dev0".to_owned(), resolved_id));
    s.pending_tracking.push(("dev0".to_owned(), 99999)); // never reserved, acts as "evicted"

    let lines = poll_pending_tracking(&mut s, &state).await;
    assert_eq!(lines, vec![format!("TRACKING {resolved_id} FAILED")]);
    assert!(s.pending_tracking.is_empty());
}

#[tokio::test]
async fn instcmd_requires_glob_permission_for_the_specific_command() {
    let state = shared_state();
    let (handle, mut cmd_rx) = add_ups_with_relay(&state, "dev0").await;
    handle.entry.write().await.commands.insert("test.battery.start".to_owned());

    let mut user = User::new("operator", "secret");
    user.instcmd_globs.push("test.*".to_owned());
    state.users.write().await.insert(user);

    let mut s = session();
    s.set_username("operator".to_owned());
    s.set_password("secret".to_owned());

    let out = dispatch(&mut s, &state, &tok("INSTCMD dev0 shutdown.return")).await;
    assert_eq!(out.lines, vec!["ERR ACCESS-DENIED".to_owned()]);

    let out = dispatch(&mut s, &state, &tok("INSTCMD dev0 test.battery.start")).await;
    assert_eq!(out.lines, vec!["OK TRACKING 1".to_owned()]);
    let relayed = cmd_rx.try_recv().expect("a command should have been relayed");
    assert_eq!(relayed, vec!["INSTCMD", "test.battery.start", "1"]);
}

#[tokio::test]
async fn version_and_help_never_require_authentication() {
    let state = shared_state();
    let mut s = session();
    let out = dispatch(&mut s, &state, &tok("NETVER")).await;
    assert_eq!(out.lines, vec![daemon::PROTOCOL_VERSION.to_owned()]);

    let out = dispatch(&mut s, &state, &tok("VER")).await;
    assert_eq!(out.lines, vec![format!("Network UPS Tools upsd {}", daemon::VERSION)]);
}
