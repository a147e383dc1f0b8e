use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use relic_engine::{
    CommandError, Engine, EngineConfig, EngineEvent, LaunchError, LaunchOutcome, PauseError,
    ProcessRegistry, SessionState, Timings, UnavailableReason,
};

use tempfile::{NamedTempFile, TempDir};
use test_log::test;

/// Registry reporting a new process on its second enumeration.
#[derive(Default)]
struct AppearingRegistry {
    calls: AtomicUsize,
    pid: Option<u32>,
}

impl ProcessRegistry for AppearingRegistry {
    fn pids_by_name(&self, _executable_name: &str) -> HashSet<u32> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);

        match (call, self.pid) {
            (0, _) | (_, None) => HashSet::from([1]),
            (_, Some(pid)) => HashSet::from([1, pid]),
        }
    }
}

fn config(script: &str) -> EngineConfig {
    EngineConfig {
        host: Some(PathBuf::from("/bin/sh")),
        host_args: vec!["-c".to_owned(), script.to_owned()],
        indirection: vec![],
        debugger_candidates: vec![PathBuf::from("/nonexistent/relic-gdb")],
        interrupt_helper: None,
        timings: Timings {
            settle_delay: Duration::from_millis(200),
            probe_timeout: Duration::from_secs(1),
            ..Timings::default()
        },
        ..EngineConfig::default()
    }
}

fn engine(script: &str, pid: Option<u32>) -> Engine {
    Engine::with_registry(
        config(script),
        Arc::new(AppearingRegistry {
            pid,
            ..AppearingRegistry::default()
        }),
    )
}

/// Writes a debugger script answering `--version`, then every command with
/// `^done` except the attach and continue commands.
fn fake_debugger(dir: &Path, on_attach: &str, on_continue: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("fake-gdb");
    let script = format!(
        r##"#!/bin/sh
if [ "$1" = "--version" ]; then
    echo 'GNU gdb (Fake) 14.2'
    exit 0
fi
while IFS= read -r line; do
    token=${{line%%[!0-9]*}}
    command=${{line#"$token"}}
    case "$command" in
        -target-attach*) {on_attach} ;;
        -exec-continue*) {on_continue} ;;
        *) echo "${{token}}^done" ;;
    esac
done
"##
    );

    std::fs::write(&path, script).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();

    path
}

const ATTACH_OK: &str =
    r#"echo '*stopped,reason="signal-received",signal-name="SIGSTOP",thread-id="1"'; echo "${token}^done""#;

const CONTINUE_OK: &str = r#"echo "${token}^running"; echo '*running,thread-id="all"'"#;

fn debugging_engine(debugger: PathBuf) -> Engine {
    Engine::with_registry(
        EngineConfig {
            debugger_candidates: vec![debugger],
            ..config("sleep 5")
        },
        Arc::new(AppearingRegistry {
            pid: Some(4242),
            ..AppearingRegistry::default()
        }),
    )
}

async fn wait_stopped(engine: &Engine) {
    tokio::time::timeout(Duration::from_secs(10), async {
        while engine.state() != SessionState::Stopped {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .unwrap();
}

#[test(tokio::test)]
async fn launch_rejects_bad_configuration() {
    let target = NamedTempFile::new().unwrap();

    let engine = Engine::new(EngineConfig {
        host: None,
        ..EngineConfig::default()
    });
    let mut events = engine.subscribe();

    assert!(matches!(
        engine.launch(target.path()).await,
        Err(LaunchError::HostNotConfigured)
    ));

    let engine = Engine::new(EngineConfig {
        host: Some(PathBuf::from("/nonexistent/emu")),
        ..EngineConfig::default()
    });

    assert!(matches!(
        engine.launch(target.path()).await,
        Err(LaunchError::HostNotFound(path)) if path == PathBuf::from("/nonexistent/emu")
    ));

    let engine = self::engine("sleep 5", None);

    assert!(matches!(
        engine.launch("/nonexistent/game.xex").await,
        Err(LaunchError::TargetNotFound(_))
    ));

    assert_eq!(engine.state(), SessionState::Stopped);
    assert!(events.try_recv().is_err());
}

#[test(tokio::test)]
async fn host_exiting_immediately() {
    let target = NamedTempFile::new().unwrap();
    let engine = engine("echo boom; echo oops >&2; exit 3", None);

    let Err(LaunchError::ImmediateExit { code, output }) = engine.launch(target.path()).await
    else {
        panic!("expected immediate exit");
    };

    assert_eq!(code, Some(3));
    assert!(output.iter().any(|line| line == "boom"));
    assert!(output.iter().any(|line| line == "oops"));
    assert_eq!(engine.state(), SessionState::Stopped);
    assert_eq!(engine.target_pid(), None);
}

#[test(tokio::test)]
async fn unresolved_pid_runs_without_debugger() {
    let target = NamedTempFile::new().unwrap();
    let engine = engine("sleep 5", None);

    assert_eq!(
        engine.launch(target.path()).await.unwrap(),
        LaunchOutcome::DebuggingUnavailable {
            pid: None,
            reason: UnavailableReason::PidUnresolved,
        }
    );

    assert_eq!(engine.state(), SessionState::Running);
    assert!(matches!(engine.pause().await, Err(PauseError::NoTarget)));

    assert!(matches!(
        engine.launch(target.path()).await,
        Err(LaunchError::AlreadyActive)
    ));

    engine.stop().await;
    assert_eq!(engine.state(), SessionState::Stopped);

    // a second stop has nothing to do
    engine.stop().await;
}

#[test(tokio::test)]
async fn missing_debugger_runs_without_debugger() {
    let target = NamedTempFile::new().unwrap();
    let engine = engine("sleep 5", Some(4242));
    let mut events = engine.subscribe();

    assert_eq!(
        engine.launch(target.path()).await.unwrap(),
        LaunchOutcome::DebuggingUnavailable {
            pid: Some(4242),
            reason: UnavailableReason::NoDebugger,
        }
    );

    assert_eq!(engine.target_pid(), Some(4242));
    assert!(matches!(
        engine.pause().await,
        Err(PauseError::DebuggingUnavailable)
    ));
    assert!(matches!(
        engine.set_breakpoint("main").await,
        Err(CommandError::NoSession)
    ));

    let states: Vec<_> = std::iter::from_fn(|| events.try_recv().ok())
        .filter_map(|event| match event {
            EngineEvent::StateChanged { to, .. } => Some(to),
            _ => None,
        })
        .collect();

    assert_eq!(states, [SessionState::Starting, SessionState::Running]);

    engine.stop().await;
}

#[test(tokio::test)]
async fn host_exit_ends_the_target() {
    let target = NamedTempFile::new().unwrap();
    let engine = engine("sleep 1", None);

    engine.launch(target.path()).await.unwrap();
    assert_eq!(engine.state(), SessionState::Running);

    wait_stopped(&engine).await;
    assert_eq!(engine.target_pid(), None);
}

#[test(tokio::test)]
async fn launch_attaches_debugger() {
    let target = NamedTempFile::new().unwrap();
    let dir = TempDir::new().unwrap();
    let debugger = fake_debugger(dir.path(), ATTACH_OK, CONTINUE_OK);
    let engine = debugging_engine(debugger.clone());

    let LaunchOutcome::Debugging { pid, debugger: found } =
        engine.launch(target.path()).await.unwrap()
    else {
        panic!("expected an attached debugger");
    };

    assert_eq!(pid, 4242);
    assert_eq!(found.path, debugger);
    assert_eq!(found.version, "GNU gdb (Fake) 14.2");
    assert_eq!(engine.state(), SessionState::Running);
    assert_eq!(engine.target_pid(), Some(4242));

    engine.stop().await;
    assert_eq!(engine.state(), SessionState::Stopped);
    assert_eq!(engine.target_pid(), None);
}

#[test(tokio::test)]
async fn attach_refused_runs_without_debugger() {
    let target = NamedTempFile::new().unwrap();
    let dir = TempDir::new().unwrap();
    let debugger = fake_debugger(
        dir.path(),
        r#"echo "${token}^error,msg=\"ptrace: Operation not permitted.\"""#,
        CONTINUE_OK,
    );
    let engine = debugging_engine(debugger);
    let mut events = engine.subscribe();

    assert_eq!(
        engine.launch(target.path()).await.unwrap(),
        LaunchOutcome::DebuggingUnavailable {
            pid: Some(4242),
            reason: UnavailableReason::AccessDenied("ptrace: Operation not permitted.".to_owned()),
        }
    );

    assert_eq!(engine.state(), SessionState::Running);
    assert!(matches!(
        engine.pause().await,
        Err(PauseError::DebuggingUnavailable)
    ));

    let hinted = std::iter::from_fn(|| events.try_recv().ok())
        .any(|event| matches!(&event, EngineEvent::Log(message) if message.contains("elevation")));
    assert!(hinted);

    engine.stop().await;
}

#[test(tokio::test)]
async fn attach_error_runs_without_debugger() {
    let target = NamedTempFile::new().unwrap();
    let dir = TempDir::new().unwrap();
    let debugger = fake_debugger(
        dir.path(),
        r#"echo "${token}^error,msg=\"ptrace: No such process.\"""#,
        CONTINUE_OK,
    );
    let engine = debugging_engine(debugger);

    assert_eq!(
        engine.launch(target.path()).await.unwrap(),
        LaunchOutcome::DebuggingUnavailable {
            pid: Some(4242),
            reason: UnavailableReason::AttachFailed("ptrace: No such process.".to_owned()),
        }
    );

    assert_eq!(engine.state(), SessionState::Running);
    assert_eq!(engine.target_pid(), Some(4242));

    engine.stop().await;
}

#[test(tokio::test)]
async fn debugger_exiting_during_attach_keeps_target() {
    let target = NamedTempFile::new().unwrap();
    let dir = TempDir::new().unwrap();
    let debugger = fake_debugger(dir.path(), "exit 0", CONTINUE_OK);
    let engine = debugging_engine(debugger);

    assert_eq!(
        engine.launch(target.path()).await.unwrap(),
        LaunchOutcome::DebuggingUnavailable {
            pid: Some(4242),
            reason: UnavailableReason::AttachFailed("debugger exited while attaching".to_owned()),
        }
    );

    // the target keeps running without a debugger
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(engine.state(), SessionState::Running);
    assert_eq!(engine.target_pid(), Some(4242));
    assert!(matches!(
        engine.launch(target.path()).await,
        Err(LaunchError::AlreadyActive)
    ));

    engine.stop().await;
    assert_eq!(engine.state(), SessionState::Stopped);
}

#[test(tokio::test)]
async fn debugger_exit_after_attach_ends_the_target() {
    let target = NamedTempFile::new().unwrap();
    let dir = TempDir::new().unwrap();
    let debugger = fake_debugger(dir.path(), ATTACH_OK, r#"echo "${token}^running"; exit 0"#);
    let engine = debugging_engine(debugger);

    assert!(matches!(
        engine.launch(target.path()).await.unwrap(),
        LaunchOutcome::Debugging { pid: 4242, .. }
    ));

    wait_stopped(&engine).await;
    assert_eq!(engine.target_pid(), None);
}
