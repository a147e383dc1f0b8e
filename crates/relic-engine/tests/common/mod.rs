use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;

use relic_engine::{EngineEvent, MiSession, SessionHub, SessionOptions, SessionState};

use tokio::io::{AsyncWriteExt, DuplexStream, ReadHalf, WriteHalf};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, LinesCodec};

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// In-memory debugger driven by the test.
pub struct FakeBackend {
    commands: FramedRead<ReadHalf<DuplexStream>, LinesCodec>,
    output: WriteHalf<DuplexStream>,
}

impl FakeBackend {
    /// Waits for the next command line, split into token and command.
    pub async fn next_command(&mut self) -> (u64, String) {
        let line = tokio::time::timeout(RECV_TIMEOUT, self.commands.next())
            .await
            .expect("no command in time")
            .expect("session closed its input")
            .expect("invalid command line");

        let digits = line
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(line.len());

        (line[..digits].parse().unwrap(), line[digits..].to_owned())
    }

    /// Waits for a specific command and returns its token.
    pub async fn expect_command(&mut self, expected: &str) -> u64 {
        let (token, command) = self.next_command().await;
        assert_eq!(command, expected);
        token
    }

    /// Asserts that no command arrives within the given delay.
    pub async fn expect_silence(&mut self, delay: Duration) {
        if let Ok(line) = tokio::time::timeout(delay, self.commands.next()).await {
            panic!("unexpected command: {line:?}");
        }
    }

    /// Writes one line of debugger output.
    pub async fn send(&mut self, line: &str) {
        self.output
            .write_all(format!("{line}\n").as_bytes())
            .await
            .unwrap();
    }

    /// Answers a command.
    pub async fn reply(&mut self, token: u64, rest: &str) {
        self.send(&format!("{token}{rest}")).await;
    }

    /// Answers the register and stack queries issued on a pause.
    pub async fn serve_pause_queries(&mut self, with_names: bool) {
        if with_names {
            let token = self.expect_command("-data-list-register-names").await;
            self.reply(token, r#"^done,register-names=["r0","r1","pc","lr","ctr"]"#)
                .await;
        }

        let token = self.expect_command("-data-list-register-values x").await;
        self.reply(
            token,
            r#"^done,register-values=[{number="0",value="0x0"},{number="1",value="0x4"},{number="2",value="0x8000"},{number="3",value="0x10"},{number="4",value="0x20"}]"#,
        )
        .await;

        let token = self.expect_command("-stack-list-frames").await;
        self.reply(
            token,
            r#"^done,stack=[frame={level="0",addr="0x00008000",func="main",file="main.c",fullname="/src/main.c",line="12"},frame={level="1",addr="0x00007ff0",func="start"}]"#,
        )
        .await;
    }
}

/// Timeouts short enough for tests.
pub fn options() -> SessionOptions {
    SessionOptions {
        request_timeout: Duration::from_secs(2),
        attach_timeout: Duration::from_secs(2),
        stop_timeout: Duration::from_secs(2),
    }
}

/// Connects a session to an in-memory debugger.
pub fn connect(options: SessionOptions) -> (Arc<MiSession>, FakeBackend) {
    let (session_side, backend_side) = tokio::io::duplex(64 * 1024);

    let (reader, writer) = tokio::io::split(session_side);
    let session = MiSession::connect(reader, writer, Arc::new(SessionHub::new()), options);

    let (commands, output) = tokio::io::split(backend_side);

    let backend = FakeBackend {
        commands: FramedRead::new(commands, LinesCodec::new()),
        output,
    };

    (session, backend)
}

/// Attaches a connected session to a PID, answering like a debugger.
pub async fn attach(session: &Arc<MiSession>, backend: &mut FakeBackend, pid: u32) {
    let task: JoinHandle<_> = tokio::spawn({
        let session = Arc::clone(session);
        async move { session.attach(pid).await }
    });

    let token = backend.expect_command(&format!("-target-attach {pid}")).await;
    backend
        .send(r#"*stopped,reason="signal-received",signal-name="SIGSTOP",thread-id="1""#)
        .await;
    backend.reply(token, "^done").await;

    let token = backend.expect_command("-exec-continue").await;
    backend.reply(token, "^running").await;
    backend.send(r#"*running,thread-id="all""#).await;

    task.await.unwrap().unwrap();

    assert_eq!(session.hub().state(), SessionState::Running);
}

/// Stops an attached target on its own, as a debugger reporting a trap.
///
/// Register names are answered only on the first pause of a session.
pub async fn pause(session: &Arc<MiSession>, backend: &mut FakeBackend, first: bool) {
    let mut events = session.hub().subscribe();

    backend
        .send(r#"*stopped,reason="signal-received",signal-name="SIGTRAP",thread-id="1""#)
        .await;
    backend.serve_pause_queries(first).await;

    next_event(&mut events, |e| matches!(e, EngineEvent::Paused(_))).await;
    assert_eq!(session.hub().state(), SessionState::Paused);
}

/// Waits for the next event matching a predicate.
pub async fn next_event<F>(events: &mut broadcast::Receiver<EngineEvent>, mut f: F) -> EngineEvent
where
    F: FnMut(&EngineEvent) -> bool,
{
    tokio::time::timeout(RECV_TIMEOUT, async {
        loop {
            let event = events.recv().await.unwrap();

            if f(&event) {
                break event;
            }
        }
    })
    .await
    .expect("no event in time")
}

/// Waits until the session reaches a state.
pub async fn wait_state(session: &MiSession, state: SessionState) {
    tokio::time::timeout(RECV_TIMEOUT, async {
        while session.hub().state() != state {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("state not reached in time");
}
