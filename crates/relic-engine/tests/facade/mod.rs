use std::sync::Arc;
use std::time::Duration;

use relic_engine::{Breakpoint, CommandError, EngineEvent, Frame, SessionState};

use test_log::test;

use crate::common;

#[test(tokio::test)]
async fn insert_and_delete_breakpoint() {
    let (session, mut backend) = common::connect(common::options());
    let mut events = session.hub().subscribe();

    let insert = tokio::spawn({
        let session = Arc::clone(&session);
        async move { session.insert_breakpoint("0x1000").await }
    });

    let token = backend.expect_command("-break-insert *0x1000").await;
    backend
        .reply(
            token,
            r#"^done,bkpt={number="1",type="breakpoint",disp="keep",enabled="y",addr="0x1000",thread-groups=["i1"],times="0"}"#,
        )
        .await;

    let expected = Breakpoint {
        id: "1".to_owned(),
        address: "0x1000".to_owned(),
        source_file: None,
        source_line: None,
        function: None,
        enabled: true,
        hit_count: 0,
    };

    assert_eq!(insert.await.unwrap().unwrap(), expected);
    assert_eq!(session.breakpoints(), [expected.clone()]);

    let delete = tokio::spawn({
        let session = Arc::clone(&session);
        async move { session.delete_breakpoint("1").await }
    });

    let token = backend.expect_command("-break-delete 1").await;
    backend.reply(token, "^done").await;

    delete.await.unwrap().unwrap();
    assert!(session.breakpoints().is_empty());

    let is_list = |e: &EngineEvent| matches!(e, EngineEvent::Breakpoints(_));
    assert_eq!(
        common::next_event(&mut events, is_list).await,
        EngineEvent::Breakpoints(vec![expected])
    );
    assert_eq!(
        common::next_event(&mut events, is_list).await,
        EngineEvent::Breakpoints(vec![])
    );
}

#[test(tokio::test)]
async fn rejected_delete_keeps_breakpoint() {
    let (session, mut backend) = common::connect(common::options());

    let insert = tokio::spawn({
        let session = Arc::clone(&session);
        async move { session.insert_breakpoint("main").await }
    });

    let token = backend.expect_command("-break-insert main").await;
    backend
        .reply(
            token,
            r#"^done,bkpt={number="2",enabled="y",addr="0x82000040",func="main",file="main.c",line="7",times="0"}"#,
        )
        .await;
    insert.await.unwrap().unwrap();

    let delete = tokio::spawn({
        let session = Arc::clone(&session);
        async move { session.delete_breakpoint("9").await }
    });

    let token = backend.expect_command("-break-delete 9").await;
    backend
        .reply(token, r#"^error,msg="No breakpoint number 9.""#)
        .await;

    assert!(matches!(
        delete.await.unwrap(),
        Err(CommandError::Rejected(msg)) if msg == "No breakpoint number 9."
    ));
    assert_eq!(session.breakpoints().len(), 1);
    assert_eq!(session.breakpoints()[0].source_line, Some(7));
}

#[test(tokio::test)]
async fn list_replaces_known_breakpoints() {
    let (session, mut backend) = common::connect(common::options());

    let list = tokio::spawn({
        let session = Arc::clone(&session);
        async move { session.refresh_breakpoints().await }
    });

    let token = backend.expect_command("-break-list").await;
    backend
        .reply(
            token,
            r#"^done,BreakpointTable={nr_rows="2",nr_cols="6",hdr=[{width="3",alignment="-1",col_name="number",colhdr="Num"}],body=[bkpt={number="1",enabled="y",addr="0x1000",times="3"},bkpt={number="4",enabled="n",addr="0x2000",times="0"}]}"#,
        )
        .await;

    let breakpoints = list.await.unwrap().unwrap();
    let ids: Vec<_> = breakpoints.iter().map(|b| b.id.as_str()).collect();

    assert_eq!(ids, ["1", "4"]);
    assert_eq!(breakpoints[0].hit_count, 3);
    assert!(!breakpoints[1].enabled);
    assert_eq!(session.breakpoints(), breakpoints);
}

#[test(tokio::test)]
async fn breakpoint_notifications_update_list() {
    let (session, mut backend) = common::connect(common::options());

    let list = tokio::spawn({
        let session = Arc::clone(&session);
        async move { session.refresh_breakpoints().await }
    });

    let token = backend.expect_command("-break-list").await;
    backend
        .reply(
            token,
            r#"^done,BreakpointTable={nr_rows="2",body=[bkpt={number="1",addr="0x1000",times="0"},bkpt={number="2",addr="0x2000",times="0"}]}"#,
        )
        .await;
    list.await.unwrap().unwrap();

    let mut events = session.hub().subscribe();

    backend
        .send(r#"=breakpoint-modified,bkpt={number="1",enabled="y",addr="0x1000",times="1"}"#)
        .await;
    backend.send(r#"=breakpoint-deleted,id="2""#).await;

    let is_list = |e: &EngineEvent| matches!(e, EngineEvent::Breakpoints(_));
    common::next_event(&mut events, is_list).await;
    common::next_event(&mut events, is_list).await;

    let breakpoints = session.breakpoints();

    assert_eq!(breakpoints.len(), 1);
    assert_eq!(breakpoints[0].hit_count, 1);
}

#[test(tokio::test)]
async fn register_names_are_fetched_once() {
    let (session, mut backend) = common::connect(common::options());

    for with_names in [true, false] {
        let fetch = tokio::spawn({
            let session = Arc::clone(&session);
            async move { session.fetch_registers().await }
        });

        if with_names {
            let token = backend.expect_command("-data-list-register-names").await;
            backend
                .reply(token, r#"^done,register-names=["r0","r1","pc","lr","ctr"]"#)
                .await;
        }

        let token = backend.expect_command("-data-list-register-values x").await;
        backend
            .reply(
                token,
                r#"^done,register-values=[{number="0",value="0x0"},{number="1",value="0x4"},{number="2",value="0x8000"},{number="3",value="0x10"},{number="4",value="0x20"}]"#,
            )
            .await;

        let registers = fetch.await.unwrap().unwrap();

        assert_eq!(registers.program_counter.as_deref(), Some("0x8000"));
        assert_eq!(registers.link_register.as_deref(), Some("0x10"));
        assert_eq!(registers.counter_register.as_deref(), Some("0x20"));
        assert_eq!(
            registers.general,
            [
                ("r0".to_owned(), "0x0".to_owned()),
                ("r1".to_owned(), "0x4".to_owned()),
                ("pc".to_owned(), "0x8000".to_owned()),
                ("lr".to_owned(), "0x10".to_owned()),
                ("ctr".to_owned(), "0x20".to_owned()),
            ]
        );
        assert_eq!(session.last_registers(), Some(registers));
    }
}

#[test(tokio::test)]
async fn read_and_write_memory() {
    let (session, mut backend) = common::connect(common::options());

    let read = tokio::spawn({
        let session = Arc::clone(&session);
        async move { session.read_memory("0x82000000", 4).await }
    });

    let token = backend
        .expect_command("-data-read-memory-bytes 0x82000000 4")
        .await;
    backend
        .reply(
            token,
            r#"^done,memory=[{begin="0x82000000",offset="0x00000000",end="0x82000004",contents="DEADBEEF"}]"#,
        )
        .await;

    let block = read.await.unwrap().unwrap();

    assert_eq!(block.begin, "0x82000000");
    assert_eq!(block.contents, "deadbeef");
    assert_eq!(block.len(), 4);

    assert!(matches!(
        session.write_memory("0x82000000", "xyz").await,
        Err(CommandError::InvalidHex)
    ));
    backend.expect_silence(Duration::from_millis(100)).await;

    let write = tokio::spawn({
        let session = Arc::clone(&session);
        async move { session.write_memory("0x82000000", "0badf00d").await }
    });

    let token = backend
        .expect_command("-data-write-memory-bytes 0x82000000 0badf00d")
        .await;
    backend.reply(token, "^done").await;

    write.await.unwrap().unwrap();
}

#[test(tokio::test)]
async fn memory_failures_are_typed() {
    let (session, mut backend) = common::connect(common::options());

    let read = tokio::spawn({
        let session = Arc::clone(&session);
        async move { session.read_memory("0x10", 4).await }
    });

    let token = backend.expect_command("-data-read-memory-bytes 0x10 4").await;
    backend
        .reply(token, r#"^done,memory=[{begin="0x10",offset="0x0",end="0x12",contents="abcd"}]"#)
        .await;

    assert!(matches!(
        read.await.unwrap(),
        Err(CommandError::PartialRead(2, 4))
    ));

    let read = tokio::spawn({
        let session = Arc::clone(&session);
        async move { session.read_memory("0x0", 4).await }
    });

    let token = backend.expect_command("-data-read-memory-bytes 0x0 4").await;
    backend
        .reply(token, r#"^error,msg="Unable to read memory.""#)
        .await;

    assert!(matches!(
        read.await.unwrap(),
        Err(CommandError::Rejected(_))
    ));
}

#[test(tokio::test)]
async fn backtrace_frames() {
    let (session, mut backend) = common::connect(common::options());

    let backtrace = tokio::spawn({
        let session = Arc::clone(&session);
        async move { session.backtrace().await }
    });

    let token = backend.expect_command("-stack-list-frames").await;
    backend
        .reply(
            token,
            r#"^done,stack=[frame={level="0",addr="0x82000010",func="update",file="game.c",line="40"},frame={level="1",addr="0x82000400"}]"#,
        )
        .await;

    assert_eq!(
        backtrace.await.unwrap().unwrap(),
        [
            Frame {
                level: 0,
                address: "0x82000010".to_owned(),
                function: Some("update".to_owned()),
                file: Some("game.c".to_owned()),
                line: Some(40),
            },
            Frame {
                level: 1,
                address: "0x82000400".to_owned(),
                function: None,
                file: None,
                line: None,
            },
        ]
    );
}

#[test(tokio::test)]
async fn step_requires_pause() {
    let (session, mut backend) = common::connect(common::options());
    common::attach(&session, &mut backend, 4242).await;

    assert!(matches!(
        session.step().await,
        Err(CommandError::NotPaused(SessionState::Running))
    ));
    backend.expect_silence(Duration::from_millis(100)).await;
}

#[test(tokio::test)]
async fn step_over_reports_pause() {
    let (session, mut backend) = common::connect(common::options());
    common::attach(&session, &mut backend, 4242).await;
    common::pause(&session, &mut backend, true).await;

    let step = tokio::spawn({
        let session = Arc::clone(&session);
        async move { session.step_over().await }
    });

    backend.expect_command("-exec-next-instruction").await;
    backend.send(r#"*running,thread-id="all""#).await;
    backend
        .send(r#"*stopped,reason="end-stepping-range",frame={addr="0x00008004",func="main"},thread-id="1""#)
        .await;

    backend.serve_pause_queries(false).await;

    let report = step.await.unwrap().unwrap();

    assert_eq!(report.stop.address, "0x00008004");
    assert_eq!(session.hub().state(), SessionState::Paused);
    backend.expect_silence(Duration::from_millis(200)).await;
}

#[test(tokio::test)]
async fn resume_sets_running() {
    let (session, mut backend) = common::connect(common::options());
    common::attach(&session, &mut backend, 4242).await;
    common::pause(&session, &mut backend, true).await;

    let resume = tokio::spawn({
        let session = Arc::clone(&session);
        async move { session.resume().await }
    });

    let token = backend.expect_command("-exec-continue").await;
    backend.reply(token, "^running").await;

    resume.await.unwrap().unwrap();
    assert_eq!(session.hub().state(), SessionState::Running);
}

#[test(tokio::test)]
async fn teardown_clears_breakpoints() {
    let (session, mut backend) = common::connect(common::options());

    let insert = tokio::spawn({
        let session = Arc::clone(&session);
        async move { session.insert_breakpoint("0x1000").await }
    });

    let token = backend.expect_command("-break-insert *0x1000").await;
    backend
        .reply(token, r#"^done,bkpt={number="1",addr="0x1000"}"#)
        .await;
    insert.await.unwrap().unwrap();

    let mut events = session.hub().subscribe();
    session.teardown();

    assert!(session.breakpoints().is_empty());
    assert_eq!(session.last_registers(), None);
    assert_eq!(
        common::next_event(&mut events, |e| matches!(e, EngineEvent::Breakpoints(_))).await,
        EngineEvent::Breakpoints(vec![])
    );
}
