//! End-to-end translator behavior against a scripted runner.

use std::time::Duration;

use pretty_assertions::assert_eq;

use iscsi_command_core::translator::UNSUPPORTED_COMMAND;
use iscsi_command_core::{CallContext, CommandTranslator, LunInfo, TranslateError};
use iscsi_command_test_utils::fixtures::{self, INITIATOR, PORTAL, TARGET_IQN};
use iscsi_command_test_utils::runner::ScriptedRunner;
use iscsi_command_test_utils::tracing_setup::recording_dispatch;

#[test_log::test(tokio::test)]
async fn matched_target_returns_its_luns() {
    let runner = ScriptedRunner::succeeding(fixtures::SINGLE_LUN_OUTPUT);
    let translator = CommandTranslator::new(runner.clone(), "iscsi-ls");

    let response = translator
        .execute(&CallContext::background(), &fixtures::discovery_request())
        .await
        .unwrap();

    assert_eq!(
        response.luns,
        vec![LunInfo {
            lun_id: 0,
            size: "10GB".to_string(),
            vendor: "ACME".to_string(),
            product: "DISK".to_string(),
            serial: "XYZ".to_string(),
        }]
    );
    assert_eq!(response.output, fixtures::SINGLE_LUN_OUTPUT);
    assert_eq!(response.error, "");

    let calls = runner.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].program(), "iscsi-ls");
    assert_eq!(
        calls[0].args(),
        [
            "iscsi://192.168.1.100:3260",
            "-i",
            INITIATOR,
            "-s",
            "-T",
            TARGET_IQN,
        ]
    );
}

#[test_log::test(tokio::test)]
async fn credentials_are_embedded_in_the_url() {
    let runner = ScriptedRunner::succeeding(fixtures::SINGLE_LUN_OUTPUT);
    let translator = CommandTranslator::new(runner.clone(), "iscsi-ls");
    let request = fixtures::discovery_request().with_credentials("user", "password");

    translator
        .execute(&CallContext::background(), &request)
        .await
        .unwrap();

    assert_eq!(
        runner.calls()[0].args()[0],
        format!("iscsi://user%password@{PORTAL}")
    );
}

#[test_log::test(tokio::test)]
async fn unsupported_command_never_runs_the_tool() {
    let runner = ScriptedRunner::succeeding(fixtures::SINGLE_LUN_OUTPUT);
    let translator = CommandTranslator::new(runner.clone(), "iscsi-ls");
    let mut request = fixtures::discovery_request();
    request.command = "rm".to_string();

    let response = translator
        .execute(&CallContext::background(), &request)
        .await
        .unwrap();

    assert_eq!(response.error, UNSUPPORTED_COMMAND);
    assert_eq!(response.output, "");
    assert!(response.luns.is_empty());
    assert_eq!(runner.call_count(), 0);
}

#[test_log::test(tokio::test)]
async fn empty_command_is_unsupported() {
    let runner = ScriptedRunner::succeeding(fixtures::SINGLE_LUN_OUTPUT);
    let translator = CommandTranslator::new(runner.clone(), "iscsi-ls");
    let mut request = fixtures::discovery_request();
    request.command = String::new();

    let response = translator
        .execute(&CallContext::background(), &request)
        .await
        .unwrap();
    assert_eq!(response.error, UNSUPPORTED_COMMAND);
    assert_eq!(runner.call_count(), 0);
}

#[test_log::test(tokio::test)]
async fn no_matching_target_is_not_found() {
    let translator = CommandTranslator::new(
        ScriptedRunner::succeeding(fixtures::OTHER_TARGET_OUTPUT),
        "iscsi-ls",
    );

    let err = translator
        .execute(&CallContext::background(), &fixtures::discovery_request())
        .await
        .unwrap_err();

    assert!(matches!(err, TranslateError::NoMatch(ref iqn) if iqn == TARGET_IQN));
    assert_eq!(
        err.to_string(),
        "no LUNs found for target iqn.2023-01.com.example"
    );
}

#[test_log::test(tokio::test)]
async fn matched_target_without_luns_is_success() {
    let output = r#"[{"Target":"iqn.2023-01.com.example","Portals":[],"LUNs":[]}]"#;
    let translator = CommandTranslator::new(ScriptedRunner::succeeding(output), "iscsi-ls");

    let response = translator
        .execute(&CallContext::background(), &fixtures::discovery_request())
        .await
        .unwrap();
    assert!(response.luns.is_empty());
    assert_eq!(response.error, "");
}

#[test_log::test(tokio::test)]
async fn spawn_failure_is_soft() {
    let translator = CommandTranslator::new(
        ScriptedRunner::failing_to_spawn("No such file or directory"),
        "iscsi-ls",
    );

    let response = translator
        .execute(&CallContext::background(), &fixtures::discovery_request())
        .await
        .unwrap();

    assert!(response.error.starts_with("failed to run iscsi-ls: iscsi-ls iscsi://"));
    assert!(response.error.ends_with("No such file or directory"));
    assert_eq!(response.output, "");
    assert!(response.luns.is_empty());
}

#[test_log::test(tokio::test)]
async fn exit_failure_carries_tool_output() {
    let translator = CommandTranslator::new(
        ScriptedRunner::exiting(2, "iscsi_connect: login failed\n"),
        "iscsi-ls",
    );

    let response = translator
        .execute(&CallContext::background(), &fixtures::discovery_request())
        .await
        .unwrap();

    assert!(response.error.ends_with("exit status 2"));
    assert_eq!(response.output, "iscsi_connect: login failed\n");
}

#[test_log::test(tokio::test)]
async fn cancellation_abandons_the_runner() {
    let runner = ScriptedRunner::hanging();
    let translator = CommandTranslator::new(runner.clone(), "iscsi-ls");
    let (ctx, handle) = CallContext::background().with_cancel();

    let call = tokio::spawn({
        let translator = translator.clone();
        async move {
            translator
                .execute(&ctx, &fixtures::discovery_request())
                .await
        }
    });

    tokio::time::sleep(Duration::from_millis(20)).await;
    handle.cancel();

    let err = call.await.unwrap().unwrap_err();
    assert!(matches!(err, TranslateError::Canceled));
    assert_eq!(runner.call_count(), 1);
    assert_eq!(runner.abandoned(), 1);
}

#[test_log::test(tokio::test)]
async fn deadline_is_reported_as_timeout() {
    let runner = ScriptedRunner::hanging();
    let translator = CommandTranslator::new(runner.clone(), "iscsi-ls");

    let err = translator
        .execute(
            &CallContext::with_timeout(Duration::from_millis(30)),
            &fixtures::discovery_request(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, TranslateError::DeadlineExceeded));
    assert_eq!(runner.abandoned(), 1);
}

#[test_log::test(tokio::test)]
async fn already_expired_deadline_wins_over_exit_failure() {
    let translator = CommandTranslator::new(ScriptedRunner::exiting(1, "boom"), "iscsi-ls");
    let ctx = CallContext::with_timeout(Duration::ZERO);

    let err = translator
        .execute(&ctx, &fixtures::discovery_request())
        .await
        .unwrap_err();
    assert!(matches!(err, TranslateError::DeadlineExceeded));
}

#[test_log::test(tokio::test)]
async fn logs_go_to_injected_dispatch_without_password() {
    let (dispatch, reader) = recording_dispatch(128);
    let translator = CommandTranslator::new(
        ScriptedRunner::succeeding(fixtures::SINGLE_LUN_OUTPUT),
        "iscsi-ls",
    )
    .with_dispatch(dispatch);
    let request = fixtures::discovery_request().with_credentials("admin", "hunter2");

    translator
        .execute(&CallContext::background(), &request)
        .await
        .unwrap();

    let received = reader
        .entries()
        .into_iter()
        .find(|e| e.message == "Received Execute request")
        .expect("request event");
    assert_eq!(received.field("portal"), Some(PORTAL));
    assert_eq!(received.field("target_iqn"), Some(TARGET_IQN));

    let executing = reader
        .entries()
        .into_iter()
        .find(|e| e.message == "Executing command")
        .expect("execution event");
    assert_eq!(
        executing.field("cmd"),
        Some(
            "iscsi-ls iscsi://admin%***@192.168.1.100:3260 -i iqn.1993-08.org.debian:01:abcdef -s -T iqn.2023-01.com.example"
        )
    );

    let matched = reader
        .entries()
        .into_iter()
        .find(|e| e.message == "Found matching target, returning LUNs")
        .expect("match event");
    assert_eq!(matched.field("lun_count"), Some("1"));

    assert!(reader.entries().iter().all(|e| !e.render().contains("hunter2")));
}
