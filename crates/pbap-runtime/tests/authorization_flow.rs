//! Connection admission through the coordinator
//!
//! Drives a full service with recording collaborators and checks what the
//! session layer, the prompt and the permission store were told.

mod common;

use common::{remote, TestService};
use pbap_harness::{Harness, PromptCall};
use pbap_runtime::{
    AccessPermission, AccessRequestKind, AuthorizationOutcome, ConnectionState, PbapConfig,
    ServiceEvent, SessionHandle,
};
use tokio::time::{sleep, Duration, Instant};

fn resolved(event: &ServiceEvent) -> bool {
    matches!(event, ServiceEvent::AuthorizationResolved { .. })
}

#[tokio::test(start_paused = true)]
async fn test_unanswered_prompt_times_out_after_thirty_seconds() {
    let mut test = TestService::start(Harness::new(), PbapConfig::default()).await;
    let a = remote(1);
    let session = SessionHandle::new(7);

    test.sender.notify_connection_accepted(a, session).unwrap();
    test.expect_event(|e| {
        matches!(e, ServiceEvent::ConnectionStateChanged { state: ConnectionState::Connecting, .. })
    })
    .await;
    let prompted_at = Instant::now();

    assert_eq!(
        test.harness.prompt.calls(),
        vec![PromptCall::Requested {
            remote: a,
            kind: AccessRequestKind::Phonebook
        }]
    );
    assert_eq!(test.queries.status().authorization_pending, Some(a));

    sleep(Duration::from_millis(29_999)).await;
    assert_eq!(test.queries.status().authorization_pending, Some(a));
    assert!(test.harness.sessions.denied().is_empty());

    let event = test.expect_event(resolved).await;
    assert_eq!(prompted_at.elapsed(), Duration::from_millis(30_000));
    assert_eq!(
        event,
        ServiceEvent::AuthorizationResolved {
            remote: a,
            outcome: AuthorizationOutcome::TimedOut
        }
    );

    test.expect_event(|e| {
        matches!(e, ServiceEvent::ConnectionStateChanged { state: ConnectionState::Disconnected, .. })
    })
    .await;
    assert_eq!(test.harness.sessions.denied(), vec![session]);
    assert_eq!(test.harness.prompt.cancel_count(), 1);
    assert!(test.harness.permissions.writes().is_empty());

    let status = test.queries.status();
    assert!(status.connection.is_none());
    assert!(status.authorization_pending.is_none());
    assert_eq!(test.harness.listener.rearm_count(), 1);

    test.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_trusted_device_is_admitted_without_prompt() {
    let harness = Harness::new();
    let a = remote(2);
    harness.permissions.preset(a, AccessPermission::Allowed);
    let mut test = TestService::start(harness, PbapConfig::default()).await;

    test.sender
        .notify_connection_accepted(a, SessionHandle::new(1))
        .unwrap();
    let event = test.expect_event(resolved).await;
    assert_eq!(
        event,
        ServiceEvent::AuthorizationResolved {
            remote: a,
            outcome: AuthorizationOutcome::Allowed
        }
    );
    test.barrier().await;

    assert_eq!(test.harness.sessions.admitted(), vec![SessionHandle::new(1)]);
    assert_eq!(test.harness.prompt.request_count(), 0);
    let status = test.queries.status();
    assert!(status.authorization_pending.is_none());
    assert_eq!(status.connection_state(a), ConnectionState::Connected);

    // No timer was armed: nothing happens when a timeout would have fired
    sleep(Duration::from_secs(60)).await;
    assert_eq!(test.queries.status().connection_state(a), ConnectionState::Connected);
    assert!(test.harness.sessions.denied().is_empty());

    test.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_rejected_device_is_denied_and_listener_rearmed() {
    let harness = Harness::new();
    let a = remote(3);
    harness.permissions.preset(a, AccessPermission::Rejected);
    let mut test = TestService::start(harness, PbapConfig::default()).await;

    test.sender
        .notify_connection_accepted(a, SessionHandle::new(2))
        .unwrap();
    test.expect_event(resolved).await;
    test.barrier().await;

    assert_eq!(test.harness.sessions.denied(), vec![SessionHandle::new(2)]);
    assert_eq!(test.harness.prompt.request_count(), 0);
    assert_eq!(test.harness.listener.rearm_count(), 1);
    assert!(test.queries.status().connection.is_none());

    test.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_persisted_grant_is_stored_once() {
    let mut test = TestService::start(Harness::new(), PbapConfig::default()).await;
    let a = remote(4);

    test.sender
        .notify_connection_accepted(a, SessionHandle::new(3))
        .unwrap();
    test.barrier().await;
    test.sender
        .notify_authorization_reply(a, AccessRequestKind::Phonebook, true, true)
        .unwrap();
    test.expect_event(resolved).await;

    // A second reply finds no pending request
    test.sender
        .notify_authorization_reply(a, AccessRequestKind::Phonebook, true, true)
        .unwrap();
    test.barrier().await;

    assert_eq!(
        test.harness.permissions.writes(),
        vec![(a, AccessPermission::Allowed)]
    );
    assert_eq!(test.harness.sessions.admitted(), vec![SessionHandle::new(3)]);
    assert_eq!(test.harness.prompt.cancel_count(), 0);

    test.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_reply_after_timeout_is_ignored() {
    let mut test = TestService::start(Harness::new(), PbapConfig::default()).await;
    let a = remote(5);

    test.sender
        .notify_connection_accepted(a, SessionHandle::new(4))
        .unwrap();
    let event = test.expect_event(resolved).await;
    assert!(matches!(
        event,
        ServiceEvent::AuthorizationResolved {
            outcome: AuthorizationOutcome::TimedOut,
            ..
        }
    ));

    test.sender
        .notify_authorization_reply(a, AccessRequestKind::Phonebook, true, true)
        .unwrap();
    test.barrier().await;

    assert!(test.harness.permissions.writes().is_empty());
    assert!(test.harness.sessions.admitted().is_empty());
    assert_eq!(test.harness.sessions.denied(), vec![SessionHandle::new(4)]);

    test.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_reply_for_other_profile_is_ignored() {
    let mut test = TestService::start(Harness::new(), PbapConfig::default()).await;
    let a = remote(6);

    test.sender
        .notify_connection_accepted(a, SessionHandle::new(5))
        .unwrap();
    test.sender
        .notify_authorization_reply(a, AccessRequestKind::MessageAccess, true, true)
        .unwrap();
    test.barrier().await;

    assert_eq!(test.queries.status().authorization_pending, Some(a));
    assert!(test.harness.sessions.admitted().is_empty());
    assert!(test.harness.permissions.writes().is_empty());

    test.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_prompt_denies_without_storing() {
    let mut test = TestService::start(Harness::new(), PbapConfig::default()).await;
    let a = remote(7);

    test.sender
        .notify_connection_accepted(a, SessionHandle::new(6))
        .unwrap();
    test.sender.notify_authorization_cancelled(a).unwrap();
    let event = test.expect_event(resolved).await;
    assert_eq!(
        event,
        ServiceEvent::AuthorizationResolved {
            remote: a,
            outcome: AuthorizationOutcome::Cancelled
        }
    );
    test.barrier().await;

    assert_eq!(test.harness.sessions.denied(), vec![SessionHandle::new(6)]);
    assert!(test.harness.permissions.writes().is_empty());
    assert!(test.queries.status().connection.is_none());

    test.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_second_connection_is_refused_while_slot_is_taken() {
    let harness = Harness::new();
    let (a, b) = (remote(8), remote(9));
    harness.permissions.preset(a, AccessPermission::Allowed);
    harness.permissions.preset(b, AccessPermission::Allowed);
    let mut test = TestService::start(harness, PbapConfig::default()).await;

    test.sender
        .notify_connection_accepted(a, SessionHandle::new(10))
        .unwrap();
    test.sender
        .notify_connection_accepted(b, SessionHandle::new(11))
        .unwrap();
    test.barrier().await;

    assert_eq!(test.harness.sessions.admitted(), vec![SessionHandle::new(10)]);
    assert_eq!(test.harness.sessions.denied(), vec![SessionHandle::new(11)]);
    let status = test.queries.status();
    assert_eq!(status.connection_state(a), ConnectionState::Connected);
    assert_eq!(status.connection_state(b), ConnectionState::Disconnected);

    test.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_before_resolution_discards_request() {
    let mut test = TestService::start(Harness::new(), PbapConfig::default()).await;
    let a = remote(10);
    let session = SessionHandle::new(12);

    test.sender.notify_connection_accepted(a, session).unwrap();
    test.sender.notify_transport_disconnected(a).unwrap();
    test.barrier().await;

    assert_eq!(test.harness.sessions.closed(), vec![session]);
    let status = test.queries.status();
    assert!(status.authorization_pending.is_none());
    assert!(status.connection.is_some_and(|c| c.closing));

    test.sender.notify_session_completed(session).unwrap();
    test.barrier().await;
    assert!(test.queries.status().connection.is_none());

    // The discarded request never times out
    sleep(Duration::from_secs(60)).await;
    test.barrier().await;
    assert!(test.harness.sessions.denied().is_empty());
    assert_eq!(test.harness.prompt.cancel_count(), 0);

    test.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_auth_challenge_is_forwarded_to_session() {
    let harness = Harness::new();
    let a = remote(11);
    harness.permissions.preset(a, AccessPermission::Allowed);
    let mut test = TestService::start(harness, PbapConfig::default()).await;
    let session = SessionHandle::new(13);

    test.sender.notify_connection_accepted(a, session).unwrap();
    test.sender.notify_auth_challenge_response(a, "0000").unwrap();
    test.sender.notify_auth_challenge_cancelled(a).unwrap();
    test.sender
        .notify_auth_challenge_response(remote(12), "1234")
        .unwrap();
    test.barrier().await;

    let calls = test.harness.sessions.calls();
    assert!(calls.contains(&pbap_harness::SessionCall::AuthKey {
        session,
        key: "0000".to_string()
    }));
    assert!(calls.contains(&pbap_harness::SessionCall::AuthCancelled(session)));
    assert_eq!(calls.len(), 3);

    test.stop().await;
}
