//! Admission state machine driven through paused tokio time.

use crate::integration::support::{settle, MachineFixture, CHAT};
use duet::admission::{AdmissionRegistry, ChallengeRef, ExpireOutcome, VerifyOutcome};
use duet::agent::AgentLabel;
use duet::error::ApiError;
use duet::event::ChatUser;
use duet::gateway::PermissionSet;
use duet::types::AdmissionKey;
use std::time::Duration;
use tokio::time::sleep;

#[tokio::test(start_paused = true)]
async fn unverified_member_is_expelled_only_after_deadline() {
    let fx = MachineFixture::start(AgentLabel::A, 60);
    let key = AdmissionKey::new(CHAT, 7);

    fx.machine.admit(CHAT, &ChatUser::new(7, "Newbie")).await.unwrap();
    assert_eq!(fx.gateway.restrictions_of(7), vec![PermissionSet::restricted()]);
    assert_eq!(
        fx.gateway.challenges(),
        vec![ChallengeRef::new(CHAT, 7).to_payload()]
    );

    sleep(Duration::from_secs(59)).await;
    settle().await;
    assert_eq!(fx.gateway.bans_of(7), 0);
    assert!(fx.registry.get(&key).unwrap().is_some());

    sleep(Duration::from_secs(3)).await;
    settle().await;
    assert_eq!(fx.gateway.bans_of(7), 1);
    assert_eq!(fx.gateway.unbans_of(7), 1);
    assert!(fx.registry.get(&key).unwrap().is_none());

    fx.machine.stop().await;
}

#[tokio::test(start_paused = true)]
async fn verification_before_deadline_prevents_eviction() {
    let fx = MachineFixture::start(AgentLabel::A, 60);

    fx.machine.admit(CHAT, &ChatUser::new(7, "Newbie")).await.unwrap();
    sleep(Duration::from_secs(10)).await;

    let outcome = fx
        .machine
        .verify(7, &ChallengeRef::new(CHAT, 7))
        .await
        .unwrap();
    assert_eq!(outcome, VerifyOutcome::Verified { restored: true });

    // The deadline check still fires and finds nothing to do
    sleep(Duration::from_secs(60)).await;
    settle().await;
    assert_eq!(fx.gateway.bans_of(7), 0);
    assert_eq!(
        fx.gateway.restrictions_of(7),
        vec![PermissionSet::restricted(), PermissionSet::full()]
    );
    assert_eq!(fx.machine.scheduler_stats().fired, 1);

    fx.machine.stop().await;
}

#[tokio::test(start_paused = true)]
async fn challenge_answered_by_someone_else_is_rejected() {
    let fx = MachineFixture::start(AgentLabel::A, 60);
    let key = AdmissionKey::new(CHAT, 7);

    fx.machine.admit(CHAT, &ChatUser::new(7, "Newbie")).await.unwrap();

    let outcome = fx
        .machine
        .verify(5, &ChallengeRef::new(CHAT, 7))
        .await
        .unwrap();
    assert_eq!(outcome, VerifyOutcome::WrongUser { expected: 7 });
    assert!(fx.registry.get(&key).unwrap().is_some());
    assert_eq!(fx.gateway.restrictions_of(7), vec![PermissionSet::restricted()]);
    assert!(fx.gateway.restrictions_of(5).is_empty());

    fx.machine.stop().await;
}

#[tokio::test(start_paused = true)]
async fn late_verification_restores_permissions_without_error() {
    let fx = MachineFixture::start(AgentLabel::A, 60);

    fx.machine.admit(CHAT, &ChatUser::new(7, "Newbie")).await.unwrap();
    sleep(Duration::from_secs(62)).await;
    settle().await;
    assert_eq!(fx.gateway.bans_of(7), 1);

    let outcome = fx
        .machine
        .verify(7, &ChallengeRef::new(CHAT, 7))
        .await
        .unwrap();
    assert_eq!(outcome, VerifyOutcome::AlreadyResolved { restored: true });

    fx.machine.stop().await;
}

#[tokio::test(start_paused = true)]
async fn concurrent_verify_and_expire_remove_each_entry_once() {
    // Two agents over one registry: A verifies while B expires
    let a = MachineFixture::start(AgentLabel::A, 60);
    let b = MachineFixture::start_with_registry(AgentLabel::B, 60, a.registry.clone());

    let users: Vec<i64> = (100..150).collect();
    for user in &users {
        a.machine
            .admit(CHAT, &ChatUser::new(*user, "Racer"))
            .await
            .unwrap();
    }
    // Every deadline has passed, but no scheduled check has fired yet
    sleep(Duration::from_secs(60)).await;

    let mut handles = Vec::new();
    for user in &users {
        let verifier = a.machine.clone();
        let expirer = b.machine.clone();
        let user = *user;
        handles.push(tokio::spawn(async move {
            let challenge = ChallengeRef::new(CHAT, user);
            tokio::join!(
                verifier.verify(user, &challenge),
                expirer.expire(AdmissionKey::new(CHAT, user)),
            )
        }));
    }

    for (user, handle) in users.iter().zip(handles) {
        let (verified, expired) = handle.await.unwrap();
        let verified = verified.unwrap();
        let expired = expired.unwrap();
        match (verified, expired) {
            (VerifyOutcome::Verified { .. }, ExpireOutcome::Absent) => {
                assert_eq!(b.gateway.bans_of(*user), 0);
            }
            (VerifyOutcome::AlreadyResolved { .. }, ExpireOutcome::Expelled { kicked }) => {
                assert!(kicked);
                assert_eq!(b.gateway.bans_of(*user), 1);
            }
            other => panic!("user {}: both or neither path won: {:?}", user, other),
        }
    }
    assert!(a.registry.list().unwrap().is_empty());

    a.machine.stop().await;
    b.machine.stop().await;
}

#[tokio::test(start_paused = true)]
async fn rejoin_replaces_entry_and_rearms_check() {
    let fx = MachineFixture::start(AgentLabel::A, 60);
    let user = ChatUser::new(7, "Returning");

    fx.machine.admit(CHAT, &user).await.unwrap();
    sleep(Duration::from_secs(30)).await;
    fx.machine.admit(CHAT, &user).await.unwrap();

    // First check at 61s sees the fresh deadline at 90s
    sleep(Duration::from_secs(32)).await;
    settle().await;
    assert_eq!(fx.gateway.bans_of(7), 0);
    assert_eq!(fx.registry.list().unwrap().len(), 1);

    sleep(Duration::from_secs(30)).await;
    settle().await;
    assert_eq!(fx.gateway.bans_of(7), 1);
    assert!(fx.registry.list().unwrap().is_empty());

    fx.machine.stop().await;
}

#[tokio::test(start_paused = true)]
async fn partner_check_on_undue_entry_does_not_rearm() {
    let a = MachineFixture::start(AgentLabel::A, 60);
    let b = MachineFixture::start_with_registry(AgentLabel::B, 60, a.registry.clone());
    let key = AdmissionKey::new(CHAT, 7);

    a.machine.admit(CHAT, &ChatUser::new(7, "Newbie")).await.unwrap();
    sleep(Duration::from_secs(10)).await;

    assert_eq!(
        b.machine.expire(key).await.unwrap(),
        ExpireOutcome::NotDue { rearmed: false }
    );
    assert_eq!(b.machine.scheduler_stats().scheduled, 0);
    assert!(a.registry.get(&key).unwrap().is_some());

    a.machine.stop().await;
    b.machine.stop().await;
}

#[tokio::test(start_paused = true)]
async fn platform_failures_do_not_block_transitions() {
    let fx = MachineFixture::start(AgentLabel::A, 60);
    let key = AdmissionKey::new(CHAT, 7);
    fx.gateway.fail_actions(true);

    let pending = fx.machine.admit(CHAT, &ChatUser::new(7, "Newbie")).await.unwrap();
    assert_eq!(pending.admitted_by, AgentLabel::A);
    assert!(fx.registry.get(&key).unwrap().is_some());

    sleep(Duration::from_secs(60)).await;
    assert_eq!(
        fx.machine.expire(key).await.unwrap(),
        ExpireOutcome::Expelled { kicked: false }
    );
    assert!(fx.registry.get(&key).unwrap().is_none());

    fx.machine.stop().await;
}

#[tokio::test(start_paused = true)]
async fn unbounded_timeout_refuses_admission_without_side_effects() {
    let fx = MachineFixture::start(AgentLabel::A, u64::MAX / 1000);

    let result = fx.machine.admit(CHAT, &ChatUser::new(7, "Newbie")).await;
    assert!(matches!(result, Err(ApiError::ConfigError(_))));
    assert!(fx.registry.list().unwrap().is_empty());
    assert!(fx.gateway.calls().is_empty());

    fx.machine.stop().await;
}
