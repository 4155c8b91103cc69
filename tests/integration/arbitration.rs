//! Duty arbitration against live presence answers.

use crate::integration::support::{identity, RecordingGateway, AGENT_A_ID, AGENT_B_ID, CHAT};
use duet::agent::AgentLabel;
use duet::arbiter::{Basis, DutyArbiter, DutyPolicy};
use duet::gateway::{MembershipStatus, MessagingGateway};
use duet::presence::PresenceOracle;
use proptest::prelude::*;
use std::sync::Arc;

fn arbiter(
    gateway: &Arc<RecordingGateway>,
    label: AgentLabel,
    policy: DutyPolicy,
    seed: u64,
) -> DutyArbiter {
    let port: Arc<dyn MessagingGateway> = gateway.clone();
    DutyArbiter::with_seed(
        identity(label),
        identity(label.partner()),
        PresenceOracle::new(port),
        policy,
        seed,
    )
}

fn both_present(gateway: &RecordingGateway) {
    gateway.set_status(CHAT, AGENT_A_ID, MembershipStatus::Administrator);
    gateway.set_status(CHAT, AGENT_B_ID, MembershipStatus::Administrator);
}

#[tokio::test]
async fn presence_query_errors_fail_open() {
    let gateway = RecordingGateway::new(AGENT_A_ID);
    gateway.fail_membership_queries(true);
    let a = arbiter(&gateway, AgentLabel::A, DutyPolicy::Independent, 1);

    let decision = a.arbitrate(CHAT, 1).await;
    assert!(decision.act);
    assert_eq!(decision.basis, Basis::FailOpen);

    let oracle = PresenceOracle::new(gateway.clone() as Arc<dyn MessagingGateway>);
    assert!(!oracle.is_present(CHAT, AGENT_A_ID).await);
    assert!(oracle.probe(CHAT, AGENT_A_ID).await.is_err());
}

#[tokio::test]
async fn lone_agent_acts_and_absent_agent_defers() {
    let gateway = RecordingGateway::new(AGENT_A_ID);
    gateway.set_status(CHAT, AGENT_A_ID, MembershipStatus::Member);
    gateway.set_status(CHAT, AGENT_B_ID, MembershipStatus::Kicked);

    let a = arbiter(&gateway, AgentLabel::A, DutyPolicy::Independent, 1);
    let b = arbiter(&gateway, AgentLabel::B, DutyPolicy::Independent, 2);

    let for_a = a.arbitrate(CHAT, 1).await;
    assert!(for_a.act);
    assert_eq!(for_a.basis, Basis::SoleAgent);

    let for_b = b.arbitrate(CHAT, 1).await;
    assert!(!for_b.act);
    assert_eq!(for_b.basis, Basis::PartnerOnly);

    // Chat neither agent is in
    assert_eq!(a.arbitrate(-42, 1).await.basis, Basis::NeitherPresent);
    assert!(!a.should_act(-42, 1).await);
}

#[tokio::test]
async fn restricted_non_member_counts_as_absent() {
    let gateway = RecordingGateway::new(AGENT_A_ID);
    gateway.set_status(CHAT, AGENT_A_ID, MembershipStatus::Member);
    gateway.set_status(CHAT, AGENT_B_ID, MembershipStatus::Restricted { is_member: false });

    let a = arbiter(&gateway, AgentLabel::A, DutyPolicy::Independent, 1);
    assert_eq!(a.arbitrate(CHAT, 1).await.basis, Basis::SoleAgent);
}

#[tokio::test]
async fn independent_draws_split_duty_evenly() {
    const EVENTS: i64 = 10_000;
    let gateway = RecordingGateway::new(AGENT_A_ID);
    both_present(&gateway);
    let a = arbiter(&gateway, AgentLabel::A, DutyPolicy::Independent, 11);
    let b = arbiter(&gateway, AgentLabel::B, DutyPolicy::Independent, 29);

    let (mut a_acts, mut b_acts, mut agree) = (0u32, 0u32, 0u32);
    for event in 0..EVENTS {
        let for_a = a.arbitrate(CHAT, event).await;
        let for_b = b.arbitrate(CHAT, event).await;
        assert_eq!(for_a.basis, Basis::CoinFlip);
        a_acts += for_a.act as u32;
        b_acts += for_b.act as u32;
        agree += (for_a.act == for_b.act) as u32;
    }

    let share = |n: u32| n as f64 / EVENTS as f64;
    assert!((0.47..=0.53).contains(&share(a_acts)), "a acted {}", a_acts);
    assert!((0.47..=0.53).contains(&share(b_acts)), "b acted {}", b_acts);
    assert!((0.47..=0.53).contains(&share(agree)), "agreed {}", agree);
}

#[tokio::test]
async fn event_keyed_draws_split_duty_without_overlap() {
    const EVENTS: i64 = 10_000;
    let gateway = RecordingGateway::new(AGENT_A_ID);
    both_present(&gateway);
    let policy = DutyPolicy::EventKeyed { epoch: 0 };
    let a = arbiter(&gateway, AgentLabel::A, policy, 1);
    let b = arbiter(&gateway, AgentLabel::B, policy, 2);

    let mut a_acts = 0u32;
    for event in 0..EVENTS {
        let for_a = a.arbitrate(CHAT, event).await;
        let for_b = b.arbitrate(CHAT, event).await;
        assert_eq!(for_a.basis, Basis::EventKeyed);
        assert_ne!(for_a.act, for_b.act, "event {}", event);
        a_acts += for_a.act as u32;
    }
    let share = a_acts as f64 / EVENTS as f64;
    assert!((0.47..=0.53).contains(&share), "a acted {}", a_acts);
}

proptest! {
    #[test]
    fn event_keyed_agents_pick_exactly_one_actor(
        chat_id in any::<i64>(),
        event_id in any::<i64>(),
        epoch in any::<u64>(),
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let gateway = RecordingGateway::new(AGENT_A_ID);
        gateway.set_status(chat_id, AGENT_A_ID, MembershipStatus::Member);
        gateway.set_status(chat_id, AGENT_B_ID, MembershipStatus::Member);
        let policy = DutyPolicy::EventKeyed { epoch };
        let a = arbiter(&gateway, AgentLabel::A, policy, 1);
        let b = arbiter(&gateway, AgentLabel::B, policy, 2);

        let (a_acts, b_acts) = runtime.block_on(async {
            (a.should_act(chat_id, event_id).await, b.should_act(chat_id, event_id).await)
        });
        prop_assert!(a_acts != b_acts);
    }
}
