//! Sled registry shared between agents and across restarts.

use duet::admission::{
    AdmissionRegistry, ExpiryCheck, PendingAdmission, SledAdmissionRegistry,
};
use duet::agent::AgentLabel;
use duet::types::AdmissionKey;
use std::sync::Arc;
use std::thread;
use tempfile::TempDir;

const CHAT: i64 = -100_200;

fn pending(user_id: i64, deadline_ms: i64, admitted_by: AgentLabel) -> PendingAdmission {
    PendingAdmission {
        chat_id: CHAT,
        user_id,
        deadline_ms,
        admitted_by,
    }
}

#[test]
fn two_handles_on_one_database_see_the_same_entries() {
    let temp_dir = TempDir::new().unwrap();
    let db = sled::open(temp_dir.path().join("registry")).unwrap();
    let for_a = SledAdmissionRegistry::from_db(&db).unwrap();
    let for_b = SledAdmissionRegistry::from_db(&db).unwrap();

    for_a.insert(pending(7, 1_000, AgentLabel::A)).unwrap();
    let seen = for_b.get(&AdmissionKey::new(CHAT, 7)).unwrap().unwrap();
    assert_eq!(seen.admitted_by, AgentLabel::A);

    assert!(for_b.remove(&AdmissionKey::new(CHAT, 7)).unwrap().is_some());
    assert!(for_a.list().unwrap().is_empty());
}

#[test]
fn racing_expiry_checks_remove_each_entry_once() {
    let temp_dir = TempDir::new().unwrap();
    let db = sled::open(temp_dir.path().join("registry")).unwrap();
    let registries: Vec<Arc<SledAdmissionRegistry>> = (0..4)
        .map(|_| Arc::new(SledAdmissionRegistry::from_db(&db).unwrap()))
        .collect();

    let users: Vec<i64> = (1..=200).collect();
    for user in &users {
        registries[0]
            .insert(pending(*user, 1_000, AgentLabel::B))
            .unwrap();
    }

    let handles: Vec<_> = registries
        .iter()
        .map(|registry| {
            let registry = Arc::clone(registry);
            let users = users.clone();
            thread::spawn(move || {
                users
                    .iter()
                    .filter(|user| {
                        matches!(
                            registry
                                .remove_if_due(&AdmissionKey::new(CHAT, **user), 5_000)
                                .unwrap(),
                            ExpiryCheck::Removed(_)
                        )
                    })
                    .count()
            })
        })
        .collect();

    let removed: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
    assert_eq!(removed, users.len());
    assert!(registries[1].list().unwrap().is_empty());
}

#[test]
fn fresh_deadline_wins_over_stale_check() {
    let temp_dir = TempDir::new().unwrap();
    let registry = SledAdmissionRegistry::open(temp_dir.path().join("registry")).unwrap();
    let key = AdmissionKey::new(CHAT, 7);

    registry.insert(pending(7, 1_000, AgentLabel::A)).unwrap();
    // Member re-joins before the first check runs
    registry.insert(pending(7, 9_000, AgentLabel::B)).unwrap();

    match registry.remove_if_due(&key, 2_000).unwrap() {
        ExpiryCheck::NotDue(current) => {
            assert_eq!(current.deadline_ms, 9_000);
            assert_eq!(current.admitted_by, AgentLabel::B);
        }
        other => panic!("expected NotDue, got {:?}", other),
    }
}

#[test]
fn pending_entries_survive_restart_in_key_order() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("nested").join("registry");
    {
        let registry = SledAdmissionRegistry::open(&path).unwrap();
        registry.insert(pending(30, 3_000, AgentLabel::A)).unwrap();
        registry.insert(pending(10, 1_000, AgentLabel::B)).unwrap();
        registry.insert(pending(20, 2_000, AgentLabel::A)).unwrap();
        registry.flush().unwrap();
    }

    let registry = SledAdmissionRegistry::open(&path).unwrap();
    let users: Vec<i64> = registry.list().unwrap().iter().map(|p| p.user_id).collect();
    assert_eq!(users, vec![10, 20, 30]);
}
