//! Concurrent appenders and readers

use super::test_utils::{new_conversation, open_store};
use parley::query::ContextRequest;
use parley::{Conversation, ConversationSettings, Participant, Role, Workflow};
use std::collections::HashSet;
use std::sync::Arc;
use std::thread;
use tempfile::TempDir;

fn workers(count: u64) -> Workflow {
    Workflow::new((1..=count).map(|id| Participant::agent(id, format!("worker-{}", id))).collect())
        .unwrap()
}

#[test]
fn test_parallel_appends_get_unique_increasing_ids() {
    let test_dir = TempDir::new().unwrap();
    let conversation = Arc::new(new_conversation(&test_dir, workers(4)));

    let handles: Vec<_> = (1..=4u64)
        .map(|participant| {
            let conversation = conversation.clone();
            thread::spawn(move || {
                let mut ids = Vec::new();
                for n in 0..25 {
                    let message = conversation
                        .append(Role::Assistant, format!("{}-{}", participant, n), Some(participant))
                        .unwrap();
                    // The appender's own message is visible once append returns.
                    assert!(conversation
                        .loaded_messages()
                        .iter()
                        .any(|m| m.id == message.id));
                    ids.push(message.id);
                }
                ids
            })
        })
        .collect();

    let mut all = HashSet::new();
    for handle in handles {
        let ids = handle.join().unwrap();
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
        for id in ids {
            assert!(all.insert(id), "duplicate id {}", id);
        }
    }

    let loaded = conversation.loaded_messages();
    assert_eq!(loaded.len(), 100);
    assert!(loaded.windows(2).all(|w| w[0].id < w[1].id));
}

#[test]
fn test_readers_run_alongside_appenders() {
    let test_dir = TempDir::new().unwrap();
    let conversation = Arc::new(new_conversation(&test_dir, workers(1)));

    let writer = {
        let conversation = conversation.clone();
        thread::spawn(move || {
            for n in 0..50 {
                let role = if n % 2 == 0 { Role::User } else { Role::Assistant };
                let participant = (n % 2 == 1).then_some(1);
                conversation.append(role, format!("m{}", n), participant).unwrap();
            }
        })
    };

    let reader = {
        let conversation = conversation.clone();
        thread::spawn(move || {
            let mut last_len = 0;
            for _ in 0..200 {
                let window = conversation.messages(&ContextRequest::default());
                assert!(window.len() >= last_len);
                assert!(window.windows(2).all(|w| w[0].id < w[1].id));
                last_len = window.len();
            }
        })
    };

    writer.join().unwrap();
    reader.join().unwrap();
    assert_eq!(conversation.count(&[Role::User, Role::Assistant]), 50);
}

#[test]
fn test_instances_sharing_a_store_never_collide() {
    let test_dir = TempDir::new().unwrap();
    let store = open_store(&test_dir);
    let first = Arc::new(
        Conversation::create(store.clone(), workers(2), ConversationSettings::default()).unwrap(),
    );
    let second = Arc::new(
        Conversation::open(
            store,
            first.root_id(),
            workers(2),
            ConversationSettings {
                block_size: 3,
                ..ConversationSettings::default()
            },
        )
        .unwrap(),
    );

    let handles: Vec<_> = [(first.clone(), 1u64), (second.clone(), 2u64)]
        .into_iter()
        .map(|(conversation, participant)| {
            thread::spawn(move || {
                (0..20)
                    .map(|n| {
                        conversation
                            .append(Role::Assistant, format!("{}", n), Some(participant))
                            .unwrap()
                            .id
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut all = HashSet::new();
    for handle in handles {
        for id in handle.join().unwrap() {
            assert!(all.insert(id));
        }
    }

    first.reload().unwrap();
    second.reload().unwrap();
    assert_eq!(first.loaded_messages().len(), 40);
    assert_eq!(first.loaded_messages(), second.loaded_messages());
}

#[test]
fn test_instances_sharing_a_store_keep_creation_order() {
    let test_dir = TempDir::new().unwrap();
    let store = open_store(&test_dir);
    let first =
        Conversation::create(store.clone(), Workflow::default(), ConversationSettings::default())
            .unwrap();
    let second = Conversation::open(
        store,
        first.root_id(),
        Workflow::default(),
        ConversationSettings::default(),
    )
    .unwrap();

    let opening = first.append(Role::User, "first", None).unwrap();
    let reply = second.append(Role::Assistant, "second", None).unwrap();
    let follow_up = first.append(Role::User, "third", None).unwrap();
    assert!(opening.id < reply.id);
    assert!(reply.id < follow_up.id);

    // Fork at the reply from one instance while the other keeps writing to the root.
    second.reload().unwrap();
    let fork = second.branch_at(reply.id).unwrap();
    let late = first.append(Role::User, "written after fork", None).unwrap();
    assert!(late.id > follow_up.id);
    second.append(Role::Assistant, "alt", None).unwrap();

    assert_eq!(second.leaf_id(), fork.id);
    let contents: Vec<String> = second
        .loaded_messages()
        .into_iter()
        .map(|m| m.content)
        .collect();
    assert_eq!(contents, vec!["first".to_string(), "alt".to_string()]);
}

#[test]
fn test_explicit_reload_never_hides_an_append() {
    let test_dir = TempDir::new().unwrap();
    let conversation = Arc::new(new_conversation(&test_dir, Workflow::default()));

    let reloader = {
        let conversation = conversation.clone();
        thread::spawn(move || {
            for _ in 0..200 {
                conversation.reload().unwrap();
                conversation.refresh().unwrap();
            }
        })
    };

    for n in 0..50 {
        let message = conversation
            .append(Role::User, format!("m{}", n), None)
            .unwrap();
        assert!(conversation
            .loaded_messages()
            .iter()
            .any(|m| m.id == message.id));
    }
    reloader.join().unwrap();
    assert_eq!(conversation.loaded_messages().len(), 50);
}
