//! Property-based tests for determinism guarantees

use parley::allocator::IdAllocator;
use parley::query::{assemble, AssemblySettings, ContextRequest};
use parley::store::{ConversationStore, SledConversationStore};
use parley::turns::TurnTracker;
use parley::{Conversation, ConversationSettings, Message, Role, TurnFlag, Workflow};
use proptest::prelude::*;
use proptest::test_runner::{Config, TestRunner};
use std::sync::Arc;
use tempfile::TempDir;

/// (producer, is_user, odd flag) triples turned into an ordered history.
fn history(rows: &[(Option<u64>, bool, bool)]) -> Vec<Message> {
    rows.iter()
        .enumerate()
        .map(|(index, (producer, is_user, odd))| {
            let role = if *is_user { Role::User } else { Role::Assistant };
            let flag = if *odd { TurnFlag::Odd } else { TurnFlag::Even };
            Message::new(index as u64 + 1, 1, *producer, role, format!("m{}", index), flag)
        })
        .collect()
}

fn rows() -> impl Strategy<Value = Vec<(Option<u64>, bool, bool)>> {
    prop::collection::vec(
        (prop::option::of(1u64..5), any::<bool>(), any::<bool>()),
        0..40,
    )
}

/// Replaying a history in one call matches observing it message by message,
/// and replaying a prefix then observing the rest.
#[test]
fn test_turn_replay_matches_incremental_observation() {
    let mut runner = TestRunner::default();

    runner
        .run(&(rows(), any::<prop::sample::Index>()), |(rows, split)| {
            let messages = history(&rows);

            let mut bulk = TurnTracker::new([1, 2, 3]);
            bulk.replay(&messages);

            let mut stepped = TurnTracker::new([1, 2, 3]);
            for message in &messages {
                stepped.observe(message);
            }
            prop_assert_eq!(&bulk, &stepped);

            let cut = if messages.is_empty() { 0 } else { split.index(messages.len()) };
            let mut resumed = TurnTracker::new([1, 2, 3]);
            resumed.replay(&messages[..cut]);
            for message in &messages[cut..] {
                resumed.observe(message);
            }
            prop_assert_eq!(&bulk, &resumed);

            Ok(())
        })
        .unwrap();
}

/// Allocated identifiers strictly ascend whatever the block size, including
/// across a buffer reset.
#[test]
fn test_allocator_ids_ascend() {
    let mut runner = TestRunner::new(Config {
        cases: 32,
        ..Config::default()
    });

    runner
        .run(&(0u64..8, 1usize..60, 0usize..60), |(block_size, count, reset_at)| {
            let test_dir = TempDir::new().unwrap();
            let store: Arc<dyn ConversationStore> =
                Arc::new(SledConversationStore::new(test_dir.path().join("store")).unwrap());
            let allocator = IdAllocator::new(store, block_size);

            let mut previous = 0;
            for n in 0..count {
                if n == reset_at {
                    allocator.reset();
                }
                let id = allocator.next_id().unwrap();
                prop_assert!(id > previous);
                previous = id;
            }

            Ok(())
        })
        .unwrap();
}

/// A message-limited window is the tail of the unlimited one, and repeated
/// assembly returns the same window.
#[test]
fn test_message_limit_keeps_the_newest_suffix() {
    let mut runner = TestRunner::default();
    let workflow = Workflow::default();
    let settings = AssemblySettings::default();

    runner
        .run(&(rows(), 0usize..10), |(rows, limit)| {
            let messages = history(&rows);
            let full = assemble(&messages, &workflow, &settings, &ContextRequest::default());
            let limited_request = ContextRequest::builder().message_limit(limit).build();
            let limited = assemble(&messages, &workflow, &settings, &limited_request);
            let again = assemble(&messages, &workflow, &settings, &limited_request);
            prop_assert_eq!(&limited, &again);

            let full = full.into_internal().unwrap();
            let limited = limited.into_internal().unwrap();
            // Zero reads as no limit.
            let expected = if limit == 0 || full.len() <= limit {
                full.len()
            } else {
                limit
            };
            prop_assert_eq!(limited.len(), expected);
            prop_assert_eq!(&limited[..], &full[full.len() - expected..]);

            Ok(())
        })
        .unwrap();
}

/// Turn-limited windows never shrink as the limit grows.
#[test]
fn test_turn_limit_is_monotonic() {
    let mut runner = TestRunner::default();
    let workflow = Workflow::default();
    let settings = AssemblySettings::default();

    runner
        .run(&(rows(), 1usize..6), |(rows, turns)| {
            let messages = history(&rows);
            let narrow = ContextRequest::builder().turn_limit(turns).build();
            let wide = ContextRequest::builder().turn_limit(turns + 1).build();
            let narrow = assemble(&messages, &workflow, &settings, &narrow);
            let wide = assemble(&messages, &workflow, &settings, &wide);
            prop_assert!(narrow.len() <= wide.len());

            Ok(())
        })
        .unwrap();
}

/// Branching at a visible message keeps exactly the history before it, and
/// a second instance over the same store resolves the same path.
#[test]
fn test_branching_keeps_only_prior_history() {
    let mut runner = TestRunner::new(Config {
        cases: 24,
        ..Config::default()
    });

    runner
        .run(
            &prop::collection::vec((0u8..3, any::<prop::sample::Index>()), 1..20),
            |ops| {
                let test_dir = TempDir::new().unwrap();
                let store: Arc<dyn ConversationStore> =
                    Arc::new(SledConversationStore::new(test_dir.path().join("store")).unwrap());
                let conversation = Conversation::create(
                    store.clone(),
                    Workflow::default(),
                    ConversationSettings::default(),
                )
                .unwrap();

                for (op, index) in ops {
                    let before: Vec<u64> =
                        conversation.loaded_messages().iter().map(|m| m.id).collect();
                    if op == 2 && !before.is_empty() {
                        let at = before[index.index(before.len())];
                        conversation.branch_at(at).unwrap();
                        let after: Vec<u64> =
                            conversation.loaded_messages().iter().map(|m| m.id).collect();
                        let expected: Vec<u64> =
                            before.iter().copied().filter(|id| *id < at).collect();
                        prop_assert_eq!(after, expected);
                    } else {
                        conversation.append(Role::User, "turn", None).unwrap();
                    }
                }

                let ids: Vec<u64> = conversation.loaded_messages().iter().map(|m| m.id).collect();
                prop_assert!(ids.windows(2).all(|w| w[0] < w[1]));

                let second = Conversation::open(
                    store,
                    conversation.root_id(),
                    Workflow::default(),
                    ConversationSettings::default(),
                )
                .unwrap();
                let reopened: Vec<u64> = second.loaded_messages().iter().map(|m| m.id).collect();
                prop_assert_eq!(ids, reopened);
                prop_assert_eq!(second.leaf_id(), conversation.leaf_id());

                Ok(())
            },
        )
        .unwrap();
}
