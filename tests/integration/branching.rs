//! Branch resolution and path loading across forks

use super::test_utils::{loaded_ids, new_conversation, open_store};
use parley::context::ContextStatus;
use parley::message::Message;
use parley::{
    Conversation, ConversationSettings, EngineError, IntegrityError, Role, StorageError, TurnFlag,
    Workflow,
};
use tempfile::TempDir;

#[test]
fn test_fork_loads_only_its_own_path() {
    let test_dir = TempDir::new().unwrap();
    let conversation = new_conversation(&test_dir, Workflow::default());

    let hi = conversation.append(Role::User, "hi", None).unwrap();
    let hello = conversation.append(Role::Assistant, "hello", None).unwrap();
    assert_eq!(loaded_ids(&conversation), vec![hi.id, hello.id]);

    // Fork after message 1: the branch replaces message 2.
    conversation.branch_at(hello.id).unwrap();
    let hey = conversation.append(Role::User, "hey", None).unwrap();

    assert_eq!(loaded_ids(&conversation), vec![hi.id, hey.id]);
    assert_eq!((hi.id, hello.id, hey.id), (1, 2, 3));
}

#[test]
fn test_sibling_paths_are_exclusive() {
    let test_dir = TempDir::new().unwrap();
    let conversation = new_conversation(&test_dir, Workflow::default());

    conversation.append(Role::User, "question", None).unwrap();
    let reply = conversation.append(Role::Assistant, "first", None).unwrap();

    let left = conversation.branch_at(reply.id).unwrap();
    let left_reply = conversation.append(Role::Assistant, "second", None).unwrap();
    let left_follow = conversation.append(Role::User, "more", None).unwrap();

    // Back to the original reply, then fork it again.
    conversation.supersede(left.id).unwrap();
    let right = conversation.branch_at(reply.id).unwrap();
    let right_reply = conversation.append(Role::Assistant, "third", None).unwrap();
    assert_eq!(conversation.leaf_id(), right.id);
    let ids = loaded_ids(&conversation);
    assert!(!ids.contains(&left_reply.id));
    assert!(!ids.contains(&left_follow.id));

    conversation.select_branch(left.id).unwrap();
    assert_eq!(conversation.leaf_id(), left.id);
    let ids = loaded_ids(&conversation);
    assert!(ids.contains(&left_follow.id));
    assert!(!ids.contains(&right_reply.id));
    assert!(!ids.contains(&reply.id));

    let branches = conversation.branches();
    assert_eq!(branches.children_at(reply.id), &[left_reply.id, right_reply.id]);
}

#[test]
fn test_superseded_newest_branch_is_skipped() {
    let test_dir = TempDir::new().unwrap();
    let conversation = new_conversation(&test_dir, Workflow::default());

    conversation.append(Role::User, "q", None).unwrap();
    let answer = conversation.append(Role::Assistant, "a1", None).unwrap();
    let first = conversation.branch_at(answer.id).unwrap();
    conversation.append(Role::Assistant, "a2", None).unwrap();
    let second = conversation.branch_at(answer.id);
    // a1 is no longer on the path once the first branch is active.
    assert!(matches!(second, Err(EngineError::MessageNotOnPath(_))));

    conversation.supersede(first.id).unwrap();
    assert_eq!(conversation.leaf_id(), conversation.root_id());
    assert_eq!(
        conversation.last(&[Role::Assistant]).map(|m| m.content),
        Some("a1".to_string())
    );
}

#[test]
fn test_second_instance_sees_same_active_path() {
    let test_dir = TempDir::new().unwrap();
    let store = open_store(&test_dir);
    let first = Conversation::create(store.clone(), Workflow::default(), ConversationSettings::default())
        .unwrap();
    first.append(Role::User, "hi", None).unwrap();
    let reply = first.append(Role::Assistant, "hello", None).unwrap();
    let branch = first.branch_at(reply.id).unwrap();
    first.append(Role::Assistant, "hey", None).unwrap();

    let second = Conversation::open(
        store,
        first.root_id(),
        Workflow::default(),
        ConversationSettings::default(),
    )
    .unwrap();
    assert_eq!(second.leaf_id(), branch.id);
    assert_eq!(loaded_ids(&second), loaded_ids(&first));
}

#[test]
fn test_unknown_root_loads_empty() {
    let test_dir = TempDir::new().unwrap();
    let conversation = Conversation::open(
        open_store(&test_dir),
        42,
        Workflow::default(),
        ConversationSettings::default(),
    )
    .unwrap();

    assert_eq!(conversation.leaf_id(), 42);
    assert!(conversation.loaded_messages().is_empty());
    assert!(matches!(
        conversation.append(Role::User, "hi", None),
        Err(EngineError::Storage(StorageError::ContextNotFound(42)))
    ));
}

#[test]
fn test_orphaned_branch_point_is_an_integrity_error() {
    let test_dir = TempDir::new().unwrap();
    let store = open_store(&test_dir);
    let root = store.create_context(None, None).unwrap();
    let stranger = store.create_context(None, None).unwrap();
    store
        .insert_message(&Message::new(1, stranger.id, None, Role::User, "elsewhere", TurnFlag::Even))
        .unwrap();
    store.create_context(Some(root.id), Some(1)).unwrap();

    let result = Conversation::open(store, root.id, Workflow::default(), ConversationSettings::default());
    let err = result.err().unwrap();
    assert!(err.is_integrity());
    assert!(matches!(
        err,
        EngineError::Integrity(IntegrityError::OrphanedBranchPoint { branch_msg_id: 1, .. })
    ));
}

#[test]
fn test_duplicate_identifier_surfaces_as_integrity_error() {
    let test_dir = TempDir::new().unwrap();
    let store = open_store(&test_dir);
    let root = store.create_context(None, None).unwrap();
    let message = Message::new(7, root.id, None, Role::User, "once", TurnFlag::Even);
    store.insert_message(&message).unwrap();

    let err: EngineError = store.insert_message(&message).unwrap_err().into();
    assert_eq!(
        err.to_string(),
        "Integrity violation: Duplicate message identifier: 7"
    );
}

#[test]
fn test_select_branch_reactivates_superseded_context() {
    let test_dir = TempDir::new().unwrap();
    let store = open_store(&test_dir);
    let conversation =
        Conversation::create(store.clone(), Workflow::default(), ConversationSettings::default())
            .unwrap();
    conversation.append(Role::User, "q", None).unwrap();
    let a = conversation.append(Role::Assistant, "a", None).unwrap();
    let branch = conversation.branch_at(a.id).unwrap();
    conversation.append(Role::Assistant, "b", None).unwrap();

    conversation.supersede(branch.id).unwrap();
    assert_eq!(
        store.get_context(branch.id).unwrap().unwrap().status,
        ContextStatus::Superseded
    );

    conversation.select_branch(branch.id).unwrap();
    assert_eq!(
        store.get_context(branch.id).unwrap().unwrap().status,
        ContextStatus::Active
    );
    assert_eq!(conversation.leaf_id(), branch.id);
}
