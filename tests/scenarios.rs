//! End-to-end scenarios for the tree sync engine on the in-memory store.
//!
//! The fixture tree:
//!
//! ```text
//! C:
//! └── Users
//!     ├── Public
//!     │   ├── Documents   some_note.txt, some_note2.txt, some_note.3.txt
//!     │   └── Pictures    a_photo.jpg
//!     └── Ryan            .bash_history, .bash_profile
//!         ├── Documents   record20220315.docx
//!         └── Pictures
//! ```
//!
//! Run with: `cargo test --test scenarios`

use std::collections::HashSet;
use std::sync::Arc;

use tree_sync::{
    EngineError, EngineState, FileNode, FolderNode, InMemoryNodeStore, Node, NodeId, NodeStore,
    TreeSyncConfig, TreeSyncEngine,
};
use uuid::Uuid;

// =============================================================================
// Fixture
// =============================================================================

struct Tree {
    engine: TreeSyncEngine,
    store: Arc<InMemoryNodeStore>,
    c: NodeId,
    users: NodeId,
    public: NodeId,
    public_docs: NodeId,
    public_pics: NodeId,
    ryan: NodeId,
    ryan_docs: NodeId,
    ryan_pics: NodeId,
    some_note: NodeId,
    some_note2: NodeId,
    some_note_3: NodeId,
    a_photo: NodeId,
    record: NodeId,
    bash_history: NodeId,
    bash_profile: NodeId,
}

/// Background loops effectively off; tests drive polling by hand.
fn manual_config() -> TreeSyncConfig {
    TreeSyncConfig {
        housekeeping_interval_secs: 0,
        change_poll_interval_ms: 3_600_000,
        ..TreeSyncConfig::new("memory")
    }
}

fn folder(name: &str, parent: NodeId) -> FolderNode {
    FolderNode::new(name, parent)
}

fn file(name: &str, parent: NodeId) -> FileNode {
    FileNode::new(name, name.as_bytes().to_vec(), parent)
}

async fn tree() -> Tree {
    let c = FolderNode::root(Uuid::new_v4(), "C:");
    let users = folder("Users", c.id);
    let public = folder("Public", users.id);
    let public_docs = folder("Documents", public.id);
    let public_pics = folder("Pictures", public.id);
    let ryan = folder("Ryan", users.id);
    let ryan_docs = folder("Documents", ryan.id);
    let ryan_pics = folder("Pictures", ryan.id);
    let some_note = file("some_note.txt", public_docs.id);
    let some_note2 = file("some_note2.txt", public_docs.id);
    let some_note_3 = file("some_note.3.txt", public_docs.id);
    let a_photo = file("a_photo.jpg", public_pics.id);
    let record = file("record20220315.docx", ryan_docs.id);
    let bash_history = file(".bash_history", ryan.id);
    let bash_profile = file(".bash_profile", ryan.id);

    let ids = [
        c.id, users.id, public.id, public_docs.id, public_pics.id, ryan.id, ryan_docs.id,
        ryan_pics.id, some_note.id, some_note2.id, some_note_3.id, a_photo.id, record.id,
        bash_history.id, bash_profile.id,
    ];

    let nodes: Vec<Node> = vec![
        c.into(), users.into(), public.into(), public_docs.into(), public_pics.into(),
        ryan.into(), ryan_docs.into(), ryan_pics.into(), some_note.into(), some_note2.into(),
        some_note_3.into(), a_photo.into(), record.into(), bash_history.into(),
        bash_profile.into(),
    ];
    let store = Arc::new(InMemoryNodeStore::with_nodes(nodes));
    let engine = TreeSyncEngine::new(manual_config(), store.clone());
    engine.start().await.unwrap();

    Tree {
        engine,
        store,
        c: ids[0],
        users: ids[1],
        public: ids[2],
        public_docs: ids[3],
        public_pics: ids[4],
        ryan: ids[5],
        ryan_docs: ids[6],
        ryan_pics: ids[7],
        some_note: ids[8],
        some_note2: ids[9],
        some_note_3: ids[10],
        a_photo: ids[11],
        record: ids[12],
        bash_history: ids[13],
        bash_profile: ids[14],
    }
}

fn ids_of(nodes: &[Node]) -> HashSet<NodeId> {
    nodes.iter().map(Node::id).collect()
}

// =============================================================================
// Queries
// =============================================================================

#[tokio::test]
async fn test_startup_loads_whole_tree() {
    let t = tree().await;
    assert_eq!(t.engine.state(), EngineState::Running);
    assert_eq!(t.engine.node_count(), 15);
    assert_eq!(t.engine.root_id(), Some(t.c));
}

#[tokio::test]
async fn test_ancestor_walk_terminates_for_every_node() {
    let t = tree().await;
    for id in t.store.children_of(&t.users).into_iter().chain([t.c, t.users, t.record, t.bash_profile]) {
        let path = t.engine.full_path(id).await.unwrap();
        assert!(path.starts_with("C:"), "{path}");
        assert!(path.split('\\').count() <= 5, "{path}");
    }
    assert_eq!(t.engine.full_path(t.c).await.unwrap(), "C:");
}

#[tokio::test]
async fn test_full_path_joins_full_names() {
    let t = tree().await;
    assert_eq!(
        t.engine.full_path(t.record).await.unwrap(),
        r"C:\Users\Ryan\Documents\record20220315.docx"
    );
    assert_eq!(t.engine.full_path(t.bash_history).await.unwrap(), r"C:\Users\Ryan\.bash_history");
    assert!(matches!(
        t.engine.full_path(Uuid::new_v4()).await,
        Err(EngineError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_full_path_under_unnamed_root() {
    let root = FolderNode::root(Uuid::new_v4(), "");
    let users = folder("Users", root.id);
    let ryan = folder("Ryan", users.id);
    let record = file("record.docx", ryan.id);
    let record_id = record.id;
    let store = InMemoryNodeStore::with_nodes([root.into(), users.into(), ryan.into(), record.into()]);
    let engine = TreeSyncEngine::new(manual_config(), Arc::new(store));
    engine.start().await.unwrap();

    assert_eq!(engine.full_path(record_id).await.unwrap(), r"Users\Ryan\record.docx");
}

#[tokio::test]
async fn test_list_children_folders_first() {
    let t = tree().await;
    let names: Vec<String> = t
        .engine
        .list_children(t.ryan)
        .await
        .unwrap()
        .iter()
        .map(Node::full_name)
        .collect();
    assert_eq!(names, vec!["Documents", "Pictures", ".bash_history", ".bash_profile"]);

    let folders = t.engine.list_subfolders(t.ryan).await.unwrap();
    assert_eq!(folders.len(), 2);
    let files = t.engine.list_files(t.ryan).await.unwrap();
    assert_eq!(files.iter().map(|f| f.id).collect::<HashSet<_>>(), HashSet::from([t.bash_history, t.bash_profile]));
}

#[tokio::test]
async fn test_listing_a_file_or_unknown_id_is_not_a_folder() {
    let t = tree().await;
    let err = t.engine.list_children(t.record).await.unwrap_err();
    assert!(err.is_type_mismatch());
    assert!(matches!(
        t.engine.list_files(Uuid::new_v4()).await,
        Err(EngineError::NotAFolder(_))
    ));
}

#[tokio::test]
async fn test_search_files_from_root() {
    let t = tree().await;
    let found = t
        .engine
        .search_files(t.c, |f| f.full_name().contains('3'))
        .await
        .unwrap();
    let ids: HashSet<NodeId> = found.iter().map(|f| f.id).collect();
    assert_eq!(ids, HashSet::from([t.some_note_3, t.record]));
}

#[tokio::test]
async fn test_search_files_from_subfolder() {
    let t = tree().await;
    let found = t
        .engine
        .search_files(t.ryan, |f| f.full_name().contains('3'))
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, t.record);

    assert!(t.engine.search_files(t.record, |_| true).await.unwrap_err().is_type_mismatch());
}

// =============================================================================
// Creation
// =============================================================================

#[tokio::test]
async fn test_add_file_round_trip() {
    let t = tree().await;
    let id = t
        .engine
        .add_file("note.txt", b"hello".to_vec(), t.ryan_pics)
        .await
        .unwrap();

    let Some(Node::File(created)) = t.engine.get_node(id).await.unwrap() else {
        panic!("expected a file");
    };
    assert_eq!(created.name, "note");
    assert_eq!(created.extension, ".txt");
    assert_eq!(created.parent_id, t.ryan_pics);
    assert_eq!(created.content, b"hello");

    assert!(t.store.contains(&id));
    let listed = t.engine.list_files(t.ryan_pics).await.unwrap();
    assert_eq!(listed.len(), 1);
}

#[tokio::test]
async fn test_add_subfolder_visible_in_parent() {
    let t = tree().await;
    // Prime the children memo so the insert has to invalidate it
    assert_eq!(t.engine.list_children(t.users).await.unwrap().len(), 2);

    let id = t.engine.add_subfolder("Guest", t.users).await.unwrap();
    let children = t.engine.list_children(t.users).await.unwrap();
    assert!(ids_of(&children).contains(&id));
    assert_eq!(t.engine.full_path(id).await.unwrap(), r"C:\Users\Guest");
}

#[tokio::test]
async fn test_add_rejects_sibling_name_collisions() {
    let t = tree().await;
    assert!(matches!(
        t.engine.add_subfolder("Ryan", t.users).await,
        Err(EngineError::NameCollision { .. })
    ));
    // Collision is on the name without extension
    assert!(matches!(
        t.engine.add_file("some_note.md", vec![], t.public_docs).await,
        Err(EngineError::NameCollision { .. })
    ));
    assert_eq!(t.engine.node_count(), 15);
}

#[tokio::test]
async fn test_add_rejects_bad_names_and_parents() {
    let t = tree().await;
    assert!(matches!(t.engine.add_subfolder("", t.users).await, Err(EngineError::InvalidName(_))));
    assert!(matches!(t.engine.add_subfolder(r"a\b", t.users).await, Err(EngineError::InvalidName(_))));
    assert!(matches!(t.engine.add_file("x/y.txt", vec![], t.users).await, Err(EngineError::InvalidName(_))));
    assert!(matches!(t.engine.add_file("", vec![], t.users).await, Err(EngineError::InvalidName(_))));
    assert!(matches!(
        t.engine.add_file("x.txt", vec![], t.record).await,
        Err(EngineError::NotAFolder(_))
    ));
}

// =============================================================================
// Moves
// =============================================================================

#[tokio::test]
async fn test_move_file() {
    let t = tree().await;
    t.engine.move_node(t.some_note2, t.ryan_pics).await.unwrap();

    let moved = t.engine.get_node(t.some_note2).await.unwrap().unwrap();
    assert_eq!(moved.parent_id(), t.ryan_pics);
    assert_eq!(t.store.get(&t.some_note2).unwrap().parent_id(), t.ryan_pics);
    assert_eq!(t.engine.list_files(t.public_docs).await.unwrap().len(), 2);
    assert_eq!(t.engine.list_files(t.ryan_pics).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_move_folder_rewrites_descendant_paths() {
    let t = tree().await;
    // Warm the path memos first
    t.engine.full_path(t.record).await.unwrap();

    t.engine.move_node(t.ryan, t.public_docs).await.unwrap();

    assert_eq!(t.engine.get_node(t.ryan).await.unwrap().unwrap().parent_id(), t.public_docs);
    assert_eq!(t.store.get(&t.ryan).unwrap().parent_id(), t.public_docs);
    assert_eq!(
        t.engine.full_path(t.record).await.unwrap(),
        r"C:\Users\Public\Documents\Ryan\Documents\record20220315.docx"
    );
    assert_eq!(ids_of(&t.engine.list_children(t.users).await.unwrap()), HashSet::from([t.public]));
}

#[tokio::test]
async fn test_move_into_current_parent_is_already_in_folder() {
    let t = tree().await;
    let version_before = t.store.change_baseline_version().await.unwrap();

    let err = t.engine.move_node(t.record, t.ryan_docs).await.unwrap_err();
    assert!(matches!(err, EngineError::AlreadyInFolder { .. }));

    assert_eq!(t.engine.get_node(t.record).await.unwrap().unwrap().parent_id(), t.ryan_docs);
    assert_eq!(t.store.change_baseline_version().await.unwrap(), version_before);
}

#[tokio::test]
async fn test_move_rejections() {
    let t = tree().await;
    assert!(matches!(
        t.engine.move_node(t.ryan_docs, t.public).await,
        Err(EngineError::NameCollision { .. })
    ));
    assert!(matches!(
        t.engine.move_node(t.users, t.ryan_pics).await,
        Err(EngineError::MoveIntoDescendant { .. })
    ));
    assert!(matches!(t.engine.move_node(t.c, t.users).await, Err(EngineError::RootNode(_))));
    assert!(matches!(
        t.engine.move_node(t.record, t.a_photo).await,
        Err(EngineError::NotAFolder(_))
    ));
    assert!(matches!(
        t.engine.move_node(Uuid::new_v4(), t.users).await,
        Err(EngineError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_store_refused_move_is_silent() {
    let t = tree().await;
    // Another writer puts a same-named folder into the target; the mirror
    // has not polled it yet, so only the store sees the collision.
    t.store.upsert_node(folder("Documents", t.ryan_pics).into());

    t.engine.move_node(t.public_docs, t.ryan_pics).await.unwrap();

    assert_eq!(t.engine.get_node(t.public_docs).await.unwrap().unwrap().parent_id(), t.public);
    assert_eq!(t.store.get(&t.public_docs).unwrap().parent_id(), t.public);
}

// =============================================================================
// Deletes
// =============================================================================

#[tokio::test]
async fn test_cascade_delete() {
    let t = tree().await;
    let f = t.engine.add_subfolder("F", t.ryan_pics).await.unwrap();
    let a = t.engine.add_subfolder("A", f).await.unwrap();
    let b = t.engine.add_subfolder("B", f).await.unwrap();
    let file1 = t.engine.add_file("file1.bin", vec![1], a).await.unwrap();

    t.engine.delete_folder(f).await.unwrap();

    for id in [f, a, b, file1] {
        assert!(t.engine.get_node(id).await.unwrap().is_none());
        assert!(!t.store.contains(&id));
    }
    assert!(t.engine.list_children(t.ryan_pics).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_delete_users_public() {
    let t = tree().await;
    t.engine.delete_folder(t.public).await.unwrap();

    assert!(t.engine.get_node(t.public).await.unwrap().is_none());
    assert_eq!(ids_of(&t.engine.list_children(t.users).await.unwrap()), HashSet::from([t.ryan]));

    for id in [t.public_docs, t.public_pics, t.some_note, t.some_note2, t.some_note_3, t.a_photo] {
        assert!(t.engine.get_node(id).await.unwrap().is_none());
        assert!(!t.store.contains(&id));
    }
    for id in [t.record, t.bash_history, t.bash_profile] {
        assert!(t.store.contains(&id));
    }
}

#[tokio::test]
async fn test_delete_file() {
    let t = tree().await;
    t.engine.delete_file(t.a_photo).await.unwrap();

    assert!(t.engine.get_node(t.a_photo).await.unwrap().is_none());
    assert!(!t.store.contains(&t.a_photo));
    assert!(t.engine.list_children(t.public_pics).await.unwrap().is_empty());
    assert!(t.store.children_of(&t.public_pics).is_empty());
}

#[tokio::test]
async fn test_delete_variant_rules() {
    let t = tree().await;
    // Unknown ids are silently ignored
    t.engine.delete_folder(Uuid::new_v4()).await.unwrap();
    t.engine.delete_file(Uuid::new_v4()).await.unwrap();
    // delete_folder on a file is ignored too
    t.engine.delete_folder(t.record).await.unwrap();
    assert!(t.engine.get_node(t.record).await.unwrap().is_some());

    // delete_file on a folder is an error and leaves the folder in place
    let err = t.engine.delete_file(t.ryan_pics).await.unwrap_err();
    assert!(matches!(err, EngineError::NotAFile(_)));
    assert!(t.engine.get_node(t.ryan_pics).await.unwrap().is_some());
    assert_eq!(t.engine.list_subfolders(t.ryan).await.unwrap().len(), 2);

    assert!(matches!(t.engine.delete_folder(t.c).await, Err(EngineError::RootNode(_))));
    assert_eq!(t.engine.node_count(), 15);
}

// =============================================================================
// Convergence with external writers
// =============================================================================

#[tokio::test]
async fn test_poll_picks_up_external_insert_update_delete() {
    let t = tree().await;
    assert_eq!(t.engine.list_children(t.ryan_pics).await.unwrap().len(), 0);

    let external = file("holiday.png", t.ryan_pics);
    let external_id = external.id;
    t.store.upsert_node(external.into());
    t.store.set_parent(t.some_note, t.ryan_docs);
    t.store.remove_node(t.a_photo);

    let applied = t.engine.poll_changes_once().await.unwrap();
    assert_eq!(applied, 3);
    assert_eq!(t.engine.change_version(), t.store.change_baseline_version().await.unwrap());

    assert_eq!(
        t.engine.get_node(external_id).await.unwrap(),
        t.store.get(&external_id)
    );
    assert_eq!(t.engine.list_children(t.ryan_pics).await.unwrap().len(), 1);
    assert_eq!(
        t.engine.full_path(t.some_note).await.unwrap(),
        r"C:\Users\Ryan\Documents\some_note.txt"
    );
    assert!(t.engine.get_node(t.a_photo).await.unwrap().is_none());
    assert!(t.engine.list_children(t.public_pics).await.unwrap().is_empty());

    // Nothing new: nothing applied, watermark unchanged
    let version = t.engine.change_version();
    assert_eq!(t.engine.poll_changes_once().await.unwrap(), 0);
    assert_eq!(t.engine.change_version(), version);
}

#[tokio::test]
async fn test_own_writes_replayed_by_poll_are_harmless() {
    let t = tree().await;
    let id = t.engine.add_subfolder("Guest", t.users).await.unwrap();
    t.engine.move_node(t.some_note, t.ryan_pics).await.unwrap();

    t.engine.poll_changes_once().await.unwrap();

    assert_eq!(t.engine.node_count(), 16);
    assert!(t.engine.get_node(id).await.unwrap().is_some());
    assert_eq!(t.engine.list_files(t.ryan_pics).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_housekeeping_reaps_deep_orphans() {
    let t = tree().await;
    // Two levels the mirror has not seen yet
    let x = folder("X", t.public_docs);
    let y = folder("Y", x.id);
    let y_id = y.id;
    t.store.upsert_node(x.into());
    t.store.upsert_node(y.into());

    t.engine.delete_folder(t.public).await.unwrap();
    assert!(t.store.contains(&y_id));

    let stats = t.engine.housekeeping_once().await.unwrap();
    assert_eq!(stats.orphaned_nodes, 1);
    assert!(!t.store.contains(&y_id));

    t.engine.poll_changes_once().await.unwrap();
    assert!(t.engine.get_node(y_id).await.unwrap().is_none());
}

// =============================================================================
// Lifecycle
// =============================================================================

#[tokio::test]
async fn test_operations_wait_for_startup() {
    let root = FolderNode::root(Uuid::new_v4(), "C:");
    let root_id = root.id;
    let store = InMemoryNodeStore::with_nodes([root.into()]);
    let engine = Arc::new(TreeSyncEngine::new(manual_config(), Arc::new(store)));

    let waiter = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.get_node(root_id).await })
    };
    tokio::task::yield_now().await;
    assert!(!waiter.is_finished());

    engine.start().await.unwrap();
    let node = waiter.await.unwrap().unwrap();
    assert!(node.unwrap().is_root());
}

#[tokio::test]
async fn test_start_twice_and_use_after_shutdown() {
    let t = tree().await;
    assert!(matches!(
        t.engine.start().await,
        Err(EngineError::InvalidState(EngineState::Running))
    ));

    t.engine.shutdown().await;
    assert_eq!(t.engine.state(), EngineState::Stopped);
    assert!(matches!(
        t.engine.get_node(t.c).await,
        Err(EngineError::Unavailable(EngineState::Stopped))
    ));
    // Second shutdown is a no-op
    t.engine.shutdown().await;
}
