//! Rollback engine tests: the three restore strategies, reverse
//! correctness per operation type, the checkpoint guarantee and failure
//! side-effect freedom.
//!
//! Run with: `cargo test --test rollback_tests`

use std::collections::BTreeMap;
use std::fs;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use canvas_rewind::canvas::{CanvasDocument, Edge, Node};
use canvas_rewind::document_store::DocumentStore;
use canvas_rewind::operation_log::{Operation, OperationKind, OperationLog};
use canvas_rewind::rollback::{
    GraphSyncStatus, RollbackDefaults, RollbackEngine, RollbackRequest, RollbackType,
};
use canvas_rewind::snapshot_store::{CreateSnapshot, SnapshotStore, SnapshotType};

struct Harness {
    docs: Arc<DocumentStore>,
    log: Arc<OperationLog>,
    snaps: Arc<SnapshotStore>,
    engine: RollbackEngine,
    _dir: TempDir,
}

impl Harness {
    fn new() -> Self {
        let dir = TempDir::new().expect("create temp dir");
        let docs = Arc::new(DocumentStore::new(dir.path()).expect("document store"));
        let log = Arc::new(OperationLog::new(dir.path(), 100).expect("operation log"));
        let snaps = Arc::new(
            SnapshotStore::new(dir.path(), docs.clone(), 50, Duration::from_secs(300))
                .expect("snapshot store"),
        );
        let engine = RollbackEngine::new(
            docs.clone(),
            log.clone(),
            snaps.clone(),
            RollbackDefaults::default(),
        );
        Self {
            docs,
            log,
            snaps,
            engine,
            _dir: dir,
        }
    }

    fn operation_request(&self, canvas: &str, target_id: Option<&str>) -> RollbackRequest {
        RollbackRequest {
            canvas_path: canvas.to_string(),
            rollback_type: RollbackType::Operation,
            target_id: target_id.map(String::from),
            target_time: None,
            create_backup: None,
            preserve_graph: None,
        }
    }
}

fn two_node_doc() -> CanvasDocument {
    CanvasDocument {
        nodes: vec![Node::text_node("n1", "alpha"), Node::text_node("n2", "beta")],
        edges: vec![Edge::connecting("e1", "n1", "n2")],
    }
}

/// `mutate -> record -> rollback(OPERATION)` must restore the canvas to
/// structural equality with its pre-mutation state, for every type.
#[test]
fn test_reverse_correctness_for_every_operation_type() {
    type Mutation = (OperationKind, fn(&mut CanvasDocument));

    let cases: Vec<Mutation> = vec![
        (
            OperationKind::NodeAdd {
                node_ids: vec!["n3".to_string()],
                after: vec![Node::text_node("n3", "new")],
            },
            |doc| doc.nodes.push(Node::text_node("n3", "new")),
        ),
        (
            OperationKind::NodeDelete {
                before: vec![Node::text_node("n2", "beta")],
            },
            |doc| {
                doc.remove_node("n2");
            },
        ),
        (
            OperationKind::NodeModify {
                before: vec![Node::text_node("n1", "alpha")],
                after: vec![Node::text_node("n1", "edited")],
            },
            |doc| doc.node_mut("n1").unwrap().text = Some("edited".to_string()),
        ),
        (
            OperationKind::EdgeAdd {
                edge_ids: vec!["e2".to_string()],
                after: vec![Edge::connecting("e2", "n2", "n1")],
            },
            |doc| doc.edges.push(Edge::connecting("e2", "n2", "n1")),
        ),
        (
            OperationKind::EdgeDelete {
                before: vec![Edge::connecting("e1", "n1", "n2")],
            },
            |doc| {
                doc.remove_edge("e1");
            },
        ),
        (
            OperationKind::BatchOperation {
                before: two_node_doc(),
                after: None,
            },
            |doc| {
                doc.nodes.clear();
                doc.edges.clear();
            },
        ),
    ];

    for (kind, mutate) in cases {
        let h = Harness::new();
        let canvas = "board.canvas";
        let type_name = kind.type_name();

        let pristine = two_node_doc();
        h.docs.write(canvas, &pristine).unwrap();

        let mut mutated = pristine.clone();
        mutate(&mut mutated);
        h.docs.write(canvas, &mutated).unwrap();

        let op = Operation::new(canvas, "tester", kind);
        let op_id = op.id.clone();
        h.log.record(op).unwrap();

        let result = h.engine.rollback(h.operation_request(canvas, Some(&op_id)));
        assert!(result.success, "{type_name}: {:?}", result.error);
        assert_eq!(result.restored_operation_id.as_deref(), Some(op_id.as_str()));

        let restored = h.docs.read(canvas).unwrap();
        assert_eq!(restored, pristine, "{type_name} did not restore pre-mutation state");
    }
}

#[test]
fn test_color_change_rollback_scenario() {
    let h = Harness::new();
    let canvas = "board.canvas";

    let mut node = Node::text_node("n1", "tinted");
    node.color = Some("1".to_string());
    h.docs
        .write(canvas, &CanvasDocument { nodes: vec![node], edges: vec![] })
        .unwrap();

    // Recolor "1" -> "2", recording the operation.
    let mut doc = h.docs.read(canvas).unwrap();
    doc.node_mut("n1").unwrap().color = Some("2".to_string());
    h.docs.write(canvas, &doc).unwrap();

    let mut before = BTreeMap::new();
    before.insert("n1".to_string(), Some("1".to_string()));
    let mut after = BTreeMap::new();
    after.insert("n1".to_string(), Some("2".to_string()));
    let op = Operation::new(
        canvas,
        "tester",
        OperationKind::NodeColorChange {
            node_ids: vec!["n1".to_string()],
            before,
            after,
        },
    );
    h.log.record(op).unwrap();

    // Rollback the latest operation (no explicit target id).
    let result = h.engine.rollback(h.operation_request(canvas, None));
    assert!(result.success, "{:?}", result.error);

    let restored = h.docs.read(canvas).unwrap();
    assert_eq!(restored.node("n1").unwrap().color.as_deref(), Some("1"));

    // Exactly one CHECKPOINT exists, taken before the canvas was rewritten.
    let checkpoints: Vec<_> = h
        .snaps
        .list(canvas, 100, 0)
        .unwrap()
        .into_iter()
        .filter(|e| e.snapshot_type == SnapshotType::Checkpoint)
        .collect();
    assert_eq!(checkpoints.len(), 1);
    assert_eq!(
        checkpoints[0].id,
        result.backup_snapshot_id.clone().unwrap()
    );

    let canvas_mtime = fs::metadata(h.docs.canvas_file(canvas).unwrap())
        .unwrap()
        .modified()
        .unwrap();
    let checkpoint_time = std::time::SystemTime::from(checkpoints[0].timestamp);
    assert!(checkpoint_time <= canvas_mtime);

    // The checkpoint holds the pre-rollback ("2") state.
    let checkpoint = h.snaps.get(canvas, &checkpoints[0].id).unwrap().unwrap();
    assert_eq!(
        checkpoint.canvas_data.node("n1").unwrap().color.as_deref(),
        Some("2")
    );
}

#[test]
fn test_snapshot_rollback_replaces_whole_document() {
    let h = Harness::new();
    let canvas = "board.canvas";

    let old = two_node_doc();
    h.docs.write(canvas, &old).unwrap();
    let snapshot = h
        .snaps
        .create(canvas, SnapshotType::Manual, CreateSnapshot::default())
        .unwrap();

    h.docs
        .write(canvas, &CanvasDocument { nodes: vec![Node::text_node("x", "drift")], edges: vec![] })
        .unwrap();

    let result = h.engine.rollback(RollbackRequest {
        canvas_path: canvas.to_string(),
        rollback_type: RollbackType::Snapshot,
        target_id: Some(snapshot.info.id.clone()),
        target_time: None,
        create_backup: None,
        preserve_graph: None,
    });
    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.restored_snapshot_id.as_deref(), Some(snapshot.info.id.as_str()));
    assert_eq!(h.docs.read(canvas).unwrap(), old);
}

#[test]
fn test_unknown_snapshot_rollback_leaves_canvas_untouched() {
    let h = Harness::new();
    let canvas = "board.canvas";
    h.docs.write(canvas, &two_node_doc()).unwrap();
    let bytes_before = fs::read(h.docs.canvas_file(canvas).unwrap()).unwrap();

    let result = h.engine.rollback(RollbackRequest {
        canvas_path: canvas.to_string(),
        rollback_type: RollbackType::Snapshot,
        target_id: Some("unknown-snapshot".to_string()),
        target_time: None,
        create_backup: None,
        preserve_graph: None,
    });

    assert!(!result.success);
    assert_eq!(result.message, "Rollback target not found");
    assert!(result.error.as_deref().unwrap().contains("not found"));
    assert!(result.backup_snapshot_id.is_none());

    let bytes_after = fs::read(h.docs.canvas_file(canvas).unwrap()).unwrap();
    assert_eq!(bytes_before, bytes_after);
}

#[test]
fn test_timepoint_requires_target_time() {
    let h = Harness::new();
    let result = h.engine.rollback(RollbackRequest {
        canvas_path: "board.canvas".to_string(),
        rollback_type: RollbackType::Timepoint,
        target_id: None,
        target_time: None,
        create_backup: None,
        preserve_graph: None,
    });

    assert!(!result.success);
    // A missing parameter is a malformed request, not a missing target.
    assert_eq!(result.message, "Rollback target could not be resolved");
    assert!(result.error.as_deref().unwrap().contains("target_time"));
    // Validation fails before storage is touched: no checkpoint either.
    assert_eq!(h.snaps.count("board.canvas").unwrap(), 0);
}

#[test]
fn test_timepoint_before_any_snapshot_is_side_effect_free() {
    let h = Harness::new();
    let canvas = "board.canvas";
    h.docs.write(canvas, &two_node_doc()).unwrap();
    h.snaps
        .create(canvas, SnapshotType::Manual, CreateSnapshot::default())
        .unwrap();

    let result = h.engine.rollback(RollbackRequest {
        canvas_path: canvas.to_string(),
        rollback_type: RollbackType::Timepoint,
        target_id: None,
        target_time: Some(chrono::Utc::now() - chrono::Duration::days(1)),
        create_backup: None,
        preserve_graph: None,
    });

    assert!(!result.success);
    assert!(result.error.as_deref().unwrap().contains("No snapshot"));
    // The failed call must not create a checkpoint as a side effect.
    assert_eq!(h.snaps.count(canvas).unwrap(), 1);
}

#[test]
fn test_timepoint_selects_greatest_at_or_before() {
    let h = Harness::new();
    let canvas = "board.canvas";

    h.docs.write(canvas, &CanvasDocument { nodes: vec![Node::text_node("n1", "v1")], edges: vec![] }).unwrap();
    let first = h
        .snaps
        .create(canvas, SnapshotType::Manual, CreateSnapshot::default())
        .unwrap();
    std::thread::sleep(Duration::from_millis(5));
    h.docs.write(canvas, &CanvasDocument { nodes: vec![Node::text_node("n1", "v2")], edges: vec![] }).unwrap();
    h.snaps
        .create(canvas, SnapshotType::Manual, CreateSnapshot::default())
        .unwrap();

    h.docs.write(canvas, &CanvasDocument { nodes: vec![Node::text_node("n1", "live")], edges: vec![] }).unwrap();

    let result = h.engine.rollback(RollbackRequest {
        canvas_path: canvas.to_string(),
        rollback_type: RollbackType::Timepoint,
        target_id: None,
        target_time: Some(first.info.timestamp + chrono::Duration::milliseconds(1)),
        create_backup: Some(false),
        preserve_graph: None,
    });

    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.restored_snapshot_id.as_deref(), Some(first.info.id.as_str()));
    assert_eq!(
        h.docs.read(canvas).unwrap().node("n1").unwrap().text.as_deref(),
        Some("v1")
    );
}

#[test]
fn test_create_backup_false_skips_checkpoint() {
    let h = Harness::new();
    let canvas = "board.canvas";
    h.docs.write(canvas, &two_node_doc()).unwrap();
    let op = Operation::new(
        canvas,
        "tester",
        OperationKind::NodeAdd {
            node_ids: vec!["n2".to_string()],
            after: vec![],
        },
    );
    h.log.record(op.clone()).unwrap();

    let mut request = h.operation_request(canvas, Some(&op.id));
    request.create_backup = Some(false);
    let result = h.engine.rollback(request);

    assert!(result.success, "{:?}", result.error);
    assert!(result.backup_snapshot_id.is_none());
    assert_eq!(h.snaps.count(canvas).unwrap(), 0);
}

#[test]
fn test_graph_sync_status_follows_preserve_graph() {
    let h = Harness::new();
    let canvas = "board.canvas";
    h.docs.write(canvas, &two_node_doc()).unwrap();
    let snapshot = h
        .snaps
        .create(canvas, SnapshotType::Manual, CreateSnapshot::default())
        .unwrap();

    let mut request = RollbackRequest {
        canvas_path: canvas.to_string(),
        rollback_type: RollbackType::Snapshot,
        target_id: Some(snapshot.info.id.clone()),
        target_time: None,
        create_backup: Some(false),
        preserve_graph: Some(false),
    };
    let result = h.engine.rollback(request.clone());
    assert_eq!(result.graph_sync_status, GraphSyncStatus::Pending);

    request.preserve_graph = Some(true);
    let result = h.engine.rollback(request);
    assert_eq!(result.graph_sync_status, GraphSyncStatus::Skipped);
}

#[test]
fn test_operation_from_another_canvas_is_not_found() {
    let h = Harness::new();
    let op = Operation::new(
        "other.canvas",
        "tester",
        OperationKind::NodeAdd {
            node_ids: vec!["n1".to_string()],
            after: vec![],
        },
    );
    h.log.record(op.clone()).unwrap();

    // Target exists but belongs to a different canvas namespace.
    let result = h.engine.rollback(h.operation_request("board.canvas", Some(&op.id)));
    assert!(!result.success);
    assert!(result.error.as_deref().unwrap().contains("not found"));
}

#[test]
fn test_rollback_with_no_history_fails_cleanly() {
    let h = Harness::new();
    let result = h.engine.rollback(h.operation_request("empty.canvas", None));
    assert!(!result.success);
    assert!(result.error.as_deref().unwrap().contains("not found"));
    // Resolution failure precedes the checkpoint step.
    assert_eq!(h.snaps.count("empty.canvas").unwrap(), 0);
}
