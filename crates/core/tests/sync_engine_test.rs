//! End-to-end sync engine test mirroring spec scenario S1: a two-file
//! TypeScript project where `b.ts` imports a named export from `a.ts`.

use semindex_core::db;
use semindex_core::embeddings::EmbeddingsClient;
use semindex_core::graph::GraphStore;
use semindex_core::imports::ImportResolver;
use semindex_core::project::{Project, Settings};
use semindex_core::snapshot::SnapshotStore;
use semindex_core::sync::{DirtyFlag, SyncEngine};
use semindex_core::vector_store::VectorStore;
use serde_json::json;
use tempfile::tempdir;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn initial_sync_of_two_file_project_matches_scenario_s1() {
    let project_dir = tempdir().unwrap();
    std::fs::write(project_dir.path().join("a.ts"), "export const A = 1;\n").unwrap();
    std::fs::write(project_dir.path().join("b.ts"), "import { A } from './a';\n").unwrap();

    let vector_server = MockServer::start().await;
    let embeddings_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/collections"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": {"collections": []}})))
        .mount(&vector_server)
        .await;

    Mock::given(method("PUT"))
        .and(path_regex(r"^/collections/idx_[0-9a-f]+$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": true})))
        .mount(&vector_server)
        .await;

    Mock::given(method("PUT"))
        .and(path_regex(r"^/collections/idx_[0-9a-f]+/index$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": true})))
        .mount(&vector_server)
        .await;

    Mock::given(method("POST"))
        .and(path_regex(r"^/collections/idx_[0-9a-f]+/points/scroll$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": {"points": []}})))
        .mount(&vector_server)
        .await;

    Mock::given(method("PUT"))
        .and(path_regex(r"^/collections/idx_[0-9a-f]+/points$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": true})))
        .mount(&vector_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/embeddings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"embedding": [0.1, 0.2, 0.3]})))
        .mount(&embeddings_server)
        .await;

    let vector_store = VectorStore::new(vector_server.uri());
    let embeddings = EmbeddingsClient::new(embeddings_server.uri(), "nomic-embed-text");
    let snapshot_store = SnapshotStore::new(db::open_in_memory().unwrap());
    let graph_store = GraphStore::new(db::open_in_memory().unwrap());
    let import_resolver = ImportResolver::new();

    let project = Project::new(project_dir.path().to_path_buf(), Settings::default());
    let dirty = DirtyFlag::new(true);

    let engine = SyncEngine {
        snapshot_store: &snapshot_store,
        graph_store: &graph_store,
        vector_store: &vector_store,
        embeddings: &embeddings,
        import_resolver: &import_resolver,
    };

    let report = engine
        .sync_project_with_diff(&project, &dirty, false)
        .await
        .unwrap()
        .expect("first sync should run");

    assert_eq!(report.indexed, 2);
    assert!(!dirty.is_dirty());

    let snapshot = snapshot_store.load_snapshot(&project.collection_name).unwrap().unwrap();
    assert_eq!(snapshot.len(), 2);

    let nodes = graph_store.get_nodes_by_collection(&project.collection_name).unwrap();
    assert_eq!(nodes.len(), 2, "expected a.ts and b.ts as graph nodes");

    let edges = graph_store.get_edges_by_source(&project.collection_name, "b.ts").unwrap();
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].target_file.as_deref(), Some("a.ts"));
    assert_eq!(edges[0].imported_names, Some(vec!["A".to_string()]));
    assert!(edges[0].is_resolved);
}

#[tokio::test]
async fn second_sync_with_clean_flag_and_no_force_is_skipped() {
    let project_dir = tempdir().unwrap();
    std::fs::write(project_dir.path().join("a.ts"), "export const A = 1;\n").unwrap();

    let vector_store = VectorStore::new("http://localhost:0");
    let embeddings = EmbeddingsClient::new("http://localhost:0", "nomic-embed-text");
    let snapshot_store = SnapshotStore::new(db::open_in_memory().unwrap());
    let graph_store = GraphStore::new(db::open_in_memory().unwrap());
    let import_resolver = ImportResolver::new();

    let project = Project::new(project_dir.path().to_path_buf(), Settings::default());
    let dirty = DirtyFlag::new(false);

    let engine = SyncEngine {
        snapshot_store: &snapshot_store,
        graph_store: &graph_store,
        vector_store: &vector_store,
        embeddings: &embeddings,
        import_resolver: &import_resolver,
    };

    let report = engine.sync_project_with_diff(&project, &dirty, false).await.unwrap();
    assert!(report.is_none(), "clean project with no force should skip the sync pass");
}
