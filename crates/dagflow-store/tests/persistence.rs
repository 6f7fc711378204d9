use serde_json::json;

use dagflow_core::traits::GraphStore;
use dagflow_core::types::{EdgeDefinition, GraphDefinition, NodeDefinition};
use dagflow_engine::{Graph, GraphExecutor, UnitRegistry};
use dagflow_store::SqliteStore;

fn definition() -> GraphDefinition {
    GraphDefinition {
        nodes: vec![
            NodeDefinition::new("a", "identity")
                .with_default("n", json!(2))
                .with_output("n"),
            NodeDefinition::new("b", "identity")
                .with_default("n", json!(3))
                .with_output("n"),
            NodeDefinition::new("total", "sum")
                .with_input("x")
                .with_input("y")
                .with_output("sum"),
        ],
        edges: vec![
            EdgeDefinition::new("a", "n", "total", "x"),
            EdgeDefinition::new("b", "n", "total", "y"),
        ],
    }
}

#[tokio::test]
async fn test_store_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("dagflow.db");

    let id = {
        let store = SqliteStore::open(&path).unwrap();
        store.create_graph(&definition()).await.unwrap().id
    };

    let store = SqliteStore::open(&path).unwrap();
    let loaded = store.get_graph(&id).await.unwrap();
    assert_eq!(loaded.definition, definition());
}

#[tokio::test]
async fn test_run_result_round_trip() {
    let store = SqliteStore::in_memory().unwrap();
    let stored = store.create_graph(&definition()).await.unwrap();

    let graph = Graph::from_definition(&stored.definition, &UnitRegistry::with_builtins()).unwrap();
    let mut result = GraphExecutor::default().run(&graph).await.unwrap();
    result.graph_id = Some(stored.id.clone());
    store.save_run(&result).await.unwrap();

    let loaded = store.get_run(&stored.id, &result.run_id).await.unwrap();
    assert_eq!(loaded, result);
    assert_eq!(loaded.leaf_outputs()["total"]["sum"], json!(5));
    assert_eq!(store.list_runs(&stored.id).await.unwrap().len(), 1);
}
