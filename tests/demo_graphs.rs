use std::path::PathBuf;

use serde_json::json;

use dagflow_engine::scheduler::{levels, topological_order};
use dagflow_engine::{load_definition, Graph, GraphExecutor, RunConfig, UnitRegistry};

fn demo(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("demos").join(name)
}

fn build(name: &str) -> Graph {
    let definition = load_definition(&demo(name)).expect("load demo");
    Graph::from_definition(&definition, &UnitRegistry::with_builtins()).expect("build demo")
}

#[tokio::test]
async fn test_diamond_demo() {
    let graph = build("diamond.json");
    assert_eq!(
        topological_order(&graph).unwrap(),
        vec!["source", "left", "right", "join"]
    );
    assert_eq!(
        levels(&graph, &|_| true).unwrap(),
        vec![vec!["source"], vec!["left", "right"], vec!["join"]]
    );

    let result = GraphExecutor::default().run(&graph).await.unwrap();
    assert!(result.succeeded());
    assert_eq!(result.leaf_outputs()["join"]["sum"], json!(120));
}

#[tokio::test]
async fn test_diamond_demo_with_run_config() {
    let graph = build("diamond.json");
    let run_config = RunConfig::load(&demo("diamond.run.toml")).unwrap();

    let result = GraphExecutor::default()
        .execute(&graph, &run_config, &Default::default())
        .await
        .unwrap();
    assert!(result.succeeded());
    assert_eq!(result.node_outputs("right").unwrap()["sum"], json!(6));
    assert_eq!(result.leaf_outputs()["join"]["sum"], json!(21));
}

#[tokio::test]
async fn test_greeting_demo() {
    let graph = build("greeting.toml");
    let result = GraphExecutor::default().run(&graph).await.unwrap();
    assert_eq!(result.leaf_outputs()["sentence"]["text"], json!("hello, world"));
}
