// tests/config_loading.rs

use std::error::Error;
use std::fs;
use std::path::Path;

use devgraph::config::{ConfigGraph, ConfigSource, DependencyQuery, FileConfigSource};
use devgraph::errors::DevgraphError;
use devgraph::types::{ActionKind, ActionRef};
use devgraph_test_utils::init_tracing;

type TestResult = Result<(), Box<dyn Error>>;

const PROJECT: &str = r#"
[project]
name = "shop"
concurrency = 3
config_files = ["api/devgraph.toml"]

[defaults]
exclude = ["**/*.log"]

[action.build.api]
include = ["api/**"]
spec.command = "make -C api"

[action.build.web]
include = ["web/**"]

[action.deploy.db]

[action.deploy.api]
build = "api"
spec.database_url = "${actions.deploy.db.outputs.url}"

[action.test.unit]
module = "api"
build = "api"
"#;

fn write(root: &Path, rel: &str, contents: &str) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, contents).unwrap();
}

fn project_dir(config: &str) -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "Devgraph.toml", config);
    write(dir.path(), "api/main.rs", "fn main() {}");
    write(dir.path(), "web/index.html", "<html></html>");
    dir
}

fn version(graph: &dyn ConfigGraph, reference: ActionRef) -> String {
    graph.action(&reference).unwrap().version.clone()
}

#[test]
fn loads_actions_modules_and_edges() -> TestResult {
    init_tracing();
    let dir = project_dir(PROJECT);
    let graph = FileConfigSource::new(dir.path().join("Devgraph.toml")).load_graph()?;

    assert_eq!(graph.project_name(), "shop");
    assert_eq!(graph.concurrency(), 3);
    assert_eq!(
        graph.config_files(),
        &["Devgraph.toml".to_string(), "api/devgraph.toml".to_string()]
    );
    assert_eq!(graph.actions(None).len(), 5);
    assert_eq!(graph.actions(Some(ActionKind::Deploy)).len(), 2);

    let api = graph.module("api")?;
    let mut names: Vec<String> = api.actions.iter().map(|r| r.to_string()).collect();
    names.sort();
    assert_eq!(names, vec!["build.api", "deploy.api", "test.unit"]);

    // The output reference counts as a dependency.
    let deps: Vec<String> = graph
        .dependencies(&ActionRef::deploy("api"), DependencyQuery::direct())?
        .iter()
        .map(|a| a.describe())
        .collect();
    assert_eq!(deps, vec!["build.api", "deploy.db"]);

    let dependants: Vec<String> = graph
        .dependants(
            &ActionRef::build("api"),
            DependencyQuery::recursive().of_kind(ActionKind::Test),
        )?
        .iter()
        .map(|a| a.describe())
        .collect();
    assert_eq!(dependants, vec!["test.unit"]);
    Ok(())
}

#[test]
fn versions_follow_source_contents() -> TestResult {
    init_tracing();
    let dir = project_dir(PROJECT);
    let source = FileConfigSource::new(dir.path().join("Devgraph.toml"));
    let before = source.load_graph()?;

    write(dir.path(), "api/build.log", "noise");
    let after_excluded = source.load_graph()?;
    assert_eq!(
        version(&before, ActionRef::build("api")),
        version(&after_excluded, ActionRef::build("api"))
    );

    write(dir.path(), "api/main.rs", "fn main() { println!(\"hi\"); }");
    let after = source.load_graph()?;
    assert_ne!(
        version(&before, ActionRef::build("api")),
        version(&after, ActionRef::build("api"))
    );
    assert_eq!(
        version(&before, ActionRef::build("web")),
        version(&after, ActionRef::build("web"))
    );
    Ok(())
}

#[test]
fn versions_follow_the_action_config() -> TestResult {
    init_tracing();
    let dir = project_dir(PROJECT);
    let source = FileConfigSource::new(dir.path().join("Devgraph.toml"));
    let before = source.load_graph()?;

    write(
        dir.path(),
        "Devgraph.toml",
        &PROJECT.replace("make -C api", "make -C api release"),
    );
    let after = source.load_graph()?;

    assert_ne!(
        version(&before, ActionRef::build("api")),
        version(&after, ActionRef::build("api"))
    );
    assert_eq!(
        version(&before, ActionRef::deploy("db")),
        version(&after, ActionRef::deploy("db"))
    );
    Ok(())
}

#[test]
fn declared_cycle_is_rejected_naming_both_actions() {
    init_tracing();
    let dir = project_dir(
        r#"
[action.deploy.a]
dependencies = ["deploy.b"]

[action.deploy.b]
dependencies = ["deploy.a"]
"#,
    );
    let err = FileConfigSource::new(dir.path().join("Devgraph.toml"))
        .load_graph()
        .unwrap_err();

    assert!(err.is_configuration());
    let DevgraphError::DependencyCycle { path } = err else {
        panic!("expected a cycle, got {err}");
    };
    assert!(path.contains(&"deploy.a".to_string()), "{path:?}");
    assert!(path.contains(&"deploy.b".to_string()), "{path:?}");
}

#[test]
fn cycle_through_output_reference_is_rejected() {
    init_tracing();
    let dir = project_dir(
        r#"
[action.deploy.a]
spec.peer = "${actions.deploy.b.outputs.url}"

[action.deploy.b]
dependencies = ["deploy.a"]
"#,
    );
    let err = FileConfigSource::new(dir.path().join("Devgraph.toml"))
        .load_graph()
        .unwrap_err();
    assert!(matches!(err, DevgraphError::DependencyCycle { .. }), "{err}");
}

#[test]
fn unknown_reference_is_a_configuration_error() {
    init_tracing();
    let dir = project_dir(
        r#"
[action.deploy.api]
build = "missing"
"#,
    );
    let err = FileConfigSource::new(dir.path().join("Devgraph.toml"))
        .load_graph()
        .unwrap_err();
    assert!(err.is_configuration());
    assert!(err.to_string().contains("build.missing"), "{err}");
}

#[tokio::test]
async fn async_source_reads_the_file_on_every_load() -> TestResult {
    init_tracing();
    let dir = project_dir(PROJECT);
    let source = FileConfigSource::new(dir.path().join("Devgraph.toml"));

    let first = source.load().await?;
    assert_eq!(first.actions(None).len(), 5);

    write(dir.path(), "Devgraph.toml", "[action.build.only]\n");
    let second = source.load().await?;
    assert_eq!(second.actions(None).len(), 1);
    assert_eq!(second.project_name(), "project");

    write(dir.path(), "Devgraph.toml", "[action.build.only\n");
    let err = source.load().await.err().expect("broken TOML must fail");
    assert!(err.is_configuration());
    Ok(())
}
