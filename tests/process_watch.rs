// tests/process_watch.rs

use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use devgraph::config::ConfigGraph;
use devgraph::engine::{TaskGraph, TaskGraphOptions};
use devgraph::errors::DevgraphError;
use devgraph::events::{Event, EventBus, EventReceiver};
use devgraph::process::{DevPlanner, ProcessParams, ProcessResults, TaskSettings, process_actions};
use devgraph::task::{Task, TaskOutcome};
use devgraph::types::ActionRef;
use devgraph_test_utils::builders::shop_project;
use devgraph_test_utils::{
    ActionBuilder, FakeRouter, ProjectBuilder, ScriptedConfigSource, init_tracing, with_timeout,
};

type TestResult = Result<(), Box<dyn Error>>;

struct Session {
    events: EventBus,
    router: Arc<FakeRouter>,
    source: Arc<ScriptedConfigSource>,
    handle: JoinHandle<devgraph::errors::Result<ProcessResults>>,
}

impl Session {
    fn start(project: Arc<dyn ConfigGraph>, watch: bool) -> (Self, EventReceiver) {
        Self::start_with(project, FakeRouter::new(), watch)
    }

    fn start_with(
        project: Arc<dyn ConfigGraph>,
        router: FakeRouter,
        watch: bool,
    ) -> (Self, EventReceiver) {
        let events = EventBus::default();
        let rx = events.subscribe();
        let router = Arc::new(router);
        let source = Arc::new(ScriptedConfigSource::new(project.clone()));
        let task_graph = TaskGraph::spawn(
            router.clone(),
            events.clone(),
            TaskGraphOptions::default(),
        );

        let handle = tokio::spawn(process_actions(ProcessParams {
            graph: project,
            config_source: source.clone(),
            task_graph,
            events: events.clone(),
            planner: Arc::new(DevPlanner::default()),
            settings: TaskSettings::default(),
            watch,
        }));

        (
            Self {
                events,
                router,
                source,
                handle,
            },
            rx,
        )
    }

    async fn finish(self) -> Result<ProcessResults, Box<dyn Error>> {
        Ok(with_timeout(self.handle).await??)
    }
}

/// Shop project plus an unrelated `docs` module.
fn project() -> Arc<dyn ConfigGraph> {
    shop_project()
        .action(ActionBuilder::build("docs"))
        .build_arc()
}

async fn wait_for(rx: &mut EventReceiver, name: &str) {
    with_timeout(async {
        while let Some(event) = rx.recv().await {
            if event.name() == name {
                return;
            }
        }
        panic!("event bus closed before {name}");
    })
    .await
}

async fn eventually(mut condition: impl FnMut() -> bool) {
    with_timeout(async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
}

#[tokio::test]
async fn without_watch_runs_initial_tasks_once() -> TestResult {
    init_tracing();
    let (session, _rx) = Session::start(project(), false);
    let router = session.router.clone();

    let results = session.finish().await?;

    assert!(!results.restart_required);
    assert_eq!(results.task_results.failed_count(), 0);
    for action in [
        "build.api", "build.web", "build.docs", "deploy.db", "deploy.api", "deploy.web", "test.api",
    ] {
        assert_eq!(router.execution_count(action), 1, "{action}");
    }
    assert_eq!(
        results
            .task_results
            .find_execution(&ActionRef::test("api"))
            .map(|r| r.outcome),
        Some(TaskOutcome::Success)
    );
    Ok(())
}

#[tokio::test]
async fn source_change_reruns_the_module_and_its_dependants_only() -> TestResult {
    init_tracing();
    let (session, mut rx) = Session::start(project(), true);
    let router = session.router.clone();
    wait_for(&mut rx, "watchingForChanges").await;

    session.events.emit(Event::ModuleSourcesChanged {
        names: vec!["api".into()],
    });
    eventually(|| router.execution_count("test.api") == 2 && router.execution_count("deploy.web") == 2)
        .await;

    assert_eq!(router.execution_count("build.api"), 2);
    assert_eq!(router.execution_count("deploy.api"), 2);
    assert_eq!(router.execution_count("build.web"), 2);
    assert_eq!(router.execution_count("deploy.db"), 1);
    assert_eq!(router.execution_count("build.docs"), 1);

    session.events.emit(Event::Exit);
    let results = session.finish().await?;
    assert!(!results.restart_required);
    Ok(())
}

/// `deploy.api` reads the image built by `build.api`; only the build's
/// sources differ between hashes.
fn image_project(build_hash: &str) -> Arc<dyn ConfigGraph> {
    ProjectBuilder::new("images")
        .action(ActionBuilder::build("api").source_hash(build_hash))
        .action(
            ActionBuilder::deploy("api")
                .build_from("api")
                .spec("image", "${actions.build.api.outputs.image}"),
        )
        .build_arc()
}

#[tokio::test]
async fn redeploy_waits_for_the_rebuilt_dependency() -> TestResult {
    init_tracing();
    let before = image_project("h1");
    let after = image_project("h2");
    let deploy_key = |g: &Arc<dyn ConfigGraph>| -> Result<_, Box<dyn Error>> {
        Ok(Task::execute(g.action(&ActionRef::deploy("api"))?, false).key())
    };
    assert_eq!(deploy_key(&before)?, deploy_key(&after)?);

    let router = FakeRouter::new()
        .output("build.api", "image", "api:1")
        .delay("build.api", Duration::from_millis(50));
    let (session, mut rx) = Session::start_with(before, router, true);
    let router = session.router.clone();
    wait_for(&mut rx, "watchingForChanges").await;
    assert_eq!(
        router.resolved_spec("deploy.api").and_then(|s| s.get("image").cloned()),
        Some("api:1".into())
    );

    router.set_output("build.api", "image", "api:2");
    session.source.push(Ok(after));
    session.events.emit(Event::ModuleSourcesChanged {
        names: vec!["api".into()],
    });
    eventually(|| router.execution_count("deploy.api") == 2).await;

    let executions = router.executions();
    assert_eq!(
        executions,
        vec!["build.api", "deploy.api", "build.api", "deploy.api"]
    );
    assert_eq!(
        router.resolved_spec("deploy.api").and_then(|s| s.get("image").cloned()),
        Some("api:2".into())
    );

    session.events.emit(Event::Exit);
    let results = session.finish().await?;
    let deploy = results
        .task_results
        .find_execution(&ActionRef::deploy("api"))
        .expect("deploy result");
    assert_eq!(deploy.instance, 1);
    assert_eq!(
        deploy
            .dependency_results
            .find_execution(&ActionRef::build("api"))
            .and_then(|b| b.outputs.get("image").cloned()),
        Some("api:2".into())
    );
    Ok(())
}

#[tokio::test]
async fn changes_to_unwatched_modules_are_ignored() -> TestResult {
    init_tracing();
    let (session, mut rx) = Session::start(project(), true);
    let router = session.router.clone();
    wait_for(&mut rx, "watchingForChanges").await;
    let before = router.executions().len();

    session.events.emit(Event::ModuleSourcesChanged {
        names: vec!["vendor".into()],
    });
    session.events.emit(Event::Exit);
    session.finish().await?;

    assert_eq!(router.executions().len(), before);
    Ok(())
}

#[tokio::test]
async fn narrowed_deploy_settings_skip_redeploys() -> TestResult {
    init_tracing();
    let (session, mut rx) = Session::start(project(), true);
    let router = session.router.clone();
    wait_for(&mut rx, "watchingForChanges").await;

    session
        .events
        .emit(Event::UpdateDeployOnWatch { names: Vec::new() });
    session.events.emit(Event::ModuleSourcesChanged {
        names: vec!["api".into()],
    });
    eventually(|| router.execution_count("test.api") == 2).await;

    assert_eq!(router.execution_count("build.api"), 2);
    assert_eq!(router.execution_count("deploy.api"), 1);

    session.events.emit(Event::Exit);
    session.finish().await?;
    Ok(())
}

#[tokio::test]
async fn deploy_request_runs_in_dev_mode() -> TestResult {
    init_tracing();
    let (session, mut rx) = Session::start(project(), true);
    let router = session.router.clone();
    wait_for(&mut rx, "watchingForChanges").await;

    session.events.emit(Event::DeployRequested {
        name: "api".into(),
        force: true,
        force_build: false,
        dev_mode: true,
    });
    eventually(|| router.execution_count("deploy.api") == 2).await;

    assert!(router.ran_in_dev_mode("deploy.api"));
    assert_eq!(router.execution_count("build.api"), 1);

    session.events.emit(Event::Exit);
    session.finish().await?;
    Ok(())
}

#[tokio::test]
async fn valid_config_edit_requests_a_restart() -> TestResult {
    init_tracing();
    let (session, mut rx) = Session::start(project(), true);
    wait_for(&mut rx, "watchingForChanges").await;

    session.source.push(Ok(project()));
    session.events.emit(Event::ProjectConfigChanged {
        path: PathBuf::from("Devgraph.toml"),
    });

    let source = session.source.clone();
    let results = session.finish().await?;
    assert!(results.restart_required);
    assert_eq!(source.load_count(), 1);
    Ok(())
}

#[tokio::test]
async fn invalid_config_edit_keeps_the_session_alive() -> TestResult {
    init_tracing();
    let (session, mut rx) = Session::start(project(), true);
    let router = session.router.clone();
    wait_for(&mut rx, "watchingForChanges").await;

    session
        .source
        .push(Err(DevgraphError::ConfigError("unknown field `bulid`".into())));
    session.events.emit(Event::ModuleConfigChanged {
        names: vec!["api".into()],
        path: PathBuf::from("api/devgraph.toml"),
    });
    session.events.emit(Event::ModuleSourcesChanged {
        names: vec!["docs".into()],
    });
    eventually(|| router.execution_count("build.docs") == 2).await;

    session.events.emit(Event::Exit);
    let source = session.source.clone();
    let results = session.finish().await?;
    assert!(!results.restart_required);
    assert_eq!(source.load_count(), 2);
    Ok(())
}

#[tokio::test]
async fn restart_event_ends_the_session() -> TestResult {
    init_tracing();
    let (session, mut rx) = Session::start(project(), true);
    wait_for(&mut rx, "watchingForChanges").await;

    session.events.emit(Event::Restart);
    let results = session.finish().await?;

    assert!(results.restart_required);
    assert!(results.task_results.len() >= 7);
    Ok(())
}
