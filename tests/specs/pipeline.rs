//! Full-pipeline specs: dependency closure, host capabilities, store and
//! logger traffic flowing through real workers.

use crate::prelude::*;
use async_trait::async_trait;
use gantry_controller::RunController;
use gantry_core::{
    FileClass, FileHint, HookRegistry, LogEntryKind, QueuedTest, SystemClock, TestFailure,
};
use gantry_sandbox::{
    DependencyBuilder, EvaluatedModule, HostHandle, MapReader, ModuleCtx, ModuleScope,
    ModuleScript, SandboxError, ScriptEngine, ScriptOp, ScriptedEngine,
};
use gantry_store::{StoreConfig, StoreServer};
use gantry_transport::Bus;
use gantry_worker::{HostContext, LocalLauncher};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;

#[tokio::test]
async fn cyclic_dependency_closure_builds_and_evaluates() {
    // a requires b, b requires a.
    let mut reader = MapReader::new();
    reader.insert("/src/a.js", r#"require("./b");"#);
    reader.insert("/src/b.js", r#"require("./a");"#);
    let dict = DependencyBuilder::new(reader)
        .build(Path::new("/src/a.js"), r#"require("./b");"#)
        .expect("cycle must build without recursing forever");

    assert_eq!(dict.len(), 2);
    dict.verify_closed().unwrap();
    assert_eq!(dict.resolve("/src/a.js", "./b"), Some("/src/b.js"));
    assert_eq!(dict.resolve("/src/b.js", "./a"), Some("/src/a.js"));

    // Evaluate the cycle inside a real worker: b sees a's partial exports.
    let engine = ScriptedEngine::new();
    engine.script_module(
        "/src/a.js",
        ModuleScript::Ops(vec![
            ScriptOp::Export("phase".to_string(), serde_json::json!("early")),
            ScriptOp::Require("./b".to_string()),
            ScriptOp::Export("phase".to_string(), serde_json::json!("late")),
        ]),
    );
    engine.script_module(
        "/src/b.js",
        ModuleScript::Ops(vec![ScriptOp::RequireInto(
            "a_at_entry".to_string(),
            "./a".to_string(),
        )]),
    );

    let stack = Stack::with_engine(spec_config(1), engine.clone());
    let test = QueuedTest::new("/src/a.js", r#"require("./b");"#).with_dependencies(dict);
    let summary = stack.run(vec![test]).await;

    assert_eq!(summary.passed(), 1);
    let evaluated = engine.evaluated();
    assert_eq!(
        evaluated.iter().filter(|p| *p == "/src/a.js").count(),
        1,
        "the cycle must not re-evaluate the entry"
    );
}

/// Engine that drives the injected host object: steps, logs, a store
/// acquisition, and a media entry.
#[derive(Clone)]
struct HostProbeEngine;

#[async_trait]
impl ScriptEngine for HostProbeEngine {
    fn evaluate(
        &self,
        _module: &ModuleCtx<'_>,
        scope: &mut dyn ModuleScope,
    ) -> Result<(), SandboxError> {
        for request in scope.requests() {
            scope.require(&request)?;
        }
        Ok(())
    }

    async fn run_entry(
        &self,
        _entry: &EvaluatedModule,
        host: &HostHandle,
    ) -> Result<(), TestFailure> {
        let host = HostContext::from_handle(host)
            .ok_or_else(|| TestFailure::error("host context missing"))?;

        host.logger
            .step("capture", async {
                host.logger.log("opening page").await;
                let shot = host
                    .store
                    .acquire(FileClass::Screenshot, FileHint::named("shot"))
                    .await
                    .map_err(|e| TestFailure::error(e.to_string()))?;
                tokio::fs::write(&shot.full_path, b"png-bytes")
                    .await
                    .map_err(|e| TestFailure::error(e.to_string()))?;
                host.logger
                    .media(shot.full_path.display().to_string())
                    .await;
                Ok::<(), TestFailure>(())
            })
            .await?;
        Ok(())
    }
}

#[tokio::test]
async fn host_traffic_lands_in_the_report_and_the_store() {
    let config = spec_config(2);
    let hooks = HookRegistry::new();
    let bus = Bus::root();
    let store_dir = tempfile::tempdir().unwrap();
    let store_root = store_dir.path().join("store");
    let store = StoreServer::open(
        StoreConfig {
            root: store_root.clone(),
            caps: config.store_caps,
        },
        hooks.clone(),
    )
    .unwrap();
    store.serve(&bus);

    let (exit_tx, exit_rx) = mpsc::channel(64);
    let launcher = LocalLauncher::new(bus.clone(), Arc::new(HostProbeEngine), store.clone(), exit_tx);
    let controller = RunController::new(bus, launcher, SystemClock, config, hooks)
        .with_store(store.clone());

    let summary = controller
        .run(tests(&["/shots/one.js", "/shots/two.js"]), exit_rx)
        .await
        .unwrap();

    assert_eq!(summary.passed(), 2);

    // Both tests asked for "shot": uniqueness must disambiguate.
    let mut produced: Vec<String> = std::fs::read_dir(&store_root)
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().to_string())
        .filter(|name| name.starts_with("shot"))
        .collect();
    produced.sort();
    assert_eq!(produced, ["shot-1.png", "shot.png"]);

    // Each report carries its step tree: a step entry, a child log with
    // the step as parent, and the media entry.
    for report in &summary.reports {
        let step = report
            .logs
            .iter()
            .find(|e| e.kind == LogEntryKind::Step)
            .unwrap_or_else(|| panic!("no step entry for {}", report.path));
        let child = report
            .logs
            .iter()
            .find(|e| e.formatted_message == "opening page")
            .unwrap_or_else(|| panic!("no child log for {}", report.path));
        assert_eq!(child.parent_step_uid, step.step_uid);
        assert!(report
            .logs
            .iter()
            .any(|e| e.kind == LogEntryKind::Media));
    }

    // Worker exits released every reservation.
    assert!(store.list().is_empty());
}

#[tokio::test]
async fn store_locks_release_on_worker_exit() {
    /// Acquires a file and never releases it.
    #[derive(Clone)]
    struct LeakyEngine;

    #[async_trait]
    impl ScriptEngine for LeakyEngine {
        fn evaluate(
            &self,
            _module: &ModuleCtx<'_>,
            _scope: &mut dyn ModuleScope,
        ) -> Result<(), SandboxError> {
            Ok(())
        }

        async fn run_entry(
            &self,
            _entry: &EvaluatedModule,
            host: &HostHandle,
        ) -> Result<(), TestFailure> {
            let host = HostContext::from_handle(host)
                .ok_or_else(|| TestFailure::error("host context missing"))?;
            host.store
                .acquire(FileClass::Text, FileHint::named("leak"))
                .await
                .map_err(|e| TestFailure::error(e.to_string()))?;
            Ok(())
        }
    }

    let config = spec_config(1);
    let hooks = HookRegistry::new();
    let bus = Bus::root();
    let store_dir = tempfile::tempdir().unwrap();
    let store = StoreServer::open(
        StoreConfig {
            root: store_dir.path().join("store"),
            caps: config.store_caps,
        },
        hooks.clone(),
    )
    .unwrap();
    store.serve(&bus);

    let (exit_tx, exit_rx) = mpsc::channel(64);
    let launcher = LocalLauncher::new(bus.clone(), Arc::new(LeakyEngine), store.clone(), exit_tx);
    let controller = RunController::new(bus, launcher, SystemClock, config, hooks)
        .with_store(store.clone());

    let summary = controller.run(tests(&["/leak.js"]), exit_rx).await.unwrap();
    assert_eq!(summary.passed(), 1);
    assert!(
        store.list().is_empty(),
        "worker shutdown must release abandoned locks"
    );
}
