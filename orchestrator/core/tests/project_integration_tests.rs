// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Whole-project scenarios against the in-memory engine.
//!
//! Each test builds a small project, drives it through the orchestrator
//! verbs and checks the engine-side state afterwards, which is the only
//! state the orchestrator itself relies on.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use stevedore_core::application::{ChangeAction, ProjectOrchestrator, ServiceOutcome, UpOptions};
use stevedore_core::domain::config::ExecutionConfig;
use stevedore_core::domain::container::{ContainerState, MountKind};
use stevedore_core::domain::convergence::ConvergenceStrategy;
use stevedore_core::domain::engine::{ContainerEngine, ContainerSpec};
use stevedore_core::domain::error::ProjectError;
use stevedore_core::domain::events::ContainerEvent;
use stevedore_core::domain::labels;
use stevedore_core::domain::project::{Project, VolumeConfig};
use stevedore_core::domain::service::{AccessMode, Link, NetworkMode, Service, VolumeFromSpec};
use stevedore_core::infrastructure::{EventBus, InMemoryEngine, ProjectEvent};
use tokio_test::assert_ok;
use tokio_util::sync::CancellationToken;

fn orchestrator(project: Project, engine: &InMemoryEngine) -> ProjectOrchestrator {
    ProjectOrchestrator::new(
        project,
        Arc::new(engine.clone()),
        Arc::new(EventBus::default()),
        ExecutionConfig::default(),
    )
}

/// data <- db (volumes_from) <- web (link), plus an independent cache.
fn shop() -> Project {
    Project::new(
        "shop",
        vec![
            Service::new("data", "busybox").with_volume("/var/data".parse().unwrap()),
            Service::new("db", "postgres:16")
                .with_volumes_from(VolumeFromSpec::service("data", AccessMode::ReadWrite)),
            Service::new("web", "shop/web:1.0").with_link(Link::new("db")),
            Service::new("cache", "redis:7"),
        ],
    )
    .unwrap()
}

fn state_of(engine: &InMemoryEngine, name: &str) -> Option<ContainerState> {
    engine
        .snapshot()
        .into_iter()
        .find(|c| c.name == name)
        .map(|c| c.state)
}

fn id_of(engine: &InMemoryEngine, name: &str) -> String {
    engine
        .snapshot()
        .into_iter()
        .find(|c| c.name == name)
        .map(|c| c.id)
        .unwrap_or_else(|| panic!("container {} does not exist", name))
}

fn names(engine: &InMemoryEngine) -> Vec<String> {
    engine.snapshot().into_iter().map(|c| c.name).collect()
}

#[tokio::test]
async fn test_up_starts_every_service_once_in_dependency_order() {
    let engine = InMemoryEngine::new();
    let event_bus = Arc::new(EventBus::default());
    let mut events = event_bus.subscribe();
    let orchestrator = ProjectOrchestrator::new(
        shop(),
        Arc::new(engine.clone()),
        event_bus,
        ExecutionConfig::default(),
    );

    let report = orchestrator
        .up(&[], UpOptions::default(), &CancellationToken::new())
        .await
        .unwrap();
    assert!(report.is_success(), "{:?}", report);

    let order = engine.start_order();
    for name in ["shop_data_1", "shop_db_1", "shop_web_1", "shop_cache_1"] {
        assert_eq!(order.iter().filter(|n| *n == name).count(), 1, "{} started once", name);
        assert_eq!(state_of(&engine, name), Some(ContainerState::Running));
    }
    let position = |name: &str| order.iter().position(|n| n == name).unwrap();
    assert!(position("shop_data_1") < position("shop_db_1"));
    assert!(position("shop_db_1") < position("shop_web_1"));

    let mut started = 0;
    while let Ok(event) = events.try_recv() {
        if let ProjectEvent::Container(ContainerEvent::ContainerStarted { .. }) = event {
            started += 1;
        }
    }
    assert_eq!(started, 4);
}

#[tokio::test]
async fn test_up_with_never_strategy_is_idempotent() {
    let engine = InMemoryEngine::new();
    let orchestrator = orchestrator(shop(), &engine);
    let cancel = CancellationToken::new();
    let options = UpOptions {
        strategy: ConvergenceStrategy::Never,
        ..Default::default()
    };

    orchestrator.up(&[], options.clone(), &cancel).await.unwrap();
    let created = engine.call_count("create_container");
    let ids: Vec<String> = engine.snapshot().into_iter().map(|c| c.id).collect();

    let report = orchestrator.up(&[], options, &cancel).await.unwrap();
    assert!(report.is_success());
    assert_eq!(report.changes().count(), 0);
    assert_eq!(engine.call_count("create_container"), created);
    assert_eq!(engine.snapshot().into_iter().map(|c| c.id).collect::<Vec<_>>(), ids);
}

#[tokio::test]
async fn test_always_strategy_recreates_and_preserves_volumes() {
    let db = Service::new("db", "postgres:16")
        .with_volume("pgdata:/var/lib/postgresql/data".parse().unwrap())
        .with_volume("/srv/db/conf:/etc/postgresql:ro".parse().unwrap())
        .with_volume("/var/cache/db".parse().unwrap());
    let project = Project::with_resources(
        "shop",
        vec![db],
        BTreeMap::from([("pgdata".to_string(), VolumeConfig::default())]),
        BTreeMap::new(),
    )
    .unwrap();

    let engine = InMemoryEngine::new();
    let orchestrator = orchestrator(project, &engine);
    let cancel = CancellationToken::new();

    orchestrator.up(&[], UpOptions::default(), &cancel).await.unwrap();
    let before = engine.inspect_container("shop_db_1").await.unwrap();

    let report = orchestrator
        .up(
            &[],
            UpOptions {
                strategy: ConvergenceStrategy::Always,
                ..Default::default()
            },
            &cancel,
        )
        .await
        .unwrap();
    assert!(report.is_success(), "{:?}", report);
    assert_eq!(report.summary("db").unwrap().count(ChangeAction::Recreated), 1);

    let after = engine.inspect_container("shop_db_1").await.unwrap();
    assert_ne!(after.id, before.id);
    assert!(after.is_running());
    assert_eq!(names(&engine), vec!["shop_db_1"]);

    for destination in ["/var/lib/postgresql/data", "/etc/postgresql", "/var/cache/db"] {
        let old = before.mount(destination).unwrap();
        let new = after.mount(destination).unwrap();
        assert_eq!(new.kind, old.kind, "{}", destination);
        assert_eq!(new.name, old.name, "{}", destination);
        assert_eq!(new.source, old.source, "{}", destination);
    }
    assert_eq!(
        after.mount("/var/lib/postgresql/data").unwrap().name.as_deref(),
        Some("shop_pgdata")
    );
    assert_eq!(after.mount("/etc/postgresql").unwrap().kind, MountKind::Bind);
}

#[tokio::test]
async fn test_failed_recreate_leaves_previous_container() {
    let engine = InMemoryEngine::new();
    let orchestrator = orchestrator(shop(), &engine);
    let cancel = CancellationToken::new();

    orchestrator.up(&[], UpOptions::default(), &cancel).await.unwrap();
    let original = id_of(&engine, "shop_cache_1");

    engine.fail_create("shop_cache_1");
    let report = orchestrator
        .up(
            &["cache"],
            UpOptions {
                strategy: ConvergenceStrategy::Always,
                ..Default::default()
            },
            &cancel,
        )
        .await
        .unwrap();

    assert!(matches!(
        report.error("cache"),
        Some(ProjectError::OperationFailed { .. })
    ));
    assert_eq!(id_of(&engine, "shop_cache_1"), original);
    assert_eq!(state_of(&engine, "shop_cache_1"), Some(ContainerState::Running));
}

#[tokio::test]
async fn test_scale_keeps_lowest_ordinals() {
    let project = Project::new("shop", vec![Service::new("web", "shop/web:1.0")]).unwrap();
    let engine = InMemoryEngine::new();
    let orchestrator = orchestrator(project, &engine);
    let cancel = CancellationToken::new();

    orchestrator.up(&[], UpOptions::default(), &cancel).await.unwrap();
    let first = id_of(&engine, "shop_web_1");

    orchestrator.scale("web", 3, &cancel).await.unwrap();
    assert_eq!(names(&engine), vec!["shop_web_1", "shop_web_2", "shop_web_3"]);
    let second = id_of(&engine, "shop_web_2");

    orchestrator.scale("web", 2, &cancel).await.unwrap();
    assert_eq!(names(&engine), vec!["shop_web_1", "shop_web_2"]);
    assert_eq!(id_of(&engine, "shop_web_1"), first);
    assert_eq!(id_of(&engine, "shop_web_2"), second);

    let report = orchestrator.scale("web", 4, &cancel).await.unwrap();
    let created: Vec<&str> = report
        .changes()
        .filter(|(_, c)| c.action == ChangeAction::Created)
        .map(|(_, c)| c.container.as_str())
        .collect();
    assert_eq!(created, vec!["shop_web_3", "shop_web_4"]);
    assert!(engine.snapshot().iter().all(|c| c.is_running()));
}

#[tokio::test]
async fn test_scale_to_zero_is_sticky() {
    let project = Project::new("shop", vec![Service::new("web", "shop/web:1.0")]).unwrap();
    let engine = InMemoryEngine::new();
    let orchestrator = orchestrator(project, &engine);
    let cancel = CancellationToken::new();

    orchestrator.up(&[], UpOptions::default(), &cancel).await.unwrap();
    orchestrator.scale("web", 0, &cancel).await.unwrap();
    assert!(engine.snapshot().is_empty());

    let report = orchestrator.up(&[], UpOptions::default(), &cancel).await.unwrap();
    assert!(report.is_success());
    assert!(engine.snapshot().is_empty());
}

#[tokio::test]
async fn test_up_scale_override_is_remembered() {
    let project = Project::new("shop", vec![Service::new("web", "shop/web:1.0")]).unwrap();
    let engine = InMemoryEngine::new();
    let orchestrator = orchestrator(project, &engine);
    let cancel = CancellationToken::new();

    let options = UpOptions {
        scale: BTreeMap::from([("web".to_string(), 2)]),
        ..Default::default()
    };
    orchestrator.up(&[], options, &cancel).await.unwrap();
    orchestrator.up(&[], UpOptions::default(), &cancel).await.unwrap();
    assert_eq!(names(&engine), vec!["shop_web_1", "shop_web_2"]);

    let err = orchestrator
        .up(
            &[],
            UpOptions {
                scale: BTreeMap::from([("worker".to_string(), 1)]),
                ..Default::default()
            },
            &cancel,
        )
        .await
        .unwrap_err();
    assert_eq!(err, ProjectError::NoSuchService("worker".to_string()));
}

#[tokio::test]
async fn test_volume_driver_conflict_is_configuration_error() {
    let engine = InMemoryEngine::new().with_volume_driver("smb");
    let cancel = CancellationToken::new();
    let declare = |driver: &str| {
        Project::with_resources(
            "shop",
            vec![Service::new("db", "postgres:16").with_volume("data:/var/lib/data".parse().unwrap())],
            BTreeMap::from([("data".to_string(), VolumeConfig::with_driver(driver))]),
            BTreeMap::new(),
        )
        .unwrap()
    };

    orchestrator(declare("local"), &engine)
        .up(&[], UpOptions::default(), &cancel)
        .await
        .unwrap();
    let created = engine.call_count("create_container");

    let err = orchestrator(declare("smb"), &engine)
        .up(&[], UpOptions::default(), &cancel)
        .await
        .unwrap_err();

    let ProjectError::Configuration(message) = &err else {
        panic!("expected a configuration error, got {:?}", err);
    };
    assert!(message.contains("data"));
    assert!(message.contains("smb"));
    assert_eq!(engine.volume("shop_data").unwrap().driver, "local");
    assert_eq!(engine.call_count("create_container"), created);
}

#[tokio::test]
async fn test_up_without_dependencies_creates_volume_source_unstarted() {
    let engine = InMemoryEngine::new();
    let orchestrator = orchestrator(shop(), &engine);
    let cancel = CancellationToken::new();

    let report = orchestrator
        .up(
            &["db"],
            UpOptions {
                start_deps: false,
                ..Default::default()
            },
            &cancel,
        )
        .await
        .unwrap();

    assert_eq!(report.results.len(), 1);
    assert!(report.is_success(), "{:?}", report);
    assert_eq!(state_of(&engine, "shop_db_1"), Some(ContainerState::Running));
    assert_eq!(state_of(&engine, "shop_data_1"), Some(ContainerState::Created));
    assert_eq!(state_of(&engine, "shop_web_1"), None);

    // With dependency expansion the same source container is reused and started.
    let data = id_of(&engine, "shop_data_1");
    orchestrator.up(&["web"], UpOptions::default(), &cancel).await.unwrap();
    assert_eq!(id_of(&engine, "shop_data_1"), data);
    for name in ["shop_data_1", "shop_db_1", "shop_web_1"] {
        assert_eq!(state_of(&engine, name), Some(ContainerState::Running), "{}", name);
    }
    assert_eq!(state_of(&engine, "shop_cache_1"), None);
}

#[tokio::test]
async fn test_network_namespace_source_must_be_running() {
    let project = Project::new(
        "shop",
        vec![
            Service::new("vpn", "wireguard:1"),
            Service::new("app", "shop/app:1.0").with_network_mode(NetworkMode::Service("vpn".to_string())),
        ],
    )
    .unwrap();
    let engine = InMemoryEngine::new();
    let orchestrator = orchestrator(project, &engine);
    let cancel = CancellationToken::new();

    let report = orchestrator
        .up(
            &["app"],
            UpOptions {
                start_deps: false,
                ..Default::default()
            },
            &cancel,
        )
        .await
        .unwrap();
    assert!(matches!(
        report.error("app"),
        Some(ProjectError::OperationFailed { .. })
    ));
    assert_eq!(state_of(&engine, "shop_vpn_1"), Some(ContainerState::Created));

    let report = orchestrator.up(&["app"], UpOptions::default(), &cancel).await.unwrap();
    assert!(report.is_success(), "{:?}", report);
    assert_eq!(state_of(&engine, "shop_app_1"), Some(ContainerState::Running));
}

#[tokio::test]
async fn test_remove_stopped_skips_running_containers() {
    let project =
        Project::new("shop", vec![Service::new("web", "shop/web:1.0").with_scale(2)]).unwrap();
    let engine = InMemoryEngine::new();
    let orchestrator = orchestrator(project, &engine);
    let cancel = CancellationToken::new();

    orchestrator.up(&[], UpOptions::default(), &cancel).await.unwrap();
    engine
        .stop_container(&id_of(&engine, "shop_web_2"), std::time::Duration::from_secs(1))
        .await
        .unwrap();

    let report = orchestrator.remove_stopped(&[], &cancel).await.unwrap();
    assert!(report.is_success());
    let summary = report.summary("web").unwrap();
    assert_eq!(summary.count(ChangeAction::Removed), 1);
    assert_eq!(summary.skipped, vec!["shop_web_1".to_string()]);
    assert_eq!(names(&engine), vec!["shop_web_1"]);
    assert_eq!(state_of(&engine, "shop_web_1"), Some(ContainerState::Running));
}

#[tokio::test]
async fn test_failure_blocks_dependents_but_not_siblings() {
    let engine = InMemoryEngine::new();
    engine.fail_create("shop_db_1");
    let orchestrator = orchestrator(shop(), &engine);

    let report = orchestrator
        .up(&[], UpOptions::default(), &CancellationToken::new())
        .await
        .unwrap();

    assert!(!report.is_success());
    assert_eq!(report.results.len(), 4);
    assert!(matches!(
        report.error("db"),
        Some(ProjectError::OperationFailed { .. })
    ));
    match report.error("web") {
        Some(ProjectError::DependencyFailed { dependency, .. }) => assert_eq!(dependency, "db"),
        other => panic!("expected web to be blocked by db, got {:?}", other),
    }
    assert!(matches!(report.outcome("cache"), Some(ServiceOutcome::Completed(_))));
    assert_eq!(state_of(&engine, "shop_cache_1"), Some(ContainerState::Running));
    assert_eq!(state_of(&engine, "shop_web_1"), None);
}

#[tokio::test]
async fn test_cancelled_before_dispatch() {
    let engine = InMemoryEngine::new();
    let orchestrator = orchestrator(shop(), &engine);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let report = orchestrator.up(&[], UpOptions::default(), &cancel).await.unwrap();
    assert_eq!(report.cancelled().count(), 4);
    assert_eq!(engine.call_count("create_container"), 0);
}

#[tokio::test]
async fn test_cycle_fails_before_touching_the_engine() {
    let project = Project::new(
        "shop",
        vec![
            Service::new("a", "busybox").with_link(Link::new("b")),
            Service::new("b", "busybox").with_link(Link::new("a")),
        ],
    )
    .unwrap();
    let engine = InMemoryEngine::new();

    let err = orchestrator(project, &engine)
        .up(&[], UpOptions::default(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, ProjectError::DependencyCycle(_)));
    assert!(engine.calls().is_empty());
}

#[tokio::test]
async fn test_unknown_service_is_rejected() {
    let engine = InMemoryEngine::new();
    let err = orchestrator(shop(), &engine)
        .start(&["worker"], &CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(err, ProjectError::NoSuchService("worker".to_string()));
}

#[tokio::test]
async fn test_pause_unpause_kill_and_start() {
    let engine = InMemoryEngine::new();
    let orchestrator = orchestrator(shop(), &engine);
    let cancel = CancellationToken::new();
    orchestrator.up(&[], UpOptions::default(), &cancel).await.unwrap();

    orchestrator.pause(&["web", "cache"], &cancel).await.unwrap();
    assert_eq!(state_of(&engine, "shop_web_1"), Some(ContainerState::Paused));
    assert_eq!(state_of(&engine, "shop_cache_1"), Some(ContainerState::Paused));
    assert_eq!(state_of(&engine, "shop_db_1"), Some(ContainerState::Running));

    let report = orchestrator.unpause(&[], &cancel).await.unwrap();
    assert!(report.is_success());
    assert_eq!(state_of(&engine, "shop_web_1"), Some(ContainerState::Running));

    orchestrator.kill(&["web"], "SIGKILL", &cancel).await.unwrap();
    assert_eq!(state_of(&engine, "shop_web_1"), Some(ContainerState::Exited));

    orchestrator.start(&[], &cancel).await.unwrap();
    assert_eq!(state_of(&engine, "shop_web_1"), Some(ContainerState::Running));
}

#[tokio::test]
async fn test_stop_walks_dependents_first() {
    let engine = InMemoryEngine::new();
    let orchestrator = orchestrator(shop(), &engine);
    let cancel = CancellationToken::new();
    orchestrator.up(&[], UpOptions::default(), &cancel).await.unwrap();

    let report = orchestrator.stop(&[], None, &cancel).await.unwrap();
    assert!(report.is_success());

    let stops: Vec<String> = engine
        .calls()
        .into_iter()
        .filter(|c| c.method == "stop_container")
        .map(|c| c.target)
        .collect();
    let position = |name: &str| stops.iter().position(|n| n == name).unwrap();
    assert!(position("shop_web_1") < position("shop_db_1"));
    assert!(position("shop_db_1") < position("shop_data_1"));
    assert!(engine.snapshot().iter().all(|c| !c.is_running()));

    let containers = orchestrator.containers(&[], false).await.unwrap();
    assert!(containers.is_empty());
    let containers = orchestrator.containers(&["web"], true).await.unwrap();
    assert_eq!(containers.len(), 1);
}

#[tokio::test]
async fn test_down_removes_containers_and_resources() {
    let project = Project::with_resources(
        "shop",
        vec![Service::new("db", "postgres:16").with_volume("pgdata:/var/lib/data".parse().unwrap())],
        BTreeMap::from([("pgdata".to_string(), VolumeConfig::default())]),
        BTreeMap::new(),
    )
    .unwrap();
    let engine = InMemoryEngine::new();
    let orchestrator = orchestrator(project, &engine);
    let cancel = CancellationToken::new();

    assert!(orchestrator.default_network().await.unwrap().is_none());
    orchestrator.up(&[], UpOptions::default(), &cancel).await.unwrap();
    let network = orchestrator.default_network().await.unwrap().unwrap();
    assert_eq!(network.name, "shop_default");

    let report = orchestrator.down(&[], true, &cancel).await.unwrap();
    assert!(report.is_success());
    assert!(engine.snapshot().is_empty());
    assert!(engine.network("shop_default").is_none());
    assert!(engine.volume("shop_pgdata").is_none());
}

#[tokio::test]
async fn test_provision_resources_is_idempotent() {
    let project = Project::with_resources(
        "shop",
        vec![Service::new("db", "postgres:16").with_volume("pgdata:/var/lib/data".parse().unwrap())],
        BTreeMap::from([("pgdata".to_string(), VolumeConfig::with_driver("local"))]),
        BTreeMap::new(),
    )
    .unwrap();
    let engine = InMemoryEngine::new();
    let orchestrator = orchestrator(project, &engine);

    assert_ok!(orchestrator.provision_resources().await);
    assert_ok!(orchestrator.provision_resources().await);
    assert_eq!(engine.call_count("create_volume"), 1);
    assert_eq!(engine.call_count("create_network"), 1);
    assert!(engine.snapshot().is_empty());
}

#[tokio::test]
async fn test_replaced_dependency_recreates_its_dependents() {
    let declare = |tag: &str| {
        Project::new(
            "shop",
            vec![
                Service::new("data", format!("busybox:{}", tag)),
                Service::new("db", "postgres:16")
                    .with_network_mode(NetworkMode::Service("data".to_string())),
                Service::new("web", "shop/web:1.0").with_link(Link::new("db")),
            ],
        )
        .unwrap()
    };
    let engine = InMemoryEngine::new();
    let cancel = CancellationToken::new();

    orchestrator(declare("1"), &engine)
        .up(&[], UpOptions::default(), &cancel)
        .await
        .unwrap();
    let old_db = id_of(&engine, "shop_db_1");
    let old_web = id_of(&engine, "shop_web_1");

    let upgraded = orchestrator(declare("2"), &engine);
    let report = upgraded.up(&[], UpOptions::default(), &cancel).await.unwrap();
    assert!(report.is_success(), "{:?}", report);
    for service in ["data", "db", "web"] {
        assert_eq!(
            report.summary(service).unwrap().count(ChangeAction::Recreated),
            1,
            "{}",
            service
        );
    }

    let data = id_of(&engine, "shop_data_1");
    let db = engine.inspect_container("shop_db_1").await.unwrap();
    assert_ne!(db.id, old_db);
    assert_ne!(id_of(&engine, "shop_web_1"), old_web);
    assert_eq!(db.network_mode, Some(format!("container:{}", data)));
    assert_eq!(names(&engine), vec!["shop_data_1", "shop_db_1", "shop_web_1"]);

    // The new namespace target is live, so the dependent restarts cleanly.
    assert_ok!(engine.stop_container(&db.id, Duration::from_secs(1)).await);
    assert_ok!(engine.start_container(&db.id).await);

    let report = upgraded.up(&[], UpOptions::default(), &cancel).await.unwrap();
    assert!(report.is_success(), "{:?}", report);
    assert_eq!(report.changes().count(), 0);
    assert_eq!(id_of(&engine, "shop_data_1"), data);
    assert_eq!(id_of(&engine, "shop_db_1"), db.id);
}

#[tokio::test]
async fn test_never_strategy_does_not_cascade() {
    let declare = |tag: &str| {
        Project::new(
            "shop",
            vec![
                Service::new("data", format!("busybox:{}", tag)),
                Service::new("db", "postgres:16")
                    .with_volumes_from(VolumeFromSpec::service("data", AccessMode::ReadWrite)),
            ],
        )
        .unwrap()
    };
    let engine = InMemoryEngine::new();
    let cancel = CancellationToken::new();

    orchestrator(declare("1"), &engine)
        .up(&[], UpOptions::default(), &cancel)
        .await
        .unwrap();
    let ids = (id_of(&engine, "shop_data_1"), id_of(&engine, "shop_db_1"));

    let options = UpOptions {
        strategy: ConvergenceStrategy::Never,
        ..Default::default()
    };
    let report = orchestrator(declare("2"), &engine)
        .up(&[], options, &cancel)
        .await
        .unwrap();
    assert!(report.is_success(), "{:?}", report);
    assert_eq!(report.changes().count(), 0);
    assert_eq!((id_of(&engine, "shop_data_1"), id_of(&engine, "shop_db_1")), ids);
}

#[tokio::test]
async fn test_concurrent_dependents_share_one_volume_source() {
    let project = Project::new(
        "shop",
        vec![
            Service::new("data", "busybox").with_volume("/var/data".parse().unwrap()),
            Service::new("db1", "postgres:16")
                .with_volumes_from(VolumeFromSpec::service("data", AccessMode::ReadWrite)),
            Service::new("db2", "postgres:16")
                .with_volumes_from(VolumeFromSpec::service("data", AccessMode::ReadWrite)),
        ],
    )
    .unwrap();
    let engine = InMemoryEngine::new();
    engine.delay_calls(Duration::from_millis(5));
    let orchestrator = orchestrator(project, &engine);

    let report = orchestrator
        .up(
            &["db1", "db2"],
            UpOptions {
                start_deps: false,
                ..Default::default()
            },
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert!(report.is_success(), "{:?}", report);
    assert_eq!(names(&engine), vec!["shop_data_1", "shop_db1_1", "shop_db2_1"]);
    assert_eq!(state_of(&engine, "shop_data_1"), Some(ContainerState::Created));

    let data = engine.inspect_container("shop_data_1").await.unwrap();
    let volume = data.mount("/var/data").unwrap().name.clone();
    for name in ["shop_db1_1", "shop_db2_1"] {
        let container = engine.inspect_container(name).await.unwrap();
        assert!(container.is_running(), "{}", name);
        assert_eq!(container.mount("/var/data").unwrap().name, volume, "{}", name);
    }
}

#[tokio::test]
async fn test_unavailable_volume_source_fails_the_dependent() {
    let engine = InMemoryEngine::new();
    engine.fail_create("busybox");
    let orchestrator = orchestrator(shop(), &engine);

    let report = orchestrator
        .up(
            &["db"],
            UpOptions {
                start_deps: false,
                ..Default::default()
            },
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    match report.error("db") {
        Some(ProjectError::OperationFailed { service, message }) => {
            assert_eq!(service, "db");
            assert!(message.contains("data"), "{}", message);
        }
        other => panic!("expected db to fail, got {:?}", other),
    }
    assert_eq!(state_of(&engine, "shop_data_1"), None);
    assert_eq!(state_of(&engine, "shop_db_1"), None);
}

#[tokio::test]
async fn test_external_containers_are_referenced_by_name() {
    let engine = InMemoryEngine::new();
    engine.ensure_image("busybox").await.unwrap();
    engine
        .create_container(ContainerSpec {
            name: "backup_agent".to_string(),
            image: "busybox".to_string(),
            volumes: vec!["/backup".to_string()],
            ..Default::default()
        })
        .await
        .unwrap();
    let vpn = engine
        .create_container(ContainerSpec {
            name: "vpn".to_string(),
            image: "busybox".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();
    engine.start_container(&vpn).await.unwrap();

    let project = Project::new(
        "shop",
        vec![Service::new("app", "shop/app:1.0")
            .with_volumes_from(VolumeFromSpec::container("backup_agent", AccessMode::ReadOnly))
            .with_network_mode(NetworkMode::Container("vpn".to_string()))],
    )
    .unwrap();
    let report = orchestrator(project, &engine)
        .up(&[], UpOptions::default(), &CancellationToken::new())
        .await
        .unwrap();
    assert!(report.is_success(), "{:?}", report);

    let app = engine.inspect_container("shop_app_1").await.unwrap();
    assert!(app.is_running());
    assert_eq!(app.network_mode, Some(format!("container:{}", vpn)));
    let backup = app.mount("/backup").unwrap();
    assert!(!backup.read_write);
    assert_eq!(
        backup.name,
        engine.inspect_container("backup_agent").await.unwrap().mount("/backup").unwrap().name
    );
}

#[tokio::test]
async fn test_missing_external_containers_are_not_found() {
    let engine = InMemoryEngine::new();
    let project = Project::new(
        "shop",
        vec![
            Service::new("app", "shop/app:1.0")
                .with_volumes_from(VolumeFromSpec::container("backup_agent", AccessMode::ReadOnly)),
            Service::new("proxy", "shop/proxy:1.0")
                .with_network_mode(NetworkMode::Container("vpn".to_string())),
        ],
    )
    .unwrap();

    let report = orchestrator(project, &engine)
        .up(&[], UpOptions::default(), &CancellationToken::new())
        .await
        .unwrap();

    for (service, missing) in [("app", "backup_agent"), ("proxy", "vpn")] {
        match report.error(service) {
            Some(ProjectError::NotFound(what)) => assert!(what.contains(missing), "{}", what),
            other => panic!("expected {} to report a missing container, got {:?}", service, other),
        }
    }
    assert!(engine.snapshot().is_empty());
}

#[tokio::test]
async fn test_containers_ignore_foreign_and_undeclared_services() {
    let engine = InMemoryEngine::new();
    engine.ensure_image("busybox").await.unwrap();
    let foreign = [
        ("other_web_1", labels::encode("other", "web", 1, "x", &BTreeMap::new())),
        ("shop_ghost_1", labels::encode("shop", "ghost", 1, "x", &BTreeMap::new())),
        ("loose", Default::default()),
    ];
    for (name, labels) in foreign {
        engine
            .create_container(ContainerSpec {
                name: name.to_string(),
                image: "busybox".to_string(),
                labels,
                ..Default::default()
            })
            .await
            .unwrap();
    }

    let project = Project::new("shop", vec![Service::new("web", "shop/web:1.0")]).unwrap();
    let orchestrator = orchestrator(project, &engine);
    let cancel = CancellationToken::new();
    orchestrator.up(&[], UpOptions::default(), &cancel).await.unwrap();

    let listed: Vec<String> = orchestrator
        .containers(&[], true)
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.name)
        .collect();
    assert_eq!(listed, vec!["shop_web_1"]);
    assert_eq!(engine.snapshot().len(), 4);
}
