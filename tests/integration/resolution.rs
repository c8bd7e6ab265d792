//! Integration tests for local dependency resolution.

use anyhow::Result;
use envdeps::core::EnvdepsError;
use envdeps::manager::TemplateManager;
use envdeps::resolver::{DependencyResolver, DependencySource, DependencyStatus};
use envdeps::test_utils::{dep, dep_ge, init_test_logging, optional, store, template};
use envdeps::version::satisfies;

fn position(order: &[String], name: &str) -> usize {
    order.iter().position(|n| n == name).unwrap_or_else(|| panic!("{name} not in {order:?}"))
}

#[tokio::test]
async fn test_diamond_is_resolved_once() -> Result<()> {
    init_test_logging(None);
    let resolver = DependencyResolver::new(
        store([
            template("A", "1.0", [dep("B"), dep("C")]),
            template("B", "1.0", [dep("D")]),
            template("C", "1.0", [dep("D")]),
            template("D", "1.0", []),
        ]),
        None,
    );

    let result = resolver.resolve("A", false).await?;
    assert_eq!(result.resolved.len(), 3);
    assert_eq!(result.get("D").unwrap().required_by, "B");

    let order = &result.build_order;
    assert_eq!(order.iter().filter(|n| *n == "D").count(), 1);
    assert!(position(order, "D") < position(order, "B"));
    assert!(position(order, "D") < position(order, "C"));
    assert_eq!(order.last().map(String::as_str), Some("A"));
    Ok(())
}

#[tokio::test]
async fn test_cycle_is_fatal_for_resolve_and_graph() {
    let manager = TemplateManager::new(
        store([template("A", "1.0", [dep("B")]), template("B", "1.0", [dep("A")])]),
        None,
    );

    for err in [
        manager.resolve_dependencies("A").await.unwrap_err(),
        manager.get_dependency_graph("A").unwrap_err(),
    ] {
        match err.downcast_ref::<EnvdepsError>() {
            Some(EnvdepsError::CircularDependency { path }) => {
                assert!(path.contains(&"A".to_string()));
                assert!(path.contains(&"B".to_string()));
                assert_eq!(path.first(), path.last());
            }
            other => panic!("expected CircularDependency, got {other:?}"),
        }
    }
}

#[tokio::test]
async fn test_resolution_is_idempotent() -> Result<()> {
    let resolver = DependencyResolver::new(
        store([
            template("app", "1.0", [dep_ge("base", "1.0"), optional("extras"), dep("ghost")]),
            template("base", "0.9", [dep("os")]),
            template("os", "22.4", []),
        ]),
        None,
    );

    let first = resolver.resolve("app", false).await?;
    let second = resolver.resolve("app", false).await?;
    assert_eq!(first, second);
    Ok(())
}

#[tokio::test]
async fn test_optional_semantics() -> Result<()> {
    let manager = TemplateManager::new(
        store([template("app", "1.0", [dep("base"), optional("gpu-drivers")]), template("base", "1.0", [])]),
        None,
    );

    let result = manager.resolve_dependencies("app").await?;
    let gpu = result.get("gpu-drivers").unwrap();
    assert_eq!(gpu.status, DependencyStatus::Missing);
    assert!(gpu.is_optional);
    assert!(result.is_buildable());

    let deps = manager.store().get("app").unwrap().dependencies.clone();
    manager.validate_template_dependencies("app", &deps)?;

    let err = manager
        .validate_template_dependencies("app", &[dep("gpu-drivers")])
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<EnvdepsError>(),
        Some(EnvdepsError::DependencyValidation { .. })
    ));
    Ok(())
}

#[tokio::test]
async fn test_mismatch_scenario() -> Result<()> {
    let resolver = DependencyResolver::new(
        store([
            template("python-ml", "1.0", [dep_ge("cuda-base", "11.0")]),
            template("cuda-base", "10.0", []),
        ]),
        None,
    );

    let result = resolver.resolve("python-ml", false).await?;
    let cuda = result.get("cuda-base").unwrap();
    assert_eq!(cuda.status, DependencyStatus::VersionMismatch);
    assert_eq!(cuda.source, Some(DependencySource::Local));
    assert_eq!(cuda.version.as_deref(), Some("10.0"));
    assert!(!result.is_buildable());
    assert_eq!(result.summary().mismatched, 1);
    // A mismatch is not structural; the build order is still computed.
    assert_eq!(result.build_order, vec!["cuda-base", "python-ml"]);
    Ok(())
}

#[tokio::test]
async fn test_malformed_versions_are_mismatches() -> Result<()> {
    let resolver = DependencyResolver::new(
        store([
            template("app", "1.0", [dep_ge("beta", "1.0"), dep_ge("base", "latest")]),
            template("beta", "1.0.0-beta", []),
            template("base", "1.0", []),
        ]),
        None,
    );

    let result = resolver.resolve("app", false).await?;
    for name in ["beta", "base"] {
        let entry = result.get(name).unwrap();
        assert_eq!(entry.status, DependencyStatus::VersionMismatch, "{name}");
        assert!(entry.diagnostic.as_deref().unwrap().contains("Invalid version"), "{name}");
    }
    Ok(())
}

#[tokio::test]
async fn test_unknown_target_is_not_found() {
    let resolver = DependencyResolver::new(store([template("python-ml", "1.0", [])]), None);
    let err = resolver.resolve("python-ml2", false).await.unwrap_err();
    match err.downcast_ref::<EnvdepsError>() {
        Some(EnvdepsError::TemplateNotFound { name, suggestions }) => {
            assert_eq!(name, "python-ml2");
            assert_eq!(suggestions, &vec!["python-ml".to_string()]);
        }
        other => panic!("expected TemplateNotFound, got {other:?}"),
    }
}

#[test]
fn test_version_matching_examples() {
    assert!(satisfies("1.2.0", "1.0.0", ">=").unwrap());
    assert!(!satisfies("1.2.0", "2.0.0", ">=").unwrap());
    assert!(satisfies("1.2", "1.2.0", "==").unwrap());
    assert!(satisfies("2", "1.9.9", "").unwrap());
    assert!(satisfies("1.0", "x.y", ">=").is_err());
    assert!(satisfies("1.0", "1.0", "=>").is_err());
}

#[tokio::test]
async fn test_concurrent_resolutions_share_store() -> Result<()> {
    let shared = store([
        template("a", "1.0", [dep("base")]),
        template("b", "1.0", [dep("base"), dep("a")]),
        template("base", "1.0", []),
    ]);
    let resolver = std::sync::Arc::new(DependencyResolver::new(shared, None));

    let mut handles = Vec::new();
    for target in ["a", "b", "a", "b"] {
        let resolver = resolver.clone();
        handles.push(tokio::spawn(async move { resolver.resolve(target, false).await }));
    }
    for handle in handles {
        let result = handle.await??;
        assert!(result.is_buildable());
        assert_eq!(result.build_order.first().map(String::as_str), Some("base"));
    }
    Ok(())
}
