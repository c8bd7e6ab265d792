//! Integration tests for the TemplateManager API.

use anyhow::Result;
use envdeps::core::EnvdepsError;
use envdeps::manager::TemplateManager;
use envdeps::models::TemplateDependency;
use envdeps::test_utils::{ScriptedFetcher, dep, dep_ge, optional, store, template};
use envdeps::version::{VersionConstraint, VersionOperator};
use std::collections::BTreeMap;
use std::sync::Arc;

fn ml_manager() -> TemplateManager {
    TemplateManager::new(
        store([
            template("python-ml", "1.4.0", [dep("base")]),
            template("base", "22.4", []),
            template("cuda-base", "10.0", [dep("base")]),
        ]),
        None,
    )
}

#[tokio::test]
async fn test_add_then_resolve() -> Result<()> {
    let manager = ml_manager();
    manager.add_dependency("python-ml", dep("cuda-base"))?;

    let result = manager.resolve_dependencies("python-ml").await?;
    assert!(result.get("cuda-base").is_some());
    assert_eq!(result.build_order, vec!["base", "cuda-base", "python-ml"]);
    Ok(())
}

#[test]
fn test_add_rejects_invalid_required_dependency() {
    let manager = ml_manager();

    let err = manager
        .add_dependency("python-ml", dep_ge("cuda-base", "11.0"))
        .unwrap_err();
    match err.downcast_ref::<EnvdepsError>() {
        Some(EnvdepsError::DependencyValidation { template, failures }) => {
            assert_eq!(template, "python-ml");
            assert_eq!(failures.len(), 1);
            assert!(failures[0].starts_with("cuda-base: version mismatch"));
        }
        other => panic!("expected DependencyValidation, got {other:?}"),
    }

    let err = manager.add_dependency("python-ml", dep("ghost")).unwrap_err();
    assert!(err.to_string().contains("ghost: missing"));

    // Nothing was written.
    assert_eq!(manager.store().get("python-ml").unwrap().dependencies.len(), 1);
}

#[test]
fn test_add_optional_missing_dependency_is_accepted() -> Result<()> {
    let manager = ml_manager();
    manager.add_dependency("python-ml", optional("jupyter"))?;

    let stored = manager.store().get("python-ml").unwrap();
    assert!(stored.dependency("jupyter").is_some_and(|d| d.optional));
    Ok(())
}

#[test]
fn test_add_duplicate_and_cycle_are_rejected() {
    let manager = ml_manager();

    let err = manager.add_dependency("python-ml", dep("base")).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<EnvdepsError>(),
        Some(EnvdepsError::DuplicateDependency { .. })
    ));

    let err = manager.add_dependency("base", dep("python-ml")).unwrap_err();
    match err.downcast_ref::<EnvdepsError>() {
        Some(EnvdepsError::CircularDependency { path }) => {
            assert_eq!(path.first(), path.last());
            assert!(path.contains(&"python-ml".to_string()));
        }
        other => panic!("expected CircularDependency, got {other:?}"),
    }
    assert!(manager.store().get("base").unwrap().dependencies.is_empty());

    let err = manager.add_dependency("ghost", dep("base")).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<EnvdepsError>(),
        Some(EnvdepsError::TemplateNotFound { .. })
    ));
}

#[tokio::test]
async fn test_remove_dependency() -> Result<()> {
    let manager = ml_manager();
    assert!(manager.remove_dependency("python-ml", "base")?);
    assert!(!manager.remove_dependency("python-ml", "base")?);

    let result = manager.resolve_dependencies("python-ml").await?;
    assert!(result.resolved.is_empty());
    assert_eq!(manager.get_dependency_graph("python-ml")?, vec!["python-ml"]);
    Ok(())
}

#[test]
fn test_validate_lists_every_failure() {
    let manager = ml_manager();
    let deps = [
        dep("base"),
        dep_ge("cuda-base", "11.0"),
        dep("ghost"),
        optional("also-ghost"),
    ];

    let err = manager.validate_template_dependencies("python-ml", &deps).unwrap_err();
    match err.downcast_ref::<EnvdepsError>() {
        Some(EnvdepsError::DependencyValidation { failures, .. }) => {
            assert_eq!(failures.len(), 2);
            assert!(failures[0].starts_with("cuda-base: version mismatch"));
            assert_eq!(failures[1], "ghost: missing");
        }
        other => panic!("expected DependencyValidation, got {other:?}"),
    }
}

#[tokio::test]
async fn test_analyze_and_tree() -> Result<()> {
    let manager = TemplateManager::new(
        store([
            template("app", "1.0", [dep("a"), dep("b"), optional("extras"), dep("ghost")]),
            template("a", "1.0", [dep("base")]),
            template("b", "1.0", [dep("base")]),
            template("base", "1.0", []),
        ]),
        None,
    );

    let summary = manager.analyze("app").await?;
    assert_eq!(summary.total, 5);
    assert_eq!(summary.satisfied, 3);
    assert_eq!(summary.missing_required, 1);
    assert_eq!(summary.missing_optional, 1);
    assert!(!summary.buildable);

    let tree = manager.dependency_tree("app")?;
    assert_eq!(
        tree,
        "app\n├── a\n│   └── base\n└── b\n    └── base (*)\n"
    );
    Ok(())
}

#[tokio::test]
async fn test_find_compatible_versions_merges_registry_and_local() -> Result<()> {
    let fetcher = ScriptedFetcher::with_templates([
        template("cuda-base", "11.2", []),
        template("cuda-base", "12.1", []),
        template("cuda-base", "9.0", []),
    ]);
    let manager = TemplateManager::new(
        store([template("cuda-base", "11.8", [])]),
        Some(Arc::new(fetcher)),
    );

    let constraint = VersionConstraint::new(VersionOperator::GreaterOrEqual, "11.0");
    let versions = manager.find_compatible_versions("cuda-base", &constraint).await?;
    assert_eq!(versions, vec!["12.1", "11.8", "11.2"]);

    let local_only = ml_manager();
    let versions = local_only
        .find_compatible_versions("cuda-base", &VersionConstraint::new(VersionOperator::Less, "11"))
        .await?;
    assert_eq!(versions, vec!["10.0"]);
    Ok(())
}

#[tokio::test]
async fn test_resolve_constraint_conflicts() -> Result<()> {
    let fetcher = ScriptedFetcher::with_templates([
        template("cuda-base", "11.2", []),
        template("cuda-base", "11.8", []),
        template("cuda-base", "12.1", []),
    ]);
    let manager = TemplateManager::new(store([]), Some(Arc::new(fetcher)));

    let mut constraints = BTreeMap::new();
    constraints.insert(
        "cuda-base".to_string(),
        vec![
            VersionConstraint::new(VersionOperator::GreaterOrEqual, "11.0"),
            VersionConstraint::new(VersionOperator::Less, "12.0"),
        ],
    );
    constraints.insert(
        "python".to_string(),
        vec![VersionConstraint::new(VersionOperator::Equal, "3.11")],
    );

    let chosen = manager.resolve_constraint_conflicts(&constraints).await?;
    assert_eq!(chosen["cuda-base"], "11.8");
    assert_eq!(chosen["python"], "3.11.0");

    constraints.insert(
        "python".to_string(),
        vec![
            VersionConstraint::new(VersionOperator::GreaterOrEqual, "3.12"),
            VersionConstraint::new(VersionOperator::Less, "3.10"),
        ],
    );
    let err = manager.resolve_constraint_conflicts(&constraints).await.unwrap_err();
    match err.downcast_ref::<EnvdepsError>() {
        Some(EnvdepsError::VersionConflict { name, .. }) => assert_eq!(name, "python"),
        other => panic!("expected VersionConflict, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn test_conflicting_requirements_block_the_build() -> Result<()> {
    let manager = TemplateManager::new(
        store([
            template("app", "1.0", [dep("a"), dep("b")]),
            template(
                "a",
                "1.0",
                [TemplateDependency::new("python").with_version(VersionOperator::Equal, "3.10")],
            ),
            template("b", "1.0", [dep_ge("python", "3.11")]),
            template("python", "3.12", []),
        ]),
        None,
    );

    let result = manager.resolve_dependencies("app").await?;
    assert_eq!(result.conflicts.len(), 1);
    assert_eq!(result.conflicts[0].name, "python");
    assert!(!result.is_buildable());
    Ok(())
}
