//! Integration tests for fetch-on-demand resolution.

use anyhow::Result;
use envdeps::core::EnvdepsError;
use envdeps::manager::TemplateManager;
use envdeps::registry::{DirectoryRegistry, RegistryFetcher, RetryingFetcher};
use envdeps::resolver::{DependencyResolver, DependencySource, DependencyStatus};
use envdeps::test_utils::{ScriptedFetcher, dep, dep_ge, optional, store, template, write_registry};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

fn python_ml_store() -> Arc<envdeps::store::TemplateStore> {
    store([template("python-ml", "1.4.0", [dep_ge("cuda-base", "11.0")])])
}

#[tokio::test]
async fn test_fetch_success_scenario() -> Result<()> {
    let fetcher = Arc::new(ScriptedFetcher::with_templates([
        template("cuda-base", "10.0", []),
        template("cuda-base", "11.2", []),
    ]));
    let local = python_ml_store();
    let manager = TemplateManager::new(local.clone(), Some(fetcher.clone()));

    let result = manager.resolve_and_fetch_dependencies("python-ml", true).await?;
    let cuda = result.get("cuda-base").unwrap();
    assert_eq!(cuda.status, DependencyStatus::Satisfied);
    assert_eq!(cuda.source, Some(DependencySource::Fetched));
    assert_eq!(cuda.version.as_deref(), Some("11.2"));
    assert_eq!(result.fetched, BTreeSet::from(["cuda-base".to_string()]));
    assert_eq!(result.build_order, vec!["cuda-base", "python-ml"]);
    assert!(result.is_buildable());

    // The fetched template is now local.
    assert_eq!(local.get("cuda-base").unwrap().version, "11.2");
    let again = manager.resolve_and_fetch_dependencies("python-ml", true).await?;
    assert_eq!(again.get("cuda-base").unwrap().source, Some(DependencySource::Local));
    assert!(again.fetched.is_empty());
    assert_eq!(fetcher.call_count("cuda-base"), 1);
    Ok(())
}

#[tokio::test]
async fn test_fetch_failure_scenario() -> Result<()> {
    let fetcher = ScriptedFetcher::new().failing("cuda-base", "registry unavailable");
    let manager = TemplateManager::new(python_ml_store(), Some(Arc::new(fetcher)));

    let result = manager.resolve_and_fetch_dependencies("python-ml", true).await?;
    let cuda = result.get("cuda-base").unwrap();
    assert_eq!(cuda.status, DependencyStatus::Missing);
    assert!(!cuda.is_optional);
    assert!(cuda.diagnostic.as_deref().unwrap().contains("registry unavailable"));
    assert!(result.fetched.is_empty());
    assert!(!result.is_buildable());
    assert_eq!(result.build_order, vec!["python-ml"]);
    Ok(())
}

#[tokio::test]
async fn test_no_fetch_without_flag() -> Result<()> {
    let fetcher = Arc::new(ScriptedFetcher::with_templates([template("cuda-base", "11.2", [])]));
    let manager = TemplateManager::new(python_ml_store(), Some(fetcher.clone()));

    let result = manager.resolve_dependencies("python-ml").await?;
    assert_eq!(result.get("cuda-base").unwrap().status, DependencyStatus::Missing);
    assert!(fetcher.calls().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_fetch_missing_requires_fetcher() {
    let manager = TemplateManager::new(python_ml_store(), None);
    let err = manager.resolve_and_fetch_dependencies("python-ml", true).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<EnvdepsError>(),
        Some(EnvdepsError::FetcherNotConfigured)
    ));
}

#[tokio::test]
async fn test_optional_dependencies_are_never_fetched() -> Result<()> {
    let fetcher = Arc::new(ScriptedFetcher::with_templates([template("jupyter", "7.0", [])]));
    let resolver = DependencyResolver::new(
        store([template("app", "1.0", [optional("jupyter")])]),
        Some(fetcher.clone()),
    );

    let result = resolver.resolve("app", true).await?;
    let jupyter = result.get("jupyter").unwrap();
    assert_eq!(jupyter.status, DependencyStatus::Missing);
    assert!(jupyter.is_optional);
    assert!(fetcher.calls().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_transitive_fetch_diamond_fetches_once() -> Result<()> {
    let fetcher = Arc::new(ScriptedFetcher::with_templates([
        template("B", "1.0", [dep("D")]),
        template("C", "1.0", [dep("D")]),
        template("D", "1.0", [dep("E")]),
        template("E", "1.0", []),
    ]));
    let resolver =
        DependencyResolver::new(store([template("A", "1.0", [dep("B"), dep("C")])]), Some(fetcher.clone()));

    let result = resolver.resolve("A", true).await?;
    assert_eq!(result.fetched.len(), 4);
    for name in ["B", "C", "D", "E"] {
        assert_eq!(fetcher.call_count(name), 1, "{name}");
        assert_eq!(result.get(name).unwrap().source, Some(DependencySource::Fetched));
    }
    assert_eq!(result.build_order, vec!["E", "D", "B", "C", "A"]);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_sibling_fetches_are_bounded() -> Result<()> {
    let names = ["n1", "n2", "n3", "n4", "n5"];
    let fetcher = Arc::new(
        ScriptedFetcher::with_templates(names.iter().map(|n| template(n, "1.0", [])))
            .with_default_delay(Duration::from_millis(100)),
    );
    let app = template("app", "1.0", names.iter().map(|n| dep(n)));

    let resolver = DependencyResolver::new(store([app.clone()]), Some(fetcher.clone()))
        .with_max_parallel_fetches(2);
    let result = resolver.resolve("app", true).await?;
    assert_eq!(result.fetched.len(), 5);
    assert_eq!(fetcher.max_concurrency(), 2);

    let wide = Arc::new(
        ScriptedFetcher::with_templates(names.iter().map(|n| template(n, "1.0", [])))
            .with_default_delay(Duration::from_millis(100)),
    );
    let resolver = DependencyResolver::new(store([app]), Some(wide.clone())).with_max_parallel_fetches(8);
    resolver.resolve("app", true).await?;
    assert_eq!(wide.max_concurrency(), 5);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_fetch_timeout_is_recorded() -> Result<()> {
    let fetcher = ScriptedFetcher::with_templates([template("slow", "1.0", []), template("fast", "1.0", [])])
        .delayed("slow", Duration::from_secs(60));
    let resolver = DependencyResolver::new(
        store([template("app", "1.0", [dep("slow"), dep("fast")])]),
        Some(Arc::new(fetcher)),
    )
    .with_fetch_timeout(Duration::from_secs(5))
    .with_resolve_timeout(None);

    let result = resolver.resolve("app", true).await?;
    let slow = result.get("slow").unwrap();
    assert_eq!(slow.status, DependencyStatus::Missing);
    assert!(slow.diagnostic.as_deref().unwrap().contains("deadline exceeded"));
    assert_eq!(result.get("fast").unwrap().status, DependencyStatus::Satisfied);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_overall_timeout_returns_partial_result() {
    let fetcher = ScriptedFetcher::with_templates([template("slow", "1.0", [])])
        .delayed("slow", Duration::from_secs(600));
    let resolver = DependencyResolver::new(
        store([
            template("app", "1.0", [dep("base"), dep("slow")]),
            template("base", "1.0", []),
        ]),
        Some(Arc::new(fetcher)),
    )
    .with_fetch_timeout(Duration::from_secs(3600))
    .with_resolve_timeout(Some(Duration::from_secs(2)));

    let err = resolver.resolve("app", true).await.unwrap_err();
    match err.downcast::<EnvdepsError>() {
        Ok(EnvdepsError::ResolutionTimeout { partial }) => {
            assert_eq!(partial.target, "app");
            assert_eq!(partial.get("base").unwrap().status, DependencyStatus::Satisfied);
            assert!(partial.build_order.is_empty());
        }
        other => panic!("expected ResolutionTimeout, got {other:?}"),
    }
}

#[tokio::test]
async fn test_target_fetched_from_directory_registry() -> Result<()> {
    let root = tempfile::tempdir()?;
    write_registry(
        root.path(),
        &[
            template("python-ml", "1.4.0", [dep_ge("cuda-base", "11.0"), optional("jupyter")]),
            template("cuda-base", "10.0", []),
            template("cuda-base", "11.2", [dep("nvidia-driver")]),
            template("nvidia-driver", "535", []),
        ],
    )?;

    let fetcher: Arc<dyn RegistryFetcher> =
        Arc::new(RetryingFetcher::with_retries(DirectoryRegistry::new(root.path()), 1));
    let local = store([]);
    let manager = TemplateManager::new(local.clone(), Some(fetcher));

    let result = manager.resolve_and_fetch_dependencies("python-ml", true).await?;
    assert_eq!(
        result.fetched,
        BTreeSet::from(["cuda-base", "nvidia-driver", "python-ml"].map(String::from))
    );
    assert_eq!(result.get("cuda-base").unwrap().version.as_deref(), Some("11.2"));
    assert_eq!(result.build_order, vec!["nvidia-driver", "cuda-base", "python-ml"]);
    assert_eq!(local.len(), 3);
    Ok(())
}

#[tokio::test]
async fn test_unfetchable_target_is_not_found() {
    let fetcher = ScriptedFetcher::new().failing("python-ml", "connection refused");
    let resolver = DependencyResolver::new(store([]), Some(Arc::new(fetcher)));
    let err = resolver.resolve("python-ml", true).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<EnvdepsError>(),
        Some(EnvdepsError::TemplateNotFound { .. })
    ));
}
