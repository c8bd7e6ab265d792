//! Integration tests for templates loaded from disk.

use anyhow::Result;
use envdeps::cli::build_manager;
use envdeps::config::ResolverConfig;
use envdeps::resolver::{DependencySource, DependencyStatus};
use envdeps::store::TemplateStore;
use envdeps::test_utils::{dep, dep_ge, optional, template, write_catalog, write_registry};

#[tokio::test]
async fn test_load_catalog_directory() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let templates = [
        template("python-ml", "1.4.0", [dep_ge("cuda-base", "11.0"), optional("jupyter")]),
        template("cuda-base", "11.2", [dep("base")]),
        template("base", "22.4", []),
    ];
    write_catalog(dir.path(), &templates)?;
    std::fs::write(dir.path().join("README.md"), "not a template")?;

    let store = TemplateStore::load_dir(dir.path()).await?;
    assert_eq!(store.names(), vec!["base", "cuda-base", "python-ml"]);
    let loaded = store.get("python-ml").unwrap();
    assert_eq!(*loaded, templates[0]);
    Ok(())
}

#[tokio::test]
async fn test_malformed_template_names_the_file() -> Result<()> {
    let dir = tempfile::tempdir()?;
    write_catalog(dir.path(), &[template("base", "1.0", [])])?;
    std::fs::write(dir.path().join("broken.toml"), "name = \"broken\"\nversion = [1, 2]\n")?;

    let err = TemplateStore::load_dir(dir.path()).await.unwrap_err();
    let message = format!("{err:#}");
    assert!(message.contains("broken.toml"), "{message}");
    Ok(())
}

#[tokio::test]
async fn test_missing_catalog_directory_fails() {
    let dir = tempfile::tempdir().unwrap();
    let err = TemplateStore::load_dir(&dir.path().join("nope")).await.unwrap_err();
    assert!(err.to_string().contains("Failed to read template catalog"));
}

#[tokio::test]
async fn test_config_driven_manager() -> Result<()> {
    let root = tempfile::tempdir()?;
    let catalog = root.path().join("templates");
    let registry = root.path().join("registry");

    write_catalog(&catalog, &[template("python-ml", "1.4.0", [dep_ge("cuda-base", "11.0")])])?;
    write_registry(
        &registry,
        &[template("cuda-base", "10.0", []), template("cuda-base", "11.2", [])],
    )?;

    let config_path = root.path().join("config.toml");
    let config = ResolverConfig {
        catalog_dir: Some(catalog),
        registry_dir: Some(registry),
        fetch_retries: 0,
        ..ResolverConfig::default()
    };
    config.save_to(&config_path).await?;
    let config = ResolverConfig::load_from(&config_path).await?;

    let manager = build_manager(&config).await?;
    assert!(manager.resolver().has_fetcher());

    let local = manager.resolve_dependencies("python-ml").await?;
    assert_eq!(local.get("cuda-base").unwrap().status, DependencyStatus::Missing);

    let fetched = manager.resolve_and_fetch_dependencies("python-ml", true).await?;
    let cuda = fetched.get("cuda-base").unwrap();
    assert_eq!(cuda.status, DependencyStatus::Satisfied);
    assert_eq!(cuda.source, Some(DependencySource::Fetched));
    assert_eq!(cuda.version.as_deref(), Some("11.2"));
    assert_eq!(fetched.build_order, vec!["cuda-base", "python-ml"]);
    Ok(())
}

#[tokio::test]
async fn test_manager_without_registry_cannot_fetch() -> Result<()> {
    let root = tempfile::tempdir()?;
    write_catalog(root.path(), &[template("base", "1.0", [])])?;

    let config = ResolverConfig {
        catalog_dir: Some(root.path().to_path_buf()),
        ..ResolverConfig::default()
    };
    let manager = build_manager(&config).await?;
    assert!(!manager.resolver().has_fetcher());
    assert!(manager.resolve_and_fetch_dependencies("base", true).await.is_err());
    assert!(manager.resolve_dependencies("base").await?.is_buildable());
    Ok(())
}
