mod common;

use std::fs;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use common::*;
use plantdoc::{AnalysisError, AssetConfig, AssetError, CatalogError, DetectionService, InitError, Ready};

#[tokio::test]
async fn test_initialize_then_analyze() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    write_assets(dir.path());
    let factory = ScriptedFactory::new(ScriptedBackend::returning(leaf_blight_scores()));
    let service = service_with(dir.path(), factory.clone());

    let ready = service.initialize().await?;
    assert_eq!(ready, Ready { num_classes: 38, catalog_entries: 38 });
    assert!(service.is_ready());
    assert_eq!(service.num_classes(), Some(38));

    let result = service.analyze(Arc::new(solid_leaf(800, 600))).await?;
    assert_eq!(result.disease_name, "Leaf Blight");
    assert_eq!(result.confidence, 0.95);
    assert_eq!(result.treatment, "Apply fungicide X");
    Ok(())
}

#[tokio::test]
async fn test_initialize_is_idempotent() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    write_assets(dir.path());
    let factory = ScriptedFactory::new(ScriptedBackend::returning(leaf_blight_scores()));
    let service = service_with(dir.path(), factory.clone());

    let first = service.initialize().await?;
    let second = service.initialize().await?;
    assert_eq!(first, second);
    assert_eq!(factory.opened.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn test_analyze_rejected_before_initialize() {
    let dir = tempfile::tempdir().unwrap();
    write_assets(dir.path());
    let service = service_with(
        dir.path(),
        ScriptedFactory::new(ScriptedBackend::returning(leaf_blight_scores())),
    );

    let result = service.analyze(Arc::new(solid_leaf(224, 224))).await;
    assert!(matches!(result, Err(AnalysisError::NotReady)));
}

#[tokio::test]
async fn test_missing_model_blocks_analysis_until_reload() {
    let dir = tempfile::tempdir().unwrap();
    write_catalog(dir.path(), &catalog_json());
    let service = service_with(
        dir.path(),
        ScriptedFactory::new(ScriptedBackend::returning(leaf_blight_scores())),
    );

    let result = service.initialize().await;
    assert!(matches!(result, Err(InitError::Asset(AssetError::Missing(_)))));
    assert!(!service.is_ready());
    assert!(service.failure().is_some());

    let result = service.analyze(Arc::new(solid_leaf(224, 224))).await;
    assert!(matches!(result, Err(AnalysisError::NotReady)));

    // Ship the model and reload
    write_model(dir.path());
    service.initialize().await.unwrap();
    assert!(service.failure().is_none());
    let result = service.analyze(Arc::new(solid_leaf(224, 224))).await.unwrap();
    assert_eq!(result.disease_name, "Leaf Blight");
}

#[tokio::test]
async fn test_malformed_catalog_fails_initialization() {
    let dir = tempfile::tempdir().unwrap();
    write_model(dir.path());
    write_catalog(
        dir.path(),
        r#"{"0": {"name": "Healthy", "treatment": "None"}, "1": {"name": "Rust"}}"#,
    );
    let service = service_with(
        dir.path(),
        ScriptedFactory::new(ScriptedBackend::returning(leaf_blight_scores())),
    );

    let result = service.initialize().await;
    assert!(matches!(result, Err(InitError::Catalog(CatalogError::Parse { .. }))));
    assert!(!service.is_ready());
}

#[tokio::test]
async fn test_digest_mismatch_fails_initialization() {
    let dir = tempfile::tempdir().unwrap();
    write_assets(dir.path());
    let service = DetectionService::builder()
        .with_assets(AssetConfig::new(dir.path()).with_model_sha256("ab".repeat(32)))
        .with_backend_factory(ScriptedFactory::new(ScriptedBackend::returning(leaf_blight_scores())))
        .build()
        .unwrap();

    let result = service.initialize().await;
    assert!(matches!(result, Err(InitError::Asset(AssetError::DigestMismatch { .. }))));
}

#[tokio::test]
async fn test_backend_failure_fails_initialization() {
    let dir = tempfile::tempdir().unwrap();
    write_catalog(dir.path(), &catalog_json());
    fs::write(dir.path().join("hub_model.onnx"), b"").unwrap();
    let service = service_with(
        dir.path(),
        ScriptedFactory::new(ScriptedBackend::returning(leaf_blight_scores())),
    );

    let result = service.initialize().await;
    assert!(matches!(result, Err(InitError::Backend(_))));
}

#[tokio::test]
async fn test_inference_error_is_recoverable() {
    let dir = tempfile::tempdir().unwrap();
    write_assets(dir.path());
    let factory = ScriptedFactory::new(ScriptedBackend::failing());
    let service = service_with(dir.path(), factory.clone());
    service.initialize().await.unwrap();

    for _ in 0..2 {
        let result = service.analyze(Arc::new(solid_leaf(224, 224))).await;
        assert!(matches!(result, Err(AnalysisError::Inference(_))));
    }
    // Still ready; each retry is a fresh call
    assert!(service.is_ready());
    assert_eq!(factory.backend.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_shutdown_releases_detector() {
    let dir = tempfile::tempdir().unwrap();
    write_assets(dir.path());
    let service = service_with(
        dir.path(),
        ScriptedFactory::new(ScriptedBackend::returning(leaf_blight_scores())),
    );
    service.initialize().await.unwrap();

    service.shutdown();
    assert!(!service.is_ready());
    let result = service.analyze(Arc::new(solid_leaf(224, 224))).await;
    assert!(matches!(result, Err(AnalysisError::NotReady)));

    service.initialize().await.unwrap();
    assert!(service.is_ready());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_shutdown_during_load_discards_model() {
    let dir = tempfile::tempdir().unwrap();
    write_assets(dir.path());
    let gate = Arc::new(Gate::default());
    let factory = ScriptedFactory::gated(ScriptedBackend::returning(leaf_blight_scores()), gate.clone());
    let service = Arc::new(service_with(dir.path(), factory.clone()));

    let pending = {
        let service = Arc::clone(&service);
        tokio::spawn(async move { service.initialize().await })
    };
    while !service.is_loading() {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    service.shutdown();
    assert!(!service.is_loading());
    gate.open();

    let outcome = pending.await.unwrap();
    assert!(matches!(outcome, Err(InitError::Cancelled)));
    assert_eq!(factory.opened.load(Ordering::SeqCst), 1);
    assert!(!service.is_ready());
    assert!(service.failure().is_none());
    let result = service.analyze(Arc::new(solid_leaf(224, 224))).await;
    assert!(matches!(result, Err(AnalysisError::NotReady)));

    // A later initialize loads normally
    service.initialize().await.unwrap();
    assert!(service.is_ready());
}

#[tokio::test]
async fn test_parallel_analyses_all_complete() {
    let dir = tempfile::tempdir().unwrap();
    write_assets(dir.path());
    let factory = ScriptedFactory::new(ScriptedBackend::returning(leaf_blight_scores()));
    let service = Arc::new(service_with(dir.path(), factory.clone()));
    service.initialize().await.unwrap();

    let mut handles = Vec::new();
    for i in 0..4 {
        let service = Arc::clone(&service);
        handles.push(tokio::spawn(async move {
            service.analyze(Arc::new(solid_leaf(100 + i, 100))).await
        }));
    }
    for handle in handles {
        let result = handle.await.unwrap().unwrap();
        assert_eq!(result.disease_name, "Leaf Blight");
    }
    assert_eq!(factory.backend.calls.load(Ordering::SeqCst), 4);
}
