//! Unit tests for catalog indexing and lookup

use super::*;

use keel_core::types::{InstallTarget, InstalledFeatureRecord, Platform};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::esa::write_esa;
use crate::manifest::render_manifest;

fn platform(text: &str) -> Platform {
    text.parse().unwrap()
}

fn feature(short: &str, version: Version) -> FeatureManifest {
    FeatureManifest::new(format!("com.example.{}", short), short, version)
}

fn write_feature(dir: &Path, manifest: &FeatureManifest) -> PathBuf {
    let path = dir.join(format!("{}.esa", manifest.short_name));
    fs::write(&path, write_esa(manifest, &[]).unwrap()).unwrap();
    path
}

fn esa_entry(manifest: FeatureManifest) -> CatalogEntry {
    let path = PathBuf::from(format!("{}.esa", manifest.short_name));
    CatalogEntry::new(manifest, ArtifactOrigin::EsaFile(path))
}

#[test]
fn test_first_seen_wins() {
    let first = esa_entry(feature("a-1.0", Version::new(1, 0, 0)));
    let mut duplicate = first.clone();
    duplicate.origin = ArtifactOrigin::Remote {
        artifact: "a.esa".to_string(),
    };

    let mut catalog = FeatureCatalog::from_entries([first.clone()]);
    assert!(!catalog.insert(duplicate));
    assert_eq!(catalog.len(), 1);
    assert_eq!(catalog.lookup("COM.EXAMPLE.A-1.0").unwrap().origin, first.origin);
}

#[test]
fn test_lookup_prefers_installed_then_highest() {
    let symbolic = "com.example.tool";
    let v1 = FeatureManifest::new(symbolic, "tool-1.0", Version::new(1, 0, 0));
    let v2 = FeatureManifest::new(symbolic, "tool-1.0", Version::new(2, 0, 0));

    let catalog = FeatureCatalog::from_entries([esa_entry(v1.clone()), esa_entry(v2.clone())]);
    assert_eq!(catalog.lookup(symbolic).unwrap().manifest.version, Version::new(2, 0, 0));

    let catalog = FeatureCatalog::from_entries([
        CatalogEntry::installed(v1, InstalledKind::Product),
        esa_entry(v2),
    ]);
    assert_eq!(catalog.lookup(symbolic).unwrap().manifest.version, Version::new(1, 0, 0));
}

#[test]
fn test_short_name_and_versionless_indexes() {
    let servlet5 = feature("servlet-5.0", Version::new(5, 0, 0)).with_platform(platform("jakartaee-9.1"));
    let servlet6 = feature("servlet-6.0", Version::new(6, 0, 0)).with_platform(platform("jakartaee-10.0"));
    let untagged = feature("servlet-7.0", Version::new(7, 0, 0));

    let catalog = FeatureCatalog::from_entries([esa_entry(servlet5), esa_entry(servlet6), esa_entry(untagged)]);

    assert_eq!(catalog.lookup_by_short_name("Servlet-6.0").len(), 1);
    // Untagged features have no versionless alias
    assert_eq!(catalog.lookup_versionless("servlet").len(), 2);
    assert_eq!(
        catalog.lookup_exact("servlet-7.0").unwrap().manifest.symbolic_name,
        "com.example.servlet-7.0"
    );
    assert!(catalog.lookup_exact("servlet").is_none());
}

#[test]
fn test_product_info_marks_installed() {
    let manifest = feature("jsp-2.3", Version::new(2, 3, 0));
    let mut catalog = FeatureCatalog::from_entries([esa_entry(manifest.clone())]);
    assert!(!catalog.is_installed(&manifest));

    catalog.product_info = vec![("jsp-2.3".to_string(), None)];
    assert!(catalog.is_installed(&manifest));
    assert_eq!(catalog.installed().count(), 1);
}

#[tokio::test]
async fn test_index_directory_scans_esa_files() {
    let repo = tempfile::tempdir().unwrap();
    let nested = repo.path().join("com/example");
    fs::create_dir_all(&nested).unwrap();
    write_feature(&nested, &feature("a-1.0", Version::new(1, 0, 0)));
    fs::write(nested.join("broken.esa"), b"not a zip").unwrap();

    let catalog = FeatureCatalog::index(vec![FeatureSource::Directory {
        root: repo.path().to_path_buf(),
        runtime_version: None,
    }])
    .await
    .unwrap();

    assert_eq!(catalog.len(), 1);
    assert_eq!(catalog.warnings().len(), 1);
    let entry = catalog.lookup("com.example.a-1.0").unwrap();
    assert_eq!(
        entry.origin,
        ArtifactOrigin::Directory {
            root: repo.path().to_path_buf(),
            artifact: "com/example/a-1.0.esa".to_string(),
        }
    );
}

#[tokio::test]
async fn test_index_directory_reads_json_index() {
    let repo = tempfile::tempdir().unwrap();
    let index_file = repo.path().join(index_path("24.0.0.9"));
    fs::create_dir_all(index_file.parent().unwrap()).unwrap();
    let entries = vec![IndexEntry {
        manifest: feature("b-1.0", Version::new(1, 0, 0)),
        artifact: "b.esa".to_string(),
    }];
    fs::write(&index_file, serde_json::to_string(&entries).unwrap()).unwrap();

    let catalog = FeatureCatalog::index(vec![FeatureSource::Directory {
        root: repo.path().to_path_buf(),
        runtime_version: Some("24.0.0.9".to_string()),
    }])
    .await
    .unwrap();

    assert!(catalog.lookup("com.example.b-1.0").is_some());
}

/// Index text with `com.example.b-1.0` and an entry whose version is invalid
fn index_with_bad_entry() -> String {
    let good = IndexEntry {
        manifest: feature("b-1.0", Version::new(1, 0, 0)),
        artifact: "b.esa".to_string(),
    };
    let mut bad = serde_json::to_value(IndexEntry {
        manifest: feature("c-1.0", Version::new(1, 0, 0)),
        artifact: "c.esa".to_string(),
    })
    .unwrap();
    bad["manifest"]["version"] = "not-a-version".into();
    serde_json::to_string(&vec![serde_json::to_value(&good).unwrap(), bad]).unwrap()
}

#[tokio::test]
async fn test_bad_index_entry_is_skipped_in_directory() {
    let repo = tempfile::tempdir().unwrap();
    let index_file = repo.path().join(index_path("24.0.0.9"));
    fs::create_dir_all(index_file.parent().unwrap()).unwrap();
    fs::write(&index_file, index_with_bad_entry()).unwrap();

    let catalog = FeatureCatalog::index(vec![FeatureSource::Directory {
        root: repo.path().to_path_buf(),
        runtime_version: Some("24.0.0.9".to_string()),
    }])
    .await
    .unwrap();

    assert_eq!(catalog.len(), 1);
    assert!(catalog.lookup("com.example.b-1.0").is_some());
    assert_eq!(catalog.warnings().len(), 1);
    assert!(catalog.warnings()[0].contains("com.example.c-1.0"));
}

#[tokio::test]
async fn test_bad_index_entry_is_skipped_in_remote() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/features/1.0/features-1.0.json"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(index_with_bad_entry(), "application/json"))
        .mount(&mock_server)
        .await;

    let client = RepositoryClient::new(&mock_server.uri()).unwrap();
    let catalog = FeatureCatalog::index(vec![FeatureSource::Remote {
        client,
        runtime_version: "1.0".to_string(),
    }])
    .await
    .unwrap();

    assert_eq!(catalog.len(), 1);
    assert!(catalog.lookup("com.example.b-1.0").is_some());
    assert_eq!(catalog.warnings().len(), 1);
}

#[tokio::test]
async fn test_sole_unreachable_source_is_fatal() {
    let result = FeatureCatalog::index(vec![
        FeatureSource::Installed(InstalledFeatures::default()),
        FeatureSource::Directory {
            root: PathBuf::from("/definitely/not/here"),
            runtime_version: None,
        },
    ])
    .await;

    assert!(matches!(result, Err(KeelError::CatalogUnavailable { .. })));
}

#[tokio::test]
async fn test_unreachable_source_with_fallback_is_warning() {
    let repo = tempfile::tempdir().unwrap();
    let esa = write_feature(repo.path(), &feature("a-1.0", Version::new(1, 0, 0)));

    let catalog = FeatureCatalog::index(vec![
        FeatureSource::EsaFiles(vec![esa]),
        FeatureSource::Directory {
            root: PathBuf::from("/definitely/not/here"),
            runtime_version: None,
        },
    ])
    .await
    .unwrap();

    assert_eq!(catalog.len(), 1);
    assert_eq!(catalog.warnings().len(), 1);
}

#[tokio::test]
async fn test_installed_source_reads_manifests_and_records() {
    let install = tempfile::tempdir().unwrap();
    let product_dir = install.path().join("lib/features");
    let user_dir = install.path().join("usr/extension/lib/features");
    fs::create_dir_all(&product_dir).unwrap();
    fs::create_dir_all(&user_dir).unwrap();

    let core = feature("core-1.0", Version::new(1, 0, 0));
    fs::write(product_dir.join(core.manifest_file_name()), render_manifest(&core)).unwrap();
    fs::write(product_dir.join("junk.mf"), "no colon here\n").unwrap();

    let user = feature("user-1.0", Version::new(1, 0, 0)).with_dependency("com.example.core-1.0");
    fs::write(user_dir.join(user.manifest_file_name()), render_manifest(&user)).unwrap();

    // A recorded feature whose manifest file was removed
    let orphan = feature("orphan-1.0", Version::new(1, 0, 0));
    let record = InstalledFeatureRecord::new(&orphan, InstallTarget::Usr, Vec::new());

    let catalog = FeatureCatalog::index(vec![FeatureSource::Installed(InstalledFeatures {
        product_dir: Some(product_dir),
        user_dirs: vec![(InstallTarget::Usr, user_dir)],
        records: vec![record],
        product_info: Vec::new(),
    })])
    .await
    .unwrap();

    assert_eq!(catalog.len(), 3);
    assert_eq!(catalog.warnings().len(), 1);
    let user_entry = catalog.lookup("com.example.user-1.0").unwrap();
    assert_eq!(user_entry.origin, ArtifactOrigin::Installed(InstalledKind::User(InstallTarget::Usr)));
    assert_eq!(catalog.dependencies_of(&user_entry.manifest).len(), 1);
    assert!(catalog.is_installed(&orphan));
    assert!(catalog.is_installed(&core));
}

#[tokio::test]
async fn test_fetch_local_artifact_with_signature() {
    let repo = tempfile::tempdir().unwrap();
    let manifest = feature("a-1.0", Version::new(1, 0, 0));
    let esa = write_feature(repo.path(), &manifest);
    fs::write(repo.path().join("a-1.0.esa.sig"), b"c2lnbmF0dXJl").unwrap();

    let catalog = FeatureCatalog::index(vec![FeatureSource::EsaFiles(vec![esa])]).await.unwrap();
    let entry = catalog.lookup("com.example.a-1.0").unwrap();
    let fetched = catalog.fetch_artifact(entry).await.unwrap();

    assert_eq!(fetched.esa.manifest().unwrap().symbolic_name, "com.example.a-1.0");
    assert_eq!(fetched.signature.as_deref(), Some(&b"c2lnbmF0dXJl"[..]));
    assert!(fetched.signature_locator.ends_with("a-1.0.esa.sig"));
}

#[tokio::test]
async fn test_remote_source_and_fetch() {
    let mock_server = MockServer::start().await;
    let manifest = feature("r-1.0", Version::new(1, 0, 0));
    let entries = vec![IndexEntry {
        manifest: manifest.clone(),
        artifact: "com/example/r-1.0.esa".to_string(),
    }];

    Mock::given(method("GET"))
        .and(path("/features/1.0/features-1.0.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&entries))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/com/example/r-1.0.esa"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(write_esa(&manifest, &[]).unwrap()))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/com/example/r-1.0.esa.sig"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    let client = RepositoryClient::new(&mock_server.uri()).unwrap();
    let catalog = FeatureCatalog::index(vec![FeatureSource::Remote {
        client,
        runtime_version: "1.0".to_string(),
    }])
    .await
    .unwrap();

    let entry = catalog.lookup("com.example.r-1.0").unwrap();
    let fetched = catalog.fetch_artifact(entry).await.unwrap();
    assert_eq!(fetched.esa.manifest().unwrap().short_name, "r-1.0");
    assert!(fetched.signature.is_none());
}

#[test]
fn test_remote_signature_locator() {
    let mut manifest = feature("a-1.0", Version::new(1, 0, 0));
    assert_eq!(remote_signature_locator("x/a.esa", &manifest).as_deref(), Some("x/a.esa.sig"));
    manifest.signature = Some("a.sig".to_string());
    assert_eq!(remote_signature_locator("x/a.esa", &manifest).as_deref(), Some("x/a.sig"));
    manifest.signature = Some("../../a.sig".to_string());
    assert_eq!(remote_signature_locator("x/a.esa", &manifest), None);
}

#[tokio::test]
async fn test_escaping_signature_locator_is_not_read() {
    let repo = tempfile::tempdir().unwrap();
    let nested = repo.path().join("repo");
    fs::create_dir_all(&nested).unwrap();
    let mut manifest = feature("a-1.0", Version::new(1, 0, 0));
    manifest.signature = Some("../outside.sig".to_string());
    let esa = write_feature(&nested, &manifest);
    fs::write(repo.path().join("outside.sig"), b"c2lnbmF0dXJl").unwrap();

    let catalog = FeatureCatalog::index(vec![FeatureSource::EsaFiles(vec![esa])]).await.unwrap();
    let entry = catalog.lookup("com.example.a-1.0").unwrap();
    let fetched = catalog.fetch_artifact(entry).await.unwrap();

    assert!(fetched.signature.is_none());
    assert_eq!(fetched.signature_locator, "../outside.sig");
}
