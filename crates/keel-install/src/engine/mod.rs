//! End-to-end pipeline from a resolution request to its report
//!
//! Stages run in a fixed order: installed state, product info, catalog,
//! resolution, license gate, artifact fetching, verification and finally
//! installation (or prepare). Fetching is the only concurrent stage; the
//! installed state is mutated by a single writer holding the state lock.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use keel_catalog::{FeatureCatalog, FeatureSource, FetchedArtifact, IndexCache, InstalledFeatures, RepositoryClient};
use keel_core::error::{KeelError, KeelResult};
use keel_core::types::{
    FeatureState, InstallFailure, ResolutionReport, ResolutionRequest, VerificationOutcome, Version,
};
use keel_resolver::{FeatureGraph, Resolution, ResolvedFeature};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::installer::Installer;
use crate::layout::InstallLayout;
use crate::prepare::Preparer;
use crate::product_info::{ProductInfo, DEFAULT_TIMEOUT};
use crate::state::InstalledStateStore;
use crate::verify::Verifier;

pub use crate::installer::UninstallReport;

/// What the engine does with the approved features
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum EngineMode {
    #[default]
    Install,
    /// Resolve, fetch and verify without writing anything
    DryRun,
    /// Write approved artifacts into a directory repository
    Prepare { repo_root: PathBuf },
}

/// `productInfo` query settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductInfoOptions {
    pub enabled: bool,
    pub timeout: Duration,
}

impl Default for ProductInfoOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Everything about an invocation that is not part of the request
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub install_dir: PathBuf,
    pub runtime_version: Option<String>,
    /// Directory repository
    pub from: Option<PathBuf>,
    pub esa_files: Vec<PathBuf>,
    /// Remote repository base URL
    pub remote: Option<String>,
    pub fetch_workers: usize,
    pub extensions: HashMap<String, PathBuf>,
    pub product_info: ProductInfoOptions,
    pub mode: EngineMode,
}

impl EngineOptions {
    pub fn new(install_dir: impl Into<PathBuf>) -> Self {
        Self {
            install_dir: install_dir.into(),
            runtime_version: None,
            from: None,
            esa_files: Vec::new(),
            remote: None,
            fetch_workers: 4,
            extensions: HashMap::new(),
            product_info: ProductInfoOptions::default(),
            mode: EngineMode::Install,
        }
    }
}

/// Runs requests against one installation.
///
/// Remote repository indexes fetched by one run are reused by later runs
/// of the same engine until they expire.
#[derive(Debug, Clone)]
pub struct Engine {
    options: EngineOptions,
    layout: InstallLayout,
    store: InstalledStateStore,
    index_cache: Arc<IndexCache>,
}

impl Engine {
    pub fn new(options: EngineOptions) -> Self {
        let layout = InstallLayout::new(&options.install_dir).with_extensions(options.extensions.clone());
        let store = InstalledStateStore::new(layout.state_dir());
        Self {
            options,
            layout,
            store,
            index_cache: Arc::new(IndexCache::new()),
        }
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    pub fn layout(&self) -> &InstallLayout {
        &self.layout
    }

    /// Resolve and apply one request.
    ///
    /// Only conditions that make the whole invocation meaningless return
    /// an error; everything else lands in the report.
    pub async fn run(&self, request: &ResolutionRequest) -> KeelResult<ResolutionReport> {
        let records = self.store.load()?;
        let product_info = self.query_product_info().await?;
        let sources = self.sources(self.layout.installed_features(records, product_info)?)?;

        let catalog = FeatureCatalog::index(sources).await?;
        info!(features = catalog.len(), "catalog indexed");

        let Resolution { mut report, closure, graph } = keel_resolver::resolve(request, &catalog);
        let pending = self.license_gate(request, &closure, &graph, &mut report);
        if pending.is_empty() {
            info!("nothing to install");
            return Ok(report);
        }

        let catalog = Arc::new(catalog);
        let fetched = self.fetch(&catalog, &pending).await;

        let verifier = Verifier::load(&request.verification).await;
        let mut approved: Vec<(&ResolvedFeature, FetchedArtifact)> = Vec::with_capacity(pending.len());
        for (feature, result) in pending.into_iter().zip(fetched) {
            let manifest = &feature.entry.manifest;
            let artifact = match result {
                Ok(artifact) => artifact,
                Err(error) => {
                    warn!(feature = %manifest.short_name, %error, "artifact fetch failed");
                    report.set_state(
                        &manifest.symbolic_name,
                        FeatureState::InstallFailed(InstallFailure::Fetch(error.to_string())),
                    );
                    continue;
                },
            };

            let outcome = verifier.verify(manifest, &artifact);
            report
                .verification
                .insert(manifest.symbolic_name.to_ascii_lowercase(), outcome.clone());
            if let VerificationOutcome::Rejected(issue) = outcome {
                report.set_state(&manifest.symbolic_name, FeatureState::VerificationRejected(issue));
                continue;
            }
            approved.push((feature, artifact));
        }

        match &self.options.mode {
            EngineMode::DryRun => {
                info!(approved = approved.len(), "dry run, nothing written");
            },
            EngineMode::Prepare { repo_root } => self.prepare(repo_root, approved, &mut report)?,
            EngineMode::Install => self.install(request, approved, &graph, &mut report)?,
        }

        info!(
            installed = report.newly_installed().len(),
            prepared = report.prepared().len(),
            already_installed = report.already_installed().len(),
            rejected = report.rejected().len(),
            failed = report.failed().len(),
            "run finished"
        );
        Ok(report)
    }

    /// Remove a feature keel installed, by symbolic or short name
    pub fn uninstall(&self, name: &str) -> KeelResult<UninstallReport> {
        let mut guard = self.store.lock()?;
        let record = guard
            .find(name)
            .cloned()
            .ok_or_else(|| KeelError::NotInstalled { name: name.to_string() })?;

        let report = Installer::new(self.layout.clone()).uninstall(&record)?;
        guard.remove(&record.symbolic_name);
        guard.save()?;
        Ok(report)
    }

    async fn query_product_info(&self) -> KeelResult<Vec<(String, Option<Version>)>> {
        if !self.options.product_info.enabled {
            return Ok(Vec::new());
        }
        let query = ProductInfo::new(&self.options.install_dir, self.options.product_info.timeout);
        tokio::task::spawn_blocking(move || query.installed_features())
            .await
            .map_err(|e| KeelError::ProcessFailed {
                command: "productInfo featureInfo".to_string(),
                message: e.to_string(),
            })?
    }

    /// Sources in priority order: installed, local files, directory, remote
    fn sources(&self, installed: InstalledFeatures) -> KeelResult<Vec<FeatureSource>> {
        let mut sources = vec![FeatureSource::Installed(installed)];
        if !self.options.esa_files.is_empty() {
            sources.push(FeatureSource::EsaFiles(self.options.esa_files.clone()));
        }
        if let Some(root) = &self.options.from {
            sources.push(FeatureSource::Directory {
                root: root.clone(),
                runtime_version: self.options.runtime_version.clone(),
            });
        }
        if let Some(url) = &self.options.remote {
            let runtime_version = self.options.runtime_version.clone().ok_or_else(|| {
                KeelError::config("server.runtime-version", "required when a remote repository is configured")
            })?;
            sources.push(FeatureSource::Remote {
                client: RepositoryClient::new(url)?.with_cache(Arc::clone(&self.index_cache)),
                runtime_version,
            });
        }
        Ok(sources)
    }

    /// Features left to fetch after licensed features without acceptance
    /// are failed
    fn license_gate<'r>(
        &self,
        request: &ResolutionRequest,
        closure: &'r [ResolvedFeature],
        graph: &FeatureGraph,
        report: &mut ResolutionReport,
    ) -> Vec<&'r ResolvedFeature> {
        let by_key: HashMap<String, &ResolvedFeature> = closure
            .iter()
            .map(|feature| (feature.entry.manifest.symbolic_name.to_ascii_lowercase(), feature))
            .collect();

        let mut pending = Vec::new();
        for node in graph.install_order() {
            let Some(&feature) = by_key.get(&node.key) else {
                continue;
            };
            if feature.installed {
                continue;
            }
            let manifest = &feature.entry.manifest;
            let gated = !request.accept_license && !matches!(self.options.mode, EngineMode::Prepare { .. });
            match &manifest.license {
                Some(license) if gated => {
                    warn!(feature = %manifest.short_name, %license, "license not accepted");
                    report.set_state(
                        &manifest.symbolic_name,
                        FeatureState::InstallFailed(InstallFailure::LicenseNotAccepted(license.clone())),
                    );
                },
                _ => pending.push(feature),
            }
        }
        pending
    }

    /// Fetch every pending artifact, at most `fetch_workers` at a time.
    /// Results come back in the order of `pending`.
    async fn fetch(
        &self,
        catalog: &Arc<FeatureCatalog>,
        pending: &[&ResolvedFeature],
    ) -> Vec<KeelResult<FetchedArtifact>> {
        let semaphore = Arc::new(Semaphore::new(self.options.fetch_workers.max(1)));
        let mut tasks = JoinSet::new();

        for (index, feature) in pending.iter().enumerate() {
            let catalog = Arc::clone(catalog);
            let permits = Arc::clone(&semaphore);
            let entry = feature.entry.clone();
            tasks.spawn(async move {
                let _permit = permits.acquire_owned().await;
                debug!(feature = %entry.manifest.short_name, "fetching artifact");
                (index, catalog.fetch_artifact(&entry).await)
            });
        }

        let mut results: Vec<Option<KeelResult<FetchedArtifact>>> = (0..pending.len()).map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result)) => results[index] = Some(result),
                Err(error) => warn!(%error, "fetch task failed"),
            }
        }

        results
            .into_iter()
            .map(|result| {
                result.unwrap_or_else(|| {
                    Err(KeelError::CatalogUnavailable {
                        message: "artifact fetch was aborted".to_string(),
                    })
                })
            })
            .collect()
    }

    fn install(
        &self,
        request: &ResolutionRequest,
        approved: Vec<(&ResolvedFeature, FetchedArtifact)>,
        graph: &FeatureGraph,
        report: &mut ResolutionReport,
    ) -> KeelResult<()> {
        if approved.is_empty() {
            return Ok(());
        }

        let installer = Installer::new(self.layout.clone());
        let mut guard = self.store.lock()?;

        for (feature, artifact) in approved {
            let manifest = &feature.entry.manifest;
            let key = manifest.symbolic_name.to_ascii_lowercase();

            let failed_dependency = graph.dependencies(&key).into_iter().find(|dependency| {
                matches!(
                    report.state_of(&dependency.key),
                    Some(FeatureState::VerificationRejected(_) | FeatureState::InstallFailed(_))
                )
            });
            if let Some(dependency) = failed_dependency {
                warn!(feature = %manifest.short_name, dependency = %dependency.id.short_name, "dependency not installed");
                report.set_state(
                    &key,
                    FeatureState::InstallFailed(InstallFailure::DependencyFailed(dependency.id.short_name.clone())),
                );
                continue;
            }

            match installer.install(manifest, &artifact.esa, &request.target) {
                Ok(record) => {
                    let files = record.files.len();
                    guard.upsert(record);
                    report.set_state(&key, FeatureState::Installed { files });
                },
                Err(failure) => report.set_state(&key, FeatureState::InstallFailed(failure)),
            }
        }

        guard.save()
    }

    fn prepare(
        &self,
        repo_root: &Path,
        approved: Vec<(&ResolvedFeature, FetchedArtifact)>,
        report: &mut ResolutionReport,
    ) -> KeelResult<()> {
        let runtime_version = self.options.runtime_version.clone().ok_or_else(|| {
            KeelError::config("server.runtime-version", "required to name the prepared repository index")
        })?;

        let mut preparer = Preparer::new(repo_root, runtime_version);
        for (feature, artifact) in approved {
            let manifest = &feature.entry.manifest;
            match preparer.add(manifest, &artifact) {
                Ok(()) => report.set_state(&manifest.symbolic_name, FeatureState::Prepared),
                Err(error) => report.set_state(
                    &manifest.symbolic_name,
                    FeatureState::InstallFailed(InstallFailure::Partial(error.to_string())),
                ),
            }
        }
        preparer.finish()?;
        Ok(())
    }
}
