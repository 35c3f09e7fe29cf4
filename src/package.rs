//! Offline package synchronization.
//!
//! The middleware publishes the park's static data as a zip archive that
//! embeds a SQLite database. [`PackageSynchronizer::ensure_current`] asks
//! for the latest package descriptor and only downloads when the version
//! changed or the previously extracted file has gone missing.
//!
//! # Workflow
//!
//! 1. Query `offlinePackageLast { id version url }`.
//! 2. Same version and the snapshot file still on disk: reuse it.
//! 3. Otherwise download the archive, extract the first `*.sqlite` entry to
//!    a fresh path under `cache.snapshot_dir`, and delete the old snapshot.

use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde::Deserialize;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::{ParkError, Result};
use crate::graphql::GraphQlClient;
use crate::models::{PackageDescriptor, SnapshotHandle};

const DESCRIPTOR_QUERY: &str = "query { offlinePackageLast { id version url } }";

/// Suffix identifying the embedded database inside the archive.
pub const SNAPSHOT_EXTENSION: &str = ".sqlite";

/// Maximum decompressed size accepted for the embedded database.
const MAX_SNAPSHOT_BYTES: u64 = 512 * 1024 * 1024;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DescriptorData {
    offline_package_last: Option<PackageDescriptor>,
}

pub struct PackageSynchronizer {
    client: Arc<GraphQlClient>,
    park_id: String,
    /// Package format announced in the `x-package-version` header.
    client_package_version: String,
    snapshot_dir: PathBuf,
    current: Mutex<Option<SnapshotHandle>>,
    downloads: AtomicUsize,
}

impl PackageSynchronizer {
    pub fn new(
        client: Arc<GraphQlClient>,
        park_id: impl Into<String>,
        client_package_version: impl Into<String>,
        snapshot_dir: PathBuf,
    ) -> Self {
        Self {
            client,
            park_id: park_id.into(),
            client_package_version: client_package_version.into(),
            snapshot_dir,
            current: Mutex::new(None),
            downloads: AtomicUsize::new(0),
        }
    }

    /// Resolve the latest descriptor and return a handle to its snapshot.
    ///
    /// Concurrent callers are serialized; the second one sees the handle the
    /// first one produced and skips the download.
    ///
    /// # Errors
    ///
    /// - [`ParkError::Upstream`] when the descriptor query or download fails.
    /// - [`ParkError::Configuration`] when no package is published.
    /// - [`ParkError::PackageFormat`] when the archive has no `*.sqlite` entry.
    pub async fn ensure_current(&self) -> Result<SnapshotHandle> {
        let mut current = self.current.lock().await;
        let descriptor = self.fetch_descriptor().await?;

        if let Some(handle) = current.as_ref() {
            if handle.package_version == descriptor.version
                && tokio::fs::try_exists(&handle.path).await.unwrap_or(false)
            {
                tracing::debug!(version = %descriptor.version, "package unchanged, reusing snapshot");
                return Ok(handle.clone());
            }
        }

        tracing::info!(
            park = %self.park_id,
            package = %descriptor.id,
            version = %descriptor.version,
            "downloading offline package"
        );
        let archive = self.download(&descriptor.download_url).await?;
        self.downloads.fetch_add(1, Ordering::SeqCst);

        tokio::fs::create_dir_all(&self.snapshot_dir).await?;
        let target = self
            .snapshot_dir
            .join(format!("{}-{}{}", self.park_id, Uuid::new_v4(), SNAPSHOT_EXTENSION));

        let extract_to = target.clone();
        tokio::task::spawn_blocking(move || extract_snapshot(&archive, &extract_to))
            .await
            .map_err(|e| ParkError::Io(std::io::Error::other(e)))??;
        tracing::info!(path = %target.display(), "snapshot extracted");

        let handle = SnapshotHandle {
            path: target,
            package_version: descriptor.version,
        };
        if let Some(stale) = current.replace(handle.clone()) {
            remove_snapshot(&stale.path).await;
        }
        Ok(handle)
    }

    /// Number of archives downloaded by this synchronizer.
    pub fn download_count(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }

    async fn fetch_descriptor(&self) -> Result<PackageDescriptor> {
        let data: DescriptorData = self
            .client
            .query(
                DESCRIPTOR_QUERY,
                &[("x-package-version", self.client_package_version.as_str())],
            )
            .await?;

        data.offline_package_last.ok_or_else(|| {
            ParkError::Configuration("upstream has no published offline package".to_string())
        })
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .http()
            .get(url)
            .send()
            .await
            .map_err(|e| ParkError::from_transport("package download", e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ParkError::Upstream(format!(
                "package download returned {status}"
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| ParkError::from_transport("package download", e))?;
        Ok(body.to_vec())
    }
}

impl Drop for PackageSynchronizer {
    fn drop(&mut self) {
        if let Some(handle) = self.current.get_mut().take() {
            let _ = std::fs::remove_file(&handle.path);
        }
    }
}

/// Write the first `*.sqlite` entry of `archive` to `target`.
fn extract_snapshot(archive: &[u8], target: &Path) -> Result<()> {
    let mut zip = zip::ZipArchive::new(Cursor::new(archive))
        .map_err(|e| ParkError::PackageFormat(format!("not a zip archive: {e}")))?;

    let name = zip
        .file_names()
        .find(|name| name.to_ascii_lowercase().ends_with(SNAPSHOT_EXTENSION))
        .map(str::to_string)
        .ok_or_else(|| {
            ParkError::PackageFormat(format!("no {SNAPSHOT_EXTENSION} file in package archive"))
        })?;

    let entry = zip
        .by_name(&name)
        .map_err(|e| ParkError::PackageFormat(format!("cannot read {name}: {e}")))?;

    let mut out = std::fs::File::create(target)?;
    let written = std::io::copy(&mut entry.take(MAX_SNAPSHOT_BYTES), &mut out)?;
    if written >= MAX_SNAPSHOT_BYTES {
        drop(out);
        let _ = std::fs::remove_file(target);
        return Err(ParkError::PackageFormat(format!(
            "{name} exceeds size limit ({MAX_SNAPSHOT_BYTES} bytes)"
        )));
    }
    out.sync_all()?;
    Ok(())
}

async fn remove_snapshot(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        tracing::debug!(path = %path.display(), error = %e, "could not remove stale snapshot");
    }
}
