// Bundle archive assembly.
//
// Either accepts a pre-built archive as-is, or packs the static root into a
// fresh zip after deleting every `*.txt` file under it. Deletions run
// concurrently but all of them finish before compression starts, so no
// excluded file can end up in the archive. Hidden files and directories are
// never considered for exclusion; they ship like any other file.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use globset::{Glob, GlobMatcher};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use crate::config::UploadConfig;
use crate::endpoints::ensure_readable_file;
use crate::error::UploadError;

/// Files matching this pattern (relative to the static root) never ship.
pub const EXCLUDE_PATTERN: &str = "**/*.txt";

/// Media type declared for the uploaded archive.
pub const BUNDLE_MIME: &str = "application/zip";

/// The archive that will be uploaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleArchive {
    pub path: PathBuf,
    /// `true` when the archive was packed by us rather than supplied.
    pub created: bool,
}

impl BundleArchive {
    /// Base name used as the multipart file name.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| crate::config::DEFAULT_BUNDLE_NAME.to_string())
    }
}

/// Produce the archive for `config`: the supplied `bundle_file` if there is
/// one, otherwise a new archive built from `static_path`.
pub async fn prepare_bundle(
    config: &UploadConfig,
    cancel: &CancellationToken,
) -> Result<BundleArchive, UploadError> {
    let work_dir = config.work_dir()?;
    match &config.bundle_file {
        Some(file) => use_supplied(&work_dir.join(file)).await,
        None => {
            let static_root = work_dir.join(&config.static_path);
            let output = work_dir.join(&config.bundle_name);
            build_from_static(&static_root, &output, cancel).await
        }
    }
}

/// Accept an existing archive after checking it can be read.
pub async fn use_supplied(path: &Path) -> Result<BundleArchive, UploadError> {
    ensure_readable_file(path).await?;
    info!(path = %path.display(), "using supplied bundle");
    Ok(BundleArchive {
        path: path.to_path_buf(),
        created: false,
    })
}

/// Delete excluded files under `static_root`, then zip what is left into
/// `output`. Cancelling `cancel` stops compression between entries and
/// removes the partial archive.
pub async fn build_from_static(
    static_root: &Path,
    output: &Path,
    cancel: &CancellationToken,
) -> Result<BundleArchive, UploadError> {
    let excluded = find_excluded(static_root).await?;
    let removed = excluded.len();
    remove_all(excluded).await?;
    info!(
        root = %static_root.display(),
        removed,
        "removed excluded files"
    );

    let root = static_root.to_path_buf();
    let out = output.to_path_buf();
    let token = cancel.clone();
    // Cleanup happens on the blocking thread so a dropped caller still
    // leaves no half-written archive behind.
    let entries = tokio::task::spawn_blocking(move || {
        let result = compress_dir(&root, &out, &token);
        if result.is_err() {
            let _ = std::fs::remove_file(&out);
        }
        result
    })
    .await
    .map_err(|e| UploadError::ArchiveCreationFailed(io::Error::other(e)))?
    .map_err(UploadError::ArchiveCreationFailed)?;

    info!(path = %output.display(), entries, "bundle archive created");
    Ok(BundleArchive {
        path: output.to_path_buf(),
        created: true,
    })
}

fn exclusion_matcher() -> Result<GlobMatcher, UploadError> {
    Glob::new(EXCLUDE_PATTERN)
        .map(|g| g.compile_matcher())
        .map_err(|e| UploadError::ArchiveCreationFailed(io::Error::other(e)))
}

fn is_hidden(entry: &walkdir::DirEntry) -> bool {
    entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with('.'))
}

/// Regular files under `static_root` matching [`EXCLUDE_PATTERN`]. Hidden
/// entries are not descended into or matched.
pub async fn find_excluded(static_root: &Path) -> Result<Vec<PathBuf>, UploadError> {
    let matcher = exclusion_matcher()?;
    let root = static_root.to_path_buf();

    tokio::task::spawn_blocking(move || -> io::Result<Vec<PathBuf>> {
        let mut found = Vec::new();
        let walker = WalkDir::new(&root)
            .follow_links(true)
            .into_iter()
            .filter_entry(|e| !is_hidden(e));
        for entry in walker {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = entry.path().strip_prefix(&root).map_err(io::Error::other)?;
            if matcher.is_match(rel) {
                found.push(entry.into_path());
            }
        }
        Ok(found)
    })
    .await
    .map_err(|e| UploadError::ArchiveCreationFailed(io::Error::other(e)))?
    .map_err(UploadError::ArchiveCreationFailed)
}

/// Remove every path concurrently. Waits for all removals before
/// reporting the first failure.
async fn remove_all(paths: Vec<PathBuf>) -> Result<(), UploadError> {
    let mut tasks = JoinSet::new();
    for path in paths {
        tasks.spawn(async move {
            let result = tokio::fs::remove_file(&path).await;
            (path, result)
        });
    }

    let mut first_error = None;
    while let Some(joined) = tasks.join_next().await {
        let failure = match joined {
            Ok((path, Ok(()))) => {
                debug!(path = %path.display(), "deleted excluded file");
                continue;
            }
            Ok((path, Err(e))) => UploadError::not_accessible(path, e),
            Err(e) => UploadError::ArchiveCreationFailed(io::Error::other(e)),
        };
        first_error.get_or_insert(failure);
    }

    match first_error {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// Write the tree under `root` into a deflated zip at `output`. Entry names
/// are relative to `root` with `/` separators. Returns the number of
/// entries written. Fails with `Interrupted` once `cancel` fires.
fn compress_dir(root: &Path, output: &Path, cancel: &CancellationToken) -> io::Result<usize> {
    let root = root.canonicalize()?;
    let file = File::create(output)?;
    let output = output.canonicalize()?;

    let mut zip = ZipWriter::new(file);
    let options =
        SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);
    let mut written = 0;

    for entry in WalkDir::new(&root)
        .follow_links(true)
        .sort_by_file_name()
        .min_depth(1)
    {
        if cancel.is_cancelled() {
            return Err(io::Error::new(
                io::ErrorKind::Interrupted,
                "archive creation cancelled",
            ));
        }
        let entry = entry?;
        let path = entry.path();
        if path == output {
            continue;
        }
        let name = path
            .strip_prefix(&root)
            .map_err(io::Error::other)?
            .to_string_lossy()
            .replace('\\', "/");

        if entry.file_type().is_dir() {
            zip.add_directory(format!("{name}/"), options)
                .map_err(io::Error::other)?;
        } else if entry.file_type().is_file() {
            zip.start_file(name, options).map_err(io::Error::other)?;
            let mut source = File::open(path)?;
            io::copy(&mut source, &mut zip)?;
        } else {
            continue;
        }
        written += 1;
    }

    zip.finish().map_err(io::Error::other)?;
    Ok(written)
}
