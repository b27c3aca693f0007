//! Tree Walker
//!
//! Mirrors a source tree into a destination tree and hands every file to the
//! [`FileTransformer`]. Directories are created first, in sorted order; files
//! are then processed sequentially or on the rayon pool. A failing file is
//! recorded and its siblings carry on.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;

use rayon::prelude::*;
use serde::Serialize;
use thiserror::Error;
use walkdir::WalkDir;

use crate::path_utils::path_to_string;
use crate::transform::{FileKind, FileOutcome, FileTransformer, TransformError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalkOptions {
    /// Transform files on the rayon thread pool
    pub parallel: bool,
    /// Descend into symlinked directories; loops are skipped
    pub follow_symlinks: bool,
    /// Files not started by this instant are abandoned
    pub deadline: Option<Instant>,
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self {
            parallel: true,
            follow_symlinks: false,
            deadline: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum WalkError {
    #[error("source directory {} does not exist", path.display())]
    SourceMissing { path: PathBuf },

    #[error("failed to create directory {}: {source}", path.display())]
    CreateDir { path: PathBuf, source: io::Error },

    #[error("deadline exceeded with {remaining} files not processed")]
    DeadlineExceeded { remaining: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedFile {
    pub path: PathBuf,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WalkReport {
    pub directories: usize,
    pub scripts: usize,
    pub assets: usize,
    pub failed: Vec<FailedFile>,
    /// Entries left out of the destination: symlink loops, dangling links
    pub skipped: Vec<PathBuf>,
    pub bytes_in: u64,
    pub bytes_out: u64,
    pub transforms: usize,
}

impl WalkReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn files(&self) -> usize {
        self.scripts + self.assets
    }

    /// Failed paths with forward slashes, for messages
    pub fn failed_paths(&self) -> Vec<String> {
        self.failed.iter().map(|f| path_to_string(&f.path)).collect()
    }

    fn record(&mut self, path: &Path, result: Result<FileOutcome, TransformError>) {
        match result {
            Ok(outcome) => {
                match outcome.kind {
                    FileKind::Script { .. } => self.scripts += 1,
                    FileKind::Asset => self.assets += 1,
                }
                self.bytes_in += outcome.bytes_in;
                self.bytes_out += outcome.bytes_out;
                self.transforms += outcome.transforms;
            }
            Err(err) => {
                tracing::error!(path = %path.display(), error = %err, "failed to protect file");
                self.failed.push(FailedFile {
                    path: path.to_path_buf(),
                    error: err.to_string(),
                });
            }
        }
    }
}

/// A file to transform: source and destination
struct Job {
    src: PathBuf,
    dst: PathBuf,
}

pub struct TreeWalker {
    transformer: FileTransformer,
    options: WalkOptions,
}

impl TreeWalker {
    pub fn new(transformer: FileTransformer, options: WalkOptions) -> Self {
        Self { transformer, options }
    }

    pub fn options(&self) -> &WalkOptions {
        &self.options
    }

    /// Mirror `src` into `dst`, transforming every file once
    pub fn walk(&self, src: &Path, dst: &Path) -> Result<WalkReport, WalkError> {
        if !src.is_dir() {
            return Err(WalkError::SourceMissing {
                path: src.to_path_buf(),
            });
        }
        create_dir(dst)?;

        let mut report = WalkReport::default();
        let jobs = self.plan(src, dst, &mut report)?;
        tracing::debug!(files = jobs.len(), directories = report.directories, "walking tree");

        let results: Vec<Option<Result<FileOutcome, TransformError>>> = if self.options.parallel {
            jobs.par_iter().map(|job| self.run_job(job)).collect()
        } else {
            jobs.iter().map(|job| self.run_job(job)).collect()
        };

        let mut remaining = 0;
        for (job, result) in jobs.iter().zip(results) {
            match result {
                Some(result) => report.record(&job.src, result),
                None => remaining += 1,
            }
        }
        if remaining > 0 {
            return Err(WalkError::DeadlineExceeded { remaining });
        }
        Ok(report)
    }

    /// Create the mirrored directories and list the files
    fn plan(&self, src: &Path, dst: &Path, report: &mut WalkReport) -> Result<Vec<Job>, WalkError> {
        let mut jobs = Vec::new();
        let walker = WalkDir::new(src)
            .min_depth(1)
            .follow_links(self.options.follow_symlinks)
            .sort_by_file_name();

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    let path = err
                        .path()
                        .map(Path::to_path_buf)
                        .unwrap_or_else(|| src.to_path_buf());
                    if err.loop_ancestor().is_some() {
                        tracing::warn!(path = %path.display(), "symlink loop, skipping");
                        report.skipped.push(path);
                    } else {
                        tracing::error!(
                            path = %path.display(),
                            error = %err,
                            "failed to read entry"
                        );
                        report.failed.push(FailedFile {
                            path,
                            error: err.to_string(),
                        });
                    }
                    continue;
                }
            };

            let Ok(relative) = entry.path().strip_prefix(src) else {
                continue;
            };
            let target = dst.join(relative);
            let file_type = entry.file_type();

            if file_type.is_dir() {
                create_dir(&target)?;
                report.directories += 1;
            } else if file_type.is_file() {
                jobs.push(Job {
                    src: entry.path().to_path_buf(),
                    dst: target,
                });
            } else if file_type.is_symlink() {
                // Unfollowed link: files are copied through it, directories are not entered
                match fs::metadata(entry.path()) {
                    Ok(meta) if meta.is_file() => jobs.push(Job {
                        src: entry.path().to_path_buf(),
                        dst: target,
                    }),
                    _ => {
                        tracing::warn!(
                            path = %entry.path().display(),
                            "symlink not followed, skipping"
                        );
                        report.skipped.push(entry.path().to_path_buf());
                    }
                }
            }
        }
        Ok(jobs)
    }

    /// `None` when the deadline passed before the job started
    fn run_job(&self, job: &Job) -> Option<Result<FileOutcome, TransformError>> {
        if self.options.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            return None;
        }
        Some(self.transformer.transform_file(&job.src, &job.dst))
    }
}

fn create_dir(path: &Path) -> Result<(), WalkError> {
    fs::create_dir_all(path).map_err(|source| WalkError::CreateDir {
        path: path.to_path_buf(),
        source,
    })
}
