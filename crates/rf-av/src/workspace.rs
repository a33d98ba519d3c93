//! Per-job working directories.
//!
//! A [`JobWorkspace`] owns `<work_root>/<job_id>/`. The source artifact is
//! copied in under a fixed relative name so the external tool can be run
//! with the directory as its working directory, and the result is moved out
//! to the outputs directory when the job succeeds. The directory is removed
//! when the workspace is dropped, whatever the outcome.

use std::fs;
use std::path::{Path, PathBuf};

use rf_core::JobId;

/// Base name of the staged source inside a job directory.
const SOURCE_STEM: &str = "source";

/// Base name of the result the external tool writes inside a job directory.
const OUTPUT_STEM: &str = "output";

/// Isolated working directory for a single job.
///
/// # Example
///
/// ```no_run
/// use rf_av::JobWorkspace;
/// use rf_core::JobId;
/// use std::path::Path;
///
/// # fn example() -> rf_core::Result<()> {
/// let job_id = JobId::new();
/// let mut ws = JobWorkspace::create(Path::new("/tmp/work"), job_id)?;
/// ws.stage_source(Path::new("/uploads/clip.MOV"))?;
/// assert_eq!(ws.source_name(), Some("source.mov"));
/// // ... run the tool, which writes ws.output_path("mp4") ...
/// ws.publish("mp4", Path::new("/outputs"), &format!("{job_id}.mp4"))?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct JobWorkspace {
    dir: PathBuf,
    source_name: Option<String>,
}

impl JobWorkspace {
    /// Create `<work_root>/<job_id>/`, along with any missing parents.
    pub fn create(work_root: &Path, job_id: JobId) -> rf_core::Result<Self> {
        let dir = work_root.join(job_id.to_string());
        fs::create_dir_all(&dir)
            .map_err(|e| rf_core::Error::resource("create job directory", e))?;

        tracing::debug!(job_id = %job_id, dir = %dir.display(), "job workspace created");

        Ok(Self {
            dir,
            source_name: None,
        })
    }

    /// Path of the job directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Copy the source artifact into the job directory as `source.<ext>`.
    ///
    /// The extension is lower-cased; a source without one is staged as
    /// plain `source`. Returns the relative name used.
    pub fn stage_source(&mut self, source: &Path) -> rf_core::Result<&str> {
        let name = staged_name(SOURCE_STEM, source_extension(source).as_deref());
        fs::copy(source, self.dir.join(&name))
            .map_err(|e| rf_core::Error::resource("stage source", e))?;
        Ok(self.source_name.insert(name).as_str())
    }

    /// Relative name of the staged source, once [`stage_source`](Self::stage_source) ran.
    pub fn source_name(&self) -> Option<&str> {
        self.source_name.as_deref()
    }

    /// Relative name of the result file for the given extension.
    pub fn output_name(ext: &str) -> String {
        staged_name(OUTPUT_STEM, Some(ext))
    }

    /// Absolute path of the result file for the given extension.
    pub fn output_path(&self, ext: &str) -> PathBuf {
        self.dir.join(Self::output_name(ext))
    }

    /// Whether the tool left a non-empty result file behind.
    pub fn has_output(&self, ext: &str) -> bool {
        fs::metadata(self.output_path(ext))
            .map(|m| m.is_file() && m.len() > 0)
            .unwrap_or(false)
    }

    /// Move the result into `outputs_dir/file_name` and return its path.
    ///
    /// Tries a rename first and falls back to copy + remove when the two
    /// directories live on different filesystems. A partially copied file is
    /// removed before the error is returned.
    pub fn publish(
        &self,
        ext: &str,
        outputs_dir: &Path,
        file_name: &str,
    ) -> rf_core::Result<PathBuf> {
        let output = self.output_path(ext);
        let dest = outputs_dir.join(file_name);

        fs::create_dir_all(outputs_dir)
            .map_err(|e| rf_core::Error::resource("create outputs directory", e))?;

        if fs::rename(&output, &dest).is_err() {
            if let Err(e) = fs::copy(&output, &dest) {
                let _ = fs::remove_file(&dest);
                return Err(rf_core::Error::resource("publish result", e));
            }
            let _ = fs::remove_file(&output);
        }

        Ok(dest)
    }
}

impl Drop for JobWorkspace {
    fn drop(&mut self) {
        match fs::remove_dir_all(&self.dir) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(dir = %self.dir.display(), "failed to remove job workspace: {e}");
            }
        }
    }
}

fn source_extension(path: &Path) -> Option<String> {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .filter(|e| !e.is_empty())
}

fn staged_name(stem: &str, ext: Option<&str>) -> String {
    match ext {
        Some(ext) => format!("{stem}.{ext}"),
        None => stem.to_string(),
    }
}
