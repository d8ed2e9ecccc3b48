//! Per-job working copies of exercise templates.
//!
//! Each exercise has a pre-built project under the templates directory. A
//! job gets its own recursive copy under the builds directory, and the
//! submitted source is spliced into the target file between two fixed
//! marker lines.

use std::path::{Path, PathBuf};

use super::error::BuildError;

/// Marker after which the submitted source is inserted.
pub const CODE_START_MARKER: &str = "---Code starts here---";

/// Marker before which the submitted source ends.
pub const CODE_END_MARKER: &str = "---User code ends here---";

/// Splice `source` between the two markers of `template`.
///
/// Everything up to and including [`CODE_START_MARKER`] is kept, followed by
/// the source on its own lines, followed by everything from
/// [`CODE_END_MARKER`] onwards. Returns `None` if either marker is missing
/// (the end marker must come after the start marker).
pub fn inject_source(template: &str, source: &str) -> Option<String> {
    let start = template.find(CODE_START_MARKER)? + CODE_START_MARKER.len();
    let end = start + template[start..].find(CODE_END_MARKER)?;

    Some(format!("{}\n{source}\n{}", &template[..start], &template[end..]))
}

/// Exercise names double as directory names, so they are restricted to
/// `[A-Za-z0-9_-]+`.
pub fn is_valid_exercise_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Prepares isolated working directories from exercise templates.
#[derive(Debug, Clone)]
pub struct TemplateWorkspace {
    templates_dir: PathBuf,
    builds_dir: PathBuf,
    target_file: PathBuf,
}

impl TemplateWorkspace {
    /// `target_file` is relative to the template root.
    pub fn new(
        templates_dir: impl Into<PathBuf>,
        builds_dir: impl Into<PathBuf>,
        target_file: impl Into<PathBuf>,
    ) -> Self {
        Self {
            templates_dir: templates_dir.into(),
            builds_dir: builds_dir.into(),
            target_file: target_file.into(),
        }
    }

    pub fn template_dir(&self, exercise: &str) -> PathBuf {
        self.templates_dir.join(exercise)
    }

    pub fn working_dir(&self, job_id: &str) -> PathBuf {
        self.builds_dir.join(job_id)
    }

    /// Check that `exercise` is well formed and has a template.
    ///
    /// Called synchronously on submission, before a job is allocated.
    pub fn ensure_exercise(&self, exercise: &str) -> Result<(), BuildError> {
        if !is_valid_exercise_name(exercise) {
            return Err(BuildError::InvalidInput(format!(
                "Invalid exercise name '{exercise}'"
            )));
        }
        if !self.template_dir(exercise).is_dir() {
            return Err(BuildError::UnknownExercise(exercise.to_string()));
        }
        Ok(())
    }

    /// Copy the exercise template to a fresh working directory for `job_id`
    /// and inject `source` into the target file.
    ///
    /// Returns the working directory on success.
    pub async fn prepare(
        &self,
        exercise: &str,
        job_id: &str,
        source: &str,
    ) -> Result<PathBuf, BuildError> {
        let template_dir = self.template_dir(exercise);
        let working_dir = self.working_dir(job_id);

        tracing::info!(
            job_id,
            template = %template_dir.display(),
            working_dir = %working_dir.display(),
            "Copying template",
        );
        copy_dir_recursive(&template_dir, &working_dir)
            .await
            .map_err(|e| BuildError::WorkingDirectoryPrepFailed {
                path: working_dir.clone(),
                source: e,
            })?;

        let target = working_dir.join(&self.target_file);
        let content = tokio::fs::read_to_string(&target)
            .await
            .map_err(|e| BuildError::WorkingDirectoryPrepFailed {
                path: target.clone(),
                source: e,
            })?;
        let injected = inject_source(&content, source)
            .ok_or_else(|| BuildError::TemplateMarkerNotFound {
                path: target.clone(),
            })?;
        tokio::fs::write(&target, injected)
            .await
            .map_err(|e| BuildError::WorkingDirectoryPrepFailed {
                path: target.clone(),
                source: e,
            })?;

        tracing::debug!(job_id, target = %target.display(), "Source injected");
        Ok(working_dir)
    }

    /// Delete the working directory of `job_id`, if any.
    ///
    /// A directory that was never created (or is already gone) is not an
    /// error.
    pub async fn cleanup(&self, job_id: &str) -> std::io::Result<()> {
        let working_dir = self.working_dir(job_id);
        match tokio::fs::remove_dir_all(&working_dir).await {
            Ok(()) => {
                tracing::debug!(job_id, working_dir = %working_dir.display(), "Working directory removed");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// Recursively copy `src` into `dst`, creating `dst` and all subdirectories.
///
/// Symlinks are followed.
async fn copy_dir_recursive(src: &Path, dst: &Path) -> std::io::Result<()> {
    let mut pending = vec![(src.to_path_buf(), dst.to_path_buf())];

    while let Some((from, to)) = pending.pop() {
        tokio::fs::create_dir_all(&to).await?;
        let mut entries = tokio::fs::read_dir(&from).await?;
        while let Some(entry) = entries.next_entry().await? {
            let source_path = entry.path();
            let dest_path = to.join(entry.file_name());
            if tokio::fs::metadata(&source_path).await?.is_dir() {
                pending.push((source_path, dest_path));
            } else {
                tokio::fs::copy(&source_path, &dest_path).await?;
            }
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    const TEMPLATE: &str = "\
module NftMarket.NFT where

-- ---Code starts here---
placeholder = ()
-- ---User code ends here---

main = pure ()
";

    fn setup_template(root: &Path, exercise: &str, content: &str) {
        let src = root.join("templates").join(exercise).join("src/NftMarket");
        std::fs::create_dir_all(&src).expect("create template dirs");
        std::fs::write(src.join("NFT.hs"), content).expect("write target");
        std::fs::write(root.join("templates").join(exercise).join("nft.cabal"), "cabal")
            .expect("write cabal file");
    }

    fn workspace(root: &Path) -> TemplateWorkspace {
        TemplateWorkspace::new(
            root.join("templates"),
            root.join("builds"),
            "src/NftMarket/NFT.hs",
        )
    }

    #[test]
    fn inject_replaces_text_between_markers() {
        let result = inject_source(TEMPLATE, "burn = True").expect("markers present");

        assert!(result.contains("-- ---Code starts here---\nburn = True\n---User code ends here---"));
        assert!(!result.contains("placeholder"));
        assert!(result.starts_with("module NftMarket.NFT where"));
        assert!(result.ends_with("main = pure ()\n"));
    }

    #[test]
    fn inject_requires_both_markers_in_order() {
        assert!(inject_source("no markers", "x").is_none());
        assert!(inject_source(CODE_START_MARKER, "x").is_none());
        assert!(inject_source(CODE_END_MARKER, "x").is_none());
        let reversed = format!("{CODE_END_MARKER}\n{CODE_START_MARKER}");
        assert!(inject_source(&reversed, "x").is_none());
    }

    #[test]
    fn exercise_names_are_restricted() {
        assert!(is_valid_exercise_name("nft-burn"));
        assert!(is_valid_exercise_name("Exercise_2"));
        assert!(!is_valid_exercise_name(""));
        assert!(!is_valid_exercise_name("../etc"));
        assert!(!is_valid_exercise_name("a b"));
    }

    #[test]
    fn ensure_exercise_checks_template_dir() {
        let root = tempfile::tempdir().expect("temp dir");
        setup_template(root.path(), "nft-burn", TEMPLATE);
        let ws = workspace(root.path());

        assert!(ws.ensure_exercise("nft-burn").is_ok());
        assert_matches!(
            ws.ensure_exercise("missing"),
            Err(BuildError::UnknownExercise(name)) if name == "missing"
        );
        assert_matches!(ws.ensure_exercise("../x"), Err(BuildError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn prepare_copies_tree_and_injects_source() {
        let root = tempfile::tempdir().expect("temp dir");
        setup_template(root.path(), "nft-burn", TEMPLATE);
        let ws = workspace(root.path());

        let dir = ws
            .prepare("nft-burn", "nft-burn-1", "burn = True")
            .await
            .expect("prepare");

        assert_eq!(dir, root.path().join("builds/nft-burn-1"));
        assert!(dir.join("nft.cabal").is_file());
        let injected =
            std::fs::read_to_string(dir.join("src/NftMarket/NFT.hs")).expect("read target");
        assert!(injected.contains("burn = True"));

        // The template itself is untouched.
        let original = std::fs::read_to_string(
            root.path().join("templates/nft-burn/src/NftMarket/NFT.hs"),
        )
        .expect("read template");
        assert_eq!(original, TEMPLATE);
    }

    #[tokio::test]
    async fn prepare_without_markers_fails() {
        let root = tempfile::tempdir().expect("temp dir");
        setup_template(root.path(), "broken", "module Broken where\n");
        let ws = workspace(root.path());

        let result = ws.prepare("broken", "broken-1", "x = 1").await;

        assert_matches!(result, Err(BuildError::TemplateMarkerNotFound { .. }));
    }

    #[tokio::test]
    async fn prepare_missing_template_is_prep_failure() {
        let root = tempfile::tempdir().expect("temp dir");
        let ws = workspace(root.path());

        let result = ws.prepare("ghost", "ghost-1", "x = 1").await;

        assert_matches!(result, Err(BuildError::WorkingDirectoryPrepFailed { .. }));
    }

    #[tokio::test]
    async fn cleanup_removes_working_directory() {
        let root = tempfile::tempdir().expect("temp dir");
        setup_template(root.path(), "nft-burn", TEMPLATE);
        let ws = workspace(root.path());
        let dir = ws
            .prepare("nft-burn", "nft-burn-1", "burn = True")
            .await
            .expect("prepare");

        ws.cleanup("nft-burn-1").await.expect("cleanup");

        assert!(!dir.exists());
        assert!(root.path().join("templates/nft-burn/nft.cabal").is_file());
        // Already gone is fine.
        ws.cleanup("nft-burn-1").await.expect("second cleanup");
    }
}
