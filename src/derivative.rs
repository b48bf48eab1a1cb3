//! JP2 derivative generation through the external encoder.
//!
//! The encoder is invoked as `<encoder> <input file>` and must print the
//! path of the file it wrote on stdout and exit zero. It only works on local
//! files, so the master is first copied into a per-page scratch directory.
//! The copy is removed as soon as the encoder returns; the derivative itself
//! is removed when the returned [`Derivative`] is dropped.

use std::path::{Path, PathBuf};
use std::process::Command;

use tempfile::{TempDir, TempPath};
use thiserror::Error;
use tracing::debug;

use crate::models::SourceFile;

#[derive(Debug, Error)]
pub enum DerivativeError {
    #[error("could not stage {path:?} in scratch space: {source}")]
    Stage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not run encoder {encoder:?}: {source}")]
    Launch {
        encoder: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("encoder exited with {status}: {stderr}")]
    Exit { status: String, stderr: String },

    #[error("encoder reported no output file")]
    EmptyOutput,

    #[error("encoder reported {0:?}, which does not exist")]
    MissingOutput(PathBuf),
}

/// A generated derivative, deleted on drop.
#[derive(Debug)]
pub struct Derivative {
    // Field order matters: the file goes before its directory.
    path: TempPath,
    _dir: TempDir,
}

impl Derivative {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The derivative as an attachable source, labelled with its file name.
    pub fn source(&self, mime: &str) -> SourceFile {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        SourceFile::new(self.path.to_path_buf(), name).with_mime(mime)
    }
}

#[derive(Debug, Clone)]
pub struct DerivativeGenerator {
    encoder: PathBuf,
    scratch_dir: PathBuf,
}

impl DerivativeGenerator {
    pub fn new(encoder: impl Into<PathBuf>, scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            encoder: encoder.into(),
            scratch_dir: scratch_dir.into(),
        }
    }

    /// Run the encoder over `master`. `qualifier` (usually the target pid)
    /// keeps scratch names unique per page.
    pub fn make_derivative(
        &self,
        master: &SourceFile,
        qualifier: &str,
    ) -> Result<Derivative, DerivativeError> {
        let stage_err = |path: &Path, source| DerivativeError::Stage {
            path: path.to_path_buf(),
            source,
        };
        std::fs::create_dir_all(&self.scratch_dir).map_err(|e| stage_err(&self.scratch_dir, e))?;
        let dir = tempfile::Builder::new()
            .prefix(&format!("{}-", qualifier))
            .tempdir_in(&self.scratch_dir)
            .map_err(|e| stage_err(&self.scratch_dir, e))?;

        // Only the final component of the recorded name is used.
        let name = Path::new(&master.display_name).file_name().ok_or_else(|| {
            stage_err(
                &master.path,
                std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("no usable file name in {:?}", master.display_name),
                ),
            )
        })?;
        let staged_path = dir.path().join(name);
        let staged = TempPath::try_from_path(&staged_path).map_err(|e| stage_err(&staged_path, e))?;
        std::fs::copy(&master.path, &staged).map_err(|e| stage_err(&master.path, e))?;

        debug!(encoder = %self.encoder.display(), input = %staged.display(), "running encoder");
        let output = Command::new(&self.encoder)
            .arg(&*staged)
            .output()
            .map_err(|source| DerivativeError::Launch {
                encoder: self.encoder.clone(),
                source,
            });
        // The staged master is no longer needed whatever the encoder did.
        drop(staged);
        let output = output?;

        if !output.status.success() {
            return Err(DerivativeError::Exit {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        let reported = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if reported.is_empty() {
            return Err(DerivativeError::EmptyOutput);
        }
        let path = PathBuf::from(reported);
        if !path.is_file() {
            return Err(DerivativeError::MissingOutput(path));
        }
        let path = TempPath::try_from_path(&path).map_err(|e| stage_err(&path, e))?;
        Ok(Derivative { path, _dir: dir })
    }
}

#[cfg(all(test, unix))]
pub(crate) mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    /// Writes an executable shell script standing in for the encoder.
    pub(crate) fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    pub(crate) const JP2_ENCODER: &str = r#"out="${1%.*}.jp2"; cp "$1" "$out" && echo "$out""#;

    fn master(dir: &Path) -> SourceFile {
        let path = dir.join("00000001.tif");
        std::fs::write(&path, b"II*\0tiff").unwrap();
        SourceFile::new(path, "00000001.tif")
    }

    fn entries(dir: &Path) -> usize {
        std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
    }

    #[test]
    fn produces_derivative_and_cleans_up() {
        let tmp = TempDir::new().unwrap();
        let scratch = tmp.path().join("scratch");
        let encoder = script(tmp.path(), "encode", JP2_ENCODER);
        let gen = DerivativeGenerator::new(encoder, &scratch);

        let jp2 = gen.make_derivative(&master(tmp.path()), "hpitt_1").unwrap();
        assert_eq!(std::fs::read(jp2.path()).unwrap(), b"II*\0tiff");
        assert!(!jp2.path().with_extension("tif").exists());
        let source = jp2.source("image/jp2");
        assert_eq!(source.display_name, "00000001.jp2");
        assert_eq!(source.mime_hint.as_deref(), Some("image/jp2"));

        drop(jp2);
        assert_eq!(entries(&scratch), 0);
    }

    #[test]
    fn nonzero_exit_is_reported() {
        let tmp = TempDir::new().unwrap();
        let scratch = tmp.path().join("scratch");
        let encoder = script(tmp.path(), "encode", "echo broken >&2; exit 3");
        let gen = DerivativeGenerator::new(encoder, &scratch);

        match gen.make_derivative(&master(tmp.path()), "hpitt_1") {
            Err(DerivativeError::Exit { stderr, .. }) => assert_eq!(stderr, "broken"),
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(entries(&scratch), 0);
    }

    #[test]
    fn empty_output_is_reported() {
        let tmp = TempDir::new().unwrap();
        let encoder = script(tmp.path(), "encode", "exit 0");
        let gen = DerivativeGenerator::new(encoder, tmp.path().join("scratch"));
        assert!(matches!(
            gen.make_derivative(&master(tmp.path()), "q"),
            Err(DerivativeError::EmptyOutput)
        ));
    }

    #[test]
    fn nonexistent_output_is_reported() {
        let tmp = TempDir::new().unwrap();
        let encoder = script(tmp.path(), "encode", "echo /nonexistent/out.jp2");
        let gen = DerivativeGenerator::new(encoder, tmp.path().join("scratch"));
        assert!(matches!(
            gen.make_derivative(&master(tmp.path()), "q"),
            Err(DerivativeError::MissingOutput(_))
        ));
    }

    #[test]
    fn recorded_name_cannot_leave_the_scratch_dir() {
        let tmp = TempDir::new().unwrap();
        let scratch = tmp.path().join("scratch");
        let encoder = script(tmp.path(), "encode", JP2_ENCODER);
        let gen = DerivativeGenerator::new(encoder, &scratch);
        let mut source = master(tmp.path());
        source.display_name = "../../outside.tif".into();

        let jp2 = gen.make_derivative(&source, "q").unwrap();
        assert!(jp2.path().starts_with(&scratch));
        assert_eq!(jp2.path().file_name().unwrap(), "outside.jp2");
        assert!(!tmp.path().join("outside.tif").exists());
        assert!(!tmp.path().join("outside.jp2").exists());
        drop(jp2);
        assert_eq!(entries(&scratch), 0);
        assert!(tmp.path().join("00000001.tif").exists());
    }

    #[test]
    fn recorded_name_without_file_name_is_a_stage_error() {
        let tmp = TempDir::new().unwrap();
        let encoder = script(tmp.path(), "encode", JP2_ENCODER);
        let gen = DerivativeGenerator::new(encoder, tmp.path().join("scratch"));
        let mut source = master(tmp.path());
        source.display_name = "..".into();
        assert!(matches!(
            gen.make_derivative(&source, "q"),
            Err(DerivativeError::Stage { .. })
        ));
    }

    #[test]
    fn missing_encoder_is_a_launch_error() {
        let tmp = TempDir::new().unwrap();
        let gen = DerivativeGenerator::new(tmp.path().join("nope"), tmp.path().join("scratch"));
        assert!(matches!(
            gen.make_derivative(&master(tmp.path()), "q"),
            Err(DerivativeError::Launch { .. })
        ));
    }
}
