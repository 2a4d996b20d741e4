//! External build-tool driver.
//!
//! Sketch compilation is delegated to CMake: a configure pass runs the SMCE
//! configuration script with the sketch parameters and announces the
//! generated paths through structured marker lines, then a build pass
//! produces the executable. Everything else the tool prints lands in the
//! build log.

use smce_common::config::ConfigError;
use smce_common::consts::BUILD_MARKER_PREFIX;
use smce_common::context::{find_in_path, ExecutionContext};
use smce_common::sketch::{LibraryLists, SketchConfig};
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

/// Error type for build-driver operations.
#[derive(Debug, Error)]
pub enum BuildError {
    /// Configure pass exited non-zero.
    #[error("configure pass failed with exit code {code}")]
    ConfigureFailed {
        /// Tool exit code.
        code: i32,
    },

    /// Build pass exited non-zero.
    #[error("build pass failed with exit code {code}")]
    BuildFailed {
        /// Tool exit code.
        code: i32,
    },

    /// Build pass succeeded but the announced binary does not exist.
    #[error("expected sketch binary missing: {}", .path.display())]
    MissingArtifact {
        /// Announced binary path.
        path: PathBuf,
    },

    /// Configure pass did not announce exactly two paths.
    #[error("configure pass emitted {count} markers, expected 2")]
    MarkerProtocol {
        /// Markers observed.
        count: usize,
    },

    /// A sketch or resource path is not representable as unicode.
    #[error("path is not valid unicode: {}", .path.display())]
    PathEncoding {
        /// Offending path.
        path: PathBuf,
    },

    /// Library-list assembly failed.
    #[error("library lists: {source}")]
    Libraries {
        /// Underlying configuration error.
        #[from]
        source: ConfigError,
    },

    /// Launching or talking to the tool failed.
    #[error("IO error: {source}")]
    Io {
        /// Source IO error.
        #[from]
        source: io::Error,
    },
}

/// Filesystem outputs of a successful configure pass.
///
/// The generated sketch directory is owned and recursively removed on drop;
/// the binary lives wherever the tool announced it.
#[derive(Debug)]
pub struct BuildArtifacts {
    sketch_dir: PathBuf,
    sketch_bin: PathBuf,
}

impl BuildArtifacts {
    /// Generated sketch build directory.
    pub fn sketch_dir(&self) -> &Path {
        &self.sketch_dir
    }

    /// Produced sketch executable.
    pub fn sketch_bin(&self) -> &Path {
        &self.sketch_bin
    }
}

impl Drop for BuildArtifacts {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.sketch_dir);
    }
}

/// Drives the external build tool and accumulates its output.
pub struct BuildDriver {
    exectx: ExecutionContext,
    build_log: Arc<Mutex<Vec<u8>>>,
}

impl BuildDriver {
    /// A driver over the given execution context with an empty build log.
    pub fn new(exectx: ExecutionContext) -> Self {
        Self {
            exectx,
            build_log: Arc::new(Mutex::new(Vec::with_capacity(4096))),
        }
    }

    /// The execution context in use.
    pub fn execution_context(&self) -> &ExecutionContext {
        &self.exectx
    }

    /// Copy of the accumulated build log.
    pub fn log_snapshot(&self) -> Vec<u8> {
        lock_log(&self.build_log).clone()
    }

    /// Discard the accumulated build log.
    pub fn clear_log(&self) {
        lock_log(&self.build_log).clear();
    }

    /// Run the full configure pass, scanning for the two path markers.
    pub fn configure_sketch(
        &self,
        fqbn: &str,
        sketch_id: u64,
        sketch_src: &Path,
        skonf: &SketchConfig,
    ) -> Result<BuildArtifacts, BuildError> {
        let lists = LibraryLists::assemble(skonf)?;
        let sketch_path = generic_path(&std::path::absolute(sketch_src)?)?;
        let smce_dir = generic_path(self.exectx.resource_dir())?;

        let mut cmd = Command::new(self.exectx.cmake_path());
        if let Some(generator) = preferred_generator() {
            cmd.env("CMAKE_GENERATOR", generator);
        }
        cmd.arg(format!("-DSKETCH_IDENT={sketch_id}"))
            .arg(format!("-DSMCE_DIR={smce_dir}"))
            .arg(format!("-DSKETCH_FQBN={fqbn}"))
            .arg(format!("-DSKETCH_PATH={sketch_path}"))
            .arg(format!("-DPREPROC_REMOTE_LIBS={}", lists.preproc_remote))
            .arg(format!("-DCOMPLINK_REMOTE_LIBS={}", lists.complink_remote))
            .arg(format!("-DCOMPLINK_LOCAL_LIBS={}", lists.complink_local))
            .arg(format!("-DCOMPLINK_PATCH_LIBS={}", lists.complink_patch))
            .arg("-P")
            .arg(self.exectx.configure_script());

        tracing::info!(fqbn, sketch_id, "configuring sketch");
        let (mut child, reader) = spawn_merged(cmd)?;

        let mut markers: Vec<String> = Vec::new();
        for line in reader.lines() {
            let line = line?;
            match marker_payload(&line) {
                Some(payload) if markers.len() < 2 => markers.push(payload.to_string()),
                Some(payload) => {
                    debug_assert!(false, "third configure marker: {payload}");
                    tracing::warn!(payload, "extra configure marker ignored");
                }
                None => self.append_log_line(&line),
            }
        }

        let status = child.wait()?;
        if !status.success() {
            return Err(BuildError::ConfigureFailed {
                code: status.code().unwrap_or(-1),
            });
        }
        if markers.len() != 2 {
            return Err(BuildError::MarkerProtocol {
                count: markers.len(),
            });
        }

        let mut payloads = markers.into_iter();
        let sketch_dir = PathBuf::from(payloads.next().unwrap_or_default());
        let sketch_bin = PathBuf::from(payloads.next().unwrap_or_default());
        tracing::debug!(?sketch_dir, ?sketch_bin, "configure markers parsed");
        Ok(BuildArtifacts {
            sketch_dir,
            sketch_bin,
        })
    }

    /// Re-run the configure pass with the reduced argument set.
    ///
    /// Used by rebuild: the generated paths are already known, so marker
    /// output is treated as ordinary log content.
    pub fn reconfigure(
        &self,
        fqbn: &str,
        sketch_id: u64,
        sketch_src: &Path,
    ) -> Result<(), BuildError> {
        let sketch_path = generic_path(&std::path::absolute(sketch_src)?)?;
        let smce_dir = generic_path(self.exectx.resource_dir())?;

        let mut cmd = Command::new(self.exectx.cmake_path());
        cmd.arg(format!("-DSMCE_DIR={smce_dir}"))
            .arg(format!("-DSKETCH_IDENT={sketch_id}"))
            .arg(format!("-DSKETCH_FQBN={fqbn}"))
            .arg(format!("-DSKETCH_PATH={sketch_path}"))
            .arg("-P")
            .arg(self.exectx.configure_script());

        tracing::info!(fqbn, sketch_id, "reconfiguring sketch");
        let status = self.run_logged(cmd)?;
        if !status.success() {
            return Err(BuildError::ConfigureFailed {
                code: status.code().unwrap_or(-1),
            });
        }
        Ok(())
    }

    /// Run the build pass over previously configured artifacts.
    pub fn build(&self, artifacts: &BuildArtifacts) -> Result<(), BuildError> {
        let mut cmd = Command::new(self.exectx.cmake_path());
        cmd.arg("--build").arg(artifacts.sketch_dir().join("build"));

        tracing::info!(sketch_dir = ?artifacts.sketch_dir(), "building sketch");
        let status = self.run_logged(cmd)?;
        if !status.success() {
            return Err(BuildError::BuildFailed {
                code: status.code().unwrap_or(-1),
            });
        }
        if !artifacts.sketch_bin().exists() {
            return Err(BuildError::MissingArtifact {
                path: artifacts.sketch_bin().to_path_buf(),
            });
        }
        Ok(())
    }

    /// Run the tool to completion, appending every output line to the log.
    fn run_logged(&self, cmd: Command) -> Result<ExitStatus, BuildError> {
        let (mut child, reader) = spawn_merged(cmd)?;
        for line in reader.lines() {
            self.append_log_line(&line?);
        }
        Ok(child.wait()?)
    }

    fn append_log_line(&self, line: &str) {
        let mut log = lock_log(&self.build_log);
        log.extend_from_slice(line.as_bytes());
        log.push(b'\n');
    }
}

/// Lock a log buffer, recovering the contents if a writer panicked.
pub(crate) fn lock_log(log: &Mutex<Vec<u8>>) -> MutexGuard<'_, Vec<u8>> {
    log.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Render a path for the tool command line: unicode, forward slashes only.
fn generic_path(path: &Path) -> Result<String, BuildError> {
    let s = path.to_str().ok_or_else(|| BuildError::PathEncoding {
        path: path.to_path_buf(),
    })?;
    Ok(s.replace('\\', "/"))
}

/// Extract the first double-quoted substring of a marker line.
fn marker_payload(line: &str) -> Option<&str> {
    let rest = line.strip_prefix(BUILD_MARKER_PREFIX)?;
    let start = rest.find('"')? + 1;
    let len = rest[start..].find('"')?;
    Some(&rest[start..start + len])
}

/// Generator handed to the configure pass: an environment override wins,
/// otherwise Ninja when available.
fn preferred_generator() -> Option<String> {
    match std::env::var("CMAKE_GENERATOR") {
        Ok(generator) if !generator.is_empty() => Some(generator),
        _ => find_in_path("ninja").map(|_| "Ninja".to_string()),
    }
}

/// Spawn with stdout and stderr merged into one pipe.
fn spawn_merged(mut cmd: Command) -> io::Result<(Child, BufReader<File>)> {
    let (read_fd, write_fd) = nix::unistd::pipe().map_err(io::Error::from)?;
    let write_clone = write_fd.try_clone()?;
    cmd.stdin(Stdio::null())
        .stdout(Stdio::from(write_clone))
        .stderr(Stdio::from(write_fd));
    let child = cmd.spawn()?;
    // Drop the command so the parent's copies of the write end close and
    // the reader sees EOF when the child exits.
    drop(cmd);
    Ok((child, BufReader::new(File::from(read_fd))))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marker_payload_extracted() {
        assert_eq!(
            marker_payload(r#"-- SMCE: "/tmp/smce/sketches/1""#),
            Some("/tmp/smce/sketches/1")
        );
    }

    #[test]
    fn non_marker_lines_rejected() {
        assert_eq!(marker_payload("-- Configuring done"), None);
        assert_eq!(marker_payload("SMCE: \"x\""), None);
        assert_eq!(marker_payload(""), None);
    }

    #[test]
    fn malformed_marker_without_quotes() {
        assert_eq!(marker_payload("-- SMCE: no quotes here"), None);
        assert_eq!(marker_payload("-- SMCE: \"unterminated"), None);
    }

    #[test]
    fn payload_is_first_quoted_substring() {
        assert_eq!(marker_payload(r#"-- SMCE: "a" then "b""#), Some("a"));
        assert_eq!(marker_payload(r#"-- SMCE: """#), Some(""));
    }
}
