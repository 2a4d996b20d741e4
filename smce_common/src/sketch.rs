//! Sketch compile configuration and the Arduino library sum type.

use crate::config::{ConfigError, ConfigLoader};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One Arduino library the sketch depends on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SketchLibrary {
    /// Registry library fetched by the build tool; empty version means
    /// "latest".
    Remote {
        /// Registry name.
        name: String,
        /// Exact version, or empty for unpinned.
        #[serde(default)]
        version: String,
    },
    /// Library rooted in a host directory. A non-empty `patch_for` turns it
    /// into a patch overlay applied on top of the named remote library.
    Local {
        /// Library root directory on the host.
        root_dir: PathBuf,
        /// Name of the remote library this patches, or empty.
        #[serde(default)]
        patch_for: String,
    },
    /// Header-only library vendored with the sketch; contributes nothing to
    /// the build-tool argument lists.
    Freestanding,
}

/// Sketch compile settings handed to [`assemble`](LibraryLists::assemble)
/// and the build driver.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SketchConfig {
    /// Libraries visible to the sketch preprocessor.
    #[serde(default)]
    pub preproc_libs: Vec<SketchLibrary>,
    /// Libraries compiled and linked into the sketch executable.
    #[serde(default)]
    pub complink_libs: Vec<SketchLibrary>,
}

impl ConfigLoader for SketchConfig {}

/// The four semicolon-delimited library lists passed to the configure tool.
///
/// Grammar per entry:
/// - `preproc_remote` / `complink_remote`: `name` or `name@version`
/// - `complink_local`: `<abs-path>`
/// - `complink_patch`: `<abs-path>|<name>`
///
/// A patched local library registers its target name (with a trailing
/// space, no version) in `complink_remote` in addition to its
/// `complink_patch` entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LibraryLists {
    /// Remote libraries for the preprocessing pass.
    pub preproc_remote: String,
    /// Remote libraries for compile and link.
    pub complink_remote: String,
    /// Unmodified local libraries for compile and link.
    pub complink_local: String,
    /// Patch overlays targeting remote libraries.
    pub complink_patch: String,
}

impl LibraryLists {
    /// Render the library lists of a sketch configuration.
    ///
    /// Trailing `;` separators are trimmed from each list. Fails with
    /// [`ConfigError::PathEncoding`] when a local library root is not
    /// representable as unicode.
    pub fn assemble(conf: &SketchConfig) -> Result<Self, ConfigError> {
        let mut lists = Self::default();

        for lib in &conf.preproc_libs {
            if let SketchLibrary::Remote { name, version } = lib {
                push_remote(&mut lists.preproc_remote, name, version);
            }
        }

        for lib in &conf.complink_libs {
            match lib {
                SketchLibrary::Remote { name, version } => {
                    push_remote(&mut lists.complink_remote, name, version);
                }
                SketchLibrary::Local { root_dir, patch_for } => {
                    let root = root_dir
                        .to_str()
                        .ok_or_else(|| ConfigError::PathEncoding(root_dir.clone()))?;
                    if patch_for.is_empty() {
                        lists.complink_local.push_str(root);
                        lists.complink_local.push(';');
                    } else {
                        lists.complink_remote.push_str(patch_for);
                        lists.complink_remote.push(' ');
                        lists.complink_patch.push_str(root);
                        lists.complink_patch.push('|');
                        lists.complink_patch.push_str(patch_for);
                        lists.complink_patch.push(';');
                    }
                }
                SketchLibrary::Freestanding => {}
            }
        }

        for list in [
            &mut lists.preproc_remote,
            &mut lists.complink_remote,
            &mut lists.complink_local,
            &mut lists.complink_patch,
        ] {
            if list.ends_with(';') {
                list.pop();
            }
        }

        Ok(lists)
    }
}

fn push_remote(list: &mut String, name: &str, version: &str) {
    list.push_str(name);
    if !version.is_empty() {
        list.push('@');
        list.push_str(version);
    }
    list.push(';');
}
