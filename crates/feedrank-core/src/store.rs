//! Named, reloadable algorithm artifacts.
//!
//! Each saved algorithm is two files under the store root:
//!
//! ```text
//! artifacts/<encoded-name>/<digest>.json   full definition: weights, display names, implementation keys
//! index/<encoded-name>.json                metadata record: name, description, artifact location, checksum
//! ```
//!
//! Artifacts hold symbolic implementation keys, never code. An artifact file
//! is named after a prefix of its own blake3 digest, so a new version never
//! overwrites the bytes the current index record points at. Every write goes
//! to a `.tmp` sibling first and is renamed over the target, and renaming the
//! index record is the commit point of a save: a save that fails before it
//! leaves the previously saved version loadable. The superseded artifact is
//! deleted only after the commit. Saving an existing name replaces it.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde::{Deserialize, Serialize};
use serde_json::error::Category;
use tracing::{debug, info, instrument, warn};

use crate::algorithm::Algorithm;
use crate::error::Error;
use crate::function::{ScoringFunction, WeightedScoringFunction};
use crate::registry::FunctionRegistry;

/// Artifact layout version written by this build.
pub const FORMAT_VERSION: u32 = 1;

const ARTIFACTS_DIR: &str = "artifacts";
const INDEX_DIR: &str = "index";
const CHECKSUM_PREFIX: &str = "blake3:";
/// Hex digits of the artifact digest used in its file name.
const DIGEST_PREFIX_LEN: usize = 16;

/// Bytes left unescaped in on-disk names. `.` is escaped so no name can
/// encode to `.` or `..`.
const NAME_SET: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'_');

/// Discoverable index entry for one saved algorithm.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedAlgorithmMetadata {
    pub name: String,
    pub description: String,
    /// Artifact path, relative to the store root.
    pub artifact_location: PathBuf,
    pub function_count: usize,
    pub saved_at: DateTime<Utc>,
    /// `blake3:<hex>` digest of the artifact bytes.
    pub checksum: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct AlgorithmArtifact {
    format_version: u32,
    name: String,
    description: String,
    functions: Vec<WeightedFunctionArtifact>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct WeightedFunctionArtifact {
    display_name: String,
    weight: f64,
    function: FunctionArtifact,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct FunctionArtifact {
    name: String,
    description: String,
    implementation: String,
}

impl From<&Algorithm> for AlgorithmArtifact {
    fn from(algorithm: &Algorithm) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            name: algorithm.name().to_string(),
            description: algorithm.description().to_string(),
            functions: algorithm
                .functions()
                .iter()
                .map(|weighted| WeightedFunctionArtifact {
                    display_name: weighted.display_name().to_string(),
                    weight: weighted.weight(),
                    function: FunctionArtifact {
                        name: weighted.function().name().to_string(),
                        description: weighted.function().description().to_string(),
                        implementation: weighted.function().implementation().to_string(),
                    },
                })
                .collect(),
        }
    }
}

/// Filesystem-backed store of algorithm artifacts.
#[derive(Debug, Clone)]
pub struct AlgorithmStore {
    root: PathBuf,
}

impl AlgorithmStore {
    /// Open a store rooted at `root`. Directories are created on first save.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Persist `algorithm`, replacing any artifact saved under the same name.
    ///
    /// # Errors
    ///
    /// [`Error::Io`] if either file cannot be written. The previously saved
    /// version, if any, is still the one [`AlgorithmStore::load_by_name`]
    /// returns.
    #[instrument(skip_all, fields(algorithm = %algorithm.name()))]
    pub fn save(&self, algorithm: &Algorithm) -> Result<PersistedAlgorithmMetadata, Error> {
        let name = algorithm.name();
        let artifact_dir = artifact_dir(name);
        let body = serde_json::to_vec_pretty(&AlgorithmArtifact::from(algorithm)).map_err(
            |err| Error::Corrupt {
                path: self.root.join(&artifact_dir),
                reason: format!("failed to serialize artifact: {err}"),
            },
        )?;
        let digest = blake3::hash(&body).to_hex();
        let artifact_location =
            artifact_dir.join(format!("{}.json", &digest[..DIGEST_PREFIX_LEN]));
        let artifact_path = self.root.join(&artifact_location);

        // An unreadable previous record is simply replaced.
        let current = self.metadata(name).ok().map(|record| record.artifact_location);
        let keep_on_failure = current.as_ref() == Some(&artifact_location);
        let previous = current.filter(|location| *location != artifact_location);

        write_atomic(&artifact_path, &body)?;

        let metadata = PersistedAlgorithmMetadata {
            name: name.to_string(),
            description: algorithm.description().to_string(),
            artifact_location,
            function_count: algorithm.functions().len(),
            saved_at: Utc::now(),
            checksum: format!("{CHECKSUM_PREFIX}{digest}"),
        };

        let index_path = self.index_path(name);
        let committed = serde_json::to_vec_pretty(&metadata)
            .map_err(|err| Error::Corrupt {
                path: index_path.clone(),
                reason: format!("failed to serialize metadata: {err}"),
            })
            .and_then(|record| write_atomic(&index_path, &record));
        if let Err(err) = committed {
            if !keep_on_failure {
                discard(&artifact_path);
            }
            return Err(err);
        }

        if let Some(previous) = previous.filter(|location| is_artifact_of(location, name)) {
            discard(&self.root.join(previous));
        }

        info!(path = %artifact_path.display(), bytes = body.len(), "saved algorithm");
        Ok(metadata)
    }

    /// Rebuild the algorithm a metadata record points at, resolving every
    /// implementation key against `registry`.
    ///
    /// # Errors
    ///
    /// - [`Error::Io`] if the artifact cannot be read.
    /// - [`Error::Corrupt`] if its bytes do not match the recorded checksum or
    ///   are not valid JSON.
    /// - [`Error::Schema`] if the JSON does not describe a valid algorithm.
    /// - [`Error::Registration`] if an implementation key is not registered.
    #[instrument(skip_all, fields(algorithm = %metadata.name))]
    pub fn load(
        &self,
        metadata: &PersistedAlgorithmMetadata,
        registry: &FunctionRegistry,
    ) -> Result<Algorithm, Error> {
        let path = self.root.join(&metadata.artifact_location);
        let bytes = fs::read(&path).map_err(|source| Error::Io {
            path: path.clone(),
            source,
        })?;

        let actual = checksum(&bytes);
        if actual != metadata.checksum {
            return Err(Error::Corrupt {
                path,
                reason: format!("checksum {actual} does not match {}", metadata.checksum),
            });
        }

        let artifact: AlgorithmArtifact =
            serde_json::from_slice(&bytes).map_err(|err| parse_error(&path, &err))?;
        if artifact.format_version != FORMAT_VERSION {
            return Err(Error::Schema {
                path,
                reason: format!(
                    "unsupported format_version {} (expected {FORMAT_VERSION})",
                    artifact.format_version
                ),
            });
        }
        if artifact.name != metadata.name {
            return Err(Error::Schema {
                path,
                reason: format!(
                    "artifact is named `{}` but indexed as `{}`",
                    artifact.name, metadata.name
                ),
            });
        }

        let algorithm = build_algorithm(artifact, registry).map_err(|err| match err {
            Error::Configuration { reason, .. } => Error::Schema {
                path: path.clone(),
                reason: reason.to_string(),
            },
            other => other,
        })?;

        debug!(
            functions = algorithm.functions().len(),
            "loaded algorithm"
        );
        Ok(algorithm)
    }

    /// Look up `name` in the index and load its artifact.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] if nothing is saved under `name`; otherwise as
    /// [`AlgorithmStore::load`].
    pub fn load_by_name(&self, name: &str, registry: &FunctionRegistry) -> Result<Algorithm, Error> {
        let metadata = self.metadata(name)?;
        self.load(&metadata, registry)
    }

    /// Read the metadata record for `name`.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] if nothing is saved under `name`, [`Error::Io`] or
    /// [`Error::Corrupt`] if the record cannot be read.
    pub fn metadata(&self, name: &str) -> Result<PersistedAlgorithmMetadata, Error> {
        let path = self.index_path(name);
        match fs::read(&path) {
            Ok(bytes) => parse_metadata(&path, &bytes),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Err(Error::NotFound {
                name: name.to_string(),
            }),
            Err(source) => Err(Error::Io { path, source }),
        }
    }

    /// Every saved algorithm's metadata, sorted by name.
    ///
    /// # Errors
    ///
    /// [`Error::Io`] if the index cannot be read, [`Error::Corrupt`] for an
    /// unreadable record. Records are never skipped silently.
    pub fn list(&self) -> Result<Vec<PersistedAlgorithmMetadata>, Error> {
        let index_dir = self.root.join(INDEX_DIR);
        let entries = match fs::read_dir(&index_dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(Error::Io {
                    path: index_dir,
                    source,
                });
            }
        };

        let mut records = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| Error::Io {
                path: index_dir.clone(),
                source,
            })?;
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }

            let bytes = fs::read(&path).map_err(|source| Error::Io {
                path: path.clone(),
                source,
            })?;
            records.push(parse_metadata(&path, &bytes)?);
        }

        records.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(records)
    }

    /// Delete `name`'s index record and artifacts. Returns whether anything
    /// was saved under that name.
    ///
    /// # Errors
    ///
    /// [`Error::Io`] if a file exists but cannot be removed.
    pub fn remove(&self, name: &str) -> Result<bool, Error> {
        if name.is_empty() {
            return Ok(false);
        }

        let index_removed = remove_if_exists(&self.index_path(name))?;
        let artifact_dir = self.root.join(artifact_dir(name));
        let artifact_removed = match fs::remove_dir_all(&artifact_dir) {
            Ok(()) => true,
            Err(err) if err.kind() == io::ErrorKind::NotFound => false,
            Err(source) => {
                return Err(Error::Io {
                    path: artifact_dir,
                    source,
                });
            }
        };

        if index_removed || artifact_removed {
            info!(algorithm = name, "removed algorithm");
        }
        Ok(index_removed || artifact_removed)
    }

    fn index_path(&self, name: &str) -> PathBuf {
        self.root
            .join(INDEX_DIR)
            .join(format!("{}.json", encode_name(name)))
    }
}

fn build_algorithm(
    artifact: AlgorithmArtifact,
    registry: &FunctionRegistry,
) -> Result<Algorithm, Error> {
    let functions = artifact
        .functions
        .into_iter()
        .map(|entry| {
            let computation = registry.resolve(&entry.function.implementation).ok_or_else(|| {
                Error::Registration {
                    key: entry.function.implementation.clone(),
                    function: entry.function.name.clone(),
                }
            })?;
            let function = ScoringFunction::new(
                entry.function.name,
                entry.function.description,
                computation,
            );
            Ok(WeightedScoringFunction::named(
                entry.display_name,
                entry.weight,
                function,
            ))
        })
        .collect::<Result<Vec<_>, Error>>()?;

    Algorithm::new(artifact.name, artifact.description, functions)
}

fn parse_metadata(path: &Path, bytes: &[u8]) -> Result<PersistedAlgorithmMetadata, Error> {
    serde_json::from_slice(bytes).map_err(|err| Error::Corrupt {
        path: path.to_path_buf(),
        reason: format!("unreadable metadata record: {err}"),
    })
}

fn parse_error(path: &Path, err: &serde_json::Error) -> Error {
    match err.classify() {
        Category::Data => Error::Schema {
            path: path.to_path_buf(),
            reason: err.to_string(),
        },
        Category::Io | Category::Syntax | Category::Eof => Error::Corrupt {
            path: path.to_path_buf(),
            reason: err.to_string(),
        },
    }
}

fn write_atomic(path: &Path, body: &[u8]) -> Result<(), Error> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_error(parent))?;
    }

    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, body).map_err(io_error(&tmp_path))?;
    fs::rename(&tmp_path, path).map_err(io_error(path))?;
    Ok(())
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> Error + use<> {
    let path = path.to_path_buf();
    move |source| Error::Io { path, source }
}

fn remove_if_exists(path: &Path) -> Result<bool, Error> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(source) => Err(Error::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Best-effort delete of an artifact no record points at.
fn discard(path: &Path) {
    if let Err(err) = remove_if_exists(path) {
        warn!(error = %err, "failed to delete unused artifact");
    }
}

fn checksum(bytes: &[u8]) -> String {
    format!("{CHECKSUM_PREFIX}{}", blake3::hash(bytes).to_hex())
}

/// Directory, relative to the store root, holding `name`'s artifacts.
fn artifact_dir(name: &str) -> PathBuf {
    Path::new(ARTIFACTS_DIR).join(encode_name(name))
}

/// Whether `location` is a file directly inside `name`'s artifact directory.
fn is_artifact_of(location: &Path, name: &str) -> bool {
    location.parent() == Some(artifact_dir(name).as_path())
        && location
            .file_name()
            .and_then(|file| file.to_str())
            .is_some_and(|file| file.ends_with(".json"))
}

fn encode_name(name: &str) -> String {
    utf8_percent_encode(name, NAME_SET).to_string()
}
