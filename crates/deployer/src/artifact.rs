//! Access to compiled contract artifacts in the Hardhat build output layout:
//!
//! ```text
//! artifacts/
//!   build-info/<id>.json
//!   contracts/Token.sol/Token.json
//!   contracts/Token.sol/Token.dbg.json
//! ```

use {
    alloy::{
        json_abi::JsonAbi,
        primitives::{Bytes, hex::FromHexError},
    },
    serde::{Deserialize, de::DeserializeOwned},
    std::path::{Path, PathBuf},
    thiserror::Error,
    walkdir::WalkDir,
};

const BUILD_INFO_DIR: &str = "build-info";

#[derive(Debug, Error)]
pub enum Error {
    #[error("Artifact for contract {0:?} not found")]
    NotFound(String),

    #[error("multiple artifacts for contract {name:?}, use a fully qualified name: {candidates:?}")]
    Ambiguous {
        name: String,
        candidates: Vec<String>,
    },

    #[error("failed to read {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed file {}", .path.display())]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid bytecode for contract {name}")]
    InvalidBytecode {
        name: String,
        #[source]
        source: FromHexError,
    },

    #[error("contract {0} has no bytecode, it might be abstract or an interface")]
    EmptyBytecode(String),

    #[error("contract {0} needs library linking, which is not supported")]
    UnlinkedLibraries(String),
}

/// A compiled contract ready to be deployed.
#[derive(Clone, Debug, PartialEq)]
pub struct Artifact {
    pub contract_name: String,
    pub source_name: String,
    pub abi: JsonAbi,
    /// Creation bytecode without constructor arguments.
    pub bytecode: Bytes,
    /// File the artifact was read from.
    pub path: PathBuf,
}

impl Artifact {
    /// Name in the `<source>:<contract>` format used by compilers and
    /// explorers.
    pub fn fully_qualified_name(&self) -> String {
        format!("{}:{}", self.source_name, self.contract_name)
    }
}

/// Compiler input and version an artifact was built with. Needed to verify
/// the contract source with an explorer.
#[derive(Clone, Debug, PartialEq)]
pub struct BuildInfo {
    pub solc_long_version: String,
    /// Solidity standard JSON compiler input.
    pub input: serde_json::Value,
}

impl BuildInfo {
    /// Compiler version in the format explorers expect, e.g.
    /// `v0.8.24+commit.e11b9ed9`.
    pub fn compiler_version(&self) -> String {
        format!("v{}", self.solc_long_version)
    }
}

#[cfg_attr(test, mockall::automock)]
pub trait ArtifactStore: Send + Sync {
    /// Reads the artifact for a contract name or a fully qualified
    /// `<source>:<contract>` name.
    fn read_artifact(&self, name: &str) -> Result<Artifact, Error>;

    fn read_build_info(&self, artifact: &Artifact) -> Result<BuildInfo, Error>;
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawArtifact {
    contract_name: String,
    source_name: String,
    abi: JsonAbi,
    bytecode: String,
    #[serde(default)]
    link_references: serde_json::Map<String, serde_json::Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DebugFile {
    build_info: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawBuildInfo {
    solc_long_version: String,
    input: serde_json::Value,
}

/// Artifacts stored on disk by Hardhat.
#[derive(Clone, Debug)]
pub struct HardhatArtifacts {
    root: PathBuf,
}

impl HardhatArtifacts {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn find(&self, name: &str) -> Result<PathBuf, Error> {
        if let Some((source, contract)) = name.rsplit_once(':') {
            let path = self.root.join(source).join(format!("{contract}.json"));
            if !path.is_file() {
                return Err(Error::NotFound(name.to_string()));
            }
            return Ok(path);
        }

        let file_name = format!("{name}.json");
        let build_info = self.root.join(BUILD_INFO_DIR);
        let mut candidates = WalkDir::new(&self.root)
            .into_iter()
            .filter_entry(|entry| entry.path() != build_info)
            .filter_map(Result::ok)
            .filter(|entry| {
                entry.file_type().is_file() && entry.file_name() == file_name.as_str()
            })
            .map(|entry| entry.into_path())
            .collect::<Vec<_>>();

        match candidates.len() {
            0 => Err(Error::NotFound(name.to_string())),
            1 => Ok(candidates.remove(0)),
            _ => {
                candidates.sort();
                Err(Error::Ambiguous {
                    name: name.to_string(),
                    candidates: candidates
                        .iter()
                        .map(|path| self.fully_qualified_name(path, name))
                        .collect(),
                })
            }
        }
    }

    fn fully_qualified_name(&self, path: &Path, name: &str) -> String {
        let source = path
            .parent()
            .and_then(|dir| dir.strip_prefix(&self.root).ok())
            .unwrap_or(path);
        format!("{}:{name}", source.display())
    }
}

impl ArtifactStore for HardhatArtifacts {
    fn read_artifact(&self, name: &str) -> Result<Artifact, Error> {
        let path = self.find(name)?;
        let raw: RawArtifact = read_json(&path)?;

        if !raw.link_references.is_empty() {
            return Err(Error::UnlinkedLibraries(raw.contract_name));
        }
        let bytecode: Bytes = raw
            .bytecode
            .parse()
            .map_err(|source| Error::InvalidBytecode {
                name: raw.contract_name.clone(),
                source,
            })?;
        if bytecode.is_empty() {
            return Err(Error::EmptyBytecode(raw.contract_name));
        }

        tracing::debug!(path = %path.display(), "read contract artifact");
        Ok(Artifact {
            contract_name: raw.contract_name,
            source_name: raw.source_name,
            abi: raw.abi,
            bytecode,
            path,
        })
    }

    fn read_build_info(&self, artifact: &Artifact) -> Result<BuildInfo, Error> {
        let debug_path = artifact
            .path
            .with_file_name(format!("{}.dbg.json", artifact.contract_name));
        let debug: DebugFile = read_json(&debug_path)?;

        // The build info path is relative to the debug file.
        let build_info_path = debug_path
            .parent()
            .unwrap_or(&self.root)
            .join(debug.build_info);
        let raw: RawBuildInfo = read_json(&build_info_path)?;
        Ok(BuildInfo {
            solc_long_version: raw.solc_long_version,
            input: raw.input,
        })
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, Error> {
    let content = std::fs::read_to_string(path).map_err(|source| Error::Io {
        path: path.to_owned(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| Error::Malformed {
        path: path.to_owned(),
        source,
    })
}
