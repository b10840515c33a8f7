// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Service Domain Model
//!
//! A [`Service`] is the desired-state descriptor for one kind of container in a
//! project. Services are immutable once loaded; references to other services
//! (links, volumes-from, network namespaces) are kept by *name* and only
//! resolved against live containers by the execution engine.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Aggregate:** Owned by [`crate::domain::project::Project`]

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// ============================================================================
// Value Objects
// ============================================================================

/// Access mode for a mounted volume or a volumes-from source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum AccessMode {
    #[default]
    #[serde(rename = "rw")]
    ReadWrite,
    #[serde(rename = "ro")]
    ReadOnly,
}

impl AccessMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ReadWrite => "rw",
            Self::ReadOnly => "ro",
        }
    }

    pub fn is_writable(&self) -> bool {
        matches!(self, Self::ReadWrite)
    }
}

impl FromStr for AccessMode {
    type Err = SpecParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rw" => Ok(Self::ReadWrite),
            "ro" => Ok(Self::ReadOnly),
            other => Err(SpecParseError::InvalidMode(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpecParseError {
    #[error("invalid access mode '{0}', expected 'rw' or 'ro'")]
    InvalidMode(String),

    #[error("invalid volume specification '{0}'")]
    InvalidVolume(String),

    #[error("invalid volumes_from specification '{0}'")]
    InvalidVolumesFrom(String),

    #[error("invalid link specification '{0}'")]
    InvalidLink(String),

    #[error("invalid network mode '{0}'")]
    InvalidNetworkMode(String),
}

/// A volume declared on a service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum VolumeBinding {
    /// `/container/path` - engine-managed volume, carried forward on recreate.
    Anonymous { target: String },
    /// `/host/path:/container/path[:mode]`
    Bind {
        source: String,
        target: String,
        mode: AccessMode,
    },
    /// `name:/container/path[:mode]` - a project-declared named volume.
    Named {
        volume: String,
        target: String,
        mode: AccessMode,
    },
}

impl VolumeBinding {
    pub fn target(&self) -> &str {
        match self {
            Self::Anonymous { target } | Self::Bind { target, .. } | Self::Named { target, .. } => {
                target
            }
        }
    }
}

impl FromStr for VolumeBinding {
    type Err = SpecParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        let invalid = || SpecParseError::InvalidVolume(s.to_string());

        match parts.as_slice() {
            [target] if target.starts_with('/') => Ok(Self::Anonymous {
                target: target.to_string(),
            }),
            [source, target] | [source, target, _] => {
                if source.is_empty() || !target.starts_with('/') {
                    return Err(invalid());
                }
                let mode = match parts.get(2) {
                    Some(mode) => mode.parse()?,
                    None => AccessMode::ReadWrite,
                };
                if is_host_path(source) {
                    Ok(Self::Bind {
                        source: source.to_string(),
                        target: target.to_string(),
                        mode,
                    })
                } else {
                    Ok(Self::Named {
                        volume: source.to_string(),
                        target: target.to_string(),
                        mode,
                    })
                }
            }
            _ => Err(invalid()),
        }
    }
}

fn is_host_path(source: &str) -> bool {
    source.starts_with('/') || source.starts_with('.') || source.starts_with('~')
}

impl fmt::Display for VolumeBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Anonymous { target } => write!(f, "{}", target),
            Self::Bind {
                source,
                target,
                mode,
            } => write!(f, "{}:{}:{}", source, target, mode.as_str()),
            Self::Named {
                volume,
                target,
                mode,
            } => write!(f, "{}:{}:{}", volume, target, mode.as_str()),
        }
    }
}

impl TryFrom<String> for VolumeBinding {
    type Error = SpecParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<VolumeBinding> for String {
    fn from(value: VolumeBinding) -> Self {
        value.to_string()
    }
}

/// Where a volumes-from reference points.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VolumeSource {
    /// Another service of the same project, resolved at execution time.
    Service(String),
    /// A container outside the project, by name or id.
    Container(String),
}

/// A lazy volumes-from reference: resolved by the execution engine once the
/// source container exists.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VolumeFromSpec {
    pub source: VolumeSource,
    pub mode: AccessMode,
}

impl VolumeFromSpec {
    pub fn service(name: impl Into<String>, mode: AccessMode) -> Self {
        Self {
            source: VolumeSource::Service(name.into()),
            mode,
        }
    }

    pub fn container(name: impl Into<String>, mode: AccessMode) -> Self {
        Self {
            source: VolumeSource::Container(name.into()),
            mode,
        }
    }

    pub fn source_service(&self) -> Option<&str> {
        match &self.source {
            VolumeSource::Service(name) => Some(name),
            VolumeSource::Container(_) => None,
        }
    }
}

impl FromStr for VolumeFromSpec {
    type Err = SpecParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        let invalid = || SpecParseError::InvalidVolumesFrom(s.to_string());

        let (source, mode) = match parts.as_slice() {
            ["container", name] => (VolumeSource::Container(name.to_string()), None),
            ["container", name, mode] => (VolumeSource::Container(name.to_string()), Some(*mode)),
            [name] => (VolumeSource::Service(name.to_string()), None),
            [name, mode] => (VolumeSource::Service(name.to_string()), Some(*mode)),
            _ => return Err(invalid()),
        };

        match &source {
            VolumeSource::Service(name) | VolumeSource::Container(name) if name.is_empty() => {
                return Err(invalid())
            }
            _ => {}
        }

        let mode = match mode {
            Some(mode) => mode.parse()?,
            None => AccessMode::ReadWrite,
        };
        Ok(Self { source, mode })
    }
}

impl fmt::Display for VolumeFromSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            VolumeSource::Service(name) => write!(f, "{}:{}", name, self.mode.as_str()),
            VolumeSource::Container(name) => {
                write!(f, "container:{}:{}", name, self.mode.as_str())
            }
        }
    }
}

impl TryFrom<String> for VolumeFromSpec {
    type Error = SpecParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<VolumeFromSpec> for String {
    fn from(value: VolumeFromSpec) -> Self {
        value.to_string()
    }
}

/// A link to another service, with an optional alias.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Link {
    pub service: String,
    pub alias: Option<String>,
}

impl Link {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            alias: None,
        }
    }

    pub fn with_alias(service: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            alias: Some(alias.into()),
        }
    }

    /// The alias under which the linked service is reachable.
    pub fn alias(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.service)
    }
}

impl FromStr for Link {
    type Err = SpecParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split(':').collect::<Vec<_>>().as_slice() {
            [service] if !service.is_empty() => Ok(Self::new(*service)),
            [service, alias] if !service.is_empty() && !alias.is_empty() => {
                Ok(Self::with_alias(*service, *alias))
            }
            _ => Err(SpecParseError::InvalidLink(s.to_string())),
        }
    }
}

impl fmt::Display for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.alias {
            Some(alias) => write!(f, "{}:{}", self.service, alias),
            None => write!(f, "{}", self.service),
        }
    }
}

impl TryFrom<String> for Link {
    type Error = SpecParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Link> for String {
    fn from(value: Link) -> Self {
        value.to_string()
    }
}

/// Network mode of a service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum NetworkMode {
    /// The project's `<project>_default` bridge network.
    #[default]
    ProjectDefault,
    /// A named network; project-declared names are scoped, others external.
    Network(String),
    /// Join the network namespace of another service's container.
    Service(String),
    /// Join the network namespace of an external container.
    Container(String),
    Host,
    None,
}

impl NetworkMode {
    pub fn source_service(&self) -> Option<&str> {
        match self {
            Self::Service(name) => Some(name),
            _ => None,
        }
    }
}

impl FromStr for NetworkMode {
    type Err = SpecParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || SpecParseError::InvalidNetworkMode(s.to_string());
        match s {
            "" => Err(invalid()),
            "default" => Ok(Self::ProjectDefault),
            "host" => Ok(Self::Host),
            "none" => Ok(Self::None),
            _ => {
                if let Some(name) = s.strip_prefix("service:") {
                    if name.is_empty() {
                        return Err(invalid());
                    }
                    Ok(Self::Service(name.to_string()))
                } else if let Some(name) = s.strip_prefix("container:") {
                    if name.is_empty() {
                        return Err(invalid());
                    }
                    Ok(Self::Container(name.to_string()))
                } else {
                    Ok(Self::Network(s.to_string()))
                }
            }
        }
    }
}

impl fmt::Display for NetworkMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ProjectDefault => write!(f, "default"),
            Self::Network(name) => write!(f, "{}", name),
            Self::Service(name) => write!(f, "service:{}", name),
            Self::Container(name) => write!(f, "container:{}", name),
            Self::Host => write!(f, "host"),
            Self::None => write!(f, "none"),
        }
    }
}

impl TryFrom<String> for NetworkMode {
    type Error = SpecParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<NetworkMode> for String {
    fn from(value: NetworkMode) -> Self {
        value.to_string()
    }
}

/// Container log driver configuration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub driver: String,
    #[serde(default)]
    pub options: BTreeMap<String, String>,
}

// ============================================================================
// Entity: Service
// ============================================================================

/// Desired-state descriptor for one kind of container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub name: String,
    pub image: String,
    #[serde(default)]
    pub command: Option<Vec<String>>,
    #[serde(default)]
    pub entrypoint: Option<Vec<String>>,
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub volumes: Vec<VolumeBinding>,
    #[serde(default)]
    pub volumes_from: Vec<VolumeFromSpec>,
    #[serde(default)]
    pub links: Vec<Link>,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub network_mode: NetworkMode,
    #[serde(default = "default_scale")]
    pub scale: u32,
    #[serde(default)]
    pub logging: Option<LoggingConfig>,
}

fn default_scale() -> u32 {
    1
}

/// The subset of a service that determines the containers it produces.
#[derive(Serialize)]
struct FingerprintInput<'a> {
    image: &'a str,
    command: &'a Option<Vec<String>>,
    entrypoint: &'a Option<Vec<String>>,
    environment: &'a BTreeMap<String, String>,
    labels: &'a BTreeMap<String, String>,
    volumes: Vec<String>,
    links: Vec<String>,
    volumes_from: Vec<String>,
    network_mode: String,
    logging: &'a Option<LoggingConfig>,
}

impl Service {
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            command: None,
            entrypoint: None,
            environment: BTreeMap::new(),
            labels: BTreeMap::new(),
            volumes: Vec::new(),
            volumes_from: Vec::new(),
            links: Vec::new(),
            depends_on: Vec::new(),
            network_mode: NetworkMode::default(),
            scale: default_scale(),
            logging: None,
        }
    }

    pub fn with_command<I, S>(mut self, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.command = Some(command.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.insert(key.into(), value.into());
        self
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn with_volume(mut self, volume: VolumeBinding) -> Self {
        self.volumes.push(volume);
        self
    }

    pub fn with_volumes_from(mut self, spec: VolumeFromSpec) -> Self {
        self.volumes_from.push(spec);
        self
    }

    pub fn with_link(mut self, link: Link) -> Self {
        self.links.push(link);
        self
    }

    pub fn with_depends_on(mut self, service: impl Into<String>) -> Self {
        self.depends_on.push(service.into());
        self
    }

    pub fn with_network_mode(mut self, mode: NetworkMode) -> Self {
        self.network_mode = mode;
        self
    }

    pub fn with_scale(mut self, scale: u32) -> Self {
        self.scale = scale;
        self
    }

    pub fn with_logging(mut self, logging: LoggingConfig) -> Self {
        self.logging = Some(logging);
        self
    }

    /// Names of the services this one references, in declaration order and
    /// without duplicates: links, volumes-from sources, the network namespace
    /// source and explicit `depends_on`.
    pub fn dependency_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        let candidates = self
            .links
            .iter()
            .map(|link| link.service.as_str())
            .chain(self.volumes_from.iter().filter_map(|v| v.source_service()))
            .chain(self.network_mode.source_service())
            .chain(self.depends_on.iter().map(String::as_str));

        for name in candidates {
            if !names.contains(&name) {
                names.push(name);
            }
        }
        names
    }

    /// Stable hash over the configuration that shapes this service's
    /// containers. Independent loads of identical definitions hash equally;
    /// scale and `depends_on` do not participate.
    pub fn fingerprint(&self) -> String {
        let input = FingerprintInput {
            image: &self.image,
            command: &self.command,
            entrypoint: &self.entrypoint,
            environment: &self.environment,
            labels: &self.labels,
            volumes: self.volumes.iter().map(ToString::to_string).collect(),
            links: self.links.iter().map(ToString::to_string).collect(),
            volumes_from: self.volumes_from.iter().map(ToString::to_string).collect(),
            network_mode: self.network_mode.to_string(),
            logging: &self.logging,
        };

        // BTreeMap-backed fields serialize in key order, so the encoding is canonical.
        let canonical = serde_json::to_vec(&input).unwrap_or_default();
        hex::encode(Sha256::digest(&canonical))
    }
}

/// `{project}_{service}_{ordinal}`
pub fn container_name(project: &str, service: &str, ordinal: u32) -> String {
    format!("{}_{}_{}", project, service, ordinal)
}
