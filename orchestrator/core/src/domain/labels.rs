// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Label Codec
//!
//! Every container, volume and network created by the orchestrator carries a
//! label set identifying the project it belongs to. Containers additionally
//! carry the service name, their one-based ordinal and the fingerprint of the
//! service configuration they were created from.
//!
//! The engine-side label set is the only index of ownership: nothing is kept
//! locally between calls, so every listing goes through [`LabelFilter`].
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Pure encode / decode / filter of identity labels

use std::collections::{BTreeMap, HashMap};

pub const LABEL_PROJECT: &str = "io.stevedore.project";
pub const LABEL_SERVICE: &str = "io.stevedore.service";
pub const LABEL_CONTAINER_NUMBER: &str = "io.stevedore.container-number";
pub const LABEL_CONFIG_HASH: &str = "io.stevedore.config-hash";
pub const LABEL_VERSION: &str = "io.stevedore.version";
pub const LABEL_VOLUME: &str = "io.stevedore.volume";
pub const LABEL_NETWORK: &str = "io.stevedore.network";

/// Identity decoded from a container's labels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerIdentity {
    pub project: String,
    pub service: String,
    pub ordinal: u32,
    /// Absent on containers created by something other than this orchestrator
    /// that nevertheless carry project/service labels.
    pub fingerprint: Option<String>,
}

/// Build the label set for a container.
///
/// User-declared labels are applied first so the identity labels always win.
pub fn encode(
    project: &str,
    service: &str,
    ordinal: u32,
    fingerprint: &str,
    extra: &BTreeMap<String, String>,
) -> HashMap<String, String> {
    let mut labels: HashMap<String, String> = extra
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    labels.insert(LABEL_PROJECT.to_string(), project.to_string());
    labels.insert(LABEL_SERVICE.to_string(), service.to_string());
    labels.insert(LABEL_CONTAINER_NUMBER.to_string(), ordinal.to_string());
    labels.insert(LABEL_CONFIG_HASH.to_string(), fingerprint.to_string());
    labels.insert(
        LABEL_VERSION.to_string(),
        env!("CARGO_PKG_VERSION").to_string(),
    );
    labels
}

/// Decode container identity. Returns `None` unless project, service and a
/// positive ordinal are all present.
pub fn decode(labels: &HashMap<String, String>) -> Option<ContainerIdentity> {
    let project = labels.get(LABEL_PROJECT)?;
    let service = labels.get(LABEL_SERVICE)?;
    let ordinal = labels
        .get(LABEL_CONTAINER_NUMBER)?
        .parse::<u32>()
        .ok()
        .filter(|n| *n > 0)?;

    Some(ContainerIdentity {
        project: project.clone(),
        service: service.clone(),
        ordinal,
        fingerprint: labels.get(LABEL_CONFIG_HASH).cloned(),
    })
}

/// Labels for a project-scoped volume.
pub fn volume_labels(project: &str, volume: &str) -> HashMap<String, String> {
    HashMap::from([
        (LABEL_PROJECT.to_string(), project.to_string()),
        (LABEL_VOLUME.to_string(), volume.to_string()),
    ])
}

/// Labels for a project-scoped network.
pub fn network_labels(project: &str, network: &str) -> HashMap<String, String> {
    HashMap::from([
        (LABEL_PROJECT.to_string(), project.to_string()),
        (LABEL_NETWORK.to_string(), network.to_string()),
    ])
}

/// Query predicate over labels, usable by the engine listing call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelFilter {
    project: String,
    service: Option<String>,
}

impl LabelFilter {
    pub fn project(project: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            service: None,
        }
    }

    pub fn service(project: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            service: Some(service.into()),
        }
    }

    pub fn project_name(&self) -> &str {
        &self.project
    }

    pub fn service_name(&self) -> Option<&str> {
        self.service.as_deref()
    }

    /// `key=value` pairs in the form the Docker API expects for `label` filters.
    pub fn to_engine_filters(&self) -> Vec<String> {
        let mut filters = vec![format!("{}={}", LABEL_PROJECT, self.project)];
        if let Some(service) = &self.service {
            filters.push(format!("{}={}", LABEL_SERVICE, service));
        }
        filters
    }

    pub fn matches(&self, labels: &HashMap<String, String>) -> bool {
        if labels.get(LABEL_PROJECT) != Some(&self.project) {
            return false;
        }
        match &self.service {
            Some(service) => labels.get(LABEL_SERVICE) == Some(service),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode_identity() {
        let labels = encode("shop", "web", 3, "abc123", &BTreeMap::new());
        let identity = decode(&labels).expect("identity should decode");

        assert_eq!(identity.project, "shop");
        assert_eq!(identity.service, "web");
        assert_eq!(identity.ordinal, 3);
        assert_eq!(identity.fingerprint.as_deref(), Some("abc123"));
    }

    #[test]
    fn test_identity_labels_override_user_labels() {
        let extra = BTreeMap::from([
            (LABEL_PROJECT.to_string(), "spoofed".to_string()),
            ("team".to_string(), "payments".to_string()),
        ]);
        let labels = encode("shop", "web", 1, "h", &extra);

        assert_eq!(labels.get(LABEL_PROJECT).map(String::as_str), Some("shop"));
        assert_eq!(labels.get("team").map(String::as_str), Some("payments"));
    }

    #[test]
    fn test_decode_rejects_incomplete_labels() {
        let mut labels = HashMap::from([
            (LABEL_PROJECT.to_string(), "shop".to_string()),
            (LABEL_SERVICE.to_string(), "web".to_string()),
        ]);
        assert!(decode(&labels).is_none());

        labels.insert(LABEL_CONTAINER_NUMBER.to_string(), "0".to_string());
        assert!(decode(&labels).is_none());

        labels.insert(LABEL_CONTAINER_NUMBER.to_string(), "two".to_string());
        assert!(decode(&labels).is_none());
    }

    #[test]
    fn test_filter_scopes_by_project_and_service() {
        let web = encode("shop", "web", 1, "h", &BTreeMap::new());
        let other_project = encode("blog", "web", 1, "h", &BTreeMap::new());

        assert!(LabelFilter::project("shop").matches(&web));
        assert!(!LabelFilter::project("shop").matches(&other_project));
        assert!(LabelFilter::service("shop", "web").matches(&web));
        assert!(!LabelFilter::service("shop", "db").matches(&web));
    }

    #[test]
    fn test_filter_renders_engine_filters() {
        let filter = LabelFilter::service("shop", "db");
        assert_eq!(
            filter.to_engine_filters(),
            vec![
                "io.stevedore.project=shop".to_string(),
                "io.stevedore.service=db".to_string()
            ]
        );
    }
}
