//! Sub-resource endpoint sets for builders and umbrella companies

use super::models::EntityKind;
use std::collections::BTreeMap;

/// Default registry host used by the public directory web client
pub const DEFAULT_BASE_URL: &str = "https://obd.hcraontario.ca";

/// Builder sub-resources: (key, path under the base URL)
const BUILDER_ENDPOINTS: &[(&str, &str)] = &[
    ("summary", "/api/buildersummary"),
    ("PDOs", "/api/builderPDOs"),
    ("convictions", "/api/builderConvictions"),
    ("conditions", "/api/builderConditions"),
    ("members", "/api/builderMembers"),
    ("properties", "/api/builderProperties"),
    ("enrolments", "/api/builderEnrolments"),
    ("condoProjects", "/api/builderCondoProjects"),
];

const UMBRELLA_ENDPOINTS: &[(&str, &str)] = &[
    ("summary", "/api/umbrellaSummary"),
    ("properties", "/api/umbrellaProperties"),
    ("members", "/api/umbrellaMembers"),
    ("condoProjects", "/api/umbrellaCondoProjects"),
    ("enrolments", "/api/umbrellaEnrolments"),
];

/// Search endpoint path
pub const SEARCH_PATH: &str = "/api/builders";

/// One sub-resource endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub key: String,
    pub url: String,
}

/// The fixed set of sub-resource endpoints queried for one entity kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointSet {
    pub kind: EntityKind,
    endpoints: Vec<Endpoint>,
}

impl EndpointSet {
    pub fn new(kind: EntityKind, endpoints: Vec<Endpoint>) -> Self {
        Self { kind, endpoints }
    }

    /// Standard endpoints for a kind, rooted at `base_url`
    pub fn defaults(kind: EntityKind, base_url: &str) -> Self {
        let table = match kind {
            EntityKind::Builder => BUILDER_ENDPOINTS,
            EntityKind::Umbrella => UMBRELLA_ENDPOINTS,
        };
        let base = base_url.trim_end_matches('/');

        Self {
            kind,
            endpoints: table
                .iter()
                .map(|(key, path)| Endpoint {
                    key: (*key).to_string(),
                    url: format!("{}{}", base, path),
                })
                .collect(),
        }
    }

    /// Defaults with per-key URL overrides applied.
    ///
    /// Override values may be absolute URLs or paths relative to `base_url`.
    /// Keys not present in the defaults are appended.
    pub fn with_overrides(
        kind: EntityKind,
        base_url: &str,
        overrides: &BTreeMap<String, String>,
    ) -> Self {
        let mut set = Self::defaults(kind, base_url);
        let base = base_url.trim_end_matches('/');

        for (key, target) in overrides {
            let url = if target.starts_with("http://") || target.starts_with("https://") {
                target.clone()
            } else {
                format!("{}/{}", base, target.trim_start_matches('/'))
            };

            match set.endpoints.iter_mut().find(|e| &e.key == key) {
                Some(endpoint) => endpoint.url = url,
                None => set.endpoints.push(Endpoint {
                    key: key.clone(),
                    url,
                }),
            }
        }

        set
    }

    pub fn iter(&self) -> impl Iterator<Item = &Endpoint> {
        self.endpoints.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.endpoints.iter().map(|e| e.key.as_str())
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}
