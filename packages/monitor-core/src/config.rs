use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::types::WorklistEntry;

/// One monitored URL within a company's configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoredUrl {
    pub url: String,
    /// Page category, e.g. "pricing", "blog", "products"
    #[serde(rename = "type", default = "default_kind")]
    pub kind: String,
}

fn default_kind() -> String {
    "unknown".to_string()
}

/// Monitoring configuration for a single company
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompanyConfig {
    pub company: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub urls: Vec<MonitoredUrl>,
}

fn default_enabled() -> bool {
    true
}

impl CompanyConfig {
    pub fn new(company: impl Into<String>) -> Self {
        Self {
            company: company.into(),
            enabled: true,
            urls: Vec::new(),
        }
    }

    pub fn with_url(mut self, url: impl Into<String>, kind: impl Into<String>) -> Self {
        self.urls.push(MonitoredUrl {
            url: url.into(),
            kind: kind.into(),
        });
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// The full set of companies and URLs to monitor
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MonitorConfig {
    pub companies: Vec<CompanyConfig>,
}

impl MonitorConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    pub fn with_company(mut self, company: CompanyConfig) -> Self {
        self.companies.push(company);
        self
    }

    /// Build the ordered worklist of all URLs for enabled companies.
    ///
    /// Order is the configuration order; jobs capture this list at creation
    /// and never reorder it.
    pub fn worklist(&self) -> Vec<WorklistEntry> {
        self.companies
            .iter()
            .filter(|c| c.enabled)
            .flat_map(|c| {
                c.urls.iter().map(|u| WorklistEntry {
                    company: c.company.clone(),
                    url: u.url.clone(),
                    kind: u.kind.clone(),
                })
            })
            .collect()
    }
}
