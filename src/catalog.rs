//! The curated list of applications users pick from.

use anyhow::{Context, Result};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CatalogApp {
    pub id: String,
    pub name: String,
    pub category: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Default)]
pub struct Catalog {
    apps: Vec<CatalogApp>,
}

/// Ids split by whether the catalog knows them. Order is preserved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolved<'a> {
    pub known: Vec<&'a CatalogApp>,
    pub unknown: Vec<String>,
}

impl Catalog {
    pub fn new(apps: Vec<CatalogApp>) -> Self {
        Self { apps }
    }

    /// A missing file is an empty catalog; unreadable or malformed JSON is an
    /// error.
    pub fn load(path: &Path) -> Result<Catalog> {
        if !path.exists() {
            warn!("Catalog file {} not found, using empty catalog", path.display());
            return Ok(Catalog::default());
        }
        let s = fs::read_to_string(path)
            .with_context(|| format!("reading catalog {}", path.display()))?;
        let apps: Vec<CatalogApp> = serde_json::from_str(&s)
            .with_context(|| format!("parsing catalog json {}", path.display()))?;
        debug!("Loaded {} catalog apps from {}", apps.len(), path.display());
        Ok(Catalog { apps })
    }

    pub fn apps(&self) -> &[CatalogApp] {
        &self.apps
    }

    pub fn is_empty(&self) -> bool {
        self.apps.is_empty()
    }

    /// Distinct categories in first-seen order.
    pub fn categories(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.apps
            .iter()
            .map(|app| app.category.as_str())
            .filter(|category| seen.insert(*category))
            .collect()
    }

    pub fn in_category<'a>(&'a self, category: &'a str) -> impl Iterator<Item = &'a CatalogApp> + 'a {
        self.apps.iter().filter(move |app| app.category == category)
    }

    pub fn find(&self, id: &str) -> Option<&CatalogApp> {
        self.apps.iter().find(|app| app.id == id)
    }

    pub fn resolve<S: AsRef<str>>(&self, ids: &[S]) -> Resolved<'_> {
        let mut resolved = Resolved::default();
        for id in ids {
            match self.find(id.as_ref()) {
                Some(app) => resolved.known.push(app),
                None => resolved.unknown.push(id.as_ref().to_string()),
            }
        }
        resolved
    }
}
