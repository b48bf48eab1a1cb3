//! Collection → namespace and item type → content model lookup tables.
//!
//! Built once from the built-in legacy tables plus any `[namespaces]` /
//! `[content_models]` overrides in the config, then shared read-only.

use std::collections::BTreeMap;

use crate::error::MigrationError;

/// Key of the page content model in the content-model table.
pub const PAGE_TYPE: &str = "page";

const DEFAULT_NAMESPACES: &[(&str, &str)] = &[
    ("pitttext", "hpitt"),
    ("pitttextdir", "hpitt"),
    ("hpicasc", "hpitt"),
    ("hpichswp", "hpitt"),
    ("hpiccma", "hpitt"),
    ("hpicchatham", "hpitt"),
    ("hpicpointpark", "hpitt"),
    ("hpicoakmont", "hpitt"),
    ("hopkins", "hpitt"),
    ("flood", "hpitt"),
    ("warrantee", "hpitt"),
    ("geotopo", "hpitt"),
];

const DEFAULT_CONTENT_MODELS: &[(&str, &str)] = &[
    ("image", "islandora:sp_large_image_cmodel"),
    ("text - cataloged", "islandora:bookCModel"),
    ("text - uncataloged", "islandora:bookCModel"),
    ("map", "islandora:sp_large_image_cmodel"),
    ("manuscript", "islandora:bookCModel"),
    (PAGE_TYPE, "archiveorg:pageCModel"),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catalog {
    namespaces: BTreeMap<String, String>,
    content_models: BTreeMap<String, String>,
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new(BTreeMap::new(), BTreeMap::new())
    }
}

impl Catalog {
    /// Built-in tables with `namespaces` and `content_models` layered on top.
    pub fn new(
        namespaces: BTreeMap<String, String>,
        content_models: BTreeMap<String, String>,
    ) -> Self {
        let mut ns: BTreeMap<String, String> = DEFAULT_NAMESPACES
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ns.extend(namespaces);
        let mut cm: BTreeMap<String, String> = DEFAULT_CONTENT_MODELS
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        cm.extend(content_models);
        Self {
            namespaces: ns,
            content_models: cm,
        }
    }

    pub fn namespace_for(&self, collection_id: &str) -> Result<&str, MigrationError> {
        self.namespaces
            .get(collection_id)
            .map(String::as_str)
            .ok_or_else(|| MigrationError::UnknownCollection(collection_id.to_string()))
    }

    pub fn content_model_for(&self, type_name: &str) -> Result<&str, MigrationError> {
        self.content_models
            .get(type_name)
            .map(String::as_str)
            .ok_or_else(|| MigrationError::UnknownItemType(type_name.to_string()))
    }

    pub fn page_content_model(&self) -> Result<&str, MigrationError> {
        self.content_model_for(PAGE_TYPE)
    }

    pub(crate) fn entries(&self) -> impl Iterator<Item = (&String, &String)> {
        self.namespaces.iter().chain(self.content_models.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn built_in_tables_match_legacy_mapping() {
        let catalog = Catalog::default();
        assert_eq!(catalog.namespace_for("pitttext").unwrap(), "hpitt");
        assert_eq!(catalog.namespace_for("geotopo").unwrap(), "hpitt");
        assert_eq!(
            catalog.content_model_for("text - uncataloged").unwrap(),
            "islandora:bookCModel"
        );
        assert_eq!(catalog.page_content_model().unwrap(), "archiveorg:pageCModel");
    }

    #[test]
    fn unknown_keys_are_lookup_errors() {
        let catalog = Catalog::default();
        assert!(matches!(
            catalog.namespace_for("nowhere"),
            Err(MigrationError::UnknownCollection(c)) if c == "nowhere"
        ));
        assert!(matches!(
            catalog.content_model_for("sound"),
            Err(MigrationError::UnknownItemType(_))
        ));
    }

    #[test]
    fn overrides_replace_and_extend_defaults() {
        let catalog = Catalog::new(
            BTreeMap::from([
                ("flood".to_string(), "flood".to_string()),
                ("newcoll".to_string(), "pitt".to_string()),
            ]),
            BTreeMap::from([("page".to_string(), "islandora:pageCModel".to_string())]),
        );
        assert_eq!(catalog.namespace_for("flood").unwrap(), "flood");
        assert_eq!(catalog.namespace_for("newcoll").unwrap(), "pitt");
        assert_eq!(catalog.namespace_for("hopkins").unwrap(), "hpitt");
        assert_eq!(catalog.page_content_model().unwrap(), "islandora:pageCModel");
    }
}
