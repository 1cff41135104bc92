//! Action catalog.
//!
//! The ordered set of host content-editing events that may trigger a
//! permalink flush. The base set is fixed; companion systems detected in the
//! host environment (commerce, SEO, custom fields) extend it. The catalog is
//! computed fresh on each use because capabilities can change between
//! deployments of the host.

use serde::Serialize;

/// Companion-system presence probes.
///
/// Injected rather than detected so the catalog stays testable without a
/// live host environment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    /// An e-commerce extension is active on the host.
    pub commerce: bool,
    /// An SEO extension is active on the host.
    pub seo: bool,
    /// A custom-fields extension is active on the host.
    pub custom_fields: bool,
}

/// One catalog entry: event identifier plus human-readable label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionEntry {
    pub id: String,
    pub label: String,
}

/// Ordered identifier → label mapping of flush-triggering events.
#[derive(Debug, Clone)]
pub struct ActionCatalog {
    entries: Vec<ActionEntry>,
}

impl ActionCatalog {
    /// Build the catalog for the given capabilities.
    pub fn build(capabilities: &Capabilities) -> Self {
        Self::builder(capabilities).finish()
    }

    /// Start a builder pre-populated with the base and capability-gated
    /// entries. External code may add or remove entries before `finish`.
    pub fn builder(capabilities: &Capabilities) -> ActionCatalogBuilder {
        let mut builder = ActionCatalogBuilder::empty();

        builder
            .add("post_saved", "Post save/edit")
            .add("post_created", "Post creation")
            .add("post_edited", "Post edit")
            .add("post_deleted", "Post deletion")
            .add("page_saved", "Page save/edit")
            .add("page_created", "Page creation")
            .add("category_created", "Category creation")
            .add("category_edited", "Category edit")
            .add("category_deleted", "Category deletion")
            .add("term_created", "Term creation")
            .add("term_edited", "Term edit")
            .add("term_deleted", "Term deletion")
            .add("menu_updated", "Menu update")
            .add("widgets_updated", "Widgets update");

        if capabilities.commerce {
            builder
                .add("product_saved", "Product save/edit")
                .add("product_stock_updated", "Product stock update");
        }

        if capabilities.seo {
            builder.add("seo_meta_saved", "SEO metadata save");
        }

        if capabilities.custom_fields {
            builder.add("field_group_saved", "Field group save");
        }

        builder
    }

    /// Whether the identifier names a catalog entry.
    pub fn contains(&self, id: &str) -> bool {
        self.entries.iter().any(|entry| entry.id == id)
    }

    /// Entries in insertion order.
    pub fn entries(&self) -> &[ActionEntry] {
        &self.entries
    }

    /// Identifiers in insertion order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.id.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Mutable catalog under construction.
///
/// `add` on an existing identifier updates the label in place, preserving
/// the original position; presentation order is insertion order.
pub struct ActionCatalogBuilder {
    entries: Vec<ActionEntry>,
}

impl ActionCatalogBuilder {
    fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn add(&mut self, id: impl Into<String>, label: impl Into<String>) -> &mut Self {
        let id = id.into();
        let label = label.into();
        match self.entries.iter_mut().find(|entry| entry.id == id) {
            Some(existing) => existing.label = label,
            None => self.entries.push(ActionEntry { id, label }),
        }
        self
    }

    pub fn remove(&mut self, id: &str) -> &mut Self {
        self.entries.retain(|entry| entry.id != id);
        self
    }

    pub fn finish(self) -> ActionCatalog {
        ActionCatalog {
            entries: self.entries,
        }
    }
}
