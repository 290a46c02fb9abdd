pub mod catalog;
pub mod schema;

use std::collections::HashSet;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::RelayError;
use schema::ParamSchema;

// ── Descriptors ─────────────────────────────────────────────────

/// One invocable operation. Immutable once registered; the registry hands out
/// `Arc`s so readers never hold the catalog lock while using a descriptor.
#[derive(Debug, Clone, Serialize)]
pub struct OperationDescriptor {
    pub name: String,
    pub category: String,
    pub description: String,
    pub params: ParamSchema,
}

impl OperationDescriptor {
    pub fn new(
        name: impl Into<String>,
        category: impl Into<String>,
        description: impl Into<String>,
        params: ParamSchema,
    ) -> Self {
        Self {
            name: name.into(),
            category: normalize_category(&category.into()),
            description: description.into(),
            params,
        }
    }

    /// Descriptor whose parameter schema is derived from `T`.
    pub fn of<T: JsonSchema + DeserializeOwned>(name: &str, category: &str, description: &str) -> Self {
        Self::new(name, category, description, ParamSchema::of::<T>())
    }

    pub fn summary(&self) -> OperationSummary {
        OperationSummary {
            name: self.name.clone(),
            category: self.category.clone(),
            description: self.description.clone(),
        }
    }
}

/// Names-only view of a descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationSummary {
    pub name: String,
    pub category: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CategoryInfo {
    pub name: String,
    pub description: String,
    pub operation_count: usize,
}

/// Result of activating a category for direct (native-style) calls.
#[derive(Debug, Clone, Serialize)]
pub struct Activation {
    pub category: String,
    pub newly_activated: Vec<String>,
    pub already_active: Vec<String>,
}

fn normalize_category(category: &str) -> String {
    category.trim().to_lowercase()
}

// ── Registry ────────────────────────────────────────────────────

#[derive(Default)]
struct Catalog {
    by_name: IndexMap<String, Arc<OperationDescriptor>>,
    by_category: IndexMap<String, Vec<String>>,
    category_descriptions: IndexMap<String, String>,
    active: HashSet<String>,
}

/// Category-keyed catalog of operation descriptors.
///
/// Written at startup by the operation modules' `register` functions and read
/// concurrently afterwards. Runtime registration is allowed but rare, so a
/// read-write lock is enough.
#[derive(Default)]
pub struct OperationRegistry {
    inner: RwLock<Catalog>,
}

impl OperationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry populated with every built-in operation module.
    pub fn with_builtin_operations() -> Self {
        let registry = Self::new();
        crate::operations::register_all(&registry);
        registry
    }

    /// Attach a human-readable description to a category. Categories without
    /// one still work; they just show an empty description in discovery.
    pub fn describe_category(&self, category: &str, description: &str) {
        self.inner
            .write()
            .category_descriptions
            .insert(normalize_category(category), description.to_string());
    }

    /// Add a descriptor under its category. A second registration of the same
    /// name is ignored (and logged); returns whether the descriptor was added.
    pub fn register(&self, descriptor: OperationDescriptor) -> bool {
        let mut catalog = self.inner.write();
        if let Some(existing) = catalog.by_name.get(&descriptor.name) {
            tracing::warn!(
                operation = %descriptor.name,
                existing_category = %existing.category,
                rejected_category = %descriptor.category,
                "duplicate operation registration ignored"
            );
            return false;
        }
        catalog
            .by_category
            .entry(descriptor.category.clone())
            .or_default()
            .push(descriptor.name.clone());
        catalog
            .by_name
            .insert(descriptor.name.clone(), Arc::new(descriptor));
        true
    }

    /// Known category keys, in registration order.
    pub fn categories(&self) -> Vec<String> {
        self.inner.read().by_category.keys().cloned().collect()
    }

    pub fn category_infos(&self) -> Vec<CategoryInfo> {
        let catalog = self.inner.read();
        catalog
            .by_category
            .iter()
            .map(|(name, ops)| CategoryInfo {
                name: name.clone(),
                description: catalog
                    .category_descriptions
                    .get(name)
                    .cloned()
                    .unwrap_or_default(),
                operation_count: ops.len(),
            })
            .collect()
    }

    pub fn has_category(&self, category: &str) -> bool {
        self.inner
            .read()
            .by_category
            .contains_key(&normalize_category(category))
    }

    /// All descriptors in a category. Unknown categories yield an empty list:
    /// callers probe category names interactively.
    pub fn list_by_category(&self, category: &str) -> Vec<Arc<OperationDescriptor>> {
        let catalog = self.inner.read();
        catalog
            .by_category
            .get(&normalize_category(category))
            .map(|names| {
                names
                    .iter()
                    .filter_map(|n| catalog.by_name.get(n).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn get(&self, name: &str) -> Option<Arc<OperationDescriptor>> {
        self.inner.read().by_name.get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.read().by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Names-only view across one or more categories.
    pub fn list_operations(&self, categories: &[String]) -> Vec<OperationSummary> {
        categories
            .iter()
            .flat_map(|c| self.list_by_category(c))
            .map(|d| d.summary())
            .collect()
    }

    /// Full-schema view for named operations. Unknown names are returned
    /// separately instead of failing the whole lookup.
    pub fn describe_operations(
        &self,
        names: &[String],
    ) -> (Vec<Arc<OperationDescriptor>>, Vec<String>) {
        let mut found = Vec::new();
        let mut missing = Vec::new();
        for name in names {
            match self.get(name) {
                Some(d) => found.push(d),
                None => missing.push(name.clone()),
            }
        }
        (found, missing)
    }

    /// `NotFound` error carrying the known categories as a discovery hint.
    pub fn not_found(&self, what: impl Into<String>) -> RelayError {
        RelayError::NotFound {
            what: what.into(),
            known_categories: self.categories(),
        }
    }

    /// Mark every operation in `category` as directly callable.
    pub fn activate_category(&self, category: &str) -> Result<Activation, RelayError> {
        let key = normalize_category(category);
        let mut catalog = self.inner.write();
        let Some(names) = catalog.by_category.get(&key).cloned() else {
            drop(catalog);
            return Err(self.not_found(format!("Category '{category}'")));
        };

        let mut newly_activated = Vec::new();
        let mut already_active = Vec::new();
        for name in names {
            if catalog.active.insert(name.clone()) {
                newly_activated.push(name);
            } else {
                already_active.push(name);
            }
        }
        tracing::info!(
            category = %key,
            newly = newly_activated.len(),
            already = already_active.len(),
            "category activated"
        );
        Ok(Activation {
            category: key,
            newly_activated,
            already_active,
        })
    }

    pub fn is_active(&self, name: &str) -> bool {
        self.inner.read().active.contains(name)
    }

    /// Activated descriptors, in registration order.
    pub fn active_operations(&self) -> Vec<Arc<OperationDescriptor>> {
        let catalog = self.inner.read();
        catalog
            .by_name
            .values()
            .filter(|d| catalog.active.contains(&d.name))
            .cloned()
            .collect()
    }
}
