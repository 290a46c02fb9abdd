//! Built-in leaf operations.
//!
//! Each module owns the parameter structs for one category and exposes a
//! `register` function. The relay never introspects types at runtime: adding an
//! operation means adding it to its module's `register` and, for a new
//! category, listing the module here.

pub mod animation;
pub mod object;
pub mod scene;
pub mod shape;

use crate::registry::OperationRegistry;

const CATEGORIES: &[(&str, &str)] = &[
    ("shape", "Create primitive objects: cubes, spheres, planes"),
    ("object", "Rename, delete, duplicate, transform and group objects"),
    ("scene", "Inspect the scene and manage the selection"),
    ("animation", "Create clips, set keyframes, blend animations"),
];

/// Register every built-in operation module.
pub fn register_all(registry: &OperationRegistry) {
    for (name, description) in CATEGORIES {
        registry.describe_category(name, description);
    }
    shape::register(registry);
    object::register(registry);
    scene::register(registry);
    animation::register(registry);
}
