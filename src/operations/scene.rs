use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::registry::schema::ParamSchema;
use crate::registry::{OperationDescriptor, OperationRegistry};

const CATEGORY: &str = "scene";

fn default_limit() -> u32 {
    100
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ListObjectsParams {
    /// Case-insensitive substring match on object names.
    #[serde(default)]
    pub filter: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SelectObjectsParams {
    pub target_ids: Vec<u64>,
    /// Add to the current selection instead of replacing it.
    #[serde(default)]
    pub additive: bool,
}

pub fn register(registry: &OperationRegistry) {
    registry.register(OperationDescriptor::new(
        "get_scene_info",
        CATEGORY,
        "Summary of the open scene: name, object count, active selection",
        ParamSchema::empty(),
    ));
    registry.register(OperationDescriptor::of::<ListObjectsParams>(
        "list_objects",
        CATEGORY,
        "List objects in the scene with ids and names",
    ));
    registry.register(OperationDescriptor::of::<SelectObjectsParams>(
        "select_objects",
        CATEGORY,
        "Select objects by id",
    ));
}
