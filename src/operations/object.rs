use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::registry::{OperationDescriptor, OperationRegistry};

const CATEGORY: &str = "object";

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RenameParams {
    pub target_id: u64,
    pub new_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TargetParams {
    pub target_id: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateObjectParams {
    pub target_id: u64,
    /// Name for the copy. The host picks one when omitted.
    #[serde(default)]
    pub new_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SetTransformParams {
    pub target_id: u64,
    #[serde(default)]
    pub position: Option<[f64; 3]>,
    /// Euler angles in degrees.
    #[serde(default)]
    pub rotation: Option<[f64; 3]>,
    #[serde(default)]
    pub scale: Option<[f64; 3]>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GroupObjectsParams {
    pub target_ids: Vec<u64>,
    pub group_name: String,
}

pub fn register(registry: &OperationRegistry) {
    registry.register(OperationDescriptor::of::<RenameParams>(
        "rename",
        CATEGORY,
        "Rename an object by id",
    ));
    registry.register(OperationDescriptor::of::<TargetParams>(
        "delete_object",
        CATEGORY,
        "Delete an object and its children",
    ));
    registry.register(OperationDescriptor::of::<DuplicateObjectParams>(
        "duplicate_object",
        CATEGORY,
        "Duplicate an object; returns the copy's id",
    ));
    registry.register(OperationDescriptor::of::<SetTransformParams>(
        "set_transform",
        CATEGORY,
        "Set position, rotation and/or scale of an object",
    ));
    registry.register(OperationDescriptor::of::<GroupObjectsParams>(
        "group_objects",
        CATEGORY,
        "Parent several objects under a new empty group; returns the group's id",
    ));
}
