use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::registry::{OperationDescriptor, OperationRegistry};

const CATEGORY: &str = "shape";

fn default_segments() -> u32 {
    32
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateCubeParams {
    /// Edge length in world units.
    pub size: f64,
    /// World-space position. Defaults to the origin.
    #[serde(default)]
    pub position: Option<[f64; 3]>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateSphereParams {
    pub radius: f64,
    #[serde(default = "default_segments")]
    pub segments: u32,
    #[serde(default)]
    pub position: Option<[f64; 3]>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreatePlaneParams {
    pub width: f64,
    pub depth: f64,
    #[serde(default)]
    pub position: Option<[f64; 3]>,
    #[serde(default)]
    pub name: Option<String>,
}

pub fn register(registry: &OperationRegistry) {
    registry.register(OperationDescriptor::of::<CreateCubeParams>(
        "create_cube",
        CATEGORY,
        "Create a cube primitive; returns the new object's id",
    ));
    registry.register(OperationDescriptor::of::<CreateSphereParams>(
        "create_sphere",
        CATEGORY,
        "Create a UV sphere primitive; returns the new object's id",
    ));
    registry.register(OperationDescriptor::of::<CreatePlaneParams>(
        "create_plane",
        CATEGORY,
        "Create a flat plane primitive; returns the new object's id",
    ));
}
