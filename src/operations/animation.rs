use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::registry::{OperationDescriptor, OperationRegistry};

const CATEGORY: &str = "animation";

fn default_blend_duration() -> f64 {
    0.25
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateClipParams {
    pub target_id: u64,
    pub name: String,
    /// Clip length in seconds.
    pub length: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SetKeyframeParams {
    pub clip_id: u64,
    /// Animated property path, e.g. `position.x`.
    pub property: String,
    pub time: f64,
    pub value: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BlendAnimationsParams {
    pub from_clip: u64,
    pub to_clip: u64,
    /// Cross-fade time in seconds.
    #[serde(default = "default_blend_duration")]
    pub duration: f64,
}

pub fn register(registry: &OperationRegistry) {
    registry.register(OperationDescriptor::of::<CreateClipParams>(
        "create_clip",
        CATEGORY,
        "Create an empty animation clip on an object; returns the clip id",
    ));
    registry.register(OperationDescriptor::of::<SetKeyframeParams>(
        "set_keyframe",
        CATEGORY,
        "Insert or replace a keyframe on a clip",
    ));
    registry.register(OperationDescriptor::of::<BlendAnimationsParams>(
        "blend_animations",
        CATEGORY,
        "Cross-fade from one clip to another",
    ));
}
