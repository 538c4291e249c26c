//! Depth-only passes.
//!
//! The depth pre-pass and the shadow pass share one pipeline recipe
//! (position-only vertex input, no fragment stage, depth test and write on)
//! and differ only in their target texture and the camera they render from.
//!
//! Per frame the order is: shadow map, depth pre-pass, then the main color
//! pass which loads the pre-pass depth and tests with `LessEqual`. For that
//! test to accept exactly the pre-pass fragments, both passes must push the
//! same MVP bytes; [`OpaqueCastable`] carries them, computed once.

mod depth;
mod shadow;

pub use depth::{
    DepthPassConfig, DepthPassInfo, OpaqueCastable, create_depth_only_pipeline,
    render_depth_only_pass, render_depth_pass_into,
};
pub use shadow::{
    DEFAULT_SHADOW_MAP_SIZE, ShadowFit, ShadowPassConfig, ShadowPassInfo, fit_shadow_to_aabb,
    fit_shadow_to_frustum, render_shadow_pass_from_aabb, render_shadow_pass_from_frustum,
};
