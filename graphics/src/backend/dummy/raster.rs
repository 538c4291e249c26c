//! Software depth rasterizer used by the dummy backend.
//!
//! Rules:
//! - clip space is divided by `w`; triangles with a vertex at `w <= 0` are
//!   dropped rather than clipped
//! - NDC `y` points up and maps to texel row 0 at `y = 1`
//! - a texel is covered when its centre lies inside the triangle or on one of
//!   its edges
//! - depth is interpolated linearly in screen space and fragments outside
//!   `[0, 1]` are discarded

use umbra_core::math::Vec4;

use crate::types::{CompareFunction, CullMode, DepthBias, FrontFace, Viewport};

/// A depth buffer being rendered into.
pub struct DepthTarget<'a> {
    pub width: u32,
    pub height: u32,
    pub texels: &'a mut [f32],
}

/// Fixed-function state for one draw.
#[derive(Debug, Clone, Copy)]
pub struct RasterState {
    pub viewport: Viewport,
    pub compare: CompareFunction,
    pub depth_write: bool,
    pub cull_mode: CullMode,
    pub front_face: FrontFace,
    pub depth_bias: DepthBias,
}

/// Rasterize one triangle. Returns the number of texels that passed the depth test.
pub fn rasterize_triangle(
    target: &mut DepthTarget<'_>,
    clip: [Vec4; 3],
    state: &RasterState,
) -> usize {
    if clip.iter().any(|v| v.w <= 0.0) {
        return 0;
    }
    let ndc = clip.map(|v| [(v.x / v.w) as f64, (v.y / v.w) as f64, (v.z / v.w) as f64]);

    // Winding in NDC, where y points up.
    let ndc_area = (ndc[1][0] - ndc[0][0]) * (ndc[2][1] - ndc[0][1])
        - (ndc[2][0] - ndc[0][0]) * (ndc[1][1] - ndc[0][1]);
    if ndc_area == 0.0 {
        return 0;
    }
    let counter_clockwise = ndc_area > 0.0;
    let front = match state.front_face {
        FrontFace::CounterClockwise => counter_clockwise,
        FrontFace::Clockwise => !counter_clockwise,
    };
    match state.cull_mode {
        CullMode::Back if !front => return 0,
        CullMode::Front if front => return 0,
        _ => {}
    }

    let vp = &state.viewport;
    let screen = ndc.map(|[x, y, z]| {
        [
            vp.x as f64 + (x + 1.0) * 0.5 * vp.width as f64,
            vp.y as f64 + (1.0 - y) * 0.5 * vp.height as f64,
            vp.min_depth as f64 + z * (vp.max_depth - vp.min_depth) as f64,
        ]
    });

    let edge = |a: [f64; 3], b: [f64; 3], px: f64, py: f64| {
        (b[0] - a[0]) * (py - a[1]) - (b[1] - a[1]) * (px - a[0])
    };
    let area = edge(screen[0], screen[1], screen[2][0], screen[2][1]);
    if area == 0.0 {
        return 0;
    }

    let min_x = screen.iter().map(|v| v[0]).fold(f64::MAX, f64::min).max(vp.x as f64);
    let max_x = screen
        .iter()
        .map(|v| v[0])
        .fold(f64::MIN, f64::max)
        .min((vp.x + vp.width) as f64);
    let min_y = screen.iter().map(|v| v[1]).fold(f64::MAX, f64::min).max(vp.y as f64);
    let max_y = screen
        .iter()
        .map(|v| v[1])
        .fold(f64::MIN, f64::max)
        .min((vp.y + vp.height) as f64);

    let x0 = (min_x - 0.5).ceil().max(0.0) as i64;
    let x1 = ((max_x - 0.5).floor() as i64).min(target.width as i64 - 1);
    let y0 = (min_y - 0.5).ceil().max(0.0) as i64;
    let y1 = ((max_y - 0.5).floor() as i64).min(target.height as i64 - 1);

    let bias = depth_bias(&screen, area, &state.depth_bias);

    let mut written = 0;
    for py in y0..=y1 {
        for px in x0..=x1 {
            let cx = px as f64 + 0.5;
            let cy = py as f64 + 0.5;
            let w0 = edge(screen[1], screen[2], cx, cy) / area;
            let w1 = edge(screen[2], screen[0], cx, cy) / area;
            let w2 = edge(screen[0], screen[1], cx, cy) / area;
            if w0 < 0.0 || w1 < 0.0 || w2 < 0.0 {
                continue;
            }
            let depth = (w0 * screen[0][2] + w1 * screen[1][2] + w2 * screen[2][2] + bias) as f32;
            if !(0.0..=1.0).contains(&depth) {
                continue;
            }
            let index = (py as u32 * target.width + px as u32) as usize;
            if state.compare.passes(depth, target.texels[index]) {
                if state.depth_write {
                    target.texels[index] = depth;
                }
                written += 1;
            }
        }
    }
    written
}

/// Constant plus slope-scaled bias, in the units of a 32-bit float depth buffer.
fn depth_bias(screen: &[[f64; 3]; 3], area: f64, bias: &DepthBias) -> f64 {
    if !bias.is_enabled() {
        return 0.0;
    }
    let [a, b, c] = screen;
    let dzdx = ((b[2] - a[2]) * (c[1] - a[1]) - (c[2] - a[2]) * (b[1] - a[1])) / area;
    let dzdy = ((c[2] - a[2]) * (b[0] - a[0]) - (b[2] - a[2]) * (c[0] - a[0])) / area;
    let max_slope = dzdx.abs().max(dzdy.abs());
    let value = bias.constant as f64 * f64::powi(2.0, -23) + bias.slope_scale as f64 * max_slope;
    if bias.clamp > 0.0 {
        value.min(bias.clamp as f64)
    } else if bias.clamp < 0.0 {
        value.max(bias.clamp as f64)
    } else {
        value
    }
}
