//! Per-frame inputs to traversal and the statistics it produces.

use skyweave_math::Frustum;

use crate::device::GraphicsDevice;

/// What the camera sees this frame.
pub struct RenderContext<'d> {
    pub frustum: Frustum,
    /// Angular size of one screen pixel: arcseconds for sky data, degrees
    /// for planetary data.
    pub fov_scale: f64,
    /// Layer opacity in `[0, 1]`.
    pub opacity: f32,
    pub device: &'d mut dyn GraphicsDevice,
}

impl<'d> RenderContext<'d> {
    pub fn new(frustum: Frustum, fov_scale: f64, device: &'d mut dyn GraphicsDevice) -> Self {
        Self {
            frustum,
            fov_scale,
            opacity: 1.0,
            device,
        }
    }

    pub fn with_opacity(mut self, opacity: f32) -> Self {
        self.opacity = opacity.clamp(0.0, 1.0);
        self
    }
}

/// Pixel scale for a view `fov_degrees` high on a `viewport_height` pixel
/// screen, in the units [`RenderContext::fov_scale`] expects.
pub fn fov_scale_for(fov_degrees: f64, viewport_height: u32, planetary: bool) -> f64 {
    let per_pixel = fov_degrees / viewport_height.max(1) as f64;
    if planetary { per_pixel } else { per_pixel * 3600.0 }
}

/// Counters for one frame of traversal.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Tiles visited by traversal.
    pub tiles_touched: usize,
    /// Tiles that drew at least one quadrant or added catalog rows.
    pub tiles_in_view: usize,
    pub triangles_rendered: usize,
    pub deepest_level: u32,
}
