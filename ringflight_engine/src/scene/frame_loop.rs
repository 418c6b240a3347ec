/// Display-tick driver: elapsed time, fixed camera and per-frame submission.
///
/// One missed frame must never stop the loop, so `on_display_tick` reports
/// failures instead of returning them.

use glam::{Mat4, Vec3};

use crate::error::{Error, Result};
use crate::graphics_device::ClearColor;
use crate::scene::{DrawContext, Renderable};
use crate::{engine_error, engine_warn};

const SOURCE: &str = "ringflight::FrameLoop";

/// Converts display timestamps (seconds) into elapsed times
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameTicker {
    last: Option<f64>,
}

impl FrameTicker {
    pub fn new() -> Self {
        Self { last: None }
    }

    /// Seconds since the previous tick; 0 on the first one
    pub fn tick(&mut self, timestamp: f64) -> f64 {
        let elapsed = match self.last {
            Some(last) => timestamp - last,
            None => 0.0,
        };
        self.last = Some(timestamp);
        elapsed
    }

    /// Forget the previous timestamp (e.g. after the loop was paused)
    pub fn reset(&mut self) {
        self.last = None;
    }
}

/// Fixed camera and projection parameters
#[derive(Debug, Clone, PartialEq)]
pub struct SceneConfig {
    /// Vertical field of view
    pub fov_degrees: f32,
    pub near: f32,
    pub far: f32,
    /// World translation applied to every object (camera looks down -Z)
    pub camera_offset: Vec3,
    /// World rotation around X, applied before the offset
    pub camera_pitch_degrees: f32,
    /// None uses the renderable default
    pub clear_color: Option<ClearColor>,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            fov_degrees: 85.0,
            near: 0.01,
            far: 100.0,
            camera_offset: Vec3::new(0.0, 0.0, -7.0),
            camera_pitch_degrees: 25.0,
            clear_color: None,
        }
    }
}

impl SceneConfig {
    /// Parent transform of every renderable: `T(camera_offset) * Rx(pitch)`
    pub fn world_matrix(&self) -> Mat4 {
        Mat4::from_translation(self.camera_offset)
            * Mat4::from_rotation_x(self.camera_pitch_degrees.to_radians())
    }

    /// Right-handed perspective projection for `aspect` (width / height)
    ///
    /// # Errors
    ///
    /// `Error::InvalidConfig` for a non-positive or non-finite aspect, or an
    /// unusable field of view / depth range.
    pub fn projection(&self, aspect: f32) -> Result<Mat4> {
        if !aspect.is_finite() || aspect <= 0.0 {
            return Err(Error::InvalidConfig(format!("invalid aspect ratio {}", aspect)));
        }
        if !(self.fov_degrees > 0.0 && self.fov_degrees < 180.0) {
            return Err(Error::InvalidConfig(format!(
                "field of view must be in (0, 180) degrees, got {}",
                self.fov_degrees
            )));
        }
        if !(self.near > 0.0 && self.far > self.near) {
            return Err(Error::InvalidConfig(format!(
                "invalid depth range {}..{}",
                self.near, self.far
            )));
        }
        Ok(Mat4::perspective_rh(
            self.fov_degrees.to_radians(),
            aspect,
            self.near,
            self.far,
        ))
    }
}

/// Outcome of one display tick
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameReport {
    /// Seconds since the previous tick
    pub elapsed: f64,
    /// Renderables whose frame was committed
    pub submitted: usize,
    /// Renderables skipped on a transient draw failure
    pub skipped: usize,
    /// Renderables that hit any other error
    pub failed: usize,
}

pub struct FrameLoop {
    config: SceneConfig,
    ticker: FrameTicker,
    world: Mat4,
    projection: Mat4,
}

impl FrameLoop {
    /// # Errors
    ///
    /// See `SceneConfig::projection`.
    pub fn new(config: SceneConfig, aspect: f32) -> Result<Self> {
        let projection = config.projection(aspect)?;
        let world = config.world_matrix();
        Ok(Self {
            config,
            ticker: FrameTicker::new(),
            world,
            projection,
        })
    }

    pub fn config(&self) -> &SceneConfig {
        &self.config
    }

    pub fn projection(&self) -> &Mat4 {
        &self.projection
    }

    pub fn world_matrix(&self) -> &Mat4 {
        &self.world
    }

    /// Recompute the projection after a resize
    ///
    /// On error the previous projection is kept.
    pub fn set_aspect(&mut self, aspect: f32) -> Result<()> {
        self.projection = self.config.projection(aspect)?;
        Ok(())
    }

    /// Advance every renderable's clock and submit one frame for each
    ///
    /// `ctx.clear_color` is replaced by the scene clear color when the scene
    /// sets one.
    pub fn on_display_tick(
        &mut self,
        timestamp: f64,
        renderables: &mut [Renderable],
        ctx: &DrawContext<'_>,
    ) -> FrameReport {
        let elapsed = self.ticker.tick(timestamp);
        let mut report = FrameReport {
            elapsed,
            ..FrameReport::default()
        };

        let ctx = DrawContext {
            clear_color: self.config.clear_color.or(ctx.clear_color),
            ..*ctx
        };

        for renderable in renderables.iter_mut() {
            renderable.update_with_delta(elapsed);
            match renderable.submit_frame(&ctx, &self.world, &self.projection) {
                Ok(()) => report.submitted += 1,
                Err(e) if e.is_transient() => {
                    engine_warn!(SOURCE, "'{}': frame skipped: {}", renderable.name(), e);
                    report.skipped += 1;
                }
                Err(e) => {
                    engine_error!(SOURCE, "'{}': failed to draw: {}", renderable.name(), e);
                    report.failed += 1;
                }
            }
        }

        report
    }
}

#[cfg(test)]
#[path = "frame_loop_tests.rs"]
mod tests;
