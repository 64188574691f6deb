//! Camera placement that keeps the whole model on screen.

use nalgebra::{Matrix4, Perspective3, Point3, UnitQuaternion, Vector3};

use super::geometry::Aabb;

pub const DEFAULT_MARGIN: f32 = 1.35;
pub const DEFAULT_FOV_Y_DEG: f32 = 45.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitOptions {
    pub fov_y_deg: f32,
    /// Multiplier on the bounding-sphere radius; 1.0 touches the frame edges.
    pub margin: f32,
    /// Direction from target to camera. Z is up, as on the print bed.
    pub view_axis: Vector3<f32>,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            fov_y_deg: DEFAULT_FOV_Y_DEG,
            margin: DEFAULT_MARGIN,
            view_axis: Vector3::new(1.0, -1.4, 1.0),
        }
    }
}

/// Horizontal field of view for a vertical FOV and aspect ratio (radians).
pub fn horizontal_fov(fov_y: f32, aspect: f32) -> f32 {
    2.0 * ((fov_y * 0.5).tan() * aspect).atan()
}

/// Distance at which a sphere of `radius` fits both the vertical and the
/// horizontal field of view with `margin`. The larger of the two wins, so wide
/// or tall viewports never clip the model.
pub fn fit_distance(radius: f32, fov_y: f32, aspect: f32, margin: f32) -> f32 {
    let fov_x = horizontal_fov(fov_y, aspect);
    let vertical = margin * radius / (fov_y * 0.5).sin();
    let horizontal = margin * radius / (fov_x * 0.5).sin();
    vertical.max(horizontal)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Framing {
    pub target: Point3<f32>,
    pub radius: f32,
    pub distance: f32,
    pub eye: Point3<f32>,
    pub fov_y: f32,
    pub near: f32,
    pub far: f32,
}

impl Framing {
    pub fn fit(bounds: &Aabb, aspect: f32, options: &FitOptions) -> Self {
        let aspect = if aspect.is_finite() && aspect > 0.0 { aspect } else { 1.0 };
        let radius = bounds.bounding_radius().max(1e-3);
        let fov_y = options.fov_y_deg.clamp(1.0, 170.0).to_radians();
        let distance = fit_distance(radius, fov_y, aspect, options.margin.max(1.0));
        let axis = options
            .view_axis
            .try_normalize(f32::EPSILON)
            .unwrap_or_else(Vector3::z);
        let target = bounds.center();

        Self {
            target,
            radius,
            distance,
            eye: target + axis * distance,
            fov_y,
            near: (distance - radius * 2.0).max(distance * 0.01),
            far: distance + radius * 4.0,
        }
    }
}

/// User-controlled orbit around a fitted framing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrbitCamera {
    pub rotation: UnitQuaternion<f32>,
    /// Dolly factor: 2.0 halves the fitted distance.
    pub zoom: f32,
}

impl Default for OrbitCamera {
    fn default() -> Self {
        Self {
            rotation: UnitQuaternion::identity(),
            zoom: 1.0,
        }
    }
}

impl OrbitCamera {
    pub fn drag(&mut self, dx: f32, dy: f32) {
        let yaw = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), -dx * 0.01);
        let pitch = UnitQuaternion::from_axis_angle(&Vector3::x_axis(), -dy * 0.01);
        self.rotation = yaw * self.rotation * pitch;
    }

    pub fn scroll(&mut self, delta: f32) {
        self.zoom = (self.zoom * (1.0 + delta * 0.001)).clamp(0.2, 20.0);
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Projection * view for the current orbit around `framing`.
    pub fn view_projection(&self, framing: &Framing, aspect: f32) -> Matrix4<f32> {
        let aspect = if aspect.is_finite() && aspect > 0.0 { aspect } else { 1.0 };
        let offset = self.rotation * (framing.eye - framing.target) / self.zoom;
        let eye = framing.target + offset;
        let up = self.rotation * Vector3::z();
        let view = Matrix4::look_at_rh(&eye, &framing.target, &up);
        let far = framing.far.max(offset.norm() + framing.radius * 4.0);
        let near = (offset.norm() - framing.radius * 2.0).max(far * 1e-4);
        let proj = Perspective3::new(aspect, framing.fov_y, near, far).to_homogeneous();
        proj * view
    }
}
