/// Orbit camera for the viewport
use nalgebra::{Matrix4, Point3, Vector3};

/// Camera circling a target at a fixed distance
#[derive(Debug, Clone)]
pub struct Camera {
    pub target: Point3<f32>,
    pub distance: f32,
    /// Rotation around the vertical axis, radians
    pub yaw: f32,
    /// Elevation above the horizon, radians
    pub pitch: f32,
    pub fov: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
}

const MAX_PITCH: f32 = 1.5;

impl Camera {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            target: Point3::origin(),
            distance: 6.0,
            yaw: 0.6,
            pitch: 0.4,
            fov: std::f32::consts::PI / 4.0, // 45 degrees
            // Terminal cells are about twice as tall as they are wide
            aspect: width as f32 / (height.max(1) as f32 * 2.0),
            near: 0.1,
            far: 1000.0,
        }
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.aspect = width as f32 / (height.max(1) as f32 * 2.0);
    }

    pub fn orbit(&mut self, d_yaw: f32, d_pitch: f32) {
        self.yaw += d_yaw;
        self.pitch = (self.pitch + d_pitch).clamp(-MAX_PITCH, MAX_PITCH);
    }

    pub fn zoom(&mut self, factor: f32) {
        self.distance = (self.distance * factor).clamp(self.near * 2.0, self.far / 2.0);
    }

    /// Aim at the centre of an axis-aligned box and back off far enough to
    /// see all of it.
    pub fn frame(&mut self, min: Point3<f32>, max: Point3<f32>) {
        self.target = nalgebra::center(&min, &max);
        let radius = (max - min).norm() * 0.5;
        self.distance = (radius / (self.fov * 0.5).tan() * 1.2).max(1.0);
    }

    pub fn position(&self) -> Point3<f32> {
        let offset = Vector3::new(
            self.pitch.cos() * self.yaw.sin(),
            self.pitch.sin(),
            self.pitch.cos() * self.yaw.cos(),
        );
        self.target + offset * self.distance
    }

    /// Unit vector from the target towards the camera
    pub fn eye_direction(&self) -> Vector3<f32> {
        (self.position() - self.target).normalize()
    }

    pub fn view_matrix(&self) -> Matrix4<f32> {
        Matrix4::look_at_rh(&self.position(), &self.target, &Vector3::y())
    }

    pub fn projection_matrix(&self) -> Matrix4<f32> {
        Matrix4::new_perspective(self.aspect, self.fov, self.near, self.far)
    }

    pub fn view_projection(&self) -> Matrix4<f32> {
        self.projection_matrix() * self.view_matrix()
    }

    /// Project a world-space point to screen space. Returns `None` for
    /// points behind the camera or outside the view.
    pub fn project_to_screen(
        &self,
        view_projection: &Matrix4<f32>,
        point: &Point3<f32>,
        width: u32,
        height: u32,
    ) -> Option<(f32, f32, f32)> {
        let clip = view_projection * point.to_homogeneous();
        if clip.w <= self.near * 0.5 {
            return None;
        }

        let ndc = clip.xyz() / clip.w;
        if ndc.x.abs() > 1.5 || ndc.y.abs() > 1.5 {
            return None;
        }

        let screen_x = (ndc.x + 1.0) * 0.5 * width as f32;
        let screen_y = (1.0 - ndc.y) * 0.5 * height as f32;
        Some((screen_x, screen_y, ndc.z))
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::new(80, 24)
    }
}
