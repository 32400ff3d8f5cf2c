use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};

/// Per-frame camera block read by the ordering pass (group 0, binding 0).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct CameraUniform {
    pub projection: [[f32; 4]; 4],
    pub view: [[f32; 4]; 4],
}

impl CameraUniform {
    pub fn new(projection: Mat4, view: Mat4) -> Self {
        Self {
            projection: projection.to_cols_array_2d(),
            view: view.to_cols_array_2d(),
        }
    }

    pub fn projection(&self) -> Mat4 {
        Mat4::from_cols_array_2d(&self.projection)
    }

    pub fn view(&self) -> Mat4 {
        Mat4::from_cols_array_2d(&self.view)
    }
}

/// Look-at camera with a right handed, `[0, 1]` depth perspective projection.
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    pub eye: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    pub aspect: f32,
    pub fovy: f32,
    pub znear: f32,
    pub zfar: f32,
}

impl Camera {
    pub fn new(aspect: f32) -> Self {
        Self {
            eye: Vec3::new(0.0, 0.0, 5.0),
            target: Vec3::ZERO,
            up: Vec3::Y,
            aspect,
            fovy: 45.0f32.to_radians(),
            znear: 0.1,
            zfar: 1000.0,
        }
    }

    pub fn looking_at(mut self, eye: Vec3, target: Vec3) -> Self {
        self.eye = eye;
        self.target = target;
        self
    }

    pub fn with_depth_range(mut self, znear: f32, zfar: f32) -> Self {
        self.znear = znear;
        self.zfar = zfar;
        self
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.eye, self.target, self.up)
    }

    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(self.fovy, self.aspect, self.znear, self.zfar)
    }

    pub fn uniform(&self) -> CameraUniform {
        CameraUniform::new(self.projection_matrix(), self.view_matrix())
    }
}
