//! Per-splat projection, culling and sort-key math.
//!
//! This mirrors `order.wgsl` line for line so the host implementation can be
//! used as a reference for the GPU pass.

use glam::{Mat2, Mat3, Mat4, Vec2, Vec3, Vec3Swizzles, Vec4Swizzles};

use crate::camera::CameraUniform;
use crate::splat::SymMat3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Visibility {
    /// The centre lies outside the `[-1, 1]² × [0, 1]` NDC box.
    OutsideFrustum,
    /// Projected footprint is below the size threshold along at least one axis,
    /// or the covariance is not positive semi-definite (NaN radii).
    Degenerate { radii: Vec2 },
    Visible { depth: f32, radii: Vec2 },
}

impl Visibility {
    pub fn is_visible(&self) -> bool {
        matches!(self, Visibility::Visible { .. })
    }
}

/// Perspective-divided position of a world-space point.
pub fn project_ndc(view_proj: &Mat4, position: Vec3) -> Vec3 {
    let clip = *view_proj * position.extend(1.0);
    clip.xyz() / clip.w
}

/// Centre-point frustum test. Inclusive on every bound, so a splat with
/// `ndc.z == 1.0` is kept.
///
/// Large splats whose centre is just outside the box are dropped even if part of
/// their footprint would be on screen.
pub fn in_frustum(ndc: Vec3) -> bool {
    ndc.x.abs() <= 1.0 && ndc.y.abs() <= 1.0 && ndc.z >= 0.0 && ndc.z <= 1.0
}

/// Camera matrices pre-split into the pieces the per-splat math needs.
#[derive(Debug, Clone, Copy)]
pub struct Projector {
    view: Mat4,
    view_proj: Mat4,
    view_rotation: Mat3,
    screen_scale: Mat2,
}

impl Projector {
    pub fn new(camera: &CameraUniform) -> Self {
        let view = camera.view();
        let projection = camera.projection();
        Self {
            view,
            view_proj: projection * view,
            view_rotation: Mat3::from_mat4(view),
            screen_scale: Mat2::from_cols(projection.x_axis.xy(), projection.y_axis.xy()),
        }
    }

    pub fn ndc(&self, position: Vec3) -> Vec3 {
        project_ndc(&self.view_proj, position)
    }

    /// Screen-space 2x2 covariance of a splat, using the local affine
    /// approximation of the perspective projection at its view-space position.
    pub fn covariance_2d(&self, position: Vec3, cov3d: &SymMat3) -> Mat2 {
        let cov_view = self.view_rotation * cov3d.to_mat3() * self.view_rotation.transpose();

        let p = (self.view * position.extend(1.0)).xyz();
        let r = p.length();
        let j = Mat3::from_cols(
            Vec3::new(-1.0 / p.z, 0.0, -2.0 * p.x / r),
            Vec3::new(0.0, -1.0 / p.z, -2.0 * p.y / r),
            Vec3::new(p.x / p.z / p.z, p.y / p.z / p.z, -2.0 * p.z / r),
        );
        let cov = j * cov_view * j.transpose();

        let cov2 = Mat2::from_cols(cov.x_axis.xy(), cov.y_axis.xy());
        self.screen_scale * cov2 * self.screen_scale.transpose()
    }

    /// Runs the projection, frustum cull and size filter for one splat.
    pub fn classify(&self, position: Vec3, cov3d: &SymMat3, size_threshold: f32) -> Visibility {
        let ndc = self.ndc(position);
        if !in_frustum(ndc) {
            return Visibility::OutsideFrustum;
        }

        let radii = eigen_radii(&self.covariance_2d(position, cov3d));
        // NaN radii fail both comparisons.
        if radii.x >= size_threshold && radii.y >= size_threshold {
            Visibility::Visible {
                depth: ndc.z,
                radii,
            }
        } else {
            Visibility::Degenerate { radii }
        }
    }
}

/// Closed-form eigen-radii `(s0, s1)` of a symmetric 2x2 covariance, `s0 >= s1`.
///
/// A matrix that is not positive semi-definite yields NaN for `s1`.
pub fn eigen_radii(cov2d: &Mat2) -> Vec2 {
    let a = cov2d.x_axis.x;
    let b = cov2d.y_axis.y;
    let c = cov2d.y_axis.x;
    let d = ((a - b) * (a - b) + 4.0 * c * c).sqrt();
    Vec2::new((0.5 * (a + b + d)).sqrt(), (0.5 * (a + b - d)).sqrt())
}

/// Sort key for a visible splat: the bit pattern of `1 - depth`.
///
/// For depths in `[0, 1]` the float is non-negative, so its bits compare like
/// the float itself and nearer splats get larger keys.
pub fn sort_key(depth: f32) -> u32 {
    (1.0 - depth).to_bits()
}

/// One-off classification of a single splat. Prefer [`Projector`] when
/// classifying many splats against the same camera.
pub fn classify(
    camera: &CameraUniform,
    position: Vec3,
    cov3d: &SymMat3,
    size_threshold: f32,
) -> Visibility {
    Projector::new(camera).classify(position, cov3d, size_threshold)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::Camera;
    use glam::Quat;

    fn camera() -> CameraUniform {
        Camera::new(1.0)
            .looking_at(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO)
            .with_depth_range(0.1, 100.0)
            .uniform()
    }

    #[test]
    fn eigen_radii_of_diagonal() {
        let radii = eigen_radii(&Mat2::from_diagonal(glam::vec2(4.0, 9.0)));
        assert!((radii.x - 3.0).abs() < 1e-6);
        assert!((radii.y - 2.0).abs() < 1e-6);
    }

    #[test]
    fn eigen_radii_match_rotated_matrix() {
        let rot = Mat2::from_angle(0.6);
        let cov = rot * Mat2::from_diagonal(glam::vec2(16.0, 1.0)) * rot.transpose();
        let radii = eigen_radii(&cov);
        assert!((radii.x - 4.0).abs() < 1e-4);
        assert!((radii.y - 1.0).abs() < 1e-4);
    }

    #[test]
    fn indefinite_covariance_gives_nan_radius() {
        let radii = eigen_radii(&Mat2::from_diagonal(glam::vec2(1.0, -1.0)));
        assert!(radii.y.is_nan());
    }

    #[test]
    fn covariance_2d_keeps_the_upper_left_block() {
        let projector = Projector::new(&camera());
        let cov3d = SymMat3::diagonal(Vec3::new(0.04, 0.01, 0.02));
        let cov = projector.covariance_2d(Vec3::ZERO, &cov3d);
        // Axis-aligned splat on the optical axis: no shear, wider along x.
        assert!(cov.x_axis.y.abs() < 1e-6);
        assert!(cov.y_axis.x.abs() < 1e-6);
        assert!(cov.x_axis.x > cov.y_axis.y);
        assert!(cov.y_axis.y > 0.0);
    }

    #[test]
    fn keys_decrease_with_depth() {
        let depths = [0.0, 0.1, 0.25, 0.5, 0.75, 0.999, 1.0];
        for pair in depths.windows(2) {
            assert!(sort_key(pair[0]) > sort_key(pair[1]));
        }
        assert_eq!(sort_key(1.0), 0);
        assert_eq!(sort_key(0.0), 1.0f32.to_bits());
    }

    #[test]
    fn centre_splat_is_visible() {
        let visibility = classify(&camera(), Vec3::ZERO, &SymMat3::isotropic(0.1), 1e-4);
        let Visibility::Visible { depth, radii } = visibility else {
            panic!("expected visible, got {visibility:?}");
        };
        assert!(depth > 0.0 && depth < 1.0);
        // Isotropic splat on the optical axis stays circular.
        assert!((radii.x - radii.y).abs() < 1e-5);
    }

    #[test]
    fn behind_camera_is_culled() {
        let visibility = classify(&camera(), Vec3::new(0.0, 0.0, 10.0), &SymMat3::isotropic(0.1), 1e-4);
        assert_eq!(visibility, Visibility::OutsideFrustum);
    }

    #[test]
    fn off_to_the_side_is_culled() {
        let visibility = classify(&camera(), Vec3::new(50.0, 0.0, 0.0), &SymMat3::isotropic(0.1), 1e-4);
        assert_eq!(visibility, Visibility::OutsideFrustum);
    }

    #[test]
    fn flat_splat_is_degenerate() {
        // Zero extent along y: s1 collapses to zero.
        let cov = SymMat3::diagonal(Vec3::new(0.5, 0.0, 0.5));
        let visibility = classify(&camera(), Vec3::ZERO, &cov, 1e-4);
        assert!(matches!(visibility, Visibility::Degenerate { .. }));
    }

    #[test]
    fn threshold_controls_cutoff() {
        let cov = SymMat3::from_scale_rotation(Vec3::splat(0.05), Quat::IDENTITY);
        let Visibility::Visible { radii, .. } = classify(&camera(), Vec3::ZERO, &cov, 0.0) else {
            panic!("expected visible");
        };
        assert!(classify(&camera(), Vec3::ZERO, &cov, radii.y * 0.5).is_visible());
        assert!(!classify(&camera(), Vec3::ZERO, &cov, radii.y * 2.0).is_visible());
    }
}
