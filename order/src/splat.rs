use glam::{Mat3, Quat, Vec3, Vec4};

use crate::error::{OrderError, Result};

pub const POSITION_STRIDE: usize = 3;
pub const COVARIANCE_STRIDE: usize = 6;
pub const COLOR_STRIDE: usize = 4;

/// Symmetric 3x3 matrix stored as its upper triangle,
/// `[xx, xy, xz, yy, yz, zz]`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SymMat3(pub [f32; 6]);

impl SymMat3 {
    pub fn diagonal(d: Vec3) -> Self {
        Self([d.x, 0.0, 0.0, d.y, 0.0, d.z])
    }

    pub fn isotropic(sigma: f32) -> Self {
        Self::diagonal(Vec3::splat(sigma * sigma))
    }

    /// Covariance of a Gaussian with per-axis standard deviation `scale`, rotated
    /// by `rotation`: `R S Sᵀ Rᵀ`.
    pub fn from_scale_rotation(scale: Vec3, rotation: Quat) -> Self {
        let m = Mat3::from_quat(rotation.normalize()) * Mat3::from_diagonal(scale);
        Self::from_mat3(&(m * m.transpose()))
    }

    pub fn from_mat3(m: &Mat3) -> Self {
        Self([
            m.x_axis.x, m.y_axis.x, m.z_axis.x, m.y_axis.y, m.z_axis.y, m.z_axis.z,
        ])
    }

    pub fn from_slice(packed: &[f32]) -> Self {
        let mut out = [0.0; 6];
        out.copy_from_slice(&packed[..COVARIANCE_STRIDE]);
        Self(out)
    }

    /// Expands to the full matrix
    /// `[[v0.x, v0.y, v0.z], [v0.y, v1.x, v1.y], [v0.z, v1.y, v1.z]]`.
    pub fn to_mat3(&self) -> Mat3 {
        let [xx, xy, xz, yy, yz, zz] = self.0;
        Mat3::from_cols(
            Vec3::new(xx, xy, xz),
            Vec3::new(xy, yy, yz),
            Vec3::new(xz, yz, zz),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Splat {
    pub position: Vec3,
    pub covariance: SymMat3,
    /// Linear rgb in `xyz`, opacity in `w`. Only read by the render pipeline.
    pub color: Vec4,
}

impl Splat {
    pub fn new(position: Vec3, covariance: SymMat3) -> Self {
        Self {
            position,
            covariance,
            color: Vec4::ONE,
        }
    }

    pub fn with_color(mut self, color: Vec4) -> Self {
        self.color = color;
        self
    }
}

/// Immutable splat attributes for one scene, laid out as the flat float arrays
/// the ordering pass binds: positions `(N, 3)`, covariances `(N, 6)` and
/// colors `(N, 4)`.
#[derive(Debug, Clone, Default)]
pub struct SplatStore {
    positions: Vec<f32>,
    cov3d: Vec<f32>,
    colors: Vec<f32>,
}

impl SplatStore {
    pub fn new(positions: Vec<f32>, cov3d: Vec<f32>) -> Result<Self> {
        let n = positions.len() / POSITION_STRIDE;
        let colors = [1.0; COLOR_STRIDE].repeat(n);
        Self::with_colors(positions, cov3d, colors)
    }

    pub fn with_colors(positions: Vec<f32>, cov3d: Vec<f32>, colors: Vec<f32>) -> Result<Self> {
        let n = positions.len() / POSITION_STRIDE;
        check_len("positions", positions.len(), n * POSITION_STRIDE)?;
        check_len("cov3d", cov3d.len(), n * COVARIANCE_STRIDE)?;
        check_len("colors", colors.len(), n * COLOR_STRIDE)?;
        Ok(Self {
            positions,
            cov3d,
            colors,
        })
    }

    pub fn from_splats<'a>(splats: impl IntoIterator<Item = &'a Splat>) -> Self {
        let mut store = Self::default();
        for splat in splats {
            store.positions.extend_from_slice(&splat.position.to_array());
            store.cov3d.extend_from_slice(&splat.covariance.0);
            store.colors.extend_from_slice(&splat.color.to_array());
        }
        store
    }

    pub fn point_count(&self) -> usize {
        self.positions.len() / POSITION_STRIDE
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn positions(&self) -> &[f32] {
        &self.positions
    }

    pub fn cov3d(&self) -> &[f32] {
        &self.cov3d
    }

    pub fn colors(&self) -> &[f32] {
        &self.colors
    }

    pub fn position(&self, id: usize) -> Vec3 {
        Vec3::from_slice(&self.positions[id * POSITION_STRIDE..])
    }

    pub fn covariance(&self, id: usize) -> SymMat3 {
        SymMat3::from_slice(&self.cov3d[id * COVARIANCE_STRIDE..])
    }

    pub fn splat(&self, id: usize) -> Splat {
        Splat {
            position: self.position(id),
            covariance: self.covariance(id),
            color: Vec4::from_slice(&self.colors[id * COLOR_STRIDE..]),
        }
    }
}

fn check_len(name: &'static str, actual: usize, expected: usize) -> Result<()> {
    if actual != expected {
        return Err(OrderError::AttributeLength {
            name,
            expected,
            actual,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packing_is_symmetric() {
        let cov = SymMat3([1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let m = cov.to_mat3();
        assert_eq!(m, m.transpose());
        assert_eq!(m.row(0), Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(m.row(1), Vec3::new(2.0, 4.0, 5.0));
        assert_eq!(m.row(2), Vec3::new(3.0, 5.0, 6.0));
        assert_eq!(SymMat3::from_mat3(&m), cov);
    }

    #[test]
    fn scale_rotation_keeps_eigenvalues() {
        let rotation = Quat::from_rotation_y(0.7) * Quat::from_rotation_x(-0.3);
        let cov = SymMat3::from_scale_rotation(Vec3::new(1.0, 2.0, 3.0), rotation).to_mat3();
        // Trace and determinant are rotation invariant.
        assert!((cov.x_axis.x + cov.y_axis.y + cov.z_axis.z - 14.0).abs() < 1e-4);
        assert!((cov.determinant() - 36.0).abs() < 1e-3);
    }

    #[test]
    fn store_rejects_ragged_arrays() {
        let err = SplatStore::new(vec![0.0; 6], vec![0.0; 6]).unwrap_err();
        assert!(matches!(
            err,
            OrderError::AttributeLength {
                name: "cov3d",
                expected: 12,
                actual: 6
            }
        ));
        assert!(SplatStore::new(vec![0.0; 4], vec![]).is_err());
    }

    #[test]
    fn store_round_trips_splats() {
        let splats = [
            Splat::new(Vec3::new(1.0, 2.0, 3.0), SymMat3::isotropic(0.5)),
            Splat::new(Vec3::new(-1.0, 0.0, 4.0), SymMat3([1.0, 0.1, 0.2, 2.0, 0.3, 3.0]))
                .with_color(Vec4::new(0.2, 0.4, 0.6, 0.5)),
        ];
        let store = SplatStore::from_splats(&splats);
        assert_eq!(store.point_count(), 2);
        assert_eq!(store.splat(0), splats[0]);
        assert_eq!(store.splat(1), splats[1]);
    }
}
