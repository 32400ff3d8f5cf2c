use std::ops::Add;

use rayon::prelude::*;

use crate::camera::CameraUniform;
use crate::config::{OrderConfig, WORKGROUP_SIZE};
use crate::error::{OrderError, Result};
use crate::indirect::IndirectDrawBuffers;
use crate::project::{Projector, Visibility, sort_key};
use crate::splat::SplatStore;

/// Per-pass tallies. `visible` always equals the instance count the pass wrote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OrderStats {
    pub dispatched: u32,
    pub outside_frustum: u32,
    pub degenerate: u32,
    pub visible: u32,
}

impl Add for OrderStats {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            dispatched: self.dispatched + rhs.dispatched,
            outside_frustum: self.outside_frustum + rhs.outside_frustum,
            degenerate: self.degenerate + rhs.degenerate,
            visible: self.visible + rhs.visible,
        }
    }
}

/// Number of tasks launched for `point_count` splats: whole task groups of
/// [`WORKGROUP_SIZE`], so the tail group runs idle tasks.
pub fn dispatch_len(point_count: usize) -> usize {
    point_count.div_ceil(WORKGROUP_SIZE as usize) * WORKGROUP_SIZE as usize
}

/// Host implementation of the visibility & ordering pass.
///
/// One rayon task per splat id, grouped like GPU workgroups. Visible splats
/// append themselves to the output through an atomic fetch-add on its instance
/// counter, which is the only point of contention.
#[derive(Debug, Clone)]
pub struct OrderPass {
    config: OrderConfig,
}

impl OrderPass {
    pub fn new(config: OrderConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &OrderConfig {
        &self.config
    }

    /// Appends every visible splat of `store` to `out`.
    ///
    /// `out` is not reset here: the frame owner zeroes the counter before each
    /// pass, the same as for the GPU buffers.
    pub fn run(
        &self,
        camera: &CameraUniform,
        store: &SplatStore,
        out: &IndirectDrawBuffers,
    ) -> Result<OrderStats> {
        let point_count = store.point_count();
        if out.capacity() < point_count {
            return Err(OrderError::OutputTooSmall {
                capacity: out.capacity(),
                point_count,
            });
        }

        let _span = tracing::trace_span!("OrderPass", point_count).entered();

        let projector = Projector::new(camera);
        let threshold = self.config.size_threshold;

        let stats = (0..dispatch_len(point_count))
            .into_par_iter()
            .with_min_len(WORKGROUP_SIZE as usize)
            .map(|id| {
                let mut stats = OrderStats {
                    dispatched: 1,
                    ..Default::default()
                };
                // Over-dispatched tail of the last group.
                if id >= point_count {
                    return stats;
                }
                match projector.classify(store.position(id), &store.covariance(id), threshold) {
                    Visibility::OutsideFrustum => stats.outside_frustum = 1,
                    Visibility::Degenerate { .. } => stats.degenerate = 1,
                    Visibility::Visible { depth, .. } => {
                        out.push(sort_key(depth), id as u32);
                        stats.visible = 1;
                    }
                }
                stats
            })
            .reduce(OrderStats::default, |a, b| a + b);

        tracing::debug!(
            point_count,
            visible = stats.visible,
            outside_frustum = stats.outside_frustum,
            degenerate = stats.degenerate,
            "ordering pass done"
        );

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use glam::{Quat, Vec3};
    use rand::Rng;

    use super::*;
    use crate::camera::Camera;
    use crate::indirect::VisibleInstance;
    use crate::project::in_frustum;
    use crate::splat::{Splat, SymMat3};

    fn camera() -> CameraUniform {
        Camera::new(1.0)
            .looking_at(Vec3::new(0.0, 0.0, 10.0), Vec3::ZERO)
            .with_depth_range(0.1, 100.0)
            .uniform()
    }

    fn pass() -> OrderPass {
        OrderPass::new(OrderConfig::default()).expect("default config is valid")
    }

    /// Cloud spread around the camera so that some splats fall outside the
    /// frustum and some are too thin to survive the size filter.
    fn random_cloud(n: usize) -> SplatStore {
        let mut rng = rand::rng();
        let splats: Vec<Splat> = (0..n)
            .map(|_| {
                let position = Vec3::new(
                    rng.random_range(-15.0..15.0),
                    rng.random_range(-15.0..15.0),
                    rng.random_range(-30.0..15.0),
                );
                let scale = if rng.random::<f32>() < 0.2 {
                    Vec3::splat(1e-6)
                } else {
                    Vec3::new(
                        rng.random_range(0.01..0.3),
                        rng.random_range(0.01..0.3),
                        rng.random_range(0.01..0.3),
                    )
                };
                let rotation = Quat::from_euler(
                    glam::EulerRot::XYZ,
                    rng.random_range(0.0..6.28),
                    rng.random_range(0.0..6.28),
                    rng.random_range(0.0..6.28),
                );
                Splat::new(position, SymMat3::from_scale_rotation(scale, rotation))
            })
            .collect();
        SplatStore::from_splats(&splats)
    }

    fn run(store: &SplatStore, camera: &CameraUniform) -> (OrderStats, IndirectDrawBuffers) {
        let out = IndirectDrawBuffers::new(store.point_count());
        let stats = pass().run(camera, store, &out).expect("pass runs");
        (stats, out)
    }

    #[test]
    fn visible_count_is_exact() {
        let store = random_cloud(5000);
        let camera = camera();
        let (stats, out) = run(&store, &camera);

        let projector = Projector::new(&camera);
        let expected: HashSet<u32> = (0..store.point_count())
            .filter(|&id| {
                projector
                    .classify(store.position(id), &store.covariance(id), 1e-4)
                    .is_visible()
            })
            .map(|id| id as u32)
            .collect();

        let emitted: HashSet<u32> = out.visible().iter().map(|v| v.splat_index).collect();
        assert_eq!(out.instance_count() as usize, expected.len());
        assert_eq!(emitted, expected);
        assert_eq!(stats.visible, out.instance_count());
        assert_eq!(
            stats.visible + stats.degenerate + stats.outside_frustum,
            store.point_count() as u32
        );
        assert_eq!(stats.dispatched as usize, dispatch_len(store.point_count()));
        // The random cloud exercises every branch.
        assert!(stats.visible > 0 && stats.degenerate > 0 && stats.outside_frustum > 0);
    }

    #[test]
    fn indices_are_in_range_and_unique() {
        let store = random_cloud(3000);
        let (_, out) = run(&store, &camera());
        let visible = out.visible();
        let unique: HashSet<u32> = visible.iter().map(|v| v.splat_index).collect();
        assert_eq!(unique.len(), visible.len());
        assert!(visible.iter().all(|v| (v.splat_index as usize) < store.point_count()));
    }

    #[test]
    fn frustum_outside_splats_never_emitted() {
        let store = random_cloud(3000);
        let camera = camera();
        let (_, out) = run(&store, &camera);
        let projector = Projector::new(&camera);
        let in_frustum_count = (0..store.point_count())
            .filter(|&id| in_frustum(projector.ndc(store.position(id))))
            .count();

        assert!(out.instance_count() as usize <= in_frustum_count);
        for v in out.visible() {
            assert!(in_frustum(projector.ndc(store.position(v.splat_index as usize))));
        }
    }

    #[test]
    fn keys_follow_depth() {
        let store = random_cloud(2000);
        let camera = camera();
        let (_, out) = run(&store, &camera);
        let projector = Projector::new(&camera);
        for v in out.visible() {
            let depth = projector.ndc(store.position(v.splat_index as usize)).z;
            assert_eq!(v.sort_key, sort_key(depth));
        }

        let sorted = out.sorted_back_to_front();
        let depths: Vec<f32> = sorted
            .iter()
            .map(|v| projector.ndc(store.position(v.splat_index as usize)).z)
            .collect();
        assert!(depths.windows(2).all(|w| w[0] >= w[1]), "not far-to-near");
    }

    #[test]
    fn nearer_splat_gets_larger_key() {
        let cov = SymMat3::isotropic(0.2);
        let store = SplatStore::from_splats(&[
            Splat::new(Vec3::new(0.0, 0.0, -20.0), cov),
            Splat::new(Vec3::new(0.0, 0.0, 5.0), cov),
        ]);
        let (_, out) = run(&store, &camera());
        let mut visible = out.visible();
        visible.sort_by_key(|v| v.splat_index);
        assert_eq!(visible.len(), 2);
        assert!(visible[1].sort_key > visible[0].sort_key);
    }

    #[test]
    fn repeated_frames_emit_the_same_set() {
        let store = random_cloud(4000);
        let camera = camera();
        let mut out = IndirectDrawBuffers::new(store.point_count());

        let mut frames = Vec::new();
        for _ in 0..3 {
            out.reset();
            pass().run(&camera, &store, &out).unwrap();
            let set: HashSet<VisibleInstance> = out.visible().into_iter().collect();
            frames.push(set);
        }
        assert_eq!(frames[0], frames[1]);
        assert_eq!(frames[1], frames[2]);
    }

    #[test]
    fn thousand_splats_in_view_are_all_emitted() {
        let mut rng = rand::rng();
        let splats: Vec<Splat> = (0..1000)
            .map(|_| {
                let position = Vec3::new(
                    rng.random_range(-2.0..2.0),
                    rng.random_range(-2.0..2.0),
                    rng.random_range(-2.0..2.0),
                );
                Splat::new(position, SymMat3::isotropic(rng.random_range(0.05..0.2)))
            })
            .collect();
        let store = SplatStore::from_splats(&splats);
        let (stats, out) = run(&store, &camera());

        assert_eq!(out.instance_count(), 1000);
        assert_eq!(stats.visible, 1000);
        let mut indices: Vec<u32> = out.visible().iter().map(|v| v.splat_index).collect();
        indices.sort_unstable();
        assert_eq!(indices, (0..1000).collect::<Vec<u32>>());
    }

    #[test]
    fn far_plane_is_inclusive() {
        // An identity camera puts NDC == world, so z = 1 sits exactly on the far plane.
        let camera = CameraUniform::new(glam::Mat4::IDENTITY, glam::Mat4::IDENTITY);
        let store = SplatStore::from_splats(&[
            Splat::new(Vec3::new(0.0, 0.0, 1.0), SymMat3::isotropic(0.5)),
            Splat::new(Vec3::new(0.0, 0.0, 1.0001), SymMat3::isotropic(0.5)),
            Splat::new(Vec3::new(1.0, -1.0, 0.5), SymMat3::isotropic(0.5)),
        ]);
        let (_, out) = run(&store, &camera);
        let mut indices: Vec<u32> = out.visible().iter().map(|v| v.splat_index).collect();
        indices.sort_unstable();
        assert_eq!(indices, vec![0, 2]);

        let key = out
            .visible()
            .into_iter()
            .find(|v| v.splat_index == 0)
            .map(|v| v.sort_key);
        assert_eq!(key, Some(0));
    }

    #[test]
    fn thin_splat_in_view_is_dropped() {
        let config = OrderConfig::default().with_size_threshold(1e-3);
        let store = SplatStore::from_splats(&[
            Splat::new(Vec3::ZERO, SymMat3::diagonal(Vec3::new(0.1, 1e-10, 0.1))),
            Splat::new(Vec3::ZERO, SymMat3::isotropic(0.1)),
        ]);
        let out = IndirectDrawBuffers::new(2);
        let stats = OrderPass::new(config)
            .unwrap()
            .run(&camera(), &store, &out)
            .unwrap();
        assert_eq!(stats.degenerate, 1);
        assert_eq!(out.visible().iter().map(|v| v.splat_index).collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn undersized_output_is_an_error() {
        let store = random_cloud(10);
        let out = IndirectDrawBuffers::new(5);
        let err = pass().run(&camera(), &store, &out).unwrap_err();
        assert!(matches!(
            err,
            OrderError::OutputTooSmall {
                capacity: 5,
                point_count: 10
            }
        ));
    }

    #[test]
    fn empty_store_emits_nothing() {
        let store = SplatStore::default();
        let (stats, out) = run(&store, &camera());
        assert_eq!(stats, OrderStats::default());
        assert_eq!(out.instance_count(), 0);
    }
}
