//! Fixtures shared by the unit tests of this crate.

use std::sync::Arc;

use glam::Vec3;
use hlod_common::{Cube, MaterialId, MeshHandle, ProxyId};
use hlod_scene::{Mesh, ProxyDesc, Scene};
use hlod_sched::{Scheduler, Task};
use hlod_volume::{InsertTask, TreeSettings, VolumeTree};

use crate::capability::{Batcher, MeshSimplifier};
use crate::error::BuildError;
use crate::world::{BuildSettings, HlodWorld, Toolset};

/// Keeps the leading `quality` share of the triangles.
pub struct HalvingSimplifier;

impl MeshSimplifier for HalvingSimplifier {
    fn generate(&self, input: &Mesh, output: &mut Mesh, quality: f32) -> Result<(), BuildError> {
        let triangles = input.indices.len() / 3;
        let keep = ((triangles as f32 * quality).ceil() as usize).max(1).min(triangles);
        output.positions.clone_from(&input.positions);
        output.indices = input.indices[..keep * 3].to_vec();
        output.topology = input.topology;
        Ok(())
    }
}

pub struct Fixture {
    pub world: HlodWorld,
    pub cube: MeshHandle,
}

impl Fixture {
    /// World over the unit cube with the given strategies.
    pub fn new(batcher: Arc<dyn Batcher>, simplifier: Option<Arc<dyn MeshSimplifier>>) -> Self {
        let tree = VolumeTree::with_bounds(TreeSettings::default(), Cube::new(Vec3::splat(0.5), 0.5));
        let mut scene = Scene::new();
        let cube = scene.add_mesh(Mesh::unit_cube("cube"));
        let toolset = Toolset {
            batcher,
            batcher_name: "test".into(),
            simplifier_name: simplifier.as_ref().map(|_| "test".into()),
            simplifier,
        };
        Self {
            world: HlodWorld::new(tree, scene, toolset, BuildSettings::default()),
            cube,
        }
    }

    pub fn spawn(&mut self, desc: ProxyDesc) -> ProxyId {
        let id = self.world.scene.spawn(desc).unwrap();
        let bounds = self.world.scene.get(id).unwrap().bounds;
        self.run(InsertTask::new(id, bounds));
        id
    }

    pub fn spawn_at(&mut self, p: Vec3, material: u64) -> ProxyId {
        self.spawn(ProxyDesc::new("piece", self.cube, MaterialId(material)).at(p))
    }

    pub fn run(&mut self, task: impl Task<HlodWorld> + 'static) {
        let mut sched = Scheduler::new(None);
        sched.push(task);
        sched.run_until_idle(&mut self.world);
    }
}

/// 40 points spread evenly over the eight octants of the unit cube.
pub fn spread_points() -> Vec<Vec3> {
    (0..40)
        .map(|i| {
            let sign = Cube::octant_sign(i % 8);
            let jitter = (i / 8) as f32 * 0.03;
            Vec3::splat(0.5) + sign * (0.1 + jitter)
        })
        .collect()
}
