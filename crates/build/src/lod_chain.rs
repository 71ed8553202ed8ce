use std::sync::Arc;

use hlod_common::{ProxyId, Transform};
use hlod_scene::{LodChain, LodLevel, LodRenderer, Mesh, RendererKind, Scene};

use crate::capability::MeshSimplifier;
use crate::error::BuildError;

/// Screen-relative height below which the last level is culled.
pub const CULL_HEIGHT: f32 = 0.01;

/// Builds a proxy's own LOD chain by simplifying its mesh at halving quality.
pub struct LodChainGenerator {
    simplifier: Arc<dyn MeshSimplifier>,
    max_lod: u32,
}

impl LodChainGenerator {
    pub fn new(simplifier: Arc<dyn MeshSimplifier>, max_lod: u32) -> Self {
        Self { simplifier, max_lod }
    }

    pub fn max_lod(&self) -> u32 {
        self.max_lod
    }

    /// Quality handed to the simplifier for `level`.
    pub fn quality(level: u32) -> f32 {
        0.5f32.powi(level as i32)
    }

    /// Transition height of `level` in a chain whose coarsest level is
    /// `max_lod`: 0.5 for LOD0, 0.5^(l+1) in between, `CULL_HEIGHT` last.
    pub fn transition_height(level: u32, max_lod: u32) -> f32 {
        if level == 0 {
            0.5
        } else if level == max_lod {
            CULL_HEIGHT
        } else {
            0.5f32.powi(level as i32 + 1)
        }
    }

    /// Generate levels 1..=max_lod for `id`, register the meshes and attach
    /// the chain to the proxy, releasing whatever the previous chain owned.
    /// Level transforms are relative to the proxy. Returns the new chain.
    pub fn generate(&self, scene: &mut Scene, id: ProxyId) -> Result<LodChain, BuildError> {
        let proxy = scene.get(id).ok_or(BuildError::UnknownProxy(id))?;
        if proxy.kind == RendererKind::Skinned {
            return Err(BuildError::UnsupportedGeometry {
                proxy: id,
                reason: "skinned renderer".into(),
            });
        }
        let source = scene
            .meshes()
            .get(proxy.mesh)
            .ok_or(BuildError::MissingMesh(proxy.mesh))?;
        if !source.is_triangles() {
            return Err(BuildError::UnsupportedGeometry {
                proxy: id,
                reason: format!("{:?} topology", source.topology),
            });
        }
        let source = source.clone();
        let base = LodRenderer {
            mesh: proxy.mesh,
            transform: Transform::default(),
            materials: proxy.materials.clone(),
            owned: false,
        };

        let mut outputs = Vec::with_capacity(self.max_lod as usize);
        for level in 1..=self.max_lod {
            let mut output = Mesh::empty(format!("{} LOD{level}", source.name));
            hlod_sched::run_gated(|| {
                self.simplifier
                    .generate(&source, &mut output, Self::quality(level))
            })?;
            outputs.push(output);
        }

        let mut levels = vec![LodLevel {
            renderers: vec![base.clone()],
            screen_relative_height: Self::transition_height(0, self.max_lod),
        }];
        for (level, output) in (1..=self.max_lod).zip(outputs) {
            tracing::trace!(
                mesh = %output.name,
                polys = output.poly_count(),
                "generated LOD level"
            );
            let mesh = scene.add_mesh(output);
            levels.push(LodLevel {
                renderers: vec![LodRenderer {
                    mesh,
                    owned: true,
                    ..base.clone()
                }],
                screen_relative_height: Self::transition_height(level, self.max_lod),
            });
        }

        let chain = LodChain { levels };
        scene
            .set_lod_chain(id, Some(chain.clone()))
            .map_err(|_| BuildError::UnknownProxy(id))?;
        tracing::debug!(proxy = %id.short(), levels = chain.levels.len(), "LOD chain generated");
        Ok(chain)
    }
}

impl std::fmt::Debug for LodChainGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LodChainGenerator")
            .field("max_lod", &self.max_lod)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::HalvingSimplifier;
    use hlod_common::MaterialId;
    use hlod_scene::{ProxyDesc, Topology};

    fn scene_with_proxy() -> (Scene, ProxyId) {
        let mut scene = Scene::new();
        let cube = scene.add_mesh(Mesh::unit_cube("crate"));
        let id = scene.spawn(ProxyDesc::new("crate", cube, MaterialId(3))).unwrap();
        (scene, id)
    }

    #[test]
    fn transition_heights_follow_halving() {
        assert_eq!(LodChainGenerator::transition_height(0, 3), 0.5);
        assert_eq!(LodChainGenerator::transition_height(1, 3), 0.25);
        assert_eq!(LodChainGenerator::transition_height(2, 3), 0.125);
        assert_eq!(LodChainGenerator::transition_height(3, 3), CULL_HEIGHT);
        assert_eq!(LodChainGenerator::quality(2), 0.25);
    }

    #[test]
    fn generates_levels_with_fewer_polygons() {
        let (mut scene, id) = scene_with_proxy();
        let generator = LodChainGenerator::new(Arc::new(HalvingSimplifier), 2);
        let meshes_before = scene.meshes().len();

        let chain = generator.generate(&mut scene, id).unwrap();

        assert_eq!(chain.levels.len(), 3);
        assert_eq!(scene.meshes().len(), meshes_before + 2);
        let polys: Vec<usize> = chain
            .levels
            .iter()
            .map(|l| scene.meshes().get(l.renderers[0].mesh).unwrap().poly_count())
            .collect();
        assert_eq!(polys, vec![12, 6, 3]);
        assert_eq!(chain.levels[2].screen_relative_height, CULL_HEIGHT);
        assert_eq!(chain.levels[1].renderers[0].materials, vec![MaterialId(3)]);
        assert_eq!(scene.get(id).unwrap().lod_chain.as_ref(), Some(&chain));
        assert_eq!(
            scene.meshes().get(chain.levels[1].renderers[0].mesh).unwrap().name,
            "crate LOD1"
        );
    }

    #[test]
    fn regenerating_replaces_owned_meshes() {
        let (mut scene, id) = scene_with_proxy();
        let generator = LodChainGenerator::new(Arc::new(HalvingSimplifier), 2);
        let first = generator.generate(&mut scene, id).unwrap();
        let meshes = scene.meshes().len();

        let second = generator.generate(&mut scene, id).unwrap();

        assert_eq!(scene.meshes().len(), meshes);
        for old in first.owned_meshes() {
            assert!(!scene.meshes().contains(old));
        }
        assert!(scene.meshes().contains(second.levels[0].renderers[0].mesh));
        assert!(!second.levels[0].renderers[0].owned);
    }

    #[test]
    fn levels_are_relative_to_the_proxy() {
        let (mut scene, id) = scene_with_proxy();
        scene
            .set_transform(id, Transform::from_position(glam::Vec3::new(4.0, 0.0, 0.0)))
            .unwrap();
        let generator = LodChainGenerator::new(Arc::new(HalvingSimplifier), 1);
        let chain = generator.generate(&mut scene, id).unwrap();
        assert!(chain.levels[1].renderers[0].transform.is_identity());
        let sources = scene.get(id).unwrap().hlod_sources();
        assert_eq!(sources[0].transform.position.x, 4.0);
    }

    #[test]
    fn skinned_proxy_is_unsupported() {
        let mut scene = Scene::new();
        let cube = scene.add_mesh(Mesh::unit_cube("body"));
        let id = scene
            .spawn(ProxyDesc::new("body", cube, MaterialId(0)).skinned())
            .unwrap();
        let generator = LodChainGenerator::new(Arc::new(HalvingSimplifier), 2);
        assert!(matches!(
            generator.generate(&mut scene, id),
            Err(BuildError::UnsupportedGeometry { .. })
        ));
        assert!(scene.get(id).unwrap().lod_chain.is_none());
    }

    #[test]
    fn line_mesh_is_unsupported() {
        let mut scene = Scene::new();
        let lines = scene.add_mesh(Mesh::unit_cube("wire").with_topology(Topology::Lines));
        let id = scene.spawn(ProxyDesc::new("wire", lines, MaterialId(0))).unwrap();
        let generator = LodChainGenerator::new(Arc::new(HalvingSimplifier), 1);
        assert!(generator.generate(&mut scene, id).is_err());
    }

    #[test]
    fn unknown_proxy() {
        let mut scene = Scene::new();
        let generator = LodChainGenerator::new(Arc::new(HalvingSimplifier), 1);
        assert!(matches!(
            generator.generate(&mut scene, ProxyId::new()),
            Err(BuildError::UnknownProxy(_))
        ));
    }
}
