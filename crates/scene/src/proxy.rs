use hlod_common::{Aabb, MaterialId, MeshHandle, ProxyId, Transform};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::mesh::MeshStore;

/// How the host draws a proxy. Skinned meshes deform at runtime and are never
/// folded into a static HLOD.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RendererKind {
    Static,
    Skinned,
}

/// One renderable piece of a LOD level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LodRenderer {
    pub mesh: MeshHandle,
    /// Relative to the owning proxy's transform.
    pub transform: Transform,
    pub materials: Vec<MaterialId>,
    /// True when the mesh was generated for this chain and goes with it.
    #[serde(default)]
    pub owned: bool,
}

/// A single level of a LOD chain, shown while the object's screen-relative
/// height is above `screen_relative_height`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LodLevel {
    pub renderers: Vec<LodRenderer>,
    pub screen_relative_height: f32,
}

/// An object's own LOD chain, finest level first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LodChain {
    pub levels: Vec<LodLevel>,
}

impl LodChain {
    /// Index of the coarsest level.
    pub fn max_lod(&self) -> Option<usize> {
        self.levels.len().checked_sub(1)
    }

    pub fn coarsest(&self) -> Option<&LodLevel> {
        self.levels.last()
    }

    /// A chain with more than one level; a lone LOD0 is not a chain.
    pub fn is_multi_level(&self) -> bool {
        self.levels.len() > 1
    }

    /// Every mesh handle this chain owns.
    pub fn owned_meshes(&self) -> impl Iterator<Item = MeshHandle> + '_ {
        self.levels
            .iter()
            .flat_map(|l| l.renderers.iter())
            .filter(|r| r.owned)
            .map(|r| r.mesh)
    }

    /// Free owned geometry, except meshes `keep` still references. Returns
    /// the number of meshes removed.
    pub fn release(self, meshes: &mut MeshStore, keep: Option<&LodChain>) -> usize {
        let kept: BTreeSet<MeshHandle> = keep
            .into_iter()
            .flat_map(|c| c.levels.iter().flat_map(|l| l.renderers.iter()))
            .map(|r| r.mesh)
            .collect();
        self.owned_meshes()
            .filter(|h| !kept.contains(h))
            .filter(|h| meshes.remove(*h).is_some())
            .count()
    }
}

/// A renderable scene object tracked by the hierarchy.
///
/// The hierarchy only references proxies by id; the scene owns them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderProxy {
    pub id: ProxyId,
    pub name: String,
    pub transform: Transform,
    /// World-space bounds, kept in sync with `transform` by the scene.
    pub bounds: Aabb,
    pub mesh: MeshHandle,
    pub materials: Vec<MaterialId>,
    pub kind: RendererKind,
    /// Set on objects produced by the HLOD pipeline itself; these never
    /// enter the hierarchy.
    pub hlod_output: bool,
    pub lod_chain: Option<LodChain>,
}

impl RenderProxy {
    /// Representative point used for volume membership.
    pub fn point(&self) -> glam::Vec3 {
        self.bounds.center()
    }

    pub fn material_set(&self) -> BTreeSet<MaterialId> {
        self.materials.iter().copied().collect()
    }

    /// The pieces that stand in for this proxy at HLOD distance, in world
    /// space: the coarsest level of its own LOD chain when it has one,
    /// otherwise itself.
    pub fn hlod_sources(&self) -> Vec<LodRenderer> {
        match self.lod_chain.as_ref().filter(|c| c.is_multi_level()) {
            Some(chain) => chain
                .coarsest()
                .map(|lvl| {
                    lvl.renderers
                        .iter()
                        .map(|r| LodRenderer {
                            transform: self.transform.compose(&r.transform),
                            ..r.clone()
                        })
                        .collect()
                })
                .unwrap_or_default(),
            None => vec![LodRenderer {
                mesh: self.mesh,
                transform: self.transform,
                materials: self.materials.clone(),
                owned: false,
            }],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    fn proxy() -> RenderProxy {
        RenderProxy {
            id: ProxyId::new(),
            name: "rock".into(),
            transform: Transform::default(),
            bounds: Aabb::from_center_size(Vec3::new(1.0, 2.0, 3.0), Vec3::ONE),
            mesh: MeshHandle(0),
            materials: vec![MaterialId(2), MaterialId(1), MaterialId(2)],
            kind: RendererKind::Static,
            hlod_output: false,
            lod_chain: None,
        }
    }

    #[test]
    fn point_is_bounds_center() {
        assert_eq!(proxy().point(), Vec3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn material_set_dedups() {
        let set = proxy().material_set();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn hlod_sources_without_chain_is_self() {
        let p = proxy();
        let sources = p.hlod_sources();
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].mesh, p.mesh);
    }

    #[test]
    fn hlod_sources_use_coarsest_level() {
        let mut p = proxy();
        let level = |mesh: u64, h: f32| LodLevel {
            renderers: vec![LodRenderer {
                mesh: MeshHandle(mesh),
                transform: Transform::default(),
                materials: vec![MaterialId(1)],
                owned: mesh != 0,
            }],
            screen_relative_height: h,
        };
        p.lod_chain = Some(LodChain {
            levels: vec![level(0, 0.5), level(7, 0.25), level(9, 0.01)],
        });
        let sources = p.hlod_sources();
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].mesh, MeshHandle(9));
        assert_eq!(p.lod_chain.as_ref().unwrap().max_lod(), Some(2));
        let owned: Vec<_> = p.lod_chain.as_ref().unwrap().owned_meshes().collect();
        assert_eq!(owned, vec![MeshHandle(7), MeshHandle(9)]);
    }

    #[test]
    fn chain_sources_follow_the_proxy() {
        let mut p = proxy();
        let level = |mesh: u64| LodLevel {
            renderers: vec![LodRenderer {
                mesh: MeshHandle(mesh),
                transform: Transform::from_position(Vec3::new(0.0, 1.0, 0.0)),
                materials: vec![MaterialId(1)],
                owned: true,
            }],
            screen_relative_height: 0.5,
        };
        p.lod_chain = Some(LodChain {
            levels: vec![level(0), level(4)],
        });
        p.transform = Transform::from_position(Vec3::new(50.0, 0.0, 0.0));

        let sources = p.hlod_sources();
        assert_eq!(sources[0].transform.position, Vec3::new(50.0, 1.0, 0.0));
        assert_eq!(sources[0].mesh, MeshHandle(4));
    }

    #[test]
    fn release_spares_meshes_the_new_chain_keeps() {
        let mut store = MeshStore::new();
        let level = |mesh: MeshHandle, owned: bool| LodLevel {
            renderers: vec![LodRenderer {
                mesh,
                transform: Transform::default(),
                materials: vec![MaterialId(1)],
                owned,
            }],
            screen_relative_height: 0.5,
        };
        let source = store.insert(crate::mesh::Mesh::unit_cube("source"));
        let shared = store.insert(crate::mesh::Mesh::unit_cube("lod1"));
        let dropped = store.insert(crate::mesh::Mesh::unit_cube("lod2"));
        let old = LodChain {
            levels: vec![level(source, false), level(shared, true), level(dropped, true)],
        };
        let new = LodChain {
            levels: vec![level(source, false), level(shared, true)],
        };

        assert_eq!(old.release(&mut store, Some(&new)), 1);
        assert!(store.contains(source));
        assert!(store.contains(shared));
        assert!(!store.contains(dropped));
    }

    #[test]
    fn single_level_chain_falls_back_to_self() {
        let mut p = proxy();
        p.lod_chain = Some(LodChain {
            levels: vec![LodLevel {
                renderers: Vec::new(),
                screen_relative_height: 0.5,
            }],
        });
        assert_eq!(p.hlod_sources()[0].mesh, p.mesh);
    }
}
