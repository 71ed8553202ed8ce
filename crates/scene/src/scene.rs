use hlod_common::{Aabb, MaterialId, MeshHandle, ProxyId, Transform};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::mesh::{Mesh, MeshStore};
use crate::proxy::{LodChain, RenderProxy, RendererKind};

/// An event record produced by every mutation of the scene's proxies.
///
/// The HLOD runtime drains these and turns them into hierarchy updates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SceneEvent {
    /// Proxy was added with the given world bounds.
    ProxyAdded { id: ProxyId, bounds: Aabb },
    /// Proxy moved; carries both bounds so consumers need not look it up.
    ProxyMoved { id: ProxyId, old: Aabb, new: Aabb },
    /// Proxy was removed.
    ProxyRemoved { id: ProxyId },
}

/// Errors from scene operations.
#[derive(Debug, thiserror::Error)]
pub enum SceneError {
    #[error("mesh not found: {0:?}")]
    MeshNotFound(MeshHandle),
    #[error("proxy not found: {0:?}")]
    ProxyNotFound(ProxyId),
}

/// Description of a proxy to spawn.
#[derive(Debug, Clone)]
pub struct ProxyDesc {
    pub name: String,
    pub mesh: MeshHandle,
    pub materials: Vec<MaterialId>,
    pub transform: Transform,
    pub kind: RendererKind,
    pub lod_chain: Option<LodChain>,
    pub hlod_output: bool,
}

impl ProxyDesc {
    pub fn new(name: impl Into<String>, mesh: MeshHandle, material: MaterialId) -> Self {
        Self {
            name: name.into(),
            mesh,
            materials: vec![material],
            transform: Transform::default(),
            kind: RendererKind::Static,
            lod_chain: None,
            hlod_output: false,
        }
    }

    pub fn at(mut self, position: glam::Vec3) -> Self {
        self.transform.position = position;
        self
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_materials(mut self, materials: Vec<MaterialId>) -> Self {
        self.materials = materials;
        self
    }

    pub fn skinned(mut self) -> Self {
        self.kind = RendererKind::Skinned;
        self
    }

    /// Mark as produced by the HLOD pipeline.
    pub fn hlod_output(mut self) -> Self {
        self.hlod_output = true;
        self
    }
}

/// The host's scene: the render proxies the hierarchy is built over.
///
/// All proxy mutations go through explicit operations and are logged, so the
/// hierarchy can follow along incrementally. Uses BTreeMap for deterministic
/// iteration order.
#[derive(Debug, Clone, Default)]
pub struct Scene {
    proxies: BTreeMap<ProxyId, RenderProxy>,
    meshes: MeshStore,
    event_log: Vec<SceneEvent>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of proxies in the scene.
    pub fn proxy_count(&self) -> usize {
        self.proxies.len()
    }

    pub fn proxies(&self) -> &BTreeMap<ProxyId, RenderProxy> {
        &self.proxies
    }

    pub fn get(&self, id: ProxyId) -> Option<&RenderProxy> {
        self.proxies.get(&id)
    }

    pub fn meshes(&self) -> &MeshStore {
        &self.meshes
    }

    pub fn meshes_mut(&mut self) -> &mut MeshStore {
        &mut self.meshes
    }

    /// Register a source mesh.
    pub fn add_mesh(&mut self, mesh: Mesh) -> MeshHandle {
        self.meshes.insert(mesh)
    }

    /// Drain and return the event log.
    pub fn drain_events(&mut self) -> Vec<SceneEvent> {
        std::mem::take(&mut self.event_log)
    }

    /// Read-only access to the event log.
    pub fn events(&self) -> &[SceneEvent] {
        &self.event_log
    }

    /// Spawn a proxy. Its world bounds come from the mesh and transform.
    pub fn spawn(&mut self, desc: ProxyDesc) -> Result<ProxyId, SceneError> {
        let bounds = self.world_bounds(desc.mesh, &desc.transform)?;
        let id = ProxyId::new();
        let proxy = RenderProxy {
            id,
            name: desc.name,
            transform: desc.transform,
            bounds,
            mesh: desc.mesh,
            materials: desc.materials,
            kind: desc.kind,
            hlod_output: desc.hlod_output,
            lod_chain: desc.lod_chain,
        };
        tracing::trace!(proxy = %id.short(), name = %proxy.name, "proxy spawned");
        self.proxies.insert(id, proxy);
        self.event_log.push(SceneEvent::ProxyAdded { id, bounds });
        Ok(id)
    }

    /// Remove a proxy. Returns it if it existed.
    pub fn despawn(&mut self, id: ProxyId) -> Option<RenderProxy> {
        let mut proxy = self.proxies.remove(&id)?;
        let freed = proxy
            .lod_chain
            .take()
            .map_or(0, |chain| chain.release(&mut self.meshes, None));
        tracing::trace!(proxy = %id.short(), freed, "proxy despawned");
        self.event_log.push(SceneEvent::ProxyRemoved { id });
        Some(proxy)
    }

    /// Update a proxy's transform, recompute its bounds and log the move.
    pub fn set_transform(&mut self, id: ProxyId, transform: Transform) -> Result<(), SceneError> {
        let mesh = self.get(id).ok_or(SceneError::ProxyNotFound(id))?.mesh;
        let bounds = self.world_bounds(mesh, &transform)?;
        let proxy = self
            .proxies
            .get_mut(&id)
            .ok_or(SceneError::ProxyNotFound(id))?;
        let old = proxy.bounds;
        proxy.transform = transform;
        proxy.bounds = bounds;
        self.event_log.push(SceneEvent::ProxyMoved {
            id,
            old,
            new: bounds,
        });
        Ok(())
    }

    /// Attach or replace a proxy's own LOD chain, freeing meshes the old
    /// chain owned that the new one does not reuse. Not a spatial change, so
    /// nothing is logged.
    pub fn set_lod_chain(&mut self, id: ProxyId, chain: Option<LodChain>) -> Result<(), SceneError> {
        let proxy = self
            .proxies
            .get_mut(&id)
            .ok_or(SceneError::ProxyNotFound(id))?;
        let old = std::mem::replace(&mut proxy.lod_chain, chain);
        if let Some(old) = old {
            let freed = old.release(&mut self.meshes, proxy.lod_chain.as_ref());
            if freed > 0 {
                tracing::trace!(proxy = %id.short(), freed, "old LOD chain released");
            }
        }
        Ok(())
    }

    fn world_bounds(&self, mesh: MeshHandle, transform: &Transform) -> Result<Aabb, SceneError> {
        let mesh = self.meshes.get(mesh).ok_or(SceneError::MeshNotFound(mesh))?;
        Ok(match mesh.bounds() {
            Some(local) => local.transformed(&transform.to_matrix()),
            None => Aabb::from_center_size(transform.position, glam::Vec3::ZERO),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    fn scene_with_cube() -> (Scene, MeshHandle) {
        let mut scene = Scene::new();
        let cube = scene.add_mesh(Mesh::unit_cube("cube"));
        (scene, cube)
    }

    #[test]
    fn scene_starts_empty() {
        let scene = Scene::new();
        assert_eq!(scene.proxy_count(), 0);
        assert!(scene.events().is_empty());
    }

    #[test]
    fn spawn_computes_world_bounds() {
        let (mut scene, cube) = scene_with_cube();
        let id = scene
            .spawn(ProxyDesc::new("a", cube, MaterialId(0)).at(Vec3::new(5.0, 0.0, 0.0)))
            .unwrap();
        let proxy = scene.get(id).unwrap();
        assert_eq!(proxy.point(), Vec3::new(5.0, 0.0, 0.0));
        assert_eq!(proxy.bounds.size(), Vec3::ONE);
        assert_eq!(
            scene.events(),
            &[SceneEvent::ProxyAdded {
                id,
                bounds: proxy.bounds
            }]
        );
    }

    #[test]
    fn spawn_with_missing_mesh_fails() {
        let mut scene = Scene::new();
        let err = scene
            .spawn(ProxyDesc::new("a", MeshHandle(42), MaterialId(0)))
            .unwrap_err();
        assert!(matches!(err, SceneError::MeshNotFound(MeshHandle(42))));
    }

    #[test]
    fn set_transform_logs_move() {
        let (mut scene, cube) = scene_with_cube();
        let id = scene.spawn(ProxyDesc::new("a", cube, MaterialId(0))).unwrap();
        scene.drain_events();
        scene
            .set_transform(id, Transform::from_position(Vec3::new(0.0, 3.0, 0.0)))
            .unwrap();
        let events = scene.drain_events();
        assert_eq!(events.len(), 1);
        match &events[0] {
            SceneEvent::ProxyMoved { old, new, .. } => {
                assert_eq!(old.center(), Vec3::ZERO);
                assert_eq!(new.center(), Vec3::new(0.0, 3.0, 0.0));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    fn chain_on(scene: &mut Scene, host: MeshHandle) -> LodChain {
        let lod = scene.add_mesh(Mesh::unit_cube("lod1"));
        let renderer = |mesh, owned| crate::proxy::LodRenderer {
            mesh,
            transform: Transform::default(),
            materials: vec![MaterialId(0)],
            owned,
        };
        LodChain {
            levels: vec![
                crate::proxy::LodLevel {
                    renderers: vec![renderer(host, false)],
                    screen_relative_height: 0.5,
                },
                crate::proxy::LodLevel {
                    renderers: vec![renderer(lod, true)],
                    screen_relative_height: 0.01,
                },
            ],
        }
    }

    #[test]
    fn replacing_a_chain_frees_its_owned_meshes() {
        let (mut scene, cube) = scene_with_cube();
        let id = scene.spawn(ProxyDesc::new("a", cube, MaterialId(0))).unwrap();
        let first = chain_on(&mut scene, cube);
        scene.set_lod_chain(id, Some(first.clone())).unwrap();
        let second = chain_on(&mut scene, cube);
        scene.set_lod_chain(id, Some(second)).unwrap();

        assert_eq!(scene.meshes().len(), 2);
        assert!(scene.meshes().contains(cube));
        assert!(!scene.meshes().contains(first.levels[1].renderers[0].mesh));

        scene.set_lod_chain(id, None).unwrap();
        assert_eq!(scene.meshes().len(), 1);
    }

    #[test]
    fn despawn_frees_chain_meshes_but_not_the_host_mesh() {
        let (mut scene, cube) = scene_with_cube();
        let id = scene.spawn(ProxyDesc::new("a", cube, MaterialId(0))).unwrap();
        let chain = chain_on(&mut scene, cube);
        scene.set_lod_chain(id, Some(chain)).unwrap();
        assert_eq!(scene.meshes().len(), 2);

        let proxy = scene.despawn(id).unwrap();
        assert!(proxy.lod_chain.is_none());
        assert_eq!(scene.meshes().len(), 1);
        assert!(scene.meshes().contains(cube));
    }

    #[test]
    fn despawn_logs_removal() {
        let (mut scene, cube) = scene_with_cube();
        let id = scene.spawn(ProxyDesc::new("a", cube, MaterialId(0))).unwrap();
        assert!(scene.despawn(id).is_some());
        assert!(scene.despawn(id).is_none());
        assert_eq!(scene.events().len(), 2);
        assert_eq!(scene.proxy_count(), 0);
    }
}
