use hlod_common::{Aabb, MaterialId, MeshHandle, Transform};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::mesh::MeshStore;

/// One drawable inside a combined proxy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HlodPart {
    pub name: String,
    pub mesh: MeshHandle,
    pub transform: Transform,
    pub materials: Vec<MaterialId>,
    /// True when the mesh was created for this part and must be freed with it.
    /// Parts that reference a source mesh leave it alone.
    pub owned: bool,
}

/// A simplified rendition of a merged proxy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimplifiedLevel {
    pub quality: f32,
    pub mesh: MeshHandle,
}

/// The merged or batched stand-in for everything under one spatial volume.
///
/// Owned by its volume. Replaced wholesale on rebuild; `release` must run
/// before it is dropped so owned geometry leaves the mesh store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CombinedProxy {
    pub parts: Vec<HlodPart>,
    /// True when built by concatenating the children's combined proxies.
    pub merged: bool,
    /// Materials of everything this proxy stands in for.
    pub materials: BTreeSet<MaterialId>,
    pub bounds: Option<Aabb>,
    pub simplified: Vec<SimplifiedLevel>,
    /// Number of source pieces folded into this proxy.
    pub source_count: usize,
}

impl CombinedProxy {
    /// A combined proxy that the parent can consume as one renderer.
    pub fn is_single(&self) -> bool {
        self.parts.len() == 1
    }

    pub fn draw_calls(&self) -> usize {
        self.parts.len()
    }

    /// Every mesh handle this proxy owns.
    pub fn owned_meshes(&self) -> impl Iterator<Item = MeshHandle> + '_ {
        self.parts
            .iter()
            .filter(|p| p.owned)
            .map(|p| p.mesh)
            .chain(self.simplified.iter().map(|s| s.mesh))
    }

    /// Free owned geometry. Returns the number of meshes removed.
    pub fn release(self, meshes: &mut MeshStore) -> usize {
        self.owned_meshes()
            .filter(|h| meshes.remove(*h).is_some())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::Mesh;

    #[test]
    fn release_frees_only_owned_meshes() {
        let mut store = MeshStore::new();
        let shared = store.insert(Mesh::unit_cube("shared"));
        let owned = store.insert(Mesh::unit_cube("owned"));
        let simplified = store.insert(Mesh::unit_cube("lod1"));

        let proxy = CombinedProxy {
            parts: vec![
                HlodPart {
                    name: "a".into(),
                    mesh: shared,
                    transform: Transform::default(),
                    materials: vec![MaterialId(1)],
                    owned: false,
                },
                HlodPart {
                    name: "b".into(),
                    mesh: owned,
                    transform: Transform::default(),
                    materials: vec![MaterialId(1)],
                    owned: true,
                },
            ],
            simplified: vec![SimplifiedLevel {
                quality: 0.5,
                mesh: simplified,
            }],
            ..CombinedProxy::default()
        };
        assert_eq!(proxy.draw_calls(), 2);
        assert!(!proxy.is_single());
        assert_eq!(proxy.release(&mut store), 2);
        assert!(store.contains(shared));
        assert!(!store.contains(owned));
        assert!(!store.contains(simplified));
    }
}
