use glam::Vec3;
use hlod_common::{Aabb, Cube, ProxyId};
use hlod_scene::CombinedProxy;
use slotmap::{SlotMap, new_key_type};
use std::collections::{BTreeSet, HashMap};

new_key_type! {
    /// Stable handle to a spatial volume in the tree arena.
    pub struct VolumeKey;
}

/// Member count above which a leaf splits.
pub const DEFAULT_SPLIT_THRESHOLD: usize = 32;

/// Depth below which no further split happens.
pub const DEFAULT_MAX_DEPTH: u32 = 20;

/// Structural limits for the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeSettings {
    pub split_threshold: usize,
    pub max_depth: u32,
}

impl Default for TreeSettings {
    fn default() -> Self {
        Self {
            split_threshold: DEFAULT_SPLIT_THRESHOLD,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

/// A node of the hierarchy: a cubic region and the proxies inside it.
///
/// Internal volumes keep the flattened member list of their whole subtree.
#[derive(Debug, Clone)]
pub struct SpatialVolume {
    serial: u64,
    bounds: Cube,
    parent: Option<VolumeKey>,
    children: Option<[VolumeKey; 8]>,
    members: BTreeSet<ProxyId>,
    dirty: bool,
    /// Stamp of the last `set_dirty` that reached this volume.
    dirty_epoch: u64,
    combined: Option<CombinedProxy>,
    populated_cache: Option<Vec<VolumeKey>>,
}

impl SpatialVolume {
    fn new(serial: u64, bounds: Cube, parent: Option<VolumeKey>) -> Self {
        Self {
            serial,
            bounds,
            parent,
            children: None,
            members: BTreeSet::new(),
            dirty: false,
            dirty_epoch: 0,
            combined: None,
            populated_cache: None,
        }
    }

    /// Creation counter, used for display names.
    pub fn serial(&self) -> u64 {
        self.serial
    }

    pub fn name(&self) -> String {
        format!("LODVolumeNode{}", self.serial)
    }

    pub fn bounds(&self) -> Cube {
        self.bounds
    }

    pub fn parent(&self) -> Option<VolumeKey> {
        self.parent
    }

    pub fn children(&self) -> Option<&[VolumeKey; 8]> {
        self.children.as_ref()
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_none()
    }

    pub fn members(&self) -> &BTreeSet<ProxyId> {
        &self.members
    }

    pub fn is_populated(&self) -> bool {
        !self.members.is_empty()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn combined(&self) -> Option<&CombinedProxy> {
        self.combined.as_ref()
    }
}

/// Counters for structural operations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TreeStats {
    pub splits: u64,
    pub grows: u64,
    pub shrinks: u64,
    pub encapsulations: u64,
    pub volumes_created: u64,
    pub volumes_destroyed: u64,
}

/// Result of one shrink step at the root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShrinkOutcome {
    /// More than one populated child, or the root is a leaf.
    Unchanged,
    /// The lone populated child replaced the root.
    Promoted(VolumeKey),
    /// No populated children: the root dropped them and became a leaf.
    Collapsed,
}

/// The spatial hierarchy: an arena of volumes addressed by `VolumeKey`.
///
/// Exactly one root exists at all times. Parent links are plain keys, so a
/// destroyed volume simply stops resolving; `contains` is the liveness check
/// every resumed step performs.
#[derive(Debug)]
pub struct VolumeTree {
    volumes: SlotMap<VolumeKey, SpatialVolume>,
    root: VolumeKey,
    established: bool,
    settings: TreeSettings,
    placements: HashMap<ProxyId, Aabb>,
    released: Vec<(VolumeKey, CombinedProxy)>,
    next_serial: u64,
    next_epoch: u64,
    stats: TreeStats,
}

impl VolumeTree {
    /// An empty tree whose root bounds are set by the first insertion.
    pub fn new(settings: TreeSettings) -> Self {
        let mut volumes = SlotMap::with_key();
        let root = volumes.insert(SpatialVolume::new(0, Cube::new(Vec3::ZERO, 0.0), None));
        Self {
            volumes,
            root,
            established: false,
            settings,
            placements: HashMap::new(),
            released: Vec::new(),
            next_serial: 1,
            next_epoch: 1,
            stats: TreeStats {
                volumes_created: 1,
                ..TreeStats::default()
            },
        }
    }

    /// A tree whose root already covers `bounds`.
    pub fn with_bounds(settings: TreeSettings, bounds: Cube) -> Self {
        let mut tree = Self::new(settings);
        tree.establish(bounds);
        tree
    }

    pub fn settings(&self) -> TreeSettings {
        self.settings
    }

    pub fn stats(&self) -> &TreeStats {
        &self.stats
    }

    pub fn root(&self) -> VolumeKey {
        self.root
    }

    /// Whether the root bounds have been set.
    pub fn is_established(&self) -> bool {
        self.established
    }

    pub fn establish(&mut self, bounds: Cube) {
        let root = self.root;
        self.volumes[root].bounds = bounds;
        self.established = true;
        tracing::debug!(center = ?bounds.center, side = bounds.side(), "root bounds established");
    }

    /// Liveness check for a handle held across a suspension point.
    pub fn contains(&self, key: VolumeKey) -> bool {
        self.volumes.contains_key(key)
    }

    pub fn get(&self, key: VolumeKey) -> Option<&SpatialVolume> {
        self.volumes.get(key)
    }

    pub fn len(&self) -> usize {
        self.volumes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.volumes.is_empty()
    }

    /// Number of edges between `key` and the root.
    pub fn depth(&self, key: VolumeKey) -> Option<u32> {
        let mut node = self.volumes.get(key)?;
        let mut depth = 0;
        while let Some(parent) = node.parent {
            node = self.volumes.get(parent)?;
            depth += 1;
        }
        Some(depth)
    }

    /// Bounds recorded for a proxy when it was inserted.
    pub fn placement(&self, id: ProxyId) -> Option<Aabb> {
        self.placements.get(&id).copied()
    }

    pub fn is_tracked(&self, id: ProxyId) -> bool {
        self.placements.contains_key(&id)
    }

    /// Number of proxies currently in the tree.
    pub fn tracked_count(&self) -> usize {
        self.placements.len()
    }

    pub(crate) fn record_placement(&mut self, id: ProxyId, bounds: Aabb) {
        self.placements.insert(id, bounds);
    }

    pub(crate) fn forget_placement(&mut self, id: ProxyId) {
        self.placements.remove(&id);
    }

    /// Combined proxies detached by structural changes or dirtying, waiting
    /// for their geometry to be freed by the owner of the mesh store.
    pub fn take_released(&mut self) -> Vec<(VolumeKey, CombinedProxy)> {
        std::mem::take(&mut self.released)
    }

    pub fn has_released(&self) -> bool {
        !self.released.is_empty()
    }

    /// Pre-order walk from the root.
    pub fn depth_first(&self) -> Vec<VolumeKey> {
        let mut out = Vec::with_capacity(self.volumes.len());
        let mut stack = vec![self.root];
        while let Some(key) = stack.pop() {
            let Some(vol) = self.volumes.get(key) else {
                continue;
            };
            out.push(key);
            if let Some(children) = vol.children {
                stack.extend(children.iter().rev());
            }
        }
        out
    }

    /// Children before parents.
    pub fn post_order(&self) -> Vec<VolumeKey> {
        let mut out = self.depth_first();
        // Reversed pre-order visits children right-to-left, still before parents.
        out.reverse();
        out
    }

    /// The child of an internal volume whose octant holds `point`.
    pub fn child_for_point(&self, key: VolumeKey, point: Vec3) -> Option<VolumeKey> {
        let vol = self.volumes.get(key)?;
        let children = vol.children?;
        Some(children[vol.bounds.octant_index(point)])
    }

    /// Deepest volume whose bounds hold `point`.
    pub fn leaf_for_point(&self, point: Vec3) -> Option<VolumeKey> {
        let mut key = self.root;
        if !self.volumes.get(key)?.bounds.contains_point(point) {
            return None;
        }
        while let Some(child) = self.child_for_point(key, point) {
            key = child;
        }
        Some(key)
    }

    pub(crate) fn add_member(&mut self, key: VolumeKey, id: ProxyId) -> bool {
        self.volumes
            .get_mut(key)
            .is_some_and(|v| v.members.insert(id))
    }

    pub(crate) fn remove_member(&mut self, key: VolumeKey, id: ProxyId) -> bool {
        self.volumes
            .get_mut(key)
            .is_some_and(|v| v.members.remove(&id))
    }

    /// Grow the root cube in place so it also encloses `bounds`.
    pub(crate) fn encapsulate(&mut self, bounds: &Aabb) {
        let root = self.root;
        let vol = &mut self.volumes[root];
        vol.bounds = Cube::enclosing(&vol.bounds.to_aabb().encapsulate(bounds));
        self.stats.encapsulations += 1;
        tracing::trace!(side = vol.bounds.side(), "root encapsulated");
    }

    /// Mark a volume and every ancestor stale. Their combined proxies are
    /// detached and queued for release; child snapshots are invalidated.
    pub fn set_dirty(&mut self, key: VolumeKey) {
        let epoch = self.next_epoch;
        self.next_epoch += 1;
        let mut cursor = Some(key);
        while let Some(k) = cursor {
            let Some(vol) = self.volumes.get_mut(k) else {
                break;
            };
            vol.dirty = true;
            vol.dirty_epoch = epoch;
            vol.populated_cache = None;
            if let Some(combined) = vol.combined.take() {
                self.released.push((k, combined));
            }
            cursor = vol.parent;
        }
    }

    pub fn clear_dirty(&mut self, key: VolumeKey) {
        if let Some(vol) = self.volumes.get_mut(key) {
            vol.dirty = false;
        }
    }

    /// Stamp of the last `set_dirty` that reached `key`. Changes whenever the
    /// volume or anything below it is dirtied again.
    pub fn dirty_epoch(&self, key: VolumeKey) -> Option<u64> {
        self.volumes.get(key).map(|v| v.dirty_epoch)
    }

    /// Clear dirty only if nothing dirtied `key` since `epoch` was read.
    /// Returns whether the volume is now clean.
    pub fn clear_dirty_since(&mut self, key: VolumeKey, epoch: u64) -> bool {
        match self.volumes.get_mut(key) {
            Some(vol) if vol.dirty_epoch == epoch => {
                vol.dirty = false;
                true
            }
            _ => false,
        }
    }

    /// Number of dirty volumes.
    pub fn dirty_count(&self) -> usize {
        self.volumes.values().filter(|v| v.dirty).count()
    }

    /// Children with at least one member, in child order. Cached until the
    /// volume is next dirtied.
    pub fn populated_children(&mut self, key: VolumeKey) -> Vec<VolumeKey> {
        let Some(vol) = self.volumes.get(key) else {
            return Vec::new();
        };
        if let Some(cached) = &vol.populated_cache {
            return cached.clone();
        }
        let populated: Vec<VolumeKey> = vol
            .children
            .iter()
            .flatten()
            .copied()
            .filter(|c| self.volumes.get(*c).is_some_and(|v| v.is_populated()))
            .collect();
        if let Some(vol) = self.volumes.get_mut(key) {
            vol.populated_cache = Some(populated.clone());
        }
        populated
    }

    /// Install a freshly built combined proxy, returning the one it replaces.
    pub fn install_combined(
        &mut self,
        key: VolumeKey,
        combined: Option<CombinedProxy>,
    ) -> Option<CombinedProxy> {
        let vol = self.volumes.get_mut(key)?;
        std::mem::replace(&mut vol.combined, combined)
    }

    /// Detach a volume's combined proxy.
    pub fn take_combined(&mut self, key: VolumeKey) -> Option<CombinedProxy> {
        self.volumes.get_mut(key)?.combined.take()
    }

    fn create(&mut self, bounds: Cube, parent: Option<VolumeKey>) -> VolumeKey {
        let serial = self.next_serial;
        self.next_serial += 1;
        self.stats.volumes_created += 1;
        self.volumes
            .insert(SpatialVolume::new(serial, bounds, parent))
    }

    /// Subdivide a leaf into eight octants and hand each member to the octant
    /// holding its representative point. The leaf keeps its member list.
    ///
    /// Returns false (and changes nothing) if `key` is gone or not a leaf.
    pub fn split(&mut self, key: VolumeKey) -> bool {
        let Some(vol) = self.volumes.get(key) else {
            return false;
        };
        if !vol.is_leaf() {
            return false;
        }
        let bounds = vol.bounds;
        let members: Vec<ProxyId> = vol.members.iter().copied().collect();

        let children: [VolumeKey; 8] =
            std::array::from_fn(|i| self.create(bounds.octant(i), Some(key)));
        for id in members {
            let Some(point) = self.placements.get(&id).map(Aabb::center) else {
                continue;
            };
            let child = children[bounds.octant_index(point)];
            self.volumes[child].members.insert(id);
        }
        for child in children {
            let vol = &mut self.volumes[child];
            vol.dirty = vol.is_populated();
        }
        self.volumes[key].children = Some(children);
        self.stats.splits += 1;
        tracing::debug!(
            volume = self.volumes[key].serial,
            members = self.volumes[key].members.len(),
            "split volume"
        );
        self.set_dirty(key);
        true
    }

    /// Enlarge the tree by one level toward `target`: a new root of twice the
    /// side, positioned so the old root sits in the octant facing away from
    /// the target, plus seven empty siblings. Returns the new root.
    pub fn grow_toward(&mut self, target: Vec3) -> VolumeKey {
        let old_root = self.root;
        let old = self.volumes[old_root].bounds;
        let direction = target - old.center;

        // The old cube's corner that best faces `direction` becomes the new
        // center; per axis that is the sign of the direction.
        let sign = Vec3::new(
            if direction.x >= 0.0 { 1.0 } else { -1.0 },
            if direction.y >= 0.0 { 1.0 } else { -1.0 },
            if direction.z >= 0.0 { 1.0 } else { -1.0 },
        );
        let grown = Cube::new(old.center + sign * old.half_extent, old.half_extent * 2.0);
        let slot = grown.octant_index(old.center);

        let new_root = self.create(grown, None);
        self.volumes[new_root].members = self.volumes[old_root].members.clone();
        let children: [VolumeKey; 8] = std::array::from_fn(|i| {
            if i == slot {
                old_root
            } else {
                self.create(grown.octant(i), Some(new_root))
            }
        });
        self.volumes[new_root].children = Some(children);
        self.volumes[old_root].parent = Some(new_root);
        self.root = new_root;
        self.stats.grows += 1;
        tracing::debug!(
            side = grown.side(),
            slot,
            "grew root toward {:?}",
            target
        );
        self.set_dirty(new_root);
        new_root
    }

    /// One collapse step at the root. Repeat until it stops returning
    /// `Promoted` to reach the fixpoint.
    pub fn shrink_root(&mut self) -> ShrinkOutcome {
        let root = self.root;
        let Some(children) = self.volumes[root].children else {
            return ShrinkOutcome::Unchanged;
        };
        let populated: Vec<VolumeKey> = children
            .iter()
            .copied()
            .filter(|c| self.volumes.get(*c).is_some_and(|v| v.is_populated()))
            .collect();

        match populated.as_slice() {
            [] => {
                for child in children {
                    self.destroy_subtree(child);
                }
                self.volumes[root].children = None;
                self.stats.shrinks += 1;
                tracing::debug!("collapsed empty root");
                self.set_dirty(root);
                ShrinkOutcome::Collapsed
            }
            [survivor] => {
                let survivor = *survivor;
                self.volumes[survivor].parent = None;
                for child in children.into_iter().filter(|c| *c != survivor) {
                    self.destroy_subtree(child);
                }
                self.destroy_volume(root);
                self.root = survivor;
                self.stats.shrinks += 1;
                tracing::debug!(
                    volume = self.volumes[survivor].serial,
                    "promoted lone populated child to root"
                );
                ShrinkOutcome::Promoted(survivor)
            }
            _ => ShrinkOutcome::Unchanged,
        }
    }

    fn destroy_volume(&mut self, key: VolumeKey) {
        if let Some(vol) = self.volumes.remove(key) {
            self.stats.volumes_destroyed += 1;
            if let Some(combined) = vol.combined {
                self.released.push((key, combined));
            }
        }
    }

    fn destroy_subtree(&mut self, key: VolumeKey) {
        let mut stack = vec![key];
        while let Some(k) = stack.pop() {
            if let Some(children) = self.volumes.get(k).and_then(|v| v.children) {
                stack.extend(children);
            }
            self.destroy_volume(k);
        }
    }
}

impl Default for VolumeTree {
    fn default() -> Self {
        Self::new(TreeSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_tree() -> VolumeTree {
        VolumeTree::with_bounds(TreeSettings::default(), Cube::new(Vec3::splat(0.5), 0.5))
    }

    fn place(tree: &mut VolumeTree, key: VolumeKey, p: Vec3) -> ProxyId {
        let id = ProxyId::new();
        tree.record_placement(id, Aabb::from_center_size(p, Vec3::ZERO));
        tree.add_member(key, id);
        id
    }

    #[test]
    fn new_tree_has_single_unestablished_root() {
        let tree = VolumeTree::default();
        assert_eq!(tree.len(), 1);
        assert!(!tree.is_established());
        assert_eq!(tree.depth(tree.root()), Some(0));
    }

    #[test]
    fn split_distributes_members_to_one_child_each() {
        let mut tree = unit_tree();
        let root = tree.root();
        let ids: Vec<_> = [
            Vec3::new(0.1, 0.1, 0.1),
            Vec3::new(0.9, 0.9, 0.9),
            Vec3::new(0.5, 0.5, 0.5),
        ]
        .into_iter()
        .map(|p| place(&mut tree, root, p))
        .collect();

        assert!(tree.split(root));
        assert!(!tree.split(root));
        let children = *tree.get(root).unwrap().children().unwrap();
        for id in &ids {
            let holders = children
                .iter()
                .filter(|c| tree.get(**c).unwrap().members().contains(id))
                .count();
            assert_eq!(holders, 1);
        }
        assert_eq!(tree.get(root).unwrap().members().len(), 3);
        assert!(tree.get(root).unwrap().is_dirty());
        assert_eq!(tree.stats().splits, 1);
    }

    #[test]
    fn grow_places_old_root_in_a_corner() {
        let mut tree = unit_tree();
        let old_root = tree.root();
        let target = Vec3::new(3.0, 0.2, 0.2);
        let new_root = tree.grow_toward(target);

        assert_eq!(tree.root(), new_root);
        let grown = tree.get(new_root).unwrap();
        assert_eq!(grown.bounds().half_extent, 1.0);
        assert!(grown.bounds().contains_cube(&tree.get(old_root).unwrap().bounds()));
        assert!(grown.children().unwrap().contains(&old_root));
        assert_eq!(tree.get(old_root).unwrap().parent(), Some(new_root));
        assert_eq!(tree.len(), 9);
    }

    #[test]
    fn set_dirty_reaches_root_and_releases_combined() {
        let mut tree = unit_tree();
        let root = tree.root();
        place(&mut tree, root, Vec3::splat(0.2));
        tree.split(root);
        let leaf = tree.child_for_point(root, Vec3::splat(0.2)).unwrap();
        tree.clear_dirty(root);
        tree.clear_dirty(leaf);
        tree.install_combined(root, Some(CombinedProxy::default()));

        tree.set_dirty(leaf);
        assert!(tree.get(leaf).unwrap().is_dirty());
        assert!(tree.get(root).unwrap().is_dirty());
        assert!(tree.get(root).unwrap().combined().is_none());
        let released = tree.take_released();
        assert_eq!(released.len(), 1);
        assert_eq!(released[0].0, root);
    }

    #[test]
    fn redirtying_below_keeps_ancestor_dirty() {
        let mut tree = unit_tree();
        let root = tree.root();
        place(&mut tree, root, Vec3::splat(0.2));
        tree.split(root);
        let leaf = tree.child_for_point(root, Vec3::splat(0.2)).unwrap();

        let epoch = tree.dirty_epoch(root).unwrap();
        tree.set_dirty(leaf);
        assert_ne!(tree.dirty_epoch(root), Some(epoch));
        assert!(!tree.clear_dirty_since(root, epoch));
        assert!(tree.get(root).unwrap().is_dirty());

        let epoch = tree.dirty_epoch(root).unwrap();
        assert!(tree.clear_dirty_since(root, epoch));
        assert!(!tree.get(root).unwrap().is_dirty());
        assert!(!tree.clear_dirty_since(VolumeKey::default(), epoch));
    }

    #[test]
    fn shrink_promotes_single_populated_child() {
        let mut tree = unit_tree();
        let root = tree.root();
        place(&mut tree, root, Vec3::splat(0.2));
        place(&mut tree, root, Vec3::splat(0.3));
        tree.split(root);
        let survivor = tree.child_for_point(root, Vec3::splat(0.2)).unwrap();

        assert_eq!(tree.shrink_root(), ShrinkOutcome::Promoted(survivor));
        assert_eq!(tree.root(), survivor);
        assert!(!tree.contains(root));
        assert_eq!(tree.len(), 1);
        assert_eq!(tree.get(survivor).unwrap().parent(), None);
        assert_eq!(tree.shrink_root(), ShrinkOutcome::Unchanged);
    }

    #[test]
    fn shrink_collapses_empty_root() {
        let mut tree = unit_tree();
        let root = tree.root();
        tree.split(root);
        assert_eq!(tree.shrink_root(), ShrinkOutcome::Collapsed);
        assert_eq!(tree.root(), root);
        assert!(tree.get(root).unwrap().is_leaf());
        assert_eq!(tree.len(), 1);
        assert_eq!(tree.stats().volumes_destroyed, 8);
    }

    #[test]
    fn post_order_visits_children_first() {
        let mut tree = unit_tree();
        let root = tree.root();
        tree.split(root);
        let order = tree.post_order();
        assert_eq!(order.len(), 9);
        assert_eq!(*order.last().unwrap(), root);
        assert_eq!(tree.depth_first()[0], root);
    }

    #[test]
    fn populated_children_cache_invalidated_by_dirty() {
        let mut tree = unit_tree();
        let root = tree.root();
        place(&mut tree, root, Vec3::splat(0.2));
        tree.split(root);
        assert_eq!(tree.populated_children(root).len(), 1);

        let id = place(&mut tree, root, Vec3::splat(0.8));
        let leaf = tree.child_for_point(root, Vec3::splat(0.8)).unwrap();
        tree.add_member(leaf, id);
        // Stale until dirtied.
        assert_eq!(tree.populated_children(root).len(), 1);
        tree.set_dirty(leaf);
        assert_eq!(tree.populated_children(root).len(), 2);
    }

    #[test]
    fn leaf_for_point_descends() {
        let mut tree = unit_tree();
        let root = tree.root();
        tree.split(root);
        let leaf = tree.leaf_for_point(Vec3::splat(0.9)).unwrap();
        assert_eq!(tree.depth(leaf), Some(1));
        assert!(tree.leaf_for_point(Vec3::splat(5.0)).is_none());
    }
}
