use hlod_common::Cube;
use hlod_runtime::{HlodSystem, Readouts};
use hlod_volume::VolumeKey;

/// Hierarchy inspector for developer tooling.
///
/// Read-only queries against the HLOD system for debugging, profiling and
/// development UI.
pub struct HierarchyInspector;

impl HierarchyInspector {
    /// Produce a summary of the hierarchy.
    pub fn summary(system: &HlodSystem) -> HierarchySummary {
        let tree = system.tree();
        let keys = tree.depth_first();
        let max_depth = keys.iter().filter_map(|k| tree.depth(*k)).max().unwrap_or(0);
        let leaves = keys
            .iter()
            .filter_map(|k| tree.get(*k))
            .filter(|v| v.is_leaf())
            .count();
        HierarchySummary {
            volumes: tree.len(),
            leaves,
            max_depth,
            combined_proxies: system.combined_proxies().len(),
            readouts: system.readouts(),
        }
    }

    /// Details of one volume.
    pub fn inspect_volume(system: &HlodSystem, key: VolumeKey) -> Option<VolumeInfo> {
        let tree = system.tree();
        let volume = tree.get(key)?;
        let combined = volume.combined();
        Some(VolumeInfo {
            key,
            name: volume.name(),
            depth: tree.depth(key)?,
            bounds: volume.bounds(),
            members: volume.members().len(),
            leaf: volume.is_leaf(),
            dirty: volume.is_dirty(),
            draw_calls: combined.map_or(0, |c| c.draw_calls()),
            merged: combined.is_some_and(|c| c.merged),
        })
    }

    /// Every volume, depth-first from the root.
    pub fn list_volumes(system: &HlodSystem) -> Vec<VolumeInfo> {
        system
            .tree()
            .depth_first()
            .into_iter()
            .filter_map(|k| Self::inspect_volume(system, k))
            .collect()
    }
}

/// Summary of the hierarchy for the inspector.
#[derive(Debug, Clone)]
pub struct HierarchySummary {
    pub volumes: usize,
    pub leaves: usize,
    pub max_depth: u32,
    pub combined_proxies: usize,
    pub readouts: Readouts,
}

impl std::fmt::Display for HierarchySummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let r = &self.readouts;
        write!(
            f,
            "Hierarchy: volumes={} leaves={} depth={} proxies={} combined={} dirty={} queue={} last_quantum={:?} builds={}",
            self.volumes,
            self.leaves,
            self.max_depth,
            r.tracked_proxies,
            self.combined_proxies,
            r.dirty_volumes,
            r.queue_depth,
            r.last_execution_time,
            r.builds.builds,
        )
    }
}

/// Detailed info about a single volume.
#[derive(Debug, Clone)]
pub struct VolumeInfo {
    pub key: VolumeKey,
    pub name: String,
    pub depth: u32,
    pub bounds: Cube,
    pub members: usize,
    pub leaf: bool,
    pub dirty: bool,
    pub draw_calls: usize,
    pub merged: bool,
}

impl std::fmt::Display for VolumeInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let c = self.bounds.center;
        write!(
            f,
            "{:indent$}{} center=({:.2}, {:.2}, {:.2}) side={:.2} members={} draws={}{}{}",
            "",
            self.name,
            c.x,
            c.y,
            c.z,
            self.bounds.side(),
            self.members,
            self.draw_calls,
            if self.merged { " merged" } else { "" },
            if self.dirty { " dirty" } else { "" },
            indent = self.depth as usize * 2,
        )
    }
}
