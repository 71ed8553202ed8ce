use glam::{Vec3, Vec4};
use hlod_runtime::HlodSystem;
use hlod_volume::{VolumeKey, VolumeTree};

/// Wire-cube colours by depth, cycling.
pub const DEPTH_COLORS: [Vec3; 7] = [
    Vec3::new(1.0, 0.0, 0.0),
    Vec3::new(0.0, 1.0, 0.0),
    Vec3::new(0.0, 0.0, 1.0),
    Vec3::new(1.0, 0.0, 1.0),
    Vec3::new(1.0, 1.0, 0.0),
    Vec3::new(0.0, 1.0, 1.0),
    Vec3::new(0.5, 0.5, 0.5),
];

/// Colour for a volume at `depth`. Deeper volumes are more opaque.
pub fn depth_color(depth: u32) -> Vec4 {
    let rgb = DEPTH_COLORS[depth as usize % DEPTH_COLORS.len()];
    let alpha = (1.0 - 0.9f32.powi(depth as i32)).max(0.2);
    rgb.extend(alpha)
}

/// One wire cube to draw.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VolumeGizmo {
    pub volume: VolumeKey,
    pub center: Vec3,
    pub half_extent: f32,
    pub depth: u32,
    pub color: Vec4,
}

/// Gizmos for every volume in the tree, depth-first.
pub fn tree_gizmos(tree: &VolumeTree) -> Vec<VolumeGizmo> {
    tree.depth_first()
        .into_iter()
        .filter_map(|key| {
            let volume = tree.get(key)?;
            let depth = tree.depth(key)?;
            let bounds = volume.bounds();
            Some(VolumeGizmo {
                volume: key,
                center: bounds.center,
                half_extent: bounds.half_extent,
                depth,
                color: depth_color(depth),
            })
        })
        .collect()
}

/// Gizmos for the system's hierarchy, or none unless `draw_volume_bounds`
/// is set.
pub fn volume_gizmos(system: &HlodSystem) -> Vec<VolumeGizmo> {
    if !system.config().draw_volume_bounds {
        return Vec::new();
    }
    let gizmos = tree_gizmos(system.tree());
    tracing::trace!(count = gizmos.len(), "volume gizmos");
    gizmos
}

#[cfg(test)]
mod tests {
    use super::*;
    use hlod_common::{Aabb, Cube, MaterialId, ProxyId};
    use hlod_runtime::{CapabilityRegistry, HlodConfig};
    use hlod_scene::{Mesh, ProxyDesc};
    use hlod_volume::{InsertTask, TreeSettings};

    #[test]
    fn alpha_has_a_floor_and_grows_with_depth() {
        assert_eq!(depth_color(0).w, 0.2);
        assert_eq!(depth_color(1).w, 0.2);
        assert!((depth_color(10).w - (1.0 - 0.9f32.powi(10))).abs() < 1e-6);
        assert!(depth_color(20).w > depth_color(10).w);
    }

    #[test]
    fn colours_cycle_every_seven_levels() {
        assert_eq!(depth_color(0).truncate(), DEPTH_COLORS[0]);
        assert_eq!(depth_color(3).truncate(), DEPTH_COLORS[3]);
        assert_eq!(depth_color(7).truncate(), DEPTH_COLORS[0]);
        assert_eq!(depth_color(13).truncate(), DEPTH_COLORS[6]);
    }

    #[test]
    fn split_tree_yields_root_and_children() {
        let settings = TreeSettings {
            split_threshold: 4,
            ..TreeSettings::default()
        };
        let mut tree = VolumeTree::with_bounds(settings, Cube::new(Vec3::ZERO, 1.0));
        let mut scheduler = hlod_sched::Scheduler::new(None);
        for i in 0..8 {
            let corner = Vec3::new((i % 2) as f32, ((i / 2) % 2) as f32, (i / 4) as f32);
            let bounds = Aabb::from_center_size(corner - 0.5, Vec3::splat(0.1));
            scheduler.push(InsertTask::new(ProxyId::new(), bounds));
        }
        scheduler.run_until_idle(&mut tree);

        let gizmos = tree_gizmos(&tree);
        assert_eq!(gizmos.len(), tree.len());
        assert_eq!(gizmos[0].volume, tree.root());
        assert_eq!(gizmos[0].depth, 0);
        assert!(gizmos[1..].iter().all(|g| g.depth == 1));
        assert!(gizmos[1..].iter().all(|g| g.color.truncate() == DEPTH_COLORS[1]));
    }

    #[test]
    fn system_gizmos_follow_config() {
        let mut config = HlodConfig {
            time_budget_ms: 0,
            ..HlodConfig::default()
        };
        let registry = CapabilityRegistry::with_builtins();
        let mut hidden = HlodSystem::new(config.clone(), &registry).unwrap();
        config.draw_volume_bounds = true;
        let mut shown = HlodSystem::new(config, &registry).unwrap();

        for system in [&mut hidden, &mut shown] {
            let cube = system.scene_mut().add_mesh(Mesh::unit_cube("cube"));
            system
                .scene_mut()
                .spawn(ProxyDesc::new("rock", cube, MaterialId(1)))
                .unwrap();
            system.sync_scene();
            system.run_until_idle();
        }

        assert!(volume_gizmos(&hidden).is_empty());
        assert_eq!(volume_gizmos(&shown).len(), 1);
    }
}
