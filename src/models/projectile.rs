use std::collections::HashMap;
use std::fmt;

use glam::{DMat3, DQuat, DVec3};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::models::traits::IProjectileHost;

/// 弾丸エンティティのハンドル
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProjectileId(pub u64);

impl fmt::Display for ProjectileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{:04}", self.0)
    }
}

/// 弾丸エンティティの姿勢
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projectile {
    pub id: ProjectileId,
    pub position: DVec3,
    pub rotation: DQuat,
}

/// `forward` 方向を向く回転を求める（`up` は上方向のヒント）
///
/// `forward` が `up` と平行な場合は最短回転で代用します。
pub fn look_rotation(forward: DVec3, up: DVec3) -> DQuat {
    let forward = forward.normalize_or_zero();
    if forward == DVec3::ZERO {
        return DQuat::IDENTITY;
    }

    let right = up.cross(forward);
    if right.length_squared() <= 1e-12 {
        return DQuat::from_rotation_arc(DVec3::Z, forward);
    }
    let right = right.normalize();
    let true_up = forward.cross(right);

    DQuat::from_mat3(&DMat3::from_cols(right, true_up, forward))
}

/// メモリ上の弾丸エンティティ管理
///
/// 生成・破棄の回数を記録し、二重破棄やリークを検出できるようにします。
#[derive(Debug, Default)]
pub struct ProjectileRegistry {
    live: HashMap<ProjectileId, Projectile>,
    next_id: u64,
    spawned: u64,
    despawned: u64,
}

impl ProjectileRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: ProjectileId) -> Option<&Projectile> {
        self.live.get(&id)
    }

    pub fn is_live(&self, id: ProjectileId) -> bool {
        self.live.contains_key(&id)
    }

    /// これまでに生成した数
    pub fn spawned_count(&self) -> u64 {
        self.spawned
    }

    /// これまでに破棄した数
    pub fn despawned_count(&self) -> u64 {
        self.despawned
    }
}

impl IProjectileHost for ProjectileRegistry {
    fn spawn(&mut self, position: DVec3, rotation: DQuat) -> ProjectileId {
        self.next_id += 1;
        let id = ProjectileId(self.next_id);
        self.live.insert(id, Projectile { id, position, rotation });
        self.spawned += 1;
        trace!("弾丸エンティティ生成: {} ({:.2}, {:.2}, {:.2})", id, position.x, position.y, position.z);
        id
    }

    fn despawn(&mut self, id: ProjectileId) -> bool {
        if self.live.remove(&id).is_some() {
            self.despawned += 1;
            trace!("弾丸エンティティ破棄: {}", id);
            true
        } else {
            false
        }
    }

    fn live_count(&self) -> usize {
        self.live.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_look_rotation_faces_forward() {
        let forward = DVec3::new(1.0, 0.0, 1.0).normalize();
        let rotation = look_rotation(forward, DVec3::Y);
        let facing = rotation * DVec3::Z;
        assert_approx_eq!(facing.x, forward.x, 1e-12);
        assert_approx_eq!(facing.y, forward.y, 1e-12);
        assert_approx_eq!(facing.z, forward.z, 1e-12);
        // 上方向は崩れない
        assert_approx_eq!((rotation * DVec3::Y).y, 1.0, 1e-12);
    }

    #[test]
    fn test_look_rotation_straight_up_falls_back() {
        let rotation = look_rotation(DVec3::Y, DVec3::Y);
        let facing = rotation * DVec3::Z;
        assert_approx_eq!(facing.y, 1.0, 1e-12);
    }

    #[test]
    fn test_registry_counts_and_rejects_double_despawn() {
        let mut registry = ProjectileRegistry::new();
        let first = registry.spawn(DVec3::ZERO, DQuat::IDENTITY);
        let second = registry.spawn(DVec3::X, DQuat::IDENTITY);
        assert_ne!(first, second);
        assert_eq!(registry.live_count(), 2);

        assert!(registry.despawn(first));
        assert!(!registry.despawn(first));
        assert_eq!(registry.despawned_count(), 1);
        assert_eq!(registry.spawned_count(), 2);
        assert!(registry.is_live(second));
        assert_eq!(registry.get(second).map(|p| p.position), Some(DVec3::X));
    }
}
