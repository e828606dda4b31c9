use std::cell::RefCell;
use std::rc::Rc;

use glam::{DQuat, DVec3};

use crate::models::projectile::ProjectileId;

/// 弾丸エンティティを生成・破棄する外部ホストのインターフェース
///
/// エンティティ自体は描画側が所有し、シミュレーションエンジンはハンドルのみを扱います。
pub trait IProjectileHost {
    /// 弾丸エンティティの生成
    fn spawn(&mut self, position: DVec3, rotation: DQuat) -> ProjectileId;

    /// 弾丸エンティティの破棄（存在しなかった場合は false）
    fn despawn(&mut self, id: ProjectileId) -> bool;

    /// 生存中のエンティティ数
    fn live_count(&self) -> usize;
}

// 描画側とエンジンで同じホストを共有できるようにする
impl<T: IProjectileHost> IProjectileHost for Rc<RefCell<T>> {
    fn spawn(&mut self, position: DVec3, rotation: DQuat) -> ProjectileId {
        self.borrow_mut().spawn(position, rotation)
    }

    fn despawn(&mut self, id: ProjectileId) -> bool {
        self.borrow_mut().despawn(id)
    }

    fn live_count(&self) -> usize {
        self.borrow().live_count()
    }
}
