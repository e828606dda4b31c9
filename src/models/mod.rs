// 基本的なデータ型と数学ユーティリティ
pub mod common;

// 外部ホストとの境界（trait）定義
pub mod traits;

// 各モデルの実装
pub mod armor;
pub mod trajectory;
pub mod projectile;

// 便利な re-export
pub use common::*;
pub use traits::*;
pub use armor::{ArmorPlate, Orientation};
pub use trajectory::Trajectory;
pub use projectile::{Projectile, ProjectileId, ProjectileRegistry, look_rotation};
