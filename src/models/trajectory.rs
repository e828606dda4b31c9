use glam::DVec3;
use serde::{Deserialize, Serialize};

use crate::geometry::GeometryError;

/// 弾道（始点と終点）
///
/// 実行ごとに外部から与えられ、その実行が終わった後は保持されません。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    pub start: DVec3,
    pub end: DVec3,
}

impl Trajectory {
    pub fn new(start: DVec3, end: DVec3) -> Self {
        Self { start, end }
    }

    /// 始点と終点が一致しているか
    pub fn is_degenerate(&self) -> bool {
        (self.end - self.start).length_squared() <= f64::EPSILON * f64::EPSILON
    }

    /// 始点から終点への距離
    pub fn length(&self) -> f64 {
        self.start.distance(self.end)
    }

    /// 始点・終点ともに有限の座標か
    pub fn is_finite(&self) -> bool {
        self.start.is_finite() && self.end.is_finite()
    }

    /// 正規化済みの弾道方向
    pub fn direction(&self) -> Result<DVec3, GeometryError> {
        if !self.is_finite() {
            return Err(GeometryError::NonFiniteInput);
        }
        if self.is_degenerate() {
            return Err(GeometryError::ZeroLengthDirection);
        }
        let direction = (self.end - self.start).normalize();
        // 差が f64 の範囲を超えると正規化結果が NaN になる
        if !direction.is_finite() {
            return Err(GeometryError::NonFiniteInput);
        }
        Ok(direction)
    }
}
