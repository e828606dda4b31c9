use glam::{DQuat, DVec3, EulerRot};
use serde::{Deserialize, Serialize};

use crate::models::common::math_utils;

/// 装甲板のローカル軸
///
/// `up` と `right` の2軸を法線の候補として貫通判定に使います。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Orientation {
    pub up: DVec3,
    pub right: DVec3,
}

impl Orientation {
    /// 任意の長さの軸から作成（単位長に正規化される）
    ///
    /// 長さ0または有限でない軸は零ベクトルとなり、判定時に
    /// [`GeometryError::ZeroLengthNormal`](crate::geometry::GeometryError::ZeroLengthNormal)
    /// として報告されます。
    pub fn new(up: DVec3, right: DVec3) -> Self {
        Self {
            up: up.normalize_or_zero(),
            right: right.normalize_or_zero(),
        }
    }

    /// 回転なし（up = +Y, right = +X）
    pub fn identity() -> Self {
        Self::from_rotation(DQuat::IDENTITY)
    }

    /// 回転クォータニオンからローカル軸を求める
    pub fn from_rotation(rotation: DQuat) -> Self {
        Self {
            up: rotation * DVec3::Y,
            right: rotation * DVec3::X,
        }
    }

    /// オイラー角（度）から作成
    ///
    /// 回転はZ軸、X軸、Y軸の順に適用されます。
    pub fn from_euler_degrees(x: f64, y: f64, z: f64) -> Self {
        let rotation = DQuat::from_euler(
            EulerRot::YXZ,
            math_utils::deg_to_rad(y),
            math_utils::deg_to_rad(x),
            math_utils::deg_to_rad(z),
        );
        Self::from_rotation(rotation)
    }
}

impl Default for Orientation {
    fn default() -> Self {
        Self::identity()
    }
}

/// 装甲板
///
/// 向きは外部から与えられ、厚さはシミュレーションエンジンだけが同期します。
/// 外部の表示処理は読み取りのみ可能です。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArmorPlate {
    orientation: Orientation,
    actual_thickness_mm: f64,
}

impl ArmorPlate {
    pub fn new(orientation: Orientation) -> Self {
        Self {
            orientation,
            actual_thickness_mm: 0.0,
        }
    }

    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    pub fn actual_thickness_mm(&self) -> f64 {
        self.actual_thickness_mm
    }

    /// 表示用の奥行きスケール（mm を 1/100 にした値）
    pub fn depth_scale(&self) -> f64 {
        self.actual_thickness_mm / 100.0
    }

    pub(crate) fn sync_thickness(&mut self, actual_thickness_mm: f64) {
        self.actual_thickness_mm = actual_thickness_mm;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_identity_axes() {
        let orientation = Orientation::identity();
        assert_eq!(orientation.up, DVec3::Y);
        assert_eq!(orientation.right, DVec3::X);
    }

    #[test]
    fn test_euler_rotation_about_x_tilts_up_axis() {
        let orientation = Orientation::from_euler_degrees(30.0, 0.0, 0.0);
        assert_approx_eq!(orientation.up.y, 30f64.to_radians().cos(), 1e-12);
        assert_approx_eq!(orientation.up.z.abs(), 0.5, 1e-12);
        assert_approx_eq!(orientation.right.x, 1.0, 1e-12);
    }

    #[test]
    fn test_euler_rotation_about_y_turns_right_axis() {
        let orientation = Orientation::from_euler_degrees(0.0, 90.0, 0.0);
        assert_approx_eq!(orientation.right.x, 0.0, 1e-12);
        assert_approx_eq!(orientation.right.z.abs(), 1.0, 1e-12);
        assert_approx_eq!(orientation.up.y, 1.0, 1e-12);
    }

    #[test]
    fn test_explicit_axes_are_normalized() {
        let orientation = Orientation::new(DVec3::new(0.0, 4.0, 0.0), DVec3::new(0.0, 0.0, -2.0));
        assert_eq!(orientation.up, DVec3::Y);
        assert_eq!(orientation.right, DVec3::NEG_Z);

        let broken = Orientation::new(DVec3::ZERO, DVec3::new(f64::NAN, 0.0, 0.0));
        assert_eq!(broken.up, DVec3::ZERO);
        assert_eq!(broken.right, DVec3::ZERO);
    }

    #[test]
    fn test_depth_scale_follows_thickness() {
        let mut plate = ArmorPlate::new(Orientation::identity());
        plate.sync_thickness(150.0);
        assert_approx_eq!(plate.depth_scale(), 1.5);
    }
}
