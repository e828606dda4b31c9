//! # Geometry モジュール
//!
//! 装甲貫通判定の幾何計算を提供します。
//!
//! 弾道の方向ベクトルと装甲の法線ベクトルから、実効装甲厚と入射角を求める
//! 純粋関数のみで構成されます。状態や副作用は持ちません。
//!
//! ## 計算式
//!
//! ```text
//! θ = arccos( dot(d, n) / (|d|² · |n|²) )
//! 実効装甲厚 = 実装甲厚 / sin(θ)      (θ はラジアン)
//! 入射角     = θ · 180 / π            (度)
//! ```
//!
//! 分母には大きさではなく「大きさの二乗」を用います（[`magnitude_squared`] 参照）。

use glam::DVec3;
use thiserror::Error;

use crate::models::math_utils;

/// 零ベクトル・平行判定に使う許容誤差
const DEGENERATE_EPSILON: f64 = 1e-12;

/// 幾何計算の入力が退化している場合のエラー
#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum GeometryError {
    #[error("弾道の方向ベクトルの長さが0です（始点と終点が一致）")]
    ZeroLengthDirection,
    #[error("装甲の法線ベクトルの長さが0です")]
    ZeroLengthNormal,
    #[error("弾道が法線と平行です（sin θ = 0 のため実効装甲厚が発散）")]
    ParallelToNormal,
    #[error("座標に NaN または無限大が含まれています")]
    NonFiniteInput,
}

/// 内積
pub fn dot_product(a: DVec3, b: DVec3) -> f64 {
    (a.x * b.x) + (a.y * b.y) + (a.z * b.z)
}

/// ベクトルの大きさの「二乗」を返す
///
/// 真の大きさ（平方根）ではありません。入射角の計算はこの値の積で内積を割ることを
/// 前提に±3%の精度で較正されているため、平方根に置き換えてはいけません。
/// 正規化済みベクトル同士では両者はほぼ一致します。
///
/// 精度が重要な新しい用途では、較正をやり直したうえで真の大きさへの修正を検討すること。
pub fn magnitude_squared(v: DVec3) -> f64 {
    (v.x * v.x) + (v.y * v.y) + (v.z * v.z)
}

/// 方向ベクトルと法線のなす角（ラジアン）
///
/// 浮動小数点誤差で比が [-1, 1] をわずかに超えても NaN にならないよう丸めます。
/// 丸めは誤差の吸収用で、単位長でない軸を渡すと 0 度または 180 度に張り付きます。
fn arccos_term(direction: DVec3, normal: DVec3) -> Result<f64, GeometryError> {
    if !direction.is_finite() || !normal.is_finite() {
        return Err(GeometryError::NonFiniteInput);
    }
    let direction_mag = magnitude_squared(direction);
    if direction_mag <= DEGENERATE_EPSILON {
        return Err(GeometryError::ZeroLengthDirection);
    }
    let normal_mag = magnitude_squared(normal);
    if normal_mag <= DEGENERATE_EPSILON {
        return Err(GeometryError::ZeroLengthNormal);
    }

    let ratio = dot_product(direction, normal) / (direction_mag * normal_mag);
    Ok(ratio.clamp(-1.0, 1.0).acos())
}

/// 実効装甲厚を計算
///
/// # 引数
///
/// * `direction` - 正規化済みの弾道方向ベクトル
/// * `normal` - 装甲の法線候補ベクトル
/// * `actual_thickness_mm` - 実装甲厚（mm）
///
/// # 戻り値
///
/// 実効装甲厚（mm）。方向が法線と平行な場合は発散するため
/// [`GeometryError::ParallelToNormal`] を返します。
pub fn effective_thickness(
    direction: DVec3,
    normal: DVec3,
    actual_thickness_mm: f64,
) -> Result<f64, GeometryError> {
    let arccos = arccos_term(direction, normal)?;

    // sin はラジアンを取る。度への変換はしない
    let sine = arccos.sin();
    if sine.abs() <= DEGENERATE_EPSILON {
        return Err(GeometryError::ParallelToNormal);
    }

    Ok(actual_thickness_mm / sine)
}

/// 入射角（度）を計算
///
/// 戻り値は常に 0〜180 度の範囲です。
pub fn angle_of_attack_degrees(direction: DVec3, normal: DVec3) -> Result<f64, GeometryError> {
    let arccos = arccos_term(direction, normal)?;
    Ok(math_utils::rad_to_deg(arccos))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use proptest::prelude::*;

    /// 法線 `normal` から `degrees` だけ傾いた単位ベクトル（法線と直交する `tangent` 方向へ）
    fn tilted(normal: DVec3, tangent: DVec3, degrees: f64) -> DVec3 {
        let rad = math_utils::deg_to_rad(degrees);
        (normal * rad.cos() + tangent * rad.sin()).normalize()
    }

    #[test]
    fn test_dot_product_and_squared_magnitude() {
        let a = DVec3::new(1.0, 2.0, 3.0);
        let b = DVec3::new(4.0, -5.0, 6.0);
        assert_approx_eq!(dot_product(a, b), 12.0);
        // 大きさではなく二乗を返す
        assert_approx_eq!(magnitude_squared(a), 14.0);
        assert_approx_eq!(magnitude_squared(DVec3::new(3.0, 4.0, 0.0)), 25.0);
    }

    #[test]
    fn test_perpendicular_direction_gives_actual_thickness() {
        let thickness = effective_thickness(DVec3::Z, DVec3::Y, 150.0).unwrap();
        assert_approx_eq!(thickness, 150.0);
        assert_approx_eq!(angle_of_attack_degrees(DVec3::Z, DVec3::Y).unwrap(), 90.0);
    }

    #[test]
    fn test_thirty_degrees_from_axis_doubles_thickness() {
        let direction = tilted(DVec3::Y, DVec3::Z, 30.0);
        let thickness = effective_thickness(direction, DVec3::Y, 150.0).unwrap();
        assert_approx_eq!(thickness, 300.0, 1e-9);
        assert_approx_eq!(angle_of_attack_degrees(direction, DVec3::Y).unwrap(), 30.0, 1e-9);
    }

    #[test]
    fn test_parallel_direction_is_degenerate() {
        assert_eq!(
            effective_thickness(DVec3::Y, DVec3::Y, 150.0),
            Err(GeometryError::ParallelToNormal)
        );
        assert_eq!(
            effective_thickness(DVec3::NEG_Y, DVec3::Y, 150.0),
            Err(GeometryError::ParallelToNormal)
        );
        // 角度そのものは定義できる
        assert_approx_eq!(angle_of_attack_degrees(DVec3::Y, DVec3::Y).unwrap(), 0.0);
        assert_approx_eq!(angle_of_attack_degrees(DVec3::NEG_Y, DVec3::Y).unwrap(), 180.0);
    }

    #[test]
    fn test_zero_length_inputs_are_rejected() {
        assert_eq!(
            effective_thickness(DVec3::ZERO, DVec3::Y, 150.0),
            Err(GeometryError::ZeroLengthDirection)
        );
        assert_eq!(
            angle_of_attack_degrees(DVec3::X, DVec3::ZERO),
            Err(GeometryError::ZeroLengthNormal)
        );
    }

    #[test]
    fn test_non_finite_inputs_are_rejected() {
        assert_eq!(
            effective_thickness(DVec3::new(f64::NAN, 0.0, 1.0), DVec3::Y, 150.0),
            Err(GeometryError::NonFiniteInput)
        );
        assert_eq!(
            angle_of_attack_degrees(DVec3::Z, DVec3::new(0.0, f64::INFINITY, 0.0)),
            Err(GeometryError::NonFiniteInput)
        );
    }

    #[test]
    fn test_thickness_decreases_monotonically_towards_normal_incidence() {
        let mut previous = f64::INFINITY;
        for step in 1..=90 {
            let direction = tilted(DVec3::Y, DVec3::Z, step as f64);
            let thickness = effective_thickness(direction, DVec3::Y, 150.0).unwrap();
            assert!(thickness < previous, "{}度で単調減少していない", step);
            assert!(thickness >= 150.0 - 1e-9);
            previous = thickness;
        }
        assert_approx_eq!(previous, 150.0, 1e-9);
    }

    fn unit_vector() -> impl Strategy<Value = DVec3> {
        (-1.0f64..1.0, -1.0f64..1.0, -1.0f64..1.0)
            .prop_filter("零ベクトル付近は除外", |(x, y, z)| x * x + y * y + z * z > 1e-3)
            .prop_map(|(x, y, z)| DVec3::new(x, y, z).normalize())
    }

    proptest! {
        #[test]
        fn prop_angle_is_bounded(direction in unit_vector(), normal in unit_vector()) {
            let angle = angle_of_attack_degrees(direction, normal).unwrap();
            prop_assert!((0.0..=180.0).contains(&angle));
        }

        #[test]
        fn prop_angle_is_invariant_under_joint_negation(
            direction in unit_vector(),
            normal in unit_vector(),
        ) {
            let angle = angle_of_attack_degrees(direction, normal).unwrap();
            let negated = angle_of_attack_degrees(-direction, -normal).unwrap();
            prop_assert!((angle - negated).abs() < 1e-9);
        }
    }
}
