use glam::DVec3;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::models::{
    DEFAULT_ACTUAL_THICKNESS_MM, DEFAULT_BULLET_PENETRATION_MM, Orientation, Trajectory,
};
use crate::playback::PlaybackSettings;

/// シナリオメタデータ
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScenarioMeta {
    pub version: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// エンジン初期値
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineConfig {
    pub actual_thickness_mm: f64,
    pub bullet_penetration_mm: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            actual_thickness_mm: DEFAULT_ACTUAL_THICKNESS_MM,
            bullet_penetration_mm: DEFAULT_BULLET_PENETRATION_MM,
        }
    }
}

/// 装甲板の向き
///
/// `rotation_deg`（オイラー角）か、`up` と `right` の両方のどちらかで指定します。
/// どちらもなければ回転なしとみなします。
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize)]
pub struct ArmorConfig {
    pub rotation_deg: Option<DVec3>,
    pub up: Option<DVec3>,
    pub right: Option<DVec3>,
}

impl ArmorConfig {
    /// 設定から装甲板の向きを求める（軸は正規化される）
    pub fn orientation(&self) -> Result<Orientation, ScenarioError> {
        match (self.rotation_deg, self.up, self.right) {
            (Some(_), Some(_), _) | (Some(_), _, Some(_)) => Err(ScenarioError::ValidationError(
                "armor: rotation_deg and up/right are mutually exclusive".to_string(),
            )),
            (Some(r), None, None) => {
                if !r.is_finite() {
                    return Err(ScenarioError::ValidationError(
                        "armor.rotation_deg must be finite".to_string(),
                    ));
                }
                Ok(Orientation::from_euler_degrees(r.x, r.y, r.z))
            }
            (None, Some(up), Some(right)) => {
                let up = up.try_normalize().ok_or_else(|| {
                    ScenarioError::ValidationError(
                        "armor.up must be finite and non-zero".to_string(),
                    )
                })?;
                let right = right.try_normalize().ok_or_else(|| {
                    ScenarioError::ValidationError(
                        "armor.right must be finite and non-zero".to_string(),
                    )
                })?;
                Ok(Orientation::new(up, right))
            }
            (None, None, None) => Ok(Orientation::identity()),
            (None, _, _) => Err(ScenarioError::ValidationError(
                "armor: both up and right are required".to_string(),
            )),
        }
    }
}

/// シミュレーション進行設定
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub dt_s: f64,
    pub max_steps: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            dt_s: 1.0 / 60.0,
            max_steps: 100_000,
        }
    }
}

/// 射撃1回分の設定
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ShotConfig {
    pub id: String,
    #[serde(default)]
    pub fire_at_s: f64,
    pub start: DVec3,
    pub end: DVec3,
    /// 射撃前に適用する実装甲厚
    pub actual_thickness_mm: Option<f64>,
    /// 射撃前に適用する貫通力
    pub bullet_penetration_mm: Option<f64>,
}

impl ShotConfig {
    pub fn trajectory(&self) -> Trajectory {
        Trajectory::new(self.start, self.end)
    }
}

/// 完全なシナリオ設定
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScenarioConfig {
    pub meta: ScenarioMeta,
    #[serde(default)]
    pub sim: SimulationConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub armor: ArmorConfig,
    #[serde(default)]
    pub playback: PlaybackSettings,
    pub shots: Vec<ShotConfig>,
}

impl ScenarioConfig {
    /// YAMLファイルからシナリオ設定を読み込み
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ScenarioError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ScenarioError::FileNotFound(path.to_path_buf()));
        }

        let contents = fs::read_to_string(path)
            .map_err(|e| ScenarioError::IoError(path.to_path_buf(), e))?;

        let config: ScenarioConfig = serde_yaml::from_str(&contents)
            .map_err(|e| ScenarioError::ParseError(path.to_path_buf(), e))?;

        config.validate()?;

        Ok(config)
    }

    /// YAML文字列からシナリオ設定を読み込み
    pub fn from_yaml_str(contents: &str) -> Result<Self, ScenarioError> {
        let config: ScenarioConfig = serde_yaml::from_str(contents)
            .map_err(|e| ScenarioError::ParseError(PathBuf::from("<inline>"), e))?;
        config.validate()?;
        Ok(config)
    }

    /// 設定の基本的な検証
    pub fn validate(&self) -> Result<(), ScenarioError> {
        check_positive("sim.dt_s", self.sim.dt_s)?;
        if !Duration::try_from_secs_f64(self.sim.dt_s).is_ok_and(|period| !period.is_zero()) {
            return Err(ScenarioError::ValidationError(format!(
                "sim.dt_s {} is out of range",
                self.sim.dt_s
            )));
        }
        if self.sim.max_steps == 0 {
            return Err(ScenarioError::ValidationError(
                "sim.max_steps must be positive".to_string(),
            ));
        }

        check_positive("playback.speed", self.playback.speed)?;
        check_positive("playback.arrival_epsilon", self.playback.arrival_epsilon)?;
        if !(self.playback.hold_s.is_finite() && self.playback.hold_s >= 0.0) {
            return Err(ScenarioError::ValidationError(
                "playback.hold_s must be a finite, non-negative number".to_string(),
            ));
        }

        check_millimetres("engine.actual_thickness_mm", self.engine.actual_thickness_mm)?;
        check_millimetres("engine.bullet_penetration_mm", self.engine.bullet_penetration_mm)?;

        self.armor.orientation()?;

        if self.shots.is_empty() {
            return Err(ScenarioError::ValidationError("at least one shot is required".to_string()));
        }

        let mut previous_fire_at = 0.0;
        for shot in &self.shots {
            if !shot.fire_at_s.is_finite() {
                return Err(ScenarioError::ValidationError(format!(
                    "Shot {} fire_at_s must be finite",
                    shot.id
                )));
            }
            if !shot.trajectory().is_finite() {
                return Err(ScenarioError::ValidationError(format!(
                    "Shot {} start and end must be finite",
                    shot.id
                )));
            }
            if shot.trajectory().is_degenerate() {
                return Err(ScenarioError::ValidationError(format!(
                    "Shot {} has identical start and end points",
                    shot.id
                )));
            }
            if !(shot.fire_at_s >= previous_fire_at) {
                return Err(ScenarioError::ValidationError(format!(
                    "Shot {} fire_at_s {} must be >= {} (shots are fired in order)",
                    shot.id, shot.fire_at_s, previous_fire_at
                )));
            }
            previous_fire_at = shot.fire_at_s;

            if let Some(mm) = shot.actual_thickness_mm {
                check_millimetres(&format!("shots.{}.actual_thickness_mm", shot.id), mm)?;
            }
            if let Some(mm) = shot.bullet_penetration_mm {
                check_millimetres(&format!("shots.{}.bullet_penetration_mm", shot.id), mm)?;
            }
        }

        Ok(())
    }

    /// シナリオの概要を表示
    pub fn print_summary(&self) {
        println!("=== シナリオ情報 ===");
        println!("名前: {}", self.meta.name);
        println!("説明: {}", self.meta.description);
        println!("バージョン: {}", self.meta.version);
        println!();

        println!("=== 初期設定 ===");
        println!("実装甲厚: {:.2}mm", self.engine.actual_thickness_mm);
        println!("貫通力: {:.2}mm", self.engine.bullet_penetration_mm);
        if let Ok(orientation) = self.armor.orientation() {
            println!(
                "装甲 up: ({:.3}, {:.3}, {:.3}) right: ({:.3}, {:.3}, {:.3})",
                orientation.up.x, orientation.up.y, orientation.up.z,
                orientation.right.x, orientation.right.y, orientation.right.z
            );
        }
        println!("時間刻み: {:.4}秒", self.sim.dt_s);
        println!(
            "再生: 速度 {:.1}/秒, 着弾判定 {:.2}, 静止 {:.1}秒",
            self.playback.speed, self.playback.arrival_epsilon, self.playback.hold_s
        );
        println!();

        println!("=== 射撃 ({}発) ===", self.shots.len());
        for shot in &self.shots {
            println!(
                "  {}: {:.1}秒 ({:.2}, {:.2}, {:.2}) → ({:.2}, {:.2}, {:.2})",
                shot.id, shot.fire_at_s,
                shot.start.x, shot.start.y, shot.start.z,
                shot.end.x, shot.end.y, shot.end.z
            );
        }
    }
}

fn check_positive(field: &str, value: f64) -> Result<(), ScenarioError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ScenarioError::ValidationError(format!("{} must be a finite, positive number", field)))
    }
}

fn check_millimetres(field: &str, value: f64) -> Result<(), ScenarioError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ScenarioError::ValidationError(format!("{} must be a non-negative number", field)))
    }
}

/// シナリオ読み込みエラー
#[derive(Error, Debug)]
pub enum ScenarioError {
    #[error("シナリオファイルが見つかりません: {}", .0.display())]
    FileNotFound(PathBuf),
    #[error("ファイル読み込みエラー {}: {}", .0.display(), .1)]
    IoError(PathBuf, #[source] std::io::Error),
    #[error("YAML解析エラー {}: {}", .0.display(), .1)]
    ParseError(PathBuf, #[source] serde_yaml::Error),
    #[error("設定検証エラー: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASIC: &str = r#"
meta:
  version: "1.0"
  name: basic
  description: direct and oblique hits
engine:
  actual_thickness_mm: 150.0
  bullet_penetration_mm: 200.0
armor:
  rotation_deg: [0.0, 0.0, 0.0]
shots:
  - id: direct
    start: [0.0, 0.0, -10.0]
    end: [0.0, 0.0, 0.0]
  - id: oblique
    fire_at_s: 2.5
    start: [0.0, -8.660254037844386, -5.0]
    end: [0.0, 0.0, 0.0]
    bullet_penetration_mm: 350.0
"#;

    #[test]
    fn test_parse_basic_scenario() {
        let config = ScenarioConfig::from_yaml_str(BASIC).unwrap();
        assert_eq!(config.meta.name, "basic");
        assert_eq!(config.shots.len(), 2);
        assert_eq!(config.shots[1].fire_at_s, 2.5);
        assert_eq!(config.shots[1].bullet_penetration_mm, Some(350.0));
        assert_eq!(config.shots[0].trajectory().end, DVec3::ZERO);
        // 省略した項目は既定値
        assert_eq!(config.playback, PlaybackSettings::default());
        assert_eq!(config.sim.max_steps, 100_000);
    }

    #[test]
    fn test_explicit_axes_are_normalized() {
        let armor = ArmorConfig {
            rotation_deg: None,
            up: Some(DVec3::new(0.0, 2.0, 0.0)),
            right: Some(DVec3::new(3.0, 0.0, 0.0)),
        };
        let orientation = armor.orientation().unwrap();
        assert_eq!(orientation.up, DVec3::Y);
        assert_eq!(orientation.right, DVec3::X);
    }

    #[test]
    fn test_invalid_armor_axes_are_rejected() {
        let only_up = ArmorConfig {
            up: Some(DVec3::Y),
            ..Default::default()
        };
        assert!(only_up.orientation().is_err());

        let zero = ArmorConfig {
            up: Some(DVec3::ZERO),
            right: Some(DVec3::X),
            ..Default::default()
        };
        assert!(zero.orientation().is_err());

        let both = ArmorConfig {
            rotation_deg: Some(DVec3::ZERO),
            up: Some(DVec3::Y),
            right: Some(DVec3::X),
        };
        assert!(both.orientation().is_err());
    }

    #[test]
    fn test_degenerate_shot_is_rejected() {
        let yaml = BASIC.replace("start: [0.0, 0.0, -10.0]", "start: [0.0, 0.0, 0.0]");
        let err = ScenarioConfig::from_yaml_str(&yaml).unwrap_err();
        assert!(matches!(err, ScenarioError::ValidationError(msg) if msg.contains("direct")));
    }

    #[test]
    fn test_unordered_shots_are_rejected() {
        let yaml = BASIC.replace("fire_at_s: 2.5", "fire_at_s: -1.0");
        assert!(matches!(
            ScenarioConfig::from_yaml_str(&yaml),
            Err(ScenarioError::ValidationError(_))
        ));
    }

    #[test]
    fn test_negative_thickness_is_rejected() {
        let yaml = BASIC.replace("actual_thickness_mm: 150.0", "actual_thickness_mm: -5.0");
        assert!(ScenarioConfig::from_yaml_str(&yaml).is_err());
    }

    #[test]
    fn test_non_finite_timing_is_rejected() {
        for section in [
            "sim:\n  dt_s: .inf\n",
            "sim:\n  dt_s: 1.0e300\n",
            "sim:\n  dt_s: 1.0e-12\n",
            "playback:\n  speed: .inf\n",
            "playback:\n  arrival_epsilon: .nan\n",
            "playback:\n  hold_s: .inf\n",
        ] {
            let yaml = format!("{}{}", BASIC, section);
            assert!(
                matches!(
                    ScenarioConfig::from_yaml_str(&yaml),
                    Err(ScenarioError::ValidationError(_))
                ),
                "{} が受理された",
                section.trim()
            );
        }
    }

    #[test]
    fn test_non_finite_geometry_is_rejected() {
        let nan_start = BASIC.replace("start: [0.0, 0.0, -10.0]", "start: [.nan, 0.0, -10.0]");
        let err = ScenarioConfig::from_yaml_str(&nan_start).unwrap_err();
        assert!(matches!(err, ScenarioError::ValidationError(msg) if msg.contains("direct")));

        let infinite_rotation =
            BASIC.replace("rotation_deg: [0.0, 0.0, 0.0]", "rotation_deg: [.inf, 0.0, 0.0]");
        assert!(ScenarioConfig::from_yaml_str(&infinite_rotation).is_err());

        let infinite_axis = ArmorConfig {
            rotation_deg: None,
            up: Some(DVec3::new(0.0, f64::INFINITY, 0.0)),
            right: Some(DVec3::X),
        };
        assert!(infinite_axis.orientation().is_err());
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            ScenarioConfig::from_file("scenarios/does_not_exist.yaml"),
            Err(ScenarioError::FileNotFound(_))
        ));
    }

    #[test]
    fn test_malformed_yaml_is_parse_error() {
        assert!(matches!(
            ScenarioConfig::from_yaml_str("meta: [unclosed"),
            Err(ScenarioError::ParseError(_, _))
        ));
    }
}
