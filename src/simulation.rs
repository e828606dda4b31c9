//! # Simulation モジュール
//!
//! 装甲貫通シミュレーションの中核となるシミュレーションエンジンを提供します。
//!
//! エンジンは1回の実行（シミュレーション）のライフサイクルを管理する唯一の状態機械です。
//! 同時に `Running` になれる実行は1つだけで、新しい実行の要求は実行中・再生中の
//! 実行を中断して置き換えます（キューイングや拒否はしません）。
//!
//! ## 実行の処理順序
//!
//! [`SimulationEngine::start_simulation`] は以下を同期的に実行します：
//!
//! 1. **中断処理**: 未完了の実行があれば `Stop` → `PlaybackCancelled` を通知し、弾丸を破棄
//! 2. **開始**: `Start` を通知して `Running` に遷移
//! 3. **弾丸生成**: 始点に、終点を向いた弾丸エンティティを生成
//! 4. **貫通判定**: 装甲の `up` 軸と `right` 軸の両方で判定し、結果を保存
//! 5. **再生の受け渡し**: `PlaybackReady` を通知（アニメーションは外部が担当）
//! 6. **終了**: `Idle` に遷移して `End` を通知
//!
//! 再生の完了は外部から [`SimulationEngine::complete_playback`] で通知され、
//! 既定の処理として弾丸エンティティを破棄します。
//!
//! ## 使用例
//!
//! ```rust
//! use armorsim::models::{ArmorPlate, Orientation, ProjectileRegistry, Trajectory};
//! use armorsim::simulation::SimulationEngine;
//! use glam::DVec3;
//!
//! let mut engine = SimulationEngine::new(Box::new(ProjectileRegistry::new()));
//! engine.bind_armor_plate(ArmorPlate::new(Orientation::identity()));
//!
//! let shot = Trajectory::new(DVec3::new(0.0, 0.0, -10.0), DVec3::ZERO);
//! let result = engine.start_simulation(&shot).unwrap();
//! assert!(result.penetrated);
//! assert_eq!(engine.effective_thickness_text().as_deref(), Some("150.00mm"));
//! ```

use glam::DVec3;
use thiserror::Error;
use tracing::{debug, info, trace, warn};

use crate::events::{EventKind, NotificationHub, SimulationEvent, SubscriberId};
use crate::geometry::{self, GeometryError};
use crate::models::{
    ArmorPlate, IProjectileHost, ProjectileId, RunState, SimulationResult, Trajectory,
    DEFAULT_ACTUAL_THICKNESS_MM, DEFAULT_BULLET_PENETRATION_MM, look_rotation, parse_millimetres,
};

/// シミュレーションエラー
#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum SimulationError {
    /// 必要な外部バインディングが設定されていない
    #[error("設定エラー: {0}が設定されていません")]
    Configuration(&'static str),
    /// 退化した入力（評価を拒否）
    #[error("入力エラー: {0}")]
    DegenerateInput(#[from] GeometryError),
}

/// エンジンの可変状態
///
/// 購読者のコールバックにもこの型の可変参照が渡されます。
/// 入力値（実装甲厚・貫通力）の変更は `Running` の間は黙って無視されます。
#[derive(Debug, Clone)]
pub struct EngineState {
    actual_thickness_mm: f64,
    bullet_penetration_mm: f64,
    run_state: RunState,
    armor: Option<ArmorPlate>,
    last_result: Option<SimulationResult>,
}

impl Default for EngineState {
    fn default() -> Self {
        Self {
            actual_thickness_mm: DEFAULT_ACTUAL_THICKNESS_MM,
            bullet_penetration_mm: DEFAULT_BULLET_PENETRATION_MM,
            run_state: RunState::Idle,
            armor: None,
            last_result: None,
        }
    }
}

impl EngineState {
    pub fn run_state(&self) -> RunState {
        self.run_state
    }

    pub fn is_running(&self) -> bool {
        self.run_state == RunState::Running
    }

    pub fn actual_thickness_mm(&self) -> f64 {
        self.actual_thickness_mm
    }

    pub fn bullet_penetration_mm(&self) -> f64 {
        self.bullet_penetration_mm
    }

    pub fn armor_plate(&self) -> Option<&ArmorPlate> {
        self.armor.as_ref()
    }

    /// 直近の実行結果（`Running` 中に読むべきではない）
    pub fn last_result(&self) -> Option<SimulationResult> {
        self.last_result
    }

    /// 直近の実行で貫通したか（未実行なら false）
    pub fn penetrated(&self) -> bool {
        self.last_result.is_some_and(|r| r.penetrated)
    }

    pub fn effective_thickness_text(&self) -> Option<String> {
        self.last_result.map(|r| r.effective_thickness_text())
    }

    pub fn angle_of_attack_text(&self) -> Option<String> {
        self.last_result.map(|r| r.angle_of_attack_text())
    }

    /// 実装甲厚を変更し、適用後の値を返す
    ///
    /// `Running` の間は変更せず、以前の値を返します。
    pub fn set_actual_thickness(&mut self, mm: f64) -> f64 {
        if self.is_running() {
            debug!("実行中のため実装甲厚の変更を無視: {:.2}mm", mm);
            return self.actual_thickness_mm;
        }
        if !mm.is_finite() {
            warn!("無効な実装甲厚を無視: {}", mm);
            return self.actual_thickness_mm;
        }

        self.actual_thickness_mm = mm;
        if let Some(armor) = self.armor.as_mut() {
            armor.sync_thickness(mm);
        }
        self.actual_thickness_mm
    }

    /// 弾丸の貫通力を変更し、適用後の値を返す
    ///
    /// `Running` の間は変更せず、以前の値を返します。
    pub fn set_bullet_penetration(&mut self, mm: f64) -> f64 {
        if self.is_running() {
            debug!("実行中のため貫通力の変更を無視: {:.2}mm", mm);
            return self.bullet_penetration_mm;
        }
        if !mm.is_finite() {
            warn!("無効な貫通力を無視: {}", mm);
            return self.bullet_penetration_mm;
        }

        self.bullet_penetration_mm = mm;
        self.bullet_penetration_mm
    }

    /// 入力欄の文字列から実装甲厚を変更（解析できなければ以前の値のまま）
    pub fn set_actual_thickness_text(&mut self, text: &str) -> f64 {
        match parse_millimetres(text) {
            Some(mm) => self.set_actual_thickness(mm),
            None => self.actual_thickness_mm,
        }
    }

    /// 入力欄の文字列から貫通力を変更（解析できなければ以前の値のまま）
    pub fn set_bullet_penetration_text(&mut self, text: &str) -> f64 {
        match parse_millimetres(text) {
            Some(mm) => self.set_bullet_penetration(mm),
            None => self.bullet_penetration_mm,
        }
    }

    /// 現在の設定で弾道の貫通判定を行う（状態は変更しない）
    ///
    /// 装甲の `up` 軸と `right` 軸の両方を法線候補とし、実効装甲厚・入射角とも
    /// 大きい方を採用します。貫通力が実効装甲厚を厳密に上回った場合のみ貫通です。
    pub fn evaluate(&self, trajectory: &Trajectory) -> Result<SimulationResult, SimulationError> {
        let armor = self
            .armor
            .as_ref()
            .ok_or(SimulationError::Configuration("装甲板"))?;
        let orientation = armor.orientation();
        let direction = trajectory.direction()?;

        // 片方の軸だけでは水平方向の傾きを取りこぼすため両方で判定する
        let thickness = self.actual_thickness_mm;
        let vertical = geometry::effective_thickness(direction, orientation.up, thickness)?;
        let horizontal = geometry::effective_thickness(direction, orientation.right, thickness)?;
        let effective_thickness_mm = vertical.max(horizontal);

        let aoa_vertical = geometry::angle_of_attack_degrees(direction, orientation.up)?;
        let aoa_horizontal = geometry::angle_of_attack_degrees(direction, orientation.right)?;
        let angle_of_attack_degrees = aoa_vertical.max(aoa_horizontal);

        let result = SimulationResult {
            penetrated: self.bullet_penetration_mm > effective_thickness_mm,
            effective_thickness_mm,
            angle_of_attack_degrees,
        };

        trace!(
            "貫通判定: 垂直 {:.2}mm / 水平 {:.2}mm → 実効 {:.2}mm, 入射角 {:.2}度, 貫通力 {:.2}mm",
            vertical,
            horizontal,
            effective_thickness_mm,
            angle_of_attack_degrees,
            self.bullet_penetration_mm
        );

        Ok(result)
    }
}

/// 再生が受け渡され、まだ完了していない実行
#[derive(Debug, Clone, Copy)]
struct InFlightRun {
    projectile: ProjectileId,
    trajectory: Trajectory,
}

/// 装甲貫通シミュレーションエンジン
///
/// ホストが1つ生成し、参照で各処理に渡して使います。
pub struct SimulationEngine {
    state: EngineState,
    hub: NotificationHub,
    host: Box<dyn IProjectileHost>,
    in_flight: Option<InFlightRun>,
    run_count: u64,
}

impl SimulationEngine {
    /// 既定値（実装甲厚 150mm、貫通力 200mm）でエンジンを作成
    ///
    /// 装甲板は [`bind_armor_plate`](Self::bind_armor_plate) で別途設定が必要です。
    pub fn new(host: Box<dyn IProjectileHost>) -> Self {
        Self {
            state: EngineState::default(),
            hub: NotificationHub::new(),
            host,
            in_flight: None,
            run_count: 0,
        }
    }

    /// 装甲板を設定し、表示上の厚さを現在の実装甲厚に合わせる
    pub fn bind_armor_plate(&mut self, mut plate: ArmorPlate) {
        plate.sync_thickness(self.state.actual_thickness_mm);
        info!(
            "装甲板を設定: up=({:.3}, {:.3}, {:.3}) right=({:.3}, {:.3}, {:.3}) 奥行き {:.2}",
            plate.orientation().up.x,
            plate.orientation().up.y,
            plate.orientation().up.z,
            plate.orientation().right.x,
            plate.orientation().right.y,
            plate.orientation().right.z,
            plate.depth_scale()
        );
        self.state.armor = Some(plate);
    }

    pub fn state(&self) -> &EngineState {
        &self.state
    }

    pub fn run_state(&self) -> RunState {
        self.state.run_state()
    }

    pub fn armor_plate(&self) -> Option<&ArmorPlate> {
        self.state.armor_plate()
    }

    pub fn actual_thickness_mm(&self) -> f64 {
        self.state.actual_thickness_mm()
    }

    pub fn bullet_penetration_mm(&self) -> f64 {
        self.state.bullet_penetration_mm()
    }

    pub fn set_actual_thickness(&mut self, mm: f64) -> f64 {
        self.state.set_actual_thickness(mm)
    }

    pub fn set_bullet_penetration(&mut self, mm: f64) -> f64 {
        self.state.set_bullet_penetration(mm)
    }

    pub fn set_actual_thickness_text(&mut self, text: &str) -> f64 {
        self.state.set_actual_thickness_text(text)
    }

    pub fn set_bullet_penetration_text(&mut self, text: &str) -> f64 {
        self.state.set_bullet_penetration_text(text)
    }

    pub fn last_result(&self) -> Option<SimulationResult> {
        self.state.last_result()
    }

    pub fn penetrated(&self) -> bool {
        self.state.penetrated()
    }

    pub fn effective_thickness_text(&self) -> Option<String> {
        self.state.effective_thickness_text()
    }

    pub fn angle_of_attack_text(&self) -> Option<String> {
        self.state.angle_of_attack_text()
    }

    /// 再生中（未完了）の弾丸エンティティ
    pub fn active_projectile(&self) -> Option<ProjectileId> {
        self.in_flight.map(|run| run.projectile)
    }

    pub fn is_playback_pending(&self) -> bool {
        self.in_flight.is_some()
    }

    /// これまでに開始した実行の数
    pub fn run_count(&self) -> u64 {
        self.run_count
    }

    pub fn subscribe<F>(&mut self, kind: EventKind, callback: F) -> SubscriberId
    where
        F: FnMut(&SimulationEvent, &mut EngineState) + 'static,
    {
        self.hub.subscribe(kind, callback)
    }

    pub fn unsubscribe(&mut self, id: SubscriberId) -> bool {
        self.hub.unsubscribe(id)
    }

    /// 照準中のプレビュー用の貫通判定（結果は保存せず、通知もしない）
    pub fn determine_penetration(
        &self,
        trajectory: &Trajectory,
    ) -> Result<SimulationResult, SimulationError> {
        self.state.evaluate(trajectory)
    }

    fn emit(&mut self, event: SimulationEvent) {
        trace!("通知: {:?}", event.kind());
        self.hub.emit(&event, &mut self.state);
    }

    /// 装甲貫通シミュレーションを開始
    ///
    /// 装甲板が未設定の場合や弾道が退化している場合は、何も通知せずにエラーを返し、
    /// 未完了の実行もそのまま残します。
    pub fn start_simulation(
        &mut self,
        trajectory: &Trajectory,
    ) -> Result<SimulationResult, SimulationError> {
        // 通知を始める前に入力を検証する
        self.state.evaluate(trajectory)?;

        if self.state.is_running() || self.in_flight.is_some() {
            self.interrupt();
        }

        self.emit(SimulationEvent::Start);
        self.state.run_state = RunState::Running;
        self.run_count += 1;
        info!("シミュレーション開始 (#{})", self.run_count);

        let rotation = look_rotation(trajectory.end - trajectory.start, DVec3::Y);
        let projectile = self.host.spawn(trajectory.start, rotation);

        // Start の購読者は Idle のうちに入力を変更できるため、ここで改めて評価する
        let result = match self.state.evaluate(trajectory) {
            Ok(result) => result,
            Err(e) => {
                self.host.despawn(projectile);
                self.state.run_state = RunState::Idle;
                return Err(e);
            }
        };
        self.state.last_result = Some(result);

        info!(
            "判定結果: {} (実効装甲厚 {}, 入射角 {}, 貫通力 {:.2}mm)",
            result.verdict_label(),
            result.effective_thickness_text(),
            result.angle_of_attack_text(),
            self.state.bullet_penetration_mm
        );

        self.in_flight = Some(InFlightRun {
            projectile,
            trajectory: *trajectory,
        });
        self.emit(SimulationEvent::PlaybackReady {
            projectile,
            start: trajectory.start,
            end: trajectory.end,
        });

        self.state.run_state = RunState::Idle;
        self.emit(SimulationEvent::End);
        debug!("シミュレーション同期処理終了 (#{})", self.run_count);

        Ok(result)
    }

    /// 未完了の実行を中断し、その弾丸を破棄する
    fn interrupt(&mut self) {
        info!("未完了のシミュレーションを中断");
        self.emit(SimulationEvent::Stop);
        self.emit(SimulationEvent::PlaybackCancelled);

        if let Some(run) = self.in_flight.take() {
            if !self.host.despawn(run.projectile) {
                warn!("中断した弾丸 {} は既に破棄されています", run.projectile);
            }
        }

        self.state.run_state = RunState::Idle;
    }

    /// 外部の再生処理からの完了通知
    ///
    /// 現在の実行の弾丸であれば破棄してから購読者に `PlaybackComplete` を通知し、true を返します。
    /// 既に置き換えられた実行の完了通知は無視します。
    pub fn complete_playback(
        &mut self,
        projectile: ProjectileId,
        start: DVec3,
        end: DVec3,
    ) -> bool {
        let current = match self.in_flight {
            Some(run) if run.projectile == projectile => run,
            _ => {
                warn!("古い再生の完了通知を無視: {}", projectile);
                return false;
            }
        };

        self.in_flight = None;
        self.host.despawn(current.projectile);
        debug!(
            "再生完了: {} (弾道長 {:.2})",
            projectile,
            current.trajectory.length()
        );

        self.emit(SimulationEvent::PlaybackComplete { projectile, start, end });
        true
    }
}
