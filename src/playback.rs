//! # Playback モジュール
//!
//! 弾丸の飛翔を再生する外部協調処理を提供します。
//!
//! エンジンは判定後に `PlaybackReady` を通知するだけで、アニメーションは行いません。
//! [`PlaybackDriver`] はその通知を購読し、ホストのフレーム更新ごとの `tick(dt)` で
//! 弾丸を進めます。再生は以下の2段階の状態機械です：
//!
//! - **Traveling**: 終点に向かって一定速度で移動。終点との距離が閾値以下で終了
//! - **Holding**: 着弾点を確認させるため一定時間静止。終了時に完了を1度だけ報告
//!
//! `PlaybackCancelled` を受け取ると再生を破棄し、古い実行の完了を報告しません。

use std::cell::RefCell;
use std::rc::Rc;

use glam::DVec3;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::events::{EventKind, SimulationEvent, SubscriberId};
use crate::models::ProjectileId;
use crate::simulation::SimulationEngine;

/// 再生の設定
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackSettings {
    /// 弾丸の移動速度（単位/秒）
    pub speed: f64,
    /// 着弾とみなす終点までの距離
    pub arrival_epsilon: f64,
    /// 着弾後の静止時間（秒）
    pub hold_s: f64,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            speed: 15.0,
            arrival_epsilon: 0.1,
            hold_s: 3.0,
        }
    }
}

/// 再生フェーズ
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlaybackPhase {
    /// 終点へ移動中
    Traveling,
    /// 着弾後の静止中
    Holding { remaining_s: f64 },
    /// 完了済み
    Finished,
}

/// 再生完了の通知内容（エンジンの `complete_playback` に渡す）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackCompletion {
    pub projectile: ProjectileId,
    pub start: DVec3,
    pub end: DVec3,
}

/// 1発分の弾丸再生
#[derive(Debug, Clone)]
pub struct BulletPlayback {
    projectile: ProjectileId,
    start: DVec3,
    end: DVec3,
    position: DVec3,
    phase: PlaybackPhase,
    settings: PlaybackSettings,
}

impl BulletPlayback {
    pub fn new(
        projectile: ProjectileId,
        start: DVec3,
        end: DVec3,
        settings: PlaybackSettings,
    ) -> Self {
        Self {
            projectile,
            start,
            end,
            position: start,
            phase: PlaybackPhase::Traveling,
            settings,
        }
    }

    pub fn projectile(&self) -> ProjectileId {
        self.projectile
    }

    pub fn position(&self) -> DVec3 {
        self.position
    }

    pub fn phase(&self) -> PlaybackPhase {
        self.phase
    }

    /// 弾丸が着弾し、結果を表示してよい状態か
    pub fn animation_completed(&self) -> bool {
        matches!(self.phase, PlaybackPhase::Holding { .. })
    }

    /// 経過時間 `dt` 秒だけ再生を進める
    ///
    /// 静止時間が終わった呼び出しでのみ完了を返します。
    pub fn advance(&mut self, dt: f64) -> Option<PlaybackCompletion> {
        match self.phase {
            PlaybackPhase::Traveling => {
                let direction = (self.end - self.start).normalize_or_zero();
                let step = self.settings.speed * dt;
                let remaining = self.position.distance(self.end);

                // 1ステップで通り過ぎる場合は終点に合わせる
                if step >= remaining {
                    self.position = self.end;
                } else {
                    self.position += direction * step;
                }

                if self.position.distance(self.end) <= self.settings.arrival_epsilon {
                    trace!("弾丸 {} 着弾", self.projectile);
                    self.phase = PlaybackPhase::Holding {
                        remaining_s: self.settings.hold_s,
                    };
                }
                None
            }
            PlaybackPhase::Holding { remaining_s } => {
                let remaining_s = remaining_s - dt;
                if remaining_s > 0.0 {
                    self.phase = PlaybackPhase::Holding { remaining_s };
                    return None;
                }
                self.phase = PlaybackPhase::Finished;
                Some(PlaybackCompletion {
                    projectile: self.projectile,
                    start: self.start,
                    end: self.end,
                })
            }
            PlaybackPhase::Finished => None,
        }
    }
}

#[derive(Debug)]
struct DriverShared {
    settings: PlaybackSettings,
    active: Option<BulletPlayback>,
    started: u64,
    cancelled: u64,
}

/// エンジンの通知を購読して弾丸再生を駆動する協調処理
#[derive(Debug)]
pub struct PlaybackDriver {
    shared: Rc<RefCell<DriverShared>>,
    subscriptions: Vec<SubscriberId>,
}

impl PlaybackDriver {
    /// エンジンに購読を登録して作成
    pub fn attach(engine: &mut SimulationEngine, settings: PlaybackSettings) -> Self {
        let shared = Rc::new(RefCell::new(DriverShared {
            settings,
            active: None,
            started: 0,
            cancelled: 0,
        }));

        let on_ready = Rc::clone(&shared);
        let ready = engine.subscribe(EventKind::PlaybackReady, move |event, _| {
            if let SimulationEvent::PlaybackReady { projectile, start, end } = *event {
                let mut shared = on_ready.borrow_mut();
                let settings = shared.settings;
                shared.active = Some(BulletPlayback::new(projectile, start, end, settings));
                shared.started += 1;
                debug!("弾丸 {} の再生開始", projectile);
            }
        });

        let on_cancel = Rc::clone(&shared);
        let cancelled = engine.subscribe(EventKind::PlaybackCancelled, move |_, _| {
            let mut shared = on_cancel.borrow_mut();
            if let Some(playback) = shared.active.take() {
                shared.cancelled += 1;
                debug!("弾丸 {} の再生を中止", playback.projectile());
            }
        });

        Self {
            shared,
            subscriptions: vec![ready, cancelled],
        }
    }

    /// エンジンから購読を解除
    pub fn detach(self, engine: &mut SimulationEngine) {
        for id in self.subscriptions {
            engine.unsubscribe(id);
        }
    }

    /// 再生を `dt` 秒進め、完了した場合はその内容を返す
    pub fn tick(&mut self, dt: f64) -> Option<PlaybackCompletion> {
        let mut shared = self.shared.borrow_mut();
        let completion = shared.active.as_mut()?.advance(dt);
        if completion.is_some() {
            shared.active = None;
        }
        completion
    }

    /// 再生を進め、完了したらエンジンへ完了を通知する
    pub fn update(&mut self, engine: &mut SimulationEngine, dt: f64) -> Option<PlaybackCompletion> {
        let completion = self.tick(dt)?;
        engine.complete_playback(completion.projectile, completion.start, completion.end);
        Some(completion)
    }

    pub fn is_active(&self) -> bool {
        self.shared.borrow().active.is_some()
    }

    pub fn animation_completed(&self) -> bool {
        self.shared
            .borrow()
            .active
            .as_ref()
            .is_some_and(BulletPlayback::animation_completed)
    }

    /// 再生中の弾丸の位置
    pub fn projectile_position(&self) -> Option<DVec3> {
        self.shared.borrow().active.as_ref().map(BulletPlayback::position)
    }

    pub fn started_count(&self) -> u64 {
        self.shared.borrow().started
    }

    pub fn cancelled_count(&self) -> u64 {
        self.shared.borrow().cancelled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ArmorPlate, Orientation, ProjectileRegistry, Trajectory};
    use assert_approx_eq::assert_approx_eq;

    fn engine() -> SimulationEngine {
        let mut engine = SimulationEngine::new(Box::new(ProjectileRegistry::new()));
        engine.bind_armor_plate(ArmorPlate::new(Orientation::identity()));
        engine
    }

    #[test]
    fn test_playback_travels_holds_then_completes_once() {
        let settings = PlaybackSettings::default();
        let end = DVec3::new(0.0, 0.0, 3.0);
        let mut playback = BulletPlayback::new(ProjectileId(1), DVec3::ZERO, end, settings);

        // 15単位/秒 × 0.1秒 = 1.5単位
        assert!(playback.advance(0.1).is_none());
        assert_approx_eq!(playback.position().z, 1.5);
        assert_eq!(playback.phase(), PlaybackPhase::Traveling);
        assert!(!playback.animation_completed());

        assert!(playback.advance(0.1).is_none());
        assert!(playback.animation_completed());

        // 3秒間静止
        for _ in 0..29 {
            assert!(playback.advance(0.1).is_none());
        }
        let completion = playback.advance(0.2).expect("静止時間の終了で完了する");
        assert_eq!(completion.projectile, ProjectileId(1));
        assert_eq!(completion.end, end);
        assert_eq!(playback.phase(), PlaybackPhase::Finished);
        assert!(playback.advance(1.0).is_none());
    }

    #[test]
    fn test_playback_snaps_instead_of_overshooting() {
        let end = DVec3::new(0.0, 0.0, 1.0);
        let mut playback =
            BulletPlayback::new(ProjectileId(1), DVec3::ZERO, end, PlaybackSettings::default());
        playback.advance(1.0);
        assert_eq!(playback.position(), end);
        assert!(playback.animation_completed());
    }

    #[test]
    fn test_driver_completes_run_through_engine() {
        let mut engine = engine();
        let settings = PlaybackSettings { hold_s: 0.5, ..Default::default() };
        let mut driver = PlaybackDriver::attach(&mut engine, settings);

        let shot = Trajectory::new(DVec3::new(0.0, 0.0, -3.0), DVec3::ZERO);
        engine.start_simulation(&shot).unwrap();
        assert!(driver.is_active());
        assert_eq!(driver.projectile_position(), Some(shot.start));

        let mut completions = 0;
        for _ in 0..20 {
            if driver.update(&mut engine, 0.1).is_some() {
                completions += 1;
            }
        }

        assert_eq!(completions, 1);
        assert!(!driver.is_active());
        assert!(!engine.is_playback_pending());
        assert_eq!(driver.started_count(), 1);
    }

    #[test]
    fn test_driver_drops_cancelled_playback() {
        let mut engine = engine();
        let mut driver = PlaybackDriver::attach(&mut engine, PlaybackSettings::default());

        let first = Trajectory::new(DVec3::new(0.0, 0.0, -30.0), DVec3::ZERO);
        engine.start_simulation(&first).unwrap();
        driver.tick(0.1);

        let second = Trajectory::new(DVec3::new(0.0, 0.0, -3.0), DVec3::ZERO);
        engine.start_simulation(&second).unwrap();

        assert_eq!(driver.cancelled_count(), 1);
        assert_eq!(driver.started_count(), 2);
        // 新しい再生は2発目の始点から
        assert_eq!(driver.projectile_position(), Some(second.start));
    }

    #[test]
    fn test_detached_driver_ignores_new_runs() {
        let mut engine = engine();
        let driver = PlaybackDriver::attach(&mut engine, PlaybackSettings::default());
        let probe = PlaybackDriver::attach(&mut engine, PlaybackSettings::default());
        driver.detach(&mut engine);

        engine
            .start_simulation(&Trajectory::new(DVec3::new(0.0, 0.0, -3.0), DVec3::ZERO))
            .unwrap();
        assert_eq!(probe.started_count(), 1);
        assert_eq!(engine.run_count(), 1);
    }
}
