//! # Runner モジュール
//!
//! シナリオを固定時間刻みで進めるホストループを提供します。
//!
//! 各ステップでは以下の順序で処理します：
//!
//! 1. **射撃処理**: 発射時刻に達した射撃を順に開始（個別設定は待機中に適用）
//! 2. **再生処理**: 弾丸再生を dt 秒進める
//! 3. **完了処理**: 再生が完了したらエンジンへ完了を通知
//!
//! すべての射撃が終わり再生も完了した時点、またはステップ上限で終了します。
//! `run_paced` は同じ処理を実時間の dt 間隔で行います。

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use tracing::{debug, info, trace, warn};

use crate::models::{
    ArmorPlate, IProjectileHost, ProjectileId, ProjectileRegistry, SimulationResult,
};
use crate::playback::PlaybackDriver;
use crate::scenario::{ScenarioConfig, ScenarioError};
use crate::simulation::SimulationEngine;

/// 発射時刻の比較に使う許容誤差（秒）
const FIRE_TIME_TOLERANCE_S: f64 = 1e-9;

/// 射撃1回分の結果
#[derive(Debug, Clone, PartialEq)]
pub struct ShotReport {
    pub id: String,
    pub fired_at_s: Option<f64>,
    pub result: Option<SimulationResult>,
    pub error: Option<String>,
    /// 再生完了前に次の射撃で置き換えられた
    pub superseded: bool,
    /// 再生が完了した時刻
    pub completed_at_s: Option<f64>,
}

impl ShotReport {
    fn pending(id: &str) -> Self {
        Self {
            id: id.to_string(),
            fired_at_s: None,
            result: None,
            error: None,
            superseded: false,
            completed_at_s: None,
        }
    }
}

/// シナリオ実行結果
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub shots: Vec<ShotReport>,
    pub steps: u64,
    pub elapsed_s: f64,
    /// 実行終了時に残っていた弾丸エンティティ数
    pub live_projectiles: usize,
}

impl RunReport {
    pub fn penetration_count(&self) -> usize {
        self.shots
            .iter()
            .filter(|s| s.result.is_some_and(|r| r.penetrated))
            .count()
    }

    /// 結果を表示
    pub fn print_summary(&self) {
        println!("=== 射撃結果 ===");
        for shot in &self.shots {
            match (&shot.result, &shot.error) {
                (Some(result), _) => {
                    let status = if shot.superseded {
                        " [中断]"
                    } else if shot.completed_at_s.is_none() {
                        " [再生未完了]"
                    } else {
                        ""
                    };
                    println!(
                        "  {}: {:<15} 実効装甲厚 {:>12}  入射角 {:>8}{}",
                        shot.id,
                        result.verdict_label(),
                        result.effective_thickness_text(),
                        result.angle_of_attack_text(),
                        status
                    );
                }
                (None, Some(error)) => println!("  {}: エラー ({})", shot.id, error),
                (None, None) => println!("  {}: 未発射", shot.id),
            }
        }
        println!();
        println!(
            "貫通: {}/{}発  経過時間: {:.2}秒  ステップ数: {}",
            self.penetration_count(),
            self.shots.len(),
            self.elapsed_s,
            self.steps
        );
    }
}

/// シナリオ実行ホスト
pub struct ScenarioRunner {
    pub current_time: f64,
    pub dt: f64,
    pub max_steps: u64,
    pub step_count: u64,

    engine: SimulationEngine,
    driver: PlaybackDriver,
    registry: Rc<RefCell<ProjectileRegistry>>,

    scenario_config: ScenarioConfig,
    next_shot: usize,
    reports: Vec<ShotReport>,
    /// 再生中の射撃（レポートの添字と弾丸）
    playing: Option<(usize, ProjectileId)>,
    pub verbose_level: u8,
}

impl ScenarioRunner {
    pub fn new(scenario: ScenarioConfig, verbose_level: u8) -> Result<Self, ScenarioError> {
        let orientation = scenario.armor.orientation()?;

        let registry = Rc::new(RefCell::new(ProjectileRegistry::new()));
        let mut engine = SimulationEngine::new(Box::new(Rc::clone(&registry)));
        engine.set_actual_thickness(scenario.engine.actual_thickness_mm);
        engine.set_bullet_penetration(scenario.engine.bullet_penetration_mm);
        engine.bind_armor_plate(ArmorPlate::new(orientation));

        let driver = PlaybackDriver::attach(&mut engine, scenario.playback);
        let reports = scenario.shots.iter().map(|s| ShotReport::pending(&s.id)).collect();

        Ok(Self {
            current_time: 0.0,
            dt: scenario.sim.dt_s,
            max_steps: scenario.sim.max_steps,
            step_count: 0,
            engine,
            driver,
            registry,
            scenario_config: scenario,
            next_shot: 0,
            reports,
            playing: None,
            verbose_level,
        })
    }

    pub fn engine(&self) -> &SimulationEngine {
        &self.engine
    }

    pub fn reports(&self) -> &[ShotReport] {
        &self.reports
    }

    /// すべての射撃が終わり、再生も完了したか
    pub fn is_finished(&self) -> bool {
        self.next_shot >= self.scenario_config.shots.len() && !self.driver.is_active()
    }

    /// シナリオを最後まで実行
    pub fn run(&mut self) -> RunReport {
        info!("=== シナリオ実行開始: {} ===", self.scenario_config.meta.name);

        while !self.is_finished() && self.step_count < self.max_steps {
            self.step();
            self.log_progress();
        }

        self.finish()
    }

    /// 実時間の dt 間隔でシナリオを実行
    ///
    /// dt が時間間隔として表せない場合（負・無限大・NaN・桁あふれ）はエラーを返します。
    pub async fn run_paced(&mut self) -> Result<RunReport, ScenarioError> {
        let period = Duration::try_from_secs_f64(self.dt)
            .ok()
            .filter(|period| !period.is_zero())
            .ok_or_else(|| {
                ScenarioError::ValidationError(format!("dt {} is not a usable interval", self.dt))
            })?;

        info!("=== シナリオ実行開始（実時間）: {} ===", self.scenario_config.meta.name);

        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        while !self.is_finished() && self.step_count < self.max_steps {
            interval.tick().await;
            self.step();
            self.log_progress();
        }

        Ok(self.finish())
    }

    /// 1ステップ進める
    pub fn step(&mut self) {
        self.process_shots();
        self.process_playback();

        self.current_time += self.dt;
        self.step_count += 1;
    }

    fn process_shots(&mut self) {
        while let Some(shot) = self.scenario_config.shots.get(self.next_shot) {
            if shot.fire_at_s > self.current_time + FIRE_TIME_TOLERANCE_S {
                break;
            }
            let index = self.next_shot;
            self.next_shot += 1;

            if let Some(mm) = shot.actual_thickness_mm {
                self.engine.set_actual_thickness(mm);
            }
            if let Some(mm) = shot.bullet_penetration_mm {
                self.engine.set_bullet_penetration(mm);
            }

            let trajectory = shot.trajectory();
            let report = &mut self.reports[index];
            report.fired_at_s = Some(self.current_time);

            match self.engine.start_simulation(&trajectory) {
                Ok(result) => {
                    report.result = Some(result);
                    if let Some((previous, _)) = self.playing.take() {
                        self.reports[previous].superseded = true;
                        debug!(
                            "射撃 {} は {} に置き換えられました",
                            self.reports[previous].id, self.reports[index].id
                        );
                    }
                    self.playing = self.engine.active_projectile().map(|p| (index, p));
                }
                Err(e) => {
                    warn!("射撃 {} を実行できません: {}", report.id, e);
                    report.error = Some(e.to_string());
                }
            }
        }
    }

    fn process_playback(&mut self) {
        let Some(completion) = self.driver.update(&mut self.engine, self.dt) else {
            return;
        };

        match self.playing {
            Some((index, projectile)) if projectile == completion.projectile => {
                self.reports[index].completed_at_s = Some(self.current_time + self.dt);
                self.playing = None;
                if self.verbose_level > 0 {
                    info!(
                        "射撃 {} の再生完了 ({:.2}秒)",
                        self.reports[index].id,
                        self.current_time + self.dt
                    );
                }
            }
            _ => warn!("対応する射撃のない再生完了: {}", completion.projectile),
        }
    }

    fn log_progress(&self) {
        if self.verbose_level > 2 {
            trace!("時刻: {:.3}秒 (ステップ: {})", self.current_time, self.step_count);
        }
        if self.step_count % 100 == 0 && self.verbose_level > 1 {
            debug!(
                "進行状況: 射撃 {}/{} 発, 時刻 {:.2}秒",
                self.next_shot,
                self.scenario_config.shots.len(),
                self.current_time
            );
        }
    }

    fn finish(&mut self) -> RunReport {
        if !self.is_finished() {
            warn!("ステップ上限 ({}) に達したため終了します", self.max_steps);
        }

        let live_projectiles = self.registry.live_count();
        info!("=== シナリオ実行完了 ===");
        info!("経過時間: {:.2}秒", self.current_time);
        info!("総ステップ数: {}", self.step_count);

        RunReport {
            shots: self.reports.clone(),
            steps: self.step_count,
            elapsed_s: self.current_time,
            live_projectiles,
        }
    }
}
