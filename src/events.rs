//! # Events モジュール
//!
//! シミュレーションのライフサイクル通知と、その購読者管理を提供します。
//!
//! 購読はイベントの種類ごとに登録され、登録順に呼び出されます。
//! 購読者がいない種類のイベントを発行しても何も起きません。
//!
//! 購読者のコールバックには発行中のイベントと [`EngineState`] への可変参照が渡されます。
//! 実行中（[`RunState::Running`](crate::models::RunState)）に入力値を変更しようとしても
//! 無視されます。

use std::collections::HashMap;
use std::fmt;

use glam::DVec3;

use crate::models::ProjectileId;
use crate::simulation::EngineState;

/// イベントの種類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// シミュレーション開始
    Start,
    /// 実行中のシミュレーションが中断された
    Stop,
    /// 中断されたシミュレーションの再生を中止する
    PlaybackCancelled,
    /// 判定が終わり、弾丸の再生を開始できる
    PlaybackReady,
    /// 同期処理の終了
    End,
    /// 外部の再生処理が完了した
    PlaybackComplete,
}

/// ライフサイクル通知
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SimulationEvent {
    Start,
    Stop,
    PlaybackCancelled,
    PlaybackReady {
        projectile: ProjectileId,
        start: DVec3,
        end: DVec3,
    },
    End,
    PlaybackComplete {
        projectile: ProjectileId,
        start: DVec3,
        end: DVec3,
    },
}

impl SimulationEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            SimulationEvent::Start => EventKind::Start,
            SimulationEvent::Stop => EventKind::Stop,
            SimulationEvent::PlaybackCancelled => EventKind::PlaybackCancelled,
            SimulationEvent::PlaybackReady { .. } => EventKind::PlaybackReady,
            SimulationEvent::End => EventKind::End,
            SimulationEvent::PlaybackComplete { .. } => EventKind::PlaybackComplete,
        }
    }
}

/// 購読の登録ID（解除に使用）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

/// 購読者のコールバック
pub type Subscriber = Box<dyn FnMut(&SimulationEvent, &mut EngineState)>;

/// イベント種類ごとの購読者リスト
#[derive(Default)]
pub struct NotificationHub {
    next_id: u64,
    subscribers: HashMap<EventKind, Vec<(SubscriberId, Subscriber)>>,
}

impl NotificationHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// 購読を登録
    pub fn subscribe<F>(&mut self, kind: EventKind, callback: F) -> SubscriberId
    where
        F: FnMut(&SimulationEvent, &mut EngineState) + 'static,
    {
        self.next_id += 1;
        let id = SubscriberId(self.next_id);
        self.subscribers
            .entry(kind)
            .or_default()
            .push((id, Box::new(callback)));
        id
    }

    /// 購読を解除（登録されていなかった場合は false）
    pub fn unsubscribe(&mut self, id: SubscriberId) -> bool {
        for list in self.subscribers.values_mut() {
            if let Some(index) = list.iter().position(|(sid, _)| *sid == id) {
                list.remove(index);
                return true;
            }
        }
        false
    }

    /// 指定した種類の購読者数
    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.subscribers.get(&kind).map_or(0, Vec::len)
    }

    /// イベントを登録順に通知
    pub fn emit(&mut self, event: &SimulationEvent, state: &mut EngineState) {
        let Some(list) = self.subscribers.get_mut(&event.kind()) else {
            return;
        };
        for (_, callback) in list.iter_mut() {
            callback(event, state);
        }
    }
}

impl fmt::Debug for NotificationHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: HashMap<EventKind, usize> = self
            .subscribers
            .iter()
            .map(|(kind, list)| (*kind, list.len()))
            .collect();
        f.debug_struct("NotificationHub")
            .field("subscribers", &counts)
            .finish()
    }
}
