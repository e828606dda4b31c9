//! # armorsim
//!
//! 平板装甲に対する弾丸の貫通判定と、そのシミュレーション実行のライフサイクルを扱うクレートです。
//!
//! - [`geometry`]: 実効装甲厚・入射角の幾何計算
//! - [`simulation`]: 実行状態機械と通知を管理するシミュレーションエンジン
//! - [`events`]: ライフサイクル通知と購読者管理
//! - [`playback`]: 弾丸飛翔の再生（外部協調処理）
//! - [`scenario`] / [`runner`]: YAMLシナリオの読み込みと実行ホスト
//! - [`logging`]: tracing によるログ初期化

pub mod events;
pub mod geometry;
pub mod logging;
pub mod models;
pub mod playback;
pub mod runner;
pub mod scenario;
pub mod simulation;
