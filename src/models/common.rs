use serde::{Deserialize, Serialize};

/// 実装甲厚の初期値（mm）
pub const DEFAULT_ACTUAL_THICKNESS_MM: f64 = 150.0;

/// 弾丸の貫通力の初期値（mm）
pub const DEFAULT_BULLET_PENETRATION_MM: f64 = 200.0;

/// シミュレーションの実行状態
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    /// 待機中（入力の変更を受け付ける）
    Idle,
    /// 実行中（入力の変更は無視される）
    Running,
}

/// 1回のシミュレーション結果
///
/// 実行ごとに1つ生成され、生成後は変更されません。次の実行結果で置き換えられます。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimulationResult {
    /// 貫通したかどうか
    pub penetrated: bool,
    /// 実効装甲厚（mm）
    pub effective_thickness_mm: f64,
    /// 入射角（度）
    pub angle_of_attack_degrees: f64,
}

impl SimulationResult {
    /// 実効装甲厚の表示文字列（例: "1,234.50mm"）
    pub fn effective_thickness_text(&self) -> String {
        format!("{}mm", format_number_2dp(self.effective_thickness_mm))
    }

    /// 入射角の表示文字列（例: "30.00°"）
    pub fn angle_of_attack_text(&self) -> String {
        format!("{}°", format_number_2dp(self.angle_of_attack_degrees))
    }

    /// 弾着後に表示する判定ラベル
    pub fn verdict_label(&self) -> &'static str {
        if self.penetrated { "PENETRATION" } else { "NON-PENETRATION" }
    }

    /// 照準中のプレビューに表示するラベル
    pub fn preview_label(&self) -> &'static str {
        if self.penetrated { "Penetration Possible" } else { "Penetration not Possible." }
    }
}

/// 小数点以下2桁、3桁区切りのカンマ付きで数値を整形
pub fn format_number_2dp(value: f64) -> String {
    let formatted = format!("{:.2}", value.abs());
    let (integer, fraction) = formatted.split_once('.').unwrap_or((formatted.as_str(), "00"));

    let mut grouped = String::with_capacity(integer.len() + integer.len() / 3);
    for (i, digit) in integer.chars().enumerate() {
        if i > 0 && (integer.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    // "-0.00" にはしない
    let sign = if value < 0.0 && formatted.chars().any(|c| c.is_ascii_digit() && c != '0') {
        "-"
    } else {
        ""
    };
    format!("{}{}.{}", sign, grouped, fraction)
}

/// 入力欄の文字列を数値に変換
///
/// ロケールに依存せず、`.` を小数点とする表記のみ受け付けます。
/// 解析できない場合は `None` を返し、呼び出し側は以前の値を保持します。
pub fn parse_millimetres(text: &str) -> Option<f64> {
    let value: f64 = text.trim().parse().ok()?;
    value.is_finite().then_some(value)
}

/// 数学ユーティリティ関数
pub mod math_utils {
    /// 度をラジアンに変換
    pub fn deg_to_rad(degrees: f64) -> f64 {
        degrees * std::f64::consts::PI / 180.0
    }

    /// ラジアンを度に変換
    pub fn rad_to_deg(radians: f64) -> f64 {
        radians * (180.0 / std::f64::consts::PI)
    }
}
