use armorsim::logging::{LogConfig, LogOutput, init_logging, level_for_verbosity, parse_log_level};
use armorsim::models::{ArmorPlate, Orientation, ProjectileRegistry, Trajectory};
use armorsim::runner::ScenarioRunner;
use armorsim::scenario::ScenarioConfig;
use armorsim::simulation::SimulationEngine;
use clap::{Arg, Command};
use glam::DVec3;
use tracing::error;

fn main() {
    let matches = Command::new("armorsim")
        .version("0.1.0")
        .about("装甲貫通シミュレーション (Armour Penetration Simulation)")
        .long_about("平板装甲に対する弾丸の貫通判定シミュレーター\n\
                     装甲の傾きから実効装甲厚と入射角を求め、貫通の可否を判定します。")
        .arg(
            Arg::new("scenario")
                .short('s')
                .long("scenario")
                .value_name("FILE")
                .help("シナリオファイル(.yaml)のパスを指定")
        )
        .arg(
            Arg::new("info")
                .short('i')
                .long("info")
                .action(clap::ArgAction::SetTrue)
                .help("シナリオの情報のみ表示して終了")
                .conflicts_with("preview")
        )
        .arg(
            Arg::new("preview")
                .short('p')
                .long("preview")
                .action(clap::ArgAction::SetTrue)
                .help("各射撃の貫通判定のみ表示（再生は行わない）")
        )
        .arg(
            Arg::new("paced")
                .long("paced")
                .action(clap::ArgAction::SetTrue)
                .help("時間刻みを実時間に合わせて実行")
        )
        .arg(
            Arg::new("demo")
                .short('d')
                .long("demo")
                .action(clap::ArgAction::SetTrue)
                .help("基準ケース（正面・60度傾斜）の判定を表示")
                .conflicts_with("scenario")
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(clap::ArgAction::Count)
                .help("詳細出力レベル (-v: 基本, -vv: 詳細, -vvv: デバッグ)")
        )
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .value_name("LEVEL")
                .default_value("warn")
                .help("ログレベル (trace, debug, info, warn, error)")
        )
        .arg(
            Arg::new("log-output")
                .long("log-output")
                .value_name("TARGET")
                .default_value("console")
                .value_parser(|s: &str| s.parse::<LogOutput>())
                .help("ログ出力先 (console, file, both)")
        )
        .get_matches();

    let verbose_level = matches.get_count("verbose");
    let requested_level = parse_log_level(
        matches.get_one::<String>("log-level").map(String::as_str).unwrap_or("warn"),
    );
    let log_config = LogConfig {
        level: level_for_verbosity(requested_level, verbose_level),
        output: matches.get_one::<LogOutput>("log-output").copied().unwrap_or(LogOutput::Console),
        ..LogConfig::default()
    };

    // ガードはプログラム終了まで保持する
    let _log_guard = match init_logging(log_config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("警告: ログ初期化に失敗しました: {}", e);
            None
        }
    };

    println!("装甲貫通シミュレーション (Armour Penetration Simulation) - armorsim v0.1.0");
    println!();

    if matches.get_flag("demo") {
        if let Err(e) = run_demo() {
            error!("デモ実行エラー: {}", e);
            eprintln!("エラー: {}", e);
            std::process::exit(1);
        }
        return;
    }

    if let Some(scenario_path) = matches.get_one::<String>("scenario") {
        let mode = if matches.get_flag("info") {
            Mode::Info
        } else if matches.get_flag("preview") {
            Mode::Preview
        } else if matches.get_flag("paced") {
            Mode::Paced
        } else {
            Mode::Run
        };

        match run_scenario(scenario_path, mode, verbose_level) {
            Ok(_) => {
                if verbose_level > 0 {
                    println!("シナリオ実行が正常に完了しました。");
                }
            }
            Err(e) => {
                error!("シナリオ実行エラー: {}", e);
                eprintln!("エラー: {}", e);
                std::process::exit(1);
            }
        }
    } else {
        show_default_help();
        println!();
        if let Err(e) = run_demo() {
            error!("デモ実行エラー: {}", e);
            eprintln!("エラー: {}", e);
            std::process::exit(1);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Mode {
    Info,
    Preview,
    Run,
    Paced,
}

/// シナリオファイルを読み込んで実行
fn run_scenario(
    scenario_path: &str,
    mode: Mode,
    verbose_level: u8,
) -> Result<(), Box<dyn std::error::Error>> {
    let scenario = ScenarioConfig::from_file(scenario_path)?;

    if verbose_level > 0 {
        println!("シナリオファイル読み込み完了: {}", scenario_path);
    }

    scenario.print_summary();
    println!();

    match mode {
        Mode::Info => Ok(()),
        Mode::Preview => preview_scenario(&scenario),
        Mode::Run => {
            let mut runner = ScenarioRunner::new(scenario, verbose_level)?;
            runner.run().print_summary();
            Ok(())
        }
        Mode::Paced => {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .build()?;
            let mut runner = ScenarioRunner::new(scenario, verbose_level)?;
            runtime.block_on(runner.run_paced())?.print_summary();
            Ok(())
        }
    }
}

/// 各射撃を実行せずに貫通判定のみ表示
fn preview_scenario(scenario: &ScenarioConfig) -> Result<(), Box<dyn std::error::Error>> {
    let mut engine = SimulationEngine::new(Box::new(ProjectileRegistry::new()));
    engine.set_actual_thickness(scenario.engine.actual_thickness_mm);
    engine.set_bullet_penetration(scenario.engine.bullet_penetration_mm);
    engine.bind_armor_plate(ArmorPlate::new(scenario.armor.orientation()?));

    println!("=== 貫通プレビュー ===");
    for shot in &scenario.shots {
        if let Some(mm) = shot.actual_thickness_mm {
            engine.set_actual_thickness(mm);
        }
        if let Some(mm) = shot.bullet_penetration_mm {
            engine.set_bullet_penetration(mm);
        }

        match engine.determine_penetration(&shot.trajectory()) {
            Ok(result) => println!(
                "  {}: {}  Effective Armour: {}  Angle of Attack: {}",
                shot.id,
                result.preview_label(),
                result.effective_thickness_text(),
                result.angle_of_attack_text()
            ),
            Err(e) => println!("  {}: 判定不可 ({})", shot.id, e),
        }
    }
    Ok(())
}

/// 基準ケースの判定を表示
fn run_demo() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== 基準ケース ===");

    let mut engine = SimulationEngine::new(Box::new(ProjectileRegistry::new()));
    engine.bind_armor_plate(ArmorPlate::new(Orientation::identity()));
    println!(
        "実装甲厚: {:.2}mm  貫通力: {:.2}mm",
        engine.actual_thickness_mm(),
        engine.bullet_penetration_mm()
    );

    let tilt = 30f64.to_radians();
    let cases = [
        ("正面", Trajectory::new(DVec3::new(0.0, 0.0, -10.0), DVec3::ZERO)),
        (
            "60度傾斜",
            Trajectory::new(DVec3::new(0.0, -tilt.cos(), -tilt.sin()) * 10.0, DVec3::ZERO),
        ),
    ];

    for (label, trajectory) in cases {
        let result = engine.start_simulation(&trajectory)?;
        println!(
            "  {}: {:<15} 実効装甲厚 {}  入射角 {}",
            label,
            result.verdict_label(),
            result.effective_thickness_text(),
            result.angle_of_attack_text()
        );
    }

    Ok(())
}

/// デフォルトヘルプとシナリオ一覧を表示
fn show_default_help() {
    println!("使用方法:");
    println!("  armorsim [オプション]");
    println!();
    println!("オプション:");
    println!("  -s, --scenario <FILE>  シナリオファイルを指定して実行");
    println!("  -i, --info             シナリオ情報のみ表示");
    println!("  -p, --preview          貫通判定のみ表示（再生なし）");
    println!("      --paced            実時間に合わせて実行");
    println!("  -d, --demo             基準ケースの判定を表示");
    println!("  -v, --verbose          詳細出力 (複数指定で詳細レベル上昇)");
    println!("      --log-level <LV>   ログレベル (trace, debug, info, warn, error)");
    println!("      --log-output <OUT> ログ出力先 (console, file, both)");
    println!("  -h, --help             このヘルプを表示");
    println!();
    println!("利用可能なシナリオファイル:");
    println!("  scenarios/reference_hits.yaml   - 正面・60度傾斜・同値の基準ケース");
    println!("  scenarios/rotated_plate.yaml    - 傾けた装甲板への連続射撃（中断あり）");
    println!();
    println!("例:");
    println!("  armorsim -s scenarios/reference_hits.yaml");
    println!("  armorsim -s scenarios/rotated_plate.yaml -p");
    println!("  armorsim -s scenarios/rotated_plate.yaml --paced -v");
    println!("  armorsim --demo");
}
