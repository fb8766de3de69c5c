use clap::Parser;
use ms_analyzer::core::dataset::Experiment;
use ms_analyzer::utils::error::{AnalyzerError, ErrorSeverity};
use ms_analyzer::utils::logger;
use ms_analyzer::{AnalysisEngine, AnalysisPipeline, CliConfig, LocalStorage};

fn exit_code(e: &AnalyzerError) -> i32 {
    // 根據錯誤嚴重程度決定退出碼
    match e.severity() {
        ErrorSeverity::Low => 0,      // 警告，但成功
        ErrorSeverity::Medium => 2,   // 計算錯誤
        ErrorSeverity::High => 1,     // 輸入或設定錯誤
        ErrorSeverity::Critical => 3, // 系統錯誤
    }
}

fn report_failure(stage: &str, e: &AnalyzerError) {
    // 記錄詳細錯誤信息
    tracing::error!(
        "❌ {} failed: {} (Category: {:?}, Severity: {:?})",
        stage,
        e,
        e.category(),
        e.severity()
    );
    tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

    // 輸出用戶友好的錯誤信息
    eprintln!("❌ {}", e.user_friendly_message());
    eprintln!("💡 建議: {}", e.recovery_suggestion());

    let code = exit_code(e);
    if code > 0 {
        std::process::exit(code);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = CliConfig::parse();

    // 初始化日誌
    if cli.json_logs {
        logger::init_json_logger(cli.verbose);
    } else {
        logger::init_cli_logger(cli.verbose);
    }

    tracing::info!("Starting ms-analyzer");
    if cli.verbose {
        tracing::debug!("CLI config: {:?}", cli);
    }

    // 載入並驗證配置
    let run_config = match cli.resolve() {
        Ok(run_config) => run_config,
        Err(e) => {
            report_failure("Configuration", &e);
            return Ok(());
        }
    };

    if cli.monitor {
        tracing::info!("🔍 System monitoring enabled");
    }

    // 創建存儲和管道
    let pipeline = AnalysisPipeline::new(LocalStorage::default(), run_config);
    let engine = AnalysisEngine::new_with_monitoring(pipeline, cli.monitor);

    if cli.dry_run {
        match engine.inspect().await.and_then(|raw| Experiment::from_raw(&raw)) {
            Ok(experiment) => {
                println!("🔎 Dry run, nothing written");
                println!("Experiment: {}", experiment.name);
                println!("Type: {}", experiment.experiment_type);
                println!("Compound: {:?}", experiment.family);
                println!(
                    "Samples: {} ({} experimental, {} standards)",
                    experiment.meta.len(),
                    experiment.sample_rows().len(),
                    experiment.standard_rows().len()
                );
                println!("Ions: {}", experiment.data.columns.join(", "));
                println!("Parental ions: {}", experiment.parental_ions.join(", "));
            }
            Err(e) => report_failure("Dry run", &e),
        }
        return Ok(());
    }

    match engine.run().await {
        Ok(output_path) => {
            tracing::info!("✅ Analysis completed successfully!");
            tracing::info!("📁 Results saved to: {}", output_path);
            println!("✅ Analysis completed successfully!");
            println!("📁 Results saved to: {}", output_path);
        }
        Err(e) => report_failure("Analysis", &e),
    }

    Ok(())
}
