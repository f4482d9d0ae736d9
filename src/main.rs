use anyhow::Result;
use omr_correction::models::load_page_folder;
use omr_correction::utils::logging;
use omr_correction::{BatchOptions, Collaborators, Config, CorrectionOrchestrator};

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志
    logging::init();

    // 加载配置（OMR_CONFIG 指向 TOML 文件时优先使用）
    let config = match std::env::var("OMR_CONFIG") {
        Ok(path) => Config::from_toml_file(&path)?,
        Err(_) => Config::from_env(),
    };

    if let Err(e) = logging::init_log_file(&config.output_log_file) {
        tracing::warn!("⚠️ 无法创建日志文件: {:#}", e);
    }
    logging::log_startup(&config);

    // 加载扫描页
    let pages = load_page_folder(&config.input_folder).await?;
    if pages.is_empty() {
        tracing::warn!("⚠️ {} 中没有扫描页", config.input_folder);
        return Ok(());
    }

    // 初始化并运行批次
    let collaborators = Collaborators::from_config(&config);
    let options = BatchOptions::from_config(&config);
    let exam_id = config.exam_id.clone();
    let log_file = config.output_log_file.clone();
    let orchestrator = CorrectionOrchestrator::new(config, collaborators);

    let report = orchestrator.process_batch(pages, &exam_id, options).await?;
    logging::print_final_stats(&report, &log_file);

    Ok(())
}
