use anyhow::{Context, Result};
/// 日志工具模块
///
/// 提供日志初始化、日志文件头和批次横幅的辅助函数
use std::fs;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::models::result::BatchReport;

/// 初始化 tracing 订阅者
///
/// 级别由 `RUST_LOG` 控制，默认 `info`；重复调用不会报错
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// 初始化日志文件
///
/// # 参数
/// - `log_file_path`: 日志文件路径
pub fn init_log_file(log_file_path: &str) -> Result<()> {
    let log_header = format!(
        "{}\n答题卡批改日志 - {}\n{}\n\n",
        "=".repeat(60),
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
        "=".repeat(60)
    );
    fs::write(log_file_path, log_header)
        .with_context(|| format!("无法写入日志文件: {}", log_file_path))?;
    Ok(())
}

/// 记录程序启动信息
pub fn log_startup(config: &Config) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - 答题卡批量批改");
    info!("📝 试卷: {}", config.exam_id);
    info!("📊 每批并发数: {}", config.max_concurrent_pages);
    info!("🔎 检测后端: {:?}", config.detector_backend);
    info!("{}", "=".repeat(60));
}

/// 记录扫描页加载信息
///
/// # 参数
/// - `total`: 页面总数
/// - `max_concurrent`: 每批页数
pub fn log_pages_loaded(total: usize, max_concurrent: usize) {
    info!("✓ 找到 {} 张待批改的扫描页", total);
    info!("📋 将以每批 {} 张的方式处理", max_concurrent);
    info!("💡 每批完成后再开始下一批\n");
}

/// 记录批次开始信息
///
/// # 参数
/// - `batch_num`: 批次编号
/// - `total_batches`: 批次总数
/// - `start`: 起始页码
/// - `end`: 结束页码
/// - `total`: 页面总数
pub fn log_batch_start(
    batch_num: usize,
    total_batches: usize,
    start: usize,
    end: usize,
    total: usize,
) {
    info!("\n{}", "=".repeat(60));
    info!("📦 开始处理第 {}/{} 批", batch_num, total_batches);
    info!("📄 本批页面: {}-{} / 共 {} 张", start, end, total);
    info!("{}", "=".repeat(60));
}

/// 记录批次完成信息
///
/// # 参数
/// - `batch_num`: 批次编号
/// - `clean`: 无需复核的页数
/// - `total`: 本批页数
pub fn log_batch_complete(batch_num: usize, clean: usize, total: usize) {
    info!("\n{}", "─".repeat(60));
    info!("✓ 第 {} 批完成: 无需复核 {}/{}", batch_num, clean, total);
    info!("{}", "─".repeat(60));
}

/// 打印最终统计信息
pub fn print_final_stats(report: &BatchReport, log_file_path: &str) {
    info!("\n{}", "=".repeat(60));
    info!("📊 全部批改完成统计");
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    info!("✅ 已处理: {}/{}", report.processed_pages, report.total_pages);
    info!("🪪 已识别学生: {}", report.identified);
    info!("⏳ 待确认身份: {}", report.pending);
    info!("⚠️ 需要复核: {}", report.needs_review());
    info!("❌ 阶段错误: {}", report.errors.len());
    info!("{}", "=".repeat(60));
    info!("\n日志已保存至: {}", log_file_path);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        init();
        init();
    }

    #[test]
    fn test_log_file_header() {
        let path = std::env::temp_dir().join(format!("omr_log_{}.txt", std::process::id()));
        let path = path.to_string_lossy().to_string();
        init_log_file(&path).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("答题卡批改日志"));
        fs::remove_file(&path).unwrap();
    }
}
