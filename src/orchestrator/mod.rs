//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责批次调度，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `batch_processor` - 批量批改处理器
//! - 运行互斥（同一时间只有一个批次）
//! - 解码扫描页、初始化协作组件（带超时）
//! - 按窗口控制并发（Semaphore），保持输入顺序
//! - 报告进度，汇总批次报告
//!
//! ### `run_handle` - 运行句柄
//! - 进度订阅、等待结果
//! - 运行锁守卫（任务结束即释放）
//!
//! ## 层次关系
//!
//! ```text
//! batch_processor (处理 Vec<PageInput>)
//!     ↓
//! workflow::PageFlow (处理单页)
//!     ↓
//! services + vision (检测 / 映射 / 评分 / 对齐)
//!     ↓
//! infrastructure (BufferLedger)
//! ```
//!
//! ## 设计原则
//!
//! 1. **向下依赖**：编排层 → workflow → services → infrastructure
//! 2. **无业务逻辑**：只做调度和统计，不做具体业务判断

pub mod batch_processor;
pub mod run_handle;

// 重新导出主要类型
pub use batch_processor::{BatchOptions, CorrectionOrchestrator, ProgressCallback};
pub use run_handle::RunHandle;
