//! # OMR Correction
//!
//! 一个用于批量批改选择题答题卡的 Rust 应用程序
//!
//! ## 架构设计
//!
//! 本系统采用严格的四层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 图像缓冲区的租约与账本
//! - `BufferLedger` - 统计仍存活的图像缓冲区，批次结束后应归零
//!
//! ### ② 能力层（Vision + Services）
//! - `vision/` - 对齐、网格、ROI 裁剪、缩略图
//! - `services/` - 标记检测、学号识别、作答映射、评分、仓库与结果存储
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一页答题卡"的完整处理流程
//! - `PageCtx` - 上下文封装（试卷 + 页码）
//! - `PageFlow` - 流程编排（对齐 → 网格 → 检测 → 映射 → 评分 → 保存）
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/batch_processor` - 批次调度，运行互斥、并发与进度
//! - `orchestrator/run_handle` - 运行句柄
//!
//! ## 模块结构

pub mod config;
pub mod error;
pub mod infrastructure;
pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod vision;
pub mod workflow;

// 重新导出常用类型
pub use config::Config;
pub use error::{AppError, AppResult};
pub use infrastructure::BufferLedger;
pub use models::{BatchReport, CorrectionResult, PageInput, Progress, ReviewReason};
pub use orchestrator::{BatchOptions, CorrectionOrchestrator, RunHandle};
pub use services::Collaborators;
pub use workflow::{PageCtx, PageFlow};
