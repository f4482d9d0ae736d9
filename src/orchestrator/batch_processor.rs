//! 批量批改处理器 - 编排层
//!
//! ## 职责
//!
//! 本模块是批改流程的入口，负责批次级别的调度与资源管理。
//!
//! ## 核心功能
//!
//! 1. **运行互斥**：同一时间只允许一个批次，第二个批次同步失败而不是排队
//! 2. **解码**：把编码后的扫描页解码为图像，失败的页面直接产出兜底结果
//! 3. **初始化**：检测器与识别器初始化，超时即整个批次失败
//! 4. **分批处理**：按并发数切成窗口，窗口内并发，窗口之间严格串行
//! 5. **保序**：无论完成先后，结果顺序与输入顺序一致
//! 6. **进度**：在阶段边界通过回调和 watch 通道报告进度
//!
//! ## 设计特点
//!
//! - **顶层编排**：不处理单页细节，委托 `workflow::PageFlow`
//! - **失败隔离**：单页 panic 被 `JoinError` 捕获并降级为复核原因

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::{AppError, AppResult, RunError, VisionError};
use crate::infrastructure::BufferLedger;
use crate::models::exam::{ExamDefinition, GradingScale};
use crate::models::result::{
    BatchReport, CorrectionResult, PipelineStage, Progress, ProgressStage, ReviewReason,
};
use crate::models::sheet::{Page, PageInput};
use crate::orchestrator::run_handle::{RunGuard, RunHandle};
use crate::services::{Collaborators, MarkDetector};
use crate::utils::file_name::plain_file_name;
use crate::utils::logging::{log_batch_complete, log_batch_start, log_pages_loaded};
use crate::workflow::{PageCtx, PageFlow};

/// 进度回调
pub type ProgressCallback = Arc<dyn Fn(&Progress) + Send + Sync>;

/// 单个批次的选项
#[derive(Clone)]
pub struct BatchOptions {
    /// 每个窗口的页数
    pub concurrency: usize,
    /// 是否在评分前按学号查找学生
    pub identify: bool,
    pub on_progress: Option<ProgressCallback>,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            concurrency: 4,
            identify: true,
            on_progress: None,
        }
    }
}

impl BatchOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            concurrency: config.max_concurrent_pages,
            identify: config.identify,
            on_progress: None,
        }
    }

    pub fn with_progress(mut self, callback: impl Fn(&Progress) + Send + Sync + 'static) -> Self {
        self.on_progress = Some(Arc::new(callback));
        self
    }
}

/// 批改编排器
pub struct CorrectionOrchestrator {
    config: Config,
    collaborators: Collaborators,
    ledger: BufferLedger,
    active_run: Arc<AtomicU64>,
    next_run_id: AtomicU64,
}

impl CorrectionOrchestrator {
    pub fn new(config: Config, collaborators: Collaborators) -> Self {
        Self {
            config,
            collaborators,
            ledger: BufferLedger::new(),
            active_run: Arc::new(AtomicU64::new(0)),
            next_run_id: AtomicU64::new(1),
        }
    }

    /// 所有页面流水线共用的缓冲区账本
    pub fn ledger(&self) -> &BufferLedger {
        &self.ledger
    }

    pub fn is_running(&self) -> bool {
        self.active_run.load(Ordering::SeqCst) != 0
    }

    /// 启动批次，立即返回句柄
    ///
    /// 前置条件失败（没有检测器、已有批次在运行）同步返回错误。
    /// 必须在 tokio 运行时内调用。
    pub fn start_batch(
        &self,
        pages: Vec<PageInput>,
        exam_id: &str,
        options: BatchOptions,
    ) -> AppResult<RunHandle> {
        let detector = self
            .collaborators
            .detector
            .clone()
            .ok_or(RunError::DetectionUnavailable)?;
        let exam_id = plain_file_name(exam_id)?;

        let run_id = self.next_run_id.fetch_add(1, Ordering::SeqCst);
        let guard = RunGuard::acquire(&self.active_run, run_id)?;

        let (progress_tx, progress_rx) =
            watch::channel(Progress::new(ProgressStage::Decode, 0, pages.len()));

        let run = BatchRun {
            run_id,
            config: self.config.clone(),
            detector,
            collaborators: self.collaborators.clone(),
            ledger: self.ledger.clone(),
            exam_id: exam_id.to_string(),
            options,
            progress_tx,
        };

        let task = tokio::spawn(async move {
            let _guard = guard;
            run.execute(pages).await
        });

        info!("🚀 批次 #{} 已启动", run_id);
        Ok(RunHandle::new(run_id, progress_rx, task))
    }

    /// 启动批次并等待结束
    pub async fn process_batch(
        &self,
        pages: Vec<PageInput>,
        exam_id: &str,
        options: BatchOptions,
    ) -> AppResult<BatchReport> {
        self.start_batch(pages, exam_id, options)?.join().await
    }
}

/// 解码后的页面任务
enum PageJob {
    Ready(Page),
    Failed { page_number: u32, message: String },
}

/// 窗口内等待收集的页面
enum PendingPage {
    Spawned {
        page_number: u32,
        handle: JoinHandle<CorrectionResult>,
    },
    Done(CorrectionResult),
}

/// 一次批次运行所需的全部状态，移动到后台任务中
struct BatchRun {
    run_id: u64,
    config: Config,
    detector: Arc<dyn MarkDetector>,
    collaborators: Collaborators,
    ledger: BufferLedger,
    exam_id: String,
    options: BatchOptions,
    progress_tx: watch::Sender<Progress>,
}

impl BatchRun {
    async fn execute(self, pages: Vec<PageInput>) -> AppResult<BatchReport> {
        let total_pages = pages.len();
        let concurrency = self.options.concurrency.max(1);
        log_pages_loaded(total_pages, concurrency);

        let jobs = self.decode_all(pages).await;
        self.initialize().await?;
        let exam = Arc::new(self.load_exam().await);

        let flow = Arc::new(PageFlow::new(
            &self.config,
            self.detector.clone(),
            &self.collaborators,
            self.ledger.clone(),
        ));
        let semaphore = Arc::new(Semaphore::new(concurrency));
        let total_windows = total_pages.div_ceil(concurrency);
        let mut results = Vec::with_capacity(total_pages);
        let mut jobs = jobs.into_iter();

        for window_idx in 0..total_windows {
            let window_start = window_idx * concurrency;
            let window_end = (window_start + concurrency).min(total_pages);
            log_batch_start(
                window_idx + 1,
                total_windows,
                window_start + 1,
                window_end,
                total_pages,
            );

            let window: Vec<PageJob> = jobs.by_ref().take(concurrency).collect();
            let window_results = self
                .run_window(window, &flow, &exam, semaphore.clone())
                .await;

            let clean = window_results.iter().filter(|r| !r.needs_review).count();
            log_batch_complete(window_idx + 1, clean, window_results.len());
            results.extend(window_results);

            self.emit(Progress::new(ProgressStage::Batch, window_idx + 1, total_windows));
        }

        let report = BatchReport::from_results(self.run_id, total_pages, results);
        self.emit(Progress::new(ProgressStage::Done, total_pages, total_pages));
        info!(
            "✅ 批次 #{} 完成: {} 页, {} 页需要复核",
            self.run_id,
            report.processed_pages,
            report.needs_review()
        );
        Ok(report)
    }

    /// 解码阶段：逐页报告进度，失败的页面记为兜底任务
    async fn decode_all(&self, pages: Vec<PageInput>) -> Vec<PageJob> {
        let total = pages.len();
        let mut jobs = Vec::with_capacity(total);

        for (idx, input) in pages.into_iter().enumerate() {
            let job = match input {
                PageInput::Decoded(page) => PageJob::Ready(page),
                PageInput::Encoded { page_number, bytes } => {
                    let decoded = tokio::task::spawn_blocking(move || {
                        image::load_from_memory(&bytes)
                            .map_err(|source| VisionError::DecodeFailed { page_number, source })
                    })
                    .await;
                    match decoded {
                        Ok(Ok(image)) => PageJob::Ready(Page::new(page_number, image)),
                        Ok(Err(e)) => {
                            warn!("[页面 {}] ⚠️ {}", page_number, e);
                            PageJob::Failed {
                                page_number,
                                message: e.to_string(),
                            }
                        }
                        Err(e) => PageJob::Failed {
                            page_number,
                            message: format!("解码任务异常: {}", e),
                        },
                    }
                }
            };
            jobs.push(job);
            self.emit(Progress::new(ProgressStage::Decode, idx + 1, total));
        }
        jobs
    }

    /// 初始化协作组件，唯一带超时的阶段
    async fn initialize(&self) -> AppResult<()> {
        self.emit(Progress::new(ProgressStage::Initialize, 0, 2));
        let timeout = Duration::from_secs(self.config.init_timeout_secs);

        let detector_name = format!("标记检测器 {}", self.detector.name());
        with_init_timeout(&detector_name, timeout, self.detector.initialize()).await?;
        self.emit(Progress::new(ProgressStage::Initialize, 1, 2));

        let recognizer = &self.collaborators.recognizer;
        let recognizer_name = format!("学号识别器 {}", recognizer.name());
        with_init_timeout(&recognizer_name, timeout, recognizer.initialize()).await?;
        self.emit(Progress::new(ProgressStage::Initialize, 2, 2));

        info!("✓ 协作组件初始化完成");
        Ok(())
    }

    /// 找不到试卷定义时使用默认评分标准与 4 个选项
    async fn load_exam(&self) -> ExamDefinition {
        match self.collaborators.exams.get_exam(&self.exam_id).await {
            Ok(Some(mut exam)) => {
                // 取答案、保存结果都以批次的试卷编号为准
                if exam.exam_id != self.exam_id {
                    warn!(
                        "⚠️ 试卷文件中的编号 {} 与批次编号 {} 不一致，以批次编号为准",
                        exam.exam_id, self.exam_id
                    );
                    exam.exam_id = self.exam_id.clone();
                }
                exam
            }
            Ok(None) => {
                warn!("⚠️ 未找到试卷 {}，使用默认评分标准", self.exam_id);
                ExamDefinition::fallback(&self.exam_id)
            }
            Err(e) => {
                warn!("⚠️ 读取试卷 {} 失败: {:#}，使用默认评分标准", self.exam_id, e);
                ExamDefinition::fallback(&self.exam_id)
            }
        }
    }

    /// 处理一个窗口：窗口内并发，按输入顺序收集结果
    async fn run_window(
        &self,
        window: Vec<PageJob>,
        flow: &Arc<PageFlow>,
        exam: &Arc<ExamDefinition>,
        semaphore: Arc<Semaphore>,
    ) -> Vec<CorrectionResult> {
        let mut pending = Vec::with_capacity(window.len());

        for job in window {
            match job {
                PageJob::Ready(page) => {
                    let page_number = page.page_number;
                    let ctx = PageCtx::new(exam.clone(), page_number, self.options.identify);
                    let flow = flow.clone();
                    let semaphore = semaphore.clone();

                    let handle = tokio::spawn(async move {
                        // 信号量不会被关闭
                        let _permit = semaphore.acquire_owned().await.ok();
                        flow.run(page, &ctx).await
                    });
                    pending.push(PendingPage::Spawned {
                        page_number,
                        handle,
                    });
                }
                PageJob::Failed {
                    page_number,
                    message,
                } => {
                    let result = self
                        .fallback(page_number, &exam.grading_scale, PipelineStage::Decode, message)
                        .await;
                    pending.push(PendingPage::Done(result));
                }
            }
        }

        let mut results = Vec::with_capacity(pending.len());
        for page in pending {
            let result = match page {
                PendingPage::Done(result) => result,
                PendingPage::Spawned {
                    page_number,
                    handle,
                } => match handle.await {
                    Ok(result) => result,
                    Err(e) => {
                        error!("[页面 {}] ❌ 任务执行失败: {}", page_number, e);
                        self.fallback(
                            page_number,
                            &exam.grading_scale,
                            PipelineStage::Page,
                            format!("任务异常: {}", e),
                        )
                        .await
                    }
                },
            };
            results.push(result);
        }
        results
    }

    /// 兜底结果同样持久化
    async fn fallback(
        &self,
        page_number: u32,
        scale: &GradingScale,
        stage: PipelineStage,
        message: String,
    ) -> CorrectionResult {
        let mut result = CorrectionResult::fallback(
            page_number,
            self.exam_id.clone(),
            scale,
            ReviewReason::StageFailed { stage, message },
        );
        if let Err(e) = self.collaborators.store.save(&self.exam_id, &result).await {
            warn!("[页面 {}] ⚠️ 兜底结果保存失败: {:#}", page_number, e);
            result.review_reasons.push(ReviewReason::StageFailed {
                stage: PipelineStage::Persist,
                message: format!("{:#}", e),
            });
        }
        if let Some(writer) = &self.collaborators.review_writer {
            if let Err(e) = writer.write(&result).await {
                warn!("[页面 {}] ⚠️ 写入复核清单失败: {:#}", page_number, e);
            }
        }
        result
    }

    fn emit(&self, progress: Progress) {
        debug!(
            "进度: {:?} {}/{} ({}%)",
            progress.stage, progress.current, progress.total, progress.percentage
        );
        self.progress_tx.send_replace(progress);
        if let Some(callback) = &self.options.on_progress {
            callback(&progress);
        }
    }
}

async fn with_init_timeout(
    collaborator: &str,
    timeout: Duration,
    init: impl std::future::Future<Output = anyhow::Result<()>>,
) -> AppResult<()> {
    match tokio::time::timeout(timeout, init).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => {
            error!("❌ {} 初始化失败: {:#}", collaborator, e);
            Err(AppError::init_failed(collaborator, e))
        }
        Err(_) => {
            error!("❌ {} 初始化超时", collaborator);
            Err(RunError::InitializationTimeout {
                collaborator: collaborator.to_string(),
                secs: timeout.as_secs(),
            }
            .into())
        }
    }
}
