//! 页面批改流程 - 流程层
//!
//! 核心职责：定义"一页答题卡"的完整处理流程
//!
//! 流程顺序：
//! 1. 对齐 → 网格 → 裁剪 ROI（阻塞线程池）
//! 2. 识别学号 → 查找学生
//! 3. 左右表格检测 → 坐标换算 → 映射作答
//! 4. 评分 → 持久化 → 复核清单
//!
//! 任何阶段失败都只记录复核原因，后续阶段照常执行，页面总会产出结果

use std::sync::Arc;
use std::time::Instant;

use chrono::Local;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::infrastructure::BufferLedger;
use crate::models::answer::Answer;
use crate::models::detection::{Detection, IdRecognition};
use crate::models::layout::SheetLayout;
use crate::models::result::{CorrectionResult, PipelineStage, ReviewReason, Thumbnail};
use crate::models::sheet::{Page, SheetGrid, Side};
use crate::services::{
    AnswerMapper, Collaborators, ExamRepository, IdRecognizer, IdentityRepository, MarkDetector,
    ResultStore, ReviewWriter, ScoringEngine,
};
use crate::vision::{
    encode_thumbnail, BinarizeParams, GridGeometryResolver, ImageAligner, Roi, RoiExtractor,
    SheetRois,
};
use crate::workflow::page_ctx::PageCtx;

/// 视觉阶段的产物（对齐帧在产出 ROI 后即释放）
struct VisionOutput {
    alignment_success: bool,
    /// 对齐帧相对标准帧的比例
    scale: f32,
    markers_found: usize,
    grid: SheetGrid,
    rois: SheetRois,
    thumbnail: Option<Thumbnail>,
}

/// 页面批改流程
///
/// - 编排单页的完整处理流程
/// - 不持有页面之间共享的可变状态
/// - 只依赖业务能力（services）与视觉能力（vision）
pub struct PageFlow {
    layout: Arc<SheetLayout>,
    aligner: ImageAligner,
    grid_resolver: GridGeometryResolver,
    roi_extractor: RoiExtractor,
    detector: Arc<dyn MarkDetector>,
    recognizer: Arc<dyn IdRecognizer>,
    exams: Arc<dyn ExamRepository>,
    identities: Option<Arc<dyn IdentityRepository>>,
    store: Arc<dyn ResultStore>,
    review_writer: Option<Arc<ReviewWriter>>,
    mapper: AnswerMapper,
    scoring: ScoringEngine,
    low_confidence_threshold: f32,
    thumbnail_width: u32,
    verbose_logging: bool,
}

impl PageFlow {
    pub fn new(
        config: &Config,
        detector: Arc<dyn MarkDetector>,
        collaborators: &Collaborators,
        ledger: BufferLedger,
    ) -> Self {
        let layout = Arc::new(config.layout.clone());
        Self {
            layout: layout.clone(),
            aligner: ImageAligner::new(
                collaborators.alignment.clone(),
                layout.clone(),
                ledger.clone(),
            ),
            grid_resolver: GridGeometryResolver::new(
                layout.clone(),
                BinarizeParams::default(),
                ledger.clone(),
            ),
            roi_extractor: RoiExtractor::new(layout, ledger),
            detector,
            recognizer: collaborators.recognizer.clone(),
            exams: collaborators.exams.clone(),
            identities: collaborators.identities.clone(),
            store: collaborators.store.clone(),
            review_writer: collaborators.review_writer.clone(),
            mapper: AnswerMapper::new(config.row_tolerance_px),
            scoring: ScoringEngine::new(),
            low_confidence_threshold: config.low_confidence_threshold,
            thumbnail_width: config.thumbnail_width,
            verbose_logging: config.verbose_logging,
        }
    }

    pub async fn run(&self, page: Page, ctx: &PageCtx) -> CorrectionResult {
        let started = Instant::now();
        let mut reasons: Vec<ReviewReason> = Vec::new();
        info!("{} 🖼️ 开始批改 ({}x{})", ctx, page.image.width(), page.image.height());

        // ========== 对齐 / 网格 / ROI ==========
        let vision = self.run_vision(page, ctx).await;
        let (alignment_success, scale, mut rois, grid, thumbnail) = match vision {
            Ok(output) => {
                if !output.alignment_success {
                    reasons.push(ReviewReason::AlignmentDegraded {
                        markers_found: output.markers_found,
                    });
                }
                (
                    output.alignment_success,
                    output.scale,
                    output.rois,
                    output.grid,
                    output.thumbnail,
                )
            }
            Err(message) => {
                error!("{} ❌ 图像处理失败: {}", ctx, message);
                reasons.push(ReviewReason::StageFailed {
                    stage: PipelineStage::Align,
                    message,
                });
                (false, 1.0, SheetRois::default(), SheetGrid::default(), None)
            }
        };

        // ========== 学号 ==========
        let recognition = self.recognize(rois.id_field.take(), ctx, &mut reasons).await;
        let student_id = self.identify(&recognition, ctx, &mut reasons).await;

        // ========== 检测 + 映射 ==========
        let detections = self.detect_tables(&mut rois, ctx, &mut reasons).await;
        drop(rois);

        let answers = self.mapper.scaled(scale).map(&grid, &detections);
        self.flag_answers(&answers, &detections, ctx, &mut reasons);

        // ========== 评分 ==========
        let key = match self
            .exams
            .get_finalized_answer_key(ctx.exam_id(), student_id.as_deref())
            .await
        {
            Ok(key) => key,
            Err(e) => {
                warn!("{} ⚠️ 读取答案失败: {:#}", ctx, e);
                reasons.push(ReviewReason::StageFailed {
                    stage: PipelineStage::Score,
                    message: format!("{:#}", e),
                });
                None
            }
        };
        let outcome = self
            .scoring
            .score(&answers, key.as_deref(), &ctx.exam.grading_scale);
        if let Some(message) = &outcome.error {
            warn!("{} ⚠️ 评分失败: {}", ctx, message);
            reasons.push(ReviewReason::ScoringError {
                message: message.clone(),
            });
        } else {
            info!(
                "{} ✓ 正确 {}/{}，成绩 {:.1}",
                ctx, outcome.correct_count, outcome.total_questions, outcome.grade
            );
        }

        let mut result = CorrectionResult {
            page_number: ctx.page_number,
            exam_id: ctx.exam_id().to_string(),
            student_id,
            detected_id: recognition.id.clone(),
            id_valid: recognition.is_valid,
            id_confidence: recognition.confidence,
            alignment_success,
            answers,
            correct_count: outcome.correct_count,
            total_questions: outcome.total_questions,
            score: outcome.score,
            percentage: outcome.percentage,
            grade: outcome.grade,
            scoring_error: outcome.error,
            needs_review: !reasons.is_empty(),
            review_reasons: reasons,
            thumbnail,
            processing_time_ms: started.elapsed().as_millis() as u64,
            corrected_at: Local::now(),
        };

        // ========== 持久化 ==========
        self.persist(&mut result, ctx).await;

        if result.needs_review {
            warn!(
                "{} ⚠️ 需要复核: {}",
                ctx,
                result
                    .review_reasons
                    .iter()
                    .map(|r| r.code())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }
        result
    }

    /// 对齐、网格与 ROI 都是 CPU 密集操作，放到阻塞线程池执行
    async fn run_vision(&self, page: Page, ctx: &PageCtx) -> Result<VisionOutput, String> {
        let aligner = self.aligner.clone();
        let grid_resolver = self.grid_resolver.clone();
        let roi_extractor = self.roi_extractor.clone();
        let layout = self.layout.clone();
        let alternatives = ctx.exam.alternative_count();
        let thumbnail_width = self.thumbnail_width;
        let page_number = page.page_number;

        let task = tokio::task::spawn_blocking(move || {
            let aligned = aligner.align(page.image);
            let grid = grid_resolver.resolve(&aligned.sheet, alternatives);
            let rois = roi_extractor.extract(&aligned.sheet, &grid);
            let thumbnail = if thumbnail_width == 0 {
                None
            } else {
                match encode_thumbnail(&aligned.sheet, thumbnail_width) {
                    Ok(thumbnail) => Some(thumbnail),
                    Err(e) => {
                        warn!("[页面 {}] 缩略图生成失败: {}", page_number, e);
                        None
                    }
                }
            };
            VisionOutput {
                alignment_success: aligned.success,
                scale: layout.scale_for(aligned.sheet.width()),
                markers_found: aligned.markers.found(),
                grid,
                rois,
                thumbnail,
            }
        });

        let output = task.await.map_err(|e| e.to_string())?;
        debug!(
            "{} 对齐 {}，网格 {} 行",
            ctx,
            if output.alignment_success { "成功" } else { "降级" },
            output.grid.rows.len()
        );
        Ok(output)
    }

    async fn recognize(
        &self,
        id_roi: Option<Roi>,
        ctx: &PageCtx,
        reasons: &mut Vec<ReviewReason>,
    ) -> IdRecognition {
        let recognition = match id_roi {
            Some(roi) => match self.recognizer.extract(&roi.image).await {
                Ok(recognition) => recognition,
                Err(e) => {
                    warn!("{} ⚠️ 学号识别出错: {:#}", ctx, e);
                    reasons.push(ReviewReason::StageFailed {
                        stage: PipelineStage::Recognize,
                        message: format!("{:#}", e),
                    });
                    IdRecognition::unreadable()
                }
            },
            None => IdRecognition::unreadable(),
        };

        if !recognition.success {
            reasons.push(ReviewReason::IdUnreadable);
        } else if !recognition.is_valid {
            let id = recognition.id.clone().unwrap_or_default();
            warn!("{} ⚠️ 学号校验位错误: {}", ctx, id);
            reasons.push(ReviewReason::IdChecksumInvalid { id });
        }
        recognition
    }

    /// 校验通过的学号精确匹配名册
    async fn identify(
        &self,
        recognition: &IdRecognition,
        ctx: &PageCtx,
        reasons: &mut Vec<ReviewReason>,
    ) -> Option<String> {
        if !ctx.identify {
            return None;
        }
        let (identities, validated_id) = (self.identities.as_ref()?, recognition.validated_id()?);

        match identities.find_by_validated_id(validated_id).await {
            Ok(Some(identity)) => {
                info!("{} 🪪 识别到学生 {} ({})", ctx, identity.student_id, identity.name);
                Some(identity.student_id)
            }
            Ok(None) => {
                debug!("{} 名册中没有学号 {}", ctx, validated_id);
                None
            }
            Err(e) => {
                warn!("{} ⚠️ 查找学生失败: {:#}", ctx, e);
                reasons.push(ReviewReason::StageFailed {
                    stage: PipelineStage::Identify,
                    message: format!("{:#}", e),
                });
                None
            }
        }
    }

    /// 逐侧检测，检测结果换算为对齐帧绝对坐标；每侧 ROI 用完即释放
    async fn detect_tables(
        &self,
        rois: &mut SheetRois,
        ctx: &PageCtx,
        reasons: &mut Vec<ReviewReason>,
    ) -> Vec<Detection> {
        let mut detections = Vec::new();

        for side in Side::BOTH {
            let Some(roi) = rois.take_table(side) else {
                debug!("{} {}侧没有题目行", ctx, side);
                continue;
            };

            match self.detector.detect(&roi.image).await {
                Ok(output) if output.success => {
                    debug!("{} {}侧检测到 {} 个标记", ctx, side, output.detections.len());
                    detections.extend(
                        output
                            .detections
                            .into_iter()
                            .map(|raw| Detection::from_roi(raw, roi.origin, roi.scale, side)),
                    );
                }
                Ok(_) => {
                    warn!("{} ⚠️ {}侧检测器返回失败", ctx, side);
                    reasons.push(ReviewReason::StageFailed {
                        stage: PipelineStage::Detect,
                        message: format!("{}侧检测器返回失败", side),
                    });
                }
                Err(e) => {
                    warn!("{} ⚠️ {}侧检测出错: {:#}", ctx, side, e);
                    reasons.push(ReviewReason::StageFailed {
                        stage: PipelineStage::Detect,
                        message: format!("{}侧: {:#}", side, e),
                    });
                }
            }
        }
        detections
    }

    fn flag_answers(
        &self,
        answers: &[Answer],
        detections: &[Detection],
        ctx: &PageCtx,
        reasons: &mut Vec<ReviewReason>,
    ) {
        let multiple = answers.iter().filter(|a| a.multiple_marks).count();
        if multiple > 0 {
            reasons.push(ReviewReason::MultipleMarks { count: multiple });
        }

        let low = detections
            .iter()
            .filter(|d| d.confidence < self.low_confidence_threshold)
            .count();
        if low > 0 {
            reasons.push(ReviewReason::LowConfidence {
                count: low,
                threshold: self.low_confidence_threshold,
            });
        }

        if self.verbose_logging {
            for answer in answers {
                debug!(
                    "{} 第 {} 题: {:?}{}",
                    ctx,
                    answer.question,
                    answer.selected,
                    if answer.multiple_marks { " (多选)" } else { "" }
                );
            }
        }
    }

    /// 保存失败时把原因追加到结果上
    async fn persist(&self, result: &mut CorrectionResult, ctx: &PageCtx) {
        if let Err(e) = self.store.save(ctx.exam_id(), result).await {
            error!("{} ❌ 结果保存失败: {:#}", ctx, e);
            result.review_reasons.push(ReviewReason::StageFailed {
                stage: PipelineStage::Persist,
                message: format!("{:#}", e),
            });
            result.needs_review = true;
        }

        if let Some(writer) = &self.review_writer {
            if let Err(e) = writer.write(result).await {
                warn!("{} ⚠️ 写入复核清单失败: {:#}", ctx, e);
            }
        }
    }
}
