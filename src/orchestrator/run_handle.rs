//! 批次运行句柄与互斥守卫

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::{AppResult, RunError};
use crate::models::result::{BatchReport, Progress};

/// 同一时间只允许一个批次运行
///
/// 守卫随批次任务移动，任务以任何方式结束（包括 panic）时释放
#[derive(Debug)]
pub(crate) struct RunGuard {
    active: Arc<AtomicU64>,
    run_id: u64,
}

impl RunGuard {
    /// `active` 为 0 表示空闲，否则为正在运行的批次编号
    pub(crate) fn acquire(active: &Arc<AtomicU64>, run_id: u64) -> Result<Self, RunError> {
        active
            .compare_exchange(0, run_id, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|active_run| RunError::AlreadyRunning { active_run })?;
        Ok(Self {
            active: active.clone(),
            run_id,
        })
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.active.store(0, Ordering::SeqCst);
        debug!("批次 #{} 已释放运行锁", self.run_id);
    }
}

/// `start_batch` 返回的运行句柄
#[derive(Debug)]
pub struct RunHandle {
    run_id: u64,
    progress: watch::Receiver<Progress>,
    task: JoinHandle<AppResult<BatchReport>>,
}

impl RunHandle {
    pub(crate) fn new(
        run_id: u64,
        progress: watch::Receiver<Progress>,
        task: JoinHandle<AppResult<BatchReport>>,
    ) -> Self {
        Self {
            run_id,
            progress,
            task,
        }
    }

    pub fn run_id(&self) -> u64 {
        self.run_id
    }

    /// 最近一次进度
    pub fn progress(&self) -> Progress {
        *self.progress.borrow()
    }

    /// 订阅进度变化
    pub fn subscribe(&self) -> watch::Receiver<Progress> {
        self.progress.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// 等待批次结束
    pub async fn join(self) -> AppResult<BatchReport> {
        self.task.await.map_err(|e| RunError::TaskFailed {
            message: e.to_string(),
        })?
    }
}
