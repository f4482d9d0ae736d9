//! 图像缓冲区租约 - 基础设施层
//!
//! 每个阶段产生的图像（二值图、对齐帧、ROI 裁剪）都通过 `ImageLease` 持有，
//! 只属于当前页面的流水线；租约在 drop 时归还给 `BufferLedger`，
//! 成功、软失败、提前返回和 panic 展开都会归还。

use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::trace;

#[derive(Debug, Default)]
struct LedgerCounters {
    acquired: AtomicUsize,
    released: AtomicUsize,
    bytes_live: AtomicUsize,
}

/// 缓冲区账本
///
/// 只做计数，用于确认每个缓冲区都被归还
#[derive(Debug, Clone, Default)]
pub struct BufferLedger {
    counters: Arc<LedgerCounters>,
}

impl BufferLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记一个缓冲区并返回租约
    pub fn lease<T: ImageBytes>(&self, label: &'static str, value: T) -> ImageLease<T> {
        let bytes = value.byte_len();
        self.counters.acquired.fetch_add(1, Ordering::SeqCst);
        self.counters.bytes_live.fetch_add(bytes, Ordering::SeqCst);
        trace!("租用缓冲区 {} ({} 字节)", label, bytes);
        ImageLease {
            value,
            bytes,
            label,
            ledger: self.clone(),
        }
    }

    /// 尚未归还的缓冲区数量
    pub fn live(&self) -> usize {
        self.acquired() - self.released()
    }

    pub fn acquired(&self) -> usize {
        self.counters.acquired.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.counters.released.load(Ordering::SeqCst)
    }

    pub fn bytes_live(&self) -> usize {
        self.counters.bytes_live.load(Ordering::SeqCst)
    }

    fn release(&self, label: &'static str, bytes: usize) {
        self.counters.released.fetch_add(1, Ordering::SeqCst);
        self.counters.bytes_live.fetch_sub(bytes, Ordering::SeqCst);
        trace!("归还缓冲区 {} ({} 字节)", label, bytes);
    }
}

/// 能报告自身字节数的缓冲区
pub trait ImageBytes {
    fn byte_len(&self) -> usize;
}

impl<P, C> ImageBytes for image::ImageBuffer<P, C>
where
    P: image::Pixel,
    C: Deref<Target = [P::Subpixel]>,
{
    fn byte_len(&self) -> usize {
        self.as_raw().len() * std::mem::size_of::<P::Subpixel>()
    }
}

/// 独占的图像缓冲区
#[derive(Debug)]
pub struct ImageLease<T: ImageBytes> {
    value: T,
    bytes: usize,
    label: &'static str,
    ledger: BufferLedger,
}

impl<T: ImageBytes> Deref for ImageLease<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T: ImageBytes> Drop for ImageLease<T> {
    fn drop(&mut self) {
        self.ledger.release(self.label, self.bytes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::GrayImage;

    #[test]
    fn test_lease_is_released_on_drop() {
        let ledger = BufferLedger::new();
        {
            let lease = ledger.lease("binary", GrayImage::new(10, 4));
            assert_eq!(lease.width(), 10);
            assert_eq!(ledger.live(), 1);
            assert_eq!(ledger.bytes_live(), 40);
        }
        assert_eq!(ledger.live(), 0);
        assert_eq!(ledger.bytes_live(), 0);
        assert_eq!(ledger.acquired(), 1);
    }

    #[test]
    fn test_lease_is_released_when_unwinding() {
        let ledger = BufferLedger::new();
        let inner = ledger.clone();
        let outcome = std::panic::catch_unwind(move || {
            let _lease = inner.lease("aligned", GrayImage::new(3, 3));
            panic!("stage blew up");
        });
        assert!(outcome.is_err());
        assert_eq!(ledger.live(), 0);
    }
}
