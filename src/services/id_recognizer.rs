//! 学号识别服务 - 业务能力层

use anyhow::Result;
use futures::future::BoxFuture;
use futures::FutureExt;
use image::RgbImage;

use crate::models::detection::IdRecognition;

/// 学号识别器
///
/// `is_valid` 只表示校验位是否正确，与字符是否清晰无关
pub trait IdRecognizer: Send + Sync {
    fn name(&self) -> &str;

    fn initialize(&self) -> BoxFuture<'_, Result<()>>;

    fn extract<'a>(&'a self, image: &'a RgbImage) -> BoxFuture<'a, Result<IdRecognition>>;
}

/// 未配置 OCR 时使用：所有页面都视为学号无法识别
#[derive(Debug, Clone, Default)]
pub struct DisabledIdRecognizer;

impl IdRecognizer for DisabledIdRecognizer {
    fn name(&self) -> &str {
        "disabled"
    }

    fn initialize(&self) -> BoxFuture<'_, Result<()>> {
        async { Ok(()) }.boxed()
    }

    fn extract<'a>(&'a self, _image: &'a RgbImage) -> BoxFuture<'a, Result<IdRecognition>> {
        async { Ok(IdRecognition::unreadable()) }.boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_recognizer_is_unreadable() {
        let recognizer = DisabledIdRecognizer;
        let image = RgbImage::new(4, 4);
        let result = tokio_test::block_on(recognizer.extract(&image)).unwrap();
        assert!(!result.success);
        assert_eq!(result.validated_id(), None);
    }
}
