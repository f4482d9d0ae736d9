//! 检测器与识别器的输出结构

use serde::{Deserialize, Serialize};

use crate::models::sheet::Side;

/// 外接矩形
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BBox {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn center(&self) -> (f32, f32) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn scaled(&self, factor: f32) -> Self {
        Self {
            x: self.x * factor,
            y: self.y * factor,
            width: self.width * factor,
            height: self.height * factor,
        }
    }

    pub fn translated(&self, dx: f32, dy: f32) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
            ..*self
        }
    }
}

/// 检测器在输入图像坐标系下给出的原始结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDetection {
    pub bbox: BBox,
    pub confidence: f32,
    pub class: String,
}

/// 检测器单次调用的输出
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionOutput {
    pub success: bool,
    pub detections: Vec<RawDetection>,
}

/// 换算到对齐帧绝对坐标、并标注所在侧的检测结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub bbox: BBox,
    pub confidence: f32,
    pub class: String,
    pub side: Side,
}

impl Detection {
    /// 把 ROI 局部坐标的原始检测换算为绝对坐标，`scale` 为 ROI 相对对齐帧的缩放
    pub fn from_roi(raw: RawDetection, origin: (u32, u32), scale: f32, side: Side) -> Self {
        Self {
            bbox: raw
                .bbox
                .scaled(scale)
                .translated(origin.0 as f32, origin.1 as f32),
            confidence: raw.confidence.clamp(0.0, 1.0),
            class: raw.class,
            side,
        }
    }
}

/// 学号识别结果
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IdRecognition {
    pub success: bool,
    pub id: Option<String>,
    pub check_digit: Option<char>,
    /// 校验位是否正确，与字符是否清晰无关
    pub is_valid: bool,
    pub confidence: f32,
}

impl IdRecognition {
    /// 识别失败
    pub fn unreadable() -> Self {
        Self::default()
    }

    /// 由识别出的号码与校验位构造，并用模 11 规则计算 `is_valid`
    pub fn from_parts(id: impl Into<String>, check_digit: char, confidence: f32) -> Self {
        let id = id.into();
        let is_valid = crate::services::check_digit::is_valid(&id, check_digit);
        Self {
            success: true,
            id: Some(id),
            check_digit: Some(check_digit.to_ascii_uppercase()),
            is_valid,
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    /// 校验通过时返回号码
    pub fn validated_id(&self) -> Option<&str> {
        if self.success && self.is_valid {
            self.id.as_deref()
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roi_detection_is_translated_to_sheet_coordinates() {
        let raw = RawDetection {
            bbox: BBox::new(10.0, 20.0, 28.0, 28.0),
            confidence: 1.3,
            class: "filled".to_string(),
        };
        let detection = Detection::from_roi(raw, (190, 500), 1.0, Side::Right);
        assert_eq!(detection.bbox.center(), (214.0, 534.0));
        assert_eq!(detection.confidence, 1.0);
        assert_eq!(detection.side, Side::Right);
    }

    #[test]
    fn test_upscaled_roi_detection_is_scaled_back() {
        let raw = RawDetection {
            bbox: BBox::new(100.0, 40.0, 28.0, 28.0),
            confidence: 0.9,
            class: "filled".to_string(),
        };
        let detection = Detection::from_roi(raw, (95, 285), 0.5, Side::Left);
        assert_eq!(detection.bbox, BBox::new(145.0, 305.0, 14.0, 14.0));
    }

    #[test]
    fn test_validated_id_requires_checksum() {
        let ok = IdRecognition::from_parts("12345678", '5', 0.9);
        assert_eq!(ok.validated_id(), Some("12345678"));

        let bad = IdRecognition::from_parts("12345678", '3', 0.9);
        assert!(bad.success);
        assert!(!bad.is_valid);
        assert_eq!(bad.validated_id(), None);

        assert_eq!(IdRecognition::unreadable().validated_id(), None);
    }
}
