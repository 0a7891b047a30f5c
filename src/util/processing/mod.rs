//! PDF 光栅化与逐页文字识别
//!
//! 两个外部协作者以 trait 形式接入：
//! - `PageRasterizer`：PDF 路径 → 按页序排列的位图
//! - `TextRecognizer`：位图 + 语言 → 识别文本
//!
//! 均为阻塞调用，由上层放在 `spawn_blocking` 中执行。

use anyhow::{anyhow, Context, Result};
use image::DynamicImage;
use ocr_conn::ocr::{EngineRegistry, ImageData, OcrEngineOptions};
use ocr_conn::PageImage;
use std::path::Path;
use tracing::{debug, warn};

use crate::model::extraction::PageResult;
use crate::model::Language;
use crate::util::config::Config;

pub trait PageRasterizer: Send + Sync {
    /// 渲染全部页面，页码从 1 开始且严格递增
    fn rasterize(&self, pdf_path: &Path) -> Result<Vec<PageImage>>;
}

pub trait TextRecognizer: Send + Sync {
    /// 确保该语言的识别实例可用（首次调用时初始化）
    fn prepare(&self, _language: Language) -> Result<()> {
        Ok(())
    }

    /// 识别单页，返回按行拼接、去除首尾空白的文本
    fn recognize(&self, image: &DynamicImage, language: Language) -> Result<String>;
}

/// 基于 poppler（pdf2image）的光栅化实现
#[derive(Debug, Clone)]
pub struct PopplerRasterizer {
    zoom: f32,
}

impl PopplerRasterizer {
    pub fn new(zoom: f32) -> Self {
        Self { zoom }
    }
}

impl PageRasterizer for PopplerRasterizer {
    fn rasterize(&self, pdf_path: &Path) -> Result<Vec<PageImage>> {
        ocr_conn::pdf_render_pages(pdf_path, self.zoom)
            .map_err(|e| anyhow!("{}", e))
            .with_context(|| format!("failed to render {}", pdf_path.display()))
    }
}

/// 基于 PaddleOCR-json 的识别实现，每种语言一个常驻引擎
pub struct PaddleRecognizer {
    registry: EngineRegistry,
}

impl PaddleRecognizer {
    pub fn from_config(config: &Config) -> Self {
        let registry = EngineRegistry::new(
            Language::ALL
                .into_iter()
                .map(|language| (language.as_str(), config.engine_options(language))),
        );
        Self { registry }
    }

    pub fn with_options<I>(languages: I) -> Self
    where
        I: IntoIterator<Item = (Language, OcrEngineOptions)>,
    {
        let registry = EngineRegistry::new(
            languages
                .into_iter()
                .map(|(language, options)| (language.as_str(), options)),
        );
        Self { registry }
    }

    pub fn registry(&self) -> &EngineRegistry {
        &self.registry
    }

    /// 启动时预先拉起全部语言的引擎
    pub fn prewarm(&self) -> Vec<(Language, Result<()>)> {
        Language::ALL
            .into_iter()
            .map(|language| (language, self.prepare(language)))
            .collect()
    }
}

impl TextRecognizer for PaddleRecognizer {
    fn prepare(&self, language: Language) -> Result<()> {
        self.registry
            .engine(language.as_str())
            .map(|_| ())
            .with_context(|| format!("OCR engine for '{}' could not be started", language))
    }

    fn recognize(&self, image: &DynamicImage, language: Language) -> Result<String> {
        let data = ImageData::from_image(image).map_err(|e| anyhow!(e))?;
        self.registry
            .recognize(language.as_str(), &data)
            .map_err(|e| anyhow!(e))
    }
}

/// 逐页识别；单页失败记为带错误标记的空文本页，不中断其余页面
pub fn extract_pages(
    recognizer: &dyn TextRecognizer,
    pages: &[PageImage],
    language: Language,
) -> Vec<PageResult> {
    pages
        .iter()
        .map(|page| match recognizer.recognize(&page.image, language) {
            Ok(text) => {
                debug!(
                    event = "extract.page.done",
                    page = page.page,
                    chars = text.chars().count()
                );
                PageResult::recognized(page.page, text)
            }
            Err(err) => {
                warn!(event = "extract.page.failed", page = page.page, error = %err);
                PageResult::failed(page.page, format!("OCR failed for page {}: {}", page.page, err))
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    struct FailingOn(u32);

    impl TextRecognizer for FailingOn {
        fn recognize(&self, image: &DynamicImage, _language: Language) -> Result<String> {
            if image.width() == self.0 {
                Err(anyhow!("[DATA_ERR:IMAGE_DECODE] image decode failed"))
            } else {
                Ok(format!("width {}", image.width()))
            }
        }
    }

    fn page(page: u32, width: u32) -> PageImage {
        PageImage {
            page,
            image: DynamicImage::ImageRgb8(RgbImage::new(width, 20)),
        }
    }

    #[test]
    fn page_failure_is_isolated() {
        let pages = vec![page(1, 30), page(2, 40), page(3, 50)];
        let results = extract_pages(&FailingOn(40), &pages, Language::En);

        assert_eq!(results.len(), 3);
        assert_eq!(results[0], PageResult::recognized(1, "width 30"));
        assert!(results[1].has_error());
        assert_eq!(results[1].text, "");
        assert!(results[1]
            .error
            .as_deref()
            .unwrap()
            .starts_with("OCR failed for page 2"));
        assert_eq!(results[2].text, "width 50");
    }

    #[test]
    fn rasterizer_reports_unreadable_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let empty = dir.path().join("empty.pdf");
        std::fs::write(&empty, b"").unwrap();
        assert!(PopplerRasterizer::new(2.0).rasterize(&empty).is_err());
    }

    #[test]
    fn recognizer_without_engine_fails_to_prepare() {
        let recognizer = PaddleRecognizer::with_options([(
            Language::Vi,
            OcrEngineOptions {
                work_dir: Some(std::env::temp_dir().join("missing-paddle-engine")),
                ..Default::default()
            },
        )]);
        assert!(recognizer.prepare(Language::Vi).is_err());
        assert!(recognizer.prepare(Language::En).is_err());
        assert!(!recognizer.registry().is_initialized("vi"));
    }

    #[test]
    fn undersized_page_is_rejected_before_engine_start() {
        let recognizer = PaddleRecognizer::with_options([(
            Language::En,
            OcrEngineOptions {
                work_dir: Some(std::env::temp_dir().join("missing-paddle-engine")),
                ..Default::default()
            },
        )]);
        let tiny = DynamicImage::ImageRgb8(RgbImage::new(8, 8));
        let err = recognizer.recognize(&tiny, Language::En).unwrap_err();
        assert!(err.to_string().starts_with("[DATA_ERR:IMAGE_TOO_SMALL]"), "{err}");
        assert!(!recognizer.registry().is_initialized("en"));
    }
}
