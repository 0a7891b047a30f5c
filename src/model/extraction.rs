//! 文字提取接口的数据模型
//! 所有实体都只存活于单个请求内

use super::Language;
use serde::Serialize;

/// 单页识别结果
#[derive(Debug, Clone, PartialEq)]
pub struct PageResult {
    /// 页码，从 1 开始
    pub page: u32,
    pub text: String,
    pub error: Option<String>,
}

impl PageResult {
    pub fn recognized(page: u32, text: impl Into<String>) -> Self {
        Self {
            page,
            text: text.into(),
            error: None,
        }
    }

    /// 识别失败的页：文本为空，并记录错误描述
    pub fn failed(page: u32, error: impl Into<String>) -> Self {
        Self {
            page,
            text: String::new(),
            error: Some(error.into()),
        }
    }

    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }

    /// Unicode 标量计数，越南语声调字符按实际标量计
    pub fn character_count(&self) -> usize {
        self.text.chars().count()
    }

    /// 按换行拆分计行
    ///
    /// 空文本按 `split('\n')` 语义得到一个空段，计为 1 行；
    /// `count_empty_as_line = false` 时计为 0。失败页恒为 0。
    pub fn line_count(&self, count_empty_as_line: bool) -> usize {
        if self.has_error() {
            return 0;
        }
        if self.text.is_empty() {
            return usize::from(count_empty_as_line);
        }
        self.text.split('\n').count()
    }
}

/// `POST /extract-text` 成功响应
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionResponse {
    pub success: bool,
    pub data: ExtractionData,
    pub timestamp: String,
    pub processing_info: ProcessingInfo,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExtractionData {
    pub extracted_text: String,
    pub language: Language,
    pub metrics: Metrics,
    pub file_info: FileInfo,
    pub page_details: Vec<PageDetail>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Metrics {
    pub execution_time_seconds: f64,
    pub character_count: usize,
    pub word_count: usize,
    pub line_count: usize,
    pub page_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileInfo {
    pub filename: String,
    pub size_mb: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageDetail {
    pub page: u32,
    pub character_count: usize,
    pub line_count: usize,
    pub has_error: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessingInfo {
    pub ocr_engine: &'static str,
    pub version: &'static str,
}

/// `GET /` 服务描述
#[derive(Debug, Clone, Serialize)]
pub struct ServiceDescriptor {
    pub service: &'static str,
    pub status: &'static str,
    pub supported_languages: Vec<&'static str>,
    pub supported_formats: Vec<String>,
    pub version: &'static str,
    pub endpoints: Endpoints,
}

#[derive(Debug, Clone, Serialize)]
pub struct Endpoints {
    pub extract_text: &'static str,
    pub health: &'static str,
}

/// 4xx 错误体
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

/// 未处理异常的 500 错误体
#[derive(Debug, Clone, Serialize)]
pub struct FailureBody {
    pub success: bool,
    pub error: String,
    pub message: String,
    pub execution_time_seconds: f64,
    pub timestamp: String,
}
