use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Local;
use nanoid::nanoid;

use crate::model::extraction::{ErrorBody, FailureBody};
use crate::model::Language;

pub mod aggregate;
pub mod config;
pub mod log;
pub mod processing;
pub mod staging;
pub mod validate;

const REQUEST_ID_ALPHABET: &[char] = &[
    '0', '1', '2', '3', '4', '5', '6', '7', '8', '9', 'a', 'b', 'c', 'd', 'e', 'f', 'g', 'h', 'j',
    'k', 'm', 'n', 'p', 'q', 'r', 's', 't', 'u', 'v', 'w', 'x', 'y', 'z',
];
const REQUEST_ID_LEN: usize = 12;

/// 错误分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Validation,
    PayloadTooLarge,
    NotFound,
    MethodNotAllowed,
    Processing,
    Unhandled,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Validation => "validation",
            ErrorCategory::PayloadTooLarge => "payload_too_large",
            ErrorCategory::NotFound => "not_found",
            ErrorCategory::MethodNotAllowed => "method_not_allowed",
            ErrorCategory::Processing => "processing",
            ErrorCategory::Unhandled => "unhandled",
        }
    }
}

/// 请求级错误；`Display` 即响应体中的 `error` 字段
#[derive(Debug, Clone, thiserror::Error)]
pub enum ApiError {
    #[error("No file provided")]
    NoFileProvided,
    #[error("No file selected")]
    NoFileSelected,
    #[error("Invalid file format")]
    InvalidFileFormat,
    #[error("Unsupported language")]
    UnsupportedLanguage,
    #[error("PDF processing failed")]
    PdfProcessingFailed,
    #[error("File too large")]
    PayloadTooLarge { max_mb: u64 },
    #[error("Endpoint not found")]
    NotFound,
    #[error("Method not allowed")]
    MethodNotAllowed,
    #[error("Processing failed")]
    Unhandled {
        message: String,
        execution_time_seconds: f64,
    },
}

impl ApiError {
    pub fn unhandled(message: impl ToString, elapsed: std::time::Duration) -> Self {
        ApiError::Unhandled {
            message: message.to_string(),
            execution_time_seconds: round_to(elapsed.as_secs_f64(), 3),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            ApiError::NoFileProvided
            | ApiError::NoFileSelected
            | ApiError::InvalidFileFormat
            | ApiError::UnsupportedLanguage => ErrorCategory::Validation,
            ApiError::PdfProcessingFailed => ErrorCategory::Processing,
            ApiError::PayloadTooLarge { .. } => ErrorCategory::PayloadTooLarge,
            ApiError::NotFound => ErrorCategory::NotFound,
            ApiError::MethodNotAllowed => ErrorCategory::MethodNotAllowed,
            ApiError::Unhandled { .. } => ErrorCategory::Unhandled,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self.category() {
            ErrorCategory::Validation | ErrorCategory::Processing => StatusCode::BAD_REQUEST,
            ErrorCategory::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ErrorCategory::NotFound => StatusCode::NOT_FOUND,
            ErrorCategory::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ErrorCategory::Unhandled => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn message(&self) -> String {
        match self {
            ApiError::NoFileProvided => {
                "Please upload a PDF file using the \"file\" parameter".to_string()
            }
            ApiError::NoFileSelected => "Please select a file to upload".to_string(),
            ApiError::InvalidFileFormat => "Only PDF files are supported".to_string(),
            ApiError::UnsupportedLanguage => {
                format!("Supported languages: {}", Language::supported_codes().join(", "))
            }
            ApiError::PdfProcessingFailed => "Could not extract pages from PDF".to_string(),
            ApiError::PayloadTooLarge { max_mb } => format!("Maximum file size is {}MB", max_mb),
            ApiError::NotFound | ApiError::MethodNotAllowed => {
                "Available endpoints: / (GET), /extract-text (POST)".to_string()
            }
            ApiError::Unhandled { message, .. } => message.clone(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            ApiError::Unhandled {
                message,
                execution_time_seconds,
            } => {
                let body = FailureBody {
                    success: false,
                    error: self.to_string(),
                    message: message.clone(),
                    execution_time_seconds: *execution_time_seconds,
                    timestamp: iso_timestamp(),
                };
                (status, Json(body)).into_response()
            }
            _ => {
                let body = ErrorBody {
                    error: self.to_string(),
                    message: self.message(),
                };
                (status, Json(body)).into_response()
            }
        }
    }
}

/// 生成请求ID（12位小写字母数字，去除易混淆字符）
pub fn generate_request_id() -> String {
    nanoid!(REQUEST_ID_LEN, REQUEST_ID_ALPHABET)
}

/// 本地时间 ISO-8601，精确到微秒
pub fn iso_timestamp() -> String {
    Local::now().format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
}

pub fn round_to(value: f64, digits: i32) -> f64 {
    let factor = 10f64.powi(digits);
    (value * factor).round() / factor
}

/// 通过创建临时文件判断目录是否可写
pub fn dir_is_writable(dir: &std::path::Path) -> bool {
    tempfile::Builder::new()
        .prefix(".write_test")
        .tempfile_in(dir)
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn validation_errors_are_bad_requests() {
        for err in [
            ApiError::NoFileProvided,
            ApiError::NoFileSelected,
            ApiError::InvalidFileFormat,
            ApiError::UnsupportedLanguage,
            ApiError::PdfProcessingFailed,
        ] {
            assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        }
        assert_eq!(
            ApiError::PayloadTooLarge { max_mb: 16 }.status(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(ApiError::NotFound.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn messages_match_public_contract() {
        assert_eq!(ApiError::UnsupportedLanguage.message(), "Supported languages: en, vi");
        assert_eq!(
            ApiError::PayloadTooLarge { max_mb: 16 }.message(),
            "Maximum file size is 16MB"
        );
        assert_eq!(ApiError::InvalidFileFormat.to_string(), "Invalid file format");
    }

    #[test]
    fn unhandled_error_rounds_elapsed_time() {
        let err = ApiError::unhandled("boom", Duration::from_millis(1234));
        assert_eq!(err.category(), ErrorCategory::Unhandled);
        match err {
            ApiError::Unhandled {
                execution_time_seconds,
                ..
            } => assert_eq!(execution_time_seconds, 1.234),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn request_ids_are_distinct() {
        let a = generate_request_id();
        let b = generate_request_id();
        assert_eq!(a.len(), REQUEST_ID_LEN);
        assert_ne!(a, b);
    }

    #[test]
    fn writable_dir_probe_leaves_nothing_behind() {
        let dir = tempfile::TempDir::new().unwrap();
        assert!(dir_is_writable(dir.path()));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
        assert!(!dir_is_writable(&dir.path().join("missing")));
    }

    #[test]
    fn rounding() {
        assert_eq!(round_to(0.123456, 3), 0.123);
        assert_eq!(round_to(1.005_9, 2), 1.01);
    }
}
