//! POST /extract-text
//!
//! 校验 → 暂存 → 光栅化 → 逐页识别 → 汇总 → 响应。暂存文件由 `StagedUpload` 持有，
//! 任一分支返回时都会被删除。

use crate::build_info;
use crate::model::extraction::{
    ExtractionData, ExtractionResponse, FileInfo, Metrics, PageResult, ProcessingInfo,
};
use crate::util::aggregate::aggregate_pages;
use crate::util::processing::extract_pages;
use crate::util::staging::StagedUpload;
use crate::util::validate::{validate_upload, UploadForm, UploadPart, ValidatedUpload};
use crate::util::{generate_request_id, iso_timestamp, round_to, ApiError};
use crate::AppState;
use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::{Multipart, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use std::time::Instant;
use tracing::{error, info, warn, Instrument};

const OCR_ENGINE_NAME: &str = "PaddleOCR";

pub async fn extract_text(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    let request_id = generate_request_id();
    let span = tracing::info_span!("extract", request_id = %request_id);
    handle_extract(app_state, headers, multipart)
        .instrument(span)
        .await
}

async fn handle_extract(
    app_state: AppState,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    let started = Instant::now();
    let max_mb = app_state.config.upload.max_file_mb;

    // 声明的长度超限时不读取请求体
    if content_length(&headers).is_some_and(|len| len > app_state.config.upload.max_file_bytes()) {
        warn!(event = "extract.rejected", reason = "content_length", max_mb);
        return ApiError::PayloadTooLarge { max_mb }.into_response();
    }

    let form = match multipart {
        Ok(multipart) => match read_upload_form(multipart, max_mb).await {
            Ok(form) => form,
            Err(err) => return reject(err),
        },
        Err(rejection) => {
            warn!(event = "extract.rejected", reason = "not_multipart", detail = %rejection.body_text());
            UploadForm::default()
        }
    };

    let upload = match validate_upload(form, &app_state.config.upload.allowed_extensions) {
        Ok(upload) => upload,
        Err(err) => return reject(err),
    };

    info!(
        event = "extract.request.received",
        filename = %upload.filename,
        language = %upload.language,
        size_bytes = upload.bytes.len()
    );

    let span = tracing::Span::current();
    let task_state = app_state.clone();
    let outcome = tokio::task::spawn_blocking(move || {
        let _entered = span.enter();
        process_upload(&task_state, upload, started)
    })
    .await;

    match outcome {
        Ok(Ok(response)) => {
            info!(
                event = "extract.completed",
                pages = response.data.metrics.page_count,
                characters = response.data.metrics.character_count,
                elapsed_secs = response.data.metrics.execution_time_seconds
            );
            (StatusCode::OK, Json(response)).into_response()
        }
        Ok(Err(err)) => reject(err),
        Err(join_err) => {
            error!(event = "extract.failed", error = %join_err);
            ApiError::unhandled(
                format!("extraction task aborted: {}", join_err),
                started.elapsed(),
            )
            .into_response()
        }
    }
}

fn reject(err: ApiError) -> Response {
    if matches!(err, ApiError::Unhandled { .. }) {
        error!(event = "extract.failed", error = %err, message = %err.message());
    } else {
        warn!(
            event = "extract.rejected",
            category = err.category().as_str(),
            error = %err
        );
    }
    err.into_response()
}

fn content_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(header::CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

/// 读取 `file` 与 `language` 字段；同名字段只取第一个
async fn read_upload_form(mut multipart: Multipart, max_mb: u64) -> Result<UploadForm, ApiError> {
    let mut form = UploadForm::default();
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(err) => return Err(multipart_error(err, max_mb)),
        };

        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" if form.file.is_none() => {
                let filename = field.file_name().map(str::to_string);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|err| multipart_error(err, max_mb))?;
                form.file = Some(UploadPart { filename, bytes });
            }
            "language" if form.language.is_none() => {
                let value = field
                    .text()
                    .await
                    .map_err(|err| multipart_error(err, max_mb))?;
                form.language = Some(value);
            }
            _ => {}
        }
    }
    Ok(form)
}

/// 超出请求体上限时为 413，其余格式错误按缺少文件处理
fn multipart_error(err: MultipartError, max_mb: u64) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge { max_mb }
    } else {
        warn!(event = "extract.multipart.invalid", error = %err.body_text());
        ApiError::NoFileProvided
    }
}

/// 阻塞部分：暂存、光栅化、识别与汇总
fn process_upload(
    app_state: &AppState,
    upload: ValidatedUpload,
    started: Instant,
) -> Result<ExtractionResponse, ApiError> {
    let config = &app_state.config;
    let ValidatedUpload {
        filename,
        language,
        bytes,
    } = upload;

    let staged = StagedUpload::stage(&config.staging_dir(), &filename, &bytes).map_err(|e| {
        ApiError::unhandled(format!("Could not stage upload: {}", e), started.elapsed())
    })?;
    drop(bytes);

    let pages = match app_state.rasterizer.rasterize(staged.path()) {
        Ok(pages) if !pages.is_empty() => pages,
        Ok(_) => {
            warn!(event = "extract.rasterize.empty");
            return Err(ApiError::PdfProcessingFailed);
        }
        Err(err) => {
            warn!(event = "extract.rasterize.failed", error = %format!("{:#}", err));
            return Err(ApiError::PdfProcessingFailed);
        }
    };

    app_state
        .recognizer
        .prepare(language)
        .map_err(|e| ApiError::unhandled(format!("{:#}", e), started.elapsed()))?;

    let results = extract_pages(app_state.recognizer.as_ref(), &pages, language);
    drop(pages);

    if results.iter().all(PageResult::has_error) {
        let first = results
            .iter()
            .find_map(|page| page.error.as_deref())
            .unwrap_or("unknown error");
        return Err(ApiError::unhandled(
            format!("OCR failed on all {} pages: {}", results.len(), first),
            started.elapsed(),
        ));
    }

    let aggregate = aggregate_pages(&results, config.ocr.count_empty_page_as_line);
    let size_mb = staged.size_mb();
    staged.cleanup();

    Ok(ExtractionResponse {
        success: true,
        data: ExtractionData {
            extracted_text: aggregate.extracted_text,
            language,
            metrics: Metrics {
                execution_time_seconds: round_to(started.elapsed().as_secs_f64(), 3),
                character_count: aggregate.character_count,
                word_count: aggregate.word_count,
                line_count: aggregate.line_count,
                page_count: aggregate.page_count,
            },
            file_info: FileInfo {
                filename,
                size_mb,
            },
            page_details: aggregate.page_details,
        },
        timestamp: iso_timestamp(),
        processing_info: ProcessingInfo {
            ocr_engine: OCR_ENGINE_NAME,
            version: build_info::service_version(),
        },
    })
}
