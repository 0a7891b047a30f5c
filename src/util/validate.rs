//! 上传请求校验
//! 依次检查：文件是否存在、文件名是否为空、扩展名、语言代码；返回第一个失败项

use axum::body::Bytes;
use unicode_normalization::UnicodeNormalization;

use crate::model::Language;
use crate::util::ApiError;

const MAX_FILENAME_LEN: usize = 128;
const FALLBACK_FILENAME: &str = "document.pdf";

/// 从 multipart 表单中收集的原始字段
#[derive(Debug, Clone, Default)]
pub struct UploadForm {
    pub file: Option<UploadPart>,
    pub language: Option<String>,
}

/// `file` 字段；`filename` 为 None 表示该字段不是文件
#[derive(Debug, Clone)]
pub struct UploadPart {
    pub filename: Option<String>,
    pub bytes: Bytes,
}

/// 校验通过的上传
#[derive(Debug, Clone)]
pub struct ValidatedUpload {
    /// 清洗后的文件名，用于暂存命名与响应回显
    pub filename: String,
    pub language: Language,
    pub bytes: Bytes,
}

pub fn validate_upload(
    form: UploadForm,
    allowed_extensions: &[String],
) -> Result<ValidatedUpload, ApiError> {
    let part = form.file.ok_or(ApiError::NoFileProvided)?;
    let original = part.filename.ok_or(ApiError::NoFileProvided)?;
    if original.is_empty() {
        return Err(ApiError::NoFileSelected);
    }
    if !allowed_file(&original, allowed_extensions) {
        return Err(ApiError::InvalidFileFormat);
    }

    let language = match form.language {
        None => Language::default(),
        Some(code) => Language::parse(&code).ok_or(ApiError::UnsupportedLanguage)?,
    };

    Ok(ValidatedUpload {
        filename: secure_filename(&original),
        language,
        bytes: part.bytes,
    })
}

/// 最后一个 `.` 之后的扩展名（小写）需在白名单内
pub fn allowed_file(filename: &str, allowed_extensions: &[String]) -> bool {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
        .is_some_and(|ext| allowed_extensions.iter().any(|a| a.eq_ignore_ascii_case(&ext)))
}

/// 清洗文件名
///
/// 兼容分解（NFKD）后丢弃非 ASCII 字符，越南语声调字母折叠为基本字母；
/// 路径分隔符按空白处理，空白分隔的片段以 `_` 连接，
/// 其余不在 [A-Za-z0-9._-] 内的字符直接删除，最后去掉首尾的 `.`/`_`。
pub fn secure_filename(filename: &str) -> String {
    let folded: String = filename
        .nfkd()
        .filter(char::is_ascii)
        .map(|ch| if matches!(ch, '/' | '\\') { ' ' } else { ch })
        .collect();

    let joined = folded.split_whitespace().collect::<Vec<_>>().join("_");
    let kept: String = joined
        .chars()
        .filter(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.'))
        .collect();

    let trimmed = kept.trim_matches(['.', '_']);
    if !trimmed.contains(|c: char| c.is_ascii_alphanumeric()) {
        return FALLBACK_FILENAME.to_string();
    }

    if trimmed.len() > MAX_FILENAME_LEN {
        // 截断时保留扩展名
        let (stem, ext) = trimmed.rsplit_once('.').unwrap_or((trimmed, ""));
        let keep = MAX_FILENAME_LEN.saturating_sub(ext.len() + 1);
        return format!("{}.{}", &stem[..keep.min(stem.len())], ext);
    }
    trimmed.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pdf_only() -> Vec<String> {
        vec!["pdf".to_string()]
    }

    fn form(filename: Option<&str>, language: Option<&str>) -> UploadForm {
        UploadForm {
            file: Some(UploadPart {
                filename: filename.map(str::to_string),
                bytes: Bytes::from_static(b"%PDF-1.4"),
            }),
            language: language.map(str::to_string),
        }
    }

    #[test]
    fn missing_file_part() {
        let err = validate_upload(UploadForm::default(), &pdf_only()).unwrap_err();
        assert!(matches!(err, ApiError::NoFileProvided));

        let err = validate_upload(form(None, None), &pdf_only()).unwrap_err();
        assert!(matches!(err, ApiError::NoFileProvided));
    }

    #[test]
    fn empty_filename() {
        let err = validate_upload(form(Some(""), None), &pdf_only()).unwrap_err();
        assert!(matches!(err, ApiError::NoFileSelected));
    }

    #[test]
    fn extension_checked_before_language() {
        let err = validate_upload(form(Some("scan.png"), Some("fr")), &pdf_only()).unwrap_err();
        assert!(matches!(err, ApiError::InvalidFileFormat));

        let err = validate_upload(form(Some("pdf"), None), &pdf_only()).unwrap_err();
        assert!(matches!(err, ApiError::InvalidFileFormat));
    }

    #[test]
    fn unsupported_language() {
        let err = validate_upload(form(Some("a.pdf"), Some("fr")), &pdf_only()).unwrap_err();
        assert!(matches!(err, ApiError::UnsupportedLanguage));

        let err = validate_upload(form(Some("a.pdf"), Some("")), &pdf_only()).unwrap_err();
        assert!(matches!(err, ApiError::UnsupportedLanguage));
    }

    #[test]
    fn language_defaults_to_english_and_is_case_insensitive() {
        let ok = validate_upload(form(Some("Report.PDF"), None), &pdf_only()).unwrap();
        assert_eq!(ok.language, Language::En);
        assert_eq!(ok.filename, "Report.PDF");

        let ok = validate_upload(form(Some("a.pdf"), Some("VI")), &pdf_only()).unwrap();
        assert_eq!(ok.language, Language::Vi);
    }

    #[test]
    fn filenames_are_sanitized() {
        assert_eq!(secure_filename("my report (1).pdf"), "my_report_1.pdf");
        assert_eq!(secure_filename("../../etc/passwd.pdf"), "etc_passwd.pdf");
        assert_eq!(secure_filename("C:\\docs\\scan.pdf"), "C_docs_scan.pdf");
        assert_eq!(secure_filename(".hidden.pdf"), "hidden.pdf");
        assert_eq!(secure_filename("report.pdf_"), "report.pdf");
        assert_eq!(secure_filename("...."), FALLBACK_FILENAME);

        let long = format!("{}.pdf", "a".repeat(300));
        let cleaned = secure_filename(&long);
        assert_eq!(cleaned.len(), MAX_FILENAME_LEN);
        assert!(cleaned.ends_with(".pdf"));
    }

    #[test]
    fn vietnamese_filenames_fold_to_ascii() {
        assert_eq!(secure_filename("tài liệu.pdf"), "tai_lieu.pdf");
        assert_eq!(secure_filename("Báo cáo 2024.pdf"), "Bao_cao_2024.pdf");
        // 预组合与分解形式得到相同结果
        assert_eq!(secure_filename("Ha\u{0300} Nô\u{0323}i.pdf"), "Ha_Noi.pdf");
        assert_eq!(secure_filename("Hà Nội.pdf"), "Ha_Noi.pdf");
        // đ 没有分解形式，按非 ASCII 删除
        assert_eq!(secure_filename("đơn.pdf"), "on.pdf");
        assert_eq!(secure_filename("文件.pdf"), "pdf");
        assert_eq!(secure_filename("文件"), FALLBACK_FILENAME);
    }

    #[test]
    fn vietnamese_upload_echoes_folded_name() {
        let ok = validate_upload(form(Some("Báo cáo quý 3.pdf"), Some("vi")), &pdf_only()).unwrap();
        assert_eq!(ok.filename, "Bao_cao_quy_3.pdf");
        assert_eq!(ok.language, Language::Vi);
    }
}
