//! 结果汇总：合并逐页文本并计算统计指标（纯函数，无 I/O）

use crate::model::extraction::{PageDetail, PageResult};

/// 汇总结果
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregate {
    pub extracted_text: String,
    pub character_count: usize,
    pub word_count: usize,
    pub line_count: usize,
    pub page_count: usize,
    pub page_details: Vec<PageDetail>,
}

/// 按页序合并文本（页间空行分隔）并统计字符、单词、行数
pub fn aggregate_pages(pages: &[PageResult], count_empty_page_as_line: bool) -> Aggregate {
    let mut all_text = String::new();
    let mut line_count = 0;
    let mut page_details = Vec::with_capacity(pages.len());

    for page in pages {
        all_text.push_str(&page.text);
        all_text.push_str("\n\n");

        let page_lines = page.line_count(count_empty_page_as_line);
        line_count += page_lines;

        page_details.push(PageDetail {
            page: page.page,
            character_count: page.character_count(),
            line_count: page_lines,
            has_error: page.has_error(),
            error: page.error.clone(),
        });
    }

    let extracted_text = all_text.trim().to_string();

    Aggregate {
        character_count: extracted_text.chars().count(),
        word_count: extracted_text.split_whitespace().count(),
        extracted_text,
        line_count,
        page_count: pages.len(),
        page_details,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_page_hello() {
        let agg = aggregate_pages(&[PageResult::recognized(1, "Hello")], true);
        assert_eq!(agg.extracted_text, "Hello");
        assert_eq!(agg.character_count, 5);
        assert_eq!(agg.word_count, 1);
        assert_eq!(agg.line_count, 1);
        assert_eq!(agg.page_count, 1);
    }

    #[test]
    fn pages_are_joined_with_blank_line() {
        let pages = vec![
            PageResult::recognized(1, "First page\nsecond line"),
            PageResult::recognized(2, "Trang hai"),
        ];
        let agg = aggregate_pages(&pages, true);
        assert_eq!(agg.extracted_text, "First page\nsecond line\n\nTrang hai");
        assert_eq!(agg.word_count, 6);
        assert_eq!(agg.line_count, 3);
        assert_eq!(agg.character_count, agg.extracted_text.chars().count());
        let numbers: Vec<u32> = agg.page_details.iter().map(|d| d.page).collect();
        assert_eq!(numbers, vec![1, 2]);
    }

    #[test]
    fn failed_page_is_flagged_and_empty() {
        let pages = vec![
            PageResult::recognized(1, "Hello"),
            PageResult::failed(2, "[DATA_ERR:IMAGE_DECODE] image decode failed"),
        ];
        let agg = aggregate_pages(&pages, true);
        assert_eq!(agg.extracted_text, "Hello");
        assert_eq!(agg.page_count, 2);
        assert_eq!(agg.line_count, 1);
        assert!(!agg.page_details[0].has_error);
        assert!(agg.page_details[1].has_error);
        assert_eq!(agg.page_details[1].character_count, 0);
        assert_eq!(agg.page_details[1].line_count, 0);
    }

    #[test]
    fn empty_pages_count_as_one_line_unless_disabled() {
        let pages = vec![
            PageResult::recognized(1, ""),
            PageResult::recognized(2, "B"),
            PageResult::recognized(3, ""),
        ];
        let legacy = aggregate_pages(&pages, true);
        assert_eq!(legacy.extracted_text, "B");
        assert_eq!(legacy.line_count, 3);

        let strict = aggregate_pages(&pages, false);
        assert_eq!(strict.line_count, 1);
    }

    #[test]
    fn interior_empty_page_keeps_separators() {
        let pages = vec![
            PageResult::recognized(1, "A"),
            PageResult::recognized(2, ""),
            PageResult::recognized(3, "C"),
        ];
        let agg = aggregate_pages(&pages, true);
        assert_eq!(agg.extracted_text, "A\n\n\n\nC");
        assert_eq!(agg.character_count, 6);
        assert_eq!(agg.word_count, 2);
    }

    #[test]
    fn no_pages_yields_empty_aggregate() {
        let agg = aggregate_pages(&[], true);
        assert_eq!(agg.extracted_text, "");
        assert_eq!(agg.page_count, 0);
        assert!(agg.page_details.is_empty());
    }
}
