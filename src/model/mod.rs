use serde::{Deserialize, Serialize};
use std::fmt;

pub mod extraction;

/// 支持的识别语言
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    Vi,
}

impl Language {
    pub const ALL: [Language; 2] = [Language::En, Language::Vi];

    pub fn as_str(&self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Vi => "vi",
        }
    }

    /// 解析表单中的语言代码（忽略大小写，不去除空白）
    pub fn parse(code: &str) -> Option<Self> {
        match code.to_lowercase().as_str() {
            "en" => Some(Language::En),
            "vi" => Some(Language::Vi),
            _ => None,
        }
    }

    pub fn supported_codes() -> Vec<&'static str> {
        Self::ALL.iter().map(Language::as_str).collect()
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_codes_case_insensitively() {
        assert_eq!(Language::parse("en"), Some(Language::En));
        assert_eq!(Language::parse("VI"), Some(Language::Vi));
        assert_eq!(Language::parse(""), None);
        assert_eq!(Language::parse(" en"), None);
        assert_eq!(Language::parse("fr"), None);
    }

    #[test]
    fn serializes_as_lowercase_code() {
        assert_eq!(serde_json::to_string(&Language::Vi).unwrap(), "\"vi\"");
        assert_eq!(Language::supported_codes(), vec!["en", "vi"]);
        assert_eq!(Language::default(), Language::En);
    }
}
