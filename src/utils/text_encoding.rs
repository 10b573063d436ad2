// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chardetng::EncodingDetector;
use encoding_rs::{Encoding, UTF_8};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

/// 只在文档开头查找 `<meta charset>` 声明
const META_SNIFF_LIMIT: usize = 4096;

static CONTENT_TYPE_CHARSET: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)charset\s*=\s*["']?([^"';\s]+)"#).expect("valid content-type pattern")
});

static HTML_META_CHARSET: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)<meta[^>]*charset\s*=\s*["']?([^"'>\s/;]+)["']?[^>]*>"#)
        .expect("valid meta charset pattern")
});

static XML_DECLARATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)<\?xml[^>]*encoding\s*=\s*["']?([^"'>\s]+)["']?[^>]*\?>"#)
        .expect("valid xml declaration pattern")
});

/// 编码来源
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodingSource {
    /// 字节顺序标记
    Bom,
    /// HTTP Content-Type 头
    ContentType,
    /// 文档内的 meta / xml 声明
    Document,
    /// chardetng 推测
    Detected,
}

/// 解码结果
#[derive(Debug, Clone)]
pub struct DecodedBody {
    pub text: String,
    pub encoding: &'static Encoding,
    pub source: EncodingSource,
    /// 出现了无法映射的字节（已替换为 U+FFFD）
    pub had_errors: bool,
}

impl DecodedBody {
    pub fn encoding_name(&self) -> &'static str {
        self.encoding.name()
    }
}

/// 将响应体解码为 UTF-8 文本
///
/// 编码判定顺序：BOM、Content-Type 的 charset、文档内声明、chardetng 推测。
///
/// # 参数
///
/// * `bytes` - 原始响应体
/// * `content_type` - `Content-Type` 响应头
pub fn decode_body(bytes: &[u8], content_type: Option<&str>) -> DecodedBody {
    let (encoding, source) = pick_encoding(bytes, content_type);
    let (decoded, actual, had_errors) = encoding.decode(bytes);
    if had_errors {
        warn!(
            "Body contained bytes invalid for {}, replaced with U+FFFD",
            actual.name()
        );
    }
    DecodedBody {
        text: decoded.into_owned(),
        encoding: actual,
        source,
        had_errors,
    }
}

fn pick_encoding(bytes: &[u8], content_type: Option<&str>) -> (&'static Encoding, EncodingSource) {
    if let Some((encoding, _)) = Encoding::for_bom(bytes) {
        return (encoding, EncodingSource::Bom);
    }

    if let Some(encoding) = content_type.and_then(charset_from_content_type) {
        return (encoding, EncodingSource::ContentType);
    }

    if let Some(encoding) = charset_from_document(bytes) {
        return (encoding, EncodingSource::Document);
    }

    if std::str::from_utf8(bytes).is_ok() {
        return (UTF_8, EncodingSource::Detected);
    }

    let mut detector = EncodingDetector::new();
    detector.feed(bytes, true);
    let encoding = detector.guess(None, true);
    debug!("Detected body encoding: {}", encoding.name());
    (encoding, EncodingSource::Detected)
}

/// 从 Content-Type 头中解析 charset
pub fn charset_from_content_type(content_type: &str) -> Option<&'static Encoding> {
    CONTENT_TYPE_CHARSET
        .captures(content_type)
        .and_then(|caps| caps.get(1))
        .and_then(|label| Encoding::for_label(label.as_str().trim().as_bytes()))
}

fn charset_from_document(bytes: &[u8]) -> Option<&'static Encoding> {
    let head = &bytes[..bytes.len().min(META_SNIFF_LIMIT)];
    let head = String::from_utf8_lossy(head);

    [&*HTML_META_CHARSET, &*XML_DECLARATION]
        .iter()
        .filter_map(|pattern| pattern.captures(&head))
        .filter_map(|caps| caps.get(1))
        .find_map(|label| Encoding::for_label(label.as_str().as_bytes()))
        // 文档已经是 ASCII 兼容的字节流时，声明为 UTF-16 的 meta 不可信
        .map(|encoding| {
            if encoding == encoding_rs::UTF_16LE || encoding == encoding_rs::UTF_16BE {
                UTF_8
            } else {
                encoding
            }
        })
}
