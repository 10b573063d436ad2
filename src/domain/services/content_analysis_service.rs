// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::config::settings::AnalyzerSettings;
use crate::domain::models::content::{
    ContentAnalysis, ContentStats, DetectionMethod, ImageInfo, LanguageInfo, LinkInfo, PageMeta,
};
use crate::utils::errors::AnalysisError;
use crate::utils::language::{detect_language, is_cjk, primary_language_tag};
use crate::utils::url_utils::{is_navigable_href, is_same_site, resolve_url};
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Node, Selector};
use std::borrow::Cow;
use std::collections::HashSet;
use tracing::{debug, warn};
use url::Url;

static BASE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("base[href]").expect("valid base selector"));
static BODY_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("body").expect("valid body selector"));
static TITLE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("title").expect("valid title selector"));
static META_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("meta[content]").expect("valid meta selector"));
static LINK_REL_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("link[rel][href]").expect("valid link selector"));
static ANCHOR_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a[href], area[href]").expect("valid anchor selector"));
static IMAGE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("img").expect("valid image selector"));

/// 产生换行的块级标签
const BLOCK_TAGS: &[&str] = &[
    "address", "article", "aside", "blockquote", "dd", "details", "div", "dl", "dt",
    "fieldset", "figcaption", "figure", "footer", "form", "h1", "h2", "h3", "h4", "h5", "h6",
    "header", "hr", "li", "main", "nav", "ol", "p", "pre", "section", "summary", "table", "td",
    "th", "tr", "ul",
];

const SENTENCE_TERMINATORS: &[char] = &['.', '!', '?', '。', '！', '？'];

/// 仅有 `<html lang>` 声明时采用的可信度
const DECLARED_CONFIDENCE: f64 = 0.5;

/// 内容分析服务
///
/// 从 HTML 中得到正文文本、页面元信息、语言、链接与图片清单以及文本统计。
pub struct ContentAnalysisService {
    excluded_tags: HashSet<String>,
    content_selectors: Vec<Selector>,
    words_per_minute: u32,
    min_language_confidence: f64,
}

impl ContentAnalysisService {
    pub fn new(settings: &AnalyzerSettings) -> Self {
        let content_selectors = settings
            .content_selectors
            .iter()
            .filter_map(|raw| match Selector::parse(raw) {
                Ok(selector) => Some(selector),
                Err(e) => {
                    warn!("Ignoring invalid content selector '{}': {:?}", raw, e);
                    None
                }
            })
            .collect();

        Self {
            excluded_tags: settings
                .excluded_tags
                .iter()
                .map(|t| t.trim().to_ascii_lowercase())
                .collect(),
            content_selectors,
            words_per_minute: settings.words_per_minute.max(1),
            min_language_confidence: settings.min_language_confidence,
        }
    }

    /// 分析页面内容
    ///
    /// # 参数
    ///
    /// * `html` - 渲染后的 DOM，渲染失败时为原始 HTML
    /// * `base_url` - 页面最终 URL，用于把相对链接转为绝对链接
    ///
    /// # 返回值
    ///
    /// * `Ok(ContentAnalysis)` - 分析结果
    /// * `Err(AnalysisError)` - 文档为空
    pub fn analyze(&self, html: &str, base_url: &Url) -> Result<ContentAnalysis, AnalysisError> {
        // stray NUL characters are dropped instead of leaking into text and attributes
        let html: Cow<'_, str> = if html.contains('\0') {
            Cow::Owned(html.replace('\0', ""))
        } else {
            Cow::Borrowed(html)
        };
        if html.trim().is_empty() {
            return Err(AnalysisError::EmptyDocument);
        }

        let document = Html::parse_document(&html);
        let base = document_base(&document, base_url);

        let clean_text = self.clean_text(&document);
        let meta = page_meta(&document, &base);
        let language = self.language(&document, &clean_text);
        let links = links(&document, &base, base_url);
        let images = images(&document, &base);
        let stats = self.stats(&clean_text, language.as_ref(), &links, &images);

        debug!(
            "Analyzed {}: {} words, {} links, {} images",
            base, stats.word_count, stats.link_count, stats.image_count
        );

        Ok(ContentAnalysis {
            clean_text,
            meta,
            language,
            links,
            images,
            stats,
        })
    }

    fn clean_text(&self, document: &Html) -> String {
        let roots = self.content_roots(document);
        let mut raw = String::new();
        for root in roots {
            self.collect_text(root, &mut raw);
            raw.push('\n');
        }

        raw.lines()
            .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// 配置了正文选择器且有匹配时只取最外层的匹配区域，否则取 `<body>`
    fn content_roots<'a>(&self, document: &'a Html) -> Vec<ElementRef<'a>> {
        let matched: Vec<ElementRef<'a>> = self
            .content_selectors
            .iter()
            .flat_map(|selector| document.select(selector))
            .collect();
        if !matched.is_empty() {
            let ids: HashSet<_> = matched.iter().map(|el| el.id()).collect();
            return document
                .root_element()
                .descendants()
                .filter_map(ElementRef::wrap)
                .filter(|el| ids.contains(&el.id()))
                .filter(|el| !el.ancestors().any(|a| ids.contains(&a.id())))
                .collect();
        }

        document
            .select(&BODY_SELECTOR)
            .next()
            .map(|body| vec![body])
            .unwrap_or_else(|| vec![document.root_element()])
    }

    /// 按文档顺序收集可见文本
    ///
    /// 使用显式栈遍历，嵌套层数再深也不会耗尽线程栈。
    fn collect_text(&self, root: ElementRef, out: &mut String) {
        let mut stack = Vec::new();
        push_children(root, &mut stack);

        while let Some(work) = stack.pop() {
            match work {
                TextWork::Text(text) => {
                    out.extend(text.chars().map(|c| if c.is_whitespace() { ' ' } else { c }));
                }
                TextWork::Break => out.push('\n'),
                TextWork::Enter(element) => {
                    let name = element.value().name();
                    if self.excluded_tags.contains(name) || is_hidden(element) {
                        continue;
                    }
                    if name == "br" {
                        out.push('\n');
                        continue;
                    }
                    if BLOCK_TAGS.contains(&name) {
                        out.push('\n');
                        stack.push(TextWork::Break);
                    }
                    push_children(element, &mut stack);
                }
            }
        }
    }

    fn language(&self, document: &Html, clean_text: &str) -> Option<LanguageInfo> {
        let declared = document
            .root_element()
            .value()
            .attr("lang")
            .and_then(primary_language_tag);
        let detected = detect_language(clean_text);

        match (detected, declared) {
            (Some(detection), declared) if detection.confidence >= self.min_language_confidence => {
                Some(LanguageInfo {
                    code: detection.code.to_string(),
                    confidence: detection.confidence,
                    method: DetectionMethod::Text,
                    declared,
                    detected: Some(detection.code.to_string()),
                })
            }
            (detection, Some(declared)) => {
                let confidence = match &detection {
                    Some(d) if d.code == declared => d.confidence.max(DECLARED_CONFIDENCE),
                    _ => DECLARED_CONFIDENCE,
                };
                Some(LanguageInfo {
                    code: declared.clone(),
                    confidence,
                    method: DetectionMethod::Declared,
                    declared: Some(declared),
                    detected: detection.map(|d| d.code.to_string()),
                })
            }
            (Some(detection), None) => Some(LanguageInfo {
                code: detection.code.to_string(),
                confidence: detection.confidence,
                method: DetectionMethod::Text,
                declared: None,
                detected: Some(detection.code.to_string()),
            }),
            (None, None) => None,
        }
    }

    fn stats(
        &self,
        clean_text: &str,
        language: Option<&LanguageInfo>,
        links: &[LinkInfo],
        images: &[ImageInfo],
    ) -> ContentStats {
        let word_count = count_words(clean_text);
        let internal_link_count = links.iter().filter(|l| l.internal).count();
        let reading_time = word_count as f64 / self.words_per_minute as f64;

        ContentStats {
            word_count,
            character_count: clean_text.chars().filter(|c| !c.is_whitespace()).count(),
            sentence_count: count_sentences(clean_text, word_count),
            paragraph_count: clean_text.lines().filter(|l| !l.trim().is_empty()).count(),
            reading_time_minutes: (reading_time * 10.0).round() / 10.0,
            language: language.map(|l| l.code.clone()),
            language_confidence: language.map(|l| l.confidence).unwrap_or(0.0),
            link_count: links.len(),
            internal_link_count,
            external_link_count: links.len() - internal_link_count,
            image_count: images.len(),
            images_without_alt: images
                .iter()
                .filter(|img| img.alt.as_deref().map(str::is_empty).unwrap_or(true))
                .count(),
        }
    }
}

fn document_base(document: &Html, page_url: &Url) -> Url {
    document
        .select(&BASE_SELECTOR)
        .next()
        .and_then(|base| base.value().attr("href"))
        .and_then(|href| resolve_url(page_url, href).ok())
        .unwrap_or_else(|| page_url.clone())
}

/// 正文遍历中的待处理项
enum TextWork<'a> {
    Enter(ElementRef<'a>),
    Text(&'a str),
    /// 块级元素结束后的换行
    Break,
}

/// 子节点逆序入栈，出栈时恢复文档顺序
fn push_children<'a>(element: ElementRef<'a>, stack: &mut Vec<TextWork<'a>>) {
    let mark = stack.len();
    for child in element.children() {
        match child.value() {
            Node::Text(text) => stack.push(TextWork::Text(text)),
            Node::Element(_) => {
                if let Some(child_element) = ElementRef::wrap(child) {
                    stack.push(TextWork::Enter(child_element));
                }
            }
            _ => {}
        }
    }
    stack[mark..].reverse();
}

fn is_hidden(element: ElementRef) -> bool {
    let el = element.value();
    if el.attr("hidden").is_some() {
        return true;
    }
    if el
        .attr("aria-hidden")
        .map(|v| v.trim().eq_ignore_ascii_case("true"))
        .unwrap_or(false)
    {
        return true;
    }
    el.attr("style")
        .map(|style| {
            let compact: String = style
                .chars()
                .filter(|c| !c.is_whitespace())
                .collect::<String>()
                .to_ascii_lowercase();
            compact.contains("display:none") || compact.contains("visibility:hidden")
        })
        .unwrap_or(false)
}

fn page_meta(document: &Html, base: &Url) -> PageMeta {
    let mut meta = PageMeta {
        title: document
            .select(&TITLE_SELECTOR)
            .next()
            .and_then(|title| non_empty(&collapse(title.text()))),
        ..PageMeta::default()
    };

    for tag in document.select(&META_SELECTOR) {
        let el = tag.value();
        let Some(content) = el.attr("content").and_then(non_empty) else {
            continue;
        };
        let Some(key) = el
            .attr("property")
            .or_else(|| el.attr("name"))
            .map(|k| k.trim().to_ascii_lowercase())
        else {
            continue;
        };

        if key.starts_with("og:") {
            meta.opengraph.entry(key).or_insert(content);
        } else if key.starts_with("twitter:") {
            meta.twitter.entry(key).or_insert(content);
        } else {
            match key.as_str() {
                "description" if meta.description.is_none() => meta.description = Some(content),
                "keywords" if meta.keywords.is_empty() => {
                    meta.keywords = content
                        .split(',')
                        .filter_map(non_empty)
                        .collect();
                }
                "robots" if meta.robots.is_none() => meta.robots = Some(content),
                "author" if meta.author.is_none() => meta.author = Some(content),
                _ => {}
            }
        }
    }

    meta.canonical = document
        .select(&LINK_REL_SELECTOR)
        .find(|link| {
            link.value()
                .attr("rel")
                .map(|rel| rel.split_whitespace().any(|t| t.eq_ignore_ascii_case("canonical")))
                .unwrap_or(false)
        })
        .and_then(|link| link.value().attr("href"))
        .and_then(|href| resolve_url(base, href).ok())
        .map(String::from);

    if meta.title.is_none() {
        meta.title = meta.opengraph.get("og:title").cloned();
    }
    if meta.description.is_none() {
        meta.description = meta.opengraph.get("og:description").cloned();
    }
    meta
}

fn links(document: &Html, base: &Url, page_url: &Url) -> Vec<LinkInfo> {
    document
        .select(&ANCHOR_SELECTOR)
        .filter_map(|anchor| {
            let el = anchor.value();
            let href = el.attr("href")?;
            if !is_navigable_href(href) {
                return None;
            }
            let url = resolve_url(base, href).ok()?;
            if !matches!(url.scheme(), "http" | "https") {
                return None;
            }

            let text = non_empty(&collapse(anchor.text()))
                .or_else(|| el.attr("aria-label").and_then(non_empty))
                .or_else(|| el.attr("title").and_then(non_empty))
                .unwrap_or_default();

            Some(LinkInfo {
                internal: is_same_site(&url, page_url),
                url: url.into(),
                text,
                rel: el.attr("rel").and_then(non_empty),
            })
        })
        .collect()
}

fn images(document: &Html, base: &Url) -> Vec<ImageInfo> {
    document
        .select(&IMAGE_SELECTOR)
        .filter_map(|img| {
            let el = img.value();
            let src = ["src", "data-src", "data-lazy-src"]
                .iter()
                .find_map(|attr| el.attr(attr).and_then(non_empty))
                .or_else(|| {
                    el.attr("srcset")
                        .and_then(|set| set.split(',').next())
                        .and_then(|candidate| candidate.split_whitespace().next())
                        .and_then(non_empty)
                })?;
            if src.to_ascii_lowercase().starts_with("data:") {
                return None;
            }
            let url = resolve_url(base, &src).ok()?;

            Some(ImageInfo {
                src: url.into(),
                alt: el.attr("alt").map(|alt| alt.trim().to_string()),
                title: el.attr("title").and_then(non_empty),
                width: el.attr("width").and_then(parse_dimension),
                height: el.attr("height").and_then(parse_dimension),
            })
        })
        .collect()
}

fn parse_dimension(raw: &str) -> Option<u32> {
    raw.trim().trim_end_matches("px").trim().parse().ok()
}

/// 空白分隔的词计一个；汉字与假名逐字计数
fn count_words(text: &str) -> usize {
    text.split_whitespace()
        .map(|token| {
            let cjk = token.chars().filter(|c| is_cjk(*c)).count();
            let other = token.chars().any(|c| c.is_alphanumeric() && !is_cjk(c));
            cjk + usize::from(other)
        })
        .sum()
}

fn count_sentences(text: &str, word_count: usize) -> usize {
    let mut count = 0;
    let mut previous_terminal = false;
    for c in text.chars() {
        let terminal = SENTENCE_TERMINATORS.contains(&c);
        if terminal && !previous_terminal {
            count += 1;
        }
        previous_terminal = terminal;
    }
    if count == 0 && word_count > 0 {
        1
    } else {
        count
    }
}

fn collapse<'a>(parts: impl Iterator<Item = &'a str>) -> String {
    parts
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

#[cfg(test)]
#[path = "content_analysis_service_test.rs"]
mod tests;
