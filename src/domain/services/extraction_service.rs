// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::structured_data::{
    SourceFormat, StructuredDataBundle, StructuredDataError, StructuredItem,
};
use crate::utils::errors::ExtractionParseError;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde_json::{Map, Value};
use tracing::debug;

static SCRIPT_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("script[type]").expect("valid script selector"));
static ITEMSCOPE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("[itemscope]").expect("valid itemscope selector"));
static TYPEOF_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("[typeof]").expect("valid typeof selector"));
static META_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("meta").expect("valid meta selector"));

static LEADING_WRAPPER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(?://\s*)?(?:<!--|<!\[CDATA\[)").expect("valid leading wrapper regex")
});
static TRAILING_WRAPPER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?://\s*)?(?:-->|\]\]>)\s*$").expect("valid trailing wrapper regex")
});

const OPENGRAPH_PREFIXES: [&str; 3] = ["og:", "place:", "business:"];

/// 条目最大嵌套层数，更深的嵌套条目只保留文本值
const MAX_ITEM_DEPTH: usize = 32;

/// 结构化数据提取服务
///
/// 按格式分别提取 JSON-LD、microdata、RDFa、OpenGraph 与普通 meta 标签，
/// 各格式互不合并。提取过程不会失败：单个 JSON-LD 块解析失败只会
/// 在 `parse_errors` 中留下一条记录。
pub struct ExtractionService;

impl ExtractionService {
    /// 从 HTML 中提取所有结构化数据
    ///
    /// # 参数
    ///
    /// * `html` - 渲染后的 DOM 或原始 HTML
    ///
    /// # 返回值
    ///
    /// 五个格式键齐全的数据包，按文档顺序排列
    pub fn extract(html: &str) -> StructuredDataBundle {
        let document = Html::parse_document(html);
        let mut bundle = StructuredDataBundle::default();

        extract_json_ld(&document, &mut bundle);
        extract_microdata(&document, &mut bundle);
        extract_rdfa(&document, &mut bundle);
        extract_meta_tags(&document, &mut bundle);

        debug!(
            "Extracted {} structured items ({} parse errors)",
            bundle.total_items(),
            bundle.parse_errors.len()
        );
        bundle
    }
}

fn extract_json_ld(document: &Html, bundle: &mut StructuredDataBundle) {
    let blocks = document.select(&SCRIPT_SELECTOR).filter(|script| {
        script
            .value()
            .attr("type")
            .map(|t| t.trim().eq_ignore_ascii_case("application/ld+json"))
            .unwrap_or(false)
    });

    for (index, block) in blocks.enumerate() {
        let raw: String = block.text().collect();
        match parse_json_ld_block(index, &raw) {
            Ok(items) => bundle.json_ld.extend(items),
            Err(err) => {
                debug!("Skipping JSON-LD block {}: {}", index, err);
                bundle.parse_errors.push(StructuredDataError {
                    format: SourceFormat::JsonLd,
                    block_index: err.block_index(),
                    kind: err.kind().to_string(),
                    message: err.to_string(),
                });
            }
        }
    }
}

fn parse_json_ld_block(
    index: usize,
    raw: &str,
) -> Result<Vec<StructuredItem>, ExtractionParseError> {
    let leading = LEADING_WRAPPER.replace(raw, "");
    let body = TRAILING_WRAPPER.replace(&leading, "");
    let body = body.trim();
    if body.is_empty() {
        return Err(ExtractionParseError::EmptyBlock { index });
    }

    let value: Value = match serde_json::from_str(body) {
        Ok(value) => value,
        Err(first) => {
            // Raw control characters inside strings are common in hand-written blocks
            let cleaned: String = body
                .chars()
                .map(|c| if c.is_control() { ' ' } else { c })
                .collect();
            serde_json::from_str(&cleaned).map_err(|_| ExtractionParseError::JsonLdSyntax {
                index,
                message: first.to_string(),
            })?
        }
    };

    match value {
        Value::Object(map) => Ok(vec![map]),
        Value::Array(elements) => {
            let total = elements.len();
            let items: Vec<StructuredItem> = elements
                .into_iter()
                .filter_map(|element| match element {
                    Value::Object(map) => Some(map),
                    _ => None,
                })
                .collect();
            if items.is_empty() && total > 0 {
                Err(ExtractionParseError::UnexpectedShape { index })
            } else {
                Ok(items)
            }
        }
        _ => Err(ExtractionParseError::UnexpectedShape { index }),
    }
}

fn extract_microdata(document: &Html, bundle: &mut StructuredDataBundle) {
    for scope in document.select(&ITEMSCOPE_SELECTOR) {
        // Items carrying itemprop inside another item belong to that item
        if scope.value().attr("itemprop").is_some() && has_ancestor_attr(scope, "itemscope") {
            continue;
        }
        bundle.microdata.push(microdata_item(scope, 0));
    }
}

fn microdata_item(scope: ElementRef, depth: usize) -> StructuredItem {
    let mut item = Map::new();
    if let Some(item_type) = scope
        .value()
        .attr("itemtype")
        .and_then(|t| t.split_whitespace().next())
    {
        item.insert("@type".to_string(), Value::String(short_name(item_type)));
    }
    if let Some(id) = scope.value().attr("itemid") {
        item.insert("@id".to_string(), Value::String(id.trim().to_string()));
    }

    for child in scope_descendants(scope, "itemscope") {
        let Some(props) = child.value().attr("itemprop") else {
            continue;
        };
        let value = if child.value().attr("itemscope").is_none() {
            Value::String(microdata_value(child))
        } else if depth + 1 < MAX_ITEM_DEPTH {
            Value::Object(microdata_item(child, depth + 1))
        } else {
            Value::String(element_text(child))
        };
        for name in props.split_whitespace() {
            insert_multi(&mut item, &short_name(name), value.clone());
        }
    }
    item
}

/// 按文档顺序列出属于 `scope` 的元素
///
/// 带 `scope_attr` 的后代自身会被列出，但其内部属于嵌套条目，不再深入。
/// 使用显式栈遍历，嵌套层数不受线程栈限制。
fn scope_descendants<'a>(scope: ElementRef<'a>, scope_attr: &str) -> Vec<ElementRef<'a>> {
    let mut found = Vec::new();
    let mut stack: Vec<ElementRef<'a>> = scope
        .children()
        .rev()
        .filter_map(ElementRef::wrap)
        .collect();
    while let Some(element) = stack.pop() {
        found.push(element);
        if element.value().attr(scope_attr).is_none() {
            stack.extend(element.children().rev().filter_map(ElementRef::wrap));
        }
    }
    found
}

fn has_ancestor_attr(element: ElementRef, attr: &str) -> bool {
    element
        .ancestors()
        .filter_map(ElementRef::wrap)
        .any(|ancestor| ancestor.value().attr(attr).is_some())
}

fn microdata_value(element: ElementRef) -> String {
    let el = element.value();
    let attr = |name: &str| el.attr(name).map(|v| v.trim().to_string());
    let value = match el.name() {
        "meta" => attr("content"),
        "a" | "link" | "area" => attr("href"),
        "audio" | "embed" | "iframe" | "img" | "source" | "track" | "video" => attr("src"),
        "object" => attr("data"),
        "data" | "meter" => attr("value"),
        "time" => attr("datetime"),
        _ => attr("content"),
    };
    value.unwrap_or_else(|| element_text(element))
}

fn extract_rdfa(document: &Html, bundle: &mut StructuredDataBundle) {
    for scope in document.select(&TYPEOF_SELECTOR) {
        if has_ancestor_attr(scope, "typeof") {
            continue;
        }
        bundle.rdfa.push(rdfa_item(scope, 0));
    }
}

fn rdfa_item(scope: ElementRef, depth: usize) -> StructuredItem {
    let mut item = Map::new();
    let el = scope.value();
    if let Some(vocab) = el.attr("vocab").or_else(|| {
        scope
            .ancestors()
            .filter_map(ElementRef::wrap)
            .find_map(|ancestor| ancestor.value().attr("vocab"))
    }) {
        item.insert("@vocab".to_string(), Value::String(vocab.trim().to_string()));
    }
    if let Some(item_type) = el.attr("typeof").and_then(|t| t.split_whitespace().next()) {
        item.insert("@type".to_string(), Value::String(short_name(item_type)));
    }
    if let Some(id) = el.attr("resource").or_else(|| el.attr("about")) {
        item.insert("@id".to_string(), Value::String(id.trim().to_string()));
    }

    for child in scope_descendants(scope, "typeof") {
        let Some(props) = child.value().attr("property") else {
            continue;
        };
        let value = if child.value().attr("typeof").is_none() {
            Value::String(rdfa_value(child))
        } else if depth + 1 < MAX_ITEM_DEPTH {
            Value::Object(rdfa_item(child, depth + 1))
        } else {
            Value::String(element_text(child))
        };
        for name in props.split_whitespace() {
            insert_multi(&mut item, &short_name(name), value.clone());
        }
    }
    item
}

fn rdfa_value(element: ElementRef) -> String {
    let el = element.value();
    let value = el
        .attr("content")
        .or_else(|| match el.name() {
            "a" | "link" | "area" => el.attr("href"),
            "img" | "audio" | "video" | "source" | "iframe" => el.attr("src"),
            "time" => el.attr("datetime"),
            _ => None,
        })
        .or_else(|| el.attr("resource"))
        .or_else(|| el.attr("href"));
    match value {
        Some(v) => v.trim().to_string(),
        None => element_text(element),
    }
}

fn extract_meta_tags(document: &Html, bundle: &mut StructuredDataBundle) {
    let mut opengraph = Map::new();
    let mut meta = Map::new();

    for tag in document.select(&META_SELECTOR) {
        let el = tag.value();
        let Some(content) = el.attr("content").map(str::trim) else {
            continue;
        };
        let value = Value::String(content.to_string());

        let property = el.attr("property").or_else(|| el.attr("name"));
        if let Some(key) = property.map(|p| p.trim().to_ascii_lowercase()) {
            if OPENGRAPH_PREFIXES.iter().any(|prefix| key.starts_with(prefix)) {
                insert_multi(&mut opengraph, &key, value);
                continue;
            }
        }

        let key = el.attr("name").or_else(|| el.attr("http-equiv"));
        if let Some(key) = key.map(|k| k.trim().to_ascii_lowercase()) {
            if !key.is_empty() {
                insert_multi(&mut meta, &key, value);
            }
        }
    }

    if !opengraph.is_empty() {
        bundle.opengraph.push(opengraph);
    }
    if !meta.is_empty() {
        bundle.meta.push(meta);
    }
}

/// 同名属性出现多次时转为数组
fn insert_multi(item: &mut StructuredItem, key: &str, value: Value) {
    match item.get_mut(key) {
        Some(Value::Array(values)) => values.push(value),
        Some(existing) => {
            let first = existing.take();
            *existing = Value::Array(vec![first, value]);
        }
        None => {
            item.insert(key.to_string(), value);
        }
    }
}

/// `https://schema.org/Restaurant` -> `Restaurant`，`schema:name` -> `name`
fn short_name(name: &str) -> String {
    let name = name.trim().trim_end_matches('/');
    let tail = name.rsplit(|c: char| c == '/' || c == '#').next().unwrap_or(name);
    let tail = match tail.split_once(':') {
        Some((_, local)) if !local.is_empty() => local,
        _ => tail,
    };
    tail.to_string()
}

fn element_text(element: ElementRef) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
#[path = "extraction_service_test.rs"]
mod tests;
