// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::config::settings::DiffSettings;
use crate::domain::models::dom_diff::{ChangeKind, DomChange, DomDiff};
use scraper::{ElementRef, Html, Node};
use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, BTreeSet};
use std::hash::{Hash, Hasher};

/// 描述中文本预览的最大字符数
const PREVIEW_CHARS: usize = 60;

/// 对齐权重：完全相同的子树优先于仅标签相同的节点
const IDENTICAL_WEIGHT: u32 = 3;
const SAME_KEY_WEIGHT: u32 = 1;

const TEXT_KEY: &str = "#text";

/// 比较树的最大嵌套深度，更深的子树压平为一个文本节点
const MAX_TREE_DEPTH: usize = 512;

/// 比较用的简化 DOM 节点
#[derive(Debug, Clone)]
enum DiffNode {
    Element {
        tag: String,
        attrs: BTreeMap<String, String>,
        children: Vec<DiffNode>,
        fingerprint: u64,
    },
    Text {
        text: String,
        fingerprint: u64,
    },
}

impl DiffNode {
    fn key(&self) -> &str {
        match self {
            DiffNode::Element { tag, .. } => tag,
            DiffNode::Text { .. } => TEXT_KEY,
        }
    }

    fn fingerprint(&self) -> u64 {
        match self {
            DiffNode::Element { fingerprint, .. } | DiffNode::Text { fingerprint, .. } => {
                *fingerprint
            }
        }
    }

    fn text(text: String) -> Self {
        let mut hasher = DefaultHasher::new();
        TEXT_KEY.hash(&mut hasher);
        text.hash(&mut hasher);
        DiffNode::Text {
            fingerprint: hasher.finish(),
            text,
        }
    }

    fn element(tag: String, attrs: BTreeMap<String, String>, children: Vec<DiffNode>) -> Self {
        let mut hasher = DefaultHasher::new();
        tag.hash(&mut hasher);
        attrs.hash(&mut hasher);
        for child in &children {
            child.fingerprint().hash(&mut hasher);
        }
        DiffNode::Element {
            fingerprint: hasher.finish(),
            tag,
            attrs,
            children,
        }
    }

    /// 节点的简短描述，用于新增 / 删除条目
    fn describe(&self) -> String {
        match self {
            DiffNode::Text { text, .. } => format!("text \"{}\"", preview(text)),
            DiffNode::Element { tag, attrs, .. } => {
                let mut label = format!("<{}", tag);
                if let Some(id) = attrs.get("id") {
                    label.push('#');
                    label.push_str(id);
                }
                if let Some(class) = attrs.get("class") {
                    for token in class.split(' ') {
                        label.push('.');
                        label.push_str(token);
                    }
                }
                label.push('>');

                let mut text = String::new();
                self.collect_text(&mut text);
                if text.is_empty() {
                    label
                } else {
                    format!("{} \"{}\"", label, preview(&text))
                }
            }
        }
    }

    fn collect_text(&self, out: &mut String) {
        if out.chars().count() > PREVIEW_CHARS {
            return;
        }
        match self {
            DiffNode::Text { text, .. } => {
                if !out.is_empty() {
                    out.push(' ');
                }
                out.push_str(text);
            }
            DiffNode::Element { children, .. } => {
                for child in children {
                    child.collect_text(out);
                }
            }
        }
    }
}

/// 压平子树时的待处理项
enum FlatWork<'a> {
    Element(ElementRef<'a>),
    Text(&'a str),
}

/// 子节点对齐步骤
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Match(usize, usize),
    Removed(usize),
    Added(usize),
}

/// 差异收集器，超过上限后只计数不记录
struct ChangeCollector {
    max_changes: usize,
    diff: DomDiff,
}

impl ChangeCollector {
    fn new(max_changes: usize) -> Self {
        let mut diff = DomDiff::not_compared();
        diff.compared = true;
        Self { max_changes, diff }
    }

    fn push(&mut self, change: ChangeKind, path: String, node: &str, description: String) {
        match change {
            ChangeKind::Added => self.diff.added += 1,
            ChangeKind::Removed => self.diff.removed += 1,
            ChangeKind::Modified => self.diff.modified += 1,
        }
        if self.diff.changes.len() >= self.max_changes {
            self.diff.truncated = true;
            return;
        }
        self.diff.changes.push(DomChange {
            change,
            path,
            node: node.to_string(),
            description,
        });
    }
}

/// DOM 差异服务
///
/// 将原始 HTML 与渲染后的 HTML 解析成树后逐层比较：
/// 空白差异、属性顺序和 `class` 词序不计入差异；文本变化、节点增删
/// 以及白名单属性值的变化各记为一条带索引路径的差异。
/// 同一层的子节点按标签做保序的最长公共子序列对齐，结果是确定的。
/// 嵌套超过 `MAX_TREE_DEPTH` 层的子树只按文本比较。
pub struct DomDiffService {
    significant_attributes: BTreeSet<String>,
    ignored_tags: BTreeSet<String>,
    max_changes: usize,
    max_alignment_cells: usize,
}

impl DomDiffService {
    pub fn new(settings: &DiffSettings) -> Self {
        Self {
            significant_attributes: settings
                .significant_attributes
                .iter()
                .map(|a| a.trim().to_ascii_lowercase())
                .collect(),
            ignored_tags: settings
                .ignored_tags
                .iter()
                .map(|t| t.trim().to_ascii_lowercase())
                .collect(),
            max_changes: settings.max_changes.max(1),
            max_alignment_cells: settings.max_alignment_cells.max(1),
        }
    }

    /// 比较原始 HTML 与渲染后的 HTML
    ///
    /// # 参数
    ///
    /// * `raw_html` - 抓取得到的原始 HTML
    /// * `rendered_html` - 浏览器渲染后序列化的 DOM
    ///
    /// # 返回值
    ///
    /// 差异摘要；两者语义相同时 `changes` 为空
    pub fn diff(&self, raw_html: &str, rendered_html: &str) -> DomDiff {
        let raw = self.build_tree(raw_html);
        let rendered = self.build_tree(rendered_html);

        let mut collector = ChangeCollector::new(self.max_changes);
        let root_path = format!("/{}[0]", rendered.key());
        if raw.key() == rendered.key() {
            self.diff_node(&raw, &rendered, &root_path, &mut collector);
        } else {
            collector.push(
                ChangeKind::Removed,
                format!("/{}[0]", raw.key()),
                raw.key(),
                raw.describe(),
            );
            collector.push(ChangeKind::Added, root_path, rendered.key(), rendered.describe());
        }
        collector.diff
    }

    fn build_tree(&self, html: &str) -> DiffNode {
        let document = Html::parse_document(html);
        self.build_element(document.root_element(), 0)
    }

    fn build_element(&self, element: ElementRef, depth: usize) -> DiffNode {
        let tag = element.value().name().to_ascii_lowercase();
        let attrs = element
            .value()
            .attrs()
            .filter_map(|(name, value)| {
                let name = name.to_ascii_lowercase();
                self.significant_attributes
                    .contains(&name)
                    .then(|| {
                        let value = normalize_attribute(&name, value);
                        (name, value)
                    })
            })
            .collect();

        if depth >= MAX_TREE_DEPTH {
            let text = self.flat_text(element);
            let children = if text.is_empty() {
                Vec::new()
            } else {
                vec![DiffNode::text(text)]
            };
            return DiffNode::element(tag, attrs, children);
        }

        let mut children: Vec<DiffNode> = Vec::new();
        let mut pending_text = String::new();
        for child in element.children() {
            match child.value() {
                Node::Element(_) => {
                    let Some(child_element) = ElementRef::wrap(child) else {
                        continue;
                    };
                    if self
                        .ignored_tags
                        .contains(&child_element.value().name().to_ascii_lowercase())
                    {
                        continue;
                    }
                    if !pending_text.is_empty() {
                        children.push(DiffNode::text(std::mem::take(&mut pending_text)));
                    }
                    children.push(self.build_element(child_element, depth + 1));
                }
                Node::Text(text) => {
                    let normalized = collapse_whitespace(text);
                    if normalized.is_empty() {
                        continue;
                    }
                    // 相邻文本节点合并（注释被移除后会出现这种情况）
                    if !pending_text.is_empty() {
                        pending_text.push(' ');
                    }
                    pending_text.push_str(&normalized);
                }
                _ => {}
            }
        }
        if !pending_text.is_empty() {
            children.push(DiffNode::text(pending_text));
        }

        DiffNode::element(tag, attrs, children)
    }

    /// 按文档顺序拼接子树中的文本，跳过忽略的标签
    fn flat_text(&self, element: ElementRef) -> String {
        let mut text = String::new();
        let mut stack = vec![FlatWork::Element(element)];
        while let Some(work) = stack.pop() {
            match work {
                FlatWork::Text(part) => {
                    text.push(' ');
                    text.push_str(part);
                }
                FlatWork::Element(current) => {
                    // reversed so that pops follow document order
                    let mark = stack.len();
                    for child in current.children() {
                        match child.value() {
                            Node::Text(part) => stack.push(FlatWork::Text(part)),
                            Node::Element(el) => {
                                if self.ignored_tags.contains(&el.name().to_ascii_lowercase()) {
                                    continue;
                                }
                                if let Some(child_element) = ElementRef::wrap(child) {
                                    stack.push(FlatWork::Element(child_element));
                                }
                            }
                            _ => {}
                        }
                    }
                    stack[mark..].reverse();
                }
            }
        }
        collapse_whitespace(&text)
    }

    fn diff_node(
        &self,
        raw: &DiffNode,
        rendered: &DiffNode,
        path: &str,
        out: &mut ChangeCollector,
    ) {
        if raw.fingerprint() == rendered.fingerprint() {
            return;
        }
        match (raw, rendered) {
            (DiffNode::Text { text: before, .. }, DiffNode::Text { text: after, .. }) => {
                out.push(
                    ChangeKind::Modified,
                    path.to_string(),
                    TEXT_KEY,
                    format!(
                        "text changed from \"{}\" to \"{}\"",
                        preview(before),
                        preview(after)
                    ),
                );
            }
            (
                DiffNode::Element {
                    tag,
                    attrs: raw_attrs,
                    children: raw_children,
                    ..
                },
                DiffNode::Element {
                    attrs: rendered_attrs,
                    children: rendered_children,
                    ..
                },
            ) => {
                let changed = attribute_changes(raw_attrs, rendered_attrs);
                if !changed.is_empty() {
                    out.push(
                        ChangeKind::Modified,
                        path.to_string(),
                        tag,
                        format!("attributes changed: {}", changed.join(", ")),
                    );
                }
                self.diff_children(raw_children, rendered_children, path, out);
            }
            _ => {
                out.push(ChangeKind::Removed, path.to_string(), raw.key(), raw.describe());
                out.push(
                    ChangeKind::Added,
                    path.to_string(),
                    rendered.key(),
                    rendered.describe(),
                );
            }
        }
    }

    fn diff_children(
        &self,
        raw: &[DiffNode],
        rendered: &[DiffNode],
        parent: &str,
        out: &mut ChangeCollector,
    ) {
        for step in self.align(raw, rendered) {
            match step {
                Step::Match(i, j) => {
                    let path = child_path(parent, &rendered[j], j);
                    self.diff_node(&raw[i], &rendered[j], &path, out);
                }
                Step::Removed(i) => out.push(
                    ChangeKind::Removed,
                    child_path(parent, &raw[i], i),
                    raw[i].key(),
                    raw[i].describe(),
                ),
                Step::Added(j) => out.push(
                    ChangeKind::Added,
                    child_path(parent, &rendered[j], j),
                    rendered[j].key(),
                    rendered[j].describe(),
                ),
            }
        }
    }

    /// 对齐两组兄弟节点
    ///
    /// 先剥离首尾完全相同的节点，中间部分做加权最长公共子序列；
    /// 矩阵超过 `max_alignment_cells` 时退化为按位置对齐。
    fn align(&self, raw: &[DiffNode], rendered: &[DiffNode]) -> Vec<Step> {
        let same = |i: usize, j: usize| raw[i].fingerprint() == rendered[j].fingerprint();

        let mut prefix = 0;
        while prefix < raw.len() && prefix < rendered.len() && same(prefix, prefix) {
            prefix += 1;
        }
        let mut suffix = 0;
        while suffix < raw.len() - prefix
            && suffix < rendered.len() - prefix
            && same(raw.len() - 1 - suffix, rendered.len() - 1 - suffix)
        {
            suffix += 1;
        }

        let mut steps: Vec<Step> = (0..prefix).map(|i| Step::Match(i, i)).collect();

        let raw_mid = &raw[prefix..raw.len() - suffix];
        let rendered_mid = &rendered[prefix..rendered.len() - suffix];
        let middle = if raw_mid.len().saturating_mul(rendered_mid.len()) > self.max_alignment_cells
        {
            align_by_position(raw_mid, rendered_mid)
        } else {
            align_by_lcs(raw_mid, rendered_mid)
        };
        steps.extend(middle.into_iter().map(|step| match step {
            Step::Match(i, j) => Step::Match(i + prefix, j + prefix),
            Step::Removed(i) => Step::Removed(i + prefix),
            Step::Added(j) => Step::Added(j + prefix),
        }));

        let raw_tail = raw.len() - suffix;
        let rendered_tail = rendered.len() - suffix;
        steps.extend((0..suffix).map(|k| Step::Match(raw_tail + k, rendered_tail + k)));
        steps
    }
}

fn match_weight(raw: &DiffNode, rendered: &DiffNode) -> Option<u32> {
    if raw.fingerprint() == rendered.fingerprint() {
        Some(IDENTICAL_WEIGHT)
    } else if raw.key() == rendered.key() {
        Some(SAME_KEY_WEIGHT)
    } else {
        None
    }
}

fn align_by_lcs(raw: &[DiffNode], rendered: &[DiffNode]) -> Vec<Step> {
    let (n, m) = (raw.len(), rendered.len());
    let width = m + 1;
    // score[i * width + j]: best alignment weight of raw[i..] against rendered[j..]
    let mut score = vec![0u32; (n + 1) * width];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            let skip = score[(i + 1) * width + j].max(score[i * width + j + 1]);
            let take = match_weight(&raw[i], &rendered[j])
                .map(|w| w + score[(i + 1) * width + j + 1])
                .unwrap_or(0);
            score[i * width + j] = skip.max(take);
        }
    }

    let mut steps = Vec::with_capacity(n.max(m));
    let (mut i, mut j) = (0, 0);
    while i < n && j < m {
        let current = score[i * width + j];
        let take = match_weight(&raw[i], &rendered[j]).map(|w| w + score[(i + 1) * width + j + 1]);
        if take == Some(current) {
            steps.push(Step::Match(i, j));
            i += 1;
            j += 1;
        } else if score[(i + 1) * width + j] == current {
            steps.push(Step::Removed(i));
            i += 1;
        } else {
            steps.push(Step::Added(j));
            j += 1;
        }
    }
    steps.extend((i..n).map(Step::Removed));
    steps.extend((j..m).map(Step::Added));
    steps
}

fn align_by_position(raw: &[DiffNode], rendered: &[DiffNode]) -> Vec<Step> {
    let mut steps = Vec::with_capacity(raw.len().max(rendered.len()));
    for k in 0..raw.len().max(rendered.len()) {
        match (raw.get(k), rendered.get(k)) {
            (Some(a), Some(b)) if a.key() == b.key() => steps.push(Step::Match(k, k)),
            (Some(_), Some(_)) => {
                steps.push(Step::Removed(k));
                steps.push(Step::Added(k));
            }
            (Some(_), None) => steps.push(Step::Removed(k)),
            (None, Some(_)) => steps.push(Step::Added(k)),
            (None, None) => {}
        }
    }
    steps
}

fn attribute_changes(
    raw: &BTreeMap<String, String>,
    rendered: &BTreeMap<String, String>,
) -> Vec<String> {
    let names: BTreeSet<&String> = raw.keys().chain(rendered.keys()).collect();
    names
        .into_iter()
        .filter_map(|name| match (raw.get(name), rendered.get(name)) {
            (Some(before), Some(after)) if before != after => Some(format!(
                "{} \"{}\" -> \"{}\"",
                name,
                preview(before),
                preview(after)
            )),
            (None, Some(after)) => Some(format!("{} added \"{}\"", name, preview(after))),
            (Some(_), None) => Some(format!("{} removed", name)),
            _ => None,
        })
        .collect()
}

fn child_path(parent: &str, node: &DiffNode, index: usize) -> String {
    format!("{}/{}[{}]", parent, node.key(), index)
}

fn normalize_attribute(name: &str, value: &str) -> String {
    if name == "class" {
        let mut tokens: Vec<&str> = value.split_whitespace().collect();
        tokens.sort_unstable();
        tokens.dedup();
        tokens.join(" ")
    } else {
        collapse_whitespace(value)
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn preview(text: &str) -> String {
    if text.chars().count() <= PREVIEW_CHARS {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(PREVIEW_CHARS).collect();
    cut.push_str("...");
    cut
}

#[cfg(test)]
#[path = "dom_diff_service_test.rs"]
mod tests;
