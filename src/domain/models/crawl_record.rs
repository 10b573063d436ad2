// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::content::{ContentStats, ImageInfo, LanguageInfo, LinkInfo, PageMeta};
use crate::domain::models::dom_diff::DomDiff;
use crate::domain::models::structured_data::{NormalizedGeoRecord, StructuredDataBundle};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// 流水线阶段
///
/// 单个 URL 的处理状态机：
/// Pending → Fetching → Rendering → Extracting → Analyzing → Assembled，
/// 任意阶段都可能进入吸收态 Errored。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    /// 等待处理
    #[default]
    Pending,
    /// 抓取原始 HTML
    Fetching,
    /// 浏览器渲染
    Rendering,
    /// DOM 差异与结构化数据提取
    Extracting,
    /// 归一化与内容分析（并行）
    Analyzing,
    /// 记录已组装完成
    Assembled,
    /// 出错（吸收态）
    Errored,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::Pending => "pending",
            PipelineStage::Fetching => "fetching",
            PipelineStage::Rendering => "rendering",
            PipelineStage::Extracting => "extracting",
            PipelineStage::Analyzing => "analyzing",
            PipelineStage::Assembled => "assembled",
            PipelineStage::Errored => "errored",
        }
    }

    /// 是否为终止状态
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineStage::Assembled | PipelineStage::Errored)
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 写入爬取记录的错误信息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlErrorInfo {
    /// 出错时所处的阶段
    pub stage: PipelineStage,
    /// 机器可读的错误类别，例如 `timeout`、`navigation_timeout`
    pub kind: String,
    /// 人类可读的错误描述
    pub message: String,
    /// 是否导致流水线终止
    pub fatal: bool,
}

impl CrawlErrorInfo {
    pub fn fatal(stage: PipelineStage, kind: &str, message: impl Into<String>) -> Self {
        Self {
            stage,
            kind: kind.to_string(),
            message: message.into(),
            fatal: true,
        }
    }

    pub fn degraded(stage: PipelineStage, kind: &str, message: impl Into<String>) -> Self {
        Self {
            stage,
            kind: kind.to_string(),
            message: message.into(),
            fatal: false,
        }
    }
}

/// 下游阶段所使用的 HTML 来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ContentSource {
    /// 渲染后的 DOM
    Rendered,
    /// 原始 HTML（渲染失败或被禁用）
    Raw,
    /// 没有可用内容
    #[default]
    None,
}

/// 爬取过程信息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawlInfo {
    pub crawl_id: Uuid,
    /// 请求的 URL
    pub url: String,
    /// 跟随重定向后的最终 URL
    pub final_url: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub fetch_duration_ms: Option<u64>,
    pub render_duration_ms: Option<u64>,
    /// 没有致命错误时为 true
    pub success: bool,
    /// 最后到达的阶段
    pub stage: PipelineStage,
    /// 是否获得了渲染后的 DOM
    pub rendered: bool,
    pub content_source: ContentSource,
    /// 致命错误，或者在成功时记录的首个降级错误
    pub error: Option<CrawlErrorInfo>,
    /// 所有非致命错误
    pub warnings: Vec<CrawlErrorInfo>,
    pub crawler_version: String,
}

impl CrawlInfo {
    pub fn new(url: &str) -> Self {
        let now = Utc::now();
        Self {
            crawl_id: Uuid::new_v4(),
            url: url.to_string(),
            final_url: None,
            started_at: now,
            finished_at: now,
            duration_ms: 0,
            fetch_duration_ms: None,
            render_duration_ms: None,
            success: false,
            stage: PipelineStage::Pending,
            rendered: false,
            content_source: ContentSource::None,
            error: None,
            warnings: Vec::new(),
            crawler_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// HTTP 响应信息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpInfo {
    pub status_code: u16,
    pub final_url: String,
    /// 响应头（名称小写，重复的头以 ", " 合并）
    pub headers: BTreeMap<String, String>,
    pub content_type: Option<String>,
    /// 原始响应体字节数
    pub content_length: usize,
    /// 解码响应体所用的字符编码
    pub encoding: String,
    /// 从请求 URL 到最终 URL 依次访问的地址
    pub redirect_chain: Vec<String>,
    pub fetch_duration_ms: u64,
}

/// 单个 URL 的爬取记录
///
/// 所有顶层字段在任何情况下都会出现在序列化结果中，
/// 缺失的数据以 `null` 或空集合表示。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawlRecord {
    pub crawl_info: CrawlInfo,
    pub http_info: Option<HttpInfo>,
    pub raw_html: Option<String>,
    pub rendered_html: Option<String>,
    pub clean_text: Option<String>,
    pub structured_data: StructuredDataBundle,
    pub structured_data_normalized: NormalizedGeoRecord,
    pub meta: Option<PageMeta>,
    pub language: Option<LanguageInfo>,
    pub links: Vec<LinkInfo>,
    pub images: Vec<ImageInfo>,
    pub dom_diff: DomDiff,
    pub content_stats: Option<ContentStats>,
}

impl CrawlRecord {
    /// 创建一个只有爬取信息、其余字段为空的记录
    pub fn empty(crawl_info: CrawlInfo) -> Self {
        Self {
            crawl_info,
            http_info: None,
            raw_html: None,
            rendered_html: None,
            clean_text: None,
            structured_data: StructuredDataBundle::default(),
            structured_data_normalized: NormalizedGeoRecord::default(),
            meta: None,
            language: None,
            links: Vec::new(),
            images: Vec::new(),
            dom_diff: DomDiff::not_compared(),
            content_stats: None,
        }
    }

    pub fn url(&self) -> &str {
        &self.crawl_info.url
    }

    pub fn is_success(&self) -> bool {
        self.crawl_info.success
    }

    pub fn error(&self) -> Option<&CrawlErrorInfo> {
        self.crawl_info.error.as_ref()
    }
}

/// 批量爬取中单个 URL 的结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CrawlOutcome {
    /// 流水线完成（可能带有降级警告）
    Completed(Box<CrawlRecord>),
    /// 出现致命错误，附带部分结果
    Failed {
        url: String,
        error: CrawlErrorInfo,
        partial: Box<CrawlRecord>,
    },
    /// 批次被取消时尚未完成
    Cancelled { url: String },
}

impl CrawlOutcome {
    pub fn from_record(record: CrawlRecord) -> Self {
        if record.crawl_info.success {
            return CrawlOutcome::Completed(Box::new(record));
        }
        let error = record.crawl_info.error.clone().unwrap_or_else(|| {
            CrawlErrorInfo::fatal(record.crawl_info.stage, "unknown", "crawl failed")
        });
        CrawlOutcome::Failed {
            url: record.crawl_info.url.clone(),
            error,
            partial: Box::new(record),
        }
    }

    pub fn url(&self) -> &str {
        match self {
            CrawlOutcome::Completed(record) => record.url(),
            CrawlOutcome::Failed { url, .. } | CrawlOutcome::Cancelled { url } => url,
        }
    }

    /// 返回可用的爬取记录（失败时为部分记录）
    pub fn record(&self) -> Option<&CrawlRecord> {
        match self {
            CrawlOutcome::Completed(record) => Some(record),
            CrawlOutcome::Failed { partial, .. } => Some(partial),
            CrawlOutcome::Cancelled { .. } => None,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, CrawlOutcome::Completed(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, CrawlOutcome::Failed { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, CrawlOutcome::Cancelled { .. })
    }
}
