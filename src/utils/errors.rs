// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::config::settings::SettingsError;
use crate::domain::models::crawl_record::{CrawlErrorInfo, PipelineStage};
use crate::engines::traits::{FetchError, RenderError};
use thiserror::Error;

/// 结构化数据块解析错误（只影响单个数据块）
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractionParseError {
    #[error("JSON-LD 数据块 {index} 不是合法的 JSON: {message}")]
    JsonLdSyntax { index: usize, message: String },

    #[error("JSON-LD 数据块 {index} 为空")]
    EmptyBlock { index: usize },

    #[error("JSON-LD 数据块 {index} 不是对象或数组")]
    UnexpectedShape { index: usize },
}

impl ExtractionParseError {
    pub fn kind(&self) -> &'static str {
        match self {
            ExtractionParseError::JsonLdSyntax { .. } => "json_ld_syntax",
            ExtractionParseError::EmptyBlock { .. } => "json_ld_empty",
            ExtractionParseError::UnexpectedShape { .. } => "json_ld_shape",
        }
    }

    pub fn block_index(&self) -> usize {
        match self {
            ExtractionParseError::JsonLdSyntax { index, .. }
            | ExtractionParseError::EmptyBlock { index }
            | ExtractionParseError::UnexpectedShape { index } => *index,
        }
    }
}

/// 内容分析错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AnalysisError {
    #[error("文档为空")]
    EmptyDocument,

    #[error("文档无法解析为 HTML: {0}")]
    Unparsable(String),
}

impl AnalysisError {
    pub fn kind(&self) -> &'static str {
        match self {
            AnalysisError::EmptyDocument => "empty_document",
            AnalysisError::Unparsable(_) => "unparsable_document",
        }
    }
}

/// 爬取错误类型
#[derive(Error, Debug)]
pub enum CrawlError {
    #[error("抓取失败: {0}")]
    Fetch(#[from] FetchError),

    #[error("渲染失败: {0}")]
    Render(#[from] RenderError),

    #[error("内容分析失败: {0}")]
    Analysis(#[from] AnalysisError),

    #[error("阶段任务异常: {0}")]
    StageTask(String),

    #[error("批量爬取的 URL 列表为空")]
    EmptyBatch,

    #[error("爬取已取消")]
    Cancelled,

    #[error("配置错误: {0}")]
    Settings(#[from] SettingsError),
}

impl CrawlError {
    pub fn kind(&self) -> &'static str {
        match self {
            CrawlError::Fetch(e) => e.kind(),
            CrawlError::Render(e) => e.kind(),
            CrawlError::Analysis(e) => e.kind(),
            CrawlError::StageTask(_) => "stage_task",
            CrawlError::EmptyBatch => "empty_batch",
            CrawlError::Cancelled => "cancelled",
            CrawlError::Settings(_) => "invalid_settings",
        }
    }

    /// 转换为写入爬取记录的错误信息
    pub fn to_info(&self, stage: PipelineStage) -> CrawlErrorInfo {
        match self {
            CrawlError::Render(e) => CrawlErrorInfo::degraded(stage, e.kind(), e.to_string()),
            other => CrawlErrorInfo::fatal(stage, other.kind(), other.to_string()),
        }
    }
}
