// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 页面元信息
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageMeta {
    /// `<title>`，缺失时回退到 `og:title`
    pub title: Option<String>,
    /// `meta[name=description]`，缺失时回退到 `og:description`
    pub description: Option<String>,
    pub keywords: Vec<String>,
    pub canonical: Option<String>,
    pub robots: Option<String>,
    pub author: Option<String>,
    pub opengraph: BTreeMap<String, String>,
    pub twitter: BTreeMap<String, String>,
}

/// 语言识别方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
    /// 基于正文文本识别
    Text,
    /// 使用 `<html lang>` 声明
    Declared,
}

/// 语言信息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LanguageInfo {
    /// 最终采用的语言代码（ISO 639-1）
    pub code: String,
    pub confidence: f64,
    pub method: DetectionMethod,
    /// `<html lang>` 声明的主语言标签
    pub declared: Option<String>,
    /// 文本识别结果
    pub detected: Option<String>,
}

/// 链接条目
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkInfo {
    /// 绝对 URL
    pub url: String,
    pub text: String,
    pub rel: Option<String>,
    /// 与页面同站
    pub internal: bool,
}

/// 图片条目
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageInfo {
    /// 绝对 URL
    pub src: String,
    pub alt: Option<String>,
    pub title: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// 内容统计
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentStats {
    pub word_count: usize,
    pub character_count: usize,
    pub sentence_count: usize,
    pub paragraph_count: usize,
    /// 预计阅读时间（分钟，保留一位小数）
    pub reading_time_minutes: f64,
    pub language: Option<String>,
    pub language_confidence: f64,
    pub link_count: usize,
    pub internal_link_count: usize,
    pub external_link_count: usize,
    pub image_count: usize,
    pub images_without_alt: usize,
}

/// 内容分析结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentAnalysis {
    pub clean_text: String,
    pub meta: PageMeta,
    pub language: Option<LanguageInfo>,
    pub links: Vec<LinkInfo>,
    pub images: Vec<ImageInfo>,
    pub stats: ContentStats,
}
