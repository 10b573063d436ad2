// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 领域服务模块
///
/// 包含流水线各阶段的服务：
/// - DOM 差异（dom_diff_service）：比较原始 HTML 与渲染后 DOM
/// - 结构化数据提取（extraction_service）：JSON-LD、Microdata、RDFa、OpenGraph 与 meta
/// - 归一化（normalization_service）：按来源优先级合并出统一的 GEO 记录
/// - 内容分析（content_analysis_service）：正文、元数据、语言、链接、图片与统计
/// - 爬取编排（crawl_service）：组装单个 URL 或批量 URL 的完整流水线
///
/// 除编排服务外，其余服务都是纯函数式的，可在阻塞线程池中并行执行。
pub mod content_analysis_service;
pub mod crawl_service;
pub mod dom_diff_service;
pub mod extraction_service;
pub mod geo_projection;
pub mod normalization_service;
