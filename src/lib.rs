// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 配置模块
///
/// 处理爬虫的配置设置和环境变量
pub mod config;

/// 领域模块
///
/// 包含爬取记录模型以及差异、提取、归一化、分析和编排服务
pub mod domain;

/// 引擎模块
///
/// 实现原始 HTML 抓取和浏览器渲染
pub mod engines;

/// 工具模块
///
/// 提供通用的工具函数和辅助功能
pub mod utils;
