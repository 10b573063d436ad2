// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 配置模块
///
/// 处理爬虫的配置设置，包括抓取、渲染、差异、提取、归一化、分析与编排配置
pub mod settings;
