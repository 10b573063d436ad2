// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 领域模型模块
///
/// 该模块定义了爬取记录的数据结构，包括：
/// - 爬取记录（crawl_record）：单个 URL 的完整结果与批量结果
/// - 结构化数据（structured_data）：按格式分组的原始数据与归一化 GEO 记录
/// - DOM 差异（dom_diff）：原始 HTML 与渲染 DOM 的差异摘要
/// - 内容（content）：元信息、语言、链接、图片与统计
///
/// 记录中的每个字段在序列化时都会出现，缺失数据表示为 `null` 或空集合。
pub mod content;
pub mod crawl_record;
pub mod dom_diff;
pub mod structured_data;
