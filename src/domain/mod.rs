// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 领域层模块
///
/// 该模块包含爬取流水线的核心业务逻辑，包括：
/// - 领域模型（models）：爬取记录及其组成部分
/// - 服务（services）：DOM 差异、结构化数据提取、归一化、内容分析与编排
pub mod models;
pub mod services;
