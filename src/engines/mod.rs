// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 引擎模块
///
/// 提供原始 HTML 抓取器（reqwest）、浏览器渲染器（chromiumoxide）
/// 以及限制渲染并发的渲染池
pub mod browser_engine;
pub mod reqwest_engine;
pub mod render_pool;
pub mod traits;
pub mod validators;
