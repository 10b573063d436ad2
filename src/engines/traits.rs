// Copyright 2025 Kirky.X
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::config::settings::{SettleMode, Settings};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::error::Error as StdError;
use std::time::Duration;
use thiserror::Error;

/// 抓取错误类型
///
/// 抓取错误对单个 URL 的流水线是致命的。
#[derive(Error, Debug)]
pub enum FetchError {
    /// URL 不合法或被策略拒绝
    #[error("Invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
    /// 超时
    #[error("Request to {url} timed out after {timeout_ms} ms")]
    Timeout { url: String, timeout_ms: u64 },
    /// 连接失败
    #[error("Connection to {url} refused: {message}")]
    ConnectionRefused { url: String, message: String },
    /// TLS 握手失败
    #[error("TLS handshake with {url} failed: {message}")]
    Tls { url: String, message: String },
    /// HTTP 状态码 >= 400
    #[error("{url} answered with HTTP {status}")]
    HttpStatus { url: String, status: u16 },
    /// 重定向回到已访问过的地址
    #[error("Redirect loop detected at {url}")]
    RedirectLoop { url: String, chain: Vec<String> },
    /// 重定向次数超过上限
    #[error("More than {max} redirects starting from {url}")]
    TooManyRedirects { url: String, max: usize },
    /// 其他请求错误
    #[error("Request to {url} failed: {message}")]
    Request { url: String, message: String },
}

impl FetchError {
    /// 机器可读的错误类别
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::InvalidUrl { .. } => "invalid_url",
            FetchError::Timeout { .. } => "timeout",
            FetchError::ConnectionRefused { .. } => "connection_refused",
            FetchError::Tls { .. } => "tls_error",
            FetchError::HttpStatus { .. } => "http_status",
            FetchError::RedirectLoop { .. } => "redirect_loop",
            FetchError::TooManyRedirects { .. } => "too_many_redirects",
            FetchError::Request { .. } => "request_failed",
        }
    }

    /// 将 reqwest 错误映射为抓取错误
    pub fn from_reqwest(url: &str, err: reqwest::Error, timeout: Duration) -> Self {
        let chain = error_chain(&err);
        // the top-level message embeds the URL, so only causes are inspected
        let causes = err.source().map(error_chain).unwrap_or_default();
        if err.is_timeout() {
            return FetchError::Timeout {
                url: url.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            };
        }
        if looks_like_tls(&causes) {
            return FetchError::Tls {
                url: url.to_string(),
                message: chain,
            };
        }
        if err.is_connect() {
            return FetchError::ConnectionRefused {
                url: url.to_string(),
                message: chain,
            };
        }
        if let Some(status) = err.status() {
            return FetchError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            };
        }
        FetchError::Request {
            url: url.to_string(),
            message: chain,
        }
    }
}

fn error_chain(err: &(dyn StdError + 'static)) -> String {
    let mut parts = vec![err.to_string()];
    let mut source = err.source();
    while let Some(inner) = source {
        parts.push(inner.to_string());
        source = inner.source();
    }
    parts.join(": ")
}

fn looks_like_tls(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    ["certificate", "tls", "ssl", "handshake"]
        .iter()
        .any(|needle| lower.contains(needle))
}

/// 渲染错误类型
///
/// 渲染错误不会终止流水线，下游阶段回退到原始 HTML。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    /// 导航或等待稳定点超时
    #[error("Navigation to {url} timed out after {timeout_ms} ms")]
    NavigationTimeout { url: String, timeout_ms: u64 },
    /// 导航失败（DNS、连接被拒等）
    #[error("Navigation to {url} failed: {message}")]
    NavigationFailed { url: String, message: String },
    /// 页面脚本或渲染进程崩溃
    #[error("Page crashed while rendering: {0}")]
    ScriptCrash(String),
    /// 浏览器不可用
    #[error("Rendering engine unavailable: {0}")]
    EngineUnavailable(String),
}

impl RenderError {
    pub fn kind(&self) -> &'static str {
        match self {
            RenderError::NavigationTimeout { .. } => "navigation_timeout",
            RenderError::NavigationFailed { .. } => "navigation_failed",
            RenderError::ScriptCrash(_) => "script_crash",
            RenderError::EngineUnavailable(_) => "engine_unavailable",
        }
    }
}

/// 渲染稳定点策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlePolicy {
    /// 资源请求数在 `idle` 时间内不再变化，最长等待 `max_wait`
    NetworkIdle { idle: Duration, max_wait: Duration },
    /// 固定等待
    FixedDelay(Duration),
}

/// 爬取请求
///
/// 一个 URL 及其隐含配置，创建后不可变。
#[derive(Debug, Clone)]
pub struct CrawlRequest {
    url: String,
    fetch_timeout: Duration,
    render_timeout: Duration,
    settle: SettlePolicy,
}

impl CrawlRequest {
    pub fn new(url: impl Into<String>, settings: &Settings) -> Self {
        let render = &settings.render;
        let settle = match render.settle {
            SettleMode::NetworkIdle => SettlePolicy::NetworkIdle {
                idle: Duration::from_millis(render.network_idle_ms),
                max_wait: Duration::from_millis(render.settle_timeout_ms),
            },
            SettleMode::FixedDelay => {
                SettlePolicy::FixedDelay(Duration::from_millis(render.settle_delay_ms))
            }
        };
        Self {
            url: url.into(),
            fetch_timeout: settings.fetch.timeout(),
            render_timeout: render.timeout(),
            settle,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn fetch_timeout(&self) -> Duration {
        self.fetch_timeout
    }

    pub fn render_timeout(&self) -> Duration {
        self.render_timeout
    }

    pub fn settle(&self) -> SettlePolicy {
        self.settle
    }
}

/// 原始抓取结果
#[derive(Debug, Clone)]
pub struct RawFetchResult {
    /// 请求的 URL
    pub url: String,
    /// 跟随重定向后的最终 URL
    pub final_url: String,
    pub status_code: u16,
    /// 响应头（名称小写）
    pub headers: BTreeMap<String, String>,
    pub content_type: Option<String>,
    /// 解码后的响应体
    pub body: String,
    /// 解码所用字符编码
    pub encoding: String,
    /// 原始响应体字节数
    pub content_length: usize,
    pub redirect_chain: Vec<String>,
    pub duration_ms: u64,
}

/// 渲染结果
#[derive(Debug, Clone)]
pub struct RenderResult {
    /// 稳定点之后序列化的 DOM
    pub html: String,
    /// 页面最终 URL
    pub final_url: Option<String>,
    pub duration_ms: u64,
    /// 未捕获的页面异常
    pub console_errors: Vec<String>,
}

/// 原始 HTML 抓取器
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// 执行抓取
    async fn fetch(&self, request: &CrawlRequest) -> Result<RawFetchResult, FetchError>;

    /// 抓取器名称
    fn name(&self) -> &'static str;
}

/// 支持 JavaScript 的渲染器
#[async_trait]
pub trait Renderer: Send + Sync {
    /// 导航到 URL，等待稳定点并序列化 DOM
    async fn render(&self, request: &CrawlRequest) -> Result<RenderResult, RenderError>;

    /// 渲染器名称
    fn name(&self) -> &'static str;
}
