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

use crate::domain::models::structured_data::SourceFormat;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use validator::{Validate, ValidationErrors};

/// 配置错误类型
#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("配置加载失败: {0}")]
    Load(#[from] ConfigError),

    #[error("配置校验失败: {0}")]
    Invalid(#[from] ValidationErrors),
}

/// 爬虫配置设置
///
/// 包含抓取、渲染、DOM 差异、提取、归一化、内容分析和编排等所有配置项
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct Settings {
    /// 抓取配置
    #[validate(nested)]
    pub fetch: FetchSettings,
    /// 渲染配置
    #[validate(nested)]
    pub render: RenderSettings,
    /// DOM 差异配置
    #[validate(nested)]
    pub diff: DiffSettings,
    /// 结构化数据提取配置
    pub extraction: ExtractionSettings,
    /// 归一化配置
    #[validate(nested)]
    pub normalizer: NormalizerSettings,
    /// 内容分析配置
    #[validate(nested)]
    pub analyzer: AnalyzerSettings,
    /// 编排配置
    #[validate(nested)]
    pub orchestrator: OrchestratorSettings,
}

/// 抓取配置设置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct FetchSettings {
    /// 请求超时时间（秒）
    #[validate(range(min = 1))]
    pub timeout_secs: u64,
    /// 最多跟随的重定向次数
    #[validate(range(max = 50))]
    pub max_redirects: usize,
    /// User-Agent 请求头
    #[validate(length(min = 1))]
    pub user_agent: String,
    /// Accept 请求头
    pub accept: String,
    /// Accept-Language 请求头
    pub accept_language: String,
    /// 额外请求头
    pub extra_headers: BTreeMap<String, String>,
    /// 是否拒绝解析到私有网络地址的 URL
    pub block_private_networks: bool,
    /// 禁止访问的域名（包含子域名）
    pub blocked_domains: Vec<String>,
}

impl FetchSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            max_redirects: 10,
            user_agent: "Mozilla/5.0 (compatible; geo-crawlrs/0.1)".to_string(),
            accept: "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"
                .to_string(),
            accept_language: "en-US,en;q=0.9".to_string(),
            extra_headers: BTreeMap::new(),
            block_private_networks: false,
            blocked_domains: Vec::new(),
        }
    }
}

/// 渲染稳定点模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SettleMode {
    /// 网络空闲
    #[default]
    NetworkIdle,
    /// 固定延时
    FixedDelay,
}

/// 渲染配置设置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct RenderSettings {
    /// 是否启用浏览器渲染
    pub enabled: bool,
    /// 单次渲染超时时间（秒）
    #[validate(range(min = 1))]
    pub timeout_secs: u64,
    /// 稳定点模式
    pub settle: SettleMode,
    /// 网络空闲判定窗口（毫秒）
    #[validate(range(min = 50))]
    pub network_idle_ms: u64,
    /// 网络空闲等待上限（毫秒）
    #[validate(range(min = 100))]
    pub settle_timeout_ms: u64,
    /// 固定延时（毫秒）
    pub settle_delay_ms: u64,
    /// 同时打开的渲染会话上限
    #[validate(range(min = 1, max = 64))]
    pub max_sessions: usize,
    /// 连接已有浏览器的 DevTools WebSocket 地址，不设置则本地启动
    #[validate(url)]
    pub remote_debugging_url: Option<String>,
    /// 浏览器可执行文件路径
    pub chrome_executable: Option<String>,
    /// 额外的浏览器启动参数
    pub chrome_args: Vec<String>,
    /// 渲染时使用的 User-Agent
    pub user_agent: Option<String>,
}

impl RenderSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_secs: 30,
            settle: SettleMode::NetworkIdle,
            network_idle_ms: 500,
            settle_timeout_ms: 10_000,
            settle_delay_ms: 1_500,
            max_sessions: 3,
            remote_debugging_url: None,
            chrome_executable: None,
            chrome_args: vec![
                "--disable-gpu".to_string(),
                "--disable-dev-shm-usage".to_string(),
            ],
            user_agent: None,
        }
    }
}

/// DOM 差异配置设置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct DiffSettings {
    /// 参与比较的属性
    pub significant_attributes: Vec<String>,
    /// 整棵子树忽略的标签
    pub ignored_tags: Vec<String>,
    /// 差异条目上限
    #[validate(range(min = 1))]
    pub max_changes: usize,
    /// 子节点对齐矩阵的单元格上限，超过后按位置对齐
    #[validate(range(min = 1))]
    pub max_alignment_cells: usize,
}

impl Default for DiffSettings {
    fn default() -> Self {
        Self {
            significant_attributes: [
                "id",
                "class",
                "href",
                "src",
                "alt",
                "title",
                "content",
                "value",
                "name",
                "aria-label",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            ignored_tags: ["script", "style", "noscript", "template"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            max_changes: 500,
            max_alignment_cells: 1_000_000,
        }
    }
}

/// 结构化数据提取配置设置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionSettings {
    /// 渲染成功时从渲染后的 DOM 提取，否则从原始 HTML 提取
    pub prefer_rendered: bool,
}

impl Default for ExtractionSettings {
    fn default() -> Self {
        Self {
            prefer_rendered: true,
        }
    }
}

/// 归一化配置设置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct NormalizerSettings {
    /// 来源格式优先级，靠前者优先
    #[validate(length(min = 1))]
    pub precedence: Vec<SourceFormat>,
}

impl Default for NormalizerSettings {
    fn default() -> Self {
        Self {
            precedence: SourceFormat::ALL.to_vec(),
        }
    }
}

/// 内容分析配置设置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct AnalyzerSettings {
    /// 从正文中剔除的标签
    pub excluded_tags: Vec<String>,
    /// 正文区域选择器，匹配到时只分析这些区域
    pub content_selectors: Vec<String>,
    /// 阅读速度（词/分钟）
    #[validate(range(min = 1))]
    pub words_per_minute: u32,
    /// 文本识别结果的最低可信度，低于此值时优先使用声明的语言
    #[validate(range(min = 0.0, max = 1.0))]
    pub min_language_confidence: f64,
}

impl Default for AnalyzerSettings {
    fn default() -> Self {
        Self {
            excluded_tags: [
                "script", "style", "noscript", "template", "svg", "iframe", "nav", "footer",
                "header", "aside",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            content_selectors: Vec::new(),
            words_per_minute: 200,
            min_language_confidence: 0.5,
        }
    }
}

/// 编排配置设置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct OrchestratorSettings {
    /// 同时处理的 URL 上限
    #[validate(range(min = 1, max = 1024))]
    pub max_concurrency: usize,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self { max_concurrency: 5 }
    }
}

impl Settings {
    /// 创建新的配置实例
    ///
    /// 依次叠加内置默认值、`config/default`、`config/{APP_ENVIRONMENT}`
    /// 和 `GEOCRAWL__` 前缀的环境变量
    ///
    /// # Returns
    ///
    /// * `Ok(Settings)` - 成功加载并校验的配置
    /// * `Err(SettingsError)` - 配置加载或校验失败
    pub fn new() -> Result<Self, SettingsError> {
        let env = std::env::var("APP_ENVIRONMENT").unwrap_or_else(|_| "default".to_string());
        let settings: Settings = Config::builder()
            .add_source(Config::try_from(&Settings::default())?)
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(Environment::with_prefix("GEOCRAWL").separator("__"))
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    /// 从指定文件加载配置，未出现的键使用默认值
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let settings: Settings = Config::builder()
            .add_source(Config::try_from(&Settings::default())?)
            .add_source(File::from(path.as_ref()).required(true))
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }
}

#[cfg(test)]
#[path = "settings_test.rs"]
mod tests;
