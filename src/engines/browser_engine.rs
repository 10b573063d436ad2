// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::config::settings::RenderSettings;
use crate::engines::traits::{CrawlRequest, RenderError, RenderResult, Renderer, SettlePolicy};
use async_trait::async_trait;
use chromiumoxide::cdp::js_protocol::runtime::{
    ConsoleApiCalledType, EventConsoleApiCalled, EventExceptionThrown, RemoteObject,
};
use chromiumoxide::error::CdpError;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::OnceCell;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

/// 网络空闲检测的轮询间隔
const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// 页面加载状态与已发起的资源请求数
const SETTLE_PROBE: &str =
    "[document.readyState === 'complete', performance.getEntriesByType('resource').length]";

/// 浏览器渲染引擎
///
/// 基于chromiumoxide实现。浏览器在第一次渲染时才启动（或连接远程实例），
/// 之后所有会话共享同一个浏览器进程，每次渲染使用独立页面。
pub struct ChromiumRenderer {
    settings: RenderSettings,
    browser: OnceCell<Browser>,
    handler_task: Mutex<Option<JoinHandle<()>>>,
}

impl ChromiumRenderer {
    pub fn new(settings: RenderSettings) -> Self {
        Self {
            settings,
            browser: OnceCell::new(),
            handler_task: Mutex::new(None),
        }
    }

    // Lazily launches or connects to the browser exactly once.
    async fn browser(&self) -> Result<&Browser, RenderError> {
        self.browser
            .get_or_try_init(|| async {
                let (browser, mut handler) = if let Some(url) = &self.settings.remote_debugging_url
                {
                    info!("Connecting to remote Chrome instance at: {}", url);
                    Browser::connect(url.as_str()).await.map_err(|e| {
                        RenderError::EngineUnavailable(format!(
                            "Failed to connect to remote Chrome: {}",
                            e
                        ))
                    })?
                } else {
                    let mut builder = BrowserConfig::builder()
                        .no_sandbox()
                        .request_timeout(self.settings.timeout());
                    if let Some(path) = &self.settings.chrome_executable {
                        builder = builder.chrome_executable(path);
                    }
                    for arg in &self.settings.chrome_args {
                        builder = builder.arg(arg.as_str());
                    }
                    let config = builder.build().map_err(RenderError::EngineUnavailable)?;
                    info!("Launching headless Chrome");
                    Browser::launch(config)
                        .await
                        .map_err(|e| RenderError::EngineUnavailable(e.to_string()))?
                };

                // Spawn a handler to process browser events
                let task = tokio::spawn(async move {
                    while let Some(h) = handler.next().await {
                        if h.is_err() {
                            break;
                        }
                    }
                });
                *self.handler_task.lock() = Some(task);

                Ok(browser)
            })
            .await
    }

    async fn capture(
        &self,
        page: &Page,
        request: &CrawlRequest,
    ) -> Result<(String, Option<String>, Vec<String>), RenderError> {
        let console_errors = Arc::new(Mutex::new(Vec::new()));
        let mut listeners = Vec::with_capacity(2);
        match page.event_listener::<EventExceptionThrown>().await {
            Ok(mut events) => {
                let sink = Arc::clone(&console_errors);
                listeners.push(tokio::spawn(async move {
                    while let Some(event) = events.next().await {
                        sink.lock().push(describe_exception(&event));
                    }
                }));
            }
            Err(e) => warn!("Failed to subscribe to page exceptions: {}", e),
        }
        match page.event_listener::<EventConsoleApiCalled>().await {
            Ok(mut events) => {
                let sink = Arc::clone(&console_errors);
                listeners.push(tokio::spawn(async move {
                    while let Some(event) = events.next().await {
                        if event.r#type == ConsoleApiCalledType::Error {
                            sink.lock().push(describe_console_error(&event.args));
                        }
                    }
                }));
            }
            Err(e) => warn!("Failed to subscribe to console messages: {}", e),
        }

        let outcome = self.navigate_and_serialize(page, request).await;

        for listener in listeners {
            listener.abort();
        }
        let errors = std::mem::take(&mut *console_errors.lock());
        outcome.map(|(html, final_url)| (html, final_url, errors))
    }

    async fn navigate_and_serialize(
        &self,
        page: &Page,
        request: &CrawlRequest,
    ) -> Result<(String, Option<String>), RenderError> {
        if let Some(user_agent) = &self.settings.user_agent {
            page.set_user_agent(user_agent.as_str())
                .await
                .map_err(|e| RenderError::ScriptCrash(e.to_string()))?;
        }

        page.goto(request.url()).await.map_err(|e| match e {
            CdpError::Timeout => RenderError::NavigationTimeout {
                url: request.url().to_string(),
                timeout_ms: request.render_timeout().as_millis() as u64,
            },
            other => RenderError::NavigationFailed {
                url: request.url().to_string(),
                message: other.to_string(),
            },
        })?;

        settle(page, request.settle()).await?;

        let html = page
            .content()
            .await
            .map_err(|e| RenderError::ScriptCrash(e.to_string()))?;
        let final_url = page.url().await.ok().flatten();
        Ok((html, final_url))
    }
}

impl Drop for ChromiumRenderer {
    fn drop(&mut self) {
        if let Some(task) = self.handler_task.lock().take() {
            task.abort();
        }
    }
}

#[async_trait]
impl Renderer for ChromiumRenderer {
    /// 渲染页面
    ///
    /// # 参数
    ///
    /// * `request` - 爬取请求，提供 URL、超时和稳定点策略
    ///
    /// # 返回值
    ///
    /// * `Ok(RenderResult)` - 稳定点之后序列化的 DOM
    /// * `Err(RenderError)` - 导航超时、页面崩溃或浏览器不可用
    #[instrument(skip(self, request), fields(url = %request.url()))]
    async fn render(&self, request: &CrawlRequest) -> Result<RenderResult, RenderError> {
        let start = Instant::now();
        let timeout = request.render_timeout();

        let browser = self.browser().await?;
        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| RenderError::EngineUnavailable(e.to_string()))?;
        let guard = PageGuard::new(page.clone());

        let outcome = match tokio::time::timeout(timeout, self.capture(&page, request)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(RenderError::NavigationTimeout {
                url: request.url().to_string(),
                timeout_ms: timeout.as_millis() as u64,
            }),
        };
        guard.close().await;

        let (html, final_url, console_errors) = outcome?;
        let duration_ms = start.elapsed().as_millis() as u64;
        debug!(
            "Rendered {} in {} ms ({} page errors)",
            request.url(),
            duration_ms,
            console_errors.len()
        );

        Ok(RenderResult {
            html,
            final_url,
            duration_ms,
            console_errors,
        })
    }

    fn name(&self) -> &'static str {
        "chromium"
    }
}

async fn settle(page: &Page, policy: SettlePolicy) -> Result<(), RenderError> {
    match policy {
        SettlePolicy::FixedDelay(delay) => {
            tokio::time::sleep(delay).await;
            Ok(())
        }
        SettlePolicy::NetworkIdle { idle, max_wait } => {
            let deadline = Instant::now() + max_wait;
            let mut last_count: Option<u64> = None;
            let mut quiet_since = Instant::now();
            loop {
                let (complete, count): (bool, u64) = page
                    .evaluate(SETTLE_PROBE)
                    .await
                    .map_err(|e| RenderError::ScriptCrash(e.to_string()))?
                    .into_value()
                    .map_err(|e| RenderError::ScriptCrash(e.to_string()))?;

                let now = Instant::now();
                if last_count != Some(count) || !complete {
                    last_count = Some(count);
                    quiet_since = now;
                } else if now.duration_since(quiet_since) >= idle {
                    return Ok(());
                }
                if now >= deadline {
                    debug!("Network never went idle, capturing after {:?}", max_wait);
                    return Ok(());
                }
                tokio::time::sleep(IDLE_POLL_INTERVAL).await;
            }
        }
    }
}

fn describe_exception(event: &EventExceptionThrown) -> String {
    let details = &event.exception_details;
    details
        .exception
        .as_ref()
        .and_then(|object| object.description.clone())
        .unwrap_or_else(|| details.text.clone())
}

/// `console.error` 调用的参数按控制台的方式拼接
fn describe_console_error(args: &[RemoteObject]) -> String {
    let parts: Vec<String> = args
        .iter()
        .filter_map(|arg| match &arg.value {
            Some(Value::String(text)) => Some(text.clone()),
            Some(other) => Some(other.to_string()),
            None => arg.description.clone(),
        })
        .collect();
    format!("console.error: {}", parts.join(" "))
}

/// 页面守卫
///
/// 保证页面在任何路径上都会被关闭；未显式关闭时在析构中异步关闭。
struct PageGuard {
    page: Option<Page>,
}

impl PageGuard {
    fn new(page: Page) -> Self {
        Self { page: Some(page) }
    }

    async fn close(mut self) {
        if let Some(page) = self.page.take() {
            if let Err(e) = page.close().await {
                warn!("Failed to close page: {}", e);
            }
        }
    }
}

impl Drop for PageGuard {
    fn drop(&mut self) {
        if let Some(page) = self.page.take() {
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                handle.spawn(async move {
                    let _ = page.close().await;
                });
            }
        }
    }
}
