// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::engines::traits::{CrawlRequest, RenderError, RenderResult, Renderer};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

/// 渲染会话
///
/// 持有渲染池的一个许可，析构时自动归还。
pub struct RenderSession {
    renderer: Arc<dyn Renderer>,
    _permit: OwnedSemaphorePermit,
    active_count: Arc<AtomicUsize>,
}

impl RenderSession {
    /// 在该会话中执行一次渲染
    pub async fn render(&self, request: &CrawlRequest) -> Result<RenderResult, RenderError> {
        self.renderer.render(request).await
    }
}

impl Drop for RenderSession {
    fn drop(&mut self) {
        let remaining = self.active_count.fetch_sub(1, Ordering::SeqCst) - 1;
        metrics::gauge!("geo_render_sessions_active").set(remaining as f64);
    }
}

/// 渲染池
///
/// 用信号量限制同时进行的渲染会话数量
pub struct RenderPool {
    renderer: Arc<dyn Renderer>,
    semaphore: Arc<Semaphore>,
    max_sessions: usize,
    active_count: Arc<AtomicUsize>,
    peak_count: AtomicUsize,
}

impl RenderPool {
    pub fn new(renderer: Arc<dyn Renderer>, max_sessions: usize) -> Self {
        let max_sessions = max_sessions.max(1);
        Self {
            renderer,
            semaphore: Arc::new(Semaphore::new(max_sessions)),
            max_sessions,
            active_count: Arc::new(AtomicUsize::new(0)),
            peak_count: AtomicUsize::new(0),
        }
    }

    /// 获取一个渲染会话
    ///
    /// 达到上限时等待，池已关闭时返回 `EngineUnavailable`
    pub async fn acquire(&self) -> Result<RenderSession, RenderError> {
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| RenderError::EngineUnavailable("render pool is closed".to_string()))?;

        let active = self.active_count.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_count.fetch_max(active, Ordering::SeqCst);
        metrics::gauge!("geo_render_sessions_active").set(active as f64);
        debug!("Render session acquired ({}/{})", active, self.max_sessions);

        Ok(RenderSession {
            renderer: Arc::clone(&self.renderer),
            _permit: permit,
            active_count: Arc::clone(&self.active_count),
        })
    }

    /// 获取会话并渲染，渲染本身受请求的渲染超时约束
    pub async fn render(&self, request: &CrawlRequest) -> Result<RenderResult, RenderError> {
        let session = self.acquire().await?;
        let timeout = request.render_timeout();
        match tokio::time::timeout(timeout, session.render(request)).await {
            Ok(result) => result,
            Err(_) => Err(RenderError::NavigationTimeout {
                url: request.url().to_string(),
                timeout_ms: timeout.as_millis() as u64,
            }),
        }
    }

    /// 关闭渲染池，之后的获取请求全部失败
    pub fn close(&self) {
        self.semaphore.close();
    }

    pub fn renderer_name(&self) -> &'static str {
        self.renderer.name()
    }

    /// 当前活动会话数
    pub fn active(&self) -> usize {
        self.active_count.load(Ordering::SeqCst)
    }

    /// 历史最高活动会话数
    pub fn peak(&self) -> usize {
        self.peak_count.load(Ordering::SeqCst)
    }

    /// 剩余可用许可数
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    pub fn max_sessions(&self) -> usize {
        self.max_sessions
    }
}
