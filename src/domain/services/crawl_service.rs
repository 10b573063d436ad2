// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::config::settings::{Settings, SettingsError};
use crate::domain::models::crawl_record::{
    ContentSource, CrawlErrorInfo, CrawlInfo, CrawlOutcome, CrawlRecord, HttpInfo, PipelineStage,
};
use crate::domain::models::dom_diff::DomDiff;
use crate::domain::models::structured_data::StructuredDataBundle;
use crate::domain::services::content_analysis_service::ContentAnalysisService;
use crate::domain::services::dom_diff_service::DomDiffService;
use crate::domain::services::extraction_service::ExtractionService;
use crate::domain::services::normalization_service::NormalizationService;
use crate::engines::browser_engine::ChromiumRenderer;
use crate::engines::render_pool::RenderPool;
use crate::engines::reqwest_engine::ReqwestFetcher;
use crate::engines::traits::{CrawlRequest, FetchError, Fetcher, Renderer};
use crate::utils::errors::{AnalysisError, CrawlError};
use chrono::Utc;
use futures::stream::{self, StreamExt};
use metrics::counter;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use url::Url;
use validator::Validate;

/// GEO 爬虫
///
/// 流水线的唯一组装者：对每个 URL 依次抓取、渲染，然后并行执行
/// DOM 差异、结构化数据提取与归一化、内容分析，最终得到一条 `CrawlRecord`。
/// 任何阶段失败都不会让调用方拿不到记录。
pub struct GeoCrawler {
    settings: Arc<Settings>,
    fetcher: Arc<dyn Fetcher>,
    render_pool: Option<Arc<RenderPool>>,
    diff_service: Arc<DomDiffService>,
    normalizer: Arc<NormalizationService>,
    analyzer: Arc<ContentAnalysisService>,
}

impl GeoCrawler {
    /// 使用 reqwest 抓取器和 Chromium 渲染器创建爬虫
    pub fn new(settings: Settings) -> Result<Self, CrawlError> {
        let fetcher = Arc::new(ReqwestFetcher::new(settings.fetch.clone()));
        let renderer = Arc::new(ChromiumRenderer::new(settings.render.clone()));
        Self::with_engines(settings, fetcher, renderer)
    }

    /// 使用自定义引擎创建爬虫
    ///
    /// # 参数
    ///
    /// * `settings` - 配置，创建前会先校验
    /// * `fetcher` - 原始 HTML 抓取器
    /// * `renderer` - 浏览器渲染器；`render.enabled` 为 false 时不会被使用
    pub fn with_engines(
        settings: Settings,
        fetcher: Arc<dyn Fetcher>,
        renderer: Arc<dyn Renderer>,
    ) -> Result<Self, CrawlError> {
        settings.validate().map_err(SettingsError::from)?;

        let render_pool = settings
            .render
            .enabled
            .then(|| Arc::new(RenderPool::new(renderer, settings.render.max_sessions)));

        Ok(Self {
            diff_service: Arc::new(DomDiffService::new(&settings.diff)),
            normalizer: Arc::new(NormalizationService::new(&settings.normalizer)),
            analyzer: Arc::new(ContentAnalysisService::new(&settings.analyzer)),
            settings: Arc::new(settings),
            fetcher,
            render_pool,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// 渲染池；禁用渲染时为 None
    pub fn render_pool(&self) -> Option<&RenderPool> {
        self.render_pool.as_deref()
    }

    /// 爬取单个 URL
    ///
    /// 总是返回一条记录；致命错误写入 `crawl_info.error`，
    /// 此时 `crawl_info.success` 为 false。
    #[instrument(skip(self))]
    pub async fn crawl_url(&self, url: &str) -> CrawlRecord {
        self.run_pipeline(url).await
    }

    /// 可取消地爬取单个 URL
    ///
    /// 取消时丢弃已完成的部分并释放渲染会话。
    #[instrument(skip(self, token))]
    pub async fn crawl_url_with_cancel(
        &self,
        url: &str,
        token: &CancellationToken,
    ) -> Result<CrawlRecord, CrawlError> {
        tokio::select! {
            biased;
            _ = token.cancelled() => {
                counter!("geo_crawl_total", "outcome" => "cancelled").increment(1);
                info!("Crawl of {} cancelled", url);
                Err(CrawlError::Cancelled)
            }
            record = self.run_pipeline(url) => Ok(record),
        }
    }

    /// 批量爬取
    ///
    /// # 参数
    ///
    /// * `urls` - 待爬取的 URL 列表
    ///
    /// # 返回值
    ///
    /// * `Ok(Vec<CrawlOutcome>)` - 与输入顺序一致，每个 URL 一个结果
    /// * `Err(CrawlError::EmptyBatch)` - URL 列表为空
    pub async fn crawl_multiple_urls<S: AsRef<str>>(
        &self,
        urls: &[S],
    ) -> Result<Vec<CrawlOutcome>, CrawlError> {
        self.crawl_multiple_urls_with_cancel(urls, &CancellationToken::new())
            .await
    }

    /// 可取消的批量爬取
    ///
    /// 并发数受 `orchestrator.max_concurrency` 限制。取消后正在进行的
    /// 流水线被丢弃，未完成的 URL 标记为 `Cancelled`，已完成的结果保留。
    #[instrument(skip(self, urls, token), fields(batch_size = urls.len()))]
    pub async fn crawl_multiple_urls_with_cancel<S: AsRef<str>>(
        &self,
        urls: &[S],
        token: &CancellationToken,
    ) -> Result<Vec<CrawlOutcome>, CrawlError> {
        if urls.is_empty() {
            return Err(CrawlError::EmptyBatch);
        }

        let urls: Vec<String> = urls.iter().map(|u| u.as_ref().to_string()).collect();
        let limit = self.settings.orchestrator.max_concurrency.max(1);
        info!(
            "Starting batch crawl of {} URLs (concurrency {})",
            urls.len(),
            limit
        );

        let mut slots: Vec<Option<CrawlOutcome>> = (0..urls.len()).map(|_| None).collect();
        {
            let mut results = Box::pin(
                stream::iter(urls.iter().enumerate())
                    .map(|(index, url)| async move { (index, self.run_pipeline(url).await) })
                    .buffer_unordered(limit),
            );

            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => {
                        warn!("Batch crawl cancelled, discarding in-flight pipelines");
                        break;
                    }
                    next = results.next() => match next {
                        Some((index, record)) => slots[index] = Some(CrawlOutcome::from_record(record)),
                        None => break,
                    },
                }
            }
            // Dropping the stream aborts in-flight pipelines and releases their render sessions
        }

        let outcomes: Vec<CrawlOutcome> = slots
            .into_iter()
            .zip(urls)
            .map(|(slot, url)| {
                slot.unwrap_or_else(|| {
                    counter!("geo_crawl_total", "outcome" => "cancelled").increment(1);
                    CrawlOutcome::Cancelled { url }
                })
            })
            .collect();

        let completed = outcomes.iter().filter(|o| o.is_completed()).count();
        info!(
            "Batch crawl finished: {} completed, {} failed, {} cancelled",
            completed,
            outcomes.iter().filter(|o| o.is_failed()).count(),
            outcomes.iter().filter(|o| o.is_cancelled()).count()
        );
        Ok(outcomes)
    }

    async fn run_pipeline(&self, url: &str) -> CrawlRecord {
        let mut state = PipelineState::new(url);
        let request = CrawlRequest::new(url, &self.settings);
        debug!(
            "Pipeline {} started for {}",
            state.record.crawl_info.crawl_id, url
        );

        // 抓取
        state.enter(PipelineStage::Fetching);
        let fetch_timeout = request.fetch_timeout();
        let fetched = match tokio::time::timeout(fetch_timeout, self.fetcher.fetch(&request)).await
        {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout {
                url: url.to_string(),
                timeout_ms: fetch_timeout.as_millis() as u64,
            }),
        };
        let fetched = match fetched {
            Ok(fetched) => fetched,
            Err(e) => return state.fail(CrawlError::Fetch(e)),
        };

        let raw: Arc<str> = Arc::from(fetched.body);
        let final_url = fetched.final_url;
        {
            let info = &mut state.record.crawl_info;
            info.final_url = Some(final_url.clone());
            info.fetch_duration_ms = Some(fetched.duration_ms);
        }
        state.record.http_info = Some(HttpInfo {
            status_code: fetched.status_code,
            final_url: final_url.clone(),
            headers: fetched.headers,
            content_type: fetched.content_type,
            content_length: fetched.content_length,
            encoding: fetched.encoding,
            redirect_chain: fetched.redirect_chain,
            fetch_duration_ms: fetched.duration_ms,
        });
        state.record.raw_html = Some(raw.to_string());

        // 渲染（失败时降级为原始 HTML）
        let rendered: Option<Arc<str>> = match &self.render_pool {
            None => {
                debug!("Rendering disabled, using raw HTML for {}", url);
                None
            }
            Some(pool) => {
                state.enter(PipelineStage::Rendering);
                match pool.render(&request).await {
                    Ok(result) => {
                        let info = &mut state.record.crawl_info;
                        info.render_duration_ms = Some(result.duration_ms);
                        info.rendered = true;
                        for message in result.console_errors {
                            info.warnings.push(CrawlErrorInfo::degraded(
                                PipelineStage::Rendering,
                                "page_error",
                                message,
                            ));
                        }
                        Some(Arc::from(result.html))
                    }
                    Err(e) => {
                        warn!("Render failed for {}, falling back to raw HTML: {}", url, e);
                        state.degrade(CrawlError::Render(e).to_info(PipelineStage::Rendering));
                        None
                    }
                }
            }
        };
        state.record.rendered_html = rendered.as_ref().map(|html| html.to_string());

        let content = match &rendered {
            Some(html) if self.settings.extraction.prefer_rendered => {
                state.record.crawl_info.content_source = ContentSource::Rendered;
                Arc::clone(html)
            }
            _ => {
                state.record.crawl_info.content_source = ContentSource::Raw;
                Arc::clone(&raw)
            }
        };

        // DOM 差异与结构化数据提取
        state.enter(PipelineStage::Extracting);
        let diff_task = rendered.map(|rendered| {
            let service = Arc::clone(&self.diff_service);
            let raw = Arc::clone(&raw);
            tokio::task::spawn_blocking(move || service.diff(&raw, &rendered))
        });
        let extract_task = {
            let html = Arc::clone(&content);
            tokio::task::spawn_blocking(move || ExtractionService::extract(&html))
        };
        let (diff_result, extract_result) = tokio::join!(
            async move {
                match diff_task {
                    Some(task) => Some(task.await),
                    None => None,
                }
            },
            extract_task
        );

        state.record.dom_diff = match diff_result {
            Some(Ok(diff)) => diff,
            Some(Err(e)) => {
                state.degrade(task_failure(PipelineStage::Extracting, "dom diff", e));
                DomDiff::not_compared()
            }
            None => DomDiff::not_compared(),
        };
        let bundle = match extract_result {
            Ok(bundle) => bundle,
            Err(e) => {
                state.degrade(task_failure(PipelineStage::Extracting, "extraction", e));
                StructuredDataBundle::default()
            }
        };
        for parse_error in &bundle.parse_errors {
            debug!(
                "Structured data block {} of {} skipped: {}",
                parse_error.block_index, parse_error.format, parse_error.message
            );
        }

        // 归一化与内容分析（并行）
        state.enter(PipelineStage::Analyzing);
        let base_url = match Url::parse(&final_url).or_else(|_| Url::parse(url)) {
            Ok(base_url) => base_url,
            Err(e) => {
                return state.fail(CrawlError::Analysis(AnalysisError::Unparsable(format!(
                    "invalid page URL {}: {}",
                    final_url, e
                ))))
            }
        };
        let bundle = Arc::new(bundle);
        let normalize_task = {
            let service = Arc::clone(&self.normalizer);
            let bundle = Arc::clone(&bundle);
            tokio::task::spawn_blocking(move || service.normalize(&bundle))
        };
        let analyze_task = {
            let service = Arc::clone(&self.analyzer);
            let html = Arc::clone(&content);
            tokio::task::spawn_blocking(move || service.analyze(&html, &base_url))
        };
        let (normalized, analysis) = tokio::join!(normalize_task, analyze_task);

        state.record.structured_data =
            Arc::try_unwrap(bundle).unwrap_or_else(|shared| (*shared).clone());
        match normalized {
            Ok(normalized) => state.record.structured_data_normalized = normalized,
            Err(e) => state.degrade(task_failure(PipelineStage::Analyzing, "normalization", e)),
        }

        match analysis {
            Ok(Ok(analysis)) => {
                let record = &mut state.record;
                record.clean_text = Some(analysis.clean_text);
                record.meta = Some(analysis.meta);
                record.language = analysis.language;
                record.links = analysis.links;
                record.images = analysis.images;
                record.content_stats = Some(analysis.stats);
            }
            Ok(Err(e)) => return state.fail(CrawlError::Analysis(e)),
            Err(e) => {
                return state.fail(CrawlError::StageTask(format!(
                    "content analysis task failed: {}",
                    e
                )))
            }
        }

        state.finish()
    }
}

fn task_failure(stage: PipelineStage, task: &str, err: JoinError) -> CrawlErrorInfo {
    let err = CrawlError::StageTask(format!("{} task failed: {}", task, err));
    CrawlErrorInfo::degraded(stage, err.kind(), err.to_string())
}

/// 单条流水线的状态
///
/// 持有正在组装的记录；`fail` 与 `finish` 消耗状态并盖上结束时间戳。
struct PipelineState {
    record: CrawlRecord,
    started: Instant,
}

impl PipelineState {
    fn new(url: &str) -> Self {
        Self {
            record: CrawlRecord::empty(CrawlInfo::new(url)),
            started: Instant::now(),
        }
    }

    fn stage(&self) -> PipelineStage {
        self.record.crawl_info.stage
    }

    fn enter(&mut self, stage: PipelineStage) {
        // assembled and errored are absorbing
        if self.stage().is_terminal() {
            return;
        }
        debug!(
            "Crawl {}: {} -> {}",
            self.record.crawl_info.crawl_id,
            self.stage(),
            stage
        );
        self.record.crawl_info.stage = stage;
    }

    /// 记录非致命错误；首个降级错误同时写入 `crawl_info.error`
    fn degrade(&mut self, info: CrawlErrorInfo) {
        counter!("geo_crawl_stage_errors_total", "stage" => info.stage.as_str()).increment(1);
        let crawl_info = &mut self.record.crawl_info;
        if crawl_info.error.is_none() {
            crawl_info.error = Some(info.clone());
        }
        crawl_info.warnings.push(info);
    }

    fn fail(mut self, err: CrawlError) -> CrawlRecord {
        let stage = self.stage();
        let mut info = err.to_info(stage);
        info.fatal = true;
        error!(
            "Crawl of {} failed during {}: {}",
            self.record.crawl_info.url, stage, err
        );
        counter!("geo_crawl_stage_errors_total", "stage" => stage.as_str()).increment(1);
        counter!("geo_crawl_total", "outcome" => "failed").increment(1);

        let crawl_info = &mut self.record.crawl_info;
        crawl_info.error = Some(info);
        crawl_info.success = false;
        crawl_info.stage = PipelineStage::Errored;
        self.stamp();
        self.record
    }

    fn finish(mut self) -> CrawlRecord {
        let crawl_info = &mut self.record.crawl_info;
        crawl_info.stage = PipelineStage::Assembled;
        crawl_info.success = true;
        self.stamp();
        counter!("geo_crawl_total", "outcome" => "completed").increment(1);
        info!(
            "Crawled {} in {} ms ({} warnings)",
            self.record.crawl_info.url,
            self.record.crawl_info.duration_ms,
            self.record.crawl_info.warnings.len()
        );
        self.record
    }

    fn stamp(&mut self) {
        let crawl_info = &mut self.record.crawl_info;
        crawl_info.finished_at = Utc::now();
        crawl_info.duration_ms = self.started.elapsed().as_millis() as u64;
    }
}

#[cfg(test)]
#[path = "crawl_service_test.rs"]
mod tests;
