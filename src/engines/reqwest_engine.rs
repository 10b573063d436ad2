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

use crate::config::settings::FetchSettings;
use crate::engines::traits::{CrawlRequest, FetchError, Fetcher, RawFetchResult};
use crate::engines::validators;
use crate::utils::text_encoding::decode_body;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CONTENT_TYPE, LOCATION};
use std::collections::{BTreeMap, HashSet};
use std::time::{Duration, Instant};
use tracing::{debug, instrument, warn};
use url::Url;

/// 抓取引擎
///
/// 基于reqwest实现的原始 HTML 抓取器，不执行 JavaScript。
/// 重定向由抓取器自己跟随，以便记录完整的重定向链并识别循环。
pub struct ReqwestFetcher {
    settings: FetchSettings,
}

impl ReqwestFetcher {
    pub fn new(settings: FetchSettings) -> Self {
        Self { settings }
    }

    fn default_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Ok(value) = HeaderValue::from_str(&self.settings.accept) {
            headers.insert(ACCEPT, value);
        }
        if let Ok(value) = HeaderValue::from_str(&self.settings.accept_language) {
            headers.insert(ACCEPT_LANGUAGE, value);
        }
        for (k, v) in &self.settings.extra_headers {
            match (
                HeaderName::from_bytes(k.as_bytes()),
                HeaderValue::from_str(v),
            ) {
                (Ok(k), Ok(v)) => {
                    headers.insert(k, v);
                }
                _ => warn!("Skipping invalid extra header {}", k),
            }
        }
        headers
    }

    fn build_client(&self, url: &str, timeout: Duration) -> Result<reqwest::Client, FetchError> {
        // Each request gets a fresh client for cookie isolation
        reqwest::Client::builder()
            .user_agent(self.settings.user_agent.as_str())
            .default_headers(self.default_headers())
            .redirect(reqwest::redirect::Policy::none())
            .timeout(timeout)
            .cookie_store(true)
            .build()
            .map_err(|e| FetchError::Request {
                url: url.to_string(),
                message: format!("failed to build HTTP client: {}", e),
            })
    }

    async fn check_url(&self, url: &str) -> Result<Url, FetchError> {
        let parsed = validators::validate_url(url, self.settings.block_private_networks)
            .await
            .map_err(|e| FetchError::InvalidUrl {
                url: url.to_string(),
                reason: e.to_string(),
            })?;
        validators::validate_domain_blacklist(&parsed, &self.settings.blocked_domains).map_err(
            |e| FetchError::InvalidUrl {
                url: url.to_string(),
                reason: e.to_string(),
            },
        )?;
        Ok(parsed)
    }
}

#[async_trait]
impl Fetcher for ReqwestFetcher {
    /// 执行HTTP抓取
    ///
    /// # 参数
    ///
    /// * `request` - 爬取请求
    ///
    /// # 返回值
    ///
    /// * `Ok(RawFetchResult)` - 最终响应及重定向链
    /// * `Err(FetchError)` - 超时、连接失败、TLS 错误、HTTP 错误或重定向异常
    #[instrument(skip(self, request), fields(url = %request.url()))]
    async fn fetch(&self, request: &CrawlRequest) -> Result<RawFetchResult, FetchError> {
        let start = Instant::now();
        let timeout = request.fetch_timeout();
        let mut current = self.check_url(request.url()).await?;
        let client = self.build_client(request.url(), timeout)?;

        let mut chain: Vec<String> = Vec::new();
        let mut visited: HashSet<String> = HashSet::new();

        let response = loop {
            if !visited.insert(current.to_string()) {
                chain.push(current.to_string());
                return Err(FetchError::RedirectLoop {
                    url: current.to_string(),
                    chain,
                });
            }
            chain.push(current.to_string());

            let response = client
                .get(current.clone())
                .send()
                .await
                .map_err(|e| FetchError::from_reqwest(current.as_str(), e, timeout))?;

            let status = response.status();
            let location = response
                .headers()
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);

            match location {
                Some(location) if status.is_redirection() => {
                    if chain.len() > self.settings.max_redirects {
                        return Err(FetchError::TooManyRedirects {
                            url: request.url().to_string(),
                            max: self.settings.max_redirects,
                        });
                    }
                    let next = current.join(&location).map_err(|e| FetchError::InvalidUrl {
                        url: location.clone(),
                        reason: e.to_string(),
                    })?;
                    debug!("Following redirect {} -> {}", current, next);
                    current = self.check_url(next.as_str()).await?;
                }
                _ => break response,
            }
        };

        let status_code = response.status().as_u16();
        if status_code >= 400 {
            return Err(FetchError::HttpStatus {
                url: current.to_string(),
                status: status_code,
            });
        }

        let mut headers: BTreeMap<String, String> = BTreeMap::new();
        for (k, v) in response.headers() {
            if let Ok(v_str) = v.to_str() {
                headers
                    .entry(k.as_str().to_string())
                    .and_modify(|existing| {
                        existing.push_str(", ");
                        existing.push_str(v_str);
                    })
                    .or_insert_with(|| v_str.to_string());
            }
        }
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .filter(|ct| !ct.trim().is_empty());

        let bytes = response
            .bytes()
            .await
            .map_err(|e| FetchError::from_reqwest(current.as_str(), e, timeout))?;
        let decoded = decode_body(&bytes, content_type.as_deref());

        let duration_ms = start.elapsed().as_millis() as u64;
        metrics::histogram!("geo_fetch_duration_ms").record(duration_ms as f64);
        debug!(
            "Fetched {} ({} bytes, {}, {} ms)",
            current,
            bytes.len(),
            decoded.encoding_name(),
            duration_ms
        );

        let encoding = decoded.encoding_name().to_string();
        Ok(RawFetchResult {
            url: request.url().to_string(),
            final_url: current.to_string(),
            status_code,
            headers,
            content_type,
            body: decoded.text,
            encoding,
            content_length: bytes.len(),
            redirect_chain: chain,
            duration_ms,
        })
    }

    /// 获取引擎名称
    ///
    /// # 返回值
    ///
    /// 引擎名称
    fn name(&self) -> &'static str {
        "reqwest"
    }
}

#[cfg(test)]
#[path = "reqwest_engine_test.rs"]
mod tests;
