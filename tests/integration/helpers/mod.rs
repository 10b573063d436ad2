// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use axum::{
    http::{header, StatusCode},
    response::{Html, Redirect},
    routing::get,
    Router,
};
use geo_crawlrs::config::settings::Settings;
use geo_crawlrs::engines::traits::{CrawlRequest, RenderError, RenderResult, Renderer};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::net::TcpListener;
use url::Url;

pub const CAFE_RAW: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="utf-8">
    <title>Harbour Cafe | Oslo</title>
    <meta name="description" content="Coffee and pastries on the Oslo waterfront.">
    <meta name="geo.position" content="59.9100;10.7500">
    <meta name="geo.placename" content="Oslo">
    <meta property="og:title" content="Harbour Cafe">
    <meta property="og:type" content="restaurant.restaurant">
    <script type="application/ld+json">
    {
        "@context": "https://schema.org",
        "@type": "CafeOrCoffeeShop",
        "name": "Harbour Cafe",
        "telephone": "tel:+47 22 00 00 00",
        "address": {
            "@type": "PostalAddress",
            "streetAddress": "Aker Brygge 1",
            "addressLocality": "Oslo",
            "postalCode": "0250",
            "addressCountry": "NO"
        },
        "geo": {"@type": "GeoCoordinates", "latitude": "59.9096", "longitude": "10.7262"}
    }
    </script>
    <script type="application/ld+json">{ this is not json }</script>
</head>
<body>
    <div id="app"></div>
    <script src="/app.js"></script>
</body>
</html>"#;

pub const CAFE_RENDERED: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="utf-8">
    <title>Harbour Cafe | Oslo</title>
    <meta name="description" content="Coffee and pastries on the Oslo waterfront.">
    <meta name="geo.position" content="59.9100;10.7500">
    <meta name="geo.placename" content="Oslo">
    <meta property="og:title" content="Harbour Cafe">
    <meta property="og:type" content="restaurant.restaurant">
    <script type="application/ld+json">
    {
        "@context": "https://schema.org",
        "@type": "CafeOrCoffeeShop",
        "name": "Harbour Cafe",
        "telephone": "tel:+47 22 00 00 00",
        "address": {
            "@type": "PostalAddress",
            "streetAddress": "Aker Brygge 1",
            "addressLocality": "Oslo",
            "postalCode": "0250",
            "addressCountry": "NO"
        },
        "geo": {"@type": "GeoCoordinates", "latitude": "59.9096", "longitude": "10.7262"}
    }
    </script>
    <script type="application/ld+json">{ this is not json }</script>
</head>
<body>
    <div id="app">
        <ol itemscope itemtype="https://schema.org/BreadcrumbList">
            <li itemprop="itemListElement" itemscope itemtype="https://schema.org/ListItem">
                <a itemprop="item" href="/"><span itemprop="name">Home</span></a>
                <meta itemprop="position" content="1">
            </li>
            <li itemprop="itemListElement" itemscope itemtype="https://schema.org/ListItem">
                <a itemprop="item" href="/cafes"><span itemprop="name">Cafes</span></a>
                <meta itemprop="position" content="2">
            </li>
        </ol>
        <h1>Harbour Cafe</h1>
        <p>We serve fresh coffee and pastries on the waterfront. The terrace opens in May.</p>
        <img src="/img/terrace.jpg" alt="Terrace by the water" width="800" height="600">
        <a href="/menu">Menu</a>
        <a href="https://maps.example.org/harbour-cafe">Directions</a>
    </div>
    <script src="/app.js"></script>
</body>
</html>"#;

pub const ARTICLE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head><title>Walking the Old Town</title></head>
<body>
    <nav><a href="/">Home</a></nav>
    <article>
        <h1>Walking the Old Town</h1>
        <p>The walk starts at the cathedral and it follows the river to the old harbour.
           It takes about an hour and there are many cafes along the way.</p>
        <img src="/img/cathedral.jpg" alt="The cathedral">
        <img src="/img/river.jpg">
        <a href="/walks/next">Next walk</a>
    </article>
</body>
</html>"#;

/// 启动本地测试站点，返回形如 `http://127.0.0.1:port` 的地址
pub async fn spawn_site() -> String {
    geo_crawlrs::utils::telemetry::init_telemetry();

    let app = Router::new()
        .route("/cafe", get(|| async { Html(CAFE_RAW) }))
        .route("/article", get(|| async { Html(ARTICLE) }))
        .route(
            "/old-cafe",
            get(|| async { Redirect::permanent("/cafe") }),
        )
        .route("/gone", get(|| async { StatusCode::GONE }))
        .route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(20)).await;
                Html(ARTICLE)
            }),
        )
        .route(
            "/latin1",
            get(|| async {
                (
                    [(header::CONTENT_TYPE, "text/html; charset=iso-8859-1")],
                    b"<html><body><p>Caf\xe9 du port, ouvert tous les jours.</p></body></html>"
                        .to_vec(),
                )
            }),
        );

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

/// 一个没有任何服务监听的地址
pub async fn unreachable_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}/", addr)
}

pub fn test_settings() -> Settings {
    let mut settings = Settings::default();
    settings.fetch.timeout_secs = 5;
    settings.render.timeout_secs = 5;
    settings
}

/// 按路径返回预先准备好的渲染结果；未知路径视为浏览器不可用
#[derive(Default)]
pub struct StaticRenderer {
    pages: HashMap<String, String>,
    delay: Duration,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub calls: AtomicUsize,
}

#[allow(dead_code)]
impl StaticRenderer {
    pub fn with_page(mut self, path: &str, html: &str) -> Self {
        self.pages.insert(path.to_string(), html.to_string());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl Renderer for StaticRenderer {
    async fn render(&self, request: &CrawlRequest) -> Result<RenderResult, RenderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let path = Url::parse(request.url())
            .map(|url| url.path().to_string())
            .unwrap_or_default();
        match self.pages.get(&path) {
            Some(html) => Ok(RenderResult {
                html: html.clone(),
                final_url: Some(request.url().to_string()),
                duration_ms: self.delay.as_millis() as u64,
                console_errors: Vec::new(),
            }),
            None => Err(RenderError::EngineUnavailable(
                "no browser for this page".to_string(),
            )),
        }
    }

    fn name(&self) -> &'static str {
        "static"
    }
}
