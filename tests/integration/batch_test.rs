// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::helpers::{
    spawn_site, test_settings, unreachable_url, StaticRenderer, ARTICLE, CAFE_RENDERED,
};
use geo_crawlrs::domain::models::crawl_record::CrawlOutcome;
use geo_crawlrs::domain::services::crawl_service::GeoCrawler;
use geo_crawlrs::engines::reqwest_engine::ReqwestFetcher;
use geo_crawlrs::utils::errors::CrawlError;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn test_batch_isolates_unreachable_url() {
    let site = spawn_site().await;
    let settings = test_settings();
    let fetcher = Arc::new(ReqwestFetcher::new(settings.fetch.clone()));
    let renderer = Arc::new(StaticRenderer::default().with_page("/cafe", CAFE_RENDERED));
    let crawler = GeoCrawler::with_engines(settings, fetcher, renderer).unwrap();

    let urls = vec![
        format!("{}/article", site),
        unreachable_url().await,
        format!("{}/cafe", site),
    ];
    let outcomes = crawler.crawl_multiple_urls(&urls).await.unwrap();

    assert_eq!(outcomes.len(), 3);
    for (outcome, url) in outcomes.iter().zip(&urls) {
        assert_eq!(outcome.url(), url);
    }
    assert!(outcomes[0].is_completed());
    assert!(outcomes[2].is_completed());
    match &outcomes[1] {
        CrawlOutcome::Failed { error, partial, .. } => {
            assert_eq!(error.kind, "connection_refused");
            assert!(error.fatal);
            assert!(partial.raw_html.is_none());
        }
        other => panic!("expected a failure marker, got {:?}", other),
    }

    let first = outcomes[0].record().unwrap();
    assert_eq!(first.raw_html.as_deref(), Some(ARTICLE));
    let last = outcomes[2].record().unwrap();
    assert!(last.crawl_info.rendered);
}

#[tokio::test]
async fn test_render_sessions_stay_within_limit() {
    let site = spawn_site().await;
    let mut settings = test_settings();
    settings.orchestrator.max_concurrency = 6;
    settings.render.max_sessions = 2;
    let fetcher = Arc::new(ReqwestFetcher::new(settings.fetch.clone()));
    let renderer = Arc::new(
        StaticRenderer::default()
            .with_page("/cafe", CAFE_RENDERED)
            .with_delay(Duration::from_millis(50)),
    );
    let crawler = GeoCrawler::with_engines(settings, fetcher, renderer.clone()).unwrap();

    let urls: Vec<String> = (0..6).map(|i| format!("{}/cafe?v={}", site, i)).collect();
    let outcomes = crawler.crawl_multiple_urls(&urls).await.unwrap();

    assert!(outcomes.iter().all(|o| o.is_completed()));
    assert_eq!(renderer.calls.load(Ordering::SeqCst), 6);
    assert!(renderer.max_in_flight.load(Ordering::SeqCst) <= 2);

    let pool = crawler.render_pool().unwrap();
    assert!(pool.peak() <= 2);
    assert_eq!(pool.active(), 0);
    assert_eq!(pool.available(), 2);
}

#[tokio::test]
async fn test_cancelled_batch_releases_everything() {
    let site = spawn_site().await;
    let settings = test_settings();
    let fetcher = Arc::new(ReqwestFetcher::new(settings.fetch.clone()));
    let crawler =
        GeoCrawler::with_engines(settings, fetcher, Arc::new(StaticRenderer::default())).unwrap();

    let urls = vec![format!("{}/slow", site), format!("{}/article", site)];
    let token = CancellationToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(500)).await;
        canceller.cancel();
    });

    let started = Instant::now();
    let outcomes = crawler
        .crawl_multiple_urls_with_cancel(&urls, &token)
        .await
        .unwrap();

    assert!(started.elapsed() < Duration::from_secs(4));
    assert!(matches!(&outcomes[0], CrawlOutcome::Cancelled { url } if url == &urls[0]));
    assert!(outcomes[1].is_completed());
    assert_eq!(crawler.render_pool().unwrap().active(), 0);
}

#[tokio::test]
async fn test_empty_batch_is_misuse() {
    let crawler = GeoCrawler::new(test_settings()).unwrap();
    let urls: [&str; 0] = [];
    let err = crawler.crawl_multiple_urls(&urls).await.unwrap_err();
    assert!(matches!(err, CrawlError::EmptyBatch));
}
