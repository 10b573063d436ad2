// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::helpers::{spawn_site, test_settings};
use geo_crawlrs::domain::services::crawl_service::GeoCrawler;

#[tokio::test]
#[ignore = "requires a local Chrome installation"]
async fn test_crawl_with_headless_chrome() {
    let site = spawn_site().await;
    let mut settings = test_settings();
    settings.render.timeout_secs = 30;
    let crawler = GeoCrawler::new(settings).unwrap();

    let record = crawler.crawl_url(&format!("{}/article", site)).await;

    assert!(record.is_success());
    assert!(record.crawl_info.rendered, "{:?}", record.crawl_info.error);
    assert!(record
        .rendered_html
        .as_deref()
        .unwrap()
        .contains("Walking the Old Town"));
    assert!(record.dom_diff.compared);
}
