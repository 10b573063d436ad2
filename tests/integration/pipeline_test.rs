// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::helpers::{
    spawn_site, test_settings, unreachable_url, StaticRenderer, ARTICLE, CAFE_RENDERED,
};
use geo_crawlrs::domain::models::crawl_record::{ContentSource, PipelineStage};
use geo_crawlrs::domain::models::structured_data::{GeoCoordinates, SourceFormat};
use geo_crawlrs::domain::services::crawl_service::GeoCrawler;
use geo_crawlrs::domain::services::geo_projection::extract_geo_data;
use geo_crawlrs::engines::reqwest_engine::ReqwestFetcher;
use std::sync::Arc;

fn crawler(renderer: StaticRenderer) -> GeoCrawler {
    let settings = test_settings();
    let fetcher = Arc::new(ReqwestFetcher::new(settings.fetch.clone()));
    GeoCrawler::with_engines(settings, fetcher, Arc::new(renderer)).unwrap()
}

#[tokio::test]
async fn test_crawl_rendered_page_end_to_end() {
    let site = spawn_site().await;
    let crawler = crawler(StaticRenderer::default().with_page("/cafe", CAFE_RENDERED));

    let url = format!("{}/cafe", site);
    let record = crawler.crawl_url(&url).await;

    let info = &record.crawl_info;
    assert!(info.success, "crawl failed: {:?}", info.error);
    assert_eq!(info.stage, PipelineStage::Assembled);
    assert!(info.rendered);
    assert_eq!(info.content_source, ContentSource::Rendered);
    assert_eq!(info.final_url.as_deref(), Some(url.as_str()));

    let http = record.http_info.as_ref().unwrap();
    assert_eq!(http.status_code, 200);
    assert!(http.encoding.eq_ignore_ascii_case("utf-8"));
    assert!(http.content_type.as_deref().unwrap().starts_with("text/html"));

    // the rendered DOM adds the application content to the empty shell
    assert!(record.dom_diff.compared);
    assert!(record.dom_diff.added > 0);
    assert!(record
        .dom_diff
        .changes
        .iter()
        .all(|c| c.path.starts_with("/html[0]/body[1]/div[0]")));

    let bundle = &record.structured_data;
    assert_eq!(bundle.json_ld.len(), 1);
    assert_eq!(bundle.parse_errors.len(), 1);
    assert_eq!(bundle.parse_errors[0].block_index, 1);
    assert_eq!(bundle.parse_errors[0].kind, "json_ld_syntax");
    assert_eq!(bundle.microdata.len(), 1);
    assert_eq!(bundle.opengraph.len(), 1);
    assert_eq!(bundle.meta.len(), 1);

    let normalized = &record.structured_data_normalized;
    assert_eq!(normalized.geo, GeoCoordinates::new(59.9096, 10.7262));
    assert_eq!(normalized.sources["geo"], SourceFormat::JsonLd);
    let address = normalized.address.as_ref().unwrap();
    assert_eq!(address.locality.as_deref(), Some("Oslo"));
    assert_eq!(address.country.as_deref(), Some("NO"));
    let place = normalized.place.as_ref().unwrap();
    assert_eq!(place.name.as_deref(), Some("Harbour Cafe"));
    assert_eq!(place.place_type.as_deref(), Some("CafeOrCoffeeShop"));
    assert_eq!(
        normalized.contact.as_ref().unwrap().telephone.as_deref(),
        Some("+47 22 00 00 00")
    );
    let crumbs: Vec<&str> = normalized
        .breadcrumbs
        .iter()
        .map(|b| b.name.as_str())
        .collect();
    assert_eq!(crumbs, vec!["Home", "Cafes"]);
    assert_eq!(normalized.sources["breadcrumbs"], SourceFormat::Microdata);

    let text = record.clean_text.as_deref().unwrap();
    assert!(text.contains("fresh coffee and pastries"));
    assert!(!text.contains("app.js"));

    let menu = format!("{}/menu", site);
    let menu_link = record.links.iter().find(|l| l.url == menu).unwrap();
    assert!(menu_link.internal);
    let directions = record
        .links
        .iter()
        .find(|l| l.url == "https://maps.example.org/harbour-cafe")
        .unwrap();
    assert!(!directions.internal);

    assert_eq!(record.images.len(), 1);
    assert_eq!(record.images[0].src, format!("{}/img/terrace.jpg", site));
    assert_eq!(record.language.as_ref().unwrap().code, "en");

    let stats = record.content_stats.as_ref().unwrap();
    assert_eq!(stats.image_count, 1);
    assert_eq!(stats.link_count, record.links.len());

    let projection = extract_geo_data(&record);
    assert_eq!(projection.coordinates, normalized.geo);
    assert_eq!(projection.meta_title.as_deref(), Some("Harbour Cafe | Oslo"));
    assert_eq!(
        projection.meta_description.as_deref(),
        Some("Coffee and pastries on the Oslo waterfront.")
    );
    assert_eq!(projection.breadcrumbs.len(), 2);
}

#[tokio::test]
async fn test_render_failure_uses_raw_html() {
    let site = spawn_site().await;
    let crawler = crawler(StaticRenderer::default());

    let record = crawler.crawl_url(&format!("{}/article", site)).await;

    assert!(record.is_success());
    assert!(record.rendered_html.is_none());
    assert_eq!(record.raw_html.as_deref(), Some(ARTICLE));
    let error = record.error().unwrap();
    assert_eq!(error.kind, "engine_unavailable");
    assert_eq!(error.stage, PipelineStage::Rendering);
    assert!(!error.fatal);

    assert!(!record.dom_diff.compared);
    assert!(record
        .clean_text
        .as_deref()
        .unwrap()
        .contains("follows the river"));
    assert!(record
        .links
        .iter()
        .any(|l| l.url == format!("{}/walks/next", site)));
    assert_eq!(record.images.len(), 2);
    assert_eq!(record.content_stats.as_ref().unwrap().images_without_alt, 1);
}

#[tokio::test]
async fn test_redirects_are_recorded() {
    let site = spawn_site().await;
    let crawler = crawler(StaticRenderer::default().with_page("/old-cafe", CAFE_RENDERED));

    let record = crawler.crawl_url(&format!("{}/old-cafe", site)).await;

    assert!(record.is_success());
    let final_url = format!("{}/cafe", site);
    assert_eq!(record.crawl_info.final_url.as_deref(), Some(final_url.as_str()));
    let http = record.http_info.as_ref().unwrap();
    assert_eq!(
        http.redirect_chain,
        vec![format!("{}/old-cafe", site), final_url]
    );
}

#[tokio::test]
async fn test_declared_charset_is_decoded() {
    let site = spawn_site().await;
    let crawler = crawler(StaticRenderer::default());

    let record = crawler.crawl_url(&format!("{}/latin1", site)).await;

    assert!(record.is_success());
    assert_eq!(record.http_info.as_ref().unwrap().encoding, "windows-1252");
    assert!(record
        .clean_text
        .as_deref()
        .unwrap()
        .contains("Café du port"));
}

#[tokio::test]
async fn test_http_error_status_is_fatal() {
    let site = spawn_site().await;
    let crawler = crawler(StaticRenderer::default());

    let record = crawler.crawl_url(&format!("{}/gone", site)).await;

    assert!(!record.is_success());
    assert_eq!(record.crawl_info.stage, PipelineStage::Errored);
    let error = record.error().unwrap();
    assert_eq!(error.kind, "http_status");
    assert_eq!(error.stage, PipelineStage::Fetching);
    assert!(error.message.contains("410"));
    assert!(record.http_info.is_none());
}

#[tokio::test]
async fn test_failed_record_keeps_every_key() {
    let crawler = crawler(StaticRenderer::default());
    let record = crawler.crawl_url(&unreachable_url().await).await;

    assert_eq!(record.error().unwrap().kind, "connection_refused");

    let value = serde_json::to_value(&record).unwrap();
    let object = value.as_object().unwrap();
    assert_eq!(object.len(), 13);
    for key in ["geo", "address", "place", "contact"] {
        assert!(value["structured_data_normalized"][key].is_null());
    }
    for key in ["json-ld", "microdata", "rdfa", "opengraph", "meta"] {
        assert_eq!(value["structured_data"][key], serde_json::json!([]));
    }
    assert_eq!(value["dom_diff"]["compared"], false);
    assert_eq!(value["crawl_info"]["success"], false);

    let projection = extract_geo_data(&record);
    assert!(projection.coordinates.is_none());
    assert!(projection.meta_title.is_none());
}
