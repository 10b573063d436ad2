// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

//! 性能基准测试套件
//!
//! 覆盖流水线中 CPU 密集的阶段：DOM 差异、结构化数据提取、归一化和内容分析。

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use geo_crawlrs::config::settings::{AnalyzerSettings, DiffSettings, NormalizerSettings};
use geo_crawlrs::domain::services::content_analysis_service::ContentAnalysisService;
use geo_crawlrs::domain::services::dom_diff_service::DomDiffService;
use geo_crawlrs::domain::services::extraction_service::ExtractionService;
use geo_crawlrs::domain::services::normalization_service::NormalizationService;
use std::hint::black_box;
use url::Url;

/// 生成一个带结构化数据和 `size` 个列表项的页面
fn listing_page(size: usize, rendered: bool) -> String {
    let items: String = (0..size)
        .map(|i| {
            let extra = if rendered && i % 3 == 0 {
                r#"<span class="badge">Open now</span>"#.to_string()
            } else {
                String::new()
            };
            format!(
                r#"<li class="venue" data-id="{i}"><a href="/venues/{i}">Venue {i}</a>
                <p>Venue {i} serves coffee near the harbour.</p>{extra}</li>"#
            )
        })
        .collect();

    format!(
        r#"<html lang="en"><head><title>Venues</title>
        <meta property="og:title" content="Venues">
        <meta name="geo.position" content="59.91;10.75">
        <script type="application/ld+json">
        {{"@context": "https://schema.org", "@type": "LocalBusiness", "name": "Venues",
          "address": {{"streetAddress": "Aker Brygge 1", "addressLocality": "Oslo"}},
          "geo": {{"latitude": 59.91, "longitude": 10.75}}}}
        </script></head>
        <body><main><ul>{items}</ul></main></body></html>"#
    )
}

/// 基准测试：原始 HTML 与渲染后 DOM 的差异计算
fn benchmark_dom_diff(c: &mut Criterion) {
    let service = DomDiffService::new(&DiffSettings::default());
    let mut group = c.benchmark_group("dom_diff");

    for size in [10, 100, 500].iter() {
        let raw = listing_page(*size, false);
        let rendered = listing_page(*size, true);

        group.bench_with_input(BenchmarkId::new("identical", size), size, |b, _| {
            b.iter(|| black_box(service.diff(&raw, &raw)))
        });
        group.bench_with_input(BenchmarkId::new("rendered", size), size, |b, _| {
            b.iter(|| black_box(service.diff(&raw, &rendered)))
        });
    }

    group.finish();
}

fn benchmark_extraction(c: &mut Criterion) {
    let normalizer = NormalizationService::new(&NormalizerSettings::default());
    let mut group = c.benchmark_group("structured_data");

    for size in [10, 100, 500].iter() {
        let page = listing_page(*size, true);
        group.bench_with_input(BenchmarkId::new("extract", size), size, |b, _| {
            b.iter(|| black_box(ExtractionService::extract(&page)))
        });

        let bundle = ExtractionService::extract(&page);
        group.bench_with_input(BenchmarkId::new("normalize", size), size, |b, _| {
            b.iter(|| black_box(normalizer.normalize(&bundle)))
        });
    }

    group.finish();
}

fn benchmark_content_analysis(c: &mut Criterion) {
    let service = ContentAnalysisService::new(&AnalyzerSettings::default());
    let base = Url::parse("https://venues.example/list").expect("valid base URL");
    let mut group = c.benchmark_group("content_analysis");

    for size in [10, 100, 500].iter() {
        let page = listing_page(*size, true);
        group.bench_with_input(BenchmarkId::new("analyze", size), size, |b, _| {
            b.iter(|| black_box(service.analyze(&page, &base)))
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    benchmark_dom_diff,
    benchmark_extraction,
    benchmark_content_analysis
);
criterion_main!(benches);
