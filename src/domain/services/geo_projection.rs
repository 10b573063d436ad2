// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::content::LanguageInfo;
use crate::domain::models::crawl_record::CrawlRecord;
use crate::domain::models::structured_data::{
    Breadcrumb, ContactInfo, GeoCoordinates, PlaceInfo, PostalAddress,
};
use serde::{Deserialize, Serialize};

/// 爬取记录的 GEO 摘要视图
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoProjection {
    pub coordinates: Option<GeoCoordinates>,
    pub address: Option<PostalAddress>,
    pub place: Option<PlaceInfo>,
    pub contact: Option<ContactInfo>,
    pub breadcrumbs: Vec<Breadcrumb>,
    pub language: Option<LanguageInfo>,
    pub meta_title: Option<String>,
    pub meta_description: Option<String>,
}

/// 从爬取记录中取出 GEO 相关字段
///
/// 对任何记录（包括失败的部分记录）都返回结果，不修改输入。
pub fn extract_geo_data(record: &CrawlRecord) -> GeoProjection {
    let normalized = &record.structured_data_normalized;
    let meta = record.meta.as_ref();

    GeoProjection {
        coordinates: normalized.geo,
        address: normalized.address.clone(),
        place: normalized.place.clone(),
        contact: normalized.contact.clone(),
        breadcrumbs: normalized.breadcrumbs.clone(),
        language: record.language.clone(),
        meta_title: meta.and_then(|m| m.title.clone()),
        meta_description: meta.and_then(|m| m.description.clone()),
    }
}
