// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// 单个提取出的结构化对象（任意键值映射）
pub type StructuredItem = Map<String, Value>;

/// 结构化数据来源格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SourceFormat {
    #[serde(rename = "json-ld")]
    JsonLd,
    #[serde(rename = "microdata")]
    Microdata,
    #[serde(rename = "rdfa")]
    Rdfa,
    #[serde(rename = "opengraph")]
    OpenGraph,
    #[serde(rename = "meta")]
    Meta,
}

impl SourceFormat {
    /// 默认优先级顺序
    pub const ALL: [SourceFormat; 5] = [
        SourceFormat::JsonLd,
        SourceFormat::Microdata,
        SourceFormat::Rdfa,
        SourceFormat::OpenGraph,
        SourceFormat::Meta,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceFormat::JsonLd => "json-ld",
            SourceFormat::Microdata => "microdata",
            SourceFormat::Rdfa => "rdfa",
            SourceFormat::OpenGraph => "opengraph",
            SourceFormat::Meta => "meta",
        }
    }
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json-ld" | "jsonld" | "json_ld" => Ok(SourceFormat::JsonLd),
            "microdata" => Ok(SourceFormat::Microdata),
            "rdfa" => Ok(SourceFormat::Rdfa),
            "opengraph" | "og" => Ok(SourceFormat::OpenGraph),
            "meta" => Ok(SourceFormat::Meta),
            other => Err(format!("unknown structured data format: {}", other)),
        }
    }
}

/// 单个结构化数据块的解析失败记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredDataError {
    pub format: SourceFormat,
    /// 该格式下数据块在文档中的序号（从 0 开始）
    pub block_index: usize,
    pub kind: String,
    pub message: String,
}

/// 按来源格式分组的原始结构化数据
///
/// 五个格式键总是存在，没有数据时为空列表。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StructuredDataBundle {
    #[serde(rename = "json-ld")]
    pub json_ld: Vec<StructuredItem>,
    pub microdata: Vec<StructuredItem>,
    pub rdfa: Vec<StructuredItem>,
    pub opengraph: Vec<StructuredItem>,
    pub meta: Vec<StructuredItem>,
    pub parse_errors: Vec<StructuredDataError>,
}

impl StructuredDataBundle {
    pub fn items(&self, format: SourceFormat) -> &[StructuredItem] {
        match format {
            SourceFormat::JsonLd => &self.json_ld,
            SourceFormat::Microdata => &self.microdata,
            SourceFormat::Rdfa => &self.rdfa,
            SourceFormat::OpenGraph => &self.opengraph,
            SourceFormat::Meta => &self.meta,
        }
    }

    pub fn items_mut(&mut self, format: SourceFormat) -> &mut Vec<StructuredItem> {
        match format {
            SourceFormat::JsonLd => &mut self.json_ld,
            SourceFormat::Microdata => &mut self.microdata,
            SourceFormat::Rdfa => &mut self.rdfa,
            SourceFormat::OpenGraph => &mut self.opengraph,
            SourceFormat::Meta => &mut self.meta,
        }
    }

    pub fn total_items(&self) -> usize {
        SourceFormat::ALL
            .iter()
            .map(|format| self.items(*format).len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total_items() == 0
    }
}

/// 经纬度坐标
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoCoordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoCoordinates {
    /// 校验范围后创建坐标，非法值返回 None
    pub fn new(latitude: f64, longitude: f64) -> Option<Self> {
        let valid = latitude.is_finite()
            && longitude.is_finite()
            && (-90.0..=90.0).contains(&latitude)
            && (-180.0..=180.0).contains(&longitude);
        valid.then_some(Self {
            latitude,
            longitude,
        })
    }
}

/// 邮政地址
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostalAddress {
    pub street_address: Option<String>,
    pub locality: Option<String>,
    pub region: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
    /// 仅以自由文本给出的完整地址
    pub formatted: Option<String>,
}

impl PostalAddress {
    pub fn is_empty(&self) -> bool {
        self.street_address.is_none()
            && self.locality.is_none()
            && self.region.is_none()
            && self.postal_code.is_none()
            && self.country.is_none()
            && self.formatted.is_none()
    }
}

/// 地点 / 商户身份
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceInfo {
    pub name: Option<String>,
    pub place_type: Option<String>,
    pub id: Option<String>,
    pub url: Option<String>,
    pub same_as: Vec<String>,
}

impl PlaceInfo {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.place_type.is_none()
            && self.id.is_none()
            && self.url.is_none()
            && self.same_as.is_empty()
    }
}

/// 联系方式
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactInfo {
    pub telephone: Option<String>,
    pub email: Option<String>,
    pub url: Option<String>,
}

impl ContactInfo {
    pub fn is_empty(&self) -> bool {
        self.telephone.is_none() && self.email.is_none() && self.url.is_none()
    }
}

/// 面包屑条目
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Breadcrumb {
    pub name: String,
    pub url: Option<String>,
}

/// 归一化后的 GEO 记录
///
/// 各字段独立解析，缺失时为 `null`（面包屑为空列表），键永不省略。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizedGeoRecord {
    pub geo: Option<GeoCoordinates>,
    pub address: Option<PostalAddress>,
    pub place: Option<PlaceInfo>,
    pub contact: Option<ContactInfo>,
    pub breadcrumbs: Vec<Breadcrumb>,
    /// 字段名 → 提供该字段的来源格式
    pub sources: BTreeMap<String, SourceFormat>,
}
