// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::config::settings::NormalizerSettings;
use crate::domain::models::structured_data::{
    Breadcrumb, ContactInfo, GeoCoordinates, NormalizedGeoRecord, PlaceInfo, PostalAddress,
    SourceFormat, StructuredDataBundle, StructuredItem,
};
use serde_json::Value;
use tracing::debug;

/// 视为地点 / 商户的 schema.org 类型（小写短名）
const PLACE_TYPES: &[&str] = &[
    "place",
    "localbusiness",
    "restaurant",
    "foodestablishment",
    "cafeorcoffeeshop",
    "bakery",
    "barorpub",
    "hotel",
    "lodgingbusiness",
    "store",
    "museum",
    "touristattraction",
    "park",
    "landmarksorhistoricalbuildings",
    "civicstructure",
    "administrativearea",
    "city",
    "country",
    "state",
    "airport",
    "hospital",
    "school",
    "library",
    "zoo",
    "stadiumorarena",
    "medicalbusiness",
    "professionalservice",
];

/// 携带地址或坐标也不视为地点的类型
const NON_PLACE_TYPES: &[&str] = &[
    "postaladdress",
    "geocoordinates",
    "geoshape",
    "breadcrumblist",
    "listitem",
    "website",
    "webpage",
    "contactpoint",
    "imageobject",
    "searchaction",
    "offer",
    "review",
    "aggregaterating",
    "openinghoursspecification",
    "person",
];

/// 以地点为主题的 og:type 关键字
const OPENGRAPH_PLACE_HINTS: &[&str] = &["place", "business", "restaurant", "hotel"];

/// 结构化数据归一化服务
///
/// 把各格式的原始数据按优先级合并为一条 `NormalizedGeoRecord`。
/// 每个字段单独解析：优先级最高且能给出有效值的格式胜出，
/// 无效值（例如格式错误的坐标）会被丢弃并让位于下一个格式。
pub struct NormalizationService {
    precedence: Vec<SourceFormat>,
}

impl NormalizationService {
    pub fn new(settings: &NormalizerSettings) -> Self {
        let mut precedence: Vec<SourceFormat> = Vec::with_capacity(SourceFormat::ALL.len());
        for format in &settings.precedence {
            if !precedence.contains(format) {
                precedence.push(*format);
            }
        }
        if precedence.is_empty() {
            precedence = SourceFormat::ALL.to_vec();
        }
        Self { precedence }
    }

    pub fn precedence(&self) -> &[SourceFormat] {
        &self.precedence
    }

    /// 归一化结构化数据
    ///
    /// # 参数
    ///
    /// * `bundle` - 提取阶段得到的原始数据包
    ///
    /// # 返回值
    ///
    /// 归一化记录；纯函数，不会失败
    pub fn normalize(&self, bundle: &StructuredDataBundle) -> NormalizedGeoRecord {
        let views: Vec<(SourceFormat, SourceView)> = self
            .precedence
            .iter()
            .map(|format| (*format, SourceView::build(*format, bundle.items(*format))))
            .collect();

        let mut record = NormalizedGeoRecord::default();

        if let Some((format, geo)) = resolve(&views, SourceView::coordinates) {
            record.geo = Some(geo);
            record.sources.insert("geo".to_string(), format);
        }
        if let Some((format, address)) = resolve(&views, SourceView::address) {
            record.address = Some(address);
            record.sources.insert("address".to_string(), format);
        }
        if let Some((format, place)) = resolve(&views, SourceView::place) {
            record.place = Some(place);
            record.sources.insert("place".to_string(), format);
        }
        if let Some((format, contact)) = resolve(&views, SourceView::contact) {
            record.contact = Some(contact);
            record.sources.insert("contact".to_string(), format);
        }
        if let Some((format, breadcrumbs)) = resolve(&views, SourceView::breadcrumbs) {
            record.breadcrumbs = breadcrumbs;
            record.sources.insert("breadcrumbs".to_string(), format);
        }

        debug!("Normalized structured data, sources: {:?}", record.sources);
        record
    }
}

/// 按优先级取第一个给出值的格式
fn resolve<'a, T>(
    views: &[(SourceFormat, SourceView<'a>)],
    pick: impl Fn(&SourceView<'a>) -> Option<T>,
) -> Option<(SourceFormat, T)> {
    views
        .iter()
        .find_map(|(format, view)| pick(view).map(|value| (*format, value)))
}

/// 各来源格式的读取视图
enum SourceView<'a> {
    /// JSON-LD、microdata、RDFa：展开后的 schema.org 实体
    SchemaOrg(Vec<&'a StructuredItem>),
    OpenGraph(Option<&'a StructuredItem>),
    Meta(Option<&'a StructuredItem>),
}

impl<'a> SourceView<'a> {
    fn build(format: SourceFormat, items: &'a [StructuredItem]) -> Self {
        match format {
            SourceFormat::JsonLd | SourceFormat::Microdata | SourceFormat::Rdfa => {
                let mut entities = Vec::new();
                for item in items {
                    flatten_entity(item, &mut entities);
                }
                SourceView::SchemaOrg(entities)
            }
            SourceFormat::OpenGraph => SourceView::OpenGraph(items.first()),
            SourceFormat::Meta => SourceView::Meta(items.first()),
        }
    }

    fn coordinates(&self) -> Option<GeoCoordinates> {
        match self {
            SourceView::SchemaOrg(entities) => schema_coordinates(entities),
            SourceView::OpenGraph(Some(og)) => [
                ("place:location:latitude", "place:location:longitude"),
                ("og:latitude", "og:longitude"),
            ]
            .iter()
            .find_map(|(lat, lon)| coordinate_pair(og.get(*lat), og.get(*lon))),
            SourceView::Meta(Some(meta)) => ["geo.position", "icbm"]
                .iter()
                .find_map(|key| text(meta.get(*key)).and_then(|v| parse_coordinate_string(&v))),
            _ => None,
        }
    }

    fn address(&self) -> Option<PostalAddress> {
        let address = match self {
            SourceView::SchemaOrg(entities) => schema_address(entities)?,
            SourceView::OpenGraph(Some(og)) => {
                let field = |keys: [&str; 2]| keys.iter().find_map(|key| text(og.get(*key)));
                PostalAddress {
                    street_address: field(["og:street-address", "business:contact_data:street_address"]),
                    locality: field(["og:locality", "business:contact_data:locality"]),
                    region: field(["og:region", "business:contact_data:region"]),
                    postal_code: field(["og:postal-code", "business:contact_data:postal_code"]),
                    country: field(["og:country-name", "business:contact_data:country_name"]),
                    formatted: None,
                }
            }
            SourceView::Meta(Some(meta)) => {
                let region = text(meta.get("geo.region"));
                let country = region.as_deref().and_then(|r| {
                    let code = r.split('-').next()?.trim();
                    (code.len() == 2 && code.chars().all(|c| c.is_ascii_alphabetic()))
                        .then(|| code.to_ascii_uppercase())
                });
                PostalAddress {
                    locality: text(meta.get("geo.placename")),
                    region,
                    country,
                    ..PostalAddress::default()
                }
            }
            _ => return None,
        };
        (!address.is_empty()).then_some(address)
    }

    fn place(&self) -> Option<PlaceInfo> {
        let place = match self {
            SourceView::SchemaOrg(entities) => {
                let entity = primary_entity(entities)?;
                PlaceInfo {
                    name: text(entity.get("name")),
                    place_type: type_names(entity).into_iter().next(),
                    id: text(entity.get("@id")),
                    url: text(entity.get("url")),
                    same_as: texts(entity.get("sameAs")),
                }
            }
            SourceView::OpenGraph(Some(og)) => {
                let og_type = text(og.get("og:type"));
                let is_place = og_type
                    .as_deref()
                    .map(|t| {
                        let t = t.to_ascii_lowercase();
                        OPENGRAPH_PLACE_HINTS.iter().any(|hint| t.contains(hint))
                    })
                    .unwrap_or(false);
                if !is_place && self.coordinates().is_none() && self.address().is_none() {
                    return None;
                }
                PlaceInfo {
                    name: text(og.get("og:title")).or_else(|| text(og.get("og:site_name"))),
                    place_type: og_type,
                    id: None,
                    url: text(og.get("og:url")),
                    same_as: Vec::new(),
                }
            }
            _ => return None,
        };
        (!place.is_empty()).then_some(place)
    }

    fn contact(&self) -> Option<ContactInfo> {
        let contact = match self {
            SourceView::SchemaOrg(entities) => schema_contact(entities)?,
            SourceView::OpenGraph(Some(og)) => {
                let field = |keys: [&str; 2]| keys.iter().find_map(|key| text(og.get(*key)));
                ContactInfo {
                    telephone: field(["og:phone_number", "business:contact_data:phone_number"])
                        .and_then(|v| clean_telephone(&v)),
                    email: field(["og:email", "business:contact_data:email"])
                        .and_then(|v| clean_email(&v)),
                    url: text(og.get("business:contact_data:website")),
                }
            }
            _ => return None,
        };
        (!contact.is_empty()).then_some(contact)
    }

    fn breadcrumbs(&self) -> Option<Vec<Breadcrumb>> {
        match self {
            SourceView::SchemaOrg(entities) => entities
                .iter()
                .filter(|entity| has_type(entity, "breadcrumblist"))
                .map(|entity| breadcrumb_list(entity))
                .find(|crumbs| !crumbs.is_empty()),
            _ => None,
        }
    }
}

fn flatten_entity<'a>(item: &'a StructuredItem, out: &mut Vec<&'a StructuredItem>) {
    out.push(item);
    for value in item.values() {
        flatten_value(value, out);
    }
}

fn flatten_value<'a>(value: &'a Value, out: &mut Vec<&'a StructuredItem>) {
    match value {
        Value::Object(map) => flatten_entity(map, out),
        Value::Array(values) => values.iter().for_each(|v| flatten_value(v, out)),
        _ => {}
    }
}

/// 主体实体：第一个地点类型的实体，否则第一个带地址 / 坐标 / 电话的非排除类型实体
fn primary_entity<'a>(entities: &[&'a StructuredItem]) -> Option<&'a StructuredItem> {
    entities
        .iter()
        .find(|entity| {
            type_names(entity)
                .iter()
                .any(|t| PLACE_TYPES.contains(&t.to_ascii_lowercase().as_str()) || is_business_type(t))
        })
        .or_else(|| {
            entities.iter().find(|entity| {
                let excluded = type_names(entity)
                    .iter()
                    .any(|t| NON_PLACE_TYPES.contains(&t.to_ascii_lowercase().as_str()));
                !excluded && ["address", "geo", "telephone"].iter().any(|k| entity.contains_key(*k))
            })
        })
        .copied()
}

fn is_business_type(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    lower.ends_with("business") || lower.ends_with("store") || lower.ends_with("restaurant")
}

fn schema_coordinates(entities: &[&StructuredItem]) -> Option<GeoCoordinates> {
    if let Some(entity) = primary_entity(entities) {
        let from_primary = match entity.get("geo") {
            Some(Value::Object(geo)) => coordinate_pair(geo.get("latitude"), geo.get("longitude")),
            Some(other) => text(Some(other)).and_then(|v| parse_coordinate_string(&v)),
            None => coordinate_pair(entity.get("latitude"), entity.get("longitude")),
        };
        if from_primary.is_some() {
            return from_primary;
        }
    }
    entities
        .iter()
        .find_map(|entity| coordinate_pair(entity.get("latitude"), entity.get("longitude")))
}

fn schema_address(entities: &[&StructuredItem]) -> Option<PostalAddress> {
    let from_primary = primary_entity(entities).and_then(|entity| match entity.get("address")? {
        Value::Object(address) => Some(postal_address(address)),
        Value::Array(values) => values.iter().find_map(|v| match v {
            Value::Object(address) => Some(postal_address(address)),
            _ => None,
        }),
        other => text(Some(other)).map(|formatted| PostalAddress {
            formatted: Some(formatted),
            ..PostalAddress::default()
        }),
    });
    from_primary
        .filter(|address| !address.is_empty())
        .or_else(|| {
            entities
                .iter()
                .filter(|entity| has_type(entity, "postaladdress"))
                .map(|entity| postal_address(entity))
                .find(|address| !address.is_empty())
        })
}

fn postal_address(address: &StructuredItem) -> PostalAddress {
    PostalAddress {
        street_address: text(address.get("streetAddress")),
        locality: text(address.get("addressLocality")),
        region: text(address.get("addressRegion")),
        postal_code: text(address.get("postalCode")),
        country: text(address.get("addressCountry")),
        formatted: None,
    }
}

fn schema_contact(entities: &[&StructuredItem]) -> Option<ContactInfo> {
    let contact_of = |entity: &StructuredItem| ContactInfo {
        telephone: text(entity.get("telephone")).and_then(|v| clean_telephone(&v)),
        email: text(entity.get("email")).and_then(|v| clean_email(&v)),
        url: text(entity.get("url")),
    };

    if let Some(entity) = primary_entity(entities) {
        let mut contact = contact_of(entity);
        if contact.telephone.is_none() && contact.email.is_none() {
            // contactPoint 只补充缺失的电话和邮箱
            let points = entities
                .iter()
                .filter(|e| has_type(e, "contactpoint"))
                .map(|e| contact_of(e));
            for point in points {
                contact.telephone = contact.telephone.or(point.telephone);
                contact.email = contact.email.or(point.email);
            }
        }
        if !contact.is_empty() {
            return Some(contact);
        }
    }

    entities
        .iter()
        .filter(|e| has_type(e, "contactpoint"))
        .map(|e| contact_of(e))
        .find(|contact| !contact.is_empty())
}

fn breadcrumb_list(list: &StructuredItem) -> Vec<Breadcrumb> {
    let elements: Vec<&StructuredItem> = match list.get("itemListElement") {
        Some(Value::Array(values)) => values
            .iter()
            .filter_map(|v| match v {
                Value::Object(map) => Some(map),
                _ => None,
            })
            .collect(),
        Some(Value::Object(map)) => vec![map],
        _ => Vec::new(),
    };

    let mut positioned: Vec<(u64, Breadcrumb)> = elements
        .into_iter()
        .filter_map(|element| {
            let position = element.get("position").and_then(|p| match p {
                Value::Number(n) => n.as_u64(),
                Value::String(s) => s.trim().parse().ok(),
                _ => None,
            });
            let target = element.get("item");
            let name = text(element.get("name")).or_else(|| match target {
                Some(Value::Object(item)) => text(item.get("name")),
                _ => None,
            })?;
            let url = match target {
                Some(Value::String(url)) => non_empty(url),
                Some(Value::Object(item)) => {
                    text(item.get("@id")).or_else(|| text(item.get("url")))
                }
                _ => None,
            }
            .or_else(|| text(element.get("url")));
            Some((position.unwrap_or(u64::MAX), Breadcrumb { name, url }))
        })
        .collect();

    positioned.sort_by_key(|(position, _)| *position);
    positioned.into_iter().map(|(_, crumb)| crumb).collect()
}

fn type_names(entity: &StructuredItem) -> Vec<String> {
    texts(entity.get("@type"))
        .iter()
        .map(|t| {
            let tail = t.rsplit(|c: char| c == '/' || c == '#').next().unwrap_or(t);
            tail.rsplit(':').next().unwrap_or(tail).to_string()
        })
        .collect()
}

fn has_type(entity: &StructuredItem, lower_name: &str) -> bool {
    type_names(entity)
        .iter()
        .any(|t| t.eq_ignore_ascii_case(lower_name))
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// 取第一个可用的文本值
fn text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => non_empty(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Array(values) => values.iter().find_map(|v| text(Some(v))),
        Value::Object(map) => text(map.get("name"))
            .or_else(|| text(map.get("@value")))
            .or_else(|| text(map.get("@id"))),
        _ => None,
    }
}

fn texts(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(values)) => values.iter().filter_map(|v| text(Some(v))).collect(),
        Some(other) => text(Some(other)).into_iter().collect(),
        None => Vec::new(),
    }
}

fn coordinate_pair(latitude: Option<&Value>, longitude: Option<&Value>) -> Option<GeoCoordinates> {
    GeoCoordinates::new(parse_coordinate(latitude?)?, parse_coordinate(longitude?)?)
}

/// 单个坐标值：数字或数字字符串，允许一个小数逗号
fn parse_coordinate(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_coordinate_str(s),
        Value::Array(values) => values.first().and_then(parse_coordinate),
        _ => None,
    }
}

fn parse_coordinate_str(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    let normalized = if !trimmed.contains('.') && trimmed.matches(',').count() == 1 {
        trimmed.replace(',', ".")
    } else {
        trimmed.to_string()
    };
    normalized.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// `"lat;lon"`、`"lat, lon"` 或 `"lat lon"`
fn parse_coordinate_string(raw: &str) -> Option<GeoCoordinates> {
    let parts: Vec<&str> = if raw.contains(';') {
        raw.split(';').collect()
    } else if raw.contains(',') {
        raw.split(',').collect()
    } else {
        raw.split_whitespace().collect()
    };
    if parts.len() != 2 {
        return None;
    }
    let latitude = parts[0].trim().parse::<f64>().ok()?;
    let longitude = parts[1].trim().parse::<f64>().ok()?;
    GeoCoordinates::new(latitude, longitude)
}

fn clean_telephone(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let value = match trimmed.get(..4) {
        Some(prefix) if prefix.eq_ignore_ascii_case("tel:") => &trimmed[4..],
        _ => trimmed,
    };
    non_empty(value)
}

fn clean_email(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let value = match trimmed.get(..7) {
        Some(prefix) if prefix.eq_ignore_ascii_case("mailto:") => &trimmed[7..],
        _ => trimmed,
    };
    let value = value.split('?').next().unwrap_or(value);
    non_empty(value).filter(|email| email.contains('@'))
}

#[cfg(test)]
#[path = "normalization_service_test.rs"]
mod tests;
