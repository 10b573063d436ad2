// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::*;
use serde_json::json;

#[test]
fn test_empty_document_yields_empty_bundle() {
    let bundle = ExtractionService::extract("<html><body><p>nothing here</p></body></html>");

    assert!(bundle.is_empty());
    assert!(bundle.parse_errors.is_empty());

    let value = serde_json::to_value(&bundle).unwrap();
    for key in ["json-ld", "microdata", "rdfa", "opengraph", "meta"] {
        assert_eq!(value[key], json!([]), "missing key {}", key);
    }
}

#[test]
fn test_json_ld_blocks_are_parsed_independently() {
    let html = r#"
        <html><head>
            <script type="application/ld+json">{"@type": "Restaurant", "name": "Chez Paul"}</script>
            <script type="application/ld+json">{"@type": "Broken", </script>
            <script type=" Application/LD+JSON ">[{"@type": "BreadcrumbList"}, {"@type": "WebSite"}]</script>
            <script type="application/ld+json">   </script>
            <script type="text/javascript">var notJson = {;</script>
        </head><body></body></html>
    "#;

    let bundle = ExtractionService::extract(html);

    assert_eq!(bundle.json_ld.len(), 3);
    assert_eq!(bundle.json_ld[0]["name"], json!("Chez Paul"));
    assert_eq!(bundle.json_ld[1]["@type"], json!("BreadcrumbList"));
    assert_eq!(bundle.json_ld[2]["@type"], json!("WebSite"));

    assert_eq!(bundle.parse_errors.len(), 2);
    assert_eq!(bundle.parse_errors[0].format, SourceFormat::JsonLd);
    assert_eq!(bundle.parse_errors[0].block_index, 1);
    assert_eq!(bundle.parse_errors[0].kind, "json_ld_syntax");
    assert_eq!(bundle.parse_errors[1].block_index, 3);
    assert_eq!(bundle.parse_errors[1].kind, "json_ld_empty");
}

#[test]
fn test_json_ld_wrappers_and_control_characters() {
    let html = "<script type=\"application/ld+json\">//<![CDATA[\n\
                {\"@type\": \"Place\", \"description\": \"line one\nline two\"}\n\
                //]]></script>";

    let bundle = ExtractionService::extract(html);
    assert!(bundle.parse_errors.is_empty(), "{:?}", bundle.parse_errors);
    assert_eq!(bundle.json_ld.len(), 1);
    assert_eq!(bundle.json_ld[0]["@type"], json!("Place"));
}

#[test]
fn test_json_ld_scalar_is_unexpected_shape() {
    let bundle = ExtractionService::extract(
        r#"<script type="application/ld+json">"just a string"</script>"#,
    );
    assert!(bundle.json_ld.is_empty());
    assert_eq!(bundle.parse_errors[0].kind, "json_ld_shape");
}

#[test]
fn test_json_ld_graph_is_preserved() {
    let html = r#"<script type="application/ld+json">
        {"@context": "https://schema.org", "@graph": [{"@type": "Organization"}, {"@type": "Hotel"}]}
    </script>"#;

    let bundle = ExtractionService::extract(html);
    assert_eq!(bundle.json_ld.len(), 1);
    assert_eq!(bundle.json_ld[0]["@graph"].as_array().unwrap().len(), 2);
}

#[test]
fn test_microdata_nested_items_and_value_rules() {
    let html = r##"
        <div itemscope itemtype="https://schema.org/LocalBusiness" itemid="#biz">
            <h1 itemprop="name">  Blue   Door Bakery </h1>
            <a itemprop="url" href="https://bluedoor.example">site</a>
            <span itemprop="telephone">+1 555 0100</span>
            <span itemprop="telephone">+1 555 0101</span>
            <time itemprop="foundingDate" datetime="1998-04-01">April 1998</time>
            <div itemprop="address" itemscope itemtype="https://schema.org/PostalAddress">
                <span itemprop="streetAddress">12 Main St</span>
                <meta itemprop="addressCountry" content="US">
            </div>
            <div itemprop="geo" itemscope itemtype="https://schema.org/GeoCoordinates">
                <meta itemprop="latitude" content="40.75">
                <meta itemprop="longitude" content="-73.99">
            </div>
        </div>
    "##;

    let bundle = ExtractionService::extract(html);
    assert_eq!(bundle.microdata.len(), 1);

    let item = &bundle.microdata[0];
    assert_eq!(item["@type"], json!("LocalBusiness"));
    assert_eq!(item["@id"], json!("#biz"));
    assert_eq!(item["name"], json!("Blue Door Bakery"));
    assert_eq!(item["url"], json!("https://bluedoor.example"));
    assert_eq!(item["telephone"], json!(["+1 555 0100", "+1 555 0101"]));
    assert_eq!(item["foundingDate"], json!("1998-04-01"));
    assert_eq!(item["address"]["@type"], json!("PostalAddress"));
    assert_eq!(item["address"]["streetAddress"], json!("12 Main St"));
    assert_eq!(item["address"]["addressCountry"], json!("US"));
    assert_eq!(item["geo"]["latitude"], json!("40.75"));
    // 嵌套条目的属性不会泄漏到外层
    assert!(item.get("streetAddress").is_none());
}

#[test]
fn test_microdata_property_item_without_enclosing_scope() {
    let html = r#"
        <article>
            <div itemprop="author" itemscope itemtype="https://schema.org/Person">
                <span itemprop="name">Ada Lovelace</span>
            </div>
        </article>
    "#;

    let bundle = ExtractionService::extract(html);
    assert_eq!(bundle.microdata.len(), 1);
    assert_eq!(bundle.microdata[0]["@type"], json!("Person"));
    assert_eq!(bundle.microdata[0]["name"], json!("Ada Lovelace"));
}

#[test]
fn test_deeply_nested_markup() {
    let depth = 20_000;
    let (open, close) = ("<div>".repeat(depth), "</div>".repeat(depth));
    let html = format!(
        r#"<div itemscope itemtype="https://schema.org/Place">{open}
               <span itemprop="name">Deep Place</span>{close}</div>
           <div vocab="https://schema.org/" typeof="Place">{open}
               <span property="name">Deep RDFa</span>{close}</div>"#
    );

    let bundle = ExtractionService::extract(&html);
    assert_eq!(bundle.microdata.len(), 1);
    assert_eq!(bundle.microdata[0]["name"], json!("Deep Place"));
    assert_eq!(bundle.rdfa.len(), 1);
    assert_eq!(bundle.rdfa[0]["name"], json!("Deep RDFa"));
}

#[test]
fn test_nested_item_chain_is_capped() {
    let levels = 100;
    let mut html = String::from(r#"<div itemscope itemtype="https://schema.org/Place">"#);
    for _ in 1..levels {
        html.push_str(
            r#"<div itemprop="containedInPlace" itemscope itemtype="https://schema.org/Place">"#,
        );
    }
    html.push_str(r#"<span itemprop="name">Core</span>"#);
    html.push_str(&"</div>".repeat(levels));

    let bundle = ExtractionService::extract(&html);
    assert_eq!(bundle.microdata.len(), 1);

    let mut current = &bundle.microdata[0];
    let mut nested = 0;
    while let Some(Value::Object(next)) = current.get("containedInPlace") {
        current = next;
        nested += 1;
    }
    assert_eq!(nested, MAX_ITEM_DEPTH - 1);
    assert_eq!(current["containedInPlace"], json!("Core"));
}

#[test]
fn test_rdfa_lite() {
    let html = r##"
        <div vocab="https://schema.org/" typeof="Museum" resource="#louvre">
            <span property="name">Musée du Louvre</span>
            <a property="sameAs" href="https://www.wikidata.org/wiki/Q19675">wikidata</a>
            <div property="address" typeof="PostalAddress">
                <span property="schema:addressLocality">Paris</span>
                <span property="postalCode">75001</span>
            </div>
            <meta property="telephone" content="+33 1 40 20 50 50">
        </div>
    "##;

    let bundle = ExtractionService::extract(html);
    assert_eq!(bundle.rdfa.len(), 1);

    let item = &bundle.rdfa[0];
    assert_eq!(item["@vocab"], json!("https://schema.org/"));
    assert_eq!(item["@type"], json!("Museum"));
    assert_eq!(item["@id"], json!("#louvre"));
    assert_eq!(item["name"], json!("Musée du Louvre"));
    assert_eq!(item["sameAs"], json!("https://www.wikidata.org/wiki/Q19675"));
    assert_eq!(item["telephone"], json!("+33 1 40 20 50 50"));
    assert_eq!(item["address"]["@type"], json!("PostalAddress"));
    assert_eq!(item["address"]["addressLocality"], json!("Paris"));
    assert_eq!(item["address"]["@vocab"], json!("https://schema.org/"));
}

#[test]
fn test_opengraph_and_meta_are_separate() {
    let html = r#"
        <html><head>
            <meta charset="utf-8">
            <meta property="og:title" content="Harbor Cafe">
            <meta property="og:image" content="/a.jpg">
            <meta property="og:image" content="/b.jpg">
            <meta property="place:location:latitude" content="59.91">
            <meta name="business:contact_data:locality" content="Oslo">
            <meta name="description" content="Coffee by the water">
            <meta name="geo.position" content="59.91;10.75">
            <meta name="ICBM" content="59.91, 10.75">
            <meta http-equiv="content-language" content="nb">
            <meta name="twitter:card" content="summary">
        </head><body></body></html>
    "#;

    let bundle = ExtractionService::extract(html);
    assert_eq!(bundle.opengraph.len(), 1);
    assert_eq!(bundle.meta.len(), 1);

    let og = &bundle.opengraph[0];
    assert_eq!(og["og:title"], json!("Harbor Cafe"));
    assert_eq!(og["og:image"], json!(["/a.jpg", "/b.jpg"]));
    assert_eq!(og["place:location:latitude"], json!("59.91"));
    assert_eq!(og["business:contact_data:locality"], json!("Oslo"));
    assert!(og.get("description").is_none());

    let meta = &bundle.meta[0];
    assert_eq!(meta["description"], json!("Coffee by the water"));
    assert_eq!(meta["geo.position"], json!("59.91;10.75"));
    assert_eq!(meta["icbm"], json!("59.91, 10.75"));
    assert_eq!(meta["content-language"], json!("nb"));
    assert_eq!(meta["twitter:card"], json!("summary"));
    assert!(meta.get("og:title").is_none());
}

#[test]
fn test_short_name() {
    assert_eq!(short_name("https://schema.org/Restaurant"), "Restaurant");
    assert_eq!(short_name("http://schema.org/Place/"), "Place");
    assert_eq!(short_name("schema:name"), "name");
    assert_eq!(short_name("name"), "name");
}
