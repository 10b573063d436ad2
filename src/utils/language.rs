// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::collections::HashMap;

/// 拉丁字母语言判定所需的最少停用词命中数
const FULL_COVERAGE_HITS: f64 = 5.0;

/// 语言识别结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LanguageDetection {
    /// ISO 639-1 语言代码
    pub code: &'static str,
    /// 可信度 (0.0-1.0)
    pub confidence: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Script {
    Latin,
    Han,
    Kana,
    Hangul,
    Cyrillic,
    Arabic,
    Greek,
    Hebrew,
    Devanagari,
    Thai,
}

fn script_of(c: char) -> Option<Script> {
    let code = c as u32;
    let script = match code {
        0x0041..=0x005A | 0x0061..=0x007A | 0x00C0..=0x024F => Script::Latin,
        0x0370..=0x03FF => Script::Greek,
        0x0400..=0x04FF => Script::Cyrillic,
        0x0590..=0x05FF => Script::Hebrew,
        0x0600..=0x06FF | 0x0750..=0x077F => Script::Arabic,
        0x0900..=0x097F => Script::Devanagari,
        0x0E00..=0x0E7F => Script::Thai,
        0x3040..=0x30FF => Script::Kana,
        0x3400..=0x4DBF | 0x4E00..=0x9FFF | 0xF900..=0xFAFF => Script::Han,
        0xAC00..=0xD7AF | 0x1100..=0x11FF => Script::Hangul,
        _ => return None,
    };
    Some(script)
}

/// 判断字符是否为不以空格分词的中日文字（汉字或假名），这类文字按字计词
pub fn is_cjk(c: char) -> bool {
    matches!(script_of(c), Some(Script::Han) | Some(Script::Kana))
}

const STOP_WORDS: &[(&str, &[&str])] = &[
    (
        "en",
        &[
            "the", "and", "of", "to", "in", "is", "that", "for", "it", "with", "as", "was", "on",
            "are", "by", "this", "be", "from", "or", "have", "you", "we", "our", "at",
        ],
    ),
    (
        "fr",
        &[
            "le", "la", "les", "et", "des", "est", "une", "du", "pour", "dans", "que", "qui",
            "sur", "pas", "au", "avec", "sont", "nous", "vous", "ce", "aux", "un",
        ],
    ),
    (
        "de",
        &[
            "der", "die", "und", "das", "ist", "nicht", "mit", "den", "von", "zu", "ein", "eine",
            "auf", "für", "sich", "dem", "auch", "wir", "sie", "es", "im", "ihr",
        ],
    ),
    (
        "es",
        &[
            "el", "la", "los", "las", "y", "que", "de", "en", "es", "por", "con", "para", "una",
            "del", "se", "su", "al", "lo", "como", "más", "nuestro", "está",
        ],
    ),
    (
        "it",
        &[
            "il", "di", "che", "è", "per", "una", "con", "sono", "della", "non", "gli", "le",
            "del", "nel", "al", "anche", "come", "si", "ma", "questo", "nostro", "alla",
        ],
    ),
    (
        "pt",
        &[
            "o", "a", "os", "as", "e", "que", "de", "do", "da", "em", "um", "uma", "para", "com",
            "não", "por", "mais", "se", "dos", "das", "é", "nosso",
        ],
    ),
    (
        "nl",
        &[
            "de", "het", "een", "en", "van", "is", "dat", "op", "te", "in", "voor", "met",
            "zijn", "niet", "aan", "er", "ook", "als", "maar", "wij", "onze", "bij",
        ],
    ),
];

/// 识别文本语言
///
/// 先按字符所属文字系统判断（中日韩、西里尔、阿拉伯等），
/// 拉丁字母文本再用停用词计分区分具体语言。无法判断时返回 None。
pub fn detect_language(text: &str) -> Option<LanguageDetection> {
    let mut counts: HashMap<Script, usize> = HashMap::new();
    for script in text.chars().filter_map(script_of) {
        *counts.entry(script).or_insert(0) += 1;
    }
    let total: usize = counts.values().sum();
    if total == 0 {
        return None;
    }

    let count = |script: Script| counts.get(&script).copied().unwrap_or(0);
    let share = |n: usize| n as f64 / total as f64;

    // 日文混用汉字和假名，只要假名占一定比例即视为日文
    let kana = count(Script::Kana);
    let han = count(Script::Han);
    if kana > 0 && share(kana) >= 0.1 {
        return Some(detection("ja", share(kana + han)));
    }

    let (dominant, dominant_count) = counts
        .iter()
        .max_by(|a, b| a.1.cmp(b.1).then_with(|| script_rank(*b.0).cmp(&script_rank(*a.0))))
        .map(|(script, n)| (*script, *n))?;
    let dominance = share(dominant_count);

    let code = match dominant {
        Script::Han => "zh",
        Script::Kana => "ja",
        Script::Hangul => "ko",
        Script::Greek => "el",
        Script::Hebrew => "he",
        Script::Devanagari => "hi",
        Script::Thai => "th",
        Script::Cyrillic => {
            if text.chars().any(|c| matches!(c, 'і' | 'ї' | 'є' | 'ґ')) {
                "uk"
            } else {
                "ru"
            }
        }
        Script::Arabic => {
            if text.chars().any(|c| matches!(c, 'پ' | 'چ' | 'ژ' | 'گ')) {
                "fa"
            } else {
                "ar"
            }
        }
        Script::Latin => return detect_latin(text, dominance),
    };
    Some(detection(code, dominance))
}

fn script_rank(script: Script) -> u8 {
    match script {
        Script::Latin => 0,
        Script::Han => 1,
        Script::Kana => 2,
        Script::Hangul => 3,
        Script::Cyrillic => 4,
        Script::Arabic => 5,
        Script::Greek => 6,
        Script::Hebrew => 7,
        Script::Devanagari => 8,
        Script::Thai => 9,
    }
}

fn detect_latin(text: &str, dominance: f64) -> Option<LanguageDetection> {
    let words: Vec<String> = text
        .split(|c: char| !c.is_alphabetic())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
        .collect();

    let mut scores: Vec<(&'static str, usize)> = STOP_WORDS
        .iter()
        .map(|(code, stop_words)| {
            let hits = words
                .iter()
                .filter(|w| stop_words.contains(&w.as_str()))
                .count();
            (*code, hits)
        })
        .collect();
    // 稳定排序保证同分时按表中顺序
    scores.sort_by(|a, b| b.1.cmp(&a.1));

    let (code, best) = scores.first().copied()?;
    if best == 0 {
        return None;
    }
    let second = scores.get(1).map(|s| s.1).unwrap_or(0);
    let margin = best as f64 / (best + second) as f64;
    let coverage = (best as f64 / FULL_COVERAGE_HITS).min(1.0);
    Some(detection(code, dominance * margin * coverage))
}

fn detection(code: &'static str, confidence: f64) -> LanguageDetection {
    LanguageDetection {
        code,
        confidence: (confidence.clamp(0.0, 1.0) * 1000.0).round() / 1000.0,
    }
}

/// 从 `lang` 属性值中取出主语言标签，例如 `en-US` → `en`
pub fn primary_language_tag(lang: &str) -> Option<String> {
    let primary = lang
        .trim()
        .split(|c: char| c == '-' || c == '_')
        .next()?
        .to_ascii_lowercase();
    let valid = (2..=3).contains(&primary.len()) && primary.chars().all(|c| c.is_ascii_alphabetic());
    valid.then_some(primary)
}
