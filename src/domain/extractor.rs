//! Turns free-form order text into line items.
//!
//! Customers type orders the way they would scribble a shopping list, so the
//! extractor is deliberately forgiving: every line becomes an item, and a
//! quantity is only taken when one of the known patterns produces a plausible
//! number.

use super::order::LineItem;
use regex::Regex;
use std::ops::RangeInclusive;
use std::sync::LazyLock;

/// Quantities outside this range are not treated as quantities at all.
pub const QUANTITY_RANGE: RangeInclusive<u32> = 1..=100;

const UNIT_WORDS: &str =
    r"strips?|tablets?|tabs?|capsules?|caps|boxes|box|packets?|packs?|units?|bottles?|pieces?|pcs";

/// Keywords for drugs and drug classes that need a prescription. Matched
/// case-insensitively as substrings of item names.
pub const RX_KEYWORDS: &[&str] = &[
    "antibiotic",
    "amoxicillin",
    "amoxyclav",
    "augmentin",
    "azithromycin",
    "ciprofloxacin",
    "levofloxacin",
    "doxycycline",
    "cefixime",
    "cephalexin",
    "metronidazole",
    "insulin",
    "metformin",
    "glimepiride",
    "amlodipine",
    "telmisartan",
    "losartan",
    "atorvastatin",
    "rosuvastatin",
    "clopidogrel",
    "warfarin",
    "levothyroxine",
    "thyronorm",
    "prednisolone",
    "dexamethasone",
    "alprazolam",
    "clonazepam",
    "diazepam",
    "lorazepam",
    "zolpidem",
    "tramadol",
    "codeine",
    "morphine",
    "oxycodone",
    "pregabalin",
    "gabapentin",
    "sertraline",
    "fluoxetine",
    "escitalopram",
    "sildenafil",
    "tadalafil",
    "steroid",
    "injection",
];

static LINE_SPLIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\n\r,;]+").expect("line split pattern is valid"));

static BULLET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:[-*•·▪►]+|\d{1,2}[.)])\s*").expect("bullet pattern is valid")
});

/// Quantity patterns in priority order. Capture group 1 is the quantity; the
/// whole match is cut out of the line to leave the item name.
static QUANTITY_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        format!(r"(?i)(?:^|\s)[x×]\s*(\d+)\b(?:\s*(?:{UNIT_WORDS})\b)?"),
        format!(r"(?i)\b(\d+)\s*(?:{UNIT_WORDS})\b"),
        r"(?:^|\s)-\s*(\d+)\b".to_string(),
        r"\s(\d+)\s*$".to_string(),
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("quantity pattern is valid"))
    .collect()
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    pub items: Vec<LineItem>,
    pub requires_rx: bool,
}

pub fn extract(text: &str) -> Extraction {
    let items = extract_items(text);
    let requires_rx = requires_prescription(&items);
    Extraction { items, requires_rx }
}

pub fn extract_items(text: &str) -> Vec<LineItem> {
    LINE_SPLIT.split(text).filter_map(parse_line).collect()
}

/// True when any item name contains a regulated-drug keyword.
pub fn requires_prescription(items: &[LineItem]) -> bool {
    items.iter().any(|item| {
        let name = item.name.to_lowercase();
        RX_KEYWORDS.iter().any(|keyword| name.contains(keyword))
    })
}

fn parse_line(line: &str) -> Option<LineItem> {
    let original = line.trim();
    let body = BULLET.replace(original, "");
    let body = body.trim();
    if body.chars().count() <= 1 {
        return None;
    }

    for pattern in QUANTITY_PATTERNS.iter() {
        let Some(caps) = pattern.captures(body) else {
            continue;
        };
        let Some(quantity) = caps
            .get(1)
            .and_then(|m| m.as_str().parse::<u32>().ok())
            .filter(|q| QUANTITY_RANGE.contains(q))
        else {
            continue;
        };
        let Some(whole) = caps.get(0) else {
            continue;
        };
        let name = tidy_name(&format!("{} {}", &body[..whole.start()], &body[whole.end()..]));
        if name.is_empty() {
            continue;
        }
        return Some(LineItem {
            name,
            quantity,
            original: original.to_string(),
        });
    }

    let name = tidy_name(body);
    (name.chars().count() > 1).then(|| LineItem {
        name,
        quantity: 1,
        original: original.to_string(),
    })
}

fn tidy_name(raw: &str) -> String {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    let trimmed = collapsed.trim_matches(|c: char| {
        c.is_whitespace() || matches!(c, '-' | '*' | '•' | '·' | ':' | '.' | '(' | ')' | '=')
    });
    let trimmed = trimmed
        .strip_prefix("of ")
        .or_else(|| trimmed.strip_prefix("Of "))
        .unwrap_or(trimmed);
    trimmed.trim().to_string()
}
