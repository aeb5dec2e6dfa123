use serde_json::Value;

use super::RawRecord;

const DISTRICT_KEYS: &[&str] = &["行政區", "行政區別", "行政區域", "區", "行政區名", "區別"];
const LOCATION_KEYS: &[&str] = &[
    "路段", "路名", "道路名稱", "地點", "位置", "路口", "起訖", "主要路段", "主要路口",
];
const ROAD_KEYS: &[&str] = &["道路名稱", "路名"];
const SEGMENT_KEYS: &[&str] = &["路段", "路口", "地點"];
const NOTES_KEYS: &[&str] = &["備註", "說明", "備考", "備註說明"];
const YEAR_KEYS: &[&str] = &[
    "年份", "實施年份", "實施日期", "公告年份", "開放年份", "管制年份", "年度",
];

/// First non-empty value among `candidates`: exact keys first, then a
/// case-insensitive pass over the same list.
pub fn pick_value(record: &RawRecord, candidates: &[&str]) -> String {
    let exact = candidates
        .iter()
        .find_map(|key| record.get(*key).and_then(value_text));
    if let Some(v) = exact {
        return v;
    }

    candidates
        .iter()
        .find_map(|key| {
            let wanted = key.to_lowercase();
            record
                .iter()
                .filter(|(k, _)| k.to_lowercase() == wanted)
                .find_map(|(_, v)| value_text(v))
        })
        .unwrap_or_default()
}

/// Trimmed text form of a scalar; `None` for null or blank.
pub fn value_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::Null => return None,
        Value::String(s) => s.trim().to_string(),
        other => other.to_string(),
    };
    (!text.is_empty()).then_some(text)
}

pub fn guess_district(record: &RawRecord) -> String {
    let value = pick_value(record, DISTRICT_KEYS);
    if !value.is_empty() {
        return value;
    }
    // Any column that looks like a district column.
    record
        .iter()
        .find(|(k, _)| k.ends_with('區') || k.contains("行政"))
        .and_then(|(_, v)| value_text(v))
        .unwrap_or_default()
}

pub fn guess_location(record: &RawRecord) -> String {
    let value = pick_value(record, LOCATION_KEYS);
    if !value.is_empty() {
        return value;
    }
    let road = pick_value(record, ROAD_KEYS);
    let segment = pick_value(record, SEGMENT_KEYS);
    match (road.is_empty(), segment.is_empty()) {
        (false, false) => format!("{} {}", road, segment),
        (false, true) => road,
        _ => segment,
    }
}

pub fn guess_notes(record: &RawRecord) -> String {
    pick_value(record, NOTES_KEYS)
}

pub fn guess_year_text(record: &RawRecord) -> String {
    pick_value(record, YEAR_KEYS)
}

/// Every string-valued field joined by spaces.
pub fn all_text(record: &RawRecord) -> String {
    record
        .values()
        .filter_map(Value::as_str)
        .collect::<Vec<_>>()
        .join(" ")
}
