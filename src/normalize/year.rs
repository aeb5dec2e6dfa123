use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::fields::{all_text, guess_year_text};
use super::RawRecord;

/// ROC year + offset = Gregorian year.
pub const ROC_OFFSET: i32 = 1911;
/// First year with its own bucket; anything earlier is `Before2009`.
pub const FIRST_BUCKET_YEAR: i32 = 2009;

pub const BEFORE_2009_DISPLAY: &str = "2009年以前";
pub const UNKNOWN_DISPLAY: &str = "2009年起（具體年份不明）";

// ROC years 89..=199 as a token not preceded by another digit.
static BEFORE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|[^0-9])9[0-8]年?以?前").unwrap());
static RANGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|[^0-9])(89|9[0-9]|1[0-9]{2})\s*[-~～至到]\s*(89|9[0-9]|1[0-9]{2})(?:[^0-9]|$)")
        .unwrap()
});
static ROC_YEAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|[^0-9])(89|9[0-9]|1[0-9]{2})年").unwrap());
static AD_YEAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|[^0-9])(20[0-9]{2})年").unwrap());
static BARE_ROC_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(89|9[0-9]|1[0-9]{2})$").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum YearPeriod {
    Before2009,
    Year(i32),
    UnknownFrom2009,
}

impl YearPeriod {
    pub fn label(self) -> String {
        match self {
            YearPeriod::Before2009 => BEFORE_2009_DISPLAY.to_string(),
            YearPeriod::Year(y) => format!("{}年", y),
            YearPeriod::UnknownFrom2009 => UNKNOWN_DISPLAY.to_string(),
        }
    }
}

impl fmt::Display for YearPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            YearPeriod::Before2009 => f.write_str("before2009"),
            YearPeriod::Year(y) => write!(f, "year_{}", y),
            YearPeriod::UnknownFrom2009 => f.write_str("unknownFrom2009"),
        }
    }
}

impl FromStr for YearPeriod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "before2009" => Ok(YearPeriod::Before2009),
            "unknownFrom2009" => Ok(YearPeriod::UnknownFrom2009),
            _ => s
                .strip_prefix("year_")
                .and_then(|y| y.parse().ok())
                .map(YearPeriod::Year)
                .ok_or_else(|| format!("unknown year period: {}", s)),
        }
    }
}

impl Serialize for YearPeriod {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for YearPeriod {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct YearInfo {
    pub year: Option<i32>,
    pub period: YearPeriod,
    pub display: String,
}

impl YearInfo {
    fn before_2009() -> Self {
        YearInfo {
            year: None,
            period: YearPeriod::Before2009,
            display: BEFORE_2009_DISPLAY.to_string(),
        }
    }

    fn unknown() -> Self {
        YearInfo {
            year: None,
            period: YearPeriod::UnknownFrom2009,
            display: UNKNOWN_DISPLAY.to_string(),
        }
    }

    /// Bucket a single Gregorian year.
    fn single(ad: i32) -> Self {
        if ad < FIRST_BUCKET_YEAR {
            YearInfo {
                year: None,
                period: YearPeriod::Before2009,
                display: format!("{}年", ad),
            }
        } else {
            YearInfo {
                year: Some(ad),
                period: YearPeriod::Year(ad),
                display: format!("{}年", ad),
            }
        }
    }
}

pub fn roc_to_ad(roc: i32) -> i32 {
    roc + ROC_OFFSET
}

pub fn classify(record: &RawRecord) -> YearInfo {
    let mut text = guess_year_text(record);
    if text.is_empty() {
        text = all_text(record);
    }
    classify_text(&text)
}

pub fn classify_text(text: &str) -> YearInfo {
    let text = text.trim();
    if text.is_empty() {
        return YearInfo::unknown();
    }

    if BEFORE_RE.is_match(text) {
        return YearInfo::before_2009();
    }

    if let Some(caps) = RANGE_RE.captures(text) {
        let start = roc_to_ad(caps[1].parse().unwrap_or_default());
        let end = roc_to_ad(caps[2].parse().unwrap_or_default());
        let period = if start < FIRST_BUCKET_YEAR {
            YearPeriod::Before2009
        } else {
            YearPeriod::UnknownFrom2009
        };
        return YearInfo {
            year: None,
            period,
            display: format!("{}-{}年間", start, end),
        };
    }

    if let Some(roc) = capture_year(&ROC_YEAR_RE, text) {
        return YearInfo::single(roc_to_ad(roc));
    }

    if let Some(ad) = capture_year(&AD_YEAR_RE, text) {
        return YearInfo::single(ad);
    }

    if let Some(roc) = capture_year(&BARE_ROC_RE, text) {
        return YearInfo::single(roc_to_ad(roc));
    }

    YearInfo::unknown()
}

fn capture_year(re: &Regex, text: &str) -> Option<i32> {
    re.captures(text)?.get(1)?.as_str().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn classify_json(v: serde_json::Value) -> YearInfo {
        classify(v.as_object().unwrap())
    }

    #[test]
    fn roc_98_is_2009_not_before() {
        let y = classify_json(json!({ "年份": "98年" }));
        assert_eq!(y.year, Some(2009));
        assert_eq!(y.period, YearPeriod::Year(2009));
        assert_eq!(y.display, "2009年");
    }

    #[test]
    fn roc_101() {
        let y = classify_json(json!({ "實施年份": "101年" }));
        assert_eq!(y.year, Some(2012));
        assert_eq!(y.period.to_string(), "year_2012");
        assert_eq!(y.display, "2012年");
    }

    #[test]
    fn before_phrase() {
        let y = classify_json(json!({ "年份": "97年以前" }));
        assert_eq!(y.period, YearPeriod::Before2009);
        assert_eq!(y.year, None);
        assert_eq!(classify_text("98前").period, YearPeriod::Before2009);
    }

    #[test]
    fn empty_record_is_unknown() {
        let y = classify_json(json!({}));
        assert_eq!(y.period, YearPeriod::UnknownFrom2009);
        assert_eq!(y.year, None);
        assert_eq!(y.display, UNKNOWN_DISPLAY);
    }

    #[test]
    fn roc_ranges() {
        let y = classify_text("98-101年間");
        assert_eq!(y.period, YearPeriod::UnknownFrom2009);
        assert_eq!(y.year, None);
        assert_eq!(y.display, "2009-2012年間");

        let y = classify_text("95至100年");
        assert_eq!(y.period, YearPeriod::Before2009);
        assert_eq!(y.display, "2006-2011年間");
    }

    #[test]
    fn early_roc_year_is_before_2009() {
        let y = classify_text("95年");
        assert_eq!(y.period, YearPeriod::Before2009);
        assert_eq!(y.year, None);
        assert_eq!(y.display, "2006年");
    }

    #[test]
    fn gregorian_years() {
        assert_eq!(classify_text("2015年開放").period, YearPeriod::Year(2015));
        assert_eq!(classify_text("2099年").period, YearPeriod::Year(2099));
        let y = classify_text("2005年");
        assert_eq!((y.year, y.period), (None, YearPeriod::Before2009));
    }

    #[test]
    fn bare_numbers() {
        let y = classify_json(json!({ "年度": 102 }));
        assert_eq!(y.period, YearPeriod::Year(2013));
        assert_eq!(classify_text("102 ").year, Some(2013));
        assert_eq!(classify_text("1020").period, YearPeriod::UnknownFrom2009);
    }

    #[test]
    fn falls_back_to_all_text() {
        let y = classify_json(json!({ "備註": "自104年起開放", "序號": 7 }));
        assert_eq!(y.period, YearPeriod::Year(2015));
    }

    #[test]
    fn junk_is_unknown() {
        for text in ["不詳", "民國", "12年", "abc"] {
            assert_eq!(classify_text(text).period, YearPeriod::UnknownFrom2009, "{text}");
        }
    }

    #[test]
    fn year_is_none_iff_bucketed() {
        for text in ["97年以前", "98年", "95年", "110年", "2008年", "99-100", "?", "100"] {
            let y = classify_text(text);
            let bucketed = matches!(y.period, YearPeriod::Before2009 | YearPeriod::UnknownFrom2009);
            assert_eq!(y.year.is_none(), bucketed, "{text}");
        }
    }

    #[test]
    fn period_labels_round_trip() {
        for p in [YearPeriod::Before2009, YearPeriod::Year(2012), YearPeriod::UnknownFrom2009] {
            assert_eq!(p.to_string().parse::<YearPeriod>(), Ok(p));
        }
        assert!("year_x".parse::<YearPeriod>().is_err());
    }
}
