use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Raw district text meaning "spans several districts".
pub const MULTI_DISTRICT_MARKER: &str = "跨越多個行政區";
/// Display text for rows with no usable district information.
pub const UNSPECIFIED: &str = "（未註明）";

/// Taipei's 12 administrative districts, in their customary order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum District {
    #[serde(rename = "中正區")]
    Zhongzheng,
    #[serde(rename = "大同區")]
    Datong,
    #[serde(rename = "中山區")]
    Zhongshan,
    #[serde(rename = "松山區")]
    Songshan,
    #[serde(rename = "大安區")]
    Daan,
    #[serde(rename = "萬華區")]
    Wanhua,
    #[serde(rename = "信義區")]
    Xinyi,
    #[serde(rename = "士林區")]
    Shilin,
    #[serde(rename = "北投區")]
    Beitou,
    #[serde(rename = "內湖區")]
    Neihu,
    #[serde(rename = "南港區")]
    Nangang,
    #[serde(rename = "文山區")]
    Wenshan,
}

impl District {
    pub const ALL: [District; 12] = [
        District::Zhongzheng,
        District::Datong,
        District::Zhongshan,
        District::Songshan,
        District::Daan,
        District::Wanhua,
        District::Xinyi,
        District::Shilin,
        District::Beitou,
        District::Neihu,
        District::Nangang,
        District::Wenshan,
    ];

    pub fn name(self) -> &'static str {
        match self {
            District::Zhongzheng => "中正區",
            District::Datong => "大同區",
            District::Zhongshan => "中山區",
            District::Songshan => "松山區",
            District::Daan => "大安區",
            District::Wanhua => "萬華區",
            District::Xinyi => "信義區",
            District::Shilin => "士林區",
            District::Beitou => "北投區",
            District::Neihu => "內湖區",
            District::Nangang => "南港區",
            District::Wenshan => "文山區",
        }
    }

    /// Name without the trailing 區, e.g. "大安".
    pub fn short_name(self) -> &'static str {
        self.name().trim_end_matches('區')
    }

    /// Match a single token by full name, short name, or "<short>區".
    pub fn from_token(token: &str) -> Option<District> {
        let stem = token.strip_suffix('區').unwrap_or(token);
        District::ALL
            .into_iter()
            .find(|d| d.name() == token || d.short_name() == stem)
    }
}

impl fmt::Display for District {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Resolved districts for one record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum DistrictSet {
    /// One or more known districts, deduplicated.
    Known(BTreeSet<District>),
    /// Raw district text that names no known district.
    Unresolved(String),
    Unspecified,
}

impl DistrictSet {
    /// Labels used for filtering: district names, the opaque text, or the sentinel.
    pub fn labels(&self) -> Vec<&str> {
        match self {
            DistrictSet::Known(set) => set.iter().map(|d| d.name()).collect(),
            DistrictSet::Unresolved(text) => vec![text.as_str()],
            DistrictSet::Unspecified => vec![UNSPECIFIED],
        }
    }

    pub fn contains_label(&self, label: &str) -> bool {
        self.labels().contains(&label)
    }

    pub fn display(&self) -> String {
        self.labels().join("、")
    }
}

pub fn resolve(raw_district: &str, location: &str, notes: &str) -> DistrictSet {
    let raw = raw_district.trim();
    let haystack = format!("{} {} {}", raw, location, notes);

    let mut found = scan_text(&haystack);
    if found.is_empty() {
        found = tokenize(raw)
            .into_iter()
            .filter_map(District::from_token)
            .collect();
    }

    if !found.is_empty() {
        return DistrictSet::Known(found);
    }
    if !raw.is_empty() && raw != MULTI_DISTRICT_MARKER && raw != UNSPECIFIED {
        DistrictSet::Unresolved(raw.to_string())
    } else {
        DistrictSet::Unspecified
    }
}

/// Literal scan for every full and short district name.
fn scan_text(text: &str) -> BTreeSet<District> {
    District::ALL
        .into_iter()
        .filter(|d| text.contains(d.name()) || text.contains(d.short_name()))
        .collect()
}

fn tokenize(raw: &str) -> Vec<&str> {
    raw.split(|c: char| {
        matches!(
            c,
            '(' | ')' | '（' | '）' | '與' | '跟' | '及' | '至' | '到' | '-' | '、' | '，' | ','
                | '／' | '/' | ';' | '；'
        ) || c.is_whitespace()
    })
    .map(str::trim)
    .filter(|t| !t.is_empty())
    .collect()
}
