pub mod district;
pub mod fields;
pub mod year;

use serde::{Deserialize, Serialize};

use district::{DistrictSet, UNSPECIFIED};
use year::YearPeriod;

/// One source row as delivered by the API, field order preserved.
pub type RawRecord = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedRecord {
    pub category: String,
    pub district_display: String,
    pub districts: DistrictSet,
    pub location: String,
    pub notes: String,
    pub year: Option<i32>,
    pub year_period: YearPeriod,
    pub year_display: String,
    pub source: String,
    pub raw: RawRecord,
}

pub fn normalize_record(category: &str, source: &str, raw: &RawRecord) -> NormalizedRecord {
    let raw_district = fields::guess_district(raw);
    let mut location = fields::guess_location(raw);
    if location.is_empty() {
        location = UNSPECIFIED.to_string();
    }
    let notes = fields::guess_notes(raw);
    let districts = district::resolve(&raw_district, &location, &notes);

    let district_display = if !raw_district.is_empty() {
        raw_district
    } else {
        // Unspecified displays as the sentinel itself.
        districts.display()
    };

    let year_info = year::classify(raw);

    NormalizedRecord {
        category: category.to_string(),
        district_display,
        districts,
        location,
        notes,
        year: year_info.year,
        year_period: year_info.period,
        year_display: year_info.display,
        source: source.to_string(),
        raw: raw.clone(),
    }
}
