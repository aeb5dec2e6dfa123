use std::collections::BTreeSet;

use crate::datasets::DatasetSource;
use crate::normalize::district::District;
use crate::normalize::year::YearPeriod;
use crate::normalize::NormalizedRecord;

/// User-selected filters; `None` matches everything.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    pub category: Option<String>,
    pub district: Option<String>,
    pub period: Option<YearPeriod>,
    pub query: Option<String>,
}

impl Filter {
    pub fn matches(&self, r: &NormalizedRecord) -> bool {
        if self.category.as_deref().is_some_and(|c| r.category != c) {
            return false;
        }
        if self.district.as_deref().is_some_and(|d| !r.districts.contains_label(d)) {
            return false;
        }
        if self.period.is_some_and(|p| r.year_period != p) {
            return false;
        }
        if let Some(q) = self.query.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
            let q = q.to_lowercase();
            return r.location.to_lowercase().contains(&q)
                || r.district_display.to_lowercase().contains(&q);
        }
        true
    }

    pub fn apply<'a>(&self, records: &'a [NormalizedRecord]) -> Vec<&'a NormalizedRecord> {
        records.iter().filter(|r| self.matches(r)).collect()
    }
}

/// Values offered for each filter, derived from the loaded records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterOptions {
    pub categories: Vec<String>,
    pub districts: Vec<String>,
    pub periods: Vec<YearPeriod>,
}

impl FilterOptions {
    pub fn from_records(datasets: &[DatasetSource], records: &[NormalizedRecord]) -> Self {
        let categories = datasets.iter().map(|d| d.label.to_string()).collect();

        let labels: BTreeSet<&str> = records
            .iter()
            .flat_map(|r| r.districts.labels())
            .collect();
        let mut districts: Vec<String> = District::ALL
            .iter()
            .map(|d| d.name())
            .filter(|name| labels.contains(name))
            .map(str::to_string)
            .collect();
        districts.extend(
            labels
                .iter()
                .filter(|l| District::ALL.iter().all(|d| d.name() != **l))
                .map(|l| l.to_string()),
        );

        // Ord on YearPeriod: before2009, years ascending, unknownFrom2009.
        let periods: BTreeSet<YearPeriod> = records.iter().map(|r| r.year_period).collect();

        FilterOptions {
            categories,
            districts,
            periods: periods.into_iter().collect(),
        }
    }
}
