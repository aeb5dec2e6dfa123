/// A Taipei open-data dataset to load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatasetSource {
    pub id: &'static str,
    pub label: &'static str,
    pub url: &'static str,
    pub source_name: &'static str,
}

pub const DATASETS: &[DatasetSource] = &[
    DatasetSource {
        id: "third-lane",
        label: "開放機車行駛第3車道",
        url: "https://data.taipei/api/v1/dataset/a15f2a8d-eb1a-489d-a25f-3d816af10177?scope=resourceAquire",
        source_name: "臺北市開放機車行駛第3車道路段列表",
    },
    DatasetSource {
        id: "two-lanes-two-stage",
        label: "二車道例外兩段式左轉管制",
        url: "https://data.taipei/api/v1/dataset/86c7c859-78d4-430c-bada-277203abd881?scope=resourceAquire",
        source_name: "臺北市二車道路段例外實施兩段式左轉管制清冊",
    },
    DatasetSource {
        id: "three-plus-direct-left",
        label: "三(含)車道以上直接左轉例外",
        url: "https://data.taipei/api/v1/dataset/e77ab72d-cffa-46be-8b5c-16d60c32fce5?scope=resourceAquire",
        source_name: "臺北市三(含)車道以上例外開放機車直接左轉路口",
    },
];
