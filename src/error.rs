use thiserror::Error;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("HTTP {status} from {url}")]
    Network {
        status: reqwest::StatusCode,
        url: String,
    },

    #[error("invalid endpoint {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("malformed JSON body: {0}")]
    Parse(#[from] serde_json::Error),

    /// No recognized result wrapper; callers treat this as zero rows.
    #[error("response has no recognized result envelope")]
    EmptyEnvelope,
}

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("no records loaded; last failure in dataset '{dataset}': {source}")]
    AllFailed {
        dataset: String,
        #[source]
        source: FetchError,
    },
}
