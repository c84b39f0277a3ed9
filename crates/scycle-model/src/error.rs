use thiserror::Error;

/// Configuration errors: unrecognized enum value, missing required key,
/// mutually exclusive options, or a malformed depth profile. These are
/// always returned before any grid or solver object is constructed.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required key `{0}`")]
    MissingKey(String),

    #[error("unrecognized key `{0}` in input file")]
    UnknownKey(String),

    #[error("key `{key}` has value `{value}` which is not a valid {expected}")]
    InvalidValue {
        key: String,
        value: String,
        expected: &'static str,
    },

    #[error("unrecognized value `{value}` for `{key}`; expected one of {allowed:?}")]
    UnrecognizedEnum {
        key: String,
        value: String,
        allowed: &'static [&'static str],
    },

    #[error("`{a}` and `{b}` are mutually exclusive but both were set")]
    MutuallyExclusive { a: String, b: String },

    #[error("depth profile `{field}` has {n_vals} values but {n_depths} depths")]
    DepthProfileMismatch {
        field: String,
        n_vals: usize,
        n_depths: usize,
    },

    #[error("depth profile `{field}` must have at least one entry")]
    DepthProfileEmpty { field: String },

    #[error("failed to read depth-profile vector file `{path}`: {source}")]
    VectorFileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid input: {0}")]
    Parse(#[from] scycle_inp::ParseError),
}
