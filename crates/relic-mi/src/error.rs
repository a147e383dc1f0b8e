/// Error type of this crate.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The line ended while more input was expected.
    #[error("unexpected end of line at offset {0}")]
    UnexpectedEnd(usize),

    /// An unexpected character was found.
    #[error("unexpected character {1:?} at offset {0}")]
    UnexpectedChar(usize, char),

    /// The token prefix does not fit into a 64-bit integer.
    #[error("token out of range: {0}")]
    TokenOutOfRange(String),

    /// The result class of a result record is not known.
    #[error("unknown result class: {0}")]
    UnknownResultClass(String),

    /// Tuples and lists are nested deeper than the parser accepts.
    #[error("values nested too deep at offset {0}")]
    TooDeep(usize),

    /// The line does not start with any record marker.
    #[error("not an MI record")]
    NotARecord,
}

/// Result type of this crate.
pub type Result<T> = core::result::Result<T, ParseError>;
