use thiserror::Error;

#[derive(Debug, Error)]
pub enum CompanionError {
    #[error("emotion intensity {0} outside [0.0, 1.0]")]
    IntensityOutOfRange(f64),
    #[error("unknown emotion tag `{0}`")]
    UnknownEmotion(String),
    #[error("unknown state tag `{0}`")]
    UnknownState(String),
    #[error("malformed chunk span: {0}")]
    MalformedSpan(String),
    #[error("invalid chunk record: {0}")]
    InvalidRecord(String),
    #[error("upstream call failed with status {0}")]
    UpstreamStatus(u16),
    #[error("config invalid: {0}")]
    InvalidConfig(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagCode {
    E101MalformedSpan,
    E102InvalidRecord,
    E103SpanOverflow,
    E104UnterminatedSpan,
    E201LoadFailed,
    E202SaveFailed,
    E203AuditFailed,
    E301UpstreamAbort,
    E302UpstreamEvent,
}

impl DiagCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::E101MalformedSpan => "E101_MALFORMED_SPAN",
            Self::E102InvalidRecord => "E102_INVALID_RECORD",
            Self::E103SpanOverflow => "E103_SPAN_OVERFLOW",
            Self::E104UnterminatedSpan => "E104_UNTERMINATED_SPAN",
            Self::E201LoadFailed => "E201_LOAD_FAILED",
            Self::E202SaveFailed => "E202_SAVE_FAILED",
            Self::E203AuditFailed => "E203_AUDIT_FAILED",
            Self::E301UpstreamAbort => "E301_UPSTREAM_ABORT",
            Self::E302UpstreamEvent => "E302_UPSTREAM_EVENT",
        }
    }
}
