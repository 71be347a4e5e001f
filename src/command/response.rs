//! Correlated responses (§4.C "response uniqueness", testable property 4).

use crate::command::CommandHeader;

/// Acknowledges a command whose `response_required` was set, carrying the
/// originating command's id in `correlation_id`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Response {
    pub header: CommandHeader,
    pub correlation_id: u32,
}

/// A `Response` that reports failure, carrying the broker's exception
/// message and (if `StackTraceEnabled` was negotiated on) a rendered trace.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExceptionResponse {
    pub header: CommandHeader,
    pub correlation_id: u32,
    pub exception_class: Option<String>,
    pub message: String,
    pub stack_trace: Option<String>,
}
