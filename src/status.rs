//! HTTP status codes as a typed enum.
//!
//! [`Status`] is a closed set: a response can only carry a code from this
//! table, so an unrecognized numeric code is rejected at the call site by
//! the type system instead of being silently coerced. Hooks that receive
//! numeric codes over the wire can convert with [`Status::try_from`].

use std::fmt;

/// A recognized HTTP status code.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Status {
    // ── 1xx Informational ─────────────────────────────────────────────────────
    Continue,                      // 100
    SwitchingProtocols,            // 101
    Processing,                    // 102
    // ── 2xx Success ───────────────────────────────────────────────────────────
    Ok,                            // 200
    Created,                       // 201
    Accepted,                      // 202
    NonAuthoritativeInformation,   // 203
    NoContent,                     // 204
    ResetContent,                  // 205
    PartialContent,                // 206
    MultiStatus,                   // 207
    // ── 3xx Redirection ───────────────────────────────────────────────────────
    MultipleChoices,               // 300
    MovedPermanently,              // 301
    Found,                         // 302
    SeeOther,                      // 303
    NotModified,                   // 304
    UseProxy,                      // 305
    SwitchProxy,                   // 306
    TemporaryRedirect,             // 307
    // ── 4xx Client errors ─────────────────────────────────────────────────────
    BadRequest,                    // 400
    Unauthorized,                  // 401
    PaymentRequired,               // 402
    Forbidden,                     // 403
    NotFound,                      // 404
    MethodNotAllowed,              // 405
    NotAcceptable,                 // 406
    ProxyAuthenticationRequired,   // 407
    RequestTimeout,                // 408
    Conflict,                      // 409
    Gone,                          // 410
    LengthRequired,                // 411
    PreconditionFailed,            // 412
    RequestEntityTooLarge,         // 413
    RequestUriTooLong,             // 414
    UnsupportedMediaType,          // 415
    RequestedRangeNotSatisfiable,  // 416
    ExpectationFailed,             // 417
    UnprocessableEntity,           // 422
    Locked,                        // 423
    FailedDependency,              // 424
    UnorderedCollection,           // 425
    UpgradeRequired,               // 426
    PreconditionRequired,          // 428
    TooManyRequests,               // 429
    RequestHeaderFieldsTooLarge,   // 431
    RetryWith,                     // 449
    // ── 5xx Server errors ─────────────────────────────────────────────────────
    InternalServerError,           // 500
    NotImplemented,                // 501
    BadGateway,                    // 502
    ServiceUnavailable,            // 503
    GatewayTimeout,                // 504
    HttpVersionNotSupported,       // 505
    VariantAlsoNegotiates,         // 506
    InsufficientStorage,           // 507
    BandwidthLimitExceeded,        // 509
    NotExtended,                   // 510
}

impl Status {
    /// Returns the numeric wire code.
    pub fn code(self) -> u16 {
        match self {
            Self::Continue                     => 100,
            Self::SwitchingProtocols           => 101,
            Self::Processing                   => 102,
            Self::Ok                           => 200,
            Self::Created                      => 201,
            Self::Accepted                     => 202,
            Self::NonAuthoritativeInformation  => 203,
            Self::NoContent                    => 204,
            Self::ResetContent                 => 205,
            Self::PartialContent               => 206,
            Self::MultiStatus                  => 207,
            Self::MultipleChoices              => 300,
            Self::MovedPermanently             => 301,
            Self::Found                        => 302,
            Self::SeeOther                     => 303,
            Self::NotModified                  => 304,
            Self::UseProxy                     => 305,
            Self::SwitchProxy                  => 306,
            Self::TemporaryRedirect            => 307,
            Self::BadRequest                   => 400,
            Self::Unauthorized                 => 401,
            Self::PaymentRequired              => 402,
            Self::Forbidden                    => 403,
            Self::NotFound                     => 404,
            Self::MethodNotAllowed             => 405,
            Self::NotAcceptable                => 406,
            Self::ProxyAuthenticationRequired  => 407,
            Self::RequestTimeout               => 408,
            Self::Conflict                     => 409,
            Self::Gone                         => 410,
            Self::LengthRequired               => 411,
            Self::PreconditionFailed           => 412,
            Self::RequestEntityTooLarge        => 413,
            Self::RequestUriTooLong            => 414,
            Self::UnsupportedMediaType         => 415,
            Self::RequestedRangeNotSatisfiable => 416,
            Self::ExpectationFailed            => 417,
            Self::UnprocessableEntity          => 422,
            Self::Locked                       => 423,
            Self::FailedDependency             => 424,
            Self::UnorderedCollection          => 425,
            Self::UpgradeRequired              => 426,
            Self::PreconditionRequired         => 428,
            Self::TooManyRequests              => 429,
            Self::RequestHeaderFieldsTooLarge  => 431,
            Self::RetryWith                    => 449,
            Self::InternalServerError          => 500,
            Self::NotImplemented               => 501,
            Self::BadGateway                   => 502,
            Self::ServiceUnavailable           => 503,
            Self::GatewayTimeout               => 504,
            Self::HttpVersionNotSupported      => 505,
            Self::VariantAlsoNegotiates        => 506,
            Self::InsufficientStorage          => 507,
            Self::BandwidthLimitExceeded       => 509,
            Self::NotExtended                  => 510,
        }
    }

    /// Returns the canonical reason phrase (e.g. `"Not Found"`).
    pub fn reason(self) -> &'static str {
        match self {
            Self::Continue                     => "Continue",
            Self::SwitchingProtocols           => "Switching Protocols",
            Self::Processing                   => "Processing",
            Self::Ok                           => "OK",
            Self::Created                      => "Created",
            Self::Accepted                     => "Accepted",
            Self::NonAuthoritativeInformation  => "Non-Authoritative Information",
            Self::NoContent                    => "No Content",
            Self::ResetContent                 => "Reset Content",
            Self::PartialContent               => "Partial Content",
            Self::MultiStatus                  => "Multi-Status",
            Self::MultipleChoices              => "Multiple Choices",
            Self::MovedPermanently             => "Moved Permanently",
            Self::Found                        => "Found",
            Self::SeeOther                     => "See Other",
            Self::NotModified                  => "Not Modified",
            Self::UseProxy                     => "Use Proxy",
            Self::SwitchProxy                  => "Switch Proxy",
            Self::TemporaryRedirect            => "Temporary Redirect",
            Self::BadRequest                   => "Bad Request",
            Self::Unauthorized                 => "Unauthorized",
            Self::PaymentRequired              => "Payment Required",
            Self::Forbidden                    => "Forbidden",
            Self::NotFound                     => "Not Found",
            Self::MethodNotAllowed             => "Method Not Allowed",
            Self::NotAcceptable                => "Not Acceptable",
            Self::ProxyAuthenticationRequired  => "Proxy Authentication Required",
            Self::RequestTimeout               => "Request Timeout",
            Self::Conflict                     => "Conflict",
            Self::Gone                         => "Gone",
            Self::LengthRequired               => "Length Required",
            Self::PreconditionFailed           => "Precondition Failed",
            Self::RequestEntityTooLarge        => "Request Entity Too Large",
            Self::RequestUriTooLong            => "Request-URI Too Long",
            Self::UnsupportedMediaType         => "Unsupported Media Type",
            Self::RequestedRangeNotSatisfiable => "Requested Range Not Satisfiable",
            Self::ExpectationFailed            => "Expectation Failed",
            Self::UnprocessableEntity          => "Unprocessable Entity",
            Self::Locked                       => "Locked",
            Self::FailedDependency             => "Failed Dependency",
            Self::UnorderedCollection          => "Unordered Collection",
            Self::UpgradeRequired              => "Upgrade Required",
            Self::PreconditionRequired         => "Precondition Required",
            Self::TooManyRequests              => "Too Many Requests",
            Self::RequestHeaderFieldsTooLarge  => "Request Header Fields Too Large",
            Self::RetryWith                    => "Retry With",
            Self::InternalServerError          => "Internal Server Error",
            Self::NotImplemented               => "Not Implemented",
            Self::BadGateway                   => "Bad Gateway",
            Self::ServiceUnavailable           => "Service Unavailable",
            Self::GatewayTimeout               => "Gateway Timeout",
            Self::HttpVersionNotSupported      => "HTTP Version Not Supported",
            Self::VariantAlsoNegotiates        => "Variant Also Negotiates",
            Self::InsufficientStorage          => "Insufficient Storage",
            Self::BandwidthLimitExceeded       => "Bandwidth Limit Exceeded",
            Self::NotExtended                  => "Not Extended",
        }
    }
}

impl TryFrom<u16> for Status {
    type Error = u16;

    /// Converts a numeric code, returning the code itself on failure.
    fn try_from(code: u16) -> Result<Self, Self::Error> {
        Ok(match code {
            100 => Self::Continue,
            101 => Self::SwitchingProtocols,
            102 => Self::Processing,
            200 => Self::Ok,
            201 => Self::Created,
            202 => Self::Accepted,
            203 => Self::NonAuthoritativeInformation,
            204 => Self::NoContent,
            205 => Self::ResetContent,
            206 => Self::PartialContent,
            207 => Self::MultiStatus,
            300 => Self::MultipleChoices,
            301 => Self::MovedPermanently,
            302 => Self::Found,
            303 => Self::SeeOther,
            304 => Self::NotModified,
            305 => Self::UseProxy,
            306 => Self::SwitchProxy,
            307 => Self::TemporaryRedirect,
            400 => Self::BadRequest,
            401 => Self::Unauthorized,
            402 => Self::PaymentRequired,
            403 => Self::Forbidden,
            404 => Self::NotFound,
            405 => Self::MethodNotAllowed,
            406 => Self::NotAcceptable,
            407 => Self::ProxyAuthenticationRequired,
            408 => Self::RequestTimeout,
            409 => Self::Conflict,
            410 => Self::Gone,
            411 => Self::LengthRequired,
            412 => Self::PreconditionFailed,
            413 => Self::RequestEntityTooLarge,
            414 => Self::RequestUriTooLong,
            415 => Self::UnsupportedMediaType,
            416 => Self::RequestedRangeNotSatisfiable,
            417 => Self::ExpectationFailed,
            422 => Self::UnprocessableEntity,
            423 => Self::Locked,
            424 => Self::FailedDependency,
            425 => Self::UnorderedCollection,
            426 => Self::UpgradeRequired,
            428 => Self::PreconditionRequired,
            429 => Self::TooManyRequests,
            431 => Self::RequestHeaderFieldsTooLarge,
            449 => Self::RetryWith,
            500 => Self::InternalServerError,
            501 => Self::NotImplemented,
            502 => Self::BadGateway,
            503 => Self::ServiceUnavailable,
            504 => Self::GatewayTimeout,
            505 => Self::HttpVersionNotSupported,
            506 => Self::VariantAlsoNegotiates,
            507 => Self::InsufficientStorage,
            509 => Self::BandwidthLimitExceeded,
            510 => Self::NotExtended,
            other => return Err(other),
        })
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code(), self.reason())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_and_reason_round_trip() {
        for code in [200u16, 204, 301, 304, 404, 429, 500] {
            let status = Status::try_from(code).unwrap();
            assert_eq!(status.code(), code);
            assert!(!status.reason().is_empty());
        }
    }

    #[test]
    fn unknown_code_is_rejected() {
        assert_eq!(Status::try_from(299), Err(299));
        assert_eq!(Status::try_from(600), Err(600));
    }

    #[test]
    fn display_is_the_status_line() {
        assert_eq!(Status::NotFound.to_string(), "404 Not Found");
    }
}
