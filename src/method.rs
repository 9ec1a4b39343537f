//! HTTP method as a typed enum.
//!
//! The framework binds handlers to a fixed method set; anything else is
//! rejected by the transport with `405 Method Not Allowed` before dispatch.
//! Routes may additionally bind a catch-all handler for "any method" — that
//! is a binding-level concept (see [`Route`](crate::Route)), not a wire
//! method, so it does not appear here.

use std::fmt;
use std::str::FromStr;

/// A supported HTTP method.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Method {
    Get,
    Head,
    Options,
    Post,
    Patch,
    Put,
    Delete,
}

impl Method {
    /// Every supported method, in `Allow`-header listing order.
    pub const ALL: [Method; 7] = [
        Method::Get,
        Method::Head,
        Method::Options,
        Method::Post,
        Method::Patch,
        Method::Put,
        Method::Delete,
    ];

    /// Returns the uppercase wire representation (e.g. `"GET"`).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get     => "GET",
            Self::Head    => "HEAD",
            Self::Options => "OPTIONS",
            Self::Post    => "POST",
            Self::Patch   => "PATCH",
            Self::Put     => "PUT",
            Self::Delete  => "DELETE",
        }
    }
}

/// Parses an uppercase method string. Case-sensitive per RFC 9110 §9.1.
impl FromStr for Method {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "GET"     => Ok(Self::Get),
            "HEAD"    => Ok(Self::Head),
            "OPTIONS" => Ok(Self::Options),
            "POST"    => Ok(Self::Post),
            "PATCH"   => Ok(Self::Patch),
            "PUT"     => Ok(Self::Put),
            "DELETE"  => Ok(Self::Delete),
            _         => Err(()),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
