//! Response codes.
//!
//! Codes are written `c.dd`: a class (2 = success, 4 = client error,
//! 5 = server error) and a two-digit detail.

use std::fmt;

use crate::message::Method;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseCode {
    Created,
    Deleted,
    Valid,
    Changed,
    Content,
    Continue,
    BadRequest,
    Unauthorized,
    BadOption,
    Forbidden,
    NotFound,
    MethodNotAllowed,
    NotAcceptable,
    RequestEntityIncomplete,
    Conflict,
    PreconditionFailed,
    RequestEntityTooLarge,
    UnsupportedContentFormat,
    InternalServerError,
    NotImplemented,
    BadGateway,
    ServiceUnavailable,
    GatewayTimeout,
    ProxyingNotSupported,
}

impl ResponseCode {
    /// `(class, detail)` pair.
    pub fn parts(self) -> (u8, u8) {
        use ResponseCode::*;
        match self {
            Created => (2, 1),
            Deleted => (2, 2),
            Valid => (2, 3),
            Changed => (2, 4),
            Content => (2, 5),
            Continue => (2, 31),
            BadRequest => (4, 0),
            Unauthorized => (4, 1),
            BadOption => (4, 2),
            Forbidden => (4, 3),
            NotFound => (4, 4),
            MethodNotAllowed => (4, 5),
            NotAcceptable => (4, 6),
            RequestEntityIncomplete => (4, 8),
            Conflict => (4, 9),
            PreconditionFailed => (4, 12),
            RequestEntityTooLarge => (4, 13),
            UnsupportedContentFormat => (4, 15),
            InternalServerError => (5, 0),
            NotImplemented => (5, 1),
            BadGateway => (5, 2),
            ServiceUnavailable => (5, 3),
            GatewayTimeout => (5, 4),
            ProxyingNotSupported => (5, 5),
        }
    }

    pub fn class(self) -> u8 {
        self.parts().0
    }

    pub fn detail(self) -> u8 {
        self.parts().1
    }

    /// Single-byte wire encoding: 3-bit class, 5-bit detail.
    pub fn to_byte(self) -> u8 {
        let (class, detail) = self.parts();
        (class << 5) | detail
    }

    pub fn is_success(self) -> bool {
        self.class() == 2
    }

    pub fn is_client_error(self) -> bool {
        self.class() == 4
    }

    pub fn is_server_error(self) -> bool {
        self.class() == 5
    }

    /// Success code used when a handler leaves the response code unset.
    pub fn default_for(method: Method) -> Self {
        match method {
            Method::Get | Method::Fetch => ResponseCode::Content,
            Method::Post | Method::Put | Method::Patch | Method::IPatch => ResponseCode::Changed,
            Method::Delete => ResponseCode::Deleted,
        }
    }

    pub fn reason(self) -> &'static str {
        use ResponseCode::*;
        match self {
            Created => "Created",
            Deleted => "Deleted",
            Valid => "Valid",
            Changed => "Changed",
            Content => "Content",
            Continue => "Continue",
            BadRequest => "Bad Request",
            Unauthorized => "Unauthorized",
            BadOption => "Bad Option",
            Forbidden => "Forbidden",
            NotFound => "Not Found",
            MethodNotAllowed => "Method Not Allowed",
            NotAcceptable => "Not Acceptable",
            RequestEntityIncomplete => "Request Entity Incomplete",
            Conflict => "Conflict",
            PreconditionFailed => "Precondition Failed",
            RequestEntityTooLarge => "Request Entity Too Large",
            UnsupportedContentFormat => "Unsupported Content-Format",
            InternalServerError => "Internal Server Error",
            NotImplemented => "Not Implemented",
            BadGateway => "Bad Gateway",
            ServiceUnavailable => "Service Unavailable",
            GatewayTimeout => "Gateway Timeout",
            ProxyingNotSupported => "Proxying Not Supported",
        }
    }
}

impl fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (class, detail) = self.parts();
        write!(f, "{}.{:02}", class, detail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_dotted() {
        assert_eq!(ResponseCode::Content.to_string(), "2.05");
        assert_eq!(ResponseCode::UnsupportedContentFormat.to_string(), "4.15");
        assert_eq!(ResponseCode::ServiceUnavailable.to_string(), "5.03");
    }

    #[test]
    fn byte_encoding() {
        assert_eq!(ResponseCode::Content.to_byte(), 0x45);
        assert_eq!(ResponseCode::NotFound.to_byte(), 0x84);
        assert_eq!(ResponseCode::InternalServerError.to_byte(), 0xA0);
    }

    #[test]
    fn default_success_by_method() {
        assert_eq!(ResponseCode::default_for(Method::Get), ResponseCode::Content);
        assert_eq!(ResponseCode::default_for(Method::Put), ResponseCode::Changed);
        assert_eq!(ResponseCode::default_for(Method::Delete), ResponseCode::Deleted);
        assert!(ResponseCode::default_for(Method::Post).is_success());
    }
}
