//! Wire-level response codes.

/// The subset of HTTP response codes the CRUD pipelines map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseCode {
    /// 200
    Ok,
    /// 201
    Created,
    /// 202
    Accepted,
    /// 400
    Bad,
    /// 404
    NotFound,
    /// 409
    Conflict,
    /// 412
    PreconditionFailed,
    /// 500
    ServerError,
    /// 501
    NotImplemented,
}

impl ResponseCode {
    /// The numeric status code.
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        match self {
            Self::Ok => 200,
            Self::Created => 201,
            Self::Accepted => 202,
            Self::Bad => 400,
            Self::NotFound => 404,
            Self::Conflict => 409,
            Self::PreconditionFailed => 412,
            Self::ServerError => 500,
            Self::NotImplemented => 501,
        }
    }

    /// Map a numeric status code; codes outside the handled subset collapse
    /// to their class (2xx → `Ok`, everything else → `ServerError`).
    #[must_use]
    pub const fn from_u16(code: u16) -> Self {
        match code {
            200 => Self::Ok,
            201 => Self::Created,
            202 => Self::Accepted,
            400 => Self::Bad,
            404 => Self::NotFound,
            409 => Self::Conflict,
            412 => Self::PreconditionFailed,
            501 => Self::NotImplemented,
            c if c >= 200 && c < 300 => Self::Ok,
            _ => Self::ServerError,
        }
    }

    /// Returns `true` for the 2xx codes.
    #[must_use]
    pub const fn is_success(self) -> bool {
        self.as_u16() < 300
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        for code in [
            ResponseCode::Ok,
            ResponseCode::Created,
            ResponseCode::Accepted,
            ResponseCode::Bad,
            ResponseCode::NotFound,
            ResponseCode::Conflict,
            ResponseCode::PreconditionFailed,
            ResponseCode::ServerError,
            ResponseCode::NotImplemented,
        ] {
            assert_eq!(ResponseCode::from_u16(code.as_u16()), code);
        }
    }

    #[test]
    fn test_unknown_codes_collapse_to_class() {
        assert_eq!(ResponseCode::from_u16(204), ResponseCode::Ok);
        assert_eq!(ResponseCode::from_u16(503), ResponseCode::ServerError);
        assert_eq!(ResponseCode::from_u16(418), ResponseCode::ServerError);
    }
}
