use axum::http::HeaderMap;

use crate::{
    error::AppError,
    models::{PostId, UserId},
};

/// Set by the identity layer in front of us, trusted as is.
pub const USER_HEADER: &str = "x-user-id";

pub fn user_from_headers(headers: &HeaderMap) -> Result<UserId, AppError> {
    headers
        .get(USER_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<UserId>().ok())
        .filter(|&user_id| user_id > 0)
        .ok_or(AppError::MissingUser)
}

pub fn parse_ids(raw: &str) -> Result<Vec<PostId>, AppError> {
    raw.split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(|id| id.parse::<PostId>().map_err(|_| AppError::MalformedPayload))
        .collect()
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(USER_HEADER, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_user_header() {
        assert_eq!(user_from_headers(&headers("17")).unwrap(), 17);
        assert_eq!(user_from_headers(&headers(" 17 ")).unwrap(), 17);
    }

    #[test]
    fn test_bad_user_header() {
        assert!(matches!(user_from_headers(&HeaderMap::new()), Err(AppError::MissingUser)));
        assert!(matches!(user_from_headers(&headers("abc")), Err(AppError::MissingUser)));
        assert!(matches!(user_from_headers(&headers("0")), Err(AppError::MissingUser)));
    }

    #[test]
    fn test_parse_ids() {
        assert_eq!(parse_ids("1,2, 3").unwrap(), vec![1, 2, 3]);
        assert_eq!(parse_ids("4,,5,").unwrap(), vec![4, 5]);
        assert!(parse_ids("").unwrap().is_empty());
        assert!(matches!(parse_ids("1,x"), Err(AppError::MalformedPayload)));
    }
}
