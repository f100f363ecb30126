//! The `x-request-id` header that every response (success or error)
//! carries (spec.md §4.6).

use axum::http::{HeaderValue, Response};

pub const REQUEST_ID_HEADER: &str = "x-request-id";

pub trait RequestIdExt {
    fn set_request_id_header(&mut self, value: HeaderValue);
}

impl<B> RequestIdExt for Response<B> {
    fn set_request_id_header(&mut self, value: HeaderValue) {
        self.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
}
