//! Shared request plumbing for the Azure REST clients.

use basm_core::ServiceError;

/// Request body variants the clients send.
pub(crate) enum Body<'a> {
    None,
    Json(&'a serde_json::Value),
    Bytes(&'a [u8]),
}

/// Send `request`, returning the response for every HTTP status.
///
/// Only transport failures become errors here; callers decide which
/// statuses are acceptable.
pub(crate) fn dispatch(
    method: &'static str,
    url: &str,
    request: ureq::Request,
    body: Body<'_>,
) -> Result<ureq::Response, ServiceError> {
    let result = match body {
        Body::None => request.call(),
        Body::Json(value) => request.send_json(value),
        Body::Bytes(bytes) => request.send_bytes(bytes),
    };
    match result {
        Ok(response) | Err(ureq::Error::Status(_, response)) => Ok(response),
        Err(ureq::Error::Transport(transport)) => Err(ServiceError::Transport {
            method,
            url: url.to_owned(),
            message: transport.to_string(),
        }),
    }
}

/// Turn a response with an unacceptable status into an error.
pub(crate) fn unexpected(method: &'static str, url: &str, response: ureq::Response) -> ServiceError {
    let status = response.status();
    ServiceError::Http {
        method,
        url: url.to_owned(),
        status,
        body: response.into_string().unwrap_or_default(),
    }
}

pub(crate) fn decode_json(url: &str, response: ureq::Response) -> Result<serde_json::Value, ServiceError> {
    response
        .into_json()
        .map_err(|e| ServiceError::InvalidResponse {
            url: url.to_owned(),
            message: e.to_string(),
        })
}

pub(crate) fn bearer(token: &str) -> String {
    format!("Bearer {token}")
}
