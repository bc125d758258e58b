//! Authorization decisions and their Envoy wire form.
//!
//! [`Decision`] is what the core returns for every `Check` call. It is an
//! enum so a response can never carry both (or neither) of the allow and
//! deny outcomes; [`Decision::into_check_response`] builds the matching
//! `envoy.service.auth.v3.CheckResponse`.

use crate::proto::envoy::config::core::v3::{HeaderValue, HeaderValueOption};
use crate::proto::envoy::r#type::v3::{HttpStatus, StatusCode};
use crate::proto::envoy::service::auth::v3::{
    check_response::HttpResponse, CheckResponse, DeniedHttpResponse, OkHttpResponse,
};
use crate::proto::google::rpc::Status as RpcStatus;

/// Name of the header carrying bearer credentials.
pub const AUTHORIZATION_HEADER: &str = "authorization";

/// Deny body used for every credential failure.
pub const PERMISSION_DENIED_BODY: &str = "PERMISSION_DENIED";

/// Deny body used when the `authorization` header is absent or not a bearer token.
pub const INVALID_HEADER_BODY: &str = "Invalid or unsupported authorization header";

/// google.rpc.Code values used in `CheckResponse.status`.
const RPC_OK: i32 = 0;
const RPC_PERMISSION_DENIED: i32 = 7;

/// A header the proxy must set on the request before forwarding it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderMutation {
    pub name: String,
    pub value: String,
    /// `true` appends to an existing value, `false` overwrites it.
    pub append: bool,
}

impl HeaderMutation {
    /// A mutation that replaces any existing value of `name`.
    pub fn overwrite(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            append: false,
        }
    }

    fn into_proto(self) -> HeaderValueOption {
        HeaderValueOption {
            header: Some(HeaderValue {
                key: self.name,
                value: self.value,
                raw_value: Vec::new(),
            }),
            append: Some(self.append),
            ..Default::default()
        }
    }
}

/// Outcome of one `Check` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Forward the request after applying `headers`.
    Allow { headers: Vec<HeaderMutation> },
    /// Reject the request with `status` and `body`.
    Deny { status: u16, body: String },
}

impl Decision {
    /// Allow without touching the request.
    pub fn allow() -> Self {
        Decision::Allow { headers: Vec::new() }
    }

    /// Allow after setting `authorization: Bearer <token>`, overwriting any existing value.
    pub fn allow_with_bearer(token: &str) -> Self {
        Decision::Allow {
            headers: vec![HeaderMutation::overwrite(
                AUTHORIZATION_HEADER,
                format!("Bearer {token}"),
            )],
        }
    }

    /// Deny with HTTP 403 and the given body.
    pub fn forbidden(body: impl Into<String>) -> Self {
        Decision::Deny {
            status: 403,
            body: body.into(),
        }
    }

    /// Deny with the generic `PERMISSION_DENIED` body.
    pub fn permission_denied() -> Self {
        Self::forbidden(PERMISSION_DENIED_BODY)
    }

    pub fn is_allow(&self) -> bool {
        matches!(self, Decision::Allow { .. })
    }

    /// Label used in logs and metrics.
    pub fn outcome(&self) -> &'static str {
        match self {
            Decision::Allow { .. } => "allow",
            Decision::Deny { .. } => "deny",
        }
    }

    /// Builds the Envoy `CheckResponse` for this decision.
    pub fn into_check_response(self) -> CheckResponse {
        match self {
            Decision::Allow { headers } => CheckResponse {
                status: Some(RpcStatus {
                    code: RPC_OK,
                    message: String::new(),
                }),
                http_response: Some(HttpResponse::OkResponse(OkHttpResponse {
                    headers: headers.into_iter().map(HeaderMutation::into_proto).collect(),
                    ..Default::default()
                })),
            },
            Decision::Deny { status, body } => CheckResponse {
                status: Some(RpcStatus {
                    code: RPC_PERMISSION_DENIED,
                    message: String::new(),
                }),
                http_response: Some(HttpResponse::DeniedResponse(DeniedHttpResponse {
                    status: Some(HttpStatus {
                        code: http_status_code(status) as i32,
                    }),
                    headers: Vec::new(),
                    body,
                })),
            },
        }
    }
}

fn http_status_code(status: u16) -> StatusCode {
    match status {
        400 => StatusCode::BadRequest,
        401 => StatusCode::Unauthorized,
        429 => StatusCode::TooManyRequests,
        500 => StatusCode::InternalServerError,
        503 => StatusCode::ServiceUnavailable,
        _ => StatusCode::Forbidden,
    }
}
