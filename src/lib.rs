//! Envoy JWT auth helper
//!
//! External-authorization service for Envoy that works in one of two modes:
//! it either validates the JWT-SVID a caller presents, or mints a JWT-SVID
//! from the SPIFFE Workload API and injects it into an outbound request.

#![forbid(unsafe_code)]

pub mod auth;
pub mod config;
pub mod decision;
pub mod error;
pub mod grpc;
pub mod mode;
pub mod observability;
pub mod shutdown;
pub mod source;
pub mod spiffe;

// Include generated protobuf code
pub mod proto {
    pub mod envoy {
        pub mod config {
            pub mod core {
                pub mod v3 {
                    tonic::include_proto!("envoy.config.core.v3");
                }
            }
        }

        pub mod r#type {
            pub mod v3 {
                tonic::include_proto!("envoy.r#type.v3");
            }
        }

        // ext_authz server
        pub mod service {
            pub mod auth {
                pub mod v3 {
                    tonic::include_proto!("envoy.service.auth.v3");
                }
            }
        }
    }

    pub mod google {
        pub mod rpc {
            tonic::include_proto!("google.rpc");
        }
    }

    // SPIFFE Workload API client; the proto declares no package
    pub mod workload {
        tonic::include_proto!("_");
    }
}

pub use auth::{AuthServer, RequestHeaders};
pub use config::{Config, ConfigError};
pub use decision::{Decision, HeaderMutation};
pub use error::{AuthHelperError, ErrorCode};
pub use grpc::AuthorizationService;
pub use mode::Mode;
pub use source::{Identity, JwtSource, WorkloadApiSource};
