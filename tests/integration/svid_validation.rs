//! JWT-SVID verification against JWT bundles.

use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::json;

use jwt_auth_helper::error::AuthHelperError;
use jwt_auth_helper::source::svid::{validate_jwt_svid, CLOCK_LEEWAY_SECS};
use jwt_auth_helper::source::JwtSvid;

use crate::common::{bundle_set, svid_claims, TestAuthority, BACKEND_ID, FRONTEND_ID};

fn audiences() -> Vec<String> {
    vec![BACKEND_ID.to_string()]
}

#[test]
fn test_valid_svid_yields_identity() {
    let authority = TestAuthority::generate("key-1");
    let token = authority.svid(FRONTEND_ID, BACKEND_ID, 300);

    let identity = validate_jwt_svid(&token, &bundle_set(&[&authority]), &audiences()).unwrap();
    assert_eq!(identity.spiffe_id.to_string(), FRONTEND_ID);
    assert_eq!(identity.audience, vec![BACKEND_ID.to_string()]);
}

#[test]
fn test_single_string_audience_is_accepted() {
    let authority = TestAuthority::generate("key-1");
    let token = authority.sign(&svid_claims(FRONTEND_ID, json!(BACKEND_ID), 300));

    assert!(validate_jwt_svid(&token, &bundle_set(&[&authority]), &audiences()).is_ok());
}

#[test]
fn test_any_matching_audience_is_enough() {
    let authority = TestAuthority::generate("key-1");
    let token = authority.sign(&svid_claims(
        FRONTEND_ID,
        json!(["spiffe://example.org/other", BACKEND_ID]),
        300,
    ));

    assert!(validate_jwt_svid(&token, &bundle_set(&[&authority]), &audiences()).is_ok());
}

#[test]
fn test_audience_mismatch_is_rejected() {
    let authority = TestAuthority::generate("key-1");
    let token = authority.svid(FRONTEND_ID, "spiffe://example.org/other", 300);

    let err = validate_jwt_svid(&token, &bundle_set(&[&authority]), &audiences()).unwrap_err();
    assert!(matches!(err, AuthHelperError::AudienceMismatch { .. }), "{err}");
}

#[test]
fn test_expired_svid_is_rejected() {
    let authority = TestAuthority::generate("key-1");
    let token = authority.svid(FRONTEND_ID, BACKEND_ID, -(CLOCK_LEEWAY_SECS + 60));

    let err = validate_jwt_svid(&token, &bundle_set(&[&authority]), &audiences()).unwrap_err();
    assert!(matches!(err, AuthHelperError::TokenExpired { .. }), "{err}");
}

#[test]
fn test_expiry_within_leeway_is_tolerated() {
    let authority = TestAuthority::generate("key-1");
    let token = authority.svid(FRONTEND_ID, BACKEND_ID, -(CLOCK_LEEWAY_SECS / 2));

    assert!(validate_jwt_svid(&token, &bundle_set(&[&authority]), &audiences()).is_ok());
}

#[test]
fn test_not_yet_valid_svid_is_rejected() {
    let authority = TestAuthority::generate("key-1");
    let mut claims = svid_claims(FRONTEND_ID, json!([BACKEND_ID]), 3600);
    claims["nbf"] = json!(chrono::Utc::now().timestamp() + 600);
    let token = authority.sign(&claims);

    let err = validate_jwt_svid(&token, &bundle_set(&[&authority]), &audiences()).unwrap_err();
    assert!(matches!(err, AuthHelperError::TokenNotYetValid { .. }), "{err}");
}

#[test]
fn test_signature_from_other_key_is_rejected() {
    let trusted = TestAuthority::generate("key-1");
    let impostor = TestAuthority::generate("key-1");
    let token = impostor.svid(FRONTEND_ID, BACKEND_ID, 300);

    let err = validate_jwt_svid(&token, &bundle_set(&[&trusted]), &audiences()).unwrap_err();
    assert!(matches!(err, AuthHelperError::TokenInvalidSignature), "{err}");
}

#[test]
fn test_unknown_key_id_is_rejected() {
    let authority = TestAuthority::generate("key-1");
    let token = authority.sign_as("key-2", &svid_claims(FRONTEND_ID, json!([BACKEND_ID]), 300));

    let err = validate_jwt_svid(&token, &bundle_set(&[&authority]), &audiences()).unwrap_err();
    assert!(
        matches!(&err, AuthHelperError::KeyNotFound { kid, .. } if kid == "key-2"),
        "{err}"
    );
}

#[test]
fn test_untrusted_trust_domain_is_rejected() {
    let authority = TestAuthority::generate("key-1");
    let token = authority.svid("spiffe://other.org/frontend", BACKEND_ID, 300);

    let err = validate_jwt_svid(&token, &bundle_set(&[&authority]), &audiences()).unwrap_err();
    assert!(matches!(err, AuthHelperError::BundleUnavailable { .. }), "{err}");
}

#[test]
fn test_non_spiffe_subject_is_rejected() {
    let authority = TestAuthority::generate("key-1");
    let token = authority.svid("user@example.org", BACKEND_ID, 300);

    let err = validate_jwt_svid(&token, &bundle_set(&[&authority]), &audiences()).unwrap_err();
    assert!(matches!(err, AuthHelperError::InvalidSubject(_)), "{err}");
}

#[test]
fn test_hmac_token_is_rejected() {
    let authority = TestAuthority::generate("key-1");
    let mut header = Header::new(Algorithm::HS256);
    header.kid = Some("key-1".to_string());
    let token = encode(
        &header,
        &svid_claims(FRONTEND_ID, json!([BACKEND_ID]), 300),
        &EncodingKey::from_secret(b"shared-secret"),
    )
    .unwrap();

    let err = validate_jwt_svid(&token, &bundle_set(&[&authority]), &audiences()).unwrap_err();
    assert!(matches!(err, AuthHelperError::UnsupportedAlgorithm { .. }), "{err}");
}

#[test]
fn test_tampered_payload_is_rejected() {
    let authority = TestAuthority::generate("key-1");
    let genuine = authority.svid(FRONTEND_ID, BACKEND_ID, 300);
    let forged = authority.svid("spiffe://example.org/admin", BACKEND_ID, 300);

    let genuine: Vec<&str> = genuine.split('.').collect();
    let forged: Vec<&str> = forged.split('.').collect();
    let spliced = format!("{}.{}.{}", genuine[0], forged[1], genuine[2]);

    let err = validate_jwt_svid(&spliced, &bundle_set(&[&authority]), &audiences()).unwrap_err();
    assert!(matches!(err, AuthHelperError::TokenInvalidSignature), "{err}");
}

#[test]
fn test_garbage_is_malformed() {
    let authority = TestAuthority::generate("key-1");
    for token in ["", "not-a-jwt", "a.b", "a.b.c.d"] {
        let err = validate_jwt_svid(token, &bundle_set(&[&authority]), &audiences()).unwrap_err();
        assert_eq!(err.code().as_str(), "TOKEN_MALFORMED", "{token:?}: {err}");
    }
}

#[test]
fn test_type_state_progression() {
    let authority = TestAuthority::generate("key-1");
    let token = authority.svid(FRONTEND_ID, BACKEND_ID, 300);

    let unverified = JwtSvid::parse(&token).unwrap();
    assert_eq!(unverified.state_name(), "Unverified");
    assert_eq!(unverified.kid(), "key-1");

    let verified = unverified.verify_signature(&bundle_set(&[&authority])).unwrap();
    assert_eq!(verified.state_name(), "SignatureVerified");

    let validated = verified.validate_claims(&audiences()).unwrap();
    assert_eq!(validated.state_name(), "Validated");
    assert_eq!(validated.raw(), token);
    assert_eq!(validated.spiffe_id().to_string(), FRONTEND_ID);
}
