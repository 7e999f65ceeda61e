use courtside::services::reconciler::{sign, verify_signature};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

const SECRET: &str = "test_secret_key";
const PAYLOAD: &str = r#"{"event":"payment.captured","payload":{"payment":{"entity":{"id":"pay_1","order_id":"order_1","amount":400}}}}"#;

#[test]
fn test_signature_matches_hmac_sha256_hex() {
    let mut mac = HmacSha256::new_from_slice(SECRET.as_bytes()).unwrap();
    mac.update(PAYLOAD.as_bytes());
    let expected = hex::encode(mac.finalize().into_bytes());

    let signature = sign(SECRET, PAYLOAD.as_bytes());
    assert_eq!(signature, expected);
    assert_eq!(signature.len(), 64); // SHA256 produces 32 bytes = 64 hex chars
    assert!(signature.chars().all(|c| c.is_ascii_hexdigit()));
}

#[test]
fn test_signature_verification() {
    let signature = sign(SECRET, PAYLOAD.as_bytes());
    assert!(verify_signature(SECRET, PAYLOAD.as_bytes(), &signature));
    // Gateways may send upper-case hex or trailing whitespace.
    assert!(verify_signature(
        SECRET,
        PAYLOAD.as_bytes(),
        &format!("{}\n", signature.to_uppercase())
    ));
}

#[test]
fn test_signature_mismatch() {
    let signature = sign(SECRET, PAYLOAD.as_bytes());
    let tampered = PAYLOAD.replace("400", "4");
    assert!(!verify_signature(SECRET, tampered.as_bytes(), &signature));
    assert!(!verify_signature("other_secret", PAYLOAD.as_bytes(), &signature));
}

#[test]
fn test_malformed_signature_is_rejected() {
    assert!(!verify_signature(SECRET, PAYLOAD.as_bytes(), ""));
    assert!(!verify_signature(SECRET, PAYLOAD.as_bytes(), "not-hex"));

    // Truncated digests never verify.
    let signature = sign(SECRET, PAYLOAD.as_bytes());
    assert!(!verify_signature(SECRET, PAYLOAD.as_bytes(), &signature[..32]));
}
