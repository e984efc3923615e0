//! Payment reference generation.

/// Generate an opaque, globally unique payment reference.
///
/// # Output
///
/// `vp_` followed by 32 hex characters (16 random bytes). The reference is
/// issued once at payment creation and acts as the idempotency key for
/// every later operation on that payment.
pub fn generate() -> String {
    let bytes: [u8; 16] = rand::random();
    format!("vp_{}", hex::encode(bytes))
}
