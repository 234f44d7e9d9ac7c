mod signatures;
mod tracking_numbers;

pub use signatures::{
    sign_base64,
    sign_hex,
    sign_stripe_payload,
    verify_base64_signature,
    verify_hex_signature,
    verify_stripe_signature,
    SignatureError,
    STRIPE_TIMESTAMP_TOLERANCE_SECS,
};
pub use tracking_numbers::{canonical_tracking_number, is_valid_tracking_number, normalize_carrier};
