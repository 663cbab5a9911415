use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::errors::ServiceError;

type HmacSha256 = Hmac<Sha256>;

const SIGNATURE_HEX_LEN: usize = 64;

/// Checks the signature a payment gateway attaches to a checkout callback:
/// hex HMAC-SHA256 of `"{orderRef}|{paymentRef}"` under the shared secret.
#[derive(Clone)]
pub struct PaymentVerifier {
    secret: Vec<u8>,
}

impl std::fmt::Debug for PaymentVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentVerifier").finish_non_exhaustive()
    }
}

impl PaymentVerifier {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    fn mac(&self, order_ref: &str, payment_ref: &str) -> Result<HmacSha256, ServiceError> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| ServiceError::Internal(format!("invalid HMAC key: {e}")))?;
        mac.update(order_ref.as_bytes());
        mac.update(b"|");
        mac.update(payment_ref.as_bytes());
        Ok(mac)
    }

    /// Lowercase hex signature for the pair.
    pub fn sign(&self, order_ref: &str, payment_ref: &str) -> Result<String, ServiceError> {
        Ok(hex::encode(
            self.mac(order_ref, payment_ref)?.finalize().into_bytes(),
        ))
    }

    /// `Ok(false)` for any signature that does not match, including ones that
    /// are not exactly 64 lowercase hex characters. The comparison is constant
    /// time.
    pub fn verify(
        &self,
        order_ref: &str,
        payment_ref: &str,
        signature: &str,
    ) -> Result<bool, ServiceError> {
        for (field, value) in [
            ("orderRef", order_ref),
            ("paymentRef", payment_ref),
            ("signature", signature),
        ] {
            if value.trim().is_empty() {
                return Err(ServiceError::validation(
                    field,
                    format!("Missing required field: {field}"),
                ));
            }
        }

        // hex::decode accepts either case; only the canonical form may verify.
        if signature.len() != SIGNATURE_HEX_LEN
            || !signature.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
        {
            return Ok(false);
        }
        let provided = match hex::decode(signature) {
            Ok(bytes) => bytes,
            Err(_) => return Ok(false),
        };
        Ok(self
            .mac(order_ref, payment_ref)?
            .verify_slice(&provided)
            .is_ok())
    }
}
