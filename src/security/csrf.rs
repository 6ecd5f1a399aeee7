use hmac::{Hmac, Mac};
use sha2::Sha256;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

/// Issues and checks anti-forgery tokens of the form
/// `<random>.<hex hmac-sha256(key, random)>`.
#[derive(Clone)]
pub struct CsrfService {
    key: String,
}

impl CsrfService {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }

    pub fn generate(&self) -> String {
        let random = Uuid::new_v4().simple().to_string();
        let signature = self.sign(&random);
        format!("{random}.{signature}")
    }

    pub fn verify(&self, token: &str) -> bool {
        let Some((random, signature)) = token.split_once('.') else {
            return false;
        };
        if random.is_empty() || signature.is_empty() {
            return false;
        }
        let Ok(signature_bytes) = hex::decode(signature) else {
            return false;
        };

        let mut mac = self.mac();
        mac.update(random.as_bytes());
        // Constant-time comparison.
        mac.verify_slice(&signature_bytes).is_ok()
    }

    fn sign(&self, random: &str) -> String {
        let mut mac = self.mac();
        mac.update(random.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    fn mac(&self) -> HmacSha256 {
        HmacSha256::new_from_slice(self.key.as_bytes()).expect("HMAC can take key of any size")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_tokens_always_validate() {
        let svc = CsrfService::new("test-secret");
        for _ in 0..100 {
            let token = svc.generate();
            assert!(svc.verify(&token), "token failed to validate: {token}");
        }
    }

    #[test]
    fn any_signature_mutation_fails() {
        let svc = CsrfService::new("test-secret");
        let token = svc.generate();
        let (random, signature) = token.split_once('.').unwrap();

        for i in 0..signature.len() {
            let mut chars: Vec<char> = signature.chars().collect();
            chars[i] = if chars[i] == '0' { '1' } else { '0' };
            let mutated: String = chars.into_iter().collect();
            assert!(
                !svc.verify(&format!("{random}.{mutated}")),
                "mutation at index {i} still validated"
            );
        }
    }

    #[test]
    fn different_key_rejects() {
        let a = CsrfService::new("key-a");
        let b = CsrfService::new("key-b");
        let token = a.generate();
        assert!(!b.verify(&token));
    }

    #[test]
    fn malformed_tokens_reject() {
        let svc = CsrfService::new("test-secret");
        assert!(!svc.verify(""));
        assert!(!svc.verify("no-separator"));
        assert!(!svc.verify(".abcdef"));
        assert!(!svc.verify("abcdef."));
        assert!(!svc.verify("abc.not-hex"));
    }
}
