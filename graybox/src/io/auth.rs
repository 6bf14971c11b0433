//! Password gate consulted by the root prolog.

use anyhow::Result;
use sha2::{Digest, Sha224};

use crate::io::ui::UiChannel;

/// Compares the SHA-224 digest of an entered secret with a stored digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordGate {
    digest_hex: String,
}

impl PasswordGate {
    pub fn new(digest_hex: &str) -> Self {
        Self {
            digest_hex: digest_hex.trim().to_ascii_lowercase(),
        }
    }

    /// Hex digest for `secret`, the format stored in the config file.
    pub fn digest(secret: &str) -> String {
        hex::encode(Sha224::digest(secret.as_bytes()))
    }

    pub fn accepts(&self, secret: &str) -> bool {
        Self::digest(secret) == self.digest_hex
    }

    /// Prompt through `ui` and check the answer.
    pub fn check(&self, ui: &mut dyn UiChannel) -> Result<bool> {
        let secret = ui.prompt_secret("Enter password: ")?;
        Ok(self.accepts(&secret))
    }
}
