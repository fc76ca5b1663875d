//! CAPTCHA solver interface
//!
//! Free-tier downloads are gated behind an image CAPTCHA. Solving is done
//! by an external service; this module only defines the challenge payload
//! handed to the solver and the normalization applied to solved text.

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::error::Result;

/// Everything a solver needs to answer one challenge
#[derive(Debug, Clone)]
pub struct CaptchaChallenge {
    /// Raw CAPTCHA image bytes
    pub image: Vec<u8>,
    /// User agent of the session the challenge was served to
    pub user_agent: String,
    /// Cookies of the session the challenge was served to
    pub cookies: BTreeMap<String, String>,
    /// Request the "invisible" challenge variant
    pub invisible: bool,
}

/// External CAPTCHA solving service client.
#[async_trait]
pub trait CaptchaSolver: Send + Sync {
    /// Solve the challenge and return the text, or fail.
    async fn solve(&self, challenge: CaptchaChallenge) -> Result<String>;
}

/// Normalize a solved CAPTCHA code.
///
/// The site never uses the digit zero in its codes; solvers routinely
/// confuse it with the letter O.
pub fn normalize_solution(text: &str) -> String {
    text.replace('0', "O").trim().to_string()
}
