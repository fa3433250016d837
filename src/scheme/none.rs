//! Pass-through scheme: every request authenticates as a fixed user.
//!
//! Used behind trusted front proxies that already authenticated the client.

use async_trait::async_trait;

use super::{Authenticator, Challenge};

pub struct NoneAuthenticator {
    user: String,
}

impl NoneAuthenticator {
    pub fn new(user: String) -> Self {
        Self { user }
    }
}

#[async_trait]
impl Authenticator for NoneAuthenticator {
    fn scheme_name(&self) -> &'static str {
        "None"
    }

    fn challenge(&self) -> Challenge {
        Challenge::Continue
    }

    async fn check(&mut self, _method: &str, _uri: &str, _credential: &str) -> Option<String> {
        Some(self.user.clone())
    }
}
