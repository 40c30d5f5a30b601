// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

use chunksign_core::time::{now, DateTime};
use chunksign_core::utils::Redact;
use chunksign_core::SigningCredential;
use std::fmt::{Debug, Formatter};

/// Credential that holds the access_key and secret_key.
#[derive(Default, Clone)]
pub struct Credential {
    /// Access key id for aws services.
    pub access_key_id: String,
    /// Secret access key for aws services.
    pub secret_access_key: String,
    /// Session token for aws services.
    pub session_token: Option<String>,
    /// Region this credential is bound to.
    ///
    /// Overrides the signer's region when set.
    pub credential_scope: Option<String>,
    /// Expiration time for this credential.
    pub expires_in: Option<DateTime>,
}

impl Credential {
    /// Create a credential from an access key pair.
    pub fn new(access_key_id: &str, secret_access_key: &str) -> Self {
        Self {
            access_key_id: access_key_id.to_string(),
            secret_access_key: secret_access_key.to_string(),
            ..Default::default()
        }
    }

    /// Set the session token.
    pub fn with_session_token(mut self, token: &str) -> Self {
        self.session_token = Some(token.to_string());
        self
    }

    /// Bind this credential to a region.
    pub fn with_credential_scope(mut self, region: &str) -> Self {
        self.credential_scope = Some(region.to_string());
        self
    }

    /// Return a copy with surrounding whitespace removed from every field.
    ///
    /// Empty optional fields collapse to `None`.
    pub fn trimmed(&self) -> Self {
        fn trim_opt(v: &Option<String>) -> Option<String> {
            v.as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        }

        Self {
            access_key_id: self.access_key_id.trim().to_string(),
            secret_access_key: self.secret_access_key.trim().to_string(),
            session_token: trim_opt(&self.session_token),
            credential_scope: trim_opt(&self.credential_scope),
            expires_in: self.expires_in,
        }
    }

    /// Anonymous credentials carry neither an access key nor a secret.
    ///
    /// Requests signed with them are sent untouched.
    pub fn is_anonymous(&self) -> bool {
        self.access_key_id.trim().is_empty() && self.secret_access_key.trim().is_empty()
    }
}

impl Debug for Credential {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("access_key_id", &Redact::from(&self.access_key_id))
            .field("secret_access_key", &Redact::from(&self.secret_access_key))
            .field("session_token", &Redact::from(&self.session_token))
            .field("credential_scope", &self.credential_scope)
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

impl SigningCredential for Credential {
    fn is_valid(&self) -> bool {
        if (self.access_key_id.is_empty() || self.secret_access_key.is_empty())
            && self.session_token.is_none()
        {
            return false;
        }
        // Take 120s as buffer to avoid edge cases.
        if let Some(valid) = self
            .expires_in
            .map(|v| v > now() + chrono::TimeDelta::minutes(2))
        {
            return valid;
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trimmed() {
        let cred = Credential {
            access_key_id: " AKIDEXAMPLE\n".to_string(),
            secret_access_key: "\tsecret ".to_string(),
            session_token: Some("   ".to_string()),
            credential_scope: Some(" us-west-2 ".to_string()),
            expires_in: None,
        }
        .trimmed();

        assert_eq!(cred.access_key_id, "AKIDEXAMPLE");
        assert_eq!(cred.secret_access_key, "secret");
        assert_eq!(cred.session_token, None);
        assert_eq!(cred.credential_scope.as_deref(), Some("us-west-2"));
    }

    #[test]
    fn test_anonymous() {
        assert!(Credential::default().is_anonymous());
        assert!(Credential::new("  ", "").is_anonymous());
        assert!(!Credential::new("ak", "").is_anonymous());
        assert!(Credential::new("ak", "sk").is_valid());
    }

    #[test]
    fn test_expired_credential_is_invalid() {
        let mut cred = Credential::new("ak", "sk");
        cred.expires_in = Some(now() + chrono::TimeDelta::seconds(30));
        assert!(!cred.is_valid());

        cred.expires_in = Some(now() + chrono::TimeDelta::hours(1));
        assert!(cred.is_valid());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let cred = Credential::new("AKIDEXAMPLE1234", "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY");
        let s = format!("{cred:?}");

        assert!(s.contains("AKI***234"));
        assert!(!s.contains("wJalrXUtnFEMI"));
    }
}
