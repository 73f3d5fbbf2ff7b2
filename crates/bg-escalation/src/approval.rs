//! Signed approval claims.
//!
//! A request for a transition is turned into an RS256-signed JWT that is
//! handed to approvers out of band. Only the signed payload is trusted when
//! it comes back. Tokens signed with any other algorithm are rejected before
//! the signature is looked at, whatever key they claim to use.

use std::sync::Arc;

use bg_core::config::ApprovalConfig;
use bg_core::Clock;
use bg_model::{Requestor, Transition};
use chrono::Duration;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, decode_header, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{EscalationError, EscalationResult};

/// Claims carried by an approval token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalClaims {
    /// Requesting user.
    #[serde(rename = "sub")]
    pub subject: Uuid,
    /// Issued at (Unix seconds).
    pub iat: i64,
    /// Not before (Unix seconds).
    pub nbf: i64,
    /// Expiry (Unix seconds).
    pub exp: i64,
    /// Issuer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    /// Token id.
    pub jti: Uuid,
    /// Requested transition.
    pub transition: Transition,
    /// Who asked.
    pub requestor: Requestor,
}

/// Issues and verifies approval tokens.
pub struct ApprovalTokenProtocol {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    request_window_secs: i64,
    issuer: Option<String>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for ApprovalTokenProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApprovalTokenProtocol")
            .field("algorithm", &Self::ALGORITHM)
            .field("encoding_key", &"[REDACTED]")
            .field("request_window_secs", &self.request_window_secs)
            .field("issuer", &self.issuer)
            .finish_non_exhaustive()
    }
}

impl ApprovalTokenProtocol {
    /// The only accepted signing algorithm.
    pub const ALGORITHM: Algorithm = Algorithm::RS256;

    /// Default lifetime of a request token in seconds.
    pub const DEFAULT_REQUEST_WINDOW_SECS: i64 = 3600;

    /// Creates a protocol from PEM encoded RSA keys.
    ///
    /// # Errors
    ///
    /// Returns [`EscalationError::InvalidKey`] if either key fails to parse.
    pub fn from_pem(
        private_key_pem: &[u8],
        public_key_pem: &[u8],
        clock: Arc<dyn Clock>,
    ) -> EscalationResult<Self> {
        let encoding_key = EncodingKey::from_rsa_pem(private_key_pem)
            .map_err(|e| EscalationError::InvalidKey(format!("private key: {e}")))?;
        let decoding_key = DecodingKey::from_rsa_pem(public_key_pem)
            .map_err(|e| EscalationError::InvalidKey(format!("public key: {e}")))?;

        Ok(Self {
            encoding_key,
            decoding_key,
            request_window_secs: Self::DEFAULT_REQUEST_WINDOW_SECS,
            issuer: None,
            clock,
        })
    }

    /// Creates a protocol from the approval configuration section.
    ///
    /// # Errors
    ///
    /// Returns [`EscalationError::InvalidKey`] if either key fails to parse.
    pub fn from_config(config: &ApprovalConfig, clock: Arc<dyn Clock>) -> EscalationResult<Self> {
        let protocol = Self::from_pem(
            config.private_key.as_bytes(),
            config.public_key.as_bytes(),
            clock,
        )?
        .with_request_window(config.request_window_secs);

        Ok(match &config.issuer {
            Some(issuer) => protocol.with_issuer(issuer.clone()),
            None => protocol,
        })
    }

    /// Sets how long issued tokens stay redeemable.
    #[must_use]
    pub fn with_request_window(mut self, secs: i64) -> Self {
        self.request_window_secs = secs;
        self
    }

    /// Stamps and requires an issuer.
    #[must_use]
    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    /// Signs a claim binding `transition` to the requesting user.
    ///
    /// # Errors
    ///
    /// Returns [`EscalationError::InvalidDuration`] if the request window
    /// does not yield a representable expiry and
    /// [`EscalationError::TokenSigning`] if signing fails.
    pub fn issue(
        &self,
        transition: &Transition,
        subject: Uuid,
        requestor: Requestor,
    ) -> EscalationResult<String> {
        let now = self.clock.now();
        let exp = Duration::try_seconds(self.request_window_secs)
            .and_then(|d| now.checked_add_signed(d))
            .ok_or(EscalationError::InvalidDuration(self.request_window_secs))?;
        let claims = ApprovalClaims {
            subject,
            iat: now.timestamp(),
            nbf: now.timestamp(),
            exp: exp.timestamp(),
            iss: self.issuer.clone(),
            jti: Uuid::now_v7(),
            transition: transition.clone(),
            requestor,
        };

        let mut header = Header::new(Self::ALGORITHM);
        header.typ = Some("JWT".to_string());

        encode(&header, &claims, &self.encoding_key)
            .map_err(|e| EscalationError::TokenSigning(e.to_string()))
    }

    /// Verifies a token and returns its claims.
    ///
    /// The validity window is checked against `nbf` and `exp` using the
    /// injected clock, with no leeway.
    ///
    /// # Errors
    ///
    /// Returns [`EscalationError::InvalidSignature`] for a wrong algorithm,
    /// signature, issuer or shape, [`EscalationError::NotYetValid`] before
    /// `nbf` and [`EscalationError::Expired`] from `exp` on.
    pub fn verify(&self, token: &str) -> EscalationResult<ApprovalClaims> {
        let header =
            decode_header(token).map_err(|e| EscalationError::InvalidSignature(e.to_string()))?;
        if header.alg != Self::ALGORITHM {
            return Err(EscalationError::InvalidSignature(format!(
                "unexpected signing algorithm {:?}",
                header.alg
            )));
        }

        let mut validation = Validation::new(Self::ALGORITHM);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.set_required_spec_claims(&["exp", "nbf", "sub"]);
        if let Some(issuer) = &self.issuer {
            validation.set_issuer(&[issuer.as_str()]);
        }

        let claims = decode::<ApprovalClaims>(token, &self.decoding_key, &validation)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidIssuer => {
                    EscalationError::InvalidSignature("issuer mismatch".to_string())
                }
                _ => EscalationError::InvalidSignature(e.to_string()),
            })?
            .claims;

        let now = self.clock.unix_now();
        if now < claims.nbf {
            return Err(EscalationError::NotYetValid);
        }
        if now >= claims.exp {
            return Err(EscalationError::Expired);
        }

        Ok(claims)
    }
}

/// Decides whether an approver may sign off a claim.
///
/// The requester can only approve their own request when the transition
/// allows self-approval. Beyond that the approver must hold one of the
/// transition's approval groups.
#[must_use]
pub fn is_allowed_approver<S: AsRef<str>>(
    approver_id: Uuid,
    approver_groups: &[S],
    claims: &ApprovalClaims,
) -> bool {
    if approver_id == claims.subject && !claims.transition.self_approval {
        return false;
    }
    claims
        .transition
        .is_approval_group_any(approver_groups.iter().map(AsRef::as_ref))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bg_core::ManualClock;

    const PRIVATE_KEY: &[u8] = include_bytes!("../testdata/approval_key.pem");
    const PUBLIC_KEY: &[u8] = include_bytes!("../testdata/approval_key.pub.pem");
    const OTHER_PRIVATE_KEY: &[u8] = include_bytes!("../testdata/other_key.pem");

    const START: i64 = 1_700_000_000;

    fn protocol(clock: Arc<ManualClock>) -> ApprovalTokenProtocol {
        ApprovalTokenProtocol::from_pem(PRIVATE_KEY, PUBLIC_KEY, clock).unwrap()
    }

    fn transition(self_approval: bool) -> Transition {
        Transition::new("team-poweruser", "team-debug", 7200)
            .with_approval_group("team-appowner")
            .with_self_approval(self_approval)
    }

    fn requestor() -> Requestor {
        Requestor {
            name: "Alice".to_string(),
            email: "alice@example.com".to_string(),
        }
    }

    fn claims(subject: Uuid, self_approval: bool) -> ApprovalClaims {
        ApprovalClaims {
            subject,
            iat: START,
            nbf: START,
            exp: START + 3600,
            iss: None,
            jti: Uuid::now_v7(),
            transition: transition(self_approval),
            requestor: requestor(),
        }
    }

    #[test]
    fn issue_then_verify() {
        let clock = Arc::new(ManualClock::at_unix(START));
        let protocol = protocol(clock);
        let alice = Uuid::now_v7();

        let token = protocol.issue(&transition(true), alice, requestor()).unwrap();
        let claims = protocol.verify(&token).unwrap();

        assert_eq!(claims.subject, alice);
        assert_eq!(claims.nbf, START);
        assert_eq!(claims.exp, START + 3600);
        assert_eq!(claims.transition, transition(true));
        assert_eq!(claims.requestor, requestor());
    }

    #[test]
    fn window_boundaries() {
        let clock = Arc::new(ManualClock::at_unix(START));
        let protocol = protocol(clock.clone()).with_request_window(600);
        let token = protocol
            .issue(&transition(true), Uuid::now_v7(), requestor())
            .unwrap();

        clock.advance_secs(-1);
        assert!(matches!(protocol.verify(&token), Err(EscalationError::NotYetValid)));

        clock.advance_secs(600);
        assert!(protocol.verify(&token).is_ok());

        clock.advance_secs(1);
        assert!(matches!(protocol.verify(&token), Err(EscalationError::Expired)));
    }

    #[test]
    fn window_ignores_transition_duration() {
        let clock = Arc::new(ManualClock::at_unix(START));
        let protocol = protocol(clock.clone()).with_request_window(60);
        let token = protocol
            .issue(&transition(true), Uuid::now_v7(), requestor())
            .unwrap();

        // the transition grants 7200s but the token only lives 60s
        clock.advance_secs(120);
        assert!(matches!(protocol.verify(&token), Err(EscalationError::Expired)));
    }

    #[test]
    fn oversized_window_is_an_error() {
        let clock = Arc::new(ManualClock::at_unix(START));
        let protocol = protocol(clock).with_request_window(i64::MAX);

        let err = protocol
            .issue(&transition(true), Uuid::now_v7(), requestor())
            .unwrap_err();

        assert!(matches!(err, EscalationError::InvalidDuration(i64::MAX)));
    }

    #[test]
    fn other_key_is_rejected() {
        let clock = Arc::new(ManualClock::at_unix(START));
        let forger = ApprovalTokenProtocol::from_pem(
            OTHER_PRIVATE_KEY,
            include_bytes!("../testdata/other_key.pub.pem"),
            clock.clone(),
        )
        .unwrap();
        let token = forger
            .issue(&transition(true), Uuid::now_v7(), requestor())
            .unwrap();

        let err = protocol(clock).verify(&token).unwrap_err();
        assert!(matches!(err, EscalationError::InvalidSignature(_)));
    }

    #[test]
    fn hmac_keyed_with_public_key_is_rejected() {
        let clock = Arc::new(ManualClock::at_unix(START));
        let claims = claims(Uuid::now_v7(), true);
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(PUBLIC_KEY),
        )
        .unwrap();

        let err = protocol(clock).verify(&token).unwrap_err();
        assert!(matches!(err, EscalationError::InvalidSignature(_)));
    }

    #[test]
    fn other_rsa_algorithm_with_same_key_is_rejected() {
        let clock = Arc::new(ManualClock::at_unix(START));
        let claims = claims(Uuid::now_v7(), true);
        let token = encode(
            &Header::new(Algorithm::RS512),
            &claims,
            &EncodingKey::from_rsa_pem(PRIVATE_KEY).unwrap(),
        )
        .unwrap();

        let err = protocol(clock).verify(&token).unwrap_err();
        assert!(matches!(err, EscalationError::InvalidSignature(msg) if msg.contains("RS512")));
    }

    #[test]
    fn unsigned_token_is_rejected() {
        let clock = Arc::new(ManualClock::at_unix(START));
        // {"alg":"none","typ":"JWT"} . {}
        let token = "eyJhbGciOiJub25lIiwidHlwIjoiSldUIn0.e30.";

        let err = protocol(clock).verify(token).unwrap_err();
        assert!(matches!(err, EscalationError::InvalidSignature(_)));
    }

    #[test]
    fn issuer_is_enforced() {
        let clock = Arc::new(ManualClock::at_unix(START));
        let plain = protocol(clock.clone());
        let strict = protocol(clock).with_issuer("breakglass");

        let token = plain
            .issue(&transition(true), Uuid::now_v7(), requestor())
            .unwrap();
        assert!(matches!(strict.verify(&token), Err(EscalationError::InvalidSignature(_))));

        let token = strict
            .issue(&transition(true), Uuid::now_v7(), requestor())
            .unwrap();
        assert_eq!(strict.verify(&token).unwrap().iss.as_deref(), Some("breakglass"));
    }

    #[test]
    fn requester_cannot_self_approve_without_flag() {
        let alice = Uuid::now_v7();
        let claims = claims(alice, false);

        for groups in [vec![], vec!["team-appowner"], vec!["team-appowner", "ops"]] {
            assert!(!is_allowed_approver(alice, &groups, &claims));
        }
    }

    #[test]
    fn approver_needs_approval_group() {
        let alice = Uuid::now_v7();
        let bob = Uuid::now_v7();

        for self_approval in [false, true] {
            let claims = claims(alice, self_approval);
            assert!(is_allowed_approver(bob, &["team-appowner"], &claims));
            assert!(is_allowed_approver(bob, &["other", "team-appowner"], &claims));
            assert!(!is_allowed_approver(bob, &["other-group"], &claims));
            assert!(!is_allowed_approver::<&str>(bob, &[], &claims));
        }
    }

    #[test]
    fn self_approval_still_needs_approval_group() {
        let alice = Uuid::now_v7();
        let claims = claims(alice, true);

        assert!(is_allowed_approver(alice, &["team-appowner"], &claims));
        assert!(!is_allowed_approver(alice, &["team-poweruser"], &claims));
    }

    #[test]
    fn config_keys_are_loaded() {
        let config = ApprovalConfig {
            private_key: String::from_utf8(PRIVATE_KEY.to_vec()).unwrap(),
            public_key: String::from_utf8(PUBLIC_KEY.to_vec()).unwrap(),
            request_window_secs: 120,
            issuer: Some("breakglass".to_string()),
        };
        let protocol =
            ApprovalTokenProtocol::from_config(&config, Arc::new(ManualClock::at_unix(START)))
                .unwrap();

        let token = protocol
            .issue(&transition(true), Uuid::now_v7(), requestor())
            .unwrap();
        let claims = protocol.verify(&token).unwrap();
        assert_eq!(claims.exp, START + 120);
    }

    #[test]
    fn garbage_keys_are_rejected() {
        let err = ApprovalTokenProtocol::from_pem(
            b"not a key",
            PUBLIC_KEY,
            Arc::new(ManualClock::at_unix(START)),
        )
        .unwrap_err();
        assert!(matches!(err, EscalationError::InvalidKey(_)));
    }
}
