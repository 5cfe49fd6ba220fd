//! Outstanding challenges and verification grants.
//!
//! A challenge moves through `None → Issued → Verified → None`: it is issued
//! on a gate miss, cleared on a correct answer (which opens a verified window
//! for the identity), or dropped lazily once it expires.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::config::validation::bounded;
use crate::error::{EdgeError, Result};
use crate::shield::identity::ClientIdentity;

/// Cookie carrying the token of a cookie-echo challenge.
pub const CHALLENGE_COOKIE: &str = "edge_shield_token";

/// The three challenge presentations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChallengeKind {
    Puzzle,
    ScriptedProof,
    CookieEcho,
}

impl ChallengeKind {
    pub const ALL: [ChallengeKind; 3] = [
        ChallengeKind::Puzzle,
        ChallengeKind::ScriptedProof,
        ChallengeKind::CookieEcho,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChallengeKind::Puzzle => "puzzle",
            ChallengeKind::ScriptedProof => "scripted-proof",
            ChallengeKind::CookieEcho => "cookie-echo",
        }
    }
}

/// Public half of a challenge, safe to hand to a renderer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ChallengePrompt {
    /// Solve `question` and submit the integer result.
    Puzzle { question: String },
    /// Submit the lowercase hex SHA-256 digest of `nonce`.
    ScriptedProof { nonce: String },
    /// Send the token back, normally through the named cookie.
    CookieEcho { cookie: String },
}

impl ChallengePrompt {
    pub fn kind(&self) -> ChallengeKind {
        match self {
            ChallengePrompt::Puzzle { .. } => ChallengeKind::Puzzle,
            ChallengePrompt::ScriptedProof { .. } => ChallengeKind::ScriptedProof,
            ChallengePrompt::CookieEcho { .. } => ChallengeKind::CookieEcho,
        }
    }
}

/// What the gate returns on a challenge decision. Never contains the expected answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeDescriptor {
    pub token: String,
    pub expires_in_secs: u64,
    #[serde(flatten)]
    pub prompt: ChallengePrompt,
}

impl ChallengeDescriptor {
    pub fn kind(&self) -> ChallengeKind {
        self.prompt.kind()
    }
}

#[derive(Debug, Clone)]
enum ChallengeVariant {
    Puzzle { question: String, answer: String },
    ScriptedProof { nonce: String, expected: String },
    CookieEcho,
}

impl ChallengeVariant {
    fn generate<R: Rng>(kind: ChallengeKind, rng: &mut R) -> Self {
        match kind {
            ChallengeKind::Puzzle => {
                let a: i64 = rng.gen_range(1..=10);
                let b: i64 = rng.gen_range(1..=10);
                let (op, result) = match rng.gen_range(0..3) {
                    0 => ('+', a + b),
                    1 => ('-', a - b),
                    _ => ('*', a * b),
                };
                ChallengeVariant::Puzzle {
                    question: format!("{} {} {} = ?", a, op, b),
                    answer: result.to_string(),
                }
            }
            ChallengeKind::ScriptedProof => {
                let nonce = hex::encode(rng.gen::<[u8; 16]>());
                let expected = hex::encode(Sha256::digest(nonce.as_bytes()));
                ChallengeVariant::ScriptedProof { nonce, expected }
            }
            ChallengeKind::CookieEcho => ChallengeVariant::CookieEcho,
        }
    }

    fn kind(&self) -> ChallengeKind {
        match self {
            ChallengeVariant::Puzzle { .. } => ChallengeKind::Puzzle,
            ChallengeVariant::ScriptedProof { .. } => ChallengeKind::ScriptedProof,
            ChallengeVariant::CookieEcho => ChallengeKind::CookieEcho,
        }
    }

    fn prompt(&self) -> ChallengePrompt {
        match self {
            ChallengeVariant::Puzzle { question, .. } => ChallengePrompt::Puzzle {
                question: question.clone(),
            },
            ChallengeVariant::ScriptedProof { nonce, .. } => ChallengePrompt::ScriptedProof {
                nonce: nonce.clone(),
            },
            ChallengeVariant::CookieEcho => ChallengePrompt::CookieEcho {
                cookie: CHALLENGE_COOKIE.to_string(),
            },
        }
    }

    /// `token` has already been matched against the stored one, so a
    /// cookie-echo challenge needs no separate answer.
    fn accepts(&self, token: &str, answer: Option<&str>) -> bool {
        let answer = answer.map(str::trim);
        match (self, answer) {
            (ChallengeVariant::CookieEcho, None) => true,
            (ChallengeVariant::CookieEcho, Some(answer)) => tokens_match(answer, token),
            (_, None) => false,
            (ChallengeVariant::Puzzle { answer: expected, .. }, Some(answer)) => answer == expected,
            (ChallengeVariant::ScriptedProof { expected, .. }, Some(answer)) => answer.eq_ignore_ascii_case(expected),
        }
    }
}

fn tokens_match(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// A stored challenge, including its expected answer.
#[derive(Debug, Clone)]
pub struct Challenge {
    variant: ChallengeVariant,
    token: String,
    expires_at: Instant,
}

impl Challenge {
    pub fn kind(&self) -> ChallengeKind {
        self.variant.kind()
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn expires_at(&self) -> Instant {
        self.expires_at
    }

    pub fn is_live_at(&self, now: Instant) -> bool {
        now < self.expires_at
    }

    /// Renderer-safe view of this challenge.
    pub fn descriptor(&self, now: Instant) -> ChallengeDescriptor {
        ChallengeDescriptor {
            token: self.token.clone(),
            expires_in_secs: self.expires_at.saturating_duration_since(now).as_secs(),
            prompt: self.variant.prompt(),
        }
    }

    #[cfg(test)]
    pub(crate) fn solution(&self) -> String {
        match &self.variant {
            ChallengeVariant::Puzzle { answer, .. } => answer.clone(),
            ChallengeVariant::ScriptedProof { expected, .. } => expected.clone(),
            ChallengeVariant::CookieEcho => self.token.clone(),
        }
    }
}

#[derive(Debug, Default)]
struct StoreInner {
    challenges: HashMap<ClientIdentity, Challenge>,
    verified_until: HashMap<ClientIdentity, Instant>,
}

/// Per-identity outstanding challenges plus verified-window grants.
#[derive(Debug)]
pub struct ChallengeStore {
    inner: Mutex<StoreInner>,
    challenge_ttl: Duration,
    verified_window: Duration,
}

impl ChallengeStore {
    pub fn new(challenge_ttl: Duration, verified_window: Duration) -> Self {
        Self {
            inner: Mutex::new(StoreInner::default()),
            challenge_ttl,
            verified_window,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, StoreInner>> {
        self.inner
            .lock()
            .map_err(|_| EdgeError::Internal("challenge store lock poisoned".into()))
    }

    /// Issue a challenge of a uniformly random kind, replacing any previous one.
    pub fn issue(&self, identity: &ClientIdentity) -> Result<Challenge> {
        self.issue_at(identity, Instant::now())
    }

    pub fn issue_at(&self, identity: &ClientIdentity, now: Instant) -> Result<Challenge> {
        let kind = *ChallengeKind::ALL
            .choose(&mut rand::thread_rng())
            .unwrap_or(&ChallengeKind::Puzzle);
        self.issue_kind_at(identity, kind, now)
    }

    pub fn issue_kind_at(&self, identity: &ClientIdentity, kind: ChallengeKind, now: Instant) -> Result<Challenge> {
        let mut rng = rand::thread_rng();
        let challenge = Challenge {
            variant: ChallengeVariant::generate(kind, &mut rng),
            token: hex::encode(rng.gen::<[u8; 32]>()),
            expires_at: now + bounded(self.challenge_ttl),
        };

        let mut inner = self.lock()?;
        if inner.challenges.insert(identity.clone(), challenge.clone()).is_some() {
            tracing::debug!(client = %identity, "Replaced outstanding challenge");
        }
        Ok(challenge)
    }

    /// Verify an answer. See [`ChallengeStore::try_verify_at`].
    pub fn verify(&self, identity: &ClientIdentity, token: &str, answer: Option<&str>) -> bool {
        self.verify_at(identity, token, answer, Instant::now())
    }

    pub fn verify_at(&self, identity: &ClientIdentity, token: &str, answer: Option<&str>, now: Instant) -> bool {
        match self.try_verify_at(identity, token, answer, now) {
            Ok(()) => true,
            Err(EdgeError::ChallengeInvalidOrExpired) => false,
            Err(e) => {
                tracing::error!(client = %identity, error = %e, "Challenge verification failed");
                false
            }
        }
    }

    /// Check an answer against the identity's outstanding challenge.
    ///
    /// Fails when there is no challenge, the token differs, the challenge has
    /// expired (`now >= expires_at`), or the variant rejects the answer. On
    /// success the challenge is cleared and a verified window opens.
    pub fn try_verify_at(
        &self,
        identity: &ClientIdentity,
        token: &str,
        answer: Option<&str>,
        now: Instant,
    ) -> Result<()> {
        let mut inner = self.lock()?;

        let challenge = inner
            .challenges
            .get(identity)
            .ok_or(EdgeError::ChallengeInvalidOrExpired)?;

        if !tokens_match(&challenge.token, token) {
            return Err(EdgeError::ChallengeInvalidOrExpired);
        }
        if !challenge.is_live_at(now) {
            inner.challenges.remove(identity);
            return Err(EdgeError::ChallengeInvalidOrExpired);
        }
        if !challenge.variant.accepts(token, answer) {
            return Err(EdgeError::ChallengeInvalidOrExpired);
        }

        let kind = challenge.kind();
        inner.challenges.remove(identity);
        inner
            .verified_until
            .insert(identity.clone(), now + bounded(self.verified_window));
        tracing::info!(client = %identity, kind = kind.as_str(), "Challenge passed");
        Ok(())
    }

    /// Kind of the identity's live challenge, dropping it if it has expired.
    pub fn live_kind_at(&self, identity: &ClientIdentity, now: Instant) -> Result<Option<ChallengeKind>> {
        let mut inner = self.lock()?;
        let state = inner.challenges.get(identity).map(|c| (c.is_live_at(now), c.kind()));
        match state {
            Some((true, kind)) => Ok(Some(kind)),
            Some((false, _)) => {
                inner.challenges.remove(identity);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    /// True while the identity holds an unexpired verified-window grant.
    pub fn is_verified_at(&self, identity: &ClientIdentity, now: Instant) -> Result<bool> {
        let mut inner = self.lock()?;
        match inner.verified_until.get(identity).copied() {
            Some(until) if now < until => Ok(true),
            Some(_) => {
                inner.verified_until.remove(identity);
                Ok(false)
            }
            None => Ok(false),
        }
    }

    /// Drop expired challenges and grants. Returns `(challenges, grants)` removed.
    pub fn cleanup_at(&self, now: Instant) -> Result<(usize, usize)> {
        let mut inner = self.lock()?;
        let challenges_before = inner.challenges.len();
        let grants_before = inner.verified_until.len();
        inner.challenges.retain(|_, c| c.is_live_at(now));
        inner.verified_until.retain(|_, until| now < *until);
        Ok((
            challenges_before - inner.challenges.len(),
            grants_before - inner.verified_until.len(),
        ))
    }

    #[cfg(test)]
    pub(crate) fn poison(&self) {
        std::thread::scope(|s| {
            let _ = s
                .spawn(|| {
                    let _guard = self.inner.lock();
                    panic!("poisoning challenge store");
                })
                .join();
        });
    }

    /// Number of outstanding challenges and grants.
    pub fn counts(&self) -> Result<(usize, usize)> {
        let inner = self.lock()?;
        Ok((inner.challenges.len(), inner.verified_until.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> ChallengeStore {
        ChallengeStore::new(Duration::from_secs(300), Duration::from_secs(3600))
    }

    fn client() -> ClientIdentity {
        ClientIdentity::new("198.51.100.7".parse().unwrap(), "Mozilla/5.0")
    }

    #[test]
    fn correct_answer_opens_verified_window() {
        for kind in ChallengeKind::ALL {
            let store = store();
            let id = client();
            let t0 = Instant::now();
            let challenge = store.issue_kind_at(&id, kind, t0).unwrap();

            assert!(!store.is_verified_at(&id, t0).unwrap());
            let answer = challenge.solution();
            assert!(store.verify_at(&id, challenge.token(), Some(&answer), t0 + Duration::from_secs(5)));
            assert!(store.is_verified_at(&id, t0 + Duration::from_secs(6)).unwrap());
            assert_eq!(store.live_kind_at(&id, t0).unwrap(), None, "challenge cleared on success");
        }
    }

    #[test]
    fn wrong_answer_keeps_challenge() {
        let store = store();
        let id = client();
        let t0 = Instant::now();
        let challenge = store.issue_kind_at(&id, ChallengeKind::Puzzle, t0).unwrap();

        assert!(!store.verify_at(&id, challenge.token(), Some("not a number"), t0));
        assert!(!store.verify_at(&id, challenge.token(), None, t0));
        assert_eq!(store.live_kind_at(&id, t0).unwrap(), Some(ChallengeKind::Puzzle));

        let answer = challenge.solution();
        assert!(store.verify_at(&id, challenge.token(), Some(&answer), t0));
    }

    #[test]
    fn cookie_echo_accepts_matched_token_alone() {
        let store = store();
        let id = client();
        let t0 = Instant::now();
        let challenge = store.issue_kind_at(&id, ChallengeKind::CookieEcho, t0).unwrap();

        assert!(!store.verify_at(&id, challenge.token(), Some("something else"), t0));
        assert!(!store.verify_at(&id, "forged", None, t0));
        assert!(store.verify_at(&id, challenge.token(), None, t0));
        assert!(store.is_verified_at(&id, t0).unwrap());
    }

    #[test]
    fn huge_lifetimes_are_clamped() {
        let store = ChallengeStore::new(Duration::MAX, Duration::from_secs(u64::MAX));
        let id = client();
        let t0 = Instant::now();
        let challenge = store.issue_kind_at(&id, ChallengeKind::CookieEcho, t0).unwrap();

        assert!(challenge.is_live_at(t0 + Duration::from_secs(365 * 24 * 60 * 60)));
        assert!(store.verify_at(&id, challenge.token(), None, t0));
        assert!(store.is_verified_at(&id, t0 + Duration::from_secs(3600)).unwrap());
    }

    #[test]
    fn token_is_bound_to_identity() {
        let store = store();
        let id = client();
        let other = ClientIdentity::new("198.51.100.8".parse().unwrap(), "Mozilla/5.0");
        let t0 = Instant::now();
        let challenge = store.issue_kind_at(&id, ChallengeKind::CookieEcho, t0).unwrap();

        assert!(!store.verify_at(&other, challenge.token(), Some(challenge.token()), t0));
        assert!(!store.verify_at(&id, "forged", Some("forged"), t0));
        assert!(store.verify_at(&id, challenge.token(), Some(challenge.token()), t0));
    }

    #[test]
    fn expired_challenge_fails_and_is_dropped() {
        let store = store();
        let id = client();
        let t0 = Instant::now();
        let challenge = store.issue_kind_at(&id, ChallengeKind::ScriptedProof, t0).unwrap();
        let answer = challenge.solution();

        let at_expiry = challenge.expires_at();
        assert_eq!(
            store.try_verify_at(&id, challenge.token(), Some(&answer), at_expiry).unwrap_err().to_string(),
            EdgeError::ChallengeInvalidOrExpired.to_string()
        );
        assert_eq!(store.counts().unwrap(), (0, 0));
    }

    #[test]
    fn reissue_supersedes_previous_token() {
        let store = store();
        let id = client();
        let t0 = Instant::now();
        let first = store.issue_kind_at(&id, ChallengeKind::CookieEcho, t0).unwrap();
        let second = store.issue_kind_at(&id, ChallengeKind::CookieEcho, t0).unwrap();

        assert_ne!(first.token(), second.token());
        assert!(!store.verify_at(&id, first.token(), Some(first.token()), t0));
        assert!(store.verify_at(&id, second.token(), Some(second.token()), t0));
    }

    #[test]
    fn scripted_proof_answer_is_sha256_of_nonce() {
        let store = store();
        let id = client();
        let t0 = Instant::now();
        let challenge = store.issue_kind_at(&id, ChallengeKind::ScriptedProof, t0).unwrap();

        let ChallengePrompt::ScriptedProof { nonce } = challenge.descriptor(t0).prompt else {
            panic!("expected scripted proof prompt");
        };
        let digest = hex::encode(Sha256::digest(nonce.as_bytes())).to_uppercase();
        assert!(store.verify_at(&id, challenge.token(), Some(&digest), t0));
    }

    #[test]
    fn descriptor_hides_expected_answer() {
        let store = store();
        let id = client();
        let t0 = Instant::now();
        let challenge = store.issue_kind_at(&id, ChallengeKind::Puzzle, t0).unwrap();
        let descriptor = challenge.descriptor(t0);

        let json = serde_json::to_value(&descriptor).unwrap();
        assert_eq!(json["type"], "puzzle");
        assert_eq!(json["expires_in_secs"], 300);
        assert!(json.get("answer").is_none());
        assert_eq!(descriptor.kind(), ChallengeKind::Puzzle);
    }

    #[test]
    fn cleanup_removes_expired_state() {
        let store = store();
        let t0 = Instant::now();
        let a = client();
        let b = ClientIdentity::new("198.51.100.9".parse().unwrap(), "");

        let challenge = store.issue_kind_at(&a, ChallengeKind::CookieEcho, t0).unwrap();
        assert!(store.verify_at(&a, challenge.token(), Some(challenge.token()), t0));
        store.issue_kind_at(&b, ChallengeKind::Puzzle, t0).unwrap();

        assert_eq!(store.cleanup_at(t0 + Duration::from_secs(301)).unwrap(), (1, 0));
        assert_eq!(store.cleanup_at(t0 + Duration::from_secs(3601)).unwrap(), (0, 1));
        assert_eq!(store.counts().unwrap(), (0, 0));
    }

    #[test]
    fn random_issue_covers_every_kind() {
        let store = store();
        let id = client();
        let t0 = Instant::now();
        let mut seen = std::collections::HashSet::new();
        for _ in 0..200 {
            seen.insert(store.issue_at(&id, t0).unwrap().kind());
        }
        assert_eq!(seen.len(), 3);
    }
}
