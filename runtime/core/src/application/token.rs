// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Token Service - Access Tokens, Refresh Rotation, Revocation
//
// Access tokens are short-lived HS256 JWTs carrying sub/role/perms and a
// fresh jti per mint; verification is stateless except for the jti
// denylist. Refresh tokens are opaque random secrets stored only as a
// SHA-256 hash and bound to one session; each secret is single-use, rotated
// inside one atomic repository operation.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tracing::warn;
use uuid::Uuid;

use crate::config::AuthSettings;
use crate::domain::auth::{
    perms_for_role, AccessClaims, AuditLogEntry, AuthContext, AuthError, LoginAttempt,
    RefreshToken, Role, Session, TokenRevocation, TokenType, User, UserStatus,
};
use crate::domain::repository::{
    AuditLogRepository, RevocationRepository, SessionRepository, UserRepository,
};

pub fn hash_token(raw: &str) -> String {
    hex::encode(Sha256::digest(raw.as_bytes()))
}

pub fn new_opaque_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[derive(Debug, Clone)]
pub struct SignedAccessToken {
    pub token: String,
    pub jti: String,
    pub ttl_seconds: u64,
}

#[derive(Debug, Clone)]
pub struct RefreshOutcome {
    pub access: SignedAccessToken,
    pub refresh_secret: String,
    pub refresh_expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub user: User,
    pub access: SignedAccessToken,
    pub refresh_secret: String,
    pub refresh_expires_at: DateTime<Utc>,
}

pub struct TokenService {
    settings: AuthSettings,
    users: Arc<dyn UserRepository>,
    sessions: Arc<dyn SessionRepository>,
    revocations: Arc<dyn RevocationRepository>,
    audit: Arc<dyn AuditLogRepository>,
}

impl TokenService {
    pub fn new(
        settings: AuthSettings,
        users: Arc<dyn UserRepository>,
        sessions: Arc<dyn SessionRepository>,
        revocations: Arc<dyn RevocationRepository>,
        audit: Arc<dyn AuditLogRepository>,
    ) -> Self {
        Self {
            settings,
            users,
            sessions,
            revocations,
            audit,
        }
    }

    pub fn cookie_name(&self) -> &str {
        &self.settings.cookie_name
    }

    pub fn settings(&self) -> &AuthSettings {
        &self.settings
    }

    /// Mint a signed access token with a fresh jti.
    pub fn sign_access_token(
        &self,
        user_id: Uuid,
        role: Role,
        perms: Vec<String>,
    ) -> Result<SignedAccessToken, AuthError> {
        let now = Utc::now();
        let ttl = self.settings.access_ttl_seconds;
        let jti = Uuid::new_v4().to_string();
        let claims = AccessClaims {
            sub: user_id.to_string(),
            role,
            perms,
            jti: jti.clone(),
            iat: now.timestamp(),
            exp: now.timestamp() + ttl as i64,
        };

        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.settings.jwt_secret.as_bytes()),
        )
        .map_err(|_| AuthError::InvalidToken)?;

        Ok(SignedAccessToken {
            token,
            jti,
            ttl_seconds: ttl,
        })
    }

    /// Verify signature and expiry statelessly, then check the jti against
    /// the revocation denylist.
    pub async fn verify_access_token(&self, token: &str) -> Result<AuthContext, AuthError> {
        let data = decode::<AccessClaims>(
            token,
            &DecodingKey::from_secret(self.settings.jwt_secret.as_bytes()),
            &Validation::new(Algorithm::HS256),
        )
        .map_err(|_| AuthError::InvalidToken)?;

        let claims = data.claims;
        let user_id = Uuid::parse_str(&claims.sub).map_err(|_| AuthError::InvalidToken)?;

        if !claims.jti.is_empty() && self.revocations.is_jti_revoked(&claims.jti).await? {
            return Err(AuthError::TokenRevoked);
        }

        Ok(AuthContext {
            user_id,
            role: claims.role,
            perms: claims.perms.into_iter().collect(),
            token_type: TokenType::Jwt,
            jti: (!claims.jti.is_empty()).then_some(claims.jti),
        })
    }

    /// Static shared-secret check for trusted internal callers, compared in
    /// constant time. Maps to the SERVICE principal with the configured
    /// scope set.
    pub fn verify_service_token(&self, presented: &str) -> Option<AuthContext> {
        let configured = self.settings.service_token.as_deref()?;
        if configured.is_empty() || presented.is_empty() {
            return None;
        }
        let matches: bool = configured
            .as_bytes()
            .ct_eq(presented.as_bytes())
            .into();
        if !matches {
            return None;
        }
        Some(AuthContext {
            user_id: Uuid::nil(),
            role: Role::Service,
            perms: self
                .settings
                .service_scopes
                .iter()
                .cloned()
                .collect::<HashSet<String>>(),
            token_type: TokenType::Service,
            jti: None,
        })
    }

    fn refresh_expiry(&self) -> DateTime<Utc> {
        Utc::now() + ChronoDuration::days(self.settings.refresh_ttl_days)
    }

    /// Exchange a refresh secret: rotate it (single-use) and mint a new
    /// access token. A replayed (already-rotated) secret is rejected,
    /// audited, and, under the configured policy, cascade-revokes the
    /// whole session.
    pub async fn refresh(&self, refresh_secret: &str) -> Result<RefreshOutcome, AuthError> {
        if refresh_secret.is_empty() {
            return Err(AuthError::InvalidRefreshToken);
        }
        let presented_hash = hash_token(refresh_secret);

        let token = self
            .sessions
            .find_refresh_token(&presented_hash)
            .await?
            .ok_or(AuthError::InvalidRefreshToken)?;

        if token.revoked_at.is_some() {
            self.handle_refresh_replay(&token).await;
            return Err(AuthError::InvalidRefreshToken);
        }

        let session = self
            .sessions
            .find_session(token.session_id)
            .await?
            .ok_or(AuthError::SessionInvalid)?;
        if !session.is_valid_at(Utc::now()) {
            return Err(AuthError::SessionInvalid);
        }

        let user = self
            .users
            .find_by_id(token.user_id)
            .await?
            .ok_or(AuthError::UserInactive)?;
        if user.status != UserStatus::Active {
            return Err(AuthError::UserInactive);
        }

        let new_secret = new_opaque_token();
        let replacement = RefreshToken::new(session.id, user.id, hash_token(&new_secret));
        let new_expiry = self.refresh_expiry();

        self.sessions
            .rotate_refresh_token(&presented_hash, &replacement, new_expiry)
            .await?;

        let access = self.sign_access_token(user.id, user.role, perms_for_role(user.role))?;

        self.audit_event(
            Some(user.id),
            "auth.refresh",
            Some(("session", session.id.to_string())),
        )
        .await;

        Ok(RefreshOutcome {
            access,
            refresh_secret: new_secret,
            refresh_expires_at: new_expiry,
        })
    }

    async fn handle_refresh_replay(&self, token: &RefreshToken) {
        warn!(
            session_id = %token.session_id,
            user_id = %token.user_id,
            "replay of rotated refresh token"
        );
        self.audit_event(
            Some(token.user_id),
            "auth.refresh_replay",
            Some(("session", token.session_id.to_string())),
        )
        .await;

        // Conventional mitigation for credential theft, behind a policy
        // flag: treat the replay as compromise and kill the session chain.
        if self.settings.revoke_session_on_replay {
            if let Err(e) = self.sessions.revoke_session(token.session_id, Utc::now()).await {
                warn!(session_id = %token.session_id, error = %e, "failed to cascade-revoke session");
            }
        }
    }

    /// Revoke the session and refresh token behind the presented cookie (if
    /// any) and denylist the access token's jti until its natural expiry.
    pub async fn logout(
        &self,
        ctx: &AuthContext,
        refresh_secret: Option<&str>,
    ) -> Result<(), AuthError> {
        if let Some(raw) = refresh_secret.filter(|s| !s.is_empty()) {
            let presented_hash = hash_token(raw);
            if let Some(token) = self.sessions.find_refresh_token(&presented_hash).await? {
                let now = Utc::now();
                self.sessions.revoke_refresh_token(&presented_hash, now).await?;
                self.sessions.revoke_session(token.session_id, now).await?;
                self.audit_event(
                    Some(ctx.user_id),
                    "auth.logout",
                    Some(("session", token.session_id.to_string())),
                )
                .await;
            }
        }

        if let Some(jti) = &ctx.jti {
            let expires_at = Utc::now() + ChronoDuration::seconds(self.settings.access_ttl_seconds as i64);
            self.revocations
                .revoke_jti(&TokenRevocation {
                    jti: jti.clone(),
                    expires_at,
                    revoked_at: Utc::now(),
                })
                .await?;
        }

        Ok(())
    }

    /// Passwordless development login: upsert the user, open a session with
    /// a fresh refresh token, and mint an access token. Gated by
    /// configuration; never mounted in production.
    pub async fn dev_login(
        &self,
        email: &str,
        role: Role,
        device_name: Option<String>,
        ip: Option<String>,
        user_agent: Option<String>,
    ) -> Result<LoginOutcome, AuthError> {
        let user = self.users.upsert_by_email(&User::new(email, role)).await?;

        if let Err(e) = self
            .audit
            .record_login_attempt(&LoginAttempt {
                id: Uuid::new_v4(),
                user_id: user.id,
                success: true,
                ip: ip.clone(),
                user_agent,
                created_at: Utc::now(),
            })
            .await
        {
            warn!(error = %e, "failed to record login attempt");
        }

        let refresh_expires_at = self.refresh_expiry();
        let session = Session::new(user.id, device_name, refresh_expires_at);
        self.sessions.insert_session(&session).await?;

        let refresh_secret = new_opaque_token();
        self.sessions
            .insert_refresh_token(&RefreshToken::new(
                session.id,
                user.id,
                hash_token(&refresh_secret),
            ))
            .await?;

        let access = self.sign_access_token(user.id, user.role, perms_for_role(user.role))?;

        self.audit_event(
            Some(user.id),
            "auth.dev_login",
            Some(("session", session.id.to_string())),
        )
        .await;

        Ok(LoginOutcome {
            user,
            access,
            refresh_secret,
            refresh_expires_at,
        })
    }

    async fn audit_event(&self, user_id: Option<Uuid>, action: &str, resource: Option<(&str, String)>) {
        let mut entry = AuditLogEntry::new(user_id, action);
        if let Some((resource, id)) = resource {
            entry = entry.with_resource(resource, id);
        }
        if let Err(e) = self.audit.record(&entry).await {
            warn!(action, error = %e, "failed to write audit log entry");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::repositories::memory::{
        InMemoryAuditLogRepository, InMemoryRevocationRepository, InMemorySessionRepository,
        InMemoryUserRepository,
    };

    fn service_with(settings: AuthSettings) -> (TokenService, Arc<InMemorySessionRepository>) {
        let sessions = Arc::new(InMemorySessionRepository::new());
        let service = TokenService::new(
            settings,
            Arc::new(InMemoryUserRepository::new()),
            sessions.clone(),
            Arc::new(InMemoryRevocationRepository::new()),
            Arc::new(InMemoryAuditLogRepository::new()),
        );
        (service, sessions)
    }

    fn settings() -> AuthSettings {
        AuthSettings {
            jwt_secret: "test-secret".to_string(),
            service_token: Some("svc-token".to_string()),
            service_scopes: vec!["marketplace:admin".to_string()],
            ..crate::config::Settings::default().auth
        }
    }

    #[tokio::test]
    async fn test_sign_and_verify_round_trip_mints_fresh_jti() {
        let (service, _) = service_with(settings());
        let user_id = Uuid::new_v4();

        let a = service
            .sign_access_token(user_id, Role::User, perms_for_role(Role::User))
            .unwrap();
        let b = service
            .sign_access_token(user_id, Role::User, perms_for_role(Role::User))
            .unwrap();
        assert_ne!(a.jti, b.jti);

        let ctx = service.verify_access_token(&a.token).await.unwrap();
        assert_eq!(ctx.user_id, user_id);
        assert_eq!(ctx.role, Role::User);
        assert!(ctx.has_perm("marketplace:trade:request"));
        assert_eq!(ctx.jti.as_deref(), Some(a.jti.as_str()));
    }

    #[tokio::test]
    async fn test_revoked_jti_is_rejected_before_expiry() {
        let (service, _) = service_with(settings());
        let signed = service
            .sign_access_token(Uuid::new_v4(), Role::User, vec![])
            .unwrap();

        let ctx = service.verify_access_token(&signed.token).await.unwrap();
        service.logout(&ctx, None).await.unwrap();

        let err = service.verify_access_token(&signed.token).await.unwrap_err();
        assert!(matches!(err, AuthError::TokenRevoked));
    }

    #[tokio::test]
    async fn test_refresh_token_is_single_use() {
        let (service, _) = service_with(settings());
        let login = service
            .dev_login("buyer@example.test", Role::User, None, None, None)
            .await
            .unwrap();

        let rotated = service.refresh(&login.refresh_secret).await.unwrap();
        assert_ne!(rotated.refresh_secret, login.refresh_secret);

        // Second exchange of the same secret is a replay.
        let err = service.refresh(&login.refresh_secret).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidRefreshToken));

        // The rotated secret still works.
        service.refresh(&rotated.refresh_secret).await.unwrap();
    }

    #[tokio::test]
    async fn test_replay_cascade_revokes_session_when_policy_enabled() {
        let mut s = settings();
        s.revoke_session_on_replay = true;
        let (service, sessions) = service_with(s);

        let login = service
            .dev_login("buyer@example.test", Role::User, None, None, None)
            .await
            .unwrap();
        let rotated = service.refresh(&login.refresh_secret).await.unwrap();

        let _ = service.refresh(&login.refresh_secret).await.unwrap_err();

        // The replacement secret's session is dead too.
        let err = service.refresh(&rotated.refresh_secret).await.unwrap_err();
        assert!(matches!(err, AuthError::SessionInvalid));

        let hash = hash_token(&rotated.refresh_secret);
        let token = sessions.find_refresh_token(&hash).await.unwrap().unwrap();
        let session = sessions.find_session(token.session_id).await.unwrap().unwrap();
        assert!(session.revoked_at.is_some());
    }

    #[tokio::test]
    async fn test_service_token_constant_time_compare() {
        let (service, _) = service_with(settings());

        let ctx = service.verify_service_token("svc-token").unwrap();
        assert_eq!(ctx.role, Role::Service);
        assert!(ctx.has_perm("marketplace:admin"));

        assert!(service.verify_service_token("svc-tokem").is_none());
        assert!(service.verify_service_token("").is_none());
    }
}
