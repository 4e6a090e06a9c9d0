use chrono::{Duration, Utc};
use std::sync::Arc;
use url::Url;

use super::credential::CredentialVerifier;
use super::error::{OAuthError, StoreError};
use super::identity_provider::IdentityProviders;
use super::jwt::{Claims, JwtService, ProfileClaims, TokenKind, TokenTemplate};
use super::metrics;
use super::store::ObjectStore;
use super::token_store::TokenStore;
use crate::dtos::admin::TokenSummary;
use crate::dtos::oauth::{
    CodeParams, IntrospectRequest, IntrospectResponse, LogoutParams, TokenRequest, TokenResponse,
    UserInfo,
};
use crate::models::application::{
    GRANT_AUTHORIZATION_CODE, GRANT_CLIENT_CREDENTIALS, GRANT_PASSWORD, GRANT_REFRESH_TOKEN,
};
use crate::models::{
    split_owner_name, Application, AuthorizationCode, Cert, CodeRequest, IssuedTokens,
    PkceChallenge, Token, User,
};
use crate::utils::{pkce_matches, secure_eq, Password};

/// Owner of every application and certificate.
pub const ADMIN_OWNER: &str = "admin";

const PKCE_S256: &str = "S256";

/// Outcome of a logout request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogoutOutcome {
    /// Redirect to this URL.
    Redirect(String),
    /// No redirect; whether an active token was revoked.
    Revoked(bool),
}

/// Subject of a minted token triple.
enum Subject<'a> {
    User(&'a User),
    Application,
}

/// Authorization-code, password, refresh-token and client-credentials grants,
/// plus logout, introspection and userinfo.
#[derive(Clone)]
pub struct OAuthService {
    store: ObjectStore,
    tokens: Arc<dyn TokenStore>,
    jwt: JwtService,
    credentials: CredentialVerifier,
    providers: IdentityProviders,
}

fn lifetime(hours: i64) -> Result<Duration, OAuthError> {
    Duration::try_hours(hours)
        .filter(|d| Utc::now().checked_add_signed(*d).is_some())
        .ok_or_else(|| OAuthError::server_error(format!("token lifetime of {} hours is out of range", hours)))
}

fn user_may_sign_in(user: &User) -> bool {
    !user.is_deleted && !user.is_forbidden
}

impl OAuthService {
    pub fn new(
        store: ObjectStore,
        tokens: Arc<dyn TokenStore>,
        jwt: JwtService,
        credentials: CredentialVerifier,
        providers: IdentityProviders,
    ) -> Self {
        Self {
            store,
            tokens,
            jwt,
            credentials,
            providers,
        }
    }

    pub fn token_store(&self) -> &Arc<dyn TokenStore> {
        &self.tokens
    }

    /// Application with `client_id` whose secret equals `client_secret`.
    pub async fn authenticate_client(
        &self,
        client_id: &str,
        client_secret: &str,
    ) -> Option<Application> {
        self.store
            .get_application_by_client_id(client_id)
            .await
            .filter(|app| secure_eq(&app.client_secret, client_secret))
    }

    /// Token record of an active access token.
    pub async fn resolve_bearer(&self, value: &str) -> Result<Option<Token>, StoreError> {
        Ok(self
            .tokens
            .find_by_access_token(value)
            .await?
            .filter(Token::is_access_active))
    }

    async fn client(&self, client_id: &str) -> Result<Application, OAuthError> {
        self.store
            .get_application_by_client_id(client_id)
            .await
            .ok_or_else(|| OAuthError::invalid_client("client_id is invalid"))
    }

    fn check_secret(app: &Application, client_secret: &str) -> Result<(), OAuthError> {
        if secure_eq(&app.client_secret, client_secret) {
            Ok(())
        } else {
            Err(OAuthError::invalid_client("client_secret is invalid"))
        }
    }

    async fn cert_for(&self, app: &Application) -> Result<Cert, OAuthError> {
        self.store
            .get_cert(ADMIN_OWNER, &app.cert)
            .await
            .ok_or_else(|| {
                OAuthError::server_error(format!(
                    "certificate {} of application {} not found",
                    app.cert,
                    app.id()
                ))
            })
    }

    async fn signed_in_user(&self, organization: &str, name: &str) -> Result<User, OAuthError> {
        self.store
            .get_user(organization, name)
            .await
            .filter(user_may_sign_in)
            .ok_or_else(|| {
                OAuthError::invalid_grant(format!(
                    "the user {}/{} does not exist or is not allowed to sign in",
                    organization, name
                ))
            })
    }

    /// Issue an authorization code for a signed-in user.
    pub async fn issue_code(&self, params: &CodeParams) -> Result<AuthorizationCode, OAuthError> {
        let pkce = match params.code_challenge_method.as_str() {
            PKCE_S256 if params.code_challenge.is_empty() => {
                return Err(OAuthError::invalid_request(
                    "code_challenge is required for code_challenge_method S256",
                ))
            }
            PKCE_S256 => Some(PkceChallenge {
                challenge: params.code_challenge.clone(),
                method: PKCE_S256.to_string(),
            }),
            "" | "null" if !params.code_challenge.is_empty() => {
                return Err(OAuthError::invalid_request(
                    "code_challenge requires code_challenge_method S256",
                ))
            }
            "" | "null" => None,
            other => {
                return Err(OAuthError::invalid_request(format!(
                    "unsupported code_challenge_method: {}",
                    other
                )))
            }
        };

        if params.response_type != "code" {
            return Err(OAuthError::invalid_request(format!(
                "unsupported response_type: {}",
                params.response_type
            )));
        }

        let app = self.client(&params.client_id).await?;
        if !app.is_redirect_uri_valid(&params.redirect_uri) {
            return Err(OAuthError::invalid_request(format!(
                "redirect_uri {} is not allowed for application {}",
                params.redirect_uri, app.name
            )));
        }

        let (organization, name) = split_owner_name(&params.user_id)
            .ok_or_else(|| OAuthError::invalid_grant("user_id is invalid"))?;
        let user = self.signed_in_user(organization, name).await?;

        let code = self
            .tokens
            .issue_authorization_code(CodeRequest {
                application: app.name.clone(),
                organization: user.owner.clone(),
                user: user.name.clone(),
                redirect_uri: params.redirect_uri.clone(),
                scope: params.scope.clone(),
                nonce: params.nonce.clone(),
                state: params.state.clone(),
                pkce,
            })
            .await?;

        tracing::info!(application = %app.name, user = %user.id_string(), "Authorization code issued");
        Ok(code)
    }

    /// Token endpoint dispatch.
    pub async fn exchange(
        &self,
        req: TokenRequest,
        issuer: &str,
    ) -> Result<TokenResponse, OAuthError> {
        let grant_type = req.grant_type.clone();
        let response = match grant_type.as_str() {
            GRANT_AUTHORIZATION_CODE => self.authorization_code_grant(req, issuer).await,
            GRANT_PASSWORD => self.password_grant(req, issuer).await,
            GRANT_REFRESH_TOKEN => self.refresh_token_grant(req, issuer).await,
            GRANT_CLIENT_CREDENTIALS => self.client_credentials_grant(req, issuer).await,
            "" => Err(OAuthError::invalid_request("grant_type is required")),
            other => Err(OAuthError::unsupported_grant_type(format!(
                "grant_type {} is not supported",
                other
            ))),
        }?;

        metrics::record_token_issued(&grant_type);
        Ok(response)
    }

    fn ensure_grant_allowed(app: &Application, grant_type: &str) -> Result<(), OAuthError> {
        if app.allows_grant(grant_type) {
            Ok(())
        } else {
            Err(OAuthError::unsupported_grant_type(format!(
                "grant_type {} is not enabled for application {}",
                grant_type, app.name
            )))
        }
    }

    async fn authorization_code_grant(
        &self,
        req: TokenRequest,
        issuer: &str,
    ) -> Result<TokenResponse, OAuthError> {
        if req.code.is_empty() {
            return Err(OAuthError::invalid_request("code is required"));
        }
        let app = self.client(&req.client_id).await?;

        let code = self
            .tokens
            .consume_authorization_code(&req.code)
            .await?
            .ok_or_else(|| OAuthError::invalid_grant("authorization code is invalid, expired or has been used"))?;

        if code.application != app.name {
            return Err(OAuthError::invalid_grant(
                "authorization code was issued to another client",
            ));
        }

        if !req.client_secret.is_empty() {
            Self::check_secret(&app, &req.client_secret)?;
        } else if code.pkce.is_none() {
            return Err(OAuthError::invalid_client(
                "client_secret or code_verifier is required",
            ));
        }

        if let Some(pkce) = &code.pkce {
            if !pkce_matches(&req.code_verifier, &pkce.challenge) {
                return Err(OAuthError::invalid_grant("code_verifier is invalid"));
            }
        }

        if !req.redirect_uri.is_empty()
            && (req.redirect_uri != code.redirect_uri || !app.is_redirect_uri_valid(&req.redirect_uri))
        {
            return Err(OAuthError::invalid_grant(
                "redirect_uri does not match the authorization request",
            ));
        }

        let user = self.signed_in_user(&code.organization, &code.user).await?;
        self.mint(&app, Subject::User(&user), &code.scope, &code.nonce, issuer)
            .await
    }

    async fn password_grant(
        &self,
        req: TokenRequest,
        issuer: &str,
    ) -> Result<TokenResponse, OAuthError> {
        let app = self.client(&req.client_id).await?;
        Self::check_secret(&app, &req.client_secret)?;
        Self::ensure_grant_allowed(&app, GRANT_PASSWORD)?;

        let user = if req.tag.is_empty() {
            self.credentials
                .check_user_password(&app.organization, &req.username, &Password::new(req.password.clone()))
                .await
                .map_err(|e| {
                    if e.is_fatal() {
                        OAuthError::server_error(e)
                    } else {
                        OAuthError::invalid_grant(e.to_string())
                    }
                })?
        } else {
            self.external_user(&app, &req).await?
        };

        self.mint(&app, Subject::User(&user), &req.scope, &req.nonce, issuer)
            .await
    }

    /// Resolve the user behind an external provider code, creating it on
    /// first sign-in when the application allows sign-up.
    async fn external_user(&self, app: &Application, req: &TokenRequest) -> Result<User, OAuthError> {
        let provider = self
            .providers
            .get(&req.tag)
            .ok_or_else(|| OAuthError::invalid_request(format!("unknown identity provider: {}", req.tag)))?;

        let identity = provider
            .exchange_code(&req.code)
            .await
            .map_err(|e| OAuthError::invalid_grant(e.to_string()))?;

        if let Some(user) = self
            .store
            .find_user_by_external_id(&app.organization, &req.tag, &identity.id)
            .await
        {
            return if user_may_sign_in(&user) {
                Ok(user)
            } else {
                Err(OAuthError::invalid_grant(
                    "the user is forbidden to sign in, please contact the administrator",
                ))
            };
        }

        if !app.enable_sign_up {
            return Err(OAuthError::invalid_grant(
                "the application does not allow to sign up new account",
            ));
        }

        let username = if req.username.is_empty() {
            identity.username.clone()
        } else {
            req.username.clone()
        };
        if username.is_empty() {
            return Err(OAuthError::invalid_request("username is required for sign up"));
        }

        let mut candidate = User::new(app.organization.clone(), username);
        candidate.display_name = identity.display_name;
        candidate.avatar = if req.avatar.is_empty() {
            identity.avatar
        } else {
            req.avatar.clone()
        };
        candidate.email = identity.email;
        candidate.signup_application = app.name.clone();

        let (user, created) = self
            .store
            .get_or_insert_external_user(&req.tag, &identity.id, candidate)
            .await
            .map_err(|e| match e {
                StoreError::Conflict(what) => OAuthError::invalid_grant(format!("{} already exists", what)),
                other => OAuthError::server_error(other),
            })?;

        if created {
            tracing::info!(user = %user.id_string(), provider = %req.tag, "Signed up external user");
        }
        Ok(user)
    }

    async fn refresh_token_grant(
        &self,
        req: TokenRequest,
        issuer: &str,
    ) -> Result<TokenResponse, OAuthError> {
        let app = self.client(&req.client_id).await?;
        if !req.client_secret.is_empty() {
            Self::check_secret(&app, &req.client_secret)?;
        }
        Self::ensure_grant_allowed(&app, GRANT_REFRESH_TOKEN)?;
        if req.refresh_token.is_empty() {
            return Err(OAuthError::invalid_request("refresh_token is required"));
        }

        let previous = self
            .tokens
            .take_refresh_token(&app.name, &req.refresh_token)
            .await?
            .ok_or_else(|| OAuthError::invalid_grant("refresh token is invalid, expired or revoked"))?;

        let cert = self.cert_for(&app).await?;
        let claims = self
            .jwt
            .parse(&req.refresh_token, &cert, &app.client_id)
            .map_err(|e| OAuthError::invalid_grant(format!("refresh token is invalid: {}", e)))?;
        if claims.token_type != TokenKind::Refresh {
            return Err(OAuthError::invalid_grant("token is not a refresh token"));
        }

        let user = self
            .signed_in_user(&previous.organization, &previous.user)
            .await?;
        let scope = if req.scope.is_empty() {
            previous.scope.clone()
        } else {
            req.scope.clone()
        };

        self.mint(&app, Subject::User(&user), &scope, &claims.nonce, issuer)
            .await
    }

    async fn client_credentials_grant(
        &self,
        req: TokenRequest,
        issuer: &str,
    ) -> Result<TokenResponse, OAuthError> {
        let app = self.client(&req.client_id).await?;
        Self::check_secret(&app, &req.client_secret)?;
        Self::ensure_grant_allowed(&app, GRANT_CLIENT_CREDENTIALS)?;

        self.mint(&app, Subject::Application, &req.scope, "", issuer)
            .await
    }

    async fn mint(
        &self,
        app: &Application,
        subject: Subject<'_>,
        scope: &str,
        nonce: &str,
        issuer: &str,
    ) -> Result<TokenResponse, OAuthError> {
        let cert = self.cert_for(app).await?;
        let access_lifetime = lifetime(app.expire_in_hours)?;
        let refresh_lifetime = lifetime(app.refresh_lifetime_hours())?;

        let (profile, sub, organization, user_name) = match subject {
            Subject::User(user) => (
                ProfileClaims::from(user),
                user.id.clone(),
                user.owner.clone(),
                user.name.clone(),
            ),
            Subject::Application => (
                ProfileClaims::for_application(app),
                app.client_id.clone(),
                app.organization.clone(),
                String::new(),
            ),
        };
        let for_user = !user_name.is_empty();

        let template = |kind: TokenKind, lifetime: Duration| TokenTemplate {
            profile: profile.clone(),
            subject: sub.clone(),
            kind,
            issuer: issuer.to_string(),
            audience: app.client_id.clone(),
            scope: scope.to_string(),
            nonce: nonce.to_string(),
            lifetime,
        };
        let sign = |kind: TokenKind, lifetime: Duration| -> Result<String, OAuthError> {
            self.jwt
                .mint(template(kind, lifetime), &cert)
                .map(|(token, _)| token)
                .map_err(OAuthError::server_error)
        };

        let access_token = sign(TokenKind::Access, access_lifetime)?;
        let (refresh_token, id_token) = if for_user {
            (
                sign(TokenKind::Refresh, refresh_lifetime)?,
                sign(TokenKind::Id, access_lifetime)?,
            )
        } else {
            (String::new(), String::new())
        };

        let record = Token::new(
            &app.name,
            &organization,
            &user_name,
            scope,
            IssuedTokens {
                access_token,
                refresh_token,
                id_token,
                access_lifetime,
                refresh_lifetime: if for_user { refresh_lifetime } else { access_lifetime },
            },
        );
        let response = TokenResponse {
            access_token: record.access_token.clone(),
            id_token: record.id_token.clone(),
            refresh_token: record.refresh_token.clone(),
            token_type: record.token_type.clone(),
            expires_in: record.expires_in(),
            scope: record.scope.clone(),
        };

        self.tokens.issue_token(record).await?;
        tracing::info!(application = %app.name, user = %user_name, "Token issued");
        Ok(response)
    }

    /// Revoke the token named by `id_token_hint`.
    pub async fn logout(&self, params: &LogoutParams) -> Result<LogoutOutcome, OAuthError> {
        if params.id_token_hint.is_empty() {
            return Err(OAuthError::invalid_request("id_token_hint is required"));
        }

        let revocation = self
            .tokens
            .revoke_by_access_token(&params.id_token_hint)
            .await?;

        if let Some(application) = &revocation.application {
            if let Some(redirect) = self
                .logout_redirect(application, &params.post_logout_redirect_uri, &params.state)
                .await
            {
                return Ok(LogoutOutcome::Redirect(redirect));
            }
        }
        Ok(LogoutOutcome::Revoked(revocation.was_active))
    }

    async fn logout_redirect(&self, application: &str, uri: &str, state: &str) -> Option<String> {
        let app = self.store.get_application(application).await?;
        if !app.is_redirect_uri_valid(uri) {
            return None;
        }
        let mut url = Url::parse(uri).ok()?;
        if !state.is_empty() {
            url.query_pairs_mut().append_pair("state", state);
        }
        Some(url.into())
    }

    /// RFC 7662 introspection. `basic` carries HTTP Basic client credentials.
    pub async fn introspect(
        &self,
        req: &IntrospectRequest,
        basic: Option<(String, String)>,
    ) -> Result<IntrospectResponse, OAuthError> {
        let (client_id, client_secret) = match basic {
            Some(credentials) => credentials,
            None => {
                if req.client_id.is_empty() || req.client_secret.is_empty() {
                    return Err(OAuthError::invalid_request("empty clientId or clientSecret"));
                }
                (req.client_id.clone(), req.client_secret.clone())
            }
        };

        let app = self
            .authenticate_client(&client_id, &client_secret)
            .await
            .ok_or_else(|| OAuthError::invalid_client("invalid application or wrong clientSecret"))?;

        if req.token.is_empty() {
            return Ok(IntrospectResponse::inactive());
        }
        let Some(record) = self
            .tokens
            .find_by_token_and_application(&req.token, &app.name)
            .await?
        else {
            return Ok(IntrospectResponse::inactive());
        };

        let cert = self.cert_for(&app).await?;
        let Ok(claims) = self.jwt.parse(&req.token, &cert, &app.client_id) else {
            return Ok(IntrospectResponse::inactive());
        };
        if !Self::is_live(&record, &claims) {
            return Ok(IntrospectResponse::inactive());
        }

        Ok(IntrospectResponse {
            active: true,
            scope: Some(claims.scope),
            client_id: Some(client_id),
            username: Some(record.user.clone()),
            token_type: Some(record.token_type.clone()),
            exp: Some(claims.exp),
            iat: Some(claims.iat),
            nbf: Some(claims.nbf),
            sub: Some(claims.sub),
            aud: Some(claims.aud),
            iss: Some(claims.iss),
            jti: Some(claims.jti),
        })
    }

    /// Whether the half of `record` that `claims` belongs to is still usable.
    fn is_live(record: &Token, claims: &Claims) -> bool {
        match claims.token_type {
            TokenKind::Refresh => record.is_refresh_active(),
            TokenKind::Access | TokenKind::Id => record.is_access_active(),
        }
    }

    /// OIDC userinfo for a bearer access token.
    pub async fn userinfo(&self, access_token: &str, issuer: &str) -> Result<UserInfo, OAuthError> {
        let record = self
            .resolve_bearer(access_token)
            .await?
            .ok_or_else(|| OAuthError::invalid_grant("access token is invalid, expired or revoked"))?;
        let user = self.signed_in_user(&record.organization, &record.user).await?;
        let audience = self
            .store
            .get_application(&record.application)
            .await
            .map(|app| app.client_id)
            .unwrap_or_default();

        let scopes: Vec<&str> = record.scope.split_whitespace().collect();
        let has = |scope: &str| scopes.contains(&scope);

        let mut info = UserInfo {
            sub: user.id.clone(),
            iss: issuer.to_string(),
            aud: audience,
            ..Default::default()
        };
        if has("profile") {
            info.preferred_username = Some(user.name.clone());
            info.name = Some(user.display_name.clone());
            info.picture = Some(user.avatar.clone());
        }
        if has("email") {
            info.email = Some(user.email.clone());
        }
        if has("phone") {
            info.phone = Some(user.phone.clone());
        }
        Ok(info)
    }

    /// Token records of `organization/user` issued to `application`.
    pub async fn list_tokens(
        &self,
        application: &str,
        organization: &str,
        user: &str,
    ) -> Result<Vec<TokenSummary>, StoreError> {
        let tokens = self
            .tokens
            .list_by_user_and_application(application, organization, user)
            .await?;
        Ok(tokens.iter().map(TokenSummary::from).collect())
    }
}
