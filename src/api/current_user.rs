//! Current user service
//!
//! Get the current user from the request based on the Authorization header

use std::marker::PhantomData;
use std::ops::Deref;
use std::sync::Arc;

use axum::Extension;
use axum::RequestPartsExt;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum_extra::TypedHeader;
use axum_extra::headers::Authorization;
use axum_extra::headers::authorization::Bearer;
use jsonwebtoken::DecodingKey;
use jsonwebtoken::EncodingKey;
use serde::Deserialize;
use serde::Serialize;
use uuid::Uuid;

use crate::api::Error;
use crate::storage::Storage;
use crate::users::User;

/// Access tokens are valid for an hour
const TOKEN_EXPIRES_IN: i64 = 3600;

/// The keys used for encoding/decoding JWT tokens
#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl JwtKeys {
    /// Create new encoding/decoding keys, derived from a secret
    pub fn new(secret: &[u8]) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        }
    }
}

/// The JWT claims to identify a user
#[derive(Debug, Deserialize, Serialize)]
struct Claims {
    /// The user ID
    sub: Uuid,

    /// Timestamp the token expires at
    exp: i64,

    /// The session ID, rotating it invalidates all tokens of the user
    jti: Uuid,
}

/// Token information served to the user
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Token {
    /// Type of the token: Bearer
    #[allow(clippy::struct_field_names)]
    token_type: &'static str,

    /// In how many seconds does the token expire
    expires_in: i64,

    /// The access token to provide to follow up requests in the Authorization header
    #[allow(clippy::struct_field_names)]
    access_token: String,
}

/// Generate a token for the outside world for a given user
pub fn generate_token(jwt_keys: &JwtKeys, user: &User) -> Result<Token, Error> {
    use jsonwebtoken::Header;
    use jsonwebtoken::encode;

    let claims = Claims {
        sub: user.id,
        exp: chrono::Utc::now().timestamp() + TOKEN_EXPIRES_IN,
        jti: user.session_id,
    };

    let access_token = encode(&Header::default(), &claims, &jwt_keys.encoding)
        .map_err(Error::internal_server_error)?;

    Ok(Token {
        token_type: "Bearer",
        expires_in: TOKEN_EXPIRES_IN,
        access_token,
    })
}

/// Current user service
///
/// Generic over the storage, the user is looked up on every request
pub struct CurrentUser<S: Storage> {
    user: Arc<User>,
    storage: PhantomData<S>,
}

impl<S: Storage> CurrentUser<S> {
    /// Only let admins through
    pub fn require_admin(&self) -> Result<(), Error> {
        if self.user.is_admin() {
            Ok(())
        } else {
            Err(Error::forbidden("Only admins are allowed to do this"))
        }
    }

    /// Only let the owner of a resource or an admin through
    pub fn require_owner_or_admin(&self, owner_id: &Uuid) -> Result<(), Error> {
        if self.user.id == *owner_id || self.user.is_admin() {
            Ok(())
        } else {
            Err(Error::forbidden("Not allowed to access this resource"))
        }
    }
}

impl<S: Storage> Deref for CurrentUser<S> {
    type Target = User;

    fn deref(&self) -> &Self::Target {
        &self.user
    }
}

impl<B, S> FromRequestParts<B> for CurrentUser<S>
where
    B: Send + Sync,
    S: Storage,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &B) -> Result<Self, Self::Rejection> {
        use jsonwebtoken::Validation;
        use jsonwebtoken::decode;

        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|_| Error::unauthorized("Missing API token"))?;

        let Extension(jwt_keys) = parts
            .extract::<Extension<JwtKeys>>()
            .await
            .map_err(|_| Error::internal_server_error("Could not get JWT keys"))?;

        let Extension(storage) = parts
            .extract::<Extension<S>>()
            .await
            .map_err(|_| Error::internal_server_error("Could not get storage"))?;

        let token_data = decode::<Claims>(bearer.token(), &jwt_keys.decoding, &Validation::default())
            .map_err(|err| Error::unauthorized(format!("Invalid token: {err}")))?;

        let claims = token_data.claims;

        let user = storage
            .find_single_user_by_id(&claims.sub)
            .await
            .map_err(Error::internal_server_error)?
            .ok_or_else(|| Error::unauthorized("Could not find user"))?;

        // changing the password rotates the session
        if claims.jti != user.session_id {
            return Err(Error::unauthorized("Token expired"));
        }

        Ok(Self {
            user: Arc::new(user),
            storage: PhantomData,
        })
    }
}
