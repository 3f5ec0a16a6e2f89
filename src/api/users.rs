//! User API management

use std::ops::Deref;

use axum::Extension;
use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use uuid::Uuid;

use crate::password::generate;
use crate::password::hash;
use crate::password::verify;
use crate::storage::ChangePasswordValues;
use crate::storage::CreateUserValues;
use crate::storage::Storage;
use crate::storage::UpdateUserValues;
use crate::users::Role;
use crate::users::User;

use super::CurrentUser;
use super::Error;
use super::Form;
use super::JwtKeys;
use super::PathParameters;
use super::Success;
use super::current_user::Token;
use super::current_user::generate_token;
use super::request::parse_text;

const MAX_NAME_LENGTH: usize = 255;
const MIN_PASSWORD_LENGTH: usize = 8;

/// The user response information
///
/// A subset of all the information, ready to be serialized for the outside world
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,

    /// The password, only when it was generated by this request
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl UserResponse {
    fn from_user(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            name: user.name,
            role: user.role,
            created_at: user.created_at,
            password: None,
        }
    }

    /// Add a generated password to the response
    ///
    /// This is the only time the password is known to anybody
    fn with_password(self, password: String) -> Self {
        Self {
            password: Some(password),
            ..self
        }
    }
}

/// Login form
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginForm {
    email: String,
    password: String,
}

/// Get a token for a user "session"
///
/// Request:
/// ```sh
/// curl -v -H 'Content-Type: application/json' \
///     -d '{ "email": "admin@localhost", "password": "verysecret" }' \
///     http://localhost:6000/api/users/token
/// ```
///
/// Response
/// ```json
/// { "success": true, "data": { "tokenType": "Bearer", "expiresIn": 3600, "accessToken": "..." } }
/// ```
pub async fn token<S: Storage>(
    Extension(jwt_keys): Extension<JwtKeys>,
    Extension(storage): Extension<S>,
    Form(form): Form<LoginForm>,
) -> Result<Success<Token>, Error> {
    let user = storage
        .find_single_user_by_email(&normalize_email(&form.email))
        .await
        .map_err(Error::internal_server_error)?;

    match user {
        Some(user) if !user.is_deleted() && verify(&user.hashed_password, &form.password) => {
            tracing::debug!("User {} logged in", user.id);

            Ok(Success::ok(generate_token(&jwt_keys, &user)?))
        }
        _ => Err(Error::bad_request("Invalid email or password")),
    }
}

/// List all users
pub async fn list<S: Storage>(
    Extension(storage): Extension<S>,
    current_user: CurrentUser<S>,
) -> Result<Success<Vec<UserResponse>>, Error> {
    current_user.require_admin()?;

    let users = storage
        .find_all_users()
        .await
        .map_err(Error::internal_server_error)?;

    Ok(Success::ok(
        users.into_iter().map(UserResponse::from_user).collect(),
    ))
}

/// Get the current user
pub async fn me<S: Storage>(current_user: CurrentUser<S>) -> Success<UserResponse> {
    Success::ok(UserResponse::from_user(current_user.deref().clone()))
}

/// Get a single user
pub async fn single<S: Storage>(
    Extension(storage): Extension<S>,
    current_user: CurrentUser<S>,
    PathParameters(user_id): PathParameters<Uuid>,
) -> Result<Success<UserResponse>, Error> {
    current_user.require_admin()?;

    let user = fetch_user(&storage, &user_id).await?;

    Ok(Success::ok(UserResponse::from_user(user)))
}

/// Create user form
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserForm {
    role: Role,
    email: String,
    name: String,

    /// When not provided a password is generated and returned once
    password: Option<String>,
}

/// Create a user
///
/// Request:
/// ```sh
/// curl -v -H 'Content-Type: application/json' \
///     -H 'Authorization: Bearer tokentokentoken' \
///     -d '{ "role": "user", "email": "jane@example.com", "name": "Jane" }' \
///     http://localhost:6000/api/users
/// ```
pub async fn create<S: Storage>(
    Extension(storage): Extension<S>,
    current_user: CurrentUser<S>,
    Form(form): Form<CreateUserForm>,
) -> Result<Success<UserResponse>, Error> {
    current_user.require_admin()?;

    let email = parse_email(&form.email)?;
    let name = parse_text("name", &form.name, MAX_NAME_LENGTH)?;

    let existing_user = storage
        .find_single_user_by_email(&email)
        .await
        .map_err(Error::internal_server_error)?;

    if let Some(user) = existing_user {
        return if user.is_deleted() {
            Err(Error::bad_request("User already exists and is deleted"))
        } else {
            Err(Error::bad_request("User already exists"))
        };
    }

    let (generated, password) = match form.password {
        Some(password) => (false, parse_password(password)?),
        None => (true, generate()),
    };

    let hashed_password = hash(&password).map_err(Error::internal_server_error)?;

    let values = CreateUserValues {
        session_id: &Uuid::new_v4(),
        role: form.role,
        email: &email,
        name: &name,
        hashed_password: &hashed_password,
    };

    let user = storage
        .create_user(&values)
        .await
        .map_err(Error::internal_server_error)?;

    tracing::info!("User {} created by {}", user.id, current_user.id);

    let response = UserResponse::from_user(user);

    Ok(Success::created(if generated {
        response.with_password(password)
    } else {
        response
    }))
}

/// Update user form
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserForm {
    name: Option<String>,
    role: Option<Role>,
}

/// Update the name and/or role of a user
pub async fn update<S: Storage>(
    Extension(storage): Extension<S>,
    current_user: CurrentUser<S>,
    PathParameters(user_id): PathParameters<Uuid>,
    Form(form): Form<UpdateUserForm>,
) -> Result<Success<UserResponse>, Error> {
    current_user.require_admin()?;

    let user = fetch_user(&storage, &user_id).await?;

    if user.id == current_user.id && form.role.is_some_and(|role| role != Role::Admin) {
        return Err(Error::bad_request("Can not demote yourself"));
    }

    let name = form
        .name
        .map(|name| parse_text("name", &name, MAX_NAME_LENGTH))
        .transpose()?;

    let values = UpdateUserValues {
        name: name.as_deref(),
        role: form.role,
    };

    let updated_user = storage
        .update_user(&user, &values)
        .await
        .map_err(Error::internal_server_error)?;

    Ok(Success::ok(UserResponse::from_user(updated_user)))
}

/// Change own password form
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeOwnPasswordForm {
    /// Current password for verification
    current_password: String,

    /// When not provided a password is generated
    password: Option<String>,
}

/// Response of a password change of the current user
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeOwnPasswordResponse {
    #[serde(flatten)]
    token: Token,

    #[serde(skip_serializing_if = "Option::is_none")]
    password: Option<String>,
}

/// Change the password of the current user
///
/// Changing your password will invalidate your current access token, a new one is returned
///
/// Request:
/// ```sh
/// curl -v -XPUT -H 'Content-Type: application/json' \
///     -H 'Authorization: Bearer tokentokentoken' \
///     -d '{ "currentPassword": "verysecret", "password": "veryverysecret" }' \
///     http://localhost:6000/api/users/me/password
/// ```
pub async fn change_own_password<S: Storage>(
    Extension(jwt_keys): Extension<JwtKeys>,
    Extension(storage): Extension<S>,
    current_user: CurrentUser<S>,
    Form(form): Form<ChangeOwnPasswordForm>,
) -> Result<Success<ChangeOwnPasswordResponse>, Error> {
    if !verify(&current_user.hashed_password, &form.current_password) {
        return Err(Error::bad_request("Invalid password"));
    }

    let (updated_user, generated_password) =
        store_password(&storage, &current_user, form.password).await?;

    Ok(Success::ok(ChangeOwnPasswordResponse {
        token: generate_token(&jwt_keys, &updated_user)?,
        password: generated_password,
    }))
}

/// Reset password form
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordForm {
    /// When not provided a password is generated and returned once
    password: Option<String>,
}

/// Reset the password of another user
///
/// All tokens of that user are invalidated
pub async fn change_password<S: Storage>(
    Extension(storage): Extension<S>,
    current_user: CurrentUser<S>,
    PathParameters(user_id): PathParameters<Uuid>,
    Form(form): Form<ResetPasswordForm>,
) -> Result<Success<UserResponse>, Error> {
    current_user.require_admin()?;

    let user = fetch_user(&storage, &user_id).await?;

    let (updated_user, generated_password) = store_password(&storage, &user, form.password).await?;

    tracing::info!("Password of user {} reset by {}", user.id, current_user.id);

    let response = UserResponse::from_user(updated_user);

    Ok(Success::ok(match generated_password {
        Some(password) => response.with_password(password),
        None => response,
    }))
}

/// Delete a user
///
/// Request:
/// ```sh
/// curl -v -XDELETE \
///     -H 'Authorization: Bearer tokentokentoken' \
///     http://localhost:6000/api/users/<uuid>
/// ```
pub async fn delete<S: Storage>(
    Extension(storage): Extension<S>,
    current_user: CurrentUser<S>,
    PathParameters(user_id): PathParameters<Uuid>,
) -> Result<Success<()>, Error> {
    current_user.require_admin()?;

    let user = fetch_user(&storage, &user_id).await?;

    if user.id == current_user.id {
        return Err(Error::bad_request("Can not delete yourself"));
    }

    storage
        .delete_user(&user)
        .await
        .map_err(Error::internal_server_error)?;

    tracing::info!("User {} deleted by {}", user.id, current_user.id);

    Ok(Success::no_content())
}

/// Hash and store a new password, rotating the session
///
/// Returns the generated password when none was given
async fn store_password<S: Storage>(
    storage: &S,
    user: &User,
    password: Option<String>,
) -> Result<(User, Option<String>), Error> {
    let (password, generated) = match password {
        Some(password) => (parse_password(password)?, false),
        None => (generate(), true),
    };

    let hashed_password = hash(&password).map_err(Error::internal_server_error)?;

    let values = ChangePasswordValues {
        session_id: &Uuid::new_v4(),
        hashed_password: &hashed_password,
    };

    let updated_user = storage
        .change_password(user, &values)
        .await
        .map_err(Error::internal_server_error)?;

    Ok((updated_user, generated.then_some(password)))
}

/// Fetch a user from storage
async fn fetch_user<S: Storage>(storage: &S, user_id: &Uuid) -> Result<User, Error> {
    storage
        .find_single_user_by_id(user_id)
        .await
        .map_err(Error::internal_server_error)?
        .ok_or_else(|| Error::not_found("User not found"))
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn parse_email(email: &str) -> Result<String, Error> {
    let email = normalize_email(email);

    let valid = email
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && !domain.is_empty())
        && !email.contains(char::is_whitespace);

    if valid {
        Ok(email)
    } else {
        Err(Error::bad_request("Invalid email address"))
    }
}

fn parse_password(password: String) -> Result<String, Error> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(Error::bad_request(format!(
            "Password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }

    Ok(password)
}
