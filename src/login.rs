use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use axum::{
    Form,
    extract::State,
    response::Response,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use lazy_static::lazy_static;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, SystemTime};
use uuid::Uuid;

use crate::app::AppState;
use crate::error::{AppError, Result};
use crate::flash::{self, Flash};
use crate::model::User;
use crate::paths;
use crate::store::{NewUser, Store};
use crate::views::ProfileView;

/// An authenticated browser session.
#[derive(Debug, Clone)]
pub struct Session {
    /// Id of the logged-in user
    pub user_id: u64,

    /// Time when the session expires
    pub expires_at: SystemTime,
}

lazy_static! {
    static ref SESSIONS: RwLock<HashMap<String, Session>> = RwLock::new(HashMap::new());
}

pub const SESSION_COOKIE: &str = "session";
const SESSION_DURATION: u64 = 24 * 60 * 60; // 24 hours in seconds

/// Registration form fields
#[derive(Debug, Deserialize)]
pub struct RegisterForm {
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub confirm_password: String,
}

/// Login form fields
#[derive(Debug, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/// Profile edit form fields
#[derive(Debug, Deserialize)]
pub struct ProfileForm {
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}

/// Hash a password with Argon2 and a random salt
///
/// # Arguments
/// * `password` - The plaintext password to hash
///
/// # Returns
/// * `Result<String>` - The PHC-formatted hash
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| AppError::Auth("Password hashing failed".into()))
}

/// Check a plaintext password against a stored Argon2 hash
///
/// # Returns
/// * `Ok(true)` if the password matches, `Ok(false)` if not
///
/// # Errors
/// * Returns `AppError::Auth` if the stored hash is malformed
pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let parsed = PasswordHash::new(hash).map_err(|_| AppError::Auth("Invalid password hash format".into()))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

/// Validate a registration form and create the account
///
/// # Arguments
/// * `store` - Database to add the user to
/// * `form` - Submitted registration fields
///
/// # Errors
/// * `AppError::Auth` with a user-facing message when a field is missing,
///   the passwords differ, or the email is taken
pub fn register_user(store: &Store, form: &RegisterForm) -> Result<User> {
    let first_name = form.first_name.trim();
    let last_name = form.last_name.trim();
    let email = form.email.trim().to_lowercase();

    if first_name.is_empty() || last_name.is_empty() || email.is_empty() || form.password.is_empty() {
        return Err(AppError::Auth("All fields are required.".into()));
    }
    if form.password != form.confirm_password {
        return Err(AppError::Auth("Passwords do not match.".into()));
    }
    if store.user_by_email(&email)?.is_some() {
        return Err(AppError::Auth("Email address is already registered.".into()));
    }

    store.insert_user(NewUser {
        first_name: first_name.to_string(),
        last_name: last_name.to_string(),
        email,
        password_hash: hash_password(&form.password)?,
    })
}

/// Look up a user by email and check their password
///
/// # Returns
/// * `Ok(Some(user))` for valid credentials, `Ok(None)` otherwise
pub fn verify_user(store: &Store, email: &str, password: &str) -> Result<Option<User>> {
    let Some(user) = store.user_by_email(&email.trim().to_lowercase())? else {
        return Ok(None);
    };
    if verify_password(password, &user.password_hash)? {
        Ok(Some(user))
    } else {
        Ok(None)
    }
}

/// Create a new session for `user_id` and return its id
pub fn create_session(user_id: u64) -> String {
    let session_id = Uuid::new_v4().to_string();
    let session = Session {
        user_id,
        expires_at: SystemTime::now() + Duration::from_secs(SESSION_DURATION),
    };
    SESSIONS.write().unwrap().insert(session_id.clone(), session);
    session_id
}

/// User id of a live session, `None` if unknown or expired
pub fn validate_session(session_id: &str) -> Option<u64> {
    let sessions = SESSIONS.read().unwrap();
    sessions
        .get(session_id)
        .filter(|session| session.expires_at > SystemTime::now())
        .map(|session| session.user_id)
}

pub fn end_session(session_id: &str) {
    SESSIONS.write().unwrap().remove(session_id);
}

fn session_cookie(session_id: String) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, session_id))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build()
}

/// The logged-in user, if the request carries a live session.
pub fn session_user(store: &Store, jar: &CookieJar) -> Result<Option<User>> {
    let Some(user_id) = jar
        .get(SESSION_COOKIE)
        .and_then(|cookie| validate_session(cookie.value()))
    else {
        return Ok(None);
    };
    store.user(user_id)
}

/// Like [`session_user`], but a missing session is an error.
pub fn current_user(store: &Store, jar: &CookieJar) -> Result<User> {
    session_user(store, jar)?.ok_or(AppError::LoginRequired)
}

pub async fn register_page(State(state): State<Arc<AppState>>, jar: CookieJar) -> Result<Response> {
    state.render_page(jar, "register", "Register", &())
}

pub async fn handle_register(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Form(form): Form<RegisterForm>,
) -> Result<Response> {
    match register_user(&state.store, &form) {
        Ok(user) => {
            log::info!("registered user {} ({})", user.id, user.email);
            Ok(flash::redirect(
                jar,
                paths::LOGIN,
                Flash::success("Account created. Please log in."),
            ))
        }
        Err(AppError::Auth(message)) => Ok(flash::redirect(jar, paths::REGISTER, Flash::danger(message))),
        Err(e) => Err(e),
    }
}

pub async fn login_page(State(state): State<Arc<AppState>>, jar: CookieJar) -> Result<Response> {
    state.render_page(jar, "login", "Login", &())
}

pub async fn handle_login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Form(form): Form<LoginForm>,
) -> Result<Response> {
    match verify_user(&state.store, &form.email, &form.password)? {
        Some(user) => {
            log::info!("user {} logged in", user.id);
            let jar = jar.add(session_cookie(create_session(user.id)));
            Ok(flash::redirect(jar, paths::HOME, Flash::success("Logged in successfully.")))
        }
        None => Ok(flash::redirect(jar, paths::LOGIN, Flash::danger("Login failed. Check email/password."))),
    }
}

pub async fn handle_logout(jar: CookieJar) -> Response {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        end_session(cookie.value());
    }
    let jar = jar.remove(Cookie::build(SESSION_COOKIE).path("/"));
    flash::redirect(jar, paths::LOGIN, Flash::success("Logged out."))
}

pub async fn profile_page(State(state): State<Arc<AppState>>, jar: CookieJar) -> Result<Response> {
    let user = current_user(&state.store, &jar)?;
    let files = state.store.files_for_user(user.id)?;
    state.render_page(jar, "profile", "Profile", &ProfileView::new(&user, files.len()))
}

pub async fn edit_profile_page(State(state): State<Arc<AppState>>, jar: CookieJar) -> Result<Response> {
    let user = current_user(&state.store, &jar)?;
    let files = state.store.files_for_user(user.id)?;
    state.render_page(jar, "edit_profile", "Edit Profile", &ProfileView::new(&user, files.len()))
}

pub async fn handle_edit_profile(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Form(form): Form<ProfileForm>,
) -> Result<Response> {
    let user = current_user(&state.store, &jar)?;
    let (first_name, last_name) = (form.first_name.trim(), form.last_name.trim());
    if first_name.is_empty() || last_name.is_empty() {
        return Ok(flash::redirect(jar, paths::EDIT_PROFILE, Flash::danger("All fields are required.")));
    }
    state.store.update_user_name(user.id, first_name, last_name)?;
    Ok(flash::redirect(jar, paths::PROFILE, Flash::success("Profile updated.")))
}
