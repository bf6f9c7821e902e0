use crate::{
    auth::{
        auth::AuthUser,
        jwt::{Subject, issue_token, verify_token},
        password::{MIN_PASSWORD_LEN, hash_password, verify_password},
    },
    config::Config,
    model::{role::Role, user::User},
    models::{Claims, LoginReqDto, TokenPair, TokenType, UserReq},
};
use actix_web::{HttpRequest, HttpResponse, error::ErrorInternalServerError, web};
use serde_json::json;
use sqlx::MySqlPool;
use tracing::{debug, error, info, instrument};

fn bearer(req: &HttpRequest) -> Option<&str> {
    req.headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
}

fn internal<E: std::fmt::Display>(context: &'static str) -> impl Fn(E) -> actix_web::Error {
    move |e| {
        error!(error = %e, "{context}");
        ErrorInternalServerError("Internal Server Error")
    }
}

/// Issues an access/refresh pair and records the refresh token's jti.
async fn issue_pair(
    subject: &Subject,
    pool: &MySqlPool,
    config: &Config,
) -> actix_web::Result<TokenPair> {
    let (access_token, _) = issue_token(
        subject,
        TokenType::Access,
        &config.jwt_secret,
        config.access_token_ttl,
    )
    .map_err(internal("Failed to sign access token"))?;

    let (refresh_token, refresh_claims) = issue_token(
        subject,
        TokenType::Refresh,
        &config.jwt_secret,
        config.refresh_token_ttl,
    )
    .map_err(internal("Failed to sign refresh token"))?;

    debug!(user_id = subject.user_id, jti = %refresh_claims.jti, "Storing refresh token");

    sqlx::query(
        r#"
        INSERT INTO refresh_tokens (user_id, jti, expires_at)
        VALUES (?, ?, FROM_UNIXTIME(?))
        "#,
    )
    .bind(subject.user_id)
    .bind(&refresh_claims.jti)
    .bind(refresh_claims.exp as i64)
    .execute(pool)
    .await
    .map_err(internal("Failed to store refresh token"))?;

    Ok(TokenPair {
        access_token,
        refresh_token,
    })
}

/// Register a member account
///
/// The new account is not linked to any member profile. Staff attach it with
/// `PUT /api/members/{id}/account`; the link shows up in tokens issued after
/// that, on the next login or refresh.
#[utoipa::path(
    post,
    path = "/auth/register",
    request_body = UserReq,
    responses(
        (status = 201, description = "User registered", body = Object, example = json!({
            "message": "User registered successfully",
            "user_id": 7
        })),
        (status = 400, description = "Invalid username or password"),
        (status = 409, description = "Username already taken"),
        (status = 429, description = "Too many requests")
    ),
    tag = "Auth"
)]
#[instrument(name = "auth_register", skip(user, pool), fields(username = %user.username))]
pub async fn register(
    user: web::Json<UserReq>,
    pool: web::Data<MySqlPool>,
) -> actix_web::Result<HttpResponse> {
    let username = user.username.trim().to_lowercase();

    if username.is_empty() {
        return Ok(HttpResponse::BadRequest().json(json!({
            "message": "Username must not be empty"
        })));
    }
    if user.password.chars().count() < MIN_PASSWORD_LEN {
        return Ok(HttpResponse::BadRequest().json(json!({
            "message": format!("Password must be at least {MIN_PASSWORD_LEN} characters")
        })));
    }

    let hashed = hash_password(&user.password).map_err(internal("Failed to hash password"))?;

    let inserted = sqlx::query(
        r#"
        INSERT INTO users (username, password, role_id, member_id)
        VALUES (?, ?, ?, NULL)
        "#,
    )
    .bind(&username)
    .bind(&hashed)
    .bind(Role::Member.id())
    .execute(pool.get_ref())
    .await;

    let user_id = match inserted {
        Ok(done) => done.last_insert_id(),
        Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
            info!("Registration refused: username taken");
            return Ok(HttpResponse::Conflict().json(json!({
                "message": "Username already taken"
            })));
        }
        Err(e) => return Err(internal("Failed to register user")(e)),
    };

    info!(user_id, "User registered");

    Ok(HttpResponse::Created().json(json!({
        "message": "User registered successfully",
        "user_id": user_id
    })))
}

/// Log in
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginReqDto,
    responses(
        (status = 200, description = "Token pair", body = TokenPair),
        (status = 400, description = "Username or password missing"),
        (status = 401, description = "Invalid credentials"),
        (status = 429, description = "Too many requests")
    ),
    tag = "Auth"
)]
#[instrument(
    name = "auth_login",
    skip(pool, config, user),
    fields(username = %user.username)
)]
pub async fn login(
    user: web::Json<LoginReqDto>,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> actix_web::Result<HttpResponse> {
    info!("Login request received");

    if user.username.trim().is_empty() || user.password.is_empty() {
        info!("Validation failed: empty username or password");
        return Ok(HttpResponse::BadRequest().json(json!({
            "message": "Username or password required"
        })));
    }

    let username = user.username.trim().to_lowercase();

    let db_user = sqlx::query_as::<_, User>(
        r#"
        SELECT id, username, password, role_id, member_id, is_active
        FROM users
        WHERE username = ?
        "#,
    )
    .bind(&username)
    .fetch_optional(pool.get_ref())
    .await
    .map_err(internal("Database error while fetching user"))?;

    let invalid = || {
        HttpResponse::Unauthorized().json(json!({
            "message": "Invalid credentials"
        }))
    };

    let db_user = match db_user {
        Some(u) => u,
        None => {
            info!("Invalid credentials: user not found");
            return Ok(invalid());
        }
    };

    if let Err(e) = verify_password(&user.password, &db_user.password) {
        info!(error = %e, "Invalid credentials: password mismatch");
        return Ok(invalid());
    }

    if !db_user.is_active {
        info!(user_id = db_user.id, "Login refused: account disabled");
        return Ok(HttpResponse::Forbidden().json(json!({
            "message": "Account is disabled"
        })));
    }

    let subject = Subject {
        user_id: db_user.id,
        username: db_user.username.clone(),
        role: db_user.role_id,
        member_id: db_user.member_id,
    };
    let tokens = issue_pair(&subject, pool.get_ref(), &config).await?;

    if let Err(e) = sqlx::query("UPDATE users SET last_login_at = NOW() WHERE id = ?")
        .bind(db_user.id)
        .execute(pool.get_ref())
        .await
    {
        // Not worth failing the login over.
        error!(error = %e, "Failed to update last_login_at");
    }

    info!(user_id = db_user.id, "Login successful");

    Ok(HttpResponse::Ok().json(tokens))
}

/// Exchange a refresh token for a new pair
///
/// The presented refresh token is revoked; replaying it fails.
#[utoipa::path(
    post,
    path = "/auth/refresh",
    responses(
        (status = 200, description = "New token pair", body = TokenPair),
        (status = 401, description = "Missing, invalid or revoked refresh token")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Auth"
)]
pub async fn refresh_token(
    req: HttpRequest,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> actix_web::Result<HttpResponse> {
    let claims: Claims = match bearer(&req).map(|t| verify_token(t, &config.jwt_secret)) {
        Some(Ok(c)) if c.token_type == TokenType::Refresh => c,
        _ => return Ok(HttpResponse::Unauthorized().finish()),
    };

    // Only the first of two racing refreshes flips the row.
    let revoked = sqlx::query(
        r#"
        UPDATE refresh_tokens
        SET revoked = TRUE
        WHERE jti = ?
        AND revoked = FALSE
        AND expires_at > NOW()
        "#,
    )
    .bind(&claims.jti)
    .execute(pool.get_ref())
    .await
    .map_err(internal("Failed to revoke refresh token"))?;

    if revoked.rows_affected() != 1 {
        info!(user_id = claims.user_id, "Refresh refused: token revoked or unknown");
        return Ok(HttpResponse::Unauthorized().finish());
    }

    // Role or member link may have changed since the token was issued.
    let db_user = sqlx::query_as::<_, User>(
        r#"
        SELECT id, username, password, role_id, member_id, is_active
        FROM users
        WHERE id = ?
        "#,
    )
    .bind(claims.user_id)
    .fetch_optional(pool.get_ref())
    .await
    .map_err(internal("Database error while fetching user"))?;

    let subject = match db_user {
        Some(u) if u.is_active => Subject {
            user_id: u.id,
            username: u.username,
            role: u.role_id,
            member_id: u.member_id,
        },
        _ => return Ok(HttpResponse::Unauthorized().finish()),
    };

    let tokens = issue_pair(&subject, pool.get_ref(), &config).await?;

    Ok(HttpResponse::Ok().json(tokens))
}

/// Revoke a refresh token
///
/// Always answers 204, whether or not the token was known.
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses(
        (status = 204, description = "Logged out")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Auth"
)]
pub async fn logout(
    req: HttpRequest,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> HttpResponse {
    let claims = match bearer(&req).map(|t| verify_token(t, &config.jwt_secret)) {
        Some(Ok(c)) if c.token_type == TokenType::Refresh => c,
        _ => return HttpResponse::NoContent().finish(),
    };

    if let Err(e) = sqlx::query("UPDATE refresh_tokens SET revoked = TRUE WHERE jti = ?")
        .bind(&claims.jti)
        .execute(pool.get_ref())
        .await
    {
        error!(error = %e, "Failed to revoke refresh token on logout");
    }

    HttpResponse::NoContent().finish()
}

/// Current caller
#[utoipa::path(
    get,
    path = "/api/me",
    responses(
        (status = 200, description = "Authenticated user", body = Object, example = json!({
            "user_id": 7,
            "username": "jane@example.com",
            "role": 3,
            "member_id": 42
        })),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Auth"
)]
pub async fn me(auth: AuthUser) -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "user_id": auth.user_id,
        "username": auth.username,
        "role": auth.role.id(),
        "member_id": auth.member_id
    }))
}
