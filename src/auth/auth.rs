use crate::{
    auth::jwt::verify_token,
    config::Config,
    model::role::Role,
    models::{Claims, TokenType},
};
use actix_web::{
    FromRequest, HttpMessage, HttpRequest,
    dev::Payload,
    error::{ErrorBadRequest, ErrorForbidden, ErrorInternalServerError, ErrorUnauthorized},
    web::Data,
};
use futures::future::{Ready, ready};

#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: u64,
    pub username: String,
    pub role: Role,

    /// Present only if this user is linked to a member record
    pub member_id: Option<u64>,
}

impl AuthUser {
    /// Builds the caller from an access token's claims.
    pub fn from_claims(claims: Claims) -> Result<Self, &'static str> {
        if claims.token_type != TokenType::Access {
            return Err("Access token required");
        }

        let role = Role::from_id(claims.role).ok_or("Invalid role")?;

        Ok(AuthUser {
            user_id: claims.user_id,
            username: claims.sub,
            role,
            member_id: claims.member_id,
        })
    }
}

impl FromRequest for AuthUser {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        // Set by auth_middleware on protected scopes.
        if let Some(user) = req.extensions().get::<AuthUser>() {
            return ready(Ok(user.clone()));
        }

        let token = match req
            .headers()
            .get("Authorization")
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer "))
        {
            Some(t) => t,
            None => return ready(Err(ErrorUnauthorized("Missing token"))),
        };

        let config = match req.app_data::<Data<Config>>() {
            Some(c) => c,
            None => return ready(Err(ErrorInternalServerError("Config missing"))),
        };

        let claims = match verify_token(token, &config.jwt_secret) {
            Ok(c) => c,
            Err(_) => return ready(Err(ErrorUnauthorized("Invalid token"))),
        };

        ready(AuthUser::from_claims(claims).map_err(ErrorUnauthorized))
    }
}

impl AuthUser {
    pub fn require_admin(&self) -> actix_web::Result<()> {
        if self.role == Role::Admin {
            Ok(())
        } else {
            Err(ErrorForbidden("Admin only"))
        }
    }

    pub fn require_staff_or_admin(&self) -> actix_web::Result<()> {
        if self.role.is_staff_or_admin() {
            Ok(())
        } else {
            Err(ErrorForbidden("Staff/Admin only"))
        }
    }

    /// Member profile linked to this account.
    pub fn own_member_id(&self) -> actix_web::Result<u64> {
        self.member_id
            .ok_or_else(|| ErrorForbidden("No member profile"))
    }

    /// Which member a request acts on.
    ///
    /// Staff and admins name the member explicitly; members may only act on
    /// themselves and may omit the id.
    pub fn acting_for(&self, requested: Option<u64>) -> actix_web::Result<u64> {
        if self.role.is_staff_or_admin() {
            return match requested.or(self.member_id) {
                Some(id) => Ok(id),
                None => Err(ErrorBadRequest("member_id is required")),
            };
        }

        let own = self.own_member_id()?;
        match requested {
            Some(id) if id != own => Err(ErrorForbidden("Members may only act on themselves")),
            _ => Ok(own),
        }
    }
}
