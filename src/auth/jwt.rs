use chrono::Utc;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::Error};
use uuid::Uuid;

use crate::models::{Claims, TokenType};

/// Who a token is issued to.
#[derive(Debug, Clone)]
pub struct Subject {
    pub user_id: u64,
    pub username: String,
    pub role: u8,
    pub member_id: Option<u64>,
}

impl From<&Claims> for Subject {
    fn from(claims: &Claims) -> Self {
        Self {
            user_id: claims.user_id,
            username: claims.sub.clone(),
            role: claims.role,
            member_id: claims.member_id,
        }
    }
}

fn now() -> usize {
    Utc::now().timestamp().max(0) as usize
}

/// Signs a token of `token_type` valid for `ttl` seconds.
pub fn issue_token(
    subject: &Subject,
    token_type: TokenType,
    secret: &str,
    ttl: usize,
) -> Result<(String, Claims), Error> {
    let claims = Claims {
        user_id: subject.user_id,
        sub: subject.username.clone(),
        role: subject.role,
        exp: now() + ttl,
        jti: Uuid::new_v4().to_string(),
        token_type,
        member_id: subject.member_id,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok((token, claims))
}

pub fn verify_token(token: &str, secret: &str) -> Result<Claims, Error> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
}

/// `Authorization` header carrying an access token signed with the
/// [`Config::for_tests`](crate::config::Config::for_tests) secret.
#[cfg(test)]
pub fn access_header(role: crate::model::role::Role, member_id: Option<u64>) -> (&'static str, String) {
    let subject = Subject {
        user_id: 7,
        username: "someone@example.com".into(),
        role: role.id(),
        member_id,
    };
    let secret = crate::config::Config::for_tests().jwt_secret;
    let (token, _) = issue_token(&subject, TokenType::Access, &secret, 60)
        .unwrap_or_else(|e| panic!("signing test token: {e}"));

    ("Authorization", format!("Bearer {token}"))
}
