/*
 * Copyright (C) 2020 Oakes, Gregory <gregoryoakes@fastmail.com>
 * Author: Oakes, Gregory <gregory.oakes@fastmail.com>
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as
 * published by the Free Software Foundation, either version 3 of the
 * License, or (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program.  If not, see <http://www.gnu.org/licenses/>.
 */

use std::{
    iter,
    time::{SystemTime, UNIX_EPOCH},
};

use crypto::{digest::Digest, sha3::Sha3};
use jsonwebtoken::{
    decode as jwt_decode, encode as jwt_encode, DecodingKey, EncodingKey, Header as JWTHeader,
    Validation,
};
use mobc_postgres::tokio_postgres::error::SqlState;
use rand::{distributions::Alphanumeric, thread_rng, Rng};
use serde::{Deserialize, Serialize};
use warp::{
    reply::{json, Json},
    Filter, Rejection, Reply,
};

use crate::{db, guard, Error};

const TOKEN_TTL_SECONDS: u64 = 86_400;
const SALT_LEN: usize = 10;

pub fn api(
    db_pool: db::Pool,
    jwt_priv: EncodingKey,
    jwt_pub: DecodingKey<'static>,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let signup = warp::post()
        .and(warp::path("signup"))
        .and(warp::path::end())
        .and(warp::body::content_length_limit(1024 * 16))
        .and(warp::body::json())
        .and(guard::with_db(db_pool.clone()))
        .and(guard::with_jwt_priv_key(jwt_priv.clone()))
        .and_then(signup);

    let login = warp::post()
        .and(warp::path("login"))
        .and(warp::path::end())
        .and(warp::body::content_length_limit(1024 * 16))
        .and(warp::body::json())
        .and(guard::with_db(db_pool))
        .and(guard::with_jwt_priv_key(jwt_priv))
        .and_then(login);

    let verify = warp::get()
        .and(warp::path("verify"))
        .and(warp::path::end())
        .and(guard::authentic_user_header(jwt_pub))
        .and_then(verify);

    signup.or(login).or(verify)
}

/// Claims carried by every bearer token. The numeric id travels in the
/// token so ownership checks never re-query the users table.
#[derive(Debug, Serialize, Deserialize)]
pub struct BearerToken {
    pub iat: u64,
    pub exp: u64,
    pub user_id: i32,
    pub username: String,
    pub email: String,
}

impl BearerToken {
    pub fn verify_token(key: &DecodingKey, raw: &str) -> Result<BearerToken, Error> {
        let validation = Validation {
            leeway: 60,
            ..Default::default()
        };
        Ok(jwt_decode::<BearerToken>(raw, key, &validation)?.claims)
    }
}

/// The input data type of a signup request.
#[derive(Serialize, Deserialize)]
pub struct Signup {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/// The input data type of a login request.
#[derive(Serialize, Deserialize)]
pub struct Login {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserInfo {
    pub id: i32,
    pub username: String,
    pub email: String,
}

/// The response type of a successful signup or login.
#[derive(Serialize, Deserialize)]
pub struct AuthResp {
    pub message: String,
    pub token: String,
    pub user: UserInfo,
}

/// The response type of a token verification.
#[derive(Serialize, Deserialize)]
pub struct VerifyResp {
    pub user: UserInfo,
}

async fn signup(form: Signup, pool: db::Pool, key: EncodingKey) -> Result<Json, Rejection> {
    if form.username.trim().is_empty() || form.email.trim().is_empty() || form.password.is_empty() {
        return Err(Error::Validation("All fields are required".to_string()).into());
    }

    let salt = random_string(SALT_LEN);
    let password_hash = secure_hash(&form.password, &salt);

    let conn = db::get_db_conn(&pool).await?;
    let inserted = conn
        .query_one(
            r#"
            INSERT INTO users (username, email, password_hash, salt)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
            &[&form.username, &form.email, &password_hash, &salt],
        )
        .await;

    let id: i32 = match inserted {
        Ok(row) => row.get("id"),
        Err(e) if e.code() == Some(&SqlState::UNIQUE_VIOLATION) => {
            return Err(
                Error::Validation("Username or email already exists".to_string()).into(),
            )
        }
        Err(e) => return Err(Error::DBError(e).into()),
    };

    let token = generate_jwt(id, &form.username, &form.email, &key)?;
    Ok(json(&AuthResp {
        message: "User created successfully".to_string(),
        token,
        user: UserInfo {
            id,
            username: form.username,
            email: form.email,
        },
    }))
}

async fn login(form: Login, pool: db::Pool, key: EncodingKey) -> Result<Json, Rejection> {
    if form.email.trim().is_empty() || form.password.is_empty() {
        return Err(Error::Validation("Email and password are required".to_string()).into());
    }

    let conn = db::get_db_conn(&pool).await?;
    let row = conn
        .query_opt(
            "SELECT id, username, email, password_hash, salt FROM users WHERE email = $1",
            &[&form.email],
        )
        .await
        .map_err(Error::DBError)?
        .ok_or(Error::Unauthorized)?;

    // An unknown email and a wrong password are indistinguishable.
    let salt: String = row.get("salt");
    let password_hash: String = row.get("password_hash");
    if secure_hash(&form.password, &salt) != password_hash {
        return Err(Error::Unauthorized.into());
    }

    let id: i32 = row.get("id");
    let username: String = row.get("username");
    let email: String = row.get("email");
    let token = generate_jwt(id, &username, &email, &key)?;
    Ok(json(&AuthResp {
        message: "Login successful".to_string(),
        token,
        user: UserInfo {
            id,
            username,
            email,
        },
    }))
}

async fn verify(token: BearerToken) -> Result<Json, Rejection> {
    Ok(json(&VerifyResp {
        user: UserInfo {
            id: token.user_id,
            username: token.username,
            email: token.email,
        },
    }))
}

fn secure_hash(password: &str, salt: &str) -> String {
    let mut hasher = Sha3::sha3_256();
    hasher.input_str(password);
    hasher.input_str(salt);
    hasher.result_str()
}

pub fn random_string(len: usize) -> String {
    let mut rng = thread_rng();
    iter::repeat(())
        .map(|()| rng.sample(Alphanumeric))
        .take(len)
        .collect::<String>()
}

fn generate_jwt(
    user_id: i32,
    username: &str,
    email: &str,
    key: &EncodingKey,
) -> Result<String, Error> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("Time went backwards")
        .as_secs();
    let claims = BearerToken {
        iat: now,
        exp: now + TOKEN_TTL_SECONDS,
        user_id,
        username: username.to_string(),
        email: email.to_string(),
    };
    Ok(jwt_encode(&JWTHeader::default(), &claims, key)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_stable_per_salt() {
        assert_eq!(secure_hash("hunter2", "abc"), secure_hash("hunter2", "abc"));
        assert_ne!(secure_hash("hunter2", "abc"), secure_hash("hunter2", "abd"));
        assert_ne!(secure_hash("hunter2", "abc"), secure_hash("hunter3", "abc"));
    }

    #[test]
    fn random_strings_are_alphanumeric() {
        let s = random_string(32);
        assert_eq!(s.len(), 32);
        assert!(s.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn jwt_round_trip_preserves_claims() {
        let secret = b"test-secret";
        let token =
            generate_jwt(7, "foo", "foo@example.com", &EncodingKey::from_secret(secret)).unwrap();
        let claims =
            BearerToken::verify_token(&DecodingKey::from_secret(secret), &token).unwrap();
        assert_eq!(claims.user_id, 7);
        assert_eq!(claims.username, "foo");
        assert_eq!(claims.email, "foo@example.com");
        assert_eq!(claims.exp, claims.iat + TOKEN_TTL_SECONDS);
    }

    #[test]
    fn expired_tokens_are_rejected() {
        let secret = b"test-secret";
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs();
        let claims = BearerToken {
            iat: now - 7_200,
            exp: now - 3_600,
            user_id: 1,
            username: "foo".to_string(),
            email: "foo@example.com".to_string(),
        };
        let token =
            jwt_encode(&JWTHeader::default(), &claims, &EncodingKey::from_secret(secret)).unwrap();
        assert!(BearerToken::verify_token(&DecodingKey::from_secret(secret), &token).is_err());
    }
}
