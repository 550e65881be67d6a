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

use std::{convert::Infallible, env, fs, path::PathBuf};

use jsonwebtoken::{DecodingKey, EncodingKey};
use warp::{Filter, Reply};

pub mod guard;

pub mod auth;
pub mod generate;
pub mod history;
pub mod provider;

pub mod client;

pub mod db;

mod error;
pub use error::{handle_rejects, Error};

/// Source of the JWT signing material. `None` at the `app` boundary falls
/// back to the environment.
pub enum JWTConfig {
    Secret(String),
    RsaPem {
        private_key: PathBuf,
        public_key: PathBuf,
    },
}

pub async fn app(
    db_pool: db::Pool,
    jwt: Option<JWTConfig>,
    provider: provider::Client,
) -> Result<impl Filter<Extract = impl Reply, Error = Infallible> + Clone, Error> {
    let (jwt_priv, jwt_pub) = resolve_jwt_keys(jwt)?;

    let auth_api = auth::api(db_pool.clone(), jwt_priv, jwt_pub.clone());
    let generate_api = generate::api(db_pool.clone(), jwt_pub.clone(), provider);
    let history_api = history::api(db_pool, jwt_pub);

    let route = warp::path("api")
        .and(auth_api.or(generate_api).or(history_api))
        .with(warp::filters::trace::request())
        .recover(handle_rejects);
    Ok(route)
}

/// Resolves the signing keys from an explicit config, the `JWT_SECRET` or
/// `JWT_PRIVATE_KEY`/`JWT_PUBLIC_KEY` environment, or an ephemeral random
/// secret. An ephemeral secret invalidates all outstanding tokens on
/// restart.
fn resolve_jwt_keys(jwt: Option<JWTConfig>) -> Result<(EncodingKey, DecodingKey<'static>), Error> {
    let config = match jwt {
        Some(config) => Some(config),
        None => match env::var("JWT_SECRET") {
            Ok(secret) => Some(JWTConfig::Secret(secret)),
            _ => match (env::var("JWT_PRIVATE_KEY"), env::var("JWT_PUBLIC_KEY")) {
                (Ok(private), Ok(public)) => Some(JWTConfig::RsaPem {
                    private_key: private.into(),
                    public_key: public.into(),
                }),
                _ => None,
            },
        },
    };

    Ok(match config {
        Some(JWTConfig::Secret(secret)) => (
            EncodingKey::from_secret(secret.as_bytes()),
            DecodingKey::from_secret(secret.as_bytes()).into_static(),
        ),
        Some(JWTConfig::RsaPem {
            private_key,
            public_key,
        }) => (
            EncodingKey::from_rsa_pem(fs::read(private_key)?.as_ref())?,
            DecodingKey::from_rsa_pem(fs::read(public_key)?.as_ref())?.into_static(),
        ),
        None => {
            let secret = auth::random_string(32);
            (
                EncodingKey::from_secret(secret.as_bytes()),
                DecodingKey::from_secret(secret.as_bytes()).into_static(),
            )
        }
    })
}
