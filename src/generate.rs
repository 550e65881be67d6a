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

use jsonwebtoken::DecodingKey;
use serde::{Deserialize, Serialize};
use warp::{
    reply::{json, Json},
    Filter, Rejection, Reply,
};

use crate::{auth::BearerToken, db, guard, provider, Error};

pub fn api(
    db_pool: db::Pool,
    jwt_key: DecodingKey<'static>,
    provider: provider::Client,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    warp::post()
        .and(warp::path("generate-image"))
        .and(warp::path::end())
        .and(guard::authentic_user_header(jwt_key))
        .and(warp::body::content_length_limit(1024 * 64))
        .and(warp::body::json())
        .and(guard::with_db(db_pool))
        .and(guard::with_provider(provider))
        .and_then(generate_image)
}

#[derive(Serialize, Deserialize)]
pub struct GenerateReq {
    #[serde(default)]
    pub prompt: String,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResp {
    pub image_id: i32,
    pub image_data: String,
    pub prompt: String,
}

async fn generate_image(
    token: BearerToken,
    req: GenerateReq,
    pool: db::Pool,
    provider: provider::Client,
) -> Result<Json, Rejection> {
    let prompt = req.prompt.trim();
    if prompt.is_empty() {
        return Err(Error::Validation("Prompt is required".to_string()).into());
    }

    tracing::info!(user_id = token.user_id, prompt = %prompt, "generating image");
    let image = provider.generate(prompt).await.map_err(Rejection::from)?;
    let image_data = image.to_data_uri();

    // The image exists at this point; a failed insert must not be reported
    // as a generation failure.
    let conn = db::get_db_conn(&pool).await?;
    let row = conn
        .query_one(
            r#"
            INSERT INTO generated_images (user_id, prompt, image_data)
            VALUES ($1, $2, $3)
            RETURNING id
            "#,
            &[&token.user_id, &prompt, &image_data],
        )
        .await
        .map_err(Error::SaveFailed)?;

    Ok(json(&GenerateResp {
        image_id: row.get("id"),
        image_data,
        prompt: prompt.to_string(),
    }))
}
