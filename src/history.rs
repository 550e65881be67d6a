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

use chrono::{DateTime, Utc};
use jsonwebtoken::DecodingKey;
use mobc_postgres::tokio_postgres::row::Row;
use serde::{Deserialize, Serialize};
use warp::{
    http::Response,
    reply::{json, Json},
    Filter, Rejection, Reply,
};

use crate::{auth::BearerToken, db, guard, Error};

pub const DEFAULT_PAGE_SIZE: u32 = 12;

pub fn api(
    db_pool: db::Pool,
    jwt_key: DecodingKey<'static>,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let history_metadata = warp::get()
        .and(warp::path("history-metadata"))
        .and(warp::path::end())
        .and(guard::authentic_user_header(jwt_key.clone()))
        .and(warp::query())
        .and(guard::with_db(db_pool.clone()))
        .and_then(list_history_page);

    let image = warp::get()
        .and(warp::path("image"))
        .and(warp::path::param())
        .and(warp::path::end())
        .and(guard::authentic_user_header(jwt_key.clone()))
        .and(guard::with_db(db_pool.clone()))
        .and_then(read_image);

    let download = warp::get()
        .and(warp::path("download"))
        .and(warp::path::param())
        .and(warp::path::end())
        .and(guard::authentic_user_header(jwt_key))
        .and(guard::with_db(db_pool))
        .and_then(download_image);

    history_metadata.or(image).or(download)
}

/// One history entry without its payload. `created_at` stays snake_case on
/// the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryPageItem {
    pub id: i32,
    pub prompt: String,
    pub created_at: DateTime<Utc>,
}

impl<'a> From<&'a Row> for HistoryPageItem {
    fn from(row: &'a Row) -> Self {
        HistoryPageItem {
            id: row.get("id"),
            prompt: row.get("prompt"),
            created_at: row.get("created_at"),
        }
    }
}

/// One metadata page plus whether rows remain beyond it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryPage {
    pub items: Vec<HistoryPageItem>,
    pub has_more: bool,
}

/// The response type of a single-image fetch.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageResp {
    pub image_data: String,
}

#[derive(Serialize, Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

async fn list_history_page(
    token: BearerToken,
    query: PageQuery,
    pool: db::Pool,
) -> Result<Json, Rejection> {
    let page = query.page.unwrap_or(0);
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE);
    if limit == 0 {
        return Err(Error::Validation("limit must be at least 1".to_string()).into());
    }

    let offset = i64::from(page) * i64::from(limit);
    // One row past the window answers hasMore without a second count query.
    let probe = i64::from(limit) + 1;

    let conn = db::get_db_conn(&pool).await?;
    let rows = conn
        .query(
            r#"
            SELECT id, prompt, created_at FROM generated_images
            WHERE user_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2 OFFSET $3
            "#,
            &[&token.user_id, &probe, &offset],
        )
        .await
        .map_err(Error::DBError)?;

    let has_more = rows.len() > limit as usize;
    let items = rows
        .iter()
        .take(limit as usize)
        .map(HistoryPageItem::from)
        .collect();
    Ok(json(&HistoryPage { items, has_more }))
}

async fn read_image(image_id: i32, token: BearerToken, pool: db::Pool) -> Result<Json, Rejection> {
    let conn = db::get_db_conn(&pool).await?;
    let row = conn
        .query_opt(
            "SELECT image_data FROM generated_images WHERE id = $1 AND user_id = $2",
            &[&image_id, &token.user_id],
        )
        .await
        .map_err(Error::DBError)?
        .ok_or(Error::NotFound)?;
    Ok(json(&ImageResp {
        image_data: row.get("image_data"),
    }))
}

async fn download_image(
    image_id: i32,
    token: BearerToken,
    pool: db::Pool,
) -> Result<impl Reply, Rejection> {
    let conn = db::get_db_conn(&pool).await?;
    let row = conn
        .query_opt(
            "SELECT image_data FROM generated_images WHERE id = $1 AND user_id = $2",
            &[&image_id, &token.user_id],
        )
        .await
        .map_err(Error::DBError)?
        .ok_or(Error::NotFound)?;

    let data_uri: String = row.get("image_data");
    let encoded = data_uri.splitn(2, ',').nth(1).unwrap_or_default();
    let bytes = base64::decode(encoded).map_err(Error::Base64Error)?;

    let resp = Response::builder()
        .header("Content-Type", "image/png")
        .header(
            "Content-Disposition",
            format!("attachment; filename=\"generated-image-{}.png\"", image_id),
        )
        .body(bytes)
        .map_err(Error::ResponseError)?;
    Ok(resp)
}
