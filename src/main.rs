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

use std::env;

use imagineai::{app, db, provider};

const DEFAULT_DATABASE_URL: &str = "postgres://postgres@0.0.0.0:5432";
const DEFAULT_PORT: u16 = 3000;

#[tokio::main]
async fn main() -> Result<(), imagineai::Error> {
    tracing_subscriber::fmt::init();

    let db_url = env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string());
    let db_pool = db::create_pool(db_url.as_str())?;
    db::init_db(&db_pool).await?;

    let provider = provider::Client::from_env()?;
    let api = app(db_pool, None, provider).await?;

    let port = env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(DEFAULT_PORT);
    tracing::info!(port = port, "listening");
    warp::serve(api).run(([0, 0, 0, 0], port)).await;
    Ok(())
}
