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

use std::process::Command;

use imagineai::{db, provider};

/// Spawns a throwaway postgres instance via pg_tmp and returns a pool with
/// the schema applied. Each test gets its own database.
pub async fn db_pool() -> db::Pool {
    let out = Command::new("pg_tmp")
        .output()
        .expect("valid pg_tmp instance");
    let url = String::from_utf8(out.stdout).expect("pg_tmp prints a connection url");
    let pool = db::create_pool(url.trim()).expect("valid database pool");
    db::init_db(&pool).await.expect("schema applied");
    pool
}

pub fn secret() -> String {
    "integration-test-secret".to_string()
}

/// A provider client that never gets called by the auth or history flows.
pub fn provider() -> provider::Client {
    provider::Client::new("test-api-key")
}
