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

use imagineai::{app, auth, db, history, JWTConfig};

mod common;

#[tokio::test]
async fn history_flow() {
    let pool = common::db_pool().await;
    let api = app(
        pool.clone(),
        Some(JWTConfig::Secret(common::secret())),
        common::provider(),
    )
    .await
    .expect("app initialized");

    // Two users.
    let mut tokens = Vec::new();
    let mut ids = Vec::new();
    for name in &["alice", "bob"] {
        let res = warp::test::request()
            .method("POST")
            .path("/api/signup")
            .header("Content-Type", "application/json")
            .json(&auth::Signup {
                username: name.to_string(),
                email: format!("{}@example.com", name),
                password: "hunter2".to_string(),
            })
            .reply(&api)
            .await;
        assert_eq!(res.status(), 200, "signup succeeds");
        let body = String::from_utf8_lossy(res.body());
        let resp = serde_json::from_str::<auth::AuthResp>(body.as_ref())
            .expect("signup responds with valid data");
        tokens.push(resp.token);
        ids.push(resp.user.id);
    }
    let (alice_token, bob_token) = (tokens[0].clone(), tokens[1].clone());
    let alice_id = ids[0];

    // Seed 25 generated images for alice, oldest first. The ids are the
    // insertion order, so the newest-first ordering is ids 25..1.
    let conn = db::get_db_conn(&pool).await.expect("connection");
    let mut image_ids = Vec::new();
    for n in 1..=25 {
        let payload = format!(
            "data:image/png;base64,{}",
            base64::encode(format!("image bytes {}", n))
        );
        let row = conn
            .query_one(
                "INSERT INTO generated_images (user_id, prompt, image_data) \
                 VALUES ($1, $2, $3) RETURNING id",
                &[&alice_id, &format!("prompt {}", n), &payload],
            )
            .await
            .expect("seed row inserted");
        image_ids.push(row.get::<_, i32>("id"));
    }
    let newest = *image_ids.last().unwrap();

    // Page through the full history, checking the window contract.
    let mut seen = Vec::new();
    for (page, expected_len, expected_more) in &[(0u32, 12usize, true), (1, 12, true), (2, 1, false)] {
        let res = warp::test::request()
            .method("GET")
            .path(&format!(
                "/api/history-metadata?page={}&limit=12",
                page
            ))
            .header("Authorization", format!("Bearer {}", alice_token))
            .reply(&api)
            .await;
        assert_eq!(res.status(), 200, "history page loads");
        let body = String::from_utf8_lossy(res.body());
        let page_resp = serde_json::from_str::<history::HistoryPage>(body.as_ref())
            .expect("history responds with valid data");
        assert_eq!(page_resp.items.len(), *expected_len, "page window size");
        assert_eq!(page_resp.has_more, *expected_more, "hasMore boundary");
        seen.extend(page_resp.items.iter().map(|i| i.id));
    }
    assert_eq!(seen.len(), 25, "every row appears exactly once");
    assert_eq!(seen[0], newest, "newest row leads the first page");
    assert!(
        seen.windows(2).all(|w| w[0] > w[1]),
        "strictly newest-first across pages"
    );

    // Defaults apply when the query is empty.
    let res = warp::test::request()
        .method("GET")
        .path("/api/history-metadata")
        .header("Authorization", format!("Bearer {}", alice_token))
        .reply(&api)
        .await;
    assert_eq!(res.status(), 200);
    let body = String::from_utf8_lossy(res.body());
    let page_resp = serde_json::from_str::<history::HistoryPage>(body.as_ref()).unwrap();
    assert_eq!(page_resp.items.len(), 12, "default limit is one dozen");

    // A zero limit is rejected.
    let res = warp::test::request()
        .method("GET")
        .path("/api/history-metadata?page=0&limit=0")
        .header("Authorization", format!("Bearer {}", alice_token))
        .reply(&api)
        .await;
    assert_eq!(res.status(), 400, "limit must be positive");

    // Bob sees an empty history, not alice's.
    let res = warp::test::request()
        .method("GET")
        .path("/api/history-metadata?page=0&limit=12")
        .header("Authorization", format!("Bearer {}", bob_token))
        .reply(&api)
        .await;
    assert_eq!(res.status(), 200);
    let body = String::from_utf8_lossy(res.body());
    let page_resp = serde_json::from_str::<history::HistoryPage>(body.as_ref()).unwrap();
    assert!(page_resp.items.is_empty(), "history is scoped to its owner");
    assert!(!page_resp.has_more);

    // The owner fetches a full payload.
    let res = warp::test::request()
        .method("GET")
        .path(&format!("/api/image/{}", image_ids[2]))
        .header("Authorization", format!("Bearer {}", alice_token))
        .reply(&api)
        .await;
    assert_eq!(res.status(), 200, "owner reads the payload");
    let body = String::from_utf8_lossy(res.body());
    let image = serde_json::from_str::<history::ImageResp>(body.as_ref())
        .expect("image responds with valid data");
    assert_eq!(
        image.image_data,
        format!("data:image/png;base64,{}", base64::encode("image bytes 3"))
    );

    // Another user's image and a nonexistent image respond identically.
    let foreign = warp::test::request()
        .method("GET")
        .path(&format!("/api/image/{}", image_ids[2]))
        .header("Authorization", format!("Bearer {}", bob_token))
        .reply(&api)
        .await;
    assert_eq!(foreign.status(), 404, "ownership is not leaked");
    let missing = warp::test::request()
        .method("GET")
        .path("/api/image/99999")
        .header("Authorization", format!("Bearer {}", bob_token))
        .reply(&api)
        .await;
    assert_eq!(missing.status(), 404);
    assert_eq!(
        foreign.body(),
        missing.body(),
        "not-owned and absent are indistinguishable"
    );

    // No token at all.
    let res = warp::test::request()
        .method("GET")
        .path("/api/history-metadata?page=0&limit=12")
        .reply(&api)
        .await;
    assert_eq!(res.status(), 401, "history requires a token");

    // Download decodes the stored data URI back into raw bytes.
    let res = warp::test::request()
        .method("GET")
        .path(&format!("/api/download/{}", image_ids[4]))
        .header("Authorization", format!("Bearer {}", alice_token))
        .reply(&api)
        .await;
    assert_eq!(res.status(), 200, "owner downloads the image");
    assert_eq!(
        res.headers()
            .get("Content-Type")
            .map(|v| v.to_str().unwrap()),
        Some("image/png")
    );
    assert!(res
        .headers()
        .get("Content-Disposition")
        .map(|v| v.to_str().unwrap().contains(".png"))
        .unwrap_or(false));
    assert_eq!(res.body().as_ref(), &b"image bytes 5"[..]);

    // Downloads enforce the same ownership rule.
    let res = warp::test::request()
        .method("GET")
        .path(&format!("/api/download/{}", image_ids[4]))
        .header("Authorization", format!("Bearer {}", bob_token))
        .reply(&api)
        .await;
    assert_eq!(res.status(), 404, "downloads are owner-only");

    db::uninit_db(&pool).await.expect("schema dropped");
}
