//! Record CRUD and optimistic concurrency over real HTTP.

use axum::http::StatusCode;
use serde_json::{json, Value};

use greenlight::auth::principal::codes;

mod common;

async fn writer(app: &common::TestApp) -> String {
    let (_, token) = app
        .seed_principal(
            "writer@example.com",
            true,
            &[codes::RECORDS_READ, codes::RECORDS_WRITE],
        )
        .await;
    token
}

async fn create(app: &common::TestApp, token: &str, body: Value) -> reqwest::Response {
    app.client
        .post(app.url("/v1/records"))
        .bearer_auth(token)
        .json(&body)
        .send()
        .await
        .unwrap()
}

#[tokio::test]
async fn test_record_lifecycle() {
    let app = common::spawn_app(common::test_config()).await;
    let token = writer(&app).await;

    let res = create(
        &app,
        &token,
        json!({ "title": "Casablanca", "year": 1942, "tags": ["drama", "romance"] }),
    )
    .await;
    assert_eq!(res.status(), StatusCode::CREATED);
    assert_eq!(res.headers().get("location").unwrap(), "/v1/records/1");
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["record"]["version"], 1);

    let res = app
        .client
        .get(app.url("/v1/records/1"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["record"]["title"], "Casablanca");

    let res = app
        .client
        .patch(app.url("/v1/records/1"))
        .bearer_auth(&token)
        .json(&json!({ "year": 1943 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["record"]["year"], 1943);
    assert_eq!(body["record"]["title"], "Casablanca");
    assert_eq!(body["record"]["version"], 2);

    let res = app
        .client
        .delete(app.url("/v1/records/1"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = app
        .client
        .get(app.url("/v1/records/1"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    app.stop().await.unwrap();
}

#[tokio::test]
async fn test_invalid_input() {
    let app = common::spawn_app(common::test_config()).await;
    let token = writer(&app).await;

    let res = create(&app, &token, json!({ "title": "", "year": 1800, "tags": [] })).await;
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"]["title"], "must be provided");
    assert_eq!(body["error"]["year"], "must be greater than 1888");
    assert_eq!(body["error"]["tags"], "must contain at least 1 tag");

    let res = app
        .client
        .post(app.url("/v1/records"))
        .bearer_auth(&token)
        .header("content-type", "application/json")
        .body("{\"title\": ")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = app
        .client
        .get(app.url("/v1/records/abc"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = app
        .client
        .get(app.url("/v1/records?page=0&sort=rating"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = res.json().await.unwrap();
    assert!(body["error"]["page"].is_string());
    assert!(body["error"]["sort"].is_string());

    app.stop().await.unwrap();
}

#[tokio::test]
async fn test_duplicate_title_is_rejected() {
    let app = common::spawn_app(common::test_config()).await;
    let token = writer(&app).await;
    let body = json!({ "title": "Heat", "year": 1995, "tags": ["crime"] });

    assert_eq!(create(&app, &token, body.clone()).await.status(), StatusCode::CREATED);
    let res = create(&app, &token, body).await;
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"]["title"], "a record with this title already exists");

    app.stop().await.unwrap();
}

#[tokio::test]
async fn test_list_filters_and_paginates() {
    let app = common::spawn_app(common::test_config()).await;
    let token = writer(&app).await;
    for (title, year, tags) in [
        ("Alien", 1979, vec!["horror", "scifi"]),
        ("Aliens", 1986, vec!["action", "scifi"]),
        ("Brazil", 1985, vec!["scifi"]),
        ("Clue", 1985, vec!["comedy"]),
    ] {
        let res = create(&app, &token, json!({ "title": title, "year": year, "tags": tags })).await;
        assert_eq!(res.status(), StatusCode::CREATED);
    }

    let res = app
        .client
        .get(app.url("/v1/records?title=alien&tags=scifi&sort=-year"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    let titles: Vec<&str> = body["records"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["title"].as_str().unwrap())
        .collect();
    assert_eq!(titles, ["Aliens", "Alien"]);
    assert_eq!(body["metadata"]["total_records"], 2);

    let res = app
        .client
        .get(app.url("/v1/records?page=2&page_size=3"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["records"].as_array().unwrap().len(), 1);
    assert_eq!(body["metadata"]["current_page"], 2);
    assert_eq!(body["metadata"]["last_page"], 2);

    app.stop().await.unwrap();
}

#[tokio::test]
async fn test_concurrent_updates_have_one_winner() {
    let app = common::spawn_app(common::test_config()).await;
    let token = writer(&app).await;
    let res = create(
        &app,
        &token,
        json!({ "title": "Ran", "year": 1985, "tags": ["war"] }),
    )
    .await;
    assert_eq!(res.status(), StatusCode::CREATED);

    let patch = |year: i32| {
        app.client
            .patch(app.url("/v1/records/1"))
            .bearer_auth(&token)
            .header("X-Expected-Version", "1")
            .json(&json!({ "year": year }))
            .send()
    };
    let (a, b) = tokio::join!(patch(1986), patch(1987));
    let mut statuses = [a.unwrap().status(), b.unwrap().status()];
    statuses.sort();
    assert_eq!(statuses, [StatusCode::OK, StatusCode::CONFLICT]);

    let res = app
        .client
        .get(app.url("/v1/records/1"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["record"]["version"], 2);

    app.stop().await.unwrap();
}

#[tokio::test]
async fn test_stale_expected_version_conflicts() {
    let app = common::spawn_app(common::test_config()).await;
    let token = writer(&app).await;
    create(
        &app,
        &token,
        json!({ "title": "Ikiru", "year": 1952, "tags": ["drama"] }),
    )
    .await;

    let res = app
        .client
        .patch(app.url("/v1/records/1"))
        .bearer_auth(&token)
        .header("X-Expected-Version", "7")
        .json(&json!({ "tags": ["drama", "classic"] }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);
    let body: Value = res.json().await.unwrap();
    assert_eq!(
        body["error"],
        "unable to update the record due to an edit conflict, please try again"
    );

    let res = app
        .client
        .patch(app.url("/v1/records/1"))
        .bearer_auth(&token)
        .header("X-Expected-Version", "not-a-number")
        .json(&json!({ "year": 1953 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    app.stop().await.unwrap();
}
