// tests/api_tests.rs

mod common;

use comment_threads::models::comment::DeleteMode;
use common::{eventually, spawn_app, spawn_app_with, test_state};
use serde_json::{Value, json};
use tower::ServiceExt;

async fn create_post(client: &reqwest::Client, address: &str, content: &str) -> i64 {
    let response = client
        .post(format!("{}/api/posts", address))
        .json(&json!({
            "author_id": 1,
            "title": "Hello",
            "content": content,
            "language_code": "en"
        }))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 201);
    let body: Value = response.json().await.unwrap();
    body["id"].as_i64().expect("post id")
}

async fn create_comment(
    client: &reqwest::Client,
    address: &str,
    post_id: i64,
    content: &str,
    parent_id: Option<i64>,
) -> reqwest::Response {
    client
        .post(format!("{}/api/posts/{}/comments", address, post_id))
        .json(&json!({
            "author_id": 2,
            "content": content,
            "parent_id": parent_id
        }))
        .send()
        .await
        .expect("Failed to execute request")
}

async fn comment_id(response: reqwest::Response) -> i64 {
    assert_eq!(response.status().as_u16(), 201);
    let body: Value = response.json().await.unwrap();
    body["id"].as_i64().expect("comment id")
}

fn child_ids(node: &Value) -> Vec<i64> {
    node["children"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["id"].as_i64().unwrap())
        .collect()
}

#[tokio::test]
async fn unknown_route_returns_404() {
    // Arrange
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    // Act
    let response = client
        .get(format!("{}/random_path_that_does_not_exist", app.address))
        .send()
        .await
        .expect("Failed to execute request");

    // Assert
    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn router_rejects_unknown_subject_kind_without_a_socket() {
    // Arrange
    let (state, _store) = test_state(DeleteMode::Tombstone);
    let app = comment_threads::create_router(state);
    let request = axum::http::Request::builder()
        .method("POST")
        .uri("/api/metrics/user/1/views")
        .body(axum::body::Body::empty())
        .unwrap();

    // Act
    let response = app.oneshot(request).await.unwrap();

    // Assert
    assert_eq!(response.status().as_u16(), 400);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert!(body["error"].as_str().unwrap().contains("user"));
}

#[tokio::test]
async fn post_thread_is_nested_and_ordered() {
    // Arrange
    let app = spawn_app().await;
    let client = reqwest::Client::new();
    let post_id = create_post(&client, &app.address, "a post").await;

    let c1 = comment_id(create_comment(&client, &app.address, post_id, "first", None).await).await;
    let c2 =
        comment_id(create_comment(&client, &app.address, post_id, "reply", Some(c1)).await).await;
    let c3 = comment_id(create_comment(&client, &app.address, post_id, "third", None).await).await;

    // Act
    let forest: Vec<Value> = client
        .get(format!("{}/api/posts/{}/comments", app.address, post_id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    // Assert: [ {C1, children:[C2]}, {C3, children:[]} ]
    assert_eq!(forest.len(), 2);
    assert_eq!(forest[0]["id"], c1);
    assert_eq!(child_ids(&forest[0]), vec![c2]);
    assert_eq!(forest[1]["id"], c3);
    assert!(child_ids(&forest[1]).is_empty());
    assert_eq!(forest[0]["metrics"]["replies"], 1);
    assert_eq!(forest[0]["children"][0]["content"], "reply");
}

#[tokio::test]
async fn empty_thread_is_an_empty_list() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();
    let post_id = create_post(&client, &app.address, "quiet post").await;

    let response = client
        .get(format!("{}/api/posts/{}/comments", app.address, post_id))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 200);
    let forest: Vec<Value> = response.json().await.unwrap();
    assert!(forest.is_empty());
}

#[tokio::test]
async fn missing_roots_return_404() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{}/api/posts/999/comments", app.address))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 404);

    let response = client
        .get(format!("{}/api/comments/999", app.address))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn comment_creation_rejects_bad_references_and_blank_text() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();
    let p1 = create_post(&client, &app.address, "one").await;
    let p2 = create_post(&client, &app.address, "two").await;
    let on_p2 = comment_id(create_comment(&client, &app.address, p2, "hi", None).await).await;

    // Parent from another post
    let response = create_comment(&client, &app.address, p1, "cross", Some(on_p2)).await;
    assert_eq!(response.status().as_u16(), 404);

    // Unknown post
    let response = create_comment(&client, &app.address, 4242, "lost", None).await;
    assert_eq!(response.status().as_u16(), 404);

    // Blank after trimming
    let response = create_comment(&client, &app.address, p1, "   ", None).await;
    assert_eq!(response.status().as_u16(), 400);
}

#[tokio::test]
async fn comment_subtree_can_be_fetched_directly() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();
    let post_id = create_post(&client, &app.address, "post").await;
    let root = comment_id(create_comment(&client, &app.address, post_id, "root", None).await).await;
    let a = comment_id(create_comment(&client, &app.address, post_id, "a", Some(root)).await).await;
    let b = comment_id(create_comment(&client, &app.address, post_id, "b", Some(root)).await).await;
    let a1 = comment_id(create_comment(&client, &app.address, post_id, "a1", Some(a)).await).await;

    let node: Value = client
        .get(format!("{}/api/comments/{}", app.address, root))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(node["id"], root);
    assert_eq!(child_ids(&node), vec![a, b]);
    assert_eq!(child_ids(&node["children"][0]), vec![a1]);

    let replies: Vec<Value> = client
        .get(format!("{}/api/comments/{}/replies", app.address, root))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let reply_ids: Vec<i64> = replies.iter().map(|r| r["id"].as_i64().unwrap()).collect();
    assert_eq!(reply_ids, vec![a, b]);
}

#[tokio::test]
async fn edit_keeps_counters_and_refreshes_updated_at() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();
    let post_id = create_post(&client, &app.address, "post").await;
    let c = comment_id(create_comment(&client, &app.address, post_id, "typo", None).await).await;

    let response = client
        .post(format!("{}/api/metrics/comment/{}/views", app.address, c))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);

    let edited: Value = client
        .put(format!("{}/api/comments/{}", app.address, c))
        .json(&json!({ "content": "fixed" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(edited["content"], "fixed");

    // Missing content keeps the text
    let untouched: Value = client
        .put(format!("{}/api/comments/{}", app.address, c))
        .json(&json!({}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(untouched["content"], "fixed");

    let node: Value = client
        .get(format!("{}/api/comments/{}", app.address, c))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(node["metrics"]["views"], 1);

    let response = client
        .put(format!("{}/api/comments/777", app.address))
        .json(&json!({ "content": "ghost" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn tombstoned_comment_keeps_its_replies_in_place() {
    let app = spawn_app_with(DeleteMode::Tombstone).await;
    let client = reqwest::Client::new();
    let post_id = create_post(&client, &app.address, "post").await;
    let c1 = comment_id(create_comment(&client, &app.address, post_id, "c1", None).await).await;
    let c2 = comment_id(create_comment(&client, &app.address, post_id, "c2", Some(c1)).await).await;

    let response = client
        .delete(format!("{}/api/comments/{}", app.address, c1))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 204);

    let forest: Vec<Value> = client
        .get(format!("{}/api/posts/{}/comments", app.address, post_id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(forest.len(), 1);
    assert_eq!(forest[0]["id"], c1);
    assert_eq!(forest[0]["deleted"], true);
    assert_eq!(forest[0]["content"], Value::Null);
    assert_eq!(child_ids(&forest[0]), vec![c2]);

    // A second tombstone is a 404, so is replying to it
    let response = client
        .delete(format!("{}/api/comments/{}", app.address, c1))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 404);
    let response = create_comment(&client, &app.address, post_id, "late", Some(c1)).await;
    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn cascade_delete_removes_the_subtree() {
    let app = spawn_app_with(DeleteMode::Tombstone).await;
    let client = reqwest::Client::new();
    let post_id = create_post(&client, &app.address, "post").await;
    let c1 = comment_id(create_comment(&client, &app.address, post_id, "c1", None).await).await;
    comment_id(create_comment(&client, &app.address, post_id, "c2", Some(c1)).await).await;
    let c3 = comment_id(create_comment(&client, &app.address, post_id, "c3", None).await).await;

    // Per-request override of the configured default
    let response = client
        .delete(format!("{}/api/comments/{}?mode=cascade", app.address, c1))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 204);

    let forest: Vec<Value> = client
        .get(format!("{}/api/posts/{}/comments", app.address, post_id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let ids: Vec<i64> = forest.iter().map(|n| n["id"].as_i64().unwrap()).collect();
    assert_eq!(ids, vec![c3]);
}

#[tokio::test]
async fn reparenting_under_a_descendant_is_rejected() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();
    let post_id = create_post(&client, &app.address, "post").await;
    let a = comment_id(create_comment(&client, &app.address, post_id, "a", None).await).await;
    let b = comment_id(create_comment(&client, &app.address, post_id, "b", Some(a)).await).await;
    let c = comment_id(create_comment(&client, &app.address, post_id, "c", Some(b)).await).await;

    for target in [a, c] {
        let response = client
            .put(format!("{}/api/comments/{}/parent", app.address, a))
            .json(&json!({ "parent_id": target }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 400);
    }

    // Moving c to top level is fine
    let response = client
        .put(format!("{}/api/comments/{}/parent", app.address, c))
        .json(&json!({ "parent_id": null }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
}

#[tokio::test]
async fn engagement_events_accumulate_and_likes_are_counted() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();
    let post_id = create_post(&client, &app.address, "post").await;

    for _ in 0..2 {
        let response = client
            .post(format!("{}/api/metrics/post/{}/views", app.address, post_id))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 200);
    }
    client
        .post(format!("{}/api/metrics/post/{}/impressions?delta=5", app.address, post_id))
        .send()
        .await
        .unwrap();

    for user_id in [10, 11, 10] {
        let response = client
            .post(format!("{}/api/posts/{}/likes", app.address, post_id))
            .json(&json!({ "user_id": user_id }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 200);
    }

    let bundle: Value = client
        .get(format!("{}/api/metrics/post/{}", app.address, post_id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(bundle["views"], 2);
    assert_eq!(bundle["impressions"], 5);
    assert_eq!(bundle["likes"], 2);
    assert_eq!(bundle["replies"], 0);

    let post: Value = client
        .get(format!("{}/api/posts/{}", app.address, post_id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(post["metrics"]["views"], 2);

    let likers: Vec<i64> = client
        .get(format!("{}/api/posts/{}/likes", app.address, post_id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(likers, vec![10, 11]);

    let response = client
        .get(format!("{}/api/comments/31337/likes", app.address))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn engagement_on_missing_subject_or_bad_metric_fails() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/api/metrics/post/31337/views", app.address))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 404);

    let post_id = create_post(&client, &app.address, "post").await;
    let response = client
        .post(format!("{}/api/metrics/post/{}/shares", app.address, post_id))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);

    let response = client
        .post(format!("{}/api/metrics/post/{}/views?delta=0", app.address, post_id))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);
}

#[tokio::test]
async fn hashtags_are_indexed_after_the_response() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();
    let post_id = create_post(&client, &app.address, "learning #Rust and #axum").await;
    comment_id(create_comment(&client, &app.address, post_id, "me too #rust #tokio", None).await)
        .await;

    let url = format!("{}/api/hashtags/usage?days=1", app.address);
    let indexed = eventually(|| {
        let client = client.clone();
        let url = url.clone();
        async move {
            let usage: Vec<Value> = client.get(&url).send().await.unwrap().json().await.unwrap();
            usage.len() == 3
        }
    })
    .await;
    assert!(indexed, "hashtags were not indexed in time");

    let usage: Vec<Value> = client.get(&url).send().await.unwrap().json().await.unwrap();
    let names: Vec<&str> = usage.iter().map(|u| u["name"].as_str().unwrap()).collect();
    assert_eq!(names, vec!["axum", "rust", "tokio"]);
    // One association per (post, tag), even though #rust appears twice
    assert!(usage.iter().all(|u| u["count"] == 1));
    assert_eq!(app.store.post_hashtag_count(post_id).unwrap(), 3);

    let response = client
        .get(format!("{}/api/hashtags/usage?days=0", app.address))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);
}

#[tokio::test]
async fn post_update_and_delete() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();
    let post_id = create_post(&client, &app.address, "draft text").await;

    let updated: Value = client
        .put(format!("{}/api/posts/{}", app.address, post_id))
        .json(&json!({ "status": "archived", "is_pinned": true }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(updated["status"], "archived");
    assert_eq!(updated["is_pinned"], true);
    assert_eq!(updated["content"], "draft text");

    let c = comment_id(create_comment(&client, &app.address, post_id, "bye", None).await).await;

    let response = client
        .delete(format!("{}/api/posts/{}", app.address, post_id))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 204);

    for url in [
        format!("{}/api/posts/{}", app.address, post_id),
        format!("{}/api/comments/{}", app.address, c),
    ] {
        let response = client.get(url).send().await.unwrap();
        assert_eq!(response.status().as_u16(), 404);
    }
}

#[tokio::test]
async fn very_deep_reply_chain_is_served_over_http() {
    // Arrange
    let (state, _store) = test_state(DeleteMode::Tombstone);
    let post_id = state
        .posts()
        .create(comment_threads::models::post::NewPost {
            author_id: 1,
            title: "deep".to_string(),
            content: "deep".to_string(),
            language_code: "en".to_string(),
            status: comment_threads::models::post::PostStatus::Published,
            is_pinned: false,
        })
        .await
        .unwrap()
        .id;

    let depth = 20_000;
    let comments = state.comments();
    let mut parent = None;
    let mut root = None;
    for i in 0..depth {
        let id = comments
            .create(post_id, 2, &format!("level {i}"), parent)
            .await
            .unwrap();
        if root.is_none() {
            root = Some(id);
        }
        parent = Some(id);
    }
    let root = root.unwrap();
    let app = comment_threads::create_router(state);

    for uri in [
        format!("/api/posts/{}/comments", post_id),
        format!("/api/comments/{}", root),
    ] {
        // Act
        let request = axum::http::Request::builder()
            .uri(uri)
            .body(axum::body::Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();

        // Assert
        assert_eq!(response.status().as_u16(), 200);
        assert_eq!(
            response.headers()["content-type"].to_str().unwrap(),
            "application/json"
        );
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = std::str::from_utf8(&bytes).unwrap();
        assert_eq!(text.matches("\"children\":[").count(), depth);
        assert!(text.contains(&format!("\"id\":{root},")));
    }
}

#[tokio::test]
async fn counter_overflow_is_rejected_and_the_store_keeps_working() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();
    let post_id = create_post(&client, &app.address, "post").await;
    let url = format!(
        "{}/api/metrics/post/{}/views?delta={}",
        app.address,
        post_id,
        i64::MAX
    );

    let response = client.post(&url).send().await.unwrap();
    assert_eq!(response.status().as_u16(), 200);

    let response = client.post(&url).send().await.unwrap();
    assert_eq!(response.status().as_u16(), 400);

    // The counter is unchanged and later requests still succeed
    let response = client
        .post(format!("{}/api/metrics/post/{}/impressions", app.address, post_id))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);

    let bundle: Value = client
        .get(format!("{}/api/metrics/post/{}", app.address, post_id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(bundle["views"], i64::MAX);
    assert_eq!(bundle["impressions"], 1);

    let response = client
        .get(format!("{}/api/posts/{}", app.address, post_id))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
}
