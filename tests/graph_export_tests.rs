//! End-to-end tests for the Graph variant against a mock API server.

mod common;

use common::{folder_page, graph_message, message_page};
use outlook_export::graph::GraphClient;
use outlook_export::normalize::normalize_graph;
use outlook_export::sheet::{write_sheet, STATUS_HEADER};
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const FOLDER_ID: &str = "AAMk-jobs";

async fn mount_folders(server: &MockServer, folders: &[(&str, &str)]) {
    Mock::given(method("GET"))
        .and(path("/me/mailFolders"))
        .respond_with(ResponseTemplate::new(200).set_body_json(folder_page(folders)))
        .mount(server)
        .await;
}

#[tokio::test]
async fn scenario_a_three_messages_export_end_to_end() {
    let server = MockServer::start().await;
    mount_folders(&server, &[("AAMk-inbox", "Inbox"), (FOLDER_ID, "Job Hunting")]).await;

    // Three messages, already sorted by receivedDateTime descending
    let messages = vec![
        graph_message("2026-08-03T12:00:00Z", "third@example.com", "Newest", true),
        graph_message("2026-08-02T12:00:00Z", "second@example.com", "Middle", false),
        graph_message("2026-08-01T12:00:00Z", "first@example.com", "Oldest", true),
    ];
    Mock::given(method("GET"))
        .and(path(format!("/me/mailFolders/{}/messages", FOLDER_ID)))
        .respond_with(ResponseTemplate::new(200).set_body_json(message_page(messages, None)))
        .mount(&server)
        .await;

    let client = GraphClient::new(&server.uri(), "test-token".to_string()).unwrap();

    let folder_id = client.resolve_folder("job hunting").await.unwrap().unwrap();
    assert_eq!(folder_id, FOLDER_ID);

    let fetched = client.fetch_messages(&folder_id, 10).await.unwrap();
    assert_eq!(fetched.len(), 3);

    let rows: Vec<_> = fetched.iter().map(normalize_graph).collect();
    assert_eq!(rows[0].date, "2026-08-03 12:00:00");
    assert_eq!(rows[1].date, "2026-08-02 12:00:00");
    assert_eq!(rows[2].date, "2026-08-01 12:00:00");
    assert_eq!(rows[0].status, "Read");
    assert_eq!(rows[1].status, "Unread");
    assert_eq!(rows[2].status, "Read");
    assert_eq!(rows[1].sender, "second@example.com");

    let dir = TempDir::new().unwrap();
    let output = dir.path().join("outlook_emails.xlsx");
    write_sheet(&rows, STATUS_HEADER, &output).unwrap();
    assert!(std::fs::metadata(&output).unwrap().len() > 0);
}

#[tokio::test]
async fn scenario_c_missing_folder_falls_back_to_inbox() {
    let server = MockServer::start().await;
    mount_folders(
        &server,
        &[("AAMk-inbox", "Inbox"), ("AAMk-sent", "Sent Items")],
    )
    .await;

    let client = GraphClient::new(&server.uri(), "test-token".to_string()).unwrap();
    let folder_id = client.resolve_folder("Job Hunting").await.unwrap();
    assert_eq!(folder_id.as_deref(), Some("AAMk-inbox"));
}

#[tokio::test]
async fn missing_folder_and_missing_inbox_resolves_to_none() {
    let server = MockServer::start().await;
    mount_folders(&server, &[("AAMk-sent", "Sent Items")]).await;

    let client = GraphClient::new(&server.uri(), "test-token".to_string()).unwrap();
    let folder_id = client.resolve_folder("Job Hunting").await.unwrap();
    assert!(folder_id.is_none());
}

#[tokio::test]
async fn folder_matching_is_case_insensitive_exact() {
    let server = MockServer::start().await;
    mount_folders(
        &server,
        &[("AAMk-inbox", "Inbox"), ("AAMk-jobs", "Job Hunting")],
    )
    .await;

    let client = GraphClient::new(&server.uri(), "test-token".to_string()).unwrap();

    // "Job" is a prefix, not an exact match, so it falls back to inbox
    let folder_id = client.resolve_folder("Job").await.unwrap();
    assert_eq!(folder_id.as_deref(), Some("AAMk-inbox"));

    let folder_id = client.resolve_folder("JOB HUNTING").await.unwrap();
    assert_eq!(folder_id.as_deref(), Some("AAMk-jobs"));
}

#[tokio::test]
async fn pagination_follows_cursor_until_absent() {
    let server = MockServer::start().await;

    let page_two_url = format!("{}/me/page-two", server.uri());
    let first = vec![
        graph_message("2026-08-04T10:00:00Z", "a@example.com", "One", true),
        graph_message("2026-08-03T10:00:00Z", "b@example.com", "Two", true),
    ];
    let second = vec![
        graph_message("2026-08-02T10:00:00Z", "c@example.com", "Three", false),
        graph_message("2026-08-01T10:00:00Z", "d@example.com", "Four", false),
    ];

    Mock::given(method("GET"))
        .and(path(format!("/me/mailFolders/{}/messages", FOLDER_ID)))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(message_page(first, Some(page_two_url))),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/me/page-two"))
        .respond_with(ResponseTemplate::new(200).set_body_json(message_page(second, None)))
        .mount(&server)
        .await;

    let client = GraphClient::new(&server.uri(), "test-token".to_string()).unwrap();
    let fetched = client.fetch_messages(FOLDER_ID, 50).await.unwrap();

    // Terminates at the page with no cursor even though the limit allows more
    assert_eq!(fetched.len(), 4);
    assert_eq!(fetched[3].subject.as_deref(), Some("Four"));
}

#[tokio::test]
async fn fetch_respects_limit_and_requests_capped_page_size() {
    let server = MockServer::start().await;

    let page_two_url = format!("{}/me/page-two", server.uri());
    let first = vec![
        graph_message("2026-08-04T10:00:00Z", "a@example.com", "One", true),
        graph_message("2026-08-03T10:00:00Z", "b@example.com", "Two", true),
    ];

    Mock::given(method("GET"))
        .and(path(format!("/me/mailFolders/{}/messages", FOLDER_ID)))
        .and(query_param("$top", "2"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(message_page(first, Some(page_two_url))),
        )
        .mount(&server)
        .await;

    // The second page must never be requested once the limit is reached
    Mock::given(method("GET"))
        .and(path("/me/page-two"))
        .respond_with(ResponseTemplate::new(200).set_body_json(message_page(vec![], None)))
        .expect(0)
        .mount(&server)
        .await;

    let client = GraphClient::new(&server.uri(), "test-token".to_string()).unwrap();
    let fetched = client.fetch_messages(FOLDER_ID, 2).await.unwrap();
    assert_eq!(fetched.len(), 2);
}

#[tokio::test]
async fn failed_page_keeps_accumulated_messages() {
    let server = MockServer::start().await;

    let page_two_url = format!("{}/me/page-two", server.uri());
    let first = vec![
        graph_message("2026-08-04T10:00:00Z", "a@example.com", "One", true),
        graph_message("2026-08-03T10:00:00Z", "b@example.com", "Two", false),
    ];

    Mock::given(method("GET"))
        .and(path(format!("/me/mailFolders/{}/messages", FOLDER_ID)))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(message_page(first, Some(page_two_url))),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/me/page-two"))
        .respond_with(ResponseTemplate::new(503).set_body_string("service unavailable"))
        .mount(&server)
        .await;

    let client = GraphClient::new(&server.uri(), "test-token".to_string()).unwrap();
    let fetched = client.fetch_messages(FOLDER_ID, 50).await.unwrap();

    // Pagination stops at the failed page; the first page survives
    assert_eq!(fetched.len(), 2);
}

#[tokio::test]
async fn failed_folder_listing_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/me/mailFolders"))
        .respond_with(ResponseTemplate::new(401).set_body_string("unauthorized"))
        .mount(&server)
        .await;

    let client = GraphClient::new(&server.uri(), "bad-token".to_string()).unwrap();
    let result = client.resolve_folder("inbox").await;
    assert!(result.is_err());
}

#[tokio::test]
async fn row_count_never_exceeds_limit() {
    let server = MockServer::start().await;

    // A single page holding more messages than the limit
    let messages: Vec<_> = (0..10)
        .map(|i| {
            graph_message(
                &format!("2026-08-01T10:{:02}:00Z", i),
                "a@example.com",
                &format!("Message {}", i),
                true,
            )
        })
        .collect();
    Mock::given(method("GET"))
        .and(path(format!("/me/mailFolders/{}/messages", FOLDER_ID)))
        .respond_with(ResponseTemplate::new(200).set_body_json(message_page(messages, None)))
        .mount(&server)
        .await;

    let client = GraphClient::new(&server.uri(), "test-token".to_string()).unwrap();
    let fetched = client.fetch_messages(FOLDER_ID, 3).await.unwrap();
    assert_eq!(fetched.len(), 3);
}
