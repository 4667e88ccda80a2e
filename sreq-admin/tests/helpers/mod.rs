//! Shared test helpers for sreq-admin integration tests

#![allow(dead_code)]

pub mod log_capture;

use axum::{
    body::Body,
    http::{header::AUTHORIZATION, header::CONTENT_TYPE, Request},
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use sqlx::SqlitePool;
use sreq_admin::backup::BackupStore;
use sreq_admin::{build_router, AppState};
use sreq_common::api::{hash_token, TokenRegistry};
use sreq_common::config::TokenEntry;
use sreq_common::db::{init_memory_database, Role};
use std::path::Path;

pub const ADMIN_TOKEN: &str = "admin-secret-token";
pub const USER_TOKEN: &str = "user-secret-token";

/// Fresh in-memory database with the full schema
pub async fn memory_pool() -> SqlitePool {
    init_memory_database()
        .await
        .expect("Should create in-memory database")
}

/// Row count of a table
pub async fn count(pool: &SqlitePool, table: &str) -> i64 {
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
        .fetch_one(pool)
        .await
        .expect("Should count rows")
}

/// Registry with one admin and one regular user token
pub fn test_tokens() -> TokenRegistry {
    TokenRegistry::from_entries(&[
        TokenEntry {
            sha256: hash_token(ADMIN_TOKEN),
            username: "admin".to_string(),
            role: Role::Admin,
        },
        TokenEntry {
            sha256: hash_token(USER_TOKEN),
            username: "student".to_string(),
            role: Role::User,
        },
    ])
    .expect("Should build token registry")
}

/// App state over an in-memory database and the given backup directory
pub async fn test_state(backup_dir: &Path) -> AppState {
    let db = memory_pool().await;
    AppState::new(db, BackupStore::new(backup_dir), test_tokens())
}

pub fn test_app(state: AppState) -> axum::Router {
    build_router(state)
}

/// Build a request, optionally authenticated and with a JSON body
pub fn request(method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);

    if let Some(token) = token {
        builder = builder.header(AUTHORIZATION, format!("Bearer {}", token));
    }

    match body {
        Some(body) => builder
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

/// Collect a response body as JSON
pub async fn extract_json(body: Body) -> Value {
    let bytes = body
        .collect()
        .await
        .expect("Should read body")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("Should parse JSON")
}

/// Write a JSON value into the backup directory
pub fn write_backup(dir: &Path, filename: &str, document: &Value) {
    std::fs::write(
        dir.join(filename),
        serde_json::to_vec_pretty(document).unwrap(),
    )
    .expect("Should write backup file");
}

pub fn metadata() -> Value {
    json!({
        "version": "1.0",
        "timestamp": "2024-09-01T08:30:00.000Z",
        "creator": "admin",
        "totalRecords": 0
    })
}

/// Backup with records in every collection, 11 records in total
///
/// References are consistent: every song, vote, schedule and notification
/// points at rows defined earlier in the dependency order.
pub fn full_backup() -> Value {
    json!({
        "metadata": {
            "version": "1.0",
            "timestamp": "2024-09-01T08:30:00.000Z",
            "creator": "admin",
            "totalRecords": 11
        },
        "data": {
            "systemSettings": [
                { "id": 1, "siteTitle": "Campus Radio", "enablePlayTimeSelection": true }
            ],
            "playTimes": [
                { "id": 1, "name": "Morning", "startTime": "07:30", "endTime": "08:00", "enabled": true }
            ],
            "semesters": [
                { "id": 1, "name": "2024-Fall", "isActive": true }
            ],
            "users": [
                {
                    "id": 1,
                    "username": "alice",
                    "name": "Alice",
                    "role": "admin",
                    "password": "$2b$10$abcdefghijklmnopqrstuv",
                    "createdAt": "2024-09-01T08:30:00.000Z"
                },
                { "id": 2, "username": "bob", "name": "Bob", "grade": "10", "class": "3", "role": "user" }
            ],
            "songs": [
                {
                    "id": 1,
                    "title": "Song A",
                    "artist": "Artist A",
                    "requestedById": 2,
                    "played": false,
                    "semester": "2024-Fall",
                    "preferredPlayTimeId": 1
                },
                {
                    "id": 2,
                    "title": "Song B",
                    "artist": "Artist B",
                    "requestedById": 1,
                    "played": true,
                    "playedAt": "2024-09-02T09:00:00.000Z"
                }
            ],
            "votes": [
                { "id": 1, "songId": 1, "userId": 1 }
            ],
            "schedules": [
                { "id": 1, "songId": 2, "playDate": "2024-09-02T00:00:00.000Z", "sequence": 1, "played": true, "playTimeId": 1 }
            ],
            "notificationSettings": [
                { "id": 1, "userId": 2, "enabled": true, "refreshInterval": 60 }
            ],
            "notifications": [
                { "id": 1, "userId": 2, "type": "SONG_PLAYED", "message": "Your song was played", "read": false, "songId": 2 }
            ]
        }
    })
}
