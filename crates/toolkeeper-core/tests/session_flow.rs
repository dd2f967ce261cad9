//! End-to-end flow against a mock backend: login, authenticated calls,
//! session renewal, reminder passes and logout, all persisted in SQLite.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use mockito::{Matcher, Server};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use toolkeeper_core::api::{ApiClient, RequestConfig};
use toolkeeper_core::reminders::{
    HttpReminderBackend, LocalNotification, NotificationSink, ReminderScheduler,
};
use toolkeeper_core::storage::RemindersConfig;
use toolkeeper_core::{KeyValueStore, SinkError, SqliteStore, TokenManager};

#[derive(Default)]
struct CollectingSink {
    shown: Mutex<Vec<String>>,
    scheduled: Mutex<Vec<(String, DateTime<Utc>)>>,
}

#[async_trait]
impl NotificationSink for CollectingSink {
    async fn request_permission(&self) -> bool {
        true
    }

    fn supports_scheduling(&self) -> bool {
        true
    }

    async fn show(&self, notification: &LocalNotification) -> Result<(), SinkError> {
        self.shown.lock().unwrap().push(notification.key.clone());
        Ok(())
    }

    async fn schedule(
        &self,
        notification: &LocalNotification,
        at: DateTime<Utc>,
    ) -> Result<(), SinkError> {
        self.scheduled
            .lock()
            .unwrap()
            .push((notification.key.clone(), at));
        Ok(())
    }

    async fn cancel_all_scheduled(&self) -> Result<(), SinkError> {
        self.scheduled.lock().unwrap().clear();
        Ok(())
    }
}

fn open_store(dir: &TempDir) -> Arc<dyn KeyValueStore> {
    Arc::new(SqliteStore::open_at(&dir.path().join("toolkeeper.db")).unwrap())
}

#[tokio::test]
async fn login_survives_restart_and_refreshes_on_expiry() {
    let dir = TempDir::new().unwrap();
    let mut server = Server::new_async().await;

    server
        .mock("POST", "/api/auth/login")
        .with_status(200)
        .with_body(r#"{"token":"first"}"#)
        .create_async()
        .await;

    let client = ApiClient::builder(server.url())
        .store(open_store(&dir))
        .build()
        .unwrap();
    assert!(client.login("jan", "secret").await.unwrap());
    drop(client);

    // a new process picks the token up from disk
    let store = open_store(&dir);
    let session = TokenManager::new(Arc::clone(&store));
    session.init().await;
    assert_eq!(session.token().as_deref(), Some("first"));

    server
        .mock("GET", "/api/tools")
        .match_header("authorization", "Bearer first")
        .with_status(401)
        .create_async()
        .await;
    server
        .mock("POST", "/api/auth/refresh")
        .with_status(200)
        .with_body(r#"{"token":"second"}"#)
        .create_async()
        .await;
    let tools = server
        .mock("GET", "/api/tools")
        .match_header("authorization", "Bearer second")
        .with_status(200)
        .with_body(r#"[{"id":"T1"}]"#)
        .create_async()
        .await;

    let client = ApiClient::builder(server.url())
        .store(store)
        .session(session.clone())
        .build()
        .unwrap();
    let body = client.request("/api/tools", RequestConfig::get()).await.unwrap();
    assert_eq!(body[0]["id"], "T1");
    assert_eq!(session.token().as_deref(), Some("second"));
    tools.assert_async().await;

    server
        .mock("POST", "/api/auth/logout")
        .with_status(204)
        .create_async()
        .await;
    client.logout().await.unwrap();
    assert!(!client.refresh_session().await);
}

#[tokio::test]
async fn reminder_pass_over_http_backend() {
    let dir = TempDir::new().unwrap();
    let mut server = Server::new_async().await;

    server
        .mock("GET", "/api/tools")
        .with_status(200)
        .with_body(
            r#"{"items":[
                {"id":"T1","name":"MIG 200","category":{"name":"Spawalnicze"},"inspection_date":"2026-05-20"},
                {"id":"T2","name":"Drill","due_date":"2026-05-01"}
            ]}"#,
        )
        .create_async()
        .await;
    server
        .mock("GET", "/api/bhp")
        .with_status(503)
        .create_async()
        .await;
    let unread = server
        .mock("POST", "/api/notifications/unread-all")
        .match_header("authorization", Matcher::Missing)
        .with_status(200)
        .create_async()
        .await;

    let store = open_store(&dir);
    let client = ApiClient::builder(server.url())
        .store(Arc::clone(&store))
        .build()
        .unwrap();
    let backend = HttpReminderBackend::new(
        client,
        &RemindersConfig {
            tool_endpoints: vec!["/api/tools".into()],
            bhp_endpoints: vec!["/api/bhp".into()],
        },
    );
    let sink = Arc::new(CollectingSink::default());
    let scheduler = ReminderScheduler::new(Arc::new(backend), sink.clone(), store);

    let now = Utc.with_ymd_and_hms(2026, 5, 10, 12, 0, 0).unwrap();
    let report = scheduler.run_pass_at(now, &Utc).await;

    assert_eq!(report.fetched, 2);
    // T1: review30 already past; T2: expired and review7 already past
    assert_eq!(report.dispatched, 3);
    // T1: review7 on 05-13 and expired on 05-20
    assert_eq!(report.scheduled, 2);

    let again = scheduler.run_pass_at(now, &Utc).await;
    assert_eq!(again.dispatched, 0);
    assert_eq!(again.suppressed, 3);
    assert_eq!(sink.scheduled.lock().unwrap().len(), 2);

    scheduler.clear_acknowledgements(false).await;
    unread.assert_async().await;
    let after_clear = scheduler.run_pass_at(now, &Utc).await;
    assert_eq!(after_clear.dispatched, 3);
    assert_eq!(sink.shown.lock().unwrap().len(), 6);
}
