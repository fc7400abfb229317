use futures::StreamExt;
use preview_host::{
    FileMap, FileUpdate, PreviewConfig, PreviewError, PreviewManager, StoreEvent,
    StreamingUpdater, UpdaterEvent,
};
use serde::Deserialize;
use serde_json::{Value, json};
use std::{
    collections::HashMap,
    env, io,
    path::{Path, PathBuf},
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{broadcast, mpsc};
use tokio_stream::wrappers::LinesStream;
use tracing::{debug, warn};

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// One line of input on stdin.
#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum Request {
    Create {
        #[serde(default)]
        id: Option<String>,
        project_name: String,
        #[serde(default)]
        files: FileMap,
    },
    Update {
        id: String,
        files: FileMap,
    },
    Apply {
        id: String,
        updates: Vec<FileUpdate>,
    },
    Get {
        id: String,
    },
    Destroy {
        id: String,
    },
    Status,
    Dispose,
    /// Queue edits through the debouncer instead of applying them directly.
    Stream {
        id: String,
        files: FileMap,
    },
    Flush {
        id: String,
    },
    Export {
        id: String,
        dir: PathBuf,
    },
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("preview_host=info"));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn load_config() -> PreviewConfig {
    let base = match env::var("PREVIEW_CONFIG") {
        Ok(path) if !path.trim().is_empty() => match PreviewConfig::load(Path::new(&path)) {
            Ok(config) => config,
            Err(err) => {
                warn!(%path, error = %err, "ignoring unreadable config file");
                PreviewConfig::default()
            }
        },
        _ => PreviewConfig::default(),
    };
    base.with_env_overrides()
}

fn error_response(err: &PreviewError) -> Value {
    json!({ "ok": false, "error": err.code(), "message": err.to_string() })
}

fn store_event_json(event: StoreEvent) -> Value {
    match event {
        StoreEvent::Evicted {
            id,
            project_name,
            memory_bytes,
            admitted,
        } => json!({
            "event": "evicted",
            "id": id,
            "project_name": project_name,
            "memory_bytes": memory_bytes,
            "admitted": admitted,
        }),
        StoreEvent::Replaced { id } => json!({ "event": "replaced", "id": id }),
        StoreEvent::Destroyed { id } => json!({ "event": "destroyed", "id": id }),
        StoreEvent::Cleared { count } => json!({ "event": "cleared", "count": count }),
    }
}

fn updater_event_json(event: UpdaterEvent) -> Value {
    match event {
        UpdaterEvent::Flushed { id, files, result } => match result {
            Ok(()) => json!({ "event": "flushed", "id": id, "files": files }),
            Err(err) => json!({
                "event": "flush_failed",
                "id": id,
                "files": files,
                "error": err.code(),
                "message": err.to_string(),
            }),
        },
        UpdaterEvent::RefreshRequested { id } => json!({ "event": "refresh", "id": id }),
    }
}

fn emit(value: &Value) {
    println!("{value}");
}

/// Owns the manager and the per-preview streaming updaters.
struct Driver {
    manager: PreviewManager,
    updaters: HashMap<String, StreamingUpdater>,
    updater_events: mpsc::UnboundedSender<UpdaterEvent>,
}

impl Driver {
    fn updater(&mut self, id: &str) -> &StreamingUpdater {
        if !self.updaters.contains_key(id) {
            let (updater, mut rx) = self.manager.streaming_updater(id);
            let forward = self.updater_events.clone();
            tokio::spawn(async move {
                while let Some(event) = rx.recv().await {
                    if forward.send(event).is_err() {
                        break;
                    }
                }
            });
            self.updaters.insert(id.to_string(), updater);
        }
        &self.updaters[id]
    }

    /// Drop the updater for `id`, discarding anything it still has queued.
    fn forget(&mut self, id: &str) {
        if let Some(updater) = self.updaters.remove(id) {
            let dropped = updater.cancel();
            debug!(id, dropped, "dropped streaming updater");
        }
    }

    fn forget_all(&mut self) {
        for (_, updater) in self.updaters.drain() {
            updater.cancel();
        }
    }

    /// Keep the updater map in step with what the store still holds.
    fn on_store_event(&mut self, event: &StoreEvent) {
        match event {
            // The id may already be back in the store by the time the event arrives.
            StoreEvent::Evicted { id, .. } | StoreEvent::Destroyed { id }
                if self.manager.peek_preview(id).is_none() =>
            {
                self.forget(id)
            }
            StoreEvent::Evicted { .. } | StoreEvent::Destroyed { .. } => {}
            StoreEvent::Cleared { .. } => self.forget_all(),
            StoreEvent::Replaced { .. } => {}
        }
    }

    fn on_updater_event(&mut self, event: &UpdaterEvent) {
        if let UpdaterEvent::Flushed {
            id,
            result: Err(PreviewError::NotFound { .. }),
            ..
        } = event
        {
            self.forget(id);
        }
    }

    async fn handle(&mut self, request: Request) -> Value {
        match request {
            Request::Create {
                id,
                project_name,
                files,
            } => {
                let created = match id {
                    Some(id) => self.manager.create_preview(&id, &project_name, files),
                    None => self
                        .manager
                        .create_preview_with_generated_id(&project_name, files),
                };
                match created {
                    Ok(snapshot) => json!({
                        "ok": true,
                        "id": snapshot.id,
                        "memory_bytes": snapshot.memory_bytes,
                    }),
                    Err(err) => error_response(&err),
                }
            }
            Request::Update { id, files } => match self.manager.update_preview(&id, files) {
                Ok(()) => json!({ "ok": true }),
                Err(err) => error_response(&err),
            },
            Request::Apply { id, updates } => match self.manager.apply_updates(&id, updates) {
                Ok(()) => json!({ "ok": true }),
                Err(err) => error_response(&err),
            },
            Request::Get { id } => {
                let preview = self.manager.get_preview(&id).map(|snapshot| {
                    json!({
                        "id": snapshot.id,
                        "project_name": snapshot.project_name,
                        "memory_bytes": snapshot.memory_bytes,
                        "files": snapshot.files.as_ref(),
                    })
                });
                json!({ "ok": true, "preview": preview })
            }
            Request::Destroy { id } => {
                self.forget(&id);
                self.manager.destroy_preview(&id);
                json!({ "ok": true })
            }
            Request::Status => json!({ "ok": true, "status": self.manager.get_status() }),
            Request::Dispose => {
                self.forget_all();
                self.manager.dispose();
                json!({ "ok": true })
            }
            Request::Stream { id, files } => {
                if self.manager.peek_preview(&id).is_none() {
                    self.forget(&id);
                    return error_response(&PreviewError::NotFound { id });
                }
                let updater = self.updater(&id);
                let report = updater.push(files);
                json!({
                    "ok": true,
                    "queued": updater.pending_len(),
                    "rejected": report.oversized,
                })
            }
            Request::Flush { id } => {
                if let Some(updater) = self.updaters.get(&id) {
                    updater.flush_now().await;
                }
                json!({ "ok": true })
            }
            Request::Export { id, dir } => {
                let written = self
                    .manager
                    .write_out(&id, |path, content| {
                        let target = dir.join(&path);
                        async move {
                            if let Some(parent) = target.parent() {
                                tokio::fs::create_dir_all(parent).await?;
                            }
                            tokio::fs::write(&target, content).await?;
                            Ok::<_, io::Error>(path)
                        }
                    })
                    .await;
                match written {
                    Ok(results) => {
                        let mut failed = Vec::new();
                        let mut count = 0usize;
                        for result in results {
                            match result {
                                Ok(_) => count += 1,
                                Err(err) => failed.push(err.to_string()),
                            }
                        }
                        json!({ "ok": failed.is_empty(), "written": count, "errors": failed })
                    }
                    Err(err) => error_response(&err),
                }
            }
        }
    }

    async fn shutdown(&mut self) {
        for updater in self.updaters.values() {
            updater.flush_now().await;
        }
        self.updaters.clear();
        self.manager.dispose();
    }
}

#[tokio::main]
async fn main() -> io::Result<()> {
    let _ = dotenvy::dotenv();

    if let Some(arg) = env::args().nth(1)
        && (arg == "--version" || arg == "-V")
    {
        println!("preview-host {}", VERSION);
        return Ok(());
    }

    init_tracing();

    let manager = PreviewManager::new(load_config());
    let mut store_events = manager.subscribe();
    let (updater_tx, mut updater_rx) = mpsc::unbounded_channel();
    let mut driver = Driver {
        manager,
        updaters: HashMap::new(),
        updater_events: updater_tx,
    };

    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = LinesStream::new(stdin.lines());

    loop {
        tokio::select! {
            line = lines.next() => {
                let Some(line) = line else { break };
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                let response = match serde_json::from_str::<Request>(&line) {
                    Ok(request) => {
                        debug!(?request, "handling request");
                        driver.handle(request).await
                    }
                    Err(err) => json!({ "ok": false, "error": "bad_request", "message": err.to_string() }),
                };
                emit(&response);
            }
            Some(event) = updater_rx.recv() => {
                driver.on_updater_event(&event);
                emit(&updater_event_json(event));
            }
            event = store_events.recv() => match event {
                Ok(event) => {
                    driver.on_store_event(&event);
                    emit(&store_event_json(event));
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, "dropped store events");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    driver.shutdown().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn driver(max_instances: usize) -> (Driver, mpsc::UnboundedReceiver<UpdaterEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let manager = PreviewManager::new(PreviewConfig {
            max_instances,
            ..PreviewConfig::default()
        });
        let driver = Driver {
            manager,
            updaters: HashMap::new(),
            updater_events: tx,
        };
        (driver, rx)
    }

    fn request(line: &str) -> Request {
        serde_json::from_str(line).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn create_stream_flush_status() {
        let (mut driver, mut events) = driver(3);

        let created = driver
            .handle(request(
                r#"{"op":"create","id":"p1","project_name":"Demo","files":{"index.html":"<h1/>"}}"#,
            ))
            .await;
        assert_eq!(created["ok"], true);
        assert_eq!(created["memory_bytes"], 5);

        let queued = driver
            .handle(request(r#"{"op":"stream","id":"p1","files":{"app.js":"go()"}}"#))
            .await;
        assert_eq!(queued["ok"], true);
        assert_eq!(queued["queued"], 1);

        let flushed = driver.handle(request(r#"{"op":"flush","id":"p1"}"#)).await;
        assert_eq!(flushed["ok"], true);
        match events.recv().await.unwrap() {
            UpdaterEvent::Flushed { id, files, result } => {
                assert_eq!(id, "p1");
                assert_eq!(files, 1);
                assert!(result.is_ok());
            }
            other => panic!("unexpected event {other:?}"),
        }

        let status = driver.handle(request(r#"{"op":"status"}"#)).await;
        assert_eq!(status["status"]["instance_count"], 1);
        assert_eq!(status["status"]["total_memory_bytes"], 9);

        let got = driver.handle(request(r#"{"op":"get","id":"p1"}"#)).await;
        assert_eq!(got["preview"]["files"]["app.js"], "go()");
    }

    #[tokio::test]
    async fn get_uses_one_shape_for_hits_and_misses() {
        let (mut driver, _events) = driver(3);
        driver
            .handle(request(r#"{"op":"create","id":"p1","project_name":"Demo"}"#))
            .await;

        let hit = driver.handle(request(r#"{"op":"get","id":"p1"}"#)).await;
        assert_eq!(hit["ok"], true);
        assert_eq!(hit["preview"]["id"], "p1");

        let miss = driver.handle(request(r#"{"op":"get","id":"nope"}"#)).await;
        assert_eq!(miss["ok"], true);
        assert!(miss["preview"].is_null());
    }

    #[tokio::test]
    async fn stream_to_unknown_preview_is_refused() {
        let (mut driver, _events) = driver(3);
        let response = driver
            .handle(request(r#"{"op":"stream","id":"ghost","files":{"a":"1"}}"#))
            .await;
        assert_eq!(response["ok"], false);
        assert_eq!(response["error"], "not_found");
        assert!(driver.updaters.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn eviction_drops_the_evicted_updater() {
        let (mut driver, _events) = driver(1);
        let mut store_events = driver.manager.subscribe();

        driver
            .handle(request(r#"{"op":"create","id":"p1","project_name":"Demo"}"#))
            .await;
        driver
            .handle(request(r#"{"op":"stream","id":"p1","files":{"a":"1"}}"#))
            .await;
        assert!(driver.updaters.contains_key("p1"));

        tokio::time::advance(Duration::from_millis(1)).await;
        driver
            .handle(request(r#"{"op":"create","id":"p2","project_name":"Demo"}"#))
            .await;
        let event = store_events.recv().await.unwrap();
        assert!(matches!(&event, StoreEvent::Evicted { id, .. } if id == "p1"));
        driver.on_store_event(&event);
        assert!(driver.updaters.is_empty());

        driver
            .handle(request(r#"{"op":"stream","id":"p2","files":{"a":"1"}}"#))
            .await;
        driver.on_store_event(&StoreEvent::Cleared { count: 1 });
        assert!(driver.updaters.is_empty());
    }

    #[tokio::test]
    async fn not_found_flush_drops_the_updater() {
        let (mut driver, _events) = driver(3);
        driver
            .handle(request(r#"{"op":"create","id":"p1","project_name":"Demo"}"#))
            .await;
        driver
            .handle(request(r#"{"op":"stream","id":"p1","files":{"a":"1"}}"#))
            .await;

        driver.on_updater_event(&UpdaterEvent::Flushed {
            id: "p1".to_string(),
            files: 1,
            result: Err(PreviewError::NotFound {
                id: "p1".to_string(),
            }),
        });
        assert!(driver.updaters.is_empty());
    }

    #[tokio::test]
    async fn export_writes_files_under_the_target_dir() {
        let dir = tempfile::TempDir::new().unwrap();
        let (mut driver, _events) = driver(3);
        driver
            .handle(request(
                r#"{"op":"create","id":"p1","project_name":"Demo","files":{"src/a.ts":"1","b.ts":"2"}}"#,
            ))
            .await;

        let line = json!({ "op": "export", "id": "p1", "dir": dir.path() }).to_string();
        let response = driver.handle(request(&line)).await;
        assert_eq!(response["ok"], true);
        assert_eq!(response["written"], 2);
        let on_disk = std::fs::read_to_string(dir.path().join("src/a.ts")).unwrap();
        assert_eq!(on_disk, "1");
    }
}
