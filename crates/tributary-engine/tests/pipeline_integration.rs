//! End-to-end runs against in-memory blob stores and a SQLite warehouse.
//!
//! The fetcher is replaced by a canned payload; everything after it is the
//! real archiver, transformer and loader.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use object_store::path::Path as ObjectPath;
use serde_json::{json, Value};
use tempfile::TempDir;
use tributary_engine::errors::{FetchError, LoadError, PipelineError};
use tributary_engine::load::SqliteConnector;
use tributary_engine::{
    transform, Archiver, FetchRequest, Fetcher, Handler, ObjectBlobStore, Pipeline, RunSummary,
    StageFailure,
};
use tributary_types::{presets, DatasetDescriptor, Stage};

enum Canned {
    Body(Bytes),
    Status(u16),
}

struct CannedFetcher(Canned);

impl CannedFetcher {
    fn json(value: &Value) -> Arc<Self> {
        Arc::new(Self(Canned::Body(Bytes::from(serde_json::to_vec(value).unwrap()))))
    }
}

#[async_trait]
impl Fetcher for CannedFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<Bytes, FetchError> {
        match &self.0 {
            Canned::Body(body) => Ok(body.clone()),
            Canned::Status(status) => Err(FetchError::Status {
                url: request.url.clone(),
                status: *status,
            }),
        }
    }
}

/// Answers after a delay, long enough for the caller to give up first.
struct SlowFetcher {
    delay: Duration,
    body: Bytes,
}

#[async_trait]
impl Fetcher for SlowFetcher {
    async fn fetch(&self, _request: &FetchRequest) -> Result<Bytes, FetchError> {
        tokio::time::sleep(self.delay).await;
        Ok(self.body.clone())
    }
}

struct Harness {
    _dir: TempDir,
    db: PathBuf,
    raw: ObjectBlobStore,
    clean: ObjectBlobStore,
}

impl Harness {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("warehouse.db");
        let conn = rusqlite::Connection::open(&db).unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE anime_table (
                "_id" TEXT PRIMARY KEY, title TEXT NOT NULL, alternativetitles TEXT,
                ranking INTEGER, genres TEXT, episodes INTEGER, status TEXT,
                synopsis TEXT, "type" TEXT, short_synopsis TEXT
            );
            CREATE TABLE got_houses_table (
                url TEXT PRIMARY KEY, name TEXT NOT NULL, region TEXT, coatofarms TEXT,
                words TEXT, currentlord TEXT, overlord TEXT, swornmembers TEXT
            );
            "#,
        )
        .unwrap();

        Self {
            _dir: dir,
            db,
            raw: ObjectBlobStore::from_url("memory://").unwrap(),
            clean: ObjectBlobStore::from_url("memory://").unwrap(),
        }
    }

    fn pipeline(&self, fetcher: Arc<dyn Fetcher>) -> Pipeline {
        Pipeline::new(
            fetcher,
            Archiver::new(Arc::new(self.raw.clone()), Arc::new(self.clean.clone())),
            Arc::new(SqliteConnector::new(&self.db)),
        )
    }

    fn rows(&self, table: &str) -> Vec<Vec<Value>> {
        query(&self.db, table)
    }
}

fn query(db: &Path, table: &str) -> Vec<Vec<Value>> {
    let conn = rusqlite::Connection::open(db).unwrap();
    let mut stmt = conn.prepare(&format!("SELECT * FROM {table} ORDER BY rowid")).unwrap();
    let width = stmt.column_count();
    stmt.query_map([], |row| {
        (0..width)
            .map(|i| {
                Ok(match row.get::<_, rusqlite::types::Value>(i)? {
                    rusqlite::types::Value::Null => Value::Null,
                    rusqlite::types::Value::Integer(n) => json!(n),
                    rusqlite::types::Value::Real(f) => json!(f),
                    rusqlite::types::Value::Text(s) => json!(s),
                    rusqlite::types::Value::Blob(b) => json!(b),
                })
            })
            .collect::<rusqlite::Result<Vec<Value>>>()
    })
    .unwrap()
    .map(Result::unwrap)
    .collect()
}

async fn read(store: &ObjectBlobStore, key: &str) -> Option<Bytes> {
    match store.inner().get(&ObjectPath::from(key)).await {
        Ok(got) => Some(got.bytes().await.unwrap()),
        Err(object_store::Error::NotFound { .. }) => None,
        Err(e) => panic!("unexpected store error: {e}"),
    }
}

fn anime(id: &str, title: &str, kind: &str, episodes: Value) -> Value {
    json!({
        "_id": id,
        "title": title,
        "alternativeTitles": [format!("{title} (alt)")],
        "ranking": id.parse::<i64>().unwrap(),
        "genres": ["Action", "Adventure"],
        "episodes": episodes,
        "hasEpisode": true,
        "hasRanking": true,
        "image": "https://img.example/a.png",
        "link": "https://anime.example/a",
        "status": "Finished Airing",
        "synopsis": format!("{title}: {}", "a long synopsis ".repeat(10)),
        "thumb": "https://img.example/a_thumb.png",
        "type": kind,
    })
}

fn media_payload() -> Value {
    json!({ "data": [
        anime("1", "Fullmetal Alchemist: Brotherhood", "TV", json!(64)),
        anime("2", "Steins;Gate", "TV", json!("")),
        anime("3", "Fullmetal Alchemist: Brotherhood", "TV", json!(64)),
        anime("4", "Gintama", "TV", json!(201)),
        anime("5", "Hunter x Hunter", "TV", json!(148)),
    ]})
}

fn house(i: usize, words: &str) -> Value {
    json!({
        "url": format!("https://www.anapioficeandfire.com/api/houses/{i}"),
        "name": format!("House {i}"),
        "region": "The North",
        "coatOfArms": "A grey direwolf on a white field",
        "words": words,
        "titles": ["Lord of Winterfell"],
        "seats": ["Winterfell"],
        "currentLord": "https://www.anapioficeandfire.com/api/characters/1",
        "heir": "",
        "overlord": "",
        "founded": "Age of Heroes",
        "founder": "",
        "diedOut": "",
        "ancestralWeapons": ["Ice"],
        "cadetBranches": [],
        "swornMembers": ["https://www.anapioficeandfire.com/api/characters/2"],
    })
}

fn request() -> FetchRequest {
    FetchRequest::new("https://api.example.com/feed")
}

async fn run(
    harness: &Harness,
    payload: &Value,
    descriptor: &DatasetDescriptor,
) -> Result<RunSummary, StageFailure> {
    harness
        .pipeline(CannedFetcher::json(payload))
        .run(&request(), descriptor)
        .await
}

#[tokio::test]
async fn media_run_archives_cleans_and_loads() {
    let harness = Harness::new();
    let payload = media_payload();
    let descriptor = presets::media();

    let summary = run(&harness, &payload, &descriptor).await.unwrap();
    assert_eq!(summary.dataset, "media");
    assert_eq!(summary.transform.parsed, 5);
    assert_eq!(summary.rows_loaded, 4);

    let raw = read(&harness.raw, "anime_raw.json").await.unwrap();
    assert_eq!(raw, Bytes::from(serde_json::to_vec(&payload).unwrap()));
    assert_eq!(summary.raw_bytes, raw.len() as u64);

    let clean = read(&harness.clean, "tv_anime_data.json").await.unwrap();
    let snapshot: Vec<Value> = serde_json::from_slice(&clean).unwrap();
    assert_eq!(snapshot.len(), 4);
    let expected = transform(&raw, &descriptor).unwrap().to_snapshot().unwrap();
    assert_eq!(clean, expected);

    let rows = harness.rows("anime_table");
    assert_eq!(rows.len(), 4);
    let titles: Vec<&str> = rows.iter().map(|r| r[1].as_str().unwrap()).collect();
    assert_eq!(
        titles,
        ["Fullmetal Alchemist: Brotherhood", "Steins;Gate", "Gintama", "Hunter x Hunter"]
    );
    assert_eq!(rows[1][5], json!(0), "blank episodes defaulted");
    assert_eq!(rows[0][4], json!(r#"["Action","Adventure"]"#));
    for row in &rows {
        assert_eq!(row[8], json!("TV"));
        assert!(row[9].as_str().unwrap().chars().count() <= 100);
    }
}

#[tokio::test]
async fn universe_run_excludes_houses_without_words() {
    let harness = Harness::new();
    let payload = json!([house(1, "Winter is Coming"), house(2, ""), house(3, "Hear Me Roar!")]);

    let summary = run(&harness, &payload, &presets::universe()).await.unwrap();
    assert_eq!(summary.transform.filtered_out, 1);
    assert_eq!(summary.rows_loaded, 2);

    let clean = read(&harness.clean, "got_cleaned.json").await.unwrap();
    let snapshot: Vec<Value> = serde_json::from_slice(&clean).unwrap();
    assert_eq!(snapshot.len(), 2);
    for record in &snapshot {
        let keys: Vec<&str> = record.as_object().unwrap().keys().map(String::as_str).collect();
        assert_eq!(
            keys,
            ["url", "name", "region", "coatOfArms", "words", "currentLord", "overlord", "swornMembers"]
        );
        assert_ne!(record["name"], json!("House 2"));
    }

    let rows = harness.rows("got_houses_table");
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|r| r.len() == 8 && r[1] != json!("House 2")));
}

#[tokio::test]
async fn constraint_violation_loads_nothing_but_keeps_snapshots() {
    let harness = Harness::new();
    let mut houses: Vec<Value> = (1..=10).map(|i| house(i, "Words")).collect();
    let mut bad = house(11, "Words");
    bad["name"] = Value::Null;
    houses.push(bad);

    let failure = run(&harness, &Value::Array(houses), &presets::universe())
        .await
        .unwrap_err();
    assert_eq!(failure.stage, Stage::Load);
    match &failure.error {
        PipelineError::Load(err @ LoadError::Insert { row: 10, .. }) => {
            assert!(err.cause().is_some());
        }
        other => panic!("expected insert failure at row 10, got {other}"),
    }

    assert!(harness.rows("got_houses_table").is_empty());
    assert!(read(&harness.raw, "got_raw.json").await.is_some());
    assert!(read(&harness.clean, "got_cleaned.json").await.is_some());
}

#[tokio::test]
async fn fetch_failure_writes_nothing() {
    let harness = Harness::new();
    let pipeline = harness.pipeline(Arc::new(CannedFetcher(Canned::Status(503))));

    let failure = pipeline.run(&request(), &presets::media()).await.unwrap_err();
    assert_eq!(failure.stage, Stage::Fetch);
    assert_eq!(failure.error.kind(), "fetch_error");

    assert!(read(&harness.raw, "anime_raw.json").await.is_none());
    assert!(read(&harness.clean, "tv_anime_data.json").await.is_none());
    assert!(harness.rows("anime_table").is_empty());
}

#[tokio::test]
async fn malformed_payload_keeps_raw_snapshot_only() {
    let harness = Harness::new();
    let body = Bytes::from_static(b"<html>rate limited</html>");
    let pipeline = harness.pipeline(Arc::new(CannedFetcher(Canned::Body(body.clone()))));

    let failure = pipeline.run(&request(), &presets::media()).await.unwrap_err();
    assert_eq!(failure.stage, Stage::Transform);
    assert_eq!(failure.error.kind(), "parse_error");

    assert_eq!(read(&harness.raw, "anime_raw.json").await, Some(body));
    assert!(read(&harness.clean, "tv_anime_data.json").await.is_none());
}

#[tokio::test]
async fn missing_table_is_a_load_failure() {
    let harness = Harness::new();
    let mut descriptor = presets::universe();
    descriptor.table.name = "no_such_table".into();

    let failure = run(&harness, &json!([house(1, "Words")]), &descriptor)
        .await
        .unwrap_err();
    assert_eq!(failure.stage, Stage::Load);
    assert_eq!(failure.error.kind(), "load_error");
}

#[tokio::test]
async fn unreachable_database_is_a_connection_failure() {
    let harness = Harness::new();
    let blocker = harness.db.with_file_name("not_a_dir");
    std::fs::write(&blocker, b"").unwrap();

    let pipeline = Pipeline::new(
        CannedFetcher::json(&json!([house(1, "Words")])),
        Archiver::shared(Arc::new(harness.raw.clone())),
        Arc::new(SqliteConnector::new(blocker.join("warehouse.db"))),
    );
    let failure = pipeline.run(&request(), &presets::universe()).await.unwrap_err();
    assert_eq!(failure.stage, Stage::Load);
    assert_eq!(failure.error.kind(), "conn_error");
}

#[tokio::test]
async fn preview_writes_nothing() {
    let harness = Harness::new();
    let pipeline = harness.pipeline(CannedFetcher::json(&media_payload()));

    let preview = pipeline.preview(&request(), &presets::media()).await.unwrap();
    assert_eq!(preview.cleaned.len(), 4);

    assert!(read(&harness.raw, "anime_raw.json").await.is_none());
    assert!(harness.rows("anime_table").is_empty());
}

#[tokio::test]
async fn handler_reports_status_codes() {
    let harness = Harness::new();

    let ok = Handler::new(
        Arc::new(harness.pipeline(CannedFetcher::json(&media_payload()))),
        request(),
        presets::media(),
    )
    .handle(&json!({}))
    .await;
    assert_eq!(ok.code, 200);
    assert!(ok.message.contains("4 rows loaded into anime_table"), "{}", ok.message);

    let bad_gateway = Handler::new(
        Arc::new(harness.pipeline(Arc::new(CannedFetcher(Canned::Status(500))))),
        request(),
        presets::media(),
    )
    .handle(&json!({}))
    .await;
    assert_eq!(bad_gateway.code, 502);
    assert!(bad_gateway.message.contains("HTTP 500"));

    let internal = Handler::new(
        Arc::new(harness.pipeline(CannedFetcher::json(&json!({"unexpected": true})))),
        request(),
        presets::media(),
    )
    .handle(&json!({"source": "scheduler"}))
    .await;
    assert_eq!(internal.code, 500);
    assert!(internal.message.starts_with("transform stage failed"));
}

#[tokio::test]
async fn dropped_invocation_stops_the_run() {
    let harness = Harness::new();
    let fetcher = Arc::new(SlowFetcher {
        delay: Duration::from_millis(200),
        body: Bytes::from(serde_json::to_vec(&json!([house(1, "Words")])).unwrap()),
    });
    let handler = Handler::new(Arc::new(harness.pipeline(fetcher)), request(), presets::universe());

    let outcome = tokio::time::timeout(Duration::from_millis(50), handler.handle(&json!({}))).await;
    assert!(outcome.is_err(), "deadline should fire before the fetch answers");

    tokio::time::sleep(Duration::from_millis(600)).await;
    assert!(read(&harness.raw, "got_raw.json").await.is_none());
    assert!(harness.rows("got_houses_table").is_empty());
}
