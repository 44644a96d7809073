//! Integration tests for the crawler
//!
//! These tests use wiremock to serve a miniature copy of the division
//! listing site and run the full coordinator against an on-disk SQLite
//! cache, end to end.

use division_crawler::cache::{cache_key, CacheJanitor, PageCache};
use division_crawler::config::{parse_config, Config};
use division_crawler::crawler::{Coordinator, RunOptions};
use division_crawler::history::RunHistoryTracker;
use division_crawler::output::write_clean_audit;
use division_crawler::storage::{open_history_store, open_page_cache_store, KeyValueStore};
use division_crawler::{ChildRecord, CrawlerError, Level};
use serde_json::Value;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ROOT: &str = "/tjyqhdmhcxhfdm";

/// Creates a test configuration pointing at the mock server
fn create_test_config(server: &MockServer, dir: &Path) -> Config {
    parse_config(&format!(
        r#"
[crawler]
entry-url = "{uri}{root}/"
encoding = "utf-8"
timeout-secs = 5
min-delay-ms = 0
max-delay-ms = 0
dataset-pause-ms = [0, 0]
user-agents = ["TestBot/1.0"]

[storage]
database-path = "{dir}/pageCacheDB/test.sqlite"

[output]
data-dir = "{dir}/data"
log-dir = "{dir}/logs"
"#,
        uri = server.uri(),
        root = ROOT,
        dir = dir.display()
    ))
    .expect("test config is valid")
}

fn html(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body.into_bytes(), "text/html; charset=utf-8")
}

async fn mount(server: &MockServer, page: &str, body: String, expected: Option<u64>) {
    let mock = Mock::given(method("GET"))
        .and(path(format!("{}/{}", ROOT, page)))
        .respond_with(html(body));
    let mock = match expected {
        Some(n) => mock.expect(n),
        None => mock,
    };
    mock.mount(server).await;
}

/// Entry page items: (href, year, publication date)
fn entry_page(items: &[(&str, &str, &str)]) -> String {
    let items: String = items
        .iter()
        .map(|(href, year, date)| {
            format!(
                r#"<li><a href="{}"><span class="cont_tit"><font class="cont_tit03">{}年统计用区划代码</font></span><span class="cont_tit02">{}</span></a></li>"#,
                href, year, date
            )
        })
        .collect();
    format!(r#"<html><body><ul class="center_list_contlist">{}</ul></body></html>"#, items)
}

/// Province page cells: (href, name); an empty href renders an unlinked cell
fn province_page(cells: &[(&str, &str)]) -> String {
    let cells: String = cells
        .iter()
        .map(|(href, name)| {
            if href.is_empty() {
                format!("<td>{}</td>", name)
            } else {
                format!(r#"<td><a href="{}">{}<br/></a></td>"#, href, name)
            }
        })
        .collect();
    format!(
        r#"<html><body><table class="provincetable"><tr class="provincetr">{}</tr></table></body></html>"#,
        cells
    )
}

/// City, county or town page rows: (code, name, href)
fn rows_page(level: &str, rows: &[(&str, &str, Option<&str>)]) -> String {
    let rows: String = rows
        .iter()
        .map(|(code, name, href)| match href {
            Some(href) => format!(
                r#"<tr class="{l}tr"><td><a href="{h}">{c}</a></td><td><a href="{h}">{n}</a></td></tr>"#,
                l = level,
                h = href,
                c = code,
                n = name
            ),
            None => format!(
                r#"<tr class="{}tr"><td>{}</td><td>{}</td></tr>"#,
                level, code, name
            ),
        })
        .collect();
    format!(
        r#"<html><body><table class="{l}table"><tr class="{l}head"><td>统计用区划代码</td><td>名称</td></tr>{r}</table></body></html>"#,
        l = level,
        r = rows
    )
}

/// Village page rows: (code, category, name)
fn village_page(rows: &[(&str, &str, &str)]) -> String {
    let rows: String = rows
        .iter()
        .map(|(code, category, name)| {
            format!(
                r#"<tr class="villagetr"><td>{}</td><td>{}</td><td>{}</td></tr>"#,
                code, category, name
            )
        })
        .collect();
    format!(
        r#"<html><body><table class="villagetable">{}</table></body></html>"#,
        rows
    )
}

/// Mounts a five-level Beijing branch plus an unlinked province for `year`
async fn mount_beijing(server: &MockServer, year: &str, expected: Option<u64>) {
    mount(
        server,
        &format!("{}/index.html", year),
        province_page(&[("11.html", "北京市"), ("", "台湾省")]),
        expected,
    )
    .await;
    mount(
        server,
        &format!("{}/11.html", year),
        rows_page("city", &[("110100000000", "市辖区", Some("11/1101.html"))]),
        expected,
    )
    .await;
    mount(
        server,
        &format!("{}/11/1101.html", year),
        rows_page(
            "county",
            &[
                ("110101000000", "东城区", Some("01/110101.html")),
                ("110102000000", "西城区", None),
            ],
        ),
        expected,
    )
    .await;
    mount(
        server,
        &format!("{}/11/01/110101.html", year),
        rows_page("town", &[("110101001000", "东华门街道", Some("01/110101001.html"))]),
        expected,
    )
    .await;
    mount(
        server,
        &format!("{}/11/01/01/110101001.html", year),
        village_page(&[
            ("110101001001", "111", "多福巷社区居委会"),
            ("110101001002", "111", "银闸社区居委会"),
        ]),
        expected,
    )
    .await;
}

fn read_dataset(dir: &Path, file_name: &str) -> Value {
    let content = std::fs::read_to_string(dir.join("data").join(file_name))
        .expect("dataset file written");
    serde_json::from_str(&content).expect("dataset file is JSON")
}

fn open_history(dir: &Path) -> RunHistoryTracker<division_crawler::storage::SqliteStore> {
    let store = open_history_store(&dir.join("pageCacheDB/test.sqlite")).unwrap();
    RunHistoryTracker::open(store).unwrap()
}

async fn run(config: Config, options: RunOptions) -> division_crawler::output::RunStatistics {
    let mut coordinator = Coordinator::new(config, options).unwrap();
    coordinator.run().await.unwrap()
}

#[tokio::test]
async fn test_full_five_level_crawl() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    mount(
        &server,
        "",
        entry_page(&[("2020/index.html", "2020", "2020-06-30")]),
        None,
    )
    .await;
    mount_beijing(&server, "2020", Some(1)).await;

    let stats = run(create_test_config(&server, dir.path()), RunOptions::default()).await;

    assert_eq!(stats.datasets.len(), 1);
    assert_eq!(stats.datasets[0].requested, 5);
    assert_eq!(stats.datasets[0].failed, 0);
    assert!(!stats.datasets[0].use_cache);

    let tree = read_dataset(dir.path(), "2020.json");
    let beijing = &tree[0];
    assert_eq!(beijing["code"], "110000000000");
    let county = &beijing["cities"][0]["counties"][0];
    assert_eq!(county["name"], "东城区");
    let village = &county["towns"][0]["villages"][1];
    assert_eq!(village["code"], "110101001002");
    assert_eq!(village["categoryCode"], "111");

    // Unlinked nodes are leaves with no children key
    assert!(beijing["cities"][0]["counties"][1].get("towns").is_none());
    assert_eq!(tree[1]["name"], "台湾省");
    assert!(tree[1].get("code").is_none());
    assert!(tree[1].get("cities").is_none());

    let history = open_history(dir.path());
    assert_eq!(history.history().len(), 1);
    let queue = &history.history()[0].queues[0];
    assert_eq!(queue.last_modified, "2020/06/30");
    assert_eq!(queue.request_page_list.as_ref().unwrap().len(), 5);
    assert!(queue.request_page_failed_list.as_ref().unwrap().is_empty());
}

#[tokio::test]
async fn test_unchanged_dataset_is_served_from_cache() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    mount(
        &server,
        "",
        entry_page(&[("2020/index.html", "2020", "2020-06-30")]),
        Some(2),
    )
    .await;
    // Every listing page is fetched exactly once across both runs
    mount_beijing(&server, "2020", Some(1)).await;

    run(create_test_config(&server, dir.path()), RunOptions::default()).await;
    let second = run(create_test_config(&server, dir.path()), RunOptions::default()).await;

    assert!(second.datasets[0].use_cache);
    assert_eq!(second.datasets[0].requested, 0);
    assert_eq!(second.datasets[0].failed, 0);

    let tree = read_dataset(dir.path(), "2020.json");
    assert_eq!(
        tree[0]["cities"][0]["counties"][0]["towns"][0]["villages"]
            .as_array()
            .unwrap()
            .len(),
        2
    );
    assert_eq!(open_history(dir.path()).history().len(), 2);
}

#[tokio::test]
async fn test_empty_listing_is_never_cached() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    mount(
        &server,
        "",
        entry_page(&[("2020/index.html", "2020", "2020-06-30")]),
        None,
    )
    .await;
    mount(
        &server,
        "2020/index.html",
        province_page(&[("65.html", "新疆维吾尔自治区")]),
        Some(1),
    )
    .await;
    // A transient zero-row page must be asked for again on the next run
    mount(&server, "2020/65.html", rows_page("city", &[]), Some(2)).await;

    run(create_test_config(&server, dir.path()), RunOptions::default()).await;
    let second = run(create_test_config(&server, dir.path()), RunOptions::default()).await;

    assert!(second.datasets[0].use_cache);
    assert_eq!(second.datasets[0].requested, 1);

    let store = open_page_cache_store(&dir.path().join("pageCacheDB/test.sqlite")).unwrap();
    let cache = PageCache::new(store);
    let city_page = format!("{}{}/2020/65.html", server.uri(), ROOT);
    assert!(cache.get(&city_page).unwrap().is_none());
    assert!(cache.store().get(&cache_key(&city_page)).unwrap().is_none());
}

#[tokio::test]
async fn test_timed_out_page_is_recorded_once() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    mount(
        &server,
        "",
        entry_page(&[("2020/index.html", "2020", "2020-06-30")]),
        None,
    )
    .await;
    mount(
        &server,
        "2020/index.html",
        province_page(&[("11.html", "北京市"), ("12.html", "天津市")]),
        None,
    )
    .await;
    Mock::given(method("GET"))
        .and(path(format!("{}/2020/11.html", ROOT)))
        .respond_with(
            html(rows_page("city", &[("110100000000", "市辖区", None)]))
                .set_delay(Duration::from_secs(8)),
        )
        .mount(&server)
        .await;
    mount(
        &server,
        "2020/12.html",
        rows_page("city", &[("120100000000", "市辖区", None)]),
        None,
    )
    .await;

    let stats = run(create_test_config(&server, dir.path()), RunOptions::default()).await;
    assert_eq!(stats.datasets[0].failed, 1);
    assert_eq!(stats.datasets[0].requested, 2);

    // The failed node is a branch with no children; its sibling is complete
    let tree = read_dataset(dir.path(), "2020.json");
    assert_eq!(tree[0]["cities"], serde_json::json!([]));
    assert_eq!(tree[1]["cities"][0]["code"], "120100000000");

    let history = open_history(dir.path());
    let failed = history.history()[0].queues[0]
        .request_page_failed_list
        .clone()
        .unwrap();
    let timed_out = format!("{}{}/2020/11.html", server.uri(), ROOT);
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].url, timed_out);
    assert_eq!(failed[0].cache_key, cache_key(&timed_out));
    assert_eq!(failed[0].level, Level::City);
    assert_eq!(failed[0].code.as_deref(), Some("110000000000"));
}

#[tokio::test]
async fn test_dongguan_skips_county_tier_by_year() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    mount(
        &server,
        "",
        entry_page(&[
            ("2019/index.html", "2019", "2019-10-31"),
            ("2017/index.html", "2017", "2018-01-31"),
        ]),
        None,
    )
    .await;

    for year in ["2017", "2019"] {
        mount(
            &server,
            &format!("{}/index.html", year),
            province_page(&[("44.html", "广东省")]),
            None,
        )
        .await;
        mount(
            &server,
            &format!("{}/44.html", year),
            rows_page("city", &[("441900000000", "东莞市", Some("44/4419.html"))]),
            None,
        )
        .await;
    }

    // 2017: the city page lists towns directly
    mount(
        &server,
        "2017/44/4419.html",
        rows_page("town", &[("441900003000", "东城街道", None)]),
        None,
    )
    .await;
    // 2019: the same code lists a county tier
    mount(
        &server,
        "2019/44/4419.html",
        rows_page("county", &[("441900000000", "东莞市", None)]),
        None,
    )
    .await;

    let stats = run(create_test_config(&server, dir.path()), RunOptions::default()).await;
    assert_eq!(stats.datasets.len(), 2);
    assert_eq!(stats.total_failed(), 0);

    let skipped = read_dataset(dir.path(), "2017.json");
    let dongguan = &skipped[0]["cities"][0];
    assert!(dongguan.get("counties").is_none());
    assert_eq!(dongguan["towns"][0]["code"], "441900003000");

    let regular = read_dataset(dir.path(), "2019.json");
    let dongguan = &regular[0]["cities"][0];
    assert!(dongguan.get("towns").is_none());
    assert_eq!(dongguan["counties"][0]["name"], "东莞市");
}

#[tokio::test]
async fn test_changed_publication_date_forces_refetch() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    mount(
        &server,
        "",
        entry_page(&[("2020/index.html", "2020", "2020-03-01")]),
        None,
    )
    .await;
    mount_beijing(&server, "2020", Some(1)).await;
    run(create_test_config(&server, dir.path()), RunOptions::default()).await;
    server.verify().await;
    server.reset().await;

    // Same dataset republished: every page is fetched again
    mount(
        &server,
        "",
        entry_page(&[("2020/index.html", "2020", "2020-06-30")]),
        None,
    )
    .await;
    mount_beijing(&server, "2020", Some(1)).await;

    let coordinator = Coordinator::new(create_test_config(&server, dir.path()), RunOptions::default())
        .unwrap();
    let plans = coordinator.preview().await.unwrap();
    assert!(!plans[0].use_cache);
    drop(coordinator);

    let second = run(create_test_config(&server, dir.path()), RunOptions::default()).await;
    assert!(!second.datasets[0].use_cache);
    assert_eq!(second.datasets[0].requested, 5);

    let history = open_history(dir.path());
    let latest = history.load_latest().unwrap();
    assert_eq!(latest.queues[0].last_modified, "2020/06/30");
    assert_eq!(history.history()[0].queues[0].last_modified, "2020/03/01");
}

#[tokio::test]
async fn test_only_filter_and_missing_datasets() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    mount(
        &server,
        "",
        entry_page(&[
            ("2020/index.html", "2020", "2020-06-30"),
            ("2019/index.html", "2019", "2019-10-31"),
        ]),
        None,
    )
    .await;
    mount(
        &server,
        "2019/index.html",
        province_page(&[("", "台湾省")]),
        Some(1),
    )
    .await;

    let options = RunOptions {
        fresh: false,
        only_years: vec!["2019".to_string()],
    };
    let stats = run(create_test_config(&server, dir.path()), options).await;
    assert_eq!(stats.datasets.len(), 1);
    assert_eq!(stats.datasets[0].year, "2019");
    assert!(!dir.path().join("data/2020.json").exists());

    // An entry page without any dataset is fatal
    server.reset().await;
    mount(&server, "", "<html><body>维护中</body></html>".to_string(), None).await;
    let mut coordinator =
        Coordinator::new(create_test_config(&server, dir.path()), RunOptions::default()).unwrap();
    assert!(matches!(
        coordinator.run().await,
        Err(CrawlerError::NoDatasets { .. })
    ));
}

#[tokio::test]
async fn test_only_run_keeps_trust_for_other_datasets() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    mount(
        &server,
        "",
        entry_page(&[
            ("2020/index.html", "2020", "2020-06-30"),
            ("2019/index.html", "2019", "2019-10-31"),
        ]),
        None,
    )
    .await;
    // 2020 is unchanged throughout and must only ever be fetched once
    mount_beijing(&server, "2020", Some(1)).await;
    mount(
        &server,
        "2019/index.html",
        province_page(&[("", "台湾省")]),
        Some(1),
    )
    .await;

    run(create_test_config(&server, dir.path()), RunOptions::default()).await;

    let only = RunOptions {
        fresh: false,
        only_years: vec!["2019".to_string()],
    };
    let second = run(create_test_config(&server, dir.path()), only).await;
    assert_eq!(second.datasets.len(), 1);
    assert!(second.datasets[0].use_cache);

    let history = open_history(dir.path());
    let latest = history.load_latest().unwrap();
    assert_eq!(latest.queues.len(), 2);
    assert_eq!(latest.queues[0].year, "2020");
    assert!(latest.queues[0].request_page_list.is_none());

    let third = run(create_test_config(&server, dir.path()), RunOptions::default()).await;
    assert_eq!(third.datasets.len(), 2);
    assert!(third.datasets.iter().all(|d| d.use_cache));
    assert_eq!(third.total_requested(), 0);
}

#[tokio::test]
async fn test_janitor_is_idempotent_on_sqlite() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("pageCacheDB/test.sqlite");
    let log_dir = dir.path().join("logs");

    let mut cache = PageCache::new(open_page_cache_store(&db_path).unwrap());
    cache
        .put("http://x/2020/11.html", &[ChildRecord::new("市辖区", "110100000000")])
        .unwrap();
    cache.store_mut().put(&cache_key("http://x/empty"), b"[]").unwrap();
    cache.store_mut().put(&cache_key("http://x/null"), b"null").unwrap();
    cache.store_mut().put(&cache_key("http://x/bad"), b"{not json").unwrap();

    // The run history shares the database but not the bucket
    let mut history = open_history(dir.path());
    history
        .append_run(division_crawler::RunRecord::new(100, vec![]))
        .unwrap();

    let first = CacheJanitor::new(&mut cache)
        .clean(|scan| {
            write_clean_audit(&log_dir, 1, scan)
                .map(|_| ())
                .map_err(CrawlerError::from)
        })
        .unwrap();
    assert_eq!(first.scan.all_keys.len(), 4);
    assert_eq!(first.scan.invalid_keys.len(), 3);
    assert_eq!(first.purge.deleted, 3);
    assert!(first.purge.failed.is_empty());

    let audited: Vec<String> = serde_json::from_str(
        &std::fs::read_to_string(log_dir.join("page-cache-clean/1.error.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(audited.len(), 3);

    let second = CacheJanitor::new(&mut cache)
        .clean(|scan| {
            write_clean_audit(&log_dir, 2, scan)
                .map(|_| ())
                .map_err(CrawlerError::from)
        })
        .unwrap();
    assert_eq!(second.scan.all_keys.len(), 1);
    assert_eq!(second.purge.deleted, 0);

    assert_eq!(
        cache.get("http://x/2020/11.html").unwrap().unwrap()[0].code,
        "110100000000"
    );
    assert_eq!(open_history(dir.path()).history().len(), 1);
}
