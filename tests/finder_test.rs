//! End-to-end finder tests against mock archives using wiremock
//!
//! Each test serves auto-index style listing pages and drives the real
//! `HttpListing` client through the RouteViews and RIS finders.

use chrono::{TimeZone, Utc};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use bgpfinder::config::ArchiveConfig;
use bgpfinder::crawler::HttpListing;
use bgpfinder::finder::{Finder, MultiFinder, RisFinder, RouteViewsFinder};
use bgpfinder::models::{Collector, DumpKind, Project};
use bgpfinder::query::Query;
use bgpfinder::utils::error::FinderError;

/// Apache-style directory index with sort and parent links
fn index(links: &[&str]) -> String {
    let mut html = String::from(
        "<html><head><title>Index</title></head><body><h1>Index</h1>\n\
         <a href=\"?C=N;O=D\">Name</a> <a href=\"?C=M;O=A\">Last modified</a>\n\
         <a href=\"../\">Parent Directory</a>\n",
    );
    for link in links {
        html.push_str(&format!("<a href=\"{link}\">{link}</a>\n"));
    }
    html.push_str("</body></html>");
    html
}

async fn serve_index(server: &MockServer, at: &str, links: &[&str]) {
    Mock::given(method("GET"))
        .and(path(at))
        .respond_with(ResponseTemplate::new(200).set_body_string(index(links)))
        .mount(server)
        .await;
}

async fn expect_untouched(server: &MockServer, at: &str) {
    Mock::given(method("GET"))
        .and(path(at))
        .respond_with(ResponseTemplate::new(200).set_body_string(index(&[])))
        .expect(0)
        .mount(server)
        .await;
}

fn listing() -> Arc<HttpListing> {
    Arc::new(HttpListing::new().unwrap())
}

fn mid_january() -> Query {
    Query::new(
        Utc.with_ymd_and_hms(2021, 1, 10, 0, 0, 0).unwrap(),
        Utc.with_ymd_and_hms(2021, 1, 20, 0, 0, 0).unwrap(),
    )
}

// ============================================================================
// RouteViews
// ============================================================================

#[tokio::test]
async fn test_routeviews_collectors_from_root_listing() {
    let server = MockServer::start().await;
    serve_index(
        &server,
        "/",
        &["/bgpdata", "/route-views3/bgpdata/", "route-views.sydney/bgpdata", "/ipv6/", "README.txt"],
    )
    .await;

    let root = format!("{}/", server.uri());
    let finder = RouteViewsFinder::with_archive_url(listing(), &root).await.unwrap();

    let names: Vec<String> = finder.collectors("").into_iter().map(|c| c.name).collect();
    assert_eq!(names, vec!["route-views2", "route-views3", "route-views.sydney"]);
    assert_eq!(finder.project("").unwrap().name, "routeviews");
    assert!(finder.collector("rrc00").is_none());
    assert!(finder.collectors("ris").is_empty());
}

#[tokio::test]
async fn test_routeviews_rib_window_skips_logs_and_other_months() {
    let server = MockServer::start().await;
    serve_index(&server, "/", &["/route-views3/bgpdata/"]).await;
    serve_index(
        &server,
        "/route-views3/bgpdata/",
        &["2021.01/", "logs/", "2021.02/"],
    )
    .await;
    serve_index(
        &server,
        "/route-views3/bgpdata/2021.01/",
        &["rib.20210115.0000.bz2", "updates.20210115.0005.bz2"],
    )
    .await;
    expect_untouched(&server, "/route-views3/bgpdata/2021.02/").await;
    expect_untouched(&server, "/route-views3/bgpdata/logs/").await;

    let root = format!("{}/", server.uri());
    let finder = RouteViewsFinder::with_archive_url(listing(), &root).await.unwrap();
    let dumps = finder
        .find(&mid_january().with_kind(DumpKind::Rib))
        .await
        .unwrap();

    assert_eq!(dumps.len(), 1);
    let dump = &dumps[0];
    assert_eq!(dump.kind, DumpKind::Rib);
    assert_eq!(dump.collector.name, "route-views3");
    assert_eq!(dump.collector.project.name, "routeviews");
    assert_eq!(
        dump.url,
        format!("{}/route-views3/bgpdata/2021.01/rib.20210115.0000.bz2", server.uri())
    );
    assert_eq!(dump.timestamp, 1_610_668_800);
    assert_eq!(dump.duration, Duration::from_secs(2 * 3600));
}

#[tokio::test]
async fn test_routeviews_lists_only_needed_kind_directories() {
    let server = MockServer::start().await;
    serve_index(&server, "/", &["/bgpdata"]).await;
    serve_index(&server, "/bgpdata/", &["2021.01/"]).await;
    serve_index(&server, "/bgpdata/2021.01/", &["RIBS/", "UPDATES/"]).await;
    serve_index(
        &server,
        "/bgpdata/2021.01/UPDATES/",
        &[
            "updates.20210109.2345.bz2",
            "updates.20210110.0000.bz2",
            "updates.20210119.2345.bz2",
            "updates.20210120.0000.bz2",
        ],
    )
    .await;
    expect_untouched(&server, "/bgpdata/2021.01/RIBS/").await;

    let root = format!("{}/", server.uri());
    let finder = RouteViewsFinder::with_archive_url(listing(), &root).await.unwrap();
    let dumps = finder
        .find(&mid_january().with_kind(DumpKind::Updates))
        .await
        .unwrap();

    let stamps: Vec<i64> = dumps.iter().map(|d| d.timestamp).collect();
    assert_eq!(
        stamps,
        vec![
            Utc.with_ymd_and_hms(2021, 1, 10, 0, 0, 0).unwrap().timestamp(),
            Utc.with_ymd_and_hms(2021, 1, 19, 23, 45, 0).unwrap().timestamp(),
        ]
    );
    assert!(dumps.iter().all(|d| d.collector.name == "route-views2"));
    assert!(dumps[0].url.ends_with("/bgpdata/2021.01/UPDATES/updates.20210110.0000.bz2"));
}

#[tokio::test]
async fn test_unreachable_collector_root_fails_find() {
    let server = MockServer::start().await;
    serve_index(&server, "/", &["/route-views3/bgpdata/"]).await;
    Mock::given(method("GET"))
        .and(path("/route-views3/bgpdata/"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let root = format!("{}/", server.uri());
    let finder = RouteViewsFinder::with_archive_url(listing(), &root).await.unwrap();
    let err = finder.find(&mid_january()).await.unwrap_err();

    assert!(matches!(err, FinderError::RemoteFetch(_)));
    assert!(err.is_recoverable());
}

#[tokio::test]
async fn test_inverted_window_does_no_io() {
    let server = MockServer::start().await;
    serve_index(&server, "/", &["/bgpdata"]).await;
    expect_untouched(&server, "/bgpdata/").await;

    let root = format!("{}/", server.uri());
    let finder = RouteViewsFinder::with_archive_url(listing(), &root).await.unwrap();
    let q = mid_january();
    let inverted = Query::new(q.until, q.from);

    assert!(finder.find(&inverted).await.unwrap().is_empty());
    assert!(finder.find(&Query::new(q.from, q.from)).await.unwrap().is_empty());
}

// ============================================================================
// RIPE RIS
// ============================================================================

async fn ris_server() -> MockServer {
    let server = MockServer::start().await;
    serve_index(
        &server,
        "/docs/route-collectors/",
        &[
            "/docs/route-collectors/rrc00/",
            "/docs/route-collectors/rrc01/",
            "https://www.ripe.net/rrc00-history",
            "/docs/faq/",
        ],
    )
    .await;
    server
}

async fn ris_finder(server: &MockServer) -> RisFinder {
    RisFinder::with_urls(
        listing(),
        &format!("{}/docs/route-collectors/", server.uri()),
        &format!("{}/data", server.uri()),
    )
    .await
    .unwrap()
}

#[tokio::test]
async fn test_ris_collectors_deduplicated_in_order() {
    let server = ris_server().await;
    let finder = ris_finder(&server).await;

    let names: Vec<String> = finder.collectors("ris").into_iter().map(|c| c.name).collect();
    assert_eq!(names, vec!["rrc00", "rrc01"]);
    assert!(finder.project("routeviews").is_none());
}

#[tokio::test]
async fn test_ris_flat_month_directory() {
    let server = ris_server().await;
    serve_index(&server, "/data/rrc00/", &["2021.01/", "latest/"]).await;
    serve_index(
        &server,
        "/data/rrc00/2021.01/",
        &[
            "bview.20210115.0000.gz",
            "view.20210115.0800.gz",
            "updates.20210115.0005.gz",
            "updates.20210125.0005.gz",
            "bview.20210115.0000.gz.md5",
        ],
    )
    .await;
    expect_untouched(&server, "/data/rrc01/").await;

    let finder = ris_finder(&server).await;
    let rrc00 = finder.collector("rrc00").unwrap();
    let dumps = finder
        .find(&mid_january().with_collectors(vec![rrc00]))
        .await
        .unwrap();

    let kinds: Vec<(DumpKind, u64)> = dumps.iter().map(|d| (d.kind, d.duration.as_secs())).collect();
    assert_eq!(
        kinds,
        vec![
            (DumpKind::Rib, 8 * 3600),
            (DumpKind::Rib, 8 * 3600),
            (DumpKind::Updates, 300),
        ]
    );
    assert_eq!(
        dumps[0].url,
        format!("{}/data/rrc00/2021.01/bview.20210115.0000.gz", server.uri())
    );
}

#[tokio::test]
async fn test_ris_unreadable_month_is_skipped() {
    let server = ris_server().await;
    serve_index(&server, "/data/rrc00/", &["2020.12/", "2021.01/"]).await;
    Mock::given(method("GET"))
        .and(path("/data/rrc00/2020.12/"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    serve_index(&server, "/data/rrc00/2021.01/", &["updates.20210101.0000.gz"]).await;

    let finder = ris_finder(&server).await;
    let query = Query::new(
        Utc.with_ymd_and_hms(2020, 12, 31, 0, 0, 0).unwrap(),
        Utc.with_ymd_and_hms(2021, 1, 2, 0, 0, 0).unwrap(),
    )
    .with_collectors(vec![Collector::new(&Project::new("ris"), "rrc00")]);

    let dumps = finder.find(&query).await.unwrap();
    assert_eq!(dumps.len(), 1);
    assert_eq!(dumps[0].kind, DumpKind::Updates);
}

#[tokio::test]
async fn test_ris_refresh_failure_keeps_previous_list() {
    let server = ris_server().await;
    let finder = ris_finder(&server).await;
    assert_eq!(finder.collectors("").len(), 2);

    server.reset().await;
    Mock::given(method("GET"))
        .and(path("/docs/route-collectors/"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let err = finder.refresh_collectors().await.unwrap_err();
    assert!(matches!(err, FinderError::CollectorList { .. }));
    assert_eq!(finder.collectors("").len(), 2);

    server.reset().await;
    serve_index(&server, "/docs/route-collectors/", &["rrc00/", "rrc03/", "rrc04/"]).await;
    assert_eq!(finder.refresh_collectors().await.unwrap(), 3);
    assert!(finder.collector("rrc01").is_none());
    assert!(finder.collector("rrc04").is_some());
}

#[tokio::test]
async fn test_ris_collector_list_failure_fails_construction() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/docs/route-collectors/"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let result = RisFinder::with_urls(
        listing(),
        &format!("{}/docs/route-collectors/", server.uri()),
        &format!("{}/data/", server.uri()),
    )
    .await;
    assert!(matches!(result, Err(FinderError::CollectorList { .. })));
}

// ============================================================================
// Multi-provider
// ============================================================================

#[tokio::test]
async fn test_multi_finder_routes_collectors_to_their_provider() {
    let server = MockServer::start().await;
    serve_index(&server, "/rv/", &["route-views3/bgpdata/"]).await;
    serve_index(&server, "/docs/route-collectors/", &["rrc00/"]).await;
    serve_index(&server, "/rv/route-views3/bgpdata/", &["2021.01/"]).await;
    serve_index(&server, "/rv/route-views3/bgpdata/2021.01/", &["RIBS/"]).await;
    serve_index(
        &server,
        "/rv/route-views3/bgpdata/2021.01/RIBS/",
        &["rib.20210112.0200.bz2"],
    )
    .await;
    expect_untouched(&server, "/data/rrc00/").await;

    let archives = ArchiveConfig {
        routeviews_url: format!("{}/rv/", server.uri()),
        ris_collectors_url: format!("{}/docs/route-collectors/", server.uri()),
        ris_data_url: format!("{}/data/", server.uri()),
    };
    let finder = MultiFinder::from_archives(listing(), &archives).await.unwrap();

    let projects: Vec<String> = finder.projects().into_iter().map(|p| p.name).collect();
    assert_eq!(projects, vec!["routeviews", "ris"]);
    assert_eq!(finder.collectors("").len(), 2);
    assert_eq!(finder.collector("rrc00").unwrap().project.name, "ris");

    let rv3 = finder.collector("route-views3").unwrap();
    let dumps = finder
        .find(&mid_january().with_collectors(vec![rv3]))
        .await
        .unwrap();
    assert_eq!(dumps.len(), 1);
    assert_eq!(dumps[0].collector.name, "route-views3");

    let stranger = Collector::new(&Project::new("pch"), "route-views3");
    let err = finder
        .find(&mid_january().with_collectors(vec![stranger]))
        .await
        .unwrap_err();
    assert!(matches!(err, FinderError::UnknownProject(p) if p == "pch"));
}
