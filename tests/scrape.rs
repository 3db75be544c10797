//! End-to-end acquisition tests against a local HTTP server.
//!
//! Covers discovery mode (index page, parallel auction fetch, a failing
//! auction, cross-auction deduplication, the item cap) and single-auction
//! mode (show-all variant selection and pagination).

use chrono::{Duration, Local};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use bidscout::auction::{AuctionScraper, ScrapeRequest};
use bidscout::config::ScraperConfig;

fn item(id: u32, title: &str, bid: u32) -> String {
    format!(
        r#"<div class="item-card">
             <h3><a href="/item/{id}">{title}</a></h3>
             <img src="/photos/{id}.jpg">
             <p>Current Bid: ${bid}</p>
             <p>{bids} bids | 2 bidders</p>
           </div>"#,
        bids = id % 7
    )
}

fn page(items: &[String]) -> String {
    format!("<html><body><div class=\"lots\">{}</div></body></html>", items.join("\n"))
}

fn scraper_config(server: &MockServer) -> ScraperConfig {
    ScraperConfig {
        index_url: format!("{}/auctions", server.uri()),
        request_timeout_ms: 2_000,
        retries: 0,
        retry_delay_ms: 0,
        parallel_auctions: 2,
        max_pages: 5,
        ..ScraperConfig::default()
    }
}

fn window(max_items: usize, auction_url: Option<String>) -> ScrapeRequest {
    let today = Local::now().date_naive();
    ScrapeRequest {
        max_items,
        start_date: today,
        end_date: today + Duration::days(3),
        auction_url,
    }
}

async fn mount_html(server: &MockServer, route: &str, body: String) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

const INDEX: &str = r#"
    <div class="card"><a href="/auction/1">Warehouse Returns</a><p>Ends in 2 days</p></div>
    <div class="card"><a href="/auction/2">Estate Contents</a><p>Preview on Friday</p></div>
    <div class="card"><a href="/auction/3">Storage Units</a><p>Ends in 1 day</p></div>
    <div class="card"><a href="/auction/4">Old Sale</a><p>Ends in 30 days</p></div>
"#;

#[tokio::test]
async fn test_discovery_mode_end_to_end() {
    let server = MockServer::start().await;
    mount_html(&server, "/auctions", INDEX.to_string()).await;
    mount_html(
        &server,
        "/auction/1",
        page(&[item(11, "Cordless Drill Kit", 12), item(12, "Stand Mixer", 40)]),
    )
    .await;
    // Item 12 is cross-listed in auction 2.
    mount_html(
        &server,
        "/auction/2",
        page(&[item(12, "Stand Mixer", 40), item(21, "Bose Speaker", 55)]),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/auction/3"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    // Auction 4 closes outside the window and must never be fetched.
    Mock::given(method("GET"))
        .and(path("/auction/4"))
        .respond_with(ResponseTemplate::new(200).set_body_string(page(&[item(41, "Never", 1)])))
        .expect(0)
        .mount(&server)
        .await;

    let scraper = AuctionScraper::new(&scraper_config(&server)).unwrap();
    let result = scraper.scrape(&window(50, None)).await.unwrap();

    assert_eq!(result.total_count, 3);
    let urls: Vec<String> = result.items.iter().filter_map(|r| r.url.clone()).collect();
    assert_eq!(
        urls,
        vec![
            format!("{}/item/11", server.uri()),
            format!("{}/item/12", server.uri()),
            format!("{}/item/21", server.uri()),
        ]
    );

    let drill = &result.items[0];
    assert_eq!(drill.current_bid, Some(12.0));
    assert_eq!(drill.bidder_count, Some(2));
    assert_eq!(drill.image_url.as_deref(), Some(format!("{}/photos/11.jpg", server.uri()).as_str()));
    // Parsed close time is carried onto items; auction 2 has none.
    assert!(drill.auction_end.is_some());
    assert_eq!(result.items[2].auction_end, None);
}

#[tokio::test]
async fn test_discovery_respects_item_cap() {
    let server = MockServer::start().await;
    mount_html(&server, "/auctions", INDEX.to_string()).await;
    mount_html(
        &server,
        "/auction/1",
        page(&[item(11, "Cordless Drill Kit", 12), item(12, "Stand Mixer", 40)]),
    )
    .await;
    mount_html(&server, "/auction/2", page(&[item(21, "Bose Speaker", 55)])).await;
    mount_html(&server, "/auction/3", page(&[])).await;

    let scraper = AuctionScraper::new(&scraper_config(&server)).unwrap();
    let result = scraper.scrape(&window(2, None)).await.unwrap();

    assert_eq!(result.items.len(), 2);
    assert_eq!(result.total_count, 3);
}

#[tokio::test]
async fn test_index_failure_is_network_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/auctions"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let scraper = AuctionScraper::new(&scraper_config(&server)).unwrap();
    let err = scraper.scrape(&window(10, None)).await.unwrap_err();
    assert!(matches!(err, bidscout::types::PipelineError::Network { .. }));
}

#[tokio::test]
async fn test_single_auction_picks_best_variant_and_paginates() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/auction/9"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_string(page(&[
            item(94, "Camping Tent", 30),
            item(91, "Lawn Mower", 60),
        ])))
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/auction/9"))
        .and(query_param("showall", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_string(page(&[
            item(91, "Lawn Mower", 60),
            item(92, "Leaf Blower", 25),
            item(93, "Pressure Washer", 80),
        ])))
        .with_priority(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/auction/9"))
        .respond_with(ResponseTemplate::new(200).set_body_string(page(&[item(91, "Lawn Mower", 60)])))
        .with_priority(3)
        .mount(&server)
        .await;

    let scraper = AuctionScraper::new(&scraper_config(&server)).unwrap();
    let url = format!("{}/auction/9", server.uri());
    let result = scraper.scrape(&window(50, Some(url))).await.unwrap();

    // Three from the show-all variant, one new item on page 2; page 3
    // repeats the variant and adds nothing.
    let ids: Vec<String> = result
        .items
        .iter()
        .filter_map(|r| r.url.as_deref().and_then(|u| u.rsplit('/').next()).map(String::from))
        .collect();
    assert_eq!(ids, vec!["91", "92", "93", "94"]);
    assert_eq!(result.total_count, 4);
}

#[tokio::test]
async fn test_single_auction_unreachable_is_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/auction/5"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let scraper = AuctionScraper::new(&scraper_config(&server)).unwrap();
    let url = format!("{}/auction/5", server.uri());
    assert!(scraper.scrape(&window(10, Some(url))).await.is_err());
}

#[tokio::test]
async fn test_single_auction_without_listings_is_empty() {
    let server = MockServer::start().await;
    mount_html(
        &server,
        "/auction/6",
        "<html><body><p>This sale has not opened yet.</p></body></html>".to_string(),
    )
    .await;

    let scraper = AuctionScraper::new(&scraper_config(&server)).unwrap();
    let url = format!("{}/auction/6", server.uri());
    let result = scraper.scrape(&window(10, Some(url))).await.unwrap();
    assert!(result.items.is_empty());
    assert_eq!(result.total_count, 0);
}
