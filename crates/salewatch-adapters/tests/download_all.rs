use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use salewatch_adapters::{download_all, parse_index_page};
use salewatch_core::{FixtureList, DEFAULT_HOME_TZ};
use salewatch_storage::{FetchError, PageFetch};

const DOMAIN: &str = "https://tickets.example.com";

fn page(name: &str) -> String {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../../fixtures/pages")
        .join(name);
    std::fs::read_to_string(&path).unwrap_or_else(|e| panic!("reading {}: {e}", path.display()))
}

/// Serves canned pages by URL and records the request order.
struct StaticFetcher {
    pages: HashMap<String, String>,
    requested: Mutex<Vec<String>>,
}

impl StaticFetcher {
    fn new(pages: &[(&str, &str)]) -> Self {
        Self {
            pages: pages
                .iter()
                .map(|(path, file)| (format!("{DOMAIN}{path}"), page(file)))
                .collect(),
            requested: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl PageFetch for StaticFetcher {
    async fn fetch_text(&self, url: &str) -> Result<String, FetchError> {
        self.requested.lock().unwrap().push(url.to_string());
        self.pages.get(url).cloned().ok_or_else(|| FetchError::HttpStatus {
            status: 404,
            url: url.to_string(),
        })
    }
}

fn index() -> FixtureList {
    let mut list = FixtureList::new();
    parse_index_page(&mut list, &page("index.html"), "Liverpool FC", DEFAULT_HOME_TZ).unwrap();
    list
}

const ALL_PAGES: [(&str, &str); 4] = [
    ("/tickets/tickets-availability/liverpool-v-bologna-2-oct-2024", "liverpool-v-bologna.html"),
    ("/tickets/tickets-availability/crystal-palace-v-liverpool-5-oct-2024", "crystal-palace-v-liverpool.html"),
    ("/tickets/tickets-availability/liverpool-v-chelsea-20-oct-2024", "liverpool-v-chelsea.html"),
    ("/tickets/tickets-availability/liverpool-v-brighton-2-nov-2024", "liverpool-v-brighton.html"),
];

#[tokio::test]
async fn every_detail_page_is_fetched_in_page_order() {
    let fetcher = StaticFetcher::new(&ALL_PAGES);
    let mut list = index();

    assert!(download_all(&mut list, &fetcher, Some(DOMAIN), "Liverpool FC", DEFAULT_HOME_TZ).await);

    let requested = fetcher.requested.lock().unwrap().clone();
    let expected: Vec<String> = ALL_PAGES.iter().map(|(p, _)| format!("{DOMAIN}{p}")).collect();
    assert_eq!(requested, expected);

    let active: Vec<usize> = list
        .fixtures(false)
        .iter()
        .map(|f| f.active_sale_count())
        .collect();
    assert_eq!(active, [0, 1, 3, 2]);
}

#[tokio::test]
async fn one_missing_page_fails_the_batch_but_not_the_rest() {
    let fetcher = StaticFetcher::new(&ALL_PAGES[1..]);
    let mut list = index();

    assert!(!download_all(&mut list, &fetcher, Some(DOMAIN), "Liverpool FC", DEFAULT_HOME_TZ).await);
    assert_eq!(fetcher.requested.lock().unwrap().len(), 4);
    assert_eq!(list.fixtures(false)[3].active_sale_count(), 2);
}

#[tokio::test]
async fn mismatched_detail_page_fails_only_that_fixture() {
    let mut pages = ALL_PAGES;
    pages[3].1 = "liverpool-v-chelsea.html";
    let fetcher = StaticFetcher::new(&pages);
    let mut list = index();

    assert!(!download_all(&mut list, &fetcher, Some(DOMAIN), "Liverpool FC", DEFAULT_HOME_TZ).await);
    let fixtures = list.fixtures(false);
    assert_eq!(fixtures[2].active_sale_count(), 3);
    assert_eq!(fixtures[3].active_sale_count(), 0);
}

#[tokio::test]
async fn without_a_domain_nothing_is_fetched() {
    let fetcher = StaticFetcher::new(&ALL_PAGES);
    let mut list = index();

    assert!(!download_all(&mut list, &fetcher, None, "Liverpool FC", DEFAULT_HOME_TZ).await);
    assert!(fetcher.requested.lock().unwrap().is_empty());
}
