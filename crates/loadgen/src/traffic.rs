//! Synthetic request traffic
//!
//! Deterministic: request `n` of producer `p` always looks the same, so runs
//! are comparable and excludes hit a known share of requests.

use std::net::{IpAddr, Ipv4Addr};
use std::time::{Duration, SystemTime};

use alog_accesslog::{RecordedExchange, ResponseCookie};

const PATHS: &[&str] = &[
    "/",
    "/index.html",
    "/api/v1/items?page=2&sort=desc",
    "/api/v1/items/8812",
    "/static/app.3f9c1e.js",
    "/img/logo.png",
    "/search?q=access+log",
    "/health",
];

const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_5) AppleWebKit/605.1.15 Safari/605.1.15",
    "curl/8.7.1",
];

const STATUSES: &[u16] = &[200, 200, 200, 200, 304, 404, 500];

/// Build request `n` of producer `producer`
pub fn exchange(producer: usize, n: usize, now: SystemTime) -> RecordedExchange {
    let i = producer.wrapping_mul(7919).wrapping_add(n);
    let status = STATUSES[i % STATUSES.len()];
    let method = if i % 11 == 0 { "POST" } else { "GET" };

    let mut exchange = RecordedExchange::new(method, PATHS[i % PATHS.len()])
        .with_status(status)
        .with_content_length(((i * 37) % 20_000) as i64)
        .with_remote_addr(Some(IpAddr::V4(Ipv4Addr::new(
            10,
            (producer % 256) as u8,
            ((n / 256) % 256) as u8,
            (n % 256) as u8,
        ))))
        .with_request_header("User-Agent", USER_AGENTS[i % USER_AGENTS.len()])
        .with_start_time(now - Duration::from_millis((i % 250) as u64));

    if i % 3 == 0 {
        exchange = exchange.with_request_header("Referer", "https://example.com/");
    }
    if i % 5 == 0 {
        exchange = exchange.with_remote_user(format!("user{}", i % 100));
    }
    if i % 13 == 0 {
        exchange = exchange.with_response_cookie(
            ResponseCookie::new("session", format!("{i:016x}"))
                .with_path("/")
                .http_only(),
        );
    }

    exchange
}
