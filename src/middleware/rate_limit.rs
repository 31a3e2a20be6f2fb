use axum::extract::connect_info::ConnectInfo;
use axum::{extract::Request, http::HeaderMap, middleware::Next, response::Response};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::config;
use crate::error::ApiError;

#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    capacity: f64,
    refill_rate: f64, // tokens per second
    last_refill: Instant,
}

impl TokenBucket {
    fn new(capacity: f64, refill_rate: f64) -> Self {
        Self {
            tokens: capacity,
            capacity,
            refill_rate,
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.capacity);
        self.last_refill = now;
    }

    fn try_acquire(&mut self) -> bool {
        self.refill();

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

// Stop growing the bucket map unbounded under key churn
const SWEEP_THRESHOLD: usize = 4096;

fn buckets() -> &'static Mutex<HashMap<String, TokenBucket>> {
    use std::sync::OnceLock;
    static BUCKETS: OnceLock<Mutex<HashMap<String, TokenBucket>>> = OnceLock::new();
    BUCKETS.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Per-client token-bucket rate limiting. Disabled entirely via config
/// (development default); capacity and refill come from the api section.
pub async fn rate_limit_middleware(request: Request, next: Next) -> Result<Response, ApiError> {
    let api = &config::config().api;
    if !api.enable_rate_limiting {
        return Ok(next.run(request).await);
    }

    let key = client_key(&request);
    let capacity = api.rate_limit_requests as f64;
    let refill_rate = capacity / api.rate_limit_window_secs.max(1) as f64;

    let allowed = {
        let mut buckets = buckets().lock().expect("rate limiter lock poisoned");

        if buckets.len() > SWEEP_THRESHOLD {
            let idle_cutoff = Duration::from_secs(api.rate_limit_window_secs * 2);
            buckets.retain(|_, b| b.last_refill.elapsed() < idle_cutoff);
        }

        buckets
            .entry(key)
            .or_insert_with(|| TokenBucket::new(capacity, refill_rate))
            .try_acquire()
    };

    if !allowed {
        return Err(ApiError::too_many_requests("Rate limit exceeded, slow down"));
    }

    Ok(next.run(request).await)
}

fn client_key(request: &Request) -> String {
    client_ip(request.headers(), request.extensions().get::<ConnectInfo<SocketAddr>>())
        .unwrap_or_else(|| "local".to_string())
}

/// Best-effort client address: forwarded headers first (the SPA sits behind
/// a proxy in production), then the socket address.
pub fn client_ip(headers: &HeaderMap, connect_info: Option<&ConnectInfo<SocketAddr>>) -> Option<String> {
    if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return Some(first.to_string());
            }
        }
    }

    if let Some(real_ip) = headers.get("x-real-ip").and_then(|v| v.to_str().ok()) {
        let real_ip = real_ip.trim();
        if !real_ip.is_empty() {
            return Some(real_ip.to_string());
        }
    }

    connect_info.map(|ConnectInfo(addr)| addr.ip().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn bucket_drains_and_refills() {
        let mut bucket = TokenBucket::new(2.0, 100.0);
        assert!(bucket.try_acquire());
        assert!(bucket.try_acquire());
        assert!(!bucket.try_acquire());

        std::thread::sleep(Duration::from_millis(50));
        // 100 tokens/sec refill makes one available well within 50ms
        assert!(bucket.try_acquire());
    }

    #[test]
    fn bucket_never_exceeds_capacity() {
        let mut bucket = TokenBucket::new(2.0, 1000.0);
        std::thread::sleep(Duration::from_millis(20));
        bucket.refill();
        assert!(bucket.tokens <= 2.0);
    }

    #[test]
    fn forwarded_header_wins() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7, 10.0.0.1"));
        assert_eq!(client_ip(&headers, None).as_deref(), Some("203.0.113.7"));

        let headers = HeaderMap::new();
        assert_eq!(client_ip(&headers, None), None);
    }
}
