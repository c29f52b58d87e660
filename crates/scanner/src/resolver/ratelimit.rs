//! 소스별 토큰 버킷 레이트 리미터
//!
//! [`RateLimiters`]는 프로세스당 하나 만들어 모든 스캔이 공유합니다. 버킷은 소스 이름으로
//! 찾으며, 등록되지 않은 소스는 제한 없이 통과합니다. 테스트에서는
//! [`RateLimiters::unlimited`]를 주입합니다.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use vulnwatch_core::config::{MIN_SOURCE_RATE_PER_SEC, SourceConfig};
use vulnwatch_core::metrics as m;

/// 토큰 버킷
///
/// `rate_per_sec` 속도로 최대 `burst`개까지 토큰이 보충됩니다.
/// 속도는 [`MIN_SOURCE_RATE_PER_SEC`] 이상으로 보정되므로 한 번의 대기는
/// 그 역수(1000초)를 넘지 않습니다.
#[derive(Debug)]
pub struct TokenBucket {
    rate_per_sec: f64,
    burst: f64,
    state: Mutex<BucketState>,
}

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    /// 가득 찬 버킷을 생성합니다.
    pub fn new(rate_per_sec: f64, burst: u32) -> Self {
        let burst = f64::from(burst.max(1));
        Self {
            rate_per_sec: if rate_per_sec.is_finite() {
                rate_per_sec.max(MIN_SOURCE_RATE_PER_SEC)
            } else {
                MIN_SOURCE_RATE_PER_SEC
            },
            burst,
            state: Mutex::new(BucketState {
                tokens: burst,
                last_refill: Instant::now(),
            }),
        }
    }

    /// 토큰 하나를 얻을 때까지 대기합니다. 대기한 시간을 반환합니다.
    pub async fn acquire(&self) -> Duration {
        let started = Instant::now();
        loop {
            let wait = {
                let mut state = self.state.lock().await;
                let now = Instant::now();
                let elapsed = now.duration_since(state.last_refill).as_secs_f64();
                state.tokens = (state.tokens + elapsed * self.rate_per_sec).min(self.burst);
                state.last_refill = now;

                if state.tokens >= 1.0 {
                    state.tokens -= 1.0;
                    return started.elapsed();
                }
                Duration::try_from_secs_f64((1.0 - state.tokens) / self.rate_per_sec)
                    .unwrap_or(Duration::from_secs_f64(1.0 / MIN_SOURCE_RATE_PER_SEC))
            };
            tokio::time::sleep(wait).await;
        }
    }

    /// 현재 남은 토큰 수 (보충 반영 전)
    pub async fn available(&self) -> f64 {
        self.state.lock().await.tokens
    }
}

/// 소스 이름 → 토큰 버킷 레지스트리
#[derive(Debug, Default)]
pub struct RateLimiters {
    buckets: HashMap<String, TokenBucket>,
}

impl RateLimiters {
    /// 모든 소스를 제한 없이 통과시키는 레지스트리
    pub fn unlimited() -> Self {
        Self::default()
    }

    /// 활성화된 소스 설정마다 버킷을 하나씩 만듭니다.
    pub fn from_sources(sources: &[SourceConfig]) -> Self {
        let buckets = sources
            .iter()
            .filter(|s| s.enabled)
            .map(|s| (s.name.clone(), TokenBucket::new(s.rate_per_sec, s.burst)))
            .collect();
        Self { buckets }
    }

    /// 버킷을 추가하거나 교체합니다.
    pub fn with_bucket(mut self, source: impl Into<String>, rate_per_sec: f64, burst: u32) -> Self {
        self.buckets
            .insert(source.into(), TokenBucket::new(rate_per_sec, burst));
        self
    }

    /// 해당 소스의 토큰을 얻습니다.
    pub async fn acquire(&self, source: &str) {
        let Some(bucket) = self.buckets.get(source) else {
            return;
        };
        let waited = bucket.acquire().await;
        if !waited.is_zero() {
            metrics::histogram!(m::SOURCE_THROTTLE_SECONDS, m::LABEL_SOURCE => source.to_owned())
                .record(waited.as_secs_f64());
        }
    }

    /// 등록된 버킷 수
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    /// 등록된 버킷이 없는지
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn burst_is_immediate_then_throttled() {
        let bucket = TokenBucket::new(2.0, 2);
        assert!(bucket.acquire().await.is_zero());
        assert!(bucket.acquire().await.is_zero());

        let waited = bucket.acquire().await;
        assert!(waited >= Duration::from_millis(499), "waited {waited:?}");
        assert!(waited <= Duration::from_millis(520), "waited {waited:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn refills_up_to_burst() {
        let bucket = TokenBucket::new(10.0, 3);
        for _ in 0..3 {
            bucket.acquire().await;
        }
        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(bucket.acquire().await.is_zero());
        // 보충은 burst에서 멈추므로 1개 사용 후 2개 남음
        assert!((bucket.available().await - 2.0).abs() < 1e-6);
    }

    #[tokio::test(start_paused = true)]
    async fn tiny_rate_is_clamped_to_minimum() {
        let bucket = TokenBucket::new(1e-30, 1);
        assert!(bucket.acquire().await.is_zero());

        let waited = bucket.acquire().await;
        assert!(waited <= Duration::from_secs(1001), "waited {waited:?}");
        assert!(waited >= Duration::from_secs(999), "waited {waited:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_source_is_not_limited() {
        let limiters = RateLimiters::unlimited();
        let started = Instant::now();
        for _ in 0..100 {
            limiters.acquire("osv").await;
        }
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[test]
    fn disabled_sources_get_no_bucket() {
        let sources = vec![
            SourceConfig::default(),
            SourceConfig {
                name: "nvd".to_owned(),
                kind: "nvd".to_owned(),
                enabled: false,
                ..SourceConfig::default()
            },
        ];
        let limiters = RateLimiters::from_sources(&sources);
        assert_eq!(limiters.len(), 1);
    }
}
