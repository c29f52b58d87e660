//! 지수 백오프 재시도 정책
//!
//! 지연 = `min(base × 2^attempt, max)`에 ±50% 지터를 곱한 값입니다.
//! 일시적 에러([`SourceError::is_transient`])만 재시도합니다.

use std::future::Future;
use std::time::Duration;

use tracing::debug;

use vulnwatch_core::metrics as m;

use crate::error::SourceError;

/// 재시도 정책
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// 첫 재시도 기본 지연
    pub base_delay: Duration,
    /// 지연 상한
    pub max_delay: Duration,
    /// 최초 호출을 포함한 최대 시도 횟수
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            max_attempts: 4,
        }
    }
}

impl RetryPolicy {
    /// 재시도하지 않는 정책
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// 지터 적용 전 지연 (`attempt`는 0부터)
    pub fn base_delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.min(31));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// ±50% 지터를 적용한 지연
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay_for(attempt).mul_f64(jitter_factor())
    }

    /// 일시적 에러에 한해 `op`를 재시도합니다.
    ///
    /// 영구 에러나 마지막 시도의 에러는 그대로 반환합니다.
    pub async fn run<T, F, Fut>(&self, source: &str, mut op: F) -> Result<T, SourceError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, SourceError>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt + 1 < attempts => {
                    let delay = self.delay_for(attempt);
                    debug!(
                        source,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient source error, retrying"
                    );
                    metrics::counter!(m::SOURCE_RETRIES_TOTAL, m::LABEL_SOURCE => source.to_owned())
                        .increment(1);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// [0.5, 1.5) 범위의 지터 계수
///
/// 난수원은 `uuid` v4 생성기입니다. v4 UUID는 OS 난수(`getrandom`)에서 122비트를 채우므로
/// 하위 32비트를 균등 분포 값으로 씁니다. 암호학적 품질은 필요 없고, 동시에 재시도하는
/// 워커들의 지연이 서로 어긋나기만 하면 됩니다.
fn jitter_factor() -> f64 {
    let bits = (uuid::Uuid::new_v4().as_u128() & 0xFFFF_FFFF) as u32;
    0.5 + f64::from(bits) / (f64::from(u32::MAX) + 1.0)
}
