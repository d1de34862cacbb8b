//! Time/Sleep capability facade (spec §4.1, ungated).

use runtime_core::PluginError;

const MAX_SLEEP_MS: u64 = 10_000;

#[derive(Default)]
pub struct TimeCapability;

impl TimeCapability {
    pub fn now_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }

    pub async fn sleep(&self, ms: u64) -> Result<(), PluginError> {
        if ms > MAX_SLEEP_MS {
            return Err(PluginError::CapabilityViolation {
                plugin_id: String::new(),
                reason: format!("requested sleep of {ms}ms, max is {MAX_SLEEP_MS}"),
            });
        }
        tokio::time::sleep(std::time::Duration::from_millis(ms)).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sleep_over_limit_is_rejected() {
        let time = TimeCapability::default();
        assert!(time.sleep(20_000).await.is_err());
    }

    #[tokio::test]
    async fn sleep_within_limit_succeeds() {
        let time = TimeCapability::default();
        assert!(time.sleep(1).await.is_ok());
    }

    #[test]
    fn now_ms_is_positive() {
        let time = TimeCapability::default();
        assert!(time.now_ms() > 0);
    }
}
