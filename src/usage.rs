//! Session-wide token usage.
//!
//! One `UsageMeter` lives in `AppState` for the lifetime of the process. The wizard never resets it.

use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
  pub prompt_tokens: u64,
  pub response_tokens: u64,
  pub total_tokens: u64,
}

impl TokenUsage {
  /// Field-wise sum. Saturates instead of wrapping so totals never go down.
  pub fn merged(self, other: TokenUsage) -> TokenUsage {
    TokenUsage {
      prompt_tokens: self.prompt_tokens.saturating_add(other.prompt_tokens),
      response_tokens: self.response_tokens.saturating_add(other.response_tokens),
      total_tokens: self.total_tokens.saturating_add(other.total_tokens),
    }
  }
}

/// Running total shared by every handler. Updates are serialized by the mutex.
#[derive(Clone, Default)]
pub struct UsageMeter {
  total: Arc<Mutex<TokenUsage>>,
}

impl UsageMeter {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn accumulate(&self, usage: TokenUsage) {
    let mut total = self.total.lock().unwrap_or_else(PoisonError::into_inner);
    *total = total.merged(usage);
    debug!(target: "generation", prompt = total.prompt_tokens, response = total.response_tokens, total = total.total_tokens, "Session usage updated");
  }

  pub fn snapshot(&self) -> TokenUsage {
    *self.total.lock().unwrap_or_else(PoisonError::into_inner)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn u(p: u64, r: u64, t: u64) -> TokenUsage {
    TokenUsage { prompt_tokens: p, response_tokens: r, total_tokens: t }
  }

  #[test]
  fn total_is_field_wise_sum_in_any_order() {
    let calls = [u(10, 5, 15), u(100, 40, 140), u(7, 0, 7)];

    let forward = UsageMeter::new();
    calls.iter().for_each(|c| forward.accumulate(*c));
    let backward = UsageMeter::new();
    calls.iter().rev().for_each(|c| backward.accumulate(*c));

    assert_eq!(forward.snapshot(), u(117, 45, 162));
    assert_eq!(forward.snapshot(), backward.snapshot());
  }

  #[test]
  fn totals_never_decrease() {
    let meter = UsageMeter::new();
    let mut last = meter.snapshot();
    for c in [u(1, 1, 2), u(0, 0, 0), u(u64::MAX, 3, 3), u(5, 5, 10)] {
      meter.accumulate(c);
      let now = meter.snapshot();
      assert!(now.prompt_tokens >= last.prompt_tokens);
      assert!(now.response_tokens >= last.response_tokens);
      assert!(now.total_tokens >= last.total_tokens);
      last = now;
    }
    assert_eq!(last.prompt_tokens, u64::MAX);
  }

  #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
  async fn concurrent_updates_are_not_lost() {
    let meter = UsageMeter::new();
    let mut handles = Vec::new();
    for _ in 0..32 {
      let m = meter.clone();
      handles.push(tokio::spawn(async move {
        for _ in 0..100 {
          m.accumulate(u(1, 2, 3));
        }
      }));
    }
    for h in handles {
      h.await.unwrap();
    }
    assert_eq!(meter.snapshot(), u(3200, 6400, 9600));
  }
}
