// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::Result;
use crate::constants::TOKEN_REFRESH_SLACK;
use crate::token::IdentityToken;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Produces ID tokens valid for a given audience.
#[async_trait::async_trait]
pub(crate) trait TokenProvider: std::fmt::Debug + Send + Sync {
    async fn token(&self, target_audience: &str) -> Result<IdentityToken>;
}

// The lock is held while a refresh is in progress, so concurrent callers for
// the same audience wait for that refresh instead of starting their own.
type Slot = Arc<Mutex<Option<IdentityToken>>>;

/// Caches ID tokens per target audience.
///
/// Tokens are reused until less than [TOKEN_REFRESH_SLACK] remains. Failed
/// refreshes are not cached: the next caller starts a new refresh.
#[derive(Debug)]
pub(crate) struct TokenCache<T>
where
    T: TokenProvider,
{
    slots: Arc<Mutex<HashMap<String, Slot>>>,

    // The token provider. This thing does the refreshing.
    inner: Arc<T>,
}

// We manually implement the `Clone` trait because the Rust compiler will
// squawk if `T` is not `Clone`, even though we only hold an `Arc<T>`.
impl<T: TokenProvider> Clone for TokenCache<T> {
    fn clone(&self) -> TokenCache<T> {
        TokenCache {
            slots: self.slots.clone(),
            inner: self.inner.clone(),
        }
    }
}

impl<T: TokenProvider> TokenCache<T> {
    pub(crate) fn new(inner: T) -> TokenCache<T> {
        TokenCache {
            slots: Arc::new(Mutex::new(HashMap::new())),
            inner: Arc::new(inner),
        }
    }

    async fn slot(&self, target_audience: &str) -> Slot {
        let mut slots = self.slots.lock().await;
        slots.entry(target_audience.to_string()).or_default().clone()
    }
}

fn fresh(token: &IdentityToken) -> bool {
    token.remaining() >= TOKEN_REFRESH_SLACK
}

#[async_trait::async_trait]
impl<T: TokenProvider + 'static> TokenProvider for TokenCache<T> {
    async fn token(&self, target_audience: &str) -> Result<IdentityToken> {
        let slot = self.slot(target_audience).await;
        let mut cached = slot.lock().await;
        if let Some(token) = cached.as_ref().filter(|t| fresh(t)) {
            return Ok(token.clone());
        }

        tracing::debug!(target_audience, "refreshing cached ID token");
        *cached = None;
        let token = self.inner.token(target_audience).await?;
        *cached = Some(token.clone());
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ExchangeError;
    use std::time::Duration;
    use tokio::time::Instant;

    static TOKEN_VALID_DURATION: Duration = Duration::from_secs(3600);

    mockall::mock! {
        #[derive(Debug)]
        pub TokenProvider { }

        #[async_trait::async_trait]
        impl TokenProvider for TokenProvider {
            async fn token(&self, target_audience: &str) -> Result<IdentityToken>;
        }
    }

    fn test_token(value: &str, valid_for: Duration) -> IdentityToken {
        let now = Instant::now();
        IdentityToken {
            token: value.to_string(),
            obtained_at: now,
            expires_at: now + valid_for,
        }
    }

    fn fail() -> crate::Error {
        ExchangeError::transport("fail").into()
    }

    #[tokio::test]
    async fn initial_token_success() -> anyhow::Result<()> {
        let expected = test_token("test-token", TOKEN_VALID_DURATION);
        let expected_clone = expected.clone();

        let mut mock = MockTokenProvider::new();
        mock.expect_token()
            .withf(|aud| aud == "https://run.example.com")
            .times(1)
            .return_once(|_| Ok(expected_clone));

        let cache = TokenCache::new(mock);
        let actual = cache.token("https://run.example.com").await?;
        assert_eq!(actual, expected);

        // Verify that we use the cached token instead of making a new request
        // to the mock token provider.
        let actual = cache.token("https://run.example.com").await?;
        assert_eq!(actual, expected);
        Ok(())
    }

    #[tokio::test]
    async fn initial_token_failure_not_cached() -> anyhow::Result<()> {
        let expected = test_token("test-token", TOKEN_VALID_DURATION);
        let expected_clone = expected.clone();

        let mut seq = mockall::Sequence::new();
        let mut mock = MockTokenProvider::new();
        mock.expect_token()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(fail()));
        mock.expect_token()
            .times(1)
            .in_sequence(&mut seq)
            .return_once(|_| Ok(expected_clone));

        let cache = TokenCache::new(mock);
        let err = cache.token("aud").await.unwrap_err();
        assert!(err.is_transient(), "{err:?}");

        // The failure is not cached, the next call asks the provider again.
        let actual = cache.token("aud").await?;
        assert_eq!(actual, expected);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_before_expiry() -> anyhow::Result<()> {
        let initial = test_token("initial-token", TOKEN_VALID_DURATION);
        let initial_clone = initial.clone();
        let refresh = test_token("refresh-token", 2 * TOKEN_VALID_DURATION);
        let refresh_clone = refresh.clone();

        let mut seq = mockall::Sequence::new();
        let mut mock = MockTokenProvider::new();
        mock.expect_token()
            .times(1)
            .in_sequence(&mut seq)
            .return_once(|_| Ok(initial_clone));
        mock.expect_token()
            .times(1)
            .in_sequence(&mut seq)
            .return_once(|_| Ok(refresh_clone));

        let cache = TokenCache::new(mock);
        assert_eq!(cache.token("aud").await?, initial);

        // Still outside the refresh window.
        tokio::time::advance(TOKEN_VALID_DURATION - TOKEN_REFRESH_SLACK - Duration::from_secs(1))
            .await;
        assert_eq!(cache.token("aud").await?, initial);

        // Inside the refresh window, the token has not expired yet, but it is
        // replaced anyway.
        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(!initial.is_expired(), "{initial:?}");
        assert_eq!(cache.token("aud").await?, refresh);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn expired_token_failure() -> anyhow::Result<()> {
        let initial = test_token("initial-token", TOKEN_VALID_DURATION);
        let initial_clone = initial.clone();

        let mut seq = mockall::Sequence::new();
        let mut mock = MockTokenProvider::new();
        mock.expect_token()
            .times(1)
            .in_sequence(&mut seq)
            .return_once(|_| Ok(initial_clone));
        mock.expect_token()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(fail()));

        let cache = TokenCache::new(mock);
        assert_eq!(cache.token("aud").await?, initial);

        tokio::time::advance(TOKEN_VALID_DURATION).await;

        // Make sure we return the error, not the expired token.
        assert!(cache.token("aud").await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn audiences_are_isolated() -> anyhow::Result<()> {
        let token_a = test_token("token-a", TOKEN_VALID_DURATION);
        let token_b = test_token("token-b", TOKEN_VALID_DURATION);
        let (clone_a, clone_b) = (token_a.clone(), token_b.clone());

        let mut mock = MockTokenProvider::new();
        mock.expect_token()
            .withf(|aud| aud == "https://a.example.com")
            .times(1)
            .return_once(|_| Ok(clone_a));
        mock.expect_token()
            .withf(|aud| aud == "https://b.example.com")
            .times(1)
            .return_once(|_| Ok(clone_b));

        let cache = TokenCache::new(mock);
        for _ in 0..3 {
            assert_eq!(cache.token("https://a.example.com").await?, token_a);
            assert_eq!(cache.token("https://b.example.com").await?, token_b);
        }
        Ok(())
    }

    #[derive(Debug)]
    struct FakeTokenProvider {
        fail: bool,
        calls: std::sync::Mutex<i32>,
    }

    impl FakeTokenProvider {
        fn new(fail: bool) -> Self {
            FakeTokenProvider {
                fail,
                calls: std::sync::Mutex::new(0),
            }
        }
    }

    #[async_trait::async_trait]
    impl TokenProvider for FakeTokenProvider {
        async fn token(&self, target_audience: &str) -> Result<IdentityToken> {
            // Give the waiters in a thundering herd enough time to pile up.
            tokio::time::sleep(Duration::from_millis(50)).await;

            // Track how many calls were made to the inner token provider.
            *self.calls.lock().unwrap() += 1;

            if self.fail {
                return Err(fail());
            }
            Ok(test_token(target_audience, TOKEN_VALID_DURATION))
        }
    }

    impl<T: TokenProvider> TokenCache<T> {
        fn provider(&self) -> &T {
            &self.inner
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn thundering_herd_single_refresh() -> anyhow::Result<()> {
        let cache = TokenCache::new(FakeTokenProvider::new(false));

        // Spawn N tasks, all asking for a token at once.
        let tasks = (0..100)
            .map(|i| {
                let cache_clone = cache.clone();
                let audience = if i % 2 == 0 { "aud-even" } else { "aud-odd" };
                tokio::spawn(async move { (audience, cache_clone.token(audience).await) })
            })
            .collect::<Vec<_>>();

        for task in tasks {
            let (audience, actual) = task.await?;
            assert_eq!(actual?.token, audience);
        }

        // One refresh per audience, every other caller waited for it.
        let calls = *cache.provider().calls.lock().unwrap();
        assert_eq!(calls, 2);
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn thundering_herd_failure() -> anyhow::Result<()> {
        let cache = TokenCache::new(FakeTokenProvider::new(true));

        let tasks = (0..10)
            .map(|_| {
                let cache_clone = cache.clone();
                tokio::spawn(async move { cache_clone.token("aud").await })
            })
            .collect::<Vec<_>>();

        for task in tasks {
            let actual = task.await?;
            let err = actual.unwrap_err();
            assert_eq!(err.details(), "exchange:transport");
        }

        // Failures are not shared, each caller made its own attempt.
        let calls = *cache.provider().calls.lock().unwrap();
        assert_eq!(calls, 10);
        Ok(())
    }
}
