use crate::core::Collection;

/// Window and page sizing for one live list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListConfig {
    /// Number of documents fetched by the initial query and by each load-more.
    pub window_limit: usize,

    /// Number of documents shown per page.
    pub page_size: usize,
}

impl ListConfig {
    pub fn new(window_limit: usize, page_size: usize) -> Self {
        Self {
            window_limit,
            page_size,
        }
    }
}

/// Retry behavior for the counter read-modify-write loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterRetryPolicy {
    /// Maximum number of attempts, the first one included.
    pub max_attempts: usize,
    /// Base duration in milliseconds for backoff calculation.
    pub base_backoff_ms: u64,
    /// Upper bound in milliseconds for a single backoff.
    pub max_backoff_ms: u64,
}

impl CounterRetryPolicy {
    /// Exponential backoff for `attempt` (1-based), capped at `max_backoff_ms`.
    pub fn backoff_ms(&self, attempt: usize) -> u64 {
        let base = self.base_backoff_ms.max(1);
        let cap = self.max_backoff_ms.max(base);

        let mut backoff = base;
        for _ in 1..attempt {
            backoff = backoff.saturating_mul(2).min(cap);
        }
        backoff
    }

    /// Returns `true` while another attempt is allowed after `attempt` failed.
    pub fn allows_retry(&self, attempt: usize) -> bool {
        attempt < self.max_attempts.max(1)
    }
}

impl Default for CounterRetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 8,
            base_backoff_ms: 5,
            max_backoff_ms: 100,
        }
    }
}

/// Storefront configuration
///
/// Page sizes follow the storefront views: the product grid shows 6 items
/// out of a 9-item window, the admin order table 20 and the user table 30.
#[derive(Debug, Clone)]
pub struct StorefrontConfig {
    pub products: ListConfig,
    pub orders: ListConfig,
    pub users: ListConfig,
    pub counter_retry: CounterRetryPolicy,
}

impl StorefrontConfig {
    pub fn new() -> Self {
        Self {
            products: ListConfig::new(9, 6),
            orders: ListConfig::new(20, 20),
            users: ListConfig::new(30, 30),
            counter_retry: CounterRetryPolicy::default(),
        }
    }

    /// Set product list sizing
    pub fn products(mut self, config: ListConfig) -> Self {
        self.products = config;
        self
    }

    /// Set order list sizing
    pub fn orders(mut self, config: ListConfig) -> Self {
        self.orders = config;
        self
    }

    /// Set user list sizing
    pub fn users(mut self, config: ListConfig) -> Self {
        self.users = config;
        self
    }

    /// Set counter retry policy
    pub fn counter_retry(mut self, policy: CounterRetryPolicy) -> Self {
        self.counter_retry = policy;
        self
    }

    pub fn list(&self, collection: Collection) -> ListConfig {
        match collection {
            Collection::Products => self.products,
            Collection::Orders => self.orders,
            Collection::Users => self.users,
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        for collection in Collection::ALL {
            let list = self.list(collection);
            if list.window_limit == 0 {
                return Err(format!("{collection}: window_limit must be > 0"));
            }
            if list.page_size == 0 {
                return Err(format!("{collection}: page_size must be > 0"));
            }
        }

        if self.counter_retry.max_attempts == 0 {
            return Err("counter_retry.max_attempts must be > 0".to_string());
        }

        Ok(())
    }
}

impl Default for StorefrontConfig {
    fn default() -> Self {
        Self::new()
    }
}
