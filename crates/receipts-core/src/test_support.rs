pub mod env {
    use once_cell::sync::Lazy;
    use std::sync::{Mutex, MutexGuard};

    static ENV_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

    const PREFIX: &str = "RECEIPTS_";

    /// Holds the env lock with every `RECEIPTS_*` variable cleared; the
    /// previous environment comes back on drop.
    pub struct ScrubbedEnv {
        _lock: MutexGuard<'static, ()>,
        previous: Vec<(String, String)>,
    }

    pub fn scrubbed() -> ScrubbedEnv {
        let lock = ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let previous: Vec<(String, String)> = std::env::vars()
            .filter(|(key, _)| key.starts_with(PREFIX))
            .collect();
        for (key, _) in &previous {
            std::env::remove_var(key);
        }
        ScrubbedEnv {
            _lock: lock,
            previous,
        }
    }

    impl ScrubbedEnv {
        pub fn set(&mut self, key: &str, value: &str) {
            debug_assert!(key.starts_with(PREFIX), "only RECEIPTS_* keys are restored");
            std::env::set_var(key, value);
        }
    }

    impl Drop for ScrubbedEnv {
        fn drop(&mut self) {
            let ours: Vec<String> = std::env::vars()
                .map(|(key, _)| key)
                .filter(|key| key.starts_with(PREFIX))
                .collect();
            for key in ours {
                std::env::remove_var(key);
            }
            for (key, value) in self.previous.drain(..) {
                std::env::set_var(key, value);
            }
        }
    }
}
