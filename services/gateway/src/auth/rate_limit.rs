//! 按客户端键的滑动窗口限流。

use std::{collections::HashMap, sync::Mutex};

use crate::auth::store::unix_now;

/// 单个滑动窗口：限额、窗口秒数与每键命中时间戳。
struct SlidingWindow {
    limit: usize,
    window_sec: u64,
    hits: Mutex<HashMap<String, Vec<u64>>>,
}

impl SlidingWindow {
    fn new(limit: usize, window_sec: u64) -> Self {
        Self {
            limit,
            window_sec,
            hits: Mutex::new(HashMap::new()),
        }
    }

    /// 清理窗口外记录后检查，未超限则记录本次请求。
    fn check_at(&self, key: &str, now: u64) -> bool {
        let mut hits = self.hits.lock().unwrap_or_else(|e| e.into_inner());
        let cutoff = now.saturating_sub(self.window_sec);
        let entry = hits.entry(key.to_string()).or_default();
        entry.retain(|&ts| ts > cutoff);
        if entry.len() >= self.limit {
            return false;
        }
        entry.push(now);
        true
    }

    /// 最早记录滑出窗口所需的等待秒数，始终落在 `[1, window]`。
    fn retry_after_at(&self, key: &str, now: u64) -> u64 {
        let hits = self.hits.lock().unwrap_or_else(|e| e.into_inner());
        match hits.get(key).and_then(|times| times.iter().min().copied()) {
            Some(oldest) => {
                let elapsed = now.saturating_sub(oldest);
                self.window_sec.saturating_sub(elapsed).max(1)
            }
            None => 1,
        }
    }
}

/// 双窗口限流器：登录窗口远严于通用 API 窗口，抵御凭证猜测。
///
/// 进程内唯一实例，由 `AppState` 注入中间件；没有模块级共享状态。
pub(crate) struct RateLimiter {
    general: SlidingWindow,
    login: SlidingWindow,
}

impl RateLimiter {
    pub(crate) fn new(
        general_limit: usize,
        general_window_sec: u64,
        login_limit: usize,
        login_window_sec: u64,
    ) -> Self {
        Self {
            general: SlidingWindow::new(general_limit, general_window_sec),
            login: SlidingWindow::new(login_limit, login_window_sec),
        }
    }

    /// 通用 API 限流检查并记录。
    pub(crate) fn check_general(&self, key: &str) -> bool {
        self.general.check_at(key, unix_now())
    }

    /// 登录限流检查并记录。
    pub(crate) fn check_login(&self, key: &str) -> bool {
        self.login.check_at(key, unix_now())
    }

    /// 对应窗口的 `Retry-After` 秒数。
    pub(crate) fn retry_after(&self, key: &str, is_login: bool) -> u64 {
        let now = unix_now();
        if is_login {
            self.login.retry_after_at(key, now)
        } else {
            self.general.retry_after_at(key, now)
        }
    }
}
