//! Backend Pool - 轮询选择与统计
//!
//! 选择与指针前进在同一把锁内完成；统计只在锁内做计数。
//! 网络调用始终在锁外进行。

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::Serialize;

/// 单个后端的计数
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackendTarget {
    pub url: String,
    pub request_count: u64,
    pub failure_count: u64,
}

/// 调度器统计快照
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatcherStats {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub server_stats: Vec<BackendTarget>,
}

/// 被选中的后端
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedBackend {
    pub index: usize,
    pub url: String,
}

/// 后端池
pub struct BackendPool {
    /// 静态配置的后端列表
    backends: Vec<String>,
    /// 下一个要使用的后端位置
    cursor: Mutex<usize>,
    stats: Mutex<DispatcherStats>,
    /// 异步任务 request_id -> (后端位置, 记录时间)
    affinity: DashMap<String, (usize, Instant)>,
    /// 超过该时间仍未查询的记录在下次写入时清理
    affinity_ttl: Duration,
}

impl BackendPool {
    /// 创建后端池
    pub fn new(backends: Vec<String>, affinity_ttl: Duration) -> Self {
        let backends: Vec<String> = backends
            .into_iter()
            .map(|url| url.trim_end_matches('/').to_string())
            .collect();
        let server_stats = backends
            .iter()
            .map(|url| BackendTarget {
                url: url.clone(),
                request_count: 0,
                failure_count: 0,
            })
            .collect();

        Self {
            backends,
            cursor: Mutex::new(0),
            stats: Mutex::new(DispatcherStats {
                total_requests: 0,
                successful_requests: 0,
                failed_requests: 0,
                server_stats,
            }),
            affinity: DashMap::new(),
            affinity_ttl,
        }
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 后端 URL 列表（按配置顺序）
    pub fn urls(&self) -> &[String] {
        &self.backends
    }

    /// 轮询选择下一个后端
    pub fn select(&self) -> Option<SelectedBackend> {
        if self.backends.is_empty() {
            return None;
        }

        let index = {
            let mut cursor = self.cursor.lock().unwrap_or_else(PoisonError::into_inner);
            let index = *cursor;
            *cursor = (index + 1) % self.backends.len();
            index
        };

        self.get(index)
    }

    /// 按位置取后端
    pub fn get(&self, index: usize) -> Option<SelectedBackend> {
        self.backends.get(index).map(|url| SelectedBackend {
            index,
            url: url.clone(),
        })
    }

    /// 记录一次转发结果
    pub fn record(&self, index: usize, success: bool) {
        let mut stats = self.lock_stats();
        stats.total_requests += 1;
        if success {
            stats.successful_requests += 1;
        } else {
            stats.failed_requests += 1;
        }
        if let Some(backend) = stats.server_stats.get_mut(index) {
            backend.request_count += 1;
            if !success {
                backend.failure_count += 1;
            }
        }
    }

    pub fn stats(&self) -> DispatcherStats {
        self.lock_stats().clone()
    }

    /// 记录异步任务所在的后端
    ///
    /// 同时清理超过保留时间的旧记录
    pub fn bind(&self, request_id: impl Into<String>, index: usize) {
        let expired = self.sweep_affinity();
        if expired > 0 {
            tracing::debug!(expired = expired, "Dropped stale request routes");
        }
        self.affinity.insert(request_id.into(), (index, Instant::now()));
    }

    /// 查找异步任务所在的后端
    pub fn owner(&self, request_id: &str) -> Option<SelectedBackend> {
        let (index, bound_at) = *self.affinity.get(request_id)?;
        if bound_at.elapsed() >= self.affinity_ttl {
            return None;
        }
        self.get(index)
    }

    /// 移除超过保留时间的路由记录，返回移除数量
    pub fn sweep_affinity(&self) -> usize {
        let before = self.affinity.len();
        self.affinity
            .retain(|_, (_, bound_at)| bound_at.elapsed() < self.affinity_ttl);
        before.saturating_sub(self.affinity.len())
    }

    /// 任务结果已交付，移除绑定
    pub fn release(&self, request_id: &str) {
        self.affinity.remove(request_id);
    }

    fn lock_stats(&self) -> MutexGuard<'_, DispatcherStats> {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn pool() -> BackendPool {
        BackendPool::new(
            vec![
                "http://a:5000".to_string(),
                "http://b:5001/".to_string(),
                "http://c:5002".to_string(),
            ],
            Duration::from_secs(60),
        )
    }

    #[test]
    fn test_round_robin_order() {
        let pool = pool();
        let picked: Vec<String> = (0..6).map(|_| pool.select().unwrap().url).collect();
        assert_eq!(
            picked,
            vec![
                "http://a:5000",
                "http://b:5001",
                "http://c:5002",
                "http://a:5000",
                "http://b:5001",
                "http://c:5002",
            ]
        );
    }

    #[test]
    fn test_concurrent_selection_is_balanced() {
        let pool = Arc::new(pool());
        let handles: Vec<_> = (0..6)
            .map(|_| {
                let pool = pool.clone();
                std::thread::spawn(move || {
                    (0..100)
                        .map(|_| pool.select().unwrap().index)
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut counts = [0usize; 3];
        for handle in handles {
            for index in handle.join().unwrap() {
                counts[index] += 1;
            }
        }
        assert_eq!(counts, [200, 200, 200]);
    }

    #[test]
    fn test_record_updates_totals_and_backend() {
        let pool = pool();
        pool.record(0, true);
        pool.record(1, false);
        pool.record(1, true);

        let stats = pool.stats();
        assert_eq!(stats.total_requests, 3);
        assert_eq!(stats.successful_requests, 2);
        assert_eq!(stats.failed_requests, 1);
        assert_eq!(stats.server_stats[1].request_count, 2);
        assert_eq!(stats.server_stats[1].failure_count, 1);
        assert_eq!(stats.server_stats[2].request_count, 0);
    }

    #[test]
    fn test_affinity() {
        let pool = pool();
        pool.bind("job-1", 2);
        assert_eq!(pool.owner("job-1").unwrap().url, "http://c:5002");
        pool.release("job-1");
        assert!(pool.owner("job-1").is_none());
    }

    #[test]
    fn test_stale_affinity_is_dropped() {
        let pool = BackendPool::new(vec!["http://a:5000".to_string()], Duration::from_millis(20));
        pool.bind("abandoned", 0);
        std::thread::sleep(Duration::from_millis(30));
        assert!(pool.owner("abandoned").is_none());

        pool.bind("fresh", 0);
        assert_eq!(pool.affinity.len(), 1);
        assert!(pool.owner("fresh").is_some());
    }

    #[test]
    fn test_empty_pool_selects_nothing() {
        let pool = BackendPool::new(Vec::new(), Duration::from_secs(60));
        assert!(pool.is_empty());
        assert!(pool.select().is_none());
    }
}
