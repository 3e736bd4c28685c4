//! 有界并发的任务池
//!
//! 暴破探测、证书候选确认、分类探测和复核都通过 [`WorkerPool`] 提交。
//! 每个任务自带超时，超时只取消该任务本身，不存在全局取消信号；
//! 一次提交在所有任务结束或超时后才返回。

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::time::timeout;

/// 进度回调：(阶段, 已完成, 总数)
pub type ProgressSink = Arc<dyn Fn(&'static str, usize, usize) + Send + Sync>;

/// 单个阶段的进度计数
#[derive(Clone)]
pub struct Progress {
    stage: &'static str,
    total: usize,
    done: Arc<AtomicUsize>,
    sink: Option<ProgressSink>,
}

impl Progress {
    pub fn new(stage: &'static str, total: usize, sink: Option<ProgressSink>) -> Self {
        Progress {
            stage,
            total,
            done: Arc::new(AtomicUsize::new(0)),
            sink,
        }
    }

    fn advance(&self) {
        let done = self.done.fetch_add(1, Ordering::Relaxed) + 1;
        if let Some(sink) = &self.sink {
            sink(self.stage, done, self.total);
        }
    }

    pub fn done(&self) -> usize {
        self.done.load(Ordering::Relaxed)
    }

    pub fn total(&self) -> usize {
        self.total
    }
}

/// 单个任务的结束状态
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitOutcome<T> {
    Done(T),
    TimedOut,
    Failed(String),
}

impl<T> UnitOutcome<T> {
    pub fn done(self) -> Option<T> {
        match self {
            UnitOutcome::Done(value) => Some(value),
            _ => None,
        }
    }
}

/// 宽度固定、每个任务独立超时的任务池
#[derive(Debug, Clone)]
pub struct WorkerPool {
    width: usize,
    unit_timeout: Duration,
}

impl WorkerPool {
    pub fn new(width: usize, unit_timeout: Duration) -> Self {
        WorkerPool {
            width: width.max(1),
            unit_timeout,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn unit_timeout(&self) -> Duration {
        self.unit_timeout
    }

    pub fn with_unit_timeout(&self, unit_timeout: Duration) -> Self {
        WorkerPool {
            width: self.width,
            unit_timeout,
        }
    }

    /// 提交一批任务，最多 `width` 个同时运行。结果顺序与提交顺序一致。
    pub async fn run<I, T, F, Fut>(
        &self,
        items: Vec<I>,
        task: F,
        progress: Option<Progress>,
    ) -> Vec<UnitOutcome<T>>
    where
        I: Send + 'static,
        T: Send + 'static,
        F: Fn(I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = T> + Send + 'static,
    {
        let semaphore = Arc::new(Semaphore::new(self.width));
        let task = Arc::new(task);

        let mut handles = Vec::with_capacity(items.len());
        for item in items {
            let semaphore = Arc::clone(&semaphore);
            let task = Arc::clone(&task);
            let unit_timeout = self.unit_timeout;

            handles.push(tokio::spawn(async move {
                let _permit = match semaphore.acquire().await {
                    Ok(permit) => permit,
                    Err(e) => return UnitOutcome::Failed(e.to_string()),
                };
                match timeout(unit_timeout, task(item)).await {
                    Ok(value) => UnitOutcome::Done(value),
                    Err(_) => UnitOutcome::TimedOut,
                }
            }));
        }

        // 在收集端推进进度，panic 的任务同样计入
        let mut outcomes = Vec::with_capacity(handles.len());
        for handle in handles {
            outcomes.push(match handle.await {
                Ok(outcome) => outcome,
                Err(e) => UnitOutcome::Failed(e.to_string()),
            });
            if let Some(progress) = &progress {
                progress.advance();
            }
        }
        outcomes
    }

    /// 批量模式：所有任务同时发出，结果一次性收集。
    /// 单个任务失败只记录在它自己的结果里。
    pub async fn gather<I, T, F, Fut>(
        &self,
        items: Vec<I>,
        task: F,
        progress: Option<Progress>,
    ) -> Vec<UnitOutcome<T>>
    where
        I: Send + 'static,
        T: Send + 'static,
        F: Fn(I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = T> + Send + 'static,
    {
        WorkerPool::new(items.len(), self.unit_timeout)
            .run(items, task, progress)
            .await
    }
}
