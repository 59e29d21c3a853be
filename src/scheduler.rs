use chrono::{DateTime, Duration, Local, NaiveTime, TimeZone};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::RwLock;
use tokio::sync::{Mutex, Notify};

type ExecutorFuture = Pin<Box<dyn Future<Output = ()> + Send>>;
type Executor = Arc<dyn Fn(i64) -> ExecutorFuture + Send + Sync>;

/// Daily schedule registry. Each task has at most one entry; `upsert`
/// replaces any prior schedule for the task in a single map write. The
/// firing loop sleeps until the earliest due time and re-plans whenever
/// the registry changes.
#[derive(Clone)]
pub struct ScheduleRegistry {
    entries: Arc<Mutex<HashMap<i64, NaiveTime>>>,
    notify: Arc<Notify>,
    executor: Arc<RwLock<Option<Executor>>>,
}

impl Default for ScheduleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ScheduleRegistry {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            notify: Arc::new(Notify::new()),
            executor: Arc::new(RwLock::new(None)),
        }
    }

    pub fn set_executor(&self, executor: Executor) {
        let mut writer = self
            .executor
            .write()
            .expect("registry executor write lock");
        *writer = Some(executor);
    }

    pub async fn upsert(&self, task_id: i64, fire_at: NaiveTime) {
        {
            let mut entries = self.entries.lock().await;
            entries.insert(task_id, fire_at);
        }
        self.notify.notify_one();
    }

    pub async fn remove(&self, task_id: i64) {
        {
            let mut entries = self.entries.lock().await;
            entries.remove(&task_id);
        }
        self.notify.notify_one();
    }

    pub async fn scheduled(&self, task_id: i64) -> Option<NaiveTime> {
        let entries = self.entries.lock().await;
        entries.get(&task_id).copied()
    }

    pub async fn entries(&self) -> Vec<(i64, NaiveTime)> {
        let entries = self.entries.lock().await;
        let mut listing: Vec<(i64, NaiveTime)> = entries.iter().map(|(&id, &at)| (id, at)).collect();
        listing.sort_by_key(|(id, _)| *id);
        listing
    }

    pub fn start(&self) {
        let registry = self.clone();
        tokio::spawn(async move {
            registry.run_loop().await;
        });
    }

    async fn run_loop(self) {
        loop {
            let Some((due_at, task_ids)) = self.next_fire(Local::now()).await else {
                self.notify.notified().await;
                continue;
            };

            let delay = (due_at - Local::now())
                .to_std()
                .unwrap_or(std::time::Duration::ZERO);
            tokio::select! {
                _ = tokio::time::sleep(delay) => {
                    // timers are monotonic; re-check the wall clock before firing
                    if Local::now() < due_at {
                        continue;
                    }
                    for task_id in task_ids {
                        tracing::info!(task_id, "schedule fired");
                        let registry = self.clone();
                        tokio::spawn(async move {
                            registry.execute(task_id).await;
                        });
                    }
                }
                _ = self.notify.notified() => {}
            }
        }
    }

    async fn next_fire(&self, now: DateTime<Local>) -> Option<(DateTime<Local>, Vec<i64>)> {
        let entries = self.entries.lock().await;
        let mut next: Option<(DateTime<Local>, Vec<i64>)> = None;
        for (&task_id, &fire_at) in entries.iter() {
            let Some(due) = next_occurrence(now, fire_at) else {
                continue;
            };
            match &mut next {
                None => next = Some((due, vec![task_id])),
                Some((best, ids)) => {
                    if due < *best {
                        *best = due;
                        *ids = vec![task_id];
                    } else if due == *best {
                        ids.push(task_id);
                    }
                }
            }
        }
        next
    }

    async fn execute(&self, task_id: i64) {
        let executor = self
            .executor
            .read()
            .expect("registry executor read lock")
            .clone();
        if let Some(executor) = executor {
            executor(task_id).await;
        }
    }
}

/// Next local occurrence of a daily time, strictly after `now`. Clock
/// times erased by a DST gap yield `None` for that day.
fn next_occurrence(now: DateTime<Local>, fire_at: NaiveTime) -> Option<DateTime<Local>> {
    let mut candidate = now.date_naive().and_time(fire_at);
    if candidate <= now.naive_local() {
        candidate += Duration::days(1);
    }
    Local.from_local_datetime(&candidate).earliest()
}

#[cfg(test)]
mod tests {
    use super::{next_occurrence, ScheduleRegistry};
    use chrono::{Local, NaiveTime, TimeZone, Timelike};
    use std::sync::{Arc, Mutex};

    fn at(hour: u32, minute: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(hour, minute, 0).expect("valid time")
    }

    #[tokio::test]
    async fn upsert_replaces_any_prior_schedule() {
        let registry = ScheduleRegistry::new();
        registry.upsert(1, at(8, 0)).await;
        registry.upsert(1, at(9, 30)).await;

        assert_eq!(registry.scheduled(1).await, Some(at(9, 30)));
        assert_eq!(registry.entries().await.len(), 1);
    }

    #[tokio::test]
    async fn remove_clears_the_entry() {
        let registry = ScheduleRegistry::new();
        registry.upsert(1, at(8, 0)).await;
        registry.upsert(2, at(9, 0)).await;
        registry.remove(1).await;

        assert_eq!(registry.scheduled(1).await, None);
        assert_eq!(registry.entries().await, vec![(2, at(9, 0))]);
    }

    #[tokio::test]
    async fn next_fire_picks_the_earliest_entry() {
        let registry = ScheduleRegistry::new();
        registry.upsert(1, at(23, 59)).await;
        registry.upsert(2, at(0, 1)).await;

        let now = Local
            .with_ymd_and_hms(2024, 1, 10, 12, 0, 0)
            .single()
            .expect("local datetime");
        let (due, ids) = registry.next_fire(now).await.expect("has entries");
        assert_eq!(ids, vec![1]);
        assert_eq!(due.time().hour(), 23);
    }

    #[tokio::test]
    async fn executor_receives_the_fired_task_id() {
        let registry = ScheduleRegistry::new();
        let fired: Arc<Mutex<Vec<i64>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = fired.clone();
        registry.set_executor(Arc::new(move |task_id| {
            let sink = sink.clone();
            Box::pin(async move {
                sink.lock().expect("sink lock").push(task_id);
            })
        }));

        registry.execute(7).await;
        assert_eq!(*fired.lock().expect("sink lock"), vec![7]);
    }

    #[test]
    fn next_occurrence_rolls_to_tomorrow_once_the_time_has_passed() {
        let now = Local
            .with_ymd_and_hms(2024, 1, 10, 9, 0, 0)
            .single()
            .expect("local datetime");

        let later_today = next_occurrence(now, at(9, 30)).expect("occurrence");
        assert_eq!(later_today.date_naive(), now.date_naive());

        let tomorrow = next_occurrence(now, at(8, 0)).expect("occurrence");
        assert_eq!(
            tomorrow.date_naive(),
            now.date_naive().succ_opt().expect("next day")
        );
    }
}
