use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use lexi_queue::{Completion, SerialQueue, TaskError};
use serde_json::json;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::{mpsc, Mutex};
use tokio::time::{Instant, Interval, MissedTickBehavior};

use crate::events::{Event, Input};
use crate::handlers::{Bot, UNKNOWN_USER};
use crate::store::UserStore;

/// Everything an incoming event needs, wired to one serial queue.
///
/// The store is only touched from tasks on `queue`; the mutex around it is never
/// contended and exists to hand the store to those tasks.
pub struct Session {
    queue: SerialQueue,
    bot: Arc<Bot>,
    store: Arc<Mutex<UserStore>>,
    replies: mpsc::UnboundedSender<String>,
}

impl Session {
    pub fn new(
        queue: SerialQueue,
        bot: Bot,
        store: UserStore,
        replies: mpsc::UnboundedSender<String>,
    ) -> Self {
        Self {
            queue,
            bot: Arc::new(bot),
            store: Arc::new(Mutex::new(store)),
            replies,
        }
    }

    pub fn queue(&self) -> &SerialQueue {
        &self.queue
    }

    pub fn dispatch(&self, line: &str) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }
        match line.parse::<Input>() {
            Ok(Input::User(event)) => self.submit(event),
            Ok(Input::Stats) => self.submit_stats(),
            Err(err) => {
                tracing::warn!(%err, line, "ignoring input");
                let _ = self.replies.send(format!("! {err}"));
            }
        }
    }

    fn submit(&self, event: Event) {
        let user = event.user().to_string();
        let bot = Arc::clone(&self.bot);
        let store = Arc::clone(&self.store);
        let replies = self.replies.clone();
        let handle = self.queue.enqueue(move || async move {
            let mut guard = store.lock().await;
            let reply = bot.handle(&mut guard, &event, &mut rand::rng());
            drop(guard);
            replies
                .send(format!("[{}] {reply}", event.user()))
                .map_err(|_| anyhow!("reply channel closed"))
        });
        // the queue already logged the failure; tell the user something went wrong
        let replies = self.replies.clone();
        tokio::spawn(async move {
            if handle.await.is_err() {
                let _ = replies.send(format!("[{user}] {UNKNOWN_USER}"));
            }
        });
    }

    fn submit_stats(&self) {
        let queue = self.queue.clone();
        let store = Arc::clone(&self.store);
        let replies = self.replies.clone();
        drop(self.queue.enqueue(move || async move {
            let users = store.lock().await.len();
            let body = serde_json::to_string(&json!({ "users": users, "queue": queue.stats() }))?;
            replies
                .send(format!("stats {body}"))
                .map_err(|_| anyhow!("reply channel closed"))?;
            Ok::<_, anyhow::Error>(())
        }));
    }

    /// Queues a flush of the user store behind every event admitted so far.
    pub fn schedule_save(&self) -> Completion<(), anyhow::Error> {
        let store = Arc::clone(&self.store);
        self.queue.enqueue(move || async move {
            let guard = store.lock().await;
            guard.save().await?;
            tracing::debug!(users = guard.len(), path = %guard.path().display(), "user store saved");
            Ok::<_, anyhow::Error>(())
        })
    }

    /// Lets every admitted event finish, then saves the store one last time.
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!(pending = self.queue.len(), "draining queue before shutdown");
        self.queue.wait_until_empty().await;
        tracing::info!("saving user store before shutdown");
        self.schedule_save().await.map_err(|err| match err {
            TaskError::Failed(err) => err.context("final store save"),
            TaskError::Abandoned => anyhow!("final store save was abandoned"),
        })
    }
}

/// Feeds `input` line by line into the session until EOF or `shutdown` fires.
pub async fn run<R, S>(
    session: &Session,
    input: R,
    save_interval: Option<Duration>,
    shutdown: S,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    S: Future<Output = ()>,
{
    let mut lines = input.lines();
    let mut saver = save_interval.map(|every| {
        let mut interval = tokio::time::interval_at(Instant::now() + every, every);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval
    });
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            line = lines.next_line() => match line.context("reading input")? {
                Some(line) => session.dispatch(&line),
                None => {
                    tracing::info!("input closed");
                    break;
                }
            },
            _ = next_tick(&mut saver) => {
                // outcome is logged by the queue
                drop(session.schedule_save());
            }
            _ = &mut shutdown => {
                tracing::info!("shutdown requested");
                break;
            }
        }
    }
    session.shutdown().await
}

async fn next_tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::PROMPT;
    use crate::store::UserRecord;
    use crate::words::WordList;
    use lexi_queue::QueueConfig;

    async fn session(
        dir: &tempfile::TempDir,
        threshold: u32,
    ) -> (Session, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let queue = SerialQueue::new(QueueConfig::default().with_name("session-test")).unwrap();
        let bot = Bot::new(WordList::parse("alpha\nbeta").unwrap(), threshold);
        let store = UserStore::open(dir.path().join("db.json")).await;
        (Session::new(queue, bot, store, tx), rx)
    }

    async fn collect(mut rx: mpsc::UnboundedReceiver<String>) -> Vec<String> {
        let mut out = Vec::new();
        while let Some(line) = rx.recv().await {
            out.push(line);
        }
        out
    }

    #[tokio::test]
    async fn scripted_conversation_updates_store_and_replies_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let (session, rx) = session(&dir, 2).await;
        let script = "start 1\neasy 1\neasy 1\neasy 2\nbogus 3\n\nstats\n";
        run(&session, script.as_bytes(), None, std::future::pending())
            .await
            .unwrap();
        drop(session);
        let replies = collect(rx).await;

        let user_one: Vec<&String> = replies.iter().filter(|r| r.starts_with("[1]")).collect();
        assert_eq!(user_one.len(), 3);
        assert_eq!(*user_one[0], format!("[1] {PROMPT} [👌Простое слово|easyWord]"));
        assert!(!user_one[1].contains("hardWord"), "{}", user_one[1]);
        assert!(user_one[2].contains("hardWord"), "{}", user_one[2]);
        assert!(replies.contains(&format!("[2] {UNKNOWN_USER}")));
        assert!(replies.iter().any(|r| r.starts_with("! unknown command")));
        let stats = replies.iter().find(|r| r.starts_with("stats ")).unwrap();
        assert!(stats.contains("\"users\":1"), "{stats}");

        let saved = UserStore::load(dir.path().join("db.json"));
        assert_eq!(saved.get("1"), Some(UserRecord { count: 2 }));
        assert_eq!(saved.get("2"), None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_producers_never_lose_increments() {
        let dir = tempfile::tempdir().unwrap();
        let (session, rx) = session(&dir, 15).await;
        let session = Arc::new(session);
        session.dispatch("start 5");

        let producers: Vec<_> = (0..4)
            .map(|_| {
                let session = Arc::clone(&session);
                tokio::spawn(async move {
                    for _ in 0..25 {
                        session.dispatch("easy 5");
                        tokio::task::yield_now().await;
                    }
                })
            })
            .collect();
        for producer in producers {
            producer.await.unwrap();
        }
        session.shutdown().await.unwrap();
        drop(session);

        let replies = collect(rx).await;
        assert_eq!(replies.len(), 101);
        let saved = UserStore::load(dir.path().join("db.json"));
        assert_eq!(saved.get("5"), Some(UserRecord { count: 100 }));
    }

    #[tokio::test(start_paused = true)]
    async fn periodic_saves_run_until_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let (session, _rx) = session(&dir, 15).await;
        // keep the writer alive so input never reaches EOF
        let (_writer, reader) = tokio::io::duplex(64);
        let reader = tokio::io::BufReader::new(reader);
        run(
            &session,
            reader,
            Some(Duration::from_secs(10)),
            tokio::time::sleep(Duration::from_secs(25)),
        )
        .await
        .unwrap();
        // two ticks plus the final save
        assert_eq!(session.queue().stats().completed, 3);
    }

    #[tokio::test]
    async fn failed_final_save_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();
        let queue = SerialQueue::new(QueueConfig::default()).unwrap();
        let bot = Bot::new(WordList::parse("alpha").unwrap(), 15);
        let store = UserStore::load(dir.path().join("missing").join("db.json"));
        let session = Session::new(queue, bot, store, tx);
        let err = session.shutdown().await.unwrap_err();
        assert!(format!("{err:#}").contains("final store save"), "{err:#}");
        assert_eq!(session.queue().stats().failed, 1);
    }
}
