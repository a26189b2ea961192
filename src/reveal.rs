use std::{sync::Arc, time::Duration};
use tokio::{sync::watch, task::JoinHandle};

/// Word-by-word reveal of a streamed reply. At most one reveal task runs;
/// starting a new message or dropping the revealer aborts the old one.
pub struct Revealer {
    interval: Duration,
    shown: Arc<watch::Sender<String>>,
    target: Option<watch::Sender<String>>,
    task: Option<JoinHandle<()>>,
}

impl Revealer {
    pub fn new(interval: Duration) -> Self {
        let (shown, _) = watch::channel(String::new());
        Self {
            interval,
            shown: Arc::new(shown),
            target: None,
            task: None,
        }
    }

    /// Text revealed so far for the current message.
    pub fn subscribe(&self) -> watch::Receiver<String> {
        self.shown.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().map_or(false, |task| !task.is_finished())
    }

    /// Starts revealing a new message, cancelling any previous reveal.
    pub fn begin(&mut self) {
        self.cancel();
        self.shown.send_replace(String::new());
        if self.interval.is_zero() {
            return;
        }
        let (target, rx) = watch::channel(String::new());
        self.task = Some(tokio::spawn(reveal_words(
            rx,
            self.shown.clone(),
            self.interval,
        )));
        self.target = Some(target);
    }

    /// Retargets the reveal to the latest cumulative reply.
    pub fn update(&self, cumulative: &str) {
        match &self.target {
            Some(target) => {
                target.send_replace(cumulative.to_string());
            }
            None => {
                self.shown.send_replace(cumulative.to_string());
            }
        }
    }

    /// Stops the animation and shows `full` at once.
    pub fn finish(&mut self, full: &str) {
        self.cancel();
        self.shown.send_replace(full.to_string());
    }

    pub fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.target = None;
    }
}

impl Drop for Revealer {
    fn drop(&mut self) {
        self.cancel();
    }
}

async fn reveal_words(
    mut target: watch::Receiver<String>,
    shown: Arc<watch::Sender<String>>,
    interval: Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    let mut revealed = 0;
    loop {
        ticker.tick().await;
        let text = target.borrow_and_update().clone();
        // Split on spaces only, line breaks stay inside the words.
        let words: Vec<&str> = if text.is_empty() {
            Vec::new()
        } else {
            text.split(' ').collect()
        };
        if revealed < words.len() {
            revealed += 1;
            shown.send_replace(words[..revealed].join(" "));
            continue;
        }
        // Every word is out but the reply was rewritten or got shorter.
        revealed = words.len();
        if *shown.borrow() != text {
            shown.send_replace(text.clone());
        }
        if target.changed().await.is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_reveals_one_word_per_tick() {
        let mut revealer = Revealer::new(Duration::from_millis(100));
        let shown = revealer.subscribe();
        revealer.begin();
        revealer.update("Hi there friend");

        tokio::time::sleep(Duration::from_millis(350)).await;
        assert_eq!(*shown.borrow(), "Hi there friend");
        assert!(revealer.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_first_frame_reveals_word_per_tick() {
        let mut revealer = Revealer::new(Duration::from_millis(100));
        let shown = revealer.subscribe();
        revealer.begin();
        // The first tick has already passed with nothing to show.
        tokio::time::sleep(Duration::from_millis(50)).await;
        revealer.update("one two three");

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(*shown.borrow(), "one");
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(*shown.borrow(), "one two");
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(*shown.borrow(), "one two three");
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_word_reply_is_shown() {
        let mut revealer = Revealer::new(Duration::from_millis(100));
        let mut shown = revealer.subscribe();
        revealer.begin();
        tokio::time::sleep(Duration::from_millis(50)).await;
        revealer.update("Hello!");

        tokio::time::timeout(
            Duration::from_secs(2),
            shown.wait_for(|x| x == "Hello!"),
        )
        .await
        .expect("single word never revealed")
        .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_rewritten_reply_with_same_word_count() {
        let mut revealer = Revealer::new(Duration::from_millis(100));
        let shown = revealer.subscribe();
        revealer.begin();
        tokio::time::sleep(Duration::from_millis(50)).await;
        revealer.update("Hi there");
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(*shown.borrow(), "Hi there");

        revealer.update("Hello world");
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(*shown.borrow(), "Hello world");
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_message_cancels_previous_reveal() {
        let mut revealer = Revealer::new(Duration::from_millis(100));
        let shown = revealer.subscribe();
        revealer.begin();
        revealer.update("one two three four five six");
        tokio::time::sleep(Duration::from_millis(150)).await;

        revealer.begin();
        assert_eq!(*shown.borrow(), "");
        tokio::time::sleep(Duration::from_millis(1000)).await;
        // The old task is gone, the new one has nothing to show yet.
        assert_eq!(*shown.borrow(), "");
    }

    #[tokio::test(start_paused = true)]
    async fn test_finish_shows_full_text() {
        let mut revealer = Revealer::new(Duration::from_millis(100));
        let shown = revealer.subscribe();
        revealer.begin();
        revealer.update("a long\nmultiline reply");
        revealer.finish("a long\nmultiline reply");

        assert!(!revealer.is_running());
        assert_eq!(*shown.borrow(), "a long\nmultiline reply");
    }

    #[tokio::test]
    async fn test_zero_interval_publishes_directly() {
        let mut revealer = Revealer::new(Duration::ZERO);
        let shown = revealer.subscribe();
        revealer.begin();
        revealer.update("Hi there");
        assert!(!revealer.is_running());
        assert_eq!(*shown.borrow(), "Hi there");
    }
}
