//! Speech transport.
//!
//! [`Speech::speak`] is fire-and-forget; [`Speech::listen`] is a bounded wait
//! that yields `None` when nobody answered in time. [`ConsoleSpeech`] uses the
//! terminal as both loudspeaker and microphone.

use std::future::Future;
use std::io::BufRead;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info, warn};

/// Lines read ahead of the next `listen`.
const LINE_BUFFER: usize = 16;

#[async_trait]
pub trait Speech: Send + Sync {
    fn speak(&self, text: &str);

    /// Wait at most `timeout` for one utterance.
    async fn listen(&self, timeout: Duration) -> Option<String>;
}

/// Await `utterance` for at most `timeout`.
///
/// Blank or whitespace-only input counts as silence; anything else is
/// returned trimmed.
pub async fn bounded_listen<F>(utterance: F, timeout: Duration) -> Option<String>
where
    F: Future<Output = Option<String>>,
{
    match tokio::time::timeout(timeout, utterance).await {
        Ok(Some(text)) => {
            let text = text.trim();
            (!text.is_empty()).then(|| text.to_string())
        }
        Ok(None) => None,
        Err(_) => {
            debug!(?timeout, "listen window closed without input");
            None
        }
    }
}

/// Terminal-backed speech: prints robot lines and reads human lines from
/// stdin.
///
/// A detached reader thread owns the blocking read and forwards each line
/// over a channel. A pending read never outlives the async runtime, so the
/// process can exit while the terminal is still waiting for input.
pub struct ConsoleSpeech {
    lines: Mutex<mpsc::Receiver<String>>,
}

impl Default for ConsoleSpeech {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsoleSpeech {
    pub fn new() -> Self {
        Self::from_reader(std::io::BufReader::new(std::io::stdin()))
    }

    /// Read human lines from `reader` instead of stdin.
    pub fn from_reader<R>(reader: R) -> Self
    where
        R: BufRead + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(LINE_BUFFER);
        let spawned = std::thread::Builder::new()
            .name("console-listen".into())
            .spawn(move || {
                for line in reader.lines() {
                    let line = match line {
                        Ok(line) => line,
                        Err(e) => {
                            warn!(error = %e, "console input failed");
                            break;
                        }
                    };
                    if tx.blocking_send(line).is_err() {
                        break;
                    }
                }
                debug!("console input closed");
            });
        if let Err(e) = spawned {
            // With the sender gone every listen reports silence.
            warn!(error = %e, "failed to start console reader");
        }
        Self {
            lines: Mutex::new(rx),
        }
    }
}

#[async_trait]
impl Speech for ConsoleSpeech {
    fn speak(&self, text: &str) {
        info!(utterance = %text, "robot speaks");
        println!("[Robot] {text}");
    }

    async fn listen(&self, timeout: Duration) -> Option<String> {
        let mut lines = self.lines.lock().await;
        // `recv` is cancel safe, so a timed-out listen loses nothing.
        let heard = bounded_listen(lines.recv(), timeout).await;
        match &heard {
            Some(text) => println!("[Human] {text}"),
            None => println!("[Human] (silence)"),
        }
        heard
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn returns_none_when_nothing_arrives() {
        let started = Instant::now();
        let heard = bounded_listen(std::future::pending(), Duration::from_millis(50)).await;
        assert!(heard.is_none());
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn returns_trimmed_text() {
        let heard = bounded_listen(
            async { Some("  fine, go ahead \n".to_string()) },
            Duration::from_secs(1),
        )
        .await;
        assert_eq!(heard.as_deref(), Some("fine, go ahead"));
    }

    #[tokio::test]
    async fn blank_input_is_silence() {
        let heard = bounded_listen(async { Some("   ".to_string()) }, Duration::from_secs(1)).await;
        assert!(heard.is_none());
    }

    /// Blocks inside `read` until the test drops the paired sender.
    struct NeverAnswers(std::sync::mpsc::Receiver<()>);

    impl std::io::Read for NeverAnswers {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            let _ = self.0.recv();
            Ok(0)
        }
    }

    #[tokio::test]
    async fn console_forwards_lines_in_order() {
        let speech = ConsoleSpeech::from_reader(std::io::Cursor::new("  sure \n\nno way\n"));
        let wait = Duration::from_secs(2);
        assert_eq!(speech.listen(wait).await.as_deref(), Some("sure"));
        assert!(speech.listen(wait).await.is_none());
        assert_eq!(speech.listen(wait).await.as_deref(), Some("no way"));
        // End of input is silence, reported without waiting out the window.
        let started = Instant::now();
        assert!(speech.listen(Duration::from_secs(30)).await.is_none());
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn silent_console_does_not_hold_runtime_shutdown() {
        let (keep_open, blocked) = std::sync::mpsc::channel::<()>();
        let rt = tokio::runtime::Runtime::new().unwrap();
        let heard = rt.block_on(async {
            let speech = ConsoleSpeech::from_reader(std::io::BufReader::new(NeverAnswers(blocked)));
            speech.listen(Duration::from_millis(50)).await
        });
        assert!(heard.is_none());

        let started = Instant::now();
        drop(rt);
        assert!(started.elapsed() < Duration::from_secs(2));
        drop(keep_open);
    }

    #[tokio::test]
    async fn late_reply_is_dropped() {
        let late = async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Some("too late".to_string())
        };
        assert!(bounded_listen(late, Duration::from_millis(20)).await.is_none());
    }
}
