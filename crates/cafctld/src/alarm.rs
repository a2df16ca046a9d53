//! Audible alarm rendering.
//!
//! Threshold crossings are rendered as system sounds: the 10% and 5%
//! warnings as a three-beep burst, each second of the final countdown as a
//! single short pip. Rendering never blocks the session actor; bursts run
//! in spawned tasks.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use cafctl_core::ThresholdEvent;

/// Warning burst tone.
const TONE_SOUND: &str = "/System/Library/Sounds/Ping.aiff";

/// Final-countdown pip.
const PIP_SOUND: &str = "/System/Library/Sounds/Pop.aiff";

/// Beep pairs per warning burst.
const BURST_REPEATS: usize = 3;

/// Gap between the two beeps of a pair.
const INTRA_PAIR_GAP: Duration = Duration::from_millis(200);

/// Gap between pairs.
const INTER_PAIR_GAP: Duration = Duration::from_millis(300);

/// Plays individual sounds.
#[async_trait]
pub trait SoundBackend: Send + Sync {
    /// Plays one warning tone.
    async fn play_tone(&self);

    /// Plays one countdown pip.
    async fn play_pip(&self);
}

/// Plays sounds with the system `afplay` binary.
///
/// Playback failures are logged and otherwise ignored; a missing sound
/// never affects the session.
pub struct SystemSoundBackend;

impl SystemSoundBackend {
    async fn play(path: &str) {
        match Command::new("afplay").arg(path).status().await {
            Ok(status) if status.success() => {}
            Ok(status) => debug!(path, status = ?status.code(), "afplay exited non-zero"),
            Err(e) => debug!(path, error = %e, "Failed to run afplay"),
        }
    }
}

#[async_trait]
impl SoundBackend for SystemSoundBackend {
    async fn play_tone(&self) {
        Self::play(TONE_SOUND).await;
    }

    async fn play_pip(&self) {
        Self::play(PIP_SOUND).await;
    }
}

/// Renders threshold events as sounds.
#[derive(Clone)]
pub struct AlarmSequencer {
    backend: Arc<dyn SoundBackend>,
}

impl AlarmSequencer {
    pub fn new(backend: Arc<dyn SoundBackend>) -> Self {
        Self { backend }
    }

    /// Renders one threshold crossing. Returns immediately; playback runs
    /// in a spawned task.
    pub fn render(&self, event: ThresholdEvent) {
        let backend = Arc::clone(&self.backend);
        match event {
            ThresholdEvent::TenPercent | ThresholdEvent::FivePercent => {
                tokio::spawn(async move {
                    for pair in 0..BURST_REPEATS {
                        backend.play_tone().await;
                        tokio::time::sleep(INTRA_PAIR_GAP).await;
                        backend.play_tone().await;
                        if pair + 1 < BURST_REPEATS {
                            tokio::time::sleep(INTER_PAIR_GAP).await;
                        }
                    }
                });
            }
            ThresholdEvent::FinalSecond(_) => {
                tokio::spawn(async move {
                    backend.play_pip().await;
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingBackend {
        tones: AtomicUsize,
        pips: AtomicUsize,
    }

    #[async_trait]
    impl SoundBackend for CountingBackend {
        async fn play_tone(&self) {
            self.tones.fetch_add(1, Ordering::SeqCst);
        }

        async fn play_pip(&self) {
            self.pips.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_warning_burst_plays_six_tones() {
        let backend = Arc::new(CountingBackend {
            tones: AtomicUsize::new(0),
            pips: AtomicUsize::new(0),
        });
        let sequencer = AlarmSequencer::new(Arc::clone(&backend) as Arc<dyn SoundBackend>);

        sequencer.render(ThresholdEvent::TenPercent);
        // Advance past all the burst gaps.
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert_eq!(backend.tones.load(Ordering::SeqCst), 6);
        assert_eq!(backend.pips.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_final_second_plays_single_pip() {
        let backend = Arc::new(CountingBackend {
            tones: AtomicUsize::new(0),
            pips: AtomicUsize::new(0),
        });
        let sequencer = AlarmSequencer::new(Arc::clone(&backend) as Arc<dyn SoundBackend>);

        sequencer.render(ThresholdEvent::FinalSecond(3));
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(backend.tones.load(Ordering::SeqCst), 0);
        assert_eq!(backend.pips.load(Ordering::SeqCst), 1);
    }
}
