//! Audio feedback when a customer is called.
//!
//! An [`AudioCue`] is fire-and-forget: the store launches it after a call
//! has been committed and never waits for it. A cue that fails only
//! produces a log line.

use std::fmt;
use std::io::{IsTerminal, Write};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;

/// Terminal bell control character.
const BELL: &[u8] = b"\x07";

/// Errors a cue can report.
#[derive(Debug, thiserror::Error)]
pub enum CueError {
    /// No usable audio output in this environment.
    #[error("audio cue unavailable: {0}")]
    Unavailable(String),

    /// The output refused the sound.
    #[error("audio output failed: {0}")]
    Output(String),
}

/// Sound played once per successful call.
pub trait AudioCue: Send + Sync + fmt::Debug {
    /// Starts playing the cue. The returned future resolves when playback
    /// finished or failed.
    fn notify_called(&self) -> BoxFuture<'static, Result<(), CueError>>;
}

/// One tone of a chime.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tone {
    /// Pitch in hertz.
    pub frequency_hz: u32,
    /// Length of the tone.
    pub duration: Duration,
    /// Gain between 0 and 1.
    pub volume: f32,
    /// Start offset from the beginning of the chime.
    pub offset: Duration,
}

/// Two-tone call chime: a high tone, then a lower one 200 ms later.
pub const CALL_CHIME: [Tone; 2] = [
    Tone {
        frequency_hz: 880,
        duration: Duration::from_millis(300),
        volume: 0.15,
        offset: Duration::ZERO,
    },
    Tone {
        frequency_hz: 660,
        duration: Duration::from_millis(400),
        volume: 0.15,
        offset: Duration::from_millis(200),
    },
];

type SharedWriter = Arc<Mutex<Box<dyn Write + Send>>>;

/// Plays the chime as terminal bells, one per tone, at the tone offsets.
pub struct TerminalChime {
    out: SharedWriter,
    tones: Vec<Tone>,
    require_terminal: bool,
}

impl fmt::Debug for TerminalChime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TerminalChime")
            .field("tones", &self.tones)
            .field("require_terminal", &self.require_terminal)
            .finish_non_exhaustive()
    }
}

impl TerminalChime {
    /// Chime on standard output. Reports [`CueError::Unavailable`] when
    /// stdout is not a terminal.
    #[must_use]
    pub fn stdout() -> Self {
        Self {
            out: Arc::new(Mutex::new(Box::new(std::io::stdout()))),
            tones: CALL_CHIME.to_vec(),
            require_terminal: true,
        }
    }

    /// Chime written to an arbitrary sink.
    #[must_use]
    pub fn with_writer(out: impl Write + Send + 'static) -> Self {
        Self {
            out: Arc::new(Mutex::new(Box::new(out))),
            tones: CALL_CHIME.to_vec(),
            require_terminal: false,
        }
    }

    /// Replaces the tone sequence.
    #[must_use]
    pub fn with_tones(mut self, tones: Vec<Tone>) -> Self {
        self.tones = tones;
        self
    }
}

fn ring(out: &SharedWriter) -> Result<(), CueError> {
    let mut out = out.lock().unwrap_or_else(PoisonError::into_inner);
    out.write_all(BELL)
        .and_then(|()| out.flush())
        .map_err(|e| CueError::Output(e.to_string()))
}

impl AudioCue for TerminalChime {
    fn notify_called(&self) -> BoxFuture<'static, Result<(), CueError>> {
        if self.require_terminal && !std::io::stdout().is_terminal() {
            return futures_util::future::ready(Err(CueError::Unavailable(
                "stdout is not a terminal".to_string(),
            )))
            .boxed();
        }

        let out = Arc::clone(&self.out);
        let mut tones = self.tones.clone();
        tones.sort_by_key(|t| t.offset);
        async move {
            let mut elapsed = Duration::ZERO;
            for tone in tones {
                if tone.offset > elapsed {
                    tokio::time::sleep(tone.offset - elapsed).await;
                    elapsed = tone.offset;
                }
                ring(&out)?;
                tracing::debug!(
                    frequency_hz = tone.frequency_hz,
                    duration_ms = u64::try_from(tone.duration.as_millis()).unwrap_or(u64::MAX),
                    "chime tone"
                );
            }
            Ok::<(), CueError>(())
        }
        .boxed()
    }
}

/// Cue that plays nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentCue;

impl AudioCue for SilentCue {
    fn notify_called(&self) -> BoxFuture<'static, Result<(), CueError>> {
        futures_util::future::ready(Ok(())).boxed()
    }
}
