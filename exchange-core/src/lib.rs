use std::f64::consts::TAU;
use std::time::Duration;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type Participant = String;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 100;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MatchError {
    #[error("at least 2 participants are required")]
    InsufficientParticipants,
    #[error("no valid pairing found within {attempts} attempts, try again")]
    DerangementExhausted { attempts: u32 },
}

/// Rejection-sampled derangement: shuffle until no element keeps its
/// original index, giving up after `max_attempts` shuffles.
pub fn derange<T, R>(roster: &[T], max_attempts: u32, rng: &mut R) -> Result<Vec<T>, MatchError>
where
    T: Clone + PartialEq,
    R: Rng + ?Sized,
{
    if roster.len() < 2 {
        return Err(MatchError::InsufficientParticipants);
    }

    for attempt in 0..max_attempts {
        let mut shuffled = roster.to_vec();
        shuffled.shuffle(rng);
        if roster.iter().zip(&shuffled).all(|(a, b)| a != b) {
            log::debug!("derangement accepted on attempt {}", attempt + 1);
            return Ok(shuffled);
        }
    }

    log::debug!("derangement budget of {max_attempts} attempts exhausted");
    Err(MatchError::DerangementExhausted {
        attempts: max_attempts,
    })
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Assignment {
    pub giver: Participant,
    pub receiver: Participant,
}

/// Zips `roster[i]` with `permutation[i]`. The permutation must be a
/// derangement of the roster; this is a caller precondition.
pub fn build_assignments(roster: &[Participant], permutation: &[Participant]) -> Vec<Assignment> {
    debug_assert_eq!(roster.len(), permutation.len());
    roster
        .iter()
        .zip(permutation)
        .map(|(giver, receiver)| Assignment {
            giver: giver.clone(),
            receiver: receiver.clone(),
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GiftPrize {
    pub name: &'static str,
    pub image: &'static str,
}

pub const GIFT_CATALOG: [GiftPrize; 5] = [
    GiftPrize {
        name: "Dairy Milk",
        image: "chocolate.png",
    },
    GiftPrize {
        name: "Biscuits",
        image: "biscuits.png",
    },
    GiftPrize {
        name: "Sleek Pen",
        image: "pen.png",
    },
    GiftPrize {
        name: "Kurkure",
        image: "chips.png",
    },
    GiftPrize {
        name: "Surprise Box",
        image: "giftbox.png",
    },
];

/// Uniform pick, independent of the matching randomness. Repeats
/// across reveals are allowed.
pub fn pick_gift<R: Rng + ?Sized>(rng: &mut R) -> GiftPrize {
    GIFT_CATALOG[rng.gen_range(0..GIFT_CATALOG.len())]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnPhase {
    AwaitingSpin,
    Spinning,
    Revealed,
    Complete,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reveal {
    pub giver: Participant,
    pub receiver: Participant,
    pub gift: GiftPrize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpinTarget {
    pub receiver: Participant,
    /// Index of the receiver's wedge in giver order.
    pub segment: usize,
}

#[derive(Debug, Clone)]
pub struct RevealSession {
    assignments: Vec<Assignment>,
    cursor: usize,
    phase: TurnPhase,
    revealed: Option<Reveal>,
}

impl RevealSession {
    pub fn new<R: Rng + ?Sized>(
        roster: &[Participant],
        max_attempts: u32,
        rng: &mut R,
    ) -> Result<Self, MatchError> {
        let permutation = derange(roster, max_attempts, rng)?;
        Ok(Self::from_assignments(build_assignments(
            roster,
            &permutation,
        )))
    }

    pub fn from_assignments(assignments: Vec<Assignment>) -> Self {
        let phase = if assignments.is_empty() {
            TurnPhase::Complete
        } else {
            TurnPhase::AwaitingSpin
        };
        Self {
            assignments,
            cursor: 0,
            phase,
            revealed: None,
        }
    }

    pub fn assignments(&self) -> &[Assignment] {
        &self.assignments
    }

    /// Giver order doubles as wheel segment order.
    pub fn givers(&self) -> impl Iterator<Item = &str> {
        self.assignments.iter().map(|a| a.giver.as_str())
    }

    pub fn phase(&self) -> TurnPhase {
        self.phase
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn current_giver(&self) -> Option<&str> {
        if matches!(self.phase, TurnPhase::Complete) {
            return None;
        }
        self.assignments.get(self.cursor).map(|a| a.giver.as_str())
    }

    /// Starts the current turn's spin. Ignored unless awaiting a spin,
    /// so a second request while one is in flight cannot race.
    pub fn begin_spin(&mut self) -> Option<SpinTarget> {
        if !matches!(self.phase, TurnPhase::AwaitingSpin) {
            return None;
        }
        let receiver = self.assignments.get(self.cursor)?.receiver.clone();
        // Every receiver is also a giver, so the lookup cannot fail on
        // a valid assignment list.
        let segment = self.assignments.iter().position(|a| a.giver == receiver)?;
        self.phase = TurnPhase::Spinning;
        Some(SpinTarget { receiver, segment })
    }

    /// Called when the animation lands; draws the gift for this reveal.
    pub fn complete_spin<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Option<Reveal> {
        if !matches!(self.phase, TurnPhase::Spinning) {
            return None;
        }
        let pair = self.assignments.get(self.cursor)?;
        let reveal = Reveal {
            giver: pair.giver.clone(),
            receiver: pair.receiver.clone(),
            gift: pick_gift(rng),
        };
        self.phase = TurnPhase::Revealed;
        self.revealed = Some(reveal.clone());
        Some(reveal)
    }

    pub fn last_reveal(&self) -> Option<&Reveal> {
        self.revealed.as_ref()
    }

    /// An aborted spin does not consume the turn; the same cursor is
    /// re-offered when the session resumes.
    pub fn abort_spin(&mut self) {
        if matches!(self.phase, TurnPhase::Spinning) {
            self.phase = TurnPhase::AwaitingSpin;
        }
    }

    pub fn advance(&mut self) -> TurnPhase {
        if matches!(self.phase, TurnPhase::Revealed) {
            self.revealed = None;
            self.cursor += 1;
            self.phase = if self.cursor < self.assignments.len() {
                TurnPhase::AwaitingSpin
            } else {
                TurnPhase::Complete
            };
        }
        self.phase
    }

    pub fn is_complete(&self) -> bool {
        matches!(self.phase, TurnPhase::Complete)
    }

    /// Reset means discarding the session; permitted only between
    /// turns or once everything is revealed.
    pub fn reset_allowed(&self) -> bool {
        matches!(self.phase, TurnPhase::AwaitingSpin | TurnPhase::Complete)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpinConfig {
    pub duration_ms: u64,
    pub min_spins: u32,
    /// Landing jitter as a fraction of one segment arc. Must stay
    /// below 0.5 or the pointer could land in a neighboring wedge.
    pub jitter: f64,
}

impl Default for SpinConfig {
    fn default() -> Self {
        Self {
            duration_ms: 4000,
            min_spins: 5,
            jitter: 0.4,
        }
    }
}

impl SpinConfig {
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct ActiveSpin {
    start: f64,
    target: f64,
    segment: usize,
}

/// Drives the wheel's cumulative rotation. The rotation persists
/// across turns so each spin continues from the wheel's current
/// orientation instead of snapping back.
#[derive(Debug, Clone)]
pub struct SpinEngine {
    config: SpinConfig,
    rotation: f64,
    active: Option<ActiveSpin>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SpinFrame {
    Idle,
    Turning(f64),
    Landed { rotation: f64, segment: usize },
}

impl SpinEngine {
    pub fn new(config: SpinConfig) -> Self {
        Self {
            config,
            rotation: 0.0,
            active: None,
        }
    }

    pub fn config(&self) -> SpinConfig {
        self.config
    }

    /// Current layout rotation in radians, valid at rest and mid-spin.
    pub fn rotation(&self) -> f64 {
        self.rotation
    }

    pub fn is_spinning(&self) -> bool {
        self.active.is_some()
    }

    /// Arms a spin that lands on `segment` of a wheel with
    /// `segment_count` equal wedges. Returns false (no-op) while a
    /// spin is already in flight or the segment is out of range.
    pub fn start<R: Rng + ?Sized>(
        &mut self,
        segment: usize,
        segment_count: usize,
        rng: &mut R,
    ) -> bool {
        if self.active.is_some() || segment_count == 0 || segment >= segment_count {
            return false;
        }

        let arc = segment_arc(segment_count);
        let jitter = (rng.gen::<f64>() - 0.5) * 2.0 * self.config.jitter * arc;
        // Layout offset that puts the segment center under the pointer.
        let target = -(segment as f64 * arc + arc / 2.0) + jitter;

        // Smallest congruent angle at least `min_spins` full turns ahead.
        let floor = self.rotation + f64::from(self.config.min_spins) * TAU;
        let mut final_rotation = target;
        while final_rotation < floor {
            final_rotation += TAU;
        }

        log::debug!(
            "spin armed: segment {segment}/{segment_count}, {:.3} -> {:.3} rad",
            self.rotation,
            final_rotation
        );
        self.active = Some(ActiveSpin {
            start: self.rotation,
            target: final_rotation,
            segment,
        });
        true
    }

    /// Samples the animation at `elapsed` wall-clock time since the
    /// spin started. Frame cadence never affects the landing angle;
    /// only elapsed time does. `Landed` is reported exactly once.
    pub fn step(&mut self, elapsed: Duration) -> SpinFrame {
        let Some(spin) = self.active else {
            return SpinFrame::Idle;
        };

        let duration = self.config.duration();
        if elapsed >= duration {
            self.rotation = spin.target;
            self.active = None;
            return SpinFrame::Landed {
                rotation: spin.target,
                segment: spin.segment,
            };
        }

        let t = elapsed.as_secs_f64() / duration.as_secs_f64();
        self.rotation = spin.start + (spin.target - spin.start) * ease_out_quart(t);
        SpinFrame::Turning(self.rotation)
    }

    /// Abandons the active spin, leaving the rotation wherever the
    /// last step put it.
    pub fn cancel(&mut self) {
        self.active = None;
    }
}

/// Fast start, smooth deceleration.
pub fn ease_out_quart(t: f64) -> f64 {
    1.0 - (1.0 - t).powi(4)
}

pub fn segment_arc(segment_count: usize) -> f64 {
    TAU / segment_count as f64
}

/// Which wedge sits under the fixed pointer for a given layout
/// rotation.
pub fn segment_at_pointer(rotation: f64, segment_count: usize) -> usize {
    if segment_count == 0 {
        return 0;
    }
    let arc = segment_arc(segment_count);
    let phi = (-rotation).rem_euclid(TAU);
    ((phi / arc) as usize).min(segment_count - 1)
}
